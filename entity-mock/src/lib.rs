/// Statechain Entity Mock Library
///
/// In-memory stand-in for the statechain entity's transfer endpoints, used
/// as a standalone binary for manual testing and as a library by the
/// client's HTTP integration tests.

pub mod handlers;
pub mod server;
pub mod state;
pub mod types;

// Re-export commonly used types
pub use server::{create_router, run_server, serve_on};
pub use state::EntityState;
pub use types::*;
