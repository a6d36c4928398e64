/// Axum HTTP server setup and routing

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::*;
use crate::state::EntityState;

pub fn create_router(state: EntityState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(health_check))

        // Transfer endpoints
        .route("/transfer/sender", post(transfer_sender))
        .route("/transfer/update_msg", post(transfer_update_msg))
        .route("/transfer/get_msg_addr/:auth_pubkey", get(get_msg_addr))
        .route("/transfer/receiver", post(transfer_receiver))

        // Test control endpoints
        .route("/mock/reject_updates", post(reject_updates))
        .route("/mock/fail_updates", post(fail_updates))
        .route("/mock/stats", get(stats))

        // Shared state
        .with_state(state)

        // Middleware
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Serve on an already bound listener (tests bind to port 0)
pub async fn serve_on(listener: TcpListener, state: EntityState) -> anyhow::Result<()> {
    axum::serve(listener, create_router(state)).await?;
    Ok(())
}

pub async fn run_server(state: EntityState, host: String, port: u16) -> anyhow::Result<()> {
    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr).await?;

    log::info!("🚀 Statechain entity mock listening on http://{}", addr);
    log::info!("🔑 Server pubkey: {}", state.server_pubkey());

    serve_on(listener, state).await
}
