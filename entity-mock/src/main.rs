/// Statechain Entity Mock Server
///
/// Serves the entity's transfer endpoints from memory. Designed for
/// Regtest testing and development of the statechain client.

use anyhow::{Context, Result};
use std::env;

use entity_mock::{run_server, EntityState};

#[derive(Debug)]
struct Config {
    server_host: String,
    server_port: u16,
}

impl Config {
    fn from_env() -> Result<Self> {
        dotenv::dotenv().ok(); // Load .env file if present

        let server_host = env::var("SERVER_HOST")
            .unwrap_or_else(|_| "0.0.0.0".to_string());

        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "8000".to_string())
            .parse()
            .context("Invalid SERVER_PORT")?;

        Ok(Self {
            server_host,
            server_port,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .init();

    log::info!("Starting statechain entity mock...");

    let config = Config::from_env()
        .context("Failed to load configuration")?;

    run_server(EntityState::new(), config.server_host, config.server_port)
        .await
        .context("Server error")?;

    Ok(())
}
