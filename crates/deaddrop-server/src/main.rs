//! # deaddrop-server
//!
//! Store-and-forward relay for end-to-end encrypted messages.
//!
//! This binary provides:
//! - **Mailboxes** holding ciphertext until the addressee fetches it with a
//!   fresh identity proof
//! - **Key registry** with parent-key delegation, names and protocol
//!   addresses, mutated through signed and proof-of-work stamped requests
//! - **Lookup chain** that can consult an upstream relay's registry
//! - **REST API** (axum) exposing all of the above

mod api;
mod config;
mod error;
mod registrar;
mod relay;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,deaddrop_server=debug")),
        )
        .init();

    info!("Starting deaddrop relay v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Open storage and build the resolution chain
    // -----------------------------------------------------------------------
    let app_state = AppState::from_config(&config)?;
    info!(
        backend = %config.store_backend,
        registry = %config.registry_db_path.display(),
        pow_difficulty = config.pow_difficulty,
        upstream = config.upstream_lookup_url.as_deref().unwrap_or("none"),
        "Relay ready"
    );

    // -----------------------------------------------------------------------
    // 4. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
