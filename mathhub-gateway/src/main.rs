//! Entry point for the `mathhub-gateway` HTTP server.

use std::process::ExitCode;
use std::sync::Arc;

use mathhub_gateway::{create_router, AppState, GatewayConfig, InMemoryStore, QuestStore};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match GatewayConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let evaluator = match config.evaluator() {
        Ok(e) => e,
        Err(e) => {
            tracing::error!(error = %e, "failed to set up the sandbox backend");
            return ExitCode::FAILURE;
        }
    };

    let store: Arc<dyn QuestStore> = match &config.seed_file {
        Some(path) => match InMemoryStore::from_seed_file(path).await {
            Ok(s) => Arc::new(s),
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "failed to load seed file");
                return ExitCode::FAILURE;
            }
        },
        None => Arc::new(InMemoryStore::new()),
    };

    let app = create_router(AppState::new(store, evaluator));

    let listener = match tokio::net::TcpListener::bind(&config.listen_addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(addr = %config.listen_addr, error = %e, "failed to bind");
            return ExitCode::FAILURE;
        }
    };

    info!(addr = %config.listen_addr, backend = ?config.backend, "mathhub-gateway listening");

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "server error");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
