//! Binário do servidor de anotação.

use std::sync::Arc;

use lector_core::MemoryStore;
use lector_web::{config::WebConfig, router, AppState};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = WebConfig::from_env();

    let store = match &config.vocabulary_path {
        Some(path) => {
            let json = std::fs::read_to_string(path)?;
            let store = MemoryStore::from_json(&json)?;
            info!(path = %path.display(), entries = store.len(), "vocabulário carregado");
            store
        }
        None => MemoryStore::new(),
    };

    let state = Arc::new(AppState::new(Arc::new(store), &config)?);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    info!("Servidor de anotação iniciado em http://{}", config.bind);
    axum::serve(listener, app).await?;
    Ok(())
}
