use anyhow::Context;
use heirloom_api::{create_router, ApiState};
use heirloom_storage::open_store;
use heirloom_types::defaults;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

fn env_or(name: &str, fallback: impl FnOnce() -> String) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(fallback)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store_url = env_or("STORE_URL", || {
        env_or("REDIS_URL", || defaults::STORE_URL.to_string())
    });
    let store = open_store(&store_url)
        .await
        .with_context(|| format!("failed to open store {}", store_url))?;

    let app = create_router(Arc::new(ApiState { store }));

    let listen_addr = env_or("API_LISTEN_ADDR", || DEFAULT_LISTEN_ADDR.to_string());
    let listener = TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", listen_addr))?;
    info!(addr = %listen_addr, "read API listening");

    axum::serve(listener, app).await?;
    Ok(())
}
