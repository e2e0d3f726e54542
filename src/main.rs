use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use guided_onboarding::config::{EngineConfig, ServerConfig};
use guided_onboarding::persistence::{LibSqlProgressStore, ProgressStore, spawn_progress_writer};
use guided_onboarding::routes::{SessionRegistry, spawn_session_pruner, tutorial_routes};

async fn open_store(config: &ServerConfig) -> guided_onboarding::error::Result<Arc<dyn ProgressStore>> {
    config.validate()?;
    let store = LibSqlProgressStore::new_local(std::path::Path::new(&config.db_path)).await?;
    Ok(Arc::new(store))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let server = ServerConfig::from_env();
    let engine = EngineConfig::from_env();

    eprintln!("🧭 Guided Onboarding v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", server.db_path);
    eprintln!("   API: http://0.0.0.0:{}/api/sessions", server.port);
    eprintln!("   Debounce: {}ms", engine.debounce_window.as_millis());
    eprintln!("   Session idle timeout: {}s\n", engine.session_idle_timeout.as_secs());

    // ── Database ─────────────────────────────────────────────────────────
    let store = open_store(&server)
        .await
        .with_context(|| format!("Failed to open database at {}", server.db_path))?;

    // ── Progress writer ──────────────────────────────────────────────────
    let (writer, writer_handle) = spawn_progress_writer(Arc::clone(&store));

    // ── HTTP server ──────────────────────────────────────────────────────
    let sessions = Arc::new(SessionRegistry::new(store, writer, engine)?);
    let pruning_handle = spawn_session_pruner(Arc::clone(&sessions), Duration::from_secs(60));
    let app = tutorial_routes(sessions);

    let addr = format!("0.0.0.0:{}", server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(addr = %addr, "Tutorial API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await
        .context("HTTP server failed")?;

    // The pruner holds sessions (and their writer clones); stop it first.
    pruning_handle.abort();
    let _ = pruning_handle.await;

    // The router owned the last writer handle; wait for queued saves.
    let _ = writer_handle.await;
    Ok(())
}
