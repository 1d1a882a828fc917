use anyhow::{Context, Result};
use clap::Parser;
use courseware_uploads::{
    build_router,
    config::{ServerArgs, ServerConfig},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courseware_uploads=info,server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = ServerArgs::parse();
    let config = ServerConfig::load(&args)?;

    let state = Arc::new(AppState::new(&config)?);
    state
        .store
        .ensure_root()
        .await
        .context("Failed to prepare upload directory")?;

    let app = build_router(state.clone());

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    tracing::info!(
        %addr,
        uploads_dir = %state.store.root().display(),
        naming = ?config.naming,
        "courseware upload server running"
    );
    tracing::info!("endpoints: GET / | POST /upload | GET /files | GET /download/:name");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
