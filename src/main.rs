use std::sync::{Arc, Weak};

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use reelfinder::{
    bridge::EventBridge,
    config::AppConfig,
    omdb::OmdbClient,
    routes,
    search::{self, SearchListener, SearchOptions, ShutdownOutcome},
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reelfinder=info,tower_http=info".into()),
        )
        .with(fmt::layer())
        .init();

    // ── Config ───────────────────────────────────────────────────────────────
    let config = AppConfig::from_env()?;
    info!("Starting reelfinder, binding to {}", config.bind);

    // ── Movie API client ─────────────────────────────────────────────────────
    let api = Arc::new(OmdbClient::from_config(&config)?);

    // ── Search worker ────────────────────────────────────────────────────────
    let bridge = Arc::new(EventBridge::new(256));
    let listener = Arc::downgrade(&bridge) as Weak<dyn SearchListener>;
    let worker = search::start_worker(api, listener, SearchOptions::from_config(&config));

    // ── Application state ────────────────────────────────────────────────────
    let state = AppState {
        search: worker.handle(),
        bridge,
    };

    // ── HTTP server ──────────────────────────────────────────────────────────
    let router = routes::build_router(state);
    let tcp = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("bind {}", config.bind))?;
    info!("Listening on http://{}", config.bind);

    axum::serve(tcp, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The server is down, so nothing is waiting on the worker; stop it in
    // bounded time.
    match worker.shutdown().await {
        ShutdownOutcome::Graceful => info!("Shutdown complete"),
        ShutdownOutcome::Forced => info!("Shutdown complete (active search cancelled)"),
        ShutdownOutcome::Abandoned => tracing::warn!("Shutdown complete (search task aborted)"),
    }

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C, shutting down"),
        Err(e) => {
            tracing::warn!("Could not listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    }
}
