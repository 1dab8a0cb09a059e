//! # rusty-pothole
//!
//! Assembles the reporting engine from its adapters and serves the HTTP API.
//! Startup order: settings, logging, storage, media, snapping, engine,
//! moderator bootstrap, expiry sweep, then the listener.

mod sweep;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use api_adapters::middleware::apply_standard_middleware;
use api_adapters::{router, AppState};
use configs::{LogSettings, Settings};
use domains::traits::{StreetSnapper, SystemClock};
use services::{Engine, Ports};
use storage_adapters::{LocalImageStore, OsrmSnapper, SqliteStore};
use tower_http::services::ServeDir;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("loading settings")?;
    init_tracing(&settings.log);

    // 1. Database
    let store = Arc::new(
        SqliteStore::new(&settings.database.url)
            .await
            .with_context(|| format!("opening database {}", settings.database.url))?,
    );
    tracing::info!(url = %settings.database.url, "database ready");

    // 2. Media
    tokio::fs::create_dir_all(&settings.media.root_dir)
        .await
        .with_context(|| format!("creating media root {}", settings.media.root_dir.display()))?;
    let media = Arc::new(LocalImageStore::new(
        settings.media.root_dir.clone(),
        settings.media.url_prefix.clone(),
        settings.media.max_upload_bytes,
    ));

    // 3. Street snapping (optional)
    let snapper: Option<Arc<dyn StreetSnapper>> = if settings.snapper.enabled {
        let base = reqwest::Url::parse(&settings.snapper.base_url)
            .with_context(|| format!("invalid snapper base_url {}", settings.snapper.base_url))?;
        let client = OsrmSnapper::new(base, Duration::from_secs(settings.snapper.timeout_secs))
            .context("building snapper client")?;
        tracing::info!(base_url = %settings.snapper.base_url, "street snapping enabled");
        let client: Arc<dyn StreetSnapper> = Arc::new(client);
        Some(client)
    } else {
        tracing::info!("street snapping disabled, reports keep raw coordinates");
        None
    };

    // 4. Engine
    let ports = Ports::from_store(store, media, snapper, Arc::new(SystemClock));
    let engine = Engine::new(ports, &settings.engine);

    for moderator in &settings.bootstrap.moderators {
        engine
            .promote_moderator(*moderator)
            .await
            .with_context(|| format!("promoting bootstrap moderator {moderator}"))?;
        tracing::info!(user_id = %moderator, "bootstrap moderator ready");
    }

    // 5. Background expiry sweep
    let sweeper = tokio::spawn(sweep::run(
        engine.clone(),
        Duration::from_secs(settings.sweep.interval_secs),
    ));

    // 6. HTTP
    let app = router(AppState { engine })
        .nest_service(&settings.media.url_prefix, ServeDir::new(&settings.media.root_dir));
    let app = apply_standard_middleware(app, settings.server.max_body_bytes);

    let listener = tokio::net::TcpListener::bind(&settings.server.bind_addr)
        .await
        .with_context(|| format!("binding {}", settings.server.bind_addr))?;
    tracing::info!(addr = %settings.server.bind_addr, "rusty-pothole listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    sweeper.abort();
    tracing::info!("shut down");
    Ok(())
}

fn init_tracing(log: &LogSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.filter));
    let registry = tracing_subscriber::registry().with(filter);
    if log.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
