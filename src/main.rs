use anyhow::{Context, Result};
use axum::http::Request;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};

use guestbook::config::{self, ServiceSettings};
use guestbook::db;
use guestbook::http::{router, AppState};
use guestbook::queue::NatsClient;
use guestbook::relay::NotificationRelay;
use guestbook::service::IngestionService;

#[derive(Debug, Parser)]
#[command(author, version, about = "Guestbook ingestion HTTP service")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    let params = cfg.parameter_source();
    let settings = ServiceSettings::resolve(&cfg, &params, std::env::var("DATABASE_URL").ok())
        .await
        .context("failed to resolve service parameters")?;
    info!(database = ?settings.database, bind_addr = %settings.bind_addr, "settings resolved");

    let store = db::connect(&settings.database)
        .await
        .context("failed to initialize database")?;

    let nats = NatsClient::connect(&settings.queue_url, Duration::from_secs(5)).await?;
    if let Err(err) = nats.ensure_stream(&settings.queue.stream).await {
        // Publishing will fail and be logged until the stream is reachable.
        warn!(?err, stream = %settings.queue.stream, "could not ensure notification stream");
    }
    let relay = NotificationRelay::new(Arc::new(nats.publisher(&settings.queue.subject)));

    let state = AppState::new(IngestionService::new(store, relay));
    let app = router(state)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                tracing::span!(
                    Level::INFO,
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path()
                )
            }),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.bind_addr))?;
    info!(addr = %settings.bind_addr, "starting server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(?err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
