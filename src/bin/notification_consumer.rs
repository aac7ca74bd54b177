use anyhow::{anyhow, Context, Result};
use async_nats::jetstream::{consumer::PullConsumer, Message};
use clap::Parser;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use guestbook::config;
use guestbook::consumer::{Delivery, NotificationConsumer};
use guestbook::mailer::HttpMailer;
use guestbook::parameters::{self, ConfigSource};
use guestbook::queue::{self, NatsClient};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Pull queued guestbook notifications and send them as email"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Handle at most one batch, then exit
    #[arg(long)]
    once: bool,
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
    let params: Arc<dyn ConfigSource> = Arc::new(cfg.parameter_source());

    let queue_url = params.resolve(parameters::QUEUE_URL).await?;
    let api_url = params.resolve(parameters::EMAIL_API_URL).await?;
    let api_token = params.resolve(parameters::EMAIL_API_TOKEN).await?;
    let mailer = HttpMailer::new(&api_url, api_token)?;
    let handler = NotificationConsumer::new(params, Arc::new(mailer));

    let nats = NatsClient::connect_blocking(&queue_url, Duration::from_secs(5)).await?;
    nats.ensure_stream(&cfg.queue.stream).await?;
    let consumer = nats
        .pull_consumer(&cfg.queue.stream, &cfg.queue.consumer, &cfg.queue.subject)
        .await?;
    let max_wait = Duration::from_secs(cfg.queue.max_wait_secs);

    info!(consumer = %cfg.queue.consumer, "starting notification consumer");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received, stopping consumer");
                break;
            }
            result = run_batch(&consumer, &handler, cfg.queue.batch_size, max_wait) => {
                match result {
                    Ok(0) => {}
                    Ok(handled) => info!(handled, "batch complete"),
                    Err(err) => {
                        error!(?err, "error fetching or acknowledging batch");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
                if args.once {
                    break;
                }
            }
        }
    }

    Ok(())
}

/// Fetch one batch and hand it to the handler as a single invocation.
/// Success acks every message; failure naks every message so the server
/// redelivers the batch after a delay.
async fn run_batch(
    consumer: &PullConsumer,
    handler: &NotificationConsumer,
    batch_size: usize,
    max_wait: Duration,
) -> Result<usize> {
    let mut stream = consumer
        .fetch()
        .max_messages(batch_size)
        .expires(max_wait)
        .messages()
        .await
        .context("failed to fetch messages")?;

    let mut messages: Vec<Message> = Vec::new();
    while let Some(msg) = stream.next().await {
        match msg {
            Ok(message) => messages.push(message),
            Err(err) => warn!(error = %err, "error receiving message"),
        }
    }
    if messages.is_empty() {
        return Ok(0);
    }

    let batch: Vec<Delivery> = messages
        .iter()
        .map(|m| Delivery {
            body: m.payload.clone(),
            attempt: m.info().map(|info| info.delivered).unwrap_or(1),
        })
        .collect();

    // A failure is already logged by the handler.
    let result = handler.handle_batch(&batch).await;
    let settle = queue::settlement(result.is_ok());
    for message in &messages {
        message
            .ack_with(settle)
            .await
            .map_err(|e| anyhow!("failed to settle message with {settle:?}: {e}"))?;
    }
    Ok(result.unwrap_or(0))
}
