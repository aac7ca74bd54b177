//! Queue transport: the publishing seam used by the relay and the NATS
//! JetStream plumbing behind it.
use anyhow::{Context, Result};
use async_nats::jetstream::{
    self, consumer::pull, consumer::AckPolicy, stream::Config as StreamConfig, AckKind,
};
use async_nats::HeaderMap;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tracing::info;

use crate::config::stream_subjects;

/// Upper bound on a publish, ack included. Requests wait at most this long
/// on the queue while it is unreachable.
pub const PUBLISH_TIMEOUT: Duration = Duration::from_secs(2);
/// How long the server holds a failed batch before handing it out again.
pub const REDELIVERY_DELAY: Duration = Duration::from_secs(30);
/// Unacked messages are held for this long before the server redelivers them.
pub const ACK_WAIT: Duration = Duration::from_secs(60);
/// After this many deliveries the server stops redelivering a message.
pub const MAX_DELIVER: i64 = 10;

/// Hands a serialized payload to the queue.
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// `message_id` lets the broker drop duplicates published within its window.
    async fn publish(&self, message_id: &str, payload: Bytes) -> Result<()>;
}

#[derive(Clone)]
pub struct NatsClient {
    jetstream: jetstream::Context,
}

impl NatsClient {
    /// Connect without waiting for the server: publishes fail (and are logged
    /// by the relay) until the connection comes up.
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self> {
        info!(url = %url, timeout_ms = timeout.as_millis(), "connecting to NATS");
        let client = async_nats::ConnectOptions::new()
            .connection_timeout(timeout)
            .retry_on_initial_connect()
            .connect(url)
            .await
            .context("failed to connect to NATS")?;
        Ok(Self {
            jetstream: jetstream::new(client),
        })
    }

    /// Connect and wait until the server is reachable.
    pub async fn connect_blocking(url: &str, timeout: Duration) -> Result<Self> {
        info!(url = %url, timeout_ms = timeout.as_millis(), "connecting to NATS");
        let client = async_nats::ConnectOptions::new()
            .connection_timeout(timeout)
            .connect(url)
            .await
            .context("failed to connect to NATS")?;
        Ok(Self {
            jetstream: jetstream::new(client),
        })
    }

    pub async fn ensure_stream(&self, stream: &str) -> Result<()> {
        match self.jetstream.get_stream(stream).await {
            Ok(_) => info!(stream, "stream already exists"),
            Err(_) => {
                self.jetstream
                    .get_or_create_stream(StreamConfig {
                        name: stream.to_string(),
                        subjects: vec![stream_subjects(stream)],
                        description: Some("Guestbook entry notifications".to_string()),
                        ..Default::default()
                    })
                    .await
                    .context("failed to create stream")?;
                info!(stream, "created stream");
            }
        }
        Ok(())
    }

    pub fn publisher(&self, subject: &str) -> JetStreamPublisher {
        let mut context = self.jetstream.clone();
        context.set_timeout(PUBLISH_TIMEOUT);
        JetStreamPublisher {
            context,
            subject: subject.to_string(),
            timeout: PUBLISH_TIMEOUT,
        }
    }

    /// Durable pull consumer with explicit acks, created if absent.
    pub async fn pull_consumer(
        &self,
        stream: &str,
        durable: &str,
        subject: &str,
    ) -> Result<jetstream::consumer::PullConsumer> {
        let stream = self
            .jetstream
            .get_stream(stream)
            .await
            .context("failed to look up stream")?;
        let consumer = stream
            .get_or_create_consumer(durable, consumer_config(durable, subject))
            .await
            .context("failed to create consumer")?;
        info!(durable, subject, "pull consumer ready");
        Ok(consumer)
    }
}

/// Explicit acks, bounded redelivery.
pub fn consumer_config(durable: &str, subject: &str) -> pull::Config {
    pull::Config {
        durable_name: Some(durable.to_string()),
        filter_subject: subject.to_string(),
        ack_policy: AckPolicy::Explicit,
        ack_wait: ACK_WAIT,
        max_deliver: MAX_DELIVER,
        ..Default::default()
    }
}

/// How to settle every message of a batch once the handler has run.
/// A failed batch goes back to the server with a delay, never immediately.
pub fn settlement(handled: bool) -> AckKind {
    if handled {
        AckKind::Ack
    } else {
        AckKind::Nak(Some(REDELIVERY_DELAY))
    }
}

pub struct JetStreamPublisher {
    context: jetstream::Context,
    subject: String,
    timeout: Duration,
}

#[async_trait]
impl QueueTransport for JetStreamPublisher {
    async fn publish(&self, message_id: &str, payload: Bytes) -> Result<()> {
        let mut headers = HeaderMap::new();
        headers.insert(async_nats::header::NATS_MESSAGE_ID, message_id);
        let publish = async {
            let ack = self
                .context
                .publish_with_headers(self.subject.clone(), headers, payload)
                .await
                .context("failed to publish to JetStream")?;
            ack.await.context("JetStream did not acknowledge publish")?;
            Ok::<_, anyhow::Error>(())
        };
        tokio::time::timeout(self.timeout, publish)
            .await
            .with_context(|| format!("publish timed out after {:?}", self.timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn failed_batch_is_redelivered_later() {
        assert!(matches!(settlement(true), AckKind::Ack));
        match settlement(false) {
            AckKind::Nak(Some(delay)) => assert_eq!(delay, REDELIVERY_DELAY),
            other => panic!("expected delayed nak, got {other:?}"),
        }
        assert!(REDELIVERY_DELAY >= Duration::from_secs(1));
    }

    #[test]
    fn consumer_redelivery_is_bounded() {
        let config = consumer_config("guestbook-notifier", "guestbook.entries");
        assert_eq!(config.durable_name.as_deref(), Some("guestbook-notifier"));
        assert_eq!(config.filter_subject, "guestbook.entries");
        assert!(matches!(config.ack_policy, AckPolicy::Explicit));
        assert_eq!(config.ack_wait, ACK_WAIT);
        assert_eq!(config.max_deliver, MAX_DELIVER);
        assert!(config.max_deliver > 0);
    }

    #[tokio::test]
    async fn publish_fails_fast_when_queue_is_unreachable() {
        // Nothing listens on port 1; the client keeps retrying in the background.
        let nats = NatsClient::connect("nats://127.0.0.1:1", Duration::from_millis(200))
            .await
            .unwrap();
        let publisher = nats.publisher("guestbook.entries");

        let started = Instant::now();
        let result = publisher
            .publish("entry-1", Bytes::from_static(b"{}"))
            .await;
        assert!(result.is_err());
        assert!(started.elapsed() < PUBLISH_TIMEOUT + Duration::from_secs(1));
    }
}
