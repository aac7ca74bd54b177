//! Queue-triggered email notifications.
//!
//! One invocation handles one delivered batch. Any failure fails the whole
//! invocation, and redelivery is left to the queue transport.
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, instrument};

use crate::mailer::{EmailTransport, OutgoingEmail};
use crate::model::NotificationEvent;
use crate::parameters::{self, ConfigResolutionError, ConfigSource};

pub const SUBJECT: &str = "New Guestbook Entry!";

/// One message as delivered by the queue.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub body: Bytes,
    /// How many times the transport has delivered this message, starting at 1.
    pub attempt: i64,
}

impl Delivery {
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            attempt: 1,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("message {index} is not a notification event: {source}")]
    Decode {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigResolutionError),
    #[error("failed to send email for entry {entry_id}: {source}")]
    Send {
        entry_id: i64,
        #[source]
        source: anyhow::Error,
    },
}

pub struct NotificationConsumer {
    params: Arc<dyn ConfigSource>,
    mailer: Arc<dyn EmailTransport>,
}

impl NotificationConsumer {
    pub fn new(params: Arc<dyn ConfigSource>, mailer: Arc<dyn EmailTransport>) -> Self {
        Self { params, mailer }
    }

    /// Decode every message of the batch, resolve the addresses, then send
    /// one email per event in delivery order. Returns the number sent.
    #[instrument(skip_all, fields(batch = batch.len()))]
    pub async fn handle_batch(&self, batch: &[Delivery]) -> Result<usize, ConsumerError> {
        info!(count = batch.len(), "notification batch received");
        if batch.is_empty() {
            return Ok(0);
        }
        let result = self.process(batch).await;
        if let Err(err) = &result {
            error!(error = %err, "notification batch failed");
        }
        result
    }

    async fn process(&self, batch: &[Delivery]) -> Result<usize, ConsumerError> {
        let events = batch
            .iter()
            .enumerate()
            .map(|(index, delivery)| {
                NotificationEvent::from_payload(&delivery.body)
                    .map_err(|source| ConsumerError::Decode { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let from = self.params.resolve(parameters::EMAIL_FROM).await?;
        let to = self.params.resolve(parameters::EMAIL_TO).await?;

        for (event, delivery) in events.iter().zip(batch) {
            info!(
                entry_id = event.entry_id,
                attempt = delivery.attempt,
                "sending email for {}",
                event.name
            );
            let email = compose(event, &from, &to);
            let message_id =
                self.mailer
                    .send(&email)
                    .await
                    .map_err(|source| ConsumerError::Send {
                        entry_id: event.entry_id,
                        source,
                    })?;
            info!(entry_id = event.entry_id, %message_id, "email sent");
        }
        Ok(events.len())
    }
}

pub fn compose(event: &NotificationEvent, from: &str, to: &str) -> OutgoingEmail {
    OutgoingEmail {
        from: from.to_string(),
        to: vec![to.to_string()],
        subject: SUBJECT.to_string(),
        text: format!("Name: {}\nMessage: {}", event.name, event.message),
    }
}
