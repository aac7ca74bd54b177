//! Best-effort publication of notification events.
//!
//! `publish` never returns an error: a transport failure is logged with the
//! entry id and reported as `PublishOutcome::Failed`.
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::model::{Entry, NotificationEvent};
use crate::queue::QueueTransport;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to encode notification for entry {entry_id}: {source}")]
    Encode {
        entry_id: i64,
        #[source]
        source: serde_json::Error,
    },
    #[error("queue transport failed for entry {entry_id}: {source}")]
    Transport {
        entry_id: i64,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Debug)]
pub enum PublishOutcome {
    Published,
    Failed(RelayError),
}

impl PublishOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, PublishOutcome::Published)
    }
}

#[derive(Clone)]
pub struct NotificationRelay {
    transport: Arc<dyn QueueTransport>,
}

impl NotificationRelay {
    pub fn new(transport: Arc<dyn QueueTransport>) -> Self {
        Self { transport }
    }

    #[instrument(skip_all, fields(entry_id = entry.id))]
    pub async fn publish(&self, entry: &Entry) -> PublishOutcome {
        match self.try_publish(entry).await {
            Ok(()) => {
                info!(entry_id = entry.id, "notification queued");
                PublishOutcome::Published
            }
            Err(err) => {
                warn!(entry_id = entry.id, error = %err, "notification not queued");
                PublishOutcome::Failed(err)
            }
        }
    }

    async fn try_publish(&self, entry: &Entry) -> Result<(), RelayError> {
        let entry_id = entry.id;
        let payload = NotificationEvent::from(entry)
            .to_payload()
            .map_err(|source| RelayError::Encode { entry_id, source })?;
        self.transport
            .publish(&message_id(entry_id), Bytes::from(payload))
            .await
            .map_err(|source| RelayError::Transport { entry_id, source })
    }
}

pub fn message_id(entry_id: i64) -> String {
    format!("entry-{entry_id}")
}
