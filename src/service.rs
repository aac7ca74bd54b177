use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, instrument};

use crate::db::{EntryStore, StorageError};
use crate::model::Entry;
use crate::relay::{NotificationRelay, PublishOutcome};
use crate::validate::{validate, RawSubmission, ValidationError};

#[derive(Debug, Error)]
pub enum CreateError {
    #[error(transparent)]
    Rejected(#[from] ValidationError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result of a successful create.
///
/// `notification` is informational only; the caller's response is fixed by
/// `entry` alone.
#[derive(Debug)]
pub struct CreateOutcome {
    pub entry: Entry,
    pub notification: PublishOutcome,
}

/// Validate, persist, then notify, one submission at a time. Holds no
/// per-request state, so concurrent calls need no coordination.
#[derive(Clone)]
pub struct IngestionService {
    store: Arc<dyn EntryStore>,
    relay: NotificationRelay,
}

impl IngestionService {
    pub fn new(store: Arc<dyn EntryStore>, relay: NotificationRelay) -> Self {
        Self { store, relay }
    }

    #[instrument(skip_all)]
    pub async fn list(&self) -> Result<Vec<Entry>, StorageError> {
        self.store.list_all().await.inspect_err(|err| {
            error!(error = %err, "failed to list entries");
        })
    }

    /// Phase one: the entry must be durably stored. Phase two runs only after
    /// phase one succeeded, and its outcome never turns into an error.
    #[instrument(skip_all)]
    pub async fn create(&self, raw: &RawSubmission) -> Result<CreateOutcome, CreateError> {
        let draft = validate(raw).inspect_err(|reason| {
            debug!(%reason, "submission rejected");
        })?;

        let entry = self
            .store
            .insert(&draft.name, &draft.message)
            .await
            .inspect_err(|err| error!(error = %err, "failed to store entry"))?;
        info!(entry_id = entry.id, "entry stored");

        let notification = self.relay.publish(&entry).await;
        Ok(CreateOutcome {
            entry,
            notification,
        })
    }
}
