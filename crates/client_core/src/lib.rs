use std::{collections::HashSet, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use shared::{
    domain::{PendingRecord, Record, RecordId},
    protocol::Acknowledgement,
    schema::ResourceSchema,
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

pub mod error;
pub mod transport;

pub use error::{RemoteOperation, SyncError};
pub use transport::HttpRemoteCollection;

/// The remote side of a synchronized list.
#[async_trait]
pub trait RemoteCollection: Send + Sync {
    async fn list(&self) -> Result<Vec<Record>>;
    /// Returns whatever the server sent back: the created record or an ack.
    async fn create(&self, body: &Map<String, Value>) -> Result<Value>;
    async fn update(&self, id: &RecordId, record: &Record) -> Result<Acknowledgement>;
    async fn delete(&self, id: &RecordId) -> Result<Acknowledgement>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    CollectionReplaced(Vec<Record>),
    RecordChanged(Record),
    RecordRemoved(RecordId),
    PendingChanged(PendingRecord),
    Acknowledged(String),
    Error(String),
    ErrorCleared,
}

/// Read-only copy of the controller state for a view.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncSnapshot {
    pub records: Vec<Record>,
    pub pending: PendingRecord,
    pub error: Option<String>,
}

impl SyncSnapshot {
    /// False for a default snapshot, whose draft has no fields.
    pub fn can_create(&self) -> bool {
        self.pending.is_complete()
    }
}

struct SyncState {
    records: Vec<Record>,
    pending: PendingRecord,
    error: Option<String>,
}

impl SyncState {
    fn take_error(&mut self) -> bool {
        self.error.take().is_some()
    }
}

/// Keeps a local list mirrored from a [`RemoteCollection`].
///
/// The state lock is never held across a remote call, so operations may
/// overlap. Overlapping loads are not sequenced: whichever response arrives
/// last replaces the collection.
pub struct ListSyncController {
    schema: ResourceSchema,
    remote: Arc<dyn RemoteCollection>,
    inner: Mutex<SyncState>,
    events: broadcast::Sender<SyncEvent>,
}

impl ListSyncController {
    pub fn new(schema: ResourceSchema, remote: Arc<dyn RemoteCollection>) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        let pending = PendingRecord::for_schema(&schema);
        Arc::new(Self {
            schema,
            remote,
            inner: Mutex::new(SyncState {
                records: Vec::new(),
                pending,
                error: None,
            }),
            events,
        })
    }

    pub fn schema(&self) -> &ResourceSchema {
        &self.schema
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> SyncSnapshot {
        let guard = self.inner.lock().await;
        SyncSnapshot {
            records: guard.records.clone(),
            pending: guard.pending.clone(),
            error: guard.error.clone(),
        }
    }

    pub async fn records(&self) -> Vec<Record> {
        self.inner.lock().await.records.clone()
    }

    pub async fn pending(&self) -> PendingRecord {
        self.inner.lock().await.pending.clone()
    }

    pub async fn error(&self) -> Option<String> {
        self.inner.lock().await.error.clone()
    }

    pub async fn can_create(&self) -> bool {
        self.inner.lock().await.pending.is_complete()
    }

    /// Replaces the collection with the server's list.
    pub async fn load(&self) -> Result<(), SyncError> {
        let records = match self.remote.list().await {
            Ok(records) => records,
            Err(source) => {
                return Err(self
                    .record_failure(SyncError::remote(RemoteOperation::List, source))
                    .await)
            }
        };

        warn_on_duplicate_ids(&self.schema, &records);
        let cleared = {
            let mut guard = self.inner.lock().await;
            guard.records = records.clone();
            guard.take_error()
        };
        info!(
            resource = %self.schema.collection,
            count = records.len(),
            "collection loaded"
        );
        self.emit(SyncEvent::CollectionReplaced(records));
        if cleared {
            self.emit(SyncEvent::ErrorCleared);
        }
        Ok(())
    }

    /// Sets one field of the pending record. Returns false for unknown fields.
    pub async fn start_edit(&self, field: &str, value: impl Into<String>) -> bool {
        let pending = {
            let mut guard = self.inner.lock().await;
            if !guard.pending.set(field, value) {
                None
            } else {
                Some(guard.pending.clone())
            }
        };
        match pending {
            Some(pending) => {
                self.emit(SyncEvent::PendingChanged(pending));
                true
            }
            None => {
                debug!(resource = %self.schema.collection, field, "ignoring edit of unknown field");
                false
            }
        }
    }

    /// Creates the pending record remotely, then reloads the whole list.
    ///
    /// The created record is never appended locally; the reload is the only
    /// way it enters the collection.
    pub async fn create(&self) -> Result<(), SyncError> {
        let pending = self.inner.lock().await.pending.clone();
        let missing = pending.missing_fields();
        if !missing.is_empty() {
            return Err(SyncError::IncompleteRecord { missing });
        }

        let body = match self.schema.create_body(&pending) {
            Ok(body) => body,
            Err(err) => return Err(self.record_failure(err.into()).await),
        };

        let body_json = Value::Object(body.clone());
        info!(resource = %self.schema.item, body = %body_json, "creating record");
        let created = match self.remote.create(&body).await {
            Ok(created) => created,
            Err(source) => {
                return Err(self
                    .record_failure(SyncError::remote(RemoteOperation::Create, source))
                    .await)
            }
        };
        info!(resource = %self.schema.item, response = %created, "record created");

        let (pending, cleared) = {
            let mut guard = self.inner.lock().await;
            guard.pending.clear();
            (guard.pending.clone(), guard.take_error())
        };
        self.emit(SyncEvent::PendingChanged(pending));
        if cleared {
            self.emit(SyncEvent::ErrorCleared);
        }

        self.load().await
    }

    /// Local edit of one field; no request is sent. Returns false when no
    /// record has `id`, or when `field` is `id`.
    pub async fn edit_field(&self, id: &RecordId, field: &str, value: impl Into<String>) -> bool {
        if field == "id" {
            warn!(resource = %self.schema.item, %id, "record ids are immutable");
            return false;
        }

        let changed = {
            let mut guard = self.inner.lock().await;
            guard
                .records
                .iter_mut()
                .find(|record| &record.id == id)
                .map(|record| {
                    record
                        .fields
                        .insert(field.to_string(), Value::String(value.into()));
                    record.clone()
                })
        };

        match changed {
            Some(record) => {
                self.emit(SyncEvent::RecordChanged(record));
                true
            }
            None => {
                debug!(resource = %self.schema.item, %id, field, "edit for unknown record ignored");
                false
            }
        }
    }

    /// Sends the local copy of a record to the server.
    ///
    /// The collection is not reloaded afterwards: the local edit stands.
    pub async fn commit_update(&self, id: &RecordId) -> Result<(), SyncError> {
        let record = self
            .inner
            .lock()
            .await
            .records
            .iter()
            .find(|record| &record.id == id)
            .cloned();
        let Some(record) = record else {
            return Err(SyncError::UnknownRecord(id.clone()));
        };

        let payload = match self.schema.coerce_record(&record) {
            Ok(payload) => payload,
            Err(err) => return Err(self.record_failure(err.into()).await),
        };

        info!(resource = %self.schema.item, %id, "updating record");
        let ack = match self.remote.update(id, &payload).await {
            Ok(ack) => ack,
            Err(source) => {
                return Err(self
                    .record_failure(SyncError::remote(RemoteOperation::Update, source))
                    .await)
            }
        };

        info!(resource = %self.schema.item, %id, message = ack.message(), "record updated");
        let cleared = self.inner.lock().await.take_error();
        self.emit(SyncEvent::Acknowledged(ack.message().to_string()));
        if cleared {
            self.emit(SyncEvent::ErrorCleared);
        }
        Ok(())
    }

    /// Removes a record remotely, then locally once the server confirmed.
    pub async fn delete_record(&self, id: &RecordId) -> Result<(), SyncError> {
        info!(resource = %self.schema.item, %id, "deleting record");
        let ack = match self.remote.delete(id).await {
            Ok(ack) => ack,
            Err(source) => {
                return Err(self
                    .record_failure(SyncError::remote(RemoteOperation::Delete, source))
                    .await)
            }
        };

        info!(resource = %self.schema.item, %id, message = ack.message(), "record deleted");
        let cleared = {
            let mut guard = self.inner.lock().await;
            guard.records.retain(|record| &record.id != id);
            guard.take_error()
        };
        self.emit(SyncEvent::RecordRemoved(id.clone()));
        self.emit(SyncEvent::Acknowledged(ack.message().to_string()));
        if cleared {
            self.emit(SyncEvent::ErrorCleared);
        }
        Ok(())
    }

    /// Logs `err`, stores its user-facing message, and hands it back.
    async fn record_failure(&self, err: SyncError) -> SyncError {
        match &err {
            SyncError::RemoteCallFailed { operation, source } => error!(
                resource = %self.schema.collection,
                operation = operation.as_str(),
                "remote call failed: {source:#}"
            ),
            other => warn!(resource = %self.schema.collection, "{other}"),
        }

        if let Some(message) = err.user_message(&self.schema) {
            self.inner.lock().await.error = Some(message.clone());
            self.emit(SyncEvent::Error(message));
        }
        err
    }

    fn emit(&self, event: SyncEvent) {
        let _ = self.events.send(event);
    }
}

fn warn_on_duplicate_ids(schema: &ResourceSchema, records: &[Record]) {
    let mut seen = HashSet::with_capacity(records.len());
    for record in records {
        if !seen.insert(&record.id) {
            warn!(resource = %schema.collection, id = %record.id, "duplicate id in server list");
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
