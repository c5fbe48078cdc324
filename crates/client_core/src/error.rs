use shared::{domain::RecordId, error::NumericInputError, schema::ResourceSchema};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOperation {
    List,
    Create,
    Update,
    Delete,
}

impl RemoteOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            RemoteOperation::List => "list",
            RemoteOperation::Create => "create",
            RemoteOperation::Update => "update",
            RemoteOperation::Delete => "delete",
        }
    }

    /// Text shown to the user when this call fails.
    pub fn failure_message(self, schema: &ResourceSchema) -> String {
        match self {
            RemoteOperation::List => format!("Error fetching {}.", schema.collection),
            RemoteOperation::Create => format!("Error adding {}.", schema.item),
            RemoteOperation::Update => format!("Error updating {}.", schema.item),
            RemoteOperation::Delete => format!("Error deleting {}.", schema.item),
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("{} request failed: {source:#}", .operation.as_str())]
    RemoteCallFailed {
        operation: RemoteOperation,
        source: anyhow::Error,
    },
    #[error(transparent)]
    InvalidNumericInput(#[from] NumericInputError),
    #[error("record is incomplete; missing: {}", .missing.join(", "))]
    IncompleteRecord { missing: Vec<String> },
    #[error("no record with id {0} in the collection")]
    UnknownRecord(RecordId),
}

impl SyncError {
    pub fn remote(operation: RemoteOperation, source: anyhow::Error) -> Self {
        SyncError::RemoteCallFailed { operation, source }
    }

    /// The error-state string, for the variants that set one.
    pub fn user_message(&self, schema: &ResourceSchema) -> Option<String> {
        match self {
            SyncError::RemoteCallFailed { operation, .. } => {
                Some(operation.failure_message(schema))
            }
            SyncError::InvalidNumericInput(err) => Some(err.to_string()),
            SyncError::IncompleteRecord { .. } | SyncError::UnknownRecord(_) => None,
        }
    }
}
