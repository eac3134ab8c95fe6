use crate::queue::record::RecordStatus;

/// Failures surfaced by a [`DeferredStore`](super::DeferredStore).
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// A record with this id already exists. Records are never overwritten.
    #[error("request id '{0}' already exists in the deferred store")]
    DuplicateKey(String),

    /// The backing medium could not be read or written.
    #[error("deferred store unavailable: {0}")]
    StorageUnavailable(String),

    #[error("request id '{0}' not found")]
    NotFound(String),

    /// The requested status change would break the one-directional lifecycle.
    #[error("request id '{request_id}' is {from}, cannot move to {to}")]
    InvalidTransition {
        request_id: String,
        from: RecordStatus,
        to: RecordStatus,
    },

    /// A stored row could not be decoded.
    #[error("corrupt record '{request_id}': {message}")]
    Corrupt { request_id: String, message: String },
}

impl From<rusqlite::Error> for QueueError {
    fn from(err: rusqlite::Error) -> Self {
        QueueError::StorageUnavailable(err.to_string())
    }
}

impl From<std::io::Error> for QueueError {
    fn from(err: std::io::Error) -> Self {
        QueueError::StorageUnavailable(err.to_string())
    }
}

pub type QueueResult<T> = Result<T, QueueError>;
