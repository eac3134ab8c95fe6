//! Durable deferred-work queue.
//!
//! LOW-tier requests are persisted here by the router and drained by the
//! batch worker. The store is the only shared mutable resource in the
//! pipeline; its one non-negotiable discipline is that `claim` selects and
//! marks records in a single atomic statement, so two workers can never
//! dispatch the same record.
//!
//! ## Design
//! - SQLite in WAL mode with `synchronous = FULL`: a pushed record survives a
//!   crash or restart.
//! - Records are never deleted; retention is an external concern.
//! - Records stuck in `processing` after a worker crash are reported by
//!   [`DeferredStore::stranded`] but never recovered automatically.

pub mod error;
pub mod record;
pub mod sqlite;

use crate::gatekeeper::decision::Tier;
use std::time::Duration;

pub use error::{QueueError, QueueResult};
pub use record::{QueueRecord, QueueStatus, RecordStatus};
pub use sqlite::SqliteDeferredStore;

/// Storage contract for deferred records.
///
/// Every method is safe under concurrent callers.
pub trait DeferredStore: Send + Sync {
    /// Insert a new record. Fails with [`QueueError::DuplicateKey`] when the
    /// id exists and [`QueueError::StorageUnavailable`] when the medium cannot
    /// be written.
    fn push(&self, record: &QueueRecord) -> QueueResult<()>;

    /// Atomically move up to `limit` of the oldest pending records (optionally
    /// restricted to one tier) to `processing` and return them oldest-first.
    /// Returns an empty list when nothing is pending. Claimed rows that cannot
    /// be decoded are marked `failed` and left out of the result.
    fn claim(&self, limit: usize, tier: Option<Tier>) -> QueueResult<Vec<QueueRecord>>;

    /// processing → completed, attaching the engine result.
    fn complete(&self, request_id: &str, result: &str) -> QueueResult<()>;

    /// processing → failed, attaching the error message.
    fn fail(&self, request_id: &str, error: &str) -> QueueResult<()>;

    /// Aggregate counts, overall and per tier.
    fn status(&self) -> QueueResult<QueueStatus>;

    /// Look up a single record.
    fn get(&self, request_id: &str) -> QueueResult<Option<QueueRecord>>;

    /// Records that entered `processing` more than `older_than` ago. Read-only.
    fn stranded(&self, older_than: Duration) -> QueueResult<Vec<QueueRecord>>;
}
