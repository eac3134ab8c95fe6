//! Deferred-work drain.
//!
//! The [`BatchWorker`] claims pending records, hands each payload to an
//! [`ExecutionEngine`] and records exactly one terminal status per claimed
//! record. Failed executions are not retried.

pub mod batch;
pub mod engine;
pub mod shutdown;

pub use batch::{BatchWorker, CycleReport, CANCELLED_ERROR};
pub use engine::{ExecutionEngine, HttpEngine};
pub use shutdown::cancel_on_shutdown;
