//! Request triage and admission control.
//!
//! Sits between untrusted callers and an expensive execution engine:
//! a zero-cost security screen rejects hostile or malformed input, a rule
//! table assigns an urgency tier, the router picks the execution path and
//! LOW-tier work is persisted in a durable queue drained by a batch worker.

pub mod config;
pub mod gatekeeper;
pub mod queue;
pub mod security;
pub mod worker;

pub use config::Config;
pub use gatekeeper::{
    ClassificationGate, GateDecision, Request, RouteError, RouteOutcome, RouteResponse, Router,
    Tier,
};
pub use queue::{DeferredStore, QueueError, QueueRecord, QueueStatus, SqliteDeferredStore};
pub use security::SecurityGate;
pub use worker::{BatchWorker, CycleReport, ExecutionEngine, HttpEngine};
