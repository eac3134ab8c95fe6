//! Request triage.
//!
//! A request passes the security screen, then (unless flagged critical) the
//! classifier, and the router turns the two decisions into one outcome:
//! - `BLOCKED`: rejected, nothing stored
//! - `LOW`: pushed to the deferred store for the batch worker
//! - `MEDIUM`: answered on the fast path
//! - `HIGH`: handed to the reasoning engine
//!
//! ## Design
//! - Gates are pure functions of their input and configuration.
//! - The classifier is an ordered rule table; first match wins and no match
//!   falls back to `HIGH`.
//! - The router owns no mutable state; the store is injected.

pub mod classifier;
pub mod decision;
pub mod router;

pub use classifier::{ClassificationGate, RuleSpec, RuleTable, RuleTableError};
pub use decision::{GateDecision, Tier, Verdict};
pub use router::{Request, RouteError, RouteOutcome, RouteResponse, Router};
