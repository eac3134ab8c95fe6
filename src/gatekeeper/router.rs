//! Routing engine.
//!
//! Runs the security screen, honours the critical bypass, consults the
//! classifier and turns the result into exactly one terminal outcome per
//! request. Only LOW-tier requests touch the deferred store.

use crate::config::Config;
use crate::gatekeeper::classifier::{ClassificationGate, RuleTableError};
use crate::gatekeeper::decision::{GateDecision, Tier};
use crate::queue::{DeferredStore, QueueError, QueueRecord};
use crate::security::SecurityGate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ── Request / outcome ────────────────────────────────────────────

/// One caller request. Lives only for the duration of a `route` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub text: String,
    pub submitter_id: String,
    /// Skip classification and the queue. Never skips the security screen.
    pub critical: bool,
}

impl Request {
    pub fn new(text: impl Into<String>, submitter_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            submitter_id: submitter_id.into(),
            critical: false,
        }
    }

    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }
}

/// Terminal routing outcome. Exactly one per request.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    /// The security screen fired. Nothing was stored.
    Blocked { request_id: String, reason: String },
    /// Critical request that passed the screen. The caller invokes the
    /// engine directly; the store was not consulted.
    Bypass { request_id: String },
    /// LOW tier: persisted as a pending record.
    Queued { request_id: String },
    /// MEDIUM tier: answer inline.
    FastPath {
        request_id: String,
        decision: GateDecision,
    },
    /// HIGH tier: full reasoning engine.
    HeavyPath {
        request_id: String,
        decision: GateDecision,
    },
}

impl RouteOutcome {
    pub fn request_id(&self) -> &str {
        match self {
            RouteOutcome::Blocked { request_id, .. }
            | RouteOutcome::Bypass { request_id }
            | RouteOutcome::Queued { request_id }
            | RouteOutcome::FastPath { request_id, .. }
            | RouteOutcome::HeavyPath { request_id, .. } => request_id,
        }
    }

    /// Short label used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            RouteOutcome::Blocked { .. } => "blocked",
            RouteOutcome::Bypass { .. } => "bypass",
            RouteOutcome::Queued { .. } => "queued",
            RouteOutcome::FastPath { .. } => "fast_path",
            RouteOutcome::HeavyPath { .. } => "heavy_path",
        }
    }

    /// Whether the caller should hand the request to the execution engine now.
    pub fn needs_engine(&self) -> bool {
        matches!(
            self,
            RouteOutcome::Bypass { .. } | RouteOutcome::HeavyPath { .. }
        )
    }

    /// Caller-facing response body.
    pub fn to_response(&self) -> RouteResponse {
        match self {
            RouteOutcome::Blocked { request_id, reason } => RouteResponse::Blocked {
                request_id: request_id.clone(),
                reason: reason.clone(),
                message: "Request rejected by the security screen.".into(),
            },
            RouteOutcome::Bypass { request_id } => RouteResponse::Critical {
                request_id: request_id.clone(),
                bypass_queue: true,
                path: "kernel_direct".into(),
                action: "INVOKE_DIRECT".into(),
            },
            RouteOutcome::Queued { request_id } => RouteResponse::Queued {
                request_id: request_id.clone(),
                path: "lazy".into(),
                message: "Request queued for batch processing.".into(),
                next_check: next_check_locator(request_id),
            },
            RouteOutcome::FastPath {
                request_id,
                decision,
            } => RouteResponse::Routing {
                request_id: request_id.clone(),
                path: "flash".into(),
                message: "Routed to the fast path.".into(),
                action: decision.action.clone(),
                details: decision.clone(),
            },
            RouteOutcome::HeavyPath {
                request_id,
                decision,
            } => RouteResponse::Routing {
                request_id: request_id.clone(),
                path: "heavy".into(),
                message: "Routed to the reasoning engine.".into(),
                action: decision.action.clone(),
                details: decision.clone(),
            },
        }
    }
}

/// Locator a caller polls for a queued request. Resolved by
/// [`DeferredStore::get`].
pub fn next_check_locator(request_id: &str) -> String {
    format!("queue/{request_id}")
}

/// JSON body returned to callers, tagged by `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RouteResponse {
    Blocked {
        request_id: String,
        reason: String,
        message: String,
    },
    Critical {
        request_id: String,
        bypass_queue: bool,
        path: String,
        action: String,
    },
    Queued {
        request_id: String,
        path: String,
        message: String,
        next_check: String,
    },
    Routing {
        request_id: String,
        path: String,
        message: String,
        action: String,
        details: GateDecision,
    },
}

/// Routing failure. Only persistence can fail; a failed push is never
/// reported as queued.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("failed to queue request: {0}")]
    Queue(#[from] QueueError),
}

// ── Router ───────────────────────────────────────────────────────

/// Combines the gates and the deferred store. Holds no mutable state, so one
/// instance can serve concurrent callers.
pub struct Router {
    security: SecurityGate,
    classifier: ClassificationGate,
    store: Arc<dyn DeferredStore>,
}

impl Router {
    pub fn new(
        security: SecurityGate,
        classifier: ClassificationGate,
        store: Arc<dyn DeferredStore>,
    ) -> Self {
        Self {
            security,
            classifier,
            store,
        }
    }

    /// Build the gates from configuration around an existing store.
    pub fn from_config(
        config: &Config,
        store: Arc<dyn DeferredStore>,
    ) -> Result<Self, RuleTableError> {
        Ok(Self::new(
            SecurityGate::new(config.security.clone()),
            ClassificationGate::from_config(&config.classifier)?,
            store,
        ))
    }

    pub fn store(&self) -> &Arc<dyn DeferredStore> {
        &self.store
    }

    pub fn classifier(&self) -> &ClassificationGate {
        &self.classifier
    }

    /// Route one request.
    ///
    /// 1. Security screen, unconditionally.
    /// 2. Critical requests bypass classification and the store.
    /// 3. Classification; LOW is pushed as a pending record.
    pub fn route(&self, request: &Request) -> Result<RouteOutcome, RouteError> {
        let request_id = uuid::Uuid::new_v4().to_string();

        let screen = self.security.screen(&request.text);
        if screen.is_blocked() {
            tracing::warn!(
                request_id = %request_id,
                submitter = %request.submitter_id,
                critical = request.critical,
                outcome = "blocked",
                reason = %screen.reason,
                "request rejected"
            );
            return Ok(RouteOutcome::Blocked {
                request_id,
                reason: screen.reason,
            });
        }

        if request.critical {
            tracing::info!(
                request_id = %request_id,
                submitter = %request.submitter_id,
                outcome = "bypass",
                "critical request bypassing queue"
            );
            return Ok(RouteOutcome::Bypass { request_id });
        }

        let decision = self.classifier.classify(&request.text);
        let outcome = match decision.tier() {
            Some(Tier::Low) => {
                let record = QueueRecord::pending(
                    request_id.clone(),
                    request.text.clone(),
                    &decision,
                    request.submitter_id.clone(),
                    Tier::Low,
                );
                if let Err(e) = self.store.push(&record) {
                    tracing::error!(
                        request_id = %request_id,
                        submitter = %request.submitter_id,
                        outcome = "error",
                        "failed to queue request: {e}"
                    );
                    return Err(e.into());
                }
                RouteOutcome::Queued { request_id }
            }
            Some(Tier::Medium) => RouteOutcome::FastPath {
                request_id,
                decision,
            },
            // Rule tables cannot target BLOCKED; treat it as a rejection anyway.
            Some(Tier::Blocked) => RouteOutcome::Blocked {
                request_id,
                reason: decision.reason,
            },
            Some(Tier::High) | None => RouteOutcome::HeavyPath {
                request_id,
                decision,
            },
        };

        tracing::info!(
            request_id = %outcome.request_id(),
            submitter = %request.submitter_id,
            outcome = outcome.label(),
            "request routed"
        );
        Ok(outcome)
    }
}

// ── Tests ────────────────────────────────────────────────────────
