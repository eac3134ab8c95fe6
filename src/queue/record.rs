use crate::gatekeeper::decision::{GateDecision, Tier};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle status of a deferred record.
///
/// Transitions are one-directional: pending → processing → completed | failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl RecordStatus {
    pub const ALL: &'static [RecordStatus] = &[
        RecordStatus::Pending,
        RecordStatus::Processing,
        RecordStatus::Completed,
        RecordStatus::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RecordStatus::Pending => "pending",
            RecordStatus::Processing => "processing",
            RecordStatus::Completed => "completed",
            RecordStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RecordStatus::Pending),
            "processing" => Some(RecordStatus::Processing),
            "completed" => Some(RecordStatus::Completed),
            "failed" => Some(RecordStatus::Failed),
            _ => None,
        }
    }

    /// `completed` and `failed` never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, RecordStatus::Completed | RecordStatus::Failed)
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A durably queued unit of deferred work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueRecord {
    pub request_id: String,
    /// Original caller text, submitted verbatim to the execution engine.
    pub payload: String,
    /// Serialized classification decision, kept for audit.
    pub gate_decision: String,
    pub submitter_id: String,
    pub tier: Tier,
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
    /// When the record entered `processing`.
    pub claimed_at: Option<DateTime<Utc>>,
    /// When the record reached a terminal status.
    pub processed_at: Option<DateTime<Utc>>,
    pub result: Option<String>,
    pub error: Option<String>,
}

impl QueueRecord {
    /// A fresh pending record stamped with the current time.
    pub fn pending(
        request_id: impl Into<String>,
        payload: impl Into<String>,
        decision: &GateDecision,
        submitter_id: impl Into<String>,
        tier: Tier,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            payload: payload.into(),
            // GateDecision only holds strings and JSON values; serialization cannot fail.
            gate_decision: serde_json::to_string(decision).unwrap_or_default(),
            submitter_id: submitter_id.into(),
            tier,
            status: RecordStatus::Pending,
            // Microsecond precision matches what the store persists.
            created_at: Utc::now().trunc_subsecs(6),
            claimed_at: None,
            processed_at: None,
            result: None,
            error: None,
        }
    }

    /// Decode the embedded gate decision.
    pub fn decision(&self) -> Option<GateDecision> {
        serde_json::from_str(&self.gate_decision).ok()
    }
}

/// Aggregate counts over the whole store.
///
/// The four status counts always sum to `total`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub total: u64,
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    /// tier → status → count. Only non-zero cells are present.
    pub by_tier: BTreeMap<String, BTreeMap<String, u64>>,
}

impl QueueStatus {
    /// Fold one `(tier, status, count)` group into the totals.
    pub fn add(&mut self, tier: &str, status: RecordStatus, count: u64) {
        self.total += count;
        match status {
            RecordStatus::Pending => self.pending += count,
            RecordStatus::Processing => self.processing += count,
            RecordStatus::Completed => self.completed += count,
            RecordStatus::Failed => self.failed += count,
        }
        *self
            .by_tier
            .entry(tier.to_string())
            .or_default()
            .entry(status.as_str().to_string())
            .or_default() += count;
    }

    pub fn is_consistent(&self) -> bool {
        self.pending + self.processing + self.completed + self.failed == self.total
    }
}
