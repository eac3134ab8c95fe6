//! Gate decision types shared by the security screen, the classifier and the
//! router.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Urgency tier assigned to a request.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    /// Rejected by the security screen.
    Blocked,
    /// Deferred batch work.
    Low,
    /// Lightweight inline response.
    Medium,
    /// Full reasoning engine.
    High,
}

impl Tier {
    pub const ALL: &'static [Tier] = &[Tier::Blocked, Tier::Low, Tier::Medium, Tier::High];

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Blocked => "BLOCKED",
            Tier::Low => "LOW",
            Tier::Medium => "MEDIUM",
            Tier::High => "HIGH",
        }
    }

    /// Parse a tier name, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BLOCKED" => Some(Tier::Blocked),
            "LOW" => Some(Tier::Low),
            "MEDIUM" => Some(Tier::Medium),
            "HIGH" => Some(Tier::High),
            _ => None,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tier::parse(s).ok_or_else(|| format!("unknown tier '{s}' (expected LOW, MEDIUM, HIGH or BLOCKED)"))
    }
}

/// Outcome of a single gate.
///
/// The security screen either blocks or passes without committing to a tier;
/// the classifier always commits to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "verdict", content = "tier")]
pub enum Verdict {
    Pass,
    Tiered(Tier),
}

/// A fresh, immutable decision produced by one gate for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateDecision {
    pub verdict: Verdict,
    /// Human-readable reason for the decision.
    pub reason: String,
    /// Suggested next action for the caller.
    pub action: String,
    /// Free-form metadata (matched rule, fired checks, ...).
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl GateDecision {
    pub fn pass(reason: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Pass,
            reason: reason.into(),
            action: "CLASSIFY".into(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn tiered(tier: Tier, reason: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Tiered(tier),
            reason: reason.into(),
            action: action.into(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// The committed tier, if any. `None` for a passing security screen.
    pub fn tier(&self) -> Option<Tier> {
        match self.verdict {
            Verdict::Pass => None,
            Verdict::Tiered(t) => Some(t),
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.tier() == Some(Tier::Blocked)
    }
}
