//! Zero-cost security screen.
//!
//! Runs before any other stage and is never skipped, including for requests
//! carrying the critical flag. Every check is deterministic and allocation-light:
//! character counting, a whole-word keyword regex and a small signature table.
//! A firing check yields a `BLOCKED` decision whose reason names every check
//! that fired; a clean input yields a `PASS` decision with no tier.

use crate::config::SecurityConfig;
use crate::gatekeeper::decision::{GateDecision, Tier};
use regex::Regex;
use std::sync::LazyLock;

/// SQL metacharacters that turn a keyword-heavy input into an injection.
const SQL_METACHARS: &[&str] = &["--", ";", "'", "\"", "%", "|", "&", "^"];

/// Shell metacharacters counted for command injection.
const SHELL_METACHARS: &[char] = &[
    ';', '&', '|', '`', '$', '(', ')', '{', '}', '[', ']', '<', '>',
];

static SQL_KEYWORDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:select|insert|delete|update)\b").unwrap());

/// Destructive statement signatures that block on their own, without the
/// keyword-count threshold.
static SQL_SIGNATURES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    vec![
        (
            "drop_object",
            Regex::new(r"(?i)\bdrop\s+(?:table|database|schema)\b").unwrap(),
        ),
        (
            "truncate_table",
            Regex::new(r"(?i)\btruncate\s+table\b").unwrap(),
        ),
        (
            "union_select",
            Regex::new(r"(?i)\bunion\s+(?:all\s+)?select\b").unwrap(),
        ),
        (
            "tautology",
            Regex::new(r"(?i)'\s*or\s+'?1'?\s*=\s*'?1").unwrap(),
        ),
    ]
});

/// Individual screen checks. Each maps to a stable id and a reason string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenCheck {
    EmptyInput,
    InputTooLarge,
    SqlInjection,
    CommandInjection,
}

impl ScreenCheck {
    pub fn id(self) -> &'static str {
        match self {
            ScreenCheck::EmptyInput => "empty_input",
            ScreenCheck::InputTooLarge => "input_too_large",
            ScreenCheck::SqlInjection => "sql_injection",
            ScreenCheck::CommandInjection => "command_injection",
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            ScreenCheck::EmptyInput => "empty input",
            ScreenCheck::InputTooLarge => "input too large",
            ScreenCheck::SqlInjection => "sql injection pattern",
            ScreenCheck::CommandInjection => "command injection pattern",
        }
    }
}

/// Stateless security gate. Cheap to clone and safe to share across threads.
#[derive(Debug, Clone, Default)]
pub struct SecurityGate {
    config: SecurityConfig,
}

impl SecurityGate {
    pub fn new(config: SecurityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    /// Screen raw caller text.
    pub fn screen(&self, text: &str) -> GateDecision {
        if text.trim().is_empty() {
            return blocked(&[ScreenCheck::EmptyInput], serde_json::Map::new());
        }

        // Oversized input is rejected before any content scan.
        let chars = text.chars().count();
        if chars > self.config.max_input_chars {
            let mut meta = serde_json::Map::new();
            meta.insert("length".into(), chars.into());
            meta.insert("limit".into(), self.config.max_input_chars.into());
            return blocked(&[ScreenCheck::InputTooLarge], meta);
        }

        let mut fired = Vec::new();
        let mut meta = serde_json::Map::new();

        let keyword_hits = SQL_KEYWORDS.find_iter(text).count();
        let has_sql_meta = SQL_METACHARS.iter().any(|m| text.contains(m));
        let signature = SQL_SIGNATURES
            .iter()
            .find(|(_, re)| re.is_match(text))
            .map(|(id, _)| *id);
        if (keyword_hits > self.config.sql_keyword_threshold && has_sql_meta) || signature.is_some() {
            fired.push(ScreenCheck::SqlInjection);
            meta.insert("sql_keywords".into(), keyword_hits.into());
            if let Some(id) = signature {
                meta.insert("sql_signature".into(), id.into());
            }
        }

        let shell_hits = text.chars().filter(|c| SHELL_METACHARS.contains(c)).count();
        if shell_hits >= self.config.shell_metachar_threshold {
            fired.push(ScreenCheck::CommandInjection);
            meta.insert("shell_metachars".into(), shell_hits.into());
        }

        if fired.is_empty() {
            GateDecision::pass("passed security screen")
        } else {
            blocked(&fired, meta)
        }
    }
}

fn blocked(fired: &[ScreenCheck], mut meta: serde_json::Map<String, serde_json::Value>) -> GateDecision {
    let reason = fired
        .iter()
        .map(|c| c.reason())
        .collect::<Vec<_>>()
        .join("; ");
    let ids: Vec<serde_json::Value> = fired.iter().map(|c| c.id().into()).collect();
    meta.insert("checks".into(), ids.into());

    let mut decision = GateDecision::tiered(Tier::Blocked, reason, "REJECT");
    decision.metadata = meta;
    decision
}
