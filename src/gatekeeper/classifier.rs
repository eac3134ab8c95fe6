//! Tier classification from an ordered rule table.
//!
//! The matching engine is generic: a rule is a matcher plus the tier, reason
//! and action it yields. Rules are evaluated top to bottom and the first match
//! wins; when nothing matches the request is `HIGH` ("complex reasoning"), the
//! conservative fallback that assumes the expensive path.
//!
//! Tables are plain data and can be loaded from TOML:
//!
//! ```toml
//! [[rules]]
//! name = "simple_query"
//! tier = "MEDIUM"
//! reason = "simple query"
//! action = "RESPOND_INLINE"
//! match = { kind = "prefix", patterns = ["what is", "tell me"] }
//! ```

use crate::config::ClassifierConfig;
use crate::gatekeeper::decision::{GateDecision, Tier};
use aho_corasick::AhoCorasick;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Reason attached to the fallback decision.
pub const FALLBACK_REASON: &str = "complex reasoning";
/// Action attached to the fallback decision.
pub const FALLBACK_ACTION: &str = "INVOKE_ENGINE";

/// Conversational / informational openers.
const SIMPLE_QUERY_PREFIXES: &[&str] = &[
    "what is",
    "what are",
    "what's",
    "tell me",
    "list",
    "status",
    "hello",
    "hi",
    "hey",
    "good morning",
    "good afternoon",
    "good evening",
    "greetings",
    "bye",
    "goodbye",
    "see you",
    "thanks",
    "thank you",
];

/// Background / batch vocabulary, matched as whole words anywhere in the text.
/// Inflections are listed explicitly so "logic" or "reporter" never match.
const BATCH_VOCABULARY: &[&str] = &[
    "schedule",
    "schedules",
    "scheduled",
    "scheduling",
    "batch",
    "batches",
    "batched",
    "report",
    "reports",
    "reporting",
    "export",
    "exports",
    "exported",
    "exporting",
    "log",
    "logs",
    "logging",
    "archive",
    "archives",
    "archived",
    "archiving",
];

// ── Rule table errors ────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum RuleTableError {
    #[error("failed to read rule table {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse rule table: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("rule '{0}' targets BLOCKED; only the security screen may block")]
    BlockedTier(String),
    #[error("rule '{0}' has no patterns")]
    EmptyPatterns(String),
    #[error("duplicate rule name '{0}'")]
    DuplicateName(String),
    #[error("rule '{rule}' has an invalid regex: {source}")]
    InvalidRegex {
        rule: String,
        #[source]
        source: regex::Error,
    },
    #[error("rule '{rule}' could not build its pattern automaton: {message}")]
    Automaton { rule: String, message: String },
}

// ── Rule specs (data) ────────────────────────────────────────────

/// How a rule matches the normalized (trimmed, lowercased) request text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatcherSpec {
    /// Text starts with one of the phrases, followed by a word boundary.
    Prefix { patterns: Vec<String> },
    /// One of the substrings appears anywhere.
    Contains { patterns: Vec<String> },
    /// One of the words appears as a whole word.
    Word { patterns: Vec<String> },
    /// A regular expression matches.
    Regex { pattern: String },
}

/// One row of the rule table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub name: String,
    pub tier: Tier,
    pub reason: String,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(rename = "match")]
    pub matcher: MatcherSpec,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RuleTableFile {
    #[serde(default)]
    rules: Vec<RuleSpec>,
}

/// The built-in rule table.
pub fn default_rules() -> Vec<RuleSpec> {
    vec![
        RuleSpec {
            name: "simple_query".into(),
            tier: Tier::Medium,
            reason: "simple query".into(),
            action: Some("RESPOND_INLINE".into()),
            matcher: MatcherSpec::Prefix {
                patterns: SIMPLE_QUERY_PREFIXES.iter().map(|s| (*s).to_string()).collect(),
            },
        },
        RuleSpec {
            name: "batch_processing".into(),
            tier: Tier::Low,
            reason: "batch processing".into(),
            action: Some("ENQUEUE".into()),
            matcher: MatcherSpec::Word {
                patterns: BATCH_VOCABULARY.iter().map(|s| (*s).to_string()).collect(),
            },
        },
    ]
}

fn default_action(tier: Tier) -> &'static str {
    match tier {
        Tier::Blocked => "REJECT",
        Tier::Low => "ENQUEUE",
        Tier::Medium => "RESPOND_INLINE",
        Tier::High => FALLBACK_ACTION,
    }
}

// ── Compiled matchers ────────────────────────────────────────────

enum Matcher {
    Prefix(Vec<String>),
    Contains {
        automaton: AhoCorasick,
        patterns: Vec<String>,
    },
    Word {
        regex: Regex,
    },
    Regex(Regex),
}

impl Matcher {
    fn compile(rule: &str, spec: &MatcherSpec) -> Result<Self, RuleTableError> {
        let normalize = |patterns: &[String]| -> Result<Vec<String>, RuleTableError> {
            let out: Vec<String> = patterns
                .iter()
                .map(|p| p.trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect();
            if out.is_empty() {
                return Err(RuleTableError::EmptyPatterns(rule.to_string()));
            }
            Ok(out)
        };

        match spec {
            MatcherSpec::Prefix { patterns } => Ok(Matcher::Prefix(normalize(patterns)?)),
            MatcherSpec::Contains { patterns } => {
                let patterns = normalize(patterns)?;
                let automaton = AhoCorasick::new(&patterns).map_err(|e| RuleTableError::Automaton {
                    rule: rule.to_string(),
                    message: e.to_string(),
                })?;
                Ok(Matcher::Contains {
                    automaton,
                    patterns,
                })
            }
            MatcherSpec::Word { patterns } => {
                let patterns = normalize(patterns)?;
                let alternation = patterns
                    .iter()
                    .map(|p| regex::escape(p))
                    .collect::<Vec<_>>()
                    .join("|");
                let regex = Regex::new(&format!(r"\b(?:{alternation})\b")).map_err(|source| {
                    RuleTableError::InvalidRegex {
                        rule: rule.to_string(),
                        source,
                    }
                })?;
                Ok(Matcher::Word { regex })
            }
            MatcherSpec::Regex { pattern } => {
                if pattern.trim().is_empty() {
                    return Err(RuleTableError::EmptyPatterns(rule.to_string()));
                }
                let regex = Regex::new(&format!("(?i){pattern}")).map_err(|source| {
                    RuleTableError::InvalidRegex {
                        rule: rule.to_string(),
                        source,
                    }
                })?;
                Ok(Matcher::Regex(regex))
            }
        }
    }

    /// Returns the matched fragment, if any.
    fn find(&self, text: &str) -> Option<String> {
        match self {
            Matcher::Prefix(patterns) => patterns
                .iter()
                .find(|p| starts_with_phrase(text, p))
                .cloned(),
            Matcher::Contains {
                automaton,
                patterns,
            } => automaton
                .find(text)
                .map(|m| patterns[m.pattern().as_usize()].clone()),
            Matcher::Word { regex } | Matcher::Regex(regex) => {
                regex.find(text).map(|m| m.as_str().to_string())
            }
        }
    }
}

/// `text` begins with `phrase` and the phrase ends on a word boundary.
fn starts_with_phrase(text: &str, phrase: &str) -> bool {
    text.strip_prefix(phrase)
        .is_some_and(|rest| rest.chars().next().is_none_or(|c| !c.is_alphanumeric()))
}

struct Rule {
    spec: RuleSpec,
    matcher: Matcher,
}

// ── Rule table ───────────────────────────────────────────────────

/// An ordered, validated rule table.
pub struct RuleTable {
    rules: Vec<Rule>,
}

impl RuleTable {
    /// Compile and validate a list of rule specs.
    pub fn new(specs: Vec<RuleSpec>) -> Result<Self, RuleTableError> {
        let mut seen = HashSet::new();
        let mut rules = Vec::with_capacity(specs.len());
        for spec in specs {
            if spec.tier == Tier::Blocked {
                return Err(RuleTableError::BlockedTier(spec.name));
            }
            if !seen.insert(spec.name.clone()) {
                return Err(RuleTableError::DuplicateName(spec.name));
            }
            let matcher = Matcher::compile(&spec.name, &spec.matcher)?;
            rules.push(Rule { spec, matcher });
        }
        Ok(Self { rules })
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, RuleTableError> {
        let file: RuleTableFile = toml::from_str(raw)?;
        Self::new(file.rules)
    }

    pub fn load(path: &Path) -> Result<Self, RuleTableError> {
        let raw = std::fs::read_to_string(path).map_err(|source| RuleTableError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Rule specs in evaluation order.
    pub fn specs(&self) -> impl Iterator<Item = &RuleSpec> {
        self.rules.iter().map(|r| &r.spec)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        // The built-in table is static and always valid.
        Self::new(default_rules()).unwrap_or(Self { rules: Vec::new() })
    }
}

// ── Classification gate ──────────────────────────────────────────

/// Stateless classifier over an immutable rule table.
#[derive(Default)]
pub struct ClassificationGate {
    table: RuleTable,
}

impl ClassificationGate {
    pub fn new(table: RuleTable) -> Self {
        Self { table }
    }

    /// Build from config: the file at `rules_path` if set, otherwise the
    /// built-in table.
    pub fn from_config(config: &ClassifierConfig) -> Result<Self, RuleTableError> {
        let table = match &config.rules_path {
            Some(path) => RuleTable::load(path)?,
            None => RuleTable::default(),
        };
        Ok(Self::new(table))
    }

    pub fn table(&self) -> &RuleTable {
        &self.table
    }

    /// Assign a tier to text that already passed the security screen.
    pub fn classify(&self, text: &str) -> GateDecision {
        let normalized = text.trim().to_lowercase();

        for (index, rule) in self.table.rules.iter().enumerate() {
            if let Some(fragment) = rule.matcher.find(&normalized) {
                let spec = &rule.spec;
                let action = spec
                    .action
                    .clone()
                    .unwrap_or_else(|| default_action(spec.tier).to_string());
                return GateDecision::tiered(spec.tier, spec.reason.clone(), action)
                    .with_meta("rule", spec.name.clone())
                    .with_meta("rule_index", index)
                    .with_meta("matched", fragment);
            }
        }

        GateDecision::tiered(Tier::High, FALLBACK_REASON, FALLBACK_ACTION).with_meta("rule", "fallback")
    }
}
