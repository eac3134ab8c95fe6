use crate::gatekeeper::decision::Tier;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration, one table per pipeline stage.
///
/// Every field has a default, so an empty file (or no file at all) yields a
/// working setup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub security: SecurityConfig,
    pub classifier: ClassifierConfig,
    pub worker: WorkerConfig,
    pub engine: EngineConfig,
    pub log: LogConfig,
}

/// `[store]`: location and locking behaviour of the deferred-work database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file. `~` is expanded.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// How long a writer waits on another process's lock before failing.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

/// `[security]`: thresholds for the zero-cost screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SecurityConfig {
    /// Inputs longer than this many characters are rejected unread.
    pub max_input_chars: usize,
    /// SQL keyword occurrences must exceed this count (alongside a SQL
    /// metacharacter) to block.
    pub sql_keyword_threshold: usize,
    /// Shell metacharacter occurrences at or above this count block.
    pub shell_metachar_threshold: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_input_chars: 10_000,
            sql_keyword_threshold: 2,
            shell_metachar_threshold: 3,
        }
    }
}

/// `[classifier]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ClassifierConfig {
    /// TOML rule table replacing the built-in rules. `~` is expanded.
    pub rules_path: Option<PathBuf>,
}

/// `[worker]`: batch drain loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct WorkerConfig {
    /// Maximum records claimed per cycle. Must be at least 1.
    pub batch_size: usize,
    /// Sleep between polls that found nothing to do.
    pub poll_interval_secs: u64,
    /// Restrict claims to a single tier.
    pub tier_filter: Option<Tier>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            poll_interval_secs: 5,
            tier_filter: None,
        }
    }
}

/// `[engine]`: downstream execution endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EngineConfig {
    /// HTTP endpoint receiving `{"request_id", "payload"}` posts. Commands
    /// that execute work fail when this is unset.
    pub url: Option<String>,
    /// Sent as `Authorization: Bearer <token>` when present.
    pub bearer_token: Option<String>,
}

/// `[log]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing-subscriber` filter directive; `RUST_LOG` takes precedence.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

fn default_db_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "triage-gate")
        .map(|dirs| dirs.data_dir().join("deferred.db"))
        .unwrap_or_else(|| PathBuf::from("deferred.db"))
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl Config {
    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.worker.batch_size == 0 {
            anyhow::bail!("worker.batch_size must be at least 1");
        }
        if self.security.max_input_chars == 0 {
            anyhow::bail!("security.max_input_chars must be at least 1");
        }
        if self.store.db_path.as_os_str().is_empty() {
            anyhow::bail!("store.db_path must not be empty");
        }
        if let Some(url) = &self.engine.url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                anyhow::bail!("engine.url must be an http(s) URL, got '{url}'");
            }
        }
        Ok(())
    }

    /// Expand `~` in every configured path.
    pub fn expand_paths(&mut self) {
        self.store.db_path = expand(&self.store.db_path);
        if let Some(rules) = self.classifier.rules_path.take() {
            self.classifier.rules_path = Some(expand(&rules));
        }
    }
}

fn expand(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(raw) => PathBuf::from(shellexpand::tilde(raw).into_owned()),
        None => path.to_path_buf(),
    }
}
