//! Configuration loading.
//!
//! Resolution order: an explicit `--config` path, then `TRIAGE_GATE_CONFIG`,
//! then `config.toml` in the platform config directory, then built-in
//! defaults. An explicitly named file must exist; the implicit locations are
//! optional.

pub mod schema;

pub use schema::{
    ClassifierConfig, Config, EngineConfig, LogConfig, SecurityConfig, StoreConfig, WorkerConfig,
};

use anyhow::Context;
use std::path::{Path, PathBuf};

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "TRIAGE_GATE_CONFIG";

/// `config.toml` under the platform config directory, if one can be determined.
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "triage-gate")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

impl Config {
    /// Parse, expand paths and validate a TOML document.
    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        let mut config: Config = toml::from_str(raw).context("invalid configuration TOML")?;
        config.expand_paths();
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a config file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("in config file {}", path.display()))
    }

    /// Resolve and load the effective configuration.
    ///
    /// Returns the config together with the file it came from, or `None` when
    /// built-in defaults were used.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<(Self, Option<PathBuf>)> {
        let env_path = std::env::var_os(CONFIG_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        Self::resolve(explicit, env_path, default_config_path())
    }

    fn resolve(
        explicit: Option<&Path>,
        env_path: Option<PathBuf>,
        platform_path: Option<PathBuf>,
    ) -> anyhow::Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit.map(Path::to_path_buf).or(env_path) {
            let config = Self::from_file(&path)?;
            tracing::debug!(path = %path.display(), "loaded configuration");
            return Ok((config, Some(path)));
        }

        if let Some(path) = platform_path.filter(|p| p.is_file()) {
            let config = Self::from_file(&path)?;
            tracing::debug!(path = %path.display(), "loaded configuration");
            return Ok((config, Some(path)));
        }

        let mut config = Config::default();
        config.expand_paths();
        config.validate()?;
        tracing::debug!("no configuration file found, using defaults");
        Ok((config, None))
    }

    /// JSON schema of the configuration file.
    pub fn json_schema() -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(Config)).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gatekeeper::decision::Tier;
    use tempfile::TempDir;

    #[test]
    fn empty_document_yields_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.security, SecurityConfig::default());
        assert_eq!(config.worker.batch_size, 10);
        assert_eq!(config.store.busy_timeout_ms, 5_000);
        assert_eq!(config.log.level, "info");
        assert!(config.engine.url.is_none());
    }

    #[test]
    fn partial_tables_keep_other_defaults() {
        let config = Config::from_toml_str(
            r#"
            [security]
            max_input_chars = 500

            [worker]
            tier_filter = "LOW"
            "#,
        )
        .unwrap();
        assert_eq!(config.security.max_input_chars, 500);
        assert_eq!(config.security.sql_keyword_threshold, 2);
        assert_eq!(config.worker.tier_filter, Some(Tier::Low));
        assert_eq!(config.worker.poll_interval_secs, 5);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let err = Config::from_toml_str("[worker]\nbatch_size = 0\n").unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn zero_input_ceiling_is_rejected() {
        let err = Config::from_toml_str("[security]\nmax_input_chars = 0\n").unwrap_err();
        assert!(err.to_string().contains("max_input_chars"));
    }

    #[test]
    fn non_http_engine_url_is_rejected() {
        assert!(Config::from_toml_str("[engine]\nurl = \"ftp://engine\"\n").is_err());
        assert!(Config::from_toml_str("[engine]\nurl = \"http://127.0.0.1:9000/run\"\n").is_ok());
    }

    #[test]
    fn unknown_tier_filter_is_a_parse_error() {
        assert!(Config::from_toml_str("[worker]\ntier_filter = \"URGENT\"\n").is_err());
    }

    #[test]
    fn tilde_paths_are_expanded() {
        let config = Config::from_toml_str(
            "[store]\ndb_path = \"~/triage/deferred.db\"\n[classifier]\nrules_path = \"~/rules.toml\"\n",
        )
        .unwrap();
        assert!(!config.store.db_path.to_string_lossy().starts_with('~'));
        let rules = config.classifier.rules_path.unwrap();
        assert!(!rules.to_string_lossy().starts_with('~'));
    }

    #[test]
    fn explicit_path_wins_over_env_and_platform() {
        let tmp = TempDir::new().unwrap();
        let explicit = tmp.path().join("explicit.toml");
        let env = tmp.path().join("env.toml");
        std::fs::write(&explicit, "[worker]\nbatch_size = 3\n").unwrap();
        std::fs::write(&env, "[worker]\nbatch_size = 7\n").unwrap();

        let (config, source) =
            Config::resolve(Some(&explicit), Some(env.clone()), None).unwrap();
        assert_eq!(config.worker.batch_size, 3);
        assert_eq!(source.as_deref(), Some(explicit.as_path()));

        let (config, source) = Config::resolve(None, Some(env.clone()), None).unwrap();
        assert_eq!(config.worker.batch_size, 7);
        assert_eq!(source, Some(env));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope.toml");
        assert!(Config::resolve(Some(&missing), None, None).is_err());
    }

    #[test]
    fn missing_platform_file_falls_back_to_defaults() {
        let tmp = TempDir::new().unwrap();
        let (config, source) =
            Config::resolve(None, None, Some(tmp.path().join("config.toml"))).unwrap();
        assert!(source.is_none());
        assert_eq!(config.worker.batch_size, 10);
    }

    #[test]
    fn schema_describes_every_table() {
        let schema = Config::json_schema();
        let text = schema.to_string();
        for table in ["store", "security", "classifier", "worker", "engine", "log"] {
            assert!(text.contains(&format!("\"{table}\"")), "schema lacks {table}");
        }
    }
}
