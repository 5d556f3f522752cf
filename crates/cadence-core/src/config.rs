use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

// Scheduling limits — mirror the platform bounds recurring background work
// is normally held to, so definitions stay portable.
/// Smallest accepted repeat interval (15 minutes).
pub const MIN_INTERVAL_SECS: u64 = 15 * 60;
/// First retry delay after a retryable failure (30 seconds).
pub const DEFAULT_BACKOFF_BASE_SECS: u64 = 30;
/// Upper bound on any retry delay (5 hours); the work interval clamps lower.
pub const DEFAULT_BACKOFF_CAP_SECS: u64 = 5 * 60 * 60;
/// Default cap on a single execution (10 minutes).
pub const DEFAULT_EXECUTION_TIMEOUT_SECS: u64 = 10 * 60;
/// Default wake cadence of the scheduler loop.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

/// Top-level config (cadence.toml + CADENCE_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CadenceConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Scheduler loop and retry tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between forced wake cycles. Environment changes wake the loop
    /// earlier; this is the ceiling on how stale a due-scan can get.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// First retry delay after a retryable failure, in seconds.
    #[serde(default = "default_backoff_base")]
    pub backoff_base_secs: u64,
    /// Absolute cap on retry delays, in seconds.
    #[serde(default = "default_backoff_cap")]
    pub backoff_cap_secs: u64,
    /// Hard limit on a single execution, in seconds. `None` disables the cap.
    #[serde(default = "default_execution_timeout")]
    pub execution_timeout_secs: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            backoff_base_secs: DEFAULT_BACKOFF_BASE_SECS,
            backoff_cap_secs: DEFAULT_BACKOFF_CAP_SECS,
            execution_timeout_secs: Some(DEFAULT_EXECUTION_TIMEOUT_SECS),
        }
    }
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}
fn default_backoff_base() -> u64 {
    DEFAULT_BACKOFF_BASE_SECS
}
fn default_backoff_cap() -> u64 {
    DEFAULT_BACKOFF_CAP_SECS
}
fn default_execution_timeout() -> Option<u64> {
    Some(DEFAULT_EXECUTION_TIMEOUT_SECS)
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.cadence/cadence.db", home)
}

impl CadenceConfig {
    /// Load config from a TOML file with CADENCE_* env var overrides.
    ///
    /// Checks the explicit path argument first, then ~/.cadence/cadence.toml.
    /// A missing file is fine — every field has a default.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: CadenceConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("CADENCE_").split("_"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.cadence/cadence.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = CadenceConfig::default();
        assert_eq!(config.scheduler.poll_interval_secs, 30);
        assert_eq!(config.scheduler.backoff_base_secs, 30);
        assert!(config.scheduler.backoff_cap_secs > config.scheduler.backoff_base_secs);
        assert_eq!(config.scheduler.execution_timeout_secs, Some(600));
        assert!(config.database.path.ends_with("cadence.db"));
    }

    #[test]
    fn toml_file_overrides_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "cadence.toml",
                r#"
                [database]
                path = "/tmp/test.db"

                [scheduler]
                poll_interval_secs = 5
                "#,
            )?;
            let config = CadenceConfig::load(Some("cadence.toml")).expect("load");
            assert_eq!(config.database.path, "/tmp/test.db");
            assert_eq!(config.scheduler.poll_interval_secs, 5);
            // Untouched fields keep their defaults.
            assert_eq!(config.scheduler.backoff_base_secs, DEFAULT_BACKOFF_BASE_SECS);
            Ok(())
        });
    }

    #[test]
    fn env_overrides_toml() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "cadence.toml",
                r#"
                [database]
                path = "/tmp/from-toml.db"
                "#,
            )?;
            jail.set_env("CADENCE_DATABASE_PATH", "/tmp/from-env.db");
            let config = CadenceConfig::load(Some("cadence.toml")).expect("load");
            assert_eq!(config.database.path, "/tmp/from-env.db");
            Ok(())
        });
    }
}
