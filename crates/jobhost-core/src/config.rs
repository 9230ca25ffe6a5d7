use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{JobhostError, Result};

pub const DEFAULT_SCHEDULER_NAME: &str = "jobhost";
pub const DEFAULT_CHECKIN_INTERVAL_SECS: u64 = 15;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
/// A run that has not refreshed its signal for this long is reported as stuck.
pub const DEFAULT_SIGNAL_TIMEOUT_SECS: u64 = 60;

/// Top-level config (jobhost.toml + JOBHOST_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobhostConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub mail: MailConfig,
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

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Logical scheduler name shared by every instance of one cluster.
    #[serde(default = "default_scheduler_name")]
    pub name: String,
    /// Unique id of this process inside the cluster. Generated at start when unset.
    pub instance_id: Option<String>,
    #[serde(default = "default_checkin_interval")]
    pub checkin_interval_secs: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            name: default_scheduler_name(),
            instance_id: None,
            checkin_interval_secs: DEFAULT_CHECKIN_INTERVAL_SECS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Root under which per-run staging directories are created.
    #[serde(default = "default_temp_root")]
    pub temp_root: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            temp_root: default_temp_root(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Watchdog window for the derived "stuck run" flag.
    #[serde(default = "default_signal_timeout")]
    pub signal_timeout_secs: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            signal_timeout_secs: DEFAULT_SIGNAL_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// Sender address stamped on messages requested by jobs.
    #[serde(default = "default_mail_from")]
    pub from: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            from: default_mail_from(),
        }
    }
}

fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.jobhost/jobhost.db", home)
}
fn default_scheduler_name() -> String {
    DEFAULT_SCHEDULER_NAME.to_string()
}
fn default_checkin_interval() -> u64 {
    DEFAULT_CHECKIN_INTERVAL_SECS
}
fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}
fn default_temp_root() -> String {
    std::env::temp_dir()
        .join("jobhost")
        .to_string_lossy()
        .into_owned()
}
fn default_signal_timeout() -> u64 {
    DEFAULT_SIGNAL_TIMEOUT_SECS
}
fn default_mail_from() -> String {
    "jobhost@localhost".to_string()
}

impl JobhostConfig {
    /// Load config from a TOML file with JOBHOST_* env var overrides.
    ///
    /// Nested keys are separated by a double underscore so field names keep
    /// their own underscores: `JOBHOST_HISTORY__SIGNAL_TIMEOUT_SECS=120`.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);
        tracing::debug!(path = %path, "loading config");

        let config: Self = Self::figment(&path)
            .extract()
            .map_err(|e| JobhostError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that parse but would stall the scheduler or blank out
    /// cluster identity.
    pub fn validate(&self) -> Result<()> {
        let invalid = |field, reason| Err(JobhostError::InvalidSetting { field, reason });
        if self.scheduler.name.trim().is_empty() {
            return invalid("scheduler.name", "must not be empty");
        }
        if self.scheduler.poll_interval_ms == 0 {
            return invalid("scheduler.poll_interval_ms", "must be positive");
        }
        if self.scheduler.checkin_interval_secs == 0 {
            return invalid("scheduler.checkin_interval_secs", "must be positive");
        }
        if self.history.signal_timeout_secs == 0 {
            return invalid("history.signal_timeout_secs", "must be positive");
        }
        Ok(())
    }

    fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("JOBHOST_").split("__"))
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.jobhost/jobhost.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        figment::Jail::expect_with(|_jail| {
            let config = JobhostConfig::load(Some("does-not-exist.toml")).unwrap();
            assert_eq!(config.scheduler.name, DEFAULT_SCHEDULER_NAME);
            assert_eq!(config.history.signal_timeout_secs, DEFAULT_SIGNAL_TIMEOUT_SECS);
            assert!(config.scheduler.instance_id.is_none());
            Ok(())
        });
    }

    #[test]
    fn toml_and_env_are_merged() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "jobhost.toml",
                r#"
                [database]
                path = "/var/lib/jobhost/jobs.db"

                [scheduler]
                name = "nightly"
                instance_id = "node-a"

                [runner]
                temp_root = "/scratch"
                "#,
            )?;
            jail.set_env("JOBHOST_HISTORY__SIGNAL_TIMEOUT_SECS", "300");

            let config = JobhostConfig::load(Some("jobhost.toml")).unwrap();
            assert_eq!(config.database.path, "/var/lib/jobhost/jobs.db");
            assert_eq!(config.scheduler.name, "nightly");
            assert_eq!(config.scheduler.instance_id.as_deref(), Some("node-a"));
            assert_eq!(config.scheduler.checkin_interval_secs, DEFAULT_CHECKIN_INTERVAL_SECS);
            assert_eq!(config.runner.temp_root, "/scratch");
            assert_eq!(config.history.signal_timeout_secs, 300);
            Ok(())
        });
    }

    #[test]
    fn malformed_value_is_a_config_error() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("jobhost.toml", "[history]\nsignal_timeout_secs = \"soon\"\n")?;
            let err = JobhostConfig::load(Some("jobhost.toml")).unwrap_err();
            assert_eq!(err.code(), "CONFIG_ERROR");
            Ok(())
        });
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("JOBHOST_SCHEDULER__POLL_INTERVAL_MS", "0");
            let err = JobhostConfig::load(Some("missing.toml")).unwrap_err();
            assert!(matches!(
                err,
                JobhostError::InvalidSetting {
                    field: "scheduler.poll_interval_ms",
                    ..
                }
            ));
            Ok(())
        });
    }

    #[test]
    fn defaults_are_valid() {
        JobhostConfig::default().validate().unwrap();
    }
}
