//! Service configuration
//!
//! Loaded from a JSON file; every section has defaults so an empty file (or
//! a missing one, via `Config::default()`) yields a runnable service.
//! A few settings can be overridden from the environment.

use serde::Deserialize;
use tracing::trace;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerSection,
    pub database: DatabaseSection,
    pub auth: AuthSection,
    pub scheduler: SchedulerSection,
    pub notify: NotifySection,
    pub log: LogSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8088,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub path: String,
    pub max_connections: u32,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: "pulsewatch.db".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    pub secret: String,
    pub token_expire_hours: i64,
    pub admin_password: String,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            secret: "pulsewatch-secret-change-me".to_string(),
            token_expire_hours: 24,
            admin_password: "admin123".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    /// Probe cadence applied when a target does not set one (seconds).
    pub default_interval: u32,
    /// Probe deadline applied when a target does not set one (seconds).
    pub default_timeout: u32,
    /// Consecutive failures before an alert fires.
    pub alert_threshold: u32,
    pub result_retention_days: u32,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            default_interval: 30,
            default_timeout: 5,
            alert_threshold: 3,
            result_retention_days: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifySection {
    /// Dispatch a recovery notification when an alert resolves.
    pub send_resolved: bool,
}

impl Default for NotifySection {
    fn default() -> Self {
        Self {
            send_resolved: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSection {
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Env overrides take precedence over the file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(secret) = std::env::var("PULSEWATCH_AUTH_SECRET") {
            if !secret.is_empty() {
                self.auth.secret = secret;
            }
        }
        if let Ok(path) = std::env::var("PULSEWATCH_DATABASE_PATH") {
            if !path.is_empty() {
                self.database.path = path;
            }
        }
        if let Ok(threshold) = std::env::var("PULSEWATCH_ALERT_THRESHOLD") {
            if let Ok(threshold) = threshold.parse() {
                self.scheduler.alert_threshold = threshold;
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.scheduler.alert_threshold < 1 {
            anyhow::bail!("scheduler.alert_threshold must be at least 1");
        }
        if self.scheduler.default_interval < 1 {
            anyhow::bail!("scheduler.default_interval must be at least 1 second");
        }
        if self.scheduler.default_timeout > self.scheduler.default_interval {
            anyhow::bail!("scheduler.default_timeout must not exceed scheduler.default_interval");
        }
        Ok(())
    }
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    let mut config: Config = serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("invalid configuration file: {e}"))?;
    config.apply_env_overrides();
    config.validate()?;
    trace!("loaded config: {config:?}");
    Ok(config)
}
