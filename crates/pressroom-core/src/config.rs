use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

// Scheduler defaults — overridable via pressroom.toml or PRESSROOM_* env vars.
pub const DEFAULT_DB_PATH: &str = "pressroom.db";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5; // due-item polling cadence
pub const DEFAULT_DISPATCH_TIMEOUT_SECS: u64 = 30; // per-item publish() ceiling

/// Top-level config (pressroom.toml + PRESSROOM_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PressroomConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Scheduling engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Path to the SQLite database holding the `scheduled_items` table.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Seconds between due-item polls.
    /// Override with env var: PRESSROOM_SCHEDULER__POLL_INTERVAL_SECS=1
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Hard ceiling on a single publish() call. A slow target must never
    /// stall the polling cycle indefinitely.
    #[serde(default = "default_dispatch_timeout")]
    pub dispatch_timeout_secs: u64,
}

fn default_db_path() -> String {
    DEFAULT_DB_PATH.to_string()
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_dispatch_timeout() -> u64 {
    DEFAULT_DISPATCH_TIMEOUT_SECS
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            dispatch_timeout_secs: DEFAULT_DISPATCH_TIMEOUT_SECS,
        }
    }
}

impl Default for PressroomConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl PressroomConfig {
    /// Load configuration from a TOML file merged with `PRESSROOM_*` env vars.
    ///
    /// A missing file is fine — every field has a default. Env vars use `__`
    /// to separate sections, e.g. `PRESSROOM_SCHEDULER__DB_PATH`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path.unwrap_or("pressroom.toml");

        let config: PressroomConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("PRESSROOM_").split("__"))
            .extract()
            .map_err(|e| crate::error::PressroomError::Config(e.to_string()))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = PressroomConfig::default();
        assert_eq!(cfg.scheduler.db_path, DEFAULT_DB_PATH);
        assert_eq!(cfg.scheduler.poll_interval_secs, DEFAULT_POLL_INTERVAL_SECS);
        assert_eq!(
            cfg.scheduler.dispatch_timeout_secs,
            DEFAULT_DISPATCH_TIMEOUT_SECS
        );
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = PressroomConfig::load(Some("/nonexistent/pressroom.toml")).unwrap();
        assert_eq!(cfg.scheduler.poll_interval_secs, DEFAULT_POLL_INTERVAL_SECS);
    }
}
