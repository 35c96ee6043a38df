use anyhow::{Context, Result, bail};
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::error::ErrorCode;
use crate::locate::RemarkPolicy;
use crate::time::OperatingZone;

/// Environment variable that overrides `[time] policy`.
pub const TIME_POLICY_ENV: &str = "FIELDOPS_TIME_POLICY";

/// A config file that does not parse, or parses into unusable values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{}: {message}", ErrorCode::ConfigParseError)]
    Parse { message: String },

    #[error("{}: {field}: {message}", ErrorCode::ConfigParseError)]
    Invalid {
        field: &'static str,
        message: String,
    },
}

impl ConfigError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Parse { .. } | Self::Invalid { .. } => ErrorCode::ConfigParseError,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub time: TimeConfig,
    #[serde(default)]
    pub locate: LocateConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub ticker: TickerConfig,
    #[serde(default)]
    pub scrape: ScrapeConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimePolicy {
    /// US Pacific with DST.
    #[default]
    UsPacific,
    /// A fixed offset for the whole year.
    Fixed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeConfig {
    #[serde(default)]
    pub policy: TimePolicy,
    #[serde(default = "default_fixed_offset_hours")]
    pub fixed_offset_hours: i32,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            policy: TimePolicy::default(),
            fixed_offset_hours: default_fixed_offset_hours(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocateConfig {
    #[serde(default)]
    pub remark: RemarkPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
    #[serde(default = "default_refetch_after_secs")]
    pub refetch_after_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: default_stale_after_secs(),
            refetch_after_secs: default_refetch_after_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickerConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeConfig {
    #[serde(default = "default_lease_timeout_secs")]
    pub lease_timeout_secs: u64,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            lease_timeout_secs: default_lease_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EngineConfig {
    /// The single operating zone for this process.
    ///
    /// # Errors
    ///
    /// Fails when the fixed policy names an offset outside ±14 hours.
    pub fn operating_zone(&self) -> Result<OperatingZone> {
        match self.time.policy {
            TimePolicy::UsPacific => Ok(OperatingZone::us_pacific()),
            TimePolicy::Fixed => {
                let hours = self.time.fixed_offset_hours;
                if !(-14..=14).contains(&hours) {
                    return Err(ConfigError::Invalid {
                        field: "time.fixed_offset_hours",
                        message: format!("must be within -14..=14, got {hours}"),
                    }
                    .into());
                }
                OperatingZone::fixed_hours(hours)
                    .with_context(|| format!("invalid fixed offset {hours}h"))
            }
        }
    }

    /// Reject values the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError::Invalid`] for a zero tick interval, a
    /// staleness tolerance longer than the refetch interval, or a bad fixed
    /// offset.
    pub fn validate(&self) -> Result<()> {
        if self.ticker.interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "ticker.interval_ms",
                message: "must be greater than zero".to_string(),
            }
            .into());
        }
        if self.polling.stale_after_secs > self.polling.refetch_after_secs {
            return Err(ConfigError::Invalid {
                field: "polling.stale_after_secs",
                message: format!(
                    "{} exceeds refetch_after_secs {}",
                    self.polling.stale_after_secs, self.polling.refetch_after_secs
                ),
            }
            .into());
        }
        self.operating_zone().map(|_| ())
    }

    #[must_use]
    pub fn stale_after(&self) -> TimeDelta {
        secs(self.polling.stale_after_secs)
    }

    #[must_use]
    pub fn refetch_after(&self) -> TimeDelta {
        secs(self.polling.refetch_after_secs)
    }

    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.ticker.interval_ms)
    }

    #[must_use]
    pub fn lease_timeout(&self) -> TimeDelta {
        secs(self.scrape.lease_timeout_secs)
    }

    #[must_use]
    pub const fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store.timeout_secs)
    }
}

fn secs(value: u64) -> TimeDelta {
    i64::try_from(value)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX)
}

pub fn load_project_config(project_root: &Path) -> Result<EngineConfig> {
    let path = project_root.join(".fieldops/config.toml");
    if !path.exists() {
        return Ok(EngineConfig::default());
    }
    load_file(&path)
}

pub fn load_user_config() -> Result<EngineConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(EngineConfig::default());
    };

    let path = config_dir.join("fieldops/config.toml");
    if !path.exists() {
        return Ok(EngineConfig::default());
    }
    load_file(&path)
}

fn load_file(path: &Path) -> Result<EngineConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let config = toml::from_str::<EngineConfig>(&content)
        .map_err(|err| ConfigError::Parse {
            message: err.to_string(),
        })
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid config in {}", path.display()))?;
    Ok(config)
}

/// Effective configuration: the project file if present, otherwise the user
/// file, then the environment override for the time policy.
pub fn resolve_config(project_root: &Path) -> Result<EngineConfig> {
    let project_path = project_root.join(".fieldops/config.toml");
    let mut config = if project_path.exists() {
        load_project_config(project_root)?
    } else {
        load_user_config()?
    };

    let env_policy = env::var(TIME_POLICY_ENV).ok();
    config.time.policy = resolve_time_policy(config.time.policy, env_policy.as_deref())?;
    Ok(config)
}

/// Apply the environment override to the configured policy.
pub fn resolve_time_policy(configured: TimePolicy, env_value: Option<&str>) -> Result<TimePolicy> {
    let Some(raw) = env_value.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(configured);
    };
    match raw.to_ascii_lowercase().replace('_', "-").as_str() {
        "us-pacific" | "pacific" | "dst" => Ok(TimePolicy::UsPacific),
        "fixed" => Ok(TimePolicy::Fixed),
        _ => bail!("{TIME_POLICY_ENV}={raw} is not one of us-pacific, fixed"),
    }
}

const fn default_fixed_offset_hours() -> i32 {
    -8
}

const fn default_stale_after_secs() -> u64 {
    30
}

const fn default_refetch_after_secs() -> u64 {
    60
}

const fn default_interval_ms() -> u64 {
    1_000
}

const fn default_lease_timeout_secs() -> u64 {
    300
}

const fn default_timeout_secs() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ZonePolicy;

    fn write_project_config(root: &Path, content: &str) {
        let dir = root.join(".fieldops");
        std::fs::create_dir_all(&dir).expect("create config dir");
        std::fs::write(dir.join("config.toml"), content).expect("write config");
    }

    #[test]
    fn missing_project_config_uses_defaults() {
        let root = tempfile::tempdir().expect("temp dir");
        let cfg = load_project_config(root.path()).expect("load should succeed");
        assert_eq!(cfg.time.policy, TimePolicy::UsPacific);
        assert_eq!(cfg.time.fixed_offset_hours, -8);
        assert_eq!(cfg.locate.remark, RemarkPolicy::Reject);
        assert_eq!(cfg.stale_after(), TimeDelta::seconds(30));
        assert_eq!(cfg.refetch_after(), TimeDelta::seconds(60));
        assert_eq!(cfg.tick_interval(), Duration::from_secs(1));
        assert_eq!(cfg.lease_timeout(), TimeDelta::minutes(5));
        assert_eq!(cfg.store.base_url, None);
        assert_eq!(cfg.store_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let root = tempfile::tempdir().expect("temp dir");
        write_project_config(
            root.path(),
            r#"
[time]
policy = "fixed"

[locate]
remark = "ignore"

[store]
base_url = "https://ops.example.com/api"
"#,
        );

        let cfg = load_project_config(root.path()).expect("load should succeed");
        assert_eq!(cfg.time.policy, TimePolicy::Fixed);
        assert_eq!(cfg.time.fixed_offset_hours, -8);
        assert_eq!(cfg.locate.remark, RemarkPolicy::Ignore);
        assert_eq!(cfg.polling, PollingConfig::default());
        assert_eq!(cfg.store.base_url.as_deref(), Some("https://ops.example.com/api"));
        assert_eq!(cfg.store.timeout_secs, 10);

        let zone = cfg.operating_zone().expect("zone");
        assert!(matches!(zone.policy(), ZonePolicy::Fixed(_)));
    }

    #[test]
    fn malformed_config_reports_path() {
        let root = tempfile::tempdir().expect("temp dir");
        write_project_config(root.path(), "[time\npolicy = ");
        let err = load_project_config(root.path()).expect_err("parse should fail");
        assert!(err.to_string().contains("Failed to parse"));
        let cause = err.downcast_ref::<ConfigError>().expect("typed cause");
        assert_eq!(cause.code(), ErrorCode::ConfigParseError);
        assert!(cause.to_string().starts_with("E1002"));
    }

    #[test]
    fn zero_tick_interval_is_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.ticker.interval_ms = 0;
        let err = cfg.validate().expect_err("zero interval");
        let cause = err.downcast_ref::<ConfigError>().expect("typed cause");
        assert!(matches!(
            cause,
            ConfigError::Invalid {
                field: "ticker.interval_ms",
                ..
            }
        ));

        let root = tempfile::tempdir().expect("temp dir");
        write_project_config(root.path(), "[ticker]\ninterval_ms = 0\n");
        let err = load_project_config(root.path()).expect_err("load should fail");
        assert!(err.to_string().contains("Invalid config"));
    }

    #[test]
    fn stale_tolerance_cannot_exceed_refetch() {
        let mut cfg = EngineConfig::default();
        cfg.polling.stale_after_secs = 90;
        cfg.polling.refetch_after_secs = 60;
        let err = cfg.validate().expect_err("stale > refetch");
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::Invalid {
                field: "polling.stale_after_secs",
                ..
            })
        ));

        cfg.polling.stale_after_secs = 60;
        assert!(cfg.validate().is_ok());
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn unknown_policy_is_a_parse_error() {
        let root = tempfile::tempdir().expect("temp dir");
        write_project_config(root.path(), "[time]\npolicy = \"mountain\"\n");
        assert!(load_project_config(root.path()).is_err());
    }

    #[test]
    fn env_override_wins_over_file() {
        let policy = resolve_time_policy(TimePolicy::Fixed, Some("US_PACIFIC")).expect("resolve");
        assert_eq!(policy, TimePolicy::UsPacific);
        let policy = resolve_time_policy(TimePolicy::UsPacific, Some(" fixed ")).expect("resolve");
        assert_eq!(policy, TimePolicy::Fixed);
    }

    #[test]
    fn blank_env_keeps_configured_policy() {
        assert_eq!(
            resolve_time_policy(TimePolicy::Fixed, None).expect("resolve"),
            TimePolicy::Fixed
        );
        assert_eq!(
            resolve_time_policy(TimePolicy::Fixed, Some("  ")).expect("resolve"),
            TimePolicy::Fixed
        );
        assert!(resolve_time_policy(TimePolicy::Fixed, Some("eastern")).is_err());
    }

    #[test]
    fn out_of_range_fixed_offset_is_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.time.policy = TimePolicy::Fixed;
        cfg.time.fixed_offset_hours = 20;
        assert!(cfg.operating_zone().is_err());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn config_round_trips_through_toml() {
        let cfg = EngineConfig::default();
        let text = toml::to_string(&cfg).expect("serialize");
        let back: EngineConfig = toml::from_str(&text).expect("parse");
        assert_eq!(back, cfg);
    }
}
