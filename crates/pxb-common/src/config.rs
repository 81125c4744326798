use crate::error::{HarnessError, HarnessResult};
use crate::models::EntityKind;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;


/// Largest accepted poll backoff multiplier
pub const MAX_BACKOFF_FACTOR: f64 = 10.0;

/// Harness configuration, built once per suite run
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HarnessConfig {
    /// Control plane configuration
    #[serde(default)]
    pub control_plane: ControlPlaneConfig,

    /// Task runner configuration
    #[serde(default)]
    pub runner: RunnerConfig,

    /// Polling profiles
    #[serde(default)]
    pub poll: PollProfiles,

    /// Cleanup configuration
    #[serde(default)]
    pub cleanup: CleanupConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Control plane configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlPlaneConfig {
    /// Organization every request is scoped to
    #[serde(default = "default_org_id")]
    pub org_id: String,

    /// Name of the admin user
    #[serde(default = "default_admin_user")]
    pub admin_user: String,
}

/// How a batch of tasks is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// One task at a time, in input order
    Sequential,

    /// Up to `max_concurrency` tasks in flight
    #[default]
    Parallel,
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sequential" => Ok(ExecutionMode::Sequential),
            "parallel" => Ok(ExecutionMode::Parallel),
            _ => Err(format!(
                "Invalid execution mode: {}. Expected 'sequential' or 'parallel'",
                s
            )),
        }
    }
}

/// Task runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Maximum simultaneously in-flight tasks
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Per-task timeout
    #[serde(default, with = "duration_opt", skip_serializing_if = "Option::is_none")]
    pub task_timeout: Option<Duration>,

    /// Execution mode
    #[serde(default)]
    pub mode: ExecutionMode,
}

/// Timeout and interval for one polling call site
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PollConfig {
    /// Give up after this long
    #[serde(with = "duration_str")]
    pub timeout: Duration,

    /// Delay between probes
    #[serde(with = "duration_str")]
    pub interval: Duration,

    /// Interval multiplier applied after every probe
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    /// Upper bound for the grown interval
    #[serde(default, with = "duration_opt", skip_serializing_if = "Option::is_none")]
    pub max_interval: Option<Duration>,
}

impl PollConfig {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self {
            timeout,
            interval,
            backoff_factor: default_backoff_factor(),
            max_interval: None,
        }
    }

    pub fn with_backoff(mut self, factor: f64, max_interval: Option<Duration>) -> Self {
        self.backoff_factor = factor;
        self.max_interval = max_interval;
        self
    }

    /// Interval to use after the given one.
    ///
    /// Growth that overflows `Duration` saturates at `max_interval`, or at
    /// `timeout` when no cap is set.
    pub fn next_interval(&self, current: Duration) -> Duration {
        let cap = self.max_interval.unwrap_or(self.timeout);
        match Duration::try_from_secs_f64(current.as_secs_f64() * self.backoff_factor) {
            Ok(grown) => match self.max_interval {
                Some(max) if grown > max => max,
                _ => grown,
            },
            Err(_) => cap,
        }
    }

    pub fn validate(&self, name: &str) -> HarnessResult<()> {
        if self.interval.is_zero() {
            return Err(HarnessError::InvalidConfiguration(format!(
                "poll profile '{}' has a zero interval",
                name
            )));
        }
        if self.interval > self.timeout {
            return Err(HarnessError::InvalidConfiguration(format!(
                "poll profile '{}' interval {:?} exceeds timeout {:?}",
                name, self.interval, self.timeout
            )));
        }
        if !(1.0..=MAX_BACKOFF_FACTOR).contains(&self.backoff_factor) {
            return Err(HarnessError::InvalidConfiguration(format!(
                "poll profile '{}' backoff factor {} must be between 1.0 and {}",
                name, self.backoff_factor, MAX_BACKOFF_FACTOR
            )));
        }
        Ok(())
    }
}

/// Named polling profiles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollProfiles {
    #[serde(default = "default_poll")]
    pub default: PollConfig,

    #[serde(default = "default_backup_completion")]
    pub backup_completion: PollConfig,

    #[serde(default = "default_restore_completion")]
    pub restore_completion: PollConfig,

    #[serde(default = "default_backup_delete")]
    pub backup_delete: PollConfig,

    #[serde(default = "default_backup_location_delete")]
    pub backup_location_delete: PollConfig,

    #[serde(default = "default_cloud_credential_delete")]
    pub cloud_credential_delete: PollConfig,

    #[serde(default = "default_cluster_delete")]
    pub cluster_delete: PollConfig,
}

impl PollProfiles {
    /// Profile used to wait for an entity of `kind` to disappear
    pub fn deletion(&self, kind: EntityKind) -> PollConfig {
        match kind {
            EntityKind::Backup => self.backup_delete,
            EntityKind::BackupLocation => self.backup_location_delete,
            EntityKind::CloudCredential => self.cloud_credential_delete,
            EntityKind::Cluster => self.cluster_delete,
            EntityKind::SchedulePolicy
            | EntityKind::Rule
            | EntityKind::Schedule
            | EntityKind::Restore => self.default,
        }
    }

    fn named(&self) -> [(&'static str, &PollConfig); 7] {
        [
            ("default", &self.default),
            ("backup_completion", &self.backup_completion),
            ("restore_completion", &self.restore_completion),
            ("backup_delete", &self.backup_delete),
            ("backup_location_delete", &self.backup_location_delete),
            ("cloud_credential_delete", &self.cloud_credential_delete),
            ("cluster_delete", &self.cluster_delete),
        ]
    }
}

/// Cleanup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Poll until each deleted entity is gone before moving on
    #[serde(default = "default_wait_for_deletion")]
    pub wait_for_deletion: bool,

    /// Concurrent deletes within one entity kind
    #[serde(default = "default_delete_concurrency")]
    pub delete_concurrency: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level used when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

// Default value functions
fn default_org_id() -> String {
    "default".to_string()
}

fn default_admin_user() -> String {
    "admin".to_string()
}

fn default_max_concurrency() -> usize {
    10
}

fn default_backoff_factor() -> f64 {
    1.0
}

fn minutes(m: u64) -> Duration {
    Duration::from_secs(m * 60)
}

fn default_poll() -> PollConfig {
    PollConfig::new(minutes(5), Duration::from_secs(10))
}

fn default_backup_completion() -> PollConfig {
    PollConfig::new(minutes(40), Duration::from_secs(30))
}

fn default_restore_completion() -> PollConfig {
    PollConfig::new(minutes(40), Duration::from_secs(30))
}

fn default_backup_delete() -> PollConfig {
    PollConfig::new(minutes(20), Duration::from_secs(30))
}

fn default_backup_location_delete() -> PollConfig {
    PollConfig::new(minutes(30), Duration::from_secs(30))
}

fn default_cloud_credential_delete() -> PollConfig {
    PollConfig::new(minutes(30), Duration::from_secs(30))
}

fn default_cluster_delete() -> PollConfig {
    PollConfig::new(minutes(10), Duration::from_secs(10))
}

fn default_wait_for_deletion() -> bool {
    true
}

fn default_delete_concurrency() -> usize {
    4
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            org_id: default_org_id(),
            admin_user: default_admin_user(),
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            task_timeout: None,
            mode: ExecutionMode::default(),
        }
    }
}

impl Default for PollProfiles {
    fn default() -> Self {
        Self {
            default: default_poll(),
            backup_completion: default_backup_completion(),
            restore_completion: default_restore_completion(),
            backup_delete: default_backup_delete(),
            backup_location_delete: default_backup_location_delete(),
            cloud_credential_delete: default_cloud_credential_delete(),
            cluster_delete: default_cluster_delete(),
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            wait_for_deletion: default_wait_for_deletion(),
            delete_concurrency: default_delete_concurrency(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl HarnessConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> HarnessResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: HarnessConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> HarnessResult<Self> {
        let mut config = HarnessConfig::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Override fields from environment variables
    pub fn apply_env(&mut self) {
        if let Ok(org) = std::env::var("PXB_ORG_ID") {
            self.control_plane.org_id = org;
        }

        if let Ok(max) = std::env::var("PXB_MAX_CONCURRENCY") {
            if let Ok(max) = max.parse::<usize>() {
                self.runner.max_concurrency = max;
            }
        }

        if let Ok(timeout) = std::env::var("PXB_TASK_TIMEOUT") {
            if let Ok(timeout) = humantime::parse_duration(&timeout) {
                self.runner.task_timeout = Some(timeout);
            }
        }

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(json) = std::env::var("PXB_LOG_JSON") {
            self.logging.json = matches!(json.to_lowercase().as_str(), "1" | "true" | "yes");
        }
    }

    /// Reject settings the harness cannot run with
    pub fn validate(&self) -> HarnessResult<()> {
        if self.runner.max_concurrency == 0 {
            return Err(HarnessError::InvalidConfiguration(
                "runner.max_concurrency must be positive".to_string(),
            ));
        }
        if self.cleanup.delete_concurrency == 0 {
            return Err(HarnessError::InvalidConfiguration(
                "cleanup.delete_concurrency must be positive".to_string(),
            ));
        }
        if self.control_plane.org_id.is_empty() {
            return Err(HarnessError::InvalidConfiguration(
                "control_plane.org_id must not be empty".to_string(),
            ));
        }
        for (name, profile) in self.poll.named() {
            profile.validate(name)?;
        }
        Ok(())
    }
}

/// Humantime (de)serialization for `Duration`
mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

mod duration_opt {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&humantime::format_duration(*d).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        raw.map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
