use crate::error::CalcError;
use crate::runtime::exec_time::{ExecTimeConfig, TimingMap};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Process configuration for both roles. Loaded from YAML, then overridden
/// from the environment, then validated.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub coordinator: CoordinatorConfig,
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Lease duration `L`.
    pub lease_ms: u64,
    pub reclaim_interval_ms: u64,
    /// Default operator timings, keyed by operator symbol.
    pub timings: TimingMap,
    pub redis_url: Option<String>,
    pub redis_key: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            lease_ms: 5_000,
            reclaim_interval_ms: 5_000,
            timings: ExecTimeConfig::default().to_millis_map(),
            redis_url: None,
            redis_key: "distcalc:tasks".to_string(),
        }
    }
}

impl CoordinatorConfig {
    pub fn lease(&self) -> Duration {
        Duration::from_millis(self.lease_ms)
    }

    pub fn reclaim_interval(&self) -> Duration {
        Duration::from_millis(self.reclaim_interval_ms)
    }

    pub fn exec_times(&self) -> Result<ExecTimeConfig, CalcError> {
        let mut config = ExecTimeConfig::default();
        config.apply_millis(&self.timings)?;
        Ok(config)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub name: String,
    /// Evaluator pool size `W`.
    pub pool_size: usize,
    /// Heartbeat interval `H`.
    pub heartbeat_interval_ms: u64,
    pub poll_interval_ms: u64,
    pub report_attempts: u32,
    pub report_backoff_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: format!("calc-{}", Uuid::new_v4()),
            pool_size: 4,
            heartbeat_interval_ms: 2_000,
            poll_interval_ms: 2_000,
            report_attempts: 10,
            report_backoff_ms: 2_000,
        }
    }
}

impl WorkerConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn report_backoff(&self) -> Duration {
        Duration::from_millis(self.report_backoff_ms)
    }
}

impl Settings {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, CalcError> {
        let mut settings = Self::default();
        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    /// Applies the environment variables understood by the calculation
    /// servers. Durations in `SEND_ALIVE_DURATION` and
    /// `CHECK_SERVER_DURATION` are whole seconds.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), CalcError> {
        if let Some(workers) = parse_var::<usize>(&lookup, "NUMBER_OF_CALCULATORS")? {
            self.worker.pool_size = workers;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "SEND_ALIVE_DURATION")? {
            self.worker.heartbeat_interval_ms = secs_to_millis("SEND_ALIVE_DURATION", secs)?;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "CHECK_SERVER_DURATION")? {
            let millis = secs_to_millis("CHECK_SERVER_DURATION", secs)?;
            self.coordinator.lease_ms = millis;
            self.coordinator.reclaim_interval_ms = millis;
        }
        if let Some(name) = lookup("CALCULATION_SERVER_NAME").filter(|n| !n.trim().is_empty()) {
            self.worker.name = name;
        }
        for (var, symbol) in [
            ("TIME_ADD_MS", "+"),
            ("TIME_SUBTRACT_MS", "-"),
            ("TIME_MULTIPLY_MS", "*"),
            ("TIME_DIVIDE_MS", "/"),
        ] {
            if let Some(millis) = parse_var::<i64>(&lookup, var)? {
                self.coordinator.timings.insert(symbol.to_string(), millis);
            }
        }
        if let Some(url) = lookup("REDIS_URL").filter(|u| !u.trim().is_empty()) {
            self.coordinator.redis_url = Some(url);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), CalcError> {
        let worker = &self.worker;
        let coordinator = &self.coordinator;

        if worker.pool_size < 1 {
            return Err(CalcError::Config(format!(
                "number of calculators must be at least 1, got {}",
                worker.pool_size
            )));
        }
        if worker.heartbeat_interval_ms == 0 {
            return Err(CalcError::Config("heartbeat interval must be positive".into()));
        }
        if worker.heartbeat_interval_ms >= coordinator.lease_ms {
            return Err(CalcError::Config(format!(
                "heartbeat interval ({} ms) must be shorter than the lease ({} ms)",
                worker.heartbeat_interval_ms, coordinator.lease_ms
            )));
        }
        if coordinator.reclaim_interval_ms == 0 {
            return Err(CalcError::Config("reclaim interval must be positive".into()));
        }
        if worker.poll_interval_ms == 0 {
            return Err(CalcError::Config("poll interval must be positive".into()));
        }
        if worker.report_attempts == 0 {
            return Err(CalcError::Config("report attempts must be at least 1".into()));
        }
        coordinator.exec_times()?;
        Ok(())
    }
}

fn secs_to_millis(key: &str, secs: u64) -> Result<u64, CalcError> {
    secs.checked_mul(1_000)
        .ok_or_else(|| CalcError::Config(format!("{} is too large: {} seconds", key, secs)))
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, CalcError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| CalcError::Config(format!("{} has an invalid value '{}'", key, raw))),
    }
}
