use crate::compiler::token::Operator;
use crate::error::CalcError;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Operator symbol to simulated duration in milliseconds, the shape timings
/// travel in between coordinator and workers.
pub type TimingMap = BTreeMap<String, i64>;

/// Simulated execution time per operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecTimeConfig {
    add: Duration,
    subtract: Duration,
    multiply: Duration,
    divide: Duration,
}

impl ExecTimeConfig {
    pub fn from_millis(add: u64, subtract: u64, multiply: u64, divide: u64) -> Self {
        Self {
            add: Duration::from_millis(add),
            subtract: Duration::from_millis(subtract),
            multiply: Duration::from_millis(multiply),
            divide: Duration::from_millis(divide),
        }
    }

    /// Same duration for every operator.
    pub fn uniform(duration: Duration) -> Self {
        Self {
            add: duration,
            subtract: duration,
            multiply: duration,
            divide: duration,
        }
    }

    pub fn duration_for(&self, op: Operator) -> Duration {
        match op {
            Operator::Add => self.add,
            Operator::Subtract => self.subtract,
            Operator::Multiply => self.multiply,
            Operator::Divide => self.divide,
        }
    }

    pub fn set(&mut self, op: Operator, duration: Duration) {
        let slot = match op {
            Operator::Add => &mut self.add,
            Operator::Subtract => &mut self.subtract,
            Operator::Multiply => &mut self.multiply,
            Operator::Divide => &mut self.divide,
        };
        *slot = duration;
    }

    pub fn to_millis_map(&self) -> TimingMap {
        Operator::ALL
            .iter()
            .map(|op| (op.to_string(), self.duration_for(*op).as_millis() as i64))
            .collect()
    }

    /// Applies a partial update. The whole map is checked first, so a
    /// rejected update leaves every timing unchanged.
    pub fn apply_millis(&mut self, timings: &TimingMap) -> Result<(), CalcError> {
        let mut parsed = Vec::with_capacity(timings.len());
        for (key, millis) in timings {
            let op = parse_operator_key(key)?;
            if *millis < 0 {
                return Err(CalcError::Config(format!(
                    "timing for '{}' must not be negative, got {}",
                    key, millis
                )));
            }
            parsed.push((op, Duration::from_millis(*millis as u64)));
        }
        for (op, duration) in parsed {
            self.set(op, duration);
        }
        Ok(())
    }
}

fn parse_operator_key(key: &str) -> Result<Operator, CalcError> {
    let mut chars = key.trim().chars();
    match (chars.next().and_then(Operator::from_symbol), chars.next()) {
        (Some(op), None) => Ok(op),
        _ => Err(CalcError::Config(format!("unknown operator '{}'", key))),
    }
}

/// Process-wide timing cell. Evaluations take a snapshot per dispatched
/// operation, so updates never affect operations already sleeping.
#[derive(Debug, Clone, Default)]
pub struct SharedExecTimes {
    inner: Arc<RwLock<ExecTimeConfig>>,
}

impl SharedExecTimes {
    pub fn new(config: ExecTimeConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    pub async fn snapshot(&self) -> ExecTimeConfig {
        *self.inner.read().await
    }

    pub async fn replace(&self, config: ExecTimeConfig) {
        *self.inner.write().await = config;
    }

    pub async fn apply(&self, timings: &TimingMap) -> Result<(), CalcError> {
        self.inner.write().await.apply_millis(timings)
    }
}
