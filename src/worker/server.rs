use crate::config::WorkerConfig;
use crate::coordinator::TaskSource;
use crate::error::{CalcError, StoreError};
use crate::runtime::calculator::Calculator;
use crate::runtime::exec_time::SharedExecTimes;
use crate::runtime::log::ExpressionLog;
use crate::storage::record::{TaskId, TaskOutcome, TaskRecord, TaskStatus};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Result of one pass of the poll loop.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// No pending work.
    Idle,
    /// Another worker won the claim.
    Lost(TaskId),
    /// The task was evaluated and its result accepted.
    Completed(TaskId, TaskStatus),
    /// The task was evaluated but the result could not be delivered.
    Abandoned(TaskId),
}

/// One worker process: polls the coordinator, claims a task, evaluates it
/// while heartbeating and reports the outcome.
pub struct CalculationServer {
    source: Arc<dyn TaskSource>,
    calculator: Calculator,
    config: WorkerConfig,
}

impl CalculationServer {
    /// Fails on a pool size or report attempt count of zero.
    pub fn new(source: Arc<dyn TaskSource>, config: WorkerConfig, exec_times: SharedExecTimes) -> Result<Self, CalcError> {
        if config.pool_size < 1 {
            return Err(CalcError::Config(format!(
                "number of calculators must be at least 1, got {}",
                config.pool_size
            )));
        }
        if config.report_attempts == 0 {
            return Err(CalcError::Config("report attempts must be at least 1".into()));
        }
        Ok(Self {
            calculator: Calculator::new(config.pool_size, exec_times),
            source,
            config,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn calculator(&self) -> &Calculator {
        &self.calculator
    }

    /// Polls forever.
    pub async fn run(&self) {
        info!(worker = %self.config.name, pool_size = self.config.pool_size, "Calculation server started");

        loop {
            match self.poll_once().await {
                Ok(PollOutcome::Completed(..)) | Ok(PollOutcome::Abandoned(_)) => continue,
                Ok(PollOutcome::Idle) | Ok(PollOutcome::Lost(_)) => {}
                Err(e) => warn!(worker = %self.config.name, error = %e, "Poll failed"),
            }
            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }

    pub async fn poll_once(&self) -> Result<PollOutcome, StoreError> {
        let pending = self.source.list_pending().await?;
        let Some(task) = pending.into_iter().next() else {
            return Ok(PollOutcome::Idle);
        };

        if !self.source.claim(task.id, &self.config.name).await? {
            debug!(task_id = %task.id, worker = %self.config.name, "Task taken by another server");
            return Ok(PollOutcome::Lost(task.id));
        }
        info!(task_id = %task.id, worker = %self.config.name, expression = %task.text, "Calculating");

        self.refresh_timings().await;

        let heartbeat = self.spawn_heartbeat(&task);
        let log = ExpressionLog::new();
        let result = self.calculator.calculate_with_log(&task.text, &log).await;
        heartbeat.abort();

        let outcome = match result {
            Ok(answer) => TaskOutcome::Ready {
                answer,
                log: log.text().await,
            },
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Calculation failed");
                log.push(format!("Error: {}", e)).await;
                TaskOutcome::Error { log: log.text().await }
            }
        };
        let status = outcome.status();

        if self.report_with_retry(task.id, outcome).await {
            Ok(PollOutcome::Completed(task.id, status))
        } else {
            Ok(PollOutcome::Abandoned(task.id))
        }
    }

    /// Installs the coordinator's current timings. On failure the previous
    /// timings stay in effect.
    async fn refresh_timings(&self) {
        match self.source.operator_timings().await {
            Ok(timings) => {
                if let Err(e) = self.calculator.exec_times().apply(&timings).await {
                    warn!(error = %e, "Ignoring invalid operator timings");
                }
            }
            Err(e) => warn!(error = %e, "Could not fetch operator timings"),
        }
    }

    fn spawn_heartbeat(&self, task: &TaskRecord) -> JoinHandle<()> {
        let source = self.source.clone();
        let calculator = self.calculator.clone();
        let worker = self.config.name.clone();
        let interval = self.config.heartbeat_interval();
        let id = task.id;
        let text = task.text.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let status = format!(
                    "{} from {} workers are running to calculate {}",
                    calculator.running_workers(),
                    calculator.pool_size(),
                    text
                );
                match source.heartbeat(id, &worker, &status).await {
                    Ok(()) => debug!(task_id = %id, %worker, "Heartbeat sent"),
                    Err(e @ StoreError::Stale { .. }) | Err(e @ StoreError::NotFound(_)) => {
                        warn!(task_id = %id, %worker, error = %e, "Lease lost, stopping heartbeat");
                        break;
                    }
                    Err(e) => warn!(task_id = %id, %worker, error = %e, "Heartbeat failed"),
                }
            }
        })
    }

    async fn report_with_retry(&self, id: TaskId, outcome: TaskOutcome) -> bool {
        let attempts = self.config.report_attempts;
        for attempt in 1..=attempts {
            match self.source.report_result(id, &self.config.name, outcome.clone()).await {
                Ok(()) => {
                    info!(task_id = %id, worker = %self.config.name, status = ?outcome.status(), "Result delivered");
                    return true;
                }
                Err(e) if e.is_transient() && attempt < attempts => {
                    warn!(task_id = %id, attempt, error = %e, "Report failed, retrying");
                    tokio::time::sleep(self.config.report_backoff()).await;
                }
                Err(e) => {
                    error!(task_id = %id, attempt, error = %e, "Giving up on result");
                    return false;
                }
            }
        }
        false
    }
}
