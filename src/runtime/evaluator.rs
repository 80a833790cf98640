use crate::compiler::token::Operator;
use crate::error::CalcError;
use crate::runtime::exec_time::SharedExecTimes;
use crate::runtime::graph::{ExpressionGraph, NodeIndex, OperationNode};
use crate::runtime::log::ExpressionLog;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::task::{JoinError, JoinSet};
use tracing::debug;

type Settled = (NodeIndex, Result<f64, CalcError>);

/// Resolves an [`ExpressionGraph`] with at most `pool_size` operations
/// running at once.
///
/// Nodes are scanned in index order. An operation whose operands are not
/// resolved yet, or that finds the pool full, waits for the next running
/// operation to finish and re-checks; it is never skipped. Each operation
/// sleeps for the duration its operator has in the timing snapshot taken
/// when it is dispatched.
#[derive(Debug, Clone)]
pub struct Evaluator {
    pool_size: usize,
    exec_times: SharedExecTimes,
    running: Arc<AtomicUsize>,
}

impl Evaluator {
    pub fn new(pool_size: usize, exec_times: SharedExecTimes) -> Self {
        Self {
            pool_size,
            exec_times,
            running: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Operations currently mid-execution across all evaluations run by
    /// this evaluator.
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub fn exec_times(&self) -> &SharedExecTimes {
        &self.exec_times
    }

    /// Returns the value of the highest-indexed node. The first failing
    /// operation aborts the evaluation; operations still running are
    /// detached and their results dropped.
    pub async fn evaluate(&self, graph: &ExpressionGraph, log: &ExpressionLog) -> Result<f64, CalcError> {
        if self.pool_size < 1 {
            return Err(CalcError::Config(format!(
                "worker pool size must be at least 1, got {}",
                self.pool_size
            )));
        }

        let mut nodes = graph.nodes.clone();
        let mut in_flight: JoinSet<Settled> = JoinSet::new();

        for index in 0..nodes.len() {
            let OperationNode::Operation { left, right, operator } = nodes[index] else {
                continue;
            };

            loop {
                if in_flight.len() < self.pool_size {
                    if let (Some(a), Some(b)) = (nodes[left].value(), nodes[right].value()) {
                        self.dispatch(&mut in_flight, log, index, operator, a, b);
                        break;
                    }
                }

                let Some(joined) = in_flight.join_next().await else {
                    in_flight.detach_all();
                    return Err(CalcError::Aborted(format!(
                        "operands of node {} can never be resolved",
                        index
                    )));
                };
                if let Err(e) = settle(&mut nodes, joined) {
                    in_flight.detach_all();
                    return Err(e);
                }
            }
        }

        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = settle(&mut nodes, joined) {
                in_flight.detach_all();
                return Err(e);
            }
        }

        nodes
            .last()
            .and_then(OperationNode::value)
            .ok_or(CalcError::MalformedRpn { dangling: 0 })
    }

    fn dispatch(
        &self,
        in_flight: &mut JoinSet<Settled>,
        log: &ExpressionLog,
        index: NodeIndex,
        operator: Operator,
        a: f64,
        b: f64,
    ) {
        let exec_times = self.exec_times.clone();
        let running = self.running.clone();
        let log = log.clone();

        in_flight.spawn(async move {
            let duration = exec_times.snapshot().await.duration_for(operator);
            running.fetch_add(1, Ordering::SeqCst);
            let work = format!("{} {} {}", a, operator, b);
            log.push(format!("Start worker {}; work: {}", index, work)).await;
            debug!(node = index, %work, ?duration, "Operation started");

            tokio::time::sleep(duration).await;

            let result = if operator == Operator::Divide && b == 0.0 {
                Err(CalcError::DivisionByZero { index })
            } else {
                Ok(operator.apply(a, b))
            };

            match &result {
                Ok(value) => {
                    log.push(format!("End worker {}; work: {}; result: {}", index, work, value))
                        .await
                }
                Err(e) => {
                    log.push(format!("Worker {} failed; work: {}; error: {}", index, work, e))
                        .await
                }
            }
            running.fetch_sub(1, Ordering::SeqCst);
            (index, result)
        });
    }
}

fn settle(nodes: &mut [OperationNode], joined: Result<Settled, JoinError>) -> Result<(), CalcError> {
    let (index, result) = joined.map_err(|e| CalcError::Aborted(e.to_string()))?;
    nodes[index] = OperationNode::Literal(result?);
    Ok(())
}
