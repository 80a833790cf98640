use crate::compiler::{format_rpn, Compiler};
use crate::error::CalcError;
use crate::runtime::evaluator::Evaluator;
use crate::runtime::exec_time::SharedExecTimes;
use crate::runtime::log::ExpressionLog;
use tracing::info;

/// Answer and execution log of one successful evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Calculation {
    pub answer: f64,
    pub log: String,
}

/// Compile-then-evaluate pipeline for a single expression.
#[derive(Debug, Clone)]
pub struct Calculator {
    evaluator: Evaluator,
}

impl Calculator {
    pub fn new(pool_size: usize, exec_times: SharedExecTimes) -> Self {
        Self {
            evaluator: Evaluator::new(pool_size, exec_times),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.evaluator.pool_size()
    }

    pub fn running_workers(&self) -> usize {
        self.evaluator.running()
    }

    pub fn exec_times(&self) -> &SharedExecTimes {
        self.evaluator.exec_times()
    }

    pub async fn calculate_expression(&self, text: &str) -> Result<Calculation, CalcError> {
        let log = ExpressionLog::new();
        let answer = self.calculate_with_log(text, &log).await?;
        Ok(Calculation {
            answer,
            log: log.text().await,
        })
    }

    /// Like [`Calculator::calculate_expression`] but writes into a caller
    /// owned log, which keeps the partial log available on failure.
    pub async fn calculate_with_log(&self, text: &str, log: &ExpressionLog) -> Result<f64, CalcError> {
        log.push("Start conversion to reversed polish notation").await;
        let graph = Compiler::new().compile(text)?;
        log.push(format!("Result: {}", format_rpn(&graph.rpn))).await;

        log.push("Start of calculations").await;
        let answer = self.evaluator.evaluate(&graph, log).await?;
        log.push(format!("All workers are stopped; the final result is {}", answer))
            .await;

        info!(
            expression = text,
            operations = graph.operation_count(),
            answer,
            "Expression calculated"
        );
        Ok(answer)
    }
}
