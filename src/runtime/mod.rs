pub mod calculator;
pub mod evaluator;
pub mod exec_time;
pub mod graph;
pub mod log;

pub use calculator::{Calculation, Calculator};
pub use evaluator::Evaluator;
pub use exec_time::{ExecTimeConfig, SharedExecTimes, TimingMap};
pub use graph::{ExpressionGraph, NodeIndex, OperationNode};
pub use log::ExpressionLog;
