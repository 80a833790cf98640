use crate::compiler::token::{Operator, RpnToken};

pub type NodeIndex = usize;

/// One slot of the operation arena. Operands always point at lower indices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OperationNode {
    Literal(f64),
    Operation {
        left: NodeIndex,
        right: NodeIndex,
        operator: Operator,
    },
}

impl OperationNode {
    pub fn is_operation(&self) -> bool {
        matches!(self, OperationNode::Operation { .. })
    }

    /// The resolved value, or `None` while the node is still an operation.
    pub fn value(&self) -> Option<f64> {
        match self {
            OperationNode::Literal(value) => Some(*value),
            OperationNode::Operation { .. } => None,
        }
    }
}

/// Compiled form of one expression.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionGraph {
    pub source: String,
    pub rpn: Vec<RpnToken>,
    pub nodes: Vec<OperationNode>,
}

impl ExpressionGraph {
    pub fn operation_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_operation()).count()
    }

    pub fn root(&self) -> Option<NodeIndex> {
        self.nodes.len().checked_sub(1)
    }
}
