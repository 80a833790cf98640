use crate::compiler::rpn::convert_to_rpn;
use crate::compiler::token::RpnToken;
use crate::error::CalcError;
use crate::runtime::graph::{ExpressionGraph, NodeIndex, OperationNode};

/// Lowers RPN into the indexed operation arena the evaluator walks.
pub struct Compiler {
    index_stack: Vec<NodeIndex>,
}

impl Compiler {
    pub fn new() -> Self {
        Self {
            index_stack: Vec::new(),
        }
    }

    /// Full pipeline: infix text to graph.
    pub fn compile(&mut self, text: &str) -> Result<ExpressionGraph, CalcError> {
        let rpn = convert_to_rpn(text)?;
        let nodes = self.build_nodes(&rpn)?;
        Ok(ExpressionGraph {
            source: text.to_string(),
            rpn,
            nodes,
        })
    }

    pub fn build_nodes(&mut self, rpn: &[RpnToken]) -> Result<Vec<OperationNode>, CalcError> {
        self.index_stack.clear();
        let mut nodes = Vec::with_capacity(rpn.len());

        for (position, token) in rpn.iter().enumerate() {
            let node = match *token {
                RpnToken::Number(value) => OperationNode::Literal(value),
                RpnToken::Operator(operator) => {
                    let (Some(right), Some(left)) = (self.index_stack.pop(), self.index_stack.pop()) else {
                        return Err(CalcError::Arity { position });
                    };
                    OperationNode::Operation { left, right, operator }
                }
            };
            self.index_stack.push(nodes.len());
            nodes.push(node);
        }

        match self.index_stack.len() {
            1 => Ok(nodes),
            dangling => Err(CalcError::MalformedRpn { dangling }),
        }
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}
