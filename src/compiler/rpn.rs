use crate::compiler::token::{Operator, RpnToken};
use crate::error::CalcError;

/// Entry of the shunting-yard operator stack.
#[derive(Debug, Clone, Copy)]
enum StackItem {
    Operator(Operator),
    /// `negate` is set when a unary minus preceded the group.
    LeftParen { position: usize, negate: bool },
}

/// Whether `top`, sitting on the operator stack, must be emitted before
/// `incoming` is pushed.
fn evicts(top: Operator, incoming: Operator) -> bool {
    if top.precedence() != incoming.precedence() {
        return top.precedence() > incoming.precedence();
    }
    top.breaks_ties() || incoming.breaks_ties()
}

/// Converts infix text into Reverse Polish Notation.
///
/// A `-` or `+` in operand position is folded into the following literal (or
/// group) instead of becoming a binary operator, so `1 - -1` yields
/// `1 -1 -`. Positions in errors are character offsets into `text`.
pub fn convert_to_rpn(text: &str) -> Result<Vec<RpnToken>, CalcError> {
    let chars: Vec<char> = text.chars().collect();
    let mut output = Vec::new();
    let mut stack: Vec<StackItem> = Vec::new();
    let mut expect_operand = true;
    let mut negative = false;
    let mut pos = 0;

    while pos < chars.len() {
        let c = chars[pos];

        if c.is_whitespace() {
            pos += 1;
            continue;
        }

        if c.is_ascii_digit() || c == '.' {
            if !expect_operand {
                return Err(CalcError::parse(pos, "two numbers in a row"));
            }
            let start = pos;
            while pos < chars.len() && (chars[pos].is_ascii_digit() || chars[pos] == '.') {
                pos += 1;
            }
            let literal: String = chars[start..pos].iter().collect();
            let value: f64 = literal
                .parse()
                .map_err(|_| CalcError::parse(start, format!("invalid number '{}'", literal)))?;
            output.push(RpnToken::Number(if negative { -value } else { value }));
            negative = false;
            expect_operand = false;
            continue;
        }

        match c {
            '(' => {
                if !expect_operand {
                    return Err(CalcError::parse(pos, "unexpected '('"));
                }
                stack.push(StackItem::LeftParen {
                    position: pos,
                    negate: negative,
                });
                negative = false;
            }
            ')' => {
                if expect_operand {
                    return Err(CalcError::parse(pos, "expected a number before ')'"));
                }
                let negate = loop {
                    match stack.pop() {
                        Some(StackItem::Operator(op)) => output.push(RpnToken::Operator(op)),
                        Some(StackItem::LeftParen { negate, .. }) => break negate,
                        None => return Err(CalcError::parse(pos, "unmatched ')'")),
                    }
                };
                if negate {
                    output.push(RpnToken::Number(-1.0));
                    output.push(RpnToken::Operator(Operator::Multiply));
                }
            }
            _ => {
                let Some(op) = Operator::from_symbol(c) else {
                    return Err(CalcError::parse(pos, format!("unexpected symbol '{}'", c)));
                };
                if expect_operand {
                    match op {
                        Operator::Subtract => negative = !negative,
                        Operator::Add => {}
                        _ => return Err(CalcError::parse(pos, format!("unexpected operator '{}'", c))),
                    }
                } else {
                    while let Some(StackItem::Operator(top)) = stack.last().copied() {
                        if !evicts(top, op) {
                            break;
                        }
                        stack.pop();
                        output.push(RpnToken::Operator(top));
                    }
                    stack.push(StackItem::Operator(op));
                    expect_operand = true;
                }
            }
        }
        pos += 1;
    }

    while let Some(item) = stack.pop() {
        match item {
            StackItem::Operator(op) => output.push(RpnToken::Operator(op)),
            StackItem::LeftParen { position, .. } => {
                return Err(CalcError::parse(position, "unmatched '('"));
            }
        }
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::token::format_rpn;

    fn rpn(text: &str) -> String {
        format_rpn(&convert_to_rpn(text).unwrap())
    }

    #[test]
    fn test_tie_breaking() {
        assert_eq!(rpn("1 - 2 + 3"), "1 2 - 3 +");
        assert_eq!(rpn("1 + 2 + 3"), "1 2 3 + +");
        assert_eq!(rpn("8 / 4 * 2"), "8 4 / 2 *");
        assert_eq!(rpn("2 * 3 * 4"), "2 3 4 * *");
    }

    #[test]
    fn test_signs() {
        assert_eq!(rpn("-3"), "-3");
        assert_eq!(rpn("+3 - +2"), "3 2 -");
        assert_eq!(rpn("--2"), "2");
        assert_eq!(rpn("-(1 + 2)"), "1 2 + -1 *");
    }
}
