use distcalc::compiler::{convert_to_rpn, format_rpn, Compiler, Operator, RpnToken};
use distcalc::error::CalcError;
use distcalc::runtime::OperationNode;

fn rpn_strings(text: &str) -> Vec<String> {
    convert_to_rpn(text)
        .unwrap()
        .iter()
        .map(ToString::to_string)
        .collect()
}

#[test]
fn test_convert_to_rpn() {
    assert_eq!(rpn_strings("3+4"), vec!["3", "4", "+"]);
    assert_eq!(
        rpn_strings("3 + 4 * 2 / (1 - 5)"),
        vec!["3", "4", "2", "*", "1", "5", "-", "/", "+"]
    );
    assert_eq!(rpn_strings("1 - -1"), vec!["1", "-1", "-"]);
}

#[test]
fn test_decimal_literals_and_signs() {
    assert_eq!(format_rpn(&convert_to_rpn("1.5 * -0.5").unwrap()), "1.5 -0.5 *");
    assert_eq!(format_rpn(&convert_to_rpn("2 * (-1)").unwrap()), "2 -1 *");
    assert_eq!(format_rpn(&convert_to_rpn("-(2 + 3) * 4").unwrap()), "2 3 + -1 * 4 *");
}

#[test]
fn test_parse_errors_report_position() {
    // 1. Empty group
    assert!(matches!(convert_to_rpn("1 + ()"), Err(CalcError::Parse { position: 5, .. })));

    // 2. Consecutive numbers
    assert!(matches!(convert_to_rpn("2 2 - 2"), Err(CalcError::Parse { position: 2, .. })));

    // 3. Unknown symbol
    let err = convert_to_rpn("1 + x").unwrap_err();
    assert_eq!(err, CalcError::Parse { position: 4, message: "unexpected symbol 'x'".into() });
    assert_eq!(err.to_string(), "unexpected symbol 'x', pos: 4");

    // 4. Operator where a number is expected
    assert!(matches!(convert_to_rpn("1 + * 2"), Err(CalcError::Parse { position: 4, .. })));

    // 5. Unbalanced parentheses
    assert!(matches!(convert_to_rpn("1 + 2)"), Err(CalcError::Parse { position: 5, .. })));
    assert!(matches!(convert_to_rpn("(1 + 2"), Err(CalcError::Parse { position: 0, .. })));

    // 6. Bad literal
    assert!(matches!(convert_to_rpn("1.2.3"), Err(CalcError::Parse { position: 0, .. })));
}

#[test]
fn test_graph_builder() {
    let graph = Compiler::new().compile("1 - 2").unwrap();
    assert_eq!(
        graph.nodes,
        vec![
            OperationNode::Literal(1.0),
            OperationNode::Literal(2.0),
            OperationNode::Operation { left: 0, right: 1, operator: Operator::Subtract },
        ]
    );
    assert_eq!(graph.operation_count(), 1);
    assert_eq!(graph.root(), Some(2));
}

#[test]
fn test_operands_always_point_backwards() {
    let graph = Compiler::new().compile("(1 + 2) * (3 - 4) / -(5 + 6 * 7)").unwrap();
    for (i, node) in graph.nodes.iter().enumerate() {
        if let OperationNode::Operation { left, right, .. } = node {
            assert!(*left < i && *right < i, "node {} references a later node", i);
        }
    }
}

#[test]
fn test_arity_and_malformed_rpn() {
    // Trailing operator survives the compiler and fails in the graph builder.
    assert!(matches!(Compiler::new().compile("1 +"), Err(CalcError::Arity { position: 1 })));

    assert!(matches!(Compiler::new().compile(""), Err(CalcError::MalformedRpn { dangling: 0 })));

    let dangling = [RpnToken::Number(1.0), RpnToken::Number(2.0)];
    assert!(matches!(
        Compiler::new().build_nodes(&dangling),
        Err(CalcError::MalformedRpn { dangling: 2 })
    ));

    let lonely = [RpnToken::Number(1.0), RpnToken::Operator(Operator::Multiply)];
    assert!(matches!(Compiler::new().build_nodes(&lonely), Err(CalcError::Arity { position: 1 })));
}
