use contrail_ir::expr::{Expr, Literal, OpKind, Span};

#[test]
fn test_parse_literals() {
    let expr: Expr = serde_json::from_value(serde_json::json!(true)).unwrap();
    assert!(matches!(expr, Expr::Literal { value: Literal::Bool(true), .. }));

    let expr: Expr = serde_json::from_value(serde_json::json!(30)).unwrap();
    assert!(matches!(expr, Expr::Literal { value: Literal::Int(30), .. }));

    let expr: Expr = serde_json::from_value(serde_json::json!(0.5)).unwrap();
    assert!(matches!(expr, Expr::Literal { value: Literal::Float(f), .. } if f == 0.5));
}

#[test]
fn test_parse_stream_with_offset() {
    let expr: Expr = serde_json::from_value(serde_json::json!(["stream", "speed", 2])).unwrap();
    match expr {
        Expr::Stream { name, offset, .. } => {
            assert_eq!(name, "speed");
            assert_eq!(offset, 2);
        }
        other => panic!("expected stream, got {other:?}"),
    }
}

#[test]
fn test_parse_comparison() {
    let json = serde_json::json!(["lt", ["field", ["stream", "ego"], "speed"], 30]);
    let expr: Expr = serde_json::from_value(json).unwrap();
    assert!(matches!(expr, Expr::Op { op: OpKind::Lt, ref args, .. } if args.len() == 2));
}

#[test]
fn test_parse_unknown_operator_fails() {
    let result: Result<Expr, _> = serde_json::from_value(serde_json::json!(["xor", true, false]));
    assert!(result.is_err());
}

#[test]
fn test_span_wrapper_attaches_position() {
    let json = serde_json::json!({
        "expr": ["stream", "speed"],
        "span": { "line": 3, "col": 7 }
    });
    let expr: Expr = serde_json::from_value(json).unwrap();
    assert_eq!(expr.span(), Span::new(3, 7, 0, 0));
}

#[test]
fn test_equivalence_ignores_spans() {
    let a = Expr::op(
        OpKind::Lt,
        vec![Expr::stream("speed"), Expr::literal(Literal::Int(30))],
    )
    .with_span(Span::new(1, 0, 1, 10));
    let b = Expr::op(
        OpKind::Lt,
        vec![
            Expr::stream("speed").with_span(Span::new(9, 4, 9, 9)),
            Expr::literal(Literal::Int(30)),
        ],
    );
    assert!(a.equivalent(&b));
    assert!(b.equivalent(&a));
    assert_ne!(a, b);
}

#[test]
fn test_equivalence_detects_structure() {
    let a = Expr::op(OpKind::And, vec![Expr::stream("x"), Expr::stream("y")]);
    let b = Expr::op(OpKind::And, vec![Expr::stream("x")]);
    let c = Expr::op(OpKind::Or, vec![Expr::stream("x"), Expr::stream("y")]);
    assert!(!a.equivalent(&b));
    assert!(!b.equivalent(&a));
    assert!(!a.equivalent(&c));
    assert!(!Expr::stream_at("x", 1).equivalent(&Expr::stream("x")));
}

#[test]
fn test_max_offset_and_streams() {
    let expr = Expr::op(
        OpKind::Sub,
        vec![Expr::stream_at("speed", 3), Expr::stream_at("dist", -1)],
    );
    assert_eq!(expr.max_offset(), 3);
    let names: Vec<String> = expr.streams().into_iter().collect();
    assert_eq!(names, vec!["dist".to_string(), "speed".to_string()]);
}
