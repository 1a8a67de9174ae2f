use contrail_ir::expr::{Expr, Literal, OpKind, Span};
use contrail_ir::prop::Proposition;
use contrail_ir::types::Value;
use contrail_spec::monitor::{Monitor, PrefixMonitor, Verdict};
use contrail_spec::spec::{FragmentTable, SpecNode};
use contrail_spec::window::WindowSet;
use contrail_spec::{lazy_definition, StreamSource};
use serde_json::json;

fn fragment(value: serde_json::Value) -> Expr {
    serde_json::from_value(value).unwrap()
}

fn table() -> Vec<Expr> {
    vec![
        fragment(json!(["lt", ["stream", "speed"], 30])),
        fragment(json!(["gt", ["stream", "dist"], 5])),
    ]
}

#[test]
fn test_build_from_skeleton() {
    let prop: Proposition = serde_json::from_value(json!({
        "type": "always",
        "req": {
            "type": "implies",
            "lhs": { "type": "atomic", "syntax_id": 1, "source": "dist > 5" },
            "rhs": { "type": "atomic", "syntax_id": 0, "source": "speed < 30" }
        }
    }))
    .unwrap();

    let node = SpecNode::from_proposition(&prop, &table()).unwrap();
    assert_eq!(node.to_string(), "always ((dist > 5) implies (speed < 30))");
    assert_eq!(node.atomics().len(), 2);
}

#[test]
fn test_canonical_rendering() {
    let a = SpecNode::atomic(table()[0].clone(), Some("a"));
    let b = SpecNode::atomic(table()[1].clone(), Some("b"));
    let anon = SpecNode::atomic(table()[1].clone(), None);

    let node = SpecNode::Or(vec![
        SpecNode::And(vec![a.clone(), b.clone()]),
        SpecNode::Until(Box::new(a.clone()), Box::new(b.clone())),
        SpecNode::Next(Box::new(SpecNode::Not(Box::new(anon)))),
        SpecNode::Eventually(Box::new(a)),
    ]);
    assert_eq!(
        node.to_string(),
        "((a) and (b)) or ((a) until (b)) or (next (not (Atomic))) or (eventually (a))"
    );
}

#[test]
fn test_equality_is_symmetric_and_position_insensitive() {
    let relocated: Vec<Expr> = table()
        .into_iter()
        .map(|e| e.with_span(Span::new(12, 1, 12, 30)))
        .collect();
    let prop = Proposition::and(vec![
        Proposition::atomic(0, None),
        Proposition::eventually(Proposition::atomic(1, None)),
    ]);

    let original = SpecNode::from_proposition(&prop, &table()).unwrap();
    let moved = SpecNode::from_proposition(&prop, &relocated).unwrap();
    assert_eq!(original, original);
    assert_eq!(original, moved);
    assert_eq!(moved, original);

    let swapped = Proposition::and(vec![
        Proposition::eventually(Proposition::atomic(1, None)),
        Proposition::atomic(0, None),
    ]);
    assert_ne!(original, SpecNode::from_proposition(&swapped, &table()).unwrap());
}

#[test]
fn test_trees_do_not_share_fragments() {
    let fragments = table();
    let prop = Proposition::atomic(0, None);
    let first = SpecNode::from_proposition(&prop, &fragments).unwrap();
    drop(fragments);
    let retargeted = first.apply_atomic_transformer(&mut |e: &Expr| {
        Expr::op(OpKind::Not, vec![e.clone()])
    });
    assert_ne!(first, retargeted);
    assert_eq!(retargeted.to_string(), first.to_string());
}

/// Move every stream read in `expr` `by` steps later.
fn shift_streams(expr: &Expr, by: i64) -> Expr {
    match expr {
        Expr::Literal { .. } => expr.clone(),
        Expr::Stream { name, offset, span } => Expr::Stream {
            name: name.clone(),
            offset: offset + by,
            span: *span,
        },
        Expr::Field { base, field, span } => Expr::Field {
            base: Box::new(shift_streams(base, by)),
            field: field.clone(),
            span: *span,
        },
        Expr::Op { op, args, span } => Expr::Op {
            op: *op,
            args: args.iter().map(|arg| shift_streams(arg, by)).collect(),
            span: *span,
        },
    }
}

fn stream_offsets(expr: &Expr, out: &mut Vec<i64>) {
    match expr {
        Expr::Literal { .. } => {}
        Expr::Stream { offset, .. } => out.push(*offset),
        Expr::Field { base, .. } => stream_offsets(base, out),
        Expr::Op { args, .. } => args.iter().for_each(|arg| stream_offsets(arg, out)),
    }
}

#[test]
fn test_atomic_transformer_rewrites_only_fragments() {
    let prop = Proposition::always(Proposition::implies(
        Proposition::atomic(1, Some("dist > 5")),
        Proposition::and(vec![
            Proposition::atomic(0, Some("speed < 30")),
            Proposition::next(Proposition::atomic(1, None)),
        ]),
    ));
    let node = SpecNode::from_proposition(&prop, &table()).unwrap();
    assert_eq!(node.max_lookahead(), 0);

    let shifted = node.apply_atomic_transformer(&mut |e: &Expr| shift_streams(e, 2));

    assert_eq!(shifted.to_string(), node.to_string());
    assert_eq!(
        shifted.to_string(),
        "always ((dist > 5) implies ((speed < 30) and (next (Atomic))))"
    );
    match (&node, &shifted) {
        (SpecNode::Always(before), SpecNode::Always(after)) => {
            assert!(matches!(**before, SpecNode::Implies(..)));
            assert!(matches!(**after, SpecNode::Implies(..)));
        }
        other => panic!("expected always at the root, got {other:?}"),
    }

    let before: Vec<&Expr> = node.atomics();
    let after: Vec<&Expr> = shifted.atomics();
    assert_eq!(before.len(), after.len());
    for (old, new) in before.iter().zip(&after) {
        let (mut old_offsets, mut new_offsets) = (Vec::new(), Vec::new());
        stream_offsets(old, &mut old_offsets);
        stream_offsets(new, &mut new_offsets);
        assert_eq!(old_offsets, vec![0]);
        assert_eq!(new_offsets, vec![2]);
    }

    assert_ne!(shifted, node);
    assert_eq!(shifted.max_lookahead(), 2);
    assert_eq!(node.apply_atomic_transformer(&mut |e: &Expr| e.clone()), node);
}

#[test]
fn test_intern_then_build() {
    let mut fragments = FragmentTable::new();
    let speed = fragments.intern(table()[0].clone());
    let dist = fragments.intern(table()[1].clone());
    let again = fragments.intern(table()[0].clone().with_span(Span::new(1, 1, 1, 9)));
    assert_eq!((speed, dist, again), (0, 1, 0));

    let prop = Proposition::until(Proposition::atomic(speed, None), Proposition::atomic(dist, None));
    let node = SpecNode::from_proposition(&prop, fragments.as_slice()).unwrap();
    assert_eq!(node.max_lookahead(), 0);
}

#[test]
fn test_monitor_over_lazy_definition() {
    let mut windows = WindowSet::new();
    let mut speeds = vec![12.0, 18.0, 31.0].into_iter();
    windows
        .bind_eager(
            "raw",
            Box::new(move || Ok(Value::Float(speeds.next().unwrap_or(0.0)))),
        )
        .unwrap();
    windows
        .bind_lazy(
            "speed",
            lazy_definition(
                "speed",
                Expr::op(
                    OpKind::Add,
                    vec![Expr::stream("raw"), Expr::literal(Literal::Float(0.0))],
                ),
            ),
        )
        .unwrap();

    let node = SpecNode::Always(Box::new(SpecNode::atomic(table()[0].clone(), None)));
    let mut monitor = PrefixMonitor::new(&node);

    let mut verdicts = Vec::new();
    for t in 0..3 {
        windows.refresh().unwrap();
        verdicts.push(monitor.update(t, &windows).unwrap());
    }
    assert_eq!(
        verdicts,
        vec![Verdict::PresumablyTrue, Verdict::PresumablyTrue, Verdict::False]
    );
    assert_eq!(windows.sample("speed", 2).unwrap(), Value::Float(31.0));
}
