use contrail_ir::parse::parse_contract;
use contrail_ir::prop::Proposition;
use contrail_ir::types::ValueType;

#[test]
fn test_parse_contract_from_file() {
    let json_str = include_str!("fixtures/cruise_contract.json");
    let decl = parse_contract(json_str).unwrap();
    assert_eq!(decl.name, "KeepsDistance");
    assert_eq!(decl.objects, vec!["ego".to_string()]);
    assert_eq!(decl.globals, vec!["objects".to_string()]);
    assert_eq!(decl.outputs.get("throttle"), Some(&ValueType::Float));
    assert_eq!(decl.fragments.len(), 3);
    assert_eq!(decl.assumptions.len(), 1);
    assert_eq!(decl.guarantees.len(), 2);
    assert_eq!(decl.max_lookahead, None);
}

#[test]
fn test_definitions_keep_declaration_order() {
    let decl = parse_contract(include_str!("fixtures/cruise_contract.json")).unwrap();
    let names: Vec<&str> = decl.definitions.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["speed", "next_speed"]);
}

#[test]
fn test_proposition_skeleton_shape() {
    let decl = parse_contract(include_str!("fixtures/cruise_contract.json")).unwrap();
    match &decl.guarantees[1] {
        Proposition::Always { req } => {
            assert!(matches!(**req, Proposition::Implies { .. }));
        }
        other => panic!("expected always, got {other:?}"),
    }
    assert_eq!(decl.guarantees[1].syntax_ids(), vec![0, 2]);
}

#[test]
fn test_parse_invalid_json() {
    let result = parse_contract("not json at all");
    assert!(result.is_err());
}

#[test]
fn test_placeholder_port_type_rejected() {
    let json = r#"{
        "name": "Bad",
        "objects": ["ego"],
        "inputs": { "x": "_" }
    }"#;
    let result = parse_contract(json);
    assert!(result.is_err());
}

#[test]
fn test_minimal_contract_defaults() {
    let json = r#"{ "name": "Empty", "objects": ["ego"] }"#;
    let decl = parse_contract(json).unwrap();
    assert!(decl.globals.is_empty());
    assert!(decl.definitions.is_empty());
    assert!(decl.assumptions.is_empty());
    assert!(decl.guarantees.is_empty());
}
