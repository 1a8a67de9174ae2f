mod common;

use common::*;
use contrail_ir::expr::Expr;
use contrail_ir::types::ValueType;
use contrail_verify::condition::Condition;
use contrail_verify::config::VerifierConfig;
use contrail_verify::contract::{Contract, ContractError, Global};
use contrail_verify::evidence::TestResult;
use contrail_verify::testing::SimulationTesting;
use serde_json::json;

const CRUISE: &str = include_str!("../../contrail-ir/tests/fixtures/cruise_contract.json");

#[test]
fn test_contract_from_json() {
    let contract = Contract::from_json(CRUISE).unwrap();
    assert_eq!(contract.name, "KeepsDistance");
    assert_eq!(contract.object, "ego");
    assert_eq!(contract.globals, vec![Global::Objects]);
    assert_eq!(contract.outputs.get("throttle"), Some(&ValueType::Float));
    assert_eq!(contract.assumptions.len(), 1);
    assert_eq!(contract.guarantees.len(), 2);
    assert_eq!(
        contract.stream_names(),
        vec!["ego", "objects", "throttle", "speed", "next_speed"]
    );
    assert_eq!(contract.max_lookahead(), 1);
    assert_eq!(
        contract.guarantees[1].to_string(),
        "always ((Atomic) implies (abs(next_speed - speed) <= 5))"
    );
}

#[test]
fn test_lookahead_override() {
    let contract = speed_limit_contract();
    assert_eq!(contract.max_lookahead(), 0);
    assert_eq!(contract.with_max_lookahead(3).max_lookahead(), 3);
}

#[test]
fn test_unknown_global_rejected() {
    let mut decl: serde_json::Value = serde_json::from_str(CRUISE).unwrap();
    decl["globals"] = json!(["objects", "lanes"]);
    let err = Contract::from_json(&decl.to_string()).unwrap_err();
    assert!(matches!(err, ContractError::UnknownGlobal { ref name } if name == "lanes"));
}

#[test]
fn test_exactly_one_object_required() {
    let mut decl: serde_json::Value = serde_json::from_str(CRUISE).unwrap();
    decl["objects"] = json!(["ego", "lead"]);
    let err = Contract::from_json(&decl.to_string()).unwrap_err();
    assert!(matches!(err, ContractError::ObjectCount { count: 2, .. }));
}

#[test]
fn test_duplicate_stream_rejected() {
    let contract = speed_limit_contract().with_definition("throttle", Expr::stream("speed"));
    assert!(matches!(
        contract.check_stream_names(),
        Err(ContractError::DuplicateStream { ref name }) if name == "throttle"
    ));
}

#[test]
fn test_bad_fragment_reference() {
    let mut decl: serde_json::Value = serde_json::from_str(CRUISE).unwrap();
    decl["guarantees"][0]["req"]["syntax_id"] = json!(9);
    let err = Contract::from_json(&decl.to_string()).unwrap_err();
    assert!(matches!(err, ContractError::Spec(_)));
}

#[test]
fn test_component_port_types_checked() {
    let contract = speed_limit_contract();
    assert!(contract.check_component(&cruise_control()).is_ok());

    let mut mistyped = speed_limit_contract();
    mistyped.outputs.insert("throttle".to_string(), ValueType::Int);
    assert!(matches!(
        mistyped.check_component(&cruise_control()),
        Err(ContractError::PortType { kind: "output", .. })
    ));
}

#[test]
fn test_json_contract_verifies_with_globals() {
    let contract = Contract::from_json(CRUISE).unwrap();
    let mut testing = SimulationTesting::new(
        contract,
        cruise_control(),
        &[],
        ScriptedSampler::new(vec![trace_scene(&safe_trace(10))]),
        TraceSimulator,
        VerifierConfig::default(),
        vec![Condition::CountTermination(3)],
        Vec::new(),
    )
    .unwrap();
    let result = testing.verify().unwrap();
    assert_eq!(result.evidence.count(TestResult::Valid), 3);
}
