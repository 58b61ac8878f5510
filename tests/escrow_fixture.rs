//! Raw parser output, wrapped in `{ "ast": ... }`, straight through the
//! pipeline

mod common;

use veil::ast::{Ast, NodeType};

use common::*;

#[test]
fn fixture_ingests() {
    let ast = Ast::from_json(load_fixture("escrow.json")).unwrap();
    assert_eq!(ast.node_type(ast.root()), NodeType::SourceUnit);
    assert_eq!(ast.exported_symbols()["Escrow"], vec![39]);
    let deposits = ast.by_decl_id(7).unwrap();
    assert!(ast.node(deposits).decorations.is_secret);
    assert_eq!(ast.node(deposits).pointer, "/ast/nodes/1/nodes/1");
}

#[test]
fn escrow_deposits_are_partitioned_and_caller_owned() {
    let analysis = analyse_ok(load_fixture("escrow.json"));
    let summary = analysis.summary();

    let deposits = summary.secret_state("deposits").unwrap();
    assert_eq!(deposits.contract, "Escrow");
    assert!(deposits.is_partitioned);
    assert_eq!(deposits.owner.as_deref(), Some("msg.sender"));

    let escrow = summary.contract("Escrow").unwrap();
    let deposit = escrow.function("deposit").unwrap();
    assert!(!deposit.requirements.nullifiers_required);
    assert_eq!(deposit.state("deposits").unwrap().increments, 1);

    let withdraw = escrow.function("withdraw").unwrap();
    assert!(withdraw.requirements.nullifiers_required);
    assert!(withdraw.requirements.new_commitments_required);
    assert!(!withdraw.msg_sender_param);
}

#[test]
fn annotations_are_written_under_the_wrapper() {
    let source = load_fixture("escrow.json");
    let annotated = analyse_ok(source.clone()).annotated_json();

    let deposit_stmt = &annotated["ast"]["nodes"][1]["nodes"][2]["body"]["statements"][0];
    assert_eq!(deposit_stmt["isIncremented"], true);
    assert_eq!(deposit_stmt["expression"]["leftHandSide"]["isUnknown"], true);

    let withdraw_stmt = &annotated["ast"]["nodes"][1]["nodes"][3]["body"]["statements"][0];
    assert_eq!(withdraw_stmt["isDecremented"], true);

    // the input is left alone
    assert!(source["ast"]["nodes"][1]["nodes"][3]["body"]["statements"][0]
        .get("isDecremented")
        .is_none());
}
