//! End-to-end scenarios over small contracts with one secret `balance`
//!
//! Each test builds a parser-shaped tree, runs the full pipeline and checks
//! the classification and requirement flags later stages rely on.

mod common;

use serde_json::Value;
use veil::analysis::{AnalysisError, WarningKind};
use veil::ast::{AstBuilder, Decl, Decorate};

use common::*;

/// `deposit` adds to the balance, `withdraw` takes from it
fn deposit_and_withdraw(mark_deposit: fn(Value) -> Value) -> Value {
    let mut b = AstBuilder::new();
    let balance = b.state_var("balance", "uint256").secret();

    let amount = b.param("amount", "uint256").secret();
    let lhs = b.ident(&balance);
    let lhs = mark_deposit(lhs);
    let rhs = b.ident(&amount);
    let add = b.assign_stmt(lhs, "+=", rhs);
    let deposit = b.function("deposit", vec![amount], vec![add]);

    let amount = b.param("amount", "uint256").secret();
    let lhs = b.ident(&balance);
    let rhs = b.ident(&amount);
    let sub = b.assign_stmt(lhs, "-=", rhs);
    let withdraw = b.function("withdraw", vec![amount], vec![sub]);

    let c = b.contract("Wallet", vec![balance.node.clone(), deposit, withdraw]);
    b.source_unit(vec![c])
}

/// A token registry whose `deposit` claims token `id` for the caller.
/// Claims are reinitialisable, so a token can be burned and claimed again.
fn token_registry(b: &mut AstBuilder) -> (Decl, Value) {
    let owners = b.mapping_var("tokenOwners", "uint256", "address").secret();
    let id = b.param("id", "uint256");
    let base = b.ident(&owners);
    let key = b.ident(&id);
    let lhs = b.index(base, key).reinitialisable();
    let rhs = b.msg_sender();
    let claim = b.assign_stmt(lhs, "=", rhs);
    let deposit = b.function("deposit", vec![id], vec![claim]);
    (owners, deposit)
}

/// `require(tokenOwners[id] == msg.sender);`
fn only_token_owner(b: &mut AstBuilder, owners: &Decl, id: &Decl) -> Value {
    let base = b.ident(owners);
    let key = b.ident(id);
    let current = b.index(base, key);
    let sender = b.msg_sender();
    let check = b.binary(current, "==", sender);
    b.require(check)
}

/// `tokenOwners[key] = value;`
fn set_token_owner(b: &mut AstBuilder, owners: &Decl, key: &Decl, value: Value) -> Value {
    let base = b.ident(owners);
    let key = b.ident(key);
    let lhs = b.index(base, key);
    b.assign_stmt(lhs, "=", value)
}

#[test]
fn known_self_increment_is_whole() {
    let mut b = AstBuilder::new();
    let balance = b.state_var("balance", "uint256").secret();
    let amount = b.param("amount", "uint256").secret();
    let lhs = b.ident(&balance).known();
    let own = b.ident(&balance);
    let rhs = b.ident(&amount);
    let sum = b.binary(own, "+", rhs);
    let stmt = b.assign_stmt(lhs, "=", sum);
    let add = b.function("add", vec![amount], vec![stmt]);
    let c = b.contract("Wallet", vec![balance.node.clone(), add]);

    let analysis = analyse_ok(b.source_unit(vec![c]));
    let summary = analysis.summary();
    let add = summary.contract("Wallet").unwrap().function("add").unwrap();
    assert!(add.requirements.nullifiers_required);
    assert!(add.requirements.new_commitments_required);

    let state = summary.secret_state("balance").unwrap();
    assert!(state.is_whole);
    assert!(!state.is_partitioned);
    assert!(state.whole_reasons.iter().any(|r| r == "Overwritten"));
}

#[test]
fn unknown_increment_is_partitioned() {
    let mut b = AstBuilder::new();
    let balance = b.state_var("balance", "uint256").secret();
    let amount = b.param("amount", "uint256").secret();
    let lhs = b.ident(&balance).unknown();
    let rhs = b.ident(&amount);
    let stmt = b.assign_stmt(lhs, "+=", rhs);
    let deposit = b.function("deposit", vec![amount], vec![stmt]);
    let c = b.contract("Wallet", vec![balance.node.clone(), deposit]);

    let analysis = analyse_ok(b.source_unit(vec![c]));
    let summary = analysis.summary();
    let deposit = summary.contract("Wallet").unwrap().function("deposit").unwrap();
    assert!(!deposit.requirements.nullifiers_required);
    assert!(deposit.requirements.new_commitments_required);

    let state = summary.secret_state("balance").unwrap();
    assert!(state.is_partitioned);
    assert!(!state.is_whole);
}

#[test]
fn unknown_decrement_needs_nullifiers() {
    let analysis = analyse_ok(deposit_and_withdraw(|lhs| lhs.unknown()));
    let summary = analysis.summary();
    let wallet = summary.contract("Wallet").unwrap();
    assert!(!wallet.function("deposit").unwrap().requirements.nullifiers_required);

    let withdraw = wallet.function("withdraw").unwrap();
    assert!(withdraw.requirements.nullifiers_required);
    let state = withdraw.state("balance").unwrap();
    assert!(state.is_partitioned);
    assert!(state.is_nullified);
    assert_eq!(state.decrements, 1);
}

#[test]
fn known_decrement_needs_nullifiers() {
    let mut b = AstBuilder::new();
    let balance = b.state_var("balance", "uint256").secret();
    let amount = b.param("amount", "uint256").secret();
    let lhs = b.ident(&balance).known();
    let rhs = b.ident(&amount);
    let stmt = b.assign_stmt(lhs, "-=", rhs);
    let withdraw = b.function("withdraw", vec![amount], vec![stmt]);
    let c = b.contract("Wallet", vec![balance.node.clone(), withdraw]);

    let analysis = analyse_ok(b.source_unit(vec![c]));
    let summary = analysis.summary();
    let withdraw = summary.contract("Wallet").unwrap().function("withdraw").unwrap();
    assert!(withdraw.requirements.nullifiers_required);
    assert!(summary.secret_state("balance").unwrap().is_whole);
}

#[test]
fn known_and_unknown_on_one_state_is_rejected() {
    let mut b = AstBuilder::new();
    let balance = b.state_var("balance", "uint256").secret();

    let amount = b.param("amount", "uint256").secret();
    let lhs = b.ident(&balance).known();
    let rhs = b.ident(&amount);
    let stmt = b.assign_stmt(lhs, "+=", rhs);
    let top_up = b.function("topUp", vec![amount], vec![stmt]);

    let amount = b.param("amount", "uint256").secret();
    let lhs = b.ident(&balance).unknown();
    let rhs = b.ident(&amount);
    let stmt = b.assign_stmt(lhs, "+=", rhs);
    let deposit = b.function("deposit", vec![amount], vec![stmt]);

    let c = b.contract("Wallet", vec![balance.node.clone(), top_up, deposit]);
    let err = analyse_err(b.source_unit(vec![c]));
    assert!(matches!(err, AnalysisError::SyntaxUsage { .. }));
    assert!(err.to_string().contains("marked as both unknown and known"));
    assert!(err.is_user_error());
}

#[test]
fn msg_sender_keyed_mapping_is_owned_by_its_key() {
    let analysis = analyse_ok(common::bank());
    let summary = analysis.summary();
    let balances = summary.secret_state("balances").unwrap();
    assert!(balances.is_owned);
    assert_eq!(balances.owner.as_deref(), Some("msg.sender"));
    assert!(!balances.on_chain_key_registry);
    assert_eq!(balances.mapping_keys, vec!["balances[msg.sender]".to_string()]);

    let withdraw = summary.contract("Bank").unwrap().function("withdraw").unwrap();
    assert!(!withdraw.requirements.encryption_required);
    assert!(!withdraw.requirements.on_chain_key_registry);
}

#[test]
fn never_nullified_whole_state_is_rejected() {
    let mut b = AstBuilder::new();
    let balance = b.state_var("balance", "uint256").secret();
    let snapshot = b.state_var("snapshot", "uint256").secret();
    let lhs = b.ident(&snapshot);
    let rhs = b.ident(&balance);
    let stmt = b.assign_stmt(lhs, "=", rhs);
    let save = b.function("save", vec![], vec![stmt]);
    let c = b.contract("Wallet", vec![balance.node.clone(), snapshot.node.clone(), save]);

    let err = analyse_err(b.source_unit(vec![c]));
    assert!(matches!(err, AnalysisError::Zkp { .. }));
    assert!(err.to_string().contains("Consider making balance editable or constant"));
    assert_eq!(err.code(), "E-ZKP-001");
}

#[test]
fn two_restricted_owners_are_rejected() {
    let mut b = AstBuilder::new();
    let admin = b.state_var("admin", "address");
    let auditor = b.state_var("auditor", "address");
    let total = b.state_var("total", "uint256").secret();

    let restricted_set = |b: &mut AstBuilder, name: &str, owner: &veil::ast::Decl| {
        let value = b.param("value", "uint256").secret();
        let sender = b.msg_sender();
        let owner = b.ident(owner);
        let check = b.binary(sender, "==", owner);
        let check = b.require(check);
        let lhs = b.ident(&total);
        let rhs = b.ident(&value);
        let set = b.assign_stmt(lhs, "=", rhs);
        b.function(name, vec![value], vec![check, set])
    };
    let by_admin = restricted_set(&mut b, "setByAdmin", &admin);
    let by_auditor = restricted_set(&mut b, "setByAuditor", &auditor);
    let c = b.contract(
        "Ledger",
        vec![admin.node.clone(), auditor.node.clone(), total.node.clone(), by_admin, by_auditor],
    );

    let err = analyse_err(b.source_unit(vec![c]));
    assert!(matches!(err, AnalysisError::Zkp { .. }));
    assert!(err.to_string().contains("two distinct owners (admin and auditor)"));
}

#[test]
fn reassigned_keys_name_distinct_slots() {
    let mut b = AstBuilder::new();
    let balances = b.mapping_var("balances", "address", "uint256").secret();
    let who = b.param("who", "address");
    let next = b.param("next", "address");
    let amount = b.param("amount", "uint256").secret();

    let base = b.ident(&balances);
    let key = b.ident(&who);
    let lhs = b.index(base, key);
    let rhs = b.ident(&amount);
    let first = b.assign_stmt(lhs, "=", rhs);

    let lhs = b.ident(&who);
    let rhs = b.ident(&next);
    let rekey = b.assign_stmt(lhs, "=", rhs);

    let base = b.ident(&balances);
    let key = b.ident(&who);
    let lhs = b.index(base, key);
    let rhs = b.ident(&amount);
    let second = b.assign_stmt(lhs, "=", rhs);

    let f = b.function("move", vec![who, next, amount], vec![first, rekey, second]);
    let c = b.contract("Bank", vec![balances.node.clone(), f]);

    let analysis = analyse_ok(b.source_unit(vec![c]));
    let summary = analysis.summary();
    let state = summary
        .contract("Bank")
        .unwrap()
        .function("move")
        .unwrap()
        .state("balances")
        .unwrap();
    assert_eq!(state.mapping_keys, vec!["balances[who]", "balances[who_1]"]);
}

#[test]
fn repeated_runs_agree() {
    let first = serde_json::to_value(analyse_ok(common::bank()).summary()).unwrap();
    let second = serde_json::to_value(analyse_ok(common::bank()).summary()).unwrap();
    assert_eq!(first, second);

    let first = analyse_ok(deposit_and_withdraw(|lhs| lhs.unknown())).annotated_json();
    let second = analyse_ok(deposit_and_withdraw(|lhs| lhs.unknown())).annotated_json();
    assert_eq!(first, second);
}

#[test]
fn no_state_is_both_whole_and_partitioned() {
    let sources = [
        common::bank(),
        deposit_and_withdraw(|lhs| lhs.unknown()),
        load_fixture("escrow.json"),
    ];
    for source in sources {
        let analysis = analyse_ok(source);
        let ctx = analysis.context();
        for binding in ctx.bindings().iter().filter(|b| b.is_secret()) {
            assert!(!(binding.usage.is_whole && binding.usage.is_partitioned), "{}", binding.name);
        }
        for indicator in ctx.state_indicators() {
            assert!(!(indicator.usage.is_whole && indicator.usage.is_partitioned), "{}", indicator.name);
        }
    }
}

#[test]
fn unowned_whole_state_warns() {
    let mut b = AstBuilder::new();
    let balance = b.state_var("balance", "uint256").secret();
    let value = b.param("value", "uint256").secret();
    let lhs = b.ident(&balance);
    let rhs = b.ident(&value);
    let stmt = b.assign_stmt(lhs, "=", rhs);
    let set = b.function("set", vec![value], vec![stmt]);
    let c = b.contract("Wallet", vec![balance.node.clone(), set]);

    let analysis = analyse_ok(b.source_unit(vec![c]));
    assert_warned(&analysis, WarningKind::UnownedState);
}

#[test]
fn read_only_keys_do_not_need_nullifiers() {
    let mut b = AstBuilder::new();
    let slots = b.mapping_var("slots", "uint256", "uint256").secret();
    let copy = b.state_var("copy", "uint256").secret();

    let base = b.ident(&slots);
    let key = b.literal("0");
    let lhs = b.index(base, key);
    let five = b.literal("5");
    let write = b.assign_stmt(lhs, "=", five);
    let set = b.function("set", vec![], vec![write]);

    let lhs = b.ident(&copy);
    let base = b.ident(&slots);
    let key = b.literal("1");
    let rhs = b.index(base, key);
    let read = b.assign_stmt(lhs, "=", rhs);
    let snap = b.function("snap", vec![], vec![read]);

    let c = b.contract("Slots", vec![slots.node.clone(), copy.node.clone(), set, snap]);
    let analysis = analyse_ok(b.source_unit(vec![c]));
    let summary = analysis.summary();
    assert!(summary.secret_state("slots").unwrap().is_whole);

    let snap = summary.contract("Slots").unwrap().function("snap").unwrap();
    let read = snap.state("slots").unwrap();
    assert!(read.is_accessed);
    assert!(!read.is_nullified);
}

#[test]
fn zeroing_a_reinitialisable_owner_burns_the_token() {
    let mut b = AstBuilder::new();
    let (owners, deposit) = token_registry(&mut b);
    let id = b.param("id", "uint256");
    let check = only_token_owner(&mut b, &owners, &id);
    let zero = b.literal("0");
    let zero = b.address_of(zero);
    let burn = set_token_owner(&mut b, &owners, &id, zero);
    let withdraw = b.function("withdraw", vec![id], vec![check, burn]);
    let c = b.contract("Escrow", vec![owners.node.clone(), deposit, withdraw]);

    let analysis = analyse_ok(b.source_unit(vec![c]));
    let summary = analysis.summary();
    let tokens = summary.secret_state("tokenOwners").unwrap();
    assert!(tokens.is_burned);
    assert!(tokens.reinitialisable);
    assert_eq!(tokens.owner.as_deref(), Some("msg.sender"));

    let withdraw = summary.contract("Escrow").unwrap().function("withdraw").unwrap();
    assert!(withdraw.state("tokenOwners").unwrap().is_burned);
    assert!(withdraw.requirements.nullifiers_required);
    assert!(!withdraw.requirements.new_commitments_required);
    assert!(analysis.warnings().iter().all(|w| w.kind != WarningKind::BurnAndEdit));

    let annotated = analysis.annotated_json();
    let statements = &annotated["nodes"][0]["nodes"][2]["body"]["statements"];
    assert_eq!(statements[1]["isBurnStatement"], true);
    assert!(statements[0].get("isBurnStatement").is_none());
}

#[test]
fn zeroing_a_plain_owner_warns() {
    let mut b = AstBuilder::new();
    let admin = b.state_var("admin", "address");
    let total = b.state_var("total", "uint256").secret();

    let value = b.param("value", "uint256").secret();
    let sender = b.msg_sender();
    let owner = b.ident(&admin);
    let check = b.binary(sender, "==", owner);
    let check = b.require(check);
    let lhs = b.ident(&total);
    let rhs = b.ident(&value);
    let set = b.assign_stmt(lhs, "=", rhs);
    let set = b.function("set", vec![value], vec![check, set]);

    let lhs = b.ident(&admin);
    let zero = b.literal("0");
    let zero = b.address_of(zero);
    let renounce = b.assign_stmt(lhs, "=", zero);
    let renounce = b.function("renounce", vec![], vec![renounce]);

    let c = b.contract("Vault", vec![admin.node.clone(), total.node.clone(), set, renounce]);
    let analysis = analyse_ok(b.source_unit(vec![c]));
    assert_warned(&analysis, WarningKind::OwnerSetToZero);

    let summary = analysis.summary();
    let total = summary.secret_state("total").unwrap();
    assert_eq!(total.owner.as_deref(), Some("admin"));
    assert!(!total.is_burned);
}

#[test]
fn reinitialisable_state_without_a_burn_is_rejected() {
    let mut b = AstBuilder::new();
    let (owners, deposit) = token_registry(&mut b);
    let id = b.param("id", "uint256");
    let recipient = b.param("recipient", "address").secret();
    let check = only_token_owner(&mut b, &owners, &id);
    let to = b.ident(&recipient);
    let hand_over = set_token_owner(&mut b, &owners, &id, to);
    let transfer = b.function("transfer", vec![id, recipient], vec![check, hand_over]);
    let c = b.contract("Escrow", vec![owners.node.clone(), deposit, transfer]);

    let err = analyse_err(b.source_unit(vec![c]));
    assert!(matches!(err, AnalysisError::SyntaxUsage { .. }));
    assert!(err
        .to_string()
        .contains("marked as reinitialisable but we can't find anywhere to burn"));
}

#[test]
fn burning_and_editing_in_one_function_warns() {
    let mut b = AstBuilder::new();
    let (owners, deposit) = token_registry(&mut b);
    let id = b.param("id", "uint256");
    let next = b.param("next", "uint256");
    let check = only_token_owner(&mut b, &owners, &id);
    let zero = b.literal("0");
    let zero = b.address_of(zero);
    let burn = set_token_owner(&mut b, &owners, &id, zero);
    let sender = b.msg_sender();
    let reissue = set_token_owner(&mut b, &owners, &next, sender);
    let swap = b.function("swap", vec![id, next], vec![check, burn, reissue]);
    let c = b.contract("Escrow", vec![owners.node.clone(), deposit, swap]);

    let analysis = analyse_ok(b.source_unit(vec![c]));
    assert_warned(&analysis, WarningKind::BurnAndEdit);

    let summary = analysis.summary();
    let swap = summary.contract("Escrow").unwrap().function("swap").unwrap();
    let tokens = swap.state("tokenOwners").unwrap();
    assert!(tokens.is_burned);
    assert!(tokens.new_commitments_required);
    assert!(swap.requirements.new_commitments_required);
}
