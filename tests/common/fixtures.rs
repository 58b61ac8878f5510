use std::fs;
use std::path::Path;

use serde_json::Value;
use veil::ast::{AstBuilder, Decorate};

/// Load a JSON fixture from tests/fixtures/
pub fn load_fixture(name: &str) -> Value {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    let text = fs::read_to_string(&path).expect(&format!("Failed to load fixture: {}", name));
    serde_json::from_str(&text).expect(&format!("Fixture is not JSON: {}", name))
}

/// `Bank`: a secret balance per caller, added to blind and taken from
/// with a nullifier
pub fn bank() -> Value {
    let mut b = AstBuilder::new();
    let balances = b.mapping_var("balances", "address", "uint256").secret();

    let amount = b.param("amount", "uint256").secret();
    let base = b.ident(&balances);
    let key = b.msg_sender();
    let lhs = b.index(base, key).unknown();
    let rhs = b.ident(&amount);
    let add = b.assign_stmt(lhs, "+=", rhs);
    let deposit = b.function("deposit", vec![amount], vec![add]);

    let amount = b.param("amount", "uint256").secret();
    let base = b.ident(&balances);
    let key = b.msg_sender();
    let lhs = b.index(base, key);
    let rhs = b.ident(&amount);
    let sub = b.assign_stmt(lhs, "-=", rhs);
    let withdraw = b.function("withdraw", vec![amount], vec![sub]);

    let c = b.contract("Bank", vec![balances.node.clone(), deposit, withdraw]);
    b.source_unit(vec![c])
}
