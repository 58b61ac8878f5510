use serde_json::Value;
use veil_analysis::passes::pipeline;
use veil_analysis::{analyse, AnalysisError, AnalysisOptions, CompilationContext, Pass, ScopeKind, WarningKind};
use veil_ast::{Ast, AstBuilder, Decorate};

fn vault() -> Value {
    let mut b = AstBuilder::new();
    let total = b.state_var("total", "uint256").secret();
    let amount = b.param("amount", "uint256");
    let lhs = b.ident(&total).unknown();
    let rhs = b.ident(&amount);
    let stmt = b.assign_stmt(lhs, "+=", rhs);
    let f = b.function("deposit", vec![amount], vec![stmt]);
    let c = b.contract("Vault", vec![total.node.clone(), f]);
    b.source_unit(vec![c])
}

#[test]
fn passes_run_in_order() {
    let names: Vec<_> = pipeline().iter().map(|p| p.name()).collect();
    assert_eq!(
        names,
        vec![
            "unsupported-constructs",
            "decoration-propagation",
            "build",
            "external-calls",
            "decorator-checks",
            "domain-parameters",
            "domain-consistency",
            "mapping-access",
            "interacts-with-secret",
            "incrementations",
            "accessed-states",
            "require-statements",
            "local-declarations",
            "msg-sender-param",
            "ownership",
            "error-checks",
            "encryption-requirements",
        ]
    );
}

#[test]
fn public_parameter_into_a_secret_warns() {
    let ast = Ast::from_json(vault()).unwrap();
    let analysis = analyse(ast, AnalysisOptions::default()).unwrap();
    let count = analysis
        .warnings()
        .iter()
        .filter(|w| w.kind == WarningKind::NonSecretParameter)
        .count();
    assert_eq!(count, 2);
}

#[test]
fn reset_allows_a_second_run() {
    let ast = Ast::from_json(vault()).unwrap();
    let mut ctx = CompilationContext::new(ast, AnalysisOptions::default());
    for pass in pipeline() {
        pass.run(&mut ctx).unwrap();
    }
    let scopes = ctx.scopes().len();
    let bindings = ctx.bindings().len();

    ctx.reset();
    assert!(ctx.scopes().is_empty());
    assert!(ctx.warnings().is_empty());

    for pass in pipeline() {
        pass.run(&mut ctx).unwrap();
    }
    assert_eq!(ctx.scopes().len(), scopes);
    assert_eq!(ctx.bindings().len(), bindings);
    assert_eq!(
        ctx.scopes().iter().map(|s| s.kind).collect::<Vec<_>>(),
        vec![ScopeKind::SourceUnit, ScopeKind::Contract, ScopeKind::Function]
    );
}

#[test]
fn dynamic_loops_stop_the_analysis() {
    let mut b = AstBuilder::new();
    let flag = b.bool_literal(true);
    let body = b.while_stmt(flag, vec![]);
    let f = b.function("spin", vec![], vec![body]);
    let c = b.contract("Loop", vec![f]);
    let ast = Ast::from_json(b.source_unit(vec![c])).unwrap();
    let err = analyse(ast, AnalysisOptions::default()).unwrap_err();
    assert!(matches!(err, AnalysisError::Todo { .. }));
    assert_eq!(err.code(), "E-TODO-001");
}
