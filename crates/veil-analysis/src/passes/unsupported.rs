//! Constructs we recognise but can't analyse yet
//!
//! Runs on the bare tree before anything is built, so that an enum or a
//! loop fails with a capability error instead of a construction error.

use veil_ast::{Ast, Field, NodeIdx, NodeType};

use crate::context::CompilationContext;
use crate::error::AnalysisError;
use crate::traverse::Pass;

pub struct UnsupportedConstructs;

impl Pass for UnsupportedConstructs {
    fn name(&self) -> &'static str {
        "unsupported-constructs"
    }

    fn run(&self, ctx: &mut CompilationContext) -> Result<(), AnalysisError> {
        for node in ctx.ast().iter() {
            let message = match node.node_type {
                NodeType::StructuredDocumentation => "Solidity type StructuredDocumentation",
                NodeType::InlineAssembly => {
                    "Solidity type InlineAssembly. We plan to handle non-secret assembly in the future."
                }
                NodeType::EnumDefinition => {
                    "Solidity type EnumDefinition. We plan to handle enums in the near future."
                }
                NodeType::WhileStatement | NodeType::DoWhileStatement => {
                    "While statements are unsupported in zero-knowledge proof circuits because they cannot handle dynamic loops."
                }
                NodeType::FunctionCall
                    if ctx.path(node.idx).is_internal_function_call()
                        && passes_secret_state(ctx.ast(), node.idx) =>
                {
                    "Internal function calls involving any states. This doesn't work because we assume all Identifiers refer to a VariableDeclaration, when they can refer to a FunctionDefinition."
                }
                _ => continue,
            };
            return Err(AnalysisError::todo(message, node));
        }
        Ok(())
    }
}

/// Whether any argument of a call mentions a secret state variable
fn passes_secret_state(ast: &Ast, call: NodeIdx) -> bool {
    ast.list(call, Field::Arguments)
        .into_iter()
        .flat_map(|arg| ast.subtree(arg))
        .filter_map(|idx| ast.node(idx).referenced_declaration)
        .filter_map(|decl| ast.by_decl_id(decl))
        .map(|decl| ast.node(decl))
        .any(|decl| {
            decl.node_type == NodeType::VariableDeclaration && decl.state_variable && decl.decorations.is_secret
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::analysed;
    use veil_ast::{AstBuilder, Decorate};

    fn todo_message(err: AnalysisError) -> String {
        match err {
            AnalysisError::Todo { message, .. } => message,
            other => panic!("expected a TODO error, got {:?}", other),
        }
    }

    #[test]
    fn enums_and_loops_are_capability_gaps() {
        let mut b = AstBuilder::new();
        let status = b.enum_def("Status");
        let c = b.contract("C", vec![status]);
        let err = analysed(b.source_unit(vec![c])).unwrap_err();
        assert!(todo_message(err).contains("EnumDefinition"));

        let mut b = AstBuilder::new();
        let flag = b.state_var("flag", "bool");
        let cond = b.ident(&flag);
        let body = b.while_stmt(cond, vec![]);
        let f = b.function("spin", vec![], vec![body]);
        let c = b.contract("C", vec![flag.node.clone(), f]);
        let err = analysed(b.source_unit(vec![c])).unwrap_err();
        assert!(todo_message(err).starts_with("While statements are unsupported"));
    }

    #[test]
    fn internal_calls_only_fail_with_secret_arguments() {
        let mut b = AstBuilder::new();
        let hidden = b.state_var("hidden", "uint256").secret();
        let visible = b.state_var("visible", "uint256");
        let (helper_id, helper) = b.function_with_id("helper", vec![], vec![]);
        let arg = b.ident(&visible);
        let call = b.internal_call("helper", helper_id, vec![arg]);
        let stmt = b.expr_stmt(call);
        let f = b.function("run", vec![], vec![stmt]);
        let c = b.contract("C", vec![hidden.node.clone(), visible.node.clone(), helper, f]);
        assert!(analysed(b.source_unit(vec![c])).is_ok());

        let mut b = AstBuilder::new();
        let hidden = b.state_var("hidden", "uint256").secret();
        let (helper_id, helper) = b.function_with_id("helper", vec![], vec![]);
        let arg = b.ident(&hidden);
        let call = b.internal_call("helper", helper_id, vec![arg]);
        let stmt = b.expr_stmt(call);
        let f = b.function("run", vec![], vec![stmt]);
        let c = b.contract("C", vec![hidden.node.clone(), helper, f]);
        let err = analysed(b.source_unit(vec![c])).unwrap_err();
        assert!(todo_message(err).starts_with("Internal function calls"));
    }
}
