//! Accessed states: secret states whose current value has to be known
//!
//! Reading a secret state (`a = 2 * b`, `if (b > 0)`, `a *= 2`) opens its
//! prior commitment, which is only possible for a whole state. Reads of a
//! partitioned state inside its own incrementation (`a = a + b`) don't
//! count.

use tracing::debug;
use veil_ast::{DeclId, Field, NodeIdx, NodeType};

use crate::context::CompilationContext;
use crate::error::AnalysisError;
use crate::path::LhsTarget;
use crate::traverse::{traverse, Flow, Pass, Visit, Visitor};
use crate::warning::WarningKind;

pub struct AccessedStates;

impl Pass for AccessedStates {
    fn name(&self) -> &'static str {
        "accessed-states"
    }

    fn run(&self, ctx: &mut CompilationContext) -> Result<(), AnalysisError> {
        traverse(ctx, &mut Accesses::default())
    }
}

#[derive(Default)]
struct Accesses {
    /// The partitioned state incremented by the current statement
    incrementing: Option<DeclId>,
}

impl Visitor for Accesses {
    fn enter(&mut self, ctx: &mut CompilationContext, visit: &Visit) -> Result<Flow, AnalysisError> {
        match ctx.ast().node_type(visit.node) {
            NodeType::ExpressionStatement => {
                let facts = ctx.facts(visit.node);
                self.incrementing = facts
                    .incremented_declaration
                    .filter(|_| facts.is_incremented == Some(true))
                    .filter(|decl| {
                        ctx.binding_for_decl(*decl)
                            .map_or(false, |b| ctx.binding(b).usage.is_partitioned)
                    });
            }
            NodeType::Identifier => self.identifier(ctx, visit.node)?,
            _ => {}
        }
        Ok(Flow::Continue)
    }

    fn exit(&mut self, ctx: &mut CompilationContext, visit: &Visit) -> Result<Flow, AnalysisError> {
        if ctx.ast().node_type(visit.node) == NodeType::ExpressionStatement {
            self.incrementing = None;
        }
        Ok(Flow::Continue)
    }
}

impl Accesses {
    fn identifier(&self, ctx: &mut CompilationContext, ident: NodeIdx) -> Result<(), AnalysisError> {
        let path = ctx.path(ident);
        if path.is_pseudo_identifier() {
            return Ok(());
        }
        let Some(binding) = ctx.referenced_binding(ident) else {
            return Ok(());
        };
        let rhs = path.rhs_ancestor().map(|(field, _)| field);
        let lhs = path.corresponding_lhs();
        let lhs_binding = match lhs {
            LhsTarget::Node(target) => ctx.referenced_binding(target),
            _ => None,
        };
        let name = ctx.binding(binding).name.clone();

        if !ctx.binding(binding).is_secret() {
            let feeds_secret = lhs_binding.map_or(false, |b| ctx.binding(b).is_secret());
            let is_param = ctx.binding(binding).is_param;
            if rhs.is_some() && feeds_secret && is_param {
                let target = lhs_binding.map(|b| ctx.binding(b).name.clone()).unwrap_or_default();
                let src = ctx.node(ident).src;
                ctx.warn(
                    WarningKind::NonSecretParameter,
                    format!(
                        "Non-secret parameter '{name}' used when assigning to a secret variable '{target}'. Blockchain observers might be able to infer the value of '{target}' from this. I.e. although you've labelled '{target}' as 'secret', it might not be secret."
                    ),
                    Some(src),
                );
                ctx.warn(
                    WarningKind::NonSecretParameter,
                    format!(
                        "The secret variable '{target}' is assigned a value derived from the non-secret parameter '{name}'. If '{name}' is modified in a concurrently issued transaction that is ordered before this one, it could invalidate the cryptographic proof backing the secret state change. This may result in the transaction failing, leading to wasted gas and proving effort."
                    ),
                    Some(src),
                );
            }
            return Ok(());
        }
        let state_variable = ctx.binding(binding).is_state_variable();

        let in_loop_header = [Field::Condition, Field::InitializationExpression, Field::LoopExpression]
            .into_iter()
            .any(|f| path.is_contained_within(f));
        if in_loop_header {
            debug!(state = %name, "accessed in a condition");
            if state_variable {
                access(ctx, ident)?;
            }
            return Ok(());
        }

        let declaration = path.referenced_declaration();
        if let Some(field) = rhs {
            if self.incrementing.is_some() && self.incrementing == declaration {
                return Ok(());
            }
            let in_call = path.is_in_type(&[NodeType::FunctionCall]);
            match lhs {
                LhsTarget::Unknown => {
                    return Err(AnalysisError::todo(
                        "We couldn't find a node on the LHS of this RHS node. Please create an issue.",
                        ctx.node(ident),
                    ))
                }
                LhsTarget::Node(target) if !in_call => {
                    let target_name = ctx.node(target).name().to_string();
                    let (lhs_secret, lhs_state) = lhs_binding.map_or((false, false), |b| {
                        let b = ctx.binding(b);
                        (b.is_secret(), b.is_state_variable())
                    });
                    if !state_variable {
                        if !lhs_secret && lhs_state {
                            return Err(AnalysisError::syntax_usage(
                                format!(
                                    "A secret parameter ({}) should not be used to assign to a non-secret variable ({}). The secret could be deduced by observing how the non-secret variable changes.",
                                    name, target_name
                                ),
                                ctx.node(ident),
                            ));
                        }
                        if !lhs_state {
                            let src = ctx.node(ident).src;
                            ctx.warn(
                                WarningKind::SecretParameterToLocal,
                                format!("Secret parameter {} is being used to assign a non-global state. Is this intended?", name),
                                Some(src),
                            );
                        }
                        return Ok(());
                    }
                    if !lhs_secret {
                        return Err(AnalysisError::syntax_usage(
                            format!(
                                "Secret state {} should not be used to assign to a non-secret variable ({}). The secret could be deduced by observing how the non-secret variable changes.",
                                name, target_name
                            ),
                            ctx.node(ident),
                        ));
                    }
                }
                _ if field == Field::IndexExpression && !state_variable => return Ok(()),
                _ => {}
            }
            // parameters have no commitment to open
            if !state_variable {
                return Ok(());
            }
            debug!(state = %name, "accessed");
            access(ctx, ident)?;
            ctx.facts_mut(ident).accessed_secret_state = true;
            return Ok(());
        }

        // a += b, a -= b and a *= b need the old value of a whole state
        let Some(left) = path.ancestor_contained_within(Field::LeftHandSide) else {
            return Ok(());
        };
        let operator = left.parent().map(|p| p.node().operator().to_string());
        let compound = matches!(operator.as_deref(), Some("*=" | "+=" | "-="));
        let usage = &ctx.binding(binding).usage;
        if compound && state_variable && !usage.is_partitioned && !usage.is_unknown && (usage.is_whole || usage.is_known) {
            debug!(state = %name, operator = ?operator, "accessed by a compound assignment");
            access(ctx, ident)?;
        }
        Ok(())
    }
}

fn access(ctx: &mut CompilationContext, ident: NodeIdx) -> Result<(), AnalysisError> {
    if let Some(binding) = ctx.referenced_binding(ident) {
        ctx.binding_update_accessed(binding, ident)?;
    }
    if let Some(indicator) = ctx.referenced_indicator(ident) {
        ctx.indicator_update_accessed(indicator, ident)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::analysed;
    use veil_ast::{AstBuilder, Decorate};

    #[test]
    fn reading_a_secret_makes_it_whole() {
        let mut b = AstBuilder::new();
        let a = b.state_var("a", "uint256").secret();
        let hidden = b.state_var("hidden", "uint256").secret();
        let lhs = b.ident(&a);
        let two = b.literal("2");
        let read = b.ident(&hidden);
        let rhs = b.binary(two, "*", read);
        let stmt = b.assign_stmt(lhs, "=", rhs);
        let f = b.function("double", vec![], vec![stmt]);
        // a state that is only ever read could never be nullified
        let value = b.param("value", "uint256").secret();
        let lhs = b.ident(&hidden);
        let rhs = b.ident(&value);
        let set = b.assign_stmt(lhs, "=", rhs);
        let g = b.function("set", vec![value], vec![set]);
        let c = b.contract("C", vec![a.node.clone(), hidden.node.clone(), f, g]);
        let analysis = analysed(b.source_unit(vec![c])).unwrap();
        let ctx = analysis.context();

        let binding = ctx.binding_for_decl(hidden.id).unwrap();
        let usage = &ctx.binding(binding).usage;
        assert!(usage.is_accessed && usage.is_whole);
        assert!(usage.whole_reasons.iter().any(|r| r.text == "Accessed"));
        let read = ctx
            .ast()
            .iter()
            .find(|n| n.node_type == NodeType::Identifier && n.name() == "hidden")
            .map(|n| n.idx)
            .unwrap();
        assert!(ctx.facts(read).accessed_secret_state);
    }

    #[test]
    fn secret_state_cannot_feed_a_public_one() {
        let mut b = AstBuilder::new();
        let total = b.state_var("total", "uint256");
        let hidden = b.state_var("hidden", "uint256").secret();
        let lhs = b.ident(&total);
        let rhs = b.ident(&hidden);
        let stmt = b.assign_stmt(lhs, "=", rhs);
        let f = b.function("leak", vec![], vec![stmt]);
        let c = b.contract("C", vec![total.node.clone(), hidden.node.clone(), f]);
        let err = analysed(b.source_unit(vec![c])).unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Secret state hidden should not be used to assign to a non-secret variable (total)"));
    }

    #[test]
    fn public_parameters_into_secrets_warn_twice() {
        let mut b = AstBuilder::new();
        let balance = b.state_var("balance", "uint256").secret();
        let amount = b.param("amount", "uint256");
        let lhs = b.ident(&balance).unknown();
        let rhs = b.ident(&amount);
        let stmt = b.assign_stmt(lhs, "+=", rhs);
        let f = b.function("deposit", vec![amount], vec![stmt]);
        let c = b.contract("C", vec![balance.node.clone(), f]);
        let analysis = analysed(b.source_unit(vec![c])).unwrap();
        let count = analysis
            .warnings()
            .iter()
            .filter(|w| w.kind == WarningKind::NonSecretParameter)
            .count();
        assert_eq!(count, 2);
    }

    #[test]
    fn partitioned_self_reference_is_not_an_access() {
        // balance = balance + amount, marked unknown
        let mut b = AstBuilder::new();
        let balance = b.state_var("balance", "uint256").secret();
        let amount = b.param("amount", "uint256").secret();
        let lhs = b.ident(&balance).unknown();
        let own = b.ident(&balance);
        let add = b.ident(&amount);
        let sum = b.binary(own, "+", add);
        let stmt = b.assign_stmt(lhs, "=", sum);
        let f = b.function("deposit", vec![amount], vec![stmt]);
        let c = b.contract("C", vec![balance.node.clone(), f]);
        let analysis = analysed(b.source_unit(vec![c])).unwrap();
        let ctx = analysis.context();
        let binding = ctx.binding_for_decl(balance.id).unwrap();
        let usage = &ctx.binding(binding).usage;
        assert!(usage.is_partitioned && !usage.is_accessed);
    }
}
