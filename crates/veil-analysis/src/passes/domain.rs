//! Domain parameters: `per` function parameters and the mappings they index
//!
//! A secret mapping declared `per (uint256 epoch)` keeps a separate state
//! for every value of `epoch`. Functions touching it must take the same
//! domain parameters, first, publicly, with the same types.

use veil_ast::{Field, NodeIdx, NodeType, PerParameter};

use crate::context::CompilationContext;
use crate::error::AnalysisError;
use crate::passes::{function_parameters, nodes_of_type};
use crate::traverse::Pass;
use crate::warning::WarningKind;

/// Shape checks on `per` function parameters
pub struct DomainParameters;

impl Pass for DomainParameters {
    fn name(&self) -> &'static str {
        "domain-parameters"
    }

    fn run(&self, ctx: &mut CompilationContext) -> Result<(), AnalysisError> {
        for function in nodes_of_type(ctx, NodeType::FunctionDefinition) {
            let mut regular: Option<NodeIdx> = None;
            for param in function_parameters(ctx, function) {
                let node = ctx.node(param);
                if !node.decorations.is_per {
                    regular.get_or_insert(param);
                    continue;
                }
                let name = node.name();
                if node.decorations.is_secret {
                    return Err(AnalysisError::syntax_usage(
                        format!(
                            "Domain parameter '{}' cannot be marked as 'secret'. Domain parameters are part of the public API and must be public.",
                            name
                        ),
                        node,
                    ));
                }
                if let Some(regular) = regular {
                    return Err(AnalysisError::syntax_usage(
                        format!(
                            "Regular parameter '{}' appears before domain parameter. All domain parameters (with 'per' keyword) must appear before regular parameters.",
                            ctx.node(regular).name()
                        ),
                        node,
                    ));
                }
                let type_name = ctx.ast().child(param, Field::TypeName).map(|t| ctx.ast().node_type(t));
                let problem = match type_name {
                    None if node.type_string().is_empty() => Some("has no type. Domain parameters must have a valid Solidity type."),
                    Some(NodeType::ArrayTypeName) => Some("cannot be an array type. Domain parameters must be scalar types (uint256, address, bytes32, etc.)."),
                    Some(NodeType::Mapping) => Some("cannot be a mapping type. Domain parameters must be scalar types."),
                    _ => None,
                };
                if let Some(problem) = problem {
                    return Err(AnalysisError::syntax_usage(
                        format!("Domain parameter '{}' {}", name, problem),
                        node,
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Every declaration of a domain-parameterised mapping agrees with the first
pub struct DomainConsistency;

impl Pass for DomainConsistency {
    fn name(&self) -> &'static str {
        "domain-consistency"
    }

    fn run(&self, ctx: &mut CompilationContext) -> Result<(), AnalysisError> {
        for decl in nodes_of_type(ctx, NodeType::VariableDeclaration) {
            let node = ctx.node(decl);
            if !node.state_variable || !node.decorations.is_secret || node.per_parameters.is_empty() {
                continue;
            }
            let Some(contract) = ctx.path(decl).contract_definition().map(|p| p.idx()) else {
                continue;
            };
            let key = (contract, node.name().to_string());
            let Some(first) = ctx.domain_declarations.get(&key).copied() else {
                ctx.domain_declarations.insert(key, decl);
                continue;
            };
            let (previous, current) = (&ctx.node(first).per_parameters, &node.per_parameters);
            if previous.len() != current.len() {
                return Err(AnalysisError::syntax_usage(
                    format!(
                        "Mapping '{}' declared with {} domain parameter(s), but previously declared with {} domain parameter(s). Domain parameters must be consistent across all declarations.",
                        node.name(),
                        current.len(),
                        previous.len()
                    ),
                    node,
                ));
            }
            for (i, (prev, cur)) in previous.iter().zip(current).enumerate() {
                if prev.ty != cur.ty {
                    return Err(AnalysisError::syntax_usage(
                        format!(
                            "Domain parameter '{}' at position {} has type '{}', but previously declared as '{}'. Domain parameter types must match across all declarations.",
                            cur.name, i, cur.ty, prev.ty
                        ),
                        node,
                    ));
                }
                if prev.name != cur.name {
                    return Err(AnalysisError::syntax_usage(
                        format!(
                            "Domain parameter at position {} is named '{}', but previously named '{}'. Domain parameter names must be consistent across all declarations.",
                            i, cur.name, prev.name
                        ),
                        node,
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Accesses into domain-parameterised mappings happen where the domain is known
pub struct MappingAccessChecks;

impl Pass for MappingAccessChecks {
    fn name(&self) -> &'static str {
        "mapping-access"
    }

    fn run(&self, ctx: &mut CompilationContext) -> Result<(), AnalysisError> {
        for access in nodes_of_type(ctx, NodeType::IndexAccess) {
            check_access(ctx, access)?;
        }
        Ok(())
    }
}

fn check_access(ctx: &mut CompilationContext, access: NodeIdx) -> Result<(), AnalysisError> {
    let Some(base) = ctx.ast().child(access, Field::BaseExpression) else {
        return Ok(());
    };
    if ctx.ast().node_type(base) != NodeType::Identifier {
        return Ok(());
    }
    let Some(binding) = ctx.referenced_binding(base) else {
        return Ok(());
    };
    let binding = ctx.binding(binding);
    if !binding.is_state_variable() || !binding.is_mapping || binding.per_parameters.is_empty() {
        return Ok(());
    }
    let node = ctx.node(access);
    let mapping = binding.name.clone();
    let required: Vec<PerParameter> = binding.per_parameters.clone();

    let Some(function) = ctx.path(access).function_definition().map(|p| p.idx()) else {
        return Err(AnalysisError::syntax_usage(
            format!(
                "Mapping '{}' with domain parameters can only be accessed within a function. Cannot access domain-parameterized mapping at contract level.",
                mapping
            ),
            node,
        ));
    };
    let function_name = ctx.node(function).name().to_string();
    let domain: Vec<(String, String)> = function_parameters(ctx, function)
        .into_iter()
        .map(|p| ctx.node(p))
        .filter(|p| p.decorations.is_per)
        .map(|p| (p.type_string().to_string(), p.name().to_string()))
        .collect();

    if domain.len() < required.len() {
        let missing: Vec<_> = required[domain.len()..]
            .iter()
            .map(|p| format!("{} {}", p.ty, p.name))
            .collect();
        let missing = missing.join(", ");
        return Err(AnalysisError::syntax_usage(
            format!(
                "Mapping '{}' requires {} domain parameter(s), but function '{}' only has {}. Missing: {}. Add these to the function signature: function {}(per {}, ...) ...",
                mapping,
                required.len(),
                function_name,
                domain.len(),
                missing,
                function_name,
                missing
            ),
            node,
        ));
    }

    let src = node.src;
    let mut renamed = Vec::new();
    for (i, (want, (ty, name))) in required.iter().zip(&domain).enumerate() {
        if &want.ty != ty {
            return Err(AnalysisError::syntax_usage(
                format!(
                    "Domain parameter '{}' at position {} has type '{}' in mapping declaration, but function parameter has type '{}'. Domain parameter types must match exactly.",
                    want.name, i, want.ty, ty
                ),
                node,
            ));
        }
        if &want.name != name {
            renamed.push(format!(
                "Domain parameter at position {} is named '{}' in mapping but '{}' in function. Consider using consistent names for clarity.",
                i, want.name, name
            ));
        }
    }
    for message in renamed {
        ctx.warn(WarningKind::DomainParameterName, message, Some(src));
    }
    Ok(())
}
