//! Deciding whether a statement increments, decrements or overwrites a state

use veil_ast::{Ast, DeclId, Field, NodeIdx, NodeType};

use crate::context::CompilationContext;
use crate::error::AnalysisError;

/// How one expression statement writes to a state variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incrementation {
    pub statement: NodeIdx,
    /// The written expression (`a`, `m[k]`, `s.x`)
    pub target: NodeIdx,
    /// The identifier at the root of `target`
    pub target_identifier: NodeIdx,
    pub declaration: DeclId,
    pub is_incremented: bool,
    pub is_decremented: bool,
    pub known: bool,
    pub unknown: bool,
    pub reinitialisable: bool,
    /// Bool and address states are always overwritten
    pub address_overwrite: bool,
    /// The right-hand side both adds and subtracts
    pub mixed_operators: bool,
    pub increments: Vec<NodeIdx>,
    pub decrements: Vec<NodeIdx>,
}

impl Incrementation {
    /// Replaces the state (or increments it with a known value)
    pub fn is_overwrite(&self) -> bool {
        !self.is_incremented || self.known
    }

    /// Adds to the state without anyone needing to know its value
    pub fn is_unknown_increment(&self) -> bool {
        self.is_incremented && !self.is_decremented && !self.known && self.unknown
    }

    pub fn whole_reason(&self) -> &'static str {
        if self.address_overwrite {
            "Address"
        } else {
            "Overwritten"
        }
    }

    /// Overwrites nullify the old commitment unless the state may be
    /// reinitialised; decrements always have to prove what they take away
    pub fn needs_nullifier(&self) -> bool {
        (self.is_overwrite() && !self.reinitialisable) || (self.is_decremented && !self.known)
    }
}

/// Classify the write performed by an `ExpressionStatement`.
///
/// Returns `None` when the statement doesn't write to a secret state
/// variable.
pub fn classify(
    ctx: &CompilationContext,
    statement: NodeIdx,
) -> Result<Option<Incrementation>, AnalysisError> {
    let ast = ctx.ast();
    let Some(expression) = ast.child(statement, Field::Expression) else {
        return Ok(None);
    };
    let expr = ast.node(expression);
    let target = match expr.node_type {
        NodeType::Assignment => ast.child(expression, Field::LeftHandSide),
        NodeType::UnaryOperation if matches!(expr.operator(), "++" | "--" | "delete") => {
            ast.child(expression, Field::SubExpression)
        }
        _ => None,
    };
    let Some(target) = target else {
        return Ok(None);
    };
    let Some(target_identifier) = ctx.path(target).base_identifier() else {
        return Ok(None);
    };
    let Some(binding) = ctx.referenced_binding(target_identifier) else {
        return Ok(None);
    };
    let binding = ctx.binding(binding);
    if !binding.is_state_variable() || !binding.is_secret() {
        return Ok(None);
    }

    let decorations = ctx
        .decorations(target)
        .union(ctx.decorations(target_identifier));
    let mut inc = Incrementation {
        statement,
        target,
        target_identifier,
        declaration: binding.decl_id,
        is_incremented: false,
        is_decremented: false,
        known: decorations.is_known,
        unknown: decorations.is_unknown,
        reinitialisable: decorations.reinitialisable,
        address_overwrite: false,
        mixed_operators: false,
        increments: Vec::new(),
        decrements: Vec::new(),
    };

    if expr.node_type == NodeType::UnaryOperation {
        match expr.operator() {
            "++" => {
                inc.is_incremented = true;
                inc.increments.push(expression);
            }
            "--" => {
                inc.is_incremented = true;
                inc.is_decremented = true;
                inc.decrements.push(expression);
            }
            _ => {}
        }
        return Ok(Some(inc));
    }

    let target_type = ast.node(target).type_string();
    if target_type == "bool" || target_type.starts_with("address") {
        inc.address_overwrite = target_type.starts_with("address");
        return Ok(Some(inc));
    }

    let Some(rhs) = ast.child(expression, Field::RightHandSide) else {
        return Ok(Some(inc));
    };
    let mut operands = Vec::new();
    match expr.operator() {
        "=" => {
            flatten(ast, rhs, true, &mut operands);
            let own: Vec<_> = operands
                .iter()
                .filter(|(op, _)| same_state(ast, *op, target))
                .collect();
            // exactly one positive self-reference: a = a + b - c
            if operands.len() < 2 || own.len() != 1 || !own[0].1 {
                return Ok(Some(inc));
            }
            let own = own[0].0;
            operands.retain(|(op, _)| *op != own);
            inc.is_incremented = true;
            inc.is_decremented = operands.first().map_or(false, |(_, positive)| !positive);
        }
        "+=" => {
            flatten(ast, rhs, true, &mut operands);
            inc.is_incremented = true;
            inc.is_decremented = operands.first().map_or(false, |(_, positive)| !positive);
        }
        "-=" => {
            flatten(ast, rhs, false, &mut operands);
            inc.is_incremented = true;
            inc.is_decremented = true;
        }
        "*=" | "/=" | "%=" => return Ok(Some(inc)),
        other => {
            return Err(AnalysisError::todo(
                format!("Operator '{}' not yet supported. Please open an issue.", other),
                expr,
            ))
        }
    }

    for (operand, positive) in operands {
        if positive {
            inc.increments.push(operand);
        } else {
            inc.decrements.push(operand);
        }
    }
    inc.mixed_operators = !inc.increments.is_empty() && !inc.decrements.is_empty();
    Ok(Some(inc))
}

/// Split a sum into signed operands: `b - (c + d)` gives `+b -c -d`
fn flatten(ast: &Ast, idx: NodeIdx, positive: bool, out: &mut Vec<(NodeIdx, bool)>) {
    let node = ast.node(idx);
    match node.node_type {
        NodeType::BinaryOperation if matches!(node.operator(), "+" | "-") => {
            let right_positive = if node.operator() == "-" { !positive } else { positive };
            if let Some(left) = ast.child(idx, Field::LeftExpression) {
                flatten(ast, left, positive, out);
            }
            if let Some(right) = ast.child(idx, Field::RightExpression) {
                flatten(ast, right, right_positive, out);
            }
        }
        NodeType::TupleExpression => match ast.list(idx, Field::Components).as_slice() {
            [inner] => flatten(ast, *inner, positive, out),
            _ => out.push((idx, positive)),
        },
        _ => out.push((idx, positive)),
    }
}

/// Whether two expressions denote the same storage slot
pub fn same_state(ast: &Ast, a: NodeIdx, b: NodeIdx) -> bool {
    let (na, nb) = (ast.node(a), ast.node(b));
    match (na.node_type, nb.node_type) {
        (NodeType::Identifier, NodeType::Identifier) => {
            na.referenced_declaration.is_some()
                && na.referenced_declaration == nb.referenced_declaration
                && na.name == nb.name
        }
        (NodeType::Literal, NodeType::Literal) => na.value == nb.value,
        (NodeType::IndexAccess, NodeType::IndexAccess) => {
            let base = ast
                .child(a, Field::BaseExpression)
                .zip(ast.child(b, Field::BaseExpression));
            let index = ast
                .child(a, Field::IndexExpression)
                .zip(ast.child(b, Field::IndexExpression));
            matches!((base, index), (Some((ba, bb)), Some((ia, ib)))
                if same_state(ast, ba, bb) && same_state(ast, ia, ib))
        }
        (NodeType::MemberAccess, NodeType::MemberAccess) => {
            na.member_name == nb.member_name
                && matches!(
                    ast.child(a, Field::Expression).zip(ast.child(b, Field::Expression)),
                    Some((ea, eb)) if same_state(ast, ea, eb)
                )
        }
        _ => false,
    }
}
