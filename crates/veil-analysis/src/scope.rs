//! Lexical scopes and reference resolution
//!
//! Source units, contracts and functions each open a [`Scope`]. Every other
//! node belongs to its nearest scopable ancestor. References are resolved
//! through the global declaration table, so a use may precede its
//! declaration in source order.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::debug;
use veil_ast::{DeclId, NodeIdx, NodeType};

use crate::binding::BindingKind;
use crate::context::{BindingId, CompilationContext, ScopeId};
use crate::error::AnalysisError;
use crate::indicator::{ContractDefinitionIndicator, FunctionDefinitionIndicator, LocalVariableIndicator};
use crate::mapping_key::Holder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScopeKind {
    SourceUnit,
    Contract,
    Function,
}

/// How a `require` on `msg.sender` restricts the callers of a function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RestrictionKind {
    /// `require(msg.sender == x)`
    Match,
    /// `require(msg.sender != x)`
    Exclude,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerRestriction {
    pub kind: RestrictionKind,
    /// The value `msg.sender` is compared against
    pub node: NodeIdx,
}

#[derive(Debug, Clone)]
pub enum ScopeIndicators {
    None,
    Contract(ContractDefinitionIndicator),
    Function(FunctionDefinitionIndicator),
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub id: ScopeId,
    pub kind: ScopeKind,
    pub name: String,
    pub node: NodeIdx,
    pub parent: Option<ScopeId>,
    /// Declarations bound at this level. Never shrinks.
    pub bindings: BTreeMap<DeclId, BindingId>,
    pub referenced_bindings: BTreeSet<BindingId>,
    pub modified_bindings: BTreeSet<BindingId>,
    pub indicators: ScopeIndicators,
    pub caller_restriction: Option<CallerRestriction>,
}

impl Scope {
    pub fn function_indicator(&self) -> Option<&FunctionDefinitionIndicator> {
        match &self.indicators {
            ScopeIndicators::Function(indicator) => Some(indicator),
            _ => None,
        }
    }

    pub(crate) fn function_indicator_mut(&mut self) -> Option<&mut FunctionDefinitionIndicator> {
        match &mut self.indicators {
            ScopeIndicators::Function(indicator) => Some(indicator),
            _ => None,
        }
    }

    pub fn contract_indicator(&self) -> Option<&ContractDefinitionIndicator> {
        match &self.indicators {
            ScopeIndicators::Contract(indicator) => Some(indicator),
            _ => None,
        }
    }

    pub(crate) fn contract_indicator_mut(&mut self) -> Option<&mut ContractDefinitionIndicator> {
        match &mut self.indicators {
            ScopeIndicators::Contract(indicator) => Some(indicator),
            _ => None,
        }
    }
}

impl CompilationContext {
    /// Open the scope of a source unit, contract or function
    pub(crate) fn create_scope(&mut self, node: NodeIdx, parent: Option<ScopeId>) -> Result<ScopeId, AnalysisError> {
        if let Some(existing) = self.scope_for_node(node) {
            return Ok(existing);
        }
        let n = self.node(node);
        let kind = match n.node_type {
            NodeType::SourceUnit => ScopeKind::SourceUnit,
            NodeType::ContractDefinition => ScopeKind::Contract,
            NodeType::FunctionDefinition => ScopeKind::Function,
            other => {
                return Err(AnalysisError::UnclassifiedNode {
                    node_type: other,
                    node,
                    src: n.src,
                })
            }
        };
        let id = ScopeId(self.scopes.len() as u32);
        let indicators = match kind {
            ScopeKind::SourceUnit => ScopeIndicators::None,
            ScopeKind::Contract => ScopeIndicators::Contract(ContractDefinitionIndicator::default()),
            ScopeKind::Function => ScopeIndicators::Function(FunctionDefinitionIndicator::new(
                parent.and_then(|p| self.scope_ancestor_of_kind(p, ScopeKind::Contract)),
            )),
        };
        let name = match kind {
            ScopeKind::SourceUnit => "SourceUnit".to_string(),
            _ => n.name().to_string(),
        };
        debug!(scope = %name, kind = ?kind, "opened scope");
        self.scopes.push(Scope {
            id,
            kind,
            name,
            node,
            parent,
            bindings: BTreeMap::new(),
            referenced_bindings: BTreeSet::new(),
            modified_bindings: BTreeSet::new(),
            indicators,
            caller_restriction: None,
        });
        self.scope_by_node.insert(node, id);
        Ok(id)
    }

    /// The nearest scope of `kind`, starting at `id` itself
    pub fn scope_ancestor_of_kind(&self, id: ScopeId, kind: ScopeKind) -> Option<ScopeId> {
        let mut current = Some(id);
        while let Some(scope) = current {
            if self.scope(scope).kind == kind {
                return Some(scope);
            }
            current = self.scope(scope).parent;
        }
        None
    }

    /// The nearest scope of `kind` enclosing a node
    pub fn enclosing_scope(&self, idx: NodeIdx, kind: ScopeKind) -> Option<ScopeId> {
        self.scope_of(idx)
            .ok()
            .and_then(|scope| self.scope_ancestor_of_kind(scope, kind))
    }

    /// Bindings of this scope that satisfy `predicate`
    pub fn filter_bindings(&self, scope: ScopeId, predicate: impl Fn(&crate::binding::Binding) -> bool) -> Vec<BindingId> {
        self.scope(scope)
            .bindings
            .values()
            .copied()
            .filter(|b| predicate(self.binding(*b)))
            .collect()
    }

    /// Whether a function writes to any secret state
    pub fn modifies_secret_state(&self, scope: ScopeId) -> bool {
        self.scope(scope).function_indicator().map_or(false, |f| {
            f.state_variables.values().any(|sid| {
                let indicator = self.state_indicator(*sid);
                indicator.usage.is_modified && indicator.usage.is_secret
            })
        })
    }

    /// Whether a function nullifies any secret state
    pub fn nullifies_secret_state(&self, scope: ScopeId) -> bool {
        self.scope(scope).function_indicator().map_or(false, |f| {
            f.state_variables.values().any(|sid| {
                let indicator = self.state_indicator(*sid);
                indicator.usage.is_nullified && indicator.usage.is_secret
            })
        })
    }

    /// Restrict the callers of a function
    pub(crate) fn add_caller_restriction(
        &mut self,
        scope: ScopeId,
        kind: RestrictionKind,
        node: NodeIdx,
    ) -> Result<(), AnalysisError> {
        if let Some(existing) = self.scope(scope).caller_restriction {
            if existing.kind != kind {
                return Err(AnalysisError::todo(
                    "We don't currently support two types of caller restriction in one scope (e.g. a whitelist and a blacklist.)",
                    self.node(node),
                ));
            }
        }
        debug!(scope = %self.scope(scope).name, restriction = ?kind, "caller restriction");
        self.scope_mut(scope).caller_restriction = Some(CallerRestriction { kind, node });
        Ok(())
    }

    /// Resolve the references a node makes.
    ///
    /// Declarations are bound during the first build traversal; this runs in
    /// the second, once every declaration is known. Every node type is
    /// classified explicitly.
    pub(crate) fn update_scope(&mut self, idx: NodeIdx) -> Result<(), AnalysisError> {
        use NodeType::*;
        let node = self.node(idx);
        match node.node_type {
            Identifier => self.update_identifier(idx),
            VariableDeclaration => self.update_declaration(idx),
            EnumDefinition | InlineAssembly | StructuredDocumentation => Err(AnalysisError::UnclassifiedNode {
                node_type: node.node_type,
                node: idx,
                src: node.src,
            }),
            SourceUnit | PragmaDirective | ImportDirective | ContractDefinition
            | InheritanceSpecifier | UserDefinedTypeName | FunctionDefinition
            | ModifierDefinition | EventDefinition | EmitStatement | StructDefinition
            | ParameterList | Block | VariableDeclarationStatement | ExpressionStatement
            | Assignment | BinaryOperation | UnaryOperation | Conditional | Literal
            | MemberAccess | IndexAccess | FunctionCall | TupleExpression | ElementaryTypeName
            | ElementaryTypeNameExpression | Mapping | ArrayTypeName | IfStatement
            | ForStatement | WhileStatement | DoWhileStatement | Return | Break | Continue => Ok(()),
        }
    }

    fn update_identifier(&mut self, idx: NodeIdx) -> Result<(), AnalysisError> {
        let path = self.path(idx);
        if path.is_pseudo_identifier() {
            return Ok(());
        }
        let Some(binding) = self.referenced_binding(idx) else {
            return Ok(());
        };
        let modification = path.is_modification();
        self.binding_update(binding, idx)?;
        if self.binding(binding).kind != BindingKind::Variable {
            return Ok(());
        }

        let scope = self.scope_of(idx)?;
        let scope_mut = self.scope_mut(scope);
        scope_mut.referenced_bindings.insert(binding);
        if modification {
            scope_mut.modified_bindings.insert(binding);
        }

        let Some(function) = self.scope_ancestor_of_kind(scope, ScopeKind::Function) else {
            return Ok(());
        };
        let b = self.binding(binding);
        if b.is_state_variable() {
            let secret = b.is_secret();
            let indicator = self.ensure_state_indicator(function, binding);
            self.holder_update(Holder::Indicator(indicator), idx)?;
            if secret {
                if let Some(f) = self.scope_mut(function).function_indicator_mut() {
                    f.interacts_with_secret = true;
                    f.requirements.zk_snark_verification_required = true;
                }
            }
            return Ok(());
        }

        let (decl_id, name, decl_node, is_param) = (b.decl_id, b.name.clone(), b.node, b.is_param);
        if let Some(f) = self.scope_mut(function).function_indicator_mut() {
            f.locals
                .entry(decl_id)
                .or_insert_with(|| LocalVariableIndicator::new(decl_id, name, decl_node, is_param, None))
                .record_reference(idx, modification);
        }
        Ok(())
    }

    fn update_declaration(&mut self, idx: NodeIdx) -> Result<(), AnalysisError> {
        let node = self.node(idx);
        let (decl_id, secret) = (node.id, node.decorations.is_secret);
        let Some(binding) = self.binding_for_decl(decl_id) else {
            return Ok(());
        };
        let scope = self.scope_of(idx)?;
        let b = self.binding(binding);
        if b.is_state_variable() {
            if secret {
                if let Some(contract) = self.scope_ancestor_of_kind(scope, ScopeKind::Contract) {
                    if let Some(c) = self.scope_mut(contract).contract_indicator_mut() {
                        c.requirements.zk_snark_verification_required = true;
                        c.requirements.new_commitments_required = true;
                    }
                }
            }
            return Ok(());
        }
        let Some(function) = self.scope_ancestor_of_kind(scope, ScopeKind::Function) else {
            return Ok(());
        };
        let (name, is_param) = (b.name.clone(), b.is_param);
        let initial_value = self
            .path(idx)
            .parent()
            .filter(|p| p.node_type() == NodeType::VariableDeclarationStatement)
            .and_then(|p| self.ast().child(p.idx(), veil_ast::Field::InitialValue));
        if let Some(f) = self.scope_mut(function).function_indicator_mut() {
            f.locals
                .entry(decl_id)
                .or_insert_with(|| LocalVariableIndicator::new(decl_id, name, idx, is_param, initial_value));
        }
        Ok(())
    }
}
