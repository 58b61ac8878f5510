//! The compilation context: every derived table for one analysis run
//!
//! Paths, scopes, bindings, mapping keys and per-node facts all live here,
//! indexed by plain ids. Nothing refers to anything else by reference, so the
//! graph can be cyclic (scope -> binding -> path -> scope) without any
//! ownership cycles, and `reset` is enough to start a fresh compilation.

use std::collections::HashMap;

use serde::Serialize;
use tracing::warn;
use veil_ast::{Ast, DeclId, Decorations, Node, NodeIdx, Src};

use crate::binding::Binding;
use crate::error::AnalysisError;
use crate::indicator::StateVariableIndicator;
use crate::mapping_key::MappingKey;
use crate::options::AnalysisOptions;
use crate::path::{Path, PathEntry};
use crate::scope::Scope;
use crate::warning::{Warning, WarningKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ScopeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BindingId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MappingKeyId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct StateIndicatorId(pub u32);

/// Facts the passes record about individual nodes. These are exported as
/// annotations on a copy of the input tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeFacts {
    /// Decorations copied down from an enclosing index or member access
    #[serde(skip)]
    pub propagated: Decorations,
    pub accessed_secret_state: bool,
    pub contains_secret: bool,
    pub contains_public: bool,
    pub interacts_with_secret: bool,
    pub interacts_with_public: bool,
    pub is_incremented: Option<bool>,
    pub is_decremented: Option<bool>,
    pub incremented_declaration: Option<DeclId>,
    pub is_burn_statement: bool,
    pub require_statement_private: bool,
}

/// All state of one compilation
#[derive(Debug)]
pub struct CompilationContext {
    pub(crate) ast: Ast,
    pub(crate) options: AnalysisOptions,
    pub(crate) paths: Vec<Option<PathEntry>>,
    pub(crate) scopes: Vec<Scope>,
    pub(crate) scope_by_node: HashMap<NodeIdx, ScopeId>,
    pub(crate) bindings: Vec<Binding>,
    pub(crate) binding_by_decl: HashMap<DeclId, BindingId>,
    pub(crate) mapping_keys: Vec<MappingKey>,
    pub(crate) state_indicators: Vec<StateVariableIndicator>,
    pub(crate) facts: Vec<NodeFacts>,
    /// First declaration of each domain-parameterised mapping, per contract
    pub(crate) domain_declarations: HashMap<(NodeIdx, String), NodeIdx>,
    pub(crate) warnings: Vec<Warning>,
    pub(crate) local_declaration_warned: bool,
}

impl CompilationContext {
    pub fn new(ast: Ast, options: AnalysisOptions) -> Self {
        let len = ast.len();
        Self {
            ast,
            options,
            paths: vec![None; len],
            scopes: Vec::new(),
            scope_by_node: HashMap::new(),
            bindings: Vec::new(),
            binding_by_decl: HashMap::new(),
            mapping_keys: Vec::new(),
            state_indicators: Vec::new(),
            facts: vec![NodeFacts::default(); len],
            domain_declarations: HashMap::new(),
            warnings: Vec::new(),
            local_declaration_warned: false,
        }
    }

    /// Drop every derived table, keeping the tree and options
    pub fn reset(&mut self) {
        let len = self.ast.len();
        self.paths = vec![None; len];
        self.scopes.clear();
        self.scope_by_node.clear();
        self.bindings.clear();
        self.binding_by_decl.clear();
        self.mapping_keys.clear();
        self.state_indicators.clear();
        self.facts = vec![NodeFacts::default(); len];
        self.domain_declarations.clear();
        self.warnings.clear();
        self.local_declaration_warned = false;
    }

    pub fn ast(&self) -> &Ast {
        &self.ast
    }

    pub fn options(&self) -> &AnalysisOptions {
        &self.options
    }

    pub fn node(&self, idx: NodeIdx) -> &Node {
        self.ast.node(idx)
    }

    /// A view of `idx` with navigation and shape predicates
    pub fn path(&self, idx: NodeIdx) -> Path<'_> {
        Path::new(self, idx)
    }

    pub fn entry(&self, idx: NodeIdx) -> Option<&PathEntry> {
        self.paths.get(idx.index()).and_then(Option::as_ref)
    }

    /// The scope a node belongs to, once the build pass has placed it
    pub fn scope_of(&self, idx: NodeIdx) -> Result<ScopeId, AnalysisError> {
        self.entry(idx)
            .map(|e| e.scope)
            .ok_or(AnalysisError::MissingPath { node: idx })
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0 as usize]
    }

    pub(crate) fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.0 as usize]
    }

    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    /// The scope opened by a scopable node
    pub fn scope_for_node(&self, idx: NodeIdx) -> Option<ScopeId> {
        self.scope_by_node.get(&idx).copied()
    }

    pub fn binding(&self, id: BindingId) -> &Binding {
        &self.bindings[id.0 as usize]
    }

    pub(crate) fn binding_mut(&mut self, id: BindingId) -> &mut Binding {
        &mut self.bindings[id.0 as usize]
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn binding_for_decl(&self, decl: DeclId) -> Option<BindingId> {
        self.binding_by_decl.get(&decl).copied()
    }

    /// The binding a reference resolves to
    pub fn referenced_binding(&self, idx: NodeIdx) -> Option<BindingId> {
        self.path(idx)
            .referenced_declaration()
            .and_then(|decl| self.binding_for_decl(decl))
    }

    pub fn mapping_key(&self, id: MappingKeyId) -> &MappingKey {
        &self.mapping_keys[id.0 as usize]
    }

    pub(crate) fn mapping_key_mut(&mut self, id: MappingKeyId) -> &mut MappingKey {
        &mut self.mapping_keys[id.0 as usize]
    }

    pub fn mapping_keys(&self) -> &[MappingKey] {
        &self.mapping_keys
    }

    pub fn state_indicator(&self, id: StateIndicatorId) -> &StateVariableIndicator {
        &self.state_indicators[id.0 as usize]
    }

    pub(crate) fn state_indicator_mut(&mut self, id: StateIndicatorId) -> &mut StateVariableIndicator {
        &mut self.state_indicators[id.0 as usize]
    }

    pub fn state_indicators(&self) -> &[StateVariableIndicator] {
        &self.state_indicators
    }

    pub fn facts(&self, idx: NodeIdx) -> &NodeFacts {
        &self.facts[idx.index()]
    }

    pub(crate) fn facts_mut(&mut self, idx: NodeIdx) -> &mut NodeFacts {
        &mut self.facts[idx.index()]
    }

    /// A node's own decorations plus any copied down from enclosing accesses
    pub fn decorations(&self, idx: NodeIdx) -> Decorations {
        self.ast
            .node(idx)
            .decorations
            .union(self.facts[idx.index()].propagated)
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Record an advisory and log it
    pub(crate) fn warn(&mut self, kind: WarningKind, message: impl Into<String>, src: Option<Src>) {
        if kind == WarningKind::Pedantic && !self.options.pedantic {
            return;
        }
        let warning = Warning::new(kind, message, src);
        match warning.src {
            Some(src) => warn!(code = warning.code, src = %src, "{}", warning.message),
            None => warn!(code = warning.code, "{}", warning.message),
        }
        self.warnings.push(warning);
    }

    pub(crate) fn insert_path(&mut self, entry: PathEntry) -> Result<(), AnalysisError> {
        let slot = self
            .paths
            .get_mut(entry.node.index())
            .ok_or(AnalysisError::MissingPath { node: entry.node })?;
        if slot.is_none() {
            *slot = Some(entry);
        }
        Ok(())
    }
}
