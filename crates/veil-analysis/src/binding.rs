//! Bindings: one per declared contract, function or variable
//!
//! A variable binding summarises a declaration across the whole
//! compilation. Its [`StateUsage`] only strengthens as references are
//! visited, and the check passes read it at contract exit.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info};
use veil_ast::{DeclId, Field, NodeIdx, NodeType, PerParameter};

use crate::context::{BindingId, CompilationContext, MappingKeyId, ScopeId};
use crate::error::AnalysisError;
use crate::incrementation::Incrementation;
use crate::mapping_key::{render_key, Holder};
use crate::scope::{RestrictionKind, ScopeKind};
use crate::usage::{Owner, OwnershipType, StateUsage};
use crate::warning::WarningKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BindingKind {
    Contract,
    Function,
    Variable,
}

#[derive(Debug, Clone)]
pub struct Binding {
    pub id: BindingId,
    pub kind: BindingKind,
    pub decl_id: DeclId,
    pub name: String,
    /// The declaration node
    pub node: NodeIdx,
    /// The scope the declaration is bound in
    pub scope: ScopeId,
    pub referencing_paths: Vec<NodeIdx>,

    pub state_variable: bool,
    pub is_constant: bool,
    pub is_mapping: bool,
    pub is_struct: bool,
    pub is_param: bool,
    pub usage: StateUsage,
    pub mapping_keys: BTreeMap<String, MappingKeyId>,
    pub struct_properties: BTreeMap<String, MappingKeyId>,
    pub per_parameters: Vec<PerParameter>,
    /// Values `msg.sender` is required to differ from when this state is nullified
    pub blacklist: Vec<NodeIdx>,
}

impl Binding {
    pub fn is_secret(&self) -> bool {
        self.usage.is_secret
    }

    pub fn is_state_variable(&self) -> bool {
        self.kind == BindingKind::Variable && self.state_variable
    }

    pub fn is_secret_state(&self) -> bool {
        self.is_state_variable() && self.is_secret()
    }
}

/// Whether a node of this type declares something a reference can resolve to
pub fn is_bindable(node_type: NodeType) -> bool {
    use NodeType::*;
    match node_type {
        ContractDefinition | FunctionDefinition | VariableDeclaration => true,
        SourceUnit | PragmaDirective | ImportDirective | InheritanceSpecifier
        | UserDefinedTypeName | ModifierDefinition | EventDefinition | EmitStatement
        | StructDefinition | EnumDefinition | StructuredDocumentation | ParameterList | Block
        | VariableDeclarationStatement | ExpressionStatement | Assignment | BinaryOperation
        | UnaryOperation | Conditional | Identifier | Literal | MemberAccess | IndexAccess
        | FunctionCall | TupleExpression | ElementaryTypeName | ElementaryTypeNameExpression
        | Mapping | ArrayTypeName | IfStatement | ForStatement | WhileStatement
        | DoWhileStatement | Return | Break | Continue | InlineAssembly => false,
    }
}

impl CompilationContext {
    /// Bind a declaration in `scope`
    pub(crate) fn create_binding(
        &mut self,
        idx: NodeIdx,
        scope: ScopeId,
    ) -> Result<Option<BindingId>, AnalysisError> {
        let node = self.node(idx);
        let kind = match node.node_type {
            NodeType::ContractDefinition => BindingKind::Contract,
            NodeType::FunctionDefinition => BindingKind::Function,
            NodeType::VariableDeclaration => BindingKind::Variable,
            _ => return Ok(None),
        };
        if self.scope(scope).bindings.contains_key(&node.id) {
            return Err(AnalysisError::DuplicateBinding {
                decl_id: node.id,
                scope: self.scope(scope).name.clone(),
                src: node.src,
            });
        }
        let path = self.path(idx);
        let mut usage = StateUsage::new(node.decorations.is_secret);
        usage.reinitialisable = node.decorations.reinitialisable;
        let binding = Binding {
            id: BindingId(self.bindings.len() as u32),
            kind,
            decl_id: node.id,
            name: node.name().to_string(),
            node: idx,
            scope,
            referencing_paths: Vec::new(),
            state_variable: node.state_variable,
            is_constant: node.constant,
            is_mapping: path.is_mapping_declaration(),
            is_struct: path.is_struct_declaration(),
            is_param: path.is_function_parameter_declaration(),
            usage,
            mapping_keys: BTreeMap::new(),
            struct_properties: BTreeMap::new(),
            per_parameters: node.per_parameters.clone(),
            blacklist: Vec::new(),
        };
        let id = binding.id;
        debug!(name = %binding.name, kind = ?kind, secret = binding.is_secret(), "bound");
        self.scope_mut(scope).bindings.insert(binding.decl_id, id);
        self.binding_by_decl.insert(binding.decl_id, id);
        self.bindings.push(binding);
        Ok(Some(id))
    }

    /// Record a reference to a binding
    pub(crate) fn binding_update(&mut self, id: BindingId, ident: NodeIdx) -> Result<(), AnalysisError> {
        let binding = self.binding_mut(id);
        if !binding.referencing_paths.contains(&ident) {
            binding.referencing_paths.push(ident);
        }
        if binding.kind != BindingKind::Variable {
            return Ok(());
        }
        self.holder_update(Holder::Binding(id), ident)
    }

    /// Classify a write across every scope. Nullifiers are added through the
    /// function's indicator, never here.
    pub(crate) fn binding_update_incrementation(
        &mut self,
        id: BindingId,
        inc: &Incrementation,
    ) -> Result<(), AnalysisError> {
        let src = self.node(inc.target).src;
        self.update_routed(Holder::Binding(id), inc.target_identifier, |usage| {
            usage.record_incrementation(inc, src)
        })
    }

    pub(crate) fn binding_add_nullifying_path(&mut self, id: BindingId, ident: NodeIdx) -> Result<(), AnalysisError> {
        self.update_routed(Holder::Binding(id), ident, |usage| usage.add_nullifying_path(ident))
    }

    pub(crate) fn binding_add_burning_path(&mut self, id: BindingId, ident: NodeIdx) -> Result<(), AnalysisError> {
        self.update_routed(Holder::Binding(id), ident, |usage| usage.add_burning_path(ident))
    }

    /// The state is read without being written: its prior commitment must
    /// be opened
    pub(crate) fn binding_update_accessed(&mut self, id: BindingId, ident: NodeIdx) -> Result<(), AnalysisError> {
        let src = self.node(ident).src;
        self.update_routed(Holder::Binding(id), ident, |usage| usage.add_accessed_path(ident, src))
    }

    /// Validate the binding and every key it holds.
    ///
    /// Functions report needless decorators as warnings; here they are only
    /// logged, and returned.
    pub(crate) fn binding_prelim_checks(&self, id: BindingId) -> Result<Vec<String>, AnalysisError> {
        let binding = self.binding(id);
        if !binding.is_secret() {
            return Ok(Vec::new());
        }
        let node = self.node(binding.node);
        let mut advice = Vec::new();
        let mut pending = self.held_keys(Holder::Binding(id));
        while let Some(key) = pending.pop() {
            let key = self.mapping_key(key);
            advice.extend(key.usage.prelim_check(&key.name, node)?);
            pending.extend(key.struct_properties.values().copied());
        }
        advice.extend(binding.usage.prelim_check(&binding.name, node)?);
        for text in &advice {
            info!(state = %binding.name, "{}", text);
        }
        Ok(advice)
    }

    /// A whole secret state nobody can nullify is useless after its first
    /// write
    pub(crate) fn binding_is_nullifiable(&self, id: BindingId) -> Result<(), AnalysisError> {
        let binding = self.binding(id);
        if !binding.is_secret_state() || binding.is_constant {
            return Ok(());
        }
        let unusable = || {
            AnalysisError::zkp(
                format!(
                    "All whole states must be nullifiable, otherwise they are useless after initialisation! Consider making {} editable or constant.",
                    binding.name
                ),
                self.node(binding.node),
            )
        };
        if binding.is_mapping {
            let keys: Vec<_> = binding
                .mapping_keys
                .values()
                .map(|k| self.mapping_key(*k))
                .collect();
            // any caller can supply a fresh msg.sender or parameter key
            if keys
                .iter()
                .any(|k| (k.is_msg_sender || k.referenced_key_is_param) && k.is_nullifiable())
            {
                return Ok(());
            }
            // keys that are only read don't need a nullifier of their own
            if binding.usage.is_whole
                && keys.iter().any(|k| !k.is_nullifiable() && !k.usage.is_accessed)
            {
                return Err(unusable());
            }
            return Ok(());
        }
        if binding.usage.is_whole && !binding.usage.is_nullified {
            return Err(unusable());
        }
        Ok(())
    }

    /// Record `owner_node` as the owner of a binding and of all its keys
    pub(crate) fn update_ownership(
        &mut self,
        id: BindingId,
        owner_node: NodeIdx,
        hint: Option<OwnershipType>,
    ) -> Result<(), AnalysisError> {
        let binding = self.binding(id);
        let path = self.path(owner_node);

        // require(m[k] == msg.sender) on the mapping itself: the value is the owner
        if hint.is_none()
            && path.node_type() == NodeType::IndexAccess
            && path.referenced_declaration() == Some(binding.decl_id)
        {
            if let Some(comparison) = path.ancestor_of_type(NodeType::BinaryOperation) {
                let msg_side = [Field::LeftExpression, Field::RightExpression]
                    .into_iter()
                    .filter_map(|f| self.ast().child(comparison.idx(), f))
                    .find(|side| {
                        let side = self.path(*side);
                        side.is_msg_sender() || side.is_msg_value()
                    });
                if let Some(msg_side) = msg_side {
                    return self.update_ownership(id, msg_side, Some(OwnershipType::Value));
                }
            }
        }

        let is_msg = path.is_msg_sender() || path.is_msg_value();
        let (name, mapping_ownership_type) = if is_msg {
            ("msg".to_string(), Some(hint.unwrap_or(OwnershipType::Key)))
        } else {
            (render_key(self, owner_node)?, hint)
        };
        let owner = Owner {
            node: owner_node,
            name,
            mapping_ownership_type,
            is_param: path.is_function_parameter(),
            is_secret: self
                .referenced_binding(owner_node)
                .map_or(false, |b| self.binding(b).is_secret()),
            is_address: is_msg || path.node().type_identifier().contains("address"),
        };

        if let Some(existing) = &binding.usage.owner {
            if existing.name != owner.name {
                return Err(AnalysisError::zkp(
                    format!(
                        "We found two distinct owners ({} and {}) of a secret state, which we can't allow because only one public key needs to be able to open/nullify the secret.",
                        existing.name, owner.name
                    ),
                    self.node(binding.node),
                ));
            }
            if existing.mapping_ownership_type != owner.mapping_ownership_type {
                return Err(AnalysisError::zkp(
                    "We found two distinct owners of a secret state - msg.sender when the mapping key is msg.sender, and when the mapping value is msg.sender, which we can't allow because only one public key needs to be able to open/nullify the secret.",
                    self.node(binding.node),
                ));
            }
            return Ok(());
        }

        info!(state = %binding.name, owner = %owner.name, "inferred owner");
        let on_chain_key_registry = owner.is_address && !owner.is_msg_sender();
        let mut pending = vec![Holder::Binding(id)];
        while let Some(holder) = pending.pop() {
            let usage = self.holder_usage_mut(holder);
            usage.is_owned = true;
            usage.owner = Some(owner.clone());
            usage.on_chain_key_registry |= on_chain_key_registry;
            pending.extend(self.held_keys(holder).into_iter().map(Holder::Key));
        }
        Ok(())
    }

    /// Infer who owns a secret state from the places it is nullified.
    ///
    /// A caller restriction on the nullifying function names the owner
    /// outright. Otherwise a mapping nullified only through `m[msg.sender]`
    /// is owned by its key, and one only ever assigned `msg.sender` is owned
    /// by its value.
    pub(crate) fn infer_ownership(&mut self, id: BindingId) -> Result<(), AnalysisError> {
        let binding = self.binding(id);
        if binding.kind != BindingKind::Variable || !binding.is_secret() {
            return Ok(());
        }
        let is_mapping = binding.is_mapping;
        let nullifying = binding.usage.nullifying_paths.clone();

        let mut key_everywhere: Option<bool> = None;
        let mut value_everywhere: Option<bool> = None;
        let mut key_owner = None;
        let mut value_owner = None;
        for ident in nullifying {
            let function = self.enclosing_scope(ident, ScopeKind::Function);
            let restriction = function.and_then(|s| self.scope(s).caller_restriction);
            match restriction {
                Some(r) if r.kind == RestrictionKind::Match => {
                    self.update_ownership(id, r.node, None)?;
                    continue;
                }
                Some(r) => self.binding_mut(id).blacklist.push(r.node),
                None => {}
            }

            let path = self.path(ident);
            let access = if is_mapping { path.indexed_by() } else { None };
            if let Some(access) = access {
                let key = self.ast().child(access, Field::IndexExpression);
                if key.map_or(false, |k| self.path(k).is_msg_sender()) {
                    key_everywhere.get_or_insert(true);
                    key_owner = key_owner.or(key);
                    continue;
                }
                let rhs = path.corresponding_rhs();
                if rhs.map_or(false, |r| self.path(r).is_msg_sender() || self.path(r).is_msg_value()) {
                    value_everywhere.get_or_insert(true);
                    value_owner = value_owner.or(rhs);
                    continue;
                }
            }
            key_everywhere = Some(false);
            value_everywhere = Some(false);
        }

        match (key_everywhere, value_everywhere, key_owner, value_owner) {
            (Some(true), v, Some(owner), _) if v != Some(true) => {
                self.update_ownership(id, owner, Some(OwnershipType::Key))
            }
            (_, Some(true), _, Some(owner)) => {
                self.update_ownership(id, owner, Some(OwnershipType::Value))
            }
            _ => Ok(()),
        }
    }

    /// Look for writes that hand the state to the zero owner. On a
    /// reinitialisable state these are burns; otherwise they orphan it.
    pub(crate) fn owner_set_to_zero_check(&mut self, id: BindingId) -> Result<(), AnalysisError> {
        let binding = self.binding(id);
        if let Some(owner) = binding.usage.owner.clone() {
            match (owner.is_msg_sender(), owner.mapping_ownership_type) {
                (true, Some(OwnershipType::Key)) => {
                    let zero_keys: Vec<_> = binding
                        .mapping_keys
                        .values()
                        .map(|k| self.mapping_key(*k))
                        .filter(|k| self.path(k.key_path).is_zero())
                        .map(|k| (k.key_path, k.usage.modifying_paths.clone()))
                        .collect();
                    for (key_path, modifying) in zero_keys {
                        self.owner_set_to_zero(id, key_path, &modifying)?;
                    }
                }
                (true, Some(OwnershipType::Value)) => {
                    self.search_modifying_paths_for_zero(id, id)?;
                }
                _ => {
                    let owner_binding = self
                        .referenced_binding(owner.node)
                        .filter(|b| self.binding(*b).kind == BindingKind::Variable);
                    if let Some(owner_binding) = owner_binding {
                        self.search_modifying_paths_for_zero(owner_binding, id)?;
                    }
                }
            }
        }
        let binding = self.binding(id);
        if binding.usage.reinitialisable && !binding.usage.is_burned {
            return Err(AnalysisError::syntax_usage(
                format!(
                    "The state {} has been marked as reinitialisable but we can't find anywhere to burn a commitment ready for reinitialisation.",
                    binding.name
                ),
                self.node(binding.node),
            ));
        }
        Ok(())
    }

    /// Find assignments of a zero conversion (`x = address(0)`) to `holder`
    /// and treat them as zero-owner writes of `state`
    fn search_modifying_paths_for_zero(&mut self, holder: BindingId, state: BindingId) -> Result<(), AnalysisError> {
        let ast = self.ast();
        let mut zeroed = Vec::new();
        for ident in &self.binding(holder).usage.modifying_paths {
            let Some(assignment) = self.path(*ident).ancestor_of_type(NodeType::Assignment) else {
                continue;
            };
            let (Some(lhs), Some(rhs)) = (
                ast.child(assignment.idx(), Field::LeftHandSide),
                ast.child(assignment.idx(), Field::RightHandSide),
            ) else {
                continue;
            };
            let writes_here = lhs == *ident || ast.child(lhs, Field::BaseExpression) == Some(*ident);
            let rhs = self.path(rhs);
            if writes_here && rhs.node_type() == NodeType::FunctionCall && rhs.is_zero() {
                zeroed.push((assignment.idx(), *ident));
            }
        }
        for (assignment, ident) in zeroed {
            self.owner_set_to_zero(state, assignment, &[ident])?;
        }
        Ok(())
    }

    fn owner_set_to_zero(&mut self, id: BindingId, at: NodeIdx, writes: &[NodeIdx]) -> Result<(), AnalysisError> {
        let src = self.node(at).src;
        if !self.binding(id).usage.reinitialisable {
            self.warn(
                WarningKind::OwnerSetToZero,
                "This line resets the public key inside the commitment (i.e. the owner) to 0. This means you relinquish ownership of the state and it can never be used again. If you want the state to be burned and reset, mark the line where it is initialised as reinitialisable. Without doing so, you end up with a secret state of no owner which nobody can access.",
                Some(src),
            );
            return Ok(());
        }
        debug!(state = %self.binding(id).name, src = %src, "found a burn statement");
        self.binding_mut(id).usage.is_burned = true;
        let decl = self.binding(id).decl_id;
        for ident in writes {
            let statement = self
                .path(*ident)
                .ancestor_of_type(NodeType::ExpressionStatement)
                .map(|p| p.idx());
            if let Some(statement) = statement {
                self.facts_mut(statement).is_burn_statement = true;
            }
            // only writes to this state itself burn a commitment of it
            if self.path(*ident).referenced_declaration() != Some(decl) {
                continue;
            }
            self.binding_add_burning_path(id, *ident)?;
            let indicator = self
                .enclosing_scope(*ident, ScopeKind::Function)
                .and_then(|scope| self.state_indicator_in(scope, decl));
            if let Some(indicator) = indicator {
                self.indicator_add_burning_path(indicator, *ident)?;
            }
        }
        Ok(())
    }
}
