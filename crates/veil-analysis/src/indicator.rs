//! Indicators: per-scope usage summaries
//!
//! Contracts and functions carry [`RequirementFlags`] deciding which proof
//! machinery the generated code needs. Inside a function every referenced
//! state variable gets a [`StateVariableIndicator`] that mirrors the
//! binding's usage facts for that function only, and every local variable
//! gets a [`LocalVariableIndicator`].

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;
use veil_ast::{DeclId, NodeIdx};

use crate::context::{BindingId, CompilationContext, MappingKeyId, ScopeId, StateIndicatorId};
use crate::error::AnalysisError;
use crate::incrementation::Incrementation;
use crate::mapping_key::Holder;
use crate::scope::ScopeIndicators;
use crate::usage::{OwnershipType, StateUsage};
use crate::warning::WarningKind;

/// Scope-wide requirements on the generated proof machinery
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementFlags {
    pub zk_snark_verification_required: bool,
    pub old_commitment_access_required: bool,
    pub nullifiers_required: bool,
    pub new_commitments_required: bool,
    pub initialisation_required: bool,
    pub contains_accessed_only_state: bool,
    pub encryption_required: bool,
    pub on_chain_key_registry: bool,
}

impl RequirementFlags {
    /// Requirements implied by one write to a secret state
    pub fn record_incrementation(&mut self, inc: &Incrementation) {
        if inc.is_overwrite() {
            self.new_commitments_required = true;
            self.initialisation_required = true;
            if !inc.reinitialisable {
                self.nullifiers_required = true;
                self.old_commitment_access_required = true;
            }
        } else if !inc.is_decremented {
            self.new_commitments_required = true;
        }
        if inc.is_decremented && !inc.known {
            self.nullifiers_required = true;
            self.new_commitments_required = true;
            self.old_commitment_access_required = true;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContractDefinitionIndicator {
    pub requirements: RequirementFlags,
}

#[derive(Debug, Clone)]
pub struct FunctionDefinitionIndicator {
    /// Scope of the enclosing contract
    pub contract: Option<ScopeId>,
    pub requirements: RequirementFlags,
    pub interacts_with_secret: bool,
    pub interacts_with_public: bool,
    pub internal_function_interacts_with_secret: bool,
    /// `msg.sender` has to be passed into the circuit as an input
    pub msg_sender_param: bool,
    pub state_variables: BTreeMap<DeclId, StateIndicatorId>,
    pub locals: BTreeMap<DeclId, LocalVariableIndicator>,
}

impl FunctionDefinitionIndicator {
    pub fn new(contract: Option<ScopeId>) -> Self {
        Self {
            contract,
            requirements: RequirementFlags::default(),
            interacts_with_secret: false,
            interacts_with_public: false,
            internal_function_interacts_with_secret: false,
            msg_sender_param: false,
            state_variables: BTreeMap::new(),
            locals: BTreeMap::new(),
        }
    }
}

/// How one function uses a parameter or local variable
#[derive(Debug, Clone)]
pub struct LocalVariableIndicator {
    pub decl_id: DeclId,
    pub name: String,
    pub node: NodeIdx,
    pub is_param: bool,
    pub initial_value: Option<NodeIdx>,
    pub is_referenced: bool,
    pub reference_count: usize,
    pub referencing_paths: Vec<NodeIdx>,
    pub is_modified: bool,
    pub modification_count: usize,
    pub modifying_paths: Vec<NodeIdx>,
    pub interacts_with: Vec<NodeIdx>,
    pub interacts_with_secret: bool,
    pub interacts_with_public: bool,
}

impl LocalVariableIndicator {
    pub fn new(decl_id: DeclId, name: String, node: NodeIdx, is_param: bool, initial_value: Option<NodeIdx>) -> Self {
        Self {
            decl_id,
            name,
            node,
            is_param,
            initial_value,
            is_referenced: false,
            reference_count: 0,
            referencing_paths: Vec::new(),
            is_modified: false,
            modification_count: 0,
            modifying_paths: Vec::new(),
            interacts_with: Vec::new(),
            interacts_with_secret: false,
            interacts_with_public: false,
        }
    }

    pub fn record_reference(&mut self, idx: NodeIdx, modification: bool) {
        self.is_referenced = true;
        if !self.referencing_paths.contains(&idx) {
            self.referencing_paths.push(idx);
            self.reference_count += 1;
        }
        if modification && !self.modifying_paths.contains(&idx) {
            self.is_modified = true;
            self.modifying_paths.push(idx);
            self.modification_count += 1;
        }
    }

    pub fn add_interacting_path(&mut self, idx: NodeIdx, secret: bool) {
        if secret {
            self.interacts_with_secret = true;
        } else {
            self.interacts_with_public = true;
        }
        if !self.interacts_with.contains(&idx) {
            self.interacts_with.push(idx);
        }
    }
}

/// How one function uses a state variable
#[derive(Debug, Clone)]
pub struct StateVariableIndicator {
    pub id: StateIndicatorId,
    /// The function scope
    pub scope: ScopeId,
    pub decl_id: DeclId,
    pub name: String,
    pub binding: BindingId,
    /// The state's declaration
    pub node: NodeIdx,
    pub is_mapping: bool,
    pub is_struct: bool,
    pub usage: StateUsage,
    pub mapping_keys: BTreeMap<String, MappingKeyId>,
    pub struct_properties: BTreeMap<String, MappingKeyId>,
    pub interacts_with: Vec<NodeIdx>,
    pub interacts_with_secret: bool,
    pub interacts_with_public: bool,
    pub old_commitment_access_required: bool,
}

impl StateVariableIndicator {
    pub fn mapping_ownership_type(&self) -> Option<OwnershipType> {
        self.usage.owner.as_ref().and_then(|o| o.mapping_ownership_type)
    }
}

impl CompilationContext {
    /// The requirement flags of a contract or function scope
    pub(crate) fn requirements_mut(&mut self, scope: ScopeId) -> Option<&mut RequirementFlags> {
        match &mut self.scope_mut(scope).indicators {
            ScopeIndicators::Function(f) => Some(&mut f.requirements),
            ScopeIndicators::Contract(c) => Some(&mut c.requirements),
            ScopeIndicators::None => None,
        }
    }

    pub fn requirements(&self, scope: ScopeId) -> Option<&RequirementFlags> {
        match &self.scope(scope).indicators {
            ScopeIndicators::Function(f) => Some(&f.requirements),
            ScopeIndicators::Contract(c) => Some(&c.requirements),
            ScopeIndicators::None => None,
        }
    }

    /// Apply `update` to a function's flags and to its contract's
    fn update_requirements(&mut self, function: ScopeId, update: impl Fn(&mut RequirementFlags)) {
        let contract = self.scope(function).function_indicator().and_then(|f| f.contract);
        for scope in std::iter::once(function).chain(contract) {
            if let Some(flags) = self.requirements_mut(scope) {
                update(flags);
            }
        }
    }

    pub fn state_indicator_in(&self, scope: ScopeId, decl: DeclId) -> Option<StateIndicatorId> {
        self.scope(scope)
            .function_indicator()
            .and_then(|f| f.state_variables.get(&decl).copied())
    }

    /// The indicator of the state a reference names, in its own function
    pub fn referenced_indicator(&self, idx: NodeIdx) -> Option<StateIndicatorId> {
        let decl = self.path(idx).referenced_declaration()?;
        let function = self.enclosing_scope(idx, crate::scope::ScopeKind::Function)?;
        self.state_indicator_in(function, decl)
    }

    /// The function's indicator for a state variable, created on first use
    pub(crate) fn ensure_state_indicator(&mut self, function: ScopeId, binding: BindingId) -> StateIndicatorId {
        let b = self.binding(binding);
        if let Some(existing) = self.state_indicator_in(function, b.decl_id) {
            return existing;
        }
        let id = StateIndicatorId(self.state_indicators.len() as u32);
        let indicator = StateVariableIndicator {
            id,
            scope: function,
            decl_id: b.decl_id,
            name: b.name.clone(),
            binding,
            node: b.node,
            is_mapping: b.is_mapping,
            is_struct: b.is_struct,
            usage: StateUsage::new(b.is_secret()),
            mapping_keys: BTreeMap::new(),
            struct_properties: BTreeMap::new(),
            interacts_with: Vec::new(),
            interacts_with_secret: false,
            interacts_with_public: false,
            old_commitment_access_required: false,
        };
        debug!(state = %indicator.name, function = %self.scope(function).name, "new state indicator");
        let decl = indicator.decl_id;
        self.state_indicators.push(indicator);
        if let Some(f) = self.scope_mut(function).function_indicator_mut() {
            f.state_variables.insert(decl, id);
        }
        id
    }

    /// Every key an indicator holds, at any depth
    fn all_keys(&self, holder: Holder) -> Vec<MappingKeyId> {
        let mut keys = Vec::new();
        let mut pending = self.held_keys(holder);
        while let Some(key) = pending.pop() {
            pending.extend(self.held_keys(Holder::Key(key)));
            keys.push(key);
        }
        keys
    }

    /// Classify one write within the indicator's function
    pub(crate) fn indicator_update_incrementation(
        &mut self,
        sid: StateIndicatorId,
        inc: &Incrementation,
    ) -> Result<(), AnalysisError> {
        let (scope, secret) = {
            let indicator = self.state_indicator(sid);
            (indicator.scope, indicator.usage.is_secret)
        };
        if secret {
            self.update_requirements(scope, |flags| flags.record_incrementation(inc));
        }
        let src = self.node(inc.target).src;
        self.update_routed(Holder::Indicator(sid), inc.target_identifier, |usage| {
            usage.record_incrementation(inc, src)
        })?;
        if inc.needs_nullifier() {
            self.indicator_add_nullifying_path(sid, inc.target_identifier)?;
        }
        Ok(())
    }

    /// The one place nullifying paths are recorded: the indicator, its keys,
    /// its function and the binding all learn about it together
    pub(crate) fn indicator_add_nullifying_path(
        &mut self,
        sid: StateIndicatorId,
        ident: NodeIdx,
    ) -> Result<(), AnalysisError> {
        self.update_routed(Holder::Indicator(sid), ident, |usage| usage.add_nullifying_path(ident))?;
        let indicator = self.state_indicator_mut(sid);
        indicator.old_commitment_access_required = true;
        let (scope, binding) = (indicator.scope, indicator.binding);
        self.update_requirements(scope, |flags| flags.nullifiers_required = true);
        self.binding_add_nullifying_path(binding, ident)
    }

    pub(crate) fn indicator_add_burning_path(&mut self, sid: StateIndicatorId, ident: NodeIdx) -> Result<(), AnalysisError> {
        self.update_routed(Holder::Indicator(sid), ident, |usage| usage.add_burning_path(ident))
    }

    /// The state is opened without being overwritten
    pub(crate) fn indicator_update_accessed(&mut self, sid: StateIndicatorId, ident: NodeIdx) -> Result<(), AnalysisError> {
        let src = self.node(ident).src;
        self.update_routed(Holder::Indicator(sid), ident, |usage| usage.add_accessed_path(ident, src))?;
        let indicator = self.state_indicator_mut(sid);
        indicator.old_commitment_access_required = true;
        let (scope, binding, modified) = (indicator.scope, indicator.binding, indicator.usage.is_modified);
        self.update_requirements(scope, |flags| {
            flags.old_commitment_access_required = true;
            if !modified {
                flags.contains_accessed_only_state = true;
            }
        });
        if let Some(flags) = self.requirements_mut(scope) {
            flags.initialisation_required = true;
        }
        self.binding_update_accessed(binding, ident)
    }

    pub(crate) fn indicator_add_interacting_path(&mut self, sid: StateIndicatorId, idx: NodeIdx, secret: bool) {
        let indicator = self.state_indicator_mut(sid);
        if secret {
            indicator.interacts_with_secret = true;
        } else {
            indicator.interacts_with_public = true;
        }
        if !indicator.interacts_with.contains(&idx) {
            indicator.interacts_with.push(idx);
        }
    }

    /// Validate an indicator and its keys. Needless `known` decorators on
    /// either are reported here as pedantic warnings.
    pub(crate) fn indicator_prelim_checks(&mut self, sid: StateIndicatorId) -> Result<(), AnalysisError> {
        let indicator = self.state_indicator(sid);
        if !indicator.usage.is_secret {
            return Ok(());
        }
        let node = self.node(indicator.node);
        let mut advice = Vec::new();
        for key in self.all_keys(Holder::Indicator(sid)) {
            let key = self.mapping_key(key);
            advice.extend(key.usage.prelim_check(&key.name, node)?);
        }
        advice.extend(indicator.usage.prelim_check(&indicator.name, node)?);
        let src = node.src;
        for text in advice {
            self.warn(WarningKind::Pedantic, text, Some(src));
        }
        Ok(())
    }

    /// Reconcile a function's view of a state with everything the binding
    /// learned across the contract
    pub(crate) fn indicator_update_from_binding(&mut self, sid: StateIndicatorId) -> Result<(), AnalysisError> {
        let indicator = self.state_indicator(sid);
        let binding = self.binding(indicator.binding);
        let reinitialisable = binding.usage.reinitialisable || indicator.usage.reinitialisable;
        if binding.usage.is_whole && indicator.usage.is_modified && !reinitialisable {
            let missing: Vec<_> = indicator
                .usage
                .modifying_paths
                .iter()
                .filter(|p| {
                    !indicator.usage.nullifying_paths.contains(p) && !indicator.usage.burning_paths.contains(p)
                })
                .copied()
                .collect();
            for path in missing {
                self.indicator_add_nullifying_path(sid, path)?;
            }
        }

        let binding_id = self.state_indicator(sid).binding;
        let wider = self.binding(binding_id).usage.clone();
        self.state_indicator_mut(sid).usage.inherit(&wider);
        for key in self.all_keys(Holder::Indicator(sid)) {
            if let Some(counterpart) = self.counterpart_key(Holder::Binding(binding_id), key) {
                let wider = self.mapping_key(counterpart).usage.clone();
                self.mapping_key_mut(key).usage.inherit(&wider);
            }
        }
        let scope = self.state_indicator(sid).scope;
        if let Some(flags) = self.requirements_mut(scope) {
            flags.on_chain_key_registry |= wider.on_chain_key_registry;
        }
        Ok(())
    }

    /// Decide whether this function emits new commitments of the state
    pub(crate) fn indicator_update_new_commitments(&mut self, sid: StateIndicatorId) -> Result<(), AnalysisError> {
        let indicator = self.state_indicator(sid);
        let usage = &indicator.usage;
        if !usage.is_secret {
            return Ok(());
        }
        let scope = indicator.scope;
        if !usage.is_burned && usage.is_modified {
            self.state_indicator_mut(sid).usage.new_commitments_required = true;
            for key in self.all_keys(Holder::Indicator(sid)) {
                self.mapping_key_mut(key).usage.new_commitments_required = true;
            }
            if let Some(flags) = self.requirements_mut(scope) {
                flags.new_commitments_required = true;
            }
            return Ok(());
        }
        if !usage.is_burned {
            return Ok(());
        }

        let edits: Vec<_> = usage
            .modifying_paths
            .iter()
            .filter(|p| !usage.burning_paths.contains(p))
            .copied()
            .collect();
        let message = format!(
            "The state {} is being burned (ownership is being revoked and the state ready for reset) and edited in the same scope ({}). That edit may be useless and the output commmitment scheme may not work. Make sure you know what you're doing here.",
            indicator.name,
            self.scope(scope).name
        );
        for edit in &edits {
            let src = self.node(*edit).src;
            self.warn(WarningKind::BurnAndEdit, message.clone(), Some(src));
            self.update_routed(Holder::Indicator(sid), *edit, |usage| usage.new_commitments_required = true)?;
            if let Some(flags) = self.requirements_mut(scope) {
                flags.new_commitments_required = true;
            }
        }
        self.state_indicator_mut(sid).usage.new_commitments_required = !edits.is_empty();
        Ok(())
    }

    /// A function whose secret states are all burned and never re-committed
    /// emits no new commitments at all
    pub(crate) fn function_update_new_commitments(&mut self, function: ScopeId) {
        let Some(f) = self.scope(function).function_indicator() else {
            return;
        };
        let burned_only = f.state_variables.values().all(|sid| {
            let usage = &self.state_indicator(*sid).usage;
            !usage.is_secret || (usage.is_burned && !usage.new_commitments_required)
        });
        if let Some(flags) = self.requirements_mut(function) {
            flags.new_commitments_required = !burned_only;
        }
    }

    /// Whether the owner needs the new commitment's preimage sent to them
    pub(crate) fn update_encryption(&mut self, sid: StateIndicatorId) {
        let encrypt_all = self.options.encrypt_all_new_commitments;
        let usage = &self.state_indicator(sid).usage;
        if !usage.is_secret || !usage.new_commitments_required {
            return;
        }
        let only_decremented = usage.is_partitioned && usage.increments.is_empty() && !usage.decrements.is_empty();
        if only_decremented || usage.burned_everywhere() {
            return;
        }
        let foreign_owner = usage.owner.as_ref().map_or(false, |o| !o.is_msg_sender());
        if !foreign_owner && !encrypt_all {
            return;
        }
        debug!(state = %self.state_indicator(sid).name, "encryption required");
        self.state_indicator_mut(sid).usage.encryption_required = true;
        for key in self.all_keys(Holder::Indicator(sid)) {
            let usage = &mut self.mapping_key_mut(key).usage;
            usage.encryption_required |= usage.new_commitments_required;
        }
        let scope = self.state_indicator(sid).scope;
        self.update_requirements(scope, |flags| flags.encryption_required = true);
        let binding = self.state_indicator(sid).binding;
        self.binding_mut(binding).usage.encryption_required = true;
    }
}
