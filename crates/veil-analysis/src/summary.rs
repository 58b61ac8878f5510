//! What a finished analysis hands back
//!
//! The annotated tree is a copy of the input with every recorded fact written
//! onto its node. The summary is the per-contract view later stages consume.

use serde::Serialize;
use serde_json::{Map, Value};
use veil_ast::NodeIdx;

use crate::binding::{Binding, BindingKind};
use crate::context::{CompilationContext, ScopeId};
use crate::indicator::RequirementFlags;
use crate::mapping_key::Holder;
use crate::scope::ScopeKind;
use crate::usage::StateUsage;
use crate::warning::Warning;

/// A completed analysis
#[derive(Debug)]
pub struct Analysis {
    ctx: CompilationContext,
}

impl Analysis {
    pub(crate) fn new(ctx: CompilationContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &CompilationContext {
        &self.ctx
    }

    pub fn into_context(self) -> CompilationContext {
        self.ctx
    }

    pub fn warnings(&self) -> &[Warning] {
        self.ctx.warnings()
    }

    /// The input document with each node's facts written onto it. Only facts
    /// that hold are written; absent keys mean `false`.
    pub fn annotated_json(&self) -> Value {
        let mut document = self.ctx.ast().document().clone();
        for node in self.ctx.ast().iter() {
            let Some(Value::Object(target)) = document.pointer_mut(&node.pointer) else {
                continue;
            };
            for (key, value) in self.annotations(node.idx) {
                target.insert(key, value);
            }
        }
        document
    }

    fn annotations(&self, idx: NodeIdx) -> Map<String, Value> {
        let mut out = Map::new();
        if let Ok(Value::Object(facts)) = serde_json::to_value(self.ctx.facts(idx)) {
            out.extend(
                facts
                    .into_iter()
                    .filter(|(_, v)| !matches!(v, Value::Null | Value::Bool(false))),
            );
        }
        let decorations = self.ctx.decorations(idx);
        for (key, set) in [
            ("isKnown", decorations.is_known),
            ("isUnknown", decorations.is_unknown),
            ("reinitialisable", decorations.reinitialisable),
        ] {
            if set {
                out.insert(key.to_string(), Value::Bool(true));
            }
        }
        out
    }

    pub fn summary(&self) -> AnalysisSummary {
        let ctx = &self.ctx;
        let contracts = ctx
            .scopes()
            .iter()
            .filter(|s| s.kind == ScopeKind::Contract)
            .map(|contract| ContractSummary {
                name: contract.name.clone(),
                requirements: contract
                    .contract_indicator()
                    .map(|c| c.requirements)
                    .unwrap_or_default(),
                functions: ctx
                    .scopes()
                    .iter()
                    .filter(|s| {
                        s.function_indicator()
                            .map_or(false, |f| f.contract == Some(contract.id))
                    })
                    .map(|function| function_summary(ctx, function.id))
                    .collect(),
            })
            .collect();
        let secret_states = ctx
            .bindings()
            .iter()
            .filter(|b| b.kind == BindingKind::Variable && b.is_secret_state())
            .map(|b| binding_summary(ctx, b))
            .collect();
        AnalysisSummary {
            contracts,
            secret_states,
            warnings: self.warnings().to_vec(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSummary {
    pub contracts: Vec<ContractSummary>,
    pub secret_states: Vec<SecretStateSummary>,
    pub warnings: Vec<Warning>,
}

impl AnalysisSummary {
    pub fn contract(&self, name: &str) -> Option<&ContractSummary> {
        self.contracts.iter().find(|c| c.name == name)
    }

    pub fn secret_state(&self, name: &str) -> Option<&SecretStateSummary> {
        self.secret_states.iter().find(|s| s.name == name)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractSummary {
    pub name: String,
    pub requirements: RequirementFlags,
    pub functions: Vec<FunctionSummary>,
}

impl ContractSummary {
    pub fn function(&self, name: &str) -> Option<&FunctionSummary> {
        self.functions.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionSummary {
    pub name: String,
    pub requirements: RequirementFlags,
    pub interacts_with_secret: bool,
    pub interacts_with_public: bool,
    pub msg_sender_param: bool,
    pub states: Vec<StateSummary>,
}

impl FunctionSummary {
    pub fn state(&self, name: &str) -> Option<&StateSummary> {
        self.states.iter().find(|s| s.name == name)
    }
}

/// How one function uses one state
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSummary {
    pub name: String,
    pub is_secret: bool,
    pub is_whole: bool,
    pub is_partitioned: bool,
    pub owner: Option<String>,
    pub increments: usize,
    pub decrements: usize,
    pub is_nullified: bool,
    pub is_accessed: bool,
    pub is_burned: bool,
    pub new_commitments_required: bool,
    pub encryption_required: bool,
    /// Canonical names, e.g. `balances[msg.sender]`
    pub mapping_keys: Vec<String>,
}

/// Facts about a secret state gathered across every function
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretStateSummary {
    pub name: String,
    pub contract: String,
    pub is_whole: bool,
    pub whole_reasons: Vec<String>,
    pub is_partitioned: bool,
    pub partitioned_reasons: Vec<String>,
    pub is_known: bool,
    pub is_unknown: bool,
    pub reinitialisable: bool,
    pub is_owned: bool,
    pub owner: Option<String>,
    pub on_chain_key_registry: bool,
    pub is_burned: bool,
    pub mapping_keys: Vec<String>,
}

fn key_names(ctx: &CompilationContext, holder: Holder) -> Vec<String> {
    ctx.held_keys(holder)
        .into_iter()
        .map(|k| ctx.mapping_key(k).name.clone())
        .collect()
}

fn owner_name(usage: &StateUsage) -> Option<String> {
    usage.owner.as_ref().map(|o| {
        if o.is_msg_sender() {
            "msg.sender".to_string()
        } else {
            o.name.clone()
        }
    })
}

fn function_summary(ctx: &CompilationContext, id: ScopeId) -> FunctionSummary {
    let scope = ctx.scope(id);
    let Some(indicator) = scope.function_indicator() else {
        return FunctionSummary {
            name: scope.name.clone(),
            requirements: RequirementFlags::default(),
            interacts_with_secret: false,
            interacts_with_public: false,
            msg_sender_param: false,
            states: Vec::new(),
        };
    };
    let states = indicator
        .state_variables
        .values()
        .map(|&sid| {
            let state = ctx.state_indicator(sid);
            let usage = &state.usage;
            StateSummary {
                name: state.name.clone(),
                is_secret: usage.is_secret,
                is_whole: usage.is_whole,
                is_partitioned: usage.is_partitioned,
                owner: owner_name(usage),
                increments: usage.increments.len(),
                decrements: usage.decrements.len(),
                is_nullified: usage.is_nullified,
                is_accessed: usage.is_accessed,
                is_burned: usage.is_burned,
                new_commitments_required: usage.new_commitments_required,
                encryption_required: usage.encryption_required,
                mapping_keys: key_names(ctx, Holder::Indicator(sid)),
            }
        })
        .collect();
    FunctionSummary {
        name: scope.name.clone(),
        requirements: indicator.requirements,
        interacts_with_secret: indicator.interacts_with_secret,
        interacts_with_public: indicator.interacts_with_public,
        msg_sender_param: indicator.msg_sender_param,
        states,
    }
}

fn binding_summary(ctx: &CompilationContext, binding: &Binding) -> SecretStateSummary {
    let usage = &binding.usage;
    let contract = ctx
        .scope_ancestor_of_kind(binding.scope, ScopeKind::Contract)
        .map(|c| ctx.scope(c).name.clone())
        .unwrap_or_default();
    SecretStateSummary {
        name: binding.name.clone(),
        contract,
        is_whole: usage.is_whole,
        whole_reasons: usage.whole_reasons.iter().map(|r| r.text.clone()).collect(),
        is_partitioned: usage.is_partitioned,
        partitioned_reasons: usage
            .partitioned_reasons
            .iter()
            .map(|r| r.text.clone())
            .collect(),
        is_known: usage.is_known,
        is_unknown: usage.is_unknown,
        reinitialisable: usage.reinitialisable,
        is_owned: usage.is_owned,
        owner: owner_name(usage),
        on_chain_key_registry: usage.on_chain_key_registry,
        is_burned: usage.is_burned,
        mapping_keys: key_names(ctx, Holder::Binding(binding.id)),
    }
}
