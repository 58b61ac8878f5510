//! Usage facts shared by bindings, mapping keys and state indicators
//!
//! All three record the same kind of information at different granularity:
//! a binding for a declaration everywhere, a mapping key for one slot, an
//! indicator for one function. Every flag here only ever goes from `false`
//! to `true`.

use serde::Serialize;
use veil_ast::{Decorations, Node, NodeIdx, Src};

use crate::error::{AnalysisError, Reason};
use crate::incrementation::Incrementation;

/// Whether a mapping's owner is its key or its stored value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnershipType {
    Key,
    Value,
}

/// The party whose key opens and nullifies a secret state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Owner {
    pub node: NodeIdx,
    /// `msg` for `msg.sender`, otherwise the owner expression as written
    pub name: String,
    pub mapping_ownership_type: Option<OwnershipType>,
    pub is_param: bool,
    pub is_secret: bool,
    pub is_address: bool,
}

impl Owner {
    pub fn is_msg_sender(&self) -> bool {
        self.name == "msg"
    }
}

#[derive(Debug, Clone, Default)]
pub struct StateUsage {
    pub is_secret: bool,

    pub is_referenced: bool,
    pub reference_count: usize,
    pub referencing_paths: Vec<NodeIdx>,
    pub is_modified: bool,
    pub modification_count: usize,
    pub modifying_paths: Vec<NodeIdx>,
    pub is_nullified: bool,
    pub nullification_count: usize,
    pub nullifying_paths: Vec<NodeIdx>,
    pub is_burned: bool,
    pub burning_paths: Vec<NodeIdx>,
    pub is_accessed: bool,
    pub accessed_paths: Vec<NodeIdx>,

    pub is_incremented: bool,
    pub is_decremented: bool,
    pub increments: Vec<NodeIdx>,
    pub decrements: Vec<NodeIdx>,

    pub is_known: bool,
    pub is_unknown: bool,
    pub reinitialisable: bool,

    pub is_whole: bool,
    pub whole_reasons: Vec<Reason>,
    pub is_partitioned: bool,
    pub partitioned_reasons: Vec<Reason>,

    pub is_owned: bool,
    pub owner: Option<Owner>,
    pub on_chain_key_registry: bool,
    pub new_commitments_required: bool,
    pub encryption_required: bool,
}

fn push_unique(paths: &mut Vec<NodeIdx>, idx: NodeIdx) -> bool {
    if paths.contains(&idx) {
        return false;
    }
    paths.push(idx);
    true
}

impl StateUsage {
    pub fn new(is_secret: bool) -> Self {
        Self {
            is_secret,
            ..Self::default()
        }
    }

    /// Record one reference, with the decorations visible at that node
    pub fn record_reference(&mut self, idx: NodeIdx, decorations: Decorations, modification: bool) {
        self.is_referenced = true;
        if push_unique(&mut self.referencing_paths, idx) {
            self.reference_count += 1;
        }
        self.is_known |= decorations.is_known;
        self.is_unknown |= decorations.is_unknown;
        self.reinitialisable |= decorations.reinitialisable;
        if modification {
            self.add_modifying_path(idx);
        }
    }

    pub fn add_modifying_path(&mut self, idx: NodeIdx) {
        self.is_modified = true;
        if push_unique(&mut self.modifying_paths, idx) {
            self.modification_count += 1;
        }
    }

    pub fn add_nullifying_path(&mut self, idx: NodeIdx) {
        self.is_nullified = true;
        if push_unique(&mut self.nullifying_paths, idx) {
            self.nullification_count += 1;
        }
    }

    pub fn add_burning_path(&mut self, idx: NodeIdx) {
        self.is_burned = true;
        push_unique(&mut self.burning_paths, idx);
    }

    /// The state is read: it has to be whole
    pub fn add_accessed_path(&mut self, idx: NodeIdx, src: Src) {
        self.is_accessed = true;
        push_unique(&mut self.accessed_paths, idx);
        self.mark_whole(Reason::new(src, "Accessed"));
    }

    pub fn mark_whole(&mut self, reason: Reason) {
        self.is_whole = true;
        if !self.whole_reasons.contains(&reason) {
            self.whole_reasons.push(reason);
        }
    }

    pub fn mark_partitioned(&mut self, reason: Reason) {
        self.is_partitioned = true;
        if !self.partitioned_reasons.contains(&reason) {
            self.partitioned_reasons.push(reason);
        }
    }

    /// Classify one write. Overwrites and known increments make the state
    /// whole; increments marked unknown make it partitioned.
    pub fn record_incrementation(&mut self, inc: &Incrementation, src: Src) {
        if inc.is_overwrite() {
            self.mark_whole(Reason::new(src, inc.whole_reason()));
        } else if inc.is_unknown_increment() {
            self.mark_partitioned(Reason::new(src, "Incremented and marked as unknown"));
            self.is_unknown = true;
        }
        self.is_incremented |= inc.is_incremented;
        self.is_decremented |= inc.is_decremented;
        self.is_known |= inc.known;
        self.increments.extend(inc.increments.iter().copied());
        self.decrements.extend(inc.decrements.iter().copied());
    }

    /// Every modification of this state burns it
    pub fn burned_everywhere(&self) -> bool {
        self.is_burned
            && self
                .modifying_paths
                .iter()
                .all(|p| self.burning_paths.contains(p))
    }

    /// Take over classification facts from a wider record that this one
    /// hasn't established itself
    pub fn inherit(&mut self, wider: &StateUsage) {
        if !self.is_whole && !self.is_partitioned {
            if wider.is_whole {
                self.is_whole = true;
                self.whole_reasons = wider.whole_reasons.clone();
            }
            if wider.is_partitioned {
                self.is_partitioned = true;
                self.partitioned_reasons = wider.partitioned_reasons.clone();
            }
        }
        if !self.is_owned && wider.is_owned {
            self.is_owned = true;
            self.owner = wider.owner.clone();
        }
        self.on_chain_key_registry |= wider.on_chain_key_registry;
    }

    /// Validate the classification once every use is known.
    ///
    /// Returns the pedantic advisory for a needless `known`, if any.
    pub fn prelim_check(&self, name: &str, node: &Node) -> Result<Option<String>, AnalysisError> {
        if !self.is_secret {
            return Ok(None);
        }
        if self.is_incremented
            && !self.is_decremented
            && !self.is_whole
            && !self.is_partitioned
            && !self.is_known
            && !self.is_unknown
        {
            return Err(AnalysisError::syntax_usage(
                format!(
                    "Secret state '{}' incremented, but known-ness unknown. Please let us know the known-ness by specifying known/unknown, and if you don't know, let us know.",
                    name
                ),
                node,
            ));
        }
        if self.is_unknown && self.is_whole {
            return Err(
                AnalysisError::syntax_usage("Can't mark a whole state as 'unknown'", node)
                    .with_reasons(self.whole_reasons.iter().cloned()),
            );
        }
        if self.reinitialisable && self.is_partitioned {
            return Err(AnalysisError::syntax_usage(
                "Can't mark a partitioned state as 'reinitialisable' - partitioned states do not need nullifiers to initialise/add to, so there's no need for this syntax.",
                node,
            )
            .with_reasons(self.partitioned_reasons.iter().cloned()));
        }
        if self.is_whole && self.is_partitioned {
            return Err(AnalysisError::syntax_usage(
                "State cannot be whole and partitioned. The following reasons conflict.",
                node,
            )
            .with_reasons(
                self.whole_reasons
                    .iter()
                    .chain(&self.partitioned_reasons)
                    .cloned(),
            ));
        }
        if self.is_known && self.is_whole && !self.is_incremented {
            let reasons: Vec<_> = self.whole_reasons.iter().map(|r| r.text.as_str()).collect();
            return Ok(Some(format!(
                "PEDANTIC: Unnecessary 'known' decorator. Secret state '{}' is trivially 'known' because it is 'whole', due to: {}",
                name,
                reasons.join(", ")
            )));
        }
        Ok(None)
    }
}
