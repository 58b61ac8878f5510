//! Mapping keys and struct properties
//!
//! A [`MappingKey`] refines a mapping- or struct-typed state to one slot
//! (`balances[msg.sender]`) or member (`accounts[a].owner`). Keys are only
//! ever created through their holder, and the canonical key name is the
//! identity of the slot: two accesses producing the same name share a key.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;
use veil_ast::{DeclId, Field, NodeIdx, NodeType};

use crate::context::{BindingId, CompilationContext, MappingKeyId, StateIndicatorId};
use crate::error::AnalysisError;
use crate::usage::StateUsage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyKind {
    MappingKey,
    StructProperty,
}

/// Something that owns mapping keys or struct properties
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Holder {
    Binding(BindingId),
    Indicator(StateIndicatorId),
    /// A mapping key whose value is a struct
    Key(MappingKeyId),
}

#[derive(Debug, Clone)]
pub struct MappingKey {
    pub id: MappingKeyId,
    pub kind: KeyKind,
    /// Canonical display name, e.g. `balances[msg.sender]`
    pub name: String,
    /// Name within the holder's table: `msg`, `k`, `k_1`, or a member name
    pub key_name: String,
    pub container: Holder,
    /// The key expression, or the member access for a struct property
    pub key_path: NodeIdx,
    pub referenced_key: Option<DeclId>,
    pub referenced_key_is_param: bool,
    pub is_msg_sender: bool,
    /// A mapping key whose struct value has properties of its own
    pub is_parent: bool,
    /// A struct property reached through a mapping key
    pub is_child: bool,
    pub struct_properties: BTreeMap<String, MappingKeyId>,
    pub usage: StateUsage,
}

impl MappingKey {
    pub fn is_nullifiable(&self) -> bool {
        self.usage.is_nullified
    }
}

/// Render a key expression the way it appears in canonical names
pub fn render_key(ctx: &CompilationContext, idx: NodeIdx) -> Result<String, AnalysisError> {
    let ast = ctx.ast();
    let path = ctx.path(idx);
    let node = path.node();
    if path.is_msg_sender() {
        return Ok("msg".to_string());
    }
    let malformed = |field: Field| AnalysisError::MalformedPath {
        detail: format!("{} without '{}'", node.node_type, field),
        node: idx,
        src: node.src,
    };
    match node.node_type {
        NodeType::Identifier => Ok(node.name().to_string()),
        NodeType::Literal => Ok(node.value.clone().unwrap_or_default()),
        NodeType::MemberAccess => {
            let receiver = ast
                .child(idx, Field::Expression)
                .ok_or_else(|| malformed(Field::Expression))?;
            Ok(format!(
                "{}.{}",
                render_key(ctx, receiver)?,
                node.member_name.as_deref().unwrap_or_default()
            ))
        }
        NodeType::IndexAccess => {
            let base = ast
                .child(idx, Field::BaseExpression)
                .ok_or_else(|| malformed(Field::BaseExpression))?;
            let index = ast
                .child(idx, Field::IndexExpression)
                .ok_or_else(|| malformed(Field::IndexExpression))?;
            Ok(format!("{}[{}]", render_key(ctx, base)?, render_key(ctx, index)?))
        }
        NodeType::FunctionCall if path.is_type_conversion() => {
            let args = ast
                .list(idx, Field::Arguments)
                .into_iter()
                .map(|arg| render_key(ctx, arg))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(format!("{}({})", node.type_string(), args.join(", ")))
        }
        other => Err(AnalysisError::todo(
            format!(
                "A mapping key of nodeType '{}' isn't supported yet. We've only written the code for identifiers, literals, member accesses and type conversions.",
                other
            ),
            node,
        )),
    }
}

/// The table name of the key used by `access`.
///
/// A key variable reassigned earlier in the same function names a new slot:
/// the name gets the count of those earlier writes as a suffix (`k_1`).
/// Writes are counted in traversal order, so a write on either branch of a
/// conditional counts.
pub fn mapping_key_name(ctx: &CompilationContext, access: NodeIdx) -> Result<String, AnalysisError> {
    let ast = ctx.ast();
    let index = ast
        .child(access, Field::IndexExpression)
        .ok_or_else(|| AnalysisError::MalformedPath {
            detail: "IndexAccess without 'indexExpression'".to_string(),
            node: access,
            src: ast.node(access).src,
        })?;
    let rendered = render_key(ctx, index)?;
    if ast.node_type(index) != NodeType::Identifier {
        return Ok(rendered);
    }
    let (Some(binding), Some(function)) = (
        ctx.referenced_binding(index),
        ctx.path(access).function_definition(),
    ) else {
        return Ok(rendered);
    };
    let earlier_writes = ctx
        .binding(binding)
        .usage
        .modifying_paths
        .iter()
        .filter(|m| **m < access && ast.is_within(**m, function.idx()))
        .count();
    Ok(match earlier_writes {
        0 => rendered,
        n => format!("{}_{}", rendered, n),
    })
}

impl CompilationContext {
    pub fn holder_usage(&self, holder: Holder) -> &StateUsage {
        match holder {
            Holder::Binding(id) => &self.binding(id).usage,
            Holder::Indicator(id) => &self.state_indicator(id).usage,
            Holder::Key(id) => &self.mapping_key(id).usage,
        }
    }

    pub(crate) fn holder_usage_mut(&mut self, holder: Holder) -> &mut StateUsage {
        match holder {
            Holder::Binding(id) => &mut self.binding_mut(id).usage,
            Holder::Indicator(id) => &mut self.state_indicator_mut(id).usage,
            Holder::Key(id) => &mut self.mapping_key_mut(id).usage,
        }
    }

    pub fn holder_name(&self, holder: Holder) -> &str {
        match holder {
            Holder::Binding(id) => &self.binding(id).name,
            Holder::Indicator(id) => &self.state_indicator(id).name,
            Holder::Key(id) => &self.mapping_key(id).name,
        }
    }

    /// (is a mapping, holds structs)
    fn holder_shape(&self, holder: Holder) -> (bool, bool) {
        match holder {
            Holder::Binding(id) => {
                let b = self.binding(id);
                (b.is_mapping, b.is_struct)
            }
            Holder::Indicator(id) => {
                let i = self.state_indicator(id);
                (i.is_mapping, i.is_struct)
            }
            Holder::Key(id) => {
                let k = self.mapping_key(id);
                (false, k.kind == KeyKind::MappingKey && self.holder_shape(k.container).1)
            }
        }
    }

    pub fn holder_keys(&self, holder: Holder, kind: KeyKind) -> Option<&BTreeMap<String, MappingKeyId>> {
        match (holder, kind) {
            (Holder::Binding(id), KeyKind::MappingKey) => Some(&self.binding(id).mapping_keys),
            (Holder::Binding(id), KeyKind::StructProperty) => Some(&self.binding(id).struct_properties),
            (Holder::Indicator(id), KeyKind::MappingKey) => Some(&self.state_indicator(id).mapping_keys),
            (Holder::Indicator(id), KeyKind::StructProperty) => {
                Some(&self.state_indicator(id).struct_properties)
            }
            (Holder::Key(id), KeyKind::StructProperty) => Some(&self.mapping_key(id).struct_properties),
            (Holder::Key(_), KeyKind::MappingKey) => None,
        }
    }

    fn holder_keys_mut(
        &mut self,
        holder: Holder,
        kind: KeyKind,
    ) -> Option<&mut BTreeMap<String, MappingKeyId>> {
        match (holder, kind) {
            (Holder::Binding(id), KeyKind::MappingKey) => Some(&mut self.binding_mut(id).mapping_keys),
            (Holder::Binding(id), KeyKind::StructProperty) => {
                Some(&mut self.binding_mut(id).struct_properties)
            }
            (Holder::Indicator(id), KeyKind::MappingKey) => {
                Some(&mut self.state_indicator_mut(id).mapping_keys)
            }
            (Holder::Indicator(id), KeyKind::StructProperty) => {
                Some(&mut self.state_indicator_mut(id).struct_properties)
            }
            (Holder::Key(id), KeyKind::StructProperty) => {
                Some(&mut self.mapping_key_mut(id).struct_properties)
            }
            (Holder::Key(_), KeyKind::MappingKey) => None,
        }
    }

    /// Every key directly held, mapping keys first
    pub fn held_keys(&self, holder: Holder) -> Vec<MappingKeyId> {
        [KeyKind::MappingKey, KeyKind::StructProperty]
            .into_iter()
            .filter_map(|kind| self.holder_keys(holder, kind))
            .flat_map(|keys| keys.values().copied())
            .collect()
    }

    /// Find or create the key `access` uses
    pub(crate) fn add_mapping_key(&mut self, holder: Holder, access: NodeIdx) -> Result<MappingKeyId, AnalysisError> {
        let key_name = mapping_key_name(self, access)?;
        if let Some(id) = self
            .holder_keys(holder, KeyKind::MappingKey)
            .and_then(|keys| keys.get(&key_name))
        {
            return Ok(*id);
        }
        let index = self
            .ast()
            .child(access, Field::IndexExpression)
            .ok_or(AnalysisError::MissingPath { node: access })?;
        let key_path = self.path(index);
        let is_msg_sender = key_path.is_msg_sender();
        let referenced_key = match key_path.node_type() {
            NodeType::Identifier => key_path.referenced_declaration(),
            _ => None,
        };
        let name = format!(
            "{}[{}]",
            self.holder_name(holder),
            if is_msg_sender { "msg.sender" } else { &key_name }
        );
        let key = MappingKey {
            id: MappingKeyId(self.mapping_keys.len() as u32),
            kind: KeyKind::MappingKey,
            name,
            key_name: key_name.clone(),
            container: holder,
            key_path: index,
            referenced_key,
            referenced_key_is_param: key_path.is_function_parameter(),
            is_msg_sender,
            is_parent: false,
            is_child: false,
            struct_properties: BTreeMap::new(),
            usage: StateUsage::new(self.holder_usage(holder).is_secret),
        };
        Ok(self.insert_key(holder, key))
    }

    /// Find or create the property `member_access` reads
    pub(crate) fn add_struct_property(&mut self, holder: Holder, member_access: NodeIdx) -> MappingKeyId {
        let member = self
            .node(member_access)
            .member_name
            .clone()
            .unwrap_or_default();
        if let Some(id) = self
            .holder_keys(holder, KeyKind::StructProperty)
            .and_then(|keys| keys.get(&member))
        {
            return *id;
        }
        let key = MappingKey {
            id: MappingKeyId(self.mapping_keys.len() as u32),
            kind: KeyKind::StructProperty,
            name: format!("{}.{}", self.holder_name(holder), member),
            key_name: member,
            container: holder,
            key_path: member_access,
            referenced_key: None,
            referenced_key_is_param: false,
            is_msg_sender: false,
            is_parent: false,
            is_child: matches!(holder, Holder::Key(_)),
            struct_properties: BTreeMap::new(),
            usage: StateUsage::new(self.holder_usage(holder).is_secret),
        };
        self.insert_key(holder, key)
    }

    fn insert_key(&mut self, holder: Holder, key: MappingKey) -> MappingKeyId {
        let id = key.id;
        debug!(key = %key.name, "new {:?}", key.kind);
        let (kind, key_name) = (key.kind, key.key_name.clone());
        self.mapping_keys.push(key);
        if let Some(keys) = self.holder_keys_mut(holder, kind) {
            keys.insert(key_name, id);
        }
        id
    }

    /// The innermost key a reference through `ident` reaches, if any.
    ///
    /// `m[k]` reaches the key `k` of `m`; `m[k].x` on a mapping of structs
    /// reaches the property `x` of that key; `s.x` reaches the property `x`.
    pub(crate) fn route(&mut self, holder: Holder, ident: NodeIdx) -> Result<Option<MappingKeyId>, AnalysisError> {
        let (is_mapping, is_struct) = self.holder_shape(holder);
        let path = self.path(ident);
        if is_mapping {
            let Some(access) = path.indexed_by() else {
                return Ok(None);
            };
            let member = self.path(access).member_accessed();
            let key = self.add_mapping_key(holder, access)?;
            if let (true, Some(member)) = (is_struct, member) {
                self.mapping_key_mut(key).is_parent = true;
                return Ok(Some(self.add_struct_property(Holder::Key(key), member)));
            }
            return Ok(Some(key));
        }
        match (is_struct, path.member_accessed()) {
            (true, Some(member)) => Ok(Some(self.add_struct_property(holder, member))),
            _ => Ok(None),
        }
    }

    /// `key` and every key containing it, innermost first
    pub fn key_chain(&self, key: MappingKeyId) -> Vec<MappingKeyId> {
        let mut chain = vec![key];
        let mut current = key;
        while let Holder::Key(parent) = self.mapping_key(current).container {
            chain.push(parent);
            current = parent;
        }
        chain
    }

    /// Apply `update` to the holder and to every key a reference through
    /// `ident` reaches
    pub(crate) fn update_routed(
        &mut self,
        holder: Holder,
        ident: NodeIdx,
        update: impl Fn(&mut StateUsage),
    ) -> Result<(), AnalysisError> {
        update(self.holder_usage_mut(holder));
        if let Some(key) = self.route(holder, ident)? {
            for id in self.key_chain(key) {
                update(&mut self.mapping_key_mut(id).usage);
            }
        }
        Ok(())
    }

    /// Record one reference on the holder and its routed keys
    pub(crate) fn holder_update(&mut self, holder: Holder, ident: NodeIdx) -> Result<(), AnalysisError> {
        let modification = self.path(ident).is_modification();
        let decorations = self.decorations(ident);
        self.update_routed(holder, ident, |usage| {
            usage.record_reference(ident, decorations, modification)
        })
    }

    /// The key of `holder` named like `key` on another holder
    pub fn counterpart_key(&self, holder: Holder, key: MappingKeyId) -> Option<MappingKeyId> {
        let key = self.mapping_key(key);
        match key.container {
            Holder::Key(parent) => {
                let parent = self.counterpart_key(holder, parent)?;
                self.holder_keys(Holder::Key(parent), key.kind)?
                    .get(&key.key_name)
                    .copied()
            }
            _ => self.holder_keys(holder, key.kind)?.get(&key.key_name).copied(),
        }
    }
}
