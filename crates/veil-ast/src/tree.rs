//! The node arena and JSON ingestion

use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Value};

use crate::{
    AstError, Children, DeclId, Decorations, Field, Node, NodeIdx, NodeType, PerParameter, Src,
    TypeDescriptions,
};

/// An ingested contract AST.
///
/// Nodes are stored in pre-order, so every subtree occupies a contiguous
/// range of indices. The input document is kept untouched; analysis results
/// live in side tables and are only merged into a copy on export.
#[derive(Debug, Clone)]
pub struct Ast {
    nodes: Vec<Node>,
    /// Exclusive end of each node's subtree range
    subtree_end: Vec<u32>,
    root: NodeIdx,
    by_id: HashMap<DeclId, NodeIdx>,
    document: Value,
}

impl Ast {
    /// Parse a JSON string and ingest it
    pub fn from_json_str(source: &str) -> Result<Self, AstError> {
        let value: Value = serde_json::from_str(source)?;
        Self::from_json(value)
    }

    /// Ingest a parsed JSON document.
    ///
    /// Accepts either a bare `SourceUnit` object or the `{ "ast": ... }`
    /// wrapper the compiler front end emits.
    pub fn from_json(document: Value) -> Result<Self, AstError> {
        let root_pointer = match &document {
            Value::Object(obj) if obj.contains_key("nodeType") => String::new(),
            Value::Object(obj) if obj.get("ast").map_or(false, Value::is_object) => {
                "/ast".to_string()
            }
            Value::Object(_) => {
                return Err(AstError::MissingNodeType {
                    pointer: "/".to_string(),
                })
            }
            _ => {
                return Err(AstError::NotAnObject {
                    pointer: "/".to_string(),
                })
            }
        };

        let mut ingest = Ingest {
            nodes: Vec::new(),
            subtree_end: Vec::new(),
            by_id: HashMap::new(),
        };
        let root_value = if root_pointer.is_empty() {
            &document
        } else {
            &document["ast"]
        };
        let root = ingest.node(root_value, root_pointer)?;

        Ok(Ast {
            nodes: ingest.nodes,
            subtree_end: ingest.subtree_end,
            root,
            by_id: ingest.by_id,
            document,
        })
    }

    pub fn root(&self) -> NodeIdx {
        self.root
    }

    /// Get a node by index. Indices handed out by this arena are always valid.
    pub fn node(&self, idx: NodeIdx) -> &Node {
        &self.nodes[idx.index()]
    }

    pub fn get(&self, idx: NodeIdx) -> Option<&Node> {
        self.nodes.get(idx.index())
    }

    pub fn node_type(&self, idx: NodeIdx) -> NodeType {
        self.node(idx).node_type
    }

    /// Find a node by its parser-assigned id
    pub fn by_decl_id(&self, id: DeclId) -> Option<NodeIdx> {
        self.by_id.get(&id).copied()
    }

    /// The single child held under `field`, if any
    pub fn child(&self, idx: NodeIdx, field: Field) -> Option<NodeIdx> {
        match self.node(idx).slot(field) {
            Some(Children::One(child)) => Some(*child),
            _ => None,
        }
    }

    /// The list held under `field`, holes included; empty if absent
    pub fn children(&self, idx: NodeIdx, field: Field) -> &[Option<NodeIdx>] {
        match self.node(idx).slot(field) {
            Some(Children::List(items)) => items,
            _ => &[],
        }
    }

    /// Present children of a list field, holes skipped
    pub fn list(&self, idx: NodeIdx, field: Field) -> Vec<NodeIdx> {
        self.children(idx, field).iter().flatten().copied().collect()
    }

    /// All nodes of the subtree rooted at `idx`, in pre-order
    pub fn subtree(&self, idx: NodeIdx) -> impl Iterator<Item = NodeIdx> {
        (idx.0..self.subtree_end[idx.index()]).map(NodeIdx)
    }

    /// Whether `node` lies inside the subtree rooted at `ancestor` (inclusive)
    pub fn is_within(&self, node: NodeIdx, ancestor: NodeIdx) -> bool {
        ancestor.0 <= node.0 && node.0 < self.subtree_end[ancestor.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The untouched input document
    pub fn document(&self) -> &Value {
        &self.document
    }

    /// The `exportedSymbols` table of the root source unit
    pub fn exported_symbols(&self) -> &BTreeMap<String, Vec<DeclId>> {
        &self.node(self.root).exported_symbols
    }
}

struct Ingest {
    nodes: Vec<Node>,
    subtree_end: Vec<u32>,
    by_id: HashMap<DeclId, NodeIdx>,
}

impl Ingest {
    fn node(&mut self, value: &Value, pointer: String) -> Result<NodeIdx, AstError> {
        let obj = value.as_object().ok_or_else(|| AstError::NotAnObject {
            pointer: pointer.clone(),
        })?;
        let type_name = obj
            .get("nodeType")
            .and_then(Value::as_str)
            .ok_or_else(|| AstError::MissingNodeType {
                pointer: pointer.clone(),
            })?;
        let node_type =
            NodeType::from_name(type_name).ok_or_else(|| AstError::UnknownNodeType {
                node_type: type_name.to_string(),
                pointer: pointer.clone(),
            })?;
        let id = obj
            .get("id")
            .and_then(Value::as_i64)
            .ok_or_else(|| AstError::MissingField {
                field: "id",
                pointer: pointer.clone(),
            })?;
        let src = match obj.get("src").and_then(Value::as_str) {
            Some(s) => s.parse::<Src>()?,
            None => Src::dummy(),
        };

        let idx = NodeIdx(self.nodes.len() as u32);
        let node = Node {
            idx,
            node_type,
            id,
            src,
            name: string_field(obj, "name"),
            member_name: string_field(obj, "memberName"),
            operator: string_field(obj, "operator"),
            value: string_field(obj, "value"),
            kind: string_field(obj, "kind"),
            type_descriptions: obj
                .get("typeDescriptions")
                .and_then(|v| serde_json::from_value::<TypeDescriptions>(v.clone()).ok())
                .unwrap_or_default(),
            referenced_declaration: obj.get("referencedDeclaration").and_then(Value::as_i64),
            state_variable: bool_field(obj, "stateVariable"),
            constant: bool_field(obj, "constant"),
            decorations: Decorations {
                is_secret: bool_field(obj, "isSecret"),
                is_known: bool_field(obj, "isKnown"),
                is_unknown: bool_field(obj, "isUnknown"),
                reinitialisable: bool_field(obj, "reinitialisable"),
                is_per: bool_field(obj, "isPer"),
            },
            per_parameters: per_parameters(obj, &pointer)?,
            exported_symbols: exported_symbols(obj, &pointer)?,
            children: Vec::new(),
            pointer: pointer.clone(),
        };
        self.nodes.push(node);
        self.subtree_end.push(idx.0 + 1);
        self.by_id.entry(id).or_insert(idx);

        let mut children = Vec::new();
        for field in node_type.visitable_fields() {
            let child_pointer = format!("{}/{}", pointer, field.as_str());
            match obj.get(field.as_str()) {
                None | Some(Value::Null) => {}
                Some(Value::Array(items)) => {
                    let mut list = Vec::with_capacity(items.len());
                    for (i, item) in items.iter().enumerate() {
                        if item.is_null() {
                            list.push(None);
                        } else {
                            list.push(Some(self.node(item, format!("{}/{}", child_pointer, i))?));
                        }
                    }
                    children.push((*field, Children::List(list)));
                }
                Some(item) => {
                    let child = self.node(item, child_pointer)?;
                    children.push((*field, Children::One(child)));
                }
            }
        }
        self.nodes[idx.index()].children = children;
        self.subtree_end[idx.index()] = self.nodes.len() as u32;
        Ok(idx)
    }
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

fn bool_field(obj: &Map<String, Value>, key: &str) -> bool {
    obj.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn per_parameters(obj: &Map<String, Value>, pointer: &str) -> Result<Vec<PerParameter>, AstError> {
    match obj.get("perParameters") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(v) => serde_json::from_value(v.clone()).map_err(|_| AstError::InvalidField {
            field: "perParameters",
            pointer: pointer.to_string(),
        }),
    }
}

fn exported_symbols(
    obj: &Map<String, Value>,
    pointer: &str,
) -> Result<BTreeMap<String, Vec<DeclId>>, AstError> {
    match obj.get("exportedSymbols") {
        None | Some(Value::Null) => Ok(BTreeMap::new()),
        Some(v) => serde_json::from_value(v.clone()).map_err(|_| AstError::InvalidField {
            field: "exportedSymbols",
            pointer: pointer.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "nodeType": "SourceUnit",
            "id": 1,
            "src": "0:80:0",
            "exportedSymbols": { "Vault": [2] },
            "nodes": [{
                "nodeType": "ContractDefinition",
                "id": 2,
                "name": "Vault",
                "src": "0:80:0",
                "nodes": [{
                    "nodeType": "VariableDeclaration",
                    "id": 3,
                    "name": "total",
                    "src": "20:20:0",
                    "stateVariable": true,
                    "isSecret": true,
                    "typeDescriptions": { "typeString": "uint256", "typeIdentifier": "t_uint256" },
                    "typeName": {
                        "nodeType": "ElementaryTypeName",
                        "id": 4,
                        "name": "uint256",
                        "src": "20:7:0"
                    },
                    "documentation": { "nodeType": "SomethingWeNeverVisit", "id": 99 }
                }]
            }]
        })
    }

    #[test]
    fn ingests_in_pre_order() {
        let ast = Ast::from_json(sample()).unwrap();
        assert_eq!(ast.len(), 4);
        let types: Vec<_> = ast.iter().map(|n| n.node_type).collect();
        assert_eq!(
            types,
            vec![
                NodeType::SourceUnit,
                NodeType::ContractDefinition,
                NodeType::VariableDeclaration,
                NodeType::ElementaryTypeName,
            ]
        );
        let var = ast.by_decl_id(3).unwrap();
        assert!(ast.node(var).decorations.is_secret);
        assert!(ast.node(var).state_variable);
        assert_eq!(ast.node(var).type_string(), "uint256");
        assert_eq!(ast.node(var).pointer, "/nodes/0/nodes/0");
        assert_eq!(ast.exported_symbols().get("Vault"), Some(&vec![2]));
    }

    #[test]
    fn subtree_ranges_are_contiguous() {
        let ast = Ast::from_json(sample()).unwrap();
        let contract = ast.by_decl_id(2).unwrap();
        let inside: Vec<_> = ast.subtree(contract).collect();
        assert_eq!(inside.len(), 3);
        assert!(ast.is_within(ast.by_decl_id(4).unwrap(), contract));
        assert!(!ast.is_within(ast.root(), contract));
    }

    #[test]
    fn accepts_wrapped_documents() {
        let ast = Ast::from_json(json!({ "ast": sample() })).unwrap();
        assert_eq!(ast.node(ast.root()).pointer, "/ast");
        assert_eq!(ast.node(ast.by_decl_id(3).unwrap()).pointer, "/ast/nodes/0/nodes/0");
    }

    #[test]
    fn unknown_node_types_are_fatal() {
        let doc = json!({
            "nodeType": "SourceUnit",
            "id": 1,
            "nodes": [{ "nodeType": "YulBlock", "id": 2 }]
        });
        let err = Ast::from_json(doc).unwrap_err();
        assert_eq!(
            err,
            AstError::UnknownNodeType {
                node_type: "YulBlock".to_string(),
                pointer: "/nodes/0".to_string(),
            }
        );
    }

    #[test]
    fn missing_ids_are_rejected() {
        let doc = json!({ "nodeType": "SourceUnit", "nodes": [] });
        assert!(matches!(
            Ast::from_json(doc),
            Err(AstError::MissingField { field: "id", .. })
        ));
    }
}
