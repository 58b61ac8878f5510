//! Programmatic construction of parser-shaped JSON trees
//!
//! Produces the same JSON the contract parser would emit (ids, `src`,
//! `typeDescriptions`, decorations), so analyses can be driven without a
//! parser in the loop. Every node gets a fresh id; declarations are
//! returned as [`Decl`] handles so identifiers can reference them.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use crate::DeclId;

/// Pseudo-declaration ids the parser assigns to global symbols
pub const MSG_DECLARATION: DeclId = -15;
pub const REQUIRE_DECLARATION: DeclId = -18;
pub const REVERT_DECLARATION: DeclId = -19;
pub const THIS_DECLARATION: DeclId = -28;

/// A declaration under construction
#[derive(Debug, Clone)]
pub struct Decl {
    pub id: DeclId,
    pub name: String,
    pub node: Value,
}

impl Decl {
    pub fn type_string(&self) -> &str {
        self.node["typeDescriptions"]["typeString"]
            .as_str()
            .unwrap_or("")
    }

    /// Attach `per` domain parameters to a mapping declaration
    pub fn per_parameters(mut self, params: &[(&str, &str)]) -> Self {
        let params: Vec<Value> = params
            .iter()
            .map(|(ty, name)| json!({ "type": ty, "name": name }))
            .collect();
        self.node["perParameters"] = Value::Array(params);
        self
    }

    pub fn constant(mut self) -> Self {
        self.node["constant"] = json!(true);
        self
    }
}

/// Decoration flags the decoration pipeline writes onto nodes
pub trait Decorate: Sized {
    fn flag(self, key: &str) -> Self;

    fn secret(self) -> Self {
        self.flag("isSecret")
    }

    fn known(self) -> Self {
        self.flag("isKnown")
    }

    fn unknown(self) -> Self {
        self.flag("isUnknown")
    }

    fn reinitialisable(self) -> Self {
        self.flag("reinitialisable")
    }

    fn per(self) -> Self {
        self.flag("isPer")
    }
}

impl Decorate for Value {
    fn flag(mut self, key: &str) -> Self {
        self[key] = json!(true);
        self
    }
}

impl Decorate for Decl {
    fn flag(mut self, key: &str) -> Self {
        self.node[key] = json!(true);
        self
    }
}

/// Builds parser-shaped JSON trees
#[derive(Debug)]
pub struct AstBuilder {
    next_id: DeclId,
    cursor: usize,
    contracts: BTreeMap<String, Vec<DeclId>>,
}

impl Default for AstBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AstBuilder {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            cursor: 0,
            contracts: BTreeMap::new(),
        }
    }

    /// Reserve a node id without creating a node
    pub fn reserve_id(&mut self) -> DeclId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn fresh(&mut self, width: usize) -> (DeclId, String) {
        let id = self.reserve_id();
        let src = format!("{}:{}:0", self.cursor, width);
        self.cursor += width + 1;
        (id, src)
    }

    // === Types ===

    pub fn elementary(&mut self, name: &str) -> Value {
        let (id, src) = self.fresh(name.len());
        json!({
            "nodeType": "ElementaryTypeName",
            "id": id,
            "src": src,
            "name": name,
            "typeDescriptions": type_descriptions(name),
        })
    }

    pub fn user_defined(&mut self, type_string: &str, referenced: DeclId) -> Value {
        let (id, src) = self.fresh(type_string.len());
        let name = type_string.rsplit(['.', ' ']).next().unwrap_or(type_string);
        json!({
            "nodeType": "UserDefinedTypeName",
            "id": id,
            "src": src,
            "name": name,
            "referencedDeclaration": referenced,
            "typeDescriptions": type_descriptions(type_string),
        })
    }

    fn type_name(&mut self, type_string: &str) -> Value {
        if type_string.starts_with("struct ") || type_string.starts_with("contract ") {
            self.user_defined(type_string, 0)
        } else {
            self.elementary(type_string)
        }
    }

    pub fn mapping_type(&mut self, key_type: &str, value_type: &str) -> Value {
        let key = self.elementary(key_type);
        let value = self.type_name(value_type);
        let ts = mapping_type_string(key_type, value_type);
        let (id, src) = self.fresh(ts.len());
        json!({
            "nodeType": "Mapping",
            "id": id,
            "src": src,
            "keyType": key,
            "valueType": value,
            "typeDescriptions": type_descriptions(&ts),
        })
    }

    // === Declarations ===

    fn declaration(&mut self, name: &str, type_name: Value, state_variable: bool) -> Decl {
        let ts = type_name["typeDescriptions"]["typeString"]
            .as_str()
            .unwrap_or("")
            .to_string();
        let (id, src) = self.fresh(name.len() + ts.len() + 1);
        let node = json!({
            "nodeType": "VariableDeclaration",
            "id": id,
            "src": src,
            "name": name,
            "stateVariable": state_variable,
            "constant": false,
            "typeName": type_name,
            "typeDescriptions": type_descriptions(&ts),
        });
        Decl {
            id,
            name: name.to_string(),
            node,
        }
    }

    /// A contract-level variable of an elementary or user-defined type
    pub fn state_var(&mut self, name: &str, type_string: &str) -> Decl {
        let ty = self.type_name(type_string);
        self.declaration(name, ty, true)
    }

    /// A contract-level `mapping(key => value)`
    pub fn mapping_var(&mut self, name: &str, key_type: &str, value_type: &str) -> Decl {
        let ty = self.mapping_type(key_type, value_type);
        self.declaration(name, ty, true)
    }

    /// A contract-level `T[]`
    pub fn array_var(&mut self, name: &str, base_type: &str) -> Decl {
        let base = self.elementary(base_type);
        let ts = format!("{}[]", base_type);
        let (id, src) = self.fresh(ts.len());
        let ty = json!({
            "nodeType": "ArrayTypeName",
            "id": id,
            "src": src,
            "baseType": base,
            "typeDescriptions": type_descriptions(&ts),
        });
        self.declaration(name, ty, true)
    }

    /// A state variable holding an instance of another contract
    pub fn contract_instance(&mut self, name: &str, contract: &str, contract_id: DeclId) -> Decl {
        let ty = self.user_defined(&format!("contract {}", contract), contract_id);
        self.declaration(name, ty, true)
    }

    /// A function parameter or local variable
    pub fn param(&mut self, name: &str, type_string: &str) -> Decl {
        let ty = self.type_name(type_string);
        self.declaration(name, ty, false)
    }

    /// A struct definition; members are plain declarations
    pub fn struct_def(&mut self, contract: &str, name: &str, members: Vec<Decl>) -> (DeclId, Value) {
        let (id, src) = self.fresh(name.len());
        let members: Vec<Value> = members.into_iter().map(|m| m.node).collect();
        let node = json!({
            "nodeType": "StructDefinition",
            "id": id,
            "src": src,
            "name": name,
            "canonicalName": format!("{}.{}", contract, name),
            "members": members,
        });
        (id, node)
    }

    // === Expressions ===

    pub fn ident(&mut self, decl: &Decl) -> Value {
        let (id, src) = self.fresh(decl.name.len());
        json!({
            "nodeType": "Identifier",
            "id": id,
            "src": src,
            "name": decl.name,
            "referencedDeclaration": decl.id,
            "typeDescriptions": decl.node["typeDescriptions"].clone(),
        })
    }

    /// An identifier for a global symbol such as `require`
    pub fn global(&mut self, name: &str, referenced: DeclId, type_string: &str, type_identifier: &str) -> Value {
        let (id, src) = self.fresh(name.len());
        json!({
            "nodeType": "Identifier",
            "id": id,
            "src": src,
            "name": name,
            "referencedDeclaration": referenced,
            "typeDescriptions": { "typeString": type_string, "typeIdentifier": type_identifier },
        })
    }

    pub fn msg(&mut self) -> Value {
        self.global("msg", MSG_DECLARATION, "msg", "t_magic_message")
    }

    pub fn this(&mut self, contract: &str) -> Value {
        let ts = format!("contract {}", contract);
        self.global("this", THIS_DECLARATION, &ts, "t_contract")
    }

    pub fn msg_sender(&mut self) -> Value {
        let msg = self.msg();
        self.member(msg, "sender", "address")
    }

    pub fn msg_value(&mut self) -> Value {
        let msg = self.msg();
        self.member(msg, "value", "uint256")
    }

    pub fn literal(&mut self, value: &str) -> Value {
        let (id, src) = self.fresh(value.len());
        json!({
            "nodeType": "Literal",
            "id": id,
            "src": src,
            "kind": "number",
            "value": value,
            "typeDescriptions": type_descriptions(&format!("int_const {}", value)),
        })
    }

    pub fn bool_literal(&mut self, value: bool) -> Value {
        let (id, src) = self.fresh(5);
        json!({
            "nodeType": "Literal",
            "id": id,
            "src": src,
            "kind": "bool",
            "value": value.to_string(),
            "typeDescriptions": type_descriptions("bool"),
        })
    }

    /// `base[key]`; the result type is the mapping's value type
    pub fn index(&mut self, base: Value, key: Value) -> Value {
        let base_ts = base["typeDescriptions"]["typeString"]
            .as_str()
            .unwrap_or("")
            .to_string();
        let ts = mapping_value_type(&base_ts);
        let (id, src) = self.fresh(base_ts.len());
        json!({
            "nodeType": "IndexAccess",
            "id": id,
            "src": src,
            "baseExpression": base,
            "indexExpression": key,
            "typeDescriptions": type_descriptions(&ts),
        })
    }

    pub fn member(&mut self, expression: Value, member: &str, type_string: &str) -> Value {
        let (id, src) = self.fresh(member.len() + 1);
        json!({
            "nodeType": "MemberAccess",
            "id": id,
            "src": src,
            "memberName": member,
            "expression": expression,
            "typeDescriptions": type_descriptions(type_string),
        })
    }

    pub fn assign(&mut self, lhs: Value, operator: &str, rhs: Value) -> Value {
        let (id, src) = self.fresh(operator.len() + 2);
        json!({
            "nodeType": "Assignment",
            "id": id,
            "src": src,
            "operator": operator,
            "typeDescriptions": lhs["typeDescriptions"].clone(),
            "leftHandSide": lhs,
            "rightHandSide": rhs,
        })
    }

    pub fn binary(&mut self, left: Value, operator: &str, right: Value) -> Value {
        let (id, src) = self.fresh(operator.len() + 2);
        let types = if matches!(operator, "==" | "!=" | "<" | ">" | "<=" | ">=" | "&&" | "||") {
            type_descriptions("bool")
        } else {
            left["typeDescriptions"].clone()
        };
        json!({
            "nodeType": "BinaryOperation",
            "id": id,
            "src": src,
            "operator": operator,
            "typeDescriptions": types,
            "leftExpression": left,
            "rightExpression": right,
        })
    }

    pub fn unary(&mut self, operator: &str, sub: Value, prefix: bool) -> Value {
        let (id, src) = self.fresh(operator.len() + 1);
        json!({
            "nodeType": "UnaryOperation",
            "id": id,
            "src": src,
            "operator": operator,
            "prefix": prefix,
            "typeDescriptions": sub["typeDescriptions"].clone(),
            "subExpression": sub,
        })
    }

    pub fn conditional(&mut self, condition: Value, when_true: Value, when_false: Value) -> Value {
        let (id, src) = self.fresh(5);
        json!({
            "nodeType": "Conditional",
            "id": id,
            "src": src,
            "typeDescriptions": when_true["typeDescriptions"].clone(),
            "condition": condition,
            "trueExpression": when_true,
            "falseExpression": when_false,
        })
    }

    pub fn call(&mut self, callee: Value, arguments: Vec<Value>, kind: &str, type_string: &str) -> Value {
        let (id, src) = self.fresh(4);
        json!({
            "nodeType": "FunctionCall",
            "id": id,
            "src": src,
            "kind": kind,
            "expression": callee,
            "arguments": arguments,
            "typeDescriptions": type_descriptions(type_string),
        })
    }

    /// `address(arg)`
    pub fn address_of(&mut self, arg: Value) -> Value {
        let type_name = self.elementary("address");
        let (id, src) = self.fresh(7);
        let callee = json!({
            "nodeType": "ElementaryTypeNameExpression",
            "id": id,
            "src": src,
            "typeName": type_name,
            "typeDescriptions": type_descriptions("type(address)"),
        });
        self.call(callee, vec![arg], "typeConversion", "address")
    }

    /// `require(condition)` as a full statement
    pub fn require(&mut self, condition: Value) -> Value {
        let callee = self.global(
            "require",
            REQUIRE_DECLARATION,
            "function (bool) pure",
            "t_function_require_pure$_t_bool_$returns$__$",
        );
        let call = self.call(callee, vec![condition], "functionCall", "tuple()");
        self.expr_stmt(call)
    }

    /// `instance.method(args)` on another contract
    pub fn external_call(&mut self, instance: &Decl, method: &str, arguments: Vec<Value>) -> Value {
        let receiver = self.ident(instance);
        let callee = json!({
            "nodeType": "MemberAccess",
            "id": self.reserve_id(),
            "src": "0:0:0",
            "memberName": method,
            "expression": receiver,
            "typeDescriptions": {
                "typeString": "function (uint256) external",
                "typeIdentifier": "t_function_external_nonpayable$_t_uint256_$returns$__$",
            },
        });
        self.call(callee, arguments, "functionCall", "tuple()")
    }

    /// `method(args)` on a function of the same contract
    pub fn internal_call(&mut self, method: &str, method_id: DeclId, arguments: Vec<Value>) -> Value {
        let callee = self.global(
            method,
            method_id,
            "function (uint256)",
            "t_function_internal_nonpayable$_t_uint256_$returns$__$",
        );
        self.call(callee, arguments, "functionCall", "tuple()")
    }

    // === Statements ===

    pub fn expr_stmt(&mut self, expression: Value) -> Value {
        let (id, src) = self.fresh(1);
        json!({
            "nodeType": "ExpressionStatement",
            "id": id,
            "src": src,
            "expression": expression,
        })
    }

    /// `lhs op rhs;`
    pub fn assign_stmt(&mut self, lhs: Value, operator: &str, rhs: Value) -> Value {
        let assignment = self.assign(lhs, operator, rhs);
        self.expr_stmt(assignment)
    }

    /// `T name = init;`
    pub fn declare(&mut self, decl: &Decl, init: Option<Value>) -> Value {
        let (id, src) = self.fresh(decl.name.len());
        json!({
            "nodeType": "VariableDeclarationStatement",
            "id": id,
            "src": src,
            "declarations": [decl.node.clone()],
            "initialValue": init,
        })
    }

    pub fn block(&mut self, statements: Vec<Value>) -> Value {
        let (id, src) = self.fresh(2);
        json!({
            "nodeType": "Block",
            "id": id,
            "src": src,
            "statements": statements,
        })
    }

    pub fn if_stmt(&mut self, condition: Value, then: Vec<Value>, otherwise: Option<Vec<Value>>) -> Value {
        let true_body = self.block(then);
        let false_body = otherwise.map(|stmts| self.block(stmts));
        let (id, src) = self.fresh(2);
        json!({
            "nodeType": "IfStatement",
            "id": id,
            "src": src,
            "condition": condition,
            "trueBody": true_body,
            "falseBody": false_body,
        })
    }

    pub fn for_stmt(&mut self, init: Value, condition: Value, step: Value, body: Vec<Value>) -> Value {
        let body = self.block(body);
        let (id, src) = self.fresh(3);
        json!({
            "nodeType": "ForStatement",
            "id": id,
            "src": src,
            "initializationExpression": init,
            "condition": condition,
            "loopExpression": step,
            "body": body,
        })
    }

    pub fn while_stmt(&mut self, condition: Value, body: Vec<Value>) -> Value {
        let body = self.block(body);
        let (id, src) = self.fresh(5);
        json!({
            "nodeType": "WhileStatement",
            "id": id,
            "src": src,
            "condition": condition,
            "body": body,
        })
    }

    pub fn enum_def(&mut self, name: &str) -> Value {
        let (id, src) = self.fresh(name.len());
        json!({ "nodeType": "EnumDefinition", "id": id, "src": src, "name": name })
    }

    pub fn inline_assembly(&mut self) -> Value {
        let (id, src) = self.fresh(8);
        json!({ "nodeType": "InlineAssembly", "id": id, "src": src })
    }

    fn parameter_list(&mut self, params: Vec<Decl>) -> Value {
        let (id, src) = self.fresh(2);
        let params: Vec<Value> = params.into_iter().map(|p| p.node).collect();
        json!({
            "nodeType": "ParameterList",
            "id": id,
            "src": src,
            "parameters": params,
        })
    }

    /// A public function; the returned id is the function's declaration id
    pub fn function_with_id(&mut self, name: &str, params: Vec<Decl>, body: Vec<Value>) -> (DeclId, Value) {
        let parameters = self.parameter_list(params);
        let returns = self.parameter_list(Vec::new());
        let body = self.block(body);
        let (id, src) = self.fresh(name.len() + 10);
        let node = json!({
            "nodeType": "FunctionDefinition",
            "id": id,
            "src": src,
            "name": name,
            "kind": "function",
            "visibility": "public",
            "parameters": parameters,
            "returnParameters": returns,
            "body": body,
        });
        (id, node)
    }

    pub fn function(&mut self, name: &str, params: Vec<Decl>, body: Vec<Value>) -> Value {
        self.function_with_id(name, params, body).1
    }

    /// A contract; `members` may mix declarations (as values) and functions
    pub fn contract(&mut self, name: &str, members: Vec<Value>) -> Value {
        let (id, src) = self.fresh(name.len() + 10);
        self.contracts.insert(name.to_string(), vec![id]);
        json!({
            "nodeType": "ContractDefinition",
            "id": id,
            "src": src,
            "name": name,
            "contractKind": "contract",
            "baseContracts": [],
            "nodes": members,
        })
    }

    pub fn pragma(&mut self) -> Value {
        let (id, src) = self.fresh(20);
        json!({
            "nodeType": "PragmaDirective",
            "id": id,
            "src": src,
            "literals": ["solidity", "^", "0.8", ".0"],
        })
    }

    /// The root node; `exportedSymbols` lists every contract built so far
    pub fn source_unit(&mut self, nodes: Vec<Value>) -> Value {
        let (id, src) = self.fresh(self.cursor.max(1));
        json!({
            "nodeType": "SourceUnit",
            "id": id,
            "src": src,
            "absolutePath": "input.zol",
            "exportedSymbols": self.contracts,
            "nodes": nodes,
        })
    }
}

fn type_descriptions(type_string: &str) -> Value {
    json!({
        "typeString": type_string,
        "typeIdentifier": type_identifier(type_string),
    })
}

fn mapping_type_string(key: &str, value: &str) -> String {
    format!("mapping({} => {})", key, value)
}

/// The value type of `mapping(K => V)`, or the input for anything else
fn mapping_value_type(type_string: &str) -> String {
    type_string
        .strip_prefix("mapping(")
        .and_then(|rest| rest.strip_suffix(')'))
        .and_then(|inner| inner.split_once(" => "))
        .map(|(_, value)| value.to_string())
        .or_else(|| {
            type_string
                .strip_suffix("[]")
                .map(str::to_string)
        })
        .unwrap_or_else(|| type_string.to_string())
}

/// Approximates the parser's `typeIdentifier` encoding closely enough for
/// the substring checks the analysis performs.
fn type_identifier(type_string: &str) -> String {
    if let Some(inner) = type_string
        .strip_prefix("mapping(")
        .and_then(|rest| rest.strip_suffix(')'))
    {
        if let Some((key, value)) = inner.split_once(" => ") {
            return format!(
                "t_mapping$_{}_$_{}_$",
                type_identifier(key),
                type_identifier(value)
            );
        }
    }
    if let Some(rest) = type_string.strip_prefix("struct ") {
        return format!("t_struct$_{}_storage", rest.replace('.', "_$_"));
    }
    if let Some(rest) = type_string.strip_prefix("contract ") {
        return format!("t_contract$_{}_$", rest);
    }
    if let Some(rest) = type_string.strip_prefix("int_const ") {
        return format!("t_rational_{}_by_1", rest);
    }
    if let Some(base) = type_string.strip_suffix("[]") {
        return format!("t_array$_{}_$dyn_storage", type_identifier(base));
    }
    format!("t_{}", type_string.replace(' ', "_"))
}
