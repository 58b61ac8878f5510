//! Paths: navigation over the arena plus node-shape predicates
//!
//! A [`PathEntry`] records where a node sits (parent, container field, list
//! index, enclosing scope). Entries are created once, the first time the
//! build traversal reaches a node. A [`Path`] is a cheap borrowed view that
//! pairs a node with the context so callers can walk upwards and ask shape
//! questions ("is this `msg.sender`?", "is this a write?").

use veil_ast::{Children, DeclId, Field, Node, NodeIdx, NodeType, Src};

use crate::context::{CompilationContext, ScopeId};
use crate::error::AnalysisError;

/// Containers whose contents are read, closest first
const RHS_CONTAINERS: [Field; 7] = [
    Field::RightHandSide,
    Field::InitialValue,
    Field::TrueExpression,
    Field::FalseExpression,
    Field::IndexExpression,
    Field::RightExpression,
    Field::Arguments,
];

/// Containers whose contents may be written
const LHS_CONTAINERS: [Field; 4] = [
    Field::LeftHandSide,
    Field::Declarations,
    Field::SubExpression,
    Field::LeftExpression,
];

/// Containers that never hold a write target
const READ_ONLY_CONTAINERS: [Field; 4] = [
    Field::IndexExpression,
    Field::Condition,
    Field::InitializationExpression,
    Field::LoopExpression,
];

/// Ids above this are the parser's pseudo-declarations for global symbols
const GLOBAL_DECLARATION_FLOOR: DeclId = 4_294_967_200;

/// Where a node sits in the tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathEntry {
    pub node: NodeIdx,
    pub parent: Option<NodeIdx>,
    /// Field of the parent holding this node (`Field::Ast` for the root)
    pub key: Field,
    /// Position inside the container when it is a list
    pub index: Option<usize>,
    pub scope: ScopeId,
}

impl PathEntry {
    /// Create an entry, checking that the parent really holds the node where
    /// the traversal says it does
    pub fn new(
        ctx: &CompilationContext,
        node: NodeIdx,
        parent: Option<NodeIdx>,
        key: Field,
        index: Option<usize>,
        scope: ScopeId,
    ) -> Result<Self, AnalysisError> {
        let malformed = |detail: String| AnalysisError::MalformedPath {
            detail,
            node,
            src: ctx.ast().node(node).src,
        };
        match parent {
            None if key != Field::Ast => {
                return Err(malformed(format!("root node held under '{}'", key)))
            }
            None => {}
            Some(parent) => match (ctx.ast().node(parent).slot(key), index) {
                (Some(Children::One(child)), None) if *child == node => {}
                (Some(Children::List(items)), Some(i)) if items.get(i) == Some(&Some(node)) => {}
                (None, _) => {
                    return Err(malformed(format!(
                        "parent {} has no '{}' container",
                        parent, key
                    )))
                }
                _ => {
                    return Err(malformed(format!(
                        "parent {} does not hold this node at '{}'{}",
                        parent,
                        key,
                        index.map(|i| format!("[{}]", i)).unwrap_or_default()
                    )))
                }
            },
        }
        Ok(Self {
            node,
            parent,
            key,
            index,
            scope,
        })
    }
}

/// What a read value flows into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LhsTarget {
    /// The node being assigned
    Node(NodeIdx),
    /// The value is read without being assigned anywhere (a condition, a key)
    Unassigned,
    /// Not inside any right-hand container
    Unknown,
}

/// A borrowed view of one node and its position
#[derive(Clone, Copy)]
pub struct Path<'a> {
    ctx: &'a CompilationContext,
    idx: NodeIdx,
}

impl<'a> std::fmt::Debug for Path<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Path({} {})", self.node().node_type, self.idx)
    }
}

impl<'a> Path<'a> {
    pub(crate) fn new(ctx: &'a CompilationContext, idx: NodeIdx) -> Self {
        Self { ctx, idx }
    }

    pub fn idx(&self) -> NodeIdx {
        self.idx
    }

    pub fn node(&self) -> &'a Node {
        self.ctx.ast().node(self.idx)
    }

    pub fn node_type(&self) -> NodeType {
        self.node().node_type
    }

    pub fn src(&self) -> Src {
        self.node().src
    }

    /// A view of another node over the same context
    pub fn at(&self, idx: NodeIdx) -> Path<'a> {
        Path::new(self.ctx, idx)
    }

    pub fn entry(&self) -> Option<&'a PathEntry> {
        self.ctx.entry(self.idx)
    }

    pub fn parent(&self) -> Option<Path<'a>> {
        self.entry()?.parent.map(|p| self.at(p))
    }

    /// Name of the container field this node is held under
    pub fn key(&self) -> Option<Field> {
        self.entry().map(|e| e.key)
    }

    pub fn index(&self) -> Option<usize> {
        self.entry()?.index
    }

    pub fn scope(&self) -> Option<ScopeId> {
        self.entry().map(|e| e.scope)
    }

    /// Other members of the list this node sits in, in order
    pub fn siblings(&self) -> Vec<NodeIdx> {
        match (self.entry(), self.parent()) {
            (Some(entry), Some(parent)) if entry.index.is_some() => self
                .ctx
                .ast()
                .list(parent.idx, entry.key)
                .into_iter()
                .filter(|s| *s != self.idx)
                .collect(),
            _ => Vec::new(),
        }
    }

    // === Ancestor search ===

    /// This node and every ancestor, innermost first
    pub fn ancestors(&self) -> Ancestors<'a> {
        Ancestors {
            ctx: self.ctx,
            next: Some(self.idx),
        }
    }

    /// First path, starting at this one, that satisfies `predicate`
    pub fn find_ancestor(&self, predicate: impl Fn(&Path<'a>) -> bool) -> Option<Path<'a>> {
        self.ancestors().find(|p| predicate(p))
    }

    pub fn ancestor_of_type(&self, node_type: NodeType) -> Option<Path<'a>> {
        self.find_ancestor(|p| p.node_type() == node_type)
    }

    /// The nearest path (starting here) held under a container `field`
    pub fn ancestor_contained_within(&self, field: Field) -> Option<Path<'a>> {
        self.find_ancestor(|p| p.key() == Some(field))
    }

    pub fn is_in_type(&self, types: &[NodeType]) -> bool {
        self.ancestors().any(|p| types.contains(&p.node_type()))
    }

    pub fn is_contained_within(&self, field: Field) -> bool {
        self.ancestor_contained_within(field).is_some()
    }

    pub fn function_definition(&self) -> Option<Path<'a>> {
        self.ancestor_of_type(NodeType::FunctionDefinition)
    }

    pub fn contract_definition(&self) -> Option<Path<'a>> {
        self.ancestor_of_type(NodeType::ContractDefinition)
    }

    /// The enclosing statement of an expression
    pub fn statement(&self) -> Option<Path<'a>> {
        self.find_ancestor(|p| {
            matches!(
                p.node_type(),
                NodeType::ExpressionStatement
                    | NodeType::VariableDeclarationStatement
                    | NodeType::Return
                    | NodeType::EmitStatement
                    | NodeType::IfStatement
                    | NodeType::ForStatement
                    | NodeType::WhileStatement
                    | NodeType::DoWhileStatement
            )
        })
    }

    // === Directional helpers ===

    /// The read-side container this node sits in. Containers are tried in a
    /// fixed priority order, not by distance.
    pub fn rhs_ancestor(&self) -> Option<(Field, Path<'a>)> {
        RHS_CONTAINERS
            .iter()
            .find_map(|f| self.ancestor_contained_within(*f).map(|p| (*f, p)))
    }

    pub fn lhs_ancestor(&self) -> Option<(Field, Path<'a>)> {
        LHS_CONTAINERS
            .iter()
            .find_map(|f| self.ancestor_contained_within(*f).map(|p| (*f, p)))
    }

    /// The node a value read here is assigned to
    pub fn corresponding_lhs(&self) -> LhsTarget {
        let ast = self.ctx.ast();
        let Some((field, container)) = self.rhs_ancestor() else {
            return LhsTarget::Unknown;
        };
        let holder = container.parent();
        let target = match field {
            Field::RightHandSide => holder.and_then(|h| ast.child(h.idx, Field::LeftHandSide)),
            Field::InitialValue => holder
                .and_then(|h| ast.children(h.idx, Field::Declarations).first().copied().flatten()),
            Field::RightExpression => {
                holder.and_then(|h| ast.child(h.idx, Field::LeftExpression))
            }
            Field::TrueExpression
            | Field::FalseExpression
            | Field::IndexExpression
            | Field::Arguments => return LhsTarget::Unassigned,
            _ => None,
        };
        target.map_or(LhsTarget::Unknown, LhsTarget::Node)
    }

    /// The value written into the node at this path, when it is a write target
    pub fn corresponding_rhs(&self) -> Option<NodeIdx> {
        let ast = self.ctx.ast();
        let (field, container) = self.lhs_ancestor()?;
        let holder = container.parent()?;
        match field {
            Field::LeftHandSide => ast.child(holder.idx, Field::RightHandSide),
            Field::Declarations => ast.child(holder.idx, Field::InitialValue),
            Field::SubExpression => Some(self.idx),
            Field::LeftExpression => ast.child(holder.idx, Field::RightExpression),
            _ => None,
        }
    }

    /// The `IndexAccess` this node is the base of (`m` in `m[k]`)
    pub fn indexed_by(&self) -> Option<NodeIdx> {
        let parent = self.parent()?;
        (parent.node_type() == NodeType::IndexAccess && self.key() == Some(Field::BaseExpression))
            .then_some(parent.idx)
    }

    /// The `MemberAccess` this node is the receiver of (`s` in `s.x`)
    pub fn member_accessed(&self) -> Option<NodeIdx> {
        let parent = self.parent()?;
        (parent.node_type() == NodeType::MemberAccess && self.key() == Some(Field::Expression))
            .then_some(parent.idx)
    }

    /// The mapping access a reference belongs to: the node itself, the access
    /// it is the base of, or failing that the nearest enclosing one
    pub fn mapping_access(&self) -> Option<NodeIdx> {
        if self.node_type() == NodeType::IndexAccess {
            return Some(self.idx);
        }
        self.indexed_by().or_else(|| {
            self.parent()
                .and_then(|p| p.ancestor_of_type(NodeType::IndexAccess))
                .map(|p| p.idx)
        })
    }

    /// The key expression of the mapping access this node belongs to
    pub fn mapping_key_expression(&self) -> Option<NodeIdx> {
        let access = self.mapping_access()?;
        self.ctx.ast().child(access, Field::IndexExpression)
    }

    // === Declarations ===

    /// The declaration this node refers to, looking through index and member
    /// accesses to the underlying identifier
    pub fn referenced_declaration(&self) -> Option<DeclId> {
        let ast = self.ctx.ast();
        let node = self.node();
        match node.node_type {
            NodeType::Identifier => node.referenced_declaration,
            NodeType::VariableDeclaration => Some(node.id),
            NodeType::IndexAccess => self
                .at(ast.child(self.idx, Field::BaseExpression)?)
                .referenced_declaration(),
            NodeType::MemberAccess => self
                .at(ast.child(self.idx, Field::Expression)?)
                .referenced_declaration(),
            _ => None,
        }
    }

    /// The declaration node this node refers to
    pub fn referenced_node(&self) -> Option<Path<'a>> {
        let decl = self.referenced_declaration()?;
        self.ctx.ast().by_decl_id(decl).map(|idx| self.at(idx))
    }

    /// The identifier at the root of an index/member access chain
    pub fn base_identifier(&self) -> Option<NodeIdx> {
        let ast = self.ctx.ast();
        match self.node_type() {
            NodeType::Identifier => Some(self.idx),
            NodeType::IndexAccess => self.at(ast.child(self.idx, Field::BaseExpression)?).base_identifier(),
            NodeType::MemberAccess => self.at(ast.child(self.idx, Field::Expression)?).base_identifier(),
            _ => None,
        }
    }

    // === Shape predicates ===

    fn is_global_identifier(&self, name: &str) -> bool {
        let node = self.node();
        node.node_type == NodeType::Identifier
            && node.name() == name
            && node
                .referenced_declaration
                .map_or(true, |id| id < 0 || id > GLOBAL_DECLARATION_FLOOR)
    }

    fn is_msg_member(&self, member: Option<&str>) -> bool {
        let node = self.node();
        if node.node_type != NodeType::MemberAccess {
            return false;
        }
        if let Some(member) = member {
            if node.member_name.as_deref() != Some(member) {
                return false;
            }
        }
        self.ctx
            .ast()
            .child(self.idx, Field::Expression)
            .map_or(false, |e| self.at(e).is_global_identifier("msg"))
    }

    /// The `msg` global or any member of it
    pub fn is_msg(&self) -> bool {
        self.is_global_identifier("msg") || self.is_msg_member(None)
    }

    pub fn is_msg_sender(&self) -> bool {
        self.is_msg_member(Some("sender"))
    }

    pub fn is_msg_value(&self) -> bool {
        self.is_msg_member(Some("value"))
    }

    pub fn is_this(&self) -> bool {
        self.is_global_identifier("this")
    }

    fn is_call_to(&self, name: &str) -> bool {
        let ast = self.ctx.ast();
        match self.node_type() {
            NodeType::Identifier => self.is_global_identifier(name),
            NodeType::FunctionCall => ast
                .child(self.idx, Field::Expression)
                .map_or(false, |callee| self.at(callee).is_global_identifier(name)),
            NodeType::ExpressionStatement => ast
                .child(self.idx, Field::Expression)
                .map_or(false, |e| {
                    self.at(e).node_type() == NodeType::FunctionCall && self.at(e).is_call_to(name)
                }),
            _ => false,
        }
    }

    /// A `require(...)` statement, call, or the `require` identifier itself
    pub fn is_require_statement(&self) -> bool {
        self.is_call_to("require")
    }

    pub fn is_revert_statement(&self) -> bool {
        self.is_call_to("revert")
    }

    /// An identifier naming an event
    pub fn is_event_reference(&self) -> bool {
        self.node_type() == NodeType::Identifier
            && self
                .referenced_node()
                .map_or(false, |d| d.node_type() == NodeType::EventDefinition)
    }

    /// An identifier naming a contract exported by this source unit
    pub fn is_exported_symbol(&self) -> bool {
        let node = self.node();
        let Some(decl) = node.referenced_declaration else {
            return false;
        };
        node.node_type == NodeType::Identifier
            && self
                .ctx
                .ast()
                .exported_symbols()
                .values()
                .any(|ids| ids.contains(&decl))
    }

    /// Identifiers that never resolve to a variable binding
    pub fn is_pseudo_identifier(&self) -> bool {
        self.is_msg()
            || self.is_this()
            || self.is_require_statement()
            || self.is_revert_statement()
            || self.is_exported_symbol()
            || self.is_event_reference()
    }

    pub fn is_mapping_declaration(&self) -> bool {
        let ast = self.ctx.ast();
        self.node_type() == NodeType::VariableDeclaration
            && ast
                .child(self.idx, Field::TypeName)
                .map_or(false, |t| ast.node_type(t) == NodeType::Mapping)
    }

    /// A reference (possibly through accesses) to a mapping declaration
    pub fn is_mapping_identifier(&self) -> bool {
        matches!(
            self.node_type(),
            NodeType::Identifier | NodeType::IndexAccess | NodeType::MemberAccess
        ) && self
            .referenced_node()
            .map_or(false, |d| d.is_mapping_declaration())
    }

    pub fn is_mapping(&self) -> bool {
        self.is_mapping_declaration() || self.is_mapping_identifier()
    }

    pub fn is_array_declaration(&self) -> bool {
        let ast = self.ctx.ast();
        self.node_type() == NodeType::VariableDeclaration
            && ast
                .child(self.idx, Field::TypeName)
                .map_or(false, |t| ast.node_type(t) == NodeType::ArrayTypeName)
    }

    pub fn is_array(&self) -> bool {
        self.is_array_declaration()
            || (self.node_type() != NodeType::VariableDeclaration
                && self.referenced_node().map_or(false, |d| d.is_array_declaration()))
    }

    /// A declaration whose type is (or holds) a struct
    pub fn is_struct_declaration(&self) -> bool {
        self.node_type() == NodeType::VariableDeclaration
            && self.node().type_string().contains("struct ")
    }

    pub fn is_struct(&self) -> bool {
        self.is_struct_declaration()
            || (self.node_type() != NodeType::VariableDeclaration
                && self.referenced_node().map_or(false, |d| d.is_struct_declaration()))
    }

    /// A state variable holding an instance of a contract that this source
    /// unit does not define
    pub fn is_external_contract_instance_declaration(&self) -> bool {
        let node = self.node();
        if node.node_type != NodeType::VariableDeclaration {
            return false;
        }
        match node.type_string().strip_prefix("contract ") {
            Some(contract) => !self.ctx.ast().exported_symbols().contains_key(contract),
            None => false,
        }
    }

    /// `instance.method(...)` where `instance` is an external contract
    pub fn is_external_function_call(&self) -> bool {
        let ast = self.ctx.ast();
        if self.node_type() != NodeType::FunctionCall {
            return false;
        }
        let Some(callee) = ast.child(self.idx, Field::Expression) else {
            return false;
        };
        if ast.node_type(callee) != NodeType::MemberAccess {
            return false;
        }
        ast.child(callee, Field::Expression)
            .and_then(|receiver| self.at(receiver).referenced_node())
            .map_or(false, |d| d.is_external_contract_instance_declaration())
    }

    /// A call to a function of this contract
    pub fn is_internal_function_call(&self) -> bool {
        let ast = self.ctx.ast();
        let node = self.node();
        if node.node_type != NodeType::FunctionCall || node.kind.as_deref() != Some("functionCall") {
            return false;
        }
        ast.child(self.idx, Field::Expression).map_or(false, |callee| {
            let callee = self.at(callee);
            callee.node_type() == NodeType::Identifier
                && !callee.is_pseudo_identifier()
                && callee.node().type_identifier().contains("_internal_")
        })
    }

    pub fn is_type_conversion(&self) -> bool {
        let node = self.node();
        node.node_type == NodeType::FunctionCall && node.kind.as_deref() == Some("typeConversion")
    }

    /// The literal zero, or a conversion of it such as `address(0)`
    pub fn is_zero(&self) -> bool {
        let node = self.node();
        match node.node_type {
            NodeType::Literal => node.value.as_deref() == Some("0"),
            NodeType::FunctionCall if self.is_type_conversion() => self
                .ctx
                .ast()
                .children(self.idx, Field::Arguments)
                .first()
                .copied()
                .flatten()
                .map_or(false, |arg| self.at(arg).is_zero()),
            _ => false,
        }
    }

    /// A parameter declaration of a function (not of an event or return list)
    pub fn is_function_parameter_declaration(&self) -> bool {
        if self.node_type() != NodeType::VariableDeclaration {
            return false;
        }
        let Some(list) = self.parent() else {
            return false;
        };
        list.node_type() == NodeType::ParameterList
            && list.key() == Some(Field::Parameters)
            && list
                .parent()
                .map_or(false, |f| f.node_type() == NodeType::FunctionDefinition)
    }

    /// A reference to a function parameter
    pub fn is_function_parameter(&self) -> bool {
        self.node_type() != NodeType::VariableDeclaration
            && self
                .referenced_node()
                .map_or(false, |d| d.is_function_parameter_declaration())
    }

    /// A local variable declared by a statement inside a function body
    pub fn is_local_stack_variable_declaration(&self) -> bool {
        self.node_type() == NodeType::VariableDeclaration
            && !self.node().state_variable
            && self.key() == Some(Field::Declarations)
            && self.is_in_type(&[NodeType::FunctionDefinition])
    }

    /// Whether this identifier is written to.
    ///
    /// Only assignment targets and increment/decrement operands count; an
    /// identifier inside any read-only container is never a write.
    pub fn is_modification(&self) -> bool {
        if self.node_type() != NodeType::Identifier {
            return false;
        }
        if self.is_in_type(&[NodeType::FunctionCall, NodeType::Return, NodeType::EmitStatement]) {
            return false;
        }
        if self.is_contained_within(Field::InitialValue) || self.rhs_ancestor().is_some() {
            return false;
        }
        !READ_ONLY_CONTAINERS
            .iter()
            .any(|f| self.is_contained_within(*f))
    }
}

/// Iterator over a path and its ancestors
pub struct Ancestors<'a> {
    ctx: &'a CompilationContext,
    next: Option<NodeIdx>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = Path<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.next?;
        self.next = self.ctx.entry(idx).and_then(|e| e.parent);
        Some(Path::new(self.ctx, idx))
    }
}
