//! Node kinds, container fields and the per-node record stored in the arena

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Src;

/// Position of a node in the arena. Assigned in pre-order, so comparing two
/// indices compares their source order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeIdx(pub u32);

impl NodeIdx {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The parser-assigned `id` of a node. Declarations are referenced through it.
pub type DeclId = i64;

/// Every node kind the analysis knows how to classify.
///
/// The set is closed on purpose: ingestion rejects any other `nodeType`,
/// and every layer matches on it exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    SourceUnit,
    PragmaDirective,
    ImportDirective,
    ContractDefinition,
    InheritanceSpecifier,
    UserDefinedTypeName,
    FunctionDefinition,
    ModifierDefinition,
    EventDefinition,
    EmitStatement,
    StructDefinition,
    EnumDefinition,
    StructuredDocumentation,
    ParameterList,
    Block,
    VariableDeclarationStatement,
    VariableDeclaration,
    ExpressionStatement,
    Assignment,
    BinaryOperation,
    UnaryOperation,
    Conditional,
    Identifier,
    Literal,
    MemberAccess,
    IndexAccess,
    FunctionCall,
    TupleExpression,
    ElementaryTypeName,
    ElementaryTypeNameExpression,
    Mapping,
    ArrayTypeName,
    IfStatement,
    ForStatement,
    WhileStatement,
    DoWhileStatement,
    Return,
    Break,
    Continue,
    InlineAssembly,
}

impl NodeType {
    pub fn from_name(name: &str) -> Option<NodeType> {
        use NodeType::*;
        let ty = match name {
            "SourceUnit" => SourceUnit,
            "PragmaDirective" => PragmaDirective,
            "ImportDirective" => ImportDirective,
            "ContractDefinition" => ContractDefinition,
            "InheritanceSpecifier" => InheritanceSpecifier,
            "UserDefinedTypeName" => UserDefinedTypeName,
            "FunctionDefinition" => FunctionDefinition,
            "ModifierDefinition" => ModifierDefinition,
            "EventDefinition" => EventDefinition,
            "EmitStatement" => EmitStatement,
            "StructDefinition" => StructDefinition,
            "EnumDefinition" => EnumDefinition,
            "StructuredDocumentation" => StructuredDocumentation,
            "ParameterList" => ParameterList,
            "Block" => Block,
            "VariableDeclarationStatement" => VariableDeclarationStatement,
            "VariableDeclaration" => VariableDeclaration,
            "ExpressionStatement" => ExpressionStatement,
            "Assignment" => Assignment,
            "BinaryOperation" => BinaryOperation,
            "UnaryOperation" => UnaryOperation,
            "Conditional" => Conditional,
            "Identifier" => Identifier,
            "Literal" => Literal,
            "MemberAccess" => MemberAccess,
            "IndexAccess" => IndexAccess,
            "FunctionCall" => FunctionCall,
            "TupleExpression" => TupleExpression,
            "ElementaryTypeName" => ElementaryTypeName,
            "ElementaryTypeNameExpression" => ElementaryTypeNameExpression,
            "Mapping" => Mapping,
            "ArrayTypeName" => ArrayTypeName,
            "IfStatement" => IfStatement,
            "ForStatement" => ForStatement,
            "WhileStatement" => WhileStatement,
            "DoWhileStatement" => DoWhileStatement,
            "Return" => Return,
            "Break" => Break,
            "Continue" => Continue,
            "InlineAssembly" => InlineAssembly,
            _ => return None,
        };
        Some(ty)
    }

    pub fn as_str(&self) -> &'static str {
        use NodeType::*;
        match self {
            SourceUnit => "SourceUnit",
            PragmaDirective => "PragmaDirective",
            ImportDirective => "ImportDirective",
            ContractDefinition => "ContractDefinition",
            InheritanceSpecifier => "InheritanceSpecifier",
            UserDefinedTypeName => "UserDefinedTypeName",
            FunctionDefinition => "FunctionDefinition",
            ModifierDefinition => "ModifierDefinition",
            EventDefinition => "EventDefinition",
            EmitStatement => "EmitStatement",
            StructDefinition => "StructDefinition",
            EnumDefinition => "EnumDefinition",
            StructuredDocumentation => "StructuredDocumentation",
            ParameterList => "ParameterList",
            Block => "Block",
            VariableDeclarationStatement => "VariableDeclarationStatement",
            VariableDeclaration => "VariableDeclaration",
            ExpressionStatement => "ExpressionStatement",
            Assignment => "Assignment",
            BinaryOperation => "BinaryOperation",
            UnaryOperation => "UnaryOperation",
            Conditional => "Conditional",
            Identifier => "Identifier",
            Literal => "Literal",
            MemberAccess => "MemberAccess",
            IndexAccess => "IndexAccess",
            FunctionCall => "FunctionCall",
            TupleExpression => "TupleExpression",
            ElementaryTypeName => "ElementaryTypeName",
            ElementaryTypeNameExpression => "ElementaryTypeNameExpression",
            Mapping => "Mapping",
            ArrayTypeName => "ArrayTypeName",
            IfStatement => "IfStatement",
            ForStatement => "ForStatement",
            WhileStatement => "WhileStatement",
            DoWhileStatement => "DoWhileStatement",
            Return => "Return",
            Break => "Break",
            Continue => "Continue",
            InlineAssembly => "InlineAssembly",
        }
    }

    /// The child fields a traversal descends into, in visiting order.
    ///
    /// `IndexAccess` visits its index before its base, so a key variable is
    /// always seen before the mapping it indexes.
    pub fn visitable_fields(&self) -> &'static [Field] {
        use Field as F;
        use NodeType::*;
        match self {
            SourceUnit | ContractDefinition => &[F::Nodes, F::BaseContracts],
            InheritanceSpecifier => &[F::BaseName],
            FunctionDefinition => &[F::Parameters, F::ReturnParameters, F::Body],
            ParameterList | EventDefinition => &[F::Parameters],
            Block => &[F::Statements],
            VariableDeclarationStatement => &[F::Declarations, F::InitialValue],
            ExpressionStatement | MemberAccess | Return => &[F::Expression],
            Assignment => &[F::LeftHandSide, F::RightHandSide],
            BinaryOperation => &[F::LeftExpression, F::RightExpression],
            UnaryOperation => &[F::SubExpression],
            Conditional => &[F::Condition, F::TrueExpression, F::FalseExpression],
            IfStatement => &[F::Condition, F::TrueBody, F::FalseBody],
            WhileStatement | DoWhileStatement => &[F::Condition, F::Body],
            ForStatement => &[
                F::InitializationExpression,
                F::Condition,
                F::LoopExpression,
                F::Body,
            ],
            VariableDeclaration => &[F::TypeName],
            Mapping => &[F::KeyType, F::ValueType],
            IndexAccess => &[F::IndexExpression, F::BaseExpression],
            TupleExpression => &[F::Components],
            FunctionCall => &[F::Expression, F::Arguments],
            ArrayTypeName => &[F::BaseType],
            ElementaryTypeNameExpression => &[F::TypeName],
            EmitStatement => &[F::EventCall],
            StructDefinition => &[F::Members],
            PragmaDirective | ImportDirective | UserDefinedTypeName | ModifierDefinition
            | EnumDefinition | StructuredDocumentation | Identifier | Literal
            | ElementaryTypeName | Break | Continue | InlineAssembly => &[],
        }
    }

    /// Source units, contracts and functions open a lexical scope.
    pub fn is_scopable(&self) -> bool {
        matches!(
            self,
            NodeType::SourceUnit | NodeType::ContractDefinition | NodeType::FunctionDefinition
        )
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name of the field through which a parent holds a child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    /// Pseudo-field holding the root node
    Ast,
    Nodes,
    BaseContracts,
    BaseName,
    Parameters,
    ReturnParameters,
    Body,
    Statements,
    Declarations,
    InitialValue,
    Expression,
    LeftHandSide,
    RightHandSide,
    LeftExpression,
    RightExpression,
    SubExpression,
    Condition,
    TrueExpression,
    FalseExpression,
    TrueBody,
    FalseBody,
    InitializationExpression,
    LoopExpression,
    TypeName,
    KeyType,
    ValueType,
    IndexExpression,
    BaseExpression,
    Components,
    Arguments,
    BaseType,
    EventCall,
    Members,
}

impl Field {
    /// The JSON key the parser uses for this field
    pub fn as_str(&self) -> &'static str {
        use Field::*;
        match self {
            Ast => "ast",
            Nodes => "nodes",
            BaseContracts => "baseContracts",
            BaseName => "baseName",
            Parameters => "parameters",
            ReturnParameters => "returnParameters",
            Body => "body",
            Statements => "statements",
            Declarations => "declarations",
            InitialValue => "initialValue",
            Expression => "expression",
            LeftHandSide => "leftHandSide",
            RightHandSide => "rightHandSide",
            LeftExpression => "leftExpression",
            RightExpression => "rightExpression",
            SubExpression => "subExpression",
            Condition => "condition",
            TrueExpression => "trueExpression",
            FalseExpression => "falseExpression",
            TrueBody => "trueBody",
            FalseBody => "falseBody",
            InitializationExpression => "initializationExpression",
            LoopExpression => "loopExpression",
            TypeName => "typeName",
            KeyType => "keyType",
            ValueType => "valueType",
            IndexExpression => "indexExpression",
            BaseExpression => "baseExpression",
            Components => "components",
            Arguments => "arguments",
            BaseType => "baseType",
            EventCall => "eventCall",
            Members => "members",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The children held under one field: a single node or an ordered list.
///
/// Lists keep `None` holes (e.g. skipped tuple components) so that list
/// indices match the input exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Children {
    One(NodeIdx),
    List(Vec<Option<NodeIdx>>),
}

impl Children {
    /// The present children with their list index (`None` for `One`)
    pub fn entries(&self) -> Vec<(Option<usize>, NodeIdx)> {
        match self {
            Children::One(idx) => vec![(None, *idx)],
            Children::List(items) => items
                .iter()
                .enumerate()
                .filter_map(|(i, c)| c.map(|idx| (Some(i), idx)))
                .collect(),
        }
    }

    pub fn contains(&self, idx: NodeIdx) -> bool {
        match self {
            Children::One(one) => *one == idx,
            Children::List(items) => items.contains(&Some(idx)),
        }
    }
}

/// `typeDescriptions` as emitted by the parser
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeDescriptions {
    #[serde(default)]
    pub type_string: Option<String>,
    #[serde(default)]
    pub type_identifier: Option<String>,
}

/// Privacy decorations attached by the decoration pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decorations {
    pub is_secret: bool,
    pub is_known: bool,
    pub is_unknown: bool,
    pub reinitialisable: bool,
    /// Function parameter declared with `per` (a domain parameter)
    pub is_per: bool,
}

impl Decorations {
    /// Union of two sets of decorations
    pub fn union(self, other: Decorations) -> Decorations {
        Decorations {
            is_secret: self.is_secret || other.is_secret,
            is_known: self.is_known || other.is_known,
            is_unknown: self.is_unknown || other.is_unknown,
            reinitialisable: self.reinitialisable || other.reinitialisable,
            is_per: self.is_per || other.is_per,
        }
    }
}

/// A named domain parameter of a secret mapping (`mapping(...) per (uint256 epoch)`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerParameter {
    #[serde(rename = "type")]
    pub ty: String,
    pub name: String,
}

/// One node of the ingested tree
#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub idx: NodeIdx,
    pub node_type: NodeType,
    /// Parser-assigned id
    pub id: DeclId,
    pub src: Src,
    pub name: Option<String>,
    pub member_name: Option<String>,
    pub operator: Option<String>,
    pub value: Option<String>,
    /// `FunctionCall.kind` (`functionCall`, `typeConversion`, ...)
    pub kind: Option<String>,
    pub type_descriptions: TypeDescriptions,
    pub referenced_declaration: Option<DeclId>,
    pub state_variable: bool,
    pub constant: bool,
    pub decorations: Decorations,
    pub per_parameters: Vec<PerParameter>,
    /// Only populated on `SourceUnit`
    pub exported_symbols: BTreeMap<String, Vec<DeclId>>,
    pub children: Vec<(Field, Children)>,
    /// JSON pointer of this node inside the input document
    pub pointer: String,
}

impl Node {
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    pub fn type_string(&self) -> &str {
        self.type_descriptions.type_string.as_deref().unwrap_or("")
    }

    pub fn type_identifier(&self) -> &str {
        self.type_descriptions
            .type_identifier
            .as_deref()
            .unwrap_or("")
    }

    pub fn operator(&self) -> &str {
        self.operator.as_deref().unwrap_or("")
    }

    pub fn slot(&self, field: Field) -> Option<&Children> {
        self.children
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, c)| c)
    }

    pub fn is(&self, node_type: NodeType) -> bool {
        self.node_type == node_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_type_names_round_trip() {
        for name in ["SourceUnit", "IndexAccess", "InlineAssembly", "DoWhileStatement"] {
            let ty = NodeType::from_name(name).unwrap();
            assert_eq!(ty.as_str(), name);
        }
        assert_eq!(NodeType::from_name("YulBlock"), None);
    }

    #[test]
    fn index_access_visits_key_first() {
        assert_eq!(
            NodeType::IndexAccess.visitable_fields(),
            &[Field::IndexExpression, Field::BaseExpression]
        );
    }

    #[test]
    fn only_units_contracts_and_functions_scope() {
        assert!(NodeType::SourceUnit.is_scopable());
        assert!(NodeType::FunctionDefinition.is_scopable());
        assert!(!NodeType::Block.is_scopable());
        assert!(!NodeType::ModifierDefinition.is_scopable());
    }

    #[test]
    fn list_children_skip_holes_but_keep_indices() {
        let children = Children::List(vec![None, Some(NodeIdx(4)), Some(NodeIdx(7))]);
        assert_eq!(
            children.entries(),
            vec![(Some(1), NodeIdx(4)), (Some(2), NodeIdx(7))]
        );
        assert!(children.contains(NodeIdx(7)));
        assert!(!children.contains(NodeIdx(5)));
    }
}
