//! veil-ast: arena representation of a privacy-annotated contract AST
//!
//! The external parser emits a JSON tree of `nodeType`-tagged objects, with
//! `isSecret`/`isKnown`/`isUnknown`/`reinitialisable` decorations already
//! attached. This crate ingests that tree into an [`Ast`]: every reachable
//! node gets a stable [`NodeIdx`] in source order, node kinds form the closed
//! [`NodeType`] enum, and parent/child links are recorded per [`Field`].
//!
//! # Example
//!
//! ```
//! use veil_ast::{Ast, AstBuilder, Decorate};
//!
//! let mut b = AstBuilder::new();
//! let total = b.state_var("total", "uint256").secret();
//! let contract = b.contract("Vault", vec![total.node.clone()]);
//! let unit = b.source_unit(vec![contract]);
//!
//! let ast = Ast::from_json(unit).unwrap();
//! assert!(ast.by_decl_id(total.id).is_some());
//! ```

mod builder;
mod error;
mod node;
mod span;
mod tree;

pub use builder::{
    AstBuilder, Decl, Decorate, MSG_DECLARATION, REQUIRE_DECLARATION, REVERT_DECLARATION,
    THIS_DECLARATION,
};
pub use error::AstError;
pub use node::{
    Children, DeclId, Decorations, Field, Node, NodeIdx, NodeType, PerParameter,
    TypeDescriptions,
};
pub use span::Src;
pub use tree::Ast;
