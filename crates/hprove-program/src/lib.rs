//! The procedural program AST the inference engine works over.
//!
//! Programs are flat declaration lists: typed constants (some carrying the
//! existential marker), procedures with requires/ensures clauses, and
//! implementations made of labeled blocks of commands. The engine only needs
//! acyclic views of the program: the call graph and per-declaration lookup,
//! both provided here.

mod ast;
mod attributes;
mod callgraph;
mod expr;

pub use ast::{
    Block, Cmd, Constant, Implementation, Location, Procedure, Program, SpecClause, Variable,
};
pub use attributes::{keys, AttrValue, Attributes};
pub use callgraph::CallGraph;
pub use expr::{BinOp, Expr, UnOp};
