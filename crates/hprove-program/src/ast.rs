//! Program declarations.

use indexmap::IndexMap;

use crate::attributes::keys;
use crate::{Attributes, CallGraph, Expr};

/// A source position. Failing sites are keyed by `line * 1000 + column`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(line: u32, column: u32) -> Self {
        Location { line, column }
    }

    /// The order key used by counterexample comparison.
    pub fn key(&self) -> u64 {
        u64::from(self.line) * 1000 + u64::from(self.column)
    }
}

/// A typed program constant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constant {
    pub name: String,
    pub typ: String,
    pub attributes: Attributes,
}

impl Constant {
    pub fn new(name: impl Into<String>, typ: impl Into<String>) -> Self {
        Constant {
            name: name.into(),
            typ: typ.into(),
            attributes: Attributes::new(),
        }
    }

    /// True for boolean constants whose value the engine infers.
    pub fn is_existential(&self) -> bool {
        self.attributes.get_bool(keys::EXISTENTIAL) == Some(true)
    }
}

/// A global or local program variable, tracked for model projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub typ: String,
}

impl Variable {
    pub fn new(name: impl Into<String>, typ: impl Into<String>) -> Self {
        Variable {
            name: name.into(),
            typ: typ.into(),
        }
    }
}

/// A requires or ensures clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecClause {
    pub condition: Expr,
    /// Free clauses are assumed, never checked.
    pub free: bool,
    pub attributes: Attributes,
    pub loc: Location,
}

impl SpecClause {
    pub fn checked(condition: Expr, loc: Location) -> Self {
        SpecClause {
            condition,
            free: false,
            attributes: Attributes::new(),
            loc,
        }
    }
}

/// A procedure signature with its contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Procedure {
    pub name: String,
    pub requires: Vec<SpecClause>,
    pub ensures: Vec<SpecClause>,
}

impl Procedure {
    pub fn new(name: impl Into<String>) -> Self {
        Procedure {
            name: name.into(),
            requires: Vec::new(),
            ensures: Vec::new(),
        }
    }
}

/// A basic-block command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cmd {
    Assert {
        condition: Expr,
        attributes: Attributes,
        loc: Location,
    },
    Assume {
        condition: Expr,
        attributes: Attributes,
    },
    Call {
        callee: String,
        attributes: Attributes,
        loc: Location,
    },
    Assign {
        target: String,
        value: Expr,
    },
}

impl Cmd {
    /// The capture-state label, for assume commands that record one.
    pub fn capture_state(&self) -> Option<&str> {
        match self {
            Cmd::Assume { attributes, .. } => attributes.get_str(keys::CAPTURE_STATE),
            _ => None,
        }
    }
}

/// A labeled basic block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub label: String,
    pub cmds: Vec<Cmd>,
}

impl Block {
    pub fn new(label: impl Into<String>, cmds: Vec<Cmd>) -> Self {
        Block {
            label: label.into(),
            cmds,
        }
    }
}

/// An implementation of a procedure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Implementation {
    pub name: String,
    /// The implemented procedure.
    pub proc: String,
    pub blocks: Vec<Block>,
}

impl Implementation {
    pub fn new(name: impl Into<String>, proc: impl Into<String>, blocks: Vec<Block>) -> Self {
        Implementation {
            name: name.into(),
            proc: proc.into(),
            blocks,
        }
    }

    /// Procedures called from this implementation, in order of appearance.
    pub fn callees(&self) -> Vec<&str> {
        let mut out = Vec::new();
        for block in &self.blocks {
            for cmd in &block.cmds {
                if let Cmd::Call { callee, .. } = cmd {
                    out.push(callee.as_str());
                }
            }
        }
        out
    }
}

/// A whole program: constants, variables, procedures, implementations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    pub constants: Vec<Constant>,
    pub variables: Vec<Variable>,
    pub procedures: IndexMap<String, Procedure>,
    pub implementations: Vec<Implementation>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_constant(&mut self, constant: Constant) {
        self.constants.push(constant);
    }

    pub fn add_procedure(&mut self, procedure: Procedure) {
        self.procedures.insert(procedure.name.clone(), procedure);
    }

    pub fn add_implementation(&mut self, implementation: Implementation) {
        self.implementations.push(implementation);
    }

    pub fn constant(&self, name: &str) -> Option<&Constant> {
        self.constants.iter().find(|c| c.name == name)
    }

    pub fn procedure(&self, name: &str) -> Option<&Procedure> {
        self.procedures.get(name)
    }

    pub fn procedure_mut(&mut self, name: &str) -> Option<&mut Procedure> {
        self.procedures.get_mut(name)
    }

    pub fn implementation(&self, id: usize) -> Option<&Implementation> {
        self.implementations.get(id)
    }

    /// Index of the implementation of `proc`, if any.
    pub fn implementation_of(&self, proc: &str) -> Option<usize> {
        self.implementations.iter().position(|i| i.proc == proc)
    }

    /// Removes a constant declaration.
    pub fn remove_constant(&mut self, name: &str) {
        self.constants.retain(|c| c.name != name);
    }

    /// The call graph over implementations. Calls to procedures without an
    /// implementation do not contribute edges.
    pub fn call_graph(&self) -> CallGraph {
        CallGraph::build(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AttrValue;

    #[test]
    fn existential_marker() {
        let mut c = Constant::new("c0", "bool");
        assert!(!c.is_existential());
        c.attributes.set(keys::EXISTENTIAL, AttrValue::Bool(true));
        assert!(c.is_existential());
    }

    #[test]
    fn location_key_packs_line_and_column() {
        assert_eq!(Location::new(12, 34).key(), 12034);
    }

    #[test]
    fn callees_in_order() {
        let implementation = Implementation::new(
            "A",
            "A",
            vec![Block::new(
                "entry",
                vec![
                    Cmd::Call {
                        callee: "B".to_string(),
                        attributes: Attributes::new(),
                        loc: Location::default(),
                    },
                    Cmd::Call {
                        callee: "C".to_string(),
                        attributes: Attributes::new(),
                        loc: Location::default(),
                    },
                ],
            )],
        );
        assert_eq!(implementation.callees(), vec!["B", "C"]);
    }

    #[test]
    fn capture_state_reads_the_attribute() {
        let mut attributes = Attributes::new();
        attributes.set(keys::CAPTURE_STATE, AttrValue::String("head".into()));
        let cmd = Cmd::Assume {
            condition: Expr::TRUE,
            attributes,
        };
        assert_eq!(cmd.capture_state(), Some("head"));
        let plain = Cmd::Assume {
            condition: Expr::TRUE,
            attributes: Attributes::new(),
        };
        assert_eq!(plain.capture_state(), None);
    }
}
