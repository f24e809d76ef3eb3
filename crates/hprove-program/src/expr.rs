//! Boolean program expressions.

use std::collections::HashMap;
use std::fmt;

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnOp {
    Not,
}

/// Binary operators. `Implies` is right-associative in the surface syntax,
/// which is what makes candidate guards `c ==> p0 ==> phi` nest to the right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Implies,
    And,
    Or,
    Eq,
}

/// An expression over program variables and constants.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    Id(String),
    BoolLit(bool),
    IntLit(i64),
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Apply(String, Vec<Expr>),
}

impl Expr {
    pub fn id(name: impl Into<String>) -> Expr {
        Expr::Id(name.into())
    }

    pub fn implies(lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary(BinOp::Implies, Box::new(lhs), Box::new(rhs))
    }

    pub fn and(lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs))
    }

    pub fn not(e: Expr) -> Expr {
        Expr::Unary(UnOp::Not, Box::new(e))
    }

    pub const TRUE: Expr = Expr::BoolLit(true);
    pub const FALSE: Expr = Expr::BoolLit(false);

    /// The identifier name, if this is a plain identifier.
    pub fn as_id(&self) -> Option<&str> {
        match self {
            Expr::Id(name) => Some(name),
            _ => None,
        }
    }

    /// Replaces identifiers per `map`, everywhere.
    pub fn substitute(&self, map: &HashMap<String, Expr>) -> Expr {
        match self {
            Expr::Id(name) => map.get(name).cloned().unwrap_or_else(|| self.clone()),
            Expr::BoolLit(_) | Expr::IntLit(_) => self.clone(),
            Expr::Unary(op, e) => Expr::Unary(*op, Box::new(e.substitute(map))),
            Expr::Binary(op, lhs, rhs) => Expr::Binary(
                *op,
                Box::new(lhs.substitute(map)),
                Box::new(rhs.substitute(map)),
            ),
            Expr::Apply(f, args) => Expr::Apply(
                f.clone(),
                args.iter().map(|a| a.substitute(map)).collect(),
            ),
        }
    }

    /// All identifier names mentioned in the expression.
    pub fn idents(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_idents(&mut out);
        out
    }

    fn collect_idents<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Id(name) => out.push(name),
            Expr::BoolLit(_) | Expr::IntLit(_) => {}
            Expr::Unary(_, e) => e.collect_idents(out),
            Expr::Binary(_, lhs, rhs) => {
                lhs.collect_idents(out);
                rhs.collect_idents(out);
            }
            Expr::Apply(_, args) => {
                for a in args {
                    a.collect_idents(out);
                }
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Id(name) => write!(f, "{name}"),
            Expr::BoolLit(b) => write!(f, "{b}"),
            Expr::IntLit(n) => write!(f, "{n}"),
            Expr::Unary(UnOp::Not, e) => write!(f, "!({e})"),
            Expr::Binary(op, lhs, rhs) => {
                let sym = match op {
                    BinOp::Implies => "==>",
                    BinOp::And => "&&",
                    BinOp::Or => "||",
                    BinOp::Eq => "==",
                };
                write!(f, "({lhs} {sym} {rhs})")
            }
            Expr::Apply(name, args) => {
                write!(f, "{name}(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitute_replaces_ids() {
        let e = Expr::implies(Expr::id("c"), Expr::id("p"));
        let mut map = HashMap::new();
        map.insert("c".to_string(), Expr::TRUE);
        assert_eq!(
            e.substitute(&map),
            Expr::implies(Expr::TRUE, Expr::id("p"))
        );
    }

    #[test]
    fn idents_are_collected_in_order() {
        let e = Expr::and(
            Expr::implies(Expr::id("a"), Expr::id("b")),
            Expr::not(Expr::id("c")),
        );
        assert_eq!(e.idents(), vec!["a", "b", "c"]);
    }

    #[test]
    fn display_is_readable() {
        let e = Expr::implies(Expr::id("c"), Expr::FALSE);
        assert_eq!(e.to_string(), "(c ==> false)");
    }
}
