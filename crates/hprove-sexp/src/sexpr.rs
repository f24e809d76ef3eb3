//! The S-expression value type and its canonical printer.

use std::fmt;

/// A parsed S-expression: an atom, or an application `(name arg*)`.
///
/// Atoms are applications with no arguments; `is_id` distinguishes them. The
/// name may be empty for list forms whose head is itself a list, e.g.
/// `((_ extract 3 0) x)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SExpr {
    name: String,
    args: Vec<SExpr>,
}

impl SExpr {
    /// An atom (identifier or literal).
    pub fn atom(name: impl Into<String>) -> Self {
        SExpr {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// An application `(name arg*)`.
    pub fn app(name: impl Into<String>, args: Vec<SExpr>) -> Self {
        SExpr {
            name: name.into(),
            args,
        }
    }

    /// The head name. Empty for headless lists.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The argument sequence, empty for atoms.
    pub fn args(&self) -> &[SExpr] {
        &self.args
    }

    /// The `i`-th argument, if present.
    pub fn arg(&self, i: usize) -> Option<&SExpr> {
        self.args.get(i)
    }

    /// True iff this S-expression is a plain identifier (no arguments).
    pub fn is_id(&self) -> bool {
        self.args.is_empty()
    }

    /// True iff this is the atom `name`.
    pub fn is_atom(&self, name: &str) -> bool {
        self.is_id() && self.name == name
    }

    /// Parses the atom text as a signed integer, also accepting the SMT-LIB
    /// negation form `(- n)`.
    pub fn as_i64(&self) -> Option<i64> {
        if self.is_id() {
            self.name.parse().ok()
        } else if self.name == "-" && self.args.len() == 1 {
            self.args[0].as_i64().map(|n| -n)
        } else {
            None
        }
    }
}

fn needs_quoting(name: &str) -> bool {
    name.is_empty()
        || name
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '(' | ')' | ';' | '"' | '|'))
}

fn write_name(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    if needs_quoting(name) {
        f.write_str("\"")?;
        for c in name.chars() {
            if c == '"' {
                f.write_str("\\\"")?;
            } else {
                write!(f, "{c}")?;
            }
        }
        f.write_str("\"")
    } else {
        f.write_str(name)
    }
}

impl fmt::Display for SExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_id() {
            write_name(f, &self.name)
        } else {
            f.write_str("(")?;
            if !self.name.is_empty() {
                write_name(f, &self.name)?;
            }
            for (i, arg) in self.args.iter().enumerate() {
                if i > 0 || !self.name.is_empty() {
                    f.write_str(" ")?;
                }
                write!(f, "{arg}")?;
            }
            f.write_str(")")
        }
    }
}
