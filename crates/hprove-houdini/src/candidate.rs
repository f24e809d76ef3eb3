//! Candidate recognition and refuted annotations.

use std::collections::HashSet;

use hprove_program::{BinOp, Expr, Location};

/// Finds the candidate guarding `expr`.
///
/// An expression matches candidate `c` iff it is `c ==> b` with `c` in the
/// candidate set, or `a ==> b` where `b` matches recursively. The identity of
/// intermediate antecedents is ignored, so `p0 ==> c ==> phi` matches `c`.
pub fn match_candidate<'e>(expr: &'e Expr, candidates: &HashSet<String>) -> Option<&'e str> {
    match expr {
        Expr::Binary(BinOp::Implies, lhs, rhs) => {
            if let Some(name) = lhs.as_id() {
                if candidates.contains(name) {
                    return Some(name);
                }
            }
            match_candidate(rhs, candidates)
        }
        _ => None,
    }
}

/// Which kind of condition a refutation witnessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefutationKind {
    Requires,
    Ensures,
    Assert,
}

/// A witness that assigning a candidate true makes one specific condition
/// fail. Two refutations are equal iff all components match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RefutedAnnotation {
    pub constant: String,
    pub kind: RefutationKind,
    pub site: Location,
    /// The callee procedure, for `Requires` refutations.
    pub callee: Option<String>,
}

impl RefutedAnnotation {
    pub fn requires(
        constant: impl Into<String>,
        site: Location,
        callee: impl Into<String>,
    ) -> Self {
        RefutedAnnotation {
            constant: constant.into(),
            kind: RefutationKind::Requires,
            site,
            callee: Some(callee.into()),
        }
    }

    pub fn ensures(constant: impl Into<String>, site: Location) -> Self {
        RefutedAnnotation {
            constant: constant.into(),
            kind: RefutationKind::Ensures,
            site,
            callee: None,
        }
    }

    pub fn assertion(constant: impl Into<String>, site: Location) -> Self {
        RefutedAnnotation {
            constant: constant.into(),
            kind: RefutationKind::Assert,
            site,
            callee: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn direct_guard_matches() {
        let e = Expr::implies(Expr::id("c0"), Expr::id("phi"));
        assert_eq!(match_candidate(&e, &candidates(&["c0"])), Some("c0"));
    }

    #[test]
    fn nested_guard_matches_through_antecedents() {
        // p0 ==> c1 ==> phi: p0 is not a candidate, c1 is.
        let e = Expr::implies(
            Expr::id("p0"),
            Expr::implies(Expr::id("c1"), Expr::id("phi")),
        );
        assert_eq!(match_candidate(&e, &candidates(&["c1"])), Some("c1"));
    }

    #[test]
    fn outermost_candidate_wins() {
        let e = Expr::implies(
            Expr::id("c0"),
            Expr::implies(Expr::id("c1"), Expr::id("phi")),
        );
        assert_eq!(
            match_candidate(&e, &candidates(&["c0", "c1"])),
            Some("c0")
        );
    }

    #[test]
    fn unguarded_expressions_do_not_match() {
        assert_eq!(match_candidate(&Expr::id("c0"), &candidates(&["c0"])), None);
        let e = Expr::and(Expr::id("c0"), Expr::id("phi"));
        assert_eq!(match_candidate(&e, &candidates(&["c0"])), None);
    }

    #[test]
    fn refutation_equality_is_componentwise() {
        let site = Location::new(3, 1);
        let a = RefutedAnnotation::requires("c0", site, "P");
        let b = RefutedAnnotation::requires("c0", site, "P");
        let c = RefutedAnnotation::requires("c0", site, "Q");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, RefutedAnnotation::ensures("c0", site));
    }
}
