//! Verification outcomes and their derivation from solver replies.

use hprove_sexp::SExpr;

use crate::classify::RESOURCE_LIMIT_FRAGMENT;

/// Result of checking one verification condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// The condition holds (`unsat`).
    Valid,
    /// The condition is refuted by a model (`sat`).
    Invalid,
    /// The solver could not decide.
    Undetermined,
    /// The solver hit its time limit.
    TimedOut,
    /// The solver ran out of memory.
    OutOfMemory,
    /// The solver hit its resource (rlimit) budget.
    OutOfResource,
    /// The solver failed in an unexpected way.
    SolverException,
}

impl Outcome {
    /// Maps the `check-sat` reply. A missing reply (benign error, EOF)
    /// degrades to `Undetermined`.
    pub fn from_check_sat(resp: Option<&SExpr>) -> Outcome {
        let Some(resp) = resp else {
            return Outcome::Undetermined;
        };
        if resp.is_atom("sat") {
            Outcome::Invalid
        } else if resp.is_atom("unsat") {
            Outcome::Valid
        } else if resp.is_atom("unknown") {
            Outcome::Undetermined
        } else if resp.name() == "error"
            && resp
                .arg(0)
                .is_some_and(|a| a.name().contains(RESOURCE_LIMIT_FRAGMENT))
        {
            Outcome::OutOfResource
        } else {
            Outcome::SolverException
        }
    }

    /// Refines `Undetermined` with the `(get-info :reason-unknown)` reply.
    pub fn refine_with_reason(self, reason: Option<&str>) -> Outcome {
        if self != Outcome::Undetermined {
            return self;
        }
        let Some(reason) = reason else {
            return self;
        };
        if reason.contains("timeout")
            || reason.contains("canceled")
            || reason.contains("resource limit")
        {
            Outcome::TimedOut
        } else if reason.contains("memout") {
            Outcome::OutOfMemory
        } else {
            Outcome::Undetermined
        }
    }

    /// True for the outcomes that deny-list an implementation in inference.
    pub fn is_resource_exhaustion(self) -> bool {
        matches!(
            self,
            Outcome::TimedOut | Outcome::OutOfMemory | Outcome::OutOfResource
        )
    }
}

/// Extracts the reason text from a `(:reason-unknown "...")` reply.
pub fn reason_unknown_text(resp: &SExpr) -> Option<String> {
    if resp.name() == ":reason-unknown" {
        return resp.arg(0).map(|a| a.name().to_string());
    }
    // Some solvers answer `((:reason-unknown "..."))`.
    for arg in resp.args() {
        if arg.name() == ":reason-unknown" {
            return arg.arg(0).map(|a| a.name().to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_sat_mapping() {
        assert_eq!(
            Outcome::from_check_sat(Some(&SExpr::atom("sat"))),
            Outcome::Invalid
        );
        assert_eq!(
            Outcome::from_check_sat(Some(&SExpr::atom("unsat"))),
            Outcome::Valid
        );
        assert_eq!(
            Outcome::from_check_sat(Some(&SExpr::atom("unknown"))),
            Outcome::Undetermined
        );
        assert_eq!(Outcome::from_check_sat(None), Outcome::Undetermined);
    }

    #[test]
    fn resource_limit_error_maps_to_out_of_resource() {
        let resp = SExpr::app(
            "error",
            vec![SExpr::atom("smt: max. resource limit exceeded")],
        );
        assert_eq!(Outcome::from_check_sat(Some(&resp)), Outcome::OutOfResource);
    }

    #[test]
    fn garbage_maps_to_solver_exception() {
        let resp = SExpr::atom("segfault");
        assert_eq!(
            Outcome::from_check_sat(Some(&resp)),
            Outcome::SolverException
        );
    }

    #[test]
    fn reason_refinement() {
        let u = Outcome::Undetermined;
        assert_eq!(u.refine_with_reason(Some("timeout")), Outcome::TimedOut);
        assert_eq!(u.refine_with_reason(Some("canceled")), Outcome::TimedOut);
        assert_eq!(
            u.refine_with_reason(Some("(resource limit reached)")),
            Outcome::TimedOut
        );
        assert_eq!(u.refine_with_reason(Some("memout")), Outcome::OutOfMemory);
        assert_eq!(
            u.refine_with_reason(Some("incomplete quantifiers")),
            Outcome::Undetermined
        );
        // Only unknown outcomes are refined.
        assert_eq!(
            Outcome::Valid.refine_with_reason(Some("timeout")),
            Outcome::Valid
        );
    }

    #[test]
    fn reason_unknown_shapes() {
        let direct = SExpr::app(":reason-unknown", vec![SExpr::atom("timeout")]);
        assert_eq!(reason_unknown_text(&direct), Some("timeout".to_string()));

        let wrapped = SExpr::app(
            "",
            vec![SExpr::app(":reason-unknown", vec![SExpr::atom("memout")])],
        );
        assert_eq!(reason_unknown_text(&wrapped), Some("memout".to_string()));
    }
}
