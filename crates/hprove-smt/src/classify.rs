//! Response classification.
//!
//! Solver replies interleave the answers the driver is waiting for with
//! progress chatter, capability complaints, and error forms that are benign
//! in batch mode (asking for a model after `unsat`, for instance). The
//! classifier decides, per reply, whether to hand it to the caller, loop for
//! the next one, or degrade to a missing reply.

use hprove_sexp::SExpr;

/// Textual fragments of `(error ...)` replies that mean "no answer" rather
/// than a real failure.
const BENIGN_ERRORS: &[&str] = &[
    "model is not available",
    "context is unsatisfiable",
    "Cannot get model",
    "last result wasn't unknown",
];

/// Resource-limit errors propagate to the outcome parser instead of being
/// treated as failures.
pub const RESOURCE_LIMIT_FRAGMENT: &str = "max. resource limit exceeded";

/// Receives statistics lines extracted from `(progress ...)` replies.
pub trait Inspector: Send {
    fn stats_line(&mut self, line: String);
}

/// What to do with one parsed reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Hand the reply to the caller.
    Keep,
    /// Internal chatter; read the next reply.
    Swallow,
    /// Benign error; the caller sees no reply.
    SoftNull,
    /// Hard error; report it, then the caller sees no reply.
    Error(String),
}

/// Classifies one reply, forwarding progress statistics to the inspector.
pub fn classify(resp: &SExpr, inspector: Option<&mut (dyn Inspector + 'static)>) -> Classification {
    match resp.name() {
        "error" => classify_error(resp),
        "progress" => {
            if let Some(inspector) = inspector {
                forward_statistics(resp, inspector);
            }
            Classification::Swallow
        }
        "unsupported" => Classification::Swallow,
        _ => Classification::Keep,
    }
}

fn classify_error(resp: &SExpr) -> Classification {
    if let Some(arg) = resp.arg(0) {
        if arg.is_id() && arg.name().contains(RESOURCE_LIMIT_FRAGMENT) {
            return Classification::Keep;
        }
        if BENIGN_ERRORS.iter().any(|b| arg.name().contains(b)) {
            return Classification::SoftNull;
        }
        Classification::Error(arg.name().to_string())
    } else {
        Classification::Error(resp.to_string())
    }
}

/// Inspector protocol: `labels` arguments become `STATS LABELS ...` lines,
/// `:keyword` arguments become `STATS NAMED_VALUES :keyword ...` lines,
/// everything else is skipped.
fn forward_statistics(resp: &SExpr, inspector: &mut dyn Inspector) {
    for arg in resp.args() {
        if arg.name() == "labels" {
            let mut line = "STATS LABELS".to_string();
            for child in arg.args() {
                line.push(' ');
                line.push_str(child.name());
            }
            inspector.stats_line(line);
        } else if arg.name().starts_with(':') {
            let mut line = format!("STATS NAMED_VALUES {}", arg.name());
            for child in arg.args() {
                line.push(' ');
                line.push_str(child.name());
            }
            inspector.stats_line(line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Collecting(Vec<String>);
    impl Inspector for Collecting {
        fn stats_line(&mut self, line: String) {
            self.0.push(line);
        }
    }

    fn err(text: &str) -> SExpr {
        SExpr::app("error", vec![SExpr::atom(text)])
    }

    #[test]
    fn plain_answers_are_kept() {
        assert_eq!(classify(&SExpr::atom("sat"), None), Classification::Keep);
        assert_eq!(classify(&SExpr::atom("unsat"), None), Classification::Keep);
        assert_eq!(
            classify(&SExpr::app("model", vec![]), None),
            Classification::Keep
        );
    }

    #[test]
    fn resource_limit_error_propagates() {
        let resp = err("smt tactic failed: max. resource limit exceeded");
        assert_eq!(classify(&resp, None), Classification::Keep);
    }

    #[test]
    fn benign_errors_become_soft_null() {
        for text in [
            "model is not available",
            "context is unsatisfiable",
            "Cannot get model after search failure",
            "last result wasn't unknown",
        ] {
            assert_eq!(classify(&err(text), None), Classification::SoftNull);
        }
    }

    #[test]
    fn other_errors_are_reported() {
        let resp = err("unknown constant foo");
        assert_eq!(
            classify(&resp, None),
            Classification::Error("unknown constant foo".to_string())
        );
    }

    #[test]
    fn error_without_argument_stringifies() {
        let resp = SExpr::app("error", vec![]);
        assert_eq!(
            classify(&resp, None),
            Classification::Error("error".to_string())
        );
    }

    #[test]
    fn unsupported_is_swallowed() {
        assert_eq!(
            classify(&SExpr::atom("unsupported"), None),
            Classification::Swallow
        );
    }

    #[test]
    fn progress_is_swallowed_and_forwarded() {
        let resp = SExpr::app(
            "progress",
            vec![
                SExpr::app("labels", vec![SExpr::atom("L1"), SExpr::atom("L2")]),
                SExpr::app(":conflicts", vec![SExpr::atom("12")]),
                SExpr::app("other", vec![SExpr::atom("skipped")]),
            ],
        );
        let mut inspector = Collecting(Vec::new());
        assert_eq!(
            classify(&resp, Some(&mut inspector)),
            Classification::Swallow
        );
        assert_eq!(
            inspector.0,
            vec![
                "STATS LABELS L1 L2".to_string(),
                "STATS NAMED_VALUES :conflicts 12".to_string(),
            ]
        );
    }
}
