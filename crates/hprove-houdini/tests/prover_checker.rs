//! The production checker against a scripted stand-in solver.

use indexmap::IndexMap;

use hprove_houdini::{
    CexKind, Counterexample, FailingAssert, GeneratedVc, HoudiniError, ImplementationChecker,
    ProverChecker, VcGen,
};
use hprove_program::{Expr, Location};
use hprove_smt::{CancellationToken, Model, Outcome, SolverConfig};

fn scripted(replies: &str) -> SolverConfig {
    SolverConfig::default()
        .with_solver_path("/bin/sh")
        .with_args(vec![
            "-c".to_string(),
            format!("cat >/dev/null\n{replies}"),
        ])
}

fn skip_without_sh() -> bool {
    if !std::path::Path::new("/bin/sh").exists() {
        eprintln!("skipping: no /bin/sh available");
        return true;
    }
    false
}

/// A VC generator with a fixed lowering; counterexamples carry the decoded
/// path in their description.
struct StaticVcGen;

impl VcGen for StaticVcGen {
    fn setup_axiom_builder(&mut self) {}

    fn prepare_common(&mut self) -> String {
        "(declare-fun x () Int)".to_string()
    }

    fn flush_axioms(&mut self) -> String {
        "(assert (>= x 0))".to_string()
    }

    fn vc_expr_to_string(&self, _expr: &Expr, _indent: usize) -> String {
        "(= x x)".to_string()
    }

    fn generate_vc(
        &mut self,
        _assignment: &IndexMap<String, bool>,
    ) -> Result<GeneratedVc, HoudiniError> {
        Ok(GeneratedVc {
            name: "P".to_string(),
            expr: Expr::TRUE,
            control_flow_constant: 17,
            options: Vec::new(),
        })
    }

    fn decode_counterexample(&self, path: &[String], model: Model) -> Option<Counterexample> {
        Some(
            Counterexample::new(
                CexKind::Assert(FailingAssert {
                    condition: Expr::TRUE,
                    loc: Location::new(1, 0),
                    description: path.join("/"),
                }),
                path.to_vec(),
            )
            .with_model(model),
        )
    }
}

#[tokio::test]
async fn valid_vc_yields_no_counterexamples() {
    if skip_without_sh() {
        return;
    }
    let config = scripted(
        "printf 'unsat\\n'\n\
         printf '(:reason-unknown \"\")\\n'\n\
         printf '(:rlimit 10)\\n'\n\
         printf '(error \"model is not available\")\\n'",
    );
    let mut checker = ProverChecker::new(config, Box::new(StaticVcGen)).unwrap();
    let result = checker
        .verify(&IndexMap::new(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.outcome, Outcome::Valid);
    assert!(result.counterexamples.is_empty());
    // Batch sessions cannot produce cores; the request is a harmless no-op.
    checker.request_unsat_core().await.unwrap();
    assert!(checker.last_unsat_core().is_none());
}

#[tokio::test]
async fn invalid_vc_decodes_the_control_flow_path() {
    if skip_without_sh() {
        return;
    }
    let config = scripted(
        "printf 'sat\\n'\n\
         printf '(:reason-unknown \"\")\\n'\n\
         printf '(:rlimit 20)\\n'\n\
         printf '(model (define-fun ControlFlow ((x!0 Int) (x!1 Int)) Int\\n'\n\
         printf ' (ite (and (= x!0 17) (= x!1 0)) 7\\n'\n\
         printf ' (ite (and (= x!0 17) (= x!1 7)) (dt Block42) 0))))\\n'",
    );
    let mut checker = ProverChecker::new(config, Box::new(StaticVcGen)).unwrap();
    let result = checker
        .verify(&IndexMap::new(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.outcome, Outcome::Invalid);
    assert_eq!(result.counterexamples.len(), 1);
    let cex = &result.counterexamples[0];
    assert_eq!(cex.trace, vec!["7".to_string(), "Block42".to_string()]);
    assert!(cex.model.is_some());
}

#[tokio::test]
async fn timeout_reason_propagates_through_the_checker() {
    if skip_without_sh() {
        return;
    }
    let config = scripted(
        "printf 'unknown\\n'\n\
         printf '(:reason-unknown \"timeout\")\\n'\n\
         printf '(:rlimit 1)\\n'\n\
         printf '(error \"Cannot get model\")\\n'",
    );
    let mut checker = ProverChecker::new(config, Box::new(StaticVcGen)).unwrap();
    let result = checker
        .verify(&IndexMap::new(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.outcome, Outcome::TimedOut);
}
