//! The checker seam between the engine and the prover.
//!
//! The engine never talks SMT directly: it hands the current assignment to an
//! [`ImplementationChecker`] and gets back an outcome plus counterexamples.
//! The production checker couples a VC generator to the batch prover; tests
//! substitute scripted checkers.

use std::collections::HashSet;

use async_trait::async_trait;
use indexmap::IndexMap;
use thiserror::Error;
use tracing::debug;

use hprove_program::{Expr, Program};
use hprove_smt::{
    calculate_path, BatchProver, CancellationToken, Model, Outcome, SolverConfig, SolverError,
};

use crate::Counterexample;

/// Errors of the inference layer.
#[derive(Debug, Error)]
pub enum HoudiniError {
    /// VC generation failed for one implementation; it gets deny-listed and
    /// the run continues.
    #[error("VC generation failed for {implementation}: {reason}")]
    VcGen {
        implementation: String,
        reason: String,
    },

    /// A solver-session failure that is not expressible as an outcome.
    #[error(transparent)]
    Solver(#[from] SolverError),

    /// The run was cancelled.
    #[error("inference cancelled")]
    Cancelled,

    /// An implementation id with no checker was scheduled.
    #[error("no checker for implementation {0}")]
    MissingChecker(String),
}

/// Result of verifying one implementation under one assignment.
#[derive(Debug)]
pub struct VerifyResult {
    pub outcome: Outcome,
    pub counterexamples: Vec<Counterexample>,
}

/// Verifies one implementation against candidate assignments.
#[async_trait]
pub trait ImplementationChecker: Send {
    /// Runs one check under `assignment` (already staged by the engine).
    async fn verify(
        &mut self,
        assignment: &IndexMap<String, bool>,
        cancel: &CancellationToken,
    ) -> Result<VerifyResult, HoudiniError>;

    /// The named assertions of the last `unsat` answer, when the session can
    /// produce them. `None` means no core information: propagation must
    /// assume every candidate is in the core.
    fn last_unsat_core(&self) -> Option<&HashSet<String>> {
        None
    }

    /// Asks the session for the unsat core of the last valid check, to
    /// refine future propagation. Sessions without core support keep `None`.
    async fn request_unsat_core(&mut self) -> Result<(), HoudiniError> {
        Ok(())
    }

    /// Releases session resources.
    async fn close(&mut self) {}
}

/// Produces one checker per implementation during engine initialization.
pub trait CheckerFactory {
    fn create(
        &mut self,
        program: &Program,
        impl_id: usize,
    ) -> Result<Box<dyn ImplementationChecker>, HoudiniError>;
}

/// A VC lowered for one check.
#[derive(Debug, Clone)]
pub struct GeneratedVc {
    /// Descriptive name, used for logging and the solver log mirror.
    pub name: String,
    /// The VC expression; the driver asserts its negation.
    pub expr: Expr,
    /// Integer identifying this procedure in the model's `ControlFlow`.
    pub control_flow_constant: i64,
    /// Extra solver commands issued inside the check scope.
    pub options: Vec<String>,
}

/// The VC-generator collaborator consumed by the production checker.
pub trait VcGen: Send {
    /// Resets accumulated axioms and declarations.
    fn setup_axiom_builder(&mut self);

    /// The common preamble: sort declarations and axioms.
    fn prepare_common(&mut self) -> String;

    /// Axioms accumulated since `prepare_common`.
    fn flush_axioms(&mut self) -> String;

    /// Renders a VC expression as SMT-LIB text.
    fn vc_expr_to_string(&self, expr: &Expr, indent: usize) -> String;

    /// Lowers the implementation body under `assignment`.
    fn generate_vc(
        &mut self,
        assignment: &IndexMap<String, bool>,
    ) -> Result<GeneratedVc, HoudiniError>;

    /// Walks the model's control-flow function to the failing label.
    fn calculate_path(
        &self,
        control_flow_constant: i64,
        model: &Model,
    ) -> Result<Vec<String>, SolverError> {
        calculate_path(model, control_flow_constant)
    }

    /// Rebuilds the counterexample named by the model's control-flow path.
    fn decode_counterexample(&self, path: &[String], model: Model) -> Option<Counterexample>;
}

/// The production checker: VC generator plus batch prover, one fresh solver
/// session per verify call.
pub struct ProverChecker {
    vcgen: Box<dyn VcGen>,
    prover: BatchProver,
    unsat_core: Option<HashSet<String>>,
}

impl ProverChecker {
    pub fn new(config: SolverConfig, vcgen: Box<dyn VcGen>) -> Result<Self, HoudiniError> {
        Ok(ProverChecker {
            vcgen,
            prover: BatchProver::new(config)?,
            unsat_core: None,
        })
    }
}

#[async_trait]
impl ImplementationChecker for ProverChecker {
    async fn verify(
        &mut self,
        assignment: &IndexMap<String, bool>,
        cancel: &CancellationToken,
    ) -> Result<VerifyResult, HoudiniError> {
        self.vcgen.setup_axiom_builder();
        let vc = self.vcgen.generate_vc(assignment)?;

        let mut preamble = self.vcgen.prepare_common();
        let axioms = self.vcgen.flush_axioms();
        if !axioms.is_empty() {
            if !preamble.is_empty() {
                preamble.push('\n');
            }
            preamble.push_str(&axioms);
        }
        let vc_text = self.vcgen.vc_expr_to_string(&vc.expr, 0);

        self.prover.new_problem(&vc.name);
        self.prover
            .begin_check(&vc.name, &preamble, &vc_text, &vc.options)
            .await?;
        let result = match self.prover.check_outcome(cancel).await {
            Ok(result) => result,
            Err(SolverError::Cancelled) => return Err(HoudiniError::Cancelled),
            Err(e) => return Err(e.into()),
        };

        let mut outcome = result.outcome;
        let mut counterexamples = Vec::new();
        if outcome == Outcome::Invalid {
            let path = result
                .model
                .as_ref()
                .and_then(|m| self.vcgen.calculate_path(vc.control_flow_constant, m).ok())
                .unwrap_or_default();
            if path.is_empty() {
                if result.had_error {
                    // An error and no path to blame: nothing to report.
                    outcome = Outcome::Undetermined;
                }
            } else if let Some(model) = result.model {
                debug!("counterexample path: {path:?}");
                if let Some(cex) = self.vcgen.decode_counterexample(&path, model) {
                    counterexamples.push(cex);
                }
            }
        }

        Ok(VerifyResult {
            outcome,
            counterexamples,
        })
    }

    fn last_unsat_core(&self) -> Option<&HashSet<String>> {
        self.unsat_core.as_ref()
    }

    async fn request_unsat_core(&mut self) -> Result<(), HoudiniError> {
        match self.prover.unsat_core() {
            Ok(core) => {
                self.unsat_core = Some(core.into_iter().collect());
                Ok(())
            }
            // Batch sessions cannot answer; propagation stays conservative.
            Err(SolverError::Unsupported(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
