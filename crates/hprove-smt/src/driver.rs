//! The batch prover driver.
//!
//! A batch check is one non-interactive exchange: spawn the solver, stream
//! the whole problem, close stdin, then harvest the fixed reply tuple. The
//! wire sequence per check is: common preamble, `(push 1)`, the negated VC,
//! optimization requests, `(check-sat)`, `(get-info :reason-unknown)`,
//! `(get-info :rlimit)` on Z3, `(get-model)`, `(pop 1)`, EOF.
//!
//! Every command is mirrored to the optional log file; comments arriving
//! after end-of-input still go to the log, never to the solver.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use hprove_sexp::SExpr;

use crate::outcome::{reason_unknown_text, Outcome};
use crate::{CancellationToken, Model, ModelElement, SmtProcess, SolverConfig, SolverError};

/// The name of the model function encoding the verified path.
const CONTROL_FLOW_FUNC: &str = "ControlFlow";

/// Harvested replies of one batch check.
#[derive(Debug)]
pub struct CheckResult {
    pub outcome: Outcome,
    pub reason_unknown: Option<String>,
    /// Z3's reported resource count, when available.
    pub rlimit: Option<u64>,
    /// The counterexample model, absent on `unsat` and on solver errors.
    pub model: Option<Model>,
    /// Whether a hard solver error was reported during the check.
    pub had_error: bool,
}

/// Batch prover: one solver session per VC check.
pub struct BatchProver {
    config: SolverConfig,
    process: Option<SmtProcess>,
    log: Option<LogMirror>,
    error_flag: Arc<AtomicBool>,
}

impl BatchProver {
    pub fn new(config: SolverConfig) -> Result<Self, SolverError> {
        let log = match &config.log_path {
            Some(path) => Some(LogMirror::open(path)?),
            None => None,
        };
        Ok(BatchProver {
            config,
            process: None,
            log,
            error_flag: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Marks a problem boundary in the log.
    pub fn new_problem(&mut self, name: &str) {
        self.log_comment(&format!("new problem: {name}"));
    }

    /// Spawns a fresh session and streams the whole check. The session is
    /// then read-only until `check_outcome` drains it.
    pub async fn begin_check(
        &mut self,
        name: &str,
        preamble: &str,
        vc: &str,
        options: &[String],
    ) -> Result<(), SolverError> {
        debug!("begin check: {name}");
        self.error_flag = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&self.error_flag);
        let mut process = SmtProcess::spawn_with_handler(
            &self.config,
            Arc::new(move |msg| {
                flag.store(true, Ordering::SeqCst);
                tracing::error!("solver: {msg}");
            }),
        )?;
        if self.config.handle_interrupts {
            process.install_interrupt_handler();
        }
        process.new_problem(name);
        self.log_comment(&format!("begin check: {name}"));

        for line in preamble.lines() {
            self.send_logged(&mut process, line).await?;
        }
        self.send_logged(&mut process, "(push 1)").await?;
        self.send_logged(&mut process, &format!("(assert (not\n{vc}\n))"))
            .await?;
        for opt in options {
            self.send_logged(&mut process, opt).await?;
        }
        self.send_logged(&mut process, "(check-sat)").await?;
        self.send_logged(&mut process, "(get-info :reason-unknown)")
            .await?;
        if self.config.kind.is_z3() {
            let cmd = format!("(get-info {})", self.config.rlimit_option);
            self.send_logged(&mut process, &cmd).await?;
        }
        self.send_logged(&mut process, "(get-model)").await?;
        self.send_logged(&mut process, "(pop 1)").await?;
        process.indicate_end_of_input();

        self.process = Some(process);
        Ok(())
    }

    /// Harvests the reply tuple of the pending check: outcome,
    /// reason-unknown, rlimit (Z3 only), model. Each await is
    /// cancellation-aware; cancellation tears the session down.
    pub async fn check_outcome(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<CheckResult, SolverError> {
        let mut process = self
            .process
            .take()
            .ok_or_else(|| SolverError::Solver("no check in progress".to_string()))?;
        let is_z3 = self.config.kind.is_z3();
        let error_flag = Arc::clone(&self.error_flag);
        let result = Self::harvest(is_z3, error_flag, &mut process, cancel).await;
        process.close().await;
        result
    }

    async fn harvest(
        is_z3: bool,
        error_flag: Arc<AtomicBool>,
        process: &mut SmtProcess,
        cancel: &CancellationToken,
    ) -> Result<CheckResult, SolverError> {
        let outcome_resp = await_cancellable(process, cancel).await?;
        let reason_resp = await_cancellable(process, cancel).await?;
        let rlimit_resp = if is_z3 {
            await_cancellable(process, cancel).await?
        } else {
            None
        };
        let model_resp = await_cancellable(process, cancel).await?;

        let reason = reason_resp.as_ref().and_then(reason_unknown_text);
        let outcome =
            Outcome::from_check_sat(outcome_resp.as_ref()).refine_with_reason(reason.as_deref());
        let rlimit = rlimit_resp.as_ref().and_then(parse_rlimit);
        let model = model_resp.as_ref().and_then(|resp| Model::parse(resp).ok());

        Ok(CheckResult {
            outcome,
            reason_unknown: reason,
            rlimit,
            model,
            had_error: error_flag.load(Ordering::SeqCst),
        })
    }

    /// Writes a comment to the log only. Legal after end-of-input.
    pub fn log_comment(&mut self, text: &str) {
        if let Some(log) = &mut self.log {
            log.comment(text);
        }
    }

    async fn send_logged(
        &mut self,
        process: &mut SmtProcess,
        cmd: &str,
    ) -> Result<(), SolverError> {
        if let Some(log) = &mut self.log {
            log.line(cmd);
        }
        process.send(cmd).await
    }

    /// Not available in batch mode.
    pub fn evaluate(&mut self, _expr: &str) -> Result<SExpr, SolverError> {
        Err(SolverError::Unsupported("evaluate"))
    }

    /// Not available in batch mode.
    pub fn check(&mut self) -> Result<Outcome, SolverError> {
        Err(SolverError::Unsupported("check"))
    }

    /// Not available in batch mode.
    pub fn unsat_core(&mut self) -> Result<Vec<String>, SolverError> {
        Err(SolverError::Unsupported("unsat core"))
    }

    /// Not available in batch mode.
    pub fn check_assumptions(&mut self, _assumptions: &[String]) -> Result<Outcome, SolverError> {
        Err(SolverError::Unsupported("check assumptions"))
    }
}

async fn await_cancellable(
    process: &mut SmtProcess,
    cancel: &CancellationToken,
) -> Result<Option<SExpr>, SolverError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(SolverError::Cancelled),
        resp = process.await_response() => Ok(resp),
    }
}

fn parse_rlimit(resp: &SExpr) -> Option<u64> {
    let entry = if resp.name().starts_with(':') {
        Some(resp)
    } else {
        resp.args().iter().find(|a| a.name().starts_with(':'))
    };
    entry
        .and_then(|e| e.arg(0))
        .and_then(SExpr::as_i64)
        .and_then(|n| u64::try_from(n).ok())
}

/// Walks the model's `ControlFlow` function from state 0 and returns the
/// path of visited states, ending at the first datatype label.
///
/// `control_flow_constant` is the integer identifying the procedure under
/// check. The walk is capped by the table size, so a cyclic model yields an
/// error instead of a hang.
pub fn calculate_path(
    model: &Model,
    control_flow_constant: i64,
) -> Result<Vec<String>, SolverError> {
    let Some(func) = model.func(CONTROL_FLOW_FUNC) else {
        return Ok(Vec::new());
    };
    let cap = func.entries.len() + 1;

    let mut path = Vec::new();
    let mut state = 0i64;
    loop {
        if path.len() >= cap {
            return Err(SolverError::UnexpectedReply(
                "cyclic ControlFlow function in model".to_string(),
            ));
        }
        let next = model
            .eval_app(
                CONTROL_FLOW_FUNC,
                &[
                    ModelElement::Int(control_flow_constant),
                    ModelElement::Int(state),
                ],
            )
            .ok_or_else(|| {
                SolverError::UnexpectedReply(format!(
                    "ControlFlow undefined at state {state}"
                ))
            })?;
        match next {
            ModelElement::DataValue { args, .. } if !args.is_empty() => {
                path.push(args[0].to_string());
                return Ok(path);
            }
            ModelElement::Int(n) => {
                path.push(n.to_string());
                state = n;
            }
            other => {
                return Err(SolverError::UnexpectedReply(format!(
                    "unexpected ControlFlow step: {other}"
                )))
            }
        }
    }
}

struct LogMirror {
    file: BufWriter<File>,
}

impl LogMirror {
    fn open(path: &Path) -> Result<Self, SolverError> {
        Ok(LogMirror {
            file: BufWriter::new(File::create(path)?),
        })
    }

    fn line(&mut self, text: &str) {
        // Log failures must not fail the check.
        let _ = writeln!(self.file, "{text}");
        let _ = self.file.flush();
    }

    fn comment(&mut self, text: &str) {
        self.line(&format!("; {text}"));
    }
}
