//! SMT solver plumbing: the process session, response classification, and
//! the batch prover driver.
//!
//! A [`SmtProcess`] owns one solver subprocess and its pipes; commands go in
//! over stdin, replies come back as S-expressions demultiplexed by the
//! [`classify`] table. [`BatchProver`] arranges the full command sequence for
//! a single verification condition and harvests the fixed reply tuple into an
//! [`Outcome`].

mod cancel;
mod classify;
mod config;
mod driver;
mod error;
mod model;
mod outcome;
mod process;

pub use cancel::CancellationToken;
pub use classify::{classify, Classification, Inspector};
pub use config::{find_executable, SolverConfig, SolverKind, SOLVER_ENV_VAR};
pub use driver::{calculate_path, BatchProver, CheckResult};
pub use error::SolverError;
pub use model::{Model, ModelElement, ModelFunc};
pub use outcome::{reason_unknown_text, Outcome};
pub use process::{SessionErrorHandler, SmtProcess};
