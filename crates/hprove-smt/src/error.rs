//! Error taxonomy for the solver session and driver.

use thiserror::Error;

/// Errors from the solver session and the batch driver.
///
/// Benign solver chatter (model unavailable, unsat context) never surfaces
/// here; the classifier degrades it to a missing reply instead.
#[derive(Debug, Error)]
pub enum SolverError {
    /// The solver executable could not be started.
    #[error("failed to start solver process: {0}")]
    ProcessStart(String),

    /// No solver binary was found or configured.
    #[error("no solver executable found ({0})")]
    NotFound(String),

    /// I/O failure on one of the solver pipes.
    #[error("solver i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A command was sent after end-of-input was indicated.
    #[error("solver input already closed")]
    InputClosed,

    /// The solver reported a hard error.
    #[error("solver error: {0}")]
    Solver(String),

    /// The operation is not available on the batch driver.
    #[error("{0} is not supported in batch mode")]
    Unsupported(&'static str),

    /// A reply could not be interpreted.
    #[error("unexpected solver reply: {0}")]
    UnexpectedReply(String),

    /// The check was cancelled through its cancellation token.
    #[error("check cancelled")]
    Cancelled,
}
