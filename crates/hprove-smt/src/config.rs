//! Solver configuration and binary discovery.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::SolverError;

/// Environment variable overriding the solver binary.
pub const SOLVER_ENV_VAR: &str = "HPROVE_SOLVER";

/// Which solver family the session talks to. Z3 gets the resource-limit
/// query in the batch sequence; generic SMT-LIB solvers do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverKind {
    #[default]
    Z3,
    Generic,
}

impl SolverKind {
    pub fn is_z3(self) -> bool {
        matches!(self, SolverKind::Z3)
    }
}

/// Configuration for one solver session.
#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// Solver family.
    pub kind: SolverKind,
    /// Path to the solver binary. `None` means auto-detect.
    pub solver_path: Option<PathBuf>,
    /// Arguments passed to the solver.
    pub args: Vec<String>,
    /// Wire-traffic logging: 0 silent, 1 full, 2 truncated commands.
    pub verbosity: u8,
    /// Option name used for the resource-limit query (Z3 only).
    pub rlimit_option: String,
    /// Mirror of every command sent, plus trailing comments.
    pub log_path: Option<PathBuf>,
    /// Drain window between closing stdin and killing the child.
    pub exit_grace: Duration,
    /// Install a process-wide Ctrl-C hook that terminates the session.
    pub handle_interrupts: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            kind: SolverKind::Z3,
            solver_path: None,
            args: vec!["-smt2".to_string(), "-in".to_string()],
            verbosity: 0,
            rlimit_option: ":rlimit".to_string(),
            log_path: None,
            exit_grace: Duration::from_secs(2),
            handle_interrupts: false,
        }
    }
}

impl SolverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kind(mut self, kind: SolverKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_solver_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.solver_path = Some(path.into());
        self
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    pub fn with_interrupt_handler(mut self, enabled: bool) -> Self {
        self.handle_interrupts = enabled;
        self
    }

    /// Resolves the solver binary: explicit path, then the `HPROVE_SOLVER`
    /// environment variable, then a PATH search for `z3`.
    pub fn resolve_binary(&self) -> Result<PathBuf, SolverError> {
        if let Some(path) = &self.solver_path {
            return Ok(path.clone());
        }
        if let Some(path) = env::var_os(SOLVER_ENV_VAR) {
            return Ok(PathBuf::from(path));
        }
        find_executable("z3")
            .ok_or_else(|| SolverError::NotFound("z3 not in PATH".to_string()))
    }
}

/// Finds an executable in PATH. On Windows also tries the `.exe` suffix.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    env::var_os("PATH").and_then(|paths| {
        env::split_paths(&paths).find_map(|dir| {
            let full_path = dir.join(name);
            if full_path.is_file() {
                Some(full_path)
            } else {
                #[cfg(windows)]
                {
                    let with_exe = dir.join(format!("{name}.exe"));
                    if with_exe.is_file() {
                        return Some(with_exe);
                    }
                }
                None
            }
        })
    })
}
