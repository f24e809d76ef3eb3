//! The solver process session.
//!
//! One `SmtProcess` owns one solver subprocess and its three pipes. Two
//! background tasks drain stdout and stderr: stdout lines feed an unbounded
//! channel consumed by `await_response`, stderr lines are logged and handed
//! to the error handler. Commands are written to stdin in submission order;
//! replies are consumed in the same order, one pending await at a time.
//!
//! When the child exits, the stdout task drops the channel sender, so any
//! pending `await_response` resolves with `None` exactly once.

use std::borrow::Cow;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use hprove_sexp::{SExpr, SExprReader};

use crate::{classify, CancellationToken, Classification, Inspector, SolverConfig, SolverError};

static SESSION_COUNTER: AtomicUsize = AtomicUsize::new(0);
static TOTAL_USER_TIME_MICROS: AtomicU64 = AtomicU64::new(0);

/// Receives hard solver errors: stderr lines, parse errors, and `(error ...)`
/// replies that are not benign.
pub type SessionErrorHandler = Arc<dyn Fn(String) + Send + Sync>;

/// A live solver session.
///
/// `Debug` prints only the session id; the pipes, background tasks, and
/// trait objects it owns aren't printable.
pub struct SmtProcess {
    id: usize,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    lines: UnboundedReceiver<String>,
    reader: SExprReader,
    inspector: Option<Box<dyn Inspector>>,
    on_error: SessionErrorHandler,
    verbosity: u8,
    exit_grace: Duration,
    usage_at_spawn: Option<u64>,
    interrupt: CancellationToken,
    interrupt_task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for SmtProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtProcess").field("id", &self.id).finish()
    }
}

impl SmtProcess {
    /// Spawns the solver with errors routed to `tracing::error!`.
    pub fn spawn(config: &SolverConfig) -> Result<Self, SolverError> {
        Self::spawn_with_handler(
            config,
            Arc::new(|msg| tracing::error!("solver: {msg}")),
        )
    }

    /// Spawns the solver with a custom error handler.
    pub fn spawn_with_handler(
        config: &SolverConfig,
        on_error: SessionErrorHandler,
    ) -> Result<Self, SolverError> {
        let binary = config.resolve_binary()?;
        let id = SESSION_COUNTER.fetch_add(1, Ordering::SeqCst);
        let usage_at_spawn = children_user_micros();

        let mut child = Command::new(&binary)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SolverError::ProcessStart(format!("{}: {e}", binary.display()))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SolverError::ProcessStart("no stdin pipe".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SolverError::ProcessStart("no stdout pipe".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SolverError::ProcessStart("no stderr pipe".to_string()))?;

        let (tx, lines) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                if tx.send(line).is_err() {
                    break;
                }
            }
            // tx drops here; the channel closure is the EOF signal.
        });

        let stderr_handler = Arc::clone(&on_error);
        tokio::spawn(async move {
            let mut reader = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                warn!(session = id, "solver stderr: {line}");
                stderr_handler(line);
            }
        });

        let parse_handler = Arc::clone(&on_error);
        let reader = SExprReader::with_handler(Box::new(move |msg| {
            parse_handler(format!("parse error: {msg}"))
        }));

        debug!(session = id, solver = %binary.display(), "solver session started");
        Ok(SmtProcess {
            id,
            child: Some(child),
            stdin: Some(stdin),
            lines,
            reader,
            inspector: None,
            on_error,
            verbosity: config.verbosity,
            exit_grace: config.exit_grace,
            usage_at_spawn,
            interrupt: CancellationToken::new(),
            interrupt_task: None,
        })
    }

    /// The per-session id used in log lines.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Routes `(progress ...)` statistics to `inspector`.
    pub fn set_inspector(&mut self, inspector: Box<dyn Inspector>) {
        self.inspector = Some(inspector);
    }

    /// Logs a problem boundary. Batch sessions see exactly one problem.
    pub fn new_problem(&mut self, name: &str) {
        debug!(session = self.id, "new problem: {name}");
    }

    /// Writes one command line to the solver.
    pub async fn send(&mut self, cmd: &str) -> Result<(), SolverError> {
        self.log_traffic("->", cmd);
        let stdin = self.stdin.as_mut().ok_or(SolverError::InputClosed)?;
        stdin.write_all(cmd.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Closes stdin. No further commands can be sent afterwards.
    pub fn indicate_end_of_input(&mut self) {
        if self.stdin.take().is_some() {
            debug!(session = self.id, "solver stdin closed");
        }
    }

    /// Reads the next reply the caller should see. Progress chatter and
    /// `unsupported` are swallowed; benign errors, hard errors (after
    /// reporting), parse errors, and EOF all yield `None`.
    ///
    /// A termination request trips a pending await: the session closes
    /// (stdin first, then the drain window, then the kill) and the caller
    /// sees no reply.
    pub async fn await_response(&mut self) -> Option<SExpr> {
        loop {
            let interrupt = self.interrupt.clone();
            let step = tokio::select! {
                _ = interrupt.cancelled() => None,
                resp = self.reader.read_from(&mut self.lines) => Some(resp),
            };
            let resp = match step {
                None => {
                    warn!(session = self.id, "termination requested, closing solver");
                    self.close().await;
                    return None;
                }
                Some(None) => return None,
                Some(Some(resp)) => resp,
            };
            if self.verbosity > 0 {
                let text = resp.to_string();
                self.log_traffic("<-", &text);
            }
            match self.classify_reply(&resp) {
                Classification::Keep => return Some(resp),
                Classification::Swallow => continue,
                Classification::SoftNull => return None,
                Classification::Error(msg) => {
                    (self.on_error)(msg);
                    return None;
                }
            }
        }
    }

    /// Classifies one reply, forwarding progress statistics to the
    /// inspector. Split out so the `self.inspector` borrow does not
    /// outlive the call, keeping it disjoint from the surrounding loop's
    /// use of `self` across `.await` points.
    fn classify_reply(&mut self, resp: &SExpr) -> Classification {
        let inspector: Option<&mut dyn Inspector> = self.inspector.as_deref_mut();
        classify(resp, inspector)
    }

    /// Installs a process-wide Ctrl-C hook that requests termination. The
    /// request is observed by the pending (or next) response await, which
    /// closes the session through the regular path: stdin closed, the drain
    /// window, then the kill. Deregistered on `close`.
    pub fn install_interrupt_handler(&mut self) {
        if let Some(task) = self.interrupt_task.take() {
            task.abort();
        }
        let interrupt = self.interrupt.clone();
        let id = self.id;
        self.interrupt_task = Some(tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!(session = id, "interrupt received, requesting solver termination");
                interrupt.cancel();
            }
        }));
    }

    /// A handle that requests session termination when cancelled. The Ctrl-C
    /// hook trips it; embedders can trip it from their own signal handling.
    pub fn termination_handle(&self) -> CancellationToken {
        self.interrupt.clone()
    }

    /// Closes the session: stdin is closed, the child gets the configured
    /// drain window to exit, then is killed. The child's user CPU time is
    /// folded into the global accumulator.
    pub async fn close(&mut self) {
        if let Some(task) = self.interrupt_task.take() {
            task.abort();
        }
        self.indicate_end_of_input();
        if let Some(mut child) = self.child.take() {
            match tokio::time::timeout(self.exit_grace, child.wait()).await {
                Ok(Ok(status)) => {
                    debug!(session = self.id, %status, "solver exited");
                }
                Ok(Err(e)) => {
                    warn!(session = self.id, "failed to reap solver: {e}");
                }
                Err(_) => {
                    warn!(
                        session = self.id,
                        "solver still running after {:?}, killing", self.exit_grace
                    );
                    if let Err(e) = child.kill().await {
                        warn!(session = self.id, "failed to kill solver: {e}");
                    }
                }
            }
            self.record_user_time();
        }
    }

    /// Total user CPU time of all closed solver children, process-wide.
    pub fn total_user_time() -> Duration {
        Duration::from_micros(TOTAL_USER_TIME_MICROS.load(Ordering::Relaxed))
    }

    fn record_user_time(&mut self) {
        match (self.usage_at_spawn.take(), children_user_micros()) {
            (Some(before), Some(after)) if after >= before => {
                TOTAL_USER_TIME_MICROS.fetch_add(after - before, Ordering::Relaxed);
            }
            _ => warn!(session = self.id, "could not read solver user time"),
        }
    }

    fn log_traffic(&self, direction: &str, text: &str) {
        match self.verbosity {
            0 => {}
            1 => debug!(session = self.id, "{direction} {text}"),
            _ => {
                let shown = truncate_command(text);
                debug!(session = self.id, "{direction} {shown}");
            }
        }
    }
}

fn truncate_command(text: &str) -> Cow<'_, str> {
    const LIMIT: usize = 50;
    if text.chars().count() > LIMIT {
        let prefix: String = text.chars().take(LIMIT).collect();
        Cow::Owned(format!("{prefix}..."))
    } else {
        Cow::Borrowed(text)
    }
}

/// Cumulative user CPU time of reaped children, in microseconds.
#[cfg(unix)]
fn children_user_micros() -> Option<u64> {
    let mut usage = std::mem::MaybeUninit::<libc::rusage>::zeroed();
    // SAFETY: RUSAGE_CHILDREN with a properly sized out-pointer.
    let rc = unsafe { libc::getrusage(libc::RUSAGE_CHILDREN, usage.as_mut_ptr()) };
    if rc != 0 {
        return None;
    }
    let usage = unsafe { usage.assume_init() };
    let secs = u64::try_from(usage.ru_utime.tv_sec).ok()?;
    let micros = u64::try_from(usage.ru_utime.tv_usec).ok()?;
    Some(secs * 1_000_000 + micros)
}

#[cfg(not(unix))]
fn children_user_micros() -> Option<u64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_commands_are_truncated_for_logs() {
        let long = "x".repeat(80);
        let shown = truncate_command(&long);
        assert_eq!(shown.len(), 53);
        assert!(shown.ends_with("..."));

        let short = "(check-sat)";
        assert_eq!(truncate_command(short), short);
    }
}
