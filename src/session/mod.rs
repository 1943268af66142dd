//! Asynchronous script execution with cooperative cancellation.
//!
//! At most one run is active at a time. The launching call returns as soon
//! as the background supervision task is up; that task owns the child
//! process exclusively, forwards its output through the demultiplexer, and
//! brings the state machine back to idle whatever the run's fate.

pub mod invoke;
pub mod stream;

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::EngineError;
use crate::errorlog::ErrorSink;
use invoke::{Invocation, PROGRESS_MARKER};
use stream::{ErrorFields, OutputRecord, SharedBuffers, StreamDemux};

/// `Idle -> Running -> Idle` on normal completion,
/// `Running -> CancelRequested -> Idle` on a user stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionState {
    #[default]
    Idle,
    Running,
    CancelRequested,
}

/// Terminal result of one run.
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    pub cancelled: bool,
    pub exit_code: Option<i32>,
    /// Last exception text seen on the error channel, empty if none.
    pub error_exception: String,
}

/// Live view of one run: the record stream plus the supervision task's
/// join handle, which resolves to the outcome.
pub struct RunHandle {
    pub records: mpsc::UnboundedReceiver<OutputRecord>,
    pub done: JoinHandle<RunOutcome>,
}

pub struct ExecutionSession {
    state_tx: watch::Sender<ExecutionState>,
    /// Current run's cancellation token. Doubles as the transition lock for
    /// the state machine so cancel and completion cannot interleave badly.
    cancel: Mutex<CancellationToken>,
    buffers: SharedBuffers,
    error_log: Arc<dyn ErrorSink>,
    custom_prefix: String,
    poll_interval: Duration,
}

impl ExecutionSession {
    pub fn new(
        buffers: SharedBuffers,
        error_log: Arc<dyn ErrorSink>,
        custom_prefix: String,
        poll_interval: Duration,
    ) -> Arc<Self> {
        let (state_tx, _) = watch::channel(ExecutionState::Idle);
        Arc::new(Self {
            state_tx,
            cancel: Mutex::new(CancellationToken::new()),
            buffers,
            error_log,
            custom_prefix,
            poll_interval,
        })
    }

    pub fn state(&self) -> ExecutionState {
        *self.state_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ExecutionState> {
        self.state_tx.subscribe()
    }

    pub async fn wait_idle(&self) {
        let mut rx = self.state_tx.subscribe();
        let _ = rx.wait_for(|s| *s == ExecutionState::Idle).await;
    }

    /// Launches `invocation` and returns immediately with the run's record
    /// stream. Only legal from `Idle`; callers gate on argument readiness
    /// before getting here (the controller checks both).
    pub fn start(self: &Arc<Self>, invocation: Invocation) -> Result<RunHandle, EngineError> {
        let token = {
            let mut guard = self.cancel.lock();
            if self.state() != ExecutionState::Idle {
                return Err(EngineError::NotReady);
            }
            *guard = CancellationToken::new();
            self.state_tx.send_replace(ExecutionState::Running);
            guard.clone()
        };

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                self.state_tx.send_replace(ExecutionState::Idle);
                error!(program = %invocation.program, error = %e, "interpreter launch failed");
                self.error_log
                    .write_summary(&format!("failed to launch {}: {e}", invocation.program));
                return Err(EngineError::LaunchFailure {
                    program: invocation.program,
                    source: e,
                });
            }
        };
        info!(program = %invocation.program, pid = child.id(), "interpreter spawned");

        let (tx, rx) = mpsc::unbounded_channel();
        let demux = Arc::new(StreamDemux::new(
            self.custom_prefix.clone(),
            Arc::clone(&self.buffers),
            tx,
            Arc::clone(&self.error_log),
        ));

        // Readers attach before the child is first polled; attaching later
        // would lose early output.
        let out_task = child.stdout.take().map(|out| {
            let demux = Arc::clone(&demux);
            tokio::spawn(async move { read_stdout(out, demux).await })
        });
        let err_task = child.stderr.take().map(|err| {
            let demux = Arc::clone(&demux);
            tokio::spawn(async move { read_stderr(err, demux).await })
        });

        let session = Arc::clone(self);
        let done =
            tokio::spawn(async move { session.supervise(child, token, out_task, err_task).await });

        Ok(RunHandle { records: rx, done })
    }

    /// Requests cooperative cancellation. No-op unless a run is active; the
    /// stop is observed within the completion-poll bound, not instantly.
    pub fn cancel(&self) {
        let guard = self.cancel.lock();
        if self.state() == ExecutionState::Running {
            self.state_tx.send_replace(ExecutionState::CancelRequested);
            guard.cancel();
        }
    }

    async fn supervise(
        self: Arc<Self>,
        mut child: Child,
        token: CancellationToken,
        out_task: Option<JoinHandle<()>>,
        err_task: Option<JoinHandle<()>>,
    ) -> RunOutcome {
        let mut outcome = RunOutcome::default();
        tokio::select! {
            status = child.wait() => {
                outcome.exit_code = status.ok().and_then(|s| s.code());
            }
            _ = token.cancelled() => {
                outcome.cancelled = true;
                debug!("cancel requested, stopping interpreter");
                let _ = child.start_kill();
                // Completion after a stop is observed on a bounded poll.
                loop {
                    match child.try_wait() {
                        Ok(Some(status)) => {
                            outcome.exit_code = status.code();
                            break;
                        }
                        Ok(None) => tokio::time::sleep(self.poll_interval).await,
                        Err(_) => break,
                    }
                }
            }
        }

        // Drain whatever the pipes still hold before reporting.
        if let Some(task) = out_task {
            let _ = task.await;
        }
        if let Some(task) = err_task {
            let _ = task.await;
        }
        outcome.error_exception = self.buffers.lock().last_error_exception.clone();

        info!(
            cancelled = outcome.cancelled,
            exit_code = ?outcome.exit_code,
            "run finished"
        );
        {
            let _guard = self.cancel.lock();
            self.state_tx.send_replace(ExecutionState::Idle);
        }
        outcome
    }
}

async fn read_stdout(out: ChildStdout, demux: Arc<StreamDemux>) {
    let mut lines = BufReader::new(out).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        match line.strip_prefix(PROGRESS_MARKER) {
            Some(rest) => {
                let (percent, operation) = rest.split_once('|').unwrap_or((rest, ""));
                demux.on_progress_record(percent.trim().parse().unwrap_or(0), operation);
            }
            None => demux.on_stdout_line(&line),
        }
    }
}

async fn read_stderr(err: ChildStderr, demux: Arc<StreamDemux>) {
    let mut lines = BufReader::new(err).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        // Anything that is not a structured record is still an error line;
        // carry it as bare exception text.
        let fields = serde_json::from_str::<ErrorFields>(&line).unwrap_or_else(|_| ErrorFields {
            exception: Some(line.clone()),
            ..Default::default()
        });
        demux.on_error_record(fields);
    }
}
