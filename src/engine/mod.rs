//! Worker process management.
//!
//! [`WorkerManager`] owns at most one external model process. Its output is
//! funnelled through a single [`ProcessEvent`] channel and dispatched in
//! [`WorkerManager::next_event`], which releases the handle exactly once when the
//! process ends.

mod invocation;
mod units;

pub use invocation::{BankOptions, CbaOptions, Invocation, Launcher, ModelLauncher};
pub use units::UnitAssembler;

use crate::error::OrchestratorError;
use crate::log_bus;
use crate::model::{now_local, LogEvent};
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Raw events produced by a child process, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Started { pid: Option<u32> },
    OutputLine(String),
    ErrorUnit(String),
    SpawnFailed(String),
    Exited {
        code: Option<i32>,
        signal: Option<i32>,
    },
}

/// Dispatched events, tagged with the request that owns the process.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    Started {
        request_id: String,
    },
    Log {
        request_id: String,
        event: LogEvent,
    },
    Ended {
        request_id: String,
        error: Option<OrchestratorError>,
    },
}

/// Handle to the one process currently owned by the manager.
struct OwnedWorker {
    request_id: String,
    program: String,
    events: mpsc::UnboundedReceiver<ProcessEvent>,
    supervisor: Option<JoinHandle<()>>,
}

#[derive(Default)]
pub struct WorkerManager {
    current: Option<OwnedWorker>,
}

impl WorkerManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.current.is_some()
    }

    pub fn current_request(&self) -> Option<&str> {
        self.current.as_ref().map(|w| w.request_id.as_str())
    }

    /// Launch the process for `request_id`.
    ///
    /// Fails with [`OrchestratorError::PreconditionViolation`] without spawning
    /// anything if a process is still owned. A launch failure is not returned here:
    /// it is reported through [`WorkerManager::next_event`] as an `Ended` event.
    pub fn start(
        &mut self,
        request_id: &str,
        invocation: &Invocation,
    ) -> Result<(), OrchestratorError> {
        if let Some(owned) = &self.current {
            return Err(OrchestratorError::PreconditionViolation(format!(
                "cannot start '{request_id}' while '{}' still owns the worker",
                owned.request_id
            )));
        }

        let (tx, rx) = mpsc::unbounded_channel::<ProcessEvent>();
        let program = invocation.program.display().to_string();
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let supervisor = match cmd.spawn() {
            Ok(child) => {
                info!(request = request_id, pid = ?child.id(), "worker process started");
                let _ = tx.send(ProcessEvent::Started { pid: child.id() });
                Some(tokio::spawn(supervise(child, tx)))
            }
            Err(e) => {
                warn!(request = request_id, %program, "failed to spawn worker: {e}");
                let _ = tx.send(ProcessEvent::SpawnFailed(e.to_string()));
                None
            }
        };

        self.current = Some(OwnedWorker {
            request_id: request_id.to_string(),
            program,
            events: rx,
            supervisor,
        });
        Ok(())
    }

    /// Wait for the next event of the owned process. Pends forever while idle.
    ///
    /// Cancel safe: nothing is awaited after an event has been taken off the channel.
    pub async fn next_event(&mut self) -> WorkerEvent {
        loop {
            let Some(owned) = self.current.as_mut() else {
                return futures::future::pending().await;
            };
            let request_id = owned.request_id.clone();
            match owned.events.recv().await {
                Some(ProcessEvent::Started { pid }) => {
                    debug!(request = %request_id, ?pid, "dispatching start");
                    return WorkerEvent::Started { request_id };
                }
                Some(ProcessEvent::OutputLine(unit)) | Some(ProcessEvent::ErrorUnit(unit)) => {
                    return WorkerEvent::Log {
                        request_id,
                        event: log_bus::classify(&unit, now_local()),
                    };
                }
                Some(ProcessEvent::SpawnFailed(reason)) => {
                    let program = self.release().map(|w| w.program).unwrap_or_default();
                    return WorkerEvent::Ended {
                        request_id,
                        error: Some(OrchestratorError::Spawn { program, reason }),
                    };
                }
                Some(ProcessEvent::Exited { code, signal }) => {
                    self.release();
                    let error = match (code, signal) {
                        (Some(0), None) => None,
                        _ => Some(OrchestratorError::ProcessExit { code, signal }),
                    };
                    return WorkerEvent::Ended { request_id, error };
                }
                None => {
                    // Supervisor went away without reporting an exit status.
                    self.release();
                    return WorkerEvent::Ended {
                        request_id,
                        error: Some(OrchestratorError::ProcessExit {
                            code: None,
                            signal: None,
                        }),
                    };
                }
            }
        }
    }

    fn release(&mut self) -> Option<OwnedWorker> {
        let owned = self.current.take()?;
        debug!(request = %owned.request_id, "worker released");
        if let Some(handle) = owned.supervisor.as_ref() {
            if !handle.is_finished() {
                debug!(request = %owned.request_id, "supervisor still winding down");
            }
        }
        Some(owned)
    }
}

/// Pump both pipes until EOF, then report the exit status.
///
/// Output is drained before `Exited` is sent so that every unit reaches the log bus
/// ahead of the completion event.
async fn supervise(mut child: Child, tx: mpsc::UnboundedSender<ProcessEvent>) {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let out_tx = tx.clone();
    let err_tx = tx.clone();
    tokio::join!(
        pump(stdout, move |unit| {
            let _ = out_tx.send(ProcessEvent::OutputLine(unit));
        }),
        pump(stderr, move |unit| {
            let _ = err_tx.send(ProcessEvent::ErrorUnit(unit));
        }),
    );

    let exited = match child.wait().await {
        Ok(status) => ProcessEvent::Exited {
            code: status.code(),
            signal: exit_signal(&status),
        },
        Err(e) => {
            warn!("failed to wait for worker process: {e}");
            ProcessEvent::Exited {
                code: None,
                signal: None,
            }
        }
    };
    let _ = tx.send(exited);
}

async fn pump<R, F>(reader: Option<R>, mut emit: F)
where
    R: AsyncRead + Unpin,
    F: FnMut(String),
{
    let Some(mut reader) = reader else {
        return;
    };
    let mut assembler = UnitAssembler::new();
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                for unit in assembler.push(&chunk[..n]) {
                    emit(unit);
                }
            }
            Err(e) => {
                warn!("worker pipe read failed: {e}");
                break;
            }
        }
    }
    if let Some(unit) = assembler.finish() {
        emit(unit);
    }
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}
