use thiserror::Error;

/// Failures surfaced by the run orchestrator.
///
/// `PreconditionViolation` and `Validation` are returned to the caller before any
/// lifecycle event fires. `Spawn` and `ProcessExit` only ever describe a single
/// request and travel inside `RequestCompleted`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrchestratorError {
    #[error("precondition violated: {0}")]
    PreconditionViolation(String),

    #[error("{0}")]
    Validation(String),

    #[error("failed to launch {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("{}", describe_exit(.code, .signal))]
    ProcessExit {
        code: Option<i32>,
        signal: Option<i32>,
    },
}

fn describe_exit(code: &Option<i32>, signal: &Option<i32>) -> String {
    match (*code, *signal) {
        (_, Some(sig)) => format!("process terminated by signal {sig}"),
        (Some(code), None) => format!("process exited with code {code}"),
        (None, None) => "process exited abnormally".to_string(),
    }
}

impl OrchestratorError {
    /// True for failures that belong to one request rather than to the caller.
    pub fn is_request_failure(&self) -> bool {
        matches!(
            self,
            OrchestratorError::Spawn { .. } | OrchestratorError::ProcessExit { .. }
        )
    }
}
