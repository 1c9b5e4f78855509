//! Post-request processing.
//!
//! Records the terminal state of a finished request and persists it. Failures to
//! persist are reported as log events instead of aborting the batch.

use crate::error::OrchestratorError;
use crate::model::{now_local, LogEvent, LogLevel, RunRequest};
use crate::tracker::RunStatusTracker;
use std::path::PathBuf;
use tracing::error;

/// Result of post-request processing, ready for presentation layers.
pub(crate) struct ProcessedCompletion {
    pub persisted_path: Option<PathBuf>,
    pub messages: Vec<LogEvent>,
}

pub(crate) fn process_request_completion(
    tracker: &mut RunStatusTracker,
    request: &RunRequest,
    error: Option<&OrchestratorError>,
) -> ProcessedCompletion {
    let mut messages = Vec::new();
    let persisted_path = match tracker.complete(request, error) {
        Ok(path) => Some(path),
        Err(e) => {
            error!(request = %request.id, "failed to persist result: {e:#}");
            messages.push(LogEvent {
                level: LogLevel::Error,
                message: format!("Saving the result of {} failed: {e:#}", request.name),
                timestamp: now_local(),
                status: None,
            });
            None
        }
    };

    ProcessedCompletion {
        persisted_path,
        messages,
    }
}
