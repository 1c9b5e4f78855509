//! Per-record run state, driven by classified log events.

use crate::error::OrchestratorError;
use crate::log_bus;
use crate::model::{
    now_local, LogEvent, RunRequest, RunState, RunStatus, STATUS_STATE_FINISHED,
    STATUS_STATE_STARTING,
};
use crate::storage::{CompletionRecord, ScenarioStore};
use anyhow::Result;
use std::collections::BTreeMap;
use std::path::PathBuf;

pub struct RunStatusTracker {
    statuses: BTreeMap<String, RunStatus>,
    store: ScenarioStore,
}

impl RunStatusTracker {
    pub fn new(store: ScenarioStore) -> Self {
        Self {
            statuses: BTreeMap::new(),
            store,
        }
    }

    #[cfg(test)]
    pub fn status(&self, id: &str) -> Option<&RunStatus> {
        self.statuses.get(id)
    }

    fn entry(&mut self, id: &str) -> &mut RunStatus {
        self.statuses.entry(id.to_string()).or_default()
    }

    pub fn mark_queued(&mut self, id: &str) {
        self.entry(id).state = RunState::Queued;
    }

    pub fn mark_running(&mut self, id: &str) {
        self.entry(id).state = RunState::Running;
    }

    pub fn mark_cancelled(&mut self, id: &str) {
        self.entry(id).state = RunState::Cancelled;
    }

    /// Fold one log event of request `id` into its status.
    pub fn apply(&mut self, id: &str, event: &LogEvent) {
        let status = self.entry(id);
        if let Some(payload) = &event.status {
            let state = payload.state.as_deref();
            if state == Some(STATUS_STATE_STARTING) {
                status.iterations_total = Some(0);
                status.iterations_current = Some(0);
                status.iterations_completed = Some(0);
                status.iterations_failed = Some(0);
                status.convergence_series.clear();
                status.log_file_path = None;
                status.result_data_folder = None;
                status.run_start_time = Some(event.timestamp);
                // Placeholder until FINISHED arrives.
                status.run_finish_time = Some(event.timestamp);
            }

            if payload.total.is_some() {
                status.iterations_total = payload.total;
            }
            if payload.current.is_some() {
                status.iterations_current = payload.current;
            }
            if payload.completed.is_some() {
                status.iterations_completed = payload.completed;
            }
            if payload.failed.is_some() {
                status.iterations_failed = payload.failed;
            }
            if let Some(s) = state {
                status.status_state = Some(s.to_string());
            }
            if let Some(log) = payload.log.as_deref() {
                status.log_file_path = Some(PathBuf::from(log));
            }

            if state == Some(STATUS_STATE_FINISHED) {
                status.run_finish_time = Some(event.timestamp);
                status.result_data_folder = payload.log.as_deref().and_then(parent_folder);
            }
        }

        if let Some(point) = log_bus::parse_convergence(event) {
            status.convergence_series.push(point);
        }
    }

    /// Record the terminal state of `request` and persist it onto its durable record.
    pub fn complete(
        &mut self,
        request: &RunRequest,
        error: Option<&OrchestratorError>,
    ) -> Result<PathBuf> {
        self.entry(&request.id).state = if error.is_some() {
            RunState::Failed
        } else {
            RunState::Finished
        };
        let result = CompletionRecord::new(now_local(), error.is_none());
        self.store.merge_result(request, &result)
    }

    pub fn into_statuses(self) -> BTreeMap<String, RunStatus> {
        self.statuses
    }
}

/// Folder part of a log path, accepting either separator.
fn parent_folder(log: &str) -> Option<PathBuf> {
    log.rfind(['/', '\\']).map(|i| PathBuf::from(&log[..i]))
}
