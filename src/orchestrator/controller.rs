//! Batch lifecycle controller.
//!
//! Validates a selection, then drives its requests one at a time through the
//! worker manager and emits lifecycle events for presentation layers.

use super::cancel::CancellationController;
use super::post_process::process_request_completion;
use crate::engine::{Invocation, Launcher, WorkerEvent, WorkerManager};
use crate::error::OrchestratorError;
use crate::model::{LogEvent, OrchestratorEvent, RunRequest, RunStatus};
use crate::sequencer::{resolve_runnable_scenarios, RunQueue};
use crate::storage::ScenarioStore;
use crate::tracker::RunStatusTracker;
use anyhow::{Context, Result};
use rand::RngCore;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, info, warn};

/// How long a draining batch waits before telling the user it is still waiting.
const DRAIN_NOTICE_AFTER: Duration = Duration::from_secs(30);

/// Commands accepted by a running batch.
#[derive(Debug, Clone)]
pub(crate) enum BatchCommand {
    CancelAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchPhase {
    NotStarted,
    Running,
    /// Cancellation requested, last request still in flight.
    Draining,
    Completed,
}

/// Handle to a submitted batch.
pub(crate) struct BatchHandle {
    pub batch_id: String,
    pub events: UnboundedReceiver<OrchestratorEvent>,
    cmd_tx: UnboundedSender<BatchCommand>,
    task: JoinHandle<Result<BatchOutcome>>,
}

impl BatchHandle {
    pub(crate) fn cancel_all(&self) {
        let _ = self.cmd_tx.send(BatchCommand::CancelAll);
    }

    /// Wait for the controller to finish and return the final state of the batch.
    pub(crate) async fn wait(self) -> Result<BatchOutcome> {
        self.task.await.context("batch controller task failed")?
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RequestOutcome {
    pub request: RunRequest,
    pub status: RunStatus,
}

/// Final state of a batch, in execution order.
#[derive(Debug, Clone)]
pub(crate) struct BatchOutcome {
    pub requests: Vec<RequestOutcome>,
    /// Error of the last executed request.
    pub last_error: Option<OrchestratorError>,
    pub cancelled: bool,
}

#[cfg(test)]
impl BatchOutcome {
    pub(crate) fn status(&self, id: &str) -> Option<&RunStatus> {
        self.requests
            .iter()
            .find(|r| r.request.id == id)
            .map(|r| &r.status)
    }
}

pub(crate) struct Orchestrator {
    store: ScenarioStore,
    launcher: Arc<dyn Launcher>,
}

impl Orchestrator {
    pub(crate) fn new(store: ScenarioStore, launcher: Arc<dyn Launcher>) -> Self {
        Self { store, launcher }
    }

    /// Resolve and validate `selection` into ordered requests with their invocations.
    ///
    /// Nothing is spawned. Every check that can fail runs here.
    pub(crate) fn plan(
        &self,
        selection: &[String],
    ) -> Result<Vec<(RunRequest, Invocation)>, OrchestratorError> {
        if selection.is_empty() {
            return Err(OrchestratorError::Validation(
                "no scenarios selected".to_string(),
            ));
        }
        if let Some(unknown) = selection.iter().find(|id| !self.store.contains(id)) {
            return Err(OrchestratorError::Validation(format!(
                "unknown scenario '{unknown}'"
            )));
        }
        self.launcher.check()?;

        let requests = resolve_runnable_scenarios(selection, self.store.records());
        if requests.is_empty() {
            return Err(OrchestratorError::Validation(
                "selection resolved to no runnable scenarios".to_string(),
            ));
        }
        requests
            .into_iter()
            .map(|request| {
                let invocation = self.launcher.prepare(&request)?;
                Ok((request, invocation))
            })
            .collect()
    }

    /// Validate and submit a batch. Must be called from within a tokio runtime.
    pub(crate) fn run_batch(&self, selection: &[String]) -> Result<BatchHandle, OrchestratorError> {
        let planned = self.plan(selection)?;
        let batch_id = gen_batch_id();
        info!(batch = %batch_id, requests = planned.len(), "submitting batch");

        let (requests, invocations): (Vec<_>, Vec<_>) = planned.into_iter().unzip();
        let (event_tx, event_rx) = mpsc::unbounded_channel::<OrchestratorEvent>();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<BatchCommand>();
        let tracker = RunStatusTracker::new(self.store.clone());
        let queue = RunQueue::new(requests);
        let id = batch_id.clone();
        let task = tokio::spawn(async move {
            run_controller(id, queue, invocations, tracker, event_tx, cmd_rx).await
        });

        Ok(BatchHandle {
            batch_id,
            events: event_rx,
            cmd_tx,
            task,
        })
    }
}

/// Generate a random batch id.
fn gen_batch_id() -> String {
    let mut b = [0u8; 6];
    rand::thread_rng().fill_bytes(&mut b);
    b.iter().map(|x| format!("{x:02x}")).collect()
}

/// Advance the queue and start the next request. `Ok(false)` when the queue is empty.
fn start_next(
    queue: &mut RunQueue,
    invocations: &[Invocation],
    workers: &mut WorkerManager,
) -> Result<bool, OrchestratorError> {
    let Some(request) = queue.advance() else {
        return Ok(false);
    };
    let id = request.id.clone();
    let invocation = queue
        .current_index()
        .and_then(|i| invocations.get(i))
        .ok_or_else(|| {
            OrchestratorError::PreconditionViolation(format!("no invocation prepared for '{id}'"))
        })?;
    info!(request = %id, "starting request");
    workers.start(&id, invocation)?;
    Ok(true)
}

/// Drive one batch to completion.
async fn run_controller(
    batch_id: String,
    mut queue: RunQueue,
    invocations: Vec<Invocation>,
    mut tracker: RunStatusTracker,
    event_tx: UnboundedSender<OrchestratorEvent>,
    mut cmd_rx: UnboundedReceiver<BatchCommand>,
) -> Result<BatchOutcome> {
    let mut workers = WorkerManager::new();
    let mut cancel = CancellationController::new();
    let mut phase = BatchPhase::NotStarted;
    let mut last_error: Option<OrchestratorError> = None;
    let mut commands_open = true;
    let mut drain_deadline: Option<tokio::time::Instant> = None;
    // Whether `RequestStarted` went out for the request owning the worker.
    let mut announced = false;
    let mut watchdog = tokio::time::interval(Duration::from_millis(500));

    let names: Vec<&str> = queue.requests().iter().map(|r| r.name.as_str()).collect();
    let _ = event_tx.send(OrchestratorEvent::Log(LogEvent::ui_event(format!(
        "Initializing run of scenarios: {}",
        names.join(", ")
    ))));
    for request in queue.requests() {
        tracker.mark_queued(&request.id);
    }

    debug!(batch = %batch_id, ?phase, requests = queue.requests().len(), "controller ready");

    let res: Result<(), OrchestratorError> = async {
        phase = if start_next(&mut queue, &invocations, &mut workers)? {
            BatchPhase::Running
        } else {
            BatchPhase::Completed
        };
        debug!(batch = %batch_id, ?phase, "batch started");

        while phase != BatchPhase::Completed {
            tokio::select! {
                cmd = async {
                    if commands_open {
                        cmd_rx.recv().await
                    } else {
                        futures::future::pending().await
                    }
                } => {
                    match cmd {
                        Some(BatchCommand::CancelAll) => {
                            if cancel.cancel_all(&event_tx) {
                                phase = BatchPhase::Draining;
                                drain_deadline = Some(tokio::time::Instant::now() + DRAIN_NOTICE_AFTER);
                            }
                        }
                        // Handle dropped: keep running, nobody can cancel any more.
                        None => commands_open = false,
                    }
                }
                ev = workers.next_event() => {
                    match ev {
                        WorkerEvent::Started { request_id } => {
                            announced = true;
                            tracker.mark_running(&request_id);
                            let _ = event_tx.send(OrchestratorEvent::RequestStarted { id: request_id });
                        }
                        WorkerEvent::Log { request_id, event } => {
                            tracker.apply(&request_id, &event);
                            let _ = event_tx.send(OrchestratorEvent::Log(event));
                        }
                        WorkerEvent::Ended { request_id, error } => {
                            let Some(request) = queue.current().filter(|r| r.id == request_id).cloned() else {
                                return Err(OrchestratorError::PreconditionViolation(format!(
                                    "completion for '{request_id}' does not match the running request"
                                )));
                            };
                            if let Some(e) = &error {
                                if !e.is_request_failure() {
                                    return Err(e.clone());
                                }
                                warn!(request = %request_id, "request failed: {e}");
                            }
                            // A launch failure ends the request before any output.
                            if !announced {
                                tracker.mark_running(&request_id);
                                let _ = event_tx.send(OrchestratorEvent::RequestStarted { id: request_id.clone() });
                            }
                            announced = false;
                            let processed = process_request_completion(&mut tracker, &request, error.as_ref());
                            if let Some(path) = &processed.persisted_path {
                                debug!(request = %request_id, path = %path.display(), "result persisted");
                            }
                            for message in processed.messages {
                                let _ = event_tx.send(OrchestratorEvent::Log(message));
                            }
                            let _ = event_tx.send(OrchestratorEvent::RequestCompleted {
                                id: request_id,
                                error: error.as_ref().map(ToString::to_string),
                            });
                            last_error = error;

                            if cancel.is_requested() {
                                for pending in queue.drain_pending() {
                                    tracker.mark_cancelled(&pending.id);
                                }
                                phase = BatchPhase::Completed;
                            } else {
                                if queue.requests().len() > queue.current_index().map_or(0, |i| i + 1) {
                                    let _ = event_tx.send(OrchestratorEvent::Log(LogEvent::newline()));
                                }
                                if !start_next(&mut queue, &invocations, &mut workers)? {
                                    phase = BatchPhase::Completed;
                                }
                            }
                            drain_deadline = None;
                        }
                    }
                }
                // The running model cannot be interrupted; keep the user informed while it finishes.
                _ = watchdog.tick() => {
                    if let Some(deadline) = drain_deadline {
                        if phase == BatchPhase::Draining && tokio::time::Instant::now() >= deadline {
                            let name = queue.current().map(|r| r.name.clone()).unwrap_or_default();
                            let _ = event_tx.send(OrchestratorEvent::Log(LogEvent::ui_event(format!(
                                "Still waiting for {name} to finish."
                            ))));
                            drain_deadline = None;
                        }
                    }
                }
            }
        }
        if workers.is_busy() {
            let owner = workers.current_request().unwrap_or_default();
            return Err(OrchestratorError::PreconditionViolation(format!(
                "batch completed while '{owner}' still owns the worker"
            )));
        }
        Ok(())
    }
    .await;

    if let Err(e) = res {
        let _ = event_tx.send(OrchestratorEvent::AllCompleted {
            error: Some(e.to_string()),
        });
        return Err(e.into());
    }

    info!(batch = %batch_id, cancelled = cancel.is_requested(), "batch completed");
    let _ = event_tx.send(OrchestratorEvent::AllCompleted {
        error: last_error.as_ref().map(ToString::to_string),
    });

    let mut statuses = tracker.into_statuses();
    let requests = queue
        .requests()
        .iter()
        .map(|request| RequestOutcome {
            request: request.clone(),
            status: statuses.remove(&request.id).unwrap_or_default(),
        })
        .collect();
    Ok(BatchOutcome {
        requests,
        last_error,
        cancelled: cancel.is_requested(),
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::model::{LogLevel, RunState};
    use crate::orchestrator::cancel::CANCEL_MESSAGE;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    /// Maps request ids to shell scripts.
    struct ScriptLauncher {
        invocations: HashMap<String, Invocation>,
    }

    impl ScriptLauncher {
        fn new(scripts: &[(&str, &str)]) -> Self {
            Self {
                invocations: scripts
                    .iter()
                    .map(|(id, script)| (id.to_string(), sh(script)))
                    .collect(),
            }
        }

        fn with(mut self, id: &str, invocation: Invocation) -> Self {
            self.invocations.insert(id.to_string(), invocation);
            self
        }
    }

    impl Launcher for ScriptLauncher {
        fn prepare(&self, request: &RunRequest) -> Result<Invocation, OrchestratorError> {
            self.invocations
                .get(&request.id)
                .cloned()
                .ok_or_else(|| OrchestratorError::Validation(format!("no script for {}", request.id)))
        }
    }

    fn sh(script: &str) -> Invocation {
        Invocation {
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".into(), script.into()],
        }
    }

    fn write_record(dir: &Path, value: Value) {
        let name = value["name"].as_str().unwrap().to_string();
        std::fs::write(
            dir.join(format!("{name}.json")),
            serde_json::to_string_pretty(&value).unwrap(),
        )
        .unwrap();
    }

    fn three_scenarios() -> TempDir {
        let dir = TempDir::new().unwrap();
        for (id, name) in [("a", "A"), ("b", "B"), ("c", "C")] {
            write_record(dir.path(), json!({"id": id, "name": name, "iterations": 2}));
        }
        dir
    }

    fn orchestrator(dir: &Path, launcher: ScriptLauncher) -> Orchestrator {
        Orchestrator::new(ScenarioStore::load(dir).unwrap(), Arc::new(launcher))
    }

    fn selection(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    async fn collect(mut handle: BatchHandle) -> (Vec<OrchestratorEvent>, BatchOutcome) {
        let mut events = Vec::new();
        while let Some(ev) = handle.events.recv().await {
            events.push(ev);
        }
        (events, handle.wait().await.unwrap())
    }

    /// Started/completed ids in emission order, e.g. `+a`, `-a`.
    fn lifecycle(events: &[OrchestratorEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                OrchestratorEvent::RequestStarted { id } => Some(format!("+{id}")),
                OrchestratorEvent::RequestCompleted { id, .. } => Some(format!("-{id}")),
                _ => None,
            })
            .collect()
    }

    fn read(path: PathBuf) -> Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn runs_strictly_in_sequencer_order() {
        let dir = three_scenarios();
        let log = dir.path().join("order.log");
        let script = |id: &str| format!("echo {id} >> '{}'", log.display());
        let launcher = ScriptLauncher::new(&[
            ("a", script("a").as_str()),
            ("b", script("b").as_str()),
            ("c", script("c").as_str()),
        ]);
        let orch = orchestrator(dir.path(), launcher);
        let handle = orch.run_batch(&selection(&["c", "a", "b"])).unwrap();
        let (events, outcome) = collect(handle).await;

        assert_eq!(
            lifecycle(&events),
            vec!["+c", "-c", "+a", "-a", "+b", "-b"]
        );
        assert_eq!(std::fs::read_to_string(&log).unwrap(), "c\na\nb\n");
        assert!(matches!(
            events.last(),
            Some(OrchestratorEvent::AllCompleted { error: None })
        ));
        match events.first() {
            Some(OrchestratorEvent::Log(ev)) => {
                assert_eq!(ev.level, LogLevel::UiEvent);
                assert_eq!(ev.message, "Initializing run of scenarios: C, A, B");
            }
            other => panic!("unexpected first event {other:?}"),
        }
        let newlines = events
            .iter()
            .filter(|e| matches!(e, OrchestratorEvent::Log(ev) if ev.level == LogLevel::Newline))
            .count();
        assert_eq!(newlines, 2);
        assert!(outcome.last_error.is_none());
        assert!(!outcome.cancelled);
        for id in ["a", "b", "c"] {
            assert_eq!(outcome.status(id).map(|s| s.state), Some(RunState::Finished));
        }
        let a = read(dir.path().join("A.json"));
        assert_eq!(a["run_success"], true);
    }

    #[tokio::test]
    async fn log_stream_feeds_tracker_and_ui() {
        let dir = TempDir::new().unwrap();
        write_record(dir.path(), json!({"id": "a", "name": "A", "iterations": 2}));
        let script = r#"
echo '{"level":"INFO","message":"go","status":{"state":"STARTING","total":2}}'
echo '{"level":"INFO","message":"Demand model convergence in iteration 1 value 0.25"}'
echo 'RuntimeWarning: divide by zero' >&2
echo '{"level":"INFO","message":"done","status":{"state":"FINISHED","completed":2,"log":"/tmp/results/A/A.log"}}'
"#;
        let orch = orchestrator(dir.path(), ScriptLauncher::new(&[("a", script)]));
        let (events, outcome) = collect(orch.run_batch(&selection(&["a"])).unwrap()).await;

        let exceptions: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                OrchestratorEvent::Log(ev) if ev.level == LogLevel::Exception => {
                    Some(ev.message.as_str())
                }
                _ => None,
            })
            .collect();
        assert_eq!(exceptions, vec!["RuntimeWarning: divide by zero"]);

        let status = outcome.status("a").unwrap();
        assert_eq!(status.iterations_total, Some(2));
        assert_eq!(status.iterations_completed, Some(2));
        assert_eq!(status.convergence_series.len(), 1);
        assert_eq!(status.status_state.as_deref(), Some("FINISHED"));
        assert_eq!(status.result_data_folder, Some(PathBuf::from("/tmp/results/A")));
    }

    #[tokio::test]
    async fn cancel_drains_queue_without_spawning() {
        let dir = three_scenarios();
        let marker = |id: &str| dir.path().join(format!("{id}.ran"));
        let launcher = ScriptLauncher::new(&[
            ("a", "sleep 0.3"),
            ("b", format!("touch '{}'", marker("b").display()).as_str()),
            ("c", format!("touch '{}'", marker("c").display()).as_str()),
        ]);
        let orch = orchestrator(dir.path(), launcher);
        let mut handle = orch.run_batch(&selection(&["a", "b", "c"])).unwrap();

        let mut events = Vec::new();
        while let Some(ev) = handle.events.recv().await {
            let started_a = matches!(&ev, OrchestratorEvent::RequestStarted { id } if id == "a");
            events.push(ev);
            if started_a {
                handle.cancel_all();
                handle.cancel_all();
                break;
            }
        }
        let (rest, outcome) = collect(handle).await;
        events.extend(rest);

        assert_eq!(lifecycle(&events), vec!["+a", "-a"]);
        assert!(!marker("b").exists());
        assert!(!marker("c").exists());
        assert!(outcome.cancelled);
        assert_eq!(outcome.status("a").map(|s| s.state), Some(RunState::Finished));
        assert_eq!(outcome.status("b").map(|s| s.state), Some(RunState::Cancelled));
        assert_eq!(outcome.status("c").map(|s| s.state), Some(RunState::Cancelled));
        assert!(matches!(
            events.last(),
            Some(OrchestratorEvent::AllCompleted { error: None })
        ));
        let announcements = events
            .iter()
            .filter(|e| matches!(e, OrchestratorEvent::Log(ev) if ev.message == CANCEL_MESSAGE))
            .count();
        assert_eq!(announcements, 1);
        // Drained requests are never persisted.
        assert!(read(dir.path().join("B.json")).get("last_run").is_none());
    }

    #[tokio::test]
    async fn cancelled_batch_reports_error_of_last_executed_request() {
        let dir = three_scenarios();
        let launcher = ScriptLauncher::new(&[("a", "sleep 0.3; exit 4"), ("b", "true"), ("c", "true")]);
        let orch = orchestrator(dir.path(), launcher);
        let handle = orch.run_batch(&selection(&["a", "b", "c"])).unwrap();
        handle.cancel_all();
        let (events, outcome) = collect(handle).await;

        assert_eq!(lifecycle(&events), vec!["+a", "-a"]);
        assert_eq!(
            outcome.last_error,
            Some(OrchestratorError::ProcessExit {
                code: Some(4),
                signal: None
            })
        );
        match events.last() {
            Some(OrchestratorEvent::AllCompleted { error: Some(e) }) => {
                assert_eq!(e, "process exited with code 4")
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(outcome.status("a").map(|s| s.state), Some(RunState::Failed));
        assert_eq!(read(dir.path().join("A.json"))["run_success"], false);
    }

    #[tokio::test]
    async fn spawn_failure_fails_request_and_queue_advances() {
        let dir = three_scenarios();
        let launcher = ScriptLauncher::new(&[("b", "exit 0")]).with(
            "a",
            Invocation {
                program: PathBuf::from("/no/such/python"),
                args: vec![],
            },
        );
        let orch = orchestrator(dir.path(), launcher);
        let (events, outcome) = collect(orch.run_batch(&selection(&["a", "b"])).unwrap()).await;

        assert_eq!(lifecycle(&events), vec!["+a", "-a", "+b", "-b"]);
        assert_eq!(outcome.status("a").map(|s| s.state), Some(RunState::Failed));
        assert_eq!(outcome.status("b").map(|s| s.state), Some(RunState::Finished));
        assert!(outcome.last_error.is_none());
        let failed = events.iter().find_map(|e| match e {
            OrchestratorEvent::RequestCompleted { id, error } if id == "a" => error.clone(),
            _ => None,
        });
        assert!(failed.is_some_and(|e| e.starts_with("failed to launch /no/such/python")));
    }

    #[tokio::test]
    async fn sub_scenario_result_lands_in_parent_file() {
        let dir = TempDir::new().unwrap();
        write_record(
            dir.path(),
            json!({
                "id": "p",
                "name": "Parent",
                "iterations": 2,
                "subScenarios": [{"id": "s", "name": "Sub", "emmeScenarioNumber": 3}]
            }),
        );
        let launcher = ScriptLauncher::new(&[("p", "true"), ("s", "exit 1")]);
        let orch = orchestrator(dir.path(), launcher);
        let (events, _) = collect(orch.run_batch(&selection(&["s", "p"])).unwrap()).await;

        assert_eq!(lifecycle(&events), vec!["+p", "-p", "+s", "-s"]);
        let doc = read(dir.path().join("Parent.json"));
        assert_eq!(doc["run_success"], true);
        assert_eq!(doc["subScenarios"][0]["run_success"], false);
    }

    #[tokio::test]
    async fn invalid_batches_are_rejected_before_spawning() {
        let dir = three_scenarios();
        let marker = dir.path().join("a.ran");
        let launcher = ScriptLauncher::new(&[("a", format!("touch '{}'", marker.display()).as_str())]);
        let orch = orchestrator(dir.path(), launcher);

        assert!(matches!(
            orch.run_batch(&[]),
            Err(OrchestratorError::Validation(_))
        ));
        assert!(matches!(
            orch.run_batch(&selection(&["a", "nope"])),
            Err(OrchestratorError::Validation(m)) if m.contains("nope")
        ));
        // "b" has no script: preparing it fails after "a" was prepared.
        assert!(matches!(
            orch.run_batch(&selection(&["a", "b"])),
            Err(OrchestratorError::Validation(m)) if m.contains("no script for b")
        ));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!marker.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn long_drain_tells_user_it_is_still_waiting() {
        let dir = three_scenarios();
        // Real time: the paused clock jumps ahead while the process sleeps.
        let launcher = ScriptLauncher::new(&[("a", "sleep 1"), ("b", "true"), ("c", "true")]);
        let orch = orchestrator(dir.path(), launcher);
        let handle = orch.run_batch(&selection(&["a", "b", "c"])).unwrap();
        handle.cancel_all();
        let (events, outcome) = collect(handle).await;

        let ui: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                OrchestratorEvent::Log(ev) if ev.level == LogLevel::UiEvent => {
                    Some(ev.message.as_str())
                }
                _ => None,
            })
            .collect();
        assert_eq!(
            ui,
            vec![
                "Initializing run of scenarios: A, B, C",
                CANCEL_MESSAGE,
                "Still waiting for A to finish.",
            ]
        );
        assert_eq!(lifecycle(&events), vec!["+a", "-a"]);
        assert!(outcome.cancelled);
    }

    #[tokio::test]
    async fn quick_drain_has_no_waiting_notice() {
        let dir = three_scenarios();
        let launcher = ScriptLauncher::new(&[("a", "true"), ("b", "true"), ("c", "true")]);
        let orch = orchestrator(dir.path(), launcher);
        let handle = orch.run_batch(&selection(&["a", "b", "c"])).unwrap();
        handle.cancel_all();
        let (events, _) = collect(handle).await;
        assert!(!events.iter().any(
            |e| matches!(e, OrchestratorEvent::Log(ev) if ev.message.starts_with("Still waiting"))
        ));
    }
}
