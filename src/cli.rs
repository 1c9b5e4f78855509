use crate::engine::{BankOptions, CbaOptions, Invocation, ModelLauncher, WorkerEvent, WorkerManager};
use crate::model::{LogEvent, LogLevel, OrchestratorEvent};
use crate::orchestrator::Orchestrator;
use crate::sequencer::{resolve_runnable_scenarios, VARIANT_ID_PREFIX};
use crate::settings::GlobalConfig;
use crate::storage::ScenarioStore;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use time::macros::format_description;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "scenario-orchestrator",
    version,
    about = "Run transport model scenarios one after another and follow their progress"
)]
pub struct Cli {
    /// Settings file (defaults to settings.json in the user config directory)
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    /// Folder holding the scenario files (defaults to the project folder)
    #[arg(long, global = true)]
    pub scenario_dir: Option<PathBuf>,

    /// Project name
    #[arg(long, global = true)]
    pub project_name: Option<String>,

    /// Project folder where results are written
    #[arg(long, global = true)]
    pub project_folder: Option<PathBuf>,

    /// Python interpreter of the modelling environment
    #[arg(long, global = true)]
    pub python: Option<PathBuf>,

    /// Folder with the model system scripts
    #[arg(long, global = true)]
    pub scripts: Option<PathBuf>,

    /// Base year data folder
    #[arg(long, global = true)]
    pub base_data: Option<PathBuf>,

    /// Log level requested from the model (DEBUG, INFO, WARNING, ERROR)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Print diagnostics of the orchestrator itself on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the selected scenarios in order
    Run {
        /// Print one JSON object per event instead of text
        #[arg(long)]
        json: bool,

        /// Scenario or sub-scenario ids or names, in run order
        #[arg(required = true, value_name = "SCENARIO")]
        selection: Vec<String>,
    },
    /// List scenarios and their last results
    List,
    /// Check the input files of the selected scenarios without running them
    Validate {
        #[arg(required = true, value_name = "SCENARIO")]
        selection: Vec<String>,
    },
    /// Create the EMME project in the project folder
    CreateProject,
    /// Create the EMME data bank of the project
    CreateBank {
        /// Submodel the bank is built for
        #[arg(long)]
        submodel: String,

        /// Number of EMME scenarios to reserve
        #[arg(long = "emme-scenarios", value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
        number_of_emme_scenarios: u32,

        #[arg(long)]
        separate_emme_scenarios: bool,
    },
    /// Run the cost-benefit analysis between two scenario result folders
    Cba {
        #[arg(long, value_name = "DIR")]
        baseline: Option<PathBuf>,

        #[arg(long, value_name = "DIR")]
        projected: Option<PathBuf>,

        /// Second baseline year, optional
        #[arg(long, value_name = "DIR")]
        baseline_2: Option<PathBuf>,

        /// Second projected year, optional
        #[arg(long, value_name = "DIR")]
        projected_2: Option<PathBuf>,
    },
}

/// Run the parsed command. `Ok(false)` means the command ran but reported failure.
pub async fn run(args: Cli) -> Result<bool> {
    let cfg = build_config(&args)?;
    match &args.command {
        Command::Run { json, selection } => run_batch(&args, cfg, selection, *json).await,
        Command::List => {
            let store = load_store(&args, &cfg)?;
            let (out_tx, out_handle) = spawn_output_writer();
            let _ = out_tx.send(OutputLine::Stderr(format!(
                "Scenarios in {}",
                store.folder().display()
            )));
            for line in list_lines(&store) {
                let _ = out_tx.send(OutputLine::Stdout(line));
            }
            drop(out_tx);
            let _ = out_handle.await;
            Ok(true)
        }
        Command::Validate { selection } => run_validate(&args, cfg, selection).await,
        Command::CreateProject => {
            let invocation = ModelLauncher::new(cfg).create_project_invocation()?;
            run_tool("EMME project creation", &invocation, "EMME project created.").await
        }
        Command::CreateBank {
            submodel,
            number_of_emme_scenarios,
            separate_emme_scenarios,
        } => {
            let invocation = ModelLauncher::new(cfg).create_bank_invocation(&BankOptions {
                submodel: submodel.clone(),
                number_of_emme_scenarios: *number_of_emme_scenarios,
                separate_emme_scenarios: *separate_emme_scenarios,
            })?;
            run_tool("EMME bank creation", &invocation, "EMME bank created.").await
        }
        Command::Cba {
            baseline,
            projected,
            baseline_2,
            projected_2,
        } => {
            let invocation = ModelLauncher::new(cfg).cba_invocation(&CbaOptions {
                baseline_scenario_path: baseline.clone(),
                projected_scenario_path: projected.clone(),
                baseline_scenario_2_path: baseline_2.clone(),
                projected_scenario_2_path: projected_2.clone(),
            })?;
            run_tool("CBA script", &invocation, "CBA script finished.").await
        }
    }
}

/// Build the global settings: settings file first, command line flags on top.
pub fn build_config(args: &Cli) -> Result<GlobalConfig> {
    let file = GlobalConfig::load(args.settings.as_deref())?;
    Ok(file.merge(GlobalConfig {
        project_name: args.project_name.clone(),
        project_folder: args.project_folder.clone(),
        python_path: args.python.clone(),
        scripts_path: args.scripts.clone(),
        base_data_folder: args.base_data.clone(),
        log_level: args.log_level.clone(),
        ..Default::default()
    }))
}

fn load_store(args: &Cli, cfg: &GlobalConfig) -> Result<ScenarioStore> {
    let folder = args
        .scenario_dir
        .clone()
        .or_else(|| cfg.project_folder.clone())
        .context("no scenario folder: pass --scenario-dir or set project_folder")?;
    ScenarioStore::load(&folder)
}

async fn run_batch(args: &Cli, cfg: GlobalConfig, selection: &[String], json: bool) -> Result<bool> {
    let store = load_store(args, &cfg)?;
    let ids = store.resolve_selection(selection)?;
    let orchestrator = Orchestrator::new(store, Arc::new(ModelLauncher::new(cfg)));
    let mut handle = orchestrator
        .run_batch(&ids)
        .context("batch was not started")?;

    let (out_tx, out_handle) = spawn_output_writer();
    if !json {
        let _ = out_tx.send(OutputLine::Stderr(format!(
            "Batch {} started, press Ctrl-C to cancel the remaining scenarios",
            handle.batch_id
        )));
    }

    loop {
        tokio::select! {
            ev = handle.events.recv() => {
                let Some(ev) = ev else { break };
                if json {
                    let _ = out_tx.send(OutputLine::Stdout(serde_json::to_string(&ev)?));
                } else if let Some(line) = render_event(&ev) {
                    let _ = out_tx.send(line);
                }
            }
            // Cancelling twice is a no-op in the controller.
            res = tokio::signal::ctrl_c() => {
                if res.is_ok() {
                    handle.cancel_all();
                }
            }
        }
    }

    let outcome = handle.wait().await?;
    if !json {
        let summary = crate::text_summary::build_text_summary(&outcome);
        let _ = out_tx.send(OutputLine::Stdout(String::new()));
        for line in summary.lines {
            let _ = out_tx.send(OutputLine::Stdout(line));
        }
    }
    drop(out_tx);
    let _ = out_handle.await;
    Ok(outcome.last_error.is_none())
}

async fn run_validate(args: &Cli, cfg: GlobalConfig, selection: &[String]) -> Result<bool> {
    let store = load_store(args, &cfg)?;
    let ids = store.resolve_selection(selection)?;
    let requests = resolve_runnable_scenarios(&ids, store.records());
    let launcher = ModelLauncher::new(cfg);
    let invocation = launcher.validation_invocation(&requests)?;

    run_tool("Input validation", &invocation, "Input files are valid.").await
}

/// Run one project-level script in the worker and print its log stream.
async fn run_tool(task: &str, invocation: &Invocation, done: &str) -> Result<bool> {
    let (out_tx, out_handle) = spawn_output_writer();
    let _ = out_tx.send(OutputLine::Stdout(format_log(&LogEvent::ui_event(format!(
        "Initializing {task}"
    )))));
    let mut workers = WorkerManager::new();
    workers.start(task, invocation)?;
    let error = loop {
        match workers.next_event().await {
            WorkerEvent::Started { .. } => {}
            WorkerEvent::Log { event, .. } => {
                let _ = out_tx.send(OutputLine::Stdout(format_log(&event)));
            }
            WorkerEvent::Ended { error, .. } => break error,
        }
    };
    let verdict = match &error {
        Some(e) => format!("{task} failed: {e}"),
        None => done.to_string(),
    };
    let _ = out_tx.send(OutputLine::Stderr(verdict));
    drop(out_tx);
    let _ = out_handle.await;
    Ok(error.is_none())
}

fn format_log(event: &LogEvent) -> String {
    if event.level == LogLevel::Newline {
        return String::new();
    }
    let ts = event
        .timestamp
        .format(format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_default();
    format!("{ts} {:<9} {}", event.level.as_str(), event.message)
}

fn render_event(ev: &OrchestratorEvent) -> Option<OutputLine> {
    match ev {
        OrchestratorEvent::Log(event) => Some(OutputLine::Stdout(format_log(event))),
        OrchestratorEvent::RequestStarted { id } => {
            Some(OutputLine::Stderr(format!("== {id} started ==")))
        }
        OrchestratorEvent::RequestCompleted { id, error: None } => {
            Some(OutputLine::Stderr(format!("== {id} finished ==")))
        }
        OrchestratorEvent::RequestCompleted {
            id,
            error: Some(e),
        } => Some(OutputLine::Stderr(format!("== {id} failed: {e} =="))),
        OrchestratorEvent::AllCompleted { .. } => None,
    }
}

fn result_label(last_run: Option<&str>, success: Option<bool>) -> String {
    let when = last_run.filter(|s| !s.is_empty()).unwrap_or("never run");
    match success {
        Some(true) => format!("{when}, ok"),
        Some(false) if last_run.is_some_and(|s| !s.is_empty()) => format!("{when}, failed"),
        _ => when.to_string(),
    }
}

fn list_lines(store: &ScenarioStore) -> Vec<String> {
    let mut lines = Vec::new();
    for record in store.records() {
        lines.push(format!(
            "{} ({}) [{}] {}",
            record.name,
            record.id,
            record.request_type().as_model_type(),
            result_label(record.last_run.as_deref(), record.run_success)
        ));
        let variants = record.stored_speed_assignment_inputs.iter().flatten();
        for (n, input) in variants.enumerate() {
            lines.push(format!(
                "  * {VARIANT_ID_PREFIX}{n}_{}: scenario {} submodel {} {}",
                record.id,
                input.first_scenario_id,
                input.submodel.as_deref().unwrap_or("-"),
                result_label(input.last_run.as_deref(), input.run_success)
            ));
        }
        for sub in &record.sub_scenarios {
            lines.push(format!(
                "  - {} ({}) {}",
                sub.name,
                sub.id,
                result_label(sub.last_run.as_deref(), sub.run_success)
            ));
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn parses_run_with_global_flags() {
        let cli = Cli::try_parse_from([
            "scenario-orchestrator",
            "run",
            "--json",
            "--python",
            "/opt/emme/python.exe",
            "Base",
            "Sub",
        ])
        .unwrap();
        assert_eq!(cli.python, Some(PathBuf::from("/opt/emme/python.exe")));
        match cli.command {
            Command::Run { json, selection } => {
                assert!(json);
                assert_eq!(selection, vec!["Base".to_string(), "Sub".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(Cli::try_parse_from(["scenario-orchestrator", "run"]).is_err());
    }

    #[test]
    fn parses_project_tools() {
        let cli = Cli::try_parse_from([
            "scenario-orchestrator",
            "create-bank",
            "--submodel",
            "uusimaa",
            "--emme-scenarios",
            "4",
            "--separate-emme-scenarios",
        ])
        .unwrap();
        match cli.command {
            Command::CreateBank {
                submodel,
                number_of_emme_scenarios,
                separate_emme_scenarios,
            } => {
                assert_eq!(submodel, "uusimaa");
                assert_eq!(number_of_emme_scenarios, 4);
                assert!(separate_emme_scenarios);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(Cli::try_parse_from([
            "scenario-orchestrator",
            "create-bank",
            "--submodel",
            "uusimaa",
            "--emme-scenarios",
            "0",
        ])
        .is_err());

        let cli = Cli::try_parse_from([
            "scenario-orchestrator",
            "cba",
            "--baseline",
            "/p/2030",
            "--projected-2",
            "/p/2050",
        ])
        .unwrap();
        match cli.command {
            Command::Cba {
                baseline,
                projected,
                projected_2,
                ..
            } => {
                assert_eq!(baseline, Some(PathBuf::from("/p/2030")));
                assert_eq!(projected, None);
                assert_eq!(projected_2, Some(PathBuf::from("/p/2050")));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            Cli::try_parse_from(["scenario-orchestrator", "create-project"])
                .unwrap()
                .command,
            Command::CreateProject
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn tool_result_follows_exit_status() {
        let sh = |script: &str| Invocation {
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".into(), script.into()],
        };
        assert!(run_tool("Test tool", &sh("echo '{\"level\":\"INFO\",\"message\":\"ok\"}'"), "done")
            .await
            .unwrap());
        assert!(!run_tool("Test tool", &sh("exit 2"), "done").await.unwrap());
    }

    #[test]
    fn flags_override_settings_file() {
        let dir = TempDir::new().unwrap();
        let settings = dir.path().join("settings.json");
        std::fs::write(&settings, r#"{"project_name":"file","scripts_path":"/srv/scripts"}"#)
            .unwrap();
        let cli = Cli::try_parse_from([
            "scenario-orchestrator",
            "--settings",
            settings.to_str().unwrap(),
            "--project-name",
            "flag",
            "list",
        ])
        .unwrap();
        let cfg = build_config(&cli).unwrap();
        assert_eq!(cfg.project_name.as_deref(), Some("flag"));
        assert_eq!(cfg.scripts_path, Some(PathBuf::from("/srv/scripts")));
    }

    #[test]
    fn list_shows_subs_and_variants() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("Base.json"),
            json!({
                "id": "p",
                "name": "Base",
                "iterations": 5,
                "last_run": "10:00:00 01.01.2026",
                "run_success": true,
                "storedSpeedAssignmentInputs": [null, {"firstScenarioId": 7, "submodel": "uusimaa"}],
                "subScenarios": [{"id": "s", "name": "Sub", "runSuccess": false}]
            })
            .to_string(),
        )
        .unwrap();
        let store = ScenarioStore::load(dir.path()).unwrap();
        assert_eq!(
            list_lines(&store),
            vec![
                "Base (p) [PASSENGER_TRANSPORT] 10:00:00 01.01.2026, ok".to_string(),
                "  * stored_speed_assignment_0_p: scenario 7 submodel uusimaa never run"
                    .to_string(),
                "  - Sub (s) never run".to_string(),
            ]
        );
    }

    #[test]
    fn log_lines_are_aligned() {
        let mut ev = LogEvent::ui_event("hello");
        ev.timestamp = time::macros::datetime!(2026-01-01 08:09:10 UTC);
        assert_eq!(format_log(&ev), "08:09:10 UI-event  hello");
        assert_eq!(format_log(&LogEvent::newline()), "");
    }
}
