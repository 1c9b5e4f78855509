use crate::error::OrchestratorError;
use crate::model::{RequestType, RunRequest};
use crate::settings::GlobalConfig;
use serde_json::Value;
use std::path::{Path, PathBuf};

const TRAVEL_SCRIPT: &str = "valma_travel.py";
const FREIGHT_SCRIPT: &str = "valma_freight.py";
const VALIDATE_SCRIPT: &str = "validate_inputfiles.py";
const CREATE_BANK_SCRIPT: &str = "create_emmebank.py";
const CREATE_PROJECT_SCRIPT: &str = "create_emme_project.py";
const CBA_SCRIPT: &str = "cba.py";
const DEFAULT_FIRST_MATRIX_ID: &str = "100";

/// A fully resolved command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
}

/// Turns a request into a command line, validating everything it needs first.
pub trait Launcher: Send + Sync {
    /// Batch-wide checks, run once before any request is prepared.
    fn check(&self) -> Result<(), OrchestratorError> {
        Ok(())
    }

    fn prepare(&self, request: &RunRequest) -> Result<Invocation, OrchestratorError>;
}

/// Launches the model system's entry scripts with its interpreter.
#[derive(Debug, Clone)]
pub struct ModelLauncher {
    cfg: GlobalConfig,
}

/// Parameters of a new EMME data bank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankOptions {
    pub submodel: String,
    pub number_of_emme_scenarios: u32,
    pub separate_emme_scenarios: bool,
}

/// Scenario result folders compared by the cost-benefit analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CbaOptions {
    pub baseline_scenario_path: Option<PathBuf>,
    pub projected_scenario_path: Option<PathBuf>,
    pub baseline_scenario_2_path: Option<PathBuf>,
    pub projected_scenario_2_path: Option<PathBuf>,
}

/// Settings every project-level tool needs.
struct ToolPaths<'a> {
    python: &'a Path,
    scripts: &'a Path,
    project_folder: &'a Path,
    project_name: &'a str,
}

/// Paths for one request after per-scenario overrides are applied.
struct RunPaths {
    python: PathBuf,
    scripts: PathBuf,
    results: PathBuf,
    emme_project_file: PathBuf,
    base_data: PathBuf,
}

fn missing(what: &str) -> OrchestratorError {
    OrchestratorError::Validation(format!("{what} is not set"))
}

fn path_arg(p: &Path) -> String {
    p.display().to_string()
}

impl ModelLauncher {
    pub fn new(cfg: GlobalConfig) -> Self {
        Self { cfg }
    }

    fn tool_paths(&self) -> Result<ToolPaths<'_>, OrchestratorError> {
        Ok(ToolPaths {
            project_name: self
                .cfg
                .project_name
                .as_deref()
                .ok_or_else(|| missing("project name"))?,
            project_folder: self
                .cfg
                .project_folder
                .as_deref()
                .ok_or_else(|| missing("project folder"))?,
            python: self
                .cfg
                .python_path
                .as_deref()
                .ok_or_else(|| missing("python path"))?,
            scripts: self
                .cfg
                .scripts_path
                .as_deref()
                .ok_or_else(|| missing("model system scripts folder"))?,
        })
    }

    /// Creates the EMME data bank inside an existing project folder.
    pub fn create_bank_invocation(
        &self,
        opts: &BankOptions,
    ) -> Result<Invocation, OrchestratorError> {
        let tool = self.tool_paths()?;
        if !tool.project_folder.is_dir() {
            return Err(OrchestratorError::Validation(format!(
                "project folder {} does not exist",
                tool.project_folder.display()
            )));
        }
        let mut args = vec![
            "-u".to_string(),
            path_arg(&tool.scripts.join(CREATE_BANK_SCRIPT)),
            "--log-level".into(),
            self.cfg.log_level().into(),
            "--log-format".into(),
            "JSON".into(),
            "--emme-path".into(),
            path_arg(tool.project_folder),
            "--submodel".into(),
            opts.submodel.clone(),
            "--number-of-emme-scenarios".into(),
            opts.number_of_emme_scenarios.to_string(),
            "--project-name".into(),
            tool.project_name.to_string(),
        ];
        if opts.separate_emme_scenarios {
            args.push("--separate-emme-scenarios".into());
        }
        Ok(Invocation {
            program: tool.python.to_path_buf(),
            args,
        })
    }

    /// Creates an empty EMME project named after the project.
    pub fn create_project_invocation(&self) -> Result<Invocation, OrchestratorError> {
        let tool = self.tool_paths()?;
        Ok(Invocation {
            program: tool.python.to_path_buf(),
            args: vec![
                "-u".to_string(),
                path_arg(&tool.scripts.join(CREATE_PROJECT_SCRIPT)),
                "--emme-path".into(),
                path_arg(tool.project_folder),
                "--project-name".into(),
                tool.project_name.to_string(),
            ],
        })
    }

    /// Cost-benefit analysis between a baseline and a projected scenario.
    pub fn cba_invocation(&self, opts: &CbaOptions) -> Result<Invocation, OrchestratorError> {
        let tool = self.tool_paths()?;
        let baseline = opts
            .baseline_scenario_path
            .as_deref()
            .ok_or_else(|| OrchestratorError::Validation("baseline scenario not selected".into()))?;
        let projected = opts.projected_scenario_path.as_deref().ok_or_else(|| {
            OrchestratorError::Validation("projected scenario not selected".into())
        })?;

        let mut args = vec![
            "-u".to_string(),
            path_arg(&tool.scripts.join(CBA_SCRIPT)),
            "--log-level".into(),
            self.cfg.log_level().into(),
            "--log-format".into(),
            "JSON".into(),
            "--baseline-scenario-path".into(),
            path_arg(baseline),
            "--projected-scenario-path".into(),
            path_arg(projected),
        ];
        for (path, arg) in [
            (&opts.baseline_scenario_2_path, "--baseline-scenario-2-path"),
            (&opts.projected_scenario_2_path, "--projected-scenario-2-path"),
        ] {
            if let Some(p) = path {
                args.push(arg.into());
                args.push(path_arg(p));
            }
        }
        args.push("--results-path".into());
        args.push(path_arg(tool.project_folder));
        Ok(Invocation {
            program: tool.python.to_path_buf(),
            args,
        })
    }

    fn resolve_paths(&self, request: &RunRequest) -> Result<RunPaths, OrchestratorError> {
        let overrides = request
            .params
            .get("overriddenProjectSettings")
            .and_then(Value::as_object);
        let pick = |key: &str, default: Option<&PathBuf>| -> Option<PathBuf> {
            overrides
                .and_then(|o| o.get(key))
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .or_else(|| default.cloned())
        };

        let project_name = self
            .cfg
            .project_name
            .as_deref()
            .ok_or_else(|| missing("project name"))?;
        let results = pick("projectFolder", self.cfg.project_folder.as_ref())
            .ok_or_else(|| missing("project folder"))?;
        let python = pick("emmePythonPath", self.cfg.python_path.as_ref())
            .ok_or_else(|| missing("python path"))?;
        let scripts = pick("helmetScriptsPath", self.cfg.scripts_path.as_ref())
            .ok_or_else(|| missing("model system scripts folder"))?;

        // Sub-scenarios read their demand from the parent's results.
        let base_data = match (&request.parent_id, request.request_type) {
            (Some(_), t) if t != RequestType::StoredSpeedAssignmentVariant => {
                let parent_name = request
                    .param_str("parent_scenario_name")
                    .ok_or_else(|| missing("parent scenario name"))?;
                results.join(parent_name)
            }
            _ => pick("baseDataFolder", self.cfg.base_data_folder.as_ref())
                .ok_or_else(|| missing("base data folder"))?,
        };

        let emme_project_file = results
            .join(project_name)
            .join(format!("{project_name}.emp"));

        Ok(RunPaths {
            python,
            scripts,
            results,
            emme_project_file,
            base_data,
        })
    }

    fn check_request(&self, request: &RunRequest) -> Result<(), OrchestratorError> {
        let name = &request.name;
        if request.param_str("zone_data_file").is_none() {
            return Err(OrchestratorError::Validation(format!(
                "input data (zone_data_file) not selected for scenario \"{name}\""
            )));
        }
        match request.param_i64("iterations") {
            Some(n) if (1..=99).contains(&n) => {}
            _ => {
                return Err(OrchestratorError::Validation(format!(
                    "iterations must be within 1 - 99 for scenario \"{name}\""
                )))
            }
        }
        if request.param_str("cost_data_file").is_none() {
            return Err(OrchestratorError::Validation(format!(
                "cost data file not selected for scenario \"{name}\""
            )));
        }
        Ok(())
    }

    /// Single pre-flight run of the input validator over a whole selection.
    pub fn validation_invocation(
        &self,
        requests: &[RunRequest],
    ) -> Result<Invocation, OrchestratorError> {
        self.check()?;
        let first = requests
            .first()
            .ok_or_else(|| OrchestratorError::Validation("no scenarios selected".into()))?;
        let paths: Vec<RunPaths> = requests
            .iter()
            .map(|r| self.resolve_paths(r))
            .collect::<Result<_, _>>()?;
        let first_paths = &paths[0];

        let mut args = vec![
            "-u".to_string(),
            path_arg(&first_paths.scripts.join(VALIDATE_SCRIPT)),
            "--log-level".into(),
            self.cfg.log_level().into(),
            "--log-format".into(),
            "JSON".into(),
            "--baseline-data-path".into(),
            path_arg(&first_paths.base_data),
            "--results-path".into(),
            path_arg(&first_paths.results),
            "--scenario-name".into(),
        ];
        args.extend(requests.iter().map(|r| r.name.clone()));
        if first.param_bool("end_assignment_only").unwrap_or(false) {
            args.push("--end-assignment-only".into());
        }
        args.push("--emme-paths".into());
        args.extend(paths.iter().map(|p| path_arg(&p.emme_project_file)));
        args.push("--long-dist-demand-forecast".into());
        args.extend(requests.iter().map(long_dist_demand_forecast));
        args.push("--cost-data-paths".into());
        args.extend(requests.iter().map(|r| r.param_str("cost_data_file").unwrap_or_default()));
        args.push("--first-scenario-ids".into());
        args.extend(
            requests
                .iter()
                .map(|r| r.param_str("first_scenario_id").unwrap_or_default()),
        );
        args.push("--forecast-data-paths".into());
        args.extend(requests.iter().map(|r| forecast_data_path(r).unwrap_or_default()));
        if requests
            .iter()
            .all(|r| r.param_bool("separate_emme_scenarios").unwrap_or(false))
        {
            args.push("--separate-emme-scenarios".into());
        }
        args.push("--freight-matrix-paths".into());
        args.extend(
            requests
                .iter()
                .map(|r| r.param_str("freight_matrix_path").unwrap_or_else(|| "none".into())),
        );
        args.push("--submodel".into());
        args.extend(requests.iter().map(|r| r.param_str("submodel").unwrap_or_default()));
        args.push("--model-types".into());
        args.extend(
            requests
                .iter()
                .map(|r| r.request_type.as_model_type().to_string()),
        );

        Ok(Invocation {
            program: first_paths.python.clone(),
            args,
        })
    }

    fn travel_args(&self, request: &RunRequest, paths: &RunPaths) -> Vec<String> {
        let mut args = vec![
            "-u".to_string(),
            path_arg(&paths.scripts.join(TRAVEL_SCRIPT)),
            "--log-level".into(),
            self.cfg.log_level().into(),
            "--log-format".into(),
            "JSON".into(),
            "--scenario-name".into(),
            request.name.clone(),
            "--results-path".into(),
            path_arg(&paths.results),
            "--emme-path".into(),
            path_arg(&paths.emme_project_file),
            "--first-scenario-id".into(),
            request.param_str("first_scenario_id").unwrap_or_default(),
            "--baseline-data-path".into(),
            path_arg(&paths.base_data),
            "--cost-data-path".into(),
            request.param_str("cost_data_file").unwrap_or_default(),
            "--forecast-data-path".into(),
            forecast_data_path(request).unwrap_or_default(),
            "--first-matrix-id".into(),
            first_matrix_id(request),
            "--iterations".into(),
            request.param_str("iterations").unwrap_or_default(),
            "--long-dist-demand-forecast".into(),
            long_dist_demand_forecast(request),
        ];

        let flag = |key: &str| request.param_bool(key).unwrap_or(false);
        if flag("end_assignment_only") {
            args.push("--end-assignment-only".into());
        }
        if request.param_bool("delete_strategy_files").unwrap_or(true) {
            args.push("--del-strat-files".into());
        }
        if flag("separate_emme_scenarios") {
            args.push("--separate-emme-scenarios".into());
        }
        if flag("save_matrices_in_emme") {
            args.push("--save-emme-matrices".into());
        }
        if flag("stored_speed_assignment") {
            args.push("--stored-speed-assignment".into());
        }
        for (key, arg) in [
            ("submodel", "--submodel"),
            ("freight_matrix_path", "--freight-matrix-path"),
        ] {
            if let Some(v) = request.param_str(key) {
                args.push(arg.into());
                args.push(v);
            }
        }
        if let Some(p) = &self.cfg.mode_dest_calibration_file {
            args.push("--mode-dest-calibration-path".into());
            args.push(path_arg(p));
        }
        if let Some(p) = &self.cfg.municipality_calibration_file {
            args.push("--municipality-calibration-path".into());
            args.push(path_arg(p));
        }
        args
    }

    fn freight_args(&self, request: &RunRequest, paths: &RunPaths) -> Vec<String> {
        let mut args = vec![
            "-u".to_string(),
            path_arg(&paths.scripts.join(FREIGHT_SCRIPT)),
            "--log-level".into(),
            self.cfg.log_level().into(),
            "--log-format".into(),
            "JSON".into(),
            "--scenario-name".into(),
            request.name.clone(),
            "--results-path".into(),
            path_arg(&paths.results),
            "--emme-path".into(),
            path_arg(&paths.emme_project_file),
            "--first-scenario-id".into(),
            request.param_str("first_scenario_id").unwrap_or_default(),
            "--cost-data-path".into(),
            request.param_str("cost_data_file").unwrap_or_default(),
            "--forecast-data-path".into(),
            forecast_data_path(request).unwrap_or_default(),
            "--trade-demand-data-path".into(),
            request
                .param_str("trade_demand_data_path")
                .unwrap_or_default(),
            "--first-matrix-id".into(),
            first_matrix_id(request),
        ];
        if request.param_bool("delete_strategy_files").unwrap_or(true) {
            args.push("--del-strat-files".into());
        }
        args
    }
}

impl Launcher for ModelLauncher {
    fn check(&self) -> Result<(), OrchestratorError> {
        if self.cfg.project_name.is_none() {
            return Err(missing("project name"));
        }
        if self.cfg.project_folder.is_none() {
            return Err(missing("project folder"));
        }
        if self.cfg.python_path.is_none() {
            return Err(missing("python path"));
        }
        if self.cfg.scripts_path.is_none() {
            return Err(missing("model system scripts folder"));
        }
        if self.cfg.base_data_folder.is_none() {
            return Err(missing("base data folder"));
        }
        Ok(())
    }

    fn prepare(&self, request: &RunRequest) -> Result<Invocation, OrchestratorError> {
        self.check_request(request)?;
        let paths = self.resolve_paths(request)?;
        let args = match request.request_type {
            RequestType::GoodsTransport => self.freight_args(request, &paths),
            RequestType::PassengerTransport
            | RequestType::LongDistance
            | RequestType::StoredSpeedAssignmentVariant => self.travel_args(request, &paths),
        };
        Ok(Invocation {
            program: paths.python,
            args,
        })
    }
}

fn first_matrix_id(request: &RunRequest) -> String {
    request
        .param_str("first_matrix_id")
        .unwrap_or_else(|| DEFAULT_FIRST_MATRIX_ID.into())
}

fn forecast_data_path(request: &RunRequest) -> Option<String> {
    request
        .param_str("forecast_data_path")
        .or_else(|| request.param_str("zone_data_file"))
}

/// `path` mode forwards the configured file, any other mode is passed through.
fn long_dist_demand_forecast(request: &RunRequest) -> String {
    let mode = request
        .param_str("long_dist_demand_forecast")
        .unwrap_or_else(|| "base".into());
    if mode == "path" {
        request
            .param_str("long_dist_demand_forecast_path")
            .unwrap_or(mode)
    } else {
        mode
    }
}
