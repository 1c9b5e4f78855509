//! Durable scenario records.
//!
//! Every scenario lives in its own `<name>.json` file inside the project folder.
//! Results are merged into those files at JSON level so fields this crate does not
//! model survive untouched.

use crate::model::{RequestType, RunRequest};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use time::macros::format_description;
use time::OffsetDateTime;

/// Param key carrying a variant's slot in `storedSpeedAssignmentInputs`.
pub const VARIANT_SLOT_PARAM: &str = "stored_speed_assignment_slot";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubScenarioRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "emmeScenarioNumber", default)]
    pub emme_scenario_number: Option<Value>,
    #[serde(default)]
    pub cost_data_file: Option<String>,
    #[serde(default, alias = "lastRun")]
    pub last_run: Option<String>,
    #[serde(default, alias = "runSuccess")]
    pub run_success: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSpeedAssignmentInput {
    #[serde(rename = "firstScenarioId")]
    pub first_scenario_id: Value,
    #[serde(default)]
    pub submodel: Option<String>,
    #[serde(default)]
    pub last_run: Option<String>,
    #[serde(default)]
    pub run_success: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioRecord {
    pub id: String,
    pub name: String,
    #[serde(rename = "scenarioType", default)]
    pub scenario_type: Option<RequestType>,
    #[serde(rename = "subScenarios", default)]
    pub sub_scenarios: Vec<SubScenarioRecord>,
    #[serde(rename = "storedSpeedAssignmentInputs", default)]
    pub stored_speed_assignment_inputs: Vec<Option<StoredSpeedAssignmentInput>>,
    #[serde(default)]
    pub last_run: Option<String>,
    #[serde(default)]
    pub run_success: Option<bool>,
    /// Everything else: run parameters forwarded to the model.
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl ScenarioRecord {
    pub fn request_type(&self) -> RequestType {
        self.scenario_type.unwrap_or_default()
    }
}

/// Terminal result written back onto a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub last_run: String,
    pub run_success: bool,
}

impl CompletionRecord {
    pub fn new(at: OffsetDateTime, success: bool) -> Self {
        Self {
            last_run: format_last_run(at),
            run_success: success,
        }
    }
}

/// `HH:MM:SS DD.MM.YYYY`
pub fn format_last_run(at: OffsetDateTime) -> String {
    at.format(format_description!(
        "[hour]:[minute]:[second] [day].[month].[year]"
    ))
    .unwrap_or_else(|_| at.to_string())
}

#[derive(Debug, Clone, Default)]
pub struct ScenarioStore {
    folder: PathBuf,
    records: Vec<ScenarioRecord>,
    paths: BTreeMap<String, PathBuf>,
}

impl ScenarioStore {
    /// Load every scenario record in `folder`.
    ///
    /// A JSON file counts as a scenario when it has `id`, `name` and `iterations`.
    /// Records are ordered by file name.
    pub fn load(folder: &Path) -> Result<Self> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(folder)
            .with_context(|| format!("read project folder {}", folder.display()))?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        files.sort();

        let mut store = Self {
            folder: folder.to_path_buf(),
            ..Default::default()
        };
        for path in files {
            let raw = match std::fs::read_to_string(&path) {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!("skipping {}: {e}", path.display());
                    continue;
                }
            };
            let Ok(value) = serde_json::from_str::<Value>(&raw) else {
                tracing::debug!("skipping non-JSON file {}", path.display());
                continue;
            };
            let is_scenario = value
                .as_object()
                .is_some_and(|o| ["id", "name", "iterations"].iter().all(|k| o.contains_key(*k)));
            if !is_scenario {
                continue;
            }
            let record: ScenarioRecord = serde_json::from_value(value)
                .with_context(|| format!("parse scenario {}", path.display()))?;
            store.paths.insert(record.id.clone(), path);
            store.records.push(record);
        }
        tracing::debug!(
            "loaded {} scenarios from {}",
            store.records.len(),
            folder.display()
        );
        Ok(store)
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn records(&self) -> &[ScenarioRecord] {
        &self.records
    }

    /// Map ids or names (of scenarios and sub-scenarios) to ids, keeping order.
    pub fn resolve_selection(&self, keys: &[String]) -> Result<Vec<String>> {
        keys.iter()
            .map(|key| {
                self.find_id(key)
                    .ok_or_else(|| anyhow!("unknown scenario '{key}'"))
            })
            .collect()
    }

    fn find_id(&self, key: &str) -> Option<String> {
        for record in &self.records {
            if record.id == key || record.name == key {
                return Some(record.id.clone());
            }
            if let Some(sub) = record
                .sub_scenarios
                .iter()
                .find(|s| s.id == key || s.name == key)
            {
                return Some(sub.id.clone());
            }
        }
        None
    }

    /// True when `id` names a scenario or sub-scenario in this store.
    pub fn contains(&self, id: &str) -> bool {
        self.records
            .iter()
            .any(|r| r.id == id || r.sub_scenarios.iter().any(|s| s.id == id))
    }

    /// Merge a terminal result into the durable record owning `request`.
    ///
    /// Top-level requests update the record's own fields. Sub-scenarios update their
    /// entry in `subScenarios` and variants their slot in
    /// `storedSpeedAssignmentInputs`; the parent's top-level fields are never touched.
    pub fn merge_result(&self, request: &RunRequest, result: &CompletionRecord) -> Result<PathBuf> {
        let owner = request.parent_id.as_deref().unwrap_or(&request.id);
        let path = self
            .paths
            .get(owner)
            .ok_or_else(|| anyhow!("no scenario file for '{owner}'"))?
            .clone();

        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("read scenario {}", path.display()))?;
        let mut doc: Value = serde_json::from_str(&raw)
            .with_context(|| format!("parse scenario {}", path.display()))?;

        let target = match (&request.parent_id, request.request_type) {
            (None, _) => doc.as_object_mut(),
            (Some(_), RequestType::StoredSpeedAssignmentVariant) => {
                let slot = request
                    .param_i64(VARIANT_SLOT_PARAM)
                    .and_then(|s| usize::try_from(s).ok())
                    .ok_or_else(|| anyhow!("variant '{}' has no slot", request.id))?;
                doc.get_mut("storedSpeedAssignmentInputs")
                    .and_then(Value::as_array_mut)
                    .and_then(|slots| slots.get_mut(slot))
                    .and_then(Value::as_object_mut)
            }
            (Some(_), _) => doc
                .get_mut("subScenarios")
                .and_then(Value::as_array_mut)
                .and_then(|subs| {
                    subs.iter_mut()
                        .find(|s| s.get("id").and_then(Value::as_str) == Some(request.id.as_str()))
                })
                .and_then(Value::as_object_mut),
        }
        .ok_or_else(|| anyhow!("no entry for '{}' in {}", request.id, path.display()))?;

        target.remove("lastRun");
        target.remove("runSuccess");
        target.insert("last_run".into(), Value::from(result.last_run.clone()));
        target.insert("run_success".into(), Value::from(result.run_success));

        let out = serde_json::to_string_pretty(&doc)?;
        std::fs::write(&path, out).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }
}
