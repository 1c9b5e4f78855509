use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use time::OffsetDateTime;

/// Kind of model run a request maps to. Decides which entry script is invoked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestType {
    #[default]
    #[serde(rename = "PASSENGER_TRANSPORT", alias = "passenger_transport")]
    PassengerTransport,
    #[serde(rename = "LONG_DISTANCE", alias = "long_distance")]
    LongDistance,
    #[serde(rename = "GOODS_TRANSPORT", alias = "goods_transport")]
    GoodsTransport,
    #[serde(rename = "STORED_SPEED_ASSIGNMENT")]
    StoredSpeedAssignmentVariant,
}

impl RequestType {
    /// Value forwarded to the model system's `--model-types` argument.
    pub fn as_model_type(self) -> &'static str {
        match self {
            RequestType::PassengerTransport | RequestType::StoredSpeedAssignmentVariant => {
                "PASSENGER_TRANSPORT"
            }
            RequestType::LongDistance => "LONG_DISTANCE",
            RequestType::GoodsTransport => "GOODS_TRANSPORT",
        }
    }
}

/// Placement tier inside one selection slot. Declaration order is the tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    Parent,
    Variant,
    SubScenario,
}

/// Composite execution-order key, compared lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderKey {
    pub primary: usize,
    pub tier: Tier,
    pub tier_order: usize,
}

/// One executable unit of a batch. Built when a batch is submitted, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    pub id: String,
    pub name: String,
    pub request_type: RequestType,
    pub parent_id: Option<String>,
    pub order_key: OrderKey,
    /// Opaque run parameters forwarded to the external process.
    pub params: Map<String, Value>,
}

impl RunRequest {
    pub fn param_str(&self, key: &str) -> Option<String> {
        match self.params.get(key)? {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn param_bool(&self, key: &str) -> Option<bool> {
        match self.params.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn param_i64(&self, key: &str) -> Option<i64> {
        match self.params.get(key)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    #[default]
    Idle,
    Queued,
    Running,
    Finished,
    Failed,
    Cancelled,
}

/// One parsed `Demand model convergence in ...` sample. Kept as the raw tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvergencePoint {
    pub iteration: String,
    pub value: String,
}

/// Live progress of one scenario or sub-scenario record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStatus {
    pub state: RunState,
    pub iterations_total: Option<i64>,
    pub iterations_current: Option<i64>,
    pub iterations_completed: Option<i64>,
    pub iterations_failed: Option<i64>,
    /// Last `status.state` reported by the model process.
    pub status_state: Option<String>,
    pub log_file_path: Option<PathBuf>,
    pub result_data_folder: Option<PathBuf>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub run_start_time: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub run_finish_time: Option<OffsetDateTime>,
    pub convergence_series: Vec<ConvergencePoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    #[serde(rename = "INFO")]
    Info,
    #[serde(rename = "DEBUG")]
    Debug,
    #[serde(rename = "WARNING", alias = "WARN")]
    Warning,
    #[serde(rename = "ERROR", alias = "CRITICAL")]
    Error,
    #[serde(rename = "EXCEPTION")]
    Exception,
    #[serde(rename = "UI-event")]
    UiEvent,
    #[serde(rename = "NEWLINE")]
    Newline,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Exception => "EXCEPTION",
            LogLevel::UiEvent => "UI-event",
            LogLevel::Newline => "NEWLINE",
        }
    }
}

/// Structured progress block attached to some model log records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

pub const STATUS_STATE_STARTING: &str = "STARTING";
pub const STATUS_STATE_FINISHED: &str = "FINISHED";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub level: LogLevel,
    pub message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusPayload>,
}

impl LogEvent {
    pub fn ui_event(message: impl Into<String>) -> Self {
        Self {
            level: LogLevel::UiEvent,
            message: message.into(),
            timestamp: now_local(),
            status: None,
        }
    }

    pub fn newline() -> Self {
        Self {
            level: LogLevel::Newline,
            message: String::new(),
            timestamp: now_local(),
            status: None,
        }
    }
}

/// Lifecycle and log events streamed to presentation layers while a batch runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    /// Always precedes the matching `RequestCompleted`, also when the launch failed.
    RequestStarted {
        id: String,
    },
    RequestCompleted {
        id: String,
        error: Option<String>,
    },
    AllCompleted {
        error: Option<String>,
    },
    Log(LogEvent),
}

/// Local wall-clock time, falling back to UTC when the offset cannot be determined.
pub fn now_local() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}
