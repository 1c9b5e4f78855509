//! Classification of raw model output into typed log events.
//!
//! The model system writes one JSON record per line (`--log-format JSON`). Anything
//! that does not parse as such a record, e.g. numpy warnings printed straight to
//! stderr, becomes an `EXCEPTION` event carrying the raw text.

use crate::model::{ConvergencePoint, LogEvent, LogLevel, StatusPayload};
use serde::Deserialize;
use time::OffsetDateTime;

/// Marker the model prints once per demand-model iteration.
pub const CONVERGENCE_MARKER: &str = "Demand model convergence in";

#[derive(Debug, Deserialize)]
struct RawRecord {
    level: LogLevel,
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<StatusPayload>,
}

/// Turn one output unit into exactly one log event.
pub fn classify(unit: &str, timestamp: OffsetDateTime) -> LogEvent {
    match serde_json::from_str::<RawRecord>(unit) {
        Ok(raw) => LogEvent {
            level: raw.level,
            message: raw.message,
            timestamp,
            status: raw.status,
        },
        Err(_) => LogEvent {
            level: LogLevel::Exception,
            message: unit.to_string(),
            timestamp,
            status: None,
        },
    }
}

/// Extract `(iteration, value)` from an INFO convergence message.
///
/// The iteration is the third-from-last whitespace token and the value the last one.
pub fn parse_convergence(event: &LogEvent) -> Option<ConvergencePoint> {
    if event.level != LogLevel::Info || !event.message.contains(CONVERGENCE_MARKER) {
        return None;
    }
    parse_convergence_message(&event.message)
}

pub fn parse_convergence_message(message: &str) -> Option<ConvergencePoint> {
    let tokens: Vec<&str> = message.split_whitespace().collect();
    if tokens.len() < 3 {
        return None;
    }
    Some(ConvergencePoint {
        iteration: tokens[tokens.len() - 3].to_string(),
        value: tokens[tokens.len() - 1].to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> OffsetDateTime {
        OffsetDateTime::UNIX_EPOCH
    }

    #[test]
    fn structured_record_keeps_fields() {
        let ev = classify(
            r#"{"level":"INFO","message":"Starting","status":{"state":"STARTING","total":15}}"#,
            ts(),
        );
        assert_eq!(ev.level, LogLevel::Info);
        assert_eq!(ev.message, "Starting");
        let status = ev.status.expect("status payload");
        assert_eq!(status.state.as_deref(), Some("STARTING"));
        assert_eq!(status.total, Some(15));
        assert_eq!(status.completed, None);
    }

    #[test]
    fn free_text_becomes_exception() {
        let raw = "RuntimeWarning: invalid value encountered in divide";
        let ev = classify(raw, ts());
        assert_eq!(ev.level, LogLevel::Exception);
        assert_eq!(ev.message, raw);
        assert!(ev.status.is_none());
    }

    #[test]
    fn non_record_json_becomes_exception() {
        for raw in ["42", "null", "[1,2]", r#"{"message":"no level"}"#, r#"{"level":"TRACE"}"#] {
            let ev = classify(raw, ts());
            assert_eq!(ev.level, LogLevel::Exception, "{raw}");
            assert_eq!(ev.message, raw);
        }
    }

    #[test]
    fn mixed_stream_yields_one_event_per_unit_in_order() {
        let units = [
            r#"{"level":"DEBUG","message":"a"}"#,
            "plain warning",
            r#"{"level":"WARNING","message":"b"}"#,
            "{broken json",
            r#"{"level":"ERROR","message":"c"}"#,
        ];
        let events: Vec<LogEvent> = units.iter().map(|u| classify(u, ts())).collect();
        let summary: Vec<(LogLevel, &str)> = events
            .iter()
            .map(|e| (e.level, e.message.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (LogLevel::Debug, "a"),
                (LogLevel::Exception, "plain warning"),
                (LogLevel::Warning, "b"),
                (LogLevel::Exception, "{broken json"),
                (LogLevel::Error, "c"),
            ]
        );
    }

    #[test]
    fn convergence_tokens() {
        let point =
            parse_convergence_message("Demand model convergence in iteration 7 value 0.00234")
                .unwrap();
        assert_eq!(point.iteration, "7");
        assert_eq!(point.value, "0.00234");
    }

    #[test]
    fn convergence_requires_info_and_marker() {
        let info = classify(
            r#"{"level":"INFO","message":"Demand model convergence in iteration 2 is 0.5"}"#,
            ts(),
        );
        assert_eq!(
            parse_convergence(&info),
            Some(ConvergencePoint {
                iteration: "2".into(),
                value: "0.5".into()
            })
        );

        let debug = classify(
            r#"{"level":"DEBUG","message":"Demand model convergence in iteration 2 is 0.5"}"#,
            ts(),
        );
        assert_eq!(parse_convergence(&debug), None);

        let other = classify(r#"{"level":"INFO","message":"Assignment done"}"#, ts());
        assert_eq!(parse_convergence(&other), None);
    }
}
