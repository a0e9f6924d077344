//! JSON lines event input
//!
//! 每行一个对象：`{"tag": "...", "time": <int|float|RFC3339>, "record": {...}}`，
//! 缺少 time 时使用当前时间。

use chrono::DateTime;
use contracts::{EventTime, Record};
use serde::Deserialize;
use serde_json::Value;

use crate::error::CliError;

/// One parsed input line
#[derive(Debug, Clone, PartialEq)]
pub struct InputEvent {
    pub tag: String,
    pub time: EventTime,
    pub record: Record,
}

#[derive(Deserialize)]
struct RawLine {
    tag: String,
    #[serde(default)]
    time: Option<Value>,
    #[serde(default)]
    record: Record,
}

/// Parse one input line; `line_no` is 1-based and only used in errors
pub fn parse_line(line: &str, line_no: usize) -> Result<InputEvent, CliError> {
    let raw: RawLine =
        serde_json::from_str(line).map_err(|e| CliError::input_parse(line_no, e.to_string()))?;

    if raw.tag.is_empty() {
        return Err(CliError::input_parse(line_no, "empty tag"));
    }

    let time = match raw.time {
        None | Some(Value::Null) => EventTime::now(),
        Some(value) => parse_time(&value).map_err(|m| CliError::input_parse(line_no, m))?,
    };

    Ok(InputEvent {
        tag: raw.tag,
        time,
        record: raw.record,
    })
}

fn parse_time(value: &Value) -> Result<EventTime, String> {
    match value {
        Value::Number(n) => {
            if let Some(secs) = n.as_i64() {
                Ok(EventTime::from_secs(secs))
            } else if let Some(secs) = n.as_f64() {
                Ok(EventTime::from_secs_f64(secs))
            } else {
                Err(format!("unsupported time value {n}"))
            }
        }
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|t| EventTime::new(t.timestamp(), t.timestamp_subsec_nanos()))
            .map_err(|e| format!("invalid RFC3339 time '{s}': {e}")),
        other => Err(format!("unsupported time value {other}")),
    }
}
