//! Built-in per-record formatters

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat};
use std::sync::Arc;

use contracts::{FormatError, FormatKind, FormatMode, Formatter, Record, Timestamp};

/// Record as a JSON object followed by a newline
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format(&self, _tag: &str, _time: Timestamp, record: &Record) -> Result<Bytes, FormatError> {
        let mut out = serde_json::to_vec(record)?;
        out.push(b'\n');
        Ok(Bytes::from(out))
    }
}

/// `[time, record]` as JSON, no separator
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonArrayFormatter;

impl Formatter for JsonArrayFormatter {
    fn format(&self, _tag: &str, time: Timestamp, record: &Record) -> Result<Bytes, FormatError> {
        Ok(Bytes::from(serde_json::to_vec(&(time, record))?))
    }
}

/// `time<TAB>tag<TAB>json(record)` line, time as RFC3339 UTC
#[derive(Debug, Default, Clone, Copy)]
pub struct OutFileFormatter;

impl Formatter for OutFileFormatter {
    fn format(&self, tag: &str, time: Timestamp, record: &Record) -> Result<Bytes, FormatError> {
        let (secs, nsecs, precision) = match time {
            Timestamp::Integer(sec) => (sec, 0, SecondsFormat::Secs),
            Timestamp::Event(t) => (t.sec(), t.nsec(), SecondsFormat::AutoSi),
        };
        let rendered = DateTime::from_timestamp(secs, nsecs)
            .ok_or_else(|| FormatError::new(format!("time {secs} out of range")))?
            .to_rfc3339_opts(precision, true);

        let json = serde_json::to_string(record)?;
        Ok(Bytes::from(format!("{rendered}\t{tag}\t{json}\n")))
    }
}

/// Formatter registered under a configuration name
pub fn builtin_formatter(kind: FormatKind) -> Arc<dyn Formatter> {
    match kind {
        FormatKind::Json => Arc::new(JsonFormatter),
        FormatKind::JsonArray => Arc::new(JsonArrayFormatter),
        FormatKind::OutFile => Arc::new(OutFileFormatter),
    }
}

/// Resolve the chunking path from an optional formatter name
pub fn format_mode(kind: Option<FormatKind>) -> FormatMode {
    kind.map_or(FormatMode::Bulk, |k| FormatMode::Custom(builtin_formatter(k)))
}
