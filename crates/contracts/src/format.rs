//! Per-record formatter and output mode

use bytes::Bytes;
use std::fmt;
use std::sync::Arc;

use crate::{FormatError, Record, Timestamp};

/// Custom per-record formatter
pub trait Formatter: Send + Sync {
    fn format(&self, tag: &str, time: Timestamp, record: &Record) -> Result<Bytes, FormatError>;
}

impl<F> Formatter for F
where
    F: Fn(&str, Timestamp, &Record) -> Result<Bytes, FormatError> + Send + Sync,
{
    fn format(&self, tag: &str, time: Timestamp, record: &Record) -> Result<Bytes, FormatError> {
        self(tag, time, record)
    }
}

/// Chunking path, resolved once at configure time
#[derive(Clone, Default)]
pub enum FormatMode {
    /// Standard msgpack stream, no per-record formatting
    #[default]
    Bulk,
    /// Registered formatter applied to every record
    Custom(Arc<dyn Formatter>),
}

impl FormatMode {
    /// Wrap a formatter
    pub fn custom(formatter: impl Formatter + 'static) -> Self {
        Self::Custom(Arc::new(formatter))
    }

    pub fn is_bulk(&self) -> bool {
        matches!(self, Self::Bulk)
    }

    /// Same mode; custom formatters compare by identity
    pub fn same_as(&self, other: &FormatMode) -> bool {
        match (self, other) {
            (Self::Bulk, Self::Bulk) => true,
            (Self::Custom(a), Self::Custom(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for FormatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bulk => f.write_str("Bulk"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_is_formatter() {
        let mode = FormatMode::custom(
            |tag: &str, _t: Timestamp, _r: &Record| -> Result<Bytes, FormatError> {
                Ok(Bytes::from(tag.to_string()))
            },
        );
        let FormatMode::Custom(f) = &mode else {
            panic!("expected custom mode");
        };
        let out = f
            .format("app", Timestamp::Integer(0), &Record::new())
            .unwrap();
        assert_eq!(out, Bytes::from_static(b"app"));
    }

    #[test]
    fn test_same_as_compares_identity() {
        let f: Arc<dyn Formatter> = Arc::new(
            |_: &str, _: Timestamp, _: &Record| -> Result<Bytes, FormatError> { Ok(Bytes::new()) },
        );
        let a = FormatMode::Custom(f.clone());
        let b = FormatMode::Custom(f);
        let c = FormatMode::custom(
            |_: &str, _: Timestamp, _: &Record| -> Result<Bytes, FormatError> { Ok(Bytes::new()) },
        );

        assert!(a.same_as(&b));
        assert!(!a.same_as(&c));
        assert!(FormatMode::Bulk.same_as(&FormatMode::Bulk));
        assert!(!FormatMode::Bulk.same_as(&a));
    }
}
