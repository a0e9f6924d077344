//! Layered error definitions
//!
//! Categorized by source: configuration / lifecycle / routing / formatter / buffer

use thiserror::Error;

use crate::LifecycleState;

/// Unified output error type
#[derive(Debug, Error)]
pub enum OutputError {
    // ===== Configuration Errors =====
    /// Invalid or conflicting configuration
    #[error("configuration error at '{field}': {message}")]
    Configuration { field: String, message: String },

    /// Configuration file could not be parsed
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // ===== Lifecycle Errors =====
    /// Emission attempted outside the `started` window
    #[error("output '{output}' is not ready to emit (state: {state})")]
    NotReady {
        output: String,
        state: LifecycleState,
    },

    /// Forward transition that needs inputs `advance_to` cannot provide
    #[error("invalid lifecycle transition from {from} to {to}")]
    InvalidTransition {
        from: LifecycleState,
        to: LifecycleState,
    },

    // ===== Routing Errors =====
    /// No output is registered for the tag
    #[error("no route for tag '{tag}'")]
    NoRoute { tag: String },

    // ===== Formatter Errors =====
    /// A registered formatter failed on a record
    #[error("formatter failed for tag '{tag}': {source}")]
    Formatter {
        tag: String,
        #[source]
        source: FormatError,
    },

    // ===== Buffer Errors =====
    /// Buffer-reported error, propagated unchanged
    #[error("buffer error: {0}")]
    Buffer(#[from] BufferError),

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl OutputError {
    /// Create configuration error
    pub fn configuration(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create not-ready error
    pub fn not_ready(output: impl Into<String>, state: LifecycleState) -> Self {
        Self::NotReady {
            output: output.into(),
            state,
        }
    }

    /// Create no-route error
    pub fn no_route(tag: impl Into<String>) -> Self {
        Self::NoRoute { tag: tag.into() }
    }

    /// Wrap a formatter failure
    pub fn formatter(tag: impl Into<String>, source: FormatError) -> Self {
        Self::Formatter {
            tag: tag.into(),
            source,
        }
    }

    /// Whether this is a configuration-time failure
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. } | Self::ConfigParse { .. })
    }
}

/// Errors reported by a buffer or one of its chunk writers
#[derive(Debug, Error)]
pub enum BufferError {
    /// Append before the buffer was started
    #[error("buffer is not started")]
    NotStarted,

    /// Append after the buffer was shut down
    #[error("buffer is closed")]
    Closed,

    /// Flush queue is full (backpressure)
    #[error("flush queue full: {queued} chunks queued, limit {limit}")]
    Overflow { queued: usize, limit: usize },

    /// Chunk writer failure
    #[error("writer '{writer}' error: {message}")]
    Write { writer: String, message: String },

    /// Serialization failure
    #[error("encode error: {message}")]
    Encode { message: String },

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BufferError {
    /// Create writer error
    pub fn write(writer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Write {
            writer: writer.into(),
            message: message.into(),
        }
    }

    /// Create encode error
    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode {
            message: message.into(),
        }
    }
}

/// Failure of a per-record formatter
#[derive(Debug, Error)]
#[error("{message}")]
pub struct FormatError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl FormatError {
    /// Create a formatter error from a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Create a formatter error wrapping an underlying cause
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<serde_json::Error> for FormatError {
    fn from(e: serde_json::Error) -> Self {
        Self::with_source(format!("json error: {e}"), e)
    }
}
