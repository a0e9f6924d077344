//! Dispatcher error types

use contracts::OutputError;
use thiserror::Error;

/// Route table construction errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Tag already routed to another output
    #[error("tag '{tag}' already routed to '{existing}', cannot route to '{output}'")]
    DuplicateTag {
        tag: String,
        existing: String,
        output: String,
    },

    /// Empty tag
    #[error("empty tag for output '{output}'")]
    EmptyTag { output: String },
}

impl DispatcherError {
    /// Create a duplicate tag error
    pub fn duplicate_tag(
        tag: impl Into<String>,
        existing: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self::DuplicateTag {
            tag: tag.into(),
            existing: existing.into(),
            output: output.into(),
        }
    }
}

impl From<DispatcherError> for OutputError {
    fn from(e: DispatcherError) -> Self {
        OutputError::configuration("tags", e.to_string())
    }
}
