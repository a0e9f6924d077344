//! Error types for CLI operations.

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Malformed input line
    #[error("Invalid input at line {line}: {message}")]
    InputParse { line: usize, message: String },

    /// Output assembly or teardown failure
    #[error("Pipeline error in output '{output}': {message}")]
    Pipeline { output: String, message: String },
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn input_parse(line: usize, message: impl Into<String>) -> Self {
        Self::InputParse {
            line,
            message: message.into(),
        }
    }

    pub fn pipeline(output: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Pipeline {
            output: output.into(),
            message: message.into(),
        }
    }
}
