//! Frozen per-output chunking settings

use contracts::{ChunkKeySpec, FormatMode, OutputConfig, OutputError};

/// Everything `configure` freezes
#[derive(Debug, Clone, Default)]
pub struct OutputSettings {
    pub spec: ChunkKeySpec,
    pub time_as_integer: bool,
    pub format: FormatMode,
}

impl OutputSettings {
    pub fn new(spec: ChunkKeySpec, time_as_integer: bool, format: FormatMode) -> Self {
        Self {
            spec,
            time_as_integer,
            format,
        }
    }

    /// Resolve settings from an output configuration
    ///
    /// # Errors
    /// `Configuration` when the chunk keys are invalid.
    pub fn from_config(config: &OutputConfig) -> Result<Self, OutputError> {
        Ok(Self {
            spec: config.buffer.chunk_key_spec()?,
            time_as_integer: config.time_as_integer,
            format: chunking::format_mode(config.format),
        })
    }

    /// Same settings; custom formatters compare by identity
    pub fn same_as(&self, other: &OutputSettings) -> bool {
        self.spec == other.spec
            && self.time_as_integer == other.time_as_integer
            && self.format.same_as(&other.format)
    }
}
