//! FileWriter - writes each chunk to its own file, laid out by metadata key

use chrono::DateTime;
use contracts::{BufferError, Chunk, ChunkWriter, MetadataKey};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, error, instrument};

/// Placeholder segment for an absent key component
const ABSENT: &str = "_";

/// Configuration for FileWriter
#[derive(Debug, Clone)]
pub struct FileWriterConfig {
    /// Base output directory
    pub base_path: PathBuf,
    /// File extension, without the dot
    pub extension: String,
}

impl FileWriterConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let base_path = params
            .get("base_path")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./output"));
        let extension = params
            .get("extension")
            .cloned()
            .unwrap_or_else(|| "log".to_string());

        Self {
            base_path,
            extension,
        }
    }
}

/// Writer that stores chunks as files
///
/// Layout: `base/<tag>/<timekey %Y%m%d%H%M%S>/<var=value,...>.<chunk_id>.<ext>`,
/// absent components written as `_`.
pub struct FileWriter {
    name: String,
    config: FileWriterConfig,
    created_dirs: HashSet<PathBuf>,
}

impl FileWriter {
    /// Create a new FileWriter
    pub fn new(name: impl Into<String>, config: FileWriterConfig) -> std::io::Result<Self> {
        // Create base directory if it doesn't exist
        fs::create_dir_all(&config.base_path)?;

        Ok(Self {
            name: name.into(),
            config,
            created_dirs: HashSet::new(),
        })
    }

    /// Create from params map (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> std::io::Result<Self> {
        Self::new(name, FileWriterConfig::from_params(params))
    }

    /// Target path of a chunk
    pub fn chunk_path(&self, chunk: &Chunk) -> PathBuf {
        let (dir, stem) = key_segments(&chunk.key);
        self.config
            .base_path
            .join(dir)
            .join(format!("{stem}.{}.{}", chunk.id, self.config.extension))
    }

    fn write_chunk_to_disk(&mut self, chunk: &Chunk) -> std::io::Result<PathBuf> {
        let path = self.chunk_path(chunk);
        if let Some(dir) = path.parent() {
            if !self.created_dirs.contains(dir) {
                fs::create_dir_all(dir)?;
                self.created_dirs.insert(dir.to_path_buf());
            }
        }
        fs::write(&path, &chunk.data)?;
        Ok(path)
    }
}

/// Directory (`tag/timekey`) and file stem (`variables`) for a key
fn key_segments(key: &MetadataKey) -> (PathBuf, String) {
    let tag = key
        .tag
        .as_deref()
        .map(sanitize)
        .unwrap_or_else(|| ABSENT.to_string());

    let timekey = key
        .timekey
        .and_then(|t| DateTime::from_timestamp(t, 0))
        .map(|dt| dt.format("%Y%m%d%H%M%S").to_string())
        .unwrap_or_else(|| ABSENT.to_string());

    let stem = match &key.variables {
        Some(vars) if !vars.is_empty() => vars
            .iter()
            .map(|(name, value)| format!("{}={}", sanitize(name), sanitize(&render(value))))
            .collect::<Vec<_>>()
            .join(","),
        _ => ABSENT.to_string(),
    };

    (PathBuf::from(tag).join(timekey), stem)
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Keep a path segment free of separators and control characters
fn sanitize(segment: &str) -> String {
    let cleaned: String = segment
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => ABSENT.to_string(),
        _ => cleaned,
    }
}

impl ChunkWriter for FileWriter {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "file_writer_write",
        skip(self, chunk),
        fields(writer = %self.name, chunk_id = %chunk.id)
    )]
    async fn write(&mut self, chunk: &Chunk) -> Result<(), BufferError> {
        match self.write_chunk_to_disk(chunk) {
            Ok(path) => {
                debug!(writer = %self.name, path = %path.display(), "Chunk written");
                Ok(())
            }
            Err(e) => {
                error!(writer = %self.name, chunk_id = %chunk.id, error = %e, "Write failed");
                Err(BufferError::write(&self.name, e.to_string()))
            }
        }
    }

    #[instrument(name = "file_writer_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), BufferError> {
        Ok(())
    }

    #[instrument(name = "file_writer_close", skip(self))]
    async fn close(&mut self) -> Result<(), BufferError> {
        debug!(writer = %self.name, "FileWriter closed");
        Ok(())
    }
}
