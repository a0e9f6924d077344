//! Chunk writers
//!
//! 封存后的 chunk 由刷新任务交给 writer 写出：
//! - `LogWriter`: 仅记录摘要
//! - `FileWriter`: 每个 chunk 一个文件，按分块键分目录
//! - `ForwardWriter`: TCP packed-forward

mod file;
mod forward;
mod log;

pub use file::{FileWriter, FileWriterConfig};
pub use forward::{ForwardWriter, ForwardWriterConfig};
pub use log::LogWriter;

use contracts::{BufferError, Chunk, ChunkWriter, WriterConfig, WriterType};

/// Writer selected by configuration
pub enum ConfiguredWriter {
    Log(LogWriter),
    File(FileWriter),
    Forward(ForwardWriter),
}

impl ChunkWriter for ConfiguredWriter {
    fn name(&self) -> &str {
        match self {
            Self::Log(w) => w.name(),
            Self::File(w) => w.name(),
            Self::Forward(w) => w.name(),
        }
    }

    async fn write(&mut self, chunk: &Chunk) -> Result<(), BufferError> {
        match self {
            Self::Log(w) => w.write(chunk).await,
            Self::File(w) => w.write(chunk).await,
            Self::Forward(w) => w.write(chunk).await,
        }
    }

    async fn flush(&mut self) -> Result<(), BufferError> {
        match self {
            Self::Log(w) => w.flush().await,
            Self::File(w) => w.flush().await,
            Self::Forward(w) => w.flush().await,
        }
    }

    async fn close(&mut self) -> Result<(), BufferError> {
        match self {
            Self::Log(w) => w.close().await,
            Self::File(w) => w.close().await,
            Self::Forward(w) => w.close().await,
        }
    }
}

/// Create a writer from configuration
///
/// The forward writer connects lazily, so creation never touches the network.
pub fn create_writer(name: &str, config: &WriterConfig) -> Result<ConfiguredWriter, BufferError> {
    match config.writer_type {
        WriterType::Log => Ok(ConfiguredWriter::Log(LogWriter::new(name))),
        WriterType::File => FileWriter::from_params(name, &config.params)
            .map(ConfiguredWriter::File)
            .map_err(|e| BufferError::write(name, e.to_string())),
        WriterType::Forward => {
            ForwardWriter::from_params(name, &config.params).map(ConfiguredWriter::Forward)
        }
    }
}
