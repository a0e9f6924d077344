//! LogWriter - logs chunk summary via tracing

use contracts::{BufferError, Chunk, ChunkWriter};
use tracing::{info, instrument};

/// Writer that logs chunk summaries for debugging
pub struct LogWriter {
    name: String,
    written: u64,
}

impl LogWriter {
    /// Create a new LogWriter with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            written: 0,
        }
    }

    /// Chunks logged so far
    pub fn written(&self) -> u64 {
        self.written
    }

    fn log_chunk_summary(&self, chunk: &Chunk) {
        info!(
            writer = %self.name,
            chunk_id = %chunk.id,
            key = %chunk.key,
            records = chunk.records,
            bytes = chunk.bytesize(),
            "Chunk flushed"
        );
    }
}

impl ChunkWriter for LogWriter {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_writer_write",
        skip(self, chunk),
        fields(writer = %self.name, chunk_id = %chunk.id)
    )]
    async fn write(&mut self, chunk: &Chunk) -> Result<(), BufferError> {
        self.log_chunk_summary(chunk);
        self.written += 1;
        Ok(())
    }

    #[instrument(name = "log_writer_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), BufferError> {
        // Nothing to flush for log writer
        Ok(())
    }

    #[instrument(name = "log_writer_close", skip(self))]
    async fn close(&mut self) -> Result<(), BufferError> {
        info!(writer = %self.name, chunks = self.written, "LogWriter closed");
        Ok(())
    }
}
