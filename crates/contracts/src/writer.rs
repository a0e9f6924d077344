//! ChunkWriter trait - delivery side of a buffer
//!
//! Defines the abstract interface for chunk transports.

use crate::{BufferError, Chunk};

/// Chunk transport trait
///
/// All writer implementations must implement this trait.
#[trait_variant::make(ChunkWriter: Send)]
pub trait LocalChunkWriter {
    /// Writer name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Deliver one sealed chunk
    ///
    /// # Errors
    /// Returns write error; the caller decides whether to retry
    async fn write(&mut self, chunk: &Chunk) -> Result<(), BufferError>;

    /// Flush buffered output (if any)
    async fn flush(&mut self) -> Result<(), BufferError>;

    /// Close writer
    async fn close(&mut self) -> Result<(), BufferError>;
}
