//! Buffer contract - keyed chunk store fed by the chunking engine

use bytes::Bytes;
use std::future::Future;

use crate::{BufferError, MetadataKey};

/// Keyed chunk store
///
/// Both appends create the chunk for `key` when absent. Implementations must
/// accept concurrent calls for distinct or identical keys; one call is the
/// atomic unit of append.
pub trait Buffer: Send + Sync {
    /// Append `count` records already encoded as one msgpack stream
    fn emit_bulk(&self, key: MetadataKey, data: Bytes, count: usize) -> Result<(), BufferError>;

    /// Append formatter-produced items, in order
    fn emit(&self, key: MetadataKey, items: Vec<Bytes>) -> Result<(), BufferError>;
}

/// Buffer lifecycle hooks, driven by the owning output
///
/// Every hook must be idempotent.
pub trait BufferLifecycle: Buffer {
    /// Attach storage and start flushing
    fn start(&self) -> impl Future<Output = Result<(), BufferError>> + Send;

    /// Seal and enqueue staged chunks when configured to flush at shutdown
    fn before_shutdown(&self) -> impl Future<Output = Result<(), BufferError>> + Send;

    /// Drain the flush queue and release the writer
    fn shutdown(&self) -> impl Future<Output = Result<(), BufferError>> + Send;

    /// Release whatever is left
    fn close(&self) -> impl Future<Output = Result<(), BufferError>> + Send;
}
