//! Chunk - sealed accumulation unit handed to a chunk writer

use bytes::Bytes;
use std::fmt;

use crate::MetadataKey;

/// Monotonically increasing chunk identifier, unique within one buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkId(pub u64);

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Sealed chunk: one metadata key, its payload and record count
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: ChunkId,
    pub key: MetadataKey,
    pub data: Bytes,
    pub records: usize,
}

impl Chunk {
    pub fn new(id: ChunkId, key: MetadataKey, data: Bytes, records: usize) -> Self {
        Self {
            id,
            key,
            data,
            records,
        }
    }

    /// Payload size in bytes
    #[inline]
    pub fn bytesize(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_id_display_is_fixed_width_hex() {
        assert_eq!(ChunkId(255).to_string(), "00000000000000ff");
    }
}
