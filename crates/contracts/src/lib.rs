//! # Contracts
//!
//! Frozen interface contracts, defining the data model and traits shared by
//! every crate of the output pipeline.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Event time is epoch seconds plus nanoseconds (`EventTime`)
//! - Outputs may coerce it to integer seconds (`Timestamp::Integer`) per configuration
//!
//! ## Chunk Model
//! - Each event is mapped to a `MetadataKey` derived from a `ChunkKeySpec`
//! - A `Buffer` owns one chunk per key; chunks are flushed through a `ChunkWriter`

mod buffer;
mod chunk;
mod config;
mod emitter;
mod error;
mod event;
mod format;
mod key;
mod lifecycle;
mod time;
mod writer;

pub use buffer::{Buffer, BufferLifecycle};
pub use chunk::{Chunk, ChunkId};
pub use config::*;
pub use emitter::Emitter;
pub use error::*;
pub use event::{Event, EventIter, EventStream, Record};
pub use format::{FormatMode, Formatter};
pub use key::{ChunkKeySpec, MetadataKey, Variables, TAG_CHUNK_KEY, TIME_CHUNK_KEY};
pub use lifecycle::LifecycleState;
pub use time::{EventTime, Timestamp};
pub use writer::{ChunkWriter, LocalChunkWriter};
