//! # Chunking
//!
//! 输出侧分块引擎。
//!
//! 负责：
//! - 按 `ChunkKeySpec` 计算每条事件的 `MetadataKey`
//! - 单遍扫描事件流，按首次出现顺序分组
//! - bulk 模式：msgpack 流编码后 `emit_bulk`
//! - custom 模式：逐条格式化后 `emit`
//!
//! ## 使用示例
//!
//! ```ignore
//! use chunking::ChunkingEngine;
//! use contracts::{ChunkKeySpec, FormatMode};
//!
//! let spec = ChunkKeySpec::parse("time,tag", Some(60))?;
//! let engine = ChunkingEngine::new(spec, FormatMode::Bulk, false);
//!
//! engine.execute_chunking("app.access", &stream, &buffer)?;
//! ```

mod encode;
mod engine;
mod format;
mod key;

pub use encode::{encode_entry, MsgpackStream, EVENT_TIME_EXT_TYPE};
pub use engine::{ChunkingEngine, ChunkingOutcome};
pub use format::{builtin_formatter, format_mode, JsonArrayFormatter, JsonFormatter, OutFileFormatter};
pub use key::derive_key;
