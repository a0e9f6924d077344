//! # Buffer
//!
//! 参考实现：内存分块缓冲区。
//!
//! 负责：
//! - 按 `MetadataKey` 暂存 chunk，超限或到期时封存
//! - 有界待写出队列，满时向调用方返回 `Overflow`
//! - 后台刷新任务按退避策略重试写出
//! - 关闭时排空队列，不丢失已接收数据

mod memory;
pub mod metrics;
mod settings;
mod worker;
pub mod writers;

pub use contracts::{Buffer, BufferLifecycle, Chunk, ChunkWriter};
pub use memory::MemoryBuffer;
pub use metrics::{BufferMetrics, BufferMetricsSnapshot};
pub use settings::{BufferSettings, RetryPolicy};
pub use writers::{create_writer, ConfiguredWriter, FileWriter, ForwardWriter, LogWriter};
