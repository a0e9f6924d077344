//! # Output
//!
//! 输出实例：生命周期状态机 + 分块引擎 + 缓冲区。
//!
//! 负责：
//! - `configure` 冻结分块键与格式化模式
//! - 仅在 `started` 状态接受 `emit` / `emits`
//! - `advance_to` 按顺序逐一执行拆除步骤，重复调用只执行剩余步骤
//!
//! ## 使用示例
//!
//! ```ignore
//! use output::{Output, OutputSettings};
//! use contracts::{Emitter, LifecycleState};
//!
//! let output = Output::new("app", buffer);
//! output.configure(OutputSettings::from_config(&config)?)?;
//! output.start().await?;
//!
//! output.emit("app.access", EventTime::now(), record)?;
//!
//! output.advance_to(LifecycleState::Terminated).await?;
//! ```

mod instance;
mod settings;

pub use contracts::{Emitter, LifecycleState};
pub use instance::{Output, OutputSnapshot};
pub use settings::OutputSettings;
