//! Pipeline orchestration module.

mod input;
mod orchestrator;
mod stats;

pub use input::{parse_line, InputEvent};
pub use orchestrator::{Pipeline, PipelineOptions};
pub use stats::RunStats;
