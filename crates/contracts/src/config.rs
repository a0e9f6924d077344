//! PipelineConfig - Config Loader 输出
//!
//! 描述完整的输出配置：每个 output 的路由 tag、分块键、格式化器、缓冲与写出策略。

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use validator::Validate;

use crate::{ChunkKeySpec, OutputError};

/// 配置版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// 完整的管线配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PipelineConfig {
    /// 配置版本
    #[serde(default)]
    pub version: ConfigVersion,

    /// 输出实例列表
    #[validate(length(min = 1), nested)]
    pub outputs: Vec<OutputConfig>,
}

/// 单个输出实例配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct OutputConfig {
    /// 输出名称 (唯一)
    #[validate(length(min = 1))]
    pub name: String,

    /// 路由到此输出的 tag (精确匹配)
    #[validate(length(min = 1))]
    pub tags: Vec<String>,

    /// 时间戳以整数秒表示
    #[serde(default)]
    pub time_as_integer: bool,

    /// 自定义逐条格式化器 (缺省为 bulk msgpack)
    #[serde(default)]
    pub format: Option<FormatKind>,

    /// 缓冲配置
    #[serde(default)]
    #[validate(nested)]
    pub buffer: BufferConfig,

    /// 写出配置
    #[serde(default)]
    pub writer: WriterConfig,
}

/// 内置格式化器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatKind {
    /// 记录的 JSON 加换行
    Json,
    /// `[time, record]` JSON 数组
    JsonArray,
    /// `time<TAB>tag<TAB>json` 行
    OutFile,
}

impl FormatKind {
    pub const ALL: [FormatKind; 3] = [Self::Json, Self::JsonArray, Self::OutFile];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::JsonArray => "json_array",
            Self::OutFile => "out_file",
        }
    }
}

impl fmt::Display for FormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormatKind {
    type Err = OutputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| OutputError::configuration("format", format!("unknown formatter '{s}'")))
    }
}

/// 缓冲配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BufferConfig {
    /// 分块键；`time` 与 `tag` 为保留字，其余为记录字段
    #[serde(default, deserialize_with = "deserialize_chunk_keys")]
    pub chunk_keys: Vec<String>,

    /// 时间桶宽度 (秒)
    #[serde(default)]
    pub timekey_range: Option<i64>,

    /// 单个 chunk 最大记录数
    #[serde(default = "default_chunk_limit_records")]
    #[validate(range(min = 1))]
    pub chunk_limit_records: usize,

    /// 单个 chunk 最大字节数
    #[serde(default = "default_chunk_limit_bytes")]
    #[validate(range(min = 1))]
    pub chunk_limit_bytes: usize,

    /// 待写出队列容量
    #[serde(default = "default_queue_limit")]
    #[validate(range(min = 1))]
    pub queue_limit: usize,

    /// 刷新模式
    #[serde(default)]
    pub flush_mode: FlushMode,

    /// interval 模式下 chunk 最大停留时间 (毫秒)
    #[serde(default = "default_flush_interval_ms")]
    #[validate(range(min = 1))]
    pub flush_interval_ms: u64,

    /// 关闭前写出所有暂存 chunk
    #[serde(default = "default_flush_at_shutdown")]
    pub flush_at_shutdown: bool,

    /// 首次重试等待 (毫秒)
    #[serde(default = "default_retry_wait_ms")]
    pub retry_wait_ms: u64,

    /// 重试等待上限 (毫秒)
    #[serde(default = "default_retry_max_wait_ms")]
    pub retry_max_wait_ms: u64,

    /// 最大重试次数，超过后丢弃
    #[serde(default = "default_retry_max_times")]
    pub retry_max_times: u32,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            chunk_keys: Vec::new(),
            timekey_range: None,
            chunk_limit_records: default_chunk_limit_records(),
            chunk_limit_bytes: default_chunk_limit_bytes(),
            queue_limit: default_queue_limit(),
            flush_mode: FlushMode::default(),
            flush_interval_ms: default_flush_interval_ms(),
            flush_at_shutdown: default_flush_at_shutdown(),
            retry_wait_ms: default_retry_wait_ms(),
            retry_max_wait_ms: default_retry_max_wait_ms(),
            retry_max_times: default_retry_max_times(),
        }
    }
}

impl BufferConfig {
    /// Validated chunk key specification
    pub fn chunk_key_spec(&self) -> Result<ChunkKeySpec, OutputError> {
        ChunkKeySpec::from_chunk_keys(&self.chunk_keys, self.timekey_range)
    }
}

fn default_chunk_limit_records() -> usize {
    10_000
}

fn default_chunk_limit_bytes() -> usize {
    8 * 1024 * 1024
}

fn default_queue_limit() -> usize {
    64
}

fn default_flush_interval_ms() -> u64 {
    1000
}

fn default_flush_at_shutdown() -> bool {
    true
}

fn default_retry_wait_ms() -> u64 {
    1000
}

fn default_retry_max_wait_ms() -> u64 {
    60_000
}

fn default_retry_max_times() -> u32 {
    5
}

/// Chunk keys as a list or a comma separated string
fn deserialize_chunk_keys<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ChunkKeys {
        List(Vec<String>),
        Csv(String),
    }

    Ok(match ChunkKeys::deserialize(deserializer)? {
        ChunkKeys::List(keys) => keys,
        ChunkKeys::Csv(keys) => keys
            .split(',')
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect(),
    })
}

/// 刷新模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushMode {
    /// 定时封存超过 flush_interval 的 chunk
    #[default]
    Interval,
    /// 每次追加后立即封存
    Immediate,
    /// 仅在超出上限或关闭时封存
    Lazy,
}

/// 写出配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Writer 类型
    #[serde(default)]
    pub writer_type: WriterType,

    /// 类型特定参数
    #[serde(default)]
    pub params: HashMap<String, String>,
}

/// Writer 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriterType {
    /// 日志输出
    #[default]
    Log,
    /// 文件输出
    File,
    /// TCP forward 输出
    Forward,
}

impl fmt::Display for WriterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Log => "log",
            Self::File => "file",
            Self::Forward => "forward",
        })
    }
}
