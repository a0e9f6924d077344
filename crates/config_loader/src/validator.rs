//! 配置校验模块
//!
//! 校验规则：
//! - 字段级规则 (validator derive)：非空列表、上限 >= 1
//! - output 名称唯一
//! - 每个 tag 至多路由到一个 output
//! - 分块键合法 (time 需要 timekey_range, timekey_range > 0)
//! - retry_wait_ms <= retry_max_wait_ms
//! - writer 必填参数齐全

use std::collections::{HashMap, HashSet};

use contracts::{OutputConfig, OutputError, PipelineConfig, WriterType};
use validator::Validate;

/// 校验 PipelineConfig 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(config: &PipelineConfig) -> Result<(), OutputError> {
    config
        .validate()
        .map_err(|e| OutputError::configuration("outputs", e.to_string()))?;
    validate_output_names(config)?;
    validate_tags(config)?;
    for output in &config.outputs {
        validate_chunk_keys(output)?;
        validate_retry(output)?;
        validate_writer(output)?;
    }
    Ok(())
}

/// 校验 output 名称唯一性
fn validate_output_names(config: &PipelineConfig) -> Result<(), OutputError> {
    let mut seen = HashSet::new();
    for output in &config.outputs {
        if !seen.insert(&output.name) {
            return Err(OutputError::configuration(
                format!("outputs[name={}]", output.name),
                "duplicate output name",
            ));
        }
    }
    Ok(())
}

/// 校验 tag 路由唯一性
fn validate_tags(config: &PipelineConfig) -> Result<(), OutputError> {
    let mut routes: HashMap<&str, &str> = HashMap::new();
    for output in &config.outputs {
        for tag in &output.tags {
            if tag.is_empty() {
                return Err(OutputError::configuration(
                    format!("outputs[{}].tags", output.name),
                    "tag cannot be empty",
                ));
            }
            if let Some(existing) = routes.insert(tag, &output.name) {
                return Err(OutputError::configuration(
                    format!("outputs[{}].tags", output.name),
                    format!("tag '{tag}' already routed to '{existing}'"),
                ));
            }
        }
    }
    Ok(())
}

/// 校验分块键
fn validate_chunk_keys(output: &OutputConfig) -> Result<(), OutputError> {
    output.buffer.chunk_key_spec().map(|_| ()).map_err(|e| match e {
        OutputError::Configuration { field, message } => OutputError::configuration(
            format!("outputs[{}].buffer.{field}", output.name),
            message,
        ),
        other => other,
    })
}

/// 校验重试等待范围
fn validate_retry(output: &OutputConfig) -> Result<(), OutputError> {
    let buffer = &output.buffer;
    if buffer.retry_wait_ms > buffer.retry_max_wait_ms {
        return Err(OutputError::configuration(
            format!("outputs[{}].buffer.retry_wait_ms", output.name),
            format!(
                "retry_wait_ms ({}) must be <= retry_max_wait_ms ({})",
                buffer.retry_wait_ms, buffer.retry_max_wait_ms
            ),
        ));
    }
    Ok(())
}

/// 校验 writer 配置
fn validate_writer(output: &OutputConfig) -> Result<(), OutputError> {
    let writer = &output.writer;
    if writer.writer_type != WriterType::Forward {
        return Ok(());
    }

    let field = format!("outputs[{}].writer", output.name);
    if writer.params.get("addr").map_or(true, |a| a.is_empty()) {
        return Err(OutputError::configuration(
            field,
            "forward writer requires 'addr' param",
        ));
    }
    if let Some(kind) = output.format {
        return Err(OutputError::configuration(
            field,
            format!("forward writer needs bulk msgpack chunks, cannot use format '{kind}'"),
        ));
    }
    Ok(())
}
