//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::{FlushMode, OutputConfig, PipelineConfig};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    outputs: Vec<OutputInfo>,
}

#[derive(Serialize)]
struct OutputInfo {
    name: String,
    tags: Vec<String>,
    chunk_keys: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timekey_range: Option<i64>,
    format: String,
    time_as_integer: bool,
    buffer: BufferInfo,
    writer: WriterInfo,
}

#[derive(Serialize)]
struct BufferInfo {
    flush_mode: FlushMode,
    flush_interval_ms: u64,
    chunk_limit_records: usize,
    chunk_limit_bytes: usize,
    queue_limit: usize,
    retry_max_times: u32,
}

#[derive(Serialize)]
struct WriterInfo {
    writer_type: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    params: BTreeMap<String, String>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let info = build_config_info(&config);
    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&info);
    }

    Ok(())
}

fn format_name(output: &OutputConfig) -> String {
    output
        .format
        .map_or_else(|| "bulk (msgpack)".to_string(), |kind| kind.to_string())
}

fn build_config_info(config: &PipelineConfig) -> ConfigInfo {
    let outputs = config
        .outputs
        .iter()
        .map(|o| OutputInfo {
            name: o.name.clone(),
            tags: o.tags.clone(),
            chunk_keys: o.buffer.chunk_keys.clone(),
            timekey_range: o.buffer.timekey_range,
            format: format_name(o),
            time_as_integer: o.time_as_integer,
            buffer: BufferInfo {
                flush_mode: o.buffer.flush_mode,
                flush_interval_ms: o.buffer.flush_interval_ms,
                chunk_limit_records: o.buffer.chunk_limit_records,
                chunk_limit_bytes: o.buffer.chunk_limit_bytes,
                queue_limit: o.buffer.queue_limit,
                retry_max_times: o.buffer.retry_max_times,
            },
            writer: WriterInfo {
                writer_type: o.writer.writer_type.to_string(),
                params: o
                    .writer
                    .params
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            },
        })
        .collect();

    ConfigInfo {
        version: format!("{:?}", config.version),
        outputs,
    }
}

fn print_config_info(info: &ConfigInfo) {
    println!("=== chunkline configuration ({}) ===\n", info.version);

    println!("Outputs ({})", info.outputs.len());
    for (i, output) in info.outputs.iter().enumerate() {
        let is_last = i == info.outputs.len() - 1;
        let prefix = if is_last { "└─" } else { "├─" };
        let child = if is_last { "   " } else { "│  " };

        println!("   {} {}", prefix, output.name);
        println!("   {}  ├─ Tags: {}", child, output.tags.join(", "));
        let keys = if output.chunk_keys.is_empty() {
            "(none)".to_string()
        } else {
            output.chunk_keys.join(", ")
        };
        match output.timekey_range {
            Some(range) => println!("   {}  ├─ Chunk keys: {} (timekey {}s)", child, keys, range),
            None => println!("   {}  ├─ Chunk keys: {}", child, keys),
        }
        println!(
            "   {}  ├─ Format: {}{}",
            child,
            output.format,
            if output.time_as_integer { ", integer time" } else { "" }
        );
        println!(
            "   {}  ├─ Buffer: {:?} flush every {}ms, {} records / {} bytes per chunk, queue {}",
            child,
            output.buffer.flush_mode,
            output.buffer.flush_interval_ms,
            output.buffer.chunk_limit_records,
            output.buffer.chunk_limit_bytes,
            output.buffer.queue_limit
        );
        if output.writer.params.is_empty() {
            println!("   {}  └─ Writer: {}", child, output.writer.writer_type);
        } else {
            println!(
                "   {}  └─ Writer: {} {:?}",
                child, output.writer.writer_type, output.writer.params
            );
        }
    }

    println!();
}
