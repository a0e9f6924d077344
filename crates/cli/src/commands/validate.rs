//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{FlushMode, PipelineConfig, WriterType};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    output_count: usize,
    tag_count: usize,
    custom_format_count: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{json}");
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

impl ValidationResult {
    fn invalid(config_path: String, error: impl Into<String>) -> Self {
        Self {
            valid: false,
            config_path,
            error: Some(error.into()),
            warnings: None,
            summary: None,
        }
    }

    fn valid(config_path: String, config: &PipelineConfig) -> Self {
        let warnings = collect_warnings(config);
        Self {
            valid: true,
            config_path,
            error: None,
            warnings: (!warnings.is_empty()).then_some(warnings),
            summary: Some(ConfigSummary::of(config)),
        }
    }
}

impl ConfigSummary {
    fn of(config: &PipelineConfig) -> Self {
        Self {
            version: format!("{:?}", config.version),
            output_count: config.outputs.len(),
            tag_count: config.outputs.iter().map(|o| o.tags.len()).sum(),
            custom_format_count: config.outputs.iter().filter(|o| o.format.is_some()).count(),
        }
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        let message = format!("File not found: {config_path}");
        return ValidationResult::invalid(config_path, message);
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(config) => ValidationResult::valid(config_path, &config),
        Err(e) => ValidationResult::invalid(config_path, e.to_string()),
    }
}

/// Non-fatal issues worth surfacing before a run
fn collect_warnings(config: &PipelineConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    for output in &config.outputs {
        let name = &output.name;
        let buffer = &output.buffer;

        if !buffer.flush_at_shutdown {
            let hint = if buffer.flush_mode == FlushMode::Lazy {
                "chunks below the size limits are never written"
            } else {
                "staged chunks are dropped on close"
            };
            warnings.push(format!("Output '{name}' has flush_at_shutdown = false: {hint}"));
        }

        if buffer.retry_max_times == 0 {
            warnings.push(format!(
                "Output '{name}' has retry_max_times = 0: failed chunks are discarded immediately"
            ));
        }

        if output.writer.writer_type == WriterType::File
            && !output.writer.params.contains_key("base_path")
        {
            warnings.push(format!(
                "Output '{name}' file writer has no base_path: using ./output"
            ));
        }
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Outputs: {}", summary.output_count);
            println!("  Tags: {}", summary.tag_count);
            println!("  Custom formats: {}", summary.custom_format_count);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
