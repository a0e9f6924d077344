//! 配置解析模块
//!
//! 支持 TOML (主要) 和 JSON (可选) 格式。

use contracts::{OutputError, PipelineConfig};

/// 配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML 格式 (推荐)
    Toml,
    /// JSON 格式
    Json,
}

impl ConfigFormat {
    /// 从文件扩展名推断格式
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Toml => "TOML",
            Self::Json => "JSON",
        }
    }
}

/// 根据格式解析配置 (不做校验)
pub fn parse(content: &str, format: ConfigFormat) -> Result<PipelineConfig, OutputError> {
    match format {
        ConfigFormat::Toml => toml::from_str(content).map_err(|e| parse_error(format, e)),
        ConfigFormat::Json => serde_json::from_str(content).map_err(|e| parse_error(format, e)),
    }
}

fn parse_error<E>(format: ConfigFormat, err: E) -> OutputError
where
    E: std::error::Error + Send + Sync + 'static,
{
    OutputError::ConfigParse {
        message: format!("{} parse error: {err}", format.label()),
        source: Some(Box::new(err)),
    }
}
