//! 日志初始化
//!
//! 基于 tracing-subscriber 的结构化日志，支持文本与JSON两种格式。

use crate::config::LoggingConfig;
use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// 构造日志过滤器：命令行参数优先，其次 `RUST_LOG`，最后是配置文件
pub fn build_filter(config: &LoggingConfig, level_override: Option<&str>) -> Result<EnvFilter> {
    let filter = match level_override {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?,
    };
    Ok(filter)
}

/// 安装全局日志订阅者，重复调用返回错误
pub fn init_logging(config: &LoggingConfig, level_override: Option<&str>) -> Result<()> {
    let filter = build_filter(config, level_override)?;

    let result = match config.format.as_str() {
        "json" => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .try_init(),
        _ => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init(),
    };

    result.map_err(|e| anyhow::anyhow!("Failed to initialise logging: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_wins() {
        let config = LoggingConfig::default();
        let filter = build_filter(&config, Some("hms_triage=debug")).unwrap();
        assert!(filter.to_string().contains("hms_triage=debug"));
    }

    #[test]
    fn test_invalid_filter_is_rejected() {
        let config = LoggingConfig::default();
        assert!(build_filter(&config, Some("hms_triage=loud")).is_err());
    }
}
