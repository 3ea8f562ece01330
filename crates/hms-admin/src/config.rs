//! 配置管理
//!
//! 默认值 < 配置文件 < `HMS_` 前缀环境变量，加载后统一验证。

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use hms_database::DatabaseConfig;
use hms_triage::TriagePolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// HMS系统完整配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HmsConfig {
    /// 数据库配置
    #[serde(default)]
    pub database: DatabaseConfig,
    /// 分诊阈值
    #[serde(default)]
    pub triage: TriagePolicy,
    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别或过滤表达式
    pub level: String,
    /// 输出格式：text 或 json
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

/// 验证规则
struct ValidationRule {
    field_path: &'static str,
    validator: fn(&HmsConfig) -> Result<()>,
}

/// 配置验证器
pub struct ConfigValidator {
    validation_rules: Vec<ValidationRule>,
}

impl std::fmt::Debug for ConfigValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigValidator")
            .field("rules", &self.validation_rules.len())
            .finish()
    }
}

impl ConfigValidator {
    /// 创建新的配置验证器
    pub fn new() -> Self {
        let validation_rules = vec![
            ValidationRule {
                field_path: "database.url",
                validator: |config| {
                    if config.database.url.trim().is_empty() {
                        Err(anyhow::anyhow!("Database URL cannot be empty"))
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "database.max_connections",
                validator: |config| {
                    if config.database.max_connections == 0 {
                        Err(anyhow::anyhow!("Database max connections cannot be 0"))
                    } else if config.database.min_connections > config.database.max_connections {
                        Err(anyhow::anyhow!(
                            "Database min connections ({}) exceed max connections ({})",
                            config.database.min_connections,
                            config.database.max_connections
                        ))
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "triage",
                validator: |config| config.triage.validate().map_err(anyhow::Error::from),
            },
            ValidationRule {
                field_path: "logging.format",
                validator: |config| match config.logging.format.as_str() {
                    "text" | "json" => Ok(()),
                    other => Err(anyhow::anyhow!("Unsupported log format: {}", other)),
                },
            },
        ];

        Self { validation_rules }
    }

    /// 验证配置
    pub fn validate(&self, config: &HmsConfig) -> Result<()> {
        for rule in &self.validation_rules {
            if let Err(e) = (rule.validator)(config) {
                error!("Configuration validation failed for {}: {}", rule.field_path, e);
                return Err(e.context(format!("Invalid configuration at {}", rule.field_path)));
            }
        }
        Ok(())
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// 配置管理器
#[derive(Debug)]
pub struct ConfigManager {
    /// 配置数据
    config: HmsConfig,
    /// 配置文件路径
    config_path: Option<PathBuf>,
    /// 配置验证器
    validator: ConfigValidator,
}

impl ConfigManager {
    /// 加载并验证配置；未指定文件时只使用默认值和环境变量
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let validator = ConfigValidator::new();
        let config = Self::load_config(config_path)?;
        validator.validate(&config)?;

        Ok(Self {
            config,
            config_path: config_path.map(Path::to_path_buf),
            validator,
        })
    }

    fn load_config(config_path: Option<&Path>) -> Result<HmsConfig> {
        let mut builder = Config::builder()
            .add_source(Config::try_from(&HmsConfig::default()).context("Failed to build default configuration")?);

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                Environment::with_prefix("HMS")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration sources")?;

        let config: HmsConfig = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        match config_path {
            Some(path) => info!("Configuration loaded from: {}", path.display()),
            None => info!("Configuration loaded from defaults and environment"),
        }
        Ok(config)
    }

    /// 获取配置
    pub fn config(&self) -> &HmsConfig {
        &self.config
    }

    /// 更新配置，验证失败时保持原配置
    pub fn update_config(&mut self, new_config: HmsConfig) -> Result<()> {
        self.validator.validate(&new_config)?;
        self.config = new_config;
        info!("Configuration updated successfully");
        Ok(())
    }

    /// 保存配置到文件
    pub async fn save_config(&self, path: Option<&Path>) -> Result<()> {
        let path = path
            .or(self.config_path.as_deref())
            .ok_or_else(|| anyhow::anyhow!("No configuration file path to save to"))?;

        let config_str = toml::to_string_pretty(&self.config)
            .context("Failed to serialize configuration")?;

        tokio::fs::write(path, config_str)
            .await
            .context("Failed to write configuration file")?;

        info!("Configuration saved to: {}", path.display());
        Ok(())
    }
}
