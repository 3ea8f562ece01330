//! # HMS管理模块
//!
//! 提供配置加载与验证、日志初始化等运维功能

pub mod config;
pub mod logging;

pub use config::{ConfigManager, ConfigValidator, HmsConfig, LoggingConfig};
pub use logging::init_logging;
