//! 错误定义模块

use thiserror::Error;

/// HMS系统统一错误类型
#[derive(Error, Debug)]
pub enum HmsError {
    /// 数据源无法访问（连接失败、连接池耗尽等）
    #[error("数据源不可用: {0}")]
    DataUnavailable(String),

    #[error("数据库错误: {0}")]
    Database(String),

    #[error("时间戳格式错误: {0}")]
    MalformedTimestamp(String),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("验证错误: {0}")]
    Validation(String),

    #[error("权限错误: {0}")]
    Permission(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl HmsError {
    /// 是否为数据源不可用
    pub fn is_unavailable(&self) -> bool {
        matches!(self, HmsError::DataUnavailable(_))
    }
}

#[cfg(feature = "database")]
impl From<sqlx::Error> for HmsError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => HmsError::NotFound(err.to_string()),
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => HmsError::DataUnavailable(err.to_string()),
            other => HmsError::Database(other.to_string()),
        }
    }
}

/// HMS系统统一结果类型
pub type Result<T> = std::result::Result<T, HmsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_is_distinguished() {
        assert!(HmsError::DataUnavailable("refused".into()).is_unavailable());
        assert!(!HmsError::NotFound("patient 7".into()).is_unavailable());
    }

    #[test]
    fn test_io_error_converts() {
        let err: HmsError = std::io::Error::new(std::io::ErrorKind::Other, "disk").into();
        assert!(matches!(err, HmsError::Io(_)));
    }
}
