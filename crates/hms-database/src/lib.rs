//! # HMS数据库模块
//!
//! 负责患者、医生、诊疗记录、备注、审计日志和用户的存储，提供PostgreSQL连接池和完整的CRUD操作。

pub mod connection;
pub mod models;
pub mod queries;

// 重新导出主要类型
pub use connection::{DatabaseConfig, DatabasePool};
pub use models::*;
pub use queries::DatabaseQueries;
