//! # HMS
//!
//! 医院管理系统的顶层入口，重新导出核心模型与分诊模块，供演示程序使用。

pub use hms_core as core;
pub use hms_triage as triage;
