//! # HMS分诊模块
//!
//! 提供待处理患者的分诊功能，包括：
//! - 分诊分类器：判断患者当天是否待处理，并按停滞天数划分优先级
//! - 时钟：可注入的"今天"
//! - 数据源接口：数据库与快照文件的统一访问方式
//! - 工作列表：组合数据源与分类器，生成排序后的待处理列表
//! - 紧急提醒：汇总紧急备注
//! - 病历视图：历次诊疗记录与紧急备注

pub mod alerts;
pub mod classifier;
pub mod clock;
pub mod history;
pub mod snapshot;
pub mod source;
pub mod worklist;

// 重新导出主要类型
pub use alerts::{EmergencyAlert, EmergencyBoard};
pub use classifier::{
    days_since_last, is_pending, DaysSince, TriageClassifier, TriagePolicy, TriagePriority,
    TriageResult,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use history::PatientHistory;
pub use snapshot::{Snapshot, SnapshotSource};
pub use source::TriageDataSource;
pub use worklist::{
    PendingPatient, PendingView, PendingWorklist, PendingWorklistService, WorklistStats,
    WorklistOrder,
};
