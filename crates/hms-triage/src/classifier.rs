//! 分诊分类器
//!
//! 根据患者的诊疗记录判断当天是否待处理，并按距上次诊疗的天数划分优先级。
//! 分类是纯函数：相同的记录和日期总是得到相同的结果。

use chrono::{NaiveDate, NaiveDateTime};
use hms_core::{HmsError, Result, TreatmentRecord};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 分诊优先级
///
/// 声明顺序即严重程度顺序，`Unknown` 排在最低，仅表示无法判断。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TriagePriority {
    Unknown, // 时间戳无法解析
    Normal,  // 3天以内
    Medium,  // 3-7天
    High,    // 超过7天
    Urgent,  // 从未诊疗
}

impl TriagePriority {
    pub fn label(&self) -> &'static str {
        match self {
            TriagePriority::Unknown => "UNKNOWN",
            TriagePriority::Normal => "NORMAL",
            TriagePriority::Medium => "MEDIUM",
            TriagePriority::High => "HIGH",
            TriagePriority::Urgent => "URGENT",
        }
    }

    /// 所有优先级，按严重程度从高到低
    pub fn all() -> [TriagePriority; 5] {
        [
            TriagePriority::Urgent,
            TriagePriority::High,
            TriagePriority::Medium,
            TriagePriority::Normal,
            TriagePriority::Unknown,
        ]
    }
}

impl fmt::Display for TriagePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// 距上次诊疗的天数
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DaysSince {
    Never,
    Days(i64),
    Unknown,
}

impl fmt::Display for DaysSince {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaysSince::Never => f.write_str("never"),
            DaysSince::Days(days) => write!(f, "{}", days),
            DaysSince::Unknown => f.write_str("unknown"),
        }
    }
}

/// 单个患者的分诊结果，每次查看时重新计算，不做持久化
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TriageResult {
    pub patient_id: i64,
    pub is_pending: bool,
    pub days_since_last: DaysSince,
    pub last_treatment: Option<NaiveDateTime>,
    /// 仅待处理患者有优先级
    pub priority: Option<TriagePriority>,
}

impl TriageResult {
    /// 数据查询失败时的占位结果：无法确认当天体征，按待处理、优先级未知处理
    pub fn unresolved(patient_id: i64) -> Self {
        Self {
            patient_id,
            is_pending: true,
            days_since_last: DaysSince::Unknown,
            last_treatment: None,
            priority: Some(TriagePriority::Unknown),
        }
    }
}

/// 分诊阈值策略，所有角色的视图统一使用同一策略
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TriagePolicy {
    /// 不超过该天数为 NORMAL
    pub normal_max_days: i64,
    /// 不超过该天数为 MEDIUM，超过为 HIGH
    pub medium_max_days: i64,
}

impl Default for TriagePolicy {
    fn default() -> Self {
        Self {
            normal_max_days: 3,
            medium_max_days: 7,
        }
    }
}

impl TriagePolicy {
    pub fn validate(&self) -> Result<()> {
        if self.normal_max_days < 0 {
            return Err(HmsError::Config(format!(
                "normal_max_days must not be negative, got {}",
                self.normal_max_days
            )));
        }
        if self.normal_max_days >= self.medium_max_days {
            return Err(HmsError::Config(format!(
                "normal_max_days ({}) must be less than medium_max_days ({})",
                self.normal_max_days, self.medium_max_days
            )));
        }
        Ok(())
    }

    /// 天数到优先级的映射
    pub fn bucket(&self, days_ago: i64) -> TriagePriority {
        if days_ago > self.medium_max_days {
            TriagePriority::High
        } else if days_ago > self.normal_max_days {
            TriagePriority::Medium
        } else {
            TriagePriority::Normal
        }
    }
}

/// 当天是否待处理：当天没有任何带生命体征的诊疗记录
pub fn is_pending(history: &[TreatmentRecord], today: NaiveDate) -> bool {
    !history.iter().any(|record| record.is_vitals_on(today))
}

/// 最近一次诊疗时间（不论是否有生命体征）
///
/// 无法解析的时间戳被跳过；只有当所有记录都无法解析时才返回 `Unknown`。
pub fn days_since_last(
    history: &[TreatmentRecord],
    today: NaiveDate,
) -> (DaysSince, Option<NaiveDateTime>) {
    if history.is_empty() {
        return (DaysSince::Never, None);
    }

    match history.iter().filter_map(|record| record.recorded_at.timestamp()).max() {
        Some(last) => {
            let days = today.signed_duration_since(last.date()).num_days();
            (DaysSince::Days(days), Some(last))
        }
        None => (DaysSince::Unknown, None),
    }
}

/// 分诊分类器
#[derive(Debug, Clone, Default)]
pub struct TriageClassifier {
    policy: TriagePolicy,
}

impl TriageClassifier {
    pub fn new(policy: TriagePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &TriagePolicy {
        &self.policy
    }

    /// 计算待处理患者的优先级
    pub fn classify_priority(&self, history: &[TreatmentRecord], today: NaiveDate) -> TriagePriority {
        self.priority_for(days_since_last(history, today).0)
    }

    fn priority_for(&self, days_since_last: DaysSince) -> TriagePriority {
        match days_since_last {
            DaysSince::Never => TriagePriority::Urgent,
            DaysSince::Days(days) => self.policy.bucket(days),
            DaysSince::Unknown => TriagePriority::Unknown,
        }
    }

    /// 对单个患者完成分诊
    pub fn classify(&self, patient_id: i64, history: &[TreatmentRecord], today: NaiveDate) -> TriageResult {
        let pending = is_pending(history, today);
        let (days_since_last, last_treatment) = days_since_last(history, today);

        let priority = pending.then(|| self.priority_for(days_since_last));

        if pending && days_since_last == DaysSince::Unknown {
            tracing::warn!(
                "Patient {} has {} treatment records but no readable timestamp",
                patient_id,
                history.len()
            );
        }

        if let DaysSince::Days(days) = days_since_last {
            if days < 0 {
                tracing::warn!("Patient {} has a treatment dated {} days in the future", patient_id, -days);
            }
        }

        let skipped = history.iter().filter(|r| r.recorded_at.timestamp().is_none()).count();
        if skipped > 0 && last_treatment.is_some() {
            tracing::debug!(
                "Ignored {} unreadable treatment timestamps for patient {}",
                skipped,
                patient_id
            );
        }

        TriageResult {
            patient_id,
            is_pending: pending,
            days_since_last,
            last_treatment,
            priority,
        }
    }

    /// 批量分诊，每个患者独立计算，单条坏数据不影响其他患者
    pub fn classify_batch<'a, I>(&self, inputs: I, today: NaiveDate) -> Vec<TriageResult>
    where
        I: IntoIterator<Item = (i64, &'a [TreatmentRecord])>,
    {
        inputs
            .into_iter()
            .map(|(patient_id, history)| self.classify(patient_id, history, today))
            .collect()
    }
}
