//! 快照数据源
//!
//! 从JSON快照读取患者、诊疗记录和备注，不依赖数据库即可离线查看分诊结果。
//! 时间戳保留原始字符串，无法解析的值在分诊时归为 UNKNOWN。

use crate::source::TriageDataSource;
use async_trait::async_trait;
use hms_core::{HmsError, Patient, PatientNote, Result, TreatmentRecord};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::path::Path;

/// 快照文件内容
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub patients: Vec<Patient>,
    #[serde(default)]
    pub treatments: Vec<TreatmentRecord>,
    #[serde(default)]
    pub notes: Vec<PatientNote>,
}

/// 基于快照的只读数据源
#[derive(Debug, Clone, Default)]
pub struct SnapshotSource {
    snapshot: Snapshot,
}

impl SnapshotSource {
    pub fn new(snapshot: Snapshot) -> Self {
        Self { snapshot }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Snapshot = serde_json::from_str(json)?;
        Ok(Self::new(snapshot))
    }

    /// 从文件加载快照；文件无法读取视为数据源不可用
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path).await.map_err(|e| {
            HmsError::DataUnavailable(format!("cannot read snapshot {}: {}", path.display(), e))
        })?;

        let source = Self::from_json(&json)?;
        tracing::info!(
            "Loaded snapshot {} with {} patients and {} treatment records",
            path.display(),
            source.snapshot.patients.len(),
            source.snapshot.treatments.len()
        );
        Ok(source)
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// 紧急备注
    pub fn emergency_notes(&self) -> Vec<PatientNote> {
        self.snapshot.notes.iter().filter(|n| n.emergency).cloned().collect()
    }
}

#[async_trait]
impl TriageDataSource for SnapshotSource {
    async fn list_patients(&self) -> Result<Vec<Patient>> {
        Ok(self.snapshot.patients.clone())
    }

    async fn list_treatments_for(&self, patient_id: i64) -> Result<Vec<TreatmentRecord>> {
        let mut records: Vec<TreatmentRecord> = self
            .snapshot
            .treatments
            .iter()
            .filter(|record| record.patient_id == patient_id)
            .cloned()
            .collect();

        // 无法解析时间戳的记录排在最后
        records.sort_by_key(|record| Reverse(record.recorded_at.timestamp()));
        Ok(records)
    }
}
