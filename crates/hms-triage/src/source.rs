//! 分诊数据源
//!
//! 分诊只需要患者列表和每个患者的诊疗记录，数据库和快照文件都实现此接口。

use crate::classifier::is_pending;
use async_trait::async_trait;
use chrono::NaiveDate;
use hms_core::{Patient, Result, TreatmentRecord};

#[async_trait]
pub trait TriageDataSource: Send + Sync {
    /// 所有已登记患者
    async fn list_patients(&self) -> Result<Vec<Patient>>;

    /// 指定患者的全部诊疗记录，按时间倒序
    async fn list_treatments_for(&self, patient_id: i64) -> Result<Vec<TreatmentRecord>>;

    /// 指定日期没有生命体征记录的患者
    ///
    /// 默认在进程内做差集；数据库实现会改写为服务端查询。
    /// 单个患者的诊疗记录查询失败时，该患者仍视为待处理。
    async fn list_patients_without_vitals_on(&self, day: NaiveDate) -> Result<Vec<Patient>> {
        let patients = self.list_patients().await?;
        let mut pending = Vec::with_capacity(patients.len());

        for patient in patients {
            match self.list_treatments_for(patient.id).await {
                Ok(history) if !is_pending(&history, day) => {}
                Ok(_) => pending.push(patient),
                Err(e) => {
                    tracing::warn!(
                        "Failed to load treatments for patient {}, keeping as pending: {}",
                        patient.id,
                        e
                    );
                    pending.push(patient);
                }
            }
        }

        Ok(pending)
    }
}
