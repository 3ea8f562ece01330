//! 待处理患者工作列表
//!
//! 把数据源、时钟和分类器组合起来，生成当天待处理患者列表及统计信息。

use crate::classifier::{DaysSince, TriageClassifier, TriagePriority, TriageResult};
use crate::clock::Clock;
use crate::source::TriageDataSource;
use chrono::NaiveDate;
use hms_core::{Patient, Result};
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::HashMap;

/// 待处理患者
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingPatient {
    pub patient: Patient,
    pub triage: TriageResult,
}

impl PendingPatient {
    pub fn priority(&self) -> TriagePriority {
        self.triage.priority.unwrap_or(TriagePriority::Unknown)
    }
}

/// 列表排序方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorklistOrder {
    /// 从未诊疗在前，其余按最近诊疗时间倒序，无法解析的排最后
    #[default]
    LastTreatment,
    /// 按优先级从高到低，同级按停滞天数从多到少
    Priority,
}

/// 工作列表统计
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorklistStats {
    pub total_patients: usize,
    pub pending_patients: usize,
    pub attended_patients: usize,
    pub never_treated: usize,
    /// 诊疗记录查询失败的患者数
    pub lookup_failures: usize,
    pub by_priority: HashMap<TriagePriority, usize>,
}

/// 当天待处理工作列表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingWorklist {
    pub day: NaiveDate,
    pub items: Vec<PendingPatient>,
    pub stats: WorklistStats,
}

impl PendingWorklist {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// 排序，最后以登记时间升序、患者ID升序打破平局
    pub fn sort(&mut self, order: WorklistOrder) {
        match order {
            WorklistOrder::LastTreatment => self.items.sort_by(|a, b| {
                last_treatment_key(a)
                    .cmp(&last_treatment_key(b))
                    .then_with(|| registration_order(a, b))
            }),
            WorklistOrder::Priority => self.items.sort_by(|a, b| {
                b.priority()
                    .cmp(&a.priority())
                    .then_with(|| staleness(b).cmp(&staleness(a)))
                    .then_with(|| registration_order(a, b))
            }),
        }
    }

    /// 过滤出指定优先级
    pub fn with_priority(&self, priority: TriagePriority) -> Vec<&PendingPatient> {
        self.items.iter().filter(|item| item.priority() == priority).collect()
    }
}

fn last_treatment_key(item: &PendingPatient) -> (u8, Reverse<Option<chrono::NaiveDateTime>>) {
    let group = match item.triage.days_since_last {
        DaysSince::Never => 0,
        DaysSince::Days(_) => 1,
        DaysSince::Unknown => 2,
    };
    (group, Reverse(item.triage.last_treatment))
}

fn staleness(item: &PendingPatient) -> i64 {
    match item.triage.days_since_last {
        DaysSince::Never => i64::MAX,
        DaysSince::Days(days) => days,
        DaysSince::Unknown => i64::MIN,
    }
}

fn registration_order(a: &PendingPatient, b: &PendingPatient) -> Ordering {
    a.patient
        .registered_at
        .cmp(&b.patient.registered_at)
        .then_with(|| a.patient.id.cmp(&b.patient.id))
}

/// 工作列表服务
///
/// 每次调用都重新查询并分类，不缓存结果。
pub struct PendingWorklistService<'a> {
    source: &'a dyn TriageDataSource,
    clock: &'a dyn Clock,
    classifier: TriageClassifier,
}

impl<'a> PendingWorklistService<'a> {
    pub fn new(
        source: &'a dyn TriageDataSource,
        clock: &'a dyn Clock,
        classifier: TriageClassifier,
    ) -> Self {
        Self {
            source,
            clock,
            classifier,
        }
    }

    /// 生成当天待处理列表
    ///
    /// 待处理集合由数据源计算（数据库为服务端查询），只为这些患者查询诊疗记录。
    /// 患者列表无法获取时返回错误；单个患者的诊疗记录查询失败只影响该患者，
    /// 该患者以 UNKNOWN 优先级保留在列表中。
    pub async fn build(&self, order: WorklistOrder) -> Result<PendingWorklist> {
        let day = self.clock.today();

        let patients = self.source.list_patients().await.map_err(|e| {
            tracing::error!("Failed to list patients for triage: {}", e);
            e
        })?;
        let total_patients = patients.len();

        let pending = self.source.list_patients_without_vitals_on(day).await.map_err(|e| {
            tracing::error!("Failed to list pending patients for {}: {}", day, e);
            e
        })?;

        let mut stats = WorklistStats {
            total_patients,
            ..Default::default()
        };
        let mut items = Vec::with_capacity(pending.len());

        for patient in pending {
            let triage = match self.source.list_treatments_for(patient.id).await {
                Ok(history) => self.classifier.classify(patient.id, &history, day),
                Err(e) => {
                    tracing::warn!("Failed to load treatments for patient {}: {}", patient.id, e);
                    stats.lookup_failures += 1;
                    TriageResult::unresolved(patient.id)
                }
            };

            // 两次查询之间可能刚录入了体征
            if !triage.is_pending {
                tracing::debug!("Patient {} received vitals while building the worklist", patient.id);
                continue;
            }

            if triage.days_since_last == DaysSince::Never {
                stats.never_treated += 1;
            }
            items.push(PendingPatient { patient, triage });
        }

        stats.pending_patients = items.len();
        stats.attended_patients = total_patients.saturating_sub(items.len());
        for item in &items {
            *stats.by_priority.entry(item.priority()).or_insert(0) += 1;
        }

        let mut worklist = PendingWorklist { day, items, stats };
        worklist.sort(order);

        tracing::info!(
            "Triage for {}: {} pending of {} patients",
            day,
            worklist.stats.pending_patients,
            worklist.stats.total_patients
        );
        Ok(worklist)
    }
}

/// 呈现层视图模型
///
/// "没有待处理患者"和"数据源不可用"是两种不同的状态，必须区分显示。
#[derive(Debug, Clone)]
pub enum PendingView {
    Patients(PendingWorklist),
    NoPendingPatients { day: NaiveDate },
    Unavailable { reason: String },
}

impl PendingView {
    pub fn from_result(result: Result<PendingWorklist>) -> Self {
        match result {
            Ok(worklist) if worklist.is_empty() => PendingView::NoPendingPatients { day: worklist.day },
            Ok(worklist) => PendingView::Patients(worklist),
            Err(e) => PendingView::Unavailable {
                reason: e.to_string(),
            },
        }
    }

    /// 渲染为文本行
    pub fn render(&self) -> Vec<String> {
        match self {
            PendingView::Patients(worklist) => {
                let mut lines = vec![format!(
                    "Pending patients for {}: {}",
                    worklist.day,
                    worklist.len()
                )];
                for item in &worklist.items {
                    let last = match item.triage.days_since_last {
                        DaysSince::Never => "never treated".to_string(),
                        DaysSince::Days(days) => format!("{} days ago", days),
                        DaysSince::Unknown => "last visit unreadable".to_string(),
                    };
                    lines.push(format!(
                        "[{:<7}] #{} {} ({})",
                        item.priority().label(),
                        item.patient.id,
                        item.patient.name,
                        last
                    ));
                }
                lines
            }
            PendingView::NoPendingPatients { day } => {
                vec![format!("All patients have vitals recorded for {}", day)]
            }
            PendingView::Unavailable { reason } => {
                vec![format!("ERROR: patient data unavailable ({})", reason)]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::snapshot::{Snapshot, SnapshotSource};
    use async_trait::async_trait;
    use chrono::NaiveDateTime;
    use hms_core::{HmsError, RecordedAt, TreatmentRecord, Vitals};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 10).unwrap()
    }

    fn at(raw: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn patient(id: i64, registered: &str) -> Patient {
        Patient {
            id,
            name: format!("Patient {}", id),
            date_of_birth: None,
            gender: None,
            blood_type: None,
            registered_at: at(registered),
        }
    }

    fn treatment(id: i64, patient_id: i64, raw: &str, with_vitals: bool) -> TreatmentRecord {
        TreatmentRecord {
            id,
            patient_id,
            doctor_id: None,
            recorded_at: RecordedAt::parse(Some(raw)),
            vitals: Vitals {
                temperature: with_vitals.then_some(37.0),
                ..Default::default()
            },
            symptoms: None,
            treatment: None,
        }
    }

    /// A: 从未诊疗  B: 9天前  C: 今天有体征  D: 2天前  E: 时间戳损坏
    fn ward() -> SnapshotSource {
        SnapshotSource::new(Snapshot {
            patients: vec![
                patient(1, "2025-05-01 08:00:00"),
                patient(2, "2025-05-02 08:00:00"),
                patient(3, "2025-05-03 08:00:00"),
                patient(4, "2025-05-04 08:00:00"),
                patient(5, "2025-05-05 08:00:00"),
            ],
            treatments: vec![
                treatment(10, 2, "2025-06-01 09:00:00", true),
                treatment(11, 3, "2025-06-10 08:30:00", true),
                treatment(12, 4, "2025-06-08 14:00:00", true),
                treatment(13, 5, "0000-00-00 00:00:00", true),
            ],
            notes: vec![],
        })
    }

    /// 包装快照数据源，模拟连接失败
    struct FlakySource {
        inner: SnapshotSource,
        down: bool,
        failing_patients: HashSet<i64>,
    }

    #[async_trait]
    impl TriageDataSource for FlakySource {
        async fn list_patients(&self) -> Result<Vec<Patient>> {
            if self.down {
                return Err(HmsError::DataUnavailable("connection refused".to_string()));
            }
            self.inner.list_patients().await
        }

        async fn list_treatments_for(&self, patient_id: i64) -> Result<Vec<TreatmentRecord>> {
            if self.failing_patients.contains(&patient_id) {
                return Err(HmsError::DataUnavailable("connection reset".to_string()));
            }
            self.inner.list_treatments_for(patient_id).await
        }
    }

    /// 统计查询次数，待处理集合走单独的过滤查询
    struct CountingSource {
        inner: SnapshotSource,
        pending_queries: AtomicUsize,
        history_queries: AtomicUsize,
    }

    impl CountingSource {
        fn new(inner: SnapshotSource) -> Self {
            Self {
                inner,
                pending_queries: AtomicUsize::new(0),
                history_queries: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TriageDataSource for CountingSource {
        async fn list_patients(&self) -> Result<Vec<Patient>> {
            self.inner.list_patients().await
        }

        async fn list_treatments_for(&self, patient_id: i64) -> Result<Vec<TreatmentRecord>> {
            self.history_queries.fetch_add(1, AtomicOrdering::SeqCst);
            self.inner.list_treatments_for(patient_id).await
        }

        async fn list_patients_without_vitals_on(&self, day: NaiveDate) -> Result<Vec<Patient>> {
            self.pending_queries.fetch_add(1, AtomicOrdering::SeqCst);
            self.inner.list_patients_without_vitals_on(day).await
        }
    }

    fn ids(worklist: &PendingWorklist) -> Vec<i64> {
        worklist.items.iter().map(|item| item.patient.id).collect()
    }

    #[tokio::test]
    async fn test_build_pending_worklist() {
        let source = ward();
        let clock = FixedClock(day());
        let service = PendingWorklistService::new(&source, &clock, TriageClassifier::default());

        let worklist = service.build(WorklistOrder::LastTreatment).await.unwrap();

        assert_eq!(worklist.day, day());
        assert_eq!(ids(&worklist), vec![1, 4, 2, 5]);
        assert_eq!(worklist.stats.total_patients, 5);
        assert_eq!(worklist.stats.pending_patients, 4);
        assert_eq!(worklist.stats.attended_patients, 1);
        assert_eq!(worklist.stats.never_treated, 1);
        assert_eq!(worklist.stats.by_priority.get(&TriagePriority::Unknown), Some(&1));
        assert_eq!(worklist.stats.by_priority.get(&TriagePriority::Medium), None);
    }

    #[tokio::test]
    async fn test_history_fetched_only_for_pending_patients() {
        let source = CountingSource::new(ward());
        let clock = FixedClock(day());
        let service = PendingWorklistService::new(&source, &clock, TriageClassifier::default());

        let worklist = service.build(WorklistOrder::LastTreatment).await.unwrap();

        assert_eq!(source.pending_queries.load(AtomicOrdering::SeqCst), 1);
        // 患者3当天已有体征，不再查询其诊疗记录
        assert_eq!(source.history_queries.load(AtomicOrdering::SeqCst), 4);
        assert_eq!(worklist.stats.pending_patients, 4);
        assert_eq!(worklist.stats.attended_patients, 1);
    }

    #[tokio::test]
    async fn test_priority_order() {
        let source = ward();
        let clock = FixedClock(day());
        let service = PendingWorklistService::new(&source, &clock, TriageClassifier::default());

        let worklist = service.build(WorklistOrder::Priority).await.unwrap();
        let priorities: Vec<_> = worklist.items.iter().map(|i| i.priority()).collect();

        assert_eq!(ids(&worklist), vec![1, 2, 4, 5]);
        assert_eq!(
            priorities,
            vec![
                TriagePriority::Urgent,
                TriagePriority::High,
                TriagePriority::Normal,
                TriagePriority::Unknown
            ]
        );
    }

    #[tokio::test]
    async fn test_registration_breaks_ties() {
        let source = SnapshotSource::new(Snapshot {
            patients: vec![
                patient(7, "2025-05-09 08:00:00"),
                patient(8, "2025-05-01 08:00:00"),
                patient(9, "2025-05-05 08:00:00"),
            ],
            treatments: vec![],
            notes: vec![],
        });
        let clock = FixedClock(day());
        let service = PendingWorklistService::new(&source, &clock, TriageClassifier::default());

        let worklist = service.build(WorklistOrder::LastTreatment).await.unwrap();
        assert_eq!(ids(&worklist), vec![8, 9, 7]);
    }

    #[tokio::test]
    async fn test_lookup_failure_is_isolated() {
        let source = FlakySource {
            inner: ward(),
            down: false,
            failing_patients: HashSet::from([2]),
        };
        let clock = FixedClock(day());
        let service = PendingWorklistService::new(&source, &clock, TriageClassifier::default());

        let worklist = service.build(WorklistOrder::LastTreatment).await.unwrap();

        assert_eq!(worklist.stats.lookup_failures, 1);
        assert_eq!(worklist.len(), 4);
        let failed = worklist.items.iter().find(|i| i.patient.id == 2).unwrap();
        assert_eq!(failed.priority(), TriagePriority::Unknown);
        let never = worklist.items.iter().find(|i| i.patient.id == 1).unwrap();
        assert_eq!(never.priority(), TriagePriority::Urgent);
    }

    #[tokio::test]
    async fn test_unavailable_differs_from_empty() {
        let clock = FixedClock(day());

        let down = FlakySource {
            inner: ward(),
            down: true,
            failing_patients: HashSet::new(),
        };
        let service = PendingWorklistService::new(&down, &clock, TriageClassifier::default());
        let view = PendingView::from_result(service.build(WorklistOrder::default()).await);
        assert!(matches!(view, PendingView::Unavailable { .. }));
        assert!(view.render()[0].starts_with("ERROR"));

        let all_seen = SnapshotSource::new(Snapshot {
            patients: vec![patient(3, "2025-05-03 08:00:00")],
            treatments: vec![treatment(11, 3, "2025-06-10 08:30:00", true)],
            notes: vec![],
        });
        let service = PendingWorklistService::new(&all_seen, &clock, TriageClassifier::default());
        let view = PendingView::from_result(service.build(WorklistOrder::default()).await);
        assert!(matches!(view, PendingView::NoPendingPatients { .. }));
    }

    #[tokio::test]
    async fn test_render_patients() {
        let source = ward();
        let clock = FixedClock(day());
        let service = PendingWorklistService::new(&source, &clock, TriageClassifier::default());

        let view = PendingView::from_result(service.build(WorklistOrder::LastTreatment).await);
        let lines = view.render();

        assert_eq!(lines.len(), 5);
        assert!(lines[1].contains("URGENT"));
        assert!(lines[1].contains("never treated"));
        assert!(lines[2].contains("2 days ago"));
    }
}
