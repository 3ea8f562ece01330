//! 分诊演示：从内存快照生成当天待处理列表和紧急提醒

use anyhow::Result;
use chrono::NaiveDate;
use hms::triage::{
    EmergencyBoard, FixedClock, PendingView, PendingWorklistService, SnapshotSource,
    TriageClassifier, TriageDataSource, WorklistOrder,
};
use tracing::info;

const SNAPSHOT: &str = r#"{
  "patients": [
    {"id": 1, "name": "Chikondi Banda", "gender": "Female", "blood_type": "O+", "registered_at": "2025-05-01T08:00:00"},
    {"id": 2, "name": "Mphatso Phiri", "gender": "Male", "registered_at": "2025-05-02T09:30:00"},
    {"id": 3, "name": "Tiwonge Mwale", "registered_at": "2025-05-03T10:00:00"},
    {"id": 4, "name": "Kondwani Zulu", "registered_at": "2025-05-04T11:15:00"},
    {"id": 5, "name": "Alinafe Chirwa", "registered_at": "2025-05-05T12:00:00"}
  ],
  "treatments": [
    {"id": 10, "patient_id": 1, "recorded_at": "2025-06-10 09:00:00", "blood_pressure": "120/80"},
    {"id": 11, "patient_id": 2, "recorded_at": "2025-06-05 14:00:00", "temperature": 38.2},
    {"id": 12, "patient_id": 3, "recorded_at": "2025-06-15 08:45:00", "weight": 71.5},
    {"id": 13, "patient_id": 4, "recorded_at": "yesterday", "blood_pressure": "130/85"}
  ],
  "notes": [
    {"id": 1, "patient_id": 2, "author": "nurse1", "note": "Fever not responding to paracetamol", "emergency": true, "created_at": "2025-06-14T16:00:00"},
    {"id": 2, "patient_id": 1, "author": "nurse1", "note": "Prefers morning visits", "emergency": false, "created_at": "2025-06-14T16:05:00"}
  ]
}"#;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let source = SnapshotSource::from_json(SNAPSHOT)?;
    let clock = FixedClock(NaiveDate::from_ymd_opt(2025, 6, 15).unwrap());
    let service = PendingWorklistService::new(&source, &clock, TriageClassifier::default());

    for order in [WorklistOrder::LastTreatment, WorklistOrder::Priority] {
        info!("Building worklist ordered by {:?}", order);
        let view = PendingView::from_result(service.build(order).await);
        for line in view.render() {
            println!("{}", line);
        }
        println!();
    }

    let patients = source.list_patients().await?;
    let board = EmergencyBoard::from_notes(source.emergency_notes()).with_patient_names(&patients);
    println!("{}", board.summary());

    Ok(())
}
