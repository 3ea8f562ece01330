//! 患者病历视图
//!
//! 医生查看患者时显示的历次诊疗记录和紧急备注。

use hms_core::{Patient, PatientNote, TreatmentRecord};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

/// 单个患者的病历
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientHistory {
    pub patient: Patient,
    /// 最近的在前，无法解析时间的排最后
    pub treatments: Vec<TreatmentRecord>,
    /// 仅紧急备注，最新的在前
    pub emergency_notes: Vec<PatientNote>,
}

impl PatientHistory {
    pub fn new(
        patient: Patient,
        mut treatments: Vec<TreatmentRecord>,
        notes: impl IntoIterator<Item = PatientNote>,
    ) -> Self {
        treatments.retain(|record| record.patient_id == patient.id);
        treatments.sort_by_key(|record| Reverse(record.recorded_at.timestamp()));

        let mut emergency_notes: Vec<PatientNote> = notes
            .into_iter()
            .filter(|note| note.emergency && note.patient_id == patient.id)
            .collect();
        emergency_notes.sort_by_key(|note| Reverse(note.created_at));

        Self {
            patient,
            treatments,
            emergency_notes,
        }
    }

    pub fn render(&self) -> Vec<String> {
        let mut lines = vec![format!(
            "Patient History: #{} {}",
            self.patient.id, self.patient.name
        )];

        if self.treatments.is_empty() {
            lines.push("No previous records.".to_string());
        }
        for record in &self.treatments {
            lines.push(format!(
                "Date: {} | BP: {}, Temp: {}, Weight: {} | Symptoms: {} | Treatment: {}",
                record.recorded_at,
                record.vitals.blood_pressure.as_deref().unwrap_or("N/A"),
                record.vitals.temperature.map_or("N/A".to_string(), |t| format!("{:.1}°C", t)),
                record.vitals.weight.map_or("N/A".to_string(), |w| format!("{:.1}kg", w)),
                record.symptoms.as_deref().unwrap_or("N/A"),
                record.treatment.as_deref().unwrap_or("N/A"),
            ));
        }

        if !self.emergency_notes.is_empty() {
            lines.push("Emergency Notes:".to_string());
            for note in &self.emergency_notes {
                lines.push(format!(
                    "  {} by {}: {}",
                    note.created_at.format("%Y-%m-%d %H:%M"),
                    note.author,
                    note.note
                ));
            }
        }

        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use hms_core::{RecordedAt, Vitals};

    fn at(raw: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn patient() -> Patient {
        Patient {
            id: 4,
            name: "Mercy Gondwe".to_string(),
            date_of_birth: None,
            gender: None,
            blood_type: None,
            registered_at: at("2025-05-01 08:00:00"),
        }
    }

    fn note(id: i64, patient_id: i64, emergency: bool, created: &str) -> PatientNote {
        PatientNote {
            id,
            patient_id,
            author: "nurse1".to_string(),
            note: format!("note {}", id),
            emergency,
            created_at: at(created),
        }
    }

    #[test]
    fn test_history_orders_records_and_keeps_emergency_notes() {
        let treatments = vec![
            TreatmentRecord {
                id: 1,
                patient_id: 4,
                doctor_id: None,
                recorded_at: RecordedAt::parse(Some("2025-06-01 09:00:00")),
                vitals: Vitals {
                    blood_pressure: Some("120/80".to_string()),
                    temperature: Some(37.2),
                    weight: None,
                },
                symptoms: None,
                treatment: None,
            },
            TreatmentRecord {
                id: 2,
                patient_id: 4,
                doctor_id: Some(1),
                recorded_at: RecordedAt::parse(Some("2025-06-08 10:00:00")),
                vitals: Vitals::default(),
                symptoms: Some("Cough".to_string()),
                treatment: Some("Rest".to_string()),
            },
        ];
        let notes = vec![
            note(1, 4, true, "2025-06-02 10:00:00"),
            note(2, 4, false, "2025-06-03 10:00:00"),
            note(3, 4, true, "2025-06-05 10:00:00"),
            note(4, 9, true, "2025-06-06 10:00:00"),
        ];

        let history = PatientHistory::new(patient(), treatments, notes);

        assert_eq!(history.treatments[0].id, 2);
        let note_ids: Vec<i64> = history.emergency_notes.iter().map(|n| n.id).collect();
        assert_eq!(note_ids, vec![3, 1]);

        let lines = history.render();
        assert_eq!(lines[0], "Patient History: #4 Mercy Gondwe");
        assert!(lines[1].contains("Symptoms: Cough"));
        assert!(lines[2].contains("BP: 120/80, Temp: 37.2°C, Weight: N/A"));
        assert_eq!(lines[3], "Emergency Notes:");
        assert_eq!(lines.len(), 6);
    }

    #[test]
    fn test_empty_history() {
        let history = PatientHistory::new(patient(), vec![], vec![]);
        assert_eq!(history.render(), vec![
            "Patient History: #4 Mercy Gondwe".to_string(),
            "No previous records.".to_string(),
        ]);
    }
}
