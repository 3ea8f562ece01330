//! 紧急备注提醒
//!
//! 医生登录时汇总所有标记为紧急的患者备注

use chrono::NaiveDateTime;
use hms_core::{Patient, PatientNote};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 单个患者的紧急提醒
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyAlert {
    pub patient_id: i64,
    pub patient_name: Option<String>,
    /// 按时间倒序
    pub notes: Vec<PatientNote>,
}

impl EmergencyAlert {
    pub fn latest_at(&self) -> Option<NaiveDateTime> {
        self.notes.first().map(|note| note.created_at)
    }
}

/// 紧急提醒面板
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmergencyBoard {
    alerts: Vec<EmergencyAlert>,
}

impl EmergencyBoard {
    /// 从备注构建，非紧急备注被忽略；最近有紧急备注的患者排在前面
    pub fn from_notes(notes: impl IntoIterator<Item = PatientNote>) -> Self {
        let mut by_patient: HashMap<i64, Vec<PatientNote>> = HashMap::new();
        for note in notes.into_iter().filter(|note| note.emergency) {
            by_patient.entry(note.patient_id).or_default().push(note);
        }

        let mut alerts: Vec<EmergencyAlert> = by_patient
            .into_iter()
            .map(|(patient_id, mut notes)| {
                notes.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
                EmergencyAlert {
                    patient_id,
                    patient_name: None,
                    notes,
                }
            })
            .collect();

        alerts.sort_by(|a, b| {
            b.latest_at()
                .cmp(&a.latest_at())
                .then_with(|| a.patient_id.cmp(&b.patient_id))
        });

        if !alerts.is_empty() {
            tracing::warn!("{} patients have emergency notes", alerts.len());
        }

        Self { alerts }
    }

    /// 补充患者姓名
    pub fn with_patient_names(mut self, patients: &[Patient]) -> Self {
        let names: HashMap<i64, &str> = patients.iter().map(|p| (p.id, p.name.as_str())).collect();
        for alert in &mut self.alerts {
            alert.patient_name = names.get(&alert.patient_id).map(|name| name.to_string());
        }
        self
    }

    pub fn alerts(&self) -> &[EmergencyAlert] {
        &self.alerts
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    pub fn note_count(&self) -> usize {
        self.alerts.iter().map(|alert| alert.notes.len()).sum()
    }

    /// 提醒文本
    pub fn summary(&self) -> String {
        if self.alerts.is_empty() {
            return "No emergency notes.".to_string();
        }

        let mut msg = String::from("EMERGENCY ALERT!\n");
        for alert in &self.alerts {
            let name = alert.patient_name.as_deref().unwrap_or("Unknown");
            for note in &alert.notes {
                msg.push_str(&format!(
                    "\nPatient: {} (ID: {})\nNote: {}\nBy: {} at {}\n",
                    name,
                    alert.patient_id,
                    note.note,
                    note.author,
                    note.created_at.format("%Y-%m-%d %H:%M")
                ));
            }
        }
        msg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(id: i64, patient_id: i64, at: &str, emergency: bool) -> PatientNote {
        PatientNote {
            id,
            patient_id,
            author: "nurse1".to_string(),
            note: format!("note {}", id),
            emergency,
            created_at: NaiveDateTime::parse_from_str(at, "%Y-%m-%d %H:%M:%S").unwrap(),
        }
    }

    #[test]
    fn test_board_groups_and_orders() {
        let board = EmergencyBoard::from_notes(vec![
            note(1, 10, "2025-06-09 08:00:00", true),
            note(2, 20, "2025-06-10 09:00:00", true),
            note(3, 10, "2025-06-10 07:00:00", true),
            note(4, 30, "2025-06-10 10:00:00", false),
        ]);

        assert_eq!(board.alerts().len(), 2);
        assert_eq!(board.note_count(), 3);
        assert_eq!(board.alerts()[0].patient_id, 20);
        let ids: Vec<i64> = board.alerts()[1].notes.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![3, 1]);
    }

    #[test]
    fn test_summary_uses_patient_names() {
        let patient = Patient {
            id: 10,
            name: "Chisomo Banda".to_string(),
            date_of_birth: None,
            gender: None,
            blood_type: None,
            registered_at: NaiveDateTime::parse_from_str("2025-05-01 08:00:00", "%Y-%m-%d %H:%M:%S")
                .unwrap(),
        };
        let board = EmergencyBoard::from_notes(vec![note(1, 10, "2025-06-09 08:00:00", true)])
            .with_patient_names(&[patient]);

        let summary = board.summary();
        assert!(summary.starts_with("EMERGENCY ALERT!"));
        assert!(summary.contains("Patient: Chisomo Banda (ID: 10)"));
    }

    #[test]
    fn test_empty_board() {
        let board = EmergencyBoard::from_notes(vec![note(1, 10, "2025-06-09 08:00:00", false)]);
        assert!(board.is_empty());
        assert_eq!(board.summary(), "No emergency notes.");
    }
}
