//! 数据库模型

use chrono::{NaiveDate, NaiveDateTime};
use hms_core::models::*;
use hms_core::{utils, HmsError, Result};
use sqlx::FromRow;

// 数据库表模型 - 使用FromRow trait用于SQL查询

/// 数据库患者表
#[derive(Debug, FromRow)]
pub struct DbPatient {
    pub patient_id: i64,
    pub name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,     // 存储为代码，转换为Gender枚举
    pub blood_type: Option<String>, // 存储为字符串，转换为BloodType枚举
    pub date_registered: NaiveDateTime,
}

impl From<DbPatient> for Patient {
    fn from(db_patient: DbPatient) -> Self {
        let blood_type = db_patient.blood_type.as_deref().and_then(|raw| {
            raw.parse::<BloodType>()
                .map_err(|e| {
                    tracing::warn!("Patient {}: {}", db_patient.patient_id, e);
                })
                .ok()
        });

        Patient {
            id: db_patient.patient_id,
            name: db_patient.name,
            date_of_birth: db_patient.date_of_birth,
            gender: db_patient.gender.as_deref().and_then(Gender::from_code),
            blood_type,
            registered_at: db_patient.date_registered,
        }
    }
}

/// 数据库诊疗记录表
#[derive(Debug, FromRow)]
pub struct DbTreatment {
    pub treatment_id: i64,
    pub patient_id: i64,
    pub doctor_id: Option<i64>,
    pub date: Option<NaiveDateTime>, // 旧数据可能为空
    pub blood_pressure: Option<String>,
    pub temperature: Option<f64>,
    pub weight: Option<f64>,
    pub symptoms: Option<String>,
    pub treatment: Option<String>,
}

impl From<DbTreatment> for TreatmentRecord {
    fn from(db_treatment: DbTreatment) -> Self {
        TreatmentRecord {
            id: db_treatment.treatment_id,
            patient_id: db_treatment.patient_id,
            doctor_id: db_treatment.doctor_id,
            recorded_at: RecordedAt::from(db_treatment.date),
            vitals: Vitals {
                blood_pressure: db_treatment.blood_pressure,
                temperature: db_treatment.temperature,
                weight: db_treatment.weight,
            },
            symptoms: db_treatment.symptoms,
            treatment: db_treatment.treatment,
        }
    }
}

/// 数据库医生表
#[derive(Debug, FromRow)]
pub struct DbDoctor {
    pub id: i64,
    pub firstname: String,
    pub lastname: String,
    pub national_id: String,
    pub qualification: String,
    pub specialization: String,
}

impl TryFrom<DbDoctor> for Doctor {
    type Error = HmsError;

    fn try_from(db_doctor: DbDoctor) -> Result<Self> {
        Ok(Doctor {
            id: db_doctor.id,
            first_name: db_doctor.firstname,
            last_name: db_doctor.lastname,
            national_id: db_doctor.national_id,
            qualification: db_doctor.qualification,
            specialization: db_doctor.specialization.parse()?,
        })
    }
}

/// 数据库患者备注表
#[derive(Debug, FromRow)]
pub struct DbPatientNote {
    pub id: i64,
    pub patient_id: i64,
    pub author: String,
    pub note: String,
    pub emergency: bool,
    pub date: NaiveDateTime,
}

impl From<DbPatientNote> for PatientNote {
    fn from(db_note: DbPatientNote) -> Self {
        PatientNote {
            id: db_note.id,
            patient_id: db_note.patient_id,
            author: db_note.author,
            note: db_note.note,
            emergency: db_note.emergency,
            created_at: db_note.date,
        }
    }
}

/// 数据库审计日志表
#[derive(Debug, FromRow)]
pub struct DbLog {
    pub id: i64,
    pub username: String,
    pub department: String,
    pub action: String,
    pub logged_at: NaiveDateTime,
}

impl From<DbLog> for AuditLogEntry {
    fn from(db_log: DbLog) -> Self {
        AuditLogEntry {
            id: db_log.id,
            user: db_log.username,
            department: db_log.department,
            action: db_log.action,
            logged_at: db_log.logged_at,
        }
    }
}

/// 数据库用户表
#[derive(Debug, FromRow)]
pub struct DbUser {
    pub username: String,
    pub password_digest: String,
    pub role: String,
}

impl TryFrom<DbUser> for User {
    type Error = HmsError;

    fn try_from(db_user: DbUser) -> Result<Self> {
        Ok(User {
            role: db_user.role.parse()?,
            username: db_user.username,
            password_digest: db_user.password_digest,
        })
    }
}

// 插入模型 - 用于创建新记录

/// 新患者插入模型（前台登记）
#[derive(Debug, Clone)]
pub struct NewPatient {
    pub name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub blood_type: Option<BloodType>,
}

impl NewPatient {
    pub fn validate(&self) -> Result<()> {
        if !utils::is_valid_person_name(&self.name) {
            return Err(HmsError::Validation(format!("Invalid patient name: {:?}", self.name)));
        }
        Ok(())
    }
}

/// 新医生插入模型
#[derive(Debug, Clone)]
pub struct NewDoctor {
    pub first_name: String,
    pub last_name: String,
    pub national_id: String,
    pub qualification: String,
    pub specialization: Specialization,
}

impl NewDoctor {
    pub fn validate(&self) -> Result<()> {
        if !utils::is_valid_person_name(&self.first_name) || !utils::is_valid_person_name(&self.last_name) {
            return Err(HmsError::Validation("Doctor first and last name are required".to_string()));
        }
        if self.national_id.trim().is_empty() || self.qualification.trim().is_empty() {
            return Err(HmsError::Validation(
                "National ID and qualification are required".to_string(),
            ));
        }
        Ok(())
    }
}

/// 诊断更新模型，症状和治疗方案都必须填写
#[derive(Debug, Clone)]
pub struct NewDiagnosis {
    pub patient_id: i64,
    pub doctor_id: i64,
    pub symptoms: String,
    pub treatment: String,
}

impl NewDiagnosis {
    pub fn validate(&self) -> Result<()> {
        if self.symptoms.trim().is_empty() || self.treatment.trim().is_empty() {
            return Err(HmsError::Validation(
                "Both symptoms and treatment are required".to_string(),
            ));
        }
        Ok(())
    }
}

/// 新备注插入模型
#[derive(Debug, Clone)]
pub struct NewPatientNote {
    pub patient_id: i64,
    pub author: String,
    pub note: String,
    pub emergency: bool,
}

impl NewPatientNote {
    pub fn validate(&self) -> Result<()> {
        if self.note.trim().is_empty() {
            return Err(HmsError::Validation("Note text is required".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registered() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2025-05-01 08:00:00", "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_patient_conversion() {
        let patient = Patient::from(DbPatient {
            patient_id: 42,
            name: "Thoko Nyirenda".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1990, 2, 14),
            gender: Some("F".to_string()),
            blood_type: Some("ab+".to_string()),
            date_registered: registered(),
        });

        assert_eq!(patient.id, 42);
        assert_eq!(patient.gender, Some(Gender::Female));
        assert_eq!(patient.blood_type, Some(BloodType::AbPositive));
    }

    #[test]
    fn test_unknown_blood_type_is_dropped() {
        let patient = Patient::from(DbPatient {
            patient_id: 43,
            name: "Kondwani".to_string(),
            date_of_birth: None,
            gender: None,
            blood_type: Some("Z".to_string()),
            date_registered: registered(),
        });
        assert_eq!(patient.blood_type, None);
    }

    #[test]
    fn test_treatment_without_date_is_missing() {
        let record = TreatmentRecord::from(DbTreatment {
            treatment_id: 1,
            patient_id: 42,
            doctor_id: None,
            date: None,
            blood_pressure: Some("120/80".to_string()),
            temperature: None,
            weight: None,
            symptoms: None,
            treatment: None,
        });

        assert_eq!(record.recorded_at, RecordedAt::Missing);
        assert!(record.has_vitals());
    }

    #[test]
    fn test_user_role_is_checked() {
        let user = User::try_from(DbUser {
            username: "nurse1".to_string(),
            password_digest: utils::password_digest("pw"),
            role: "Nurse".to_string(),
        })
        .unwrap();
        assert_eq!(user.role, UserRole::Nurse);

        let bad = User::try_from(DbUser {
            username: "x".to_string(),
            password_digest: String::new(),
            role: "Janitor".to_string(),
        });
        assert!(bad.is_err());
    }

    #[test]
    fn test_insert_validation() {
        let patient = NewPatient {
            name: "  ".to_string(),
            date_of_birth: None,
            gender: None,
            blood_type: None,
        };
        assert!(patient.validate().is_err());

        let doctor = NewDoctor {
            first_name: "Grace".to_string(),
            last_name: "Kamanga".to_string(),
            national_id: "".to_string(),
            qualification: "MBBS".to_string(),
            specialization: Specialization::Medicine,
        };
        assert!(doctor.validate().is_err());

        let note = NewPatientNote {
            patient_id: 1,
            author: "nurse1".to_string(),
            note: "Allergic to penicillin".to_string(),
            emergency: true,
        };
        assert!(note.validate().is_ok());
    }

    #[test]
    fn test_diagnosis_requires_symptoms_and_treatment() {
        let diagnosis = NewDiagnosis {
            patient_id: 4,
            doctor_id: 1,
            symptoms: "Headache, fever".to_string(),
            treatment: "Paracetamol 1g".to_string(),
        };
        assert!(diagnosis.validate().is_ok());

        let symptoms_only = NewDiagnosis {
            treatment: "  ".to_string(),
            ..diagnosis.clone()
        };
        assert!(matches!(symptoms_only.validate(), Err(HmsError::Validation(_))));

        let treatment_only = NewDiagnosis {
            symptoms: String::new(),
            ..diagnosis
        };
        assert!(treatment_only.validate().is_err());
    }
}
