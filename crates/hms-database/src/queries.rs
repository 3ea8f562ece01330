//! 数据库查询操作
//!
//! 每个操作都是独立的原子语句，不跨用户操作开启事务；并发修改以最后写入为准。

use crate::connection::DatabasePool;
use crate::models::*;
use async_trait::async_trait;
use chrono::NaiveDate;
use hms_core::{
    utils, AuditLogEntry, Doctor, HmsError, Patient, PatientNote, Result, TreatmentRecord,
    UserRole, Vitals,
};
use hms_triage::TriageDataSource;
use sqlx::Row;

const PATIENT_COLUMNS: &str =
    "patient_id, name, date_of_birth, gender, blood_type, date_registered";

const TREATMENT_COLUMNS: &str = "treatment_id, patient_id, doctor_id, date, blood_pressure, \
     temperature, weight, symptoms, treatment";

/// 数据库查询操作接口
pub struct DatabaseQueries<'a> {
    pool: &'a DatabasePool,
}

impl<'a> DatabaseQueries<'a> {
    pub fn new(pool: &'a DatabasePool) -> Self {
        Self { pool }
    }

    /// 创建数据库表
    pub async fn create_tables(&self) -> Result<()> {
        let pool = self.pool.pool();

        // 用户表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS users (
                username VARCHAR(64) PRIMARY KEY,
                password_digest CHAR(64) NOT NULL,
                role VARCHAR(16) NOT NULL
            )
        "#).execute(pool).await?;

        // 医生表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS doctors (
                id BIGSERIAL PRIMARY KEY,
                firstname VARCHAR(100) NOT NULL,
                lastname VARCHAR(100) NOT NULL,
                national_id VARCHAR(32) UNIQUE NOT NULL,
                qualification VARCHAR(100) NOT NULL,
                specialization VARCHAR(32) NOT NULL
            )
        "#).execute(pool).await?;

        // 患者表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS patients (
                patient_id BIGSERIAL PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                date_of_birth DATE,
                gender CHAR(1),
                blood_type VARCHAR(3),
                date_registered TIMESTAMP NOT NULL DEFAULT LOCALTIMESTAMP
            )
        "#).execute(pool).await?;

        // 诊疗记录表，date 允许为空以兼容导入的旧数据
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS treatments (
                treatment_id BIGSERIAL PRIMARY KEY,
                patient_id BIGINT NOT NULL REFERENCES patients(patient_id),
                doctor_id BIGINT REFERENCES doctors(id),
                date TIMESTAMP DEFAULT LOCALTIMESTAMP,
                blood_pressure VARCHAR(16),
                temperature DOUBLE PRECISION,
                weight DOUBLE PRECISION,
                symptoms TEXT,
                treatment TEXT
            )
        "#).execute(pool).await?;

        // 患者备注表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS patient_notes (
                id BIGSERIAL PRIMARY KEY,
                patient_id BIGINT NOT NULL REFERENCES patients(patient_id),
                author VARCHAR(64) NOT NULL,
                note TEXT NOT NULL,
                emergency BOOLEAN NOT NULL DEFAULT FALSE,
                date TIMESTAMP NOT NULL DEFAULT LOCALTIMESTAMP
            )
        "#).execute(pool).await?;

        // 审计日志表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS logs (
                id BIGSERIAL PRIMARY KEY,
                username VARCHAR(64) NOT NULL,
                department VARCHAR(32) NOT NULL,
                action TEXT NOT NULL,
                logged_at TIMESTAMP NOT NULL DEFAULT LOCALTIMESTAMP
            )
        "#).execute(pool).await?;

        // 创建索引以优化查询性能
        self.create_indexes().await?;

        tracing::info!("Database tables created successfully");
        Ok(())
    }

    /// 创建数据库索引
    async fn create_indexes(&self) -> Result<()> {
        let pool = self.pool.pool();

        let indexes = vec![
            "CREATE INDEX IF NOT EXISTS idx_patients_name ON patients(name)",
            "CREATE INDEX IF NOT EXISTS idx_patients_date_registered ON patients(date_registered)",
            "CREATE INDEX IF NOT EXISTS idx_treatments_patient_date ON treatments(patient_id, date DESC)",
            "CREATE INDEX IF NOT EXISTS idx_treatments_doctor_date ON treatments(doctor_id, date)",
            "CREATE INDEX IF NOT EXISTS idx_patient_notes_patient_id ON patient_notes(patient_id)",
            "CREATE INDEX IF NOT EXISTS idx_patient_notes_emergency ON patient_notes(emergency)",
            "CREATE INDEX IF NOT EXISTS idx_doctors_firstname ON doctors(firstname)",
            "CREATE INDEX IF NOT EXISTS idx_logs_logged_at ON logs(logged_at)",
        ];

        for index_sql in indexes {
            sqlx::query(index_sql).execute(pool).await?;
        }

        tracing::info!("Database indexes created successfully");
        Ok(())
    }

    // ========== 用户相关操作 ==========

    /// 创建用户，口令以摘要形式保存
    pub async fn create_user(&self, username: &str, password: &str, role: UserRole) -> Result<()> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(HmsError::Validation("Username and password are required".to_string()));
        }

        sqlx::query("INSERT INTO users (username, password_digest, role) VALUES ($1, $2, $3)")
            .bind(username.trim())
            .bind(utils::password_digest(password))
            .bind(role.as_str())
            .execute(self.pool.pool())
            .await?;

        tracing::info!("Created {} user {}", role, username.trim());
        Ok(())
    }

    /// 登录校验，成功返回角色；用户名或口令错误返回 None
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<Option<UserRole>> {
        let result = sqlx::query_as::<_, DbUser>(
            "SELECT username, password_digest, role FROM users WHERE username = $1",
        )
        .bind(username.trim())
        .fetch_optional(self.pool.pool())
        .await?;

        let Some(db_user) = result else {
            tracing::warn!("Login attempt for unknown user {}", username.trim());
            return Ok(None);
        };

        let user = hms_core::User::try_from(db_user)?;
        if user.verify_password(password) {
            Ok(Some(user.role))
        } else {
            tracing::warn!("Invalid password for user {}", user.username);
            Ok(None)
        }
    }

    // ========== 患者相关操作 ==========

    /// 登记新患者
    pub async fn register_patient(&self, patient: &NewPatient) -> Result<i64> {
        patient.validate()?;

        let id: i64 = sqlx::query(r#"
            INSERT INTO patients (name, date_of_birth, gender, blood_type)
            VALUES ($1, $2, $3, $4)
            RETURNING patient_id
        "#)
        .bind(patient.name.trim())
        .bind(patient.date_of_birth)
        .bind(patient.gender.map(|g| g.code()))
        .bind(patient.blood_type.map(|b| b.as_str()))
        .fetch_one(self.pool.pool())
        .await?
        .get("patient_id");

        tracing::info!("Registered patient {}", id);
        Ok(id)
    }

    /// 所有患者，最近登记的在前
    pub async fn list_patients(&self) -> Result<Vec<Patient>> {
        let results = sqlx::query_as::<_, DbPatient>(&format!(
            "SELECT {} FROM patients ORDER BY date_registered DESC",
            PATIENT_COLUMNS
        ))
        .fetch_all(self.pool.pool())
        .await?;

        Ok(results.into_iter().map(Patient::from).collect())
    }

    /// 根据ID查找患者
    pub async fn get_patient(&self, patient_id: i64) -> Result<Option<Patient>> {
        let result = sqlx::query_as::<_, DbPatient>(&format!(
            "SELECT {} FROM patients WHERE patient_id = $1",
            PATIENT_COLUMNS
        ))
        .bind(patient_id)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(result.map(Patient::from))
    }

    /// 指定日期没有生命体征记录的患者（服务端过滤）
    pub async fn patients_without_vitals_on(&self, day: NaiveDate) -> Result<Vec<Patient>> {
        let results = sqlx::query_as::<_, DbPatient>(&format!(
            r#"
            SELECT {} FROM patients
            WHERE patient_id NOT IN (
                SELECT patient_id FROM treatments
                WHERE date::date = $1
                  AND (NULLIF(TRIM(blood_pressure), '') IS NOT NULL
                       OR temperature IS NOT NULL
                       OR weight IS NOT NULL)
            )
            ORDER BY date_registered
            "#,
            PATIENT_COLUMNS
        ))
        .bind(day)
        .fetch_all(self.pool.pool())
        .await?;

        Ok(results.into_iter().map(Patient::from).collect())
    }

    // ========== 诊疗记录相关操作 ==========

    /// 患者的全部诊疗记录，最近的在前，无日期的排最后
    pub async fn treatment_history(&self, patient_id: i64) -> Result<Vec<TreatmentRecord>> {
        let results = sqlx::query_as::<_, DbTreatment>(&format!(
            "SELECT {} FROM treatments WHERE patient_id = $1 \
             ORDER BY date DESC NULLS LAST, treatment_id DESC",
            TREATMENT_COLUMNS
        ))
        .bind(patient_id)
        .fetch_all(self.pool.pool())
        .await?;

        Ok(results.into_iter().map(TreatmentRecord::from).collect())
    }

    /// 最近一条诊疗记录
    pub async fn latest_treatment(&self, patient_id: i64) -> Result<Option<TreatmentRecord>> {
        let result = sqlx::query_as::<_, DbTreatment>(&format!(
            "SELECT {} FROM treatments WHERE patient_id = $1 \
             ORDER BY date DESC NULLS LAST, treatment_id DESC LIMIT 1",
            TREATMENT_COLUMNS
        ))
        .bind(patient_id)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(result.map(TreatmentRecord::from))
    }

    /// 护士录入生命体征，新建一条诊疗记录
    pub async fn record_vitals(&self, patient_id: i64, vitals: &Vitals) -> Result<i64> {
        vitals.validate()?;

        if self.get_patient(patient_id).await?.is_none() {
            return Err(HmsError::NotFound(format!("Patient {} not found", patient_id)));
        }

        let id: i64 = sqlx::query(r#"
            INSERT INTO treatments (patient_id, blood_pressure, temperature, weight)
            VALUES ($1, $2, $3, $4)
            RETURNING treatment_id
        "#)
        .bind(patient_id)
        .bind(vitals.blood_pressure.as_deref().map(str::trim))
        .bind(vitals.temperature)
        .bind(vitals.weight)
        .fetch_one(self.pool.pool())
        .await?
        .get("treatment_id");

        tracing::info!("Recorded vitals {} for patient {}", id, patient_id);
        Ok(id)
    }

    /// 医生在最近一条记录上填写症状与治疗方案
    ///
    /// 最近一条记录没有生命体征时拒绝，需先由护士录入。
    pub async fn record_diagnosis(&self, diagnosis: &NewDiagnosis) -> Result<i64> {
        diagnosis.validate()?;
        let patient_id = diagnosis.patient_id;

        let latest = self
            .latest_treatment(patient_id)
            .await?
            .filter(TreatmentRecord::has_vitals)
            .ok_or_else(|| {
                HmsError::NotFound(format!("No vitals recorded yet for patient {}", patient_id))
            })?;

        sqlx::query(
            "UPDATE treatments SET doctor_id = $1, symptoms = $2, treatment = $3 WHERE treatment_id = $4",
        )
        .bind(diagnosis.doctor_id)
        .bind(diagnosis.symptoms.trim())
        .bind(diagnosis.treatment.trim())
        .bind(latest.id)
        .execute(self.pool.pool())
        .await?;

        tracing::info!(
            "Doctor {} updated treatment {} for patient {}",
            diagnosis.doctor_id,
            latest.id,
            patient_id
        );
        Ok(latest.id)
    }

    /// 医生指定日期诊治过的患者
    pub async fn patients_treated_by_on(&self, doctor_id: i64, day: NaiveDate) -> Result<Vec<Patient>> {
        let results = sqlx::query_as::<_, DbPatient>(
            r#"
            SELECT p.patient_id, p.name, p.date_of_birth, p.gender, p.blood_type, p.date_registered
            FROM patients p
            WHERE p.patient_id IN (
                SELECT t.patient_id FROM treatments t
                WHERE t.doctor_id = $1 AND t.date::date = $2
            )
            ORDER BY p.name
            "#,
        )
        .bind(doctor_id)
        .bind(day)
        .fetch_all(self.pool.pool())
        .await?;

        Ok(results.into_iter().map(Patient::from).collect())
    }

    // ========== 医生相关操作 ==========

    /// 按名查找医生
    pub async fn find_doctor_by_first_name(&self, first_name: &str) -> Result<Option<Doctor>> {
        let result = sqlx::query_as::<_, DbDoctor>(
            "SELECT id, firstname, lastname, national_id, qualification, specialization \
             FROM doctors WHERE firstname = $1 ORDER BY id LIMIT 1",
        )
        .bind(first_name.trim())
        .fetch_optional(self.pool.pool())
        .await?;

        result.map(Doctor::try_from).transpose()
    }

    /// 登记医生档案
    pub async fn register_doctor(&self, doctor: &NewDoctor) -> Result<i64> {
        doctor.validate()?;

        let id: i64 = sqlx::query(r#"
            INSERT INTO doctors (firstname, lastname, national_id, qualification, specialization)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
        "#)
        .bind(doctor.first_name.trim())
        .bind(doctor.last_name.trim())
        .bind(doctor.national_id.trim())
        .bind(doctor.qualification.trim())
        .bind(doctor.specialization.as_str())
        .fetch_one(self.pool.pool())
        .await?
        .get("id");

        tracing::info!("Registered doctor {} ({})", id, doctor.specialization.as_str());
        Ok(id)
    }

    // ========== 备注相关操作 ==========

    /// 添加患者备注
    pub async fn add_note(&self, note: &NewPatientNote) -> Result<i64> {
        note.validate()?;

        let id: i64 = sqlx::query(r#"
            INSERT INTO patient_notes (patient_id, author, note, emergency)
            VALUES ($1, $2, $3, $4)
            RETURNING id
        "#)
        .bind(note.patient_id)
        .bind(&note.author)
        .bind(note.note.trim())
        .bind(note.emergency)
        .fetch_one(self.pool.pool())
        .await?
        .get("id");

        if note.emergency {
            tracing::warn!("Emergency note {} added for patient {}", id, note.patient_id);
        }
        Ok(id)
    }

    /// 全部紧急备注，最新的在前
    pub async fn emergency_notes(&self) -> Result<Vec<PatientNote>> {
        let results = sqlx::query_as::<_, DbPatientNote>(
            "SELECT id, patient_id, author, note, emergency, date FROM patient_notes \
             WHERE emergency ORDER BY date DESC",
        )
        .fetch_all(self.pool.pool())
        .await?;

        Ok(results.into_iter().map(PatientNote::from).collect())
    }

    /// 指定患者的紧急备注
    pub async fn emergency_notes_for(&self, patient_id: i64) -> Result<Vec<PatientNote>> {
        let results = sqlx::query_as::<_, DbPatientNote>(
            "SELECT id, patient_id, author, note, emergency, date FROM patient_notes \
             WHERE emergency AND patient_id = $1 ORDER BY date DESC",
        )
        .bind(patient_id)
        .fetch_all(self.pool.pool())
        .await?;

        Ok(results.into_iter().map(PatientNote::from).collect())
    }

    // ========== 审计日志 ==========

    /// 记录操作日志
    pub async fn log_action(&self, user: &str, department: &str, action: &str) -> Result<()> {
        sqlx::query("INSERT INTO logs (username, department, action) VALUES ($1, $2, $3)")
            .bind(user)
            .bind(department)
            .bind(action)
            .execute(self.pool.pool())
            .await?;

        tracing::debug!("Audit: {} [{}] {}", user, department, action);
        Ok(())
    }

    /// 最近的操作日志
    pub async fn recent_logs(&self, limit: i64) -> Result<Vec<AuditLogEntry>> {
        let results = sqlx::query_as::<_, DbLog>(
            "SELECT id, username, department, action, logged_at FROM logs \
             ORDER BY logged_at DESC, id DESC LIMIT $1",
        )
        .bind(limit.max(1))
        .fetch_all(self.pool.pool())
        .await?;

        Ok(results.into_iter().map(AuditLogEntry::from).collect())
    }
}

#[async_trait]
impl<'a> TriageDataSource for DatabaseQueries<'a> {
    async fn list_patients(&self) -> Result<Vec<Patient>> {
        DatabaseQueries::list_patients(self).await
    }

    async fn list_treatments_for(&self, patient_id: i64) -> Result<Vec<TreatmentRecord>> {
        self.treatment_history(patient_id).await
    }

    async fn list_patients_without_vitals_on(&self, day: NaiveDate) -> Result<Vec<Patient>> {
        self.patients_without_vitals_on(day).await
    }
}
