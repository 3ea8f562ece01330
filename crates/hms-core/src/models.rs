//! 核心数据模型定义

use crate::error::{HmsError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 患者基本信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub blood_type: Option<BloodType>,
    pub registered_at: NaiveDateTime, // 登记时间
}

/// 性别枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    /// 数据库存储代码
    pub fn code(&self) -> &'static str {
        match self {
            Gender::Male => "M",
            Gender::Female => "F",
            Gender::Other => "O",
        }
    }

    /// 从存储代码或全称解析，未知值返回 None
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "M" | "MALE" => Some(Gender::Male),
            "F" | "FEMALE" => Some(Gender::Female),
            "O" | "OTHER" => Some(Gender::Other),
            _ => None,
        }
    }
}

/// 血型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BloodType {
    #[serde(rename = "A+")]
    APositive,
    #[serde(rename = "A-")]
    ANegative,
    #[serde(rename = "B+")]
    BPositive,
    #[serde(rename = "B-")]
    BNegative,
    #[serde(rename = "AB+")]
    AbPositive,
    #[serde(rename = "AB-")]
    AbNegative,
    #[serde(rename = "O+")]
    OPositive,
    #[serde(rename = "O-")]
    ONegative,
}

impl BloodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BloodType::APositive => "A+",
            BloodType::ANegative => "A-",
            BloodType::BPositive => "B+",
            BloodType::BNegative => "B-",
            BloodType::AbPositive => "AB+",
            BloodType::AbNegative => "AB-",
            BloodType::OPositive => "O+",
            BloodType::ONegative => "O-",
        }
    }
}

impl FromStr for BloodType {
    type Err = HmsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A+" => Ok(BloodType::APositive),
            "A-" => Ok(BloodType::ANegative),
            "B+" => Ok(BloodType::BPositive),
            "B-" => Ok(BloodType::BNegative),
            "AB+" => Ok(BloodType::AbPositive),
            "AB-" => Ok(BloodType::AbNegative),
            "O+" => Ok(BloodType::OPositive),
            "O-" => Ok(BloodType::ONegative),
            other => Err(HmsError::Validation(format!("Unknown blood type: {}", other))),
        }
    }
}

impl fmt::Display for BloodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 生命体征
///
/// 三项均为可选；至少一项有值才算"已记录生命体征"。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vitals {
    #[serde(default)]
    pub blood_pressure: Option<String>, // 例如 "120/80"
    #[serde(default)]
    pub temperature: Option<f64>, // 摄氏度
    #[serde(default)]
    pub weight: Option<f64>, // 千克
}

impl Vitals {
    /// 是否记录了任意一项生命体征
    pub fn is_recorded(&self) -> bool {
        self.blood_pressure
            .as_deref()
            .map_or(false, |bp| !bp.trim().is_empty())
            || self.temperature.is_some()
            || self.weight.is_some()
    }

    /// 录入前校验：至少一项有值，且数值在合理范围内
    pub fn validate(&self) -> Result<()> {
        if !self.is_recorded() {
            return Err(HmsError::Validation("At least one vital sign is required".to_string()));
        }

        if let Some(bp) = self.blood_pressure.as_deref().map(str::trim).filter(|bp| !bp.is_empty()) {
            let valid = bp
                .split_once('/')
                .map(|(sys, dia)| {
                    matches!(
                        (sys.trim().parse::<u16>(), dia.trim().parse::<u16>()),
                        (Ok(s), Ok(d)) if s > d && s <= 300 && d > 0
                    )
                })
                .unwrap_or(false);
            if !valid {
                return Err(HmsError::Validation(format!("Invalid blood pressure: {}", bp)));
            }
        }

        if let Some(temp) = self.temperature {
            if !(25.0..=45.0).contains(&temp) {
                return Err(HmsError::Validation(format!("Temperature out of range: {}", temp)));
            }
        }

        if let Some(weight) = self.weight {
            if !(weight > 0.0 && weight <= 500.0) {
                return Err(HmsError::Validation(format!("Weight out of range: {}", weight)));
            }
        }

        Ok(())
    }
}

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// 诊疗记录时间戳
///
/// 保留存储中的原始形态：旧数据可能含有无法解析的日期（如 MySQL 的零日期），
/// 分诊时需要把它当作可恢复的结果而不是错误。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<serde_json::Value>", into = "Option<String>")]
pub enum RecordedAt {
    At(NaiveDateTime),
    Malformed(String),
    Missing,
}

impl RecordedAt {
    /// 严格解析，失败时返回 `MalformedTimestamp`
    pub fn try_parse(raw: &str) -> Result<NaiveDateTime> {
        let raw = raw.trim();

        for format in DATETIME_FORMATS {
            if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
                return Ok(ts);
            }
        }

        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Ok(ts.naive_local());
        }

        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(|date| date.and_time(NaiveTime::MIN))
            .map_err(|_| HmsError::MalformedTimestamp(raw.to_string()))
    }

    /// 宽松解析：空值为 `Missing`，无法解析为 `Malformed`
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") => RecordedAt::Missing,
            Some(value) => match Self::try_parse(value) {
                Ok(ts) => RecordedAt::At(ts),
                Err(_) => RecordedAt::Malformed(value.to_string()),
            },
        }
    }

    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            RecordedAt::At(ts) => Some(*ts),
            _ => None,
        }
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.timestamp().map(|ts| ts.date())
    }
}

impl From<NaiveDateTime> for RecordedAt {
    fn from(ts: NaiveDateTime) -> Self {
        RecordedAt::At(ts)
    }
}

impl From<Option<NaiveDateTime>> for RecordedAt {
    fn from(ts: Option<NaiveDateTime>) -> Self {
        ts.map_or(RecordedAt::Missing, RecordedAt::At)
    }
}

/// 快照中非字符串的时间戳（数字、对象等）按无法解析处理
impl From<Option<serde_json::Value>> for RecordedAt {
    fn from(raw: Option<serde_json::Value>) -> Self {
        match raw {
            None | Some(serde_json::Value::Null) => RecordedAt::Missing,
            Some(serde_json::Value::String(value)) => RecordedAt::parse(Some(&value)),
            Some(other) => RecordedAt::Malformed(other.to_string()),
        }
    }
}

impl From<RecordedAt> for Option<String> {
    fn from(recorded_at: RecordedAt) -> Self {
        match recorded_at {
            RecordedAt::At(ts) => Some(ts.format("%Y-%m-%d %H:%M:%S").to_string()),
            RecordedAt::Malformed(raw) => Some(raw),
            RecordedAt::Missing => None,
        }
    }
}

impl fmt::Display for RecordedAt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordedAt::At(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S")),
            RecordedAt::Malformed(raw) => write!(f, "{} (unreadable)", raw),
            RecordedAt::Missing => f.write_str("(no date)"),
        }
    }
}

/// 诊疗记录
///
/// 护士录入生命体征时新建一行，医生随后在最近一行上补充症状与治疗方案。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreatmentRecord {
    pub id: i64,
    pub patient_id: i64,
    #[serde(default)]
    pub doctor_id: Option<i64>,
    #[serde(default = "missing_recorded_at")]
    pub recorded_at: RecordedAt,
    #[serde(flatten)]
    pub vitals: Vitals,
    #[serde(default)]
    pub symptoms: Option<String>,
    #[serde(default)]
    pub treatment: Option<String>,
}

fn missing_recorded_at() -> RecordedAt {
    RecordedAt::Missing
}

impl TreatmentRecord {
    pub fn has_vitals(&self) -> bool {
        self.vitals.is_recorded()
    }

    /// 是否为指定日期的生命体征记录
    pub fn is_vitals_on(&self, day: NaiveDate) -> bool {
        self.has_vitals() && self.recorded_at.date() == Some(day)
    }
}

/// 医生档案
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Doctor {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub national_id: String,
    pub qualification: String,
    pub specialization: Specialization,
}

impl Doctor {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// 医生专科
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Specialization {
    Surgeon,
    Optician,
    Psychiatrist,
    Neurologist,
    Medicine,
    Hematologist,
}

impl Specialization {
    pub fn as_str(&self) -> &'static str {
        match self {
            Specialization::Surgeon => "Surgeon",
            Specialization::Optician => "Optician",
            Specialization::Psychiatrist => "Psychiatrist",
            Specialization::Neurologist => "Neurologist",
            Specialization::Medicine => "Medicine",
            Specialization::Hematologist => "Hematologist",
        }
    }
}

impl FromStr for Specialization {
    type Err = HmsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "surgeon" => Ok(Specialization::Surgeon),
            "optician" => Ok(Specialization::Optician),
            "psychiatrist" => Ok(Specialization::Psychiatrist),
            "neurologist" => Ok(Specialization::Neurologist),
            "medicine" => Ok(Specialization::Medicine),
            "hematologist" => Ok(Specialization::Hematologist),
            other => Err(HmsError::Validation(format!("Unknown specialization: {}", other))),
        }
    }
}

/// 患者备注
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientNote {
    pub id: i64,
    pub patient_id: i64,
    pub author: String,
    pub note: String,
    pub emergency: bool, // 紧急备注会在医生登录时提醒
    pub created_at: NaiveDateTime,
}

/// 审计日志条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: i64,
    pub user: String,
    pub department: String,
    pub action: String,
    pub logged_at: NaiveDateTime,
}

/// 用户角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserRole {
    /// 管理员 - 查看日志与全院待处理患者
    Admin,
    /// 医生 - 诊断与治疗
    Doctor,
    /// 护士 - 录入生命体征
    Nurse,
    /// 前台 - 患者登记
    Receptionist,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "Admin",
            UserRole::Doctor => "Doctor",
            UserRole::Nurse => "Nurse",
            UserRole::Receptionist => "Receptionist",
        }
    }

    /// 检查角色是否允许执行某项操作
    pub fn authorize(&self, allowed: &[UserRole], action: &str) -> Result<()> {
        if allowed.contains(self) {
            Ok(())
        } else {
            Err(HmsError::Permission(format!("{} role cannot {}", self, action)))
        }
    }
}

impl FromStr for UserRole {
    type Err = HmsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(UserRole::Admin),
            "doctor" => Ok(UserRole::Doctor),
            "nurse" => Ok(UserRole::Nurse),
            "receptionist" => Ok(UserRole::Receptionist),
            other => Err(HmsError::Validation(format!("Unknown role: {}", other))),
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 系统用户
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    #[serde(skip_serializing)]
    pub password_digest: String,
    pub role: UserRole,
}

impl User {
    pub fn verify_password(&self, password: &str) -> bool {
        !password.is_empty() && crate::utils::verify_password(password, &self.password_digest)
    }
}
