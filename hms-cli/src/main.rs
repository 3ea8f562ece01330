//! HMS命令行程序

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use hms_admin::{init_logging, ConfigManager, HmsConfig};
use hms_core::{BloodType, Gender, HmsError, Specialization, UserRole, Vitals};
use hms_database::{
    DatabasePool, DatabaseQueries, NewDiagnosis, NewDoctor, NewPatient, NewPatientNote,
};
use hms_triage::{
    Clock, EmergencyBoard, FixedClock, PatientHistory, PendingView, PendingWorklist,
    PendingWorklistService, SnapshotSource, SystemClock, TriageClassifier, TriageDataSource,
    WorklistOrder,
};
use std::path::PathBuf;
use tracing::{error, info};

/// HMS命令行参数
#[derive(Parser, Debug)]
#[command(name = "hms")]
#[command(about = "Hospital management: patient triage and treatment records")]
struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 日志级别
    #[arg(short, long)]
    log_level: Option<String>,

    /// 使用JSON快照代替数据库（仅限只读命令）
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// 以指定日期作为"今天"
    #[arg(long)]
    today: Option<NaiveDate>,

    /// 登录用户名
    #[arg(short, long)]
    user: Option<String>,

    /// 登录口令，未指定时读取 HMS_PASSWORD 环境变量
    #[arg(short, long)]
    password: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 创建数据库表，可选创建初始管理员
    InitDb {
        #[arg(long)]
        admin_user: Option<String>,
        #[arg(long, requires = "admin_user")]
        admin_password: Option<String>,
    },
    /// 登录校验，医生登录时显示紧急提醒
    Login,
    /// 创建系统用户（管理员）
    CreateUser {
        #[arg(long)]
        username: String,
        #[arg(long)]
        new_password: String,
        #[arg(long)]
        role: UserRole,
    },
    /// 当天待处理患者列表
    Pending {
        #[arg(long, value_enum, default_value_t = OrderArg::LastTreatment)]
        order: OrderArg,
        /// 以JSON输出
        #[arg(long)]
        json: bool,
    },
    /// 紧急备注提醒
    Emergencies,
    /// 医生当天诊治的患者
    Today {
        /// 默认为当前登录医生
        #[arg(long)]
        doctor: Option<i64>,
    },
    /// 患者病历与紧急备注
    History {
        #[arg(long)]
        patient: i64,
    },
    /// 登记医生档案
    RegisterDoctor {
        /// 默认为登录用户名
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        national_id: String,
        #[arg(long)]
        qualification: String,
        #[arg(long, default_value = "Medicine")]
        specialization: Specialization,
    },
    /// 登记患者
    RegisterPatient {
        #[arg(long)]
        name: String,
        #[arg(long, value_parser = parse_gender)]
        gender: Option<Gender>,
        #[arg(long)]
        blood_type: Option<BloodType>,
        #[arg(long)]
        dob: Option<NaiveDate>,
    },
    /// 录入生命体征
    RecordVitals {
        #[arg(long)]
        patient: i64,
        #[arg(long)]
        bp: Option<String>,
        #[arg(long)]
        temp: Option<f64>,
        #[arg(long)]
        weight: Option<f64>,
    },
    /// 填写症状与治疗方案
    RecordDiagnosis {
        #[arg(long)]
        patient: i64,
        /// 默认为当前登录医生
        #[arg(long)]
        doctor: Option<i64>,
        #[arg(long)]
        symptoms: String,
        #[arg(long)]
        treatment: String,
    },
    /// 添加患者备注
    AddNote {
        #[arg(long)]
        patient: i64,
        #[arg(long)]
        note: String,
        #[arg(long)]
        emergency: bool,
    },
    /// 查看审计日志
    Logs {
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
}

impl Command {
    /// 需要登录的命令及允许的角色；`None` 表示无需登录
    fn required_roles(&self) -> Option<&'static [UserRole]> {
        const ALL: &[UserRole] = &[
            UserRole::Admin,
            UserRole::Doctor,
            UserRole::Nurse,
            UserRole::Receptionist,
        ];

        match self {
            Command::InitDb { .. } | Command::Pending { .. } | Command::Emergencies => None,
            Command::Login => Some(ALL),
            Command::CreateUser { .. } | Command::Logs { .. } => Some(&[UserRole::Admin]),
            Command::Today { .. } | Command::History { .. } | Command::RecordDiagnosis { .. } => {
                Some(&[UserRole::Doctor])
            }
            Command::RegisterDoctor { .. } => Some(&[UserRole::Doctor, UserRole::Admin]),
            Command::RegisterPatient { .. } => Some(&[UserRole::Receptionist]),
            Command::RecordVitals { .. } => Some(&[UserRole::Nurse]),
            Command::AddNote { .. } => Some(&[UserRole::Nurse, UserRole::Doctor]),
        }
    }

    fn action(&self) -> &'static str {
        match self {
            Command::InitDb { .. } => "initialise the database",
            Command::Login => "log in",
            Command::CreateUser { .. } => "create users",
            Command::Pending { .. } => "view pending patients",
            Command::Emergencies => "view emergency notes",
            Command::Today { .. } => "view today's patients",
            Command::History { .. } => "view patient history",
            Command::RegisterDoctor { .. } => "register doctor profiles",
            Command::RegisterPatient { .. } => "register patients",
            Command::RecordVitals { .. } => "record vitals",
            Command::RecordDiagnosis { .. } => "record a diagnosis",
            Command::AddNote { .. } => "add patient notes",
            Command::Logs { .. } => "view audit logs",
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OrderArg {
    LastTreatment,
    Priority,
}

impl From<OrderArg> for WorklistOrder {
    fn from(order: OrderArg) -> Self {
        match order {
            OrderArg::LastTreatment => WorklistOrder::LastTreatment,
            OrderArg::Priority => WorklistOrder::Priority,
        }
    }
}

fn parse_gender(raw: &str) -> std::result::Result<Gender, String> {
    Gender::from_code(raw).ok_or_else(|| format!("unknown gender: {}", raw))
}

/// 已登录用户
#[derive(Debug, Clone)]
struct Session {
    username: String,
    role: UserRole,
}

impl Session {
    fn department(&self) -> &'static str {
        self.role.as_str()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let manager = ConfigManager::load(args.config.as_deref())?;
    let config = manager.config().clone();

    // 初始化日志
    init_logging(&config.logging, args.log_level.as_deref())?;

    let clock: Box<dyn Clock> = match args.today {
        Some(day) => Box::new(FixedClock(day)),
        None => Box::new(SystemClock),
    };

    match &args.command {
        Command::Pending { order, json } => {
            let result = pending_worklist(&args, &config, clock.as_ref(), (*order).into()).await;
            let view = PendingView::from_result(result);

            match (&view, json) {
                (PendingView::Patients(worklist), true) => {
                    println!("{}", serde_json::to_string_pretty(worklist)?);
                }
                _ => {
                    for line in view.render() {
                        println!("{}", line);
                    }
                }
            }

            if matches!(view, PendingView::Unavailable { .. }) {
                std::process::exit(2);
            }
            Ok(())
        }
        Command::Emergencies => emergencies(&args, &config).await,
        command => {
            if args.snapshot.is_some() {
                bail!("--snapshot only supports the pending and emergencies commands");
            }
            let pool = DatabasePool::connect(&config.database).await?;
            let result = run_database_command(&pool, &args, command, clock.as_ref()).await;
            pool.close().await;

            if let Err(e) = &result {
                error!("Command failed: {:#}", e);
            }
            result
        }
    }
}

/// 生成待处理列表，快照或数据库任一不可用都作为错误返回给视图
async fn pending_worklist(
    args: &Args,
    config: &HmsConfig,
    clock: &dyn Clock,
    order: WorklistOrder,
) -> hms_core::Result<PendingWorklist> {
    let classifier = TriageClassifier::new(config.triage);

    match &args.snapshot {
        Some(path) => {
            let source = SnapshotSource::load(path).await?;
            build_worklist(&source, clock, classifier, order).await
        }
        None => {
            let pool = DatabasePool::connect(&config.database).await?;
            let result = build_worklist(&pool.queries(), clock, classifier, order).await;
            pool.close().await;
            result
        }
    }
}

async fn build_worklist(
    source: &dyn TriageDataSource,
    clock: &dyn Clock,
    classifier: TriageClassifier,
    order: WorklistOrder,
) -> hms_core::Result<PendingWorklist> {
    PendingWorklistService::new(source, clock, classifier).build(order).await
}

async fn emergencies(args: &Args, config: &HmsConfig) -> Result<()> {
    let board = match &args.snapshot {
        Some(path) => {
            let source = SnapshotSource::load(path).await?;
            let patients = source.list_patients().await?;
            EmergencyBoard::from_notes(source.emergency_notes()).with_patient_names(&patients)
        }
        None => {
            let pool = DatabasePool::connect(&config.database).await?;
            let board = emergency_board(&pool.queries()).await;
            pool.close().await;
            board?
        }
    };

    println!("{}", board.summary());
    Ok(())
}

async fn emergency_board(queries: &DatabaseQueries<'_>) -> hms_core::Result<EmergencyBoard> {
    let notes = queries.emergency_notes().await?;
    let patients = queries.list_patients().await?;
    Ok(EmergencyBoard::from_notes(notes).with_patient_names(&patients))
}

/// 校验用户名和口令，并检查角色是否允许执行该命令
async fn sign_in(queries: &DatabaseQueries<'_>, args: &Args, command: &Command) -> Result<Session> {
    let username = args
        .user
        .clone()
        .ok_or_else(|| HmsError::Permission(format!("--user is required to {}", command.action())))?;
    let password = args
        .password
        .clone()
        .or_else(|| std::env::var("HMS_PASSWORD").ok())
        .ok_or_else(|| HmsError::Permission("Password is required".to_string()))?;

    let role = queries
        .authenticate(&username, &password)
        .await?
        .ok_or_else(|| HmsError::Permission("Invalid username or password".to_string()))?;

    if let Some(allowed) = command.required_roles() {
        role.authorize(allowed, command.action())?;
    }

    info!("User {} signed in as {}", username, role);
    Ok(Session { username, role })
}

/// 未显式指定医生ID时，按登录用户名查找医生档案
async fn resolve_doctor(
    queries: &DatabaseQueries<'_>,
    session: &Session,
    doctor_id: Option<i64>,
) -> Result<i64> {
    if let Some(id) = doctor_id {
        return Ok(id);
    }

    let doctor = queries
        .find_doctor_by_first_name(&session.username)
        .await?
        .ok_or_else(|| {
            HmsError::NotFound(format!(
                "No doctor profile for {}; run `hms register-doctor` first",
                session.username
            ))
        })?;
    Ok(doctor.id)
}

async fn run_database_command(
    pool: &DatabasePool,
    args: &Args,
    command: &Command,
    clock: &dyn Clock,
) -> Result<()> {
    let queries = pool.queries();

    if let Command::InitDb {
        admin_user,
        admin_password,
    } = command
    {
        queries.create_tables().await?;
        if let (Some(username), Some(password)) = (admin_user, admin_password) {
            queries.create_user(username, password, UserRole::Admin).await?;
        }
        println!("Database schema ready");
        return Ok(());
    }

    let session = sign_in(&queries, args, command).await?;
    let user = session.username.as_str();
    let department = session.department();

    match command {
        Command::Login => {
            println!("Logged in as {} ({})", user, session.role);
            if session.role == UserRole::Doctor {
                match queries.find_doctor_by_first_name(user).await? {
                    Some(doctor) => println!("Welcome, Dr. {}", doctor.full_name()),
                    None => println!("No doctor profile found; register one with `hms register-doctor`"),
                }
                println!("{}", emergency_board(&queries).await?.summary());
            }
            queries.log_action(user, department, "Logged in").await?;
        }
        Command::CreateUser {
            username,
            new_password,
            role,
        } => {
            queries.create_user(username, new_password, *role).await?;
            queries
                .log_action(user, department, &format!("Created {} user: {}", role, username))
                .await?;
            println!("Created user {}", username);
        }
        Command::Today { doctor } => {
            let doctor_id = resolve_doctor(&queries, &session, *doctor).await?;
            let day = clock.today();
            let patients = queries.patients_treated_by_on(doctor_id, day).await?;
            println!("Total patients treated on {}: {}", day, patients.len());
            for patient in patients {
                println!("Patient ID: {}, Name: {}", patient.id, patient.name);
            }
        }
        Command::History { patient } => {
            let record = queries
                .get_patient(*patient)
                .await?
                .ok_or_else(|| HmsError::NotFound(format!("Patient {} not found", patient)))?;
            let treatments = queries.treatment_history(*patient).await?;
            let notes = queries.emergency_notes_for(*patient).await?;

            for line in PatientHistory::new(record, treatments, notes).render() {
                println!("{}", line);
            }
        }
        Command::RegisterDoctor {
            first_name,
            last_name,
            national_id,
            qualification,
            specialization,
        } => {
            let id = queries
                .register_doctor(&NewDoctor {
                    first_name: first_name.clone().unwrap_or_else(|| user.to_string()),
                    last_name: last_name.clone(),
                    national_id: national_id.clone(),
                    qualification: qualification.clone(),
                    specialization: *specialization,
                })
                .await?;
            queries
                .log_action(user, department, &format!("Registered doctor profile ID: {}", id))
                .await?;
            println!("Registered doctor {}", id);
        }
        Command::RegisterPatient {
            name,
            gender,
            blood_type,
            dob,
        } => {
            let id = queries
                .register_patient(&NewPatient {
                    name: name.clone(),
                    date_of_birth: *dob,
                    gender: *gender,
                    blood_type: *blood_type,
                })
                .await?;
            queries
                .log_action(user, department, &format!("Registered patient ID: {}", id))
                .await?;
            println!("Registered patient {}", id);
        }
        Command::RecordVitals {
            patient,
            bp,
            temp,
            weight,
        } => {
            let vitals = Vitals {
                blood_pressure: bp.clone(),
                temperature: *temp,
                weight: *weight,
            };
            let id = queries.record_vitals(*patient, &vitals).await?;
            queries
                .log_action(user, department, &format!("Recorded vitals for patient ID: {}", patient))
                .await?;
            println!("Recorded treatment {}", id);
        }
        Command::RecordDiagnosis {
            patient,
            doctor,
            symptoms,
            treatment,
        } => {
            let doctor_id = resolve_doctor(&queries, &session, *doctor).await?;
            let id = queries
                .record_diagnosis(&NewDiagnosis {
                    patient_id: *patient,
                    doctor_id,
                    symptoms: symptoms.clone(),
                    treatment: treatment.clone(),
                })
                .await
                .with_context(|| format!("Cannot update diagnosis for patient {}", patient))?;
            queries
                .log_action(
                    user,
                    department,
                    &format!("Updated symptoms/treatment for patient ID: {}", patient),
                )
                .await?;
            println!("Updated treatment {}", id);
        }
        Command::AddNote {
            patient,
            note,
            emergency,
        } => {
            let id = queries
                .add_note(&NewPatientNote {
                    patient_id: *patient,
                    author: user.to_string(),
                    note: note.clone(),
                    emergency: *emergency,
                })
                .await?;
            queries
                .log_action(user, department, &format!("Added note for patient ID: {}", patient))
                .await?;
            println!("Added note {}", id);
        }
        Command::Logs { limit } => {
            for entry in queries.recent_logs(*limit).await? {
                println!(
                    "[{}] {} ({}) - {}",
                    entry.logged_at.format("%Y-%m-%d %H:%M:%S"),
                    entry.user,
                    entry.department,
                    entry.action
                );
            }
        }
        Command::InitDb { .. } | Command::Pending { .. } | Command::Emergencies => {
            unreachable!("handled before sign-in")
        }
    }

    info!("Command completed for user {}", user);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_write_commands_require_matching_role() {
        let vitals = parse(&["hms", "record-vitals", "--patient", "3", "--temp", "37.5"]).command;
        let allowed = vitals.required_roles().unwrap();
        assert!(UserRole::Nurse.authorize(allowed, vitals.action()).is_ok());
        assert!(matches!(
            UserRole::Receptionist.authorize(allowed, vitals.action()),
            Err(HmsError::Permission(_))
        ));

        let diagnosis = parse(&[
            "hms",
            "record-diagnosis",
            "--patient",
            "3",
            "--symptoms",
            "Cough",
            "--treatment",
            "Rest",
        ])
        .command;
        let allowed = diagnosis.required_roles().unwrap();
        assert!(UserRole::Doctor.authorize(allowed, diagnosis.action()).is_ok());
        assert!(UserRole::Nurse.authorize(allowed, diagnosis.action()).is_err());

        let logs = parse(&["hms", "logs"]).command;
        assert!(UserRole::Doctor.authorize(logs.required_roles().unwrap(), logs.action()).is_err());
    }

    #[test]
    fn test_read_only_triage_commands_need_no_login() {
        assert!(parse(&["hms", "pending"]).command.required_roles().is_none());
        assert!(parse(&["hms", "emergencies"]).command.required_roles().is_none());
        assert!(parse(&["hms", "init-db"]).command.required_roles().is_none());

        let login = parse(&["hms", "--user", "nurse1", "login"]).command;
        assert_eq!(login.required_roles().map(<[UserRole]>::len), Some(4));
    }

    #[test]
    fn test_cli_arguments() {
        let args = parse(&[
            "hms",
            "--today",
            "2025-06-10",
            "--user",
            "doctor1",
            "register-doctor",
            "--last-name",
            "Kamanga",
            "--national-id",
            "MW-1234",
            "--qualification",
            "MBBS",
            "--specialization",
            "surgeon",
        ]);
        assert_eq!(args.today, NaiveDate::from_ymd_opt(2025, 6, 10));
        assert_eq!(args.user.as_deref(), Some("doctor1"));
        match args.command {
            Command::RegisterDoctor {
                first_name,
                specialization,
                ..
            } => {
                assert_eq!(first_name, None);
                assert_eq!(specialization, Specialization::Surgeon);
            }
            other => panic!("unexpected command {:?}", other),
        }

        assert!(Args::try_parse_from(["hms", "create-user", "--username", "x"]).is_err());
        assert!(Args::try_parse_from(["hms", "record-diagnosis", "--patient", "1"]).is_err());
    }
}
