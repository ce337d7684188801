use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{
    AttendanceRecord, AttendanceStatus, CatechistAttendanceKind, CatechistAttendanceRecord, Group,
    ParishEvent, Snapshot, Student, User, UserRole,
};
use crate::monthly::{MonthlyReportKey, ReportPayload, ReportScope, ReportStore, ReportType, StoredReport};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn status(row: &sqlx::postgres::PgRow, column: &str) -> anyhow::Result<AttendanceStatus> {
    let value: String = row.try_get(column)?;
    Ok(value.parse()?)
}

/// A NULL sub-status on a staff row means nobody marked it, which counts as
/// absent.
fn optional_status(value: Option<&str>) -> anyhow::Result<AttendanceStatus> {
    match value {
        Some(value) => Ok(value.parse()?),
        None => Ok(AttendanceStatus::Absent),
    }
}

fn class_kind(
    catechism: Option<&str>,
    mass: Option<&str>,
) -> anyhow::Result<CatechistAttendanceKind> {
    Ok(CatechistAttendanceKind::Class {
        catechism: optional_status(catechism)?,
        mass: optional_status(mass)?,
    })
}

fn event_kind(status: Option<&str>, ref_id: Option<Uuid>) -> anyhow::Result<CatechistAttendanceKind> {
    Ok(CatechistAttendanceKind::Event {
        status: optional_status(status)?,
        ref_id: ref_id.context("event attendance without ref_id")?,
    })
}

fn role(value: &str) -> anyhow::Result<UserRole> {
    match value {
        "catechist" => Ok(UserRole::Catechist),
        "coordinator" => Ok(UserRole::Coordinator),
        other => anyhow::bail!("unknown profile role {other}"),
    }
}

/// Reads every collection the aggregators need and joins attendance rows
/// onto their owners.
pub async fn load_snapshot(pool: &PgPool) -> anyhow::Result<Snapshot> {
    let groups = sqlx::query("SELECT id, name FROM groups ORDER BY name")
        .fetch_all(pool)
        .await
        .context("failed to load groups")?
        .into_iter()
        .map(|row| -> anyhow::Result<Group> {
            Ok(Group {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut student_history: HashMap<Uuid, Vec<AttendanceRecord>> = HashMap::new();
    for row in sqlx::query(
        "SELECT student_id, date, catechism, mass, note FROM student_attendance ORDER BY date",
    )
    .fetch_all(pool)
    .await
    .context("failed to load student attendance")?
    {
        let student_id: Uuid = row.try_get("student_id")?;
        student_history.entry(student_id).or_default().push(AttendanceRecord {
            date: row.try_get("date")?,
            catechism: status(&row, "catechism")?,
            mass: status(&row, "mass")?,
            note: row.try_get("note")?,
        });
    }

    let students = sqlx::query(
        "SELECT id, name, email, parent_email, school, birth_date, group_id \
         FROM students ORDER BY name",
    )
    .fetch_all(pool)
    .await
    .context("failed to load students")?
    .into_iter()
    .map(|row| -> anyhow::Result<Student> {
        let id: Uuid = row.try_get("id")?;
        Ok(Student {
            id,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            parent_email: row.try_get("parent_email")?,
            school: row.try_get::<Option<String>, _>("school")?.unwrap_or_default(),
            birth_date: row.try_get("birth_date")?,
            group_id: row.try_get("group_id")?,
            attendance_history: student_history.remove(&id).unwrap_or_default(),
        })
    })
    .collect::<anyhow::Result<Vec<_>>>()?;

    let mut staff_history: HashMap<Uuid, Vec<CatechistAttendanceRecord>> = HashMap::new();
    for row in sqlx::query(
        "SELECT profile_id, date, type, ref_id, catechism, mass, status \
         FROM catechist_attendance ORDER BY date",
    )
    .fetch_all(pool)
    .await
    .context("failed to load catechist attendance")?
    {
        let profile_id: Uuid = row.try_get("profile_id")?;
        let kind: String = row.try_get("type")?;
        let catechism: Option<String> = row.try_get("catechism")?;
        let mass: Option<String> = row.try_get("mass")?;
        let status: Option<String> = row.try_get("status")?;
        let kind = match kind.as_str() {
            "class" => class_kind(catechism.as_deref(), mass.as_deref())?,
            "event" => event_kind(status.as_deref(), row.try_get("ref_id")?)?,
            other => anyhow::bail!("unknown catechist attendance type {other}"),
        };
        staff_history.entry(profile_id).or_default().push(CatechistAttendanceRecord {
            date: row.try_get("date")?,
            kind,
        });
    }

    let users = sqlx::query(
        "SELECT p.id, p.name, p.email, p.role, p.birth_date, \
         (SELECT gc.group_id FROM group_catechist gc WHERE gc.profile_id = p.id LIMIT 1) \
         AS assigned_group_id \
         FROM profiles p ORDER BY p.name",
    )
    .fetch_all(pool)
    .await
    .context("failed to load profiles")?
    .into_iter()
    .map(|row| -> anyhow::Result<User> {
        let id: Uuid = row.try_get("id")?;
        let role_name: String = row.try_get("role")?;
        Ok(User {
            id,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            role: role(&role_name)?,
            assigned_group_id: row.try_get("assigned_group_id")?,
            birth_date: row.try_get("birth_date")?,
            attendance_history: staff_history.remove(&id).unwrap_or_default(),
        })
    })
    .collect::<anyhow::Result<Vec<_>>>()?;

    let events = sqlx::query("SELECT id, title, date, description FROM parish_events ORDER BY date")
        .fetch_all(pool)
        .await
        .context("failed to load parish events")?
        .into_iter()
        .map(|row| -> anyhow::Result<ParishEvent> {
            Ok(ParishEvent {
                id: row.try_get("id")?,
                title: row.try_get("title")?,
                date: row.try_get("date")?,
                description: row.try_get("description")?,
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let class_days = sqlx::query("SELECT date FROM class_days ORDER BY date")
        .fetch_all(pool)
        .await
        .context("failed to load class days")?
        .into_iter()
        .map(|row| row.try_get::<NaiveDate, _>("date"))
        .collect::<Result<Vec<_>, _>>()?;

    tracing::debug!(
        students = students.len(),
        users = users.len(),
        class_days = class_days.len(),
        "snapshot loaded"
    );

    Ok(Snapshot {
        students,
        users,
        groups,
        events,
        class_days,
    })
}

pub async fn upsert_student_attendance(
    pool: &PgPool,
    student_id: Uuid,
    record: &AttendanceRecord,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO student_attendance (student_id, date, catechism, mass, note)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (student_id, date) DO UPDATE
        SET catechism = EXCLUDED.catechism, mass = EXCLUDED.mass, note = EXCLUDED.note
        "#,
    )
    .bind(student_id)
    .bind(record.date)
    .bind(record.catechism.as_str())
    .bind(record.mass.as_str())
    .bind(record.note.as_deref())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn upsert_catechist_attendance(
    pool: &PgPool,
    profile_id: Uuid,
    record: &CatechistAttendanceRecord,
) -> anyhow::Result<()> {
    let (kind, ref_id, catechism, mass, status) = match record.kind {
        CatechistAttendanceKind::Class { catechism, mass } => {
            ("class", None, Some(catechism.as_str()), Some(mass.as_str()), None)
        }
        CatechistAttendanceKind::Event { status, ref_id } => {
            ("event", Some(ref_id), None, None, Some(status.as_str()))
        }
    };

    sqlx::query(
        r#"
        INSERT INTO catechist_attendance (profile_id, date, type, ref_id, catechism, mass, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (profile_id, date, type, ref_id) DO UPDATE
        SET catechism = EXCLUDED.catechism, mass = EXCLUDED.mass, status = EXCLUDED.status
        "#,
    )
    .bind(profile_id)
    .bind(record.date)
    .bind(kind)
    .bind(ref_id)
    .bind(catechism)
    .bind(mass)
    .bind(status)
    .execute(pool)
    .await?;
    Ok(())
}

/// Loads student attendance rows from a CSV with columns
/// `student_id,date,catechism,mass,note`.
pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        student_id: Uuid,
        date: NaiveDate,
        catechism: AttendanceStatus,
        mass: AttendanceStatus,
        note: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut upserted = 0usize;

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("invalid row {}", line + 2))?;
        let record = AttendanceRecord {
            date: row.date,
            catechism: row.catechism,
            mass: row.mass,
            note: row.note.filter(|note| !note.trim().is_empty()),
        };
        upsert_student_attendance(pool, row.student_id, &record).await?;
        upserted += 1;
    }

    Ok(upserted)
}

pub struct PgReportStore {
    pool: PgPool,
}

impl PgReportStore {
    pub fn new(pool: PgPool) -> Self {
        PgReportStore { pool }
    }
}

fn stored_report(row: &sqlx::postgres::PgRow) -> anyhow::Result<StoredReport> {
    let scope: String = row.try_get("scope")?;
    let report_type: String = row.try_get("report_type")?;
    let payload: Json<ReportPayload> = row.try_get("payload")?;
    let generated_at: DateTime<Utc> = row.try_get("generated_at")?;

    Ok(StoredReport {
        key: MonthlyReportKey {
            month: row.try_get("month")?,
            scope: ReportScope::from_parts(&scope, row.try_get("scope_id")?)?,
            report_type: match report_type.as_str() {
                "students" => ReportType::Students,
                "catechists" => ReportType::Catechists,
                other => anyhow::bail!("unknown report type {other}"),
            },
        },
        generated_at,
        payload: payload.0,
    })
}

#[async_trait]
impl ReportStore for PgReportStore {
    async fn find(&self, key: &MonthlyReportKey) -> anyhow::Result<Option<StoredReport>> {
        let row = sqlx::query(
            r#"
            SELECT month, scope, scope_id, report_type, generated_at, payload
            FROM monthly_reports
            WHERE month = $1 AND scope = $2 AND scope_id IS NOT DISTINCT FROM $3
              AND report_type = $4
            "#,
        )
        .bind(&key.month)
        .bind(key.scope.as_str())
        .bind(key.scope.scope_id())
        .bind(key.report_type.as_str())
        .fetch_optional(&self.pool)
        .await
        .context("failed to look up monthly report")?;

        row.as_ref().map(stored_report).transpose()
    }

    async fn insert(&self, report: &StoredReport) -> anyhow::Result<Option<StoredReport>> {
        let row = sqlx::query(
            r#"
            INSERT INTO monthly_reports (id, month, scope, scope_id, report_type, generated_at, payload)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT DO NOTHING
            RETURNING month, scope, scope_id, report_type, generated_at, payload
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&report.key.month)
        .bind(report.key.scope.as_str())
        .bind(report.key.scope.scope_id())
        .bind(report.key.report_type.as_str())
        .bind(report.generated_at)
        .bind(Json(&report.payload))
        .fetch_optional(&self.pool)
        .await
        .context("failed to store monthly report")?;

        row.as_ref().map(stored_report).transpose()
    }
}
