use std::fmt;
use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::{AsyncFileTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Serialize;

use crate::calendar::format_date_local;
use crate::error::Error;
use crate::models::{AttendanceStatus, Student};

/// Bulk sends above this are rejected outright.
pub const MAX_BULK_RECIPIENTS: usize = 30;

const CONTACT_ADDRESS: &str = "preconfirmacion@sanpas.es";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AbsenceLabel {
    Catechism,
    Mass,
    Both,
}

impl AbsenceLabel {
    /// `None` when the child made it to both (late counts as there).
    pub fn for_statuses(catechism: AttendanceStatus, mass: AttendanceStatus) -> Option<Self> {
        match (catechism, mass) {
            (AttendanceStatus::Absent, AttendanceStatus::Absent) => Some(AbsenceLabel::Both),
            (AttendanceStatus::Absent, _) => Some(AbsenceLabel::Catechism),
            (_, AttendanceStatus::Absent) => Some(AbsenceLabel::Mass),
            _ => None,
        }
    }

    /// A day without a record is an absence from both.
    pub fn for_student(student: &Student, date: NaiveDate) -> Option<Self> {
        match student.record_on(date) {
            Some(record) => Self::for_statuses(record.catechism, record.mass),
            None => Some(AbsenceLabel::Both),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AbsenceLabel::Catechism => "catequesis",
            AbsenceLabel::Mass => "misa",
            AbsenceLabel::Both => "ni a catequesis ni a misa",
        }
    }
}

impl fmt::Display for AbsenceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl EmailMessage {
    pub fn absence(to: &str, student_name: &str, date: NaiveDate, label: AbsenceLabel) -> Self {
        EmailMessage {
            to: to.to_string(),
            subject: format!(
                "Ausencia registrada - {} - {}",
                student_name,
                format_date_local(date)
            ),
            body: format!(
                "Estimados padres de {student_name},\n\
                 Queríamos informarles de que hoy su hijo/a no ha asistido a {label}.\n\n\
                 Muchas gracias de antemano por su atención,\n\n\
                 Un saludo.\n\n\
                 Sus catequistas.\n\n\
                 NOTA: NO RESPONDA ESTE CORREO ELECTRÓNICO. HA SIDO ENVIADO DE MANERA AUTOMÁTICA. \
                 PARA DUDAS O CONSULTAS, CONTACTE AL SIGUIENTE CORREO ELECTRÓNICO: {CONTACT_ADDRESS}"
            ),
        }
    }
}

#[async_trait]
pub trait Mailer {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkSummary {
    pub sent: usize,
    pub skipped_no_email: usize,
    pub skipped_present_both: usize,
    pub errors: usize,
}

fn parent_address(student: &Student) -> Option<&str> {
    student
        .parent_email
        .as_deref()
        .map(str::trim)
        .filter(|email| !email.is_empty())
}

/// Sends one notice with a label the caller already chose.
pub async fn send_absence<M>(
    mailer: &M,
    student: &Student,
    date: NaiveDate,
    label: AbsenceLabel,
) -> anyhow::Result<()>
where
    M: Mailer + Sync,
{
    let to = parent_address(student)
        .with_context(|| format!("student {} has no parent email", student.id))?;
    mailer
        .send(&EmailMessage::absence(to, &student.name, date, label))
        .await
}

/// Notifies the families of every listed child who missed something on
/// `date`. Individual delivery failures are counted, not propagated.
pub async fn send_bulk<M>(
    mailer: &M,
    students: &[Student],
    date: NaiveDate,
) -> Result<BulkSummary, Error>
where
    M: Mailer + Sync,
{
    if students.len() > MAX_BULK_RECIPIENTS {
        return Err(Error::TooManyRecipients {
            max: MAX_BULK_RECIPIENTS,
            got: students.len(),
        });
    }

    let mut summary = BulkSummary::default();

    for student in students {
        let Some(to) = parent_address(student) else {
            summary.skipped_no_email += 1;
            continue;
        };
        let Some(label) = AbsenceLabel::for_student(student, date) else {
            summary.skipped_present_both += 1;
            continue;
        };

        match mailer
            .send(&EmailMessage::absence(to, &student.name, date, label))
            .await
        {
            Ok(()) => summary.sent += 1,
            Err(err) => {
                tracing::warn!(student_id = %student.id, error = %err, "absence email failed");
                summary.errors += 1;
            }
        }
    }

    tracing::info!(
        sent = summary.sent,
        skipped_no_email = summary.skipped_no_email,
        errors = summary.errors,
        "bulk absence notices done"
    );
    Ok(summary)
}

fn header_value<'a>(name: &str, value: &'a str) -> anyhow::Result<&'a str> {
    if value.contains(['\r', '\n']) {
        anyhow::bail!("line break in {name} header");
    }
    Ok(value)
}

/// Drops each message as an `.eml` file for a local MTA to pick up.
pub struct OutboxMailer {
    pub dir: PathBuf,
    pub from: String,
}

#[async_trait]
impl Mailer for OutboxMailer {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()> {
        let from: Mailbox = header_value("From", &self.from)?
            .parse()
            .with_context(|| format!("invalid sender {}", self.from))?;
        let to: Mailbox = header_value("To", &message.to)?
            .parse()
            .with_context(|| format!("invalid recipient {}", message.to))?;
        let email = Message::builder()
            .from(from)
            .to(to)
            .subject(header_value("Subject", &message.subject)?)
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create outbox {}", self.dir.display()))?;
        let id = AsyncFileTransport::<Tokio1Executor>::new(&self.dir)
            .send(email)
            .await
            .with_context(|| format!("failed to write to outbox {}", self.dir.display()))?;
        tracing::debug!(id = %id, to = %message.to, "queued email");
        Ok(())
    }
}
