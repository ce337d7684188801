use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Late => "late",
        }
    }

    /// Present or late both count as having shown up.
    pub fn attended(self) -> bool {
        matches!(self, AttendanceStatus::Present | AttendanceStatus::Late)
    }
}

impl std::str::FromStr for AttendanceStatus {
    type Err = crate::error::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "present" => Ok(AttendanceStatus::Present),
            "absent" => Ok(AttendanceStatus::Absent),
            "late" => Ok(AttendanceStatus::Late),
            other => Err(crate::error::Error::InvalidStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Catechist,
    Coordinator,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub date: NaiveDate,
    pub catechism: AttendanceStatus,
    pub mass: AttendanceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// A staff attendance entry. Class days carry both sub-scores, events a
/// single status tied to the event id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatechistAttendanceRecord {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub kind: CatechistAttendanceKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CatechistAttendanceKind {
    Class {
        catechism: AttendanceStatus,
        mass: AttendanceStatus,
    },
    Event {
        status: AttendanceStatus,
        ref_id: Uuid,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub parent_email: Option<String>,
    #[serde(default)]
    pub school: String,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    pub group_id: Uuid,
    #[serde(default)]
    pub attendance_history: Vec<AttendanceRecord>,
}

impl Student {
    pub fn record_on(&self, date: NaiveDate) -> Option<&AttendanceRecord> {
        self.attendance_history.iter().find(|record| record.date == date)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    #[serde(default)]
    pub assigned_group_id: Option<Uuid>,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub attendance_history: Vec<CatechistAttendanceRecord>,
}

impl User {
    /// Catechism and mass statuses of the class-day entry for `date`.
    pub fn class_record_on(&self, date: NaiveDate) -> Option<(AttendanceStatus, AttendanceStatus)> {
        self.attendance_history
            .iter()
            .filter(|record| record.date == date)
            .find_map(|record| match record.kind {
                CatechistAttendanceKind::Class { catechism, mass } => Some((catechism, mass)),
                CatechistAttendanceKind::Event { .. } => None,
            })
    }

    pub fn event_status(&self, event_id: Uuid) -> Option<AttendanceStatus> {
        self.attendance_history
            .iter()
            .find_map(|record| match record.kind {
                CatechistAttendanceKind::Event { status, ref_id } if ref_id == event_id => {
                    Some(status)
                }
                _ => None,
            })
    }

    pub fn is_catechist(&self) -> bool {
        self.role == UserRole::Catechist
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParishEvent {
    pub id: Uuid,
    pub title: String,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Everything the aggregators read, as loaded from persistence or a JSON dump.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub students: Vec<Student>,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub events: Vec<ParishEvent>,
    #[serde(default)]
    pub class_days: Vec<NaiveDate>,
}

impl Snapshot {
    pub fn group_name(&self, group_id: Option<Uuid>) -> &str {
        group_id
            .and_then(|id| self.groups.iter().find(|group| group.id == id))
            .map(|group| group.name.as_str())
            .unwrap_or("Sin Grupo")
    }

    pub fn students_in(&self, group_id: Option<Uuid>) -> Vec<Student> {
        match group_id {
            Some(id) => self
                .students
                .iter()
                .filter(|student| student.group_id == id)
                .cloned()
                .collect(),
            None => self.students.clone(),
        }
    }

    pub fn catechists(&self) -> Vec<User> {
        self.users.iter().filter(|user| user.is_catechist()).cloned().collect()
    }
}
