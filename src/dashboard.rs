use chrono::NaiveDate;
use serde::Serialize;

use crate::models::{ParishEvent, Student};
use crate::rates::{is_at_risk, student_rate_on};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub total: usize,
    pub attended_catechism: usize,
    pub attended_mass: usize,
    pub at_risk: usize,
}

/// Headline counters for `today`: how many came (late included) and how many
/// children sit under the at-risk threshold.
pub fn dashboard_stats(
    students: &[Student],
    class_days: &[NaiveDate],
    today: NaiveDate,
) -> DashboardStats {
    let todays: Vec<_> = students
        .iter()
        .filter_map(|student| student.record_on(today))
        .collect();

    DashboardStats {
        total: students.len(),
        attended_catechism: todays.iter().filter(|r| r.catechism.attended()).count(),
        attended_mass: todays.iter().filter(|r| r.mass.attended()).count(),
        at_risk: students
            .iter()
            .filter(|student| is_at_risk(student_rate_on(student, class_days, today)))
            .count(),
    }
}

pub fn upcoming_events(events: &[ParishEvent], today: NaiveDate) -> Vec<&ParishEvent> {
    let mut upcoming: Vec<&ParishEvent> =
        events.iter().filter(|event| event.date >= today).collect();
    upcoming.sort_by(|a, b| a.date.cmp(&b.date));
    upcoming
}
