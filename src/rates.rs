use chrono::NaiveDate;

use crate::calendar::{self, academic_year_range};
use crate::models::{AttendanceRecord, AttendanceStatus, ParishEvent, Student, User};

/// Rates below this flag a child as at risk of dropping out.
pub const AT_RISK_THRESHOLD: u32 = 60;

const CATECHISM_WEIGHT: f64 = 0.6;
const MASS_WEIGHT: f64 = 0.4;

fn component_weight(status: Option<AttendanceStatus>, full: f64) -> f64 {
    match status {
        Some(AttendanceStatus::Present) => full,
        Some(AttendanceStatus::Late) => full / 2.0,
        Some(AttendanceStatus::Absent) | None => 0.0,
    }
}

/// Score in `[0, 1]` for one class day: catechism counts 0.6, mass 0.4, and
/// arriving late earns half of either.
pub fn attendance_weight(
    catechism: Option<AttendanceStatus>,
    mass: Option<AttendanceStatus>,
) -> f64 {
    component_weight(catechism, CATECHISM_WEIGHT) + component_weight(mass, MASS_WEIGHT)
}

pub fn record_weight(record: Option<&AttendanceRecord>) -> f64 {
    record
        .map(|record| attendance_weight(Some(record.catechism), Some(record.mass)))
        .unwrap_or(0.0)
}

fn to_percent(earned: f64, possible: usize) -> u32 {
    let rate = (earned / possible as f64 * 100.0).round();
    rate.clamp(0.0, 100.0) as u32
}

pub fn student_rate(student: &Student, class_days: &[NaiveDate]) -> u32 {
    student_rate_on(student, class_days, calendar::today())
}

/// Weighted attendance over this academic year's class days up to `today`.
/// A day without a record scores like an absence; no days yet means 100.
pub fn student_rate_on(student: &Student, class_days: &[NaiveDate], today: NaiveDate) -> u32 {
    let relevant = academic_year_range(today).past_days(class_days, today);
    if relevant.is_empty() {
        return 100;
    }

    let earned: f64 = relevant
        .iter()
        .map(|day| record_weight(student.record_on(*day)))
        .sum();

    to_percent(earned, relevant.len())
}

pub fn catechist_rate(user: &User, class_days: &[NaiveDate], events: &[ParishEvent]) -> u32 {
    catechist_rate_on(user, class_days, events, calendar::today())
}

/// Class days score like a child's (0..=1 each); past events are binary and
/// only `present` earns the point. Both share one denominator.
pub fn catechist_rate_on(
    user: &User,
    class_days: &[NaiveDate],
    events: &[ParishEvent],
    today: NaiveDate,
) -> u32 {
    let range = academic_year_range(today);
    let past_class_days = range.past_days(class_days, today);
    let past_events: Vec<&ParishEvent> = events
        .iter()
        .filter(|event| range.is_past(event.date, today))
        .collect();

    let total = past_class_days.len() + past_events.len();
    if total == 0 {
        return 100;
    }

    let class_points: f64 = past_class_days
        .iter()
        .map(|day| {
            user.class_record_on(*day)
                .map(|(catechism, mass)| attendance_weight(Some(catechism), Some(mass)))
                .unwrap_or(0.0)
        })
        .sum();

    let event_points = past_events
        .iter()
        .filter(|event| user.event_status(event.id) == Some(AttendanceStatus::Present))
        .count() as f64;

    to_percent(class_points + event_points, total)
}

pub fn is_at_risk(rate: u32) -> bool {
    rate < AT_RISK_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CatechistAttendanceKind, CatechistAttendanceRecord, UserRole};
    use uuid::Uuid;

    use AttendanceStatus::{Absent, Late, Present};

    fn date(value: &str) -> NaiveDate {
        calendar::parse_date(value).unwrap()
    }

    fn student(history: Vec<(&str, AttendanceStatus, AttendanceStatus)>) -> Student {
        Student {
            id: Uuid::new_v4(),
            name: "Lucía Gómez".to_string(),
            email: None,
            parent_email: Some("familia@example.com".to_string()),
            school: "San Pascual".to_string(),
            birth_date: None,
            group_id: Uuid::new_v4(),
            attendance_history: history
                .into_iter()
                .map(|(day, catechism, mass)| AttendanceRecord {
                    date: date(day),
                    catechism,
                    mass,
                    note: None,
                })
                .collect(),
        }
    }

    fn catechist(history: Vec<CatechistAttendanceRecord>) -> User {
        User {
            id: Uuid::new_v4(),
            name: "Pablo Ruiz".to_string(),
            email: "pablo@example.com".to_string(),
            role: UserRole::Catechist,
            assigned_group_id: None,
            birth_date: None,
            attendance_history: history,
        }
    }

    fn event(day: &str) -> ParishEvent {
        ParishEvent {
            id: Uuid::new_v4(),
            title: "Convivencia".to_string(),
            date: date(day),
            description: None,
        }
    }

    #[test]
    fn weights_follow_sixty_forty_split() {
        assert_eq!(attendance_weight(Some(Present), Some(Present)), 1.0);
        assert_eq!(attendance_weight(Some(Late), Some(Late)), 0.5);
        assert_eq!(attendance_weight(Some(Absent), Some(Absent)), 0.0);
        assert!((attendance_weight(Some(Present), Some(Absent)) - 0.6).abs() < 1e-9);
        assert!((attendance_weight(None, Some(Late)) - 0.2).abs() < 1e-9);
    }

    #[test]
    fn weights_stay_within_unit_interval() {
        let options = [None, Some(Present), Some(Late), Some(Absent)];
        for catechism in options {
            for mass in options {
                let weight = attendance_weight(catechism, mass);
                assert!((0.0..=1.0).contains(&weight));
            }
        }
    }

    #[test]
    fn no_class_days_means_full_rate() {
        let child = student(vec![]);
        assert_eq!(student_rate_on(&child, &[], date("2024-11-10")), 100);
    }

    #[test]
    fn unregistered_day_counts_as_absence() {
        let child = student(vec![("2024-10-05", Present, Present)]);
        let days = [date("2024-10-05"), date("2024-10-12")];
        assert_eq!(student_rate_on(&child, &days, date("2024-11-10")), 50);
    }

    #[test]
    fn future_and_previous_year_days_are_ignored() {
        let child = student(vec![("2024-10-05", Late, Present)]);
        let days = [date("2024-05-10"), date("2024-10-05"), date("2024-12-01")];
        // 0.3 + 0.4 on the only counted day.
        assert_eq!(student_rate_on(&child, &days, date("2024-11-10")), 70);
    }

    #[test]
    fn student_rate_is_idempotent() {
        let child = student(vec![("2024-10-05", Present, Late)]);
        let days = [date("2024-10-05"), date("2024-10-19")];
        let today = date("2024-11-10");
        assert_eq!(
            student_rate_on(&child, &days, today),
            student_rate_on(&child, &days, today)
        );
    }

    #[test]
    fn catechist_without_occurrences_has_full_rate() {
        let user = catechist(vec![]);
        assert_eq!(catechist_rate_on(&user, &[], &[], date("2024-11-10")), 100);
    }

    #[test]
    fn events_are_binary() {
        let first = event("2024-10-20");
        let second = event("2024-10-27");
        let user = catechist(vec![
            CatechistAttendanceRecord {
                date: date("2024-10-05"),
                kind: CatechistAttendanceKind::Class {
                    catechism: Present,
                    mass: Present,
                },
            },
            CatechistAttendanceRecord {
                date: first.date,
                kind: CatechistAttendanceKind::Event {
                    status: Present,
                    ref_id: first.id,
                },
            },
        ]);
        let days = [date("2024-10-05")];
        let today = date("2024-11-10");

        // One full class day plus one of two events.
        assert_eq!(
            catechist_rate_on(&user, &days, &[first.clone(), second.clone()], today),
            67
        );

        let late = catechist(vec![
            CatechistAttendanceRecord {
                date: date("2024-10-05"),
                kind: CatechistAttendanceKind::Class {
                    catechism: Present,
                    mass: Present,
                },
            },
            CatechistAttendanceRecord {
                date: first.date,
                kind: CatechistAttendanceKind::Event {
                    status: Late,
                    ref_id: first.id,
                },
            },
        ]);
        assert_eq!(catechist_rate_on(&late, &days, &[first, second], today), 33);
    }

    #[test]
    fn future_events_do_not_count() {
        let upcoming = event("2024-12-20");
        let user = catechist(vec![]);
        assert_eq!(
            catechist_rate_on(&user, &[], &[upcoming], date("2024-11-10")),
            100
        );
    }

    #[test]
    fn clock_reading_rates_match_today() {
        let today = calendar::today();
        let child = student(vec![]);
        let user = catechist(vec![]);
        let days = [today, today - chrono::Days::new(7)];

        assert_eq!(student_rate(&child, &[]), 100);
        assert_eq!(catechist_rate(&user, &[], &[]), 100);
        assert_eq!(student_rate(&child, &days), student_rate_on(&child, &days, today));
        assert_eq!(
            catechist_rate(&user, &days, &[]),
            catechist_rate_on(&user, &days, &[], today)
        );
    }

    #[test]
    fn at_risk_below_sixty() {
        assert!(is_at_risk(59));
        assert!(!is_at_risk(60));
    }
}
