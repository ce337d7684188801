use std::collections::HashMap;

use chrono::{Datelike, Month, NaiveDate};
use serde::Serialize;

use crate::calendar::academic_year_range;
use crate::models::Student;
use crate::rates::record_weight;

const ACADEMIC_MONTHS: [Month; 12] = [
    Month::September,
    Month::October,
    Month::November,
    Month::December,
    Month::January,
    Month::February,
    Month::March,
    Month::April,
    Month::May,
    Month::June,
    Month::July,
    Month::August,
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrendPoint {
    #[serde(skip)]
    pub month: Month,
    pub label: &'static str,
    pub participation: u32,
}

impl TrendPoint {
    fn new(month: Month, participation: u32) -> Self {
        TrendPoint {
            month,
            label: month_label(month),
            participation,
        }
    }
}

pub fn month_label(month: Month) -> &'static str {
    match month {
        Month::January => "Ene",
        Month::February => "Feb",
        Month::March => "Mar",
        Month::April => "Abr",
        Month::May => "May",
        Month::June => "Jun",
        Month::July => "Jul",
        Month::August => "Ago",
        Month::September => "Sep",
        Month::October => "Oct",
        Month::November => "Nov",
        Month::December => "Dic",
    }
}

fn month_of(date: NaiveDate) -> Month {
    Month::try_from(date.month() as u8).unwrap_or(Month::January)
}

fn fallback(today: NaiveDate) -> Vec<TrendPoint> {
    vec![
        TrendPoint::new(Month::September, 0),
        TrendPoint::new(month_of(today), 0),
    ]
}

#[derive(Default)]
struct MonthBucket {
    total_weight: f64,
    days: usize,
}

/// Cohort participation per month, Sep up to the month of `today`. Months
/// without class days are left out; an empty cohort or series gets a flat
/// two-point placeholder.
pub fn monthly_participation(
    students: &[Student],
    class_days: &[NaiveDate],
    today: NaiveDate,
) -> Vec<TrendPoint> {
    if students.is_empty() {
        return fallback(today);
    }

    let past_days = academic_year_range(today).past_days(class_days, today);
    let mut buckets: HashMap<Month, MonthBucket> = HashMap::new();

    for day in past_days {
        let day_weight: f64 = students
            .iter()
            .map(|student| record_weight(student.record_on(day)))
            .sum();

        let bucket = buckets.entry(month_of(day)).or_default();
        bucket.total_weight += day_weight;
        bucket.days += 1;
    }

    let current = month_of(today);
    let mut points = Vec::new();

    for month in ACADEMIC_MONTHS {
        if let Some(bucket) = buckets.get(&month).filter(|bucket| bucket.days > 0) {
            let possible = (students.len() * bucket.days) as f64;
            let average = (bucket.total_weight / possible * 100.0).round();
            points.push(TrendPoint::new(month, average.clamp(0.0, 100.0) as u32));
        }

        if month == current {
            break;
        }
    }

    if points.is_empty() {
        fallback(today)
    } else {
        points
    }
}
