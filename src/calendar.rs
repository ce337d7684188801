use chrono::{Datelike, Local, NaiveDate};
use serde::Serialize;

use crate::error::Error;

/// Renders the calendar date as `YYYY-MM-DD`. Callers convert instants with
/// `Local` first so the date never shifts to UTC.
pub fn format_date_local(date: NaiveDate) -> String {
    format!("{:04}-{:02}-{:02}", date.year(), date.month(), date.day())
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub fn parse_date(value: &str) -> Result<NaiveDate, Error> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|source| Error::InvalidDate {
        value: value.to_string(),
        source,
    })
}

/// `YYYY-MM` key used to lock monthly reports.
pub fn month_key(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

/// Sep 1 through Aug 31, both inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AcademicYearRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl AcademicYearRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Dates inside the range that are not after `today`, sorted and
    /// de-duplicated.
    pub fn past_days(&self, days: &[NaiveDate], today: NaiveDate) -> Vec<NaiveDate> {
        let mut past: Vec<NaiveDate> = days
            .iter()
            .copied()
            .filter(|day| self.contains(*day) && *day <= today)
            .collect();
        past.sort();
        past.dedup();
        past
    }

    pub fn is_past(&self, date: NaiveDate, today: NaiveDate) -> bool {
        self.contains(date) && date <= today
    }
}

pub fn academic_year_range(reference: NaiveDate) -> AcademicYearRange {
    let start_year = if reference.month() >= 9 {
        reference.year()
    } else {
        reference.year() - 1
    };

    AcademicYearRange {
        start: ymd(start_year, 9, 1),
        end: ymd(start_year + 1, 8, 31),
    }
}

pub fn academic_year_range_str(reference: &str) -> Result<AcademicYearRange, Error> {
    parse_date(reference).map(academic_year_range)
}

fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    // Sep 1 and Aug 31 exist in every year chrono can represent here.
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(value: &str) -> NaiveDate {
        parse_date(value).unwrap()
    }

    #[test]
    fn formats_with_zero_padding() {
        assert_eq!(format_date_local(date("2025-03-07")), "2025-03-07");
    }

    #[test]
    fn september_starts_a_new_year() {
        let range = academic_year_range_str("2024-09-01").unwrap();
        assert_eq!(range.start, date("2024-09-01"));
        assert_eq!(range.end, date("2025-08-31"));
    }

    #[test]
    fn august_belongs_to_previous_year() {
        let range = academic_year_range_str("2024-08-31").unwrap();
        assert_eq!(range.start, date("2023-09-01"));
        assert_eq!(range.end, date("2024-08-31"));
    }

    #[test]
    fn january_belongs_to_previous_year() {
        let range = academic_year_range(date("2025-01-15"));
        assert_eq!(range.start, date("2024-09-01"));
    }

    #[test]
    fn past_days_excludes_future_and_other_years() {
        let range = academic_year_range(date("2024-11-10"));
        let days = vec![
            date("2024-11-15"),
            date("2024-10-05"),
            date("2024-06-01"),
            date("2024-11-10"),
            date("2024-10-05"),
        ];

        let past = range.past_days(&days, date("2024-11-10"));
        assert_eq!(past, vec![date("2024-10-05"), date("2024-11-10")]);
    }

    #[test]
    fn rejects_malformed_dates() {
        assert!(matches!(
            parse_date("2024/09/01"),
            Err(Error::InvalidDate { .. })
        ));
    }

    #[test]
    fn month_key_is_year_and_month() {
        assert_eq!(month_key(date("2025-02-28")), "2025-02");
    }
}
