use std::io::Write;

use chrono::NaiveDate;
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

use crate::calendar::{academic_year_range, format_date_local};
use crate::models::{AttendanceStatus, ParishEvent, Snapshot};
use crate::rates::{catechist_rate_on, student_rate_on};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Students,
    Catechists,
}

impl ExportKind {
    fn file_stem(self) -> &'static str {
        match self {
            ExportKind::Students => "catecumenos",
            ExportKind::Catechists => "catequistas",
        }
    }
}

pub fn export_filename(kind: ExportKind, today: NaiveDate) -> String {
    format!("asistencia_{}_{}.csv", kind.file_stem(), format_date_local(today))
}

/// `P`resent, `T`arde, anything else (missing included) `A`.
pub fn status_label(status: Option<AttendanceStatus>) -> &'static str {
    match status {
        Some(AttendanceStatus::Present) => "P",
        Some(AttendanceStatus::Late) => "T",
        _ => "A",
    }
}

/// Strips combining diacritics and swaps commas for semicolons so a value
/// never splits a column.
pub fn sanitize(value: &str) -> String {
    value
        .nfd()
        .filter(|c| !('\u{0300}'..='\u{036f}').contains(c))
        .map(|c| if c == ',' { ';' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

fn class_day_headers(days: &[NaiveDate]) -> Vec<String> {
    days.iter()
        .flat_map(|day| {
            let day = format_date_local(*day);
            [format!("{day} (Cat)"), format!("{day} (Misa)")]
        })
        .collect()
}

fn past_events<'a>(events: &'a [ParishEvent], today: NaiveDate) -> Vec<&'a ParishEvent> {
    let range = academic_year_range(today);
    let mut past: Vec<&ParishEvent> = events
        .iter()
        .filter(|event| range.is_past(event.date, today))
        .collect();
    past.sort_by(|a, b| a.date.cmp(&b.date));
    past
}

/// One row per child in `group_id` (or everyone), with catechism and mass
/// letters for every class day held so far this year.
pub fn student_table(snapshot: &Snapshot, group_id: Option<Uuid>, today: NaiveDate) -> CsvTable {
    let days = academic_year_range(today).past_days(&snapshot.class_days, today);

    let mut headers: Vec<String> = ["Nombre", "Grupo", "Colegio", "Asistencia Real %"]
        .into_iter()
        .map(String::from)
        .collect();
    headers.extend(class_day_headers(&days));

    let rows = snapshot
        .students_in(group_id)
        .iter()
        .map(|student| {
            let rate = student_rate_on(student, &snapshot.class_days, today);
            let mut row = vec![
                sanitize(&student.name),
                sanitize(snapshot.group_name(Some(student.group_id))),
                sanitize(&student.school),
                format!("{rate}%"),
            ];
            for day in &days {
                let record = student.record_on(*day);
                row.push(status_label(record.map(|r| r.catechism)).to_string());
                row.push(status_label(record.map(|r| r.mass)).to_string());
            }
            row
        })
        .collect();

    CsvTable { headers, rows }
}

/// One row per catechist: class-day letter pairs, then one letter per past
/// event.
pub fn staff_table(snapshot: &Snapshot, today: NaiveDate) -> CsvTable {
    let days = academic_year_range(today).past_days(&snapshot.class_days, today);
    let events = past_events(&snapshot.events, today);

    let mut headers: Vec<String> = ["Nombre", "Grupo", "Asistencia Total %", "Email"]
        .into_iter()
        .map(String::from)
        .collect();
    headers.extend(class_day_headers(&days));
    headers.extend(events.iter().map(|event| {
        format!(
            "{} ({})",
            format_date_local(event.date),
            sanitize(&event.title)
        )
    }));

    let rows = snapshot
        .catechists()
        .iter()
        .map(|user| {
            let rate = catechist_rate_on(user, &snapshot.class_days, &snapshot.events, today);
            let mut row = vec![
                sanitize(&user.name),
                sanitize(snapshot.group_name(user.assigned_group_id)),
                format!("{rate}%"),
                sanitize(&user.email),
            ];
            for day in &days {
                let record = user.class_record_on(*day);
                row.push(status_label(record.map(|(catechism, _)| catechism)).to_string());
                row.push(status_label(record.map(|(_, mass)| mass)).to_string());
            }
            for event in &events {
                row.push(status_label(user.event_status(event.id)).to_string());
            }
            row
        })
        .collect();

    CsvTable { headers, rows }
}

pub fn write_csv<W: Write>(table: &CsvTable, writer: W) -> csv::Result<()> {
    let mut writer = csv::WriterBuilder::new().flexible(false).from_writer(writer);
    writer.write_record(&table.headers)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}
