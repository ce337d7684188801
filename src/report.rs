use std::fmt::Write;

use chrono::NaiveDate;
use serde::Serialize;

use crate::calendar::{academic_year_range, format_date_local};
use crate::dashboard::{dashboard_stats, upcoming_events};
use crate::models::{AttendanceStatus, Snapshot, Student, User};
use crate::rates::{catechist_rate_on, is_at_risk, student_rate_on};
use crate::trend::monthly_participation;

pub const PROMPT_CHAR_BUDGET: usize = 14_000;
const MIN_RANKED_DAYS: usize = 3;
const WORST_STUDENTS: usize = 12;
const BEST_STUDENTS: usize = 8;
const LOWEST_CATECHISTS: usize = 10;
const HIGHEST_CATECHISTS: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentSummary {
    pub name: String,
    pub school: String,
    pub rate: u32,
    pub recorded_days: usize,
    pub catechism_present: usize,
    pub mass_present: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatechistSummary {
    pub name: String,
    pub rate: u32,
    pub attended: usize,
    pub possible: usize,
}

pub fn summarize_students(
    students: &[Student],
    class_days: &[NaiveDate],
    today: NaiveDate,
) -> Vec<StudentSummary> {
    let range = academic_year_range(today);

    let mut summaries: Vec<StudentSummary> = students
        .iter()
        .map(|student| {
            let records: Vec<_> = student
                .attendance_history
                .iter()
                .filter(|record| range.is_past(record.date, today))
                .collect();

            StudentSummary {
                name: student.name.clone(),
                school: student.school.clone(),
                rate: student_rate_on(student, class_days, today),
                recorded_days: records.len(),
                catechism_present: records
                    .iter()
                    .filter(|r| r.catechism == AttendanceStatus::Present)
                    .count(),
                mass_present: records
                    .iter()
                    .filter(|r| r.mass == AttendanceStatus::Present)
                    .count(),
            }
        })
        .collect();

    summaries.sort_by(|a, b| a.rate.cmp(&b.rate).then_with(|| a.name.cmp(&b.name)));
    summaries
}

/// Raw counts treat each class day as two chances (catechism and mass) and
/// each past event as one; late counts as attended.
pub fn summarize_catechists(snapshot: &Snapshot, today: NaiveDate) -> Vec<CatechistSummary> {
    let range = academic_year_range(today);
    let days = range.past_days(&snapshot.class_days, today);
    let events: Vec<_> = snapshot
        .events
        .iter()
        .filter(|event| range.is_past(event.date, today))
        .collect();

    let mut summaries: Vec<CatechistSummary> = snapshot
        .catechists()
        .iter()
        .map(|user| {
            let class_attended: usize = days
                .iter()
                .filter_map(|day| user.class_record_on(*day))
                .map(|(catechism, mass)| {
                    usize::from(catechism.attended()) + usize::from(mass.attended())
                })
                .sum();
            let events_attended = events
                .iter()
                .filter(|event| user.event_status(event.id).is_some_and(|s| s.attended()))
                .count();

            CatechistSummary {
                name: user.name.clone(),
                rate: catechist_rate_on(user, &snapshot.class_days, &snapshot.events, today),
                attended: class_attended + events_attended,
                possible: days.len() * 2 + events.len(),
            }
        })
        .collect();

    summaries.sort_by(|a, b| a.rate.cmp(&b.rate).then_with(|| a.name.cmp(&b.name)));
    summaries
}

/// Splits an ascending list into its first `low` entries and the top `high`
/// of the remainder, highest first.
fn extremes<T>(sorted: &[T], low: usize, high: usize) -> (&[T], Vec<&T>) {
    let low_end = low.min(sorted.len());
    let (worst, rest) = sorted.split_at(low_end);
    let best = rest.iter().rev().take(high).collect();
    (worst, best)
}

pub fn clamp_text(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}\n[...recortado...]", &text[..cut]),
        None => text.to_string(),
    }
}

fn student_line(summary: &StudentSummary) -> String {
    format!(
        "- {} ({}): asistencia={}%, días={}, catequesis={}, misa={}",
        summary.name,
        summary.school,
        summary.rate,
        summary.recorded_days,
        summary.catechism_present,
        summary.mass_present
    )
}

fn catechist_line(summary: &CatechistSummary) -> String {
    format!(
        "- {}: {}% (asistencias={}/{})",
        summary.name, summary.rate, summary.attended, summary.possible
    )
}

/// Prompt body for the pastoral report on children. Only children with a few
/// recorded days are ranked, and the lists are capped so a whole parish fits
/// the budget.
pub fn student_prompt(
    scope_title: &str,
    students: &[Student],
    class_days: &[NaiveDate],
    today: NaiveDate,
) -> String {
    let range = academic_year_range(today);
    let summaries = summarize_students(students, class_days, today);
    let ranked: Vec<StudentSummary> = summaries
        .into_iter()
        .filter(|summary| summary.recorded_days >= MIN_RANKED_DAYS)
        .collect();
    let (worst, best) = extremes(&ranked, WORST_STUDENTS, BEST_STUDENTS);

    let mut lines = vec![
        format!("ÁMBITO: {scope_title}"),
        format!(
            "PERIODO DE DATOS: {} a {}",
            format_date_local(range.start),
            format_date_local(today)
        ),
        String::new(),
        "NIÑOS CON MENOR COMPROMISO (ordenados por asistencia):".to_string(),
    ];
    lines.extend(worst.iter().map(student_line));
    lines.push(String::new());
    lines.push("NIÑOS CON MAYOR COMPROMISO:".to_string());
    lines.extend(best.into_iter().map(student_line));
    lines.extend(
        [
            "",
            "INSTRUCCIONES:",
            "- Menciona nombres propios y patrones concretos.",
            "- Evita consejos genéricos.",
            "- Si faltan datos, dilo explícitamente.",
            "- Devuelve JSON con { \"summary\": string, \"recommendations\": string[] }",
        ]
        .map(String::from),
    );

    clamp_text(&lines.join("\n"), PROMPT_CHAR_BUDGET)
}

pub fn catechist_prompt(snapshot: &Snapshot, today: NaiveDate) -> String {
    let range = academic_year_range(today);
    let summaries = summarize_catechists(snapshot, today);
    let (low, high) = extremes(&summaries, LOWEST_CATECHISTS, HIGHEST_CATECHISTS);
    let class_days = range.past_days(&snapshot.class_days, today).len();
    let events = snapshot
        .events
        .iter()
        .filter(|event| range.is_past(event.date, today))
        .count();

    let mut lines = vec![
        "ÁMBITO: Equipo de catequistas".to_string(),
        format!(
            "PERIODO: {} a {}",
            format_date_local(range.start),
            format_date_local(today)
        ),
        format!("DÍAS LECTIVOS: {class_days} (cada uno cuenta catequesis+misa)"),
        format!("EVENTOS: {events}"),
        String::new(),
        "PARTICIPACIÓN MÁS BAJA:".to_string(),
    ];
    lines.extend(low.iter().map(catechist_line));
    lines.push(String::new());
    lines.push("PARTICIPACIÓN MÁS ALTA:".to_string());
    lines.extend(high.into_iter().map(catechist_line));
    lines.extend(
        [
            "",
            "INSTRUCCIONES:",
            "- Valora el compromiso del equipo con tono pastoral.",
            "- Menciona nombres concretos.",
            "- Propón acciones específicas para apoyar a quienes tienen menor participación.",
            "- Devuelve JSON con { \"summary\": string, \"recommendations\": string[] }",
        ]
        .map(String::from),
    );

    clamp_text(&lines.join("\n"), PROMPT_CHAR_BUDGET)
}

/// Markdown snapshot of the program: headline counters, monthly trend,
/// children at risk and the catechist team.
pub fn build_report(
    scope_label: Option<&str>,
    snapshot: &Snapshot,
    students: &[Student],
    today: NaiveDate,
) -> String {
    let range = academic_year_range(today);
    let stats = dashboard_stats(students, &snapshot.class_days, today);
    let trend = monthly_participation(students, &snapshot.class_days, today);
    let summaries = summarize_students(students, &snapshot.class_days, today);
    let catechists: Vec<User> = snapshot.catechists();

    let mut output = String::new();
    let _ = writeln!(output, "# Informe de asistencia");
    let _ = writeln!(
        output,
        "Generado para {} (curso {} a {}, datos hasta {})",
        scope_label.unwrap_or("toda la parroquia"),
        format_date_local(range.start),
        format_date_local(range.end),
        format_date_local(today)
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Resumen");
    let _ = writeln!(output, "- Catecúmenos: {}", stats.total);
    let _ = writeln!(output, "- Hoy en catequesis: {}", stats.attended_catechism);
    let _ = writeln!(output, "- Hoy en misa: {}", stats.attended_mass);
    let _ = writeln!(output, "- En riesgo: {}", stats.at_risk);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Participación mensual");
    for point in &trend {
        let _ = writeln!(output, "- {}: {}%", point.label, point.participation);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Catecúmenos en riesgo");
    let at_risk: Vec<&StudentSummary> = summaries.iter().filter(|s| is_at_risk(s.rate)).collect();
    if at_risk.is_empty() {
        let _ = writeln!(output, "Ningún catecúmeno por debajo del umbral.");
    } else {
        for summary in at_risk {
            let _ = writeln!(
                output,
                "- {} ({}) {}% en {} días registrados",
                summary.name, summary.school, summary.rate, summary.recorded_days
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Catequistas");
    if catechists.is_empty() {
        let _ = writeln!(output, "No hay catequistas registrados.");
    } else {
        for summary in summarize_catechists(snapshot, today).iter().rev() {
            let _ = writeln!(
                output,
                "- {}: {}% ({} de {} asistencias)",
                summary.name, summary.rate, summary.attended, summary.possible
            );
        }
    }

    let upcoming = upcoming_events(&snapshot.events, today);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Próximos eventos");
    if upcoming.is_empty() {
        let _ = writeln!(output, "No hay eventos programados.");
    } else {
        for event in upcoming.iter().take(5) {
            let _ = writeln!(output, "- {} {}", format_date_local(event.date), event.title);
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::parse_date;
    use crate::models::AttendanceRecord;
    use uuid::Uuid;

    fn date(value: &str) -> NaiveDate {
        parse_date(value).unwrap()
    }

    fn student(name: &str, present_days: &[&str]) -> Student {
        Student {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: None,
            parent_email: None,
            school: "San Pascual".to_string(),
            birth_date: None,
            group_id: Uuid::new_v4(),
            attendance_history: present_days
                .iter()
                .map(|day| AttendanceRecord {
                    date: date(day),
                    catechism: AttendanceStatus::Present,
                    mass: AttendanceStatus::Absent,
                    note: None,
                })
                .collect(),
        }
    }

    #[test]
    fn clamp_text_marks_truncation() {
        assert_eq!(clamp_text("corto", 10), "corto");
        assert_eq!(clamp_text("ñandúes", 3), "ñan\n[...recortado...]");
    }

    #[test]
    fn extremes_do_not_overlap() {
        let values = [1, 2, 3, 4, 5];
        let (low, high) = extremes(&values, 3, 8);
        assert_eq!(low, &[1, 2, 3]);
        assert_eq!(high, vec![&5, &4]);
    }

    #[test]
    fn student_summaries_count_present_marks() {
        let days = ["2024-10-05", "2024-10-12", "2024-10-19"];
        let class_days: Vec<NaiveDate> = days.iter().map(|d| date(d)).collect();
        let summaries = summarize_students(
            &[student("Lucía", &days)],
            &class_days,
            date("2024-11-10"),
        );

        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].rate, 60);
        assert_eq!(summaries[0].recorded_days, 3);
        assert_eq!(summaries[0].catechism_present, 3);
        assert_eq!(summaries[0].mass_present, 0);
    }

    #[test]
    fn student_prompt_ranks_only_children_with_enough_days() {
        let days = ["2024-10-05", "2024-10-12", "2024-10-19"];
        let class_days: Vec<NaiveDate> = days.iter().map(|d| date(d)).collect();
        let cohort = vec![student("Lucía", &days), student("Mateo", &days[..1])];
        let prompt = student_prompt("Grupo específico", &cohort, &class_days, date("2024-11-10"));

        assert!(prompt.starts_with("ÁMBITO: Grupo específico\nPERIODO DE DATOS: 2024-09-01 a 2024-11-10"));
        assert!(prompt.contains("- Lucía (San Pascual): asistencia=60%"));
        assert!(!prompt.contains("Mateo"));
    }

    #[test]
    fn prompt_stays_within_budget() {
        let days: Vec<String> = (1..=28).map(|d| format!("2024-10-{d:02}")).collect();
        let day_refs: Vec<&str> = days.iter().map(String::as_str).collect();
        let class_days: Vec<NaiveDate> = day_refs.iter().map(|d| date(d)).collect();
        let long_name = "x".repeat(2_000);
        let cohort: Vec<Student> = (0..30)
            .map(|i| student(&format!("{long_name}{i}"), &day_refs))
            .collect();

        let prompt = student_prompt("Parroquia", &cohort, &class_days, date("2024-11-10"));
        assert!(prompt.chars().count() <= PROMPT_CHAR_BUDGET + "\n[...recortado...]".len());
        assert!(prompt.ends_with("[...recortado...]"));
    }

    #[test]
    fn markdown_report_lists_children_at_risk() {
        let days = ["2024-10-05", "2024-10-12"];
        let snapshot = Snapshot {
            students: vec![student("Lucía", &days[..1])],
            class_days: days.iter().map(|d| date(d)).collect(),
            ..Snapshot::default()
        };

        let report = build_report(None, &snapshot, &snapshot.students, date("2024-11-10"));
        assert!(report.starts_with("# Informe de asistencia"));
        assert!(report.contains("- En riesgo: 1"));
        assert!(report.contains("- Lucía (San Pascual) 30% en 1 días registrados"));
        assert!(report.contains("- Oct: 30%"));
        assert!(report.contains("No hay catequistas registrados."));
    }
}
