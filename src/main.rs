use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use catequesis_attendance::models::{
    AttendanceRecord, AttendanceStatus, CatechistAttendanceKind, CatechistAttendanceRecord,
    Snapshot,
};
use catequesis_attendance::monthly::{
    monthly_report, MonthlyReportKey, PayloadFile, ReportScope, ReportType,
};
use catequesis_attendance::notify::{send_bulk, OutboxMailer};
use catequesis_attendance::{calendar, db, export, rates, report, trend};

#[derive(Parser)]
#[command(name = "catequesis-attendance")]
#[command(about = "Attendance rates, exports and notices for a parish catechesis program", long_about = None)]
struct Cli {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL", global = true)]
    database_url: Option<String>,
    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 5, global = true)]
    max_connections: u32,
    /// Read data from a JSON snapshot instead of Postgres
    #[arg(long, env = "ATTENDANCE_SNAPSHOT", global = true)]
    snapshot: Option<PathBuf>,
    /// Compute as of this date instead of today (YYYY-MM-DD)
    #[arg(long, global = true)]
    today: Option<NaiveDate>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Audience {
    Students,
    Catechists,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Import student attendance from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Record a child's attendance for one day
    Mark {
        #[arg(long)]
        student: Uuid,
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        catechism: AttendanceStatus,
        #[arg(long)]
        mass: AttendanceStatus,
        #[arg(long)]
        note: Option<String>,
    },
    /// Record a catechist's attendance for a class day or an event
    MarkStaff {
        #[arg(long)]
        profile: Uuid,
        #[arg(long)]
        date: NaiveDate,
        #[arg(long, requires = "mass", conflicts_with = "event")]
        catechism: Option<AttendanceStatus>,
        #[arg(long, requires = "catechism")]
        mass: Option<AttendanceStatus>,
        #[arg(long, requires = "status")]
        event: Option<Uuid>,
        #[arg(long, requires = "event")]
        status: Option<AttendanceStatus>,
    },
    /// Print attendance rates, lowest first
    Rates {
        #[arg(long, value_enum, default_value = "students")]
        audience: Audience,
        #[arg(long)]
        group: Option<Uuid>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Print the monthly participation trend
    Trend {
        #[arg(long)]
        group: Option<Uuid>,
    },
    /// Write the attendance CSV
    Export {
        #[arg(long, value_enum, default_value = "students")]
        audience: Audience,
        #[arg(long)]
        group: Option<Uuid>,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Print the pastoral report prompt
    Prompt {
        #[arg(long, value_enum, default_value = "students")]
        audience: Audience,
        #[arg(long)]
        group: Option<Uuid>,
    },
    /// Store this month's generated report, or show the one already stored
    MonthlyReport {
        #[arg(long, value_enum, default_value = "students")]
        audience: Audience,
        #[arg(long)]
        group: Option<Uuid>,
        /// JSON file with {"summary": ..., "recommendations": [...]}
        #[arg(long)]
        payload: PathBuf,
    },
    /// Queue absence notices for the families of a group
    NotifyAbsences {
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        group: Option<Uuid>,
        /// Only these students
        #[arg(long = "student")]
        students: Vec<Uuid>,
        #[arg(long, env = "OUTBOX_DIR", default_value = "outbox")]
        outbox: PathBuf,
        #[arg(long, env = "MAIL_FROM", default_value = "catequesis@localhost")]
        from: String,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        group: Option<Uuid>,
        #[arg(long, default_value = "informe.md")]
        out: PathBuf,
    },
}

async fn connect(cli: &Cli) -> anyhow::Result<PgPool> {
    let database_url = cli
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set to reach the attendance database")?;

    PgPoolOptions::new()
        .max_connections(cli.max_connections)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")
}

async fn load_snapshot(cli: &Cli) -> anyhow::Result<Snapshot> {
    match &cli.snapshot {
        Some(path) => read_snapshot(path).await,
        None => db::load_snapshot(&connect(cli).await?).await,
    }
}

async fn read_snapshot(path: &Path) -> anyhow::Result<Snapshot> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read snapshot {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid snapshot {}", path.display()))
}

fn report_target(audience: Audience, group: Option<Uuid>) -> (ReportType, ReportScope) {
    match (audience, group) {
        (Audience::Catechists, _) => (ReportType::Catechists, ReportScope::AllCatechists),
        (Audience::Students, Some(id)) => (ReportType::Students, ReportScope::Group(id)),
        (Audience::Students, None) => (ReportType::Students, ReportScope::AllStudents),
    }
}

fn prompt_for(audience: Audience, group: Option<Uuid>, snapshot: &Snapshot, today: NaiveDate) -> String {
    match audience {
        Audience::Students => {
            let scope_title = match group {
                Some(_) => "Grupo específico",
                None => "Todos los niños (parroquia)",
            };
            report::student_prompt(
                scope_title,
                &snapshot.students_in(group),
                &snapshot.class_days,
                today,
            )
        }
        Audience::Catechists => report::catechist_prompt(snapshot, today),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let today = cli.today.unwrap_or_else(calendar::today);

    match &cli.command {
        Commands::InitDb => {
            db::init_db(&connect(&cli).await?).await?;
            println!("Schema ready.");
        }
        Commands::Import { csv } => {
            let pool = connect(&cli).await?;
            let upserted = db::import_csv(&pool, csv).await?;
            println!("Upserted {upserted} attendance rows from {}.", csv.display());
        }
        Commands::Mark {
            student,
            date,
            catechism,
            mass,
            note,
        } => {
            let pool = connect(&cli).await?;
            let record = AttendanceRecord {
                date: *date,
                catechism: *catechism,
                mass: *mass,
                note: note.clone(),
            };
            db::upsert_student_attendance(&pool, *student, &record).await?;
            tracing::info!(student = %student, date = %date, "attendance recorded");
        }
        Commands::MarkStaff {
            profile,
            date,
            catechism,
            mass,
            event,
            status,
        } => {
            let kind = match (catechism, mass, event, status) {
                (Some(catechism), Some(mass), None, None) => CatechistAttendanceKind::Class {
                    catechism: *catechism,
                    mass: *mass,
                },
                (None, None, Some(ref_id), Some(status)) => CatechistAttendanceKind::Event {
                    status: *status,
                    ref_id: *ref_id,
                },
                _ => anyhow::bail!("pass --catechism and --mass, or --event and --status"),
            };
            let pool = connect(&cli).await?;
            let record = CatechistAttendanceRecord { date: *date, kind };
            db::upsert_catechist_attendance(&pool, *profile, &record).await?;
            tracing::info!(profile = %profile, date = %date, "staff attendance recorded");
        }
        Commands::Rates {
            audience,
            group,
            limit,
        } => {
            let snapshot = load_snapshot(&cli).await?;
            match audience {
                Audience::Students => {
                    let summaries = report::summarize_students(
                        &snapshot.students_in(*group),
                        &snapshot.class_days,
                        today,
                    );
                    if summaries.is_empty() {
                        println!("No students in this scope.");
                        return Ok(());
                    }
                    for summary in summaries.iter().take(*limit) {
                        let flag = if rates::is_at_risk(summary.rate) { " [riesgo]" } else { "" };
                        println!(
                            "- {} ({}) {}% across {} recorded days{}",
                            summary.name, summary.school, summary.rate, summary.recorded_days, flag
                        );
                    }
                }
                Audience::Catechists => {
                    for summary in report::summarize_catechists(&snapshot, today).iter().take(*limit) {
                        println!(
                            "- {} {}% ({}/{})",
                            summary.name, summary.rate, summary.attended, summary.possible
                        );
                    }
                }
            }
        }
        Commands::Trend { group } => {
            let snapshot = load_snapshot(&cli).await?;
            let points =
                trend::monthly_participation(&snapshot.students_in(*group), &snapshot.class_days, today);
            for point in points {
                println!("{}\t{}%", point.label, point.participation);
            }
        }
        Commands::Export {
            audience,
            group,
            out_dir,
        } => {
            let snapshot = load_snapshot(&cli).await?;
            let (kind, table) = match audience {
                Audience::Students => (
                    export::ExportKind::Students,
                    export::student_table(&snapshot, *group, today),
                ),
                Audience::Catechists => (
                    export::ExportKind::Catechists,
                    export::staff_table(&snapshot, today),
                ),
            };
            let path = out_dir.join(export::export_filename(kind, today));
            let file = std::fs::File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            export::write_csv(&table, file)?;
            println!("Wrote {} rows to {}.", table.rows.len(), path.display());
        }
        Commands::Prompt { audience, group } => {
            let snapshot = load_snapshot(&cli).await?;
            println!("{}", prompt_for(*audience, *group, &snapshot, today));
        }
        Commands::MonthlyReport {
            audience,
            group,
            payload,
        } => {
            let (report_type, scope) = report_target(*audience, *group);
            let key = MonthlyReportKey::new(report_type, scope, today)?;
            let snapshot = load_snapshot(&cli).await?;
            let prompt = match audience {
                Audience::Students if snapshot.students_in(*group).is_empty() => None,
                _ => Some(prompt_for(*audience, *group, &snapshot, today)),
            };

            let store = db::PgReportStore::new(connect(&cli).await?);
            let outcome = monthly_report(
                &store,
                &PayloadFile(payload.clone()),
                key,
                prompt.as_deref(),
            )
            .await?;
            if outcome.existing {
                println!(
                    "A report for {} was already generated on {}; showing it.",
                    outcome.report.key.month, outcome.report.generated_at
                );
            }
            println!("{}", serde_json::to_string_pretty(&outcome.report.payload)?);
        }
        Commands::NotifyAbsences {
            date,
            group,
            students,
            outbox,
            from,
        } => {
            let snapshot = load_snapshot(&cli).await?;
            let mut recipients = snapshot.students_in(*group);
            if !students.is_empty() {
                recipients.retain(|student| students.contains(&student.id));
            }
            let mailer = OutboxMailer {
                dir: outbox.clone(),
                from: from.clone(),
            };
            let summary = send_bulk(&mailer, &recipients, *date).await?;
            println!(
                "sent {}, skipped without email {}, skipped present {}, errors {}",
                summary.sent, summary.skipped_no_email, summary.skipped_present_both, summary.errors
            );
        }
        Commands::Report { group, out } => {
            let snapshot = load_snapshot(&cli).await?;
            let scope_label = group.map(|id| snapshot.group_name(Some(id)).to_string());
            let report = report::build_report(
                scope_label.as_deref(),
                &snapshot,
                &snapshot.students_in(*group),
                today,
            );
            std::fs::write(out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
