//! Monthly AI report lock.
//!
//! A pastoral report for a given scope and report type is generated at most
//! once per calendar month. Later requests in the same month get the stored
//! payload back instead of triggering another generation.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::calendar::month_key;
use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    Students,
    Catechists,
}

impl ReportType {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportType::Students => "students",
            ReportType::Catechists => "catechists",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "scope_id", rename_all = "snake_case")]
pub enum ReportScope {
    Group(Uuid),
    AllStudents,
    AllCatechists,
}

impl ReportScope {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportScope::Group(_) => "group",
            ReportScope::AllStudents => "all_students",
            ReportScope::AllCatechists => "all_catechists",
        }
    }

    pub fn scope_id(self) -> Option<Uuid> {
        match self {
            ReportScope::Group(id) => Some(id),
            _ => None,
        }
    }

    /// Rebuilds a scope from its stored `(scope, scope_id)` columns.
    pub fn from_parts(scope: &str, scope_id: Option<Uuid>) -> Result<Self, Error> {
        match (scope, scope_id) {
            ("group", Some(id)) => Ok(ReportScope::Group(id)),
            ("group", None) => Err(Error::InvalidReportRequest(
                "scope 'group' requires a group id".to_string(),
            )),
            ("all_students", None) => Ok(ReportScope::AllStudents),
            ("all_catechists", None) => Ok(ReportScope::AllCatechists),
            (_, Some(_)) => Err(Error::InvalidReportRequest(format!(
                "scope '{scope}' does not take a group id"
            ))),
            (other, None) => Err(Error::InvalidReportRequest(format!(
                "unknown scope '{other}'"
            ))),
        }
    }
}

/// Identifies the one report allowed per month.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MonthlyReportKey {
    pub month: String,
    pub scope: ReportScope,
    pub report_type: ReportType,
}

impl MonthlyReportKey {
    /// Checks the scope fits the report type: the team report covers every
    /// catechist, children reports cover one group or the whole parish.
    pub fn new(report_type: ReportType, scope: ReportScope, today: NaiveDate) -> Result<Self, Error> {
        match (report_type, scope) {
            (ReportType::Catechists, ReportScope::AllCatechists) => {}
            (ReportType::Catechists, _) => {
                return Err(Error::InvalidReportRequest(
                    "catechist reports use scope all_catechists".to_string(),
                ))
            }
            (ReportType::Students, ReportScope::AllCatechists) => {
                return Err(Error::InvalidReportRequest(
                    "student reports use scope group or all_students".to_string(),
                ))
            }
            (ReportType::Students, _) => {}
        }

        Ok(MonthlyReportKey {
            month: month_key(today),
            scope,
            report_type,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportPayload {
    pub summary: String,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredReport {
    pub key: MonthlyReportKey,
    pub generated_at: DateTime<Utc>,
    pub payload: ReportPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyReportOutcome {
    /// True when the report had already been generated this month.
    pub existing: bool,
    pub report: StoredReport,
}

#[async_trait]
pub trait ReportStore {
    async fn find(&self, key: &MonthlyReportKey) -> anyhow::Result<Option<StoredReport>>;

    /// Returns `Ok(None)` when another writer stored the same key first.
    async fn insert(&self, report: &StoredReport) -> anyhow::Result<Option<StoredReport>>;
}

#[async_trait]
pub trait ReportGenerator {
    async fn generate(&self, prompt: &str) -> anyhow::Result<ReportPayload>;
}

impl ReportPayload {
    /// Stored instead of calling the generator when the scope has no children.
    pub fn empty_scope() -> Self {
        ReportPayload {
            summary: "No hay alumnos en este ámbito, no se puede generar un informe útil.".to_string(),
            recommendations: vec!["Asigna alumnos a un grupo antes de generar informes.".to_string()],
        }
    }
}

/// `prompt` is `None` when there is nothing to summarize; the fixed
/// empty-scope payload is locked in for the month instead.
pub async fn monthly_report<S, G>(
    store: &S,
    generator: &G,
    key: MonthlyReportKey,
    prompt: Option<&str>,
) -> anyhow::Result<MonthlyReportOutcome>
where
    S: ReportStore + Sync,
    G: ReportGenerator + Sync,
{
    if let Some(report) = store.find(&key).await? {
        tracing::info!(month = %key.month, scope = key.scope.as_str(), "monthly report already generated");
        return Ok(MonthlyReportOutcome {
            existing: true,
            report,
        });
    }

    let payload = match prompt {
        Some(prompt) => generator.generate(prompt).await?,
        None => ReportPayload::empty_scope(),
    };
    let report = StoredReport {
        key: key.clone(),
        generated_at: Utc::now(),
        payload,
    };

    match store.insert(&report).await? {
        Some(inserted) => Ok(MonthlyReportOutcome {
            existing: false,
            report: inserted,
        }),
        None => {
            tracing::warn!(month = %key.month, "concurrent report insert, returning stored copy");
            let report = store
                .find(&key)
                .await?
                .ok_or_else(|| anyhow::anyhow!("report for {} vanished after conflict", key.month))?;
            Ok(MonthlyReportOutcome {
                existing: true,
                report,
            })
        }
    }
}

/// Reads a payload another tool already produced as JSON.
pub struct PayloadFile(pub std::path::PathBuf);

#[async_trait]
impl ReportGenerator for PayloadFile {
    async fn generate(&self, _prompt: &str) -> anyhow::Result<ReportPayload> {
        use anyhow::Context;

        let raw = tokio::fs::read_to_string(&self.0)
            .await
            .with_context(|| format!("failed to read {}", self.0.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("invalid report payload in {}", self.0.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        reports: Mutex<Vec<StoredReport>>,
    }

    #[async_trait]
    impl ReportStore for MemoryStore {
        async fn find(&self, key: &MonthlyReportKey) -> anyhow::Result<Option<StoredReport>> {
            let reports = self.reports.lock().unwrap();
            Ok(reports.iter().find(|r| &r.key == key).cloned())
        }

        async fn insert(&self, report: &StoredReport) -> anyhow::Result<Option<StoredReport>> {
            let mut reports = self.reports.lock().unwrap();
            if reports.iter().any(|r| r.key == report.key) {
                return Ok(None);
            }
            reports.push(report.clone());
            Ok(Some(report.clone()))
        }
    }

    #[derive(Default)]
    struct CountingGenerator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ReportGenerator for CountingGenerator {
        async fn generate(&self, prompt: &str) -> anyhow::Result<ReportPayload> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ReportPayload {
                summary: format!("resumen de {} caracteres", prompt.len()),
                recommendations: vec!["Llamar a las familias".to_string()],
            })
        }
    }

    fn date(value: &str) -> NaiveDate {
        crate::calendar::parse_date(value).unwrap()
    }

    #[test]
    fn catechist_reports_require_team_scope() {
        let err = MonthlyReportKey::new(
            ReportType::Catechists,
            ReportScope::AllStudents,
            date("2024-11-10"),
        );
        assert!(matches!(err, Err(Error::InvalidReportRequest(_))));

        let key = MonthlyReportKey::new(
            ReportType::Students,
            ReportScope::Group(Uuid::new_v4()),
            date("2024-11-10"),
        )
        .unwrap();
        assert_eq!(key.month, "2024-11");
    }

    #[test]
    fn scope_parts_round_trip_through_columns() {
        let id = Uuid::new_v4();
        assert_eq!(
            ReportScope::from_parts("group", Some(id)).unwrap(),
            ReportScope::Group(id)
        );
        assert!(ReportScope::from_parts("group", None).is_err());
        assert!(ReportScope::from_parts("all_students", Some(id)).is_err());
    }

    #[tokio::test]
    async fn second_request_in_month_returns_stored_report() {
        let store = MemoryStore::default();
        let generator = CountingGenerator::default();
        let key = MonthlyReportKey::new(
            ReportType::Students,
            ReportScope::AllStudents,
            date("2024-11-10"),
        )
        .unwrap();

        let first = monthly_report(&store, &generator, key.clone(), Some("datos")).await.unwrap();
        let second = monthly_report(&store, &generator, key, Some("otros datos")).await.unwrap();

        assert!(!first.existing);
        assert!(second.existing);
        assert_eq!(first.report.payload, second.report.payload);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn a_new_month_generates_again() {
        let store = MemoryStore::default();
        let generator = CountingGenerator::default();
        let scope = ReportScope::AllCatechists;

        let november = MonthlyReportKey::new(ReportType::Catechists, scope, date("2024-11-30")).unwrap();
        let december = MonthlyReportKey::new(ReportType::Catechists, scope, date("2024-12-01")).unwrap();

        monthly_report(&store, &generator, november, Some("a")).await.unwrap();
        let outcome = monthly_report(&store, &generator, december, Some("b")).await.unwrap();

        assert!(!outcome.existing);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_group_stores_fixed_payload_without_generating() {
        let store = MemoryStore::default();
        let generator = CountingGenerator::default();
        let key = MonthlyReportKey::new(
            ReportType::Students,
            ReportScope::Group(Uuid::new_v4()),
            date("2024-11-10"),
        )
        .unwrap();

        let outcome = monthly_report(&store, &generator, key.clone(), None).await.unwrap();
        assert!(!outcome.existing);
        assert_eq!(
            outcome.report.payload.summary,
            "No hay alumnos en este ámbito, no se puede generar un informe útil."
        );
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);

        let again = monthly_report(&store, &generator, key, Some("datos")).await.unwrap();
        assert!(again.existing);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn payload_file_parses_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.json");
        std::fs::write(
            &path,
            r#"{"summary": "Buen curso", "recommendations": ["Seguir así"]}"#,
        )
        .unwrap();

        let payload = PayloadFile(path).generate("").await.unwrap();
        assert_eq!(payload.summary, "Buen curso");
        assert_eq!(payload.recommendations, vec!["Seguir así"]);
    }
}
