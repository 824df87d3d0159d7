pub mod config;
pub mod date_util;
pub mod error;
pub mod input;
pub mod metrics;
pub mod range;
pub mod report;
pub mod storage;

use chrono::NaiveDate;
use serde::Serialize;

pub use config::{AlertThresholds, EngineConfig, RecommendationThresholds};
pub use error::{Error, Result};
pub use metrics::{
    DataQualityReport, DepartmentSummary, EfficiencyDistribution, MetricsOutput,
    ProfitabilityOverview, ProjectFinancialSummary, ProjectRecord, ProjectStatus, ProjectType,
    WorkHourEntry,
};
pub use range::ReportRange;
pub use report::{
    Alert, AlertKind, Priority, Recommendation, RecommendationCategory, RecommendationKind, Report,
    Severity,
};
pub use storage::Database;

// Re-export repository types needed by the binary crate, but not the module itself
pub use storage::repository::{
    DuplicatePolicy, NewReportLogEntry, ReportLogEntry, StoreReport, SummarySet, WarehouseStatus,
};

use storage::repository;

/// Result of one analysis run: what was computed and what was stored.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRun {
    pub metrics: MetricsOutput,
    pub stored: StoreReport,
    pub profitability: ProfitabilityOverview,
    pub efficiency: EfficiencyDistribution,
}

/// Main entry point: computes, persists and reports on project financials.
pub struct WtlFinance {
    db: Database,
    config: EngineConfig,
}

impl WtlFinance {
    pub fn new(db: Database, config: EngineConfig) -> Self {
        Self { db, config }
    }

    /// Access the database (for direct queries in the CLI).
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// The file-level configuration, before `app_config` overrides.
    pub fn base_config(&self) -> &EngineConfig {
        &self.config
    }

    /// File configuration with every `app_config` override applied.
    pub async fn effective_config(&self) -> Result<EngineConfig> {
        let overrides = self
            .db
            .read_transaction(|tx| Ok(repository::list_config(tx)?))
            .await?;
        self.config.with_overrides(&overrides)
    }

    // ── Analysis ───────────────────────────────────────────────────

    /// Compute summaries for `report_date` and store them under `policy`.
    pub async fn analyze(
        &self,
        report_date: NaiveDate,
        work_hours: &[WorkHourEntry],
        projects: &[ProjectRecord],
        policy: DuplicatePolicy,
    ) -> Result<AnalysisRun> {
        let config = self.effective_config().await?;
        let metrics = metrics::compute_metrics(report_date, work_hours, projects, &config);
        let profitability =
            metrics::profitability_overview(&metrics.financial, config.break_even_epsilon);
        let efficiency = metrics::efficiency_distribution(&metrics.financial);

        let stored = self
            .store_summaries(
                report_date,
                metrics.financial.clone(),
                metrics.departments.clone(),
                policy,
            )
            .await?;

        Ok(AnalysisRun {
            metrics,
            stored,
            profitability,
            efficiency,
        })
    }

    /// Store one batch of summaries atomically.
    pub async fn store_summaries(
        &self,
        report_date: NaiveDate,
        financial: Vec<ProjectFinancialSummary>,
        departments: Vec<DepartmentSummary>,
        policy: DuplicatePolicy,
    ) -> Result<StoreReport> {
        let stored = self
            .db
            .with_transaction(move |tx| {
                repository::store_batch(tx, report_date, &financial, &departments, policy)
            })
            .await?;
        log::info!(
            "Stored {} project and {} department summaries for {report_date}",
            stored.financial_rows,
            stored.department_rows
        );
        Ok(stored)
    }

    pub async fn fetch_summaries(&self, start: NaiveDate, end: NaiveDate) -> Result<SummarySet> {
        if start > end {
            return Err(Error::RangeParse(format!("start {start} is after end {end}")));
        }
        self.db
            .read_transaction(move |tx| Ok(repository::fetch_summaries(tx, start, end)?))
            .await
    }

    // ── Reports ────────────────────────────────────────────────────

    /// Generate a report. `start` defaults to the first day of the current
    /// month and `end` to today.
    pub async fn generate_report(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Report> {
        let default = ReportRange::month_to_date();
        let start = start.unwrap_or(default.start);
        let end = end.unwrap_or(default.end);
        let config = self.effective_config().await?;
        report::generate_report(&self.db, start, end, &config).await
    }

    /// Record a produced report in the append-only report log.
    pub async fn log_report(
        &self,
        report_type: &str,
        report: &Report,
        file_path: Option<&str>,
    ) -> Result<i64> {
        let entry = NewReportLogEntry {
            report_type: report_type.to_string(),
            report_date: report.end,
            file_path: file_path.map(|s| s.to_string()),
            summary: serde_json::to_value(&report.summary)?,
        };
        let id = self
            .db
            .with_transaction(move |tx| Ok(repository::append_report_log(tx, &entry)?))
            .await?;
        log::info!("Logged {report_type} report #{id}");
        Ok(id)
    }

    pub async fn report_log(&self, limit: u32) -> Result<Vec<ReportLogEntry>> {
        self.db
            .read_transaction(move |tx| Ok(repository::list_report_log(tx, limit)?))
            .await
    }

    pub async fn report_dates(&self) -> Result<Vec<NaiveDate>> {
        self.db
            .read_transaction(|tx| Ok(repository::list_report_dates(tx)?))
            .await
    }

    pub async fn status(&self) -> Result<WarehouseStatus> {
        self.db
            .read_transaction(|tx| Ok(repository::warehouse_status(tx)?))
            .await
    }

    // ── Config commands ────────────────────────────────────────────

    pub async fn config_get(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.db
            .read_transaction(move |tx| Ok(repository::get_config(tx, &key)?))
            .await
    }

    /// Store an override. Only engine settings are accepted, and the value
    /// must leave the effective configuration valid.
    pub async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        if !EngineConfig::is_override_key(key) {
            return Err(Error::Config(format!("unknown config key: {key}")));
        }
        self.effective_config()
            .await?
            .with_overrides(&[(key.to_string(), value.to_string())])?;

        let key = key.to_string();
        let value = value.to_string();
        self.db
            .with_transaction(move |tx| Ok(repository::set_config(tx, &key, &value)?))
            .await
    }

    /// Remove an override. Returns whether one existed.
    pub async fn config_unset(&self, key: &str) -> Result<bool> {
        let key = key.to_string();
        self.db
            .with_transaction(move |tx| Ok(repository::unset_config(tx, &key)?))
            .await
    }

    pub async fn config_list(&self) -> Result<Vec<(String, String)>> {
        self.db
            .read_transaction(|tx| Ok(repository::list_config(tx)?))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()
    }

    fn work_hours() -> Vec<WorkHourEntry> {
        vec![
            WorkHourEntry {
                project_code: "GS-001".to_string(),
                department: "Engineering".to_string(),
                hours: 200.0,
                period_label: "2024-07".to_string(),
            },
            WorkHourEntry {
                project_code: "ISS-001".to_string(),
                department: "Engineering".to_string(),
                hours: 100.0,
                period_label: "2024-07".to_string(),
            },
        ]
    }

    fn projects() -> Vec<ProjectRecord> {
        vec![
            ProjectRecord {
                project_code: "GS-001".to_string(),
                project_name: "Harbor crane".to_string(),
                project_type: ProjectType::Gs,
                status: ProjectStatus::Success,
                contract_price: 1_000_000.0,
                purchase_cost: 700_000.0,
            },
            ProjectRecord {
                project_code: "ISS-001".to_string(),
                project_name: "Sensor retrofit".to_string(),
                project_type: ProjectType::Iss,
                status: ProjectStatus::Unknown,
                contract_price: 500_000.0,
                purchase_cost: 600_000.0,
            },
        ]
    }

    async fn engine() -> WtlFinance {
        let db = Database::open_memory().await.unwrap();
        WtlFinance::new(db, EngineConfig::default())
    }

    #[tokio::test]
    async fn test_analyze_then_report() {
        let wtl = engine().await;

        let run = wtl
            .analyze(date(), &work_hours(), &projects(), DuplicatePolicy::Reject)
            .await
            .unwrap();
        assert_eq!(run.stored.financial_rows, 2);
        assert_eq!(run.stored.department_rows, 1);
        assert_eq!(run.profitability.profitable, 1);
        assert_eq!(run.profitability.loss_making, 1);
        // No salary configured for Engineering
        assert_eq!(
            run.metrics.data_quality.unpriced_departments,
            vec!["Engineering".to_string()]
        );

        let report = wtl.generate_report(Some(date()), Some(date())).await.unwrap();
        assert_eq!(report.summary.total_projects, 2);
        assert_eq!(report.summary.total_profit, 200_000.0);
        assert_eq!(report.alerts[0].kind, AlertKind::LossMakingProjects);
        assert!(report.alerts[0].message.contains("¥100,000.00"));
        assert_eq!(report.project_status.len(), 1);
        assert_eq!(report.project_status[0].count, 1);

        // GS-001 earns 1,500/h and ISS-001 loses 1,000/h
        assert_eq!(report.top_departments[0].avg_project_efficiency, 250.0);
        assert_eq!(
            report.highlights.most_efficient_department.as_deref(),
            Some("Engineering")
        );
        assert_eq!(report.highlights.average_project_size, Some(750_000.0));
        let low_margin = report
            .recommendations
            .iter()
            .find(|r| r.kind == RecommendationKind::LowMargin)
            .unwrap();
        assert_eq!(low_margin.value, Some(5.0));
        let focus = report.recommendations.last().unwrap();
        assert_eq!(focus.kind, RecommendationKind::ProjectTypeFocus);
        assert_eq!(focus.subject.as_deref(), Some("GS"));

        let id = wtl
            .log_report("daily_summary", &report, Some("reports/daily.txt"))
            .await
            .unwrap();
        let log = wtl.report_log(10).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].id, id);
        assert_eq!(log[0].report_date, date());
        assert_eq!(log[0].summary["total_projects"], 2);
    }

    #[tokio::test]
    async fn test_analyze_duplicate_policies() {
        let wtl = engine().await;
        wtl.analyze(date(), &work_hours(), &projects(), DuplicatePolicy::Reject)
            .await
            .unwrap();

        let again = wtl
            .analyze(date(), &work_hours(), &projects(), DuplicatePolicy::Reject)
            .await;
        assert!(matches!(again, Err(Error::DuplicateReportDate(_))));

        let replaced = wtl
            .analyze(date(), &work_hours(), &projects(), DuplicatePolicy::Replace)
            .await
            .unwrap();
        assert_eq!(replaced.stored.replaced_rows, 3);

        let set = wtl.fetch_summaries(date(), date()).await.unwrap();
        assert_eq!(set.financial.len(), 2);
        assert_eq!(set.departments.len(), 1);
        assert_eq!(wtl.report_dates().await.unwrap(), vec![date()]);
    }

    #[tokio::test]
    async fn test_config_overrides_flow_into_analysis_and_report() {
        let wtl = engine().await;
        // 104,000 / 2080 = 50 per hour
        wtl.config_set("salary.Engineering", "104000").await.unwrap();
        wtl.config_set("alert.loss_count_trigger", "1").await.unwrap();

        let run = wtl
            .analyze(date(), &work_hours(), &projects(), DuplicatePolicy::Reject)
            .await
            .unwrap();
        let gs = &run.metrics.financial[0];
        assert_eq!(gs.project_code, "GS-001");
        assert_eq!(gs.labor_cost, 10_000.0);
        assert!(run.metrics.data_quality.unpriced_departments.is_empty());

        let report = wtl.generate_report(Some(date()), Some(date())).await.unwrap();
        assert!(report
            .alerts
            .iter()
            .all(|a| a.kind != AlertKind::LossMakingProjects));

        assert!(wtl.config_unset("alert.loss_count_trigger").await.unwrap());
        let report = wtl.generate_report(Some(date()), Some(date())).await.unwrap();
        assert_eq!(report.alerts[0].kind, AlertKind::LossMakingProjects);
    }

    #[tokio::test]
    async fn test_config_set_rejects_bad_input() {
        let wtl = engine().await;
        assert!(matches!(
            wtl.config_set("workspace_gid", "123").await,
            Err(Error::Config(_))
        ));
        assert!(matches!(
            wtl.config_set("work_hours_per_year", "lots").await,
            Err(Error::Config(_))
        ));
        assert!(wtl.config_list().await.unwrap().is_empty());

        wtl.config_set("report.top_departments", "5").await.unwrap();
        assert_eq!(
            wtl.config_get("report.top_departments").await.unwrap(),
            Some("5".to_string())
        );
        assert_eq!(wtl.effective_config().await.unwrap().top_departments, 5);
    }

    #[tokio::test]
    async fn test_status_counts() {
        let wtl = engine().await;
        wtl.analyze(date(), &work_hours(), &projects(), DuplicatePolicy::Reject)
            .await
            .unwrap();
        let status = wtl.status().await.unwrap();
        assert_eq!(status.financial_rows, 2);
        assert_eq!(status.department_rows, 1);
        assert_eq!(status.latest_report_date, Some(date()));
    }
}
