use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Project category. Only `GS` projects carry a lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProjectType {
    #[serde(rename = "GS")]
    Gs,
    #[serde(rename = "ISS")]
    Iss,
}

impl ProjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectType::Gs => "GS",
            ProjectType::Iss => "ISS",
        }
    }
}

impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GS" => Ok(ProjectType::Gs),
            "ISS" => Ok(ProjectType::Iss),
            _ => Err(Error::SchemaMismatch(format!("unknown project type: {s}"))),
        }
    }
}

/// Lifecycle status of a `GS` project.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum ProjectStatus {
    Success,
    Negotiation,
    #[serde(alias = "In Progress")]
    InProgress,
    Fail,
    #[default]
    Unknown,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Success => "Success",
            ProjectStatus::Negotiation => "Negotiation",
            ProjectStatus::InProgress => "InProgress",
            ProjectStatus::Fail => "Fail",
            ProjectStatus::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "success" => Ok(ProjectStatus::Success),
            "negotiation" => Ok(ProjectStatus::Negotiation),
            "inprogress" => Ok(ProjectStatus::InProgress),
            "fail" => Ok(ProjectStatus::Fail),
            "unknown" | "" => Ok(ProjectStatus::Unknown),
            _ => Err(Error::SchemaMismatch(format!("unknown project status: {s}"))),
        }
    }
}

fn text_from_sql<T: FromStr<Err = Error>>(value: ValueRef<'_>) -> FromSqlResult<T> {
    let s = value.as_str()?;
    s.parse().map_err(|e: Error| FromSqlError::Other(Box::new(e)))
}

impl ToSql for ProjectType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ProjectType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        text_from_sql(value)
    }
}

impl ToSql for ProjectStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ProjectStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        text_from_sql(value)
    }
}

// ── Inputs ─────────────────────────────────────────────────────────

/// One line of the time-tracking feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkHourEntry {
    pub project_code: String,
    pub department: String,
    pub hours: f64,
    /// Free-form label of the period the hours were logged in (e.g. "2024-W27").
    #[serde(default)]
    pub period_label: String,
}

/// One row of the project master feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub project_code: String,
    #[serde(default)]
    pub project_name: String,
    pub project_type: ProjectType,
    #[serde(default)]
    pub status: ProjectStatus,
    pub contract_price: f64,
    pub purchase_cost: f64,
}

// ── Summaries ──────────────────────────────────────────────────────

/// Per-project financial snapshot for one report date.
///
/// Derived fields (`total_cost`, `profit`, `profit_margin`, `efficiency_score`)
/// are only ever set by [`ProjectFinancialSummary::derive`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectFinancialSummary {
    pub report_date: NaiveDate,
    pub project_code: String,
    pub project_name: String,
    pub project_type: ProjectType,
    pub status: ProjectStatus,
    pub contract_price: f64,
    pub purchase_cost: f64,
    pub labor_cost: f64,
    pub total_cost: f64,
    pub profit: f64,
    /// Percentage of contract price; `None` unless the contract price is positive.
    pub profit_margin: Option<f64>,
    pub total_hours: f64,
    /// Profit per hour worked; 0 when no hours were logged.
    pub efficiency_score: f64,
}

impl ProjectFinancialSummary {
    pub fn derive(
        report_date: NaiveDate,
        record: &ProjectRecord,
        labor_cost: f64,
        total_hours: f64,
    ) -> Self {
        let status = match record.project_type {
            ProjectType::Gs => record.status,
            ProjectType::Iss => ProjectStatus::Unknown,
        };
        let total_cost = record.purchase_cost + labor_cost;
        let profit = record.contract_price - total_cost;
        let profit_margin = if record.contract_price > 0.0 {
            Some(profit / record.contract_price * 100.0)
        } else {
            None
        };
        let efficiency_score = if total_hours > 0.0 {
            profit / total_hours
        } else {
            0.0
        };
        Self {
            report_date,
            project_code: record.project_code.clone(),
            project_name: record.project_name.clone(),
            project_type: record.project_type,
            status,
            contract_price: record.contract_price,
            purchase_cost: record.purchase_cost,
            labor_cost,
            total_cost,
            profit,
            profit_margin,
            total_hours,
            efficiency_score,
        }
    }
}

/// Per-department workload snapshot for one report date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepartmentSummary {
    pub report_date: NaiveDate,
    pub department_name: String,
    pub total_hours: f64,
    pub total_labor_cost: f64,
    /// Distinct project codes the department logged hours against.
    pub num_projects: u32,
    /// Number of work-hour entries.
    pub num_tasks: u32,
    pub avg_hourly_rate: f64,
    /// Mean efficiency score of the master-matched projects the department
    /// logged hours against; 0 when there are none.
    pub avg_project_efficiency: f64,
}

/// Gaps found in the input feeds. None of these abort a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataQualityReport {
    /// Codes present in work hours but missing from the project master.
    pub unmatched_project_codes: Vec<String>,
    pub unmatched_hours: f64,
    /// Projects whose contract price is zero or negative (margin undefined).
    pub non_positive_contract_projects: Vec<String>,
    /// Departments with no configured salary; their hours carry no labor cost.
    pub unpriced_departments: Vec<String>,
    /// Master codes that appeared more than once; the first record wins.
    pub duplicate_project_records: Vec<String>,
    /// Entries skipped for negative or non-finite hours, or an empty code.
    pub invalid_entries: u64,
}

impl DataQualityReport {
    pub fn gap_count(&self) -> usize {
        self.unmatched_project_codes.len()
            + self.non_positive_contract_projects.len()
            + self.unpriced_departments.len()
            + self.duplicate_project_records.len()
            + self.invalid_entries as usize
    }

    pub fn is_clean(&self) -> bool {
        self.gap_count() == 0
    }
}

/// Everything one analysis run produces.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsOutput {
    pub report_date: NaiveDate,
    pub financial: Vec<ProjectFinancialSummary>,
    pub departments: Vec<DepartmentSummary>,
    pub data_quality: DataQualityReport,
}

/// Profitable / loss-making / break-even split.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfitabilityOverview {
    pub profitable: u64,
    pub loss_making: u64,
    pub break_even: u64,
}

/// Spread of efficiency scores across projects that logged hours.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EfficiencyDistribution {
    pub count: u64,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub std_dev: Option<f64>,
    pub p25: Option<f64>,
    pub p75: Option<f64>,
    pub p90: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(project_type: ProjectType, status: ProjectStatus, contract: f64) -> ProjectRecord {
        ProjectRecord {
            project_code: "P-1".to_string(),
            project_name: "Test".to_string(),
            project_type,
            status,
            contract_price: contract,
            purchase_cost: 300.0,
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()
    }

    #[test]
    fn test_derive_identities() {
        let s = ProjectFinancialSummary::derive(
            date(),
            &record(ProjectType::Gs, ProjectStatus::Success, 1000.0),
            200.0,
            4.0,
        );
        assert_eq!(s.total_cost, s.purchase_cost + s.labor_cost);
        assert_eq!(s.profit, s.contract_price - s.total_cost);
        assert_eq!(s.profit, 500.0);
        assert_eq!(s.profit_margin, Some(50.0));
        assert_eq!(s.efficiency_score, 125.0);
        assert_eq!(s.status, ProjectStatus::Success);
    }

    #[test]
    fn test_zero_contract_margin_is_none() {
        let s = ProjectFinancialSummary::derive(
            date(),
            &record(ProjectType::Gs, ProjectStatus::Fail, 0.0),
            0.0,
            0.0,
        );
        assert_eq!(s.profit, -300.0);
        assert_eq!(s.profit_margin, None);
        assert_eq!(s.efficiency_score, 0.0);
    }

    #[test]
    fn test_iss_status_forced_unknown() {
        let s = ProjectFinancialSummary::derive(
            date(),
            &record(ProjectType::Iss, ProjectStatus::Success, 1000.0),
            0.0,
            0.0,
        );
        assert_eq!(s.status, ProjectStatus::Unknown);
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("In Progress".parse::<ProjectStatus>().unwrap(), ProjectStatus::InProgress);
        assert_eq!("inprogress".parse::<ProjectStatus>().unwrap(), ProjectStatus::InProgress);
        assert_eq!("".parse::<ProjectStatus>().unwrap(), ProjectStatus::Unknown);
        assert!("Cancelled".parse::<ProjectStatus>().is_err());
    }

    #[test]
    fn test_record_deserialize() {
        let r: ProjectRecord = serde_json::from_str(
            r#"{"project_code":"G-1","project_type":"GS","status":"In Progress","contract_price":10,"purchase_cost":2}"#,
        )
        .unwrap();
        assert_eq!(r.status, ProjectStatus::InProgress);
        assert_eq!(r.project_name, "");

        let r: ProjectRecord = serde_json::from_str(
            r#"{"project_code":"I-1","project_type":"ISS","contract_price":10,"purchase_cost":2}"#,
        )
        .unwrap();
        assert_eq!(r.status, ProjectStatus::Unknown);
    }
}
