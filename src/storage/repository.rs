use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::date_util::{date_key, DATE_FORMAT};
use crate::error::Error;
use crate::metrics::{DepartmentSummary, ProjectFinancialSummary, ProjectRecord};

/// What to do when summaries already exist for the report date being stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum DuplicatePolicy {
    /// Fail with [`Error::DuplicateReportDate`] and write nothing.
    #[default]
    Reject,
    /// Delete the existing rows for the date and insert the new batch.
    Replace,
}

/// Outcome of storing one batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreReport {
    pub report_date: NaiveDate,
    pub financial_rows: usize,
    pub department_rows: usize,
    /// Rows removed under [`DuplicatePolicy::Replace`].
    pub replaced_rows: usize,
}

/// Financial and department rows for a date range.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SummarySet {
    pub financial: Vec<ProjectFinancialSummary>,
    pub departments: Vec<DepartmentSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportLogEntry {
    pub id: i64,
    pub report_type: String,
    pub report_date: NaiveDate,
    pub file_path: Option<String>,
    pub summary: serde_json::Value,
    pub created_at: String,
}

/// A report log row before insertion; `id` and `created_at` are assigned by the database.
#[derive(Debug, Clone)]
pub struct NewReportLogEntry {
    pub report_type: String,
    pub report_date: NaiveDate,
    pub file_path: Option<String>,
    pub summary: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct WarehouseStatus {
    pub financial_rows: u64,
    pub department_rows: u64,
    pub report_dates: u64,
    pub latest_report_date: Option<NaiveDate>,
    pub report_log_entries: u64,
}

// ── Summaries ──────────────────────────────────────────────────────

/// Store both summary sets for `report_date` under `policy`.
///
/// Callers run this inside a transaction; on any error the caller's
/// transaction is rolled back, so either the whole batch lands or none of it.
pub fn store_batch(
    conn: &Connection,
    report_date: NaiveDate,
    financial: &[ProjectFinancialSummary],
    departments: &[DepartmentSummary],
    policy: DuplicatePolicy,
) -> crate::error::Result<StoreReport> {
    if let Some(row) = financial.iter().find(|r| r.report_date != report_date) {
        return Err(Error::Input(format!(
            "project {} is dated {} but the batch is for {report_date}",
            row.project_code, row.report_date
        )));
    }
    if let Some(row) = departments.iter().find(|r| r.report_date != report_date) {
        return Err(Error::Input(format!(
            "department {} is dated {} but the batch is for {report_date}",
            row.department_name, row.report_date
        )));
    }

    let (existing_fin, existing_dept) = count_rows_for_date(conn, report_date)?;
    let mut replaced_rows = 0;
    if existing_fin + existing_dept > 0 {
        match policy {
            DuplicatePolicy::Reject => return Err(Error::DuplicateReportDate(report_date)),
            DuplicatePolicy::Replace => {
                replaced_rows = delete_summaries_for_date(conn, report_date)?;
                log::info!("Replacing {replaced_rows} existing rows for {report_date}");
            }
        }
    }

    let financial_rows = insert_financial_rows(conn, financial)?;
    let department_rows = insert_department_rows(conn, departments)?;
    Ok(StoreReport {
        report_date,
        financial_rows,
        department_rows,
        replaced_rows,
    })
}

pub fn count_rows_for_date(
    conn: &Connection,
    report_date: NaiveDate,
) -> Result<(u64, u64), rusqlite::Error> {
    let key = date_key(report_date);
    let fin: i64 = conn.query_row(
        "SELECT COUNT(*) FROM financial_summary WHERE report_date = ?1",
        params![key],
        |row| row.get(0),
    )?;
    let dept: i64 = conn.query_row(
        "SELECT COUNT(*) FROM department_summary WHERE report_date = ?1",
        params![key],
        |row| row.get(0),
    )?;
    Ok((fin as u64, dept as u64))
}

pub fn delete_summaries_for_date(
    conn: &Connection,
    report_date: NaiveDate,
) -> Result<usize, rusqlite::Error> {
    let key = date_key(report_date);
    let fin = conn.execute(
        "DELETE FROM financial_summary WHERE report_date = ?1",
        params![key],
    )?;
    let dept = conn.execute(
        "DELETE FROM department_summary WHERE report_date = ?1",
        params![key],
    )?;
    Ok(fin + dept)
}

pub fn insert_financial_rows(
    conn: &Connection,
    rows: &[ProjectFinancialSummary],
) -> Result<usize, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "INSERT INTO financial_summary (
            report_date, project_code, project_name, project_type, status,
            contract_price, purchase_cost, labor_cost, total_cost,
            profit, profit_margin, total_hours, efficiency_score
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
    )?;
    for row in rows {
        stmt.execute(params![
            date_key(row.report_date),
            row.project_code,
            row.project_name,
            row.project_type,
            row.status,
            row.contract_price,
            row.purchase_cost,
            row.labor_cost,
            row.total_cost,
            row.profit,
            row.profit_margin,
            row.total_hours,
            row.efficiency_score,
        ])?;
    }
    Ok(rows.len())
}

pub fn insert_department_rows(
    conn: &Connection,
    rows: &[DepartmentSummary],
) -> Result<usize, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "INSERT INTO department_summary (
            report_date, department_name, total_hours, total_labor_cost,
            num_projects, num_tasks, avg_hourly_rate, avg_project_efficiency
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;
    for row in rows {
        stmt.execute(params![
            date_key(row.report_date),
            row.department_name,
            row.total_hours,
            row.total_labor_cost,
            row.num_projects,
            row.num_tasks,
            row.avg_hourly_rate,
            row.avg_project_efficiency,
        ])?;
    }
    Ok(rows.len())
}

/// Financial and department rows with `start <= report_date <= end`,
/// ordered by report date then natural key.
pub fn fetch_summaries(
    conn: &Connection,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<SummarySet, rusqlite::Error> {
    Ok(SummarySet {
        financial: fetch_financial_rows(conn, start, end)?,
        departments: fetch_department_rows(conn, start, end)?,
    })
}

/// Rows are re-derived from their base columns, so stored derived values
/// can never drift from the formulas.
pub fn fetch_financial_rows(
    conn: &Connection,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<ProjectFinancialSummary>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT report_date, project_code, project_name, project_type, status,
                contract_price, purchase_cost, labor_cost, total_hours
         FROM financial_summary
         WHERE report_date BETWEEN ?1 AND ?2
         ORDER BY report_date, project_code",
    )?;
    let rows = stmt.query_map(params![date_key(start), date_key(end)], |row| {
        let report_date = date_column(row, 0)?;
        let record = ProjectRecord {
            project_code: row.get(1)?,
            project_name: row.get(2)?,
            project_type: row.get(3)?,
            status: row.get(4)?,
            contract_price: row.get(5)?,
            purchase_cost: row.get(6)?,
        };
        let labor_cost: f64 = row.get(7)?;
        let total_hours: f64 = row.get(8)?;
        Ok(ProjectFinancialSummary::derive(
            report_date,
            &record,
            labor_cost,
            total_hours,
        ))
    })?;
    rows.collect()
}

pub fn fetch_department_rows(
    conn: &Connection,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<DepartmentSummary>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT report_date, department_name, total_hours, total_labor_cost,
                num_projects, num_tasks, avg_hourly_rate, avg_project_efficiency
         FROM department_summary
         WHERE report_date BETWEEN ?1 AND ?2
         ORDER BY report_date, department_name",
    )?;
    let rows = stmt.query_map(params![date_key(start), date_key(end)], |row| {
        Ok(DepartmentSummary {
            report_date: date_column(row, 0)?,
            department_name: row.get(1)?,
            total_hours: row.get(2)?,
            total_labor_cost: row.get(3)?,
            num_projects: row.get(4)?,
            num_tasks: row.get(5)?,
            avg_hourly_rate: row.get(6)?,
            avg_project_efficiency: row.get(7)?,
        })
    })?;
    rows.collect()
}

/// Distinct report dates that have at least one stored summary row.
pub fn list_report_dates(conn: &Connection) -> Result<Vec<NaiveDate>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT report_date FROM financial_summary
         UNION
         SELECT report_date FROM department_summary
         ORDER BY 1",
    )?;
    let rows = stmt.query_map([], |row| date_column(row, 0))?;
    rows.collect()
}

// ── Report Log ─────────────────────────────────────────────────────

/// Append a report log entry. The relation rejects updates and deletes.
pub fn append_report_log(
    conn: &Connection,
    entry: &NewReportLogEntry,
) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO report_log (report_type, report_date, file_path, summary)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            entry.report_type,
            date_key(entry.report_date),
            entry.file_path,
            entry.summary.to_string(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Most recent entries first.
pub fn list_report_log(
    conn: &Connection,
    limit: u32,
) -> Result<Vec<ReportLogEntry>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT id, report_type, report_date, file_path, summary, created_at
         FROM report_log ORDER BY id DESC LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit], |row| {
        let raw: String = row.get(4)?;
        let summary = serde_json::from_str(&raw).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e))
        })?;
        Ok(ReportLogEntry {
            id: row.get(0)?,
            report_type: row.get(1)?,
            report_date: date_column(row, 2)?,
            file_path: row.get(3)?,
            summary,
            created_at: row.get(5)?,
        })
    })?;
    rows.collect()
}

// ── Config ─────────────────────────────────────────────────────────

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO app_config (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))",
        params![key, value],
    )?;
    Ok(())
}

pub fn unset_config(conn: &Connection, key: &str) -> Result<bool, rusqlite::Error> {
    let count = conn.execute("DELETE FROM app_config WHERE key = ?1", params![key])?;
    Ok(count > 0)
}

pub fn list_config(conn: &Connection) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT key, value FROM app_config ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

// ── Status ─────────────────────────────────────────────────────────

pub fn warehouse_status(conn: &Connection) -> Result<WarehouseStatus, rusqlite::Error> {
    let count = |sql: &str| -> Result<u64, rusqlite::Error> {
        let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
        Ok(n as u64)
    };
    let dates = list_report_dates(conn)?;
    Ok(WarehouseStatus {
        financial_rows: count("SELECT COUNT(*) FROM financial_summary")?,
        department_rows: count("SELECT COUNT(*) FROM department_summary")?,
        report_dates: dates.len() as u64,
        latest_report_date: dates.last().copied(),
        report_log_entries: count("SELECT COUNT(*) FROM report_log")?,
    })
}

// ── Helpers ────────────────────────────────────────────────────────

fn date_column(row: &Row<'_>, idx: usize) -> Result<NaiveDate, rusqlite::Error> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
