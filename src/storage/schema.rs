use rusqlite::Connection;

/// Columns each relation must carry for the repository queries to work.
pub const EXPECTED_COLUMNS: &[(&str, &[&str])] = &[
    (
        "financial_summary",
        &[
            "report_date",
            "project_code",
            "project_name",
            "project_type",
            "status",
            "contract_price",
            "purchase_cost",
            "labor_cost",
            "total_cost",
            "profit",
            "profit_margin",
            "total_hours",
            "efficiency_score",
        ],
    ),
    (
        "department_summary",
        &[
            "report_date",
            "department_name",
            "total_hours",
            "total_labor_cost",
            "num_projects",
            "num_tasks",
            "avg_hourly_rate",
            "avg_project_efficiency",
        ],
    ),
    (
        "report_log",
        &[
            "id",
            "report_type",
            "report_date",
            "file_path",
            "summary",
            "created_at",
        ],
    ),
    ("app_config", &["key", "value", "updated_at"]),
];

fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    rows.collect()
}

/// List `table.column` entries that are expected but absent.
/// A missing table reports every one of its columns.
pub fn missing_columns(conn: &Connection) -> Result<Vec<String>, rusqlite::Error> {
    collect_missing(conn, false)
}

/// Like [`missing_columns`], but only for relations that already exist.
///
/// Run before migrating: a legacy table lacking an indexed column would
/// otherwise surface as a migration failure on `CREATE INDEX`.
pub fn missing_columns_in_existing(conn: &Connection) -> Result<Vec<String>, rusqlite::Error> {
    collect_missing(conn, true)
}

fn collect_missing(conn: &Connection, existing_only: bool) -> Result<Vec<String>, rusqlite::Error> {
    let mut missing = Vec::new();
    for (table, columns) in EXPECTED_COLUMNS {
        let present = table_columns(conn, table)?;
        // PRAGMA table_info returns no rows for an absent table
        if existing_only && present.is_empty() {
            continue;
        }
        for col in *columns {
            if !present.iter().any(|p| p == col) {
                missing.push(format!("{table}.{col}"));
            }
        }
    }
    Ok(missing)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_columns_on_empty_db() {
        let conn = Connection::open_in_memory().unwrap();
        let missing = missing_columns(&conn).unwrap();
        assert!(missing.contains(&"financial_summary.profit".to_string()));
        assert!(missing.contains(&"report_log.created_at".to_string()));
    }

    #[test]
    fn test_missing_columns_detects_legacy_shape() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(include_str!("migrations/001_initial.sql"))
            .unwrap();
        assert!(missing_columns(&conn).unwrap().is_empty());

        conn.execute_batch(
            "DROP TABLE department_summary;
             CREATE TABLE department_summary (report_date TEXT, department_name TEXT, total_hours REAL);",
        )
        .unwrap();
        let missing = missing_columns(&conn).unwrap();
        assert_eq!(
            missing,
            vec![
                "department_summary.total_labor_cost".to_string(),
                "department_summary.num_projects".to_string(),
                "department_summary.num_tasks".to_string(),
                "department_summary.avg_hourly_rate".to_string(),
            ]
        );
    }

    #[test]
    fn test_existing_only_skips_absent_tables() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(missing_columns_in_existing(&conn).unwrap().is_empty());

        conn.execute_batch("CREATE TABLE financial_summary (id INTEGER PRIMARY KEY, project_code TEXT);")
            .unwrap();
        let missing = missing_columns_in_existing(&conn).unwrap();
        assert!(missing.contains(&"financial_summary.report_date".to_string()));
        assert!(missing.iter().all(|m| m.starts_with("financial_summary.")));
    }
}
