pub mod render;
pub mod types;

pub use types::*;

use chrono::NaiveDate;
use num_format::{Locale, ToFormattedString};
use rusqlite::{params, Connection, OptionalExtension};

use crate::config::{sql_limit, AlertThresholds, EngineConfig, RecommendationThresholds};
use crate::date_util::{date_key, DATE_FORMAT};
use crate::error::{Error, Result};
use crate::metrics::{score_distribution, EfficiencyDistribution, ProjectStatus, ProjectType};
use crate::storage::Database;

/// Build a report from the summaries stored for `start..=end`.
///
/// Every section is read inside one read transaction, so the report reflects
/// a single snapshot. Any query failure fails the whole call.
pub async fn generate_report(
    db: &Database,
    start: NaiveDate,
    end: NaiveDate,
    config: &EngineConfig,
) -> Result<Report> {
    if start > end {
        return Err(Error::RangeParse(format!("start {start} is after end {end}")));
    }
    let alert_thresholds = config.alerts.clone();
    let rule_thresholds = config.recommendations.clone();
    let top_departments_limit = sql_limit("report.top_departments", config.top_departments)?;
    let top_projects_limit =
        sql_limit("report.top_efficient_projects", config.top_efficient_projects)?;
    let epsilon = config.break_even_epsilon;

    let report = db
        .read_transaction(move |tx| {
            let s = date_key(start);
            let e = date_key(end);

            let summary = query_summary(tx, &s, &e, epsilon)?;
            let project_types = query_project_types(tx, &s, &e)?;
            let project_status = query_status_breakdown(tx, &s, &e)?;
            let top_departments = query_top_departments(tx, &s, &e, top_departments_limit)?;
            let departments = query_department_stats(tx, &s, &e)?;
            let efficiency = score_distribution(query_efficiency_scores(tx, &s, &e)?);
            let top_efficient_projects =
                query_top_efficient_projects(tx, &s, &e, top_projects_limit)?;
            let losses = query_losses(tx, &s, &e)?;

            let known: u64 = project_status.iter().map(|b| b.count).sum();
            let success = status_count(&project_status, ProjectStatus::Success);
            let highlights = Highlights {
                top_performer: query_extreme_project(tx, &s, &e, "DESC")?,
                biggest_concern: query_extreme_project(tx, &s, &e, "ASC")?,
                labor_cost_pct: (summary.total_cost > 0.0)
                    .then(|| summary.total_labor_cost / summary.total_cost * 100.0),
                gs_success_rate: (known > 0).then(|| success as f64 / known as f64 * 100.0),
                most_efficient_department: most_efficient_department(&departments),
                average_project_size: query_average_project_size(tx, &s, &e)?,
            };

            let alerts = evaluate_alerts(tx, &s, &e, &alert_thresholds, losses)?;
            let recommendations = evaluate_recommendations(
                &RuleInputs {
                    summary: &summary,
                    losses,
                    efficiency: &efficiency,
                    project_types: &project_types,
                    project_status: &project_status,
                    departments: &departments,
                    labor_cost_pct: highlights.labor_cost_pct,
                    top_efficient_projects: &top_efficient_projects,
                },
                &rule_thresholds,
            );

            Ok(Report {
                period: format!("{start} to {end}"),
                start,
                end,
                generated_at: chrono::Local::now().to_rfc3339(),
                summary,
                project_types,
                project_status,
                top_departments,
                efficiency,
                top_efficient_projects,
                highlights,
                alerts,
                recommendations,
            })
        })
        .await?;

    log::info!(
        "Generated report for {}: {} projects, {} alerts, {} recommendations",
        report.period,
        report.summary.total_projects,
        report.alerts.len(),
        report.recommendations.len()
    );
    Ok(report)
}

fn query_summary(
    conn: &Connection,
    start: &str,
    end: &str,
    epsilon: f64,
) -> std::result::Result<ReportSummary, rusqlite::Error> {
    conn.query_row(
        "SELECT
            COUNT(DISTINCT project_code),
            SUM(contract_price),
            SUM(total_cost),
            SUM(labor_cost),
            SUM(profit),
            AVG(profit_margin),
            SUM(total_hours),
            SUM(CASE WHEN profit > ?3 THEN 1 ELSE 0 END),
            SUM(CASE WHEN profit < -?3 THEN 1 ELSE 0 END),
            SUM(CASE WHEN ABS(profit) <= ?3 THEN 1 ELSE 0 END)
         FROM financial_summary
         WHERE report_date BETWEEN ?1 AND ?2",
        params![start, end, epsilon],
        |row| {
            Ok(ReportSummary {
                total_projects: row.get::<_, i64>(0)? as u64,
                total_revenue: row.get::<_, Option<f64>>(1)?.unwrap_or(0.0),
                total_cost: row.get::<_, Option<f64>>(2)?.unwrap_or(0.0),
                total_labor_cost: row.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
                total_profit: row.get::<_, Option<f64>>(4)?.unwrap_or(0.0),
                avg_profit_margin: row.get(5)?,
                total_hours: row.get::<_, Option<f64>>(6)?.unwrap_or(0.0),
                profitable: row.get::<_, Option<i64>>(7)?.unwrap_or(0) as u64,
                loss_making: row.get::<_, Option<i64>>(8)?.unwrap_or(0) as u64,
                break_even: row.get::<_, Option<i64>>(9)?.unwrap_or(0) as u64,
            })
        },
    )
}

fn query_project_types(
    conn: &Connection,
    start: &str,
    end: &str,
) -> std::result::Result<Vec<ProjectTypeBreakdown>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT
            project_type,
            COUNT(*),
            SUM(contract_price),
            SUM(profit),
            AVG(profit_margin),
            AVG(CASE WHEN total_hours > 0 THEN efficiency_score END)
         FROM financial_summary
         WHERE report_date BETWEEN ?1 AND ?2
         GROUP BY project_type
         ORDER BY project_type",
    )?;
    let rows = stmt.query_map(params![start, end], |row| {
        Ok(ProjectTypeBreakdown {
            project_type: row.get(0)?,
            count: row.get::<_, i64>(1)? as u64,
            total_revenue: row.get(2)?,
            total_profit: row.get(3)?,
            avg_margin: row.get(4)?,
            avg_efficiency: row.get(5)?,
        })
    })?;
    rows.collect()
}

fn query_status_breakdown(
    conn: &Connection,
    start: &str,
    end: &str,
) -> std::result::Result<Vec<StatusBreakdown>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT status, COUNT(*), SUM(profit), AVG(profit_margin)
         FROM financial_summary
         WHERE report_date BETWEEN ?1 AND ?2
           AND project_type = 'GS'
           AND status != 'Unknown'
         GROUP BY status
         ORDER BY CASE status
            WHEN 'Success' THEN 0
            WHEN 'Negotiation' THEN 1
            WHEN 'InProgress' THEN 2
            WHEN 'Fail' THEN 3
            ELSE 4
         END",
    )?;
    let rows = stmt.query_map(params![start, end], |row| {
        Ok(StatusBreakdown {
            status: row.get(0)?,
            count: row.get::<_, i64>(1)? as u64,
            total_profit: row.get(2)?,
            avg_margin: row.get(3)?,
        })
    })?;
    rows.collect()
}

fn status_count(breakdown: &[StatusBreakdown], status: ProjectStatus) -> u64 {
    breakdown
        .iter()
        .find(|b| b.status == status)
        .map_or(0, |b| b.count)
}

fn query_top_departments(
    conn: &Connection,
    start: &str,
    end: &str,
    limit: i64,
) -> std::result::Result<Vec<DepartmentRanking>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT
            department_name,
            SUM(total_hours) AS hours,
            SUM(total_labor_cost),
            AVG(num_projects),
            AVG(avg_project_efficiency)
         FROM department_summary
         WHERE report_date BETWEEN ?1 AND ?2
         GROUP BY department_name
         ORDER BY hours DESC, department_name
         LIMIT ?3",
    )?;
    let rows = stmt.query_map(params![start, end, limit], |row| {
        Ok(DepartmentRanking {
            department: row.get(0)?,
            total_hours: row.get(1)?,
            total_cost: row.get(2)?,
            avg_projects: row.get(3)?,
            avg_project_efficiency: row.get(4)?,
        })
    })?;
    rows.collect()
}

/// Per-department totals over the whole range, ordered by name.
#[derive(Debug, Clone, PartialEq)]
struct DepartmentStats {
    department: String,
    total_hours: f64,
    total_labor_cost: f64,
    total_projects: f64,
    avg_projects: f64,
}

fn query_department_stats(
    conn: &Connection,
    start: &str,
    end: &str,
) -> std::result::Result<Vec<DepartmentStats>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT
            department_name,
            SUM(total_hours),
            SUM(total_labor_cost),
            SUM(num_projects),
            AVG(num_projects)
         FROM department_summary
         WHERE report_date BETWEEN ?1 AND ?2
         GROUP BY department_name
         ORDER BY department_name",
    )?;
    let rows = stmt.query_map(params![start, end], |row| {
        Ok(DepartmentStats {
            department: row.get(0)?,
            total_hours: row.get(1)?,
            total_labor_cost: row.get(2)?,
            total_projects: row.get(3)?,
            avg_projects: row.get(4)?,
        })
    })?;
    rows.collect()
}

/// Most projects per hour worked; the first name wins ties.
fn most_efficient_department(departments: &[DepartmentStats]) -> Option<String> {
    departments
        .iter()
        .filter(|d| d.total_hours > 0.0)
        .rev()
        .max_by(|a, b| {
            (a.total_projects / a.total_hours).total_cmp(&(b.total_projects / b.total_hours))
        })
        .map(|d| d.department.clone())
}

fn query_efficiency_scores(
    conn: &Connection,
    start: &str,
    end: &str,
) -> std::result::Result<Vec<f64>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT efficiency_score
         FROM financial_summary
         WHERE report_date BETWEEN ?1 AND ?2 AND total_hours > 0",
    )?;
    let rows = stmt.query_map(params![start, end], |row| row.get(0))?;
    rows.collect()
}

fn query_top_efficient_projects(
    conn: &Connection,
    start: &str,
    end: &str,
    limit: i64,
) -> std::result::Result<Vec<EfficientProject>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT report_date, project_code, project_name, efficiency_score, profit, total_hours
         FROM financial_summary
         WHERE report_date BETWEEN ?1 AND ?2 AND total_hours > 0
         ORDER BY efficiency_score DESC, report_date, project_code
         LIMIT ?3",
    )?;
    let rows = stmt.query_map(params![start, end, limit], |row| {
        Ok(EfficientProject {
            report_date: date_column(row, 0)?,
            project_code: row.get(1)?,
            project_name: row.get(2)?,
            efficiency_score: row.get(3)?,
            profit: row.get(4)?,
            total_hours: row.get(5)?,
        })
    })?;
    rows.collect()
}

fn query_average_project_size(
    conn: &Connection,
    start: &str,
    end: &str,
) -> std::result::Result<Option<f64>, rusqlite::Error> {
    conn.query_row(
        "SELECT AVG(contract_price)
         FROM financial_summary
         WHERE report_date BETWEEN ?1 AND ?2",
        params![start, end],
        |row| row.get(0),
    )
}

fn date_column(row: &rusqlite::Row<'_>, idx: usize) -> std::result::Result<NaiveDate, rusqlite::Error> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Highest (`DESC`) or lowest (`ASC`) profit row in range.
fn query_extreme_project(
    conn: &Connection,
    start: &str,
    end: &str,
    direction: &str,
) -> std::result::Result<Option<ProjectHighlight>, rusqlite::Error> {
    let sql = format!(
        "SELECT report_date, project_code, project_name, profit, profit_margin
         FROM financial_summary
         WHERE report_date BETWEEN ?1 AND ?2
         ORDER BY profit {direction}, report_date, project_code
         LIMIT 1"
    );
    conn.query_row(&sql, params![start, end], |row| {
        Ok(ProjectHighlight {
            report_date: date_column(row, 0)?,
            project_code: row.get(1)?,
            project_name: row.get(2)?,
            profit: row.get(3)?,
            profit_margin: row.get(4)?,
        })
    })
    .optional()
}

/// Rows with `profit < 0` and the absolute sum of their losses.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Losses {
    count: u64,
    amount: f64,
}

fn query_losses(
    conn: &Connection,
    start: &str,
    end: &str,
) -> std::result::Result<Losses, rusqlite::Error> {
    conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(profit), 0)
         FROM financial_summary
         WHERE report_date BETWEEN ?1 AND ?2 AND profit < 0",
        params![start, end],
        |row| {
            Ok(Losses {
                count: row.get::<_, i64>(0)? as u64,
                amount: row.get::<_, f64>(1)?.abs(),
            })
        },
    )
}

/// Evaluate every alert rule, in a fixed order.
fn evaluate_alerts(
    conn: &Connection,
    start: &str,
    end: &str,
    thresholds: &AlertThresholds,
    losses: Losses,
) -> std::result::Result<Vec<Alert>, rusqlite::Error> {
    let mut alerts = Vec::new();

    let loss_count = losses.count;
    if loss_count > thresholds.loss_count_trigger {
        let amount = losses.amount;
        alerts.push(Alert {
            kind: AlertKind::LossMakingProjects,
            severity: Severity::High,
            message: format!(
                "{loss_count} projects with total loss of {}",
                format_currency(amount)
            ),
            count: loss_count,
            amount: Some(amount),
        });
    }

    let low_count: i64 = conn.query_row(
        "SELECT COUNT(*)
         FROM financial_summary
         WHERE report_date BETWEEN ?1 AND ?2
           AND efficiency_score < ?3
           AND total_hours > 0",
        params![start, end, thresholds.efficiency_cutoff],
        |row| row.get(0),
    )?;
    let low_count = low_count as u64;
    if low_count > thresholds.low_efficiency_count_trigger {
        alerts.push(Alert {
            kind: AlertKind::LowEfficiency,
            severity: Severity::Medium,
            message: format!("{low_count} projects with low efficiency scores"),
            count: low_count,
            amount: None,
        });
    }

    Ok(alerts)
}

struct RuleInputs<'a> {
    summary: &'a ReportSummary,
    losses: Losses,
    efficiency: &'a EfficiencyDistribution,
    project_types: &'a [ProjectTypeBreakdown],
    project_status: &'a [StatusBreakdown],
    departments: &'a [DepartmentStats],
    labor_cost_pct: Option<f64>,
    top_efficient_projects: &'a [EfficientProject],
}

/// Rule-based recommendations, in a fixed order grouped by category.
fn evaluate_recommendations(
    inputs: &RuleInputs<'_>,
    thresholds: &RecommendationThresholds,
) -> Vec<Recommendation> {
    use RecommendationKind::*;
    let mut out = Vec::new();

    // Project management
    if inputs.losses.count > 0 {
        out.push(
            Recommendation::new(
                ReviewLossMaking,
                format!(
                    "Review {} loss-making projects for cost optimization",
                    inputs.losses.count
                ),
            )
            .value(inputs.losses.amount),
        );
    }
    if let Some(std_dev) = inputs.efficiency.std_dev {
        if std_dev > thresholds.efficiency_std_dev {
            out.push(
                Recommendation::new(
                    StandardizePractices,
                    format!(
                        "Standardize project management practices to reduce efficiency variance (std dev {std_dev:.1}/h)"
                    ),
                )
                .value(std_dev),
            );
        }
    }
    let gs_count = inputs
        .project_types
        .iter()
        .find(|t| t.project_type == ProjectType::Gs)
        .map_or(0, |t| t.count);
    if gs_count > 0 {
        let failed = status_count(inputs.project_status, ProjectStatus::Fail);
        let fail_rate = failed as f64 / gs_count as f64 * 100.0;
        if fail_rate > thresholds.gs_fail_rate_pct {
            out.push(
                Recommendation::new(
                    FailureRootCause,
                    format!("High failure rate ({fail_rate:.1}%) requires root cause analysis"),
                )
                .value(fail_rate),
            );
        }
    }

    // Resource allocation
    // max_by keeps the last maximum; reversed, the first name wins ties
    let costliest = inputs
        .departments
        .iter()
        .rev()
        .max_by(|a, b| a.total_labor_cost.total_cmp(&b.total_labor_cost));
    if let Some(d) = costliest {
        out.push(
            Recommendation::new(
                HighestLaborCost,
                format!(
                    "{} has the highest labor cost ({}); evaluate resource utilization",
                    d.department,
                    format_currency(d.total_labor_cost)
                ),
            )
            .subject(d.department.clone())
            .value(d.total_labor_cost),
        );
    }
    if !inputs.departments.is_empty() {
        let mean = inputs.departments.iter().map(|d| d.avg_projects).sum::<f64>()
            / inputs.departments.len() as f64;
        let overloaded: Vec<&str> = inputs
            .departments
            .iter()
            .filter(|d| d.avg_projects > mean * thresholds.overload_multiplier)
            .map(|d| d.department.as_str())
            .collect();
        if !overloaded.is_empty() {
            out.push(
                Recommendation::new(
                    OverloadedDepartments,
                    format!(
                        "Balance workload for {} overloaded departments: {}",
                        overloaded.len(),
                        overloaded.join(", ")
                    ),
                )
                .subject(overloaded.join(", "))
                .value(overloaded.len() as f64),
            );
        }
    }

    // Financial optimization
    if let Some(margin) = inputs.summary.avg_profit_margin {
        if margin < thresholds.low_margin_pct {
            out.push(
                Recommendation::new(
                    LowMargin,
                    format!(
                        "Average profit margin ({margin:.1}%) is below target; review pricing or reduce costs"
                    ),
                )
                .value(margin),
            );
        }
    }
    if let Some(share) = inputs.labor_cost_pct {
        if share > thresholds.labor_share_pct {
            out.push(
                Recommendation::new(
                    HighLaborShare,
                    format!("High labor cost share ({share:.1}%); explore automation"),
                )
                .value(share),
            );
        }
    }

    // Strategic initiatives
    if let Some(top) = inputs.top_efficient_projects.first() {
        out.push(
            Recommendation::new(
                ReplicateTopPerformers,
                "Analyze success factors of top-performing projects for replication".to_string(),
            )
            .subject(top.project_code.clone())
            .value(top.efficiency_score),
        );
    }
    if inputs.project_types.len() > 1 {
        let best = inputs
            .project_types
            .iter()
            .rev()
            .max_by(|a, b| a.total_profit.total_cmp(&b.total_profit));
        if let Some(t) = best {
            out.push(
                Recommendation::new(
                    ProjectTypeFocus,
                    format!(
                        "{} projects show the highest profitability ({}); consider a focus shift",
                        t.project_type,
                        format_currency(t.total_profit)
                    ),
                )
                .subject(t.project_type.as_str())
                .value(t.total_profit),
            );
        }
    }

    out
}

/// `¥1,234,567.89`; negative amounts keep their sign.
pub fn format_currency(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as i64;
    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    format!(
        "{sign}¥{}.{:02}",
        (cents / 100).to_formatted_string(&Locale::en),
        cents % 100
    )
}
