pub mod types;

pub use types::*;

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use crate::config::EngineConfig;

#[derive(Default)]
struct DepartmentAccumulator<'a> {
    hours: f64,
    tasks: u32,
    projects: BTreeSet<&'a str>,
}

/// Derive per-project and per-department summaries for one report date.
///
/// Pure: the only inputs are the two feeds and the salary/work-hours settings.
/// Output rows are ordered by their natural key.
pub fn compute_metrics(
    report_date: NaiveDate,
    work_hours: &[WorkHourEntry],
    projects: &[ProjectRecord],
    config: &EngineConfig,
) -> MetricsOutput {
    let mut quality = DataQualityReport::default();

    // Master index; first record per code wins
    let mut master: BTreeMap<&str, &ProjectRecord> = BTreeMap::new();
    for record in projects {
        let code = record.project_code.trim();
        if code.is_empty() {
            quality.invalid_entries += 1;
            continue;
        }
        if master.contains_key(code) {
            quality.duplicate_project_records.push(code.to_string());
        } else {
            master.insert(code, record);
        }
    }

    // project -> department -> hours, built once
    let mut project_hours: BTreeMap<&str, BTreeMap<&str, f64>> = BTreeMap::new();
    let mut departments: BTreeMap<&str, DepartmentAccumulator<'_>> = BTreeMap::new();
    let mut unmatched: BTreeSet<&str> = BTreeSet::new();

    for entry in work_hours {
        let code = entry.project_code.trim();
        let dept = entry.department.trim();
        if code.is_empty() || dept.is_empty() || !entry.hours.is_finite() || entry.hours < 0.0 {
            quality.invalid_entries += 1;
            continue;
        }

        let acc = departments.entry(dept).or_default();
        acc.hours += entry.hours;
        acc.tasks += 1;
        acc.projects.insert(code);

        if master.contains_key(code) {
            *project_hours
                .entry(code)
                .or_default()
                .entry(dept)
                .or_insert(0.0) += entry.hours;
        } else {
            unmatched.insert(code);
            quality.unmatched_hours += entry.hours;
        }
    }
    quality.unmatched_project_codes = unmatched.iter().map(|c| c.to_string()).collect();

    let mut rates: BTreeMap<&str, f64> = BTreeMap::new();
    for dept in departments.keys() {
        let rate = match config.hourly_rate(dept) {
            Some(rate) => rate,
            None => {
                quality.unpriced_departments.push(dept.to_string());
                0.0
            }
        };
        rates.insert(*dept, rate);
    }

    let financial: Vec<ProjectFinancialSummary> = master
        .iter()
        .map(|(code, record)| {
            let (labor_cost, total_hours) = match project_hours.get(code) {
                Some(by_dept) => by_dept.iter().fold((0.0, 0.0), |(cost, hours), (dept, h)| {
                    let rate = rates.get(dept).copied().unwrap_or(0.0);
                    (cost + h * rate, hours + h)
                }),
                None => (0.0, 0.0),
            };
            if record.contract_price <= 0.0 {
                quality.non_positive_contract_projects.push(code.to_string());
            }
            let mut summary =
                ProjectFinancialSummary::derive(report_date, record, round_cents(labor_cost), total_hours);
            summary.project_code = code.to_string();
            summary
        })
        .collect();

    // code -> efficiency, for the per-department project mean
    let efficiency: BTreeMap<&str, f64> = financial
        .iter()
        .map(|r| (r.project_code.as_str(), r.efficiency_score))
        .collect();

    let department_rows: Vec<DepartmentSummary> = departments
        .iter()
        .map(|(dept, acc)| {
            let rate = rates.get(dept).copied().unwrap_or(0.0);
            let scores: Vec<f64> = acc
                .projects
                .iter()
                .filter_map(|code| efficiency.get(code).copied())
                .collect();
            let avg_project_efficiency = if scores.is_empty() {
                0.0
            } else {
                scores.iter().sum::<f64>() / scores.len() as f64
            };
            DepartmentSummary {
                report_date,
                department_name: dept.to_string(),
                total_hours: acc.hours,
                total_labor_cost: round_cents(acc.hours * rate),
                num_projects: acc.projects.len() as u32,
                num_tasks: acc.tasks,
                avg_hourly_rate: rate,
                avg_project_efficiency,
            }
        })
        .collect();

    log_quality(&quality);

    MetricsOutput {
        report_date,
        financial,
        departments: department_rows,
        data_quality: quality,
    }
}

fn log_quality(quality: &DataQualityReport) {
    if !quality.unmatched_project_codes.is_empty() {
        log::warn!(
            "{} project codes in work hours have no master record ({:.1} hours): {}",
            quality.unmatched_project_codes.len(),
            quality.unmatched_hours,
            quality.unmatched_project_codes.join(", ")
        );
    }
    if !quality.non_positive_contract_projects.is_empty() {
        log::warn!(
            "{} projects have a zero or negative contract price; margin left undefined",
            quality.non_positive_contract_projects.len()
        );
    }
    if !quality.unpriced_departments.is_empty() {
        log::warn!(
            "No salary configured for departments: {}",
            quality.unpriced_departments.join(", ")
        );
    }
    if !quality.duplicate_project_records.is_empty() {
        log::warn!(
            "Duplicate project master records ignored: {}",
            quality.duplicate_project_records.join(", ")
        );
    }
    if quality.invalid_entries > 0 {
        log::warn!("Skipped {} invalid input entries", quality.invalid_entries);
    }
}

pub(crate) fn round_cents(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Split rows into profitable, loss-making and break-even.
pub fn profitability_overview(
    rows: &[ProjectFinancialSummary],
    break_even_epsilon: f64,
) -> ProfitabilityOverview {
    let mut overview = ProfitabilityOverview::default();
    for row in rows {
        if row.profit.abs() <= break_even_epsilon {
            overview.break_even += 1;
        } else if row.profit > 0.0 {
            overview.profitable += 1;
        } else {
            overview.loss_making += 1;
        }
    }
    overview
}

/// Efficiency statistics over rows that logged hours.
pub fn efficiency_distribution(rows: &[ProjectFinancialSummary]) -> EfficiencyDistribution {
    score_distribution(
        rows.iter()
            .filter(|r| r.total_hours > 0.0)
            .map(|r| r.efficiency_score)
            .collect(),
    )
}

/// Mean, median, sample standard deviation and nearest-rank percentiles.
pub fn score_distribution(mut scores: Vec<f64>) -> EfficiencyDistribution {
    if scores.is_empty() {
        return EfficiencyDistribution::default();
    }
    scores.sort_by(|a, b| a.total_cmp(b));

    let n = scores.len() as f64;
    let mean = scores.iter().sum::<f64>() / n;
    let std_dev = if scores.len() > 1 {
        let var = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (n - 1.0);
        Some(var.sqrt())
    } else {
        None
    };

    EfficiencyDistribution {
        count: scores.len() as u64,
        mean: Some(mean),
        median: Some(median(&scores)),
        std_dev,
        p25: Some(percentile(&scores, 0.25)),
        p75: Some(percentile(&scores, 0.75)),
        p90: Some(percentile(&scores, 0.90)),
    }
}

/// Median of a sorted, non-empty slice.
fn median(sorted: &[f64]) -> f64 {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Nearest-rank percentile of a sorted, non-empty slice.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let idx = ((sorted.len() as f64) * p).ceil() as usize;
    let idx = idx.min(sorted.len()).max(1) - 1;
    sorted[idx]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()
    }

    fn config() -> EngineConfig {
        let mut config = EngineConfig::default();
        // 100/h and 50/h at 2080 hours a year
        config
            .department_salaries
            .insert("Design".to_string(), 208_000.0);
        config
            .department_salaries
            .insert("Survey".to_string(), 104_000.0);
        config
    }

    fn hours(code: &str, dept: &str, h: f64) -> WorkHourEntry {
        WorkHourEntry {
            project_code: code.to_string(),
            department: dept.to_string(),
            hours: h,
            period_label: "2024-W27".to_string(),
        }
    }

    fn project(code: &str, ptype: ProjectType, contract: f64, purchase: f64) -> ProjectRecord {
        ProjectRecord {
            project_code: code.to_string(),
            project_name: format!("Project {code}"),
            project_type: ptype,
            status: ProjectStatus::Success,
            contract_price: contract,
            purchase_cost: purchase,
        }
    }

    #[test]
    fn test_labor_cost_across_departments() {
        let work = vec![
            hours("G-1", "Design", 10.0),
            hours("G-1", "Survey", 20.0),
            hours("G-1", "Design", 5.0),
        ];
        let projects = vec![project("G-1", ProjectType::Gs, 10_000.0, 1_000.0)];
        let out = compute_metrics(date(), &work, &projects, &config());

        assert_eq!(out.financial.len(), 1);
        let p = &out.financial[0];
        // 15h * 100 + 20h * 50
        assert_eq!(p.labor_cost, 2_500.0);
        assert_eq!(p.total_hours, 35.0);
        assert_eq!(p.total_cost, 3_500.0);
        assert_eq!(p.profit, 6_500.0);
        assert_eq!(p.profit_margin, Some(65.0));
        assert!(out.data_quality.is_clean());
    }

    #[test]
    fn test_department_summaries() {
        let work = vec![
            hours("G-1", "Design", 10.0),
            hours("G-2", "Design", 6.0),
            hours("G-2", "Design", 4.0),
            hours("G-1", "Survey", 8.0),
        ];
        let projects = vec![
            project("G-1", ProjectType::Gs, 1_000.0, 0.0),
            project("G-2", ProjectType::Gs, 1_000.0, 0.0),
        ];
        let out = compute_metrics(date(), &work, &projects, &config());

        assert_eq!(out.departments.len(), 2);
        let design = &out.departments[0];
        assert_eq!(design.department_name, "Design");
        assert_eq!(design.total_hours, 20.0);
        assert_eq!(design.total_labor_cost, 2_000.0);
        assert_eq!(design.num_projects, 2);
        assert_eq!(design.num_tasks, 3);
        assert_eq!(design.avg_hourly_rate, 100.0);
        assert!((design.total_labor_cost / design.total_hours - design.avg_hourly_rate).abs() < 0.01);

        let survey = &out.departments[1];
        assert_eq!(survey.department_name, "Survey");
        assert_eq!(survey.num_projects, 1);
        assert_eq!(survey.total_labor_cost, 400.0);
    }

    #[test]
    fn test_project_without_hours() {
        let projects = vec![project("I-9", ProjectType::Iss, 500.0, 100.0)];
        let out = compute_metrics(date(), &[], &projects, &config());
        let p = &out.financial[0];
        assert_eq!(p.total_hours, 0.0);
        assert_eq!(p.efficiency_score, 0.0);
        assert_eq!(p.labor_cost, 0.0);
        assert_eq!(p.status, ProjectStatus::Unknown);
        assert!(out.departments.is_empty());
    }

    #[test]
    fn test_department_project_efficiency() {
        let work = vec![
            hours("G-1", "Design", 10.0),
            hours("G-2", "Design", 10.0),
            hours("X-404", "Design", 5.0),
            hours("G-2", "Survey", 10.0),
        ];
        let projects = vec![
            project("G-1", ProjectType::Gs, 5_000.0, 0.0),
            project("G-2", ProjectType::Gs, 10_000.0, 0.0),
        ];
        let out = compute_metrics(date(), &work, &projects, &config());

        // G-1: (5000 - 1000) / 10 = 400. G-2: (10000 - 1000 - 500) / 20 = 425
        assert_eq!(out.financial[0].efficiency_score, 400.0);
        assert_eq!(out.financial[1].efficiency_score, 425.0);
        // Unmatched X-404 has no score and stays out of the mean
        assert_eq!(out.departments[0].avg_project_efficiency, 412.5);
        assert_eq!(out.departments[1].avg_project_efficiency, 425.0);

        let only_unmatched = compute_metrics(date(), &[hours("X-1", "Design", 1.0)], &[], &config());
        assert_eq!(only_unmatched.departments[0].avg_project_efficiency, 0.0);
    }

    #[test]
    fn test_unknown_project_code_is_counted_not_dropped() {
        let work = vec![
            hours("G-1", "Design", 10.0),
            hours("X-404", "Design", 7.0),
        ];
        let projects = vec![project("G-1", ProjectType::Gs, 5_000.0, 0.0)];
        let out = compute_metrics(date(), &work, &projects, &config());

        assert_eq!(out.financial.len(), 1);
        assert_eq!(out.data_quality.unmatched_project_codes, vec!["X-404".to_string()]);
        assert_eq!(out.data_quality.unmatched_hours, 7.0);
        // Department totals still include the unmatched hours
        assert_eq!(out.departments[0].total_hours, 17.0);
        assert_eq!(out.departments[0].total_labor_cost, 1_700.0);
        assert_eq!(out.departments[0].num_projects, 2);
    }

    #[test]
    fn test_zero_contract_and_unpriced_department() {
        let work = vec![hours("G-1", "Finance", 3.0)];
        let projects = vec![project("G-1", ProjectType::Gs, 0.0, 50.0)];
        let out = compute_metrics(date(), &work, &projects, &config());

        let p = &out.financial[0];
        assert_eq!(p.profit_margin, None);
        assert_eq!(p.labor_cost, 0.0);
        assert_eq!(out.data_quality.non_positive_contract_projects, vec!["G-1".to_string()]);
        assert_eq!(out.data_quality.unpriced_departments, vec!["Finance".to_string()]);
        assert_eq!(out.data_quality.gap_count(), 2);
    }

    #[test]
    fn test_negative_contract_is_a_quality_gap() {
        let projects = vec![project("G-7", ProjectType::Gs, -500.0, 0.0)];
        let out = compute_metrics(date(), &[], &projects, &config());

        assert_eq!(out.financial[0].profit_margin, None);
        assert_eq!(out.financial[0].profit, -500.0);
        assert_eq!(
            out.data_quality.non_positive_contract_projects,
            vec!["G-7".to_string()]
        );
        assert_eq!(out.data_quality.gap_count(), 1);
        assert!(!out.data_quality.is_clean());
    }

    #[test]
    fn test_invalid_entries_and_duplicates() {
        let work = vec![
            hours("G-1", "Design", -2.0),
            hours("G-1", "Design", f64::NAN),
            hours("", "Design", 1.0),
            hours(" G-1 ", "Design", 1.0),
        ];
        let projects = vec![
            project("G-1", ProjectType::Gs, 1_000.0, 0.0),
            project("G-1", ProjectType::Gs, 9_999.0, 0.0),
        ];
        let out = compute_metrics(date(), &work, &projects, &config());

        assert_eq!(out.data_quality.invalid_entries, 3);
        assert_eq!(out.data_quality.duplicate_project_records, vec!["G-1".to_string()]);
        assert_eq!(out.financial.len(), 1);
        assert_eq!(out.financial[0].contract_price, 1_000.0);
        assert_eq!(out.financial[0].total_hours, 1.0);
    }

    #[test]
    fn test_identities_hold_for_every_row() {
        let work = vec![
            hours("G-1", "Design", 3.3),
            hours("G-2", "Survey", 7.7),
            hours("I-1", "Design", 1.1),
        ];
        let projects = vec![
            project("G-1", ProjectType::Gs, 1_234.56, 78.9),
            project("G-2", ProjectType::Gs, 0.0, 10.0),
            project("I-1", ProjectType::Iss, 99.99, 100.0),
        ];
        let out = compute_metrics(date(), &work, &projects, &config());
        for row in &out.financial {
            assert_eq!(row.total_cost, row.purchase_cost + row.labor_cost);
            assert_eq!(row.profit, row.contract_price - row.total_cost);
        }
    }

    #[test]
    fn test_profitability_overview() {
        let projects = vec![
            project("A", ProjectType::Gs, 1_000.0, 100.0),
            project("B", ProjectType::Gs, 1_000.0, 1_500.0),
            project("C", ProjectType::Gs, 1_000.0, 1_000.0),
            project("D", ProjectType::Iss, 1_000.0, 999.995),
        ];
        let out = compute_metrics(date(), &[], &projects, &config());
        let overview = profitability_overview(&out.financial, 0.01);
        assert_eq!(overview.profitable, 1);
        assert_eq!(overview.loss_making, 1);
        assert_eq!(overview.break_even, 2);
    }

    #[test]
    fn test_efficiency_distribution() {
        let work: Vec<WorkHourEntry> = (1..=4)
            .map(|i| hours(&format!("P{i}"), "Finance", 10.0))
            .collect();
        let projects: Vec<ProjectRecord> = (1..=4)
            .map(|i| project(&format!("P{i}"), ProjectType::Gs, i as f64 * 1_000.0, 0.0))
            .chain(std::iter::once(project("P5", ProjectType::Gs, 50.0, 0.0)))
            .collect();
        let out = compute_metrics(date(), &work, &projects, &config());
        let dist = efficiency_distribution(&out.financial);

        // P5 has no hours and is excluded
        assert_eq!(dist.count, 4);
        assert_eq!(dist.mean, Some(250.0));
        assert_eq!(dist.median, Some(250.0));
        assert_eq!(dist.p25, Some(100.0));
        assert_eq!(dist.p90, Some(400.0));
        assert!(dist.std_dev.unwrap() > 0.0);
    }

    #[test]
    fn test_efficiency_distribution_empty() {
        let dist = efficiency_distribution(&[]);
        assert_eq!(dist.count, 0);
        assert!(dist.mean.is_none());
        assert!(dist.std_dev.is_none());
    }
}
