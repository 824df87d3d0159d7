use std::fmt;

use super::{format_currency, Report};

const RULE_WIDTH: usize = 60;

fn pct(v: Option<f64>) -> String {
    v.map_or_else(|| "n/a".to_string(), |v| format!("{v:.2}%"))
}

fn per_hour(v: Option<f64>) -> String {
    v.map_or_else(|| "n/a".to_string(), |v| format!("{v:.1}/h"))
}

/// Plain-text rendering of a report for terminal output and report files.
pub fn render_text(report: &Report) -> String {
    report.to_string()
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(RULE_WIDTH);
        let sub = "-".repeat(30);

        writeln!(f, "{rule}")?;
        writeln!(f, "WTL FINANCIAL REPORT")?;
        writeln!(f, "{rule}")?;
        writeln!(f, "Generated: {}", self.generated_at)?;
        writeln!(f, "Period: {}", self.period)?;
        writeln!(f)?;

        let s = &self.summary;
        writeln!(f, "SUMMARY")?;
        writeln!(f, "{sub}")?;
        writeln!(f, "Total Projects: {}", s.total_projects)?;
        writeln!(f, "Total Revenue: {}", format_currency(s.total_revenue))?;
        writeln!(f, "Total Cost: {}", format_currency(s.total_cost))?;
        writeln!(f, "Total Profit: {}", format_currency(s.total_profit))?;
        writeln!(f, "Avg Profit Margin: {}", pct(s.avg_profit_margin))?;
        writeln!(f, "Total Hours: {:.1}", s.total_hours)?;
        writeln!(
            f,
            "Profitable / Loss / Break-even: {} / {} / {}",
            s.profitable, s.loss_making, s.break_even
        )?;
        writeln!(f)?;

        if !self.project_types.is_empty() {
            writeln!(f, "BY PROJECT TYPE")?;
            writeln!(f, "{sub}")?;
            for t in &self.project_types {
                writeln!(
                    f,
                    "{:<4} {:>4} projects  profit {}  margin {}",
                    t.project_type.as_str(),
                    t.count,
                    format_currency(t.total_profit),
                    pct(t.avg_margin)
                )?;
            }
            writeln!(f)?;
        }

        if !self.project_status.is_empty() {
            writeln!(f, "GS STATUS")?;
            writeln!(f, "{sub}")?;
            for b in &self.project_status {
                writeln!(
                    f,
                    "{:<12} {:>4}  margin {}",
                    b.status.as_str(),
                    b.count,
                    pct(b.avg_margin)
                )?;
            }
            writeln!(f, "Success rate: {}", pct(self.highlights.gs_success_rate))?;
            writeln!(f)?;
        }

        if !self.top_departments.is_empty() {
            writeln!(f, "TOP DEPARTMENTS")?;
            writeln!(f, "{sub}")?;
            for d in &self.top_departments {
                writeln!(
                    f,
                    "{:<20} {:>10.1}h  {}  project eff {:.1}/h",
                    d.department,
                    d.total_hours,
                    format_currency(d.total_cost),
                    d.avg_project_efficiency
                )?;
            }
            writeln!(f)?;
        }

        if self.efficiency.count > 0 {
            let e = &self.efficiency;
            writeln!(f, "EFFICIENCY")?;
            writeln!(f, "{sub}")?;
            writeln!(
                f,
                "Mean {}  Median {}  Std dev {}",
                per_hour(e.mean),
                per_hour(e.median),
                per_hour(e.std_dev)
            )?;
            for p in &self.top_efficient_projects {
                writeln!(
                    f,
                    "  {:<14} {:>10.1}/h  {}",
                    p.project_code,
                    p.efficiency_score,
                    format_currency(p.profit)
                )?;
            }
            writeln!(f)?;
        }

        let h = &self.highlights;
        if let Some(top) = &h.top_performer {
            writeln!(
                f,
                "Top performer: {} ({})",
                top.project_code,
                format_currency(top.profit)
            )?;
        }
        if let Some(concern) = &h.biggest_concern {
            writeln!(
                f,
                "Biggest concern: {} ({})",
                concern.project_code,
                format_currency(concern.profit)
            )?;
        }
        if h.labor_cost_pct.is_some() {
            writeln!(f, "Labor share of cost: {}", pct(h.labor_cost_pct))?;
        }
        if let Some(dept) = &h.most_efficient_department {
            writeln!(f, "Most efficient department: {dept}")?;
        }
        if let Some(size) = h.average_project_size {
            writeln!(f, "Average project size: {}", format_currency(size))?;
        }

        if !self.alerts.is_empty() {
            writeln!(f)?;
            writeln!(f, "ALERTS")?;
            writeln!(f, "{sub}")?;
            for alert in &self.alerts {
                writeln!(
                    f,
                    "[{}] {}",
                    alert.severity.as_str().to_uppercase(),
                    alert.message
                )?;
            }
        }

        if !self.recommendations.is_empty() {
            writeln!(f)?;
            writeln!(f, "RECOMMENDATIONS")?;
            writeln!(f, "{sub}")?;
            let mut category = None;
            for rec in &self.recommendations {
                if category != Some(rec.category) {
                    category = Some(rec.category);
                    writeln!(f, "{}:", rec.category.title())?;
                }
                writeln!(
                    f,
                    "  - [{}] {}",
                    rec.priority.as_str().to_uppercase(),
                    rec.message
                )?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::EfficiencyDistribution;
    use crate::report::{
        Alert, AlertKind, Highlights, Recommendation, RecommendationKind, ReportSummary, Severity,
    };
    use chrono::NaiveDate;

    fn report() -> Report {
        let day = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        Report {
            period: "2024-07-01 to 2024-07-01".to_string(),
            start: day,
            end: day,
            generated_at: "2024-07-01T09:00:00+00:00".to_string(),
            summary: ReportSummary {
                total_projects: 2,
                total_profit: 200_000.0,
                ..Default::default()
            },
            project_types: vec![],
            project_status: vec![],
            top_departments: vec![],
            efficiency: EfficiencyDistribution::default(),
            top_efficient_projects: vec![],
            highlights: Highlights::default(),
            alerts: vec![Alert {
                kind: AlertKind::LossMakingProjects,
                severity: Severity::High,
                message: "1 projects with total loss of ¥100,000.00".to_string(),
                count: 1,
                amount: Some(100_000.0),
            }],
            recommendations: vec![],
        }
    }

    #[test]
    fn test_render_text_contains_sections() {
        let text = render_text(&report());
        assert!(text.contains("Period: 2024-07-01 to 2024-07-01"));
        assert!(text.contains("Total Projects: 2"));
        assert!(text.contains("Total Profit: ¥200,000.00"));
        assert!(text.contains("Avg Profit Margin: n/a"));
        assert!(text.contains("[HIGH] 1 projects with total loss of ¥100,000.00"));
        assert!(!text.contains("GS STATUS"));
        assert!(!text.contains("RECOMMENDATIONS"));
        assert!(!text.contains("EFFICIENCY"));
    }

    #[test]
    fn test_render_recommendations_grouped() {
        let mut r = report();
        r.highlights.most_efficient_department = Some("QA".to_string());
        r.highlights.average_project_size = Some(1_500.0);
        r.recommendations = vec![
            Recommendation::new(
                RecommendationKind::ReviewLossMaking,
                "Review 1 loss-making projects for cost optimization".to_string(),
            ),
            Recommendation::new(
                RecommendationKind::FailureRootCause,
                "High failure rate (50.0%) requires root cause analysis".to_string(),
            ),
            Recommendation::new(
                RecommendationKind::HighLaborShare,
                "High labor cost share (45.0%); explore automation".to_string(),
            ),
        ];

        let text = r.to_string();
        assert_eq!(text, render_text(&r));
        assert!(text.contains("Most efficient department: QA"));
        assert!(text.contains("Average project size: ¥1,500.00"));
        assert_eq!(text.matches("Project management:").count(), 1);
        assert!(text.contains("Financial optimization:\n  - [LOW] High labor cost share"));
        assert!(text.contains("  - [HIGH] Review 1 loss-making projects"));
    }
}
