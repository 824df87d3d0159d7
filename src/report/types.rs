use chrono::NaiveDate;
use serde::Serialize;

use crate::metrics::{EfficiencyDistribution, ProjectStatus, ProjectType};

/// Overall totals for the report range.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportSummary {
    /// Distinct project codes in range.
    pub total_projects: u64,
    pub total_revenue: f64,
    pub total_cost: f64,
    pub total_labor_cost: f64,
    pub total_profit: f64,
    /// Mean over rows with a defined margin; `None` when no row has one.
    pub avg_profit_margin: Option<f64>,
    pub total_hours: f64,
    pub profitable: u64,
    pub loss_making: u64,
    pub break_even: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectTypeBreakdown {
    pub project_type: ProjectType,
    pub count: u64,
    pub total_revenue: f64,
    pub total_profit: f64,
    pub avg_margin: Option<f64>,
    /// Mean efficiency over rows that logged hours.
    pub avg_efficiency: Option<f64>,
}

/// One `GS` status bucket. `Unknown` never appears.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusBreakdown {
    pub status: ProjectStatus,
    pub count: u64,
    pub total_profit: f64,
    pub avg_margin: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepartmentRanking {
    pub department: String,
    pub total_hours: f64,
    pub total_cost: f64,
    pub avg_projects: f64,
    /// Mean of the stored per-date project efficiency means.
    pub avg_project_efficiency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectHighlight {
    pub report_date: NaiveDate,
    pub project_code: String,
    pub project_name: String,
    pub profit: f64,
    pub profit_margin: Option<f64>,
}

/// A row ranked by efficiency score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EfficientProject {
    pub report_date: NaiveDate,
    pub project_code: String,
    pub project_name: String,
    pub efficiency_score: f64,
    pub profit: f64,
    pub total_hours: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Highlights {
    /// Row with the highest profit.
    pub top_performer: Option<ProjectHighlight>,
    /// Row with the lowest profit.
    pub biggest_concern: Option<ProjectHighlight>,
    /// Labor cost as a percentage of total cost.
    pub labor_cost_pct: Option<f64>,
    /// Share of `GS` rows with a known status that are `Success`, in percent.
    pub gs_success_rate: Option<f64>,
    /// Department with the most projects per hour worked.
    pub most_efficient_department: Option<String>,
    /// Mean contract price.
    pub average_project_size: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::High => "high",
            Severity::Medium => "medium",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    LossMakingProjects,
    LowEfficiency,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
    /// Number of rows that tripped the rule.
    pub count: u64,
    /// Absolute amount involved, for rules that have one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationCategory {
    ProjectManagement,
    ResourceAllocation,
    FinancialOptimization,
    StrategicInitiatives,
}

impl RecommendationCategory {
    pub fn title(&self) -> &'static str {
        match self {
            RecommendationCategory::ProjectManagement => "Project management",
            RecommendationCategory::ResourceAllocation => "Resource allocation",
            RecommendationCategory::FinancialOptimization => "Financial optimization",
            RecommendationCategory::StrategicInitiatives => "Strategic initiatives",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    ReviewLossMaking,
    StandardizePractices,
    FailureRootCause,
    HighestLaborCost,
    OverloadedDepartments,
    LowMargin,
    HighLaborShare,
    ReplicateTopPerformers,
    ProjectTypeFocus,
}

impl RecommendationKind {
    pub fn category(&self) -> RecommendationCategory {
        use RecommendationKind::*;
        match self {
            ReviewLossMaking | StandardizePractices | FailureRootCause => {
                RecommendationCategory::ProjectManagement
            }
            HighestLaborCost | OverloadedDepartments => RecommendationCategory::ResourceAllocation,
            LowMargin | HighLaborShare => RecommendationCategory::FinancialOptimization,
            ReplicateTopPerformers | ProjectTypeFocus => {
                RecommendationCategory::StrategicInitiatives
            }
        }
    }

    pub fn priority(&self) -> Priority {
        use RecommendationKind::*;
        match self {
            ReviewLossMaking | FailureRootCause => Priority::High,
            StandardizePractices | HighestLaborCost | OverloadedDepartments | LowMargin => {
                Priority::Medium
            }
            HighLaborShare | ReplicateTopPerformers | ProjectTypeFocus => Priority::Low,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    #[serde(rename = "type")]
    pub kind: RecommendationKind,
    pub category: RecommendationCategory,
    pub priority: Priority,
    pub message: String,
    /// Department, project or project type the recommendation is about.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// The figure that triggered the rule.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl Recommendation {
    pub fn new(kind: RecommendationKind, message: String) -> Self {
        Self {
            kind,
            category: kind.category(),
            priority: kind.priority(),
            message,
            subject: None,
            value: None,
        }
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }
}

/// Automated report over a range of persisted summaries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    /// `"<start> to <end>"`.
    pub period: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub generated_at: String,
    pub summary: ReportSummary,
    pub project_types: Vec<ProjectTypeBreakdown>,
    pub project_status: Vec<StatusBreakdown>,
    pub top_departments: Vec<DepartmentRanking>,
    /// Spread of efficiency scores over rows that logged hours.
    pub efficiency: EfficiencyDistribution,
    pub top_efficient_projects: Vec<EfficientProject>,
    pub highlights: Highlights,
    pub alerts: Vec<Alert>,
    pub recommendations: Vec<Recommendation>,
}
