use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Thresholds for the automated report's alert rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    /// Projects with hours logged and an efficiency score below this are flagged.
    pub efficiency_cutoff: f64,
    /// The loss alert fires when more than this many rows are loss-making.
    pub loss_count_trigger: u64,
    /// The low-efficiency alert fires when more than this many rows are flagged.
    pub low_efficiency_count_trigger: u64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            efficiency_cutoff: 100.0,
            loss_count_trigger: 0,
            low_efficiency_count_trigger: 0,
        }
    }
}

/// Thresholds for the report's rule-based recommendations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationThresholds {
    /// Efficiency standard deviation (per hour) above which practices should be standardized.
    pub efficiency_std_dev: f64,
    /// Share of `GS` projects in `Fail`, in percent.
    pub gs_fail_rate_pct: f64,
    /// A department is overloaded above this multiple of the mean project count.
    pub overload_multiplier: f64,
    /// Average margin, in percent, below which pricing should be reviewed.
    pub low_margin_pct: f64,
    /// Labor share of total cost, in percent.
    pub labor_share_pct: f64,
}

impl Default for RecommendationThresholds {
    fn default() -> Self {
        Self {
            efficiency_std_dev: 100.0,
            gs_fail_rate_pct: 10.0,
            overload_multiplier: 1.5,
            low_margin_pct: 15.0,
            labor_share_pct: 40.0,
        }
    }
}

impl RecommendationThresholds {
    fn fields(&self) -> [(&'static str, f64); 5] {
        [
            ("recommend.efficiency_std_dev", self.efficiency_std_dev),
            ("recommend.gs_fail_rate_pct", self.gs_fail_rate_pct),
            ("recommend.overload_multiplier", self.overload_multiplier),
            ("recommend.low_margin_pct", self.low_margin_pct),
            ("recommend.labor_share_pct", self.labor_share_pct),
        ]
    }

    fn field_mut(&mut self, key: &str) -> Option<&mut f64> {
        match key {
            "recommend.efficiency_std_dev" => Some(&mut self.efficiency_std_dev),
            "recommend.gs_fail_rate_pct" => Some(&mut self.gs_fail_rate_pct),
            "recommend.overload_multiplier" => Some(&mut self.overload_multiplier),
            "recommend.low_margin_pct" => Some(&mut self.low_margin_pct),
            "recommend.labor_share_pct" => Some(&mut self.labor_share_pct),
            _ => None,
        }
    }
}

/// Everything the engine needs that is not raw data.
///
/// Loaded from a JSON file; any key may also be overridden through the
/// `app_config` table (see [`EngineConfig::apply_override`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Annual salary per department, in currency units.
    pub department_salaries: BTreeMap<String, f64>,
    /// Salary used for departments missing from `department_salaries`.
    pub default_annual_salary: Option<f64>,
    pub work_hours_per_year: f64,
    pub alerts: AlertThresholds,
    pub recommendations: RecommendationThresholds,
    /// How many departments the report ranks.
    pub top_departments: usize,
    /// How many projects the report lists by efficiency.
    pub top_efficient_projects: usize,
    /// Projects with `|profit| <= break_even_epsilon` count as break-even.
    pub break_even_epsilon: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            department_salaries: BTreeMap::new(),
            default_annual_salary: None,
            work_hours_per_year: 2080.0,
            alerts: AlertThresholds::default(),
            recommendations: RecommendationThresholds::default(),
            top_departments: 10,
            top_efficient_projects: 5,
            break_even_epsilon: 0.01,
        }
    }
}

impl EngineConfig {
    /// Default config file location (`~/.wtlfin/config.json`).
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("cannot determine home directory".into()))?;
        Ok(home.join(".wtlfin").join("config.json"))
    }

    /// Load from the default path, falling back to defaults when the file is absent.
    pub fn load_default() -> Result<Self> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load(&path)
        } else {
            log::debug!("No config file at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        let config: EngineConfig = serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        log::info!(
            "Loaded config from {} ({} department salaries)",
            path.display(),
            config.department_salaries.len()
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.work_hours_per_year.is_finite() && self.work_hours_per_year > 0.0) {
            return Err(Error::Config(format!(
                "work_hours_per_year must be positive, got {}",
                self.work_hours_per_year
            )));
        }
        for (dept, salary) in &self.department_salaries {
            if !(salary.is_finite() && *salary >= 0.0) {
                return Err(Error::Config(format!(
                    "salary for {dept} must be non-negative, got {salary}"
                )));
            }
        }
        if let Some(s) = self.default_annual_salary {
            if !(s.is_finite() && s >= 0.0) {
                return Err(Error::Config(format!(
                    "default_annual_salary must be non-negative, got {s}"
                )));
            }
        }
        if !self.alerts.efficiency_cutoff.is_finite() {
            return Err(Error::Config("alert.efficiency_cutoff must be finite".into()));
        }
        if !(self.break_even_epsilon.is_finite() && self.break_even_epsilon >= 0.0) {
            return Err(Error::Config(
                "break_even_epsilon must be non-negative".into(),
            ));
        }
        for (key, value) in self.recommendations.fields() {
            if !(value.is_finite() && value >= 0.0) {
                return Err(Error::Config(format!("{key} must be non-negative, got {value}")));
            }
        }
        sql_limit("report.top_departments", self.top_departments)?;
        sql_limit("report.top_efficient_projects", self.top_efficient_projects)?;
        Ok(())
    }

    /// Hourly rate for a department, or `None` if it has no salary configured.
    pub fn hourly_rate(&self, department: &str) -> Option<f64> {
        self.department_salaries
            .get(department)
            .copied()
            .or(self.default_annual_salary)
            .map(|salary| salary / self.work_hours_per_year)
    }

    /// Whether `key` names a setting that [`apply_override`](Self::apply_override) understands.
    pub fn is_override_key(key: &str) -> bool {
        matches!(
            key,
            "work_hours_per_year"
                | "default_annual_salary"
                | "alert.efficiency_cutoff"
                | "alert.loss_count_trigger"
                | "alert.low_efficiency_count_trigger"
                | "report.top_departments"
                | "report.top_efficient_projects"
                | "break_even_epsilon"
                | "recommend.efficiency_std_dev"
                | "recommend.gs_fail_rate_pct"
                | "recommend.overload_multiplier"
                | "recommend.low_margin_pct"
                | "recommend.labor_share_pct"
        ) || key.strip_prefix("salary.").is_some_and(|d| !d.is_empty())
    }

    /// Apply one `app_config` override. Returns `false` for keys that are not
    /// engine settings.
    pub fn apply_override(&mut self, key: &str, value: &str) -> Result<bool> {
        match key {
            "work_hours_per_year" => self.work_hours_per_year = parse_value(key, value)?,
            "default_annual_salary" => {
                self.default_annual_salary = if value.trim().is_empty() {
                    None
                } else {
                    Some(parse_value(key, value)?)
                }
            }
            "alert.efficiency_cutoff" => self.alerts.efficiency_cutoff = parse_value(key, value)?,
            "alert.loss_count_trigger" => self.alerts.loss_count_trigger = parse_value(key, value)?,
            "alert.low_efficiency_count_trigger" => {
                self.alerts.low_efficiency_count_trigger = parse_value(key, value)?
            }
            "report.top_departments" => self.top_departments = parse_value(key, value)?,
            "report.top_efficient_projects" => {
                self.top_efficient_projects = parse_value(key, value)?
            }
            "break_even_epsilon" => self.break_even_epsilon = parse_value(key, value)?,
            _ if key.starts_with("recommend.") => {
                let parsed: f64 = parse_value(key, value)?;
                match self.recommendations.field_mut(key) {
                    Some(field) => *field = parsed,
                    None => return Ok(false),
                }
            }
            _ => match key.strip_prefix("salary.") {
                Some(dept) if !dept.is_empty() => {
                    let salary: f64 = parse_value(key, value)?;
                    self.department_salaries.insert(dept.to_string(), salary);
                }
                _ => return Ok(false),
            },
        }
        Ok(true)
    }

    /// Return a copy with every recognised override applied, then validated.
    pub fn with_overrides(&self, overrides: &[(String, String)]) -> Result<Self> {
        let mut config = self.clone();
        for (key, value) in overrides {
            if !config.apply_override(key, value)? {
                log::debug!("Ignoring non-engine config key {key}");
            }
        }
        config.validate()?;
        Ok(config)
    }
}

/// A row count as an SQL `LIMIT`; SQLite treats negative limits as unbounded.
pub(crate) fn sql_limit(key: &str, n: usize) -> Result<i64> {
    i64::try_from(n).map_err(|_| Error::Config(format!("{key} is too large: {n}")))
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("invalid value for {key}: {value:?}")))
}
