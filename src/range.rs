use std::sync::LazyLock;

use chrono::{Datelike, Duration, NaiveDate};
use regex::Regex;

use crate::date_util::{first_day_of_month, last_day_of_month, parse_date, quarter_of, today};
use crate::error::{Error, Result};

static RE_QUARTER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-Q([1-4])$").unwrap());
static RE_MONTH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})$").unwrap());
static RE_DAY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());
static RE_ROLLING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{1,5})[dD]$").unwrap());

/// An inclusive report date range resolved from a period expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Canonical form of the expression, e.g. `2024-Q3` or `30d`.
    pub label: String,
}

impl ReportRange {
    /// Parse a period expression relative to the local date.
    pub fn parse(s: &str) -> Result<Self> {
        Self::parse_at(s, today())
    }

    /// Parse a period expression relative to `as_of`.
    ///
    /// Supported formats:
    /// - `mtd`, `qtd`, `ytd` — month/quarter/year to date
    /// - `30d` — rolling last N days ending on `as_of`
    /// - `2024` — calendar year
    /// - `2024-Q3` — quarter
    /// - `2024-07` — month
    /// - `2024-07-01` — single day
    /// - `2024-07-01..2024-07-31` — explicit inclusive range
    pub fn parse_at(s: &str, as_of: NaiveDate) -> Result<Self> {
        let s = s.trim();

        match s.to_lowercase().as_str() {
            "mtd" => return Self::new(first_day_of_month(as_of), as_of, "mtd"),
            "qtd" => {
                let start_month = (quarter_of(as_of) as u32 - 1) * 3 + 1;
                return Self::new(ymd(as_of.year(), start_month, 1)?, as_of, "qtd");
            }
            "ytd" => return Self::new(ymd(as_of.year(), 1, 1)?, as_of, "ytd"),
            _ => {}
        }

        if let Some((from, to)) = s.split_once("..") {
            let start = parse_date(from.trim())?;
            let end = parse_date(to.trim())?;
            return Self::new(start, end, format!("{start}..{end}"));
        }

        if let Some(caps) = RE_ROLLING.captures(s) {
            let n: i64 = caps[1]
                .parse()
                .map_err(|_| Error::RangeParse(format!("invalid day count: {s}")))?;
            if n == 0 {
                return Err(Error::RangeParse("rolling range needs at least 1 day".into()));
            }
            return Self::new(as_of - Duration::days(n - 1), as_of, format!("{n}d"));
        }

        if s.len() == 4 {
            if let Ok(year) = s.parse::<i32>() {
                return Self::new(ymd(year, 1, 1)?, ymd(year, 12, 31)?, s);
            }
        }

        if let Some(caps) = RE_QUARTER.captures(s) {
            let year = year_capture(&caps[1])?;
            let q: u32 = caps[2]
                .parse()
                .map_err(|_| Error::RangeParse(format!("invalid quarter: {s}")))?;
            let start_month = (q - 1) * 3 + 1;
            return Self::new(
                ymd(year, start_month, 1)?,
                last_day_of_month(year, q * 3),
                format!("{year}-Q{q}"),
            );
        }

        if let Some(caps) = RE_MONTH.captures(s) {
            let year = year_capture(&caps[1])?;
            let month: u32 = caps[2]
                .parse()
                .map_err(|_| Error::RangeParse(format!("invalid month: {s}")))?;
            if (1..=12).contains(&month) {
                return Self::new(
                    ymd(year, month, 1)?,
                    last_day_of_month(year, month),
                    format!("{year}-{month:02}"),
                );
            }
        }

        if RE_DAY.is_match(s) {
            let day = parse_date(s)?;
            return Self::new(day, day, s);
        }

        Err(Error::RangeParse(format!("unrecognized period: {s}")))
    }

    /// Build a range from explicit bounds, rejecting `start > end`.
    pub fn new(start: NaiveDate, end: NaiveDate, label: impl Into<String>) -> Result<Self> {
        if start > end {
            return Err(Error::RangeParse(format!("start {start} is after end {end}")));
        }
        Ok(Self {
            start,
            end,
            label: label.into(),
        })
    }

    /// Month to date as of the local date; the report default.
    pub fn month_to_date() -> Self {
        let end = today();
        Self {
            start: first_day_of_month(end),
            end,
            label: "mtd".to_string(),
        }
    }
}

impl std::fmt::Display for ReportRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

fn ymd(year: i32, month: u32, day: u32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| Error::RangeParse(format!("invalid date {year}-{month:02}-{day:02}")))
}

fn year_capture(s: &str) -> Result<i32> {
    s.parse()
        .map_err(|_| Error::RangeParse(format!("invalid year: {s}")))
}
