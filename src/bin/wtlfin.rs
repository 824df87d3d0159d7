use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use wtlfin::date_util::{parse_date, today};
use wtlfin::report::{format_currency, render::render_text};
use wtlfin::{DuplicatePolicy, EngineConfig, ReportRange, WtlFinance};

#[derive(Parser)]
#[command(name = "wtlfin", about = "Project financial metrics and automated reports")]
struct Cli {
    /// Database path (default: ~/.wtlfin/wtlfin.db)
    #[arg(long)]
    db: Option<String>,

    /// Engine config file (default: ~/.wtlfin/config.json if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute summaries from the two feeds and store them for a report date
    Analyze {
        /// Work-hour entries (JSON array)
        #[arg(long)]
        work_hours: PathBuf,
        /// Project master records (JSON array)
        #[arg(long)]
        projects: PathBuf,
        /// Report date (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Replace summaries already stored for the date
        #[arg(long)]
        replace: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate the automated report over stored summaries
    Report {
        /// Period: mtd, qtd, ytd, 30d, 2024, 2024-Q3, 2024-07, 2024-07-01, or START..END
        #[arg(long, conflicts_with_all = ["from", "to"])]
        period: Option<String>,
        /// Start date (YYYY-MM-DD, default: first day of this month)
        #[arg(long)]
        from: Option<String>,
        /// End date (YYYY-MM-DD, default: today)
        #[arg(long)]
        to: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
        /// Write the report to a file and record it in the report log
        #[arg(long)]
        out: Option<PathBuf>,
        /// Report type recorded in the report log
        #[arg(long, default_value = "daily_summary")]
        report_type: String,
    },
    /// Print stored summaries for a period
    Fetch {
        /// Period expression (default: mtd)
        #[arg(long, default_value = "mtd")]
        period: String,
        /// Only department summaries
        #[arg(long)]
        departments: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the report log
    Log {
        /// Maximum entries
        #[arg(long, default_value = "20")]
        limit: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage configuration overrides
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show warehouse status
    Status,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// Remove a config override
    Unset { key: String },
    /// List all config overrides
    List,
    /// Print the effective engine configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let db = match &cli.db {
        Some(path) => wtlfin::Database::open_at(path).await?,
        None => wtlfin::Database::open().await?,
    };
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::load_default()?,
    };
    let wtl = WtlFinance::new(db, config);

    match cli.command {
        Commands::Analyze {
            work_hours,
            projects,
            date,
            replace,
            json,
        } => {
            let report_date = match date {
                Some(d) => parse_date(&d)?,
                None => today(),
            };
            handle_analyze(&wtl, &work_hours, &projects, report_date, replace, json).await?;
        }
        Commands::Report {
            period,
            from,
            to,
            json,
            out,
            report_type,
        } => {
            let (start, end) = match period {
                Some(p) => {
                    let range = ReportRange::parse(&p)?;
                    (Some(range.start), Some(range.end))
                }
                None => (
                    from.as_deref().map(parse_date).transpose()?,
                    to.as_deref().map(parse_date).transpose()?,
                ),
            };
            handle_report(&wtl, start, end, json, out, &report_type).await?;
        }
        Commands::Fetch {
            period,
            departments,
            json,
        } => {
            let range = ReportRange::parse(&period)?;
            handle_fetch(&wtl, &range, departments, json).await?;
        }
        Commands::Log { limit, json } => {
            let entries = wtl.report_log(limit).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if entries.is_empty() {
                println!("No reports logged.");
            } else {
                for e in &entries {
                    println!(
                        "#{:<5} {}  {:<16} {}  {}",
                        e.id,
                        e.created_at,
                        e.report_type,
                        e.report_date,
                        e.file_path.as_deref().unwrap_or("-")
                    );
                }
            }
        }
        Commands::Config { action } => {
            handle_config(&wtl, action).await?;
        }
        Commands::Status => {
            print_status(&wtl).await?;
        }
    }

    Ok(())
}

async fn handle_analyze(
    wtl: &WtlFinance,
    work_hours: &Path,
    projects: &Path,
    report_date: NaiveDate,
    replace: bool,
    json: bool,
) -> anyhow::Result<()> {
    let hours = wtlfin::input::load_work_hours(work_hours)?;
    let records = wtlfin::input::load_projects(projects)?;
    let policy = if replace {
        DuplicatePolicy::Replace
    } else {
        DuplicatePolicy::Reject
    };

    let run = wtl.analyze(report_date, &hours, &records, policy).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&run)?);
        return Ok(());
    }

    println!("Analysis for {report_date}");
    println!(
        "  Stored:     {} projects, {} departments",
        run.stored.financial_rows, run.stored.department_rows
    );
    if run.stored.replaced_rows > 0 {
        println!("  Replaced:   {} earlier rows", run.stored.replaced_rows);
    }
    let p = &run.profitability;
    println!(
        "  Profitable: {}  Loss-making: {}  Break-even: {}",
        p.profitable, p.loss_making, p.break_even
    );
    let total_profit: f64 = run.metrics.financial.iter().map(|r| r.profit).sum();
    println!("  Profit:     {}", format_currency(total_profit));
    if let (Some(mean), Some(median)) = (run.efficiency.mean, run.efficiency.median) {
        println!("  Efficiency: mean {mean:.1}/h, median {median:.1}/h");
    }

    let q = &run.metrics.data_quality;
    if q.is_clean() {
        println!("  Data quality: clean");
    } else {
        println!("  Data quality: {} gaps", q.gap_count());
        if !q.unmatched_project_codes.is_empty() {
            println!(
                "    Unmatched codes:     {} ({:.1} hours)",
                q.unmatched_project_codes.len(),
                q.unmatched_hours
            );
        }
        if !q.non_positive_contract_projects.is_empty() {
            println!("    Contract price <= 0: {}", q.non_positive_contract_projects.join(", "));
        }
        if !q.unpriced_departments.is_empty() {
            println!("    No salary for:       {}", q.unpriced_departments.join(", "));
        }
        if !q.duplicate_project_records.is_empty() {
            println!("    Duplicate records:   {}", q.duplicate_project_records.join(", "));
        }
        if q.invalid_entries > 0 {
            println!("    Invalid entries:     {}", q.invalid_entries);
        }
    }
    Ok(())
}

async fn handle_report(
    wtl: &WtlFinance,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    json: bool,
    out: Option<PathBuf>,
    report_type: &str,
) -> anyhow::Result<()> {
    let report = wtl.generate_report(start, end).await?;

    let as_json = json
        || out
            .as_ref()
            .and_then(|p| p.extension())
            .is_some_and(|ext| ext == "json");
    let body = if as_json {
        serde_json::to_string_pretty(&report)?
    } else {
        render_text(&report)
    };

    match out {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, &body)?;
            let path_str = path.display().to_string();
            let id = wtl.log_report(report_type, &report, Some(path_str.as_str())).await?;
            println!("Report written to {path_str} (log #{id})");
        }
        None => print!("{body}"),
    }
    Ok(())
}

async fn handle_fetch(
    wtl: &WtlFinance,
    range: &ReportRange,
    departments_only: bool,
    json: bool,
) -> anyhow::Result<()> {
    let set = wtl.fetch_summaries(range.start, range.end).await?;
    if json {
        if departments_only {
            println!("{}", serde_json::to_string_pretty(&set.departments)?);
        } else {
            println!("{}", serde_json::to_string_pretty(&set)?);
        }
        return Ok(());
    }

    println!("Summaries for {range}");
    if !departments_only {
        println!();
        println!(
            "{:<10}  {:<14}  {:<4}  {:<12}  {:>16}  {:>9}  {:>10}",
            "Date", "Project", "Type", "Status", "Profit", "Margin", "Hours"
        );
        for r in &set.financial {
            let margin = r
                .profit_margin
                .map_or_else(|| "n/a".to_string(), |m| format!("{m:.1}%"));
            println!(
                "{:<10}  {:<14}  {:<4}  {:<12}  {:>16}  {:>9}  {:>10.1}",
                r.report_date,
                r.project_code,
                r.project_type.as_str(),
                r.status.as_str(),
                format_currency(r.profit),
                margin,
                r.total_hours
            );
        }
    }
    println!();
    println!(
        "{:<10}  {:<20}  {:>10}  {:>16}  {:>8}  {:>6}  {:>10}",
        "Date", "Department", "Hours", "Labor cost", "Projects", "Tasks", "Proj eff"
    );
    for d in &set.departments {
        println!(
            "{:<10}  {:<20}  {:>10.1}  {:>16}  {:>8}  {:>6}  {:>10.1}",
            d.report_date,
            d.department_name,
            d.total_hours,
            format_currency(d.total_labor_cost),
            d.num_projects,
            d.num_tasks,
            d.avg_project_efficiency
        );
    }
    Ok(())
}

async fn print_status(wtl: &WtlFinance) -> anyhow::Result<()> {
    let status = wtl.status().await?;
    println!("Warehouse Status");
    println!("  Project rows:    {}", status.financial_rows);
    println!("  Department rows: {}", status.department_rows);
    println!("  Report dates:    {}", status.report_dates);
    println!(
        "  Latest date:     {}",
        status
            .latest_report_date
            .map_or_else(|| "never".to_string(), |d| d.to_string())
    );
    println!("  Reports logged:  {}", status.report_log_entries);
    Ok(())
}

async fn handle_config(wtl: &WtlFinance, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => match wtl.config_get(&key).await? {
            Some(v) => println!("{key} = {v}"),
            None => println!("{key} is not set"),
        },
        ConfigAction::Set { key, value } => {
            wtl.config_set(&key, &value).await?;
            println!("Config updated.");
        }
        ConfigAction::Unset { key } => {
            if wtl.config_unset(&key).await? {
                println!("Removed {key}.");
            } else {
                println!("{key} is not set");
            }
        }
        ConfigAction::List => {
            let items = wtl.config_list().await?;
            if items.is_empty() {
                println!("No config overrides set.");
            } else {
                for (k, v) in &items {
                    println!("{k} = {v}");
                }
            }
        }
        ConfigAction::Show => {
            let config = wtl.effective_config().await?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }
    Ok(())
}
