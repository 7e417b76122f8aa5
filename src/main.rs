use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

mod config;
mod dataset;
mod error;
mod models;
mod pipeline;
mod report;
mod session;
mod telemetry;

use crate::dataset::DatasetCache;
use crate::error::DashboardError;
use crate::models::{FilterCriteria, FilterOptions};

#[derive(Parser)]
#[command(name = "sales-dashboard")]
#[command(about = "Sales dashboard figures from a pre-aggregated order dataset", long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./dashboard.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Order dataset CSV, overriding the configured path
    #[arg(long, global = true, env = "DASHBOARD_DATASET")]
    dataset: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the date bounds and category values available for filtering
    Options,
    /// Print KPIs and chart tables for a selection
    Summary {
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Write a markdown dashboard report
    Report {
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long, default_value = "dashboard.md")]
        out: PathBuf,
    },
    /// Write the dashboard figures as JSON chart data
    Export {
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long, default_value = "dashboard.json")]
        out: PathBuf,
    },
    /// Interactively adjust filters and re-render
    Session,
}

#[derive(Args, Debug, Default)]
struct FilterArgs {
    /// First purchase date to include (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,
    /// Last purchase date to include (YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,
    /// Order statuses to include; all when omitted
    #[arg(long, value_delimiter = ',')]
    status: Vec<String>,
    /// Payment methods to include; all when omitted
    #[arg(long, value_delimiter = ',')]
    payment: Vec<String>,
}

impl FilterArgs {
    fn criteria(&self, options: &FilterOptions) -> FilterCriteria {
        let mut criteria = options.default_criteria();

        if self.from.is_some() || self.to.is_some() {
            criteria.date_range = self.from.into_iter().chain(self.to).collect();
        }
        if !self.status.is_empty() {
            criteria.statuses = self.status.iter().cloned().collect();
        }
        if !self.payment.is_empty() {
            criteria.payment_types = self.payment.iter().cloned().collect();
        }

        criteria
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => match err.downcast_ref::<DashboardError>() {
            Some(DashboardError::DatasetNotFound { .. }) => {
                eprintln!("{err}");
                ExitCode::from(2)
            }
            _ => {
                eprintln!("error: {err:#}");
                ExitCode::FAILURE
            }
        },
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = config::load_config(cli.config.as_deref())?;
    telemetry::init(&config.log.filter);

    let path = cli.dataset.unwrap_or(config.dataset.path);
    let currency = config.display.currency_symbol.as_str();
    let mut cache = DatasetCache::new();

    match cli.command {
        Commands::Options => {
            let dataset = cache.get(&path)?;
            if dataset.is_empty() {
                tracing::warn!(path = %dataset.path().display(), "dataset has no rows");
            }
            let options = dataset.filter_options();
            println!("Order rows: {}", report::format_count(dataset.len()));
            let span = match (options.min_date, options.max_date) {
                (Some(min), Some(max)) => format!("{min} to {max}"),
                _ => "no orders".to_string(),
            };
            println!("Purchase dates: {span}");
            println!("Order statuses: {}", options.statuses.join(", "));
            println!("Payment methods: {}", options.payment_types.join(", "));
        }
        Commands::Summary { filters } => {
            let dataset = cache.get(&path)?;
            let criteria = filters.criteria(&dataset.filter_options());
            let view = pipeline::build_view(&dataset, &criteria);
            print!("{}", report::render_summary(&view, currency));
        }
        Commands::Report { filters, out } => {
            let dataset = cache.get(&path)?;
            let criteria = filters.criteria(&dataset.filter_options());
            let view = pipeline::build_view(&dataset, &criteria);
            let report = report::build_report(&dataset.path().display().to_string(), &view, currency);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Export { filters, out } => {
            let dataset = cache.get(&path)?;
            let criteria = filters.criteria(&dataset.filter_options());
            let view = pipeline::build_view(&dataset, &criteria);
            let json = serde_json::to_string_pretty(&view)?;
            std::fs::write(&out, json)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Dashboard data written to {}.", out.display());
        }
        Commands::Session => {
            let stdin = std::io::stdin();
            session::run(stdin.lock(), std::io::stdout(), &mut cache, &path, currency)?;
        }
    }

    Ok(())
}
