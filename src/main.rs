//! crash-monitor - live terminal dashboard for crash game outcomes
//!
//! Reads from a Supabase table or a Firebase Realtime Database path.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crash_monitor::{
    app::App,
    config::Config,
    export,
    filter::{FilterInputs, TimeRange},
    source,
    view::{self, TableBody},
};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::info;

#[derive(Parser)]
#[command(name = "crash-monitor")]
#[command(version, about = "Live dashboard for crash game outcomes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

/// Filter flags shared by the one-shot commands
#[derive(clap::Args)]
struct FilterArgs {
    /// Minimum numeric value (inclusive)
    #[arg(long)]
    min: Option<f64>,

    /// Maximum numeric value (inclusive)
    #[arg(long)]
    max: Option<f64>,

    /// Time window: all, 1h, 24h, 7d
    #[arg(long, default_value = "all")]
    range: TimeRange,
}

impl FilterArgs {
    fn inputs(&self) -> FilterInputs {
        FilterInputs {
            min_value: self.min.map(|v| v.to_string()).unwrap_or_default(),
            max_value: self.max.map(|v| v.to_string()).unwrap_or_default(),
            time_range: self.range,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start the interactive dashboard
    Watch,

    /// Fetch once and print the filtered table
    Snapshot {
        #[command(flatten)]
        filter: FilterArgs,

        /// Rows to print
        #[arg(short, long, default_value_t = 50)]
        limit: usize,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Fetch once and write the filtered records as CSV
    Export {
        #[command(flatten)]
        filter: FilterArgs,

        /// Output directory (defaults to export.directory)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Show configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let interactive = matches!(cli.command, None | Some(Commands::Watch));
    init_logging(cli.verbose, interactive)?;

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Some(Commands::Watch) | None => cmd_watch(config).await,
        Some(Commands::Snapshot {
            filter,
            limit,
            format,
        }) => cmd_snapshot(config, filter, limit, format).await,
        Some(Commands::Export { filter, out }) => cmd_export(config, filter, out).await,
        Some(Commands::Config) => cmd_config(config, cli.config),
    }
}

/// The dashboard owns the terminal, so it logs to a file instead
fn init_logging(verbose: bool, to_file: bool) -> Result<()> {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    if to_file {
        let path = Config::log_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening log file {}", path.display()))?;

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .compact()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .compact()
            .init();
    }

    Ok(())
}

/// Start interactive dashboard
async fn cmd_watch(config: Config) -> Result<()> {
    info!("Starting crash-monitor dashboard...");

    let source = source::from_config(&config).context("setting up record source")?;
    info!("✓ Record source ready ({})", source.name());

    let app = App::new(source, &config);
    crash_monitor::tui::run(app).await
}

/// Fetch the full window once and filter it
async fn fetch_filtered(
    config: &Config,
    filter: &FilterArgs,
) -> Result<Vec<crash_monitor::record::Record>> {
    let source = source::from_config(config)?;
    let records = source
        .fetch_recent(config.dashboard.buffer_capacity)
        .await
        .context("fetching records")?;
    info!("Fetched {} records from {}", records.len(), source.name());

    let inputs = filter.inputs();
    let now = chrono::Utc::now();
    Ok(if inputs.is_active() {
        inputs.parse().apply(&records, now)
    } else {
        records
    })
}

/// Print one filtered snapshot
async fn cmd_snapshot(
    config: Config,
    filter: FilterArgs,
    limit: usize,
    format: String,
) -> Result<()> {
    let records = fetch_filtered(&config, &filter).await?;

    match format.as_str() {
        "json" => {
            let shown: Vec<_> = records.iter().take(limit).collect();
            println!("{}", serde_json::to_string_pretty(&shown)?);
        }
        _ => {
            println!("Records: {}\n", records.len());
            match view::table(&records, limit, None) {
                TableBody::Placeholder(text) => println!("  {}", text),
                TableBody::Rows(rows) => {
                    println!(
                        "  {:<20} {:>12} {:>10}  {}",
                        "Time", "Crash Value", "Numeric", "Status"
                    );
                    for row in rows {
                        println!(
                            "  {:<20} {:>12} {:>10}  {}",
                            row.time,
                            row.crash_value,
                            row.numeric_value,
                            row.severity.label()
                        );
                    }
                }
            }
        }
    }

    Ok(())
}

/// Write one filtered snapshot as CSV
async fn cmd_export(config: Config, filter: FilterArgs, out: Option<PathBuf>) -> Result<()> {
    let records = fetch_filtered(&config, &filter).await?;

    let contents = match export::to_csv(&records) {
        Ok(contents) => contents,
        Err(e) => {
            println!("✗ {}", e);
            return Ok(());
        }
    };

    let dir = out.unwrap_or(config.export.directory);
    let name = export::file_name(chrono::Utc::now().date_naive());
    let path = export::write_file(&dir, &name, &contents)?;
    println!("✓ Exported {} records to {}", records.len(), path.display());

    Ok(())
}

/// Show configuration
fn cmd_config(config: Config, path: Option<PathBuf>) -> Result<()> {
    let path = path.unwrap_or_else(Config::default_path);

    println!("Configuration file: {}", path.display());
    if !path.exists() {
        println!("# Default configuration (not yet saved)");
    }
    println!();

    let mut shown = config;
    if !shown.source.api_key.is_empty() {
        shown.source.api_key = "<redacted>".to_string();
    }
    println!("{}", shown.to_toml()?);
    println!("# Log file: {}", Config::log_path().display());

    Ok(())
}
