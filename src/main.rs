use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::*;
use tabled::{Table, Tabled};
use tracing::error;

use paceline::{
    init_logging, load_config, AnalysisError, AnalysisPipeline, ActivityTable, LogConfig,
    LogFormat, LogLevel, LongitudinalSummary, Summarizer,
};

/// paceline - offline training analytics
///
/// Processes an activity catalog and its per-second sensor streams into
/// per-activity performance metrics and a longitudinal fitness model.
#[derive(Parser)]
#[command(name = "paceline")]
#[command(version = "0.1.0")]
#[command(about = "Training analytics for cycling and running data", long_about = None)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log output format (pretty, json, compact)
    #[arg(long, global = true, default_value = "pretty")]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process pending activities and write the enriched tables
    Run {
        /// Delete existing outputs and reprocess every activity
        #[arg(long)]
        force: bool,
    },

    /// Print the longitudinal summary for the current outputs
    Summary,

    /// Check the configuration and input files without writing anything
    Validate,
}

#[derive(Tabled)]
struct LoadRow {
    metric: &'static str,
    value: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LogLevel::Debug
    } else if cli.quiet {
        LogLevel::Error
    } else {
        LogLevel::Info
    };
    let format = cli.log_format.parse::<LogFormat>().unwrap_or(LogFormat::Pretty);
    if init_logging(&LogConfig {
        level,
        format,
        file_path: None,
    })
    .is_err()
    {
        eprintln!("failed to initialise logging");
    }

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            eprintln!("{} {}", "configuration error:".red().bold(), e);
            return ExitCode::from(2);
        }
    };

    let result = match cli.command {
        Commands::Run { force } => run_command(config, force),
        Commands::Summary => summary_command(config),
        Commands::Validate => validate_command(config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(AnalysisError::Configuration(e)) => {
            error!("{}", e);
            eprintln!("{} {}", "configuration error:".red().bold(), e);
            ExitCode::from(2)
        }
        Err(e) => {
            error!("{}", e);
            eprintln!("{} {}", "pipeline failed:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn run_command(config: paceline::AnalysisConfig, force: bool) -> paceline::Result<()> {
    if force {
        for path in [config.raw_table_path(), config.moving_table_path()] {
            if path.exists() {
                std::fs::remove_file(&path)?;
            }
        }
    }

    let pipeline = AnalysisPipeline::new(config);
    let outcome = pipeline.run_and_persist()?;

    print_banner(&outcome.summary, outcome.processed, outcome.skipped);
    Ok(())
}

fn summary_command(config: paceline::AnalysisConfig) -> paceline::Result<()> {
    let path = config.raw_table_path();
    if !path.exists() {
        return Err(AnalysisError::Processing(
            "no enriched output found; run `paceline run` first".to_string(),
        ));
    }

    let table = ActivityTable::read_csv(&path)?;
    let summary = Summarizer::new(&config).summarize(&table);
    print_banner(&summary, 0, 0);
    Ok(())
}

fn validate_command(config: paceline::AnalysisConfig) -> paceline::Result<()> {
    if !config.activities_file.exists() {
        return Err(AnalysisError::Configuration(format!(
            "activities file not found: {}",
            config.activities_file.display()
        )));
    }
    if !config.streams_dir.exists() {
        return Err(AnalysisError::Configuration(format!(
            "streams directory not found: {}",
            config.streams_dir.display()
        )));
    }

    let repository = paceline::ActivityRepository::new(&config);
    let activities = repository.supported_activities()?;
    let loader = paceline::loader::ActivityDataLoader::new(&config);
    let with_streams = activities
        .iter()
        .filter(|a| loader.stream_exists(a.id))
        .count();

    println!("{}", "configuration OK".green().bold());
    println!("  activities file: {}", config.activities_file.display());
    println!("  streams dir:     {}", config.streams_dir.display());
    println!("  output dir:      {}", config.processed_data_dir.display());
    println!(
        "  supported activities: {} ({} with stream files)",
        activities.len(),
        with_streams
    );
    Ok(())
}

fn print_banner(summary: &LongitudinalSummary, processed: usize, skipped: usize) {
    println!();
    println!("{}", "Analysis complete".green().bold());
    if processed > 0 || skipped > 0 {
        println!("  processed {} activities ({} skipped)", processed, skipped);
    }
    println!(
        "  {} activities, {:.1} km, {:.1} h moving",
        summary.total_activities,
        summary.total_distance / 1000.0,
        summary.total_time / 3600.0
    );
    println!();

    let load = &summary.training_load;
    let rows = vec![
        LoadRow {
            metric: "CTL (fitness)",
            value: format!("{:.1}", load.chronic_training_load),
        },
        LoadRow {
            metric: "ATL (fatigue)",
            value: format!("{:.1}", load.acute_training_load),
        },
        LoadRow {
            metric: "TSB (form)",
            value: format!("{:.1}", load.training_stress_balance),
        },
        LoadRow {
            metric: "ACWR",
            value: format!("{:.2}", load.acwr),
        },
        LoadRow {
            metric: "Status",
            value: load.status().to_string(),
        },
    ];
    println!("{}", Table::new(rows));
}
