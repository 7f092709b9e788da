//! Cox survival dashboards
//!
//! Fits a proportional hazards model to a clinical table and prints the
//! summary, survival curves, Kaplan-Meier comparisons and what-if predictions.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use cox_survival::{predict::Assignment, Config};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::Session;

/// Cox survival dashboards
#[derive(Parser)]
#[command(name = "cox-survival")]
#[command(about = "Cox proportional hazards and Kaplan-Meier dashboards for a survival table")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ./cox-survival.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// CSV table, overrides the configured path
    #[arg(short, long, global = true)]
    data: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Coefficient table of the fitted model
    Summary,

    /// Predicted survival curves for the first rows of the table
    Curves {
        /// Number of rows to plot (uses the configured count if not given)
        #[arg(short, long)]
        rows: Option<usize>,
    },

    /// Kaplan-Meier curves split by a covariate
    Km {
        /// Covariate whose integer codes define the groups
        #[arg(short, long, default_value = "chemo")]
        group: String,
    },

    /// Relative hazard and survival curve for one patient
    Predict {
        /// Covariate value, e.g. `--set age=62` (repeatable)
        #[arg(short, long = "set", value_name = "NAME=VALUE")]
        set: Vec<Assignment>,

        /// Use only the given values instead of starting from the configured patient
        #[arg(long)]
        only: bool,
    },

    /// All panels in one go
    Dashboard {
        /// Covariate for the Kaplan-Meier panel
        #[arg(short, long, default_value = "chemo")]
        group: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(path) = cli.data {
        config.data.path = path;
    }

    let session = Session::open(config)?;

    match cli.command {
        Commands::Summary => commands::summary::run(&session),
        Commands::Curves { rows } => commands::curves::run(&session, rows),
        Commands::Km { group } => commands::km::run(&session, &group),
        Commands::Predict { set, only } => commands::predict::run(&session, &set, only),
        Commands::Dashboard { group } => commands::dashboard::run(&session, &group),
    }

    Ok(())
}
