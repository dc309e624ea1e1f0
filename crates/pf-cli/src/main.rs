//! panelfit CLI

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

mod io;
mod prepare;
mod run;

#[derive(Parser)]
#[command(name = "panelfit")]
#[command(about = "panelfit - firm-year panel preparation and regression batches")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

/// Fixed-effect strategy selection.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum FeModeArg {
    /// Pick per specification from axes and entity cardinality.
    Auto,
    /// Force indicator-column estimation.
    Dummies,
    /// Force within demeaning.
    Within,
}

impl From<FeModeArg> for pf_fit::FeMode {
    fn from(value: FeModeArg) -> Self {
        match value {
            FeModeArg::Auto => pf_fit::FeMode::Auto,
            FeModeArg::Dummies => pf_fit::FeMode::Dummies,
            FeModeArg::Within => pf_fit::FeMode::Within,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Derive lags, ratios and controls; write the enriched panel
    Prepare {
        /// Input panel (CSV with header row)
        #[arg(short, long)]
        input: PathBuf,

        /// Output CSV for the enriched panel
        #[arg(short, long)]
        output: PathBuf,

        /// Entity identifier column
        #[arg(long, default_value = "entity")]
        entity_col: String,

        /// Period column (integer)
        #[arg(long, default_value = "period")]
        period_col: String,

        /// Preparer configuration (JSON). Defaults used when omitted.
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Prepare the panel and fit a batch of specifications
    Run {
        /// Input panel (CSV with header row)
        #[arg(short, long)]
        input: PathBuf,

        /// Specifications file (JSON array)
        #[arg(long, conflicts_with = "ladder")]
        specs: Option<PathBuf>,

        /// Fit the canonical progression: pooled, + controls,
        /// + period FE, entity + period FE with clustered SEs
        #[arg(long)]
        ladder: bool,

        /// Dependent variable for --ladder
        #[arg(long, default_value = "roa")]
        dependent: String,

        /// Variable of interest for the comparison table (and the ladder
        /// regressor). Defaults to the first exposure lag.
        #[arg(long)]
        interest: Option<String>,

        /// Control columns for --ladder
        #[arg(long, value_delimiter = ',', default_values_t = default_controls())]
        controls: Vec<String>,

        /// Fixed-effect strategy
        #[arg(long, value_enum, default_value_t = FeModeArg::Auto)]
        fe_mode: FeModeArg,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also write the comparison table as CSV
        #[arg(long)]
        comparison: Option<PathBuf>,

        /// Entity identifier column
        #[arg(long, default_value = "entity")]
        entity_col: String,

        /// Period column (integer)
        #[arg(long, default_value = "period")]
        period_col: String,

        /// Preparer configuration (JSON). Defaults used when omitted.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn default_controls() -> Vec<String> {
    vec!["log_assets".to_string(), "leverage".to_string()]
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt().with_max_level(cli.log_level).init();

    match cli.command {
        Commands::Prepare { input, output, entity_col, period_col, config } => {
            prepare::cmd_prepare(&input, &output, &entity_col, &period_col, config.as_deref())
        }
        Commands::Run {
            input,
            specs,
            ladder,
            dependent,
            interest,
            controls,
            fe_mode,
            output,
            comparison,
            entity_col,
            period_col,
            config,
        } => run::cmd_run(run::RunArgs {
            input,
            specs,
            ladder,
            dependent,
            interest,
            controls,
            fe_mode: fe_mode.into(),
            output,
            comparison,
            entity_col,
            period_col,
            config,
        }),
    }
}
