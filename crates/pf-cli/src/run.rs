use anyhow::{bail, Context, Result};
use std::path::PathBuf;

use pf_fit::{baseline_ladder, comparison_table, run_batch, FeMode, RunConfig, Specification};

use crate::io::{read_panel_csv, write_comparison_csv, write_json};
use crate::prepare::load_prepare_config;

pub struct RunArgs {
    pub input: PathBuf,
    pub specs: Option<PathBuf>,
    pub ladder: bool,
    pub dependent: String,
    pub interest: Option<String>,
    pub controls: Vec<String>,
    pub fe_mode: FeMode,
    pub output: Option<PathBuf>,
    pub comparison: Option<PathBuf>,
    pub entity_col: String,
    pub period_col: String,
    pub config: Option<PathBuf>,
}

pub fn cmd_run(args: RunArgs) -> Result<()> {
    let prep_cfg = load_prepare_config(args.config.as_deref())?;
    let interest =
        args.interest.clone().unwrap_or_else(|| format!("{}_lag1", prep_cfg.exposure));

    let specs: Vec<Specification> = if let Some(path) = &args.specs {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read specifications {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("invalid specifications {}", path.display()))?
    } else if args.ladder {
        baseline_ladder(&args.dependent, &interest, &args.controls)
    } else {
        bail!("provide --specs <file> or --ladder");
    };
    if specs.is_empty() {
        bail!("specification list is empty");
    }

    let raw = read_panel_csv(&args.input, &args.entity_col, &args.period_col)?;
    let prepared = pf_panel::prepare(&raw, &prep_cfg)?;
    tracing::info!(
        rows = prepared.n_rows(),
        entities = prepared.n_entities(),
        specifications = specs.len(),
        "prepared panel, fitting batch"
    );

    let entries = run_batch(&prepared, &specs, &RunConfig { fe_mode: args.fe_mode });
    let n_failed = entries.iter().filter(|e| e.is_failed()).count();
    if n_failed > 0 {
        tracing::warn!("{n_failed} of {} specifications failed", entries.len());
    }

    let rows = comparison_table(&entries, &interest);
    if let Some(path) = &args.comparison {
        write_comparison_csv(path, &rows)?;
    }

    let output_json = serde_json::json!({
        "interest": interest,
        "n_specifications": entries.len(),
        "n_failed": n_failed,
        "prepared_rows": prepared.n_rows(),
        "prepared_entities": prepared.n_entities(),
        "entries": entries,
        "comparison": rows,
    });
    write_json(args.output.as_ref(), &output_json)
}
