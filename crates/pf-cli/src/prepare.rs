use anyhow::{Context, Result};
use std::path::Path;

use pf_panel::PrepareConfig;

use crate::io::{read_panel_csv, write_panel_csv};

/// Load a preparer configuration, or defaults when no file was given.
pub fn load_prepare_config(path: Option<&Path>) -> Result<PrepareConfig> {
    match path {
        None => Ok(PrepareConfig::default()),
        Some(p) => {
            let text = std::fs::read_to_string(p)
                .with_context(|| format!("cannot read preparer config {}", p.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("invalid preparer config {}", p.display()))
        }
    }
}

pub fn cmd_prepare(
    input: &Path,
    output: &Path,
    entity_col: &str,
    period_col: &str,
    config: Option<&Path>,
) -> Result<()> {
    let cfg = load_prepare_config(config)?;
    let raw = read_panel_csv(input, entity_col, period_col)?;
    tracing::info!(
        rows = raw.n_rows(),
        entities = raw.n_entities(),
        "loaded raw panel from {}",
        input.display()
    );

    let enriched = pf_panel::prepare(&raw, &cfg)?;
    write_panel_csv(output, &enriched, entity_col, period_col)?;
    tracing::info!(
        rows = enriched.n_rows(),
        columns = enriched.column_names().len(),
        "wrote enriched panel to {}",
        output.display()
    );
    Ok(())
}
