//! CSV ingestion and report serialization for the CLI.
//!
//! All formatting lives here; the core crates only expose structured
//! records.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

use pf_core::PanelTable;
use pf_fit::ComparisonRow;

/// Read a panel from CSV. `entity_col` is kept as text; `period_col` must
/// parse as an integer; every other column is numeric, with empty cells
/// and the usual NA spellings read as missing.
pub fn read_panel_csv(path: &Path, entity_col: &str, period_col: &str) -> Result<PanelTable> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("cannot open input table {}", path.display()))?;

    let headers: Vec<String> = reader
        .headers()
        .with_context(|| format!("cannot read headers from {}", path.display()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let entity_idx = headers
        .iter()
        .position(|h| h == entity_col)
        .with_context(|| format!("entity column '{entity_col}' not found in {}", path.display()))?;
    let period_idx = headers
        .iter()
        .position(|h| h == period_col)
        .with_context(|| format!("period column '{period_col}' not found in {}", path.display()))?;

    let mut entity = Vec::new();
    let mut period = Vec::new();
    let value_cols: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != entity_idx && *i != period_idx)
        .map(|(i, h)| (i, h.clone()))
        .collect();
    let mut values: Vec<Vec<f64>> = vec![Vec::new(); value_cols.len()];

    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("bad CSV record at line {}", line + 2))?;
        entity.push(record.get(entity_idx).unwrap_or("").trim().to_string());
        let period_raw = record.get(period_idx).unwrap_or("").trim().to_string();
        period.push(
            period_raw
                .parse::<i64>()
                .with_context(|| format!("line {}: period '{period_raw}' is not an integer", line + 2))?,
        );
        for (slot, (idx, _)) in value_cols.iter().enumerate() {
            values[slot].push(parse_cell(record.get(*idx).unwrap_or("")));
        }
    }

    if entity.is_empty() {
        bail!("input table {} has no data rows", path.display());
    }

    let mut table = PanelTable::new(entity, period)?;
    for ((_, name), col) in value_cols.into_iter().zip(values) {
        table.add_column(name, col)?;
    }
    Ok(table)
}

fn parse_cell(raw: &str) -> f64 {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("na") || raw.eq_ignore_ascii_case("nan") {
        return f64::NAN;
    }
    raw.parse::<f64>().unwrap_or(f64::NAN)
}

/// Write a panel (keys plus every column) as CSV. Missing values become
/// empty cells.
pub fn write_panel_csv(path: &Path, table: &PanelTable, entity_col: &str, period_col: &str) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("cannot write {}", path.display()))?;

    let mut header = vec![entity_col.to_string(), period_col.to_string()];
    header.extend(table.column_names().iter().cloned());
    writer.write_record(&header)?;

    let columns: Vec<&[f64]> =
        table.column_names().iter().map(|n| table.column(n).unwrap()).collect();
    for i in 0..table.n_rows() {
        let mut row = vec![table.entity()[i].clone(), table.period()[i].to_string()];
        for col in &columns {
            row.push(format_cell(col[i]));
        }
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

fn format_cell(v: f64) -> String {
    if v.is_nan() {
        String::new()
    } else {
        format!("{v}")
    }
}

/// Write the cross-specification comparison as CSV, one row per
/// specification, failure markers included.
pub fn write_comparison_csv(path: &Path, rows: &[ComparisonRow]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("cannot write {}", path.display()))?;
    writer.write_record([
        "label",
        "coefficient",
        "std_error",
        "p_value",
        "r_squared",
        "n_obs",
        "entity_effects",
        "time_effects",
        "se_mode",
        "failed",
        "note",
    ])?;
    for row in rows {
        writer.write_record([
            row.label.clone(),
            opt_num(row.coefficient),
            opt_num(row.std_error),
            opt_num(row.p_value),
            opt_num(row.r_squared),
            row.n_obs.map(|n| n.to_string()).unwrap_or_default(),
            row.entity_effects.to_string(),
            row.time_effects.to_string(),
            row.se_mode.clone(),
            row.failed.to_string(),
            row.note.clone(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn opt_num(v: Option<f64>) -> String {
    v.map(|x| format!("{x:.6}")).unwrap_or_default()
}

/// Pretty JSON to a file, or to stdout when no path is given.
pub fn write_json(path: Option<&PathBuf>, value: &serde_json::Value) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    match path {
        Some(p) => std::fs::write(p, text + "\n")
            .with_context(|| format!("cannot write {}", p.display()))?,
        None => println!("{text}"),
    }
    Ok(())
}
