//! Raw panel → regression-ready panel.
//!
//! Derivation order is fixed and deterministic: validate keys → stable sort
//! by (entity, period) → row-wise lags → profitability ratio → controls.
//! The per-specification sample filter is separate ([`regression_sample`])
//! because different specifications retain different row counts.

use pf_core::{Error, PanelTable, Result};
use serde::{Deserialize, Serialize};

/// Column names and lag depths for the preparer, passed at call time.
///
/// The defaults match the usual firm-year layout (Compustat-style field
/// names for the income proxies). There is no process-wide state; callers
/// that need different names construct a different config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrepareConfig {
    /// Fraction of the entity's facilities affected by an event in the
    /// period, in [0, 1].
    pub exposure: String,
    /// Total assets.
    pub total_assets: String,
    /// Net income.
    pub net_income: String,
    /// Operating income before depreciation (preferred ratio numerator).
    pub operating_income: String,
    /// Income before extraordinary items (first fallback, with
    /// depreciation added back).
    pub pre_extra_income: String,
    /// Depreciation and amortization.
    pub depreciation: String,
    /// Total debt.
    pub total_debt: String,
    /// Lag depths to build for the exposure column.
    pub exposure_lags: Vec<usize>,
}

impl Default for PrepareConfig {
    fn default() -> Self {
        Self {
            exposure: "affected_ratio".into(),
            total_assets: "total_assets".into(),
            net_income: "net_income".into(),
            operating_income: "oibdp".into(),
            pre_extra_income: "ib".into(),
            depreciation: "dp".into(),
            total_debt: "total_debt".into(),
            exposure_lags: vec![1, 2],
        }
    }
}

/// Value of `column` at the k-th prior *observed* row for the same entity.
///
/// The lag basis is consecutive rows per entity in period order, not the
/// calendar: an entity observed in periods [1, 2, 3, 5] gets, at period 5,
/// the period-3 value for `k = 1`. Gaps therefore yield the nearest
/// available prior observation. This matches the source study's behavior
/// and is kept deliberately rather than "fixed" to a calendar lag. Rows
/// with fewer than `k` prior observations get NaN.
///
/// The result is keyed to the table's current row order but is independent
/// of it: the per-entity sequence is resolved by period, not position.
pub fn lag_column(table: &PanelTable, column: &str, k: usize) -> Result<Vec<f64>> {
    if k == 0 {
        return Err(Error::Validation("lag depth k must be >= 1".into()));
    }
    let values = table
        .column(column)
        .ok_or_else(|| Error::Configuration(format!("column not found: {column}")))?;

    let mut out = vec![f64::NAN; table.n_rows()];
    for rows in table.entity_row_groups() {
        for j in k..rows.len() {
            out[rows[j]] = values[rows[j - k]];
        }
    }
    Ok(out)
}

/// NaN-propagating division: NaN when the denominator is missing or zero.
/// Never raises and never produces ±inf from a zero denominator.
fn safe_div(num: f64, den: f64) -> f64 {
    if den.is_nan() || den == 0.0 {
        f64::NAN
    } else {
        num / den
    }
}

/// Resolve the profitability-ratio numerator with the documented fallback
/// chain: operating income → income before extraordinary items plus
/// depreciation → raw net income. Each reduced-fidelity tier is logged.
fn ratio_numerator(table: &PanelTable, cfg: &PrepareConfig) -> Vec<f64> {
    if let Some(oibdp) = table.column(&cfg.operating_income) {
        return oibdp.to_vec();
    }
    if let (Some(ib), Some(dp)) = (table.column(&cfg.pre_extra_income), table.column(&cfg.depreciation)) {
        log::warn!(
            "column {} absent; approximating the ratio numerator as {} + {}",
            cfg.operating_income,
            cfg.pre_extra_income,
            cfg.depreciation
        );
        return ib.iter().zip(dp).map(|(a, b)| a + b).collect();
    }
    log::warn!(
        "columns {} and {}+{} absent; falling back to raw {} for the ratio numerator",
        cfg.operating_income,
        cfg.pre_extra_income,
        cfg.depreciation,
        cfg.net_income
    );
    table.column(&cfg.net_income).map(<[f64]>::to_vec).unwrap_or_default()
}

/// Transform a raw entity-period table into a regression-ready one.
///
/// Adds, in order: `{exposure}_lag{k}` for each configured depth,
/// `{total_assets}_lag1`, `roa` (numerator over lagged total assets),
/// `roa_contemporaneous` (net income over same-period assets, kept for
/// comparison), `log_assets`, and `leverage`. The output is sorted by
/// (entity, period); input row order does not affect the result.
///
/// # Errors
///
/// - [`Error::Configuration`] when a required column is absent.
/// - [`Error::Validation`] when an (entity, period) key is duplicated.
pub fn prepare(table: &PanelTable, cfg: &PrepareConfig) -> Result<PanelTable> {
    for required in [&cfg.exposure, &cfg.total_assets, &cfg.net_income, &cfg.total_debt] {
        if !table.has_column(required) {
            return Err(Error::Configuration(format!("required column not found: {required}")));
        }
    }
    if let Some((entity, period)) = table.duplicate_key() {
        return Err(Error::Validation(format!(
            "duplicate (entity, period) observation: ({entity}, {period})"
        )));
    }

    let mut out = table.clone();
    out.sort_by_entity_period();

    for &k in &cfg.exposure_lags {
        let lagged = lag_column(&out, &cfg.exposure, k)?;
        out.add_column(format!("{}_lag{}", cfg.exposure, k), lagged)?;
    }

    let assets_lag1_name = format!("{}_lag1", cfg.total_assets);
    let assets_lag1 = lag_column(&out, &cfg.total_assets, 1)?;
    out.add_column(assets_lag1_name.clone(), assets_lag1)?;

    let numerator = ratio_numerator(&out, cfg);
    let denominator = out.column(&assets_lag1_name).unwrap();
    let roa: Vec<f64> =
        numerator.iter().zip(denominator).map(|(&n, &d)| safe_div(n, d)).collect();

    let net_income = out.column(&cfg.net_income).unwrap();
    let assets = out.column(&cfg.total_assets).unwrap();
    let roa_contemporaneous: Vec<f64> =
        net_income.iter().zip(assets).map(|(&n, &d)| safe_div(n, d)).collect();

    // ln of non-positive assets is NaN by IEEE semantics; treat as missing.
    let log_assets: Vec<f64> =
        assets.iter().map(|&a| if a > 0.0 { a.ln() } else { f64::NAN }).collect();

    let debt = out.column(&cfg.total_debt).unwrap();
    let leverage: Vec<f64> = debt.iter().zip(assets).map(|(&d, &a)| safe_div(d, a)).collect();

    out.add_column("roa", roa)?;
    out.add_column("roa_contemporaneous", roa_contemporaneous)?;
    out.add_column("log_assets", log_assets)?;
    out.add_column("leverage", leverage)?;
    Ok(out)
}

/// Keep only rows with no missing value among `required` columns.
///
/// Applied per specification, not once globally: different specifications
/// retain different row counts. Returns the filtered table and the number
/// of dropped rows.
pub fn regression_sample(table: &PanelTable, required: &[String]) -> Result<(PanelTable, usize)> {
    let mut cols = Vec::with_capacity(required.len());
    for name in required {
        cols.push(
            table
                .column(name)
                .ok_or_else(|| Error::Configuration(format!("column not found: {name}")))?,
        );
    }
    let keep: Vec<bool> =
        (0..table.n_rows()).map(|i| cols.iter().all(|c| c[i].is_finite())).collect();
    let kept = keep.iter().filter(|&&k| k).count();
    let filtered = table.filter_rows(&keep)?;
    Ok((filtered, table.n_rows() - kept))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(entities: &[(&str, &[i64])]) -> PanelTable {
        let mut e = Vec::new();
        let mut p = Vec::new();
        for (name, periods) in entities {
            for &t in *periods {
                e.push((*name).to_string());
                p.push(t);
            }
        }
        PanelTable::new(e, p).unwrap()
    }

    fn with_defaults(mut t: PanelTable, exposure: Vec<f64>) -> PanelTable {
        let n = t.n_rows();
        t.add_column("affected_ratio", exposure).unwrap();
        t.add_column("total_assets", vec![100.0; n]).unwrap();
        t.add_column("net_income", vec![10.0; n]).unwrap();
        t.add_column("total_debt", vec![50.0; n]).unwrap();
        t
    }

    #[test]
    fn lag_uses_prior_observed_row_not_calendar() {
        // Entity A has a gap at period 4; entity B has two periods.
        let t = raw(&[("A", &[1, 2, 3, 5]), ("B", &[1, 2])]);
        let t = with_defaults(t, vec![0.1, 0.2, 0.3, 0.5, 0.7, 0.8]);

        let lag1 = lag_column(&t, "affected_ratio", 1).unwrap();
        // A at period 5 gets the period-3 value (prior observed row).
        assert_eq!(lag1[3], 0.3);
        // First observed period per entity has no lag.
        assert!(lag1[0].is_nan());
        assert!(lag1[4].is_nan());
        assert_eq!(lag1[1], 0.1);
        assert_eq!(lag1[5], 0.7);
    }

    #[test]
    fn lag_two_needs_two_prior_rows() {
        let t = raw(&[("A", &[1, 2, 3])]);
        let t = with_defaults(t, vec![0.1, 0.2, 0.3]);
        let lag2 = lag_column(&t, "affected_ratio", 2).unwrap();
        assert!(lag2[0].is_nan());
        assert!(lag2[1].is_nan());
        assert_eq!(lag2[2], 0.1);
    }

    #[test]
    fn lag_rejects_zero_depth_and_unknown_column() {
        let t = with_defaults(raw(&[("A", &[1])]), vec![0.0]);
        assert!(lag_column(&t, "affected_ratio", 0).is_err());
        assert!(matches!(
            lag_column(&t, "missing", 1),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn prepare_is_order_invariant() {
        let sorted = with_defaults(
            raw(&[("A", &[1, 2, 3]), ("B", &[1, 2])]),
            vec![0.1, 0.2, 0.3, 0.4, 0.5],
        );
        // Same logical panel, shuffled row order.
        let mut shuffled = PanelTable::new(
            vec!["B".into(), "A".into(), "A".into(), "B".into(), "A".into()],
            vec![2, 3, 1, 1, 2],
        )
        .unwrap();
        shuffled.add_column("affected_ratio", vec![0.5, 0.3, 0.1, 0.4, 0.2]).unwrap();
        shuffled.add_column("total_assets", vec![100.0; 5]).unwrap();
        shuffled.add_column("net_income", vec![10.0; 5]).unwrap();
        shuffled.add_column("total_debt", vec![50.0; 5]).unwrap();

        let cfg = PrepareConfig::default();
        let a = prepare(&sorted, &cfg).unwrap();
        let b = prepare(&shuffled, &cfg).unwrap();

        assert_eq!(a.entity(), b.entity());
        assert_eq!(a.period(), b.period());
        for name in a.column_names() {
            let xa = a.column(name).unwrap();
            let xb = b.column(name).unwrap();
            for (va, vb) in xa.iter().zip(xb) {
                assert!((va == vb) || (va.is_nan() && vb.is_nan()), "{name}: {va} vs {vb}");
            }
        }
    }

    #[test]
    fn ratio_propagates_missing_and_zero_denominator() {
        let mut t = raw(&[("A", &[1, 2, 3])]);
        t.add_column("affected_ratio", vec![0.1, 0.2, 0.3]).unwrap();
        // Period-2 assets are zero, so the period-3 lagged denominator is zero.
        t.add_column("total_assets", vec![100.0, 0.0, 120.0]).unwrap();
        t.add_column("net_income", vec![10.0, 11.0, 12.0]).unwrap();
        t.add_column("total_debt", vec![50.0, 50.0, 50.0]).unwrap();

        let out = prepare(&t, &PrepareConfig::default()).unwrap();
        let roa = out.column("roa").unwrap();
        assert!(roa[0].is_nan(), "no lagged denominator at first period");
        assert!((roa[1] - 11.0 / 100.0).abs() < 1e-12);
        assert!(roa[2].is_nan(), "zero denominator must yield NaN, not inf");
        assert!(!roa.iter().any(|v| v.is_infinite()));

        // Zero-asset row: log and leverage are missing, not errors.
        let log_assets = out.column("log_assets").unwrap();
        let leverage = out.column("leverage").unwrap();
        assert!(log_assets[1].is_nan());
        assert!(leverage[1].is_nan());
    }

    #[test]
    fn numerator_prefers_operating_income_then_approximation() {
        let base = with_defaults(raw(&[("A", &[1, 2])]), vec![0.1, 0.2]);

        // Tier 1: oibdp present.
        let mut t1 = base.clone();
        t1.add_column("oibdp", vec![40.0, 44.0]).unwrap();
        let out1 = prepare(&t1, &PrepareConfig::default()).unwrap();
        assert!((out1.column("roa").unwrap()[1] - 44.0 / 100.0).abs() < 1e-12);

        // Tier 2: ib + dp approximation.
        let mut t2 = base.clone();
        t2.add_column("ib", vec![30.0, 33.0]).unwrap();
        t2.add_column("dp", vec![5.0, 6.0]).unwrap();
        let out2 = prepare(&t2, &PrepareConfig::default()).unwrap();
        assert!((out2.column("roa").unwrap()[1] - 39.0 / 100.0).abs() < 1e-12);

        // Tier 3: raw net income.
        let out3 = prepare(&base, &PrepareConfig::default()).unwrap();
        assert!((out3.column("roa").unwrap()[1] - 10.0 / 100.0).abs() < 1e-12);
    }

    #[test]
    fn prepare_rejects_duplicates_and_missing_columns() {
        let dup = with_defaults(raw(&[("A", &[1, 1])]), vec![0.1, 0.2]);
        assert!(matches!(
            prepare(&dup, &PrepareConfig::default()),
            Err(Error::Validation(_))
        ));

        let mut missing = raw(&[("A", &[1])]);
        missing.add_column("affected_ratio", vec![0.1]).unwrap();
        assert!(matches!(
            prepare(&missing, &PrepareConfig::default()),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn regression_sample_filters_per_specification() {
        let t = with_defaults(
            raw(&[("A", &[1, 2, 3]), ("B", &[1, 2, 3])]),
            vec![0.0, 0.5, 1.0, 0.2, 0.2, 0.2],
        );
        let out = prepare(&t, &PrepareConfig::default()).unwrap();

        let (narrow, dropped_narrow) =
            regression_sample(&out, &["roa".into(), "affected_ratio_lag1".into()]).unwrap();
        // First period per entity lacks both lag and denominator.
        assert_eq!(narrow.n_rows(), 4);
        assert_eq!(dropped_narrow, 2);

        let (wide, dropped_wide) =
            regression_sample(&out, &["roa".into(), "affected_ratio_lag2".into()]).unwrap();
        assert_eq!(wide.n_rows(), 2);
        assert_eq!(dropped_wide, 4);

        assert!(matches!(
            regression_sample(&out, &["nope".into()]),
            Err(Error::Configuration(_))
        ));
    }
}
