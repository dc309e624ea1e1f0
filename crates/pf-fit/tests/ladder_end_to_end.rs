//! End-to-end: raw panel → preparer → specification ladder → comparison.

use pf_core::PanelTable;
use pf_fit::{baseline_ladder, comparison_table, run_batch, RunConfig, SeMode, Specification};
use pf_panel::{prepare, PrepareConfig};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

/// The two-firm fixture: entity A grows exposure 0 → 1, entity B is flat.
fn two_firm_panel() -> PanelTable {
    let mut t = PanelTable::new(
        vec!["A".into(), "A".into(), "A".into(), "B".into(), "B".into(), "B".into()],
        vec![1, 2, 3, 1, 2, 3],
    )
    .unwrap();
    t.add_column("affected_ratio", vec![0.0, 0.5, 1.0, 0.2, 0.2, 0.2]).unwrap();
    t.add_column("total_assets", vec![100.0, 110.0, 120.0, 50.0, 55.0, 60.0]).unwrap();
    t.add_column("net_income", vec![10.0, 11.0, 12.0, 5.0, 5.0, 5.0]).unwrap();
    t.add_column("total_debt", vec![40.0, 44.0, 48.0, 20.0, 22.0, 24.0]).unwrap();
    t
}

#[test]
fn two_firm_scenario_matches_hand_computation() {
    let prepared = prepare(&two_firm_panel(), &PrepareConfig::default()).unwrap();

    // Lagged assets: prior observed row per entity.
    let at_lag1 = prepared.column("total_assets_lag1").unwrap();
    assert!(at_lag1[0].is_nan());
    assert_eq!(at_lag1[1], 100.0);
    assert_eq!(at_lag1[2], 110.0);
    assert!(at_lag1[3].is_nan());
    assert_eq!(at_lag1[4], 50.0);

    // ROA for A at period 2 = 11 / 100 (net-income fallback numerator).
    let roa = prepared.column("roa").unwrap();
    assert!((roa[1] - 0.11).abs() < 1e-12);
    assert!(roa[0].is_nan());

    // Pooled OLS over the four rows with a defined lag.
    let spec = Specification {
        label: "pooled".into(),
        dependent: "roa".into(),
        regressors: vec!["affected_ratio_lag1".into()],
        entity_effects: false,
        time_effects: false,
        se_mode: SeMode::Plain,
    };
    let entries = run_batch(&prepared, &[spec], &RunConfig::default());
    let report = entries[0].report().expect("pooled fit should succeed");
    assert_eq!(report.n_obs, 4);
    assert_eq!(report.n_entities, 2);
    let slope = report.coefficient("affected_ratio_lag1").unwrap();
    assert!(slope.estimate.is_finite());
    assert!(slope.std_error.is_finite());
}

/// Deterministic synthetic panel large enough for the full ladder:
/// 30 entities × 8 periods, entity and period intercepts, a real negative
/// exposure effect on the outcome.
fn synthetic_panel() -> PanelTable {
    let mut rng = StdRng::seed_from_u64(20180907);
    let noise = Normal::new(0.0, 0.01).unwrap();
    let exposure_jitter = Normal::new(0.0, 0.15).unwrap();
    let asset_jitter: Normal<f64> = Normal::new(0.0, 0.08).unwrap();

    let n_entities = 30;
    let periods: Vec<i64> = (2016..2024).collect();

    let mut entity = Vec::new();
    let mut period = Vec::new();
    let mut affected = Vec::new();
    let mut assets = Vec::new();
    let mut income = Vec::new();
    let mut debt = Vec::new();

    for e in 0..n_entities {
        let entity_fe = 0.02 * (e as f64 % 5.0 - 2.0);
        let base_assets = 50.0 + 10.0 * e as f64;
        let mut prev_exposure = 0.0_f64;
        for (ti, &t) in periods.iter().enumerate() {
            let period_fe = 0.005 * ti as f64;
            let exp_t =
                (0.3 + exposure_jitter.sample(&mut rng) + 0.02 * (e % 3) as f64).clamp(0.0, 1.0);
            // Idiosyncratic asset paths keep the controls from collapsing
            // into the fixed effects.
            let at = base_assets
                * (1.0 + 0.03 * ti as f64)
                * (1.0 + asset_jitter.sample(&mut rng).clamp(-0.3, 0.3));
            // Outcome responds to last period's exposure.
            let roa_t = 0.12 - 0.05 * prev_exposure
                + entity_fe
                + period_fe
                + noise.sample(&mut rng);
            entity.push(format!("F{e:03}"));
            period.push(t);
            affected.push(exp_t);
            assets.push(at);
            income.push(roa_t * at);
            debt.push((0.3 + 0.02 * ((e + ti) % 5) as f64) * at);
            prev_exposure = exp_t;
        }
    }

    let net_income: Vec<f64> = income.iter().map(|v| 0.6 * v).collect();
    let mut t = PanelTable::new(entity, period).unwrap();
    t.add_column("affected_ratio", affected).unwrap();
    t.add_column("total_assets", assets).unwrap();
    t.add_column("oibdp", income).unwrap();
    t.add_column("net_income", net_income).unwrap();
    t.add_column("total_debt", debt).unwrap();
    t
}

#[test]
fn ladder_fits_all_four_specifications_in_order() {
    let prepared = prepare(&synthetic_panel(), &PrepareConfig::default()).unwrap();
    let specs = baseline_ladder(
        "roa",
        "affected_ratio_lag1",
        &["log_assets".into(), "leverage".into()],
    );
    let entries = run_batch(&prepared, &specs, &RunConfig::default());

    assert_eq!(entries.len(), 4);
    let labels: Vec<&str> = entries.iter().map(|e| e.label()).collect();
    assert_eq!(labels, vec!["pooled", "controls", "period FE", "entity + period FE"]);
    for entry in &entries {
        let report = entry.report().unwrap_or_else(|| panic!("{} failed", entry.label()));
        // First observed period per entity drops (no lag): 30 × 7 rows.
        assert_eq!(report.n_obs, 210);
        assert_eq!(report.n_entities, 30);
        let coef = report.coefficient("affected_ratio_lag1").unwrap();
        assert!(coef.estimate.is_finite());
        assert!(coef.std_error > 0.0);
        // The generated effect is negative and strong relative to noise.
        assert!(coef.estimate < 0.0, "{}: {}", report.label, coef.estimate);
    }

    // The tight specification absorbs entities by demeaning (30 > √210)
    // and clusters by entity.
    let tight = entries[3].report().unwrap();
    assert_eq!(tight.strategy, "within");
    assert_eq!(tight.n_clusters, Some(30));
    assert_eq!(tight.se_mode, "cluster(entity)");
}

#[test]
fn batch_with_deficient_middle_specification_keeps_all_rows() {
    let prepared = prepare(&synthetic_panel(), &PrepareConfig::default()).unwrap();
    let mut specs = baseline_ladder("roa", "affected_ratio_lag1", &["log_assets".into()]);
    // Duplicate the regressor in the middle specification to force a
    // singular design.
    specs[1].regressors = vec![
        "affected_ratio_lag1".into(),
        "affected_ratio_lag1".into(),
        "log_assets".into(),
    ];
    specs.truncate(3);

    let entries = run_batch(&prepared, &specs, &RunConfig::default());
    assert_eq!(entries.len(), 3);
    assert!(!entries[0].is_failed());
    assert!(entries[1].is_failed());
    assert!(!entries[2].is_failed());

    let rows = comparison_table(&entries, "affected_ratio_lag1");
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[1].label, "controls");
    assert!(rows[1].failed);
    assert!(rows[1].coefficient.is_none());
    assert!(rows[1].note.contains("rank-deficient"));
    assert!(rows[0].coefficient.is_some());
    assert!(rows[2].coefficient.is_some());
}
