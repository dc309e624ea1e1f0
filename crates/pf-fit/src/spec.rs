//! Model specifications, the batch runner, and the comparison table.
//!
//! A batch of specifications is the study's empirical narrative: the same
//! estimate re-fit under progressively tighter designs (pooled, controls,
//! period effects, two-way effects). Each fit is independent over the
//! immutable prepared table; a specification that fails produces an
//! explicit failure record in its original position instead of aborting
//! the batch.

use pf_core::{Error, PanelTable, Result};
use pf_panel::regression_sample;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::design::BaseDesign;
use crate::fe::{select_strategy, FeMode};
use crate::ols::{fit_ols, t_critical_975, t_two_sided_p};

/// Standard-error mode for one specification.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeMode {
    /// Homoskedastic OLS standard errors.
    #[default]
    Plain,
    /// Cluster-robust, grouped by entity.
    ClusterEntity,
    /// Cluster-robust, grouped by the values of a named column
    /// (categorical codes).
    ClusterBy(String),
}

impl SeMode {
    /// Short flag for report rows.
    pub fn flag(&self) -> String {
        match self {
            SeMode::Plain => "plain".to_string(),
            SeMode::ClusterEntity => "cluster(entity)".to_string(),
            SeMode::ClusterBy(col) => format!("cluster({col})"),
        }
    }
}

/// One model specification: what to regress on what, under which
/// fixed-effect axes and standard-error mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Specification {
    /// Label shown in reports.
    pub label: String,
    /// Dependent variable column.
    pub dependent: String,
    /// Regressor columns, in reporting order.
    pub regressors: Vec<String>,
    /// Absorb entity-level intercepts.
    #[serde(default)]
    pub entity_effects: bool,
    /// Absorb period-level intercepts.
    #[serde(default)]
    pub time_effects: bool,
    /// Standard-error mode.
    #[serde(default)]
    pub se_mode: SeMode,
}

/// Runner options, passed at call time.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunConfig {
    /// Fixed-effect strategy selection.
    pub fe_mode: FeMode,
}

/// One reported coefficient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coefficient {
    /// Column name.
    pub name: String,
    /// Point estimate.
    pub estimate: f64,
    /// Standard error under the specification's SE mode.
    pub std_error: f64,
    /// t-statistic.
    pub t_stat: f64,
    /// Two-sided p-value (Student's t, residual df).
    pub p_value: f64,
    /// 95% confidence interval, lower bound.
    pub ci_lower: f64,
    /// 95% confidence interval, upper bound.
    pub ci_upper: f64,
}

/// Result of one fitted specification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitReport {
    /// Specification label.
    pub label: String,
    /// Dependent variable.
    pub dependent: String,
    /// Reported coefficients: intercept (when present) then the named
    /// regressors. Fixed-effect terms are estimated but not reported.
    pub coefficients: Vec<Coefficient>,
    /// R² — within-R² when effects were absorbed by demeaning.
    pub r_squared: f64,
    /// Rows retained by this specification's sample filter.
    pub n_obs: usize,
    /// Rows dropped by the filter.
    pub n_dropped: usize,
    /// Distinct entities retained.
    pub n_entities: usize,
    /// Residual degrees of freedom.
    pub df_resid: usize,
    /// Entity fixed effects requested.
    pub entity_effects: bool,
    /// Period fixed effects requested.
    pub time_effects: bool,
    /// Standard-error mode flag.
    pub se_mode: String,
    /// Fixed-effect strategy actually used ("none", "dummies", "within").
    pub strategy: String,
    /// Number of clusters, when clustering was requested.
    pub n_clusters: Option<usize>,
}

impl FitReport {
    /// Reported coefficient for a named regressor, if present.
    pub fn coefficient(&self, name: &str) -> Option<&Coefficient> {
        self.coefficients.iter().find(|c| c.name == name)
    }
}

/// One entry of a batch run: fitted or explicitly failed, in input order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchEntry {
    /// The specification fit successfully.
    Fitted {
        /// The fit result.
        report: FitReport,
    },
    /// The specification failed; the rest of the batch proceeded.
    Failed {
        /// Specification label.
        label: String,
        /// Why it failed.
        reason: String,
    },
}

impl BatchEntry {
    /// Specification label.
    pub fn label(&self) -> &str {
        match self {
            BatchEntry::Fitted { report } => &report.label,
            BatchEntry::Failed { label, .. } => label,
        }
    }

    /// Whether this entry is a failure marker.
    pub fn is_failed(&self) -> bool {
        matches!(self, BatchEntry::Failed { .. })
    }

    /// The fit report, when fitted.
    pub fn report(&self) -> Option<&FitReport> {
        match self {
            BatchEntry::Fitted { report } => Some(report),
            BatchEntry::Failed { .. } => None,
        }
    }
}

/// Fit a single specification over a prepared panel.
///
/// The sample filter runs first (rows with any missing value among the
/// specification's required columns drop out), then the fixed-effect
/// strategy is selected and the design solved.
pub fn fit_specification(
    table: &PanelTable,
    spec: &Specification,
    cfg: &RunConfig,
) -> Result<FitReport> {
    if spec.regressors.is_empty() {
        return Err(Error::Configuration(format!(
            "specification '{}' has no regressors",
            spec.label
        )));
    }

    let mut required: Vec<String> = Vec::with_capacity(spec.regressors.len() + 2);
    required.push(spec.dependent.clone());
    required.extend(spec.regressors.iter().cloned());
    if let SeMode::ClusterBy(col) = &spec.se_mode {
        if !required.contains(col) {
            required.push(col.clone());
        }
    }

    let (sample, n_dropped) = regression_sample(table, &required)?;
    if sample.is_empty() {
        return Err(Error::Computation(format!(
            "specification '{}' retains no observations after filtering",
            spec.label
        )));
    }

    let base = BaseDesign::from_table(&sample, &spec.dependent, &spec.regressors)?;
    let strategy = select_strategy(
        spec.entity_effects,
        spec.time_effects,
        cfg.fe_mode,
        base.n_entities(),
        base.n_rows(),
    );
    let design = strategy.build(&base)?;

    let cluster_keys: Option<Vec<u64>> = match &spec.se_mode {
        SeMode::Plain => None,
        SeMode::ClusterEntity => Some(base.entity.iter().map(|&c| c as u64).collect()),
        SeMode::ClusterBy(col) => {
            // Filtered sample guarantees the column exists and is finite;
            // exact bit patterns key the categorical codes.
            let values = sample
                .column(col)
                .ok_or_else(|| Error::Configuration(format!("column not found: {col}")))?;
            Some(values.iter().map(|v| v.to_bits()).collect())
        }
    };

    let stats = fit_ols(&design, cluster_keys.as_deref())?;

    let df = stats.df_resid as f64;
    let crit = t_critical_975(df);
    let se = stats.reported_se();
    let coefficients = (0..design.n_reported)
        .map(|j| {
            let estimate = stats.beta[j];
            let std_error = se[j];
            let t_stat = if std_error > 0.0 { estimate / std_error } else { f64::NAN };
            Coefficient {
                name: design.names[j].clone(),
                estimate,
                std_error,
                t_stat,
                p_value: t_two_sided_p(t_stat, df),
                ci_lower: estimate - crit * std_error,
                ci_upper: estimate + crit * std_error,
            }
        })
        .collect();

    Ok(FitReport {
        label: spec.label.clone(),
        dependent: spec.dependent.clone(),
        coefficients,
        r_squared: stats.r_squared,
        n_obs: base.n_rows(),
        n_dropped,
        n_entities: base.n_entities(),
        df_resid: stats.df_resid,
        entity_effects: spec.entity_effects,
        time_effects: spec.time_effects,
        se_mode: spec.se_mode.flag(),
        strategy: strategy.name().to_string(),
        n_clusters: stats.n_clusters,
    })
}

/// Fit every specification independently; failures become explicit
/// records, input order is preserved.
pub fn run_batch(table: &PanelTable, specs: &[Specification], cfg: &RunConfig) -> Vec<BatchEntry> {
    specs
        .par_iter()
        .map(|spec| match fit_specification(table, spec, cfg) {
            Ok(report) => BatchEntry::Fitted { report },
            Err(err) => {
                log::warn!("specification '{}' failed: {err}", spec.label);
                BatchEntry::Failed { label: spec.label.clone(), reason: err.to_string() }
            }
        })
        .collect()
}

/// One comparison-table row: how the variable of interest moves across
/// specifications. Failed specifications keep their row, marked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonRow {
    /// Specification label.
    pub label: String,
    /// Point estimate of the variable of interest.
    pub coefficient: Option<f64>,
    /// Its standard error.
    pub std_error: Option<f64>,
    /// Its two-sided p-value.
    pub p_value: Option<f64>,
    /// Fit R².
    pub r_squared: Option<f64>,
    /// Observation count.
    pub n_obs: Option<usize>,
    /// Entity fixed effects flag.
    pub entity_effects: bool,
    /// Period fixed effects flag.
    pub time_effects: bool,
    /// Standard-error mode flag.
    pub se_mode: String,
    /// Whether the specification failed.
    pub failed: bool,
    /// Failure reason, or a note when the variable of interest is absent
    /// from a fitted specification.
    pub note: String,
}

/// Build the cross-specification comparison for one variable of interest.
/// Rows appear in batch order; failed specifications appear as marker
/// rows rather than being omitted.
pub fn comparison_table(entries: &[BatchEntry], interest: &str) -> Vec<ComparisonRow> {
    entries
        .iter()
        .map(|entry| match entry {
            BatchEntry::Fitted { report } => {
                let coef = report.coefficient(interest);
                ComparisonRow {
                    label: report.label.clone(),
                    coefficient: coef.map(|c| c.estimate),
                    std_error: coef.map(|c| c.std_error),
                    p_value: coef.map(|c| c.p_value),
                    r_squared: Some(report.r_squared),
                    n_obs: Some(report.n_obs),
                    entity_effects: report.entity_effects,
                    time_effects: report.time_effects,
                    se_mode: report.se_mode.clone(),
                    failed: false,
                    note: if coef.is_some() {
                        String::new()
                    } else {
                        format!("{interest} not in specification")
                    },
                }
            }
            BatchEntry::Failed { label, reason } => ComparisonRow {
                label: label.clone(),
                coefficient: None,
                std_error: None,
                p_value: None,
                r_squared: None,
                n_obs: None,
                entity_effects: false,
                time_effects: false,
                se_mode: String::new(),
                failed: true,
                note: reason.clone(),
            },
        })
        .collect()
}

/// The canonical four-specification progression: pooled OLS, + controls,
/// + period fixed effects, entity + period fixed effects with
/// entity-clustered standard errors. The ordering is the study's core
/// narrative and is preserved as given.
pub fn baseline_ladder(
    dependent: &str,
    interest: &str,
    controls: &[String],
) -> Vec<Specification> {
    let with_controls: Vec<String> =
        std::iter::once(interest.to_string()).chain(controls.iter().cloned()).collect();
    vec![
        Specification {
            label: "pooled".into(),
            dependent: dependent.into(),
            regressors: vec![interest.to_string()],
            entity_effects: false,
            time_effects: false,
            se_mode: SeMode::Plain,
        },
        Specification {
            label: "controls".into(),
            dependent: dependent.into(),
            regressors: with_controls.clone(),
            entity_effects: false,
            time_effects: false,
            se_mode: SeMode::Plain,
        },
        Specification {
            label: "period FE".into(),
            dependent: dependent.into(),
            regressors: with_controls.clone(),
            entity_effects: false,
            time_effects: true,
            se_mode: SeMode::Plain,
        },
        Specification {
            label: "entity + period FE".into(),
            dependent: dependent.into(),
            regressors: with_controls,
            entity_effects: true,
            time_effects: true,
            se_mode: SeMode::ClusterEntity,
        },
    ]
}
