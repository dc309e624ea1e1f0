//! Fixed-effect handling: indicator columns vs. within demeaning.
//!
//! Both strategies implement [`EffectsStrategy`] and produce the same
//! coefficients and standard errors for the non-absorbed regressors (up to
//! the fixed-effect intercepts, which demeaning does not identify). Dummy
//! estimation keeps every parameter as an explicit column; demeaning
//! absorbs the per-level intercepts and is far cheaper when entity
//! cardinality is large.

use nalgebra::{DMatrix, DVector};
use pf_core::Result;

use crate::design::{BaseDesign, DesignData};

/// Convergence tolerance for alternating-projection sweeps (max absolute
/// group mean).
const DEMEAN_TOL: f64 = 1e-11;

/// Safety bound on alternating-projection sweeps.
const DEMEAN_MAX_ITER: usize = 10_000;

/// Strategy choice for a run. `Auto` picks demeaning when entity effects
/// are requested and entity cardinality exceeds √N, purely for cost; the
/// two strategies are numerically interchangeable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeMode {
    /// Choose per call from fixed-effect axes and entity cardinality.
    #[default]
    Auto,
    /// Force indicator-column estimation.
    Dummies,
    /// Force within demeaning.
    Within,
}

/// Produces a solvable design from base design data.
pub trait EffectsStrategy {
    /// Strategy name, reported alongside fit results.
    fn name(&self) -> &'static str;

    /// Build the design matrix, applying this strategy's fixed-effect
    /// treatment.
    fn build(&self, base: &BaseDesign) -> Result<DesignData>;
}

/// No fixed effects: intercept plus the named regressors.
pub struct NoEffects;

impl EffectsStrategy for NoEffects {
    fn name(&self) -> &'static str {
        "none"
    }

    fn build(&self, base: &BaseDesign) -> Result<DesignData> {
        let n = base.n_rows();
        let p = base.cols.len();
        let mut x = DMatrix::zeros(n, p + 1);
        let mut names = Vec::with_capacity(p + 1);
        names.push("const".to_string());
        for i in 0..n {
            x[(i, 0)] = 1.0;
        }
        for (j, col) in base.cols.iter().enumerate() {
            names.push(base.names[j].clone());
            for i in 0..n {
                x[(i, j + 1)] = col[i];
            }
        }
        Ok(DesignData {
            x,
            y: DVector::from_column_slice(&base.y),
            names,
            n_reported: p + 1,
            df_absorbed: 0,
            within: false,
        })
    }
}

/// Fixed effects as indicator columns: intercept, regressors, then one
/// indicator per non-reference level of each requested axis (first level
/// dropped as reference).
pub struct DummyStrategy {
    /// Include entity indicators.
    pub entity: bool,
    /// Include period indicators.
    pub period: bool,
}

impl EffectsStrategy for DummyStrategy {
    fn name(&self) -> &'static str {
        "dummies"
    }

    fn build(&self, base: &BaseDesign) -> Result<DesignData> {
        let n = base.n_rows();
        let p = base.cols.len();
        let n_entity_dummies = if self.entity { base.n_entities().saturating_sub(1) } else { 0 };
        let n_period_dummies = if self.period { base.n_periods().saturating_sub(1) } else { 0 };
        let total = 1 + p + n_entity_dummies + n_period_dummies;

        let mut x = DMatrix::zeros(n, total);
        let mut names = Vec::with_capacity(total);

        names.push("const".to_string());
        for i in 0..n {
            x[(i, 0)] = 1.0;
        }
        for (j, col) in base.cols.iter().enumerate() {
            names.push(base.names[j].clone());
            for i in 0..n {
                x[(i, 1 + j)] = col[i];
            }
        }

        let mut offset = 1 + p;
        if self.entity {
            for level in 1..base.n_entities() {
                names.push(format!("entity[{}]", base.entity_levels[level]));
            }
            for i in 0..n {
                if base.entity[i] > 0 {
                    x[(i, offset + base.entity[i] - 1)] = 1.0;
                }
            }
            offset += n_entity_dummies;
        }
        if self.period {
            for level in 1..base.n_periods() {
                names.push(format!("period[{}]", base.period_levels[level]));
            }
            for i in 0..n {
                if base.period[i] > 0 {
                    x[(i, offset + base.period[i] - 1)] = 1.0;
                }
            }
        }

        Ok(DesignData {
            x,
            y: DVector::from_column_slice(&base.y),
            names,
            n_reported: p + 1,
            df_absorbed: 0,
            within: false,
        })
    }
}

/// Fixed effects by within demeaning (alternating projections).
///
/// One axis needs a single exact pass; two axes iterate sweeps until every
/// group mean is below tolerance. Absorbed intercepts are not identified
/// and not reported; the absorbed-parameter count enters the degrees of
/// freedom instead.
pub struct WithinStrategy {
    /// Demean by entity.
    pub entity: bool,
    /// Demean by period.
    pub period: bool,
}

impl EffectsStrategy for WithinStrategy {
    fn name(&self) -> &'static str {
        "within"
    }

    fn build(&self, base: &BaseDesign) -> Result<DesignData> {
        let n = base.n_rows();
        let p = base.cols.len();

        let mut dims: Vec<(&[usize], usize)> = Vec::new();
        if self.entity {
            dims.push((&base.entity, base.n_entities()));
        }
        if self.period {
            dims.push((&base.period, base.n_periods()));
        }

        let groups: Vec<Vec<Vec<usize>>> =
            dims.iter().map(|&(codes, levels)| group_rows(codes, levels, n)).collect();

        let mut y = base.y.clone();
        partial_out(&mut y, &groups);
        let mut x = DMatrix::zeros(n, p);
        for (j, col) in base.cols.iter().enumerate() {
            let mut c = col.clone();
            partial_out(&mut c, &groups);
            for i in 0..n {
                x[(i, j)] = c[i];
            }
        }

        let df_absorbed = match (self.entity, self.period) {
            (true, false) => base.n_entities(),
            (false, true) => base.n_periods(),
            (true, true) => {
                // Rank of the joint dummy space (incl. intercept):
                // n_entities + n_periods − connected components of the
                // bipartite entity×period graph.
                let components =
                    bipartite_components(&base.entity, base.n_entities(), &base.period, base.n_periods());
                base.n_entities() + base.n_periods() - components
            }
            (false, false) => 0,
        };

        Ok(DesignData {
            x,
            y: DVector::from_column_slice(&y),
            names: base.names.clone(),
            n_reported: p,
            df_absorbed,
            within: true,
        })
    }
}

/// Pick a strategy from the requested axes, the mode, and the panel shape.
///
/// Auto rule: demeaning when entity effects are requested and entity
/// cardinality exceeds √N; indicator columns otherwise. Coefficients and
/// standard errors are identical either way, so the choice is purely a
/// cost decision and can be overridden.
pub fn select_strategy(
    entity_effects: bool,
    time_effects: bool,
    mode: FeMode,
    n_entities: usize,
    n_rows: usize,
) -> Box<dyn EffectsStrategy> {
    if !entity_effects && !time_effects {
        return Box::new(NoEffects);
    }
    let within = match mode {
        FeMode::Dummies => false,
        FeMode::Within => true,
        FeMode::Auto => entity_effects && (n_entities as f64) > (n_rows as f64).sqrt(),
    };
    if within {
        Box::new(WithinStrategy { entity: entity_effects, period: time_effects })
    } else {
        Box::new(DummyStrategy { entity: entity_effects, period: time_effects })
    }
}

/// Row indices per group level for one axis.
fn group_rows(codes: &[usize], levels: usize, n: usize) -> Vec<Vec<usize>> {
    let mut groups: Vec<Vec<usize>> = vec![Vec::new(); levels];
    for i in 0..n {
        groups[codes[i]].push(i);
    }
    groups
}

/// Subtract group means for one axis, in place.
fn demean_axis(v: &mut [f64], groups: &[Vec<usize>]) {
    for rows in groups {
        if rows.is_empty() {
            continue;
        }
        let mean = rows.iter().map(|&i| v[i]).sum::<f64>() / rows.len() as f64;
        for &i in rows {
            v[i] -= mean;
        }
    }
}

/// Largest absolute group mean across all axes.
fn max_group_mean(v: &[f64], axes: &[Vec<Vec<usize>>]) -> f64 {
    let mut worst = 0.0_f64;
    for groups in axes {
        for rows in groups {
            if rows.is_empty() {
                continue;
            }
            let mean = rows.iter().map(|&i| v[i]).sum::<f64>() / rows.len() as f64;
            worst = worst.max(mean.abs());
        }
    }
    worst
}

/// Absorb all requested axes from one vector. A single axis is exact in
/// one pass; multiple axes alternate projections until every group mean is
/// below tolerance.
fn partial_out(v: &mut [f64], axes: &[Vec<Vec<usize>>]) {
    if axes.is_empty() {
        return;
    }
    if axes.len() == 1 {
        demean_axis(v, &axes[0]);
        return;
    }
    for _ in 0..DEMEAN_MAX_ITER {
        for groups in axes {
            demean_axis(v, groups);
        }
        if max_group_mean(v, axes) < DEMEAN_TOL {
            return;
        }
    }
}

/// Connected components of the bipartite (entity, period) graph, via
/// union-find with path halving. Determines the exactly absorbed degrees
/// of freedom under two-way demeaning.
fn bipartite_components(
    entity: &[usize],
    n_entities: usize,
    period: &[usize],
    n_periods: usize,
) -> usize {
    let total = n_entities + n_periods;
    let mut parent: Vec<usize> = (0..total).collect();

    fn find(parent: &mut [usize], mut x: usize) -> usize {
        while parent[x] != x {
            parent[x] = parent[parent[x]];
            x = parent[x];
        }
        x
    }

    for i in 0..entity.len() {
        let a = find(&mut parent, entity[i]);
        let b = find(&mut parent, n_entities + period[i]);
        if a != b {
            parent[a] = b;
        }
    }

    let mut used = vec![false; total];
    for i in 0..entity.len() {
        used[entity[i]] = true;
        used[n_entities + period[i]] = true;
    }
    let mut roots = std::collections::HashSet::new();
    for node in 0..total {
        if used[node] {
            roots.insert(find(&mut parent, node));
        }
    }
    roots.len()
}
