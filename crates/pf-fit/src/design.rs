//! Design-matrix assembly and the pre-solve rank check.

use nalgebra::{DMatrix, DVector};
use pf_core::{Error, PanelTable, Result};

/// Relative tolerance for the column-independence scan.
const RANK_TOL: f64 = 1e-8;

/// Raw ingredients of one specification's design, extracted from a filtered
/// panel before any fixed-effect handling.
#[derive(Debug, Clone)]
pub struct BaseDesign {
    /// Regressor columns, in specification order.
    pub cols: Vec<Vec<f64>>,
    /// Regressor names, parallel to `cols`.
    pub names: Vec<String>,
    /// Dependent variable.
    pub y: Vec<f64>,
    /// Dense 0-based entity code per row.
    pub entity: Vec<usize>,
    /// Entity labels, indexed by dense code.
    pub entity_levels: Vec<String>,
    /// Dense 0-based period code per row.
    pub period: Vec<usize>,
    /// Period levels, indexed by dense code.
    pub period_levels: Vec<i64>,
}

impl BaseDesign {
    /// Extract dependent and regressor columns from a filtered sample.
    /// The sample must already contain every named column (the caller
    /// filters through `regression_sample`, which guarantees it).
    pub fn from_table(sample: &PanelTable, dependent: &str, regressors: &[String]) -> Result<Self> {
        let y = sample
            .column(dependent)
            .ok_or_else(|| Error::Configuration(format!("column not found: {dependent}")))?
            .to_vec();
        let mut cols = Vec::with_capacity(regressors.len());
        for name in regressors {
            cols.push(
                sample
                    .column(name)
                    .ok_or_else(|| Error::Configuration(format!("column not found: {name}")))?
                    .to_vec(),
            );
        }

        let (entity, n_entities) = sample.dense_entities();
        let mut entity_levels = vec![String::new(); n_entities];
        for (row, &code) in entity.iter().enumerate() {
            if entity_levels[code].is_empty() {
                entity_levels[code] = sample.entity()[row].clone();
            }
        }
        let (period, _, period_levels) = sample.dense_periods();

        Ok(Self {
            cols,
            names: regressors.to_vec(),
            y,
            entity,
            entity_levels,
            period,
            period_levels,
        })
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.y.len()
    }

    /// Number of distinct entities.
    pub fn n_entities(&self) -> usize {
        self.entity_levels.len()
    }

    /// Number of distinct periods.
    pub fn n_periods(&self) -> usize {
        self.period_levels.len()
    }
}

/// A solvable design: the matrix actually handed to the OLS core, after a
/// fixed-effect strategy has been applied.
#[derive(Debug, Clone)]
pub struct DesignData {
    /// Design matrix (n × p).
    pub x: DMatrix<f64>,
    /// Dependent variable (possibly demeaned).
    pub y: DVector<f64>,
    /// Column names, parallel to the columns of `x`.
    pub names: Vec<String>,
    /// Leading columns reported to the caller (intercept + named
    /// regressors); trailing indicator columns are estimated but not
    /// reported, mirroring absorbed effects.
    pub n_reported: usize,
    /// Parameters absorbed by demeaning (0 for dummy estimation, where the
    /// indicators are ordinary columns).
    pub df_absorbed: usize,
    /// Whether `y` was demeaned — R² is then within-R².
    pub within: bool,
}

/// Verify that the design matrix has full column rank, naming the dependent
/// columns otherwise.
///
/// Modified Gram–Schmidt scan: each column is orthogonalized against the
/// accepted basis; a column whose residual norm falls below `RANK_TOL`
/// relative to its own norm is linearly dependent on its predecessors. This
/// runs before the normal-equations solve so a singular design surfaces as
/// a [`Error::RankDeficient`] with diagnostics instead of degenerate
/// coefficients.
pub fn check_full_rank(x: &DMatrix<f64>, names: &[String]) -> Result<()> {
    let n = x.nrows();
    let p = x.ncols();
    let mut basis: Vec<DVector<f64>> = Vec::with_capacity(p.min(n));
    let mut implicated: Vec<String> = Vec::new();

    for j in 0..p {
        let col = DVector::from_iterator(n, x.column(j).iter().copied());
        let norm0 = col.norm();
        if norm0 == 0.0 {
            implicated.push(names[j].clone());
            continue;
        }
        let mut v = col;
        for q in &basis {
            let proj = q.dot(&v);
            v.axpy(-proj, q, 1.0);
        }
        if v.norm() <= RANK_TOL * norm0 {
            implicated.push(names[j].clone());
        } else {
            let norm = v.norm();
            basis.push(v / norm);
        }
    }

    if !implicated.is_empty() {
        return Err(Error::rank_deficient(
            format!(
                "{} of {} design columns linearly dependent: {}",
                implicated.len(),
                p,
                implicated.join(", ")
            ),
            implicated,
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn full_rank_passes() {
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        assert!(check_full_rank(&x, &names(&["const", "x1"])).is_ok());
    }

    #[test]
    fn duplicate_column_is_named() {
        let x = DMatrix::from_row_slice(3, 3, &[
            1.0, 2.0, 2.0, //
            1.0, 3.0, 3.0, //
            1.0, 5.0, 5.0,
        ]);
        let err = check_full_rank(&x, &names(&["const", "x1", "x1_copy"])).unwrap_err();
        match err {
            Error::RankDeficient { implicated, .. } => {
                assert_eq!(implicated, vec!["x1_copy"]);
            }
            other => panic!("expected RankDeficient, got {other:?}"),
        }
    }

    #[test]
    fn more_columns_than_rows_is_deficient() {
        let x = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert!(check_full_rank(&x, &names(&["a", "b", "c"])).is_err());
    }

    #[test]
    fn zero_column_is_named() {
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 0.0, 1.0, 0.0]);
        let err = check_full_rank(&x, &names(&["const", "zeros"])).unwrap_err();
        match err {
            Error::RankDeficient { implicated, .. } => assert_eq!(implicated, vec!["zeros"]),
            other => panic!("expected RankDeficient, got {other:?}"),
        }
    }
}
