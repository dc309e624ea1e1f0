//! Ordinary least squares with plain and cluster-robust covariance.
//!
//! Closed-form normal equations over a [`DesignData`]. The cluster-robust
//! estimator is the Liang–Zeger sandwich: per-cluster score outer products
//! form the meat, with the small-sample correction
//! `G/(G−1) · (N−1)/(N−K)` where K counts absorbed parameters.

use std::collections::HashMap;

use nalgebra::DMatrix;
use pf_core::{Error, Result};
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::design::{check_full_rank, DesignData};

/// Result of one least-squares solve.
#[derive(Debug, Clone)]
pub struct OlsStats {
    /// Coefficient estimates, parallel to the design columns.
    pub beta: Vec<f64>,
    /// Homoskedastic (plain OLS) standard errors.
    pub se_ols: Vec<f64>,
    /// Cluster-robust standard errors, when clustering was requested.
    pub se_cluster: Option<Vec<f64>>,
    /// R² — within-R² when the design was demeaned.
    pub r_squared: f64,
    /// Residual sum of squares.
    pub rss: f64,
    /// Residual degrees of freedom: N − columns − absorbed.
    pub df_resid: usize,
    /// Number of clusters, when clustering was requested.
    pub n_clusters: Option<usize>,
}

impl OlsStats {
    /// Standard errors under the requested mode: cluster-robust when
    /// present, plain otherwise.
    pub fn reported_se(&self) -> &[f64] {
        self.se_cluster.as_deref().unwrap_or(&self.se_ols)
    }
}

/// Fit OLS over a built design.
///
/// Runs the column-rank scan first: a singular design surfaces as
/// [`Error::RankDeficient`] naming the implicated columns, never as
/// degenerate coefficients. `cluster` supplies one grouping key per row;
/// residual contributions are summed within each group before the sandwich
/// is formed.
pub fn fit_ols(design: &DesignData, cluster: Option<&[u64]>) -> Result<OlsStats> {
    let n = design.x.nrows();
    let p = design.x.ncols();
    if n == 0 {
        return Err(Error::Validation("design has no rows".into()));
    }
    if p == 0 {
        return Err(Error::Validation("design has no columns".into()));
    }

    check_full_rank(&design.x, &design.names)?;

    let absorbed = design.df_absorbed;
    if n <= p + absorbed {
        return Err(Error::rank_deficient(
            format!("no residual degrees of freedom (n = {n}, parameters = {})", p + absorbed),
            Vec::new(),
        ));
    }
    let df_resid = n - p - absorbed;

    let xtx = design.x.transpose() * &design.x;
    let xty = design.x.transpose() * &design.y;
    let xtx_inv = xtx
        .try_inverse()
        .ok_or_else(|| Error::Computation("X'X not invertible after rank check".into()))?;
    let beta = &xtx_inv * &xty;

    let resid = &design.y - &design.x * &beta;
    let rss: f64 = resid.iter().map(|r| r * r).sum();

    let tss: f64 = if design.within {
        // Demeaned y is mean-zero by construction.
        design.y.iter().map(|v| v * v).sum()
    } else {
        let mean = design.y.iter().sum::<f64>() / n as f64;
        design.y.iter().map(|v| (v - mean) * (v - mean)).sum()
    };
    let r_squared = if tss > 0.0 { 1.0 - rss / tss } else { 0.0 };

    let sigma2 = rss / df_resid as f64;
    let se_ols: Vec<f64> = (0..p).map(|j| (sigma2 * xtx_inv[(j, j)]).max(0.0).sqrt()).collect();

    let (se_cluster, n_clusters) = match cluster {
        None => (None, None),
        Some(keys) => {
            if keys.len() != n {
                return Err(Error::Validation(format!(
                    "cluster keys length ({}) != n ({n})",
                    keys.len()
                )));
            }
            let mut groups: HashMap<u64, Vec<usize>> = HashMap::new();
            for (i, &k) in keys.iter().enumerate() {
                groups.entry(k).or_default().push(i);
            }
            let g = groups.len();
            if g < 2 {
                return Err(Error::Computation(
                    "cluster-robust covariance requires at least 2 clusters".into(),
                ));
            }

            // Meat: sum of per-cluster score outer products.
            let mut meat = DMatrix::zeros(p, p);
            for rows in groups.values() {
                let mut score = vec![0.0_f64; p];
                for &i in rows {
                    let e = resid[i];
                    for j in 0..p {
                        score[j] += design.x[(i, j)] * e;
                    }
                }
                for a in 0..p {
                    for b in 0..p {
                        meat[(a, b)] += score[a] * score[b];
                    }
                }
            }

            let k_params = (p + absorbed) as f64;
            let g_f = g as f64;
            let n_f = n as f64;
            let correction = (g_f / (g_f - 1.0)) * ((n_f - 1.0) / (n_f - k_params));

            let vcr = (&xtx_inv * meat) * &xtx_inv * correction;
            let se = (0..p).map(|j| vcr[(j, j)].max(0.0).sqrt()).collect();
            (Some(se), Some(g))
        }
    };

    Ok(OlsStats {
        beta: beta.iter().copied().collect(),
        se_ols,
        se_cluster,
        r_squared,
        rss,
        df_resid,
        n_clusters,
    })
}

/// Standard Student's t(df). df is validated positive by the callers.
#[inline]
fn t_dist(df: f64) -> StudentsT {
    StudentsT::new(0.0, 1.0, df).expect("valid df for t-distribution")
}

/// Two-sided p-value of a t-statistic with `df` residual degrees of freedom.
pub fn t_two_sided_p(t: f64, df: f64) -> f64 {
    if !t.is_finite() {
        return f64::NAN;
    }
    2.0 * (1.0 - t_dist(df).cdf(t.abs()))
}

/// 97.5th percentile of t(df), for 95% confidence intervals.
pub fn t_critical_975(df: f64) -> f64 {
    t_dist(df).inverse_cdf(0.975)
}
