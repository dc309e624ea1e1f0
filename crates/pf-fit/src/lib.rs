//! # pf-fit
//!
//! The regression runner: fits ordinary-least-squares specifications over a
//! prepared panel and reports coefficients with uncertainty.
//!
//! Fixed effects are handled by two interchangeable strategies behind one
//! interface — indicator columns for low-cardinality axes, within demeaning
//! for high-cardinality entity effects — selected per call. Standard errors
//! come plain or cluster-robust (Liang–Zeger sandwich). A batch of
//! specifications is fit independently over the immutable table; one
//! specification failing never aborts the rest.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod design;
pub mod fe;
pub mod ols;
pub mod spec;

pub use design::{check_full_rank, BaseDesign, DesignData};
pub use fe::{select_strategy, DummyStrategy, EffectsStrategy, FeMode, NoEffects, WithinStrategy};
pub use ols::{fit_ols, OlsStats};
pub use spec::{
    baseline_ladder, comparison_table, fit_specification, run_batch, BatchEntry, Coefficient,
    ComparisonRow, FitReport, RunConfig, SeMode, Specification,
};
