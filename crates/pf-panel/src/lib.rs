//! # pf-panel
//!
//! The panel preparer: transforms a raw entity-period table into a
//! regression-ready table with lagged exposure/asset variables, a
//! profitability ratio, and log/ratio controls.
//!
//! All operations are deterministic and pure; missing data propagates as
//! NaN and rows with incomplete data drop out at the sample filter, never
//! earlier.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod prepare;

pub use prepare::{lag_column, prepare, regression_sample, PrepareConfig};
