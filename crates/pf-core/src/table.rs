//! Columnar entity-period table.
//!
//! A [`PanelTable`] holds one row per (entity, period) observation: an opaque
//! entity identifier, an ordinal period, and any number of named `f64`
//! columns. Missing values are `f64::NAN` and propagate through arithmetic;
//! nothing in this module raises on missing data.
//!
//! The table is treated as immutable once prepared: every specification fit
//! reads from it without mutating it.

use std::collections::{HashMap, HashSet};

use crate::{Error, Result};

/// Columnar firm-year (entity-period) panel.
#[derive(Debug, Clone, Default)]
pub struct PanelTable {
    entity: Vec<String>,
    period: Vec<i64>,
    names: Vec<String>,
    index: HashMap<String, usize>,
    columns: Vec<Vec<f64>>,
}

impl PanelTable {
    /// Create a table from the key vectors. Columns are added afterwards
    /// with [`PanelTable::add_column`].
    pub fn new(entity: Vec<String>, period: Vec<i64>) -> Result<Self> {
        if entity.len() != period.len() {
            return Err(Error::Validation(format!(
                "entity length ({}) != period length ({})",
                entity.len(),
                period.len()
            )));
        }
        Ok(Self {
            entity,
            period,
            names: Vec::new(),
            index: HashMap::new(),
            columns: Vec::new(),
        })
    }

    /// Number of rows (observations).
    pub fn n_rows(&self) -> usize {
        self.entity.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.entity.is_empty()
    }

    /// Entity identifier per row.
    pub fn entity(&self) -> &[String] {
        &self.entity
    }

    /// Period per row.
    pub fn period(&self) -> &[i64] {
        &self.period
    }

    /// Column names in insertion order.
    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    /// Values of a named column, if present.
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.index.get(name).map(|&i| self.columns[i].as_slice())
    }

    /// Whether a named column is present.
    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Append a new column. Rejects duplicate names and length mismatches.
    pub fn add_column(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<()> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(Error::Validation(format!("duplicate column name: {name}")));
        }
        if values.len() != self.n_rows() {
            return Err(Error::Validation(format!(
                "column {} has length {}, expected {}",
                name,
                values.len(),
                self.n_rows()
            )));
        }
        self.index.insert(name.clone(), self.columns.len());
        self.names.push(name);
        self.columns.push(values);
        Ok(())
    }

    /// Number of distinct entities.
    pub fn n_entities(&self) -> usize {
        self.entity.iter().collect::<HashSet<_>>().len()
    }

    /// First duplicated (entity, period) key, if any. The panel invariant
    /// requires the key to be unique.
    pub fn duplicate_key(&self) -> Option<(String, i64)> {
        let mut seen: HashSet<(&str, i64)> = HashSet::with_capacity(self.n_rows());
        for (e, &p) in self.entity.iter().zip(&self.period) {
            if !seen.insert((e.as_str(), p)) {
                return Some((e.clone(), p));
            }
        }
        None
    }

    /// Stable sort of all rows by (entity, period) ascending.
    pub fn sort_by_entity_period(&mut self) {
        let mut perm: Vec<usize> = (0..self.n_rows()).collect();
        perm.sort_by(|&a, &b| {
            (&self.entity[a], self.period[a]).cmp(&(&self.entity[b], self.period[b]))
        });
        self.entity = apply_perm(&self.entity, &perm);
        self.period = apply_perm(&self.period, &perm);
        for col in &mut self.columns {
            *col = apply_perm(col, &perm);
        }
    }

    /// Per-entity row indices, each list ordered by period ascending
    /// (ties keep input order). Entity order is first appearance.
    ///
    /// This is the arena that lag operators walk; it does not require the
    /// table itself to be sorted.
    pub fn entity_row_groups(&self) -> Vec<Vec<usize>> {
        let mut order: Vec<&str> = Vec::new();
        let mut groups: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, e) in self.entity.iter().enumerate() {
            let g = groups.entry(e.as_str()).or_insert_with(|| {
                order.push(e.as_str());
                Vec::new()
            });
            g.push(i);
        }
        order
            .into_iter()
            .map(|e| {
                let mut rows = groups.remove(e).unwrap_or_default();
                rows.sort_by_key(|&i| self.period[i]);
                rows
            })
            .collect()
    }

    /// Map rows to dense 0-based entity codes (first-appearance order).
    /// Returns the codes and the number of distinct entities.
    pub fn dense_entities(&self) -> (Vec<usize>, usize) {
        let mut map: HashMap<&str, usize> = HashMap::new();
        let mut codes = Vec::with_capacity(self.n_rows());
        for e in &self.entity {
            let next = map.len();
            codes.push(*map.entry(e.as_str()).or_insert(next));
        }
        let n = map.len();
        (codes, n)
    }

    /// Map rows to dense 0-based period codes, levels ordered by period
    /// value ascending. Returns the codes, the number of distinct periods,
    /// and the ordered period levels.
    pub fn dense_periods(&self) -> (Vec<usize>, usize, Vec<i64>) {
        let mut levels: Vec<i64> = self.period.iter().copied().collect::<HashSet<_>>().into_iter().collect();
        levels.sort_unstable();
        let map: HashMap<i64, usize> = levels.iter().enumerate().map(|(i, &p)| (p, i)).collect();
        let codes = self.period.iter().map(|p| map[p]).collect();
        let n = levels.len();
        (codes, n, levels)
    }

    /// New table keeping only rows where `keep[row]` is true.
    pub fn filter_rows(&self, keep: &[bool]) -> Result<PanelTable> {
        if keep.len() != self.n_rows() {
            return Err(Error::Validation(format!(
                "keep mask length ({}) != n_rows ({})",
                keep.len(),
                self.n_rows()
            )));
        }
        let pick = |v: &[f64]| -> Vec<f64> {
            v.iter().zip(keep).filter(|(_, &k)| k).map(|(x, _)| *x).collect()
        };
        let entity = self.entity.iter().zip(keep).filter(|(_, &k)| k).map(|(e, _)| e.clone()).collect();
        let period = self.period.iter().zip(keep).filter(|(_, &k)| k).map(|(&p, _)| p).collect();
        let mut out = PanelTable::new(entity, period)?;
        for name in &self.names {
            out.add_column(name.clone(), pick(self.column(name).unwrap()))?;
        }
        Ok(out)
    }
}

fn apply_perm<T: Clone>(v: &[T], perm: &[usize]) -> Vec<T> {
    perm.iter().map(|&i| v[i].clone()).collect()
}
