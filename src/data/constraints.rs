//! Affine constraints between degrees of freedom.
//!
//! A constraint line states `u_i = Σ_k w_k u_{c_k} + g_i`. Lines come from
//! hanging nodes and from Dirichlet boundaries; they are merged into one
//! [`AffineConstraints`] set and then closed, after which no line refers to a
//! constrained column. Only a closed set can be applied to vectors or used to
//! condense cell contributions.

use crate::cdr_error::CdrError;
use crate::data::index_set::IndexSet;
use hashbrown::{HashMap, HashSet};
use std::collections::BTreeMap;

/// A single constraint line.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ConstraintLine {
    pub index: usize,
    /// `(column, weight)` pairs, sorted by column once closed.
    pub entries: Vec<(usize, f64)>,
    pub inhomogeneity: f64,
}

/// Storage a constraint set can be applied to.
pub trait ConstraintTarget {
    /// Whether `index` is stored here.
    fn holds(&self, index: usize) -> bool;
    fn value_at(&self, index: usize) -> Result<f64, CdrError>;
    fn set_value(&mut self, index: usize, value: f64) -> Result<(), CdrError>;
}

impl ConstraintTarget for [f64] {
    fn holds(&self, index: usize) -> bool {
        index < self.len()
    }

    fn value_at(&self, index: usize) -> Result<f64, CdrError> {
        self.get(index)
            .copied()
            .ok_or(CdrError::IndexNotInSet {
                index,
                set: "vector",
            })
    }

    fn set_value(&mut self, index: usize, value: f64) -> Result<(), CdrError> {
        let slot = self.get_mut(index).ok_or(CdrError::IndexNotInSet {
            index,
            set: "vector",
        })?;
        *slot = value;
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AffineConstraints {
    lines: BTreeMap<usize, ConstraintLine>,
    closed: bool,
}

impl AffineConstraints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `u_index = Σ entries + inhomogeneity`.
    ///
    /// The first line added for an index wins; returns `false` if `index` was
    /// already constrained and the new line was dropped.
    pub fn add_line(&mut self, index: usize, entries: Vec<(usize, f64)>, inhomogeneity: f64) -> bool {
        if self.lines.contains_key(&index) {
            return false;
        }
        self.lines.insert(
            index,
            ConstraintLine {
                index,
                entries,
                inhomogeneity,
            },
        );
        self.closed = false;
        true
    }

    /// Merge `other` into `self`; lines already present here are kept.
    pub fn merge(&mut self, other: &AffineConstraints) {
        for line in other.lines.values() {
            self.add_line(line.index, line.entries.clone(), line.inhomogeneity);
        }
    }

    #[inline]
    pub fn is_constrained(&self, index: usize) -> bool {
        self.lines.contains_key(&index)
    }

    pub fn line(&self, index: usize) -> Option<&ConstraintLine> {
        self.lines.get(&index)
    }

    pub fn lines(&self) -> impl Iterator<Item = &ConstraintLine> {
        self.lines.values()
    }

    pub fn n_constraints(&self) -> usize {
        self.lines.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Resolve chains so every line refers to unconstrained columns only.
    ///
    /// Duplicate columns are summed and zero weights dropped. A line that
    /// depends on itself, directly or through other lines, is rejected.
    pub fn close(&mut self) -> Result<(), CdrError> {
        let mut resolved: HashMap<usize, ConstraintLine> = HashMap::new();
        let mut visiting = HashSet::new();
        let indices: Vec<usize> = self.lines.keys().copied().collect();
        for index in indices {
            resolve(index, &self.lines, &mut resolved, &mut visiting)?;
        }
        for (index, line) in resolved {
            self.lines.insert(index, line);
        }
        self.closed = true;
        log::debug!("closed {} constraint lines", self.lines.len());
        Ok(())
    }

    /// Keep only the lines whose index is in `set`.
    pub fn restrict_to(&self, set: &IndexSet) -> AffineConstraints {
        AffineConstraints {
            lines: self
                .lines
                .iter()
                .filter(|(index, _)| set.contains(**index))
                .map(|(index, line)| (*index, line.clone()))
                .collect(),
            closed: self.closed,
        }
    }

    /// Columns referenced by the lines of the indices in `set`.
    pub fn columns_for<'a>(&'a self, set: &'a IndexSet) -> impl Iterator<Item = usize> + 'a {
        set.iter()
            .filter_map(move |index| self.lines.get(&index))
            .flat_map(move |line| line.entries.iter().map(|&(col, _)| col))
    }

    /// Overwrite every constrained entry that `target` holds with its
    /// constrained value. Idempotent on a closed set.
    pub fn distribute<T: ConstraintTarget + ?Sized>(&self, target: &mut T) -> Result<(), CdrError> {
        self.ensure_closed()?;
        for line in self.lines.values() {
            if !target.holds(line.index) {
                continue;
            }
            let mut value = line.inhomogeneity;
            for &(col, weight) in &line.entries {
                value += weight * target.value_at(col)?;
            }
            target.set_value(line.index, value)?;
        }
        Ok(())
    }

    /// Add a dense cell matrix (row-major, `dofs.len()` square) into the global
    /// system through the constraints.
    ///
    /// Constrained rows and columns are redistributed onto their columns with
    /// the line weights; each constrained row instead receives `|K_ii|` on its
    /// diagonal, keeping the condensed operator regular. Inhomogeneities are not
    /// applied here; [`distribute`](Self::distribute) sets them on the solution.
    pub fn condense_matrix<F>(&self, dofs: &[usize], local: &[f64], mut add: F) -> Result<(), CdrError>
    where
        F: FnMut(usize, usize, f64),
    {
        self.ensure_closed()?;
        let n = dofs.len();
        debug_assert_eq!(local.len(), n * n);
        let targets: Vec<Vec<(usize, f64)>> = dofs.iter().map(|&d| self.targets(d)).collect();
        for i in 0..n {
            for j in 0..n {
                let k = local[i * n + j];
                if k == 0.0 {
                    continue;
                }
                for &(gi, wi) in &targets[i] {
                    for &(gj, wj) in &targets[j] {
                        add(gi, gj, wi * wj * k);
                    }
                }
            }
            if self.is_constrained(dofs[i]) {
                add(dofs[i], dofs[i], local[i * n + i].abs());
            }
        }
        Ok(())
    }

    /// Add a cell vector into the global rhs through the constraints.
    /// Constrained entries receive nothing.
    pub fn condense_vector<F>(&self, dofs: &[usize], local: &[f64], mut add: F) -> Result<(), CdrError>
    where
        F: FnMut(usize, f64),
    {
        self.ensure_closed()?;
        for (&dof, &value) in dofs.iter().zip(local) {
            for (g, w) in self.targets(dof) {
                add(g, w * value);
            }
        }
        Ok(())
    }

    fn targets(&self, dof: usize) -> Vec<(usize, f64)> {
        match self.lines.get(&dof) {
            Some(line) => line.entries.clone(),
            None => vec![(dof, 1.0)],
        }
    }

    fn ensure_closed(&self) -> Result<(), CdrError> {
        if self.closed {
            Ok(())
        } else {
            Err(CdrError::ConstraintsNotClosed)
        }
    }
}

fn resolve(
    index: usize,
    raw: &BTreeMap<usize, ConstraintLine>,
    resolved: &mut HashMap<usize, ConstraintLine>,
    visiting: &mut HashSet<usize>,
) -> Result<(), CdrError> {
    if resolved.contains_key(&index) {
        return Ok(());
    }
    if !visiting.insert(index) {
        return Err(CdrError::ConstraintCycle(index));
    }
    let line = &raw[&index];
    let mut weights: BTreeMap<usize, f64> = BTreeMap::new();
    let mut inhomogeneity = line.inhomogeneity;
    for &(col, weight) in &line.entries {
        if raw.contains_key(&col) {
            resolve(col, raw, resolved, visiting)?;
            let dep = &resolved[&col];
            inhomogeneity += weight * dep.inhomogeneity;
            for &(c, w) in &dep.entries {
                *weights.entry(c).or_insert(0.0) += weight * w;
            }
        } else {
            *weights.entry(col).or_insert(0.0) += weight;
        }
    }
    visiting.remove(&index);
    resolved.insert(
        index,
        ConstraintLine {
            index,
            entries: weights.into_iter().filter(|&(_, w)| w != 0.0).collect(),
            inhomogeneity,
        },
    );
    Ok(())
}
