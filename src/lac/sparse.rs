//! Distributed sparse matrices.
//!
//! Each rank stores the rows it owns in CSR form. Column indices are local:
//! owned columns come first (`col - owned.start`), followed by the off-process
//! columns in ascending global order. Those off-process entries of `x` are
//! fetched through a [`GhostImporter`] before every product.

use crate::algs::communicator::Communicator;
use crate::algs::wire::{self, WireEntry};
use crate::cdr_error::CdrError;
use crate::lac::ghost::GhostImporter;
use crate::lac::vector::DistributedVector;
use crate::topology::ownership::{DofPartition, rank_owning};
use std::collections::BTreeMap;
use std::ops::Range;

/// Accumulates `(row, col, value)` contributions for any row.
#[derive(Clone, Debug)]
pub struct MatrixBuilder {
    owned_ranges: Vec<Range<usize>>,
    rank: usize,
    rows: Vec<BTreeMap<usize, f64>>,
    remote: BTreeMap<(usize, usize), f64>,
}

impl MatrixBuilder {
    pub fn new(partition: &DofPartition) -> Self {
        Self {
            owned_ranges: partition.owned_ranges().to_vec(),
            rank: partition.rank(),
            rows: vec![BTreeMap::new(); partition.n_owned()],
            remote: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        let owned = &self.owned_ranges[self.rank];
        if owned.contains(&row) {
            *self.rows[row - owned.start].entry(col).or_insert(0.0) += value;
        } else {
            *self.remote.entry((row, col)).or_insert(0.0) += value;
        }
    }

    /// Collective: ship off-process rows to their owners, sum, and freeze.
    pub fn compress<C: Communicator + ?Sized>(mut self, comm: &C) -> Result<DistributedMatrix, CdrError> {
        let mut outgoing: Vec<Vec<WireEntry>> = vec![Vec::new(); comm.size()];
        for (&(row, col), &value) in &self.remote {
            outgoing[rank_owning(&self.owned_ranges, row)?].push(WireEntry::new(row, col, value));
        }
        let incoming = comm.exchange(
            outgoing
                .iter()
                .map(|records| wire::encode(wire::kind::MATRIX_ENTRIES, records))
                .collect(),
        )?;
        let owned = self.owned_ranges[self.rank].clone();
        for bytes in &incoming {
            for entry in wire::decode::<WireEntry>(wire::kind::MATRIX_ENTRIES, bytes)? {
                let (row, col, value) = entry.decode();
                if !owned.contains(&row) {
                    return Err(CdrError::IndexNotInSet {
                        index: row,
                        set: "locally owned rows",
                    });
                }
                *self.rows[row - owned.start].entry(col).or_insert(0.0) += value;
            }
        }

        let n_global = self.owned_ranges.last().map_or(0, |r| r.end);
        let mut ghost_cols: Vec<usize> = self
            .rows
            .iter()
            .flat_map(|row| row.keys().copied())
            .filter(|c| !owned.contains(c))
            .collect();
        ghost_cols.sort_unstable();
        ghost_cols.dedup();
        let importer = GhostImporter::new(&self.owned_ranges, ghost_cols, comm)?;

        let n_owned = owned.len();
        let mut row_ptr = Vec::with_capacity(n_owned + 1);
        let mut col_idx = Vec::new();
        let mut values = Vec::new();
        row_ptr.push(0);
        for row in &self.rows {
            let mut owned_part = Vec::new();
            let mut ghost_part = Vec::new();
            for (&col, &value) in row {
                if col >= n_global {
                    return Err(CdrError::IndexNotInSet {
                        index: col,
                        set: "global columns",
                    });
                }
                if owned.contains(&col) {
                    owned_part.push((col - owned.start, value));
                } else {
                    let pos = importer.ghosts().binary_search(&col).map_err(|_| {
                        CdrError::IndexNotInSet {
                            index: col,
                            set: "matrix ghost columns",
                        }
                    })?;
                    ghost_part.push((n_owned + pos, value));
                }
            }
            for (c, v) in owned_part.into_iter().chain(ghost_part) {
                col_idx.push(c);
                values.push(v);
            }
            row_ptr.push(col_idx.len());
        }
        log::debug!(
            "rank {}: compressed {} rows, {} nonzeros, {} ghost columns",
            self.rank,
            n_owned,
            values.len(),
            importer.n_ghosts()
        );
        Ok(DistributedMatrix {
            owned,
            n_global,
            row_ptr,
            col_idx,
            values,
            importer,
        })
    }
}

#[derive(Clone, Debug)]
pub struct DistributedMatrix {
    owned: Range<usize>,
    n_global: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<f64>,
    importer: GhostImporter,
}

impl DistributedMatrix {
    pub fn owned_range(&self) -> Range<usize> {
        self.owned.clone()
    }

    pub fn n_owned_rows(&self) -> usize {
        self.owned.len()
    }

    pub fn n_global(&self) -> usize {
        self.n_global
    }

    pub fn n_nonzeros(&self) -> usize {
        self.values.len()
    }

    fn global_col(&self, local: usize) -> usize {
        let n_owned = self.owned.len();
        if local < n_owned {
            self.owned.start + local
        } else {
            self.importer.ghosts()[local - n_owned]
        }
    }

    /// Local row `row`: local column indices and values.
    pub fn row(&self, row: usize) -> (&[usize], &[f64]) {
        let span = self.row_ptr[row]..self.row_ptr[row + 1];
        (&self.col_idx[span.clone()], &self.values[span])
    }

    /// Stored entries as `(global row, global col, value)`, row-major.
    pub fn triplets(&self) -> Vec<(usize, usize, f64)> {
        let mut out = Vec::with_capacity(self.values.len());
        for row in 0..self.n_owned_rows() {
            let (cols, vals) = self.row(row);
            for (&c, &v) in cols.iter().zip(vals) {
                out.push((self.owned.start + row, self.global_col(c), v));
            }
        }
        out
    }

    /// Entry `(row, col)` of an owned row, zero if not stored.
    pub fn el(&self, row: usize, col: usize) -> f64 {
        if !self.owned.contains(&row) {
            return 0.0;
        }
        let (cols, vals) = self.row(row - self.owned.start);
        cols.iter()
            .zip(vals)
            .find(|&(&c, _)| self.global_col(c) == col)
            .map_or(0.0, |(_, &v)| v)
    }

    /// Diagonal entries of the owned rows.
    pub fn diagonal(&self) -> Vec<f64> {
        (0..self.n_owned_rows())
            .map(|row| {
                let (cols, vals) = self.row(row);
                cols.iter()
                    .zip(vals)
                    .find(|&(&c, _)| c == row)
                    .map_or(0.0, |(_, &v)| v)
            })
            .collect()
    }

    /// Block of owned rows and owned columns as CSR (`row_ptr`, `cols`, `values`).
    pub fn owned_block(&self) -> (Vec<usize>, Vec<usize>, Vec<f64>) {
        let n_owned = self.owned.len();
        let mut row_ptr = vec![0];
        let mut cols = Vec::new();
        let mut values = Vec::new();
        for row in 0..n_owned {
            let (c, v) = self.row(row);
            for (&c, &v) in c.iter().zip(v) {
                if c < n_owned {
                    cols.push(c);
                    values.push(v);
                }
            }
            row_ptr.push(cols.len());
        }
        (row_ptr, cols, values)
    }

    /// Collective: `dst = A src`.
    pub fn vmult<C: Communicator + ?Sized>(
        &self,
        dst: &mut DistributedVector,
        src: &DistributedVector,
        comm: &C,
    ) -> Result<(), CdrError> {
        let ghosts = self.importer.import(src, comm)?;
        let owned = src.as_slice();
        let n_owned = owned.len();
        for (row, out) in dst.as_mut_slice().iter_mut().enumerate() {
            let (cols, vals) = self.row(row);
            *out = cols
                .iter()
                .zip(vals)
                .map(|(&c, &v)| {
                    let x = if c < n_owned { owned[c] } else { ghosts[c - n_owned] };
                    v * x
                })
                .sum();
        }
        Ok(())
    }

    /// Collective: `dst = b - A x`.
    pub fn residual<C: Communicator + ?Sized>(
        &self,
        dst: &mut DistributedVector,
        x: &DistributedVector,
        b: &DistributedVector,
        comm: &C,
    ) -> Result<(), CdrError> {
        self.vmult(dst, x, comm)?;
        dst.sadd(-1.0, 1.0, b);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::run_spmd;
    use crate::data::index_set::IndexSet;

    /// 1-D Laplacian `tridiag(-1, 2, -1)` on 6 unknowns, rows split 0..3 / 3..6,
    /// every row assembled by the rank that does *not* own it.
    #[test]
    fn remote_rows_are_compressed_and_multiplied() {
        let results = run_spmd(2, |comm| {
            let rank = comm.rank();
            let p = DofPartition::new(rank, vec![0..3, 3..6], IndexSet::from_range(rank * 3..rank * 3 + 3))
                .unwrap();
            let mut b = MatrixBuilder::new(&p);
            let foreign = if rank == 0 { 3..6 } else { 0..3 };
            for i in foreign {
                b.add(i, i, 2.0);
                if i > 0 {
                    b.add(i, i - 1, -1.0);
                }
                if i < 5 {
                    b.add(i, i + 1, -1.0);
                }
            }
            let a = b.compress(&comm).unwrap();
            let mut x = DistributedVector::from_partition(&p);
            x.fill(1.0);
            let mut y = x.zeros_like();
            a.vmult(&mut y, &x, &comm).unwrap();
            (y.as_slice().to_vec(), a.diagonal(), a.el(rank * 3, rank * 3 + 1))
        });
        assert_eq!(results[0].0, vec![1.0, 0.0, 0.0]);
        assert_eq!(results[1].0, vec![0.0, 0.0, 1.0]);
        assert_eq!(results[0].1, vec![2.0; 3]);
        assert_eq!(results[1].2, -1.0);
    }
}
