//! Read-only sparse matrix view (C1)
//!
//! Grounded in `SparseMatrixBuilder`/`CsrMatrix` from the teacher's
//! `math::sparse` module: a COO-style builder accumulates triplets during
//! assembly, then converts once to a row-major CSR view for the factoriser.
//! Unlike the teacher, construction also bumps explicit version counters so
//! a caller (the façade, C4) can detect out-of-band changes without an
//! observer graph.

use std::ops::Range;

use nalgebra_sparse::{CooMatrix, CsrMatrix as NaCsrMatrix};

/// Read-only random access to a sparse matrix and its symbolic structure.
///
/// No side effects. Concurrent readers are safe as long as
/// `structure_version` stays stable across the calls they make.
pub trait SparseMatrixView {
    /// `(rows, cols)`. Callers of this crate require a square matrix.
    fn shape(&self) -> (usize, usize);

    /// Byte range of row `i` into `columns`/`values`.
    fn row_range(&self, i: usize) -> Range<usize>;

    /// Sorted column indices of row `i`.
    fn columns(&self, i: usize) -> &[usize];

    /// Values of row `i`, aligned with `columns(i)`.
    fn values(&self, i: usize) -> &[f64];

    /// Monotonically increasing counter bumped on any structural change.
    fn structure_version(&self) -> u64;

    /// Monotonically increasing counter bumped on any value change.
    /// Structural changes always bump this too.
    fn values_version(&self) -> u64;

    /// Optional hint used only for storage savings, never for correctness.
    fn has_trait(&self, name: &str) -> bool {
        let _ = name;
        false
    }

    /// Largest absolute value in row `i`, used for row equilibration.
    fn row_abs_max(&self, i: usize) -> f64 {
        self.values(i).iter().fold(0.0_f64, |m, v| m.max(v.abs()))
    }

    /// Value at `(i, j)`, or `0.0` if not stored.
    fn get(&self, i: usize, j: usize) -> f64 {
        let cols = self.columns(i);
        match cols.binary_search(&j) {
            Ok(pos) => self.values(i)[pos],
            Err(_) => 0.0,
        }
    }
}

/// Owned CSR-like sparse matrix, built incrementally then frozen into
/// row-major storage.
#[derive(Debug, Clone)]
pub struct CsrMatrix {
    n: usize,
    row_off: Vec<usize>,
    col_idx: Vec<usize>,
    val: Vec<f64>,
    structure_version: u64,
    values_version: u64,
    symmetric_hint: bool,
}

impl CsrMatrix {
    /// Build from pre-sorted CSR arrays. Panics (via assembly invariants,
    /// not caller mistakes) are avoided; callers get `BadMatrixShape`
    /// through [`CsrMatrixBuilder`] instead when the arrays are malformed.
    pub fn from_raw_parts(n: usize, row_off: Vec<usize>, col_idx: Vec<usize>, val: Vec<f64>) -> Self {
        Self {
            n,
            row_off,
            col_idx,
            val,
            structure_version: 0,
            values_version: 0,
            symmetric_hint: false,
        }
    }

    /// Adapt an `nalgebra_sparse` CSR matrix (the format FE assembly code
    /// typically already holds) without re-sorting.
    pub fn from_nalgebra(csr: &NaCsrMatrix<f64>) -> Self {
        let n = csr.nrows();
        Self::from_raw_parts(
            n,
            csr.row_offsets().to_vec(),
            csr.col_indices().to_vec(),
            csr.values().to_vec(),
        )
    }

    /// Adapt an `nalgebra_sparse` COO matrix by converting through CSR.
    pub fn from_coo(coo: &CooMatrix<f64>) -> Self {
        Self::from_nalgebra(&NaCsrMatrix::from(coo))
    }

    /// Mark this matrix as structurally symmetric, a storage hint only.
    pub fn with_symmetric_hint(mut self, symmetric: bool) -> Self {
        self.symmetric_hint = symmetric;
        self
    }

    /// Bump both version counters; call after mutating values/structure
    /// through a path that bypasses the builder (e.g. in-place scaling).
    pub fn touch_structure(&mut self) {
        self.structure_version += 1;
        self.values_version += 1;
    }

    pub fn touch_values(&mut self) {
        self.values_version += 1;
    }

    pub fn nnz(&self) -> usize {
        self.val.len()
    }
}

impl SparseMatrixView for CsrMatrix {
    fn shape(&self) -> (usize, usize) {
        (self.n, self.n)
    }

    fn row_range(&self, i: usize) -> Range<usize> {
        self.row_off[i]..self.row_off[i + 1]
    }

    fn columns(&self, i: usize) -> &[usize] {
        &self.col_idx[self.row_range(i)]
    }

    fn values(&self, i: usize) -> &[f64] {
        &self.val[self.row_range(i)]
    }

    fn structure_version(&self) -> u64 {
        self.structure_version
    }

    fn values_version(&self) -> u64 {
        self.values_version
    }

    fn has_trait(&self, name: &str) -> bool {
        name == "symmetric" && self.symmetric_hint
    }
}

/// Incremental COO-style builder, grounded in the teacher's
/// `SparseMatrixBuilder`: accumulates `(row, col, value)` triplets during
/// assembly (duplicates accumulate additively, matching finite-element
/// scatter-add semantics) and freezes into a [`CsrMatrix`] on demand.
pub struct CsrMatrixBuilder {
    n: usize,
    entries: Vec<(usize, usize, f64)>,
}

impl CsrMatrixBuilder {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            entries: Vec::with_capacity(n * 8),
        }
    }

    #[inline]
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        if value != 0.0 {
            self.entries.push((row, col, value));
        }
    }

    /// Freeze into a [`CsrMatrix`], summing duplicate entries and sorting
    /// columns within each row.
    pub fn build(self) -> CsrMatrix {
        let n = self.n;
        let mut rows: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
        for (r, c, v) in self.entries {
            rows[r].push((c, v));
        }

        let mut row_off = Vec::with_capacity(n + 1);
        let mut col_idx = Vec::new();
        let mut val = Vec::new();
        row_off.push(0);

        for row in rows.iter_mut() {
            row.sort_by_key(|&(c, _)| c);
            let mut merged: Vec<(usize, f64)> = Vec::with_capacity(row.len());
            for &(c, v) in row.iter() {
                if let Some(last) = merged.last_mut() {
                    if last.0 == c {
                        last.1 += v;
                        continue;
                    }
                }
                merged.push((c, v));
            }
            for (c, v) in merged {
                col_idx.push(c);
                val.push(v);
            }
            row_off.push(col_idx.len());
        }

        CsrMatrix::from_raw_parts(n, row_off, col_idx, val)
    }
}

/// Copy any [`SparseMatrixView`] into an owned [`CsrMatrix`], e.g. to snapshot
/// a reduced matrix produced by a constraint handler.
pub fn to_owned_csr(view: &dyn SparseMatrixView) -> CsrMatrix {
    let (n, _) = view.shape();
    let mut row_off = Vec::with_capacity(n + 1);
    let mut col_idx = Vec::new();
    let mut val = Vec::new();
    row_off.push(0);
    for i in 0..n {
        col_idx.extend_from_slice(view.columns(i));
        val.extend_from_slice(view.values(i));
        row_off.push(col_idx.len());
    }
    CsrMatrix::from_raw_parts(n, row_off, col_idx, val).with_symmetric_hint(view.has_trait("symmetric"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_merges_duplicates_and_sorts_columns() {
        let mut b = CsrMatrixBuilder::new(3);
        b.add(0, 2, 1.0);
        b.add(0, 0, 4.0);
        b.add(0, 2, 1.0); // duplicate, should accumulate
        b.add(1, 1, 2.0);
        b.add(2, 2, 5.0);

        let m = b.build();
        assert_eq!(m.shape(), (3, 3));
        assert_eq!(m.columns(0), &[0, 2]);
        assert_eq!(m.values(0), &[4.0, 2.0]);
        assert_eq!(m.get(0, 2), 2.0);
        assert_eq!(m.get(1, 0), 0.0);
    }

    #[test]
    fn row_abs_max_and_versions() {
        let mut b = CsrMatrixBuilder::new(2);
        b.add(0, 0, -3.0);
        b.add(0, 1, 2.0);
        let mut m = b.build();
        assert_eq!(m.row_abs_max(0), 3.0);
        assert_eq!(m.structure_version(), 0);
        m.touch_structure();
        assert_eq!(m.structure_version(), 1);
        assert_eq!(m.values_version(), 1);
    }
}
