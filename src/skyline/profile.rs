//! Skyline profile computation (spec sections 3, 4.3.3).
//!
//! Grounded in `fea-solver::math::sparse::SparseCholeskySolver::new`'s
//! column-height scan, generalized from per-row scalar heights to
//! per-block-column profiles over 4-wide block-columns, and from a
//! single-pass triangular scan to one driven by the permutation.

use crate::matrix::SparseMatrixView;
use crate::skyline::reorder::Permutation;

/// `top[k]` for each block-column `k` (`k` in `[0, block_count)`), the
/// index of the first block-row whose 4x4 block in column `k` is stored.
#[derive(Debug, Clone)]
pub struct SkylineProfile {
    pub n: usize,
    pub block_count: usize,
    pub top: Vec<usize>,
}

impl SkylineProfile {
    /// Scans the permuted structure once: for every stored entry `(r, c)`
    /// of the original matrix, its permuted position is
    /// `(iperm[r], iperm[c])`. Because the matrix is structurally
    /// symmetric, scanning only upper-triangular permuted positions
    /// (`pi <= pj`) still sees every block-column's topmost block.
    pub fn compute(view: &dyn SparseMatrixView, perm: &Permutation) -> Self {
        let (n, _) = view.shape();
        let block_count = n.div_ceil(4);
        let mut top: Vec<usize> = (0..block_count).collect(); // top[k] <= k always

        for r in 0..n {
            let pi = perm.iperm[r];
            for &c in view.columns(r) {
                let pj = perm.iperm[c];
                if pi <= pj {
                    let k = pj / 4;
                    let block_row = pi / 4;
                    if block_row < top[k] {
                        top[k] = block_row;
                    }
                }
            }
        }

        Self { n, block_count, top }
    }

    pub fn total_profile(&self) -> usize {
        self.top
            .iter()
            .enumerate()
            .map(|(k, &t)| k - t)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::CsrMatrixBuilder;

    #[test]
    fn identity_matrix_has_trivial_profile() {
        let mut b = CsrMatrixBuilder::new(8);
        for i in 0..8 {
            b.add(i, i, 1.0);
        }
        let m = b.build();
        let perm = Permutation::identity(8);
        let profile = SkylineProfile::compute(&m, &perm);
        assert_eq!(profile.block_count, 2);
        assert_eq!(profile.top, vec![0, 1]);
        assert_eq!(profile.total_profile(), 0);
    }

    #[test]
    fn dense_block_widens_profile() {
        // n=4 fully dense single block-column: top[0] must stay 0.
        let mut b = CsrMatrixBuilder::new(4);
        for i in 0..4 {
            for j in 0..4 {
                b.add(i, j, 1.0);
            }
        }
        let m = b.build();
        let perm = Permutation::identity(4);
        let profile = SkylineProfile::compute(&m, &perm);
        assert_eq!(profile.top, vec![0]);
    }
}
