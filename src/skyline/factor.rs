//! Blocked Crout factorisation (spec section 4.3.5).
//!
//! Grounded in the teacher's `SparseCholeskySolver::factorize`'s row-by-row
//! Crout-style recursion (dot-product update, then divide by the diagonal
//! already factored), generalized from scalar symmetric Cholesky to
//! blocked, non-symmetric-pivot LU with a 4x4 dense inner kernel, and in
//! the block-storage convention documented in
//! `original_source/jive-3.0/packages/solver/src/SkylineSolver.cpp`
//! (upper blocks column-wise, lower blocks row-wise, pivot blocks holding
//! both triangles).

use log::{debug, warn};

use crate::error::{SolverError, SolverResult};
use crate::skyline::blocks::{
    gemm_sub, lu4_inplace, solve_lower_unit_right, solve_upper_left, transpose_block, SkylineStorage,
};

/// Tri-state signal a progress callback may return, per spec section 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressSignal {
    Continue,
    Suspend,
    Cancel,
}

pub type ProgressCallback<'a> = dyn FnMut(usize, usize) -> ProgressSignal + 'a;
pub type PivotCallback<'a> = dyn FnMut(usize, f64) + 'a;

pub struct FactorOutcome {
    /// Scalar diagonal of U after factorisation, length `block_count * 4`
    /// (including padding slots, whose diagonal is always 1).
    pub diag: Vec<f64>,
    pub zero_pivots: usize,
    pub first_zero_pivot: Option<(usize, f64)>,
}

pub struct FactorOptions {
    pub zero_threshold: f64,
    pub max_zero_pivots: usize,
    pub progress_stride: usize,
}

/// Runs the blocked Crout sweep over `storage` in place.
///
/// `scale` must have length `block_count * 4` (real rows followed by the
/// padding rows, always 1.0 for the latter).
pub fn factor(
    storage: &mut SkylineStorage,
    scale: &[f64],
    opts: &FactorOptions,
    mut progress_cb: Option<&mut ProgressCallback>,
    mut pivot_cb: Option<&mut PivotCallback>,
) -> SolverResult<FactorOutcome> {
    let n_blocks = storage.block_count;
    let mut diag = vec![0.0_f64; n_blocks * 4];
    let mut zero_pivots = 0usize;
    let mut first_zero_pivot: Option<(usize, f64)> = None;

    for k in 0..n_blocks {
        let top_k = storage.top[k];

        // Step 1/2: update then divide each stored upper block U(r,k).
        for r in top_k..k {
            let mut raw = *storage.upper_block(k, r);
            let top_r = storage.top[r];
            let lo = top_k.max(top_r);
            for j in lo..r {
                let l_rj = transpose_block(storage.lower_block(r, j));
                let u_jk = *storage.upper_block(k, j);
                gemm_sub(&mut raw, &l_rj, &u_jk);
            }
            let pivot_r = *storage.pivot_block(r);
            let solved = solve_upper_left(&pivot_r, &raw);
            *storage.upper_block_mut(k, r) = solved;
        }

        // Step 3/4: update then divide each stored lower block L(k,r). The
        // lower arena is stored column-major within each block, so every
        // read/write here goes through `transpose_block` at the boundary.
        for r in top_k..k {
            let mut raw = transpose_block(storage.lower_block(k, r));
            let top_r = storage.top[r];
            let lo = top_k.max(top_r);
            for j in lo..r {
                let l_kj = transpose_block(storage.lower_block(k, j));
                let u_rj = *storage.upper_block(r, j);
                gemm_sub(&mut raw, &l_kj, &u_rj);
            }
            let pivot_r = *storage.pivot_block(r);
            let solved = solve_lower_unit_right(&raw, &pivot_r);
            *storage.lower_block_mut(k, r) = transpose_block(&solved);
        }

        // Step 5: update the pivot block with the Schur complement contribution.
        for j in top_k..k {
            let l_kj = transpose_block(storage.lower_block(k, j));
            let u_jk = *storage.upper_block(k, j);
            let pivot = storage.pivot_block_mut(k);
            gemm_sub(pivot, &l_kj, &u_jk);
        }

        // Step 6: factor the 4x4 pivot block in place.
        {
            let pivot = storage.pivot_block_mut(k);
            lu4_inplace(pivot);
        }

        // Step 7: pivot check, substitution, and budget enforcement.
        for local in 0..4 {
            let i = k * 4 + local;
            let s = scale[i];
            let pivot = storage.pivot_block_mut(k);
            let d = pivot[local * 4 + local];
            diag[i] = d;

            if d.abs() < opts.zero_threshold * s {
                if let Some(cb) = pivot_cb.as_mut() {
                    cb(i, d);
                }
                if first_zero_pivot.is_none() {
                    first_zero_pivot = Some((i, d));
                }
                zero_pivots += 1;
                if zero_pivots > opts.max_zero_pivots {
                    warn!(
                        "singular matrix: {zero_pivots} zero pivots exceed budget {}, first at index {i}",
                        opts.max_zero_pivots
                    );
                    return Err(SolverError::SingularMatrix {
                        zero_pivots,
                        first_index: first_zero_pivot.unwrap().0,
                        first_magnitude: first_zero_pivot.unwrap().1.abs(),
                    });
                }
                let replacement = if d >= 0.0 {
                    opts.zero_threshold * s
                } else {
                    -opts.zero_threshold * s
                };
                let pivot = storage.pivot_block_mut(k);
                pivot[local * 4 + local] = replacement;
                diag[i] = replacement;
            }
        }

        // Step 8: progress reporting and cooperative cancellation.
        if opts.progress_stride > 0 && (k + 1) % opts.progress_stride == 0 {
            if let Some(cb) = progress_cb.as_mut() {
                match cb(k + 1, n_blocks) {
                    ProgressSignal::Continue => {}
                    ProgressSignal::Suspend => {
                        debug!("factorisation suspended at block-column {k}");
                    }
                    ProgressSignal::Cancel => {
                        return Err(SolverError::Cancelled(k));
                    }
                }
            }
        }
    }

    Ok(FactorOutcome {
        diag,
        zero_pivots,
        first_zero_pivot,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::CsrMatrixBuilder;
    use crate::skyline::assemble::assemble;
    use crate::skyline::profile::SkylineProfile;
    use crate::skyline::reorder::Permutation;

    fn padded_scale(scale: &[f64], block_count: usize) -> Vec<f64> {
        let mut v = scale.to_vec();
        v.resize(block_count * 4, 1.0);
        v
    }

    #[test]
    fn factoring_identity_keeps_unit_diagonal() {
        let mut b = CsrMatrixBuilder::new(9);
        for i in 0..9 {
            b.add(i, i, 1.0);
        }
        let m = b.build();
        let perm = Permutation::identity(9);
        let profile = SkylineProfile::compute(&m, &perm);
        let mut assembled = assemble(&m, &perm, &profile).unwrap();
        let scale = padded_scale(&assembled.scale, profile.block_count);

        let opts = FactorOptions {
            zero_threshold: 1e-15,
            max_zero_pivots: 0,
            progress_stride: 0,
        };
        let outcome = factor(&mut assembled.storage, &scale, &opts, None, None).unwrap();
        for i in 0..9 {
            assert!((outcome.diag[i] - 1.0).abs() < 1e-12);
        }
        assert_eq!(outcome.zero_pivots, 0);
    }

    #[test]
    fn tridiagonal_system_factors_without_zero_pivots() {
        let n = 6;
        let mut b = CsrMatrixBuilder::new(n);
        for i in 0..n {
            b.add(i, i, 2.0);
            if i + 1 < n {
                b.add(i, i + 1, -1.0);
                b.add(i + 1, i, -1.0);
            }
        }
        let m = b.build();
        let perm = Permutation::identity(n);
        let profile = SkylineProfile::compute(&m, &perm);
        let mut assembled = assemble(&m, &perm, &profile).unwrap();
        let scale = padded_scale(&assembled.scale, profile.block_count);

        let opts = FactorOptions {
            zero_threshold: 1e-15,
            max_zero_pivots: 0,
            progress_stride: 0,
        };
        let outcome = factor(&mut assembled.storage, &scale, &opts, None, None).unwrap();
        assert_eq!(outcome.zero_pivots, 0);
        for i in 0..n {
            assert!(outcome.diag[i].abs() > 1e-6);
        }
    }

    #[test]
    fn singular_matrix_is_detected() {
        // diag(1,1,0,1)
        let mut b = CsrMatrixBuilder::new(4);
        b.add(0, 0, 1.0);
        b.add(1, 1, 1.0);
        b.add(2, 2, 0.0);
        b.add(3, 3, 1.0);
        // add(…, 0.0) is dropped by the builder, add explicit tiny epsilon-free
        // zero by forcing the entry through a nonzero-then-cancel pair.
        b.add(2, 2, 1.0);
        b.add(2, 2, -1.0);
        let m = b.build();
        let perm = Permutation::identity(4);
        let profile = SkylineProfile::compute(&m, &perm);
        let mut assembled = assemble(&m, &perm, &profile).unwrap();
        let scale = padded_scale(&assembled.scale, profile.block_count);

        let opts = FactorOptions {
            zero_threshold: 1e-15,
            max_zero_pivots: 0,
            progress_stride: 0,
        };
        let err = factor(&mut assembled.storage, &scale, &opts, None, None).unwrap_err();
        match err {
            SolverError::SingularMatrix { first_index, .. } => assert_eq!(first_index, 2),
            other => panic!("expected SingularMatrix, got {other:?}"),
        }
    }
}
