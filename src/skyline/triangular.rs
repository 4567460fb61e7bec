//! Forward/back triangular solves (spec section 4.3.6).

use crate::skyline::blocks::{
    block_matvec_sub, solve_lower_unit_vec, solve_upper_vec, transpose_block, SkylineStorage,
};
use crate::skyline::reorder::Permutation;

/// Solves `A x = b` given the factored `storage`, row `scale`, and the
/// permutation used to build it. `scale` and the returned/accepted
/// vectors are in the *real* (unpadded) DOF space of length `n`.
pub fn solve(storage: &SkylineStorage, scale: &[f64], perm: &Permutation, b: &[f64]) -> Vec<f64> {
    let n = perm.perm.len();
    let padded_n = storage.block_count * 4;

    // Step 1: apply row scaling and permutation.
    let mut z = vec![0.0_f64; padded_n];
    for i in 0..n {
        z[i] = b[perm.perm[i]] / scale[i];
    }

    // Step 2: forward solve L*z = y, block-column sweep.
    for k in 0..storage.block_count {
        let top_k = storage.top[k];
        let mut head = [z[k * 4], z[k * 4 + 1], z[k * 4 + 2], z[k * 4 + 3]];
        for r in top_k..k {
            // Lower arena is stored column-major within each block; recover
            // the true L(k,r) before feeding the row-major matvec kernel.
            let block = transpose_block(storage.lower_block(k, r));
            let tail = [z[r * 4], z[r * 4 + 1], z[r * 4 + 2], z[r * 4 + 3]];
            block_matvec_sub(&mut head, &block, &tail);
        }
        let pivot = storage.pivot_block(k);
        solve_lower_unit_vec(pivot, &mut head);
        z[k * 4..k * 4 + 4].copy_from_slice(&head);
    }

    // Step 3: back solve U*w = z, block-column sweep from the last column back.
    let mut w = z;
    for k in (0..storage.block_count).rev() {
        let mut block_rhs = [
            w[k * 4],
            w[k * 4 + 1],
            w[k * 4 + 2],
            w[k * 4 + 3],
        ];
        let pivot = storage.pivot_block(k);
        solve_upper_vec(pivot, &mut block_rhs);
        w[k * 4..k * 4 + 4].copy_from_slice(&block_rhs);

        let top_k = storage.top[k];
        for r in top_k..k {
            let block = storage.upper_block(k, r);
            let mut head = [w[r * 4], w[r * 4 + 1], w[r * 4 + 2], w[r * 4 + 3]];
            // `block` holds U(r,k) row-major; subtract U(r,k) * w_k from w_r.
            block_matvec_sub(&mut head, block, &block_rhs);
            w[r * 4..r * 4 + 4].copy_from_slice(&head);
        }
    }

    // Step 4: unpermute.
    let mut x = vec![0.0_f64; n];
    for i in 0..n {
        x[perm.perm[i]] = w[i];
    }
    x
}
