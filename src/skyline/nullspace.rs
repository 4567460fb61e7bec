//! Null-space recovery for near-singular factorisations (spec section
//! 4.3.1, `getNullSpace`).
//!
//! When `factor` substitutes a tiny pivot rather than failing outright,
//! solving the factored system against a unit load at that pivot's DOF
//! is one step of inverse iteration: the tiny pivot dominates the
//! solution, so the result is (up to scale) a vector spanning the
//! near-null direction. Grounded in the documented role of
//! `SkylineLU::getNullSpace` in
//! `original_source/jive-3.0/packages/solver/src/SkylineLU.cpp`, which
//! recovers one vector per reported zero pivot the same way.

use crate::skyline::blocks::SkylineStorage;
use crate::skyline::reorder::Permutation;
use crate::skyline::triangular::solve;

/// Recovers a single (normalized) near-null vector for the DOF that
/// produced a zero/substituted pivot at `dof_index`.
pub fn null_space_vector(storage: &SkylineStorage, scale: &[f64], perm: &Permutation, dof_index: usize) -> Vec<f64> {
    let n = perm.perm.len();
    let mut b = vec![0.0_f64; n];
    b[dof_index] = 1.0;

    let mut x = solve(storage, scale, perm, &b);
    let norm = x.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm > 0.0 {
        for v in x.iter_mut() {
            *v /= norm;
        }
    }
    x
}

/// Recovers one normalized vector per reported zero pivot, in the order
/// the pivots were encountered during factorisation.
pub fn recover_null_space(
    storage: &SkylineStorage,
    scale: &[f64],
    perm: &Permutation,
    zero_pivot_dofs: &[usize],
) -> Vec<Vec<f64>> {
    zero_pivot_dofs
        .iter()
        .map(|&i| null_space_vector(storage, scale, perm, i))
        .collect()
}
