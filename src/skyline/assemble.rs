//! Row equilibration and assembly into the blocked skyline arenas
//! (spec section 4.3.4).

use crate::error::SolverError;
use crate::matrix::SparseMatrixView;
use crate::skyline::blocks::SkylineStorage;
use crate::skyline::profile::SkylineProfile;
use crate::skyline::reorder::Permutation;

pub struct Assembled {
    pub storage: SkylineStorage,
    /// Row scale factors, length `n` (padding rows are not part of this
    /// vector; they are fixed at scale 1 directly in the arenas).
    pub scale: Vec<f64>,
}

/// `scale[i] = max(|A(perm(i), perm(j))|, tiny)`, `tiny = eps_mach * ||A||_inf`.
/// Walks the permuted structure once, dividing each assembled value by the
/// scale of its row and writing it into the correct 4x4 cell of the pivot,
/// upper, or lower arena. The tail when `n mod 4 != 0` is padded with
/// identity rows/columns (diagonal 1, skipped by the solves).
pub fn assemble(
    view: &dyn SparseMatrixView,
    perm: &Permutation,
    profile: &SkylineProfile,
) -> Result<Assembled, SolverError> {
    let n = profile.n;

    let mut mat_inf_norm = 0.0_f64;
    for i in 0..n {
        mat_inf_norm = mat_inf_norm.max(view.row_abs_max(i));
    }
    let tiny = f64::EPSILON * mat_inf_norm.max(1.0);

    let mut scale = vec![0.0_f64; n];
    for pi in 0..n {
        let orig_row = perm.perm[pi];
        scale[pi] = view.row_abs_max(orig_row).max(tiny);
    }

    let mut storage = SkylineStorage::allocate(profile.block_count, profile.top.clone())?;

    for r in 0..n {
        let pi = perm.iperm[r];
        let s = scale[pi];
        for (&c, &val) in view.columns(r).iter().zip(view.values(r).iter()) {
            let pj = perm.iperm[c];
            place(&mut storage, pi, pj, val / s);
        }
    }

    // Pad the tail block-column: rows/cols in [n, block_count*4) behave as
    // an identity block, so only their diagonal needs to be set (the rest
    // of the arenas were already zero-initialized on allocation).
    let padded_n = profile.block_count * 4;
    for pi in n..padded_n {
        place(&mut storage, pi, pi, 1.0);
    }

    Ok(Assembled { storage, scale })
}

#[inline]
fn place(storage: &mut SkylineStorage, pi: usize, pj: usize, value: f64) {
    let (kr, rr) = (pi / 4, pi % 4);
    let (kc, cc) = (pj / 4, pj % 4);

    if kr == kc {
        let block = storage.pivot_block_mut(kr);
        block[rr * 4 + cc] += value;
    } else if kr < kc {
        // Upper arena, row-major within each 4x4.
        let block = storage.upper_block_mut(kc, kr);
        block[rr * 4 + cc] += value;
    } else {
        // Lower arena, column-major within each 4x4.
        let block = storage.lower_block_mut(kr, kc);
        let idx = cc * 4 + rr;
        block[idx] += value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::CsrMatrixBuilder;

    #[test]
    fn assembles_identity_with_unit_scale() {
        let mut b = CsrMatrixBuilder::new(5);
        for i in 0..5 {
            b.add(i, i, 1.0);
        }
        let m = b.build();
        let perm = Permutation::identity(5);
        let profile = SkylineProfile::compute(&m, &perm);
        let assembled = assemble(&m, &perm, &profile).unwrap();

        assert_eq!(assembled.scale, vec![1.0; 5]);
        for k in 0..profile.block_count {
            let block = assembled.storage.pivot_block(k);
            for r in 0..4 {
                for c in 0..4 {
                    let expect = if r == c { 1.0 } else { 0.0 };
                    assert!((block[r * 4 + c] - expect).abs() < 1e-12);
                }
            }
        }
    }

    #[test]
    fn scale_uses_row_max_abs() {
        let mut b = CsrMatrixBuilder::new(2);
        b.add(0, 0, 2.0);
        b.add(0, 1, 4.0);
        b.add(1, 0, 4.0);
        b.add(1, 1, 2.0);
        let m = b.build();
        let perm = Permutation::identity(2);
        let profile = SkylineProfile::compute(&m, &perm);
        let assembled = assemble(&m, &perm, &profile).unwrap();
        assert_eq!(assembled.scale, vec![4.0, 4.0]);

        let pivot = assembled.storage.pivot_block(0);
        assert!((pivot[0 * 4 + 0] - 0.5).abs() < 1e-12); // 2.0 / 4.0
        assert!((pivot[0 * 4 + 1] - 1.0).abs() < 1e-12); // 4.0 / 4.0
    }
}
