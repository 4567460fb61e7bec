//! Dense 4x4 block kernels and the three heap arenas of the blocked
//! skyline storage layout (spec section 3, "Block storage layout").
//!
//! A `Block` is 16 contiguous `f64`s, row-major, sized for SIMD. The
//! pivot arena holds one diagonal block per block-column; the upper and
//! lower arenas hold the off-diagonal panels above/left of the profile,
//! stored column-wise and row-wise respectively so that, during the
//! Crout sweep, each panel is contiguous in the direction it is walked.

use crate::error::SolverError;

pub const B: usize = 4;
pub type Block = [f64; 16];

#[inline]
pub fn zero_block() -> Block {
    [0.0; 16]
}

#[inline]
pub fn block_get(b: &Block, row: usize, col: usize) -> f64 {
    b[row * B + col]
}

#[inline]
pub fn block_set(b: &mut Block, row: usize, col: usize, v: f64) {
    b[row * B + col] = v;
}

/// `c -= a * b`, all dense row-major 4x4.
pub fn gemm_sub(c: &mut Block, a: &Block, b: &Block) {
    for i in 0..B {
        for j in 0..B {
            let mut acc = 0.0;
            for k in 0..B {
                acc += a[i * B + k] * b[k * B + j];
            }
            c[i * B + j] -= acc;
        }
    }
}

/// Solves `U * X = Rhs` for `X`, `U` upper triangular (diagonal included,
/// not necessarily unit). Back-substitution, one column of `Rhs` at a time
/// (the "4x4 upper-triangular solve with four right-hand sides" of
/// spec section 4.3.5 step 2).
pub fn solve_upper_left(u: &Block, rhs: &Block) -> Block {
    let mut x = zero_block();
    for col in 0..B {
        for row in (0..B).rev() {
            let mut acc = rhs[row * B + col];
            for k in (row + 1)..B {
                acc -= u[row * B + k] * x[k * B + col];
            }
            x[row * B + col] = acc / u[row * B + row];
        }
    }
    x
}

/// Solves `X * L = Rhs` for `X`, `L` unit lower triangular, by transposing
/// to `L^T * X^T = Rhs^T` (`L^T` is unit upper triangular) and solving
/// column-by-column (spec section 4.3.5 step 4).
pub fn solve_lower_unit_right(rhs: &Block, l: &Block) -> Block {
    // Work with transposes: solve U' y = b' where U' = L^T (unit upper).
    let mut lt = zero_block();
    for r in 0..B {
        for c in 0..B {
            lt[r * B + c] = l[c * B + r];
        }
    }
    let mut rhs_t = zero_block();
    for r in 0..B {
        for c in 0..B {
            rhs_t[r * B + c] = rhs[c * B + r];
        }
    }

    let mut x_t = zero_block();
    for col in 0..B {
        for row in (0..B).rev() {
            let mut acc = rhs_t[row * B + col];
            for k in (row + 1)..B {
                acc -= lt[row * B + k] * x_t[k * B + col];
            }
            // lt diagonal is 1 (unit), no division needed.
            x_t[row * B + col] = acc;
        }
    }

    let mut x = zero_block();
    for r in 0..B {
        for c in 0..B {
            x[r * B + c] = x_t[c * B + r];
        }
    }
    x
}

/// Transposes a 4x4 row-major block. Used at the boundary of the lower
/// arena, which is stored column-major within each block (spec section 3)
/// so that panels are contiguous during the Crout sweep: callers read a
/// true `L(k,r)` via `transpose_block(storage.lower_block(k, r))` and
/// write one back the same way.
#[inline]
pub fn transpose_block(b: &Block) -> Block {
    let mut t = zero_block();
    for r in 0..B {
        for c in 0..B {
            t[c * B + r] = b[r * B + c];
        }
    }
    t
}

/// In-place Doolittle LU of a 4x4 block with unit lower diagonal.
/// On return the strict lower triangle of `p` holds `L` (unit diagonal
/// implied) and the upper triangle (incl. diagonal) holds `U`.
pub fn lu4_inplace(p: &mut Block) {
    for i in 0..B {
        for j in i..B {
            let mut acc = p[i * B + j];
            for k in 0..i {
                acc -= p[i * B + k] * p[k * B + j];
            }
            p[i * B + j] = acc;
        }
        for j in (i + 1)..B {
            let mut acc = p[j * B + i];
            for k in 0..i {
                acc -= p[j * B + k] * p[k * B + i];
            }
            let diag = p[i * B + i];
            p[j * B + i] = if diag != 0.0 { acc / diag } else { 0.0 };
        }
    }
}

/// `acc -= a * x` for a 4x4 block `a` and a length-4 vector `x`.
#[inline]
pub fn block_matvec_sub(acc: &mut [f64; 4], a: &Block, x: &[f64; 4]) {
    for i in 0..B {
        let mut s = 0.0;
        for j in 0..B {
            s += a[i * B + j] * x[j];
        }
        acc[i] -= s;
    }
}

/// Forward-substitutes `rhs` in place against unit lower-triangular `l`.
pub fn solve_lower_unit_vec(l: &Block, rhs: &mut [f64; 4]) {
    for row in 0..B {
        let mut acc = rhs[row];
        for k in 0..row {
            acc -= l[row * B + k] * rhs[k];
        }
        rhs[row] = acc; // unit diagonal
    }
}

/// Back-substitutes `rhs` in place against upper-triangular `u`.
pub fn solve_upper_vec(u: &Block, rhs: &mut [f64; 4]) {
    for row in (0..B).rev() {
        let mut acc = rhs[row];
        for k in (row + 1)..B {
            acc -= u[row * B + k] * rhs[k];
        }
        rhs[row] = acc / u[row * B + row];
    }
}

/// Arena offsets for one block-column's panel: `count` stacked 4x4 blocks
/// starting at `start` (in `Block`-sized units, i.e. multiply by 16 for a
/// flat `f64` offset).
#[derive(Debug, Clone, Copy)]
pub struct PanelRange {
    pub start: usize,
    pub count: usize,
}

/// The three arenas plus the profile they were sized from.
pub struct SkylineStorage {
    pub block_count: usize,
    pub top: Vec<usize>,
    /// One 4x4 block per block-column, row-major.
    pub pivot: Vec<f64>,
    /// Off-diagonal upper panels, contiguous per block-column.
    pub upper: Vec<f64>,
    pub upper_panels: Vec<PanelRange>,
    /// Off-diagonal lower panels, contiguous per block-row.
    pub lower: Vec<f64>,
    pub lower_panels: Vec<PanelRange>,
}

impl SkylineStorage {
    /// Allocates the three arenas for the given profile, failing with
    /// `OutOfMemory` rather than aborting if the allocation cannot be
    /// satisfied.
    pub fn allocate(block_count: usize, top: Vec<usize>) -> Result<Self, SolverError> {
        let mut upper_panels = Vec::with_capacity(block_count);
        let mut lower_panels = Vec::with_capacity(block_count);
        let mut upper_len = 0usize;
        let mut lower_len = 0usize;
        for k in 0..block_count {
            let count = k - top[k];
            upper_panels.push(PanelRange {
                start: upper_len,
                count,
            });
            lower_panels.push(PanelRange {
                start: lower_len,
                count,
            });
            upper_len += count * 16;
            lower_len += count * 16;
        }

        let pivot = try_alloc_zeroed(block_count * 16)?;
        let upper = try_alloc_zeroed(upper_len)?;
        let lower = try_alloc_zeroed(lower_len)?;

        Ok(Self {
            block_count,
            top,
            pivot,
            upper,
            upper_panels,
            lower,
            lower_panels,
        })
    }

    #[inline]
    pub fn pivot_block(&self, k: usize) -> &Block {
        let start = k * 16;
        (&self.pivot[start..start + 16]).try_into().unwrap()
    }

    #[inline]
    pub fn pivot_block_mut(&mut self, k: usize) -> &mut Block {
        let start = k * 16;
        (&mut self.pivot[start..start + 16]).try_into().unwrap()
    }

    #[inline]
    pub fn upper_block(&self, k: usize, r: usize) -> &Block {
        let panel = self.upper_panels[k];
        let off = panel.start + (r - self.top[k]) * 16;
        (&self.upper[off..off + 16]).try_into().unwrap()
    }

    #[inline]
    pub fn upper_block_mut(&mut self, k: usize, r: usize) -> &mut Block {
        let off = self.upper_panels[k].start + (r - self.top[k]) * 16;
        (&mut self.upper[off..off + 16]).try_into().unwrap()
    }

    #[inline]
    pub fn lower_block(&self, k: usize, r: usize) -> &Block {
        let panel = self.lower_panels[k];
        let off = panel.start + (r - self.top[k]) * 16;
        (&self.lower[off..off + 16]).try_into().unwrap()
    }

    #[inline]
    pub fn lower_block_mut(&mut self, k: usize, r: usize) -> &mut Block {
        let off = self.lower_panels[k].start + (r - self.top[k]) * 16;
        (&mut self.lower[off..off + 16]).try_into().unwrap()
    }

    pub fn memory_bytes(&self) -> usize {
        (self.pivot.len() + self.upper.len() + self.lower.len()) * std::mem::size_of::<f64>()
    }
}

fn try_alloc_zeroed(len: usize) -> Result<Vec<f64>, SolverError> {
    let mut v: Vec<f64> = Vec::new();
    v.try_reserve_exact(len).map_err(|_| SolverError::OutOfMemory {
        requested_bytes: len * std::mem::size_of::<f64>(),
    })?;
    v.resize(len, 0.0);
    Ok(v)
}
