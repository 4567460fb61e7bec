//! The blocked skyline direct solver (spec section 4), assembled from
//! reordering, profile computation, assembly, blocked Crout
//! factorisation, triangular solves, null-space recovery, and the
//! persisted binary format.
//!
//! `SkylineFactoriser` is the stateful engine; `crate::solver` wraps it
//! (and a general sparse fallback) behind the public façade.

pub mod assemble;
pub mod blocks;
pub mod factor;
pub mod format;
pub mod nullspace;
pub mod profile;
pub mod reorder;
pub mod triangular;

use log::{debug, info};

use crate::error::{SolverError, SolverResult};
use crate::matrix::SparseMatrixView;
use crate::skyline::assemble::assemble;
use crate::skyline::blocks::SkylineStorage;
use crate::skyline::factor::{factor, FactorOptions, FactorOutcome, PivotCallback, ProgressCallback};
use crate::skyline::nullspace::recover_null_space;
use crate::skyline::profile::SkylineProfile;
use crate::skyline::reorder::{compute_permutation, Permutation, ReorderMethod};
use crate::skyline::triangular::solve as triangular_solve;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Started,
    Factored,
}

#[derive(Debug, Clone, Copy)]
pub struct FactorInfo {
    pub zero_pivots: usize,
    pub first_zero_pivot: Option<(usize, f64)>,
    pub total_profile: usize,
    pub memory_bytes: usize,
}

/// Outcome of a refined `solve` (spec section 6's `getInfo` fields
/// `iterCount`/`residual`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefinementReport {
    pub iterations: usize,
    pub residual: f64,
}

fn vec_inf_norm(v: &[f64]) -> f64 {
    v.iter().fold(0.0_f64, |acc, &x| acc.max(x.abs()))
}

fn matrix_inf_norm(view: &dyn SparseMatrixView) -> f64 {
    let (n, _) = view.shape();
    (0..n)
        .map(|i| view.values(i).iter().map(|v| v.abs()).sum::<f64>())
        .fold(0.0_f64, f64::max)
}

/// Stateful skyline engine, lifecycle `Idle -> Started -> Factored`, and
/// back to `Idle` on `reset`. Goes stale (spec section 4.2) whenever the
/// bound matrix's structure version changes out from under it; callers
/// detect this with `is_stale` before reusing a factorisation.
pub struct SkylineFactoriser {
    reorder_method: ReorderMethod,
    options: FactorOptions,
    state: State,
    bound_structure_version: u64,

    perm: Option<Permutation>,
    profile: Option<SkylineProfile>,
    storage: Option<SkylineStorage>,
    scale: Option<Vec<f64>>,
    outcome: Option<FactorOutcome>,
}

impl SkylineFactoriser {
    pub fn new(reorder_method: ReorderMethod, options: FactorOptions) -> Self {
        Self {
            reorder_method,
            options,
            state: State::Idle,
            bound_structure_version: 0,
            perm: None,
            profile: None,
            storage: None,
            scale: None,
            outcome: None,
        }
    }

    pub fn set_zero_threshold(&mut self, threshold: f64) {
        self.options.zero_threshold = threshold;
    }

    pub fn zero_threshold(&self) -> f64 {
        self.options.zero_threshold
    }

    pub fn set_max_zero_pivots(&mut self, max: usize) {
        self.options.max_zero_pivots = max;
    }

    /// Reorders, computes the profile, and assembles the scaled skyline
    /// arenas for `view`. Leaves the factoriser in `Started`; call
    /// `finish` to run the numeric factorisation.
    pub fn start(&mut self, view: &dyn SparseMatrixView) -> SolverResult<()> {
        let (n, m) = view.shape();
        if n != m {
            return Err(SolverError::BadMatrixShape(format!("matrix must be square, got {n}x{m}")));
        }

        let perm = compute_permutation(view, self.reorder_method);
        let profile = SkylineProfile::compute(view, &perm);
        let assembled = assemble(view, &perm, &profile)?;
        let mut scale = assembled.scale;
        scale.resize(profile.block_count * 4, 1.0);

        debug!(
            "skyline start: n={n}, block_count={}, total_profile={}",
            profile.block_count,
            profile.total_profile()
        );

        self.bound_structure_version = view.structure_version();
        self.perm = Some(perm);
        self.profile = Some(profile);
        self.storage = Some(assembled.storage);
        self.scale = Some(scale);
        self.outcome = None;
        self.state = State::Started;
        Ok(())
    }

    /// Runs the blocked Crout sweep. Requires `start` to have been called.
    pub fn finish(
        &mut self,
        progress_cb: Option<&mut ProgressCallback>,
        pivot_cb: Option<&mut PivotCallback>,
    ) -> SolverResult<()> {
        if self.state != State::Started {
            return Err(SolverError::InvalidInput("finish() called before start()".into()));
        }
        let storage = self.storage.as_mut().expect("Started implies storage is set");
        let scale = self.scale.as_ref().expect("Started implies scale is set");

        let outcome = factor(storage, scale, &self.options, progress_cb, pivot_cb)?;
        info!(
            "skyline finish: zero_pivots={}, first_zero_pivot={:?}",
            outcome.zero_pivots, outcome.first_zero_pivot
        );
        self.outcome = Some(outcome);
        self.state = State::Factored;
        Ok(())
    }

    pub fn reset(&mut self) {
        self.state = State::Idle;
        self.perm = None;
        self.profile = None;
        self.storage = None;
        self.scale = None;
        self.outcome = None;
    }

    pub fn is_factored(&self) -> bool {
        self.state == State::Factored
    }

    /// True if `view`'s structure has changed since `start` was last
    /// called (spec section 4.2, "Stale" transition).
    pub fn is_stale(&self, view: &dyn SparseMatrixView) -> bool {
        self.state == State::Idle || view.structure_version() != self.bound_structure_version
    }

    /// Solves `A x = b` against the current factorisation, refining while
    /// `‖A·x−b‖∞ > precision·(‖A‖∞·‖x‖∞ + ‖b‖∞)` (spec section 4.3.1), up
    /// to `max_refine_iters` steps. Returns the solution plus a report of
    /// how many steps were taken and the final relative residual
    /// `‖A·x−b‖∞ / ‖b‖∞` (spec section 6's `getInfo` fields).
    pub fn solve(
        &self,
        view: &dyn SparseMatrixView,
        b: &[f64],
        precision: f64,
        max_refine_iters: usize,
    ) -> SolverResult<(Vec<f64>, RefinementReport)> {
        if self.state != State::Factored {
            return Err(SolverError::InvalidInput("solve() called before finish()".into()));
        }
        let storage = self.storage.as_ref().unwrap();
        let scale = self.scale.as_ref().unwrap();
        let perm = self.perm.as_ref().unwrap();

        let mut x = triangular_solve(storage, scale, perm, b);
        let norm_a = matrix_inf_norm(view);
        let norm_b = vec_inf_norm(b);

        let mut iterations = 0;
        let mut r = residual(view, b, &x);
        let mut r_norm = vec_inf_norm(&r);
        while r_norm > precision * (norm_a * vec_inf_norm(&x) + norm_b) && iterations < max_refine_iters {
            let dx = triangular_solve(storage, scale, perm, &r);
            for (xi, dxi) in x.iter_mut().zip(dx.iter()) {
                *xi += dxi;
            }
            iterations += 1;
            r = residual(view, b, &x);
            r_norm = vec_inf_norm(&r);
            if r_norm == 0.0 || !r_norm.is_finite() {
                break;
            }
        }

        let residual = if norm_b > 0.0 { r_norm / norm_b } else { r_norm };
        Ok((x, RefinementReport { iterations, residual }))
    }

    pub fn null_space(&self) -> SolverResult<Vec<Vec<f64>>> {
        if self.state != State::Factored {
            return Err(SolverError::InvalidInput("getNullSpace() called before finish()".into()));
        }
        let storage = self.storage.as_ref().unwrap();
        let scale = self.scale.as_ref().unwrap();
        let perm = self.perm.as_ref().unwrap();
        Ok(recover_null_space(storage, scale, perm, &self.zero_pivot_dofs()))
    }

    fn zero_pivot_dofs(&self) -> Vec<usize> {
        let (Some(outcome), Some(scale)) = (self.outcome.as_ref(), self.scale.as_ref()) else {
            return Vec::new();
        };
        let threshold = self.options.zero_threshold;
        outcome
            .diag
            .iter()
            .zip(scale.iter())
            .enumerate()
            .filter(|(_, (&d, &s))| d.abs() <= threshold * s)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn info(&self) -> Option<FactorInfo> {
        let outcome = self.outcome.as_ref()?;
        let profile = self.profile.as_ref()?;
        let storage = self.storage.as_ref()?;
        Some(FactorInfo {
            zero_pivots: outcome.zero_pivots,
            first_zero_pivot: outcome.first_zero_pivot,
            total_profile: profile.total_profile(),
            memory_bytes: storage.memory_bytes(),
        })
    }
}

fn residual(view: &dyn SparseMatrixView, b: &[f64], x: &[f64]) -> Vec<f64> {
    let (n, _) = view.shape();
    let mut r = b.to_vec();
    for i in 0..n {
        let mut ax = 0.0;
        for (&j, &v) in view.columns(i).iter().zip(view.values(i).iter()) {
            ax += v * x[j];
        }
        r[i] -= ax;
    }
    r
}
