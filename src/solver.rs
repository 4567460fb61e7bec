//! The public solver façade (C4): wires a matrix view, a constraint
//! handler, and configuration together, and dispatches each solve to
//! either the blocked skyline engine or a dense LU fallback.
//!
//! Grounded in `fea-solver::math::solve_linear_system`'s
//! `a.clone().lu().solve(b)` for the dense path, and in the
//! `FEModel`/`AnalysisOptions` pairing (a data owner plus a separate
//! options struct) for the overall shape.

use log::warn;
use nalgebra::DMatrix;

use crate::config::SolverConfig;
use crate::constraints::ConstraintHandler;
use crate::error::{SolverError, SolverResult};
use crate::matrix::SparseMatrixView;
use crate::skyline::factor::{FactorOptions, PivotCallback, ProgressCallback};
use crate::skyline::profile::SkylineProfile;
use crate::skyline::reorder::{compute_permutation, ReorderMethod};
use crate::skyline::{FactorInfo, SkylineFactoriser};

/// Snapshot returned by `getInfo` (spec section 6's info dictionary).
#[derive(Debug, Clone, Copy)]
pub struct SolverInfo {
    pub reduced_size: usize,
    pub used_dense_fallback: bool,
    pub skyline: Option<FactorInfo>,
    pub memory_bytes: usize,
    pub zero_pivot_count: usize,
    pub residual: f64,
    pub iter_count: usize,
    pub solver_failed: bool,
}

enum Engine {
    Skyline(SkylineFactoriser),
    Dense(DMatrix<f64>),
}

/// Owns nothing about the model itself; borrows the assembled matrix and
/// owns the constraint handler and solver state across `start`/`finish`/
/// `solve` calls.
pub struct SolverFacade<'a> {
    matrix: &'a dyn SparseMatrixView,
    constraints: Box<dyn ConstraintHandler>,
    config: SolverConfig,
    engine: Option<Engine>,
    bound_values_version: u64,
    last_residual: f64,
    last_iter_count: usize,
    solver_failed: bool,
}

impl<'a> SolverFacade<'a> {
    pub fn new(matrix: &'a dyn SparseMatrixView, constraints: Box<dyn ConstraintHandler>, config: SolverConfig) -> Self {
        Self {
            matrix,
            constraints,
            config,
            engine: None,
            bound_values_version: 0,
            last_residual: 0.0,
            last_iter_count: 0,
            solver_failed: false,
        }
    }

    pub fn configure(&mut self, config: SolverConfig) {
        self.config = config;
    }

    pub fn get_config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn get_matrix(&self) -> &dyn SparseMatrixView {
        self.matrix
    }

    pub fn get_constraints(&self) -> &dyn ConstraintHandler {
        self.constraints.as_ref()
    }

    /// Reduces the matrix through the constraint handler, estimates the
    /// skyline profile the reduced system would need, and prepares
    /// whichever engine that estimate calls for (spec section 4.4: "picks
    /// between the skyline engine and a general sparse-LU fallback
    /// according to estimated profile").
    pub fn start(&mut self) -> SolverResult<()> {
        self.constraints.update(self.matrix)?;
        let reduced = self.constraints.reduced_matrix();

        let perm = compute_permutation(reduced, self.config.reorder.into());
        let estimated_profile = SkylineProfile::compute(reduced, &perm).total_profile();

        if estimated_profile >= self.config.sparse_lu_profile_threshold {
            self.engine = Some(Engine::Dense(materialize_dense(reduced)));
        } else {
            let options = FactorOptions {
                zero_threshold: self.config.zero_threshold,
                max_zero_pivots: if self.config.lenient { usize::MAX } else { self.config.max_zero_pivots },
                progress_stride: self.config.progress_stride,
            };
            let mut skyline = SkylineFactoriser::new(self.config.reorder.into(), options);
            skyline.start(reduced)?;
            self.engine = Some(Engine::Skyline(skyline));
        }
        self.bound_values_version = self.matrix.values_version();
        self.solver_failed = false;
        Ok(())
    }

    /// Runs the numeric factorisation. For the dense fallback this is a
    /// no-op beyond validating the matrix isn't singular to machine
    /// precision, since `DMatrix::lu()` factors lazily inside `solve`.
    ///
    /// In `lenient` mode `start` already lifted the zero-pivot budget so
    /// factorisation can't raise `SingularMatrix`; here we instead check
    /// the actual zero-pivot count against the *configured* budget and, if
    /// it was exceeded, downgrade the failure to `getInfo().solver_failed`
    /// (spec section 7).
    pub fn finish(
        &mut self,
        progress_cb: Option<&mut ProgressCallback>,
        pivot_cb: Option<&mut PivotCallback>,
    ) -> SolverResult<()> {
        match self.engine.as_mut() {
            Some(Engine::Skyline(s)) => {
                s.finish(progress_cb, pivot_cb)?;
                if self.config.lenient {
                    let zero_pivots = s.info().map(|i| i.zero_pivots).unwrap_or(0);
                    if zero_pivots > self.config.max_zero_pivots {
                        warn!("lenient mode: {zero_pivots} zero pivots exceed configured budget {}, downgrading to solverFailed", self.config.max_zero_pivots);
                        self.solver_failed = true;
                    }
                }
                Ok(())
            }
            Some(Engine::Dense(_)) => Ok(()),
            None => Err(SolverError::InvalidInput("finish() called before start()".into())),
        }
    }

    /// True if the bound matrix has changed structurally or the solver
    /// was never started.
    pub fn is_stale(&self) -> bool {
        match self.engine.as_ref() {
            Some(Engine::Skyline(s)) => s.is_stale(self.matrix),
            Some(Engine::Dense(_)) => self.matrix.structure_version() != self.bound_values_version,
            None => true,
        }
    }

    /// Solves `A x = b` in the full (unconstrained) DOF space, driving
    /// iterative refinement to `config.precision` (spec section 4.3.1/4.4).
    /// Records the relative residual and step count for the next `getInfo`.
    pub fn solve(&mut self, b_full: &[f64]) -> SolverResult<Vec<f64>> {
        let b_red = self.constraints.reduce_rhs(self.matrix, b_full);
        let y_red = match self.engine.as_mut() {
            Some(Engine::Skyline(s)) => {
                let (y, report) = s.solve(
                    self.constraints.reduced_matrix(),
                    &b_red,
                    self.config.precision,
                    self.config.refine_iterations,
                )?;
                self.last_residual = report.residual;
                self.last_iter_count = report.iterations;
                y
            }
            Some(Engine::Dense(m)) => {
                let rhs = nalgebra::DVector::from_vec(b_red.clone());
                let y = m
                    .clone()
                    .lu()
                    .solve(&rhs)
                    .ok_or_else(|| SolverError::SingularMatrix {
                        zero_pivots: 1,
                        first_index: 0,
                        first_magnitude: 0.0,
                    })?
                    .as_slice()
                    .to_vec();
                self.last_residual = relative_residual(self.constraints.reduced_matrix(), &b_red, &y);
                self.last_iter_count = 0;
                y
            }
            None => return Err(SolverError::InvalidInput("solve() called before start()".into())),
        };
        Ok(self.constraints.expand_lhs(&y_red))
    }

    /// Performs exactly one refinement step on `x` (full DOF space) against
    /// `b_full`, in place: solves the reduced correction `A·dx = r` for the
    /// current residual `r = b - A·x` and adds it to `x` (spec section
    /// 4.4's `improve(x,b)`, distinct from `solve`'s precision-driven loop).
    pub fn improve(&mut self, x: &mut [f64], b_full: &[f64]) -> SolverResult<()> {
        let (n, _) = self.matrix.shape();
        let mut r_full = b_full.to_vec();
        for i in 0..n {
            let mut ax = 0.0;
            for (&j, &v) in self.matrix.columns(i).iter().zip(self.matrix.values(i).iter()) {
                ax += v * x[j];
            }
            r_full[i] -= ax;
        }
        let r_red = self.constraints.reduce_rhs(self.matrix, &r_full);

        let dx_red = match self.engine.as_mut() {
            Some(Engine::Skyline(s)) => {
                let (dx, _report) = s.solve(self.constraints.reduced_matrix(), &r_red, 0.0, 0)?;
                dx
            }
            Some(Engine::Dense(m)) => {
                let rhs = nalgebra::DVector::from_vec(r_red);
                m.clone()
                    .lu()
                    .solve(&rhs)
                    .ok_or_else(|| SolverError::SingularMatrix {
                        zero_pivots: 1,
                        first_index: 0,
                        first_magnitude: 0.0,
                    })?
                    .as_slice()
                    .to_vec()
            }
            None => return Err(SolverError::InvalidInput("improve() called before start()".into())),
        };

        let dx_full = self.constraints.expand_lhs(&dx_red);
        for (xi, dxi) in x.iter_mut().zip(dx_full.iter()) {
            *xi += dxi;
        }
        Ok(())
    }

    /// Solves with an explicit reorder override, bypassing `config.reorder`
    /// (spec section 6, per-call override).
    pub fn solve_with_reorder(&mut self, b_full: &[f64], reorder: ReorderMethod) -> SolverResult<Vec<f64>> {
        self.config.reorder = match reorder {
            ReorderMethod::Rcm => crate::config::ReorderKind::Rcm,
            ReorderMethod::None => crate::config::ReorderKind::None,
        };
        self.start()?;
        self.finish(None, None)?;
        self.solve(b_full)
    }

    pub fn get_info(&self) -> SolverInfo {
        let reduced_size = self.constraints.reduced_size();
        match self.engine.as_ref() {
            Some(Engine::Skyline(s)) => {
                let info = s.info();
                SolverInfo {
                    reduced_size,
                    used_dense_fallback: false,
                    skyline: info,
                    memory_bytes: info.map(|i| i.memory_bytes).unwrap_or(0),
                    zero_pivot_count: info.map(|i| i.zero_pivots).unwrap_or(0),
                    residual: self.last_residual,
                    iter_count: self.last_iter_count,
                    solver_failed: self.solver_failed,
                }
            }
            Some(Engine::Dense(m)) => SolverInfo {
                reduced_size,
                used_dense_fallback: true,
                skyline: None,
                memory_bytes: m.nrows() * m.ncols() * std::mem::size_of::<f64>(),
                zero_pivot_count: 0,
                residual: self.last_residual,
                iter_count: self.last_iter_count,
                solver_failed: self.solver_failed,
            },
            None => SolverInfo {
                reduced_size,
                used_dense_fallback: false,
                skyline: None,
                memory_bytes: 0,
                zero_pivot_count: 0,
                residual: 0.0,
                iter_count: 0,
                solver_failed: false,
            },
        }
    }

    pub fn get_null_space(&self) -> SolverResult<Vec<Vec<f64>>> {
        match self.engine.as_ref() {
            Some(Engine::Skyline(s)) => {
                let reduced = s.null_space()?;
                Ok(reduced.into_iter().map(|v| self.constraints.expand_lhs(&v)).collect())
            }
            Some(Engine::Dense(_)) => Ok(Vec::new()),
            None => Err(SolverError::InvalidInput("getNullSpace() called before start()".into())),
        }
    }
}

/// `‖A·x−b‖∞ / ‖b‖∞`, used for the dense fallback path's `getInfo().residual`
/// (the skyline path gets this from `RefinementReport` instead).
fn relative_residual(view: &dyn SparseMatrixView, b: &[f64], x: &[f64]) -> f64 {
    let (n, _) = view.shape();
    let mut max_abs_r = 0.0_f64;
    let mut max_abs_b = 0.0_f64;
    for i in 0..n {
        let mut ax = 0.0;
        for (&j, &v) in view.columns(i).iter().zip(view.values(i).iter()) {
            ax += v * x[j];
        }
        max_abs_r = max_abs_r.max((b[i] - ax).abs());
        max_abs_b = max_abs_b.max(b[i].abs());
    }
    if max_abs_b > 0.0 {
        max_abs_r / max_abs_b
    } else {
        max_abs_r
    }
}

fn materialize_dense(view: &dyn SparseMatrixView) -> DMatrix<f64> {
    let (n, _) = view.shape();
    let mut m = DMatrix::<f64>::zeros(n, n);
    for i in 0..n {
        for (&j, &v) in view.columns(i).iter().zip(view.values(i).iter()) {
            m[(i, j)] = v;
        }
    }
    m
}
