//! The testable properties the solver is expected to uphold.

use skyline_solver::prelude::*;
use skyline_solver::skyline::assemble::assemble;
use skyline_solver::skyline::factor::{factor, FactorOptions};
use skyline_solver::skyline::format::{read, write, PersistedFactor};
use skyline_solver::skyline::profile::SkylineProfile;
use skyline_solver::skyline::reorder::{compute_permutation, Permutation};
use skyline_solver::skyline::triangular::solve as triangular_solve;

fn tridiagonal(n: usize) -> CsrMatrix {
    let mut builder = CsrMatrixBuilder::new(n);
    for i in 0..n {
        builder.add(i, i, 2.0);
        if i + 1 < n {
            builder.add(i, i + 1, -1.0);
            builder.add(i + 1, i, -1.0);
        }
    }
    builder.build()
}

fn solve_with(a: &CsrMatrix, b: &[f64], reorder: ReorderMethod) -> Vec<f64> {
    let perm = compute_permutation(a, reorder);
    let profile = SkylineProfile::compute(a, &perm);
    let mut assembled = assemble(a, &perm, &profile).unwrap();
    let mut scale = assembled.scale.clone();
    scale.resize(profile.block_count * 4, 1.0);
    let opts = FactorOptions {
        zero_threshold: 1e-12,
        max_zero_pivots: 0,
        progress_stride: 0,
    };
    factor(&mut assembled.storage, &scale, &opts, None, None).unwrap();
    triangular_solve(&assembled.storage, &assembled.scale, &perm, b)
}

/// 1. Identity: solving `I x = b` must return `b` unchanged.
#[test]
fn property_identity_returns_rhs() {
    let n = 9;
    let mut builder = CsrMatrixBuilder::new(n);
    for i in 0..n {
        builder.add(i, i, 1.0);
    }
    let a = builder.build();
    let b: Vec<f64> = (0..n).map(|i| i as f64 * 0.5 + 1.0).collect();
    let x = solve_with(&a, &b, ReorderMethod::Rcm);
    for i in 0..n {
        assert!((x[i] - b[i]).abs() < 1e-10);
    }
}

/// 2. Permutation invariance: RCM and no-reorder must agree on the
/// solution up to numerical noise, since both factor the same matrix.
#[test]
fn property_permutation_invariance() {
    let n = 13;
    let a = tridiagonal(n);
    let b: Vec<f64> = (0..n).map(|i| (i as f64).sin()).collect();

    let x_rcm = solve_with(&a, &b, ReorderMethod::Rcm);
    let x_plain = solve_with(&a, &b, ReorderMethod::None);
    for i in 0..n {
        assert!((x_rcm[i] - x_plain[i]).abs() < 1e-8, "mismatch at {i}");
    }
}

/// 3. Scaling invariance: multiplying every row of `A` and `b` by the
/// same nonzero factor must not change the solution.
#[test]
fn property_scaling_invariance() {
    let n = 6;
    let a = tridiagonal(n);
    let b: Vec<f64> = (0..n).map(|i| 1.0 + i as f64).collect();
    let x = solve_with(&a, &b, ReorderMethod::None);

    let mut scaled_builder = CsrMatrixBuilder::new(n);
    for i in 0..n {
        for (&j, &v) in a.columns(i).iter().zip(a.values(i).iter()) {
            scaled_builder.add(i, j, v * 7.0);
        }
    }
    let scaled = scaled_builder.build();
    let scaled_b: Vec<f64> = b.iter().map(|&v| v * 7.0).collect();
    let x_scaled = solve_with(&scaled, &scaled_b, ReorderMethod::None);

    for i in 0..n {
        assert!((x[i] - x_scaled[i]).abs() < 1e-8, "mismatch at {i}");
    }
}

/// 4. Residual bound: after refinement, `||b - A x||` must be small
/// relative to `||b||` for a reasonably conditioned banded system.
#[test]
fn property_residual_bound_after_refinement() {
    let n = 60;
    let a = tridiagonal(n);
    let b: Vec<f64> = (0..n).map(|i| ((i * 7) % 11) as f64 - 5.0).collect();

    let mut facade = SolverFacade::new(&a, Box::new(IdentityConstrainer::new()), SolverConfig::default());
    facade.start().unwrap();
    facade.finish(None, None).unwrap();
    let x = facade.solve(&b).unwrap();

    let mut r_norm_sq = 0.0;
    for i in 0..n {
        let mut ax = 0.0;
        for (&j, &v) in a.columns(i).iter().zip(a.values(i).iter()) {
            ax += v * x[j];
        }
        let r = b[i] - ax;
        r_norm_sq += r * r;
    }
    let b_norm: f64 = b.iter().map(|v| v * v).sum::<f64>().sqrt();
    assert!((r_norm_sq.sqrt() / b_norm) < 1e-8);
}

/// 5. Singular detection: a zero pivot beyond the budget must be
/// reported with the first offending DOF, not silently divided by.
#[test]
fn property_singular_matrix_is_detected() {
    let mut builder = CsrMatrixBuilder::new(4);
    builder.add(0, 0, 1.0);
    builder.add(1, 1, 1.0);
    builder.add(2, 2, 1.0);
    builder.add(2, 2, -1.0);
    builder.add(3, 3, 1.0);
    let a = builder.build();

    let perm = Permutation::identity(4);
    let profile = SkylineProfile::compute(&a, &perm);
    let mut assembled = assemble(&a, &perm, &profile).unwrap();
    let mut scale = assembled.scale.clone();
    scale.resize(profile.block_count * 4, 1.0);
    let opts = FactorOptions {
        zero_threshold: 1e-12,
        max_zero_pivots: 0,
        progress_stride: 0,
    };
    let err = factor(&mut assembled.storage, &scale, &opts, None, None).unwrap_err();
    assert!(matches!(err, SolverError::SingularMatrix { first_index: 2, .. }));
}

/// 6. Null-space recovery: the façade must recover a vector aligned
/// with the DOF that produced the zero pivot.
#[test]
fn property_null_space_recovery() {
    let mut builder = CsrMatrixBuilder::new(4);
    builder.add(0, 0, 1.0);
    builder.add(1, 1, 1.0);
    builder.add(2, 2, 1.0);
    builder.add(2, 2, -1.0);
    builder.add(3, 3, 1.0);
    let a = builder.build();

    let mut cfg = SolverConfig::default();
    cfg.sparse_lu_profile_threshold = usize::MAX;
    cfg.max_zero_pivots = 1;
    let mut facade = SolverFacade::new(&a, Box::new(IdentityConstrainer::new()), cfg);
    facade.start().unwrap();
    facade.finish(None, None).unwrap();

    let null_space = facade.get_null_space().unwrap();
    assert_eq!(null_space.len(), 1);
    let v = &null_space[0];
    assert!(v[2].abs() > 0.99, "expected the null vector concentrated at DOF 2: {v:?}");
}

/// 7. Round-trip serialization: a factorisation written and reloaded
/// must solve identically to the one still resident in memory.
#[test]
fn property_round_trip_serialization() {
    let n = 7;
    let a = tridiagonal(n);
    let perm = Permutation::identity(n);
    let profile = SkylineProfile::compute(&a, &perm);
    let mut assembled = assemble(&a, &perm, &profile).unwrap();
    let mut scale = assembled.scale.clone();
    scale.resize(profile.block_count * 4, 1.0);
    let opts = FactorOptions {
        zero_threshold: 1e-12,
        max_zero_pivots: 0,
        progress_stride: 0,
    };
    let outcome = factor(&mut assembled.storage, &scale, &opts, None, None).unwrap();

    let b: Vec<f64> = (0..n).map(|i| i as f64 + 0.3).collect();
    let x_before = triangular_solve(&assembled.storage, &assembled.scale, &perm, &b);

    let persisted = PersistedFactor {
        perm: perm.clone(),
        scale: scale.clone(),
        diag: outcome.diag,
        storage: assembled.storage,
    };
    let mut bytes = Vec::new();
    write(&mut bytes, &persisted).unwrap();
    let mut cursor: &[u8] = &bytes;
    let reloaded = read(&mut cursor).unwrap();

    let x_after = triangular_solve(&reloaded.storage, &reloaded.scale, &reloaded.perm, &b);
    for i in 0..n {
        assert!((x_before[i] - x_after[i]).abs() < 1e-10);
    }
}

/// 8. Cancellation: a progress callback returning `Cancel` must stop the
/// factorisation and surface `SolverError::Cancelled`.
#[test]
fn property_cancellation_stops_factorisation() {
    let n = 40;
    let a = tridiagonal(n);
    let perm = Permutation::identity(n);
    let profile = SkylineProfile::compute(&a, &perm);
    let mut assembled = assemble(&a, &perm, &profile).unwrap();
    let mut scale = assembled.scale.clone();
    scale.resize(profile.block_count * 4, 1.0);
    let opts = FactorOptions {
        zero_threshold: 1e-12,
        max_zero_pivots: 0,
        progress_stride: 1,
    };
    let mut cb = |_done: usize, _total: usize| skyline_solver::skyline::factor::ProgressSignal::Cancel;
    let err = factor(&mut assembled.storage, &scale, &opts, Some(&mut cb), None).unwrap_err();
    assert!(matches!(err, SolverError::Cancelled(0)));
}
