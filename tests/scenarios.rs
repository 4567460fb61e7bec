//! End-to-end scenarios through the public façade.

use skyline_solver::prelude::*;

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

/// S1: a small tridiagonal system with a symmetric load, solved end to
/// end through the façade (start/finish/solve).
#[test]
fn scenario_s1_tridiagonal_through_facade() {
    let n = 5;
    let a = tridiagonal(n);
    let mut facade = SolverFacade::new(&a, Box::new(IdentityConstrainer::new()), SolverConfig::default());
    facade.start().unwrap();
    facade.finish(None, None).unwrap();

    let b = vec![1.0, 0.0, 0.0, 0.0, 1.0];
    let x = facade.solve(&b).unwrap();
    for &xi in &x {
        assert!((xi - 1.0).abs() < 1e-8);
    }
}

/// S2: a small hand-checkable SPD system.
#[test]
fn scenario_s2_small_spd_through_facade() {
    let mut builder = CsrMatrixBuilder::new(3);
    builder.add(0, 0, 4.0);
    builder.add(0, 1, 1.0);
    builder.add(1, 0, 1.0);
    builder.add(1, 1, 3.0);
    builder.add(1, 2, 1.0);
    builder.add(2, 1, 1.0);
    builder.add(2, 2, 2.0);
    let a = builder.build();

    let mut cfg = SolverConfig::default();
    cfg.sparse_lu_profile_threshold = usize::MAX; // force the skyline path even at n=3
    let mut facade = SolverFacade::new(&a, Box::new(IdentityConstrainer::new()), cfg);
    facade.start().unwrap();
    facade.finish(None, None).unwrap();

    let x = facade.solve(&[5.0, 5.0, 3.0]).unwrap();
    for &xi in &x {
        assert!((xi - 1.0).abs() < 1e-8);
    }
}

/// S3: one slave DOF eliminated against a master plus an offset, solved
/// through the façade so the reduction and expansion both get exercised.
#[test]
fn scenario_s3_master_slave_constraint_through_facade() {
    let n = 4;
    let a = tridiagonal(n);
    let constraints = vec![Constraint {
        slave: 3,
        masters: vec![(0, 1.0)],
        offset: 0.25,
    }];
    let handler = GeneralConstrainer::new(n, constraints).unwrap();

    let mut facade = SolverFacade::new(&a, Box::new(handler), SolverConfig::default());
    facade.start().unwrap();
    facade.finish(None, None).unwrap();

    let b = vec![1.0, 0.0, 0.0, 0.0];
    let x = facade.solve(&b).unwrap();
    assert_eq!(x.len(), 4);
    // The slave DOF must honor its constraint exactly, independent of
    // whatever value the reduced system produced for DOF 0.
    assert!((x[3] - (x[0] + 0.25)).abs() < 1e-9);
}

/// S4: `n=6`, `A = diag(1,1,1,0,1,1)`, `maxZeroPivots=1`, `b=(1,2,3,0,5,6)`.
/// The budget absorbs the one zero pivot (DOF 3) instead of failing;
/// `x[i]=b[i]` for every other DOF, and the null space is exactly `e_3`.
#[test]
fn scenario_s4_singular_matrix_is_reported() {
    let n = 6;
    let mut builder = CsrMatrixBuilder::new(n);
    builder.add(0, 0, 1.0);
    builder.add(1, 1, 1.0);
    builder.add(2, 2, 1.0);
    builder.add(3, 3, 1.0);
    builder.add(3, 3, -1.0); // cancels to an explicit structural zero
    builder.add(4, 4, 1.0);
    builder.add(5, 5, 1.0);
    let a = builder.build();

    let mut cfg = SolverConfig::default();
    cfg.sparse_lu_profile_threshold = usize::MAX;
    cfg.max_zero_pivots = 1;
    let mut facade = SolverFacade::new(&a, Box::new(IdentityConstrainer::new()), cfg);
    facade.start().unwrap();
    facade.finish(None, None).unwrap();

    let b = vec![1.0, 2.0, 3.0, 0.0, 5.0, 6.0];
    let x = facade.solve(&b).unwrap();
    for i in 0..n {
        if i != 3 {
            assert!((x[i] - b[i]).abs() < 1e-9, "x[{i}] = {} vs b[{i}] = {}", x[i], b[i]);
        } else {
            assert!(x[3].is_finite());
        }
    }

    let null_space = facade.get_null_space().unwrap();
    assert_eq!(null_space.len(), 1);
    let e3 = &null_space[0];
    assert_eq!(e3.len(), n);
    for i in 0..n {
        let expected = if i == 3 { 1.0 } else { 0.0 };
        assert!((e3[i].abs() - expected).abs() < 1e-8, "e3[{i}] = {}", e3[i]);
    }
}
