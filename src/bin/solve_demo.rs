//! Demo: assemble a small banded system, factor it, and solve.

use anyhow::Result;
use skyline_solver::prelude::*;

fn main() -> Result<()> {
    env_logger::init();

    let n = 50;
    let mut builder = CsrMatrixBuilder::new(n);
    for i in 0..n {
        builder.add(i, i, 2.0);
        if i + 1 < n {
            builder.add(i, i + 1, -1.0);
            builder.add(i + 1, i, -1.0);
        }
    }
    let a = builder.build();

    let mut facade = SolverFacade::new(&a, Box::new(IdentityConstrainer::new()), SolverConfig::default());
    facade.start()?;
    facade.finish(None, None)?;

    let mut b = vec![0.0; n];
    b[0] = 1.0;
    b[n - 1] = 1.0;
    let x = facade.solve(&b)?;

    let info = facade.get_info();
    println!("solved {n} DOFs (dense fallback: {})", info.used_dense_fallback);
    if let Some(skyline) = info.skyline {
        println!("zero pivots: {}, total profile: {}", skyline.zero_pivots, skyline.total_profile);
    }
    println!("x[0..5] = {:?}", &x[..5.min(x.len())]);

    Ok(())
}
