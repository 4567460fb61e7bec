//! A blocked skyline LU direct solver for large sparse finite-element
//! linear systems.
//!
//! Assembles a stiffness-matrix-shaped sparse system behind
//! [`matrix::SparseMatrixView`], reduces out linear constraints through a
//! [`constraints::ConstraintHandler`], reorders and factors it with a
//! 4x4-blocked Crout sweep over skyline (profile) storage, and exposes
//! both through [`solver::SolverFacade`], which estimates the reduced
//! system's skyline profile before committing to an engine and falls
//! back to a dense direct solve once that estimate is too large for
//! blocked skyline storage to pay off.
//!
//! ## Example
//! ```rust
//! use skyline_solver::prelude::*;
//!
//! let mut builder = CsrMatrixBuilder::new(4);
//! builder.add(0, 0, 2.0);
//! builder.add(0, 1, -1.0);
//! builder.add(1, 0, -1.0);
//! builder.add(1, 1, 2.0);
//! builder.add(1, 2, -1.0);
//! builder.add(2, 1, -1.0);
//! builder.add(2, 2, 2.0);
//! builder.add(2, 3, -1.0);
//! builder.add(3, 2, -1.0);
//! builder.add(3, 3, 2.0);
//! let a = builder.build();
//!
//! let mut facade = SolverFacade::new(&a, Box::new(IdentityConstrainer::new()), SolverConfig::default());
//! facade.start().unwrap();
//! facade.finish(None, None).unwrap();
//! let x = facade.solve(&[1.0, 0.0, 0.0, 1.0]).unwrap();
//! assert!((x[0] - 1.0).abs() < 1e-6);
//! ```

pub mod config;
pub mod constraints;
pub mod error;
pub mod matrix;
pub mod skyline;
pub mod solver;

pub mod prelude {
    pub use crate::config::{ReorderKind, SolverConfig};
    pub use crate::constraints::{Constraint, ConstraintHandler, GeneralConstrainer, IdentityConstrainer};
    pub use crate::error::{SolverError, SolverResult};
    pub use crate::matrix::{CsrMatrix, CsrMatrixBuilder, SparseMatrixView};
    pub use crate::skyline::factor::ProgressSignal;
    pub use crate::skyline::reorder::ReorderMethod;
    pub use crate::solver::{SolverFacade, SolverInfo};
}
