//! Constraint handler (C2): maps between the full DOF space and the
//! solver's reduced space.
//!
//! Grounded in `fea-solver::model::solve_linear`'s free/restrained DOF
//! split (`free_dofs`, `restrained_dofs`, `enforced_displacements`),
//! generalized from "restrained = fixed to an enforced value" to the
//! fully general textbook master-slave elimination spec.md calls for:
//! `slave = Σ masters·coeff + offset`.

use std::collections::{HashMap, HashSet};

use crate::error::{SolverError, SolverResult};
use crate::matrix::{to_owned_csr, CsrMatrix, CsrMatrixBuilder, SparseMatrixView};

/// Abstracts the mapping between the user's full DOF space (dimension `n`)
/// and the solver's reduced space (dimension `m <= n`).
pub trait ConstraintHandler {
    /// Reads the full matrix and the constraint set, builds the reduced
    /// matrix. Must be called before `reduce_rhs`/`expand_lhs`/`reduced_matrix`.
    fn update(&mut self, full: &dyn SparseMatrixView) -> SolverResult<()>;

    /// A view into the reduced matrix consumable by the skyline factoriser.
    fn reduced_matrix(&self) -> &dyn SparseMatrixView;

    /// Dimension `m` of the reduced space.
    fn reduced_size(&self) -> usize;

    /// `b_red = T^T * (b_full - A_full * c)`.
    fn reduce_rhs(&self, full: &dyn SparseMatrixView, b_full: &[f64]) -> Vec<f64>;

    /// `y_full = T * y_red + c`.
    fn expand_lhs(&self, y_red: &[f64]) -> Vec<f64>;
}

/// No constraints: `m == n`, the reduced matrix aliases the full one.
#[derive(Default)]
pub struct IdentityConstrainer {
    reduced: Option<CsrMatrix>,
}

impl IdentityConstrainer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConstraintHandler for IdentityConstrainer {
    fn update(&mut self, full: &dyn SparseMatrixView) -> SolverResult<()> {
        self.reduced = Some(to_owned_csr(full));
        Ok(())
    }

    fn reduced_matrix(&self) -> &dyn SparseMatrixView {
        self.reduced
            .as_ref()
            .expect("update() must be called before reduced_matrix()")
    }

    fn reduced_size(&self) -> usize {
        self.reduced.as_ref().map(|m| m.shape().0).unwrap_or(0)
    }

    fn reduce_rhs(&self, _full: &dyn SparseMatrixView, b_full: &[f64]) -> Vec<f64> {
        b_full.to_vec()
    }

    fn expand_lhs(&self, y_red: &[f64]) -> Vec<f64> {
        y_red.to_vec()
    }
}

/// A single linear constraint: `slave = Σ (master, coeff) + offset`.
#[derive(Debug, Clone)]
pub struct Constraint {
    pub slave: usize,
    pub masters: Vec<(usize, f64)>,
    pub offset: f64,
}

/// Master-slave elimination of linearly-constrained unknowns.
///
/// Records the reduction as a sparse transfer operator `T` of shape
/// `(n, m)` (here: one small coefficient list per full DOF) plus an offset
/// vector `c`, so that `y_full = T * y_red + c` recovers the full solution.
pub struct GeneralConstrainer {
    n: usize,
    transfer: Vec<Vec<(usize, f64)>>,
    offset: Vec<f64>,
    m: usize,
    reduced: Option<CsrMatrix>,
}

impl GeneralConstrainer {
    /// Build the transfer operator from a constraint set. Fails with
    /// `InconsistentConstraints` if the master graph is cyclic or a slave
    /// references a DOF outside `[0, n)`.
    pub fn new(n: usize, constraints: Vec<Constraint>) -> SolverResult<Self> {
        let mut by_slave: HashMap<usize, Constraint> = HashMap::new();
        for c in constraints {
            if c.slave >= n {
                return Err(SolverError::InconsistentConstraints(format!(
                    "slave DOF {} does not exist (n = {n})",
                    c.slave
                )));
            }
            for &(m, _) in &c.masters {
                if m >= n {
                    return Err(SolverError::InconsistentConstraints(format!(
                        "master DOF {m} referenced by slave {} does not exist (n = {n})",
                        c.slave
                    )));
                }
            }
            if by_slave.insert(c.slave, c).is_some() {
                return Err(SolverError::InconsistentConstraints(
                    "duplicate constraint for the same slave DOF".to_string(),
                ));
            }
        }

        // Free / master DOFs are every DOF that is not itself a slave.
        let mut reduced_index: HashMap<usize, usize> = HashMap::new();
        let mut m = 0usize;
        for dof in 0..n {
            if !by_slave.contains_key(&dof) {
                reduced_index.insert(dof, m);
                m += 1;
            }
        }

        let mut memo: HashMap<usize, (Vec<(usize, f64)>, f64)> = HashMap::new();
        let mut transfer = vec![Vec::new(); n];
        let mut offset = vec![0.0; n];

        for dof in 0..n {
            let mut visiting = HashSet::new();
            let (terms, off) =
                resolve(dof, &by_slave, &reduced_index, &mut memo, &mut visiting)?;
            transfer[dof] = terms;
            offset[dof] = off;
        }

        Ok(Self {
            n,
            transfer,
            offset,
            m,
            reduced: None,
        })
    }
}

/// Recursively substitutes slave DOFs by their masters until every term
/// refers to a free DOF, detecting cycles with a per-call visiting set.
fn resolve(
    dof: usize,
    by_slave: &HashMap<usize, Constraint>,
    reduced_index: &HashMap<usize, usize>,
    memo: &mut HashMap<usize, (Vec<(usize, f64)>, f64)>,
    visiting: &mut HashSet<usize>,
) -> SolverResult<(Vec<(usize, f64)>, f64)> {
    if let Some(&idx) = reduced_index.get(&dof) {
        return Ok((vec![(idx, 1.0)], 0.0));
    }
    if let Some(cached) = memo.get(&dof) {
        return Ok(cached.clone());
    }
    if !visiting.insert(dof) {
        return Err(SolverError::InconsistentConstraints(format!(
            "cyclic master/slave dependency through DOF {dof}"
        )));
    }

    let constraint = by_slave
        .get(&dof)
        .expect("dof is neither free nor a known slave");

    let mut terms: HashMap<usize, f64> = HashMap::new();
    let mut off = constraint.offset;
    for &(master, coeff) in &constraint.masters {
        let (sub_terms, sub_off) = resolve(master, by_slave, reduced_index, memo, visiting)?;
        off += coeff * sub_off;
        for (idx, c) in sub_terms {
            *terms.entry(idx).or_insert(0.0) += coeff * c;
        }
    }

    visiting.remove(&dof);
    let mut terms: Vec<(usize, f64)> = terms.into_iter().collect();
    terms.sort_by_key(|&(idx, _)| idx);
    memo.insert(dof, (terms.clone(), off));
    Ok((terms, off))
}

impl ConstraintHandler for GeneralConstrainer {
    fn update(&mut self, full: &dyn SparseMatrixView) -> SolverResult<()> {
        let (n, _) = full.shape();
        if n != self.n {
            return Err(SolverError::BadMatrixShape(format!(
                "constrainer was built for n = {}, matrix has n = {n}",
                self.n
            )));
        }

        // A_red[p,q] = sum over (i,j) with A[i,j] != 0 of T[i,p]*A[i,j]*T[j,q]
        let mut builder = CsrMatrixBuilder::new(self.m);
        for i in 0..n {
            if self.transfer[i].is_empty() {
                continue;
            }
            for (j, a_ij) in full
                .columns(i)
                .iter()
                .copied()
                .zip(full.values(i).iter().copied())
            {
                if self.transfer[j].is_empty() {
                    continue;
                }
                for &(p, t_ip) in &self.transfer[i] {
                    let w = t_ip * a_ij;
                    if w == 0.0 {
                        continue;
                    }
                    for &(q, t_jq) in &self.transfer[j] {
                        builder.add(p, q, w * t_jq);
                    }
                }
            }
        }

        self.reduced = Some(builder.build());
        Ok(())
    }

    fn reduced_matrix(&self) -> &dyn SparseMatrixView {
        self.reduced
            .as_ref()
            .expect("update() must be called before reduced_matrix()")
    }

    fn reduced_size(&self) -> usize {
        self.m
    }

    fn reduce_rhs(&self, full: &dyn SparseMatrixView, b_full: &[f64]) -> Vec<f64> {
        let n = self.n;
        // resid[i] = b_full[i] - (A_full * c)[i]
        let mut resid = vec![0.0; n];
        for i in 0..n {
            let mut ac = 0.0;
            for (&j, &a_ij) in full.columns(i).iter().zip(full.values(i).iter()) {
                ac += a_ij * self.offset[j];
            }
            resid[i] = b_full[i] - ac;
        }

        let mut b_red = vec![0.0; self.m];
        for i in 0..n {
            for &(p, t_ip) in &self.transfer[i] {
                b_red[p] += t_ip * resid[i];
            }
        }
        b_red
    }

    fn expand_lhs(&self, y_red: &[f64]) -> Vec<f64> {
        let mut y_full = self.offset.clone();
        for i in 0..self.n {
            for &(p, t_ip) in &self.transfer[i] {
                y_full[i] += t_ip * y_red[p];
            }
        }
        y_full
    }
}
