//! Correction solvers: turning candidate residuals into new search
//! directions.
//!
//! Two policies exist, one per fixed strategy. `PrecondResidual` expands with
//! the preconditioned residual directly (generalized Davidson). `JacobiDavidson`
//! approximately solves the projected correction equation
//! `(I - X Xᵀ)(A - θ I)(I - X Xᵀ) t = -r` per candidate with a short
//! preconditioned CG, spending extra operator applications per outer
//! iteration to cut the number of outer iterations.

use crate::context::RunContext;
use crate::core::traits::BlockOperator;
use crate::error::EigenError;
use crate::kernels::local_col_dot;
use crate::parallel::Comm;
use crate::preconditioner::BlockPreconditioner;
use faer::{Mat, MatRef};

/// Breakdown guard for CG denominators, relative to the seed quantity.
const BREAKDOWN_TOL: f64 = 1e-30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectionKind {
    /// Directions are the preconditioned residuals themselves.
    PrecondResidual,
    /// Projected preconditioned CG on the correction equation, capped at
    /// `inner_iters` iterations per outer step.
    JacobiDavidson { inner_iters: usize },
}

pub struct CorrectionSolver {
    kind: CorrectionKind,
}

impl CorrectionSolver {
    pub fn new(kind: CorrectionKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> CorrectionKind {
        self.kind
    }

    /// Produce one correction direction per candidate column. `xs` holds the
    /// candidate Ritz vectors, `rs` their residuals, `thetas` their values.
    pub fn directions<C: Comm>(
        &self,
        op: &dyn BlockOperator,
        pc: Option<&dyn BlockPreconditioner>,
        comm: &C,
        thetas: &[f64],
        xs: MatRef<'_, f64>,
        rs: MatRef<'_, f64>,
        ctx: &mut RunContext,
    ) -> Result<Mat<f64>, EigenError> {
        match self.kind {
            CorrectionKind::PrecondResidual => self.precond_residual(pc, rs, ctx),
            CorrectionKind::JacobiDavidson { inner_iters } => {
                self.jacobi_davidson(op, pc, comm, thetas, xs, rs, inner_iters, ctx)
            }
        }
    }

    fn precond_residual(
        &self,
        pc: Option<&dyn BlockPreconditioner>,
        rs: MatRef<'_, f64>,
        ctx: &mut RunContext,
    ) -> Result<Mat<f64>, EigenError> {
        let (n, b) = (rs.nrows(), rs.ncols());
        let mut z = Mat::<f64>::zeros(n, b);
        apply_precond(pc, rs, &mut z, ctx)?;
        Ok(z)
    }

    #[allow(clippy::too_many_arguments)]
    fn jacobi_davidson<C: Comm>(
        &self,
        op: &dyn BlockOperator,
        pc: Option<&dyn BlockPreconditioner>,
        comm: &C,
        thetas: &[f64],
        xs: MatRef<'_, f64>,
        rs: MatRef<'_, f64>,
        inner_iters: usize,
        ctx: &mut RunContext,
    ) -> Result<Mat<f64>, EigenError> {
        let (n, b) = (rs.nrows(), rs.ncols());
        debug_assert_eq!(thetas.len(), b);

        // Inner-system state, one CG per column, batched through shared
        // operator applications. rhs is -r projected off the candidate span.
        let mut t = Mat::<f64>::zeros(n, b);
        let mut g = Mat::<f64>::from_fn(n, b, |i, j| -rs[(i, j)]);
        project_out_span(comm, xs, &mut g);
        let mut z = Mat::<f64>::zeros(n, b);
        apply_precond(pc, g.as_ref(), &mut z, ctx)?;
        project_out_span(comm, xs, &mut z);
        let mut d = z.clone();
        let mut rho = reduced_col_dots(comm, g.as_ref(), z.as_ref());
        let seed_rho: Vec<f64> = rho.clone();
        let mut frozen: Vec<bool> = rho.iter().map(|&r| r.abs() <= BREAKDOWN_TOL).collect();

        let mut q = Mat::<f64>::zeros(n, b);
        for _ in 0..inner_iters {
            let active: Vec<usize> =
                (0..b).filter(|&j| !frozen[j]).collect();
            if active.is_empty() {
                break;
            }
            // One block matvec over the still-active columns.
            let packed = Mat::<f64>::from_fn(n, active.len(), |i, k| d[(i, active[k])]);
            let mut packed_q = Mat::<f64>::zeros(n, active.len());
            op.apply_block(packed.as_ref(), packed_q.as_mut()).map_err(|e| {
                EigenError::OperatorApply { code: e.0, matvecs: ctx.stats.matvecs }
            })?;
            ctx.stats.matvecs += active.len();
            for (k, &j) in active.iter().enumerate() {
                for i in 0..n {
                    q[(i, j)] = packed_q[(i, k)] - thetas[j] * d[(i, j)];
                }
            }
            project_out_span(comm, xs, &mut q);

            let denom = reduced_col_dots(comm, d.as_ref(), q.as_ref());
            for &j in &active {
                let dq = denom[j];
                if dq.abs() <= BREAKDOWN_TOL * seed_rho[j].abs().max(1.0) {
                    // Indefinite or vanishing curvature along d; keep the
                    // iterate accumulated so far.
                    frozen[j] = true;
                    continue;
                }
                let alpha = rho[j] / dq;
                for i in 0..n {
                    t[(i, j)] += alpha * d[(i, j)];
                    g[(i, j)] -= alpha * q[(i, j)];
                }
            }

            apply_precond(pc, g.as_ref(), &mut z, ctx)?;
            project_out_span(comm, xs, &mut z);
            let rho_next = reduced_col_dots(comm, g.as_ref(), z.as_ref());
            for &j in &active {
                if frozen[j] {
                    continue;
                }
                if rho_next[j].abs() <= BREAKDOWN_TOL {
                    frozen[j] = true;
                    continue;
                }
                let beta = rho_next[j] / rho[j];
                for i in 0..n {
                    d[(i, j)] = z[(i, j)] + beta * d[(i, j)];
                }
                rho[j] = rho_next[j];
            }
        }

        // Columns where CG produced nothing fall back to the preconditioned
        // residual so every candidate still contributes a direction.
        let norms = reduced_col_dots(comm, t.as_ref(), t.as_ref());
        let dead: Vec<usize> = (0..b).filter(|&j| norms[j] <= BREAKDOWN_TOL).collect();
        if !dead.is_empty() {
            let packed_r = Mat::<f64>::from_fn(n, dead.len(), |i, k| rs[(i, dead[k])]);
            let mut packed_z = Mat::<f64>::zeros(n, dead.len());
            apply_precond(pc, packed_r.as_ref(), &mut packed_z, ctx)?;
            for (k, &j) in dead.iter().enumerate() {
                for i in 0..n {
                    t[(i, j)] = packed_z[(i, k)];
                }
            }
        }
        Ok(t)
    }
}

/// Apply the preconditioner, or copy when none is set.
fn apply_precond(
    pc: Option<&dyn BlockPreconditioner>,
    r: MatRef<'_, f64>,
    z: &mut Mat<f64>,
    ctx: &mut RunContext,
) -> Result<(), EigenError> {
    match pc {
        Some(pc) => {
            pc.apply_block(r, z.as_mut()).map_err(|e| EigenError::PreconditionerApply {
                code: e.0,
                applies: ctx.stats.preconds,
            })?;
            ctx.stats.preconds += r.ncols();
        }
        None => {
            for j in 0..r.ncols() {
                for i in 0..r.nrows() {
                    z[(i, j)] = r[(i, j)];
                }
            }
        }
    }
    Ok(())
}

/// Orthogonalize every column of `m` against the span of `xs`, with one
/// batched global reduction for all coefficients.
fn project_out_span<C: Comm>(comm: &C, xs: MatRef<'_, f64>, m: &mut Mat<f64>) {
    let (b, k) = (m.ncols(), xs.ncols());
    if k == 0 {
        return;
    }
    let mut coeffs = vec![0.0; b * k];
    for j in 0..b {
        for p in 0..k {
            coeffs[j * k + p] = local_col_dot(xs, p, m.as_ref(), j);
        }
    }
    comm.all_reduce_slice(&mut coeffs);
    for j in 0..b {
        for p in 0..k {
            let c = coeffs[j * k + p];
            for i in 0..m.nrows() {
                m[(i, j)] -= c * xs[(i, p)];
            }
        }
    }
}

/// Column-wise reduced dot products of matching columns of `a` and `b`.
fn reduced_col_dots<C: Comm>(comm: &C, a: MatRef<'_, f64>, b: MatRef<'_, f64>) -> Vec<f64> {
    let mut out: Vec<f64> =
        (0..a.ncols()).map(|j| local_col_dot(a, j, b, j)).collect();
    comm.all_reduce_slice(&mut out);
    out
}
