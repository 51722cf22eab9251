//! Subspace management: the orthonormal basis, its operator image, the
//! projected eigenproblem, and restart/locking compression.
//!
//! The manager owns `V` (the basis), `W = A·V`, and `H = Vᵀ A V`. Keeping
//! `W` means residuals, restarts and lock-outs are all linear recombinations
//! and never cost an extra operator application: for any small coefficient
//! vector `y`, the Ritz vector is `V y` and its image is exactly `W y`.
//!
//! Restarts are thick restarts: the subspace is re-based onto a retained set
//! of Ritz vectors, after which the projected matrix is diagonal. The "+k"
//! variant additionally carries a few Ritz vectors snapshotted from the
//! previous iteration, eliminated against the new basis with the identical
//! coefficients applied to their images.

use crate::config::{ResolvedOptions, Target};
use crate::context::RunContext;
use crate::core::traits::BlockOperator;
use crate::error::EigenError;
use crate::kernels::ortho::{orthonormalize_block, orthonormalize_tracked};
use crate::kernels::projected::{order_indices, solve_projected};
use crate::kernels::local_col_dot;
use crate::parallel::Comm;
use faer::{Mat, MatRef};

/// One Ritz pair under consideration, in target order.
#[derive(Debug, Clone, Copy)]
pub struct CandidateInfo {
    /// Position in the target-ordered Ritz decomposition.
    pub pos: usize,
    pub value: f64,
    pub rnorm: f64,
}

pub struct SubspaceManager {
    n: usize,
    max_basis: usize,
    min_restart: usize,
    ortho_tol: f64,
    target: Target,
    /// Orthonormal basis, first `size` columns valid.
    basis: Mat<f64>,
    /// Operator image of the basis, column-for-column.
    images: Mat<f64>,
    /// Projected matrix Vᵀ A V, `size × size` valid.
    h: Mat<f64>,
    size: usize,
    /// Target-ordered Ritz values of the current projected matrix.
    ritz_values: Vec<f64>,
    /// Small Ritz vectors, columns in the same target order.
    ritz_vectors: Mat<f64>,
    ritz_valid: bool,
    a_norm_est: f64,
    /// Operator norm fixed by the caller rather than estimated.
    a_norm_fixed: bool,
    /// "+k" snapshot from the previous iteration (vectors and images).
    retained: Mat<f64>,
    retained_w: Mat<f64>,
    retained_len: usize,
}

impl SubspaceManager {
    pub fn new(opts: &ResolvedOptions) -> Self {
        let n = opts.n;
        let m = opts.max_basis_size;
        let kmax = opts.restart_retained.max(1);
        Self {
            n,
            max_basis: m,
            min_restart: opts.min_restart_size,
            ortho_tol: opts.ortho_tol,
            target: opts.target.clone(),
            basis: Mat::zeros(n, m),
            images: Mat::zeros(n, m),
            h: Mat::zeros(m, m),
            size: 0,
            ritz_values: Vec::with_capacity(m),
            ritz_vectors: Mat::zeros(m, m),
            ritz_valid: false,
            a_norm_est: if opts.a_norm > 0.0 { opts.a_norm } else { 0.0 },
            a_norm_fixed: opts.a_norm > 0.0,
            retained: Mat::zeros(n, kmax),
            retained_w: Mat::zeros(n, kmax),
            retained_len: 0,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether appending `incoming` columns would overflow the basis.
    pub fn needs_restart(&self, incoming: usize) -> bool {
        self.size + incoming > self.max_basis
    }

    /// Current operator-norm estimate (caller-fixed or running max Ritz
    /// magnitude).
    pub fn a_norm(&self) -> f64 {
        self.a_norm_est
    }

    fn tie_tol(&self) -> f64 {
        f64::EPSILON * 100.0 * self.a_norm_est.max(1.0)
    }

    fn basis_view(&self) -> MatRef<'_, f64> {
        self.basis.as_ref().submatrix(0, 0, self.n, self.size)
    }

    fn images_view(&self) -> MatRef<'_, f64> {
        self.images.as_ref().submatrix(0, 0, self.n, self.size)
    }

    /// Orthonormalize `block[.., ..ncols]` against the locked set and the
    /// basis, append the surviving directions, apply the operator to them in
    /// one block call, and fold the new columns into the projected matrix.
    /// Returns the number of directions accepted.
    pub fn expand<C: Comm>(
        &mut self,
        comm: &C,
        locked: MatRef<'_, f64>,
        block: &mut Mat<f64>,
        ncols: usize,
        op: &dyn BlockOperator,
        ctx: &mut RunContext,
    ) -> Result<usize, EigenError> {
        assert!(self.size + ncols <= self.max_basis, "expand past basis capacity");
        let out =
            orthonormalize_block(comm, locked, self.basis_view(), block, ncols, self.ortho_tol);
        let acc = out.accepted;
        if acc == 0 {
            return Ok(0);
        }
        for j in 0..acc {
            for i in 0..self.n {
                self.basis[(i, self.size + j)] = block[(i, j)];
            }
        }
        {
            let x = self.basis.as_ref().submatrix(0, self.size, self.n, acc);
            let y = self.images.as_mut().submatrix_mut(0, self.size, self.n, acc);
            op.apply_block(x, y).map_err(|e| EigenError::OperatorApply {
                code: e.0,
                matvecs: ctx.stats.matvecs,
            })?;
        }
        ctx.stats.matvecs += acc;
        let new_size = self.size + acc;
        for j in self.size..new_size {
            let mut coeffs = Vec::with_capacity(new_size);
            for i in 0..new_size {
                coeffs.push(local_col_dot(self.basis.as_ref(), i, self.images.as_ref(), j));
            }
            comm.all_reduce_slice(&mut coeffs);
            for i in 0..new_size {
                // Write both triangles from the same reduced value so H stays
                // exactly symmetric.
                self.h[(i, j)] = coeffs[i];
                self.h[(j, i)] = coeffs[i];
            }
        }
        self.size = new_size;
        self.ritz_valid = false;
        Ok(acc)
    }

    /// Solve the projected eigenproblem and order the Ritz pairs by the
    /// target.
    pub fn rayleigh_ritz(&mut self) -> Result<(), EigenError> {
        assert!(self.size > 0, "Rayleigh-Ritz on an empty basis");
        let h = self.h.as_ref().submatrix(0, 0, self.size, self.size);
        let (values, vectors) = solve_projected(h)?;
        if !self.a_norm_fixed {
            for &v in &values {
                self.a_norm_est = self.a_norm_est.max(v.abs());
            }
        }
        let order = order_indices(&values, &self.target, self.tie_tol(), None);
        self.ritz_values.clear();
        for (dst, &src) in order.iter().enumerate() {
            self.ritz_values.push(values[src]);
            for i in 0..self.size {
                self.ritz_vectors[(i, dst)] = vectors[(i, src)];
            }
        }
        self.ritz_valid = true;
        Ok(())
    }

    /// Target-ordered Ritz values of the current subspace.
    pub fn ritz_values(&self) -> &[f64] {
        debug_assert!(self.ritz_valid);
        &self.ritz_values
    }

    /// Full-length Ritz vector for ordered position `pos`.
    pub fn ritz_vector(&self, pos: usize) -> Vec<f64> {
        debug_assert!(self.ritz_valid && pos < self.size);
        let mut x = vec![0.0; self.n];
        for i in 0..self.n {
            let mut acc = 0.0;
            for k in 0..self.size {
                acc += self.basis[(i, k)] * self.ritz_vectors[(k, pos)];
            }
            x[i] = acc;
        }
        x
    }

    /// Ritz vectors, images and residuals for the given ordered positions.
    /// Residual norms come from one batched global reduction.
    pub fn residual_block<C: Comm>(
        &self,
        comm: &C,
        positions: &[usize],
    ) -> (Vec<f64>, Mat<f64>, Mat<f64>, Vec<f64>) {
        debug_assert!(self.ritz_valid);
        let b = positions.len();
        let ysel = Mat::<f64>::from_fn(self.size, b, |i, j| self.ritz_vectors[(i, positions[j])]);
        let thetas: Vec<f64> = positions.iter().map(|&p| self.ritz_values[p]).collect();
        let xs: Mat<f64> = self.basis_view() * ysel.as_ref();
        let wy: Mat<f64> = self.images_view() * ysel.as_ref();
        let rs = Mat::<f64>::from_fn(self.n, b, |i, j| wy[(i, j)] - thetas[j] * xs[(i, j)]);
        let mut sq = vec![0.0; b];
        for j in 0..b {
            sq[j] = local_col_dot(rs.as_ref(), j, rs.as_ref(), j);
        }
        comm.all_reduce_slice(&mut sq);
        let rnorms = sq.iter().map(|s| s.max(0.0).sqrt()).collect();
        (thetas, xs, rs, rnorms)
    }

    /// The `count` target-best Ritz pairs with their residual norms, with
    /// value ties re-ordered by smaller residual norm.
    pub fn leading_pairs<C: Comm>(&self, comm: &C, count: usize) -> Vec<CandidateInfo> {
        let count = count.min(self.size);
        let positions: Vec<usize> = (0..count).collect();
        let (thetas, _xs, _rs, rnorms) = self.residual_block(comm, &positions);
        let order = order_indices(&thetas, &self.target, self.tie_tol(), Some(&rnorms));
        order
            .into_iter()
            .map(|k| CandidateInfo { pos: positions[k], value: thetas[k], rnorm: rnorms[k] })
            .collect()
    }

    /// Snapshot the `k` target-best Ritz vectors (and their images) for
    /// "+k" retention through the next restart.
    pub fn snapshot_retained(&mut self, k: usize) {
        debug_assert!(self.ritz_valid);
        let k = k.min(self.size).min(self.retained.ncols());
        if k == 0 {
            self.retained_len = 0;
            return;
        }
        let ysel = Mat::<f64>::from_fn(self.size, k, |i, j| self.ritz_vectors[(i, j)]);
        let xs: Mat<f64> = self.basis_view() * ysel.as_ref();
        let ws: Mat<f64> = self.images_view() * ysel.as_ref();
        for j in 0..k {
            for i in 0..self.n {
                self.retained[(i, j)] = xs[(i, j)];
                self.retained_w[(i, j)] = ws[(i, j)];
            }
        }
        self.retained_len = k;
    }

    /// Re-base the subspace onto the given ordered Ritz positions. The new
    /// basis is orthonormal by construction and the projected matrix becomes
    /// diagonal, so the Ritz decomposition of the compressed subspace is
    /// immediate.
    fn rebase(&mut self, keep: &[usize]) {
        let kk = keep.len();
        let ysel = Mat::<f64>::from_fn(self.size, kk, |i, j| self.ritz_vectors[(i, keep[j])]);
        let newv: Mat<f64> = self.basis_view() * ysel.as_ref();
        let neww: Mat<f64> = self.images_view() * ysel.as_ref();
        let values: Vec<f64> = keep.iter().map(|&p| self.ritz_values[p]).collect();
        for j in 0..kk {
            for i in 0..self.n {
                self.basis[(i, j)] = newv[(i, j)];
                self.images[(i, j)] = neww[(i, j)];
            }
        }
        for j in 0..self.max_basis {
            for i in 0..self.max_basis {
                self.h[(i, j)] = 0.0;
            }
        }
        self.ritz_values.clear();
        for j in 0..kk {
            self.h[(j, j)] = values[j];
            self.ritz_values.push(values[j]);
            for i in 0..kk {
                self.ritz_vectors[(i, j)] = if i == j { 1.0 } else { 0.0 };
            }
        }
        self.size = kk;
        self.ritz_valid = true;
    }

    /// Thick restart. Keeps the target-best `min_restart_size` Ritz vectors
    /// (always including `must_keep` positions), then re-appends the "+k"
    /// snapshot from the previous iteration without new operator
    /// applications.
    pub fn restart<C: Comm>(&mut self, comm: &C, must_keep: &[usize]) {
        debug_assert!(self.ritz_valid);
        let want = self.min_restart.min(self.size);
        let mut keep: Vec<usize> = Vec::with_capacity(want);
        for &p in must_keep {
            if p < self.size && !keep.contains(&p) {
                keep.push(p);
            }
        }
        let mut next = 0usize;
        while keep.len() < want {
            if !keep.contains(&next) {
                keep.push(next);
            }
            next += 1;
        }
        keep.sort_unstable();
        self.rebase(&keep);

        // "+k": previous-iteration Ritz vectors, eliminated against the new
        // basis with their images carried through the same coefficients.
        let k = self.retained_len;
        self.retained_len = 0;
        for p in 0..k {
            if self.size >= self.max_basis {
                break;
            }
            let col = self.size;
            for i in 0..self.n {
                self.basis[(i, col)] = self.retained[(i, p)];
                self.images[(i, col)] = self.retained_w[(i, p)];
            }
            if !orthonormalize_tracked(
                comm,
                &mut self.basis,
                &mut self.images,
                self.size,
                col,
                self.ortho_tol,
            ) {
                continue;
            }
            let mut coeffs = Vec::with_capacity(col + 1);
            for i in 0..=col {
                coeffs.push(local_col_dot(self.basis.as_ref(), i, self.images.as_ref(), col));
            }
            comm.all_reduce_slice(&mut coeffs);
            for i in 0..=col {
                self.h[(i, col)] = coeffs[i];
                self.h[(col, i)] = coeffs[i];
            }
            self.size = col + 1;
            self.ritz_valid = false;
        }
        if !self.ritz_valid {
            // Appended columns perturb the diagonal structure; recompute on
            // the next Rayleigh-Ritz call. Until then the ordered arrays
            // describe only the rebased part, which is all restart callers
            // rely on.
            self.ritz_values.truncate(self.size.min(self.ritz_values.len()));
        }
    }

    /// Extract the converged pair at ordered position `pos` and compress it
    /// out of the subspace. The remaining Ritz pairs keep their values and
    /// residuals; the projected matrix stays diagonal.
    pub fn lock_out(&mut self, pos: usize) -> (f64, Vec<f64>) {
        debug_assert!(self.ritz_valid && pos < self.size);
        let value = self.ritz_values[pos];
        let vector = self.ritz_vector(pos);
        let keep: Vec<usize> = (0..self.size).filter(|&p| p != pos).collect();
        self.rebase(&keep);
        (value, vector)
    }

    /// True when the Ritz decomposition matches the current basis.
    pub fn ritz_current(&self) -> bool {
        self.ritz_valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EigenOptions;
    use crate::matrix::CsrMatrix;
    use crate::parallel::SerialComm;
    use approx::assert_relative_eq;

    fn setup(n: usize, num_evals: usize, max_basis: usize, min_restart: usize) -> ResolvedOptions {
        EigenOptions {
            num_evals,
            max_basis_size: max_basis,
            min_restart_size: min_restart,
            ..Default::default()
        }
        .resolve(n)
        .unwrap()
    }

    fn grow(
        sub: &mut SubspaceManager,
        op: &CsrMatrix<f64>,
        ctx: &mut RunContext,
        cols: usize,
    ) -> usize {
        let comm = SerialComm;
        let n = op.nrows();
        let locked = Mat::<f64>::zeros(n, 0);
        let mut block = Mat::<f64>::from_fn(n, cols, |i, j| {
            (((i * 31 + j * 17 + 7) % 13) as f64) - 6.0
        });
        sub.expand(&comm, locked.as_ref(), &mut block, cols, op, ctx).unwrap()
    }

    #[test]
    fn expansion_keeps_projection_consistent() {
        let opts = setup(12, 2, 8, 4);
        let op = CsrMatrix::<f64>::laplacian_1d(12);
        let mut ctx = RunContext::new(&opts);
        let mut sub = SubspaceManager::new(&opts);
        let acc = grow(&mut sub, &op, &mut ctx, 4);
        assert_eq!(acc, 4);
        assert_eq!(ctx.stats.matvecs, 4);
        sub.rayleigh_ritz().unwrap();
        // Every Ritz pair of the projected problem satisfies the residual
        // identity r = W y - theta V y with rnorm >= 0 and the values lie
        // within the operator's spectral range [0, 4].
        for info in sub.leading_pairs(&SerialComm, 4) {
            assert!(info.value > -1e-12 && info.value < 4.0 + 1e-12);
            assert!(info.rnorm.is_finite());
        }
    }

    #[test]
    fn restart_preserves_best_residual() {
        let opts = setup(20, 2, 10, 5);
        let op = CsrMatrix::<f64>::laplacian_1d(20);
        let mut ctx = RunContext::new(&opts);
        let mut sub = SubspaceManager::new(&opts);
        grow(&mut sub, &op, &mut ctx, 6);
        sub.rayleigh_ritz().unwrap();
        grow(&mut sub, &op, &mut ctx, 4);
        sub.rayleigh_ritz().unwrap();
        let before = sub.leading_pairs(&SerialComm, 1)[0];
        sub.restart(&SerialComm, &[]);
        // The best Ritz pair survives the truncation exactly.
        let after = sub.leading_pairs(&SerialComm, 1)[0];
        assert_relative_eq!(after.value, before.value, epsilon = 1e-10);
        assert!(after.rnorm <= before.rnorm + 1e-10);
        assert_eq!(sub.size(), 5);
    }

    #[test]
    fn lock_out_removes_exactly_one_direction() {
        let opts = setup(16, 2, 9, 4);
        let op = CsrMatrix::<f64>::laplacian_1d(16);
        let mut ctx = RunContext::new(&opts);
        let mut sub = SubspaceManager::new(&opts);
        grow(&mut sub, &op, &mut ctx, 6);
        sub.rayleigh_ritz().unwrap();
        let before = sub.size();
        let lead = sub.leading_pairs(&SerialComm, 2);
        let (value, vector) = sub.lock_out(lead[0].pos);
        assert_eq!(sub.size(), before - 1);
        assert_relative_eq!(value, lead[0].value, epsilon = 1e-12);
        // The extracted vector is unit-norm and orthogonal to the remaining
        // basis.
        let comm = SerialComm;
        let x = Mat::<f64>::from_fn(16, 1, |i, _| vector[i]);
        assert_relative_eq!(
            crate::kernels::col_norm(&comm, x.as_ref(), 0),
            1.0,
            epsilon = 1e-10
        );
        for q in 0..sub.size() {
            let d = local_col_dot(x.as_ref(), 0, sub.basis.as_ref(), q);
            assert_relative_eq!(d, 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn plus_k_retention_appends_consistent_images() {
        let opts = setup(18, 2, 9, 4);
        let op = CsrMatrix::<f64>::laplacian_1d(18);
        let mut ctx = RunContext::new(&opts);
        let mut sub = SubspaceManager::new(&opts);
        grow(&mut sub, &op, &mut ctx, 6);
        sub.rayleigh_ritz().unwrap();
        sub.snapshot_retained(1);
        grow(&mut sub, &op, &mut ctx, 3);
        sub.rayleigh_ritz().unwrap();
        let matvecs_before = ctx.stats.matvecs;
        sub.restart(&SerialComm, &[]);
        // Retention must not trigger operator applications.
        assert_eq!(ctx.stats.matvecs, matvecs_before);
        assert!(sub.size() == 5 || sub.size() == 4);
        // After re-projection the appended column's image is consistent:
        // H = V^T W remains symmetric positive semi-definite for the
        // Laplacian, and Rayleigh-Ritz succeeds.
        sub.rayleigh_ritz().unwrap();
        for &v in sub.ritz_values() {
            assert!(v > -1e-9);
        }
    }
}
