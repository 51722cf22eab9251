//! Compressed-sparse-row matrices.
//!
//! The engine itself never needs a matrix type, but tests, benches and most
//! callers do; `CsrMatrix<f64>` implements [`BlockOperator`] with optional
//! rayon parallelism across block columns.

use crate::core::traits::{ApplyErr, BlockOperator};
use faer::{Mat, MatMut, MatRef};
use num_traits::Float;

/// Square sparse matrix in CSR form.
#[derive(Debug, Clone)]
pub struct CsrMatrix<T> {
    nrows: usize,
    ncols: usize,
    indptr: Vec<usize>,
    indices: Vec<usize>,
    values: Vec<T>,
}

impl<T: Float> CsrMatrix<T> {
    /// Build from (row, col, value) triplets; duplicate entries are summed.
    pub fn from_triplets(nrows: usize, ncols: usize, triplets: &[(usize, usize, T)]) -> Self {
        let mut rows: Vec<Vec<(usize, T)>> = vec![Vec::new(); nrows];
        for &(i, j, v) in triplets {
            assert!(i < nrows && j < ncols, "triplet out of bounds");
            if let Some(entry) = rows[i].iter_mut().find(|(c, _)| *c == j) {
                entry.1 = entry.1 + v;
            } else {
                rows[i].push((j, v));
            }
        }
        let mut indptr = Vec::with_capacity(nrows + 1);
        let mut indices = Vec::new();
        let mut values = Vec::new();
        indptr.push(0);
        for row in rows.iter_mut() {
            row.sort_by_key(|&(c, _)| c);
            for &(c, v) in row.iter() {
                indices.push(c);
                values.push(v);
            }
            indptr.push(indices.len());
        }
        Self { nrows, ncols, indptr, indices, values }
    }

    /// 1-D Laplacian: 2 on the diagonal, -1 on the off-diagonals.
    pub fn laplacian_1d(n: usize) -> Self {
        let two = T::from(2.0).unwrap();
        let neg_one = T::from(-1.0).unwrap();
        let mut triplets = Vec::with_capacity(3 * n);
        for i in 0..n {
            triplets.push((i, i, two));
            if i + 1 < n {
                triplets.push((i, i + 1, neg_one));
                triplets.push((i + 1, i, neg_one));
            }
        }
        Self::from_triplets(n, n, &triplets)
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Main diagonal, with zeros for missing entries.
    pub fn diagonal(&self) -> Vec<T> {
        let mut d = vec![T::zero(); self.nrows.min(self.ncols)];
        for i in 0..d.len() {
            for k in self.indptr[i]..self.indptr[i + 1] {
                if self.indices[k] == i {
                    d[i] = self.values[k];
                }
            }
        }
        d
    }

    /// y = A x for plain slices.
    pub fn matvec(&self, x: &[T], y: &mut [T]) {
        assert_eq!(x.len(), self.ncols, "input vector has incorrect length");
        assert_eq!(y.len(), self.nrows, "output vector has incorrect length");
        for i in 0..self.nrows {
            let mut acc = T::zero();
            for k in self.indptr[i]..self.indptr[i + 1] {
                acc = acc + self.values[k] * x[self.indices[k]];
            }
            y[i] = acc;
        }
    }
}

impl BlockOperator for CsrMatrix<f64> {
    fn nrows(&self) -> usize {
        self.nrows
    }

    fn apply_block(&self, x: MatRef<'_, f64>, mut y: MatMut<'_, f64>) -> Result<(), ApplyErr> {
        assert_eq!(x.nrows(), self.ncols, "input block has incorrect row count");
        assert_eq!(y.nrows(), self.nrows, "output block has incorrect row count");
        let b = x.ncols();
        let mut out = Mat::<f64>::zeros(self.nrows, b);
        #[cfg(feature = "rayon")]
        {
            use rayon::prelude::*;
            let cols: Vec<Vec<f64>> = (0..b)
                .into_par_iter()
                .map(|j| {
                    let mut col = vec![0.0; self.nrows];
                    for i in 0..self.nrows {
                        let mut acc = 0.0;
                        for k in self.indptr[i]..self.indptr[i + 1] {
                            acc += self.values[k] * x[(self.indices[k], j)];
                        }
                        col[i] = acc;
                    }
                    col
                })
                .collect();
            for (j, col) in cols.iter().enumerate() {
                for i in 0..self.nrows {
                    out[(i, j)] = col[i];
                }
            }
        }
        #[cfg(not(feature = "rayon"))]
        {
            for j in 0..b {
                for i in 0..self.nrows {
                    let mut acc = 0.0;
                    for k in self.indptr[i]..self.indptr[i + 1] {
                        acc += self.values[k] * x[(self.indices[k], j)];
                    }
                    out[(i, j)] = acc;
                }
            }
        }
        y.copy_from(&out);
        Ok(())
    }
}
