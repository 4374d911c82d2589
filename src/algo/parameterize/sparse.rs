//! Sparse matrix storage and a preconditioned conjugate gradient solver.
//!
//! This module provides a lightweight sparse matrix implementation (CSR format)
//! and a Jacobi-preconditioned conjugate gradient solver for the symmetric
//! positive definite normal equations assembled by the conformal solver.

use nalgebra::DVector;

use crate::error::{MeshError, Result};

/// Compressed Sparse Row (CSR) matrix.
///
/// Stores a sparse matrix in CSR format for efficient matrix-vector multiplication.
#[derive(Debug, Clone)]
pub struct CsrMatrix {
    /// Number of rows.
    rows: usize,
    /// Number of columns.
    cols: usize,
    /// Row pointers: row_ptr[i] is the index in col_idx/values where row i starts.
    /// Length is rows + 1, with row_ptr[rows] = nnz.
    row_ptr: Vec<usize>,
    /// Column indices for each non-zero value.
    col_idx: Vec<usize>,
    /// Non-zero values.
    values: Vec<f64>,
}

impl CsrMatrix {
    /// Create a CSR matrix from triplets (row, col, value).
    ///
    /// Duplicate entries at the same (row, col) are summed.
    pub fn from_triplets(rows: usize, cols: usize, mut triplets: Vec<(usize, usize, f64)>) -> Self {
        triplets.sort_unstable_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut row_ptr = vec![0usize; rows + 1];
        let mut col_idx: Vec<usize> = Vec::with_capacity(triplets.len());
        let mut values: Vec<f64> = Vec::with_capacity(triplets.len());
        let mut last: Option<(usize, usize)> = None;

        for (row, col, val) in triplets {
            debug_assert!(row < rows && col < cols, "triplet out of bounds");
            match values.last_mut() {
                Some(acc) if last == Some((row, col)) => *acc += val,
                _ => {
                    col_idx.push(col);
                    values.push(val);
                    row_ptr[row + 1] += 1;
                    last = Some((row, col));
                }
            }
        }

        // Prefix sum turns per-row counts into offsets.
        for r in 0..rows {
            row_ptr[r + 1] += row_ptr[r];
        }

        Self {
            rows,
            cols,
            row_ptr,
            col_idx,
            values,
        }
    }

    /// Get the number of rows.
    #[inline]
    pub fn nrows(&self) -> usize {
        self.rows
    }

    /// Get the number of columns.
    #[inline]
    pub fn ncols(&self) -> usize {
        self.cols
    }

    /// Get the number of non-zero entries.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Diagonal entries (zero where none is stored).
    pub fn diagonal(&self) -> DVector<f64> {
        let mut d = DVector::zeros(self.rows.min(self.cols));
        for i in 0..d.len() {
            for k in self.row_ptr[i]..self.row_ptr[i + 1] {
                if self.col_idx[k] == i {
                    d[i] = self.values[k];
                    break;
                }
            }
        }
        d
    }

    /// Multiply matrix by vector: y = A * x.
    pub fn mul_vec(&self, x: &DVector<f64>) -> DVector<f64> {
        assert_eq!(x.len(), self.cols, "Vector dimension mismatch");

        let mut y = DVector::zeros(self.rows);

        for i in 0..self.rows {
            let mut sum = 0.0;
            for k in self.row_ptr[i]..self.row_ptr[i + 1] {
                sum += self.values[k] * x[self.col_idx[k]];
            }
            y[i] = sum;
        }

        y
    }
}

/// Solve A*x = b using the Jacobi-preconditioned Conjugate Gradient method.
///
/// Requires A to be symmetric positive definite.
///
/// # Arguments
///
/// * `a` - The system matrix (must be symmetric positive definite)
/// * `b` - The right-hand side vector
/// * `x0` - Optional initial guess (zeros if None)
/// * `max_iter` - Maximum number of iterations
/// * `tolerance` - Convergence tolerance (relative residual norm)
///
/// # Errors
///
/// - [`MeshError::SingularSystem`] if a zero diagonal or a vanishing search
///   direction shows the matrix is not positive definite
/// - [`MeshError::ConvergenceFailed`] if the residual is still above
///   `tolerance` after `max_iter` iterations
pub fn conjugate_gradient(
    a: &CsrMatrix,
    b: &DVector<f64>,
    x0: Option<&DVector<f64>>,
    max_iter: usize,
    tolerance: f64,
) -> Result<DVector<f64>> {
    let n = b.len();
    assert_eq!(a.nrows(), n, "Matrix-vector dimension mismatch");
    assert_eq!(a.ncols(), n, "Matrix must be square");

    let mut x = match x0 {
        Some(x0) => x0.clone(),
        None => DVector::zeros(n),
    };

    let b_norm = b.norm();
    if b_norm < 1e-15 {
        return Ok(x);
    }

    let diag = a.diagonal();
    let mut inv_diag = DVector::zeros(n);
    for i in 0..n {
        if diag[i].abs() < 1e-300 {
            return Err(MeshError::singular(format!("zero diagonal in row {}", i)));
        }
        inv_diag[i] = 1.0 / diag[i];
    }

    // r = b - A*x
    let mut r = b - a.mul_vec(&x);
    if r.norm() / b_norm < tolerance {
        return Ok(x);
    }

    // z = M^-1 r
    let mut z = r.component_mul(&inv_diag);
    let mut p = z.clone();
    let mut rz = r.dot(&z);

    for _ in 0..max_iter {
        let ap = a.mul_vec(&p);

        // alpha = (r . z) / (p . Ap)
        let p_ap = p.dot(&ap);
        if !(p_ap.abs() > 1e-300) {
            return Err(MeshError::singular("search direction collapsed"));
        }
        let alpha = rz / p_ap;

        x += alpha * &p;
        r -= alpha * &ap;

        if r.norm() / b_norm < tolerance {
            return Ok(x);
        }

        z = r.component_mul(&inv_diag);
        let rz_new = r.dot(&z);

        // beta = (r_new . z_new) / (r_old . z_old)
        let beta = rz_new / rz;
        p = &z + beta * &p;
        rz = rz_new;
    }

    Err(MeshError::ConvergenceFailed {
        iterations: max_iter,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_spd() -> CsrMatrix {
        // [ 4  1 ]
        // [ 1  3 ]
        CsrMatrix::from_triplets(2, 2, vec![(0, 0, 4.0), (0, 1, 1.0), (1, 0, 1.0), (1, 1, 3.0)])
    }

    #[test]
    fn test_csr_from_triplets() {
        let a = small_spd();
        assert_eq!(a.nrows(), 2);
        assert_eq!(a.ncols(), 2);
        assert_eq!(a.nnz(), 4);
        assert_eq!(a.diagonal(), DVector::from_vec(vec![4.0, 3.0]));
    }

    #[test]
    fn test_csr_from_triplets_with_duplicates() {
        let triplets = vec![
            (0, 0, 2.0),
            (0, 0, 2.0), // Duplicate: should sum to 4.0
            (1, 1, 3.0),
            (0, 1, 1.0),
            (1, 0, 1.0),
        ];
        let a = CsrMatrix::from_triplets(2, 2, triplets);
        assert_eq!(a.nnz(), 4);

        let y = a.mul_vec(&DVector::from_vec(vec![1.0, 0.0]));
        assert!((y[0] - 4.0).abs() < 1e-10);
        assert!((y[1] - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_csr_empty_rows() {
        // Row 1 has no entries.
        let a = CsrMatrix::from_triplets(3, 3, vec![(0, 0, 1.0), (2, 2, 5.0)]);
        let y = a.mul_vec(&DVector::from_vec(vec![1.0, 1.0, 1.0]));
        assert_eq!(y, DVector::from_vec(vec![1.0, 0.0, 5.0]));
        assert_eq!(a.diagonal()[1], 0.0);
    }

    #[test]
    fn test_cg_simple() {
        // Solution: x = 1/11, y = 7/11
        let a = small_spd();
        let b = DVector::from_vec(vec![1.0, 2.0]);

        let x = conjugate_gradient(&a, &b, None, 100, 1e-12).unwrap();

        assert!((a.mul_vec(&x) - b).norm() < 1e-8);
        assert!((x[0] - 1.0 / 11.0).abs() < 1e-8);
        assert!((x[1] - 7.0 / 11.0).abs() < 1e-8);
    }

    #[test]
    fn test_cg_larger_system() {
        let triplets = vec![
            (0, 0, 10.0),
            (0, 1, 1.0),
            (0, 2, 2.0),
            (1, 0, 1.0),
            (1, 1, 10.0),
            (1, 2, 1.0),
            (2, 0, 2.0),
            (2, 1, 1.0),
            (2, 2, 10.0),
            (2, 3, 1.0),
            (3, 2, 1.0),
            (3, 3, 10.0),
        ];
        let a = CsrMatrix::from_triplets(4, 4, triplets);
        let b = DVector::from_vec(vec![1.0, 2.0, 3.0, 4.0]);

        let x = conjugate_gradient(&a, &b, None, 100, 1e-12).unwrap();
        assert!((a.mul_vec(&x) - &b).norm() < 1e-8);
    }

    #[test]
    fn test_cg_with_initial_guess() {
        let a = small_spd();
        let b = DVector::from_vec(vec![1.0, 2.0]);
        let x0 = DVector::from_vec(vec![0.1, 0.6]);

        let x = conjugate_gradient(&a, &b, Some(&x0), 100, 1e-12).unwrap();
        assert!((a.mul_vec(&x) - b).norm() < 1e-8);
    }

    #[test]
    fn test_cg_zero_diagonal_is_singular() {
        let a = CsrMatrix::from_triplets(2, 2, vec![(0, 0, 1.0)]);
        let b = DVector::from_vec(vec![1.0, 1.0]);
        let err = conjugate_gradient(&a, &b, None, 10, 1e-10).unwrap_err();
        assert!(matches!(err, MeshError::SingularSystem { .. }));
    }

    #[test]
    fn test_cg_iteration_limit() {
        let a = small_spd();
        let b = DVector::from_vec(vec![1.0, 2.0]);
        let err = conjugate_gradient(&a, &b, None, 0, 1e-12).unwrap_err();
        assert!(matches!(err, MeshError::ConvergenceFailed { iterations: 0 }));
    }
}
