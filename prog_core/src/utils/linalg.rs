// prog_core/src/utils/linalg.rs

use nalgebra::{Cholesky, DMatrix, SymmetricEigen};

/// Forces a covariance matrix to be exactly symmetric.
/// Tiny numerical errors make `P` slightly non-symmetric after each filter step.
pub fn symmetrize(p: &DMatrix<f64>) -> DMatrix<f64> {
    (p + p.transpose()) * 0.5
}

/// Returns a "square root" `S` of a positive semi-definite matrix, `S * S^T = P`.
///
/// The Cholesky factor is used when `P` is positive definite. Otherwise the
/// factor is built from a symmetric eigendecomposition with negative
/// eigenvalues (round-off) clamped to zero, so singular and all-zero
/// covariances still produce a valid (possibly degenerate) factor.
pub fn psd_sqrt(p: &DMatrix<f64>) -> DMatrix<f64> {
    if let Some(cholesky) = Cholesky::new(p.clone()) {
        let l = cholesky.l();
        // A zero pivot can slip through as 0/0 below the diagonal.
        if l.iter().all(|v| v.is_finite()) {
            return l;
        }
    }

    let eigen = SymmetricEigen::new(symmetrize(p));
    let sqrt_values = eigen.eigenvalues.map(|lambda| lambda.max(0.0).sqrt());
    eigen.eigenvectors * DMatrix::from_diagonal(&sqrt_values)
}
