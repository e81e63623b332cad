//! Dense linear algebra helpers.

use crate::error::{AdjustError, Result};
use nalgebra::{DMatrix, DVector, SVD};

/// Moore-Penrose pseudo-inverse from a thin SVD.
///
/// Singular values below `max(rows, cols) * eps * sigma_max` are treated as
/// zero, so rank-deficient normal matrices yield the minimum-norm solution.
pub fn pseudo_inverse(m: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    let (rows, cols) = m.shape();
    if rows == 0 || cols == 0 {
        return Ok(DMatrix::zeros(cols, rows));
    }
    if m.iter().any(|v| !v.is_finite()) {
        return Err(AdjustError::PseudoInverse(
            "matrix contains non-finite entries".into(),
        ));
    }

    let max_niter = (100 * rows.max(cols)).max(1000);
    let svd = SVD::try_new(m.clone(), true, true, f64::EPSILON, max_niter)
        .ok_or_else(|| AdjustError::PseudoInverse("SVD did not converge".into()))?;

    let sigma_max = svd.singular_values.max();
    let tol = rows.max(cols) as f64 * f64::EPSILON * sigma_max;
    let s_inv: DVector<f64> = svd
        .singular_values
        .map(|s| if s > tol { 1.0 / s } else { 0.0 });

    let u = svd
        .u
        .ok_or_else(|| AdjustError::PseudoInverse("left singular vectors missing".into()))?;
    let vt = svd
        .v_t
        .ok_or_else(|| AdjustError::PseudoInverse("right singular vectors missing".into()))?;
    let pinv = vt.transpose() * DMatrix::from_diagonal(&s_inv) * u.transpose();
    if pinv.iter().any(|v| !v.is_finite()) {
        return Err(AdjustError::PseudoInverse(
            "pseudo-inverse has non-finite entries".into(),
        ));
    }
    Ok(pinv)
}

/// Computes `Aᵀ·diag(d)·A` without expanding the diagonal.
pub fn weighted_gram(a: &DMatrix<f64>, d: Option<&DVector<f64>>) -> DMatrix<f64> {
    match d {
        Some(d) => {
            let mut scaled = a.clone();
            for (mut row, w) in scaled.row_iter_mut().zip(d.iter()) {
                row *= *w;
            }
            a.transpose() * scaled
        }
        None => a.transpose() * a,
    }
}

/// Computes `Aᵀ·diag(d)·y`.
pub fn weighted_cross(a: &DMatrix<f64>, d: Option<&DVector<f64>>, y: &DVector<f64>) -> DVector<f64> {
    match d {
        Some(d) => a.transpose() * d.component_mul(y),
        None => a.transpose() * y,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn inverse_of_regular_matrix() {
        let m = DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 2.0, 3.0]);
        let pinv = pseudo_inverse(&m).unwrap();
        let id = &m * &pinv;
        assert_relative_eq!(id, DMatrix::<f64>::identity(2, 2), epsilon = 1e-12);
    }

    #[test]
    fn singular_matrix_satisfies_penrose_condition() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        let pinv = pseudo_inverse(&m).unwrap();
        assert_relative_eq!(&m * &pinv * &m, m, epsilon = 1e-12);
        assert_relative_eq!(pinv[(0, 0)], 0.25, epsilon = 1e-12);
    }

    #[test]
    fn nan_input_fails() {
        let m = DMatrix::from_row_slice(1, 1, &[f64::NAN]);
        assert!(matches!(pseudo_inverse(&m), Err(AdjustError::PseudoInverse(_))));
    }

    #[test]
    fn weighted_gram_matches_dense_product() {
        let a = DMatrix::from_row_slice(3, 2, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let d = DVector::from_vec(vec![1.0, 2.0, 0.5]);
        let dense = a.transpose() * DMatrix::from_diagonal(&d) * &a;
        assert_relative_eq!(weighted_gram(&a, Some(&d)), dense, epsilon = 1e-12);
        let y = DVector::from_vec(vec![1.0, -1.0, 2.0]);
        let cross = a.transpose() * DMatrix::from_diagonal(&d) * &y;
        assert_relative_eq!(weighted_cross(&a, Some(&d), &y), cross, epsilon = 1e-12);
    }
}
