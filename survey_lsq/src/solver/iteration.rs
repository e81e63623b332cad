//! Arithmetic of a single least-squares iteration.

use crate::linalg::{pseudo_inverse, weighted_cross, weighted_gram};
use crate::error::Result;
use crate::matrices::{InnerConstraints, XywMatrices};
use log::warn;
use nalgebra::{DMatrix, DVector};

/// Second term of the normal matrix G.
pub(crate) enum FreeTerm<'a> {
    /// No control weights: G is inverted as is.
    None,
    /// `sXᵀ·sW·sX`: control weights on the coordinate diagonal.
    FixedPoints { sw: &'a DVector<f64>, mask: &'a DVector<f64> },
    /// `Rᵀ·R·sW`.
    InnerConstraints { constraints: &'a InnerConstraints, sw: &'a DVector<f64> },
}

/// Everything one successful iteration produced.
#[derive(Debug, Clone)]
pub(crate) struct IterationState {
    pub matrices: XywMatrices,
    pub constraint_labels: Vec<String>,
    pub n_constraints: usize,
    pub increments: DVector<f64>,
    pub residuals: DVector<f64>,
    pub residual_variance: f64,
    pub degrees_of_freedom: i64,
    pub cov_unknowns: DMatrix<f64>,
    pub cov_observations: DMatrix<f64>,
    pub cov_residuals: DMatrix<f64>,
    /// Station orientation constants the iteration linearized around.
    pub orientations: Vec<Option<f64>>,
}

/// Degrees of freedom of the adjustment.
pub fn degrees_of_freedom(n_measurements: usize, n_constraints: usize, n_unknowns: usize) -> i64 {
    n_measurements as i64 + n_constraints as i64 - n_unknowns as i64
}

/// Forms G and L and solves for the increments. Returns `(pinv(G), increments)`.
pub(crate) fn solve_normal_equations(
    m: &XywMatrices,
    free: &FreeTerm<'_>,
) -> Result<(DMatrix<f64>, DVector<f64>)> {
    let mut g = weighted_gram(&m.x, m.w.as_ref());
    match free {
        FreeTerm::None => {}
        FreeTerm::FixedPoints { sw, mask } => {
            for i in 0..g.nrows() {
                g[(i, i)] += mask[i] * sw[i] * mask[i];
            }
        }
        FreeTerm::InnerConstraints { constraints, sw } => {
            let mut rtr = constraints.r.transpose() * &constraints.r;
            for (mut column, weight) in rtr.column_iter_mut().zip(sw.iter()) {
                column *= *weight;
            }
            g += rtr;
        }
    }
    let l = weighted_cross(&m.x, m.w.as_ref(), &m.y);
    let g_inv = pseudo_inverse(&g)?;
    let increments = &g_inv * l;
    Ok((g_inv, increments))
}

/// `Σ w·r² / dof`, or 1 when there is no redundancy.
pub(crate) fn residual_variance(
    residuals: &DVector<f64>,
    w: Option<&DVector<f64>>,
    degrees_of_freedom: i64,
) -> f64 {
    if degrees_of_freedom <= 0 {
        return 1.0;
    }
    let sum: f64 = match w {
        Some(w) => residuals.iter().zip(w.iter()).map(|(r, w)| w * r * r).sum(),
        None => residuals.norm_squared(),
    };
    sum / degrees_of_freedom as f64
}

/// Covariance of the residuals: `σ₀²·W⁻¹ − cov(Y)`. Rows with zero weight
/// get a zero cofactor.
pub(crate) fn residual_covariance(
    w: Option<&DVector<f64>>,
    residual_variance: f64,
    cov_observations: &DMatrix<f64>,
) -> DMatrix<f64> {
    let n = cov_observations.nrows();
    let cofactor = match w {
        Some(w) => w.map(|w| if w != 0.0 { 1.0 / w } else { 0.0 }),
        None => DVector::from_element(n, 1.0),
    };
    DMatrix::from_diagonal(&(cofactor * residual_variance)) - cov_observations
}

/// Divides every value by the standard error taken from `cov`'s diagonal.
/// Negative variances are clipped to 0; a zero standard error gives −∞.
pub(crate) fn normalized(values: &DVector<f64>, cov: &DMatrix<f64>) -> DVector<f64> {
    let mut clipped = 0usize;
    let v = DVector::from_iterator(
        values.len(),
        values.iter().enumerate().map(|(i, value)| {
            let mut var = cov[(i, i)];
            if var < 0.0 {
                clipped += 1;
                var = 0.0;
            }
            let se = var.sqrt();
            if se == 0.0 {
                f64::NEG_INFINITY
            } else {
                value / se
            }
        }),
    );
    if clipped > 0 {
        warn!("clipped {clipped} negative variance(s) to zero while normalizing");
    }
    v
}

/// Number of coordinate unknowns free to move: non-zero control weights, or
/// every coordinate unknown without sW.
pub(crate) fn movable_tie_points(
    sw: Option<&DVector<f64>>,
    coordinate_columns: &[usize],
) -> usize {
    match sw {
        Some(sw) => coordinate_columns.iter().filter(|c| sw[**c] != 0.0).count(),
        None => coordinate_columns.len(),
    }
}

/// `Σ w·Δ² / n_movable` over the total coordinate corrections, or 1 when
/// nothing can move.
pub(crate) fn coordinate_variance(
    corrections: &[(usize, f64)],
    sw: Option<&DVector<f64>>,
    n_movable: usize,
) -> f64 {
    if n_movable == 0 {
        return 1.0;
    }
    let sum: f64 = corrections
        .iter()
        .map(|(column, delta)| sw.map_or(1.0, |sw| sw[*column]) * delta * delta)
        .sum();
    sum / n_movable as f64
}
