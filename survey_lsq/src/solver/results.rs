use super::iteration::IterationState;
use super::{Solver, SolverStatus};
use crate::dataset::{Axis, MeasurementType};
use crate::methods::Method;
use crate::robust::TuningConstants;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Residual and coordinate-correction sigma after one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub iteration: usize,
    pub residual_sigma: f64,
    pub coordinate_sigma: f64,
    pub max_increment: f64,
}

/// Before/after coordinates of one control point.
#[derive(Debug, Clone, PartialEq)]
pub struct PointResult {
    pub id: String,
    pub approximate: [Option<f64>; 3],
    pub adjusted: [Option<f64>; 3],
    /// Standard deviation of each adjusted coordinate that is an unknown.
    pub sigma: [Option<f64>; 3],
}

impl PointResult {
    /// `adjusted - approximate` per axis.
    pub fn delta(&self) -> [Option<f64>; 3] {
        Axis::ALL.map(|axis| {
            let i = axis.index();
            Some(self.adjusted[i]? - self.approximate[i]?)
        })
    }
}

/// Adjusted orientation constant of a station with direction readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationOrientation {
    pub station: String,
    pub orientation: f64,
    pub sigma: f64,
}

/// One design-matrix row with its residual.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResidualRow {
    pub station: String,
    pub target: String,
    pub kind: MeasurementType,
    pub residual: f64,
    pub sigma: f64,
}

/// Everything the last successful iteration produced.
#[derive(Debug, Clone)]
pub struct AdjustmentResults {
    pub status: SolverStatus,
    pub iterations: usize,
    pub svd_converged: bool,
    pub method: Method,
    pub tuning_constants: Option<TuningConstants>,
    pub free_adjustment: Option<Method>,
    pub free_tuning_constants: Option<TuningConstants>,
    pub n_measurements: usize,
    pub n_unknowns: usize,
    pub n_movable_tie_points: usize,
    pub degrees_of_freedom: i64,
    pub inner_constraints: Vec<String>,
    pub increments: DVector<f64>,
    pub residuals: DVector<f64>,
    pub residual_variance: f64,
    pub coordinate_variance: f64,
    pub history: Vec<HistoryEntry>,
    pub points: Vec<PointResult>,
    pub orientations: Vec<StationOrientation>,
    pub rows: Vec<ResidualRow>,
    pub covariance_unknowns: DMatrix<f64>,
    pub covariance_observations: DMatrix<f64>,
    pub covariance_residuals: DMatrix<f64>,
}

fn sigma_from(cov: &DMatrix<f64>, i: usize) -> f64 {
    cov[(i, i)].max(0.0).sqrt()
}

pub(super) fn collect(solver: &Solver, state: &IterationState) -> AdjustmentResults {
    let indexer = &solver.indexer;
    let dataset = &solver.dataset;

    let points = dataset
        .controls
        .iter()
        .enumerate()
        .map(|(position, point)| PointResult {
            id: point.id.clone(),
            approximate: solver
                .approximate
                .get(position)
                .map_or([None; 3], |p| p.coordinates()),
            adjusted: point.coordinates(),
            sigma: Axis::ALL.map(|axis| {
                indexer
                    .column_at(position, axis)
                    .map(|column| sigma_from(&state.cov_unknowns, column))
            }),
        })
        .collect();

    let orientations = indexer
        .orientation_columns()
        .filter_map(|(position, column)| {
            let station = dataset.stations.get(position)?;
            let orientation = state.orientations.get(position).copied().flatten()?;
            Some(StationOrientation {
                station: station.key.clone(),
                orientation: orientation + state.increments[column],
                sigma: sigma_from(&state.cov_unknowns, column),
            })
        })
        .collect();

    let rows = state
        .matrices
        .rows
        .iter()
        .enumerate()
        .map(|(i, label)| {
            let record = &dataset.measurements[label.record];
            ResidualRow {
                station: record.station.clone(),
                target: record.target.clone(),
                kind: label.kind,
                residual: state.residuals[i],
                sigma: sigma_from(&state.cov_residuals, i),
            }
        })
        .collect();

    AdjustmentResults {
        status: solver.status,
        iterations: solver.counter,
        svd_converged: solver.svd_converged,
        method: solver.methods.method(),
        tuning_constants: solver.methods.tuning_constants().cloned(),
        free_adjustment: solver.methods.free_adjustment(),
        free_tuning_constants: solver.methods.free_tuning_constants().cloned(),
        n_measurements: state.matrices.n_rows(),
        n_unknowns: indexer.n_unknowns(),
        n_movable_tie_points: solver.feedback.n_movable_tie_points,
        degrees_of_freedom: state.degrees_of_freedom,
        inner_constraints: state.constraint_labels.clone(),
        increments: state.increments.clone(),
        residuals: state.residuals.clone(),
        residual_variance: state.residual_variance,
        coordinate_variance: solver.feedback.coordinate_variance,
        history: solver.history.clone(),
        points,
        orientations,
        rows,
        covariance_unknowns: state.cov_unknowns.clone(),
        covariance_observations: state.cov_observations.clone(),
        covariance_residuals: state.cov_residuals.clone(),
    }
}

/// Coordinates of one point in the summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointSummary {
    pub id: String,
    pub approximate: [Option<f64>; 3],
    pub adjusted: [Option<f64>; 3],
    pub delta: [Option<f64>; 3],
    pub sigma: [Option<f64>; 3],
}

/// Serializable digest of [`AdjustmentResults`]; covariance matrices are
/// reduced to the standard deviations on their diagonals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentSummary {
    pub status: SolverStatus,
    pub iterations: usize,
    pub svd_converged: bool,
    pub method: String,
    pub tuning_constants: Option<TuningConstants>,
    pub free_adjustment: Option<String>,
    pub free_tuning_constants: Option<TuningConstants>,
    pub n_measurements: usize,
    pub n_unknowns: usize,
    pub n_movable_tie_points: usize,
    pub degrees_of_freedom: i64,
    pub inner_constraints: Vec<String>,
    pub residual_sigma: f64,
    pub coordinate_sigma: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<HistoryEntry>,
    pub points: Vec<PointSummary>,
    pub orientations: Vec<StationOrientation>,
    pub residuals: Vec<ResidualRow>,
}

impl AdjustmentResults {
    pub fn residual_sigma(&self) -> f64 {
        self.residual_variance.sqrt()
    }

    pub fn coordinate_sigma(&self) -> f64 {
        self.coordinate_variance.sqrt()
    }

    pub fn point(&self, id: &str) -> Option<&PointResult> {
        self.points.iter().find(|p| p.id == id)
    }

    pub fn summary(&self) -> AdjustmentSummary {
        AdjustmentSummary {
            status: self.status,
            iterations: self.iterations,
            svd_converged: self.svd_converged,
            method: self.method.to_string(),
            tuning_constants: self.tuning_constants.clone(),
            free_adjustment: self.free_adjustment.map(|m| m.to_string()),
            free_tuning_constants: self.free_tuning_constants.clone(),
            n_measurements: self.n_measurements,
            n_unknowns: self.n_unknowns,
            n_movable_tie_points: self.n_movable_tie_points,
            degrees_of_freedom: self.degrees_of_freedom,
            inner_constraints: self.inner_constraints.clone(),
            residual_sigma: self.residual_sigma(),
            coordinate_sigma: self.coordinate_sigma(),
            history: self.history.clone(),
            points: self
                .points
                .iter()
                .map(|p| PointSummary {
                    id: p.id.clone(),
                    approximate: p.approximate,
                    adjusted: p.adjusted,
                    delta: p.delta(),
                    sigma: p.sigma,
                })
                .collect(),
            orientations: self.orientations.clone(),
            residuals: self.rows.clone(),
        }
    }
}
