//! Iterative least-squares solver.
//!
//! The solver owns the dataset for the duration of an adjustment and is the
//! only writer of its coordinates. Every iteration rebuilds X and Y from the
//! current coordinates, optionally reweights W and sW with the robust
//! estimators, solves the normal equations with a pseudo-inverse and applies
//! the coordinate increments.

mod iteration;
mod results;

pub use iteration::degrees_of_freedom;
pub use results::{
    AdjustmentResults, AdjustmentSummary, HistoryEntry, PointResult, PointSummary,
    ResidualRow, StationOrientation,
};

use crate::config::{SigmaConfig, SolverConfig};
use crate::dataset::{ControlPoint, Dataset};
use crate::error::{AdjustError, Result};
use crate::indexer::CoordinateIndexer;
use crate::matrices::{
    build_xyw, control_weights, coordinate_mask, BuildStrategy, InnerConstraints,
    PSEUDOINVERSE_LABEL,
};
use crate::methods::{IterationFeedback, Method, MethodManager};
use crate::robust::TuningConstants;
use iteration::{FreeTerm, IterationState};
use log::{debug, info, warn};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Progress of an adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverStatus {
    NotStarted,
    Iterating,
    Converged,
    /// The pseudo-inverse failed; results are those of the last successful
    /// iteration.
    Diverged,
    MaxIterations,
}

impl fmt::Display for SolverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SolverStatus::NotStarted => "not started",
            SolverStatus::Iterating => "iterating",
            SolverStatus::Converged => "converged",
            SolverStatus::Diverged => "diverged",
            SolverStatus::MaxIterations => "terminated by max iterations",
        };
        f.write_str(s)
    }
}

/// Configuration handed to [`Solver::new`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdjustmentSettings {
    pub solver: SolverConfig,
    /// Fallback sigmas for measurements and control coordinates.
    pub sigmas: SigmaConfig,
    /// `None` picks a strategy from the dataset size.
    pub strategy: Option<BuildStrategy>,
    pub keep_history: bool,
}

pub struct Solver {
    dataset: Dataset,
    approximate: Vec<ControlPoint>,
    settings: AdjustmentSettings,
    strategy: BuildStrategy,
    methods: MethodManager,
    indexer: CoordinateIndexer,
    w: Option<DVector<f64>>,
    sw: Option<DVector<f64>>,
    state: Option<IterationState>,
    feedback: IterationFeedback,
    status: SolverStatus,
    counter: usize,
    svd_converged: bool,
    history: Vec<HistoryEntry>,
}

impl Solver {
    /// Validates the inputs, computes orientation constants and the index
    /// space. The default method is a weighted adjustment on fixed points.
    pub fn new(mut dataset: Dataset, settings: AdjustmentSettings) -> Result<Self> {
        settings.solver.validate()?;
        settings.sigmas.validate()?;
        dataset.validate()?;
        dataset.update_orientations()?;

        let strategy = settings
            .strategy
            .unwrap_or_else(|| BuildStrategy::auto(&dataset));
        let indexer = CoordinateIndexer::new(&dataset);
        info!(
            "{} measurements, {} unknowns ({} orientations), {strategy} strategy",
            dataset.n_measurements(),
            indexer.n_unknowns(),
            indexer.n_orientations()
        );

        Ok(Self {
            approximate: dataset.controls.clone(),
            dataset,
            settings,
            strategy,
            methods: MethodManager::default(),
            indexer,
            w: None,
            sw: None,
            state: None,
            feedback: IterationFeedback::default(),
            status: SolverStatus::NotStarted,
            counter: 0,
            svd_converged: true,
            history: Vec::new(),
        })
    }

    pub fn with_methods(mut self, methods: MethodManager) -> Self {
        self.set_methods(methods);
        self
    }

    /// Replaces both method slots. Solver-driven constants are refreshed
    /// once an iteration has run; weights of a slot whose method changed are
    /// rebuilt from sigmas.
    pub fn set_methods(&mut self, mut methods: MethodManager) {
        self.reset_weights_on_change(methods.method(), methods.free_adjustment());
        if self.counter > 0 {
            methods.refresh(self.feedback);
        }
        self.methods = methods;
    }

    pub fn set_method(&mut self, method: Method, overrides: Option<&TuningConstants>) {
        self.reset_weights_on_change(method, self.methods.free_adjustment());
        self.methods.set_method(method, overrides);
    }

    pub fn set_free_adjustment(&mut self, method: Option<Method>, overrides: Option<&TuningConstants>) {
        self.reset_weights_on_change(self.methods.method(), method);
        self.methods.set_free_adjustment(method, overrides);
    }

    /// Drops accumulated robust weights of every slot whose method differs
    /// from the current one.
    fn reset_weights_on_change(&mut self, method: Method, free_adjustment: Option<Method>) {
        if method != self.methods.method() {
            self.w = None;
        }
        if free_adjustment != self.methods.free_adjustment() {
            self.sw = None;
        }
    }

    pub fn methods(&self) -> &MethodManager {
        &self.methods
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn into_dataset(self) -> Dataset {
        self.dataset
    }

    pub fn indexer(&self) -> &CoordinateIndexer {
        &self.indexer
    }

    pub fn strategy(&self) -> BuildStrategy {
        self.strategy
    }

    pub fn status(&self) -> SolverStatus {
        self.status
    }

    /// Number of successful iterations.
    pub fn iterations(&self) -> usize {
        self.counter
    }

    pub fn svd_converged(&self) -> bool {
        self.svd_converged
    }

    /// Iterates until convergence, the iteration cap or a pseudo-inverse
    /// failure.
    pub fn solve(&mut self) -> Result<AdjustmentResults> {
        loop {
            match self.iterate() {
                Ok(true) => break,
                Ok(false) if self.counter >= self.settings.solver.max_iter => {
                    warn!(
                        "stopped after {} iterations without convergence",
                        self.counter
                    );
                    self.status = SolverStatus::MaxIterations;
                    break;
                }
                Ok(false) => {}
                Err(AdjustError::PseudoInverse(_)) => {
                    if self.state.is_none() {
                        return Err(AdjustError::NoSuccessfulIteration);
                    }
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        if self.status == SolverStatus::Converged {
            info!("converged after {} iterations", self.counter);
        }
        self.results()
    }

    /// Runs one iteration. Returns whether every coordinate increment is
    /// within the threshold.
    ///
    /// A pseudo-inverse failure leaves coordinates and results untouched,
    /// marks the solver as diverged and is returned as the error.
    pub fn iterate(&mut self) -> Result<bool> {
        self.status = SolverStatus::Iterating;
        self.dataset.update_orientations()?;
        if !self.indexer.is_current_for(&self.dataset) {
            debug!("finite coordinate set changed, rebuilding the index");
            self.indexer = CoordinateIndexer::new(&self.dataset);
            self.sw = None;
            self.state = None;
        }

        let orientations: Vec<Option<f64>> =
            self.dataset.stations.iter().map(|s| s.orientation).collect();

        let uses_weights = self.methods.uses_weights();
        let mut matrices = build_xyw(
            &self.dataset,
            &self.indexer,
            &self.settings.sigmas,
            uses_weights && self.w.is_none(),
            self.strategy,
        )?;
        if !uses_weights {
            self.w = None;
        } else if let Some(w) = matrices.w.take() {
            self.w = Some(w);
        }

        if self.methods.uses_control_weights() {
            if self.sw.is_none() {
                self.sw = Some(control_weights(
                    &self.dataset,
                    &self.indexer,
                    &self.settings.sigmas,
                ));
            }
        } else {
            self.sw = None;
        }

        self.reweight();
        matrices.w = self.w.clone();

        let constraints = self
            .methods
            .uses_inner_constraints()
            .then(|| InnerConstraints::build(&self.dataset, &self.indexer));
        let mask = coordinate_mask(&self.indexer);
        let free = match (&self.sw, &constraints) {
            (Some(sw), Some(constraints)) => FreeTerm::InnerConstraints { constraints, sw },
            (Some(sw), None) => FreeTerm::FixedPoints { sw, mask: &mask },
            (None, _) => FreeTerm::None,
        };
        let constraint_labels = match (&constraints, self.methods.free_adjustment()) {
            (Some(c), _) => c.labels.clone(),
            (None, Some(Method::Ordinary)) => vec![PSEUDOINVERSE_LABEL.to_string()],
            (None, _) => Vec::new(),
        };
        let n_constraints = constraints.as_ref().map_or(0, InnerConstraints::n_rows);

        let (g_inv, increments) = match iteration::solve_normal_equations(&matrices, &free) {
            Ok(solution) => solution,
            Err(e) => {
                warn!("iteration {} aborted: {e}", self.counter + 1);
                self.status = SolverStatus::Diverged;
                self.svd_converged = false;
                return Err(e);
            }
        };

        let mut max_increment = 0.0f64;
        for (position, axis, column) in self.indexer.coordinate_columns() {
            let point = &mut self.dataset.controls[position];
            if let Some(current) = point.coordinate(axis) {
                point.set_coordinate(axis, current + increments[column]);
            }
            max_increment = max_increment.max(increments[column].abs());
        }

        let residuals = &matrices.x * &increments - &matrices.y;
        let dof = degrees_of_freedom(matrices.n_rows(), n_constraints, self.indexer.n_unknowns());
        let residual_variance = iteration::residual_variance(&residuals, matrices.w.as_ref(), dof);
        let cov_unknowns = g_inv * residual_variance;
        let cov_observations = &matrices.x * &cov_unknowns * matrices.x.transpose();
        let cov_residuals = iteration::residual_covariance(
            matrices.w.as_ref(),
            residual_variance,
            &cov_observations,
        );

        let coordinate_columns: Vec<usize> =
            self.indexer.coordinate_columns().map(|(_, _, c)| c).collect();
        let n_movable = iteration::movable_tie_points(self.sw.as_ref(), &coordinate_columns);
        let corrections = self.total_corrections();
        let coordinate_variance =
            iteration::coordinate_variance(&corrections, self.sw.as_ref(), n_movable);

        self.feedback = IterationFeedback {
            degrees_of_freedom: dof,
            residual_variance,
            n_movable_tie_points: n_movable,
            coordinate_variance,
        };
        self.methods.refresh(self.feedback);

        self.counter += 1;
        if self.settings.keep_history {
            self.history.push(HistoryEntry {
                iteration: self.counter,
                residual_sigma: residual_variance.sqrt(),
                coordinate_sigma: coordinate_variance.sqrt(),
                max_increment,
            });
        }
        debug!(
            "iteration {}: max |increment| {max_increment:.6}, sigma0² {residual_variance:.6}, dof {dof}",
            self.counter
        );

        self.state = Some(IterationState {
            matrices,
            constraint_labels,
            n_constraints,
            increments,
            residuals,
            residual_variance,
            degrees_of_freedom: dof,
            cov_unknowns,
            cov_observations,
            cov_residuals,
            orientations,
        });

        let converged = max_increment <= self.settings.solver.threshold;
        if converged {
            self.status = SolverStatus::Converged;
        }
        Ok(converged)
    }

    /// Scales W and sW by the robust estimators using the previous
    /// iteration's normalized residuals and increments.
    fn reweight(&mut self) {
        let Some(state) = &self.state else {
            return;
        };
        if let (Some(estimator), Some(w)) = (self.methods.method().estimator(), self.w.as_mut()) {
            if w.len() == state.residuals.len() {
                let v = iteration::normalized(&state.residuals, &state.cov_residuals);
                let constants = self.methods.tuning_constants().cloned().unwrap_or_default();
                w.component_mul_assign(&estimator.weights(&v, &constants));
            } else {
                warn!("observation count changed, skipping observation reweighting");
            }
        }
        if let (Some(estimator), Some(sw)) = (
            self.methods.free_adjustment().and_then(Method::estimator),
            self.sw.as_mut(),
        ) {
            if sw.len() == state.increments.len() {
                let v = iteration::normalized(&state.increments, &state.cov_unknowns);
                let constants = self
                    .methods
                    .free_tuning_constants()
                    .cloned()
                    .unwrap_or_default();
                sw.component_mul_assign(&estimator.weights(&v, &constants));
            } else {
                warn!("unknown count changed, skipping control-point reweighting");
            }
        }
    }

    /// `(column, adjusted - approximate)` for every coordinate unknown.
    fn total_corrections(&self) -> Vec<(usize, f64)> {
        self.indexer
            .coordinate_columns()
            .filter_map(|(position, axis, column)| {
                let adjusted = self.dataset.controls[position].coordinate(axis)?;
                let approximate = self.approximate.get(position)?.coordinate(axis)?;
                Some((column, adjusted - approximate))
            })
            .collect()
    }

    /// Results of the last successful iteration.
    pub fn results(&self) -> Result<AdjustmentResults> {
        let state = self.state.as_ref().ok_or(AdjustError::NoSuccessfulIteration)?;
        Ok(results::collect(self, state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::angles::azimuth;
    use crate::dataset::{Measurement, MeasurementType, Station};

    fn resection() -> Dataset {
        let reading = |from: (f64, f64), to: (f64, f64)| {
            (azimuth(to.0 - from.0, to.1 - from.1) - 0.3).rem_euclid(std::f64::consts::TAU)
        };
        Dataset::new(
            vec![
                ControlPoint::xy("A", 0.0, 0.0).with_sigma(0.001),
                ControlPoint::xy("B", 100.0, 0.0).with_sigma(0.001),
                ControlPoint::xy("P", 48.0, 41.0).without_weight(),
            ],
            vec![Station::new("SA", "A")],
            vec![
                Measurement::new("SA", "B")
                    .with(MeasurementType::Direction, reading((0.0, 0.0), (100.0, 0.0))),
                Measurement::new("SA", "P")
                    .with(MeasurementType::Direction, reading((0.0, 0.0), (50.0, 40.0)))
                    .with(MeasurementType::HorizontalDistance, 50.0_f64.hypot(40.0)),
            ],
        )
    }

    #[test]
    fn orientation_is_reported_from_the_linearization_point() {
        let mut solver = Solver::new(resection(), AdjustmentSettings::default()).unwrap();
        solver.iterate().unwrap();
        let used = solver.dataset.stations[0].orientation.unwrap();
        let column = solver.indexer.orientation_column("SA").unwrap();
        let increment = solver.state.as_ref().unwrap().increments[column];

        // a later iteration recomputes the constant before it can fail
        solver.dataset.stations[0].orientation = Some(used + 0.25);

        let results = solver.results().unwrap();
        assert!((results.orientations[0].orientation - (used + increment)).abs() < 1e-12);
    }

    #[test]
    fn changing_method_rebuilds_weights() {
        let mut solver = Solver::new(resection(), AdjustmentSettings::default()).unwrap();
        solver.set_method(Method::Robust(crate::robust::Estimator::Huber), None);
        solver.iterate().unwrap();
        assert!(solver.w.is_some());
        solver.set_method(Method::Robust(crate::robust::Estimator::Huber), None);
        assert!(solver.w.is_some());
        solver.set_method(Method::Weighted, None);
        assert!(solver.w.is_none());
        solver.set_free_adjustment(Some(Method::Weighted), None);
        assert!(solver.sw.is_none());
    }
}
