//! Construction of the design matrix X, the free-term vector Y and the
//! weight diagonals W and sW.

mod constraints;
mod memory;
mod speed;
mod weights;

pub use constraints::{InnerConstraints, PSEUDOINVERSE_LABEL};
pub use weights::{control_weights, coordinate_mask};

use crate::config::{SigmaConfig, MEMORY_THRESHOLD_BYTES};
use crate::dataset::{Axis, ControlPoint, Dataset, Measurement, MeasurementType, Station};
use crate::error::{AdjustError, Result};
use crate::indexer::CoordinateIndexer;
use crate::observation;
use log::info;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How the rows of X, Y and W are assembled. Both strategies produce the
/// same matrices in the same row order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildStrategy {
    /// Joins all records against the control table up front.
    Speed,
    /// Looks coordinates up row by row.
    MemorySafe,
}

impl BuildStrategy {
    /// Picks a strategy from [`Dataset::approx_size_bytes`].
    pub fn auto(dataset: &Dataset) -> Self {
        Self::auto_with(dataset, Dataset::approx_size_bytes)
    }

    /// Picks a strategy from an injected size estimate.
    pub fn auto_with(dataset: &Dataset, estimate: impl Fn(&Dataset) -> usize) -> Self {
        let size = estimate(dataset);
        let strategy = if size < MEMORY_THRESHOLD_BYTES {
            BuildStrategy::Speed
        } else {
            BuildStrategy::MemorySafe
        };
        info!("dataset footprint ~{size} bytes, using {strategy} strategy");
        strategy
    }
}

impl fmt::Display for BuildStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildStrategy::Speed => f.write_str("speed"),
            BuildStrategy::MemorySafe => f.write_str("memory-safe"),
        }
    }
}

impl FromStr for BuildStrategy {
    type Err = AdjustError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "speed" => Ok(BuildStrategy::Speed),
            "memory-safe" | "memory_safe" | "memory" => Ok(BuildStrategy::MemorySafe),
            other => Err(AdjustError::InvalidStrategy(other.to_string())),
        }
    }
}

/// Origin of one design-matrix row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowLabel {
    /// Position of the measurement record in the dataset.
    pub record: usize,
    pub kind: MeasurementType,
}

/// Linearized observation model at the current coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct XywMatrices {
    pub x: DMatrix<f64>,
    pub y: DVector<f64>,
    /// Diagonal of W, absent for an ordinary adjustment.
    pub w: Option<DVector<f64>>,
    pub rows: Vec<RowLabel>,
}

impl XywMatrices {
    fn zeros(n_rows: usize, n_cols: usize, with_weights: bool) -> Self {
        Self {
            x: DMatrix::zeros(n_rows, n_cols),
            y: DVector::zeros(n_rows),
            w: with_weights.then(|| DVector::zeros(n_rows)),
            rows: Vec::with_capacity(n_rows),
        }
    }

    pub fn n_rows(&self) -> usize {
        self.x.nrows()
    }
}

/// Builds X, Y and optionally W with the chosen strategy.
pub fn build_xyw(
    dataset: &Dataset,
    indexer: &CoordinateIndexer,
    defaults: &SigmaConfig,
    with_weights: bool,
    strategy: BuildStrategy,
) -> Result<XywMatrices> {
    match strategy {
        BuildStrategy::Speed => speed::build(dataset, indexer, defaults, with_weights),
        BuildStrategy::MemorySafe => memory::build(dataset, indexer, defaults, with_weights),
    }
}

/// Everything needed to fill one row, already resolved by a strategy.
struct RowInput<'a> {
    record_position: usize,
    record: &'a Measurement,
    kind: MeasurementType,
    observed: f64,
    station: &'a Station,
    from: &'a ControlPoint,
    to: &'a ControlPoint,
    /// `target - station`, heights included on z.
    diff: [f64; 3],
    station_columns: [Option<usize>; 3],
    target_columns: [Option<usize>; 3],
    orientation_column: Option<usize>,
}

fn check_required_axes(kind: MeasurementType, from: &ControlPoint, to: &ControlPoint) -> Result<()> {
    for axis in kind.required_axes() {
        for point in [from, to] {
            if point.coordinate(*axis).is_none() {
                return Err(AdjustError::MissingCoordinate {
                    point: point.id.clone(),
                    axis: *axis,
                });
            }
        }
    }
    Ok(())
}

fn measurement_weight(
    record: &Measurement,
    kind: MeasurementType,
    defaults: &SigmaConfig,
) -> Result<f64> {
    let sigma = record.sigma(kind).unwrap_or_else(|| defaults.measurement(kind));
    if !(sigma.is_finite() && sigma > 0.0) {
        return Err(AdjustError::InvalidSigma {
            station: record.station.clone(),
            target: record.target.clone(),
            kind,
            sigma,
        });
    }
    Ok(1.0 / (sigma * sigma))
}

/// Writes coefficients for the given axes, station block then target block.
fn put_axes(
    x: &mut DMatrix<f64>,
    row: usize,
    input: &RowInput<'_>,
    axes: &[Axis],
    coefficients: &[f64],
) {
    let n = axes.len();
    for (i, axis) in axes.iter().enumerate() {
        if let Some(col) = input.station_columns[axis.index()] {
            x[(row, col)] += coefficients[i];
        }
        if let Some(col) = input.target_columns[axis.index()] {
            x[(row, col)] += coefficients[n + i];
        }
    }
}

fn fill_row(
    m: &mut XywMatrices,
    row: usize,
    input: &RowInput<'_>,
    defaults: &SigmaConfig,
) -> Result<()> {
    check_required_axes(input.kind, input.from, input.to)?;
    let [dx, dy, dz] = input.diff;
    let obs = input.observed;
    const XYZ: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];
    const XY: [Axis; 2] = [Axis::X, Axis::Y];

    let free_term = match input.kind {
        MeasurementType::SlopeDistance => {
            let l = observation::slope_distance(obs, dx, dy, dz);
            put_axes(&mut m.x, row, input, &XYZ, &l.coefficients);
            l.free_term
        }
        MeasurementType::HorizontalDistance => {
            let l = observation::horizontal_distance(obs, dx, dy);
            put_axes(&mut m.x, row, input, &XY, &l.coefficients);
            l.free_term
        }
        MeasurementType::DeltaX => {
            let l = observation::coordinate_difference(obs, dx);
            put_axes(&mut m.x, row, input, &[Axis::X], &l.coefficients);
            l.free_term
        }
        MeasurementType::DeltaY => {
            let l = observation::coordinate_difference(obs, dy);
            put_axes(&mut m.x, row, input, &[Axis::Y], &l.coefficients);
            l.free_term
        }
        MeasurementType::VerticalDistance | MeasurementType::DeltaZ => {
            let l = observation::coordinate_difference(obs, dz);
            put_axes(&mut m.x, row, input, &[Axis::Z], &l.coefficients);
            l.free_term
        }
        MeasurementType::Azimuth => {
            let l = observation::azimuth(obs, dx, dy);
            put_axes(&mut m.x, row, input, &XY, &l.coefficients);
            l.free_term
        }
        MeasurementType::Direction => {
            let (Some(orientation), Some(col)) =
                (input.station.orientation, input.orientation_column)
            else {
                return Err(AdjustError::InvalidConfig(format!(
                    "station '{}' has directions but no orientation constant",
                    input.station.key
                )));
            };
            let l = observation::direction(obs, dx, dy, orientation);
            put_axes(&mut m.x, row, input, &XY, &l.coefficients[..4]);
            m.x[(row, col)] += l.coefficients[4];
            l.free_term
        }
        MeasurementType::ZenithAngle => {
            let l = observation::zenith_angle(obs, dx, dy, dz);
            put_axes(&mut m.x, row, input, &XYZ, &l.coefficients);
            l.free_term
        }
        MeasurementType::VerticalAngle => {
            let l = observation::vertical_angle(obs, dx, dy, dz);
            put_axes(&mut m.x, row, input, &XYZ, &l.coefficients);
            l.free_term
        }
    };

    m.y[row] = free_term;
    if let Some(w) = m.w.as_mut() {
        w[row] = measurement_weight(input.record, input.kind, defaults)?;
    }
    m.rows.push(RowLabel {
        record: input.record_position,
        kind: input.kind,
    });
    Ok(())
}

/// `target - station` differences; absent axes come out as NaN and are
/// rejected by [`check_required_axes`] where they matter.
fn differences(
    station: &Station,
    from: [Option<f64>; 3],
    to: [Option<f64>; 3],
    target_height: f64,
) -> [f64; 3] {
    let get = |c: Option<f64>| c.unwrap_or(f64::NAN);
    [
        get(to[0]) - get(from[0]),
        get(to[1]) - get(from[1]),
        (get(to[2]) + target_height) - (get(from[2]) + station.height),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_names() {
        assert_eq!("memory-safe".parse::<BuildStrategy>().unwrap(), BuildStrategy::MemorySafe);
        assert_eq!("Speed".parse::<BuildStrategy>().unwrap(), BuildStrategy::Speed);
        assert!(matches!(
            "fast".parse::<BuildStrategy>(),
            Err(AdjustError::InvalidStrategy(_))
        ));
    }

    #[test]
    fn auto_strategy_honours_estimate() {
        let ds = Dataset::default();
        assert_eq!(BuildStrategy::auto(&ds), BuildStrategy::Speed);
        assert_eq!(
            BuildStrategy::auto_with(&ds, |_| MEMORY_THRESHOLD_BYTES),
            BuildStrategy::MemorySafe
        );
    }
}
