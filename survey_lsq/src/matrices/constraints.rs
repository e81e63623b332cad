use crate::dataset::{Axis, Dataset, MeasurementType};
use crate::indexer::CoordinateIndexer;
use log::warn;
use nalgebra::{DMatrix, RowDVector};

/// Label reported when the datum is left to the pseudo-inverse alone.
pub const PSEUDOINVERSE_LABEL: &str = "pseudoinverse";

/// Datum-defining rows R of a free network with their labels.
#[derive(Debug, Clone, PartialEq)]
pub struct InnerConstraints {
    pub r: DMatrix<f64>,
    pub labels: Vec<String>,
}

/// Which datum defects the observation set leaves open.
#[derive(Debug, Clone, Copy)]
struct Conditions {
    one_d: bool,
    three_d: bool,
    slope_like: bool,
    height_like: bool,
    vector: bool,
    hd: bool,
    vz: bool,
    azimuth: bool,
}

impl Conditions {
    fn new(dataset: &Dataset) -> Self {
        let axes = dataset.present_axes();
        let has_axis = |a: Axis| axes.contains(&a);
        let types = dataset.present_measurement_types();
        let has = |t: MeasurementType| types.contains(&t);
        use MeasurementType::*;

        Self {
            one_d: !(has_axis(Axis::X) && has_axis(Axis::Y)) && has_axis(Axis::Z),
            three_d: Axis::ALL.into_iter().all(has_axis),
            slope_like: has(SlopeDistance)
                || (has(HorizontalDistance) && has(VerticalDistance))
                || (has(HorizontalDistance) && has(ZenithAngle))
                || (has(VerticalDistance) && has(ZenithAngle))
                || (has(HorizontalDistance) && has(VerticalAngle))
                || (has(VerticalDistance) && has(VerticalAngle)),
            height_like: has(VerticalDistance) || has(DeltaZ),
            vector: has(DeltaX) && has(DeltaY) && has(DeltaZ),
            hd: has(HorizontalDistance),
            vz: has(ZenithAngle),
            azimuth: has(Azimuth),
        }
    }

    fn rotate(&self) -> bool {
        !self.one_d && !(self.vector || self.azimuth)
    }

    fn scale_axes(&self) -> Option<(&'static str, &'static [Axis])> {
        if self.one_d && !self.height_like {
            Some(("1D scale", &[Axis::Z]))
        } else if !self.one_d && !(self.vector || self.slope_like || self.hd || self.vz) {
            Some(("2D scale", &[Axis::X, Axis::Y]))
        } else if self.three_d && !(self.vector || self.slope_like) {
            Some(("3D scale", &[Axis::X, Axis::Y, Axis::Z]))
        } else {
            None
        }
    }
}

impl InnerConstraints {
    /// Builds R at the current approximate coordinates: one translation row
    /// per present axis, a rotation row unless orientation is observed, and
    /// a scale row unless distances or vectors fix it. All-zero rows are
    /// dropped.
    pub fn build(dataset: &Dataset, indexer: &CoordinateIndexer) -> Self {
        let n = indexer.n_unknowns();
        let conditions = Conditions::new(dataset);
        let value = |position: usize, axis: Axis| {
            dataset.controls[position].coordinate(axis).unwrap_or(0.0)
        };
        let mut rows: Vec<(String, RowDVector<f64>)> = Vec::new();

        for axis in dataset.present_axes() {
            let mut row = RowDVector::zeros(n);
            for (_, column) in indexer.axis_columns(axis) {
                row[column] = 1.0;
            }
            rows.push((format!("translation {axis}"), row));
        }

        if conditions.rotate() {
            let mut row = RowDVector::zeros(n);
            for (position, column) in indexer.axis_columns(Axis::X) {
                row[column] = value(position, Axis::Y);
            }
            for (position, column) in indexer.axis_columns(Axis::Y) {
                row[column] = -value(position, Axis::X);
            }
            rows.push(("rotate".to_string(), row));
        }

        if let Some((label, axes)) = conditions.scale_axes() {
            let mut row = RowDVector::zeros(n);
            for axis in axes {
                for (position, column) in indexer.axis_columns(*axis) {
                    row[column] = value(position, *axis);
                }
            }
            rows.push((label.to_string(), row));
        }

        rows.retain(|(label, row)| {
            let keep = row.iter().any(|v| *v != 0.0);
            if !keep {
                warn!("dropping degenerate inner constraint '{label}'");
            }
            keep
        });

        let labels = rows.iter().map(|(label, _)| label.clone()).collect();
        let r = if rows.is_empty() {
            DMatrix::zeros(0, n)
        } else {
            let stacked: Vec<RowDVector<f64>> = rows.into_iter().map(|(_, row)| row).collect();
            DMatrix::from_rows(&stacked)
        };
        Self { r, labels }
    }

    pub fn n_rows(&self) -> usize {
        self.r.nrows()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{ControlPoint, Measurement, Station};

    #[test]
    fn levelling_network_gets_translation_only() {
        let ds = Dataset::new(
            vec![ControlPoint::height("A", 10.0), ControlPoint::height("B", 12.0)],
            vec![Station::new("S", "A")],
            vec![Measurement::new("S", "B").with(MeasurementType::VerticalDistance, 2.0)],
        );
        let idx = CoordinateIndexer::new(&ds);
        let ic = InnerConstraints::build(&ds, &idx);
        assert_eq!(ic.labels, vec!["translation z"]);
        assert_eq!(ic.r.shape(), (1, 2));
    }

    #[test]
    fn directions_only_add_scale() {
        let ds = Dataset::new(
            vec![
                ControlPoint::xy("A", 0.0, 0.0),
                ControlPoint::xy("B", 10.0, 0.0),
                ControlPoint::xy("C", 0.0, 10.0),
            ],
            vec![Station::new("S", "A")],
            vec![
                Measurement::new("S", "B").with(MeasurementType::Direction, 0.0),
                Measurement::new("S", "C").with(MeasurementType::Direction, 1.0),
            ],
        );
        let idx = CoordinateIndexer::new(&ds);
        let ic = InnerConstraints::build(&ds, &idx);
        assert_eq!(
            ic.labels,
            vec!["translation x", "translation y", "rotate", "2D scale"]
        );
        // rotation row: +y at x-columns, -x at y-columns
        assert_eq!(ic.r[(2, 5)], 0.0);
        assert_eq!(ic.r[(2, 4)], 10.0);
        assert_eq!(ic.r[(2, 3)], -10.0);
    }
}
