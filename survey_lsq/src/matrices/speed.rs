use super::{differences, fill_row, RowInput, XywMatrices};
use crate::config::SigmaConfig;
use crate::dataset::{Axis, Dataset, MeasurementType};
use crate::error::{AdjustError, Result};
use crate::indexer::CoordinateIndexer;

/// One measurement value joined with its station and both points.
struct JoinedRow {
    record: usize,
    kind: MeasurementType,
    observed: f64,
    station: usize,
    from: usize,
    to: usize,
}

/// Joins every record against the station and control tables first, computes
/// all coordinate differences in one pass, then fills the matrices.
pub(super) fn build(
    dataset: &Dataset,
    indexer: &CoordinateIndexer,
    defaults: &SigmaConfig,
    with_weights: bool,
) -> Result<XywMatrices> {
    let mut joined = Vec::with_capacity(dataset.measurements.len() * 2);
    for (position, record) in dataset.measurements.iter().enumerate() {
        let station = indexer
            .station_position(&record.station)
            .ok_or_else(|| AdjustError::UnknownStation(record.station.clone()))?;
        let base = &dataset.stations[station].point;
        let from = indexer
            .point_position(base)
            .ok_or_else(|| AdjustError::UnknownPoint(base.clone()))?;
        let to = indexer
            .point_position(&record.target)
            .ok_or_else(|| AdjustError::UnknownPoint(record.target.clone()))?;
        joined.extend(record.readings().map(|(kind, observed)| JoinedRow {
            record: position,
            kind,
            observed,
            station,
            from,
            to,
        }));
    }

    let coordinates: Vec<[Option<f64>; 3]> =
        dataset.controls.iter().map(|c| c.coordinates()).collect();
    let diffs: Vec<[f64; 3]> = joined
        .iter()
        .map(|j| {
            differences(
                &dataset.stations[j.station],
                coordinates[j.from],
                coordinates[j.to],
                dataset.measurements[j.record].target_height,
            )
        })
        .collect();

    let columns = |position: usize| Axis::ALL.map(|axis| indexer.column_at(position, axis));
    let mut m = XywMatrices::zeros(joined.len(), indexer.n_unknowns(), with_weights);
    for (row, (j, diff)) in joined.iter().zip(diffs).enumerate() {
        let input = RowInput {
            record_position: j.record,
            record: &dataset.measurements[j.record],
            kind: j.kind,
            observed: j.observed,
            station: &dataset.stations[j.station],
            from: &dataset.controls[j.from],
            to: &dataset.controls[j.to],
            diff,
            station_columns: columns(j.from),
            target_columns: columns(j.to),
            orientation_column: indexer.orientation_column_at(j.station),
        };
        fill_row(&mut m, row, &input, defaults)?;
    }
    Ok(m)
}
