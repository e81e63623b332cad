use super::{differences, fill_row, RowInput, XywMatrices};
use crate::config::SigmaConfig;
use crate::dataset::{Axis, Dataset};
use crate::error::{AdjustError, Result};
use crate::indexer::CoordinateIndexer;

/// Walks the records row by row and looks every reference up on demand,
/// keeping no intermediate tables.
pub(super) fn build(
    dataset: &Dataset,
    indexer: &CoordinateIndexer,
    defaults: &SigmaConfig,
    with_weights: bool,
) -> Result<XywMatrices> {
    let n_rows = dataset.n_measurements();
    let mut m = XywMatrices::zeros(n_rows, indexer.n_unknowns(), with_weights);
    let mut row = 0;

    for (position, record) in dataset.measurements.iter().enumerate() {
        let (station_position, station) = dataset
            .stations
            .iter()
            .enumerate()
            .find(|(_, s)| s.key == record.station)
            .ok_or_else(|| AdjustError::UnknownStation(record.station.clone()))?;
        let (from_position, from) = dataset
            .controls
            .iter()
            .enumerate()
            .find(|(_, c)| c.id == station.point)
            .ok_or_else(|| AdjustError::UnknownPoint(station.point.clone()))?;
        let (to_position, to) = dataset
            .controls
            .iter()
            .enumerate()
            .find(|(_, c)| c.id == record.target)
            .ok_or_else(|| AdjustError::UnknownPoint(record.target.clone()))?;

        for (kind, observed) in record.readings() {
            let input = RowInput {
                record_position: position,
                record,
                kind,
                observed,
                station,
                from,
                to,
                diff: differences(
                    station,
                    from.coordinates(),
                    to.coordinates(),
                    record.target_height,
                ),
                station_columns: Axis::ALL.map(|axis| indexer.column_at(from_position, axis)),
                target_columns: Axis::ALL.map(|axis| indexer.column_at(to_position, axis)),
                orientation_column: indexer.orientation_column_at(station_position),
            };
            fill_row(&mut m, row, &input, defaults)?;
            row += 1;
        }
    }
    Ok(m)
}
