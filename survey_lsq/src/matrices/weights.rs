use crate::config::SigmaConfig;
use crate::dataset::Dataset;
use crate::indexer::CoordinateIndexer;
use nalgebra::DVector;

/// Diagonal of the control-point weight matrix sW over all unknowns.
///
/// A missing sigma falls back to `defaults`; a positive sigma gives `1/σ²`;
/// zero or a negative sentinel gives weight 0. Orientation columns are 0.
pub fn control_weights(
    dataset: &Dataset,
    indexer: &CoordinateIndexer,
    defaults: &SigmaConfig,
) -> DVector<f64> {
    let mut sw = DVector::zeros(indexer.n_unknowns());
    for (position, axis, column) in indexer.coordinate_columns() {
        let sigma = dataset.controls[position]
            .sigma(axis)
            .unwrap_or_else(|| defaults.coordinate(axis));
        sw[column] = if sigma > 0.0 && sigma.is_finite() {
            1.0 / (sigma * sigma)
        } else {
            0.0
        };
    }
    sw
}

/// sX: 1 at coordinate columns, 0 at orientation columns.
pub fn coordinate_mask(indexer: &CoordinateIndexer) -> DVector<f64> {
    let mut mask = DVector::zeros(indexer.n_unknowns());
    for (_, _, column) in indexer.coordinate_columns() {
        mask[column] = 1.0;
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{ControlPoint, Station, NO_WEIGHT_SIGMA};

    #[test]
    fn sigma_rule() {
        let mut ds = Dataset::default();
        ds.controls.push(ControlPoint::xy("A", 0.0, 0.0).with_sigma(0.5));
        ds.controls.push(ControlPoint::xy("B", 1.0, 0.0).with_sigma(NO_WEIGHT_SIGMA));
        ds.controls.push(ControlPoint::xy("C", 1.0, 1.0));
        let mut s = Station::new("S", "A");
        s.orientation = Some(0.0);
        ds.stations.push(s);
        let idx = CoordinateIndexer::new(&ds);
        let sw = control_weights(&ds, &idx, &SigmaConfig::default());
        assert_eq!(sw.len(), 7);
        assert_eq!(sw[0], 4.0);
        assert_eq!(sw[2], 0.0);
        assert!((sw[4] - 1.0e4).abs() < 1e-6);
        assert_eq!(sw[6], 0.0);
        let mask = coordinate_mask(&idx);
        assert_eq!(mask.sum(), 6.0);
    }
}
