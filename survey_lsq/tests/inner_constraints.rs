use survey_lsq::indexer::CoordinateIndexer;
use survey_lsq::matrices::InnerConstraints;
use survey_lsq::{ControlPoint, Dataset, Measurement, MeasurementType, Station};

use MeasurementType::*;

fn build(ds: &Dataset) -> InnerConstraints {
    let indexer = CoordinateIndexer::new(ds);
    InnerConstraints::build(ds, &indexer)
}

#[test]
fn distance_triangle_needs_translation_and_rotation() {
    let ds = Dataset::new(
        vec![
            ControlPoint::xy("A", 0.0, 0.0),
            ControlPoint::xy("B", 100.0, 0.0),
            ControlPoint::xy("C", 50.0, 80.0),
        ],
        vec![Station::new("SA", "A"), Station::new("SB", "B")],
        vec![
            Measurement::new("SA", "B").with(HorizontalDistance, 100.0),
            Measurement::new("SA", "C").with(HorizontalDistance, 94.34),
            Measurement::new("SB", "C").with(HorizontalDistance, 94.34),
        ],
    );
    let ic = build(&ds);
    assert_eq!(ic.r.shape(), (3, 6));
    assert_eq!(ic.labels, vec!["translation x", "translation y", "rotate"]);
    // translation x touches only x-columns
    assert_eq!(ic.r.row(0).iter().copied().collect::<Vec<_>>(), vec![1.0, 0.0, 1.0, 0.0, 1.0, 0.0]);
    // rotation: +y at x-columns, -x at y-columns
    assert_eq!(ic.r[(2, 4)], 80.0);
    assert_eq!(ic.r[(2, 5)], -50.0);
    assert_eq!(ic.r[(2, 3)], -100.0);
}

#[test]
fn slope_distances_in_3d_leave_no_scale() {
    let ds = Dataset::new(
        vec![
            ControlPoint::xyz("A", 0.0, 0.0, 10.0),
            ControlPoint::xyz("B", 50.0, 10.0, 12.0),
        ],
        vec![Station::new("SA", "A")],
        vec![Measurement::new("SA", "B").with(SlopeDistance, 51.0)],
    );
    let ic = build(&ds);
    assert_eq!(
        ic.labels,
        vec!["translation x", "translation y", "translation z", "rotate"]
    );
    assert_eq!(ic.r.shape(), (4, 6));
}

#[test]
fn angles_only_in_3d_get_3d_scale() {
    let ds = Dataset::new(
        vec![
            ControlPoint::xyz("A", 0.0, 0.0, 10.0),
            ControlPoint::xyz("B", 50.0, 10.0, 12.0),
            ControlPoint::xyz("C", 20.0, 40.0, 9.0),
        ],
        vec![Station::new("SA", "A")],
        vec![
            Measurement::new("SA", "B").with(Direction, 0.0),
            Measurement::new("SA", "C").with(Direction, 1.0),
        ],
    );
    let ic = build(&ds);
    // 2D scale comes first in the selection order and still applies here
    assert_eq!(ic.labels.last().map(String::as_str), Some("2D scale"));

    let ds_vz = Dataset::new(
        ds.controls.clone(),
        ds.stations.clone(),
        vec![
            Measurement::new("SA", "B").with(Direction, 0.0).with(ZenithAngle, 1.5),
            Measurement::new("SA", "C").with(Direction, 1.0),
        ],
    );
    let ic = build(&ds_vz);
    assert_eq!(ic.labels.last().map(String::as_str), Some("3D scale"));
    let scale = ic.r.row(ic.r.nrows() - 1);
    assert_eq!(scale[2], 10.0);
}

#[test]
fn azimuth_fixes_rotation() {
    let ds = Dataset::new(
        vec![ControlPoint::xy("A", 0.0, 0.0), ControlPoint::xy("B", 30.0, 40.0)],
        vec![Station::new("SA", "A")],
        vec![Measurement::new("SA", "B")
            .with(Azimuth, 0.927)
            .with(HorizontalDistance, 50.0)],
    );
    let ic = build(&ds);
    assert_eq!(ic.labels, vec!["translation x", "translation y"]);
}

#[test]
fn gnss_vectors_leave_translation_only() {
    let ds = Dataset::new(
        vec![
            ControlPoint::xyz("A", 0.0, 0.0, 0.0),
            ControlPoint::xyz("B", 30.0, 40.0, 5.0),
        ],
        vec![Station::new("SA", "A")],
        vec![Measurement::new("SA", "B")
            .with(DeltaX, 30.0)
            .with(DeltaY, 40.0)
            .with(DeltaZ, 5.0)],
    );
    let ic = build(&ds);
    assert_eq!(ic.r.nrows(), 3);
    assert!(ic.labels.iter().all(|l| l.starts_with("translation")));
}

#[test]
fn degenerate_rows_are_dropped() {
    let ds = Dataset::new(
        vec![ControlPoint::xy("A", 0.0, 0.0), ControlPoint::xy("B", 0.0, 0.0)],
        vec![Station::new("SA", "A")],
        vec![Measurement::new("SA", "B").with(Direction, 0.0)],
    );
    let ic = build(&ds);
    assert_eq!(ic.labels, vec!["translation x", "translation y"]);
    assert_eq!(ic.r.shape(), (2, 4));
}
