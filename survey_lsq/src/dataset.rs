//! In-memory dataset consumed by the adjustment engine: control points,
//! instrument stations and measurement records.

use crate::angles::azimuth;
use crate::error::{AdjustError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::str::FromStr;

/// Sigma sentinel for a coordinate without control weight. In the
/// fixed-points style such a coordinate is not held at all: it stays an
/// unknown and moves freely with the observations.
pub const NO_WEIGHT_SIGMA: f64 = -1.0;

/// Coordinate axis of a control point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supported measurement types. The declaration order is the canonical row
/// order used when a record holds several values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MeasurementType {
    /// Slope distance.
    #[serde(rename = "sd")]
    SlopeDistance,
    /// Horizontal distance.
    #[serde(rename = "hd")]
    HorizontalDistance,
    /// Height difference.
    #[serde(rename = "vd")]
    VerticalDistance,
    #[serde(rename = "dx")]
    DeltaX,
    #[serde(rename = "dy")]
    DeltaY,
    #[serde(rename = "dz")]
    DeltaZ,
    #[serde(rename = "a")]
    Azimuth,
    /// Horizontal direction read against the station's arbitrary zero.
    #[serde(rename = "hz")]
    Direction,
    /// Zenith angle.
    #[serde(rename = "vz")]
    ZenithAngle,
    /// Elevation angle above the horizon.
    #[serde(rename = "vh")]
    VerticalAngle,
}

impl MeasurementType {
    pub const ALL: [MeasurementType; 10] = [
        MeasurementType::SlopeDistance,
        MeasurementType::HorizontalDistance,
        MeasurementType::VerticalDistance,
        MeasurementType::DeltaX,
        MeasurementType::DeltaY,
        MeasurementType::DeltaZ,
        MeasurementType::Azimuth,
        MeasurementType::Direction,
        MeasurementType::ZenithAngle,
        MeasurementType::VerticalAngle,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MeasurementType::SlopeDistance => "sd",
            MeasurementType::HorizontalDistance => "hd",
            MeasurementType::VerticalDistance => "vd",
            MeasurementType::DeltaX => "dx",
            MeasurementType::DeltaY => "dy",
            MeasurementType::DeltaZ => "dz",
            MeasurementType::Azimuth => "a",
            MeasurementType::Direction => "hz",
            MeasurementType::ZenithAngle => "vz",
            MeasurementType::VerticalAngle => "vh",
        }
    }

    /// Axes whose coordinates the observation equation needs.
    pub fn required_axes(self) -> &'static [Axis] {
        match self {
            MeasurementType::SlopeDistance
            | MeasurementType::ZenithAngle
            | MeasurementType::VerticalAngle => &[Axis::X, Axis::Y, Axis::Z],
            MeasurementType::HorizontalDistance
            | MeasurementType::Azimuth
            | MeasurementType::Direction => &[Axis::X, Axis::Y],
            MeasurementType::DeltaX => &[Axis::X],
            MeasurementType::DeltaY => &[Axis::Y],
            MeasurementType::VerticalDistance | MeasurementType::DeltaZ => &[Axis::Z],
        }
    }

    pub fn is_angular(self) -> bool {
        matches!(
            self,
            MeasurementType::Azimuth
                | MeasurementType::Direction
                | MeasurementType::ZenithAngle
                | MeasurementType::VerticalAngle
        )
    }
}

impl fmt::Display for MeasurementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MeasurementType {
    type Err = AdjustError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        MeasurementType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| AdjustError::InvalidConfig(format!("unknown measurement type '{s}'")))
    }
}

/// Network reference point with up to three coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlPoint {
    pub id: String,
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
    #[serde(default)]
    pub z: Option<f64>,
    #[serde(default)]
    pub sx: Option<f64>,
    #[serde(default)]
    pub sy: Option<f64>,
    #[serde(default)]
    pub sz: Option<f64>,
}

impl ControlPoint {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            x: None,
            y: None,
            z: None,
            sx: None,
            sy: None,
            sz: None,
        }
    }

    /// Creates a planar point.
    pub fn xy(id: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            ..Self::new(id)
        }
    }

    /// Creates a point with all three coordinates.
    pub fn xyz(id: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            z: Some(z),
            ..Self::new(id)
        }
    }

    /// Creates a height-only point.
    pub fn height(id: impl Into<String>, z: f64) -> Self {
        Self {
            z: Some(z),
            ..Self::new(id)
        }
    }

    /// Sets the same sigma on every axis.
    pub fn with_sigma(mut self, sigma: f64) -> Self {
        self.sx = Some(sigma);
        self.sy = Some(sigma);
        self.sz = Some(sigma);
        self
    }

    /// Marks the point as carrying no control weight.
    pub fn without_weight(self) -> Self {
        self.with_sigma(NO_WEIGHT_SIGMA)
    }

    /// Returns the coordinate on `axis` if it is present and finite.
    pub fn coordinate(&self, axis: Axis) -> Option<f64> {
        let value = match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        };
        value.filter(|v| v.is_finite())
    }

    pub fn set_coordinate(&mut self, axis: Axis, value: f64) {
        let slot = match axis {
            Axis::X => &mut self.x,
            Axis::Y => &mut self.y,
            Axis::Z => &mut self.z,
        };
        *slot = Some(value);
    }

    pub fn sigma(&self, axis: Axis) -> Option<f64> {
        let value = match axis {
            Axis::X => self.sx,
            Axis::Y => self.sy,
            Axis::Z => self.sz,
        };
        value.filter(|v| !v.is_nan())
    }

    /// Coordinates as an array indexed by [`Axis::index`].
    pub fn coordinates(&self) -> [Option<f64>; 3] {
        Axis::ALL.map(|axis| self.coordinate(axis))
    }
}

/// Instrument setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    /// Primary key referenced by measurement records.
    pub key: String,
    /// Id of the control point the instrument stands on.
    pub point: String,
    /// Instrument height.
    #[serde(default)]
    pub height: f64,
    #[serde(default)]
    pub height_sigma: Option<f64>,
    /// Orientation constant of horizontal directions, in radians.
    #[serde(default)]
    pub orientation: Option<f64>,
}

impl Station {
    pub fn new(key: impl Into<String>, point: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            point: point.into(),
            height: 0.0,
            height_sigma: None,
            orientation: None,
        }
    }

    pub fn with_height(mut self, height: f64) -> Self {
        self.height = height;
        self
    }
}

/// Values observed from one station to one target at one target height.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub station: String,
    pub target: String,
    #[serde(default)]
    pub target_height: f64,
    #[serde(default)]
    pub values: BTreeMap<MeasurementType, f64>,
    #[serde(default)]
    pub sigmas: BTreeMap<MeasurementType, f64>,
}

impl Measurement {
    pub fn new(station: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            station: station.into(),
            target: target.into(),
            target_height: 0.0,
            values: BTreeMap::new(),
            sigmas: BTreeMap::new(),
        }
    }

    pub fn with_target_height(mut self, height: f64) -> Self {
        self.target_height = height;
        self
    }

    /// Adds a measured value.
    pub fn with(mut self, kind: MeasurementType, value: f64) -> Self {
        self.values.insert(kind, value);
        self
    }

    /// Adds a measured value with its own sigma.
    pub fn with_sigma(mut self, kind: MeasurementType, value: f64, sigma: f64) -> Self {
        self.values.insert(kind, value);
        self.sigmas.insert(kind, sigma);
        self
    }

    /// Iterates over finite values in canonical type order.
    pub fn readings(&self) -> impl Iterator<Item = (MeasurementType, f64)> + '_ {
        self.values
            .iter()
            .filter(|(_, v)| v.is_finite())
            .map(|(k, v)| (*k, *v))
    }

    pub fn value(&self, kind: MeasurementType) -> Option<f64> {
        self.values.get(&kind).copied().filter(|v| v.is_finite())
    }

    pub fn sigma(&self, kind: MeasurementType) -> Option<f64> {
        self.sigmas.get(&kind).copied().filter(|v| !v.is_nan())
    }
}

/// Complete adjustment input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub controls: Vec<ControlPoint>,
    pub stations: Vec<Station>,
    pub measurements: Vec<Measurement>,
}

impl Dataset {
    pub fn new(
        controls: Vec<ControlPoint>,
        stations: Vec<Station>,
        measurements: Vec<Measurement>,
    ) -> Self {
        Self {
            controls,
            stations,
            measurements,
        }
    }

    /// Reads a dataset from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let dataset: Dataset = serde_json::from_reader(BufReader::new(file))?;
        Ok(dataset)
    }

    /// Writes the dataset as pretty printed JSON.
    pub fn to_json_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    /// Checks that ids and keys are unique, that every reference resolves
    /// and that there is something to adjust.
    pub fn validate(&self) -> Result<()> {
        let mut points: HashMap<&str, &ControlPoint> = HashMap::new();
        for point in &self.controls {
            if points.insert(point.id.as_str(), point).is_some() {
                return Err(AdjustError::DuplicatePoint(point.id.clone()));
            }
        }
        let mut stations: HashMap<&str, &Station> = HashMap::new();
        for station in &self.stations {
            if stations.insert(station.key.as_str(), station).is_some() {
                return Err(AdjustError::DuplicateStation(station.key.clone()));
            }
        }

        for station in &self.stations {
            if !points.contains_key(station.point.as_str()) {
                return Err(AdjustError::UnknownPoint(station.point.clone()));
            }
        }
        for record in &self.measurements {
            if !stations.contains_key(record.station.as_str()) {
                return Err(AdjustError::UnknownStation(record.station.clone()));
            }
            if !points.contains_key(record.target.as_str()) {
                return Err(AdjustError::UnknownPoint(record.target.clone()));
            }
        }
        if self.n_measurements() == 0 {
            return Err(AdjustError::EmptyDataset);
        }
        Ok(())
    }

    pub fn control(&self, id: &str) -> Option<&ControlPoint> {
        self.controls.iter().find(|c| c.id == id)
    }

    /// Number of finite measurement values, i.e. rows of the design matrix.
    pub fn n_measurements(&self) -> usize {
        self.measurements.iter().map(|m| m.readings().count()).sum()
    }

    /// Axes with at least one finite coordinate, in x, y, z order.
    pub fn present_axes(&self) -> Vec<Axis> {
        Axis::ALL
            .into_iter()
            .filter(|axis| self.controls.iter().any(|c| c.coordinate(*axis).is_some()))
            .collect()
    }

    /// Measurement types with at least one finite value.
    pub fn present_measurement_types(&self) -> BTreeSet<MeasurementType> {
        self.measurements
            .iter()
            .flat_map(|m| m.readings().map(|(kind, _)| kind))
            .collect()
    }

    /// Rough in-memory footprint used to pick a matrix build strategy.
    pub fn approx_size_bytes(&self) -> usize {
        let controls: usize = self
            .controls
            .iter()
            .map(|c| std::mem::size_of::<ControlPoint>() + c.id.capacity())
            .sum();
        let stations: usize = self
            .stations
            .iter()
            .map(|s| std::mem::size_of::<Station>() + s.key.capacity() + s.point.capacity())
            .sum();
        // a BTreeMap entry costs roughly key + value + node overhead
        let entry = std::mem::size_of::<MeasurementType>() + std::mem::size_of::<f64>() + 16;
        let measurements: usize = self
            .measurements
            .iter()
            .map(|m| {
                std::mem::size_of::<Measurement>()
                    + m.station.capacity()
                    + m.target.capacity()
                    + (m.values.len() + m.sigmas.len()) * entry
            })
            .sum();
        controls + stations + measurements
    }

    /// Recomputes the orientation constant of every station that has
    /// horizontal-direction readings from its first reading and the current
    /// coordinates. Other stations are reset to `None`.
    pub fn update_orientations(&mut self) -> Result<()> {
        let mut first: HashMap<&str, (&str, f64)> = HashMap::new();
        for record in &self.measurements {
            if let Some(hz) = record.value(MeasurementType::Direction) {
                first
                    .entry(record.station.as_str())
                    .or_insert((record.target.as_str(), hz));
            }
        }

        let mut orientations = Vec::with_capacity(self.stations.len());
        for station in &self.stations {
            let orientation = match first.get(station.key.as_str()) {
                Some(&(target, hz)) => {
                    let from = self
                        .control(&station.point)
                        .ok_or_else(|| AdjustError::UnknownPoint(station.point.clone()))?;
                    let to = self
                        .control(target)
                        .ok_or_else(|| AdjustError::UnknownPoint(target.to_string()))?;
                    let (dx, dy) = planar_difference(from, to)?;
                    Some(azimuth(dx, dy) - hz)
                }
                None => None,
            };
            orientations.push(orientation);
        }

        for (station, orientation) in self.stations.iter_mut().zip(orientations) {
            station.orientation = orientation;
        }
        Ok(())
    }
}

fn planar_difference(from: &ControlPoint, to: &ControlPoint) -> Result<(f64, f64)> {
    let get = |p: &ControlPoint, axis| {
        p.coordinate(axis).ok_or_else(|| AdjustError::MissingCoordinate {
            point: p.id.clone(),
            axis,
        })
    };
    Ok((
        get(to, Axis::X)? - get(from, Axis::X)?,
        get(to, Axis::Y)? - get(from, Axis::Y)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    fn sample() -> Dataset {
        Dataset::new(
            vec![
                ControlPoint::xy("A", 0.0, 0.0),
                ControlPoint::xy("B", 0.0, 10.0),
                ControlPoint::xy("C", 10.0, 0.0),
            ],
            vec![Station::new("S1", "A"), Station::new("S2", "B")],
            vec![
                Measurement::new("S1", "B")
                    .with(MeasurementType::Direction, 0.5)
                    .with(MeasurementType::HorizontalDistance, 10.0),
                Measurement::new("S1", "C").with(MeasurementType::Direction, 1.0),
                Measurement::new("S2", "C").with(MeasurementType::HorizontalDistance, f64::NAN),
            ],
        )
    }

    #[test]
    fn counts_only_finite_values() {
        let ds = sample();
        assert_eq!(ds.n_measurements(), 3);
        assert_eq!(ds.present_axes(), vec![Axis::X, Axis::Y]);
        let types = ds.present_measurement_types();
        assert!(types.contains(&MeasurementType::Direction));
        assert!(types.contains(&MeasurementType::HorizontalDistance));
        assert_eq!(types.len(), 2);
    }

    #[test]
    fn orientation_from_first_direction() {
        let mut ds = sample();
        ds.update_orientations().unwrap();
        let o = ds.stations[0].orientation.unwrap();
        assert!((o - (FRAC_PI_2 - 0.5)).abs() < 1e-12);
        assert!(ds.stations[1].orientation.is_none());
    }

    #[test]
    fn validate_catches_dangling_target() {
        let mut ds = sample();
        ds.measurements
            .push(Measurement::new("S1", "Q").with(MeasurementType::HorizontalDistance, 1.0));
        assert!(matches!(ds.validate(), Err(AdjustError::UnknownPoint(id)) if id == "Q"));
    }

    #[test]
    fn validate_rejects_duplicate_ids() {
        let mut ds = sample();
        ds.controls.push(ControlPoint::xy("C", 0.0, 10.0));
        assert!(matches!(ds.validate(), Err(AdjustError::DuplicatePoint(id)) if id == "C"));

        let mut ds = sample();
        ds.stations.push(Station::new("S2", "C"));
        assert!(matches!(ds.validate(), Err(AdjustError::DuplicateStation(key)) if key == "S2"));
    }

    #[test]
    fn json_file_round_trip() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut ds = sample();
        ds.measurements.pop();
        ds.to_json_file(file.path()).unwrap();
        let back = Dataset::from_json_file(file.path()).unwrap();
        assert_eq!(back, ds);
    }

    #[test]
    fn json_keys_use_short_codes() {
        let m = Measurement::new("S1", "B").with(MeasurementType::ZenithAngle, 1.5);
        let json = serde_json::to_string(&m).unwrap();
        assert!(json.contains("\"vz\":1.5"));
        let back: Measurement = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn nan_coordinate_is_absent() {
        let mut p = ControlPoint::xy("P", 1.0, 2.0);
        p.z = Some(f64::NAN);
        assert_eq!(p.coordinates(), [Some(1.0), Some(2.0), None]);
    }
}
