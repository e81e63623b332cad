//! Solver and default-sigma configuration.

use crate::angles::AngleUnit;
use crate::dataset::{Axis, MeasurementType};
use crate::error::{AdjustError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Combined size of controls, stations and measurements above which the
/// memory-safe build strategy is chosen automatically.
pub const MEMORY_THRESHOLD_BYTES: usize = 1 << 30;

/// Name of the built-in sigma row.
pub const DEFAULT_SIGMA_INDEX: &str = "default";

/// Stopping rules of the iteration loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Largest absolute coordinate increment accepted as converged.
    pub threshold: f64,
    pub max_iter: usize,
}

impl SolverConfig {
    pub fn new(threshold: f64, max_iter: usize) -> Result<Self> {
        let config = Self {
            threshold,
            max_iter,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.threshold.is_finite() && self.threshold > 0.0) {
            return Err(AdjustError::InvalidConfig(format!(
                "threshold must be a positive number, got {}",
                self.threshold
            )));
        }
        if self.max_iter == 0 {
            return Err(AdjustError::InvalidConfig(
                "max_iter must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            threshold: 0.001,
            max_iter: 100,
        }
    }
}

/// Fallback 1-sigma values used when a measurement or a control coordinate
/// carries no sigma of its own. Angular values are in radians.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SigmaConfig {
    pub sd: f64,
    pub hd: f64,
    pub vd: f64,
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
    pub a: f64,
    pub hz: f64,
    pub vz: f64,
    pub vh: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Default for SigmaConfig {
    fn default() -> Self {
        let angle = AngleUnit::Gon.to_rad(0.0020);
        Self {
            sd: 0.01,
            hd: 0.01,
            vd: 0.01,
            dx: 0.001,
            dy: 0.001,
            dz: 0.001,
            a: angle,
            hz: angle,
            vz: angle,
            vh: angle,
            x: 0.01,
            y: 0.01,
            z: 0.01,
        }
    }
}

impl SigmaConfig {
    pub fn measurement(&self, kind: MeasurementType) -> f64 {
        match kind {
            MeasurementType::SlopeDistance => self.sd,
            MeasurementType::HorizontalDistance => self.hd,
            MeasurementType::VerticalDistance => self.vd,
            MeasurementType::DeltaX => self.dx,
            MeasurementType::DeltaY => self.dy,
            MeasurementType::DeltaZ => self.dz,
            MeasurementType::Azimuth => self.a,
            MeasurementType::Direction => self.hz,
            MeasurementType::ZenithAngle => self.vz,
            MeasurementType::VerticalAngle => self.vh,
        }
    }

    pub fn coordinate(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let values = MeasurementType::ALL
            .into_iter()
            .map(|kind| (kind.as_str(), self.measurement(kind)))
            .chain(Axis::ALL.into_iter().map(|axis| (axis.as_str(), self.coordinate(axis))));
        for (name, value) in values {
            if !(value.is_finite() && value > 0.0) {
                return Err(AdjustError::InvalidConfig(format!(
                    "default sigma '{name}' must be positive, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Returns a copy with `overrides` applied. Keys are measurement type
    /// codes or axis names; angular values are given in `unit`.
    pub fn with_overrides(&self, overrides: &BTreeMap<String, f64>, unit: AngleUnit) -> Result<Self> {
        let mut row = *self;
        for (key, value) in overrides {
            if let Ok(kind) = key.parse::<MeasurementType>() {
                let value = if kind.is_angular() { unit.to_rad(*value) } else { *value };
                *row.measurement_mut(kind) = value;
                continue;
            }
            let slot = match key.as_str() {
                "x" => &mut row.x,
                "y" => &mut row.y,
                "z" => &mut row.z,
                other => {
                    return Err(AdjustError::InvalidConfig(format!(
                        "unknown sigma key '{other}'"
                    )))
                }
            };
            *slot = *value;
        }
        row.validate()?;
        Ok(row)
    }

    fn measurement_mut(&mut self, kind: MeasurementType) -> &mut f64 {
        match kind {
            MeasurementType::SlopeDistance => &mut self.sd,
            MeasurementType::HorizontalDistance => &mut self.hd,
            MeasurementType::VerticalDistance => &mut self.vd,
            MeasurementType::DeltaX => &mut self.dx,
            MeasurementType::DeltaY => &mut self.dy,
            MeasurementType::DeltaZ => &mut self.dz,
            MeasurementType::Azimuth => &mut self.a,
            MeasurementType::Direction => &mut self.hz,
            MeasurementType::ZenithAngle => &mut self.vz,
            MeasurementType::VerticalAngle => &mut self.vh,
        }
    }
}

/// Named collection of sigma rows with one designated default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SigmaConfigSet {
    default_index: String,
    rows: BTreeMap<String, SigmaConfig>,
}

impl Default for SigmaConfigSet {
    fn default() -> Self {
        let mut rows = BTreeMap::new();
        rows.insert(DEFAULT_SIGMA_INDEX.to_string(), SigmaConfig::default());
        Self {
            default_index: DEFAULT_SIGMA_INDEX.to_string(),
            rows,
        }
    }
}

impl SigmaConfigSet {
    /// Reads a set from JSON. The built-in default row is always present.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let mut set: SigmaConfigSet = serde_json::from_reader(BufReader::new(file))?;
        set.rows
            .entry(DEFAULT_SIGMA_INDEX.to_string())
            .or_default();
        for row in set.rows.values() {
            row.validate()?;
        }
        if !set.rows.contains_key(&set.default_index) {
            return Err(AdjustError::UnknownSigmaConfig(set.default_index));
        }
        Ok(set)
    }

    pub fn default_index(&self) -> &str {
        &self.default_index
    }

    pub fn set_default_index(&mut self, name: &str) -> Result<()> {
        if !self.rows.contains_key(name) {
            return Err(AdjustError::UnknownSigmaConfig(name.to_string()));
        }
        self.default_index = name.to_string();
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(String::as_str)
    }

    /// Looks up a row by name, or the default row when `name` is `None`.
    pub fn get(&self, name: Option<&str>) -> Result<&SigmaConfig> {
        let name = name.unwrap_or(&self.default_index);
        self.rows
            .get(name)
            .ok_or_else(|| AdjustError::UnknownSigmaConfig(name.to_string()))
    }

    /// Adds a row built from the current default row and `overrides`.
    pub fn append(
        &mut self,
        name: &str,
        overrides: &BTreeMap<String, f64>,
        unit: AngleUnit,
    ) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AdjustError::InvalidConfig("sigma row name is empty".into()));
        }
        if self.rows.contains_key(name) {
            return Err(AdjustError::InvalidConfig(format!(
                "sigma row '{name}' already exists"
            )));
        }
        let row = self.get(None)?.with_overrides(overrides, unit)?;
        self.rows.insert(name.to_string(), row);
        Ok(())
    }

    /// Removes a row. The built-in default row cannot be removed; removing
    /// the designated default resets the designation to the built-in row.
    pub fn remove(&mut self, name: &str) -> Result<SigmaConfig> {
        if name == DEFAULT_SIGMA_INDEX {
            return Err(AdjustError::InvalidConfig(
                "the built-in default sigma row cannot be removed".into(),
            ));
        }
        let row = self
            .rows
            .remove(name)
            .ok_or_else(|| AdjustError::UnknownSigmaConfig(name.to_string()))?;
        if self.default_index == name {
            log::warn!("removed the default sigma row '{name}', falling back to '{DEFAULT_SIGMA_INDEX}'");
            self.default_index = DEFAULT_SIGMA_INDEX.to_string();
        }
        Ok(row)
    }

    /// Restores the built-in default row to its initial values.
    pub fn restore_default(&mut self) {
        self.rows
            .insert(DEFAULT_SIGMA_INDEX.to_string(), SigmaConfig::default());
    }
}
