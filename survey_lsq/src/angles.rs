//! Angle helpers used by the observation equations and orientation constants.

use crate::error::{AdjustError, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};
use std::fmt;
use std::str::FromStr;

/// Computes the azimuth in radians of the vector `(dx, dy)` measured from the
/// positive X (north) axis towards the positive Y (east) axis, in `[0, 2π)`.
pub fn azimuth(dx: f64, dy: f64) -> f64 {
    let a = dy.atan2(dx).rem_euclid(TAU);
    // rem_euclid can round up to exactly TAU for tiny negative inputs
    if a >= TAU {
        0.0
    } else {
        a
    }
}

/// Reduces an angle to `(-π, π]`.
pub fn normalize_angle(angle: f64) -> f64 {
    angle.sin().atan2(angle.cos())
}

/// Unit used to express angular values outside the engine. Internally every
/// angle is in radians.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AngleUnit {
    #[default]
    Rad,
    Deg,
    #[serde(alias = "grad")]
    Gon,
}

impl AngleUnit {
    /// Converts `angle` expressed in this unit to radians.
    pub fn to_rad(self, angle: f64) -> f64 {
        match self {
            AngleUnit::Rad => angle,
            AngleUnit::Deg => angle * PI / 180.0,
            AngleUnit::Gon => angle * PI / 200.0,
        }
    }

    /// Converts `angle` in radians to this unit.
    pub fn from_rad(self, angle: f64) -> f64 {
        match self {
            AngleUnit::Rad => angle,
            AngleUnit::Deg => angle * 180.0 / PI,
            AngleUnit::Gon => angle * 200.0 / PI,
        }
    }
}

impl FromStr for AngleUnit {
    type Err = AdjustError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rad" => Ok(AngleUnit::Rad),
            "deg" => Ok(AngleUnit::Deg),
            "gon" | "grad" => Ok(AngleUnit::Gon),
            other => Err(AdjustError::InvalidConfig(format!(
                "unknown angle unit '{other}'"
            ))),
        }
    }
}

impl fmt::Display for AngleUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AngleUnit::Rad => "rad",
            AngleUnit::Deg => "deg",
            AngleUnit::Gon => "gon",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn azimuth_quadrants() {
        assert!((azimuth(1.0, 1.0) - PI / 4.0).abs() < 1e-12);
        assert!((azimuth(0.0, 1.0) - FRAC_PI_2).abs() < 1e-12);
        assert!((azimuth(-1.0, 0.0) - PI).abs() < 1e-12);
        assert!((azimuth(0.0, -1.0) - 3.0 * FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn azimuth_is_never_full_turn() {
        let a = azimuth(1.0, -1e-300);
        assert!((0.0..TAU).contains(&a));
    }

    #[test]
    fn normalize_wraps_around() {
        assert!((normalize_angle(TAU - 0.1) + 0.1).abs() < 1e-12);
        assert!((normalize_angle(-TAU + 0.1) - 0.1).abs() < 1e-12);
        assert!((normalize_angle(0.3) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn gon_conversion() {
        assert!((AngleUnit::Gon.to_rad(200.0) - PI).abs() < 1e-12);
        assert!((AngleUnit::Deg.from_rad(PI) - 180.0).abs() < 1e-12);
        assert_eq!("grad".parse::<AngleUnit>().unwrap(), AngleUnit::Gon);
        assert!("turns".parse::<AngleUnit>().is_err());
    }
}
