//! Linearized observation equations.
//!
//! Every function takes the observed value and the current station to target
//! differences `d = target - station` and returns the coefficients of the
//! design-matrix row together with the free term (observed minus computed).
//! Coefficients are ordered station first, then target, axis by axis.

use crate::angles::{azimuth as grid_azimuth, normalize_angle};

/// One linearized observation: row coefficients and free term.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Linearized<const N: usize> {
    pub coefficients: [f64; N],
    pub free_term: f64,
}

/// Slope distance. Coefficients `[x, y, z]` of station then target.
pub fn slope_distance(observed: f64, dx: f64, dy: f64, dz: f64) -> Linearized<6> {
    let d = (dx * dx + dy * dy + dz * dz).sqrt();
    let (cx, cy, cz) = (dx / d, dy / d, dz / d);
    Linearized {
        coefficients: [-cx, -cy, -cz, cx, cy, cz],
        free_term: observed - d,
    }
}

/// Horizontal distance. Coefficients `[x, y]` of station then target.
pub fn horizontal_distance(observed: f64, dx: f64, dy: f64) -> Linearized<4> {
    let d = dx.hypot(dy);
    let (cx, cy) = (dx / d, dy / d);
    Linearized {
        coefficients: [-cx, -cy, cx, cy],
        free_term: observed - d,
    }
}

/// Coordinate difference along one axis (dx, dy, dz and height
/// differences). Coefficients `[station, target]`.
pub fn coordinate_difference(observed: f64, d: f64) -> Linearized<2> {
    Linearized {
        coefficients: [-1.0, 1.0],
        free_term: observed - d,
    }
}

fn azimuth_partials(dx: f64, dy: f64) -> [f64; 4] {
    let d2 = dx * dx + dy * dy;
    [dy / d2, -dx / d2, -dy / d2, dx / d2]
}

/// Grid azimuth. Coefficients `[x, y]` of station then target.
pub fn azimuth(observed: f64, dx: f64, dy: f64) -> Linearized<4> {
    Linearized {
        coefficients: azimuth_partials(dx, dy),
        free_term: normalize_angle(observed - grid_azimuth(dx, dy)),
    }
}

/// Horizontal direction read against the station's orientation constant,
/// modelled as `azimuth - orientation`. Coefficients `[x, y]` of station,
/// `[x, y]` of target, then the orientation unknown.
pub fn direction(observed: f64, dx: f64, dy: f64, orientation: f64) -> Linearized<5> {
    let [xs, ys, xt, yt] = azimuth_partials(dx, dy);
    Linearized {
        coefficients: [xs, ys, xt, yt, -1.0],
        free_term: normalize_angle(observed - grid_azimuth(dx, dy) + orientation),
    }
}

fn zenith_partials(dx: f64, dy: f64, dz: f64) -> [f64; 6] {
    let hd = dx.hypot(dy);
    let sd2 = dx * dx + dy * dy + dz * dz;
    let xs = -dx * dz / (hd * sd2);
    let ys = -dy * dz / (hd * sd2);
    let zs = hd / sd2;
    [xs, ys, zs, -xs, -ys, -zs]
}

/// Zenith angle. Coefficients `[x, y, z]` of station then target.
pub fn zenith_angle(observed: f64, dx: f64, dy: f64, dz: f64) -> Linearized<6> {
    let computed = dx.hypot(dy).atan2(dz);
    Linearized {
        coefficients: zenith_partials(dx, dy, dz),
        free_term: normalize_angle(observed - computed),
    }
}

/// Elevation angle above the horizon. Coefficients `[x, y, z]` of station
/// then target.
pub fn vertical_angle(observed: f64, dx: f64, dy: f64, dz: f64) -> Linearized<6> {
    let computed = dz.atan2(dx.hypot(dy));
    Linearized {
        coefficients: zenith_partials(dx, dy, dz).map(|c| -c),
        free_term: normalize_angle(observed - computed),
    }
}
