//! Robust M-estimator reweighting functions.
//!
//! Each estimator maps a normalized residual `v` to a weight multiplier,
//! generally in `[0, 1]`. The functions are element-wise and stateless:
//! `v = ±∞` gives 0, NaN gives 0, so fully rejected entries never poison a
//! weight vector.

use crate::error::{AdjustError, Result};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::f64::consts::{E, PI};
use std::fmt;
use std::str::FromStr;

/// Named tuning constants of an estimator, e.g. `c`, `n`, `k`.
pub type TuningConstants = BTreeMap<String, f64>;

/// Closed set of supported robust estimators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Estimator {
    Huber,
    Slope,
    Hampel,
    Danish,
    Epanechnikov,
    Tukey,
    Jacobi,
    Exponential,
    /// Choice rule of alternative, scaled by the previous iteration's variance.
    Cra,
    ErrorFunc,
    Cauchy,
    /// Student's t, driven by the current degrees of freedom.
    T,
    ChainBell,
    Chain,
    Andrews,
    Wave,
    HalfWave,
    Wigner,
    EllipseCurve,
    Trim,
}

/// Estimator name and its default constants.
struct EstimatorInfo {
    name: &'static str,
    defaults: &'static [(&'static str, f64)],
}

static ESTIMATORS: [(Estimator, EstimatorInfo); 20] = [
    (Estimator::Huber, EstimatorInfo { name: "huber", defaults: &[("c", 1.345)] }),
    (Estimator::Slope, EstimatorInfo { name: "slope", defaults: &[("c", 2.0), ("a", 2.0)] }),
    (
        Estimator::Hampel,
        EstimatorInfo { name: "hampel", defaults: &[("a", 1.7), ("b", 3.4), ("c", 8.5)] },
    ),
    (Estimator::Danish, EstimatorInfo { name: "danish", defaults: &[("c", 2.5)] }),
    (
        Estimator::Epanechnikov,
        EstimatorInfo { name: "epanechnikov", defaults: &[("c", 3.674), ("n", 2.0)] },
    ),
    (Estimator::Tukey, EstimatorInfo { name: "tukey", defaults: &[("c", 4.685), ("n", 2.0)] }),
    (Estimator::Jacobi, EstimatorInfo { name: "jacobi", defaults: &[("c", 4.687), ("n", 1.0)] }),
    (
        Estimator::Exponential,
        EstimatorInfo { name: "exponential", defaults: &[("c", 2.0), ("n", 2.0)] },
    ),
    (
        Estimator::Cra,
        EstimatorInfo { name: "cra", defaults: &[("c", 2.0), ("n", 2.0), ("sigma_sq", 1.0)] },
    ),
    (
        Estimator::ErrorFunc,
        EstimatorInfo { name: "error_func", defaults: &[("c", 1.414), ("n", 2.0)] },
    ),
    (Estimator::Cauchy, EstimatorInfo { name: "cauchy", defaults: &[("c", 2.385), ("n", 2.0)] }),
    (Estimator::T, EstimatorInfo { name: "t", defaults: &[("c", 1.0), ("n", 2.0), ("k", 1.0)] }),
    (
        Estimator::ChainBell,
        EstimatorInfo { name: "chain_bell", defaults: &[("c", 1.0), ("n", 1.0)] },
    ),
    (Estimator::Chain, EstimatorInfo { name: "chain", defaults: &[("c", 1.0)] }),
    (Estimator::Andrews, EstimatorInfo { name: "andrews", defaults: &[("c", 4.207)] }),
    (Estimator::Wave, EstimatorInfo { name: "wave", defaults: &[("c", 2.5)] }),
    (Estimator::HalfWave, EstimatorInfo { name: "half_wave", defaults: &[("c", 2.5)] }),
    (Estimator::Wigner, EstimatorInfo { name: "wigner", defaults: &[("c", 3.137)] }),
    (
        Estimator::EllipseCurve,
        EstimatorInfo { name: "ellipse_curve", defaults: &[("c", 2.5)] },
    ),
    (Estimator::Trim, EstimatorInfo { name: "trim", defaults: &[("c", 2.5)] }),
];

impl Estimator {
    pub const ALL: [Estimator; 20] = [
        Estimator::Huber,
        Estimator::Slope,
        Estimator::Hampel,
        Estimator::Danish,
        Estimator::Epanechnikov,
        Estimator::Tukey,
        Estimator::Jacobi,
        Estimator::Exponential,
        Estimator::Cra,
        Estimator::ErrorFunc,
        Estimator::Cauchy,
        Estimator::T,
        Estimator::ChainBell,
        Estimator::Chain,
        Estimator::Andrews,
        Estimator::Wave,
        Estimator::HalfWave,
        Estimator::Wigner,
        Estimator::EllipseCurve,
        Estimator::Trim,
    ];

    fn info(self) -> &'static EstimatorInfo {
        // ESTIMATORS is declared in the same order as the enum
        &ESTIMATORS[self as usize].1
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    /// Names of every estimator, in declaration order.
    pub fn names() -> impl Iterator<Item = &'static str> {
        Self::ALL.into_iter().map(Estimator::name)
    }

    /// Estimators whose weight equals 1 at `v = 0` and decays smoothly.
    pub fn is_bell(self) -> bool {
        matches!(
            self,
            Estimator::Epanechnikov
                | Estimator::Tukey
                | Estimator::Jacobi
                | Estimator::Exponential
                | Estimator::Cra
                | Estimator::ErrorFunc
                | Estimator::Cauchy
                | Estimator::T
                | Estimator::ChainBell
        )
    }

    pub fn default_constants(self) -> TuningConstants {
        self.info()
            .defaults
            .iter()
            .map(|(key, value)| (key.to_string(), *value))
            .collect()
    }

    fn constant(self, constants: &TuningConstants, key: &str) -> f64 {
        constants
            .get(key)
            .copied()
            .or_else(|| {
                self.info()
                    .defaults
                    .iter()
                    .find(|(k, _)| *k == key)
                    .map(|(_, v)| *v)
            })
            .unwrap_or(f64::NAN)
    }

    /// Weight multiplier for one normalized residual.
    pub fn weight(self, v: f64, constants: &TuningConstants) -> f64 {
        if v.is_nan() {
            return 0.0;
        }
        let v = v.abs();
        let c = self.constant(constants, "c");
        let w = match self {
            Estimator::Huber => {
                if v > c {
                    c / v
                } else {
                    1.0
                }
            }
            Estimator::Slope => {
                let a = self.constant(constants, "a");
                (1.0 + (c - v) / a).clamp(0.0, 1.0)
            }
            Estimator::Hampel => {
                let a = self.constant(constants, "a");
                let b = self.constant(constants, "b");
                if v > c {
                    0.0
                } else if v > b {
                    a / v * (c - v) / (c - b)
                } else if v > a {
                    a / v
                } else {
                    1.0
                }
            }
            Estimator::Danish => {
                if v > c {
                    (-v / c).exp()
                } else {
                    1.0
                }
            }
            Estimator::Epanechnikov => {
                let n = self.constant(constants, "n");
                if v <= c {
                    1.0 - (v / c).powf(n)
                } else {
                    0.0
                }
            }
            Estimator::Tukey => {
                let n = self.constant(constants, "n");
                if v <= c {
                    (1.0 - (v / c).powf(n)).powf(n)
                } else {
                    0.0
                }
            }
            Estimator::Jacobi => {
                let n = self.constant(constants, "n");
                if v <= c {
                    let u = (v / c).powf(n);
                    (1.0 - u).powf(n) * (1.0 + u).powf(n)
                } else {
                    0.0
                }
            }
            Estimator::Exponential => {
                let n = self.constant(constants, "n");
                (-(v / c).powf(n)).exp()
            }
            Estimator::Cra => {
                let n = self.constant(constants, "n");
                let sigma_sq = self.constant(constants, "sigma_sq");
                if v == 0.0 {
                    1.0
                } else if sigma_sq > 0.0 {
                    (-v.powf(n) / (sigma_sq * c)).exp()
                } else {
                    0.0
                }
            }
            Estimator::ErrorFunc => {
                let n = self.constant(constants, "n");
                1.0 - libm::erf((v / c).powf(n))
            }
            Estimator::Cauchy => {
                let n = self.constant(constants, "n");
                1.0 / (1.0 + (v / c).powf(n))
            }
            Estimator::T => {
                let n = self.constant(constants, "n");
                let k = self.constant(constants, "k");
                let k = if k > 0.0 { k } else { 1.0 };
                (1.0 + v.powf(n) / (c * k)).powf(-(k + 1.0) / 2.0)
            }
            Estimator::ChainBell => {
                let n = self.constant(constants, "n");
                1.0 / (v.powf(n) * E / (2.0 * c)).cosh()
            }
            Estimator::Chain => (2.0 - (v * E / (2.0 * c)).cosh()).max(0.0),
            Estimator::Andrews => {
                if v <= c {
                    sinc(v / c)
                } else {
                    0.0
                }
            }
            Estimator::Wave => {
                if v <= c {
                    ((v * PI / c).cos() + 1.0) / 2.0
                } else {
                    0.0
                }
            }
            Estimator::HalfWave => {
                if v <= c {
                    (v * PI / (2.0 * c)).cos()
                } else {
                    0.0
                }
            }
            Estimator::Wigner => {
                if v <= c {
                    (1.0 - (v / c).powi(2)).sqrt()
                } else {
                    0.0
                }
            }
            Estimator::EllipseCurve => {
                let c2 = 2.0 * c;
                if v <= c {
                    (1.0 + (1.0 - (v / c).powi(2)).sqrt()) / 2.0
                } else if v <= c2 {
                    (1.0 - (1.0 - ((v - c2) / c).powi(2)).sqrt()) / 2.0
                } else {
                    0.0
                }
            }
            Estimator::Trim => {
                if v <= c {
                    1.0
                } else {
                    0.0
                }
            }
        };
        if w.is_nan() {
            0.0
        } else {
            w
        }
    }

    /// Element-wise [`Estimator::weight`].
    pub fn weights(self, v: &DVector<f64>, constants: &TuningConstants) -> DVector<f64> {
        v.map(|x| self.weight(x, constants))
    }
}

/// Normalized sinc, `sin(πx) / (πx)`.
fn sinc(x: f64) -> f64 {
    if x == 0.0 {
        1.0
    } else {
        (PI * x).sin() / (PI * x)
    }
}

impl fmt::Display for Estimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Estimator {
    type Err = AdjustError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        Estimator::ALL
            .into_iter()
            .find(|e| e.name() == s)
            .ok_or_else(|| AdjustError::InvalidMethod(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn info_table_matches_declaration_order() {
        for (i, (estimator, info)) in ESTIMATORS.iter().enumerate() {
            assert_eq!(*estimator as usize, i);
            assert_eq!(estimator.name(), info.name);
        }
    }

    #[test]
    fn huber_downweights_beyond_c() {
        let c = Estimator::Huber.default_constants();
        assert_eq!(Estimator::Huber.weight(1.0, &c), 1.0);
        assert_relative_eq!(Estimator::Huber.weight(-2.69, &c), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn hampel_three_parts() {
        let c = Estimator::Hampel.default_constants();
        assert_eq!(Estimator::Hampel.weight(1.0, &c), 1.0);
        assert_relative_eq!(Estimator::Hampel.weight(2.0, &c), 0.85, epsilon = 1e-12);
        let expected = 1.7 / 5.0 * (8.5 - 5.0) / (8.5 - 3.4);
        assert_relative_eq!(Estimator::Hampel.weight(5.0, &c), expected, epsilon = 1e-12);
        assert_eq!(Estimator::Hampel.weight(9.0, &c), 0.0);
    }

    #[test]
    fn andrews_uses_normalized_sinc() {
        let c = Estimator::Andrews.default_constants();
        let v = 4.207 / 2.0;
        assert_relative_eq!(Estimator::Andrews.weight(v, &c), 2.0 / PI, epsilon = 1e-12);
    }

    #[test]
    fn cra_without_variance_rejects_nonzero() {
        let mut c = Estimator::Cra.default_constants();
        c.insert("sigma_sq".into(), 0.0);
        assert_eq!(Estimator::Cra.weight(0.0, &c), 1.0);
        assert_eq!(Estimator::Cra.weight(0.1, &c), 0.0);
    }

    #[test]
    fn t_with_nonpositive_k_uses_one() {
        let mut c = Estimator::T.default_constants();
        c.insert("k".into(), -3.0);
        let expected = (1.0_f64 + 4.0).powf(-1.0);
        assert_relative_eq!(Estimator::T.weight(2.0, &c), expected, epsilon = 1e-12);
    }

    #[test]
    fn nan_maps_to_zero() {
        for estimator in Estimator::ALL {
            let c = estimator.default_constants();
            assert_eq!(estimator.weight(f64::NAN, &c), 0.0, "{estimator}");
        }
    }

    #[test]
    fn parse_names() {
        assert_eq!("half_wave".parse::<Estimator>().unwrap(), Estimator::HalfWave);
        assert!(matches!(
            "lorentz".parse::<Estimator>(),
            Err(AdjustError::InvalidMethod(_))
        ));
        assert_eq!(Estimator::names().count(), 20);
    }
}
