//! Weighting method selection for observations and for the free adjustment.

use crate::error::{AdjustError, Result};
use crate::robust::{Estimator, TuningConstants};
use log::warn;
use std::fmt;
use std::str::FromStr;

/// How a slot weights its entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Unit weights, no reweighting.
    Ordinary,
    /// Weights from sigmas, no reweighting.
    Weighted,
    /// Weights from sigmas, reweighted by an estimator between iterations.
    Robust(Estimator),
}

impl Method {
    pub fn estimator(self) -> Option<Estimator> {
        match self {
            Method::Robust(estimator) => Some(estimator),
            _ => None,
        }
    }

    /// Every accepted method name.
    pub fn names() -> impl Iterator<Item = &'static str> {
        ["ordinary", "weighted"].into_iter().chain(Estimator::names())
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Ordinary => f.write_str("ordinary"),
            Method::Weighted => f.write_str("weighted"),
            Method::Robust(estimator) => write!(f, "{estimator}"),
        }
    }
}

impl FromStr for Method {
    type Err = AdjustError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "ordinary" => Ok(Method::Ordinary),
            "weighted" => Ok(Method::Weighted),
            other => other.parse::<Estimator>().map(Method::Robust),
        }
    }
}

/// Parses a free-adjustment method name, where `none` selects the
/// fixed-points style.
pub fn parse_free_adjustment(s: &str) -> Result<Option<Method>> {
    match s.trim() {
        "none" | "" => Ok(None),
        other => other.parse().map(Some),
    }
}

/// Values fed back by the solver after every iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationFeedback {
    pub degrees_of_freedom: i64,
    pub residual_variance: f64,
    pub n_movable_tie_points: usize,
    pub coordinate_variance: f64,
}

impl Default for IterationFeedback {
    fn default() -> Self {
        Self {
            degrees_of_freedom: 0,
            residual_variance: 1.0,
            n_movable_tie_points: 0,
            coordinate_variance: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotKind {
    Observation,
    Free,
}

#[derive(Debug, Clone, PartialEq)]
struct Slot {
    kind: SlotKind,
    method: Option<Method>,
    constants: Option<TuningConstants>,
}

impl Slot {
    fn assign(&mut self, method: Option<Method>, overrides: Option<&TuningConstants>) {
        self.method = method;
        self.constants = match method.and_then(Method::estimator) {
            Some(estimator) => {
                let mut constants = estimator.default_constants();
                for (key, value) in overrides.into_iter().flatten() {
                    match constants.get_mut(key) {
                        Some(slot) => *slot = *value,
                        None => warn!("ignoring unknown tuning constant '{key}' for {estimator}"),
                    }
                }
                Some(constants)
            }
            None => {
                if overrides.is_some_and(|o| !o.is_empty()) {
                    warn!(
                        "ignoring tuning constants for non-robust method '{}'",
                        method.map_or_else(|| "none".to_string(), |m| m.to_string())
                    );
                }
                None
            }
        };
    }

    fn refresh(&mut self, feedback: &IterationFeedback) {
        let (Some(estimator), Some(constants)) =
            (self.method.and_then(Method::estimator), self.constants.as_mut())
        else {
            return;
        };
        match (estimator, self.kind) {
            (Estimator::T, SlotKind::Observation) => {
                constants.insert("k".into(), feedback.degrees_of_freedom as f64);
            }
            (Estimator::T, SlotKind::Free) => {
                constants.insert("k".into(), feedback.n_movable_tie_points as f64);
            }
            (Estimator::Cra, SlotKind::Observation) => {
                constants.insert("sigma_sq".into(), feedback.residual_variance);
            }
            (Estimator::Cra, SlotKind::Free) => {
                constants.insert("sigma_sq".into(), feedback.coordinate_variance);
            }
            _ => {}
        }
    }
}

/// Holds the observation method and the free-adjustment method together with
/// their tuning constants.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodManager {
    observation: Slot,
    free: Slot,
    /// Latest solver feedback; `None` until the first iteration.
    feedback: Option<IterationFeedback>,
}

impl Default for MethodManager {
    fn default() -> Self {
        Self::new(Method::Weighted, None)
    }
}

impl MethodManager {
    pub fn new(method: Method, free_adjustment: Option<Method>) -> Self {
        let mut manager = Self {
            observation: Slot {
                kind: SlotKind::Observation,
                method: None,
                constants: None,
            },
            free: Slot {
                kind: SlotKind::Free,
                method: None,
                constants: None,
            },
            feedback: None,
        };
        manager.set_method(method, None);
        manager.set_free_adjustment(free_adjustment, None);
        manager
    }

    /// Assigns the observation method. Robust estimators start from their
    /// default constants with `overrides` applied key by key; solver-driven
    /// constants are only replaced once an iteration has fed back.
    pub fn set_method(&mut self, method: Method, overrides: Option<&TuningConstants>) {
        self.observation.assign(Some(method), overrides);
        if let Some(feedback) = &self.feedback {
            self.observation.refresh(feedback);
        }
    }

    /// Assigns the free-adjustment method; `None` selects the fixed-points
    /// style.
    pub fn set_free_adjustment(
        &mut self,
        method: Option<Method>,
        overrides: Option<&TuningConstants>,
    ) {
        self.free.assign(method, overrides);
        if let Some(feedback) = &self.feedback {
            self.free.refresh(feedback);
        }
    }

    /// Parses and assigns the observation method by name.
    pub fn set_method_by_name(
        &mut self,
        name: &str,
        overrides: Option<&TuningConstants>,
    ) -> Result<()> {
        let method = name.parse()?;
        self.set_method(method, overrides);
        Ok(())
    }

    pub fn set_free_adjustment_by_name(
        &mut self,
        name: &str,
        overrides: Option<&TuningConstants>,
    ) -> Result<()> {
        let method = parse_free_adjustment(name)?;
        self.set_free_adjustment(method, overrides);
        Ok(())
    }

    /// Updates the solver-driven constants (`t.k`, `cra.sigma_sq`).
    pub fn refresh(&mut self, feedback: IterationFeedback) {
        self.feedback = Some(feedback);
        self.observation.refresh(&feedback);
        self.free.refresh(&feedback);
    }

    pub fn method(&self) -> Method {
        self.observation.method.unwrap_or(Method::Weighted)
    }

    pub fn free_adjustment(&self) -> Option<Method> {
        self.free.method
    }

    pub fn tuning_constants(&self) -> Option<&TuningConstants> {
        self.observation.constants.as_ref()
    }

    pub fn free_tuning_constants(&self) -> Option<&TuningConstants> {
        self.free.constants.as_ref()
    }

    /// Whether observation weights from sigmas enter the normal equations.
    pub fn uses_weights(&self) -> bool {
        self.method() != Method::Ordinary
    }

    /// Inner-constraints style: a weighted or robust free adjustment.
    pub fn uses_inner_constraints(&self) -> bool {
        matches!(self.free.method, Some(Method::Weighted | Method::Robust(_)))
    }

    /// Whether the control-point weights sW are built.
    pub fn uses_control_weights(&self) -> bool {
        !matches!(self.free.method, Some(Method::Ordinary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_method_is_rejected() {
        let mut manager = MethodManager::default();
        let err = manager.set_method_by_name("median", None).unwrap_err();
        assert!(matches!(err, AdjustError::InvalidMethod(name) if name == "median"));
        assert_eq!(manager.method(), Method::Weighted);
    }

    #[test]
    fn robust_method_gets_defaults_and_overrides() {
        let mut manager = MethodManager::default();
        let mut overrides = TuningConstants::new();
        overrides.insert("c".into(), 2.0);
        overrides.insert("zeta".into(), 7.0);
        manager.set_method(Method::Robust(Estimator::Huber), Some(&overrides));
        let constants = manager.tuning_constants().unwrap();
        assert_eq!(constants.get("c"), Some(&2.0));
        assert!(!constants.contains_key("zeta"));
    }

    #[test]
    fn switching_back_clears_constants() {
        let mut manager = MethodManager::new(Method::Robust(Estimator::Tukey), None);
        assert!(manager.tuning_constants().is_some());
        manager.set_method(Method::Ordinary, None);
        assert!(manager.tuning_constants().is_none());
        manager.set_method(Method::Robust(Estimator::Tukey), None);
        assert_eq!(manager.tuning_constants().unwrap().get("c"), Some(&4.685));
    }

    #[test]
    fn refresh_feeds_dynamic_constants_per_slot() {
        let mut manager = MethodManager::new(
            Method::Robust(Estimator::T),
            Some(Method::Robust(Estimator::Cra)),
        );
        manager.refresh(IterationFeedback {
            degrees_of_freedom: 7,
            residual_variance: 2.5,
            n_movable_tie_points: 4,
            coordinate_variance: 0.25,
        });
        assert_eq!(manager.tuning_constants().unwrap().get("k"), Some(&7.0));
        assert_eq!(
            manager.free_tuning_constants().unwrap().get("sigma_sq"),
            Some(&0.25)
        );

        manager.set_method(Method::Robust(Estimator::Cra), None);
        assert_eq!(manager.tuning_constants().unwrap().get("sigma_sq"), Some(&2.5));
        manager.set_free_adjustment(Some(Method::Robust(Estimator::T)), None);
        assert_eq!(manager.free_tuning_constants().unwrap().get("k"), Some(&4.0));
    }

    #[test]
    fn override_of_solver_driven_constant_survives_until_refresh() {
        let mut manager = MethodManager::default();
        let mut overrides = TuningConstants::new();
        overrides.insert("k".into(), 12.0);
        manager.set_method(Method::Robust(Estimator::T), Some(&overrides));
        assert_eq!(manager.tuning_constants().unwrap().get("k"), Some(&12.0));

        manager.refresh(IterationFeedback {
            degrees_of_freedom: 3,
            ..IterationFeedback::default()
        });
        assert_eq!(manager.tuning_constants().unwrap().get("k"), Some(&3.0));
    }

    #[test]
    fn free_adjustment_styles() {
        let mut manager = MethodManager::default();
        assert!(manager.uses_control_weights());
        assert!(!manager.uses_inner_constraints());
        manager.set_free_adjustment_by_name("ordinary", None).unwrap();
        assert!(!manager.uses_control_weights());
        manager.set_free_adjustment_by_name("huber", None).unwrap();
        assert!(manager.uses_inner_constraints());
        manager.set_free_adjustment_by_name("none", None).unwrap();
        assert_eq!(manager.free_adjustment(), None);
    }
}
