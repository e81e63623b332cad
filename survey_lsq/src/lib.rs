//! Least-squares adjustment of surveying control networks.
//!
//! A [`Dataset`] of control points, stations and measurements is linearized
//! into a design matrix, solved iteratively with a pseudo-inverse and
//! optionally reweighted by robust estimators. Free networks are handled
//! with inner constraints.

pub mod angles;
pub mod config;
pub mod dataset;
pub mod error;
pub mod indexer;
pub mod linalg;
pub mod matrices;
pub mod methods;
pub mod observation;
pub mod robust;
pub mod solver;

pub use config::{SigmaConfig, SigmaConfigSet, SolverConfig};
pub use dataset::{Axis, ControlPoint, Dataset, Measurement, MeasurementType, Station, NO_WEIGHT_SIGMA};
pub use error::{AdjustError, Result};
pub use matrices::BuildStrategy;
pub use methods::{Method, MethodManager};
pub use robust::Estimator;
pub use solver::{AdjustmentResults, AdjustmentSettings, AdjustmentSummary, Solver, SolverStatus};
