//! Sub-pixel refinement of strip edges and quadratic pixel correction.
//!
//! [`fit_edge`] and [`fit_peak`] refine the integer edge pixels found by
//! threshold scanning with a Levenberg-Marquardt fit of a smooth profile
//! model. [`correct_tube`] then maps pixel indices to positions along the
//! tube through a quadratic fitted against the known strip edges.

mod error;
mod fitter;
mod model;
mod polynomial;
mod solver;

pub use error::FitError;
pub use fitter::{fit_edge, fit_peak, mean_resolution, FitMode, FitParams, PeakFit, MIN_RESOLUTION};
pub use model::{FittedModel, FlatTopPeak, LogisticStep, ProfileModel};
pub use polynomial::{correct_tube, fit_quadratic, CorrectedPositions, Quadratic, MIN_PAIRS};
pub use solver::{fit_curve, SolveOptions, SolveReport};
