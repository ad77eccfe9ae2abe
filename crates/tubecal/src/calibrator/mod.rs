//! Calibration orchestrator.
//!
//! Merges the strip measurements once, then runs edge detection, fitting,
//! quadratic correction and projection tube by tube. Per-tube results are
//! folded in tube order into one calibration table which is applied to the
//! bank in a single step.

mod error;
mod params;
mod pipeline;
mod report;
mod result;
mod stage;

pub use error::CalibrationError;
pub use params::{CalibrationParams, StripTilt};
pub use pipeline::TubeCalibrator;
pub use report::{CvalueRecord, CvalueReport};
pub use result::{CalibrationResult, CalibrationSummary, SkippedTube, TubeDiagnostics, TubeOutcome};
pub use stage::{Stage, StageTiming};
