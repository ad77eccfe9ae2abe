//! Strip-scan position calibration for linear position-sensitive tubes.
//!
//! A bank of tubes is partially shadowed by a narrow absorbing strip at a
//! series of encoder positions. Each shadow edge lands at a known physical
//! coordinate. The calibration locates those edges in every tube's count
//! profile with sub-pixel fits, maps pixel indices to positions with a
//! quadratic, and writes corrected 3D positions back into the bank geometry.
//!
//! ## Quickstart
//!
//! ```no_run
//! use tubecal::{CalibrationInput, CalibrationParams, TubeCalibrator};
//!
//! # fn main() -> Result<(), tubecal::CalibrationError> {
//! let mut input = CalibrationInput::load_json("scan.json")?;
//! let params = CalibrationParams::load_json("params.json")?;
//!
//! let result = TubeCalibrator::new(params).calibrate(&mut input.bank, &input.measurements)?;
//! println!("calibrated {} detectors", result.table.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `tubecal::core`: bank geometry, strip edges, merging, projection.
//! - `tubecal::fit`: edge/plateau fitting and quadratic correction.
//! - `tubecal::synthetic`: deterministic synthetic banks and scans.

pub use tubecal_core as core;
pub use tubecal_fit as fit;

mod calibrator;
pub mod io;
pub mod synthetic;

pub use calibrator::{
    CalibrationError, CalibrationParams, CalibrationResult, CalibrationSummary, CvalueRecord,
    CvalueReport, SkippedTube, Stage, StageTiming, StripTilt, TubeCalibrator, TubeDiagnostics,
    TubeOutcome,
};
pub use io::CalibrationInput;
pub use tubecal_core::{BankSide, DetectorBank, StripMeasurement, TubeAxis, TubeId};
pub use tubecal_fit::FitMode;
