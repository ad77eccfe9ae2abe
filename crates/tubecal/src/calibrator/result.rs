use super::report::{CvalueRecord, CvalueReport};
use super::stage::StageTiming;
use serde::{Deserialize, Serialize};
use tubecal_core::{CalibrationRow, CalibrationTable, TubeId};
use tubecal_fit::{PeakFit, Quadratic};

/// Output-only record of how one tube was calibrated.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TubeDiagnostics {
    pub tube: TubeId,
    pub name: String,
    /// Merged counts of the tube, pixel by pixel.
    pub profile: Vec<f64>,
    /// Threshold-crossing pixels.
    pub guesses: Vec<usize>,
    /// Known positions (with tilt) the fits were matched against.
    pub expected: Vec<f64>,
    pub fits: Vec<PeakFit>,
    /// Fitted curve sampled at the pixels of each fit window.
    pub curves: Vec<Vec<(f64, f64)>>,
    pub poly: Quadratic,
    /// `known - poly(fitted)` for every fit that fed the correction.
    pub residuals: Vec<f64>,
    /// Calibrated minus uncalibrated coordinate along the tube, per pixel.
    pub shift: Vec<f64>,
}

/// A tube left uncalibrated under the skip policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SkippedTube {
    pub tube: TubeId,
    pub name: String,
    pub message: String,
}

/// Everything one tube contributes to the run.
#[derive(Clone, Debug)]
pub struct TubeOutcome {
    pub rows: Vec<CalibrationRow>,
    pub cvalue: CvalueRecord,
    pub diagnostics: TubeDiagnostics,
}

/// Output of a calibration run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub table: CalibrationTable,
    pub cvalues: CvalueReport,
    pub diagnostics: Vec<TubeDiagnostics>,
    pub skipped: Vec<SkippedTube>,
    /// Known edges after merging, in metres.
    pub known_edges: Vec<f64>,
    pub stages: Vec<StageTiming>,
}

/// Compact description of a run, printed by the CLI.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSummary {
    pub rows_applied: usize,
    pub tubes_calibrated: usize,
    pub nominal: bool,
    pub cvalues: Vec<CvalueRecord>,
    pub warnings: Vec<CvalueRecord>,
    pub skipped: Vec<SkippedTube>,
}

impl CalibrationResult {
    pub fn summary(&self) -> CalibrationSummary {
        CalibrationSummary {
            rows_applied: self.table.len(),
            tubes_calibrated: self.cvalues.records.len(),
            nominal: self.cvalues.is_nominal(),
            cvalues: self.cvalues.records.clone(),
            warnings: self.cvalues.warnings.clone(),
            skipped: self.skipped.clone(),
        }
    }

    pub fn skipped_messages(&self) -> Vec<&str> {
        self.skipped.iter().map(|s| s.message.as_str()).collect()
    }
}
