use super::CalibrationError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tubecal_core::{BankSide, DetectorBank, EncoderOverride, StripGeometry, TubeId};
use tubecal_fit::{FitMode, FitParams, SolveOptions};

/// Linear offset applied to the known edges, interpolated by tube index.
///
/// Models a strip that is not perfectly perpendicular to the tubes: the
/// first tube sees the edges shifted by `first`, the last by `last` (metres).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StripTilt {
    pub first: f64,
    pub last: f64,
}

impl StripTilt {
    pub fn offset(&self, tube: TubeId, num_tubes: usize) -> f64 {
        if num_tubes <= 1 {
            return self.first;
        }
        let t = tube.index() as f64 / (num_tubes - 1) as f64;
        self.first + (self.last - self.first) * t
    }
}

/// Configuration of one calibration run.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationParams {
    /// Encoder position of every strip measurement.
    pub strip_positions: Vec<i64>,
    /// Measurement identifier for every strip position, in the same order.
    pub data_ids: Vec<String>,
    /// Strip width in encoder units.
    pub strip_width: f64,
    pub strip_to_tube_centre: f64,
    pub encoder_at_beam_centre: f64,
    /// Alternate encoder reference for one strip position (rear bank only).
    pub encoder_at_beam_centre_override: Option<EncoderOverride>,
    pub rear_detector: bool,
    /// Count level separating strip shadow from open tube.
    pub threshold: f64,
    pub skip_tubes_on_error: bool,
    pub margin: usize,
    /// First pixel scanned for edges.
    pub starting_pixel: usize,
    /// One past the last pixel scanned; the full tube when unset.
    pub ending_pixel: Option<usize>,
    /// `true` fits every edge, `false` fits one plateau per strip.
    pub fit_edges: bool,
    pub background: f64,
    /// Shift applied to the calibrated Y coordinate (metres).
    pub vertical_offset: f64,
    /// Tubes whose mean resolution exceeds this value are reported.
    pub cvalue_threshold: f64,
    pub cvalue_report_path: Option<PathBuf>,
    /// Snapshot of the calibrated bank, written as JSON.
    pub output_path: Option<PathBuf>,
    pub out_edge: usize,
    pub in_edge: usize,
    pub end_grad: f64,
    pub seed_height: Option<f64>,
    pub seed_width: Option<f64>,
    pub half_detector_width: f64,
    pub front_detector_offset: f64,
    pub strip_tilt: Option<StripTilt>,
    /// Rescale every measurement to this normalisation before merging.
    pub reference_intensity: Option<f64>,
    pub solver: SolveOptions,
}

impl Default for CalibrationParams {
    fn default() -> Self {
        let fit = FitParams::default();
        Self {
            strip_positions: Vec::new(),
            data_ids: Vec::new(),
            strip_width: 9.0,
            strip_to_tube_centre: 0.0,
            encoder_at_beam_centre: 0.0,
            encoder_at_beam_centre_override: None,
            rear_detector: true,
            threshold: 500.0,
            skip_tubes_on_error: false,
            margin: fit.margin,
            starting_pixel: 0,
            ending_pixel: None,
            fit_edges: true,
            background: fit.background,
            vertical_offset: 0.0,
            cvalue_threshold: 5.0,
            cvalue_report_path: None,
            output_path: None,
            out_edge: fit.out_edge,
            in_edge: fit.in_edge,
            end_grad: fit.end_grad,
            seed_height: None,
            seed_width: None,
            half_detector_width: 500.0,
            front_detector_offset: 0.0,
            strip_tilt: None,
            reference_intensity: None,
            solver: fit.solver,
        }
    }
}

fn config_error(message: impl Into<String>) -> CalibrationError {
    CalibrationError::Configuration(message.into())
}

impl CalibrationParams {
    pub fn side(&self) -> BankSide {
        BankSide::from_rear_flag(self.rear_detector)
    }

    pub fn fit_mode(&self) -> FitMode {
        FitMode::from_fit_edges(self.fit_edges)
    }

    pub fn geometry(&self) -> StripGeometry {
        StripGeometry {
            strip_width: self.strip_width,
            strip_to_tube_centre: self.strip_to_tube_centre,
            encoder_at_beam_centre: self.encoder_at_beam_centre,
            encoder_override: self.encoder_at_beam_centre_override,
            half_detector_width: self.half_detector_width,
            front_detector_offset: self.front_detector_offset,
            side: self.side(),
        }
    }

    pub fn fit_params(&self) -> FitParams {
        FitParams {
            margin: self.margin,
            out_edge: self.out_edge,
            in_edge: self.in_edge,
            end_grad: self.end_grad,
            background: self.background,
            seed_height: self.seed_height,
            seed_width: self.seed_width,
            solver: self.solver,
        }
    }

    /// Tilt offset for `tube`, zero when no tilt is configured.
    pub fn tilt_offset(&self, tube: TubeId, num_tubes: usize) -> f64 {
        self.strip_tilt
            .map(|tilt| tilt.offset(tube, num_tubes))
            .unwrap_or(0.0)
    }

    /// Exclusive end of the edge scan for a tube of `pixels` pixels.
    pub fn scan_end(&self, pixels: usize) -> usize {
        self.ending_pixel.unwrap_or(pixels).min(pixels)
    }

    /// Check the configuration against the bank it will calibrate.
    pub fn validate(&self, bank: &DetectorBank) -> Result<(), CalibrationError> {
        if self.strip_positions.is_empty() {
            return Err(config_error("no strip positions given"));
        }
        if self.strip_positions.len() != self.data_ids.len() {
            return Err(config_error(format!(
                "{} strip positions but {} data ids",
                self.strip_positions.len(),
                self.data_ids.len()
            )));
        }
        if bank.side != self.side() {
            return Err(config_error(format!(
                "bank {} is the {} bank, configuration targets the {} bank",
                bank.name,
                bank.side,
                self.side()
            )));
        }
        if bank.num_tubes == 0 || bank.pixels_per_tube == 0 {
            return Err(config_error(format!("bank {} is empty", bank.name)));
        }
        let end = self.scan_end(bank.pixels_per_tube);
        if self.starting_pixel >= end {
            return Err(config_error(format!(
                "empty pixel scan range {}..{end}",
                self.starting_pixel
            )));
        }
        for (name, value) in [
            ("threshold", self.threshold),
            ("strip_width", self.strip_width),
            ("half_detector_width", self.half_detector_width),
            ("end_grad", self.end_grad),
            ("vertical_offset", self.vertical_offset),
        ] {
            if !value.is_finite() {
                return Err(config_error(format!("{name} must be finite, got {value}")));
            }
        }
        if !self.cvalue_threshold.is_finite() || self.cvalue_threshold < 0.0 {
            return Err(config_error(format!(
                "cvalue_threshold must be a non-negative number, got {}",
                self.cvalue_threshold
            )));
        }
        if let Some(reference) = self.reference_intensity {
            if !reference.is_finite() || reference <= 0.0 {
                return Err(config_error(format!(
                    "reference_intensity must be positive, got {reference}"
                )));
            }
        }
        if self.out_edge + self.in_edge < 4 {
            return Err(config_error("fit window (out_edge + in_edge) is too small"));
        }
        Ok(())
    }
}
