//! Deterministic synthetic strip scans.
//!
//! Builds a flat bank of parallel tubes (along X unless configured otherwise)
//! and the count profiles a strip scan would produce on it. Used by tests, the benchmark and for
//! trying out configurations without instrument data.

use crate::calibrator::{CalibrationError, CalibrationParams};
use crate::io::CalibrationInput;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use tubecal_core::{
    BankSide, DetectorBank, DetectorId, EdgePair, StripMeasurement, TubeAxis, TubeId,
};

/// Layout of a synthetic bank.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyntheticBank {
    pub num_tubes: usize,
    pub pixels_per_tube: usize,
    pub tubes_per_module: usize,
    /// Tube length in metres, centred on 0 along `axis`.
    pub tube_length: f64,
    /// Spacing between neighbouring tubes.
    pub tube_spacing: f64,
    /// Distance of the bank plane from the sample.
    pub distance: f64,
    pub side: BankSide,
    pub axis: TubeAxis,
}

impl Default for SyntheticBank {
    fn default() -> Self {
        Self {
            num_tubes: 4,
            pixels_per_tube: 128,
            tubes_per_module: 8,
            tube_length: 1.0,
            tube_spacing: 0.01,
            distance: 4.0,
            side: BankSide::Rear,
            axis: TubeAxis::X,
        }
    }
}

impl SyntheticBank {
    /// Uncalibrated position of pixel `pixel` of tube `tube`.
    pub fn position(&self, tube: usize, pixel: usize) -> Point3<f64> {
        let step = self.tube_length / (self.pixels_per_tube.max(2) - 1) as f64;
        let along = -0.5 * self.tube_length + step * pixel as f64;
        let across = tube as f64 * self.tube_spacing;
        match self.axis {
            TubeAxis::X => Point3::new(along, across, self.distance),
            TubeAxis::Y => Point3::new(across, along, self.distance),
            TubeAxis::Z => Point3::new(across, self.distance, along),
        }
    }

    pub fn build(&self) -> Result<DetectorBank, CalibrationError> {
        let n = self.pixels_per_tube;
        let count = self.num_tubes * n;
        let ids: Vec<DetectorId> = (1..=count as DetectorId).collect();
        let positions = (0..count).map(|i| self.position(i / n, i % n)).collect();
        let bank = DetectorBank::new(
            format!("{}-synthetic", self.side),
            self.side,
            self.num_tubes,
            n,
            ids,
            positions,
        )?;
        Ok(bank
            .with_axis(self.axis)
            .with_tubes_per_module(self.tubes_per_module))
    }
}

/// Open-beam and shadow count levels with a logistic transition.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShadowProfile {
    pub open: f64,
    pub shadow: f64,
    /// Logistic scale of the edges, in metres.
    pub edge_width: f64,
}

impl Default for ShadowProfile {
    fn default() -> Self {
        Self {
            open: 1000.0,
            shadow: 100.0,
            edge_width: 0.004,
        }
    }
}

impl ShadowProfile {
    /// Counts at axial coordinate `x` for a strip shadow spanning `edges`.
    pub fn counts_at(&self, x: f64, edges: EdgePair) -> f64 {
        let sigma = |t: f64| 1.0 / (1.0 + (-t).exp());
        let inside = sigma((x - edges.left) / self.edge_width)
            - sigma((x - edges.right) / self.edge_width);
        self.open - (self.open - self.shadow) * inside
    }
}

/// A complete synthetic strip scan.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyntheticScan {
    pub bank: SyntheticBank,
    pub profile: ShadowProfile,
    pub strip_positions: Vec<i64>,
    pub strip_width: f64,
    pub half_detector_width: f64,
    pub sample_to_detector: f64,
    /// Pixels forced to zero counts in every measurement.
    pub dead_pixels: Vec<(TubeId, usize)>,
}

impl Default for SyntheticScan {
    fn default() -> Self {
        Self {
            bank: SyntheticBank::default(),
            profile: ShadowProfile::default(),
            strip_positions: vec![200, 450, 700],
            strip_width: 100.0,
            half_detector_width: 500.0,
            sample_to_detector: 4000.0,
            dead_pixels: Vec::new(),
        }
    }
}

impl SyntheticScan {
    pub fn data_id(index: usize) -> String {
        format!("strip-{index:02}")
    }

    /// Calibration parameters matching this scan.
    pub fn params(&self) -> CalibrationParams {
        CalibrationParams {
            strip_positions: self.strip_positions.clone(),
            data_ids: (0..self.strip_positions.len()).map(Self::data_id).collect(),
            strip_width: self.strip_width,
            strip_to_tube_centre: 0.0,
            encoder_at_beam_centre: 0.0,
            rear_detector: self.bank.side == BankSide::Rear,
            threshold: 0.5 * (self.profile.open + self.profile.shadow),
            margin: 4,
            out_edge: 5,
            in_edge: 5,
            end_grad: 1.0,
            half_detector_width: self.half_detector_width,
            ..CalibrationParams::default()
        }
    }

    pub fn build(&self) -> Result<CalibrationInput, CalibrationError> {
        let bank = self.bank.build()?;
        let params = self.params();
        let geometry = params.geometry();
        let coordinates = bank.axial_coordinates();
        let n = bank.pixels_per_tube;

        let measurements = self
            .strip_positions
            .iter()
            .zip(&params.data_ids)
            .map(|(&position, id)| {
                let edges = geometry.edges(position, self.sample_to_detector)?;
                let mut counts: Vec<f64> = coordinates
                    .iter()
                    .map(|&x| self.profile.counts_at(x, edges))
                    .collect();
                for &(tube, pixel) in &self.dead_pixels {
                    if let Some(c) = counts.get_mut(tube.index() * n + pixel) {
                        *c = 0.0;
                    }
                }
                Ok(StripMeasurement::new(id.clone(), counts)
                    .with_geometry(self.bank.side, self.sample_to_detector))
            })
            .collect::<Result<Vec<_>, CalibrationError>>()?;

        Ok(CalibrationInput { bank, measurements })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn bank_is_tube_major_with_one_based_ids() {
        let bank = SyntheticBank::default().build().unwrap();
        assert_eq!(bank.num_detectors(), 4 * 128);
        assert_eq!(bank.detector_ids[0], 1);
        assert_eq!(bank.detector_ids[128], 129);
        let (first, last) = bank.tube_end_points(TubeId(2)).unwrap();
        assert_relative_eq!(first, Point3::new(-0.5, 0.02, 4.0), epsilon = 1e-12);
        assert_relative_eq!(last, Point3::new(0.5, 0.02, 4.0), epsilon = 1e-12);
    }

    #[test]
    fn vertical_tubes_run_along_y() {
        let layout = SyntheticBank {
            axis: TubeAxis::Y,
            tubes_per_module: 2,
            ..SyntheticBank::default()
        };
        let bank = layout.build().unwrap();
        assert_eq!(bank.axis, TubeAxis::Y);
        assert_eq!(bank.tube_name(TubeId(3)), "rear-module01-tube02");
        let (first, last) = bank.tube_end_points(TubeId(1)).unwrap();
        assert_relative_eq!(first, Point3::new(0.01, -0.5, 4.0), epsilon = 1e-12);
        assert_relative_eq!(last, Point3::new(0.01, 0.5, 4.0), epsilon = 1e-12);
        assert_relative_eq!(bank.axial_coordinates()[127], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn default_scan_casts_three_separate_shadows() {
        let input = SyntheticScan::default().build().unwrap();
        assert_eq!(input.measurements.len(), 3);
        let geometry = SyntheticScan::default().params().geometry();
        let edges = geometry.edges(200, 4000.0).unwrap();
        assert_relative_eq!(edges.left, 0.2, epsilon = 1e-12);
        assert_relative_eq!(edges.right, 0.3, epsilon = 1e-12);

        let profile = ShadowProfile::default();
        assert_relative_eq!(profile.counts_at(0.25, edges), 100.0, epsilon = 1e-2);
        assert_relative_eq!(profile.counts_at(-0.4, edges), 1000.0, epsilon = 1e-6);
    }

    #[test]
    fn dead_pixels_are_zeroed_in_every_measurement() {
        let scan = SyntheticScan {
            dead_pixels: vec![(TubeId(1), 10)],
            ..SyntheticScan::default()
        };
        let input = scan.build().unwrap();
        for m in &input.measurements {
            assert_eq!(m.counts[128 + 10], 0.0);
            assert!(m.counts[10] > 900.0);
        }
    }
}
