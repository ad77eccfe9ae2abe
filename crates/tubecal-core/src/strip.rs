//! Strip geometry: from encoder read-outs to real-space shadow edges.
//!
//! A strip at encoder position `e` with width `w` casts a shadow whose
//! boundaries on the tubes are
//!
//! ```text
//! dist_from_beam  = encoder_ref - e
//! parallax_shift  = dist_from_beam * strip_to_tube_centre
//!                   / (strip_to_tube_centre - sample_to_detector)
//! edge(e)         = -(e + parallax_shift - half_width) / 1000 + side_offset
//! left  = edge(e + w)
//! right = edge(e)
//! ```
//!
//! Encoder values, widths and distances are in millimetres; edges come out in
//! metres. Increasing encoder values move the shadow towards negative
//! coordinates, so `left < right` for any positive width.

use crate::bank::BankSide;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Real-space `(left, right)` shadow boundaries of one strip.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EdgePair {
    pub left: f64,
    pub right: f64,
}

impl EdgePair {
    pub fn new(left: f64, right: f64) -> Self {
        Self { left, right }
    }

    /// Total order used when sorting strips: left edge first, right edge second.
    pub fn cmp_by_edges(&self, other: &EdgePair) -> Ordering {
        self.left
            .total_cmp(&other.left)
            .then_with(|| self.right.total_cmp(&other.right))
    }

    #[inline]
    pub fn midpoint(&self) -> f64 {
        0.5 * (self.left + self.right)
    }
}

/// One time-integrated strip measurement over a whole bank.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StripMeasurement {
    /// Identifier of the run / workspace the counts come from.
    pub id: String,
    /// Integrated counts, one value per detector in bank order.
    pub counts: Vec<f64>,
    #[serde(default)]
    pub side: Option<BankSide>,
    /// Sample-to-detector distance in millimetres.
    #[serde(default)]
    pub sample_to_detector: Option<f64>,
    /// Intensity the counts were collected with (monitor or proton charge).
    #[serde(default = "default_normalisation")]
    pub normalisation: f64,
}

fn default_normalisation() -> f64 {
    1.0
}

impl StripMeasurement {
    pub fn new(id: impl Into<String>, counts: Vec<f64>) -> Self {
        Self {
            id: id.into(),
            counts,
            side: None,
            sample_to_detector: None,
            normalisation: default_normalisation(),
        }
    }

    pub fn with_geometry(mut self, side: BankSide, sample_to_detector: f64) -> Self {
        self.side = Some(side);
        self.sample_to_detector = Some(sample_to_detector);
        self
    }

    pub fn with_normalisation(mut self, normalisation: f64) -> Self {
        self.normalisation = normalisation;
        self
    }

    /// Rescale counts to a common reference intensity.
    pub fn rescaled_to(&self, reference: f64) -> Result<StripMeasurement, StripError> {
        if !(self.normalisation.is_finite() && self.normalisation > 0.0) {
            return Err(StripError::InvalidNormalisation {
                id: self.id.clone(),
                value: self.normalisation,
            });
        }
        let scale = reference / self.normalisation;
        Ok(StripMeasurement {
            counts: self.counts.iter().map(|c| c * scale).collect(),
            normalisation: reference,
            ..self.clone()
        })
    }
}

/// Encoder reference override for one designated strip position.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EncoderOverride {
    pub strip_position: i64,
    pub encoder_at_beam_centre: f64,
}

/// Errors raised while turning strip metadata into edges.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum StripError {
    #[error("measurement {id} has no bank side metadata")]
    MissingSide { id: String },
    #[error("measurement {id} has no sample-to-detector distance")]
    MissingDistance { id: String },
    #[error("measurement {id} was taken on the {found} bank, calibration targets the {expected} bank")]
    SideMismatch {
        id: String,
        expected: BankSide,
        found: BankSide,
    },
    #[error("measurement {id} has invalid normalisation {value}")]
    InvalidNormalisation { id: String, value: f64 },
    #[error("strip-to-tube-centre offset equals the sample-to-detector distance ({0} mm)")]
    DegenerateParallax(f64),
}

/// Fixed geometry of the strip stage and the detector bank.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StripGeometry {
    /// Strip width in encoder units.
    pub strip_width: f64,
    /// Distance between the strip plane and the tube centres.
    pub strip_to_tube_centre: f64,
    /// Encoder value with the strip centred on the beam.
    pub encoder_at_beam_centre: f64,
    /// Alternate reference for one strip position, rear bank only.
    pub encoder_override: Option<EncoderOverride>,
    pub half_detector_width: f64,
    /// Lateral offset of the front bank in metres.
    pub front_detector_offset: f64,
    pub side: BankSide,
}

impl StripGeometry {
    fn encoder_reference(&self, strip_position: i64) -> f64 {
        match self.encoder_override {
            Some(o) if self.side == BankSide::Rear && o.strip_position == strip_position => {
                o.encoder_at_beam_centre
            }
            _ => self.encoder_at_beam_centre,
        }
    }

    fn side_offset(&self) -> f64 {
        match self.side {
            BankSide::Rear => 0.0,
            BankSide::Front => self.front_detector_offset,
        }
    }

    /// Real-space coordinate of one shadow boundary.
    pub fn compute_edge(
        &self,
        encoder: f64,
        encoder_ref: f64,
        sample_to_detector: f64,
    ) -> Result<f64, StripError> {
        let denom = self.strip_to_tube_centre - sample_to_detector;
        if denom == 0.0 {
            return Err(StripError::DegenerateParallax(sample_to_detector));
        }
        let dist_from_beam = encoder_ref - encoder;
        let parallax_shift = dist_from_beam * self.strip_to_tube_centre / denom;
        Ok(-(encoder + parallax_shift - self.half_detector_width) / 1000.0 + self.side_offset())
    }

    /// Edge pair for a strip at `strip_position` using `sample_to_detector`.
    pub fn edges(&self, strip_position: i64, sample_to_detector: f64) -> Result<EdgePair, StripError> {
        let encoder_ref = self.encoder_reference(strip_position);
        let position = strip_position as f64;
        let left = self.compute_edge(position + self.strip_width, encoder_ref, sample_to_detector)?;
        let right = self.compute_edge(position, encoder_ref, sample_to_detector)?;
        Ok(EdgePair::new(left, right))
    }

    /// Edge pair for a measurement, checking its geometry metadata first.
    pub fn edges_for(
        &self,
        strip_position: i64,
        measurement: &StripMeasurement,
    ) -> Result<EdgePair, StripError> {
        let side = measurement.side.ok_or_else(|| StripError::MissingSide {
            id: measurement.id.clone(),
        })?;
        if side != self.side {
            return Err(StripError::SideMismatch {
                id: measurement.id.clone(),
                expected: self.side,
                found: side,
            });
        }
        let distance = measurement
            .sample_to_detector
            .ok_or_else(|| StripError::MissingDistance {
                id: measurement.id.clone(),
            })?;
        self.edges(strip_position, distance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn rear_geometry() -> StripGeometry {
        StripGeometry {
            strip_width: 9.0,
            strip_to_tube_centre: 32.0,
            encoder_at_beam_centre: 474.2,
            encoder_override: None,
            half_detector_width: 520.0,
            front_detector_offset: 1.1,
            side: BankSide::Rear,
        }
    }

    #[test]
    fn edge_formula_matches_hand_computation() {
        let geom = rear_geometry();
        let l2 = 4000.0;
        let edge = geom.compute_edge(300.0, 474.2, l2).unwrap();
        let shift = (474.2 - 300.0) * 32.0 / (32.0 - l2);
        assert_relative_eq!(edge, -(300.0 + shift - 520.0) / 1000.0, epsilon = 1e-12);
    }

    #[test]
    fn increasing_strip_positions_keep_a_consistent_order() {
        let geom = rear_geometry();
        let pairs: Vec<EdgePair> = [100, 200, 300, 400, 500, 600]
            .iter()
            .map(|&p| geom.edges(p, 4000.0).unwrap())
            .collect();
        for pair in &pairs {
            assert!(pair.left < pair.right, "inverted pair {pair:?}");
        }
        for w in pairs.windows(2) {
            assert!(w[1].right < w[0].left, "edges not monotone: {w:?}");
        }
    }

    #[test]
    fn front_bank_is_shifted_by_side_offset() {
        let rear = rear_geometry();
        let front = StripGeometry {
            side: BankSide::Front,
            ..rear_geometry()
        };
        let a = rear.edges(250, 4000.0).unwrap();
        let b = front.edges(250, 4000.0).unwrap();
        assert_relative_eq!(b.left - a.left, 1.1, epsilon = 1e-12);
        assert_relative_eq!(b.right - a.right, 1.1, epsilon = 1e-12);
    }

    #[test]
    fn encoder_override_applies_only_to_its_rear_strip() {
        let geom = StripGeometry {
            encoder_override: Some(EncoderOverride {
                strip_position: 920,
                encoder_at_beam_centre: 469.0,
            }),
            ..rear_geometry()
        };
        let plain = rear_geometry();
        assert_ne!(geom.edges(920, 4000.0), plain.edges(920, 4000.0));
        assert_eq!(geom.edges(900, 4000.0), plain.edges(900, 4000.0));

        let front = StripGeometry {
            side: BankSide::Front,
            ..geom.clone()
        };
        let front_plain = StripGeometry {
            side: BankSide::Front,
            ..plain
        };
        assert_eq!(front.edges(920, 4000.0), front_plain.edges(920, 4000.0));
    }

    #[test]
    fn missing_metadata_is_reported() {
        let geom = rear_geometry();
        let bare = StripMeasurement::new("run-1", vec![1.0; 4]);
        assert_eq!(
            geom.edges_for(100, &bare),
            Err(StripError::MissingSide { id: "run-1".into() })
        );

        let mut sided = bare.clone();
        sided.side = Some(BankSide::Rear);
        assert_eq!(
            geom.edges_for(100, &sided),
            Err(StripError::MissingDistance { id: "run-1".into() })
        );

        let front = bare.with_geometry(BankSide::Front, 4000.0);
        assert!(matches!(
            geom.edges_for(100, &front),
            Err(StripError::SideMismatch { .. })
        ));
    }

    #[test]
    fn rescaling_uses_normalisation_factor() {
        let m = StripMeasurement::new("run-2", vec![10.0, 20.0]).with_normalisation(2.0);
        let r = m.rescaled_to(4.0).unwrap();
        assert_eq!(r.counts, vec![20.0, 40.0]);
        assert_eq!(r.normalisation, 4.0);

        let bad = StripMeasurement::new("run-3", vec![1.0]).with_normalisation(0.0);
        assert!(bad.rescaled_to(1.0).is_err());
    }

    #[test]
    fn comparator_orders_by_left_then_right() {
        let mut pairs = vec![
            EdgePair::new(1.0, 3.0),
            EdgePair::new(0.0, 2.0),
            EdgePair::new(1.0, 2.0),
        ];
        pairs.sort_by(EdgePair::cmp_by_edges);
        assert_eq!(
            pairs,
            vec![
                EdgePair::new(0.0, 2.0),
                EdgePair::new(1.0, 2.0),
                EdgePair::new(1.0, 3.0)
            ]
        );
    }
}
