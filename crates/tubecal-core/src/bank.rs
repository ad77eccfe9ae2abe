use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Detector identifier as used by the instrument geometry.
pub type DetectorId = u32;

/// Which of the two detector banks a measurement or bank belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BankSide {
    Rear,
    Front,
}

impl BankSide {
    pub fn from_rear_flag(rear: bool) -> Self {
        if rear {
            BankSide::Rear
        } else {
            BankSide::Front
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BankSide::Rear => "rear",
            BankSide::Front => "front",
        }
    }
}

impl fmt::Display for BankSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cartesian axis the tubes of a bank run along.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TubeAxis {
    #[default]
    X,
    Y,
    Z,
}

impl TubeAxis {
    #[inline]
    pub fn index(self) -> usize {
        match self {
            TubeAxis::X => 0,
            TubeAxis::Y => 1,
            TubeAxis::Z => 2,
        }
    }

    /// Component of `p` along this axis.
    #[inline]
    pub fn component(self, p: &Point3<f64>) -> f64 {
        p[self.index()]
    }
}

/// Index of one physical tube in a bank, `0..num_tubes`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TubeId(pub usize);

impl TubeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }

    /// Module the tube is mounted in.
    pub fn module(self, tubes_per_module: usize) -> usize {
        self.0 / tubes_per_module.max(1)
    }

    /// Position of the tube inside its module, starting at 1.
    pub fn number_in_module(self, tubes_per_module: usize) -> usize {
        self.0 % tubes_per_module.max(1) + 1
    }

    /// Human-readable name, e.g. `rear-module03-tube05`.
    pub fn name(self, side: BankSide, tubes_per_module: usize) -> String {
        format!(
            "{}-module{:02}-tube{:02}",
            side,
            self.module(tubes_per_module),
            self.number_in_module(tubes_per_module)
        )
    }
}

impl fmt::Display for TubeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tube {}", self.0)
    }
}

/// One calibrated detector position.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRow {
    pub detector_id: DetectorId,
    pub position: Point3<f64>,
}

/// Append-only table of calibrated positions, keyed by detector id.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationTable {
    rows: Vec<CalibrationRow>,
}

impl CalibrationTable {
    pub fn extend<I: IntoIterator<Item = CalibrationRow>>(&mut self, rows: I) {
        self.rows.extend(rows);
    }

    pub fn rows(&self) -> &[CalibrationRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl FromIterator<CalibrationRow> for CalibrationTable {
    fn from_iter<I: IntoIterator<Item = CalibrationRow>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

/// Errors raised by the bank geometry model.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum BankError {
    #[error("bank layout needs {expected} detectors ({tubes} tubes x {pixels} pixels), got {got}")]
    LayoutMismatch {
        tubes: usize,
        pixels: usize,
        expected: usize,
        got: usize,
    },
    #[error("bank has {ids} detector ids but {positions} positions")]
    PositionCountMismatch { ids: usize, positions: usize },
    #[error("{0} is outside the bank")]
    UnknownTube(TubeId),
    #[error("detector {0} is not part of the bank")]
    UnknownDetector(DetectorId),
}

/// Geometry model of one detector bank made of equally long tubes.
///
/// Detectors are stored tube-major: tube `t` owns the indices
/// `t * pixels_per_tube .. (t + 1) * pixels_per_tube`. `base_positions` are
/// the never-calibrated positions from the instrument definition; `positions`
/// holds the currently applied geometry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DetectorBank {
    pub name: String,
    pub side: BankSide,
    pub num_tubes: usize,
    pub pixels_per_tube: usize,
    #[serde(default = "default_tubes_per_module")]
    pub tubes_per_module: usize,
    #[serde(default)]
    pub axis: TubeAxis,
    pub detector_ids: Vec<DetectorId>,
    pub base_positions: Vec<Point3<f64>>,
    #[serde(default)]
    pub positions: Vec<Point3<f64>>,
}

fn default_tubes_per_module() -> usize {
    8
}

impl DetectorBank {
    /// Build a bank from its uncalibrated layout.
    pub fn new(
        name: impl Into<String>,
        side: BankSide,
        num_tubes: usize,
        pixels_per_tube: usize,
        detector_ids: Vec<DetectorId>,
        base_positions: Vec<Point3<f64>>,
    ) -> Result<Self, BankError> {
        let mut bank = Self {
            name: name.into(),
            side,
            num_tubes,
            pixels_per_tube,
            tubes_per_module: default_tubes_per_module(),
            axis: TubeAxis::default(),
            detector_ids,
            positions: base_positions.clone(),
            base_positions,
        };
        bank.validate()?;
        Ok(bank)
    }

    pub fn with_axis(mut self, axis: TubeAxis) -> Self {
        self.axis = axis;
        self
    }

    pub fn with_tubes_per_module(mut self, tubes_per_module: usize) -> Self {
        self.tubes_per_module = tubes_per_module.max(1);
        self
    }

    /// Check layout consistency and fill `positions` from the base geometry
    /// when it was not provided (e.g. freshly deserialized banks).
    pub fn validate(&mut self) -> Result<(), BankError> {
        let expected = self.num_tubes * self.pixels_per_tube;
        if self.detector_ids.len() != expected {
            return Err(BankError::LayoutMismatch {
                tubes: self.num_tubes,
                pixels: self.pixels_per_tube,
                expected,
                got: self.detector_ids.len(),
            });
        }
        if self.base_positions.len() != expected {
            return Err(BankError::PositionCountMismatch {
                ids: self.detector_ids.len(),
                positions: self.base_positions.len(),
            });
        }
        if self.positions.is_empty() {
            self.positions = self.base_positions.clone();
        } else if self.positions.len() != expected {
            return Err(BankError::PositionCountMismatch {
                ids: self.detector_ids.len(),
                positions: self.positions.len(),
            });
        }
        Ok(())
    }

    #[inline]
    pub fn num_detectors(&self) -> usize {
        self.detector_ids.len()
    }

    pub fn tubes(&self) -> impl Iterator<Item = TubeId> {
        (0..self.num_tubes).map(TubeId)
    }

    pub fn tube_name(&self, tube: TubeId) -> String {
        tube.name(self.side, self.tubes_per_module)
    }

    /// Bank index range covered by `tube`.
    pub fn tube_range(&self, tube: TubeId) -> Result<std::ops::Range<usize>, BankError> {
        if tube.index() >= self.num_tubes {
            return Err(BankError::UnknownTube(tube));
        }
        let start = tube.index() * self.pixels_per_tube;
        Ok(start..start + self.pixels_per_tube)
    }

    pub fn tube_detector_ids(&self, tube: TubeId) -> Result<&[DetectorId], BankError> {
        Ok(&self.detector_ids[self.tube_range(tube)?])
    }

    /// Uncalibrated positions of the first and last pixel of `tube`.
    pub fn tube_end_points(&self, tube: TubeId) -> Result<(Point3<f64>, Point3<f64>), BankError> {
        let range = self.tube_range(tube)?;
        Ok((
            self.base_positions[range.start],
            self.base_positions[range.end - 1],
        ))
    }

    /// Coordinate of every detector along the tube axis, from the base geometry.
    pub fn axial_coordinates(&self) -> Vec<f64> {
        self.base_positions
            .iter()
            .map(|p| self.axis.component(p))
            .collect()
    }

    /// Apply a calibration table as one atomic update.
    ///
    /// Every row is checked before any position is written, so an unknown
    /// detector leaves the bank untouched. Returns the number of rows applied.
    pub fn apply_calibration(&mut self, table: &CalibrationTable) -> Result<usize, BankError> {
        let index: HashMap<DetectorId, usize> = self
            .detector_ids
            .iter()
            .enumerate()
            .map(|(i, &id)| (id, i))
            .collect();

        let mut updates = Vec::with_capacity(table.len());
        for row in table.rows() {
            let &i = index
                .get(&row.detector_id)
                .ok_or(BankError::UnknownDetector(row.detector_id))?;
            updates.push((i, row.position));
        }

        if self.positions.len() != self.base_positions.len() {
            self.positions = self.base_positions.clone();
        }
        for (i, position) in updates.iter().copied() {
            self.positions[i] = position;
        }
        Ok(updates.len())
    }
}
