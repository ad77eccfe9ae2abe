use std::path::{Path, PathBuf};
use tubecal_core::{BankError, MergeError, ProjectionError, StripError};
use tubecal_fit::FitError;

/// Errors returned by the calibration orchestrator.
///
/// The tube-level kinds (see [`CalibrationError::is_tube_level`]) are subject
/// to the skip/abort policy. Everything else ends the run.
#[derive(thiserror::Error, Debug)]
pub enum CalibrationError {
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("{tube}: found {found} edges, expected {expected}")]
    EdgeCountMismatch {
        tube: String,
        found: usize,
        expected: usize,
    },
    #[error("{tube}: {source}")]
    FitConvergence {
        tube: String,
        #[source]
        source: FitError,
    },
    #[error("{tube}: {valid} usable fitted positions, need at least {required}")]
    InsufficientData {
        tube: String,
        valid: usize,
        required: usize,
    },
    #[error("{tube}: degenerate tube geometry (length {length})")]
    DegenerateTube { tube: String, length: f64 },
    #[error("{tube}: {detectors} detectors but {positions} positions")]
    ArityMismatch {
        tube: String,
        detectors: usize,
        positions: usize,
    },
    #[error("calibration could not be applied: {0}")]
    CalibrationApply(String),
    #[error("could not write {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CalibrationError {
    /// Whether this error concerns a single tube and may be skipped.
    pub fn is_tube_level(&self) -> bool {
        matches!(
            self,
            CalibrationError::EdgeCountMismatch { .. }
                | CalibrationError::FitConvergence { .. }
                | CalibrationError::InsufficientData { .. }
                | CalibrationError::DegenerateTube { .. }
        )
    }

    /// Wrap a failed write of `path`.
    pub(crate) fn persist(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| CalibrationError::Persist {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn from_fit(tube: &str, err: FitError) -> Self {
        match err {
            FitError::InsufficientData { valid, required } => CalibrationError::InsufficientData {
                tube: tube.to_owned(),
                valid,
                required,
            },
            FitError::LengthMismatch { fitted, known } => CalibrationError::ArityMismatch {
                tube: tube.to_owned(),
                detectors: known,
                positions: fitted,
            },
            other => CalibrationError::FitConvergence {
                tube: tube.to_owned(),
                source: other,
            },
        }
    }

    pub(crate) fn from_projection(tube: &str, err: ProjectionError) -> Self {
        match err {
            ProjectionError::DegenerateTube(length) => CalibrationError::DegenerateTube {
                tube: tube.to_owned(),
                length,
            },
            ProjectionError::ArityMismatch {
                detectors,
                positions,
            } => CalibrationError::ArityMismatch {
                tube: tube.to_owned(),
                detectors,
                positions,
            },
        }
    }
}

impl From<StripError> for CalibrationError {
    fn from(err: StripError) -> Self {
        CalibrationError::Configuration(err.to_string())
    }
}

impl From<MergeError> for CalibrationError {
    fn from(err: MergeError) -> Self {
        CalibrationError::Configuration(err.to_string())
    }
}

impl From<BankError> for CalibrationError {
    fn from(err: BankError) -> Self {
        CalibrationError::Configuration(err.to_string())
    }
}
