/// Errors returned by edge fitting and pixel correction.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FitError {
    #[error("fit window around {guess:.2} has {samples} samples, need at least {required}")]
    WindowTooSmall {
        guess: f64,
        samples: usize,
        required: usize,
    },
    #[error("fit around {guess:.2} did not converge ({reason})")]
    NotConverged { guess: f64, reason: String },
    #[error("fit around {guess:.2} produced non-finite parameters")]
    NonFinite { guess: f64 },
    #[error("{valid} usable position pairs, need at least {required}")]
    InsufficientData { valid: usize, required: usize },
    #[error("{fitted} fitted positions but {known} known positions")]
    LengthMismatch { fitted: usize, known: usize },
    #[error("least-squares solve failed: {0}")]
    SolveFailed(String),
}
