//! Core types and geometry for strip-based detector-tube calibration.
//!
//! This crate is purely geometric and does not fit anything. It knows how
//! strip encoder positions map to shadow edges, how single-strip measurements
//! are fused into one dataset, where a tube's count profile crosses a
//! threshold, and how corrected pixel coordinates become 3D positions.

mod bank;
mod edges;
mod logger;
mod merge;
mod projection;
mod strip;

pub use bank::{
    BankError, BankSide, CalibrationRow, CalibrationTable, DetectorBank, DetectorId, TubeAxis,
    TubeId,
};
pub use edges::detect_edges;
pub use merge::{
    isolation_bounds, merge_known_edges, merge_measurements, IsolationBounds, MergeError,
    MergedMeasurement,
};
pub use projection::{project_tube, ProjectionError};
pub use strip::{EdgePair, EncoderOverride, StripError, StripGeometry, StripMeasurement};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_with_level, parse_level};
