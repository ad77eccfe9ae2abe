//! JSON input and output helpers.

use crate::calibrator::{CalibrationError, CalibrationParams};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tubecal_core::{DetectorBank, StripMeasurement};

/// Bank geometry and the strip measurements taken on it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CalibrationInput {
    pub bank: DetectorBank,
    pub measurements: Vec<StripMeasurement>,
}

impl CalibrationInput {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, CalibrationError> {
        load_json(path)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), CalibrationError> {
        write_json(self, path)
    }
}

impl CalibrationParams {
    /// Load parameters from JSON; missing fields take their defaults.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, CalibrationError> {
        load_json(path)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), CalibrationError> {
        write_json(self, path)
    }
}

pub fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, CalibrationError> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Write `value` to `path` as pretty JSON.
pub fn write_json<T: Serialize + ?Sized>(
    value: &T,
    path: impl AsRef<Path>,
) -> Result<(), CalibrationError> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).map_err(CalibrationError::persist(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::SyntheticScan;

    #[test]
    fn input_survives_a_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.json");
        let input = SyntheticScan::default().build().unwrap();
        input.write_json(&path).unwrap();

        let mut loaded = CalibrationInput::load_json(&path).unwrap();
        loaded.bank.validate().unwrap();
        assert_eq!(loaded.bank.detector_ids, input.bank.detector_ids);
        assert_eq!(loaded.measurements.len(), 3);
    }

    #[test]
    fn missing_files_and_bad_json_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let missing = CalibrationParams::load_json(dir.path().join("absent.json"));
        assert!(matches!(missing, Err(CalibrationError::Io(_))));

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{ not json").unwrap();
        assert!(matches!(
            CalibrationParams::load_json(&bad),
            Err(CalibrationError::Json(_))
        ));
    }

    #[test]
    fn write_failures_carry_the_target_path() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("missing").join("params.json");
        let err = CalibrationParams::default().write_json(&target).unwrap_err();
        match &err {
            CalibrationError::Persist { path, .. } => assert_eq!(path, &target),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(err.to_string().contains("params.json"));
    }
}
