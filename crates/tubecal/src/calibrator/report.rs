//! Per-tube calibration quality (cvalue) reporting.

use super::CalibrationError;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use tubecal_core::TubeId;

/// Mean fit resolution of one tube.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CvalueRecord {
    pub tube: TubeId,
    pub name: String,
    pub cvalue: f64,
}

/// Cvalues of every calibrated tube and the ones above the threshold.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CvalueReport {
    pub threshold: f64,
    pub records: Vec<CvalueRecord>,
    pub warnings: Vec<CvalueRecord>,
}

impl CvalueReport {
    pub fn new(records: Vec<CvalueRecord>, threshold: f64) -> Self {
        let warnings = records
            .iter()
            .filter(|r| r.cvalue > threshold)
            .cloned()
            .collect();
        Self {
            threshold,
            records,
            warnings,
        }
    }

    /// No tube exceeded the threshold.
    pub fn is_nominal(&self) -> bool {
        self.warnings.is_empty()
    }

    /// One `<tube name>\t<cvalue>` line per threshold violation.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for w in &self.warnings {
            let _ = writeln!(out, "{}\t{}", w.name, w.cvalue);
        }
        out
    }

    pub fn write_text(&self, path: impl AsRef<Path>) -> Result<(), CalibrationError> {
        let path = path.as_ref();
        fs::write(path, self.to_text()).map_err(CalibrationError::persist(path))
    }

    pub(crate) fn log(&self) {
        if self.is_nominal() {
            info!(
                "cvalues nominal for {} tubes (threshold {})",
                self.records.len(),
                self.threshold
            );
            return;
        }
        for w in &self.warnings {
            warn!(
                "{}: cvalue {:.4} exceeds threshold {}",
                w.name, w.cvalue, self.threshold
            );
        }
    }
}
