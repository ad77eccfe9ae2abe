//! Quadratic pixel-index to tube-position correction.

use crate::FitError;
use log::debug;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Minimum number of (fitted, known) pairs for a quadratic fit.
pub const MIN_PAIRS: usize = 3;

/// `p(x) = a0 + a1 * (x / n) + a2 * (x / n)^2`.
///
/// Coefficients are expressed in the normalised abscissa `x / n` so the
/// design matrix stays well conditioned for long tubes.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quadratic {
    pub a0: f64,
    pub a1: f64,
    pub a2: f64,
    /// Normalisation of the abscissa.
    pub scale: f64,
}

impl Quadratic {
    pub fn eval(&self, x: f64) -> f64 {
        let u = x / self.scale;
        self.a0 + u * (self.a1 + u * self.a2)
    }
}

/// Least-squares quadratic through `(xs[i], ys[i])`.
pub fn fit_quadratic(xs: &[f64], ys: &[f64], scale: f64) -> Result<Quadratic, FitError> {
    if xs.len() != ys.len() {
        return Err(FitError::LengthMismatch {
            fitted: xs.len(),
            known: ys.len(),
        });
    }
    if xs.len() < MIN_PAIRS {
        return Err(FitError::InsufficientData {
            valid: xs.len(),
            required: MIN_PAIRS,
        });
    }
    let scale = if scale.abs() > f64::EPSILON { scale } else { 1.0 };

    let a = DMatrix::from_fn(xs.len(), 3, |r, c| (xs[r] / scale).powi(c as i32));
    let b = DVector::from_column_slice(ys);

    let svd = a.svd(true, true);
    let max_sv = svd.singular_values.max();
    let rank = svd.rank(max_sv * 1e-12);
    if rank < 3 {
        return Err(FitError::InsufficientData {
            valid: rank,
            required: MIN_PAIRS,
        });
    }
    let coeffs = svd
        .solve(&b, max_sv * 1e-12)
        .map_err(|e| FitError::SolveFailed(e.to_string()))?;

    Ok(Quadratic {
        a0: coeffs[0],
        a1: coeffs[1],
        a2: coeffs[2],
        scale,
    })
}

/// Corrected positions for every pixel of one tube.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CorrectedPositions {
    /// Position along the tube for pixel `0..n`.
    pub positions: Vec<f64>,
    pub poly: Quadratic,
    /// Number of pairs that passed the `(0, n)` filter.
    pub used: usize,
}

/// Fit fitted pixel positions against known positions and evaluate the fit
/// at every pixel index of a tube with `n` pixels.
///
/// Pairs whose fitted position lies outside the open interval `(0, n)` are
/// discarded before fitting.
pub fn correct_tube(fitted: &[f64], known: &[f64], n: usize) -> Result<CorrectedPositions, FitError> {
    if fitted.len() != known.len() {
        return Err(FitError::LengthMismatch {
            fitted: fitted.len(),
            known: known.len(),
        });
    }
    let upper = n as f64;
    let (xs, ys): (Vec<f64>, Vec<f64>) = fitted
        .iter()
        .zip(known)
        .filter(|(x, _)| **x > 0.0 && **x < upper)
        .map(|(&x, &y)| (x, y))
        .unzip();
    if xs.len() < fitted.len() {
        debug!(
            "dropped {} fitted positions outside (0, {n})",
            fitted.len() - xs.len()
        );
    }
    if xs.len() < MIN_PAIRS {
        return Err(FitError::InsufficientData {
            valid: xs.len(),
            required: MIN_PAIRS,
        });
    }

    let poly = fit_quadratic(&xs, &ys, upper)?;
    let positions = (0..n).map(|i| poly.eval(i as f64)).collect();
    Ok(CorrectedPositions {
        positions,
        poly,
        used: xs.len(),
    })
}
