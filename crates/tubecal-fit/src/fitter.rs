//! Sub-pixel refinement of detected strip edges.
//!
//! Two strategies exist. [`FitMode::Edge`] fits a logistic step around every
//! detected threshold crossing. [`FitMode::Peak`] is used when the two edges
//! of one strip have been averaged into a single expected strip centre; it
//! fits a flat-top plateau spanning the whole shadow.

use crate::model::{FittedModel, FlatTopPeak, LogisticStep, ProfileModel};
use crate::solver::{fit_curve, SolveOptions, SolveReport};
use crate::FitError;
use log::debug;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Resolutions at or below this magnitude are ignored by [`mean_resolution`].
pub const MIN_RESOLUTION: f64 = 1e-6;

/// Fitting strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
    /// One logistic step per edge.
    Edge,
    /// One flat-top plateau per strip, seeded at the averaged edge pair.
    Peak,
}

impl FitMode {
    pub fn from_fit_edges(fit_edges: bool) -> Self {
        if fit_edges {
            FitMode::Edge
        } else {
            FitMode::Peak
        }
    }

    /// Collapse adjacent pairs `(a, b)` into their mean in peak mode.
    ///
    /// Returns `None` when peak mode receives an odd number of values.
    pub fn expected_positions(self, values: &[f64]) -> Option<Vec<f64>> {
        match self {
            FitMode::Edge => Some(values.to_vec()),
            FitMode::Peak if values.len() % 2 == 0 => Some(
                values
                    .chunks_exact(2)
                    .map(|pair| 0.5 * (pair[0] + pair[1]))
                    .collect(),
            ),
            FitMode::Peak => None,
        }
    }
}

/// Window and seed configuration for the fitter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitParams {
    /// Half-window (pixels) used to decide the edge direction, and extra
    /// padding around plateau fits.
    pub margin: usize,
    /// Window extent on the bright side of an edge.
    pub out_edge: usize,
    /// Window extent on the shadow side of an edge.
    pub in_edge: usize,
    /// Initial edge width in pixels.
    pub end_grad: f64,
    /// Flat baseline for plateau fits.
    pub background: f64,
    pub seed_height: Option<f64>,
    pub seed_width: Option<f64>,
    pub solver: SolveOptions,
}

impl Default for FitParams {
    fn default() -> Self {
        Self {
            margin: 10,
            out_edge: 10,
            in_edge: 10,
            end_grad: 2.0,
            background: 0.0,
            seed_height: None,
            seed_width: None,
            solver: SolveOptions::default(),
        }
    }
}

/// One refined position.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeakFit {
    /// Pixel the fit was seeded at.
    pub guess: f64,
    /// Refined sub-pixel position.
    pub centre: f64,
    pub resolution: f64,
    /// Inclusive pixel window the fit used.
    pub window: (usize, usize),
    pub model: FittedModel,
    pub report: SolveReport,
}

impl PeakFit {
    /// Sample the fitted curve at every pixel of the fit window.
    pub fn curve(&self) -> Vec<(f64, f64)> {
        (self.window.0..=self.window.1)
            .map(|i| {
                let x = i as f64;
                (x, self.model.eval(x))
            })
            .collect()
    }
}

fn clamp_index(value: isize, len: usize) -> usize {
    value.clamp(0, len.saturating_sub(1) as isize) as usize
}

fn window_samples(profile: &[f64], start: usize, end: usize) -> (Vec<f64>, Vec<f64>) {
    let xs: Vec<f64> = (start..=end).map(|i| i as f64).collect();
    let ys = profile[start..=end].to_vec();
    (xs, ys)
}

fn check_window(guess: f64, samples: usize, required: usize) -> Result<(), FitError> {
    if samples < required {
        return Err(FitError::WindowTooSmall {
            guess,
            samples,
            required,
        });
    }
    Ok(())
}

fn finish(
    guess: f64,
    window: (usize, usize),
    params: DVector<f64>,
    report: SolveReport,
    model: FittedModel,
) -> Result<PeakFit, FitError> {
    if !report.converged {
        return Err(FitError::NotConverged {
            guess,
            reason: report.termination,
        });
    }
    if params.iter().any(|p| !p.is_finite()) {
        return Err(FitError::NonFinite { guess });
    }
    debug!(
        "fit at {:.2}: centre={:.4} resolution={:.4} cost={:.3e} evals={}",
        guess,
        model.centre(),
        model.resolution(),
        report.final_cost,
        report.evaluations
    );
    Ok(PeakFit {
        guess,
        centre: model.centre(),
        resolution: model.resolution(),
        window,
        model,
        report,
    })
}

/// Fit a logistic step around the edge guessed at pixel `guess`.
///
/// The edge direction is taken from the first and last samples of
/// `[guess - margin, guess + margin)`. A falling edge uses the window
/// `[guess - out_edge, guess + in_edge]`, a rising one the mirror image.
#[cfg_attr(feature = "tracing", instrument(level = "debug", skip(profile, params)))]
pub fn fit_edge(profile: &[f64], guess: f64, params: &FitParams) -> Result<PeakFit, FitError> {
    let n = profile.len();
    if n == 0 {
        return Err(FitError::WindowTooSmall {
            guess,
            samples: 0,
            required: LogisticStep.num_params(),
        });
    }
    let g = guess.round() as isize;
    let margin = params.margin.max(1) as isize;
    let left_idx = clamp_index(g - margin, n);
    let right_idx = clamp_index(g + margin - 1, n);
    let descending = profile[left_idx] > profile[right_idx];

    let (before, after, direction) = if descending {
        (params.out_edge, params.in_edge, -1.0)
    } else {
        (params.in_edge, params.out_edge, 1.0)
    };
    let start = clamp_index(g - before as isize, n);
    let end = clamp_index(g + after as isize, n);
    check_window(guess, end + 1 - start, LogisticStep.num_params())?;

    let (xs, ys) = window_samples(profile, start, end);
    let lo = ys.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = ys.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let slope = params.end_grad.abs().max(f64::EPSILON) * direction;
    let x0 = DVector::from_vec(vec![hi - lo, guess, slope, lo]);

    let (fitted, report) = fit_curve(&LogisticStep, &xs, &ys, x0, &params.solver);
    let model = FittedModel::step(&fitted);
    finish(guess, (start, end), fitted, report, model)
}

/// Fit a flat-top plateau around the strip centre guessed at `guess`.
///
/// `width_hint` seeds the plateau width when `seed_width` is not configured,
/// typically the separation of the two detected edges of the strip.
#[cfg_attr(feature = "tracing", instrument(level = "debug", skip(profile, params)))]
pub fn fit_peak(
    profile: &[f64],
    guess: f64,
    width_hint: Option<f64>,
    params: &FitParams,
) -> Result<PeakFit, FitError> {
    let model = FlatTopPeak {
        background: params.background,
    };
    let n = profile.len();
    if n == 0 {
        return Err(FitError::WindowTooSmall {
            guess,
            samples: 0,
            required: model.num_params(),
        });
    }
    let g = guess.round() as isize;
    let start = clamp_index(g - (params.out_edge + params.margin) as isize, n);
    let end = clamp_index(g + (params.in_edge + params.margin) as isize, n);
    check_window(guess, end + 1 - start, model.num_params())?;

    let (xs, ys) = window_samples(profile, start, end);
    let height = params.seed_height.unwrap_or_else(|| {
        ys.iter()
            .map(|&y| y - params.background)
            .fold(0.0, |acc: f64, d| if d.abs() > acc.abs() { d } else { acc })
    });
    let width = params
        .seed_width
        .or(width_hint)
        .unwrap_or((params.in_edge + params.out_edge) as f64);
    let end_grad = if params.end_grad.abs() > f64::EPSILON {
        1.0 / params.end_grad.abs()
    } else {
        1.0
    };
    let x0 = DVector::from_vec(vec![guess, width, end_grad, height]);

    let (fitted, report) = fit_curve(&model, &xs, &ys, x0, &params.solver);
    let fitted_model = FittedModel::plateau(&fitted, params.background);
    finish(guess, (start, end), fitted, report, fitted_model)
}

/// Mean resolution over fits whose resolution exceeds [`MIN_RESOLUTION`].
///
/// Returns 0.0 when no fit qualifies.
pub fn mean_resolution(fits: &[PeakFit]) -> f64 {
    let (sum, count) = fits
        .iter()
        .map(|f| f.resolution)
        .filter(|r| r.abs() > MIN_RESOLUTION)
        .fold((0.0, 0usize), |(s, c), r| (s + r, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
