//! Profile models fitted around strip edges.
//!
//! Both models are smooth in every parameter and come with analytic
//! gradients so the solver never has to difference numerically.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

/// A 1-D model `f(x; p)` with an analytic gradient.
pub trait ProfileModel {
    fn num_params(&self) -> usize;

    fn eval(&self, params: &DVector<f64>, x: f64) -> f64;

    /// Write `df/dp_k` for every parameter into `out`.
    fn gradient(&self, params: &DVector<f64>, x: f64, out: &mut [f64]);

    /// Reject parameter sets the model cannot evaluate.
    fn is_valid(&self, params: &DVector<f64>) -> bool {
        params.iter().all(|p| p.is_finite())
    }
}

#[inline]
fn logistic(t: f64) -> f64 {
    1.0 / (1.0 + (-t).exp())
}

/// Logistic step `f(x) = height / (1 + exp((centre - x) / slope)) + background`.
///
/// Parameter order: `[height, centre, slope, background]`. A positive slope
/// rises with `x`, a negative one falls. `|slope|` is the edge resolution in
/// pixels.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogisticStep;

impl LogisticStep {
    pub const HEIGHT: usize = 0;
    pub const CENTRE: usize = 1;
    pub const SLOPE: usize = 2;
    pub const BACKGROUND: usize = 3;
}

impl ProfileModel for LogisticStep {
    fn num_params(&self) -> usize {
        4
    }

    fn eval(&self, p: &DVector<f64>, x: f64) -> f64 {
        let z = (p[Self::CENTRE] - x) / p[Self::SLOPE];
        p[Self::HEIGHT] * logistic(-z) + p[Self::BACKGROUND]
    }

    fn gradient(&self, p: &DVector<f64>, x: f64, out: &mut [f64]) {
        let (height, slope) = (p[Self::HEIGHT], p[Self::SLOPE]);
        let z = (p[Self::CENTRE] - x) / slope;
        let s = logistic(-z);
        let ds = s * (1.0 - s);
        out[Self::HEIGHT] = s;
        out[Self::CENTRE] = -height * ds / slope;
        out[Self::SLOPE] = height * ds * z / slope;
        out[Self::BACKGROUND] = 1.0;
    }

    fn is_valid(&self, p: &DVector<f64>) -> bool {
        p.iter().all(|v| v.is_finite()) && p[Self::SLOPE].abs() > f64::EPSILON
    }
}

/// Flat-top plateau on a fixed background:
/// `f(x) = background + height * (σ(g (x - c + w/2)) - σ(g (x - c - w/2)))`.
///
/// Parameter order: `[centre, width, end_grad, height]`. A negative height
/// describes a shadow on a bright background.
#[derive(Clone, Copy, Debug)]
pub struct FlatTopPeak {
    pub background: f64,
}

impl FlatTopPeak {
    pub const CENTRE: usize = 0;
    pub const WIDTH: usize = 1;
    pub const END_GRAD: usize = 2;
    pub const HEIGHT: usize = 3;
}

impl ProfileModel for FlatTopPeak {
    fn num_params(&self) -> usize {
        4
    }

    fn eval(&self, p: &DVector<f64>, x: f64) -> f64 {
        let (c, w, g, h) = (p[Self::CENTRE], p[Self::WIDTH], p[Self::END_GRAD], p[Self::HEIGHT]);
        let rise = logistic(g * (x - c + 0.5 * w));
        let fall = logistic(g * (x - c - 0.5 * w));
        self.background + h * (rise - fall)
    }

    fn gradient(&self, p: &DVector<f64>, x: f64, out: &mut [f64]) {
        let (c, w, g, h) = (p[Self::CENTRE], p[Self::WIDTH], p[Self::END_GRAD], p[Self::HEIGHT]);
        let (u1, u2) = (x - c + 0.5 * w, x - c - 0.5 * w);
        let (s1, s2) = (logistic(g * u1), logistic(g * u2));
        let (d1, d2) = (s1 * (1.0 - s1), s2 * (1.0 - s2));
        out[Self::CENTRE] = h * g * (d2 - d1);
        out[Self::WIDTH] = 0.5 * h * g * (d1 + d2);
        out[Self::END_GRAD] = h * (d1 * u1 - d2 * u2);
        out[Self::HEIGHT] = s1 - s2;
    }
}

/// A fitted model with its parameters, kept for diagnostics.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FittedModel {
    Step {
        height: f64,
        centre: f64,
        slope: f64,
        background: f64,
    },
    Plateau {
        centre: f64,
        width: f64,
        end_grad: f64,
        height: f64,
        background: f64,
    },
}

impl FittedModel {
    pub(crate) fn step(p: &DVector<f64>) -> Self {
        FittedModel::Step {
            height: p[LogisticStep::HEIGHT],
            centre: p[LogisticStep::CENTRE],
            slope: p[LogisticStep::SLOPE],
            background: p[LogisticStep::BACKGROUND],
        }
    }

    pub(crate) fn plateau(p: &DVector<f64>, background: f64) -> Self {
        FittedModel::Plateau {
            centre: p[FlatTopPeak::CENTRE],
            width: p[FlatTopPeak::WIDTH],
            end_grad: p[FlatTopPeak::END_GRAD],
            height: p[FlatTopPeak::HEIGHT],
            background,
        }
    }

    pub fn centre(&self) -> f64 {
        match *self {
            FittedModel::Step { centre, .. } | FittedModel::Plateau { centre, .. } => centre,
        }
    }

    /// Resolution metric: `|slope|` for a step, `|width|` for a plateau.
    pub fn resolution(&self) -> f64 {
        match *self {
            FittedModel::Step { slope, .. } => slope.abs(),
            FittedModel::Plateau { width, .. } => width.abs(),
        }
    }

    pub fn eval(&self, x: f64) -> f64 {
        match *self {
            FittedModel::Step {
                height,
                centre,
                slope,
                background,
            } => LogisticStep.eval(&DVector::from_vec(vec![height, centre, slope, background]), x),
            FittedModel::Plateau {
                centre,
                width,
                end_grad,
                height,
                background,
            } => FlatTopPeak { background }
                .eval(&DVector::from_vec(vec![centre, width, end_grad, height]), x),
        }
    }
}
