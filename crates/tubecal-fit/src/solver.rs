use crate::model::ProfileModel;
use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use nalgebra::{storage::Owned, DMatrix, DVector, Dyn};
use serde::{Deserialize, Serialize};

/// Levenberg-Marquardt stopping criteria.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveOptions {
    pub ftol: f64,
    pub xtol: f64,
    pub gtol: f64,
    /// Evaluation budget, in multiples of `num_params + 1`.
    pub patience: usize,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            ftol: 1.49012e-8,
            xtol: 1.49012e-8,
            gtol: 0.0,
            patience: 200,
        }
    }
}

/// Outcome of one curve fit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolveReport {
    pub evaluations: usize,
    /// Half the sum of squared residuals at the solution.
    pub final_cost: f64,
    pub converged: bool,
    pub termination: String,
}

/// Least-squares residuals `model(x_i) - y_i` over one fit window.
struct CurveFitProblem<'a, M: ProfileModel> {
    model: &'a M,
    xs: &'a [f64],
    ys: &'a [f64],
    params: DVector<f64>,
}

impl<M: ProfileModel> LeastSquaresProblem<f64, Dyn, Dyn> for CurveFitProblem<'_, M> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        self.params.clone_from(x);
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        if !self.model.is_valid(&self.params) {
            return None;
        }
        let r = DVector::from_iterator(
            self.xs.len(),
            self.xs
                .iter()
                .zip(self.ys)
                .map(|(&x, &y)| self.model.eval(&self.params, x) - y),
        );
        r.iter().all(|v| v.is_finite()).then_some(r)
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        if !self.model.is_valid(&self.params) {
            return None;
        }
        let n = self.model.num_params();
        let mut jac = DMatrix::zeros(self.xs.len(), n);
        let mut row = vec![0.0; n];
        for (i, &x) in self.xs.iter().enumerate() {
            self.model.gradient(&self.params, x, &mut row);
            for (k, &d) in row.iter().enumerate() {
                jac[(i, k)] = d;
            }
        }
        jac.iter().all(|v| v.is_finite()).then_some(jac)
    }
}

/// Fit `model` to the samples `(xs, ys)` starting from `x0`.
pub fn fit_curve<M: ProfileModel>(
    model: &M,
    xs: &[f64],
    ys: &[f64],
    x0: DVector<f64>,
    opts: &SolveOptions,
) -> (DVector<f64>, SolveReport) {
    let lm = LevenbergMarquardt::new()
        .with_ftol(opts.ftol)
        .with_xtol(opts.xtol)
        .with_gtol(opts.gtol)
        .with_patience(opts.patience.max(1));

    let problem = CurveFitProblem {
        model,
        xs,
        ys,
        params: x0,
    };

    let (problem, report) = lm.minimize(problem);
    (
        problem.params,
        SolveReport {
            evaluations: report.number_of_evaluations,
            final_cost: report.objective_function,
            converged: report.termination.was_successful(),
            termination: format!("{:?}", report.termination),
        },
    )
}
