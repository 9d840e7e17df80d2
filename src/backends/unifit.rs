//! Legacy Levenberg-Marquardt backend.
//!
//! Every iteration recomputes a forward-difference Jacobian and solves the
//! damped normal equations `(JᵀJ + λ diag(JᵀJ)) δ = -Jᵀr` through an SVD
//! pseudo-inverse. The damping is searched on a fixed ladder relative to the
//! previously accepted value; the first rung that lowers the sum of squares
//! wins. When no rung helps, the current point is taken as the minimum.
//! Steps are clamped per parameter and projected into the parameter limits.
//!
//! Errors follow Bard (7-5-13): `covar = pinv(JᵀJ) * SS / dof`.

use super::residual::ResidualProblem;
use super::{reduced_chisqr, Backend, BackendOutcome, ModelFn};
use crate::config::FitOptions;
use crate::dataset::Dataset;
use crate::error::Result;
use crate::parameters::{Bounds, Parameter};
use crate::uncertainty::{calculate_covariance, pseudo_inverse};
use ndarray::{Array1, Array2};

/// Damping multipliers tried in order, relative to the last accepted damping.
pub const DAMPING_LADDER: [f64; 5] = [0.1, 1.0, 1e2, 1e4, 1e6];

const MIN_LAMBDA: f64 = 1e-15;

/// Settings of the `unifit` backend.
#[derive(Debug, Clone, PartialEq)]
pub struct UnifitConfig {
    pub max_iterations: usize,
    /// Fractional sum-of-squares improvement considered converged
    pub ftol: f64,
    /// Largest parameter change, relative to `max(|value|, 1)`, considered converged
    pub xtol: f64,
    pub initial_lambda: f64,
    /// Largest step per iteration, relative to `max(|value|, 1)`
    pub max_step: Option<f64>,
    pub epsilon: Option<f64>,
}

impl Default for UnifitConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            ftol: 1e-8,
            xtol: 1e-6,
            initial_lambda: 1e-2,
            max_step: None,
            epsilon: None,
        }
    }
}

impl UnifitConfig {
    pub fn from_options(options: &FitOptions) -> Result<Self> {
        let mut config = Self::default();
        if let Some(n) = options.get_usize("max_iterations")? {
            config.max_iterations = n;
        }
        if let Some(v) = options.get_positive_f64("ftol")? {
            config.ftol = v;
        }
        if let Some(v) = options.get_positive_f64("xtol")? {
            config.xtol = v;
        }
        if let Some(v) = options.get_positive_f64("initial_lambda")? {
            config.initial_lambda = v;
        }
        config.max_step = options.get_positive_f64("max_step")?;
        config.epsilon = options.get_positive_f64("epsilon")?;
        Ok(config)
    }
}

/// Backend registered as `unifit`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnifitBackend;

fn sum_of_squares(r: &Array1<f64>) -> f64 {
    r.iter().map(|v| v * v).sum()
}

/// Damped step `-pinv(JᵀJ + λ diag(JᵀJ)) Jᵀr`; zero diagonals are damped by `λ`.
fn damped_step(jtj: &Array2<f64>, jtr: &Array1<f64>, lambda: f64) -> Result<Array1<f64>> {
    let mut a = jtj.clone();
    for i in 0..a.nrows() {
        let d = jtj[[i, i]];
        a[[i, i]] += lambda * if d > 0.0 { d } else { 1.0 };
    }
    Ok(-pseudo_inverse(&a)?.dot(jtr))
}

/// Limit each component to `max_step * max(|p|, 1)`; true if anything was cut.
fn clamp_step(step: &mut Array1<f64>, params: &Array1<f64>, max_step: f64) -> bool {
    let mut clamped = false;
    for (d, p) in step.iter_mut().zip(params.iter()) {
        let limit = max_step * p.abs().max(1.0);
        if d.abs() > limit {
            *d = limit.copysign(*d);
            clamped = true;
        }
    }
    clamped
}

pub(crate) struct Minimum {
    pub params: Array1<f64>,
    pub ss: f64,
    pub iterations: usize,
    pub success: bool,
    pub message: String,
}

/// Damped least squares from `start`, with every trial point projected into `bounds`.
pub(crate) fn minimize(
    problem: &ResidualProblem<'_>,
    bounds: &[Bounds],
    start: Array1<f64>,
    config: &UnifitConfig,
) -> Result<Minimum> {
    let mut params = start;
    let mut ss = sum_of_squares(&problem.finite_residuals(&params)?);
    let mut lambda = config.initial_lambda;
    let mut warned = false;

    let done = |params, ss, iterations, success, message: &str| Minimum {
        params,
        ss,
        iterations,
        success,
        message: message.to_string(),
    };

    if problem.n_free() == 0 {
        return Ok(done(params, ss, 0, true, "No free parameters"));
    }

    for iteration in 1..=config.max_iterations {
        if ss == 0.0 {
            return Ok(done(params, ss, iteration - 1, true, "Exact fit"));
        }

        let r = problem.residuals(&params)?;
        let jac = problem.jacobian_at(&params)?;
        let jtj = jac.t().dot(&jac);
        let jtr = jac.t().dot(&r);

        let mut accepted = None;
        for factor in DAMPING_LADDER {
            let trial_lambda = (lambda * factor).max(MIN_LAMBDA);
            let mut step = damped_step(&jtj, &jtr, trial_lambda)?;
            if let Some(max_step) = config.max_step {
                if clamp_step(&mut step, &params, max_step) && !warned {
                    log::warn!("unifit: step clamped to max_step = {}", max_step);
                    warned = true;
                }
            }
            let trial = Array1::from_iter(
                (&params + &step)
                    .iter()
                    .zip(bounds)
                    .map(|(&v, b)| b.clamp(v)),
            );
            let trial_ss = sum_of_squares(&problem.residuals(&trial)?);
            if trial_ss.is_finite() && trial_ss < ss {
                accepted = Some((trial, trial_ss, trial_lambda));
                break;
            }
        }

        let Some((trial, trial_ss, trial_lambda)) = accepted else {
            return Ok(done(
                params,
                ss,
                iteration - 1,
                true,
                "Assumed minimum: no damping level lowers the sum of squares",
            ));
        };

        let improvement = (ss - trial_ss) / ss;
        let change = trial
            .iter()
            .zip(params.iter())
            .map(|(new, old)| (new - old).abs() / old.abs().max(1.0))
            .fold(0.0, f64::max);
        log::debug!(
            "unifit iteration {}: ss = {:.6e}, lambda = {:.1e}",
            iteration,
            trial_ss,
            trial_lambda
        );

        params = trial;
        ss = trial_ss;
        lambda = trial_lambda;
        if improvement < config.ftol && change < config.xtol {
            return Ok(done(params, ss, iteration, true, "Converged"));
        }
    }

    Ok(done(
        params,
        ss,
        config.max_iterations,
        false,
        "Maximum number of iterations reached",
    ))
}

impl Backend for UnifitBackend {
    fn name(&self) -> &'static str {
        "unifit"
    }

    fn supports_bounds(&self) -> bool {
        true
    }

    fn do_fit(
        &self,
        data: &Dataset,
        fcn: &ModelFn<'_>,
        params: &mut [&mut Parameter],
        options: &FitOptions,
    ) -> Result<BackendOutcome> {
        let config = UnifitConfig::from_options(options)?;
        let problem = ResidualProblem::new(data, fcn, params)?.with_epsilon(config.epsilon);
        let bounds = problem
            .free_indices()
            .iter()
            .map(|&i| params[i].bounds())
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let minimum = minimize(&problem, &bounds, problem.initial(), &config)?;

        let n_free = problem.n_free();
        let chisqr = reduced_chisqr(minimum.ss, problem.n_points(), n_free);
        let covar = if n_free > 0 {
            let jac = problem.jacobian_at(&minimum.params)?;
            Some(calculate_covariance(&jac, chisqr)?)
        } else {
            None
        };
        problem.write_back(params, &minimum.params, covar.as_ref())?;

        log::info!(
            "unifit fit finished after {} iterations: chisqr = {:.6e} ({})",
            minimum.iterations,
            chisqr,
            minimum.message
        );
        Ok(BackendOutcome {
            success: minimum.success,
            message: minimum.message,
            chisqr,
            iterations: minimum.iterations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::resolver::ParamValues;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn gauss(values: &ParamValues, x: &Array1<f64>) -> Result<Array1<f64>> {
        let (pos, ampl, width) = (values["pos"], values["ampl"], values["width"]);
        Ok(x.mapv(|x| ampl * (-(x - pos).powi(2) / (2.0 * width * width)).exp()))
    }

    fn data() -> Dataset {
        let x = Array1::<f64>::linspace(-5.0, 5.0, 41);
        let y = x.mapv(|x| 3.0 * (-(x - 0.5).powi(2) / 2.0).exp() + 0.02 * (7.0 * x).sin());
        Dataset::new(x, y, Array1::from_elem(41, 0.05)).unwrap()
    }

    fn params(ampl: f64) -> Vec<Parameter> {
        vec![
            Parameter::new("pos", 0.0).unwrap(),
            Parameter::new("ampl", ampl).unwrap(),
            Parameter::new("width", 1.5).unwrap(),
        ]
    }

    #[test]
    fn test_unifit_gauss() {
        let data = data();
        let mut params = params(2.0);
        let mut refs: Vec<&mut Parameter> = params.iter_mut().collect();
        let outcome = UnifitBackend
            .do_fit(&data, &gauss, &mut refs, &FitOptions::new())
            .unwrap();
        assert!(outcome.success, "{}", outcome.message);
        assert_relative_eq!(params[0].value, 0.5, epsilon = 2e-2);
        assert_relative_eq!(params[1].value, 3.0, epsilon = 2e-2);
        assert_relative_eq!(params[2].value.abs(), 1.0, epsilon = 2e-2);
        assert!(params[1].error.unwrap() > 0.0);
        assert!(params[1].correl.contains_key("width"));
    }

    #[test]
    fn test_unifit_iteration_cap_is_soft() {
        let data = data();
        let mut params = params(0.5);
        let mut refs: Vec<&mut Parameter> = params.iter_mut().collect();
        let options = FitOptions::new().with("max_iterations", 1);
        let outcome = UnifitBackend.do_fit(&data, &gauss, &mut refs, &options).unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.iterations, 1);
        assert_ne!(params[1].value, 0.5);
    }

    #[test]
    fn test_converges_onto_zero() {
        // the quadratic term is orthogonal to both columns, so b ends at zero
        let x = Array1::<f64>::linspace(-2.0, 2.0, 21);
        let mean_sq = x.mapv(|x| x * x).mean().unwrap();
        let y = x.mapv(|x| 2.0 * x + 0.05 * (x * x - mean_sq));
        let data = Dataset::new(x, y, Array1::from_elem(21, 1.0)).unwrap();
        let line = |values: &ParamValues, x: &Array1<f64>| -> Result<Array1<f64>> {
            Ok(x.mapv(|x| values["a"] * x + values["b"]))
        };

        let mut params = vec![
            Parameter::new("a", 1.0).unwrap(),
            Parameter::new("b", 0.5).unwrap(),
        ];
        let mut refs: Vec<&mut Parameter> = params.iter_mut().collect();
        let outcome = UnifitBackend
            .do_fit(&data, &line, &mut refs, &FitOptions::new())
            .unwrap();
        assert_eq!(outcome.message, "Converged");
        assert!(outcome.iterations < 10);
        assert_relative_eq!(params[0].value, 2.0, epsilon = 1e-6);
        assert!(params[1].value.abs() < 1e-6);
    }

    #[test]
    fn test_damped_step_and_clamp() {
        let jtj = array![[4.0, 0.0], [0.0, 0.0]];
        let jtr = array![2.0, 0.0];
        let step = damped_step(&jtj, &jtr, 1.0).unwrap();
        assert_relative_eq!(step[0], -0.25);
        assert_relative_eq!(step[1], 0.0);

        let mut step = array![5.0, -0.1];
        assert!(clamp_step(&mut step, &array![2.0, 0.0], 0.5));
        assert_eq!(step, array![1.0, -0.1]);
    }
}
