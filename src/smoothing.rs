use crate::cancel::CancelToken;
use crate::config::SmoothingConfig;
use crate::error::{CalResult, CalibrationError};
use argmin::core::{CostFunction, Error, Executor, State};
use argmin::solver::goldensectionsearch::GoldenSectionSearch;

/// Fewest samples for which the smoothing fit is defined
pub const MIN_FIT_SAMPLES: usize = 2;

const ALPHA_BOUNDS: (f64, f64) = (0.0, 1.0);
const ALPHA_START: f64 = 0.5;

/// Result of fitting simple exponential smoothing to one signal
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SmoothingFit {
    /// Fitted smoothing level in [0, 1]
    pub alpha: f64,
    /// Final smoothed level
    pub level: f64,
    /// Sum of squared one-step-ahead errors at `alpha`
    pub sse: f64,
    pub iterations: usize,
}

impl SmoothingFit {
    /// One-step-ahead forecast. For simple exponential smoothing this is the final level.
    pub fn forecast(&self) -> f64 {
        self.level
    }
}

/// Sum of squared one-step-ahead errors as a function of alpha.
/// Polls the cancel token on every evaluation.
struct SmoothingCost<'a> {
    values: &'a [f64],
    cancel: &'a CancelToken,
}

impl CostFunction for SmoothingCost<'_> {
    type Param = f64;
    type Output = f64;

    fn cost(&self, alpha: &Self::Param) -> Result<Self::Output, Error> {
        self.cancel.check()?;
        Ok(smooth(self.values, *alpha).0)
    }
}

/// Single-parameter exponential smoothing with a fitted alpha
///
/// Level recursion: `l_0 = y_0`, `l_t = l_{t-1} + alpha * (y_t - l_{t-1})`.
/// Alpha is chosen by golden-section search over [0, 1] minimizing the sum of
/// squared one-step-ahead errors; both endpoints are also evaluated since the
/// search only converges to interior minima.
#[derive(Clone, Debug)]
pub struct ExpSmoother {
    tolerance: f64,
    max_iterations: usize,
}

impl ExpSmoother {
    pub fn new(tolerance: f64, max_iterations: usize) -> Self {
        ExpSmoother {
            tolerance: tolerance.max(f64::EPSILON),
            max_iterations,
        }
    }

    pub fn from_config(config: &SmoothingConfig) -> Self {
        Self::new(config.tolerance, config.max_iterations)
    }

    /// Fit alpha to `values`. The token is polled on every cost evaluation.
    pub fn fit(&self, values: &[f64], cancel: &CancelToken) -> CalResult<SmoothingFit> {
        if values.len() < MIN_FIT_SAMPLES {
            return Err(CalibrationError::DegenerateGravityEstimate {
                available: values.len(),
                required: MIN_FIT_SAMPLES,
            });
        }

        let (interior, iterations) = self.search(values, cancel).map_err(fit_error)?;

        let mut alpha = interior;
        let (mut sse, mut level) = smooth(values, alpha);
        for edge in [ALPHA_BOUNDS.0, ALPHA_BOUNDS.1] {
            let (edge_sse, edge_level) = smooth(values, edge);
            if edge_sse < sse {
                alpha = edge;
                sse = edge_sse;
                level = edge_level;
            }
        }

        if !level.is_finite() {
            return Err(CalibrationError::DegenerateGravityEstimate {
                available: values.len(),
                required: MIN_FIT_SAMPLES,
            });
        }

        Ok(SmoothingFit {
            alpha,
            level,
            sse,
            iterations,
        })
    }

    /// Best interior alpha and the iteration count
    fn search(&self, values: &[f64], cancel: &CancelToken) -> Result<(f64, usize), Error> {
        let solver = GoldenSectionSearch::new(ALPHA_BOUNDS.0, ALPHA_BOUNDS.1)?
            .with_tolerance(self.tolerance)?;
        let max_iters = self.max_iterations as u64;
        let result = Executor::new(SmoothingCost { values, cancel }, solver)
            .configure(|state| state.param(ALPHA_START).max_iters(max_iters))
            .run()?;

        let state = result.state();
        let alpha = state.get_best_param().copied().unwrap_or(ALPHA_START);
        Ok((alpha, state.get_iter() as usize))
    }
}

/// Returns (sse, final level) for a fixed alpha
fn smooth(values: &[f64], alpha: f64) -> (f64, f64) {
    let mut level = values[0];
    let mut sse = 0.0;
    for &value in &values[1..] {
        let error = value - level;
        sse += error * error;
        level += alpha * error;
    }
    (sse, level)
}

/// Cancellation raised inside the cost function comes back through argmin unchanged
fn fit_error(error: Error) -> CalibrationError {
    match error.downcast::<CalibrationError>() {
        Ok(e) => e,
        Err(other) => CalibrationError::SmoothingFailed(other.to_string()),
    }
}

impl Default for ExpSmoother {
    fn default() -> Self {
        Self::from_config(&SmoothingConfig::default())
    }
}
