//! Drives a vector field over a sample grid and records the trajectory.

use crate::error::{EngineError, NumericalFailure, Result};
use crate::solvers::{Tsit5, RK4};
use crate::traits::{DynamicalSystem, Steppable};
use log::{debug, trace};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IntegrationMethod {
    /// Tsitouras 5(4) with local error control.
    #[default]
    Tsit5Adaptive,
    /// Classic RK4 with the largest step not exceeding `max_dt` that divides
    /// each sample interval evenly.
    Rk4 { max_dt: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    pub method: IntegrationMethod,
    pub rtol: f64,
    pub atol: f64,
    pub max_steps: usize,
    /// First trial step of the adaptive method; estimated when absent.
    pub initial_step: Option<f64>,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            method: IntegrationMethod::Tsit5Adaptive,
            rtol: 1e-8,
            atol: 1e-8,
            max_steps: 100_000,
            initial_step: None,
        }
    }
}

impl SolverSettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.rtol.is_finite() && self.rtol > 0.0) {
            return Err(EngineError::invalid("rtol", "must be positive"));
        }
        if !(self.atol.is_finite() && self.atol > 0.0) {
            return Err(EngineError::invalid("atol", "must be positive"));
        }
        if self.max_steps == 0 {
            return Err(EngineError::invalid("max_steps", "must be greater than zero"));
        }
        if let Some(step) = self.initial_step {
            if !(step.is_finite() && step > 0.0) {
                return Err(EngineError::invalid("initial_step", "must be positive"));
            }
        }
        if let IntegrationMethod::Rk4 { max_dt } = self.method {
            if !(max_dt.is_finite() && max_dt > 0.0) {
                return Err(EngineError::invalid("max_dt", "must be positive"));
            }
        }
        Ok(())
    }
}

/// `samples` evenly spaced points spanning `[0, samples]`, endpoints
/// included. One day of horizon maps to one sample, so the spacing is
/// `samples / (samples - 1)` rather than exactly one day.
pub fn sample_grid(samples: usize) -> Vec<f64> {
    match samples {
        0 => Vec::new(),
        1 => vec![0.0],
        n => {
            let end = n as f64;
            let spacing = end / (n - 1) as f64;
            (0..n)
                .map(|i| if i == n - 1 { end } else { i as f64 * spacing })
                .collect()
        }
    }
}

/// Compartment values sampled over time. Row `k` holds the state at
/// `times[k]`; values are stored row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    times: Vec<f64>,
    dimension: usize,
    values: Vec<f64>,
}

impl Trajectory {
    pub fn new(dimension: usize) -> Self {
        Self {
            times: Vec::new(),
            dimension,
            values: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, time: f64, state: &[f64]) {
        debug_assert_eq!(state.len(), self.dimension);
        self.times.push(time);
        self.values.extend_from_slice(state);
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn row(&self, index: usize) -> &[f64] {
        &self.values[index * self.dimension..(index + 1) * self.dimension]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        self.values.chunks_exact(self.dimension.max(1))
    }

    pub fn first(&self) -> Option<&[f64]> {
        (!self.is_empty()).then(|| self.row(0))
    }

    pub fn last(&self) -> Option<&[f64]> {
        (!self.is_empty()).then(|| self.row(self.len() - 1))
    }

    pub fn column(&self, index: usize) -> Vec<f64> {
        self.rows().map(|row| row[index]).collect()
    }

    /// The same samples restricted to the columns in `range`.
    pub fn select_columns(&self, range: std::ops::Range<usize>) -> Trajectory {
        let mut sub = Trajectory::new(range.len());
        for (time, row) in self.times.iter().zip(self.rows()) {
            sub.push(*time, &row[range.clone()]);
        }
        sub
    }
}

/// Solves `dy/dt = f(t, y)` from `initial` at `times[0]` and samples the
/// solution at every entry of `times`, which must be finite and
/// non-decreasing. Each call is independent; no state is retained.
pub fn integrate(
    system: &impl DynamicalSystem<f64>,
    initial: &[f64],
    times: &[f64],
    settings: &SolverSettings,
) -> Result<Trajectory> {
    settings.validate()?;
    let dim = system.dimension();
    if initial.len() != dim {
        return Err(EngineError::DimensionMismatch {
            expected: dim,
            actual: initial.len(),
        });
    }
    if times.is_empty() {
        return Err(EngineError::invalid("times", "sample grid is empty"));
    }
    if times.iter().any(|t| !t.is_finite()) || times.windows(2).any(|w| w[1] < w[0]) {
        return Err(EngineError::invalid(
            "times",
            "sample grid must be finite and non-decreasing",
        ));
    }
    if initial.iter().any(|v| !v.is_finite()) {
        return Err(EngineError::invalid("initial_state", "values must be finite"));
    }

    debug!(
        "integrating {dim}-dimensional system over {} samples with {:?}",
        times.len(),
        settings.method
    );

    match settings.method {
        IntegrationMethod::Tsit5Adaptive => integrate_adaptive(system, initial, times, settings),
        IntegrationMethod::Rk4 { max_dt } => {
            integrate_fixed(system, initial, times, max_dt, settings.max_steps)
        }
    }
}

fn non_finite(time: f64) -> EngineError {
    EngineError::NumericalFailure {
        time,
        failure: NumericalFailure::NonFiniteDerivative,
    }
}

fn scaled_rms(values: &[f64], reference: &[f64], settings: &SolverSettings) -> f64 {
    let sum: f64 = values
        .iter()
        .zip(reference)
        .map(|(v, y)| {
            let ratio = v / (settings.atol + settings.rtol * y.abs());
            ratio * ratio
        })
        .sum();
    (sum / values.len().max(1) as f64).sqrt()
}

/// Starting step from the size of the state relative to its derivative.
fn initial_step_guess(
    system: &impl DynamicalSystem<f64>,
    t0: f64,
    y0: &[f64],
    span: f64,
    settings: &SolverSettings,
) -> Result<f64> {
    if let Some(step) = settings.initial_step {
        return Ok(step.min(span));
    }
    let mut f0 = vec![0.0; y0.len()];
    system.apply(t0, y0, &mut f0);
    if f0.iter().any(|v| !v.is_finite()) {
        return Err(non_finite(t0));
    }
    let d0 = scaled_rms(y0, y0, settings);
    let d1 = scaled_rms(&f0, y0, settings);
    let guess = if d0 < 1e-5 || d1 < 1e-5 {
        1e-6
    } else {
        0.01 * d0 / d1
    };
    Ok(guess.min(span))
}

fn integrate_adaptive(
    system: &impl DynamicalSystem<f64>,
    initial: &[f64],
    times: &[f64],
    settings: &SolverSettings,
) -> Result<Trajectory> {
    const SAFETY: f64 = 0.9;
    const MIN_FACTOR: f64 = 0.2;
    const MAX_FACTOR: f64 = 5.0;

    let dim = initial.len();
    let mut trajectory = Trajectory::new(dim);
    let mut solver = Tsit5::new(dim);
    let mut state = initial.to_vec();
    let mut t = times[0];
    trajectory.push(t, &state);

    let span = times[times.len() - 1] - t;
    if span == 0.0 {
        for &time in &times[1..] {
            trajectory.push(time, &state);
        }
        return Ok(trajectory);
    }

    let mut h = initial_step_guess(system, t, &state, span, settings)?;
    let mut accepted = 0usize;
    let mut rejected = 0usize;

    for &target in &times[1..] {
        while t < target {
            if accepted + rejected >= settings.max_steps {
                return Err(EngineError::NumericalFailure {
                    time: t,
                    failure: NumericalFailure::MaxStepsExceeded {
                        steps: settings.max_steps,
                    },
                });
            }

            let remaining = target - t;
            let clipped = h >= remaining;
            let dt = if clipped { remaining } else { h };

            let attempt = solver.attempt(system, t, &state, dt, settings.rtol, settings.atol);
            if !attempt.start_derivative_finite {
                return Err(non_finite(t));
            }

            let err = attempt.error_norm;
            let candidate_finite = solver.candidate().iter().all(|v| v.is_finite());
            if err.is_finite() && err <= 1.0 && candidate_finite {
                state.copy_from_slice(solver.candidate());
                t = if clipped { target } else { t + dt };
                accepted += 1;

                let factor = if err == 0.0 {
                    MAX_FACTOR
                } else {
                    (SAFETY * err.powf(-0.2)).clamp(MIN_FACTOR, MAX_FACTOR)
                };
                // A step shortened to land on a sample says nothing about
                // the step the dynamics allow, so never shrink h because of it.
                h = if clipped { h.max(dt * factor) } else { dt * factor };
            } else {
                rejected += 1;
                let factor = if err.is_finite() && candidate_finite {
                    (SAFETY * err.powf(-0.2)).clamp(MIN_FACTOR, 1.0)
                } else {
                    MIN_FACTOR
                };
                h = dt * factor;
                trace!("rejected step at t = {t}: dt = {dt:e}, error norm = {err:e}");

                if h <= 16.0 * f64::EPSILON * t.abs().max(1.0) {
                    return Err(EngineError::NumericalFailure {
                        time: t,
                        failure: NumericalFailure::StepSizeUnderflow { step: h },
                    });
                }
            }
        }
        trajectory.push(target, &state);
    }

    debug!("adaptive integration finished: {accepted} accepted, {rejected} rejected steps");
    Ok(trajectory)
}

fn integrate_fixed(
    system: &impl DynamicalSystem<f64>,
    initial: &[f64],
    times: &[f64],
    max_dt: f64,
    max_steps: usize,
) -> Result<Trajectory> {
    let dim = initial.len();
    let mut trajectory = Trajectory::new(dim);
    let mut solver = RK4::new(dim);
    let mut state = initial.to_vec();
    let mut t = times[0];
    let mut steps = 0usize;
    trajectory.push(t, &state);

    for &target in &times[1..] {
        let interval = target - t;
        if interval > 0.0 {
            let substeps = (interval / max_dt).ceil().max(1.0) as usize;
            let dt = interval / substeps as f64;
            for _ in 0..substeps {
                if steps >= max_steps {
                    return Err(EngineError::NumericalFailure {
                        time: t,
                        failure: NumericalFailure::MaxStepsExceeded { steps: max_steps },
                    });
                }
                let start = t;
                solver.step(system, &mut t, &mut state, dt);
                steps += 1;
                if state.iter().any(|v| !v.is_finite()) {
                    return Err(non_finite(start));
                }
            }
            t = target;
        }
        trajectory.push(target, &state);
    }

    debug!("fixed-step integration finished: {steps} steps");
    Ok(trajectory)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Decay {
        rate: f64,
    }

    impl DynamicalSystem<f64> for Decay {
        fn dimension(&self) -> usize {
            1
        }

        fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) {
            out[0] = -self.rate * x[0];
        }
    }

    /// Harmonic oscillator x'' = -x.
    struct Oscillator;

    impl DynamicalSystem<f64> for Oscillator {
        fn dimension(&self) -> usize {
            2
        }

        fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) {
            out[0] = x[1];
            out[1] = -x[0];
        }
    }

    struct Singular;

    impl DynamicalSystem<f64> for Singular {
        fn dimension(&self) -> usize {
            1
        }

        fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) {
            out[0] = 1.0 / (x[0] - x[0]);
        }
    }

    /// A source that jumps from zero to a huge constant the instant time
    /// leaves its start. No step size resolves the jump to tolerance.
    struct SwitchedSource;

    impl DynamicalSystem<f64> for SwitchedSource {
        fn dimension(&self) -> usize {
            1
        }

        fn apply(&self, t: f64, _x: &[f64], out: &mut [f64]) {
            out[0] = if t > 0.0 { 1e12 } else { 0.0 };
        }
    }

    fn assert_err_contains<T: std::fmt::Debug>(result: Result<T>, needle: &str) {
        let err = result.expect_err("expected error");
        let message = format!("{err}");
        assert!(
            message.contains(needle),
            "expected error to contain \"{needle}\", got \"{message}\""
        );
    }

    #[test]
    fn sample_grid_spans_horizon_with_horizon_points() {
        let grid = sample_grid(5);
        assert_eq!(grid.len(), 5);
        assert_eq!(grid[0], 0.0);
        assert_eq!(grid[4], 5.0);
        assert!((grid[1] - 1.25).abs() < 1e-15);
        assert_eq!(sample_grid(1), vec![0.0]);
        assert!(sample_grid(0).is_empty());
    }

    #[test]
    fn adaptive_solution_matches_exponential_decay() {
        let times = sample_grid(50);
        let trajectory = integrate(
            &Decay { rate: 0.1 },
            &[7.0],
            &times,
            &SolverSettings::default(),
        )
        .unwrap();
        assert_eq!(trajectory.len(), 50);
        for (t, row) in trajectory.times().iter().zip(trajectory.rows()) {
            let exact = 7.0 * (-0.1 * t).exp();
            assert!(
                (row[0] - exact).abs() <= 1e-6 * exact,
                "t = {t}: {} vs {exact}",
                row[0]
            );
        }
    }

    #[test]
    fn adaptive_solution_tracks_oscillator_phase() {
        let times = sample_grid(20);
        let trajectory = integrate(&Oscillator, &[1.0, 0.0], &times, &SolverSettings::default())
            .unwrap();
        let last = trajectory.last().unwrap();
        let t_end = *trajectory.times().last().unwrap();
        assert!((last[0] - t_end.cos()).abs() < 1e-6);
        assert!((last[1] + t_end.sin()).abs() < 1e-6);
    }

    #[test]
    fn fixed_step_rk4_is_an_alternative() {
        let settings = SolverSettings {
            method: IntegrationMethod::Rk4 { max_dt: 0.05 },
            ..SolverSettings::default()
        };
        let times = sample_grid(10);
        let trajectory = integrate(&Decay { rate: 0.2 }, &[1.0], &times, &settings).unwrap();
        let last = trajectory.last().unwrap()[0];
        assert!((last - (-2.0f64).exp()).abs() < 1e-8);
    }

    #[test]
    fn non_finite_derivative_is_reported() {
        let times = sample_grid(10);
        let result = integrate(&Singular, &[1.0], &times, &SolverSettings::default());
        assert!(matches!(
            result,
            Err(EngineError::NumericalFailure {
                failure: NumericalFailure::NonFiniteDerivative,
                ..
            })
        ));

        let settings = SolverSettings {
            method: IntegrationMethod::Rk4 { max_dt: 0.5 },
            ..SolverSettings::default()
        };
        let result = integrate(&Singular, &[1.0], &times, &settings);
        assert!(result.unwrap_err().is_numerical());
    }

    #[test]
    fn unresolvable_jump_underflows_the_step_size() {
        let result = integrate(
            &SwitchedSource,
            &[0.0],
            &sample_grid(10),
            &SolverSettings::default(),
        );
        match result {
            Err(EngineError::NumericalFailure {
                time,
                failure: NumericalFailure::StepSizeUnderflow { step },
            }) => {
                assert_eq!(time, 0.0);
                assert!(step > 0.0 && step <= 16.0 * f64::EPSILON, "step {step:e}");
            }
            other => panic!("expected step size underflow, got {other:?}"),
        }
    }

    #[test]
    fn step_budget_is_enforced() {
        let settings = SolverSettings {
            max_steps: 3,
            ..SolverSettings::default()
        };
        let times = sample_grid(100);
        assert_err_contains(
            integrate(&Oscillator, &[1.0, 0.0], &times, &settings),
            "exceeded the budget of 3 steps",
        );
    }

    #[test]
    fn rejects_malformed_inputs() {
        let settings = SolverSettings::default();
        assert_err_contains(
            integrate(&Decay { rate: 1.0 }, &[1.0, 2.0], &[0.0, 1.0], &settings),
            "expected 1, got 2",
        );
        assert_err_contains(
            integrate(&Decay { rate: 1.0 }, &[1.0], &[], &settings),
            "sample grid is empty",
        );
        assert_err_contains(
            integrate(&Decay { rate: 1.0 }, &[1.0], &[1.0, 0.0], &settings),
            "non-decreasing",
        );
        let bad = SolverSettings {
            rtol: 0.0,
            ..SolverSettings::default()
        };
        assert_err_contains(
            integrate(&Decay { rate: 1.0 }, &[1.0], &[0.0, 1.0], &bad),
            "rtol",
        );
    }

    #[test]
    fn single_sample_returns_initial_state() {
        let trajectory = integrate(
            &Decay { rate: 1.0 },
            &[3.0],
            &sample_grid(1),
            &SolverSettings::default(),
        )
        .unwrap();
        assert_eq!(trajectory.len(), 1);
        assert_eq!(trajectory.row(0), &[3.0]);
    }

    #[test]
    fn trajectory_accessors() {
        let mut trajectory = Trajectory::new(2);
        trajectory.push(0.0, &[1.0, 2.0]);
        trajectory.push(1.0, &[3.0, 4.0]);
        assert_eq!(trajectory.column(1), vec![2.0, 4.0]);
        assert_eq!(trajectory.last(), Some(&[3.0, 4.0][..]));
        let sub = trajectory.select_columns(1..2);
        assert_eq!(sub.dimension(), 1);
        assert_eq!(sub.values(), &[2.0, 4.0]);
        assert!(Trajectory::new(3).first().is_none());
    }
}
