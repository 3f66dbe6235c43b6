use crate::error::IntegrationError;
use crate::solvers::Rkf45;
use crate::traits::OdeSystem;
use log::warn;
use serde::{Deserialize, Serialize};

/// Tunables of the hard-banded step-size controller.
///
/// The controller never scales the step continuously; it doubles below
/// `err_min`, halves above `err_max`, and keeps the step inside the band.
/// Band boundaries belong to the keep-as-is band.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Smallest step the rejection loop may shrink to.
    pub h_min: f64,
    /// Largest step the acceptance growth may reach.
    pub h_max: f64,
    /// Error below which the step is accepted and doubled.
    pub err_min: f64,
    /// Error above which the step is rejected and halved.
    pub err_max: f64,
    /// Retry budget of the per-step rejection loop.
    pub max_stage_iterations: usize,
    /// Macro-step budget for a whole run.
    pub max_steps: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            h_min: 1e-5,
            h_max: 5e-1,
            err_min: 1e-7,
            err_max: 1e-5,
            max_stage_iterations: 100,
            max_steps: 1000,
        }
    }
}

impl ControllerConfig {
    /// Checked once before any stepping; the controller itself never
    /// re-validates.
    pub fn validate(&self) -> Result<(), IntegrationError> {
        let invalid = |reason: &str| IntegrationError::InvalidConfig {
            reason: reason.to_string(),
        };
        if !(self.h_min > 0.0 && self.h_min.is_finite()) {
            return Err(invalid("h_min must be positive and finite"));
        }
        if !(self.h_max > 0.0 && self.h_max.is_finite()) {
            return Err(invalid("h_max must be positive and finite"));
        }
        if self.h_min > self.h_max {
            return Err(invalid("h_min must not exceed h_max"));
        }
        if !(self.err_min > 0.0 && self.err_min.is_finite()) {
            return Err(invalid("err_min must be positive and finite"));
        }
        if !(self.err_max > 0.0 && self.err_max.is_finite()) {
            return Err(invalid("err_max must be positive and finite"));
        }
        if self.err_min >= self.err_max {
            return Err(invalid("err_min must be strictly below err_max"));
        }
        if self.max_stage_iterations == 0 {
            return Err(invalid("max_stage_iterations must be at least 1"));
        }
        if self.max_steps == 0 {
            return Err(invalid("max_steps must be at least 1"));
        }
        Ok(())
    }
}

/// Outcome of one controller macro-step (inner retry loop included).
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    /// False only when the retry budget forced an out-of-band estimate
    /// through.
    pub accepted: bool,
    /// Abscissa after the step; equals the right endpoint exactly when the
    /// trial was endpoint-clamped.
    pub x: f64,
    /// 5th-order state estimate at `x`.
    pub y: Vec<f64>,
    /// Step size the accepted trial actually used.
    pub h_used: f64,
    /// Step size the controller carries into the next macro-step.
    pub next_h: f64,
    /// Local error estimate of the accepted trial.
    pub error: f64,
    /// Number of trials spent, 1 when the first candidate landed in band.
    pub trials: usize,
    /// True when the retry budget ran out.
    pub budget_exhausted: bool,
    /// True when `x` reached the right endpoint.
    pub reached_end: bool,
}

/// One accepted sample of an adaptive run.
#[derive(Debug, Clone, Serialize)]
pub struct TrajectorySample {
    pub x: f64,
    pub y: Vec<f64>,
    /// Step size that produced this sample; 0 for the initial condition.
    pub h: f64,
    /// Local error estimate of this sample; 0 for the initial condition.
    pub error: f64,
}

/// Append-only record of an adaptive run, first sample is the initial
/// condition.
#[derive(Debug, Clone, Serialize)]
pub struct Trajectory {
    pub samples: Vec<TrajectorySample>,
    /// Total RHS evaluations, six per trial.
    pub rhs_evals: usize,
    /// Trials discarded by the rejection loop across the whole run.
    pub rejected_trials: usize,
    /// Macro-steps whose retry budget ran out (recovered, see [`StepResult`]).
    pub budget_breaches: usize,
}

impl Trajectory {
    fn seeded(x0: f64, y0: &[f64]) -> Self {
        Self {
            samples: vec![TrajectorySample {
                x: x0,
                y: y0.to_vec(),
                h: 0.0,
                error: 0.0,
            }],
            rhs_evals: 0,
            rejected_trials: 0,
            budget_breaches: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Last accepted sample; the trajectory always holds at least the
    /// initial condition.
    pub fn last(&self) -> &TrajectorySample {
        self.samples.last().expect("trajectory is never empty")
    }
}

/// Runs the accept/reject loop for a single macro-step from (x, y).
///
/// The candidate step is clamped to land on `x_end` for the trial only; the
/// carried-forward step size follows the band rules. Rejections halve the
/// trial step (floored at `h_min`, re-clamped to the endpoint) and retry the
/// same (x, y) until the band accepts or the retry budget runs out, in which
/// case the last estimate is forced through as a recoverable degradation.
pub fn controlled_step(
    stages: &mut Rkf45<f64>,
    system: &impl OdeSystem<f64>,
    x: f64,
    y: &[f64],
    h: f64,
    x_end: f64,
    config: &ControllerConfig,
) -> Result<StepResult, IntegrationError> {
    let gap = x_end - x;
    let mut h_try = h;
    let mut lands_on_end = false;
    if h_try >= gap {
        h_try = gap;
        lands_on_end = true;
    }

    let mut trials = 0usize;
    loop {
        trials += 1;
        let error = stages.embedded_step(system, x, y, h_try);
        if !error.is_finite() {
            return Err(IntegrationError::NonFiniteState { x });
        }

        let in_band = error >= config.err_min && error <= config.err_max;
        let grow = error < config.err_min;
        let out_of_budget = trials >= config.max_stage_iterations;

        if grow || in_band || out_of_budget {
            let y_new = stages.fifth_order().to_vec();
            if y_new.iter().any(|v| !v.is_finite()) {
                return Err(IntegrationError::NonFiniteState { x });
            }
            let next_h = if grow {
                (2.0 * h_try).min(config.h_max)
            } else {
                h_try
            };
            let x_new = if lands_on_end { x_end } else { x + h_try };
            return Ok(StepResult {
                accepted: grow || in_band,
                x: x_new,
                y: y_new,
                h_used: h_try,
                next_h,
                error,
                trials,
                budget_exhausted: !(grow || in_band),
                reached_end: lands_on_end,
            });
        }

        // Rejection: halve, floor at h_min, never overshoot the endpoint.
        let shrunk = (h_try / 2.0).max(config.h_min);
        if shrunk >= gap {
            h_try = gap;
            lands_on_end = true;
        } else {
            h_try = shrunk;
            lands_on_end = false;
        }
    }
}

/// Integrates y' = f(x, y) from (x0, y0) to `x_end` with RKF45 under
/// hard-banded step-size control.
///
/// Returns the full accepted trajectory, whose final sample lies exactly at
/// `x_end`. The initial step is clamped into `[h_min, h_max]`. Inner
/// retry-budget exhaustion is logged and counted on the trajectory; outer
/// budget exhaustion, invalid inputs, and non-finite states are fatal.
pub fn integrate(
    system: &impl OdeSystem<f64>,
    x0: f64,
    y0: &[f64],
    x_end: f64,
    h0: f64,
    config: ControllerConfig,
) -> Result<Trajectory, IntegrationError> {
    config.validate()?;
    let invalid = |reason: &str| IntegrationError::InvalidDomain {
        reason: reason.to_string(),
    };
    if y0.is_empty() {
        return Err(invalid("initial state must have positive dimension"));
    }
    if y0.len() != system.dimension() {
        return Err(invalid("initial state dimension does not match the system"));
    }
    if y0.iter().any(|v| !v.is_finite()) {
        return Err(invalid("initial state must be finite"));
    }
    if !x0.is_finite() || !x_end.is_finite() || x_end <= x0 {
        return Err(invalid("domain must satisfy x0 < x_end and be finite"));
    }
    if !(h0 > 0.0 && h0.is_finite()) {
        return Err(invalid("initial step size must be positive and finite"));
    }

    let mut stages = Rkf45::new(y0.len());
    let mut trajectory = Trajectory::seeded(x0, y0);
    let mut x = x0;
    let mut y = y0.to_vec();
    let mut h = h0.clamp(config.h_min, config.h_max);

    for _ in 0..config.max_steps {
        let step = controlled_step(&mut stages, system, x, &y, h, x_end, &config)?;

        trajectory.rhs_evals += 6 * step.trials;
        trajectory.rejected_trials += step.trials - 1;
        if step.budget_exhausted {
            trajectory.budget_breaches += 1;
            warn!(
                "step-size retry budget ({}) exhausted at x = {}; \
                 continuing with error estimate {:.3e}",
                config.max_stage_iterations, x, step.error
            );
        }

        x = step.x;
        h = step.next_h;
        trajectory.samples.push(TrajectorySample {
            x,
            y: step.y.clone(),
            h: step.h_used,
            error: step.error,
        });
        y = step.y;

        if step.reached_end {
            return Ok(trajectory);
        }
    }

    Err(IntegrationError::OuterBudgetExceeded {
        steps: config.max_steps,
        x_reached: x,
    })
}

#[cfg(test)]
mod tests {
    use super::{integrate, ControllerConfig};
    use crate::error::IntegrationError;
    use crate::traits::FnSystem;

    fn exponential(rate: f64) -> FnSystem<impl Fn(f64, &[f64], &mut [f64])> {
        FnSystem::new(1, move |_x, y: &[f64], out: &mut [f64]| {
            out[0] = rate * y[0];
        })
    }

    fn assert_invalid_config(config: ControllerConfig, needle: &str) {
        let system = exponential(-10.0);
        let err = integrate(&system, 0.0, &[1.0], 1.0, 0.5, config)
            .expect_err("expected configuration rejection");
        match err {
            IntegrationError::InvalidConfig { reason } => assert!(
                reason.contains(needle),
                "expected reason to contain \"{needle}\", got \"{reason}\""
            ),
            other => panic!("expected InvalidConfig, got {other:?}"),
        }
    }

    #[test]
    fn rejects_inverted_error_band() {
        let config = ControllerConfig {
            err_min: 1e-5,
            err_max: 1e-7,
            ..ControllerConfig::default()
        };
        assert_invalid_config(config, "err_min");
    }

    #[test]
    fn rejects_inverted_step_bounds_and_zero_budgets() {
        assert_invalid_config(
            ControllerConfig {
                h_min: 1.0,
                h_max: 0.5,
                ..ControllerConfig::default()
            },
            "h_min",
        );
        assert_invalid_config(
            ControllerConfig {
                err_max: -1.0,
                ..ControllerConfig::default()
            },
            "err_max",
        );
        assert_invalid_config(
            ControllerConfig {
                max_stage_iterations: 0,
                ..ControllerConfig::default()
            },
            "max_stage_iterations",
        );
        assert_invalid_config(
            ControllerConfig {
                max_steps: 0,
                ..ControllerConfig::default()
            },
            "max_steps",
        );
    }

    #[test]
    fn rejects_invalid_domain_and_state() {
        let system = exponential(-10.0);
        let bad = |result: Result<_, IntegrationError>| {
            assert!(matches!(
                result.expect_err("expected domain rejection"),
                IntegrationError::InvalidDomain { .. }
            ));
        };
        bad(integrate(&system, 0.0, &[], 1.0, 0.5, ControllerConfig::default()));
        bad(integrate(&system, 1.0, &[1.0], 1.0, 0.5, ControllerConfig::default()));
        bad(integrate(&system, 0.0, &[1.0], 1.0, 0.0, ControllerConfig::default()));
        bad(integrate(
            &system,
            0.0,
            &[f64::NAN],
            1.0,
            0.5,
            ControllerConfig::default(),
        ));
    }

    #[test]
    fn decaying_exponential_reaches_endpoint_accurately() {
        let system = exponential(-10.0);
        let trajectory = integrate(&system, 0.0, &[1.0], 1.0, 0.5, ControllerConfig::default())
            .expect("integration should succeed");

        let last = trajectory.last();
        assert_eq!(last.x, 1.0);
        let exact = (-10.0_f64).exp();
        assert!(
            (last.y[0] - exact).abs() < 1e-4,
            "endpoint value {} vs exact {exact}",
            last.y[0]
        );
        assert_eq!(trajectory.budget_breaches, 0);
    }

    #[test]
    fn accepted_abscissae_are_strictly_increasing() {
        let system = exponential(-10.0);
        let trajectory = integrate(&system, 0.0, &[1.0], 1.0, 0.5, ControllerConfig::default())
            .expect("integration should succeed");

        for pair in trajectory.samples.windows(2) {
            assert!(pair[1].x > pair[0].x);
            assert!(pair[1].x <= 1.0);
        }
    }

    #[test]
    fn step_sizes_stay_inside_bounds_except_final_clamp() {
        let config = ControllerConfig::default();
        let system = exponential(-10.0);
        let trajectory =
            integrate(&system, 0.0, &[1.0], 1.0, 0.37, config).expect("integration should succeed");

        let n = trajectory.samples.len();
        for (idx, sample) in trajectory.samples.iter().enumerate().skip(1) {
            assert!(sample.h <= config.h_max);
            if idx + 1 < n {
                assert!(sample.h >= config.h_min);
            }
        }
    }

    #[test]
    fn accepted_errors_respect_the_upper_band() {
        let config = ControllerConfig::default();
        let system = exponential(-10.0);
        let trajectory =
            integrate(&system, 0.0, &[1.0], 1.0, 0.5, config).expect("integration should succeed");

        assert_eq!(trajectory.budget_breaches, 0);
        for sample in trajectory.samples.iter().skip(1) {
            assert!(sample.error <= config.err_max);
        }
    }

    #[test]
    fn step_sizes_shrink_then_stabilize() {
        // With h0 = 0.5 the first trials are far too coarse for the decay
        // rate; the controller has to cut the step sharply before settling.
        let system = exponential(-10.0);
        let trajectory = integrate(&system, 0.0, &[1.0], 1.0, 0.5, ControllerConfig::default())
            .expect("integration should succeed");

        assert!(trajectory.rejected_trials > 0);
        let first_accepted = trajectory.samples[1].h;
        assert!(first_accepted < 0.5 / 4.0);
    }

    #[test]
    fn reruns_are_bit_identical() {
        let system = exponential(-10.0);
        let a = integrate(&system, 0.0, &[1.0], 1.0, 0.5, ControllerConfig::default())
            .expect("integration should succeed");
        let b = integrate(&system, 0.0, &[1.0], 1.0, 0.5, ControllerConfig::default())
            .expect("integration should succeed");

        assert_eq!(a.samples.len(), b.samples.len());
        assert_eq!(a.rhs_evals, b.rhs_evals);
        for (lhs, rhs) in a.samples.iter().zip(&b.samples) {
            assert_eq!(lhs.x.to_bits(), rhs.x.to_bits());
            assert_eq!(lhs.h.to_bits(), rhs.h.to_bits());
            assert_eq!(lhs.error.to_bits(), rhs.error.to_bits());
            for (l, r) in lhs.y.iter().zip(&rhs.y) {
                assert_eq!(l.to_bits(), r.to_bits());
            }
        }
    }

    #[test]
    fn endpoint_is_exact_for_awkward_domains() {
        let system = exponential(-2.0);
        for (x0, x_end, h0) in [(0.0, 1.1, 0.37), (-0.3, 0.7, 0.5), (0.0, 0.013, 0.5)] {
            let trajectory = integrate(&system, x0, &[1.0], x_end, h0, ControllerConfig::default())
                .expect("integration should succeed");
            assert_eq!(trajectory.last().x, x_end);
        }
    }

    #[test]
    fn exhausted_retry_budget_degrades_instead_of_failing() {
        // A fast-growing system with a floor on h and a single trial per
        // macro-step: every step is forced through out of band.
        let system = exponential(50.0);
        let config = ControllerConfig {
            h_min: 0.3,
            err_max: 1e-10,
            err_min: 1e-12,
            max_stage_iterations: 1,
            ..ControllerConfig::default()
        };
        let trajectory = integrate(&system, 0.0, &[1.0], 1.0, 0.5, config)
            .expect("budget exhaustion is recoverable");

        assert!(trajectory.budget_breaches > 0);
        assert_eq!(trajectory.last().x, 1.0);
        assert!(trajectory.samples.iter().any(|s| s.error > config.err_max));
    }

    #[test]
    fn outer_budget_exhaustion_is_fatal() {
        let system = exponential(-10.0);
        let config = ControllerConfig {
            h_max: 1e-3,
            max_steps: 5,
            ..ControllerConfig::default()
        };
        let err = integrate(&system, 0.0, &[1.0], 1.0, 1e-3, config)
            .expect_err("run cannot finish in five steps");
        match err {
            IntegrationError::OuterBudgetExceeded { steps, x_reached } => {
                assert_eq!(steps, 5);
                assert!(x_reached < 1.0);
            }
            other => panic!("expected OuterBudgetExceeded, got {other:?}"),
        }
    }

    #[test]
    fn non_finite_rhs_is_fatal() {
        let system = FnSystem::new(1, |_x, _y: &[f64], out: &mut [f64]| {
            out[0] = f64::NAN;
        });
        let err = integrate(&system, 0.0, &[1.0], 1.0, 0.5, ControllerConfig::default())
            .expect_err("NaN derivative must not be silently propagated");
        assert!(matches!(err, IntegrationError::NonFiniteState { .. }));
    }

    #[test]
    fn initial_step_is_clamped_into_bounds() {
        let config = ControllerConfig::default();
        let system = exponential(-10.0);
        let trajectory =
            integrate(&system, 0.0, &[1.0], 1.0, 10.0, config).expect("integration should succeed");

        for sample in trajectory.samples.iter().skip(1) {
            assert!(sample.h <= config.h_max);
        }
    }

    #[test]
    fn two_dimensional_oscillator_round_trip() {
        // y'' = -y as a first-order system; one full period returns to the
        // initial condition.
        let system = FnSystem::new(2, |_x, y: &[f64], out: &mut [f64]| {
            out[0] = y[1];
            out[1] = -y[0];
        });
        let period = 2.0 * std::f64::consts::PI;
        let trajectory = integrate(
            &system,
            0.0,
            &[1.0, 0.0],
            period,
            0.5,
            ControllerConfig::default(),
        )
        .expect("integration should succeed");

        let last = trajectory.last();
        assert_eq!(last.x, period);
        assert!((last.y[0] - 1.0).abs() < 1e-3);
        assert!(last.y[1].abs() < 1e-3);
    }
}
