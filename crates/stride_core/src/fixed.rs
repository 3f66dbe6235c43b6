use crate::solvers::Euler;
use crate::traits::{OdeSystem, Steppable};
use anyhow::{bail, Result};
use serde::Serialize;

/// Explicit-Euler run over a uniform partition; the coarse baseline the
/// adaptive trajectory is compared against.
#[derive(Debug, Clone, Serialize)]
pub struct FixedTrajectory {
    /// Corrected step size actually used, (x_end - x0) / intervals.
    pub h: f64,
    pub xs: Vec<f64>,
    pub states: Vec<Vec<f64>>,
}

/// Integrates y' = f(x, y) with explicit Euler over the uniform partition
/// closest to the requested step size.
///
/// The interval count is `round((x_end - x0) / h)` and the step is corrected
/// so the partition lands exactly on both endpoints. No error control.
pub fn integrate_fixed(
    system: &impl OdeSystem<f64>,
    x0: f64,
    y0: &[f64],
    x_end: f64,
    h: f64,
) -> Result<FixedTrajectory> {
    if y0.is_empty() {
        bail!("Initial state must have positive dimension.");
    }
    if y0.len() != system.dimension() {
        bail!(
            "Initial state dimension mismatch. Expected {}, got {}.",
            system.dimension(),
            y0.len()
        );
    }
    if !x0.is_finite() || !x_end.is_finite() || x_end <= x0 {
        bail!("Domain must satisfy x0 < x_end and be finite.");
    }
    if !(h > 0.0 && h.is_finite()) {
        bail!("Step size h must be positive and finite.");
    }

    let span = x_end - x0;
    let intervals = ((span / h).round() as usize).max(1);
    let h = span / intervals as f64;

    let mut stepper = Euler::new(y0.len());
    let mut x = x0;
    let mut y = y0.to_vec();
    let mut xs = Vec::with_capacity(intervals + 1);
    let mut states = Vec::with_capacity(intervals + 1);
    xs.push(x0);
    states.push(y.clone());

    for i in 1..=intervals {
        stepper.step(system, &mut x, &mut y, h);
        if y.iter().any(|v| !v.is_finite()) {
            bail!("Non-finite state produced at x = {}.", x);
        }
        // Recompute the abscissa from the partition so accumulated roundoff
        // never drifts the grid off the endpoints.
        x = if i == intervals {
            x_end
        } else {
            x0 + h * i as f64
        };
        xs.push(x);
        states.push(y.clone());
    }

    Ok(FixedTrajectory { h, xs, states })
}
