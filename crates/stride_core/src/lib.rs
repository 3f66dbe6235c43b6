pub mod adaptive;
pub mod error;
pub mod fixed;
pub mod solvers;
/// The `stride_core` crate implements an adaptive-step embedded Runge-Kutta
/// integrator (Runge-Kutta-Fehlberg 4(5)) with hard-banded step-size control,
/// alongside a fixed-step explicit-Euler baseline for comparison.
///
/// Key components:
/// - **Traits**: `Scalar` (numeric type abstraction), `OdeSystem` (right-hand
///   sides), `Steppable` (fixed-increment steppers).
/// - **Solvers**: the `Rkf45` embedded pair (stages, 4th/5th-order estimates,
///   local error) and the `Euler` baseline stepper.
/// - **Adaptive**: the step-size controller and trajectory driver,
///   `integrate`, with its `ControllerConfig` and error taxonomy.
/// - **Fixed**: the uniform-partition Euler driver, `integrate_fixed`.
pub mod traits;
