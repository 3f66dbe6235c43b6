use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// A trait for types that can be used as scalars in our integrators.
/// Must support basic arithmetic, debug printing, and conversion from f64.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// Represents an ODE right-hand side y' = f(x, y).
pub trait OdeSystem<T: Scalar> {
    /// Returns the dimension of the state space.
    fn dimension(&self) -> usize;

    /// Evaluates the derivative.
    /// x: independent variable
    /// y: current state
    /// out: buffer to write the result (dy/dx)
    fn apply(&self, x: T, y: &[T], out: &mut [T]);
}

/// A trait for steppers that advance a system by a fixed increment.
pub trait Steppable<T: Scalar> {
    /// Performs one step of size h.
    /// x: current independent variable (updated after step)
    /// state: current state (updated after step)
    /// h: step size
    fn step(&mut self, system: &impl OdeSystem<T>, x: &mut T, state: &mut [T], h: T);
}

/// Adapts a plain closure `(x, y, out)` into an [`OdeSystem`] of the given
/// dimension.
pub struct FnSystem<F> {
    dim: usize,
    f: F,
}

impl<F> FnSystem<F> {
    pub fn new(dim: usize, f: F) -> Self {
        Self { dim, f }
    }
}

impl<T, F> OdeSystem<T> for FnSystem<F>
where
    T: Scalar,
    F: Fn(T, &[T], &mut [T]),
{
    fn dimension(&self) -> usize {
        self.dim
    }

    fn apply(&self, x: T, y: &[T], out: &mut [T]) {
        (self.f)(x, y, out)
    }
}
