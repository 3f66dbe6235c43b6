use crate::traits::{OdeSystem, Scalar, Steppable};

/// Explicit Euler Solver
/// Baseline fixed-step scheme, no error control.
pub struct Euler<T: Scalar> {
    k: Vec<T>,
}

impl<T: Scalar> Euler<T> {
    pub fn new(dim: usize) -> Self {
        Self {
            k: vec![T::from_f64(0.0).unwrap(); dim],
        }
    }
}

impl<T: Scalar> Steppable<T> for Euler<T> {
    fn step(&mut self, system: &impl OdeSystem<T>, x: &mut T, state: &mut [T], h: T) {
        let x0 = *x;

        // y_next = y + h * f(x, y)
        system.apply(x0, state, &mut self.k);
        for i in 0..state.len() {
            state[i] = state[i] + h * self.k[i];
        }

        *x = x0 + h;
    }
}

/// Runge-Kutta-Fehlberg 4(5) embedded pair.
/// One evaluation produces six stages, a 4th-order and a 5th-order state
/// estimate, and their difference as a local error estimate.
pub struct Rkf45<T: Scalar> {
    k1: Vec<T>,
    k2: Vec<T>,
    k3: Vec<T>,
    k4: Vec<T>,
    k5: Vec<T>,
    k6: Vec<T>,
    tmp: Vec<T>,
    y4: Vec<T>,
    y5: Vec<T>,
}

impl<T: Scalar> Rkf45<T> {
    pub fn new(dim: usize) -> Self {
        let z = T::from_f64(0.0).unwrap();
        Self {
            k1: vec![z; dim],
            k2: vec![z; dim],
            k3: vec![z; dim],
            k4: vec![z; dim],
            k5: vec![z; dim],
            k6: vec![z; dim],
            tmp: vec![z; dim],
            y4: vec![z; dim],
            y5: vec![z; dim],
        }
    }

    /// Evaluates one candidate step of size h from (x, y) without committing
    /// it. Fills the internal 4th- and 5th-order estimates and returns the
    /// max-norm of their component-wise difference.
    pub fn embedded_step(&mut self, system: &impl OdeSystem<T>, x: T, y: &[T], h: T) -> T {
        // Fehlberg tableau, exact published rationals.
        let c2 = T::from_f64(1.0 / 4.0).unwrap();
        let c3 = T::from_f64(3.0 / 8.0).unwrap();
        let c4 = T::from_f64(12.0 / 13.0).unwrap();
        let c6 = T::from_f64(1.0 / 2.0).unwrap();

        let a21 = T::from_f64(1.0 / 4.0).unwrap();

        let a31 = T::from_f64(3.0 / 32.0).unwrap();
        let a32 = T::from_f64(9.0 / 32.0).unwrap();

        let a41 = T::from_f64(1932.0 / 2197.0).unwrap();
        let a42 = T::from_f64(-7200.0 / 2197.0).unwrap();
        let a43 = T::from_f64(7296.0 / 2197.0).unwrap();

        let a51 = T::from_f64(439.0 / 216.0).unwrap();
        let a52 = T::from_f64(-8.0).unwrap();
        let a53 = T::from_f64(3680.0 / 513.0).unwrap();
        let a54 = T::from_f64(-845.0 / 4104.0).unwrap();

        let a61 = T::from_f64(-8.0 / 27.0).unwrap();
        let a62 = T::from_f64(2.0).unwrap();
        let a63 = T::from_f64(-3544.0 / 2565.0).unwrap();
        let a64 = T::from_f64(1859.0 / 4104.0).unwrap();
        let a65 = T::from_f64(-11.0 / 40.0).unwrap();

        // 4th-order weights
        let b41 = T::from_f64(25.0 / 216.0).unwrap();
        let b43 = T::from_f64(1408.0 / 2565.0).unwrap();
        let b44 = T::from_f64(2197.0 / 4104.0).unwrap();
        let b45 = T::from_f64(-1.0 / 5.0).unwrap();

        // 5th-order weights
        let b51 = T::from_f64(16.0 / 135.0).unwrap();
        let b53 = T::from_f64(6656.0 / 12825.0).unwrap();
        let b54 = T::from_f64(28561.0 / 56430.0).unwrap();
        let b55 = T::from_f64(-9.0 / 50.0).unwrap();
        let b56 = T::from_f64(2.0 / 55.0).unwrap();

        // k1
        system.apply(x, y, &mut self.k1);

        // k2
        for i in 0..y.len() {
            self.tmp[i] = y[i] + h * (a21 * self.k1[i]);
        }
        system.apply(x + c2 * h, &self.tmp, &mut self.k2);

        // k3
        for i in 0..y.len() {
            self.tmp[i] = y[i] + h * (a31 * self.k1[i] + a32 * self.k2[i]);
        }
        system.apply(x + c3 * h, &self.tmp, &mut self.k3);

        // k4
        for i in 0..y.len() {
            self.tmp[i] = y[i] + h * (a41 * self.k1[i] + a42 * self.k2[i] + a43 * self.k3[i]);
        }
        system.apply(x + c4 * h, &self.tmp, &mut self.k4);

        // k5
        for i in 0..y.len() {
            self.tmp[i] = y[i]
                + h * (a51 * self.k1[i] + a52 * self.k2[i] + a53 * self.k3[i] + a54 * self.k4[i]);
        }
        system.apply(x + h, &self.tmp, &mut self.k5);

        // k6
        for i in 0..y.len() {
            self.tmp[i] = y[i]
                + h * (a61 * self.k1[i]
                    + a62 * self.k2[i]
                    + a63 * self.k3[i]
                    + a64 * self.k4[i]
                    + a65 * self.k5[i]);
        }
        system.apply(x + c6 * h, &self.tmp, &mut self.k6);

        // Embedded estimates and error = max |y5 - y4|
        let mut err = T::from_f64(0.0).unwrap();
        for i in 0..y.len() {
            self.y4[i] = y[i]
                + h * (b41 * self.k1[i] + b43 * self.k3[i] + b44 * self.k4[i] + b45 * self.k5[i]);
            self.y5[i] = y[i]
                + h * (b51 * self.k1[i]
                    + b53 * self.k3[i]
                    + b54 * self.k4[i]
                    + b55 * self.k5[i]
                    + b56 * self.k6[i]);
        }
        for i in 0..y.len() {
            let diff = (self.y5[i] - self.y4[i]).abs();
            if !diff.is_finite() {
                // Float::max would mask a NaN component; surface it instead.
                return diff;
            }
            err = err.max(diff);
        }
        err
    }

    /// 4th-order estimate of the most recent [`Rkf45::embedded_step`].
    pub fn fourth_order(&self) -> &[T] {
        &self.y4
    }

    /// 5th-order estimate of the most recent [`Rkf45::embedded_step`].
    pub fn fifth_order(&self) -> &[T] {
        &self.y5
    }
}

impl<T: Scalar> Steppable<T> for Rkf45<T> {
    /// Fixed-step advance using the 5th-order estimate.
    fn step(&mut self, system: &impl OdeSystem<T>, x: &mut T, state: &mut [T], h: T) {
        let x0 = *x;
        self.embedded_step(system, x0, state, h);
        state.copy_from_slice(&self.y5);
        *x = x0 + h;
    }
}
