use crate::traits::{DynamicalSystem, Scalar};
use serde::{Deserialize, Serialize};

/// Settings controlling the adaptive step-size machinery.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StepControl {
    /// Relative error tolerance per step.
    pub rel_tol: f64,
    /// Absolute error tolerance per step.
    pub abs_tol: f64,
    /// Initial step size. Zero selects a span-based heuristic.
    pub initial_step: f64,
    /// Smallest step size the controller may select away from the
    /// interval end; falling below it is a fatal failure.
    pub min_step: f64,
    /// Budget of internal step attempts for one integration.
    pub max_steps: usize,
}

impl Default for StepControl {
    fn default() -> Self {
        Self {
            rel_tol: 1e-6,
            abs_tol: 1e-9,
            initial_step: 0.0,
            min_step: 1e-14,
            max_steps: 100_000,
        }
    }
}

impl StepControl {
    /// Step size to open the integration with, for a span of length `span`.
    pub fn first_step(&self, span: f64) -> f64 {
        if self.initial_step > 0.0 {
            self.initial_step.min(span)
        } else {
            (span * 1e-3).max(self.min_step).min(span)
        }
    }
}

/// Dormand-Prince 5(4) Solver
///
/// Explicit embedded Runge-Kutta pair with FSAL (the 7th stage derivative
/// of an accepted step is the 1st stage of the next) and a 4th-order
/// continuous extension, so the state can be reported at arbitrary times
/// inside an accepted step without forcing internal steps onto them.
pub struct Dopri5<T: Scalar> {
    k1: Vec<T>,
    k2: Vec<T>,
    k3: Vec<T>,
    k4: Vec<T>,
    k5: Vec<T>,
    k6: Vec<T>,
    k7: Vec<T>,
    tmp: Vec<T>,
    cont1: Vec<T>,
    cont2: Vec<T>,
    cont3: Vec<T>,
    cont4: Vec<T>,
    cont5: Vec<T>,
    fsal_ready: bool,
}

impl<T: Scalar> Dopri5<T> {
    pub fn new(dim: usize) -> Self {
        let z = T::from_f64(0.0).unwrap();
        Self {
            k1: vec![z; dim],
            k2: vec![z; dim],
            k3: vec![z; dim],
            k4: vec![z; dim],
            k5: vec![z; dim],
            k6: vec![z; dim],
            k7: vec![z; dim],
            tmp: vec![z; dim],
            cont1: vec![z; dim],
            cont2: vec![z; dim],
            cont3: vec![z; dim],
            cont4: vec![z; dim],
            cont5: vec![z; dim],
            fsal_ready: false,
        }
    }

    /// Attempts one step of size `dt` from `(t, state)`, writing the
    /// 5th-order result into `proposed` and returning the scaled RMS error
    /// norm of the embedded 4th/5th-order difference. A norm <= 1 means the
    /// step satisfies the tolerances; the caller decides acceptance and must
    /// call [`Dopri5::accept`] before the next step if it advances.
    ///
    /// `state` is not modified, so a rejected step can simply be retried
    /// with a smaller `dt` (k1 stays valid for the unchanged `(t, state)`).
    pub fn propose(
        &mut self,
        system: &impl DynamicalSystem<T>,
        t: T,
        state: &[T],
        dt: T,
        control: &StepControl,
        proposed: &mut [T],
    ) -> T {
        let t0 = t;

        // Dormand-Prince node and stage coefficients
        let c2 = T::from_f64(1.0 / 5.0).unwrap();
        let c3 = T::from_f64(3.0 / 10.0).unwrap();
        let c4 = T::from_f64(4.0 / 5.0).unwrap();
        let c5 = T::from_f64(8.0 / 9.0).unwrap();

        let a21 = T::from_f64(1.0 / 5.0).unwrap();

        let a31 = T::from_f64(3.0 / 40.0).unwrap();
        let a32 = T::from_f64(9.0 / 40.0).unwrap();

        let a41 = T::from_f64(44.0 / 45.0).unwrap();
        let a42 = T::from_f64(-56.0 / 15.0).unwrap();
        let a43 = T::from_f64(32.0 / 9.0).unwrap();

        let a51 = T::from_f64(19372.0 / 6561.0).unwrap();
        let a52 = T::from_f64(-25360.0 / 2187.0).unwrap();
        let a53 = T::from_f64(64448.0 / 6561.0).unwrap();
        let a54 = T::from_f64(-212.0 / 729.0).unwrap();

        let a61 = T::from_f64(9017.0 / 3168.0).unwrap();
        let a62 = T::from_f64(-355.0 / 33.0).unwrap();
        let a63 = T::from_f64(46732.0 / 5247.0).unwrap();
        let a64 = T::from_f64(49.0 / 176.0).unwrap();
        let a65 = T::from_f64(-5103.0 / 18656.0).unwrap();

        // 5th-order weights (advance the solution)
        let b1 = T::from_f64(35.0 / 384.0).unwrap();
        let b3 = T::from_f64(500.0 / 1113.0).unwrap();
        let b4 = T::from_f64(125.0 / 192.0).unwrap();
        let b5 = T::from_f64(-2187.0 / 6784.0).unwrap();
        let b6 = T::from_f64(11.0 / 84.0).unwrap();

        // Differences against the embedded 4th-order weights
        let e1 = T::from_f64(71.0 / 57_600.0).unwrap();
        let e3 = T::from_f64(-71.0 / 16_695.0).unwrap();
        let e4 = T::from_f64(71.0 / 1_920.0).unwrap();
        let e5 = T::from_f64(-17_253.0 / 339_200.0).unwrap();
        let e6 = T::from_f64(22.0 / 525.0).unwrap();
        let e7 = T::from_f64(-1.0 / 40.0).unwrap();

        // k1, reused from the previous accepted step when possible (FSAL)
        if !self.fsal_ready {
            system.apply(t0, state, &mut self.k1);
            self.fsal_ready = true;
        }

        // k2
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * (a21 * self.k1[i]);
        }
        system.apply(t0 + c2 * dt, &self.tmp, &mut self.k2);

        // k3
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * (a31 * self.k1[i] + a32 * self.k2[i]);
        }
        system.apply(t0 + c3 * dt, &self.tmp, &mut self.k3);

        // k4
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * (a41 * self.k1[i] + a42 * self.k2[i] + a43 * self.k3[i]);
        }
        system.apply(t0 + c4 * dt, &self.tmp, &mut self.k4);

        // k5
        for i in 0..state.len() {
            self.tmp[i] = state[i]
                + dt * (a51 * self.k1[i] + a52 * self.k2[i] + a53 * self.k3[i] + a54 * self.k4[i]);
        }
        system.apply(t0 + c5 * dt, &self.tmp, &mut self.k5);

        // k6
        for i in 0..state.len() {
            self.tmp[i] = state[i]
                + dt * (a61 * self.k1[i]
                    + a62 * self.k2[i]
                    + a63 * self.k3[i]
                    + a64 * self.k4[i]
                    + a65 * self.k5[i]);
        }
        system.apply(t0 + dt, &self.tmp, &mut self.k6);

        // 5th-order solution
        for i in 0..state.len() {
            proposed[i] = state[i]
                + dt * (b1 * self.k1[i]
                    + b3 * self.k3[i]
                    + b4 * self.k4[i]
                    + b5 * self.k5[i]
                    + b6 * self.k6[i]);
        }

        // k7 = f(t + dt, proposed); becomes k1 of the next step on acceptance
        system.apply(t0 + dt, proposed, &mut self.k7);

        // Scaled RMS error norm
        let rel_tol = T::from_f64(control.rel_tol).unwrap();
        let abs_tol = T::from_f64(control.abs_tol).unwrap();
        let mut err_sq = T::from_f64(0.0).unwrap();
        for i in 0..state.len() {
            let e = dt
                * (e1 * self.k1[i]
                    + e3 * self.k3[i]
                    + e4 * self.k4[i]
                    + e5 * self.k5[i]
                    + e6 * self.k6[i]
                    + e7 * self.k7[i]);
            let scale = abs_tol + rel_tol * state[i].abs().max(proposed[i].abs());
            err_sq = err_sq + (e / scale) * (e / scale);
        }
        let n = T::from_usize(state.len()).unwrap();
        (err_sq / n).sqrt()
    }

    /// Commits the most recent proposal: the 7th stage derivative becomes
    /// the first stage of the next step.
    pub fn accept(&mut self) {
        std::mem::swap(&mut self.k1, &mut self.k7);
        self.fsal_ready = true;
    }

    /// Builds the continuous-extension coefficients for the most recent
    /// proposal over `[t, t + dt]`, where `state` and `proposed` are the
    /// same buffers given to [`Dopri5::propose`]. Must be called before
    /// [`Dopri5::interpolate`] and before [`Dopri5::accept`].
    pub fn prepare_dense(&mut self, state: &[T], proposed: &[T], dt: T) {
        let d1 = T::from_f64(-12_715_105_075.0 / 11_282_082_432.0).unwrap();
        let d3 = T::from_f64(87_487_479_700.0 / 32_700_410_799.0).unwrap();
        let d4 = T::from_f64(-10_690_763_975.0 / 1_880_347_072.0).unwrap();
        let d5 = T::from_f64(701_980_252_875.0 / 199_316_789_632.0).unwrap();
        let d6 = T::from_f64(-1_453_857_185.0 / 822_651_844.0).unwrap();
        let d7 = T::from_f64(69_997_945.0 / 29_380_423.0).unwrap();

        for i in 0..state.len() {
            let ydiff = proposed[i] - state[i];
            let bspl = dt * self.k1[i] - ydiff;
            self.cont1[i] = state[i];
            self.cont2[i] = ydiff;
            self.cont3[i] = bspl;
            self.cont4[i] = ydiff - dt * self.k7[i] - bspl;
            self.cont5[i] = dt
                * (d1 * self.k1[i]
                    + d3 * self.k3[i]
                    + d4 * self.k4[i]
                    + d5 * self.k5[i]
                    + d6 * self.k6[i]
                    + d7 * self.k7[i]);
        }
    }

    /// Evaluates the continuous extension at `theta` in [0, 1] across the
    /// step prepared by [`Dopri5::prepare_dense`]. theta = 0 recovers the
    /// step's starting state, theta = 1 its proposal.
    pub fn interpolate(&self, theta: T, out: &mut [T]) {
        let one = T::one();
        let theta1 = one - theta;
        for i in 0..out.len() {
            out[i] = self.cont1[i]
                + theta
                    * (self.cont2[i]
                        + theta1
                            * (self.cont3[i]
                                + theta * (self.cont4[i] + theta1 * self.cont5[i])));
        }
    }
}

/// Step-size update factor for a scaled error norm, clamped so a single
/// accept/reject cannot swing the step size by more than 5x either way.
pub fn step_factor(err_norm: f64) -> f64 {
    const SAFETY: f64 = 0.9;
    const MIN_FACTOR: f64 = 0.2;
    const MAX_FACTOR: f64 = 5.0;
    if err_norm == 0.0 {
        MAX_FACTOR
    } else {
        (SAFETY * err_norm.powf(-0.2)).clamp(MIN_FACTOR, MAX_FACTOR)
    }
}

#[cfg(test)]
mod tests {
    use super::{step_factor, Dopri5, StepControl};
    use crate::traits::DynamicalSystem;

    /// dy/dt = -k y, with exact solution y0 exp(-k t).
    struct Decay {
        k: f64,
    }

    impl DynamicalSystem<f64> for Decay {
        fn dimension(&self) -> usize {
            1
        }

        fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) {
            out[0] = -self.k * x[0];
        }
    }

    #[test]
    fn single_step_tracks_exponential_decay() {
        let system = Decay { k: 1.0 };
        let control = StepControl::default();
        let mut stepper = Dopri5::new(1);
        let mut proposed = [0.0];

        let err = stepper.propose(&system, 0.0, &[1.0], 0.1, &control, &mut proposed);
        assert!(err <= 1.0, "step of 0.1 should satisfy default tolerances");
        let exact = (-0.1_f64).exp();
        assert!((proposed[0] - exact).abs() < 1e-8);
    }

    #[test]
    fn oversized_step_is_flagged_by_error_norm() {
        let system = Decay { k: 1.0 };
        let control = StepControl::default();
        let mut stepper = Dopri5::new(1);
        let mut proposed = [0.0];

        let err = stepper.propose(&system, 0.0, &[1.0], 5.0, &control, &mut proposed);
        assert!(err > 1.0, "a 5-unit step cannot meet 1e-6 tolerances");
    }

    #[test]
    fn dense_output_matches_exact_solution_inside_step() {
        let system = Decay { k: 1.0 };
        let control = StepControl::default();
        let mut stepper = Dopri5::new(1);
        let state = [2.0];
        let mut proposed = [0.0];

        let err = stepper.propose(&system, 0.0, &state, 0.2, &control, &mut proposed);
        assert!(err <= 1.0);
        stepper.prepare_dense(&state, &proposed, 0.2);

        let mut out = [0.0];
        for &theta in &[0.0, 0.25, 0.5, 0.75, 1.0] {
            stepper.interpolate(theta, &mut out);
            let exact = 2.0 * (-0.2 * theta).exp();
            assert!(
                (out[0] - exact).abs() < 1e-5,
                "theta={theta}: got {}, expected {exact}",
                out[0]
            );
        }
    }

    #[test]
    fn dense_output_endpoints_are_exact() {
        let system = Decay { k: 0.7 };
        let control = StepControl::default();
        let mut stepper = Dopri5::new(1);
        let state = [3.0];
        let mut proposed = [0.0];

        stepper.propose(&system, 0.0, &state, 0.1, &control, &mut proposed);
        stepper.prepare_dense(&state, &proposed, 0.1);

        let mut out = [0.0];
        stepper.interpolate(0.0, &mut out);
        assert_eq!(out[0], state[0]);
        stepper.interpolate(1.0, &mut out);
        assert!((out[0] - proposed[0]).abs() < 1e-15);
    }

    #[test]
    fn fsal_reuse_matches_fresh_stepper() {
        let system = Decay { k: 1.3 };
        let control = StepControl::default();

        // Two consecutive steps on one stepper.
        let mut stepper = Dopri5::new(1);
        let mut mid = [0.0];
        stepper.propose(&system, 0.0, &[1.0], 0.1, &control, &mut mid);
        stepper.accept();
        let mut chained = [0.0];
        stepper.propose(&system, 0.1, &[mid[0]], 0.1, &control, &mut chained);

        // Second step recomputed from scratch.
        let mut fresh = Dopri5::new(1);
        let mut from_scratch = [0.0];
        fresh.propose(&system, 0.1, &[mid[0]], 0.1, &control, &mut from_scratch);

        assert!((chained[0] - from_scratch[0]).abs() < 1e-15);
    }

    #[test]
    fn step_factor_is_clamped() {
        assert_eq!(step_factor(0.0), 5.0);
        assert!(step_factor(1e-12) <= 5.0);
        assert!(step_factor(1e9) >= 0.2);
        let near_one = step_factor(1.0);
        assert!((near_one - 0.9).abs() < 1e-12);
    }

    #[test]
    fn first_step_heuristic_respects_span() {
        let control = StepControl::default();
        assert!(control.first_step(10.0) <= 10.0);
        assert!(control.first_step(10.0) > 0.0);

        let fixed = StepControl {
            initial_step: 0.5,
            ..StepControl::default()
        };
        assert_eq!(fixed.first_step(10.0), 0.5);
        assert_eq!(fixed.first_step(0.25), 0.25);
    }
}
