use crate::traits::{DynamicalSystem, Scalar};
use serde::{Deserialize, Serialize};

/// State-space dimension of the two-species competition system.
pub const DIMENSION: usize = 2;

/// Parameters of the Lotka-Volterra competition equations.
///
/// The carrying capacities `k1` and `k2` must be positive for the model to
/// be meaningful; the model itself performs no validation (it is the hot
/// inner-loop function), so a zero capacity yields NaN/Inf derivatives that
/// propagate downstream. Validation happens once at the simulation boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompetitionParameters {
    /// Intrinsic growth rate of species 1.
    pub r1: f64,
    /// Intrinsic growth rate of species 2.
    pub r2: f64,
    /// Per-capita effect of species 2 on species 1.
    pub a: f64,
    /// Per-capita effect of species 1 on species 2.
    pub b: f64,
    /// Carrying capacity of species 1.
    pub k1: f64,
    /// Carrying capacity of species 2.
    pub k2: f64,
}

/// The two-species Lotka-Volterra competition vector field:
///
/// dN1/dt = r1 N1 (1 - (N1 + a N2) / K1)
/// dN2/dt = r2 N2 (1 - (N2 + b N1) / K2)
///
/// Pure and stateless: no side effects, deterministic for given inputs.
/// A zero population is a fixed point of its own equation, so N1 = 0 keeps
/// dN1/dt = 0 exactly regardless of species 2.
#[derive(Debug, Clone, Copy)]
pub struct CompetitionModel {
    params: CompetitionParameters,
}

impl CompetitionModel {
    pub fn new(params: CompetitionParameters) -> Self {
        Self { params }
    }

    pub fn parameters(&self) -> &CompetitionParameters {
        &self.params
    }
}

impl<T: Scalar> DynamicalSystem<T> for CompetitionModel {
    fn dimension(&self) -> usize {
        DIMENSION
    }

    fn apply(&self, _t: T, x: &[T], out: &mut [T]) {
        let one = T::one();
        let r1 = T::from_f64(self.params.r1).unwrap();
        let r2 = T::from_f64(self.params.r2).unwrap();
        let a = T::from_f64(self.params.a).unwrap();
        let b = T::from_f64(self.params.b).unwrap();
        let k1 = T::from_f64(self.params.k1).unwrap();
        let k2 = T::from_f64(self.params.k2).unwrap();

        let n1 = x[0];
        let n2 = x[1];

        out[0] = r1 * n1 * (one - (n1 + a * n2) / k1);
        out[1] = r2 * n2 * (one - (n2 + b * n1) / k2);
    }
}

#[cfg(test)]
mod tests {
    use super::{CompetitionModel, CompetitionParameters};
    use crate::traits::DynamicalSystem;

    fn params() -> CompetitionParameters {
        CompetitionParameters {
            r1: 0.5,
            r2: 0.8,
            a: 0.3,
            b: 0.6,
            k1: 100.0,
            k2: 80.0,
        }
    }

    #[test]
    fn vector_field_matches_hand_computation() {
        let model = CompetitionModel::new(params());
        assert_eq!(*model.parameters(), params());
        let mut out = [0.0_f64; 2];
        model.apply(0.0, &[10.0, 20.0], &mut out);

        // dN1/dt = 0.5 * 10 * (1 - (10 + 0.3*20) / 100) = 5 * 0.84
        assert!((out[0] - 4.2).abs() < 1e-12);
        // dN2/dt = 0.8 * 20 * (1 - (20 + 0.6*10) / 80) = 16 * 0.675
        assert!((out[1] - 10.8).abs() < 1e-12);
    }

    #[test]
    fn zero_population_has_zero_derivative() {
        let model = CompetitionModel::new(params());
        let mut out = [f64::NAN; 2];
        model.apply(0.0, &[0.0, 55.0], &mut out);
        assert_eq!(out[0], 0.0);
        assert!(out[1].is_finite());

        model.apply(0.0, &[0.0, 0.0], &mut out);
        assert_eq!(out, [0.0, 0.0]);
    }

    #[test]
    fn zero_carrying_capacity_propagates_non_finite() {
        let mut p = params();
        p.k1 = 0.0;
        let model = CompetitionModel::new(p);
        let mut out = [0.0_f64; 2];
        model.apply(0.0, &[10.0, 20.0], &mut out);
        assert!(!out[0].is_finite());
        assert!(out[1].is_finite());
    }

    #[test]
    fn deterministic_for_identical_inputs() {
        let model = CompetitionModel::new(params());
        let mut first = [0.0_f64; 2];
        let mut second = [0.0_f64; 2];
        model.apply(3.0, &[42.5, 17.25], &mut first);
        model.apply(3.0, &[42.5, 17.25], &mut second);
        assert_eq!(first, second);
    }
}
