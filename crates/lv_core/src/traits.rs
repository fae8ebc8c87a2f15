use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// Floating-point scalar used throughout the dynamics code: anything that
/// behaves like an IEEE float and can be lifted from `f64` constants.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// A continuous-time dynamical system dy/dt = f(t, y).
///
/// The integrator sees models only through this trait: it asks for the
/// state-space dimension once, then repeatedly evaluates the vector field
/// into a caller-provided buffer, so the hot loop allocates nothing.
pub trait DynamicalSystem<T: Scalar> {
    /// State-space dimension of the system.
    fn dimension(&self) -> usize;

    /// Writes dy/dt at `(t, x)` into `out`.
    fn apply(&self, t: T, x: &[T], out: &mut [T]);
}
