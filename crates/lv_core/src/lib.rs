//! The `lv_core` crate simulates the two-species Lotka-Volterra competition
//! model: two coupled logistic equations whose species compete for a shared
//! resource.
//!
//! Key components:
//! - **Traits**: `Scalar` (numeric type abstraction), `DynamicalSystem` (the
//!   model/integrator seam).
//! - **Model**: the competition vector field and its parameters.
//! - **Solvers**: a Dormand-Prince 5(4) integrator with adaptive internal
//!   steps and dense output at requested times.
//! - **Simulate**: the solve boundary — a fixed 100-sample output grid over
//!   an arbitrary horizon, with typed failure modes.
//! - **Equilibrium**: closed-form equilibria with Jacobian eigenvalues and
//!   stability classification.

pub mod equilibrium;
pub mod model;
pub mod simulate;
pub mod solvers;
pub mod traits;
