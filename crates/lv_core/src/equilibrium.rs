use crate::model::CompetitionParameters;
use anyhow::{bail, Result};
use nalgebra::{Complex, Matrix2};
use serde::{Deserialize, Serialize};

/// Denominators smaller than this make the coexistence point ill-defined.
const DEGENERACY_EPS: f64 = 1e-12;
/// Real parts smaller than this are treated as zero when classifying.
const HYPERBOLICITY_EPS: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EquilibriumKind {
    /// Both species extinct: (0, 0).
    Extinction,
    /// Species 1 at carrying capacity, species 2 extinct: (K1, 0).
    Species1Only,
    /// Species 2 at carrying capacity, species 1 extinct: (0, K2).
    Species2Only,
    /// Both species present, populations set by the interaction balance.
    Coexistence,
}

/// Linear stability classification from the Jacobian's eigenvalues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stability {
    StableNode,
    StableSpiral,
    UnstableNode,
    UnstableSpiral,
    Saddle,
    /// An eigenvalue with (numerically) zero real part; the linearization
    /// does not decide stability.
    NonHyperbolic,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ComplexNumber {
    pub re: f64,
    pub im: f64,
}

impl From<Complex<f64>> for ComplexNumber {
    fn from(value: Complex<f64>) -> Self {
        Self {
            re: value.re,
            im: value.im,
        }
    }
}

/// An equilibrium of the competition system together with its local
/// linearization data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Equilibrium {
    pub kind: EquilibriumKind,
    pub state: [f64; 2],
    /// Row-major 2x2 Jacobian of the vector field at `state`.
    pub jacobian: [[f64; 2]; 2],
    pub eigenvalues: [ComplexNumber; 2],
    pub stability: Stability,
}

/// Analytic Jacobian of the competition vector field at `state`.
pub fn jacobian(params: &CompetitionParameters, state: [f64; 2]) -> Matrix2<f64> {
    let CompetitionParameters {
        r1,
        r2,
        a,
        b,
        k1,
        k2,
    } = *params;
    let [n1, n2] = state;
    Matrix2::new(
        r1 * (1.0 - (2.0 * n1 + a * n2) / k1),
        -r1 * a * n1 / k1,
        -r2 * b * n2 / k2,
        r2 * (1.0 - (2.0 * n2 + b * n1) / k2),
    )
}

/// Computes every equilibrium of the two-species competition system:
/// extinction, the two single-species states, and the coexistence point
/// ((K1 - a K2)/(1 - ab), (K2 - b K1)/(1 - ab)) when 1 - ab is nonzero.
///
/// The coexistence point is reported wherever it exists mathematically,
/// including with negative components (an ecologically infeasible balance
/// still organizes the phase portrait).
pub fn equilibria(params: &CompetitionParameters) -> Result<Vec<Equilibrium>> {
    if !params.k1.is_finite() || params.k1 <= 0.0 {
        bail!("Carrying capacity K1 must be positive, got {}.", params.k1);
    }
    if !params.k2.is_finite() || params.k2 <= 0.0 {
        bail!("Carrying capacity K2 must be positive, got {}.", params.k2);
    }

    let mut found = vec![
        analyze(params, EquilibriumKind::Extinction, [0.0, 0.0]),
        analyze(params, EquilibriumKind::Species1Only, [params.k1, 0.0]),
        analyze(params, EquilibriumKind::Species2Only, [0.0, params.k2]),
    ];

    let denom = 1.0 - params.a * params.b;
    if denom.abs() > DEGENERACY_EPS {
        let n1 = (params.k1 - params.a * params.k2) / denom;
        let n2 = (params.k2 - params.b * params.k1) / denom;
        found.push(analyze(params, EquilibriumKind::Coexistence, [n1, n2]));
    }

    Ok(found)
}

fn analyze(
    params: &CompetitionParameters,
    kind: EquilibriumKind,
    state: [f64; 2],
) -> Equilibrium {
    let j = jacobian(params, state);
    let eigen = j.complex_eigenvalues();
    let eigenvalues = [eigen[0], eigen[1]];
    Equilibrium {
        kind,
        state,
        jacobian: [[j[(0, 0)], j[(0, 1)]], [j[(1, 0)], j[(1, 1)]]],
        eigenvalues: [eigenvalues[0].into(), eigenvalues[1].into()],
        stability: classify(eigenvalues),
    }
}

fn classify(eigenvalues: [Complex<f64>; 2]) -> Stability {
    let [l1, l2] = eigenvalues;
    if l1.re.abs() <= HYPERBOLICITY_EPS || l2.re.abs() <= HYPERBOLICITY_EPS {
        return Stability::NonHyperbolic;
    }
    if l1.re * l2.re < 0.0 {
        return Stability::Saddle;
    }
    let rotating = l1.im.abs() > HYPERBOLICITY_EPS || l2.im.abs() > HYPERBOLICITY_EPS;
    match (l1.re < 0.0, rotating) {
        (true, false) => Stability::StableNode,
        (true, true) => Stability::StableSpiral,
        (false, false) => Stability::UnstableNode,
        (false, true) => Stability::UnstableSpiral,
    }
}
