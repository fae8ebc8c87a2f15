use crate::model::{CompetitionModel, CompetitionParameters, DIMENSION};
use crate::solvers::{step_factor, Dopri5, StepControl};
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of output samples in every trajectory.
pub const SAMPLE_COUNT: usize = 100;

/// Errors from the simulation boundary.
///
/// The input variants are detectable before any integration happens; the
/// solver variants mean the numerical method itself could not advance.
/// Non-finite values arising mid-integration are deliberately NOT errors:
/// the trajectory is returned with them propagated (see [`simulate`]).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error("carrying capacity K{species} must be positive and finite, got {value}")]
    InvalidCarryingCapacity { species: u8, value: f64 },
    #[error("horizon must be finite and non-negative, got {horizon}")]
    InvalidHorizon { horizon: f64 },
    #[error("step size underflow at t = {t} (h = {h:e}); integration cannot advance")]
    StepSizeUnderflow { t: f64, h: f64 },
    #[error("exceeded the budget of {max_steps} internal steps at t = {t}")]
    MaxStepsExceeded { max_steps: usize, t: f64 },
}

/// Population trajectory over a simulation horizon: `SAMPLE_COUNT` time
/// samples with the corresponding population of each species. Owned by the
/// caller, never mutated after a solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub times: Vec<f64>,
    pub species1: Vec<f64>,
    pub species2: Vec<f64>,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// The (t, N1, N2) triple at sample `index`.
    pub fn sample(&self, index: usize) -> (f64, f64, f64) {
        (
            self.times[index],
            self.species1[index],
            self.species2[index],
        )
    }

    /// Iterates over (t, N1, N2) triples in time order.
    pub fn iter(&self) -> impl Iterator<Item = (f64, f64, f64)> + '_ {
        (0..self.len()).map(|i| self.sample(i))
    }

    /// False if any population sample is NaN or infinite, which indicates
    /// the solution blew up (or overflowed) somewhere along the horizon.
    pub fn is_finite(&self) -> bool {
        self.species1.iter().all(|v| v.is_finite())
            && self.species2.iter().all(|v| v.is_finite())
    }
}

/// The output grid: `SAMPLE_COUNT` equally spaced times spanning
/// `[0, horizon]` with both endpoints exact. A zero horizon degenerates to
/// the time 0.0 repeated `SAMPLE_COUNT` times.
///
/// The ratio i/(SAMPLE_COUNT - 1) is formed before scaling so that the
/// final sample is `horizon` to the last bit for every horizon. Strict
/// monotonicity between samples holds for any horizon whose grid spacing
/// is representable, i.e. everything outside the subnormal range.
pub fn time_grid(horizon: f64) -> Vec<f64> {
    let last = (SAMPLE_COUNT - 1) as f64;
    (0..SAMPLE_COUNT)
        .map(|i| horizon * (i as f64 / last))
        .collect()
}

/// Simulates the competition model over `[0, horizon]` with default step
/// control. See [`simulate_with_control`].
pub fn simulate(
    params: &CompetitionParameters,
    initial: [f64; 2],
    horizon: f64,
) -> Result<Trajectory, SimulationError> {
    simulate_with_control(params, initial, horizon, &StepControl::default())
}

/// Simulates the competition model over `[0, horizon]`, reporting the state
/// at the `SAMPLE_COUNT` grid times via the solver's continuous extension.
///
/// Input policy: carrying capacities must be positive and finite and the
/// horizon finite and non-negative; everything else (growth rates,
/// interaction coefficients, initial populations) is accepted as any real,
/// including values outside their conventional ranges.
///
/// Blow-up policy: if the state turns non-finite during integration (e.g.
/// finite-time blow-up overflowing f64), the solve does not fail; the
/// remaining samples are filled with the non-finite state and the
/// trajectory is returned. [`Trajectory::is_finite`] detects this.
pub fn simulate_with_control(
    params: &CompetitionParameters,
    initial: [f64; 2],
    horizon: f64,
    control: &StepControl,
) -> Result<Trajectory, SimulationError> {
    validate_capacity(1, params.k1)?;
    validate_capacity(2, params.k2)?;
    if !horizon.is_finite() || horizon < 0.0 {
        return Err(SimulationError::InvalidHorizon { horizon });
    }

    let times = time_grid(horizon);
    let mut species1 = Vec::with_capacity(SAMPLE_COUNT);
    let mut species2 = Vec::with_capacity(SAMPLE_COUNT);
    species1.push(initial[0]);
    species2.push(initial[1]);

    if horizon == 0.0 {
        species1.resize(SAMPLE_COUNT, initial[0]);
        species2.resize(SAMPLE_COUNT, initial[1]);
        return Ok(Trajectory {
            times,
            species1,
            species2,
        });
    }

    let model = CompetitionModel::new(*params);
    let mut stepper = Dopri5::new(DIMENSION);
    let mut y = [initial[0], initial[1]];
    let mut y_new = [0.0_f64; DIMENSION];
    let mut interp = [0.0_f64; DIMENSION];
    let mut t = 0.0_f64;
    let mut h = control.first_step(horizon);
    // Grid times can land a few ulps past an accepted step's endpoint.
    let slack = horizon * 8.0 * f64::EPSILON;

    let mut next = 1usize;
    let mut steps_done = 0usize;

    while next < SAMPLE_COUNT && t < horizon {
        if steps_done >= control.max_steps {
            return Err(SimulationError::MaxStepsExceeded {
                max_steps: control.max_steps,
                t,
            });
        }

        let dt = h.min(horizon - t);
        let err = stepper.propose(&model, t, &y, dt, control, &mut y_new);
        steps_done += 1;

        let poisoned = y_new.iter().any(|v| !v.is_finite());
        if poisoned || !err.is_finite() {
            let fill = if poisoned { y_new } else { [f64::NAN; 2] };
            debug!(
                "non-finite state near t = {:.6e}; filling remaining {} samples",
                t + dt,
                SAMPLE_COUNT - next
            );
            while next < SAMPLE_COUNT {
                species1.push(fill[0]);
                species2.push(fill[1]);
                next += 1;
            }
            break;
        }

        if err <= 1.0 {
            stepper.prepare_dense(&y, &y_new, dt);
            let t_reached = t + dt;
            while next < SAMPLE_COUNT && times[next] <= t_reached + slack {
                let theta = ((times[next] - t) / dt).clamp(0.0, 1.0);
                stepper.interpolate(theta, &mut interp);
                species1.push(interp[0]);
                species2.push(interp[1]);
                next += 1;
            }
            stepper.accept();
            y = y_new;
            t = t_reached;
        }

        h = dt * step_factor(err);
        if h < control.min_step && horizon - t > control.min_step {
            return Err(SimulationError::StepSizeUnderflow { t, h });
        }
    }

    // Rounding can leave the final grid time unemitted once t reaches the
    // horizon; it coincides with the final state.
    while next < SAMPLE_COUNT {
        species1.push(y[0]);
        species2.push(y[1]);
        next += 1;
    }

    debug!("integrated to t = {t} in {steps_done} internal steps");
    Ok(Trajectory {
        times,
        species1,
        species2,
    })
}

fn validate_capacity(species: u8, value: f64) -> Result<(), SimulationError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(SimulationError::InvalidCarryingCapacity { species, value });
    }
    Ok(())
}
