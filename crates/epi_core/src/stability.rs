//! Linear analysis around the disease-free equilibrium.
//!
//! Near the disease-free state the infected compartments evolve as
//! `dI/dt ≈ J_II · I`, where `J_II` is the Jacobian restricted to those
//! compartments. Its dominant eigenvalue is the early exponential growth
//! rate of the outbreak; it is positive exactly when an introduced infection
//! grows. For coupled populations the block includes the cross terms, so the
//! threshold accounts for import.

use crate::autodiff::Dual;
use crate::error::{EngineError, NumericalFailure, Result};
use crate::traits::DynamicalSystem;
use nalgebra::DMatrix;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InfectionGrowth {
    /// Dominant eigenvalue (real part) of the infected-compartment Jacobian, per day.
    pub rate: f64,
    /// `ln 2 / rate`, present only while the infection grows.
    pub doubling_time: Option<f64>,
}

/// Row-major Jacobian of `system` at `state`, exact to rounding: column `j`
/// is one evaluation of the field on dual numbers seeded along `x_j`.
pub fn jacobian(system: &impl DynamicalSystem<Dual>, state: &[f64]) -> Result<Vec<f64>> {
    let dim = system.dimension();
    if state.len() != dim {
        return Err(EngineError::DimensionMismatch {
            expected: dim,
            actual: state.len(),
        });
    }

    let mut jac = vec![0.0; dim * dim];
    let mut dual_state = vec![Dual::zero(); dim];
    let mut dual_out = vec![Dual::zero(); dim];
    let t_dual = Dual::zero();

    for j in 0..dim {
        for i in 0..dim {
            dual_state[i] = Dual::new(state[i], if i == j { 1.0 } else { 0.0 });
        }
        system.apply(t_dual, &dual_state, &mut dual_out);
        for i in 0..dim {
            jac[i * dim + j] = dual_out[i].eps;
        }
    }

    if jac.iter().any(|v| !v.is_finite()) {
        return Err(EngineError::NumericalFailure {
            time: 0.0,
            failure: NumericalFailure::NonFiniteDerivative,
        });
    }
    Ok(jac)
}

/// Growth rate of infection introduced at `equilibrium`, using the rows and
/// columns of `infected` (indices into the state vector).
pub fn infection_growth(
    system: &impl DynamicalSystem<Dual>,
    equilibrium: &[f64],
    infected: &[usize],
) -> Result<InfectionGrowth> {
    let dim = system.dimension();
    if infected.is_empty() {
        return Err(EngineError::invalid("infected", "no infected compartments given"));
    }
    if let Some(&bad) = infected.iter().find(|&&i| i >= dim) {
        return Err(EngineError::invalid(
            "infected",
            format!("index {bad} is outside a {dim}-dimensional state"),
        ));
    }

    let full = jacobian(system, equilibrium)?;
    let k = infected.len();
    let block = DMatrix::from_fn(k, k, |r, c| full[infected[r] * dim + infected[c]]);
    let rate = block
        .complex_eigenvalues()
        .iter()
        .map(|lambda| lambda.re)
        .fold(f64::NEG_INFINITY, f64::max);

    Ok(InfectionGrowth {
        rate,
        doubling_time: (rate > 0.0).then(|| std::f64::consts::LN_2 / rate),
    })
}
