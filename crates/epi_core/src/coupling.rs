//! Two interacting SIRD populations combined into one 8-dimensional system.
//!
//! State layout: `[S_A, I_A, R_A, D_A, S_B, I_B, R_B, D_B]`. Each half follows
//! the single-population SIRD field unchanged; the coupling only adds an
//! imported force of infection on top of it.

use crate::error::{EngineError, Result};
use crate::model::{CompartmentModel, ModelKind, INFECTED};
use crate::params::{check_horizon, Population, Rates};
use crate::traits::{lit, DynamicalSystem, Scalar};
use serde::{Deserialize, Serialize};

const BLOCK: usize = 4;

/// Cross-transmission coefficients between populations A and B.
///
/// `a_to_b` (k_AB) scales how strongly A's infected proportion infects B's
/// susceptibles; `b_to_a` (k_BA) the reverse. The two are independent.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossCoupling {
    pub a_to_b: f64,
    pub b_to_a: f64,
}

impl CrossCoupling {
    pub fn validate(&self) -> Result<()> {
        for (origin, destination, value) in [("A", "B", self.a_to_b), ("B", "A", self.b_to_a)] {
            if !value.is_finite() || value < 0.0 {
                return Err(EngineError::coupling(
                    origin,
                    destination,
                    format!("coefficient must be finite and non-negative, got {value}"),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TwoPopulationParams {
    pub a: Population,
    pub b: Population,
    pub coupling: CrossCoupling,
    pub horizon_days: usize,
}

impl Default for TwoPopulationParams {
    fn default() -> Self {
        Self {
            a: Population {
                size: 1_000.0,
                initial_infected: 100.0,
                rates: Rates {
                    mu: 0.01,
                    ..Rates::default()
                },
            },
            b: Population {
                size: 5_000.0,
                initial_infected: 10.0,
                rates: Rates {
                    mu: 0.01,
                    ..Rates::default()
                },
            },
            coupling: CrossCoupling {
                a_to_b: 0.05,
                b_to_a: 0.05,
            },
            horizon_days: 160,
        }
    }
}

impl TwoPopulationParams {
    pub fn validate(&self) -> Result<()> {
        self.a.validate("A")?;
        self.b.validate("B")?;
        self.coupling.validate()?;
        check_horizon(self.horizon_days)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TwoPopulationSystem {
    a: CompartmentModel,
    b: CompartmentModel,
    coupling: CrossCoupling,
}

impl TwoPopulationSystem {
    pub fn new(params: &TwoPopulationParams) -> Self {
        Self {
            a: CompartmentModel::new(ModelKind::Sird, &params.a),
            b: CompartmentModel::new(ModelKind::Sird, &params.b),
            coupling: params.coupling,
        }
    }

    pub fn population_a(&self) -> &CompartmentModel {
        &self.a
    }

    pub fn population_b(&self) -> &CompartmentModel {
        &self.b
    }

    pub fn initial_state(&self, params: &TwoPopulationParams) -> Vec<f64> {
        let mut state = self.a.initial_state(&params.a);
        state.extend(self.b.initial_state(&params.b));
        state
    }

    pub fn disease_free_state(&self) -> Vec<f64> {
        let mut state = self.a.disease_free_state();
        state.extend(self.b.disease_free_state());
        state
    }

    pub fn dimension(&self) -> usize {
        2 * BLOCK
    }

    /// Columns of `I_A` and `I_B`.
    pub fn infected_indices() -> [usize; 2] {
        [INFECTED, BLOCK + INFECTED]
    }

    /// Column range of population A (`0`) or B (`1`).
    pub fn block(index: usize) -> std::ops::Range<usize> {
        index * BLOCK..(index + 1) * BLOCK
    }
}

/// Infection imported into a population whose susceptibles are `susceptible`,
/// from a source with `infected` out of a fixed `source_size`.
fn imported<T: Scalar>(coefficient: f64, susceptible: T, infected: T, source_size: f64) -> T {
    if source_size > 0.0 {
        lit::<T>(coefficient) * susceptible * infected / lit::<T>(source_size)
    } else {
        T::zero()
    }
}

impl<T: Scalar> DynamicalSystem<T> for TwoPopulationSystem {
    fn dimension(&self) -> usize {
        2 * BLOCK
    }

    fn apply(&self, t: T, x: &[T], out: &mut [T]) {
        let (xa, xb) = x.split_at(BLOCK);
        let (out_a, out_b) = out.split_at_mut(BLOCK);
        self.a.apply(t, xa, out_a);
        self.b.apply(t, xb, out_b);

        let into_a = imported(self.coupling.b_to_a, xa[0], xb[INFECTED], self.b.size());
        let into_b = imported(self.coupling.a_to_b, xb[0], xa[INFECTED], self.a.size());

        out_a[0] = out_a[0] - into_a;
        out_a[INFECTED] = out_a[INFECTED] + into_a;
        out_b[0] = out_b[0] - into_b;
        out_b[INFECTED] = out_b[INFECTED] + into_b;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(beta_a: f64, beta_b: f64, a_to_b: f64, b_to_a: f64) -> TwoPopulationParams {
        TwoPopulationParams {
            a: Population {
                size: 1000.0,
                initial_infected: 100.0,
                rates: Rates {
                    beta: beta_a,
                    gamma: 0.1,
                    mu: 0.01,
                    delta: 0.0,
                },
            },
            b: Population {
                size: 2000.0,
                initial_infected: 0.0,
                rates: Rates {
                    beta: beta_b,
                    gamma: 0.1,
                    mu: 0.01,
                    delta: 0.0,
                },
            },
            coupling: CrossCoupling { a_to_b, b_to_a },
            horizon_days: 50,
        }
    }

    #[test]
    fn zero_coupling_reduces_to_independent_halves() {
        let p = params(0.3, 0.2, 0.0, 0.0);
        let system = TwoPopulationSystem::new(&p);
        let x = [900.0, 100.0, 0.0, 0.0, 1990.0, 10.0, 0.0, 0.0];
        let mut coupled = vec![0.0; 8];
        system.apply(0.0, &x, &mut coupled);

        let mut a = vec![0.0; 4];
        let mut b = vec![0.0; 4];
        CompartmentModel::new(ModelKind::Sird, &p.a).apply(0.0, &x[..4], &mut a);
        CompartmentModel::new(ModelKind::Sird, &p.b).apply(0.0, &x[4..], &mut b);

        assert_eq!(&coupled[..4], a.as_slice());
        assert_eq!(&coupled[4..], b.as_slice());
    }

    #[test]
    fn import_drives_infection_without_local_transmission() {
        let p = params(0.3, 0.0, 0.5, 0.0);
        let system = TwoPopulationSystem::new(&p);
        let x = system.initial_state(&p);
        assert_eq!(x, vec![900.0, 100.0, 0.0, 0.0, 2000.0, 0.0, 0.0, 0.0]);

        let mut out = vec![0.0; 8];
        system.apply(0.0, &x, &mut out);
        let expected = 0.5 * 2000.0 * 100.0 / 1000.0;
        assert!((out[5] - expected).abs() < 1e-12);
        assert!((out[4] + expected).abs() < 1e-12);
        // B has no infected, so nothing flows back into A.
        assert!((out[1] - (0.3 * 900.0 * 100.0 / 1000.0 - 11.0)).abs() < 1e-12);
    }

    #[test]
    fn coupling_validation_rejects_negative_coefficients() {
        let p = params(0.3, 0.3, 0.1, -0.2);
        match p.validate() {
            Err(EngineError::InvalidCoupling {
                origin,
                destination,
                ..
            }) => {
                assert_eq!(origin, "B");
                assert_eq!(destination, "A");
            }
            other => panic!("expected coupling error, got {other:?}"),
        }
    }

    #[test]
    fn validation_names_the_population() {
        let mut p = params(0.3, 0.3, 0.1, 0.1);
        p.b.rates.gamma = 2.0;
        match p.validate() {
            Err(EngineError::InvalidParameter { name, .. }) => assert_eq!(name, "B.gamma"),
            other => panic!("expected parameter error, got {other:?}"),
        }
        assert!(TwoPopulationParams::default().validate().is_ok());
    }

    #[test]
    fn defaults_give_both_populations_disease_mortality() {
        let p = TwoPopulationParams::default();
        assert_eq!(p.a.rates.mu, 0.01);
        assert_eq!(p.b.rates.mu, 0.01);
        assert_eq!((p.a.size, p.b.size), (1_000.0, 5_000.0));
        assert_eq!((p.a.rates.beta, p.a.rates.gamma), (0.3, 0.1));
    }

    #[test]
    fn layout_helpers() {
        assert_eq!(TwoPopulationSystem::infected_indices(), [1, 5]);
        assert_eq!(TwoPopulationSystem::block(1), 4..8);
    }
}
