//! Continuous compartmental models: SIR, SIRD and SIRD with vital dynamics.
//!
//! One parameterized vector field covers all three variants, selected by
//! [`ModelKind`]. State vectors are ordered `[S, I, R]` or `[S, I, R, D]`.

use crate::params::{Population, Rates};
use crate::traits::{lit, DynamicalSystem, Scalar};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Compartment {
    Susceptible,
    Infected,
    Recovered,
    Deceased,
}

impl Compartment {
    pub fn symbol(self) -> &'static str {
        match self {
            Compartment::Susceptible => "S",
            Compartment::Infected => "I",
            Compartment::Recovered => "R",
            Compartment::Deceased => "D",
        }
    }
}

const SIR: [Compartment; 3] = [
    Compartment::Susceptible,
    Compartment::Infected,
    Compartment::Recovered,
];

const SIRD: [Compartment; 4] = [
    Compartment::Susceptible,
    Compartment::Infected,
    Compartment::Recovered,
    Compartment::Deceased,
];

/// Index of the infected compartment in every variant's state vector.
pub const INFECTED: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// S -> I -> R with fixed N.
    Sir,
    /// SIR plus disease mortality I -> D, fixed N.
    Sird,
    /// SIRD with births and natural deaths at rate delta; N is the living
    /// population S + I + R, recomputed at every evaluation.
    SirdVital,
}

impl ModelKind {
    pub fn compartments(self) -> &'static [Compartment] {
        match self {
            ModelKind::Sir => &SIR,
            ModelKind::Sird | ModelKind::SirdVital => &SIRD,
        }
    }

    pub fn dimension(self) -> usize {
        self.compartments().len()
    }

    /// Sum of every per-capita rate at which individuals leave I.
    pub fn infected_outflow(self, rates: &Rates) -> f64 {
        match self {
            ModelKind::Sir => rates.gamma,
            ModelKind::Sird => rates.gamma + rates.mu,
            ModelKind::SirdVital => rates.gamma + rates.mu + rates.delta,
        }
    }
}

/// Mass-action incidence `beta * S * I / N`, zero when `N` is not positive.
pub(crate) fn incidence<T: Scalar>(beta: T, susceptible: T, infected: T, total: T) -> T {
    if total > T::zero() {
        beta * susceptible * infected / total
    } else {
        T::zero()
    }
}

/// The vector field of a single population, bundling its rates and the
/// fixed population size the closed variants divide by.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompartmentModel {
    kind: ModelKind,
    rates: Rates,
    size: f64,
}

impl CompartmentModel {
    pub fn new(kind: ModelKind, population: &Population) -> Self {
        Self {
            kind,
            rates: population.rates,
            size: population.size,
        }
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn rates(&self) -> &Rates {
        &self.rates
    }

    pub fn size(&self) -> f64 {
        self.size
    }

    pub fn dimension(&self) -> usize {
        self.kind.dimension()
    }

    /// `[N - I0, I0, 0]` or `[N - I0, I0, 0, 0]`.
    pub fn initial_state(&self, population: &Population) -> Vec<f64> {
        let mut state = vec![0.0; self.kind.dimension()];
        state[0] = population.initial_susceptible();
        state[INFECTED] = population.initial_infected;
        state
    }

    /// Fully susceptible population with no infection.
    pub fn disease_free_state(&self) -> Vec<f64> {
        let mut state = vec![0.0; self.kind.dimension()];
        state[0] = self.size;
        state
    }
}

/// Generic over the scalar so the same field evaluates on `f64` for
/// integration and on dual numbers for its Jacobian.
impl<T: Scalar> DynamicalSystem<T> for CompartmentModel {
    fn dimension(&self) -> usize {
        self.kind.dimension()
    }

    fn apply(&self, _t: T, x: &[T], out: &mut [T]) {
        let beta = lit::<T>(self.rates.beta);
        let gamma = lit::<T>(self.rates.gamma);
        let mu = lit::<T>(self.rates.mu);
        let delta = lit::<T>(self.rates.delta);
        let size = lit::<T>(self.size);
        let (s, i, r) = (x[0], x[1], x[2]);

        match self.kind {
            ModelKind::Sir => {
                let infection = incidence(beta, s, i, size);
                out[0] = -infection;
                out[1] = infection - gamma * i;
                out[2] = gamma * i;
            }
            ModelKind::Sird => {
                let infection = incidence(beta, s, i, size);
                out[0] = -infection;
                out[1] = infection - gamma * i - mu * i;
                out[2] = gamma * i;
                out[3] = mu * i;
            }
            ModelKind::SirdVital => {
                let living = s + i + r;
                let infection = incidence(beta, s, i, living);
                out[0] = delta * living - infection - delta * s;
                out[1] = infection - gamma * i - delta * i - mu * i;
                out[2] = gamma * i - delta * r;
                out[3] = mu * i;
            }
        }
    }
}
