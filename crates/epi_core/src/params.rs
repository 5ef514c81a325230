//! Validated scalar inputs for a simulation run.
//!
//! A parameter set is built once per request and passed by reference through
//! the coupling layer, the model and the integrator. Nothing in the engine
//! mutates it.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};

/// Per-day rates of a compartmental model. Every rate is a fraction in `[0, 1]`.
///
/// `mu` is disease-specific mortality (I -> D). `delta` is the combined
/// birth and natural-death rate used by the vital dynamics model; births
/// replace natural deaths at the same rate, so there is no separate birth
/// rate. Rates a model does not use are ignored by it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rates {
    pub beta: f64,
    pub gamma: f64,
    pub mu: f64,
    pub delta: f64,
}

impl Default for Rates {
    fn default() -> Self {
        Self {
            beta: 0.3,
            gamma: 0.1,
            mu: 0.0,
            delta: 0.0,
        }
    }
}

impl Rates {
    pub fn validate(&self, label: &str) -> Result<()> {
        check_fraction(&qualified(label, "beta"), self.beta)?;
        check_fraction(&qualified(label, "gamma"), self.gamma)?;
        check_fraction(&qualified(label, "mu"), self.mu)?;
        check_fraction(&qualified(label, "delta"), self.delta)?;
        Ok(())
    }
}

/// A single closed population at t = 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Population {
    /// Total population N.
    pub size: f64,
    /// Infected at t = 0; the rest start susceptible.
    pub initial_infected: f64,
    pub rates: Rates,
}

impl Default for Population {
    fn default() -> Self {
        Self {
            size: 10_000.0,
            initial_infected: 1.0,
            rates: Rates::default(),
        }
    }
}

impl Population {
    pub fn validate(&self, label: &str) -> Result<()> {
        let size_name = qualified(label, "size");
        if !self.size.is_finite() || self.size <= 0.0 {
            return Err(EngineError::invalid(
                size_name,
                format!("population must be positive, got {}", self.size),
            ));
        }
        let infected_name = qualified(label, "initial_infected");
        if !self.initial_infected.is_finite() || self.initial_infected < 0.0 {
            return Err(EngineError::invalid(
                infected_name,
                format!("must be non-negative, got {}", self.initial_infected),
            ));
        }
        if self.initial_infected > self.size {
            return Err(EngineError::invalid(
                infected_name,
                format!(
                    "{} infected exceeds the population of {}",
                    self.initial_infected, self.size
                ),
            ));
        }
        self.rates.validate(label)
    }

    pub fn initial_susceptible(&self) -> f64 {
        self.size - self.initial_infected
    }
}

/// Inputs of a single-population run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PopulationParams {
    #[serde(flatten)]
    pub population: Population,
    pub horizon_days: usize,
}

impl Default for PopulationParams {
    fn default() -> Self {
        Self {
            population: Population::default(),
            horizon_days: 100,
        }
    }
}

impl PopulationParams {
    pub fn validate(&self) -> Result<()> {
        self.population.validate("")?;
        check_horizon(self.horizon_days)
    }
}

pub(crate) fn check_horizon(horizon_days: usize) -> Result<()> {
    if horizon_days == 0 {
        return Err(EngineError::invalid(
            "horizon_days",
            "simulation needs at least one day",
        ));
    }
    Ok(())
}

pub(crate) fn check_fraction(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(EngineError::invalid(
            name,
            format!("must lie in [0, 1], got {value}"),
        ));
    }
    Ok(())
}

pub(crate) fn qualified(label: &str, field: &str) -> String {
    if label.is_empty() {
        field.to_string()
    } else {
        format!("{label}.{field}")
    }
}
