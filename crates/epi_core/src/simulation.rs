//! One-call simulation runs: validate, build the model, integrate, reduce.

use crate::coupling::{TwoPopulationParams, TwoPopulationSystem};
use crate::error::Result;
use crate::integrator::{integrate, sample_grid, SolverSettings, Trajectory};
use crate::metrics::{
    basic_reproduction_number, final_distribution, peak_infection, CompartmentShare, Peak,
};
use crate::mobility::{simulate_cities, CityHistory, CityNetworkParams};
use crate::model::{Compartment, CompartmentModel, ModelKind, INFECTED};
use crate::params::{PopulationParams, Rates};
use crate::stability::{infection_growth, InfectionGrowth};
use log::debug;
use serde::{Deserialize, Serialize};

/// Derived metrics of one population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationSummary {
    pub peak: Option<Peak>,
    pub r0: Option<f64>,
    pub final_distribution: Vec<CompartmentShare>,
}

impl PopulationSummary {
    fn from_trajectory(
        trajectory: &Trajectory,
        kind: ModelKind,
        rates: &Rates,
    ) -> Result<Self> {
        Ok(Self {
            peak: peak_infection(trajectory, INFECTED)?,
            r0: basic_reproduction_number(kind, rates),
            final_distribution: final_distribution(trajectory, kind.compartments())?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationOutcome {
    pub kind: ModelKind,
    pub compartments: Vec<Compartment>,
    pub trajectory: Trajectory,
    pub summary: PopulationSummary,
    pub growth: InfectionGrowth,
}

pub fn simulate_population(
    kind: ModelKind,
    params: &PopulationParams,
    settings: &SolverSettings,
) -> Result<PopulationOutcome> {
    params.validate()?;
    let population = &params.population;
    let model = CompartmentModel::new(kind, population);

    debug!(
        "simulating {kind:?}: N = {}, I0 = {}, {} days",
        population.size, population.initial_infected, params.horizon_days
    );

    let trajectory = integrate(
        &model,
        &model.initial_state(population),
        &sample_grid(params.horizon_days),
        settings,
    )?;
    let summary = PopulationSummary::from_trajectory(&trajectory, kind, &population.rates)?;
    let growth = infection_growth(&model, &model.disease_free_state(), &[INFECTED])?;

    Ok(PopulationOutcome {
        kind,
        compartments: kind.compartments().to_vec(),
        trajectory,
        summary,
        growth,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwoPopulationOutcome {
    /// Columns `[S_A, I_A, R_A, D_A, S_B, I_B, R_B, D_B]`.
    pub trajectory: Trajectory,
    pub a: PopulationSummary,
    pub b: PopulationSummary,
    /// Threshold of the coupled system, cross terms included.
    pub growth: InfectionGrowth,
}

pub fn simulate_two_populations(
    params: &TwoPopulationParams,
    settings: &SolverSettings,
) -> Result<TwoPopulationOutcome> {
    params.validate()?;
    let system = TwoPopulationSystem::new(params);

    debug!(
        "simulating two coupled populations: k_AB = {}, k_BA = {}, {} days",
        params.coupling.a_to_b, params.coupling.b_to_a, params.horizon_days
    );

    let trajectory = integrate(
        &system,
        &system.initial_state(params),
        &sample_grid(params.horizon_days),
        settings,
    )?;
    let a = PopulationSummary::from_trajectory(
        &trajectory.select_columns(TwoPopulationSystem::block(0)),
        ModelKind::Sird,
        &params.a.rates,
    )?;
    let b = PopulationSummary::from_trajectory(
        &trajectory.select_columns(TwoPopulationSystem::block(1)),
        ModelKind::Sird,
        &params.b.rates,
    )?;
    let growth = infection_growth(
        &system,
        &system.disease_free_state(),
        &TwoPopulationSystem::infected_indices(),
    )?;

    Ok(TwoPopulationOutcome {
        trajectory,
        a,
        b,
        growth,
    })
}

/// Any simulation the engine can run, as submitted by a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum Scenario {
    Single {
        kind: ModelKind,
        #[serde(flatten)]
        params: PopulationParams,
    },
    TwoPopulations(TwoPopulationParams),
    Cities(CityNetworkParams),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum Outcome {
    Single(PopulationOutcome),
    TwoPopulations(TwoPopulationOutcome),
    Cities { cities: Vec<CityHistory> },
}

/// Runs `scenario` to completion. `settings` only affects the continuous
/// models; the city network is a discrete recurrence.
pub fn run(scenario: &Scenario, settings: &SolverSettings) -> Result<Outcome> {
    match scenario {
        Scenario::Single { kind, params } => {
            simulate_population(*kind, params, settings).map(Outcome::Single)
        }
        Scenario::TwoPopulations(params) => {
            simulate_two_populations(params, settings).map(Outcome::TwoPopulations)
        }
        Scenario::Cities(params) => {
            simulate_cities(params).map(|cities| Outcome::Cities { cities })
        }
    }
}
