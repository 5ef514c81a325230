//! Discrete-time SIR over several cities linked by daily travelers.
//!
//! One step is one day. The network is a [`DynamicalSystem`] map over the
//! concatenated `[S, I, R]` blocks of every city and is advanced with
//! [`DiscreteMap`], so each day's update for every city reads only the
//! previous day's values.
//!
//! Each city's total `N = S + I + R` is fixed when the network is built.
//! Imported infections add to `I` at the destination without changing its
//! `N` or reducing the origin's `I`; travel only carries infection pressure.

use crate::error::{EngineError, Result};
use crate::model::incidence;
use crate::params::check_fraction;
use crate::solvers::DiscreteMap;
use crate::traits::{DynamicalSystem, Steppable};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const BLOCK: usize = 3;

/// Rates that replace the network-wide ones for a single city.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CityRates {
    pub beta: f64,
    pub gamma: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct City {
    pub name: String,
    pub susceptible: f64,
    pub infected: f64,
    #[serde(default)]
    pub recovered: f64,
    #[serde(default)]
    pub rates: Option<CityRates>,
}

/// Daily number of travelers from `origin` to `destination`. The reverse
/// direction is a separate entry; a missing entry means no travel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub origin: String,
    pub destination: String,
    pub travelers: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityNetworkParams {
    pub cities: Vec<City>,
    pub beta: f64,
    pub gamma: f64,
    #[serde(default)]
    pub routes: Vec<Route>,
    pub days: usize,
}

/// The validated network, ready to be stepped.
#[derive(Debug, Clone, PartialEq)]
pub struct CityNetwork {
    names: Vec<String>,
    totals: Vec<f64>,
    rates: Vec<CityRates>,
    /// Row-major `K x K`; entry `[origin * K + destination]`.
    travel: Vec<f64>,
}

impl CityNetwork {
    pub fn new(params: &CityNetworkParams) -> Result<Self> {
        check_fraction("beta", params.beta)?;
        check_fraction("gamma", params.gamma)?;
        if params.cities.is_empty() {
            return Err(EngineError::invalid("cities", "at least one city is required"));
        }

        let mut index = HashMap::with_capacity(params.cities.len());
        let mut names = Vec::with_capacity(params.cities.len());
        let mut totals = Vec::with_capacity(params.cities.len());
        let mut rates = Vec::with_capacity(params.cities.len());

        for (k, city) in params.cities.iter().enumerate() {
            if city.name.trim().is_empty() {
                return Err(EngineError::invalid(
                    format!("cities[{k}].name"),
                    "city name must not be empty",
                ));
            }
            if index.insert(city.name.as_str(), k).is_some() {
                return Err(EngineError::invalid(
                    format!("cities[{k}].name"),
                    format!("duplicate city `{}`", city.name),
                ));
            }
            for (field, value) in [
                ("susceptible", city.susceptible),
                ("infected", city.infected),
                ("recovered", city.recovered),
            ] {
                if !value.is_finite() || value < 0.0 {
                    return Err(EngineError::invalid(
                        format!("{}.{field}", city.name),
                        format!("must be finite and non-negative, got {value}"),
                    ));
                }
            }
            let total = city.susceptible + city.infected + city.recovered;
            if total <= 0.0 {
                return Err(EngineError::invalid(
                    format!("{}.population", city.name),
                    "total population S + I + R must be positive",
                ));
            }
            let city_rates = city.rates.unwrap_or(CityRates {
                beta: params.beta,
                gamma: params.gamma,
            });
            check_fraction(&format!("{}.beta", city.name), city_rates.beta)?;
            check_fraction(&format!("{}.gamma", city.name), city_rates.gamma)?;

            names.push(city.name.clone());
            totals.push(total);
            rates.push(city_rates);
        }

        let k = names.len();
        let mut travel = vec![0.0; k * k];
        let mut seen = vec![false; k * k];
        for route in &params.routes {
            let reject = |reason: String| {
                EngineError::coupling(route.origin.as_str(), route.destination.as_str(), reason)
            };
            let origin = *index
                .get(route.origin.as_str())
                .ok_or_else(|| reject(format!("unknown origin city `{}`", route.origin)))?;
            let destination = *index
                .get(route.destination.as_str())
                .ok_or_else(|| {
                    reject(format!("unknown destination city `{}`", route.destination))
                })?;
            if origin == destination {
                return Err(reject("a city cannot send travelers to itself".into()));
            }
            if !route.travelers.is_finite() || route.travelers < 0.0 {
                return Err(reject(format!(
                    "traveler count must be finite and non-negative, got {}",
                    route.travelers
                )));
            }
            let slot = origin * k + destination;
            if seen[slot] {
                return Err(reject("route listed more than once".into()));
            }
            seen[slot] = true;
            travel[slot] = route.travelers;
        }

        Ok(Self {
            names,
            totals,
            rates,
            travel,
        })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn total(&self, city: usize) -> f64 {
        self.totals[city]
    }

    pub fn travelers(&self, origin: usize, destination: usize) -> f64 {
        self.travel[origin * self.len() + destination]
    }

    /// Concatenated `[S, I, R]` blocks in city order.
    pub fn initial_state(params: &CityNetworkParams) -> Vec<f64> {
        params
            .cities
            .iter()
            .flat_map(|c| [c.susceptible, c.infected, c.recovered])
            .collect()
    }

    /// Infection pressure arriving at `destination` given the state `x`.
    pub fn imported(&self, x: &[f64], destination: usize) -> f64 {
        (0..self.len())
            .filter(|&origin| origin != destination)
            .map(|origin| {
                let total = self.totals[origin];
                if total > 0.0 {
                    self.travelers(origin, destination) * x[origin * BLOCK + 1] / total
                } else {
                    0.0
                }
            })
            .sum()
    }
}

impl DynamicalSystem<f64> for CityNetwork {
    fn dimension(&self) -> usize {
        BLOCK * self.len()
    }

    fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) {
        for city in 0..self.len() {
            let base = city * BLOCK;
            let (s, i, r) = (x[base], x[base + 1], x[base + 2]);
            let CityRates { beta, gamma } = self.rates[city];

            let new_infections = incidence(beta, s, i, self.totals[city]);
            let new_recoveries = gamma * i;
            let imported = self.imported(x, city);

            out[base] = s - new_infections;
            out[base + 1] = i + new_infections - new_recoveries + imported;
            out[base + 2] = r + new_recoveries;
        }
    }
}

/// Daily `S`, `I`, `R` of one city, day 0 first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityHistory {
    pub name: String,
    pub total: f64,
    pub susceptible: Vec<f64>,
    pub infected: Vec<f64>,
    pub recovered: Vec<f64>,
}

/// Runs the network for `params.days` days. Each history holds `days + 1`
/// entries: the initial state followed by one entry per simulated day.
pub fn simulate_cities(params: &CityNetworkParams) -> Result<Vec<CityHistory>> {
    let network = CityNetwork::new(params)?;
    let mut state = CityNetwork::initial_state(params);
    let mut stepper = DiscreteMap::new(network.dimension());
    let mut t = 0.0;

    let mut histories: Vec<CityHistory> = network
        .names()
        .iter()
        .enumerate()
        .map(|(city, name)| CityHistory {
            name: name.clone(),
            total: network.total(city),
            susceptible: Vec::with_capacity(params.days + 1),
            infected: Vec::with_capacity(params.days + 1),
            recovered: Vec::with_capacity(params.days + 1),
        })
        .collect();

    let record = |histories: &mut [CityHistory], state: &[f64]| {
        for (history, block) in histories.iter_mut().zip(state.chunks_exact(BLOCK)) {
            history.susceptible.push(block[0]);
            history.infected.push(block[1]);
            history.recovered.push(block[2]);
        }
    };

    debug!(
        "simulating {} cities for {} days",
        network.len(),
        params.days
    );

    record(&mut histories, &state);
    for _ in 0..params.days {
        stepper.step(&network, &mut t, &mut state, 1.0);
        record(&mut histories, &state);
    }

    Ok(histories)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn city(name: &str, s: f64, i: f64, r: f64) -> City {
        City {
            name: name.to_string(),
            susceptible: s,
            infected: i,
            recovered: r,
            rates: None,
        }
    }

    fn route(origin: &str, destination: &str, travelers: f64) -> Route {
        Route {
            origin: origin.to_string(),
            destination: destination.to_string(),
            travelers,
        }
    }

    fn params(
        cities: Vec<City>,
        routes: Vec<Route>,
        beta: f64,
        gamma: f64,
        days: usize,
    ) -> CityNetworkParams {
        CityNetworkParams {
            cities,
            beta,
            gamma,
            routes,
            days,
        }
    }

    fn assert_invalid_parameter(result: Result<CityNetwork>, needle: &str) {
        match result {
            Err(EngineError::InvalidParameter { name, reason }) => assert!(
                name.contains(needle) || reason.contains(needle),
                "`{needle}` not in `{name}: {reason}`"
            ),
            other => panic!("expected invalid parameter, got {other:?}"),
        }
    }

    #[test]
    fn fully_infected_city_seeds_neighbor_through_travel_only() {
        let p = params(
            vec![city("A", 0.0, 500.0, 0.0), city("B", 1000.0, 0.0, 0.0)],
            vec![route("A", "B", 20.0)],
            0.0,
            0.0,
            10,
        );
        let histories = simulate_cities(&p).unwrap();
        let b = &histories[1];
        assert_eq!(b.infected.len(), 11);
        assert_eq!(b.infected[0], 0.0);
        for day in 1..b.infected.len() {
            assert!(b.infected[day] > b.infected[day - 1]);
            assert!((b.infected[day] - 20.0 * day as f64).abs() < 1e-9);
        }
        // A keeps its infected; travel does not drain the origin.
        assert!(histories[0].infected.iter().all(|&i| i == 500.0));
    }

    #[test]
    fn local_zero_rates_override_network_rates() {
        let mut b = city("B", 1000.0, 0.0, 0.0);
        b.rates = Some(CityRates {
            beta: 0.0,
            gamma: 0.0,
        });
        let p = params(
            vec![city("A", 0.0, 500.0, 0.0), b],
            vec![route("A", "B", 10.0)],
            0.5,
            0.1,
            5,
        );
        let histories = simulate_cities(&p).unwrap();
        let b = &histories[1];
        // B's own rates are zero, so its S never moves while I keeps rising.
        assert!(b.susceptible.iter().all(|&s| s == 1000.0));
        for day in 1..b.infected.len() {
            assert!(b.infected[day] > b.infected[day - 1]);
        }
    }

    #[test]
    fn imports_use_previous_day_values() {
        let p = params(
            vec![city("A", 900.0, 100.0, 0.0), city("B", 1000.0, 0.0, 0.0)],
            vec![route("A", "B", 50.0)],
            0.3,
            0.1,
            1,
        );
        let histories = simulate_cities(&p).unwrap();
        // A's day-0 infected proportion is 100 / 1000. Using A's updated
        // day-1 value would give a different import.
        let expected_import = 50.0 * 100.0 / 1000.0;
        assert!((histories[1].infected[1] - expected_import).abs() < 1e-12);

        let a_day1 = 100.0 + 0.3 * 900.0 * 100.0 / 1000.0 - 0.1 * 100.0;
        assert!((histories[0].infected[1] - a_day1).abs() < 1e-12);
        assert!((50.0 * a_day1 / 1000.0 - expected_import).abs() > 0.5);
    }

    #[test]
    fn city_order_does_not_change_results() {
        let forward = params(
            vec![city("A", 900.0, 100.0, 0.0), city("B", 800.0, 5.0, 0.0)],
            vec![route("A", "B", 30.0), route("B", "A", 12.0)],
            0.4,
            0.1,
            20,
        );
        let mut reversed = forward.clone();
        reversed.cities.reverse();

        let f = simulate_cities(&forward).unwrap();
        let r = simulate_cities(&reversed).unwrap();
        assert_eq!(f[0], r[1]);
        assert_eq!(f[1], r[0]);
    }

    #[test]
    fn single_city_without_travel_is_closed_sir() {
        let p = params(vec![city("Solo", 990.0, 10.0, 0.0)], Vec::new(), 0.3, 0.1, 30);
        let history = &simulate_cities(&p).unwrap()[0];
        assert_eq!(history.total, 1000.0);
        for day in 0..=30 {
            let sum = history.susceptible[day] + history.infected[day] + history.recovered[day];
            assert!((sum - 1000.0).abs() < 1e-9);
            if day > 0 {
                assert!(history.susceptible[day] <= history.susceptible[day - 1]);
            }
        }
    }

    #[test]
    fn zero_days_returns_only_initial_state() {
        let p = params(vec![city("A", 10.0, 1.0, 0.0)], Vec::new(), 0.3, 0.1, 0);
        let history = &simulate_cities(&p).unwrap()[0];
        assert_eq!(history.infected, vec![1.0]);
    }

    #[test]
    fn validation_fails_fast() {
        let base = || {
            params(
                vec![city("A", 10.0, 1.0, 0.0), city("B", 10.0, 0.0, 0.0)],
                Vec::new(),
                0.3,
                0.1,
                5,
            )
        };

        let mut p = base();
        p.cities[1] = city("B", 0.0, 0.0, 0.0);
        assert_invalid_parameter(CityNetwork::new(&p), "B.population");

        let mut p = base();
        p.beta = 1.5;
        assert_invalid_parameter(CityNetwork::new(&p), "beta");

        let mut p = base();
        p.gamma = -0.1;
        assert_invalid_parameter(CityNetwork::new(&p), "gamma");

        let mut p = base();
        p.cities[1].name = "A".into();
        assert_invalid_parameter(CityNetwork::new(&p), "duplicate city");

        let mut p = base();
        p.cities.clear();
        assert_invalid_parameter(CityNetwork::new(&p), "cities");
    }

    #[test]
    fn malformed_routes_are_coupling_errors() {
        let cities = vec![city("A", 10.0, 1.0, 0.0), city("B", 10.0, 0.0, 0.0)];
        for routes in [
            vec![route("A", "A", 1.0)],
            vec![route("A", "C", 1.0)],
            vec![route("A", "B", -1.0)],
            vec![route("A", "B", 1.0), route("A", "B", 2.0)],
        ] {
            let p = params(cities.clone(), routes, 0.3, 0.1, 5);
            let err = CityNetwork::new(&p).unwrap_err();
            assert!(
                matches!(err, EngineError::InvalidCoupling { .. }),
                "unexpected {err:?}"
            );
        }
    }

    #[test]
    fn routes_are_directional() {
        let p = params(
            vec![city("A", 10.0, 1.0, 0.0), city("B", 10.0, 0.0, 0.0)],
            vec![route("A", "B", 4.0)],
            0.3,
            0.1,
            5,
        );
        let network = CityNetwork::new(&p).unwrap();
        assert_eq!(network.travelers(0, 1), 4.0);
        assert_eq!(network.travelers(1, 0), 0.0);
    }
}
