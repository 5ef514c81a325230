//! Stateless WASM entry point for simulation requests.

use anyhow::{Context, Result};
use epi_core::integrator::{IntegrationMethod, SolverSettings};
use epi_core::metrics::basic_reproduction_number;
use epi_core::model::ModelKind;
use epi_core::params::Rates;
use epi_core::simulation::{run, Outcome, Scenario};
use serde::Serialize;
use wasm_bindgen::prelude::*;

/// Holds only solver configuration. Every request builds its own model and
/// state, so concurrent callers never share anything mutable.
#[wasm_bindgen]
pub struct WasmSimulator {
    pub(crate) settings: SolverSettings,
}

pub(crate) fn build_settings(
    solver_name: &str,
    rtol: f64,
    atol: f64,
    max_steps: u32,
    rk4_max_dt: f64,
) -> Result<SolverSettings> {
    let method = match solver_name {
        "tsit5" => IntegrationMethod::Tsit5Adaptive,
        "rk4" => IntegrationMethod::Rk4 { max_dt: rk4_max_dt },
        other => anyhow::bail!("Unknown solver `{other}`"),
    };
    let settings = SolverSettings {
        method,
        rtol,
        atol,
        max_steps: max_steps as usize,
        initial_step: None,
    };
    settings.validate().context("Invalid solver settings")?;
    Ok(settings)
}

pub(crate) fn parse_kind(kind: &str) -> Result<ModelKind> {
    match kind {
        "sir" => Ok(ModelKind::Sir),
        "sird" => Ok(ModelKind::Sird),
        "sird_vital" => Ok(ModelKind::SirdVital),
        other => anyhow::bail!("Unknown model `{other}`"),
    }
}

#[derive(Serialize)]
struct ModelInfo {
    kind: ModelKind,
    compartments: Vec<&'static str>,
}

impl WasmSimulator {
    pub(crate) fn run_scenario(&self, scenario: &Scenario) -> Result<Outcome> {
        run(scenario, &self.settings).context("Simulation failed")
    }

    pub(crate) fn run_json(&self, request: &str) -> Result<String> {
        let scenario: Scenario =
            serde_json::from_str(request).context("Failed to decode simulation request")?;
        let outcome = self.run_scenario(&scenario)?;
        serde_json::to_string(&outcome).context("Failed to encode simulation result")
    }
}

fn to_js(err: anyhow::Error) -> JsValue {
    JsValue::from_str(&format!("{err:#}"))
}

#[wasm_bindgen]
impl WasmSimulator {
    #[wasm_bindgen(constructor)]
    pub fn new(
        solver_name: &str,
        rtol: f64,
        atol: f64,
        max_steps: u32,
        rk4_max_dt: f64,
    ) -> Result<WasmSimulator, JsValue> {
        console_error_panic_hook::set_once();
        let settings =
            build_settings(solver_name, rtol, atol, max_steps, rk4_max_dt).map_err(to_js)?;
        Ok(WasmSimulator { settings })
    }

    /// Adaptive Tsit5 with the engine's default tolerances.
    pub fn with_defaults() -> WasmSimulator {
        console_error_panic_hook::set_once();
        WasmSimulator {
            settings: SolverSettings::default(),
        }
    }

    /// Runs a scenario object (`{ model: "single" | "two_populations" | "cities", ... }`)
    /// and returns the complete outcome object.
    pub fn simulate(&self, scenario: JsValue) -> Result<JsValue, JsValue> {
        let scenario: Scenario = serde_wasm_bindgen::from_value(scenario)
            .map_err(|e| JsValue::from_str(&format!("Failed to decode simulation request: {e}")))?;
        let outcome = self.run_scenario(&scenario).map_err(to_js)?;
        serde_wasm_bindgen::to_value(&outcome)
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {e}")))
    }

    /// Same as `simulate`, exchanging JSON text.
    pub fn simulate_json(&self, request: &str) -> Result<String, JsValue> {
        self.run_json(request).map_err(to_js)
    }

    pub fn basic_reproduction_number(
        kind: &str,
        beta: f64,
        gamma: f64,
        mu: f64,
        delta: f64,
    ) -> Result<Option<f64>, JsValue> {
        let kind = parse_kind(kind).map_err(to_js)?;
        let rates = Rates {
            beta,
            gamma,
            mu,
            delta,
        };
        Ok(basic_reproduction_number(kind, &rates))
    }

    pub fn model_info(kind: &str) -> Result<JsValue, JsValue> {
        let kind = parse_kind(kind).map_err(to_js)?;
        let info = ModelInfo {
            kind,
            compartments: kind.compartments().iter().map(|c| c.symbol()).collect(),
        };
        serde_wasm_bindgen::to_value(&info)
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_known_solvers() {
        let tsit5 = WasmSimulator::new("tsit5", 1e-6, 1e-6, 1000, 0.0).expect("tsit5");
        assert_eq!(tsit5.settings.method, IntegrationMethod::Tsit5Adaptive);

        let rk4 = WasmSimulator::new("rk4", 1e-6, 1e-6, 1000, 0.1).expect("rk4");
        assert_eq!(rk4.settings.method, IntegrationMethod::Rk4 { max_dt: 0.1 });
    }

    #[test]
    fn settings_errors_are_reported_natively() {
        let err = build_settings("euler", 1e-6, 1e-6, 10, 0.1).unwrap_err();
        assert!(format!("{err:#}").contains("Unknown solver `euler`"));

        let err = build_settings("rk4", 1e-6, 1e-6, 10, 0.0).unwrap_err();
        assert!(format!("{err:#}").contains("max_dt"));
    }

    #[test]
    fn json_request_round_trip() {
        let simulator = WasmSimulator::with_defaults();
        let response = simulator
            .run_json(
                r#"{ "model": "single", "kind": "sir", "size": 1000, "initial_infected": 1,
                     "rates": { "beta": 0.3, "gamma": 0.1 }, "horizon_days": 100 }"#,
            )
            .expect("simulation should succeed");

        let value: serde_json::Value = serde_json::from_str(&response).unwrap();
        assert_eq!(value["model"], "single");
        assert_eq!(value["kind"], "sir");
        assert_eq!(value["trajectory"]["dimension"], 3);
        let day = value["summary"]["peak"]["day"].as_u64().unwrap();
        assert!(day > 10 && day < 60);
    }

    #[test]
    fn json_errors_keep_engine_context() {
        let simulator = WasmSimulator::with_defaults();
        let err = simulator
            .run_json(
                r#"{ "model": "single", "kind": "sir", "size": 10, "initial_infected": 50,
                     "horizon_days": 10 }"#,
            )
            .unwrap_err();
        let message = format!("{err:#}");
        assert!(message.starts_with("Simulation failed"));
        assert!(message.contains("initial_infected"));

        let err = simulator.run_json("{ not json").unwrap_err();
        assert!(format!("{err:#}").contains("Failed to decode simulation request"));
    }

    #[test]
    fn two_population_request_runs() {
        let simulator = WasmSimulator::new("rk4", 1e-6, 1e-6, 1_000_000, 0.1).expect("rk4");
        let response = simulator
            .run_json(r#"{ "model": "two_populations", "horizon_days": 60 }"#)
            .expect("defaults are valid");
        let value: serde_json::Value = serde_json::from_str(&response).unwrap();
        assert_eq!(value["trajectory"]["dimension"], 8);
        assert!(value["a"]["r0"].as_f64().unwrap() > 1.0);
    }

    #[test]
    fn reproduction_number_helper() {
        let r0 = WasmSimulator::basic_reproduction_number("sird", 0.3, 0.1, 0.05, 0.0)
            .expect("known model");
        assert!((r0.unwrap() - 2.0).abs() < 1e-12);
        assert_eq!(parse_kind("sird_vital").unwrap(), ModelKind::SirdVital);
        assert!(parse_kind("seir").is_err());
    }

    #[test]
    #[cfg(target_arch = "wasm32")]
    fn rejects_unknown_solver() {
        assert!(WasmSimulator::new("euler", 1e-6, 1e-6, 10, 0.1).is_err());
    }
}
