//! WASM bindings for the epidemic simulation engine.
//!
//! The UI hands over a scenario object and receives the whole outcome
//! (trajectory plus derived metrics) in one call. Nothing is cached between
//! calls; rendering and export stay on the JavaScript side.

mod simulator;

pub use simulator::WasmSimulator;
