//! The `epi_core` crate is the simulation engine behind the epidemic models.
//! It turns a validated parameter set into a trajectory of compartment values
//! plus the metrics derived from it. It performs no I/O and keeps no state
//! between runs.
//!
//! Key components:
//! - **Traits**: `DynamicalSystem` (vector fields and maps), `Steppable` (solvers).
//! - **Models**: SIR, SIRD and SIRD with vital dynamics behind one `ModelKind` tag.
//! - **Coupling**: two SIRD populations with cross-infection terms.
//! - **Mobility**: discrete-time SIR across cities linked by daily travelers.
//! - **Integrator**: adaptive Tsit5 (or fixed RK4) sampled on a day grid.
//! - **Metrics / Stability**: peak, R0, final distribution, early growth rate
//!   from the exact Jacobian (forward-mode dual numbers).

pub mod autodiff;
pub mod coupling;
pub mod error;
pub mod integrator;
pub mod metrics;
pub mod mobility;
pub mod model;
pub mod params;
pub mod simulation;
pub mod solvers;
pub mod stability;
pub mod traits;

pub use error::{EngineError, NumericalFailure, Result};
