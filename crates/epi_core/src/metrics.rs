//! Reductions over a finished trajectory.

use crate::error::{EngineError, Result};
use crate::integrator::Trajectory;
use crate::model::{Compartment, ModelKind};
use crate::params::Rates;
use serde::{Deserialize, Serialize};

/// Largest value of one compartment over the run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    pub sample_index: usize,
    pub time: f64,
    /// Whole day the peak sample falls on (`floor(time)`).
    pub day: usize,
    pub value: f64,
}

/// First sample at which `column` reaches its maximum, or `None` for an
/// empty trajectory.
pub fn peak_infection(trajectory: &Trajectory, column: usize) -> Result<Option<Peak>> {
    if column >= trajectory.dimension() {
        return Err(EngineError::invalid(
            "column",
            format!(
                "index {column} is outside a {}-dimensional trajectory",
                trajectory.dimension()
            ),
        ));
    }
    let mut best: Option<Peak> = None;
    for (k, (time, row)) in trajectory.times().iter().zip(trajectory.rows()).enumerate() {
        let value = row[column];
        if best.map_or(true, |b| value > b.value) {
            best = Some(Peak {
                sample_index: k,
                time: *time,
                day: time.max(0.0).floor() as usize,
                value,
            });
        }
    }
    Ok(best)
}

/// `R0 = beta / (total outflow rate from I)`. Undefined, and so `None`, when
/// nothing leaves the infected compartment. Cross-population import is not
/// part of R0; it characterizes the isolated population.
pub fn basic_reproduction_number(kind: ModelKind, rates: &Rates) -> Option<f64> {
    let outflow = kind.infected_outflow(rates);
    (outflow > 0.0).then(|| rates.beta / outflow)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompartmentShare {
    pub compartment: Compartment,
    pub initial: f64,
    #[serde(rename = "final")]
    pub final_value: f64,
    pub delta: f64,
    /// Share of the final total, in percent.
    pub percent: f64,
}

/// Final value, change since day 0 and percentage of the final total for
/// each compartment. The total includes every compartment, so deceased
/// individuals count towards it.
pub fn final_distribution(
    trajectory: &Trajectory,
    compartments: &[Compartment],
) -> Result<Vec<CompartmentShare>> {
    if compartments.len() != trajectory.dimension() {
        return Err(EngineError::DimensionMismatch {
            expected: trajectory.dimension(),
            actual: compartments.len(),
        });
    }
    let (Some(first), Some(last)) = (trajectory.first(), trajectory.last()) else {
        return Err(EngineError::DegenerateState {
            reason: "trajectory has no samples".into(),
        });
    };
    let total: f64 = last.iter().sum();
    if !(total.is_finite() && total > 0.0) {
        return Err(EngineError::DegenerateState {
            reason: format!("final population total is {total}"),
        });
    }

    Ok(compartments
        .iter()
        .enumerate()
        .map(|(k, &compartment)| CompartmentShare {
            compartment,
            initial: first[k],
            final_value: last[k],
            delta: last[k] - first[k],
            percent: last[k] / total * 100.0,
        })
        .collect())
}
