use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// Numeric type a compartment model can be evaluated over.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// Lifts an `f64` constant into `T`. Every `Scalar` in this crate converts
/// from `f64` exactly.
pub(crate) fn lit<T: Scalar>(value: f64) -> T {
    T::from_f64(value).unwrap()
}

/// A vector field (continuous models) or a next-state map (discrete models).
pub trait DynamicalSystem<T: Scalar> {
    /// Number of compartments in the state vector.
    fn dimension(&self) -> usize;

    /// Evaluates the system at `(t, x)`.
    /// Flows write dx/dt into `out`; maps write x_{n+1}.
    /// `x` and `out` never alias, so a map reads only the previous state.
    fn apply(&self, t: T, x: &[T], out: &mut [T]);
}

/// A solver that advances a system by one step of fixed size.
pub trait Steppable<T: Scalar> {
    /// Advances `state` from `t` to `t + dt`, updating both in place.
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T);
}
