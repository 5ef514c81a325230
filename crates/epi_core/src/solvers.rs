use crate::traits::{lit, DynamicalSystem, Scalar, Steppable};

/// Classic Runge-Kutta 4th Order Solver
pub struct RK4<T: Scalar> {
    k1: Vec<T>,
    k2: Vec<T>,
    k3: Vec<T>,
    k4: Vec<T>,
    tmp: Vec<T>,
}

impl<T: Scalar> RK4<T> {
    pub fn new(dim: usize) -> Self {
        let z = T::zero();
        Self {
            k1: vec![z; dim],
            k2: vec![z; dim],
            k3: vec![z; dim],
            k4: vec![z; dim],
            tmp: vec![z; dim],
        }
    }
}

impl<T: Scalar> Steppable<T> for RK4<T> {
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T) {
        let half = lit::<T>(0.5);
        let sixth = lit::<T>(1.0 / 6.0);
        let two = lit::<T>(2.0);

        let t0 = *t;

        // k1 = f(t, y)
        system.apply(t0, state, &mut self.k1);

        // k2 = f(t + dt/2, y + dt*k1/2)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k1[i] * half;
        }
        system.apply(t0 + dt * half, &self.tmp, &mut self.k2);

        // k3 = f(t + dt/2, y + dt*k2/2)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k2[i] * half;
        }
        system.apply(t0 + dt * half, &self.tmp, &mut self.k3);

        // k4 = f(t + dt, y + dt*k3)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k3[i];
        }
        system.apply(t0 + dt, &self.tmp, &mut self.k4);

        for i in 0..state.len() {
            state[i] = state[i]
                + dt * sixth * (self.k1[i] + two * self.k2[i] + two * self.k3[i] + self.k4[i]);
        }

        *t = t0 + dt;
    }
}

/// Outcome of one trial step of the adaptive Tsit5 scheme.
#[derive(Debug, Clone, Copy)]
pub struct StepAttempt<T: Scalar> {
    /// RMS of the local error estimate scaled by `atol + rtol * |y|`.
    /// Values at or below one mean the step meets the tolerance.
    pub error_norm: T,
    /// Whether f(t, y) at the start of the step was finite.
    pub start_derivative_finite: bool,
}

/// Tsitouras 5(4) tableau: nodes, stage rows, 5th order weights and the
/// difference between the 5th and embedded 4th order weights (FSAL stage last).
const TSIT5_C: [f64; 6] = [0.0, 0.161, 0.327, 0.9, 0.9800255409045097, 1.0];

const TSIT5_A: [&[f64]; 6] = [
    &[],
    &[0.161],
    &[-0.008480655492356989, 0.335480655492357],
    &[2.897153057105493, -6.359448489975075, 4.3622954328695815],
    &[
        5.325864828439257,
        -11.748883564062828,
        7.4955393428898365,
        -0.09249506636175525,
    ],
    &[
        5.86145544294642,
        -12.92096931784711,
        8.159367898576159,
        -0.071584973281401,
        -0.028269050394068383,
    ],
];

const TSIT5_B: [f64; 6] = [
    0.09646076681806523,
    0.01,
    0.4798896504144996,
    1.379008574103742,
    -3.290069515436081,
    2.324710524099774,
];

const TSIT5_E: [f64; 7] = [
    -0.00178001105222577714,
    -0.0008164344596567469,
    0.007880878010261995,
    -0.1447110071732629,
    0.5823571654525552,
    -0.45808210592918697,
    1.0 / 66.0,
];

/// Tsitouras 5/4 Solver
///
/// Adaptive only: [`Tsit5::attempt`] proposes a 5th order step and returns
/// the embedded error estimate, leaving acceptance to the caller.
pub struct Tsit5<T: Scalar> {
    k: [Vec<T>; 7],
    tmp: Vec<T>,
    candidate: Vec<T>,
}

impl<T: Scalar> Tsit5<T> {
    pub fn new(dim: usize) -> Self {
        let z = T::zero();
        Self {
            k: std::array::from_fn(|_| vec![z; dim]),
            tmp: vec![z; dim],
            candidate: vec![z; dim],
        }
    }

    /// The state proposed by the last call to [`Tsit5::attempt`].
    pub fn candidate(&self) -> &[T] {
        &self.candidate
    }

    /// Computes a 5th order step from `(t, state)` into the candidate buffer
    /// without touching `state`, and returns the scaled error estimate.
    pub fn attempt(
        &mut self,
        system: &impl DynamicalSystem<T>,
        t: T,
        state: &[T],
        dt: T,
        rtol: T,
        atol: T,
    ) -> StepAttempt<T> {
        self.stages(system, t, state, dt);
        let start_derivative_finite = self.k[0].iter().all(|v| v.is_finite());

        system.apply(t + dt, &self.candidate, &mut self.k[6]);

        let mut sum = T::zero();
        for i in 0..state.len() {
            let weighted = TSIT5_E
                .iter()
                .zip(&self.k)
                .fold(T::zero(), |acc, (&e, k)| acc + lit::<T>(e) * k[i]);
            let local = dt * weighted;
            let scale = atol + rtol * state[i].abs().max(self.candidate[i].abs());
            let ratio = local / scale;
            sum = sum + ratio * ratio;
        }
        let n = lit::<T>(state.len().max(1) as f64);

        StepAttempt {
            error_norm: (sum / n).sqrt(),
            start_derivative_finite,
        }
    }

    fn stages(&mut self, system: &impl DynamicalSystem<T>, t0: T, state: &[T], dt: T) {
        system.apply(t0, state, &mut self.k[0]);

        for stage in 1..TSIT5_C.len() {
            let (done, rest) = self.k.split_at_mut(stage);
            for i in 0..state.len() {
                let increment = TSIT5_A[stage]
                    .iter()
                    .zip(done.iter())
                    .fold(T::zero(), |acc, (&a, k)| acc + lit::<T>(a) * k[i]);
                self.tmp[i] = state[i] + dt * increment;
            }
            system.apply(t0 + lit::<T>(TSIT5_C[stage]) * dt, &self.tmp, &mut rest[0]);
        }

        for i in 0..state.len() {
            let increment = TSIT5_B
                .iter()
                .zip(&self.k)
                .fold(T::zero(), |acc, (&b, k)| acc + lit::<T>(b) * k[i]);
            self.candidate[i] = state[i] + dt * increment;
        }
    }
}

/// Discrete Map Stepper
/// Evaluates x_{n+1} = f(x_n) into a scratch buffer before committing, so
/// every component of the next state is computed from the previous state.
/// dt is treated as one iteration regardless of value, but t advances by dt.
pub struct DiscreteMap<T: Scalar> {
    tmp: Vec<T>,
}

impl<T: Scalar> DiscreteMap<T> {
    pub fn new(dim: usize) -> Self {
        Self {
            tmp: vec![T::zero(); dim],
        }
    }
}

impl<T: Scalar> Steppable<T> for DiscreteMap<T> {
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T) {
        system.apply(*t, state, &mut self.tmp);
        state.copy_from_slice(&self.tmp);
        *t = *t + dt;
    }
}
