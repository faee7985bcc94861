//! Hooks into the step loop.

use crate::{error::SimError, system::System};

/// Callbacks invoked by [`crate::simulator::Simulator`] while stepping.
///
/// Every method has an empty default, so observers only implement what they
/// care about.
pub trait StepObserver {
    /// Forces for `step` are accumulated but not yet integrated.
    fn on_forces(&mut self, _step: usize, _system: &System) {}

    /// `step` finished and the state is valid at `time`.
    fn on_step_complete(&mut self, _step: usize, _time: f64, _system: &System) {}

    /// `step` failed and the driver halted.
    fn on_halt(&mut self, _step: usize, _error: &SimError) {}
}

/// Observer that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl StepObserver for NoopObserver {}

/// Tracks total energy after every completed step.
#[derive(Debug, Default, Clone)]
pub struct EnergyMonitor {
    pub energies: Vec<f64>,
}

impl EnergyMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Largest deviation from the first recorded energy, relative to its magnitude.
    pub fn max_relative_drift(&self) -> f64 {
        let Some(&first) = self.energies.first() else {
            return 0.0;
        };
        let scale = first.abs().max(f64::EPSILON);
        self.energies
            .iter()
            .map(|e| (e - first).abs() / scale)
            .fold(0.0, f64::max)
    }
}

impl StepObserver for EnergyMonitor {
    fn on_step_complete(&mut self, _step: usize, _time: f64, system: &System) {
        self.energies.push(system.total_energy());
    }
}
