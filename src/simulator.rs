use std::{
    fmt,
    sync::atomic::{AtomicBool, Ordering},
};

use log::{debug, info, trace, warn};

use crate::{
    error::{Result, SimError},
    export::{Frame, Trajectory},
    observer::{NoopObserver, StepObserver},
    properties::MassState,
    system::System,
};

/// Where the driver is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Between steps; the state is valid.
    Idle,
    /// Inside a step.
    Stepping,
    /// A step failed. Terminal; the state is the last valid one.
    Halted { step: usize },
}

/// Outcome of [`Simulator::run`].
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub steps_completed: usize,
    pub cancelled: bool,
    pub time: f64,
    pub state: Vec<MassState>,
    /// Initial frame plus one frame per completed step, when recording.
    pub trajectory: Option<Trajectory>,
}

/// Advances a [`System`] with semi-implicit Euler.
///
/// Each step clears the force accumulators, applies gravity and spring forces,
/// updates velocity then position, projects distance constraints and finally
/// checks that the state is still finite.
pub struct Simulator<O = NoopObserver> {
    system: System,
    parallel_forces: bool,
    constraint_iterations: usize,
    observer: O,
    recorder: Option<Trajectory>,
    status: Status,
    steps: usize,
    time: f64,
    last_valid: Vec<MassState>,
}

impl Simulator {
    pub fn builder() -> SimulatorBuilder {
        SimulatorBuilder::default()
    }

    /// Driver with default settings.
    pub fn new(system: System) -> Self {
        SimulatorBuilder::default().build(system)
    }
}

impl<O: StepObserver> Simulator<O> {
    /// Advances the system by `dt`.
    ///
    /// Steps are numbered from 1. On failure the driver halts and keeps the
    /// state from before the failing step.
    pub fn step(&mut self, dt: f64) -> Result<()> {
        if let Status::Halted { step } = self.status {
            return Err(SimError::Halted { step });
        }
        check_dt(dt)?;

        let step = self.steps + 1;
        self.status = Status::Stepping;
        self.save_state();

        if let Err(err) = self.advance(step, dt) {
            self.restore_state();
            self.status = Status::Halted { step };
            self.observer.on_halt(step, &err);
            warn!("halted at step {step} (t = {}): {err}", self.time);
            return Err(err);
        }

        self.steps = step;
        self.time += dt;
        self.status = Status::Idle;
        if let Some(recorder) = &mut self.recorder {
            recorder.push(Frame {
                step,
                time: self.time,
                states: self.system.get_state(),
            });
        }
        self.observer.on_step_complete(step, self.time, &self.system);
        trace!("step {step} done, t = {}", self.time);
        Ok(())
    }

    /// Runs up to `steps` steps of size `dt`.
    pub fn run(&mut self, dt: f64, steps: usize) -> Result<RunSummary> {
        self.run_inner(dt, steps, None)
    }

    /// Like [`Simulator::run`], but checks `cancel` before every step and
    /// returns early once it is set.
    pub fn run_cancellable(
        &mut self,
        dt: f64,
        steps: usize,
        cancel: &AtomicBool,
    ) -> Result<RunSummary> {
        self.run_inner(dt, steps, Some(cancel))
    }

    fn run_inner(
        &mut self,
        dt: f64,
        steps: usize,
        cancel: Option<&AtomicBool>,
    ) -> Result<RunSummary> {
        if let Status::Halted { step } = self.status {
            return Err(SimError::Halted { step });
        }
        check_dt(dt)?;

        let mut completed = 0;
        let mut cancelled = false;
        while completed < steps {
            if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
                cancelled = true;
                warn!("run cancelled after {completed} of {steps} steps");
                break;
            }
            self.step(dt)?;
            completed += 1;
        }

        if !cancelled {
            info!("run finished: {completed} steps, t = {}", self.time);
        }
        Ok(RunSummary {
            steps_completed: completed,
            cancelled,
            time: self.time,
            state: self.get_state(),
            trajectory: self.take_trajectory(),
        })
    }

    fn advance(&mut self, step: usize, dt: f64) -> Result<()> {
        self.system.clear_forces();
        self.system.apply_gravity();
        let forces = if self.parallel_forces {
            self.system.compute_forces_parallel()
        } else {
            self.system.compute_forces()
        };
        forces.map_err(|err| match err {
            SimError::DegenerateGeometry { spring, .. } => {
                SimError::DegenerateGeometry { spring, step }
            }
            other => other,
        })?;
        self.observer.on_forces(step, &self.system);

        integrate(&mut self.system, dt);
        self.system.resolve_constraints(self.constraint_iterations);

        if !is_finite(&self.system) {
            return Err(SimError::NumericalInstability {
                step,
                time: self.time + dt,
            });
        }
        Ok(())
    }

    fn save_state(&mut self) {
        self.last_valid.clear();
        self.last_valid.extend(self.system.masses.iter().map(|m| MassState {
            position: m.position,
            velocity: m.velocity,
        }));
    }

    fn restore_state(&mut self) {
        for (mass, saved) in self.system.masses.iter_mut().zip(&self.last_valid) {
            mass.position = saved.position;
            mass.velocity = saved.velocity;
        }
    }
}

impl<O> Simulator<O> {
    /// Position and velocity of every mass, in creation order.
    pub fn get_state(&self) -> Vec<MassState> {
        self.system.get_state()
    }

    pub fn system(&self) -> &System {
        &self.system
    }

    /// Gives the system back, e.g. to restart with a smaller `dt` after a halt.
    pub fn into_system(self) -> System {
        self.system
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn steps_taken(&self) -> usize {
        self.steps
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    /// Frames recorded so far, including a partial run that halted.
    pub fn trajectory(&self) -> Option<&Trajectory> {
        self.recorder.as_ref()
    }

    /// Hands out the recorded frames and starts a new recording at the
    /// current state.
    pub fn take_trajectory(&mut self) -> Option<Trajectory> {
        self.recorder.as_ref()?;
        let frame = self.current_frame();
        let recorder = self.recorder.as_mut()?;
        let taken = std::mem::take(recorder);
        recorder.push(frame);
        Some(taken)
    }

    fn current_frame(&self) -> Frame {
        Frame {
            step: self.steps,
            time: self.time,
            states: self.system.get_state(),
        }
    }
}

impl<O> fmt::Debug for Simulator<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulator")
            .field("status", &self.status)
            .field("steps", &self.steps)
            .field("time", &self.time)
            .field("parallel_forces", &self.parallel_forces)
            .field("constraint_iterations", &self.constraint_iterations)
            .field("masses", &self.system.mass_count())
            .field("springs", &self.system.spring_count())
            .finish_non_exhaustive()
    }
}

/// Semi-implicit Euler: velocity from force first, then position from the new velocity.
fn integrate(system: &mut System, dt: f64) {
    for mass in &mut system.masses {
        mass.velocity += mass.force / mass.mass * dt;
        mass.position += mass.velocity * dt;
    }
}

fn is_finite(system: &System) -> bool {
    system
        .masses
        .iter()
        .all(|m| m.position.is_finite() && m.velocity.is_finite())
}

fn check_dt(dt: f64) -> Result<()> {
    if dt > 0.0 && dt.is_finite() {
        Ok(())
    } else {
        Err(SimError::invalid("dt", dt))
    }
}

/// Builder for `Simulator`
pub struct SimulatorBuilder<O = NoopObserver> {
    parallel_forces: bool,
    constraint_iterations: usize,
    record: bool,
    observer: O,
}

impl SimulatorBuilder {
    /// Get a Instance of `SimulatorBuilder` with default values
    pub fn new() -> Self {
        Self::default()
    }
}

impl<O: StepObserver> SimulatorBuilder<O> {
    /// Evaluate springs on the rayon pool.
    /// Results match the serial pass up to floating point summation order.
    pub fn parallel_forces(mut self, parallel_forces: bool) -> Self {
        self.parallel_forces = parallel_forces;
        self
    }

    /// Projection passes over the distance constraints after each step.
    /// `0` disables constraint resolution.
    pub fn constraint_iterations(mut self, iterations: usize) -> Self {
        self.constraint_iterations = iterations;
        self
    }

    /// Keep a frame of every step, returned by `run`.
    pub fn record(mut self, record: bool) -> Self {
        self.record = record;
        self
    }

    /// Replace the step observer.
    pub fn observer<P: StepObserver>(self, observer: P) -> SimulatorBuilder<P> {
        SimulatorBuilder {
            parallel_forces: self.parallel_forces,
            constraint_iterations: self.constraint_iterations,
            record: self.record,
            observer,
        }
    }

    /// Constructs a instance of `Simulator` that owns `system`
    pub fn build(self, system: System) -> Simulator<O> {
        debug!(
            "simulator over {} masses, {} fixes, {} springs, {} constraints",
            system.mass_count(),
            system.fix_count(),
            system.spring_count(),
            system.constraints().len()
        );

        let mut simulator = Simulator {
            last_valid: Vec::with_capacity(system.mass_count()),
            system,
            parallel_forces: self.parallel_forces,
            constraint_iterations: self.constraint_iterations,
            observer: self.observer,
            recorder: None,
            status: Status::Idle,
            steps: 0,
            time: 0.0,
        };
        if self.record {
            let mut recorder = Trajectory::new();
            recorder.push(simulator.current_frame());
            simulator.recorder = Some(recorder);
        }
        simulator
    }
}

impl Default for SimulatorBuilder {
    /// Get a Instance of `SimulatorBuilder` with default values
    fn default() -> Self {
        Self {
            parallel_forces: false,
            constraint_iterations: 1,
            record: false,
            observer: NoopObserver,
        }
    }
}
