use std::{
    fs::File,
    io::{self, Write},
    path::PathBuf,
    process::ExitCode,
};

use clap::{Parser, Subcommand};
use log::{error, info, warn};

use massspring::{
    crane::CraneBuilder,
    oscillator::{write_scan_csv, Method, Oscillator},
    observer::StepObserver,
    simulator::{RunSummary, SimulatorBuilder},
    Result, Simulator,
};

#[derive(Parser, Debug)]
#[command(version, about = "Mass-spring structure simulator")]
struct Args {
    /// Where to write the CSV table. Defaults to stdout.
    #[arg(short('o'), long, global = true)]
    out: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the crane and record its motion under gravity.
    Crane {
        #[arg(long, default_value_t = 10)]
        floors: usize,

        #[arg(long, default_value_t = 8)]
        arm_length: usize,

        #[arg(long, default_value_t = 1.0)]
        unit_length: f64,

        #[arg(long, default_value_t = 2000.0)]
        stiffness: f64,

        #[arg(long, default_value_t = 1.0)]
        node_mass: f64,

        #[arg(long, default_value_t = 20.0)]
        load_mass: f64,

        /// Time step in seconds.
        #[arg(long, default_value_t = 1e-3)]
        dt: f64,

        #[arg(long, default_value_t = 1000)]
        steps: usize,

        /// Evaluate springs on all cores.
        #[arg(long)]
        parallel: bool,
    },

    /// Integrate a unit oscillator for several step sizes.
    Oscillator {
        /// explicit, improved, implicit, crank-nicolson or symplectic
        #[arg(short('m'), long, default_value = "explicit")]
        method: Method,

        #[arg(long, default_value_t = 1.0)]
        mass: f64,

        #[arg(long, default_value_t = 1.0)]
        stiffness: f64,

        #[arg(long, default_value_t = 8.0 * std::f64::consts::PI)]
        t_end: f64,

        #[arg(long, value_delimiter = ',', default_value = "0.1,0.05,0.01")]
        taus: Vec<f64>,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let out: Box<dyn Write> = match &args.out {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(io::stdout().lock()),
    };

    match args.command {
        Command::Crane {
            floors,
            arm_length,
            unit_length,
            stiffness,
            node_mass,
            load_mass,
            dt,
            steps,
            parallel,
        } => {
            let crane = CraneBuilder::new()
                .floors(floors)
                .arm_length(arm_length)
                .unit_length(unit_length)
                .stiffness(stiffness)
                .node_mass(node_mass)
                .load_mass(load_mass)
                .build()?;
            let load = crane.load;
            info!(
                "crane: {} masses, {} springs",
                crane.system.mass_count(),
                crane.system.spring_count()
            );

            let mut simulator = SimulatorBuilder::new()
                .parallel_forces(parallel)
                .record(true)
                .build(crane.system);
            let summary = record_run(&mut simulator, dt, steps, out)?;

            if let Some(load) = load {
                info!(
                    "load at {} after t = {}",
                    summary.state[load.index()].position,
                    summary.time
                );
            }
        }
        Command::Oscillator {
            method,
            mass,
            stiffness,
            t_end,
            taus,
        } => {
            let oscillator = Oscillator::new(mass, stiffness)?;
            let samples = oscillator.scan(method, (1.0, 0.0), &taus, t_end)?;
            info!("{method}: {} samples over {} step sizes", samples.len(), taus.len());
            write_scan_csv(&samples, out)?;
        }
    }
    Ok(())
}

/// Runs `simulator` and writes its recording to `out`. A halted run still
/// writes the frames recorded before the failing step.
fn record_run<O: StepObserver, W: Write>(
    simulator: &mut Simulator<O>,
    dt: f64,
    steps: usize,
    out: W,
) -> Result<RunSummary> {
    match simulator.run(dt, steps) {
        Ok(summary) => {
            if let Some(trajectory) = &summary.trajectory {
                trajectory.write_csv(out)?;
            }
            Ok(summary)
        }
        Err(err) => {
            if let Some(trajectory) = simulator.trajectory() {
                warn!("writing {} frames recorded before the halt", trajectory.len());
                trajectory.write_csv(out)?;
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use glam::DVec3;
    use massspring::{SimError, System};

    #[test]
    fn test_halted_run_still_writes_recording() {
        let mut system = System::new();
        system.set_gravity(DVec3::ZERO).unwrap();
        let anchor = system.add_fix(DVec3::ZERO).unwrap();
        let bob = system.add_mass(1e-3, DVec3::new(1.5, 0.0, 0.0)).unwrap();
        system.add_spring(anchor, bob, 1.0, 1e6).unwrap();
        let mut simulator = SimulatorBuilder::new().record(true).build(system);

        let mut out = Vec::new();
        let err = record_run(&mut simulator, 0.1, 10_000, &mut out).unwrap_err();
        let SimError::NumericalInstability { step, .. } = err else {
            panic!("unexpected error {err}");
        };

        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("time,step,mass,x,y,z,vx,vy,vz"));
        assert_eq!(lines.next(), Some("0.0,0,0,1.5,0.0,0.0,0.0,0.0,0.0"));
        // One row per frame before the halt, frame 0 included.
        assert_eq!(text.lines().count(), 1 + step);
    }

    #[test]
    fn test_completed_run_writes_every_frame() {
        let mut system = System::new();
        system.add_mass(1.0, DVec3::ZERO).unwrap();
        let mut simulator = SimulatorBuilder::new().record(true).build(system);

        let mut out = Vec::new();
        let summary = record_run(&mut simulator, 1e-3, 5, &mut out).unwrap();
        assert_eq!(summary.steps_completed, 5);
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 1 + 6);
    }
}
