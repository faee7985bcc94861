use massspring::{crane::CraneBuilder, observer::EnergyMonitor, simulator::SimulatorBuilder};

fn main() -> massspring::Result<()> {
    // Build the crane
    let crane = CraneBuilder::new().floors(10).arm_length(8).build()?;
    let load = crane.load.expect("crane has an arm");

    // Configure the simulator
    let mut simulator = SimulatorBuilder::new()
        .parallel_forces(true)
        .record(true)
        .observer(EnergyMonitor::new())
        .build(crane.system);

    // Run 10k simulation steps
    let summary = simulator.run(1e-4, 10_000)?;

    println!("springs: {}", simulator.system().spring_count());
    println!("load at {}", summary.state[load.index()].position);
    println!("energy drift {:.3e}", simulator.observer().max_relative_drift());

    if let Some(trajectory) = summary.trajectory {
        trajectory.save_csv("crane.csv")?;
    }
    Ok(())
}
