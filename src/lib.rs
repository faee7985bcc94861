//! Lumped mass-spring structures: point masses, fixed anchors and linear
//! springs under gravity, advanced with semi-implicit Euler.
//!
//! # Example
//! ```rust
//! use massspring::{crane::CraneBuilder, simulator::SimulatorBuilder};
//!
//! let crane = CraneBuilder::new().floors(3).arm_length(2).build().unwrap();
//! let load = crane.load.unwrap();
//! let mut simulator = SimulatorBuilder::new().record(true).build(crane.system);
//! let summary = simulator.run(1e-3, 100).unwrap();
//! println!("load at {}", summary.state[load.index()].position);
//! ```

mod constraint;
pub mod crane;
pub mod error;
pub mod export;
mod forces;
pub mod observer;
pub mod oscillator;
pub mod properties;
pub mod simulator;
pub mod system;

pub use error::{Result, SimError};
pub use properties::{Connector, ConnectorHandle, FixHandle, MassHandle, MassState, SpringHandle};
pub use simulator::{Simulator, SimulatorBuilder};
pub use system::System;
