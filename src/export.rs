//! Trajectory recording and flat CSV export.
//!
//! The table has one header row followed by one row per (time, mass):
//!
//! ```text
//! time,step,mass,x,y,z,vx,vy,vz
//! ```

use std::{fs::File, io::Write, path::Path};

use serde::Serialize;

use crate::{error::Result, properties::MassState};

/// Snapshot of every mass after a fully completed step.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub step: usize,
    pub time: f64,
    pub states: Vec<MassState>,
}

/// Ordered sequence of frames.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trajectory {
    frames: Vec<Frame>,
}

#[derive(Serialize)]
struct Row {
    time: f64,
    step: usize,
    mass: usize,
    x: f64,
    y: f64,
    z: f64,
    vx: f64,
    vy: f64,
    vz: f64,
}

impl Trajectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn last(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Positions of one mass over time.
    pub fn positions_of(&self, mass: usize) -> impl Iterator<Item = (f64, glam::DVec3)> + '_ {
        self.frames
            .iter()
            .filter_map(move |f| f.states.get(mass).map(|s| (f.time, s.position)))
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv = csv::Writer::from_writer(writer);
        for frame in &self.frames {
            for (mass, state) in frame.states.iter().enumerate() {
                csv.serialize(Row {
                    time: frame.time,
                    step: frame.step,
                    mass,
                    x: state.position.x,
                    y: state.position.y,
                    z: state.position.z,
                    vx: state.velocity.x,
                    vy: state.velocity.y,
                    vz: state.velocity.z,
                })?;
            }
        }
        csv.flush()?;
        Ok(())
    }

    pub fn save_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.write_csv(File::create(path)?)
    }
}
