//! Deterministic construction of a crane: a square tower, a horizontal arm
//! and a load hanging from the arm tip.
//!
//! Every cell of the structure is a cube of side `unit_length`. Each cube face
//! gets its four edges plus an "X" of two diagonals, all modelled as springs
//! whose rest length is the edge length in the undeformed layout.

use std::f64::consts::SQRT_2;

use glam::DVec3;
use log::debug;

use crate::{
    error::{Result, SimError},
    properties::{ConnectorHandle, MassHandle},
    system::{System, DEFAULT_GRAVITY},
};

/// Springs added per tower floor and per arm segment.
pub const SPRINGS_PER_CELL: usize = 16;

/// A built crane and the handles needed to observe it.
#[derive(Debug)]
pub struct Crane {
    pub system: System,
    /// Four corners per floor; floor 0 are anchors.
    pub floors: Vec<[ConnectorHandle; 4]>,
    /// Four corners per arm segment, from the tower outwards.
    pub arm: Vec<[MassHandle; 4]>,
    /// Suspended load, present whenever the arm has at least one segment.
    pub load: Option<MassHandle>,
}

impl Crane {
    pub fn into_system(self) -> System {
        self.system
    }
}

/// Builder for [`Crane`]. Identical settings always produce the same layout.
#[derive(Debug, Clone)]
pub struct CraneBuilder {
    unit_length: f64,
    stiffness: f64,
    node_mass: f64,
    floors: usize,
    arm_length: usize,
    load_mass: f64,
    load_drop: f64,
    cable_stiffness: Option<f64>,
    gravity: DVec3,
}

impl CraneBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Edge length of every cube.
    pub fn unit_length(mut self, unit_length: f64) -> Self {
        self.unit_length = unit_length;
        self
    }

    /// Stiffness of every structural spring.
    pub fn stiffness(mut self, stiffness: f64) -> Self {
        self.stiffness = stiffness;
        self
    }

    /// Mass of every movable corner.
    pub fn node_mass(mut self, node_mass: f64) -> Self {
        self.node_mass = node_mass;
        self
    }

    /// Number of cubes stacked on the anchored base. At least 1.
    pub fn floors(mut self, floors: usize) -> Self {
        self.floors = floors;
        self
    }

    /// Number of cubes in the arm. `0` builds the bare tower without a load.
    pub fn arm_length(mut self, arm_length: usize) -> Self {
        self.arm_length = arm_length;
        self
    }

    pub fn load_mass(mut self, load_mass: f64) -> Self {
        self.load_mass = load_mass;
        self
    }

    /// How far below the arm's lower edge the load hangs.
    pub fn load_drop(mut self, load_drop: f64) -> Self {
        self.load_drop = load_drop;
        self
    }

    /// Stiffness of the two cables. Defaults to half the structural stiffness.
    pub fn cable_stiffness(mut self, cable_stiffness: f64) -> Self {
        self.cable_stiffness = Some(cable_stiffness);
        self
    }

    pub fn gravity(mut self, gravity: DVec3) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn build(&self) -> Result<Crane> {
        if self.floors == 0 {
            return Err(SimError::invalid("floors", self.floors));
        }
        if !(self.unit_length > 0.0) {
            return Err(SimError::invalid("unit_length", self.unit_length));
        }
        if !(self.load_drop > 0.0) {
            return Err(SimError::invalid("load_drop", self.load_drop));
        }

        let l = self.unit_length;
        let k = self.stiffness;
        let mut system = System::new();
        system.set_gravity(self.gravity)?;

        let mut floors: Vec<[ConnectorHandle; 4]> = Vec::with_capacity(self.floors + 1);
        for level in 0..=self.floors {
            let z = level as f64 * l;
            let corners = [
                DVec3::new(0.0, 0.0, z),
                DVec3::new(l, 0.0, z),
                DVec3::new(l, l, z),
                DVec3::new(0.0, l, z),
            ];
            let mut handles = Vec::with_capacity(4);
            for corner in corners {
                let handle: ConnectorHandle = if level == 0 {
                    system.add_fix(corner)?.into()
                } else {
                    system.add_mass(self.node_mass, corner)?.into()
                };
                handles.push(handle);
            }
            floors.push(to_ring(handles));
        }

        for pair in floors.windows(2) {
            connect_faces(&mut system, &pair[0], &pair[1], l, k)?;
        }

        let mut arm: Vec<[MassHandle; 4]> = Vec::with_capacity(self.arm_length);
        let mut load = None;
        if self.arm_length > 0 {
            let top = self.floors;
            let z_bot = (top - 1) as f64 * l;
            let z_top = top as f64 * l;

            let mut face = [
                floors[top - 1][1],
                floors[top - 1][2],
                floors[top][2],
                floors[top][1],
            ];
            let mut x = l;
            for _ in 0..self.arm_length {
                x += l;
                let corners = [
                    DVec3::new(x, 0.0, z_bot),
                    DVec3::new(x, l, z_bot),
                    DVec3::new(x, l, z_top),
                    DVec3::new(x, 0.0, z_top),
                ];
                let mut handles = Vec::with_capacity(4);
                for corner in corners {
                    handles.push(system.add_mass(self.node_mass, corner)?);
                }
                let segment = to_ring(handles);
                let next = segment.map(ConnectorHandle::from);
                connect_faces(&mut system, &face, &next, l, k)?;
                arm.push(segment);
                face = next;
            }

            let load_handle =
                system.add_mass(self.load_mass, DVec3::new(x, 0.5 * l, z_bot - self.load_drop))?;
            let cable_length = (0.25 * l * l + self.load_drop * self.load_drop).sqrt();
            let cable_stiffness = self.cable_stiffness.unwrap_or(0.5 * k);
            system.add_spring(face[0], load_handle, cable_length, cable_stiffness)?;
            system.add_spring(face[1], load_handle, cable_length, cable_stiffness)?;
            load = Some(load_handle);
        }

        debug!(
            "crane with {} floors, arm {}: {} masses, {} fixes, {} springs",
            self.floors,
            self.arm_length,
            system.mass_count(),
            system.fix_count(),
            system.spring_count()
        );

        Ok(Crane {
            system,
            floors,
            arm,
            load,
        })
    }
}

impl Default for CraneBuilder {
    fn default() -> Self {
        Self {
            unit_length: 1.0,
            stiffness: 2000.0,
            node_mass: 1.0,
            floors: 10,
            arm_length: 8,
            load_mass: 20.0,
            load_drop: 1.0,
            cable_stiffness: None,
            gravity: DEFAULT_GRAVITY,
        }
    }
}

fn to_ring<T: Copy>(handles: Vec<T>) -> [T; 4] {
    [handles[0], handles[1], handles[2], handles[3]]
}

/// Joins two parallel square faces whose corners correspond index by index.
///
/// Adds, for each corner `i` (modulo 4): the edge between the faces, the edge
/// along the new face, and the two diagonals of the side face they span.
/// Edges of `old` are assumed to exist already.
fn connect_faces(
    system: &mut System,
    old: &[ConnectorHandle; 4],
    new: &[ConnectorHandle; 4],
    length: f64,
    stiffness: f64,
) -> Result<()> {
    let diagonal = SQRT_2 * length;
    for i in 0..4 {
        let j = (i + 1) % 4;
        system.add_spring(old[i], new[i], length, stiffness)?;
        system.add_spring(new[i], new[j], length, stiffness)?;
        system.add_spring(old[i], new[j], diagonal, stiffness)?;
        system.add_spring(old[j], new[i], diagonal, stiffness)?;
    }
    Ok(())
}
