use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use glam::DVec3;
use log::debug;
use petgraph::graph::{NodeIndex, UnGraph};

use crate::{
    error::{Result, SimError},
    properties::{
        ConnectorHandle, ConstraintHandle, Connector, DistanceConstraint, Fix, FixHandle, Mass,
        MassHandle, MassState, Spring, SpringHandle,
    },
};

/// Standard gravity pointing down the z axis.
pub const DEFAULT_GRAVITY: DVec3 = DVec3::new(0.0, 0.0, -9.81);

static NEXT_SYSTEM_ID: AtomicU64 = AtomicU64::new(1);

/// Node of [`System::topology`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyNode {
    Mass,
    Fix,
}

/// Arena of masses, anchors, springs and constraints.
///
/// Entities are only ever appended, so every handle stays valid for the
/// lifetime of the system. Once a [`crate::simulator::Simulator`] takes
/// ownership the topology can no longer change.
#[derive(Debug)]
pub struct System {
    id: u64,
    pub(crate) masses: Vec<Mass>,
    pub(crate) fixes: Vec<Fix>,
    pub(crate) springs: Vec<Spring>,
    pub(crate) constraints: Vec<DistanceConstraint>,
    gravity: DVec3,
}

impl System {
    pub fn new() -> Self {
        Self {
            id: NEXT_SYSTEM_ID.fetch_add(1, Ordering::Relaxed),
            masses: Vec::new(),
            fixes: Vec::new(),
            springs: Vec::new(),
            constraints: Vec::new(),
            gravity: DEFAULT_GRAVITY,
        }
    }

    /// Adds a point mass at rest. `mass` must be strictly positive.
    pub fn add_mass(&mut self, mass: f64, position: DVec3) -> Result<MassHandle> {
        if !(mass > 0.0 && mass.is_finite()) {
            return Err(SimError::invalid("mass", mass));
        }
        check_finite("position", position)?;

        self.masses.push(Mass::new(mass, position));
        Ok(MassHandle {
            system: self.id,
            index: self.masses.len() - 1,
        })
    }

    pub fn add_fix(&mut self, position: DVec3) -> Result<FixHandle> {
        check_finite("position", position)?;

        self.fixes.push(Fix { position });
        Ok(FixHandle {
            system: self.id,
            index: self.fixes.len() - 1,
        })
    }

    /// Connects two distinct connectors with a linear spring.
    pub fn add_spring(
        &mut self,
        a: impl Into<ConnectorHandle>,
        b: impl Into<ConnectorHandle>,
        rest_length: f64,
        stiffness: f64,
    ) -> Result<SpringHandle> {
        let (a, b) = (a.into(), b.into());
        if !(rest_length > 0.0 && rest_length.is_finite()) {
            return Err(SimError::invalid("rest_length", rest_length));
        }
        if !(stiffness >= 0.0 && stiffness.is_finite()) {
            return Err(SimError::invalid("stiffness", stiffness));
        }
        self.check_pair(a, b)?;

        self.springs.push(Spring {
            rest_length,
            stiffness,
            a,
            b,
        });
        Ok(SpringHandle {
            system: self.id,
            index: self.springs.len() - 1,
        })
    }

    /// Adds a hard distance constraint resolved after every integration step.
    pub fn add_constraint(
        &mut self,
        a: impl Into<ConnectorHandle>,
        b: impl Into<ConnectorHandle>,
        rest_length: f64,
    ) -> Result<ConstraintHandle> {
        let (a, b) = (a.into(), b.into());
        if !(rest_length > 0.0 && rest_length.is_finite()) {
            return Err(SimError::invalid("rest_length", rest_length));
        }
        self.check_pair(a, b)?;

        self.constraints.push(DistanceConstraint { rest_length, a, b });
        Ok(ConstraintHandle {
            system: self.id,
            index: self.constraints.len() - 1,
        })
    }

    pub fn set_gravity(&mut self, gravity: DVec3) -> Result<()> {
        check_finite("gravity", gravity)?;
        self.gravity = gravity;
        Ok(())
    }

    /// Sets the initial velocity of a mass.
    pub fn set_velocity(&mut self, handle: MassHandle, velocity: DVec3) -> Result<()> {
        check_finite("velocity", velocity)?;
        self.check_handle(handle.into())?;
        self.masses[handle.index].velocity = velocity;
        Ok(())
    }

    pub fn gravity(&self) -> DVec3 {
        self.gravity
    }

    pub fn masses(&self) -> &[Mass] {
        &self.masses
    }

    pub fn fixes(&self) -> &[Fix] {
        &self.fixes
    }

    pub fn springs(&self) -> &[Spring] {
        &self.springs
    }

    pub fn constraints(&self) -> &[DistanceConstraint] {
        &self.constraints
    }

    pub fn mass_count(&self) -> usize {
        self.masses.len()
    }

    pub fn fix_count(&self) -> usize {
        self.fixes.len()
    }

    pub fn spring_count(&self) -> usize {
        self.springs.len()
    }

    pub fn mass(&self, handle: MassHandle) -> Result<&Mass> {
        self.check_handle(handle.into())?;
        Ok(&self.masses[handle.index])
    }

    /// Resolves any handle to its uniform connector view.
    pub fn connector(&self, handle: impl Into<ConnectorHandle>) -> Result<&dyn Connector> {
        let handle = handle.into();
        self.check_handle(handle)?;
        Ok(self.connector_at(handle))
    }

    /// Position and velocity of every mass, in creation order.
    pub fn get_state(&self) -> Vec<MassState> {
        self.masses
            .iter()
            .map(|m| MassState {
                position: m.position,
                velocity: m.velocity,
            })
            .collect()
    }

    pub fn kinetic_energy(&self) -> f64 {
        self.masses.iter().map(Mass::kinetic_energy).sum()
    }

    /// Elastic energy of all springs plus gravitational energy of all masses,
    /// measured from the origin.
    pub fn potential_energy(&self) -> f64 {
        let elastic: f64 = self
            .springs
            .iter()
            .map(|s| s.potential_energy(self.position_of(s.a), self.position_of(s.b)))
            .sum();
        let gravitational: f64 = self
            .masses
            .iter()
            .map(|m| -m.mass * self.gravity.dot(m.position))
            .sum();
        elastic + gravitational
    }

    pub fn total_energy(&self) -> f64 {
        self.kinetic_energy() + self.potential_energy()
    }

    pub fn total_momentum(&self) -> DVec3 {
        self.masses.iter().map(|m| m.velocity * m.mass).sum()
    }

    /// Connectivity graph: fixes first, then masses, each in creation order,
    /// with one edge per spring weighted by its rest length.
    pub fn topology(&self) -> UnGraph<TopologyNode, f64> {
        let mut graph =
            UnGraph::with_capacity(self.fixes.len() + self.masses.len(), self.springs.len());
        for _ in &self.fixes {
            graph.add_node(TopologyNode::Fix);
        }
        for _ in &self.masses {
            graph.add_node(TopologyNode::Mass);
        }
        for spring in &self.springs {
            graph.add_edge(self.node_index(spring.a), self.node_index(spring.b), spring.rest_length);
        }
        graph
    }

    fn node_index(&self, handle: ConnectorHandle) -> NodeIndex {
        match handle {
            ConnectorHandle::Fix(f) => NodeIndex::new(f.index),
            ConnectorHandle::Mass(m) => NodeIndex::new(self.fixes.len() + m.index),
        }
    }

    /// Position lookup for handles already validated at insertion time.
    pub(crate) fn position_of(&self, handle: ConnectorHandle) -> DVec3 {
        match handle {
            ConnectorHandle::Mass(m) => self.masses[m.index].position,
            ConnectorHandle::Fix(f) => self.fixes[f.index].position,
        }
    }

    pub(crate) fn connector_at(&self, handle: ConnectorHandle) -> &dyn Connector {
        match handle {
            ConnectorHandle::Mass(m) => &self.masses[m.index],
            ConnectorHandle::Fix(f) => &self.fixes[f.index],
        }
    }

    pub(crate) fn connector_mut(&mut self, handle: ConnectorHandle) -> &mut dyn Connector {
        match handle {
            ConnectorHandle::Mass(m) => &mut self.masses[m.index],
            ConnectorHandle::Fix(f) => &mut self.fixes[f.index],
        }
    }

    fn check_pair(&self, a: ConnectorHandle, b: ConnectorHandle) -> Result<()> {
        self.check_handle(a)?;
        self.check_handle(b)?;
        if a == b {
            return Err(SimError::invalid("connectors", format!("{a:?} twice")));
        }
        Ok(())
    }

    fn check_handle(&self, handle: ConnectorHandle) -> Result<()> {
        let (kind, index, len) = match handle {
            ConnectorHandle::Mass(m) => ("mass", m.index, self.masses.len()),
            ConnectorHandle::Fix(f) => ("fix", f.index, self.fixes.len()),
        };
        if handle.system() != self.id || index >= len {
            debug!("rejected {kind} handle #{index} from system {}", handle.system());
            return Err(SimError::DanglingReference {
                kind,
                index,
                handle_system: handle.system(),
                system: self.id,
            });
        }
        Ok(())
    }
}

/// A clone is a separate system: it gets its own id, so handles of the
/// original are dangling in the clone and the other way round.
impl Clone for System {
    fn clone(&self) -> Self {
        Self {
            id: NEXT_SYSTEM_ID.fetch_add(1, Ordering::Relaxed),
            masses: self.masses.clone(),
            fixes: self.fixes.clone(),
            springs: self.springs.clone(),
            constraints: self.constraints.clone(),
            gravity: self.gravity,
        }
    }
}

impl Default for System {
    fn default() -> Self {
        Self::new()
    }
}

fn check_finite(what: &'static str, v: DVec3) -> Result<()> {
    if v.is_finite() {
        Ok(())
    } else {
        Err(SimError::invalid(what, v))
    }
}

impl fmt::Display for ConnectorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectorHandle::Mass(m) => write!(f, "mass #{}", m.index),
            ConnectorHandle::Fix(x) => write!(f, "fix #{}", x.index),
        }
    }
}

impl fmt::Display for System {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "fixes:")?;
        for fix in &self.fixes {
            writeln!(f, "  pos = {}", fix.position)?;
        }
        writeln!(f, "masses:")?;
        for mass in &self.masses {
            writeln!(f, "  m = {}, pos = {}", mass.mass, mass.position)?;
        }
        writeln!(f, "springs:")?;
        for spring in &self.springs {
            writeln!(
                f,
                "  length = {}, stiffness = {}, {} - {}",
                spring.rest_length, spring.stiffness, spring.a, spring.b
            )?;
        }
        if !self.constraints.is_empty() {
            writeln!(f, "constraints:")?;
            for c in &self.constraints {
                writeln!(f, "  length = {}, {} - {}", c.rest_length, c.a, c.b)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_handles_follow_creation_order() {
        let mut system = System::new();
        let f = system.add_fix(DVec3::ZERO).unwrap();
        let m0 = system.add_mass(1.0, DVec3::X).unwrap();
        let m1 = system.add_mass(2.0, DVec3::Y).unwrap();
        assert_eq!(f.index(), 0);
        assert_eq!(m0.index(), 0);
        assert_eq!(m1.index(), 1);

        let state = system.get_state();
        assert_eq!(state.len(), 2);
        assert_eq!(state[1].position, DVec3::Y);
        assert_eq!(state[1].velocity, DVec3::ZERO);
        assert_eq!(system.gravity(), DEFAULT_GRAVITY);
    }

    #[test]
    fn test_add_mass_rejects_non_positive() {
        let mut system = System::new();
        assert!(matches!(
            system.add_mass(0.0, DVec3::ZERO),
            Err(SimError::InvalidParameter { what: "mass", .. })
        ));
        assert!(system.add_mass(-1.0, DVec3::ZERO).is_err());
        assert!(system.add_mass(f64::NAN, DVec3::ZERO).is_err());
        assert_eq!(system.mass_count(), 0);
    }

    #[test]
    fn test_add_spring_validation() {
        let mut system = System::new();
        let a = system.add_mass(1.0, DVec3::ZERO).unwrap();
        let b = system.add_fix(DVec3::X).unwrap();

        assert!(matches!(
            system.add_spring(a, b, 0.0, 1.0),
            Err(SimError::InvalidParameter { what: "rest_length", .. })
        ));
        assert!(matches!(
            system.add_spring(a, b, 1.0, -1.0),
            Err(SimError::InvalidParameter { what: "stiffness", .. })
        ));
        assert!(matches!(
            system.add_spring(a, a, 1.0, 1.0),
            Err(SimError::InvalidParameter { what: "connectors", .. })
        ));
        assert_eq!(system.spring_count(), 0);

        // Zero stiffness is a valid, inert spring.
        assert!(system.add_spring(a, b, 1.0, 0.0).is_ok());
    }

    #[test]
    fn test_foreign_handle_is_dangling() {
        let mut first = System::new();
        let mut second = System::new();
        let foreign = first.add_mass(1.0, DVec3::ZERO).unwrap();
        let local = second.add_mass(1.0, DVec3::X).unwrap();

        assert!(matches!(
            second.add_spring(local, foreign, 1.0, 1.0),
            Err(SimError::DanglingReference { kind: "mass", .. })
        ));
        assert!(matches!(
            second.add_constraint(foreign, local, 1.0),
            Err(SimError::DanglingReference { .. })
        ));
        assert!(second.set_velocity(foreign, DVec3::X).is_err());
        assert_eq!(second.spring_count(), 0);
    }

    #[test]
    fn test_clone_does_not_share_handles() {
        let mut original = System::new();
        let a = original.add_mass(1.0, DVec3::ZERO).unwrap();
        let mut copy = original.clone();
        let foreign = copy.add_mass(1.0, DVec3::X).unwrap();
        let b = original.add_mass(1.0, DVec3::Y).unwrap();

        assert!(matches!(
            original.add_spring(a, foreign, 1.0, 1.0),
            Err(SimError::DanglingReference { .. })
        ));
        assert!(matches!(
            copy.add_spring(foreign, b, 1.0, 1.0),
            Err(SimError::DanglingReference { .. })
        ));
        assert!(copy.mass(a).is_err());
        assert_eq!(copy.mass_count(), 2);
        assert_eq!(original.spring_count(), 0);
        assert_eq!(copy.spring_count(), 0);
    }

    #[test]
    fn test_connector_view_is_uniform() {
        let mut system = System::new();
        let m = system.add_mass(3.0, DVec3::X).unwrap();
        let f = system.add_fix(DVec3::Y).unwrap();

        let mass = system.connector(m).unwrap();
        assert!(mass.is_movable());
        assert_eq!(mass.mass(), Some(3.0));

        let fix = system.connector(f).unwrap();
        assert!(!fix.is_movable());
        assert_eq!(fix.position(), DVec3::Y);
    }

    #[test]
    fn test_energy_and_momentum() {
        let mut system = System::new();
        system.set_gravity(DVec3::new(0.0, 0.0, -10.0)).unwrap();
        let a = system.add_mass(2.0, DVec3::new(0.0, 0.0, 1.0)).unwrap();
        let b = system.add_fix(DVec3::new(0.0, 0.0, 3.0)).unwrap();
        system.add_spring(a, b, 1.0, 4.0).unwrap();
        system.set_velocity(a, DVec3::X).unwrap();

        assert_relative_eq!(system.kinetic_energy(), 1.0);
        // spring: 0.5 * 4 * 1^2, gravity: 2 * 10 * 1
        assert_relative_eq!(system.potential_energy(), 22.0);
        assert_eq!(system.total_momentum(), DVec3::new(2.0, 0.0, 0.0));
    }

    #[test]
    fn test_topology_has_one_edge_per_spring() {
        let mut system = System::new();
        let f = system.add_fix(DVec3::ZERO).unwrap();
        let m0 = system.add_mass(1.0, DVec3::X).unwrap();
        let m1 = system.add_mass(1.0, DVec3::Y).unwrap();
        system.add_spring(f, m0, 1.0, 1.0).unwrap();
        system.add_spring(m0, m1, 2.0_f64.sqrt(), 1.0).unwrap();

        let graph = system.topology();
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph[NodeIndex::new(0)], TopologyNode::Fix);
        assert!(graph.contains_edge(NodeIndex::new(1), NodeIndex::new(2)));
    }

    #[test]
    fn test_display_lists_entities() {
        let mut system = System::new();
        let f = system.add_fix(DVec3::ZERO).unwrap();
        let m = system.add_mass(1.0, DVec3::X).unwrap();
        system.add_spring(f, m, 1.0, 10.0).unwrap();

        let text = system.to_string();
        assert!(text.contains("fixes:"));
        assert!(text.contains("m = 1"));
        assert!(text.contains("fix #0 - mass #0"));
    }
}
