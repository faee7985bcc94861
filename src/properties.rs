use glam::{DMat3, DVec3};

/// Handle to a [`Mass`] owned by a [`crate::system::System`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MassHandle {
    pub(crate) system: u64,
    pub(crate) index: usize,
}

/// Handle to a [`Fix`] owned by a [`crate::system::System`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixHandle {
    pub(crate) system: u64,
    pub(crate) index: usize,
}

/// Handle to a [`Spring`] owned by a [`crate::system::System`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpringHandle {
    pub(crate) system: u64,
    pub(crate) index: usize,
}

/// Handle to a [`DistanceConstraint`] owned by a [`crate::system::System`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstraintHandle {
    pub(crate) system: u64,
    pub(crate) index: usize,
}

macro_rules! handle_index {
    ($($handle:ty),*) => {
        $(impl $handle {
            /// Position of the entity in creation order.
            pub fn index(&self) -> usize {
                self.index
            }
        })*
    };
}

handle_index!(MassHandle, FixHandle, SpringHandle, ConstraintHandle);

/// Either end of a spring or constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectorHandle {
    Mass(MassHandle),
    Fix(FixHandle),
}

impl ConnectorHandle {
    pub(crate) fn system(&self) -> u64 {
        match self {
            ConnectorHandle::Mass(m) => m.system,
            ConnectorHandle::Fix(f) => f.system,
        }
    }
}

impl From<MassHandle> for ConnectorHandle {
    fn from(handle: MassHandle) -> Self {
        ConnectorHandle::Mass(handle)
    }
}

impl From<FixHandle> for ConnectorHandle {
    fn from(handle: FixHandle) -> Self {
        ConnectorHandle::Fix(handle)
    }
}

/// Uniform view over anything a spring can be attached to.
pub trait Connector {
    /// Current coordinates.
    fn position(&self) -> DVec3;

    /// Accumulates `force` for the current step. Anchors ignore it.
    fn apply_force(&mut self, force: DVec3);

    fn is_movable(&self) -> bool;

    /// `None` for anchors, which behave as infinitely heavy.
    fn mass(&self) -> Option<f64>;

    /// Share of a positional correction this connector absorbs.
    fn inverse_mass(&self) -> f64 {
        self.mass().map_or(0.0, |m| 1.0 / m)
    }
}

/// A movable point mass.
#[derive(Debug, Clone)]
pub struct Mass {
    pub(crate) mass: f64,
    pub(crate) position: DVec3,
    pub(crate) velocity: DVec3,
    pub(crate) force: DVec3,
}

impl Mass {
    pub(crate) fn new(mass: f64, position: DVec3) -> Self {
        Self {
            mass,
            position,
            velocity: DVec3::ZERO,
            force: DVec3::ZERO,
        }
    }

    pub fn velocity(&self) -> DVec3 {
        self.velocity
    }

    /// Force accumulated during the last completed step.
    pub fn force(&self) -> DVec3 {
        self.force
    }

    pub fn kinetic_energy(&self) -> f64 {
        0.5 * self.mass * self.velocity.length_squared()
    }
}

impl Connector for Mass {
    fn position(&self) -> DVec3 {
        self.position
    }

    fn apply_force(&mut self, force: DVec3) {
        self.force += force;
    }

    fn is_movable(&self) -> bool {
        true
    }

    fn mass(&self) -> Option<f64> {
        Some(self.mass)
    }
}

/// An anchor that never moves.
#[derive(Debug, Clone)]
pub struct Fix {
    pub(crate) position: DVec3,
}

impl Connector for Fix {
    fn position(&self) -> DVec3 {
        self.position
    }

    fn apply_force(&mut self, _force: DVec3) {}

    fn is_movable(&self) -> bool {
        false
    }

    fn mass(&self) -> Option<f64> {
        None
    }
}

/// Linear spring between two distinct connectors.
#[derive(Debug, Clone)]
pub struct Spring {
    pub rest_length: f64,
    pub stiffness: f64,
    pub a: ConnectorHandle,
    pub b: ConnectorHandle,
}

impl Spring {
    /// Force acting on endpoint `a` when the endpoints sit at `pa` and `pb`.
    /// Endpoint `b` receives the negation. Returns `None` for a collapsed spring.
    pub fn force_on_a(&self, pa: DVec3, pb: DVec3) -> Option<DVec3> {
        let d = pb - pa;
        let dist = d.length();
        if dist == 0.0 {
            return None;
        }
        let magnitude = self.stiffness * (dist - self.rest_length);
        Some(d * (magnitude / dist))
    }

    /// Elastic energy stored at the given endpoint positions.
    pub fn potential_energy(&self, pa: DVec3, pb: DVec3) -> f64 {
        let stretch = pa.distance(pb) - self.rest_length;
        0.5 * self.stiffness * stretch * stretch
    }

    /// Derivative of the force on `b` with respect to the position of `b`,
    /// negated: `k n nᵀ + k (L - L0) / L (I - n nᵀ)`.
    ///
    /// The full Jacobian couples the endpoints as `[[-K, K], [K, -K]]`.
    pub fn stiffness_block(&self, pa: DVec3, pb: DVec3) -> Option<DMat3> {
        let d = pb - pa;
        let length = d.length();
        if length == 0.0 {
            return None;
        }
        let n = d / length;
        let nnt = DMat3::from_cols(n * n.x, n * n.y, n * n.z);
        let axial = nnt * self.stiffness;
        let lateral = (DMat3::IDENTITY - nnt) * (self.stiffness * (length - self.rest_length) / length);
        Some(axial + lateral)
    }
}

/// Hard distance between two connectors, enforced by projection after integration.
#[derive(Debug, Clone)]
pub struct DistanceConstraint {
    pub rest_length: f64,
    pub a: ConnectorHandle,
    pub b: ConnectorHandle,
}

/// Position and velocity of one mass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MassState {
    pub position: DVec3,
    pub velocity: DVec3,
}
