//! Positional projection of distance constraints.
//!
//! Runs after integration, so it only corrects geometry that the spring forces
//! already moved. Velocities are left untouched.

use log::trace;

use crate::{
    properties::{Connector, ConnectorHandle},
    system::System,
};

/// Pairs closer than this have no usable direction and are left alone.
const MIN_SEPARATION: f64 = 1e-12;

impl System {
    /// Projects every constraint back to its rest length, `iterations` times
    /// in insertion order. Each correction is split inversely to the masses
    /// of the endpoints; anchors take no share.
    ///
    /// Returns the largest remaining violation after the last pass.
    pub fn resolve_constraints(&mut self, iterations: usize) -> f64 {
        if self.constraints.is_empty() {
            return 0.0;
        }

        for _ in 0..iterations {
            for index in 0..self.constraints.len() {
                self.project(index);
            }
        }

        let residual = self.max_constraint_error();
        trace!("constraint residual {residual:e}");
        residual
    }

    /// Largest `|dist - rest_length|` over all constraints.
    pub fn max_constraint_error(&self) -> f64 {
        self.constraints
            .iter()
            .map(|c| {
                let dist = self.position_of(c.a).distance(self.position_of(c.b));
                (dist - c.rest_length).abs()
            })
            .fold(0.0, f64::max)
    }

    fn project(&mut self, index: usize) {
        let constraint = &self.constraints[index];
        let (a, b, rest_length) = (constraint.a, constraint.b, constraint.rest_length);

        let d = self.position_of(b) - self.position_of(a);
        let dist = d.length();
        if dist < MIN_SEPARATION {
            return;
        }

        let wa = self.connector_at(a).inverse_mass();
        let wb = self.connector_at(b).inverse_mass();
        let w = wa + wb;
        if w == 0.0 {
            return;
        }

        let correction = d / dist * (dist - rest_length) / w;
        if let ConnectorHandle::Mass(m) = a {
            self.masses[m.index].position += correction * wa;
        }
        if let ConnectorHandle::Mass(m) = b {
            self.masses[m.index].position -= correction * wb;
        }
    }
}
