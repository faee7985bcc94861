//! Force accumulation: gravity and Hooke's-law springs.

use glam::DVec3;
use rayon::prelude::*;

use crate::{
    error::{Result, SimError},
    properties::{Connector, ConnectorHandle, Spring},
    system::System,
};

impl System {
    /// Zeroes every force accumulator.
    pub fn clear_forces(&mut self) {
        for mass in &mut self.masses {
            mass.force = DVec3::ZERO;
        }
    }

    /// Adds `m * g` to every mass.
    pub fn apply_gravity(&mut self) {
        let gravity = self.gravity();
        for mass in &mut self.masses {
            mass.apply_force(gravity * mass.mass);
        }
    }

    /// Accumulates the force of every spring into its endpoints.
    ///
    /// Fails with [`SimError::DegenerateGeometry`] on the first spring whose
    /// endpoints coincide. Accumulators may then hold a partial sum.
    pub fn compute_forces(&mut self) -> Result<()> {
        for index in 0..self.springs.len() {
            let spring = &self.springs[index];
            let (a, b) = (spring.a, spring.b);
            let force = self.spring_force(index, spring)?;
            self.connector_mut(a).apply_force(force);
            self.connector_mut(b).apply_force(-force);
        }
        Ok(())
    }

    /// Same as [`System::compute_forces`], with springs split across the rayon
    /// pool. Each task sums into its own buffer and the buffers are reduced
    /// before touching the masses.
    pub fn compute_forces_parallel(&mut self) -> Result<()> {
        let count = self.masses.len();
        let this = &*self;
        let totals = this
            .springs
            .par_iter()
            .enumerate()
            .try_fold(
                || vec![DVec3::ZERO; count],
                |mut partial, (index, spring)| {
                    let force = this.spring_force(index, spring)?;
                    accumulate(&mut partial, spring.a, force);
                    accumulate(&mut partial, spring.b, -force);
                    Ok::<_, SimError>(partial)
                },
            )
            .try_reduce(
                || vec![DVec3::ZERO; count],
                |mut lhs, rhs| {
                    for (l, r) in lhs.iter_mut().zip(rhs) {
                        *l += r;
                    }
                    Ok(lhs)
                },
            )?;

        for (mass, force) in self.masses.iter_mut().zip(totals) {
            mass.apply_force(force);
        }
        Ok(())
    }

    fn spring_force(&self, index: usize, spring: &Spring) -> Result<DVec3> {
        spring
            .force_on_a(self.position_of(spring.a), self.position_of(spring.b))
            .ok_or(SimError::DegenerateGeometry {
                spring: index,
                step: 0,
            })
    }
}

fn accumulate(forces: &mut [DVec3], handle: ConnectorHandle, force: DVec3) {
    if let ConnectorHandle::Mass(m) = handle {
        forces[m.index] += force;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    fn triangle() -> System {
        let mut system = System::new();
        let f = system.add_fix(DVec3::ZERO).unwrap();
        let a = system.add_mass(1.0, DVec3::new(1.5, 0.0, 0.0)).unwrap();
        let b = system.add_mass(2.0, DVec3::new(0.0, 0.7, 0.2)).unwrap();
        system.add_spring(f, a, 1.0, 10.0).unwrap();
        system.add_spring(a, b, 1.0, 20.0).unwrap();
        system.add_spring(b, f, 1.0, 5.0).unwrap();
        system
    }

    #[test]
    fn test_spring_forces_are_equal_and_opposite() {
        let mut system = System::new();
        let a = system.add_mass(1.0, DVec3::ZERO).unwrap();
        let b = system.add_mass(1.0, DVec3::new(2.0, 1.0, -1.0)).unwrap();
        system.add_spring(a, b, 1.0, 50.0).unwrap();

        system.compute_forces().unwrap();
        let fa = system.masses()[0].force();
        let fb = system.masses()[1].force();
        assert_relative_eq!((fa + fb).length(), 0.0, epsilon = 1e-12);
        // Stretched: a is pulled towards b.
        assert!(fa.dot(DVec3::new(2.0, 1.0, -1.0)) > 0.0);
    }

    #[test]
    fn test_gravity_scales_with_mass() {
        let mut system = triangle();
        system.apply_gravity();
        assert_relative_eq!(system.masses()[0].force().z, -9.81);
        assert_relative_eq!(system.masses()[1].force().z, -19.62);

        system.clear_forces();
        assert_eq!(system.masses()[1].force(), DVec3::ZERO);
    }

    #[test]
    fn test_parallel_matches_serial() {
        let mut serial = triangle();
        let mut parallel = serial.clone();
        serial.compute_forces().unwrap();
        parallel.compute_forces_parallel().unwrap();

        for (s, p) in serial.masses().iter().zip(parallel.masses()) {
            assert_relative_eq!(s.force().x, p.force().x, epsilon = 1e-12);
            assert_relative_eq!(s.force().y, p.force().y, epsilon = 1e-12);
            assert_relative_eq!(s.force().z, p.force().z, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_collapsed_spring_is_degenerate() {
        let mut system = System::new();
        let f = system.add_fix(DVec3::ONE).unwrap();
        let m = system.add_mass(1.0, DVec3::ONE).unwrap();
        system.add_spring(f, m, 1.0, 1.0).unwrap();

        assert!(matches!(
            system.compute_forces(),
            Err(SimError::DegenerateGeometry { spring: 0, .. })
        ));
        assert!(matches!(
            system.compute_forces_parallel(),
            Err(SimError::DegenerateGeometry { spring: 0, .. })
        ));
    }
}
