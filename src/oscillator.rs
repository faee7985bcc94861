//! Single-degree-of-freedom spring oscillator `m x'' = -k x`, integrated with
//! the classic one-step schemes so their behaviour can be compared across
//! step sizes.
//!
//! Scans export one table with header `tau,t,x,v`, where `tau` is the step
//! size and groups the rows of one run.

use std::{fmt, io::Write, str::FromStr};

use serde::Serialize;

use crate::error::{Result, SimError};

/// Upper bound on the number of steps of a single [`Oscillator::solve`].
pub const MAX_STEPS: usize = 100_000_000;

/// One-step integration scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    ExplicitEuler,
    /// Explicit midpoint rule.
    ImprovedEuler,
    ImplicitEuler,
    CrankNicolson,
    SymplecticEuler,
}

impl Method {
    pub const ALL: [Method; 5] = [
        Method::ExplicitEuler,
        Method::ImprovedEuler,
        Method::ImplicitEuler,
        Method::CrankNicolson,
        Method::SymplecticEuler,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Method::ExplicitEuler => "explicit",
            Method::ImprovedEuler => "improved",
            Method::ImplicitEuler => "implicit",
            Method::CrankNicolson => "crank-nicolson",
            Method::SymplecticEuler => "symplectic",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Method::ALL
            .into_iter()
            .find(|m| m.name() == s)
            .ok_or_else(|| format!("unknown method `{s}`"))
    }
}

/// One row of an oscillator table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    pub tau: f64,
    pub t: f64,
    pub x: f64,
    pub v: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Oscillator {
    mass: f64,
    stiffness: f64,
}

impl Oscillator {
    pub fn new(mass: f64, stiffness: f64) -> Result<Self> {
        if !(mass > 0.0) {
            return Err(SimError::invalid("mass", mass));
        }
        if !(stiffness >= 0.0) {
            return Err(SimError::invalid("stiffness", stiffness));
        }
        Ok(Self { mass, stiffness })
    }

    /// Angular frequency `sqrt(k / m)`.
    pub fn omega(&self) -> f64 {
        (self.stiffness / self.mass).sqrt()
    }

    pub fn energy(&self, x: f64, v: f64) -> f64 {
        0.5 * self.mass * v * v + 0.5 * self.stiffness * x * x
    }

    /// Advances `(x, v)` by one step of size `tau`.
    pub fn step(&self, method: Method, tau: f64, (x, v): (f64, f64)) -> (f64, f64) {
        let w2 = self.stiffness / self.mass;
        match method {
            Method::ExplicitEuler => (x + tau * v, v - tau * w2 * x),
            Method::ImprovedEuler => {
                let xh = x + 0.5 * tau * v;
                let vh = v - 0.5 * tau * w2 * x;
                (x + tau * vh, v - tau * w2 * xh)
            }
            Method::ImplicitEuler => {
                let det = 1.0 + tau * tau * w2;
                ((x + tau * v) / det, (v - tau * w2 * x) / det)
            }
            Method::CrankNicolson => {
                let h = 0.5 * tau;
                let rx = x + h * v;
                let rv = v - h * w2 * x;
                let det = 1.0 + h * h * w2;
                ((rx + h * rv) / det, (rv - h * w2 * rx) / det)
            }
            Method::SymplecticEuler => {
                let v = v - tau * w2 * x;
                (x + tau * v, v)
            }
        }
    }

    /// Integrates from `t = 0` to `t_end` with `floor(t_end / tau)` steps.
    /// The first sample is the initial state. Step counts of [`MAX_STEPS`]
    /// or more are rejected as an invalid `tau`.
    pub fn solve(
        &self,
        method: Method,
        (x0, v0): (f64, f64),
        tau: f64,
        t_end: f64,
    ) -> Result<Vec<Sample>> {
        if !(tau > 0.0 && tau.is_finite()) {
            return Err(SimError::invalid("tau", tau));
        }
        if !(t_end >= 0.0 && t_end.is_finite()) {
            return Err(SimError::invalid("t_end", t_end));
        }

        let steps = (t_end / tau).floor();
        if steps >= MAX_STEPS as f64 {
            return Err(SimError::invalid("tau", tau));
        }
        let steps = steps as usize;
        let mut samples = Vec::with_capacity(steps + 1);
        let mut state = (x0, v0);
        samples.push(Sample {
            tau,
            t: 0.0,
            x: x0,
            v: v0,
        });
        for i in 1..=steps {
            state = self.step(method, tau, state);
            samples.push(Sample {
                tau,
                t: i as f64 * tau,
                x: state.0,
                v: state.1,
            });
        }
        Ok(samples)
    }

    /// Runs [`Oscillator::solve`] once per step size and concatenates the tables.
    pub fn scan(
        &self,
        method: Method,
        initial: (f64, f64),
        taus: &[f64],
        t_end: f64,
    ) -> Result<Vec<Sample>> {
        let mut samples = Vec::new();
        for &tau in taus {
            samples.extend(self.solve(method, initial, tau, t_end)?);
        }
        Ok(samples)
    }
}

pub fn write_scan_csv<W: Write>(samples: &[Sample], writer: W) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    for sample in samples {
        csv.serialize(sample)?;
    }
    csv.flush()?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn unit() -> Oscillator {
        Oscillator::new(1.0, 1.0).unwrap()
    }

    fn final_energy(method: Method, tau: f64) -> f64 {
        let osc = unit();
        let samples = osc.solve(method, (1.0, 0.0), tau, 8.0 * PI).unwrap();
        let last = samples.last().unwrap();
        osc.energy(last.x, last.v)
    }

    #[test]
    fn test_energy_behaviour_per_method() {
        let initial = unit().energy(1.0, 0.0);
        assert!(final_energy(Method::ExplicitEuler, 0.1) > 1.5 * initial);
        assert!(final_energy(Method::ImplicitEuler, 0.1) < 0.5 * initial);
        assert_relative_eq!(
            final_energy(Method::CrankNicolson, 0.1),
            initial,
            epsilon = 1e-9
        );
        assert_relative_eq!(
            final_energy(Method::SymplecticEuler, 0.01),
            initial,
            epsilon = 1e-2
        );
    }

    #[test]
    fn test_explicit_euler_is_first_order() {
        let osc = unit();
        let error = |tau: f64| {
            let samples = osc.solve(Method::ExplicitEuler, (1.0, 0.0), tau, 1.0).unwrap();
            let last = samples.last().unwrap();
            (last.x - last.t.cos()).abs()
        };
        let ratio = error(0.01) / error(0.005);
        assert!((1.8..2.2).contains(&ratio), "ratio {ratio}");
    }

    #[test]
    fn test_improved_euler_is_second_order() {
        let osc = unit();
        let error = |tau: f64| {
            let samples = osc.solve(Method::ImprovedEuler, (1.0, 0.0), tau, 1.0).unwrap();
            let last = samples.last().unwrap();
            (last.x - last.t.cos()).abs()
        };
        let ratio = error(0.01) / error(0.005);
        assert!((3.6..4.4).contains(&ratio), "ratio {ratio}");
    }

    #[test]
    fn test_scan_groups_by_tau() {
        let samples = unit()
            .scan(Method::CrankNicolson, (1.0, 0.0), &[0.5, 0.25], 1.0)
            .unwrap();
        assert_eq!(samples.len(), 3 + 5);
        assert_eq!(samples[0].tau, 0.5);
        assert_eq!(samples[3].tau, 0.25);
        assert_eq!(samples[3].t, 0.0);

        let mut out = Vec::new();
        write_scan_csv(&samples, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().next(), Some("tau,t,x,v"));
        assert_eq!(text.lines().count(), 9);
    }

    #[test]
    fn test_method_names_round_trip() {
        for method in Method::ALL {
            assert_eq!(method.name().parse::<Method>(), Ok(method));
        }
        assert!("rk4".parse::<Method>().is_err());
    }

    #[test]
    fn test_rejects_bad_parameters() {
        assert!(Oscillator::new(0.0, 1.0).is_err());
        assert!(Oscillator::new(1.0, -1.0).is_err());
        assert!(unit().solve(Method::ExplicitEuler, (1.0, 0.0), 0.0, 1.0).is_err());
    }

    #[test]
    fn test_rejects_step_count_overflow() {
        let osc = unit();
        for tau in [1e-300, f64::MIN_POSITIVE, 1e-9] {
            assert!(matches!(
                osc.solve(Method::ExplicitEuler, (1.0, 0.0), tau, 1.0),
                Err(SimError::InvalidParameter { what: "tau", .. })
            ));
        }
        assert!(matches!(
            osc.scan(Method::SymplecticEuler, (1.0, 0.0), &[0.5, 1e-300], 1.0),
            Err(SimError::InvalidParameter { what: "tau", .. })
        ));

        let samples = osc.solve(Method::ExplicitEuler, (1.0, 0.0), 1e-3, 1.0).unwrap();
        assert!((1000..=1001).contains(&samples.len()));
    }
}
