//! Per-step repair pass over the whole particle store.
//!
//! Runs after integration on every slot, active or not, and restores the
//! store invariants: finite kinematics, positions inside the boundary, type
//! indices in range, positive masses and finite radii. Running it twice changes nothing the
//! second time.

use crate::boundary::BoundaryShape;
use crate::particle::{Particle, ParticleType, INACTIVE};
use glam::Vec3;
use rayon::prelude::*;

/// What a validation pass had to fix.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Slots whose position or velocity held NaN or infinity.
    pub repaired_kinematics: usize,
    /// Slots whose type index was out of range.
    pub reassigned_types: usize,
    /// Active slots whose mass was non-finite or non-positive.
    pub repaired_masses: usize,
    /// Active slots whose radius was non-finite or negative.
    pub repaired_radii: usize,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }

    fn merge(self, other: Self) -> Self {
        Self {
            repaired_kinematics: self.repaired_kinematics + other.repaired_kinematics,
            reassigned_types: self.reassigned_types + other.reassigned_types,
            repaired_masses: self.repaired_masses + other.repaired_masses,
            repaired_radii: self.repaired_radii + other.repaired_radii,
        }
    }
}

/// Repair a single slot. `populated` is true for slots filled at
/// initialization.
pub fn validate_particle(
    particle: &mut Particle,
    populated: bool,
    types: &[ParticleType],
    shape: &BoundaryShape,
) -> ValidationReport {
    let mut report = ValidationReport::default();

    if !particle.position.is_finite() || !particle.velocity.is_finite() {
        report.repaired_kinematics = 1;
        if !particle.position.is_finite() {
            particle.position = Vec3::ZERO;
        }
        if !particle.velocity.is_finite() {
            particle.velocity = Vec3::ZERO;
        }
    }

    if particle.type_index < INACTIVE || particle.type_index >= types.len() as i32 {
        report.reassigned_types = 1;
        particle.type_index = if populated && !types.is_empty() { 0 } else { INACTIVE };
    }

    if let Some(kind) = particle.type_id().and_then(|t| types.get(t)) {
        if !(particle.mass.is_finite() && particle.mass > 0.0) {
            report.repaired_masses = 1;
            particle.mass = kind.mass;
        }
        if !(particle.radius.is_finite() && particle.radius >= 0.0) {
            report.repaired_radii = 1;
            particle.radius = kind.radius;
        }
    }

    // Inactive slots keep whatever radius they hold.
    let radius = if particle.radius.is_finite() {
        particle.radius.max(0.0)
    } else {
        0.0
    };
    particle.position = shape.clamp_position(particle.position, radius);

    report
}

/// Repair every slot of `particles` in parallel.
pub fn validate(
    particles: &mut [Particle],
    populated: usize,
    types: &[ParticleType],
    shape: &BoundaryShape,
) -> ValidationReport {
    particles
        .par_iter_mut()
        .enumerate()
        .map(|(i, particle)| validate_particle(particle, i < populated, types, shape))
        .reduce(ValidationReport::default, ValidationReport::merge)
}
