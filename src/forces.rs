//! Near-field force evaluation.
//!
//! For every active particle the evaluator walks the grid cells around it,
//! looks up the asymmetric coefficient for each neighbour's type and sums an
//! inverse-square force passed through a smooth saturating cap. Overlapping
//! pairs additionally receive a penetration spring and, when closing, an
//! inelastic impulse along the contact normal.
//!
//! Each lane writes only its own [`Kick`], so the pass needs no
//! synchronisation.

use crate::config::SimParams;
use crate::interactions::InteractionMatrix;
use crate::particle::Particle;
use crate::spatial::SpatialGrid;
use glam::Vec3;
use rayon::prelude::*;

/// Per-particle output of the force phases, consumed by the integrator.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Kick {
    /// Net force divided by mass.
    pub acceleration: Vec3,
    /// Instantaneous velocity change from collision impulses.
    pub impulse: Vec3,
}

/// Smooth rational cap: `|saturate(f)| < max_force` for every finite `f`,
/// and small forces pass through almost unchanged.
#[inline]
pub fn saturate(force: f32, max_force: f32) -> f32 {
    force / (1.0 + force.abs() / max_force)
}

/// Capped magnitude of the force a particle receives from a neighbour.
///
/// `distance` must already be floored to the minimum distance.
#[inline]
pub fn pair_force(coefficient: f32, strength: f32, distance: f32, max_force: f32) -> f32 {
    saturate(coefficient * strength / (distance * distance), max_force)
}

/// Velocity change of particle `i` from an inelastic impulse against `j`.
///
/// `normal` points from `i` to `j`. Returns zero when the pair is separating.
#[inline]
pub fn collision_impulse(
    normal: Vec3,
    velocity_i: Vec3,
    velocity_j: Vec3,
    mass_i: f32,
    mass_j: f32,
    elasticity: f32,
) -> Vec3 {
    let closing = (velocity_j - velocity_i).dot(normal);
    if closing >= 0.0 {
        return Vec3::ZERO;
    }
    let inv_i = if mass_i > 0.0 { 1.0 / mass_i } else { 0.0 };
    let inv_j = if mass_j > 0.0 { 1.0 / mass_j } else { 0.0 };
    let inv_sum = inv_i + inv_j;
    if inv_sum <= 0.0 {
        return Vec3::ZERO;
    }
    let j = -(1.0 + elasticity) * closing / inv_sum;
    -normal * j * inv_i
}

/// Inputs shared by every lane of the near-field pass.
pub struct NearField<'a> {
    pub particles: &'a [Particle],
    pub grid: &'a SpatialGrid,
    pub matrix: &'a InteractionMatrix,
    pub params: &'a SimParams,
    /// Particles to ignore as neighbours (members of merged particles in
    /// hybrid LOD mode).
    pub skip: Option<&'a [bool]>,
}

impl NearField<'_> {
    /// Search radius in cells for a particle at `position`.
    pub fn search_radius(&self, position: Vec3) -> u32 {
        let cells = self.params.search_cells();
        match self.params.far_search_distance {
            Some(far) if position.distance(self.params.view_position) > far => (cells / 2).max(1),
            _ => cells,
        }
    }

    /// Net acceleration and collision impulse of one particle.
    pub fn evaluate(&self, index: usize) -> Kick {
        let me = &self.particles[index];
        let Some(my_type) = me.type_id() else {
            return Kick::default();
        };
        let params = self.params;
        let radius = params.interaction_radius;

        let mut force = Vec3::ZERO;
        let mut impulse = Vec3::ZERO;

        for j in self.grid.query(me.position, self.search_radius(me.position)) {
            let j = j as usize;
            if j == index {
                continue;
            }
            if self.skip.is_some_and(|skip| skip[j]) {
                continue;
            }
            let other = &self.particles[j];
            let Some(other_type) = other.type_id() else {
                continue;
            };

            let delta = other.position - me.position;
            let actual = delta.length();
            if actual > radius {
                continue;
            }
            let direction = delta.normalize_or_zero();
            let distance = actual.max(params.min_distance);

            let coefficient = self.matrix.get(my_type, other_type);
            if coefficient != 0.0 {
                force += direction
                    * pair_force(coefficient, params.force_strength, distance, params.max_force);
            }

            let contact = me.radius + other.radius;
            if contact > actual {
                force -= direction * (contact - actual) * params.collision_stiffness;
                impulse += collision_impulse(
                    direction,
                    me.velocity,
                    other.velocity,
                    me.mass,
                    other.mass,
                    params.elasticity,
                );
            }
        }

        Kick {
            acceleration: if me.mass > 0.0 { force / me.mass } else { Vec3::ZERO },
            impulse,
        }
    }

    /// Evaluate every slot in parallel into `out` (resized to match).
    pub fn evaluate_all(&self, out: &mut Vec<Kick>) {
        out.resize(self.particles.len(), Kick::default());
        out.par_iter_mut().enumerate().for_each(|(i, kick)| {
            *kick = self.evaluate(i);
        });
    }
}
