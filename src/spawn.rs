//! Spawn context for particle initialization.
//!
//! Wraps a seeded RNG and the boundary shape so that every spawned particle
//! starts strictly inside the volume with its type's mass and radius.
//!
//! ```ignore
//! let mut ctx = SpawnContext::new(params.boundary, Some(42));
//! let p = ctx.spawn(0, &types[0], params.initial_speed);
//! assert!(params.boundary.contains(p.position, p.radius, 0.0));
//! ```

use crate::boundary::BoundaryShape;
use crate::particle::{Particle, ParticleType};
use glam::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::TAU;

/// RNG and geometry used while populating the particle store.
pub struct SpawnContext {
    /// Shape particles are spawned into.
    pub shape: BoundaryShape,
    rng: StdRng,
}

impl SpawnContext {
    /// Create a context. `None` seeds from OS entropy.
    pub fn new(shape: BoundaryShape, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { shape, rng }
    }

    // ========== Random primitives ==========

    /// Random f32 between 0.0 and 1.0.
    #[inline]
    pub fn random(&mut self) -> f32 {
        self.rng.gen()
    }

    /// Random f32 in `min..max`; `min` when the range is empty.
    #[inline]
    pub fn random_range(&mut self, min: f32, max: f32) -> f32 {
        if max > min {
            self.rng.gen_range(min..max)
        } else {
            min
        }
    }

    // ========== Position helpers ==========

    /// Random point inside a sphere of given radius, centered at origin.
    ///
    /// Distribution is uniform throughout the volume.
    pub fn random_in_sphere(&mut self, radius: f32) -> Vec3 {
        // Cube root for uniform volume distribution
        let r = radius * self.random().cbrt();
        self.random_direction() * r
    }

    /// Random point inside an axis-aligned box of given half extents.
    pub fn random_in_box(&mut self, half_extents: Vec3) -> Vec3 {
        Vec3::new(
            self.random_range(-half_extents.x, half_extents.x),
            self.random_range(-half_extents.y, half_extents.y),
            self.random_range(-half_extents.z, half_extents.z),
        )
    }

    /// Random point inside a cylinder along the Y axis.
    ///
    /// * `radius` - Cylinder radius in XZ plane
    /// * `half_height` - Half the cylinder height
    pub fn random_in_cylinder(&mut self, radius: f32, half_height: f32) -> Vec3 {
        let theta = self.random_range(0.0, TAU);
        let r = radius * self.random().sqrt(); // sqrt for uniform disk

        Vec3::new(
            r * theta.cos(),
            self.random_range(-half_height, half_height),
            r * theta.sin(),
        )
    }

    /// Random point inside the boundary shape, inset by `radius` so the
    /// particle's surface stays off the wall.
    pub fn random_in_shape(&mut self, radius: f32) -> Vec3 {
        match self.shape {
            BoundaryShape::Box { half_extents } => {
                self.random_in_box((half_extents - Vec3::splat(radius)).max(Vec3::ZERO))
            }
            BoundaryShape::Sphere { radius: bound } => self.random_in_sphere((bound - radius).max(0.0)),
            BoundaryShape::Cylinder { radius: bound, half_height } => {
                self.random_in_cylinder((bound - radius).max(0.0), (half_height - radius).max(0.0))
            }
        }
    }

    // ========== Direction/velocity helpers ==========

    /// Random unit vector (uniformly distributed on unit sphere).
    pub fn random_direction(&mut self) -> Vec3 {
        let z = self.random_range(-1.0, 1.0);
        let theta = self.random_range(0.0, TAU);
        let planar = (1.0 - z * z).max(0.0).sqrt();
        Vec3::new(planar * theta.cos(), planar * theta.sin(), z)
    }

    // ========== Particles ==========

    /// A particle of `kind` at a random position inside the shape, moving at
    /// `speed` in a random direction.
    pub fn spawn(&mut self, type_index: u32, kind: &ParticleType, speed: f32) -> Particle {
        let position = self.random_in_shape(kind.radius);
        let velocity = if speed > 0.0 {
            self.random_direction() * speed
        } else {
            Vec3::ZERO
        };
        Particle::new(position, type_index, kind.mass, kind.radius).with_velocity(velocity)
    }

    /// Every requested particle of every type, in type order, truncated to
    /// `capacity`.
    pub fn spawn_population(&mut self, types: &[ParticleType], capacity: usize, speed: f32) -> Vec<Particle> {
        let requested: usize = types.iter().map(|t| t.count).sum();
        if requested > capacity {
            log::warn!(
                "Requested {} particles but capacity is {}; truncating spawn",
                requested,
                capacity
            );
        }
        let mut particles = Vec::with_capacity(requested.min(capacity));
        'types: for (type_index, kind) in types.iter().enumerate() {
            for _ in 0..kind.count {
                if particles.len() == capacity {
                    break 'types;
                }
                particles.push(self.spawn(type_index as u32, kind, speed));
            }
        }
        particles
    }
}
