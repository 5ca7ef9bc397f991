//! Particle records, particle types and the fixed-capacity particle store.
//!
//! The store is a flat array of [`Particle`] slots. A slot is active when its
//! `type_index` is non-negative; inactive slots hold [`INACTIVE`] and are
//! skipped by every simulation phase except the validator.

use crate::error::SimulationError;
use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Type index marking an unused slot.
pub const INACTIVE: i32 = -1;

/// A single particle record.
///
/// `#[repr(C)]` and [`Pod`] so an external renderer can upload the store
/// as raw bytes (see [`ParticleStore::as_bytes`]).
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Particle {
    pub position: Vec3,
    pub velocity: Vec3,
    /// Index into the type table, or [`INACTIVE`].
    pub type_index: i32,
    pub mass: f32,
    pub radius: f32,
}

impl Particle {
    /// An unused slot.
    pub const EMPTY: Particle = Particle {
        position: Vec3::ZERO,
        velocity: Vec3::ZERO,
        type_index: INACTIVE,
        mass: 0.0,
        radius: 0.0,
    };

    /// Create an active particle at rest.
    pub fn new<T: Into<u32>>(position: Vec3, particle_type: T, mass: f32, radius: f32) -> Self {
        Self {
            position,
            velocity: Vec3::ZERO,
            type_index: particle_type.into() as i32,
            mass,
            radius,
        }
    }

    /// Builder-style velocity setter.
    pub fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.velocity = velocity;
        self
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.type_index >= 0
    }

    /// Type index as `usize`, or `None` for inactive slots.
    #[inline]
    pub fn type_id(&self) -> Option<usize> {
        usize::try_from(self.type_index).ok()
    }
}

impl Default for Particle {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Description of one particle species.
///
/// Types form a dense index space: the position of a type in the list passed
/// to the simulation is its type index and its row/column in the
/// [`InteractionMatrix`](crate::InteractionMatrix).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParticleType {
    pub name: String,
    /// RGB color, 0.0-1.0. Only carried for renderers.
    pub color: [f32; 3],
    pub mass: f32,
    pub radius: f32,
    /// Number of particles spawned on (re)initialization.
    #[serde(default)]
    pub count: usize,
}

impl ParticleType {
    /// A unit-mass type with a small radius and no spawn request.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: [1.0, 1.0, 1.0],
            mass: 1.0,
            radius: 0.05,
            count: 0,
        }
    }

    pub fn with_color(mut self, color: [f32; 3]) -> Self {
        self.color = color;
        self
    }

    pub fn with_mass(mut self, mass: f32) -> Self {
        self.mass = mass;
        self
    }

    pub fn with_radius(mut self, radius: f32) -> Self {
        self.radius = radius;
        self
    }

    /// Number of particles of this type to spawn.
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }
}

/// An enum whose variants are the particle types of a simulation, in type
/// index order.
///
/// Implemented by `#[derive(ParticleType)]`. Variant values come from an
/// optional `#[particle(mass = .., radius = .., count = .., color = ..)]`
/// attribute; unset values keep the [`ParticleType::new`] defaults.
pub trait ParticleTypes: Copy + Into<u32> + TryFrom<u32, Error = SimulationError> + 'static {
    const COUNT: usize;

    /// Every variant in type-index order.
    fn all() -> &'static [Self];

    fn name(self) -> &'static str;

    /// One description per variant, in type-index order.
    fn particle_types() -> Vec<ParticleType>;
}

/// Flat, fixed-capacity array of particle slots.
#[derive(Clone, Debug)]
pub struct ParticleStore {
    slots: Vec<Particle>,
    /// Slots below this index were populated at initialization.
    populated: usize,
}

impl ParticleStore {
    /// Create a store with `capacity` inactive slots.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: vec![Particle::EMPTY; capacity],
            populated: 0,
        }
    }

    /// Fill slots in order from `particles`, stopping at capacity.
    ///
    /// Returns how many were stored.
    pub(crate) fn populate(&mut self, particles: impl IntoIterator<Item = Particle>) -> usize {
        let mut stored = 0;
        for (slot, particle) in self.slots.iter_mut().zip(particles) {
            *slot = particle;
            stored += 1;
        }
        self.populated = stored;
        stored
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots filled at initialization.
    #[inline]
    pub fn populated(&self) -> usize {
        self.populated
    }

    /// Number of active particles. Never exceeds [`capacity`](Self::capacity).
    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|p| p.is_active()).count()
    }

    /// All slots, active and inactive.
    #[inline]
    pub fn particles(&self) -> &[Particle] {
        &self.slots
    }

    #[inline]
    pub fn particles_mut(&mut self) -> &mut [Particle] {
        &mut self.slots
    }

    /// Iterate over active particles with their slot index.
    pub fn active(&self) -> impl Iterator<Item = (usize, &Particle)> {
        self.slots.iter().enumerate().filter(|(_, p)| p.is_active())
    }

    /// Copy of every active particle record.
    pub fn snapshot(&self) -> Vec<Particle> {
        self.slots.iter().filter(|p| p.is_active()).copied().collect()
    }

    /// Raw bytes of every slot, for GPU upload by a renderer.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.slots)
    }

    /// Place `particle` in the first inactive slot.
    ///
    /// Returns the slot index, or `None` if the store is full or the particle
    /// is itself inactive.
    pub fn insert(&mut self, particle: Particle) -> Option<usize> {
        if !particle.is_active() {
            return None;
        }
        let index = self.slots.iter().position(|p| !p.is_active())?;
        self.slots[index] = particle;
        if index >= self.populated {
            self.populated = index + 1;
        }
        Some(index)
    }

    /// Mark a slot inactive. Returns `false` if it was already inactive or out of range.
    pub fn deactivate(&mut self, index: usize) -> bool {
        match self.slots.get_mut(index) {
            Some(slot) if slot.is_active() => {
                slot.type_index = INACTIVE;
                slot.velocity = Vec3::ZERO;
                true
            }
            _ => false,
        }
    }
}
