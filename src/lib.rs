//! # plife - Particle Life simulation core
//!
//! Typed particles exert asymmetric, type-pair dependent attraction and
//! repulsion on each other inside a bounded volume. The engine is headless:
//! it owns the particle data and advances it in time, and an external
//! renderer can read the store back as raw bytes.
//!
//! ## Quick Start
//!
//! ```ignore
//! use plife::prelude::*;
//!
//! fn main() -> Result<(), SimulationError> {
//!     let mut sim = Simulation::new()
//!         .with_particle_type(ParticleType::new("red").with_count(2_000))
//!         .with_particle_type(ParticleType::new("green").with_count(2_000))
//!         .with_rule(InteractionRule::new(0u32, 1u32, 0.6))   // red chases green
//!         .with_rule(InteractionRule::new(1u32, 0u32, -0.4))  // green flees red
//!         .with_seed(42);
//!     sim.initialize()?;
//!     for _ in 0..1_000 {
//!         sim.step(1.0 / 60.0);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Core Concepts
//!
//! ### Particle types and the interaction matrix
//!
//! Every particle has a type index into the type table. The
//! [`InteractionMatrix`] holds one coefficient per ordered type pair: entry
//! `(a, b)` is what a particle of type `a` feels from a neighbour of type
//! `b`. The matrix is never symmetrised, which is what makes chasing and
//! fleeing behaviour possible.
//!
//! A fieldless enum can describe the whole type table with the
//! [`ParticleType`] derive, which implements [`ParticleTypes`]:
//!
//! ```ignore
//! #[derive(ParticleType, Clone, Copy, PartialEq)]
//! enum Species {
//!     #[particle(count = 400)]
//!     Prey,
//!     #[particle(count = 40, mass = 3.0)]
//!     Predator,
//! }
//!
//! let mut m = InteractionMatrix::new(Species::COUNT);
//! m.set(Species::Predator, Species::Prey, 2.0);
//! m.set(Species::Prey, Species::Predator, -3.0);
//!
//! let sim = Simulation::new().with_types_of::<Species>();
//! ```
//!
//! ### The step
//!
//! [`Simulation::step`] runs these phases in order, each one a rayon data
//! parallel pass over the particle store:
//!
//! | Phase | Module |
//! |-------|--------|
//! | Spatial grid rebuild (counting sort) | [`spatial`] |
//! | LOD merging of distant clusters | [`lod`] |
//! | Near-field forces and collisions | [`forces`] |
//! | Semi-implicit Euler + wall bounce | [`integrator`], [`boundary`] |
//! | Store repair | [`validator`] |
//!
//! ### Configuration
//!
//! All global knobs live in [`SimParams`]. A complete setup (parameters,
//! types, rules, seed) can be stored as JSON via [`ScenarioConfig`].

pub mod boundary;
pub mod config;
mod error;
pub mod forces;
pub mod integrator;
mod interactions;
pub mod lod;
mod particle;
mod simulation;
pub mod spatial;
mod spawn;
pub mod validator;

pub use boundary::BoundaryShape;
pub use bytemuck;
pub use config::{LodConfig, MergeKey, ScenarioConfig, SimParams};
pub use error::{ConfigError, SimulationError};
pub use glam::{UVec3, Vec3};
pub use interactions::{InteractionMatrix, InteractionRule, MatrixEditor};
pub use lod::MergedParticle;
pub use particle::{Particle, ParticleStore, ParticleType, ParticleTypes, INACTIVE};
pub use plife_derive::ParticleType;
pub use simulation::{SimStats, Simulation};
pub use spatial::{GridLayout, SpatialGrid};
pub use spawn::SpawnContext;
pub use validator::ValidationReport;

/// Convenient re-exports for common usage.
///
/// # Usage
///
/// ```ignore
/// use plife::prelude::*;
/// ```
///
/// This imports:
/// - [`Simulation`] - the simulation builder
/// - [`SimParams`], [`BoundaryShape`], [`LodConfig`] - configuration
/// - [`ParticleType`] - both the type description struct and the derive
///   macro for type enums, plus the [`ParticleTypes`] trait it implements
/// - [`InteractionMatrix`], [`InteractionRule`] - the force table
/// - [`Vec3`] - glam vector type
pub mod prelude {
    pub use crate::boundary::BoundaryShape;
    pub use crate::config::{LodConfig, MergeKey, ScenarioConfig, SimParams};
    pub use crate::error::{ConfigError, SimulationError};
    pub use crate::interactions::{InteractionMatrix, InteractionRule, MatrixEditor};
    pub use crate::particle::{Particle, ParticleType, ParticleTypes};
    pub use crate::simulation::{SimStats, Simulation};
    pub use crate::Vec3;
    pub use plife_derive::ParticleType;
}
