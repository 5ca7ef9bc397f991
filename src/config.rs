//! Configuration types for plife simulations.
//!
//! [`SimParams`] holds every global parameter the core reads each step.
//! [`ScenarioConfig`] bundles parameters with the particle type list and the
//! interaction rules so a whole setup can be stored as JSON and loaded by the
//! runner binary.

use crate::boundary::BoundaryShape;
use crate::error::{ConfigError, SimulationError};
use crate::interactions::InteractionRule;
use crate::particle::ParticleType;
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Default ceiling on the neighbour search radius, in cells.
pub const DEFAULT_MAX_SEARCH_CELLS: u32 = 8;

/// Default minimum bucket population before a merged particle is produced.
pub const DEFAULT_MIN_MERGE_COUNT: usize = 5;

/// Largest cell count accepted for the spatial grid or any LOD level grid.
pub const MAX_GRID_CELLS: u64 = 1 << 24;

/// Largest accepted `LodConfig::max_levels`.
pub const MAX_LOD_LEVELS: u32 = 32;

/// How distant particles are grouped into merge buckets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeKey {
    /// Bucket by coarse cell only. The bucket adopts the type of its first
    /// member and drops members of any other type from the merge.
    #[default]
    CoarseCell,
    /// Bucket by coarse cell and type, so every type in a cell gets its own
    /// merged particle.
    CoarseCellAndType,
}

/// Hierarchical level-of-detail settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LodConfig {
    pub enabled: bool,
    /// Distance from the viewpoint beyond which particles are merged.
    pub distance_threshold: f32,
    /// Highest LOD level a particle can be assigned.
    pub max_levels: u32,
    /// Coarse cell size at level 0; level `l` uses `base_cell_size * level_multiplier^l`.
    pub base_cell_size: f32,
    pub level_multiplier: f32,
    /// Buckets with fewer contributing members produce no merged particle.
    pub min_merge_count: usize,
    /// Reach of a merged particle at level 0, scaled like the cell size.
    pub base_interaction_radius: f32,
    /// When set, enabling LOD replaces all near-field force evaluation with
    /// aggregate-only evaluation. When cleared, near-field forces are kept and
    /// merged particles add the far field.
    pub replaces_near_field: bool,
    pub merge_key: MergeKey,
}

impl Default for LodConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            distance_threshold: 10.0,
            max_levels: 4,
            base_cell_size: 1.0,
            level_multiplier: 2.0,
            min_merge_count: DEFAULT_MIN_MERGE_COUNT,
            base_interaction_radius: 2.0,
            replaces_near_field: true,
            merge_key: MergeKey::CoarseCell,
        }
    }
}

/// Global simulation parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimParams {
    /// Particle store capacity. `None` sizes the store to the total spawn count.
    pub capacity: Option<usize>,
    pub boundary: BoundaryShape,
    /// Edge length of a spatial grid cell in world units.
    pub cell_size: f32,
    /// Neighbours farther than this exert no near-field force.
    pub interaction_radius: f32,
    /// Per-step velocity retention (1.0 = no damping).
    pub damping: f32,
    /// Global multiplier applied to every matrix coefficient.
    pub force_strength: f32,
    /// Distances are floored to this value before the inverse-square term.
    pub min_distance: f32,
    /// Wall restitution.
    pub bounce: f32,
    /// Particle-particle restitution (0 = fully inelastic, 1 = fully elastic).
    pub elasticity: f32,
    /// Repulsion per unit of overlap between colliding particles.
    pub collision_stiffness: f32,
    /// Asymptotic ceiling of a single pair force.
    pub max_force: f32,
    /// Asymptotic ceiling of particle speed.
    pub max_velocity: f32,
    /// Safety ceiling on the neighbour search radius, in cells.
    pub max_search_cells: u32,
    /// Particles farther than this from the viewpoint search half as many cells.
    pub far_search_distance: Option<f32>,
    /// Viewpoint used for LOD distance and the far search shrink.
    pub view_position: Vec3,
    /// Speed of spawned particles in a random direction.
    pub initial_speed: f32,
    pub lod: LodConfig,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            capacity: None,
            boundary: BoundaryShape::default(),
            cell_size: 1.0,
            interaction_radius: 1.0,
            damping: 0.98,
            force_strength: 1.0,
            min_distance: 0.05,
            bounce: 0.5,
            elasticity: 0.5,
            collision_stiffness: 10.0,
            max_force: 10.0,
            max_velocity: 5.0,
            max_search_cells: DEFAULT_MAX_SEARCH_CELLS,
            far_search_distance: None,
            view_position: Vec3::ZERO,
            initial_speed: 0.0,
            lod: LodConfig::default(),
        }
    }
}

fn positive(name: &'static str, value: f32) -> Result<(), SimulationError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SimulationError::InvalidParameter { name, value })
    }
}

fn unit_range(name: &'static str, value: f32) -> Result<(), SimulationError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(SimulationError::InvalidParameter { name, value })
    }
}

/// Cell count of a grid spanning `-half_bounds..half_bounds`, computed the way
/// [`GridLayout::new`](crate::spatial::GridLayout::new) sizes its axes.
/// `None` if an axis or the product does not fit.
fn grid_cells(half_bounds: Vec3, cell_size: f32) -> Option<u64> {
    half_bounds.to_array().into_iter().try_fold(1u64, |total, half| {
        let cells = (half * 2.0 / cell_size).ceil();
        if !cells.is_finite() || cells > u32::MAX as f32 {
            return None;
        }
        total.checked_mul((cells as u64).max(1))
    })
}

fn grid_size(name: &'static str, half_bounds: Vec3, cell_size: f32) -> Result<(), SimulationError> {
    match grid_cells(half_bounds, cell_size) {
        Some(cells) if cells <= MAX_GRID_CELLS => Ok(()),
        _ => Err(SimulationError::InvalidParameter { name, value: cell_size }),
    }
}

impl SimParams {
    /// Check every parameter the step depends on.
    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.capacity == Some(0) {
            return Err(SimulationError::ZeroCapacity);
        }
        positive("boundary", self.boundary.min_extent())?;
        positive("cell_size", self.cell_size)?;
        grid_size("cell_size", self.boundary.half_bounds(), self.cell_size)?;
        positive("interaction_radius", self.interaction_radius)?;
        positive("min_distance", self.min_distance)?;
        positive("max_force", self.max_force)?;
        positive("max_velocity", self.max_velocity)?;
        unit_range("damping", self.damping)?;
        unit_range("bounce", self.bounce)?;
        unit_range("elasticity", self.elasticity)?;
        if !self.force_strength.is_finite() {
            return Err(SimulationError::InvalidParameter {
                name: "force_strength",
                value: self.force_strength,
            });
        }
        if !(self.collision_stiffness.is_finite() && self.collision_stiffness >= 0.0) {
            return Err(SimulationError::InvalidParameter {
                name: "collision_stiffness",
                value: self.collision_stiffness,
            });
        }
        if self.max_search_cells == 0 {
            return Err(SimulationError::InvalidParameter {
                name: "max_search_cells",
                value: 0.0,
            });
        }
        if let Some(distance) = self.far_search_distance {
            positive("far_search_distance", distance)?;
        }
        if self.lod.enabled {
            positive("lod.distance_threshold", self.lod.distance_threshold)?;
            positive("lod.base_cell_size", self.lod.base_cell_size)?;
            positive("lod.base_interaction_radius", self.lod.base_interaction_radius)?;
            if !(self.lod.level_multiplier.is_finite() && self.lod.level_multiplier >= 1.0) {
                return Err(SimulationError::InvalidParameter {
                    name: "lod.level_multiplier",
                    value: self.lod.level_multiplier,
                });
            }
            if self.lod.max_levels == 0 || self.lod.max_levels > MAX_LOD_LEVELS {
                return Err(SimulationError::InvalidParameter {
                    name: "lod.max_levels",
                    value: self.lod.max_levels as f32,
                });
            }
            for level in 1..=self.lod.max_levels {
                let cell_size = self.lod.base_cell_size * self.lod.level_multiplier.powi(level as i32);
                grid_size("lod.base_cell_size", self.boundary.half_bounds(), cell_size)?;
            }
        }
        Ok(())
    }

    /// Near-field search radius in cells, before any far-field shrink.
    pub fn search_cells(&self) -> u32 {
        let cells = (self.interaction_radius / self.cell_size).ceil() as u32;
        cells.clamp(1, self.max_search_cells.max(1))
    }
}

/// A complete simulation setup: parameters, particle types and rules.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ScenarioConfig {
    pub name: String,
    #[serde(default)]
    pub params: SimParams,
    pub types: Vec<ParticleType>,
    #[serde(default)]
    pub rules: Vec<InteractionRule>,
    /// RNG seed for spawning. `None` seeds from entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            name: "Untitled".into(),
            params: SimParams::default(),
            types: Vec::new(),
            rules: Vec::new(),
            seed: None,
        }
    }
}

impl ScenarioConfig {
    /// Parse a scenario from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Save the scenario to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load a scenario from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}
