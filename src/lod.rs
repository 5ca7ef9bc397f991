//! Hierarchical level-of-detail aggregation.
//!
//! Particles far from the viewpoint are grouped into coarse cells whose size
//! grows geometrically with distance, and each sufficiently populated cell is
//! folded into one [`MergedParticle`] carrying the total mass at the mass
//! weighted centroid. Every particle then feels the merged particles as a far
//! field instead of (or in addition to) its individual distant neighbours.
//!
//! Each step the aggregator:
//!
//! 1. assigns every active particle a level from its distance to the viewpoint,
//! 2. computes a bucket key (level, coarse cell and optionally type) for every
//!    particle above level 0,
//! 3. sorts the keys so each bucket is a contiguous run,
//! 4. reduces every run with enough members into a merged particle.

use crate::config::{LodConfig, MergeKey, SimParams};
use crate::forces::{saturate, Kick};
use crate::interactions::InteractionMatrix;
use crate::particle::Particle;
use crate::spatial::GridLayout;
use glam::Vec3;
use rayon::prelude::*;

/// Bucket identity: `(level, coarse cell, type)`. The type slot is 0 when
/// merging by cell only.
type BucketKey = (u32, u64, u32);

/// A step-scoped aggregate of same-type particles in one coarse cell.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MergedParticle {
    /// Mass-weighted centroid.
    pub position: Vec3,
    /// Mass-weighted mean velocity.
    pub velocity: Vec3,
    /// Sum of member masses.
    pub mass: f32,
    /// Mean member radius scaled by the cube root of the member count.
    pub radius: f32,
    pub type_index: u32,
    /// Number of particles folded in.
    pub parent_count: u32,
    pub lod_level: u32,
}

/// LOD level for a particle at `distance` from the viewpoint.
///
/// Level 0 (full detail) up to the threshold, then one level per doubling of
/// distance, capped at `max_levels`.
pub fn lod_level(distance: f32, config: &LodConfig) -> u32 {
    if !(distance > config.distance_threshold) {
        return 0;
    }
    let doublings = (distance / config.distance_threshold).log2().floor();
    let level = doublings as i64 + 1;
    level.clamp(1, config.max_levels.max(1) as i64) as u32
}

/// Scale factor applied to cell size and reach at `level`.
#[inline]
fn level_scale(config: &LodConfig, level: u32) -> f32 {
    config.level_multiplier.powi(level as i32)
}

/// Per-step LOD state and the merged particles it produced.
#[derive(Debug, Default)]
pub struct LodAggregator {
    /// Coarse grid per level; index 0 is level 1.
    layouts: Vec<GridLayout>,
    /// Level of every slot from the last update (0 for inactive slots).
    levels: Vec<u32>,
    /// `(bucket key, particle index)` pairs, sorted.
    keys: Vec<(BucketKey, u32)>,
    merged: Vec<MergedParticle>,
    /// Slots folded into a merged particle during the last update.
    members: Vec<bool>,
}

impl LodAggregator {
    pub fn new(half_bounds: Vec3, config: &LodConfig) -> Self {
        let layouts = (1..=config.max_levels)
            .map(|level| GridLayout::new(half_bounds, config.base_cell_size * level_scale(config, level)))
            .collect::<Vec<_>>();
        log::debug!(
            "LOD aggregator: {} levels, threshold {}, coarse cells {:?}",
            layouts.len(),
            config.distance_threshold,
            layouts.iter().map(|l| l.total_cells()).collect::<Vec<_>>()
        );
        Self {
            layouts,
            ..Default::default()
        }
    }

    /// Classify, bucket and merge. Replaces the previous step's results.
    pub fn update(&mut self, particles: &[Particle], view: Vec3, config: &LodConfig) {
        let layouts = &self.layouts;

        self.levels.resize(particles.len(), 0);
        self.levels
            .par_iter_mut()
            .zip(particles.par_iter())
            .for_each(|(level, particle)| {
                *level = if particle.is_active() {
                    lod_level(particle.position.distance(view), config).min(layouts.len() as u32)
                } else {
                    0
                };
            });

        let by_type = config.merge_key == MergeKey::CoarseCellAndType;
        let levels = &self.levels;
        self.keys = particles
            .par_iter()
            .enumerate()
            .filter_map(|(i, particle)| {
                let level = levels[i];
                let type_id = particle.type_id()?;
                if level == 0 {
                    return None;
                }
                let cell = layouts[level as usize - 1].cell_index(particle.position);
                let type_slot = if by_type { type_id as u32 } else { 0 };
                Some(((level, cell as u64, type_slot), i as u32))
            })
            .collect();
        self.keys.par_sort_unstable();

        let mut runs = Vec::new();
        let mut start = 0;
        while start < self.keys.len() {
            let key = self.keys[start].0;
            let mut end = start + 1;
            while end < self.keys.len() && self.keys[end].0 == key {
                end += 1;
            }
            runs.push(start..end);
            start = end;
        }

        let bucket_count = runs.len();
        let keys = &self.keys;
        let min_count = config.min_merge_count.max(1);
        let reduced: Vec<(MergedParticle, std::ops::Range<usize>)> = runs
            .into_par_iter()
            .filter_map(|run| {
                let bucket = &keys[run.clone()];
                let ((level, _, _), first) = bucket[0];
                let first = &particles[first as usize];
                let type_index = first.type_index;
                let contributing = bucket
                    .iter()
                    .map(|&(_, i)| &particles[i as usize])
                    .filter(|p| p.type_index == type_index);
                merge_members(contributing, level, min_count).map(|m| (m, run))
            })
            .collect();

        self.members.clear();
        self.members.resize(particles.len(), false);
        self.merged.clear();
        for (merged, run) in reduced {
            for &(_, i) in &self.keys[run] {
                let i = i as usize;
                if particles[i].type_index == merged.type_index as i32 {
                    self.members[i] = true;
                }
            }
            self.merged.push(merged);
        }

        log::trace!(
            "LOD: {} far particles in {} buckets, {} merged",
            self.keys.len(),
            bucket_count,
            self.merged.len()
        );
    }

    /// Merged particles from the last update.
    pub fn merged(&self) -> &[MergedParticle] {
        &self.merged
    }

    /// Level of every slot from the last update.
    pub fn levels(&self) -> &[u32] {
        &self.levels
    }

    /// Mask of slots folded into a merged particle.
    pub fn members(&self) -> &[bool] {
        &self.members
    }

    /// Number of active particles above level 0.
    pub fn lod_particle_count(&self) -> usize {
        self.keys.len()
    }

    /// Drop all per-step results.
    pub fn clear(&mut self) {
        self.levels.clear();
        self.keys.clear();
        self.merged.clear();
        self.members.clear();
    }

    /// Add the pull of every merged particle in reach to `kicks`.
    pub fn apply_aggregate_forces(
        &self,
        particles: &[Particle],
        matrix: &InteractionMatrix,
        params: &SimParams,
        kicks: &mut [Kick],
    ) {
        if self.merged.is_empty() {
            return;
        }
        let merged = &self.merged;
        kicks
            .par_iter_mut()
            .zip(particles.par_iter())
            .for_each(|(kick, particle)| {
                if let Some(type_id) = particle.type_id() {
                    kick.acceleration += aggregate_acceleration(particle, type_id, merged, matrix, params);
                }
            });
    }
}

/// Reduce `members` into a merged particle, or `None` below `min_count`.
fn merge_members<'a>(
    members: impl Iterator<Item = &'a Particle>,
    lod_level: u32,
    min_count: usize,
) -> Option<MergedParticle> {
    let mut count = 0usize;
    let mut mass = 0.0f32;
    let mut weighted_position = Vec3::ZERO;
    let mut weighted_velocity = Vec3::ZERO;
    let mut radius_sum = 0.0f32;
    let mut type_index = 0;

    for p in members {
        count += 1;
        mass += p.mass;
        weighted_position += p.position * p.mass;
        weighted_velocity += p.velocity * p.mass;
        radius_sum += p.radius;
        type_index = p.type_index as u32;
    }

    if count < min_count || !(mass > 0.0) {
        return None;
    }

    Some(MergedParticle {
        position: weighted_position / mass,
        velocity: weighted_velocity / mass,
        mass,
        radius: radius_sum / count as f32 * (count as f32).cbrt(),
        type_index,
        parent_count: count as u32,
        lod_level,
    })
}

fn aggregate_acceleration(
    particle: &Particle,
    type_id: usize,
    merged: &[MergedParticle],
    matrix: &InteractionMatrix,
    params: &SimParams,
) -> Vec3 {
    if !(particle.mass > 0.0) {
        return Vec3::ZERO;
    }
    let lod = &params.lod;
    let mut force = Vec3::ZERO;
    for m in merged {
        let coefficient = matrix.get(type_id, m.type_index as usize);
        if coefficient == 0.0 {
            continue;
        }
        let delta = m.position - particle.position;
        let actual = delta.length();
        if actual > lod.base_interaction_radius * level_scale(lod, m.lod_level) {
            continue;
        }
        let distance = actual.max(params.min_distance);
        let magnitude = saturate(
            coefficient * params.force_strength * m.mass / (distance * distance),
            params.max_force,
        );
        force += delta.normalize_or_zero() * magnitude;
    }
    force / particle.mass
}
