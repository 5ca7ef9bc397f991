//! Simulation builder and stepper.
//!
//! A [`Simulation`] is configured with method chaining, then
//! [`initialize`](Simulation::initialize)d and advanced with
//! [`step`](Simulation::step). Each step runs its phases strictly in order:
//!
//! 1. apply queued matrix edits
//! 2. rebuild the spatial grid
//! 3. LOD classification and merging (when enabled)
//! 4. forces
//! 5. integration
//! 6. validation

use crate::config::{ScenarioConfig, SimParams};
use crate::error::SimulationError;
use crate::forces::{Kick, NearField};
use crate::integrator::integrate;
use crate::interactions::{drain_edits, InteractionMatrix, InteractionRule, MatrixEditor};
use crate::lod::{LodAggregator, MergedParticle};
use crate::particle::{Particle, ParticleStore, ParticleType, ParticleTypes};
use crate::spatial::SpatialGrid;
use crate::spawn::SpawnContext;
use crate::validator::{validate, ValidationReport};
use glam::Vec3;
use std::path::Path;
use std::sync::mpsc::{self, Receiver, Sender};

/// Per-step diagnostics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SimStats {
    /// Steps taken since the last (re)initialization.
    pub step: u64,
    pub active_particles: usize,
    /// Store capacity.
    pub total_particles: usize,
    pub grid_cells: usize,
    pub merged_particles: usize,
    /// Active particles above LOD level 0.
    pub lod_particles: usize,
}

/// Everything built by `initialize`.
struct SimState {
    store: ParticleStore,
    matrix: InteractionMatrix,
    grid: SpatialGrid,
    lod: Option<LodAggregator>,
    kicks: Vec<Kick>,
    last_report: ValidationReport,
}

/// A particle life simulation.
///
/// # Example
///
/// ```ignore
/// let mut sim = Simulation::new()
///     .with_particle_type(ParticleType::new("red").with_count(500))
///     .with_particle_type(ParticleType::new("green").with_count(500))
///     .with_rule(InteractionRule::new(0u32, 1u32, 0.8))
///     .with_rule(InteractionRule::new(1u32, 0u32, -0.4))
///     .with_seed(7);
/// sim.initialize()?;
/// for _ in 0..100 {
///     sim.step(0.016);
/// }
/// ```
pub struct Simulation {
    params: SimParams,
    types: Vec<ParticleType>,
    rules: Vec<InteractionRule>,
    seed: Option<u64>,
    state: Option<SimState>,
    step_count: u64,
    edits_tx: Sender<InteractionRule>,
    edits_rx: Receiver<InteractionRule>,
}

impl Simulation {
    /// Create a new simulation with default settings.
    pub fn new() -> Self {
        let (edits_tx, edits_rx) = mpsc::channel();
        Self {
            params: SimParams::default(),
            types: Vec::new(),
            rules: Vec::new(),
            seed: None,
            state: None,
            step_count: 0,
            edits_tx,
            edits_rx,
        }
    }

    /// Build a simulation from a scenario JSON file.
    pub fn from_scenario_file(path: impl AsRef<Path>) -> Result<Self, SimulationError> {
        let scenario = ScenarioConfig::load(path)?;
        Ok(Self::new().with_scenario(scenario))
    }

    pub fn with_params(mut self, params: SimParams) -> Self {
        self.params = params;
        self
    }

    /// Add a particle type. Types are indexed in the order they are added.
    pub fn with_particle_type(mut self, particle_type: ParticleType) -> Self {
        self.types.push(particle_type);
        self
    }

    pub fn with_particle_types(mut self, types: impl IntoIterator<Item = ParticleType>) -> Self {
        self.types.extend(types);
        self
    }

    /// Replace the type list with the variants of a derived type enum.
    pub fn with_types_of<T: ParticleTypes>(mut self) -> Self {
        self.types = T::particle_types();
        self
    }

    /// Add one interaction matrix entry.
    pub fn with_rule(mut self, rule: InteractionRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_rules(mut self, rules: impl IntoIterator<Item = InteractionRule>) -> Self {
        self.rules.extend(rules);
        self
    }

    /// Seed the spawn RNG for reproducible runs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Take parameters, types, rules and seed from a scenario.
    pub fn with_scenario(mut self, scenario: ScenarioConfig) -> Self {
        log::info!("Using scenario '{}'", scenario.name);
        self.params = scenario.params;
        self.types = scenario.types;
        self.rules = scenario.rules;
        self.seed = scenario.seed;
        self
    }

    fn validate_types(&self) -> Result<(), SimulationError> {
        if self.types.is_empty() {
            return Err(SimulationError::NoParticleTypes);
        }
        for kind in &self.types {
            if !(kind.mass.is_finite() && kind.mass > 0.0) {
                return Err(SimulationError::InvalidParameter {
                    name: "type.mass",
                    value: kind.mass,
                });
            }
            if !(kind.radius.is_finite() && kind.radius >= 0.0) {
                return Err(SimulationError::InvalidParameter {
                    name: "type.radius",
                    value: kind.radius,
                });
            }
        }
        Ok(())
    }

    /// Build the particle store, matrix and grid, and spawn every requested
    /// particle.
    ///
    /// On error the simulation is left uninitialized. Matrix edits still
    /// queued from a [`MatrixEditor`] are dropped either way.
    pub fn initialize(&mut self) -> Result<(), SimulationError> {
        self.state = None;
        self.step_count = 0;
        let stale = self.edits_rx.try_iter().count();
        if stale > 0 {
            log::debug!("Discarded {} queued matrix edits", stale);
        }

        self.validate_types()?;
        self.params.validate()?;

        let requested: usize = self.types.iter().map(|t| t.count).sum();
        let capacity = self.params.capacity.unwrap_or(requested).max(1);

        let mut spawner = SpawnContext::new(self.params.boundary, self.seed);
        let spawned = spawner.spawn_population(&self.types, capacity, self.params.initial_speed);
        let mut store = ParticleStore::with_capacity(capacity);
        let populated = store.populate(spawned);

        let matrix = InteractionMatrix::from_rules(self.types.len(), &self.rules);
        let half_bounds = self.params.boundary.half_bounds();
        let grid = SpatialGrid::new(half_bounds, self.params.cell_size);
        let lod = self
            .params
            .lod
            .enabled
            .then(|| LodAggregator::new(half_bounds, &self.params.lod));

        log::info!(
            "Initialized simulation: {} types, {} particles in {} slots, {} grid cells{}",
            self.types.len(),
            populated,
            capacity,
            grid.cell_count(),
            if lod.is_some() { ", LOD enabled" } else { "" }
        );

        self.state = Some(SimState {
            store,
            matrix,
            grid,
            lod,
            kicks: vec![Kick::default(); capacity],
            last_report: ValidationReport::default(),
        });
        Ok(())
    }

    /// Re-spawn every particle from the type list and rebuild the matrix from
    /// the rule list. Runtime matrix edits are discarded.
    pub fn reinitialize(&mut self) -> Result<(), SimulationError> {
        self.initialize()
    }

    /// Replace the type list and rules, then reinitialize.
    pub fn reset_with(
        &mut self,
        types: Vec<ParticleType>,
        rules: Vec<InteractionRule>,
    ) -> Result<(), SimulationError> {
        self.types = types;
        self.rules = rules;
        self.initialize()
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    /// Advance the simulation by `dt` seconds.
    ///
    /// Does nothing on an uninitialized simulation or for a non-positive or
    /// non-finite `dt`.
    pub fn step(&mut self, dt: f32) {
        let Some(state) = self.state.as_mut() else {
            log::warn!("step() called before initialize(); ignoring");
            return;
        };
        if !(dt.is_finite() && dt > 0.0) {
            log::warn!("Ignoring step with invalid dt {}", dt);
            return;
        }
        let params = &self.params;

        let edits = drain_edits(&mut state.matrix, &self.edits_rx);
        if edits > 0 {
            log::debug!("Applied {} queued matrix edits", edits);
        }

        state.grid.rebuild(state.store.particles());

        if let Some(lod) = state.lod.as_mut() {
            lod.update(state.store.particles(), params.view_position, &params.lod);
        }

        let particles = state.store.particles();
        match state.lod.as_ref() {
            Some(lod) if params.lod.replaces_near_field => {
                state.kicks.clear();
                state.kicks.resize(particles.len(), Kick::default());
                lod.apply_aggregate_forces(particles, &state.matrix, params, &mut state.kicks);
            }
            lod => {
                let field = NearField {
                    particles,
                    grid: &state.grid,
                    matrix: &state.matrix,
                    params,
                    skip: lod.map(|l| l.members()),
                };
                field.evaluate_all(&mut state.kicks);
                if let Some(lod) = lod {
                    lod.apply_aggregate_forces(particles, &state.matrix, params, &mut state.kicks);
                }
            }
        }

        integrate(state.store.particles_mut(), &state.kicks, dt, params);

        let populated = state.store.populated();
        let report = validate(state.store.particles_mut(), populated, &self.types, &params.boundary);
        if !report.is_clean() {
            log::warn!(
                "Validator repaired {} kinematic states, {} types, {} masses, {} radii",
                report.repaired_kinematics,
                report.reassigned_types,
                report.repaired_masses,
                report.repaired_radii
            );
        }
        state.last_report = report;
        self.step_count += 1;

        log::debug!("{:?}", self.stats());
    }

    /// Set the coefficient `self_type` receives from `other_type`, effective
    /// from the next step.
    pub fn set_interaction(
        &mut self,
        self_type: usize,
        other_type: usize,
        strength: f32,
    ) -> Result<(), SimulationError> {
        let state = self.state.as_mut().ok_or(SimulationError::NotInitialized)?;
        let type_count = state.matrix.num_types();
        for index in [self_type, other_type] {
            if index >= type_count {
                return Err(SimulationError::TypeOutOfRange { index, type_count });
            }
        }
        if !strength.is_finite() {
            return Err(SimulationError::InvalidParameter {
                name: "strength",
                value: strength,
            });
        }
        state.matrix.try_set(self_type, other_type, strength);
        Ok(())
    }

    /// A cloneable handle for queueing matrix edits from other threads.
    ///
    /// Queued edits are applied at the start of the next step.
    pub fn matrix_editor(&self) -> MatrixEditor {
        MatrixEditor::new(self.edits_tx.clone())
    }

    /// Move the viewpoint used for LOD levels and far-field search shrink.
    pub fn set_view_position(&mut self, position: Vec3) {
        self.params.view_position = position;
    }

    /// Add a particle of `type_index` in the first free slot.
    ///
    /// Returns `Ok(None)` when the store is full.
    pub fn insert_particle(
        &mut self,
        type_index: usize,
        position: Vec3,
        velocity: Vec3,
    ) -> Result<Option<usize>, SimulationError> {
        let state = self.state.as_mut().ok_or(SimulationError::NotInitialized)?;
        let kind = self.types.get(type_index).ok_or(SimulationError::TypeOutOfRange {
            index: type_index,
            type_count: self.types.len(),
        })?;
        let position = self.params.boundary.clamp_position(position, kind.radius);
        let particle =
            Particle::new(position, type_index as u32, kind.mass, kind.radius).with_velocity(velocity);
        Ok(state.store.insert(particle))
    }

    /// Mark a slot inactive. Returns `false` if there was nothing to remove.
    pub fn deactivate(&mut self, index: usize) -> bool {
        self.state
            .as_mut()
            .is_some_and(|state| state.store.deactivate(index))
    }

    // ========== Accessors ==========

    pub fn params(&self) -> &SimParams {
        &self.params
    }

    pub fn particle_types(&self) -> &[ParticleType] {
        &self.types
    }

    /// Every slot, active and inactive. Empty before initialization.
    pub fn particles(&self) -> &[Particle] {
        self.state.as_ref().map(|s| s.store.particles()).unwrap_or(&[])
    }

    /// Copy of every active particle.
    pub fn snapshot(&self) -> Vec<Particle> {
        self.state.as_ref().map_or_else(Vec::new, |s| s.store.snapshot())
    }

    /// Raw bytes of the particle store, for GPU upload.
    pub fn as_bytes(&self) -> &[u8] {
        self.state.as_ref().map(|s| s.store.as_bytes()).unwrap_or(&[])
    }

    pub fn active_count(&self) -> usize {
        self.state.as_ref().map_or(0, |s| s.store.active_count())
    }

    pub fn store(&self) -> Option<&ParticleStore> {
        self.state.as_ref().map(|s| &s.store)
    }

    pub fn matrix(&self) -> Option<&InteractionMatrix> {
        self.state.as_ref().map(|s| &s.matrix)
    }

    pub fn grid(&self) -> Option<&SpatialGrid> {
        self.state.as_ref().map(|s| &s.grid)
    }

    /// Per-slot acceleration from the last step.
    pub fn accelerations(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.state
            .iter()
            .flat_map(|s| s.kicks.iter().map(|k| k.acceleration))
    }

    /// Merged particles produced by the last step's LOD pass.
    pub fn merged_particles(&self) -> &[MergedParticle] {
        self.state
            .as_ref()
            .and_then(|s| s.lod.as_ref())
            .map(|lod| lod.merged())
            .unwrap_or(&[])
    }

    /// What the validator repaired in the last step.
    pub fn last_validation(&self) -> ValidationReport {
        self.state.as_ref().map_or_else(ValidationReport::default, |s| s.last_report)
    }

    pub fn stats(&self) -> SimStats {
        let Some(state) = self.state.as_ref() else {
            return SimStats::default();
        };
        SimStats {
            step: self.step_count,
            active_particles: state.store.active_count(),
            total_particles: state.store.capacity(),
            grid_cells: state.grid.cell_count(),
            merged_particles: state.lod.as_ref().map_or(0, |l| l.merged().len()),
            lod_particles: state.lod.as_ref().map_or(0, |l| l.lod_particle_count()),
        }
    }
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::BoundaryShape;

    fn two_types() -> Simulation {
        Simulation::new()
            .with_particle_type(ParticleType::new("a").with_count(20))
            .with_particle_type(ParticleType::new("b").with_count(10))
            .with_rule(InteractionRule::new(0u32, 1u32, 0.5))
            .with_seed(11)
    }

    #[test]
    fn test_initialize_sizes_store_from_counts() {
        let mut sim = two_types();
        sim.initialize().unwrap();
        assert!(sim.is_initialized());
        assert_eq!(sim.active_count(), 30);
        assert_eq!(sim.particles().len(), 30);
        assert_eq!(sim.matrix().unwrap().get(0, 1), 0.5);
    }

    #[test]
    fn test_explicit_capacity_leaves_free_slots() {
        let mut sim = two_types().with_params(SimParams {
            capacity: Some(40),
            ..Default::default()
        });
        sim.initialize().unwrap();
        assert_eq!(sim.stats().total_particles, 40);
        assert_eq!(sim.active_count(), 30);
        assert_eq!(sim.insert_particle(1, Vec3::ZERO, Vec3::ZERO).unwrap(), Some(30));
    }

    #[test]
    fn test_no_types_fails() {
        let mut sim = Simulation::new();
        assert!(matches!(sim.initialize(), Err(SimulationError::NoParticleTypes)));
        assert!(!sim.is_initialized());
    }

    #[test]
    fn test_step_before_initialize_is_noop() {
        let mut sim = two_types();
        sim.step(0.1);
        assert_eq!(sim.stats(), SimStats::default());
        assert!(sim.particles().is_empty());
    }

    #[test]
    fn test_invalid_dt_ignored() {
        let mut sim = two_types();
        sim.initialize().unwrap();
        let before = sim.snapshot();
        sim.step(0.0);
        sim.step(f32::NAN);
        sim.step(-1.0);
        assert_eq!(sim.snapshot(), before);
        assert_eq!(sim.stats().step, 0);
    }

    #[test]
    fn test_set_interaction_checks_range() {
        let mut sim = two_types();
        assert!(matches!(
            sim.set_interaction(0, 1, 1.0),
            Err(SimulationError::NotInitialized)
        ));
        sim.initialize().unwrap();
        assert!(matches!(
            sim.set_interaction(0, 2, 1.0),
            Err(SimulationError::TypeOutOfRange { index: 2, type_count: 2 })
        ));
        sim.set_interaction(1, 0, -0.3).unwrap();
        assert_eq!(sim.matrix().unwrap().get(1, 0), -0.3);
        assert_eq!(sim.matrix().unwrap().get(0, 1), 0.5);
    }

    #[test]
    fn test_editor_applies_at_next_step() {
        let mut sim = two_types();
        sim.initialize().unwrap();
        let editor = sim.matrix_editor();
        let handle = std::thread::spawn(move || editor.set(1u32, 1u32, 0.9));
        assert!(handle.join().unwrap());
        assert_eq!(sim.matrix().unwrap().get(1, 1), 0.0);
        sim.step(0.01);
        assert_eq!(sim.matrix().unwrap().get(1, 1), 0.9);
    }

    #[test]
    fn test_reinitialize_discards_queued_edits() {
        let mut sim = two_types();
        sim.initialize().unwrap();
        let editor = sim.matrix_editor();
        assert!(editor.set(1u32, 0u32, 0.9));
        sim.reinitialize().unwrap();
        sim.step(0.01);
        assert_eq!(sim.matrix().unwrap().get(1, 0), 0.0);

        // Edits queued against the old type table never reach the new one.
        assert!(editor.set(0u32, 0u32, -0.7));
        sim.reset_with(vec![ParticleType::new("solo").with_count(5)], Vec::new())
            .unwrap();
        sim.step(0.01);
        assert_eq!(sim.matrix().unwrap().get(0, 0), 0.0);

        // The editor stays usable after a reset.
        assert!(editor.set(0u32, 0u32, 0.4));
        sim.step(0.01);
        assert_eq!(sim.matrix().unwrap().get(0, 0), 0.4);
    }

    #[test]
    fn test_reset_with_replaces_types() {
        let mut sim = two_types();
        sim.initialize().unwrap();
        sim.reset_with(vec![ParticleType::new("solo").with_count(5)], Vec::new())
            .unwrap();
        assert_eq!(sim.active_count(), 5);
        assert_eq!(sim.matrix().unwrap().num_types(), 1);
    }

    #[test]
    fn test_steps_keep_particles_inside() {
        let mut sim = two_types().with_params(SimParams {
            boundary: BoundaryShape::Sphere { radius: 3.0 },
            initial_speed: 2.0,
            ..Default::default()
        });
        sim.initialize().unwrap();
        for _ in 0..20 {
            sim.step(0.05);
        }
        for p in sim.snapshot() {
            assert!(sim.params().boundary.contains(p.position, p.radius, 1e-4));
        }
        assert_eq!(sim.stats().step, 20);
    }
}
