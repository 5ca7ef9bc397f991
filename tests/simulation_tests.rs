//! End-to-end behaviour of the simulation step.

use plife::lod::LodAggregator;
use plife::validator::validate;
use plife::prelude::*;
use plife::{SpatialGrid, INACTIVE};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Frictionless, unclamped parameters so single-step results are exact.
fn free_params(capacity: usize) -> SimParams {
    SimParams {
        capacity: Some(capacity),
        damping: 1.0,
        max_velocity: 1_000.0,
        ..Default::default()
    }
}

/// Simulation with empty spawn requests, ready for manual insertion.
fn manual(types: usize, capacity: usize, rules: Vec<InteractionRule>) -> Simulation {
    let mut sim = Simulation::new()
        .with_params(free_params(capacity))
        .with_particle_types((0..types).map(|i| ParticleType::new(format!("t{}", i))))
        .with_rules(rules);
    sim.initialize().unwrap();
    sim
}

/// Like [`manual`], with level-of-detail settings.
fn manual_lod(types: usize, capacity: usize, rules: Vec<InteractionRule>, lod: LodConfig) -> Simulation {
    let mut sim = Simulation::new()
        .with_params(SimParams {
            lod,
            ..free_params(capacity)
        })
        .with_particle_types((0..types).map(|i| ParticleType::new(format!("t{}", i))))
        .with_rules(rules);
    sim.initialize().unwrap();
    sim
}

#[test]
fn test_asymmetric_pair() {
    // Type 0 is attracted to type 1, type 1 ignores type 0
    let mut sim = manual(2, 2, vec![InteractionRule::new(0u32, 1u32, 1.0)]);
    let a = sim.insert_particle(0, Vec3::new(-0.4, 0.0, 0.0), Vec3::ZERO).unwrap().unwrap();
    let b = sim.insert_particle(1, Vec3::new(0.4, 0.0, 0.0), Vec3::ZERO).unwrap().unwrap();

    sim.step(0.1);

    let particles = sim.particles();
    assert!(particles[a].velocity.x > 0.0);
    assert!(particles[a].position.x > -0.4);
    assert_eq!(particles[b].velocity, Vec3::ZERO);
    assert_eq!(particles[b].position, Vec3::new(0.4, 0.0, 0.0));

    let acc: Vec<Vec3> = sim.accelerations().collect();
    assert!(acc[a].x > 0.0);
    assert_eq!(acc[b], Vec3::ZERO);
}

#[test]
fn test_two_particles_two_units_apart_accelerate_together() {
    let mut sim = Simulation::new()
        .with_params(SimParams {
            interaction_radius: 3.0,
            ..free_params(2)
        })
        .with_particle_type(ParticleType::new("a"))
        .with_particle_type(ParticleType::new("b"))
        .with_rules([
            InteractionRule::new(0u32, 1u32, 1.0),
            InteractionRule::new(1u32, 0u32, 1.0),
        ]);
    sim.initialize().unwrap();
    let a = sim.insert_particle(0, Vec3::new(-1.0, 0.0, 0.0), Vec3::ZERO).unwrap().unwrap();
    let b = sim.insert_particle(1, Vec3::new(1.0, 0.0, 0.0), Vec3::ZERO).unwrap().unwrap();

    sim.step(0.01);

    let acc: Vec<Vec3> = sim.accelerations().collect();
    assert!(acc[a].dot(Vec3::X) > 0.0);
    assert!(acc[b].dot(-Vec3::X) > 0.0);
}

#[test]
fn test_two_particle_attraction_closes_distance() {
    let rules = vec![InteractionRule::new(0u32, 0u32, 0.5)];
    let mut sim = manual(1, 2, rules);
    sim.insert_particle(0, Vec3::new(-0.45, 0.0, 0.0), Vec3::ZERO).unwrap();
    sim.insert_particle(0, Vec3::new(0.45, 0.0, 0.0), Vec3::ZERO).unwrap();

    let start = sim.particles()[0].position.distance(sim.particles()[1].position);
    for _ in 0..5 {
        sim.step(0.05);
    }
    let p = sim.particles();
    let end = p[0].position.distance(p[1].position);
    assert!(end < start, "{} -> {}", start, end);
    // Symmetric rule, equal masses: momentum stays zero
    assert!((p[0].velocity + p[1].velocity).length() < 1e-5);
}

#[test]
fn test_wall_bounce() {
    let mut sim = Simulation::new()
        .with_params(SimParams {
            boundary: BoundaryShape::Box {
                half_extents: Vec3::ONE,
            },
            bounce: 0.5,
            ..free_params(1)
        })
        .with_particle_type(ParticleType::new("ball").with_radius(0.5));
    sim.initialize().unwrap();
    sim.insert_particle(0, Vec3::new(0.4, 0.0, 0.0), Vec3::new(5.0, 0.0, 0.0))
        .unwrap();

    sim.step(1.0);

    let p = sim.particles()[0];
    assert_eq!(p.position.x, 0.5);
    assert_eq!(p.velocity.x, -2.5);
}

#[test]
fn test_inactive_particles_exert_nothing() {
    let rules = vec![InteractionRule::new(0u32, 0u32, 1.0)];
    let mut sim = manual(1, 2, rules);
    sim.insert_particle(0, Vec3::ZERO, Vec3::ZERO).unwrap();
    let ghost = sim.insert_particle(0, Vec3::new(0.5, 0.0, 0.0), Vec3::ZERO).unwrap().unwrap();
    assert!(sim.deactivate(ghost));
    assert!(!sim.deactivate(ghost));

    sim.step(0.1);

    assert_eq!(sim.active_count(), 1);
    assert_eq!(sim.particles()[0].velocity, Vec3::ZERO);
    assert_eq!(sim.particles()[ghost].type_index, INACTIVE);
    assert_eq!(sim.snapshot().len(), 1);
}

#[test]
fn test_boundary_containment_all_shapes() {
    let shapes = [
        BoundaryShape::Box {
            half_extents: Vec3::new(6.0, 4.0, 5.0),
        },
        BoundaryShape::Sphere { radius: 5.0 },
        BoundaryShape::Cylinder {
            radius: 4.0,
            half_height: 5.0,
        },
    ];
    let mut rng = StdRng::seed_from_u64(99);
    let rules: Vec<_> = (0..3u32)
        .flat_map(|a| (0..3u32).map(move |b| (a, b)))
        .map(|(a, b)| InteractionRule::new(a, b, rng.gen_range(-1.0..1.0)))
        .collect();

    for shape in shapes {
        let mut sim = Simulation::new()
            .with_params(SimParams {
                boundary: shape,
                initial_speed: 20.0,
                max_velocity: 50.0,
                max_force: 100.0,
                ..Default::default()
            })
            .with_particle_types((0..3).map(|i| {
                ParticleType::new(format!("t{}", i))
                    .with_radius(0.05 * (i + 1) as f32)
                    .with_count(3_334)
            }))
            .with_rules(rules.clone())
            .with_seed(5);
        sim.initialize().unwrap();
        assert_eq!(sim.active_count(), 10_002);

        for _ in 0..5 {
            sim.step(0.1);
        }
        for p in sim.snapshot() {
            assert!(
                shape.contains(p.position, p.radius, 1e-4),
                "{:?} escaped {:?}",
                p.position,
                shape
            );
            assert!(p.position.is_finite() && p.velocity.is_finite());
        }
    }
}

#[test]
fn test_validator_idempotent_on_garbage() {
    let types = vec![ParticleType::new("a"), ParticleType::new("b").with_mass(2.0)];
    let shape = BoundaryShape::Cylinder {
        radius: 2.0,
        half_height: 1.0,
    };
    let mut rng = StdRng::seed_from_u64(3);
    let mut particles: Vec<Particle> = (0..200)
        .map(|i| {
            let junk = [f32::NAN, f32::INFINITY, -50.0, 0.0, 0.3];
            let pick = |r: &mut StdRng| junk[r.gen_range(0..junk.len())];
            Particle {
                position: Vec3::new(pick(&mut rng), pick(&mut rng), pick(&mut rng)),
                velocity: Vec3::new(pick(&mut rng), 0.0, pick(&mut rng)),
                type_index: rng.gen_range(-3..4),
                mass: pick(&mut rng),
                radius: if i % 2 == 0 { 0.1 } else { 0.0 },
            }
        })
        .collect();

    let first = validate(&mut particles, 150, &types, &shape);
    assert!(!first.is_clean());
    let repaired = particles.clone();

    let second = validate(&mut particles, 150, &types, &shape);
    assert!(second.is_clean(), "{:?}", second);
    // Inactive slots may keep a NaN mass, so compare bit patterns
    let bytes: &[u8] = plife::bytemuck::cast_slice(&particles);
    let expected: &[u8] = plife::bytemuck::cast_slice(&repaired);
    assert_eq!(bytes, expected);

    for p in &particles {
        assert!(p.type_index >= INACTIVE && p.type_index < 2);
        if p.is_active() {
            assert!(p.mass > 0.0);
        }
        assert!(shape.contains(p.position, p.radius, 1e-5));
    }
}

#[test]
fn test_failed_initialize_leaves_uninitialized() {
    let mut sim = Simulation::new()
        .with_particle_type(ParticleType::new("a").with_count(10))
        .with_params(SimParams {
            cell_size: -1.0,
            ..Default::default()
        });
    assert!(matches!(
        sim.initialize(),
        Err(SimulationError::InvalidParameter { name: "cell_size", .. })
    ));
    assert!(!sim.is_initialized());
    assert_eq!(sim.active_count(), 0);

    let mut sim = Simulation::new()
        .with_particle_type(ParticleType::new("a").with_count(10))
        .with_params(SimParams {
            boundary: BoundaryShape::Box {
                half_extents: Vec3::splat(1000.0),
            },
            cell_size: 0.001,
            ..Default::default()
        });
    assert!(matches!(
        sim.initialize(),
        Err(SimulationError::InvalidParameter { name: "cell_size", .. })
    ));
    assert!(!sim.is_initialized());

    let mut sim = Simulation::new().with_particle_type(ParticleType::new("a").with_mass(0.0));
    assert!(sim.initialize().is_err());
    assert!(!sim.is_initialized());

    let mut sim = Simulation::new().with_particle_type(ParticleType::new("a").with_count(3));
    sim.initialize().unwrap();
    assert!(sim.reset_with(Vec::new(), Vec::new()).is_err());
    assert!(!sim.is_initialized());
}

#[test]
fn test_same_seed_is_deterministic() {
    let build = || {
        let mut sim = Simulation::new()
            .with_params(SimParams {
                initial_speed: 1.0,
                ..Default::default()
            })
            .with_particle_type(ParticleType::new("a").with_count(300))
            .with_particle_type(ParticleType::new("b").with_count(300))
            .with_rule(InteractionRule::new(0u32, 1u32, 0.7))
            .with_rule(InteractionRule::new(1u32, 0u32, -0.2))
            .with_seed(17);
        sim.initialize().unwrap();
        for _ in 0..10 {
            sim.step(0.02);
        }
        sim.snapshot()
    };
    assert_eq!(build(), build());
}

#[test]
fn test_grid_counts_cover_active_particles() {
    let mut rng = StdRng::seed_from_u64(8);
    let particles: Vec<Particle> = (0..2_000)
        .map(|i| {
            let pos = Vec3::new(
                rng.gen_range(-10.0..10.0),
                rng.gen_range(-10.0..10.0),
                rng.gen_range(-10.0..10.0),
            );
            let mut p = Particle::new(pos, 0u32, 1.0, 0.05);
            if i % 7 == 0 {
                p.type_index = INACTIVE;
            }
            p
        })
        .collect();
    let mut grid = SpatialGrid::new(Vec3::splat(10.0), 0.75);
    grid.rebuild(&particles);

    let active = particles.iter().filter(|p| p.is_active()).count();
    let total: u32 = (0..grid.cell_count()).map(|c| grid.count(c)).sum();
    assert_eq!(total as usize, active);
    assert_eq!(grid.sorted_indices().len(), active);

    for (i, p) in particles.iter().enumerate() {
        match grid.entry(i) {
            Some(cell) => {
                assert!(p.is_active());
                assert!(grid.cell_members(cell).contains(&(i as u32)));
            }
            None => assert!(!p.is_active()),
        }
    }
}

#[test]
fn test_lod_merge_conserves_mass() {
    let config = LodConfig {
        enabled: true,
        distance_threshold: 3.0,
        max_levels: 3,
        base_cell_size: 1.0,
        min_merge_count: 4,
        merge_key: MergeKey::CoarseCellAndType,
        ..Default::default()
    };
    let mut rng = StdRng::seed_from_u64(21);
    let particles: Vec<Particle> = (0..3_000)
        .map(|i| {
            let pos = Vec3::new(
                rng.gen_range(-10.0..10.0),
                rng.gen_range(-10.0..10.0),
                rng.gen_range(-10.0..10.0),
            );
            Particle::new(pos, (i % 3) as u32, rng.gen_range(0.5..2.0), 0.05)
        })
        .collect();

    let mut lod = LodAggregator::new(Vec3::splat(10.0), &config);
    lod.update(&particles, Vec3::ZERO, &config);
    assert!(!lod.merged().is_empty());

    let merged_mass: f64 = lod.merged().iter().map(|m| m.mass as f64).sum();
    let member_mass: f64 = particles
        .iter()
        .zip(lod.members())
        .filter(|(_, &member)| member)
        .map(|(p, _)| p.mass as f64)
        .sum();
    assert!((merged_mass - member_mass).abs() / member_mass < 1e-4);

    let parents: u32 = lod.merged().iter().map(|m| m.parent_count).sum();
    assert_eq!(parents as usize, lod.members().iter().filter(|&&m| m).count());
    for m in lod.merged() {
        assert!(m.parent_count >= 4);
        assert!(m.lod_level >= 1 && m.lod_level <= 3);
    }
}

#[test]
fn test_lod_modes_step_cleanly() {
    for replaces_near_field in [true, false] {
        let mut sim = Simulation::new()
            .with_params(SimParams {
                lod: LodConfig {
                    enabled: true,
                    distance_threshold: 4.0,
                    min_merge_count: 3,
                    replaces_near_field,
                    ..Default::default()
                },
                ..Default::default()
            })
            .with_particle_type(ParticleType::new("a").with_count(1_500))
            .with_particle_type(ParticleType::new("b").with_count(1_500))
            .with_rule(InteractionRule::new(0u32, 1u32, 0.3))
            .with_seed(4);
        sim.initialize().unwrap();
        sim.step(0.02);

        let stats = sim.stats();
        assert!(stats.lod_particles > 0);
        assert_eq!(stats.merged_particles, sim.merged_particles().len());
        assert!(stats.merged_particles > 0);
        assert!(sim.last_validation().is_clean());
        for p in sim.snapshot() {
            assert!(p.position.is_finite());
        }
    }
}

#[test]
fn test_lod_replace_mode_drops_near_field() {
    // Both particles sit well inside the distance threshold, so nothing merges.
    let run = |replaces_near_field: bool| {
        let mut sim = manual_lod(
            1,
            2,
            vec![InteractionRule::new(0u32, 0u32, 1.0)],
            LodConfig {
                enabled: true,
                replaces_near_field,
                ..Default::default()
            },
        );
        sim.insert_particle(0, Vec3::new(-0.3, 0.0, 0.0), Vec3::ZERO).unwrap();
        sim.insert_particle(0, Vec3::new(0.3, 0.0, 0.0), Vec3::ZERO).unwrap();
        sim.step(0.01);
        assert!(sim.merged_particles().is_empty());
        sim.accelerations().collect::<Vec<Vec3>>()
    };

    let aggregate_only = run(true);
    assert_eq!(aggregate_only, vec![Vec3::ZERO, Vec3::ZERO]);

    let hybrid = run(false);
    assert!(hybrid[0].x > 0.0);
    assert!(hybrid[1].x < 0.0);
    assert_eq!(hybrid[0].y, 0.0);
    assert_eq!(hybrid[0].z, 0.0);
}

#[test]
fn test_hybrid_lod_skips_merged_members() {
    // Type 1 is pulled by type 0. A far cluster of type 0 merges, and the
    // merged particle's reach is too short to touch the observer.
    let lod = LodConfig {
        enabled: true,
        distance_threshold: 2.0,
        min_merge_count: 3,
        base_interaction_radius: 0.001,
        replaces_near_field: false,
        ..Default::default()
    };
    let observer_pull = |lod: LodConfig| {
        let mut sim = manual_lod(2, 5, vec![InteractionRule::new(1u32, 0u32, 1.0)], lod);
        for i in 0..4 {
            sim.insert_particle(0, Vec3::new(7.0 + i as f32 * 0.01, 0.0, 0.0), Vec3::ZERO)
                .unwrap();
        }
        let observer = sim.insert_particle(1, Vec3::new(7.6, 0.0, 0.0), Vec3::ZERO).unwrap().unwrap();
        sim.step(0.01);
        let out = (sim.merged_particles().to_vec(), sim.accelerations().nth(observer).unwrap());
        out
    };

    let (merged, pull) = observer_pull(lod.clone());
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].parent_count, 4);
    assert_eq!(pull, Vec3::ZERO);

    // Without LOD the same cluster pulls the observer through the near field.
    let (merged, pull) = observer_pull(LodConfig { enabled: false, ..lod });
    assert!(merged.is_empty());
    assert!(pull.x < 0.0);
}

#[test]
fn test_scenario_file_round_trip() {
    let scenario = ScenarioConfig {
        name: "round-trip".into(),
        params: SimParams {
            boundary: BoundaryShape::Cylinder {
                radius: 3.0,
                half_height: 2.0,
            },
            ..Default::default()
        },
        types: vec![ParticleType::new("a").with_count(12)],
        rules: vec![InteractionRule::new(0u32, 0u32, -0.25)],
        seed: Some(9),
    };
    let path = std::env::temp_dir().join(format!("plife-scenario-{}.json", std::process::id()));
    scenario.save(&path).unwrap();
    assert_eq!(ScenarioConfig::load(&path).unwrap(), scenario);

    let mut sim = Simulation::from_scenario_file(&path).unwrap();
    sim.initialize().unwrap();
    assert_eq!(sim.active_count(), 12);
    assert_eq!(sim.matrix().unwrap().get(0, 0), -0.25);
    std::fs::remove_file(&path).unwrap();

    assert!(matches!(
        Simulation::from_scenario_file(&path),
        Err(SimulationError::Config(ConfigError::Io(_)))
    ));
}
