//! Headless runner.
//!
//! ```text
//! plife [scenario.json] [steps]
//! ```
//!
//! Without a scenario a three-species demo is run. Set `RUST_LOG=debug` for
//! per-step statistics.

use plife::prelude::*;
use std::time::Instant;

const FIXED_TIMESTEP: f32 = 1.0 / 60.0;
const DEFAULT_STEPS: u64 = 600;

#[derive(ParticleType, Clone, Copy, PartialEq, Debug)]
enum Demo {
    #[particle(count = 3_000, color = [1.0, 0.2, 0.2])]
    Red,
    #[particle(count = 3_000, color = [0.2, 1.0, 0.2])]
    Green,
    #[particle(count = 3_000, color = [0.2, 0.4, 1.0])]
    Blue,
}

fn demo() -> Simulation {
    use Demo::*;
    let rules = [
        InteractionRule::new(Red, Red, 0.4),
        InteractionRule::new(Red, Green, 0.8),
        InteractionRule::new(Green, Red, -0.6),
        InteractionRule::new(Green, Blue, 0.5),
        InteractionRule::new(Blue, Green, -0.3),
        InteractionRule::new(Blue, Red, 0.7),
        InteractionRule::new(Blue, Blue, -0.2),
    ];
    Simulation::new()
        .with_params(SimParams {
            boundary: BoundaryShape::Sphere { radius: 12.0 },
            interaction_radius: 1.5,
            initial_speed: 0.5,
            ..Default::default()
        })
        .with_types_of::<Demo>()
        .with_rules(rules)
        .with_seed(1)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let mut sim = match args.next() {
        Some(path) => Simulation::from_scenario_file(&path)?,
        None => demo(),
    };
    let steps = match args.next() {
        Some(n) => n.parse::<u64>()?,
        None => DEFAULT_STEPS,
    };

    sim.initialize()?;

    let started = Instant::now();
    let mut last_report = Instant::now();
    for _ in 0..steps {
        sim.step(FIXED_TIMESTEP);
        if last_report.elapsed().as_secs_f32() >= 1.0 {
            log::info!("{:?}", sim.stats());
            last_report = Instant::now();
        }
    }

    let elapsed = started.elapsed().as_secs_f64();
    let stats = sim.stats();
    log::info!(
        "{} steps of {} particles in {:.2}s ({:.1} steps/s)",
        stats.step,
        stats.active_particles,
        elapsed,
        stats.step as f64 / elapsed.max(f64::EPSILON)
    );
    Ok(())
}
