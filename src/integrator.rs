//! Semi-implicit Euler integration.
//!
//! Velocity is advanced first from the step's acceleration and collision
//! impulse, then position from the new velocity:
//!
//! ```text
//! v += a * dt + dv
//! v *= damping
//! v  = soft_clamp(v, max_velocity)
//! p += v * dt
//! ```
//!
//! followed by the soft boundary bounce.

use crate::config::SimParams;
use crate::forces::Kick;
use crate::particle::Particle;
use glam::Vec3;
use rayon::prelude::*;

/// Fraction of `max_velocity` above which speed starts rolling off.
pub const VELOCITY_KNEE: f32 = 0.8;

/// Limit speed smoothly: unchanged below the knee, approaching
/// `max_velocity` asymptotically above it.
#[inline]
pub fn soft_clamp_speed(velocity: Vec3, max_velocity: f32) -> Vec3 {
    let speed = velocity.length();
    let knee = max_velocity * VELOCITY_KNEE;
    if speed <= knee || speed == 0.0 {
        return velocity;
    }
    let span = max_velocity - knee;
    let limited = knee + span * ((speed - knee) / span).tanh();
    velocity * (limited / speed)
}

/// Advance one particle by `dt`.
#[inline]
pub fn integrate_particle(particle: &mut Particle, kick: &Kick, dt: f32, params: &SimParams) {
    if !particle.is_active() {
        return;
    }
    let mut velocity = particle.velocity + kick.acceleration * dt + kick.impulse;
    velocity *= params.damping;
    velocity = soft_clamp_speed(velocity, params.max_velocity);

    let mut position = particle.position + velocity * dt;
    params
        .boundary
        .bounce(&mut position, &mut velocity, particle.radius, params.bounce);

    particle.position = position;
    particle.velocity = velocity;
}

/// Advance every active particle in parallel. `kicks` is indexed like
/// `particles`.
pub fn integrate(particles: &mut [Particle], kicks: &[Kick], dt: f32, params: &SimParams) {
    particles
        .par_iter_mut()
        .zip(kicks.par_iter())
        .for_each(|(particle, kick)| integrate_particle(particle, kick, dt, params));
}
