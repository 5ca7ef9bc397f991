//! Boundary shapes and the constraints they impose on particles.
//!
//! Every shape is centred on the origin. Two operations are provided:
//!
//! - [`BoundaryShape::bounce`] - soft constraint used by the integrator.
//!   Particles that leave the interior are put back on the wall and their
//!   outward velocity is reflected and scaled by the bounce coefficient.
//! - [`BoundaryShape::clamp_position`] - hard constraint used by the
//!   validator. Only the position is touched.
//!
//! Both operations shrink the interior by the particle radius so that a
//! particle's surface, not its centre, touches the wall.

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Geometry of the simulation volume.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum BoundaryShape {
    /// Axis-aligned box spanning `-half_extents..=half_extents`.
    Box { half_extents: Vec3 },
    /// Sphere of the given radius.
    Sphere { radius: f32 },
    /// Cylinder whose axis is Y. `radius` applies in the XZ plane.
    Cylinder { radius: f32, half_height: f32 },
}

impl Default for BoundaryShape {
    fn default() -> Self {
        BoundaryShape::Box {
            half_extents: Vec3::splat(10.0),
        }
    }
}

impl BoundaryShape {
    /// Half size of the shape's axis-aligned bounding box.
    ///
    /// The spatial grid and the LOD grids are laid over this box.
    pub fn half_bounds(&self) -> Vec3 {
        match *self {
            BoundaryShape::Box { half_extents } => half_extents,
            BoundaryShape::Sphere { radius } => Vec3::splat(radius),
            BoundaryShape::Cylinder { radius, half_height } => {
                Vec3::new(radius, half_height, radius)
            }
        }
    }

    /// Smallest extent of the shape, used for parameter validation.
    pub(crate) fn min_extent(&self) -> f32 {
        self.half_bounds().min_element()
    }

    /// Whether a particle of `radius` at `position` lies inside the shape,
    /// allowing `epsilon` of slack.
    pub fn contains(&self, position: Vec3, radius: f32, epsilon: f32) -> bool {
        match *self {
            BoundaryShape::Box { half_extents } => {
                let limit = (half_extents - Vec3::splat(radius)).max(Vec3::ZERO);
                (position.abs() - limit).max_element() <= epsilon
            }
            BoundaryShape::Sphere { radius: bound } => {
                position.length() <= (bound - radius).max(0.0) + epsilon
            }
            BoundaryShape::Cylinder { radius: bound, half_height } => {
                let radial = Vec2::new(position.x, position.z).length();
                radial <= (bound - radius).max(0.0) + epsilon
                    && position.y.abs() <= (half_height - radius).max(0.0) + epsilon
            }
        }
    }

    /// Apply the soft boundary: clamp back inside and reflect outward motion.
    ///
    /// `bounce` scales the reflected velocity component (0 = stick, 1 = perfect
    /// reflection).
    pub fn bounce(&self, position: &mut Vec3, velocity: &mut Vec3, radius: f32, bounce: f32) {
        match *self {
            BoundaryShape::Box { half_extents } => {
                for axis in 0..3 {
                    let limit = (half_extents[axis] - radius).max(0.0);
                    bounce_axis(&mut position[axis], &mut velocity[axis], limit, bounce);
                }
            }
            BoundaryShape::Sphere { radius: bound } => {
                let limit = (bound - radius).max(0.0);
                let dist = position.length();
                if dist > limit {
                    let normal = *position / dist;
                    *position = normal * limit;
                    let vn = velocity.dot(normal);
                    if vn > 0.0 {
                        *velocity -= normal * vn * (1.0 + bounce);
                    }
                }
            }
            BoundaryShape::Cylinder { radius: bound, half_height } => {
                let limit = (bound - radius).max(0.0);
                let radial = Vec2::new(position.x, position.z);
                let dist = radial.length();
                if dist > limit {
                    let normal = radial / dist;
                    let clamped = normal * limit;
                    position.x = clamped.x;
                    position.z = clamped.y;
                    let planar = Vec2::new(velocity.x, velocity.z);
                    let vn = planar.dot(normal);
                    if vn > 0.0 {
                        let reflected = planar - normal * vn * (1.0 + bounce);
                        velocity.x = reflected.x;
                        velocity.z = reflected.y;
                    }
                }
                let limit_y = (half_height - radius).max(0.0);
                bounce_axis(&mut position.y, &mut velocity.y, limit_y, bounce);
            }
        }
    }

    /// Hard-clamp a position into the shape's interior.
    pub fn clamp_position(&self, position: Vec3, radius: f32) -> Vec3 {
        match *self {
            BoundaryShape::Box { half_extents } => {
                let limit = (half_extents - Vec3::splat(radius)).max(Vec3::ZERO);
                position.clamp(-limit, limit)
            }
            BoundaryShape::Sphere { radius: bound } => {
                clamp_length(position, (bound - radius).max(0.0))
            }
            BoundaryShape::Cylinder { radius: bound, half_height } => {
                let radial = clamp_length(Vec3::new(position.x, 0.0, position.z), (bound - radius).max(0.0));
                let limit_y = (half_height - radius).max(0.0);
                Vec3::new(radial.x, position.y.clamp(-limit_y, limit_y), radial.z)
            }
        }
    }
}

/// Scale `v` down to at most `max` length. A clamped vector is left
/// unchanged by a second call.
fn clamp_length(v: Vec3, max: f32) -> Vec3 {
    let max_sq = max * max;
    if v.length_squared() <= max_sq {
        return v;
    }
    let mut clamped = v * (max / v.length());
    // Rounding can leave the result a few ulps long
    for _ in 0..4 {
        if clamped.length_squared() <= max_sq {
            break;
        }
        clamped *= 1.0 - f32::EPSILON;
    }
    clamped
}

#[inline]
fn bounce_axis(position: &mut f32, velocity: &mut f32, limit: f32, bounce: f32) {
    if *position > limit {
        *position = limit;
        if *velocity > 0.0 {
            *velocity = -*velocity * bounce;
        }
    } else if *position < -limit {
        *position = -limit;
        if *velocity < 0.0 {
            *velocity = -*velocity * bounce;
        }
    }
}
