use std::ops::{Add, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

use crate::error::GeometryError;

/// Magnitudes below this are treated as zero.
pub const EPSILON: f32 = 1e-6;

/// 2D vector in field units. Screen convention: `y` grows downward.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn scale(self, k: f32) -> Vec2 {
        Vec2::new(self.x * k, self.y * k)
    }

    pub fn dot(self, other: Vec2) -> f32 {
        self.x * other.x + self.y * other.y
    }

    pub fn magnitude(self) -> f32 {
        self.dot(self).sqrt()
    }

    pub fn distance(self, other: Vec2) -> f32 {
        (self - other).magnitude()
    }

    /// Unit vector in the same direction.
    pub fn normalize(self) -> Result<Vec2, GeometryError> {
        let mag = self.magnitude();
        if mag < EPSILON {
            return Err(GeometryError::DegenerateVector);
        }
        Ok(self.scale(1.0 / mag))
    }

    /// Unit vector, or `fallback` when this vector is degenerate.
    pub fn normalize_or(self, fallback: Vec2) -> Vec2 {
        self.normalize().unwrap_or(fallback)
    }

    /// Same direction, new length. Degenerate vectors cannot be rescaled.
    pub fn with_magnitude(self, magnitude: f32) -> Result<Vec2, GeometryError> {
        Ok(self.normalize()?.scale(magnitude))
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Vec2 {
    type Output = Vec2;
    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Vec2;
    fn mul(self, rhs: f32) -> Vec2 {
        self.scale(rhs)
    }
}

impl Neg for Vec2 {
    type Output = Vec2;
    fn neg(self) -> Vec2 {
        self.scale(-1.0)
    }
}

/// Reflect `v` about the unit normal `n`: `v - n * (2 * (v . n))`.
///
/// The scaled normal is computed first and subtracted afterwards; keep it
/// that way so results stay bit-identical across platforms.
pub fn reflect(v: Vec2, n: Vec2) -> Vec2 {
    let d = v.dot(n);
    let offset = n.scale(2.0 * d);
    v - offset
}

/// Axis-aligned rectangle described by its centre and half extents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub center: Vec2,
    pub half_extent: Vec2,
}

impl Rect {
    pub const fn new(center: Vec2, half_extent: Vec2) -> Self {
        Self {
            center,
            half_extent,
        }
    }

    pub fn min(&self) -> Vec2 {
        self.center - self.half_extent
    }

    pub fn max(&self) -> Vec2 {
        self.center + self.half_extent
    }

    /// Point of the rectangle nearest to `p`.
    pub fn closest_point(&self, p: Vec2) -> Vec2 {
        let (lo, hi) = (self.min(), self.max());
        Vec2::new(p.x.clamp(lo.x, hi.x), p.y.clamp(lo.y, hi.y))
    }
}

/// Push-out information for a circle overlapping a rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    /// Unit normal pointing from the rectangle toward the circle.
    pub normal: Vec2,
    /// Distance the circle must move along `normal` to stop overlapping.
    pub depth: f32,
}

pub fn circle_rect_overlap(center: Vec2, radius: f32, rect: &Rect) -> bool {
    let closest = rect.closest_point(center);
    let d = center - closest;
    d.dot(d) <= radius * radius
}

/// Contact normal and depth for a circle touching a rectangle, if any.
pub fn circle_rect_contact(center: Vec2, radius: f32, rect: &Rect) -> Option<Contact> {
    let closest = rect.closest_point(center);
    let delta = center - closest;
    let dist = delta.magnitude();

    if dist >= EPSILON {
        if dist > radius {
            return None;
        }
        return Some(Contact {
            normal: delta.scale(1.0 / dist),
            depth: radius - dist,
        });
    }

    // Centre inside (or on the edge of) the rectangle: leave along the
    // axis with the shallowest penetration.
    let offset = center - rect.center;
    let pen_x = rect.half_extent.x - offset.x.abs();
    let pen_y = rect.half_extent.y - offset.y.abs();
    if pen_x <= pen_y {
        Some(Contact {
            normal: Vec2::new(offset.x.signum(), 0.0),
            depth: pen_x + radius,
        })
    } else {
        Some(Contact {
            normal: Vec2::new(0.0, offset.y.signum()),
            depth: pen_y + radius,
        })
    }
}

pub fn circle_circle_overlap(a: Vec2, radius_a: f32, b: Vec2, radius_b: f32) -> bool {
    let d = a - b;
    let r = radius_a + radius_b;
    d.dot(d) <= r * r
}

/// Result of an inverse-square attraction query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pull {
    /// Acceleration applied to the body at `from`.
    pub accel: Vec2,
    /// `from` is closer to the attractor than the clamping epsilon.
    pub within_horizon: bool,
}

/// Inverse-square attraction of a body at `from` toward `to`.
///
/// The distance is clamped to `epsilon` so the singularity at the attractor
/// never produces an infinite acceleration.
pub fn inverse_square_pull(from: Vec2, to: Vec2, strength: f32, epsilon: f32) -> Pull {
    let delta = to - from;
    let dist = delta.magnitude();
    let clamped = dist.max(epsilon);
    let accel = delta
        .normalize()
        .map(|dir| dir.scale(strength / (clamped * clamped)))
        .unwrap_or(Vec2::ZERO);
    Pull {
        accel,
        within_horizon: dist < epsilon,
    }
}
