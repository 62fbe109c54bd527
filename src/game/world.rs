//! Collision world: pawn bodies, overlap queries and line traces

use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

use super::PawnId;

/// Pawn capsule radius
pub const PAWN_RADIUS: f32 = 55.0;
/// Pawn capsule half height
pub const PAWN_HALF_HEIGHT: f32 = 96.0;
/// Maximum length of a weapon trace
pub const TRACE_RANGE: f32 = 100_000.0;

/// World-space vector
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3::new(0.0, 0.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    pub fn is_zero(self) -> bool {
        self == Vec3::ZERO
    }

    /// Unit vector in the same direction, or None for zero/non-finite input
    pub fn normalized(self) -> Option<Vec3> {
        let len = self.length();
        if len > f32::EPSILON && len.is_finite() {
            Some(self * (1.0 / len))
        } else {
            None
        }
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Vec3;

    fn mul(self, rhs: f32) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// Axis-aligned box used for every collision volume
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Box around an upright capsule
    pub fn capsule(center: Vec3, radius: f32, half_height: f32) -> Self {
        let extent = Vec3::new(radius, radius, half_height);
        Self {
            min: center - extent,
            max: center + extent,
        }
    }

    /// Strict overlap test; touching faces do not count
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x < other.max.x
            && self.max.x > other.min.x
            && self.min.y < other.max.y
            && self.max.y > other.min.y
            && self.min.z < other.max.z
            && self.max.z > other.min.z
    }

    /// Slab test. Returns the entry fraction along `origin -> end` in [0, 1].
    pub fn segment_entry(&self, origin: Vec3, end: Vec3) -> Option<f32> {
        let delta = end - origin;
        let mut t_min = 0.0_f32;
        let mut t_max = 1.0_f32;

        for (o, d, lo, hi) in [
            (origin.x, delta.x, self.min.x, self.max.x),
            (origin.y, delta.y, self.min.y, self.max.y),
            (origin.z, delta.z, self.min.z, self.max.z),
        ] {
            if d.abs() < f32::EPSILON {
                if o < lo || o > hi {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / d;
            let (mut t0, mut t1) = ((lo - o) * inv, (hi - o) * inv);
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_min > t_max {
                return None;
            }
        }

        Some(t_min)
    }
}

/// Collision channel a body responds on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionCategory {
    /// Live pawns; weapon traces query this channel only
    Damageable,
    /// Dead pawns waiting for respawn
    Ragdoll,
}

/// A placed pawn's physical presence
#[derive(Debug, Clone)]
pub struct Body {
    pub pawn: PawnId,
    pub position: Vec3,
    pub category: CollisionCategory,
}

impl Body {
    pub fn bounds(&self) -> Aabb {
        Aabb::capsule(self.position, PAWN_RADIUS, PAWN_HALF_HEIGHT)
    }
}

/// Nearest blocking hit of a line trace
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceHit {
    pub pawn: PawnId,
    pub location: Vec3,
    pub distance: f32,
}

/// Physical queries the session relies on
pub trait CollisionQuery {
    /// Pawns whose bodies overlap the volume, any category
    fn overlapping(&self, volume: &Aabb) -> Vec<PawnId>;

    /// Nearest body on `category` crossed by the segment, skipping `ignore`
    fn line_trace(
        &self,
        origin: Vec3,
        end: Vec3,
        category: CollisionCategory,
        ignore: Option<PawnId>,
    ) -> Option<TraceHit>;
}

/// In-process collision world holding one body per placed pawn
#[derive(Debug, Default)]
pub struct ArenaWorld {
    bodies: Vec<Body>,
}

impl ArenaWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or move a pawn's body; a newly placed body is damageable
    pub fn place(&mut self, pawn: PawnId, position: Vec3) {
        match self.bodies.iter_mut().find(|b| b.pawn == pawn) {
            Some(body) => body.position = position,
            None => self.bodies.push(Body {
                pawn,
                position,
                category: CollisionCategory::Damageable,
            }),
        }
    }

    /// Move an existing body. Returns false if the pawn has no body.
    pub fn move_body(&mut self, pawn: PawnId, position: Vec3) -> bool {
        match self.bodies.iter_mut().find(|b| b.pawn == pawn) {
            Some(body) => {
                body.position = position;
                true
            }
            None => false,
        }
    }

    pub fn set_category(&mut self, pawn: PawnId, category: CollisionCategory) {
        if let Some(body) = self.bodies.iter_mut().find(|b| b.pawn == pawn) {
            body.category = category;
        }
    }

    pub fn remove(&mut self, pawn: PawnId) -> Option<Body> {
        let idx = self.bodies.iter().position(|b| b.pawn == pawn)?;
        Some(self.bodies.remove(idx))
    }

    #[cfg(test)]
    pub fn body(&self, pawn: PawnId) -> Option<&Body> {
        self.bodies.iter().find(|b| b.pawn == pawn)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.bodies.len()
    }
}

impl CollisionQuery for ArenaWorld {
    fn overlapping(&self, volume: &Aabb) -> Vec<PawnId> {
        self.bodies
            .iter()
            .filter(|b| b.bounds().overlaps(volume))
            .map(|b| b.pawn)
            .collect()
    }

    fn line_trace(
        &self,
        origin: Vec3,
        end: Vec3,
        category: CollisionCategory,
        ignore: Option<PawnId>,
    ) -> Option<TraceHit> {
        let length = (end - origin).length();

        self.bodies
            .iter()
            .filter(|b| b.category == category && Some(b.pawn) != ignore)
            .filter_map(|b| {
                b.bounds().segment_entry(origin, end).map(|t| TraceHit {
                    pawn: b.pawn,
                    location: origin + (end - origin) * t,
                    distance: length * t,
                })
            })
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_returns_nearest_body_and_skips_ignored() {
        let mut world = ArenaWorld::new();
        world.place(PawnId(1), Vec3::new(0.0, 0.0, 0.0));
        world.place(PawnId(2), Vec3::new(500.0, 0.0, 0.0));
        world.place(PawnId(3), Vec3::new(1000.0, 0.0, 0.0));

        let end = Vec3::new(TRACE_RANGE, 0.0, 0.0);
        let hit = world
            .line_trace(Vec3::ZERO, end, CollisionCategory::Damageable, Some(PawnId(1)))
            .unwrap();
        assert_eq!(hit.pawn, PawnId(2));
        assert!((hit.location.x - (500.0 - PAWN_RADIUS)).abs() < 0.5);
    }

    #[test]
    fn trace_ignores_other_categories() {
        let mut world = ArenaWorld::new();
        world.place(PawnId(2), Vec3::new(500.0, 0.0, 0.0));
        world.set_category(PawnId(2), CollisionCategory::Ragdoll);

        let hit = world.line_trace(
            Vec3::ZERO,
            Vec3::new(TRACE_RANGE, 0.0, 0.0),
            CollisionCategory::Damageable,
            None,
        );
        assert!(hit.is_none());
    }

    #[test]
    fn trace_misses_off_axis_body() {
        let mut world = ArenaWorld::new();
        world.place(PawnId(2), Vec3::new(500.0, 400.0, 0.0));

        let hit = world.line_trace(
            Vec3::ZERO,
            Vec3::new(TRACE_RANGE, 0.0, 0.0),
            CollisionCategory::Damageable,
            None,
        );
        assert!(hit.is_none());
    }

    #[test]
    fn overlap_sees_ragdolls_too() {
        let mut world = ArenaWorld::new();
        world.place(PawnId(7), Vec3::new(10.0, 0.0, 0.0));
        world.set_category(PawnId(7), CollisionCategory::Ragdoll);

        let volume = Aabb::capsule(Vec3::ZERO, 40.0, 90.0);
        assert_eq!(world.overlapping(&volume), vec![PawnId(7)]);

        world.remove(PawnId(7));
        assert!(world.overlapping(&volume).is_empty());
    }

    #[test]
    fn normalized_rejects_zero() {
        assert!(Vec3::ZERO.normalized().is_none());
        let n = Vec3::new(0.0, 3.0, 4.0).normalized().unwrap();
        assert!((n.length() - 1.0).abs() < 1e-6);
    }
}
