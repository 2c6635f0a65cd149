//! Math types.
//!
//! This module intentionally stays small and deterministic.
//! It avoids SIMD/unsafe and focuses on stable semantics.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// 2D vector.
///
/// Serializes as a `[x, y]` tuple, which is the shape every sync payload
/// carries positions and velocities in.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn dot(self, rhs: Self) -> f32 {
        self.x * rhs.x + self.y * rhs.y
    }

    pub fn len_sq(self) -> f32 {
        self.dot(self)
    }

    pub fn lerp(self, to: Self, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        Self::new(self.x + (to.x - self.x) * t, self.y + (to.y - self.y) * t)
    }
}

impl Serialize for Vec2 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (self.x, self.y).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Vec2 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (x, y) = <(f32, f32)>::deserialize(deserializer)?;
        Ok(Self { x, y })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec2_lerp_midpoint() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(2.0, 4.0);
        assert_eq!(a.lerp(b, 0.5), Vec2::new(1.0, 2.0));
    }

    #[test]
    fn vec2_serializes_as_tuple() {
        let json = serde_json::to_string(&Vec2::new(1.5, -2.0)).unwrap();
        assert_eq!(json, "[1.5,-2.0]");
        let back: Vec2 = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Vec2::new(1.5, -2.0));
    }
}
