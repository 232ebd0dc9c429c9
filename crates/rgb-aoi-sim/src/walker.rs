//! Deterministic circular walkers.

use rgb_aoi::{EntityId, Position};

const GOLDEN: f32 = 0.618_034;

/// An entity walking a circle around a fixed centre.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Walker {
    pub entity: EntityId,
    center: Position,
    radius: f32,
    phase: f32,
    /// Radians per tick; negative walks clockwise.
    speed: f32,
}

impl Walker {
    /// Spread walker `index` over a `world_size` square.
    #[must_use]
    pub fn new(index: u64, world_size: f32) -> Self {
        let f = |k: f32| ((index as f32 + 1.0) * GOLDEN * k).fract();
        let half = world_size / 2.0;
        let direction = if index % 2 == 0 { 1.0 } else { -1.0 };
        Self {
            entity: EntityId(index),
            center: Position::new(f(1.0) * world_size - half, f(7.0) * 8.0, f(3.0) * world_size - half),
            radius: 8.0 + f(5.0) * world_size / 8.0,
            phase: f(11.0) * core::f32::consts::TAU,
            speed: direction * (0.01 + f(13.0) * 0.05),
        }
    }

    #[must_use]
    pub fn position(&self, tick: u64) -> Position {
        let angle = self.phase + self.speed * tick as f32;
        Position::new(
            self.center.x + angle.cos() * self.radius,
            self.center.y,
            self.center.z + angle.sin() * self.radius,
        )
    }
}
