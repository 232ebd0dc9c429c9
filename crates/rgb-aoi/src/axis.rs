//! Axes and positions.

use std::cmp::Ordering;
use std::fmt;

/// Value reported for the coordinates of a removed or unknown node.
///
/// Sorts before every real coordinate, so a removed node can never appear
/// to overlap anything.
pub const SENTINEL: f32 = f32::NEG_INFINITY;

/// One of the three spatial axes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Axis {
    X = 0,
    Y = 1,
    Z = 2,
}

impl Axis {
    /// All axes in storage order.
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Axes in the order crossings are processed during an update.
    ///
    /// Horizontal before vertical: when a node crosses an xz boundary and a
    /// y boundary in the same update, the xz crossing is reported first.
    pub const WALK_ORDER: [Axis; 3] = [Axis::X, Axis::Z, Axis::Y];

    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Whether this axis uses the horizontal range of a trigger.
    #[must_use]
    pub const fn is_horizontal(self) -> bool {
        matches!(self, Self::X | Self::Z)
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::X => "x",
            Self::Y => "y",
            Self::Z => "z",
        })
    }
}

/// A point in simulation space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    /// Position of a removed node.
    pub const SENTINEL: Position = Position {
        x: SENTINEL,
        y: SENTINEL,
        z: SENTINEL,
    };

    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    #[must_use]
    pub const fn get(&self, axis: Axis) -> f32 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl From<[f32; 3]> for Position {
    fn from([x, y, z]: [f32; 3]) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Sort key of a node on one axis: cached coordinate, then insertion order.
///
/// Two distinct nodes never compare equal, so every change of relative
/// order is a strict flip.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AxisKey {
    pub value: f32,
    pub seq: u64,
}

impl AxisKey {
    #[must_use]
    pub fn compare(self, other: Self) -> Ordering {
        self.value
            .total_cmp(&other.value)
            .then(self.seq.cmp(&other.seq))
    }

    #[must_use]
    pub fn before(self, other: Self) -> bool {
        self.compare(other) == Ordering::Less
    }

    #[must_use]
    pub fn after(self, other: Self) -> bool {
        self.compare(other) == Ordering::Greater
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_ties_broken_by_seq() {
        let a = AxisKey { value: 1.0, seq: 3 };
        let b = AxisKey { value: 1.0, seq: 7 };
        assert!(a.before(b));
        assert!(b.after(a));
        assert_eq!(a.compare(a), Ordering::Equal);
    }

    #[test]
    fn test_sentinel_sorts_first() {
        let removed = AxisKey {
            value: SENTINEL,
            seq: u64::MAX,
        };
        let live = AxisKey {
            value: f32::MIN,
            seq: 0,
        };
        assert!(removed.before(live));
    }

    #[test]
    fn test_walk_order_is_horizontal_first() {
        assert!(Axis::WALK_ORDER[0].is_horizontal());
        assert!(Axis::WALK_ORDER[1].is_horizontal());
        assert_eq!(Axis::WALK_ORDER[2], Axis::Y);
    }
}
