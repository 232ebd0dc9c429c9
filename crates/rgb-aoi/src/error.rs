//! AOI error types.

use thiserror::Error;

use crate::axis::{Axis, Position};
use crate::entity_node::EntityId;
use crate::handle::{NodeId, TriggerId};

/// Errors for API misuse and detected invariant violations.
///
/// Operations on removed nodes or uninstalled triggers are not errors; they
/// are no-ops reported through their `bool` return value.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AoiError {
    /// Trigger ranges must be finite and strictly positive.
    #[error("invalid trigger range: xz={range_xz}, y={range_y}")]
    InvalidRange { range_xz: f32, range_y: f32 },

    /// Coordinates must be finite.
    #[error("non-finite position {0}")]
    NonFinitePosition(Position),

    /// The entity already has a coordinate node.
    #[error("{0} is already tracked")]
    DuplicateEntity(EntityId),

    /// Handle does not refer to a live node.
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    /// Node exists but does not track an entity.
    #[error("{0} is not an entity node")]
    NotAnEntity(NodeId),

    /// Handle does not refer to a trigger.
    #[error("unknown trigger {0}")]
    UnknownTrigger(TriggerId),

    /// Configuration rejected by validation.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// An axis sequence no longer satisfies its invariants.
    #[error("corrupted {axis} sequence: {reason}")]
    Corrupted { axis: Axis, reason: String },
}

/// Result type for AOI operations.
pub type AoiResult<T> = Result<T, AoiError>;

/// Check that a pair of trigger ranges is usable.
pub fn check_range(range_xz: f32, range_y: f32) -> AoiResult<()> {
    let valid = |r: f32| r.is_finite() && r > 0.0;
    if valid(range_xz) && valid(range_y) {
        Ok(())
    } else {
        Err(AoiError::InvalidRange { range_xz, range_y })
    }
}
