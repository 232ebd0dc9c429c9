use rgb_aoi::{AoiError, EntityId};
use thiserror::Error;

/// Errors raised while driving a space or delivering its events.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DispatchError {
    #[error("entity {0} is not tracked by this space")]
    UnknownEntity(EntityId),

    #[error("entity {0} is already tracked by this space")]
    AlreadySpawned(EntityId),

    #[error("{entity} rejected `{method}`: {reason}")]
    Rejected {
        entity: EntityId,
        method: &'static str,
        reason: String,
    },

    #[error(transparent)]
    Aoi(#[from] AoiError),
}

pub type DispatchResult<T> = Result<T, DispatchError>;
