use crate::{PageId, RegionId};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidRegionReason {
    #[error("geometry has zero area")]
    DegenerateGeometry,
    #[error("geometry contains a non-finite coordinate")]
    NonFiniteCoordinate,
    #[error("identifier is already in use")]
    DuplicateIdentifier,
    #[error("confidence must be a finite value between 0 and 1")]
    InvalidConfidence,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("invalid region {id}: {reason}")]
    InvalidRegion { id: RegionId, reason: InvalidRegionReason },

    #[error("page {0} not found")]
    PageNotFound(PageId),

    #[error("page identifier {0} is already in use")]
    DuplicatePage(PageId),

    #[error("region {0} not found")]
    RegionNotFound(RegionId),

    #[error("profile `{0}` not found")]
    ProfileNotFound(String),

    #[error("profile `{0}` already exists")]
    DuplicateProfile(String),

    #[error("no {0} identifiers left to allocate")]
    IdentifiersExhausted(&'static str),
}
