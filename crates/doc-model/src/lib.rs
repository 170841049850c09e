mod error;
mod geometry;
mod page;
mod profile;
mod project;
mod region;
mod style;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use error::{InvalidRegionReason, ModelError};
pub use geometry::{Geometry, Point, Rect};
pub use page::{Page, PageMetadata, Rotation};
pub use profile::{CaseFolding, Normalization, Profile, ScriptClass};
pub use project::{Project, ProjectParts, ProjectSettings};
pub use region::{RegionField, RegionParts, TextField, TextRegion};
pub use style::{
    Alignment, Blur, Color, FontRef, Gradient, Shadow, Stroke, TextEffect, TextStyle,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RegionId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageId(pub u64);

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
