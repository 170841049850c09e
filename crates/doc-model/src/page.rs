use crate::{InvalidRegionReason, ModelError, PageId, RegionId, TextRegion};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    pub fn degrees(self) -> u16 {
        match self {
            Rotation::None => 0,
            Rotation::Cw90 => 90,
            Rotation::Cw180 => 180,
            Rotation::Cw270 => 270,
        }
    }

    pub fn from_degrees(degrees: u16) -> Option<Self> {
        match degrees {
            0 => Some(Rotation::None),
            90 => Some(Rotation::Cw90),
            180 => Some(Rotation::Cw180),
            270 => Some(Rotation::Cw270),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PageMetadata {
    pub width: u32,
    pub height: u32,
    pub rotation: Rotation,
}

impl PageMetadata {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height, rotation: Rotation::None }
    }
}

/// A scanned page: one source image and its regions in reading order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    id: PageId,
    image: String,
    metadata: PageMetadata,
    regions: Vec<TextRegion>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    extensions: Vec<String>,
}

impl Page {
    pub fn new(id: PageId, image: impl Into<String>, metadata: PageMetadata) -> Self {
        Self { id, image: image.into(), metadata, regions: Vec::new(), extensions: Vec::new() }
    }

    pub fn id(&self) -> PageId {
        self.id
    }

    /// Image path, relative to the project container.
    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn metadata(&self) -> &PageMetadata {
        &self.metadata
    }

    pub fn regions(&self) -> &[TextRegion] {
        &self.regions
    }

    pub fn region(&self, id: RegionId) -> Option<&TextRegion> {
        self.regions.iter().find(|region| region.id() == id)
    }

    pub fn position(&self, id: RegionId) -> Option<usize> {
        self.regions.iter().position(|region| region.id() == id)
    }

    /// Regions sorted back to front. Equal z-orders keep reading order.
    pub fn regions_by_z(&self) -> Vec<&TextRegion> {
        let mut regions: Vec<_> = self.regions.iter().collect();
        regions.sort_by_key(|region| region.z_order());
        regions
    }

    pub fn max_z_order(&self) -> Option<i32> {
        self.regions.iter().map(TextRegion::z_order).max()
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Vec<String> {
        &mut self.extensions
    }

    /// Appends a region while building a page that is not yet part of a project.
    pub fn push_region(&mut self, region: TextRegion) -> Result<(), ModelError> {
        let index = self.regions.len();
        self.insert_region(index, region)
    }

    pub(crate) fn insert_region(
        &mut self,
        index: usize,
        region: TextRegion,
    ) -> Result<(), ModelError> {
        if self.region(region.id()).is_some() {
            return Err(ModelError::InvalidRegion {
                id: region.id(),
                reason: InvalidRegionReason::DuplicateIdentifier,
            });
        }
        let index = index.min(self.regions.len());
        self.regions.insert(index, region);
        Ok(())
    }

    pub(crate) fn remove_region(&mut self, id: RegionId) -> Option<(usize, TextRegion)> {
        let index = self.position(id)?;
        Some((index, self.regions.remove(index)))
    }

    pub(crate) fn region_mut(&mut self, id: RegionId) -> Option<&mut TextRegion> {
        self.regions.iter_mut().find(|region| region.id() == id)
    }
}
