use crate::{
    FontRef, InvalidRegionReason, ModelError, Page, PageId, Profile, RegionId, TextRegion,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSettings {
    pub default_font: FontRef,
    pub default_profile: String,
    pub source_locale: String,
    pub target_locale: String,
    /// Unrecognized settings tags, kept verbatim.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extensions: Vec<String>,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            default_font: FontRef::default(),
            default_profile: "Latin".to_owned(),
            source_locale: "ja".to_owned(),
            target_locale: "en".to_owned(),
            extensions: Vec::new(),
        }
    }
}

/// Everything a [`Project`] holds, for rebuilding one from persisted state.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectParts {
    pub name: String,
    pub settings: ProjectSettings,
    pub profiles: Vec<Profile>,
    pub pages: Vec<Page>,
    pub next_region_id: u64,
    pub next_page_id: u64,
    pub extensions: Vec<String>,
}

/// A translation project: ordered pages, profiles and settings.
///
/// Region identifiers are unique across the whole project and come from a
/// monotonic counter, so an identifier is never handed out twice even after
/// its region is deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    name: String,
    settings: ProjectSettings,
    profiles: Vec<Profile>,
    pages: Vec<Page>,
    next_region_id: u64,
    next_page_id: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    extensions: Vec<String>,
}

// Identifier counters are allocation bookkeeping and stay out of equality.
impl PartialEq for Project {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.settings == other.settings
            && self.profiles == other.profiles
            && self.pages == other.pages
            && self.extensions == other.extensions
    }
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            settings: ProjectSettings::default(),
            profiles: vec![Profile::latin(), Profile::cjk()],
            pages: Vec::new(),
            next_region_id: 1,
            next_page_id: 1,
            extensions: Vec::new(),
        }
    }

    /// Validates identifier and profile uniqueness. Counters lower than an
    /// identifier already in use are raised past it.
    pub fn from_parts(parts: ProjectParts) -> Result<Self, ModelError> {
        let mut profile_names = HashSet::new();
        for profile in &parts.profiles {
            if !profile_names.insert(profile.name.as_str()) {
                return Err(ModelError::DuplicateProfile(profile.name.clone()));
            }
        }

        let mut page_ids = HashSet::new();
        let mut region_ids = HashSet::new();
        let mut max_page = 0;
        let mut max_region = 0;
        for page in &parts.pages {
            if !page_ids.insert(page.id()) {
                return Err(ModelError::DuplicatePage(page.id()));
            }
            max_page = max_page.max(page.id().0);
            for region in page.regions() {
                if !region_ids.insert(region.id()) {
                    return Err(duplicate_region(region.id()));
                }
                max_region = max_region.max(region.id().0);
            }
        }

        Ok(Self {
            name: parts.name,
            settings: parts.settings,
            profiles: parts.profiles,
            pages: parts.pages,
            next_region_id: parts.next_region_id.max(successor(REGION, max_region)?),
            next_page_id: parts.next_page_id.max(successor(PAGE, max_page)?),
            extensions: parts.extensions,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &ProjectSettings {
        &self.settings
    }

    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    pub fn profile(&self, name: &str) -> Option<&Profile> {
        self.profiles.iter().find(|profile| profile.name == name)
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page(&self, id: PageId) -> Option<&Page> {
        self.pages.iter().find(|page| page.id() == id)
    }

    pub fn page_index(&self, id: PageId) -> Option<usize> {
        self.pages.iter().position(|page| page.id() == id)
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Vec<String> {
        &mut self.extensions
    }

    /// Next identifier the region counter will hand out.
    pub fn next_region_id(&self) -> u64 {
        self.next_region_id
    }

    pub fn next_page_id(&self) -> u64 {
        self.next_page_id
    }

    pub fn allocate_region_id(&mut self) -> Result<RegionId, ModelError> {
        let id = RegionId(self.next_region_id);
        self.next_region_id = successor(REGION, id.0)?;
        Ok(id)
    }

    pub fn allocate_page_id(&mut self) -> Result<PageId, ModelError> {
        let id = PageId(self.next_page_id);
        self.next_page_id = successor(PAGE, id.0)?;
        Ok(id)
    }

    pub fn region_count(&self) -> usize {
        self.pages.iter().map(|page| page.regions().len()).sum()
    }

    pub fn region(&self, id: RegionId) -> Option<&TextRegion> {
        self.pages.iter().find_map(|page| page.region(id))
    }

    /// Page and reading-order index of a region.
    pub fn locate_region(&self, id: RegionId) -> Option<(PageId, usize)> {
        self.pages.iter().find_map(|page| page.position(id).map(|index| (page.id(), index)))
    }

    pub fn region_mut(&mut self, id: RegionId) -> Option<&mut TextRegion> {
        self.pages.iter_mut().find_map(|page| page.region_mut(id))
    }

    pub fn set_settings(&mut self, settings: ProjectSettings) -> ProjectSettings {
        std::mem::replace(&mut self.settings, settings)
    }

    pub fn insert_profile(&mut self, index: usize, profile: Profile) -> Result<(), ModelError> {
        if self.profile(&profile.name).is_some() {
            return Err(ModelError::DuplicateProfile(profile.name));
        }
        let index = index.min(self.profiles.len());
        self.profiles.insert(index, profile);
        Ok(())
    }

    pub fn add_profile(&mut self, profile: Profile) -> Result<(), ModelError> {
        self.insert_profile(self.profiles.len(), profile)
    }

    pub fn remove_profile(&mut self, name: &str) -> Result<(usize, Profile), ModelError> {
        let index = self
            .profiles
            .iter()
            .position(|profile| profile.name == name)
            .ok_or_else(|| ModelError::ProfileNotFound(name.to_owned()))?;
        Ok((index, self.profiles.remove(index)))
    }

    pub fn insert_page(&mut self, index: usize, page: Page) -> Result<(), ModelError> {
        if self.page(page.id()).is_some() {
            return Err(ModelError::DuplicatePage(page.id()));
        }
        let mut incoming = HashSet::new();
        for region in page.regions() {
            if !incoming.insert(region.id()) || self.region(region.id()).is_some() {
                return Err(duplicate_region(region.id()));
            }
        }

        let next_page = successor(PAGE, page.id().0)?;
        let next_region = match page.regions().iter().map(|region| region.id().0).max() {
            Some(max) => successor(REGION, max)?,
            None => self.next_region_id,
        };
        self.next_page_id = self.next_page_id.max(next_page);
        self.next_region_id = self.next_region_id.max(next_region);
        let index = index.min(self.pages.len());
        self.pages.insert(index, page);
        Ok(())
    }

    pub fn push_page(&mut self, page: Page) -> Result<(), ModelError> {
        self.insert_page(self.pages.len(), page)
    }

    pub fn remove_page(&mut self, id: PageId) -> Result<(usize, Page), ModelError> {
        let index = self.page_index(id).ok_or(ModelError::PageNotFound(id))?;
        Ok((index, self.pages.remove(index)))
    }

    pub fn insert_region(
        &mut self,
        page: PageId,
        index: usize,
        region: TextRegion,
    ) -> Result<(), ModelError> {
        if self.region(region.id()).is_some() {
            return Err(duplicate_region(region.id()));
        }
        let next = successor(REGION, region.id().0)?;
        let page = self.page_mut(page)?;
        page.insert_region(index, region)?;
        self.next_region_id = self.next_region_id.max(next);
        Ok(())
    }

    pub fn remove_region(&mut self, id: RegionId) -> Result<(PageId, usize, TextRegion), ModelError> {
        for page in &mut self.pages {
            if let Some((index, region)) = page.remove_region(id) {
                return Ok((page.id(), index, region));
            }
        }
        Err(ModelError::RegionNotFound(id))
    }

    /// Swaps in a region with the same identifier and returns the previous value.
    pub fn replace_region(&mut self, region: TextRegion) -> Result<TextRegion, ModelError> {
        let slot = self.region_mut(region.id()).ok_or(ModelError::RegionNotFound(region.id()))?;
        Ok(std::mem::replace(slot, region))
    }

    fn page_mut(&mut self, id: PageId) -> Result<&mut Page, ModelError> {
        self.pages.iter_mut().find(|page| page.id() == id).ok_or(ModelError::PageNotFound(id))
    }
}

const REGION: &str = "region";
const PAGE: &str = "page";

fn successor(kind: &'static str, id: u64) -> Result<u64, ModelError> {
    id.checked_add(1).ok_or(ModelError::IdentifiersExhausted(kind))
}

fn duplicate_region(id: RegionId) -> ModelError {
    ModelError::InvalidRegion { id, reason: InvalidRegionReason::DuplicateIdentifier }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Geometry, PageMetadata};

    fn project_with_page() -> (Project, PageId) {
        let mut project = Project::new("Chapter 1");
        let page_id = project.allocate_page_id().expect("page id expected");
        project
            .push_page(Page::new(page_id, "pages/001.png", PageMetadata::new(800, 1200)))
            .expect("page insert expected");
        (project, page_id)
    }

    fn new_region(project: &mut Project) -> TextRegion {
        let id = project.allocate_region_id().expect("region id expected");
        TextRegion::new(id, Geometry::rect(10.0, 10.0, 50.0, 20.0), "text")
            .expect("valid region expected")
    }

    #[test]
    fn new_project_has_default_profiles() {
        let project = Project::new("p");
        let names: Vec<_> = project.profiles().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Latin", "CJK"]);
        assert!(project.profile(&project.settings().default_profile).is_some());
    }

    #[test]
    fn removed_region_identifier_is_never_reused() {
        let (mut project, page) = project_with_page();
        let region = new_region(&mut project);
        let id = region.id();
        project.insert_region(page, 0, region).expect("insert expected");
        project.remove_region(id).expect("remove expected");

        let next = project.allocate_region_id().expect("region id expected");
        assert!(next > id);
    }

    #[test]
    fn region_identifiers_are_unique_across_pages() {
        let (mut project, first) = project_with_page();
        let second = project.allocate_page_id().expect("page id expected");
        project.push_page(Page::new(second, "pages/002.png", PageMetadata::default())).expect("page");

        let region = new_region(&mut project);
        project.insert_region(first, 0, region.clone()).expect("insert expected");
        assert!(matches!(
            project.insert_region(second, 0, region),
            Err(ModelError::InvalidRegion { reason: InvalidRegionReason::DuplicateIdentifier, .. })
        ));
    }

    #[test]
    fn locate_region_reports_page_and_index() {
        let (mut project, page) = project_with_page();
        let a = new_region(&mut project);
        let b = new_region(&mut project);
        let b_id = b.id();
        project.insert_region(page, 0, a).expect("insert a");
        project.insert_region(page, 1, b).expect("insert b");
        assert_eq!(project.locate_region(b_id), Some((page, 1)));
        assert_eq!(project.region_count(), 2);
    }

    #[test]
    fn from_parts_raises_stale_counters_and_rejects_duplicates() {
        let mut page = Page::new(PageId(3), "a.png", PageMetadata::default());
        let region = TextRegion::new(RegionId(9), Geometry::rect(0.0, 0.0, 1.0, 1.0), "")
            .expect("valid region expected");
        page.push_region(region).expect("push expected");

        let parts = ProjectParts {
            name: "p".to_owned(),
            settings: ProjectSettings::default(),
            profiles: vec![Profile::latin()],
            pages: vec![page.clone()],
            next_region_id: 1,
            next_page_id: 1,
            extensions: Vec::new(),
        };
        let project = Project::from_parts(parts.clone()).expect("valid parts expected");
        assert_eq!(project.next_region_id(), 10);
        assert_eq!(project.next_page_id(), 4);

        let duplicated = ProjectParts { pages: vec![page.clone(), page], ..parts };
        assert_eq!(Project::from_parts(duplicated), Err(ModelError::DuplicatePage(PageId(3))));
    }

    #[test]
    fn maximal_identifiers_are_rejected_instead_of_wrapping() {
        let page = Page::new(PageId(u64::MAX), "a.png", PageMetadata::default());
        let parts = ProjectParts {
            name: "p".to_owned(),
            settings: ProjectSettings::default(),
            profiles: vec![Profile::latin()],
            pages: vec![page.clone()],
            next_region_id: 1,
            next_page_id: 1,
            extensions: Vec::new(),
        };
        assert_eq!(
            Project::from_parts(parts),
            Err(ModelError::IdentifiersExhausted("page"))
        );

        let mut project = Project::new("p");
        assert_eq!(project.push_page(page), Err(ModelError::IdentifiersExhausted("page")));
        assert!(project.pages().is_empty());

        let region = TextRegion::new(RegionId(u64::MAX), Geometry::rect(0.0, 0.0, 1.0, 1.0), "")
            .expect("valid region expected");
        project
            .push_page(Page::new(PageId(1), "a.png", PageMetadata::default()))
            .expect("page insert expected");
        assert_eq!(
            project.insert_region(PageId(1), 0, region),
            Err(ModelError::IdentifiersExhausted("region"))
        );
        assert_eq!(project.region_count(), 0);
    }

    #[test]
    fn allocation_stops_at_the_last_identifier() {
        let parts = ProjectParts {
            name: "p".to_owned(),
            settings: ProjectSettings::default(),
            profiles: vec![Profile::latin()],
            pages: Vec::new(),
            next_region_id: u64::MAX,
            next_page_id: 1,
            extensions: Vec::new(),
        };
        let mut project = Project::from_parts(parts).expect("valid parts expected");
        assert_eq!(project.allocate_region_id(), Err(ModelError::IdentifiersExhausted("region")));
        assert_eq!(project.next_region_id(), u64::MAX);
    }

    #[test]
    fn equality_ignores_identifier_counters() {
        let mut a = Project::new("p");
        let b = a.clone();
        a.allocate_region_id().expect("region id expected");
        assert_eq!(a, b);
    }

    #[test]
    fn duplicate_profile_is_rejected() {
        let mut project = Project::new("p");
        assert_eq!(
            project.add_profile(Profile::latin()),
            Err(ModelError::DuplicateProfile("Latin".to_owned()))
        );
    }
}
