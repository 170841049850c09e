use super::HistoryError;
use doc_model::{
    Geometry, Page, PageId, PageMetadata, Profile, Project, ProjectSettings, RegionField, RegionId,
    TextRegion, TextStyle,
};
use serde::Serialize;
use std::collections::HashSet;

/// A user mutation of a single region.
#[derive(Debug, Clone, PartialEq)]
pub enum RegionEdit {
    SourceText(String),
    Translation(String),
    DisplayOverride(Option<String>),
    Geometry(Geometry),
    ZOrder(i32),
    Style(TextStyle),
    Hidden(bool),
    Locked(bool),
    Profile(String),
    /// Copy the pending OCR shadow into the source text
    AcceptLatestOcr,
    /// Hand the region back to automated OCR updates
    ClearManualEdit,
}

impl RegionEdit {
    /// The field this edit targets. Consecutive edits are only merged into
    /// one undo step when they target the same field.
    pub fn field(&self) -> RegionField {
        match self {
            RegionEdit::SourceText(_) | RegionEdit::AcceptLatestOcr => RegionField::SourceText,
            RegionEdit::Translation(_) => RegionField::TranslatedText,
            RegionEdit::DisplayOverride(_) => RegionField::DisplayOverride,
            RegionEdit::Geometry(_) => RegionField::Geometry,
            RegionEdit::ZOrder(_) => RegionField::ZOrder,
            RegionEdit::Style(_) => RegionField::Style,
            RegionEdit::Hidden(_) => RegionField::Hidden,
            RegionEdit::Locked(_) => RegionField::Locked,
            RegionEdit::Profile(_) => RegionField::Profile,
            RegionEdit::ClearManualEdit => RegionField::ManuallyEdited,
        }
    }

    fn apply_to(self, region: &mut TextRegion) -> Result<bool, HistoryError> {
        Ok(match self {
            RegionEdit::SourceText(text) => region.set_source_text(text),
            RegionEdit::Translation(text) => region.set_translated_text(text),
            RegionEdit::DisplayOverride(text) => region.set_display_override(text),
            RegionEdit::Geometry(geometry) => region.set_geometry(geometry)?,
            RegionEdit::ZOrder(z_order) => region.set_z_order(z_order),
            RegionEdit::Style(style) => region.set_style(style),
            RegionEdit::Hidden(hidden) => region.set_hidden(hidden),
            RegionEdit::Locked(locked) => region.set_locked(locked),
            RegionEdit::Profile(profile) => region.set_profile(profile),
            RegionEdit::AcceptLatestOcr => region.accept_latest_ocr(),
            RegionEdit::ClearManualEdit => region.clear_manual_edit(),
        })
    }
}

/// Change notification sent to views after a command is applied or reverted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Change {
    Region { page: PageId, region: RegionId, field: RegionField },
    RegionInserted { page: PageId, region: RegionId },
    RegionRemoved { page: PageId, region: RegionId },
    PageInserted { page: PageId },
    PageRemoved { page: PageId },
    Settings,
    Profiles,
}

/// A reversible project mutation.
///
/// Commands capture the state they replace when they are built, so applying
/// and reverting never needs to consult anything but the project. Applying a
/// command to a project that no longer holds the captured state fails with
/// [`HistoryError::StaleCommand`] and changes nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    UpdateRegion {
        page: PageId,
        /// Set for single-field user edits; `None` for bulk updates that must
        /// never merge with a neighbour.
        field: Option<RegionField>,
        before: TextRegion,
        after: TextRegion,
    },
    InsertRegion { page: PageId, index: usize, region: TextRegion },
    RemoveRegion { page: PageId, index: usize, region: TextRegion },
    InsertPage { index: usize, page: Page },
    RemovePage { index: usize, page: Page },
    SetSettings { before: ProjectSettings, after: ProjectSettings },
    AddProfile { index: usize, profile: Profile },
    RemoveProfile { index: usize, profile: Profile },
    /// Children apply in order and revert in reverse order as one undo step.
    Compound { label: String, commands: Vec<Command> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

impl Command {
    /// Build an edit of one region against its current state.
    pub fn edit_region(
        project: &Project,
        region: RegionId,
        edit: RegionEdit,
    ) -> Result<Command, HistoryError> {
        let (page, before) = current_region(project, region)?;
        let field = edit.field();
        let mut after = before.clone();
        edit.apply_to(&mut after)?;
        Ok(Command::UpdateRegion { page, field: Some(field), before, after })
    }

    /// Replace a region wholesale with `updated`, which must keep its identifier.
    pub fn replace_region(project: &Project, updated: TextRegion) -> Result<Command, HistoryError> {
        let (page, before) = current_region(project, updated.id())?;
        Ok(Command::UpdateRegion { page, field: None, before, after: updated })
    }

    pub fn insert_region(
        project: &Project,
        page: PageId,
        index: usize,
        region: TextRegion,
    ) -> Result<Command, HistoryError> {
        let target = project.page(page).ok_or(doc_model::ModelError::PageNotFound(page))?;
        if project.region(region.id()).is_some() {
            return Err(doc_model::ModelError::InvalidRegion {
                id: region.id(),
                reason: doc_model::InvalidRegionReason::DuplicateIdentifier,
            }
            .into());
        }
        let index = index.min(target.regions().len());
        Ok(Command::InsertRegion { page, index, region })
    }

    pub fn remove_region(project: &Project, region: RegionId) -> Result<Command, HistoryError> {
        let (page, index) =
            project.locate_region(region).ok_or(doc_model::ModelError::RegionNotFound(region))?;
        let (_, current) = current_region(project, region)?;
        Ok(Command::RemoveRegion { page, index, region: current })
    }

    /// Merge several regions of one page into the first of them in reading
    /// order.
    ///
    /// The kept region takes the union bounding box and the line-joined
    /// source and translation texts; the others are removed.
    pub fn combine_regions(project: &Project, regions: &[RegionId]) -> Result<Command, HistoryError> {
        if regions.len() < 2 {
            return Err(HistoryError::InvalidCombine("at least two regions are required"));
        }
        let mut located = Vec::with_capacity(regions.len());
        for &id in regions {
            let location =
                project.locate_region(id).ok_or(doc_model::ModelError::RegionNotFound(id))?;
            if located.iter().any(|&(_, _, other)| other == id) {
                return Err(HistoryError::InvalidCombine("a region is listed twice"));
            }
            located.push((location.0, location.1, id));
        }
        let page = located[0].0;
        if located.iter().any(|&(other, _, _)| other != page) {
            return Err(HistoryError::InvalidCombine("regions are on different pages"));
        }
        located.sort_by_key(|&(_, index, _)| index);

        let page_regions = project
            .page(page)
            .ok_or(doc_model::ModelError::PageNotFound(page))?
            .regions();
        let members: Vec<&TextRegion> =
            located.iter().map(|&(_, index, _)| &page_regions[index]).collect();

        let mut bounds = members[0].geometry().bounding_box();
        for member in &members[1..] {
            let other = member.geometry().bounding_box();
            let right = bounds.right().max(other.right());
            let bottom = bounds.bottom().max(other.bottom());
            bounds.x = bounds.x.min(other.x);
            bounds.y = bounds.y.min(other.y);
            bounds.width = right - bounds.x;
            bounds.height = bottom - bounds.y;
        }
        let joined = |text: fn(&TextRegion) -> &str| {
            members
                .iter()
                .map(|region| text(region))
                .filter(|text| !text.is_empty())
                .collect::<Vec<_>>()
                .join("\n")
        };

        let kept = members[0];
        let mut merged = kept.clone();
        merged.set_geometry(Geometry::Rect(bounds))?;
        merged.set_source_text(joined(TextRegion::source_text));
        merged.set_translated_text(joined(TextRegion::translated_text));

        let mut commands = vec![Command::UpdateRegion {
            page,
            field: None,
            before: kept.clone(),
            after: merged,
        }];
        for &(_, index, _) in located[1..].iter().rev() {
            commands.push(Command::RemoveRegion {
                page,
                index,
                region: page_regions[index].clone(),
            });
        }
        Ok(Command::compound("Combine regions", commands))
    }

    pub fn insert_page(project: &Project, index: usize, page: Page) -> Result<Command, HistoryError> {
        if project.page(page.id()).is_some() {
            return Err(doc_model::ModelError::DuplicatePage(page.id()).into());
        }
        let index = index.min(project.pages().len());
        Ok(Command::InsertPage { index, page })
    }

    pub fn remove_page(project: &Project, page: PageId) -> Result<Command, HistoryError> {
        let index = project.page_index(page).ok_or(doc_model::ModelError::PageNotFound(page))?;
        Ok(Command::RemovePage { index, page: project.pages()[index].clone() })
    }

    /// Cut `page` at the y offsets in `cuts` into `pieces`, top to bottom.
    ///
    /// Each region moves to the piece its top edge falls in and is shifted
    /// up by that piece's offset. Regions above the first cut's band (negative
    /// top) land in the first piece. `pieces` must be empty pages, one more
    /// than there are cuts; a piece may reuse the split page's identifier.
    pub fn split_page(
        project: &Project,
        page: PageId,
        cuts: &[u32],
        pieces: Vec<Page>,
    ) -> Result<Command, HistoryError> {
        let index = project.page_index(page).ok_or(doc_model::ModelError::PageNotFound(page))?;
        let source = &project.pages()[index];
        if cuts.is_empty() {
            return Err(HistoryError::InvalidPageLayout("at least one cut is required"));
        }
        if pieces.len() != cuts.len() + 1 {
            return Err(HistoryError::InvalidPageLayout("expected one more piece than cuts"));
        }
        if cuts[0] == 0 || cuts.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(HistoryError::InvalidPageLayout("cuts must be positive and increasing"));
        }
        let mut piece_ids = HashSet::new();
        for piece in &pieces {
            if !piece.regions().is_empty() {
                return Err(HistoryError::InvalidPageLayout("pieces must start without regions"));
            }
            let taken = piece.id() != page && project.page(piece.id()).is_some();
            if taken || !piece_ids.insert(piece.id()) {
                return Err(doc_model::ModelError::DuplicatePage(piece.id()).into());
            }
        }

        let starts: Vec<u32> = std::iter::once(0).chain(cuts.iter().copied()).collect();
        let mut pieces = pieces;
        for region in source.regions() {
            let top = region.geometry().bounding_box().y;
            let segment = starts.iter().rposition(|&start| start as f32 <= top).unwrap_or(0);
            let moved = shifted(region, -(starts[segment] as f32))?;
            pieces[segment].push_region(moved)?;
        }

        let mut commands = vec![Command::RemovePage { index, page: source.clone() }];
        for (offset, piece) in pieces.into_iter().enumerate() {
            commands.push(Command::InsertPage { index: index + offset, page: piece });
        }
        Ok(Command::compound("Split page", commands))
    }

    /// Stack `pages` vertically into one page showing `image`.
    ///
    /// Pages are stacked in project order. The result keeps the identifier
    /// and position of the topmost page, takes the widest width and the sum
    /// of the heights, and carries every region shifted down by the height
    /// of the pages above it.
    pub fn stitch_pages(
        project: &Project,
        pages: &[PageId],
        image: impl Into<String>,
    ) -> Result<Command, HistoryError> {
        if pages.len() < 2 {
            return Err(HistoryError::InvalidPageLayout("at least two pages are required"));
        }
        let mut located = Vec::with_capacity(pages.len());
        for &id in pages {
            let index = project.page_index(id).ok_or(doc_model::ModelError::PageNotFound(id))?;
            if located.contains(&index) {
                return Err(HistoryError::InvalidPageLayout("a page is listed twice"));
            }
            located.push(index);
        }
        located.sort_unstable();

        let top = &project.pages()[located[0]];
        let members: Vec<&Page> = located.iter().map(|&index| &project.pages()[index]).collect();
        let metadata = PageMetadata {
            width: members.iter().map(|page| page.metadata().width).max().unwrap_or(0),
            height: members
                .iter()
                .fold(0u32, |total, page| total.saturating_add(page.metadata().height)),
            rotation: top.metadata().rotation,
        };
        let mut stitched = Page::new(top.id(), image, metadata);
        stitched.extensions_mut().extend(top.extensions().iter().cloned());

        let mut offset = 0u32;
        for member in &members {
            for region in member.regions() {
                stitched.push_region(shifted(region, offset as f32)?)?;
            }
            offset = offset.saturating_add(member.metadata().height);
        }

        let mut commands: Vec<Command> = located
            .iter()
            .rev()
            .map(|&index| Command::RemovePage { index, page: project.pages()[index].clone() })
            .collect();
        commands.push(Command::InsertPage { index: located[0], page: stitched });
        Ok(Command::compound("Stitch pages", commands))
    }

    pub fn set_settings(project: &Project, settings: ProjectSettings) -> Command {
        Command::SetSettings { before: project.settings().clone(), after: settings }
    }

    pub fn add_profile(project: &Project, profile: Profile) -> Result<Command, HistoryError> {
        if project.profile(&profile.name).is_some() {
            return Err(doc_model::ModelError::DuplicateProfile(profile.name).into());
        }
        Ok(Command::AddProfile { index: project.profiles().len(), profile })
    }

    pub fn remove_profile(project: &Project, name: &str) -> Result<Command, HistoryError> {
        let index = project
            .profiles()
            .iter()
            .position(|profile| profile.name == name)
            .ok_or_else(|| doc_model::ModelError::ProfileNotFound(name.to_owned()))?;
        Ok(Command::RemoveProfile { index, profile: project.profiles()[index].clone() })
    }

    pub fn compound(label: impl Into<String>, commands: Vec<Command>) -> Command {
        Command::Compound { label: label.into(), commands }
    }

    /// Short human-readable description, e.g. for an "Undo ..." menu entry.
    pub fn label(&self) -> &str {
        match self {
            Command::UpdateRegion { .. } => "Edit region",
            Command::InsertRegion { .. } => "Insert region",
            Command::RemoveRegion { .. } => "Delete region",
            Command::InsertPage { .. } => "Insert page",
            Command::RemovePage { .. } => "Delete page",
            Command::SetSettings { .. } => "Change settings",
            Command::AddProfile { .. } => "Add profile",
            Command::RemoveProfile { .. } => "Delete profile",
            Command::Compound { label, .. } => label,
        }
    }

    /// Whether applying the command would leave the project unchanged.
    pub fn is_noop(&self) -> bool {
        match self {
            Command::UpdateRegion { before, after, .. } => before == after,
            Command::SetSettings { before, after } => before == after,
            Command::Compound { commands, .. } => commands.iter().all(Command::is_noop),
            _ => false,
        }
    }

    pub fn apply(&self, project: &mut Project) -> Result<Vec<Change>, HistoryError> {
        self.run(project, Direction::Forward)
    }

    pub fn revert(&self, project: &mut Project) -> Result<Vec<Change>, HistoryError> {
        self.run(project, Direction::Backward)
    }

    /// Region and field key used for undo merging.
    pub(crate) fn merge_key(&self) -> Option<(RegionId, RegionField)> {
        match self {
            Command::UpdateRegion { field: Some(field), after, .. } => Some((after.id(), *field)),
            _ => None,
        }
    }

    /// Fold a later edit of the same region and field into this one.
    pub(crate) fn absorb(&mut self, later: Command) {
        if let (
            Command::UpdateRegion { after, .. },
            Command::UpdateRegion { after: later_after, .. },
        ) = (self, later)
        {
            *after = later_after;
        }
    }

    fn run(&self, project: &mut Project, direction: Direction) -> Result<Vec<Change>, HistoryError> {
        use Direction::{Backward, Forward};
        match (self, direction) {
            (Command::UpdateRegion { page, before, after, .. }, _) => {
                let (from, to) = match direction {
                    Forward => (before, after),
                    Backward => (after, before),
                };
                swap_region(project, *page, from, to)
            }
            (Command::InsertRegion { page, index, region }, Forward)
            | (Command::RemoveRegion { page, index, region }, Backward) => {
                project.insert_region(*page, *index, region.clone())?;
                Ok(vec![Change::RegionInserted { page: *page, region: region.id() }])
            }
            (Command::InsertRegion { page, region, .. }, Backward)
            | (Command::RemoveRegion { page, region, .. }, Forward) => {
                let stale = || HistoryError::StaleCommand(format!("region {}", region.id()));
                if project.locate_region(region.id()).map(|(at, _)| at) != Some(*page)
                    || project.region(region.id()) != Some(region)
                {
                    return Err(stale());
                }
                project.remove_region(region.id())?;
                Ok(vec![Change::RegionRemoved { page: *page, region: region.id() }])
            }
            (Command::InsertPage { index, page }, Forward)
            | (Command::RemovePage { index, page }, Backward) => {
                project.insert_page(*index, page.clone())?;
                Ok(vec![Change::PageInserted { page: page.id() }])
            }
            (Command::InsertPage { page, .. }, Backward)
            | (Command::RemovePage { page, .. }, Forward) => {
                if project.page(page.id()) != Some(page) {
                    return Err(HistoryError::StaleCommand(format!("page {}", page.id())));
                }
                project.remove_page(page.id())?;
                Ok(vec![Change::PageRemoved { page: page.id() }])
            }
            (Command::SetSettings { before, after }, _) => {
                let (from, to) = match direction {
                    Forward => (before, after),
                    Backward => (after, before),
                };
                if project.settings() != from {
                    return Err(HistoryError::StaleCommand("settings".to_owned()));
                }
                project.set_settings(to.clone());
                Ok(vec![Change::Settings])
            }
            (Command::AddProfile { index, profile }, Forward)
            | (Command::RemoveProfile { index, profile }, Backward) => {
                project.insert_profile(*index, profile.clone())?;
                Ok(vec![Change::Profiles])
            }
            (Command::AddProfile { profile, .. }, Backward)
            | (Command::RemoveProfile { profile, .. }, Forward) => {
                if project.profile(&profile.name) != Some(profile) {
                    return Err(HistoryError::StaleCommand(format!("profile {}", profile.name)));
                }
                project.remove_profile(&profile.name)?;
                Ok(vec![Change::Profiles])
            }
            (Command::Compound { label, commands }, Forward) => {
                run_all(project, commands.iter(), label, Forward)
            }
            (Command::Compound { label, commands }, Backward) => {
                run_all(project, commands.iter().rev(), label, Backward)
            }
        }
    }
}

fn current_region(project: &Project, id: RegionId) -> Result<(PageId, TextRegion), HistoryError> {
    let (page, _) = project.locate_region(id).ok_or(doc_model::ModelError::RegionNotFound(id))?;
    let region = project.region(id).ok_or(doc_model::ModelError::RegionNotFound(id))?;
    Ok((page, region.clone()))
}

/// `region` moved vertically by `dy`, without counting as a user edit.
fn shifted(region: &TextRegion, dy: f32) -> Result<TextRegion, HistoryError> {
    let mut parts = region.clone().into_parts();
    parts.geometry = parts.geometry.translated(0.0, dy);
    Ok(TextRegion::from_parts(parts)?)
}

fn swap_region(
    project: &mut Project,
    page: PageId,
    from: &TextRegion,
    to: &TextRegion,
) -> Result<Vec<Change>, HistoryError> {
    if project.region(from.id()) != Some(from) {
        return Err(HistoryError::StaleCommand(format!("region {}", from.id())));
    }
    project.replace_region(to.clone())?;
    Ok(from
        .changed_fields(to)
        .into_iter()
        .map(|field| Change::Region { page, region: to.id(), field })
        .collect())
}

/// Runs children in the given order. If one fails, the children already run
/// are undone in reverse before the error is returned.
fn run_all<'a>(
    project: &mut Project,
    commands: impl Iterator<Item = &'a Command>,
    label: &str,
    direction: Direction,
) -> Result<Vec<Change>, HistoryError> {
    let mut done: Vec<&Command> = Vec::new();
    let mut changes = Vec::new();
    for command in commands {
        match command.run(project, direction) {
            Ok(mut applied) => {
                changes.append(&mut applied);
                done.push(command);
            }
            Err(error) => {
                let rollback = match direction {
                    Direction::Forward => Direction::Backward,
                    Direction::Backward => Direction::Forward,
                };
                for command in done.into_iter().rev() {
                    if let Err(rollback_error) = command.run(project, rollback) {
                        tracing::error!(label, %rollback_error, "compound rollback failed");
                    }
                }
                return Err(error);
            }
        }
    }
    Ok(changes)
}
