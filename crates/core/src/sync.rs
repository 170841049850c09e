//! OCR merge engine
//!
//! Folds a fresh batch of OCR detections into the regions of one page.
//! Detections carry no identifiers, so they are paired with existing regions
//! by bounding-box overlap. Manual work always wins: edited and locked
//! regions are never overwritten, and the whole merge is one undo step.

use crate::config::MergeConfig;
use crate::history::{Change, Command, History, HistoryError};
use crate::ocr::Detection;
use doc_model::{ModelError, PageId, Project, RegionId, TextRegion, TextStyle};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    History(#[from] HistoryError),
}

/// Why an OCR result was parked in the region's shadow instead of applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    ManuallyEdited,
    /// The region changed after the OCR request was issued
    ChangedDuringOcr,
}

/// A matched region whose OCR text could not be applied automatically.
///
/// The text is kept in the region's `ocr_shadow` until the user accepts it
/// with [`crate::history::RegionEdit::AcceptLatestOcr`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SoftConflict {
    pub region: RegionId,
    pub latest_ocr: String,
    pub reason: ConflictReason,
}

/// Outcome of one merge
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeReport {
    pub page: PageId,
    /// Regions overwritten with OCR text, geometry and confidence
    pub updated: Vec<RegionId>,
    /// Regions created for unmatched detections, in detection order
    pub created: Vec<RegionId>,
    /// Unedited regions no detection matched
    pub removed: Vec<RegionId>,
    pub conflicts: Vec<SoftConflict>,
    /// Locked regions that consumed a detection without being touched
    pub skipped_locked: Vec<RegionId>,
    /// Indices of detections with degenerate geometry or invalid confidence
    pub rejected: Vec<usize>,
    pub changes: Vec<Change>,
}

impl MergeReport {
    fn new(page: PageId) -> Self {
        Self {
            page,
            updated: Vec::new(),
            created: Vec::new(),
            removed: Vec::new(),
            conflicts: Vec::new(),
            skipped_locked: Vec::new(),
            rejected: Vec::new(),
            changes: Vec::new(),
        }
    }

    /// Whether the merge left the project untouched
    pub fn is_unchanged(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Merges detections into pages according to a [`MergeConfig`]
#[derive(Debug, Clone, Default)]
pub struct SyncEngine {
    config: MergeConfig,
}

impl SyncEngine {
    pub fn new(config: MergeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    /// Merge `detections` into `page`. New regions get `profile`.
    pub fn merge(
        &self,
        project: &mut Project,
        history: &mut History,
        page: PageId,
        detections: Vec<Detection>,
        profile: &str,
    ) -> Result<MergeReport, SyncError> {
        self.merge_since(project, history, page, detections, profile, None)
    }

    /// Like [`SyncEngine::merge`], with the region versions seen when the OCR
    /// request was issued.
    ///
    /// When [`MergeConfig::protect_changed_regions`] is set, a region whose
    /// version moved since then is protected like a manually edited one.
    pub fn merge_since(
        &self,
        project: &mut Project,
        history: &mut History,
        page: PageId,
        detections: Vec<Detection>,
        profile: &str,
        baseline: Option<&HashMap<RegionId, u64>>,
    ) -> Result<MergeReport, SyncError> {
        let mut report = MergeReport::new(page);
        let target = project.page(page).ok_or(ModelError::PageNotFound(page))?;
        let regions = target.regions();

        let mut valid = Vec::with_capacity(detections.len());
        for (index, detection) in detections.into_iter().enumerate() {
            if detection.is_valid() {
                valid.push((index, detection));
            } else {
                report.rejected.push(index);
            }
        }

        let assignment = self.assign(regions, &valid);
        let mut updates = Vec::new();
        let mut matched_regions = HashSet::new();
        let mut matched_detections = HashSet::new();

        for &(region_index, slot) in &assignment {
            let region = &regions[region_index];
            let (_, detection) = &valid[slot];
            matched_regions.insert(region.id());
            matched_detections.insert(slot);

            if region.is_locked() {
                report.skipped_locked.push(region.id());
                continue;
            }
            if let Some(reason) = self.protection(region, baseline) {
                let mut updated = region.clone();
                if updated.set_ocr_shadow(Some(detection.text.clone())) {
                    updates.push(update(page, region, updated));
                }
                report.conflicts.push(SoftConflict {
                    region: region.id(),
                    latest_ocr: detection.text.clone(),
                    reason,
                });
                continue;
            }

            let mut updated = region.clone();
            if updated.apply_ocr(
                detection.text.clone(),
                detection.geometry.clone(),
                detection.confidence,
            )? {
                updates.push(update(page, region, updated));
                report.updated.push(region.id());
            }
        }

        let mut removals = Vec::new();
        for (index, region) in regions.iter().enumerate().rev() {
            let keep = matched_regions.contains(&region.id())
                || region.is_locked()
                || self.protection(region, baseline).is_some();
            if !keep {
                removals.push(Command::RemoveRegion { page, index, region: region.clone() });
            }
        }
        report.removed = regions
            .iter()
            .filter(|region| removals.iter().any(|command| removes(command, region.id())))
            .map(TextRegion::id)
            .collect();

        let mut next_index = regions.len() - removals.len();
        let mut next_z = target.max_z_order().map_or(0, |z| z.saturating_add(1));
        let style = TextStyle::with_font(project.settings().default_font.clone());
        let fresh: Vec<&Detection> = valid
            .iter()
            .enumerate()
            .filter(|(slot, _)| !matched_detections.contains(slot))
            .map(|(_, (_, detection))| detection)
            .collect();

        let mut inserts = Vec::with_capacity(fresh.len());
        for detection in fresh {
            let id = project.allocate_region_id()?;
            let region = TextRegion::new(id, detection.geometry.clone(), detection.text.clone())?
                .with_profile(profile)
                .with_z_order(next_z)
                .with_style(style.clone())
                .with_confidence(detection.confidence)?;
            inserts.push(Command::InsertRegion { page, index: next_index, region });
            report.created.push(id);
            next_index += 1;
            next_z = next_z.saturating_add(1);
        }

        let mut commands = updates;
        commands.append(&mut removals);
        commands.append(&mut inserts);
        if !commands.is_empty() {
            report.changes = history.execute(project, Command::compound("OCR merge", commands))?;
        }

        tracing::info!(
            page = %page,
            updated = report.updated.len(),
            created = report.created.len(),
            removed = report.removed.len(),
            conflicts = report.conflicts.len(),
            rejected = report.rejected.len(),
            "merged OCR detections"
        );
        Ok(report)
    }

    /// Greedy one-to-one pairing by descending IoU. Ties go to the lower
    /// region identifier, then to the earlier detection.
    fn assign(&self, regions: &[TextRegion], valid: &[(usize, Detection)]) -> Vec<(usize, usize)> {
        let mut candidates = Vec::new();
        for (region_index, region) in regions.iter().enumerate() {
            let bounds = region.geometry().bounding_box();
            for (slot, (_, detection)) in valid.iter().enumerate() {
                let iou = bounds.iou(&detection.geometry.bounding_box());
                if iou > 0.0 && iou >= self.config.iou_threshold {
                    candidates.push((iou, region_index, slot));
                }
            }
        }
        candidates.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| regions[a.1].id().cmp(&regions[b.1].id()))
                .then_with(|| a.2.cmp(&b.2))
        });

        let mut used_regions = HashSet::new();
        let mut used_detections = HashSet::new();
        let mut assignment = Vec::new();
        for (_, region_index, slot) in candidates {
            if used_regions.contains(&region_index) || used_detections.contains(&slot) {
                continue;
            }
            used_regions.insert(region_index);
            used_detections.insert(slot);
            assignment.push((region_index, slot));
        }
        assignment.sort_by_key(|&(region_index, _)| region_index);
        assignment
    }

    fn protection(
        &self,
        region: &TextRegion,
        baseline: Option<&HashMap<RegionId, u64>>,
    ) -> Option<ConflictReason> {
        if region.is_manually_edited() {
            return Some(ConflictReason::ManuallyEdited);
        }
        let baseline = baseline.filter(|_| self.config.protect_changed_regions)?;
        match baseline.get(&region.id()) {
            Some(&version) if version == region.version() => None,
            _ => Some(ConflictReason::ChangedDuringOcr),
        }
    }
}

fn update(page: PageId, before: &TextRegion, after: TextRegion) -> Command {
    Command::UpdateRegion { page, field: None, before: before.clone(), after }
}

fn removes(command: &Command, id: RegionId) -> bool {
    matches!(command, Command::RemoveRegion { region, .. } if region.id() == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::RegionEdit;
    use doc_model::{FontRef, Geometry, Page, PageMetadata, RegionField};

    fn setup() -> (Project, PageId) {
        let mut project = Project::new("sync");
        let mut settings = project.settings().clone();
        settings.default_font = FontRef::new("CC Wild Words");
        project.set_settings(settings);
        let page = project.allocate_page_id().expect("page id expected");
        project
            .push_page(Page::new(page, "001.png", PageMetadata::new(800, 1200)))
            .expect("page insert expected");
        (project, page)
    }

    fn add_region(project: &mut Project, page: PageId, x: f32, text: &str) -> RegionId {
        let id = project.allocate_region_id().expect("region id expected");
        let region = TextRegion::new(id, Geometry::rect(x, 0.0, 100.0, 50.0), text)
            .expect("valid region expected")
            .with_profile("CJK");
        let index = project.page(page).map_or(0, |page| page.regions().len());
        project.insert_region(page, index, region).expect("region insert expected");
        id
    }

    fn detection(x: f32, text: &str) -> Detection {
        Detection::new(Geometry::rect(x, 0.0, 100.0, 50.0), text, 0.9)
    }

    #[test]
    fn test_unedited_region_is_replaced_without_conflict() {
        let (mut project, page) = setup();
        let id = add_region(&mut project, page, 0.0, "old");
        let mut history = History::default();

        let report = SyncEngine::default()
            .merge(&mut project, &mut history, page, vec![detection(2.0, "new")], "CJK")
            .expect("merge expected");

        assert_eq!(report.updated, vec![id]);
        assert!(report.conflicts.is_empty());
        let region = project.region(id).expect("region expected");
        assert_eq!(region.source_text(), "new");
        assert_eq!(region.geometry(), &Geometry::rect(2.0, 0.0, 100.0, 50.0));
        assert!(!region.is_manually_edited());
        assert!(report.changes.contains(&Change::Region {
            page,
            region: id,
            field: RegionField::SourceText
        }));
    }

    #[test]
    fn test_edited_region_is_preserved_as_soft_conflict() {
        let (mut project, page) = setup();
        let id = add_region(&mut project, page, 0.0, "old");
        let mut history = History::default();
        let command = Command::edit_region(&project, id, RegionEdit::SourceText("fixed".into()))
            .expect("edit expected");
        history.execute(&mut project, command).expect("execute expected");

        let report = SyncEngine::default()
            .merge(&mut project, &mut history, page, vec![detection(0.0, "ocr")], "CJK")
            .expect("merge expected");

        assert_eq!(
            report.conflicts,
            vec![SoftConflict {
                region: id,
                latest_ocr: "ocr".to_owned(),
                reason: ConflictReason::ManuallyEdited
            }]
        );
        assert!(report.updated.is_empty());
        let region = project.region(id).expect("region expected");
        assert_eq!(region.source_text(), "fixed");
        assert_eq!(region.ocr_shadow(), Some("ocr"));

        let accept = Command::edit_region(&project, id, RegionEdit::AcceptLatestOcr)
            .expect("edit expected");
        history.execute(&mut project, accept).expect("execute expected");
        let region = project.region(id).expect("region expected");
        assert_eq!(region.source_text(), "ocr");
        assert!(region.is_manually_edited());
    }

    #[test]
    fn edited_region_conflicts_even_when_ocr_agrees_with_source() {
        let (mut project, page) = setup();
        let id = add_region(&mut project, page, 0.0, "old");
        let mut history = History::default();
        let command = Command::edit_region(&project, id, RegionEdit::Translation("Hello".into()))
            .expect("edit expected");
        history.execute(&mut project, command).expect("execute expected");
        let engine = SyncEngine::default();

        let first = engine
            .merge(&mut project, &mut history, page, vec![detection(0.0, "misread")], "CJK")
            .expect("merge expected");
        assert_eq!(first.conflicts.len(), 1);
        assert_eq!(project.region(id).and_then(TextRegion::ocr_shadow), Some("misread"));

        let second = engine
            .merge(&mut project, &mut history, page, vec![detection(0.0, "old")], "CJK")
            .expect("merge expected");
        assert_eq!(
            second.conflicts,
            vec![SoftConflict {
                region: id,
                latest_ocr: "old".to_owned(),
                reason: ConflictReason::ManuallyEdited
            }]
        );
        let region = project.region(id).expect("region expected");
        assert_eq!(region.ocr_shadow(), Some("old"));
        assert_eq!(region.source_text(), "old");
        assert_eq!(region.translated_text(), "Hello");
    }

    #[test]
    fn test_locked_region_is_skipped() {
        let (mut project, page) = setup();
        let id = add_region(&mut project, page, 0.0, "old");
        project.region_mut(id).expect("region expected").set_locked(true);
        let before = project.clone();
        let mut history = History::default();

        let report = SyncEngine::default()
            .merge(&mut project, &mut history, page, vec![detection(0.0, "ocr")], "CJK")
            .expect("merge expected");

        assert_eq!(report.skipped_locked, vec![id]);
        assert!(report.created.is_empty());
        assert_eq!(project, before);
        assert!(!history.can_undo());
    }

    #[test]
    fn test_stale_regions_are_removed_unless_protected() {
        let (mut project, page) = setup();
        let stale = add_region(&mut project, page, 0.0, "stale");
        let edited = add_region(&mut project, page, 200.0, "edited");
        let locked = add_region(&mut project, page, 400.0, "locked");
        project.region_mut(edited).expect("region expected").set_translated_text("kept");
        project.region_mut(locked).expect("region expected").set_locked(true);
        let mut history = History::default();

        let report = SyncEngine::default()
            .merge(&mut project, &mut history, page, Vec::new(), "CJK")
            .expect("merge expected");

        assert_eq!(report.removed, vec![stale]);
        assert!(project.region(stale).is_none());
        assert!(project.region(edited).is_some());
        assert!(project.region(locked).is_some());
    }

    #[test]
    fn test_new_detections_become_regions() {
        let (mut project, page) = setup();
        let existing = add_region(&mut project, page, 0.0, "old");
        project.region_mut(existing).expect("region expected").set_z_order(4);
        let mut history = History::default();

        let detections = vec![detection(0.0, "old"), detection(300.0, "一"), detection(600.0, "二")];
        let report = SyncEngine::default()
            .merge(&mut project, &mut history, page, detections, "CJK")
            .expect("merge expected");

        assert_eq!(report.created.len(), 2);
        assert!(report.created.iter().all(|id| id.0 > existing.0));
        let regions = project.page(page).expect("page expected").regions();
        assert_eq!(regions.len(), 3);
        assert_eq!(regions[1].source_text(), "一");
        assert_eq!(regions[2].source_text(), "二");
        assert_eq!(regions[1].z_order(), 5);
        assert_eq!(regions[2].z_order(), 6);
        assert_eq!(regions[1].profile(), "CJK");
        assert_eq!(regions[1].style().font.family, "CC Wild Words");
        assert!(!regions[1].is_manually_edited());
    }

    #[test]
    fn test_degenerate_detections_are_rejected() {
        let (mut project, page) = setup();
        let mut history = History::default();
        let detections = vec![
            Detection::new(Geometry::rect(0.0, 0.0, 0.0, 10.0), "flat", 0.9),
            detection(0.0, "ok"),
            Detection::new(Geometry::rect(0.0, 0.0, 10.0, 10.0), "nan", f32::NAN),
        ];
        let report = SyncEngine::default()
            .merge(&mut project, &mut history, page, detections, "CJK")
            .expect("merge expected");

        assert_eq!(report.rejected, vec![0, 2]);
        assert_eq!(report.created.len(), 1);
        assert_eq!(project.region_count(), 1);
    }

    #[test]
    fn test_merge_is_one_undo_step() {
        let (mut project, page) = setup();
        add_region(&mut project, page, 0.0, "a");
        add_region(&mut project, page, 200.0, "b");
        let original = project.clone();
        let mut history = History::default();

        let detections = vec![detection(0.0, "A"), detection(500.0, "C")];
        SyncEngine::default()
            .merge(&mut project, &mut history, page, detections, "CJK")
            .expect("merge expected");
        assert_eq!(history.undo_len(), 1);
        assert_eq!(history.undo_label(), Some("OCR merge"));

        history.undo(&mut project).expect("undo expected");
        assert_eq!(project, original);
    }

    #[test]
    fn repeated_merge_records_nothing() {
        let (mut project, page) = setup();
        let mut history = History::default();
        let engine = SyncEngine::default();
        let detections = vec![detection(0.0, "same")];

        engine
            .merge(&mut project, &mut history, page, detections.clone(), "CJK")
            .expect("merge expected");
        let report = engine
            .merge(&mut project, &mut history, page, detections, "CJK")
            .expect("merge expected");

        assert!(report.is_unchanged());
        assert_eq!(history.undo_len(), 1);
    }

    #[test]
    fn test_ties_go_to_lower_region_id() {
        let (mut project, page) = setup();
        let first = add_region(&mut project, page, 0.0, "first");
        let second = add_region(&mut project, page, 0.0, "second");
        let mut history = History::default();

        let report = SyncEngine::default()
            .merge(&mut project, &mut history, page, vec![detection(0.0, "ocr")], "CJK")
            .expect("merge expected");

        assert_eq!(report.updated, vec![first]);
        assert_eq!(report.removed, vec![second]);
    }

    #[test]
    fn test_threshold_controls_matching() {
        let (mut project, page) = setup();
        let id = add_region(&mut project, page, 0.0, "old");
        let mut history = History::default();

        // IoU of a 60px shift on a 100px box is 40/160
        let strict = SyncEngine::new(MergeConfig { iou_threshold: 0.5, ..MergeConfig::default() });
        let mut preview = project.clone();
        let report = strict
            .merge(&mut preview, &mut History::default(), page, vec![detection(60.0, "x")], "CJK")
            .expect("merge expected");
        assert!(report.updated.is_empty());
        assert_eq!(report.removed, vec![id]);

        let loose = SyncEngine::new(MergeConfig { iou_threshold: 0.2, ..MergeConfig::default() });
        let report = loose
            .merge(&mut project, &mut history, page, vec![detection(60.0, "x")], "CJK")
            .expect("merge expected");
        assert_eq!(report.updated, vec![id]);
    }

    #[test]
    fn test_region_changed_during_ocr_is_protected() {
        let (mut project, page) = setup();
        let id = add_region(&mut project, page, 0.0, "old");
        let baseline: HashMap<RegionId, u64> = project
            .page(page)
            .expect("page expected")
            .regions()
            .iter()
            .map(|region| (region.id(), region.version()))
            .collect();
        let mut history = History::default();
        let command = Command::edit_region(&project, id, RegionEdit::Hidden(true))
            .expect("edit expected");
        history.execute(&mut project, command).expect("execute expected");

        let report = SyncEngine::default()
            .merge_since(
                &mut project,
                &mut history,
                page,
                vec![detection(0.0, "ocr")],
                "CJK",
                Some(&baseline),
            )
            .expect("merge expected");

        assert_eq!(report.conflicts[0].reason, ConflictReason::ChangedDuringOcr);
        assert_eq!(project.region(id).map(TextRegion::source_text), Some("old"));
    }

    #[test]
    fn merge_never_touches_translation_or_override() {
        let (mut project, page) = setup();
        let id = add_region(&mut project, page, 0.0, "old");
        {
            let region = project.region_mut(id).expect("region expected");
            region.set_translated_text("translated");
            region.set_display_override(Some("OVERRIDE".to_owned()));
            region.clear_manual_edit();
        }
        let mut history = History::default();

        SyncEngine::default()
            .merge(&mut project, &mut history, page, vec![detection(0.0, "new")], "CJK")
            .expect("merge expected");

        let region = project.region(id).expect("region expected");
        assert_eq!(region.source_text(), "new");
        assert_eq!(region.translated_text(), "translated");
        assert_eq!(region.display_override(), Some("OVERRIDE"));
    }

    #[test]
    fn unknown_page_is_an_error() {
        let (mut project, _) = setup();
        let result = SyncEngine::default().merge(
            &mut project,
            &mut History::default(),
            PageId(99),
            Vec::new(),
            "CJK",
        );
        assert!(matches!(result, Err(SyncError::Model(ModelError::PageNotFound(PageId(99))))));
    }
}
