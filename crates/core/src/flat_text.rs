//! Flat text import and export
//!
//! Exports region texts as CSV for translators working outside the editor
//! and reads translated sheets back.
//!
//! CSV columns:
//! - page: Page identifier
//! - order: 1-based position of the region on its page
//! - region_id: Region identifier; may be left empty in an imported sheet
//! - source: Source (OCR) text
//! - translation: Translated text
//!
//! Rows with a `region_id` are matched by identifier. Rows without one are
//! matched by position against the regions no identified row claimed, in
//! page order and then reading order.

use crate::history::{Change, Command, History, HistoryError};
use doc_model::{PageId, Project, RegionId, TextRegion};
use serde::Serialize;
use std::collections::HashSet;
use std::io::{Read, Write};

pub const HEADER: [&str; 5] = ["page", "order", "region_id", "source", "translation"];

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV serialization error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),

    #[error("sheet has no `{0}` column")]
    MissingColumn(&'static str),

    #[error("line {line}: `{value}` is not a region id")]
    InvalidRegionId { line: u64, value: String },

    #[error("region {0} does not exist")]
    UnknownRegion(RegionId),

    #[error("region {0} appears on more than one row")]
    DuplicateRegion(RegionId),

    #[error("{found} rows without region id cannot be matched to {expected} remaining regions")]
    AmbiguousImportMatch { expected: usize, found: usize },

    #[error(transparent)]
    History(#[from] HistoryError),
}

/// Configuration for flat text export and import
#[derive(Debug, Clone)]
pub struct FlatExportConfig {
    /// CSV delimiter character
    pub delimiter: u8,

    /// Include hidden regions
    pub include_hidden: bool,

    /// Include locked regions
    pub include_locked: bool,

    /// Only these pages (None = all pages)
    pub page_filter: Option<Vec<PageId>>,
}

impl Default for FlatExportConfig {
    fn default() -> Self {
        Self { delimiter: b',', include_hidden: false, include_locked: true, page_filter: None }
    }
}

impl FlatExportConfig {
    fn includes(&self, page: PageId, region: &TextRegion) -> bool {
        if !self.include_hidden && region.is_hidden() {
            return false;
        }
        if !self.include_locked && region.is_locked() {
            return false;
        }
        match &self.page_filter {
            Some(pages) => pages.contains(&page),
            None => true,
        }
    }

    /// Regions covered by this configuration in page order, then reading order
    fn regions<'a>(&self, project: &'a Project) -> Vec<(PageId, usize, &'a TextRegion)> {
        let mut regions = Vec::new();
        for page in project.pages() {
            for (index, region) in page.regions().iter().enumerate() {
                if self.includes(page.id(), region) {
                    regions.push((page.id(), index + 1, region));
                }
            }
        }
        regions
    }
}

/// Outcome of an import
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportReport {
    /// Regions whose translation changed
    pub updated: Vec<RegionId>,
    /// Matched rows whose translation was empty or already current
    pub unchanged: usize,
    pub changes: Vec<Change>,
}

/// Write the flat text sheet. Returns the number of rows written.
pub fn export_text<W: Write>(
    writer: W,
    project: &Project,
    config: &FlatExportConfig,
) -> Result<usize, ExportError> {
    let mut csv_writer = csv::WriterBuilder::new()
        .delimiter(config.delimiter)
        .from_writer(writer);
    csv_writer.write_record(HEADER)?;

    let regions = config.regions(project);
    for (page, order, region) in &regions {
        csv_writer.write_record([
            page.to_string().as_str(),
            order.to_string().as_str(),
            region.id().to_string().as_str(),
            region.source_text(),
            region.translated_text(),
        ])?;
    }
    csv_writer.flush()?;
    Ok(regions.len())
}

struct Row {
    region: Option<RegionId>,
    translation: String,
}

/// Read a translated sheet and apply every translation as one undo step.
///
/// Nothing is applied when any row fails to match. Empty translation cells
/// leave their region untouched.
pub fn import_text<R: Read>(
    reader: R,
    project: &mut Project,
    history: &mut History,
    config: &FlatExportConfig,
) -> Result<ImportReport, ImportError> {
    let rows = read_rows(reader, config.delimiter)?;

    let mut claimed = HashSet::new();
    let mut assigned = Vec::with_capacity(rows.len());
    let mut positional = Vec::new();
    for row in rows {
        match row.region {
            Some(id) => {
                if project.region(id).is_none() {
                    return Err(ImportError::UnknownRegion(id));
                }
                if !claimed.insert(id) {
                    return Err(ImportError::DuplicateRegion(id));
                }
                assigned.push((id, row.translation));
            }
            None => positional.push(row.translation),
        }
    }

    if !positional.is_empty() {
        let remaining: Vec<RegionId> = config
            .regions(project)
            .into_iter()
            .map(|(_, _, region)| region.id())
            .filter(|id| !claimed.contains(id))
            .collect();
        if remaining.len() != positional.len() {
            return Err(ImportError::AmbiguousImportMatch {
                expected: remaining.len(),
                found: positional.len(),
            });
        }
        assigned.extend(remaining.into_iter().zip(positional));
    }

    let mut report = ImportReport { updated: Vec::new(), unchanged: 0, changes: Vec::new() };
    let mut commands = Vec::new();
    for (id, translation) in assigned {
        let Some(region) = project.region(id) else {
            return Err(ImportError::UnknownRegion(id));
        };
        let mut updated = region.clone();
        if translation.is_empty() || !updated.set_translated_text(translation) {
            report.unchanged += 1;
            continue;
        }
        commands.push(Command::replace_region(project, updated)?);
        report.updated.push(id);
    }

    if !commands.is_empty() {
        report.changes =
            history.execute(project, Command::compound("Import translations", commands))?;
    }
    tracing::info!(
        updated = report.updated.len(),
        unchanged = report.unchanged,
        "imported translations"
    );
    Ok(report)
}

fn read_rows<R: Read>(reader: R, delimiter: u8) -> Result<Vec<Row>, ImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(reader);
    let headers = csv_reader.headers()?.clone();
    let column = |name: &str| headers.iter().position(|header| header.trim() == name);
    let translation = column("translation").ok_or(ImportError::MissingColumn("translation"))?;
    let region_id = column("region_id");

    let mut rows = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        let line = record.position().map_or(0, |position| position.line());
        let region = match region_id.and_then(|index| record.get(index)).map(str::trim) {
            None | Some("") => None,
            Some(value) => Some(RegionId(value.parse().map_err(|_| {
                ImportError::InvalidRegionId { line, value: value.to_owned() }
            })?)),
        };
        rows.push(Row {
            region,
            translation: record.get(translation).unwrap_or_default().to_owned(),
        });
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_model::{Geometry, Page, PageMetadata};

    fn project() -> Project {
        let mut project = Project::new("flat");
        for texts in [vec!["こんにちは", "say \"hi\""], vec!["line one\nline two"]] {
            let page_id = project.allocate_page_id().expect("page id expected");
            let mut page = Page::new(page_id, format!("{page_id}.png"), PageMetadata::new(10, 10));
            for text in texts {
                let region = TextRegion::new(
                    project.allocate_region_id().expect("region id expected"),
                    Geometry::rect(0.0, 0.0, 5.0, 5.0),
                    text,
                )
                .expect("valid region expected");
                page.push_region(region).expect("region insert expected");
            }
            project.push_page(page).expect("page insert expected");
        }
        project
            .region_mut(RegionId(1))
            .expect("region expected")
            .set_translated_text("Hello");
        project
    }

    fn export(project: &Project, config: &FlatExportConfig) -> String {
        let mut output = Vec::new();
        export_text(&mut output, project, config).expect("export expected");
        String::from_utf8(output).expect("utf-8 expected")
    }

    fn import(
        sheet: &str,
        project: &mut Project,
        history: &mut History,
    ) -> Result<ImportReport, ImportError> {
        import_text(sheet.as_bytes(), project, history, &FlatExportConfig::default())
    }

    #[test]
    fn test_export_text() {
        let text = export(&project(), &FlatExportConfig::default());
        insta::assert_snapshot!(text.trim_end(), @r###"
        page,order,region_id,source,translation
        1,1,1,こんにちは,Hello
        1,2,2,"say ""hi""",
        2,1,3,"line one
        line two",
        "###);
    }

    #[test]
    fn test_export_filters() {
        let mut project = project();
        project.region_mut(RegionId(2)).expect("region expected").set_hidden(true);
        project.region_mut(RegionId(3)).expect("region expected").set_locked(true);

        let config = FlatExportConfig { include_locked: false, ..FlatExportConfig::default() };
        let text = export(&project, &config);
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("こんにちは"));

        let config = FlatExportConfig {
            include_hidden: true,
            page_filter: Some(vec![PageId(1)]),
            ..FlatExportConfig::default()
        };
        let text = export(&project, &config);
        assert!(text.contains("say"));
        assert!(!text.contains("line one"));
    }

    #[test]
    fn test_export_with_delimiter() {
        let config = FlatExportConfig { delimiter: b'\t', ..FlatExportConfig::default() };
        let text = export(&project(), &config);
        assert!(text.starts_with("page\torder\tregion_id\tsource\ttranslation\n"));
    }

    #[test]
    fn test_import_round_trip() {
        let mut project = project();
        let mut history = History::default();
        let sheet = "page,order,region_id,source,translation\n\
                     1,1,1,こんにちは,Hi there\n\
                     1,2,2,say,\"Say \"\"hi\"\"\"\n\
                     2,1,3,x,\"Line one\nLine two\"\n";

        let report = import(sheet, &mut project, &mut history).expect("import expected");
        assert_eq!(report.updated, vec![RegionId(1), RegionId(2), RegionId(3)]);
        assert_eq!(project.region(RegionId(2)).map(TextRegion::translated_text), Some("Say \"hi\""));
        assert_eq!(
            project.region(RegionId(3)).map(TextRegion::translated_text),
            Some("Line one\nLine two")
        );
        // source column is informational
        assert_eq!(project.region(RegionId(2)).map(TextRegion::source_text), Some("say \"hi\""));
        assert_eq!(history.undo_len(), 1);
    }

    #[test]
    fn test_import_positional_rows() {
        let mut project = project();
        let mut history = History::default();
        let sheet = "region_id,translation\n2,Two\n,One\n,Three\n";

        let report = import(sheet, &mut project, &mut history).expect("import expected");
        assert_eq!(report.updated, vec![RegionId(2), RegionId(1), RegionId(3)]);
        assert_eq!(project.region(RegionId(1)).map(TextRegion::translated_text), Some("One"));
        assert_eq!(project.region(RegionId(3)).map(TextRegion::translated_text), Some("Three"));
    }

    #[test]
    fn test_import_ambiguity_changes_nothing() {
        let mut project = project();
        let before = project.clone();
        let mut history = History::default();
        let sheet = "translation\nOne\nTwo\n";

        let error = import(sheet, &mut project, &mut history).expect_err("ambiguous import");
        assert!(matches!(error, ImportError::AmbiguousImportMatch { expected: 3, found: 2 }));
        assert_eq!(project, before);
        assert!(!history.can_undo());
    }

    #[test]
    fn test_import_errors() {
        let mut project = project();
        let mut history = History::default();
        let config = FlatExportConfig::default();
        let mut run = |sheet: &str| {
            import_text(sheet.as_bytes(), &mut project, &mut history, &config)
                .expect_err("import should fail")
        };

        assert!(matches!(run("region_id,text\n1,a\n"), ImportError::MissingColumn("translation")));
        assert!(matches!(
            run("region_id,translation\n99,a\n"),
            ImportError::UnknownRegion(RegionId(99))
        ));
        assert!(matches!(
            run("region_id,translation\n1,a\n1,b\n"),
            ImportError::DuplicateRegion(RegionId(1))
        ));
        assert!(matches!(
            run("region_id,translation\nabc,a\n"),
            ImportError::InvalidRegionId { line: 2, .. }
        ));
    }

    #[test]
    fn test_import_marks_regions_edited_and_skips_empty_cells() {
        let mut project = project();
        let mut history = History::default();
        let sheet = "region_id,translation\n1,Hello\n2,\n3,Done\n";

        let report = import(sheet, &mut project, &mut history).expect("import expected");
        assert_eq!(report.updated, vec![RegionId(3)]);
        assert_eq!(report.unchanged, 2);
        assert!(project.region(RegionId(3)).is_some_and(TextRegion::is_manually_edited));
    }
}
