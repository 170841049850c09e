//! Translation collaborator contract
//!
//! Machine translation is an external service. The engine lists what needs
//! translating, and turns each answer into a history command. A failed
//! answer produces no command.

use crate::history::{Change, Command, History, HistoryError, RegionEdit};
use doc_model::{ModelError, PageId, Project, RegionId};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslationError {
    #[error("translation service unavailable: {0}")]
    Unavailable(String),

    #[error("unsupported target locale: {0}")]
    UnsupportedLocale(String),

    #[error("translation failed: {0}")]
    Failed(String),
}

/// External translation engine
pub trait TranslationCollaborator {
    fn translate(&self, source: &str, target_locale: &str) -> Result<String, TranslationError>;
}

/// One region waiting for a translation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranslationRequest {
    pub region: RegionId,
    pub source_text: String,
}

/// Outcome of [`translate_page`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslationReport {
    pub translated: Vec<RegionId>,
    pub failed: Vec<RegionId>,
    pub changes: Vec<Change>,
}

/// Unlocked regions of `page` with non-empty source text, in reading order
pub fn requests(project: &Project, page: PageId) -> Result<Vec<TranslationRequest>, ModelError> {
    let page = project.page(page).ok_or(ModelError::PageNotFound(page))?;
    Ok(page
        .regions()
        .iter()
        .filter(|region| !region.is_locked() && !region.source_text().trim().is_empty())
        .map(|region| TranslationRequest {
            region: region.id(),
            source_text: region.source_text().to_owned(),
        })
        .collect())
}

/// Record one collaborator answer as an undo step.
///
/// An `Err` answer is logged and changes nothing.
pub fn apply(
    project: &mut Project,
    history: &mut History,
    region: RegionId,
    result: Result<String, TranslationError>,
) -> Result<Vec<Change>, HistoryError> {
    match result {
        Ok(text) => {
            let command = Command::edit_region(project, region, RegionEdit::Translation(text))?;
            history.execute(project, command)
        }
        Err(error) => {
            tracing::warn!(%region, %error, "discarded failed translation");
            Ok(Vec::new())
        }
    }
}

/// Translate every pending region of `page` and record the answers as one
/// undo step.
pub fn translate_page(
    project: &mut Project,
    history: &mut History,
    page: PageId,
    collaborator: &dyn TranslationCollaborator,
    target_locale: &str,
) -> Result<TranslationReport, HistoryError> {
    let mut report =
        TranslationReport { translated: Vec::new(), failed: Vec::new(), changes: Vec::new() };
    let mut commands = Vec::new();
    for request in requests(project, page)? {
        match collaborator.translate(&request.source_text, target_locale) {
            Ok(text) => {
                let edit = RegionEdit::Translation(text);
                commands.push(Command::edit_region(project, request.region, edit)?);
                report.translated.push(request.region);
            }
            Err(error) => {
                tracing::warn!(region = %request.region, %error, "discarded failed translation");
                report.failed.push(request.region);
            }
        }
    }
    if !commands.is_empty() {
        report.changes = history.execute(project, Command::compound("Translate page", commands))?;
    }
    tracing::info!(
        %page,
        translated = report.translated.len(),
        failed = report.failed.len(),
        "translated page"
    );
    Ok(report)
}
