//! Editing session
//!
//! A [`Session`] owns one open project together with everything that only
//! makes sense while it is open: undo history, the active profile, pending
//! OCR requests, change subscribers and the unsaved-changes flag. Opening a
//! project creates a session; closing it hands the project back.

use crate::cancel::CancellationRegistry;
use crate::config::EngineConfig;
use crate::flat_text::{self, ExportError, FlatExportConfig, ImportError, ImportReport};
use crate::history::{Change, Command, History, HistoryError};
use crate::ocr::{
    filter_detections, CollaboratorError, Detection, OcrCollaborator, OcrRequest, OcrTicket,
};
use crate::search::{self, Match, Matches, SearchError, SearchQuery, SearchScope};
use crate::sync::{MergeReport, SyncEngine, SyncError};
use crate::translation::{self, TranslationCollaborator, TranslationError, TranslationReport};
use crossbeam_channel::{Receiver, Sender};
use doc_model::{ModelError, PageId, Project, RegionId};
use std::io::{Read, Write};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("OCR failed: {0}")]
    Collaborator(#[from] CollaboratorError),
}

pub type SessionResult<T> = Result<T, SessionError>;

/// One open project
#[derive(Debug)]
pub struct Session {
    project: Project,
    history: History,
    config: EngineConfig,
    sync: SyncEngine,
    active_profile: String,
    /// Bumped on every applied change
    revision: u64,
    saved_revision: u64,
    subscribers: Vec<Sender<Change>>,
    ocr_jobs: CancellationRegistry,
}

impl Session {
    /// Open a session on a project that matches its stored state.
    pub fn new(project: Project, config: EngineConfig) -> Self {
        let active_profile = config
            .default_profile
            .as_deref()
            .filter(|name| project.profile(name).is_some())
            .unwrap_or(&project.settings().default_profile)
            .to_owned();
        tracing::info!(project = project.name(), profile = %active_profile, "opened session");
        Self {
            history: History::new(config.history.clone()),
            sync: SyncEngine::new(config.merge.clone()),
            project,
            config,
            active_profile,
            revision: 0,
            saved_revision: 0,
            subscribers: Vec::new(),
            ocr_jobs: CancellationRegistry::new(),
        }
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn active_profile(&self) -> &str {
        &self.active_profile
    }

    /// Switch the profile used for search and new OCR regions. Regions keep
    /// their own profiles.
    pub fn set_active_profile(&mut self, name: &str) -> SessionResult<()> {
        if self.project.profile(name).is_none() {
            return Err(ModelError::ProfileNotFound(name.to_owned()).into());
        }
        self.active_profile = name.to_owned();
        Ok(())
    }

    /// Receive every change applied from now on
    pub fn subscribe(&mut self) -> Receiver<Change> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        self.subscribers.push(sender);
        receiver
    }

    /// Whether the project changed since it was opened or last saved
    pub fn is_dirty(&self) -> bool {
        self.revision != self.saved_revision
    }

    pub fn mark_saved(&mut self) {
        self.saved_revision = self.revision;
    }

    pub fn execute(&mut self, command: Command) -> SessionResult<Vec<Change>> {
        let changes = self.history.execute(&mut self.project, command)?;
        Ok(self.publish(changes))
    }

    /// Execute an edit that may fold into the previous undo step
    pub fn execute_mergeable(&mut self, command: Command) -> SessionResult<Vec<Change>> {
        let changes = self.history.execute_mergeable(&mut self.project, command)?;
        Ok(self.publish(changes))
    }

    pub fn undo(&mut self) -> SessionResult<Vec<Change>> {
        let changes = self.history.undo(&mut self.project)?;
        Ok(self.publish(changes))
    }

    pub fn redo(&mut self) -> SessionResult<Vec<Change>> {
        let changes = self.history.redo(&mut self.project)?;
        Ok(self.publish(changes))
    }

    /// Search with the active profile
    pub fn find(&self, query: &SearchQuery, scope: SearchScope) -> SessionResult<Matches<'_>> {
        Ok(search::find(&self.project, query, &self.active_profile, scope)?)
    }

    pub fn replace(&mut self, found: &Match, replacement: &str) -> SessionResult<Vec<Change>> {
        let changes = search::replace(&mut self.project, &mut self.history, found, replacement)?;
        Ok(self.publish(changes))
    }

    pub fn replace_all<I, F>(&mut self, matches: I, replacement: F) -> SessionResult<Vec<Change>>
    where
        I: IntoIterator<Item = Match>,
        F: FnMut(&Match) -> String,
    {
        let changes =
            search::replace_all(&mut self.project, &mut self.history, matches, replacement)?;
        Ok(self.publish(changes))
    }

    /// Start an OCR request for `page`. A newer request for the same page
    /// cancels this one.
    pub fn begin_ocr(&mut self, page: PageId) -> SessionResult<OcrTicket> {
        let target = self.project.page(page).ok_or(ModelError::PageNotFound(page))?;
        let baseline =
            target.regions().iter().map(|region| (region.id(), region.version())).collect();
        let token = self.ocr_jobs.register(page);
        tracing::debug!(%page, "started OCR request");
        Ok(OcrTicket { page, token, baseline })
    }

    /// Cancel the in-flight OCR request for `page`, if any
    pub fn cancel_ocr(&mut self, page: PageId) -> bool {
        self.ocr_jobs.cancel(page)
    }

    pub fn pending_ocr(&self) -> usize {
        self.ocr_jobs.in_flight()
    }

    /// Merge the detections of a finished OCR request.
    ///
    /// Returns `Ok(None)` without touching the project when the ticket was
    /// cancelled.
    pub fn complete_ocr(
        &mut self,
        ticket: OcrTicket,
        detections: Vec<Detection>,
    ) -> SessionResult<Option<MergeReport>> {
        self.ocr_jobs.finish(ticket.page, &ticket.token);
        if ticket.is_cancelled() {
            tracing::warn!(page = %ticket.page, "discarded cancelled OCR result");
            return Ok(None);
        }

        let (detections, dropped) = filter_detections(detections, &self.config.ocr);
        if dropped > 0 {
            tracing::debug!(page = %ticket.page, dropped, "dropped low-confidence detections");
        }
        let mut report = self.sync.merge_since(
            &mut self.project,
            &mut self.history,
            ticket.page,
            detections,
            &self.active_profile,
            Some(&ticket.baseline),
        )?;
        report.changes = self.publish(report.changes);
        Ok(Some(report))
    }

    /// Run OCR for `page` on the calling thread and merge the result
    pub fn run_ocr(
        &mut self,
        page: PageId,
        collaborator: &dyn OcrCollaborator,
    ) -> SessionResult<Option<MergeReport>> {
        let ticket = self.begin_ocr(page)?;
        let image = self
            .project
            .page(page)
            .ok_or(ModelError::PageNotFound(page))?
            .image()
            .to_owned();
        let request = OcrRequest { page, image, language: self.config.ocr.language.clone() };

        match collaborator.recognize(&request, ticket.token()) {
            Ok(detections) => self.complete_ocr(ticket, detections),
            Err(CollaboratorError::Cancelled) => {
                self.ocr_jobs.finish(page, ticket.token());
                tracing::warn!(%page, "OCR request cancelled");
                Ok(None)
            }
            Err(error) => {
                self.ocr_jobs.finish(page, ticket.token());
                tracing::warn!(%page, %error, "OCR request failed");
                Err(error.into())
            }
        }
    }

    /// Record a translation collaborator answer for one region
    pub fn apply_translation(
        &mut self,
        region: RegionId,
        result: Result<String, TranslationError>,
    ) -> SessionResult<Vec<Change>> {
        let changes = translation::apply(&mut self.project, &mut self.history, region, result)?;
        Ok(self.publish(changes))
    }

    /// Translate every pending region of `page` into the project's target locale
    pub fn translate_page(
        &mut self,
        page: PageId,
        collaborator: &dyn TranslationCollaborator,
    ) -> SessionResult<TranslationReport> {
        let locale = self.project.settings().target_locale.clone();
        let mut report = translation::translate_page(
            &mut self.project,
            &mut self.history,
            page,
            collaborator,
            &locale,
        )?;
        report.changes = self.publish(report.changes);
        Ok(report)
    }

    pub fn export_text<W: Write>(
        &self,
        writer: W,
        config: &FlatExportConfig,
    ) -> SessionResult<usize> {
        Ok(flat_text::export_text(writer, &self.project, config)?)
    }

    pub fn import_text<R: Read>(
        &mut self,
        reader: R,
        config: &FlatExportConfig,
    ) -> SessionResult<ImportReport> {
        let mut report =
            flat_text::import_text(reader, &mut self.project, &mut self.history, config)?;
        report.changes = self.publish(report.changes);
        Ok(report)
    }

    /// End the session, cancelling pending OCR requests
    pub fn close(mut self) -> Project {
        let cancelled = self.ocr_jobs.cancel_all();
        tracing::info!(project = self.project.name(), cancelled, "closed session");
        self.project
    }

    /// Forward changes to subscribers, dropping the disconnected ones
    fn publish(&mut self, changes: Vec<Change>) -> Vec<Change> {
        if changes.is_empty() {
            return changes;
        }
        self.revision += 1;
        self.subscribers.retain(|subscriber| {
            changes.iter().all(|change| subscriber.send(change.clone()).is_ok())
        });
        changes
    }
}
