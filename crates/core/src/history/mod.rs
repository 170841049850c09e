//! Undo/redo history
//!
//! Every mutation of a [`Project`] goes through [`History::execute`] as a
//! [`Command`]. The history keeps a bounded undo stack and a redo stack that
//! is cleared by any new command. Consecutive edits of the same region field
//! made within the configured window can collapse into a single undo step.

mod command;

pub use command::{Change, Command, RegionEdit};

use crate::config::HistoryConfig;
use doc_model::{ModelError, Project};
use std::collections::VecDeque;
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    #[error("nothing to undo or redo")]
    EmptyHistory,

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("{0} no longer matches the state the command was recorded against")]
    StaleCommand(String),

    #[error("cannot combine regions: {0}")]
    InvalidCombine(&'static str),

    #[error("cannot rearrange pages: {0}")]
    InvalidPageLayout(&'static str),
}

#[derive(Debug)]
struct Entry {
    command: Command,
    /// Time of the last edit folded into this entry
    at: Instant,
}

/// Undo and redo stacks for one session
#[derive(Debug)]
pub struct History {
    config: HistoryConfig,
    undo: VecDeque<Entry>,
    redo: Vec<Entry>,
    /// Whether the newest undo entry may still absorb a mergeable edit
    merge_open: bool,
}

impl Default for History {
    fn default() -> Self {
        Self::new(HistoryConfig::default())
    }
}

impl History {
    /// Create an empty history with the given policy
    pub fn new(config: HistoryConfig) -> Self {
        Self { config, undo: VecDeque::new(), redo: Vec::new(), merge_open: false }
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    /// Apply a command and record it as its own undo step.
    ///
    /// A command that would change nothing is not recorded and leaves the
    /// redo stack alone.
    pub fn execute(
        &mut self,
        project: &mut Project,
        command: Command,
    ) -> Result<Vec<Change>, HistoryError> {
        if command.is_noop() {
            return Ok(Vec::new());
        }
        let changes = command.apply(project)?;
        tracing::debug!(label = command.label(), changes = changes.len(), "executed command");
        self.push(command, Instant::now(), false);
        Ok(changes)
    }

    /// Apply a command, folding it into the previous undo step when both edit
    /// the same field of the same region within the merge window.
    pub fn execute_mergeable(
        &mut self,
        project: &mut Project,
        command: Command,
    ) -> Result<Vec<Change>, HistoryError> {
        self.execute_mergeable_at(project, command, Instant::now())
    }

    /// [`History::execute_mergeable`] with an explicit clock reading.
    pub fn execute_mergeable_at(
        &mut self,
        project: &mut Project,
        command: Command,
        now: Instant,
    ) -> Result<Vec<Change>, HistoryError> {
        if command.is_noop() {
            return Ok(Vec::new());
        }
        let changes = command.apply(project)?;

        let window = self.config.merge_window();
        let key = command.merge_key();
        if let Some(last) = self.undo.back_mut() {
            let mergeable = self.merge_open
                && key.is_some()
                && last.command.merge_key() == key
                && now.saturating_duration_since(last.at) <= window;
            if mergeable {
                last.command.absorb(command);
                last.at = now;
                self.redo.clear();
                tracing::debug!(changes = changes.len(), "merged edit into previous undo step");
                return Ok(changes);
            }
        }

        tracing::debug!(label = command.label(), changes = changes.len(), "executed command");
        self.push(command, now, key.is_some());
        Ok(changes)
    }

    /// Revert the newest undo step.
    pub fn undo(&mut self, project: &mut Project) -> Result<Vec<Change>, HistoryError> {
        let entry = self.undo.pop_back().ok_or(HistoryError::EmptyHistory)?;
        self.merge_open = false;
        match entry.command.revert(project) {
            Ok(changes) => {
                tracing::debug!(label = entry.command.label(), "undo");
                self.redo.push(entry);
                Ok(changes)
            }
            Err(error) => {
                self.undo.push_back(entry);
                Err(error)
            }
        }
    }

    /// Re-apply the newest undone step.
    pub fn redo(&mut self, project: &mut Project) -> Result<Vec<Change>, HistoryError> {
        let entry = self.redo.pop().ok_or(HistoryError::EmptyHistory)?;
        self.merge_open = false;
        match entry.command.apply(project) {
            Ok(changes) => {
                tracing::debug!(label = entry.command.label(), "redo");
                self.undo.push_back(entry);
                Ok(changes)
            }
            Err(error) => {
                self.redo.push(entry);
                Err(error)
            }
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    /// Label of the step [`History::undo`] would revert
    pub fn undo_label(&self) -> Option<&str> {
        self.undo.back().map(|entry| entry.command.label())
    }

    /// Label of the step [`History::redo`] would re-apply
    pub fn redo_label(&self) -> Option<&str> {
        self.redo.last().map(|entry| entry.command.label())
    }

    /// Forget every recorded step
    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
        self.merge_open = false;
    }

    fn push(&mut self, command: Command, at: Instant, mergeable: bool) {
        self.undo.push_back(Entry { command, at });
        self.redo.clear();
        self.merge_open = mergeable;
        while self.undo.len() > self.config.max_depth {
            self.undo.pop_front();
        }
    }
}
