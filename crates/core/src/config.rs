//! Engine configuration
//!
//! Tunable policy for OCR merging, undo history and OCR filtering. The
//! storage crate persists it as JSON; every field has a default so older
//! config files keep loading.

use crate::ocr::OcrConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// OCR merge policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Minimum intersection-over-union for a detection to match a region
    pub iou_threshold: f32,

    /// Treat a region whose version changed while OCR was running like a
    /// manually edited one
    pub protect_changed_regions: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self { iou_threshold: 0.5, protect_changed_regions: true }
    }
}

/// Undo history policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Window in which consecutive edits to the same field collapse into one
    /// undo step
    pub merge_window_ms: u64,

    /// Maximum number of undo steps kept
    pub max_depth: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { merge_window_ms: 1000, max_depth: 500 }
    }
}

impl HistoryConfig {
    pub fn merge_window(&self) -> Duration {
        Duration::from_millis(self.merge_window_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub merge: MergeConfig,
    pub history: HistoryConfig,
    pub ocr: OcrConfig,
    /// Profile activated when a session opens. Falls back to the project's
    /// default profile when unset or unknown.
    pub default_profile: Option<String>,
}

impl EngineConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the IoU threshold used to match detections to regions
    pub fn with_iou_threshold(mut self, threshold: f32) -> Self {
        self.merge.iou_threshold = threshold;
        self
    }

    /// Set the undo merge window
    pub fn with_merge_window(mut self, window: Duration) -> Self {
        self.history.merge_window_ms = window.as_millis() as u64;
        self
    }

    /// Set the maximum undo depth
    pub fn with_max_history_depth(mut self, depth: usize) -> Self {
        self.history.max_depth = depth;
        self
    }

    pub fn with_ocr(mut self, ocr: OcrConfig) -> Self {
        self.ocr = ocr;
        self
    }

    pub fn with_default_profile(mut self, profile: impl Into<String>) -> Self {
        self.default_profile = Some(profile.into());
        self
    }
}
