//! OCR collaborator contract
//!
//! The recognition engine lives outside the document engine. It receives a
//! page image and returns raw detections without identifiers; the session
//! filters them and hands them to the sync engine. The engine never retries
//! a failed call on its own.

use crate::cancel::CancellationToken;
use doc_model::{Geometry, PageId, RegionId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// OCR configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Language hint passed to the recognizer (e.g. "jpn", "kor", "eng")
    pub language: String,

    /// Detections below this confidence are dropped before merging
    pub min_confidence: f32,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self { language: "jpn".to_string(), min_confidence: 0.0 }
    }
}

impl OcrConfig {
    /// Create a new OCR configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the OCR language
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Set the minimum accepted confidence
    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence;
        self
    }
}

/// One text area found by the recognizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub geometry: Geometry,
    pub text: String,
    /// Confidence score (0.0 to 1.0)
    #[serde(default = "full_confidence")]
    pub confidence: f32,
}

fn full_confidence() -> f32 {
    1.0
}

impl Detection {
    pub fn new(geometry: Geometry, text: impl Into<String>, confidence: f32) -> Self {
        Self { geometry, text: text.into(), confidence }
    }

    /// Whether the detection can become a region at all
    pub fn is_valid(&self) -> bool {
        self.geometry.validate().is_ok()
            && self.confidence.is_finite()
            && (0.0..=1.0).contains(&self.confidence)
    }
}

/// What the recognizer gets for one page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrRequest {
    pub page: PageId,
    /// Image path relative to the project container
    pub image: String,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    #[error("request was cancelled")]
    Cancelled,

    #[error("collaborator failed: {0}")]
    Failed(String),
}

/// External OCR engine
///
/// Implementations should poll `cancel` during long work and return
/// [`CollaboratorError::Cancelled`] once it fires.
pub trait OcrCollaborator {
    fn recognize(
        &self,
        request: &OcrRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<Detection>, CollaboratorError>;
}

/// Replays detections recorded earlier, keyed by page image path
#[derive(Debug, Clone, Default)]
pub struct RecordedOcr {
    detections: HashMap<String, Vec<Detection>>,
}

impl RecordedOcr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, image: impl Into<String>, detections: Vec<Detection>) -> Self {
        self.detections.insert(image.into(), detections);
        self
    }
}

impl OcrCollaborator for RecordedOcr {
    fn recognize(
        &self,
        request: &OcrRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<Detection>, CollaboratorError> {
        if cancel.is_cancelled() {
            return Err(CollaboratorError::Cancelled);
        }
        self.detections
            .get(&request.image)
            .cloned()
            .ok_or_else(|| CollaboratorError::Failed(format!("no recording for {}", request.image)))
    }
}

/// Handle for one in-flight OCR request, issued on the editing thread
///
/// Carries the region versions seen when the request started so the merge
/// can tell which regions changed while the recognizer was busy.
#[derive(Debug, Clone)]
pub struct OcrTicket {
    pub(crate) page: PageId,
    pub(crate) token: CancellationToken,
    pub(crate) baseline: HashMap<RegionId, u64>,
}

impl OcrTicket {
    pub fn page(&self) -> PageId {
        self.page
    }

    /// Token to hand to the collaborator
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Drop detections below the configured confidence. Returns the kept
/// detections and the number dropped.
pub fn filter_detections(detections: Vec<Detection>, config: &OcrConfig) -> (Vec<Detection>, usize) {
    let total = detections.len();
    let kept: Vec<_> = detections
        .into_iter()
        .filter(|detection| !(detection.confidence < config.min_confidence))
        .collect();
    let dropped = total - kept.len();
    (kept, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ocr_config_builder() {
        let config = OcrConfig::new().with_language("kor").with_min_confidence(0.4);
        assert_eq!(config.language, "kor");
        assert_eq!(config.min_confidence, 0.4);
    }

    #[test]
    fn detection_validity() {
        assert!(Detection::new(Geometry::rect(0.0, 0.0, 5.0, 5.0), "a", 0.9).is_valid());
        assert!(!Detection::new(Geometry::rect(0.0, 0.0, 0.0, 5.0), "a", 0.9).is_valid());
        assert!(!Detection::new(Geometry::rect(0.0, 0.0, 5.0, 5.0), "a", f32::NAN).is_valid());
    }

    #[test]
    fn detection_json_defaults_confidence() {
        let detection: Detection = serde_json::from_str(
            r#"{"geometry":{"rect":{"x":1,"y":2,"width":3,"height":4}},"text":"hi"}"#,
        )
        .expect("valid detection json");
        assert_eq!(detection.confidence, 1.0);
        assert_eq!(detection.geometry, Geometry::rect(1.0, 2.0, 3.0, 4.0));
    }

    #[test]
    fn low_confidence_detections_are_filtered() {
        let detections = vec![
            Detection::new(Geometry::rect(0.0, 0.0, 5.0, 5.0), "keep", 0.9),
            Detection::new(Geometry::rect(0.0, 0.0, 5.0, 5.0), "drop", 0.2),
        ];
        let (kept, dropped) =
            filter_detections(detections, &OcrConfig::new().with_min_confidence(0.5));
        assert_eq!(dropped, 1);
        assert_eq!(kept[0].text, "keep");
    }

    #[test]
    fn recorded_ocr_honours_cancellation() {
        let ocr = RecordedOcr::new().with_page("001.png", Vec::new());
        let request =
            OcrRequest { page: PageId(1), image: "001.png".to_owned(), language: "jpn".to_owned() };
        let token = CancellationToken::new();
        assert_eq!(ocr.recognize(&request, &token), Ok(Vec::new()));
        token.cancel();
        assert_eq!(ocr.recognize(&request, &token), Err(CollaboratorError::Cancelled));
    }
}
