use crate::{Geometry, InvalidRegionReason, ModelError, RegionId, TextStyle};
use serde::{Deserialize, Serialize};

/// Persisted fields of a region, used in change notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionField {
    Geometry,
    ZOrder,
    SourceText,
    OcrShadow,
    TranslatedText,
    DisplayOverride,
    Style,
    Profile,
    Confidence,
    ManuallyEdited,
    Hidden,
    Locked,
}

/// Searchable and exportable text fields of a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextField {
    Source,
    Translation,
    Override,
}

impl TextField {
    pub const ALL: [TextField; 3] = [TextField::Source, TextField::Translation, TextField::Override];

    pub fn region_field(self) -> RegionField {
        match self {
            TextField::Source => RegionField::SourceText,
            TextField::Translation => RegionField::TranslatedText,
            TextField::Override => RegionField::DisplayOverride,
        }
    }
}

/// Every field of a [`TextRegion`], for rebuilding a region from persisted state.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionParts {
    pub id: RegionId,
    pub geometry: Geometry,
    pub z_order: i32,
    pub source_text: String,
    pub ocr_shadow: Option<String>,
    pub translated_text: String,
    pub display_override: Option<String>,
    pub style: TextStyle,
    pub profile: String,
    pub confidence: f32,
    pub manually_edited: bool,
    pub hidden: bool,
    pub locked: bool,
    pub version: u64,
    pub extensions: Vec<String>,
}

/// One OCR/translation text area on a page.
///
/// Fields are only reachable through setters so that every change bumps
/// [`TextRegion::version`], and user-facing edits raise the manual-edit flag.
/// A setter called with the current value is a no-op and returns `false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRegion {
    id: RegionId,
    geometry: Geometry,
    z_order: i32,
    source_text: String,
    ocr_shadow: Option<String>,
    translated_text: String,
    display_override: Option<String>,
    style: TextStyle,
    profile: String,
    confidence: f32,
    manually_edited: bool,
    hidden: bool,
    locked: bool,
    version: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    extensions: Vec<String>,
}

impl TextRegion {
    pub fn new(
        id: RegionId,
        geometry: Geometry,
        source_text: impl Into<String>,
    ) -> Result<Self, ModelError> {
        geometry.validate().map_err(|reason| ModelError::InvalidRegion { id, reason })?;
        Ok(Self {
            id,
            geometry,
            z_order: 0,
            source_text: source_text.into(),
            ocr_shadow: None,
            translated_text: String::new(),
            display_override: None,
            style: TextStyle::default(),
            profile: String::new(),
            confidence: 1.0,
            manually_edited: false,
            hidden: false,
            locked: false,
            version: 0,
            extensions: Vec::new(),
        })
    }

    pub fn from_parts(parts: RegionParts) -> Result<Self, ModelError> {
        let id = parts.id;
        parts.geometry.validate().map_err(|reason| ModelError::InvalidRegion { id, reason })?;
        validate_confidence(id, parts.confidence)?;
        Ok(Self {
            id,
            geometry: parts.geometry,
            z_order: parts.z_order,
            source_text: parts.source_text,
            ocr_shadow: parts.ocr_shadow,
            translated_text: parts.translated_text,
            display_override: parts.display_override,
            style: parts.style,
            profile: parts.profile,
            confidence: parts.confidence,
            manually_edited: parts.manually_edited,
            hidden: parts.hidden,
            locked: parts.locked,
            version: parts.version,
            extensions: parts.extensions,
        })
    }

    pub fn into_parts(self) -> RegionParts {
        RegionParts {
            id: self.id,
            geometry: self.geometry,
            z_order: self.z_order,
            source_text: self.source_text,
            ocr_shadow: self.ocr_shadow,
            translated_text: self.translated_text,
            display_override: self.display_override,
            style: self.style,
            profile: self.profile,
            confidence: self.confidence,
            manually_edited: self.manually_edited,
            hidden: self.hidden,
            locked: self.locked,
            version: self.version,
            extensions: self.extensions,
        }
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = profile.into();
        self
    }

    pub fn with_z_order(mut self, z_order: i32) -> Self {
        self.z_order = z_order;
        self
    }

    pub fn with_style(mut self, style: TextStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Result<Self, ModelError> {
        validate_confidence(self.id, confidence)?;
        self.confidence = confidence;
        Ok(self)
    }

    pub fn id(&self) -> RegionId {
        self.id
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn z_order(&self) -> i32 {
        self.z_order
    }

    pub fn source_text(&self) -> &str {
        &self.source_text
    }

    /// Latest OCR text received while the region was manually edited.
    pub fn ocr_shadow(&self) -> Option<&str> {
        self.ocr_shadow.as_deref()
    }

    pub fn translated_text(&self) -> &str {
        &self.translated_text
    }

    pub fn display_override(&self) -> Option<&str> {
        self.display_override.as_deref()
    }

    pub fn style(&self) -> &TextStyle {
        &self.style
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn is_manually_edited(&self) -> bool {
        self.manually_edited
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn text(&self, field: TextField) -> Option<&str> {
        match field {
            TextField::Source => Some(&self.source_text),
            TextField::Translation => Some(&self.translated_text),
            TextField::Override => self.display_override.as_deref(),
        }
    }

    /// Text shown on the page: the override, then the translation, then the source.
    pub fn display_text(&self) -> &str {
        if let Some(text) = self.display_override.as_deref() {
            return text;
        }
        if !self.translated_text.is_empty() {
            return &self.translated_text;
        }
        &self.source_text
    }

    pub fn set_source_text(&mut self, text: impl Into<String>) -> bool {
        let text = text.into();
        if self.source_text == text {
            return false;
        }
        self.source_text = text;
        self.touch(true);
        true
    }

    pub fn set_translated_text(&mut self, text: impl Into<String>) -> bool {
        let text = text.into();
        if self.translated_text == text {
            return false;
        }
        self.translated_text = text;
        self.touch(true);
        true
    }

    pub fn set_display_override(&mut self, text: Option<String>) -> bool {
        if self.display_override == text {
            return false;
        }
        self.display_override = text;
        self.touch(true);
        true
    }

    /// Writes a text field. Clearing the override is expressed with `None`;
    /// the source and translation fields treat `None` as the empty string.
    pub fn set_text(&mut self, field: TextField, text: Option<String>) -> bool {
        match field {
            TextField::Source => self.set_source_text(text.unwrap_or_default()),
            TextField::Translation => self.set_translated_text(text.unwrap_or_default()),
            TextField::Override => self.set_display_override(text),
        }
    }

    pub fn set_geometry(&mut self, geometry: Geometry) -> Result<bool, ModelError> {
        geometry.validate().map_err(|reason| ModelError::InvalidRegion { id: self.id, reason })?;
        if self.geometry == geometry {
            return Ok(false);
        }
        self.geometry = geometry;
        self.touch(true);
        Ok(true)
    }

    pub fn set_z_order(&mut self, z_order: i32) -> bool {
        if self.z_order == z_order {
            return false;
        }
        self.z_order = z_order;
        self.touch(true);
        true
    }

    pub fn set_style(&mut self, style: TextStyle) -> bool {
        if self.style == style {
            return false;
        }
        self.style = style;
        self.touch(true);
        true
    }

    pub fn set_profile(&mut self, profile: impl Into<String>) -> bool {
        let profile = profile.into();
        if self.profile == profile {
            return false;
        }
        self.profile = profile;
        self.touch(false);
        true
    }

    pub fn set_hidden(&mut self, hidden: bool) -> bool {
        if self.hidden == hidden {
            return false;
        }
        self.hidden = hidden;
        self.touch(false);
        true
    }

    pub fn set_locked(&mut self, locked: bool) -> bool {
        if self.locked == locked {
            return false;
        }
        self.locked = locked;
        self.touch(false);
        true
    }

    pub fn set_ocr_shadow(&mut self, text: Option<String>) -> bool {
        if self.ocr_shadow == text {
            return false;
        }
        self.ocr_shadow = text;
        self.touch(false);
        true
    }

    /// Replaces the source text with the pending OCR shadow, if any.
    pub fn accept_latest_ocr(&mut self) -> bool {
        let Some(latest) = self.ocr_shadow.take() else {
            return false;
        };
        self.source_text = latest;
        self.touch(true);
        true
    }

    /// Hands the region back to automated OCR updates.
    pub fn clear_manual_edit(&mut self) -> bool {
        if !self.manually_edited {
            return false;
        }
        self.manually_edited = false;
        self.version += 1;
        true
    }

    /// Overwrites OCR-owned fields without marking the region as edited.
    pub fn apply_ocr(
        &mut self,
        text: impl Into<String>,
        geometry: Geometry,
        confidence: f32,
    ) -> Result<bool, ModelError> {
        geometry.validate().map_err(|reason| ModelError::InvalidRegion { id: self.id, reason })?;
        validate_confidence(self.id, confidence)?;
        let text = text.into();
        if self.source_text == text
            && self.geometry == geometry
            && self.confidence == confidence
            && self.ocr_shadow.is_none()
        {
            return Ok(false);
        }
        self.source_text = text;
        self.geometry = geometry;
        self.confidence = confidence;
        self.ocr_shadow = None;
        self.touch(false);
        Ok(true)
    }

    pub fn changed_fields(&self, other: &TextRegion) -> Vec<RegionField> {
        let mut fields = Vec::new();
        let mut check = |differs: bool, field: RegionField| {
            if differs {
                fields.push(field);
            }
        };
        check(self.geometry != other.geometry, RegionField::Geometry);
        check(self.z_order != other.z_order, RegionField::ZOrder);
        check(self.source_text != other.source_text, RegionField::SourceText);
        check(self.ocr_shadow != other.ocr_shadow, RegionField::OcrShadow);
        check(self.translated_text != other.translated_text, RegionField::TranslatedText);
        check(self.display_override != other.display_override, RegionField::DisplayOverride);
        check(self.style != other.style, RegionField::Style);
        check(self.profile != other.profile, RegionField::Profile);
        check(self.confidence != other.confidence, RegionField::Confidence);
        check(self.manually_edited != other.manually_edited, RegionField::ManuallyEdited);
        check(self.hidden != other.hidden, RegionField::Hidden);
        check(self.locked != other.locked, RegionField::Locked);
        fields
    }

    fn touch(&mut self, user_facing: bool) {
        self.version += 1;
        if user_facing {
            self.manually_edited = true;
        }
    }
}

fn validate_confidence(id: RegionId, confidence: f32) -> Result<(), ModelError> {
    if confidence.is_finite() && (0.0..=1.0).contains(&confidence) {
        Ok(())
    } else {
        Err(ModelError::InvalidRegion { id, reason: InvalidRegionReason::InvalidConfidence })
    }
}
