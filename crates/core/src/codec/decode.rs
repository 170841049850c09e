use super::*;
use doc_model::{
    Alignment, Blur, CaseFolding, Color, FontRef, Geometry, Gradient, InvalidRegionReason,
    ModelError, Normalization, Page, PageId, PageMetadata, Point, Profile, Project, ProjectParts,
    ProjectSettings, RegionId, RegionParts, Rotation, ScriptClass, Shadow, Stroke, TextEffect,
    TextRegion, TextStyle,
};
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::str::FromStr;

/// Parse container bytes into a project. Either the whole project is
/// returned or nothing is.
pub fn decode(bytes: &[u8]) -> Result<Project, DecodeError> {
    let text = std::str::from_utf8(bytes).map_err(|error| DecodeError::MalformedTag {
        position: error.valid_up_to(),
        detail: "container is not valid UTF-8".to_owned(),
    })?;
    Parser::new(text).document()
}

struct Child<'a> {
    start: BytesStart<'a>,
    /// `false` for a self-closing tag
    open: bool,
}

struct Parser<'a> {
    reader: Reader<&'a [u8]>,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        let mut reader = Reader::from_str(text);
        reader.trim_text(false);
        Self { reader }
    }

    fn document(&mut self) -> Result<Project, DecodeError> {
        let root = loop {
            match self.next()? {
                Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_) => {}
                Event::Text(text) if is_blank(&text) => {}
                Event::Start(start) if is(&start, PROJECT) => break Child { start, open: true },
                Event::Empty(start) if is(&start, PROJECT) => break Child { start, open: false },
                Event::Eof => return Err(self.malformed("missing <project> element")),
                _ => return Err(self.malformed("expected <project> as the root element")),
            }
        };
        let project = self.project(root)?;

        loop {
            match self.next()? {
                Event::Eof => break,
                Event::Comment(_) | Event::PI(_) => {}
                Event::Text(text) if is_blank(&text) => {}
                _ => return Err(self.malformed("unexpected content after </project>")),
            }
        }
        Ok(project)
    }

    fn project(&mut self, root: Child<'a>) -> Result<Project, DecodeError> {
        let attrs = self.attributes(PROJECT, &root.start)?;
        let format: u32 = attrs.parse_or("format", FORMAT_VERSION)?;
        if format > FORMAT_VERSION {
            tracing::warn!(format, "container written by a newer format; unknown tags are kept");
        }
        let name = attrs.required("name")?.to_owned();
        let next_region_id = attrs.parse_or("next-region", 1)?;
        let next_page_id = attrs.parse_or("next-page", 1)?;

        let mut settings = None;
        let mut profiles = Vec::new();
        let mut pages = Vec::new();
        let mut extensions = Vec::new();
        if root.open {
            while let Some(child) = self.child()? {
                if is(&child.start, SETTINGS) {
                    if settings.is_some() {
                        return Err(self.malformed("duplicate <settings> in <project>"));
                    }
                    settings = Some(self.settings(child)?);
                } else if is(&child.start, PROFILE) {
                    profiles.push(self.profile(child)?);
                } else if is(&child.start, PAGE) {
                    pages.push(self.page(child)?);
                } else {
                    extensions.push(self.capture(child)?);
                }
            }
        }

        Project::from_parts(ProjectParts {
            name,
            settings: settings.unwrap_or_default(),
            profiles,
            pages,
            next_region_id,
            next_page_id,
            extensions,
        })
        .map_err(|error| self.model_error(error))
    }

    fn settings(&mut self, element: Child<'a>) -> Result<ProjectSettings, DecodeError> {
        let attrs = self.attributes(SETTINGS, &element.start)?;
        let defaults = ProjectSettings::default();
        let mut settings = ProjectSettings {
            default_font: defaults.default_font,
            default_profile: attrs.string_or("default-profile", &defaults.default_profile),
            source_locale: attrs.string_or("source-locale", &defaults.source_locale),
            target_locale: attrs.string_or("target-locale", &defaults.target_locale),
            extensions: Vec::new(),
        };
        if element.open {
            while let Some(child) = self.child()? {
                if is(&child.start, FONT) {
                    let attrs = self.attributes(FONT, &child.start)?;
                    settings.default_font = FontRef {
                        family: attrs.required("family")?.to_owned(),
                        style: attrs.string_or("style", "Regular"),
                        bold: attrs.flag("bold")?,
                        italic: attrs.flag("italic")?,
                    };
                    self.leaf(FONT, child.open)?;
                } else {
                    settings.extensions.push(self.capture(child)?);
                }
            }
        }
        Ok(settings)
    }

    fn profile(&mut self, element: Child<'a>) -> Result<Profile, DecodeError> {
        let attrs = self.attributes(PROFILE, &element.start)?;
        let name = attrs.required("name")?;
        let script = attrs.parse_with("script", ScriptClass::parse)?;
        let mut profile = Profile::new(name, script);
        if let Some(case_folding) = attrs.parse_optional_with("case", CaseFolding::parse)? {
            profile.case_folding = case_folding;
        }
        if let Some(normalization) = attrs.parse_optional_with("normalize", Normalization::parse)? {
            profile.normalization = normalization;
        }
        if element.open {
            while let Some(child) = self.child()? {
                profile.extensions.push(self.capture(child)?);
            }
        }
        Ok(profile)
    }

    fn page(&mut self, element: Child<'a>) -> Result<Page, DecodeError> {
        let attrs = self.attributes(PAGE, &element.start)?;
        let id = PageId(attrs.parse("id")?);
        let image = attrs.required("image")?;
        let rotation = attrs.parse_or::<u16>("rotation", 0)?;
        let metadata = PageMetadata {
            width: attrs.parse_or("width", 0)?,
            height: attrs.parse_or("height", 0)?,
            rotation: Rotation::from_degrees(rotation)
                .ok_or_else(|| attrs.invalid("rotation", &rotation.to_string()))?,
        };

        let mut page = Page::new(id, image, metadata);
        if element.open {
            while let Some(child) = self.child()? {
                if is(&child.start, REGION) {
                    let region = self.region(child)?;
                    page.push_region(region).map_err(|error| self.model_error(error))?;
                } else {
                    let raw = self.capture(child)?;
                    page.extensions_mut().push(raw);
                }
            }
        }
        Ok(page)
    }

    fn region(&mut self, element: Child<'a>) -> Result<TextRegion, DecodeError> {
        let attrs = self.attributes(REGION, &element.start)?;
        let id = RegionId(attrs.parse("id")?);

        let mut geometry = None;
        let mut source_text = None;
        let mut ocr_shadow = None;
        let mut translated_text = None;
        let mut display_override = None;
        let mut style = None;
        let mut extensions = Vec::new();

        if element.open {
            while let Some(child) = self.child()? {
                if is(&child.start, RECT) {
                    let attrs = self.attributes(RECT, &child.start)?;
                    let rect = Geometry::rect(
                        attrs.float("x")?,
                        attrs.float("y")?,
                        attrs.float("width")?,
                        attrs.float("height")?,
                    );
                    self.leaf(RECT, child.open)?;
                    self.set_once(&mut geometry, rect, "geometry")?;
                } else if is(&child.start, POLYGON) {
                    let attrs = self.attributes(POLYGON, &child.start)?;
                    let polygon = Geometry::Polygon(attrs.points("points")?);
                    self.leaf(POLYGON, child.open)?;
                    self.set_once(&mut geometry, polygon, "geometry")?;
                } else if is(&child.start, SOURCE) {
                    let text = self.text(child.open)?;
                    self.set_once(&mut source_text, text, SOURCE)?;
                } else if is(&child.start, OCR_LATEST) {
                    let text = self.text(child.open)?;
                    self.set_once(&mut ocr_shadow, text, OCR_LATEST)?;
                } else if is(&child.start, TRANSLATION) {
                    let text = self.text(child.open)?;
                    self.set_once(&mut translated_text, text, TRANSLATION)?;
                } else if is(&child.start, OVERRIDE) {
                    let text = self.text(child.open)?;
                    self.set_once(&mut display_override, text, OVERRIDE)?;
                } else if is(&child.start, STYLE) {
                    let parsed = self.style(child)?;
                    self.set_once(&mut style, parsed, STYLE)?;
                } else {
                    extensions.push(self.capture(child)?);
                }
            }
        }

        let geometry = geometry.ok_or_else(|| DecodeError::MissingRequiredField {
            element: REGION.to_owned(),
            field: "geometry".to_owned(),
        })?;

        TextRegion::from_parts(RegionParts {
            id,
            geometry,
            z_order: attrs.parse_or("z", 0)?,
            source_text: source_text.unwrap_or_default(),
            ocr_shadow,
            translated_text: translated_text.unwrap_or_default(),
            display_override,
            style: style.unwrap_or_default(),
            profile: attrs.string_or("profile", ""),
            confidence: attrs.float_or("confidence", 1.0)?,
            manually_edited: attrs.flag("edited")?,
            hidden: attrs.flag("hidden")?,
            locked: attrs.flag("locked")?,
            version: attrs.parse_or("version", 0)?,
            extensions,
        })
        .map_err(|error| self.model_error(error))
    }

    fn style(&mut self, element: Child<'a>) -> Result<TextStyle, DecodeError> {
        let attrs = self.attributes(STYLE, &element.start)?;
        let defaults = TextStyle::default();
        let mut style = TextStyle {
            font: FontRef {
                family: attrs.string_or("font-family", &defaults.font.family),
                style: attrs.string_or("font-style", &defaults.font.style),
                bold: attrs.flag("bold")?,
                italic: attrs.flag("italic")?,
            },
            size: attrs.float_or("size", defaults.size)?,
            auto_size: attrs.parse_or("auto-size", defaults.auto_size)?,
            color: attrs.color_or("color", defaults.color)?,
            alignment: attrs
                .parse_optional_with("align", Alignment::parse)?
                .unwrap_or(defaults.alignment),
            effects: Vec::new(),
            extensions: Vec::new(),
        };

        if element.open {
            while let Some(child) = self.child()? {
                let effect = if is(&child.start, STROKE) {
                    let attrs = self.attributes(STROKE, &child.start)?;
                    TextEffect::Stroke(Stroke {
                        width: attrs.float("width")?,
                        color: attrs.color("color")?,
                    })
                } else if is(&child.start, SHADOW) {
                    let attrs = self.attributes(SHADOW, &child.start)?;
                    TextEffect::Shadow(Shadow {
                        offset_x: attrs.float("dx")?,
                        offset_y: attrs.float("dy")?,
                        blur_radius: attrs.float_or("blur", 0.0)?,
                        color: attrs.color("color")?,
                    })
                } else if is(&child.start, BLUR) {
                    let attrs = self.attributes(BLUR, &child.start)?;
                    TextEffect::Blur(Blur { radius: attrs.float("radius")? })
                } else if is(&child.start, GRADIENT) {
                    let attrs = self.attributes(GRADIENT, &child.start)?;
                    TextEffect::Gradient(Gradient {
                        start: attrs.color("start")?,
                        end: attrs.color("end")?,
                        angle: attrs.float_or("angle", 0.0)?,
                    })
                } else {
                    style.extensions.push(self.capture(child)?);
                    continue;
                };
                let name = effect.kind();
                self.leaf(name, child.open)?;
                style.effects.push(effect);
            }
        }
        Ok(style)
    }

    /// Next child element of the element being parsed, or `None` at its end tag.
    fn child(&mut self) -> Result<Option<Child<'a>>, DecodeError> {
        loop {
            match self.next()? {
                Event::Start(start) => return Ok(Some(Child { start, open: true })),
                Event::Empty(start) => return Ok(Some(Child { start, open: false })),
                Event::End(_) => return Ok(None),
                Event::Text(text) if is_blank(&text) => {}
                Event::Comment(_) | Event::PI(_) => {}
                Event::Eof => return Err(self.malformed("unexpected end of input")),
                Event::Text(_) | Event::CData(_) => {
                    return Err(self.malformed("unexpected text between elements"));
                }
                Event::Decl(_) | Event::DocType(_) => {
                    return Err(self.malformed("unexpected declaration inside an element"));
                }
            }
        }
    }

    /// Consume the end of an element that must not have children.
    fn leaf(&mut self, name: &str, open: bool) -> Result<(), DecodeError> {
        if open && self.child()?.is_some() {
            return Err(self.malformed(format!("<{name}> must not have children")));
        }
        Ok(())
    }

    /// Collect the character data of a text field up to its end tag.
    fn text(&mut self, open: bool) -> Result<String, DecodeError> {
        let mut text = String::new();
        if !open {
            return Ok(text);
        }
        loop {
            match self.next()? {
                Event::Text(chunk) => {
                    let unescaped = chunk.unescape().map_err(|error| self.malformed(error.to_string()))?;
                    text.push_str(&unescaped);
                }
                Event::CData(chunk) => {
                    let raw = std::str::from_utf8(&chunk)
                        .map_err(|_| self.malformed("CDATA is not valid UTF-8"))?;
                    text.push_str(raw);
                }
                Event::Comment(_) | Event::PI(_) => {}
                Event::End(_) => return Ok(text),
                Event::Eof => return Err(self.malformed("unexpected end of input inside text")),
                _ => return Err(self.malformed("text fields must not contain elements")),
            }
        }
    }

    /// Copy an unknown element, children included, into a raw string.
    fn capture(&mut self, element: Child<'a>) -> Result<String, DecodeError> {
        let mut writer = Writer::new(Vec::new());
        if !element.open {
            self.emit(&mut writer, Event::Empty(element.start))?;
        } else {
            self.emit(&mut writer, Event::Start(element.start))?;
            let mut depth = 1usize;
            while depth > 0 {
                let event = self.next()?;
                match &event {
                    Event::Start(_) => depth += 1,
                    Event::End(_) => depth -= 1,
                    Event::Eof => {
                        return Err(self.malformed("unexpected end of input inside unknown element"));
                    }
                    _ => {}
                }
                self.emit(&mut writer, event)?;
            }
        }
        String::from_utf8(writer.into_inner())
            .map_err(|_| self.malformed("unknown element is not valid UTF-8"))
    }

    fn emit(&self, writer: &mut Writer<Vec<u8>>, event: Event<'a>) -> Result<(), DecodeError> {
        writer.write_event(event).map_err(|error| self.malformed(error.to_string()))
    }

    fn set_once<T>(&self, slot: &mut Option<T>, value: T, name: &str) -> Result<(), DecodeError> {
        if slot.is_some() {
            return Err(self.malformed(format!("duplicate {name} in <region>")));
        }
        *slot = Some(value);
        Ok(())
    }

    fn attributes(&self, element: &'static str, start: &BytesStart<'a>) -> Result<Attrs, DecodeError> {
        let mut values = Vec::new();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(|error| self.malformed(error.to_string()))?;
            let key = std::str::from_utf8(attribute.key.as_ref())
                .map_err(|_| self.malformed(format!("attribute name on <{element}> is not UTF-8")))?
                .to_owned();
            let value = attribute
                .unescape_value()
                .map_err(|error| self.malformed(error.to_string()))?
                .into_owned();
            values.push((key, value));
        }
        Ok(Attrs { element, position: self.reader.buffer_position(), values })
    }

    fn next(&mut self) -> Result<Event<'a>, DecodeError> {
        let event = self.reader.read_event();
        event.map_err(|error| self.malformed(error.to_string()))
    }

    fn malformed(&self, detail: impl Into<String>) -> DecodeError {
        DecodeError::MalformedTag { position: self.reader.buffer_position(), detail: detail.into() }
    }

    fn model_error(&self, error: ModelError) -> DecodeError {
        match error {
            ModelError::InvalidRegion { id, reason: InvalidRegionReason::DuplicateIdentifier } => {
                DecodeError::DuplicateIdentifier { kind: "region", id: id.to_string() }
            }
            ModelError::DuplicatePage(id) => {
                DecodeError::DuplicateIdentifier { kind: "page", id: id.to_string() }
            }
            ModelError::DuplicateProfile(name) => {
                DecodeError::DuplicateIdentifier { kind: "profile", id: name }
            }
            other => self.malformed(other.to_string()),
        }
    }
}

fn is(start: &BytesStart<'_>, name: &str) -> bool {
    start.name().as_ref() == name.as_bytes()
}

fn is_blank(text: &BytesText<'_>) -> bool {
    text.iter().all(u8::is_ascii_whitespace)
}

/// Attributes of one element, already unescaped.
struct Attrs {
    element: &'static str,
    position: usize,
    values: Vec<(String, String)>,
}

impl Attrs {
    fn get(&self, key: &str) -> Option<&str> {
        self.values.iter().find(|(name, _)| name == key).map(|(_, value)| value.as_str())
    }

    fn required(&self, key: &str) -> Result<&str, DecodeError> {
        self.get(key).ok_or_else(|| DecodeError::MissingRequiredField {
            element: self.element.to_owned(),
            field: key.to_owned(),
        })
    }

    fn string_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or(default).to_owned()
    }

    fn parse<T: FromStr>(&self, key: &str) -> Result<T, DecodeError> {
        let raw = self.required(key)?;
        raw.parse().map_err(|_| self.invalid(key, raw))
    }

    fn parse_or<T: FromStr>(&self, key: &str, default: T) -> Result<T, DecodeError> {
        match self.get(key) {
            Some(raw) => raw.parse().map_err(|_| self.invalid(key, raw)),
            None => Ok(default),
        }
    }

    fn parse_with<T>(&self, key: &str, parse: impl Fn(&str) -> Option<T>) -> Result<T, DecodeError> {
        let raw = self.required(key)?;
        parse(raw).ok_or_else(|| self.invalid(key, raw))
    }

    fn parse_optional_with<T>(
        &self,
        key: &str,
        parse: impl Fn(&str) -> Option<T>,
    ) -> Result<Option<T>, DecodeError> {
        match self.get(key) {
            Some(raw) => parse(raw).map(Some).ok_or_else(|| self.invalid(key, raw)),
            None => Ok(None),
        }
    }

    fn flag(&self, key: &str) -> Result<bool, DecodeError> {
        self.parse_or(key, false)
    }

    fn float(&self, key: &str) -> Result<f32, DecodeError> {
        let value: f32 = self.parse(key)?;
        self.check_finite(key, value)
    }

    fn float_or(&self, key: &str, default: f32) -> Result<f32, DecodeError> {
        let value = self.parse_or(key, default)?;
        self.check_finite(key, value)
    }

    fn check_finite(&self, key: &str, value: f32) -> Result<f32, DecodeError> {
        if value.is_finite() {
            Ok(value)
        } else {
            Err(self.invalid(key, &value.to_string()))
        }
    }

    fn color(&self, key: &str) -> Result<Color, DecodeError> {
        self.parse_with(key, Color::from_hex)
    }

    fn color_or(&self, key: &str, default: Color) -> Result<Color, DecodeError> {
        Ok(self.parse_optional_with(key, Color::from_hex)?.unwrap_or(default))
    }

    fn points(&self, key: &str) -> Result<Vec<Point>, DecodeError> {
        let raw = self.required(key)?;
        raw.split_whitespace()
            .map(|pair| {
                let (x, y) = pair.split_once(',').ok_or_else(|| self.invalid(key, raw))?;
                match (x.parse::<f32>(), y.parse::<f32>()) {
                    (Ok(x), Ok(y)) if x.is_finite() && y.is_finite() => Ok(Point::new(x, y)),
                    _ => Err(self.invalid(key, raw)),
                }
            })
            .collect()
    }

    fn invalid(&self, key: &str, raw: &str) -> DecodeError {
        DecodeError::MalformedTag {
            position: self.position,
            detail: format!("attribute `{key}` on <{}> has invalid value `{raw}`", self.element),
        }
    }
}
