use super::*;
use doc_model::{
    FontRef, Geometry, Page, Profile, Project, ProjectSettings, TextEffect, TextRegion, TextStyle,
};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

type XmlWriter = Writer<Vec<u8>>;

/// Serialize a project into container bytes.
pub fn encode(project: &Project) -> Result<Vec<u8>, EncodeError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let root = BytesStart::new(PROJECT).with_attributes([
        ("format", FORMAT_VERSION.to_string().as_str()),
        ("name", project.name()),
        ("next-region", project.next_region_id().to_string().as_str()),
        ("next-page", project.next_page_id().to_string().as_str()),
    ]);
    writer.write_event(Event::Start(root))?;

    write_settings(&mut writer, project.settings())?;
    for profile in project.profiles() {
        write_profile(&mut writer, profile)?;
    }
    for page in project.pages() {
        write_page(&mut writer, page)?;
    }
    write_extensions(&mut writer, project.extensions(), 1)?;
    writer.write_event(Event::End(BytesEnd::new(PROJECT)))?;

    let mut bytes = writer.into_inner();
    bytes.push(b'\n');
    Ok(bytes)
}

fn write_settings(writer: &mut XmlWriter, settings: &ProjectSettings) -> Result<(), EncodeError> {
    let start = BytesStart::new(SETTINGS).with_attributes([
        ("default-profile", settings.default_profile.as_str()),
        ("source-locale", settings.source_locale.as_str()),
        ("target-locale", settings.target_locale.as_str()),
    ]);
    writer.write_event(Event::Start(start))?;
    writer.write_event(Event::Empty(font_tag(&settings.default_font)))?;
    write_extensions(writer, &settings.extensions, 2)?;
    writer.write_event(Event::End(BytesEnd::new(SETTINGS)))?;
    Ok(())
}

fn font_tag(font: &FontRef) -> BytesStart<'static> {
    BytesStart::new(FONT).with_attributes([
        ("family", font.family.as_str()),
        ("style", font.style.as_str()),
        ("bold", flag(font.bold)),
        ("italic", flag(font.italic)),
    ])
}

fn write_profile(writer: &mut XmlWriter, profile: &Profile) -> Result<(), EncodeError> {
    let start = BytesStart::new(PROFILE).with_attributes([
        ("name", profile.name.as_str()),
        ("script", profile.script.as_str()),
        ("case", profile.case_folding.as_str()),
        ("normalize", profile.normalization.as_str()),
    ]);
    if profile.extensions.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }
    writer.write_event(Event::Start(start))?;
    write_extensions(writer, &profile.extensions, 2)?;
    writer.write_event(Event::End(BytesEnd::new(PROFILE)))?;
    Ok(())
}

fn write_page(writer: &mut XmlWriter, page: &Page) -> Result<(), EncodeError> {
    let metadata = page.metadata();
    let start = BytesStart::new(PAGE).with_attributes([
        ("id", page.id().0.to_string().as_str()),
        ("image", page.image()),
        ("width", metadata.width.to_string().as_str()),
        ("height", metadata.height.to_string().as_str()),
        ("rotation", metadata.rotation.degrees().to_string().as_str()),
    ]);
    if page.regions().is_empty() && page.extensions().is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    for region in page.regions() {
        write_region(writer, region)?;
    }
    write_extensions(writer, page.extensions(), 2)?;
    writer.write_event(Event::End(BytesEnd::new(PAGE)))?;
    Ok(())
}

fn write_region(writer: &mut XmlWriter, region: &TextRegion) -> Result<(), EncodeError> {
    let id = region.id();
    let confidence = finite(region.confidence(), || format!("confidence of region {id}"))?;
    let start = BytesStart::new(REGION).with_attributes([
        ("id", id.0.to_string().as_str()),
        ("z", region.z_order().to_string().as_str()),
        ("profile", region.profile()),
        ("confidence", confidence.as_str()),
        ("edited", flag(region.is_manually_edited())),
        ("hidden", flag(region.is_hidden())),
        ("locked", flag(region.is_locked())),
        ("version", region.version().to_string().as_str()),
    ]);
    writer.write_event(Event::Start(start))?;

    write_geometry(writer, region)?;
    write_text(writer, SOURCE, region.source_text())?;
    if let Some(shadow) = region.ocr_shadow() {
        write_text(writer, OCR_LATEST, shadow)?;
    }
    if !region.translated_text().is_empty() {
        write_text(writer, TRANSLATION, region.translated_text())?;
    }
    if let Some(text) = region.display_override() {
        write_text(writer, OVERRIDE, text)?;
    }
    write_style(writer, region, region.style())?;
    write_extensions(writer, region.extensions(), 3)?;

    writer.write_event(Event::End(BytesEnd::new(REGION)))?;
    Ok(())
}

fn write_geometry(writer: &mut XmlWriter, region: &TextRegion) -> Result<(), EncodeError> {
    let context = || format!("geometry of region {}", region.id());
    let tag = match region.geometry() {
        Geometry::Rect(rect) => BytesStart::new(RECT).with_attributes([
            ("x", finite(rect.x, context)?.as_str()),
            ("y", finite(rect.y, context)?.as_str()),
            ("width", finite(rect.width, context)?.as_str()),
            ("height", finite(rect.height, context)?.as_str()),
        ]),
        Geometry::Polygon(points) => {
            let mut pairs = Vec::with_capacity(points.len());
            for point in points {
                pairs.push(format!("{},{}", finite(point.x, context)?, finite(point.y, context)?));
            }
            BytesStart::new(POLYGON).with_attributes([("points", pairs.join(" ").as_str())])
        }
    };
    writer.write_event(Event::Empty(tag))?;
    Ok(())
}

/// Empty strings become self-closing tags. An indented end tag after an
/// empty start tag would otherwise inject whitespace into the value.
fn write_text(writer: &mut XmlWriter, name: &str, text: &str) -> Result<(), EncodeError> {
    if text.is_empty() {
        writer.write_event(Event::Empty(BytesStart::new(name)))?;
        return Ok(());
    }
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn write_style(
    writer: &mut XmlWriter,
    region: &TextRegion,
    style: &TextStyle,
) -> Result<(), EncodeError> {
    let context = || format!("style of region {}", region.id());
    let start = BytesStart::new(STYLE).with_attributes([
        ("font-family", style.font.family.as_str()),
        ("font-style", style.font.style.as_str()),
        ("bold", flag(style.font.bold)),
        ("italic", flag(style.font.italic)),
        ("size", finite(style.size, context)?.as_str()),
        ("auto-size", flag(style.auto_size)),
        ("color", style.color.to_hex().as_str()),
        ("align", style.alignment.as_str()),
    ]);
    if style.effects.is_empty() && style.extensions.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    for effect in &style.effects {
        let tag = match effect {
            TextEffect::Stroke(stroke) => BytesStart::new(STROKE).with_attributes([
                ("width", finite(stroke.width, context)?.as_str()),
                ("color", stroke.color.to_hex().as_str()),
            ]),
            TextEffect::Shadow(shadow) => BytesStart::new(SHADOW).with_attributes([
                ("dx", finite(shadow.offset_x, context)?.as_str()),
                ("dy", finite(shadow.offset_y, context)?.as_str()),
                ("blur", finite(shadow.blur_radius, context)?.as_str()),
                ("color", shadow.color.to_hex().as_str()),
            ]),
            TextEffect::Blur(blur) => BytesStart::new(BLUR)
                .with_attributes([("radius", finite(blur.radius, context)?.as_str())]),
            TextEffect::Gradient(gradient) => BytesStart::new(GRADIENT).with_attributes([
                ("start", gradient.start.to_hex().as_str()),
                ("end", gradient.end.to_hex().as_str()),
                ("angle", finite(gradient.angle, context)?.as_str()),
            ]),
        };
        writer.write_event(Event::Empty(tag))?;
    }
    write_extensions(writer, &style.extensions, 4)?;
    writer.write_event(Event::End(BytesEnd::new(STYLE)))?;
    Ok(())
}

/// Re-emits preserved elements verbatim, one per line at `depth`.
fn write_extensions(
    writer: &mut XmlWriter,
    extensions: &[String],
    depth: usize,
) -> Result<(), EncodeError> {
    if extensions.is_empty() {
        return Ok(());
    }
    let mut raw = String::new();
    for extension in extensions {
        check_extension(extension)?;
        raw.push('\n');
        raw.push_str(&"  ".repeat(depth));
        raw.push_str(extension);
    }
    raw.push('\n');
    raw.push_str(&"  ".repeat(depth.saturating_sub(1)));
    writer.write_event(Event::Text(BytesText::from_escaped(raw)))?;
    Ok(())
}

/// A preserved extension must be exactly one well-formed element.
fn check_extension(raw: &str) -> Result<(), EncodeError> {
    let invalid = || EncodeError::InvalidExtension { raw: raw.to_owned() };
    let mut reader = Reader::from_str(raw);
    reader.trim_text(false);
    let mut depth = 0usize;
    let mut seen_root = false;
    loop {
        match reader.read_event().map_err(|_| invalid())? {
            Event::Start(_) if depth == 0 && seen_root => return Err(invalid()),
            Event::Start(_) => {
                depth += 1;
                seen_root = true;
            }
            Event::End(_) => depth = depth.checked_sub(1).ok_or_else(invalid)?,
            Event::Empty(_) if depth == 0 => {
                if seen_root {
                    return Err(invalid());
                }
                seen_root = true;
            }
            Event::Eof => break,
            _ if depth == 0 => return Err(invalid()),
            _ => {}
        }
    }
    if depth != 0 || !seen_root || !raw.starts_with('<') || !raw.ends_with('>') {
        return Err(invalid());
    }
    Ok(())
}

fn flag(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

fn finite(value: f32, context: impl FnOnce() -> String) -> Result<String, EncodeError> {
    if value.is_finite() {
        Ok(value.to_string())
    } else {
        Err(EncodeError::NonFiniteValue { context: context() })
    }
}
