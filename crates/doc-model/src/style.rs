use serde::{Deserialize, Serialize};

/// RGBA color, persisted as `#RRGGBBAA`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0, a: 255 };
    pub const WHITE: Color = Color { r: 255, g: 255, b: 255, a: 255 };
    pub const TRANSPARENT: Color = Color { r: 0, g: 0, b: 0, a: 0 };

    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Create an opaque color
    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}{:02X}", self.r, self.g, self.b, self.a)
    }

    /// Parses `#RRGGBB` or `#RRGGBBAA`. Returns `None` for anything else.
    pub fn from_hex(value: &str) -> Option<Self> {
        let digits = value.strip_prefix('#')?;
        if !digits.is_ascii() || !(digits.len() == 6 || digits.len() == 8) {
            return None;
        }
        let channel = |index: usize| u8::from_str_radix(&digits[index..index + 2], 16).ok();
        let a = if digits.len() == 8 { channel(6)? } else { 255 };
        Some(Self { r: channel(0)?, g: channel(2)?, b: channel(4)?, a })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    Left,
    #[default]
    Center,
    Right,
    Justify,
}

impl Alignment {
    pub fn as_str(self) -> &'static str {
        match self {
            Alignment::Left => "left",
            Alignment::Center => "center",
            Alignment::Right => "right",
            Alignment::Justify => "justify",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "left" => Some(Alignment::Left),
            "center" => Some(Alignment::Center),
            "right" => Some(Alignment::Right),
            "justify" => Some(Alignment::Justify),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FontRef {
    pub family: String,
    pub style: String,
    pub bold: bool,
    pub italic: bool,
}

impl Default for FontRef {
    fn default() -> Self {
        Self { family: "Arial".to_owned(), style: "Regular".to_owned(), bold: false, italic: false }
    }
}

impl FontRef {
    pub fn new(family: impl Into<String>) -> Self {
        Self { family: family.into(), ..Self::default() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub width: f32,
    pub color: Color,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Shadow {
    pub offset_x: f32,
    pub offset_y: f32,
    pub blur_radius: f32,
    pub color: Color,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Blur {
    pub radius: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gradient {
    pub start: Color,
    pub end: Color,
    /// Direction in degrees, clockwise from the positive x axis.
    pub angle: f32,
}

/// A text effect applied on top of the glyph fill. Effects render in list order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TextEffect {
    Stroke(Stroke),
    Shadow(Shadow),
    Blur(Blur),
    Gradient(Gradient),
}

impl TextEffect {
    pub fn kind(&self) -> &'static str {
        match self {
            TextEffect::Stroke(_) => "stroke",
            TextEffect::Shadow(_) => "shadow",
            TextEffect::Blur(_) => "blur",
            TextEffect::Gradient(_) => "gradient",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextStyle {
    pub font: FontRef,
    pub size: f32,
    /// Shrink the font until the text fits its region.
    pub auto_size: bool,
    pub color: Color,
    pub alignment: Alignment,
    pub effects: Vec<TextEffect>,
    /// Unrecognized style tags, kept verbatim.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extensions: Vec<String>,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font: FontRef::default(),
            size: 20.0,
            auto_size: true,
            color: Color::BLACK,
            alignment: Alignment::Center,
            effects: Vec::new(),
            extensions: Vec::new(),
        }
    }
}

impl TextStyle {
    pub fn with_font(font: FontRef) -> Self {
        Self { font, ..Self::default() }
    }

    pub fn with_effect(mut self, effect: TextEffect) -> Self {
        self.effects.push(effect);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_colors_round_trip() {
        let color = Color::new(0x12, 0xAB, 0xFF, 0x80);
        assert_eq!(color.to_hex(), "#12ABFF80");
        assert_eq!(Color::from_hex("#12ABFF80"), Some(color));
        assert_eq!(Color::from_hex("#ffffff"), Some(Color::WHITE));
    }

    #[test]
    fn malformed_hex_colors_are_rejected() {
        for value in ["", "#", "FFFFFF", "#FFF", "#GG0000", "#ééé"] {
            assert_eq!(Color::from_hex(value), None, "{value} should not parse");
        }
    }

    #[test]
    fn effects_keep_insertion_order() {
        let style = TextStyle::default()
            .with_effect(TextEffect::Blur(Blur { radius: 2.0 }))
            .with_effect(TextEffect::Stroke(Stroke { width: 3.0, color: Color::WHITE }));
        let kinds: Vec<_> = style.effects.iter().map(TextEffect::kind).collect();
        assert_eq!(kinds, ["blur", "stroke"]);
    }
}
