use serde::{Deserialize, Serialize};

/// Decides what counts as a word for a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptClass {
    /// Words are runs of letters and digits.
    Latin,
    /// Every ideograph and kana is a word of its own.
    Cjk,
    /// Words are runs of syllables and letters; hanja stand alone.
    Hangul,
}

impl ScriptClass {
    pub fn as_str(self) -> &'static str {
        match self {
            ScriptClass::Latin => "latin",
            ScriptClass::Cjk => "cjk",
            ScriptClass::Hangul => "hangul",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "latin" => Some(ScriptClass::Latin),
            "cjk" => Some(ScriptClass::Cjk),
            "hangul" => Some(ScriptClass::Hangul),
            _ => None,
        }
    }

    fn is_word_char(self, c: char) -> bool {
        c.is_alphanumeric() || c == '_'
    }

    fn stands_alone(self, c: char) -> bool {
        match self {
            ScriptClass::Latin => false,
            ScriptClass::Cjk => is_ideograph(c) || is_kana(c),
            ScriptClass::Hangul => is_ideograph(c),
        }
    }

    /// Whether a word boundary sits between `before` and `after`.
    /// `None` stands for the start or end of the text.
    pub fn is_boundary(self, before: Option<char>, after: Option<char>) -> bool {
        let (Some(before), Some(after)) = (before, after) else {
            return true;
        };
        if !self.is_word_char(before) || !self.is_word_char(after) {
            return true;
        }
        self.stands_alone(before) || self.stands_alone(after)
    }
}

fn is_ideograph(c: char) -> bool {
    matches!(
        c,
        '\u{3400}'..='\u{4DBF}'
            | '\u{4E00}'..='\u{9FFF}'
            | '\u{F900}'..='\u{FAFF}'
            | '\u{20000}'..='\u{2FA1F}'
    )
}

fn is_kana(c: char) -> bool {
    matches!(c, '\u{3040}'..='\u{30FF}' | '\u{31F0}'..='\u{31FF}' | '\u{FF66}'..='\u{FF9F}')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseFolding {
    None,
    Unicode,
    /// Unicode folding with the dotted and dotless `i` kept apart.
    Turkic,
}

impl CaseFolding {
    pub fn as_str(self) -> &'static str {
        match self {
            CaseFolding::None => "none",
            CaseFolding::Unicode => "unicode",
            CaseFolding::Turkic => "turkic",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "none" => Some(CaseFolding::None),
            "unicode" => Some(CaseFolding::Unicode),
            "turkic" => Some(CaseFolding::Turkic),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    None,
    /// Full-width ASCII forms and the ideographic space compare equal to ASCII.
    WidthFold,
}

impl Normalization {
    pub fn as_str(self) -> &'static str {
        match self {
            Normalization::None => "none",
            Normalization::WidthFold => "width-fold",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "none" => Some(Normalization::None),
            "width-fold" => Some(Normalization::WidthFold),
            _ => None,
        }
    }
}

/// Named script and locale rules used for matching text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub script: ScriptClass,
    pub case_folding: CaseFolding,
    pub normalization: Normalization,
    /// Unrecognized profile tags, kept verbatim.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extensions: Vec<String>,
}

impl Profile {
    pub fn new(name: impl Into<String>, script: ScriptClass) -> Self {
        let (case_folding, normalization) = match script {
            ScriptClass::Latin | ScriptClass::Hangul => (CaseFolding::Unicode, Normalization::None),
            ScriptClass::Cjk => (CaseFolding::None, Normalization::WidthFold),
        };
        Self { name: name.into(), script, case_folding, normalization, extensions: Vec::new() }
    }

    pub fn latin() -> Self {
        Self::new("Latin", ScriptClass::Latin)
    }

    pub fn cjk() -> Self {
        Self::new("CJK", ScriptClass::Cjk)
    }

    pub fn with_case_folding(mut self, case_folding: CaseFolding) -> Self {
        self.case_folding = case_folding;
        self
    }

    pub fn with_normalization(mut self, normalization: Normalization) -> Self {
        self.normalization = normalization;
        self
    }

    /// Pushes the comparison form of `c` onto `out`. Case folding is skipped
    /// when `fold_case` is false. Returns the number of chars pushed.
    pub fn fold_char(&self, c: char, fold_case: bool, out: &mut String) -> usize {
        let c = match self.normalization {
            Normalization::None => c,
            Normalization::WidthFold => fold_width(c),
        };
        if !fold_case {
            out.push(c);
            return 1;
        }
        match (self.case_folding, c) {
            (CaseFolding::None, _) => {
                out.push(c);
                1
            }
            (CaseFolding::Turkic, 'I') => {
                out.push('ı');
                1
            }
            (CaseFolding::Turkic, 'İ') => {
                out.push('i');
                1
            }
            (CaseFolding::Unicode | CaseFolding::Turkic, _) => {
                let mut pushed = 0;
                for lower in c.to_lowercase() {
                    out.push(lower);
                    pushed += 1;
                }
                pushed
            }
        }
    }

    pub fn fold(&self, text: &str, fold_case: bool) -> String {
        let mut out = String::with_capacity(text.len());
        for c in text.chars() {
            self.fold_char(c, fold_case, &mut out);
        }
        out
    }
}

fn fold_width(c: char) -> char {
    match c {
        '\u{FF01}'..='\u{FF5E}' => char::from_u32(c as u32 - 0xFEE0).unwrap_or(c),
        '\u{3000}' => ' ',
        _ => c,
    }
}
