//! Find and replace across region texts
//!
//! Matching runs on a comparison form of each text produced by the active
//! profile: width folding for CJK profiles and, unless the query is case
//! sensitive, case folding. Spans are reported in character offsets of the
//! stored text, so a match can be replaced without knowing how it was found.

use crate::history::{Change, Command, History, HistoryError, RegionEdit};
use doc_model::{ModelError, Page, PageId, Profile, Project, RegionId, TextField, TextRegion};
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::ops::Range;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search text is empty")]
    EmptyQuery,

    #[error("invalid regular expression: {0}")]
    InvalidRegex(#[from] regex::Error),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("region {region} no longer contains the matched text")]
    StaleMatch { region: RegionId },

    #[error("matches overlap in region {region}")]
    OverlappingMatch { region: RegionId },

    #[error(transparent)]
    History(#[from] HistoryError),
}

/// What to look for
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchQuery {
    pub text: String,
    pub match_case: bool,
    /// Only report matches with a word boundary on both sides
    pub whole_word: bool,
    /// Treat `text` as a regular expression
    pub regex: bool,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), ..Self::default() }
    }

    pub fn match_case(mut self, match_case: bool) -> Self {
        self.match_case = match_case;
        self
    }

    pub fn whole_word(mut self, whole_word: bool) -> Self {
        self.whole_word = whole_word;
        self
    }

    pub fn regex(mut self, regex: bool) -> Self {
        self.regex = regex;
        self
    }
}

/// Which regions a search visits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProfileScope {
    /// Only regions assigned to the search profile
    #[default]
    Matching,
    All,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchScope {
    /// `None` searches every page
    pub pages: Option<Vec<PageId>>,
    /// Fields searched in each region, in reporting order
    pub fields: Vec<TextField>,
    pub profiles: ProfileScope,
    pub include_hidden: bool,
}

impl Default for SearchScope {
    fn default() -> Self {
        Self {
            pages: None,
            fields: TextField::ALL.to_vec(),
            profiles: ProfileScope::Matching,
            include_hidden: true,
        }
    }
}

impl SearchScope {
    pub fn with_pages(mut self, pages: Vec<PageId>) -> Self {
        self.pages = Some(pages);
        self
    }

    pub fn with_fields(mut self, fields: Vec<TextField>) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_profiles(mut self, profiles: ProfileScope) -> Self {
        self.profiles = profiles;
        self
    }

    pub fn with_hidden(mut self, include_hidden: bool) -> Self {
        self.include_hidden = include_hidden;
        self
    }
}

/// One hit. `span` counts characters of the stored field text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Match {
    pub page: PageId,
    pub region: RegionId,
    pub field: TextField,
    pub span: Range<usize>,
    pub matched: String,
}

/// Search `project` with the rules of `profile`.
///
/// The returned iterator is lazy: regions are scanned as it advances.
pub fn find<'a>(
    project: &'a Project,
    query: &SearchQuery,
    profile: &str,
    scope: SearchScope,
) -> Result<Matches<'a>, SearchError> {
    if query.text.is_empty() {
        return Err(SearchError::EmptyQuery);
    }
    let active = project
        .profile(profile)
        .ok_or_else(|| ModelError::ProfileNotFound(profile.to_owned()))?;

    let mut matchers = HashMap::new();
    for candidate in project.profiles() {
        matchers.insert(candidate.name.clone(), Matcher::new(candidate, query)?);
    }

    let wanted: Option<HashSet<PageId>> =
        scope.pages.as_ref().map(|pages| pages.iter().copied().collect());
    let pages = project
        .pages()
        .iter()
        .filter(|page| wanted.as_ref().map_or(true, |wanted| wanted.contains(&page.id())))
        .collect();

    Ok(Matches {
        project,
        active: active.name.clone(),
        whole_word: query.whole_word,
        matchers,
        scope,
        pages,
        cursor: Cursor::default(),
        pending: VecDeque::new(),
    })
}

#[derive(Debug, Clone)]
struct Matcher {
    profile: Profile,
    regex: Regex,
    fold_case: bool,
}

impl Matcher {
    fn new(profile: &Profile, query: &SearchQuery) -> Result<Self, SearchError> {
        let fold_case = !query.match_case;
        let regex = if query.regex {
            RegexBuilder::new(&query.text).case_insensitive(fold_case).build()?
        } else {
            Regex::new(&regex::escape(&profile.fold(&query.text, fold_case)))?
        };
        Ok(Self { profile: profile.clone(), regex, fold_case })
    }

    /// Character spans of every match in `text`, in order.
    fn spans(&self, text: &str, whole_word: bool) -> Vec<Range<usize>> {
        let original: Vec<char> = text.chars().collect();
        let mut folded = String::with_capacity(text.len());
        // byte offset in `folded` -> index into `original`
        let mut origins: BTreeMap<usize, usize> = BTreeMap::new();
        for (index, &c) in original.iter().enumerate() {
            let start = folded.len();
            self.profile.fold_char(c, self.fold_case, &mut folded);
            origins.entry(start).or_insert(index);
        }
        origins.insert(folded.len(), original.len());

        let mut spans = Vec::new();
        let mut position = 0;
        while position <= folded.len() {
            let Some(found) = self.regex.find_at(&folded, position) else {
                break;
            };
            let next = next_boundary(&folded, found.start());
            let start = origins.get(&found.start()).copied();
            let end = origins.get(&found.end()).copied();
            let (Some(start), Some(end)) = (start, end) else {
                // match starts or ends inside the expansion of one character
                position = next;
                continue;
            };
            if found.is_empty() || start == end {
                position = next;
                continue;
            }
            if whole_word && !self.at_word_boundaries(&original, start..end) {
                position = next;
                continue;
            }
            spans.push(start..end);
            position = found.end();
        }
        spans
    }

    fn at_word_boundaries(&self, text: &[char], span: Range<usize>) -> bool {
        let script = self.profile.script;
        let before = span.start.checked_sub(1).map(|index| text[index]);
        let after = text.get(span.end).copied();
        script.is_boundary(before, text.get(span.start).copied())
            && script.is_boundary(text.get(span.end - 1).copied(), after)
    }
}

fn next_boundary(text: &str, from: usize) -> usize {
    text[from..].chars().next().map_or(text.len() + 1, |c| from + c.len_utf8())
}

#[derive(Debug, Clone, Copy, Default)]
struct Cursor {
    page: usize,
    region: usize,
    field: usize,
}

/// Lazy, restartable iterator over the matches of one search
#[derive(Debug, Clone)]
pub struct Matches<'a> {
    project: &'a Project,
    active: String,
    whole_word: bool,
    matchers: HashMap<String, Matcher>,
    scope: SearchScope,
    pages: Vec<&'a Page>,
    cursor: Cursor,
    pending: VecDeque<Match>,
}

impl<'a> Matches<'a> {
    /// Start over from the first page
    pub fn restart(&mut self) {
        self.cursor = Cursor::default();
        self.pending.clear();
    }

    /// Profile the search runs with
    pub fn profile(&self) -> &str {
        &self.active
    }

    /// Regions without a profile follow the project default.
    fn resolved_profile(&self, region: &'a TextRegion) -> &'a str {
        let project: &'a Project = self.project;
        if region.profile().is_empty() {
            &project.settings().default_profile
        } else {
            region.profile()
        }
    }

    fn visible(&self, region: &'a TextRegion) -> bool {
        if region.is_hidden() && !self.scope.include_hidden {
            return false;
        }
        match self.scope.profiles {
            ProfileScope::All => true,
            ProfileScope::Matching => self.resolved_profile(region) == self.active,
        }
    }

    fn scan(&mut self, page: PageId, region: &'a TextRegion, field: TextField) {
        let Some(text) = region.text(field) else {
            return;
        };
        let matcher = self
            .matchers
            .get(self.resolved_profile(region))
            .or_else(|| self.matchers.get(&self.active));
        let Some(matcher) = matcher else {
            return;
        };
        let spans = matcher.spans(text, self.whole_word);
        for span in spans {
            let matched = text.chars().skip(span.start).take(span.len()).collect();
            self.pending.push_back(Match { page, region: region.id(), field, span, matched });
        }
    }
}

impl Iterator for Matches<'_> {
    type Item = Match;

    fn next(&mut self) -> Option<Match> {
        loop {
            if let Some(found) = self.pending.pop_front() {
                return Some(found);
            }
            let page = *self.pages.get(self.cursor.page)?;
            let Some(region) = page.regions().get(self.cursor.region) else {
                self.cursor = Cursor { page: self.cursor.page + 1, region: 0, field: 0 };
                continue;
            };
            let Some(&field) = self.scope.fields.get(self.cursor.field) else {
                self.cursor.region += 1;
                self.cursor.field = 0;
                continue;
            };
            self.cursor.field += 1;
            if self.visible(region) {
                self.scan(page.id(), region, field);
            }
        }
    }
}

/// Replace one match with `replacement` as a single undo step.
pub fn replace(
    project: &mut Project,
    history: &mut History,
    found: &Match,
    replacement: &str,
) -> Result<Vec<Change>, SearchError> {
    let region = project.region(found.region).ok_or(ModelError::RegionNotFound(found.region))?;
    let text = spliced(region, found.field, &[(found, replacement.to_owned())])?;
    let command = Command::edit_region(project, found.region, text_edit(found.field, text))?;
    Ok(history.execute(project, command)?)
}

/// Replace every match as one undo step. `replacement` computes the new text
/// of each match; matches must not overlap within a field.
pub fn replace_all<I, F>(
    project: &mut Project,
    history: &mut History,
    matches: I,
    mut replacement: F,
) -> Result<Vec<Change>, SearchError>
where
    I: IntoIterator<Item = Match>,
    F: FnMut(&Match) -> String,
{
    let mut grouped: BTreeMap<(RegionId, TextField), Vec<(Match, String)>> = BTreeMap::new();
    for found in matches {
        let new_text = replacement(&found);
        grouped.entry((found.region, found.field)).or_default().push((found, new_text));
    }

    let mut updated: Vec<TextRegion> = Vec::new();
    for ((id, field), group) in grouped {
        let position = match updated.iter().position(|region| region.id() == id) {
            Some(position) => position,
            None => {
                let region = project.region(id).ok_or(ModelError::RegionNotFound(id))?;
                updated.push(region.clone());
                updated.len() - 1
            }
        };
        let region = &mut updated[position];
        let pairs: Vec<(&Match, String)> =
            group.iter().map(|(found, text)| (found, text.clone())).collect();
        let text = spliced(region, field, &pairs)?;
        region.set_text(field, Some(text));
    }

    let mut commands = Vec::with_capacity(updated.len());
    for region in updated {
        commands.push(Command::replace_region(project, region)?);
    }
    let count = commands.len();
    let changes = history.execute(project, Command::compound("Replace all", commands))?;
    tracing::info!(regions = count, "replaced matches");
    Ok(changes)
}

/// The field text with each match span replaced, after checking that every
/// span still holds its matched text.
fn spliced(
    region: &TextRegion,
    field: TextField,
    replacements: &[(&Match, String)],
) -> Result<String, SearchError> {
    let stale = || SearchError::StaleMatch { region: region.id() };
    let text: Vec<char> = region.text(field).ok_or_else(stale)?.chars().collect();

    let mut ordered: Vec<&(&Match, String)> = replacements.iter().collect();
    ordered.sort_by_key(|(found, _)| found.span.start);
    for pair in ordered.windows(2) {
        if pair[0].0.span.end > pair[1].0.span.start {
            return Err(SearchError::OverlappingMatch { region: region.id() });
        }
    }

    let mut result = String::with_capacity(text.len());
    let mut cursor = 0;
    for (found, new_text) in ordered {
        let span = &found.span;
        let current: String = text.get(span.clone()).ok_or_else(stale)?.iter().collect();
        if current != found.matched {
            return Err(stale());
        }
        result.extend(&text[cursor..span.start]);
        result.push_str(new_text);
        cursor = span.end;
    }
    result.extend(&text[cursor..]);
    Ok(result)
}

fn text_edit(field: TextField, text: String) -> RegionEdit {
    match field {
        TextField::Source => RegionEdit::SourceText(text),
        TextField::Translation => RegionEdit::Translation(text),
        TextField::Override => RegionEdit::DisplayOverride(Some(text)),
    }
}
