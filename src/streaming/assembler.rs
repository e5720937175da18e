use std::collections::HashMap;

use serde::Serialize;

pub const GENERAL_SECTION_ID: &str = "general";

lazy_static::lazy_static! {
    /// Display titles for well-known tags
    static ref FRIENDLY_TITLES: HashMap<&'static str, &'static str> = HashMap::from([
        ("guideline", "Guideline"),
        ("drug", "Drug"),
        ("think", "Thinking"),
    ]);
}

/// Kind of a reconstructed section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
    General,
    Tag,
}

/// A named span of reconstructed text
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    /// `general`, or `tag-{ordinal}-{name}` for tag sections
    pub id: String,
    pub kind: SectionKind,
    /// Lower-cased tag name for tag sections
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_name: Option<String>,
    pub title: String,
    pub content: String,
}

impl Section {
    pub fn general() -> Self {
        Self {
            id: GENERAL_SECTION_ID.to_string(),
            kind: SectionKind::General,
            tag_name: None,
            title: "General".to_string(),
            content: String::new(),
        }
    }

    pub fn new_tag(ordinal: usize, name: &str, title: String) -> Self {
        Self {
            id: format!("tag-{}-{}", ordinal, name),
            kind: SectionKind::Tag,
            tag_name: Some(name.to_string()),
            title,
            content: String::new(),
        }
    }

    pub fn is_general(&self) -> bool {
        self.kind == SectionKind::General
    }
}

/// Parser position between two deltas
#[derive(Debug, Clone, PartialEq, Eq)]
enum Mode {
    Outside,
    /// Inside a tag; holds the name exactly as written in the opener and the
    /// index of its section
    Inside { raw_name: String, section: usize },
}

/// Incrementally partitions a text stream into sections delimited by
/// `<name>...</name>` markup.
///
/// Text outside any tag goes to the general section. Tags do not nest: inside
/// an open tag only its own closer is recognized, everything else is content.
/// Unrecognized `<...>` tokens are kept verbatim.
#[derive(Debug)]
pub struct ContentAssembler {
    sections: Vec<Section>,
    /// Suffix of the input not yet safely classifiable
    pending: String,
    mode: Mode,
    tag_count: usize,
    titles: HashMap<String, String>,
}

impl ContentAssembler {
    pub fn new() -> Self {
        Self::with_titles(HashMap::new())
    }

    /// Create an assembler with extra tag titles layered over the built-ins
    pub fn with_titles(titles: HashMap<String, String>) -> Self {
        Self {
            sections: vec![Section::general()],
            pending: String::new(),
            mode: Mode::Outside,
            tag_count: 0,
            titles: titles
                .into_iter()
                .map(|(tag, title)| (tag.to_lowercase(), title))
                .collect(),
        }
    }

    /// Append a delta and return the resulting snapshot.
    ///
    /// Exactly one snapshot is produced per non-empty delta, regardless of how
    /// many tags it contains. Empty deltas return `None`.
    pub fn append(&mut self, delta: &str) -> Option<Vec<Section>> {
        if delta.is_empty() {
            return None;
        }

        self.pending.push_str(delta);
        self.process();
        tracing::trace!(
            pending = self.pending.len(),
            sections = self.sections.len(),
            "Appended delta"
        );
        Some(self.sections())
    }

    /// Flush the retained suffix at end of stream.
    ///
    /// A dangling `<...` outside a tag becomes literal text, a partial closer
    /// inside a tag becomes tag content. An open tag stays open.
    pub fn finish(&mut self) -> Option<Vec<Section>> {
        if self.pending.is_empty() {
            return None;
        }

        let rest = std::mem::take(&mut self.pending);
        tracing::debug!(len = rest.len(), "Flushing unclassified tail");
        self.append_to_target(&rest);
        Some(self.sections())
    }

    fn process(&mut self) {
        let buffer = std::mem::take(&mut self.pending);
        let mut i = 0;

        while i < buffer.len() {
            match self.mode.clone() {
                Mode::Outside => {
                    let Some(lt) = buffer[i..].find('<').map(|p| i + p) else {
                        self.append_to_target(&buffer[i..]);
                        return;
                    };
                    self.append_to_target(&buffer[i..lt]);

                    let Some(gt) = buffer[lt + 1..].find('>').map(|p| lt + 1 + p) else {
                        self.pending = buffer[lt..].to_string();
                        return;
                    };

                    match opening_tag_name(&buffer[lt + 1..gt]) {
                        Some(name) => self.start_tag(name),
                        None => self.append_to_target(&buffer[lt..=gt]),
                    }
                    i = gt + 1;
                }
                Mode::Inside { raw_name, .. } => {
                    let closer = format!("</{}>", raw_name);
                    match buffer[i..].find(&closer) {
                        Some(p) => {
                            self.append_to_target(&buffer[i..i + p]);
                            i += p + closer.len();
                            self.mode = Mode::Outside;
                        }
                        None => {
                            let keep = partial_suffix_len(&buffer[i..], &closer);
                            let split = buffer.len() - keep;
                            self.append_to_target(&buffer[i..split]);
                            self.pending = buffer[split..].to_string();
                            return;
                        }
                    }
                }
            }
        }
    }

    fn start_tag(&mut self, raw_name: &str) {
        let name = raw_name.to_lowercase();
        self.tag_count += 1;
        let section = Section::new_tag(self.tag_count, &name, self.title_for(&name));
        tracing::debug!(id = %section.id, "Opened tag section");

        self.sections.push(section);
        self.mode = Mode::Inside {
            raw_name: raw_name.to_string(),
            section: self.sections.len() - 1,
        };
    }

    fn append_to_target(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let index = match &self.mode {
            Mode::Inside { section, .. } => *section,
            Mode::Outside => 0,
        };
        self.sections[index].content.push_str(text);
    }

    fn title_for(&self, name: &str) -> String {
        if let Some(title) = self.titles.get(name) {
            return title.clone();
        }
        if let Some(title) = FRIENDLY_TITLES.get(name) {
            return title.to_string();
        }
        capitalize(name)
    }

    /// Get all sections (a copy, safe to retain)
    pub fn sections(&self) -> Vec<Section> {
        self.sections.clone()
    }

    /// Get reference to a section by id
    pub fn section(&self, id: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.id == id)
    }

    /// The general section
    pub fn general(&self) -> &Section {
        &self.sections[0]
    }

    /// Lower-cased name of the currently open tag, if any
    pub fn open_tag(&self) -> Option<&str> {
        match &self.mode {
            Mode::Inside { section, .. } => self.sections[*section].tag_name.as_deref(),
            Mode::Outside => None,
        }
    }

    /// Length of the retained, not yet classified suffix
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Reset to a single empty general section
    pub fn reset(&mut self) -> Vec<Section> {
        self.sections = vec![Section::general()];
        self.pending.clear();
        self.mode = Mode::Outside;
        self.tag_count = 0;
        self.sections()
    }
}

impl Default for ContentAssembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Tag name if the trimmed token interior is a valid name
fn opening_tag_name(interior: &str) -> Option<&str> {
    let name = interior.trim();
    is_tag_name(name).then_some(name)
}

/// `[A-Za-z0-9_]+` not starting with a digit
pub fn is_tag_name(name: &str) -> bool {
    let mut bytes = name.bytes();
    match bytes.next() {
        Some(first) if first.is_ascii_alphabetic() || first == b'_' => {
            bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_')
        }
        _ => false,
    }
}

/// Length of the longest proper prefix of `closer` that `text` ends with
fn partial_suffix_len(text: &str, closer: &str) -> usize {
    (1..closer.len())
        .rev()
        .find(|&n| text.ends_with(&closer[..n]))
        .unwrap_or(0)
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
