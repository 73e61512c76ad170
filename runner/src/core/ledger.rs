//! Ledger grammar: tokenize, model, and render the mission document.
//!
//! The ledger is a hand-editable markdown file with Pending / In Progress /
//! Done sections plus an Ideas backlog. Parsing splits the document into
//! `{section, lines}` pairs on level 1-2 headings, then groups each section's
//! lines into [`Block`]s. Every block keeps its source lines verbatim, so
//! `render(parse(doc)) == doc` holds byte-for-byte and a mutation only touches
//! the lines it names.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static PROJECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[project:\s*([^\]\s]+)\s*\]").unwrap());

const PLACEHOLDERS: &[&str] = &[
    "_(empty)_",
    "_(vide)_",
    "(empty)",
    "(vide)",
    "- (empty)",
    "- (vide)",
    "_no missions_",
    "_aucune mission_",
];

const PENDING_NAMES: &[&str] = &["pending", "queue", "en attente", "à faire", "a faire"];
const IN_PROGRESS_NAMES: &[&str] = &["in progress", "en cours"];
const DONE_NAMES: &[&str] = &[
    "done",
    "completed",
    "terminé",
    "termine",
    "terminées",
    "terminees",
];
const IDEAS_NAMES: &[&str] = &["ideas", "backlog", "idées", "idees"];

/// Which part of the ledger a section represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Pending,
    InProgress,
    Done,
    Ideas,
    /// Preamble or an unrecognized heading; preserved verbatim, never mutated.
    Other,
}

impl SectionKind {
    fn default_header(self) -> &'static str {
        match self {
            SectionKind::Pending => "## Pending",
            SectionKind::InProgress => "## In Progress",
            SectionKind::Done => "## Done",
            SectionKind::Ideas => "## Ideas",
            SectionKind::Other => "## Notes",
        }
    }

    fn rank(self) -> usize {
        match self {
            SectionKind::Pending => 0,
            SectionKind::InProgress => 1,
            SectionKind::Done => 2,
            SectionKind::Ideas => 3,
            SectionKind::Other => 4,
        }
    }
}

/// A single queue item, simple (one bullet line) or compound (heading plus steps).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissionEntry {
    /// Source lines, verbatim. Simple entries have exactly one.
    pub lines: Vec<String>,
    /// Display text without bullet, strike-through or project tag.
    pub text: String,
    pub project: Option<String>,
    pub done: bool,
    pub compound: bool,
}

impl MissionEntry {
    /// Build a new simple entry, tagging it with `project` unless the text already carries a tag.
    pub fn simple(text: &str, project: Option<&str>) -> Self {
        let text = text.replace(['\r', '\n'], " ");
        let mut line = String::from("- ");
        if let Some(project) = project.map(str::trim).filter(|p| !p.is_empty())
            && !PROJECT_RE.is_match(&text)
        {
            line.push_str(&format!("[project:{project}] "));
        }
        line.push_str(text.trim());
        Self::from_bullet_line(&line)
    }

    fn from_bullet_line(line: &str) -> Self {
        let body = bullet(line).map(|(_, rest)| rest).unwrap_or(line);
        let (done, inner) = strip_strike(body.trim());
        let (text, project) = split_project(inner);
        Self {
            lines: vec![line.to_string()],
            text,
            project,
            done,
            compound: false,
        }
    }

    fn from_compound(lines: &[String]) -> Self {
        let heading = lines[0].trim_start().trim_start_matches('#').trim();
        let (done, inner) = strip_strike(heading);
        let (text, project) = split_project(inner);
        Self {
            lines: lines.to_vec(),
            text,
            project,
            done,
            compound: true,
        }
    }

    /// Whether this entry should be picked under `filter`. Untagged entries match any filter.
    pub fn matches_project(&self, filter: Option<&str>) -> bool {
        match filter.map(str::trim).filter(|f| !f.is_empty()) {
            None => true,
            Some(filter) => self
                .project
                .as_deref()
                .is_none_or(|project| project.eq_ignore_ascii_case(filter)),
        }
    }

    /// Text handed to the executor: the display text, or the whole block for compound entries.
    pub fn mission_text(&self) -> String {
        if self.compound {
            self.lines.join("\n")
        } else {
            self.text.clone()
        }
    }

    /// The struck-through line recorded in the Done section.
    fn done_line(&self) -> String {
        let source = if self.compound {
            self.lines[0].trim_start().trim_start_matches('#').trim()
        } else {
            bullet(&self.lines[0])
                .map(|(_, rest)| rest)
                .unwrap_or(&self.lines[0])
                .trim()
        };
        let (_, inner) = strip_strike(source);
        format!("- ~~{inner}~~")
    }

    fn same_mission(&self, other: &MissionEntry) -> bool {
        self.text == other.text && self.project == other.project && self.compound == other.compound
    }
}

/// A run of lines inside a section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Entry(MissionEntry),
    /// "Nothing here" marker, dropped once real entries arrive.
    Placeholder(String),
    Blank(String),
    /// Free text a human wrote; kept verbatim.
    Text(String),
}

impl Block {
    fn lines(&self) -> Vec<&str> {
        match self {
            Block::Entry(entry) => entry.lines.iter().map(String::as_str).collect(),
            Block::Placeholder(line) | Block::Blank(line) | Block::Text(line) => vec![line.as_str()],
        }
    }

    fn is_blank(&self) -> bool {
        matches!(self, Block::Blank(_))
    }

    fn is_placeholder(&self) -> bool {
        matches!(self, Block::Placeholder(_))
    }
}

/// One section of the ledger: its header line (absent for the preamble) and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub kind: SectionKind,
    pub header: Option<String>,
    pub blocks: Vec<Block>,
}

impl Section {
    pub fn entries(&self) -> impl Iterator<Item = &MissionEntry> {
        self.blocks.iter().filter_map(|block| match block {
            Block::Entry(entry) => Some(entry),
            _ => None,
        })
    }

    fn remove_entry(&mut self, target: &MissionEntry) -> bool {
        let Some(pos) = self
            .blocks
            .iter()
            .position(|block| matches!(block, Block::Entry(entry) if entry == target))
        else {
            return false;
        };
        self.blocks.remove(pos);
        // Collapse the blank pair the removed entry sat between.
        if pos > 0
            && self.blocks[pos - 1].is_blank()
            && self.blocks.get(pos).is_some_and(Block::is_blank)
        {
            self.blocks.remove(pos);
        }
        true
    }

    /// Append at the end of the section (FIFO), consuming placeholder markers.
    fn append_entry(&mut self, entry: MissionEntry) {
        let has_entries = self.entries().next().is_some();
        if !has_entries && let Some(pos) = self.blocks.iter().position(Block::is_placeholder) {
            self.blocks[pos] = Block::Entry(entry);
            self.blocks.retain(|block| !block.is_placeholder());
            return;
        }
        self.blocks.retain(|block| !block.is_placeholder());

        match self.blocks.iter().rposition(|block| !block.is_blank()) {
            Some(last) => {
                let mut insert_at = last + 1;
                // A bullet glued to a compound block would be read back as one of its steps.
                if matches!(&self.blocks[last], Block::Entry(prev) if prev.compound) {
                    self.blocks.insert(insert_at, Block::Blank(String::new()));
                    insert_at += 1;
                }
                self.blocks.insert(insert_at, Block::Entry(entry));
            }
            None => {
                let insert_at = usize::from(self.blocks.first().is_some_and(Block::is_blank));
                self.blocks.insert(insert_at, Block::Entry(entry));
            }
        }
    }
}

/// The full ledger document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissionLedger {
    pub sections: Vec<Section>,
    trailing_newline: bool,
}

impl MissionLedger {
    /// Parse a ledger document. Never fails: unrecognized content is kept as opaque text.
    pub fn parse(document: &str) -> Self {
        let trailing_newline = document.ends_with('\n');
        let body = document.strip_suffix('\n').unwrap_or(document);
        let lines: Vec<&str> = if document.is_empty() {
            Vec::new()
        } else {
            body.split('\n').collect()
        };

        let mut sections = Vec::new();
        let mut current_header: Option<String> = None;
        let mut current_kind = SectionKind::Other;
        let mut current_lines: Vec<String> = Vec::new();

        for line in lines {
            if let Some((level, title)) = heading(line)
                && level <= 2
            {
                if current_header.is_some() || !current_lines.is_empty() {
                    sections.push(Section {
                        kind: current_kind,
                        header: current_header.take(),
                        blocks: parse_blocks(&current_lines),
                    });
                    current_lines.clear();
                }
                current_kind = classify_section(title);
                current_header = Some(line.to_string());
                continue;
            }
            current_lines.push(line.to_string());
        }
        if current_header.is_some() || !current_lines.is_empty() {
            sections.push(Section {
                kind: current_kind,
                header: current_header,
                blocks: parse_blocks(&current_lines),
            });
        }

        Self {
            sections,
            trailing_newline,
        }
    }

    /// Serialize back to text. Unmodified ledgers reproduce their source exactly.
    pub fn render(&self) -> String {
        let mut lines: Vec<&str> = Vec::new();
        for section in &self.sections {
            if let Some(header) = &section.header {
                lines.push(header);
            }
            for block in &section.blocks {
                lines.extend(block.lines());
            }
        }
        let mut out = lines.join("\n");
        if self.trailing_newline && !lines.is_empty() {
            out.push('\n');
        }
        out
    }

    pub fn section(&self, kind: SectionKind) -> Option<&Section> {
        self.sections.iter().find(|section| section.kind == kind)
    }

    fn section_mut(&mut self, kind: SectionKind) -> Option<&mut Section> {
        self.sections.iter_mut().find(|section| section.kind == kind)
    }

    /// Entries of the first section of `kind`, in document order.
    pub fn entries(&self, kind: SectionKind) -> Vec<&MissionEntry> {
        self.section(kind)
            .map(|section| section.entries().collect())
            .unwrap_or_default()
    }

    /// Number of not-yet-done entries in a section.
    pub fn open_count(&self, kind: SectionKind) -> usize {
        self.entries(kind)
            .iter()
            .filter(|entry| !entry.done)
            .count()
    }

    /// Append `entry` to the end of Pending, creating the section if needed.
    pub fn insert_pending(&mut self, entry: MissionEntry) {
        self.ensure_section(SectionKind::Pending).append_entry(entry);
    }

    /// Whether Pending already holds the same mission (same text and project).
    pub fn has_pending(&self, entry: &MissionEntry) -> bool {
        self.entries(SectionKind::Pending)
            .iter()
            .any(|pending| !pending.done && pending.same_mission(entry))
    }

    /// First runnable Pending entry for `project_filter`. Pure read.
    pub fn extract_next(&self, project_filter: Option<&str>) -> Option<&MissionEntry> {
        self.section(SectionKind::Pending)?
            .entries()
            .find(|entry| !entry.done && entry.matches_project(project_filter))
    }

    /// Remove the first Pending entry equal to `entry`.
    pub fn remove_pending(&mut self, entry: &MissionEntry) -> bool {
        self.section_mut(SectionKind::Pending)
            .is_some_and(|section| section.remove_entry(entry))
    }

    /// Move `entry` from Pending to the end of In Progress.
    pub fn start(&mut self, entry: &MissionEntry) -> bool {
        if !self.remove_pending(entry) {
            return false;
        }
        self.ensure_section(SectionKind::InProgress)
            .append_entry(entry.clone());
        true
    }

    /// Move `entry` from In Progress to Done, struck through.
    ///
    /// Succeeds even if a human already removed the in-progress line.
    pub fn complete(&mut self, entry: &MissionEntry) {
        if let Some(section) = self.section_mut(SectionKind::InProgress) {
            section.remove_entry(entry);
        }
        let done = MissionEntry::from_bullet_line(&entry.done_line());
        self.ensure_section(SectionKind::Done).append_entry(done);
    }

    /// Move `entry` from In Progress back to the end of Pending.
    ///
    /// Returns false when the same mission is already pending (the in-progress copy is dropped).
    pub fn requeue(&mut self, entry: &MissionEntry) -> bool {
        if let Some(section) = self.section_mut(SectionKind::InProgress) {
            section.remove_entry(entry);
        }
        if self.has_pending(entry) {
            return false;
        }
        self.insert_pending(entry.clone());
        true
    }

    /// Append a simple entry to the Ideas backlog.
    pub fn add_idea(&mut self, entry: MissionEntry) {
        self.ensure_section(SectionKind::Ideas).append_entry(entry);
    }

    /// Move the `index`-th open idea (0-based) to the end of Pending.
    pub fn promote_idea(&mut self, index: usize) -> Option<MissionEntry> {
        let idea = self
            .entries(SectionKind::Ideas)
            .into_iter()
            .filter(|entry| !entry.done)
            .nth(index)?
            .clone();
        self.section_mut(SectionKind::Ideas)?.remove_entry(&idea);
        self.insert_pending(idea.clone());
        Some(idea)
    }

    pub(crate) fn ensure_section(&mut self, kind: SectionKind) -> &mut Section {
        if let Some(pos) = self.sections.iter().position(|s| s.kind == kind) {
            return &mut self.sections[pos];
        }
        if self.sections.is_empty() {
            self.trailing_newline = true;
        }

        let insert_at = self
            .sections
            .iter()
            .position(|s| {
                s.header.is_some() && s.kind != SectionKind::Other && s.kind.rank() > kind.rank()
            })
            .unwrap_or(self.sections.len());
        let at_end = insert_at == self.sections.len();

        if insert_at > 0 {
            let previous = &mut self.sections[insert_at - 1];
            if !previous.blocks.last().is_some_and(Block::is_blank)
                && (previous.header.is_some() || !previous.blocks.is_empty())
            {
                previous.blocks.push(Block::Blank(String::new()));
            }
        }

        let mut blocks = vec![Block::Blank(String::new())];
        if !at_end {
            blocks.push(Block::Blank(String::new()));
        }
        self.sections.insert(
            insert_at,
            Section {
                kind,
                header: Some(kind.default_header().to_string()),
                blocks,
            },
        );
        &mut self.sections[insert_at]
    }
}

fn parse_blocks(lines: &[String]) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let line = &lines[i];
        if line.trim().is_empty() {
            blocks.push(Block::Blank(line.clone()));
            i += 1;
        } else if is_placeholder(line) {
            blocks.push(Block::Placeholder(line.clone()));
            i += 1;
        } else if heading(line).is_some() {
            let end = compound_end(lines, i);
            blocks.push(Block::Entry(MissionEntry::from_compound(&lines[i..end])));
            i = end;
        } else if bullet(line).is_some() {
            blocks.push(Block::Entry(MissionEntry::from_bullet_line(line)));
            i += 1;
        } else {
            blocks.push(Block::Text(line.clone()));
            i += 1;
        }
    }
    blocks
}

/// Index one past the last line of the compound block starting at `start`.
///
/// The block ends at a blank line, another heading, or the end of the section.
/// When its first step is indented, a bullet indented less than that also ends it.
fn compound_end(lines: &[String], start: usize) -> usize {
    let mut step_indent: Option<usize> = None;
    let mut end = start + 1;
    while end < lines.len() {
        let line = &lines[end];
        if line.trim().is_empty() || heading(line).is_some() {
            break;
        }
        if let Some((indent, _)) = bullet(line) {
            match step_indent {
                None => step_indent = Some(indent),
                Some(expected) if indent < expected => break,
                Some(_) => {}
            }
        }
        end += 1;
    }
    end
}

/// Markdown heading level and title, if `line` is a heading.
fn heading(line: &str) -> Option<(usize, &str)> {
    let trimmed = line.trim_start();
    if line.len() - trimmed.len() > 3 {
        return None;
    }
    let level = trimmed.chars().take_while(|c| *c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = &trimmed[level..];
    if !rest.is_empty() && !rest.starts_with([' ', '\t']) {
        return None;
    }
    Some((level, rest.trim()))
}

/// Indentation and content of a bullet line.
fn bullet(line: &str) -> Option<(usize, &str)> {
    let trimmed = line.trim_start();
    let indent = line.len() - trimmed.len();
    ["- ", "* ", "+ "]
        .iter()
        .find_map(|marker| trimmed.strip_prefix(marker))
        .map(|rest| (indent, rest))
}

fn is_placeholder(line: &str) -> bool {
    let normalized = line.trim().to_lowercase();
    PLACEHOLDERS.contains(&normalized.as_str())
}

fn classify_section(title: &str) -> SectionKind {
    let normalized = normalize_title(title);
    let matches = |names: &[&str]| names.contains(&normalized.as_str());
    if matches(PENDING_NAMES) {
        SectionKind::Pending
    } else if matches(IN_PROGRESS_NAMES) {
        SectionKind::InProgress
    } else if matches(DONE_NAMES) {
        SectionKind::Done
    } else if matches(IDEAS_NAMES) {
        SectionKind::Ideas
    } else {
        SectionKind::Other
    }
}

/// Lowercase, treat `-`/`_` as spaces, drop emoji and punctuation at the edges.
fn normalize_title(title: &str) -> String {
    let lowered = title.to_lowercase().replace(['-', '_'], " ");
    lowered
        .trim_matches(|c: char| !c.is_alphanumeric())
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn strip_strike(text: &str) -> (bool, &str) {
    match text
        .strip_prefix("~~")
        .and_then(|rest| rest.strip_suffix("~~"))
    {
        Some(inner) if !inner.is_empty() => (true, inner.trim()),
        _ => (false, text),
    }
}

fn split_project(text: &str) -> (String, Option<String>) {
    let project = PROJECT_RE
        .captures(text)
        .map(|caps| caps[1].to_string());
    let stripped = PROJECT_RE.replace(text, "");
    let text = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    (text, project)
}
