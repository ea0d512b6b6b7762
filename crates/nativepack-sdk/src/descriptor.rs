//! Section-based patching of text project descriptors.
//!
//! A descriptor is treated as opaque text containing named sections. Each
//! section is found through a chain of start markers and an end marker, and
//! holds one entry per line. An entry's identity key is the text between
//! two delimiters on its line.
//!
//! Patching never edits text in place. Every section span is located on the
//! original text first, a replacement body is computed per span, and the
//! result is assembled in one pass:
//!
//! ```text
//! Loaded -> SectionsLocated -> EntriesParsed -> PlanComputed -> Rewritten -> Saved
//! ```
//!
//! Lines that are not removed are reproduced byte for byte, so patching an
//! already patched descriptor with the same inputs yields identical text.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

use crate::fs::Filesystem;
use crate::types::PackError;

/// Placeholder for the artifact name in entry templates.
pub const NAME_PLACEHOLDER: &str = "{name}";
/// Placeholder for the build-file identifier.
pub const BUILD_FILE_ID_PLACEHOLDER: &str = "{build_file_id}";
/// Placeholder for the embed build-file identifier.
pub const EMBED_ID_PLACEHOLDER: &str = "{embed_id}";
/// Placeholder for the file-reference identifier.
pub const FILE_REF_ID_PLACEHOLDER: &str = "{file_ref_id}";

const ID_PLACEHOLDERS: [&str; 3] = [
    BUILD_FILE_ID_PLACEHOLDER,
    EMBED_ID_PLACEHOLDER,
    FILE_REF_ID_PLACEHOLDER,
];

/// Length of generated identifiers, in hex digits.
pub const ID_LEN: usize = 24;

const MAX_ID_ATTEMPTS: usize = 1000;

/// One patchable section of a descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionSpec {
    /// Name used in diagnostics.
    pub name: String,
    /// Markers searched one after another; the span starts after the last.
    pub start_markers: Vec<String>,
    /// Marker closing the span.
    pub end_marker: String,
    /// Text preceding an entry's key.
    pub key_open: String,
    /// Text following an entry's key.
    pub key_close: String,
    /// Lines added for each missing artifact, without indentation.
    pub templates: Vec<String>,
}

impl SectionSpec {
    /// Creates a section with `/* ` .. ` */` key delimiters and no templates.
    pub fn new(name: &str, start_markers: &[&str], end_marker: &str) -> Self {
        Self {
            name: name.to_string(),
            start_markers: start_markers.iter().map(|m| m.to_string()).collect(),
            end_marker: end_marker.to_string(),
            key_open: "/* ".to_string(),
            key_close: " */".to_string(),
            templates: Vec::new(),
        }
    }

    /// Sets the key delimiters.
    pub fn key(mut self, open: &str, close: &str) -> Self {
        self.key_open = open.to_string();
        self.key_close = close.to_string();
        self
    }

    /// Appends an entry template.
    pub fn template(mut self, template: &str) -> Self {
        self.templates.push(template.to_string());
        self
    }

    /// Identity key of a line, if it has one.
    pub fn key_of<'t>(&self, line: &'t str) -> Option<&'t str> {
        let start = line.find(&self.key_open)? + self.key_open.len();
        let len = line[start..].find(&self.key_close)?;
        let key = &line[start..start + len];
        (!key.is_empty()).then_some(key)
    }
}

/// Identifiers of one artifact's new entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactIds {
    pub build_file: String,
    pub embed: String,
    pub file_ref: String,
}

impl ArtifactIds {
    fn render(&self, template: &str, name: &str) -> String {
        template
            .replace(BUILD_FILE_ID_PLACEHOLDER, &self.build_file)
            .replace(EMBED_ID_PLACEHOLDER, &self.embed)
            .replace(FILE_REF_ID_PLACEHOLDER, &self.file_ref)
            .replace(NAME_PLACEHOLDER, name)
    }
}

/// Source of candidate identifiers.
pub trait IdGenerator {
    /// Returns a candidate. Candidates colliding with the descriptor are discarded.
    fn next_id(&mut self) -> String;
}

/// Random identifiers: the first 24 hex digits of a v4 UUID, upper case.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIds;

impl IdGenerator for UuidIds {
    fn next_id(&mut self) -> String {
        let mut hex = uuid::Uuid::new_v4().simple().to_string().to_uppercase();
        hex.truncate(ID_LEN);
        hex
    }
}

/// Which existing entries the patcher may remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagedNames {
    /// Every keyed entry.
    All,
    /// Only these names.
    Only(BTreeSet<String>),
    /// Names ending in `.<extension>`.
    WithExtension(String),
}

impl ManagedNames {
    /// Whether `name` is managed.
    pub fn contains(&self, name: &str) -> bool {
        match self {
            ManagedNames::All => true,
            ManagedNames::Only(names) => names.contains(name),
            ManagedNames::WithExtension(ext) => name
                .rsplit_once('.')
                .is_some_and(|(stem, e)| !stem.is_empty() && e == ext),
        }
    }
}

/// Patch behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOptions {
    /// Remove managed entries that are not required.
    pub prune: bool,
    /// Entries eligible for removal.
    pub managed: ManagedNames,
}

impl Default for PatchOptions {
    fn default() -> Self {
        Self {
            prune: false,
            managed: ManagedNames::All,
        }
    }
}

/// Progress of a descriptor through the patch pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PatchStage {
    Loaded,
    SectionsLocated,
    EntriesParsed,
    PlanComputed,
    Rewritten,
    Saved,
}

/// Result of a successful patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOutcome {
    /// The patched text.
    pub text: String,
    /// Whether `text` differs from the input.
    pub changed: bool,
    /// Names that received at least one new entry.
    pub added: BTreeSet<String>,
    /// Names that lost at least one entry.
    pub removed: BTreeSet<String>,
    /// Last stage reached.
    pub stage: PatchStage,
}

#[derive(Debug, Clone, Copy)]
struct Span {
    start: usize,
    end: usize,
    mid_line: bool,
}

struct Line<'t> {
    raw: &'t str,
    key: Option<&'t str>,
}

impl<'t> Line<'t> {
    fn parse(raw: &'t str, spec: &SectionSpec) -> Self {
        let key = if raw.trim().is_empty() {
            None
        } else {
            spec.key_of(raw)
        };
        Self { raw, key }
    }
}

struct SectionPlan<'t> {
    kept: Vec<&'t str>,
    first_line_kept: bool,
    additions: Vec<&'t str>,
    indent: String,
    tail: &'t str,
}

fn missing_marker(spec: &SectionSpec, marker: &str) -> PackError {
    PackError::DescriptorStructure {
        path: None,
        message: format!("section {} has no \"{}\"", spec.name, marker),
    }
}

/// Finds each section's span, searching from the end of the previous one.
fn locate_sections(text: &str, specs: &[SectionSpec]) -> Result<Vec<Span>, PackError> {
    let mut cursor = 0;
    let mut spans = Vec::with_capacity(specs.len());
    for spec in specs {
        let mut pos = cursor;
        for marker in &spec.start_markers {
            let found = text[pos..]
                .find(marker.as_str())
                .ok_or_else(|| missing_marker(spec, marker))?;
            pos += found + marker.len();
        }
        let rest = &text[pos..];
        let start = match rest.find('\n') {
            Some(i) if rest[..i].trim().is_empty() => pos + i + 1,
            _ => pos,
        };
        let end = text[start..]
            .find(spec.end_marker.as_str())
            .map(|i| start + i)
            .ok_or_else(|| missing_marker(spec, &spec.end_marker))?;
        spans.push(Span {
            start,
            end,
            mid_line: start > 0 && !text[..start].ends_with('\n'),
        });
        cursor = end + spec.end_marker.len();
    }
    Ok(spans)
}

/// Splits a span body into full lines and the unterminated tail.
///
/// The tail is the text between the last newline and the end marker. It
/// usually holds indentation only, but an entry written on the marker's
/// line is keyed like any other.
fn parse_lines<'t>(body: &'t str, spec: &SectionSpec) -> (Vec<Line<'t>>, Line<'t>) {
    let mut lines = Vec::new();
    let mut rest = body;
    while let Some(i) = rest.find('\n') {
        let raw = &rest[..=i];
        rest = &rest[i + 1..];
        lines.push(Line::parse(raw, spec));
    }
    (lines, Line::parse(rest, spec))
}

/// Reads the identifiers a line carries, using `template` as its pattern.
///
/// Text after the last placeholder is not compared, so a line with extra
/// trailing attributes still yields its identifiers.
fn capture_ids<'t>(template: &str, name: &str, line: &'t str) -> Vec<(&'static str, &'t str)> {
    let template = template.replace(NAME_PLACEHOLDER, name);
    let line = line.trim_start_matches([' ', '\t']);
    let mut captured = Vec::new();
    let (mut tpos, mut lpos) = (0, 0);
    loop {
        let next = ID_PLACEHOLDERS
            .iter()
            .filter_map(|p| template[tpos..].find(*p).map(|i| (tpos + i, *p)))
            .min_by_key(|(i, _)| *i);
        let Some((at, placeholder)) = next else {
            return captured;
        };
        let literal = &template[tpos..at];
        if !line[lpos..].starts_with(literal) {
            return Vec::new();
        }
        lpos += literal.len();
        let len = line[lpos..]
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(line.len() - lpos);
        if len == 0 {
            return Vec::new();
        }
        captured.push((placeholder, &line[lpos..lpos + len]));
        lpos += len;
        tpos = at + placeholder.len();
    }
}

/// Identifiers already used by required artifacts, keyed by name and placeholder.
fn existing_ids<'t>(
    parsed: &[(Vec<Line<'t>>, Line<'t>)],
    specs: &[SectionSpec],
    required: &[&str],
) -> HashMap<(String, &'static str), &'t str> {
    let mut known = HashMap::new();
    for ((lines, tail), spec) in parsed.iter().zip(specs) {
        for line in lines.iter().chain(std::iter::once(tail)) {
            let Some(key) = line.key.filter(|key| required.contains(key)) else {
                continue;
            };
            for template in &spec.templates {
                for (placeholder, id) in capture_ids(template, key, line.raw) {
                    known.entry((key.to_string(), placeholder)).or_insert(id);
                }
            }
        }
    }
    known
}

fn leading_whitespace(line: &str) -> &str {
    let trimmed = line.trim_start_matches([' ', '\t']);
    &line[..line.len() - trimmed.len()]
}

fn plan_section<'t>(
    lines: &[Line<'t>],
    tail: &Line<'t>,
    required: &[&'t str],
    options: &PatchOptions,
    removed: &mut BTreeSet<String>,
) -> SectionPlan<'t> {
    let present: HashSet<&str> = lines
        .iter()
        .chain(std::iter::once(tail))
        .filter_map(|l| l.key)
        .collect();
    let wanted: HashSet<&str> = required.iter().copied().collect();
    let drops = |line: &Line<'_>| match line.key {
        Some(key) => options.prune && options.managed.contains(key) && !wanted.contains(key),
        None => false,
    };

    let mut kept = Vec::with_capacity(lines.len());
    let mut first_line_kept = true;
    for (i, line) in lines.iter().enumerate() {
        if drops(line) {
            if let Some(key) = line.key {
                removed.insert(key.to_string());
            }
            if i == 0 {
                first_line_kept = false;
            }
        } else {
            kept.push(line.raw);
        }
    }

    let indent = match lines.iter().rev().find(|l| !l.raw.trim().is_empty()) {
        Some(last) => leading_whitespace(last.raw).to_string(),
        None if tail.key.is_some() => leading_whitespace(tail.raw).to_string(),
        None => {
            let lead = leading_whitespace(tail.raw);
            if lead.is_empty() {
                "\t\t".to_string()
            } else {
                format!("{lead}\t")
            }
        }
    };

    // An entry sharing the end marker's line keeps only its indentation.
    let tail_text = if drops(tail) {
        if let Some(key) = tail.key {
            removed.insert(key.to_string());
        }
        leading_whitespace(tail.raw)
    } else {
        tail.raw
    };

    SectionPlan {
        kept,
        first_line_kept,
        additions: required
            .iter()
            .copied()
            .filter(|name| !present.contains(name))
            .collect(),
        indent,
        tail: tail_text,
    }
}

fn fresh_id(
    text: &str,
    taken: &mut HashSet<String>,
    ids: &mut dyn IdGenerator,
) -> Result<String, PackError> {
    for _ in 0..MAX_ID_ATTEMPTS {
        let id = ids.next_id();
        if !id.is_empty() && !text.contains(&id) && taken.insert(id.clone()) {
            return Ok(id);
        }
    }
    Err(PackError::Config(format!(
        "could not generate an identifier absent from the descriptor after {MAX_ID_ATTEMPTS} attempts"
    )))
}

/// Patches `text` so every section holds an entry for each required name.
///
/// With `options.prune`, managed entries whose key is not required are
/// removed. Entries with unmanaged keys, keyless lines and the whitespace
/// before each end marker are kept as they are. A missing marker fails the
/// whole patch.
pub fn patch(
    text: &str,
    required: &[String],
    specs: &[SectionSpec],
    options: &PatchOptions,
    ids: &mut dyn IdGenerator,
) -> Result<PatchOutcome, PackError> {
    let mut seen = HashSet::new();
    let required: Vec<&str> = required
        .iter()
        .map(String::as_str)
        .filter(|name| seen.insert(*name))
        .collect();

    let spans = locate_sections(text, specs)?;
    tracing::debug!(stage = ?PatchStage::SectionsLocated, sections = spans.len());

    let parsed: Vec<(Vec<Line<'_>>, Line<'_>)> = spans
        .iter()
        .zip(specs)
        .map(|(span, spec)| parse_lines(&text[span.start..span.end], spec))
        .collect();
    tracing::debug!(stage = ?PatchStage::EntriesParsed);

    let mut removed = BTreeSet::new();
    let plans: Vec<SectionPlan<'_>> = parsed
        .iter()
        .map(|(lines, tail)| plan_section(lines, tail, &required, options, &mut removed))
        .collect();
    tracing::debug!(stage = ?PatchStage::PlanComputed);

    // Identifiers are shared by all sections so cross references line up.
    // An artifact that already has entries keeps the identifiers they use.
    let added: BTreeSet<String> = plans
        .iter()
        .flat_map(|plan| plan.additions.iter().map(|name| name.to_string()))
        .collect();
    let known = existing_ids(&parsed, specs, &required);
    let mut taken = HashSet::new();
    let mut artifact_ids = Vec::with_capacity(added.len());
    for name in &required {
        if !added.contains(*name) {
            continue;
        }
        let mut id_for = |placeholder: &'static str| -> Result<String, PackError> {
            match known.get(&(name.to_string(), placeholder)) {
                Some(id) => Ok(id.to_string()),
                None => fresh_id(text, &mut taken, &mut *ids),
            }
        };
        let entry_ids = ArtifactIds {
            build_file: id_for(BUILD_FILE_ID_PLACEHOLDER)?,
            embed: id_for(EMBED_ID_PLACEHOLDER)?,
            file_ref: id_for(FILE_REF_ID_PLACEHOLDER)?,
        };
        artifact_ids.push((*name, entry_ids));
    }

    let mut out = String::with_capacity(text.len() + added.len() * 256);
    let mut last = 0;
    for ((span, plan), spec) in spans.iter().zip(&plans).zip(specs) {
        out.push_str(&text[last..span.start]);
        let writes_lines = !plan.kept.is_empty() || !plan.additions.is_empty();
        // The span began mid-line and its first line is gone.
        if span.mid_line && writes_lines && (!plan.first_line_kept || plan.kept.is_empty()) {
            out.push('\n');
        }
        for raw in &plan.kept {
            out.push_str(raw);
        }
        for name in &plan.additions {
            let Some((_, entry_ids)) = artifact_ids.iter().find(|(n, _)| n == name) else {
                continue;
            };
            for template in &spec.templates {
                out.push_str(&plan.indent);
                out.push_str(&entry_ids.render(template, name));
                out.push('\n');
            }
        }
        out.push_str(plan.tail);
        last = span.end;
    }
    out.push_str(&text[last..]);
    tracing::debug!(stage = ?PatchStage::Rewritten, added = added.len(), removed = removed.len());

    Ok(PatchOutcome {
        changed: out != text,
        text: out,
        added,
        removed,
        stage: PatchStage::Rewritten,
    })
}

/// Patches a descriptor file in place.
///
/// The file is replaced through a temporary file and an atomic rename, and
/// only when the text changed. On any error the file is left untouched.
pub fn patch_file(
    path: &Path,
    required: &[String],
    specs: &[SectionSpec],
    options: &PatchOptions,
    ids: &mut dyn IdGenerator,
    fs: &dyn Filesystem,
) -> Result<PatchOutcome, PackError> {
    let text = fs.read_to_string(path)?;
    tracing::debug!(stage = ?PatchStage::Loaded, "{}", path.display());
    let mut outcome =
        patch(&text, required, specs, options, ids).map_err(|e| e.in_descriptor(path))?;
    if outcome.changed {
        fs.write_atomic(path, &outcome.text)?;
        tracing::info!(
            "updated {} (+{} -{})",
            path.display(),
            outcome.added.len(),
            outcome.removed.len()
        );
    } else {
        tracing::debug!("{} already up to date", path.display());
    }
    outcome.stage = PatchStage::Saved;
    Ok(outcome)
}
