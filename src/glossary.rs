use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::GlossaryError;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GlossaryEntry {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub note: Option<String>,
}

/// One non-overlapping match of a glossary entry in a text, byte offsets.
#[derive(Clone, Debug)]
pub struct GlossaryHit<'a> {
    pub entry: &'a GlossaryEntry,
    pub start: usize,
    pub end: usize,
}

#[derive(Clone, Debug)]
pub struct GlossaryViolation {
    pub source_term: String,
    pub expected_target: String,
}

#[derive(Clone, Debug)]
pub struct GlossaryReport {
    pub compliant: bool,
    pub violations: Vec<GlossaryViolation>,
}

/// Compiled term table. Entries are ordered by (priority desc, source length
/// desc) at load time so overlapping source terms resolve deterministically;
/// the table is read-only afterwards.
#[derive(Clone, Debug, Default)]
pub struct Glossary {
    entries: Vec<GlossaryEntry>,
}

#[derive(Debug, Deserialize)]
struct GlossaryFile {
    entries: Vec<GlossaryEntry>,
}

impl Glossary {
    pub fn from_entries(entries: Vec<GlossaryEntry>) -> Self {
        let mut entries: Vec<GlossaryEntry> = entries
            .into_iter()
            .filter(|e| !e.source.trim().is_empty() && !e.target.trim().is_empty())
            .collect();
        entries.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| b.source.chars().count().cmp(&a.source.chars().count()))
        });
        Self { entries }
    }

    pub fn load(path: &Path) -> Result<Self, GlossaryError> {
        let text = std::fs::read_to_string(path).map_err(|source| GlossaryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let is_csv = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
        if is_csv {
            Self::from_csv_str(&text)
        } else {
            Self::from_toml_str(&text)
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, GlossaryError> {
        let file: GlossaryFile =
            toml::from_str(text).map_err(|e| GlossaryError::Load(e.to_string()))?;
        Ok(Self::from_entries(file.entries))
    }

    pub fn from_csv_str(text: &str) -> Result<Self, GlossaryError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(text.as_bytes());
        let headers = reader
            .headers()
            .map_err(|e| GlossaryError::Load(e.to_string()))?
            .clone();
        let col = |name: &str| headers.iter().position(|h| h.trim() == name);
        let (Some(src_col), Some(tgt_col)) = (col("source"), col("target")) else {
            return Err(GlossaryError::Load(
                "csv glossary needs `source` and `target` columns".to_string(),
            ));
        };
        let ctx_col = col("context");
        let case_col = col("case_sensitive");
        let prio_col = col("priority");
        let note_col = col("note");

        let mut entries = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| GlossaryError::Load(e.to_string()))?;
            let get = |i: Option<usize>| i.and_then(|i| record.get(i)).map(|s| s.trim());
            let Some(source) = get(Some(src_col)).filter(|s| !s.is_empty()) else {
                continue;
            };
            let Some(target) = get(Some(tgt_col)).filter(|s| !s.is_empty()) else {
                continue;
            };
            entries.push(GlossaryEntry {
                source: source.to_string(),
                target: target.to_string(),
                context: get(ctx_col).filter(|s| !s.is_empty()).map(str::to_string),
                case_sensitive: get(case_col)
                    .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                    .unwrap_or(false),
                priority: get(prio_col).and_then(|v| v.parse().ok()).unwrap_or(0),
                note: get(note_col).filter(|s| !s.is_empty()).map(str::to_string),
            });
        }
        Ok(Self::from_entries(entries))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[GlossaryEntry] {
        &self.entries
    }

    /// Non-overlapping matches in order of appearance. Overlap between
    /// candidate terms is resolved by the compiled entry order; matching
    /// respects word boundaries and the per-entry case flag. Entries carrying
    /// a context tag only match when that tag is passed.
    pub fn lookup_matches(&self, text: &str, context: Option<&str>) -> Vec<GlossaryHit<'_>> {
        let mut taken: Vec<(usize, usize)> = Vec::new();
        let mut hits: Vec<GlossaryHit<'_>> = Vec::new();
        for entry in &self.entries {
            if let Some(tag) = entry.context.as_deref() {
                if context != Some(tag) {
                    continue;
                }
            }
            for (start, end) in find_term(text, &entry.source, entry.case_sensitive) {
                if taken.iter().any(|&(s, e)| start < e && s < end) {
                    continue;
                }
                taken.push((start, end));
                hits.push(GlossaryHit { entry, start, end });
            }
        }
        hits.sort_by_key(|h| h.start);
        hits
    }

    /// Compact "use these exact translations" hint for terms present in
    /// `text`; empty string when nothing matches.
    pub fn prompt_fragment(&self, text: &str, context: Option<&str>) -> String {
        let hits = self.lookup_matches(text, context);
        if hits.is_empty() {
            return String::new();
        }
        let mut out = String::new();
        out.push_str("Use these exact translations for the listed terms:\n");
        let mut seen: Vec<&str> = Vec::new();
        for hit in &hits {
            if seen.contains(&hit.entry.source.as_str()) {
                continue;
            }
            seen.push(&hit.entry.source);
            out.push_str("- ");
            out.push_str(&hit.entry.source);
            out.push_str(" => ");
            out.push_str(&hit.entry.target);
            if let Some(note) = hit.entry.note.as_deref() {
                let note = note.trim();
                if !note.is_empty() {
                    out.push_str(" (");
                    out.push_str(note);
                    out.push(')');
                }
            }
            out.push('\n');
        }
        out
    }

    /// Case-folded source -> targets map used by the aligner as
    /// high-confidence phrase equivalents.
    pub fn phrase_pairs(&self) -> HashMap<String, Vec<String>> {
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for entry in &self.entries {
            map.entry(entry.source.to_lowercase())
                .or_default()
                .push(entry.target.to_lowercase());
        }
        map
    }

    /// Check that every matched source term has its expected target in the
    /// translated text (case-folded per entry).
    pub fn verify(&self, source: &str, translated: &str) -> GlossaryReport {
        let mut violations = Vec::new();
        let mut checked: Vec<&str> = Vec::new();
        for hit in self.lookup_matches(source, None) {
            if checked.contains(&hit.entry.source.as_str()) {
                continue;
            }
            checked.push(&hit.entry.source);
            let found = if hit.entry.case_sensitive {
                translated.contains(&hit.entry.target)
            } else {
                translated
                    .to_lowercase()
                    .contains(&hit.entry.target.to_lowercase())
            };
            if !found {
                violations.push(GlossaryViolation {
                    source_term: hit.entry.source.clone(),
                    expected_target: hit.entry.target.clone(),
                });
            }
        }
        GlossaryReport {
            compliant: violations.is_empty(),
            violations,
        }
    }
}

/// All word-boundary occurrences of `needle` in `text`, byte offsets. A
/// boundary is "adjacent char is not alphanumeric", which also behaves for
/// scripts without an ASCII notion of word characters.
fn find_term(text: &str, needle: &str, case_sensitive: bool) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    if needle.is_empty() {
        return out;
    }
    let mut pos = 0usize;
    while pos < text.len() {
        if !text.is_char_boundary(pos) {
            pos += 1;
            continue;
        }
        if let Some(end) = match_at(text, pos, needle, case_sensitive) {
            let before_ok = text[..pos]
                .chars()
                .next_back()
                .map(|c| !c.is_alphanumeric())
                .unwrap_or(true);
            let after_ok = text[end..]
                .chars()
                .next()
                .map(|c| !c.is_alphanumeric())
                .unwrap_or(true);
            if before_ok && after_ok {
                out.push((pos, end));
                pos = end;
                continue;
            }
        }
        pos += 1;
    }
    out
}

fn match_at(text: &str, pos: usize, needle: &str, case_sensitive: bool) -> Option<usize> {
    let mut hay = text[pos..].char_indices();
    let mut needle_chars = needle.chars();
    let mut end = pos;
    loop {
        let Some(nc) = needle_chars.next() else {
            return Some(end);
        };
        let (off, hc) = hay.next()?;
        let matches = if case_sensitive {
            hc == nc
        } else {
            hc == nc || hc.to_lowercase().eq(nc.to_lowercase())
        };
        if !matches {
            return None;
        }
        end = pos + off + hc.len_utf8();
    }
}
