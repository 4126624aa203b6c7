use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::backend::CancelToken;
use crate::deck::model::{Run, RunFormat};

pub mod embedding;
mod llm;
mod semantic;

pub use llm::LlmAligner;
pub use semantic::SemanticAligner;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignStrategy {
    #[default]
    Semantic,
    Llm,
}

impl AlignStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlignStrategy::Semantic => "semantic",
            AlignStrategy::Llm => "llm",
        }
    }
}

impl std::str::FromStr for AlignStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "semantic" => Ok(AlignStrategy::Semantic),
            "llm" => Ok(AlignStrategy::Llm),
            other => Err(format!("unknown alignment strategy: {other}")),
        }
    }
}

/// A matched target span with the formatting it inherits, byte offsets into
/// the target text.
#[derive(Clone, Debug)]
pub(crate) struct SpanMatch {
    pub start: usize,
    pub end: usize,
    pub format: RunFormat,
}

/// The two alignment strategies are sibling variants behind one contract:
/// `align(source_text, runs, target_text)` returns runs whose concatenation
/// equals the target text, with formatting inherited from the best-matching
/// source spans. Alignment never fails a paragraph; the worst case is a
/// single run carrying the paragraph base format.
pub enum RunAligner {
    Semantic(SemanticAligner),
    Llm(LlmAligner),
}

impl RunAligner {
    pub fn align(
        &self,
        source_text: &str,
        runs: &[Run],
        target_text: &str,
        cancel: &CancelToken,
    ) -> Vec<Run> {
        let base = paragraph_base_format(runs);
        if target_text.is_empty() {
            // The translator returned nothing; keep the original text so the
            // paragraph is not lost.
            if source_text.is_empty() {
                return Vec::new();
            }
            return vec![Run::new(source_text, base)];
        }

        let out = match self {
            RunAligner::Semantic(a) => a.align_runs(source_text, runs, target_text, &base),
            RunAligner::Llm(a) => a.align_runs(source_text, runs, target_text, &base, cancel),
        };
        if out.is_empty() {
            warn!("aligner produced no runs for non-empty target, using base format");
            return vec![Run::new(target_text, base)];
        }
        out
    }
}

/// The paragraph base format: the format of the dominant (font family, size)
/// group weighted by character count over non-whitespace runs, with
/// hyperlinks and theme-background fills treated as inherit.
pub(crate) fn paragraph_base_format(runs: &[Run]) -> RunFormat {
    let mut groups: Vec<(Option<&str>, Option<u32>, usize, usize)> = Vec::new();
    for (idx, run) in runs.iter().enumerate() {
        if run.is_whitespace() {
            continue;
        }
        let key_font = run.format.font.as_deref();
        let key_size = run.format.size;
        let weight = run.text.chars().count();
        match groups
            .iter_mut()
            .find(|(f, s, _, _)| *f == key_font && *s == key_size)
        {
            Some((_, _, w, _)) => *w += weight,
            None => groups.push((key_font, key_size, weight, idx)),
        }
    }
    let Some(&(_, _, _, first_idx)) = groups.iter().max_by(|a, b| a.2.cmp(&b.2).then(b.3.cmp(&a.3)))
    else {
        return RunFormat::default();
    };
    let mut base = runs[first_idx].format.clone();
    base.hyperlink = None;
    if base.color.as_ref().is_some_and(|c| c.is_theme_background()) {
        base.color = None;
    }
    base
}

/// Byte span of each run within the concatenated paragraph text.
pub(crate) fn run_byte_spans(runs: &[Run]) -> Vec<(usize, usize)> {
    let mut spans = Vec::with_capacity(runs.len());
    let mut cursor = 0usize;
    for run in runs {
        let end = cursor + run.text.len();
        spans.push((cursor, end));
        cursor = end;
    }
    spans
}

/// The source run covering the majority of a matched source span, skipping
/// whitespace-only runs; earlier run wins ties.
pub(crate) fn covering_run_index(
    runs: &[Run],
    spans: &[(usize, usize)],
    span: (usize, usize),
) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for (idx, (run, &(start, end))) in runs.iter().zip(spans).enumerate() {
        if run.is_whitespace() {
            continue;
        }
        let overlap = span.1.min(end).saturating_sub(span.0.max(start));
        if overlap == 0 {
            continue;
        }
        if best.map(|(w, _)| overlap > w).unwrap_or(true) {
            best = Some((overlap, idx));
        }
    }
    best.map(|(_, idx)| idx)
}

/// Does a run's formatting deviate from the paragraph base in any attribute
/// that must be carried across? Theme-background fills do not count; any
/// hyperlink does.
pub(crate) fn differs_from_base(fmt: &RunFormat, base: &RunFormat) -> bool {
    fmt.hyperlink.is_some()
        || fmt.bold != base.bold
        || fmt.italic != base.italic
        || fmt.is_underlined() != base.is_underlined()
        || fmt.effective_color() != base.effective_color()
        || fmt.size != base.size
        || fmt.font != base.font
        || fmt.baseline.unwrap_or(0) != base.baseline.unwrap_or(0)
}

/// How uncovered target characters pick up formatting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum GapFill {
    /// Nearest preceding matched run, base format before the first match.
    /// Used by the semantic strategy, where matches cover base-formatted
    /// text too.
    PrecedingMatch,
    /// Always the paragraph base format. Used by the LLM strategy, where only
    /// non-base spans are mapped, so every gap is base-formatted text by
    /// construction.
    Base,
}

fn gap_format(prev: Option<&SpanMatch>, base: &RunFormat, mode: GapFill) -> RunFormat {
    match (mode, prev) {
        (GapFill::PrecedingMatch, Some(m)) => {
            // A hyperlink never extends past its matched span into gap text.
            let mut f = m.format.clone();
            f.hyperlink = None;
            f
        }
        _ => base.clone(),
    }
}

/// Steps 6 and 7 shared by both strategies: fill uncovered target characters
/// per the gap mode, then merge adjacent runs with identical formatting.
pub(crate) fn fill_gaps_and_coalesce(
    target: &str,
    mut matches: Vec<SpanMatch>,
    base: &RunFormat,
    mode: GapFill,
) -> Vec<Run> {
    matches.sort_by_key(|m| m.start);

    let mut segments: Vec<(usize, usize, RunFormat)> = Vec::new();
    let mut cursor = 0usize;
    let mut prev: Option<&SpanMatch> = None;
    for m in &matches {
        if m.start > cursor {
            segments.push((cursor, m.start, gap_format(prev, base, mode)));
        }
        segments.push((m.start, m.end, m.format.clone()));
        cursor = m.end;
        prev = Some(m);
    }
    if cursor < target.len() {
        segments.push((cursor, target.len(), gap_format(prev, base, mode)));
    }

    let mut runs: Vec<Run> = Vec::new();
    for (start, end, fmt) in segments {
        if start == end {
            continue;
        }
        let text = &target[start..end];
        if let Some(last) = runs.last_mut() {
            if last.format == fmt {
                last.text.push_str(text);
                continue;
            }
        }
        runs.push(Run::new(text, fmt));
    }
    if runs.is_empty() && !target.is_empty() {
        runs.push(Run::new(target, base.clone()));
    }
    runs
}
