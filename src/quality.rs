//! Post-translation sanity checks. These never fail a record; they produce
//! flags that are logged and summarized in the job warnings so a reviewer
//! knows which slides deserve a look.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::deck::model::DeckTree;
use crate::freezer::NT_RE;

static DIGIT_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("digit regex"));

/// Short sources legitimately translate to identical or wildly different
/// lengths; the ratio checks only engage past this size.
const LEN_CHECK_MIN_CHARS: usize = 20;

/// Check one translated record. Returns flag names, empty when clean.
pub fn check_translation(source: &str, target: &str) -> Vec<&'static str> {
    let mut flags = Vec::new();
    let src = source.trim();
    let tgt = target.trim();
    if tgt.is_empty() {
        flags.push("empty_output");
        return flags;
    }

    if NT_RE.is_match(tgt) {
        flags.push("leftover_placeholder_token");
    }

    if digit_runs(src) != digit_runs(tgt) {
        flags.push("digits_mismatch");
    }

    let src_chars = src.chars().count();
    let tgt_chars = tgt.chars().count();
    if src_chars >= LEN_CHECK_MIN_CHARS {
        let ratio = tgt_chars as f32 / src_chars as f32;
        if ratio < 0.2 {
            flags.push("target_too_short");
        } else if ratio > 5.0 {
            flags.push("target_too_long");
        }
        if src == tgt && src.chars().any(char::is_alphabetic) {
            flags.push("output_identical_to_source");
        }
    }

    if tgt.contains("Use these exact translations")
        || tgt.contains("Translate the text from")
    {
        flags.push("prompt_echo");
    }

    flags
}

/// Multiset of digit runs; "4.1" and "41" must not be confused.
fn digit_runs(text: &str) -> HashMap<&str, usize> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for m in DIGIT_RUN_RE.find_iter(text) {
        *counts.entry(m.as_str()).or_insert(0) += 1;
    }
    counts
}

/// Run the checks over every translated record and aggregate counts per flag.
pub fn review_tree(tree: &DeckTree) -> HashMap<&'static str, usize> {
    let mut counts: HashMap<&'static str, usize> = HashMap::new();
    let mut tally = |source: &str, target: Option<&str>| {
        let Some(target) = target else { return };
        for flag in check_translation(source, target) {
            *counts.entry(flag).or_insert(0) += 1;
        }
    };

    for rec in &tree.paragraphs {
        tally(&rec.para.source_text, rec.para.target_text.as_deref());
    }
    for cell in &tree.cells {
        for para in &cell.paragraphs {
            tally(&para.source_text, para.target_text.as_deref());
        }
    }
    for label in &tree.chart_labels {
        tally(&label.source_text, label.target_text.as_deref());
    }
    counts
}
