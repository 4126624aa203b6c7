//! Non-translatable span freezing. Spans that must survive verbatim are
//! replaced with opaque tokens before the backend call and restored
//! afterwards, so the model cannot mangle them. The pattern set is tuned for
//! slide text: links, social handles and template placeholders shown on
//! slides, dotted section/version numbers, leader fills, and marked names.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

const NT_ID_WIDTH: usize = 4;

pub fn nt_token(nt_id: usize) -> String {
    format!("<<NT:{nt_id:0NT_ID_WIDTH$}>>")
}

pub static NT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<<NT:(\d{4})>>").expect("nt regex"));

static FREEZE_RE: Lazy<Regex> = Lazy::new(|| {
    let patterns = [
        // Links, bare www hosts included: decks show them without a scheme.
        r#"(?:https?://|www\.)[^\s<>()"']+"#,
        r"\b[\w.%+-]+@[\w.-]+\.[A-Za-z]{2,63}\b",
        // Social handles and campaign hashtags.
        r"[@#][A-Za-z0-9_]{2,30}\b",
        // Template placeholders, double-brace before single-brace.
        r"\{\{[^{}\r\n]{1,80}\}\}",
        r"\{[^{}\r\n]{1,80}\}",
        // Dotted section/version numbers ("4.1.2", "2.0-2.3").
        r"\b\d+(?:\.\d+)+(?:-\d+(?:\.\d+)*)?\b",
        // Leader fills on agenda slides; short ellipses stay translatable.
        r"\.{6,}",
        r"…{2,}",
        r"_{4,}",
        // Product names carrying a mark.
        r"[\p{L}\p{N}][\p{L}\p{N}&.-]{0,28}[®™]",
    ];
    Regex::new(&patterns.join("|")).expect("freeze regex")
});

#[derive(Debug, Clone)]
pub struct FreezeResult {
    pub text: String,
    pub nt_map: HashMap<String, String>,
}

pub fn freeze_text(text: &str) -> FreezeResult {
    let mut nt_map: HashMap<String, String> = HashMap::new();
    let mut next_id: usize = 1;
    let mut out = String::with_capacity(text.len());
    let mut pos = 0usize;

    for m in FREEZE_RE.find_iter(text) {
        out.push_str(&text[pos..m.start()]);
        let token = nt_token(next_id);
        next_id += 1;
        nt_map.insert(token.clone(), m.as_str().to_string());
        out.push_str(&token);
        pos = m.end();
    }
    out.push_str(&text[pos..]);

    FreezeResult { text: out, nt_map }
}

pub fn unfreeze_text(text: &str, nt_map: &HashMap<String, String>) -> String {
    if nt_map.is_empty() || text.is_empty() {
        return text.to_string();
    }
    NT_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let tok = caps.get(0).unwrap().as_str();
            nt_map.get(tok).cloned().unwrap_or_else(|| tok.to_string())
        })
        .into_owned()
}

/// Frozen tokens the translation dropped, in token order.
pub fn missing_tokens(translated: &str, nt_map: &HashMap<String, String>) -> Vec<String> {
    let mut missing: Vec<String> = nt_map
        .keys()
        .filter(|tok| !translated.contains(tok.as_str()))
        .cloned()
        .collect();
    missing.sort();
    missing
}

/// Last-resort recovery: append the originals of dropped tokens so their
/// content is not lost, then unfreeze.
pub fn unfreeze_with_recovery(translated: &str, nt_map: &HashMap<String, String>) -> String {
    let mut text = translated.to_string();
    for token in missing_tokens(translated, nt_map) {
        if let Some(original) = nt_map.get(&token) {
            if !text.is_empty() && !text.ends_with(' ') {
                text.push(' ');
            }
            text.push_str(original);
        }
    }
    unfreeze_text(&text, nt_map)
}
