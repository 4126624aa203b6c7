use std::collections::HashMap;

use tracing::warn;

use crate::align::embedding::{cosine, Embedder};
use crate::align::{covering_run_index, fill_gaps_and_coalesce, run_byte_spans, GapFill, SpanMatch};
use crate::deck::model::{Run, RunFormat};

const W_COSINE: f32 = 0.30;
const W_GLOSSARY: f32 = 0.40;
const W_LENGTH: f32 = 0.15;
const W_OVERLAP: f32 = 0.15;

const DEFAULT_MAX_NGRAM: usize = 4;
const DEFAULT_THRESHOLD: f32 = 0.3;

/// Strategy 1: score (source n-gram, target n-gram) pairs in a shared
/// embedding space boosted by glossary pairs, greedily pick non-overlapping
/// matches, then project each matched source span's majority run format onto
/// the matched target span.
pub struct SemanticAligner {
    embedder: Box<dyn Embedder>,
    phrase_pairs: HashMap<String, Vec<String>>,
    max_ngram: usize,
    threshold: f32,
}

impl SemanticAligner {
    pub fn new(embedder: Box<dyn Embedder>, phrase_pairs: HashMap<String, Vec<String>>) -> Self {
        Self {
            embedder,
            phrase_pairs,
            max_ngram: DEFAULT_MAX_NGRAM,
            threshold: DEFAULT_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub(crate) fn align_runs(
        &self,
        source_text: &str,
        runs: &[Run],
        target_text: &str,
        base: &RunFormat,
    ) -> Vec<Run> {
        let src_cands = candidates(source_text, self.max_ngram);
        let tgt_cands = candidates(target_text, self.max_ngram);
        if src_cands.is_empty() || tgt_cands.is_empty() {
            return fill_gaps_and_coalesce(target_text, Vec::new(), base, GapFill::PrecedingMatch);
        }

        let src_texts: Vec<String> = src_cands.iter().map(|c| c.text.clone()).collect();
        let tgt_texts: Vec<String> = tgt_cands.iter().map(|c| c.text.clone()).collect();
        let (src_vecs, tgt_vecs) = match (
            self.embedder.embed(&src_texts),
            self.embedder.embed(&tgt_texts),
        ) {
            (Ok(a), Ok(b)) => (a, b),
            (Err(e), _) | (_, Err(e)) => {
                warn!("embedding failed, paragraph keeps base format: {e}");
                return fill_gaps_and_coalesce(target_text, Vec::new(), base, GapFill::PrecedingMatch);
            }
        };

        struct Scored {
            score: f32,
            si: usize,
            ti: usize,
        }
        let mut scored: Vec<Scored> = Vec::new();
        for (si, sc) in src_cands.iter().enumerate() {
            let src_folded = sc.text.to_lowercase();
            let pair_targets = self.phrase_pairs.get(&src_folded);
            for (ti, tc) in tgt_cands.iter().enumerate() {
                let glossary = pair_targets
                    .is_some_and(|targets| targets.iter().any(|t| *t == tc.text.to_lowercase()));
                let score = W_COSINE * cosine(&src_vecs[si], &tgt_vecs[ti])
                    + W_GLOSSARY * if glossary { 1.0 } else { 0.0 }
                    + W_LENGTH * length_similarity(&sc.text, &tc.text)
                    + W_OVERLAP * bigram_dice(&sc.text, &tc.text);
                if score >= self.threshold {
                    scored.push(Scored { score, si, ti });
                }
            }
        }
        // Deterministic greedy order: best score first, position as tie-break.
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.si.cmp(&b.si))
                .then(a.ti.cmp(&b.ti))
        });

        // Non-overlap on both sides also guarantees the selected target spans
        // can never exceed the target text collectively.
        let mut taken_src: Vec<(usize, usize)> = Vec::new();
        let mut taken_tgt: Vec<(usize, usize)> = Vec::new();
        let mut selected: Vec<(usize, usize)> = Vec::new();
        for s in &scored {
            let ss = (src_cands[s.si].start, src_cands[s.si].end);
            let ts = (tgt_cands[s.ti].start, tgt_cands[s.ti].end);
            if overlaps_any(&taken_src, ss) || overlaps_any(&taken_tgt, ts) {
                continue;
            }
            taken_src.push(ss);
            taken_tgt.push(ts);
            selected.push((s.si, s.ti));
        }

        let spans = run_byte_spans(runs);
        let matches: Vec<SpanMatch> = selected
            .into_iter()
            .filter_map(|(si, ti)| {
                let src_span = (src_cands[si].start, src_cands[si].end);
                covering_run_index(runs, &spans, src_span).map(|ri| SpanMatch {
                    start: tgt_cands[ti].start,
                    end: tgt_cands[ti].end,
                    format: runs[ri].format.clone(),
                })
            })
            .collect();

        fill_gaps_and_coalesce(target_text, matches, base, GapFill::PrecedingMatch)
    }
}

fn overlaps_any(taken: &[(usize, usize)], span: (usize, usize)) -> bool {
    taken.iter().any(|&(s, e)| span.0 < e && s < span.1)
}

#[derive(Clone, Debug)]
struct Candidate {
    text: String,
    start: usize,
    end: usize,
}

/// Word tokens: maximal alphanumeric stretches, plus each non-alphanumeric
/// non-whitespace char on its own so punctuation aligns independently of the
/// word it trails.
fn tokens(text: &str) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let mut word_start: Option<usize> = None;
    for (idx, ch) in text.char_indices() {
        if ch.is_alphanumeric() {
            if word_start.is_none() {
                word_start = Some(idx);
            }
        } else {
            if let Some(start) = word_start.take() {
                out.push((start, idx));
            }
            if !ch.is_whitespace() {
                out.push((idx, idx + ch.len_utf8()));
            }
        }
    }
    if let Some(start) = word_start {
        out.push((start, text.len()));
    }
    out
}

/// All n-grams of 1..=k tokens, with character offsets into the text.
fn candidates(text: &str, k: usize) -> Vec<Candidate> {
    let toks = tokens(text);
    let mut out = Vec::new();
    for n in 1..=k.max(1) {
        if toks.len() < n {
            break;
        }
        for i in 0..=(toks.len() - n) {
            let start = toks[i].0;
            let end = toks[i + n - 1].1;
            out.push(Candidate {
                text: text[start..end].to_string(),
                start,
                end,
            });
        }
    }
    out
}

fn length_similarity(a: &str, b: &str) -> f32 {
    let (la, lb) = (a.chars().count(), b.chars().count());
    if la == 0 || lb == 0 {
        return 0.0;
    }
    la.min(lb) as f32 / la.max(lb) as f32
}

/// Dice coefficient over lowercase character bigrams; falls back to exact
/// equality for single-character candidates.
fn bigram_dice(a: &str, b: &str) -> f32 {
    let fold = |s: &str| -> Vec<(char, char)> {
        let chars: Vec<char> = s.to_lowercase().chars().collect();
        chars.windows(2).map(|w| (w[0], w[1])).collect()
    };
    let (ba, bb) = (fold(a), fold(b));
    if ba.is_empty() || bb.is_empty() {
        return if a.to_lowercase() == b.to_lowercase() {
            1.0
        } else {
            0.0
        };
    }
    let mut remaining = bb.clone();
    let mut common = 0usize;
    for bigram in &ba {
        if let Some(pos) = remaining.iter().position(|x| x == bigram) {
            remaining.swap_remove(pos);
            common += 1;
        }
    }
    2.0 * common as f32 / (ba.len() + bb.len()) as f32
}
