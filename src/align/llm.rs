use std::sync::Arc;

use tracing::warn;

use crate::align::{differs_from_base, fill_gaps_and_coalesce, GapFill, SpanMatch};
use crate::backend::{CancelToken, TranslateRequest, TranslationBackend};
use crate::deck::model::{Run, RunFormat};
use crate::error::TranslateError;
use crate::pipeline::prompts::render_template;

/// Strategy 2: use the job's shared translation backend reflectively. For
/// each formatted source run, ask which contiguous substring of the target
/// corresponds to it; responses that are not substrings are treated as
/// unmatched.
pub struct LlmAligner {
    backend: Arc<dyn TranslationBackend>,
    source_lang: String,
    target_lang: String,
    prompt_template: String,
}

impl LlmAligner {
    pub fn new(
        backend: Arc<dyn TranslationBackend>,
        source_lang: &str,
        target_lang: &str,
        prompt_template: &str,
    ) -> Self {
        Self {
            backend,
            source_lang: source_lang.to_string(),
            target_lang: target_lang.to_string(),
            prompt_template: prompt_template.to_string(),
        }
    }

    pub(crate) fn align_runs(
        &self,
        source_text: &str,
        runs: &[Run],
        target_text: &str,
        base: &RunFormat,
        cancel: &CancelToken,
    ) -> Vec<Run> {
        let mut matches: Vec<SpanMatch> = Vec::new();
        let mut taken: Vec<(usize, usize)> = Vec::new();

        for run in runs {
            if run.is_whitespace() || !differs_from_base(&run.format, base) {
                continue;
            }
            if cancel.is_cancelled() {
                break;
            }
            let prompt = render_template(
                &self.prompt_template,
                &[
                    ("source", source_text),
                    ("target", target_text),
                    ("span", &run.text),
                ],
            );
            let req = TranslateRequest {
                text: &run.text,
                source_lang: &self.source_lang,
                target_lang: &self.target_lang,
                context: Some(&prompt),
                timeout: None,
            };
            let mapped = match self.backend.translate(&req, cancel) {
                Ok(m) => m,
                Err(TranslateError::Cancelled) => break,
                Err(e) => {
                    warn!("span mapping failed, span unmatched: {e}");
                    continue;
                }
            };
            let mapped = mapped.trim();
            if mapped.is_empty() {
                continue;
            }
            let Some(start) = find_non_overlapping(target_text, mapped, &taken) else {
                continue;
            };
            let end = start + mapped.len();
            taken.push((start, end));
            matches.push(SpanMatch {
                start,
                end,
                format: run.format.clone(),
            });
        }

        fill_gaps_and_coalesce(target_text, matches, base, GapFill::Base)
    }
}

/// First occurrence of `needle` in `haystack` that does not overlap an
/// already-claimed span.
fn find_non_overlapping(haystack: &str, needle: &str, taken: &[(usize, usize)]) -> Option<usize> {
    haystack
        .match_indices(needle)
        .map(|(start, _)| start)
        .find(|&start| {
            let end = start + needle.len();
            !taken.iter().any(|&(s, e)| start < e && s < end)
        })
}
