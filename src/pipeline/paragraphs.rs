use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::warn;

use crate::backend::{CancelToken, TranslateRequest, TranslationBackend};
use crate::deck::model::ParaPayload;
use crate::error::TranslateError;
use crate::freezer::{freeze_text, missing_tokens, unfreeze_with_recovery};
use crate::glossary::Glossary;
use crate::pipeline::prompts::{render_template, PromptSet};
use crate::textutil::{is_trivial_text, lang_label};

/// The paragraph translation stage: compose prompt context, freeze
/// non-translatable spans, call the shared backend with retry, attach the
/// target text. Record-level failures are attached to the payload; only
/// cancellation propagates as an error.
pub struct ParagraphTranslator {
    backend: Arc<dyn TranslationBackend>,
    glossary: Arc<Glossary>,
    prompts: PromptSet,
    source_lang: String,
    target_lang: String,
    max_tries: u32,
    retry_base_ms: u64,
    timeout: Duration,
}

impl ParagraphTranslator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        backend: Arc<dyn TranslationBackend>,
        glossary: Arc<Glossary>,
        prompts: PromptSet,
        source_lang: &str,
        target_lang: &str,
        max_tries: u32,
        retry_base_ms: u64,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            glossary,
            prompts,
            source_lang: source_lang.to_string(),
            target_lang: target_lang.to_string(),
            max_tries: max_tries.max(1),
            retry_base_ms,
            timeout,
        }
    }

    pub fn backend(&self) -> &Arc<dyn TranslationBackend> {
        &self.backend
    }

    /// Translate one paragraph's worth of text in place. Returns
    /// `Err(Cancelled)` only for cancellation; every other failure is
    /// recorded on the payload and the text passes through untranslated.
    pub fn translate_payload(
        &self,
        para: &mut ParaPayload,
        extra_context: Option<&str>,
        timeout: Option<Duration>,
        cancel: &CancelToken,
    ) -> Result<(), TranslateError> {
        cancel.check()?;
        // Already translated (resumed from artifacts): nothing to do.
        if para.target_text.is_some() {
            return Ok(());
        }
        if para.is_empty() || is_trivial_text(&para.source_text) {
            return Ok(());
        }

        let frozen = freeze_text(&para.source_text);
        let context = self.compose_context(&para.source_text, extra_context);
        let req = TranslateRequest {
            text: &frozen.text,
            source_lang: &self.source_lang,
            target_lang: &self.target_lang,
            context: Some(&context),
            timeout: Some(timeout.unwrap_or(self.timeout)),
        };

        let mut translated = match self.call_with_retry(&req, cancel) {
            Ok(t) => t,
            // Cancellation and auth failures are for the orchestrator; every
            // other error stays on the record.
            Err(e) if matches!(e, TranslateError::Cancelled) || e.is_fatal() => return Err(e),
            Err(e) => {
                para.failure = Some(e.to_string());
                return Ok(());
            }
        };

        if !missing_tokens(&translated, &frozen.nt_map).is_empty() {
            match self.repair_tokens(&frozen.text, &translated, &frozen.nt_map, cancel) {
                Ok(repaired) => translated = repaired,
                Err(TranslateError::Cancelled) => return Err(TranslateError::Cancelled),
                Err(e) => warn!("token repair failed, recovering in place: {e}"),
            }
        }

        para.target_text = Some(unfreeze_with_recovery(&translated, &frozen.nt_map));
        Ok(())
    }

    fn compose_context(&self, source_text: &str, extra: Option<&str>) -> String {
        let mut context = render_template(
            &self.prompts.translate,
            &[
                ("source_lang", lang_label(&self.source_lang)),
                ("target_lang", lang_label(&self.target_lang)),
            ],
        );
        let fragment = self.glossary.prompt_fragment(source_text, None);
        if !fragment.is_empty() {
            context.push_str("\n\n");
            context.push_str(&fragment);
        }
        if let Some(extra) = extra {
            if !extra.trim().is_empty() {
                context.push_str("\n\n");
                context.push_str(extra);
            }
        }
        context
    }

    fn call_with_retry(
        &self,
        req: &TranslateRequest<'_>,
        cancel: &CancelToken,
    ) -> Result<String, TranslateError> {
        let mut last = TranslateError::Transient("no attempt made".to_string());
        for attempt in 0..self.max_tries {
            cancel.check()?;
            match self.backend.translate(req, cancel) {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() => {
                    last = e;
                    if attempt + 1 < self.max_tries {
                        cancel.sleep(backoff_delay(attempt, self.retry_base_ms))?;
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Err(last)
    }

    fn repair_tokens(
        &self,
        frozen_source: &str,
        bad: &str,
        nt_map: &std::collections::HashMap<String, String>,
        cancel: &CancelToken,
    ) -> Result<String, TranslateError> {
        let missing = missing_tokens(bad, nt_map).join(" ");
        let prompt = render_template(
            &self.prompts.repair,
            &[
                ("source", frozen_source),
                ("bad", bad),
                ("missing", &missing),
                ("source_lang", lang_label(&self.source_lang)),
                ("target_lang", lang_label(&self.target_lang)),
            ],
        );
        let req = TranslateRequest {
            text: frozen_source,
            source_lang: &self.source_lang,
            target_lang: &self.target_lang,
            context: Some(&prompt),
            timeout: Some(self.timeout),
        };
        let repaired = self.backend.translate(&req, cancel)?;
        if missing_tokens(&repaired, nt_map).len() < missing_tokens(bad, nt_map).len() {
            Ok(repaired)
        } else {
            Ok(bad.to_string())
        }
    }
}

/// Exponential backoff with deterministic-enough jitter from the clock's
/// sub-second noise; no RNG dependency needed for a retry delay.
fn backoff_delay(attempt: u32, base_ms: u64) -> Duration {
    let base = base_ms.max(1);
    let exp = base.saturating_mul(1u64 << attempt.min(6));
    let jitter = u64::from(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0),
    ) % base;
    Duration::from_millis(exp + jitter)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::backend::MockBackend;
    use crate::deck::model::{ParagraphProps, Run, RunFormat};
    use crate::glossary::{Glossary, GlossaryEntry};

    fn payload(text: &str) -> ParaPayload {
        ParaPayload::from_runs(
            ParagraphProps::default(),
            vec![Run::new(text, RunFormat::default())],
        )
    }

    fn translator(backend: MockBackend, glossary: Glossary) -> ParagraphTranslator {
        ParagraphTranslator::new(
            Arc::new(backend),
            Arc::new(glossary),
            PromptSet::default(),
            "en",
            "fr",
            3,
            1,
            Duration::from_secs(60),
        )
    }

    #[test]
    fn mapped_text_is_attached() {
        let mut map = HashMap::new();
        map.insert(
            "Employees attend training.".to_string(),
            "Les employés suivent une formation.".to_string(),
        );
        let t = translator(MockBackend::with_mapping(map), Glossary::default());
        let mut para = payload("Employees attend training.");
        t.translate_payload(&mut para, None, None, &CancelToken::new())
            .expect("ok");
        assert_eq!(
            para.target_text.as_deref(),
            Some("Les employés suivent une formation.")
        );
        assert!(para.failure.is_none());
    }

    #[test]
    fn trivial_and_empty_paragraphs_pass_through() {
        let t = translator(MockBackend::identity(), Glossary::default());
        for text in ["", "  ", "2024", "§ 12"] {
            let mut para = payload(text);
            t.translate_payload(&mut para, None, None, &CancelToken::new())
                .expect("ok");
            assert!(para.target_text.is_none(), "translated {text:?}");
        }
    }

    #[test]
    fn glossary_fragment_reaches_the_backend() {
        let glossary = Glossary::from_entries(vec![GlossaryEntry {
            source: "Senate".into(),
            target: "Sénat".into(),
            context: None,
            case_sensitive: true,
            priority: 10,
            note: None,
        }]);
        let t = translator(MockBackend::identity(), glossary.clone());
        let mut para = payload("The Senate convened.");
        t.translate_payload(&mut para, None, None, &CancelToken::new())
            .expect("ok");
        let target = para.target_text.expect("target");
        assert!(target.contains("Sénat"), "got {target}");
        assert!(glossary.verify("The Senate convened.", &target).compliant);
    }

    #[test]
    fn transient_errors_are_retried_to_success() {
        let backend = MockBackend::identity().fail_transient(2);
        let t = translator(backend, Glossary::default());
        let mut para = payload("Retry me please");
        t.translate_payload(&mut para, None, None, &CancelToken::new())
            .expect("ok");
        assert_eq!(para.target_text.as_deref(), Some("Retry me please"));
        assert!(para.failure.is_none());
    }

    #[test]
    fn exhausted_retries_attach_failure_and_pass_through() {
        let backend = MockBackend::identity().fail_transient(10);
        let t = translator(backend, Glossary::default());
        let mut para = payload("Never succeeds");
        t.translate_payload(&mut para, None, None, &CancelToken::new())
            .expect("ok");
        assert!(para.target_text.is_none());
        assert!(para.failure.as_deref().unwrap_or("").contains("transient"));
    }

    #[test]
    fn permanent_errors_are_not_retried() {
        let backend = MockBackend::identity().fail_permanent_for("Bad request text");
        let t = translator(backend, Glossary::default());
        let mut para = payload("Bad request text");
        t.translate_payload(&mut para, None, None, &CancelToken::new())
            .expect("ok");
        assert!(para.target_text.is_none());
        assert!(para.failure.as_deref().unwrap_or("").contains("permanent"));
    }

    #[test]
    fn cancellation_propagates() {
        let t = translator(MockBackend::identity(), Glossary::default());
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut para = payload("Some text");
        let err = t
            .translate_payload(&mut para, None, None, &cancel)
            .expect_err("cancelled");
        assert!(matches!(err, TranslateError::Cancelled));
    }

    #[test]
    fn frozen_urls_survive_translation() {
        let t = translator(MockBackend::identity(), Glossary::default());
        let mut para = payload("Details at https://example.com/policy today");
        t.translate_payload(&mut para, None, None, &CancelToken::new())
            .expect("ok");
        assert_eq!(
            para.target_text.as_deref(),
            Some("Details at https://example.com/policy today")
        );
    }

    #[test]
    fn backoff_grows_with_attempts() {
        let a = backoff_delay(0, 100);
        let b = backoff_delay(3, 100);
        assert!(a < Duration::from_millis(300));
        assert!(b >= Duration::from_millis(800));
    }
}
