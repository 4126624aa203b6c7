use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::backend::{check_input_len, CancelToken, TranslateRequest, TranslationBackend};
use crate::error::TranslateError;

static HINT_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^- (.+?) => (.+?)(?: \(.*\))?$").expect("hint regex"));

/// Deterministic in-process backend for tests and the identity round-trip
/// mode. Looks texts up in a fixed table, falls back to echoing the input,
/// and honours `X => Y` glossary hint lines found in the prompt context the
/// way a well-behaved model would.
pub struct MockBackend {
    name: String,
    mapping: HashMap<String, String>,
    delay: Option<Duration>,
    max_input_chars: usize,
    transient_failures: AtomicU32,
    permanent: HashSet<String>,
}

impl MockBackend {
    pub fn identity() -> Self {
        Self::with_mapping(HashMap::new())
    }

    pub fn with_mapping(mapping: HashMap<String, String>) -> Self {
        Self {
            name: "mock".to_string(),
            mapping,
            delay: None,
            max_input_chars: 20_000,
            transient_failures: AtomicU32::new(0),
            permanent: HashSet::new(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_max_input_chars(mut self, max: usize) -> Self {
        self.max_input_chars = max;
        self
    }

    /// Fail the next `n` calls with a transient error.
    pub fn fail_transient(self, n: u32) -> Self {
        self.transient_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Always report a permanent error for this exact input text.
    pub fn fail_permanent_for(mut self, text: impl Into<String>) -> Self {
        self.permanent.insert(text.into());
        self
    }

    fn apply_hints(text: &str, context: &str) -> String {
        let mut out = text.to_string();
        for caps in HINT_LINE_RE.captures_iter(context) {
            let (src, tgt) = (caps[1].trim(), caps[2].trim());
            if !src.is_empty() {
                out = out.replace(src, tgt);
            }
        }
        out
    }
}

impl TranslationBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn max_input_chars(&self) -> usize {
        self.max_input_chars
    }

    fn translate(
        &self,
        req: &TranslateRequest<'_>,
        cancel: &CancelToken,
    ) -> Result<String, TranslateError> {
        cancel.check()?;
        check_input_len(req.text, self.max_input_chars)?;
        if let Some(delay) = self.delay {
            cancel.sleep(delay)?;
        }
        if self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(TranslateError::Transient("mock transient".to_string()));
        }
        if self.permanent.contains(req.text) {
            return Err(TranslateError::Permanent("mock permanent".to_string()));
        }

        let mut out = self
            .mapping
            .get(req.text)
            .cloned()
            .unwrap_or_else(|| req.text.to_string());
        if let Some(context) = req.context {
            out = Self::apply_hints(&out, context);
        }
        Ok(out)
    }
}
