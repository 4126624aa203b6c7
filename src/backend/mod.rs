use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::TranslateError;

mod hosted;
mod http;
mod mock;

pub use hosted::HostedBackend;
pub use http::HttpBackend;
pub use mock::MockBackend;

/// Cooperative cancellation flag shared between the job manager, the
/// orchestrator loops and in-flight backend calls.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), TranslateError> {
        if self.is_cancelled() {
            Err(TranslateError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleep in small slices so a cancel request interrupts the wait.
    pub fn sleep(&self, total: Duration) -> Result<(), TranslateError> {
        let slice = Duration::from_millis(10);
        let mut remaining = total;
        while remaining > Duration::ZERO {
            self.check()?;
            let step = remaining.min(slice);
            std::thread::sleep(step);
            remaining = remaining.saturating_sub(step);
        }
        self.check()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct TranslateRequest<'a> {
    pub text: &'a str,
    pub source_lang: &'a str,
    pub target_lang: &'a str,
    /// Composed prompt context: glossary fragment, slide context, span-mapping
    /// instructions. Interpretation is up to the implementation.
    pub context: Option<&'a str>,
    /// Per-record deadline; implementations with no transport timeout may
    /// ignore it. `None` uses the backend's configured default.
    pub timeout: Option<Duration>,
}

impl<'a> TranslateRequest<'a> {
    pub fn new(text: &'a str, source_lang: &'a str, target_lang: &'a str) -> Self {
        Self {
            text,
            source_lang,
            target_lang,
            context: None,
            timeout: None,
        }
    }
}

/// The single capability every translation backend provides. Implementations
/// must be safe for concurrent calls; exactly one instance is constructed per
/// job and shared between the paragraph translator and the LLM aligner.
pub trait TranslationBackend: Send + Sync {
    fn name(&self) -> &str;

    fn max_input_chars(&self) -> usize;

    fn translate(
        &self,
        req: &TranslateRequest<'_>,
        cancel: &CancelToken,
    ) -> Result<String, TranslateError>;
}

impl std::fmt::Debug for dyn TranslationBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslationBackend")
            .field("name", &self.name())
            .finish()
    }
}

pub(crate) fn check_input_len(text: &str, max: usize) -> Result<(), TranslateError> {
    let len = text.chars().count();
    if len > max {
        Err(TranslateError::TooLong { len, max })
    } else {
        Ok(())
    }
}
