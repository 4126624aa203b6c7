use thiserror::Error;

/// Errors surfaced by translation backends. Only `Transient` is retryable;
/// `Auth` is the one record-level kind that escalates to job failure.
#[derive(Clone, Debug, Error)]
pub enum TranslateError {
    #[error("transient backend error: {0}")]
    Transient(String),

    #[error("permanent backend error: {0}")]
    Permanent(String),

    #[error("backend rejected credentials: {0}")]
    Auth(String),

    #[error("translation cancelled")]
    Cancelled,

    #[error("input of {len} chars exceeds backend limit of {max}")]
    TooLong { len: usize, max: usize },
}

impl TranslateError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, TranslateError::Transient(_))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, TranslateError::Auth(_))
    }
}

#[derive(Debug, Error)]
pub enum DeckError {
    #[error("deck malformed: {0}")]
    Malformed(String),

    #[error("write output deck: {0}")]
    WriterIo(String),
}

#[derive(Debug, Error)]
pub enum GlossaryError {
    #[error("glossary load: {0}")]
    Load(String),

    #[error("read glossary {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Host-facing errors from the job manager surface.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("unknown job: {0}")]
    UnknownJob(String),

    #[error("job is not completed (state: {0})")]
    NotCompleted(String),

    #[error(transparent)]
    Glossary(#[from] GlossaryError),

    #[error("backend not configured: {0}")]
    BackendNotConfigured(String),
}
