use std::path::PathBuf;
use std::time::Duration;

use crate::align::AlignStrategy;
use crate::config::AppConfig;

/// Pipeline knobs with every default resolved, shared by all jobs of one
/// manager. Per-job overrides (workers, timeout, strategy) are applied on a
/// clone at submit time.
#[derive(Clone, Debug)]
pub struct PipelineSettings {
    pub strategy: AlignStrategy,
    pub workers: usize,
    pub paragraph_timeout: Duration,
    pub label_timeout: Duration,
    pub max_tries: u32,
    pub retry_base_ms: u64,
    pub cancel_check_every: usize,
    pub work_dir: PathBuf,
    pub retention: Duration,
    pub embedding_url: Option<String>,
    pub embedding_dim: usize,
    pub context_max_pairs: usize,
    pub context_max_chars: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            strategy: AlignStrategy::Semantic,
            workers: 4,
            paragraph_timeout: Duration::from_secs(60),
            label_timeout: Duration::from_secs(30),
            max_tries: 3,
            retry_base_ms: 500,
            cancel_check_every: 1,
            work_dir: std::env::temp_dir().join("deck-translator"),
            retention: Duration::from_secs(3600),
            embedding_url: None,
            embedding_dim: 256,
            context_max_pairs: 12,
            context_max_chars: 2000,
        }
    }
}

impl PipelineSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        let mut s = Self::default();
        let p = &cfg.pipeline;
        if let Some(strategy) = p.strategy.as_deref() {
            if let Ok(parsed) = strategy.parse() {
                s.strategy = parsed;
            }
        }
        if let Some(workers) = p.workers {
            s.workers = workers.max(1);
        }
        if let Some(secs) = p.paragraph_timeout_secs {
            s.paragraph_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = p.label_timeout_secs {
            s.label_timeout = Duration::from_secs(secs);
        }
        if let Some(tries) = p.max_tries {
            s.max_tries = tries.max(1);
        }
        if let Some(ms) = p.retry_base_ms {
            s.retry_base_ms = ms;
        }
        if let Some(every) = p.cancel_check_every {
            s.cancel_check_every = every.max(1);
        }
        if let Some(dir) = p.work_dir.as_ref() {
            s.work_dir = dir.clone();
        }
        if let Some(secs) = p.retention_secs {
            s.retention = Duration::from_secs(secs);
        }
        s.embedding_url = p.embedding_url.clone();
        if let Some(dim) = p.embedding_dim {
            s.embedding_dim = dim;
        }
        if let Some(pairs) = p.context_max_pairs {
            s.context_max_pairs = pairs;
        }
        if let Some(chars) = p.context_max_chars {
            s.context_max_chars = chars;
        }
        s
    }
}
