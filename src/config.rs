use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::backend::{HostedBackend, HttpBackend, MockBackend, TranslationBackend};
use crate::error::JobError;

pub const DEFAULT_CONFIG_FILENAME: &str = "deck-translator.toml";
pub const CONFIG_ENV_VAR: &str = "DECK_TRANSLATOR_CONFIG";

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub backends: HashMap<String, BackendSection>,
    #[serde(default)]
    pub glossary: GlossarySection,
    #[serde(default)]
    pub prompts: PromptsSection,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct PipelineSection {
    /// Backend name from `[backends]` used when a job does not pick one.
    #[serde(default)]
    pub backend: Option<String>,

    /// Alignment strategy: "semantic" or "llm".
    #[serde(default)]
    pub strategy: Option<String>,

    /// Per-job worker pool size for record-level translation fan-out.
    #[serde(default)]
    pub workers: Option<usize>,

    #[serde(default)]
    pub paragraph_timeout_secs: Option<u64>,
    #[serde(default)]
    pub label_timeout_secs: Option<u64>,

    /// Total attempts per record for transient backend errors.
    #[serde(default)]
    pub max_tries: Option<u32>,
    #[serde(default)]
    pub retry_base_ms: Option<u64>,

    /// Cancellation is checked every N records inside stage loops.
    #[serde(default)]
    pub cancel_check_every: Option<usize>,

    /// Job artifact root; a `job-<id>` directory is created per job.
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
    /// Terminal jobs and their artifacts are pruned after this long.
    #[serde(default)]
    pub retention_secs: Option<u64>,

    /// Remote embedding service for the semantic aligner; the in-process
    /// fallback is used when unset.
    #[serde(default)]
    pub embedding_url: Option<String>,
    #[serde(default)]
    pub embedding_dim: Option<usize>,

    /// Bounds on the per-slide context passed to chart/table translation.
    #[serde(default)]
    pub context_max_pairs: Option<usize>,
    #[serde(default)]
    pub context_max_chars: Option<usize>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct BackendSection {
    /// "mock", "http" or "hosted".
    pub kind: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    /// Environment variable holding the hosted API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub max_input_chars: Option<usize>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Mock only: deterministic source -> target table.
    #[serde(default)]
    pub mapping: HashMap<String, String>,
    /// Mock only: per-call latency in milliseconds.
    #[serde(default)]
    pub delay_ms: Option<u64>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct GlossarySection {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct PromptsSection {
    #[serde(default)]
    pub translate: Option<String>,
    #[serde(default)]
    pub align_span: Option<String>,
    #[serde(default)]
    pub repair: Option<String>,
}

pub fn find_file_upwards(start: &Path, filename: &str, max_depth: usize) -> Option<PathBuf> {
    let mut dir = Some(start.to_path_buf());
    for _ in 0..max_depth {
        let d = dir?;
        let candidate = d.join(filename);
        if candidate.is_file() {
            return Some(candidate);
        }
        dir = d.parent().map(|p| p.to_path_buf());
    }
    None
}

pub fn find_default_config() -> Option<PathBuf> {
    if let Ok(p) = std::env::var(CONFIG_ENV_VAR) {
        let p = PathBuf::from(p);
        if p.is_file() {
            return Some(p);
        }
    }
    let cwd = std::env::current_dir().ok()?;
    find_file_upwards(&cwd, DEFAULT_CONFIG_FILENAME, 8)
}

pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    let cfg: AppConfig = toml::from_str(&text).context("parse config toml")?;
    Ok(cfg)
}

const DEFAULT_CONFIG_TEMPLATE: &str = r#"# deck-translator configuration

[pipeline]
# Default backend from [backends.*] when a job does not select one.
backend = "worker"
# Alignment strategy: "semantic" (embedding-based) or "llm" (backend-based).
strategy = "semantic"
# Record-level worker pool per job.
workers = 4
paragraph_timeout_secs = 60
label_timeout_secs = 30
max_tries = 3
# work_dir = "/var/tmp/deck-translator"
# retention_secs = 3600
# embedding_url = "http://127.0.0.1:9090/embed"

[backends.worker]
kind = "http"
url = "http://127.0.0.1:8080/translate"

# [backends.hosted]
# kind = "hosted"
# url = "https://api.example.com/v1"
# model = "large-mt"
# api_key_env = "DECK_TRANSLATOR_API_KEY"

[glossary]
# path = "glossary.toml"

# [prompts]
# translate = "prompts/translate.txt"
# align_span = "prompts/align_span.txt"
# repair = "prompts/repair.txt"
"#;

pub fn init_default_config(dir: &Path, force: bool) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create config dir: {}", dir.display()))?;
    let path = dir.join(DEFAULT_CONFIG_FILENAME);
    if path.exists() && !force {
        anyhow::bail!("config already exists (use --force): {}", path.display());
    }
    std::fs::write(&path, DEFAULT_CONFIG_TEMPLATE)
        .with_context(|| format!("write config: {}", path.display()))?;
    Ok(path)
}

/// Construct the single backend instance a job will share between the
/// paragraph translator and the LLM aligner.
pub fn build_backend(
    name: &str,
    section: &BackendSection,
    default_timeout: Duration,
) -> Result<Arc<dyn TranslationBackend>, JobError> {
    let timeout = section
        .timeout_secs
        .map(Duration::from_secs)
        .unwrap_or(default_timeout);
    let max_input = section.max_input_chars.unwrap_or(8_000);
    match section.kind.as_str() {
        "mock" => {
            let mut backend = MockBackend::with_mapping(section.mapping.clone())
                .with_max_input_chars(max_input);
            if let Some(ms) = section.delay_ms {
                backend = backend.with_delay(Duration::from_millis(ms));
            }
            Ok(Arc::new(backend))
        }
        "http" => {
            let url = section.url.as_deref().ok_or_else(|| {
                JobError::BackendNotConfigured(format!("{name}: http backend needs `url`"))
            })?;
            Ok(Arc::new(HttpBackend::new(name, url, timeout, max_input)))
        }
        "hosted" => {
            let url = section.url.as_deref().ok_or_else(|| {
                JobError::BackendNotConfigured(format!("{name}: hosted backend needs `url`"))
            })?;
            let model = section.model.as_deref().unwrap_or("default");
            let key_env = section.api_key_env.as_deref().ok_or_else(|| {
                JobError::BackendNotConfigured(format!("{name}: hosted backend needs `api_key_env`"))
            })?;
            let api_key = std::env::var(key_env).map_err(|_| {
                JobError::BackendNotConfigured(format!("{name}: env var {key_env} is not set"))
            })?;
            Ok(Arc::new(HostedBackend::new(
                name, url, model, api_key, timeout, max_input,
            )))
        }
        other => Err(JobError::BackendNotConfigured(format!(
            "{name}: unknown backend kind: {other}"
        ))),
    }
}
