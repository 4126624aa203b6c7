use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::align::AlignStrategy;
use crate::backend::CancelToken;
use crate::config::{build_backend, AppConfig};
use crate::error::JobError;
use crate::glossary::{Glossary, GlossaryEntry};
use crate::pipeline::runner::{run_pipeline, JobContext, Milestone, PipelineFailure, ProgressSink};
use crate::pipeline::{ArtifactStore, PipelineSettings, PromptSet};

pub type JobId = Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelOutcome {
    Requested,
    AlreadyTerminal,
}

/// Per-submit options; unset fields fall back to the manager's configuration.
#[derive(Clone, Debug, Default)]
pub struct JobOptions {
    /// Auto-detected from the deck text when unset.
    pub source_lang: Option<String>,
    pub target_lang: String,
    pub backend: Option<String>,
    pub strategy: Option<AlignStrategy>,
    pub workers: Option<usize>,
    pub record_timeout_secs: Option<u64>,
    pub glossary: Option<GlossarySource>,
    /// Artifact directory of an earlier run of the same deck; matching
    /// records skip re-translation.
    pub resume_from: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub enum GlossarySource {
    Path(PathBuf),
    Inline(Vec<GlossaryEntry>),
}

/// Host-facing job snapshot; serializable so a surrounding HTTP layer can
/// return it directly.
#[derive(Clone, Debug, Serialize)]
pub struct JobStatus {
    pub id: JobId,
    pub state: JobState,
    pub progress_percent: u8,
    pub milestone: Option<&'static str>,
    pub error: Option<String>,
    pub warnings: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

struct JobData {
    state: JobState,
    progress: u8,
    milestone: Option<Milestone>,
    error: Option<String>,
    warnings: Vec<String>,
    output: Option<Vec<u8>>,
    taken: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    artifact_dir: Option<PathBuf>,
}

struct JobEntry {
    id: JobId,
    cancel: CancelToken,
    data: Mutex<JobData>,
}

impl JobEntry {
    fn touch(data: &mut JobData) {
        data.updated_at = Utc::now();
    }
}

struct EntrySink(Arc<JobEntry>);

impl ProgressSink for EntrySink {
    fn update(&self, milestone: Milestone, done: usize, total: usize) {
        let mut data = self.0.data.lock().expect("job lock");
        let pct = milestone.percent(done, total);
        // Progress never moves backwards while running.
        if pct > data.progress {
            data.progress = pct;
        }
        data.milestone = Some(milestone);
        JobEntry::touch(&mut data);
    }

    fn warn(&self, message: String) {
        warn!(job = %self.0.id, "{message}");
        let mut data = self.0.data.lock().expect("job lock");
        data.warnings.push(message);
        JobEntry::touch(&mut data);
    }
}

/// The job table and lifecycle driver: one orchestrator thread per job,
/// cooperative cancellation, retention-based pruning.
pub struct JobManager {
    config: AppConfig,
    settings: PipelineSettings,
    prompts: PromptSet,
    glossary: Option<Arc<Glossary>>,
    jobs: Mutex<HashMap<JobId, Arc<JobEntry>>>,
}

impl JobManager {
    pub fn new(config: AppConfig) -> Result<Self, JobError> {
        let settings = PipelineSettings::from_config(&config);
        let prompts = PromptSet::from_config(None, &config)
            .map_err(|e| JobError::BackendNotConfigured(format!("prompt templates: {e}")))?;
        let glossary = match config.glossary.path.as_ref() {
            Some(path) => Some(Arc::new(Glossary::load(path)?)),
            None => None,
        };
        Ok(Self {
            config,
            settings,
            prompts,
            glossary,
            jobs: Mutex::new(HashMap::new()),
        })
    }

    /// The process-wide glossary, for host inspection.
    pub fn glossary_entries(&self) -> Vec<GlossaryEntry> {
        self.glossary
            .as_ref()
            .map(|g| g.entries().to_vec())
            .unwrap_or_default()
    }

    pub fn submit(&self, deck: Vec<u8>, options: JobOptions) -> Result<JobId, JobError> {
        self.prune_expired();

        let glossary = match options.glossary.as_ref() {
            Some(GlossarySource::Path(path)) => Arc::new(Glossary::load(path)?),
            Some(GlossarySource::Inline(entries)) => {
                Arc::new(Glossary::from_entries(entries.clone()))
            }
            None => self
                .glossary
                .clone()
                .unwrap_or_else(|| Arc::new(Glossary::default())),
        };

        let mut settings = self.settings.clone();
        if let Some(workers) = options.workers {
            settings.workers = workers.max(1);
        }
        if let Some(secs) = options.record_timeout_secs {
            settings.paragraph_timeout = Duration::from_secs(secs);
            settings.label_timeout = Duration::from_secs(secs);
        }
        let strategy = options.strategy.unwrap_or(settings.strategy);

        let backend_name = options
            .backend
            .as_deref()
            .or(self.config.pipeline.backend.as_deref())
            .ok_or_else(|| {
                JobError::BackendNotConfigured("no backend selected or configured".to_string())
            })?;
        let section = self.config.backends.get(backend_name).ok_or_else(|| {
            JobError::BackendNotConfigured(format!("unknown backend: {backend_name}"))
        })?;
        let backend = build_backend(backend_name, section, settings.paragraph_timeout)?;

        let id = Uuid::new_v4();
        let digest = hex::encode(Sha256::digest(&deck));
        info!(job = %id, backend = backend_name, deck_sha256 = %digest, "job submitted");

        let artifacts = match ArtifactStore::create(settings.work_dir.join(format!("job-{id}"))) {
            Ok(store) => Some(store),
            Err(e) => {
                warn!(job = %id, "artifact dir unavailable, continuing without: {e}");
                None
            }
        };
        let artifact_dir = artifacts.as_ref().map(|a| a.dir().to_path_buf());

        let now = Utc::now();
        let entry = Arc::new(JobEntry {
            id,
            cancel: CancelToken::new(),
            data: Mutex::new(JobData {
                state: JobState::Pending,
                progress: 0,
                milestone: None,
                error: None,
                warnings: Vec::new(),
                output: None,
                taken: false,
                created_at: now,
                updated_at: now,
                artifact_dir,
            }),
        });
        self.jobs
            .lock()
            .expect("job table lock")
            .insert(id, entry.clone());

        let ctx = JobContext {
            deck,
            source_lang: options.source_lang.clone(),
            target_lang: options.target_lang.clone(),
            backend,
            glossary,
            strategy,
            settings,
            prompts: self.prompts.clone(),
            cancel: entry.cancel.clone(),
            artifacts,
            resume_from: options.resume_from.clone(),
        };

        let thread_entry = entry.clone();
        std::thread::spawn(move || {
            {
                let mut data = thread_entry.data.lock().expect("job lock");
                data.state = JobState::Running;
                JobEntry::touch(&mut data);
            }
            let sink = EntrySink(thread_entry.clone());
            let outcome =
                std::panic::catch_unwind(AssertUnwindSafe(|| run_pipeline(&ctx, &sink)));

            let mut data = thread_entry.data.lock().expect("job lock");
            match outcome {
                Ok(Ok(bytes)) => {
                    data.state = JobState::Completed;
                    data.progress = 100;
                    data.output = Some(bytes);
                    info!(job = %thread_entry.id, "job completed");
                }
                Ok(Err(PipelineFailure::Cancelled)) => {
                    data.state = JobState::Cancelled;
                    data.output = None;
                    // Partial artifacts are discarded with the cancelled job.
                    if let Some(dir) = data.artifact_dir.take() {
                        let _ = std::fs::remove_dir_all(dir);
                    }
                    info!(job = %thread_entry.id, "job cancelled");
                }
                Ok(Err(failure)) => {
                    data.state = JobState::Failed;
                    data.error = Some(failure.to_string());
                    error!(job = %thread_entry.id, "job failed: {failure}");
                }
                Err(_) => {
                    data.state = JobState::Failed;
                    data.error = Some("internal pipeline panic".to_string());
                    error!(job = %thread_entry.id, "job failed: pipeline panicked");
                }
            }
            JobEntry::touch(&mut data);
        });

        Ok(id)
    }

    pub fn status(&self, id: JobId) -> Result<JobStatus, JobError> {
        let entry = self.entry(id)?;
        let data = entry.data.lock().expect("job lock");
        Ok(JobStatus {
            id,
            state: data.state,
            progress_percent: data.progress,
            milestone: data.milestone.map(|m| m.as_str()),
            error: data.error.clone(),
            warnings: data.warnings.clone(),
            created_at: data.created_at,
            updated_at: data.updated_at,
        })
    }

    pub fn cancel(&self, id: JobId) -> Result<CancelOutcome, JobError> {
        let entry = self.entry(id)?;
        let data = entry.data.lock().expect("job lock");
        if data.state.is_terminal() {
            return Ok(CancelOutcome::AlreadyTerminal);
        }
        drop(data);
        entry.cancel.cancel();
        Ok(CancelOutcome::Requested)
    }

    /// Output bytes of a completed job. The job is marked as downloaded and
    /// becomes eligible for pruning.
    pub fn result(&self, id: JobId) -> Result<Vec<u8>, JobError> {
        let entry = self.entry(id)?;
        let mut data = entry.data.lock().expect("job lock");
        if data.state != JobState::Completed {
            return Err(JobError::NotCompleted(data.state.as_str().to_string()));
        }
        let bytes = data
            .output
            .clone()
            .ok_or_else(|| JobError::NotCompleted("output missing".to_string()))?;
        data.taken = true;
        JobEntry::touch(&mut data);
        Ok(bytes)
    }

    /// Drop terminal jobs that were downloaded or outlived the retention
    /// window, along with their artifact directories.
    pub fn prune_expired(&self) {
        let retention =
            chrono::Duration::from_std(self.settings.retention).unwrap_or(chrono::Duration::zero());
        let mut jobs = self.jobs.lock().expect("job table lock");
        jobs.retain(|id, entry| {
            let data = entry.data.lock().expect("job lock");
            if !data.state.is_terminal() {
                return true;
            }
            let expired = Utc::now() - data.updated_at >= retention;
            if data.taken || expired {
                if let Some(dir) = data.artifact_dir.as_ref() {
                    let _ = std::fs::remove_dir_all(dir);
                }
                info!(job = %id, "pruned job");
                false
            } else {
                true
            }
        });
    }

    fn entry(&self, id: JobId) -> Result<Arc<JobEntry>, JobError> {
        self.jobs
            .lock()
            .expect("job table lock")
            .get(&id)
            .cloned()
            .ok_or_else(|| JobError::UnknownJob(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::config::BackendSection;
    use crate::deck::model::{ChartLabelKind, RunFormat};
    use crate::deck::{extract_deck, testdeck};

    fn mock_section(mapping: &[(&str, &str)], delay_ms: Option<u64>) -> BackendSection {
        BackendSection {
            kind: "mock".to_string(),
            url: None,
            model: None,
            api_key_env: None,
            max_input_chars: None,
            timeout_secs: None,
            mapping: mapping
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            delay_ms,
        }
    }

    fn manager(
        mapping: &[(&str, &str)],
        strategy: &str,
        work_dir: &std::path::Path,
        delay_ms: Option<u64>,
    ) -> JobManager {
        let mut cfg = AppConfig::default();
        cfg.pipeline.backend = Some("mock".to_string());
        cfg.pipeline.strategy = Some(strategy.to_string());
        cfg.pipeline.work_dir = Some(work_dir.to_path_buf());
        cfg.pipeline.retry_base_ms = Some(1);
        cfg.backends
            .insert("mock".to_string(), mock_section(mapping, delay_ms));
        JobManager::new(cfg).expect("manager")
    }

    fn options(target: &str) -> JobOptions {
        JobOptions {
            source_lang: Some("en".to_string()),
            target_lang: target.to_string(),
            ..JobOptions::default()
        }
    }

    fn wait_terminal(mgr: &JobManager, id: JobId, timeout: Duration) -> JobStatus {
        let start = Instant::now();
        loop {
            let status = mgr.status(id).expect("status");
            if status.state.is_terminal() {
                return status;
            }
            if start.elapsed() > timeout {
                panic!("job did not reach a terminal state: {status:?}");
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn single_and_bold_paragraphs_translate_end_to_end() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let slide = testdeck::slide_xml(&[
            testdeck::shape(&[testdeck::paragraph(&[("Employees attend training.", "")])]),
            testdeck::shape(&[testdeck::paragraph(&[
                ("Employees with an ", ""),
                ("invisible", r#" b="1""#),
                (" disability", ""),
            ])]),
        ]);
        let deck = testdeck::deck_bytes(&[&slide]);
        let mgr = manager(
            &[
                (
                    "Employees attend training.",
                    "Les employés suivent une formation.",
                ),
                (
                    "Employees with an invisible disability",
                    "Les employés ayant un handicap invisible",
                ),
            ],
            "semantic",
            tmp.path(),
            None,
        );

        let id = mgr.submit(deck.clone(), options("fr")).expect("submit");
        let status = wait_terminal(&mgr, id, Duration::from_secs(20));
        assert_eq!(status.state, JobState::Completed);
        assert_eq!(status.progress_percent, 100);
        assert!(status.warnings.is_empty(), "warnings: {:?}", status.warnings);

        let out = mgr.result(id).expect("result");
        let tree = extract_deck(&out).expect("re-extract");
        assert_eq!(
            tree.paragraphs[0].para.source_text,
            "Les employés suivent une formation."
        );
        assert_eq!(tree.paragraphs[0].para.runs.len(), 1);

        let bold_para = &tree.paragraphs[1].para;
        assert_eq!(
            bold_para.source_text,
            "Les employés ayant un handicap invisible"
        );
        let bold_runs: Vec<_> = bold_para
            .runs
            .iter()
            .filter(|r| r.format.bold == Some(true))
            .collect();
        assert_eq!(bold_runs.len(), 1);
        assert!(bold_runs[0].text.contains("invisible"));
    }

    #[test]
    fn identity_translation_with_llm_alignment_round_trips() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let slide = testdeck::slide_xml(&[
            testdeck::shape(&[testdeck::paragraph(&[
                ("See the ", ""),
                ("report", r#" b="1""#),
                (".", ""),
            ])]),
            testdeck::shape(&[testdeck::paragraph(&[
                ("Warning", ""),
                (" ", r#" b="1""#),
                ("danger", ""),
            ])]),
        ]);
        let deck = testdeck::deck_bytes(&[&slide]);
        let mgr = manager(&[], "llm", tmp.path(), None);

        let id = mgr.submit(deck.clone(), options("en")).expect("submit");
        let status = wait_terminal(&mgr, id, Duration::from_secs(20));
        assert_eq!(status.state, JobState::Completed, "error: {:?}", status.error);

        let out = mgr.result(id).expect("result");
        let tree = extract_deck(&out).expect("re-extract");

        // Formatted run survives in place.
        let first = &tree.paragraphs[0].para;
        assert_eq!(first.source_text, "See the report.");
        assert_eq!(first.runs.len(), 3);
        assert_eq!(first.runs[1].text, "report");
        assert_eq!(first.runs[1].format.bold, Some(true));
        assert_eq!(first.runs[0].format, RunFormat::default());
        assert_eq!(first.runs[2].format, RunFormat::default());

        // The whitespace-only bold run is filtered into one plain run.
        let second = &tree.paragraphs[1].para;
        assert_eq!(second.source_text, "Warning danger");
        assert_eq!(second.runs.len(), 1);
        assert_eq!(second.runs[0].format, RunFormat::default());
    }

    #[test]
    fn glossary_terms_are_enforced_through_the_prompt() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let slide = testdeck::slide_xml(&[testdeck::shape(&[testdeck::paragraph(&[(
            "The Senate convened.",
            "",
        )])])]);
        let deck = testdeck::deck_bytes(&[&slide]);
        let mgr = manager(&[], "semantic", tmp.path(), None);

        let glossary_entries = vec![GlossaryEntry {
            source: "Senate".to_string(),
            target: "Sénat".to_string(),
            context: None,
            case_sensitive: true,
            priority: 10,
            note: None,
        }];
        let mut opts = options("fr");
        opts.glossary = Some(GlossarySource::Inline(glossary_entries.clone()));

        let id = mgr.submit(deck, opts).expect("submit");
        let status = wait_terminal(&mgr, id, Duration::from_secs(20));
        assert_eq!(status.state, JobState::Completed);

        let out = mgr.result(id).expect("result");
        let tree = extract_deck(&out).expect("re-extract");
        let target = &tree.paragraphs[0].para.source_text;
        let glossary = Glossary::from_entries(glossary_entries);
        assert!(
            glossary.verify("The Senate convened.", target).compliant,
            "target: {target}"
        );
    }

    #[test]
    fn tables_and_charts_use_slide_context() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let tbl = testdeck::table(&[vec![
            testdeck::cell("", &["Revenue"]),
            testdeck::cell("", &["Total"]),
        ]]);
        let para = testdeck::shape(&[testdeck::paragraph(&[("Revenue grew strongly.", "")])]);
        let slide = testdeck::slide_xml(&[para, tbl]);
        let chart = testdeck::chart_xml("Revenue", &["North"], &["2023"]);
        let rels = testdeck::rels_xml(&[(
            "rId3",
            "http://schemas.openxmlformats.org/officeDocument/2006/relationships/chart",
            "../charts/chart1.xml",
            false,
        )]);
        let chart_slide = testdeck::slide_with_chart("rId3");
        let deck = testdeck::deck_bytes_with_rels(
            &[(&slide, None), (&chart_slide, Some(&rels))],
            &[("ppt/charts/chart1.xml", &chart)],
        );

        let mgr = manager(
            &[
                ("Revenue grew strongly.", "Le chiffre d'affaires a fortement augmenté."),
                ("Revenue", "Chiffre d'affaires"),
                ("Total", "Total général"),
                ("North", "Nord"),
            ],
            "semantic",
            tmp.path(),
            None,
        );
        let id = mgr.submit(deck, options("fr")).expect("submit");
        let status = wait_terminal(&mgr, id, Duration::from_secs(30));
        assert_eq!(status.state, JobState::Completed, "error: {:?}", status.error);

        let out = mgr.result(id).expect("result");
        let tree = extract_deck(&out).expect("re-extract");

        let cell_texts: Vec<&str> = tree
            .cells
            .iter()
            .flat_map(|c| c.paragraphs.iter().map(|p| p.source_text.as_str()))
            .collect();
        assert!(cell_texts.contains(&"Chiffre d'affaires"), "{cell_texts:?}");
        assert!(cell_texts.contains(&"Total général"));

        let title = tree
            .chart_labels
            .iter()
            .find(|l| l.id.kind == ChartLabelKind::Title)
            .expect("title");
        assert_eq!(title.source_text, "Chiffre d'affaires");
        let series = tree
            .chart_labels
            .iter()
            .find(|l| l.id.kind == ChartLabelKind::SeriesName)
            .expect("series");
        assert_eq!(series.source_text, "Nord");
        // Numeric category labels pass through untouched.
        let cat = tree
            .chart_labels
            .iter()
            .find(|l| l.id.kind == ChartLabelKind::CategoryLabel)
            .expect("category");
        assert_eq!(cat.source_text, "2023");
    }

    #[test]
    fn cancellation_stops_a_running_job_promptly() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let paras: Vec<String> = (0..30)
            .map(|i| testdeck::paragraph(&[(format!("Sentence number {i} of the deck.").as_str(), "")]))
            .collect();
        let slide = testdeck::slide_xml(&[testdeck::shape(&paras)]);
        let deck = testdeck::deck_bytes(&[&slide]);
        let opts = JobOptions {
            source_lang: Some("en".to_string()),
            target_lang: "fr".to_string(),
            workers: Some(1),
            ..JobOptions::default()
        };
        let mgr = manager(&[], "semantic", tmp.path(), Some(150));

        let id = mgr.submit(deck, opts).expect("submit");
        std::thread::sleep(Duration::from_millis(400));
        assert_eq!(mgr.cancel(id).expect("cancel"), CancelOutcome::Requested);

        let cancelled_at = Instant::now();
        let status = wait_terminal(&mgr, id, Duration::from_secs(5));
        assert_eq!(status.state, JobState::Cancelled);
        assert!(
            cancelled_at.elapsed() < Duration::from_secs(1),
            "took {:?}",
            cancelled_at.elapsed()
        );
        assert!(status.progress_percent < 100);
        assert!(matches!(mgr.result(id), Err(JobError::NotCompleted(_))));

        // Cancelling again reports the terminal state.
        assert_eq!(
            mgr.cancel(id).expect("cancel"),
            CancelOutcome::AlreadyTerminal
        );
    }

    #[test]
    fn progress_is_monotone_while_running() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let paras: Vec<String> = (0..10)
            .map(|i| testdeck::paragraph(&[(format!("Progress sentence {i}.").as_str(), "")]))
            .collect();
        let slide = testdeck::slide_xml(&[testdeck::shape(&paras)]);
        let deck = testdeck::deck_bytes(&[&slide]);
        let mgr = manager(&[], "semantic", tmp.path(), Some(20));

        let id = mgr.submit(deck, options("fr")).expect("submit");
        let mut seen: Vec<u8> = Vec::new();
        loop {
            let status = mgr.status(id).expect("status");
            seen.push(status.progress_percent);
            if status.state.is_terminal() {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        let mut sorted = seen.clone();
        sorted.sort_unstable();
        assert_eq!(seen, sorted, "progress went backwards: {seen:?}");
        assert_eq!(*seen.last().expect("samples"), 100);
    }

    #[test]
    fn oversized_records_pass_through_with_a_warning() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let long_text = "This sentence is deliberately much too long for the backend limit.";
        let slide = testdeck::slide_xml(&[testdeck::shape(&[testdeck::paragraph(&[(
            long_text, "",
        )])])]);
        let deck = testdeck::deck_bytes(&[&slide]);

        let mut cfg = AppConfig::default();
        cfg.pipeline.backend = Some("mock".to_string());
        cfg.pipeline.strategy = Some("semantic".to_string());
        cfg.pipeline.work_dir = Some(tmp.path().to_path_buf());
        let mut section = mock_section(&[], None);
        section.max_input_chars = Some(10);
        cfg.backends.insert("mock".to_string(), section);
        let mgr = JobManager::new(cfg).expect("manager");

        let id = mgr.submit(deck.clone(), options("fr")).expect("submit");
        let status = wait_terminal(&mgr, id, Duration::from_secs(20));
        assert_eq!(status.state, JobState::Completed);
        assert!(status
            .warnings
            .iter()
            .any(|w| w.contains("passed through untranslated")));

        // The untranslated paragraph keeps its original text.
        let out = mgr.result(id).expect("result");
        let tree = extract_deck(&out).expect("re-extract");
        assert_eq!(tree.paragraphs[0].para.source_text, long_text);
    }

    #[test]
    fn unknown_jobs_are_reported() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mgr = manager(&[], "semantic", tmp.path(), None);
        let missing = Uuid::new_v4();
        assert!(matches!(mgr.status(missing), Err(JobError::UnknownJob(_))));
        assert!(matches!(mgr.cancel(missing), Err(JobError::UnknownJob(_))));
        assert!(matches!(mgr.result(missing), Err(JobError::UnknownJob(_))));
    }

    #[test]
    fn downloaded_jobs_are_pruned() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let slide = testdeck::slide_xml(&[testdeck::shape(&[testdeck::paragraph(&[(
            "Short.", "",
        )])])]);
        let deck = testdeck::deck_bytes(&[&slide]);

        let mut cfg = AppConfig::default();
        cfg.pipeline.backend = Some("mock".to_string());
        cfg.pipeline.work_dir = Some(tmp.path().to_path_buf());
        cfg.pipeline.retention_secs = Some(0);
        cfg.backends.insert("mock".to_string(), mock_section(&[], None));
        let mgr = JobManager::new(cfg).expect("manager");

        let id = mgr.submit(deck, options("fr")).expect("submit");
        wait_terminal(&mgr, id, Duration::from_secs(20));
        let _ = mgr.result(id).expect("result");
        mgr.prune_expired();
        assert!(matches!(mgr.status(id), Err(JobError::UnknownJob(_))));
    }

    #[test]
    fn glossary_file_errors_fail_the_submit() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let bad = tmp.path().join("glossary.toml");
        std::fs::write(&bad, "entries = 3").expect("write");
        let slide = testdeck::slide_xml(&[testdeck::shape(&[testdeck::paragraph(&[(
            "Text.", "",
        )])])]);
        let deck = testdeck::deck_bytes(&[&slide]);
        let mgr = manager(&[], "semantic", tmp.path(), None);

        let mut opts = options("fr");
        opts.glossary = Some(GlossarySource::Path(bad));
        assert!(matches!(
            mgr.submit(deck, opts),
            Err(JobError::Glossary(_))
        ));
    }

    #[test]
    fn resumed_jobs_reuse_recorded_translations() {
        use crate::pipeline::RecordLine;

        let tmp = tempfile::tempdir().expect("tempdir");
        let slide = testdeck::slide_xml(&[testdeck::shape(&[testdeck::paragraph(&[(
            "Employees attend training.",
            "",
        )])])]);
        let deck = testdeck::deck_bytes(&[&slide]);

        // Artifacts from a previous run of the same deck.
        let prior_dir = tmp.path().join("job-prior");
        let store = ArtifactStore::create(prior_dir.clone()).expect("store");
        let mut tree = extract_deck(&deck).expect("extract");
        tree.paragraphs[0].para.target_text =
            Some("Les employés suivent une formation.".to_string());
        store
            .write_records(
                tree.paragraphs
                    .iter()
                    .cloned()
                    .map(RecordLine::Paragraph),
            )
            .expect("write records");

        // The backend is identity: any re-translation would NOT produce French.
        let mgr = manager(&[], "semantic", tmp.path(), None);
        let mut opts = options("fr");
        opts.resume_from = Some(prior_dir);
        let id = mgr.submit(deck, opts).expect("submit");
        let status = wait_terminal(&mgr, id, Duration::from_secs(20));
        assert_eq!(status.state, JobState::Completed);

        let out = mgr.result(id).expect("result");
        let round = extract_deck(&out).expect("re-extract");
        assert_eq!(
            round.paragraphs[0].para.source_text,
            "Les employés suivent une formation."
        );
    }

    #[test]
    fn malformed_decks_fail_the_job() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mgr = manager(&[], "semantic", tmp.path(), None);
        let id = mgr
            .submit(b"definitely not a deck".to_vec(), options("fr"))
            .expect("submit");
        let status = wait_terminal(&mgr, id, Duration::from_secs(10));
        assert_eq!(status.state, JobState::Failed);
        assert!(status.error.as_deref().unwrap_or("").contains("malformed"));
    }
}
