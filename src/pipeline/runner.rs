use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::align::embedding::{Embedder, HashEmbedder, HttpEmbedder};
use crate::align::{AlignStrategy, LlmAligner, RunAligner, SemanticAligner};
use crate::backend::{CancelToken, TranslationBackend};
use crate::deck::model::{CellId, ChartLabelId, DeckTree, ParaPayload, ParagraphId};
use crate::deck::{extract_deck, write_deck};
use crate::error::{DeckError, TranslateError};
use crate::glossary::Glossary;
use crate::pipeline::artifacts::{ArtifactStore, RecordLine};
use crate::pipeline::charts::{translate_cell, translate_label};
use crate::pipeline::config::PipelineSettings;
use crate::pipeline::context::build_slide_contexts;
use crate::pipeline::paragraphs::ParagraphTranslator;
use crate::pipeline::prompts::PromptSet;
use crate::quality::review_tree;
use crate::textutil::detect_source_lang;

/// The nine progress checkpoints, in pipeline order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Milestone {
    ExtractParagraphs,
    TranslateParagraphs,
    AlignParagraphs,
    BuildContext,
    TranslateCharts,
    TranslateTables,
    AlignTableCells,
    Merge,
    Write,
}

impl Milestone {
    pub const ALL: [Milestone; 9] = [
        Milestone::ExtractParagraphs,
        Milestone::TranslateParagraphs,
        Milestone::AlignParagraphs,
        Milestone::BuildContext,
        Milestone::TranslateCharts,
        Milestone::TranslateTables,
        Milestone::AlignTableCells,
        Milestone::Merge,
        Milestone::Write,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Milestone::ExtractParagraphs => "extract_paragraphs",
            Milestone::TranslateParagraphs => "translate_paragraphs",
            Milestone::AlignParagraphs => "align_paragraphs",
            Milestone::BuildContext => "build_context",
            Milestone::TranslateCharts => "translate_charts",
            Milestone::TranslateTables => "translate_tables",
            Milestone::AlignTableCells => "align_table_cells",
            Milestone::Merge => "merge",
            Milestone::Write => "write",
        }
    }

    fn weight(&self) -> u32 {
        match self {
            Milestone::ExtractParagraphs => 8,
            Milestone::TranslateParagraphs => 30,
            Milestone::AlignParagraphs => 15,
            Milestone::BuildContext => 5,
            Milestone::TranslateCharts => 10,
            Milestone::TranslateTables => 12,
            Milestone::AlignTableCells => 8,
            Milestone::Merge => 4,
            Milestone::Write => 8,
        }
    }

    /// Overall percent when `done` of `total` records of this stage finished.
    pub fn percent(&self, done: usize, total: usize) -> u8 {
        let before: u32 = Milestone::ALL
            .iter()
            .take_while(|m| **m != *self)
            .map(|m| m.weight())
            .sum();
        let total = total.max(1) as u64;
        let done = (done as u64).min(total);
        let within = (u64::from(self.weight()) * done / total) as u32;
        (before + within).min(100) as u8
    }
}

/// Where the orchestrator reports progress and per-record warnings. The job
/// manager routes these into the job table.
pub trait ProgressSink: Send + Sync {
    fn update(&self, milestone: Milestone, done: usize, total: usize);
    fn warn(&self, message: String);
}

/// Everything one job needs to run the pipeline.
pub struct JobContext {
    pub deck: Vec<u8>,
    pub source_lang: Option<String>,
    pub target_lang: String,
    pub backend: Arc<dyn TranslationBackend>,
    pub glossary: Arc<Glossary>,
    pub strategy: AlignStrategy,
    pub settings: PipelineSettings,
    pub prompts: PromptSet,
    pub cancel: CancelToken,
    pub artifacts: Option<ArtifactStore>,
    /// Prior job's artifact directory; translations recorded there are
    /// re-used for records whose identity and source text still match.
    pub resume_from: Option<PathBuf>,
}

/// Job-fatal pipeline outcomes; everything record-level stays inside the
/// records.
#[derive(Debug)]
pub enum PipelineFailure {
    Cancelled,
    Deck(DeckError),
    Auth(String),
}

impl std::fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineFailure::Cancelled => write!(f, "cancelled"),
            PipelineFailure::Deck(e) => write!(f, "{e}"),
            PipelineFailure::Auth(msg) => write!(f, "backend authentication failed: {msg}"),
        }
    }
}

pub fn run_pipeline(ctx: &JobContext, sink: &dyn ProgressSink) -> Result<Vec<u8>, PipelineFailure> {
    let cancel = &ctx.cancel;
    let check = |stage: Milestone| -> Result<(), PipelineFailure> {
        if cancel.is_cancelled() {
            info!(stage = stage.as_str(), "job cancelled at checkpoint");
            Err(PipelineFailure::Cancelled)
        } else {
            Ok(())
        }
    };

    // Stage 1: extract.
    check(Milestone::ExtractParagraphs)?;
    sink.update(Milestone::ExtractParagraphs, 0, 1);
    let mut tree = extract_deck(&ctx.deck).map_err(PipelineFailure::Deck)?;
    for w in tree.warnings.drain(..) {
        sink.warn(w);
    }
    sink.update(Milestone::ExtractParagraphs, 1, 1);

    let source_lang = match ctx.source_lang.as_deref() {
        Some(lang) if !lang.trim().is_empty() => lang.to_string(),
        _ => {
            let excerpts: Vec<String> = tree
                .paragraphs
                .iter()
                .map(|p| p.para.source_text.clone())
                .filter(|t| !t.trim().is_empty())
                .take(32)
                .collect();
            let detected = detect_source_lang(&excerpts);
            info!(lang = detected, "auto-detected source language");
            detected.to_string()
        }
    };
    info!(
        source = %source_lang,
        target = %ctx.target_lang,
        paragraphs = tree.paragraphs.len(),
        cells = tree.cells.len(),
        chart_labels = tree.chart_labels.len(),
        "deck extracted"
    );

    if let Some(dir) = ctx.resume_from.as_ref() {
        match ArtifactStore::create(dir.clone()).and_then(|store| store.load_records()) {
            Ok(records) => {
                let merged = merge_resume_records(&mut tree, &records);
                info!(merged, "resumed prior translations from artifacts");
            }
            Err(e) => sink.warn(format!("resume artifacts unreadable, starting fresh: {e}")),
        }
    }

    let translator = ParagraphTranslator::new(
        ctx.backend.clone(),
        ctx.glossary.clone(),
        ctx.prompts.clone(),
        &source_lang,
        &ctx.target_lang,
        ctx.settings.max_tries,
        ctx.settings.retry_base_ms,
        ctx.settings.paragraph_timeout,
    );

    // Stage 2: translate paragraphs on the worker pool.
    check(Milestone::TranslateParagraphs)?;
    {
        let total = tree.paragraphs.len();
        let fatal = run_on_pool(
            &mut tree.paragraphs,
            ctx.settings.workers,
            cancel,
            |rec| {
                translator.translate_payload(&mut rec.para, None, None, cancel)
            },
            |done| sink.update(Milestone::TranslateParagraphs, done, total),
        );
        resolve_stage(fatal, cancel, Milestone::TranslateParagraphs)?;
    }
    snapshot(ctx, &tree);

    // Stages 3..7 share one aligner; the embedding model lives exactly as
    // long as this binding.
    {
        let aligner = build_aligner(ctx, &source_lang);

        // Stage 3: align paragraphs.
        check(Milestone::AlignParagraphs)?;
        let total = tree.paragraphs.len();
        for (idx, rec) in tree.paragraphs.iter_mut().enumerate() {
            if idx % ctx.settings.cancel_check_every == 0 {
                check(Milestone::AlignParagraphs)?;
            }
            align_payload(&aligner, &mut rec.para, cancel);
            sink.update(Milestone::AlignParagraphs, idx + 1, total);
        }
        sink.update(Milestone::AlignParagraphs, total, total);
        snapshot(ctx, &tree);

        // Stage 4: slide contexts.
        check(Milestone::BuildContext)?;
        sink.update(Milestone::BuildContext, 0, 1);
        let contexts = build_slide_contexts(
            &tree,
            &ctx.glossary,
            ctx.settings.context_max_pairs,
            ctx.settings.context_max_chars,
        );
        if let Some(store) = ctx.artifacts.as_ref() {
            let mut ordered: Vec<_> = contexts.values().collect();
            ordered.sort_by_key(|c| c.slide);
            if let Err(e) = store.write_contexts(ordered.into_iter()) {
                warn!("failed to persist slide contexts: {e}");
            }
        }
        sink.update(Milestone::BuildContext, 1, 1);

        // Stage 5: chart labels.
        check(Milestone::TranslateCharts)?;
        {
            let total = tree.chart_labels.len();
            let label_timeout = ctx.settings.label_timeout;
            let fatal = run_on_pool(
                &mut tree.chart_labels,
                ctx.settings.workers,
                cancel,
                |label| {
                    let slide_ctx = contexts.get(&label.id.slide);
                    translate_label(&translator, label, slide_ctx, label_timeout, cancel)
                },
                |done| sink.update(Milestone::TranslateCharts, done, total),
            );
            resolve_stage(fatal, cancel, Milestone::TranslateCharts)?;
        }

        // Stage 6: table cells.
        check(Milestone::TranslateTables)?;
        {
            let total = tree.cells.len();
            let label_timeout = ctx.settings.label_timeout;
            let fatal = run_on_pool(
                &mut tree.cells,
                ctx.settings.workers,
                cancel,
                |cell| {
                    let slide_ctx = contexts.get(&cell.id.slide);
                    translate_cell(&translator, cell, slide_ctx, label_timeout, cancel)
                },
                |done| sink.update(Milestone::TranslateTables, done, total),
            );
            resolve_stage(fatal, cancel, Milestone::TranslateTables)?;
        }

        // Stage 7: align table cells.
        check(Milestone::AlignTableCells)?;
        let total = tree.cells.len();
        for (idx, cell) in tree.cells.iter_mut().enumerate() {
            if idx % ctx.settings.cancel_check_every == 0 {
                check(Milestone::AlignTableCells)?;
            }
            for para in &mut cell.paragraphs {
                align_payload(&aligner, para, cancel);
            }
            sink.update(Milestone::AlignTableCells, idx + 1, total);
        }
        sink.update(Milestone::AlignTableCells, total, total);
    }
    snapshot(ctx, &tree);

    summarize_failures(&tree, sink);
    let mut quality: Vec<(&str, usize)> = review_tree(&tree).into_iter().collect();
    quality.sort_by_key(|(flag, _)| *flag);
    for (flag, count) in quality {
        sink.warn(format!("quality: {count} records flagged {flag}"));
    }

    // Stage 8: merge (the record streams are keyed back onto the container).
    check(Milestone::Merge)?;
    sink.update(Milestone::Merge, 0, 1);
    sink.update(Milestone::Merge, 1, 1);

    // Stage 9: write the output container.
    check(Milestone::Write)?;
    sink.update(Milestone::Write, 0, 1);
    let out = write_deck(&ctx.deck, &tree).map_err(PipelineFailure::Deck)?;
    sink.update(Milestone::Write, 1, 1);
    Ok(out)
}

fn build_aligner(ctx: &JobContext, source_lang: &str) -> RunAligner {
    match ctx.strategy {
        AlignStrategy::Semantic => {
            let embedder: Box<dyn Embedder> = match ctx.settings.embedding_url.as_deref() {
                Some(url) => Box::new(HttpEmbedder::new(url, ctx.settings.label_timeout)),
                None => Box::new(HashEmbedder::new(ctx.settings.embedding_dim)),
            };
            RunAligner::Semantic(SemanticAligner::new(embedder, ctx.glossary.phrase_pairs()))
        }
        AlignStrategy::Llm => RunAligner::Llm(LlmAligner::new(
            ctx.backend.clone(),
            source_lang,
            &ctx.target_lang,
            &ctx.prompts.align_span,
        )),
    }
}

/// Re-use targets and alignments from a previous run's artifact records,
/// keyed by identity and guarded by unchanged source text.
pub fn merge_resume_records(tree: &mut DeckTree, records: &[RecordLine]) -> usize {
    let mut paras: HashMap<ParagraphId, &crate::deck::model::ParagraphRecord> = HashMap::new();
    let mut cells: HashMap<CellId, &crate::deck::model::CellRecord> = HashMap::new();
    let mut labels: HashMap<&ChartLabelId, &crate::deck::model::ChartLabelRecord> = HashMap::new();
    for line in records {
        match line {
            RecordLine::Paragraph(p) => {
                paras.insert(p.id, p);
            }
            RecordLine::Cell(c) => {
                cells.insert(c.id, c);
            }
            RecordLine::ChartLabel(l) => {
                labels.insert(&l.id, l);
            }
        }
    }

    let mut merged = 0usize;
    let reuse = |from: &ParaPayload, into: &mut ParaPayload| -> bool {
        if from.source_text != into.source_text
            || from.target_text.is_none()
            || from.failure.is_some()
        {
            return false;
        }
        into.target_text = from.target_text.clone();
        into.aligned_runs = from.aligned_runs.clone();
        true
    };

    for rec in &mut tree.paragraphs {
        if let Some(prev) = paras.get(&rec.id) {
            if reuse(&prev.para, &mut rec.para) {
                merged += 1;
            }
        }
    }
    for cell in &mut tree.cells {
        if let Some(prev) = cells.get(&cell.id) {
            for (para, prev_para) in cell.paragraphs.iter_mut().zip(&prev.paragraphs) {
                if reuse(prev_para, para) {
                    merged += 1;
                }
            }
        }
    }
    for label in &mut tree.chart_labels {
        if let Some(prev) = labels.get(&label.id) {
            if prev.source_text == label.source_text
                && prev.target_text.is_some()
                && prev.failure.is_none()
            {
                label.target_text = prev.target_text.clone();
                merged += 1;
            }
        }
    }
    merged
}

fn align_payload(aligner: &RunAligner, para: &mut ParaPayload, cancel: &CancelToken) {
    // Alignments resumed from artifacts are kept as-is.
    if para.aligned_runs.is_some() {
        return;
    }
    let Some(target) = para.target_text.clone() else {
        return;
    };
    if para.failure.is_some() || target.is_empty() {
        return;
    }
    let runs = aligner.align(&para.source_text, &para.runs, &target, cancel);
    if !runs.is_empty() {
        para.aligned_runs = Some(runs);
    }
}

/// Fan records out to a bounded worker pool. Workers stop taking records once
/// the cancel flag is set; a fatal auth error is captured and stops the
/// stage. Returns the first fatal error message, if any.
fn run_on_pool<T: Send>(
    items: &mut [T],
    workers: usize,
    cancel: &CancelToken,
    work: impl Fn(&mut T) -> Result<(), TranslateError> + Sync,
    progress: impl Fn(usize) + Sync,
) -> Option<String> {
    let fatal: Mutex<Option<String>> = Mutex::new(None);
    let done = AtomicUsize::new(0);
    let workers = workers.max(1).min(items.len().max(1));

    std::thread::scope(|scope| {
        let (tx, rx) = crossbeam_channel::unbounded::<&mut T>();
        for item in items.iter_mut() {
            let _ = tx.send(item);
        }
        drop(tx);

        for _ in 0..workers {
            let rx = rx.clone();
            let fatal = &fatal;
            let done = &done;
            let work = &work;
            let progress = &progress;
            scope.spawn(move || {
                while let Ok(item) = rx.recv() {
                    if cancel.is_cancelled() || fatal.lock().expect("fatal lock").is_some() {
                        return;
                    }
                    match work(item) {
                        Ok(()) => {}
                        Err(TranslateError::Cancelled) => return,
                        Err(TranslateError::Auth(msg)) => {
                            *fatal.lock().expect("fatal lock") = Some(msg);
                            return;
                        }
                        // Anything else was already attached record-level.
                        Err(e) => warn!("record-level error escaped a stage: {e}"),
                    }
                    let n = done.fetch_add(1, Ordering::SeqCst) + 1;
                    progress(n);
                }
            });
        }
    });

    fatal.into_inner().expect("fatal lock")
}

fn resolve_stage(
    fatal: Option<String>,
    cancel: &CancelToken,
    stage: Milestone,
) -> Result<(), PipelineFailure> {
    if let Some(msg) = fatal {
        return Err(PipelineFailure::Auth(msg));
    }
    if cancel.is_cancelled() {
        info!(stage = stage.as_str(), "job cancelled during stage");
        return Err(PipelineFailure::Cancelled);
    }
    Ok(())
}

fn snapshot(ctx: &JobContext, tree: &DeckTree) {
    let Some(store) = ctx.artifacts.as_ref() else {
        return;
    };
    let lines = tree
        .paragraphs
        .iter()
        .cloned()
        .map(RecordLine::Paragraph)
        .chain(tree.cells.iter().cloned().map(RecordLine::Cell))
        .chain(tree.chart_labels.iter().cloned().map(RecordLine::ChartLabel));
    if let Err(e) = store.write_records(lines) {
        warn!("failed to persist stage records: {e}");
    }
}

fn summarize_failures(tree: &DeckTree, sink: &dyn ProgressSink) {
    let para_failures = tree
        .paragraphs
        .iter()
        .filter(|p| p.para.failure.is_some())
        .count()
        + tree
            .cells
            .iter()
            .flat_map(|c| c.paragraphs.iter())
            .filter(|p| p.failure.is_some())
            .count();
    let label_failures = tree
        .chart_labels
        .iter()
        .filter(|l| l.failure.is_some())
        .count();
    if para_failures > 0 {
        sink.warn(format!(
            "{para_failures} paragraphs passed through untranslated"
        ));
    }
    if label_failures > 0 {
        sink.warn(format!(
            "{label_failures} chart labels passed through untranslated"
        ));
    }
}
