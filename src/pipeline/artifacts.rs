use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::deck::model::{CellRecord, ChartLabelRecord, ParagraphRecord};
use crate::pipeline::context::SlideContext;

/// One self-describing artifact line.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordLine {
    Paragraph(ParagraphRecord),
    Cell(CellRecord),
    ChartLabel(ChartLabelRecord),
}

/// Per-job artifact directory. Records are line-delimited JSON written
/// strictly line by line, so a crash can tear at most the trailing line,
/// which loaders drop.
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn create(dir: PathBuf) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create artifact dir: {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn records_path(&self) -> PathBuf {
        self.dir.join("records.jsonl")
    }

    pub fn context_path(&self) -> PathBuf {
        self.dir.join("context.jsonl")
    }

    /// Replace the records file with a fresh stage snapshot.
    pub fn write_records(&self, lines: impl Iterator<Item = RecordLine>) -> anyhow::Result<()> {
        write_jsonl(&self.records_path(), lines)
    }

    /// Append records without touching earlier lines.
    pub fn append_records(&self, lines: impl Iterator<Item = RecordLine>) -> anyhow::Result<()> {
        let path = self.records_path();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open artifact: {}", path.display()))?;
        write_lines(file, lines)
    }

    pub fn load_records(&self) -> anyhow::Result<Vec<RecordLine>> {
        load_jsonl(&self.records_path())
    }

    pub fn write_contexts<'a>(
        &self,
        contexts: impl Iterator<Item = &'a SlideContext>,
    ) -> anyhow::Result<()> {
        write_jsonl(&self.context_path(), contexts)
    }

    pub fn load_contexts(&self) -> anyhow::Result<Vec<SlideContext>> {
        load_jsonl(&self.context_path())
    }
}

fn write_jsonl<T: Serialize>(path: &Path, items: impl Iterator<Item = T>) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("create artifact: {}", path.display()))?;
    write_lines(file, items)
}

fn write_lines<T: Serialize>(file: File, items: impl Iterator<Item = T>) -> anyhow::Result<()> {
    let mut out = BufWriter::new(file);
    for item in items {
        let line = serde_json::to_string(&item).context("serialize artifact line")?;
        out.write_all(line.as_bytes()).context("write artifact line")?;
        out.write_all(b"\n").context("write artifact newline")?;
    }
    out.flush().context("flush artifact")?;
    Ok(())
}

/// Read a line-delimited file. A parse failure on the final line is a torn
/// write and is discarded; anywhere else it is corruption and an error.
fn load_jsonl<T: for<'de> Deserialize<'de>>(path: &Path) -> anyhow::Result<Vec<T>> {
    let file = File::open(path).with_context(|| format!("open artifact: {}", path.display()))?;
    let reader = BufReader::new(file);
    let lines: Vec<String> = reader
        .lines()
        .collect::<Result<_, _>>()
        .context("read artifact lines")?;

    let mut out = Vec::with_capacity(lines.len());
    let last = lines.len().saturating_sub(1);
    for (idx, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(line) {
            Ok(item) => out.push(item),
            Err(e) if idx == last => {
                warn!("discarding torn trailing artifact line: {e}");
            }
            Err(e) => {
                anyhow::bail!("corrupt artifact line {} in {}: {e}", idx + 1, path.display());
            }
        }
    }
    Ok(out)
}
