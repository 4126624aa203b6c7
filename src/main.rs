use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use deck_translator::align::AlignStrategy;
use deck_translator::config::{
    find_default_config, init_default_config, load_config, AppConfig,
};
use deck_translator::deck::extract::extract_deck;
use deck_translator::deck::package::DeckPackage;
use deck_translator::deck::xml::{parse_xml_part, write_xml_part};
use deck_translator::jobs::{GlossarySource, JobManager, JobOptions, JobState};
use deck_translator::progress::ConsoleProgress;

#[derive(Parser, Debug)]
#[command(name = "deck-translator")]
#[command(about = "Slide-deck translator with per-run format preservation", long_about = None)]
struct Args {
    /// Generate a default config file, then exit
    #[arg(long)]
    init_config: bool,

    /// Directory to write the config file (default: current directory)
    #[arg(long, value_name = "DIR")]
    init_config_dir: Option<PathBuf>,

    /// Overwrite an existing config file when used with --init-config
    #[arg(long)]
    force: bool,

    /// Input deck (.pptx)
    #[arg(value_name = "DECK")]
    input: Option<PathBuf>,

    /// Output deck (default: <input_stem>_translated.pptx)
    #[arg(short, long, value_name = "DECK")]
    output: Option<PathBuf>,

    /// Source language code (default: auto-detect from the deck)
    #[arg(long)]
    source_lang: Option<String>,

    /// Target language code (e.g. fr, de, zh)
    #[arg(long)]
    target_lang: Option<String>,

    /// Config file path (default: search for deck-translator.toml upwards)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Translation backend name from config
    #[arg(long)]
    backend: Option<String>,

    /// Alignment strategy: semantic or llm
    #[arg(long)]
    strategy: Option<String>,

    /// Glossary file (TOML or CSV)
    #[arg(long, value_name = "FILE")]
    glossary: Option<PathBuf>,

    /// Worker pool size for this job
    #[arg(long)]
    workers: Option<usize>,

    /// Per-record backend timeout in seconds
    #[arg(long)]
    record_timeout: Option<u64>,

    /// Artifact directory of an earlier run to resume from
    #[arg(long, value_name = "DIR")]
    resume_from: Option<PathBuf>,

    /// Print the compiled glossary (from --glossary or config), then exit
    #[arg(long)]
    show_glossary: bool,

    /// Only parse + re-serialize the deck XML (no translation)
    #[arg(long)]
    roundtrip_only: bool,

    /// Extract the normalized record tree as JSON (no translation)
    #[arg(long, value_name = "JSON")]
    extract_json: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let progress = ConsoleProgress::new(true);

    if args.init_config {
        let dir = args
            .init_config_dir
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        let cfg_path = init_default_config(&dir, args.force).context("init default config")?;
        eprintln!("Wrote config: {}", cfg_path.display());
        return Ok(());
    }

    if args.show_glossary {
        let path = match args.glossary.clone() {
            Some(p) => Some(p),
            None => {
                let config = match args.config.clone().or_else(find_default_config) {
                    Some(path) => load_config(&path)?,
                    None => AppConfig::default(),
                };
                config.glossary.path
            }
        };
        let Some(path) = path else {
            anyhow::bail!("no glossary configured (pass --glossary or set [glossary] path)");
        };
        let glossary = deck_translator::glossary::Glossary::load(&path)
            .map_err(|e| anyhow::anyhow!(e.to_string()))?;
        for entry in glossary.entries() {
            let case = if entry.case_sensitive { " [case]" } else { "" };
            println!(
                "{:>5}  {} => {}{}{}",
                entry.priority,
                entry.source,
                entry.target,
                case,
                entry
                    .context
                    .as_deref()
                    .map(|c| format!(" ({c})"))
                    .unwrap_or_default()
            );
        }
        return Ok(());
    }

    let Some(input) = args.input else {
        let mut cmd = Args::command();
        cmd.print_help().context("print help")?;
        eprintln!(
            "\n\nUSAGE:\n  deck-translator <input.pptx> --target-lang fr\n\nTIPS:\n  - Default config search: deck-translator.toml (upwards), or set DECK_TRANSLATOR_CONFIG.\n  - Run --init-config once to generate a commented starter config.\n"
        );
        return Ok(());
    };
    let output = args.output.clone().unwrap_or_else(|| {
        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("output")
            .to_string();
        input.with_file_name(format!("{stem}_translated.pptx"))
    });

    let deck_bytes =
        std::fs::read(&input).with_context(|| format!("read deck: {}", input.display()))?;

    if let Some(json_path) = args.extract_json {
        let tree = extract_deck(&deck_bytes).context("extract deck")?;
        let json = serde_json::to_vec_pretty(&tree).context("serialize record tree")?;
        std::fs::write(&json_path, json)
            .with_context(|| format!("write record json: {}", json_path.display()))?;
        progress.info(format!(
            "Extracted {} paragraphs, {} cells, {} chart labels -> {}",
            tree.paragraphs.len(),
            tree.cells.len(),
            tree.chart_labels.len(),
            json_path.display()
        ));
        return Ok(());
    }

    if args.roundtrip_only {
        let pkg = DeckPackage::read(&deck_bytes).context("read deck container")?;
        let mut replacements = std::collections::HashMap::new();
        for ent in &pkg.entries {
            if !ent.name.to_lowercase().ends_with(".xml") || ent.data.is_empty() {
                continue;
            }
            let part = parse_xml_part(&ent.name, &ent.data)
                .with_context(|| format!("parse xml: {}", ent.name))?;
            let bytes =
                write_xml_part(&part).with_context(|| format!("serialize xml: {}", ent.name))?;
            replacements.insert(ent.name.clone(), bytes);
        }
        let out = pkg
            .write_with_replacements(&replacements)
            .context("write roundtrip deck")?;
        std::fs::write(&output, out)
            .with_context(|| format!("write output: {}", output.display()))?;
        progress.info(format!("Roundtrip written: {}", output.display()));
        return Ok(());
    }

    let target_lang = args
        .target_lang
        .clone()
        .context("missing --target-lang (e.g. --target-lang fr)")?;

    let config = match args.config.clone().or_else(find_default_config) {
        Some(path) => {
            progress.info(format!("Config: {}", path.display()));
            load_config(&path)?
        }
        None => AppConfig::default(),
    };

    let strategy: Option<AlignStrategy> = args
        .strategy
        .as_deref()
        .map(|s| s.parse().map_err(|e: String| anyhow::anyhow!(e)))
        .transpose()?;

    let manager = JobManager::new(config).map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let options = JobOptions {
        source_lang: args.source_lang.clone(),
        target_lang,
        backend: args.backend.clone(),
        strategy,
        workers: args.workers,
        record_timeout_secs: args.record_timeout,
        glossary: args.glossary.clone().map(GlossarySource::Path),
        resume_from: args.resume_from.clone(),
    };

    progress.info(format!("Translate deck: {}", input.display()));
    let job_id = manager
        .submit(deck_bytes, options)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    loop {
        let status = manager
            .status(job_id)
            .map_err(|e| anyhow::anyhow!(e.to_string()))?;
        progress.percent(
            status.progress_percent,
            status.milestone.unwrap_or(status.state.as_str()),
        );
        match status.state {
            JobState::Completed => {
                for warning in &status.warnings {
                    progress.info(format!("warning: {warning}"));
                }
                let bytes = manager
                    .result(job_id)
                    .map_err(|e| anyhow::anyhow!(e.to_string()))?;
                std::fs::write(&output, bytes)
                    .with_context(|| format!("write output: {}", output.display()))?;
                progress.info(format!("Done: {}", output.display()));
                return Ok(());
            }
            JobState::Failed => {
                anyhow::bail!(
                    "translation failed: {}",
                    status.error.unwrap_or_else(|| "unknown error".to_string())
                );
            }
            JobState::Cancelled => {
                anyhow::bail!("translation cancelled");
            }
            JobState::Pending | JobState::Running => {
                std::thread::sleep(Duration::from_millis(100));
            }
        }
    }
}
