use std::path::Path;

use anyhow::Context;

use crate::config::{AppConfig, PromptsSection};

pub const DEFAULT_TRANSLATE: &str = "\
Translate the text from {source_lang} to {target_lang}. Preserve the meaning, \
register and inline punctuation exactly; do not add content, notes or \
explanations. Tokens that look like <<NT:0000>> are placeholders and must be \
kept verbatim, each exactly once.";

pub const DEFAULT_ALIGN_SPAN: &str = "\
You are aligning a translation with its source sentence.
Source: {source}
Translation: {target}
Return the exact contiguous substring of the translation that renders this \
source fragment: {span}
Answer with that substring only, no quotes, no commentary.";

pub const DEFAULT_REPAIR: &str = "\
Your previous translation dropped required placeholder tokens.
Source: {source}
Previous translation: {bad}
Missing tokens: {missing}
Return the corrected translation from {source_lang} to {target_lang}, keeping \
every <<NT:0000>>-style token verbatim exactly once. Answer with the \
translation only.";

/// Substitute `{key}` markers. Unknown markers are left in place so a broken
/// template is visible in traces instead of silently vanishing.
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}

/// The prompt templates in force for one job: embedded defaults, overridable
/// per template by files named in the config.
#[derive(Clone, Debug)]
pub struct PromptSet {
    pub translate: String,
    pub align_span: String,
    pub repair: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            translate: DEFAULT_TRANSLATE.to_string(),
            align_span: DEFAULT_ALIGN_SPAN.to_string(),
            repair: DEFAULT_REPAIR.to_string(),
        }
    }
}

impl PromptSet {
    pub fn from_config(config_path: Option<&Path>, cfg: &AppConfig) -> anyhow::Result<Self> {
        let mut set = Self::default();
        let config_dir = config_path
            .and_then(|p| p.parent())
            .unwrap_or_else(|| Path::new("."));
        let read = |rel: &Option<String>, slot: &mut String| -> anyhow::Result<()> {
            if let Some(rel) = rel {
                let path = config_dir.join(rel);
                *slot = std::fs::read_to_string(&path)
                    .with_context(|| format!("read prompt template: {}", path.display()))?;
            }
            Ok(())
        };
        let PromptsSection {
            translate,
            align_span,
            repair,
        } = &cfg.prompts;
        read(translate, &mut set.translate)?;
        read(align_span, &mut set.align_span)?;
        read(repair, &mut set.repair)?;
        Ok(set)
    }
}
