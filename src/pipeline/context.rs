use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::deck::model::DeckTree;
use crate::glossary::Glossary;

/// Per-slide source -> target phrase summary handed to chart and table
/// translation as prompt context, bounded so it cannot crowd out the record
/// being translated.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SlideContext {
    pub slide: usize,
    pub pairs: Vec<(String, String)>,
}

impl SlideContext {
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Rendered prompt block, empty string for an empty context.
    pub fn render(&self) -> String {
        if self.pairs.is_empty() {
            return String::new();
        }
        let mut out =
            String::from("Phrasing already used elsewhere on this slide, keep it consistent:\n");
        for (source, target) in &self.pairs {
            out.push_str("- ");
            out.push_str(source);
            out.push_str(" => ");
            out.push_str(target);
            out.push('\n');
        }
        out
    }
}

/// Aggregate translated paragraphs per slide. Glossary hits on the slide are
/// added first (highest confidence), then paragraph pairs in slide order,
/// until the pair or character budget is exhausted.
pub fn build_slide_contexts(
    tree: &DeckTree,
    glossary: &Glossary,
    max_pairs: usize,
    max_chars: usize,
) -> HashMap<usize, SlideContext> {
    let mut contexts: HashMap<usize, SlideContext> = HashMap::new();

    for slide in 0..tree.slide_count {
        let mut ctx = SlideContext {
            slide,
            pairs: Vec::new(),
        };
        let mut used_chars = 0usize;
        let push = |ctx: &mut SlideContext, used: &mut usize, src: String, tgt: String| {
            if ctx.pairs.len() >= max_pairs {
                return;
            }
            let cost = src.chars().count() + tgt.chars().count();
            if *used + cost > max_chars {
                return;
            }
            if ctx.pairs.iter().any(|(s, _)| *s == src) {
                return;
            }
            *used += cost;
            ctx.pairs.push((src, tgt));
        };

        let slide_paras = tree
            .paragraphs
            .iter()
            .filter(|p| p.id.slide == slide)
            .filter_map(|p| {
                p.para
                    .target_text
                    .as_deref()
                    .map(|t| (p.para.source_text.as_str(), t))
            });

        for (source, _) in slide_paras.clone() {
            for hit in glossary.lookup_matches(source, None) {
                push(
                    &mut ctx,
                    &mut used_chars,
                    hit.entry.source.clone(),
                    hit.entry.target.clone(),
                );
            }
        }
        for (source, target) in slide_paras {
            let (source, target) = (source.trim(), target.trim());
            if source.is_empty() || target.is_empty() {
                continue;
            }
            push(
                &mut ctx,
                &mut used_chars,
                source.to_string(),
                target.to_string(),
            );
        }

        if !ctx.is_empty() {
            contexts.insert(slide, ctx);
        }
    }

    contexts
}
