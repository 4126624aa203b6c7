use std::time::Duration;

use crate::backend::CancelToken;
use crate::deck::model::{CellRecord, ChartLabelRecord, ParaPayload, ParagraphProps, Run, RunFormat};
use crate::error::TranslateError;
use crate::pipeline::context::SlideContext;
use crate::pipeline::paragraphs::ParagraphTranslator;
use crate::textutil::is_trivial_text;

/// Chart labels are single-format strings: translate with the slide context
/// as prompt context, no run alignment.
pub fn translate_label(
    translator: &ParagraphTranslator,
    label: &mut ChartLabelRecord,
    context: Option<&SlideContext>,
    timeout: Duration,
    cancel: &CancelToken,
) -> Result<(), TranslateError> {
    if is_trivial_text(&label.source_text) {
        return Ok(());
    }
    let mut payload = ParaPayload::from_runs(
        ParagraphProps::default(),
        vec![Run::new(label.source_text.clone(), RunFormat::default())],
    );
    let rendered = context.map(|c| c.render()).unwrap_or_default();
    let extra = (!rendered.is_empty()).then_some(rendered.as_str());
    translator.translate_payload(&mut payload, extra, Some(timeout), cancel)?;
    label.target_text = payload.target_text;
    label.failure = payload.failure;
    Ok(())
}

/// Table cells are lists of paragraphs: each goes through the paragraph
/// translator with the slide context; alignment happens in a later stage.
pub fn translate_cell(
    translator: &ParagraphTranslator,
    cell: &mut CellRecord,
    context: Option<&SlideContext>,
    timeout: Duration,
    cancel: &CancelToken,
) -> Result<(), TranslateError> {
    let rendered = context.map(|c| c.render()).unwrap_or_default();
    let extra = (!rendered.is_empty()).then_some(rendered.as_str());
    for para in &mut cell.paragraphs {
        translator.translate_payload(para, extra, Some(timeout), cancel)?;
    }
    Ok(())
}
