pub mod extract;
pub mod model;
pub mod package;
pub mod write;
pub mod xml;

#[cfg(test)]
pub(crate) mod testdeck;

pub use extract::extract_deck;
pub use model::{
    CellId, CellRecord, ChartLabelId, ChartLabelKind, ChartLabelRecord, Color, DeckTree,
    ParaPayload, ParagraphId, ParagraphProps, ParagraphRecord, Run, RunFormat,
};
pub use write::write_deck;
