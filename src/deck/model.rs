use serde::{Deserialize, Serialize};

/// Run colour: either an explicit RGB value or a theme slot reference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Color {
    Rgb(String),
    Theme(String),
}

impl Color {
    /// Theme slots that resolve to the slide background. These behave as
    /// "inherit" for alignment purposes: a run whose only deviation is a
    /// background-coloured fill is not a formatted span.
    pub fn is_theme_background(&self) -> bool {
        matches!(self, Color::Theme(name) if matches!(name.as_str(), "bg1" | "bg2" | "lt1" | "lt2"))
    }
}

/// Per-character formatting of a run. `None` means "inherit from the
/// paragraph/shape/theme" and is written back as absence, never as a default.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunFormat {
    pub font: Option<String>,
    /// Font size in hundredths of a point, as the container stores it.
    pub size: Option<u32>,
    pub bold: Option<bool>,
    pub italic: Option<bool>,
    /// Underline style value (`sng`, `dbl`, ... or `none`).
    pub underline: Option<String>,
    pub color: Option<Color>,
    /// Baseline offset in thousandths of a percent; positive is superscript,
    /// negative is subscript.
    pub baseline: Option<i32>,
    pub hyperlink: Option<String>,
}

impl RunFormat {
    pub fn is_default(&self) -> bool {
        *self == RunFormat::default()
    }

    pub fn is_underlined(&self) -> bool {
        self.underline.as_deref().is_some_and(|u| u != "none")
    }

    pub fn size_points(&self) -> Option<f32> {
        self.size.map(|s| s as f32 / 100.0)
    }

    /// The colour as it counts for alignment: theme-background fills are
    /// treated as inherit.
    pub fn effective_color(&self) -> Option<&Color> {
        self.color.as_ref().filter(|c| !c.is_theme_background())
    }
}

/// The smallest unit of styled text inside a paragraph. Source runs
/// concatenate exactly to the paragraph text; `\n` inside a run text marks an
/// explicit line break.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub text: String,
    pub format: RunFormat,
}

impl Run {
    pub fn new(text: impl Into<String>, format: RunFormat) -> Self {
        Self {
            text: text.into(),
            format,
        }
    }

    pub fn is_whitespace(&self) -> bool {
        self.text.chars().all(char::is_whitespace)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ParagraphProps {
    pub align: Option<String>,
    pub indent_level: Option<u32>,
    pub bullet: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParagraphId {
    pub slide: usize,
    pub shape: usize,
    pub paragraph: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellId {
    pub slide: usize,
    pub shape: usize,
    pub row: usize,
    pub col: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartLabelKind {
    Title,
    AxisTitle,
    LegendEntry,
    CategoryLabel,
    SeriesName,
}

impl ChartLabelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartLabelKind::Title => "title",
            ChartLabelKind::AxisTitle => "axis_title",
            ChartLabelKind::LegendEntry => "legend_entry",
            ChartLabelKind::CategoryLabel => "category_label",
            ChartLabelKind::SeriesName => "series_name",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChartLabelId {
    pub slide: usize,
    /// Chart part name inside the container (`ppt/charts/chart1.xml`).
    pub part: String,
    pub kind: ChartLabelKind,
    pub index: usize,
}

/// Translation state of one paragraph's worth of text, shared between
/// free-standing paragraphs and table-cell paragraphs.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ParaPayload {
    pub props: ParagraphProps,
    pub runs: Vec<Run>,
    pub source_text: String,
    #[serde(default)]
    pub target_text: Option<String>,
    #[serde(default)]
    pub aligned_runs: Option<Vec<Run>>,
    #[serde(default)]
    pub failure: Option<String>,
}

impl ParaPayload {
    pub fn from_runs(props: ParagraphProps, runs: Vec<Run>) -> Self {
        let source_text: String = runs.iter().map(|r| r.text.as_str()).collect();
        Self {
            props,
            runs,
            source_text,
            target_text: None,
            aligned_runs: None,
            failure: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.source_text.trim().is_empty()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParagraphRecord {
    pub id: ParagraphId,
    #[serde(flatten)]
    pub para: ParaPayload,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CellRecord {
    pub id: CellId,
    pub paragraphs: Vec<ParaPayload>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChartLabelRecord {
    pub id: ChartLabelId,
    pub source_text: String,
    #[serde(default)]
    pub target_text: Option<String>,
    #[serde(default)]
    pub failure: Option<String>,
}

/// Everything the extractor pulls out of one deck, in container order.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DeckTree {
    pub slide_count: usize,
    pub paragraphs: Vec<ParagraphRecord>,
    pub cells: Vec<CellRecord>,
    pub chart_labels: Vec<ChartLabelRecord>,
    #[serde(default)]
    pub warnings: Vec<String>,
}
