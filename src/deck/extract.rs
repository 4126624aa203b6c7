use std::collections::HashMap;

use crate::deck::model::{
    CellId, CellRecord, ChartLabelId, ChartLabelKind, ChartLabelRecord, Color, DeckTree,
    ParaPayload, ParagraphId, ParagraphProps, ParagraphRecord, Run, RunFormat,
};
use crate::deck::package::DeckPackage;
use crate::deck::xml::{find_attr, parse_xml_part, XmlEvent, XmlPart};
use crate::error::DeckError;

/// One relationship from a `_rels` part.
#[derive(Clone, Debug)]
pub struct Rel {
    pub rel_type: String,
    pub target: String,
    pub external: bool,
}

#[derive(Clone, Debug, Default)]
pub struct RelMap {
    pub by_id: HashMap<String, Rel>,
}

impl RelMap {
    pub fn hyperlink_url(&self, rid: &str) -> Option<&str> {
        self.by_id
            .get(rid)
            .filter(|r| r.rel_type.ends_with("/hyperlink"))
            .map(|r| r.target.as_str())
    }

    pub fn rid_for_hyperlink(&self, url: &str) -> Option<&str> {
        self.by_id
            .iter()
            .find(|(_, r)| r.rel_type.ends_with("/hyperlink") && r.target == url)
            .map(|(id, _)| id.as_str())
    }

    pub fn chart_target(&self, rid: &str) -> Option<&str> {
        self.by_id
            .get(rid)
            .filter(|r| r.rel_type.ends_with("/chart"))
            .map(|r| r.target.as_str())
    }
}

pub fn parse_rels(part: &XmlPart) -> RelMap {
    let mut map = RelMap::default();
    for ev in &part.events {
        if let XmlEvent::Start { name, attrs } | XmlEvent::Empty { name, attrs } = ev {
            if name != "Relationship" {
                continue;
            }
            let (Some(id), Some(target)) = (find_attr(attrs, "Id"), find_attr(attrs, "Target"))
            else {
                continue;
            };
            map.by_id.insert(
                id.to_string(),
                Rel {
                    rel_type: find_attr(attrs, "Type").unwrap_or_default().to_string(),
                    target: target.to_string(),
                    external: find_attr(attrs, "TargetMode") == Some("External"),
                },
            );
        }
    }
    map
}

/// Who owns a scanned paragraph within a slide.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ParaOwner {
    Shape {
        shape: usize,
        paragraph: usize,
    },
    Cell {
        shape: usize,
        row: usize,
        col: usize,
        paragraph: usize,
    },
}

/// A paragraph's position in the slide part's event stream. `run_ranges` are
/// the half-open event ranges of its `a:r`/`a:br` blocks; everything else
/// between `p_start` and `p_end` is preserved verbatim on rewrite.
#[derive(Clone, Debug)]
pub(crate) struct ParaLoc {
    pub owner: ParaOwner,
    pub props: ParagraphProps,
    pub runs: Vec<Run>,
    pub p_start: usize,
    pub p_end: usize,
    pub run_ranges: Vec<(usize, usize)>,
}

#[derive(Debug, Default)]
pub(crate) struct SlideScan {
    pub paragraphs: Vec<ParaLoc>,
    /// `r:id` values of chart parts referenced from graphic frames, in order.
    pub chart_rids: Vec<String>,
}

/// Is this spTree child a drawable shape for identity numbering purposes?
fn is_shape_element(name: &str) -> bool {
    matches!(
        name,
        "p:sp" | "p:grpSp" | "p:graphicFrame" | "p:pic" | "p:cxnSp"
    )
}

fn parse_xml_bool(v: &str) -> bool {
    let s = v.trim().to_ascii_lowercase();
    !(s == "0" || s == "false" || s == "off" || s.is_empty())
}

/// Walk a slide part and record every paragraph with its runs, formatting and
/// event ranges. The writer re-runs this scan on the same part, so shape,
/// row/col and paragraph numbering must depend only on document order.
pub(crate) fn scan_slide_part(part: &XmlPart, rels: &RelMap) -> SlideScan {
    let mut scan = SlideScan::default();

    let mut shape_counter: usize = 0;
    let mut cur_shape: Option<usize> = None;

    // Text-body context: Some(true) inside a table cell body, Some(false)
    // inside a shape body.
    let mut in_cell_body: Option<bool> = None;
    let mut para_counter: usize = 0;

    // Table coordinates.
    let mut row: usize = 0;
    let mut col: usize = 0;
    let mut seen_row = false;
    let mut merged_continuation = false;

    // Current paragraph.
    let mut p_start: Option<usize> = None;
    let mut props = ParagraphProps::default();
    let mut runs: Vec<Run> = Vec::new();
    let mut run_ranges: Vec<(usize, usize)> = Vec::new();

    // Current run.
    let mut run_start: Option<usize> = None;
    let mut br_start: Option<usize> = None;
    let mut run_text = String::new();
    let mut run_format = RunFormat::default();
    let mut in_rpr = false;
    let mut in_solid_fill = false;
    let mut fill_excl_depth: usize = 0;
    let mut in_text_node = false;
    let mut in_field = false;

    for (idx, ev) in part.events.iter().enumerate() {
        match ev {
            XmlEvent::Start { name, attrs } | XmlEvent::Empty { name, attrs } => {
                let empty = matches!(ev, XmlEvent::Empty { .. });
                let name_s = name.as_str();

                if is_shape_element(name_s) && !empty {
                    shape_counter += 1;
                    cur_shape = Some(shape_counter - 1);
                }

                match name_s {
                    "p:txBody" if !empty => {
                        in_cell_body = Some(false);
                        para_counter = 0;
                    }
                    "a:txBody" if !empty => {
                        in_cell_body = Some(true);
                        para_counter = 0;
                    }
                    "a:tbl" if !empty => {
                        seen_row = false;
                    }
                    "a:tr" if !empty => {
                        if seen_row {
                            row += 1;
                        } else {
                            row = 0;
                            seen_row = true;
                        }
                        col = 0;
                    }
                    "a:tc" => {
                        if empty {
                            col += 1;
                        } else {
                            merged_continuation = find_attr(attrs, "hMerge")
                                .map(parse_xml_bool)
                                .unwrap_or(false)
                                || find_attr(attrs, "vMerge")
                                    .map(parse_xml_bool)
                                    .unwrap_or(false);
                        }
                    }
                    "c:chart" => {
                        if let Some(rid) = find_attr(attrs, "r:id") {
                            scan.chart_rids.push(rid.to_string());
                        }
                    }
                    "a:p" if !empty && in_cell_body.is_some() => {
                        p_start = Some(idx);
                        props = ParagraphProps::default();
                        runs.clear();
                        run_ranges.clear();
                    }
                    "a:pPr" if p_start.is_some() => {
                        props.align = find_attr(attrs, "algn").map(|v| v.to_string());
                        props.indent_level =
                            find_attr(attrs, "lvl").and_then(|v| v.trim().parse().ok());
                    }
                    "a:buChar" | "a:buAutoNum" if p_start.is_some() => {
                        props.bullet = true;
                    }
                    "a:buNone" if p_start.is_some() => {
                        props.bullet = false;
                    }
                    "a:r" if !empty && p_start.is_some() && !in_field => {
                        run_start = Some(idx);
                        run_text.clear();
                        run_format = RunFormat::default();
                    }
                    "a:br" if p_start.is_some() && !in_field => {
                        // An explicit line break is carried as a newline run.
                        if empty {
                            runs.push(Run::new("\n", RunFormat::default()));
                            run_ranges.push((idx, idx + 1));
                        } else {
                            br_start = Some(idx);
                        }
                    }
                    "a:fld" if !empty => {
                        // Auto-text fields (slide numbers etc.) are preserved
                        // verbatim and never translated.
                        in_field = true;
                    }
                    "a:rPr" if run_start.is_some() => {
                        in_rpr = !empty;
                        if let Some(v) = find_attr(attrs, "b") {
                            run_format.bold = Some(parse_xml_bool(v));
                        }
                        if let Some(v) = find_attr(attrs, "i") {
                            run_format.italic = Some(parse_xml_bool(v));
                        }
                        if let Some(v) = find_attr(attrs, "u") {
                            run_format.underline = Some(v.to_string());
                        }
                        if let Some(v) = find_attr(attrs, "sz") {
                            run_format.size = v.trim().parse().ok();
                        }
                        if let Some(v) = find_attr(attrs, "baseline") {
                            run_format.baseline = v.trim().parse().ok();
                        }
                    }
                    "a:solidFill" if in_rpr && !empty => {
                        in_solid_fill = true;
                    }
                    "a:ln" | "a:highlight" | "a:uFill" | "a:uLn" if in_rpr && !empty => {
                        fill_excl_depth += 1;
                    }
                    "a:srgbClr" if in_solid_fill && fill_excl_depth == 0 => {
                        if let Some(v) = find_attr(attrs, "val") {
                            run_format.color = Some(Color::Rgb(v.to_string()));
                        }
                    }
                    "a:schemeClr" if in_solid_fill && fill_excl_depth == 0 => {
                        if let Some(v) = find_attr(attrs, "val") {
                            run_format.color = Some(Color::Theme(v.to_string()));
                        }
                    }
                    "a:latin" if in_rpr => {
                        if let Some(v) = find_attr(attrs, "typeface") {
                            run_format.font = Some(v.to_string());
                        }
                    }
                    "a:hlinkClick" if in_rpr => {
                        if let Some(rid) = find_attr(attrs, "r:id") {
                            if let Some(url) = rels.hyperlink_url(rid) {
                                run_format.hyperlink = Some(url.to_string());
                            }
                        }
                    }
                    "a:t" if run_start.is_some() && !empty && !in_field => {
                        in_text_node = true;
                    }
                    _ => {}
                }
            }
            XmlEvent::End { name } => {
                let name_s = name.as_str();
                match name_s {
                    "a:t" => in_text_node = false,
                    "a:fld" => in_field = false,
                    "a:br" => {
                        if let Some(start) = br_start.take() {
                            runs.push(Run::new("\n", RunFormat::default()));
                            run_ranges.push((start, idx + 1));
                        }
                    }
                    "a:rPr" => {
                        in_rpr = false;
                        in_solid_fill = false;
                        fill_excl_depth = 0;
                    }
                    "a:solidFill" => in_solid_fill = false,
                    "a:ln" | "a:highlight" | "a:uFill" | "a:uLn" => {
                        fill_excl_depth = fill_excl_depth.saturating_sub(1);
                    }
                    "a:r" => {
                        in_rpr = false;
                        in_solid_fill = false;
                        fill_excl_depth = 0;
                        if let Some(start) = run_start.take() {
                            // Zero-length runs are dropped during normalization;
                            // their events are still replaced on rewrite.
                            if !run_text.is_empty() {
                                runs.push(Run::new(run_text.clone(), run_format.clone()));
                            }
                            run_ranges.push((start, idx + 1));
                        }
                    }
                    "a:p" => {
                        if let Some(start) = p_start.take() {
                            let owner = match in_cell_body {
                                Some(true) => ParaOwner::Cell {
                                    shape: cur_shape.unwrap_or(0),
                                    row,
                                    col,
                                    paragraph: para_counter,
                                },
                                _ => ParaOwner::Shape {
                                    shape: cur_shape.unwrap_or(0),
                                    paragraph: para_counter,
                                },
                            };
                            para_counter += 1;
                            if !(merged_continuation && in_cell_body == Some(true)) {
                                scan.paragraphs.push(ParaLoc {
                                    owner,
                                    props: props.clone(),
                                    runs: coalesce_adjacent_runs(runs.clone()),
                                    p_start: start,
                                    p_end: idx,
                                    run_ranges: run_ranges.clone(),
                                });
                            }
                        }
                    }
                    "p:txBody" | "a:txBody" => {
                        in_cell_body = None;
                    }
                    "a:tc" => {
                        col += 1;
                        merged_continuation = false;
                    }
                    _ => {}
                }
            }
            XmlEvent::Text { text } => {
                if in_text_node && run_start.is_some() {
                    run_text.push_str(text);
                }
            }
            _ => {}
        }
    }

    scan
}

/// Editors fragment visually identical text into many runs; merging them at
/// extraction keeps the aligner's span detection meaningful. The writer
/// splits `\n` back into explicit breaks, so newline runs merge too.
fn coalesce_adjacent_runs(runs: Vec<Run>) -> Vec<Run> {
    let mut out: Vec<Run> = Vec::with_capacity(runs.len());
    for run in runs {
        match out.last_mut() {
            Some(last) if last.format == run.format => last.text.push_str(&run.text),
            _ => out.push(run),
        }
    }
    out
}

#[derive(Clone, Debug)]
pub(crate) struct ChartLabelLoc {
    pub kind: ChartLabelKind,
    pub index: usize,
    pub text: String,
    /// Indices of `Text` events composing this label, in order. The writer
    /// puts the translated string into the first and blanks the rest.
    pub text_events: Vec<usize>,
}

#[derive(Debug, Default)]
pub(crate) struct ChartScan {
    pub labels: Vec<ChartLabelLoc>,
}

/// Walk a chart part and collect its translatable label strings. Data labels
/// and numeric caches are left alone.
pub(crate) fn scan_chart_part(part: &XmlPart) -> ChartScan {
    let mut scan = ChartScan::default();
    let mut stack: Vec<String> = Vec::new();

    let mut counts: HashMap<ChartLabelKind, usize> = HashMap::new();

    // Title collection (chart title or axis title).
    let mut title_kind: Option<ChartLabelKind> = None;
    let mut title_text = String::new();
    let mut title_events: Vec<usize> = Vec::new();
    let mut in_at = false;

    // String-cache collection (series names, category labels).
    let mut in_ser_tx = false;
    let mut in_cat = false;
    let mut in_str_cache = false;
    let mut in_pt_v = false;
    let mut pt_text = String::new();
    let mut pt_events: Vec<usize> = Vec::new();

    let push_label =
        |scan: &mut ChartScan, counts: &mut HashMap<ChartLabelKind, usize>, kind: ChartLabelKind, text: String, events: Vec<usize>| {
            if events.is_empty() {
                return;
            }
            let index = counts.entry(kind).or_insert(0);
            scan.labels.push(ChartLabelLoc {
                kind,
                index: *index,
                text,
                text_events: events,
            });
            *index += 1;
        };

    for (idx, ev) in part.events.iter().enumerate() {
        match ev {
            XmlEvent::Start { name, .. } => {
                let name_s = name.as_str();
                let in_axis = stack.iter().any(|n| {
                    matches!(n.as_str(), "c:catAx" | "c:valAx" | "c:dateAx" | "c:serAx")
                });
                match name_s {
                    "c:title" => {
                        title_kind = Some(if in_axis {
                            ChartLabelKind::AxisTitle
                        } else {
                            ChartLabelKind::Title
                        });
                        title_text.clear();
                        title_events.clear();
                    }
                    "a:t" if title_kind.is_some() => in_at = true,
                    "c:tx" if stack.iter().any(|n| n == "c:ser") => in_ser_tx = true,
                    "c:cat" => in_cat = true,
                    "c:strCache" | "c:strRef" if in_ser_tx || in_cat => {
                        if name_s == "c:strCache" {
                            in_str_cache = true;
                        }
                    }
                    "c:v" if (in_ser_tx && (in_str_cache || stack.last().is_some_and(|n| n == "c:tx")))
                        || (in_cat && in_str_cache) =>
                    {
                        in_pt_v = true;
                        pt_text.clear();
                        pt_events.clear();
                    }
                    _ => {}
                }
                stack.push(name.clone());
            }
            XmlEvent::End { name } => {
                let _ = stack.pop();
                let name_s = name.as_str();
                match name_s {
                    "a:t" => in_at = false,
                    "c:title" => {
                        if let Some(kind) = title_kind.take() {
                            push_label(
                                &mut scan,
                                &mut counts,
                                kind,
                                title_text.clone(),
                                title_events.clone(),
                            );
                        }
                    }
                    "c:v" => {
                        if in_pt_v {
                            in_pt_v = false;
                            let kind = if in_ser_tx {
                                ChartLabelKind::SeriesName
                            } else {
                                ChartLabelKind::CategoryLabel
                            };
                            push_label(
                                &mut scan,
                                &mut counts,
                                kind,
                                pt_text.clone(),
                                pt_events.clone(),
                            );
                        }
                    }
                    "c:strCache" => in_str_cache = false,
                    "c:tx" => in_ser_tx = false,
                    "c:cat" => in_cat = false,
                    _ => {}
                }
            }
            XmlEvent::Text { text } => {
                if in_at && title_kind.is_some() {
                    title_text.push_str(text);
                    title_events.push(idx);
                } else if in_pt_v {
                    pt_text.push_str(text);
                    pt_events.push(idx);
                }
            }
            _ => {}
        }
    }

    scan
}

/// Extract the normalized record streams from a deck container.
pub fn extract_deck(bytes: &[u8]) -> Result<DeckTree, DeckError> {
    let pkg = DeckPackage::read(bytes)?;
    let mut tree = DeckTree::default();

    let slide_names = pkg.slide_part_names();
    tree.slide_count = slide_names.len();

    for (slide_idx, slide_name) in slide_names.iter().enumerate() {
        let Some(entry) = pkg.entry(slide_name) else {
            continue;
        };
        let part = match parse_xml_part(slide_name, &entry.data) {
            Ok(p) => p,
            Err(e) => {
                tree.warnings
                    .push(format!("skipped unreadable slide {slide_name}: {e}"));
                continue;
            }
        };
        let rels = pkg
            .entry(&DeckPackage::rels_name_for(slide_name))
            .and_then(|e| parse_xml_part(&format!("{slide_name}.rels"), &e.data).ok())
            .map(|p| parse_rels(&p))
            .unwrap_or_default();

        let scan = scan_slide_part(&part, &rels);

        let mut cells: HashMap<CellId, CellRecord> = HashMap::new();
        let mut cell_order: Vec<CellId> = Vec::new();
        for loc in &scan.paragraphs {
            match loc.owner {
                ParaOwner::Shape { shape, paragraph } => {
                    tree.paragraphs.push(ParagraphRecord {
                        id: ParagraphId {
                            slide: slide_idx,
                            shape,
                            paragraph,
                        },
                        para: ParaPayload::from_runs(loc.props.clone(), loc.runs.clone()),
                    });
                }
                ParaOwner::Cell {
                    shape, row, col, ..
                } => {
                    let id = CellId {
                        slide: slide_idx,
                        shape,
                        row,
                        col,
                    };
                    let rec = cells.entry(id).or_insert_with(|| {
                        cell_order.push(id);
                        CellRecord {
                            id,
                            paragraphs: Vec::new(),
                        }
                    });
                    rec.paragraphs
                        .push(ParaPayload::from_runs(loc.props.clone(), loc.runs.clone()));
                }
            }
        }
        for id in cell_order {
            if let Some(rec) = cells.remove(&id) {
                tree.cells.push(rec);
            }
        }

        for rid in &scan.chart_rids {
            let Some(target) = rels.chart_target(rid) else {
                tree.warnings
                    .push(format!("slide {slide_name}: unresolved chart rel {rid}"));
                continue;
            };
            let chart_name = DeckPackage::resolve_rel_target(slide_name, target);
            let Some(chart_entry) = pkg.entry(&chart_name) else {
                tree.warnings
                    .push(format!("slide {slide_name}: missing chart part {chart_name}"));
                continue;
            };
            let chart_part = match parse_xml_part(&chart_name, &chart_entry.data) {
                Ok(p) => p,
                Err(e) => {
                    tree.warnings
                        .push(format!("skipped unreadable chart {chart_name}: {e}"));
                    continue;
                }
            };
            for label in scan_chart_part(&chart_part).labels {
                tree.chart_labels.push(ChartLabelRecord {
                    id: ChartLabelId {
                        slide: slide_idx,
                        part: chart_name.clone(),
                        kind: label.kind,
                        index: label.index,
                    },
                    source_text: label.text,
                    target_text: None,
                    failure: None,
                });
            }
        }
    }

    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::testdeck;

    #[test]
    fn extracts_runs_with_formatting() {
        let slide = testdeck::slide_xml(&[testdeck::shape(&[testdeck::paragraph(&[
            ("Employees with an ", ""),
            ("invisible", r#" b="1""#),
            (" disability", ""),
        ])])]);
        let bytes = testdeck::deck_bytes(&[&slide]);
        let tree = extract_deck(&bytes).expect("extract");

        assert_eq!(tree.slide_count, 1);
        assert_eq!(tree.paragraphs.len(), 1);
        let para = &tree.paragraphs[0].para;
        assert_eq!(para.source_text, "Employees with an invisible disability");
        assert_eq!(para.runs.len(), 3);
        assert_eq!(para.runs[1].format.bold, Some(true));
        assert_eq!(para.runs[0].format, RunFormat::default());
    }

    #[test]
    fn missing_attrs_stay_inherit() {
        let slide = testdeck::slide_xml(&[testdeck::shape(&[testdeck::paragraph(&[(
            "plain", "",
        )])])]);
        let bytes = testdeck::deck_bytes(&[&slide]);
        let tree = extract_deck(&bytes).expect("extract");
        let fmt = &tree.paragraphs[0].para.runs[0].format;
        assert!(fmt.is_default());
    }

    #[test]
    fn fragmented_identical_runs_are_merged() {
        let slide = testdeck::slide_xml(&[testdeck::shape(&[testdeck::paragraph(&[
            ("Hel", ""),
            ("lo", ""),
            (" wor", ""),
            ("ld", ""),
        ])])]);
        let bytes = testdeck::deck_bytes(&[&slide]);
        let tree = extract_deck(&bytes).expect("extract");
        let para = &tree.paragraphs[0].para;
        assert_eq!(para.source_text, "Hello world");
        assert_eq!(para.runs.len(), 1);
    }

    #[test]
    fn empty_paragraph_is_emitted() {
        let slide = testdeck::slide_xml(&[testdeck::shape(&["<a:p></a:p>".to_string()])]);
        let bytes = testdeck::deck_bytes(&[&slide]);
        let tree = extract_deck(&bytes).expect("extract");
        assert_eq!(tree.paragraphs.len(), 1);
        assert!(tree.paragraphs[0].para.is_empty());
    }

    #[test]
    fn table_cells_and_merge_continuations() {
        let tbl = testdeck::table(&[
            vec![testdeck::cell("", &["Alpha"]), testdeck::cell("", &["Beta"])],
            vec![
                testdeck::cell(r#" gridSpan="2""#, &["Anchor"]),
                testdeck::cell(r#" hMerge="1""#, &[""]),
            ],
        ]);
        let slide = testdeck::slide_xml(&[tbl]);
        let bytes = testdeck::deck_bytes(&[&slide]);
        let tree = extract_deck(&bytes).expect("extract");

        let texts: Vec<&str> = tree
            .cells
            .iter()
            .flat_map(|c| c.paragraphs.iter().map(|p| p.source_text.as_str()))
            .collect();
        assert_eq!(texts, vec!["Alpha", "Beta", "Anchor"]);
        let anchor = tree.cells.iter().find(|c| c.id.row == 1).expect("row 1");
        assert_eq!(anchor.id.col, 0);
    }

    #[test]
    fn hyperlink_resolved_from_rels() {
        let slide = testdeck::slide_xml(&[testdeck::shape(&[testdeck::paragraph_raw(&[
            testdeck::run_raw("See the ", ""),
            testdeck::run_raw(
                "report",
                r#"<a:hlinkClick xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" r:id="rId9"/>"#,
            ),
        ])])]);
        let rels = testdeck::rels_xml(&[(
            "rId9",
            "http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink",
            "http://x",
            true,
        )]);
        let bytes = testdeck::deck_bytes_with_rels(&[(&slide, Some(&rels))], &[]);
        let tree = extract_deck(&bytes).expect("extract");
        assert_eq!(
            tree.paragraphs[0].para.runs[1].format.hyperlink.as_deref(),
            Some("http://x")
        );
    }

    #[test]
    fn chart_labels_extracted() {
        let chart = testdeck::chart_xml("Revenue by year", &["North", "South"], &["2023", "2024"]);
        let slide = testdeck::slide_with_chart("rId3");
        let rels = testdeck::rels_xml(&[(
            "rId3",
            "http://schemas.openxmlformats.org/officeDocument/2006/relationships/chart",
            "../charts/chart1.xml",
            false,
        )]);
        let bytes = testdeck::deck_bytes_with_rels(
            &[(&slide, Some(&rels))],
            &[("ppt/charts/chart1.xml", &chart)],
        );
        let tree = extract_deck(&bytes).expect("extract");

        let kinds: Vec<(ChartLabelKind, &str)> = tree
            .chart_labels
            .iter()
            .map(|l| (l.id.kind, l.source_text.as_str()))
            .collect();
        assert!(kinds.contains(&(ChartLabelKind::Title, "Revenue by year")));
        assert!(kinds.contains(&(ChartLabelKind::SeriesName, "North")));
        assert!(kinds.contains(&(ChartLabelKind::SeriesName, "South")));
        assert!(kinds.contains(&(ChartLabelKind::CategoryLabel, "2023")));
        assert_eq!(tree.chart_labels.iter().filter(|l| l.id.kind == ChartLabelKind::CategoryLabel).count(), 4);
    }

    #[test]
    fn malformed_container_is_fatal() {
        let err = extract_deck(b"not a zip").expect_err("must fail");
        assert!(matches!(err, DeckError::Malformed(_)));
    }
}
