use std::collections::HashMap;

use tracing::warn;

use crate::deck::extract::{parse_rels, scan_chart_part, scan_slide_part, ParaLoc, ParaOwner, RelMap};
use crate::deck::model::{CellId, ChartLabelKind, Color, DeckTree, ParagraphId, Run, RunFormat};
use crate::deck::package::DeckPackage;
use crate::deck::xml::{parse_xml_part, write_xml_part, Attr, XmlEvent, XmlPart};
use crate::error::DeckError;

/// Re-assemble the translated records into a new deck container. Parts without
/// any translated content are copied byte-identical; the input is never
/// modified.
pub fn write_deck(input: &[u8], tree: &DeckTree) -> Result<Vec<u8>, DeckError> {
    let pkg = DeckPackage::read(input)?;
    let mut replacements: HashMap<String, Vec<u8>> = HashMap::new();

    let mut shape_paras: HashMap<ParagraphId, &Vec<Run>> = HashMap::new();
    for rec in &tree.paragraphs {
        if let Some(runs) = rec.para.aligned_runs.as_ref() {
            if !runs.is_empty() {
                shape_paras.insert(rec.id, runs);
            }
        }
    }
    let mut cell_paras: HashMap<(CellId, usize), &Vec<Run>> = HashMap::new();
    for cell in &tree.cells {
        for (pi, para) in cell.paragraphs.iter().enumerate() {
            if let Some(runs) = para.aligned_runs.as_ref() {
                if !runs.is_empty() {
                    cell_paras.insert((cell.id, pi), runs);
                }
            }
        }
    }

    let slide_names = pkg.slide_part_names();
    for (slide_idx, slide_name) in slide_names.iter().enumerate() {
        let has_para = shape_paras.keys().any(|id| id.slide == slide_idx)
            || cell_paras.keys().any(|(id, _)| id.slide == slide_idx);
        if !has_para {
            continue;
        }
        let Some(entry) = pkg.entry(slide_name) else {
            continue;
        };
        let part = parse_xml_part(slide_name, &entry.data)
            .map_err(|e| DeckError::Malformed(format!("parse {slide_name}: {e}")))?;
        let rels = pkg
            .entry(&DeckPackage::rels_name_for(slide_name))
            .and_then(|e| parse_xml_part(&format!("{slide_name}.rels"), &e.data).ok())
            .map(|p| parse_rels(&p))
            .unwrap_or_default();

        let scan = scan_slide_part(&part, &rels);
        let mut edits: Vec<(usize, usize, Vec<XmlEvent>)> = Vec::new();
        for loc in &scan.paragraphs {
            let runs = match loc.owner {
                ParaOwner::Shape { shape, paragraph } => shape_paras.get(&ParagraphId {
                    slide: slide_idx,
                    shape,
                    paragraph,
                }),
                ParaOwner::Cell {
                    shape,
                    row,
                    col,
                    paragraph,
                } => cell_paras.get(&(
                    CellId {
                        slide: slide_idx,
                        shape,
                        row,
                        col,
                    },
                    paragraph,
                )),
            };
            let Some(runs) = runs else { continue };
            if loc.run_ranges.is_empty() {
                continue;
            }
            edits.push((loc.p_start, loc.p_end, splice_paragraph(&part, loc, runs, &rels)));
        }
        if edits.is_empty() {
            continue;
        }
        edits.sort_by_key(|(start, _, _)| *start);

        let mut out_events: Vec<XmlEvent> = Vec::with_capacity(part.events.len());
        let mut cursor = 0usize;
        for (start, end, events) in edits {
            out_events.extend_from_slice(&part.events[cursor..start]);
            out_events.extend(events);
            cursor = end + 1;
        }
        out_events.extend_from_slice(&part.events[cursor..]);

        let new_part = XmlPart {
            name: part.name.clone(),
            events: out_events,
        };
        let bytes = write_xml_part(&new_part)
            .map_err(|e| DeckError::WriterIo(format!("serialize {slide_name}: {e}")))?;
        replacements.insert(slide_name.clone(), bytes);
    }

    // Chart label strings, grouped per chart part.
    let mut by_part: HashMap<&str, Vec<(ChartLabelKind, usize, &str)>> = HashMap::new();
    for label in &tree.chart_labels {
        if let Some(target) = label.target_text.as_deref() {
            by_part
                .entry(label.id.part.as_str())
                .or_default()
                .push((label.id.kind, label.id.index, target));
        }
    }
    for (part_name, labels) in by_part {
        let Some(entry) = pkg.entry(part_name) else {
            continue;
        };
        let mut part = parse_xml_part(part_name, &entry.data)
            .map_err(|e| DeckError::Malformed(format!("parse {part_name}: {e}")))?;
        let scan = scan_chart_part(&part);
        let mut changed = false;
        for (kind, index, target) in labels {
            let Some(loc) = scan
                .labels
                .iter()
                .find(|l| l.kind == kind && l.index == index)
            else {
                warn!(part = part_name, "translated chart label no longer found");
                continue;
            };
            for (i, ev_idx) in loc.text_events.iter().enumerate() {
                part.events[*ev_idx] = XmlEvent::Text {
                    text: if i == 0 { target.to_string() } else { String::new() },
                };
            }
            changed = true;
        }
        if changed {
            let bytes = write_xml_part(&part)
                .map_err(|e| DeckError::WriterIo(format!("serialize {part_name}: {e}")))?;
            replacements.insert(part_name.to_string(), bytes);
        }
    }

    pkg.write_with_replacements(&replacements)
}

/// Build the replacement event list for one paragraph: everything outside the
/// run blocks is kept verbatim, the run blocks are replaced by the aligned
/// runs.
fn splice_paragraph(
    part: &XmlPart,
    loc: &ParaLoc,
    runs: &[Run],
    rels: &RelMap,
) -> Vec<XmlEvent> {
    let first_run_start = loc.run_ranges.first().map(|(s, _)| *s).unwrap_or(loc.p_end);
    let last_run_end = loc.run_ranges.last().map(|(_, e)| *e).unwrap_or(loc.p_end);

    let mut out: Vec<XmlEvent> = Vec::new();
    out.extend_from_slice(&part.events[loc.p_start..first_run_start]);
    for run in runs {
        push_run_events(&mut out, run, rels);
    }
    // Non-run elements interleaved between runs (auto-text fields and the
    // like) are preserved after the new runs.
    let mut idx = first_run_start;
    while idx < last_run_end {
        if let Some(&(_, end)) = loc.run_ranges.iter().find(|(s, _)| *s == idx) {
            idx = end;
            continue;
        }
        out.push(part.events[idx].clone());
        idx += 1;
    }
    out.extend_from_slice(&part.events[last_run_end..=loc.p_end]);
    out
}

fn push_run_events(out: &mut Vec<XmlEvent>, run: &Run, rels: &RelMap) {
    for (i, segment) in run.text.split('\n').enumerate() {
        if i > 0 {
            out.push(XmlEvent::Empty {
                name: "a:br".to_string(),
                attrs: Vec::new(),
            });
        }
        if segment.is_empty() {
            continue;
        }
        out.push(XmlEvent::Start {
            name: "a:r".to_string(),
            attrs: Vec::new(),
        });
        push_rpr_events(out, &run.format, rels);
        out.push(XmlEvent::Start {
            name: "a:t".to_string(),
            attrs: Vec::new(),
        });
        out.push(XmlEvent::Text {
            text: segment.to_string(),
        });
        out.push(XmlEvent::End {
            name: "a:t".to_string(),
        });
        out.push(XmlEvent::End {
            name: "a:r".to_string(),
        });
    }
}

/// Emit an `a:rPr` carrying exactly the attributes the format specifies;
/// absent fields are not written, preserving inherit semantics. A fully
/// inherited format emits no `a:rPr` at all.
fn push_rpr_events(out: &mut Vec<XmlEvent>, fmt: &RunFormat, rels: &RelMap) {
    let mut attrs: Vec<Attr> = Vec::new();
    if let Some(b) = fmt.bold {
        attrs.push(Attr::new("b", if b { "1" } else { "0" }));
    }
    if let Some(i) = fmt.italic {
        attrs.push(Attr::new("i", if i { "1" } else { "0" }));
    }
    if let Some(u) = fmt.underline.as_deref() {
        attrs.push(Attr::new("u", u));
    }
    if let Some(sz) = fmt.size {
        attrs.push(Attr::new("sz", &sz.to_string()));
    }
    if let Some(base) = fmt.baseline {
        attrs.push(Attr::new("baseline", &base.to_string()));
    }

    let mut children: Vec<XmlEvent> = Vec::new();
    if let Some(color) = fmt.color.as_ref() {
        let (name, val) = match color {
            Color::Rgb(v) => ("a:srgbClr", v),
            Color::Theme(v) => ("a:schemeClr", v),
        };
        children.push(XmlEvent::Start {
            name: "a:solidFill".to_string(),
            attrs: Vec::new(),
        });
        children.push(XmlEvent::Empty {
            name: name.to_string(),
            attrs: vec![Attr::new("val", val)],
        });
        children.push(XmlEvent::End {
            name: "a:solidFill".to_string(),
        });
    }
    if let Some(font) = fmt.font.as_deref() {
        children.push(XmlEvent::Empty {
            name: "a:latin".to_string(),
            attrs: vec![Attr::new("typeface", font)],
        });
    }
    if let Some(url) = fmt.hyperlink.as_deref() {
        match rels.rid_for_hyperlink(url) {
            Some(rid) => children.push(XmlEvent::Empty {
                name: "a:hlinkClick".to_string(),
                attrs: vec![Attr::new("r:id", rid)],
            }),
            None => warn!(url, "no relationship found for hyperlink, dropping"),
        }
    }

    if attrs.is_empty() && children.is_empty() {
        return;
    }
    if children.is_empty() {
        out.push(XmlEvent::Empty {
            name: "a:rPr".to_string(),
            attrs,
        });
    } else {
        out.push(XmlEvent::Start {
            name: "a:rPr".to_string(),
            attrs,
        });
        out.extend(children);
        out.push(XmlEvent::End {
            name: "a:rPr".to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::extract::extract_deck;
    use crate::deck::model::RunFormat;
    use crate::deck::testdeck;

    fn bold() -> RunFormat {
        RunFormat {
            bold: Some(true),
            ..RunFormat::default()
        }
    }

    #[test]
    fn rewrites_paragraph_with_new_runs() {
        let slide = testdeck::slide_xml(&[testdeck::shape(&[testdeck::paragraph(&[
            ("Employees with an ", ""),
            ("invisible", r#" b="1""#),
            (" disability", ""),
        ])])]);
        let bytes = testdeck::deck_bytes(&[&slide]);
        let mut tree = extract_deck(&bytes).expect("extract");

        tree.paragraphs[0].para.target_text =
            Some("Les employés ayant un handicap invisible".to_string());
        tree.paragraphs[0].para.aligned_runs = Some(vec![
            Run::new("Les employés ayant un handicap ", RunFormat::default()),
            Run::new("invisible", bold()),
        ]);

        let out = write_deck(&bytes, &tree).expect("write");
        let round = extract_deck(&out).expect("re-extract");
        let para = &round.paragraphs[0].para;
        assert_eq!(para.source_text, "Les employés ayant un handicap invisible");
        assert_eq!(para.runs.len(), 2);
        assert_eq!(para.runs[1].text, "invisible");
        assert_eq!(para.runs[1].format.bold, Some(true));
        assert_eq!(para.runs[0].format, RunFormat::default());
    }

    #[test]
    fn untouched_slides_are_copied_verbatim() {
        let slide1 = testdeck::slide_xml(&[testdeck::shape(&[testdeck::paragraph(&[(
            "Translate me", "",
        )])])]);
        let slide2 = testdeck::slide_xml(&[testdeck::shape(&[testdeck::paragraph(&[(
            "Leave me alone", "",
        )])])]);
        let bytes = testdeck::deck_bytes(&[&slide1, &slide2]);
        let mut tree = extract_deck(&bytes).expect("extract");

        let first = tree
            .paragraphs
            .iter_mut()
            .find(|p| p.id.slide == 0)
            .expect("first");
        first.para.aligned_runs = Some(vec![Run::new("Traduis-moi", RunFormat::default())]);

        let out = write_deck(&bytes, &tree).expect("write");
        let in_pkg = DeckPackage::read(&bytes).expect("read in");
        let out_pkg = DeckPackage::read(&out).expect("read out");
        assert_eq!(
            in_pkg.entry("ppt/slides/slide2.xml").expect("slide2").data,
            out_pkg.entry("ppt/slides/slide2.xml").expect("slide2").data
        );
        assert_ne!(
            in_pkg.entry("ppt/slides/slide1.xml").expect("slide1").data,
            out_pkg.entry("ppt/slides/slide1.xml").expect("slide1").data
        );
    }

    #[test]
    fn hyperlink_rid_is_reused_on_write() {
        let slide = testdeck::slide_xml(&[testdeck::shape(&[testdeck::paragraph_raw(&[
            testdeck::run_raw("See the ", ""),
            testdeck::run_raw("report", r#"<a:hlinkClick r:id="rId9"/>"#),
            testdeck::run_raw(".", ""),
        ])])]);
        let rels = testdeck::rels_xml(&[(
            "rId9",
            "http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink",
            "http://x",
            true,
        )]);
        let bytes = testdeck::deck_bytes_with_rels(&[(&slide, Some(&rels))], &[]);
        let mut tree = extract_deck(&bytes).expect("extract");

        let link = RunFormat {
            hyperlink: Some("http://x".to_string()),
            ..RunFormat::default()
        };
        tree.paragraphs[0].para.aligned_runs = Some(vec![
            Run::new("Voir le ", RunFormat::default()),
            Run::new("rapport", link.clone()),
            Run::new(".", RunFormat::default()),
        ]);

        let out = write_deck(&bytes, &tree).expect("write");
        let round = extract_deck(&out).expect("re-extract");
        let para = &round.paragraphs[0].para;
        assert_eq!(para.runs[1].text, "rapport");
        assert_eq!(para.runs[1].format.hyperlink.as_deref(), Some("http://x"));
    }

    #[test]
    fn newline_runs_become_breaks() {
        let slide = testdeck::slide_xml(&[testdeck::shape(&[testdeck::paragraph(&[(
            "one line", "",
        )])])]);
        let bytes = testdeck::deck_bytes(&[&slide]);
        let mut tree = extract_deck(&bytes).expect("extract");
        tree.paragraphs[0].para.aligned_runs =
            Some(vec![Run::new("first\nsecond", RunFormat::default())]);

        let out = write_deck(&bytes, &tree).expect("write");
        let round = extract_deck(&out).expect("re-extract");
        assert_eq!(round.paragraphs[0].para.source_text, "first\nsecond");
    }

    #[test]
    fn chart_title_rewritten() {
        let chart = testdeck::chart_xml("Revenue by year", &["North"], &["2023"]);
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
        let mut tree = extract_deck(&bytes).expect("extract");
        for label in &mut tree.chart_labels {
            if label.id.kind == ChartLabelKind::Title {
                label.target_text = Some("Chiffre d'affaires par année".to_string());
            }
        }

        let out = write_deck(&bytes, &tree).expect("write");
        let round = extract_deck(&out).expect("re-extract");
        let title = round
            .chart_labels
            .iter()
            .find(|l| l.id.kind == ChartLabelKind::Title)
            .expect("title");
        assert_eq!(title.source_text, "Chiffre d'affaires par année");
    }
}
