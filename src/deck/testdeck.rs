//! In-memory deck builders for tests: just enough container and DrawingML to
//! exercise extraction, alignment and writing.

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::ZipWriter;

fn esc(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

pub fn run(text: &str, rpr_attrs: &str) -> String {
    if rpr_attrs.is_empty() {
        format!("<a:r><a:t>{}</a:t></a:r>", esc(text))
    } else {
        format!("<a:r><a:rPr{rpr_attrs}/><a:t>{}</a:t></a:r>", esc(text))
    }
}

pub fn run_raw(text: &str, rpr_children: &str) -> String {
    if rpr_children.is_empty() {
        format!("<a:r><a:t>{}</a:t></a:r>", esc(text))
    } else {
        format!(
            "<a:r><a:rPr>{rpr_children}</a:rPr><a:t>{}</a:t></a:r>",
            esc(text)
        )
    }
}

pub fn paragraph(runs: &[(&str, &str)]) -> String {
    let body: String = runs.iter().map(|(t, a)| run(t, a)).collect();
    format!("<a:p>{body}</a:p>")
}

pub fn paragraph_raw(runs: &[String]) -> String {
    format!("<a:p>{}</a:p>", runs.concat())
}

pub fn shape(paragraphs: &[String]) -> String {
    format!(
        concat!(
            "<p:sp><p:nvSpPr><p:cNvPr id=\"2\" name=\"TextBox\"/><p:cNvSpPr/><p:nvPr/></p:nvSpPr>",
            "<p:spPr/><p:txBody><a:bodyPr/>{}</p:txBody></p:sp>"
        ),
        paragraphs.concat()
    )
}

pub fn cell(attrs: &str, para_texts: &[&str]) -> String {
    let paras: String = para_texts
        .iter()
        .map(|t| {
            if t.is_empty() {
                "<a:p/>".to_string()
            } else {
                paragraph(&[(t, "")])
            }
        })
        .collect();
    format!("<a:tc{attrs}><a:txBody><a:bodyPr/>{paras}</a:txBody><a:tcPr/></a:tc>")
}

pub fn table(rows: &[Vec<String>]) -> String {
    let body: String = rows
        .iter()
        .map(|cells| format!("<a:tr h=\"370840\">{}</a:tr>", cells.concat()))
        .collect();
    format!(
        concat!(
            "<p:graphicFrame><p:nvGraphicFramePr><p:cNvPr id=\"5\" name=\"Table\"/>",
            "<p:cNvGraphicFramePr/><p:nvPr/></p:nvGraphicFramePr><p:xfrm/>",
            "<a:graphic><a:graphicData uri=\"http://schemas.openxmlformats.org/drawingml/2006/table\">",
            "<a:tbl><a:tblPr/><a:tblGrid/>{}</a:tbl></a:graphicData></a:graphic></p:graphicFrame>"
        ),
        body
    )
}

pub fn slide_xml(shapes: &[String]) -> String {
    format!(
        concat!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>",
            "<p:sld xmlns:a=\"http://schemas.openxmlformats.org/drawingml/2006/main\" ",
            "xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\" ",
            "xmlns:p=\"http://schemas.openxmlformats.org/presentationml/2006/main\">",
            "<p:cSld><p:spTree><p:nvGrpSpPr><p:cNvPr id=\"1\" name=\"\"/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr>",
            "<p:grpSpPr/>{}</p:spTree></p:cSld></p:sld>"
        ),
        shapes.concat()
    )
}

pub fn slide_with_chart(rid: &str) -> String {
    slide_xml(&[format!(
        concat!(
            "<p:graphicFrame><p:nvGraphicFramePr><p:cNvPr id=\"7\" name=\"Chart\"/>",
            "<p:cNvGraphicFramePr/><p:nvPr/></p:nvGraphicFramePr><p:xfrm/>",
            "<a:graphic><a:graphicData uri=\"http://schemas.openxmlformats.org/drawingml/2006/chart\">",
            "<c:chart xmlns:c=\"http://schemas.openxmlformats.org/drawingml/2006/chart\" r:id=\"{}\"/>",
            "</a:graphicData></a:graphic></p:graphicFrame>"
        ),
        rid
    )])
}

pub fn rels_xml(rels: &[(&str, &str, &str, bool)]) -> String {
    let body: String = rels
        .iter()
        .map(|(id, rel_type, target, external)| {
            let mode = if *external {
                " TargetMode=\"External\""
            } else {
                ""
            };
            format!("<Relationship Id=\"{id}\" Type=\"{rel_type}\" Target=\"{target}\"{mode}/>")
        })
        .collect();
    format!(
        concat!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>",
            "<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">{}</Relationships>"
        ),
        body
    )
}

fn rich_title(text: &str) -> String {
    format!(
        "<c:title><c:tx><c:rich><a:bodyPr/><a:p><a:r><a:t>{}</a:t></a:r></a:p></c:rich></c:tx><c:overlay val=\"0\"/></c:title>",
        esc(text)
    )
}

pub fn chart_xml(title: &str, series_names: &[&str], categories: &[&str]) -> String {
    let cats: String = categories
        .iter()
        .enumerate()
        .map(|(j, c)| format!("<c:pt idx=\"{j}\"><c:v>{}</c:v></c:pt>", esc(c)))
        .collect();
    let series: String = series_names
        .iter()
        .enumerate()
        .map(|(i, s)| {
            format!(
                concat!(
                    "<c:ser><c:idx val=\"{i}\"/><c:order val=\"{i}\"/>",
                    "<c:tx><c:strRef><c:f>Sheet1!$B$1</c:f><c:strCache><c:ptCount val=\"1\"/>",
                    "<c:pt idx=\"0\"><c:v>{name}</c:v></c:pt></c:strCache></c:strRef></c:tx>",
                    "<c:cat><c:strRef><c:f>Sheet1!$A$2</c:f><c:strCache><c:ptCount val=\"{n}\"/>{cats}</c:strCache></c:strRef></c:cat>",
                    "<c:val><c:numRef><c:f>Sheet1!$B$2</c:f><c:numCache><c:formatCode>General</c:formatCode>",
                    "<c:pt idx=\"0\"><c:v>1.0</c:v></c:pt></c:numCache></c:numRef></c:val></c:ser>"
                ),
                i = i,
                name = esc(s),
                n = categories.len(),
                cats = cats
            )
        })
        .collect();
    format!(
        concat!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>",
            "<c:chartSpace xmlns:c=\"http://schemas.openxmlformats.org/drawingml/2006/chart\" ",
            "xmlns:a=\"http://schemas.openxmlformats.org/drawingml/2006/main\" ",
            "xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\">",
            "<c:chart>{title}<c:plotArea><c:layout/><c:barChart><c:barDir val=\"col\"/>{series}</c:barChart>",
            "<c:catAx>{axis}</c:catAx></c:plotArea></c:chart></c:chartSpace>"
        ),
        title = rich_title(title),
        series = series,
        axis = rich_title("Year")
    )
}

const CONTENT_TYPES: &str = concat!(
    "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>",
    "<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">",
    "<Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/>",
    "<Default Extension=\"xml\" ContentType=\"application/xml\"/></Types>"
);

const ROOT_RELS: &str = concat!(
    "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>",
    "<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">",
    "<Relationship Id=\"rId1\" ",
    "Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument\" ",
    "Target=\"ppt/presentation.xml\"/></Relationships>"
);

const PRESENTATION: &str = concat!(
    "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>",
    "<p:presentation xmlns:p=\"http://schemas.openxmlformats.org/presentationml/2006/main\"/>"
);

pub fn deck_bytes_with_rels(
    slides: &[(&str, Option<&str>)],
    extra_parts: &[(&str, &str)],
) -> Vec<u8> {
    let mut zout = ZipWriter::new(Cursor::new(Vec::new()));
    let opts = SimpleFileOptions::default();

    let mut put = |zout: &mut ZipWriter<Cursor<Vec<u8>>>, name: &str, data: &str| {
        zout.start_file(name, opts).expect("start zip file");
        zout.write_all(data.as_bytes()).expect("write zip file");
    };

    put(&mut zout, "[Content_Types].xml", CONTENT_TYPES);
    put(&mut zout, "_rels/.rels", ROOT_RELS);
    put(&mut zout, "ppt/presentation.xml", PRESENTATION);
    for (i, (slide, rels)) in slides.iter().enumerate() {
        put(&mut zout, &format!("ppt/slides/slide{}.xml", i + 1), slide);
        if let Some(rels) = rels {
            put(
                &mut zout,
                &format!("ppt/slides/_rels/slide{}.xml.rels", i + 1),
                rels,
            );
        }
    }
    for (name, data) in extra_parts {
        put(&mut zout, name, data);
    }
    zout.finish().expect("finish zip").into_inner()
}

pub fn deck_bytes(slides: &[&str]) -> Vec<u8> {
    let with_rels: Vec<(&str, Option<&str>)> = slides.iter().map(|s| (*s, None)).collect();
    deck_bytes_with_rels(&with_rels, &[])
}
