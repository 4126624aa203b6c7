use std::fmt::Write as _;

use anyhow::{bail, Context};
use quick_xml::events::{BytesDecl, BytesStart, Event};
use quick_xml::Reader;

/// One attribute. The value is kept as the raw, already-escaped bytes from
/// the source document: some parts encode CR/LF in attribute values as
/// character references (embedded-object data does this), and unescaping plus
/// re-escaping would normalize those newlines into spaces and corrupt the
/// part.
#[derive(Clone, Debug)]
pub struct Attr {
    pub name: String,
    pub value: String,
}

impl Attr {
    /// Build an attribute from a plain-text value. Escaping happens here, so
    /// the stored representation is always the raw form.
    pub fn new(name: &str, value: &str) -> Self {
        let mut raw = String::with_capacity(value.len());
        for ch in value.chars() {
            match ch {
                '&' => raw.push_str("&amp;"),
                '<' => raw.push_str("&lt;"),
                '>' => raw.push_str("&gt;"),
                '"' => raw.push_str("&quot;"),
                _ => raw.push(ch),
            }
        }
        Self {
            name: name.to_string(),
            value: raw,
        }
    }
}

pub fn find_attr<'a>(attrs: &'a [Attr], key: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|a| a.name == key)
        .map(|a| a.value.as_str())
}

/// Flat event stream of one XML part. Nothing is reordered or normalized, so
/// an untouched stream serializes back to equivalent markup and only spliced
/// regions differ.
#[derive(Clone, Debug)]
pub enum XmlEvent {
    Start { name: String, attrs: Vec<Attr> },
    Empty { name: String, attrs: Vec<Attr> },
    End { name: String },
    Text { text: String },
    CData { text: String },
    Comment { text: String },
    /// `<?...?>` content. The XML declaration is carried here too, rebuilt
    /// from its parsed fields at read time.
    PI { content: String },
    DocType { text: String },
}

#[derive(Clone)]
pub struct XmlPart {
    pub name: String,
    pub events: Vec<XmlEvent>,
}

pub fn parse_xml_part(name: &str, xml_bytes: &[u8]) -> anyhow::Result<XmlPart> {
    let mut reader = Reader::from_reader(xml_bytes);
    reader.config_mut().trim_text(false);

    let mut events: Vec<XmlEvent> = Vec::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let ev = reader
            .read_event_into(&mut buf)
            .with_context(|| format!("read xml event in {name}"))?;
        events.push(match ev {
            Event::Eof => break,
            Event::Start(s) => XmlEvent::Start {
                name: lossy(s.name().as_ref()),
                attrs: raw_attrs(&s)?,
            },
            Event::Empty(s) => XmlEvent::Empty {
                name: lossy(s.name().as_ref()),
                attrs: raw_attrs(&s)?,
            },
            Event::End(e) => XmlEvent::End {
                name: lossy(e.name().as_ref()),
            },
            Event::Text(t) => XmlEvent::Text {
                text: t.unescape().context("unescape text")?.into_owned(),
            },
            Event::CData(t) => XmlEvent::CData {
                text: lossy(&t.into_inner()),
            },
            Event::Comment(t) => XmlEvent::Comment {
                text: lossy(&t.into_inner()),
            },
            Event::Decl(d) => XmlEvent::PI {
                content: declaration_content(&d)?,
            },
            Event::PI(t) => XmlEvent::PI {
                content: format!("{}{}", lossy(t.target()), lossy(t.content())),
            },
            Event::DocType(t) => XmlEvent::DocType {
                text: lossy(&t.into_inner()),
            },
        });
    }

    Ok(XmlPart {
        name: name.to_string(),
        events,
    })
}

fn raw_attrs(start: &BytesStart<'_>) -> anyhow::Result<Vec<Attr>> {
    start
        .attributes()
        .map(|a| {
            let a = a.context("attribute")?;
            Ok(Attr {
                name: lossy(a.key.as_ref()),
                // Raw on purpose; see the `Attr` docs.
                value: lossy(&a.value),
            })
        })
        .collect()
}

fn declaration_content(decl: &BytesDecl<'_>) -> anyhow::Result<String> {
    let mut content = String::from("xml");
    let version = decl.version().context("decl version")?;
    let _ = write!(content, " version=\"{}\"", lossy(&version));
    if let Some(encoding) = decl.encoding().transpose().context("decl encoding")? {
        let _ = write!(content, " encoding=\"{}\"", lossy(&encoding));
    }
    if let Some(standalone) = decl.standalone().transpose().context("decl standalone")? {
        let _ = write!(content, " standalone=\"{}\"", lossy(&standalone));
    }
    Ok(content)
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Serialize a part. The stream is checked for well-nestedness first: the
/// splice-based paragraph rewrite edits raw event ranges, and a bad edit must
/// fail here rather than produce a part the presentation program rejects.
pub fn write_xml_part(part: &XmlPart) -> anyhow::Result<Vec<u8>> {
    verify_balanced(part)?;
    let mut out = String::with_capacity(part.events.len() * 16);
    for ev in &part.events {
        render_event(ev, &mut out);
    }
    Ok(out.into_bytes())
}

fn render_event(ev: &XmlEvent, out: &mut String) {
    match ev {
        XmlEvent::Start { name, attrs } => open_tag(out, name, attrs, false),
        XmlEvent::Empty { name, attrs } => open_tag(out, name, attrs, true),
        XmlEvent::End { name } => {
            out.push_str("</");
            out.push_str(name);
            out.push('>');
        }
        XmlEvent::Text { text } => push_escaped(out, text),
        XmlEvent::CData { text } => {
            out.push_str("<![CDATA[");
            out.push_str(text);
            out.push_str("]]>");
        }
        XmlEvent::Comment { text } => {
            out.push_str("<!--");
            out.push_str(text);
            out.push_str("-->");
        }
        XmlEvent::PI { content } => {
            out.push_str("<?");
            out.push_str(content);
            out.push_str("?>");
        }
        XmlEvent::DocType { text } => {
            out.push_str("<!DOCTYPE");
            out.push_str(text);
            out.push('>');
        }
    }
}

fn open_tag(out: &mut String, name: &str, attrs: &[Attr], self_closing: bool) {
    out.push('<');
    out.push_str(name);
    for attr in attrs {
        out.push(' ');
        out.push_str(&attr.name);
        out.push_str("=\"");
        // Attribute values are stored raw; writing them verbatim is what
        // keeps character references intact.
        out.push_str(&attr.value);
        out.push('"');
    }
    out.push_str(if self_closing { "/>" } else { ">" });
}

fn push_escaped(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            // A literal CR in text would be normalized away on the next parse.
            '\r' => out.push_str("&#xD;"),
            _ => out.push(ch),
        }
    }
}

/// Every `Start` must have its matching `End`, properly nested, and nothing
/// may close an element that was never opened.
pub fn verify_balanced(part: &XmlPart) -> anyhow::Result<()> {
    let mut stack: Vec<&str> = Vec::new();
    for ev in &part.events {
        match ev {
            XmlEvent::Start { name, .. } => stack.push(name),
            XmlEvent::End { name } => match stack.pop() {
                Some(open) if open == name => {}
                Some(open) => bail!(
                    "{}: mismatched </{}> where </{}> was expected",
                    part.name,
                    name,
                    open
                ),
                None => bail!("{}: </{}> closes nothing", part.name, name),
            },
            _ => {}
        }
    }
    if let Some(open) = stack.pop() {
        bail!("{}: <{}> is never closed", part.name, open);
    }
    Ok(())
}
