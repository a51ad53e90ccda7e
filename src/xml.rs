//! XML tidying
//!
//! Members ending in `.xml` are re-serialized in one canonical layout before
//! they are dumped, so that two documents differing only in indentation,
//! attribute order, quoting or escaping produce identical lines.
//!
//! The canonical layout:
//! - whitespace-only text spanning a line break is layout and is dropped;
//!   whitespace on a single line (`<b>a</b> <i>b</i>`) separates inline
//!   content and is kept
//! - an element holding only child elements (and layout) puts each child
//!   on its own line, indented two spaces per level
//! - an element holding any other text or CDATA is mixed content: it and
//!   everything below it are written verbatim, whitespace included
//! - an element with nothing left to write is self-closing
//! - attributes are sorted by qualified name, double-quoted, re-escaped
//! - character and entity references in text are re-escaped
//! - comments and processing instructions are kept verbatim

use std::io::Read;

use quick_xml::escape::{escape, partial_escape};
use quick_xml::events::{BytesCData, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::archive::RewindableStream;
use crate::error::{DumpError, Result};

/// Name suffix identifying XML members.
pub const XML_SUFFIX: &str = ".xml";

/// Members this small are never tidied; they are unlikely to be documents.
pub const XML_MIN_SIZE: u64 = 2;

const DEFAULT_INDENT: usize = 2;

/// Whether a member with this name and declared size should be tidied.
pub fn is_xml(name: &str, size: u64) -> bool {
    name.ends_with(XML_SUFFIX) && size > XML_MIN_SIZE
}

/// Turns an XML member into its canonical byte form.
pub trait XmlNormalizer {
    /// Rewind `stream` and re-serialize the document it holds.
    ///
    /// Fails with [`DumpError::XmlParse`] when the content is not well-formed.
    fn normalize(&self, stream: &mut dyn RewindableStream) -> Result<Vec<u8>>;
}

/// Pretty-printer backed by `quick-xml`.
#[derive(Debug, Clone)]
pub struct PrettyXml {
    indent: usize,
}

impl PrettyXml {
    pub fn new() -> Self {
        Self { indent: DEFAULT_INDENT }
    }

    /// Set the number of spaces per nesting level
    pub fn with_indent(mut self, indent: usize) -> Self {
        self.indent = indent;
        self
    }

    /// Tidy an in-memory document.
    pub fn tidy(&self, xml: &[u8]) -> Result<Vec<u8>> {
        let text = std::str::from_utf8(xml)
            .map_err(|e| DumpError::XmlParse(format!("document is not valid UTF-8: {}", e)))?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        let nodes = parse(text)?;

        let mut printer = Printer {
            writer: Writer::new(Vec::with_capacity(xml.len())),
            indent: self.indent,
        };
        for (i, node) in nodes.iter().enumerate() {
            if i > 0 {
                printer.newline(0);
            }
            printer.write_node(node, 0, true)?;
        }

        let mut out = printer.writer.into_inner();
        out.push(b'\n');
        Ok(out)
    }
}

impl Default for PrettyXml {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlNormalizer for PrettyXml {
    fn normalize(&self, stream: &mut dyn RewindableStream) -> Result<Vec<u8>> {
        let mut xml = Vec::new();
        stream.rewind()?.read_to_end(&mut xml)?;
        self.tidy(&xml)
    }
}

/// Tidy `xml` with the default layout.
pub fn tidy_xml(xml: &[u8]) -> Result<Vec<u8>> {
    PrettyXml::new().tidy(xml)
}

enum Node {
    Element(Element),
    /// Escaped text, and whether it is layout whitespace
    Text { escaped: String, layout: bool },
    CData(BytesCData<'static>),
    /// Declarations, comments, processing instructions, doctype
    Markup(Event<'static>),
}

impl Node {
    fn is_layout(&self) -> bool {
        matches!(self, Node::Text { layout: true, .. })
    }
}

struct Element {
    name: String,
    start: BytesStart<'static>,
    children: Vec<Node>,
}

impl Element {
    /// Text or CDATA among the children makes every child significant.
    fn is_mixed(&self) -> bool {
        self.children.iter().any(|child| match child {
            Node::Text { layout, .. } => !layout,
            Node::CData(_) => true,
            _ => false,
        })
    }
}

/// Parse a whole document into its top-level nodes.
fn parse(text: &str) -> Result<Vec<Node>> {
    let mut reader = Reader::from_str(text);
    let mut open: Vec<Element> = Vec::new();
    let mut top = Vec::new();
    let mut root_seen = false;

    loop {
        let event = reader.read_event().map_err(|e| {
            DumpError::XmlParse(format!("{} at position {}", e, reader.error_position()))
        })?;

        let node = match event {
            Event::Eof => break,
            Event::Start(e) => {
                if open.is_empty() {
                    check_single_root(&mut root_seen)?;
                }
                open.push(open_element(&e)?);
                continue;
            }
            Event::Empty(e) => {
                if open.is_empty() {
                    check_single_root(&mut root_seen)?;
                }
                Node::Element(open_element(&e)?)
            }
            Event::End(_) => {
                let element = open.pop().ok_or_else(|| {
                    DumpError::XmlParse(format!(
                        "unexpected closing tag at position {}",
                        reader.buffer_position()
                    ))
                })?;
                Node::Element(element)
            }
            Event::Text(e) => {
                let whitespace = e.iter().all(u8::is_ascii_whitespace);
                if open.is_empty() {
                    if whitespace {
                        continue;
                    }
                    return Err(DumpError::XmlParse(format!(
                        "text outside the root element at position {}",
                        reader.buffer_position()
                    )));
                }
                let layout = whitespace && e.contains(&b'\n');
                Node::Text { escaped: canonical_text(&e), layout }
            }
            Event::CData(e) => {
                if open.is_empty() {
                    return Err(DumpError::XmlParse(format!(
                        "CDATA outside the root element at position {}",
                        reader.buffer_position()
                    )));
                }
                Node::CData(e.into_owned())
            }
            other => Node::Markup(other.into_owned()),
        };

        match open.last_mut() {
            Some(parent) => parent.children.push(node),
            None => top.push(node),
        }
    }

    if !open.is_empty() {
        return Err(DumpError::XmlParse(format!(
            "{} element(s) left unclosed at end of document",
            open.len()
        )));
    }
    if !root_seen {
        return Err(DumpError::XmlParse("document has no root element".to_string()));
    }
    Ok(top)
}

fn check_single_root(root_seen: &mut bool) -> Result<()> {
    if *root_seen {
        return Err(DumpError::XmlParse("document has more than one root element".to_string()));
    }
    *root_seen = true;
    Ok(())
}

/// Rebuild a start tag with its attributes sorted, double-quoted and re-escaped.
fn open_element(start: &BytesStart<'_>) -> Result<Element> {
    let qname = start.name();
    let name = utf8(qname.as_ref())?;

    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| DumpError::XmlParse(format!("bad attribute in <{}>: {}", name, e)))?;
        let key = utf8(attr.key.as_ref())?.to_string();
        let value = match attr.unescape_value() {
            Ok(value) => escape(&*value).into_owned(),
            // Entities declared in a DTD: keep the reference as written.
            Err(_) => utf8(&attr.value)?.replace('"', "&quot;"),
        };
        attributes.push((key, value));
    }
    attributes.sort_by(|a, b| a.0.cmp(&b.0));

    let mut content = String::from(name);
    for (key, value) in &attributes {
        content.push(' ');
        content.push_str(key);
        content.push_str("=\"");
        content.push_str(value);
        content.push('"');
    }

    Ok(Element {
        name: name.to_string(),
        start: BytesStart::from_content(content, name.len()),
        children: Vec::new(),
    })
}

fn canonical_text(text: &BytesText<'_>) -> String {
    match text.unescape() {
        Ok(unescaped) => partial_escape(&*unescaped).into_owned(),
        Err(_) => String::from_utf8_lossy(text).into_owned(),
    }
}

fn utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|e| DumpError::XmlParse(format!("invalid UTF-8 in markup: {}", e)))
}

struct Printer {
    writer: Writer<Vec<u8>>,
    indent: usize,
}

impl Printer {
    fn newline(&mut self, level: usize) {
        let out = self.writer.get_mut();
        out.push(b'\n');
        out.resize(out.len() + level * self.indent, b' ');
    }

    fn write(&mut self, event: Event<'_>) -> Result<()> {
        self.writer
            .write_event(event)
            .map_err(|e| DumpError::XmlParse(format!("cannot serialize document: {}", e)))
    }

    /// Write `node`; `pretty` is false anywhere below mixed content.
    fn write_node(&mut self, node: &Node, level: usize, pretty: bool) -> Result<()> {
        match node {
            Node::Element(element) => self.write_element(element, level, pretty),
            Node::Text { escaped, .. } => self.write(Event::Text(BytesText::from_escaped(escaped.as_str()))),
            Node::CData(cdata) => self.write(Event::CData(cdata.clone())),
            Node::Markup(event) => self.write(event.clone()),
        }
    }

    fn write_element(&mut self, element: &Element, level: usize, pretty: bool) -> Result<()> {
        let verbatim = !pretty || element.is_mixed();
        let children: Vec<&Node> = element
            .children
            .iter()
            .filter(|child| verbatim || !child.is_layout())
            .collect();

        if children.is_empty() {
            return self.write(Event::Empty(element.start.borrow()));
        }

        self.write(Event::Start(element.start.borrow()))?;
        for child in children {
            if !verbatim {
                self.newline(level + 1);
            }
            self.write_node(child, level + 1, !verbatim)?;
        }
        if !verbatim {
            self.newline(level);
        }
        self.write(Event::End(BytesEnd::new(element.name.as_str())))
    }
}
