// ── Profile document tree ──
//
// A minimal owned XML element tree. Profile documents are small, so the
// whole document is parsed eagerly and walked by local name. Namespace
// prefixes are dropped from element names on parse; `xmlns` attributes are
// kept verbatim so nested EAP blocks render back with their namespaces.

use std::io::Cursor;

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error("malformed XML: {0}")]
    Xml(String),

    #[error("document has no root element")]
    Empty,

    #[error("unexpected closing tag </{0}>")]
    Unbalanced(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            ..Self::default()
        }
    }

    /// `true`/`false` text element.
    pub fn flag(name: impl Into<String>, value: bool) -> Self {
        Self::text(name, if value { "true" } else { "false" })
    }

    pub fn attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn with(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn push(&mut self, child: Element) {
        self.children.push(child);
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// First direct child with the given name (case-insensitive).
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Every direct child with the given name (case-insensitive).
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children
            .iter()
            .filter(move |c| c.name.eq_ignore_ascii_case(name))
    }

    /// Trimmed text of the first matching child, if present and non-empty.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name)
            .map(|c| c.text.trim())
            .filter(|t| !t.is_empty())
    }

    /// Depth-first search for the first descendant with the given name.
    pub fn find(&self, name: &str) -> Option<&Element> {
        self.children.iter().find_map(|c| {
            if c.name.eq_ignore_ascii_case(name) {
                Some(c)
            } else {
                c.find(name)
            }
        })
    }

    /// Every descendant with the given name, depth-first.
    pub fn find_all<'a>(&'a self, name: &str, out: &mut Vec<&'a Element>) {
        for c in &self.children {
            if c.name.eq_ignore_ascii_case(name) {
                out.push(c);
            }
            c.find_all(name, out);
        }
    }
}

// ── Parsing ──────────────────────────────────────────────────────────

pub fn parse(xml: &str) -> Result<Element, DocumentError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => stack.push(start_element(e)?),
            Ok(Event::Empty(ref e)) => {
                let element = start_element(e)?;
                attach(&mut stack, &mut root, element);
            }
            Ok(Event::Text(ref t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| DocumentError::Xml(e.to_string()))?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text);
                }
            }
            Ok(Event::CData(ref c)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(c));
                }
            }
            Ok(Event::End(ref e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                let element = stack.pop().ok_or(DocumentError::Unbalanced(name))?;
                attach(&mut stack, &mut root, element);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(DocumentError::Xml(e.to_string())),
        }
    }

    if let Some(open) = stack.pop() {
        return Err(DocumentError::Xml(format!("unclosed element <{}>", open.name)));
    }
    root.ok_or(DocumentError::Empty)
}

fn start_element(e: &BytesStart<'_>) -> Result<Element, DocumentError> {
    let mut element = Element::new(String::from_utf8_lossy(e.local_name().as_ref()));
    for attr in e.attributes() {
        let attr = attr.map_err(|e| DocumentError::Xml(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| DocumentError::Xml(e.to_string()))?
            .into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

// ── Rendering ────────────────────────────────────────────────────────

/// Compact rendering, no declaration, no whitespace between elements.
pub fn render(root: &Element) -> Result<String, DocumentError> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    write_element(&mut writer, root)?;
    finish(writer)
}

/// Indented rendering for humans.
pub fn render_pretty(root: &Element) -> Result<String, DocumentError> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    write_element(&mut writer, root)?;
    finish(writer)
}

fn finish(writer: Writer<Cursor<Vec<u8>>>) -> Result<String, DocumentError> {
    String::from_utf8(writer.into_inner().into_inner())
        .map_err(|e| DocumentError::Xml(e.to_string()))
}

fn xml_err(e: impl std::fmt::Display) -> DocumentError {
    DocumentError::Xml(e.to_string())
}

fn write_element(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    element: &Element,
) -> Result<(), DocumentError> {
    let mut start = BytesStart::new(element.name.as_str());
    for (k, v) in &element.attributes {
        start.push_attribute((k.as_str(), v.as_str()));
    }

    if element.children.is_empty() && element.text.is_empty() {
        return writer.write_event(Event::Empty(start)).map_err(xml_err);
    }

    writer.write_event(Event::Start(start)).map_err(xml_err)?;
    if !element.text.is_empty() {
        writer
            .write_event(Event::Text(BytesText::new(&element.text)))
            .map_err(xml_err)?;
    }
    for child in &element.children {
        write_element(writer, child)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(element.name.as_str())))
        .map_err(xml_err)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parse_strips_prefixes_and_keeps_text() {
        let root = parse(
            r#"<a:Root xmlns:a="urn:x"><a:Name>  Corp  </a:Name><Empty/><Flag>true</Flag></a:Root>"#,
        )
        .unwrap();
        assert_eq!(root.name, "Root");
        assert_eq!(root.attribute("xmlns:a"), Some("urn:x"));
        assert_eq!(root.child_text("name"), Some("Corp"));
        assert!(root.child("Empty").is_some());
        assert_eq!(root.child_text("Empty"), None);
    }

    #[test]
    fn render_then_parse_is_stable() {
        let doc = Element::new("VPNProfile")
            .with(Element::flag("AlwaysOn", true))
            .with(Element::new("Route").with(Element::text("Address", "10.0.0.0")));
        let xml = render(&doc).unwrap();
        assert_eq!(
            xml,
            "<VPNProfile><AlwaysOn>true</AlwaysOn><Route><Address>10.0.0.0</Address></Route></VPNProfile>"
        );
        assert_eq!(parse(&xml).unwrap(), doc);
    }

    #[test]
    fn escapes_text() {
        let doc = Element::text("Name", "R&D <lab>");
        let xml = render(&doc).unwrap();
        assert_eq!(parse(&xml).unwrap().text, "R&D <lab>");
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse("").is_err());
        assert!(parse("<a><b></a>").is_err());
    }
}
