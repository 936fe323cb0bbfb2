//! A small document model on top of quick-xml.
//!
//! Repodata regeneration and incremental updates must produce
//! byte-identical serializations for unchanged content, so this model
//! keeps attributes in insertion order (a `Vec`, not a map) and owns its
//! serializer: tab indentation, elements with pure text content on one
//! line, text trimmed on parse. Feeding a serialized document back
//! through [`parse`] yields an equal tree.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::errors::MdError;

#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

/// Parse the root element of a document. The XML declaration, comments,
/// processing instructions and doctype are dropped; whitespace-only text
/// is discarded and remaining text is trimmed.
pub fn parse(input: &[u8]) -> Result<Element, MdError> {
    let mut reader = Reader::from_reader(input);
    reader.trim_text(true);
    let mut stack: Vec<Element> = Vec::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(start) => {
                stack.push(element_from_start(&start)?);
            }
            Event::Empty(start) => {
                let element = element_from_start(&start)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(XmlNode::Element(element)),
                    None => return Ok(element),
                }
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| MdError::Xml("unbalanced end tag".to_string()))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(XmlNode::Element(element)),
                    None => return Ok(element),
                }
            }
            Event::Text(text) => {
                let text = text.unescape()?.into_owned();
                if let Some(parent) = stack.last_mut() {
                    if !text.is_empty() {
                        parent.children.push(XmlNode::Text(text));
                    }
                }
            }
            Event::CData(cdata) => {
                let text = String::from_utf8_lossy(&cdata.into_inner()).into_owned();
                let text = text.trim().to_string();
                if let Some(parent) = stack.last_mut() {
                    if !text.is_empty() {
                        parent.children.push(XmlNode::Text(text));
                    }
                }
            }
            Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_) => {}
            Event::Eof => {
                return Err(MdError::Xml("no root element found".to_string()));
            }
        }
        buf.clear();
    }
}

fn element_from_start(start: &BytesStart<'_>) -> Result<Element, MdError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(quick_xml::Error::InvalidAttr)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        attributes.push((key, value));
    }
    Ok(Element {
        name,
        attributes,
        children: Vec::new(),
    })
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Element {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_text(name: impl Into<String>, text: &str) -> Self {
        let mut element = Element::new(name);
        element.push_text(text);
        element
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Set an attribute, replacing an existing value in place so the
    /// attribute order stays stable.
    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| k == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name.to_string(), value)),
        }
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    pub fn push_element(&mut self, element: Element) {
        self.children.push(XmlNode::Element(element));
    }

    pub fn insert_element(&mut self, index: usize, element: Element) {
        let index = index.min(self.children.len());
        self.children.insert(index, XmlNode::Element(element));
    }

    /// Append text, trimmed the same way the parser trims it. Empty
    /// text is dropped so serialize/parse stays a fixed point.
    pub fn push_text(&mut self, text: &str) {
        let text = text.trim();
        if !text.is_empty() {
            self.children.push(XmlNode::Text(text.to_string()));
        }
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.elements().filter(move |e| e.name == name)
    }

    pub fn child<'a>(&'a self, name: &'a str) -> Option<&'a Element> {
        self.children_named(name).next()
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.children.iter_mut().find_map(|node| match node {
            XmlNode::Element(e) if e.name == name => Some(e),
            _ => None,
        })
    }

    /// Index (within `children`) of the first child element named `name`.
    pub fn element_position(&self, name: &str) -> Option<usize> {
        self.children.iter().position(
            |node| matches!(node, XmlNode::Element(e) if e.name == name),
        )
    }

    /// Drop every direct child element named `name`; returns how many went.
    pub fn remove_children(&mut self, name: &str) -> usize {
        let before = self.children.len();
        self.children
            .retain(|node| !matches!(node, XmlNode::Element(e) if e.name == name));
        before - self.children.len()
    }

    /// Remove and return the direct child elements matching `pred`.
    pub fn remove_elements_where(
        &mut self,
        mut pred: impl FnMut(&Element) -> bool,
    ) -> Vec<Element> {
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.children.len());
        for node in self.children.drain(..) {
            match node {
                XmlNode::Element(element) if pred(&element) => removed.push(element),
                other => kept.push(other),
            }
        }
        self.children = kept;
        removed
    }

    /// Concatenated text of this element and its descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for node in &self.children {
            match node {
                XmlNode::Text(t) => out.push_str(t),
                XmlNode::Element(e) => e.collect_text(out),
            }
        }
    }

    /// Serialize as a standalone document with an XML declaration.
    pub fn to_document(&self) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        self.write_into(&mut out, 0);
        out
    }

    /// Serialize without a declaration, for embedding in an outer document.
    pub fn to_fragment(&self) -> String {
        let mut out = String::new();
        self.write_into(&mut out, 0);
        out
    }

    fn write_into(&self, out: &mut String, depth: usize) {
        indent(out, depth);
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attributes {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            escape_into(value, true, out);
            out.push('"');
        }
        if self.children.is_empty() {
            out.push_str("/>\n");
            return;
        }
        let only_text = self
            .children
            .iter()
            .all(|node| matches!(node, XmlNode::Text(_)));
        if only_text {
            out.push('>');
            for node in &self.children {
                if let XmlNode::Text(t) = node {
                    escape_into(t, false, out);
                }
            }
            out.push_str("</");
            out.push_str(&self.name);
            out.push_str(">\n");
        } else {
            out.push_str(">\n");
            for node in &self.children {
                match node {
                    XmlNode::Element(e) => e.write_into(out, depth + 1),
                    XmlNode::Text(t) => {
                        indent(out, depth + 1);
                        escape_into(t, false, out);
                        out.push('\n');
                    }
                }
            }
            indent(out, depth);
            out.push_str("</");
            out.push_str(&self.name);
            out.push_str(">\n");
        }
    }
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push('\t');
    }
}

fn escape_into(value: &str, attribute: bool, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
}
