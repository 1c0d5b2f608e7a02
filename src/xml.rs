//! Owned, mutable XML tree for topic documents.
//!
//! Topic bodies are DocBook fragments that routinely reference entities declared
//! only in the book's `.ent` file (`&PRODUCT;` and friends). Text and attribute
//! values are therefore kept in their escaped source form: nothing is expanded
//! on parse, and serialisation writes them back untouched. Values created by the
//! builder go through [`Element::with_attribute`] / [`XmlNode::text`], which
//! escape on the way in.

use std::fmt;

use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::XmlError;

/// A node inside an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(Element),
    /// Escaped character data, entity references included verbatim.
    Text(String),
    CData(String),
    Comment(String),
    ProcessingInstruction(String),
}

impl XmlNode {
    /// Text node from unescaped content.
    pub fn text(content: &str) -> Self {
        XmlNode::Text(escape(content).into_owned())
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            XmlNode::Element(e) => Some(e),
            _ => None,
        }
    }

    fn write_to(&self, out: &mut String) {
        match self {
            XmlNode::Element(e) => e.write_to(out),
            XmlNode::Text(t) => out.push_str(t),
            XmlNode::CData(c) => {
                out.push_str("<![CDATA[");
                out.push_str(c);
                out.push_str("]]>");
            }
            XmlNode::Comment(c) => {
                out.push_str("<!--");
                out.push_str(c);
                out.push_str("-->");
            }
            XmlNode::ProcessingInstruction(p) => {
                out.push_str("<?");
                out.push_str(p);
                out.push_str("?>");
            }
        }
    }
}

impl From<Element> for XmlNode {
    fn from(element: Element) -> Self {
        XmlNode::Element(element)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    /// Attribute name and escaped value, in source order
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Adds an attribute, escaping `value`.
    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.set_attribute(name, &escape(value));
        self
    }

    pub fn with_child(mut self, child: impl Into<XmlNode>) -> Self {
        self.children.push(child.into());
        self
    }

    /// Adds a text child, escaping `text`.
    pub fn with_text(mut self, text: &str) -> Self {
        self.children.push(XmlNode::text(text));
        self
    }

    /// Raw (escaped) attribute value.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Sets an attribute to an already escaped value.
    pub fn set_attribute(&mut self, name: &str, raw_value: &str) {
        match self.attributes.iter_mut().find(|(key, _)| key == name) {
            Some((_, value)) => *value = raw_value.to_string(),
            None => self
                .attributes
                .push((name.to_string(), raw_value.to_string())),
        }
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(XmlNode::as_element)
    }

    /// Pre-order walk over this element and all descendant elements.
    pub fn visit_elements<F: FnMut(&Element)>(&self, f: &mut F) {
        f(self);
        for child in self.child_elements() {
            child.visit_elements(f);
        }
    }

    /// Pre-order mutable walk over this element and all descendant elements.
    pub fn visit_elements_mut<F: FnMut(&mut Element)>(&mut self, f: &mut F) {
        f(self);
        for child in &mut self.children {
            if let XmlNode::Element(e) = child {
                e.visit_elements_mut(f);
            }
        }
    }

    /// Comment bodies in document order.
    pub fn comments(&self) -> Vec<&str> {
        let mut found = Vec::new();
        self.collect_comments(&mut found);
        found
    }

    fn collect_comments<'a>(&'a self, found: &mut Vec<&'a str>) {
        for child in &self.children {
            match child {
                XmlNode::Comment(c) => found.push(c),
                XmlNode::Element(e) => e.collect_comments(found),
                _ => {}
            }
        }
    }

    /// Replaces comments in document order. `f` receives the comment's
    /// ordinal (matching [`Element::comments`]) and its body; returning
    /// `Some(nodes)` splices `nodes` in place of the comment.
    pub fn replace_comments<F>(&mut self, f: &mut F)
    where
        F: FnMut(usize, &str) -> Option<Vec<XmlNode>>,
    {
        let mut counter = 0;
        self.replace_comments_from(&mut counter, f);
    }

    fn replace_comments_from<F>(&mut self, counter: &mut usize, f: &mut F)
    where
        F: FnMut(usize, &str) -> Option<Vec<XmlNode>>,
    {
        let children = std::mem::take(&mut self.children);
        let mut replaced = Vec::with_capacity(children.len());
        for child in children {
            match child {
                XmlNode::Comment(body) => {
                    let index = *counter;
                    *counter += 1;
                    match f(index, &body) {
                        Some(nodes) => replaced.extend(nodes),
                        None => replaced.push(XmlNode::Comment(body)),
                    }
                }
                XmlNode::Element(mut e) => {
                    e.replace_comments_from(counter, f);
                    replaced.push(XmlNode::Element(e));
                }
                other => replaced.push(other),
            }
        }
        self.children = replaced;
    }

    /// Recursively drops descendant elements for which `keep` returns false.
    pub fn retain_elements<F: Fn(&Element) -> bool>(&mut self, keep: &F) {
        self.children.retain(|child| match child {
            XmlNode::Element(e) => keep(e),
            _ => true,
        });
        for child in &mut self.children {
            if let XmlNode::Element(e) = child {
                e.retain_elements(keep);
            }
        }
    }

    /// Removes the first direct child element called `name`.
    pub fn remove_first_child(&mut self, name: &str) -> Option<Element> {
        let index = self
            .children
            .iter()
            .position(|c| matches!(c, XmlNode::Element(e) if e.name == name))?;
        match self.children.remove(index) {
            XmlNode::Element(e) => Some(e),
            _ => None,
        }
    }

    /// Serialised children.
    pub fn inner_xml(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            child.write_to(&mut out);
        }
        out
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_to(&mut out);
        out
    }

    fn write_to(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attributes {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(value);
            out.push('"');
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for child in &self.children {
            child.write_to(out);
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

/// A parsed topic document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    pub has_declaration: bool,
    /// Body of the `<!DOCTYPE ...>` declaration, if any
    pub doctype: Option<String>,
    pub root: Element,
}

impl XmlDocument {
    pub fn new(root: Element) -> Self {
        Self {
            has_declaration: false,
            doctype: None,
            root,
        }
    }

    /// Parses a complete document. Unclosed or mismatched elements, multiple
    /// roots and stray text outside the root are all rejected.
    pub fn parse(xml: &str) -> Result<Self, XmlError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().check_end_names = true;

        let mut has_declaration = false;
        let mut doctype = None;
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    let mut element = Element::new(String::from_utf8_lossy(e.name().as_ref()));
                    for attr in e.attributes() {
                        let attr = attr?;
                        element.attributes.push((
                            String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
                            String::from_utf8_lossy(&attr.value).into_owned(),
                        ));
                    }
                    stack.push(element);
                }
                Event::Empty(e) => {
                    let mut element = Element::new(String::from_utf8_lossy(e.name().as_ref()));
                    for attr in e.attributes() {
                        let attr = attr?;
                        element.attributes.push((
                            String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
                            String::from_utf8_lossy(&attr.value).into_owned(),
                        ));
                    }
                    attach(&mut stack, &mut root, XmlNode::Element(element))?;
                }
                Event::End(_) => {
                    let element = stack.pop().ok_or_else(|| {
                        XmlError::Malformed(format!(
                            "unexpected end tag at position {}",
                            reader.buffer_position()
                        ))
                    })?;
                    attach(&mut stack, &mut root, XmlNode::Element(element))?;
                }
                Event::Text(e) => {
                    let text = String::from_utf8_lossy(&e).into_owned();
                    attach(&mut stack, &mut root, XmlNode::Text(text))?;
                }
                Event::GeneralRef(e) => {
                    let text = format!("&{};", String::from_utf8_lossy(&e));
                    attach(&mut stack, &mut root, XmlNode::Text(text))?;
                }
                Event::CData(e) => {
                    let text = String::from_utf8_lossy(&e).into_owned();
                    attach(&mut stack, &mut root, XmlNode::CData(text))?;
                }
                Event::Comment(e) => {
                    let text = String::from_utf8_lossy(&e).into_owned();
                    attach(&mut stack, &mut root, XmlNode::Comment(text))?;
                }
                Event::PI(e) => {
                    let text = String::from_utf8_lossy(&e).into_owned();
                    attach(&mut stack, &mut root, XmlNode::ProcessingInstruction(text))?;
                }
                Event::Decl(_) => has_declaration = true,
                Event::DocType(e) => {
                    doctype = Some(String::from_utf8_lossy(&e).trim().to_string());
                }
                Event::Eof => break,
            }
        }

        if let Some(open) = stack.last() {
            return Err(XmlError::Malformed(format!(
                "element <{}> is never closed",
                open.name
            )));
        }

        let root = root.ok_or(XmlError::Empty)?;
        Ok(Self {
            has_declaration,
            doctype,
            root,
        })
    }

    /// Every value of attribute `name` in document order.
    pub fn attribute_values(&self, name: &str) -> Vec<String> {
        let mut values = Vec::new();
        self.root.visit_elements(&mut |e: &Element| {
            if let Some(value) = e.attribute(name) {
                values.push(value.to_string());
            }
        });
        values
    }
}

impl fmt::Display for XmlDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_declaration {
            writeln!(f, "<?xml version=\"1.0\" encoding=\"UTF-8\"?>")?;
        }
        if let Some(doctype) = &self.doctype {
            writeln!(f, "<!DOCTYPE {}>", doctype)?;
        }
        write!(f, "{}", self.root.to_xml())
    }
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    node: XmlNode,
) -> Result<(), XmlError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
        return Ok(());
    }

    match node {
        XmlNode::Element(e) => {
            if root.is_some() {
                return Err(XmlError::Malformed(format!(
                    "second root element <{}>",
                    e.name
                )));
            }
            *root = Some(e);
        }
        XmlNode::Text(t) if !t.trim().is_empty() => {
            return Err(XmlError::Malformed(
                "text outside of the root element".to_string(),
            ));
        }
        XmlNode::CData(_) => {
            return Err(XmlError::Malformed(
                "CDATA outside of the root element".to_string(),
            ));
        }
        // prolog/epilog whitespace, comments and PIs
        _ => {}
    }
    Ok(())
}

/// Wraps `text` in a CDATA section, splitting any embedded terminator.
pub fn wrap_in_cdata(text: &str) -> String {
    format!("<![CDATA[{}]]>", text.replace("]]>", "]]]]><![CDATA[>"))
}

/// Drops characters that are not allowed in XML 1.0 documents.
pub fn clean_text_for_xml(text: &str) -> String {
    text.chars()
        .filter(|c| {
            matches!(*c, '\t' | '\n' | '\r')
                || ('\u{20}'..='\u{D7FF}').contains(c)
                || ('\u{E000}'..='\u{FFFD}').contains(c)
                || ('\u{10000}'..='\u{10FFFF}').contains(c)
        })
        .collect()
}
