//! Small DocBook node builders.

use crate::xml::{Element, XmlNode};

pub const OPTIONAL_LIST_PREFIX: &str = "Optional: ";

/// `<xref linkend="..."/>`
pub fn xref(linkend: &str) -> Element {
    Element::new("xref").with_attribute("linkend", linkend)
}

/// `<ulink url="...">text</ulink>`
pub fn ulink(url: &str, text: &str) -> Element {
    Element::new("ulink").with_attribute("url", url).with_text(text)
}

pub fn emphasis(text: &str) -> Element {
    Element::new("emphasis").with_text(text)
}

/// Inline nodes for a link, optionally preceded by the "Optional: " marker.
pub fn prefixed_link(link: Element, optional: bool) -> Vec<XmlNode> {
    let mut nodes = Vec::with_capacity(2);
    if optional {
        nodes.push(emphasis(OPTIONAL_LIST_PREFIX).into());
    }
    nodes.push(link.into());
    nodes
}

/// `<listitem><para>...</para></listitem>`
pub fn list_item(content: Vec<XmlNode>) -> Element {
    let mut para = Element::new("para");
    para.children = content;
    Element::new("listitem").with_child(para)
}

pub fn ordered_list(items: Vec<Element>) -> Element {
    wrap_list_items("orderedlist", items)
}

pub fn itemized_list(items: Vec<Element>) -> Element {
    wrap_list_items("itemizedlist", items)
}

fn wrap_list_items(name: &str, items: Vec<Element>) -> Element {
    let mut list = Element::new(name);
    list.children = items.into_iter().map(XmlNode::Element).collect();
    list
}

pub fn title(text: &str) -> Element {
    Element::new("title").with_text(text)
}

/// `<para>text</para>` with `text` escaped.
pub fn wrap_in_para(text: &str) -> String {
    Element::new("para").with_text(text).to_xml()
}
