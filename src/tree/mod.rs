//! The intermediate document tree.
//!
//! Every dialect converts to and from this tree. It is an ordered tree of
//! [`Element`]s and text leaves; element and attribute names are namespaced
//! [`QName`]s. Structural vocabulary lives in the [`Namespace::Page`]
//! namespace, hyperlinks use [`Namespace::XLink`] attributes, and
//! [`Namespace::Html`] carries pass-through attributes such as `id`.
//!
//! # Example
//!
//! ```
//! use wikiconv::tree::{Element, Namespace};
//!
//! let heading = Element::page("h")
//!     .with_attr(Namespace::Page.name("outline-level"), 2)
//!     .with_text("Heading 2");
//! let page = Element::page("page")
//!     .with_child(Element::page("body").with_child(heading));
//! assert_eq!(page.itertext().collect::<String>(), "Heading 2");
//! ```

pub mod xml;

use std::borrow::Cow;
use std::fmt;

use crate::iri::Iri;

pub use xml::{TreeBuilder, XmlVisitor, read_tree, read_xml, write_tree};

/// Namespace URI of the structural vocabulary.
pub const PAGE_URI: &str = "http://moinmo.in/namespaces/page";
pub const XLINK_URI: &str = "http://www.w3.org/1999/xlink";
pub const HTML_URI: &str = "http://www.w3.org/1999/xhtml";
pub const XINCLUDE_URI: &str = "http://www.w3.org/2001/XInclude";
pub const DOCBOOK_URI: &str = "http://docbook.org/ns/docbook";
pub const XML_URI: &str = "http://www.w3.org/XML/1998/namespace";

/// A namespace; the fixed set plus preserved foreign ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Namespace {
    Page,
    XLink,
    Html,
    XInclude,
    DocBook,
    Other(String),
}

impl Namespace {
    pub fn from_uri(uri: &str) -> Self {
        match uri {
            PAGE_URI => Namespace::Page,
            XLINK_URI => Namespace::XLink,
            HTML_URI => Namespace::Html,
            XINCLUDE_URI => Namespace::XInclude,
            DOCBOOK_URI => Namespace::DocBook,
            other => Namespace::Other(other.to_string()),
        }
    }

    pub fn uri(&self) -> &str {
        match self {
            Namespace::Page => PAGE_URI,
            Namespace::XLink => XLINK_URI,
            Namespace::Html => HTML_URI,
            Namespace::XInclude => XINCLUDE_URI,
            Namespace::DocBook => DOCBOOK_URI,
            Namespace::Other(uri) => uri,
        }
    }

    /// Conventional prefix used when serializing.
    pub fn prefix(&self) -> Option<&'static str> {
        match self {
            Namespace::Page => Some("page"),
            Namespace::XLink => Some("xlink"),
            Namespace::Html => Some("html"),
            Namespace::XInclude => Some("xi"),
            Namespace::DocBook => Some("db"),
            Namespace::Other(uri) if uri == XML_URI => Some("xml"),
            Namespace::Other(_) => None,
        }
    }

    /// A qualified name in this namespace.
    pub fn name(&self, local: impl Into<Cow<'static, str>>) -> QName {
        QName {
            ns: self.clone(),
            local: local.into(),
        }
    }

    /// An empty element with a name in this namespace.
    pub fn element(&self, local: impl Into<Cow<'static, str>>) -> Element {
        Element::new(self.name(local))
    }
}

/// A qualified name: namespace plus local part.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    pub ns: Namespace,
    pub local: Cow<'static, str>,
}

impl QName {
    pub fn new(ns: Namespace, local: impl Into<Cow<'static, str>>) -> Self {
        Self {
            ns,
            local: local.into(),
        }
    }

    pub fn is(&self, ns: &Namespace, local: &str) -> bool {
        &self.ns == ns && self.local == local
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}{}", self.ns.uri(), self.local)
    }
}

/// `page:` qualified name.
pub fn page(local: impl Into<Cow<'static, str>>) -> QName {
    Namespace::Page.name(local)
}

/// `xlink:` qualified name.
pub fn xlink(local: impl Into<Cow<'static, str>>) -> QName {
    Namespace::XLink.name(local)
}

/// `html:` qualified name.
pub fn html(local: impl Into<Cow<'static, str>>) -> QName {
    Namespace::Html.name(local)
}

/// `xi:` qualified name.
pub fn xinclude(local: impl Into<Cow<'static, str>>) -> QName {
    Namespace::XInclude.name(local)
}

/// Attribute value. The attribute name decides which variant is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    Text(String),
    Int(i64),
    Iri(Iri),
}

impl AttrValue {
    /// Build a value of the type the named attribute carries.
    pub fn typed(name: &QName, raw: &str) -> Self {
        match (&name.ns, name.local.as_ref()) {
            (Namespace::XLink, "href") | (Namespace::XInclude, "href") => {
                AttrValue::Iri(Iri::parse(raw))
            }
            (Namespace::Page, "page-href") => AttrValue::Iri(Iri::parse(raw)),
            (
                Namespace::Page,
                "outline-level" | "number-columns-spanned" | "number-rows-spanned",
            ) => raw
                .trim()
                .parse()
                .map(AttrValue::Int)
                .unwrap_or_else(|_| AttrValue::Text(raw.to_string())),
            _ => AttrValue::Text(raw.to_string()),
        }
    }

    pub fn as_iri(&self) -> Option<&Iri> {
        match self {
            AttrValue::Iri(iri) => Some(iri),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(n) => Some(*n),
            AttrValue::Text(s) => s.trim().parse().ok(),
            AttrValue::Iri(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Text(s) => f.write_str(s),
            AttrValue::Int(n) => write!(f, "{n}"),
            AttrValue::Iri(iri) => write!(f, "{iri}"),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Text(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Text(s)
    }
}

impl From<i64> for AttrValue {
    fn from(n: i64) -> Self {
        AttrValue::Int(n)
    }
}

impl From<i32> for AttrValue {
    fn from(n: i32) -> Self {
        AttrValue::Int(n.into())
    }
}

impl From<usize> for AttrValue {
    fn from(n: usize) -> Self {
        AttrValue::Int(n as i64)
    }
}

impl From<Iri> for AttrValue {
    fn from(iri: Iri) -> Self {
        AttrValue::Iri(iri)
    }
}

/// A child of an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

impl Node {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Node::Text(t) => Some(t),
            Node::Element(_) => None,
        }
    }
}

impl From<Element> for Node {
    fn from(e: Element) -> Self {
        Node::Element(e)
    }
}

impl From<String> for Node {
    fn from(s: String) -> Self {
        Node::Text(s)
    }
}

impl From<&str> for Node {
    fn from(s: &str) -> Self {
        Node::Text(s.to_string())
    }
}

/// An element with ordered attributes and children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: QName,
    pub attrs: Vec<(QName, AttrValue)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: QName) -> Self {
        Self {
            name,
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Shorthand for an element in the page namespace.
    pub fn page(local: impl Into<Cow<'static, str>>) -> Self {
        Self::new(page(local))
    }

    pub fn with_attr(mut self, name: QName, value: impl Into<AttrValue>) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn with_child(mut self, child: impl Into<Node>) -> Self {
        self.push(child);
        self
    }

    pub fn with_children<I, N>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<Node>,
    {
        for child in children {
            self.push(child);
        }
        self
    }

    pub fn with_text(mut self, text: impl AsRef<str>) -> Self {
        self.push_text(text.as_ref());
        self
    }

    /// Append a child; adjacent text leaves are merged.
    pub fn push(&mut self, child: impl Into<Node>) {
        match child.into() {
            Node::Text(text) => self.push_text(&text),
            node => self.children.push(node),
        }
    }

    pub fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(Node::Text(last)) = self.children.last_mut() {
            last.push_str(text);
        } else {
            self.children.push(Node::Text(text.to_string()));
        }
    }

    pub fn is(&self, ns: &Namespace, local: &str) -> bool {
        self.name.is(ns, local)
    }

    /// Whether this is the page-namespace element `local`.
    pub fn is_page(&self, local: &str) -> bool {
        self.name.is(&Namespace::Page, local)
    }

    /// Local name if this element is in the page namespace.
    pub fn page_local(&self) -> Option<&str> {
        (self.name.ns == Namespace::Page).then_some(self.name.local.as_ref())
    }

    pub fn attr(&self, name: &QName) -> Option<&AttrValue> {
        self.attrs.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Look up an attribute by namespace and local name.
    pub fn get(&self, ns: &Namespace, local: &str) -> Option<&AttrValue> {
        self.attrs
            .iter()
            .find(|(k, _)| k.is(ns, local))
            .map(|(_, v)| v)
    }

    /// Page-namespace attribute rendered as a string.
    pub fn page_attr(&self, local: &str) -> Option<String> {
        self.get(&Namespace::Page, local).map(|v| v.to_string())
    }

    /// Page-namespace integer attribute.
    pub fn page_int(&self, local: &str) -> Option<i64> {
        self.get(&Namespace::Page, local).and_then(AttrValue::as_int)
    }

    /// The `xlink:href` attribute, if it holds an IRI.
    pub fn href(&self) -> Option<&Iri> {
        self.get(&Namespace::XLink, "href").and_then(AttrValue::as_iri)
    }

    /// Set or replace an attribute, keeping its position when replacing.
    pub fn set_attr(&mut self, name: QName, value: impl Into<AttrValue>) {
        let value = value.into();
        if let Some(slot) = self.attrs.iter_mut().find(|(k, _)| *k == name) {
            slot.1 = value;
        } else {
            self.attrs.push((name, value));
        }
    }

    pub fn remove_attr(&mut self, name: &QName) -> Option<AttrValue> {
        let idx = self.attrs.iter().position(|(k, _)| k == name)?;
        Some(self.attrs.remove(idx).1)
    }

    pub fn child_elements(&self) -> impl DoubleEndedIterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }

    /// First child element in the page namespace named `local`.
    pub fn find_page(&self, local: &str) -> Option<&Element> {
        self.child_elements().find(|e| e.is_page(local))
    }

    pub fn find_page_mut(&mut self, local: &str) -> Option<&mut Element> {
        self.children.iter_mut().find_map(|n| match n {
            Node::Element(e) if e.is_page(local) => Some(e),
            _ => None,
        })
    }

    /// Whether the element has no children at all.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Text leaves in document order, depth first.
    pub fn itertext(&self) -> TextIter<'_> {
        TextIter {
            stack: vec![self.children.iter()],
        }
    }

    /// Concatenated text of all descendants.
    pub fn text(&self) -> String {
        self.itertext().collect()
    }

    /// This element and all descendant elements in pre-order.
    pub fn descendants(&self) -> DfsIter<'_> {
        DfsIter { stack: vec![self] }
    }
}

/// Depth-first iterator over text leaves.
pub struct TextIter<'a> {
    stack: Vec<std::slice::Iter<'a, Node>>,
}

impl<'a> Iterator for TextIter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let top = self.stack.last_mut()?;
            match top.next() {
                Some(Node::Text(text)) => return Some(text),
                Some(Node::Element(e)) => self.stack.push(e.children.iter()),
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}

/// Pre-order iterator over elements.
pub struct DfsIter<'a> {
    stack: Vec<&'a Element>,
}

impl<'a> Iterator for DfsIter<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<Self::Item> {
        let elem = self.stack.pop()?;
        self.stack.extend(elem.child_elements().rev());
        Some(elem)
    }
}

/// Build a `page` element wrapping `body`, the shape every parser returns.
pub fn new_page(page_href: Option<&Iri>) -> Element {
    let mut root = Element::page("page");
    if let Some(href) = page_href {
        root.set_attr(page("page-href"), href.clone());
    }
    root
}

/// An inline or block error marker carrying a message.
pub fn error_element(message: impl AsRef<str>) -> Element {
    Element::page("error").with_text(message)
}
