//! XML serialization of the intermediate tree.
//!
//! The writer declares every namespace once on the root element: the root's
//! own namespace becomes the default namespace and the others get their
//! conventional prefixes. An attribute is written without prefix when it
//! shares the namespace of its element.
//!
//! Reading is event driven: [`read_xml`] resolves namespaces and hands
//! start, end and text events to an [`XmlVisitor`]. [`TreeBuilder`] is the
//! visitor that reassembles an [`Element`] tree; the DocBook importer
//! rebuilds the document with it and then maps the DocBook vocabulary.

use std::collections::HashMap;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::{AttrValue, Element, Namespace, Node, QName};
use crate::error::{Error, Result};
use crate::util::{escape_xml, resolve_entity};

/// Serialize `root` as an XML document fragment (no declaration).
pub fn write_tree(root: &Element) -> String {
    let table = PrefixTable::collect(root);
    let mut out = String::new();
    write_element(root, &table, true, &mut out);
    out
}

struct PrefixTable {
    default: Namespace,
    prefixes: Vec<(Namespace, String)>,
}

impl PrefixTable {
    fn collect(root: &Element) -> Self {
        let mut table = Self {
            default: root.name.ns.clone(),
            prefixes: Vec::new(),
        };
        for elem in root.descendants() {
            if elem.name.ns != table.default {
                table.declare(&elem.name.ns);
            }
            for (name, _) in &elem.attrs {
                if name.ns != elem.name.ns {
                    table.declare(&name.ns);
                }
            }
        }
        table
    }

    fn declare(&mut self, ns: &Namespace) {
        if self.prefixes.iter().any(|(n, _)| n == ns) {
            return;
        }
        let prefix = match ns.prefix() {
            Some(p) => p.to_string(),
            None => format!("ns{}", self.prefixes.len()),
        };
        self.prefixes.push((ns.clone(), prefix));
    }

    fn prefix(&self, ns: &Namespace) -> Option<&str> {
        self.prefixes
            .iter()
            .find(|(n, _)| n == ns)
            .map(|(_, p)| p.as_str())
    }

    fn element_name(&self, name: &QName) -> String {
        if name.ns == self.default {
            return name.local.to_string();
        }
        match self.prefix(&name.ns) {
            Some(prefix) => format!("{prefix}:{}", name.local),
            None => name.local.to_string(),
        }
    }

    fn attr_name(&self, name: &QName, owner: &Namespace) -> String {
        if &name.ns == owner {
            return name.local.to_string();
        }
        match self.prefix(&name.ns) {
            Some(prefix) => format!("{prefix}:{}", name.local),
            None => name.local.to_string(),
        }
    }
}

fn write_element(elem: &Element, table: &PrefixTable, is_root: bool, out: &mut String) {
    let tag = table.element_name(&elem.name);
    out.push('<');
    out.push_str(&tag);

    if is_root {
        out.push_str(&format!(" xmlns=\"{}\"", escape_xml(table.default.uri())));
        for (ns, prefix) in &table.prefixes {
            if prefix == "xml" {
                continue;
            }
            out.push_str(&format!(" xmlns:{prefix}=\"{}\"", escape_xml(ns.uri())));
        }
    }

    for (name, value) in &elem.attrs {
        out.push_str(&format!(
            " {}=\"{}\"",
            table.attr_name(name, &elem.name.ns),
            escape_xml(&value.to_string())
        ));
    }

    if elem.children.is_empty() {
        out.push_str(" />");
        return;
    }

    out.push('>');
    for child in &elem.children {
        match child {
            Node::Text(text) => out.push_str(&escape_xml(text)),
            Node::Element(e) => write_element(e, table, false, out),
        }
    }
    out.push_str("</");
    out.push_str(&tag);
    out.push('>');
}

/// Receiver of namespace-resolved parse events.
pub trait XmlVisitor {
    fn start(&mut self, name: QName, attrs: Vec<(QName, String)>);
    fn end(&mut self, name: &QName);
    fn text(&mut self, text: &str);
}

/// Parse `xml`, resolving names against in-document namespace declarations.
///
/// Unprefixed elements outside any default namespace declaration fall into
/// `default_ns`, so plain DocBook files without `xmlns` still resolve.
pub fn read_xml<V: XmlVisitor>(xml: &str, default_ns: Namespace, visitor: &mut V) -> Result<()> {
    let mut reader = Reader::from_str(xml);
    let mut scopes = ScopeStack::new(default_ns);
    let mut open: Vec<QName> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let (name, attrs) = scopes.open(&e);
                visitor.start(name.clone(), attrs);
                open.push(name);
            }
            Ok(Event::Empty(e)) => {
                let (name, attrs) = scopes.open(&e);
                visitor.start(name.clone(), attrs);
                visitor.end(&name);
                scopes.close();
            }
            Ok(Event::End(_)) => {
                if let Some(name) = open.pop() {
                    visitor.end(&name);
                }
                scopes.close();
            }
            Ok(Event::Text(e)) => {
                if !open.is_empty() {
                    visitor.text(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::CData(e)) => {
                if !open.is_empty() {
                    visitor.text(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::GeneralRef(e)) => {
                let entity = String::from_utf8_lossy(e.as_ref());
                match resolve_entity(&entity) {
                    Some(resolved) => visitor.text(&resolved),
                    None => log::debug!("dropping unknown entity &{entity};"),
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(Error::Xml(e)),
        }
    }

    Ok(())
}

struct ScopeStack {
    fallback: Namespace,
    scopes: Vec<HashMap<String, Namespace>>,
}

impl ScopeStack {
    fn new(fallback: Namespace) -> Self {
        Self {
            fallback,
            scopes: Vec::new(),
        }
    }

    fn lookup(&self, prefix: &str) -> Option<&Namespace> {
        self.scopes.iter().rev().find_map(|scope| scope.get(prefix))
    }

    fn resolve_element(&self, raw: &str) -> QName {
        match raw.split_once(':') {
            Some(("xml", local)) => QName::new(Namespace::Other(super::XML_URI.into()), local.to_string()),
            Some((prefix, local)) => {
                let ns = self
                    .lookup(prefix)
                    .cloned()
                    .unwrap_or_else(|| Namespace::Other(prefix.to_string()));
                QName::new(ns, local.to_string())
            }
            None => {
                let ns = self.lookup("").cloned().unwrap_or_else(|| self.fallback.clone());
                QName::new(ns, raw.to_string())
            }
        }
    }

    /// Push the declarations of `e` and resolve its name and attributes.
    fn open(&mut self, e: &BytesStart<'_>) -> (QName, Vec<(QName, String)>) {
        let mut scope = HashMap::new();
        let mut raw_attrs = Vec::new();
        for attr in e.attributes().flatten() {
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let raw = String::from_utf8_lossy(&attr.value).into_owned();
            let value = quick_xml::escape::unescape(&raw)
                .map(|v| v.into_owned())
                .unwrap_or(raw);
            if key == "xmlns" {
                scope.insert(String::new(), Namespace::from_uri(&value));
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                scope.insert(prefix.to_string(), Namespace::from_uri(&value));
            } else {
                raw_attrs.push((key, value));
            }
        }
        self.scopes.push(scope);

        let raw_name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
        let name = self.resolve_element(&raw_name);
        let attrs = raw_attrs
            .into_iter()
            .map(|(key, value)| {
                let attr_name = if key.contains(':') {
                    self.resolve_element(&key)
                } else {
                    QName::new(name.ns.clone(), key)
                };
                (attr_name, value)
            })
            .collect();
        (name, attrs)
    }

    fn close(&mut self) {
        self.scopes.pop();
    }
}

/// Visitor that rebuilds an [`Element`] tree from parse events.
#[derive(Debug, Default)]
pub struct TreeBuilder {
    stack: Vec<Element>,
    root: Option<Element>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The finished tree, if a root element was seen.
    pub fn finish(mut self) -> Option<Element> {
        // Unclosed elements (truncated input) are folded into their parents.
        while let Some(elem) = self.stack.pop() {
            match self.stack.last_mut() {
                Some(parent) => parent.push(elem),
                None => self.root = Some(elem),
            }
        }
        self.root
    }
}

impl XmlVisitor for TreeBuilder {
    fn start(&mut self, name: QName, attrs: Vec<(QName, String)>) {
        let mut elem = Element::new(name);
        for (key, value) in attrs {
            let typed = AttrValue::typed(&key, &value);
            elem.attrs.push((key, typed));
        }
        self.stack.push(elem);
    }

    fn end(&mut self, _name: &QName) {
        let Some(elem) = self.stack.pop() else {
            return;
        };
        match self.stack.last_mut() {
            Some(parent) => parent.push(elem),
            None => self.root = Some(elem),
        }
    }

    fn text(&mut self, text: &str) {
        if let Some(top) = self.stack.last_mut() {
            top.push_text(text);
        }
    }
}

/// Parse a serialized intermediate tree.
pub fn read_tree(xml: &str) -> Result<Element> {
    let mut builder = TreeBuilder::new();
    read_xml(xml, Namespace::Page, &mut builder)?;
    builder
        .finish()
        .ok_or_else(|| Error::InvalidTree("document has no root element".into()))
}
