//! html5ever `TreeSink` building a reference-counted DOM.
//!
//! The DOM only lives between parsing and the conversion to the page
//! vocabulary, so it keeps nothing but element names, attributes, text and
//! the parent/child links the tree builder needs for its fix-ups.

use std::borrow::Cow;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use html5ever::tendril::StrTendril;
use html5ever::tree_builder::{ElementFlags, NodeOrText, QuirksMode, TreeSink};
use html5ever::{Attribute, QualName};

pub(crate) type Handle = Rc<DomNode>;

#[derive(Debug)]
pub(crate) enum DomData {
    Document,
    Element {
        name: QualName,
        attrs: RefCell<Vec<Attribute>>,
        template: Option<Handle>,
    },
    Text(RefCell<String>),
    Comment,
}

#[derive(Debug)]
pub(crate) struct DomNode {
    pub data: DomData,
    parent: RefCell<Weak<DomNode>>,
    pub children: RefCell<Vec<Handle>>,
}

impl DomNode {
    fn new(data: DomData) -> Handle {
        Rc::new(Self {
            data,
            parent: RefCell::new(Weak::new()),
            children: RefCell::new(Vec::new()),
        })
    }

    /// Local name of an element node.
    pub fn local_name(&self) -> Option<&str> {
        match &self.data {
            DomData::Element { name, .. } => Some(&*name.local),
            _ => None,
        }
    }

    /// Value of the attribute `local`, in no namespace.
    pub fn attr(&self, local: &str) -> Option<String> {
        match &self.data {
            DomData::Element { attrs, .. } => attrs
                .borrow()
                .iter()
                .find(|a| a.name.ns.is_empty() && &*a.name.local == local)
                .map(|a| a.value.to_string()),
            _ => None,
        }
    }

    /// Concatenated text of all descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        if let DomData::Text(text) = &self.data {
            out.push_str(&text.borrow());
        }
        for child in self.children.borrow().iter() {
            child.collect_text(out);
        }
    }

    /// First descendant element named `local`, in document order.
    pub fn find(self: &Rc<Self>, local: &str) -> Option<Handle> {
        if self.local_name() == Some(local) {
            return Some(self.clone());
        }
        self.children.borrow().iter().find_map(|c| c.find(local))
    }

    fn parent(&self) -> Option<Handle> {
        self.parent.borrow().upgrade()
    }
}

fn append_child(parent: &Handle, child: Handle) {
    detach(&child);
    *child.parent.borrow_mut() = Rc::downgrade(parent);
    parent.children.borrow_mut().push(child);
}

fn append_text(parent: &Handle, text: &str) {
    if let Some(last) = parent.children.borrow().last()
        && let DomData::Text(existing) = &last.data
    {
        existing.borrow_mut().push_str(text);
        return;
    }
    append_child(parent, DomNode::new(DomData::Text(RefCell::new(text.to_string()))));
}

fn detach(node: &Handle) {
    let Some(parent) = node.parent() else {
        return;
    };
    parent.children.borrow_mut().retain(|c| !Rc::ptr_eq(c, node));
    *node.parent.borrow_mut() = Weak::new();
}

/// Builds a [`DomNode`] tree from html5ever events.
pub(crate) struct DomSink {
    document: Handle,
}

impl Default for DomSink {
    fn default() -> Self {
        Self {
            document: DomNode::new(DomData::Document),
        }
    }
}

impl TreeSink for DomSink {
    type Handle = Handle;
    type Output = Handle;
    type ElemName<'a>
        = &'a QualName
    where
        Self: 'a;

    fn finish(self) -> Self::Output {
        self.document
    }

    fn parse_error(&self, msg: Cow<'static, str>) {
        log::trace!("html: {msg}");
    }

    fn get_document(&self) -> Self::Handle {
        self.document.clone()
    }

    fn elem_name<'a>(&'a self, target: &'a Self::Handle) -> Self::ElemName<'a> {
        static EMPTY: QualName = QualName {
            prefix: None,
            ns: html5ever::ns!(),
            local: html5ever::local_name!(""),
        };
        match &target.data {
            DomData::Element { name, .. } => name,
            _ => &EMPTY,
        }
    }

    fn create_element(&self, name: QualName, attrs: Vec<Attribute>, flags: ElementFlags) -> Self::Handle {
        let template = flags.template.then(|| DomNode::new(DomData::Document));
        DomNode::new(DomData::Element {
            name,
            attrs: RefCell::new(attrs),
            template,
        })
    }

    fn create_comment(&self, _text: StrTendril) -> Self::Handle {
        DomNode::new(DomData::Comment)
    }

    fn create_pi(&self, _target: StrTendril, _data: StrTendril) -> Self::Handle {
        DomNode::new(DomData::Comment)
    }

    fn append(&self, parent: &Self::Handle, child: NodeOrText<Self::Handle>) {
        match child {
            NodeOrText::AppendNode(node) => append_child(parent, node),
            NodeOrText::AppendText(text) => append_text(parent, &text),
        }
    }

    fn append_based_on_parent_node(
        &self,
        element: &Self::Handle,
        prev_element: &Self::Handle,
        child: NodeOrText<Self::Handle>,
    ) {
        if element.parent().is_some() {
            self.append_before_sibling(element, child);
        } else {
            self.append(prev_element, child);
        }
    }

    fn append_doctype_to_document(&self, _name: StrTendril, _public_id: StrTendril, _system_id: StrTendril) {}

    fn get_template_contents(&self, target: &Self::Handle) -> Self::Handle {
        match &target.data {
            DomData::Element {
                template: Some(contents),
                ..
            } => contents.clone(),
            _ => target.clone(),
        }
    }

    fn same_node(&self, x: &Self::Handle, y: &Self::Handle) -> bool {
        Rc::ptr_eq(x, y)
    }

    fn set_quirks_mode(&self, _mode: QuirksMode) {}

    fn append_before_sibling(&self, sibling: &Self::Handle, new_node: NodeOrText<Self::Handle>) {
        let Some(parent) = sibling.parent() else {
            return;
        };
        let child = match new_node {
            NodeOrText::AppendNode(node) => {
                detach(&node);
                node
            }
            NodeOrText::AppendText(text) => DomNode::new(DomData::Text(RefCell::new(text.to_string()))),
        };
        *child.parent.borrow_mut() = Rc::downgrade(&parent);
        let mut children = parent.children.borrow_mut();
        let index = children
            .iter()
            .position(|c| Rc::ptr_eq(c, sibling))
            .unwrap_or(children.len());
        children.insert(index, child);
    }

    fn add_attrs_if_missing(&self, target: &Self::Handle, attrs: Vec<Attribute>) {
        if let DomData::Element { attrs: existing, .. } = &target.data {
            let mut existing = existing.borrow_mut();
            for attr in attrs {
                if !existing.iter().any(|a| a.name == attr.name) {
                    existing.push(attr);
                }
            }
        }
    }

    fn remove_from_parent(&self, target: &Self::Handle) {
        detach(target);
    }

    fn reparent_children(&self, node: &Self::Handle, new_parent: &Self::Handle) {
        let children = std::mem::take(&mut *node.children.borrow_mut());
        for child in children {
            *child.parent.borrow_mut() = Weak::new();
            append_child(new_parent, child);
        }
    }
}

/// Parse an HTML document or fragment; html5ever supplies the missing
/// `html`/`body` wrappers.
pub(crate) fn parse_html(html: &str) -> Handle {
    use html5ever::tendril::TendrilSink;

    html5ever::parse_document(DomSink::default(), Default::default())
        .from_utf8()
        .one(html.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wraps_fragment() {
        let doc = parse_html("<p>Hello <b>you</b></p>");
        let body = doc.find("body").unwrap();
        let p = body.find("p").unwrap();
        assert_eq!(p.text(), "Hello you");
        assert!(doc.find("head").is_some());
    }

    #[test]
    fn test_attributes() {
        let doc = parse_html(r#"<div id="main" class="a b">x</div>"#);
        let div = doc.find("div").unwrap();
        assert_eq!(div.attr("id").as_deref(), Some("main"));
        assert_eq!(div.attr("class").as_deref(), Some("a b"));
        assert_eq!(div.attr("missing"), None);
    }

    #[test]
    fn test_misnested_markup_is_repaired() {
        let doc = parse_html("<table><tr><td>a</td></tr>stray</table>");
        let body = doc.find("body").unwrap();
        assert!(body.text().contains("stray"));
        let cell = doc.find("td").unwrap();
        assert_eq!(cell.text(), "a");
        assert!(doc.find("tbody").is_some());
    }
}
