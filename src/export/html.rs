//! HTML emitter.
//!
//! The walk works on a copy of the tree whose headings already carry their
//! ids: one pass numbers every `h` without an explicit `html:id` as
//! `toc-N`, in document order, skipping numbers whose id an element
//! already carries. That way a `table-of-content` can be rendered
//! in place from the headings of its enclosing page. Footnotes are rendered
//! into a side buffer, replaced by a numbered reference and appended at the
//! end of the page they appear in.

use std::collections::HashSet;

use crate::error::Result;
use crate::iri::Iri;
use crate::pipeline::ConvertOptions;
use crate::registry::{ConvertContext, Converter, Payload};
use crate::tree::{AttrValue, Element, Namespace, Node, html};
use crate::util::escape_xml;

/// Configuration for HTML export.
#[derive(Debug, Clone, Default)]
pub struct HtmlConfig {
    /// Wrap the page in a complete XHTML document instead of a `div`.
    pub full_document: bool,
}

/// Exporter for `text/x.moin.xhtml` fragments and XHTML documents.
#[derive(Debug, Clone, Default)]
pub struct HtmlExporter {
    config: HtmlConfig,
}

impl HtmlExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: HtmlConfig) -> Self {
        Self { config }
    }
}

impl Converter for HtmlExporter {
    fn convert(&self, input: Payload, ctx: &ConvertContext<'_>) -> Result<Payload> {
        let mut tree = input.into_tree()?;
        let mut taken = HashSet::new();
        explicit_ids(&tree, &mut taken);
        let mut counter = 0;
        assign_heading_ids(&mut tree, &mut counter, &mut taken);

        let mut writer = HtmlWriter::new(ctx.options, taken);
        writer.element(&tree);
        let body = writer.finish();

        if !self.config.full_document {
            return Ok(Payload::Text(body));
        }
        let title = ctx.options.page_name().unwrap_or("");
        Ok(Payload::Text(xhtml_document(&body, title)))
    }
}

/// Wrap a fragment in an XHTML document.
fn xhtml_document(body: &str, title: &str) -> String {
    let mut doc = String::new();
    doc.push_str(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.1//EN" "http://www.w3.org/TR/xhtml11/DTD/xhtml11.dtd">
<html xmlns="http://www.w3.org/1999/xhtml">
<head>
  <meta http-equiv="Content-Type" content="application/xhtml+xml; charset=utf-8"/>
  <title>"#,
    );
    doc.push_str(&escape_xml(title));
    doc.push_str("</title>\n</head>\n<body>\n");
    doc.push_str(body);
    doc.push_str("\n</body>\n</html>\n");
    doc
}

/// Every `html:id` already present in the tree.
fn explicit_ids(elem: &Element, taken: &mut HashSet<String>) {
    if let Some(id) = elem.get(&Namespace::Html, "id") {
        taken.insert(id.to_string());
    }
    for child in elem.child_elements() {
        explicit_ids(child, taken);
    }
}

/// Give every heading without an explicit id a free `toc-N` id.
fn assign_heading_ids(elem: &mut Element, counter: &mut usize, taken: &mut HashSet<String>) {
    if elem.is_page("h") && elem.get(&Namespace::Html, "id").is_none() {
        let id = loop {
            let id = format!("toc-{counter}");
            *counter += 1;
            if !taken.contains(&id) {
                break id;
            }
        };
        taken.insert(id.clone());
        elem.set_attr(html("id"), id);
    }
    for child in &mut elem.children {
        if let Node::Element(child) = child {
            assign_heading_ids(child, counter, taken);
        }
    }
}

struct Heading {
    level: i64,
    text: String,
    id: String,
}

/// Headings of `page`, not descending into nested pages.
fn page_headings(page: &Element) -> Vec<Heading> {
    fn collect(elem: &Element, out: &mut Vec<Heading>) {
        for child in elem.child_elements() {
            if child.is_page("page") {
                continue;
            }
            if child.is_page("h") {
                let id = child
                    .get(&Namespace::Html, "id")
                    .map(AttrValue::to_string)
                    .unwrap_or_default();
                out.push(Heading {
                    level: child.page_int("outline-level").unwrap_or(1).clamp(1, 6),
                    text: child.text(),
                    id,
                });
            } else {
                collect(child, out);
            }
        }
    }
    let mut out = Vec::new();
    collect(page, &mut out);
    out
}

/// An open `page` element and the footnotes collected inside it.
struct PageFrame<'t> {
    page: &'t Element,
    notes: Vec<(usize, String)>,
}

struct HtmlWriter<'a, 't> {
    out: String,
    options: &'a ConvertOptions,
    pages: Vec<PageFrame<'t>>,
    /// Footnotes found outside any page.
    loose_notes: Vec<(usize, String)>,
    note_counter: usize,
    /// Ids in use, which footnote numbering must avoid.
    taken: HashSet<String>,
    /// Per open list: whether its labels are generated (`ol`/`ul`).
    lists: Vec<bool>,
}

const VOID_ELEMENTS: &[&str] = &["area", "br", "col", "hr", "img", "input", "meta", "wbr"];

impl<'a, 't> HtmlWriter<'a, 't> {
    fn new(options: &'a ConvertOptions, taken: HashSet<String>) -> Self {
        Self {
            out: String::new(),
            options,
            pages: Vec::new(),
            loose_notes: Vec::new(),
            note_counter: 0,
            taken,
            lists: Vec::new(),
        }
    }

    fn finish(mut self) -> String {
        let notes = std::mem::take(&mut self.loose_notes);
        self.footnotes(&notes);
        self.out
    }

    fn children(&mut self, elem: &'t Element) {
        for child in &elem.children {
            match child {
                Node::Text(text) => self.out.push_str(&escape_xml(text)),
                Node::Element(child) => self.element(child),
            }
        }
    }

    fn open(&mut self, tag: &str, elem: &Element, extra: &[(&str, String)]) {
        self.out.push('<');
        self.out.push_str(tag);
        for (name, value) in extra {
            self.attr(name, value);
        }
        for (name, value) in &elem.attrs {
            if name.ns == Namespace::Html && !extra.iter().any(|(n, _)| *n == name.local) {
                self.attr(&name.local, &value.to_string());
            }
        }
        self.out.push('>');
    }

    fn attr(&mut self, name: &str, value: &str) {
        self.out.push(' ');
        self.out.push_str(name);
        self.out.push_str("=\"");
        self.out.push_str(&escape_xml(value));
        self.out.push('"');
    }

    fn close(&mut self, tag: &str) {
        self.out.push_str("</");
        self.out.push_str(tag);
        self.out.push('>');
    }

    fn wrap(&mut self, tag: &str, elem: &'t Element, extra: &[(&str, String)]) {
        self.open(tag, elem, extra);
        self.children(elem);
        self.close(tag);
    }

    fn element(&mut self, elem: &'t Element) {
        match &elem.name.ns {
            Namespace::Page => self.page_element(elem),
            Namespace::Html => self.html_element(elem),
            ns => {
                log::debug!("eliding element {{{}}}{}", ns.uri(), elem.name.local);
                self.children(elem);
            }
        }
    }

    fn page_element(&mut self, elem: &'t Element) {
        match elem.name.local.as_ref() {
            "page" => self.page(elem),
            "body" => {
                let has_attrs = elem.attrs.iter().any(|(n, _)| n.ns == Namespace::Html);
                if has_attrs {
                    self.wrap("div", elem, &[]);
                } else {
                    self.children(elem);
                }
            }
            "h" => {
                let level = elem.page_int("outline-level").unwrap_or(1).clamp(1, 6);
                self.wrap(&format!("h{level}"), elem, &[]);
            }
            "p" => self.wrap("p", elem, &[]),
            "div" => self.wrap("div", elem, &[]),
            "blockquote" => self.wrap("blockquote", elem, &[]),
            "admonition" => {
                let kind = elem.page_attr("type").unwrap_or_else(|| "note".to_string());
                self.wrap("div", elem, &[("class", kind)]);
            }
            "line-break" => self.open_void("br", elem),
            "separator" => self.open_void("hr", elem),
            "emphasis" => self.wrap("em", elem, &[]),
            "strong" => self.wrap("strong", elem, &[]),
            "code" => self.wrap("code", elem, &[]),
            "blockcode" => self.wrap("pre", elem, &[]),
            "span" => self.span(elem),
            "a" => self.link(elem),
            "object" => self.object(elem),
            "list" => self.list(elem),
            "list-item" => self.list_item(elem),
            "list-item-label" => self.wrap("dt", elem, &[]),
            "list-item-body" => self.wrap("dd", elem, &[]),
            "table" => self.wrap("table", elem, &[]),
            "table-header" => self.wrap("thead", elem, &[]),
            "table-footer" => self.wrap("tfoot", elem, &[]),
            "table-body" => self.wrap("tbody", elem, &[]),
            "table-row" => self.wrap("tr", elem, &[]),
            "table-cell" => {
                let mut extra = Vec::new();
                if let Some(n) = elem.page_int("number-columns-spanned").filter(|n| *n > 1) {
                    extra.push(("colspan", n.to_string()));
                }
                if let Some(n) = elem.page_int("number-rows-spanned").filter(|n| *n > 1) {
                    extra.push(("rowspan", n.to_string()));
                }
                self.wrap("td", elem, &extra);
            }
            "note" => self.note(elem),
            "table-of-content" => self.table_of_contents(elem),
            "part" | "inline-part" => self.part(elem),
            "error" => self.wrap("span", elem, &[("class", "error".to_string())]),
            "arguments" | "argument" => {}
            other => {
                log::warn!("unknown element page:{other}");
                self.wrap(
                    "span",
                    elem,
                    &[("class", "error".to_string()), ("title", format!("unknown element {other}"))],
                );
            }
        }
    }

    fn html_element(&mut self, elem: &'t Element) {
        let tag = elem.name.local.to_string();
        self.out.push('<');
        self.out.push_str(&tag);
        for (name, value) in &elem.attrs {
            self.attr(&name.local, &value.to_string());
        }
        if elem.children.is_empty() && VOID_ELEMENTS.contains(&tag.as_str()) {
            self.out.push_str(" />");
            return;
        }
        self.out.push('>');
        self.children(elem);
        self.close(&tag);
    }

    fn open_void(&mut self, tag: &str, elem: &Element) {
        self.open(tag, elem, &[]);
        self.out.pop();
        self.out.push_str(" />");
    }

    fn page(&mut self, elem: &'t Element) {
        self.pages.push(PageFrame {
            page: elem,
            notes: Vec::new(),
        });
        self.open("div", elem, &[]);
        self.children(elem);
        if let Some(frame) = self.pages.pop() {
            self.footnotes(&frame.notes);
        }
        self.close("div");
    }

    fn span(&mut self, elem: &'t Element) {
        let decoration = elem.page_attr("text-decoration");
        let shift = elem.page_attr("baseline-shift");
        let size = elem.page_attr("font-size");
        match (decoration.as_deref(), shift.as_deref()) {
            (Some("underline"), _) => self.wrap("ins", elem, &[]),
            (Some("line-through"), _) => self.wrap("del", elem, &[]),
            (_, Some("super")) => self.wrap("sup", elem, &[]),
            (_, Some("sub")) => self.wrap("sub", elem, &[]),
            _ => match size {
                Some(size) => self.wrap("span", elem, &[("style", format!("font-size: {size}"))]),
                None => self.wrap("span", elem, &[]),
            },
        }
    }

    /// URL for a resolved link target; `None` for wiki references that
    /// never went through link rewriting.
    fn link_url(&self, href: &Iri) -> Option<String> {
        match href.scheme_str() {
            "wiki" if href.authority.as_deref().is_none_or(str::is_empty) => {
                let root = self.options.script_root.trim_end_matches('/');
                let mut target = Iri::parse(&format!("{root}{}", href.path_str()));
                target.query.clone_from(&href.query);
                target.fragment.clone_from(&href.fragment);
                Some(target.to_string())
            }
            "wiki.local" if href.path_str().is_empty() => href.fragment.as_ref().map(|f| format!("#{f}")),
            "wiki" | "wiki.local" => None,
            _ => Some(href.to_string()),
        }
    }

    fn link(&mut self, elem: &'t Element) {
        let Some(href) = elem.href() else {
            log::warn!("link without href");
            self.wrap("span", elem, &[("class", "error".to_string())]);
            return;
        };
        match self.link_url(href) {
            Some(url) => self.wrap("a", elem, &[("href", url)]),
            None => {
                log::warn!("unresolved link {href}");
                self.wrap(
                    "span",
                    elem,
                    &[("class", "error".to_string()), ("title", format!("unresolved link {href}"))],
                );
            }
        }
    }

    fn object(&mut self, elem: &'t Element) {
        let alt = elem.page_attr("alt").unwrap_or_default();
        let Some(url) = elem.href().and_then(|href| self.link_url(href)) else {
            log::warn!("object without resolvable href");
            self.out.push_str("<span class=\"error\">");
            self.out.push_str(&escape_xml(&alt));
            self.out.push_str("</span>");
            return;
        };
        match elem.page_attr("type").filter(|t| !t.starts_with("image/")) {
            Some(kind) => {
                self.wrap("object", elem, &[("data", url), ("type", kind)]);
            }
            None => {
                self.open("img", elem, &[("src", url), ("alt", alt)]);
                self.out.pop();
                self.out.push_str(" />");
            }
        }
    }

    fn list(&mut self, elem: &'t Element) {
        let generate = elem.page_attr("item-label-generate");
        self.lists.push(generate.is_some());
        match generate.as_deref() {
            Some("ordered") => {
                let kind = match elem.page_attr("list-style-type").as_deref() {
                    Some("upper-alpha") => Some("A"),
                    Some("lower-alpha") => Some("a"),
                    Some("upper-roman") => Some("I"),
                    Some("lower-roman") => Some("i"),
                    _ => None,
                };
                let extra: Vec<_> = kind.map(|k| ("type", k.to_string())).into_iter().collect();
                self.wrap("ol", elem, &extra);
            }
            Some(_) => {
                let extra: Vec<_> = (elem.page_attr("list-style-type").as_deref() == Some("none"))
                    .then(|| ("style", "list-style-type: none".to_string()))
                    .into_iter()
                    .collect();
                self.wrap("ul", elem, &extra);
            }
            None => self.wrap("dl", elem, &[]),
        }
        self.lists.pop();
    }

    /// `li` in generated lists; label and body become `dt`/`dd` otherwise.
    fn list_item(&mut self, elem: &'t Element) {
        if self.lists.last() != Some(&true) {
            self.children(elem);
            return;
        }
        self.open("li", elem, &[]);
        for child in elem.child_elements() {
            if child.is_page("list-item-body") {
                self.children(child);
            } else {
                self.element(child);
            }
        }
        self.close("li");
    }

    fn note(&mut self, elem: &'t Element) {
        self.note_counter += 1;
        while self.taken.contains(&format!("note-{}", self.note_counter))
            || self.taken.contains(&format!("note-{}-ref", self.note_counter))
        {
            self.note_counter += 1;
        }
        let id = self.note_counter;
        let saved = std::mem::take(&mut self.out);
        match elem.find_page("note-body") {
            Some(body) => self.children(body),
            None => self.children(elem),
        }
        let body = std::mem::replace(&mut self.out, saved);

        let notes = match self.pages.last_mut() {
            Some(frame) => &mut frame.notes,
            None => &mut self.loose_notes,
        };
        notes.push((id, body));
        let number = notes.len();
        self.out.push_str(&format!(
            "<sup><a id=\"note-{id}-ref\" href=\"#note-{id}\">{number}</a></sup>"
        ));
    }

    fn footnotes(&mut self, notes: &[(usize, String)]) {
        if notes.is_empty() {
            return;
        }
        self.out.push_str("<div class=\"footnotes\">");
        for (number, (id, body)) in notes.iter().enumerate() {
            self.out.push_str(&format!(
                "<p id=\"note-{id}\"><sup><a href=\"#note-{id}-ref\">{}</a></sup> {body}</p>",
                number + 1
            ));
        }
        self.out.push_str("</div>");
    }

    fn table_of_contents(&mut self, elem: &Element) {
        let headings = self.pages.last().map(|f| page_headings(f.page)).unwrap_or_default();
        let max_depth = elem.page_int("outline-level");
        let top = headings.iter().map(|h| h.level).min().unwrap_or(1);

        self.out.push_str(
            "<div class=\"table-of-contents\"><p class=\"table-of-contents-heading\">Contents</p>",
        );
        // One entry per open <ol>: whether its last <li> is still open.
        let mut open: Vec<bool> = Vec::new();
        for heading in &headings {
            let depth = (heading.level - top + 1) as usize;
            if max_depth.is_some_and(|max| depth as i64 > max) {
                continue;
            }
            while open.len() > depth {
                if open.pop() == Some(true) {
                    self.out.push_str("</li>");
                }
                self.out.push_str("</ol>");
            }
            while open.len() < depth {
                if let Some(last) = open.last_mut()
                    && !*last
                {
                    self.out.push_str("<li>");
                    *last = true;
                }
                self.out.push_str("<ol>");
                open.push(false);
            }
            if let Some(last) = open.last_mut() {
                if *last {
                    self.out.push_str("</li>");
                }
                *last = true;
            }
            self.out.push_str(&format!(
                "<li><a href=\"#{}\">{}</a>",
                escape_xml(&heading.id),
                escape_xml(&heading.text)
            ));
        }
        while let Some(item_open) = open.pop() {
            if item_open {
                self.out.push_str("</li>");
            }
            self.out.push_str("</ol>");
        }
        self.out.push_str("</div>");
    }

    /// Format parts show their converted body; macro placeholders show
    /// whatever they still hold (normally the error marker).
    fn part(&mut self, elem: &'t Element) {
        match elem.find_page("body") {
            Some(body) => {
                let tag = if elem.is_page("part") { "div" } else { "span" };
                self.open(tag, elem, &[]);
                self.children(body);
                self.close(tag);
            }
            None => {
                for child in elem.child_elements() {
                    if !child.is_page("arguments") {
                        self.element(child);
                    }
                }
            }
        }
    }
}
