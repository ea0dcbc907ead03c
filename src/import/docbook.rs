//! DocBook parser.
//!
//! The XML is first rebuilt as a generic tree, then mapped element by
//! element onto the page vocabulary. Elements without a mapping keep their
//! converted children and disappear themselves.

use std::collections::HashMap;

use super::page_with_body;
use crate::error::Result;
use crate::iri::Iri;
use crate::registry::{ConvertContext, Converter, Payload};
use crate::tree::xml::{TreeBuilder, read_xml};
use crate::tree::{Element, Namespace, Node, XML_URI, error_element, html, page, xlink};

/// Parser for `application/docbook+xml`.
pub struct DocBookParser;

impl Converter for DocBookParser {
    fn convert(&self, input: Payload, ctx: &ConvertContext<'_>) -> Result<Payload> {
        let text = input.into_text()?;
        let mut builder = TreeBuilder::new();
        let mut body = Element::page("body");
        match read_xml(&text, Namespace::DocBook, &mut builder) {
            Ok(()) => {
                if let Some(root) = builder.finish() {
                    DocBookReader::default().visit(&root, &mut body);
                }
            }
            Err(e) => {
                log::warn!("malformed DocBook: {e}");
                body.push(error_element(format!("malformed DocBook: {e}")));
            }
        }
        Ok(Payload::Tree(page_with_body(ctx.options.page_href.as_ref(), body)))
    }
}

/// Converts one DocBook document.
#[derive(Default)]
struct DocBookReader {
    /// Nesting of recursive `section` elements.
    section_depth: usize,
    /// Column numbers of the current `tgroup`'s `colspec`s, by name.
    columns: HashMap<String, i64>,
}

fn attr(elem: &Element, local: &str) -> Option<String> {
    elem.get(&Namespace::DocBook, local).map(|v| v.to_string())
}

/// Elements whose whitespace-only text is layout, not content.
const BLOCK_CONTAINERS: &[&str] = &[
    "article", "book", "chapter", "appendix", "preface", "part", "section", "simplesect", "sect1", "sect2",
    "sect3", "sect4", "sect5", "info", "itemizedlist", "orderedlist", "listitem", "variablelist",
    "varlistentry", "blockquote", "caution", "important", "note", "tip", "warning", "footnote", "qandaset",
    "qandaentry", "question", "answer", "mediaobject", "figure", "informalfigure", "table", "informaltable",
    "tgroup", "thead", "tbody", "tfoot", "row", "formalpara",
];

fn list_style(numeration: &str) -> Option<&'static str> {
    match numeration {
        "loweralpha" => Some("lower-alpha"),
        "upperalpha" => Some("upper-alpha"),
        "lowerroman" => Some("lower-roman"),
        "upperroman" => Some("upper-roman"),
        _ => None,
    }
}

fn admonition_type(local: &str) -> Option<&'static str> {
    match local {
        "caution" => Some("caution"),
        "important" => Some("important"),
        "note" => Some("note"),
        "tip" => Some("tip"),
        "warning" => Some("warning"),
        _ => None,
    }
}

impl DocBookReader {
    fn visit(&mut self, elem: &Element, out: &mut Element) {
        if elem.name.ns != Namespace::DocBook {
            self.children(elem, out);
            return;
        }
        let local = elem.name.local.as_ref();
        if let Some(level) = local
            .strip_prefix("sect")
            .and_then(|n| n.parse::<i64>().ok())
            .filter(|n| (1..=5).contains(n))
        {
            self.section(elem, level, out);
            return;
        }
        match local {
            "section" | "simplesect" | "chapter" | "appendix" | "preface" => {
                self.section_depth += 1;
                self.section(elem, self.section_depth as i64, out);
                self.section_depth -= 1;
            }
            "title" | "subtitle" | "titleabbrev" | "info" | "articleinfo" | "bookinfo" | "colspec" => {}
            "para" | "simpara" => out.push(self.copy(elem, "p")),
            "formalpara" => {
                let mut p = Element::page("p");
                if let Some(title) = elem.child_elements().find(|c| c.is(&Namespace::DocBook, "title")) {
                    p.push(self.copy(title, "strong"));
                    p.push_text(" ");
                }
                for child in elem.child_elements().filter(|c| c.is(&Namespace::DocBook, "para")) {
                    self.children(child, &mut p);
                }
                out.push(p);
            }
            "emphasis" => {
                let strong = attr(elem, "role").is_some_and(|r| r == "bold" || r == "strong");
                out.push(self.copy(elem, if strong { "strong" } else { "emphasis" }));
            }
            "literal" | "code" | "command" | "filename" | "varname" | "function" | "userinput"
            | "computeroutput" | "option" | "envar" | "classname" => {
                out.push(Element::page("code").with_text(elem.text()));
            }
            "programlisting" | "screen" | "literallayout" | "synopsis" => {
                out.push(Element::page("blockcode").with_text(elem.text()));
            }
            "blockquote" => {
                let mut quote = Element::page("blockquote");
                for child in elem.child_elements() {
                    if !child.is(&Namespace::DocBook, "attribution") {
                        self.visit(child, &mut quote);
                    }
                }
                out.push(quote);
            }
            "itemizedlist" => {
                let list = Element::page("list").with_attr(page("item-label-generate"), "unordered");
                out.push(self.list_items(elem, list));
            }
            "orderedlist" => {
                let mut list = Element::page("list").with_attr(page("item-label-generate"), "ordered");
                if let Some(style) = attr(elem, "numeration").as_deref().and_then(list_style) {
                    list.set_attr(page("list-style-type"), style);
                }
                out.push(self.list_items(elem, list));
            }
            "variablelist" => out.push(self.variable_list(elem)),
            "qandaset" => out.push(self.qanda_set(elem)),
            "ulink" => {
                let href = attr(elem, "url").unwrap_or_default();
                out.push(self.link(elem, Iri::parse(&href)));
            }
            "link" | "olink" | "xref" => {
                let href = elem
                    .get(&Namespace::XLink, "href")
                    .map(|v| v.to_string())
                    .or_else(|| attr(elem, "linkend").map(|id| format!("#{id}")));
                match href {
                    Some(href) => out.push(self.link(elem, Iri::parse(&href))),
                    None => self.children(elem, out),
                }
            }
            "email" => {
                let address = elem.text();
                out.push(
                    Element::page("a")
                        .with_attr(xlink("href"), Iri::parse(&format!("mailto:{address}")))
                        .with_text(address),
                );
            }
            "footnote" => {
                let mut note_body = Element::page("note-body");
                self.children(elem, &mut note_body);
                out.push(
                    Element::page("note")
                        .with_attr(page("note-class"), "footnote")
                        .with_child(note_body),
                );
            }
            "superscript" | "subscript" => {
                let shift = if local == "superscript" { "super" } else { "sub" };
                let mut span = self.copy(elem, "span");
                span.set_attr(page("baseline-shift"), shift);
                out.push(span);
            }
            "trademark" => {
                self.children(elem, out);
                let symbol = match attr(elem, "class").as_deref() {
                    Some("copyright") => "\u{a9}",
                    Some("registered") => "\u{ae}",
                    Some("service") => "\u{2120}",
                    _ => "\u{2122}",
                };
                out.push_text(symbol);
            }
            "quote" => {
                out.push_text("\u{201c}");
                self.children(elem, out);
                out.push_text("\u{201d}");
            }
            "mediaobject" | "inlinemediaobject" | "figure" | "informalfigure" => {
                match self.media_object(elem) {
                    Some(object) => out.push(object),
                    None => self.children(elem, out),
                }
            }
            "table" | "informaltable" => out.push(self.table(elem)),
            "anchor" => {
                if let Some(id) = attr(elem, "id").or_else(|| attr_xml_id(elem)) {
                    out.push(Element::page("span").with_attr(html("id"), id));
                }
            }
            _ => {
                if let Some(kind) = admonition_type(local) {
                    let mut admonition = Element::page("admonition").with_attr(page("type"), kind);
                    self.children(elem, &mut admonition);
                    out.push(admonition);
                } else {
                    log::trace!("unmapped DocBook element {local}");
                    self.children(elem, out);
                }
            }
        }
    }

    fn children(&mut self, elem: &Element, out: &mut Element) {
        let block = elem.name.ns == Namespace::DocBook && BLOCK_CONTAINERS.contains(&elem.name.local.as_ref());
        for child in &elem.children {
            match child {
                Node::Text(text) if block && text.trim().is_empty() => {}
                Node::Text(text) => out.push_text(text),
                Node::Element(e) => self.visit(e, out),
            }
        }
    }

    /// A page element named `local` holding the converted children of `elem`.
    fn copy(&mut self, elem: &Element, local: &'static str) -> Element {
        let mut new = Element::page(local);
        self.children(elem, &mut new);
        new
    }

    fn section(&mut self, elem: &Element, level: i64, out: &mut Element) {
        let title = elem
            .child_elements()
            .find(|c| c.is(&Namespace::DocBook, "title"))
            .or_else(|| {
                elem.child_elements()
                    .filter(|c| c.is(&Namespace::DocBook, "info"))
                    .find_map(|info| info.child_elements().find(|c| c.is(&Namespace::DocBook, "title")))
            });
        if let Some(title) = title {
            let mut h = self.copy(title, "h");
            h.set_attr(page("outline-level"), level.clamp(1, 6));
            out.push(h);
        }
        self.children(elem, out);
    }

    fn link(&mut self, elem: &Element, href: Iri) -> Element {
        let mut a = self.copy(elem, "a");
        a.set_attr(xlink("href"), href);
        if a.children.is_empty()
            && let Some(text) = a.href().map(ToString::to_string)
        {
            a.push_text(&text);
        }
        a
    }

    fn list_items(&mut self, elem: &Element, mut list: Element) -> Element {
        for item in elem.child_elements().filter(|c| c.is(&Namespace::DocBook, "listitem")) {
            let item_body = self.copy(item, "list-item-body");
            list.push(Element::page("list-item").with_child(item_body));
        }
        list
    }

    fn variable_list(&mut self, elem: &Element) -> Element {
        let mut list = Element::page("list");
        for entry in elem.child_elements().filter(|c| c.is(&Namespace::DocBook, "varlistentry")) {
            let mut item = Element::page("list-item");
            let mut label = Element::page("list-item-label");
            for (n, term) in entry
                .child_elements()
                .filter(|c| c.is(&Namespace::DocBook, "term"))
                .enumerate()
            {
                if n > 0 {
                    label.push_text(", ");
                }
                self.children(term, &mut label);
            }
            item.push(label);
            let mut item_body = Element::page("list-item-body");
            for body in entry.child_elements().filter(|c| c.is(&Namespace::DocBook, "listitem")) {
                self.children(body, &mut item_body);
            }
            item.push(item_body);
            list.push(item);
        }
        list
    }

    fn qanda_set(&mut self, elem: &Element) -> Element {
        let numbered = attr(elem, "defaultlabel").as_deref() == Some("number");
        let mut list = Element::page("list");
        if numbered {
            list.set_attr(page("item-label-generate"), "ordered");
        }
        let entries = elem
            .descendants()
            .filter(|c| c.is(&Namespace::DocBook, "qandaentry"));
        for entry in entries {
            let question = entry.child_elements().find(|c| c.is(&Namespace::DocBook, "question"));
            let answers = entry.child_elements().filter(|c| c.is(&Namespace::DocBook, "answer"));
            if numbered {
                let mut item_body = Element::page("list-item-body");
                if let Some(question) = question {
                    self.children(question, &mut item_body);
                }
                for answer in answers {
                    self.children(answer, &mut item_body);
                }
                list.push(Element::page("list-item").with_child(item_body));
            } else {
                let parts = question.into_iter().map(|q| ("Q:", q)).chain(answers.map(|a| ("A:", a)));
                for (label, part) in parts {
                    let item_body = self.copy(part, "list-item-body");
                    list.push(
                        Element::page("list-item")
                            .with_child(Element::page("list-item-label").with_text(label))
                            .with_child(item_body),
                    );
                }
            }
        }
        list
    }

    fn media_object(&mut self, elem: &Element) -> Option<Element> {
        let image = elem
            .descendants()
            .find(|c| c.is(&Namespace::DocBook, "imagedata"))?;
        let href = attr(image, "fileref")
            .or_else(|| image.get(&Namespace::XLink, "href").map(|v| v.to_string()))?;
        let mut object = Element::page("object").with_attr(xlink("href"), Iri::parse(&href));
        let alt = elem
            .descendants()
            .find(|c| c.is(&Namespace::DocBook, "textobject") || c.is(&Namespace::DocBook, "alt"))
            .map(|t| t.text().trim().to_string())
            .filter(|t| !t.is_empty());
        if let Some(alt) = alt {
            object.set_attr(page("alt"), alt);
        }
        if let Some(format) = attr(image, "format") {
            object.set_attr(page("type"), format!("image/{}", format.to_lowercase()));
        }
        Some(object)
    }

    fn table(&mut self, elem: &Element) -> Element {
        let mut table = Element::page("table");
        let mut body = Element::page("table-body");
        for group in elem.child_elements() {
            if group.is(&Namespace::DocBook, "tgroup") {
                self.columns = column_numbers(group);
                for section in group.child_elements() {
                    self.table_section(section, &mut table, &mut body);
                }
            } else {
                self.table_section(group, &mut table, &mut body);
            }
        }
        table.push(body);
        table
    }

    fn table_section(&mut self, section: &Element, table: &mut Element, body: &mut Element) {
        let Some(local) = (section.name.ns == Namespace::DocBook).then(|| section.name.local.as_ref()) else {
            return;
        };
        match local {
            "thead" | "tfoot" => {
                let name = if local == "thead" { "table-header" } else { "table-footer" };
                let mut part = Element::page(name);
                for row in section.child_elements() {
                    part.push(self.table_row(row));
                }
                table.push(part);
            }
            "tbody" => {
                for row in section.child_elements() {
                    body.push(self.table_row(row));
                }
            }
            "row" | "tr" => body.push(self.table_row(section)),
            _ => {}
        }
    }

    fn table_row(&mut self, row: &Element) -> Element {
        let mut new = Element::page("table-row");
        for entry in row.child_elements() {
            let mut cell = self.copy(entry, "table-cell");
            let rows = attr(entry, "morerows")
                .and_then(|n| n.parse::<i64>().ok())
                .map(|n| n + 1)
                .or_else(|| attr(entry, "rowspan").and_then(|n| n.parse().ok()));
            if let Some(rows) = rows.filter(|n| *n > 1) {
                cell.set_attr(page("number-rows-spanned"), rows);
            }
            let columns = self.column_span(entry).or_else(|| attr(entry, "colspan").and_then(|n| n.parse().ok()));
            if let Some(columns) = columns.filter(|n| *n > 1) {
                cell.set_attr(page("number-columns-spanned"), columns);
            }
            new.push(cell);
        }
        new
    }

    fn column_span(&self, entry: &Element) -> Option<i64> {
        let start = self.columns.get(&attr(entry, "namest")?)?;
        let end = self.columns.get(&attr(entry, "nameend")?)?;
        Some(end - start + 1)
    }
}

fn attr_xml_id(elem: &Element) -> Option<String> {
    elem.get(&Namespace::Other(XML_URI.into()), "id")
        .map(|v| v.to_string())
}

fn column_numbers(group: &Element) -> HashMap<String, i64> {
    let mut columns = HashMap::new();
    let mut position = 0;
    for spec in group.child_elements().filter(|c| c.is(&Namespace::DocBook, "colspec")) {
        position = attr(spec, "colnum").and_then(|n| n.parse().ok()).unwrap_or(position + 1);
        if let Some(name) = attr(spec, "colname") {
            columns.insert(name, position);
        }
    }
    columns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::test_support::parse_body;

    fn parse(xml: &str) -> Element {
        parse_body(&DocBookParser, xml)
    }

    fn all<'e>(body: &'e Element, name: &str) -> Vec<&'e Element> {
        body.descendants().filter(|e| e.is_page(name)).collect()
    }

    #[test]
    fn test_recursive_sections() {
        let body = parse(
            "<article xmlns=\"http://docbook.org/ns/docbook\"><title>Doc</title>\
             <section><title>One</title><para>a</para>\
             <section><title>Two</title><para>b</para></section></section>\
             <sect3><title>Three</title></sect3></article>",
        );
        let headings: Vec<_> = all(&body, "h")
            .iter()
            .map(|h| (h.text(), h.page_int("outline-level").unwrap()))
            .collect();
        assert_eq!(
            headings,
            vec![("One".to_string(), 1), ("Two".to_string(), 2), ("Three".to_string(), 3)]
        );
        assert_eq!(all(&body, "p").len(), 2);
    }

    #[test]
    fn test_lists() {
        let body = parse(
            "<article><orderedlist numeration=\"upperroman\"><listitem><para>x</para></listitem></orderedlist>\
             <itemizedlist><listitem><para>y</para></listitem></itemizedlist>\
             <variablelist><varlistentry><term>t</term><listitem><para>d</para></listitem></varlistentry></variablelist></article>",
        );
        let lists = all(&body, "list");
        assert_eq!(lists[0].page_attr("list-style-type").as_deref(), Some("upper-roman"));
        assert_eq!(lists[1].page_attr("item-label-generate").as_deref(), Some("unordered"));
        assert_eq!(lists[2].find_page("list-item").unwrap().find_page("list-item-label").unwrap().text(), "t");
    }

    #[test]
    fn test_qandaset() {
        let qanda = "<qandaentry><question><para>Why?</para></question><answer><para>Because.</para></answer></qandaentry>";
        let body = parse(&format!("<article><qandaset defaultlabel=\"qanda\">{qanda}</qandaset></article>"));
        let labels: Vec<_> = all(&body, "list-item-label").iter().map(|l| l.text()).collect();
        assert_eq!(labels, vec!["Q:", "A:"]);

        let body = parse(&format!("<article><qandaset defaultlabel=\"number\">{qanda}</qandaset></article>"));
        let list = body.find_page("list").unwrap();
        assert_eq!(list.page_attr("item-label-generate").as_deref(), Some("ordered"));
        assert_eq!(all(list, "list-item").len(), 1);
    }

    #[test]
    fn test_inline_elements() {
        let body = parse(
            "<article><para><emphasis role=\"bold\">b</emphasis> <emphasis>i</emphasis> \
             <literal>x</literal> <ulink url=\"http://moinmo.in/\">Moin</ulink> \
             <trademark class=\"copyright\">Moin</trademark><superscript>2</superscript>\
             <footnote><para>note</para></footnote></para></article>",
        );
        let p = body.find_page("p").unwrap();
        assert_eq!(p.find_page("strong").unwrap().text(), "b");
        assert_eq!(p.find_page("emphasis").unwrap().text(), "i");
        assert_eq!(p.find_page("code").unwrap().text(), "x");
        assert_eq!(p.find_page("a").unwrap().href().unwrap().to_string(), "http://moinmo.in/");
        assert!(p.text().contains("Moin\u{a9}"));
        assert_eq!(p.find_page("span").unwrap().page_attr("baseline-shift").as_deref(), Some("super"));
        assert_eq!(p.find_page("note").unwrap().text(), "note");
    }

    #[test]
    fn test_table_spans() {
        let body = parse(
            "<article><informaltable><tgroup cols=\"3\">\
             <colspec colname=\"c1\"/><colspec colname=\"c2\"/><colspec colname=\"c3\"/>\
             <thead><row><entry>h</entry></row></thead>\
             <tbody><row><entry namest=\"c1\" nameend=\"c2\">wide</entry><entry morerows=\"1\">tall</entry></row></tbody>\
             </tgroup></informaltable></article>",
        );
        assert_eq!(body.find_page("table").unwrap().find_page("table-header").unwrap().text(), "h");
        let cells = all(&body, "table-cell");
        assert_eq!(cells[1].page_int("number-columns-spanned"), Some(2));
        assert_eq!(cells[2].page_int("number-rows-spanned"), Some(2));
    }

    #[test]
    fn test_admonition_and_media() {
        let body = parse(
            "<article><warning><para>hot</para></warning>\
             <mediaobject><imageobject><imagedata fileref=\"pic.png\" format=\"PNG\"/></imageobject>\
             <textobject><phrase>A pic</phrase></textobject></mediaobject>\
             <programlisting>fn main() {}</programlisting></article>",
        );
        assert_eq!(body.find_page("admonition").unwrap().page_attr("type").as_deref(), Some("warning"));
        let object = body.find_page("object").unwrap();
        assert_eq!(object.href().unwrap().to_string(), "pic.png");
        assert_eq!(object.page_attr("alt").as_deref(), Some("A pic"));
        assert_eq!(object.page_attr("type").as_deref(), Some("image/png"));
        assert_eq!(body.find_page("blockcode").unwrap().text(), "fn main() {}");
    }

    #[test]
    fn test_malformed_xml_is_marked() {
        let body = parse("<article><para>x</article>");
        assert!(body.find_page("error").is_some());
    }
}
