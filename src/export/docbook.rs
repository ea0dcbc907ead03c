//! DocBook 5 emitter.
//!
//! The document is rebuilt as a DocBook-namespace [`Element`] tree and
//! serialized with [`write_tree`]. Headings open nested `section`s: a
//! heading closes every open section of the same or a deeper level first.

use crate::error::Result;
use crate::registry::{ConvertContext, Converter, Payload};
use crate::transform::macros::macro_name;
use crate::tree::{Element, Namespace, Node, QName, write_tree, xlink};

/// Emitter for `application/docbook+xml`.
pub struct DocBookExporter;

impl Converter for DocBookExporter {
    fn convert(&self, input: Payload, ctx: &ConvertContext<'_>) -> Result<Payload> {
        let tree = input.into_tree()?;
        let mut article = db("article").with_attr(db_name("version"), "5.0");
        if let Some(name) = ctx.options.page_name().filter(|n| !n.is_empty()) {
            article.push(db("info").with_child(db("title").with_text(name)));
        }
        let mut writer = DocBookWriter {
            sections: vec![(0, article)],
        };
        writer.top_level(&tree);
        let article = writer.finish();
        Ok(Payload::Text(format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}\n",
            write_tree(&article)
        )))
    }
}

fn db(local: &'static str) -> Element {
    Namespace::DocBook.element(local)
}

fn db_name(local: &'static str) -> QName {
    Namespace::DocBook.name(local)
}

/// Open sections, outermost (the article, level 0) first.
struct DocBookWriter {
    sections: Vec<(i64, Element)>,
}

impl DocBookWriter {
    fn top(&mut self) -> &mut Element {
        let last = self.sections.len() - 1;
        &mut self.sections[last].1
    }

    fn close_to(&mut self, level: i64) {
        while self.sections.len() > 1 && self.sections[self.sections.len() - 1].0 >= level {
            if let Some((_, section)) = self.sections.pop() {
                self.top().push(section);
            }
        }
    }

    fn finish(mut self) -> Element {
        self.close_to(1);
        self.sections.pop().map(|(_, article)| article).unwrap_or_else(|| db("article"))
    }

    /// Walk page and body wrappers; headings found here open sections.
    fn top_level(&mut self, elem: &Element) {
        if !(elem.is_page("page") || elem.is_page("body")) {
            let mut out = Vec::new();
            block(elem, &mut out);
            for node in out {
                self.top().push(node);
            }
            return;
        }
        let mut run: Vec<Node> = Vec::new();
        for child in &elem.children {
            match child {
                Node::Element(e) if e.is_page("page") || e.is_page("body") => {
                    flush_para(&mut run, self.top());
                    self.top_level(e);
                }
                Node::Element(e) if e.is_page("h") => {
                    flush_para(&mut run, self.top());
                    let level = e.page_int("outline-level").unwrap_or(1).max(1);
                    self.close_to(level);
                    let mut title = db("title");
                    inlines(&e.children, &mut title);
                    self.sections.push((level, db("section").with_child(title)));
                }
                Node::Element(e) if is_block(e) => {
                    flush_para(&mut run, self.top());
                    let mut out = Vec::new();
                    block(e, &mut out);
                    for node in out {
                        self.top().push(node);
                    }
                }
                Node::Text(t) if t.trim().is_empty() && run.is_empty() => {}
                other => inline(other, &mut run),
            }
        }
        flush_para(&mut run, self.top());
    }
}

/// Wrap loose inline content in a `para`.
fn flush_para(run: &mut Vec<Node>, out: &mut Element) {
    let blank = run.iter().all(|n| n.as_text().is_some_and(|t| t.trim().is_empty()));
    if !blank {
        out.push(db("para").with_children(run.drain(..)));
    }
    run.clear();
}

fn is_block(elem: &Element) -> bool {
    if elem.is(&Namespace::XInclude, "include") {
        return true;
    }
    matches!(
        elem.page_local(),
        Some(
            "page"
                | "body"
                | "h"
                | "p"
                | "separator"
                | "blockcode"
                | "list"
                | "table"
                | "table-of-content"
                | "part"
                | "blockquote"
                | "div"
                | "admonition"
        )
    )
}

/// Block content of `elem`, loose inline runs wrapped in paragraphs.
fn blocks(elem: &Element, out: &mut Vec<Node>) {
    let mut run: Vec<Node> = Vec::new();
    for child in &elem.children {
        match child {
            Node::Element(e) if is_block(e) => {
                let mut para = db("para");
                flush_para(&mut run, &mut para);
                out.extend(para.children);
                block(e, out);
            }
            Node::Element(e) if e.is_page("arguments") => {}
            other => inline(other, &mut run),
        }
    }
    let mut para = db("para");
    flush_para(&mut run, &mut para);
    out.extend(para.children);
}

fn block(elem: &Element, out: &mut Vec<Node>) {
    if elem.is(&Namespace::XInclude, "include") {
        let mut include = Element::new(elem.name.clone());
        include.attrs = elem.attrs.clone();
        out.push(include.into());
        return;
    }
    match elem.page_local() {
        Some("page" | "body" | "div") => blocks(elem, out),
        Some("h") => {
            let level = elem.page_int("outline-level").unwrap_or(1).clamp(1, 5);
            let mut bridge = db("bridgehead").with_attr(db_name("renderas"), format!("sect{level}"));
            inlines(&elem.children, &mut bridge);
            out.push(bridge.into());
        }
        Some("p") => {
            let mut para = db("para");
            inlines(&elem.children, &mut para);
            if !para.is_empty() {
                out.push(para.into());
            }
        }
        Some("separator") => log::debug!("DocBook has no separator; dropped"),
        Some("blockcode") => out.push(db("programlisting").with_text(elem.text()).into()),
        Some("list") => out.push(list(elem).into()),
        Some("table") => out.push(table(elem).into()),
        Some("table-of-content") => out.push(db("toc").into()),
        Some("part") => {
            if macro_name(elem).is_some() {
                let alt = elem.page_attr("alt").unwrap_or_default();
                out.push(db("remark").with_text(alt).into());
            } else if let Some(body) = elem.find_page("body") {
                blocks(body, out);
            } else {
                let alt = elem.page_attr("alt").unwrap_or_default();
                out.push(db("programlisting").with_text(alt).into());
            }
        }
        Some("blockquote") => {
            let mut quote = db("blockquote");
            let mut children = Vec::new();
            blocks(elem, &mut children);
            quote.children = children;
            out.push(quote.into());
        }
        Some("admonition") => {
            let kind = match elem.page_attr("type").as_deref() {
                Some("caution") => "caution",
                Some("important") => "important",
                Some("tip") => "tip",
                Some("warning") => "warning",
                _ => "note",
            };
            let mut admonition = db(kind);
            let mut children = Vec::new();
            blocks(elem, &mut children);
            admonition.children = children;
            out.push(admonition.into());
        }
        _ => {
            let mut para = db("para");
            inline_element(elem, &mut para.children);
            if !para.is_empty() {
                out.push(para.into());
            }
        }
    }
}

/// `listitem` content must be block level.
fn list_item_content(body: &Element) -> Element {
    let mut item = db("listitem");
    let mut children = Vec::new();
    blocks(body, &mut children);
    if children.is_empty() {
        children.push(db("para").into());
    }
    item.children = children;
    item
}

fn list(elem: &Element) -> Element {
    let items = elem.child_elements().filter(|e| e.is_page("list-item"));
    match elem.page_attr("item-label-generate").as_deref() {
        Some(generate) => {
            let mut list = if generate == "ordered" {
                let mut list = db("orderedlist");
                let numeration = match elem.page_attr("list-style-type").as_deref() {
                    Some("lower-alpha") => Some("loweralpha"),
                    Some("upper-alpha") => Some("upperalpha"),
                    Some("lower-roman") => Some("lowerroman"),
                    Some("upper-roman") => Some("upperroman"),
                    _ => None,
                };
                if let Some(numeration) = numeration {
                    list.set_attr(db_name("numeration"), numeration);
                }
                list
            } else {
                db("itemizedlist")
            };
            for item in items {
                let body = item.find_page("list-item-body").cloned().unwrap_or_else(|| Element::page("list-item-body"));
                list.push(list_item_content(&body));
            }
            list
        }
        None => {
            let mut list = db("variablelist");
            for item in items {
                let mut entry = db("varlistentry");
                let mut term = db("term");
                if let Some(label) = item.find_page("list-item-label") {
                    inlines(&label.children, &mut term);
                }
                entry.push(term);
                let body = item.find_page("list-item-body").cloned().unwrap_or_else(|| Element::page("list-item-body"));
                entry.push(list_item_content(&body));
                list.push(entry);
            }
            list
        }
    }
}

fn table(elem: &Element) -> Element {
    let mut table = db("informaltable");
    let mut body = db("tbody");
    for child in elem.child_elements() {
        match child.page_local() {
            Some("table-header") => table.push(rows(child, db("thead"))),
            Some("table-footer") => table.push(rows(child, db("tfoot"))),
            Some("table-body") => {
                for row in child.child_elements().filter(|e| e.is_page("table-row")) {
                    body.push(row_element(row));
                }
            }
            Some("table-row") => body.push(row_element(child)),
            _ => {}
        }
    }
    table.push(body);
    table
}

fn rows(group: &Element, mut out: Element) -> Element {
    for row in group.child_elements().filter(|e| e.is_page("table-row")) {
        out.push(row_element(row));
    }
    out
}

fn row_element(row: &Element) -> Element {
    let mut tr = db("tr");
    for cell in row.child_elements().filter(|e| e.is_page("table-cell")) {
        let mut td = db("td");
        if let Some(n) = cell.page_int("number-rows-spanned").filter(|n| *n > 1) {
            td.set_attr(db_name("rowspan"), n);
        }
        if let Some(n) = cell.page_int("number-columns-spanned").filter(|n| *n > 1) {
            td.set_attr(db_name("colspan"), n);
        }
        let has_blocks = cell.child_elements().any(is_block);
        if has_blocks {
            let mut children = Vec::new();
            blocks(cell, &mut children);
            td.children = children;
        } else {
            inlines(&cell.children, &mut td);
        }
        tr.push(td);
    }
    tr
}

fn inlines(nodes: &[Node], out: &mut Element) {
    for node in nodes {
        inline(node, &mut out.children);
    }
}

fn inline(node: &Node, out: &mut Vec<Node>) {
    match node {
        Node::Text(text) => match out.last_mut() {
            Some(Node::Text(prev)) => prev.push_str(text),
            _ => out.push(Node::Text(text.clone())),
        },
        Node::Element(e) => inline_element(e, out),
    }
}

fn wrap(elem: &Element, mut target: Element, out: &mut Vec<Node>) {
    inlines(&elem.children, &mut target);
    out.push(target.into());
}

fn inline_element(elem: &Element, out: &mut Vec<Node>) {
    if elem.name.ns != Namespace::Page {
        for child in &elem.children {
            inline(child, out);
        }
        return;
    }
    match elem.name.local.as_ref() {
        "emphasis" => wrap(elem, db("emphasis"), out),
        "strong" => wrap(elem, db("emphasis").with_attr(db_name("role"), "strong"), out),
        "code" => out.push(db("literal").with_text(elem.text()).into()),
        "span" => {
            let target = match (
                elem.page_attr("baseline-shift").as_deref(),
                elem.page_attr("text-decoration").as_deref(),
            ) {
                (Some("super"), _) => Some(db("superscript")),
                (Some("sub"), _) => Some(db("subscript")),
                (_, Some("underline")) => Some(db("emphasis").with_attr(db_name("role"), "underline")),
                (_, Some("line-through")) => Some(db("emphasis").with_attr(db_name("role"), "strikethrough")),
                _ => None,
            };
            match target {
                Some(target) => wrap(elem, target, out),
                None => {
                    for child in &elem.children {
                        inline(child, out);
                    }
                }
            }
        }
        "a" => {
            let mut link = db("link");
            if let Some(href) = elem.href() {
                link.set_attr(xlink("href"), href.clone());
            }
            wrap(elem, link, out);
        }
        "object" => {
            let mut data = db("imagedata");
            if let Some(href) = elem.href() {
                data.set_attr(db_name("fileref"), href.to_string());
            }
            let mut media = db("inlinemediaobject").with_child(db("imageobject").with_child(data));
            if let Some(alt) = elem.page_attr("alt") {
                media.push(db("textobject").with_child(db("phrase").with_text(alt)));
            }
            out.push(media.into());
        }
        "line-break" => inline(&Node::Text("\n".to_string()), out),
        "note" => {
            let mut footnote = db("footnote");
            if let Some(body) = elem.find_page("note-body") {
                let mut children = Vec::new();
                blocks(body, &mut children);
                footnote.children = children;
            }
            out.push(footnote.into());
        }
        "inline-part" => {
            if macro_name(elem).is_some() {
                let alt = elem.page_attr("alt").unwrap_or_default();
                out.push(db("remark").with_text(alt).into());
            } else {
                for child in elem.child_elements().filter(|e| !e.is_page("arguments")) {
                    inline_element(child, out);
                }
            }
        }
        "error" | "arguments" => log::debug!("dropping {} from DocBook output", elem.name),
        "p" | "page" | "body" | "div" | "list-item-body" | "table-cell" | "note-body" | "list-item-label" => {
            for child in &elem.children {
                inline(child, out);
            }
        }
        other => {
            log::warn!("unknown element {other} in DocBook output");
            for child in &elem.children {
                inline(child, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;
    use crate::iri::Iri;
    use crate::pipeline::{ConvertOptions, default_registry};
    use crate::tree::page;

    fn emit_with(tree: Element, options: &ConvertOptions) -> String {
        let registry = default_registry();
        let host = MemoryHost::new();
        let ctx = ConvertContext {
            registry: &registry,
            host: &host,
            options,
        };
        DocBookExporter
            .convert(Payload::Tree(tree), &ctx)
            .unwrap()
            .into_text()
            .unwrap()
    }

    fn emit(children: Vec<Element>) -> String {
        let tree = Element::page("page").with_child(Element::page("body").with_children(children));
        emit_with(tree, &ConvertOptions::default())
    }

    fn heading(level: i64, text: &str) -> Element {
        Element::page("h")
            .with_attr(page("outline-level"), level)
            .with_text(text)
    }

    #[test]
    fn test_sections_nest_by_level() {
        let out = emit(vec![
            heading(1, "One"),
            Element::page("p").with_text("a"),
            heading(2, "Two"),
            Element::page("p").with_text("b"),
            heading(1, "Three"),
        ]);
        assert!(out.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<article xmlns=\"http://docbook.org/ns/docbook\""));
        assert!(out.contains(
            "<section><title>One</title><para>a</para><section><title>Two</title><para>b</para></section></section><section><title>Three</title></section>"
        ));
    }

    #[test]
    fn test_page_name_becomes_title() {
        let tree = Element::page("page").with_child(Element::page("body"));
        let out = emit_with(tree, &ConvertOptions::new().with_page("FrontPage"));
        assert!(out.contains("<info><title>FrontPage</title></info>"));
    }

    #[test]
    fn test_inline_elements() {
        let para = Element::page("p")
            .with_child(Element::page("strong").with_text("s"))
            .with_child(Element::page("emphasis").with_text("e"))
            .with_child(Element::page("code").with_text("c"))
            .with_child(Element::page("span").with_attr(page("baseline-shift"), "super").with_text("2"))
            .with_child(
                Element::page("a")
                    .with_attr(xlink("href"), Iri::parse("http://example.org/"))
                    .with_text("site"),
            );
        let out = emit(vec![para]);
        assert!(out.contains(
            "<para><emphasis role=\"strong\">s</emphasis><emphasis>e</emphasis><literal>c</literal><superscript>2</superscript><link xlink:href=\"http://example.org/\">site</link></para>"
        ));
        assert!(out.contains("xmlns:xlink=\"http://www.w3.org/1999/xlink\""));
    }

    #[test]
    fn test_lists() {
        let item = |text: &str| {
            Element::page("list-item").with_child(Element::page("list-item-body").with_text(text))
        };
        let ordered = Element::page("list")
            .with_attr(page("item-label-generate"), "ordered")
            .with_attr(page("list-style-type"), "upper-roman")
            .with_child(item("A"));
        let definitions = Element::page("list").with_child(
            Element::page("list-item")
                .with_child(Element::page("list-item-label").with_text("term"))
                .with_child(Element::page("list-item-body").with_text("text")),
        );
        let out = emit(vec![ordered, definitions]);
        assert!(out.contains("<orderedlist numeration=\"upperroman\"><listitem><para>A</para></listitem></orderedlist>"));
        assert!(out.contains(
            "<variablelist><varlistentry><term>term</term><listitem><para>text</para></listitem></varlistentry></variablelist>"
        ));
    }

    #[test]
    fn test_table_spans() {
        let cell = |text: &str| Element::page("table-cell").with_text(text);
        let table = Element::page("table")
            .with_child(Element::page("table-header").with_child(Element::page("table-row").with_child(cell("H"))))
            .with_child(
                Element::page("table-body").with_child(
                    Element::page("table-row")
                        .with_child(cell("A").with_attr(page("number-columns-spanned"), 2))
                        .with_child(cell("B").with_attr(page("number-rows-spanned"), 3)),
                ),
            );
        let out = emit(vec![table]);
        assert!(out.contains(
            "<informaltable><thead><tr><td>H</td></tr></thead><tbody><tr><td colspan=\"2\">A</td><td rowspan=\"3\">B</td></tr></tbody></informaltable>"
        ));
    }

    #[test]
    fn test_blockcode_and_footnote() {
        let note = Element::page("note")
            .with_attr(page("note-class"), "footnote")
            .with_child(Element::page("note-body").with_text("n"));
        let out = emit(vec![
            Element::page("blockcode").with_text("a < b"),
            Element::page("p").with_text("x").with_child(note),
        ]);
        assert!(out.contains("<programlisting>a &lt; b</programlisting>"));
        assert!(out.contains("<para>x<footnote><para>n</para></footnote></para>"));
    }
}
