//! HTML parser.
//!
//! html5ever builds a forgiving DOM; the recognized tags are then mapped to
//! the page vocabulary. Anything else survives as an element in the `html`
//! namespace, so the HTML emitter can write it back unchanged.

use super::page_with_body;
use super::sink::{DomData, Handle, parse_html};
use crate::error::Result;
use crate::iri::Iri;
use crate::registry::{ConvertContext, Converter, Payload};
use crate::tree::{Element, html, page, xlink};

/// Parser for `text/html`, `application/xhtml+xml` and `text/x.moin.xhtml`.
pub struct HtmlParser;

impl Converter for HtmlParser {
    fn convert(&self, input: Payload, ctx: &ConvertContext<'_>) -> Result<Payload> {
        let text = input.into_text()?;
        let document = parse_html(&text);
        let mut body = Element::page("body");
        if let Some(html_body) = document.find("body") {
            children(&html_body, &mut body);
        }
        Ok(Payload::Tree(page_with_body(ctx.options.page_href.as_ref(), body)))
    }
}

/// Containers whose whitespace-only text is layout.
const BLOCK_CONTAINERS: &[&str] = &[
    "body", "div", "blockquote", "ul", "ol", "dl", "table", "thead", "tbody", "tfoot", "tr",
];

/// Tags dropped together with their content.
const DROPPED: &[&str] = &["script", "style", "head", "title", "meta", "link", "template"];

/// Attributes kept in the `html` namespace on mapped elements.
const PASSTHROUGH_ATTRS: &[&str] = &["id", "class", "style", "title", "lang", "dir"];

fn children(node: &Handle, out: &mut Element) {
    let block = node.local_name().is_some_and(|n| BLOCK_CONTAINERS.contains(&n));
    for child in node.children.borrow().iter() {
        match &child.data {
            DomData::Text(text) => {
                let text = text.borrow();
                if !(block && text.trim().is_empty()) {
                    out.push_text(&text);
                }
            }
            DomData::Element { .. } => visit(child, out),
            DomData::Document | DomData::Comment => {}
        }
    }
}

/// `local` with the converted children of `node` and its passthrough attributes.
fn copy(node: &Handle, local: &'static str) -> Element {
    let mut elem = Element::page(local);
    passthrough_attrs(node, &mut elem);
    children(node, &mut elem);
    elem
}

fn passthrough_attrs(node: &Handle, elem: &mut Element) {
    for key in PASSTHROUGH_ATTRS {
        if let Some(value) = node.attr(key) {
            elem.set_attr(html(*key), value);
        }
    }
}

fn span(node: &Handle, key: &'static str, value: &str) -> Element {
    let mut elem = copy(node, "span");
    elem.set_attr(page(key), value);
    elem
}

fn visit(node: &Handle, out: &mut Element) {
    let Some(local) = node.local_name() else {
        return;
    };
    if DROPPED.contains(&local) {
        return;
    }
    if let Some(level) = local
        .strip_prefix('h')
        .and_then(|n| n.parse::<i64>().ok())
        .filter(|n| (1..=6).contains(n))
    {
        let mut h = copy(node, "h");
        h.set_attr(page("outline-level"), level);
        out.push(h);
        return;
    }
    match local {
        "p" => out.push(copy(node, "p")),
        "div" => out.push(copy(node, "div")),
        "br" => out.push(Element::page("line-break")),
        "hr" => out.push(Element::page("separator")),
        "b" | "strong" => out.push(copy(node, "strong")),
        "i" | "em" | "cite" | "dfn" | "var" => out.push(copy(node, "emphasis")),
        "u" | "ins" => out.push(span(node, "text-decoration", "underline")),
        "s" | "strike" | "del" => out.push(span(node, "text-decoration", "line-through")),
        "sub" => out.push(span(node, "baseline-shift", "sub")),
        "sup" => out.push(span(node, "baseline-shift", "super")),
        "big" => out.push(span(node, "font-size", "120%")),
        "small" => out.push(span(node, "font-size", "85%")),
        "span" => out.push(copy(node, "span")),
        "code" | "tt" | "kbd" | "samp" => out.push(Element::page("code").with_text(node.text())),
        "pre" => out.push(Element::page("blockcode").with_text(node.text())),
        "blockquote" => out.push(copy(node, "blockquote")),
        "a" => out.push(anchor(node)),
        "img" => out.push(image(node)),
        "ul" => {
            let mut list = list_items(node);
            list.set_attr(page("item-label-generate"), "unordered");
            out.push(list);
        }
        "ol" => {
            let mut list = list_items(node);
            list.set_attr(page("item-label-generate"), "ordered");
            let style = match node.attr("type").as_deref() {
                Some("a") => Some("lower-alpha"),
                Some("A") => Some("upper-alpha"),
                Some("i") => Some("lower-roman"),
                Some("I") => Some("upper-roman"),
                _ => None,
            };
            if let Some(style) = style {
                list.set_attr(page("list-style-type"), style);
            }
            out.push(list);
        }
        "dl" => out.push(definition_list(node)),
        "table" => out.push(table(node)),
        "html" | "body" | "main" | "article" | "section" | "font" | "center" => children(node, out),
        _ => out.push(raw(node, local)),
    }
}

/// An element kept in the `html` namespace with all its attributes.
fn raw(node: &Handle, local: &str) -> Element {
    let mut elem = Element::new(html(local.to_string()));
    if let DomData::Element { attrs, .. } = &node.data {
        for attr in attrs.borrow().iter() {
            elem.set_attr(html(attr.name.local.to_string()), attr.value.to_string());
        }
    }
    children(node, &mut elem);
    elem
}

fn anchor(node: &Handle) -> Element {
    match node.attr("href") {
        Some(href) => {
            let mut a = copy(node, "a");
            a.set_attr(xlink("href"), Iri::parse(&href));
            if let Some(target) = node.attr("target") {
                a.set_attr(xlink("target"), target);
            }
            a
        }
        None => {
            let mut span = copy(node, "span");
            if let Some(name) = node.attr("name").filter(|_| node.attr("id").is_none()) {
                span.set_attr(html("id"), name);
            }
            span
        }
    }
}

fn image(node: &Handle) -> Element {
    let mut object = Element::page("object");
    if let Some(src) = node.attr("src") {
        object.set_attr(xlink("href"), Iri::parse(&src));
    }
    if let Some(alt) = node.attr("alt") {
        object.set_attr(page("alt"), alt);
    }
    for key in ["width", "height"] {
        if let Some(value) = node.attr(key) {
            object.set_attr(html(key), value);
        }
    }
    object
}

fn list_items(node: &Handle) -> Element {
    let mut list = Element::page("list");
    passthrough_attrs(node, &mut list);
    for child in node.children.borrow().iter() {
        match child.local_name() {
            Some("li") => {
                let item_body = copy(child, "list-item-body");
                list.push(Element::page("list-item").with_child(item_body));
            }
            Some(_) => {
                // Stray content between items becomes an item of its own.
                let mut item_body = Element::page("list-item-body");
                visit(child, &mut item_body);
                list.push(Element::page("list-item").with_child(item_body));
            }
            None => {}
        }
    }
    list
}

fn definition_list(node: &Handle) -> Element {
    let mut list = Element::page("list");
    let mut item: Option<Element> = None;
    for child in node.children.borrow().iter() {
        match child.local_name() {
            Some("dt") => {
                if let Some(done) = item.take() {
                    list.push(done);
                }
                item = Some(Element::page("list-item").with_child(copy(child, "list-item-label")));
            }
            Some("dd") => {
                let mut current = item.take().unwrap_or_else(|| Element::page("list-item"));
                current.push(copy(child, "list-item-body"));
                list.push(current);
            }
            _ => {}
        }
    }
    if let Some(done) = item {
        list.push(done.with_child(Element::page("list-item-body")));
    }
    list
}

fn table(node: &Handle) -> Element {
    let mut table = Element::page("table");
    passthrough_attrs(node, &mut table);
    let mut body = Element::page("table-body");
    for section in node.children.borrow().iter() {
        match section.local_name() {
            Some("thead") => table.push(rows(section, "table-header")),
            Some("tfoot") => table.push(rows(section, "table-footer")),
            Some("tbody") => {
                for row in rows(section, "table-body").children {
                    body.push(row);
                }
            }
            Some("tr") => body.push(row(section)),
            _ => {}
        }
    }
    table.push(body);
    table
}

fn rows(section: &Handle, local: &'static str) -> Element {
    let mut elem = Element::page(local);
    for child in section.children.borrow().iter() {
        if child.local_name() == Some("tr") {
            elem.push(row(child));
        }
    }
    elem
}

fn row(tr: &Handle) -> Element {
    let mut row = Element::page("table-row");
    passthrough_attrs(tr, &mut row);
    for cell in tr.children.borrow().iter() {
        if !matches!(cell.local_name(), Some("td" | "th")) {
            continue;
        }
        let mut elem = copy(cell, "table-cell");
        for (attr, key) in [("colspan", "number-columns-spanned"), ("rowspan", "number-rows-spanned")] {
            if let Some(span) = cell.attr(attr).and_then(|n| n.trim().parse::<i64>().ok()).filter(|n| *n > 1) {
                elem.set_attr(page(key), span);
            }
        }
        row.push(elem);
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::test_support::parse_body;
    use crate::tree::Namespace;

    fn parse(text: &str) -> Element {
        parse_body(&HtmlParser, text)
    }

    #[test]
    fn test_blocks_and_inline() {
        let body = parse("<h2>Title</h2>\n<p><b>bold</b> <i>it</i> <u>under</u> H<sub>2</sub>O<br>x</p><hr><pre>a < b</pre>");
        let h = body.find_page("h").unwrap();
        assert_eq!(h.page_int("outline-level"), Some(2));
        let p = body.find_page("p").unwrap();
        assert_eq!(p.find_page("strong").unwrap().text(), "bold");
        assert_eq!(p.find_page("emphasis").unwrap().text(), "it");
        let spans: Vec<_> = p.child_elements().filter(|e| e.is_page("span")).collect();
        assert_eq!(spans[0].page_attr("text-decoration").as_deref(), Some("underline"));
        assert_eq!(spans[1].page_attr("baseline-shift").as_deref(), Some("sub"));
        assert!(p.find_page("line-break").is_some());
        assert!(body.find_page("separator").is_some());
        assert_eq!(body.find_page("blockcode").unwrap().text(), "a < b");
    }

    #[test]
    fn test_links_and_images() {
        let body = parse(r#"<p><a href="http://moinmo.in/" class="ext">Moin</a><img src="x.png" alt="X"></p>"#);
        let p = body.find_page("p").unwrap();
        let a = p.find_page("a").unwrap();
        assert_eq!(a.href().unwrap().to_string(), "http://moinmo.in/");
        assert_eq!(a.attr(&html("class")).unwrap().to_string(), "ext");
        let object = p.find_page("object").unwrap();
        assert_eq!(object.page_attr("alt").as_deref(), Some("X"));
    }

    #[test]
    fn test_lists() {
        let body = parse("<ol type=\"i\"><li>one</li><li>two</li></ol><dl><dt>term</dt><dd>def</dd></dl>");
        let lists: Vec<_> = body.child_elements().collect();
        assert_eq!(lists[0].page_attr("list-style-type").as_deref(), Some("lower-roman"));
        assert_eq!(lists[0].child_elements().count(), 2);
        let item = lists[1].find_page("list-item").unwrap();
        assert_eq!(item.find_page("list-item-label").unwrap().text(), "term");
        assert_eq!(item.find_page("list-item-body").unwrap().text(), "def");
    }

    #[test]
    fn test_table() {
        let body = parse(
            "<table><thead><tr><th>h</th></tr></thead><tr><td colspan=\"2\">a</td><td rowspan=\"3\">b</td></tr></table>",
        );
        let table = body.find_page("table").unwrap();
        assert_eq!(table.find_page("table-header").unwrap().text(), "h");
        let row = table.find_page("table-body").unwrap().find_page("table-row").unwrap();
        let cells: Vec<_> = row.child_elements().collect();
        assert_eq!(cells[0].page_int("number-columns-spanned"), Some(2));
        assert_eq!(cells[1].page_int("number-rows-spanned"), Some(3));
    }

    #[test]
    fn test_unknown_tags_pass_through() {
        let body = parse(r#"<p><abbr title="HyperText">HTML</abbr></p><script>alert(1)</script>"#);
        let p = body.find_page("p").unwrap();
        let abbr = p.child_elements().next().unwrap();
        assert_eq!(abbr.name.ns, Namespace::Html);
        assert_eq!(abbr.name.local, "abbr");
        assert_eq!(abbr.text(), "HTML");
        assert!(!body.text().contains("alert"));
    }
}
