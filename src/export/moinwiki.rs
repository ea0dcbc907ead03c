//! Moin wiki emitter.
//!
//! Block output is assembled as a list of chunks, each ending in a newline;
//! top-level chunks are separated by one blank line. Inside list items and
//! table cells everything has to stay on one line, so paragraphs there are
//! joined with `<<BR>>` and embedded newlines become spaces.

use crate::args::{Arg, ArgParser, Arguments};
use crate::error::Result;
use crate::iri::Iri;
use crate::mime::Type;
use crate::registry::{ConvertContext, Converter, Payload};
use crate::transform::include::{SortOrder, XPointer};
use crate::transform::macros::{element_arguments, macro_name};
use crate::tree::{Element, Namespace, Node};
use crate::util::calculate_fence_length;

/// Emitter for `text/x.moin.wiki`.
pub struct MoinWikiExporter;

impl Converter for MoinWikiExporter {
    fn convert(&self, input: Payload, _ctx: &ConvertContext<'_>) -> Result<Payload> {
        let tree = input.into_tree()?;
        let mut chunks = Vec::new();
        if is_block(&tree) || tree.is_page("page") || tree.is_page("body") {
            block(&tree, &mut chunks);
        } else {
            chunks.push(inline_element(&tree));
        }
        Ok(Payload::Text(chunks.join("\n")))
    }
}

/// Elements that start a block of their own.
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

fn block(elem: &Element, chunks: &mut Vec<String>) {
    if elem.is(&Namespace::XInclude, "include") {
        chunks.push(format!("{}\n", include_macro(elem)));
        return;
    }
    match elem.page_local() {
        Some("page" | "body" | "blockquote" | "div") => container(elem, chunks),
        Some("h") => {
            let level = elem.page_int("outline-level").unwrap_or(1).clamp(1, 6) as usize;
            let marks = "=".repeat(level);
            chunks.push(format!("{marks} {} {marks}\n", one_line(&inlines(&elem.children))));
        }
        Some("p") => push_text_chunk(&inlines(&elem.children), chunks),
        Some("separator") => chunks.push("----\n".to_string()),
        Some("blockcode") => chunks.push(fenced(None, &elem.text())),
        Some("list") => chunks.push(list(elem, 1)),
        Some("table") => chunks.push(table(elem)),
        Some("table-of-content") => match elem.page_int("outline-level") {
            Some(level) => chunks.push(format!("<<TableOfContents({level})>>\n")),
            None => chunks.push("<<TableOfContents>>\n".to_string()),
        },
        Some("part") => part(elem, chunks),
        Some("admonition") => {
            let mut inner = Vec::new();
            container(elem, &mut inner);
            let kind = elem.page_attr("type").unwrap_or_else(|| "note".to_string());
            chunks.push(fenced(Some(&format!("#!wiki {kind}")), inner.join("\n").trim_end()));
        }
        _ => push_text_chunk(&inline_element(elem), chunks),
    }
}

/// Children of a block container; runs of inline nodes become paragraphs.
fn container(elem: &Element, chunks: &mut Vec<String>) {
    let mut run: Vec<&Node> = Vec::new();
    for child in &elem.children {
        match child {
            Node::Element(e) if is_block(e) => {
                flush_run(&mut run, chunks);
                block(e, chunks);
            }
            Node::Element(e) if e.is_page("arguments") => {}
            other => run.push(other),
        }
    }
    flush_run(&mut run, chunks);
}

fn flush_run(run: &mut Vec<&Node>, chunks: &mut Vec<String>) {
    if run.is_empty() {
        return;
    }
    let text: String = run.drain(..).map(inline).collect();
    push_text_chunk(&text, chunks);
}

fn push_text_chunk(text: &str, chunks: &mut Vec<String>) {
    let text = text.trim_matches('\n');
    if text.trim().is_empty() {
        return;
    }
    chunks.push(format!("{text}\n"));
}

/// `{{{`-fenced block, long enough to hold `content`.
fn fenced(directive: Option<&str>, content: &str) -> String {
    let n = calculate_fence_length(content, '}');
    let mut out = "{".repeat(n);
    if let Some(directive) = directive {
        out.push_str(directive);
    }
    out.push('\n');
    if !content.is_empty() {
        out.push_str(content);
        out.push('\n');
    }
    out.push_str(&"}".repeat(n));
    out.push('\n');
    out
}

fn part(elem: &Element, chunks: &mut Vec<String>) {
    if let Some(name) = format_name(elem) {
        let args = ArgParser::wiki().unparse(&element_arguments(elem));
        let directive = if args.is_empty() {
            format!("#!{name}")
        } else {
            format!("#!{name} {args}")
        };
        let content = elem.page_attr("alt").unwrap_or_default();
        chunks.push(fenced(Some(&directive), &content));
    } else if macro_name(elem).is_some() {
        chunks.push(format!("{}\n", macro_call(elem)));
    } else {
        container(elem, chunks);
    }
}

/// Parser name of an `x-moin/format` part.
pub(super) fn format_name(elem: &Element) -> Option<String> {
    let content_type = Type::parse(&elem.page_attr("content-type")?).ok()?;
    if content_type.major.as_deref() != Some("x-moin") || content_type.subtype.as_deref() != Some("format") {
        return None;
    }
    content_type.parameter("name").map(str::to_string)
}

/// Literal `<<Name(args)>>` of a macro placeholder.
fn macro_call(elem: &Element) -> String {
    if let Some(alt) = elem.page_attr("alt") {
        return alt;
    }
    let name = macro_name(elem).unwrap_or_default();
    let args = element_arguments(elem);
    if args.is_empty() {
        format!("<<{name}>>")
    } else {
        format!("<<{name}({})>>", ArgParser::new().unparse(&args))
    }
}

pub(super) fn include_macro(elem: &Element) -> String {
    let pointer = elem
        .get(&Namespace::XInclude, "xpointer")
        .map(|x| XPointer::parse(&x.to_string()))
        .unwrap_or_default();
    let mut args = Arguments::new();
    let href = elem.get(&Namespace::XInclude, "href").and_then(|h| h.as_iri());
    let name = match (href, &pointer.pages) {
        (Some(href), _) => href.path_str().to_string(),
        (None, Some(pages)) => pages.clone(),
        (None, None) => String::new(),
    };
    args.positional.push(name);
    if let Some(heading) = &pointer.heading {
        let heading = if heading.is_empty() { "heading" } else { heading.as_str() };
        args.keyword.push(("heading".to_string(), heading.to_string()));
    }
    if let Some(level) = pointer.level {
        args.keyword.push(("level".to_string(), level.to_string()));
    }
    if pointer.sort == SortOrder::Descending {
        args.keyword.push(("sort".to_string(), "descending".to_string()));
    }
    if let Some(items) = pointer.items {
        args.keyword.push(("items".to_string(), items.to_string()));
    }
    if let Some(skip) = pointer.skipitems {
        args.keyword.push(("skipitems".to_string(), skip.to_string()));
    }
    format!("<<Include({})>>", ArgParser::new().unparse(&args))
}

fn list(elem: &Element, depth: usize) -> String {
    let marker = match (
        elem.page_attr("item-label-generate").as_deref(),
        elem.page_attr("list-style-type").as_deref(),
    ) {
        (Some("ordered"), Some("lower-alpha")) => Some("a."),
        (Some("ordered"), Some("upper-alpha")) => Some("A."),
        (Some("ordered"), Some("lower-roman")) => Some("i."),
        (Some("ordered"), Some("upper-roman")) => Some("I."),
        (Some("ordered"), _) => Some("1."),
        (Some(_), Some("none")) => Some("."),
        (Some(_), _) => Some("*"),
        (None, _) => None,
    };
    let indent = " ".repeat(depth);
    let mut out = String::new();
    for item in elem.child_elements().filter(|e| e.is_page("list-item")) {
        let (text, nested) = match item.find_page("list-item-body") {
            Some(body) => item_body(body, depth),
            None => (String::new(), String::new()),
        };
        let label = item
            .find_page("list-item-label")
            .map(|l| one_line(&inlines(&l.children)));
        let line = match (marker, label) {
            (Some(marker), _) => format!("{indent}{marker} {text}"),
            (None, Some(label)) if text.is_empty() => format!("{indent}{label}::"),
            (None, Some(label)) => format!("{indent}{label}:: {text}"),
            (None, None) => format!("{indent}:: {text}"),
        };
        out.push_str(&line);
        out.push('\n');
        out.push_str(&nested);
    }
    out
}

/// Text for the marker line and the lines of nested blocks.
fn item_body(body: &Element, depth: usize) -> (String, String) {
    let mut parts: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut nested = String::new();
    for child in &body.children {
        match child {
            Node::Element(e) if e.is_page("list") => nested.push_str(&list(e, depth + 1)),
            Node::Element(e) if e.is_page("p") => {
                push_part(&mut parts, &mut current);
                current = inlines(&e.children);
                push_part(&mut parts, &mut current);
            }
            Node::Element(e) if is_block(e) => {
                let mut chunks = Vec::new();
                block(e, &mut chunks);
                nested.push_str(&chunks.concat());
            }
            other => current.push_str(&inline(other)),
        }
    }
    push_part(&mut parts, &mut current);
    (parts.join("<<BR>>"), nested)
}

fn push_part(parts: &mut Vec<String>, current: &mut String) {
    let text = one_line(current);
    if !text.is_empty() {
        parts.push(text);
    }
    current.clear();
}

fn table(elem: &Element) -> String {
    let mut out = String::new();
    for row in table_rows(elem) {
        for cell in row.child_elements().filter(|e| e.is_page("table-cell")) {
            let colspan = cell.page_int("number-columns-spanned").unwrap_or(1).max(1) as usize;
            out.push_str(&"||".repeat(colspan));
            let mut args = Vec::new();
            if let Some(rows) = cell.page_int("number-rows-spanned").filter(|n| *n > 1) {
                args.push(format!("|{rows}"));
            }
            for (name, value) in &cell.attrs {
                if name.ns == Namespace::Html && matches!(name.local.as_ref(), "class" | "id" | "style") {
                    let arg = Arg::Keyword {
                        key: name.local.to_string(),
                        value: Some(value.to_string()),
                    };
                    args.push(arg.to_string());
                }
            }
            if !args.is_empty() {
                out.push_str(&format!("<{}>", args.join(" ")));
            }
            out.push_str(&cell_text(cell));
        }
        out.push_str("||\n");
    }
    out
}

/// Rows in document order, looking through header, body and footer groups.
pub(super) fn table_rows(table: &Element) -> Vec<&Element> {
    let mut rows = Vec::new();
    for child in table.child_elements() {
        match child.page_local() {
            Some("table-row") => rows.push(child),
            Some("table-header" | "table-body" | "table-footer") => {
                rows.extend(child.child_elements().filter(|e| e.is_page("table-row")));
            }
            _ => {}
        }
    }
    rows
}

fn cell_text(cell: &Element) -> String {
    let mut parts = Vec::new();
    let mut current = String::new();
    for child in &cell.children {
        match child {
            Node::Element(e) if e.is_page("p") => {
                push_part(&mut parts, &mut current);
                current = inlines(&e.children);
                push_part(&mut parts, &mut current);
            }
            other => current.push_str(&inline(other)),
        }
    }
    push_part(&mut parts, &mut current);
    parts.join("<<BR>>")
}

fn one_line(text: &str) -> String {
    text.split('\n').map(str::trim).filter(|s| !s.is_empty()).collect::<Vec<_>>().join(" ")
}

fn inlines(nodes: &[Node]) -> String {
    nodes.iter().map(inline).collect()
}

fn inline(node: &Node) -> String {
    match node {
        Node::Text(text) => text.clone(),
        Node::Element(e) => inline_element(e),
    }
}

fn inline_element(elem: &Element) -> String {
    if elem.name.ns != Namespace::Page {
        return inlines(&elem.children);
    }
    let inner = || inlines(&elem.children);
    match elem.name.local.as_ref() {
        "emphasis" => format!("''{}''", inner()),
        "strong" => format!("'''{}'''", inner()),
        "code" => {
            let text = elem.text();
            if text.contains('`') {
                format!("{{{{{{{text}}}}}}}")
            } else {
                format!("`{text}`")
            }
        }
        "span" => span(elem, inner()),
        "a" => link(elem, inner()),
        "object" => object(elem),
        "line-break" => "<<BR>>".to_string(),
        "note" => {
            let body = elem.find_page("note-body").map(|b| inlines(&b.children)).unwrap_or_default();
            format!("<<FootNote({})>>", one_line(&body))
        }
        "inline-part" => {
            if macro_name(elem).is_some() {
                macro_call(elem)
            } else {
                elem.child_elements()
                    .filter(|e| !e.is_page("arguments"))
                    .map(inline_element)
                    .collect()
            }
        }
        "error" | "arguments" => {
            log::debug!("dropping {} from wiki output", elem.name);
            String::new()
        }
        "p" | "page" | "body" | "div" | "blockquote" | "list-item-body" | "table-cell" | "note-body"
        | "list-item-label" => inner(),
        other => {
            log::warn!("unknown element {other} in wiki output");
            inner()
        }
    }
}

fn span(elem: &Element, inner: String) -> String {
    if let Some(decoration) = elem.page_attr("text-decoration") {
        match decoration.as_str() {
            "underline" => return format!("__{inner}__"),
            "line-through" => return format!("--({inner})--"),
            _ => {}
        }
    }
    if let Some(shift) = elem.page_attr("baseline-shift") {
        match shift.as_str() {
            "super" => return format!("^{inner}^"),
            "sub" => return format!(",,{inner},,"),
            _ => {}
        }
    }
    match elem.page_attr("font-size").as_deref() {
        Some("120%" | "larger") => format!("~+{inner}+~"),
        Some("85%" | "smaller") => format!("~-{inner}-~"),
        _ => inner,
    }
}

/// Wiki spelling of a link target and the query string to pass as `&`
/// arguments.
fn target_text(href: &Iri) -> (String, Option<String>) {
    let fragment = href.fragment.as_deref().map(|f| format!("#{f}")).unwrap_or_default();
    match href.scheme_str() {
        "wiki.local" => {
            let path = href.path_str();
            if href.query.as_deref() == Some("do=get") {
                return (format!("attachment:{}{fragment}", path.trim_start_matches('/')), None);
            }
            (format!("{path}{fragment}"), href.query.clone())
        }
        "wiki" => {
            let path = href.path_str().trim_start_matches('/');
            let target = match href.authority.as_deref() {
                Some(wiki) if !wiki.is_empty() => format!("{wiki}:{path}{fragment}"),
                _ => format!("{path}{fragment}"),
            };
            (target, href.query.clone())
        }
        _ => (href.to_string(), None),
    }
}

fn link(elem: &Element, text: String) -> String {
    let Some(href) = elem.href() else {
        return text;
    };
    let (target, query) = target_text(href);
    let mut args = Vec::new();
    if let Some(query) = query {
        args.extend(query.split('&').filter(|p| !p.is_empty()).map(|p| format!("&{p}")));
    }
    for (name, value) in &elem.attrs {
        if name.ns == Namespace::Html && matches!(name.local.as_ref(), "class" | "title" | "target" | "accesskey") {
            let arg = Arg::Keyword {
                key: name.local.to_string(),
                value: Some(value.to_string()),
            };
            args.push(arg.to_string());
        }
    }
    let text = one_line(&text);
    match (text == target, args.is_empty()) {
        (true, true) => format!("[[{target}]]"),
        (true, false) => format!("[[{target}||{}]]", args.join(" ")),
        (false, true) => format!("[[{target}|{text}]]"),
        (false, false) => format!("[[{target}|{text}|{}]]", args.join(" ")),
    }
}

fn object(elem: &Element) -> String {
    let target = elem.href().map(|h| target_text(h).0).unwrap_or_default();
    match elem.page_attr("alt") {
        Some(alt) if !alt.is_empty() => format!("{{{{{target}|{alt}}}}}"),
        _ => format!("{{{{{target}}}}}"),
    }
}
