//! Include expansion.
//!
//! An `xi:include` element names its targets either by `xi:href` (a single
//! page) or by a `pages(REGEX)` directive inside `xi:xpointer`. The xpointer
//! mini-language also knows `sort(ascending|descending)`, `items(N)`,
//! `skipitems(N)`, `heading(TEXT)` and `level(N)`; arguments escape `(`, `)`
//! and `^` with a leading `^`.
//!
//! Each target is converted to the intermediate tree and expanded
//! recursively. The stack of page names being expanded guards against
//! cycles: a page already on the stack is replaced by an error element.

use regex::Regex;

use crate::error::Result;
use crate::host::Host;
use crate::iri::Iri;
use crate::mime::{self, Type};
use crate::registry::{ConvertContext, Converter, Payload};
use crate::tree::{Element, Namespace, Node, error_element, page};

use super::{abs_page_name, element_page_name, wiki_href};

/// Replaces `xi:include` elements with the content they reference.
pub struct IncludeExpander;

impl Converter for IncludeExpander {
    fn convert(&self, input: Payload, ctx: &ConvertContext<'_>) -> Result<Payload> {
        let mut tree = input.into_tree()?;
        let current = element_page_name(&tree)
            .or_else(|| ctx.options.page_name().map(str::to_string))
            .unwrap_or_default();
        let mut stack = Vec::new();
        if !current.is_empty() {
            stack.push(current.clone());
        }
        expand_children(&mut tree, &current, &mut stack, ctx);
        Ok(Payload::Tree(tree))
    }
}

/// Sort order of a `pages()` selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Parsed `xi:xpointer` directives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XPointer {
    pub pages: Option<String>,
    pub sort: SortOrder,
    pub items: Option<usize>,
    pub skipitems: Option<usize>,
    pub heading: Option<String>,
    pub level: Option<i64>,
}

impl XPointer {
    /// Parse the directive list. `xmlns(...)` declarations and unknown
    /// directives are ignored; `page:include(...)` wrappers are unwrapped.
    pub fn parse(input: &str) -> Self {
        let mut pointer = XPointer::default();
        pointer.apply(input);
        pointer
    }

    fn apply(&mut self, input: &str) {
        for (name, arg) in directives(input) {
            let local = name.rsplit(':').next().unwrap_or(&name);
            if local == "include" {
                self.apply(&arg);
                continue;
            }
            let arg = unescape_arg(&arg);
            match local {
                "pages" => self.pages = Some(arg),
                "sort" => {
                    self.sort = if arg.trim() == "descending" {
                        SortOrder::Descending
                    } else {
                        SortOrder::Ascending
                    }
                }
                "items" => self.items = arg.trim().parse().ok(),
                "skipitems" => self.skipitems = arg.trim().parse().ok(),
                "heading" => self.heading = Some(arg),
                "level" => self.level = arg.trim().parse().ok(),
                _ => log::debug!("ignoring xpointer directive {name}"),
            }
        }
    }

    /// Render back to the directive syntax.
    pub fn to_xpointer(&self) -> String {
        let mut parts = Vec::new();
        if let Some(pages) = &self.pages {
            parts.push(format!("pages({})", escape_arg(pages)));
            if self.sort == SortOrder::Descending {
                parts.push("sort(descending)".to_string());
            }
        }
        if let Some(n) = self.items {
            parts.push(format!("items({n})"));
        }
        if let Some(n) = self.skipitems {
            parts.push(format!("skipitems({n})"));
        }
        if let Some(heading) = &self.heading {
            parts.push(format!("heading({})", escape_arg(heading)));
        }
        if let Some(level) = self.level {
            parts.push(format!("level({level})"));
        }
        format!("page:include({})", parts.join(" "))
    }
}

/// Escape `^`, `(` and `)` in a directive argument.
pub fn escape_arg(arg: &str) -> String {
    let mut out = String::with_capacity(arg.len());
    for c in arg.chars() {
        if matches!(c, '^' | '(' | ')') {
            out.push('^');
        }
        out.push(c);
    }
    out
}

fn unescape_arg(arg: &str) -> String {
    let mut out = String::with_capacity(arg.len());
    let mut chars = arg.chars();
    while let Some(c) = chars.next() {
        match c {
            '^' => out.extend(chars.next()),
            _ => out.push(c),
        }
    }
    out
}

/// Split `name(arg) name2(arg2)` into pairs. Arguments are returned still
/// escaped; escaped parentheses do not count towards nesting.
fn directives(input: &str) -> Vec<(String, String)> {
    let mut result = Vec::new();
    let mut chars = input.chars().peekable();
    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        let mut name = String::new();
        while let Some(c) = chars.next_if(|c| *c != '(' && !c.is_whitespace()) {
            name.push(c);
        }
        if chars.next() != Some('(') {
            break;
        }
        let mut arg = String::new();
        let mut depth = 0usize;
        while let Some(c) = chars.next() {
            match c {
                '^' => {
                    arg.push(c);
                    arg.extend(chars.next());
                }
                '(' => {
                    depth += 1;
                    arg.push(c);
                }
                ')' if depth == 0 => break,
                ')' => {
                    depth -= 1;
                    arg.push(c);
                }
                _ => arg.push(c),
            }
        }
        result.push((name, arg));
    }
    result
}

fn expand_children(elem: &mut Element, current: &str, stack: &mut Vec<String>, ctx: &ConvertContext<'_>) {
    let scoped = element_page_name(elem);
    let current = scoped.as_deref().unwrap_or(current);

    let children = std::mem::take(&mut elem.children);
    for child in children {
        match child {
            Node::Element(child) if child.is(&Namespace::XInclude, "include") => {
                elem.push(expand_include(&child, current, stack, ctx));
            }
            Node::Element(mut child) => {
                expand_children(&mut child, current, stack, ctx);
                elem.push(child);
            }
            text => elem.push(text),
        }
    }
}

fn expand_include(
    include: &Element,
    current: &str,
    stack: &mut Vec<String>,
    ctx: &ConvertContext<'_>,
) -> Element {
    let pointer = include
        .get(&Namespace::XInclude, "xpointer")
        .map(|v| XPointer::parse(&v.to_string()))
        .unwrap_or_default();

    let names = match targets(include, &pointer, current, ctx.host) {
        Ok(names) => names,
        Err(message) => {
            log::warn!("{message}");
            return error_element(message);
        }
    };

    let mut container = Element::page("div");
    for name in names {
        if !ctx.host.may_read(&name) {
            log::debug!("skipping include of {name}: permission denied");
            continue;
        }
        if let Some(heading) = &pointer.heading {
            let text = if heading.is_empty() { name.as_str() } else { heading.as_str() };
            let level = pointer.level.unwrap_or(1).clamp(1, 6);
            container.push(
                Element::page("h")
                    .with_attr(page("outline-level"), level)
                    .with_text(text),
            );
        }
        container.push(include_page(&name, stack, ctx));
    }
    container
}

fn targets(include: &Element, pointer: &XPointer, current: &str, host: &dyn Host) -> std::result::Result<Vec<String>, String> {
    if let Some(href) = include.get(&Namespace::XInclude, "href").and_then(|v| v.as_iri()) {
        return target_name(href, current)
            .map(|name| vec![name])
            .ok_or_else(|| format!("unsupported include target {href}"));
    }

    let Some(pattern) = &pointer.pages else {
        return Err("include without target".to_string());
    };
    let re = Regex::new(pattern).map_err(|e| format!("invalid include pattern {pattern:?}: {e}"))?;
    let mut names = host.list_item_names(Some(&re));
    names.sort();
    if pointer.sort == SortOrder::Descending {
        names.reverse();
    }
    let skip = pointer.skipitems.unwrap_or(0);
    let take = pointer.items.unwrap_or(usize::MAX);
    Ok(names.into_iter().skip(skip).take(take).collect())
}

fn target_name(href: &Iri, current: &str) -> Option<String> {
    match href.scheme_str() {
        "wiki.local" => Some(abs_page_name(current, href.path_str())),
        "wiki" if href.authority.as_deref().is_none_or(str::is_empty) => {
            Some(href.path_str().trim_start_matches('/').to_string())
        }
        _ => None,
    }
}

fn include_page(name: &str, stack: &mut Vec<String>, ctx: &ConvertContext<'_>) -> Element {
    if stack.iter().any(|n| n == name) {
        let chain = stack.join(" -> ");
        log::warn!("include cycle: {chain} -> {name}");
        return error_element(format!("Include cycle: {chain} -> {name}"));
    }
    if stack.len() >= ctx.options.max_include_depth {
        log::warn!("include depth limit reached at {name}");
        return error_element(format!("Include depth limit reached at {name}"));
    }

    let Some(revision) = ctx.host.get_item(name).and_then(|item| item.get_revision(-1).cloned()) else {
        return error_element(format!("Page {name} does not exist"));
    };

    let href = wiki_href(name);
    let options = ctx.options.clone().with_page_href(href.clone());
    let nested = ConvertContext {
        registry: ctx.registry,
        host: ctx.host,
        options: &options,
    };

    let converted = Type::parse(revision.content_type()).and_then(|input| {
        let converter = ctx.registry.require(&input, &mime::moin_document())?;
        converter.convert(Payload::Bytes(revision.read().to_vec()), &nested)?.into_tree()
    });
    let mut tree = match converted {
        Ok(tree) => tree,
        Err(e) => return error_element(format!("Cannot include {name}: {e}")),
    };
    tree.set_attr(page("page-href"), href);

    stack.push(name.to_string());
    expand_children(&mut tree, name, stack, &nested);
    stack.pop();
    tree
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;
    use crate::pipeline::{ConvertOptions, default_registry};
    use crate::tree::{new_page, xinclude};

    fn include_href(name: &str) -> Element {
        Element::new(xinclude("include")).with_attr(xinclude("href"), Iri::parse(&format!("wiki.local:{name}")))
    }

    fn run(tree: Element, host: &MemoryHost, options: &ConvertOptions) -> Element {
        let registry = default_registry();
        let ctx = ConvertContext {
            registry: &registry,
            host,
            options,
        };
        IncludeExpander
            .convert(Payload::Tree(tree), &ctx)
            .unwrap()
            .into_tree()
            .unwrap()
    }

    #[test]
    fn test_xpointer_parse() {
        let pointer = XPointer::parse(
            "xmlns(page=http://moinmo.in/namespaces/page) page:include(pages(^^Foo^(A|B^)) sort(descending) items(3) skipitems(1) heading(Title) level(2))",
        );
        assert_eq!(pointer.pages.as_deref(), Some("^Foo(A|B)"));
        assert_eq!(pointer.sort, SortOrder::Descending);
        assert_eq!(pointer.items, Some(3));
        assert_eq!(pointer.skipitems, Some(1));
        assert_eq!(pointer.heading.as_deref(), Some("Title"));
        assert_eq!(pointer.level, Some(2));
        assert_eq!(XPointer::parse(&pointer.to_xpointer()), pointer);
    }

    #[test]
    fn test_include_single_page() {
        let host = MemoryHost::new().with_page("B", "text/x.moin.wiki", "Included text");
        let tree = new_page(Some(&wiki_href("A"))).with_child(Element::page("body").with_child(include_href("B")));
        let out = run(tree, &host, &ConvertOptions::default());
        assert!(out.text().contains("Included text"));
        assert!(out.descendants().all(|e| !e.is(&Namespace::XInclude, "include")));
        let included = out.descendants().find(|e| e.is_page("page") && element_page_name(e).as_deref() == Some("B"));
        assert!(included.is_some());
    }

    #[test]
    fn test_include_cycle() {
        let host = MemoryHost::new()
            .with_page("A", "text/x.moin.wiki", "A text\n<<Include(B)>>")
            .with_page("B", "text/x.moin.wiki", "B text\n<<Include(A)>>");
        let tree = new_page(Some(&wiki_href("A"))).with_child(Element::page("body").with_child(include_href("B")));
        let out = run(tree, &host, &ConvertOptions::default());
        let text = out.text();
        assert!(text.contains("B text"));
        assert!(!text.contains("A text"));
        let errors: Vec<_> = out.descendants().filter(|e| e.is_page("error")).collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].text().contains("A -> B -> A"));
    }

    #[test]
    fn test_pages_regex_with_heading() {
        let host = MemoryHost::new()
            .with_page("Blog/1", "text/x.moin.wiki", "one")
            .with_page("Blog/2", "text/x.moin.wiki", "two")
            .with_page("Blog/3", "text/x.moin.wiki", "three")
            .with_page("Other", "text/x.moin.wiki", "other");
        let include = Element::new(xinclude("include")).with_attr(
            xinclude("xpointer"),
            "page:include(pages(^^Blog/) sort(descending) skipitems(1) items(1) heading() level(2))",
        );
        let tree = new_page(None).with_child(Element::page("body").with_child(include));
        let out = run(tree, &host, &ConvertOptions::default());
        let headings: Vec<_> = out.descendants().filter(|e| e.is_page("h")).collect();
        assert_eq!(headings.len(), 1);
        assert_eq!(headings[0].text(), "Blog/2");
        assert_eq!(headings[0].page_int("outline-level"), Some(2));
        assert!(out.text().contains("two"));
        assert!(!out.text().contains("three"));
    }

    #[test]
    fn test_denied_pages_are_skipped() {
        let host = MemoryHost::new()
            .with_page("Secret", "text/x.moin.wiki", "hidden")
            .deny("Secret");
        let tree = new_page(None).with_child(include_href("Secret"));
        let out = run(tree, &host, &ConvertOptions::default());
        assert!(!out.text().contains("hidden"));
        assert!(out.descendants().all(|e| !e.is_page("error")));
    }

    #[test]
    fn test_depth_limit() {
        let host = MemoryHost::new()
            .with_page("B", "text/x.moin.wiki", "<<Include(C)>>")
            .with_page("C", "text/x.moin.wiki", "deep");
        let tree = new_page(Some(&wiki_href("A"))).with_child(include_href("B"));
        let options = ConvertOptions::default().with_max_include_depth(2);
        let out = run(tree, &host, &options);
        assert!(!out.text().contains("deep"));
        assert!(out.descendants().any(|e| e.is_page("error")));
    }

    #[test]
    fn test_missing_page() {
        let tree = new_page(None).with_child(include_href("Nope"));
        let out = run(tree, &MemoryHost::new(), &ConvertOptions::default());
        assert!(out.text().contains("Nope does not exist"));
    }
}
