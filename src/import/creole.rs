//! Creole 1.0 parser.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::moinwiki::{link_target, object_target};
use super::{Lines, ParseStack, format_part, include_element, page_with_body};
use crate::error::Result;
use crate::iri::Iri;
use crate::registry::{ConvertContext, Converter, Payload};
use crate::transform::macros::macro_element;
use crate::tree::{Element, error_element, page, xlink};

static HEAD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?P<head>=+)\s*(?P<text>.*?)\s*=*\s*$").expect("valid regex"));

static SEPARATOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*----\s*$").expect("valid regex"));

static MACRO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?P<all><<(?P<name>\w+)(?:\((?P<args>.*?)\))?\s*(?:\|\s*(?P<text>.+?)\s*)?>>)\s*$")
        .expect("valid regex")
});

static NOWIKI_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\{\{\{\s*$").expect("valid regex"));

static NOWIKI_END_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<escape>~)?(?P<rest>\}\}\}\s*)$").expect("valid regex"));

static LIST_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*[*#][^*#].*$").expect("valid regex"));

static LIST_END_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:$|=|\||\{\{\{)").expect("valid regex"));

static LIST_ITEM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?P<head>[#*]+)\s*(?P<text>.*?)$").expect("valid regex"));

static TABLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\|.*$").expect("valid regex"));

static CELL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\|\s*(?P<head>=)?(?P<text>[^|]+)").expect("valid regex"));

const INLINE_URL: &str = r"(?P<url_escape>~)?(?P<url>(?:https|http|ftp|nntp|news|mailto|telnet|file|irc):\S+)";
const INLINE_ESCAPE: &str = r"~(?P<escaped>\S)";
const INLINE_LINK: &str = r"\[\[\s*(?P<link_target>[^|\]]+?)\s*(?:\|\s*(?P<link_text>.+?)\s*)?\]\]";
const INLINE_MACRO: &str = r"(?P<macro><<(?P<macro_name>\w+)(?:\((?P<macro_args>.*?)\))?\s*(?:\|\s*(?P<macro_text>.+?)\s*)?>>)";
const INLINE_NOWIKI: &str = r"\{\{\{(?P<nowiki_text>.*?\}*)\}\}\}";
const INLINE_OBJECT: &str = r"\{\{(?P<object_target>.+?)\s*(?:\|\s*(?P<object_text>.+?)\s*)?\}\}";
const INLINE_STRONG: &str = r"(?P<strong>\*\*)";
const INLINE_EMPH: &str = r"(?P<emph>//)";
const INLINE_LINEBREAK: &str = r"(?P<linebreak>\\\\)";

static INLINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        &[
            INLINE_URL,
            INLINE_ESCAPE,
            INLINE_LINK,
            INLINE_MACRO,
            INLINE_NOWIKI,
            INLINE_OBJECT,
            INLINE_STRONG,
            INLINE_EMPH,
            INLINE_LINEBREAK,
        ]
        .join("|"),
    )
    .expect("valid regex")
});

static LINK_DESC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&[INLINE_OBJECT, INLINE_LINEBREAK].join("|")).expect("valid regex"));

/// Parser for `text/x.moin.creole`.
pub struct CreoleParser;

impl Converter for CreoleParser {
    fn convert(&self, input: Payload, ctx: &ConvertContext<'_>) -> Result<Payload> {
        let text = input.into_text()?;
        let body = Parser::new(ctx, Element::page("body")).parse(&text);
        Ok(Payload::Tree(page_with_body(ctx.options.page_href.as_ref(), body)))
    }
}

struct Parser<'a, 'c> {
    stack: ParseStack,
    ctx: &'a ConvertContext<'c>,
}

impl<'a, 'c> Parser<'a, 'c> {
    fn new(ctx: &'a ConvertContext<'c>, root: Element) -> Self {
        Self {
            stack: ParseStack::new(root),
            ctx,
        }
    }

    fn parse(mut self, text: &str) -> Element {
        let mut lines = Lines::new(text);
        while let Some(line) = lines.next() {
            self.block(line, &mut lines);
        }
        self.stack.finish()
    }

    fn clear(&mut self) {
        self.stack.pop_until(&["body"]);
    }

    fn block<'t>(&mut self, line: &'t str, lines: &mut Lines<'t>) {
        if line.trim().is_empty() {
            self.clear();
        } else if let Some(caps) = HEAD_RE.captures(line) {
            self.clear();
            self.stack.append(
                Element::page("h")
                    .with_attr(page("outline-level"), caps["head"].len().clamp(1, 6))
                    .with_text(&caps["text"]),
            );
        } else if SEPARATOR_RE.is_match(line) {
            self.clear();
            self.stack.append(Element::page("separator"));
        } else if let Some(caps) = MACRO_RE.captures(line) {
            self.clear();
            let args = caps.name("args").map(|m| m.as_str());
            if let Some(elem) = self.block_macro(&caps["name"], args, &caps["all"]) {
                self.stack.append(elem);
            }
        } else if NOWIKI_RE.is_match(line) {
            self.block_nowiki(lines);
        } else if LIST_RE.is_match(line) {
            lines.push_back(line);
            self.block_list(lines);
        } else if TABLE_RE.is_match(line) {
            self.block_table(line, lines);
        } else {
            self.block_text(line);
        }
    }

    fn block_text(&mut self, line: &str) {
        if self.stack.top_check(&["table", "table-body", "list"]) {
            self.clear();
        }
        if self.stack.top_check(&["body"]) {
            self.stack.push(Element::page("p"));
        } else {
            self.stack.append("\n");
        }
        self.parse_inline(line, &INLINE_RE);
    }

    fn block_list<'t>(&mut self, lines: &mut Lines<'t>) {
        while let Some(line) = lines.next() {
            if line.trim().is_empty() || LIST_END_RE.is_match(line) {
                self.clear();
                lines.push_back(line);
                break;
            }
            match LIST_ITEM_RE.captures(line) {
                Some(caps) => {
                    let head = &caps["head"];
                    self.list_item(head.len(), head.ends_with('#'));
                    self.parse_inline(caps.name("text").map_or("", |m| m.as_str()), &INLINE_RE);
                }
                None => self.block_text(line),
            }
        }
    }

    fn list_item(&mut self, level: usize, ordered: bool) {
        let kind = if ordered { "#" } else { "*" };
        loop {
            let top = self.stack.top();
            if self.stack.top_check(&["body"])
                || (self.stack.top_check(&["list-item-body"]) && level > top.level)
                || (self.stack.top_check(&["list"]) && level >= top.level && top.kind.as_deref() == Some(kind))
            {
                break;
            }
            self.stack.pop();
        }
        if !self.stack.top_check(&["list"]) {
            let generate = if ordered { "ordered" } else { "unordered" };
            self.stack.push_frame(
                Element::page("list").with_attr(page("item-label-generate"), generate),
                level,
                Some(kind.to_string()),
            );
        }
        self.stack.push(Element::page("list-item"));
        self.stack.push_frame(Element::page("list-item-body"), level, None);
    }

    fn block_nowiki<'t>(&mut self, lines: &mut Lines<'t>) {
        self.clear();
        let mut content = Vec::new();
        let mut closed = false;
        for line in lines.by_ref() {
            match NOWIKI_END_RE.captures(line) {
                Some(caps) if caps.name("escape").is_none() => {
                    closed = true;
                    break;
                }
                Some(caps) => content.push(caps.name("rest").map_or(line, |m| m.as_str())),
                None => content.push(line),
            }
        }
        let elem = match content.first().and_then(|first| first.strip_prefix("#!")) {
            Some(directive) => format_part(self.ctx, directive.trim(), &content[1..].join("\n")),
            None => Element::page("blockcode").with_text(content.join("\n")),
        };
        self.stack.append(elem);
        if !closed {
            log::warn!("unclosed preformatted block");
            self.stack.append(error_element("unclosed preformatted block"));
        }
    }

    fn block_table<'t>(&mut self, first: &str, lines: &mut Lines<'t>) {
        self.clear();
        let mut rows = vec![first];
        while let Some(line) = lines.next() {
            if !TABLE_RE.is_match(line) {
                lines.push_back(line);
                break;
            }
            rows.push(line);
        }

        self.stack.push(Element::page("table"));
        let header = CELL_RE
            .captures_iter(first)
            .all(|caps| caps.name("head").is_some());
        let mut body_rows = &rows[..];
        if header && rows.len() > 1 {
            self.stack.push(Element::page("table-header"));
            self.table_row(first);
            self.stack.pop();
            body_rows = &rows[1..];
        }
        self.stack.push(Element::page("table-body"));
        for row in body_rows {
            self.table_row(row);
        }
        self.clear();
    }

    fn table_row(&mut self, content: &str) {
        self.stack.push(Element::page("table-row"));
        for caps in CELL_RE.captures_iter(content) {
            self.stack.push(Element::page("table-cell"));
            self.parse_inline(caps["text"].trim(), &INLINE_RE);
            self.stack.pop_until(&["table-cell"]);
            self.stack.pop();
        }
        self.stack.pop();
    }

    fn block_macro(&mut self, name: &str, args: Option<&str>, alt: &str) -> Option<Element> {
        match name {
            "BR" => None,
            "FootNote" => Some(Element::page("p").with_child(self.footnote(args?))),
            "TableOfContents" => {
                let mut toc = Element::page("table-of-content");
                if let Some(level) = args.and_then(|a| a.trim().parse::<i64>().ok()) {
                    toc.set_attr(page("outline-level"), level);
                }
                Some(toc)
            }
            "Include" => Some(include_element(args.unwrap_or(""), alt)),
            _ => Some(macro_element(name, args, alt, true)),
        }
    }

    fn footnote(&self, text: &str) -> Element {
        let mut body = Parser::new(self.ctx, Element::page("note-body"));
        body.parse_inline(text, &INLINE_RE);
        Element::page("note")
            .with_attr(page("note-class"), "footnote")
            .with_child(body.stack.finish())
    }

    fn parse_inline(&mut self, text: &str, re: &Regex) {
        let mut pos = 0;
        for caps in re.captures_iter(text) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            self.stack.append(&text[pos..whole.start()]);
            pos = whole.end();
            self.inline(&caps, text, whole.start());
        }
        self.stack.append(&text[pos..]);
    }

    fn inline(&mut self, caps: &Captures<'_>, text: &str, start: usize) {
        let whole = caps.get(0).map_or("", |m| m.as_str());
        if let Some(url) = caps.name("url") {
            let url = url.as_str();
            let preceded = text[..start]
                .chars()
                .next_back()
                .is_none_or(|c| c.is_whitespace() || ".,:;!?()/=".contains(c));
            if !preceded {
                self.stack.append(whole);
                return;
            }
            let (url, trailing) = split_trailing_punctuation(url);
            if caps.name("url_escape").is_some() {
                self.stack.append(url);
            } else {
                self.stack.append(
                    Element::page("a")
                        .with_attr(xlink("href"), Iri::parse(url))
                        .with_text(url),
                );
            }
            self.stack.append(trailing);
        } else if let Some(c) = caps.name("escaped") {
            self.stack.append(c.as_str());
        } else if let Some(target) = caps.name("link_target") {
            let target = target.as_str();
            self.stack
                .push(Element::page("a").with_attr(xlink("href"), link_target(target)));
            let label = caps.name("link_text").map_or(target, |m| m.as_str());
            self.parse_inline(label, &LINK_DESC_RE);
            self.stack.pop_until(&["a"]);
            self.stack.pop();
        } else if let Some(name) = caps.name("macro_name") {
            let args = caps.name("macro_args").map(|m| m.as_str());
            let alt = caps.name("macro").map_or(whole, |m| m.as_str());
            match name.as_str() {
                "BR" => self.stack.append(Element::page("line-break")),
                "FootNote" if args.is_some() => {
                    let note = self.footnote(args.unwrap_or_default());
                    self.stack.append(note);
                }
                "FootNote" | "TableOfContents" | "Include" => self.stack.append(alt),
                other => self.stack.append(macro_element(other, args, alt, false)),
            }
        } else if let Some(code) = caps.name("nowiki_text") {
            self.stack.append(Element::page("code").with_text(code.as_str()));
        } else if let Some(target) = caps.name("object_target") {
            let mut object = Element::page("object").with_attr(xlink("href"), object_target(target.as_str()));
            if let Some(alt) = caps.name("object_text") {
                object.set_attr(page("alt"), alt.as_str());
            }
            self.stack.append(object);
        } else if caps.name("strong").is_some() {
            self.toggle("strong");
        } else if caps.name("emph").is_some() {
            if text[..start].ends_with(':') {
                self.stack.append(whole);
            } else {
                self.toggle("emphasis");
            }
        } else if caps.name("linebreak").is_some() {
            self.stack.append(Element::page("line-break"));
        } else {
            self.stack.append(whole);
        }
    }

    fn toggle(&mut self, name: &'static str) {
        if self.stack.top_check(&[name]) {
            self.stack.pop();
        } else {
            self.stack.push(Element::page(name));
        }
    }
}

/// Split one trailing punctuation character off a bare URL.
fn split_trailing_punctuation(url: &str) -> (&str, &str) {
    match url.chars().next_back() {
        Some(last) if ",.:;!?()".contains(last) && !url[..url.len() - 1].ends_with(':') => {
            url.split_at(url.len() - 1)
        }
        _ => (url, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::test_support::parse_body;

    fn parse(text: &str) -> Element {
        parse_body(&CreoleParser, text)
    }

    #[test]
    fn test_list_nesting() {
        let body = parse("* A\n** B\n* C");
        let list = body.find_page("list").unwrap();
        let items: Vec<_> = list.child_elements().collect();
        assert_eq!(items.len(), 2);
        let first_body = items[0].find_page("list-item-body").unwrap();
        let nested = first_body.find_page("list").unwrap();
        assert_eq!(nested.page_attr("item-label-generate").as_deref(), Some("unordered"));
        assert_eq!(nested.text(), "B");
        assert_eq!(items[1].text(), "C");
    }

    #[test]
    fn test_ordered_list_ends_at_heading() {
        let body = parse("# one\n# two\n= Head =");
        let list = body.find_page("list").unwrap();
        assert_eq!(list.page_attr("item-label-generate").as_deref(), Some("ordered"));
        assert_eq!(list.child_elements().count(), 2);
        let h = body.find_page("h").unwrap();
        assert_eq!(h.text(), "Head");
        assert_eq!(h.page_int("outline-level"), Some(1));
    }

    #[test]
    fn test_heading_tail_stripped() {
        let body = parse("=== Title ==");
        let h = body.find_page("h").unwrap();
        assert_eq!(h.page_int("outline-level"), Some(3));
        assert_eq!(h.text(), "Title");
    }

    #[test]
    fn test_heading_level_clamped() {
        let body = parse("======= x =======");
        let h = body.find_page("h").unwrap();
        assert_eq!(h.page_int("outline-level"), Some(6));
        assert_eq!(h.text(), "x");
    }

    #[test]
    fn test_inline_markup() {
        let body = parse("**bold** //it// line\\\\break ~**not bold~**");
        let p = body.find_page("p").unwrap();
        assert_eq!(p.find_page("strong").unwrap().text(), "bold");
        assert_eq!(p.find_page("emphasis").unwrap().text(), "it");
        assert!(p.find_page("line-break").is_some());
        assert!(p.text().ends_with("**not bold**"));
    }

    #[test]
    fn test_urls() {
        let body = parse("see http://example.org/a. and ~http://no.link");
        let links: Vec<_> = body.descendants().filter(|e| e.is_page("a")).collect();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].href().unwrap().to_string(), "http://example.org/a");
        assert!(body.text().contains("http://no.link"));
    }

    #[test]
    fn test_links_and_images() {
        let body = parse("[[FrontPage|{{logo.png|Logo}}]] [[http://example.org]]");
        let links: Vec<_> = body.descendants().filter(|e| e.is_page("a")).collect();
        assert_eq!(links[0].href().unwrap().to_string(), "wiki.local:FrontPage");
        assert_eq!(links[0].find_page("object").unwrap().page_attr("alt").as_deref(), Some("Logo"));
        assert_eq!(links[1].text(), "http://example.org");
    }

    #[test]
    fn test_table_with_header() {
        let body = parse("|=A|=B|\n|1|2|\n");
        let table = body.find_page("table").unwrap();
        let header = table.find_page("table-header").unwrap();
        assert_eq!(header.text(), "AB");
        let rows: Vec<_> = table.find_page("table-body").unwrap().child_elements().collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].child_elements().count(), 2);
    }

    #[test]
    fn test_preformatted() {
        let body = parse("{{{\nx **y**\n~}}}\n}}}\nafter");
        assert_eq!(body.find_page("blockcode").unwrap().text(), "x **y**\n}}}");
        assert_eq!(body.find_page("p").unwrap().text(), "after");
    }

    #[test]
    fn test_separator_and_macro() {
        let body = parse("----\n<<Anchor(x)>>");
        assert!(body.find_page("separator").is_some());
        let part = body.find_page("part").unwrap();
        assert_eq!(part.page_attr("content-type").as_deref(), Some("x-moin/macro;name=Anchor"));
    }
}
