//! MediaWiki markup parser.
//!
//! Block constructs, in order: blank line, heading, separator, `<pre>`
//! block, `{|` table, list item, `##` comment and paragraph text. List
//! markers are `*`, `#`, `:` and `;`; the prefix length before the last
//! marker is the nesting level.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::moinwiki::page_iri;
use super::{Lines, ParseStack, page_with_body};
use crate::args::ArgParser;
use crate::error::Result;
use crate::iri::Iri;
use crate::registry::{ConvertContext, Converter, Payload};
use crate::tree::{Element, html, page, xlink};
use crate::util::resolve_entity;

static SEPARATOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*-{4,}\s*$").expect("valid regex"));

static PRE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*<pre>(?P<rest>.*)$").expect("valid regex"));

static TABLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\{\|(?P<args>.*)$").expect("valid regex"));

static LIST_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<indent>[*#:]*)(?P<marker>;\s*|#\s+|\*\s+|:\s+)(?P<text>.*?)$").expect("valid regex")
});

static URL_TARGET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[a-zA-Z0-9+.-]+://|mailto:|news:|irc:)").expect("valid regex"));

const INLINE_LINK: &str = r"\[\[\s*(?P<link_target>[^|\]]+?)\s*(?:\|\s*(?P<link_text>[^|\]]*?)\s*)?(?:\|\s*(?P<link_args>[^\]]*?)\s*)?\]\]";
const INLINE_EXTERNAL: &str = r"\[(?P<ext_url>(?:https?|ftp|mailto|news|irc|file):[^\s\]]+)(?:\s+(?P<ext_text>[^\]]*?))?\]";
const INLINE_COMMENT: &str = r"(?P<comment>/\*.*?\*/)";
const INLINE_BREAK: &str = r"(?P<linebreak><br\s*/?>)";
const INLINE_NOWIKI: &str = r"<nowiki>(?P<nowiki>.*?)</nowiki>";
const INLINE_CODE: &str = r"<(?:code|tt)>(?P<code>.*?)</(?:code|tt)>";
const INLINE_PRE: &str = r"<pre>(?P<pre>.*?)</pre>";
const INLINE_EMPHSTRONG: &str = r"(?P<emphstrong>'{2,})";
const INLINE_TAG: &str = r"<(?P<tag_close>/)?(?P<tag>del|s|sub|sup|u)>";
const INLINE_ENTITY: &str = r"&(?P<entity>#[xX][0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);";

static INLINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        &[
            INLINE_LINK,
            INLINE_EXTERNAL,
            INLINE_COMMENT,
            INLINE_BREAK,
            INLINE_NOWIKI,
            INLINE_CODE,
            INLINE_PRE,
            INLINE_EMPHSTRONG,
            INLINE_TAG,
            INLINE_ENTITY,
        ]
        .join("|"),
    )
    .expect("valid regex")
});

/// Parser for `text/x-mediawiki`.
pub struct MediaWikiParser;

impl Converter for MediaWikiParser {
    fn convert(&self, input: Payload, ctx: &ConvertContext<'_>) -> Result<Payload> {
        let text = input.into_text()?;
        let body = Parser::new(Element::page("body")).parse(&text);
        Ok(Payload::Tree(page_with_body(ctx.options.page_href.as_ref(), body)))
    }
}

struct Parser {
    stack: ParseStack,
}

impl Parser {
    fn new(root: Element) -> Self {
        Self {
            stack: ParseStack::new(root),
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
        } else if let Some((level, text)) = parse_heading(line) {
            self.clear();
            let mut h = Parser::new(
                Element::page("h").with_attr(page("outline-level"), level.clamp(1, 6)),
            );
            h.parse_inline(text);
            self.stack.append(h.stack.finish());
        } else if SEPARATOR_RE.is_match(line) {
            self.clear();
            self.stack.append(Element::page("separator"));
        } else if let Some(caps) = PRE_RE.captures(line) {
            self.block_pre(caps.name("rest").map_or("", |m| m.as_str()), lines);
        } else if let Some(caps) = TABLE_RE.captures(line) {
            self.block_table(&caps["args"], lines);
        } else if let Some(caps) = LIST_RE.captures(line) {
            self.block_list(&caps);
        } else if line.starts_with("##") {
            self.clear();
        } else {
            self.block_text(line);
        }
    }

    fn block_text(&mut self, line: &str) {
        if self.stack.contains(&["list"]) {
            self.clear();
        }
        if self.stack.top_check(&["body"]) {
            self.stack.push(Element::page("p"));
        } else {
            self.stack.append("\n");
        }
        self.parse_inline(line);
    }

    fn block_pre<'t>(&mut self, first: &str, lines: &mut Lines<'t>) {
        self.clear();
        let mut content = Vec::new();
        let mut rest = Some(first);
        while let Some(line) = rest {
            if let Some((code, _)) = line.split_once("</pre>") {
                content.push(code);
                break;
            }
            content.push(line);
            rest = lines.next();
            if rest.is_none() {
                log::warn!("unclosed <pre> block");
            }
        }
        if content.first().is_some_and(|l| l.is_empty()) {
            content.remove(0);
        }
        if content.last().is_some_and(|l| l.is_empty()) {
            content.pop();
        }
        self.stack
            .append(Element::page("blockcode").with_text(content.join("\n")));
    }

    fn block_list(&mut self, caps: &Captures<'_>) {
        let level = caps["indent"].len();
        let text = caps.name("text").map_or("", |m| m.as_str());
        match caps["marker"].chars().next() {
            Some(';') => {
                let (term, desc) = match text.split_once(':') {
                    Some((term, desc)) => (term.trim(), Some(desc.trim())),
                    None => (text.trim(), None),
                };
                let mut label = Parser::new(Element::page("list-item-label"));
                label.parse_inline(term);
                self.open_list_item(level, None, Some(label.stack.finish()));
                if let Some(desc) = desc {
                    self.parse_inline(desc);
                }
            }
            Some('#') => {
                self.open_list_item(level, Some("ordered"), None);
                self.parse_inline(text);
            }
            Some('*') => {
                self.open_list_item(level, Some("unordered"), None);
                self.parse_inline(text);
            }
            _ => {
                self.open_list_item(level, None, None);
                self.parse_inline(text);
            }
        }
    }

    /// Close containers until a list of this kind at `level` is on top (or
    /// open one), then open a new item with its body.
    fn open_list_item(&mut self, level: usize, generate: Option<&str>, label: Option<Element>) {
        let kind = generate.unwrap_or("definition").to_string();
        loop {
            let top = self.stack.top();
            if self.stack.top_check(&["body"])
                || (self.stack.top_check(&["list-item-body"]) && level > top.level)
                || (self.stack.top_check(&["list"]) && level >= top.level && top.kind.as_deref() == Some(kind.as_str()))
            {
                break;
            }
            self.stack.pop();
        }
        if !self.stack.top_check(&["list"]) {
            let mut list = Element::page("list");
            if let Some(generate) = generate {
                list.set_attr(page("item-label-generate"), generate);
            }
            self.stack.push_frame(list, level, Some(kind));
        }
        self.stack.push(Element::page("list-item"));
        if let Some(label) = label {
            self.stack.append(label);
        }
        self.stack.push_frame(Element::page("list-item-body"), level, None);
    }

    fn block_table<'t>(&mut self, args: &str, lines: &mut Lines<'t>) {
        self.clear();
        let mut table = Element::page("table");
        apply_html_args(&mut table, args);
        self.stack.push(table);
        self.stack.push(Element::page("table-body"));
        let mut closed = false;
        for line in lines.by_ref() {
            let trimmed = line.trim();
            if trimmed.starts_with("|}") {
                closed = true;
                break;
            } else if trimmed.starts_with("|-") {
                self.stack.pop_until(&["table-body"]);
            } else if trimmed.starts_with("|+") {
                log::debug!("ignoring table caption {trimmed:?}");
            } else if let Some(cells) = trimmed.strip_prefix('|') {
                self.table_cells(cells, "||");
            } else if let Some(cells) = trimmed.strip_prefix('!') {
                self.table_cells(cells, "!!");
            } else if self.stack.contains(&["table-cell"]) {
                self.stack.pop_until(&["table-cell"]);
                self.stack.append("\n");
                self.parse_inline(trimmed);
            } else {
                log::debug!("ignoring text outside of table cell {trimmed:?}");
            }
        }
        if !closed {
            log::warn!("unclosed table");
        }
        self.clear();
    }

    /// One line of cells; the last cell stays open for continuation lines.
    fn table_cells(&mut self, content: &str, separator: &str) {
        if self.stack.contains(&["table-row"]) {
            self.stack.pop_until(&["table-row"]);
        } else {
            self.stack.push(Element::page("table-row"));
        }
        for raw in content.split(separator) {
            self.stack.pop_until(&["table-row"]);
            let mut cell = Element::page("table-cell");
            let text = match split_cell_args(raw) {
                Some((args, text)) => {
                    apply_html_args(&mut cell, args);
                    text
                }
                None => raw,
            };
            self.stack.push(cell);
            self.parse_inline(text.trim());
        }
    }

    fn parse_inline(&mut self, text: &str) {
        let mut pos = 0;
        for caps in INLINE_RE.captures_iter(text) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            self.stack.append(&text[pos..whole.start()]);
            pos = whole.end();
            self.inline(&caps, whole.as_str());
        }
        self.stack.append(&text[pos..]);
    }

    fn inline(&mut self, caps: &Captures<'_>, whole: &str) {
        if let Some(target) = caps.name("link_target") {
            let label = caps.name("link_text").map(|m| m.as_str());
            let args = caps.name("link_args").map(|m| m.as_str());
            self.inline_link(target.as_str(), label, args);
        } else if let Some(url) = caps.name("ext_url") {
            let label = caps
                .name("ext_text")
                .map(|m| m.as_str())
                .filter(|t| !t.is_empty())
                .unwrap_or(url.as_str());
            self.stack.push(Element::page("a").with_attr(xlink("href"), Iri::parse(url.as_str())));
            self.parse_inline(label);
            self.stack.pop_until(&["a"]);
            self.stack.pop();
        } else if caps.name("comment").is_some() {
            log::trace!("dropping comment {whole:?}");
        } else if caps.name("linebreak").is_some() {
            self.stack.append(Element::page("line-break"));
        } else if let Some(code) = caps.name("nowiki").or_else(|| caps.name("code")) {
            self.stack.append(Element::page("code").with_text(code.as_str()));
        } else if let Some(code) = caps.name("pre") {
            self.stack.append(Element::page("blockcode").with_text(code.as_str()));
        } else if let Some(quotes) = caps.name("emphstrong") {
            self.inline_emphstrong(quotes.len());
        } else if let Some(tag) = caps.name("tag") {
            self.inline_tag(tag.as_str(), caps.name("tag_close").is_some());
        } else if let Some(entity) = caps.name("entity") {
            match resolve_entity(entity.as_str()) {
                Some(resolved) => self.stack.append(resolved.as_str()),
                None => self.stack.append(whole),
            }
        } else {
            self.stack.append(whole);
        }
    }

    fn inline_emphstrong(&mut self, len: usize) {
        let toggles = match len {
            2 => 2,
            3 | 4 => 3,
            _ => 5,
        };
        for _ in 0..len - toggles {
            self.stack.append("'");
        }
        match toggles {
            2 => self.toggle("emphasis"),
            3 => self.toggle("strong"),
            _ => {
                if self.stack.top_check(&["strong", "emphasis"]) {
                    self.stack.pop();
                    if self.stack.top_check(&["strong", "emphasis"]) {
                        self.stack.pop();
                    }
                } else {
                    self.stack.push(Element::page("strong"));
                    self.stack.push(Element::page("emphasis"));
                }
            }
        }
    }

    fn toggle(&mut self, name: &'static str) {
        if self.stack.top_check(&[name]) {
            self.stack.pop();
        } else {
            self.stack.push(Element::page(name));
        }
    }

    fn inline_tag(&mut self, tag: &str, close: bool) {
        if close {
            if self.stack.top_check(&["span"]) {
                self.stack.pop();
            }
            return;
        }
        let span = match tag {
            "sub" => Element::page("span").with_attr(page("baseline-shift"), "sub"),
            "sup" => Element::page("span").with_attr(page("baseline-shift"), "super"),
            "u" => Element::page("span").with_attr(page("text-decoration"), "underline"),
            _ => Element::page("span").with_attr(page("text-decoration"), "line-through"),
        };
        self.stack.push(span);
    }

    fn inline_link(&mut self, target: &str, label: Option<&str>, args: Option<&str>) {
        let mut href = if URL_TARGET_RE.is_match(target) {
            Iri::parse(target)
        } else {
            page_iri(target)
        };
        if let Some(args) = args {
            let args = ArgParser::wiki().parse(args).unwrap_or_default();
            let query: Vec<String> = args
                .keyword
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .chain(args.positional.iter().cloned())
                .collect();
            if !query.is_empty() {
                href.query = Some(query.join("&"));
            }
        }
        self.stack.push(Element::page("a").with_attr(xlink("href"), href));
        match label {
            Some(label) if !label.is_empty() => self.parse_inline(label),
            _ => self.stack.append(target),
        }
        self.stack.pop_until(&["a"]);
        self.stack.pop();
    }
}

/// `== text ==` heading; both runs must be the same length.
fn parse_heading(line: &str) -> Option<(usize, &str)> {
    let t = line.trim();
    let lead = t.len() - t.trim_start_matches('=').len();
    let trail = t.len() - t.trim_end_matches('=').len();
    if lead == 0 || lead != trail || t.len() <= 2 * lead {
        return None;
    }
    Some((lead, t[lead..t.len() - trail].trim()))
}

/// `attrs | text` inside a table cell. A `|` inside a link does not count.
fn split_cell_args(raw: &str) -> Option<(&str, &str)> {
    let (args, text) = raw.split_once('|')?;
    if args.contains("[[") || args.contains("{{") {
        return None;
    }
    Some((args, text))
}

fn apply_html_args(elem: &mut Element, raw: &str) {
    let args = match ArgParser::wiki().parse(raw) {
        Ok(args) => args,
        Err(e) => {
            log::debug!("bad table arguments {raw:?}: {e}");
            return;
        }
    };
    for (key, value) in &args.keyword {
        match key.as_str() {
            "colspan" | "rowspan" => {
                let name = if key == "colspan" { "number-columns-spanned" } else { "number-rows-spanned" };
                if let Some(n) = value.trim().parse::<i64>().ok().filter(|n| *n > 1) {
                    elem.set_attr(page(name), n);
                }
            }
            "class" | "style" | "id" => elem.set_attr(html(key.clone()), value.as_str()),
            other => log::debug!("ignoring table argument {other}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::test_support::parse_body;
    use crate::tree::Namespace;

    fn parse(text: &str) -> Element {
        parse_body(&MediaWikiParser, text)
    }

    fn levels(body: &Element) -> Vec<(String, Option<i64>)> {
        body.child_elements()
            .filter(|e| e.is_page("h"))
            .map(|h| (h.text(), h.page_int("outline-level")))
            .collect()
    }

    #[test]
    fn test_headings() {
        let body = parse("= One =\n=== Three ===\n======== Eight ========\n== unbalanced ===");
        assert_eq!(
            levels(&body),
            vec![
                ("One".to_string(), Some(1)),
                ("Three".to_string(), Some(3)),
                ("Eight".to_string(), Some(6)),
            ]
        );
        assert_eq!(body.find_page("p").unwrap().text(), "== unbalanced ===");
    }

    #[test]
    fn test_paragraphs_join_lines() {
        let body = parse("first\nsecond\n\nthird");
        let paras: Vec<_> = body.child_elements().map(Element::text).collect();
        assert_eq!(paras, vec!["first\nsecond", "third"]);
    }

    #[test]
    fn test_emphasis_and_strong() {
        let body = parse("''it'' '''bold''' '''''both'''''");
        let p = body.find_page("p").unwrap();
        let names: Vec<_> = p.child_elements().filter_map(Element::page_local).collect();
        assert_eq!(names, vec!["emphasis", "strong", "strong"]);
        let both = p.child_elements().nth(2).unwrap();
        assert_eq!(both.find_page("emphasis").unwrap().text(), "both");
    }

    #[test]
    fn test_nested_lists() {
        let body = parse("* a\n** b\n* c\n# one\n# two");
        let lists: Vec<_> = body.child_elements().filter(|e| e.is_page("list")).collect();
        assert_eq!(lists.len(), 2);
        assert_eq!(lists[0].page_attr("item-label-generate").as_deref(), Some("unordered"));
        let items: Vec<_> = lists[0].child_elements().collect();
        assert_eq!(items.len(), 2);
        let nested = items[0].find_page("list-item-body").unwrap().find_page("list").unwrap();
        assert_eq!(nested.text(), "b");
        assert_eq!(lists[1].page_attr("item-label-generate").as_deref(), Some("ordered"));
        assert_eq!(lists[1].child_elements().count(), 2);
    }

    #[test]
    fn test_definition_list() {
        let body = parse("; term : meaning\n: more");
        let list = body.find_page("list").unwrap();
        assert!(list.page_attr("item-label-generate").is_none());
        let items: Vec<_> = list.child_elements().collect();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].find_page("list-item-label").unwrap().text(), "term");
        assert_eq!(items[0].find_page("list-item-body").unwrap().text(), "meaning");
        assert_eq!(items[1].text(), "more");
    }

    #[test]
    fn test_links() {
        let body = parse("[[Other Page#Part|see it|action=raw]] [http://example.org site] [[http://x.org]]");
        let links: Vec<_> = body.descendants().filter(|e| e.is_page("a")).collect();
        assert_eq!(links.len(), 3);
        let href = links[0].href().unwrap();
        assert_eq!(href.scheme_str(), "wiki.local");
        assert_eq!(href.path.as_deref(), Some("Other Page"));
        assert_eq!(href.query.as_deref(), Some("action=raw"));
        assert_eq!(href.fragment.as_deref(), Some("Part"));
        assert_eq!(links[0].text(), "see it");
        assert_eq!(links[1].href().unwrap().scheme_str(), "http");
        assert_eq!(links[1].text(), "site");
        assert_eq!(links[2].text(), "http://x.org");
    }

    #[test]
    fn test_html_like_tags() {
        let body = parse("a<br />b <nowiki>''x''</nowiki> <tt>t</tt> <del>gone</del> H<sub>2</sub>O <u>u</u>");
        let p = body.find_page("p").unwrap();
        assert!(p.find_page("line-break").is_some());
        let codes: Vec<_> = p.child_elements().filter(|e| e.is_page("code")).map(Element::text).collect();
        assert_eq!(codes, vec!["''x''", "t"]);
        let spans: Vec<_> = p.child_elements().filter(|e| e.is_page("span")).collect();
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[0].page_attr("text-decoration").as_deref(), Some("line-through"));
        assert_eq!(spans[1].page_attr("baseline-shift").as_deref(), Some("sub"));
        assert_eq!(spans[2].page_attr("text-decoration").as_deref(), Some("underline"));
    }

    #[test]
    fn test_entities_and_comments() {
        let body = parse("a&amp;b &#65;&#x42; &bogus; x/* hidden */y");
        assert_eq!(body.text(), "a&b AB &bogus; xy");
    }

    #[test]
    fn test_pre_block() {
        let body = parse("<pre>\nline ''one''\n  two\n</pre>\nafter");
        let code = body.find_page("blockcode").unwrap();
        assert_eq!(code.text(), "line ''one''\n  two");
        assert_eq!(body.find_page("p").unwrap().text(), "after");
    }

    #[test]
    fn test_table() {
        let text = "{| class=\"wikitable\"\n|-\n| a || colspan=\"2\" | b\n|-\n| c\ncontinued\n|}\nafter";
        let body = parse(text);
        let table = body.find_page("table").unwrap();
        assert_eq!(table.get(&Namespace::Html, "class").and_then(|v| v.as_text()), Some("wikitable"));
        let rows: Vec<_> = table.find_page("table-body").unwrap().child_elements().collect();
        assert_eq!(rows.len(), 2);
        let cells: Vec<_> = rows[0].child_elements().collect();
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[1].text(), "b");
        assert_eq!(cells[1].page_int("number-columns-spanned"), Some(2));
        assert_eq!(rows[1].text(), "c\ncontinued");
        assert_eq!(body.find_page("p").unwrap().text(), "after");
    }

    #[test]
    fn test_comment_line_and_separator() {
        let body = parse("##hidden\ntext\n----\n## nested item");
        let names: Vec<_> = body.child_elements().filter_map(Element::page_local).collect();
        assert_eq!(names, vec!["p", "separator", "list"]);
        assert_eq!(body.find_page("list").unwrap().text(), "nested item");
    }
}
