//! Moin wiki markup parser.
//!
//! Block constructs are recognized line by line, in this order: blank line,
//! `##` comment, heading, separator, block macro, `{{{` code or format
//! block, list item, definition item, table row and finally paragraph text.
//! Inline markup is found by one alternation regex; each alternative has a
//! handler that appends to or pushes onto the [`ParseStack`].

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::{Lines, ParseStack, format_part, include_element, page_with_body};
use crate::args::{Arg, ArgParser};
use crate::error::Result;
use crate::iri::Iri;
use crate::registry::{ConvertContext, Converter, Payload};
use crate::transform::macros::macro_element;
use crate::tree::{Element, error_element, html, page, xlink};

static SEPARATOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*-{4,}\s*$").expect("valid regex"));

static BLOCK_MACRO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?P<all><<(?P<name>\w+)(?:\((?P<args>.*?)\))?\s*(?:\|\s*(?P<text>.+?)\s*)?>>)\s*$")
        .expect("valid regex")
});

static NOWIKI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?P<marker>\{{3,})\s*(?P<data>#!.+?)?\s*$").expect("valid regex"));

static NOWIKI_END_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?P<marker>\}{3,})\s*$").expect("valid regex"));

static LIST_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<indent>\s+)(?:(?P<numbers>[0-9]+\.\s)|(?P<alpha>[aA]\.\s)|(?P<roman>[iI]\.\s)|(?P<bullet>\*)|(?P<none>\.))\s*(?P<text>.*?)$",
    )
    .expect("valid regex")
});

static DEFINITION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<indent>\s+)(?P<term>.*?)::(?:\s+(?P<text>.*?))?\s*$").expect("valid regex"));

static TABLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(?P<table>\|\|.*)\|\|\s*$").expect("valid regex"));

static URL_TARGET_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9+.-]+://").expect("valid regex"));

static SCHEME_TARGET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:mailto|news|nntp|telnet|irc|file):").expect("valid regex"));

static INTERWIKI_TARGET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<wiki>[A-Z][A-Za-z0-9]+):(?P<page>[^:].*)$").expect("valid regex"));

const INLINE_LINK: &str = r"\[\[\s*(?P<link_target>[^|\]]+?)\s*(?:\|\s*(?P<link_text>[^|]*?)\s*)?(?:\|\s*(?P<link_args>[^\]]*?)\s*)?\]\]";
const INLINE_MACRO: &str = r"(?P<macro><<(?P<macro_name>\w+)(?:\((?P<macro_args>.*?)\))?\s*(?:\|\s*(?P<macro_text>.+?)\s*)?>>)";
const INLINE_NOWIKI: &str = r"\{\{\{(?P<nowiki_text>.*?\}*)\}\}\}|`(?P<nowiki_tick>.*?)`";
const INLINE_OBJECT: &str = r"\{\{(?P<object_target>.+?)\s*(?:\|\s*(?P<object_text>.+?)\s*)?\}\}";
const INLINE_EMPHSTRONG: &str = r"(?P<emphstrong>'{2,6})";
const INLINE_SIZE: &str = r"(?P<size_begin>~[-+])|(?P<size_end>[-+]~)";
const INLINE_STRIKE: &str = r"(?P<strike_begin>--\()|(?P<strike_end>\)--)";
const INLINE_SUB: &str = r",,(?P<sub_text>.*?),,";
const INLINE_SUPER: &str = r"\^(?P<super_text>.*?)\^";
const INLINE_UNDERLINE: &str = r"(?P<underline>__)";
const INLINE_FREELINK: &str = r#"(?P<freelink_bang>!)?(?P<freelink>(?P<iw_ref>[A-Z][a-zA-Z]+):(?P<iw_page>[^\s"'}\]|:,.)?!]+)|(?P<fl_page>(?:(?:\.\./)+|/)?(?:\p{Lu}\p{Ll}+){2,}(?:/(?:\p{Lu}\p{Ll}+){2,})*(?:\#\S+)?)|(?P<fl_email>[-\w._+]+@[\w-]+(?:\.[\w-]+)+))"#;
const INLINE_URL: &str = r"(?P<url>(?:https|http|ftp|nntp|news|mailto|telnet|file|irc):\S+)";

static INLINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        &[
            INLINE_LINK,
            INLINE_MACRO,
            INLINE_NOWIKI,
            INLINE_OBJECT,
            INLINE_EMPHSTRONG,
            INLINE_SIZE,
            INLINE_STRIKE,
            INLINE_SUB,
            INLINE_SUPER,
            INLINE_UNDERLINE,
            INLINE_FREELINK,
            INLINE_URL,
        ]
        .join("|"),
    )
    .expect("valid regex")
});

/// Reduced rule set for link descriptions.
static INLINE_DESC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&[INLINE_MACRO, INLINE_NOWIKI, INLINE_OBJECT, INLINE_EMPHSTRONG].join("|")).expect("valid regex")
});

/// Parser for `text/x.moin.wiki`.
pub struct MoinWikiParser;

impl Converter for MoinWikiParser {
    fn convert(&self, input: Payload, ctx: &ConvertContext<'_>) -> Result<Payload> {
        let text = input.into_text()?;
        let mut body = Element::page("body");
        if let Some(args) = &ctx.options.arguments {
            let classes: Vec<String> = args.positional.iter().map(|c| c.replace('/', " ")).collect();
            if !classes.is_empty() {
                body.set_attr(html("class"), classes.join(" "));
            }
            for key in ["background-color", "color"] {
                if let Some(value) = args.get(key) {
                    body.set_attr(page(key), value);
                }
            }
        }
        let body = Parser::new(ctx, body).parse(&text);
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
        let mut preamble = true;
        while let Some(line) = lines.next() {
            // Processing instructions (#format, #pragma, ...) only head the page.
            if preamble && line.starts_with('#') && !line.starts_with("##") {
                log::trace!("skipping processing instruction {line:?}");
                continue;
            }
            preamble = false;
            self.block(line, &mut lines);
        }
        self.stack.finish()
    }

    fn block<'t>(&mut self, line: &'t str, lines: &mut Lines<'t>) {
        if line.trim().is_empty() || line.starts_with("##") {
            self.stack.pop_until(&["body"]);
        } else if let Some((level, text)) = parse_heading(line) {
            self.stack.pop_until(&["body"]);
            self.stack.append(
                Element::page("h")
                    .with_attr(page("outline-level"), level.clamp(1, 6))
                    .with_text(text),
            );
        } else if SEPARATOR_RE.is_match(line) {
            self.stack.pop_until(&["body"]);
            self.stack.append(Element::page("separator"));
        } else if let Some(caps) = BLOCK_MACRO_RE.captures(line) {
            self.stack.pop_until(&["body"]);
            let args = caps.name("args").map(|m| m.as_str());
            if let Some(elem) = self.block_macro(&caps["name"], args, &caps["all"]) {
                self.stack.append(elem);
            }
        } else if let Some(caps) = NOWIKI_RE.captures(line) {
            let data = caps.name("data").map(|m| m.as_str());
            self.block_nowiki(caps["marker"].len(), data, lines);
        } else if let Some(caps) = LIST_RE.captures(line) {
            let (generate, style) = if caps.name("numbers").is_some() {
                ("ordered", None)
            } else if let Some(m) = caps.name("alpha") {
                let style = if m.as_str().starts_with('a') { "lower-alpha" } else { "upper-alpha" };
                ("ordered", Some(style))
            } else if let Some(m) = caps.name("roman") {
                let style = if m.as_str().starts_with('i') { "lower-roman" } else { "upper-roman" };
                ("ordered", Some(style))
            } else if caps.name("none").is_some() {
                ("unordered", Some("none"))
            } else {
                ("unordered", None)
            };
            let level = caps["indent"].chars().count();
            self.open_list_item(level, Some(generate), style, None);
            self.parse_inline(caps.name("text").map_or("", |m| m.as_str()), &INLINE_RE);
        } else if let Some(caps) = DEFINITION_RE.captures(line) {
            let level = caps["indent"].chars().count();
            self.block_definition(level, &caps["term"], caps.name("text").map(|m| m.as_str()));
        } else if let Some(caps) = TABLE_RE.captures(line) {
            self.block_table(&caps["table"], lines);
        } else {
            self.block_text(line);
        }
    }

    fn block_text(&mut self, line: &str) {
        let indented = line.starts_with(char::is_whitespace);
        if self.stack.top_check(&["table", "table-body", "list"]) || (!indented && self.stack.contains(&["list"])) {
            self.stack.pop_until(&["body"]);
        }
        if self.stack.top_check(&["body"]) {
            self.stack.push(Element::page("p"));
        } else {
            self.stack.append("\n");
        }
        self.parse_inline(line, &INLINE_RE);
    }

    /// Close containers until a list of this kind at `level` is on top (or
    /// open one), then open a new item with its body.
    fn open_list_item(&mut self, level: usize, generate: Option<&str>, style: Option<&str>, label: Option<Element>) {
        let kind = format!("{}/{}", generate.unwrap_or("definition"), style.unwrap_or(""));
        loop {
            let top = self.stack.top();
            if self.stack.top_check(&["body", "blockquote"])
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
            if let Some(style) = style {
                list.set_attr(page("list-style-type"), style);
            }
            log::trace!("opening list {kind} at level {level}");
            self.stack.push_frame(list, level, Some(kind));
        }
        self.stack.push(Element::page("list-item"));
        if let Some(label) = label {
            self.stack.append(label);
        }
        self.stack.push_frame(Element::page("list-item-body"), level, None);
    }

    fn block_definition(&mut self, level: usize, term: &str, text: Option<&str>) {
        let term = term.trim();
        let label = (!term.is_empty()).then(|| {
            let mut label = Parser::new(self.ctx, Element::page("list-item-label"));
            label.parse_inline(term, &INLINE_RE);
            label.stack.finish()
        });
        self.open_list_item(level, None, None, label);
        if let Some(text) = text {
            self.parse_inline(text, &INLINE_RE);
        }
    }

    fn block_nowiki<'t>(&mut self, marker_len: usize, data: Option<&str>, lines: &mut Lines<'t>) {
        self.stack.pop_until(&["body"]);
        let mut content = Vec::new();
        let mut closed = false;
        for line in lines.by_ref() {
            if let Some(caps) = NOWIKI_END_RE.captures(line)
                && caps["marker"].len() >= marker_len
            {
                closed = true;
                break;
            }
            content.push(line);
        }
        let content = content.join("\n");
        let elem = match data.and_then(|d| d.strip_prefix("#!")) {
            Some(directive) => format_part(self.ctx, directive.trim(), &content),
            None => Element::page("blockcode").with_text(&content),
        };
        self.stack.append(elem);
        if !closed {
            log::warn!("unclosed code block");
            self.stack.append(error_element("unclosed code block"));
        }
    }

    fn block_table<'t>(&mut self, first: &str, lines: &mut Lines<'t>) {
        self.stack.pop_until(&["body"]);
        self.stack.push(Element::page("table"));
        self.stack.push(Element::page("table-body"));
        self.table_row(first);
        while let Some(line) = lines.next() {
            match TABLE_RE.captures(line) {
                Some(caps) => self.table_row(&caps["table"]),
                None => {
                    lines.push_back(line);
                    break;
                }
            }
        }
        self.stack.pop_until(&["body"]);
    }

    fn table_row(&mut self, content: &str) {
        self.stack.push(Element::page("table-row"));
        let mut rest = content;
        while rest.starts_with("||") {
            let markers = rest.len() - rest.trim_start_matches("||").len();
            rest = &rest[markers..];
            let mut args = None;
            if rest.starts_with('<')
                && let Some(close) = rest.find('>')
            {
                args = Some(&rest[1..close]);
                rest = &rest[close + 1..];
            }
            let end = rest.find("||").unwrap_or(rest.len());
            let text = rest[..end].trim();
            rest = &rest[end..];

            let mut cell = Element::page("table-cell");
            if markers / 2 > 1 {
                cell.set_attr(page("number-columns-spanned"), markers / 2);
            }
            if let Some(args) = args {
                apply_cell_args(&mut cell, args);
            }
            self.stack.push(cell);
            self.parse_inline(text, &INLINE_RE);
            self.stack.pop_until(&["table-cell"]);
            self.stack.pop();
        }
        self.stack.pop_until(&["table-row"]);
        self.stack.pop();
    }

    fn block_macro(&mut self, name: &str, args: Option<&str>, alt: &str) -> Option<Element> {
        match name {
            "BR" => None,
            "FootNote" => {
                let note = self.footnote(args?);
                Some(Element::page("p").with_child(note))
            }
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

    fn inline_macro(&mut self, name: &str, args: Option<&str>, alt: &str) {
        match name {
            "BR" => self.stack.append(Element::page("line-break")),
            "FootNote" => match args {
                Some(args) => {
                    let note = self.footnote(args);
                    self.stack.append(note);
                }
                None => self.stack.append(alt),
            },
            "TableOfContents" | "Include" => self.stack.append(alt),
            _ => self.stack.append(macro_element(name, args, alt, false)),
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
            self.inline(&caps, text, whole.start(), whole.end());
        }
        self.stack.append(&text[pos..]);
    }

    fn inline(&mut self, caps: &Captures<'_>, text: &str, start: usize, end: usize) {
        let whole = &text[start..end];
        if let Some(target) = caps.name("link_target") {
            let label = caps.name("link_text").map(|m| m.as_str());
            let args = caps.name("link_args").map(|m| m.as_str());
            self.inline_link(target.as_str(), label, args);
        } else if let Some(name) = caps.name("macro_name") {
            let args = caps.name("macro_args").map(|m| m.as_str());
            let alt = caps.name("macro").map_or(whole, |m| m.as_str());
            self.inline_macro(name.as_str(), args, alt);
        } else if let Some(code) = caps.name("nowiki_text") {
            self.stack.append(Element::page("code").with_text(code.as_str()));
        } else if let Some(code) = caps.name("nowiki_tick") {
            if !code.as_str().is_empty() {
                self.stack.append(Element::page("code").with_text(code.as_str()));
            }
        } else if let Some(target) = caps.name("object_target") {
            let mut object = Element::page("object").with_attr(xlink("href"), object_target(target.as_str()));
            if let Some(alt) = caps.name("object_text") {
                object.set_attr(page("alt"), alt.as_str());
            }
            self.stack.append(object);
        } else if let Some(quotes) = caps.name("emphstrong") {
            self.inline_emphstrong(quotes.len(), emphstrong_follow(&text[end..]));
        } else if let Some(size) = caps.name("size_begin") {
            let percent = if size.as_str().ends_with('+') { "120%" } else { "85%" };
            self.stack.push(Element::page("span").with_attr(page("font-size"), percent));
        } else if caps.name("size_end").is_some() || caps.name("strike_end").is_some() {
            if self.stack.top_check(&["span"]) {
                self.stack.pop();
            }
        } else if caps.name("strike_begin").is_some() {
            self.stack
                .push(Element::page("span").with_attr(page("text-decoration"), "line-through"));
        } else if let Some(sub) = caps.name("sub_text") {
            self.stack.append(
                Element::page("span")
                    .with_attr(page("baseline-shift"), "sub")
                    .with_text(sub.as_str()),
            );
        } else if let Some(sup) = caps.name("super_text") {
            self.stack.append(
                Element::page("span")
                    .with_attr(page("baseline-shift"), "super")
                    .with_text(sup.as_str()),
            );
        } else if caps.name("underline").is_some() {
            let open = self.stack.top_check(&["span"])
                && self.stack.top().elem.page_attr("text-decoration").as_deref() == Some("underline");
            if open {
                self.stack.pop();
            } else {
                self.stack
                    .push(Element::page("span").with_attr(page("text-decoration"), "underline"));
            }
        } else if caps.name("freelink").is_some() {
            self.inline_freelink(caps, text, start, end);
        } else if caps.name("url").is_some() {
            self.inline_url(text, start, end);
        } else {
            self.stack.append(whole);
        }
    }

    fn inline_emphstrong(&mut self, len: usize, follow: Option<usize>) {
        match len {
            5 => {
                if self.stack.top_check(&["emphasis"]) {
                    self.stack.pop();
                    if self.stack.top_check(&["strong"]) {
                        self.stack.pop();
                    } else {
                        self.stack.push(Element::page("strong"));
                    }
                } else if self.stack.top_check(&["strong"]) {
                    self.stack.pop();
                    if self.stack.top_check(&["emphasis"]) {
                        self.stack.pop();
                    } else {
                        self.stack.push(Element::page("emphasis"));
                    }
                } else if follow == Some(3) {
                    self.stack.push(Element::page("emphasis"));
                    self.stack.push(Element::page("strong"));
                } else {
                    self.stack.push(Element::page("strong"));
                    self.stack.push(Element::page("emphasis"));
                }
            }
            3 => self.toggle("strong"),
            2 => self.toggle("emphasis"),
            _ => log::trace!("ignoring run of {len} quotes"),
        }
    }

    fn toggle(&mut self, name: &'static str) {
        if self.stack.top_check(&[name]) {
            self.stack.pop();
        } else {
            self.stack.push(Element::page(name));
        }
    }

    fn inline_link(&mut self, target: &str, label: Option<&str>, args: Option<&str>) {
        let mut href = link_target(target);
        let mut link = Element::page("a");
        if let Some(args) = args {
            let args = ArgParser::wiki().parse(args).unwrap_or_default();
            let mut query = Vec::new();
            for (key, value) in &args.keyword {
                match key.as_str() {
                    "class" | "title" | "target" | "accesskey" => link.set_attr(html(key.clone()), value.as_str()),
                    k if k.starts_with('&') => query.push(format!("{}={value}", &k[1..])),
                    other => log::debug!("ignoring link argument {other}"),
                }
            }
            if !query.is_empty() {
                href.query = Some(query.join("&"));
            }
        }
        link.set_attr(xlink("href"), href);
        self.stack.push(link);
        match label {
            Some(label) if !label.is_empty() => self.parse_inline(label, &INLINE_DESC_RE),
            _ => self.stack.append(target),
        }
        self.stack.pop_until(&["a"]);
        self.stack.pop();
    }

    fn inline_freelink(&mut self, caps: &Captures<'_>, text: &str, start: usize, end: usize) {
        let whole = &text[start..end];
        let is_word = |c: char| c.is_alphabetic() || c == '/';
        let bounded = !text[..start].chars().next_back().is_some_and(is_word)
            && !text[end..].chars().next().is_some_and(is_word);
        let freelink = caps.name("freelink").map_or(whole, |m| m.as_str());
        if !bounded {
            self.stack.append(whole);
            return;
        }
        if caps.name("freelink_bang").is_some() {
            self.stack.append(freelink);
            return;
        }

        let (href, label) = if let Some(name) = caps.name("fl_page") {
            (page_iri(name.as_str()), name.as_str())
        } else if let Some(email) = caps.name("fl_email") {
            (Iri::new().with_scheme("mailto").with_path(email.as_str()), email.as_str())
        } else {
            let wiki = caps.name("iw_ref").map_or("", |m| m.as_str());
            let name = caps.name("iw_page").map_or("", |m| m.as_str());
            if !name.chars().any(char::is_alphanumeric) || self.ctx.host.resolve_interwiki(wiki, name).error {
                self.stack.append(freelink);
                return;
            }
            (
                Iri::new()
                    .with_scheme("wiki")
                    .with_authority(wiki)
                    .with_path(format!("/{name}")),
                name,
            )
        };
        self.stack.append(
            Element::page("a")
                .with_attr(xlink("href"), href)
                .with_text(label),
        );
    }

    fn inline_url(&mut self, text: &str, start: usize, end: usize) {
        let whole = &text[start..end];
        let preceded = text[..start]
            .chars()
            .next_back()
            .is_none_or(|c| c.is_whitespace() || ".,:;!?()/=".contains(c));
        if !preceded {
            self.stack.append(whole);
            return;
        }
        let mut url = whole;
        let mut trailing = "";
        if let Some(last) = url.chars().next_back()
            && ",.:;!?()".contains(last)
            && !url[..url.len() - 1].ends_with(':')
        {
            trailing = &url[url.len() - 1..];
            url = &url[..url.len() - 1];
        }
        self.stack.append(
            Element::page("a")
                .with_attr(xlink("href"), Iri::parse(url))
                .with_text(url),
        );
        self.stack.append(trailing);
    }
}

/// `= text =` heading; mismatched runs use the shorter one.
fn parse_heading(line: &str) -> Option<(usize, &str)> {
    let t = line.trim();
    if t.len() < 2 || !t.starts_with('=') || !t.ends_with('=') {
        return None;
    }
    let lead = t.len() - t.trim_start_matches('=').len();
    let trail = t.len() - t.trim_end_matches('=').len();
    let level = if lead == t.len() { t.len() / 2 } else { lead.min(trail) };
    Some((level, t[level..t.len() - level].trim()))
}

/// Length of the next two or three quote run after some other text.
fn emphstrong_follow(rest: &str) -> Option<usize> {
    let at = rest.find('\'')?;
    if at == 0 {
        return None;
    }
    let run = rest[at..].len() - rest[at..].trim_start_matches('\'').len();
    (2..=3).contains(&run).then_some(run)
}

fn apply_cell_args(cell: &mut Element, raw: &str) {
    let items = match ArgParser::wiki().with_prefixes("|-").parse_items(raw) {
        Ok(items) => items,
        Err(e) => {
            log::debug!("bad table cell arguments {raw:?}: {e}");
            return;
        }
    };
    for item in items {
        match item {
            Arg::Prefixed { prefix: '|', value } => set_span(cell, "number-rows-spanned", value.as_deref()),
            Arg::Prefixed { prefix: '-', value } => set_span(cell, "number-columns-spanned", value.as_deref()),
            Arg::Keyword { key, value } => match key.as_str() {
                "rowspan" => set_span(cell, "number-rows-spanned", value.as_deref()),
                "colspan" => set_span(cell, "number-columns-spanned", value.as_deref()),
                "class" | "id" | "style" => cell.set_attr(html(key.clone()), value.unwrap_or_default()),
                _ => log::debug!("ignoring table cell argument {key}"),
            },
            other => log::debug!("ignoring table cell argument {other}"),
        }
    }
}

fn set_span(cell: &mut Element, name: &'static str, value: Option<&str>) {
    if let Some(n) = value.and_then(|v| v.trim().parse::<i64>().ok())
        && n > 1
    {
        cell.set_attr(page(name), n);
    }
}

/// Target of `[[...]]`.
pub(super) fn link_target(target: &str) -> Iri {
    if URL_TARGET_RE.is_match(target) || SCHEME_TARGET_RE.is_match(target) {
        return Iri::parse(target);
    }
    if let Some(name) = target
        .strip_prefix("attachment:")
        .or_else(|| target.strip_prefix("drawing:"))
    {
        return attachment_iri(name);
    }
    if let Some(caps) = INTERWIKI_TARGET_RE.captures(target) {
        let (path, fragment) = split_fragment(&caps["page"]);
        let mut iri = Iri::new()
            .with_scheme("wiki")
            .with_authority(&caps["wiki"])
            .with_path(format!("/{path}"));
        iri.fragment = fragment.map(str::to_string);
        return iri;
    }
    page_iri(target)
}

/// Target of `{{...}}`.
pub(super) fn object_target(target: &str) -> Iri {
    if URL_TARGET_RE.is_match(target) {
        return Iri::parse(target);
    }
    match target
        .strip_prefix("attachment:")
        .or_else(|| target.strip_prefix("drawing:"))
    {
        Some(name) => attachment_iri(name),
        None => page_iri(target),
    }
}

fn attachment_iri(name: &str) -> Iri {
    Iri::new()
        .with_scheme("wiki.local")
        .with_path(format!("/{name}"))
        .with_query("do=get")
}

pub(super) fn page_iri(target: &str) -> Iri {
    let (path, fragment) = split_fragment(target);
    let mut iri = Iri::new().with_scheme("wiki.local");
    if !path.is_empty() {
        iri.path = Some(path.to_string());
    }
    iri.fragment = fragment.map(str::to_string);
    iri
}

fn split_fragment(target: &str) -> (&str, Option<&str>) {
    match target.rsplit_once('#') {
        Some((path, fragment)) => (path, Some(fragment)),
        None => (target, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::test_support::parse_body;
    use crate::transform::include::XPointer;
    use crate::tree::{Namespace, Node};

    fn parse(text: &str) -> Element {
        parse_body(&MoinWikiParser, text)
    }

    fn first<'a>(elem: &'a Element, name: &str) -> &'a Element {
        elem.descendants().find(|e| e.is_page(name)).unwrap()
    }

    #[test]
    fn test_heading_and_paragraph() {
        let body = parse("= Title =\nline one\nline two\n\nnext");
        let h = body.find_page("h").unwrap();
        assert_eq!(h.page_int("outline-level"), Some(1));
        assert_eq!(h.text(), "Title");
        let ps: Vec<_> = body.child_elements().filter(|e| e.is_page("p")).collect();
        assert_eq!(ps.len(), 2);
        assert_eq!(ps[0].text(), "line one\nline two");
        assert_eq!(ps[1].text(), "next");
    }

    #[test]
    fn test_heading_levels() {
        assert_eq!(parse_heading("== Heading 2 =="), Some((2, "Heading 2")));
        assert_eq!(parse_heading("=== A =="), Some((2, "= A")));
        assert_eq!(parse_heading("no heading"), None);
    }

    #[test]
    fn test_heading_level_clamped() {
        let body = parse("======= seven =======
========= nine =========");
        let levels: Vec<_> = body
            .child_elements()
            .filter(|e| e.is_page("h"))
            .map(|h| (h.text(), h.page_int("outline-level")))
            .collect();
        assert_eq!(
            levels,
            vec![("seven".to_string(), Some(6)), ("nine".to_string(), Some(6))]
        );
    }

    #[test]
    fn test_comment_and_pragma() {
        let body = parse("#format wiki\n#pragma section-numbers off\ntext\n## hidden\nmore");
        let ps: Vec<_> = body.child_elements().collect();
        assert_eq!(ps.len(), 2);
        assert_eq!(body.text(), "textmore");
    }

    #[test]
    fn test_separator() {
        let body = parse("a\n----\nb");
        assert!(body.find_page("separator").is_some());
    }

    #[test]
    fn test_nested_lists() {
        let body = parse(" * a\n  * b\n * c\nafter");
        let lists: Vec<_> = body.child_elements().filter(|e| e.is_page("list")).collect();
        assert_eq!(lists.len(), 1);
        let items: Vec<_> = lists[0].child_elements().collect();
        assert_eq!(items.len(), 2);
        let inner = first(items[0], "list");
        assert_eq!(inner.text(), "b");
        assert_eq!(lists[0].page_attr("item-label-generate").as_deref(), Some("unordered"));
        assert_eq!(body.find_page("p").unwrap().text(), "after");
    }

    #[test]
    fn test_ordered_list_styles() {
        let body = parse(" a. one\n a. two\n\n I. roman");
        let lists: Vec<_> = body.child_elements().filter(|e| e.is_page("list")).collect();
        assert_eq!(lists[0].page_attr("list-style-type").as_deref(), Some("lower-alpha"));
        assert_eq!(lists[0].child_elements().count(), 2);
        assert_eq!(lists[1].page_attr("list-style-type").as_deref(), Some("upper-roman"));
        assert_eq!(lists[1].page_attr("item-label-generate").as_deref(), Some("ordered"));
    }

    #[test]
    fn test_different_marker_starts_new_list() {
        let body = parse(" * a\n 1. b");
        assert_eq!(body.child_elements().filter(|e| e.is_page("list")).count(), 2);
    }

    #[test]
    fn test_definition_list() {
        let body = parse(" term:: definition\n :: second");
        let list = body.find_page("list").unwrap();
        assert!(list.page_attr("item-label-generate").is_none());
        let items: Vec<_> = list.child_elements().collect();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].find_page("list-item-label").unwrap().text(), "term");
        assert_eq!(items[0].find_page("list-item-body").unwrap().text(), "definition");
        assert!(items[1].find_page("list-item-label").is_none());
    }

    #[test]
    fn test_table_spans() {
        let body = parse("||A||B||<|2>D||\n||||C||\n");
        let rows: Vec<_> = first(&body, "table-body").child_elements().collect();
        assert_eq!(rows.len(), 2);
        let r0: Vec<_> = rows[0].child_elements().collect();
        assert_eq!(r0.len(), 3);
        assert_eq!(r0[2].page_int("number-rows-spanned"), Some(2));
        assert_eq!(r0[2].text(), "D");
        let r1: Vec<_> = rows[1].child_elements().collect();
        assert_eq!(r1.len(), 1);
        assert_eq!(r1[0].page_int("number-columns-spanned"), Some(2));
        assert_eq!(r1[0].text(), "C");
    }

    #[test]
    fn test_table_cell_keywords() {
        let body = parse("||<-3 class=x>wide||");
        let cell = first(&body, "table-cell");
        assert_eq!(cell.page_int("number-columns-spanned"), Some(3));
        assert_eq!(cell.attr(&html("class")).unwrap().to_string(), "x");
    }

    #[test]
    fn test_emphasis_and_strong() {
        let body = parse("''e'' '''s''' '''''both'''''");
        let p = body.find_page("p").unwrap();
        let kids: Vec<_> = p.child_elements().collect();
        assert!(kids[0].is_page("emphasis"));
        assert!(kids[1].is_page("strong"));
        assert!(kids[2].is_page("strong"));
        assert_eq!(first(kids[2], "emphasis").text(), "both");
    }

    #[test]
    fn test_inline_spans() {
        let body = parse("~+big+~ --(gone)-- x,,2,, e^3^ __u__");
        let spans: Vec<_> = body.descendants().filter(|e| e.is_page("span")).collect();
        assert_eq!(spans[0].page_attr("font-size").as_deref(), Some("120%"));
        assert_eq!(spans[1].page_attr("text-decoration").as_deref(), Some("line-through"));
        assert_eq!(spans[2].page_attr("baseline-shift").as_deref(), Some("sub"));
        assert_eq!(spans[3].page_attr("baseline-shift").as_deref(), Some("super"));
        assert_eq!(spans[4].text(), "u");
    }

    #[test]
    fn test_links() {
        let body = parse(
            "[[FrontPage#top]] [[http://example.org|Example]] [[MoinMoin:FrontPage]] [[attachment:a.png|file]] [[/Child|''sub'']]",
        );
        let links: Vec<_> = body.descendants().filter(|e| e.is_page("a")).collect();
        let hrefs: Vec<String> = links.iter().map(|a| a.href().unwrap().to_string()).collect();
        assert_eq!(
            hrefs,
            vec![
                "wiki.local:FrontPage#top",
                "http://example.org",
                "wiki://MoinMoin/FrontPage",
                "wiki.local:/a.png?do=get",
                "wiki.local:/Child",
            ]
        );
        assert_eq!(links[0].text(), "FrontPage#top");
        assert_eq!(links[1].text(), "Example");
        assert!(links[4].find_page("emphasis").is_some());
    }

    #[test]
    fn test_link_arguments() {
        let body = parse("[[Page|text|class=big &do=raw]]");
        let a = first(&body, "a");
        assert_eq!(a.attr(&html("class")).unwrap().to_string(), "big");
        assert_eq!(a.href().unwrap().to_string(), "wiki.local:Page?do=raw");
    }

    #[test]
    fn test_free_links() {
        let body = parse("see FrontPage, !NotLink and me@example.org or http://example.org/x.");
        let links: Vec<_> = body.descendants().filter(|e| e.is_page("a")).collect();
        assert_eq!(links.len(), 3);
        assert_eq!(links[0].href().unwrap().to_string(), "wiki.local:FrontPage");
        assert_eq!(links[1].href().unwrap().to_string(), "mailto:me@example.org");
        assert_eq!(links[2].href().unwrap().to_string(), "http://example.org/x");
        assert!(body.text().contains("NotLink and"));
        assert!(body.text().ends_with("http://example.org/x."));
    }

    #[test]
    fn test_unknown_interwiki_freelink_is_text() {
        let body = parse("Nowhere:SomePage");
        assert!(body.descendants().all(|e| !e.is_page("a")));
    }

    #[test]
    fn test_inline_code_and_object() {
        let body = parse("{{{a ''b''}}} `c` `` {{pic.png|Alt}}");
        let codes: Vec<_> = body.descendants().filter(|e| e.is_page("code")).collect();
        assert_eq!(codes.len(), 2);
        assert_eq!(codes[0].text(), "a ''b''");
        let object = first(&body, "object");
        assert_eq!(object.href().unwrap().to_string(), "wiki.local:pic.png");
        assert_eq!(object.page_attr("alt").as_deref(), Some("Alt"));
    }

    #[test]
    fn test_code_block_keeps_braces() {
        let body = parse("{{{{\n}}}\n}}}}\nafter");
        assert_eq!(body.find_page("blockcode").unwrap().text(), "}}}");
        assert_eq!(body.find_page("p").unwrap().text(), "after");
    }

    #[test]
    fn test_unclosed_code_block() {
        let body = parse("{{{\ncode");
        assert_eq!(body.find_page("blockcode").unwrap().text(), "code");
        assert!(body.find_page("error").is_some());
    }

    #[test]
    fn test_format_block() {
        let body = parse("{{{#!csv\na;b\n1;2\n}}}");
        let part = body.find_page("part").unwrap();
        assert_eq!(part.page_attr("content-type").as_deref(), Some("x-moin/format;name=csv"));
        assert_eq!(part.page_attr("alt").as_deref(), Some("a;b\n1;2"));
        assert!(first(part, "table").descendants().any(|e| e.is_page("table-cell")));
    }

    #[test]
    fn test_nested_wiki_format() {
        let body = parse("{{{#!wiki note\n'''x'''\n}}}");
        let nested = first(body.find_page("part").unwrap(), "body");
        assert_eq!(nested.attr(&html("class")).unwrap().to_string(), "note");
        assert!(first(nested, "strong").text() == "x");
    }

    #[test]
    fn test_block_macros() {
        let body = parse("<<TableOfContents(2)>>\n<<FootNote(note ''here'')>>\n<<BR>>\n<<Unknown(a)>>");
        assert_eq!(body.find_page("table-of-content").unwrap().page_int("outline-level"), Some(2));
        let note = first(&body, "note");
        assert_eq!(note.page_attr("note-class").as_deref(), Some("footnote"));
        assert!(first(note, "emphasis").text() == "here");
        let part = body.find_page("part").unwrap();
        assert_eq!(part.find_page("error").unwrap().text(), "<<Unknown(a)>>");
        assert!(body.descendants().all(|e| !e.is_page("line-break")));
    }

    #[test]
    fn test_inline_macros() {
        let body = parse("a<<BR>>b <<Include(X)>> <<Thing>>");
        let p = body.find_page("p").unwrap();
        assert!(p.find_page("line-break").is_some());
        assert!(p.text().contains("<<Include(X)>>"));
        assert!(p.find_page("inline-part").is_some());
    }

    #[test]
    fn test_include_macro() {
        let body = parse("<<Include(OtherPage)>>\n<<Include(^Blog/, heading, 2, sort=descending, items=3)>>");
        let includes: Vec<_> = body
            .children
            .iter()
            .filter_map(Node::as_element)
            .filter(|e| e.is(&Namespace::XInclude, "include"))
            .collect();
        assert_eq!(includes.len(), 2);
        assert_eq!(includes[0].get(&Namespace::XInclude, "href").unwrap().to_string(), "wiki.local:OtherPage");
        let pointer = includes[1].get(&Namespace::XInclude, "xpointer").unwrap().to_string();
        let parsed = XPointer::parse(&pointer);
        assert_eq!(parsed.pages.as_deref(), Some("^Blog/"));
        assert_eq!(parsed.heading.as_deref(), Some(""));
        assert_eq!(parsed.level, Some(2));
        assert_eq!(parsed.items, Some(3));
    }
}
