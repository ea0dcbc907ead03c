//! reStructuredText parser.
//!
//! Block structure comes from indentation. Every nested construct (list
//! item, block quote, directive body, table cell) is cut out of the line
//! slice, dedented and fed back through the same block loop. Section titles
//! do not nest in the page tree: each becomes an `h` whose level is the
//! order in which its adornment style first appeared.
//!
//! Footnote bodies and hyperlink targets are collected in a first pass so
//! references can be resolved wherever they appear.

use std::collections::{BTreeSet, HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::moinwiki::{link_target, object_target};
use super::{format_part, include_element, page_with_body};
use crate::error::Result;
use crate::iri::Iri;
use crate::registry::{ConvertContext, Converter, Payload};
use crate::transform::macros::macro_element;
use crate::tree::{Element, Node, error_element, html, page, xlink};
use crate::util::expand_tabs;

/// Characters that may form section adornments and transitions.
const ADORNMENT_CHARS: &str = "!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";

static BULLET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<marker>[-*+])(?:(?P<space> +)(?P<text>.*))?$").expect("valid regex"));

static ENUM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<open>\()?(?P<enum>\d+|#|[a-zA-Z]|[ivxlcdmIVXLCDM]+)(?P<close>[.)])(?:(?P<space> +)(?P<text>.*))?$")
        .expect("valid regex")
});

static DIRECTIVE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\.\.\s+(?P<name>[\w-]+)::(?:\s+(?P<arg>.*))?$").expect("valid regex"));

static OPTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^:(?P<key>[\w-]+):(?:\s+(?P<value>.*))?$").expect("valid regex"));

static FOOTNOTE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<indent> *)\.\.\s+\[(?P<label>#[\w-]*|\d+|\*)\](?:\s+(?P<text>.*))?$").expect("valid regex")
});

static TARGET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^ *\.\.\s+_(?:`(?P<quoted>[^`]+)`|(?P<name>[^:`]+)):(?:\s+(?P<uri>\S+))?\s*$").expect("valid regex")
});

static MACRO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^<<(?P<name>\w+)(?:\((?P<args>.*?)\))?>>$").expect("valid regex"));

static GRID_TABLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+(?:[-=]+\+)+$").expect("valid regex"));

static SIMPLE_TABLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^=+(?: +=+)+$").expect("valid regex"));

const INLINE_ESCAPE: &str = r"\\(?P<escaped>.)";
const INLINE_LITERAL: &str = r"``(?P<literal>[^\s`](?:.*?[^\s])?)``";
const INLINE_STRONG: &str = r"\*\*(?P<strong>[^\s*](?:.*?[^\s])?)\*\*";
const INLINE_EMPH: &str = r"\*(?P<emph>[^\s*](?:.*?[^\s\\])?)\*";
const INLINE_ROLE: &str = r":(?P<role>[\w-]+):`(?P<role_text>[^`]+)`";
const INLINE_PHRASE: &str = r"`(?P<phrase>[^`<]+?)(?:\s*<(?P<phrase_uri>[^<>`]+)>)?`(?P<phrase_ref>__?)?";
const INLINE_FOOTREF: &str = r"\[(?P<footref>#[\w-]*|\d+|\*)\]_";
const INLINE_URL: &str = r#"(?P<url>(?:https?|ftp|mailto|file|news|nntp|irc|telnet):[^\s<>]*[^\s<>.,;:!?)\]'"])"#;
const INLINE_REF: &str = r"\b(?P<ref>[A-Za-z0-9](?:[\w.-]*[A-Za-z0-9])?)(?P<ref_tail>__?)";

static INLINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        &[
            INLINE_ESCAPE,
            INLINE_LITERAL,
            INLINE_STRONG,
            INLINE_EMPH,
            INLINE_ROLE,
            INLINE_PHRASE,
            INLINE_FOOTREF,
            INLINE_URL,
            INLINE_REF,
        ]
        .join("|"),
    )
    .expect("valid regex")
});

/// Parser for `text/rst`.
pub struct RstParser;

impl Converter for RstParser {
    fn convert(&self, input: Payload, ctx: &ConvertContext<'_>) -> Result<Payload> {
        let text = expand_tabs(&input.into_text()?);
        let lines: Vec<&str> = text.lines().map(str::trim_end).collect();
        let mut parser = Parser::new(ctx, &lines);
        let mut body = Element::page("body");
        parser.blocks(&lines, &mut body);
        Ok(Payload::Tree(page_with_body(ctx.options.page_href.as_ref(), body)))
    }
}

fn indent(line: &str) -> usize {
    line.len() - line.trim_start_matches(' ').len()
}

/// The adornment character if `line` is a run of one punctuation character.
fn adornment(line: &str) -> Option<char> {
    let first = line.chars().next()?;
    (line.len() >= 2 && ADORNMENT_CHARS.contains(first) && line.chars().all(|c| c == first)).then_some(first)
}

/// Lines from `start` that are blank or indented by at least `min`, with
/// `dedent` columns removed, and the index after them. Trailing blank
/// lines are not part of the block.
fn indented<'t>(lines: &[&'t str], start: usize, min: usize, dedent: usize) -> (Vec<&'t str>, usize) {
    let mut end = start;
    while end < lines.len() && (lines[end].is_empty() || indent(lines[end]) >= min) {
        end += 1;
    }
    while end > start && lines[end - 1].is_empty() {
        end -= 1;
    }
    let block = lines[start..end]
        .iter()
        .map(|l| if l.is_empty() { *l } else { &l[dedent.min(indent(l))..] })
        .collect();
    (block, end)
}

/// Like [`indented`], dedented by the common indentation of the block.
fn indented_block<'t>(lines: &[&'t str], start: usize) -> (Vec<&'t str>, usize) {
    let (_, end) = indented(lines, start, 1, 0);
    let common = lines[start..end]
        .iter()
        .filter(|l| !l.is_empty())
        .map(|l| indent(l))
        .min()
        .unwrap_or(0);
    indented(lines, start, 1, common)
}

fn skip_blank(lines: &[&str], mut i: usize) -> usize {
    while i < lines.len() && lines[i].is_empty() {
        i += 1;
    }
    i
}

/// Normalized reference name: case-folded with whitespace collapsed.
fn ref_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

#[derive(Debug, Clone, PartialEq)]
enum ListKind {
    Bullet(char),
    Enumerated { style: Option<&'static str>, format: String },
}

struct ListMarker<'t> {
    kind: ListKind,
    /// Column where the item text starts, when the first line has text.
    width: Option<usize>,
    text: &'t str,
}

impl<'t> ListMarker<'t> {
    fn parse(line: &'t str) -> Option<Self> {
        if let Some(caps) = BULLET_RE.captures(line) {
            let marker = caps["marker"].chars().next()?;
            return Some(Self::from_caps(&caps, ListKind::Bullet(marker), 1, line));
        }
        let caps = ENUM_RE.captures(line)?;
        if caps.name("open").is_some() && &caps["close"] != ")" {
            return None;
        }
        let value = &caps["enum"];
        let style = match value {
            "#" => None,
            v if v.chars().all(|c| c.is_ascii_digit()) => None,
            "i" => Some("lower-roman"),
            "I" => Some("upper-roman"),
            v if v.len() == 1 && v.chars().all(|c| c.is_ascii_lowercase()) => Some("lower-alpha"),
            v if v.len() == 1 => Some("upper-alpha"),
            v if v.chars().all(|c| c.is_ascii_lowercase()) => Some("lower-roman"),
            _ => Some("upper-roman"),
        };
        let format = format!(
            "{}{}",
            caps.name("open").map_or("", |m| m.as_str()),
            &caps["close"]
        );
        let marker_len = caps.name("close").map_or(0, |m| m.end());
        Some(Self::from_caps(&caps, ListKind::Enumerated { style, format }, marker_len, line))
    }

    fn from_caps(caps: &Captures<'t>, kind: ListKind, marker_len: usize, line: &'t str) -> Self {
        let width = caps.name("space").map(|s| marker_len + s.len());
        let text = caps.name("text").map_or("", |m| &line[m.start()..m.end()]);
        Self { kind, width, text }
    }

    fn matches(&self, kind: &ListKind) -> bool {
        match (&self.kind, kind) {
            (ListKind::Bullet(a), ListKind::Bullet(b)) => a == b,
            (
                ListKind::Enumerated { style: a, format: fa },
                ListKind::Enumerated { style: b, format: fb },
            ) => fa == fb && a == b,
            _ => false,
        }
    }
}

#[derive(Default)]
struct Footnotes {
    /// Bodies of `[#]` and `[*]` footnotes, in document order.
    auto: Vec<String>,
    next_auto: usize,
    labeled: HashMap<String, String>,
}

struct Parser<'a, 'c> {
    ctx: &'a ConvertContext<'c>,
    /// Adornment styles (character, overlined) in order of first use.
    styles: Vec<(char, bool)>,
    targets: HashMap<String, String>,
    footnotes: Footnotes,
}

impl<'a, 'c> Parser<'a, 'c> {
    fn new(ctx: &'a ConvertContext<'c>, lines: &[&str]) -> Self {
        let mut parser = Self {
            ctx,
            styles: Vec::new(),
            targets: HashMap::new(),
            footnotes: Footnotes::default(),
        };
        parser.collect_definitions(lines);
        parser
    }

    fn collect_definitions(&mut self, lines: &[&str]) {
        for (i, line) in lines.iter().enumerate() {
            if let Some(caps) = FOOTNOTE_RE.captures(line) {
                let depth = caps["indent"].len();
                let mut text = caps.name("text").map_or(String::new(), |m| m.as_str().to_string());
                for cont in lines[i + 1..]
                    .iter()
                    .take_while(|l| !l.is_empty() && indent(l) > depth)
                {
                    if !text.is_empty() {
                        text.push(' ');
                    }
                    text.push_str(cont.trim());
                }
                match &caps["label"] {
                    "#" | "*" => self.footnotes.auto.push(text),
                    label => {
                        self.footnotes.labeled.insert(label.to_string(), text);
                    }
                }
            } else if let Some(caps) = TARGET_RE.captures(line)
                && let Some(uri) = caps.name("uri")
            {
                let name = caps.name("quoted").or_else(|| caps.name("name")).map_or("", |m| m.as_str());
                self.targets.insert(ref_name(name), uri.as_str().to_string());
            }
        }
    }

    fn blocks(&mut self, lines: &[&str], out: &mut Element) {
        let mut i = 0;
        while i < lines.len() {
            let line = lines[i];
            i = if line.is_empty() {
                i + 1
            } else if indent(line) > 0 {
                self.block_quote(lines, i, out)
            } else if let Some(next) = self.section(lines, i, out) {
                next
            } else if adornment(line).is_some_and(|_| line.len() >= 4)
                && lines.get(i + 1).is_none_or(|l| l.is_empty())
            {
                out.push(Element::page("separator"));
                i + 1
            } else if line == ".." || line.starts_with(".. ") {
                self.explicit(lines, i, out)
            } else if GRID_TABLE_RE.is_match(line) {
                self.grid_table(lines, i, out)
            } else if SIMPLE_TABLE_RE.is_match(line) {
                self.simple_table(lines, i, out)
            } else if ListMarker::parse(line).is_some() {
                self.list(lines, i, out)
            } else if line == "|" || line.starts_with("| ") {
                self.line_block(lines, i, out)
            } else if lines.get(i + 1).is_some_and(|l| !l.is_empty() && indent(l) > 0) {
                self.definition_list(lines, i, out)
            } else {
                self.paragraph(lines, i, out)
            };
        }
    }

    fn section(&mut self, lines: &[&str], i: usize, out: &mut Element) -> Option<usize> {
        let line = lines[i];
        if let Some(c) = adornment(line)
            && let (Some(title), Some(under)) = (lines.get(i + 1), lines.get(i + 2))
            && !title.trim().is_empty()
            && adornment(title).is_none()
            && adornment(under) == Some(c)
        {
            self.heading(title.trim(), (c, true), out);
            return Some(i + 3);
        }
        let under = lines.get(i + 1)?;
        let c = adornment(under)?;
        let width = line.chars().count();
        if adornment(line).is_some() || (under.len() < width && under.len() < 4) {
            return None;
        }
        self.heading(line.trim(), (c, false), out);
        Some(i + 2)
    }

    fn heading(&mut self, title: &str, style: (char, bool), out: &mut Element) {
        let level = match self.styles.iter().position(|s| *s == style) {
            Some(pos) => pos + 1,
            None => {
                self.styles.push(style);
                self.styles.len()
            }
        };
        let mut h = Element::page("h").with_attr(page("outline-level"), level.min(6));
        self.inline(title, &mut h);
        out.push(h);
    }

    fn paragraph(&mut self, lines: &[&str], i: usize, out: &mut Element) -> usize {
        let mut end = i + 1;
        while end < lines.len() && !lines[end].is_empty() && indent(lines[end]) == 0 {
            end += 1;
        }
        let text = lines[i..end].join("\n");
        let (text, literal) = match text.strip_suffix("::") {
            Some(rest) if rest.trim().is_empty() => (String::new(), true),
            Some(rest) if rest.ends_with(char::is_whitespace) => (rest.trim_end().to_string(), true),
            Some(rest) => (format!("{rest}:"), true),
            None => (text, false),
        };
        if !text.is_empty() {
            let mut p = Element::page("p");
            self.inline(&text, &mut p);
            out.push(p);
        }
        if !literal {
            return end;
        }
        let start = skip_blank(lines, end);
        if start >= lines.len() || indent(lines[start]) == 0 {
            log::debug!("literal block marker without indented block");
            return end;
        }
        let (block, next) = indented_block(lines, start);
        out.push(Element::page("blockcode").with_text(block.join("\n")));
        next
    }

    fn block_quote(&mut self, lines: &[&str], i: usize, out: &mut Element) -> usize {
        let (block, next) = indented_block(lines, i);
        let mut quote = Element::page("blockquote");
        self.blocks(&block, &mut quote);
        out.push(quote);
        next
    }

    fn line_block(&mut self, lines: &[&str], mut i: usize, out: &mut Element) -> usize {
        let mut p = Element::page("p");
        let mut first = true;
        while i < lines.len() && (lines[i] == "|" || lines[i].starts_with("| ")) {
            if !first {
                p.push(Element::page("line-break"));
            }
            first = false;
            self.inline(lines[i].get(2..).unwrap_or(""), &mut p);
            i += 1;
        }
        out.push(p);
        i
    }

    fn list(&mut self, lines: &[&str], mut i: usize, out: &mut Element) -> usize {
        let Some(first) = ListMarker::parse(lines[i]) else {
            return i + 1;
        };
        let kind = first.kind.clone();
        let mut list = Element::page("list");
        match &kind {
            ListKind::Bullet(_) => list.set_attr(page("item-label-generate"), "unordered"),
            ListKind::Enumerated { style, .. } => {
                list.set_attr(page("item-label-generate"), "ordered");
                if let Some(style) = style {
                    list.set_attr(page("list-style-type"), *style);
                }
            }
        }
        loop {
            let Some(marker) = ListMarker::parse(lines[i]).filter(|m| m.matches(&kind)) else {
                break;
            };
            let width = marker.width.unwrap_or_else(|| {
                let next = skip_blank(lines, i + 1);
                lines.get(next).map(|l| indent(l)).filter(|w| *w > 0).unwrap_or(2)
            });
            let (rest, next) = indented(lines, i + 1, width, width);
            let mut item_lines = vec![marker.text];
            item_lines.extend(rest);
            let mut item_body = Element::page("list-item-body");
            self.blocks(&item_lines, &mut item_body);
            list.push(Element::page("list-item").with_child(item_body));
            i = next;
            let after = skip_blank(lines, i);
            if after < lines.len() && ListMarker::parse(lines[after]).is_some_and(|m| m.matches(&kind)) {
                i = after;
            } else {
                break;
            }
        }
        out.push(list);
        i
    }

    fn definition_list(&mut self, lines: &[&str], mut i: usize, out: &mut Element) -> usize {
        let mut list = Element::page("list");
        loop {
            let mut label = Element::page("list-item-label");
            self.inline(lines[i].trim(), &mut label);
            let (block, next) = indented_block(lines, i + 1);
            let mut item_body = Element::page("list-item-body");
            self.blocks(&block, &mut item_body);
            list.push(Element::page("list-item").with_child(label).with_child(item_body));
            i = next;
            let after = skip_blank(lines, i);
            let continues = after + 1 < lines.len()
                && indent(lines[after]) == 0
                && !lines[after].starts_with("..")
                && ListMarker::parse(lines[after]).is_none()
                && !lines[after + 1].is_empty()
                && indent(lines[after + 1]) > 0;
            if !continues {
                break;
            }
            i = after;
        }
        out.push(list);
        i
    }

    fn explicit(&mut self, lines: &[&str], i: usize, out: &mut Element) -> usize {
        let (body, next) = indented_block(lines, i + 1);
        if let Some(caps) = DIRECTIVE_RE.captures(lines[i]) {
            let arg = caps.name("arg").map_or("", |m| m.as_str().trim());
            self.directive(&caps["name"], arg, &body, lines[i], out);
        }
        next
    }

    fn directive(&mut self, name: &str, arg: &str, body: &[&str], raw: &str, out: &mut Element) {
        let (options, content) = split_options(body);
        let option = |key: &str| options.iter().find(|(k, _)| *k == key).map(|(_, v)| *v);
        match name {
            "image" | "figure" => {
                let mut object = Element::page("object").with_attr(xlink("href"), object_target(arg));
                if let Some(alt) = option("alt") {
                    object.set_attr(page("alt"), alt);
                }
                for key in ["width", "height"] {
                    if let Some(value) = option(key) {
                        object.set_attr(html(key), value);
                    }
                }
                out.push(object);
                if name == "figure" && !content.is_empty() {
                    self.blocks(content, out);
                }
            }
            "code" | "code-block" | "sourcecode" => {
                out.push(Element::page("blockcode").with_text(content.join("\n")));
            }
            "parser" => out.push(format_part(self.ctx, arg, &content.join("\n"))),
            "contents" => {
                let mut toc = Element::page("table-of-content");
                if let Some(depth) = option("depth").and_then(|d| d.trim().parse::<i64>().ok()) {
                    toc.set_attr(page("outline-level"), depth);
                }
                out.push(toc);
            }
            "include" => out.push(include_element(arg, raw)),
            "macro" => out.push(self.block_macro(arg)),
            "note" | "tip" | "warning" | "important" | "caution" | "attention" | "danger" | "error" | "hint" => {
                let kind = match name {
                    "attention" => "important",
                    "danger" | "error" => "warning",
                    "hint" => "tip",
                    other => other,
                };
                let mut admonition = Element::page("admonition").with_attr(page("type"), kind);
                let mut all: Vec<&str> = Vec::new();
                if !arg.is_empty() {
                    all.extend([arg, ""]);
                }
                all.extend(content.iter().copied());
                self.blocks(&all, &mut admonition);
                out.push(admonition);
            }
            _ => {
                log::warn!("unknown directive {name}");
                let mut alt = raw.to_string();
                for line in body {
                    alt.push('\n');
                    alt.push_str(line);
                }
                out.push(
                    Element::page("part")
                        .with_attr(page("content-type"), format!("x-moin/format;name={name}"))
                        .with_attr(page("alt"), alt)
                        .with_child(error_element(raw)),
                );
            }
        }
    }

    fn block_macro(&self, arg: &str) -> Element {
        let Some(caps) = MACRO_RE.captures(arg) else {
            return error_element(format!(".. macro:: {arg}"));
        };
        let args = caps.name("args").map(|m| m.as_str());
        match &caps["name"] {
            "Include" => include_element(args.unwrap_or(""), arg),
            "TableOfContents" => {
                let mut toc = Element::page("table-of-content");
                if let Some(level) = args.and_then(|a| a.trim().parse::<i64>().ok()) {
                    toc.set_attr(page("outline-level"), level);
                }
                toc
            }
            name => macro_element(name, args, arg, true),
        }
    }

    fn grid_table(&mut self, lines: &[&str], i: usize, out: &mut Element) -> usize {
        let mut end = i;
        while end < lines.len() && (lines[end].starts_with('+') || lines[end].starts_with('|')) {
            end += 1;
        }
        let grid = Grid::new(&lines[i..end]);
        let cells = grid.cells();
        if cells.is_empty() {
            log::warn!("malformed grid table at line {}", i + 1);
            out.push(error_element("malformed table"));
            return end;
        }
        let rows: BTreeSet<usize> = cells.iter().flat_map(|c| [c.top, c.bottom]).collect();
        let cols: BTreeSet<usize> = cells.iter().flat_map(|c| [c.left, c.right]).collect();
        let header_line = grid.header_line();

        let mut header = Element::page("table-header");
        let mut body = Element::page("table-body");
        let mut current: Option<(usize, Element)> = None;
        for cell in &cells {
            if current.as_ref().is_none_or(|(top, _)| *top != cell.top) {
                if let Some((top, row)) = current.take() {
                    push_row(&mut header, &mut body, header_line, top, row);
                }
                current = Some((cell.top, Element::page("table-row")));
            }
            let mut elem = Element::page("table-cell");
            let rowspan = rows.range(cell.top + 1..=cell.bottom).count();
            let colspan = cols.range(cell.left + 1..=cell.right).count();
            if colspan > 1 {
                elem.set_attr(page("number-columns-spanned"), colspan);
            }
            if rowspan > 1 {
                elem.set_attr(page("number-rows-spanned"), rowspan);
            }
            let content = grid.content(cell);
            let mut parsed = Element::page("table-cell");
            self.blocks(&content.iter().map(String::as_str).collect::<Vec<_>>(), &mut parsed);
            hoist_single_paragraph(&mut parsed);
            elem.children = parsed.children;
            if let Some((_, row)) = current.as_mut() {
                row.push(elem);
            }
        }
        if let Some((top, row)) = current {
            push_row(&mut header, &mut body, header_line, top, row);
        }
        let mut table = Element::page("table");
        if !header.children.is_empty() {
            table.push(header);
        }
        table.push(body);
        out.push(table);
        end
    }

    fn simple_table(&mut self, lines: &[&str], i: usize, out: &mut Element) -> usize {
        let border = lines[i];
        let mut columns = Vec::new();
        let mut start = None;
        for (pos, c) in border.char_indices().chain(std::iter::once((border.len(), ' '))) {
            match (c, start) {
                ('=', None) => start = Some(pos),
                (' ', Some(s)) => {
                    columns.push(s);
                    start = None;
                }
                _ => {}
            }
        }

        let mut sections: Vec<Vec<&str>> = vec![Vec::new()];
        let mut j = i + 1;
        while j < lines.len() {
            let line = lines[j];
            j += 1;
            if SIMPLE_TABLE_RE.is_match(line) {
                if j >= lines.len() || lines[j].is_empty() || sections.len() == 2 {
                    break;
                }
                sections.push(Vec::new());
            } else if let Some(section) = sections.last_mut() {
                section.push(line);
            }
        }

        let mut table = Element::page("table");
        let body_rows = sections.pop().unwrap_or_default();
        if let Some(header_rows) = sections.pop() {
            let mut header = Element::page("table-header");
            for row in self.simple_rows(&header_rows, &columns) {
                header.push(row);
            }
            table.push(header);
        }
        let mut body = Element::page("table-body");
        for row in self.simple_rows(&body_rows, &columns) {
            body.push(row);
        }
        table.push(body);
        out.push(table);
        j
    }

    fn simple_rows(&mut self, lines: &[&str], columns: &[usize]) -> Vec<Element> {
        let mut rows: Vec<Vec<String>> = Vec::new();
        for line in lines.iter().filter(|l| !l.trim().is_empty()) {
            let cells: Vec<String> = columns
                .iter()
                .enumerate()
                .map(|(n, start)| {
                    let end = columns.get(n + 1).copied().unwrap_or(line.len());
                    line.get(*start..end.min(line.len())).unwrap_or("").trim().to_string()
                })
                .collect();
            match rows.last_mut() {
                Some(prev) if cells.first().is_some_and(String::is_empty) => {
                    for (p, c) in prev.iter_mut().zip(cells) {
                        if !c.is_empty() {
                            if !p.is_empty() {
                                p.push(' ');
                            }
                            p.push_str(&c);
                        }
                    }
                }
                _ => rows.push(cells),
            }
        }
        rows.into_iter()
            .map(|cells| {
                let mut row = Element::page("table-row");
                for text in cells {
                    let mut cell = Element::page("table-cell");
                    self.inline(&text, &mut cell);
                    row.push(cell);
                }
                row
            })
            .collect()
    }

    fn inline(&mut self, text: &str, out: &mut Element) {
        let mut pos = 0;
        for caps in INLINE_RE.captures_iter(text) {
            let Some(m) = caps.get(0) else {
                continue;
            };
            out.push_text(&text[pos..m.start()]);
            pos = m.end();
            self.inline_match(&caps, &text[m.end()..], out);
        }
        out.push_text(&text[pos..]);
    }

    fn inline_match(&mut self, caps: &Captures<'_>, after: &str, out: &mut Element) {
        if let Some(c) = caps.name("escaped") {
            out.push_text(c.as_str());
        } else if let Some(code) = caps.name("literal") {
            out.push(Element::page("code").with_text(code.as_str()));
        } else if let Some(text) = caps.name("strong") {
            out.push(Element::page("strong").with_text(text.as_str()));
        } else if let Some(text) = caps.name("emph") {
            out.push(Element::page("emphasis").with_text(text.as_str()));
        } else if let Some(role) = caps.name("role") {
            out.push(role_element(role.as_str(), &caps["role_text"]));
        } else if let Some(phrase) = caps.name("phrase") {
            let text = phrase.as_str().trim();
            let href = match (caps.name("phrase_uri"), caps.name("phrase_ref")) {
                (Some(uri), _) => Some(link_target(uri.as_str().trim())),
                (None, Some(_)) => Some(self.reference(text)),
                (None, None) => None,
            };
            match href {
                Some(href) => out.push(Element::page("a").with_attr(xlink("href"), href).with_text(text)),
                None => out.push(Element::page("emphasis").with_text(text)),
            }
        } else if let Some(label) = caps.name("footref") {
            match self.footnote(label.as_str()) {
                Some(note) => out.push(note),
                None => out.push_text(&caps[0]),
            }
        } else if let Some(url) = caps.name("url") {
            out.push(
                Element::page("a")
                    .with_attr(xlink("href"), Iri::parse(url.as_str()))
                    .with_text(url.as_str()),
            );
        } else if let Some(name) = caps.name("ref") {
            if after.starts_with(|c: char| c.is_alphanumeric()) {
                out.push_text(&caps[0]);
            } else {
                let href = self.reference(name.as_str());
                out.push(Element::page("a").with_attr(xlink("href"), href).with_text(name.as_str()));
            }
        }
    }

    /// Resolve a reference name: a declared target, else a wiki page.
    fn reference(&self, name: &str) -> Iri {
        match self.targets.get(&ref_name(name)) {
            Some(uri) => link_target(uri),
            None => link_target(name),
        }
    }

    fn footnote(&mut self, label: &str) -> Option<Element> {
        let text = match label {
            "#" | "*" => {
                let text = self.footnotes.auto.get(self.footnotes.next_auto).cloned();
                self.footnotes.next_auto += 1;
                text
            }
            label => self.footnotes.labeled.get(label).cloned(),
        }?;
        let mut note_body = Element::page("note-body");
        self.inline(&text, &mut note_body);
        Some(
            Element::page("note")
                .with_attr(page("note-class"), "footnote")
                .with_child(note_body),
        )
    }
}

fn role_element(role: &str, text: &str) -> Element {
    match role {
        "sub" | "subscript" => Element::page("span")
            .with_attr(page("baseline-shift"), "sub")
            .with_text(text),
        "sup" | "superscript" => Element::page("span")
            .with_attr(page("baseline-shift"), "super")
            .with_text(text),
        "code" | "literal" => Element::page("code").with_text(text),
        "strong" => Element::page("strong").with_text(text),
        _ => Element::page("emphasis").with_text(text),
    }
}

/// Leading `:key: value` lines of a directive body and the content after them.
fn split_options<'b, 't>(body: &'b [&'t str]) -> (Vec<(&'t str, &'t str)>, &'b [&'t str]) {
    let mut options = Vec::new();
    let mut i = 0;
    while let Some(caps) = body.get(i).and_then(|l| OPTION_RE.captures(l)) {
        let key = caps.name("key").map_or("", |m| m.as_str());
        let value = caps.name("value").map_or("", |m| m.as_str());
        options.push((key, value));
        i += 1;
    }
    (options, &body[skip_blank(body, i)..])
}

fn push_row(header: &mut Element, body: &mut Element, header_line: Option<usize>, top: usize, row: Element) {
    match header_line {
        Some(line) if top < line => header.push(row),
        _ => body.push(row),
    }
}

/// A cell whose content is one paragraph keeps the paragraph's children.
fn hoist_single_paragraph(cell: &mut Element) {
    if cell.children.len() == 1
        && let Some(Node::Element(p)) = cell.children.first()
        && p.is_page("p")
    {
        let children = p.children.clone();
        cell.children = children;
    }
}

struct GridCell {
    top: usize,
    left: usize,
    bottom: usize,
    right: usize,
}

/// Character grid of a grid table.
struct Grid {
    rows: Vec<Vec<char>>,
    width: usize,
}

impl Grid {
    fn new(lines: &[&str]) -> Self {
        let width = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);
        let rows = lines
            .iter()
            .map(|l| {
                let mut row: Vec<char> = l.chars().collect();
                row.resize(width, ' ');
                row
            })
            .collect();
        Self { rows, width }
    }

    fn at(&self, row: usize, col: usize) -> char {
        self.rows.get(row).and_then(|r| r.get(col)).copied().unwrap_or(' ')
    }

    /// Index of the `+===+` line separating header rows from the body.
    fn header_line(&self) -> Option<usize> {
        self.rows
            .iter()
            .position(|r| r.contains(&'=') && r.iter().all(|c| matches!(c, '+' | '=')))
    }

    /// Every cell, ordered by top edge then left edge.
    fn cells(&self) -> Vec<GridCell> {
        let mut corners = BTreeSet::from([(0, 0)]);
        let mut done = HashSet::new();
        let mut cells = Vec::new();
        while let Some((top, left)) = corners.pop_first() {
            if !done.insert((top, left)) || top + 1 >= self.rows.len() || left + 1 >= self.width {
                continue;
            }
            if let Some((bottom, right)) = self.scan_cell(top, left) {
                corners.insert((top, right));
                corners.insert((bottom, left));
                cells.push(GridCell { top, left, bottom, right });
            }
        }
        cells.sort_by_key(|c| (c.top, c.left));
        cells
    }

    fn scan_cell(&self, top: usize, left: usize) -> Option<(usize, usize)> {
        if self.at(top, left) != '+' {
            return None;
        }
        for right in left + 1..self.width {
            match self.at(top, right) {
                '+' => {
                    for bottom in top + 1..self.rows.len() {
                        match self.at(bottom, right) {
                            '+' if self.closes(top, left, bottom, right) => return Some((bottom, right)),
                            '+' | '|' => {}
                            _ => break,
                        }
                    }
                }
                '-' | '=' => {}
                _ => return None,
            }
        }
        None
    }

    fn closes(&self, top: usize, left: usize, bottom: usize, right: usize) -> bool {
        (left..=right).all(|c| matches!(self.at(bottom, c), '-' | '=' | '+'))
            && (top..=bottom).all(|r| matches!(self.at(r, left), '|' | '+'))
    }

    fn content(&self, cell: &GridCell) -> Vec<String> {
        let mut lines: Vec<String> = (cell.top + 1..cell.bottom)
            .map(|r| {
                self.rows[r][cell.left + 1..cell.right]
                    .iter()
                    .collect::<String>()
                    .trim_end()
                    .to_string()
            })
            .collect();
        let common = lines
            .iter()
            .filter(|l| !l.is_empty())
            .map(|l| indent(l))
            .min()
            .unwrap_or(0);
        for line in &mut lines {
            if !line.is_empty() {
                line.drain(..common);
            }
        }
        while lines.last().is_some_and(String::is_empty) {
            lines.pop();
        }
        while lines.first().is_some_and(String::is_empty) {
            lines.remove(0);
        }
        lines
    }
}
