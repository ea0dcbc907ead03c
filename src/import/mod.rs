//! Input converters: every dialect to the intermediate tree.
//!
//! The line-oriented wiki parsers share two pieces of machinery:
//! - [`ParseStack`]: the stack of currently open containers. Popping an
//!   element appends it to its parent, so the finished tree falls out of
//!   the bottom of the stack.
//! - [`Lines`]: a line iterator with push back, so a block handler can read
//!   ahead and return a line it does not own to the main loop.

mod archive;
mod code;
mod creole;
mod csv;
mod docbook;
mod html;
mod image;
mod mediawiki;
mod moinwiki;
mod rst;
mod sink;
mod text;

pub use archive::ArchiveParser;
pub use code::CodeParser;
pub use creole::CreoleParser;
pub use self::csv::CsvParser;
pub use docbook::DocBookParser;
pub use html::HtmlParser;
pub use image::ImageParser;
pub use mediawiki::MediaWikiParser;
pub use moinwiki::MoinWikiParser;
pub use rst::RstParser;
pub use text::TextParser;

use crate::args::ArgParser;
use crate::iri::Iri;
use crate::mime::{self, Type};
use crate::pipeline::ConvertOptions;
use crate::registry::{ConvertContext, Payload, Priority, Registry};
use crate::transform::include::{SortOrder, XPointer};
use crate::transform::macros::{arguments_to_element, macro_element};
use crate::tree::{Element, Node, PAGE_URI, error_element, page, xinclude};

/// Register every input converter.
pub fn register(registry: &mut Registry) {
    let doc = mime::moin_document();
    registry.register(|_, _| Box::new(MoinWikiParser), mime::moin_wiki(), doc.clone(), Priority::MIDDLE);
    registry.register(|_, _| Box::new(CreoleParser), mime::moin_creole(), doc.clone(), Priority::MIDDLE);
    registry.register(|_, _| Box::new(MediaWikiParser), mime::mediawiki(), doc.clone(), Priority::MIDDLE);
    registry.register(|_, _| Box::new(RstParser), mime::rst(), doc.clone(), Priority::MIDDLE);
    registry.register(|_, _| Box::new(DocBookParser), mime::docbook(), doc.clone(), Priority::MIDDLE);
    for html_type in [mime::moin_xhtml(), mime::xhtml(), mime::html()] {
        registry.register(|_, _| Box::new(HtmlParser), html_type, doc.clone(), Priority::MIDDLE);
    }
    registry.register(|_, _| Box::new(CsvParser), mime::csv(), doc.clone(), Priority::MIDDLE);
    registry.register(|_, _| Box::new(ArchiveParser), mime::zip(), doc.clone(), Priority::MIDDLE);
    for subtype in ["png", "jpeg", "gif", "svg+xml"] {
        registry.register(
            |_, _| Box::new(ImageParser),
            Type::new("image", subtype),
            doc.clone(),
            Priority::MIDDLE,
        );
    }
    for &(subtype, language) in code::LANGUAGES {
        registry.register(
            move |_, _| Box::new(CodeParser { language }),
            Type::new("text", subtype),
            doc.clone(),
            Priority::MIDDLE,
        );
    }
    registry.register(|_, _| Box::new(TextParser), mime::text_any(), doc, Priority::LAST);
}

/// Map a `#!name` parser directive to a content type.
pub fn format_type(name: &str) -> Type {
    match name {
        "wiki" | "moin" => mime::moin_wiki(),
        "creole" | "text_creole" => mime::moin_creole(),
        "mediawiki" => mime::mediawiki(),
        "irc" | "irclog" => Type::new("text", "x-irclog"),
        "rst" => mime::rst(),
        "docbook" => mime::docbook(),
        "html" | "xhtml" => mime::html(),
        "csv" => mime::csv(),
        "text" | "plain" => mime::text_plain(),
        other => Type::parse(other).unwrap_or_else(|_| Type::new("text", &format!("x-{other}"))),
    }
}

/// `{{{#!name args` block: convert the content with the parser `name`
/// selects and keep the raw text as `alt`.
pub(crate) fn format_part(ctx: &ConvertContext<'_>, directive: &str, content: &str) -> Element {
    let (name, raw_args) = match directive.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (directive, ""),
    };
    let args = ArgParser::wiki().parse(raw_args).unwrap_or_default();
    let mut part = Element::page("part")
        .with_attr(page("content-type"), format!("x-moin/format;name={name}"))
        .with_attr(page("alt"), content);
    if !args.is_empty() {
        part.push(arguments_to_element(&args));
    }

    let input = format_type(name);
    let doc = mime::moin_document();
    let options = ConvertOptions {
        arguments: Some(args),
        ..ctx.options.clone()
    };
    let nested = ConvertContext {
        registry: ctx.registry,
        host: ctx.host,
        options: &options,
    };
    let converted = ctx
        .registry
        .require(&input, &doc)
        .and_then(|converter| converter.convert(Payload::Text(content.to_string()), &nested))
        .and_then(Payload::into_tree);
    match converted {
        Ok(tree) => {
            let body = tree
                .find_page("body")
                .cloned()
                .unwrap_or_else(|| Element::page("body"));
            part.push(body);
        }
        Err(e) => {
            log::warn!("format {name}: {e}");
            part.push(error_element(format!("{{{{{{#!{directive}")));
        }
    }
    part
}

/// `xi:include` for `<<Include(pagename, heading, level, ...)>>`.
pub(crate) fn include_element(raw: &str, alt: &str) -> Element {
    let args = ArgParser::new().parse(raw).unwrap_or_default();
    let Some(pagename) = args.positional.first().filter(|p| !p.is_empty()) else {
        log::warn!("Include without page name: {alt}");
        return macro_element("Include", Some(raw), alt, true);
    };
    let heading = args
        .get("heading")
        .or_else(|| args.positional.get(1).map(String::as_str));
    let level = args
        .get("level")
        .or_else(|| args.positional.get(2).map(String::as_str))
        .and_then(|l| l.trim().parse::<i64>().ok());

    let mut include = Element::new(xinclude("include"));
    let mut pointer = XPointer::default();
    if pagename.starts_with('^') {
        pointer.pages = Some(pagename.clone());
        if args.get("sort") == Some("descending") {
            pointer.sort = SortOrder::Descending;
        }
        pointer.items = args.get("items").and_then(|n| n.trim().parse().ok());
        pointer.skipitems = args.get("skipitems").and_then(|n| n.trim().parse().ok());
    } else {
        include.set_attr(
            xinclude("href"),
            Iri::new().with_scheme("wiki.local").with_path(pagename.as_str()),
        );
    }
    pointer.heading = heading.map(|h| if h == "heading" { String::new() } else { h.to_string() });
    pointer.level = level;
    if pointer != XPointer::default() {
        include.set_attr(
            xinclude("xpointer"),
            format!("xmlns(page={PAGE_URI}) {}", pointer.to_xpointer()),
        );
    }
    include
}

/// An open container on the parse stack.
#[derive(Debug)]
pub(crate) struct Frame {
    pub elem: Element,
    /// Indentation that opened the container (lists only).
    pub level: usize,
    /// Marker kind that opened the container (lists only).
    pub kind: Option<String>,
}

/// Stack of open containers; the bottom element is never popped.
#[derive(Debug)]
pub(crate) struct ParseStack {
    frames: Vec<Frame>,
}

impl ParseStack {
    pub fn new(root: Element) -> Self {
        Self {
            frames: vec![Frame {
                elem: root,
                level: 0,
                kind: None,
            }],
        }
    }

    pub fn push(&mut self, elem: Element) {
        self.push_frame(elem, 0, None);
    }

    pub fn push_frame(&mut self, elem: Element, level: usize, kind: Option<String>) {
        self.frames.push(Frame { elem, level, kind });
    }

    /// Close the top container into its parent.
    pub fn pop(&mut self) {
        if self.frames.len() > 1
            && let Some(frame) = self.frames.pop()
        {
            self.top_mut().push(frame.elem);
        }
    }

    /// Pop until the top is one of the page-namespace `names` or the root.
    pub fn pop_until(&mut self, names: &[&str]) {
        while self.frames.len() > 1 && !self.top_check(names) {
            self.pop();
        }
    }

    pub fn top(&self) -> &Frame {
        &self.frames[self.frames.len() - 1]
    }

    pub fn top_mut(&mut self) -> &mut Element {
        let last = self.frames.len() - 1;
        &mut self.frames[last].elem
    }

    /// Whether the top element is one of the page-namespace `names`.
    pub fn top_check(&self, names: &[&str]) -> bool {
        self.top()
            .elem
            .page_local()
            .is_some_and(|local| names.contains(&local))
    }

    /// Whether any open container is one of `names`.
    pub fn contains(&self, names: &[&str]) -> bool {
        self.frames.iter().any(|f| {
            f.elem
                .page_local()
                .is_some_and(|local| names.contains(&local))
        })
    }

    pub fn append(&mut self, node: impl Into<Node>) {
        self.top_mut().push(node);
    }

    /// Close everything and return the root.
    pub fn finish(mut self) -> Element {
        while self.frames.len() > 1 {
            self.pop();
        }
        self.frames.remove(0).elem
    }
}

/// Line iterator with push back.
pub(crate) struct Lines<'a> {
    inner: std::str::Lines<'a>,
    pushed: Vec<&'a str>,
}

impl<'a> Lines<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            inner: text.lines(),
            pushed: Vec::new(),
        }
    }

    pub fn push_back(&mut self, line: &'a str) {
        self.pushed.push(line);
    }
}

impl<'a> Iterator for Lines<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        self.pushed.pop().or_else(|| self.inner.next())
    }
}

/// Build a table from rows of plain cell text.
pub(crate) fn build_table(rows: Vec<Vec<String>>) -> Element {
    let mut body = Element::page("table-body");
    for row in rows {
        let mut elem = Element::page("table-row");
        for cell in row {
            elem.push(Element::page("table-cell").with_text(cell));
        }
        body.push(elem);
    }
    Element::page("table").with_child(body)
}

/// Wrap block content in `page/body`.
pub(crate) fn page_with_body(page_href: Option<&crate::iri::Iri>, body: Element) -> Element {
    crate::tree::new_page(page_href).with_child(body)
}
