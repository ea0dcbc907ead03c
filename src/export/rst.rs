//! reStructuredText emitter.
//!
//! Blocks are rendered to chunks that end in a newline and are joined with
//! one blank line. Nested structures (list items, admonitions, footnote
//! bodies, table cells) render their content the same way and then indent
//! or frame the resulting lines. Footnotes become auto-numbered `[#]_`
//! references with their bodies listed at the end of the document.

use crate::args::ArgParser;
use crate::error::Result;
use crate::iri::Iri;
use crate::registry::{ConvertContext, Converter, Payload};
use crate::transform::macros::{element_arguments, macro_name};
use crate::tree::{Element, Namespace, Node};

use super::moinwiki::{format_name, include_macro, table_rows};

/// Overline/underline characters by heading level.
const HEADING_CHARS: [char; 14] = ['=', '-', '`', ':', '\'', '"', '~', '^', '_', '*', '+', '#', '<', '>'];

/// Emitter for `text/rst`.
pub struct RstExporter;

impl Converter for RstExporter {
    fn convert(&self, input: Payload, _ctx: &ConvertContext<'_>) -> Result<Payload> {
        let tree = input.into_tree()?;
        let mut writer = RstWriter::default();
        let mut chunks = Vec::new();
        if is_block(&tree) {
            writer.block(&tree, &mut chunks);
        } else {
            chunks.push(writer.inline_element(&tree));
        }
        for body in std::mem::take(&mut writer.footnotes) {
            chunks.push(format!("{}\n", indent_tail(&format!(".. [#] {body}"), 3)));
        }
        Ok(Payload::Text(chunks.join("\n")))
    }
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

/// Indent every line after the first; blank lines stay empty.
fn indent_tail(text: &str, width: usize) -> String {
    let pad = " ".repeat(width);
    let mut out = String::new();
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
            if !line.is_empty() {
                out.push_str(&pad);
            }
        }
        out.push_str(line);
    }
    out
}

fn indent_all(text: &str, width: usize) -> String {
    let pad = " ".repeat(width);
    text.split('\n')
        .map(|line| if line.is_empty() { String::new() } else { format!("{pad}{line}") })
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Default)]
struct RstWriter {
    footnotes: Vec<String>,
}

impl RstWriter {
    fn block(&mut self, elem: &Element, chunks: &mut Vec<String>) {
        if elem.is(&Namespace::XInclude, "include") {
            chunks.push(format!(".. macro:: {}\n", include_macro(elem)));
            return;
        }
        match elem.page_local() {
            Some("page" | "body" | "div") => self.container(elem, chunks),
            Some("h") => self.heading(elem, chunks),
            Some("p") => {
                let text = self.inlines(&elem.children);
                push_text_chunk(&text, chunks);
            }
            Some("separator") => chunks.push("----\n".to_string()),
            Some("blockcode") => chunks.push(literal_block("::", &elem.text())),
            Some("list") => {
                let list = self.list(elem);
                if !list.is_empty() {
                    chunks.push(list);
                }
            }
            Some("table") => chunks.push(self.table(elem)),
            Some("table-of-content") => match elem.page_int("outline-level") {
                Some(depth) => chunks.push(format!(".. contents::\n   :depth: {depth}\n")),
                None => chunks.push(".. contents::\n".to_string()),
            },
            Some("part") => self.part(elem, chunks),
            Some("blockquote") => {
                let inner = self.render_blocks(elem);
                if !inner.is_empty() {
                    chunks.push(format!("{}\n", indent_all(&inner, 4)));
                }
            }
            Some("admonition") => {
                let kind = elem.page_attr("type").unwrap_or_else(|| "note".to_string());
                let inner = self.render_blocks(elem);
                chunks.push(format!(".. {kind}::\n\n{}\n", indent_all(&inner, 3)));
            }
            _ => {
                let text = self.inline_element(elem);
                push_text_chunk(&text, chunks);
            }
        }
    }

    /// Block content of `elem` as one string without the final newline.
    fn render_blocks(&mut self, elem: &Element) -> String {
        let mut chunks = Vec::new();
        self.container(elem, &mut chunks);
        chunks.join("\n").trim_end_matches('\n').to_string()
    }

    fn container(&mut self, elem: &Element, chunks: &mut Vec<String>) {
        let mut run = String::new();
        for child in &elem.children {
            match child {
                Node::Element(e) if e.is_page("object") && elem.page_local() == Some("body") => {
                    push_text_chunk(&std::mem::take(&mut run), chunks);
                    chunks.push(image_directive(e));
                }
                Node::Element(e) if is_block(e) => {
                    push_text_chunk(&std::mem::take(&mut run), chunks);
                    self.block(e, chunks);
                }
                Node::Element(e) if e.is_page("arguments") => {}
                other => {
                    let text = self.inline(other);
                    run.push_str(&text);
                }
            }
        }
        push_text_chunk(&run, chunks);
    }

    fn heading(&mut self, elem: &Element, chunks: &mut Vec<String>) {
        let level = elem.page_int("outline-level").unwrap_or(1).clamp(1, 6) as usize;
        let text = self.inlines(&elem.children).replace('\n', " ");
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let rule: String = std::iter::repeat_n(HEADING_CHARS[level], text.chars().count()).collect();
        chunks.push(format!("{rule}\n{text}\n{rule}\n"));
    }

    fn part(&mut self, elem: &Element, chunks: &mut Vec<String>) {
        if let Some(name) = format_name(elem) {
            let args = ArgParser::wiki().unparse(&element_arguments(elem));
            let head = if args.is_empty() {
                format!(".. parser:: {name}")
            } else {
                format!(".. parser:: {name} {args}")
            };
            let content = elem.page_attr("alt").unwrap_or_default();
            chunks.push(literal_block(&head, &content));
        } else if macro_name(elem).is_some() {
            chunks.push(format!(".. macro:: {}\n", macro_call(elem)));
        } else {
            self.container(elem, chunks);
        }
    }

    fn list(&mut self, elem: &Element) -> String {
        let generate = elem.page_attr("item-label-generate");
        let first_marker = match (generate.as_deref(), elem.page_attr("list-style-type").as_deref()) {
            (Some("ordered"), Some("lower-alpha")) => Some("a."),
            (Some("ordered"), Some("upper-alpha")) => Some("A."),
            (Some("ordered"), Some("lower-roman")) => Some("i."),
            (Some("ordered"), Some("upper-roman")) => Some("I."),
            (Some("ordered"), _) => Some("1."),
            (Some(_), _) => Some("*"),
            (None, _) => None,
        };
        let mut items = Vec::new();
        for (i, item) in elem.child_elements().filter(|e| e.is_page("list-item")).enumerate() {
            let body = match item.find_page("list-item-body") {
                Some(body) => self.render_blocks(body),
                None => String::new(),
            };
            let rendered = match first_marker {
                Some(first) => {
                    let marker = if i > 0 && first.ends_with('.') { "#." } else { first };
                    indent_tail(&format!("{marker} {body}"), marker.len() + 1)
                }
                None => {
                    let label = item
                        .find_page("list-item-label")
                        .map(|l| self.inlines(&l.children).replace('\n', " "));
                    match label {
                        Some(label) if !label.trim().is_empty() => {
                            format!("{}\n{}", label.trim(), indent_all(&body, 2))
                        }
                        _ => indent_all(&body, 2),
                    }
                }
            };
            items.push(format!("{}\n", rendered.trim_end()));
        }
        items.join("\n")
    }

    fn table(&mut self, elem: &Element) -> String {
        let header_rows = elem
            .find_page("table-header")
            .map_or(0, |h| h.child_elements().filter(|e| e.is_page("table-row")).count());
        let mut grid = Grid::default();
        for row in table_rows(elem) {
            grid.add_row();
            for cell in row.child_elements().filter(|e| e.is_page("table-cell")) {
                let text = self.render_blocks(cell);
                let rowspan = cell.page_int("number-rows-spanned").unwrap_or(1).max(1) as usize;
                let colspan = cell.page_int("number-columns-spanned").unwrap_or(1).max(1) as usize;
                grid.add_cell(text, rowspan, colspan);
            }
        }
        format!("{}\n", grid.render(header_rows))
    }

    fn inlines(&mut self, nodes: &[Node]) -> String {
        let mut out = String::new();
        for node in nodes {
            let text = self.inline(node);
            out.push_str(&text);
        }
        out
    }

    fn inline(&mut self, node: &Node) -> String {
        match node {
            Node::Text(text) => text.clone(),
            Node::Element(e) => self.inline_element(e),
        }
    }

    fn inline_element(&mut self, elem: &Element) -> String {
        if elem.name.ns != Namespace::Page {
            return self.inlines(&elem.children);
        }
        match elem.name.local.as_ref() {
            "emphasis" => format!("*{}*", self.inlines(&elem.children)),
            "strong" => format!("**{}**", self.inlines(&elem.children)),
            "code" => format!("``{}``", elem.text()),
            "span" => match elem.page_attr("baseline-shift").as_deref() {
                Some("super") => format!(":sup:`{}`", elem.text()),
                Some("sub") => format!(":sub:`{}`", elem.text()),
                _ => self.inlines(&elem.children),
            },
            "a" => {
                let text = elem.text();
                match elem.href() {
                    Some(href) => format!("`{text} <{}>`_", link_target(href)),
                    None => text,
                }
            }
            "object" => elem.page_attr("alt").unwrap_or_default(),
            "line-break" => "\n\n".to_string(),
            "note" => {
                let body = match elem.find_page("note-body") {
                    Some(body) => self.render_blocks(body),
                    None => String::new(),
                };
                self.footnotes.push(body);
                " [#]_".to_string()
            }
            "inline-part" => {
                if macro_name(elem).is_some() {
                    macro_call(elem)
                } else {
                    let mut out = String::new();
                    for child in elem.child_elements().filter(|e| !e.is_page("arguments")) {
                        let text = self.inline_element(child);
                        out.push_str(&text);
                    }
                    out
                }
            }
            "error" | "arguments" => {
                log::debug!("dropping {} from reST output", elem.name);
                String::new()
            }
            "p" | "page" | "body" | "div" | "list-item-body" | "table-cell" | "note-body" | "list-item-label" => {
                self.inlines(&elem.children)
            }
            other => {
                log::warn!("unknown element {other} in reST output");
                self.inlines(&elem.children)
            }
        }
    }
}

fn push_text_chunk(text: &str, chunks: &mut Vec<String>) {
    let text = text.trim_matches('\n');
    if text.trim().is_empty() {
        return;
    }
    chunks.push(format!("{text}\n"));
}

/// `head` followed by `content` as an indented literal block.
fn literal_block(head: &str, content: &str) -> String {
    let mut out = format!("{head}\n\n");
    for line in content.split('\n') {
        if !line.is_empty() {
            out.push_str("  ");
            out.push_str(line);
        }
        out.push('\n');
    }
    out
}

fn image_directive(elem: &Element) -> String {
    let target = elem.href().map(link_target).unwrap_or_default();
    let mut out = format!(".. image:: {target}\n");
    if let Some(alt) = elem.page_attr("alt") {
        out.push_str(&format!("   :alt: {alt}\n"));
    }
    for key in ["width", "height"] {
        if let Some(value) = elem.get(&Namespace::Html, key) {
            out.push_str(&format!("   :{key}: {value}\n"));
        }
    }
    out
}

fn macro_call(elem: &Element) -> String {
    if let Some(alt) = elem.page_attr("alt") {
        return alt;
    }
    let name = macro_name(elem).unwrap_or_default();
    format!("<<{name}({})>>", ArgParser::new().unparse(&element_arguments(elem)))
}

fn link_target(href: &Iri) -> String {
    match href.scheme_str() {
        "wiki.local" => {
            let mut target = href.path_str().to_string();
            if let Some(fragment) = &href.fragment {
                target.push('#');
                target.push_str(fragment);
            }
            target
        }
        _ => href.to_string(),
    }
}

#[derive(Debug)]
struct GridCell {
    text: String,
    row: usize,
    col: usize,
    rowspan: usize,
    colspan: usize,
}

/// Table model with row and column spans.
#[derive(Debug, Default)]
struct Grid {
    /// Occupied slots per row.
    rows: Vec<Vec<bool>>,
    cells: Vec<GridCell>,
    current: Option<usize>,
}

impl Grid {
    /// Move to the next row; it may already exist when a span reached it.
    fn add_row(&mut self) {
        let row = self.current.map_or(0, |r| r + 1);
        while self.rows.len() <= row {
            self.rows.push(Vec::new());
        }
        self.current = Some(row);
    }

    /// First column of the current row not covered by a row span from above.
    fn next_free(&self, row: usize) -> usize {
        let mut col = 0;
        while self.rows[row].get(col).copied().unwrap_or(false) {
            col += 1;
        }
        col
    }

    fn add_cell(&mut self, text: String, rowspan: usize, colspan: usize) {
        let Some(row) = self.current else {
            return;
        };
        let col = self.next_free(row);
        self.cells.push(GridCell {
            text,
            row,
            col,
            rowspan,
            colspan,
        });
        for r in 0..rowspan {
            while self.rows.len() <= row + r {
                self.rows.push(Vec::new());
            }
            let slots = &mut self.rows[row + r];
            if slots.len() < col + colspan {
                slots.resize(col + colspan, false);
            }
            slots[col..col + colspan].fill(true);
        }
    }

    /// Fill holes with empty cells so every row has the same width.
    fn normalize(&mut self) {
        let width = self.rows.iter().map(Vec::len).max().unwrap_or(0);
        for (row, slots) in self.rows.iter_mut().enumerate() {
            slots.resize(width, false);
            for (col, taken) in slots.iter_mut().enumerate() {
                if !*taken {
                    *taken = true;
                    self.cells.push(GridCell {
                        text: String::new(),
                        row,
                        col,
                        rowspan: 1,
                        colspan: 1,
                    });
                }
            }
        }
    }

    /// Column widths (padding included) and row heights in text lines.
    fn measure(&self, ncols: usize) -> (Vec<usize>, Vec<usize>) {
        let mut widths = vec![2; ncols];
        let mut heights = vec![1; self.rows.len()];
        let mut cells: Vec<&GridCell> = self.cells.iter().collect();
        cells.sort_by_key(|c| (c.colspan, c.rowspan));
        for cell in cells {
            let lines: Vec<&str> = cell.text.split('\n').collect();
            let need_w = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0) + 2;
            let cols = cell.col..cell.col + cell.colspan;
            let have_w: usize = widths[cols.clone()].iter().sum::<usize>() + cell.colspan - 1;
            if need_w > have_w {
                widths[cols.end - 1] += need_w - have_w;
            }
            let need_h = lines.len();
            let rows = cell.row..(cell.row + cell.rowspan).min(heights.len());
            let have_h: usize = heights[rows.clone()].iter().sum::<usize>() + rows.len().saturating_sub(1);
            if need_h > have_h {
                heights[rows.end - 1] += need_h - have_h;
            }
        }
        (widths, heights)
    }

    /// Draw the grid: every cell paints its frame onto a character canvas,
    /// then `+` goes on each cell's corners and wherever a cell's side
    /// crosses a row boundary.
    fn render(mut self, header_rows: usize) -> String {
        self.normalize();
        let ncols = self.rows.first().map_or(0, Vec::len);
        if ncols == 0 {
            return String::new();
        }
        let (widths, heights) = self.measure(ncols);
        let mut xs = vec![0];
        for w in &widths {
            xs.push(xs[xs.len() - 1] + w + 1);
        }
        let mut ys = vec![0];
        for h in &heights {
            ys.push(ys[ys.len() - 1] + h + 1);
        }
        let (width, height) = (xs[ncols] + 1, ys[heights.len()] + 1);
        let mut canvas = vec![vec![' '; width]; height];

        let frames: Vec<(usize, usize, usize, usize)> = self
            .cells
            .iter()
            .map(|cell| {
                let last_row = (cell.row + cell.rowspan).min(heights.len());
                (xs[cell.col], xs[cell.col + cell.colspan], ys[cell.row], ys[last_row])
            })
            .collect();
        let header_y = (header_rows > 0).then(|| ys[header_rows.min(heights.len())]);

        for &(x0, x1, y0, y1) in &frames {
            for y in [y0, y1] {
                let ruler = if Some(y) == header_y { '=' } else { '-' };
                for x in x0..=x1 {
                    if canvas[y][x] != '=' {
                        canvas[y][x] = ruler;
                    }
                }
            }
            for row in canvas.iter_mut().take(y1 + 1).skip(y0) {
                row[x0] = '|';
                row[x1] = '|';
            }
        }
        for (cell, &(x0, x1, y0, y1)) in self.cells.iter().zip(&frames) {
            for (i, line) in cell.text.split('\n').enumerate() {
                let y = y0 + 1 + i;
                if y >= y1 {
                    break;
                }
                for (j, ch) in line.chars().enumerate() {
                    let x = x0 + 2 + j;
                    if x < x1 {
                        canvas[y][x] = ch;
                    }
                }
            }
        }
        for &(x0, x1, y0, y1) in &frames {
            for &y in ys.iter().filter(|&&y| y >= y0 && y <= y1) {
                canvas[y][x0] = '+';
                canvas[y][x1] = '+';
            }
        }
        canvas
            .into_iter()
            .map(|row| row.into_iter().collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;
    use crate::pipeline::{ConvertOptions, default_registry};
    use crate::transform::macros::macro_element;
    use crate::tree::{page, xlink};

    fn emit(tree: Element) -> String {
        let registry = default_registry();
        let host = MemoryHost::new();
        let options = ConvertOptions::default();
        let ctx = ConvertContext {
            registry: &registry,
            host: &host,
            options: &options,
        };
        RstExporter
            .convert(Payload::Tree(tree), &ctx)
            .unwrap()
            .into_text()
            .unwrap()
    }

    fn body(children: Vec<Element>) -> Element {
        Element::page("page").with_child(Element::page("body").with_children(children))
    }

    fn p(text: &str) -> Element {
        Element::page("p").with_text(text)
    }

    fn item(children: Vec<Element>) -> Element {
        Element::page("list-item").with_child(Element::page("list-item-body").with_children(children))
    }

    fn cell(text: &str) -> Element {
        Element::page("table-cell").with_text(text)
    }

    #[test]
    fn test_paragraphs() {
        assert_eq!(emit(p("Text")), "Text\n");
        assert_eq!(emit(body(vec![p("Text"), p("Text")])), "Text\n\nText\n");
        let body = Element::page("body")
            .with_child(p("A"))
            .with_child(p("B"))
            .with_child("C")
            .with_child(p("D"));
        assert_eq!(emit(Element::page("page").with_child(body)), "A\n\nB\n\nC\n\nD\n");
    }

    #[test]
    fn test_inline_markup() {
        assert_eq!(emit(Element::page("strong").with_text("strong")), "**strong**");
        assert_eq!(emit(Element::page("emphasis").with_text("emphasis")), "*emphasis*");
        assert_eq!(emit(Element::page("code").with_text("monospace")), "``monospace``");
    }

    #[test]
    fn test_separator_and_blockcode() {
        assert_eq!(emit(body(vec![p("A"), Element::page("separator"), p("B")])), "A\n\n----\n\nB\n");
        assert_eq!(
            emit(body(vec![Element::page("blockcode").with_text("blockcode")])),
            "::\n\n  blockcode\n"
        );
    }

    #[test]
    fn test_headings() {
        let h1 = Element::page("h").with_attr(page("outline-level"), 1).with_text("Title");
        let h2 = Element::page("h").with_attr(page("outline-level"), 2).with_text("Sub");
        assert_eq!(emit(body(vec![h1, h2])), "-----\nTitle\n-----\n\n```\nSub\n```\n");
    }

    #[test]
    fn test_nested_lists() {
        let roman = Element::page("list")
            .with_attr(page("item-label-generate"), "ordered")
            .with_attr(page("list-style-type"), "upper-roman")
            .with_child(item(vec![p("E")]))
            .with_child(item(vec![p("F")]));
        let ordered = Element::page("list")
            .with_attr(page("item-label-generate"), "ordered")
            .with_child(item(vec![p("C")]))
            .with_child(item(vec![p("D"), roman]));
        let list = Element::page("list")
            .with_attr(page("item-label-generate"), "unordered")
            .with_child(item(vec![p("A")]))
            .with_child(item(vec![p("B"), ordered]));
        assert_eq!(
            emit(body(vec![list])),
            "* A\n\n* B\n\n  1. C\n\n  #. D\n\n     I. E\n\n     #. F\n"
        );
    }

    #[test]
    fn test_definition_list() {
        let list = Element::page("list")
            .with_child(
                Element::page("list-item")
                    .with_child(Element::page("list-item-label").with_text("A"))
                    .with_child(Element::page("list-item-body").with_child(p("B"))),
            )
            .with_child(item(vec![p("C")]));
        assert_eq!(emit(body(vec![list])), "A\n  B\n\n  C\n");
    }

    #[test]
    fn test_table_with_spans() {
        let table = Element::page("table").with_child(
            Element::page("table-body")
                .with_child(
                    Element::page("table-row")
                        .with_child(cell("A"))
                        .with_child(cell("B"))
                        .with_child(cell("D").with_attr(page("number-rows-spanned"), 2)),
                )
                .with_child(
                    Element::page("table-row").with_child(cell("C").with_attr(page("number-columns-spanned"), 2)),
                ),
        );
        assert_eq!(
            emit(body(vec![table])),
            "+---+---+---+\n| A | B | D |\n+---+---+   +\n| C     |   |\n+-------+---+\n"
        );
    }

    #[test]
    fn test_table_paragraphs_in_cell() {
        let multi = Element::page("table-cell").with_child(p("A")).with_child(p("B"));
        let table = Element::page("table").with_child(
            Element::page("table-row").with_child(cell("Z")).with_child(multi),
        );
        assert_eq!(
            emit(body(vec![table])),
            "+---+---+\n| Z | A |\n|   |   |\n|   | B |\n+---+---+\n"
        );
    }

    #[test]
    fn test_table_header_ruler() {
        let table = Element::page("table")
            .with_child(Element::page("table-header").with_child(Element::page("table-row").with_child(cell("H"))))
            .with_child(Element::page("table-body").with_child(Element::page("table-row").with_child(cell("x"))));
        assert_eq!(emit(body(vec![table])), "+---+\n| H |\n+===+\n| x |\n+---+\n");
    }

    #[test]
    fn test_footnotes_collected_at_end() {
        let note = Element::page("note")
            .with_attr(page("note-class"), "footnote")
            .with_child(Element::page("note-body").with_text("the note"));
        let para = Element::page("p").with_text("Text").with_child(note);
        assert_eq!(emit(body(vec![para])), "Text [#]_\n\n.. [#] the note\n");
    }

    #[test]
    fn test_macros_and_contents() {
        let toc = Element::page("table-of-content").with_attr(page("outline-level"), 2);
        let part = macro_element("Date", Some("2010"), "<<Date(2010)>>", true);
        assert_eq!(
            emit(body(vec![toc, part])),
            ".. contents::\n   :depth: 2\n\n.. macro:: <<Date(2010)>>\n"
        );
    }

    #[test]
    fn test_links() {
        let para = Element::page("p").with_child(
            Element::page("a")
                .with_attr(xlink("href"), Iri::parse("http://example.org/"))
                .with_text("site"),
        );
        assert_eq!(emit(body(vec![para])), "`site <http://example.org/>`_\n");
    }
}
