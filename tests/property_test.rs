//! Property tests over the public surface.

use proptest::prelude::*;

use wikiconv::args::{ArgParser, Arguments};
use wikiconv::host::MemoryHost;
use wikiconv::iri::Iri;
use wikiconv::mime::{self, Type};
use wikiconv::tree::Element;
use wikiconv::{ConvertOptions, Payload, convert};

fn paragraphs() -> impl Strategy<Value = Vec<String>> {
    let word = "[a-z]{1,8}";
    let paragraph = prop::collection::vec(word, 1..8).prop_map(|words| words.join(" "));
    prop::collection::vec(paragraph, 1..5)
}

fn run(text: &str, from: &Type, to: &Type) -> String {
    convert(text, from, to, &MemoryHost::new(), &ConvertOptions::default())
        .unwrap()
        .into_text()
        .unwrap()
}

fn body(text: &str, from: &Type) -> Element {
    convert(text, from, &mime::moin_document(), &MemoryHost::new(), &ConvertOptions::default())
        .unwrap()
        .into_tree()
        .unwrap()
        .find_page("body")
        .cloned()
        .unwrap()
}

fn emit(tree: &Element, to: &Type) -> String {
    convert(
        Payload::Tree(tree.clone()),
        &mime::moin_document(),
        to,
        &MemoryHost::new(),
        &ConvertOptions::default(),
    )
    .unwrap()
    .into_text()
    .unwrap()
}

// ============================================================================
// Structured documents
// ============================================================================

#[derive(Debug, Clone)]
enum Inline {
    Plain(String),
    Strong(String),
    Emphasis(String),
}

#[derive(Debug, Clone)]
struct Item {
    text: String,
    nested: Option<(bool, Vec<String>)>,
}

#[derive(Debug, Clone)]
enum Block {
    Heading(usize, String),
    Para(Vec<Inline>),
    List(bool, Vec<Item>),
}

fn words() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-z]{1,8}", 1..4).prop_map(|w| w.join(" "))
}

fn inline() -> impl Strategy<Value = Inline> {
    prop_oneof![
        words().prop_map(Inline::Plain),
        words().prop_map(Inline::Strong),
        words().prop_map(Inline::Emphasis),
    ]
}

fn item() -> impl Strategy<Value = Item> {
    (
        words(),
        prop::option::of((any::<bool>(), prop::collection::vec(words(), 1..4))),
    )
        .prop_map(|(text, nested)| Item { text, nested })
}

fn block(with_lists: bool) -> BoxedStrategy<Block> {
    let heading = (1usize..=6, words()).prop_map(|(level, text)| Block::Heading(level, text));
    let para = prop::collection::vec(inline(), 1..5).prop_map(Block::Para);
    if with_lists {
        let list = (any::<bool>(), prop::collection::vec(item(), 1..4)).prop_map(|(o, items)| Block::List(o, items));
        prop_oneof![heading, para, list].boxed()
    } else {
        prop_oneof![heading, para].boxed()
    }
}

fn document(with_lists: bool) -> impl Strategy<Value = Vec<Block>> {
    prop::collection::vec(block(with_lists), 1..8)
}

/// Inline delimiters and list line rendering for one dialect.
struct Dialect {
    strong: &'static str,
    emphasis: &'static str,
    list_line: fn(ordered: bool, parent: Option<bool>, text: &str) -> String,
}

fn moin_list_line(ordered: bool, parent: Option<bool>, text: &str) -> String {
    let indent = if parent.is_some() { "  " } else { " " };
    let marker = if ordered { "1." } else { "*" };
    format!("{indent}{marker} {text}")
}

fn creole_list_line(ordered: bool, parent: Option<bool>, text: &str) -> String {
    let mark = |o: bool| if o { '#' } else { '*' };
    match parent {
        Some(p) => format!("{}{} {text}", mark(p), mark(ordered)),
        None => format!("{} {text}", mark(ordered)),
    }
}

const MOIN: Dialect = Dialect {
    strong: "'''",
    emphasis: "''",
    list_line: moin_list_line,
};

const CREOLE: Dialect = Dialect {
    strong: "**",
    emphasis: "//",
    list_line: creole_list_line,
};

fn render(doc: &[Block], dialect: &Dialect) -> String {
    let mut blocks = Vec::new();
    for b in doc {
        blocks.push(match b {
            Block::Heading(level, text) => {
                let marks = "=".repeat(*level);
                format!("{marks} {text} {marks}")
            }
            Block::Para(inlines) => inlines
                .iter()
                .map(|i| match i {
                    Inline::Plain(t) => t.clone(),
                    Inline::Strong(t) => format!("{0}{t}{0}", dialect.strong),
                    Inline::Emphasis(t) => format!("{0}{t}{0}", dialect.emphasis),
                })
                .collect::<Vec<_>>()
                .join(" "),
            Block::List(ordered, items) => {
                let mut lines = Vec::new();
                for item in items {
                    lines.push((dialect.list_line)(*ordered, None, &item.text));
                    if let Some((nested_ordered, texts)) = &item.nested {
                        for text in texts {
                            lines.push((dialect.list_line)(*nested_ordered, Some(*ordered), text));
                        }
                    }
                }
                lines.join("\n")
            }
        });
    }
    blocks.join("\n\n")
}

fn heading_levels(body: &Element) -> Vec<i64> {
    body.descendants()
        .filter(|e| e.is_page("h"))
        .filter_map(|h| h.page_int("outline-level"))
        .collect()
}

fn count(body: &Element, local: &str) -> usize {
    body.descendants().filter(|e| e.is_page(local)).count()
}

fn expected_lists(doc: &[Block]) -> usize {
    doc.iter()
        .map(|b| match b {
            Block::List(_, items) => 1 + items.iter().filter(|i| i.nested.is_some()).count(),
            _ => 0,
        })
        .sum()
}

fn expected_inlines(doc: &[Block], strong: bool) -> usize {
    doc.iter()
        .map(|b| match b {
            Block::Para(inlines) => inlines
                .iter()
                .filter(|i| matches!((i, strong), (Inline::Strong(_), true) | (Inline::Emphasis(_), false)))
                .count(),
            _ => 0,
        })
        .sum()
}

fn expected_levels(doc: &[Block]) -> Vec<i64> {
    doc.iter()
        .filter_map(|b| match b {
            Block::Heading(level, _) => Some(*level as i64),
            _ => None,
        })
        .collect()
}

proptest! {
    #[test]
    fn prop_moin_structure_survives_emit_and_reparse(doc in document(true)) {
        let input = render(&doc, &MOIN);
        let first = body(&input, &mime::moin_wiki());
        prop_assert_eq!(heading_levels(&first), expected_levels(&doc), "{}", input);
        prop_assert_eq!(count(&first, "list"), expected_lists(&doc), "{}", input);
        prop_assert_eq!(count(&first, "strong"), expected_inlines(&doc, true), "{}", input);
        prop_assert_eq!(count(&first, "emphasis"), expected_inlines(&doc, false), "{}", input);

        let emitted = emit(&first, &mime::moin_wiki());
        let second = body(&emitted, &mime::moin_wiki());
        prop_assert_eq!(first, second, "{}", emitted);
    }

    #[test]
    fn prop_creole_tree_matches_moin_rendering(doc in document(true)) {
        let input = render(&doc, &CREOLE);
        let creole = body(&input, &mime::moin_creole());
        prop_assert_eq!(heading_levels(&creole), expected_levels(&doc), "{}", input);
        prop_assert_eq!(count(&creole, "list"), expected_lists(&doc), "{}", input);

        let moin = emit(&creole, &mime::moin_wiki());
        prop_assert_eq!(creole, body(&moin, &mime::moin_wiki()), "{}", moin);
    }

    #[test]
    fn prop_docbook_keeps_headings_and_paragraphs(doc in document(false)) {
        let input = render(&doc, &MOIN);
        let first = body(&input, &mime::moin_wiki());
        let docbook = emit(&first, &mime::docbook());
        let second = body(&docbook, &mime::docbook());

        let titles = |b: &Element| b.descendants().filter(|e| e.is_page("h")).map(Element::text).collect::<Vec<_>>();
        let paras = |b: &Element| b.descendants().filter(|e| e.is_page("p")).cloned().collect::<Vec<_>>();
        prop_assert_eq!(titles(&first), titles(&second), "{}", docbook);
        prop_assert_eq!(paras(&first), paras(&second), "{}", docbook);
    }

    #[test]
    fn prop_plain_paragraphs_survive_moin(paras in paragraphs()) {
        let input = paras.join("\n\n");
        let out = run(&input, &mime::moin_wiki(), &mime::moin_wiki());
        prop_assert_eq!(out, format!("{input}\n"));
    }

    #[test]
    fn prop_plain_paragraphs_survive_rst(paras in paragraphs()) {
        let input = paras.join("\n\n");
        let rst = run(&input, &mime::moin_wiki(), &mime::rst());
        let back = run(&rst, &mime::rst(), &mime::moin_wiki());
        prop_assert_eq!(back, format!("{input}\n"));
    }

    #[test]
    fn prop_http_iri_renders_back(
        host in "[a-z]{1,10}\\.(org|net)",
        segments in prop::collection::vec("[A-Za-z0-9_]{1,8}", 0..4),
        query in prop::option::of("[a-z]{1,5}=[a-z0-9]{1,5}"),
        fragment in prop::option::of("[a-z]{1,6}"),
    ) {
        let mut text = format!("http://{host}/{}", segments.join("/"));
        if let Some(q) = &query {
            text.push('?');
            text.push_str(q);
        }
        if let Some(f) = &fragment {
            text.push('#');
            text.push_str(f);
        }
        let iri = Iri::parse(&text);
        prop_assert_eq!(iri.scheme_str(), "http");
        prop_assert_eq!(iri.authority.as_deref(), Some(host.as_str()));
        prop_assert_eq!(iri.query.as_deref(), query.as_deref());
        prop_assert_eq!(iri.to_string(), text);
    }

    #[test]
    fn prop_arguments_unparse_then_parse(
        positional in prop::collection::vec("[a-z][a-z ,=]{0,7}", 0..4),
        keyword in prop::collection::btree_map("[a-z]{1,6}", "[a-z0-9 ,]{0,6}", 0..4),
    ) {
        let args = Arguments {
            positional,
            keyword: keyword.into_iter().collect(),
            trailing: Vec::new(),
        };
        for parser in [ArgParser::new(), ArgParser::wiki()] {
            let text = parser.unparse(&args);
            prop_assert_eq!(parser.parse(&text).unwrap(), args.clone(), "{}", text);
        }
    }

    #[test]
    fn prop_supertype_relation(
        major in "[a-z]{1,6}",
        subtype in "[a-z.]{1,8}",
        charset in "[a-z0-9-]{1,8}",
    ) {
        let plain = Type::new(&major, &subtype);
        let with_param = plain.clone().with_parameter("charset", charset.as_str());

        prop_assert!(plain.issupertype(&plain));
        prop_assert!(plain.issupertype(&with_param));
        prop_assert!(with_param.issupertype(&with_param));
        prop_assert!(!with_param.issupertype(&plain));

        let wildcard = Type::parse(&format!("{major}/*")).unwrap();
        prop_assert!(wildcard.issupertype(&plain));
        prop_assert!(!plain.issupertype(&wildcard));

        let reparsed = Type::parse(&with_param.to_string()).unwrap();
        prop_assert_eq!(reparsed, with_param);
    }
}
