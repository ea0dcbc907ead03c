//! End-to-end conversions through the default registry.

use wikiconv::host::{InterwikiMap, MemoryHost};
use wikiconv::mime::{self, Type};
use wikiconv::tree::{Element, write_tree};
use wikiconv::{ConvertOptions, convert};

fn to_text(input: &str, from: &Type, to: &Type, host: &MemoryHost, options: &ConvertOptions) -> String {
    convert(input, from, to, host, options)
        .expect("conversion should succeed")
        .into_text()
        .expect("text output")
}

fn to_tree(input: &str, from: &Type, host: &MemoryHost, options: &ConvertOptions) -> Element {
    convert(input, from, &mime::moin_document(), host, options)
        .expect("conversion should succeed")
        .into_tree()
        .expect("tree output")
}

fn hrefs(tree: &Element) -> Vec<String> {
    tree.descendants()
        .filter(|e| e.is_page("a"))
        .filter_map(|a| a.href().map(|h| h.to_string()))
        .collect()
}

// ============================================================================
// Headings
// ============================================================================

#[test]
fn test_moin_heading_tree_and_html() {
    let host = MemoryHost::new();
    let options = ConvertOptions::default();

    let tree = to_tree("== Heading 2 ==", &mime::moin_wiki(), &host, &options);
    let xml = write_tree(&tree);
    assert!(xml.starts_with("<page xmlns=\"http://moinmo.in/namespaces/page\""), "{xml}");
    assert!(xml.contains("<body><h outline-level=\"2\">Heading 2</h></body>"), "{xml}");

    let html = to_text("== Heading 2 ==", &mime::moin_wiki(), &mime::moin_xhtml(), &host, &options);
    assert!(html.contains("<h2 id=\"toc-0\">Heading 2</h2>"), "{html}");
}

#[test]
fn test_deep_heading_clamped_to_six() {
    let host = MemoryHost::new();
    let options = ConvertOptions::default();

    let html = to_text("======= Deep =======", &mime::moin_wiki(), &mime::moin_xhtml(), &host, &options);
    assert!(html.contains("<h6 id=\"toc-0\">Deep</h6>"), "{html}");
    assert!(!html.contains("<h7"), "{html}");
}

#[test]
fn test_generated_heading_id_avoids_embedded_html_id() {
    let host = MemoryHost::new();
    let options = ConvertOptions::default();

    let input = "{{{#!html\n<h1 id=\"toc-0\">x</h1>\n}}}\n= A =";
    let html = to_text(input, &mime::moin_wiki(), &mime::moin_xhtml(), &host, &options);
    assert_eq!(html.matches("id=\"toc-0\"").count(), 1, "{html}");
    assert!(html.contains("<h1 id=\"toc-1\">A</h1>"), "{html}");
}

// ============================================================================
// Lists
// ============================================================================

#[test]
fn test_creole_list_nesting() {
    let tree = to_tree(
        "* A\n** B\n* C",
        &mime::moin_creole(),
        &MemoryHost::new(),
        &ConvertOptions::default(),
    );
    let body = tree.find_page("body").unwrap();
    let list = body.find_page("list").unwrap();
    let items: Vec<_> = list.child_elements().collect();
    assert_eq!(items.len(), 2);

    let nested = items[0]
        .find_page("list-item-body")
        .and_then(|b| b.find_page("list"))
        .expect("item A holds the nested list");
    assert_eq!(nested.text(), "B");
    assert_eq!(items[1].text(), "C");
}

#[test]
fn test_creole_list_to_moin() {
    let out = to_text(
        "* A\n** B\n* C",
        &mime::moin_creole(),
        &mime::moin_wiki(),
        &MemoryHost::new(),
        &ConvertOptions::default(),
    );
    assert_eq!(out, " * A\n  * B\n * C\n");
}

// ============================================================================
// Tables
// ============================================================================

const SPAN_TABLE: &str = "||A||B||<|2>D||\n||||C||\n";

#[test]
fn test_table_spans_in_tree() {
    let tree = to_tree(SPAN_TABLE, &mime::moin_wiki(), &MemoryHost::new(), &ConvertOptions::default());
    let body = tree.descendants().find(|e| e.is_page("table-body")).unwrap();
    let rows: Vec<_> = body.child_elements().collect();
    assert_eq!(rows.len(), 2);

    let first: Vec<_> = rows[0].child_elements().collect();
    assert_eq!(first.len(), 3);
    assert_eq!(first[2].text(), "D");
    assert_eq!(first[2].page_int("number-rows-spanned"), Some(2));

    let second: Vec<_> = rows[1].child_elements().collect();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].text(), "C");
    assert_eq!(second[0].page_int("number-columns-spanned"), Some(2));
}

#[test]
fn test_table_spans_to_rst_grid() {
    let out = to_text(
        SPAN_TABLE,
        &mime::moin_wiki(),
        &mime::rst(),
        &MemoryHost::new(),
        &ConvertOptions::default(),
    );
    let expected = "\
+---+---+---+
| A | B | D |
+---+---+   +
| C     |   |
+-------+---+
";
    assert!(out.contains(expected), "{out}");
}

#[test]
fn test_table_spans_back_to_moin() {
    let out = to_text(
        SPAN_TABLE,
        &mime::moin_wiki(),
        &mime::moin_wiki(),
        &MemoryHost::new(),
        &ConvertOptions::default(),
    );
    assert_eq!(out, "||A||B||<|2>D||\n||||C||\n");
}

#[test]
fn test_table_spans_to_docbook() {
    let out = to_text(
        SPAN_TABLE,
        &mime::moin_wiki(),
        &mime::docbook(),
        &MemoryHost::new(),
        &ConvertOptions::default(),
    );
    assert!(out.contains("<informaltable>"), "{out}");
    assert!(out.contains("rowspan=\"2\""), "{out}");
    assert!(out.contains("colspan=\"2\""), "{out}");
}

// ============================================================================
// Links
// ============================================================================

#[test]
fn test_interwiki_link_rewrite() {
    let host = MemoryHost::new()
        .with_interwiki(InterwikiMap::new().with_entry("MoinMoin", "http://moinmo.in/$PAGE"));
    let input = "[[MoinMoin:FrontPage]]";

    let raw = to_tree(input, &mime::moin_wiki(), &host, &ConvertOptions::default());
    assert_eq!(hrefs(&raw), vec!["wiki://MoinMoin/FrontPage"]);

    let options = ConvertOptions::default().with_links(true);
    let resolved = to_tree(input, &mime::moin_wiki(), &host, &options);
    assert_eq!(hrefs(&resolved), vec!["http://moinmo.in/FrontPage"]);

    let html = to_text(input, &mime::moin_wiki(), &mime::moin_xhtml(), &host, &options);
    assert!(html.contains("href=\"http://moinmo.in/FrontPage\""), "{html}");
}

#[test]
fn test_local_link_resolved_against_page() {
    let options = ConvertOptions::default().with_page("Parent").with_links(true);
    let tree = to_tree("[[/Child]]", &mime::moin_wiki(), &MemoryHost::new(), &options);
    assert_eq!(hrefs(&tree), vec!["wiki:///Parent/Child"]);
}

// ============================================================================
// Includes
// ============================================================================

#[test]
fn test_include_cycle_is_cut() {
    let host = MemoryHost::new()
        .with_page("A", "text/x.moin.wiki", "A text\n\n<<Include(B)>>")
        .with_page("B", "text/x.moin.wiki", "B text\n\n<<Include(A)>>");
    let options = ConvertOptions::default().with_page("A").with_includes(true);

    let tree = to_tree("A text\n\n<<Include(B)>>", &mime::moin_wiki(), &host, &options);

    let text = tree.text();
    assert_eq!(text.matches("A text").count(), 1, "{text}");
    assert_eq!(text.matches("B text").count(), 1, "{text}");

    let errors: Vec<_> = tree.descendants().filter(|e| e.is_page("error")).collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].text().contains("A -> B -> A"));

    // The error sits inside B's subtree, not A's.
    let included = tree
        .descendants()
        .find(|e| e.page_attr("page-href").as_deref() == Some("wiki:///B"))
        .expect("B is included");
    assert!(included.descendants().any(|e| e.is_page("error")));
}

#[test]
fn test_include_left_alone_when_disabled() {
    let host = MemoryHost::new().with_page("B", "text/x.moin.wiki", "B text");
    let tree = to_tree(
        "<<Include(B)>>",
        &mime::moin_wiki(),
        &host,
        &ConvertOptions::default().with_page("A"),
    );
    assert!(!tree.text().contains("B text"));

    let out = to_text(
        "<<Include(B)>>",
        &mime::moin_wiki(),
        &mime::moin_wiki(),
        &host,
        &ConvertOptions::default().with_page("A"),
    );
    assert_eq!(out, "<<Include(B)>>\n");
}

// ============================================================================
// Code fences
// ============================================================================

#[test]
fn test_code_containing_fence_grows_fence() {
    let tree = Element::page("page").with_child(
        Element::page("body").with_child(Element::page("blockcode").with_text("}}}")),
    );
    let out = convert(
        tree,
        &mime::moin_document(),
        &mime::moin_wiki(),
        &MemoryHost::new(),
        &ConvertOptions::default(),
    )
    .unwrap()
    .into_text()
    .unwrap();
    assert_eq!(out, "{{{{\n}}}\n}}}}\n");
}

#[test]
fn test_wider_fence_round_trips() {
    let input = "{{{{\n}}}\n}}}}\n";
    let out = to_text(
        input,
        &mime::moin_wiki(),
        &mime::moin_wiki(),
        &MemoryHost::new(),
        &ConvertOptions::default(),
    );
    assert_eq!(out, input);
}

// ============================================================================
// Other dialects
// ============================================================================

#[test]
fn test_rst_to_moin() {
    let out = to_text(
        "Title\n=====\n\nSome *emphasis* and ``code``.\n",
        &mime::rst(),
        &mime::moin_wiki(),
        &MemoryHost::new(),
        &ConvertOptions::default(),
    );
    assert!(out.contains("= Title ="), "{out}");
    assert!(out.contains("''emphasis''"), "{out}");
    assert!(out.contains("`code`"), "{out}");
}

#[test]
fn test_docbook_round_trip_sections() {
    let host = MemoryHost::new();
    let options = ConvertOptions::default();
    let docbook = to_text(
        "= One =\n\ntext\n\n== Two ==\n\nmore",
        &mime::moin_wiki(),
        &mime::docbook(),
        &host,
        &options,
    );
    let back = to_text(&docbook, &mime::docbook(), &mime::moin_wiki(), &host, &options);
    assert!(back.contains("= One ="), "{back}");
    assert!(back.contains("== Two =="), "{back}");
    assert!(back.contains("more"), "{back}");
}

#[test]
fn test_csv_to_html_table() {
    let out = to_text(
        "name,count\napple,3\n",
        &mime::csv(),
        &mime::moin_xhtml(),
        &MemoryHost::new(),
        &ConvertOptions::default(),
    );
    assert!(out.contains("<table"), "{out}");
    assert!(out.contains("apple"), "{out}");
}

#[test]
fn test_unknown_pair_is_reported() {
    let err = convert(
        "x",
        &Type::new("application", "x-nothing"),
        &mime::moin_wiki(),
        &MemoryHost::new(),
        &ConvertOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, wikiconv::Error::UnknownContentType { .. }));
}

// ============================================================================
// Other inputs
// ============================================================================

#[test]
fn test_mediawiki_to_moin() {
    let host = MemoryHost::new();
    let options = ConvertOptions::default();

    let input = "== Title ==\n'''bold''' and [[Other|a link]]\n\n# one\n# two";
    let tree = to_tree(input, &mime::mediawiki(), &host, &options);
    let h = tree.descendants().find(|e| e.is_page("h")).unwrap();
    assert_eq!(h.page_int("outline-level"), Some(2));
    let list = tree.descendants().find(|e| e.is_page("list")).unwrap();
    assert_eq!(list.page_attr("item-label-generate").as_deref(), Some("ordered"));

    let wiki = to_text(input, &mime::mediawiki(), &mime::moin_wiki(), &host, &options);
    assert!(wiki.contains("== Title =="), "{wiki}");
    assert!(wiki.contains("'''bold'''"), "{wiki}");
    assert!(wiki.contains("[[Other|a link]]"), "{wiki}");
}

#[test]
fn test_python_block_tagged_with_language() {
    let host = MemoryHost::new();
    let options = ConvertOptions::default();

    let html = to_text("{{{#!python\nx = 1\n}}}", &mime::moin_wiki(), &mime::moin_xhtml(), &host, &options);
    assert!(html.contains("<pre class=\"highlight python\">x = 1</pre>"), "{html}");
}
