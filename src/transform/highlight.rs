//! Search term highlighting.

use regex::Regex;

use crate::error::Result;
use crate::registry::{ConvertContext, Converter, Payload};
use crate::tree::{Element, Namespace, Node, html};

/// Wraps regex matches in `strong class="highlight"`.
pub struct Highlighter;

impl Converter for Highlighter {
    fn convert(&self, input: Payload, ctx: &ConvertContext<'_>) -> Result<Payload> {
        let mut tree = input.into_tree()?;
        if let Some(pattern) = ctx.options.highlight.as_deref() {
            let re = Regex::new(pattern)?;
            highlight(&mut tree, &re);
        }
        Ok(Payload::Tree(tree))
    }
}

/// Highlight matches of `re` in text under page-namespace elements.
pub fn highlight(elem: &mut Element, re: &Regex) {
    if elem.name.ns != Namespace::Page {
        return;
    }
    let children = std::mem::take(&mut elem.children);
    for child in children {
        match child {
            Node::Text(text) => split_matches(&text, re, elem),
            Node::Element(mut e) => {
                highlight(&mut e, re);
                elem.children.push(Node::Element(e));
            }
        }
    }
}

fn split_matches(text: &str, re: &Regex, out: &mut Element) {
    let mut pos = 0;
    for m in re.find_iter(text) {
        if m.as_str().is_empty() {
            continue;
        }
        out.push_text(&text[pos..m.start()]);
        out.push(
            Element::page("strong")
                .with_attr(html("class"), "highlight")
                .with_text(m.as_str()),
        );
        pos = m.end();
    }
    out.push_text(&text[pos..]);
}
