//! Fallback for any `text/*` type: the whole input as one code block.

use crate::error::Result;
use crate::registry::{ConvertContext, Converter, Payload};
use crate::tree::Element;
use crate::util::expand_tabs;

use super::page_with_body;

pub struct TextParser;

impl Converter for TextParser {
    fn convert(&self, input: Payload, ctx: &ConvertContext<'_>) -> Result<Payload> {
        let text = input.into_text()?;
        let code = expand_tabs(&text).lines().collect::<Vec<_>>().join("\n");
        let mut block = Element::page("blockcode");
        block.push_text(&code);
        let body = Element::page("body").with_child(block);
        Ok(Payload::Tree(page_with_body(ctx.options.page_href.as_ref(), body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::test_support::parse_body;

    #[test]
    fn test_single_blockcode() {
        let body = parse_body(&TextParser, "line one\nline two\n");
        let children: Vec<_> = body.child_elements().collect();
        assert_eq!(children.len(), 1);
        assert!(children[0].is_page("blockcode"));
        assert_eq!(children[0].text(), "line one\nline two");
    }

    #[test]
    fn test_tabs_expanded() {
        let body = parse_body(&TextParser, "a\tb\n\tc");
        assert_eq!(body.text(), "a       b\n        c");
    }

    #[test]
    fn test_bytes_are_decoded() {
        let body = parse_body(&TextParser, "caf\u{e9}".as_bytes().to_vec());
        assert_eq!(body.text(), "caf\u{e9}");
    }
}
