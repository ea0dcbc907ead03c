//! Source code input: the text as one `blockcode` tagged with its language.
//!
//! No highlighting happens here; the language rides along as an HTML class
//! (`highlight python`) for a stylesheet or client side highlighter.

use crate::error::Result;
use crate::registry::{ConvertContext, Converter, Payload};
use crate::tree::{Element, html};
use crate::util::expand_tabs;

use super::page_with_body;

/// Content types with a dedicated code input, and their language names.
pub const LANGUAGES: &[(&str, &str)] = &[
    ("x-python", "python"),
    ("x-diff", "diff"),
    ("x-irclog", "irc"),
];

pub struct CodeParser {
    pub language: &'static str,
}

impl Converter for CodeParser {
    fn convert(&self, input: Payload, ctx: &ConvertContext<'_>) -> Result<Payload> {
        let text = input.into_text()?;
        let code = expand_tabs(&text).lines().collect::<Vec<_>>().join("\n");
        let block = Element::page("blockcode")
            .with_attr(html("class"), format!("highlight {}", self.language))
            .with_text(code);
        let body = Element::page("body").with_child(block);
        Ok(Payload::Tree(page_with_body(ctx.options.page_href.as_ref(), body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::test_support::parse_body;
    use crate::tree::Namespace;

    #[test]
    fn test_language_class() {
        let body = parse_body(&CodeParser { language: "python" }, "def f():\n\treturn 1\n");
        let code = body.find_page("blockcode").unwrap();
        assert_eq!(
            code.get(&Namespace::Html, "class").and_then(|v| v.as_text()),
            Some("highlight python")
        );
        assert_eq!(code.text(), "def f():\n        return 1");
    }
}
