//! Smiley substitution.
//!
//! Standalone smiley tokens in text leaves become `object` elements
//! pointing at the icon in the static asset tree. A token stands alone
//! when it starts a text leaf or follows whitespace, and is followed by
//! whitespace or the end of the leaf. Code is left alone.

use crate::error::Result;
use crate::iri::Iri;
use crate::registry::{ConvertContext, Converter, Payload};
use crate::tree::{Element, Node, page, xlink};

/// Smiley tokens and their icon files, longest tokens first.
pub const SMILEYS: &[(&str, &str)] = &[
    (":-))", "smile3.png"),
    ("(./)", "checkmark.png"),
    ("{OK}", "thumbs-up.png"),
    ("X-(", "angry.png"),
    ("<:(", "frown.png"),
    (":))", "smile3.png"),
    ("/!\\", "alert.png"),
    ("<!>", "attention.png"),
    ("(!)", "idea.png"),
    (":-?", "tongue.png"),
    (">:>", "devil.png"),
    (":-(", "sad.png"),
    (":-)", "smile.png"),
    ("B-)", "smile2.png"),
    (";-)", "smile4.png"),
    ("|-)", "tired.png"),
    ("{X}", "icon-error.png"),
    ("{i}", "icon-info.png"),
    ("{1}", "prio1.png"),
    ("{2}", "prio2.png"),
    ("{3}", "prio3.png"),
    ("{*}", "star_on.png"),
    ("{o}", "star_off.png"),
    (":D", "biggrin.png"),
    (":o", "redface.png"),
    (":(", "sad.png"),
    (":)", "smile.png"),
    ("B)", "smile2.png"),
    (";)", "smile4.png"),
    (":\\", "ohwell.png"),
    ("|)", "tired.png"),
];

/// Replaces smiley tokens with icon objects.
pub struct SmileyReplacer;

impl Converter for SmileyReplacer {
    fn convert(&self, input: Payload, ctx: &ConvertContext<'_>) -> Result<Payload> {
        let mut tree = input.into_tree()?;
        let base = format!(
            "{}/modernized/img/smileys",
            ctx.options.static_root.trim_end_matches('/')
        );
        replace_smileys(&mut tree, &base);
        Ok(Payload::Tree(tree))
    }
}

/// Substitute smileys below `elem`; icons are looked up under `base`.
pub fn replace_smileys(elem: &mut Element, base: &str) {
    if elem.is_page("code") || elem.is_page("blockcode") {
        return;
    }
    let children = std::mem::take(&mut elem.children);
    for child in children {
        match child {
            Node::Text(text) => split_smileys(&text, base, elem),
            Node::Element(mut e) => {
                replace_smileys(&mut e, base);
                elem.children.push(Node::Element(e));
            }
        }
    }
}

fn split_smileys(text: &str, base: &str, out: &mut Element) {
    let mut start = 0;
    let mut i = 0;
    let mut prev_space = true;
    while i < text.len() {
        let rest = &text[i..];
        if prev_space && let Some((token, icon)) = match_token(rest) {
            out.push_text(&text[start..i]);
            out.push(
                Element::page("object")
                    .with_attr(xlink("href"), Iri::parse(&format!("{base}/{icon}")))
                    .with_attr(page("alt"), token),
            );
            i += token.len();
            start = i;
            prev_space = false;
            continue;
        }
        let Some(c) = rest.chars().next() else {
            break;
        };
        prev_space = c.is_whitespace();
        i += c.len_utf8();
    }
    out.push_text(&text[start..]);
}

fn match_token(rest: &str) -> Option<(&'static str, &'static str)> {
    SMILEYS.iter().copied().find(|(token, _)| {
        rest.starts_with(token)
            && rest[token.len()..]
                .chars()
                .next()
                .is_none_or(char::is_whitespace)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn objects(elem: &Element) -> Vec<String> {
        elem.descendants()
            .filter(|e| e.is_page("object"))
            .map(|e| e.href().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_standalone_tokens() {
        let mut p = Element::page("p").with_text(":) hello :-)) x:) {OK}");
        replace_smileys(&mut p, "/static/modernized/img/smileys");
        assert_eq!(
            objects(&p),
            vec![
                "/static/modernized/img/smileys/smile.png",
                "/static/modernized/img/smileys/smile3.png",
                "/static/modernized/img/smileys/thumbs-up.png",
            ]
        );
        assert!(p.text().contains("x:)"));
    }

    #[test]
    fn test_token_must_be_followed_by_space() {
        let mut p = Element::page("p").with_text(":)x");
        replace_smileys(&mut p, "");
        assert!(objects(&p).is_empty());
    }

    #[test]
    fn test_code_is_skipped() {
        let mut body = Element::page("body")
            .with_child(Element::page("blockcode").with_text(":)"))
            .with_child(Element::page("p").with_child(Element::page("code").with_text(":)")))
            .with_child(Element::page("p").with_text("ok :)"));
        replace_smileys(&mut body, "");
        assert_eq!(objects(&body).len(), 1);
    }
}
