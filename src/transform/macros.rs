//! Built-in macro expansion.
//!
//! Parsers leave macro calls as `inline-part` or `part` placeholders with a
//! `content-type` of `x-moin/macro;name=NAME`, an `arguments` child and an
//! `error` child holding the literal call. This pass replaces placeholders
//! of the macros it knows; the rest keep their error child.

use crate::args::Arguments;
use crate::error::Result;
use crate::iri::Iri;
use crate::mime::Type;
use crate::pipeline::ConvertOptions;
use crate::registry::{ConvertContext, Converter, Payload};
use crate::tree::{Element, Node, html, page, xlink};

/// Expands `Anchor`, `Verbatim`, `MailTo` and `Icon`.
pub struct MacroExpander;

impl Converter for MacroExpander {
    fn convert(&self, input: Payload, ctx: &ConvertContext<'_>) -> Result<Payload> {
        let mut tree = input.into_tree()?;
        expand(&mut tree, ctx.options);
        Ok(Payload::Tree(tree))
    }
}

/// Build a macro placeholder.
pub fn macro_element(name: &str, args: Option<&str>, alt: &str, block: bool) -> Element {
    let local = if block { "part" } else { "inline-part" };
    let mut elem = Element::page(local)
        .with_attr(page("content-type"), format!("x-moin/macro;name={name}"))
        .with_attr(page("alt"), alt);
    if let Some(args) = args {
        elem.push(arguments_element(args));
    }
    elem.with_child(Element::page("error").with_text(alt))
}

/// `arguments` element for a comma separated argument string.
pub fn arguments_element(raw: &str) -> Element {
    let args = crate::args::ArgParser::new().parse(raw).unwrap_or_default();
    arguments_to_element(&args)
}

/// `arguments` element holding already parsed arguments.
pub fn arguments_to_element(args: &Arguments) -> Element {
    let mut elem = Element::page("arguments");
    for value in &args.positional {
        elem.push(Element::page("argument").with_text(value));
    }
    for (key, value) in &args.keyword {
        elem.push(
            Element::page("argument")
                .with_attr(page("name"), key.as_str())
                .with_text(value),
        );
    }
    for value in &args.trailing {
        elem.push(Element::page("argument").with_text(value));
    }
    elem
}

/// Read the `arguments` child of a placeholder back.
pub fn element_arguments(elem: &Element) -> Arguments {
    let mut args = Arguments::new();
    let Some(list) = elem.find_page("arguments") else {
        return args;
    };
    for arg in list.child_elements().filter(|e| e.is_page("argument")) {
        match arg.page_attr("name") {
            Some(key) => args.keyword.push((key, arg.text())),
            None if args.keyword.is_empty() => args.positional.push(arg.text()),
            None => args.trailing.push(arg.text()),
        }
    }
    args
}

/// Name of the macro a placeholder calls.
pub fn macro_name(elem: &Element) -> Option<String> {
    if !(elem.is_page("part") || elem.is_page("inline-part")) {
        return None;
    }
    let content_type = Type::parse(&elem.page_attr("content-type")?).ok()?;
    if content_type.major.as_deref() != Some("x-moin") || content_type.subtype.as_deref() != Some("macro") {
        return None;
    }
    content_type.parameter("name").map(str::to_string)
}

fn expand(elem: &mut Element, options: &ConvertOptions) {
    for child in &mut elem.children {
        let Node::Element(child) = child else {
            continue;
        };
        let expanded = macro_name(child).and_then(|name| builtin(&name, &element_arguments(child), options));
        match expanded {
            Some(result) if child.is_page("part") => {
                *child = Element::page("p").with_child(result);
            }
            Some(result) => *child = result,
            None => {
                if let Some(name) = macro_name(child) {
                    log::warn!("unknown macro {name}");
                } else {
                    expand(child, options);
                }
            }
        }
    }
}

fn builtin(name: &str, args: &Arguments, options: &ConvertOptions) -> Option<Element> {
    let first = args.values().next().unwrap_or("");
    match name {
        "Anchor" => Some(Element::page("span").with_attr(html("id"), first)),
        "Verbatim" => Some(Element::page("code").with_text(args.values().collect::<Vec<_>>().join(","))),
        "MailTo" => {
            let text = args.values().nth(1).unwrap_or(first);
            Some(
                Element::page("a")
                    .with_attr(xlink("href"), Iri::new().with_scheme("mailto").with_path(first))
                    .with_text(text),
            )
        }
        "Icon" => Some(
            Element::page("object")
                .with_attr(
                    xlink("href"),
                    Iri::parse(&format!("{}/modernized/img/{first}", options.static_root.trim_end_matches('/'))),
                )
                .with_attr(page("alt"), first),
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;
    use crate::registry::Registry;
    use crate::tree::new_page;

    fn run(tree: Element) -> Element {
        let registry = Registry::new();
        let host = MemoryHost::new();
        let options = ConvertOptions::default();
        let ctx = ConvertContext {
            registry: &registry,
            host: &host,
            options: &options,
        };
        MacroExpander
            .convert(Payload::Tree(tree), &ctx)
            .unwrap()
            .into_tree()
            .unwrap()
    }

    #[test]
    fn test_placeholder_shape() {
        let elem = macro_element("Foo", Some("a, k=v"), "<<Foo(a, k=v)>>", false);
        assert!(elem.is_page("inline-part"));
        assert_eq!(macro_name(&elem).as_deref(), Some("Foo"));
        let args = element_arguments(&elem);
        assert_eq!(args.positional, vec!["a"]);
        assert_eq!(args.get("k"), Some("v"));
        assert_eq!(elem.find_page("error").unwrap().text(), "<<Foo(a, k=v)>>");
    }

    #[test]
    fn test_expand_builtins() {
        let p = Element::page("p")
            .with_child(macro_element("Anchor", Some("here"), "<<Anchor(here)>>", false))
            .with_child(macro_element("MailTo", Some("me@example.org"), "<<MailTo(me@example.org)>>", false))
            .with_child(macro_element("Verbatim", Some("x <y>"), "<<Verbatim(x <y>)>>", false));
        let out = run(new_page(None).with_child(Element::page("body").with_child(p)));
        let body = out.find_page("body").unwrap();
        let p = body.find_page("p").unwrap();
        let kids: Vec<_> = p.child_elements().collect();
        assert_eq!(kids[0].attr(&html("id")).unwrap().to_string(), "here");
        assert_eq!(kids[1].href().unwrap().to_string(), "mailto:me@example.org");
        assert_eq!(kids[2].text(), "x <y>");
    }

    #[test]
    fn test_block_macro_wrapped_in_paragraph() {
        let body = Element::page("body").with_child(macro_element("Anchor", Some("x"), "<<Anchor(x)>>", true));
        let out = run(new_page(None).with_child(body));
        let p = out.find_page("body").unwrap().find_page("p").unwrap();
        assert!(p.find_page("span").is_some());
    }

    #[test]
    fn test_unknown_macro_keeps_error() {
        let body = Element::page("body").with_child(macro_element("Nope", None, "<<Nope>>", true));
        let out = run(new_page(None).with_child(body));
        let part = out.find_page("body").unwrap().find_page("part").unwrap();
        assert_eq!(part.find_page("error").unwrap().text(), "<<Nope>>");
    }
}
