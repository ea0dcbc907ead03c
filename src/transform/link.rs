//! Wiki link rewriting.
//!
//! `wiki.local:` references are resolved against the page they appear in
//! and become `wiki:///Abs/Name`. Inter-wiki references `wiki://Wiki/Page`
//! are looked up in the host's inter-wiki map and replaced with the target
//! URL. Query and fragment of the original reference are carried over.

use crate::error::Result;
use crate::host::Host;
use crate::iri::Iri;
use crate::pipeline::ConvertOptions;
use crate::registry::{ConvertContext, Converter, Payload};
use crate::tree::{Element, Node, html, xlink};

use super::{abs_page_name, element_page_name, wiki_href};

/// Rewrites `xlink:href` attributes to resolved targets.
pub struct LinkRewriter;

impl Converter for LinkRewriter {
    fn convert(&self, input: Payload, ctx: &ConvertContext<'_>) -> Result<Payload> {
        let mut tree = input.into_tree()?;
        let current = ctx.options.page_name().unwrap_or("").to_string();
        rewrite(&mut tree, &current, ctx.host, ctx.options);
        Ok(Payload::Tree(tree))
    }
}

fn rewrite(elem: &mut Element, current: &str, host: &dyn Host, options: &ConvertOptions) {
    let scoped = element_page_name(elem);
    let current = scoped.as_deref().unwrap_or(current);

    if let Some(href) = elem.href().cloned() {
        match resolve(&href, current, host, options) {
            Resolved::Target(target) => elem.set_attr(xlink("href"), target),
            Resolved::BadInterwiki(placeholder) => {
                log::warn!("unknown inter-wiki name in {href}");
                elem.set_attr(xlink("href"), Iri::parse(&placeholder));
                add_class(elem, "badinterwiki");
            }
            Resolved::Unchanged => {}
        }
    }

    for child in &mut elem.children {
        if let Node::Element(child) = child {
            rewrite(child, current, host, options);
        }
    }
}

enum Resolved {
    Target(Iri),
    BadInterwiki(String),
    Unchanged,
}

fn resolve(href: &Iri, current: &str, host: &dyn Host, options: &ConvertOptions) -> Resolved {
    match href.scheme_str() {
        "wiki.local" => {
            let name = abs_page_name(current, href.path_str());
            Resolved::Target(merge(wiki_href(&name), href))
        }
        "wiki" => {
            let wiki = href.authority.as_deref().unwrap_or("");
            if wiki.is_empty() {
                return Resolved::Unchanged;
            }
            let page = href.path_str().trim_start_matches('/');
            if wiki == "Self" {
                return Resolved::Target(merge(wiki_href(page), href));
            }
            let target = host.resolve_interwiki(wiki, page);
            if target.error {
                return Resolved::BadInterwiki(options.bad_interwiki_href());
            }
            Resolved::Target(merge(Iri::parse(&target.join()), href))
        }
        _ => Resolved::Unchanged,
    }
}

/// Carry query and fragment of `original` over to `target`.
fn merge(mut target: Iri, original: &Iri) -> Iri {
    if let Some(query) = &original.query {
        target.query = Some(match target.query.take() {
            Some(existing) if !existing.is_empty() => format!("{existing}&{query}"),
            _ => query.clone(),
        });
    }
    if original.fragment.is_some() {
        target.fragment = original.fragment.clone();
    }
    target
}

fn add_class(elem: &mut Element, class: &str) {
    let name = html("class");
    let value = match elem.attr(&name) {
        Some(existing) => format!("{existing} {class}"),
        None => class.to_string(),
    };
    elem.set_attr(name, value);
}
