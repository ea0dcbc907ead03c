//! Tree-to-tree passes over the intermediate document.
//!
//! - link: wiki and inter-wiki links to external URLs
//! - include: include directive expansion
//! - macros: built-in macro expansion
//! - highlight: regex match highlighting
//! - smiley: smiley tokens to icon objects

pub mod highlight;
pub mod include;
pub mod link;
pub mod macros;
pub mod smiley;

pub use highlight::Highlighter;
pub use include::IncludeExpander;
pub use link::LinkRewriter;
pub use macros::MacroExpander;
pub use smiley::SmileyReplacer;

use crate::iri::Iri;
use crate::mime;
use crate::pipeline::page_name_of;
use crate::registry::{Priority, Registry};
use crate::tree::Element;

/// Register every transform on the intermediate type.
pub fn register(registry: &mut Registry) {
    let doc = mime::moin_document();
    registry.register(
        |_, _| Box::new(IncludeExpander),
        doc.clone(),
        doc.clone().with_parameter(mime::PARAM_INCLUDES, "expandall"),
        Priority::MIDDLE,
    );
    registry.register(
        |_, _| Box::new(MacroExpander),
        doc.clone(),
        doc.clone().with_parameter(mime::PARAM_MACROS, "expandall"),
        Priority::MIDDLE,
    );
    registry.register(
        |_, _| Box::new(LinkRewriter),
        doc.clone(),
        doc.clone().with_parameter(mime::PARAM_LINKS, "extern"),
        Priority::MIDDLE,
    );
    registry.register(
        |_, _| Box::new(SmileyReplacer),
        doc.clone(),
        doc.clone().with_parameter(mime::PARAM_ICONS, "smiley"),
        Priority::MIDDLE,
    );
    registry.register(
        |_, _| Box::new(Highlighter),
        doc.clone(),
        doc.with_parameter(mime::PARAM_HIGHLIGHT, "regex"),
        Priority::MIDDLE,
    );
}

/// Resolve a wiki page reference against the current page name.
///
/// `/Sub` names a child of the current page, each leading `../` steps up to
/// the parent, an empty reference means the current page, and anything
/// else is already absolute.
///
/// ```
/// use wikiconv::transform::abs_page_name;
///
/// assert_eq!(abs_page_name("Root/Sub", "/Test"), "Root/Sub/Test");
/// assert_eq!(abs_page_name("Root/Sub", "../Test"), "Root/Test");
/// assert_eq!(abs_page_name("Root/Sub", "Test"), "Test");
/// ```
pub fn abs_page_name(current: &str, reference: &str) -> String {
    if reference.is_empty() {
        return current.to_string();
    }
    if reference.starts_with("../") {
        let mut context: Vec<&str> = current.split('/').filter(|s| !s.is_empty()).collect();
        let mut rest = reference;
        while let Some(tail) = rest.strip_prefix("../") {
            context.pop();
            rest = tail;
        }
        if !rest.is_empty() {
            context.push(rest);
        }
        return context.join("/");
    }
    if let Some(child) = reference.strip_prefix('/') {
        if current.is_empty() {
            return child.to_string();
        }
        return format!("{current}/{child}");
    }
    reference.to_string()
}

/// `wiki:///Name`
pub fn wiki_href(name: &str) -> Iri {
    Iri::new()
        .with_scheme("wiki")
        .with_authority("")
        .with_path(format!("/{name}"))
}

/// Page name announced by an element's `page:page-href`.
pub(crate) fn element_page_name(elem: &Element) -> Option<String> {
    let href = elem.get(&crate::tree::Namespace::Page, "page-href")?.as_iri()?;
    page_name_of(href).map(str::to_string)
}
