//! Images become an object that points back at the item's raw data.

use crate::error::Result;
use crate::iri::Iri;
use crate::registry::{ConvertContext, Converter, Payload};
use crate::tree::{Element, xlink};

use super::page_with_body;

pub struct ImageParser;

impl Converter for ImageParser {
    fn convert(&self, _input: Payload, ctx: &ConvertContext<'_>) -> Result<Payload> {
        let name = ctx.options.page_name().unwrap_or_default();
        let href = Iri::new()
            .with_scheme("wiki")
            .with_authority("")
            .with_path(format!("/{name}"))
            .with_query("do=get");
        let object = Element::page("object").with_attr(xlink("href"), href);
        let body = Element::page("body").with_child(object);
        Ok(Payload::Tree(page_with_body(ctx.options.page_href.as_ref(), body)))
    }
}
