//! Emitters from the intermediate document to output formats.
//!
//! Every emitter is a [`Converter`](crate::registry::Converter) taking a
//! `Payload::Tree` and returning text. Exporters follow one pattern:
//! - `new()` creates an exporter with default configuration
//! - `with_config()` allows customization where there is something to
//!   configure
//!
//! # Example
//!
//! ```
//! use wikiconv::host::MemoryHost;
//! use wikiconv::mime;
//! use wikiconv::pipeline::{ConvertOptions, convert};
//!
//! let out = convert(
//!     "'''bold'''",
//!     &mime::moin_wiki(),
//!     &mime::rst(),
//!     &MemoryHost::new(),
//!     &ConvertOptions::default(),
//! )?
//! .into_text()?;
//! assert_eq!(out, "**bold**\n");
//! # Ok::<(), wikiconv::Error>(())
//! ```

mod docbook;
mod html;
mod moinwiki;
mod rst;

pub use docbook::DocBookExporter;
pub use html::{HtmlConfig, HtmlExporter};
pub use moinwiki::MoinWikiExporter;
pub use rst::RstExporter;

use crate::mime;
use crate::registry::{Priority, Registry};

/// Register every emitter from the intermediate type.
pub fn register(registry: &mut Registry) {
    let doc = mime::moin_document();
    registry.register(|_, _| Box::new(HtmlExporter::new()), doc.clone(), mime::moin_xhtml(), Priority::MIDDLE);
    for output in [mime::xhtml(), mime::html()] {
        registry.register(
            |_, _| Box::new(HtmlExporter::with_config(HtmlConfig { full_document: true })),
            doc.clone(),
            output,
            Priority::MIDDLE,
        );
    }
    registry.register(|_, _| Box::new(MoinWikiExporter), doc.clone(), mime::moin_wiki(), Priority::MIDDLE);
    registry.register(|_, _| Box::new(RstExporter), doc.clone(), mime::rst(), Priority::MIDDLE);
    registry.register(|_, _| Box::new(DocBookExporter), doc, mime::docbook(), Priority::MIDDLE);
}
