//! # wikiconv
//!
//! A wiki markup conversion pipeline. Every input dialect is parsed into one
//! intermediate document tree, optional passes rewrite that tree, and an
//! emitter renders it in the target dialect.
//!
//! ## Features
//!
//! - Read Moin wiki, Creole, MediaWiki, reStructuredText, DocBook, HTML,
//!   CSV, ZIP listings, source code and plain text
//! - Write HTML (fragment or full XHTML document), Moin wiki,
//!   reStructuredText and DocBook
//! - Expand includes and built-in macros, resolve wiki and inter-wiki links,
//!   highlight search matches and replace smileys
//! - Converters are found through a priority ordered [`registry`] keyed by
//!   content type, so new dialects plug in without touching the pipeline
//!
//! ## Quick Start
//!
//! ```
//! use wikiconv::host::MemoryHost;
//! use wikiconv::mime;
//! use wikiconv::pipeline::{ConvertOptions, convert};
//!
//! let out = convert(
//!     "= Title =\n\nSome ''emphasis''.",
//!     &mime::moin_wiki(),
//!     &mime::docbook(),
//!     &MemoryHost::new(),
//!     &ConvertOptions::default(),
//! )?
//! .into_text()?;
//! assert!(out.contains("<section><title>Title</title>"));
//! # Ok::<(), wikiconv::Error>(())
//! ```
//!
//! ## Working with the tree
//!
//! Converting to [`mime::moin_document`] stops at the intermediate tree,
//! which can be inspected or serialized with [`tree::write_tree`]:
//!
//! ```
//! use wikiconv::host::MemoryHost;
//! use wikiconv::mime;
//! use wikiconv::pipeline::{ConvertOptions, convert};
//!
//! let tree = convert(
//!     "||A||B||",
//!     &mime::moin_wiki(),
//!     &mime::moin_document(),
//!     &MemoryHost::new(),
//!     &ConvertOptions::default(),
//! )?
//! .into_tree()?;
//! let body = tree.find_page("body").unwrap();
//! assert!(body.find_page("table").is_some());
//! # Ok::<(), wikiconv::Error>(())
//! ```

pub mod args;
pub mod error;
pub mod export;
pub mod host;
pub mod import;
pub mod iri;
pub mod mime;
pub mod pipeline;
pub mod registry;
pub mod transform;
pub mod tree;
pub(crate) mod util;

pub use error::{Error, Result};
pub use pipeline::{ConvertOptions, Pipeline, convert, default_registry};
pub use registry::{Converter, Payload, Registry};
