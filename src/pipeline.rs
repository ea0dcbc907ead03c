//! End-to-end conversion pipelines.
//!
//! A [`Pipeline`] is the chain of converters between a source and a target
//! content type. Building one tries a direct converter first; otherwise the
//! chain goes through the intermediate document type:
//!
//! ```text
//! source -> application/x.moin.document
//!        -> ;includes=expandall -> ;macros=expandall -> ;links=extern
//!        -> ;icons=smiley -> ;highlight=regex
//!        -> target
//! ```
//!
//! Only the middle stages enabled in [`ConvertOptions`] are inserted.
//!
//! # Example
//!
//! ```
//! use wikiconv::host::MemoryHost;
//! use wikiconv::mime;
//! use wikiconv::pipeline::{ConvertOptions, convert};
//!
//! let html = convert(
//!     "== Heading 2 ==",
//!     &mime::moin_wiki(),
//!     &mime::moin_xhtml(),
//!     &MemoryHost::new(),
//!     &ConvertOptions::default(),
//! )?
//! .into_text()?;
//! assert!(html.contains("<h2 id=\"toc-0\">Heading 2</h2>"));
//! # Ok::<(), wikiconv::Error>(())
//! ```

use once_cell::sync::Lazy;

use crate::args::Arguments;
use crate::error::Result;
use crate::host::Host;
use crate::iri::Iri;
use crate::mime::{self, Type};
use crate::registry::{ConvertContext, Converter, Payload, Registry};

/// Settings for a single conversion.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// IRI of the page being converted, usually `wiki:///Name`.
    pub page_href: Option<Iri>,
    /// URL prefix of the wiki itself, used when turning wiki links into URLs.
    pub script_root: String,
    /// URL prefix of static assets such as smiley images.
    pub static_root: String,
    /// Link target for unknown inter-wiki names; defaults to the local
    /// `InterWiki` help page.
    pub bad_interwiki: Option<String>,
    /// Maximum include nesting before expansion stops.
    pub max_include_depth: usize,
    /// Regular expression for the highlight stage.
    pub highlight: Option<String>,
    /// Arguments handed to the source parser (from `#!parser args`).
    pub arguments: Option<Arguments>,
    /// Rewrite wiki links to external URLs.
    pub links: bool,
    /// Expand include directives.
    pub includes: bool,
    /// Expand built-in macros.
    pub macros: bool,
    /// Replace smiley tokens with images.
    pub smileys: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            page_href: None,
            script_root: String::new(),
            static_root: "/static".to_string(),
            bad_interwiki: None,
            max_include_depth: 16,
            highlight: None,
            arguments: None,
            links: false,
            includes: false,
            macros: false,
            smileys: false,
        }
    }
}

impl ConvertOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the current page by name (`wiki:///Name`).
    pub fn with_page(mut self, name: &str) -> Self {
        self.page_href = Some(
            Iri::new()
                .with_scheme("wiki")
                .with_authority("")
                .with_path(format!("/{name}")),
        );
        self
    }

    pub fn with_page_href(mut self, href: Iri) -> Self {
        self.page_href = Some(href);
        self
    }

    pub fn with_script_root(mut self, root: impl Into<String>) -> Self {
        self.script_root = root.into();
        self
    }

    pub fn with_static_root(mut self, root: impl Into<String>) -> Self {
        self.static_root = root.into();
        self
    }

    pub fn with_bad_interwiki(mut self, href: impl Into<String>) -> Self {
        self.bad_interwiki = Some(href.into());
        self
    }

    pub fn with_max_include_depth(mut self, depth: usize) -> Self {
        self.max_include_depth = depth;
        self
    }

    pub fn with_highlight(mut self, pattern: impl Into<String>) -> Self {
        self.highlight = Some(pattern.into());
        self
    }

    pub fn with_arguments(mut self, arguments: Arguments) -> Self {
        self.arguments = Some(arguments);
        self
    }

    pub fn with_links(mut self, enabled: bool) -> Self {
        self.links = enabled;
        self
    }

    pub fn with_includes(mut self, enabled: bool) -> Self {
        self.includes = enabled;
        self
    }

    pub fn with_macros(mut self, enabled: bool) -> Self {
        self.macros = enabled;
        self
    }

    pub fn with_smileys(mut self, enabled: bool) -> Self {
        self.smileys = enabled;
        self
    }

    /// Name of the current page, if it is a local wiki page.
    pub fn page_name(&self) -> Option<&str> {
        page_name_of(self.page_href.as_ref()?)
    }

    /// Placeholder link for unknown inter-wiki names.
    pub fn bad_interwiki_href(&self) -> String {
        self.bad_interwiki
            .clone()
            .unwrap_or_else(|| format!("{}/InterWiki", self.script_root.trim_end_matches('/')))
    }

    /// Intermediate types of the enabled middle stages, in pipeline order.
    pub fn middle_stages(&self) -> Vec<Type> {
        let doc = mime::moin_document();
        let mut stages = Vec::new();
        if self.includes {
            stages.push(doc.clone().with_parameter(mime::PARAM_INCLUDES, "expandall"));
        }
        if self.macros {
            stages.push(doc.clone().with_parameter(mime::PARAM_MACROS, "expandall"));
        }
        if self.links {
            stages.push(doc.clone().with_parameter(mime::PARAM_LINKS, "extern"));
        }
        if self.smileys {
            stages.push(doc.clone().with_parameter(mime::PARAM_ICONS, "smiley"));
        }
        if self.highlight.is_some() {
            stages.push(doc.with_parameter(mime::PARAM_HIGHLIGHT, "regex"));
        }
        stages
    }
}

/// Page name of a `wiki:///Name` IRI.
pub fn page_name_of(href: &Iri) -> Option<&str> {
    if href.scheme.as_deref() != Some("wiki") || href.authority.as_deref().is_some_and(|a| !a.is_empty()) {
        return None;
    }
    Some(href.path_str().trim_start_matches('/'))
}

struct Stage {
    input: Type,
    output: Type,
    converter: Box<dyn Converter>,
}

/// A resolved converter chain.
pub struct Pipeline<'r> {
    registry: &'r Registry,
    stages: Vec<Stage>,
}

impl<'r> Pipeline<'r> {
    /// Resolve the chain from `input` to `output`.
    pub fn build(
        registry: &'r Registry,
        input: &Type,
        output: &Type,
        options: &ConvertOptions,
    ) -> Result<Self> {
        let middle = options.middle_stages();
        let mut stages = Vec::new();

        if middle.is_empty()
            && let Some(converter) = registry.get(input, output)
        {
            stages.push(Stage {
                input: input.clone(),
                output: output.clone(),
                converter,
            });
            return Ok(Self { registry, stages });
        }

        let doc = mime::moin_document();
        let mut hops: Vec<(Type, Type)> = Vec::new();
        if !doc.issupertype(input) {
            hops.push((input.clone(), doc.clone()));
        }
        for stage in middle {
            hops.push((doc.clone(), stage));
        }
        if output != &doc {
            hops.push((doc.clone(), output.clone()));
        }

        for (from, to) in hops {
            let converter = registry.require(&from, &to)?;
            stages.push(Stage {
                input: from,
                output: to,
                converter,
            });
        }
        Ok(Self { registry, stages })
    }

    /// Number of converter stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// The `(input, output)` types of each stage.
    pub fn steps(&self) -> impl Iterator<Item = (&Type, &Type)> {
        self.stages.iter().map(|s| (&s.input, &s.output))
    }

    /// Thread `payload` through every stage.
    pub fn run(&self, payload: Payload, host: &dyn Host, options: &ConvertOptions) -> Result<Payload> {
        let ctx = ConvertContext {
            registry: self.registry,
            host,
            options,
        };
        let mut payload = payload;
        for stage in &self.stages {
            log::debug!("running stage {} -> {}", stage.input, stage.output);
            payload = stage.converter.convert(payload, &ctx)?;
        }
        Ok(payload)
    }
}

static DEFAULT_REGISTRY: Lazy<Registry> = Lazy::new(default_registry);

/// A registry with every built-in converter.
pub fn default_registry() -> Registry {
    let mut registry = Registry::new();
    crate::import::register(&mut registry);
    crate::transform::register(&mut registry);
    crate::export::register(&mut registry);
    registry
}

/// Convert `payload` from `input` to `output` with the built-in converters.
pub fn convert(
    payload: impl Into<Payload>,
    input: &Type,
    output: &Type,
    host: &dyn Host,
    options: &ConvertOptions,
) -> Result<Payload> {
    convert_with(&DEFAULT_REGISTRY, payload, input, output, host, options)
}

/// Like [`convert`] but with an explicit registry.
pub fn convert_with(
    registry: &Registry,
    payload: impl Into<Payload>,
    input: &Type,
    output: &Type,
    host: &dyn Host,
    options: &ConvertOptions,
) -> Result<Payload> {
    let pipeline = Pipeline::build(registry, input, output, options)?;
    pipeline.run(payload.into(), host, options)
}
