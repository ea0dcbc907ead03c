//! wikiconv - Wiki markup converter

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;

use wikiconv::host::{InterwikiMap, MemoryHost};
use wikiconv::mime::{self, Type};
use wikiconv::tree::write_tree;
use wikiconv::{ConvertOptions, Payload, Pipeline, default_registry};

#[derive(Parser)]
#[command(name = "wikiconv")]
#[command(version, about = "Wiki markup converter", long_about = None)]
#[command(after_help = "FORMATS:
    wiki, creole, mediawiki, rst, docbook, html, xhtml, moin-xhtml, csv, text, zip, tree
    or any full content type such as \"text/x.moin.wiki;charset=utf-8\"

EXAMPLES:
    wikiconv -f wiki -t html Page.txt        Render a Moin page as HTML
    wikiconv -f rst -t wiki < doc.rst        Convert reST to Moin markup
    wikiconv -f wiki -t tree --macros a.txt  Show the expanded document tree
    wikiconv -f wiki -t docbook --steps      Print the converter chain")]
struct Cli {
    /// Input file (reads stdin when omitted)
    #[arg(value_name = "INPUT")]
    input: Option<PathBuf>,

    /// Output file (writes stdout when omitted)
    #[arg(short, long, value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// Input format
    #[arg(short, long, default_value = "wiki")]
    from: String,

    /// Output format
    #[arg(short, long, default_value = "html")]
    to: String,

    /// Name of the page being converted
    #[arg(short, long)]
    page: Option<String>,

    /// Directory of Moin pages available to includes, one file per page
    #[arg(long, value_name = "DIR")]
    pages: Option<PathBuf>,

    /// Inter-wiki map in intermap.txt format
    #[arg(long, value_name = "FILE")]
    interwiki: Option<PathBuf>,

    /// URL prefix of the wiki, used for resolved links
    #[arg(long, default_value = "")]
    script_root: String,

    /// Resolve wiki and inter-wiki links to URLs
    #[arg(long)]
    links: bool,

    /// Expand includes
    #[arg(long)]
    includes: bool,

    /// Expand built-in macros
    #[arg(long)]
    macros: bool,

    /// Replace smileys with images
    #[arg(long)]
    smileys: bool,

    /// Highlight matches of a regular expression
    #[arg(long, value_name = "PATTERN")]
    highlight: Option<String>,

    /// Print the converter chain as JSON instead of converting
    #[arg(long)]
    steps: bool,

    /// Log each conversion stage
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Serialize)]
struct Step {
    input: String,
    output: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), String> {
    let input = content_type(&cli.from)?;
    let output = content_type(&cli.to)?;
    let options = options(cli);

    let registry = default_registry();
    let pipeline = Pipeline::build(&registry, &input, &output, &options).map_err(|e| e.to_string())?;

    if cli.steps {
        let steps: Vec<Step> = pipeline
            .steps()
            .map(|(from, to)| Step {
                input: from.to_string(),
                output: to.to_string(),
            })
            .collect();
        let json = serde_json::to_string_pretty(&steps).map_err(|e| e.to_string())?;
        return emit(cli.output.as_deref(), format!("{json}\n").as_bytes());
    }

    let host = host(cli)?;
    let source = read_input(cli.input.as_deref())?;
    let result = pipeline
        .run(Payload::Bytes(source), &host, &options)
        .map_err(|e| e.to_string())?;

    let bytes = match result {
        Payload::Tree(tree) => format!("{}\n", write_tree(&tree)).into_bytes(),
        Payload::Text(text) => text.into_bytes(),
        Payload::Bytes(bytes) => bytes,
    };
    emit(cli.output.as_deref(), &bytes)
}

/// Resolve a short format name or a full content type.
fn content_type(name: &str) -> Result<Type, String> {
    let ty = match name.to_ascii_lowercase().as_str() {
        "wiki" | "moin" | "moinwiki" => mime::moin_wiki(),
        "creole" => mime::moin_creole(),
        "mediawiki" | "mw" => mime::mediawiki(),
        "rst" | "rest" => mime::rst(),
        "docbook" => mime::docbook(),
        "html" => mime::html(),
        "xhtml" => mime::xhtml(),
        "moin-xhtml" => mime::moin_xhtml(),
        "csv" => mime::csv(),
        "text" | "txt" => mime::text_plain(),
        "zip" => mime::zip(),
        "tree" | "dom" => mime::moin_document(),
        _ => Type::parse(name).map_err(|e| format!("unknown format '{name}': {e}"))?,
    };
    Ok(ty)
}

fn options(cli: &Cli) -> ConvertOptions {
    let mut options = ConvertOptions::new()
        .with_script_root(cli.script_root.clone())
        .with_links(cli.links)
        .with_includes(cli.includes)
        .with_macros(cli.macros)
        .with_smileys(cli.smileys);
    if let Some(page) = &cli.page {
        options = options.with_page(page);
    }
    if let Some(pattern) = &cli.highlight {
        options = options.with_highlight(pattern.clone());
    }
    options
}

fn host(cli: &Cli) -> Result<MemoryHost, String> {
    let mut host = MemoryHost::new().with_script_root(cli.script_root.clone());

    if let Some(path) = &cli.interwiki {
        let text = fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
        host = host.with_interwiki(InterwikiMap::parse(&text));
    }

    if let Some(dir) = &cli.pages {
        let entries = fs::read_dir(dir).map_err(|e| format!("{}: {e}", dir.display()))?;
        for entry in entries {
            let path = entry.map_err(|e| e.to_string())?.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let text = fs::read_to_string(&path).map_err(|e| format!("{}: {e}", path.display()))?;
            log::debug!("loaded page {name}");
            host.add_page(name, &mime::moin_wiki().content_type(), &text);
        }
    }

    Ok(host)
}

fn read_input(path: Option<&Path>) -> Result<Vec<u8>, String> {
    match path {
        Some(path) => fs::read(path).map_err(|e| format!("{}: {e}", path.display())),
        None => {
            let mut buf = Vec::new();
            io::stdin().read_to_end(&mut buf).map_err(|e| e.to_string())?;
            Ok(buf)
        }
    }
}

fn emit(path: Option<&Path>, bytes: &[u8]) -> Result<(), String> {
    match path {
        Some(path) => fs::write(path, bytes).map_err(|e| format!("{}: {e}", path.display())),
        None => io::stdout().write_all(bytes).map_err(|e| e.to_string()),
    }
}
