//! Error types for conversion operations.
//!
//! Only registry and programmer errors surface as [`Error`]. Problems in the
//! converted content itself (unknown macros, include cycles, bad interwiki
//! names, unclosed blocks) are recorded in the output tree as `page:error`
//! elements and the conversion carries on.

use thiserror::Error;

/// Errors that can occur while building or running a conversion pipeline.
#[derive(Error, Debug)]
pub enum Error {
    #[error("no converter from {input} to {output}")]
    UnknownContentType { input: String, output: String },

    #[error("invalid content type: {0}")]
    InvalidType(String),

    #[error("cannot quote IRI component: {0}")]
    IriQuote(String),

    #[error("argument error: {0}")]
    Args(#[from] ArgsError),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("invalid pattern: {0}")]
    Regex(#[from] regex::Error),

    #[error("invalid document tree: {0}")]
    InvalidTree(String),

    #[error("expected {expected} payload, found {found}")]
    WrongPayload {
        expected: &'static str,
        found: &'static str,
    },
}

/// Errors raised by the argument parser.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgsError {
    #[error("unexpected closing bracket {0:?}")]
    UnexpectedClose(char),

    #[error("missing closing bracket {0:?}")]
    MissingClose(char),
}

pub type Result<T> = std::result::Result<T, Error>;
