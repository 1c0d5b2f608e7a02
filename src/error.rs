//! Error types for the book builder.

use thiserror::Error;

/// Errors raised while assembling a book.
///
/// Topic-level problems (bad XML, broken injections) never surface here; they
/// are recorded in the [`ErrorDatabase`](crate::error_database::ErrorDatabase)
/// and the topic is rendered through a fallback template instead.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("build cancelled")]
    Cancelled,

    #[error("content specification has no content: {0}")]
    MissingContent(String),

    #[error("topic store error: {0}")]
    Store(#[from] StoreError),

    #[error("XML error: {0}")]
    Xml(#[from] XmlError),

    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Failures reported by a [`TopicStore`](crate::store::TopicStore).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("transient store failure: {0}")]
    Transient(String),

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: i64 },

    #[error("store rejected request: {0}")]
    Rejected(String),
}

/// Failures parsing topic XML into a tree.
#[derive(Error, Debug)]
pub enum XmlError {
    #[error("{0}")]
    Parse(#[from] quick_xml::Error),

    #[error("malformed attribute: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),

    #[error("malformed document: {0}")]
    Malformed(String),

    #[error("document has no root element")]
    Empty,
}

pub type Result<T> = std::result::Result<T, BuildError>;
