//! scpkit-wire - System Configuration Profile XML
//!
//! This crate maps rendered wire fragments to SCP XML documents and back:
//! - Writer/reader over the quick-xml event API (SCP elements carry
//!   dynamic attributes such as `FQDD`, so serde derive does not fit)
//! - A generic parsed document model (`ScpDocument`)
//! - A loader that applies a parsed document to a schema-built tree with
//!   bulk-load (`Precommit`) semantics

pub mod document;
pub mod loader;

use thiserror::Error;

pub use document::{parse_document, to_xml, to_xml_with_header, DocumentHeader, ScpAttribute, ScpComponent, ScpDocument};
pub use loader::{load_document, LoadReport};

#[derive(Error, Debug)]
pub enum WireError {
    #[error("failed to parse SCP document: {0}")]
    Parse(String),
    #[error("failed to serialize SCP document: {0}")]
    Serialize(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed document: {0}")]
    Malformed(String),
}
