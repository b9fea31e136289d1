//! Filtered views of a specification document.

use std::fmt;
use std::str::FromStr;

use crate::document::{strip_keys, Document};
use crate::error::SpecError;
use crate::EXTENSION_KEY;

/// Prefix of fields only API Gateway understands.
pub const PROVIDER_PREFIX: &str = "x-amazon-apigateway-";
/// Prefix of documentation-only vendor extensions.
pub const DOC_PREFIX: &str = "x-doc-";
/// Standard documentation-only fields.
pub const DOC_FIELDS: &[&str] = &["externalDocs", "example", "examples"];

/// Which subset of a specification to expose.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SpecView {
    /// Human documentation: no provider wiring, no application block.
    Doc,
    /// What the provider imports: no documentation-only fields, no
    /// application block.
    #[default]
    Aws,
    /// Everything.
    Complete,
}

impl SpecView {
    pub fn apply(&self, doc: &Document) -> Document {
        match self {
            SpecView::Doc => strip_keys(doc, &|k: &str| is_application_field(k) || is_provider_field(k)),
            SpecView::Aws => strip_keys(doc, &|k: &str| is_application_field(k) || is_doc_field(k)),
            SpecView::Complete => doc.clone(),
        }
    }
}

pub fn is_provider_field(key: &str) -> bool {
    key.starts_with(PROVIDER_PREFIX)
}

pub fn is_doc_field(key: &str) -> bool {
    key.starts_with(DOC_PREFIX) || DOC_FIELDS.contains(&key)
}

fn is_application_field(key: &str) -> bool {
    key == EXTENSION_KEY
}

impl FromStr for SpecView {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "doc" => Ok(SpecView::Doc),
            "aws" | "provider" => Ok(SpecView::Aws),
            "complete" => Ok(SpecView::Complete),
            _ => Err(SpecError::InvalidView(s.to_string())),
        }
    }
}

impl fmt::Display for SpecView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SpecView::Doc => "doc",
            SpecView::Aws => "aws",
            SpecView::Complete => "complete",
        })
    }
}
