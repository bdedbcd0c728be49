//! Error types for template compilation, key derivation and parsing.

use thiserror::Error;

/// Result type alias for template operations.
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Errors raised while compiling or rendering templates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("template {template}: missing {section} section")]
    MissingSection {
        template: String,
        section: &'static str,
    },

    #[error("template {template}: {reason}")]
    Parse { template: String, reason: String },

    #[error("unknown template: {0}")]
    UnknownTemplate(String),

    #[error("template {template}: cannot resolve .{field}")]
    Unresolved { template: String, field: String },

    #[error("entry cannot be rendered: {0}")]
    Entry(String),
}

/// Errors raised by the identifier parsers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("bad image reference: {0}")]
    BadImage(String),
}
