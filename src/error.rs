/*
 * error.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Error types for template parsing and rendering.

use thiserror::Error;

/// Errors that can occur during template compilation or rendering.
#[derive(Debug, Clone, Error)]
pub enum TemplateError {
    /// Error parsing the template syntax.
    #[error("Parse error: {message}")]
    ParseError { message: String },

    /// Section open/close mismatch or a section left unclosed.
    #[error("Invalid template: {message}")]
    StructureError { message: String },

    /// A bound value existed but couldn't be resolved the way the tag demanded
    /// (e.g. a pass-to-function target that isn't actually callable).
    #[error("Binding error at {tag}: {message}")]
    BindingError { tag: String, message: String },

    /// No binding at all was found for a tag, and `error_on_missing_tags` is set.
    #[error("Render error: missing binding for {tag}")]
    MissingBinding { tag: String },

    /// A callable binding returned an error, and `error_on_func_failure` is set.
    #[error("Callable failed while evaluating {tag}: {source}")]
    CallableFailure {
        tag: String,
        source: Box<TemplateError>,
    },

    /// A named partial wasn't registered, and `error_on_missing_tags` is set.
    #[error("Render error: missing partial for {name}")]
    MissingPartial { name: String },

    /// A registered partial source string failed to parse.
    #[error("Invalid partial template for '{name}': {source}")]
    InvalidPartial {
        name: String,
        source: Box<TemplateError>,
    },
}

/// Result type for template operations.
pub type Result<T> = std::result::Result<T, TemplateError>;

impl TemplateError {
    pub fn parse(message: impl Into<String>) -> Self {
        TemplateError::ParseError {
            message: message.into(),
        }
    }

    pub fn structure(message: impl Into<String>) -> Self {
        TemplateError::StructureError {
            message: message.into(),
        }
    }

    pub fn binding(tag: impl Into<String>, message: impl Into<String>) -> Self {
        TemplateError::BindingError {
            tag: tag.into(),
            message: message.into(),
        }
    }
}
