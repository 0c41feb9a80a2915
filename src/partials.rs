/*
 * partials.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Named partial templates bound into a render's [`Options`](crate::Options).
//!
//! Unlike a filesystem-backed include mechanism, partials here are supplied
//! by name up front -- either as template source text (compiled lazily, once
//! per render, on first reference) or as an already-compiled [`Template`].

use crate::error::{Result, TemplateError};
use crate::parser::Template;

/// A named partial, as bound by the caller.
#[derive(Debug, Clone)]
pub enum PartialSource {
    Raw(String),
    Parsed(Template),
}

impl PartialSource {
    /// Produce the compiled [`Template`] for this partial, wrapping a parse
    /// failure with the partial's name.
    pub fn compiled(&self, name: &str) -> Result<Template> {
        match self {
            PartialSource::Raw(source) => Template::compile(source)
                .map_err(|e| TemplateError::InvalidPartial {
                    name: name.to_string(),
                    source: Box::new(e),
                }),
            PartialSource::Parsed(template) => Ok(template.clone()),
        }
    }
}

impl From<&str> for PartialSource {
    fn from(s: &str) -> Self {
        PartialSource::Raw(s.to_string())
    }
}

impl From<String> for PartialSource {
    fn from(s: String) -> Self {
        PartialSource::Raw(s)
    }
}

impl From<Template> for PartialSource {
    fn from(t: Template) -> Self {
        PartialSource::Parsed(t)
    }
}
