/*
 * lib.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! A small, logic-enabled text template engine in the Mustache lineage.
//!
//! Tags are written between `{{` and `}}` (configurable). A bare `{{key}}`
//! substitutes a value; other leading symbols select a directive:
//!
//! - `{{! comment }}` is dropped entirely.
//! - `{{&key}}` joins an array value grammatically (`A, B, and C`).
//! - `{{#key}}...{{/key}}` is an inclusive section: rendered once per item if
//!   `key` is an array, rendered once (with its own value as context) if
//!   truthy and not an array, and skipped otherwise.
//! - `{{^key}}...{{/key}}` is the exclusive counterpart.
//! - `{{&#key}}...{{/key}}` is a repeating section whose iterations are
//!   joined grammatically instead of concatenated.
//! - `{{>name}}` splices in a named partial; `{{>name^}}` renders it against
//!   the document root instead of the current context.
//! - `{{.key}}` resolves `key` against the current context rather than
//!   bubbling up and searching from the root.
//! - `{{key->func}}` passes `key`'s value through a callable binding named
//!   `func` before using the result.
//! - `{{key::spec}}` applies a named or printf-style format spec.
//! - A trailing `;` forces HTML escaping regardless of `escape_all`.
//!
//! # Example
//!
//! ```
//! use doctemplate_logic::{render, Options, Value};
//!
//! let template = "Hello, {{name}}!";
//! let mut bindings = std::collections::HashMap::new();
//! bindings.insert("name".to_string(), Value::from("World"));
//! let out = render(template, Value::Object(bindings), &Options::default()).unwrap();
//! assert_eq!(out, "Hello, World!");
//! ```

use std::collections::HashMap;

pub mod ast;
pub mod directive;
pub mod domain;
pub mod error;
pub mod formatter;
pub mod parser;
pub mod partials;
pub mod renderer;
pub mod value;

pub use error::{Result, TemplateError};
pub use parser::Template;
pub use partials::PartialSource;
pub use value::{Callable, Value};

/// Render-time options: the four leniency/escaping switches, the delimiter
/// pair, and the partials a template may reference.
///
/// Deserializable so a host application can source the leniency switches and
/// delimiters from its own project configuration; `partials` is runtime-only
/// (a `{{>name}}` binding is supplied programmatically, not read from a
/// config file) and is always empty on deserialize.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Options {
    /// Propagate a [`TemplateError::CallableFailure`] when a callable binding
    /// errors, instead of substituting a null value.
    #[serde(default)]
    pub error_on_func_failure: bool,
    /// Treat a numeric `0` or boolean `false` as truthy for section display.
    #[serde(default)]
    pub eval_zero_as_true: bool,
    /// HTML-escape every substitution, not just ones ending in `;`.
    #[serde(default)]
    pub escape_all: bool,
    /// Propagate a [`TemplateError::MissingBinding`]/[`TemplateError::MissingPartial`]
    /// for an unresolved tag or partial, instead of rendering empty.
    #[serde(default)]
    pub error_on_missing_tags: bool,
    /// Named partial templates available to `{{>name}}` tags.
    #[serde(skip)]
    pub partials: HashMap<String, PartialSource>,
    /// The open/close delimiter pair, `{{`/`}}` unless overridden.
    #[serde(default = "default_delimiters")]
    pub delimiters: (String, String),
}

fn default_delimiters() -> (String, String) {
    (
        parser::DEFAULT_DELIMITERS.0.to_string(),
        parser::DEFAULT_DELIMITERS.1.to_string(),
    )
}

impl Default for Options {
    fn default() -> Self {
        Options {
            error_on_func_failure: false,
            eval_zero_as_true: false,
            escape_all: false,
            error_on_missing_tags: false,
            partials: HashMap::new(),
            delimiters: default_delimiters(),
        }
    }
}

/// A compiled template bound to a set of render options, ready to be
/// rendered repeatedly against different bindings.
///
/// Compiling once and calling [`Engine::render`] many times avoids
/// re-parsing the template text on every render, the way [`render`] would.
#[derive(Debug, Clone)]
pub struct Engine {
    template: Template,
    options: Options,
}

/// Compile `source` under `options.delimiters`, producing an [`Engine`] that
/// can be rendered repeatedly.
pub fn make(source: &str, options: Options) -> Result<Engine> {
    let delimiters = (options.delimiters.0.as_str(), options.delimiters.1.as_str());
    let template = Template::compile_with_delimiters(source, delimiters)?;
    Ok(Engine { template, options })
}

impl Engine {
    /// Render against `bindings`, using the options this engine was made with.
    pub fn render(&self, bindings: Value) -> Result<String> {
        renderer::render(&self.template, bindings, &self.options)
    }

    /// Render against `bindings`, overriding the options this engine was made
    /// with (delimiters are fixed at compile time and cannot be overridden
    /// here).
    pub fn render_with(&self, bindings: Value, options: &Options) -> Result<String> {
        renderer::render(&self.template, bindings, options)
    }
}

/// Compile `source` and render it against `bindings` in one call, equivalent
/// to `make(source, options.clone())?.render(bindings)`.
pub fn render(source: &str, bindings: Value, options: &Options) -> Result<String> {
    let delimiters = (options.delimiters.0.as_str(), options.delimiters.1.as_str());
    let template = Template::compile_with_delimiters(source, delimiters)?;
    renderer::render(&template, bindings, options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_to_end_render() {
        let mut bindings = HashMap::new();
        bindings.insert("name".to_string(), Value::from("Ferris"));
        let out = render("Hi {{name}}", Value::Object(bindings), &Options::default()).unwrap();
        assert_eq!(out, "Hi Ferris");
    }

    #[test]
    fn custom_delimiters_are_honored() {
        let mut options = Options::default();
        options.delimiters = ("<%".to_string(), "%>".to_string());
        let out = render("Hi <%name%>", Value::from("unused"), &options);
        // a scalar root with no object fields means `name` is simply missing
        assert_eq!(out.unwrap(), "Hi ");
    }

    #[test]
    fn engine_renders_same_template_twice() {
        let engine = make("Hi {{name}}", Options::default()).unwrap();
        let mut alice = HashMap::new();
        alice.insert("name".to_string(), Value::from("Alice"));
        let mut bob = HashMap::new();
        bob.insert("name".to_string(), Value::from("Bob"));
        assert_eq!(engine.render(Value::Object(alice)).unwrap(), "Hi Alice");
        assert_eq!(engine.render(Value::Object(bob)).unwrap(), "Hi Bob");
    }

    #[test]
    fn options_deserialize_from_a_config_fragment() {
        let options: Options = serde_json::from_str(
            r#"{"error_on_missing_tags": true, "escape_all": true}"#,
        )
        .unwrap();
        assert!(options.error_on_missing_tags);
        assert!(options.escape_all);
        assert!(!options.error_on_func_failure);
        assert_eq!(options.delimiters, default_delimiters());
        assert!(options.partials.is_empty());
    }
}
