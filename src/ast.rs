/*
 * ast.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Tag parsing and the parsed template tree.
//!
//! [`parse_tag`] turns the trimmed text between a template's delimiters into a
//! [`ParsedTag`], applying the directive precedence rules in order: leading
//! symbol, in-context marker, pass-to-function split, format split, escape
//! marker. [`Template`] assembly (see `parser.rs`) then turns a `ParsedTag`
//! into the right [`Node`] variant, applying the directive-specific validity
//! rules (a section can't carry FORMAT/ESCAPE, a partial can't carry anything
//! but its key and the root-partial marker).

use crate::directive::{self, Directive};
use crate::error::{Result, TemplateError};

/// The pass-to-function target of a tag: `key->func`.
#[derive(Debug, Clone)]
pub struct PassToFunctionNode {
    pub key: String,
    pub keysplit: Vec<String>,
    pub incontext: bool,
}

impl PassToFunctionNode {
    fn new(key: String, incontext: bool) -> Self {
        let keysplit = key.split('.').map(str::to_string).collect();
        PassToFunctionNode {
            key,
            keysplit,
            incontext,
        }
    }
}

/// Whether a non-section tag is a plain value lookup or a grammatical-list join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Value,
    List,
}

#[derive(Debug, Clone)]
pub struct TagNode {
    pub raw: String,
    pub key: String,
    pub keysplit: Vec<String>,
    pub incontext: bool,
    pub func: Option<PassToFunctionNode>,
    pub format: Option<String>,
    pub escape: Option<bool>,
    pub kind: TagKind,
}

#[derive(Debug, Clone)]
pub struct PartialNode {
    pub raw: String,
    pub key: String,
    pub incontext: bool,
}

#[derive(Debug, Clone)]
pub struct SectionNode {
    pub raw: String,
    pub key: String,
    pub keysplit: Vec<String>,
    pub incontext: bool,
    pub func: Option<PassToFunctionNode>,
    pub inclusive: bool,
    pub list: bool,
    pub body: Vec<Node>,
}

impl SectionNode {
    /// Clone a section node for deferred (phase-two) rendering, dropping its body
    /// (the caller supplies a freshly phase-one-processed fragment list instead).
    pub fn clone_shell(&self) -> SectionNode {
        SectionNode {
            raw: self.raw.clone(),
            key: self.key.clone(),
            keysplit: self.keysplit.clone(),
            incontext: self.incontext,
            func: self.func.clone(),
            inclusive: self.inclusive,
            list: self.list,
            body: Vec::new(),
        }
    }

    /// Rewrite an in-context key (and in-context func key) to the absolute key it
    /// resolved to just before being deferred. Needed because by the time a
    /// deferred repeating section is replayed in phase two, the surrounding
    /// lexical in-context chain no longer exists -- only the flattened fragment
    /// tree does.
    pub fn freeze_incontext(&mut self, resolved_key: &str, resolved_func_key: Option<&str>) {
        if self.incontext {
            self.key = resolved_key.to_string();
            self.keysplit = self.key.split('.').map(str::to_string).collect();
            self.incontext = false;
        }
        if let (Some(func), Some(resolved)) = (&mut self.func, resolved_func_key) {
            if func.incontext {
                func.key = resolved.to_string();
                func.keysplit = func.key.split('.').map(str::to_string).collect();
                func.incontext = false;
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum Node {
    Text(String),
    Tag(TagNode),
    Partial(PartialNode),
    Section(SectionNode),
}

/// Intermediate parse result for one `{{...}}` tag, before the scanner decides
/// what kind of [`Node`] it becomes.
pub struct ParsedTag {
    pub raw: String,
    pub key: String,
    pub keysplit: Vec<String>,
    pub incontext: bool,
    pub func: Option<PassToFunctionNode>,
    pub format: Option<String>,
    pub escape: Option<bool>,
    pub directive: Directive,
}

/// Parse the trimmed tag body. Returns `None` for a comment.
pub fn parse_tag(raw: &str, inner: &str) -> Result<Option<ParsedTag>> {
    if inner.is_empty() {
        return Ok(None);
    }

    let directive = match directive::leading(inner) {
        None => return Ok(None),
        Some(d) => d,
    };
    let mut key = inner[directive::leading_width(directive)..].to_string();

    let mut incontext = false;
    if key.starts_with(directive::IN_CONTEXT) {
        incontext = true;
        key.remove(0);
    }
    if directive == Directive::Partial && incontext {
        return Err(TemplateError::parse(format!(
            "cannot have partial directive as in-context at {raw}"
        )));
    }

    let (mut key, mut func) = split_pass_context(&key, incontext, raw)?;

    let format_target = func.as_ref().map(|f| f.key.as_str()).unwrap_or(&key);
    let (new_target, format) = split_format(format_target, incontext, raw)?;
    if let Some(func) = func.as_mut() {
        func.key = new_target.clone();
        func.keysplit = new_target.split('.').map(str::to_string).collect();
    } else {
        key = new_target.clone();
    }

    let mut format = format;
    let mut escape = false;
    {
        let target = func.as_ref().map(|f| f.key.as_str()).unwrap_or(&key);
        if let Some(stripped) = target.strip_suffix(directive::ESCAPE) {
            escape = true;
            let stripped = stripped.to_string();
            if let Some(func) = func.as_mut() {
                func.key = stripped.clone();
                func.keysplit = stripped.split('.').map(str::to_string).collect();
            } else {
                key = stripped;
            }
        }
    }
    if let Some(f) = format.as_ref() {
        if let Some(stripped) = f.strip_suffix(directive::ESCAPE) {
            escape = true;
            format = Some(stripped.to_string());
        }
    }

    key = key.trim().to_string();
    if key.is_empty() && !incontext {
        return Err(TemplateError::parse(format!("empty evaluation at {raw}")));
    }
    let keysplit = key.split('.').map(str::to_string).collect();

    Ok(Some(ParsedTag {
        raw: raw.to_string(),
        key,
        keysplit,
        incontext,
        func,
        format,
        escape: Some(escape),
        directive,
    }))
}

/// Split on the first (and only permitted) `->`. Unlike FORMAT, a leading or
/// trailing empty side is always an error -- there's no "assume it's part of
/// the name" escape hatch for pass-to-function.
fn split_pass_context(
    key: &str,
    incontext: bool,
    raw: &str,
) -> Result<(String, Option<PassToFunctionNode>)> {
    let occurrences = key.matches(directive::PASS_CONTEXT).count();
    if occurrences == 0 {
        return Ok((key.to_string(), None));
    }
    if occurrences >= 2 {
        return Err(TemplateError::parse(format!(
            "multiple function context directives at {raw}"
        )));
    }
    let (left, right) = key.split_once(directive::PASS_CONTEXT).unwrap();
    if (left.is_empty() && !incontext) || right.is_empty() || right.starts_with('-') {
        return Err(TemplateError::parse(format!(
            "malformatted function context directive at {raw}"
        )));
    }
    let mut func_incontext = false;
    let mut func_key = right.to_string();
    if func_key.starts_with(directive::IN_CONTEXT) {
        func_incontext = true;
        func_key.remove(0);
    }
    if func_key.is_empty() && !func_incontext {
        return Err(TemplateError::parse(format!(
            "empty function context evaluation at {raw}"
        )));
    }
    Ok((
        left.to_string(),
        Some(PassToFunctionNode::new(func_key, func_incontext)),
    ))
}

/// Split on the first (and only permitted) `::`. A leading or trailing empty
/// side is treated as plain text (part of the name), not a format directive.
fn split_format(target: &str, incontext: bool, raw: &str) -> Result<(String, Option<String>)> {
    let occurrences = target.matches(directive::FORMAT).count();
    if occurrences == 0 {
        return Ok((target.to_string(), None));
    }
    if occurrences >= 2 {
        return Err(TemplateError::parse(format!(
            "multiple format directives at {raw}"
        )));
    }
    let (left, right) = target.split_once(directive::FORMAT).unwrap();
    let collapse = (left.is_empty() && !incontext) || right.is_empty();
    if collapse {
        return Ok((target.to_string(), None));
    }
    if right.starts_with(':') {
        return Err(TemplateError::parse(format!(
            "malformed format directive at {raw}"
        )));
    }
    Ok((left.to_string(), Some(right.to_string())))
}
