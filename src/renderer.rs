/*
 * renderer.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The two-phase render: outside-in resolution followed by inside-out
//! iteration.
//!
//! A template's compiled node tree is walked once "outside-in", top to
//! bottom, resolving every tag and section it can against the domain that's
//! concretely known at that point. A tag nested inside a repeating section
//! can't be resolved yet -- the section hasn't been split into its N items --
//! so both that tag and the still-unsplit section are carried forward, raw,
//! as [`Fragment::Pending`]/[`Fragment::DeferredSection`] entries. The result
//! of the first pass is a flat [`Fragment`] list: literal text, already-
//! rendered strings, confirmed repeating sections (with their own body
//! already run through the same first pass once, against the *unsplit* repeating
//! domain), and whatever couldn't be resolved yet.
//!
//! The second, "inside-out" pass walks that fragment list and actually
//! iterates every repeating section -- at which point in-context tags inside
//! its body resolve against each item in turn -- and makes a final attempt at
//! anything still unresolved. Nothing is deferred past this point: a binding
//! that's still missing here is handled according to `error_on_missing_tags`.

use crate::ast::{Node, PartialNode, PassToFunctionNode, SectionNode, TagKind, TagNode};
use crate::directive::ValueKind;
use crate::domain::{DomainArena, DomainId, ErrorHandler};
use crate::error::{Result, TemplateError};
use crate::formatter;
use crate::parser::Template;
use crate::value::Value;
use crate::Options;

/// Shared, read-only state threaded through a render call.
struct Rctx<'a> {
    arena: &'a DomainArena,
    options: &'a Options,
    root: DomainId,
}

/// One piece of a partially- or fully-rendered template.
enum Fragment {
    Text(String),
    Rendered(String),
    Pending(TagNode),
    PendingPartial(PartialNode),
    DeferredSection(SectionNode),
    /// A section confirmed repeating in the first pass: `domain` is the
    /// (unsplit) array domain, `body` is that section's own first-pass
    /// fragment list, to be replayed once per item in the second pass.
    PendingRepeat {
        header: SectionNode,
        domain: DomainId,
        body: Vec<Fragment>,
    },
}

/// Render a compiled template against a binding value.
pub fn render(template: &Template, bindings: Value, options: &Options) -> Result<String> {
    let arena = DomainArena::new();
    let root = arena.new_root(bindings);
    let ctx = Rctx {
        arena: &arena,
        options,
        root,
    };
    let mut unresolved = Vec::new();
    let fragments = render_outside_in(&template.root, root, &mut unresolved, &ctx)?;
    render_inside_out(&fragments, root, &[], &ctx)
}

fn make_error_handler<'a>(
    options: &'a Options,
    raw: &'a str,
) -> impl Fn(&TemplateError) -> Result<Value> + 'a {
    move |e: &TemplateError| {
        if options.error_on_func_failure {
            Err(TemplateError::CallableFailure {
                tag: raw.to_string(),
                source: Box::new(e.clone()),
            })
        } else {
            Ok(Value::Null)
        }
    }
}

fn missing_tag(options: &Options, raw: &str) -> Result<String> {
    if options.error_on_missing_tags {
        Err(TemplateError::MissingBinding {
            tag: raw.to_string(),
        })
    } else {
        tracing::debug!(tag = raw, "missing binding, rendering empty");
        Ok(String::new())
    }
}

/// Whether the current domain itself rules out resolving this node at all,
/// independent of anything in `unresolved` -- a still-unsplit repeating
/// domain can't answer an in-context lookup (there's no single item yet).
fn immediate_defer(
    arena: &DomainArena,
    domain: DomainId,
    incontext: bool,
    func: Option<&PassToFunctionNode>,
) -> bool {
    arena.is_repeating(domain) && (incontext || func.is_some_and(|f| f.incontext))
}

/// Whether some ancestor section, itself still waiting to be split into
/// items, would have to be resolved before this node's key could possibly
/// mean anything -- e.g. a tag one level inside `{{#rows}}` whose key is
/// `rows.label` needs `rows` split into an item first, even though the
/// *current* domain at the tag might not itself be repeating.
fn blocked_by_unresolved(
    arena: &DomainArena,
    unresolved: &[DomainId],
    check_own_key: bool,
    key: &str,
    func: Option<&PassToFunctionNode>,
) -> bool {
    for &u in unresolved {
        if check_own_key && arena.incontext_of(u, key) {
            return true;
        }
        if let Some(f) = func {
            if arena.incontext_of(u, &f.key) {
                return true;
            }
        }
    }
    false
}

/// Resolve a tag's key against `domain`, consulting `dynamics` first when the
/// key isn't itself in-context. A deferred in-context tag, replayed during
/// the second pass against one particular item, still needs to be able to
/// reach an *outer* repeating ancestor's item by its absolute key -- that's
/// what `dynamics` (searched innermost-first) is for.
fn search_tag(
    arena: &DomainArena,
    domain: DomainId,
    dynamics: &[DomainId],
    key: &str,
    keysplit: &[String],
    incontext: bool,
    on_error: ErrorHandler,
) -> Result<Option<DomainId>> {
    if !incontext {
        for &dy in dynamics.iter().rev() {
            if arena.incontext_of(dy, key) {
                return arena.search(dy, key, keysplit, incontext, on_error);
            }
        }
    }
    arena.search(domain, key, keysplit, incontext, on_error)
}

#[derive(Clone)]
struct Resolved {
    id: DomainId,
    is_repeating: bool,
    func_fullkey: Option<String>,
}

/// The full resolution of one key (and its optional pass-to-function target)
/// against a domain: look up the key, and if there's a `->func`, call it with
/// the key's value as `this` and re-root onto the result.
#[allow(clippy::too_many_arguments)]
fn resolve_context(
    arena: &DomainArena,
    domain: DomainId,
    dynamics: &[DomainId],
    key: &str,
    keysplit: &[String],
    incontext: bool,
    func: Option<&PassToFunctionNode>,
    root: &Value,
    tag_raw: &str,
    on_error: ErrorHandler,
) -> Result<Option<Resolved>> {
    let base_id = match search_tag(arena, domain, dynamics, key, keysplit, incontext, on_error)? {
        Some(id) => id,
        None => return Ok(None),
    };
    let (id, func_fullkey) = match func {
        None => (base_id, None),
        Some(func) => {
            let func_id = search_tag(
                arena,
                domain,
                dynamics,
                &func.key,
                &func.keysplit,
                func.incontext,
                on_error,
            )?
            .ok_or_else(|| {
                TemplateError::binding(
                    tag_raw,
                    format!("pass-to-function target '{}' not found", func.key),
                )
            })?;
            if !arena.is_function(func_id) {
                return Err(TemplateError::binding(
                    tag_raw,
                    format!("pass-to-function target '{}' is not callable", func.key),
                ));
            }
            let this = arena.value(base_id, on_error)?;
            let callable = arena.function(func_id).expect("checked is_function above");
            let value = arena.evalf(&callable, this, root, on_error)?;
            let discriminator = arena.fullkey(func_id);
            let rerooted = arena.reroot(base_id, &discriminator, value);
            (rerooted, Some(discriminator))
        }
    };
    arena.value(id, on_error)?;
    let is_repeating = arena.is_repeating(id);
    Ok(Some(Resolved {
        id,
        is_repeating,
        func_fullkey,
    }))
}

/// The richer section-display predicate: an explicit `_display` key on an
/// object bypasses `inclusive` entirely, arrays are always "shown" regardless
/// of length (an empty inclusive array just iterates zero times), and a
/// scalar `0`/`0.0`/`false` falls back to `eval_zero_as_true`.
fn display(
    arena: &DomainArena,
    id: DomainId,
    inclusive: bool,
    options: &Options,
    on_error: ErrorHandler,
) -> Result<bool> {
    let kind = arena.kind(id);
    if kind == ValueKind::Object {
        if let Some(display_id) = arena.get(id, "_display", on_error, false)? {
            return Ok(arena.value(display_id, on_error)?.is_truthy());
        }
    }
    let value = arena.value(id, on_error)?;
    let truthy = match kind {
        ValueKind::Array => true,
        _ => match &value {
            Value::String(s) => !s.trim().is_empty(),
            Value::Int(i) => *i != 0 || options.eval_zero_as_true,
            Value::Float(f) => *f != 0.0 || options.eval_zero_as_true,
            Value::Bool(b) => *b || options.eval_zero_as_true,
            _ => value.is_truthy(),
        },
    };
    Ok(inclusive == truthy)
}

fn render_tag_value(options: &Options, tag: &TagNode, value: &Value) -> String {
    if matches!(value, Value::Null) {
        return String::new();
    }
    let escape = tag.escape.unwrap_or(false) || options.escape_all;
    match tag.kind {
        TagKind::List => match value {
            Value::Array(items) => {
                let pieces: Vec<String> = items
                    .iter()
                    .map(|item| match item {
                        Value::Array(_) => item.to_plain_string(),
                        _ => formatter::format_value(item, tag.format.as_deref(), escape),
                    })
                    .collect();
                formatter::join_grammatically(pieces)
            }
            Value::Object(_) => {
                let s = value.to_json_string();
                if escape {
                    formatter::html_escape(&s)
                } else {
                    s
                }
            }
            other => formatter::format_value(other, tag.format.as_deref(), escape),
        },
        TagKind::Value => match value {
            Value::Array(_) => {
                let s = value.to_plain_string();
                if escape {
                    formatter::html_escape(&s)
                } else {
                    s
                }
            }
            Value::Object(_) => {
                let s = value.to_json_string();
                if escape {
                    formatter::html_escape(&s)
                } else {
                    s
                }
            }
            _ => formatter::format_value(value, tag.format.as_deref(), escape),
        },
    }
}

fn finish_header(section: &SectionNode, r: &Resolved, arena: &DomainArena) -> SectionNode {
    let mut header = section.clone_shell();
    let resolved_key = arena.fullkey(r.id);
    header.freeze_incontext(&resolved_key, r.func_fullkey.as_deref());
    header
}

/// Dispatch an already-resolved section context: either confirm it as a
/// repeating section (producing a single `PendingRepeat` with its body run
/// through the first pass once more, against the unsplit array), or, for a
/// concrete single value, decide whether it's shown at all and splice its
/// body directly into the surrounding fragment list.
fn dispatch_section(
    section: &SectionNode,
    r: Resolved,
    unresolved: &mut Vec<DomainId>,
    ctx: &Rctx,
) -> Result<Vec<Fragment>> {
    if r.is_repeating {
        let length = ctx.arena.dynamic_len(r.id);
        if !(section.inclusive && length > 0) {
            return Ok(Vec::new());
        }
        let header = finish_header(section, &r, ctx.arena);
        unresolved.push(r.id);
        let body = render_outside_in(&section.body, r.id, unresolved, ctx)?;
        unresolved.pop();
        Ok(vec![Fragment::PendingRepeat {
            header,
            domain: r.id,
            body,
        }])
    } else {
        let handler = make_error_handler(ctx.options, &section.raw);
        let on_error: ErrorHandler = &handler;
        if display(ctx.arena, r.id, section.inclusive, ctx.options, on_error)? {
            render_outside_in(&section.body, r.id, unresolved, ctx)
        } else {
            Ok(Vec::new())
        }
    }
}

fn render_outside_in(
    nodes: &[Node],
    domain: DomainId,
    unresolved: &mut Vec<DomainId>,
    ctx: &Rctx,
) -> Result<Vec<Fragment>> {
    let mut out = Vec::new();
    for node in nodes {
        match node {
            Node::Text(s) => out.push(Fragment::Text(s.clone())),

            Node::Tag(tag) => {
                if immediate_defer(ctx.arena, domain, tag.incontext, tag.func.as_ref()) {
                    out.push(Fragment::Pending(tag.clone()));
                    continue;
                }
                let check_own_key = tag.kind == TagKind::Value;
                if blocked_by_unresolved(
                    ctx.arena,
                    unresolved,
                    check_own_key,
                    &tag.key,
                    tag.func.as_ref(),
                ) {
                    out.push(Fragment::Pending(tag.clone()));
                    continue;
                }
                let handler = make_error_handler(ctx.options, &tag.raw);
                let on_error: ErrorHandler = &handler;
                let root = ctx.arena.value(ctx.root, on_error)?;
                let resolved = resolve_context(
                    ctx.arena,
                    domain,
                    &[],
                    &tag.key,
                    &tag.keysplit,
                    tag.incontext,
                    tag.func.as_ref(),
                    &root,
                    &tag.raw,
                    on_error,
                )?;
                match resolved {
                    None => out.push(Fragment::Pending(tag.clone())),
                    Some(r) => {
                        let value = ctx.arena.value(r.id, on_error)?;
                        out.push(Fragment::Rendered(render_tag_value(ctx.options, tag, &value)));
                    }
                }
            }

            Node::Partial(partial) => {
                if ctx.arena.is_repeating(domain) && partial.incontext {
                    out.push(Fragment::PendingPartial(partial.clone()));
                    continue;
                }
                let rendered = render_partial(partial, domain, &[], ctx)?;
                out.push(Fragment::Rendered(rendered));
            }

            Node::Section(section) => {
                if immediate_defer(ctx.arena, domain, section.incontext, section.func.as_ref()) {
                    out.push(Fragment::DeferredSection(section.clone()));
                    continue;
                }
                if blocked_by_unresolved(
                    ctx.arena,
                    unresolved,
                    false,
                    &section.key,
                    section.func.as_ref(),
                ) {
                    out.push(Fragment::DeferredSection(section.clone()));
                    continue;
                }
                let handler = make_error_handler(ctx.options, &section.raw);
                let on_error: ErrorHandler = &handler;
                let root = ctx.arena.value(ctx.root, on_error)?;
                let resolved = resolve_context(
                    ctx.arena,
                    domain,
                    &[],
                    &section.key,
                    &section.keysplit,
                    section.incontext,
                    section.func.as_ref(),
                    &root,
                    &section.raw,
                    on_error,
                )?;
                match resolved {
                    None => out.push(Fragment::DeferredSection(section.clone())),
                    Some(r) => out.extend(dispatch_section(section, r, unresolved, ctx)?),
                }
            }
        }
    }
    Ok(out)
}

fn expand_repeat(
    header: &SectionNode,
    domain: DomainId,
    body: &[Fragment],
    dynamics: &[DomainId],
    ctx: &Rctx,
) -> Result<String> {
    let handler = make_error_handler(ctx.options, &header.raw);
    let on_error: ErrorHandler = &handler;
    let length = ctx.arena.dynamic_len(domain);
    if !(header.inclusive && length > 0) {
        return Ok(String::new());
    }
    let mut frames: Vec<DomainId> = dynamics.to_vec();
    let mut pieces = Vec::with_capacity(length);
    for i in 0..length {
        let item = ctx.arena.iterate(domain, i, on_error)?;
        frames.push(item);
        pieces.push(render_inside_out(body, item, &frames, ctx)?);
        frames.pop();
    }
    if header.list {
        Ok(formatter::join_grammatically(pieces))
    } else {
        Ok(pieces.concat())
    }
}

fn missing_section(options: &Options, raw: &str) -> Result<String> {
    if options.error_on_missing_tags {
        Err(TemplateError::MissingBinding {
            tag: raw.to_string(),
        })
    } else {
        tracing::debug!(section = raw, "missing section context, rendering empty");
        Ok(String::new())
    }
}

/// The final, no-more-deferring attempt at a section left raw by the first
/// pass. Its context may now be resolvable -- the ancestor repeating section
/// that blocked it has since been split into the item we're currently inside.
fn resolve_deferred_section(
    section: &SectionNode,
    domain: DomainId,
    dynamics: &[DomainId],
    ctx: &Rctx,
) -> Result<String> {
    let handler = make_error_handler(ctx.options, &section.raw);
    let on_error: ErrorHandler = &handler;
    let root = ctx.arena.value(ctx.root, on_error)?;
    let resolved = resolve_context(
        ctx.arena,
        domain,
        dynamics,
        &section.key,
        &section.keysplit,
        section.incontext,
        section.func.as_ref(),
        &root,
        &section.raw,
        on_error,
    )?;
    match resolved {
        None => missing_section(ctx.options, &section.raw),
        Some(r) => {
            let mut unresolved = Vec::new();
            let fragments = dispatch_section(section, r, &mut unresolved, ctx)?;
            render_inside_out(&fragments, domain, dynamics, ctx)
        }
    }
}

fn resolve_pending_tag(
    tag: &TagNode,
    domain: DomainId,
    dynamics: &[DomainId],
    ctx: &Rctx,
) -> Result<String> {
    let handler = make_error_handler(ctx.options, &tag.raw);
    let on_error: ErrorHandler = &handler;
    let root = ctx.arena.value(ctx.root, on_error)?;
    let resolved = resolve_context(
        ctx.arena,
        domain,
        dynamics,
        &tag.key,
        &tag.keysplit,
        tag.incontext,
        tag.func.as_ref(),
        &root,
        &tag.raw,
        on_error,
    )?;
    match resolved {
        Some(r) => {
            let value = ctx.arena.value(r.id, on_error)?;
            Ok(render_tag_value(ctx.options, tag, &value))
        }
        None => missing_tag(ctx.options, &tag.raw),
    }
}

fn render_partial(
    partial: &PartialNode,
    domain: DomainId,
    _dynamics: &[DomainId],
    ctx: &Rctx,
) -> Result<String> {
    let context_id = if partial.incontext { domain } else { ctx.root };
    let source = match ctx.options.partials.get(&partial.key) {
        Some(source) => source,
        None => {
            return if ctx.options.error_on_missing_tags {
                Err(TemplateError::MissingPartial {
                    name: partial.key.clone(),
                })
            } else {
                tracing::debug!(partial = %partial.key, "missing partial, rendering empty");
                Ok(String::new())
            };
        }
    };
    let template = source.compiled(&partial.key)?;
    let mut unresolved = Vec::new();
    let fragments = render_outside_in(&template.root, context_id, &mut unresolved, ctx)?;
    render_inside_out(&fragments, context_id, &[], ctx)
}

fn render_inside_out(
    fragments: &[Fragment],
    domain: DomainId,
    dynamics: &[DomainId],
    ctx: &Rctx,
) -> Result<String> {
    let mut out = String::new();
    for fragment in fragments {
        match fragment {
            Fragment::Text(s) | Fragment::Rendered(s) => out.push_str(s),
            Fragment::Pending(tag) => out.push_str(&resolve_pending_tag(tag, domain, dynamics, ctx)?),
            Fragment::PendingPartial(partial) => {
                out.push_str(&render_partial(partial, domain, dynamics, ctx)?)
            }
            Fragment::DeferredSection(section) => {
                out.push_str(&resolve_deferred_section(section, domain, dynamics, ctx)?)
            }
            Fragment::PendingRepeat {
                header,
                domain: repeat_domain,
                body,
            } => out.push_str(&expand_repeat(header, *repeat_domain, body, dynamics, ctx)?),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partials::PartialSource;
    use std::collections::HashMap;

    fn opts() -> Options {
        Options::default()
    }

    fn obj(pairs: Vec<(&str, Value)>) -> Value {
        let mut m = HashMap::new();
        for (k, v) in pairs {
            m.insert(k.to_string(), v);
        }
        Value::Object(m)
    }

    #[test]
    fn plain_value_substitution() {
        let t = Template::compile("Hello {{name}}!").unwrap();
        let out = render(&t, obj(vec![("name", Value::from("World"))]), &opts()).unwrap();
        assert_eq!(out, "Hello World!");
    }

    #[test]
    fn comment_is_not_rendered() {
        let t = Template::compile("a{{! drop me }}b").unwrap();
        let out = render(&t, obj(vec![]), &opts()).unwrap();
        assert_eq!(out, "ab");
    }

    #[test]
    fn inclusive_section_hides_on_falsy() {
        let t = Template::compile("{{#ok}}yes{{/ok}}").unwrap();
        let out = render(&t, obj(vec![("ok", Value::Bool(false))]), &opts()).unwrap();
        assert_eq!(out, "");
    }

    #[test]
    fn exclusive_section_shows_on_falsy() {
        let t = Template::compile("{{^ok}}no{{/ok}}").unwrap();
        let out = render(&t, obj(vec![("ok", Value::Bool(false))]), &opts()).unwrap();
        assert_eq!(out, "no");
    }

    #[test]
    fn exclusive_section_over_array_is_always_silent() {
        let t = Template::compile("{{^items}}empty{{/items}}").unwrap();
        let out = render(&t, obj(vec![("items", Value::Array(vec![]))]), &opts()).unwrap();
        assert_eq!(out, "");
    }

    #[test]
    fn repeating_section_iterates_per_item() {
        let t = Template::compile("{{#items}}[{{.}}]{{/items}}").unwrap();
        let items = Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        let out = render(&t, obj(vec![("items", items)]), &opts()).unwrap();
        assert_eq!(out, "[1][2][3]");
    }

    #[test]
    fn nested_repeating_section_resolves_outer_key_from_inside() {
        let t = Template::compile("{{#rows}}{{#cells}}{{rows.label}}:{{.}} {{/cells}}{{/rows}}")
            .unwrap();
        let rows = obj(vec![
            ("label", Value::from("r")),
            (
                "cells",
                Value::Array(vec![Value::Int(1), Value::Int(2)]),
            ),
        ]);
        let out = render(
            &t,
            obj(vec![("rows", Value::Array(vec![rows]))]),
            &opts(),
        )
        .unwrap();
        assert_eq!(out, "r:1 r:2 ");
    }

    #[test]
    fn missing_tag_renders_empty_by_default() {
        let t = Template::compile("[{{nope}}]").unwrap();
        let out = render(&t, obj(vec![]), &opts()).unwrap();
        assert_eq!(out, "[]");
    }

    #[test]
    fn missing_tag_errors_when_configured() {
        let t = Template::compile("[{{nope}}]").unwrap();
        let mut o = opts();
        o.error_on_missing_tags = true;
        assert!(render(&t, obj(vec![]), &o).is_err());
    }

    #[test]
    fn list_tag_joins_grammatically() {
        let t = Template::compile("{{&names}}").unwrap();
        let names = Value::Array(vec![
            Value::from("Alice"),
            Value::from("Bob"),
            Value::from("Cy"),
        ]);
        let out = render(&t, obj(vec![("names", names)]), &opts()).unwrap();
        assert_eq!(out, "Alice, Bob, and Cy");
    }

    #[test]
    fn list_section_joins_iterations_grammatically() {
        let t = Template::compile("{{&#items}}{{name}}{{/items}}").unwrap();
        let items = Value::Array(vec![
            obj(vec![("name", Value::from("Alice"))]),
            obj(vec![("name", Value::from("Bob"))]),
            obj(vec![("name", Value::from("Cy"))]),
        ]);
        let out = render(&t, obj(vec![("items", items)]), &opts()).unwrap();
        assert_eq!(out, "Alice, Bob, and Cy");
    }

    #[test]
    fn pass_to_function_reroots_value() {
        let t = Template::compile("{{count->.double}}").unwrap();
        let bindings = obj(vec![
            ("count", Value::Int(3)),
            (
                "double",
                Value::Function(std::rc::Rc::new(|this: &Value, _root: &Value| {
                    Ok(Value::Int(this.as_f64().unwrap_or(0.0) as i64 * 2))
                })),
            ),
        ]);
        let out = render(&t, bindings, &opts()).unwrap();
        assert_eq!(out, "6");
    }

    #[test]
    fn partial_renders_with_current_context() {
        let t = Template::compile("{{>greeting}}").unwrap();
        let mut o = opts();
        o.partials
            .insert("greeting".to_string(), PartialSource::from("Hi {{name}}"));
        let out = render(&t, obj(vec![("name", Value::from("Ada"))]), &o).unwrap();
        assert_eq!(out, "Hi Ada");
    }

    #[test]
    fn root_partial_ignores_current_context() {
        let t = Template::compile("{{#person}}{{>footer^}}{{/person}}").unwrap();
        let mut o = opts();
        o.partials
            .insert("footer".to_string(), PartialSource::from("{{site}}"));
        let bindings = obj(vec![
            ("site", Value::from("top")),
            ("person", obj(vec![("site", Value::from("nested"))])),
        ]);
        let out = render(&t, bindings, &o).unwrap();
        assert_eq!(out, "top");
    }
}
