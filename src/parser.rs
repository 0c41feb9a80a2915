/*
 * parser.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Delimiter scanning and tree assembly.
//!
//! The grammar is fixed and non-recursive, so unlike a general-purpose
//! language this doesn't need a lexer/parser split backed by a grammar
//! library: a single left-to-right scan for the opening and closing
//! delimiters, paired with [`ast::parse_tag`] for the text between them, is
//! enough to build the whole tree, including section nesting.

use crate::ast::{self, Node, PartialNode, SectionNode, TagKind, TagNode};
use crate::directive::{self, Directive};
use crate::error::{Result, TemplateError};

pub const DEFAULT_DELIMITERS: (&str, &str) = ("{{", "}}");

/// A compiled template: a flat forest of text, tags, partials, and sections.
#[derive(Debug, Clone)]
pub struct Template {
    pub root: Vec<Node>,
}

impl Template {
    pub fn compile(source: &str) -> Result<Template> {
        Template::compile_with_delimiters(source, DEFAULT_DELIMITERS)
    }

    pub fn compile_with_delimiters(source: &str, delimiters: (&str, &str)) -> Result<Template> {
        Ok(Template {
            root: scan(source, delimiters)?,
        })
    }
}

fn push_node(stack: &mut [SectionNode], root: &mut Vec<Node>, node: Node) {
    match stack.last_mut() {
        Some(top) => top.body.push(node),
        None => root.push(node),
    }
}

fn scan(source: &str, delimiters: (&str, &str)) -> Result<Vec<Node>> {
    let (open_d, close_d) = delimiters;
    let mut text = source.to_string();
    let mut stack: Vec<SectionNode> = Vec::new();
    let mut root: Vec<Node> = Vec::new();
    let mut last = 0usize;
    let mut search = 0usize;

    loop {
        let dopen = match text[search..].find(open_d) {
            Some(p) => search + p,
            None => break,
        };
        let start = dopen + open_d.len();
        let dclose = match text[search..].find(close_d) {
            Some(p) => search + p,
            None => break,
        };
        search = dclose + close_d.len();

        // escaped delimiter: drop the leading `!` and treat it as literal text
        if dopen > 0 && text.as_bytes()[dopen - 1] == b'!' {
            text.replace_range(dopen - 1..dopen, "");
            search -= 1;
            continue;
        }

        if dopen > last {
            push_node(
                &mut stack,
                &mut root,
                Node::Text(text[last..dopen].to_string()),
            );
        }
        last = search;

        let raw = text[dopen..search].to_string();
        let inner_raw = if dclose >= start {
            &text[start..dclose]
        } else {
            ""
        };
        let inner = inner_raw.trim().to_string();

        let parsed = match ast::parse_tag(&raw, &inner)? {
            Some(parsed) => parsed,
            None => continue,
        };

        match parsed.directive {
            Directive::SectionEnd => {
                let open = stack.pop().ok_or_else(|| {
                    TemplateError::structure(format!("unpaired section close at {raw}"))
                })?;
                if open.key != parsed.key {
                    return Err(TemplateError::structure(format!(
                        "section conflict at {raw} close before inner {} closed",
                        open.raw
                    )));
                }
                push_node(&mut stack, &mut root, Node::Section(open));
            }
            Directive::SectionInc | Directive::SectionExc | Directive::ListSection => {
                if parsed.format.is_some() {
                    return Err(TemplateError::parse(format!(
                        "format passed to section tag {raw}"
                    )));
                }
                if parsed.escape == Some(true) {
                    return Err(TemplateError::parse(format!(
                        "escape directive passed to section tag {raw}"
                    )));
                }
                stack.push(SectionNode {
                    raw: parsed.raw,
                    key: parsed.key,
                    keysplit: parsed.keysplit,
                    incontext: parsed.incontext,
                    func: parsed.func,
                    inclusive: matches!(
                        parsed.directive,
                        Directive::SectionInc | Directive::ListSection
                    ),
                    list: parsed.directive == Directive::ListSection,
                    body: Vec::new(),
                });
            }
            Directive::Partial => {
                if parsed.incontext {
                    return Err(TemplateError::parse(format!(
                        "cannot have partial directive as in-context at {raw}"
                    )));
                }
                if parsed.format.is_some() {
                    return Err(TemplateError::parse(format!(
                        "partial tag cannot be paired with format directive at {raw}"
                    )));
                }
                if parsed.escape == Some(true) {
                    return Err(TemplateError::parse(format!(
                        "partial tag cannot be paired with escape directive at {raw}"
                    )));
                }
                if parsed.func.is_some() {
                    return Err(TemplateError::parse(format!(
                        "partial tag cannot be paired with pass-to-function directive at {raw}"
                    )));
                }
                let mut key = parsed.key;
                let mut incontext = true;
                if key.ends_with(directive::ROOT_PARTIAL) {
                    key.pop();
                    incontext = false;
                    if key.is_empty() {
                        return Err(TemplateError::parse(format!(
                            "empty partial tag at {raw}"
                        )));
                    }
                }
                push_node(
                    &mut stack,
                    &mut root,
                    Node::Partial(PartialNode {
                        raw: parsed.raw,
                        key,
                        incontext,
                    }),
                );
            }
            Directive::Value | Directive::List => {
                push_node(
                    &mut stack,
                    &mut root,
                    Node::Tag(TagNode {
                        raw: parsed.raw,
                        key: parsed.key,
                        keysplit: parsed.keysplit,
                        incontext: parsed.incontext,
                        func: parsed.func,
                        format: parsed.format,
                        escape: parsed.escape,
                        kind: if parsed.directive == Directive::List {
                            TagKind::List
                        } else {
                            TagKind::Value
                        },
                    }),
                );
            }
        }
    }

    if last < text.len() {
        push_node(&mut stack, &mut root, Node::Text(text[last..].to_string()));
    }
    if let Some(open) = stack.last() {
        return Err(TemplateError::structure(format!(
            "hanging open section for {}",
            open.raw
        )));
    }

    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(root: &[Node]) -> Vec<&Node> {
        root.iter().collect()
    }

    #[test]
    fn plain_text_passes_through() {
        let t = Template::compile("hello world").unwrap();
        assert_eq!(t.root.len(), 1);
        assert!(matches!(&t.root[0], Node::Text(s) if s == "hello world"));
    }

    #[test]
    fn escaped_delimiter_is_literal() {
        let t = Template::compile("a !{{b}} c").unwrap();
        let joined: String = t
            .root
            .iter()
            .map(|n| match n {
                Node::Text(s) => s.clone(),
                _ => String::new(),
            })
            .collect();
        assert_eq!(joined, "a {{b}} c");
    }

    #[test]
    fn section_nests_and_closes() {
        let t = Template::compile("{{#items}}x{{/items}}").unwrap();
        assert_eq!(t.root.len(), 1);
        match &t.root[0] {
            Node::Section(s) => {
                assert_eq!(s.key, "items");
                assert!(s.inclusive);
                assert_eq!(s.body.len(), 1);
            }
            _ => panic!("expected section"),
        }
    }

    #[test]
    fn mismatched_section_close_errors() {
        assert!(Template::compile("{{#a}}x{{/b}}").is_err());
    }

    #[test]
    fn unclosed_section_errors() {
        assert!(Template::compile("{{#a}}x").is_err());
    }

    #[test]
    fn comment_is_dropped() {
        let t = Template::compile("a{{! note }}b").unwrap();
        assert_eq!(tags(&t.root).len(), 2);
    }
}
