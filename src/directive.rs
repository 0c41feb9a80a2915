/*
 * directive.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The fixed set of tag directive symbols and the total order over value kinds.

/// A tag's leading symbol, resolved once during parsing.
///
/// `Value` is the absence of a leading symbol (a plain `{{key}}` tag).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Value,
    List,
    ListSection,
    SectionInc,
    SectionExc,
    SectionEnd,
    Partial,
}

pub const COMMENT: char = '!';
pub const LIST: char = '&';
pub const SECTION_INC: char = '#';
pub const SECTION_EXC: char = '^';
pub const SECTION_END: char = '/';
pub const PARTIAL: char = '>';
pub const ROOT_PARTIAL: char = '^';
pub const IN_CONTEXT: char = '.';
pub const PASS_CONTEXT: &str = "->";
pub const FORMAT: &str = "::";
pub const ESCAPE: char = ';';

/// Resolve the leading directive for a non-empty, trimmed tag body.
///
/// Returns `None` for a comment (the caller discards the tag entirely).
/// `inner` must be non-empty.
pub fn leading(inner: &str) -> Option<Directive> {
    let mut chars = inner.chars();
    let first = chars.next().expect("inner must be non-empty");
    match first {
        COMMENT => None,
        LIST => {
            if chars.next() == Some(SECTION_INC) {
                Some(Directive::ListSection)
            } else {
                Some(Directive::List)
            }
        }
        SECTION_INC => Some(Directive::SectionInc),
        SECTION_EXC => Some(Directive::SectionExc),
        SECTION_END => Some(Directive::SectionEnd),
        PARTIAL => Some(Directive::Partial),
        _ => Some(Directive::Value),
    }
}

/// Number of leading characters `leading()` consumed for this directive (0 for `Value`).
pub fn leading_width(directive: Directive) -> usize {
    match directive {
        Directive::Value => 0,
        Directive::ListSection => 2,
        _ => 1,
    }
}

/// Total order over resolved value kinds, used by truthiness and section display rules.
///
/// `Undefined` classifies a binding that could not be found at all (as opposed to
/// `Null`, an explicit null/missing value that *was* found).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValueKind {
    Undefined,
    Null,
    Value,
    Array,
    Object,
    Function,
}

/// Maximum number of chained callable re-invocations before giving up.
pub const OVERFLOW: usize = 12;
