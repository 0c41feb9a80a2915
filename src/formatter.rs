/*
 * formatter.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Named format specs and the printf-style fallback applied by the FORMAT directive.

use crate::value::Value;

/// Render a value to its final output string, given an optional format spec and
/// whether HTML escaping should be applied afterward.
///
/// A null value always renders as the empty string, regardless of format spec --
/// this check runs before any spec (including `raw`/`html`) is consulted.
pub fn format_value(value: &Value, spec: Option<&str>, escape_html: bool) -> String {
    if matches!(value, Value::Null) {
        return String::new();
    }

    let (rendered, escape_html) = match spec {
        None => (value.to_plain_string(), escape_html),
        Some(spec) => apply_spec(value, spec, escape_html),
    };

    if escape_html {
        html_escape(&rendered)
    } else {
        rendered
    }
}

fn apply_spec(value: &Value, spec: &str, default_escape: bool) -> (String, bool) {
    match spec {
        "raw" | "html" => (value.to_plain_string(), false),
        "encode" => (value.to_plain_string(), true),
        "allcaps" | "caps" | "upper" => (value.to_plain_string().to_uppercase(), default_escape),
        "lower" => (value.to_plain_string().to_lowercase(), default_escape),
        "capitalize" => (capitalize(&value.to_plain_string()), default_escape),
        _ => (printf_style(value, spec), default_escape),
    }
}

/// Uppercase the first character and any character immediately following whitespace.
fn capitalize(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());
    for (i, &c) in chars.iter().enumerate() {
        if i == 0 || (!c.is_whitespace() && chars[i - 1].is_whitespace()) {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Apply a printf-style format spec: a `$`-prefix passes through literally around
/// the formatted remainder; otherwise the spec is `[precision]type` with type one
/// of `f` (fixed point), `d` (integer), or `%` (percentage).
fn printf_style(value: &Value, spec: &str) -> String {
    if let Some(rest) = spec.strip_prefix('$') {
        return format!("${}", printf_style(value, rest));
    }
    match parse_numeric_spec(spec) {
        Some((precision, 'f')) => match value.as_f64() {
            Some(f) => format!("{:.*}", precision.unwrap_or(6), f),
            None => value.to_plain_string(),
        },
        Some((_, 'd')) => match value.as_f64() {
            Some(f) => format!("{}", f as i64),
            None => value.to_plain_string(),
        },
        Some((precision, '%')) => match value.as_f64() {
            Some(f) => format!("{:.*}%", precision.unwrap_or(6), f * 100.0),
            None => value.to_plain_string(),
        },
        _ => value.to_plain_string(),
    }
}

/// Parse `[digits]['.' digits] type` into `(precision, type_char)`.
fn parse_numeric_spec(spec: &str) -> Option<(Option<usize>, char)> {
    let mut chars = spec.chars().peekable();
    while matches!(chars.peek(), Some(c) if c.is_ascii_digit()) {
        chars.next();
    }
    let mut precision = None;
    if chars.peek() == Some(&'.') {
        chars.next();
        let mut digits = String::new();
        while matches!(chars.peek(), Some(c) if c.is_ascii_digit()) {
            digits.push(chars.next().unwrap());
        }
        precision = Some(digits.parse::<usize>().unwrap_or(0));
    }
    let type_char = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    Some((precision, type_char))
}

/// HTML-escape in the fixed entity order: `&`, `<`, `>`, `"`, `'`.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#039;")
}

/// Join rendered pieces with grammatical list conjunctions: 0 -> "", 1 -> item,
/// 2 -> "A and B", >=3 -> "A, B, and C".
pub fn join_grammatically(mut pieces: Vec<String>) -> String {
    match pieces.len() {
        0 => String::new(),
        1 => pieces.pop().unwrap(),
        2 => {
            let b = pieces.pop().unwrap();
            let a = pieces.pop().unwrap();
            format!("{a} and {b}")
        }
        _ => {
            let last = pieces.pop().unwrap();
            format!("{}, and {last}", pieces.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_always_renders_empty() {
        assert_eq!(format_value(&Value::Null, Some("raw"), true), "");
    }

    #[test]
    fn dollar_prefixed_fixed_point() {
        assert_eq!(format_value(&Value::Int(5), Some("$.2f"), false), "$5.00");
    }

    #[test]
    fn percent_with_zero_precision() {
        assert_eq!(format_value(&Value::Float(0.05), Some(".0%"), false), "5%");
    }

    #[test]
    fn encode_forces_escaping_even_when_default_is_off() {
        assert_eq!(
            format_value(&Value::String("<b>".into()), Some("encode"), false),
            "&lt;b&gt;"
        );
    }

    #[test]
    fn raw_forces_no_escaping_even_when_default_is_on() {
        assert_eq!(
            format_value(&Value::String("<b>".into()), Some("raw"), true),
            "<b>"
        );
    }

    #[test]
    fn grammatical_join_covers_all_arities() {
        assert_eq!(join_grammatically(vec![]), "");
        assert_eq!(join_grammatically(vec!["A".into()]), "A");
        assert_eq!(join_grammatically(vec!["A".into(), "B".into()]), "A and B");
        assert_eq!(
            join_grammatically(vec!["A".into(), "B".into(), "C".into()]),
            "A, B, and C"
        );
    }
}
