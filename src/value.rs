/*
 * value.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Binding values: the data shape bound to a template, extended with callables.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::directive::ValueKind;
use crate::error::Result;

/// A callable binding, taking `(this, root)` and returning a `Value` or a render error.
///
/// Bindings may be callables so that a section can be driven by computed data; see
/// the pass-to-function tag form.
pub type Callable = Rc<dyn Fn(&Value, &Value) -> Result<Value>>;

/// A value bound into a template: a scalar, a collection, or a callable.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Object(HashMap<String, Value>),
    Function(Callable),
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Float(v) => write!(f, "Float({v})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Array(items) => write!(f, "Array({items:?})"),
            Value::Object(map) => write!(f, "Object({map:?})"),
            Value::Function(_) => write!(f, "Function(..)"),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl Value {
    /// Build an empty object, used as the substitute "this" when a falsy value is
    /// about to be passed into a callable chain.
    pub fn empty_object() -> Self {
        Value::Object(HashMap::new())
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Array(_) => ValueKind::Array,
            Value::Object(_) => ValueKind::Object,
            Value::Function(_) => ValueKind::Function,
            Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::String(_) => {
                ValueKind::Value
            }
        }
    }

    /// Truthiness used for section display and list-item checks. Empty arrays are
    /// always truthy (a discrepancy from plain JavaScript/Python "falsy empty
    /// container" rules, carried forward deliberately: section display has its own
    /// richer rule layered on top of this, see `Renderer::display`).
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Array(_) => true,
            Value::Object(m) => !m.is_empty(),
            Value::Function(_) => true,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Callable> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Plain `str()`-equivalent scalar rendering, used as the unformatted fallback
    /// and as the basis every named format spec starts from.
    pub fn to_plain_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => {
                if *b {
                    "True".to_string()
                } else {
                    "False".to_string()
                }
            }
            Value::Int(i) => i.to_string(),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.is_finite() {
                    format!("{f:.1}")
                } else {
                    f.to_string()
                }
            }
            Value::String(s) => s.clone(),
            Value::Array(items) => {
                let rendered: Vec<String> = items.iter().map(Value::to_plain_string).collect();
                format!("[{}]", rendered.join(", "))
            }
            Value::Object(_) => self.to_json_string(),
            Value::Function(_) => String::new(),
        }
    }

    /// `json.dumps`-equivalent rendering used when an object value reaches the
    /// output directly (not driving a section).
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(&self.to_json()).unwrap_or_default()
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::Function(_) => serde_json::Value::Null,
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_matches_kind_rules() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(Value::Int(0).kind() == ValueKind::Value);
        assert!(!Value::String(String::new()).is_truthy());
        assert!(Value::Array(vec![]).is_truthy());
        assert!(!Value::Object(HashMap::new()).is_truthy());
    }

    #[test]
    fn kind_order_matches_spec() {
        assert!(ValueKind::Undefined < ValueKind::Null);
        assert!(ValueKind::Null < ValueKind::Value);
        assert!(ValueKind::Value < ValueKind::Array);
        assert!(ValueKind::Array < ValueKind::Object);
        assert!(ValueKind::Object < ValueKind::Function);
    }

    #[test]
    fn json_roundtrip_preserves_scalars() {
        let json: serde_json::Value = serde_json::json!({"a": 1, "b": [true, null, "x"]});
        let value = Value::from(json);
        match value {
            Value::Object(map) => {
                assert_eq!(map.get("a").unwrap().as_f64(), Some(1.0));
            }
            _ => panic!("expected object"),
        }
    }
}
