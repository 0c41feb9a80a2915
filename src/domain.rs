/*
 * domain.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The hierarchical binding domain: dotted-path resolution with bubble-up-then-
//! descend search, per-scope caching, and lazy callable evaluation.
//!
//! Domains form a tree, but parent/root back-references are plain arena
//! indices (`DomainId`) rather than `Rc`/`RefCell` cycles -- the whole tree is
//! scoped to a single render call and dropped together at the end of it, so
//! there's no need to reference-count individual nodes.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::directive::{self, ValueKind};
use crate::error::Result;
use crate::value::{Callable, Value};

/// A handle into a [`DomainArena`]. Never outlives the arena it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DomainId(usize);

/// Given a callable-evaluation error, either substitute a replacement value or
/// propagate the error -- mirrors `error_on_func_failure` deciding whether a
/// failed binding aborts the whole render or degrades to an empty result.
pub type ErrorHandler<'a> = &'a dyn Fn(&crate::error::TemplateError) -> Result<Value>;

struct DomainNode {
    fullkey: String,
    prefix: String,
    prefix_len: usize,
    data: Value,
    function: Option<Callable>,
    evaluated: bool,
    kind: ValueKind,
    parent: Option<DomainId>,
    root: DomainId,
    is_repeating: bool,
    cache_owner: DomainId,
    children: HashMap<String, DomainId>,
    dynamic: HashMap<(usize, String), DomainId>,
}

/// Owns every domain created during one render call.
pub struct DomainArena {
    nodes: RefCell<Vec<DomainNode>>,
    cache: RefCell<HashMap<DomainId, HashMap<String, DomainId>>>,
}

impl DomainArena {
    pub fn new() -> Self {
        DomainArena {
            nodes: RefCell::new(Vec::new()),
            cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn new_root(&self, data: Value) -> DomainId {
        let mut nodes = self.nodes.borrow_mut();
        let id = DomainId(nodes.len());
        let kind = data.kind();
        let function = if kind == ValueKind::Function {
            data.as_function().cloned()
        } else {
            None
        };
        let stored = if function.is_some() { Value::Null } else { data };
        let is_repeating = kind == ValueKind::Array;
        nodes.push(DomainNode {
            fullkey: String::new(),
            prefix: String::new(),
            prefix_len: 0,
            data: stored,
            evaluated: function.is_none(),
            function,
            kind,
            parent: None,
            root: id,
            is_repeating,
            cache_owner: id,
            children: HashMap::new(),
            dynamic: HashMap::new(),
        });
        id
    }

    pub(crate) fn fullkey(&self, id: DomainId) -> String {
        self.nodes.borrow()[id.0].fullkey.clone()
    }

    fn prefix(&self, id: DomainId) -> String {
        self.nodes.borrow()[id.0].prefix.clone()
    }

    fn prefix_len(&self, id: DomainId) -> usize {
        self.nodes.borrow()[id.0].prefix_len
    }

    fn parent(&self, id: DomainId) -> Option<DomainId> {
        self.nodes.borrow()[id.0].parent
    }

    fn root_id(&self, id: DomainId) -> DomainId {
        self.nodes.borrow()[id.0].root
    }

    pub fn is_repeating(&self, id: DomainId) -> bool {
        self.nodes.borrow()[id.0].is_repeating
    }

    pub fn kind(&self, id: DomainId) -> ValueKind {
        self.nodes.borrow()[id.0].kind
    }

    pub fn is_function(&self, id: DomainId) -> bool {
        self.nodes.borrow()[id.0].function.is_some()
    }

    fn cache_owner(&self, id: DomainId) -> DomainId {
        self.nodes.borrow()[id.0].cache_owner
    }

    fn cache_get(&self, id: DomainId, key: &str) -> Option<DomainId> {
        let owner = self.cache_owner(id);
        self.cache.borrow().get(&owner).and_then(|m| m.get(key).copied())
    }

    fn cache_set(&self, id: DomainId, key: String, value: DomainId) {
        let owner = self.cache_owner(id);
        self.cache.borrow_mut().entry(owner).or_default().insert(key, value);
    }

    /// Evaluate a callable-backed domain's data, if it hasn't been already.
    fn eval(&self, id: DomainId, on_error: ErrorHandler) -> Result<()> {
        let (function, this, root_data) = {
            let nodes = self.nodes.borrow();
            let n = &nodes[id.0];
            if n.evaluated {
                return Ok(());
            }
            let function = n.function.clone().expect("unevaluated domain has a function");
            let this = n
                .parent
                .map(|p| nodes[p.0].data.clone())
                .unwrap_or_else(Value::empty_object);
            let root_data = nodes[n.root.0].data.clone();
            (function, this, root_data)
        };
        let result = self.evalf(&function, this, &root_data, on_error)?;
        let kind = result.kind();
        let is_repeating = kind == ValueKind::Array;
        {
            let mut nodes = self.nodes.borrow_mut();
            let n = &mut nodes[id.0];
            n.data = result;
            n.kind = kind;
            n.evaluated = true;
            n.is_repeating = is_repeating;
        }
        if kind != ValueKind::Array {
            let fullkey = self.fullkey(id);
            self.cache_set(id, fullkey, id);
        }
        Ok(())
    }

    /// Drive a callable chain to a non-callable result, capped at
    /// [`directive::OVERFLOW`] invocations. The same `(this, root)` pair is
    /// reused across every re-invocation in the chain. A falsy `this` is
    /// replaced with an empty object before the first call. If the chain
    /// doesn't bottom out within the cap, the last non-callable result seen
    /// (or `Null` if there wasn't one) is used.
    pub fn evalf(
        &self,
        func: &Callable,
        this: Value,
        root: &Value,
        on_error: ErrorHandler,
    ) -> Result<Value> {
        let this = if this.is_truthy() { this } else { Value::empty_object() };
        let mut current = Value::Function(func.clone());
        let mut last_concrete = Value::Null;
        let mut invocations = 0usize;
        loop {
            let f = match &current {
                Value::Function(f) => f.clone(),
                _ => return Ok(current),
            };
            if invocations >= directive::OVERFLOW {
                return Ok(last_concrete);
            }
            invocations += 1;
            current = match f(&this, root) {
                Ok(v) => v,
                Err(e) => return on_error(&e),
            };
            if !matches!(current, Value::Function(_)) {
                last_concrete = current.clone();
            }
        }
    }

    /// Raw value, forcing evaluation first.
    pub fn value(&self, id: DomainId, on_error: ErrorHandler) -> Result<Value> {
        self.eval(id, on_error)?;
        Ok(self.nodes.borrow()[id.0].data.clone())
    }

    pub fn function(&self, id: DomainId) -> Option<Callable> {
        self.nodes.borrow()[id.0].function.clone()
    }

    /// Child domain by key, or `self` for `.`/empty. Returns `None` for a
    /// repeating domain (use [`DomainArena::iterate`] instead) or a genuinely
    /// missing key.
    pub fn get(
        &self,
        id: DomainId,
        key: &str,
        on_error: ErrorHandler,
        skip_cache: bool,
    ) -> Result<Option<DomainId>> {
        self.eval(id, on_error)?;

        let (fullkey, real_key) = if key.is_empty() || key == "." {
            (self.fullkey(id), ".".to_string())
        } else {
            (format!("{}{}", self.prefix(id), key), key.to_string())
        };

        if !skip_cache {
            if let Some(cached) = self.cache_get(id, &fullkey) {
                return Ok(Some(cached));
            }
        }
        if self.is_repeating(id) {
            return Ok(None);
        }
        if real_key == "." {
            return Ok(Some(id));
        }
        if let Some(existing) = self.nodes.borrow()[id.0].children.get(&real_key).copied() {
            return Ok(Some(existing));
        }
        let child_value = {
            let nodes = self.nodes.borrow();
            match &nodes[id.0].data {
                Value::Object(map) => map.get(&real_key).cloned(),
                _ => None,
            }
        };
        let child_value = match child_value {
            Some(v) => v,
            None => return Ok(None),
        };
        let child_id = self.make_child(id, &fullkey, child_value);
        self.nodes.borrow_mut()[id.0]
            .children
            .insert(real_key, child_id);
        self.cache_set(id, fullkey, child_id);
        Ok(Some(child_id))
    }

    fn make_child(&self, parent_id: DomainId, fullkey: &str, data: Value) -> DomainId {
        let prefix = format!("{fullkey}.");
        let prefix_len = fullkey.split('.').count();
        let kind = data.kind();
        let function = if kind == ValueKind::Function {
            data.as_function().cloned()
        } else {
            None
        };
        let is_repeating = kind == ValueKind::Array;
        let cache_owner = self.cache_owner(parent_id);
        let root = self.root_id(parent_id);
        let stored = if function.is_some() { Value::Null } else { data };
        let mut nodes = self.nodes.borrow_mut();
        let id = DomainId(nodes.len());
        nodes.push(DomainNode {
            fullkey: fullkey.to_string(),
            prefix,
            prefix_len,
            data: stored,
            evaluated: function.is_none(),
            function,
            kind,
            parent: Some(parent_id),
            root,
            is_repeating,
            cache_owner,
            children: HashMap::new(),
            dynamic: HashMap::new(),
        });
        id
    }

    /// A per-iteration or rerooted-by-function domain: same `fullkey`/`prefix`
    /// and same parent as `owner`, but disconnected (fresh) cache, keyed by
    /// `(index, discriminator)` on the owner so repeated lookups for the same
    /// iteration/reroot return the identical domain.
    fn dynamic_child(
        &self,
        owner_id: DomainId,
        discriminator: &str,
        index: Option<usize>,
        data: Value,
    ) -> DomainId {
        let dykey = (index.unwrap_or(0), discriminator.to_string());
        if let Some(existing) = self.nodes.borrow()[owner_id.0].dynamic.get(&dykey).copied() {
            return existing;
        }
        let (fullkey, prefix, prefix_len, owner_parent) = {
            let nodes = self.nodes.borrow();
            let o = &nodes[owner_id.0];
            (o.fullkey.clone(), o.prefix.clone(), o.prefix_len, o.parent)
        };
        let kind = data.kind();
        let is_repeating = kind == ValueKind::Array;
        let mut nodes = self.nodes.borrow_mut();
        let id = DomainId(nodes.len());
        let root = match owner_parent {
            Some(p) => nodes[p.0].root,
            None => id,
        };
        nodes.push(DomainNode {
            fullkey,
            prefix,
            prefix_len,
            data,
            function: None,
            evaluated: true,
            kind,
            parent: owner_parent,
            root,
            is_repeating,
            cache_owner: id,
            children: HashMap::new(),
            dynamic: HashMap::new(),
        });
        drop(nodes);
        self.nodes.borrow_mut()[owner_id.0].dynamic.insert(dykey, id);
        id
    }

    /// The `i`th element of a repeating domain (or, for a non-repeating owner,
    /// its evaluated value again) as its own dynamic domain.
    pub fn iterate(&self, owner_id: DomainId, index: usize, on_error: ErrorHandler) -> Result<DomainId> {
        self.eval(owner_id, on_error)?;
        let (is_repeating, data) = {
            let nodes = self.nodes.borrow();
            (nodes[owner_id.0].is_repeating, nodes[owner_id.0].data.clone())
        };
        let item = if is_repeating {
            match &data {
                Value::Array(items) => items.get(index).cloned().unwrap_or(Value::Null),
                _ => Value::Null,
            }
        } else {
            data
        };
        Ok(self.dynamic_child(owner_id, "", Some(index), item))
    }

    /// The domain obtained by passing `owner`'s value into a callable resolved
    /// at a (possibly different) scope -- the pass-to-function re-rooting.
    pub fn reroot(&self, owner_id: DomainId, discriminator: &str, data: Value) -> DomainId {
        self.dynamic_child(owner_id, discriminator, None, data)
    }

    /// Length used for section/list sizing: 0 for null/undefined, array length
    /// for arrays, 1 otherwise. Always read off the current (post-eval) kind,
    /// not a value snapshotted before a callable-backed domain resolved.
    pub fn dynamic_len(&self, id: DomainId) -> usize {
        let nodes = self.nodes.borrow();
        let n = &nodes[id.0];
        match n.kind {
            ValueKind::Null | ValueKind::Undefined => 0,
            ValueKind::Array => match &n.data {
                Value::Array(items) => items.len(),
                _ => 0,
            },
            _ => 1,
        }
    }

    /// Whether `key` (a tag's raw dotted text) falls within `id`'s own scope --
    /// matches its fullkey exactly, or is prefixed by it.
    pub(crate) fn incontext_of(&self, id: DomainId, key: &str) -> bool {
        let nodes = self.nodes.borrow();
        let n = &nodes[id.0];
        key == n.fullkey || key.starts_with(&n.prefix)
    }

    /// Resolve a tag's key against this domain: bubble up through ancestors
    /// until the target key falls within an ancestor's own scope, then
    /// descend from there. In-context tags skip the bubble and descend
    /// directly from `id`.
    pub fn search(
        &self,
        id: DomainId,
        key: &str,
        keysplit: &[String],
        incontext: bool,
        on_error: ErrorHandler,
    ) -> Result<Option<DomainId>> {
        if key.is_empty() && incontext {
            return Ok(Some(id));
        }
        let mut keysplit = keysplit.to_vec();
        self.search_inner(id, key, &mut keysplit, !incontext, true, on_error)
    }

    fn search_inner(
        &self,
        id: DomainId,
        fullkey: &str,
        keysplit: &mut Vec<String>,
        bubble: bool,
        atstart: bool,
        on_error: ErrorHandler,
    ) -> Result<Option<DomainId>> {
        if atstart {
            if let Some(cached) = self.cache_get(id, fullkey) {
                return Ok(Some(cached));
            }
        }
        if keysplit.is_empty() || self.fullkey(id) == fullkey {
            return Ok(Some(id));
        }
        if bubble {
            return match self.parent(id) {
                None => self.search_inner(id, fullkey, keysplit, false, false, on_error),
                Some(parent) => {
                    if self.incontext_of(id, fullkey) {
                        let n = self.prefix_len(id).min(keysplit.len());
                        keysplit.drain(0..n);
                        self.search_inner(id, fullkey, keysplit, false, false, on_error)
                    } else {
                        let repeating = self.is_repeating(id);
                        self.search_inner(parent, fullkey, keysplit, true, repeating, on_error)
                    }
                }
            };
        }
        let mut key = String::new();
        for k in 0..keysplit.len() {
            key.push_str(&keysplit[k]);
            if let Some(sub) = self.get(id, &key, on_error, true)? {
                if sub == id {
                    return Ok(Some(id));
                }
                let mut rest: Vec<String> = keysplit[k + 1..].to_vec();
                return self.search_inner(sub, fullkey, &mut rest, false, false, on_error);
            }
            key.push('.');
        }
        Ok(None)
    }
}

impl Default for DomainArena {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn noop_handler(e: &crate::error::TemplateError) -> Result<Value> {
        Err(crate::error::TemplateError::binding("test", e.to_string()))
    }

    fn obj(pairs: Vec<(&str, Value)>) -> Value {
        let mut m = Map::new();
        for (k, v) in pairs {
            m.insert(k.to_string(), v);
        }
        Value::Object(m)
    }

    #[test]
    fn nested_key_resolves_via_descend() {
        let arena = DomainArena::new();
        let root = arena.new_root(obj(vec![(
            "employee",
            obj(vec![("salary", Value::Int(50000))]),
        )]));
        let found = arena
            .search(
                root,
                "employee.salary",
                &["employee".to_string(), "salary".to_string()],
                false,
                &noop_handler,
            )
            .unwrap()
            .unwrap();
        assert_eq!(arena.value(found, &noop_handler).unwrap().as_f64(), Some(50000.0));
    }

    #[test]
    fn missing_key_returns_none() {
        let arena = DomainArena::new();
        let root = arena.new_root(obj(vec![]));
        let found = arena
            .search(root, "nope", &["nope".to_string()], false, &noop_handler)
            .unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn repeating_iteration_yields_distinct_domains_cached_by_index() {
        let arena = DomainArena::new();
        let root = arena.new_root(Value::Array(vec![Value::Int(1), Value::Int(2)]));
        let a = arena.iterate(root, 0, &noop_handler).unwrap();
        let b = arena.iterate(root, 0, &noop_handler).unwrap();
        assert_eq!(a, b);
        assert_eq!(arena.value(a, &noop_handler).unwrap().as_f64(), Some(1.0));
        let c = arena.iterate(root, 1, &noop_handler).unwrap();
        assert_eq!(arena.value(c, &noop_handler).unwrap().as_f64(), Some(2.0));
    }

    #[test]
    fn function_domain_evaluates_lazily_and_caches() {
        let arena = DomainArena::new();
        let calls = std::rc::Rc::new(std::cell::Cell::new(0));
        let calls2 = calls.clone();
        let func: Callable = std::rc::Rc::new(move |_this: &Value, _root: &Value| {
            calls2.set(calls2.get() + 1);
            Ok(Value::Int(42))
        });
        let root = arena.new_root(obj(vec![("computed", Value::Function(func))]));
        let child = arena.get(root, "computed", &noop_handler, false).unwrap().unwrap();
        assert_eq!(arena.value(child, &noop_handler).unwrap().as_f64(), Some(42.0));
        assert_eq!(arena.value(child, &noop_handler).unwrap().as_f64(), Some(42.0));
        assert_eq!(calls.get(), 1, "callable should only be invoked once and then cached");
    }
}
