//! Template context for variable resolution.
//!
//! A [`Context`] is an immutable-by-the-engine stack of scopes. The renderer
//! never writes into a caller's context: each loop iteration gets a fresh
//! child built with [`Context::child`], which shares the parent scopes and
//! layers the loop variables on top.

use std::collections::HashMap;
use std::sync::Arc;

use crate::value::Value;

/// Variable bindings for one render or evaluation call.
///
/// Lookup searches from the most recently added scope downward. Cloning a
/// context is cheap; scopes are reference counted and copied on write.
///
/// # Examples
///
/// ```
/// use ajinja_rs_template::context::Context;
/// use ajinja_rs_template::value::Value;
///
/// let mut ctx = Context::new();
/// ctx.insert("name", "Ansible");
///
/// let inner = ctx.child([("name".to_string(), Value::from("loop"))].into());
/// assert_eq!(inner.get("name"), Some(&Value::from("loop")));
/// assert_eq!(ctx.get("name"), Some(&Value::from("Ansible")));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Context {
    scopes: Vec<Arc<HashMap<String, Value>>>,
}

impl Context {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a variable in the innermost scope.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        if self.scopes.is_empty() {
            self.scopes.push(Arc::new(HashMap::new()));
        }
        if let Some(top) = self.scopes.last_mut() {
            Arc::make_mut(top).insert(key.into(), value.into());
        }
    }

    /// Looks up a variable by name.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.scopes.iter().rev().find_map(|scope| scope.get(key))
    }

    /// Returns `true` if `key` is bound in any scope.
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Returns a new context with `bindings` layered over this one.
    ///
    /// `self` is left untouched.
    #[must_use]
    pub fn child(&self, bindings: HashMap<String, Value>) -> Self {
        let mut scopes = self.scopes.clone();
        scopes.push(Arc::new(bindings));
        Self { scopes }
    }

    /// Returns a new context with `base` underneath this one, so that
    /// existing bindings shadow it. An `Arc` base is shared, not copied.
    #[must_use]
    pub fn with_fallback(&self, base: impl Into<Arc<HashMap<String, Value>>>) -> Self {
        let base = base.into();
        if base.is_empty() {
            return self.clone();
        }
        let mut scopes = Vec::with_capacity(self.scopes.len() + 1);
        scopes.push(base);
        scopes.extend(self.scopes.iter().cloned());
        Self { scopes }
    }
}

impl From<HashMap<String, Value>> for Context {
    fn from(map: HashMap<String, Value>) -> Self {
        Self {
            scopes: vec![Arc::new(map)],
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Context {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let map: HashMap<String, Value> = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::from(map)
    }
}

/// Per-iteration metadata exposed as `loop` inside a `{% for %}` body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopContext {
    /// 1-based position.
    pub index: usize,
    /// 0-based position.
    pub index0: usize,
    /// `true` on the first iteration.
    pub first: bool,
    /// `true` on the last iteration.
    pub last: bool,
    /// Number of items in the loop.
    pub length: usize,
    /// Iterations remaining, counting this one.
    pub revindex: usize,
    /// Iterations remaining after this one.
    pub revindex0: usize,
}

impl LoopContext {
    /// Metadata for the iteration at `index0` of a loop over `length` items.
    pub const fn new(index0: usize, length: usize) -> Self {
        Self {
            index: index0 + 1,
            index0,
            first: index0 == 0,
            last: index0 + 1 == length,
            length,
            revindex: length - index0,
            revindex0: length - index0 - 1,
        }
    }

    /// The map bound to `loop` in the iteration context.
    pub fn to_value(&self) -> Value {
        Value::Map(HashMap::from([
            ("index".to_string(), Value::from(self.index)),
            ("index0".to_string(), Value::from(self.index0)),
            ("first".to_string(), Value::Bool(self.first)),
            ("last".to_string(), Value::Bool(self.last)),
            ("length".to_string(), Value::from(self.length)),
            ("revindex".to_string(), Value::from(self.revindex)),
            ("revindex0".to_string(), Value::from(self.revindex0)),
        ]))
    }
}
