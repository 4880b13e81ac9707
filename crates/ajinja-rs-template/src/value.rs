//! Dynamic values for template expressions.
//!
//! [`Value`] is the closed set of data kinds an expression can produce.
//! Host data that does not fit the built-in variants enters through the
//! [`NativeObject`] capability trait, wrapped in [`Value::Object`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use ajinja_rs_core::error::{JinjaError, JinjaResult};
use serde::Serialize;

/// The signature of a host-provided callable.
pub type NativeFn = dyn Fn(&[Value]) -> JinjaResult<Value> + Send + Sync;

/// A named callable value.
///
/// Functions are cheap to clone; the underlying closure is shared.
#[derive(Clone)]
pub struct Function {
    name: Arc<str>,
    func: Arc<NativeFn>,
}

impl Function {
    /// Wraps a closure as a callable value.
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&[Value]) -> JinjaResult<Value> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name.into()),
            func: Arc::new(func),
        }
    }

    /// The name the function was registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invokes the function with already-evaluated arguments.
    pub fn call(&self, args: &[Value]) -> JinjaResult<Value> {
        (self.func)(args)
    }

    /// Returns a new function that passes `receiver` as its first argument.
    ///
    /// This is how registry methods such as `dict.get(key)` become ordinary
    /// callables once looked up on a value.
    #[must_use]
    pub fn bind(&self, receiver: Value) -> Self {
        let func = Arc::clone(&self.func);
        Self {
            name: Arc::clone(&self.name),
            func: Arc::new(move |args: &[Value]| {
                let mut full = Vec::with_capacity(args.len() + 1);
                full.push(receiver.clone());
                full.extend_from_slice(args);
                func(&full)
            }),
        }
    }

    fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Function").field(&self.name).finish()
    }
}

/// A host object exposed to templates through explicit capabilities.
///
/// Only `type_name` and `get_attribute` are required; the remaining methods
/// default to "not supported".
pub trait NativeObject: fmt::Debug + Send + Sync {
    /// The type tag used for method lookup and error messages.
    fn type_name(&self) -> &str;

    /// Looks up a field or method by exact name.
    fn get_attribute(&self, name: &str) -> Option<Value>;

    /// Names that [`get_attribute`](Self::get_attribute) understands. Used for
    /// case-insensitive fallback lookup.
    fn attribute_names(&self) -> Vec<String> {
        Vec::new()
    }

    /// Looks up an item by subscript key.
    fn get_item(&self, _key: &Value) -> Option<Value> {
        None
    }

    /// Whether [`call`](Self::call) is supported.
    fn is_callable(&self) -> bool {
        false
    }

    /// Invokes the object.
    fn call(&self, _args: &[Value]) -> JinjaResult<Value> {
        Err(JinjaError::NotCallable(format!(
            "'{}' object is not callable",
            self.type_name()
        )))
    }

    /// How the object renders inside `{{ }}`.
    fn render(&self) -> String {
        format!("<{}>", self.type_name())
    }
}

/// A dynamic value produced by evaluating an expression.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// The explicit absence of a value (`None`).
    #[default]
    Null,
    /// A boolean.
    Bool(bool),
    /// A 64-bit signed integer.
    Int(i64),
    /// A 64-bit float.
    Float(f64),
    /// A string.
    String(String),
    /// An ordered list.
    List(Vec<Value>),
    /// A string-keyed mapping. Iteration order is unspecified.
    Map(HashMap<String, Value>),
    /// A function or bound method.
    Callable(Function),
    /// A host object accessed through [`NativeObject`].
    Object(Arc<dyn NativeObject>),
}

impl Value {
    /// Wraps a native object.
    pub fn object<T: NativeObject + 'static>(object: T) -> Self {
        Self::Object(Arc::new(object))
    }

    /// Converts any serializable host value through its JSON representation.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> JinjaResult<Self> {
        serde_json::to_value(value)
            .map(Self::from)
            .map_err(|e| JinjaError::TypeError(format!("cannot convert to a template value: {e}")))
    }

    /// The type tag of this value, as used by the method registry.
    pub fn type_name(&self) -> &str {
        match self {
            Self::Null => "none",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Callable(_) => "callable",
            Self::Object(obj) => obj.type_name(),
        }
    }

    /// Boolean coercion.
    ///
    /// `Null`, `false`, `0`, `0.0`, `""`, and empty lists and maps are falsy;
    /// everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::String(s) => !s.is_empty(),
            Self::List(l) => !l.is_empty(),
            Self::Map(m) => !m.is_empty(),
            Self::Callable(_) | Self::Object(_) => true,
        }
    }

    /// The text emitted when this value is rendered by `{{ }}`.
    pub fn to_display_string(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::String(s) => s.clone(),
            Self::List(_) | Self::Map(_) => self.to_repr(),
            Self::Callable(func) => format!("<function {}>", func.name()),
            Self::Object(obj) => obj.render(),
        }
    }

    /// Returns a Python-like repr string. Map keys are sorted so the output
    /// is stable.
    pub fn to_repr(&self) -> String {
        match self {
            Self::Null => "None".to_string(),
            Self::Bool(true) => "True".to_string(),
            Self::Bool(false) => "False".to_string(),
            Self::String(s) => format!("'{s}'"),
            Self::List(items) => {
                let inner: Vec<String> = items.iter().map(Self::to_repr).collect();
                format!("[{}]", inner.join(", "))
            }
            Self::Map(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                let inner: Vec<String> = keys
                    .into_iter()
                    .map(|k| format!("'{k}': {}", map[k].to_repr()))
                    .collect();
                format!("{{{}}}", inner.join(", "))
            }
            other => other.to_display_string(),
        }
    }

    /// The string used when this value is a map key: strings as-is,
    /// everything else by its display form.
    pub fn to_key_string(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            other => other.to_display_string(),
        }
    }

    /// Returns the string contents if this is a `String`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric coercion used by comparisons: ints, floats, and numeric strings.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            #[allow(clippy::cast_precision_loss)]
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Index coercion used by subscripts: ints, integral floats, booleans,
    /// and integer strings.
    pub fn as_index(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Bool(b) => Some(i64::from(*b)),
            #[allow(clippy::cast_possible_truncation)]
            Self::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            Self::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    /// Returns the length of a string (in characters), list, or map.
    pub fn len(&self) -> Option<usize> {
        match self {
            Self::String(s) => Some(s.chars().count()),
            Self::List(l) => Some(l.len()),
            Self::Map(m) => Some(m.len()),
            _ => None,
        }
    }

    /// Returns `true` if this is a `Null`.
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

/// Deep structural equality. `Int` and `Float` compare by numeric value;
/// callables and native objects compare by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            #[allow(clippy::cast_precision_loss)]
            (Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => (*a as f64) == *b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            (Self::Callable(a), Self::Callable(b)) => a.ptr_eq(b),
            (Self::Object(a), Self::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

// -- From implementations --

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<char> for Value {
    fn from(c: char) -> Self {
        Self::String(c.to_string())
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        i64::try_from(i).map_or_else(|_| Self::Float(i as f64), Self::Int)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Function> for Value {
    fn from(f: Function) -> Self {
        Self::Callable(f)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<HashMap<String, T>> for Value {
    fn from(m: HashMap<String, T>) -> Self {
        Self::Map(m.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(o: Option<T>) -> Self {
        o.map_or(Self::Null, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float))
                .unwrap_or(Self::Null),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(arr) => Self::List(arr.into_iter().map(Self::from).collect()),
            serde_json::Value::Object(map) => {
                Self::Map(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

/// Escapes HTML special characters in a string.
///
/// Replaces `&`, `<`, `>`, `"`, and `'` with numeric or named entities.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
