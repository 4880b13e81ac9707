//! Built-in template filters.
//!
//! Filters are applied with pipe syntax: `{{ name | default('guest') | upper }}`.
//! Each filter is a [`Filter`] registered in a [`FilterRegistry`]; the engine
//! owns its registry, so hosts can add or replace filters per engine.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use ajinja_rs_core::error::JinjaError;

use crate::value::{escape_html, Value};

/// A template filter.
///
/// Takes the piped value and evaluated arguments, and returns a transformed value.
pub trait Filter: Send + Sync {
    /// Returns the filter name.
    fn name(&self) -> &str;

    /// Applies the filter to a value with the given arguments.
    fn apply(&self, value: &Value, args: &[Value]) -> Result<Value, JinjaError>;

    /// Whether this filter resolves an undefined input.
    ///
    /// When the base of a pipeline is undefined, filters that return `false`
    /// are skipped; the first filter that returns `true` receives `Null` and
    /// its result makes the expression defined.
    fn accepts_undefined(&self) -> bool {
        false
    }
}

/// Adapts a closure into a [`Filter`].
struct FnFilter<F> {
    name: String,
    func: F,
}

impl<F> Filter for FnFilter<F>
where
    F: Fn(&Value, &[Value]) -> Result<Value, JinjaError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, value: &Value, args: &[Value]) -> Result<Value, JinjaError> {
        (self.func)(value, args)
    }
}

/// A registry of available template filters.
#[derive(Clone, Default)]
pub struct FilterRegistry {
    filters: HashMap<String, Arc<dyn Filter>>,
}

impl FilterRegistry {
    /// Creates a new empty filter registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding all built-in filters.
    pub fn with_builtins() -> Self {
        let mut r = Self::new();
        register_all(&mut r);
        r
    }

    /// Registers a filter, replacing any filter with the same name.
    pub fn register(&mut self, filter: impl Filter + 'static) {
        self.filters
            .insert(filter.name().to_string(), Arc::new(filter));
    }

    /// Registers a closure as a filter.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, func: F)
    where
        F: Fn(&Value, &[Value]) -> Result<Value, JinjaError> + Send + Sync + 'static,
    {
        self.register(FnFilter {
            name: name.into(),
            func,
        });
    }

    /// Looks up a filter by name.
    pub fn get(&self, name: &str) -> Option<&dyn Filter> {
        self.filters.get(name).map(|f| &**f)
    }

    /// Returns `true` if a filter named `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    /// Registered filter names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.filters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Applies a named filter to a value.
    pub fn apply(&self, name: &str, value: &Value, args: &[Value]) -> Result<Value, JinjaError> {
        let filter = self
            .get(name)
            .ok_or_else(|| JinjaError::UnknownFilter(name.to_string()))?;
        filter.apply(value, args)
    }
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterRegistry")
            .field("filters", &self.names())
            .finish()
    }
}

/// Registers all built-in filters.
fn register_all(r: &mut FilterRegistry) {
    // String filters
    r.register(UpperFilter);
    r.register(LowerFilter);
    r.register(CapitalizeFilter);
    r.register(ReplaceFilter);
    r.register(TrimFilter);
    r.register(EscapeFilter);
    r.register(StringFilter);

    // List filters
    r.register(JoinFilter);
    r.register(ListFilter);
    r.register(LengthFilter);
    r.register(FirstFilter);
    r.register(LastFilter);

    // Logic filters
    r.register(DefaultFilter);
}

/// The input as text; `Null` becomes the empty string.
fn text_of(value: &Value) -> String {
    value.to_display_string()
}

fn string_arg<'a>(filter: &str, args: &'a [Value], index: usize, what: &str) -> Result<&'a str, JinjaError> {
    match args.get(index) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(JinjaError::call(
            filter,
            format!("{what} must be a string, got {}", other.type_name()),
        )),
        None => Err(JinjaError::call(filter, format!("missing {what} argument"))),
    }
}

// ============================================================
// String filters
// ============================================================

struct UpperFilter;
impl Filter for UpperFilter {
    fn name(&self) -> &str {
        "upper"
    }
    fn apply(&self, value: &Value, _args: &[Value]) -> Result<Value, JinjaError> {
        Ok(Value::String(text_of(value).to_uppercase()))
    }
}

struct LowerFilter;
impl Filter for LowerFilter {
    fn name(&self) -> &str {
        "lower"
    }
    fn apply(&self, value: &Value, _args: &[Value]) -> Result<Value, JinjaError> {
        Ok(Value::String(text_of(value).to_lowercase()))
    }
}

/// First character uppercased, the rest lowercased.
struct CapitalizeFilter;
impl Filter for CapitalizeFilter {
    fn name(&self) -> &str {
        "capitalize"
    }
    fn apply(&self, value: &Value, _args: &[Value]) -> Result<Value, JinjaError> {
        let s = text_of(value);
        let mut chars = s.chars();
        let result = match chars.next() {
            Some(c) => format!("{}{}", c.to_uppercase(), chars.as_str().to_lowercase()),
            None => String::new(),
        };
        Ok(Value::String(result))
    }
}

/// `replace(old, new[, count])`. Without a count, or with a negative one,
/// every occurrence is replaced.
struct ReplaceFilter;
impl Filter for ReplaceFilter {
    fn name(&self) -> &str {
        "replace"
    }
    fn apply(&self, value: &Value, args: &[Value]) -> Result<Value, JinjaError> {
        let old = string_arg("replace", args, 0, "old substring")?;
        let new = string_arg("replace", args, 1, "new substring")?;
        let s = text_of(value);
        let replaced = match args.get(2) {
            Some(Value::Int(count)) if *count >= 0 => {
                s.replacen(old, new, usize::try_from(*count).unwrap_or(usize::MAX))
            }
            _ => s.replace(old, new),
        };
        Ok(Value::String(replaced))
    }
}

/// `trim([chars])`: strips whitespace, or any of the given characters.
struct TrimFilter;
impl Filter for TrimFilter {
    fn name(&self) -> &str {
        "trim"
    }
    fn apply(&self, value: &Value, args: &[Value]) -> Result<Value, JinjaError> {
        let s = text_of(value);
        if args.is_empty() {
            return Ok(Value::String(s.trim().to_string()));
        }
        let cutset = string_arg("trim", args, 0, "cutset")?;
        Ok(Value::String(
            s.trim_matches(|c| cutset.contains(c)).to_string(),
        ))
    }
}

struct EscapeFilter;
impl Filter for EscapeFilter {
    fn name(&self) -> &str {
        "escape"
    }
    fn apply(&self, value: &Value, _args: &[Value]) -> Result<Value, JinjaError> {
        Ok(Value::String(escape_html(&text_of(value))))
    }
}

struct StringFilter;
impl Filter for StringFilter {
    fn name(&self) -> &str {
        "string"
    }
    fn apply(&self, value: &Value, _args: &[Value]) -> Result<Value, JinjaError> {
        Ok(Value::String(text_of(value)))
    }
}

// ============================================================
// List filters
// ============================================================

/// `join(delimiter="")` over the display strings of a list's items.
struct JoinFilter;
impl Filter for JoinFilter {
    fn name(&self) -> &str {
        "join"
    }
    fn apply(&self, value: &Value, args: &[Value]) -> Result<Value, JinjaError> {
        let delimiter = if args.is_empty() {
            ""
        } else {
            string_arg("join", args, 0, "delimiter")?
        };
        match value {
            Value::Null => Ok(Value::String(String::new())),
            Value::String(s) => Ok(Value::String(s.clone())),
            Value::List(items) => Ok(Value::String(
                items
                    .iter()
                    .map(Value::to_display_string)
                    .collect::<Vec<_>>()
                    .join(delimiter),
            )),
            other => Err(JinjaError::call(
                "join",
                format!("expected a list, got {}", other.type_name()),
            )),
        }
    }
}

/// Strings split into characters; lists pass through; `Null` is empty;
/// anything else becomes a one-item list.
struct ListFilter;
impl Filter for ListFilter {
    fn name(&self) -> &str {
        "list"
    }
    fn apply(&self, value: &Value, _args: &[Value]) -> Result<Value, JinjaError> {
        Ok(Value::List(match value {
            Value::Null => Vec::new(),
            Value::String(s) => s.chars().map(Value::from).collect(),
            Value::List(items) => items.clone(),
            other => vec![other.clone()],
        }))
    }
}

struct LengthFilter;
impl Filter for LengthFilter {
    fn name(&self) -> &str {
        "length"
    }
    fn apply(&self, value: &Value, _args: &[Value]) -> Result<Value, JinjaError> {
        if value.is_null() {
            return Ok(Value::Int(0));
        }
        value.len().map(Value::from).ok_or_else(|| {
            JinjaError::call("length", format!("{} has no length", value.type_name()))
        })
    }
}

struct FirstFilter;
impl Filter for FirstFilter {
    fn name(&self) -> &str {
        "first"
    }
    fn apply(&self, value: &Value, _args: &[Value]) -> Result<Value, JinjaError> {
        match value {
            Value::List(items) => Ok(items.first().cloned().unwrap_or_default()),
            Value::String(s) => Ok(s.chars().next().map(Value::from).unwrap_or_default()),
            _ => Ok(Value::Null),
        }
    }
}

struct LastFilter;
impl Filter for LastFilter {
    fn name(&self) -> &str {
        "last"
    }
    fn apply(&self, value: &Value, _args: &[Value]) -> Result<Value, JinjaError> {
        match value {
            Value::List(items) => Ok(items.last().cloned().unwrap_or_default()),
            Value::String(s) => Ok(s.chars().last().map(Value::from).unwrap_or_default()),
            _ => Ok(Value::Null),
        }
    }
}

// ============================================================
// Logic filters
// ============================================================

/// `default(fallback)`: replaces `Null`, `false`, empty strings, and empty
/// collections. Numbers, including zero, are kept.
struct DefaultFilter;
impl Filter for DefaultFilter {
    fn name(&self) -> &str {
        "default"
    }
    fn apply(&self, value: &Value, args: &[Value]) -> Result<Value, JinjaError> {
        let fallback = args
            .first()
            .ok_or_else(|| JinjaError::call("default", "missing default value argument"))?;
        let use_fallback = match value {
            Value::Null | Value::Bool(false) => true,
            Value::String(s) => s.is_empty(),
            Value::List(items) => items.is_empty(),
            Value::Map(map) => map.is_empty(),
            _ => false,
        };
        Ok(if use_fallback {
            fallback.clone()
        } else {
            value.clone()
        })
    }
    fn accepts_undefined(&self) -> bool {
        true
    }
}
