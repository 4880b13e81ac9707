//! Free functions and value methods callable from templates.
//!
//! Free functions are looked up by bare name when an identifier has no
//! binding in the context: `{{ lookup('env', 'HOME') }}`. Methods are keyed by
//! the receiver's type tag and bound to it when accessed as an attribute:
//! `{{ config.get('port', 8080) }}`.

use std::collections::HashMap;
use std::fmt;

use ajinja_rs_core::error::{JinjaError, JinjaResult};

use crate::value::{Function, Value};

/// A registry of free functions and per-type methods.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Function>,
    methods: HashMap<(String, String), Function>,
}

impl FunctionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with `lookup` and the built-in map and string methods.
    pub fn with_builtins() -> Self {
        let mut r = Self::new();
        register_all(&mut r);
        r
    }

    /// Registers a free function, replacing any function with the same name.
    pub fn register<F>(&mut self, name: impl Into<String>, func: F)
    where
        F: Fn(&[Value]) -> JinjaResult<Value> + Send + Sync + 'static,
    {
        let name = name.into();
        self.functions
            .insert(name.clone(), Function::new(name, func));
    }

    /// Registers a method for receivers whose [`Value::type_name`] is `type_tag`.
    ///
    /// The receiver is passed as the first argument.
    pub fn register_method<F>(&mut self, type_tag: impl Into<String>, name: impl Into<String>, func: F)
    where
        F: Fn(&[Value]) -> JinjaResult<Value> + Send + Sync + 'static,
    {
        let name = name.into();
        self.methods
            .insert((type_tag.into(), name.clone()), Function::new(name, func));
    }

    /// Looks up a free function.
    pub fn get(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    /// Returns `true` if a free function named `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Looks up a method for `receiver` and binds it.
    pub fn method(&self, receiver: &Value, name: &str) -> Option<Function> {
        self.methods
            .get(&(receiver.type_name().to_string(), name.to_string()))
            .map(|func| func.bind(receiver.clone()))
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut functions: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        functions.sort_unstable();
        let mut methods: Vec<String> = self
            .methods
            .keys()
            .map(|(tag, name)| format!("{tag}.{name}"))
            .collect();
        methods.sort_unstable();
        f.debug_struct("FunctionRegistry")
            .field("functions", &functions)
            .field("methods", &methods)
            .finish()
    }
}

fn register_all(r: &mut FunctionRegistry) {
    r.register("lookup", lookup);

    // Map methods
    r.register_method("map", "get", map_get);
    r.register_method("map", "keys", |args| {
        let map = receiver_map("keys", args)?;
        Ok(Value::List(
            sorted_keys(map).into_iter().map(|k| Value::from(k.as_str())).collect(),
        ))
    });
    r.register_method("map", "values", |args| {
        let map = receiver_map("values", args)?;
        Ok(Value::List(
            sorted_keys(map).into_iter().map(|k| map[k].clone()).collect(),
        ))
    });
    r.register_method("map", "items", |args| {
        let map = receiver_map("items", args)?;
        Ok(Value::List(
            sorted_keys(map)
                .into_iter()
                .map(|k| Value::List(vec![Value::from(k.as_str()), map[k].clone()]))
                .collect(),
        ))
    });

    // String methods
    r.register_method("string", "upper", |args| {
        Ok(Value::from(receiver_str("upper", args)?.to_uppercase()))
    });
    r.register_method("string", "lower", |args| {
        Ok(Value::from(receiver_str("lower", args)?.to_lowercase()))
    });
    r.register_method("string", "strip", |args| {
        let s = receiver_str("strip", args)?;
        Ok(Value::from(match args.get(1) {
            Some(Value::String(chars)) => s.trim_matches(|c| chars.contains(c)),
            _ => s.trim(),
        }))
    });
    r.register_method("string", "startswith", |args| {
        let s = receiver_str("startswith", args)?;
        let prefix = str_arg("startswith", args, 1)?;
        Ok(Value::Bool(s.starts_with(prefix)))
    });
    r.register_method("string", "endswith", |args| {
        let s = receiver_str("endswith", args)?;
        let suffix = str_arg("endswith", args, 1)?;
        Ok(Value::Bool(s.ends_with(suffix)))
    });
    r.register_method("string", "split", |args| {
        let s = receiver_str("split", args)?;
        let parts: Vec<Value> = match args.get(1) {
            Some(Value::String(sep)) if !sep.is_empty() => s.split(sep.as_str()).map(Value::from).collect(),
            Some(Value::String(_)) => {
                return Err(JinjaError::call("split", "empty separator"));
            }
            _ => s.split_whitespace().map(Value::from).collect(),
        };
        Ok(Value::List(parts))
    });
    r.register_method("string", "replace", |args| {
        let s = receiver_str("replace", args)?;
        let old = str_arg("replace", args, 1)?;
        let new = str_arg("replace", args, 2)?;
        Ok(Value::from(s.replace(old, new)))
    });
}

/// `lookup('file', path)` or `lookup('env', name)`.
fn lookup(args: &[Value]) -> JinjaResult<Value> {
    let kind = match args.first() {
        Some(Value::String(kind)) => kind.as_str(),
        Some(other) => {
            return Err(JinjaError::call(
                "lookup",
                format!("lookup type must be a string, got {}", other.type_name()),
            ))
        }
        None => return Err(JinjaError::call("lookup", "missing lookup type")),
    };
    let target = str_arg("lookup", args, 1)?;

    match kind {
        "file" => std::fs::read_to_string(target)
            .map(Value::from)
            .map_err(|e| JinjaError::call("lookup", format!("failed to read file {target}: {e}"))),
        "env" => Ok(Value::from(std::env::var(target).unwrap_or_default())),
        other => Err(JinjaError::call(
            "lookup",
            format!("unsupported lookup type: {other}"),
        )),
    }
}

/// `dict.get(key[, default])`. A missing key yields the default, or `None`.
fn map_get(args: &[Value]) -> JinjaResult<Value> {
    let map = receiver_map("get", args)?;
    let key = args
        .get(1)
        .ok_or_else(|| JinjaError::call("get", "missing key argument"))?;
    Ok(map
        .get(&key.to_key_string())
        .or_else(|| args.get(2))
        .cloned()
        .unwrap_or_default())
}

fn receiver_map<'a>(method: &str, args: &'a [Value]) -> JinjaResult<&'a HashMap<String, Value>> {
    match args.first() {
        Some(Value::Map(map)) => Ok(map),
        _ => Err(JinjaError::call(method, "receiver must be a map")),
    }
}

fn receiver_str<'a>(method: &str, args: &'a [Value]) -> JinjaResult<&'a str> {
    match args.first() {
        Some(Value::String(s)) => Ok(s),
        _ => Err(JinjaError::call(method, "receiver must be a string")),
    }
}

fn str_arg<'a>(name: &str, args: &'a [Value], index: usize) -> JinjaResult<&'a str> {
    match args.get(index) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(JinjaError::call(
            name,
            format!("argument {index} must be a string, got {}", other.type_name()),
        )),
        None => Err(JinjaError::call(name, format!("missing argument {index}"))),
    }
}

fn sorted_keys(map: &HashMap<String, Value>) -> Vec<&String> {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    keys
}
