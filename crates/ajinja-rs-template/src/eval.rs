//! Tree-walking evaluator for parsed expressions.
//!
//! An [`Evaluator`] borrows a [`Context`] and the two registries for the
//! duration of one render or evaluate call. Evaluation is a pure recursive
//! walk: the first failure propagates and no partial result is produced.

use std::borrow::Cow;
use std::collections::HashMap;

use ajinja_rs_core::error::{JinjaError, JinjaResult};

use crate::context::Context;
use crate::filters::FilterRegistry;
use crate::functions::FunctionRegistry;
use crate::lexer::Operator;
use crate::operators;
use crate::parser::{Expr, Pipeline};
use crate::value::Value;

/// The outcome of evaluating a [`Pipeline`].
///
/// An undefined base variable is not an immediate failure for a pipeline:
/// a filter that accepts undefined input (such as `default`) can still
/// resolve it. The three states keep "never defined" apart from "defined
/// only because a filter rescued it".
#[derive(Debug)]
pub enum Resolved {
    /// The base expression produced a value.
    Defined(Value),
    /// The base variable path was undefined and no filter resolved it.
    Undefined(JinjaError),
    /// The base was undefined, then a filter produced a value.
    Rescued(Value),
}

impl Resolved {
    /// Returns the value, or the lookup failure if still undefined.
    pub fn into_value(self) -> JinjaResult<Value> {
        match self {
            Self::Defined(value) | Self::Rescued(value) => Ok(value),
            Self::Undefined(err) => Err(err),
        }
    }

    /// Returns `true` for the unrescued state.
    pub const fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined(_))
    }
}

/// Evaluates expressions against a context.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator<'a> {
    context: &'a Context,
    functions: &'a FunctionRegistry,
    filters: &'a FilterRegistry,
}

impl<'a> Evaluator<'a> {
    /// Creates an evaluator over the given context and registries.
    pub const fn new(
        context: &'a Context,
        functions: &'a FunctionRegistry,
        filters: &'a FilterRegistry,
    ) -> Self {
        Self {
            context,
            functions,
            filters,
        }
    }

    /// The context this evaluator reads from.
    pub const fn context(&self) -> &'a Context {
        self.context
    }

    /// Evaluates an expression to an owned value.
    pub fn eval(&self, expr: &Expr) -> JinjaResult<Value> {
        self.eval_ref(expr).map(Cow::into_owned)
    }

    /// Evaluates a pipeline, tracking whether an undefined base was rescued.
    ///
    /// # Errors
    ///
    /// Any failure other than an undefined base variable path is returned
    /// directly, as is an unknown filter name (even while undefined).
    pub fn eval_pipeline(&self, pipeline: &Pipeline) -> JinjaResult<Resolved> {
        let mut state = match self.eval(&pipeline.base) {
            Ok(value) => Resolved::Defined(value),
            Err(err) if err.is_undefined() && pipeline.base.is_variable_path() => {
                Resolved::Undefined(err)
            }
            Err(err) => return Err(err),
        };

        for call in &pipeline.filters {
            let filter = self
                .filters
                .get(&call.name)
                .ok_or_else(|| JinjaError::UnknownFilter(call.name.clone()))?;
            let args = self.eval_all(&call.args)?;
            state = match state {
                Resolved::Defined(value) => Resolved::Defined(filter.apply(&value, &args)?),
                Resolved::Rescued(value) => Resolved::Rescued(filter.apply(&value, &args)?),
                Resolved::Undefined(_) if filter.accepts_undefined() => {
                    Resolved::Rescued(filter.apply(&Value::Null, &args)?)
                }
                undefined @ Resolved::Undefined(_) => undefined,
            };
        }
        Ok(state)
    }

    /// Evaluates a pipeline and treats an unrescued undefined as an error.
    pub fn eval_pipeline_strict(&self, pipeline: &Pipeline) -> JinjaResult<Value> {
        self.eval_pipeline(pipeline)?.into_value()
    }

    fn eval_all(&self, exprs: &[Expr]) -> JinjaResult<Vec<Value>> {
        exprs.iter().map(|e| self.eval(e)).collect()
    }

    fn eval_ref<'e>(&self, expr: &'e Expr) -> JinjaResult<Cow<'e, Value>>
    where
        'a: 'e,
    {
        match expr {
            Expr::Literal(value) => Ok(Cow::Borrowed(value)),
            Expr::Identifier(name) => self.identifier(name),
            Expr::Unary { op, operand } => {
                let value = self.eval_ref(operand)?;
                operators::unary(*op, &value).map(Cow::Owned)
            }
            Expr::Binary { op, left, right } => self.binary(*op, left, right).map(Cow::Owned),
            Expr::Attribute { object, name } => match self.eval_ref(object)? {
                Cow::Borrowed(value) => self.attribute(value, name),
                Cow::Owned(value) => self
                    .attribute(&value, name)
                    .map(|v| Cow::Owned(v.into_owned())),
            },
            Expr::Subscript { object, key } => {
                let object = self.eval_ref(object)?;
                let key = self.eval_ref(key)?;
                match object {
                    Cow::Borrowed(value) => subscript(value, &key),
                    Cow::Owned(value) => {
                        subscript(&value, &key).map(|v| Cow::Owned(v.into_owned()))
                    }
                }
            }
            Expr::Call { callee, args } => {
                let callee = self.eval_ref(callee)?;
                let args = self.eval_all(args)?;
                call(&callee, &args).map(Cow::Owned)
            }
            Expr::List(items) => self.eval_all(items).map(|v| Cow::Owned(Value::List(v))),
            Expr::Dict(pairs) => {
                let mut map = HashMap::with_capacity(pairs.len());
                for (key, value) in pairs {
                    let key = self.eval_ref(key)?.to_key_string();
                    map.insert(key, self.eval(value)?);
                }
                Ok(Cow::Owned(Value::Map(map)))
            }
        }
    }

    fn identifier<'e>(&self, name: &str) -> JinjaResult<Cow<'e, Value>>
    where
        'a: 'e,
    {
        if let Some(value) = self.context.get(name) {
            return Ok(Cow::Borrowed(value));
        }
        self.functions
            .get(name)
            .map(|func| Cow::Owned(Value::Callable(func.clone())))
            .ok_or_else(|| JinjaError::UndefinedVariable(name.to_string()))
    }

    fn binary(&self, op: Operator, left: &Expr, right: &Expr) -> JinjaResult<Value> {
        match op {
            Operator::And => {
                let left = self.eval(left)?;
                if left.is_truthy() {
                    self.eval(right)
                } else {
                    Ok(left)
                }
            }
            Operator::Or => {
                let left = self.eval(left)?;
                if left.is_truthy() {
                    Ok(left)
                } else {
                    self.eval(right)
                }
            }
            _ => {
                let left = self.eval_ref(left)?;
                let right = self.eval_ref(right)?;
                operators::binary(op, &left, &right)
            }
        }
    }

    fn attribute<'v>(&self, object: &'v Value, name: &str) -> JinjaResult<Cow<'v, Value>> {
        match object {
            Value::Map(map) => {
                if let Some(value) = map.get(name) {
                    return Ok(Cow::Borrowed(value));
                }
            }
            Value::List(_) if name.bytes().all(|b| b.is_ascii_digit()) => {
                return subscript(object, &Value::from(name));
            }
            Value::Object(obj) => {
                let found = obj.get_attribute(name).or_else(|| {
                    obj.attribute_names()
                        .into_iter()
                        .find(|candidate| candidate.eq_ignore_ascii_case(name))
                        .and_then(|candidate| obj.get_attribute(&candidate))
                });
                if let Some(value) = found {
                    return Ok(Cow::Owned(value));
                }
            }
            _ => {}
        }

        self.functions
            .method(object, name)
            .map(|method| Cow::Owned(Value::Callable(method)))
            .ok_or_else(|| {
                JinjaError::AttributeNotFound(format!(
                    "'{}' object has no attribute '{name}'",
                    object.type_name()
                ))
            })
    }
}

/// Resolves a possibly negative index against a sequence of `len` items.
fn resolve_index(key: &Value, len: usize) -> JinjaResult<usize> {
    let raw = key.as_index().ok_or_else(|| {
        JinjaError::TypeError(format!(
            "indices must be integers, not '{}'",
            key.type_name()
        ))
    })?;
    let len_i = i64::try_from(len).unwrap_or(i64::MAX);
    let index = if raw < 0 { raw + len_i } else { raw };
    usize::try_from(index)
        .ok()
        .filter(|i| *i < len)
        .ok_or_else(|| JinjaError::IndexError(format!("index {raw} out of range for length {len}")))
}

fn subscript<'v>(object: &'v Value, key: &Value) -> JinjaResult<Cow<'v, Value>> {
    match object {
        Value::Map(map) => {
            let key = key.to_key_string();
            map.get(&key)
                .map(Cow::Borrowed)
                .ok_or_else(|| JinjaError::AttributeNotFound(format!("key '{key}' not found")))
        }
        Value::List(items) => {
            let index = resolve_index(key, items.len())?;
            Ok(Cow::Borrowed(&items[index]))
        }
        Value::String(s) => {
            let index = resolve_index(key, s.chars().count())?;
            Ok(Cow::Owned(s.chars().nth(index).map(Value::from).unwrap_or_default()))
        }
        Value::Object(obj) => obj.get_item(key).map(Cow::Owned).ok_or_else(|| {
            JinjaError::AttributeNotFound(format!(
                "key '{}' not found in '{}' object",
                key.to_key_string(),
                obj.type_name()
            ))
        }),
        other => Err(JinjaError::TypeError(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

fn call(callee: &Value, args: &[Value]) -> JinjaResult<Value> {
    match callee {
        Value::Callable(func) => func.call(args),
        Value::Object(obj) if obj.is_callable() => obj.call(args),
        other => Err(JinjaError::NotCallable(format!(
            "'{}' object is not callable",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_expression, parse_pipeline};
    use crate::value::NativeObject;

    fn eval_with(source: &str, ctx: &Context) -> JinjaResult<Value> {
        let functions = FunctionRegistry::with_builtins();
        let filters = FilterRegistry::with_builtins();
        let expr = parse_expression(source)?;
        Evaluator::new(ctx, &functions, &filters).eval(&expr)
    }

    fn eval(source: &str) -> JinjaResult<Value> {
        eval_with(source, &Context::new())
    }

    fn pipeline(source: &str, ctx: &Context) -> JinjaResult<Resolved> {
        let functions = FunctionRegistry::with_builtins();
        let filters = FilterRegistry::with_builtins();
        let pipeline = parse_pipeline(source)?;
        Evaluator::new(ctx, &functions, &filters).eval_pipeline(&pipeline)
    }

    #[derive(Debug)]
    struct Server;

    impl NativeObject for Server {
        fn type_name(&self) -> &str {
            "server"
        }

        fn get_attribute(&self, name: &str) -> Option<Value> {
            match name {
                "Hostname" => Some(Value::from("web-01")),
                "Port" => Some(Value::Int(443)),
                _ => None,
            }
        }

        fn attribute_names(&self) -> Vec<String> {
            vec!["Hostname".into(), "Port".into()]
        }

        fn get_item(&self, key: &Value) -> Option<Value> {
            self.get_attribute(key.as_str()?)
        }

        fn is_callable(&self) -> bool {
            true
        }

        fn call(&self, args: &[Value]) -> JinjaResult<Value> {
            Ok(Value::from(args.len()))
        }
    }

    #[test]
    fn test_literals() {
        assert_eq!(eval("42").unwrap(), Value::Int(42));
        assert_eq!(eval("2.5").unwrap(), Value::Float(2.5));
        assert_eq!(eval("'hi'").unwrap(), Value::from("hi"));
        assert_eq!(eval("True").unwrap(), Value::Bool(true));
        assert_eq!(eval("None").unwrap(), Value::Null);
    }

    #[test]
    fn test_precedence() {
        assert_eq!(eval("1 + 2 * 3").unwrap(), Value::Int(7));
        assert_eq!(eval("(1 + 2) * 3").unwrap(), Value::Int(9));
        assert_eq!(eval("2 ** 3 * 2 + 3").unwrap(), Value::Int(19));
        assert_eq!(eval("2 ** 3 ** 2").unwrap(), Value::Int(512));
        assert_eq!(eval("-2 + 5").unwrap(), Value::Int(3));
        assert_eq!(eval("not 1 == 2").unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_short_circuit() {
        let ctx: Context = [("false", false), ("true", true)].into_iter().collect();
        assert_eq!(eval_with("false and undefined_var", &ctx).unwrap(), Value::Bool(false));
        assert_eq!(eval_with("true or undefined_var", &ctx).unwrap(), Value::Bool(true));
        assert!(eval_with("true and undefined_var", &ctx).is_err());
    }

    #[test]
    fn test_and_or_return_operands() {
        assert_eq!(eval("'' or 'fallback'").unwrap(), Value::from("fallback"));
        assert_eq!(eval("0 and 1").unwrap(), Value::Int(0));
        assert_eq!(eval("'a' and 'b'").unwrap(), Value::from("b"));
    }

    #[test]
    fn test_undefined_variable() {
        let err = eval("missing").unwrap_err();
        assert!(matches!(err, JinjaError::UndefinedVariable(ref n) if n == "missing"));
    }

    #[test]
    fn test_subscripts() {
        let ctx: Context = [("items", vec![10, 20, 30])].into_iter().collect();
        assert_eq!(eval_with("items[-1]", &ctx).unwrap(), Value::Int(30));
        assert_eq!(eval_with("items[0]", &ctx).unwrap(), Value::Int(10));
        assert_eq!(eval_with("items.1", &ctx).unwrap(), Value::Int(20));
        assert!(matches!(
            eval_with("items[3]", &ctx),
            Err(JinjaError::IndexError(_))
        ));
        assert!(matches!(
            eval_with("items[-4]", &ctx),
            Err(JinjaError::IndexError(_))
        ));
        assert!(matches!(
            eval_with("items[[1]]", &ctx),
            Err(JinjaError::TypeError(_))
        ));
        assert_eq!(eval("'hello'[1]").unwrap(), Value::from("e"));
        assert_eq!(eval("{'a': 1}['a']").unwrap(), Value::Int(1));
        assert_eq!(eval("{1: 'one'}[1]").unwrap(), Value::from("one"));
        assert!(matches!(
            eval("{'a': 1}['b']"),
            Err(JinjaError::AttributeNotFound(_))
        ));
        assert!(matches!(eval("5[0]"), Err(JinjaError::TypeError(_))));
    }

    #[test]
    fn test_nested_attribute_access() {
        let ctx: Context = [(
            "user",
            Value::from(serde_json::json!({"address": {"city": "Lyon"}, "tags": ["a", "b"]})),
        )]
        .into_iter()
        .collect();
        assert_eq!(eval_with("user.address.city", &ctx).unwrap(), Value::from("Lyon"));
        assert_eq!(eval_with("user['address']['city']", &ctx).unwrap(), Value::from("Lyon"));
        assert_eq!(eval_with("user.tags[1]", &ctx).unwrap(), Value::from("b"));
        assert!(matches!(
            eval_with("user.phone", &ctx),
            Err(JinjaError::AttributeNotFound(_))
        ));
    }

    #[test]
    fn test_map_methods_bound_to_receiver() {
        let ctx: Context = [("config", Value::from(serde_json::json!({"port": 80})))]
            .into_iter()
            .collect();
        assert_eq!(eval_with("config.get('port')", &ctx).unwrap(), Value::Int(80));
        assert_eq!(
            eval_with("config.get('host', 'localhost')", &ctx).unwrap(),
            Value::from("localhost")
        );
        assert_eq!(eval("'Hi'.upper()").unwrap(), Value::from("HI"));
    }

    #[test]
    fn test_map_key_shadows_method() {
        let ctx: Context = [("m", Value::from(serde_json::json!({"keys": "mine"})))]
            .into_iter()
            .collect();
        assert_eq!(eval_with("m.keys", &ctx).unwrap(), Value::from("mine"));
    }

    #[test]
    fn test_native_object_access() {
        let ctx: Context = [("srv", Value::object(Server))].into_iter().collect();
        assert_eq!(eval_with("srv.Hostname", &ctx).unwrap(), Value::from("web-01"));
        assert_eq!(eval_with("srv.hostname", &ctx).unwrap(), Value::from("web-01"));
        assert_eq!(eval_with("srv['Port']", &ctx).unwrap(), Value::Int(443));
        assert_eq!(eval_with("srv(1, 2)", &ctx).unwrap(), Value::Int(2));
        assert!(matches!(
            eval_with("srv.missing", &ctx),
            Err(JinjaError::AttributeNotFound(_))
        ));
    }

    #[test]
    fn test_calls() {
        let ctx: Context = [("n", 3)].into_iter().collect();
        assert!(matches!(eval_with("n()", &ctx), Err(JinjaError::NotCallable(_))));
        assert_eq!(
            eval("lookup('env', 'AJINJA_SURELY_UNSET_VAR')").unwrap(),
            Value::from("")
        );
    }

    #[test]
    fn test_context_shadows_function() {
        let ctx: Context = [("lookup", "shadowed")].into_iter().collect();
        assert_eq!(eval_with("lookup", &ctx).unwrap(), Value::from("shadowed"));
    }

    #[test]
    fn test_collection_literals() {
        assert_eq!(eval("[1, 'a', [2]]").unwrap(), Value::from(vec![
            Value::Int(1),
            Value::from("a"),
            Value::from(vec![2]),
        ]));
        let Value::Map(map) = eval("{'a': 1, 2: 'b'}").unwrap() else {
            panic!("expected a map");
        };
        assert_eq!(map["a"], Value::Int(1));
        assert_eq!(map["2"], Value::from("b"));
    }

    #[test]
    fn test_pipeline_defined() {
        let ctx: Context = [("name", "ann")].into_iter().collect();
        let resolved = pipeline("name | upper", &ctx).unwrap();
        assert!(matches!(resolved, Resolved::Defined(ref v) if *v == Value::from("ANN")));
    }

    #[test]
    fn test_pipeline_undefined_skips_filters() {
        let resolved = pipeline("missing | upper", &Context::new()).unwrap();
        assert!(resolved.is_undefined());
    }

    #[test]
    fn test_pipeline_rescued_by_default() {
        let resolved = pipeline("missing | default('guest') | upper", &Context::new()).unwrap();
        assert!(matches!(resolved, Resolved::Rescued(ref v) if *v == Value::from("GUEST")));
    }

    #[test]
    fn test_pipeline_unknown_filter_even_when_undefined() {
        assert!(matches!(
            pipeline("missing | bogus", &Context::new()),
            Err(JinjaError::UnknownFilter(_))
        ));
    }

    #[test]
    fn test_pipeline_non_path_errors_propagate() {
        assert!(matches!(
            pipeline("missing + 1 | default(0)", &Context::new()),
            Err(JinjaError::UndefinedVariable(_))
        ));
    }

    #[test]
    fn test_strict_pipeline() {
        let functions = FunctionRegistry::with_builtins();
        let filters = FilterRegistry::with_builtins();
        let ctx = Context::new();
        let evaluator = Evaluator::new(&ctx, &functions, &filters);
        assert!(evaluator
            .eval_pipeline_strict(&parse_pipeline("x").unwrap())
            .is_err());
        assert_eq!(
            evaluator
                .eval_pipeline_strict(&parse_pipeline("x | default(1)").unwrap())
                .unwrap(),
            Value::Int(1)
        );
    }
}
