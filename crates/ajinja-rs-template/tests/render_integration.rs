//! Integration tests for the template engine.
//!
//! Tests cover: expression precedence and literals, short-circuiting, the
//! render/evaluate undefined-variable split, if/elif/else chains, for loops
//! with `loop` metadata and unpacking, nesting, quote-aware tag scanning,
//! literal fallthrough of unclosed tags, filter pipelines, methods, lookups,
//! native objects, globals, and error locations.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use ajinja_rs_core::error::{BlockKind, JinjaError};
use ajinja_rs_core::settings::EngineSettings;
use ajinja_rs_template::{
    evaluate_expression, render_template, Context, Engine, NativeObject, Value,
};

fn ctx<V: Into<Value>>(pairs: Vec<(&str, V)>) -> Context {
    pairs.into_iter().collect()
}

fn eval(expr: &str) -> Value {
    evaluate_expression(expr, &Context::new()).unwrap()
}

// ═════════════════════════════════════════════════════════════════════
// 1. Expressions
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_scalar_literals() {
    assert_eq!(eval("42"), Value::Int(42));
    assert_eq!(eval("2.5"), Value::Float(2.5));
    assert_eq!(eval("'single'"), Value::from("single"));
    assert_eq!(eval("\"double\""), Value::from("double"));
    assert_eq!(eval("True"), Value::Bool(true));
    assert_eq!(eval("False"), Value::Bool(false));
    assert_eq!(eval("None"), Value::Null);
}

#[test]
fn test_operator_precedence() {
    assert_eq!(eval("1 + 2 * 3"), Value::Int(7));
    assert_eq!(eval("(1 + 2) * 3"), Value::Int(9));
    assert_eq!(eval("2 ** 3 * 2 + 3"), Value::Int(19));
    assert_eq!(eval("10 - 4 - 3"), Value::Int(3));
    assert_eq!(eval("7 // 2"), Value::Int(3));
    assert_eq!(eval("7 / 2"), Value::Float(3.5));
    assert_eq!(eval("(0 - 7) % 3"), Value::Int(2));
}

#[test]
fn test_short_circuit() {
    let c = ctx(vec![("false", false)]);
    assert_eq!(
        evaluate_expression("false and undefined_var", &c).unwrap(),
        Value::Bool(false)
    );
    let c = ctx(vec![("true", true)]);
    assert_eq!(
        evaluate_expression("true or undefined_var", &c).unwrap(),
        Value::Bool(true)
    );
}

#[test]
fn test_negative_index() {
    let c = ctx(vec![("items", vec![10, 20, 30])]);
    assert_eq!(evaluate_expression("items[-1]", &c).unwrap(), Value::Int(30));
    let err = evaluate_expression("items[3]", &c).unwrap_err();
    assert!(matches!(err, JinjaError::IndexError(_)));
}

#[test]
fn test_membership_and_comparison() {
    let c = ctx(vec![("roles", vec!["admin", "dev"])]);
    assert_eq!(evaluate_expression("'dev' in roles", &c).unwrap(), Value::Bool(true));
    assert_eq!(evaluate_expression("'ops' not in roles", &c).unwrap(), Value::Bool(true));
    assert_eq!(eval("1 < 2 and 3 >= 3.0"), Value::Bool(true));
}

#[test]
fn test_division_by_zero() {
    let err = evaluate_expression("1 / 0", &Context::new()).unwrap_err();
    assert!(matches!(err, JinjaError::DivisionByZero(_)));
}

#[test]
fn test_oversized_repetition_is_an_error() {
    let c = Context::new();
    for expr in ["'ab' * 9223372036854775807", "[1, 2] * 4611686018427387904"] {
        let err = evaluate_expression(expr, &c).unwrap_err();
        assert!(matches!(err, JinjaError::TypeError(_)), "{expr}");
    }
    assert_eq!(eval("[] * 9223372036854775807"), Value::List(vec![]));
    let err = render_template("{{ 'x' * 99999999999 }}", &c).unwrap_err();
    assert!(matches!(err.root_cause(), JinjaError::TypeError(_)));
}

#[test]
fn test_min_integer_literal() {
    assert_eq!(eval("-9223372036854775808"), Value::Int(i64::MIN));
    assert!(evaluate_expression("9223372036854775808", &Context::new()).is_err());
}

// ═════════════════════════════════════════════════════════════════════
// 2. Undefined variables
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_undefined_rescue_distinction() {
    assert_eq!(render_template("{{ x }}", &Context::new()).unwrap(), "");
    let err = evaluate_expression("x", &Context::new()).unwrap_err();
    assert!(matches!(err, JinjaError::UndefinedVariable(ref n) if n == "x"));
}

#[test]
fn test_default_filter_rescues_in_both_paths() {
    assert_eq!(
        render_template("{{ x | default('none given') | upper }}", &Context::new()).unwrap(),
        "NONE GIVEN"
    );
    assert_eq!(
        evaluate_expression("missing.path | default(3)", &Context::new()).unwrap(),
        Value::Int(3)
    );
}

#[test]
fn test_undefined_condition_fails_render() {
    let err = render_template("{% if nope %}x{% endif %}", &Context::new()).unwrap_err();
    assert!(matches!(err.root_cause(), JinjaError::UndefinedVariable(_)));
}

#[test]
fn test_unknown_filter_fails_even_when_undefined() {
    let err = render_template("{{ x | frobnicate }}", &Context::new()).unwrap_err();
    assert!(matches!(err.root_cause(), JinjaError::UnknownFilter(n) if n == "frobnicate"));
}

// ═════════════════════════════════════════════════════════════════════
// 3. Control flow
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_single_branch_wins() {
    let c = ctx(vec![("c1", false), ("c2", true)]);
    assert_eq!(
        render_template("{% if c1 %}A{% elif c2 %}B{% else %}C{% endif %}", &c).unwrap(),
        "B"
    );
}

#[test]
fn test_loop_metadata() {
    assert_eq!(
        render_template(
            "{% for i in [10,20,30] %}{{ loop.index }}:{{ i }},{% endfor %}",
            &Context::new()
        )
        .unwrap(),
        "1:10,2:20,3:30,"
    );
}

#[test]
fn test_loop_first_last_length() {
    let out = render_template(
        "{% for x in 'abc' %}{% if loop.first %}[{% endif %}{{ x }}{% if loop.last %}]{{ loop.length }}{% endif %}{% endfor %}",
        &Context::new(),
    )
    .unwrap();
    assert_eq!(out, "[abc]3");
}

#[test]
fn test_nested_loops_with_conditions() {
    let mut c = Context::new();
    c.insert(
        "groups",
        vec![
            HashMap::from([
                ("name".to_string(), Value::from("web")),
                ("hosts".to_string(), Value::from(vec!["w1", "w2"])),
            ]),
            HashMap::from([
                ("name".to_string(), Value::from("db")),
                ("hosts".to_string(), Value::from(Vec::<Value>::new())),
            ]),
        ],
    );
    let template = "{% for g in groups %}{{ g.name }}:{% for h in g.hosts %}{{ h }}{% if not loop.last %},{% endif %}{% else %}{% endfor %};{% endfor %}";
    // `else` inside `for` is not a for-else; it is an unexpected tag.
    assert!(render_template(template, &c).is_err());

    let template = "{% for g in groups %}{{ g.name }}:{% if g.hosts %}{% for h in g.hosts %}{{ h }}{% if not loop.last %},{% endif %}{% endfor %}{% else %}-{% endif %};{% endfor %}";
    assert_eq!(render_template(template, &c).unwrap(), "web:w1,w2;db:-;");
}

#[test]
fn test_pair_unpacking_over_items() {
    let c = ctx(vec![(
        "env",
        HashMap::from([("b".to_string(), 2), ("a".to_string(), 1)]),
    )]);
    assert_eq!(
        render_template("{% for k, v in env.items() %}{{ k }}={{ v }} {% endfor %}", &c).unwrap(),
        "a=1 b=2 "
    );
}

#[test]
fn test_loop_over_sorted_keys() {
    let c = ctx(vec![(
        "m",
        HashMap::from([("z".to_string(), 1), ("y".to_string(), 2)]),
    )]);
    assert_eq!(
        render_template("{% for k in m.keys() %}{{ k }}{% endfor %}", &c).unwrap(),
        "yz"
    );
}

#[test]
fn test_empty_and_null_collections() {
    let c = ctx(vec![("empty", Value::List(Vec::new())), ("nothing", Value::Null)]);
    assert_eq!(
        render_template("a{% for x in empty %}x{% endfor %}{% for y in nothing %}y{% endfor %}b", &c)
            .unwrap(),
        "ab"
    );
}

#[test]
fn test_not_iterable() {
    let c = ctx(vec![("n", 5)]);
    let err = render_template("{% for x in n %}{% endfor %}", &c).unwrap_err();
    assert!(matches!(err.root_cause(), JinjaError::NotIterable(_)));
}

#[test]
fn test_unclosed_block_reports_kind() {
    let err = render_template("text {% for x in [1] %}{{ x }}", &Context::new()).unwrap_err();
    assert!(matches!(
        err.root_cause(),
        JinjaError::UnclosedBlock {
            kind: BlockKind::For,
            index: 1
        }
    ));
}

#[test]
fn test_malformed_tag_deferred_until_reached() {
    let template = "ok{% if outer %}{% if inner %}{% for %}{% endif %}{% endif %}";
    let c = ctx(vec![("outer", false), ("inner", true)]);
    assert_eq!(render_template(template, &c).unwrap(), "ok");

    let c = ctx(vec![("outer", true), ("inner", true)]);
    let err = render_template(template, &c).unwrap_err();
    assert!(matches!(err.root_cause(), JinjaError::MalformedControlTag(_)));
}

// ═════════════════════════════════════════════════════════════════════
// 4. Segmentation
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_quote_aware_tag_scanning() {
    assert_eq!(
        render_template("{{ \"a{{b\" }} world", &Context::new()).unwrap(),
        "a{{b world"
    );
}

#[test]
fn test_unclosed_tag_is_literal() {
    let c = ctx(vec![("b", "B")]);
    assert_eq!(render_template("a {{ oops {{ b }}", &c).unwrap(), "a {{ oops B");
    assert_eq!(render_template("50% {# not closed", &c).unwrap(), "50% {# not closed");
}

#[test]
fn test_comments_are_dropped() {
    assert_eq!(
        render_template("a{# {% if %} #}b", &Context::new()).unwrap(),
        "ab"
    );
}

// ═════════════════════════════════════════════════════════════════════
// 5. Filters, methods, functions
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_filter_pipeline() {
    let c = ctx(vec![("name", "  web server  ")]);
    assert_eq!(
        render_template("{{ name | trim | replace(' ', '-') | capitalize }}", &c).unwrap(),
        "Web-server"
    );
    let c = ctx(vec![("items", vec!["a", "b", "c"])]);
    assert_eq!(
        render_template("{{ items | join(', ') }} ({{ items | length }})", &c).unwrap(),
        "a, b, c (3)"
    );
}

#[test]
fn test_string_methods() {
    let c = ctx(vec![("path", "/etc/hosts")]);
    assert_eq!(
        evaluate_expression("path.split('/')[-1].upper()", &c).unwrap(),
        Value::from("HOSTS")
    );
    assert_eq!(
        evaluate_expression("path.startswith('/etc')", &c).unwrap(),
        Value::Bool(true)
    );
}

#[test]
fn test_dict_get_with_default() {
    let c = ctx(vec![("cfg", HashMap::from([("port".to_string(), 80)]))]);
    assert_eq!(
        render_template("{{ cfg.get('port') }}/{{ cfg.get('host', 'localhost') }}", &c).unwrap(),
        "80/localhost"
    );
}

#[test]
fn test_lookup_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "secret-value").unwrap();
    let c = ctx(vec![("path", file.path().to_string_lossy().into_owned())]);
    assert_eq!(
        render_template("{{ lookup('file', path) }}", &c).unwrap(),
        "secret-value"
    );
}

#[test]
fn test_lookup_missing_file_fails() {
    let err = render_template("{{ lookup('file', '/no/such/ajinja/file') }}", &Context::new())
        .unwrap_err();
    assert!(matches!(err.root_cause(), JinjaError::CallError { .. }));
}

// ═════════════════════════════════════════════════════════════════════
// 6. Native objects and engine configuration
// ═════════════════════════════════════════════════════════════════════

#[derive(Debug)]
struct Host {
    name: String,
    port: i64,
}

impl NativeObject for Host {
    fn type_name(&self) -> &str {
        "Host"
    }

    fn get_attribute(&self, name: &str) -> Option<Value> {
        match name {
            "Name" => Some(Value::from(self.name.clone())),
            "Port" => Some(Value::Int(self.port)),
            _ => None,
        }
    }

    fn attribute_names(&self) -> Vec<String> {
        vec!["Name".to_string(), "Port".to_string()]
    }
}

#[test]
fn test_native_object_attributes() {
    let host = Value::Object(Arc::new(Host {
        name: "alpha".into(),
        port: 22,
    }));
    let c = ctx(vec![("host", host)]);
    assert_eq!(
        render_template("{{ host.name }}:{{ host.Port }}", &c).unwrap(),
        "alpha:22"
    );
    let err = evaluate_expression("host.missing", &c).unwrap_err();
    assert!(matches!(err, JinjaError::AttributeNotFound(_)));
}

#[test]
fn test_settings_globals() {
    let mut settings = EngineSettings::default();
    settings
        .globals
        .insert("env_name".into(), serde_json::json!("prod"));
    let engine = Engine::from_settings(settings).with_global("region", "eu");
    assert_eq!(
        engine
            .render_template("{{ env_name }}-{{ region }}", &Context::new())
            .unwrap(),
        "prod-eu"
    );
}

#[test]
fn test_from_serialize_context() {
    #[derive(serde::Serialize)]
    struct Release {
        version: String,
        tags: Vec<String>,
    }

    let release = Release {
        version: "1.2.0".into(),
        tags: vec!["stable".into(), "lts".into()],
    };
    let mut c = Context::new();
    c.insert("release", Value::from_serialize(&release).unwrap());
    assert_eq!(
        render_template("v{{ release.version }} {{ release.tags | join('/') }}", &c).unwrap(),
        "v1.2.0 stable/lts"
    );
}

#[test]
fn test_error_names_the_failing_tag() {
    let c = ctx(vec![("n", 1)]);
    let err = render_template("{% if n %}{{ n / 0 }}{% endif %}", &c).unwrap_err();
    assert!(err.to_string().contains("{{ n / 0 }}"));
    assert!(matches!(err.root_cause(), JinjaError::DivisionByZero(_)));
}

#[test]
fn test_idempotent_rendering() {
    let c = ctx(vec![("xs", vec![3, 1, 2])]);
    let template = "{% for x in xs %}{{ x * loop.index }} {% endfor %}";
    let first = render_template(template, &c).unwrap();
    let second = render_template(template, &c).unwrap();
    assert_eq!(first, "3 2 6 ");
    assert_eq!(first, second);
}
