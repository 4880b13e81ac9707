//! # ajinja-rs-template
//!
//! The template and expression engine for ajinja-rs. A template is split
//! into a flat node sequence by the [`segmenter`], and the [`render`] module
//! walks that sequence, resolving `if`/`for` blocks and evaluating every
//! `{{ expression }}` through the [`lexer`], [`parser`], and [`eval`]
//! modules.
//!
//! ## Modules
//!
//! - [`value`] - The dynamic [`Value`] model and the native object seam
//! - [`context`] - Layered variable scopes and loop metadata
//! - [`lexer`] / [`parser`] - Expression tokens and the expression AST
//! - [`eval`] / [`operators`] - Expression evaluation
//! - [`filters`] / [`functions`] - Injected filter, function, and method registries
//! - [`segmenter`] / [`tags`] / [`blocks`] - Template structure
//! - [`render`] - Control-flow rendering
//! - [`cache`] / [`engine`] - The [`Engine`] entry point
//!
//! ## Example
//!
//! ```
//! use ajinja_rs_template::{render_template, Context};
//!
//! let ctx: Context = [("items", vec!["a", "b"])].into_iter().collect();
//! let out = render_template("{% for i in items %}{{ loop.index }}={{ i }} {% endfor %}", &ctx).unwrap();
//! assert_eq!(out, "1=a 2=b ");
//! ```

use std::sync::OnceLock;

use ajinja_rs_core::error::JinjaResult;

pub mod blocks;
pub mod cache;
pub mod context;
pub mod engine;
pub mod eval;
pub mod filters;
pub mod functions;
pub mod lexer;
pub mod operators;
pub mod parser;
pub mod render;
pub mod segmenter;
pub mod tags;
pub mod value;

pub use cache::TemplateCache;
pub use context::{Context, LoopContext};
pub use engine::Engine;
pub use filters::{Filter, FilterRegistry};
pub use functions::FunctionRegistry;
pub use segmenter::TemplateNode;
pub use value::{Function, NativeObject, Value};

fn default_engine() -> &'static Engine {
    static ENGINE: OnceLock<Engine> = OnceLock::new();
    ENGINE.get_or_init(Engine::new)
}

/// Renders `template` with the builtin filters and functions.
///
/// See [`Engine::render_template`].
pub fn render_template(template: &str, context: &Context) -> JinjaResult<String> {
    default_engine().render_template(template, context)
}

/// Evaluates a bare expression with the builtin filters and functions.
///
/// See [`Engine::evaluate_expression`].
pub fn evaluate_expression(expr: &str, context: &Context) -> JinjaResult<Value> {
    default_engine().evaluate_expression(expr, context)
}
