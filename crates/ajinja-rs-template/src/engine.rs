//! Template engine: parsing, caching, rendering, and expression evaluation.
//!
//! The [`Engine`] struct is the central entry point. It owns the filter and
//! function registries, an optional parsed-template cache, and the values in
//! [`EngineSettings::globals`]. An engine is immutable once built and can be
//! shared between threads.

use std::collections::HashMap;
use std::sync::Arc;

use ajinja_rs_core::error::JinjaResult;
use ajinja_rs_core::logging::render_span;
use ajinja_rs_core::settings::EngineSettings;
use tracing::debug;

use crate::cache::TemplateCache;
use crate::context::Context;
use crate::eval::Evaluator;
use crate::filters::{Filter, FilterRegistry};
use crate::functions::FunctionRegistry;
use crate::parser::parse_pipeline;
use crate::render::Renderer;
use crate::segmenter::{self, TemplateNode};
use crate::value::Value;

/// The template engine.
///
/// # Examples
///
/// ```
/// use ajinja_rs_template::context::Context;
/// use ajinja_rs_template::engine::Engine;
///
/// let engine = Engine::new();
/// let ctx: Context = [("name", "World")].into_iter().collect();
///
/// let result = engine.render_template("Hello {{ name | upper }}!", &ctx).unwrap();
/// assert_eq!(result, "Hello WORLD!");
/// ```
#[derive(Debug)]
pub struct Engine {
    filters: FilterRegistry,
    functions: FunctionRegistry,
    cache: Option<TemplateCache>,
    globals: Arc<HashMap<String, Value>>,
    settings: EngineSettings,
}

impl Engine {
    /// Creates an engine with the builtin filters and functions and default settings.
    pub fn new() -> Self {
        Self::from_settings(EngineSettings::default())
    }

    /// Creates an engine with the builtin filters and functions.
    pub fn from_settings(settings: EngineSettings) -> Self {
        Self::with_registries(
            FilterRegistry::with_builtins(),
            FunctionRegistry::with_builtins(),
            settings,
        )
    }

    /// Creates an engine with no filters or functions registered.
    pub fn empty() -> Self {
        Self::with_registries(
            FilterRegistry::new(),
            FunctionRegistry::new(),
            EngineSettings::default(),
        )
    }

    /// Creates an engine from explicit registries.
    pub fn with_registries(
        filters: FilterRegistry,
        functions: FunctionRegistry,
        settings: EngineSettings,
    ) -> Self {
        let cache = settings.cache_templates.then(TemplateCache::new);
        let globals: HashMap<String, Value> = settings
            .globals
            .iter()
            .map(|(k, v)| (k.clone(), Value::from(v.clone())))
            .collect();
        Self {
            filters,
            functions,
            cache,
            globals: Arc::new(globals),
            settings,
        }
    }

    /// Adds or replaces a filter.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Filter + 'static) -> Self {
        self.filters.register(filter);
        self
    }

    /// Adds or replaces a free function.
    #[must_use]
    pub fn with_function<F>(mut self, name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&[Value]) -> JinjaResult<Value> + Send + Sync + 'static,
    {
        self.functions.register(name, func);
        self
    }

    /// Adds or replaces a method on values of the given type tag.
    #[must_use]
    pub fn with_method<F>(mut self, type_tag: impl Into<String>, name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&[Value]) -> JinjaResult<Value> + Send + Sync + 'static,
    {
        self.functions.register_method(type_tag, name, func);
        self
    }

    /// Adds a value visible to every render and evaluation.
    #[must_use]
    pub fn with_global(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        Arc::make_mut(&mut self.globals).insert(name.into(), value.into());
        self
    }

    pub const fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub const fn filters(&self) -> &FilterRegistry {
        &self.filters
    }

    pub const fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    /// The parsed-template cache, if caching is enabled.
    pub const fn cache(&self) -> Option<&TemplateCache> {
        self.cache.as_ref()
    }

    /// Segments a template, going through the cache when it is enabled.
    pub fn parse(&self, template: &str) -> Arc<[TemplateNode]> {
        match &self.cache {
            Some(cache) => cache.get_or_parse(template),
            None => segmenter::parse(template).into(),
        }
    }

    /// Renders a template string against `context`.
    ///
    /// Undefined variables in `{{ }}` render as empty unless
    /// `strict_undefined` is set; in `if` conditions and loop collections
    /// they are always an error.
    ///
    /// # Errors
    ///
    /// Returns the first failure, wrapped with the tag that raised it.
    pub fn render_template(&self, template: &str, context: &Context) -> JinjaResult<String> {
        let span = render_span("render", template.len());
        let _guard = span.enter();

        let nodes = self.parse(template);
        debug!(nodes = nodes.len(), "rendering template");
        self.render_nodes(&nodes, context).map_err(|err| {
            debug!(error = %err, "render failed");
            err
        })
    }

    /// Renders already-segmented nodes against `context`.
    pub fn render_nodes(&self, nodes: &[TemplateNode], context: &Context) -> JinjaResult<String> {
        let context = self.scoped(context);
        Renderer::new(&self.filters, &self.functions)
            .with_max_depth(self.settings.max_render_depth)
            .with_strict_undefined(self.settings.strict_undefined)
            .render(nodes, &context)
    }

    /// Evaluates a bare expression, filters included.
    ///
    /// Unlike rendering, an undefined base variable is always an error here
    /// unless a filter such as `default` resolves it.
    ///
    /// # Examples
    ///
    /// ```
    /// use ajinja_rs_template::context::Context;
    /// use ajinja_rs_template::engine::Engine;
    /// use ajinja_rs_template::value::Value;
    ///
    /// let engine = Engine::new();
    /// let value = engine.evaluate_expression("2 ** 3 * 2 + 3", &Context::new()).unwrap();
    /// assert_eq!(value, Value::Int(19));
    /// ```
    pub fn evaluate_expression(&self, expr: &str, context: &Context) -> JinjaResult<Value> {
        let span = render_span("evaluate", expr.len());
        let _guard = span.enter();

        let context = self.scoped(context);
        let result = parse_pipeline(expr).and_then(|pipeline| {
            Evaluator::new(&context, &self.functions, &self.filters).eval_pipeline_strict(&pipeline)
        });
        result.map_err(|err| {
            debug!(error = %err, "evaluation failed");
            err
        })
    }

    /// Layers the engine globals underneath the caller's context.
    fn scoped(&self, context: &Context) -> Context {
        context.with_fallback(Arc::clone(&self.globals))
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
