//! Control-flow rendering of segmented templates.
//!
//! The [`Renderer`] walks a flat [`TemplateNode`] slice, resolving `if` and
//! `for` blocks with [`crate::blocks`] and re-entering itself for every block
//! body, so nested structures go through the same code path.

use std::collections::HashMap;

use ajinja_rs_core::error::{JinjaError, JinjaResult};
use tracing::trace;

use crate::blocks::{resolve_for, resolve_if};
use crate::context::{Context, LoopContext};
use crate::eval::{Evaluator, Resolved};
use crate::filters::FilterRegistry;
use crate::functions::FunctionRegistry;
use crate::parser::parse_pipeline;
use crate::segmenter::TemplateNode;
use crate::tags::{ControlTag, ControlTagKind, ForSpec, LoopTarget};
use crate::value::Value;

/// Renders node sequences against a context.
#[derive(Debug, Clone, Copy)]
pub struct Renderer<'a> {
    filters: &'a FilterRegistry,
    functions: &'a FunctionRegistry,
    max_depth: Option<usize>,
    strict_undefined: bool,
}

impl<'a> Renderer<'a> {
    /// Creates a renderer with no depth bound and lenient undefined handling.
    pub const fn new(filters: &'a FilterRegistry, functions: &'a FunctionRegistry) -> Self {
        Self {
            filters,
            functions,
            max_depth: None,
            strict_undefined: false,
        }
    }

    /// Bounds block nesting; deeper renders fail with [`JinjaError::RecursionLimit`].
    #[must_use]
    pub const fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// When set, an undefined variable in `{{ }}` fails the render instead of
    /// rendering as the empty string.
    #[must_use]
    pub const fn with_strict_undefined(mut self, strict: bool) -> Self {
        self.strict_undefined = strict;
        self
    }

    /// Renders `nodes` to a string.
    ///
    /// # Errors
    ///
    /// Returns the first failure, wrapped with the tag it came from. No
    /// partial output is returned.
    pub fn render(&self, nodes: &[TemplateNode], context: &Context) -> JinjaResult<String> {
        let mut out = String::new();
        self.render_into(nodes, context, 0, &mut out)?;
        Ok(out)
    }

    fn evaluator<'c>(&self, context: &'c Context) -> Evaluator<'c>
    where
        'a: 'c,
    {
        Evaluator::new(context, self.functions, self.filters)
    }

    fn render_into(
        &self,
        nodes: &[TemplateNode],
        context: &Context,
        depth: usize,
        out: &mut String,
    ) -> JinjaResult<()> {
        if let Some(max) = self.max_depth {
            if depth > max {
                return Err(JinjaError::RecursionLimit(max));
            }
        }

        let mut index = 0;
        while index < nodes.len() {
            match &nodes[index] {
                TemplateNode::Text(text) => out.push_str(text),
                TemplateNode::Comment(_) => {}
                TemplateNode::Expression(raw) => {
                    self.render_expression(raw, context, out)
                        .map_err(|err| err.in_tag(format!("{{{{ {raw} }}}}")))?;
                }
                TemplateNode::ControlTag(tag) => {
                    index = match tag.kind {
                        ControlTagKind::If => self.render_if(nodes, index, context, depth, out)?,
                        ControlTagKind::For => self.render_for(nodes, index, tag, context, depth, out)?,
                        ControlTagKind::Unknown => {
                            return Err(JinjaError::MalformedControlTag(tag.expression.clone())
                                .in_tag(tag.source()));
                        }
                        kind => {
                            return Err(JinjaError::MalformedControlTag(format!(
                                "unexpected '{kind}' without a matching opening tag"
                            ))
                            .in_tag(tag.source()));
                        }
                    };
                    continue;
                }
            }
            index += 1;
        }
        Ok(())
    }

    fn render_expression(&self, raw: &str, context: &Context, out: &mut String) -> JinjaResult<()> {
        let pipeline = parse_pipeline(raw)?;
        match self.evaluator(context).eval_pipeline(&pipeline)? {
            Resolved::Defined(value) | Resolved::Rescued(value) => {
                out.push_str(&value.to_display_string());
            }
            Resolved::Undefined(err) if self.strict_undefined => return Err(err),
            Resolved::Undefined(err) => trace!(error = %err, "undefined expression rendered empty"),
        }
        Ok(())
    }

    /// Evaluates a condition or collection pipeline. Undefined is an error here.
    fn eval_clause(&self, source: &str, context: &Context) -> JinjaResult<Value> {
        let pipeline = parse_pipeline(source)?;
        self.evaluator(context).eval_pipeline_strict(&pipeline)
    }

    /// Renders the `if` structure at `start`; returns the index after its `endif`.
    fn render_if(
        &self,
        nodes: &[TemplateNode],
        start: usize,
        context: &Context,
        depth: usize,
        out: &mut String,
    ) -> JinjaResult<usize> {
        let chain = resolve_if(nodes, start).map_err(|err| match &nodes[start] {
            TemplateNode::ControlTag(tag) => err.in_tag(tag.source()),
            _ => err,
        })?;

        for branch in &chain.branches {
            let TemplateNode::ControlTag(tag) = &nodes[branch.tag] else {
                continue;
            };
            let taken = match tag.kind {
                ControlTagKind::Else => true,
                _ => self
                    .eval_clause(&tag.expression, context)
                    .map_err(|err| err.in_tag(tag.source()))?
                    .is_truthy(),
            };
            if taken {
                self.render_into(&nodes[branch.body.clone()], context, depth + 1, out)?;
                break;
            }
        }
        Ok(chain.end + 1)
    }

    /// Renders the `for` loop at `start`; returns the index after its `endfor`.
    fn render_for(
        &self,
        nodes: &[TemplateNode],
        start: usize,
        tag: &ControlTag,
        context: &Context,
        depth: usize,
        out: &mut String,
    ) -> JinjaResult<usize> {
        let in_tag = |err: JinjaError| err.in_tag(tag.source());

        let span = resolve_for(nodes, start).map_err(in_tag)?;
        let spec = ForSpec::parse(&tag.expression).map_err(in_tag)?;
        let collection = self
            .eval_clause(&spec.collection, context)
            .map_err(in_tag)?;
        let iterations = bind_iterations(&spec.target, collection).map_err(in_tag)?;

        trace!(loop_target = ?spec.target, iterations = iterations.len(), "for loop");

        let body = &nodes[span.body()];
        let length = iterations.len();
        for (index0, bindings) in iterations.into_iter().enumerate() {
            let mut scope = HashMap::with_capacity(bindings.len() + 1);
            scope.insert("loop".to_string(), LoopContext::new(index0, length).to_value());
            scope.extend(bindings);
            let iteration = context.child(scope);
            self.render_into(body, &iteration, depth + 1, out)?;
        }
        Ok(span.end + 1)
    }
}

/// Turns a loop collection into per-iteration variable bindings.
fn bind_iterations(target: &LoopTarget, collection: Value) -> JinjaResult<Vec<Vec<(String, Value)>>> {
    match (target, collection) {
        (_, Value::Null) => Ok(Vec::new()),
        (LoopTarget::Single(name), Value::List(items)) => Ok(items
            .into_iter()
            .map(|item| vec![(name.clone(), item)])
            .collect()),
        (LoopTarget::Single(name), Value::String(s)) => Ok(s
            .chars()
            .map(|c| vec![(name.clone(), Value::from(c))])
            .collect()),
        (LoopTarget::Single(name), Value::Map(map)) => Ok(map
            .into_values()
            .map(|value| vec![(name.clone(), value)])
            .collect()),
        (LoopTarget::Pair(key, value), Value::Map(map)) => Ok(map
            .into_iter()
            .map(|(k, v)| vec![(key.clone(), Value::String(k)), (value.clone(), v)])
            .collect()),
        (LoopTarget::Pair(key, value), Value::List(items)) => items
            .into_iter()
            .enumerate()
            .map(|(position, item)| match item {
                Value::List(pair) if pair.len() == 2 => {
                    let mut pair = pair.into_iter();
                    let first = pair.next().unwrap_or_default();
                    let second = pair.next().unwrap_or_default();
                    Ok(vec![(key.clone(), first), (value.clone(), second)])
                }
                other => Err(JinjaError::TypeError(format!(
                    "cannot unpack '{}' at position {position} into 2 loop variables",
                    other.type_name()
                ))),
            })
            .collect(),
        (LoopTarget::Pair(..), Value::String(_)) => Err(JinjaError::TypeError(
            "cannot unpack string characters into 2 loop variables".to_string(),
        )),
        (_, other) => Err(JinjaError::NotIterable(format!(
            "'{}' object is not iterable",
            other.type_name()
        ))),
    }
}
