//! Engine settings.
//!
//! [`EngineSettings`] holds everything a host can configure about an engine
//! instance. Settings are plain data; they are read once when an engine is
//! built and never consulted through global state.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Default bound on block nesting during a single render.
pub const DEFAULT_MAX_RENDER_DEPTH: usize = 256;

/// Configuration for a template engine instance.
///
/// All fields have sensible defaults, so a partial TOML or JSON document is
/// enough to override a handful of them (see
/// [`settings_loader`](crate::settings_loader)).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineSettings {
    /// Enables human-readable log output.
    pub debug: bool,
    /// The tracing filter directive, e.g. `"info"` or `"ajinja_rs_template=trace"`.
    pub log_level: String,
    /// Whether parsed templates are memoized by their source text.
    pub cache_templates: bool,
    /// Maximum `if`/`for` nesting depth before a render is aborted.
    /// `None` disables the bound.
    pub max_render_depth: Option<usize>,
    /// When set, an undefined variable inside `{{ }}` fails the render instead
    /// of rendering as an empty string.
    pub strict_undefined: bool,
    /// Values available to every render and evaluation. Entries in the
    /// per-call context shadow these.
    pub globals: HashMap<String, serde_json::Value>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            debug: false,
            log_level: "info".to_string(),
            cache_templates: true,
            max_render_depth: Some(DEFAULT_MAX_RENDER_DEPTH),
            strict_undefined: false,
            globals: HashMap::new(),
        }
    }
}
