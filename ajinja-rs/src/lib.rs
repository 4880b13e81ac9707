//! # ajinja-rs
//!
//! A Python-flavored template and expression engine for rendering text from
//! structured data: `{{ expressions | filters }}`, `{% if %}`/`{% for %}`
//! control flow, and `{# comments #}`.
//!
//! This is the meta-crate that re-exports the sub-crates for convenient
//! access. You can depend on `ajinja-rs` to get everything, or depend on
//! individual crates for finer-grained control.
//!
//! ```
//! use ajinja_rs::{render_template, Context};
//!
//! let ctx: Context = [("user", "ada")].into_iter().collect();
//! let out = render_template("{% if user %}hi {{ user | capitalize }}{% endif %}", &ctx).unwrap();
//! assert_eq!(out, "hi Ada");
//! ```

/// Error types, settings, and logging setup.
pub use ajinja_rs_core as core;

/// The template segmenter, expression engine, and renderer.
#[cfg(feature = "template")]
pub use ajinja_rs_template as template;

pub use ajinja_rs_core::{EngineSettings, JinjaError, JinjaResult};

#[cfg(feature = "template")]
pub use ajinja_rs_template::{
    evaluate_expression, render_template, Context, Engine, Filter, FilterRegistry,
    FunctionRegistry, NativeObject, Value,
};

/// Re-exports of third-party crates used in the public API.
pub use serde;
pub use serde_json;
pub use tracing;
pub use tracing_subscriber;

/// Convenience re-exports for `use ajinja_rs::prelude::*`.
pub mod prelude {
    pub use ajinja_rs_core::error::{JinjaError, JinjaResult};
    pub use ajinja_rs_core::logging::setup_logging;
    pub use ajinja_rs_core::settings::EngineSettings;
    pub use ajinja_rs_core::settings_loader::{from_json_file, from_toml_file};

    #[cfg(feature = "template")]
    pub use ajinja_rs_template::{Context, Engine, Value};
}
