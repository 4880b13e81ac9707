//! Logging integration for ajinja-rs.
//!
//! Provides helpers for configuring [`tracing`]-based logging from
//! [`EngineSettings`](crate::settings::EngineSettings) and for creating
//! per-render spans.

use crate::settings::EngineSettings;

/// Sets up the global tracing subscriber based on the given settings.
///
/// The filter is read from `settings.log_level` (e.g. "debug", "info",
/// "`ajinja_rs_template=trace`"). In debug mode a pretty, human-readable format is
/// used; otherwise a structured JSON format is used. Calling this when a
/// subscriber is already installed does nothing.
pub fn setup_logging(settings: &EngineSettings) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if settings.debug {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .pretty()
            .try_init()
            .ok();
    } else {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .try_init()
            .ok();
    }
}

/// Creates a tracing span for one render or evaluation call.
///
/// `operation` names the entry point (`"render"` or `"evaluate"`), and
/// `source_len` is the length of the template or expression text.
///
/// # Examples
///
/// ```
/// use ajinja_rs_core::logging::render_span;
///
/// let span = render_span("render", 42);
/// let _guard = span.enter();
/// tracing::debug!("rendering");
/// ```
pub fn render_span(operation: &'static str, source_len: usize) -> tracing::Span {
    tracing::info_span!("ajinja", op = operation, len = source_len)
}
