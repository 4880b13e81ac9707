//! # ajinja-rs-core
//!
//! Error types, engine settings, and logging setup shared by the ajinja-rs
//! crates. This crate contains no engine logic.
//!
//! ## Modules
//!
//! - [`error`] - Error types and result aliases
//! - [`settings`] - Engine configuration
//! - [`settings_loader`] - Loading settings from TOML, JSON, and the environment
//! - [`logging`] - Tracing-based logging integration

pub mod error;
pub mod logging;
pub mod settings;
pub mod settings_loader;

// Re-export the most commonly used types at the crate root.
pub use error::{BlockKind, JinjaError, JinjaResult};
pub use settings::EngineSettings;
