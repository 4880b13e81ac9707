//! Core error types for the ajinja-rs engine.
//!
//! This module provides the error enum [`JinjaError`] shared by every stage of
//! the pipeline: expression lexing and parsing, evaluation, template
//! segmentation, control-flow rendering, and configuration loading.

use std::fmt;

use thiserror::Error;

/// The tag family an [`JinjaError::UnclosedBlock`] error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    /// An `{% if %}` / `{% elif %}` / `{% else %}` structure.
    If,
    /// A `{% for %}` loop.
    For,
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::If => f.write_str("if"),
            Self::For => f.write_str("for"),
        }
    }
}

/// The primary error type for the ajinja-rs engine.
///
/// Every failure surfaces to the immediate caller. The only designed recovery
/// path, the undefined-variable rescue for top-level `{{ }}` expressions, is
/// implemented by the renderer on top of [`JinjaError::UndefinedVariable`] and
/// [`JinjaError::AttributeNotFound`].
#[derive(Error, Debug)]
pub enum JinjaError {
    // ── Expression lexing / parsing ──────────────────────────────────

    /// The expression lexer hit an unterminated string or an unexpected character.
    #[error("Lex error at position {position}: {message}")]
    LexError {
        /// Human-readable description of the problem.
        message: String,
        /// Byte offset into the expression source.
        position: usize,
    },

    /// The expression parser found a token it could not use.
    #[error("Syntax error: {0}")]
    SyntaxError(String),

    // ── Evaluation ───────────────────────────────────────────────────

    /// An identifier had no binding in the context or the function registry.
    #[error("Undefined variable: '{0}'")]
    UndefinedVariable(String),

    /// An operator or builtin was applied to operands of the wrong type.
    #[error("Type error: {0}")]
    TypeError(String),

    /// A subscript was out of range or used an unsupported key.
    #[error("Index error: {0}")]
    IndexError(String),

    /// An attribute or map key was missing.
    #[error("Attribute not found: {0}")]
    AttributeNotFound(String),

    /// Division or modulo by zero.
    #[error("Division by zero: {0}")]
    DivisionByZero(String),

    /// A call was attempted on a value that is not callable.
    #[error("Not callable: {0}")]
    NotCallable(String),

    /// A `for` loop was given something that cannot be iterated.
    #[error("Not iterable: {0}")]
    NotIterable(String),

    // ── Control flow ─────────────────────────────────────────────────

    /// An `if` or `for` block had no matching closer before the end of input.
    #[error("Unclosed {kind} block starting at node {index}")]
    UnclosedBlock {
        /// The tag family that was left open.
        kind: BlockKind,
        /// Index of the opening tag within the node sequence being resolved.
        index: usize,
    },

    /// A control tag was malformed, unknown, or appeared where it is not allowed.
    #[error("Malformed control tag: {0}")]
    MalformedControlTag(String),

    // ── Filters and functions ────────────────────────────────────────

    /// A filter name did not resolve through the filter registry.
    #[error("Unknown filter: '{0}'")]
    UnknownFilter(String),

    /// A filter or function rejected its input or arguments.
    #[error("Error in '{name}': {message}")]
    CallError {
        /// The filter or function name.
        name: String,
        /// What went wrong.
        message: String,
    },

    /// The render exceeded the configured block nesting bound.
    #[error("Maximum render depth of {0} exceeded")]
    RecursionLimit(usize),

    // ── Configuration ────────────────────────────────────────────────

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    // ── IO ───────────────────────────────────────────────────────────

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    // ── Location ─────────────────────────────────────────────────────

    /// Wraps an inner failure with the tag or expression it came from.
    #[error("{source} (in {location})")]
    InTag {
        /// The tag text, e.g. `{{ user.name }}` or `{% for x in items %}`.
        location: String,
        /// The underlying failure.
        source: Box<JinjaError>,
    },
}

impl JinjaError {
    /// Wraps `self` with the location of the tag that produced it.
    #[must_use]
    pub fn in_tag(self, location: impl Into<String>) -> Self {
        Self::InTag {
            location: location.into(),
            source: Box::new(self),
        }
    }

    /// Returns the innermost error, skipping any [`JinjaError::InTag`] wrappers.
    pub fn root_cause(&self) -> &Self {
        let mut current = self;
        while let Self::InTag { source, .. } = current {
            current = source;
        }
        current
    }

    /// Returns `true` if the root cause is a failed lookup (an undefined
    /// variable or a missing attribute/key).
    pub fn is_undefined(&self) -> bool {
        matches!(
            self.root_cause(),
            Self::UndefinedVariable(_) | Self::AttributeNotFound(_)
        )
    }

    /// Convenience constructor for [`JinjaError::CallError`].
    pub fn call(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CallError {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// A convenience type alias for `Result<T, JinjaError>`.
pub type JinjaResult<T> = Result<T, JinjaError>;
