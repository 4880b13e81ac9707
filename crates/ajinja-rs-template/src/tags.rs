//! Control tag classification.
//!
//! The interior of every `{% ... %}` tag is classified into a
//! [`ControlTagKind`] when the template is segmented. Malformed tags do not
//! fail segmentation: they become [`ControlTagKind::Unknown`] carrying a
//! diagnostic, and the error surfaces only if the renderer reaches them.
//!
//! ## Supported Tags
//!
//! | Tag | Arguments |
//! |---|---|
//! | `{% if cond %}` | a condition pipeline |
//! | `{% elif cond %}` | a condition pipeline |
//! | `{% else %}` | none |
//! | `{% endif %}` | none |
//! | `{% for x in expr %}` | a loop target and a collection pipeline |
//! | `{% for k, v in expr %}` | unpacks map entries or 2-item lists |
//! | `{% endfor %}` | none |
//!
//! Keywords are case-insensitive.
//!
//! ## The `loop` Context Variable
//!
//! | Variable | Description |
//! |---|---|
//! | `loop.index` | 1-indexed iteration count |
//! | `loop.index0` | 0-indexed iteration count |
//! | `loop.revindex` | Reverse count from length |
//! | `loop.revindex0` | Reverse count from length-1 |
//! | `loop.first` | `true` on first iteration |
//! | `loop.last` | `true` on last iteration |
//! | `loop.length` | Number of items |

use std::fmt;
use std::sync::OnceLock;

use ajinja_rs_core::error::{JinjaError, JinjaResult};
use regex::Regex;

/// The kind of a control tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlTagKind {
    If,
    ElseIf,
    Else,
    EndIf,
    For,
    EndFor,
    /// An unrecognized or malformed tag.
    Unknown,
}

impl ControlTagKind {
    /// The tag keyword.
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::If => "if",
            Self::ElseIf => "elif",
            Self::Else => "else",
            Self::EndIf => "endif",
            Self::For => "for",
            Self::EndFor => "endfor",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ControlTagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// A classified `{% ... %}` tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlTag {
    pub kind: ControlTagKind,
    /// The condition for `if`/`elif`, the loop clause for `for`, empty for
    /// the argument-less tags, and a diagnostic for `Unknown`.
    pub expression: String,
    /// The trimmed tag interior as written.
    pub content: String,
}

impl ControlTag {
    /// The tag as it appeared in the template, for error locations.
    pub fn source(&self) -> String {
        format!("{{% {} %}}", self.content)
    }

    fn unknown(content: &str, message: impl fmt::Display) -> Self {
        Self {
            kind: ControlTagKind::Unknown,
            expression: format!("Error parsing tag '{content}': {message}"),
            content: content.to_string(),
        }
    }
}

/// Classifies the trimmed interior of a control tag.
pub fn parse_control_tag(content: &str) -> ControlTag {
    let content = content.trim();
    let (keyword, rest) = content
        .split_once(char::is_whitespace)
        .map_or((content, ""), |(k, r)| (k, r.trim()));

    let kind = match keyword.to_lowercase().as_str() {
        "" => return ControlTag::unknown(content, "empty control tag"),
        "if" => ControlTagKind::If,
        "elif" => ControlTagKind::ElseIf,
        "else" => ControlTagKind::Else,
        "endif" => ControlTagKind::EndIf,
        "for" => ControlTagKind::For,
        "endfor" => ControlTagKind::EndFor,
        _ => {
            return ControlTag {
                kind: ControlTagKind::Unknown,
                expression: content.to_string(),
                content: content.to_string(),
            }
        }
    };

    match kind {
        ControlTagKind::If | ControlTagKind::ElseIf if rest.is_empty() => {
            return ControlTag::unknown(content, format!("{kind} tag requires a condition"));
        }
        ControlTagKind::Else | ControlTagKind::EndIf | ControlTagKind::EndFor
            if !rest.is_empty() =>
        {
            return ControlTag::unknown(content, format!("{kind} tag does not take any arguments"));
        }
        ControlTagKind::For => {
            if let Err(err) = ForSpec::parse(rest) {
                return ControlTag::unknown(content, err);
            }
        }
        _ => {}
    }

    ControlTag {
        kind,
        expression: rest.to_string(),
        content: content.to_string(),
    }
}

/// The variable(s) a `for` loop binds on each iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopTarget {
    /// `for item in ...`
    Single(String),
    /// `for key, value in ...`
    Pair(String, String),
}

/// A parsed `for` clause: `<target> in <collection>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForSpec {
    pub target: LoopTarget,
    /// The collection pipeline source.
    pub collection: String,
}

fn for_clause_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)^([A-Za-z_]\w*)(?:\s*,\s*([A-Za-z_]\w*))?\s+(?i:in)\s+(.+)$")
            .expect("valid regex")
    })
}

impl ForSpec {
    /// Parses `x in expr` or `k, v in expr`.
    ///
    /// # Errors
    ///
    /// Returns [`JinjaError::MalformedControlTag`] if the clause has no
    /// `in`, an invalid target, or an empty collection.
    pub fn parse(clause: &str) -> JinjaResult<Self> {
        let caps = for_clause_regex().captures(clause.trim()).ok_or_else(|| {
            JinjaError::MalformedControlTag(format!(
                "for tag requires 'item in collection' or 'key, value in collection', got '{clause}'"
            ))
        })?;

        let first = caps[1].to_string();
        let target = match caps.get(2) {
            Some(second) => LoopTarget::Pair(first, second.as_str().to_string()),
            None => LoopTarget::Single(first),
        };
        let collection = caps[3].trim().to_string();
        if collection.is_empty() {
            return Err(JinjaError::MalformedControlTag(
                "for tag requires a collection".to_string(),
            ));
        }
        Ok(Self { target, collection })
    }
}
