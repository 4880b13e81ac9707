//! Template segmenter.
//!
//! Splits raw template source into a flat sequence of [`TemplateNode`]s:
//! literal text, `{{ expressions }}`, `{# comments #}`, and `{% control %}`
//! tags. Segmentation never fails. A tag with no matching close is emitted
//! as literal text, and a malformed control tag becomes
//! [`ControlTagKind::Unknown`](crate::tags::ControlTagKind::Unknown).
//!
//! [`Segmenter`] is an iterator, so a template can be consumed node by node.

use crate::tags::{parse_control_tag, ControlTag};

/// One segment of a parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateNode {
    /// Literal text, emitted as-is.
    Text(String),
    /// The trimmed interior of `{{ ... }}`.
    Expression(String),
    /// The interior of `{# ... #}`.
    Comment(String),
    /// A classified `{% ... %}` tag.
    ControlTag(ControlTag),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Expression, // {{
    Control,    // {%
    Comment,    // {#
}

impl Marker {
    fn at(s: &str) -> Option<Self> {
        if s.starts_with("{{") {
            Some(Self::Expression)
        } else if s.starts_with("{%") {
            Some(Self::Control)
        } else if s.starts_with("{#") {
            Some(Self::Comment)
        } else {
            None
        }
    }
}

/// Finds the next tag opener at or after `from`.
fn next_marker(source: &str, from: usize) -> Option<usize> {
    ["{{", "{%", "{#"]
        .iter()
        .filter_map(|opener| source[from..].find(opener))
        .min()
        .map(|offset| from + offset)
}

/// Returns the index just past the closing quote of a string literal whose
/// contents start at `start`. A quote preceded by an odd number of
/// backslashes is escaped.
fn skip_string(bytes: &[u8], start: usize, quote: u8) -> Option<usize> {
    (start..bytes.len()).find_map(|i| {
        if bytes[i] != quote {
            return None;
        }
        let backslashes = bytes[start..i]
            .iter()
            .rev()
            .take_while(|&&b| b == b'\\')
            .count();
        (backslashes % 2 == 0).then_some(i + 1)
    })
}

/// Finds the closer matching an opener whose interior starts at `start`,
/// counting nested `open`/`close` pairs and skipping quoted strings.
fn find_close(bytes: &[u8], start: usize, open: &[u8; 2], close: &[u8; 2]) -> Option<usize> {
    let mut level = 1usize;
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'\'' | b'"') => {
                i = skip_string(bytes, i + 1, quote)?;
            }
            _ if bytes[i..].starts_with(open) => {
                level += 1;
                i += 2;
            }
            _ if bytes[i..].starts_with(close) => {
                level -= 1;
                if level == 0 {
                    return Some(i);
                }
                i += 2;
            }
            _ => i += 1,
        }
    }
    None
}

/// An iterator over the nodes of a template.
#[derive(Debug, Clone)]
pub struct Segmenter<'s> {
    source: &'s str,
    pos: usize,
}

impl<'s> Segmenter<'s> {
    /// Creates a segmenter positioned at the start of `source`.
    pub const fn new(source: &'s str) -> Self {
        Self { source, pos: 0 }
    }

    /// Tries to read a complete tag at the current position.
    fn tag(&self, marker: Marker) -> Option<(TemplateNode, usize)> {
        let bytes = self.source.as_bytes();
        let start = self.pos + 2;
        match marker {
            Marker::Expression => {
                let end = find_close(bytes, start, b"{{", b"}}")?;
                let content = self.source[start..end].trim().to_string();
                Some((TemplateNode::Expression(content), end + 2))
            }
            Marker::Control => {
                let end = find_close(bytes, start, b"{%", b"%}")?;
                let tag = parse_control_tag(&self.source[start..end]);
                Some((TemplateNode::ControlTag(tag), end + 2))
            }
            Marker::Comment => {
                let end = start + self.source[start..].find("#}")?;
                let content = self.source[start..end].to_string();
                Some((TemplateNode::Comment(content), end + 2))
            }
        }
    }

    fn text_until(&mut self, end: usize) -> TemplateNode {
        let text = self.source[self.pos..end].to_string();
        self.pos = end;
        TemplateNode::Text(text)
    }
}

impl Iterator for Segmenter<'_> {
    type Item = TemplateNode;

    fn next(&mut self) -> Option<TemplateNode> {
        let len = self.source.len();
        if self.pos >= len {
            return None;
        }

        if let Some(marker) = Marker::at(&self.source[self.pos..]) {
            if let Some((node, next_pos)) = self.tag(marker) {
                self.pos = next_pos;
                return Some(node);
            }
            // Unclosed: the opener is literal up to the next candidate opener.
            let end = next_marker(self.source, self.pos + 1).unwrap_or(len);
            return Some(self.text_until(end));
        }

        let end = next_marker(self.source, self.pos).unwrap_or(len);
        Some(self.text_until(end))
    }
}

/// Segments a whole template.
pub fn parse(source: &str) -> Vec<TemplateNode> {
    Segmenter::new(source).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::ControlTagKind;

    fn text(s: &str) -> TemplateNode {
        TemplateNode::Text(s.to_string())
    }

    fn expr(s: &str) -> TemplateNode {
        TemplateNode::Expression(s.to_string())
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(parse("Hello world"), vec![text("Hello world")]);
        assert!(parse("").is_empty());
    }

    #[test]
    fn test_expression() {
        assert_eq!(
            parse("Hello {{ name }}!"),
            vec![text("Hello "), expr("name"), text("!")]
        );
    }

    #[test]
    fn test_comment_keeps_content() {
        assert_eq!(
            parse("a{# note {{ x }} #}b"),
            vec![
                text("a"),
                TemplateNode::Comment(" note {{ x }} ".to_string()),
                text("b")
            ]
        );
    }

    #[test]
    fn test_control_tag() {
        let nodes = parse("{% if x %}yes{% endif %}");
        assert_eq!(nodes.len(), 3);
        let TemplateNode::ControlTag(tag) = &nodes[0] else {
            panic!("expected a control tag");
        };
        assert_eq!(tag.kind, ControlTagKind::If);
        assert_eq!(tag.expression, "x");
        assert!(matches!(&nodes[2], TemplateNode::ControlTag(t) if t.kind == ControlTagKind::EndIf));
    }

    #[test]
    fn test_quoted_braces_do_not_close() {
        assert_eq!(parse("{{ \"a{{b\" }} world"), vec![expr("\"a{{b\""), text(" world")]);
        assert_eq!(parse("{{ 'x}}y' }}"), vec![expr("'x}}y'")]);
    }

    #[test]
    fn test_escaped_quote_inside_string() {
        assert_eq!(parse(r"{{ 'it\'s }}' }}"), vec![expr(r"'it\'s }}'")]);
        assert_eq!(parse(r"{{ 'a\\' }}b"), vec![expr(r"'a\\'"), text("b")]);
    }

    #[test]
    fn test_nested_expression_braces() {
        assert_eq!(parse("{{ {{ x }} }}"), vec![expr("{{ x }}")]);
    }

    #[test]
    fn test_unclosed_expression_is_text() {
        assert_eq!(
            parse("a {{ b {{ c }}"),
            vec![text("a "), text("{{ b "), expr("c")]
        );
        assert_eq!(parse("{{ oops"), vec![text("{{ oops")]);
    }

    #[test]
    fn test_unclosed_string_makes_tag_literal() {
        assert_eq!(parse("{{ 'abc }} x"), vec![text("{{ 'abc }} x")]);
    }

    #[test]
    fn test_unclosed_comment_and_control() {
        assert_eq!(parse("{# never"), vec![text("{# never")]);
        assert_eq!(
            parse("{% if x and {{ y }}"),
            vec![text("{% if x and "), expr("y")]
        );
    }

    #[test]
    fn test_malformed_control_tag_does_not_stop_parsing() {
        let nodes = parse("{% bogus %}after {{ x }}");
        assert!(matches!(&nodes[0], TemplateNode::ControlTag(t) if t.kind == ControlTagKind::Unknown));
        assert_eq!(nodes[1..], [text("after "), expr("x")]);
    }

    #[test]
    fn test_multibyte_text() {
        assert_eq!(
            parse("héllo {{ naïve }} wörld"),
            vec![text("héllo "), expr("naïve"), text(" wörld")]
        );
    }

    #[test]
    fn test_iterator_yields_nodes_lazily() {
        let mut seg = Segmenter::new("ab{{ c }}");
        assert_eq!(seg.next(), Some(text("ab")));
        assert_eq!(seg.pos, 2);
        assert_eq!(seg.next(), Some(expr("c")));
        assert_eq!(seg.next(), None);
    }
}
