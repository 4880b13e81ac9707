//! Block resolution over a flat node sequence.
//!
//! The segmenter produces a flat list; these functions find where an `if`
//! or `for` block ends without building a tree. Nesting is tracked with one
//! counter per tag family, so an `{% else %}` inside a nested `for` is never
//! mistaken for a branch of the enclosing `if`.

use std::ops::Range;

use ajinja_rs_core::error::{BlockKind, JinjaError, JinjaResult};
use tracing::trace;

use crate::segmenter::TemplateNode;
use crate::tags::{ControlTag, ControlTagKind};

/// The extent of one block segment: the opening tag and the tag that ended it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSpan {
    /// Index of the opening tag.
    pub start: usize,
    /// Index of the terminating tag: the closer, an intermediate stopper,
    /// or an `Unknown` tag.
    pub end: usize,
}

impl BlockSpan {
    /// The node indices strictly between the two tags.
    pub const fn body(&self) -> Range<usize> {
        self.start + 1..self.end
    }
}

/// One `if`/`elif`/`else` branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfBranch {
    /// Index of the branch's tag.
    pub tag: usize,
    pub body: Range<usize>,
}

/// A fully resolved `if` structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfChain {
    pub branches: Vec<IfBranch>,
    /// Index of the final `endif`.
    pub end: usize,
}

fn control_tag(node: &TemplateNode) -> Option<&ControlTag> {
    match node {
        TemplateNode::ControlTag(tag) => Some(tag),
        _ => None,
    }
}

fn kind_at(nodes: &[TemplateNode], index: usize) -> Option<ControlTagKind> {
    nodes.get(index).and_then(control_tag).map(|tag| tag.kind)
}

/// Describes a malformed tag found where a block tag was expected.
fn malformed_at(nodes: &[TemplateNode], index: usize, structure: &str) -> JinjaError {
    match nodes.get(index).and_then(control_tag) {
        Some(tag) if tag.kind == ControlTagKind::Unknown => JinjaError::MalformedControlTag(format!(
            "'{}' found in {structure} structure: {}",
            tag.source(),
            tag.expression
        )),
        Some(tag) => JinjaError::MalformedControlTag(format!(
            "unexpected '{}' in {structure} structure",
            tag.source()
        )),
        None => JinjaError::MalformedControlTag(format!(
            "expected a control tag at node {index} in {structure} structure"
        )),
    }
}

/// Scans forward from the opener at `start` for the end of its segment.
///
/// The opener counts as depth 1 of the family that `closer` closes. While
/// that family is at depth 1 and the other family at depth 0, a tag whose
/// kind is in `stoppers`, or any `Unknown` tag, ends the segment. Otherwise
/// the segment ends at the `closer` that brings its family back to depth 0.
///
/// # Errors
///
/// Returns [`JinjaError::UnclosedBlock`] if no terminator is found, and
/// [`JinjaError::MalformedControlTag`] if `closer` is not `EndIf`/`EndFor`.
pub fn find_block(
    nodes: &[TemplateNode],
    start: usize,
    closer: ControlTagKind,
    stoppers: &[ControlTagKind],
) -> JinjaResult<BlockSpan> {
    let target = match closer {
        ControlTagKind::EndIf => BlockKind::If,
        ControlTagKind::EndFor => BlockKind::For,
        other => {
            return Err(JinjaError::MalformedControlTag(format!(
                "'{other}' does not close a block"
            )))
        }
    };

    let mut if_depth: i32 = i32::from(target == BlockKind::If);
    let mut for_depth: i32 = i32::from(target == BlockKind::For);

    for (index, node) in nodes.iter().enumerate().skip(start + 1) {
        let Some(tag) = control_tag(node) else {
            continue;
        };

        let (target_depth, other_depth) = match target {
            BlockKind::If => (if_depth, for_depth),
            BlockKind::For => (for_depth, if_depth),
        };
        if target_depth == 1
            && other_depth == 0
            && (tag.kind == ControlTagKind::Unknown || stoppers.contains(&tag.kind))
        {
            trace!(start, end = index, stopper = %tag.kind, "block segment ended");
            return Ok(BlockSpan { start, end: index });
        }

        match tag.kind {
            ControlTagKind::If => if_depth += 1,
            ControlTagKind::EndIf => if_depth -= 1,
            ControlTagKind::For => for_depth += 1,
            ControlTagKind::EndFor => for_depth -= 1,
            _ => {}
        }

        let target_depth = match target {
            BlockKind::If => if_depth,
            BlockKind::For => for_depth,
        };
        if tag.kind == closer && target_depth == 0 {
            trace!(start, end = index, closer = %closer, "block resolved");
            return Ok(BlockSpan { start, end: index });
        }
    }

    Err(JinjaError::UnclosedBlock {
        kind: target,
        index: start,
    })
}

/// Resolves the `for` block opened at `start`.
///
/// # Errors
///
/// Fails like [`find_block`], or with [`JinjaError::MalformedControlTag`]
/// when the body is cut short by an `Unknown` tag.
pub fn resolve_for(nodes: &[TemplateNode], start: usize) -> JinjaResult<BlockSpan> {
    let span = find_block(nodes, start, ControlTagKind::EndFor, &[])?;
    if kind_at(nodes, span.end) == Some(ControlTagKind::EndFor) {
        Ok(span)
    } else {
        Err(malformed_at(nodes, span.end, "for"))
    }
}

/// Resolves every branch of the `if` structure opened at `start`.
///
/// # Errors
///
/// Fails like [`find_block`], or with [`JinjaError::MalformedControlTag`]
/// when a branch ends at an `Unknown` tag.
pub fn resolve_if(nodes: &[TemplateNode], start: usize) -> JinjaResult<IfChain> {
    const BRANCH_STOPPERS: &[ControlTagKind] = &[ControlTagKind::ElseIf, ControlTagKind::Else];

    let mut branches = Vec::new();
    let mut at = start;
    loop {
        let stoppers: &[ControlTagKind] = if kind_at(nodes, at) == Some(ControlTagKind::Else) {
            &[]
        } else {
            BRANCH_STOPPERS
        };
        let span = find_block(nodes, at, ControlTagKind::EndIf, stoppers).map_err(|err| match err {
            JinjaError::UnclosedBlock { kind, .. } => JinjaError::UnclosedBlock { kind, index: start },
            other => other,
        })?;
        branches.push(IfBranch {
            tag: at,
            body: span.body(),
        });

        match kind_at(nodes, span.end) {
            Some(ControlTagKind::EndIf) => {
                return Ok(IfChain {
                    branches,
                    end: span.end,
                })
            }
            Some(ControlTagKind::ElseIf | ControlTagKind::Else) => at = span.end,
            _ => return Err(malformed_at(nodes, span.end, "if")),
        }
    }
}
