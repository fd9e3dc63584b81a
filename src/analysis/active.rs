//! Active-statement tracking across an edit.
//!
//! An active statement is a span currently executing in a paused process.
//! Remapping follows the node correspondence: each statement either lands on
//! its counterpart in the new tree (`Mapped`) or has none (`Deleted`), and
//! exception regions are recomputed fresh from the new tree's ancestors.
//! Ordinals survive the trip so the debugger can correlate results.

use super::matching::TreeMatch;
use super::semantic::SymbolKey;
use super::{AnalysisError, CancelToken};
use bitflags::bitflags;
use serde::Serialize;
use strum_macros::Display;

use crate::syntax::{LineSpan, NodeId, NodeLabel, SyntaxTree, TextSpan};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ActiveStatementFlags: u8 {
        /// The owning frame has callees on the stack; its statement must
        /// stay exactly executable.
        const NON_LEAF_FRAME = 1 << 0;
        /// The instruction pointer sits mid-statement.
        const PARTIALLY_EXECUTED = 1 << 1;
    }
}

/// A statement currently executing in the paused process, identified by its
/// file-local span in the old document.
#[derive(Debug, Clone)]
pub struct ActiveStatement {
    /// Stable identity across edits; the debugger correlates on this.
    pub ordinal: usize,
    /// Unmapped span in the old document.
    pub span: TextSpan,
    pub flags: ActiveStatementFlags,
    /// Owning method, when the host knows it.
    pub method: Option<SymbolKey>,
}

impl ActiveStatement {
    pub fn new(ordinal: usize, span: TextSpan, flags: ActiveStatementFlags) -> Self {
        Self {
            ordinal,
            span,
            flags,
            method: None,
        }
    }

    pub fn with_method(mut self, method: SymbolKey) -> Self {
        self.method = Some(method);
        self
    }

    pub fn is_non_leaf(&self) -> bool {
        self.flags.contains(ActiveStatementFlags::NON_LEAF_FRAME)
    }
}

/// Lifecycle of a tracked statement: supplied `Unmapped`, it either maps onto
/// the new tree or is reported deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
pub enum StatementState {
    Unmapped,
    Mapped,
    Deleted,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemappedActiveStatement {
    pub ordinal: usize,
    pub state: StatementState,
    /// Span in the new document; absent when deleted.
    pub span: Option<TextSpan>,
    pub line_span: Option<LineSpan>,
    pub exception_regions: ExceptionRegionSet,
}

// --- Exception regions --- //

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
pub enum HandlerKind {
    Try,
    Catch,
    Finally,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExceptionRegion {
    pub kind: HandlerKind,
    pub span: TextSpan,
    pub line_span: LineSpan,
}

/// Handler spans enclosing one active statement, innermost first. Computed
/// fresh per analysis, never mutated in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExceptionRegionSet {
    pub regions: Vec<ExceptionRegion>,
}

impl ExceptionRegionSet {
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

/// Handler constructs enclosing `id`, innermost first, bounded by the
/// enclosing member.
pub(crate) fn handler_ancestors(tree: &SyntaxTree, id: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    for a in tree.ancestors(id) {
        let label = tree.node(a).label;
        if label.is_member_declaration() {
            break;
        }
        if label.is_handler() {
            out.push(a);
        }
    }
    out
}

/// Structural identity of a handler construct, ignoring the guarded code:
/// catch type and filter, or the bare keyword for try/finally.
pub(crate) fn handler_signature(tree: &SyntaxTree, id: NodeId) -> String {
    match tree.node(id).label {
        NodeLabel::TryStatement => "try".to_string(),
        NodeLabel::FinallyClause => "finally".to_string(),
        NodeLabel::CatchClause => tree
            .children(id)
            .iter()
            .filter(|&&c| {
                matches!(
                    tree.node(c).kind,
                    "catch_declaration" | "catch_filter_clause"
                )
            })
            .map(|&c| tree.text(c))
            .collect::<Vec<_>>()
            .join(" "),
        _ => String::new(),
    }
}

/// Exception regions around `span`, usable before any edit exists (baseline
/// capture). Try-block regions matter only to frames that can resume into
/// their handlers, so they are included for non-leaf frames alone.
pub fn exception_regions(
    tree: &SyntaxTree,
    span: TextSpan,
    is_non_leaf: bool,
    token: &CancelToken,
) -> Result<ExceptionRegionSet, AnalysisError> {
    token.check()?;
    let Some(node) = tree.smallest_statement_covering(span) else {
        return Ok(ExceptionRegionSet::default());
    };
    let member_span = tree
        .enclosing_member(node)
        .map(|m| tree.node(m).span)
        .unwrap_or_else(|| tree.node(tree.root()).span);

    let mut regions = Vec::new();
    for handler in handler_ancestors(tree, node) {
        token.check()?;
        let label = tree.node(handler).label;
        let kind = match label {
            NodeLabel::TryStatement => HandlerKind::Try,
            NodeLabel::CatchClause => HandlerKind::Catch,
            NodeLabel::FinallyClause => HandlerKind::Finally,
            _ => continue,
        };
        if kind == HandlerKind::Try && !is_non_leaf {
            continue;
        }
        regions.push(ExceptionRegion {
            kind,
            span: tree.node(handler).span.intersect(member_span),
            line_span: tree.node(handler).line_span,
        });
    }
    Ok(ExceptionRegionSet { regions })
}

// --- Remapping --- //

pub fn remap(
    m: &TreeMatch<'_>,
    active: &[ActiveStatement],
    token: &CancelToken,
) -> Result<Vec<RemappedActiveStatement>, AnalysisError> {
    let old = m.old_tree();
    let new = m.new_tree();
    let mut out = Vec::with_capacity(active.len());

    for stmt in active {
        token.check()?;
        let mapped = old
            .smallest_statement_covering(stmt.span)
            .and_then(|old_node| m.new_counterpart(old_node));

        match mapped {
            Some(new_node) => {
                let node = new.node(new_node);
                out.push(RemappedActiveStatement {
                    ordinal: stmt.ordinal,
                    state: StatementState::Mapped,
                    span: Some(node.span),
                    line_span: Some(node.line_span),
                    exception_regions: exception_regions(
                        new,
                        node.span,
                        stmt.is_non_leaf(),
                        token,
                    )?,
                });
            }
            None => out.push(RemappedActiveStatement {
                ordinal: stmt.ordinal,
                state: StatementState::Deleted,
                span: None,
                line_span: None,
                exception_regions: ExceptionRegionSet::default(),
            }),
        }
    }
    Ok(out)
}

// --- Tests --- //
