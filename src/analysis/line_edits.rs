//! Line-delta detection for methods that only moved.
//!
//! When surrounding edits shift a method without touching its tokens, the
//! compiled body is still valid and only debug line mappings need updating.
//! This check runs before semantic classification so those methods never
//! reach the recompiler.

use super::matching::TreeMatch;
use super::script::{EditScript, TreeEdit};
use super::{AnalysisError, CancelToken};
use crate::syntax::{NodeId, SyntaxTree};
use serde::Serialize;
use std::collections::HashSet;
use tracing::debug;

/// One `old line → new line` entry of the sequence-point delta table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct SourceLineUpdate {
    pub old_line: u32,
    pub new_line: u32,
}

/// Line deltas for one document plus the declarations they cover.
#[derive(Debug, Default)]
pub struct LineEditSet {
    updates: Vec<SourceLineUpdate>,
    shifted_decls: HashSet<NodeId>,
}

impl LineEditSet {
    pub fn updates(&self) -> &[SourceLineUpdate] {
        &self.updates
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// Whether the old declaration only moved, making a semantic update for
    /// it unnecessary.
    pub fn is_shifted(&self, old_decl: NodeId) -> bool {
        self.shifted_decls.contains(&old_decl)
    }
}

pub fn compute(
    m: &TreeMatch<'_>,
    script: &EditScript,
    token: &CancelToken,
) -> Result<LineEditSet, AnalysisError> {
    let old = m.old_tree();
    let new = m.new_tree();
    let mut set = LineEditSet::default();

    for edit in script.edits() {
        token.check()?;
        let (o, n) = match *edit {
            TreeEdit::Update { old, new } => (old, new),
            _ => continue,
        };
        if !old.node(o).label.is_method_like() {
            continue;
        }
        if let Some(delta) = uniform_line_shift(old, new, o, n) {
            if delta != 0 {
                set.updates.push(SourceLineUpdate {
                    old_line: old.node(o).line_span.start.line,
                    new_line: new.node(n).line_span.start.line,
                });
                set.shifted_decls.insert(o);
            }
        }
    }

    set.updates.sort_unstable();
    set.updates.dedup();
    if !set.is_empty() {
        debug!("{} method(s) moved without token changes", set.updates.len());
    }
    Ok(set)
}

/// The constant line delta between two token-identical subtrees, if the
/// subtrees are identical modulo that shift. Columns must be preserved; a
/// column change alters sequence points and needs a real update.
fn uniform_line_shift(
    old: &SyntaxTree,
    new: &SyntaxTree,
    o: NodeId,
    n: NodeId,
) -> Option<i64> {
    let old_leaves = old.leaves(o);
    let new_leaves = new.leaves(n);
    if old_leaves.is_empty() || old_leaves.len() != new_leaves.len() {
        return None;
    }

    let mut delta: Option<i64> = None;
    for (&a, &b) in old_leaves.iter().zip(new_leaves.iter()) {
        if old.text(a) != new.text(b) {
            return None;
        }
        let pa = old.node(a).line_span.start;
        let pb = new.node(b).line_span.start;
        if pa.column != pb.column {
            return None;
        }
        let d = i64::from(pb.line) - i64::from(pa.line);
        match delta {
            None => delta = Some(d),
            Some(prev) if prev != d => return None,
            Some(_) => {}
        }
    }
    delta
}

// --- Tests --- //
