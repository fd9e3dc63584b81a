//! Edit script: the classified difference between two matched trees.
//!
//! The script is a deterministic total order over all differences: one walk
//! of the old tree in pre-order emits deletes, updates and moves, then one
//! walk of the new tree emits inserts. Every unmatched node appears exactly
//! once; every matched pair with changed shape or position appears exactly
//! once; the root pair is never an insert or delete.

use super::matching::TreeMatch;
use super::{AnalysisError, CancelToken};
use crate::syntax::{NodeId, SyntaxTree};
use strum_macros::Display;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum TreeEdit {
    /// A new node with no old counterpart.
    Insert { node: NodeId },
    /// An old node with no new counterpart.
    Delete { node: NodeId },
    /// A matched pair whose shape or position differs.
    Update { old: NodeId, new: NodeId },
    /// A matched pair whose parents no longer correspond.
    Move {
        old: NodeId,
        new: NodeId,
        new_parent: NodeId,
    },
}

#[derive(Debug, Default)]
pub struct EditScript {
    edits: Vec<TreeEdit>,
}

impl EditScript {
    pub fn build(m: &TreeMatch<'_>, token: &CancelToken) -> Result<Self, AnalysisError> {
        let old = m.old_tree();
        let new = m.new_tree();
        let mut edits = Vec::new();

        for o in old.preorder(old.root()) {
            token.check()?;
            match m.new_counterpart(o) {
                None => edits.push(TreeEdit::Delete { node: o }),
                Some(n) => {
                    let moved = match (old.parent(o), new.parent(n)) {
                        (Some(op), Some(np)) => m.new_counterpart(op) != Some(np),
                        (None, None) => false,
                        // A matched pair where only one side is a root would
                        // mean the matcher paired a root with an inner node.
                        _ => panic!("match pairs a root with a non-root node"),
                    };
                    if moved {
                        edits.push(TreeEdit::Move {
                            old: o,
                            new: n,
                            new_parent: new.parent(n).expect("moved node has a parent"),
                        });
                    } else if shape_changed(old, new, o, n) || position_changed(old, new, o, n) {
                        edits.push(TreeEdit::Update { old: o, new: n });
                    }
                }
            }
        }

        for n in new.preorder(new.root()) {
            token.check()?;
            if m.old_counterpart(n).is_none() {
                edits.push(TreeEdit::Insert { node: n });
            }
        }

        debug!("edit script holds {} edits", edits.len());
        Ok(Self { edits })
    }

    pub fn edits(&self) -> &[TreeEdit] {
        &self.edits
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }
}

/// Shape: leaf token text, or the labelled child sequence of an inner node.
fn shape_changed(old: &SyntaxTree, new: &SyntaxTree, o: NodeId, n: NodeId) -> bool {
    let oc = old.children(o);
    let nc = new.children(n);
    if oc.is_empty() && nc.is_empty() {
        return old.text(o) != new.text(n);
    }
    oc.len() != nc.len()
        || oc.iter().zip(nc.iter()).any(|(&a, &b)| {
            let an = old.node(a);
            let bn = new.node(b);
            an.label != bn.label || an.kind != bn.kind
        })
}

/// Position: sibling index or start line/column. A pure line shift is still a
/// position change; the line-edit pass decides whether it needs recompiling.
fn position_changed(old: &SyntaxTree, new: &SyntaxTree, o: NodeId, n: NodeId) -> bool {
    old.sibling_index(o) != new.sibling_index(n)
        || old.node(o).line_span.start != new.node(n).line_span.start
}

// --- Tests --- //
