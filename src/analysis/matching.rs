//! Tree matching: the old↔new node correspondence every other pass consumes.
//!
//! Matching is a greedy recursive descent. The root pair is forced, then each
//! matched pair's children are aligned with a maximal-weight LCS over
//! (label, kind) equality, preferring identical token text over matching
//! declaration names over bare label equality. Weight ties resolve toward the
//! earliest old start offset, then the longest old span, which keeps the
//! correspondence deterministic without chasing a global optimum.

use super::{AnalysisError, CancelToken};
use crate::syntax::{NodeId, SyntaxTree};
use once_cell::unsync::OnceCell;
use std::cmp::Reverse;
use std::collections::HashMap;
use tracing::debug;

/// One-to-one partial mapping between the nodes of two trees.
#[derive(Debug)]
pub struct TreeMatch<'t> {
    old: &'t SyntaxTree,
    new: &'t SyntaxTree,
    old_to_new: HashMap<NodeId, NodeId>,
    new_to_old: HashMap<NodeId, NodeId>,
    lambda_pairs: OnceCell<HashMap<NodeId, NodeId>>,
}

impl<'t> TreeMatch<'t> {
    /// Compute the correspondence between `old` and `new`.
    pub fn compute(
        old: &'t SyntaxTree,
        new: &'t SyntaxTree,
        token: &CancelToken,
    ) -> Result<Self, AnalysisError> {
        let mut m = TreeMatch {
            old,
            new,
            old_to_new: HashMap::new(),
            new_to_old: HashMap::new(),
            lambda_pairs: OnceCell::new(),
        };

        // The root pair is forced regardless of similarity.
        m.add_pair(old.root(), new.root());
        m.match_children(old.root(), new.root(), token)?;
        m.match_moved_declarations(token)?;

        debug!(
            "matched {} of {} old / {} new nodes",
            m.old_to_new.len(),
            old.node_count(),
            new.node_count()
        );
        Ok(m)
    }

    pub fn old_tree(&self) -> &'t SyntaxTree {
        self.old
    }

    pub fn new_tree(&self) -> &'t SyntaxTree {
        self.new
    }

    pub fn new_counterpart(&self, old_id: NodeId) -> Option<NodeId> {
        self.old_to_new.get(&old_id).copied()
    }

    pub fn old_counterpart(&self, new_id: NodeId) -> Option<NodeId> {
        self.new_to_old.get(&new_id).copied()
    }

    pub fn len(&self) -> usize {
        self.old_to_new.len()
    }

    pub fn is_empty(&self) -> bool {
        self.old_to_new.is_empty()
    }

    /// Matched lambda and local-function pairs, keyed by old header node.
    ///
    /// Built on first query only: documents without lambdas never pay for the
    /// extra walk. The map is read-only once populated.
    pub fn matched_lambdas(&self) -> &HashMap<NodeId, NodeId> {
        self.lambda_pairs.get_or_init(|| {
            let mut pairs = HashMap::new();
            for id in self.old.preorder(self.old.root()) {
                if self.old.node(id).label.is_lambda_like() {
                    if let Some(&n) = self.old_to_new.get(&id) {
                        pairs.insert(id, n);
                    }
                }
            }
            pairs
        })
    }

    /// New→old mapping restricted to one matched declaration's subtree, for
    /// correlating locals and lambdas during recompilation.
    pub fn syntax_map(&self, old_decl: NodeId, new_decl: NodeId) -> SyntaxMap {
        let old_span = self.old.node(old_decl).span;
        let mut entries = HashMap::new();
        for new_id in self.new.preorder(new_decl) {
            if let Some(&old_id) = self.new_to_old.get(&new_id) {
                if old_span.contains(self.old.node(old_id).span) {
                    entries.insert(new_id, old_id);
                }
            }
        }
        SyntaxMap { entries }
    }

    fn add_pair(&mut self, old_id: NodeId, new_id: NodeId) {
        let prev = self.old_to_new.insert(old_id, new_id);
        assert!(prev.is_none(), "old node {old_id:?} matched twice");
        let prev = self.new_to_old.insert(new_id, old_id);
        assert!(prev.is_none(), "new node {new_id:?} matched twice");
    }

    fn match_children(
        &mut self,
        old_parent: NodeId,
        new_parent: NodeId,
        token: &CancelToken,
    ) -> Result<(), AnalysisError> {
        token.check()?;

        let oc: Vec<NodeId> = self.old.children(old_parent).to_vec();
        let nc: Vec<NodeId> = self.new.children(new_parent).to_vec();
        if oc.is_empty() && nc.is_empty() {
            return Ok(());
        }

        let aligned = align(self.old, self.new, &oc, &nc);
        let mut old_used = vec![false; oc.len()];
        let mut new_used = vec![false; nc.len()];
        let mut pairs = Vec::with_capacity(aligned.len());
        for (i, j) in aligned {
            old_used[i] = true;
            new_used[j] = true;
            pairs.push((oc[i], nc[j]));
        }

        // Second pass: pair leftovers of the same label and kind regardless
        // of relative order, so simple reorders survive as matches.
        for i in 0..oc.len() {
            if old_used[i] {
                continue;
            }
            for j in 0..nc.len() {
                if new_used[j] {
                    continue;
                }
                if reorder_compatible(self.old, self.new, oc[i], nc[j]) {
                    old_used[i] = true;
                    new_used[j] = true;
                    pairs.push((oc[i], nc[j]));
                    break;
                }
            }
        }

        for (o, n) in pairs {
            // The moved-declaration pass re-enters this walk on subtrees
            // whose descendants may already be matched; one-to-one wins.
            if self.old_to_new.contains_key(&o) || self.new_to_old.contains_key(&n) {
                continue;
            }
            self.add_pair(o, n);
            self.match_children(o, n, token)?;
        }
        Ok(())
    }

    /// Final pass pairing declarations that changed parents; these surface as
    /// move edits downstream.
    fn match_moved_declarations(&mut self, token: &CancelToken) -> Result<(), AnalysisError> {
        let unmatched_old: Vec<NodeId> = self
            .old
            .preorder(self.old.root())
            .into_iter()
            .filter(|&id| {
                let label = self.old.node(id).label;
                (label.is_member_declaration() || label.is_type_declaration())
                    && !self.old_to_new.contains_key(&id)
            })
            .collect();
        if unmatched_old.is_empty() {
            return Ok(());
        }

        let candidates: Vec<NodeId> = self
            .new
            .preorder(self.new.root())
            .into_iter()
            .filter(|&id| {
                let label = self.new.node(id).label;
                label.is_member_declaration() || label.is_type_declaration()
            })
            .collect();

        for old_id in unmatched_old {
            token.check()?;
            // A previous iteration may have matched this node while
            // descending into a moved ancestor.
            if self.old_to_new.contains_key(&old_id) {
                continue;
            }
            let Some(name) = self.old.declaration_name(old_id) else {
                continue;
            };
            let old_node = self.old.node(old_id);

            let chosen = candidates
                .iter()
                .copied()
                .filter(|&n| {
                    !self.new_to_old.contains_key(&n)
                        && self.new.node(n).label == old_node.label
                        && self.new.node(n).kind == old_node.kind
                        && self.new.declaration_name(n).as_deref() == Some(name.as_str())
                })
                // Earliest start offset wins; among equal starts the larger
                // construct does.
                .min_by_key(|&n| {
                    let span = self.new.node(n).span;
                    (span.start, Reverse(span.len()))
                });

            if let Some(new_id) = chosen {
                self.add_pair(old_id, new_id);
                self.match_children(old_id, new_id, token)?;
            }
        }
        Ok(())
    }
}

// --- Alignment --- //

/// Match weight for a candidate pair, `None` when the labels disagree.
fn pair_weight(old: &SyntaxTree, new: &SyntaxTree, o: NodeId, n: NodeId) -> Option<u32> {
    let on = old.node(o);
    let nn = new.node(n);
    if on.label != nn.label || on.kind != nn.kind {
        return None;
    }
    if old.text(o) == new.text(n) {
        return Some(3);
    }
    if on.label.is_declaration() {
        if let (Some(a), Some(b)) = (&on.name, &nn.name) {
            if a == b {
                return Some(2);
            }
        }
    }
    Some(1)
}

fn reorder_compatible(old: &SyntaxTree, new: &SyntaxTree, o: NodeId, n: NodeId) -> bool {
    let on = old.node(o);
    let nn = new.node(n);
    if on.label != nn.label || on.kind != nn.kind {
        return false;
    }
    if on.label.is_declaration() {
        return old.declaration_name(o) == new.declaration_name(n);
    }
    old.text(o) == new.text(n)
}

/// Maximal-weight order-preserving alignment of two child sequences.
///
/// Reconstruction walks forward and takes a pair whenever doing so preserves
/// the optimum, so among equal-weight alternatives the match starting at the
/// smallest old offset wins.
fn align(
    old: &SyntaxTree,
    new: &SyntaxTree,
    oc: &[NodeId],
    nc: &[NodeId],
) -> Vec<(usize, usize)> {
    let n = oc.len();
    let m = nc.len();
    if n == 0 || m == 0 {
        return Vec::new();
    }

    // best[i][j] = max total weight aligning oc[i..] with nc[j..]
    let mut best = vec![vec![0u32; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            let skip = best[i + 1][j].max(best[i][j + 1]);
            let take = pair_weight(old, new, oc[i], nc[j])
                .map(|w| w + best[i + 1][j + 1])
                .unwrap_or(0);
            best[i][j] = skip.max(take);
        }
    }

    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if let Some(w) = pair_weight(old, new, oc[i], nc[j]) {
            if w + best[i + 1][j + 1] == best[i][j] {
                out.push((i, j));
                i += 1;
                j += 1;
                continue;
            }
        }
        if best[i + 1][j] >= best[i][j + 1] {
            i += 1;
        } else {
            j += 1;
        }
    }
    out
}

// --- Syntax map --- //

/// Function from new-tree nodes to their old-tree counterparts within one
/// declaration, handed to the downstream compiler alongside an update edit.
#[derive(Debug, Clone, Default)]
pub struct SyntaxMap {
    entries: HashMap<NodeId, NodeId>,
}

impl SyntaxMap {
    pub fn old_node(&self, new_id: NodeId) -> Option<NodeId> {
        self.entries.get(&new_id).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// --- Tests --- //
