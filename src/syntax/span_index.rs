use super::{NodeId, TextSpan};
use std::collections::{BTreeMap, HashMap};

/// Span lookup over one tree's nodes, keyed by `(start, end)` byte offsets.
///
/// Built once when a tree is finished and never mutated afterwards; the
/// engine only ever needs containment queries (owning statement of an
/// active-statement span, smallest node around an edit).
#[derive(Debug, Clone, Default)]
pub struct SpanIndex {
    map: BTreeMap<(usize, usize), Vec<NodeId>>,
    reverse: HashMap<NodeId, (usize, usize)>,
}

impl SpanIndex {
    pub(crate) fn insert(&mut self, id: NodeId, span: TextSpan) {
        self.map.entry((span.start, span.end)).or_default().push(id);
        self.reverse.insert(id, (span.start, span.end));
    }

    pub fn span_of(&self, id: NodeId) -> Option<TextSpan> {
        self.reverse.get(&id).map(|&(s, e)| TextSpan::new(s, e))
    }

    /// All nodes whose span fully contains `span`.
    pub fn containing(&self, span: TextSpan) -> Vec<NodeId> {
        self.map
            .range(..=(span.start, usize::MAX))
            .filter(|&(&(s, e), _)| s <= span.start && span.end <= e)
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect()
    }

    /// The node with the tightest span containing `span`, ties broken toward
    /// the earlier start offset.
    pub fn smallest_containing(&self, span: TextSpan) -> Option<NodeId> {
        self.containing(span)
            .into_iter()
            .min_by_key(|id| {
                let (s, e) = self.reverse[id];
                (e - s, s)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn ids(n: usize) -> Vec<NodeId> {
        let mut sm: SlotMap<NodeId, ()> = SlotMap::with_key();
        (0..n).map(|_| sm.insert(())).collect()
    }

    #[test]
    fn smallest_containing_picks_tightest() {
        let keys = ids(3);
        let mut idx = SpanIndex::default();
        idx.insert(keys[0], TextSpan::new(0, 100));
        idx.insert(keys[1], TextSpan::new(10, 50));
        idx.insert(keys[2], TextSpan::new(20, 30));

        assert_eq!(idx.smallest_containing(TextSpan::new(22, 25)), Some(keys[2]));
        assert_eq!(idx.smallest_containing(TextSpan::new(15, 45)), Some(keys[1]));
        assert_eq!(idx.smallest_containing(TextSpan::new(5, 95)), Some(keys[0]));
        assert_eq!(idx.smallest_containing(TextSpan::new(90, 150)), None);
    }

    #[test]
    fn containment_is_inclusive_of_exact_spans() {
        let keys = ids(1);
        let mut idx = SpanIndex::default();
        idx.insert(keys[0], TextSpan::new(5, 10));
        assert_eq!(idx.smallest_containing(TextSpan::new(5, 10)), Some(keys[0]));
    }
}
