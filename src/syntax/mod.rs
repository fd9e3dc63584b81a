//! The syntax arena shared by every engine pass.
//!
//! A [`SyntaxTree`] is an immutable, versioned snapshot of one parsed source
//! file. Nodes live in a slotmap arena and carry a stable [`NodeLabel`], the
//! raw grammar kind, byte and line/column spans, and the declared name where
//! the grammar exposes one. Trees are built either by the language frontend
//! (see [`crate::languages`]) or programmatically through [`SyntaxTreeBuilder`].

use serde::Serialize;
use slotmap::{new_key_type, SlotMap};
use strum_macros::Display;

mod span_index;
pub use span_index::SpanIndex;

// --- SlotMap key type --- //

new_key_type! {
    pub struct NodeId;
}

// --- Spans and positions --- //

/// Half-open byte range within one source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TextSpan {
    pub start: usize,
    pub end: usize,
}

impl TextSpan {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "span start {start} past end {end}");
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// True when `other` lies fully within this span.
    pub fn contains(&self, other: TextSpan) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn contains_pos(&self, pos: usize) -> bool {
        self.start <= pos && pos < self.end
    }

    pub fn overlaps(&self, other: TextSpan) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Clamp this span to the bounds of `outer`.
    pub fn intersect(&self, outer: TextSpan) -> TextSpan {
        TextSpan::new(
            self.start.max(outer.start).min(outer.end),
            self.end.min(outer.end).max(outer.start),
        )
    }
}

/// Zero-based line/column position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct LinePos {
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct LineSpan {
    pub start: LinePos,
    pub end: LinePos,
}

// --- Line index --- //

/// Byte-offset to line/column lookup for one source buffer.
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self { line_starts }
    }

    pub fn pos_for_offset(&self, offset: usize) -> LinePos {
        match self.line_starts.binary_search(&offset) {
            Ok(line) => LinePos {
                line: line as u32,
                column: 0,
            },
            Err(line) => {
                let line = line.saturating_sub(1);
                LinePos {
                    line: line as u32,
                    column: (offset - self.line_starts[line]) as u32,
                }
            }
        }
    }

    pub fn span_for(&self, span: TextSpan) -> LineSpan {
        LineSpan {
            start: self.pos_for_offset(span.start),
            end: self.pos_for_offset(span.end),
        }
    }
}

// --- Node labels --- //

#[derive(Debug, Clone, Copy, Display, PartialEq, Eq, Hash, Serialize)]
pub enum TypeKind {
    Class,
    Struct,
    Interface,
    Record,
    Enum,
}

/// Stable kind tag every engine pass dispatches on. The raw grammar kind is
/// kept alongside on the node; two nodes only ever match when both agree.
#[derive(Debug, Clone, Copy, Display, PartialEq, Eq, Hash, Serialize)]
pub enum NodeLabel {
    CompilationUnit,
    Namespace,
    Type(TypeKind),

    Method,
    Constructor,
    Property,
    Field,
    EnumMember,
    VariableDeclarator,

    ParameterList,
    Parameter,
    TypeParameterList,
    TypeParameter,
    AttributeList,
    Modifier,

    Block,
    Statement,
    TryStatement,
    CatchClause,
    FinallyClause,

    Lambda,
    LocalFunction,

    Identifier,
    Comment,

    /// Anything else the grammar produces, tokens included.
    Token,
}

impl NodeLabel {
    pub fn is_type_declaration(&self) -> bool {
        matches!(self, NodeLabel::Type(_))
    }

    /// Member declarations that resolve to their own symbol.
    pub fn is_member_declaration(&self) -> bool {
        matches!(
            self,
            NodeLabel::Method
                | NodeLabel::Constructor
                | NodeLabel::Property
                | NodeLabel::Field
                | NodeLabel::EnumMember
        )
    }

    pub fn is_declaration(&self) -> bool {
        self.is_type_declaration()
            || self.is_member_declaration()
            || matches!(self, NodeLabel::Namespace | NodeLabel::VariableDeclarator)
    }

    /// Declarations with executable bodies, the unit of line-delta updates.
    pub fn is_method_like(&self) -> bool {
        matches!(
            self,
            NodeLabel::Method | NodeLabel::Constructor | NodeLabel::Property
        )
    }

    pub fn is_statement(&self) -> bool {
        matches!(self, NodeLabel::Statement | NodeLabel::TryStatement)
    }

    pub fn is_handler(&self) -> bool {
        matches!(
            self,
            NodeLabel::TryStatement | NodeLabel::CatchClause | NodeLabel::FinallyClause
        )
    }

    pub fn is_lambda_like(&self) -> bool {
        matches!(self, NodeLabel::Lambda | NodeLabel::LocalFunction)
    }
}

// --- Nodes --- //

#[derive(Debug, Clone)]
pub struct SyntaxNode {
    pub label: NodeLabel,
    /// Raw grammar kind, e.g. `"method_declaration"`.
    pub kind: &'static str,
    pub span: TextSpan,
    pub line_span: LineSpan,
    /// Declared name where the grammar exposes a `name` field.
    pub name: Option<String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl SyntaxNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

// --- The tree --- //

/// Immutable arena parse of one source file.
#[derive(Debug, Clone)]
pub struct SyntaxTree {
    nodes: SlotMap<NodeId, SyntaxNode>,
    root: NodeId,
    source: String,
    version: u64,
    index: SpanIndex,
}

impl SyntaxTree {
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Panics on a key from another tree: feeding foreign nodes into an
    /// analysis is an internal defect, not a recoverable condition.
    pub fn node(&self, id: NodeId) -> &SyntaxNode {
        self.nodes
            .get(id)
            .unwrap_or_else(|| panic!("node {id:?} does not belong to this tree"))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn text(&self, id: NodeId) -> &str {
        let span = self.node(id).span;
        &self.source[span.start..span.end]
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    /// Position of `id` within its parent's child list; 0 for the root.
    pub fn sibling_index(&self, id: NodeId) -> usize {
        match self.parent(id) {
            Some(p) => self
                .children(p)
                .iter()
                .position(|&c| c == id)
                .expect("child missing from its parent's child list"),
            None => 0,
        }
    }

    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |&cur| self.parent(cur))
    }

    /// Pre-order walk of the subtree rooted at `root`, `root` included.
    pub fn preorder(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            for &child in self.children(id).iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    /// Leaf nodes of the subtree in source order.
    pub fn leaves(&self, root: NodeId) -> Vec<NodeId> {
        self.preorder(root)
            .into_iter()
            .filter(|&id| self.node(id).is_leaf())
            .collect()
    }

    /// Smallest node whose span fully contains `span`.
    pub fn smallest_covering(&self, span: TextSpan) -> Option<NodeId> {
        self.index.smallest_containing(span)
    }

    /// Smallest statement-labelled node whose span fully contains `span`.
    pub fn smallest_statement_covering(&self, span: TextSpan) -> Option<NodeId> {
        let mut cur = self.smallest_covering(span)?;
        loop {
            if self.node(cur).label.is_statement() {
                return Some(cur);
            }
            cur = self.parent(cur)?;
        }
    }

    /// Nearest enclosing member declaration, `id` included.
    pub fn enclosing_member(&self, id: NodeId) -> Option<NodeId> {
        std::iter::once(id)
            .chain(self.ancestors(id))
            .find(|&a| self.node(a).label.is_member_declaration())
    }

    /// Nearest enclosing type declaration, excluding `id` itself.
    pub fn enclosing_type(&self, id: NodeId) -> Option<NodeId> {
        self.ancestors(id)
            .find(|&a| self.node(a).label.is_type_declaration())
    }

    /// Namespace path from outermost to innermost around `id`.
    pub fn namespace_path(&self, id: NodeId) -> Vec<String> {
        let mut path: Vec<String> = self
            .ancestors(id)
            .filter(|&a| self.node(a).label == NodeLabel::Namespace)
            .filter_map(|a| self.node(a).name.clone())
            .collect();
        path.reverse();
        path
    }

    /// Declared name, falling back to the first identifier child.
    pub fn declaration_name(&self, id: NodeId) -> Option<String> {
        if let Some(name) = &self.node(id).name {
            return Some(name.clone());
        }
        self.children(id)
            .iter()
            .find(|&&c| self.node(c).label == NodeLabel::Identifier)
            .map(|&c| self.text(c).to_string())
    }

    /// Modifier keywords attached to a declaration, in source order.
    pub fn modifiers(&self, id: NodeId) -> Vec<&str> {
        self.children(id)
            .iter()
            .filter(|&&c| self.node(c).label == NodeLabel::Modifier)
            .map(|&c| self.text(c))
            .collect()
    }

    pub fn has_modifier(&self, id: NodeId, keyword: &str) -> bool {
        self.modifiers(id).iter().any(|m| *m == keyword)
    }

    /// Number of type parameters declared directly on `id`.
    pub fn generic_arity(&self, id: NodeId) -> usize {
        self.children(id)
            .iter()
            .find(|&&c| self.node(c).label == NodeLabel::TypeParameterList)
            .map(|&c| {
                self.children(c)
                    .iter()
                    .filter(|&&tp| self.node(tp).label == NodeLabel::TypeParameter)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Texts of the parameters declared directly on `id`, in order.
    pub fn parameter_texts(&self, id: NodeId) -> Vec<String> {
        self.children(id)
            .iter()
            .find(|&&c| self.node(c).label == NodeLabel::ParameterList)
            .map(|&c| {
                self.children(c)
                    .iter()
                    .filter(|&&p| self.node(p).label == NodeLabel::Parameter)
                    .map(|&p| self.text(p).to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Token-for-token text equality of two subtrees, across trees.
    pub fn tokens_equal(&self, root: NodeId, other: &SyntaxTree, other_root: NodeId) -> bool {
        let a = self.leaves(root);
        let b = other.leaves(other_root);
        a.len() == b.len()
            && a.iter()
                .zip(b.iter())
                .all(|(&x, &y)| self.text(x) == other.text(y))
    }
}

// --- Builder --- //

/// Builds a [`SyntaxTree`] bottom-up. Line spans are derived from the source
/// buffer, so callers only supply byte offsets.
pub struct SyntaxTreeBuilder {
    nodes: SlotMap<NodeId, SyntaxNode>,
    root: Option<NodeId>,
    source: String,
    lines: LineIndex,
    version: u64,
}

impl SyntaxTreeBuilder {
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let lines = LineIndex::new(&source);
        Self {
            nodes: SlotMap::with_key(),
            root: None,
            source,
            lines,
            version: 0,
        }
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Add a node. The first node added without a parent becomes the root.
    pub fn push(
        &mut self,
        parent: Option<NodeId>,
        label: NodeLabel,
        kind: &'static str,
        span: TextSpan,
        name: Option<String>,
    ) -> NodeId {
        let line_span = self.lines.span_for(span);
        let id = self.nodes.insert(SyntaxNode {
            label,
            kind,
            span,
            line_span,
            name,
            parent,
            children: Vec::new(),
        });
        match parent {
            Some(p) => self
                .nodes
                .get_mut(p)
                .expect("parent must be added before its children")
                .children
                .push(id),
            None => {
                assert!(self.root.is_none(), "tree already has a root");
                self.root = Some(id);
            }
        }
        id
    }

    pub fn set_name(&mut self, id: NodeId, name: impl Into<String>) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.name = Some(name.into());
        }
    }

    pub fn finish(self) -> SyntaxTree {
        let root = self.root.expect("cannot build an empty tree");
        let mut index = SpanIndex::default();
        for (id, node) in self.nodes.iter() {
            index.insert(id, node.span);
        }
        SyntaxTree {
            nodes: self.nodes,
            root,
            source: self.source,
            version: self.version,
            index,
        }
    }
}

// --- Tests --- //
