//! Symbol-level classification of syntax edits.
//!
//! Semantic edits reference symbols through position-independent keys rather
//! than live nodes, so a downstream compiler can resolve them against a
//! rebuilt model. Partial-type members carry a grouping key; the session-level
//! merge collapses their per-document edits and fails fast on duplicate
//! non-partial edits, which indicate an upstream defect.

use super::line_edits::LineEditSet;
use super::matching::{SyntaxMap, TreeMatch};
use super::script::{EditScript, TreeEdit};
use super::{AnalysisError, CancelToken};
use crate::syntax::{NodeId, NodeLabel, SyntaxTree};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use strum_macros::Display;

// --- Symbol keys --- //

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
pub enum SymbolKindTag {
    Namespace,
    Type,
    Method,
    Constructor,
    Property,
    Field,
    EnumMember,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SymbolSegment {
    pub kind: SymbolKindTag,
    pub name: String,
    /// Type parameters for types, parameters for methods.
    pub arity: u32,
}

/// Structural, position-independent reference to a symbol: the path of
/// containers from the outermost namespace down to the member, plus the
/// member's signature where overloads make the name ambiguous.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SymbolKey {
    pub segments: Vec<SymbolSegment>,
    pub signature: Option<String>,
}

impl std::fmt::Display for SymbolKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, seg) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", seg.name)?;
            if seg.kind == SymbolKindTag::Type && seg.arity > 0 {
                write!(f, "`{}", seg.arity)?;
            }
        }
        if let Some(sig) = &self.signature {
            write!(f, "({})", sig)?;
        }
        Ok(())
    }
}

/// Build the key for a declaration node. For fields, pass the individual
/// variable declarator; the field declaration itself names no single symbol.
pub fn symbol_key_for(tree: &SyntaxTree, node: NodeId) -> Option<SymbolKey> {
    let label = tree.node(node).label;

    let (kind, signature) = match label {
        NodeLabel::Type(_) => (SymbolKindTag::Type, None),
        NodeLabel::Method => (
            SymbolKindTag::Method,
            Some(normalize_signature(&tree.parameter_texts(node))),
        ),
        NodeLabel::Constructor => (
            SymbolKindTag::Constructor,
            Some(normalize_signature(&tree.parameter_texts(node))),
        ),
        NodeLabel::Property => (SymbolKindTag::Property, None),
        NodeLabel::VariableDeclarator => (SymbolKindTag::Field, None),
        NodeLabel::EnumMember => (SymbolKindTag::EnumMember, None),
        _ => return None,
    };

    let name = tree.declaration_name(node)?;
    let arity = match kind {
        SymbolKindTag::Type => tree.generic_arity(node) as u32,
        SymbolKindTag::Method | SymbolKindTag::Constructor => {
            tree.parameter_texts(node).len() as u32
        }
        _ => 0,
    };

    let mut segments = vec![SymbolSegment { kind, name, arity }];
    for a in tree.ancestors(node) {
        let anode = tree.node(a);
        match anode.label {
            NodeLabel::Type(_) => segments.push(SymbolSegment {
                kind: SymbolKindTag::Type,
                name: tree.declaration_name(a)?,
                arity: tree.generic_arity(a) as u32,
            }),
            NodeLabel::Namespace => segments.push(SymbolSegment {
                kind: SymbolKindTag::Namespace,
                name: tree.declaration_name(a)?,
                arity: 0,
            }),
            _ => {}
        }
    }
    segments.reverse();
    Some(SymbolKey {
        segments,
        signature,
    })
}

fn normalize_signature(params: &[String]) -> String {
    params
        .iter()
        .map(|p| p.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Symbols a declaration introduces: one per declarator for fields, the
/// declaration itself otherwise.
pub fn declared_symbols(tree: &SyntaxTree, decl: NodeId) -> Vec<(SymbolKey, NodeId)> {
    if tree.node(decl).label == NodeLabel::Field {
        return tree
            .preorder(decl)
            .into_iter()
            .filter(|&id| tree.node(id).label == NodeLabel::VariableDeclarator)
            .filter_map(|id| symbol_key_for(tree, id).map(|k| (k, id)))
            .collect();
    }
    symbol_key_for(tree, decl)
        .map(|k| vec![(k, decl)])
        .unwrap_or_default()
}

// --- Symbol model --- //

/// Key → declaration lookup over one tree, the "compiled model" stand-in the
/// classifier resolves enclosing symbols against.
pub struct SymbolModel<'t> {
    tree: &'t SyntaxTree,
    table: HashMap<SymbolKey, Vec<NodeId>>,
}

impl<'t> SymbolModel<'t> {
    pub fn build(tree: &'t SyntaxTree) -> Self {
        let mut table: HashMap<SymbolKey, Vec<NodeId>> = HashMap::new();
        for id in tree.preorder(tree.root()) {
            let label = tree.node(id).label;
            if label.is_type_declaration() || label.is_member_declaration() {
                for (key, node) in declared_symbols(tree, id) {
                    table.entry(key).or_default().push(node);
                }
            }
        }
        Self { tree, table }
    }

    pub fn tree(&self) -> &'t SyntaxTree {
        self.tree
    }

    pub fn key_for(&self, node: NodeId) -> Option<SymbolKey> {
        symbol_key_for(self.tree, node)
    }

    /// First declaration of the symbol; partial types may have several.
    pub fn resolve(&self, key: &SymbolKey) -> Option<NodeId> {
        self.table.get(key).and_then(|v| v.first().copied())
    }

    pub fn resolve_all(&self, key: &SymbolKey) -> &[NodeId] {
        self.table.get(key).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

// --- Semantic edits --- //

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
pub enum SemanticEditKind {
    Insert,
    Update,
    Delete,
    /// The declaration survives but its body shares nothing with the old
    /// version; locals cannot be correlated.
    Replace,
}

/// One symbol the downstream compiler must regenerate. Produced per analysis
/// call and consumed immediately; never cached across edits.
#[derive(Debug, Clone, Serialize)]
pub struct SemanticEditInfo {
    pub kind: SemanticEditKind,
    pub symbol: SymbolKey,
    /// Set for members of `partial` types; edits sharing a symbol across
    /// partial declarations merge at session level.
    pub partial_group: Option<SymbolKey>,
    #[serde(skip)]
    pub syntax_map: Option<SyntaxMap>,
}

// --- Classification --- //

pub fn classify(
    m: &TreeMatch<'_>,
    script: &EditScript,
    old_model: &SymbolModel<'_>,
    new_model: &SymbolModel<'_>,
    line_edits: &LineEditSet,
    token: &CancelToken,
) -> Result<Vec<SemanticEditInfo>, AnalysisError> {
    let old = old_model.tree();
    let new = new_model.tree();
    let mut out: Vec<SemanticEditInfo> = Vec::new();
    let mut index: HashMap<SymbolKey, usize> = HashMap::new();

    let push = |out: &mut Vec<SemanticEditInfo>,
                index: &mut HashMap<SymbolKey, usize>,
                edit: SemanticEditInfo| {
        if index.contains_key(&edit.symbol) {
            return;
        }
        index.insert(edit.symbol.clone(), out.len());
        out.push(edit);
    };

    for edit in script.edits() {
        token.check()?;
        match *edit {
            TreeEdit::Update { new: n, .. } | TreeEdit::Move { new: n, .. } => {
                let Some(nd) = new.enclosing_member(n) else {
                    continue;
                };
                let Some(od) = m.old_counterpart(nd) else {
                    continue;
                };
                // Pure line shifts are owned by the line-edit pass.
                if line_edits.is_shifted(od) {
                    continue;
                }

                let symbol = if new.node(nd).label == NodeLabel::Field {
                    let declarator = std::iter::once(n)
                        .chain(new.ancestors(n))
                        .find(|&a| new.node(a).label == NodeLabel::VariableDeclarator);
                    match declarator.and_then(|d| symbol_key_for(new, d)) {
                        Some(k) => k,
                        None => match declared_symbols(new, nd).into_iter().next() {
                            Some((k, _)) => k,
                            None => continue,
                        },
                    }
                } else {
                    match new_model.key_for(nd) {
                        Some(k) => k,
                        None => continue,
                    }
                };

                let replaced = body_replaced(m, od, nd);
                let syntax_map = if replaced {
                    None
                } else {
                    lambda_aware_syntax_map(m, od, nd)
                };
                push(
                    &mut out,
                    &mut index,
                    SemanticEditInfo {
                        kind: if replaced {
                            SemanticEditKind::Replace
                        } else {
                            SemanticEditKind::Update
                        },
                        symbol,
                        partial_group: partial_group_of(new, nd),
                        syntax_map,
                    },
                );
            }
            TreeEdit::Insert { node } => {
                let label = new.node(node).label;
                if label.is_type_declaration() {
                    let parent_matched = new
                        .parent(node)
                        .is_some_and(|p| m.old_counterpart(p).is_some());
                    if !parent_matched {
                        continue;
                    }
                    if let Some(symbol) = symbol_key_for(new, node) {
                        push(
                            &mut out,
                            &mut index,
                            SemanticEditInfo {
                                kind: SemanticEditKind::Insert,
                                symbol,
                                partial_group: partial_group_of(new, node),
                                syntax_map: None,
                            },
                        );
                    }
                } else if label.is_member_declaration() {
                    let enclosing_matched = new
                        .enclosing_type(node)
                        .is_some_and(|t| m.old_counterpart(t).is_some());
                    if !enclosing_matched {
                        continue;
                    }
                    for (symbol, _) in declared_symbols(new, node) {
                        push(
                            &mut out,
                            &mut index,
                            SemanticEditInfo {
                                kind: SemanticEditKind::Insert,
                                symbol,
                                partial_group: partial_group_of(new, node),
                                syntax_map: None,
                            },
                        );
                    }
                } else if label == NodeLabel::VariableDeclarator {
                    let field_matched = new.enclosing_member(node).is_some_and(|f| {
                        new.node(f).label == NodeLabel::Field && m.old_counterpart(f).is_some()
                    });
                    if !field_matched {
                        continue;
                    }
                    if let Some(symbol) = symbol_key_for(new, node) {
                        push(
                            &mut out,
                            &mut index,
                            SemanticEditInfo {
                                kind: SemanticEditKind::Insert,
                                symbol,
                                partial_group: partial_group_of(new, node),
                                syntax_map: None,
                            },
                        );
                    }
                }
            }
            TreeEdit::Delete { node } => {
                let label = old.node(node).label;
                let deletable = label.is_type_declaration()
                    || label.is_member_declaration()
                    || label == NodeLabel::VariableDeclarator;
                if !deletable {
                    continue;
                }
                let parent_matched = old
                    .parent(node)
                    .is_some_and(|p| m.new_counterpart(p).is_some());
                if !parent_matched {
                    continue;
                }
                let symbols = if label == NodeLabel::VariableDeclarator {
                    symbol_key_for(old, node)
                        .map(|k| vec![(k, node)])
                        .unwrap_or_default()
                } else {
                    declared_symbols(old, node)
                };
                for (symbol, _) in symbols {
                    push(
                        &mut out,
                        &mut index,
                        SemanticEditInfo {
                            kind: SemanticEditKind::Delete,
                            symbol,
                            partial_group: partial_group_of(old, node),
                            syntax_map: None,
                        },
                    );
                }
            }
        }
    }

    Ok(out)
}

/// True when no statement of the old body survived into the new one.
fn body_replaced(m: &TreeMatch<'_>, od: NodeId, nd: NodeId) -> bool {
    let old = m.old_tree();
    let new = m.new_tree();
    let new_span = new.node(nd).span;
    let mut saw_statement = false;
    for id in old.preorder(od) {
        if !old.node(id).label.is_statement() {
            continue;
        }
        saw_statement = true;
        if let Some(n) = m.new_counterpart(id) {
            if new_span.contains(new.node(n).span) {
                return false;
            }
        }
    }
    saw_statement
}

/// The declaration's syntax map, unless a changed lambda lost its
/// counterpart, in which case locals can't be correlated and the map is
/// withheld.
fn lambda_aware_syntax_map(m: &TreeMatch<'_>, od: NodeId, nd: NodeId) -> Option<SyntaxMap> {
    let old = m.old_tree();
    let new = m.new_tree();
    let matched = m.matched_lambdas();

    let old_ok = old
        .preorder(od)
        .into_iter()
        .filter(|&id| old.node(id).label.is_lambda_like())
        .all(|id| matched.contains_key(&id));
    let new_ok = new
        .preorder(nd)
        .into_iter()
        .filter(|&id| new.node(id).label.is_lambda_like())
        .all(|id| m.old_counterpart(id).is_some());

    if old_ok && new_ok {
        Some(m.syntax_map(od, nd))
    } else {
        None
    }
}

fn partial_group_of(tree: &SyntaxTree, node: NodeId) -> Option<SymbolKey> {
    let ty = tree.enclosing_type(node)?;
    if tree.has_modifier(ty, "partial") {
        symbol_key_for(tree, ty)
    } else {
        None
    }
}

// --- Session-level merge --- //

/// Combine per-document edit lists, collapsing partial-declaration edits of
/// one symbol into a single edit.
pub fn merge_partial_edits(
    per_document: impl IntoIterator<Item = Vec<SemanticEditInfo>>,
) -> Vec<SemanticEditInfo> {
    let mut out: Vec<SemanticEditInfo> = Vec::new();
    let mut index: HashMap<SymbolKey, usize> = HashMap::new();

    for edits in per_document {
        for edit in edits {
            match index.get(&edit.symbol) {
                None => {
                    index.insert(edit.symbol.clone(), out.len());
                    out.push(edit);
                }
                Some(&i) if out[i].partial_group.is_some() && edit.partial_group.is_some() => {
                    if out[i].kind != edit.kind {
                        out[i].kind = SemanticEditKind::Update;
                    }
                    if out[i].syntax_map.is_none() {
                        out[i].syntax_map = edit.syntax_map;
                    }
                }
                // Leave the duplicate in place for the invariant check below.
                Some(_) => out.push(edit),
            }
        }
    }

    assert_unique_non_partial(&out);
    out
}

/// Post-merge invariant: duplicate edits for a non-partial symbol can only
/// come from an engine defect, so fail fast instead of producing a corrupted
/// result.
pub fn assert_unique_non_partial(edits: &[SemanticEditInfo]) {
    let mut seen: HashSet<&SymbolKey> = HashSet::new();
    for edit in edits {
        if edit.partial_group.is_none() && !seen.insert(&edit.symbol) {
            panic!(
                "duplicate semantic edits target non-partial symbol {}",
                edit.symbol
            );
        }
    }
}

// --- Tests --- //

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::languages::RegisteredLanguage;
    use pretty_assertions::assert_eq;

    fn parse(src: &str) -> Document {
        let lang: RegisteredLanguage = "cs".parse().unwrap();
        Document::parse(lang, "test.cs", src.to_string(), 0).unwrap()
    }

    fn method_key(doc: &Document, name: &str) -> SymbolKey {
        let tree = &doc.tree;
        let id = tree
            .preorder(tree.root())
            .into_iter()
            .find(|&id| {
                tree.node(id).label == NodeLabel::Method
                    && tree.declaration_name(id).as_deref() == Some(name)
            })
            .unwrap();
        symbol_key_for(tree, id).unwrap()
    }

    #[test]
    fn symbol_keys_are_stable_across_positions() {
        let a = parse("class C { void M(int x) { } }");
        let b = parse("\n\nclass C { void M(int x) { return; } }");
        assert_eq!(method_key(&a, "M"), method_key(&b, "M"));
    }

    #[test]
    fn symbol_key_display_includes_the_container_path() {
        let doc = parse("namespace N { class C { void M(int x) { } } }");
        let key = method_key(&doc, "M");
        assert_eq!(key.to_string(), "N.C.M(int x)");
    }

    #[test]
    fn overloads_get_distinct_keys() {
        let doc = parse("class C { void M(int x) { } void M(string s) { } }");
        let tree = &doc.tree;
        let keys: Vec<SymbolKey> = tree
            .preorder(tree.root())
            .into_iter()
            .filter(|&id| tree.node(id).label == NodeLabel::Method)
            .filter_map(|id| symbol_key_for(tree, id))
            .collect();
        assert_eq!(keys.len(), 2);
        assert_ne!(keys[0], keys[1]);
    }

    #[test]
    fn model_resolves_field_declarators_individually() {
        let doc = parse("class C { int a, b; }");
        let model = SymbolModel::build(&doc.tree);
        let tree = &doc.tree;
        let declarators: Vec<NodeId> = tree
            .preorder(tree.root())
            .into_iter()
            .filter(|&id| tree.node(id).label == NodeLabel::VariableDeclarator)
            .collect();
        assert_eq!(declarators.len(), 2);
        for d in declarators {
            let key = symbol_key_for(tree, d).unwrap();
            assert_eq!(model.resolve(&key), Some(d));
        }
    }

    #[test]
    fn merge_collapses_partial_edits_of_one_symbol() {
        let partial_type = SymbolKey {
            segments: vec![SymbolSegment {
                kind: SymbolKindTag::Type,
                name: "C".into(),
                arity: 0,
            }],
            signature: None,
        };
        let member = SymbolKey {
            segments: vec![
                partial_type.segments[0].clone(),
                SymbolSegment {
                    kind: SymbolKindTag::Method,
                    name: "M".into(),
                    arity: 0,
                },
            ],
            signature: Some(String::new()),
        };
        let edit = |kind| SemanticEditInfo {
            kind,
            symbol: member.clone(),
            partial_group: Some(partial_type.clone()),
            syntax_map: None,
        };

        let merged = merge_partial_edits(vec![
            vec![edit(SemanticEditKind::Update)],
            vec![edit(SemanticEditKind::Update)],
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].kind, SemanticEditKind::Update);

        let mixed = merge_partial_edits(vec![
            vec![edit(SemanticEditKind::Insert)],
            vec![edit(SemanticEditKind::Update)],
        ]);
        assert_eq!(mixed.len(), 1);
        assert_eq!(mixed[0].kind, SemanticEditKind::Update);
    }

    #[test]
    #[should_panic(expected = "non-partial symbol")]
    fn duplicate_non_partial_edits_fail_fast() {
        let key = SymbolKey {
            segments: vec![SymbolSegment {
                kind: SymbolKindTag::Method,
                name: "M".into(),
                arity: 0,
            }],
            signature: Some(String::new()),
        };
        let edit = SemanticEditInfo {
            kind: SemanticEditKind::Update,
            symbol: key,
            partial_group: None,
            syntax_map: None,
        };
        merge_partial_edits(vec![vec![edit.clone()], vec![edit]]);
    }
}
