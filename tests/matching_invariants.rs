//! Matcher and edit-script invariants: forced root match, full node
//! coverage, one-to-one correspondence and byte-for-byte determinism, over
//! both real C# documents and a generated tree corpus.

use encore::analysis::{CancelToken, EditScript, TreeEdit, TreeMatch};
use encore::document::Document;
use encore::languages::RegisteredLanguage;
use encore::syntax::{NodeLabel, SyntaxTree, SyntaxTreeBuilder, TextSpan};
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};

// --- Shared checks --- //

fn check_invariants(old: &SyntaxTree, new: &SyntaxTree) {
    let token = CancelToken::new();
    let m = TreeMatch::compute(old, new, &token).unwrap();
    let script = EditScript::build(&m, &token).unwrap();

    // Root invariant: the roots are always matched to each other.
    assert_eq!(m.new_counterpart(old.root()), Some(new.root()));
    assert_eq!(m.old_counterpart(new.root()), Some(old.root()));

    // One-to-one: no two old nodes share a counterpart.
    let mut seen_new = HashSet::new();
    for id in old.preorder(old.root()) {
        if let Some(n) = m.new_counterpart(id) {
            assert!(seen_new.insert(n), "new node matched twice");
            assert_eq!(m.old_counterpart(n), Some(id), "mapping is not symmetric");
        }
    }

    // Coverage: every old node is matched xor deleted exactly once; every
    // new node is matched xor inserted exactly once.
    let mut delete_count: HashMap<_, usize> = HashMap::new();
    let mut insert_count: HashMap<_, usize> = HashMap::new();
    for edit in script.edits() {
        match edit {
            TreeEdit::Delete { node } => *delete_count.entry(*node).or_default() += 1,
            TreeEdit::Insert { node } => *insert_count.entry(*node).or_default() += 1,
            _ => {}
        }
    }
    for id in old.preorder(old.root()) {
        let deletes = delete_count.get(&id).copied().unwrap_or(0);
        if m.new_counterpart(id).is_some() {
            assert_eq!(deletes, 0, "matched old node also deleted");
        } else {
            assert_eq!(deletes, 1, "unmatched old node needs exactly one delete");
        }
    }
    for id in new.preorder(new.root()) {
        let inserts = insert_count.get(&id).copied().unwrap_or(0);
        if m.old_counterpart(id).is_some() {
            assert_eq!(inserts, 0, "matched new node also inserted");
        } else {
            assert_eq!(inserts, 1, "unmatched new node needs exactly one insert");
        }
    }
}

fn script_fingerprint(old: &SyntaxTree, new: &SyntaxTree) -> String {
    let token = CancelToken::new();
    let m = TreeMatch::compute(old, new, &token).unwrap();
    let script = EditScript::build(&m, &token).unwrap();
    format!("{:?}", script.edits())
}

// --- Real-source invariants --- //

fn parse(src: &str) -> Document {
    let lang: RegisteredLanguage = "cs".parse().unwrap();
    Document::parse(lang, "test.cs", src.to_string(), 0).unwrap()
}

#[test]
fn csharp_edit_pairs_satisfy_the_invariants() {
    let cases = [
        (
            "class C { void M() { int x = 1; } }",
            "class C { void M() { int x = 2; } }",
        ),
        (
            "class C { void M() { } }",
            "class C { void M() { } void N() { } }",
        ),
        (
            "class C { void M() { a(); b(); } }",
            "class C { void M() { b(); a(); } }",
        ),
        (
            "class A { void M() { } } class B { }",
            "class A { } class B { void M() { } }",
        ),
        ("class C { }", "namespace N { class C { } }"),
    ];
    for (old_src, new_src) in cases {
        let old = parse(old_src);
        let new = parse(new_src);
        check_invariants(&old.tree, &new.tree);
    }
}

#[test]
fn repeated_runs_are_byte_identical() {
    let old = parse("class C { void M() { a(); b(); c(); } void N() { } }");
    let new = parse("class C { void N() { d(); } void M() { b(); c(); } }");
    let first = script_fingerprint(&old.tree, &new.tree);
    for _ in 0..5 {
        assert_eq!(first, script_fingerprint(&old.tree, &new.tree));
    }
}

// --- Generated corpus --- //

#[derive(Debug, Clone)]
enum TestNode {
    Leaf(u8),
    Branch(u8, Vec<TestNode>),
}

const LEAF_POOL: &[(&str, &str)] = &[
    ("expression_statement", "a();"),
    ("expression_statement", "b();"),
    ("return_statement", "return;"),
    ("break_statement", "break;"),
];

const BRANCH_POOL: &[(&str, NodeLabel)] = &[
    ("block", NodeLabel::Block),
    ("if_statement", NodeLabel::Statement),
];

fn node_strategy() -> impl Strategy<Value = TestNode> {
    let leaf = (0..LEAF_POOL.len() as u8).prop_map(TestNode::Leaf);
    leaf.prop_recursive(3, 24, 4, |inner| {
        (
            0..BRANCH_POOL.len() as u8,
            prop::collection::vec(inner, 0..4),
        )
            .prop_map(|(k, children)| TestNode::Branch(k, children))
    })
}

fn subtree_text_len(node: &TestNode) -> usize {
    match node {
        TestNode::Leaf(k) => LEAF_POOL[*k as usize].1.len(),
        TestNode::Branch(_, children) => children.iter().map(subtree_text_len).sum(),
    }
}

fn collect_source(node: &TestNode, out: &mut String) {
    match node {
        TestNode::Leaf(k) => out.push_str(LEAF_POOL[*k as usize].1),
        TestNode::Branch(_, children) => {
            for child in children {
                collect_source(child, out);
            }
        }
    }
}

fn add_node(
    builder: &mut SyntaxTreeBuilder,
    parent: Option<encore::syntax::NodeId>,
    node: &TestNode,
    offset: &mut usize,
) {
    match node {
        TestNode::Leaf(k) => {
            let (kind, text) = LEAF_POOL[*k as usize];
            let span = TextSpan::new(*offset, *offset + text.len());
            builder.push(parent, NodeLabel::Statement, kind, span, None);
            *offset += text.len();
        }
        TestNode::Branch(k, children) => {
            let (kind, label) = BRANCH_POOL[*k as usize];
            let span = TextSpan::new(*offset, *offset + subtree_text_len(node));
            let id = builder.push(parent, label, kind, span, None);
            for child in children {
                add_node(builder, Some(id), child, offset);
            }
        }
    }
}

fn build_tree(node: &TestNode) -> SyntaxTree {
    let mut source = String::new();
    collect_source(node, &mut source);
    let total = source.len();
    let mut builder = SyntaxTreeBuilder::new(source);
    let root = builder.push(
        None,
        NodeLabel::CompilationUnit,
        "compilation_unit",
        TextSpan::new(0, total),
        None,
    );
    let mut offset = 0;
    add_node(&mut builder, Some(root), node, &mut offset);
    builder.finish()
}

proptest! {
    #[test]
    fn generated_tree_pairs_satisfy_the_invariants(
        old_shape in node_strategy(),
        new_shape in node_strategy(),
    ) {
        let old = build_tree(&old_shape);
        let new = build_tree(&new_shape);
        check_invariants(&old, &new);
    }

    #[test]
    fn generated_tree_pairs_match_deterministically(
        old_shape in node_strategy(),
        new_shape in node_strategy(),
    ) {
        let old = build_tree(&old_shape);
        let new = build_tree(&new_shape);
        prop_assert_eq!(
            script_fingerprint(&old, &new),
            script_fingerprint(&old, &new)
        );
    }

    #[test]
    fn self_match_produces_an_empty_script(shape in node_strategy()) {
        let tree = build_tree(&shape);
        let copy = build_tree(&shape);
        let token = CancelToken::new();
        let m = TreeMatch::compute(&tree, &copy, &token).unwrap();
        prop_assert_eq!(m.len(), tree.node_count());
        let script = EditScript::build(&m, &token).unwrap();
        prop_assert!(script.is_empty());
    }
}
