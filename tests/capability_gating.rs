//! Capability gating: an edit is rude iff its required capability is absent,
//! and granting the capability removes the diagnostic on the same input.

use encore::analysis::{
    analyze_document, CancelToken, EditCapabilities, RudeEditKind, SemanticEditKind,
};
use encore::document::Document;
use encore::languages::RegisteredLanguage;

fn doc(src: &str, version: u64) -> Document {
    let lang: RegisteredLanguage = "cs".parse().unwrap();
    Document::parse(lang, "test.cs", src.to_string(), version).unwrap()
}

fn rude_kinds(old: &str, new: &str, caps: EditCapabilities) -> Vec<RudeEditKind> {
    analyze_document(&doc(old, 0), &doc(new, 1), &[], caps, &CancelToken::new())
        .unwrap()
        .rude_edits
        .iter()
        .map(|d| d.kind)
        .collect()
}

struct Gated {
    old: &'static str,
    new: &'static str,
    capability: EditCapabilities,
}

const GATED_EDITS: &[Gated] = &[
    Gated {
        old: "class C\n{\n}\n",
        new: "class C\n{\n    void M() { }\n}\n",
        capability: EditCapabilities::ADD_METHOD_TO_EXISTING_TYPE,
    },
    Gated {
        old: "class C\n{\n}\n",
        new: "class C\n{\n    private int f;\n}\n",
        capability: EditCapabilities::ADD_INSTANCE_FIELD_TO_EXISTING_TYPE,
    },
    Gated {
        old: "class C\n{\n}\n",
        new: "class C\n{\n    static int f;\n}\n",
        capability: EditCapabilities::ADD_STATIC_FIELD_TO_EXISTING_TYPE,
    },
    Gated {
        old: "class C\n{\n}\n",
        new: "class C\n{\n}\nclass D\n{\n}\n",
        capability: EditCapabilities::NEW_TYPE_DEFINITION,
    },
];

#[test]
fn gated_edits_are_rude_exactly_without_their_capability() {
    for case in GATED_EDITS {
        let without = rude_kinds(case.old, case.new, EditCapabilities::BASELINE);
        assert!(
            without.contains(&RudeEditKind::InsertNotSupportedByRuntime),
            "expected a rude edit for {:?} without {:?}",
            case.new,
            case.capability
        );

        let with = rude_kinds(case.old, case.new, case.capability);
        assert!(
            with.is_empty(),
            "capability {:?} should clear the diagnostic, got {:?}",
            case.capability,
            with
        );
    }
}

#[test]
fn rerunning_with_the_capability_is_idempotent() {
    let case = &GATED_EDITS[1];

    // Absent, twice: same single diagnostic both times.
    let first = rude_kinds(case.old, case.new, EditCapabilities::BASELINE);
    let second = rude_kinds(case.old, case.new, EditCapabilities::BASELINE);
    assert_eq!(first, second);

    // Present, twice: clean both times.
    assert!(rude_kinds(case.old, case.new, case.capability).is_empty());
    assert!(rude_kinds(case.old, case.new, case.capability).is_empty());
}

#[test]
fn attribute_changes_are_gated_by_change_custom_attributes() {
    let old = "class C\n{\n    void M() { }\n}\n";
    let new = "class C\n{\n    [System.Obsolete]\n    void M() { }\n}\n";

    let without = rude_kinds(old, new, EditCapabilities::net5());
    assert!(without.contains(&RudeEditKind::AttributesUpdate));

    let with = rude_kinds(old, new, EditCapabilities::net6());
    assert!(with.is_empty(), "net6 allows attribute changes, got {:?}", with);
}

#[test]
fn generic_method_bodies_are_gated() {
    let old = "class C\n{\n    void M<T>() { int x = 1; }\n}\n";
    let new = "class C\n{\n    void M<T>() { int x = 2; }\n}\n";

    let without = rude_kinds(old, new, EditCapabilities::net5());
    assert!(without.contains(&RudeEditKind::GenericMethodUpdate));

    let with = rude_kinds(old, new, EditCapabilities::net6());
    assert!(with.is_empty(), "net6 allows generic updates, got {:?}", with);
}

#[test]
fn allowed_edit_produces_the_semantic_edit_after_the_capability_arrives() {
    let case = &GATED_EDITS[0];

    let blocked = analyze_document(
        &doc(case.old, 0),
        &doc(case.new, 1),
        &[],
        EditCapabilities::BASELINE,
        &CancelToken::new(),
    )
    .unwrap();
    assert!(blocked.semantic_edits.is_none());

    let allowed = analyze_document(
        &doc(case.old, 0),
        &doc(case.new, 1),
        &[],
        case.capability,
        &CancelToken::new(),
    )
    .unwrap();
    let edits = allowed.semantic_edits.expect("semantic edits present");
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0].kind, SemanticEditKind::Insert);
    assert_eq!(edits[0].symbol.to_string(), "C.M()");
}
