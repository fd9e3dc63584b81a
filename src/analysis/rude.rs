//! Rude-edit detection: the policy layer deciding which edits a running
//! process can absorb.
//!
//! Every edit in the script is checked against a table of structural rules
//! and against the session's capability set; edits overlapping an active
//! statement get a stricter second table. Diagnostics accumulate; the
//! detector never stops at the first offence, so one pass reports everything
//! wrong with a document.

use super::active::{handler_ancestors, handler_signature, ActiveStatement};
use super::capabilities::EditCapabilities;
use super::matching::TreeMatch;
use super::script::{EditScript, TreeEdit};
use super::{AnalysisError, CancelToken};
use crate::syntax::{LineSpan, NodeId, NodeLabel, SyntaxTree, TextSpan};
use serde::Serialize;
use std::collections::HashSet;
use strum_macros::Display;

// --- Diagnostic kinds --- //

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
pub enum RudeEditKind {
    InsertNotSupportedByRuntime,
    DeleteNotSupportedByRuntime,
    InsertAbstractMember,
    Renamed,
    ModifiersUpdate,
    GenericArityUpdate,
    GenericMethodUpdate,
    AttributesUpdate,
    ParameterUpdate,
    TypeUpdate,
    ChangingNamespace,
    MoveNotSupportedByRuntime,
    DeleteActiveStatement,
    MoveActiveStatement,
    ChangingExceptionRegions,
}

impl RudeEditKind {
    pub fn message(&self) -> &'static str {
        match self {
            Self::InsertNotSupportedByRuntime => {
                "adding this declaration is not supported by the attached runtime"
            }
            Self::DeleteNotSupportedByRuntime => {
                "deleting a declaration requires restarting the application"
            }
            Self::InsertAbstractMember => {
                "adding an abstract, virtual or override member requires restarting the application"
            }
            Self::Renamed => "renaming a declaration requires restarting the application",
            Self::ModifiersUpdate => {
                "changing declaration modifiers requires restarting the application"
            }
            Self::GenericArityUpdate => {
                "changing the number of type parameters requires restarting the application"
            }
            Self::GenericMethodUpdate => {
                "updating a generic method is not supported by the attached runtime"
            }
            Self::AttributesUpdate => {
                "changing attributes is not supported by the attached runtime"
            }
            Self::ParameterUpdate => {
                "changing parameters is not supported by the attached runtime"
            }
            Self::TypeUpdate => {
                "changing the signature of a declaration requires restarting the application"
            }
            Self::ChangingNamespace => {
                "moving a declaration to a different namespace requires restarting the application"
            }
            Self::MoveNotSupportedByRuntime => {
                "moving a declaration to a different container requires restarting the application"
            }
            Self::DeleteActiveStatement => {
                "deleting a statement that is currently executing is not allowed"
            }
            Self::MoveActiveStatement => {
                "moving a statement that is currently executing is not allowed"
            }
            Self::ChangingExceptionRegions => {
                "changing exception handlers around an active statement is not allowed"
            }
        }
    }
}

/// A change the running process cannot apply. Terminal for its document.
#[derive(Debug, Clone, Serialize)]
pub struct RudeEditDiagnostic {
    pub kind: RudeEditKind,
    pub span: TextSpan,
    pub line_span: LineSpan,
    /// First line of the offending construct.
    pub context: Option<String>,
}

// --- Detection --- //

pub fn detect(
    m: &TreeMatch<'_>,
    script: &EditScript,
    capabilities: EditCapabilities,
    active: &[ActiveStatement],
    token: &CancelToken,
) -> Result<Vec<RudeEditDiagnostic>, AnalysisError> {
    let mut detector = Detector {
        m,
        caps: capabilities,
        diags: Vec::new(),
        decl_checked: HashSet::new(),
        reported: HashSet::new(),
    };

    for edit in script.edits() {
        token.check()?;
        match *edit {
            TreeEdit::Insert { node } => detector.on_insert(node),
            TreeEdit::Delete { node } => detector.on_delete(node),
            TreeEdit::Update { old, new } => detector.on_update(old, new, false),
            TreeEdit::Move { old, new, .. } => detector.on_update(old, new, true),
        }
    }
    detector.check_active_statements(active, token)?;

    Ok(detector.diags)
}

enum Side {
    Old,
    New,
}

/// Where an edited node sits relative to its enclosing declaration.
#[derive(Default)]
struct EditContext {
    in_attribute: bool,
    in_parameters: bool,
    in_type_parameters: bool,
    in_lambda: bool,
    in_body: bool,
    declarator: Option<NodeId>,
    decl: Option<NodeId>,
}

fn context_of(tree: &SyntaxTree, id: NodeId) -> EditContext {
    let mut ctx = EditContext::default();
    for a in std::iter::once(id).chain(tree.ancestors(id)) {
        let node = tree.node(a);
        match node.label {
            NodeLabel::AttributeList => ctx.in_attribute = true,
            NodeLabel::ParameterList => ctx.in_parameters = true,
            NodeLabel::TypeParameterList => ctx.in_type_parameters = true,
            NodeLabel::Lambda | NodeLabel::LocalFunction => ctx.in_lambda = true,
            NodeLabel::Block => ctx.in_body = true,
            NodeLabel::VariableDeclarator => ctx.declarator = Some(a),
            label if label.is_member_declaration() || label.is_type_declaration() => {
                ctx.decl = Some(a);
                break;
            }
            _ => {
                // Expression bodies, accessors and member lists count as
                // bodies even though the grammar gives them their own
                // wrappers.
                if matches!(
                    node.kind,
                    "arrow_expression_clause"
                        | "accessor_list"
                        | "equals_value_clause"
                        | "declaration_list"
                        | "enum_member_declaration_list"
                ) {
                    ctx.in_body = true;
                }
            }
        }
    }
    ctx
}

struct Detector<'a, 't> {
    m: &'a TreeMatch<'t>,
    caps: EditCapabilities,
    diags: Vec<RudeEditDiagnostic>,
    decl_checked: HashSet<NodeId>,
    reported: HashSet<(RudeEditKind, usize, usize)>,
}

impl Detector<'_, '_> {
    fn report(&mut self, kind: RudeEditKind, tree: &SyntaxTree, node: NodeId) {
        let n = tree.node(node);
        if !self.reported.insert((kind, n.span.start, n.span.end)) {
            return;
        }
        let context = tree.text(node).lines().next().map(|l| l.trim().to_string());
        self.diags.push(RudeEditDiagnostic {
            kind,
            span: n.span,
            line_span: n.line_span,
            context,
        });
    }

    fn on_insert(&mut self, n: NodeId) {
        let new = self.m.new_tree();
        let label = new.node(n).label;

        // A declarator added to an existing field declaration introduces a
        // fresh symbol just like a new field declaration does.
        if label == NodeLabel::VariableDeclarator {
            if let Some(field) = new.enclosing_member(n).filter(|&f| {
                new.node(f).label == NodeLabel::Field && self.m.old_counterpart(f).is_some()
            }) {
                let required = if new.has_modifier(field, "static") || new.has_modifier(field, "const")
                {
                    EditCapabilities::ADD_STATIC_FIELD_TO_EXISTING_TYPE
                } else {
                    EditCapabilities::ADD_INSTANCE_FIELD_TO_EXISTING_TYPE
                };
                if !self.caps.contains(required) {
                    self.report(RudeEditKind::InsertNotSupportedByRuntime, new, n);
                }
            }
            return;
        }

        if label.is_type_declaration() {
            // Members of a brand-new type ride along with it; only the type
            // itself is checked.
            let parent_matched = new
                .parent(n)
                .is_some_and(|p| self.m.old_counterpart(p).is_some());
            if parent_matched && !self.caps.contains(EditCapabilities::NEW_TYPE_DEFINITION) {
                self.report(RudeEditKind::InsertNotSupportedByRuntime, new, n);
            }
            return;
        }

        if label.is_member_declaration() {
            let Some(ty) = new.enclosing_type(n) else {
                return;
            };
            if self.m.old_counterpart(ty).is_none() {
                return;
            }
            let mods = new.modifiers(n);
            if mods
                .iter()
                .any(|m| matches!(*m, "abstract" | "virtual" | "override"))
            {
                self.report(RudeEditKind::InsertAbstractMember, new, n);
                return;
            }
            let required = match label {
                NodeLabel::Field => {
                    if new.has_modifier(n, "static") || new.has_modifier(n, "const") {
                        EditCapabilities::ADD_STATIC_FIELD_TO_EXISTING_TYPE
                    } else {
                        EditCapabilities::ADD_INSTANCE_FIELD_TO_EXISTING_TYPE
                    }
                }
                NodeLabel::EnumMember => {
                    // Inserting enum members renumbers the whole enum.
                    self.report(RudeEditKind::InsertNotSupportedByRuntime, new, n);
                    return;
                }
                _ => {
                    if new.generic_arity(n) > 0 {
                        EditCapabilities::GENERIC_ADD_METHOD_TO_EXISTING_TYPE
                    } else {
                        EditCapabilities::ADD_METHOD_TO_EXISTING_TYPE
                    }
                }
            };
            if !self.caps.contains(required) {
                self.report(RudeEditKind::InsertNotSupportedByRuntime, new, n);
            }
            return;
        }

        self.common_rules(Side::New, n);
    }

    fn on_delete(&mut self, o: NodeId) {
        let old = self.m.old_tree();
        let label = old.node(o).label;

        if label == NodeLabel::VariableDeclarator {
            let field_matched = old.enclosing_member(o).is_some_and(|f| {
                old.node(f).label == NodeLabel::Field && self.m.new_counterpart(f).is_some()
            });
            if field_matched {
                self.report(RudeEditKind::DeleteNotSupportedByRuntime, old, o);
            }
            return;
        }

        if label.is_member_declaration() || label.is_type_declaration() {
            // Only the topmost deleted declaration reports; children of a
            // deleted type are implied.
            let parent_matched = old
                .parent(o)
                .is_some_and(|p| self.m.new_counterpart(p).is_some());
            if parent_matched {
                self.report(RudeEditKind::DeleteNotSupportedByRuntime, old, o);
            }
            return;
        }

        self.common_rules(Side::Old, o);
    }

    fn on_update(&mut self, o: NodeId, n: NodeId, moved: bool) {
        let old = self.m.old_tree();
        let new = self.m.new_tree();
        let label = new.node(n).label;

        if moved && (label.is_member_declaration() || label.is_type_declaration()) {
            if old.namespace_path(o) != new.namespace_path(n) {
                self.report(RudeEditKind::ChangingNamespace, new, n);
            } else {
                self.report(RudeEditKind::MoveNotSupportedByRuntime, new, n);
            }
            return;
        }

        // A pure position shift carries no semantic change; the line-edit
        // pass owns it.
        if !moved && old.text(o) == new.text(n) {
            return;
        }

        if label == NodeLabel::Namespace {
            if old.node(o).name != new.node(n).name {
                self.report(RudeEditKind::ChangingNamespace, new, n);
            }
            return;
        }

        if label.is_member_declaration() || label.is_type_declaration() {
            self.check_decl_pair(o, n);
            return;
        }

        self.common_rules(Side::New, n);
    }

    /// Rules shared by all edits landing inside a matched declaration.
    fn common_rules(&mut self, side: Side, id: NodeId) {
        let old = self.m.old_tree();
        let new = self.m.new_tree();
        let tree = match side {
            Side::Old => old,
            Side::New => new,
        };

        let ctx = context_of(tree, id);
        let Some(decl) = ctx.decl else {
            return;
        };
        let (od, nd) = match side {
            Side::Old => match self.m.new_counterpart(decl) {
                Some(nd) => (decl, nd),
                None => return,
            },
            Side::New => match self.m.old_counterpart(decl) {
                Some(od) => (od, decl),
                None => return,
            },
        };

        if ctx.in_attribute {
            if !self.caps.contains(EditCapabilities::CHANGE_CUSTOM_ATTRIBUTES) {
                self.report(RudeEditKind::AttributesUpdate, new, nd);
            }
            return;
        }

        if ctx.in_body {
            // Body updates are the baseline of edit-and-continue; generic
            // methods additionally need runtime support.
            if new.generic_arity(nd) > 0
                && !self.caps.contains(EditCapabilities::GENERIC_UPDATE_METHOD)
            {
                self.report(RudeEditKind::GenericMethodUpdate, new, nd);
            }
            return;
        }

        // Edits inside a field declarator: a changed name is a rename, a
        // changed initializer is a constructor-body update.
        if let Some(d) = ctx.declarator {
            let pair = match side {
                Side::Old => self.m.new_counterpart(d).map(|dn| (d, dn)),
                Side::New => self.m.old_counterpart(d).map(|dn| (dn, d)),
            };
            if let Some((d_old, d_new)) = pair {
                if old.declaration_name(d_old) != new.declaration_name(d_new) {
                    self.report(RudeEditKind::Renamed, new, d_new);
                }
            }
            return;
        }

        if ctx.in_type_parameters {
            self.check_decl_pair(od, nd);
            if old.generic_arity(od) == new.generic_arity(nd) {
                self.report(RudeEditKind::Renamed, new, nd);
            }
            return;
        }

        if ctx.in_parameters && !ctx.in_lambda {
            if !self.caps.contains(EditCapabilities::UPDATE_PARAMETERS) {
                self.report(RudeEditKind::ParameterUpdate, new, nd);
            }
            return;
        }

        if ctx.in_lambda {
            return;
        }

        // Header edit: the pair comparison names the precise offence where it
        // can; anything else is a signature change.
        self.check_decl_pair(od, nd);
        let node = tree.node(id);
        let is_name_token = tree.parent(id) == Some(decl)
            && tree.node(decl).name.as_deref() == Some(tree.text(id));
        if node.label != NodeLabel::Modifier && !is_name_token {
            self.report(RudeEditKind::TypeUpdate, new, nd);
        }
    }

    fn check_decl_pair(&mut self, od: NodeId, nd: NodeId) {
        if !self.decl_checked.insert(od) {
            return;
        }
        let old = self.m.old_tree();
        let new = self.m.new_tree();

        if let (Some(a), Some(b)) = (&old.node(od).name, &new.node(nd).name) {
            if a != b {
                self.report(RudeEditKind::Renamed, new, nd);
            }
        }

        let mut old_mods = old.modifiers(od);
        let mut new_mods = new.modifiers(nd);
        old_mods.sort_unstable();
        new_mods.sort_unstable();
        if old_mods != new_mods {
            self.report(RudeEditKind::ModifiersUpdate, new, nd);
        }

        if old.generic_arity(od) != new.generic_arity(nd) {
            self.report(RudeEditKind::GenericArityUpdate, new, nd);
        }

        if old.node(od).label.is_member_declaration()
            && old.parameter_texts(od) != new.parameter_texts(nd)
            && !self.caps.contains(EditCapabilities::UPDATE_PARAMETERS)
        {
            self.report(RudeEditKind::ParameterUpdate, new, nd);
        }

        if old.namespace_path(od) != new.namespace_path(nd) {
            self.report(RudeEditKind::ChangingNamespace, new, nd);
        }
    }

    /// The stricter table for statements a paused frame is executing.
    fn check_active_statements(
        &mut self,
        active: &[ActiveStatement],
        token: &CancelToken,
    ) -> Result<(), AnalysisError> {
        let old = self.m.old_tree();
        let new = self.m.new_tree();

        for stmt in active {
            token.check()?;
            let Some(old_node) = old.smallest_statement_covering(stmt.span) else {
                continue;
            };

            match self.m.new_counterpart(old_node) {
                None => {
                    let tolerated =
                        !stmt.is_non_leaf() && self.equivalent_statement_remains(old_node);
                    if !tolerated {
                        self.report(RudeEditKind::DeleteActiveStatement, old, old_node);
                    }
                }
                Some(new_node) => {
                    if !stmt.is_non_leaf() {
                        continue;
                    }
                    let moved = match (old.parent(old_node), new.parent(new_node)) {
                        (Some(op), Some(np)) => self.m.new_counterpart(op) != Some(np),
                        _ => false,
                    };
                    if moved {
                        self.report(RudeEditKind::MoveActiveStatement, old, old_node);
                    }

                    let old_handlers = handler_ancestors(old, old_node);
                    let new_handlers = handler_ancestors(new, new_node);
                    if new_handlers.len() < old_handlers.len() {
                        self.report(RudeEditKind::ChangingExceptionRegions, old, old_node);
                    } else {
                        let changed =
                            old_handlers.iter().zip(new_handlers.iter()).any(|(&a, &b)| {
                                old.node(a).label != new.node(b).label
                                    || handler_signature(old, a) != handler_signature(new, b)
                            });
                        if changed {
                            self.report(RudeEditKind::ChangingExceptionRegions, old, old_node);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Leaf frames tolerate a deleted statement if a token-identical one is
    /// still reachable in the mapped method.
    fn equivalent_statement_remains(&self, old_node: NodeId) -> bool {
        let old = self.m.old_tree();
        let new = self.m.new_tree();
        let Some(old_member) = old.enclosing_member(old_node) else {
            return false;
        };
        let Some(new_member) = self.m.new_counterpart(old_member) else {
            return false;
        };
        new.preorder(new_member)
            .into_iter()
            .any(|id| new.node(id).label.is_statement() && old.tokens_equal(old_node, new, id))
    }
}

// --- Tests --- //

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::languages::RegisteredLanguage;

    fn run(old_src: &str, new_src: &str, caps: EditCapabilities) -> Vec<RudeEditDiagnostic> {
        let lang: RegisteredLanguage = "cs".parse().unwrap();
        let old = Document::parse(lang.clone(), "test.cs", old_src.to_string(), 0).unwrap();
        let new = Document::parse(lang, "test.cs", new_src.to_string(), 1).unwrap();
        let token = CancelToken::new();
        let m = TreeMatch::compute(&old.tree, &new.tree, &token).unwrap();
        let script = EditScript::build(&m, &token).unwrap();
        detect(&m, &script, caps, &[], &token).unwrap()
    }

    fn kinds(diags: &[RudeEditDiagnostic]) -> Vec<RudeEditKind> {
        diags.iter().map(|d| d.kind).collect()
    }

    #[test]
    fn body_update_is_not_rude() {
        let diags = run(
            "class C { void M() { int x = 1; } }",
            "class C { void M() { int x = 2; } }",
            EditCapabilities::net5(),
        );
        assert!(diags.is_empty(), "unexpected: {:?}", kinds(&diags));
    }

    #[test]
    fn renaming_a_method_is_rude() {
        let diags = run(
            "class C { void M() { } }",
            "class C { void N() { } }",
            EditCapabilities::net6(),
        );
        assert!(kinds(&diags).contains(&RudeEditKind::Renamed));
    }

    #[test]
    fn changing_modifiers_is_rude() {
        let diags = run(
            "class C { public void M() { } }",
            "class C { private void M() { } }",
            EditCapabilities::net6(),
        );
        assert!(kinds(&diags).contains(&RudeEditKind::ModifiersUpdate));
    }

    #[test]
    fn deleting_a_member_is_rude() {
        let diags = run(
            "class C { void M() { } void N() { } }",
            "class C { void M() { } }",
            EditCapabilities::net6(),
        );
        assert_eq!(kinds(&diags), vec![RudeEditKind::DeleteNotSupportedByRuntime]);
    }

    #[test]
    fn parameter_changes_respect_the_capability() {
        let old = "class C { void M(int a) { } }";
        let new = "class C { void M(int a, int b) { } }";

        let without = run(old, new, EditCapabilities::net5());
        assert!(kinds(&without).contains(&RudeEditKind::ParameterUpdate));

        let with = run(old, new, EditCapabilities::net6());
        assert!(
            !kinds(&with).contains(&RudeEditKind::ParameterUpdate),
            "UpdateParameters should allow the edit"
        );
    }

    #[test]
    fn adding_an_abstract_member_is_always_rude() {
        let diags = run(
            "abstract class C { }",
            "abstract class C { public abstract void M(); }",
            EditCapabilities::net6(),
        );
        assert!(kinds(&diags).contains(&RudeEditKind::InsertAbstractMember));
    }

    #[test]
    fn new_type_requires_the_capability() {
        let old = "class C { }";
        let new = "class C { } class D { }";

        let without = run(old, new, EditCapabilities::BASELINE);
        assert!(kinds(&without).contains(&RudeEditKind::InsertNotSupportedByRuntime));

        let with = run(old, new, EditCapabilities::net5());
        assert!(with.is_empty(), "unexpected: {:?}", kinds(&with));
    }

    #[test]
    fn changing_return_type_is_rude() {
        let diags = run(
            "class C { int M() { return 1; } }",
            "class C { long M() { return 1; } }",
            EditCapabilities::net6(),
        );
        assert!(kinds(&diags).contains(&RudeEditKind::TypeUpdate));
    }

    #[test]
    fn all_rude_edits_are_reported_in_one_pass() {
        let diags = run(
            "class C { void M() { } void N() { } }",
            "class C { void M2() { } }",
            EditCapabilities::net6(),
        );
        let ks = kinds(&diags);
        assert!(ks.contains(&RudeEditKind::Renamed));
        assert!(ks.contains(&RudeEditKind::DeleteNotSupportedByRuntime));
    }
}
