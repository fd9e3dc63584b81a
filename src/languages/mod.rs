//! Language registry for the parsing frontend.
//!
//! The engine itself is language independent; everything it needs from a
//! grammar is a tree-sitter parser plus a mapping from raw CST kinds to
//! [`NodeLabel`]s. Each language lives in its own module and is wired up with
//! the `define_language!` / `register_languages!` macro pair.

use crate::syntax::{NodeId, NodeLabel, SyntaxTree, SyntaxTreeBuilder, TextSpan};
use tracing::{debug, warn};

mod csharp;
use csharp::CSharp;

// --- The Language trait and construction macros --- //

trait Language: Default + std::fmt::Debug {
    /// The display name of the language.
    const DISPLAY_NAME: &'static str;

    /// Accepted aliases and file extensions, lowercase.
    const VARIANT_NAMES: &'static [&'static str];

    /// Get a tree-sitter parser for the language.
    /// Each call returns a fresh parser instance.
    fn parser(&self) -> Result<tree_sitter::Parser, String>;

    /// Map a tree-sitter node kind to an engine node label.
    fn map_node_kind(&self, node_kind: &'static str) -> NodeLabel;
}

#[macro_export]
/// Macro to define a new language complying with the `Language` trait.
macro_rules! define_language {
    (
        $name:ident, [$($variant_names:expr),+], $lang:path, $kind:expr
    ) => {

            #[derive(Debug, Clone)]
            /// A struct representing the language, implementing the `Language` trait.
            pub struct $name;

            impl Default for $name {
                fn default() -> Self {
                    Self
                }
            }

            impl Language for $name {
                const DISPLAY_NAME: &'static str = stringify!($name);
                const VARIANT_NAMES: &'static [&'static str] = &[$($variant_names),+];

                fn parser(&self) -> Result<tree_sitter::Parser, String> {
                    let mut parser = tree_sitter::Parser::new();
                    parser.set_language(&($lang).into())
                        .map(|_| parser)
                        .map_err(|e| format!("Failed to set parser for {}: {}", stringify!($name), e))
                }

                fn map_node_kind(&self, node_kind: &'static str) -> NodeLabel {
                    $kind(self, node_kind)
                }
            }

    };
}

/// Macro to register multiple languages, creating an enum to handle them.
macro_rules! register_languages {
    (
        $($variant:ident),+
    ) => {

        #[derive(Debug, Clone)]
        /// An enum over all registered languages, parseable from user input.
        pub enum RegisteredLanguage {
            $(
                $variant($variant),
            )+
        }

        impl std::str::FromStr for RegisteredLanguage {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.to_lowercase();
                let candidates = vec![
                    $(
                        (&$variant::VARIANT_NAMES, RegisteredLanguage::$variant($variant::default())),
                    )+
                ];
                for (aliases, language) in candidates {
                    if aliases.contains(&s.as_str()) {
                        return Ok(language);
                    }
                }
                Err(format!("Unknown language: {}", s))
            }
        }

        impl RegisteredLanguage {
            pub fn display_name(&self) -> &'static str {
                match self {
                    $(RegisteredLanguage::$variant(_) => <$variant as Language>::DISPLAY_NAME,)+
                }
            }

            pub fn variant_names(&self) -> &'static [&'static str] {
                match self {
                    $(RegisteredLanguage::$variant(_) => <$variant as Language>::VARIANT_NAMES,)+
                }
            }

            pub fn parser(&self) -> Result<tree_sitter::Parser, String> {
                match self {
                    $(RegisteredLanguage::$variant(language) => language.parser(),)+
                }
            }

            pub fn map_node_kind(&self, node_kind: &'static str) -> NodeLabel {
                match self {
                    $(RegisteredLanguage::$variant(language) => language.map_node_kind(node_kind),)+
                }
            }
        }
    };
}

// --- Language definitions --- //

register_languages! { CSharp }

// --- CST lowering --- //

impl RegisteredLanguage {
    /// Lower a parsed tree-sitter CST into the engine arena.
    pub fn lower(
        &self,
        tree: &tree_sitter::Tree,
        source: &str,
        version: u64,
    ) -> Result<SyntaxTree, String> {
        debug!("Lowering CST to syntax arena for {:?}", self);

        let mut builder = SyntaxTreeBuilder::new(source).with_version(version);
        let mut cursor = tree.walk();
        translate(self, &mut builder, &mut cursor, source, None).map_err(|e| {
            warn!("Failed to lower CST: {}", e);
            e
        })?;
        Ok(builder.finish())
    }

    /// Parse source text straight into the engine arena.
    pub fn parse_str(&self, source: &str, version: u64) -> Result<SyntaxTree, String> {
        let mut parser = self.parser()?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| format!("{} parser produced no tree", self.display_name()))?;
        self.lower(&tree, source, version)
    }
}

fn translate(
    lang: &RegisteredLanguage,
    builder: &mut SyntaxTreeBuilder,
    cursor: &mut tree_sitter::TreeCursor,
    source: &str,
    parent: Option<NodeId>,
) -> Result<Option<NodeId>, String> {
    let node = cursor.node();
    let kind = node.kind();

    // Trivia carries no tokens the engine compares; dropping it here is what
    // turns comment-only edits into pure line shifts downstream.
    if kind == "comment" {
        return Ok(None);
    }

    let label = lang.map_node_kind(kind);
    let span = TextSpan::new(node.start_byte(), node.end_byte());
    let id = builder.push(parent, label, kind, span, None);

    // The grammar's `name` field identifies declarations; surface it on the
    // declaration node itself so symbol keys never re-walk the CST.
    if let (Some(p), Some("name")) = (parent, cursor.field_name()) {
        builder.set_name(p, &source[span.start..span.end]);
    }

    if cursor.goto_first_child() {
        loop {
            translate(lang, builder, cursor, source, Some(id))?;
            if !cursor.goto_next_sibling() {
                break;
            }
        }
        cursor.goto_parent();
    }

    Ok(Some(id))
}

// --- Tests --- //

#[cfg(test)]
mod tests {
    use super::*;

    fn check_generic_features(name: &str) {
        let lang: RegisteredLanguage = name.parse().expect("Failed to parse language");
        assert!(
            lang.variant_names()
                .contains(&name.to_lowercase().as_str()),
            "Language {} not found in variants",
            name
        );
        assert!(lang.parser().is_ok(), "Failed to get parser for {}", name);
    }

    #[test]
    fn csharp_features() {
        check_generic_features("csharp");
    }

    #[test]
    fn csharp_aliases_resolve() {
        for alias in ["cs", "csharp", "c#"] {
            let lang: Result<RegisteredLanguage, _> = alias.parse();
            assert!(lang.is_ok(), "alias {} should resolve", alias);
        }
        let invalid: Result<RegisteredLanguage, _> = "cobol".parse();
        assert!(invalid.is_err());
    }

    #[test]
    fn parse_str_builds_named_declarations() {
        let lang: RegisteredLanguage = "cs".parse().unwrap();
        let tree = lang
            .parse_str("class C { void M() { } }", 0)
            .expect("parse failed");
        let names: Vec<_> = tree
            .preorder(tree.root())
            .into_iter()
            .filter_map(|id| tree.node(id).name.clone())
            .collect();
        assert!(names.contains(&"C".to_string()));
        assert!(names.contains(&"M".to_string()));
    }

    #[test]
    fn comments_are_dropped_from_the_arena() {
        let lang: RegisteredLanguage = "cs".parse().unwrap();
        let tree = lang
            .parse_str("// leading\nclass C { }", 0)
            .expect("parse failed");
        assert!(tree
            .preorder(tree.root())
            .into_iter()
            .all(|id| tree.node(id).label != NodeLabel::Comment));
    }
}
