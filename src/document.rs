//! A parsed, versioned source document.

use crate::analysis::AnalysisError;
use crate::diff;
use crate::languages::RegisteredLanguage;
use crate::syntax::SyntaxTree;
use tracing::debug;

/// One source file snapshot: text plus its syntax arena. Documents are
/// immutable; an edit produces a successor with a bumped version.
#[derive(Debug, Clone)]
pub struct Document {
    pub name: String,
    pub source: String,
    pub tree: SyntaxTree,
    pub language: RegisteredLanguage,
    pub version: u64,
}

impl Document {
    pub fn parse(
        language: RegisteredLanguage,
        name: impl Into<String>,
        source: String,
        version: u64,
    ) -> Result<Self, AnalysisError> {
        let tree = language
            .parse_str(&source, version)
            .map_err(AnalysisError::Parse)?;
        Ok(Self {
            name: name.into(),
            source,
            tree,
            language,
            version,
        })
    }

    /// Parse the next revision of this document, reusing the previous parse
    /// tree through tree-sitter's incremental path.
    pub fn parse_successor(&self, new_source: String) -> Result<Document, AnalysisError> {
        let mut parser = self.language.parser().map_err(AnalysisError::Parse)?;
        let mut old_ts = parser
            .parse(&self.source, None)
            .ok_or_else(|| AnalysisError::Parse(format!("{}: parser produced no tree", self.name)))?;

        let (edits, new_ts) =
            diff::incremental_parse(&mut parser, &self.source, &new_source, &mut old_ts)
                .map_err(AnalysisError::Parse)?;
        debug!(
            "{}: reparsed v{} -> v{} with {} source edit(s)",
            self.name,
            self.version,
            self.version + 1,
            edits.len()
        );

        let version = self.version + 1;
        let tree = self
            .language
            .lower(&new_ts, &new_source, version)
            .map_err(AnalysisError::Parse)?;
        Ok(Document {
            name: self.name.clone(),
            source: new_source,
            tree,
            language: self.language.clone(),
            version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successor_bumps_version_and_reparses() {
        let lang: RegisteredLanguage = "cs".parse().unwrap();
        let old = Document::parse(
            lang,
            "a.cs",
            "class C { void M() { int x = 1; } }".to_string(),
            0,
        )
        .unwrap();
        let new = old
            .parse_successor("class C { void M() { int x = 2; } }".to_string())
            .unwrap();
        assert_eq!(new.version, 1);
        assert_eq!(new.tree.version(), 1);
        assert!(new.source.contains("x = 2"));
        assert_eq!(old.tree.node_count(), new.tree.node_count());
    }
}
