//! The edit-analysis engine.
//!
//! One call analyzes one document: match the old and new trees, build the
//! edit script, then run the rude-edit check, semantic classification,
//! active-statement remapping and line-edit computation over that script.
//! The engine is a pure function of its inputs; the only state shared
//! between calls is the session's memoized capability set, so independent
//! documents analyze in parallel safely.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::document::Document;

pub mod active;
pub mod capabilities;
pub mod line_edits;
pub mod matching;
pub mod rude;
pub mod script;
pub mod semantic;

pub use active::{
    exception_regions, ActiveStatement, ActiveStatementFlags, ExceptionRegion,
    ExceptionRegionSet, HandlerKind, RemappedActiveStatement, StatementState,
};
pub use capabilities::{CapabilitySession, EditCapabilities};
pub use line_edits::{LineEditSet, SourceLineUpdate};
pub use matching::{SyntaxMap, TreeMatch};
pub use rude::{RudeEditDiagnostic, RudeEditKind};
pub use script::{EditScript, TreeEdit};
pub use semantic::{
    merge_partial_edits, SemanticEditInfo, SemanticEditKind, SymbolKey, SymbolModel,
};

// --- Cancellation --- //

/// Cooperative cancellation signal checked at node-visit granularity. A
/// cancelled analysis returns no result rather than a truncated one; all
/// intermediate state is local to the call.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    pub fn check(&self) -> Result<(), AnalysisError> {
        if self.is_cancelled() {
            Err(AnalysisError::Cancelled)
        } else {
            Ok(())
        }
    }
}

// --- Errors --- //

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("analysis was cancelled")]
    Cancelled,
    #[error("failed to parse document: {0}")]
    Parse(String),
}

// --- Per-document result --- //

/// Everything the engine has to say about one edited document.
///
/// Gating rules: without changes there is nothing to report; with rude edits
/// only the diagnostics are trustworthy, so semantic edits, line edits,
/// active statements and exception regions are withheld.
#[derive(Debug, Serialize)]
pub struct DocumentAnalysisResult {
    pub document: String,
    pub has_changes: bool,
    pub semantic_edits: Option<Vec<SemanticEditInfo>>,
    pub rude_edits: Vec<RudeEditDiagnostic>,
    pub active_statements: Option<Vec<RemappedActiveStatement>>,
    pub exception_regions: Option<Vec<ExceptionRegionSet>>,
    pub line_edits: Option<Vec<SourceLineUpdate>>,
}

impl DocumentAnalysisResult {
    fn unchanged(document: String) -> Self {
        Self {
            document,
            has_changes: false,
            semantic_edits: None,
            rude_edits: Vec::new(),
            active_statements: None,
            exception_regions: None,
            line_edits: None,
        }
    }

    fn blocked(document: String, rude_edits: Vec<RudeEditDiagnostic>) -> Self {
        Self {
            document,
            has_changes: true,
            semantic_edits: None,
            rude_edits,
            active_statements: None,
            exception_regions: None,
            line_edits: None,
        }
    }
}

// --- The pipeline --- //

/// Analyze one document edit against the previous snapshot.
///
/// `active` holds the statements the debugger tracked in the old document;
/// `capabilities` is the resolved capability set of the attached runtime.
pub fn analyze_document(
    old: &Document,
    new: &Document,
    active: &[ActiveStatement],
    capabilities: EditCapabilities,
    token: &CancelToken,
) -> Result<DocumentAnalysisResult, AnalysisError> {
    token.check()?;
    debug!("analyzing {}", new.name);

    if old.source == new.source {
        return Ok(DocumentAnalysisResult::unchanged(new.name.clone()));
    }

    let m = TreeMatch::compute(&old.tree, &new.tree, token)?;
    let script = EditScript::build(&m, token)?;

    let rude_edits = rude::detect(&m, &script, capabilities, active, token)?;
    if !rude_edits.is_empty() {
        debug!("{}: {} rude edit(s), result is terminal", new.name, rude_edits.len());
        return Ok(DocumentAnalysisResult::blocked(new.name.clone(), rude_edits));
    }

    let line_edits = line_edits::compute(&m, &script, token)?;

    let old_model = SymbolModel::build(&old.tree);
    let new_model = SymbolModel::build(&new.tree);
    let semantic_edits =
        semantic::classify(&m, &script, &old_model, &new_model, &line_edits, token)?;

    let remapped = active::remap(&m, active, token)?;
    let regions = remapped
        .iter()
        .map(|s| s.exception_regions.clone())
        .collect();

    Ok(DocumentAnalysisResult {
        document: new.name.clone(),
        has_changes: true,
        semantic_edits: Some(semantic_edits),
        rude_edits: Vec::new(),
        active_statements: Some(remapped),
        exception_regions: Some(regions),
        line_edits: Some(line_edits.updates().to_vec()),
    })
}

// --- Session --- //

/// One old/new document pair plus the statements tracked in the old version.
#[derive(Debug)]
pub struct DocumentPair {
    pub old: Document,
    pub new: Document,
    pub active_statements: Vec<ActiveStatement>,
}

/// Session state shared across all documents of one edit-and-continue round:
/// the lazily resolved capability set.
#[derive(Debug)]
pub struct AnalysisSession {
    capabilities: CapabilitySession,
}

impl AnalysisSession {
    pub fn new(capabilities: CapabilitySession) -> Self {
        Self { capabilities }
    }

    pub fn capabilities(&self) -> EditCapabilities {
        self.capabilities.resolve()
    }

    /// Analyze independent documents in parallel. Results keep input order.
    pub fn analyze_all(
        &self,
        pairs: Vec<DocumentPair>,
        token: &CancelToken,
    ) -> Result<Vec<DocumentAnalysisResult>, AnalysisError> {
        use rayon::prelude::*;

        let caps = self.capabilities();
        pairs
            .into_par_iter()
            .map(|pair| {
                analyze_document(&pair.old, &pair.new, &pair.active_statements, caps, token)
            })
            .collect()
    }

    /// Session-level merge of per-document semantic edits; see
    /// [`semantic::merge_partial_edits`].
    pub fn merged_semantic_edits(
        &self,
        results: &[DocumentAnalysisResult],
    ) -> Vec<SemanticEditInfo> {
        merge_partial_edits(
            results
                .iter()
                .filter_map(|r| r.semantic_edits.clone())
                .collect::<Vec<_>>(),
        )
    }
}

// --- Tests --- //

#[cfg(test)]
mod tests {
    use super::*;
    use crate::languages::RegisteredLanguage;

    fn doc(src: &str, version: u64) -> Document {
        let lang: RegisteredLanguage = "cs".parse().unwrap();
        Document::parse(lang, "test.cs", src.to_string(), version).unwrap()
    }

    #[test]
    fn unchanged_document_reports_nothing() {
        let src = "class C { void M() { } }";
        let result = analyze_document(
            &doc(src, 0),
            &doc(src, 1),
            &[],
            EditCapabilities::net6(),
            &CancelToken::new(),
        )
        .unwrap();
        assert!(!result.has_changes);
        assert!(result.semantic_edits.is_none());
        assert!(result.active_statements.is_none());
        assert!(result.exception_regions.is_none());
        assert!(result.line_edits.is_none());
        assert!(result.rude_edits.is_empty());
    }

    #[test]
    fn rude_edits_make_the_result_terminal() {
        let result = analyze_document(
            &doc("class C { void M() { } }", 0),
            &doc("class C { void N() { } }", 1),
            &[],
            EditCapabilities::net6(),
            &CancelToken::new(),
        )
        .unwrap();
        assert!(result.has_changes);
        assert!(!result.rude_edits.is_empty());
        assert!(result.semantic_edits.is_none());
        assert!(result.line_edits.is_none());
        assert!(result.exception_regions.is_none());
        assert!(result.active_statements.is_none());
    }

    #[test]
    fn cancelled_analysis_returns_no_result() {
        let token = CancelToken::new();
        token.cancel();
        let err = analyze_document(
            &doc("class C { void M() { int x = 1; } }", 0),
            &doc("class C { void M() { int x = 2; } }", 1),
            &[],
            EditCapabilities::net6(),
            &token,
        );
        assert!(matches!(err, Err(AnalysisError::Cancelled)));
    }

    #[test]
    fn parallel_session_analysis_preserves_order() {
        let session = AnalysisSession::new(CapabilitySession::fixed(EditCapabilities::net6()));
        let pairs = (0..8)
            .map(|i| {
                let old = format!("class C{i} {{ void M() {{ int x = 1; }} }}");
                let new = format!("class C{i} {{ void M() {{ int x = 2; }} }}");
                DocumentPair {
                    old: doc(&old, 0),
                    new: doc(&new, 1),
                    active_statements: Vec::new(),
                }
            })
            .collect();
        let results = session
            .analyze_all(pairs, &CancelToken::new())
            .unwrap();
        assert_eq!(results.len(), 8);
        for result in &results {
            assert!(result.has_changes);
            assert_eq!(result.semantic_edits.as_ref().map(|e| e.len()), Some(1));
        }
    }
}
