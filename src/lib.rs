//! # encore
//!
//! Incremental edit-analysis engine for edit-and-continue / hot reload.
//! Given the syntax trees of a source file before and after an edit, the
//! engine computes a node correspondence and edit script, classifies it into
//! symbol-level semantic edits, reports rude edits the attached runtime
//! cannot absorb, remaps active statements and their exception regions, and
//! emits line deltas for methods that only moved.

pub mod analysis;
pub mod document;
pub mod languages;
pub mod resource;
pub mod syntax;

pub mod logging {
    use tracing_subscriber::EnvFilter;

    pub fn init() {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .init();
    }
}

pub mod diff {
    //! Text-level diffing that drives incremental reparsing: a Myers diff
    //! over the two sources yields the byte edits tree-sitter needs to reuse
    //! the old parse tree.

    use crate::syntax::LineIndex;
    use similar::{capture_diff_slices, Algorithm, DiffOp};
    use tracing::debug;
    use tree_sitter::{Parser, Point, Tree};

    #[derive(Debug, Clone)]
    pub struct SourceEdit {
        pub old_start: usize,
        pub old_end: usize,
        pub new_start: usize,
        pub new_end: usize,
    }

    /// Byte-level edits transforming `old` into `new`.
    pub fn source_edits(old: &[u8], new: &[u8]) -> Vec<SourceEdit> {
        let diff_ops = capture_diff_slices(Algorithm::Myers, old, new);
        let mut edits = Vec::new();

        for op in diff_ops {
            match op {
                DiffOp::Equal { .. } => continue,
                DiffOp::Insert {
                    old_index,
                    new_index,
                    new_len,
                } => {
                    edits.push(SourceEdit {
                        old_start: old_index,
                        old_end: old_index,
                        new_start: new_index,
                        new_end: new_index + new_len,
                    });
                }
                DiffOp::Delete {
                    old_index,
                    old_len,
                    new_index,
                } => {
                    edits.push(SourceEdit {
                        old_start: old_index,
                        old_end: old_index + old_len,
                        new_start: new_index,
                        new_end: new_index,
                    });
                }
                DiffOp::Replace {
                    old_index,
                    old_len,
                    new_index,
                    new_len,
                } => {
                    edits.push(SourceEdit {
                        old_start: old_index,
                        old_end: old_index + old_len,
                        new_start: new_index,
                        new_end: new_index + new_len,
                    });
                }
            }
        }

        edits
    }

    fn point_at(index: &LineIndex, offset: usize) -> Point {
        let pos = index.pos_for_offset(offset);
        Point {
            row: pos.line as usize,
            column: pos.column as usize,
        }
    }

    /// Reparse `new_src` reusing `old_tree`, returning the applied edits and
    /// the fresh tree.
    pub fn incremental_parse(
        parser: &mut Parser,
        old_src: &str,
        new_src: &str,
        old_tree: &mut Tree,
    ) -> Result<(Vec<SourceEdit>, Tree), String> {
        debug!(
            "incremental parse: {} -> {} bytes",
            old_src.len(),
            new_src.len()
        );

        let old_lines = LineIndex::new(old_src);
        let new_lines = LineIndex::new(new_src);
        let edits = source_edits(old_src.as_bytes(), new_src.as_bytes());

        for edit in &edits {
            old_tree.edit(&tree_sitter::InputEdit {
                start_byte: edit.old_start,
                old_end_byte: edit.old_end,
                new_end_byte: edit.new_end,
                start_position: point_at(&old_lines, edit.old_start),
                old_end_position: point_at(&old_lines, edit.old_end),
                new_end_position: point_at(&new_lines, edit.new_end),
            });
        }

        let tree = parser
            .parse(new_src, Some(old_tree))
            .ok_or_else(|| "failed to parse new source".to_string())?;
        Ok((edits, tree))
    }

}
