//! Document sources for the host layer: the working tree, a git revision, or
//! an empty placeholder for files that did not exist in the old snapshot.

use once_cell::unsync::OnceCell;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug)]
pub enum Source {
    /// Current file on disk.
    Worktree,
    /// File content at a git revision.
    Git(String),
    /// No content; stands in for a file absent from the old snapshot.
    Empty,
}

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0} is not valid UTF-8")]
    Utf8(String),
    #[error("git error: {0}")]
    Git(#[from] git2::Error),
    #[error("{0}")]
    NotFound(String),
}

/// Lazily read, content-addressed handle to one document version. Content and
/// hash are cached on first access.
pub struct Resource {
    path: PathBuf,
    source: Source,
    repo: Option<git2::Repository>,
    content_cache: OnceCell<Vec<u8>>,
    hash_cache: OnceCell<blake3::Hash>,
}

impl Resource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            source: Source::Worktree,
            repo: None,
            content_cache: OnceCell::new(),
            hash_cache: OnceCell::new(),
        }
    }

    pub fn empty() -> Self {
        Self {
            path: PathBuf::new(),
            source: Source::Empty,
            repo: None,
            content_cache: OnceCell::new(),
            hash_cache: OnceCell::new(),
        }
    }

    /// Resolve this path inside `repo_root` at revision `rev` instead of the
    /// working tree.
    pub fn with_git<P: Into<PathBuf>>(
        mut self,
        rev: String,
        repo_root: P,
    ) -> Result<Self, ResourceError> {
        let repo = git2::Repository::open(repo_root.into())?;
        self.repo = Some(repo);
        self.source = Source::Git(rev);
        Ok(self)
    }

    pub fn raw_path(&self) -> &PathBuf {
        &self.path
    }

    /// Whether the resource resolves to content. `unwrap_or(false)` treats
    /// resolution errors as absence.
    pub fn exists(&self) -> Result<bool, ResourceError> {
        match &self.source {
            Source::Worktree => Ok(self.path.exists()),
            Source::Git(rev) => {
                let repo = self.require_repo()?;
                let tree = repo.revparse_single(rev)?.peel_to_tree()?;
                Ok(tree.get_path(&self.path).is_ok())
            }
            Source::Empty => Ok(true),
        }
    }

    pub fn read_bytes(&self) -> Result<Vec<u8>, ResourceError> {
        self.content_cache
            .get_or_try_init(|| match &self.source {
                Source::Worktree => fs::read(&self.path).map_err(ResourceError::from),
                Source::Git(rev) => {
                    let repo = self.require_repo()?;
                    let tree = repo.revparse_single(rev)?.peel_to_tree()?;
                    let entry = tree.get_path(&self.path)?;
                    let blob = repo.find_blob(entry.id())?;
                    Ok(blob.content().to_vec())
                }
                Source::Empty => Ok(Vec::new()),
            })
            .cloned()
    }

    pub fn read_string(&self) -> Result<String, ResourceError> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes).map_err(|_| ResourceError::Utf8(self.path.display().to_string()))
    }

    pub fn hash(&self) -> Result<blake3::Hash, ResourceError> {
        self.hash_cache
            .get_or_try_init(|| {
                let content = self.read_bytes()?;
                Ok(blake3::hash(&content))
            })
            .copied()
    }

    fn require_repo(&self) -> Result<&git2::Repository, ResourceError> {
        self.repo
            .as_ref()
            .ok_or_else(|| ResourceError::NotFound("repository not initialized".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_resource_reads_nothing() {
        let r = Resource::empty();
        assert!(r.exists().unwrap());
        assert!(r.read_bytes().unwrap().is_empty());
        assert_eq!(r.read_string().unwrap(), "");
    }

    #[test]
    fn hash_is_cached_and_stable() {
        let r = Resource::empty();
        let first = r.hash().unwrap();
        let second = r.hash().unwrap();
        assert_eq!(first, second);
        assert_eq!(first, blake3::hash(b""));
    }

    #[test]
    fn missing_worktree_file_errors() {
        let r = Resource::new("definitely/not/a/file.cs");
        assert!(!r.exists().unwrap());
        assert!(r.read_bytes().is_err());
    }
}
