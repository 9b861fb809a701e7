//! Path classification into notification categories.
//!
//! An ordered rule table maps each raw event path to a semantic category,
//! first match wins. Paths that match nothing (repository internals, scratch
//! files) are discarded silently.

use std::path::{Path, PathBuf};

use crate::config::WatchConfig;
use crate::event::Category;

/// Repository metadata directory name.
const GIT_DIR: &str = ".git";

/// Outcome of classifying one event path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub category: Category,
    /// Project-relative path, set for working tree changes only.
    pub rel_path: Option<PathBuf>,
}

impl Classified {
    fn plain(category: Category) -> Self {
        Self {
            category,
            rel_path: None,
        }
    }
}

/// Classifies event paths against a fixed project layout.
///
/// All target paths are resolved once at construction; classification itself
/// is pure path comparison and never touches the filesystem.
#[derive(Debug)]
pub struct Classifier {
    root: PathBuf,
    git_dir: PathBuf,
    index_file: PathBuf,
    refs_dir: PathBuf,
    head_file: PathBuf,
    packed_refs: PathBuf,
    reflog_file: PathBuf,
    tasks_file: PathBuf,
    notes_dirs: Vec<PathBuf>,
    note_files: Vec<PathBuf>,
}

impl Classifier {
    /// Build a classifier for a project root.
    ///
    /// `root` should already be canonicalized so it compares equal to the
    /// paths the native watcher reports.
    pub fn new(root: &Path, watch: &WatchConfig) -> Self {
        let git_dir = root.join(GIT_DIR);
        Self {
            root: root.to_path_buf(),
            index_file: git_dir.join("index"),
            refs_dir: git_dir.join("refs/heads"),
            head_file: git_dir.join("HEAD"),
            packed_refs: git_dir.join("packed-refs"),
            reflog_file: git_dir.join("logs/HEAD"),
            tasks_file: root.join(&watch.tasks_file),
            notes_dirs: watch.notes_dirs.iter().map(|d| root.join(d)).collect(),
            note_files: watch.note_files.iter().map(|f| root.join(f)).collect(),
            git_dir,
        }
    }

    /// Classify a path, or return None to discard it.
    pub fn classify(&self, path: &Path) -> Option<Classified> {
        // Ref lock and index lock scratch files live under the metadata
        // directory and never signal a finished operation.
        if path.starts_with(&self.git_dir) && path.extension().is_some_and(|e| e == "lock") {
            return None;
        }

        if path == self.index_file {
            return Some(Classified::plain(Category::RepositoryIndex));
        }

        if path.starts_with(&self.refs_dir) {
            return Some(Classified::plain(Category::RepositoryRefs));
        }

        // Branch switches rewrite HEAD; gc moves loose refs into packed-refs.
        if path == self.head_file || path == self.packed_refs {
            return Some(Classified::plain(Category::RepositoryRefs));
        }

        if path == self.reflog_file {
            return Some(Classified::plain(Category::RepositoryLog));
        }

        if path == self.tasks_file {
            return Some(Classified::plain(Category::Tasks));
        }

        if self.notes_dirs.iter().any(|dir| path.starts_with(dir)) {
            return Some(Classified::plain(Category::Notes));
        }

        if self.note_files.iter().any(|file| path == file) {
            return Some(Classified::plain(Category::Notes));
        }

        // Everything else under the root, outside repository metadata, is a
        // working tree change tagged with its relative path.
        if !path.starts_with(&self.git_dir) {
            if let Ok(rel) = path.strip_prefix(&self.root) {
                if !rel.as_os_str().is_empty() {
                    return Some(Classified {
                        category: Category::WorkingTree,
                        rel_path: Some(rel.to_path_buf()),
                    });
                }
            }
        }

        None
    }

    /// Project root this classifier resolves against.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Repository metadata directory (`<root>/.git`), whether or not it exists.
    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    /// True when the project root carries a repository metadata directory.
    pub fn is_repository(&self) -> bool {
        self.git_dir.is_dir()
    }

    pub fn index_file(&self) -> &Path {
        &self.index_file
    }

    pub fn refs_dir(&self) -> &Path {
        &self.refs_dir
    }

    pub fn head_file(&self) -> &Path {
        &self.head_file
    }

    pub fn reflog_file(&self) -> &Path {
        &self.reflog_file
    }

    pub fn tasks_file(&self) -> &Path {
        &self.tasks_file
    }

    pub fn notes_dirs(&self) -> &[PathBuf] {
        &self.notes_dirs
    }

    pub fn note_files(&self) -> &[PathBuf] {
        &self.note_files
    }
}
