//! Core event types: raw filesystem events, semantic categories, and the
//! notifications delivered to subscribers.
//!
//! Raw events are ephemeral. They exist between the native watcher callback
//! and the debouncer, and are never stored or replayed.

use std::path::PathBuf;
use std::time::Instant;

use bitflags::bitflags;
use notify::EventKind;
use notify::event::ModifyKind;

/// What happened to a path, reduced from the native event taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
    Renamed,
}

impl ChangeKind {
    /// Map a native event kind, dropping noise.
    ///
    /// Access and metadata-only events carry no content change and are
    /// discarded here, before they reach the queue.
    pub fn from_native(kind: EventKind) -> Option<Self> {
        match kind {
            EventKind::Create(_) => Some(Self::Created),
            EventKind::Modify(ModifyKind::Name(_)) => Some(Self::Renamed),
            EventKind::Modify(ModifyKind::Metadata(_)) => None,
            EventKind::Modify(_) => Some(Self::Modified),
            EventKind::Remove(_) => Some(Self::Deleted),
            // Access and other unclassifiable kinds are noise
            _ => None,
        }
    }
}

/// A single filesystem observation, as queued for the worker.
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
    pub at: Instant,
}

/// Convert a native notify event into raw events, one per affected path.
///
/// Returns an empty vec for noise kinds (access, metadata, unclassifiable).
pub fn raw_events_from_native(event: notify::Event) -> Vec<RawEvent> {
    let Some(kind) = ChangeKind::from_native(event.kind) else {
        return Vec::new();
    };

    let at = Instant::now();
    event
        .paths
        .into_iter()
        .map(|path| RawEvent { path, kind, at })
        .collect()
}

/// Semantic category a raw event classifies into.
///
/// Every event maps to exactly one category or is discarded; subscribers
/// receive one coalesced notification per category per quiet window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// The repository index file changed (stage/unstage, commit).
    RepositoryIndex,
    /// A branch head, the head pointer, or packed refs changed.
    RepositoryRefs,
    /// The reflog grew (new commit recorded).
    RepositoryLog,
    /// A working tree file changed; notifications carry the affected paths.
    WorkingTree,
    /// A notes or docs file changed.
    Notes,
    /// The task-definitions file changed.
    Tasks,
}

impl Category {
    /// All categories, in declaration order. Used by the degraded flush.
    pub const ALL: [Category; 6] = [
        Category::RepositoryIndex,
        Category::RepositoryRefs,
        Category::RepositoryLog,
        Category::WorkingTree,
        Category::Notes,
        Category::Tasks,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::RepositoryIndex => "repository-index",
            Category::RepositoryRefs => "repository-refs",
            Category::RepositoryLog => "repository-log",
            Category::WorkingTree => "working-tree",
            Category::Notes => "notes",
            Category::Tasks => "tasks",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

bitflags! {
    /// Set of categories a subscription receives.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CategorySet: u8 {
        const REPOSITORY_INDEX = 1 << 0;
        const REPOSITORY_REFS = 1 << 1;
        const REPOSITORY_LOG = 1 << 2;
        const WORKING_TREE = 1 << 3;
        const NOTES = 1 << 4;
        const TASKS = 1 << 5;

        /// All repository metadata categories.
        const REPOSITORY = Self::REPOSITORY_INDEX.bits()
            | Self::REPOSITORY_REFS.bits()
            | Self::REPOSITORY_LOG.bits();
    }
}

impl From<Category> for CategorySet {
    fn from(category: Category) -> Self {
        match category {
            Category::RepositoryIndex => CategorySet::REPOSITORY_INDEX,
            Category::RepositoryRefs => CategorySet::REPOSITORY_REFS,
            Category::RepositoryLog => CategorySet::REPOSITORY_LOG,
            Category::WorkingTree => CategorySet::WORKING_TREE,
            Category::Notes => CategorySet::NOTES,
            Category::Tasks => CategorySet::TASKS,
        }
    }
}

/// A coalesced change notification delivered to subscribers.
#[derive(Debug, Clone)]
pub struct Notification {
    pub category: Category,
    /// Project-relative paths observed during the window, sorted and
    /// de-duplicated. Populated for `WorkingTree` only. An empty set on a
    /// `WorkingTree` notification means "unknown, refresh everything"
    /// (degraded flush after queue overflow).
    pub paths: Vec<PathBuf>,
}

impl Notification {
    pub fn new(category: Category) -> Self {
        Self {
            category,
            paths: Vec::new(),
        }
    }

    pub fn with_paths(category: Category, paths: Vec<PathBuf>) -> Self {
        Self { category, paths }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, MetadataKind, RenameMode};

    #[test]
    fn test_change_kind_mapping() {
        assert_eq!(
            ChangeKind::from_native(EventKind::Create(CreateKind::File)),
            Some(ChangeKind::Created)
        );
        assert_eq!(
            ChangeKind::from_native(EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            Some(ChangeKind::Modified)
        );
        assert_eq!(
            ChangeKind::from_native(EventKind::Modify(ModifyKind::Name(RenameMode::Both))),
            Some(ChangeKind::Renamed)
        );
        assert_eq!(
            ChangeKind::from_native(EventKind::Remove(notify::event::RemoveKind::File)),
            Some(ChangeKind::Deleted)
        );
    }

    #[test]
    fn test_noise_kinds_dropped() {
        assert_eq!(
            ChangeKind::from_native(EventKind::Access(AccessKind::Read)),
            None
        );
        assert_eq!(
            ChangeKind::from_native(EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any))),
            None
        );
        assert_eq!(ChangeKind::from_native(EventKind::Any), None);
    }

    #[test]
    fn test_native_event_fans_out_per_path() {
        let mut event = notify::Event::new(EventKind::Create(CreateKind::File));
        event = event.add_path(PathBuf::from("/p/a.txt"));
        event = event.add_path(PathBuf::from("/p/b.txt"));

        let raw = raw_events_from_native(event);
        assert_eq!(raw.len(), 2);
        assert_eq!(raw[0].path, PathBuf::from("/p/a.txt"));
        assert_eq!(raw[1].kind, ChangeKind::Created);
    }

    #[test]
    fn test_category_set_from_category() {
        let set: CategorySet = Category::WorkingTree.into();
        assert!(set.contains(CategorySet::WORKING_TREE));
        assert!(!set.contains(CategorySet::NOTES));

        assert!(CategorySet::REPOSITORY.contains(Category::RepositoryRefs.into()));
        assert!(!CategorySet::REPOSITORY.contains(Category::Tasks.into()));
        assert!(CategorySet::all().contains(Category::Tasks.into()));
    }

    #[test]
    fn test_category_names() {
        assert_eq!(Category::RepositoryIndex.as_str(), "repository-index");
        assert_eq!(Category::WorkingTree.to_string(), "working-tree");
    }
}
