//! Per-session monitor lifecycle.
//!
//! A `FileMonitor` owns the whole notification pipeline for one open project:
//! the watch registry, the worker thread (classify + debounce), and the
//! dispatch thread that runs subscriber callbacks. Construct one per session
//! with the builder, tear it down with `shutdown` (or drop).
//!
//! Baseline coverage established at startup:
//! - repository metadata, when the project is version controlled: the index
//!   file, the branch refs directory, the reflog, and the head pointer
//! - notes and docs directories that exist
//! - the task-definitions file and configured note files that exist
//!
//! The tree-view consumer grows and shrinks coverage at runtime through
//! `add_directory_watch` / `remove_directory_watch` as nodes expand and
//! collapse.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded};

use crate::bus::{EventBus, SubscriptionId};
use crate::classifier::Classifier;
use crate::config::Settings;
use crate::debounce::DebounceTable;
use crate::error::{MonitorError, MonitorResult};
use crate::event::{Category, CategorySet, Notification};
use crate::registry::{WatchKind, WatchRegistry};
use crate::worker::MonitorWorker;

/// Change monitor for one open project session.
pub struct FileMonitor {
    root: PathBuf,
    git_dir: PathBuf,
    is_repository: bool,
    registry: Option<Arc<WatchRegistry>>,
    bus: Arc<EventBus>,
    worker: Option<JoinHandle<(usize, usize)>>,
    dispatcher: Option<JoinHandle<usize>>,
}

impl FileMonitor {
    /// Create a builder for a project root.
    pub fn builder(root: impl Into<PathBuf>) -> FileMonitorBuilder {
        FileMonitorBuilder::new(root)
    }

    /// Project root the monitor resolves paths against (canonicalized).
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether the project carried repository metadata at session start.
    pub fn is_repository(&self) -> bool {
        self.is_repository
    }

    /// Subscribe a callback to one category.
    ///
    /// Callbacks run on the monitor's dispatch thread, one notification at a
    /// time; consumers need no synchronization of their own.
    pub fn subscribe<F>(&self, category: Category, callback: F) -> SubscriptionId
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.bus.subscribe(category, callback)
    }

    /// Subscribe a callback to a set of categories.
    pub fn subscribe_set<F>(&self, categories: CategorySet, callback: F) -> SubscriptionId
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.bus.subscribe_set(categories, callback)
    }

    /// Remove a subscription. Other subscriptions are unaffected.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// Watch a directory's direct entries (tree node expanded).
    ///
    /// The path must be absolute, inside the project root, and outside the
    /// repository metadata directory; anything else is logged and skipped.
    /// Repeat calls on one path share a single native watch.
    pub fn add_directory_watch(&self, path: &Path) -> bool {
        let Some(registry) = &self.registry else {
            tracing::warn!("[monitor] add_directory_watch after shutdown");
            return false;
        };

        if !path.starts_with(&self.root) {
            tracing::warn!(
                "[monitor] refusing to watch {} outside project root",
                path.display()
            );
            return false;
        }
        if path.starts_with(&self.git_dir) {
            crate::debug_event!(
                "monitor",
                "skipping repository metadata path",
                "{}",
                path.display()
            );
            return false;
        }

        match registry.add_watch(path, WatchKind::Directory) {
            Ok(_) => true,
            Err(e) => {
                // Non-fatal: the view simply will not see live updates here
                tracing::warn!("[monitor] {e}");
                false
            }
        }
    }

    /// Release a directory watch (tree node collapsed).
    ///
    /// The same path rules as `add_directory_watch` apply, so baseline
    /// repository watches cannot be released through this surface.
    /// Idempotent; removing a path that is not watched is a no-op. The
    /// native watch is released only when every consumer has removed it.
    pub fn remove_directory_watch(&self, path: &Path) -> bool {
        let Some(registry) = &self.registry else {
            tracing::warn!("[monitor] remove_directory_watch after shutdown");
            return false;
        };

        if !path.starts_with(&self.root) {
            tracing::warn!(
                "[monitor] refusing to release {} outside project root",
                path.display()
            );
            return false;
        }
        if path.starts_with(&self.git_dir) {
            crate::debug_event!(
                "monitor",
                "skipping repository metadata path",
                "{}",
                path.display()
            );
            return false;
        }

        match registry.handle_for(path) {
            Some(handle) => registry.remove_watch(handle),
            None => {
                crate::debug_event!("monitor", "not watched", "{}", path.display());
                false
            }
        }
    }

    /// Directories with a live watch, baseline and tree-view alike.
    pub fn watched_directories(&self) -> Vec<PathBuf> {
        self.registry
            .as_ref()
            .map(|r| r.directory_paths())
            .unwrap_or_default()
    }

    /// Tear the session down: force-release every watch regardless of
    /// reference counts, stop both threads, and join them.
    ///
    /// Armed debounce timers are discarded. Idempotent; also runs on drop.
    pub fn shutdown(&mut self) {
        let Some(registry) = self.registry.take() else {
            return;
        };

        registry.release_all();
        // Last strong reference: drops the native watcher and with it the
        // event sender, which lets the worker run down
        drop(registry);

        if let Some(handle) = self.worker.take() {
            match handle.join() {
                Ok((classified, fired)) => {
                    crate::debug_event!(
                        "monitor",
                        "worker stopped",
                        "{classified} events classified, {fired} notifications"
                    );
                }
                Err(_) => tracing::error!("[monitor] worker thread panicked"),
            }
        }

        if let Some(handle) = self.dispatcher.take() {
            match handle.join() {
                Ok(delivered) => {
                    crate::debug_event!("monitor", "dispatcher stopped", "{delivered} delivered");
                }
                Err(_) => tracing::error!("[monitor] dispatch thread panicked"),
            }
        }

        crate::log_event!("monitor", "stopped", "{}", self.root.display());
    }
}

impl Drop for FileMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Builder for a `FileMonitor`.
pub struct FileMonitorBuilder {
    root: PathBuf,
    settings: Option<Arc<Settings>>,
}

impl FileMonitorBuilder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            settings: None,
        }
    }

    /// Use the given settings instead of defaults.
    pub fn settings(mut self, settings: Arc<Settings>) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Construct the monitor: establish baseline watches and start the
    /// worker and dispatch threads.
    ///
    /// Fails only when the root cannot be resolved or the native watcher
    /// cannot be created at all; individual watch failures are logged and
    /// skipped.
    pub fn build(self) -> MonitorResult<FileMonitor> {
        let settings = self.settings.unwrap_or_default();

        // Canonicalize so classification compares equal to the paths the
        // native watcher reports
        let root = self.root.canonicalize().map_err(|e| MonitorError::Init {
            reason: format!("cannot resolve project root {}: {e}", self.root.display()),
        })?;

        let (event_tx, event_rx) = bounded(settings.watch.queue_capacity);
        let (note_tx, note_rx) = unbounded();
        let overflow = Arc::new(AtomicUsize::new(0));

        let registry = Arc::new(WatchRegistry::new(event_tx, Arc::clone(&overflow))?);
        let classifier = Classifier::new(&root, &settings.watch);
        let git_dir = classifier.git_dir().to_path_buf();
        let is_repository = classifier.is_repository();

        let baseline = baseline_targets(&classifier);
        let mut established = 0usize;
        for (path, kind) in &baseline {
            match registry.add_watch(path, *kind) {
                Ok(_) => established += 1,
                Err(e) => tracing::warn!("[monitor] {e}"),
            }
        }

        let worker = MonitorWorker::new(
            classifier,
            DebounceTable::new(settings.debounce.clone()),
            Arc::downgrade(&registry),
            overflow,
        );
        let worker_handle = thread::spawn(move || worker.run(event_rx, note_tx));

        let bus = Arc::new(EventBus::new());
        let dispatch_bus = Arc::clone(&bus);
        let dispatcher = thread::spawn(move || {
            let mut delivered = 0usize;
            for notification in note_rx {
                crate::debug_event!("monitor", "dispatch", "{}", notification.category);
                dispatch_bus.dispatch(&notification);
                delivered += 1;
            }
            delivered
        });

        crate::log_event!(
            "monitor",
            "started",
            "{} ({established} baseline watches, repository={is_repository})",
            root.display()
        );

        Ok(FileMonitor {
            root,
            git_dir,
            is_repository,
            registry: Some(registry),
            bus,
            worker: Some(worker_handle),
            dispatcher: Some(dispatcher),
        })
    }
}

/// Baseline watch set for a project, filtered to paths that exist.
///
/// Missing targets (fresh repository without an index yet, no notes
/// directory) are skipped here; a later failure at watch creation is still
/// tolerated and logged.
fn baseline_targets(classifier: &Classifier) -> Vec<(PathBuf, WatchKind)> {
    let mut targets = Vec::new();

    if classifier.is_repository() {
        for file in [
            classifier.index_file(),
            classifier.reflog_file(),
            classifier.head_file(),
        ] {
            if file.is_file() {
                targets.push((file.to_path_buf(), WatchKind::File));
            } else {
                crate::debug_event!("monitor", "no baseline target", "{}", file.display());
            }
        }
        if classifier.refs_dir().is_dir() {
            targets.push((classifier.refs_dir().to_path_buf(), WatchKind::Directory));
        }
    }

    for dir in classifier.notes_dirs() {
        if dir.is_dir() {
            targets.push((dir.clone(), WatchKind::Directory));
        }
    }

    if classifier.tasks_file().is_file() {
        targets.push((classifier.tasks_file().to_path_buf(), WatchKind::File));
    }

    for file in classifier.note_files() {
        if file.is_file() {
            targets.push((file.clone(), WatchKind::File));
        }
    }

    targets
}
