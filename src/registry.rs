//! Refcounted registry of native filesystem watches.
//!
//! One `notify::RecommendedWatcher` backs every watched path. Consumers
//! request watches by path; repeat requests on the same path share one native
//! registration and bump a reference count. The native watch is released when
//! the count returns to zero, so overlapping consumers never tear down each
//! other's coverage.
//!
//! All state, including calls into the native watcher, sits behind a single
//! mutex. Native callbacks do not take the mutex; they only push onto the
//! event channel.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_channel::{Sender, TrySendError};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;

use crate::error::{MonitorError, MonitorResult};
use crate::event::{RawEvent, raw_events_from_native};

/// Stable identity of one watched path, issued by the registry.
///
/// Handles index an arena-style descriptor table; they stay valid until the
/// watch's reference count returns to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchHandle(u64);

impl WatchHandle {
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// What a watch covers: a single file, or a directory's direct entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchKind {
    File,
    Directory,
}

/// One active native watch with its reference count.
#[derive(Debug)]
struct Descriptor {
    path: PathBuf,
    kind: WatchKind,
    refs: usize,
}

struct RegistryInner {
    watcher: RecommendedWatcher,
    by_path: HashMap<PathBuf, WatchHandle>,
    descriptors: HashMap<WatchHandle, Descriptor>,
    next_handle: u64,
}

/// Refcounted path -> descriptor table over the shared native watcher.
pub struct WatchRegistry {
    inner: Mutex<RegistryInner>,
}

impl WatchRegistry {
    /// Create a registry whose native callback pushes raw events onto the
    /// given bounded channel.
    ///
    /// A full channel increments `overflow` instead of blocking; the worker
    /// turns a non-zero count into a degraded all-categories refresh. The
    /// callback must return quickly, so it never takes the registry mutex.
    pub fn new(events: Sender<RawEvent>, overflow: Arc<AtomicUsize>) -> MonitorResult<Self> {
        let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    for raw in raw_events_from_native(event) {
                        match events.try_send(raw) {
                            Ok(()) => {}
                            Err(TrySendError::Full(_)) => {
                                overflow.fetch_add(1, Ordering::Relaxed);
                            }
                            // Worker gone, session is shutting down
                            Err(TrySendError::Disconnected(_)) => {}
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("[registry] native watch error: {e}");
                }
            }
        })?;

        Ok(Self {
            inner: Mutex::new(RegistryInner {
                watcher,
                by_path: HashMap::new(),
                descriptors: HashMap::new(),
                next_handle: 1,
            }),
        })
    }

    /// Register interest in a path.
    ///
    /// Creates a native watch on first request and returns its handle; repeat
    /// requests on the same path bump the reference count and return the
    /// existing handle (the first request's kind wins). Native failure is
    /// returned to the caller, who decides whether to skip or abort.
    pub fn add_watch(&self, path: &Path, kind: WatchKind) -> MonitorResult<WatchHandle> {
        let mut inner = self.inner.lock();

        if let Some(&handle) = inner.by_path.get(path) {
            if let Some(descriptor) = inner.descriptors.get_mut(&handle) {
                descriptor.refs += 1;
                crate::debug_event!(
                    "registry",
                    "ref",
                    "{} refs={}",
                    path.display(),
                    descriptor.refs
                );
            }
            return Ok(handle);
        }

        if let Err(e) = inner.watcher.watch(path, RecursiveMode::NonRecursive) {
            return Err(MonitorError::WatchFailed {
                path: path.to_path_buf(),
                source: e,
            });
        }

        let handle = WatchHandle(inner.next_handle);
        inner.next_handle += 1;
        inner.by_path.insert(path.to_path_buf(), handle);
        inner.descriptors.insert(
            handle,
            Descriptor {
                path: path.to_path_buf(),
                kind,
                refs: 1,
            },
        );

        crate::debug_event!(
            "registry",
            "watching",
            "{} handle={}",
            path.display(),
            handle.value()
        );
        Ok(handle)
    }

    /// Release one reference on a watch.
    ///
    /// At zero the native watch is removed and the handle retired. Unknown
    /// or already-released handles are a no-op. Returns true when the call
    /// released or decremented a live watch.
    pub fn remove_watch(&self, handle: WatchHandle) -> bool {
        let mut inner = self.inner.lock();

        let Entry::Occupied(mut entry) = inner.descriptors.entry(handle) else {
            return false;
        };

        let descriptor = entry.get_mut();
        descriptor.refs -= 1;
        if descriptor.refs > 0 {
            crate::debug_event!(
                "registry",
                "unref",
                "{} handle={} refs={}",
                descriptor.path.display(),
                handle.value(),
                descriptor.refs
            );
            return true;
        }

        let descriptor = entry.remove();
        inner.by_path.remove(&descriptor.path);

        // The path may already be gone; stale unwatch errors are expected
        if let Err(e) = inner.watcher.unwatch(&descriptor.path) {
            crate::debug_event!(
                "registry",
                "unwatch failed",
                "{}: {e}",
                descriptor.path.display()
            );
        } else {
            crate::debug_event!("registry", "released", "{}", descriptor.path.display());
        }

        true
    }

    /// Look up the handle registered for a path.
    pub fn handle_for(&self, path: &Path) -> Option<WatchHandle> {
        self.inner.lock().by_path.get(path).copied()
    }

    /// True when the path is itself a watch root (not merely inside one).
    pub fn is_watch_root(&self, path: &Path) -> bool {
        self.inner.lock().by_path.contains_key(path)
    }

    /// Current reference count of a handle, if it is still live.
    pub fn ref_count(&self, handle: WatchHandle) -> Option<usize> {
        self.inner.lock().descriptors.get(&handle).map(|d| d.refs)
    }

    /// Number of live native watches.
    pub fn watch_count(&self) -> usize {
        self.inner.lock().descriptors.len()
    }

    /// Re-establish the native watch on a path that deleted itself.
    ///
    /// Editors and git replace files by writing a temp file and renaming it
    /// over the original, which silently kills the inode-level watch. The
    /// worker calls this when a delete or rename lands on a watch root with
    /// live references. Returns false when the path is not registered or the
    /// watch could not be re-established.
    pub fn reattach(&self, path: &Path) -> bool {
        let mut inner = self.inner.lock();

        if !inner.by_path.contains_key(path) {
            return false;
        }

        let _ = inner.watcher.unwatch(path);
        match inner.watcher.watch(path, RecursiveMode::NonRecursive) {
            Ok(()) => {
                crate::debug_event!("registry", "rewatched", "{}", path.display());
                true
            }
            Err(e) => {
                tracing::warn!("[registry] lost watch on {}: {e}", path.display());
                false
            }
        }
    }

    /// Force-release every watch regardless of reference counts.
    ///
    /// Teardown path: consumers are gone, nothing will decrement refs.
    pub fn release_all(&self) {
        let mut inner = self.inner.lock();

        let paths: Vec<PathBuf> = inner.by_path.keys().cloned().collect();
        let released = paths.len();
        for path in paths {
            let _ = inner.watcher.unwatch(&path);
        }
        inner.by_path.clear();
        inner.descriptors.clear();

        if released > 0 {
            crate::log_event!("registry", "released all", "{released} watches");
        }
    }

    /// Paths of all directory-kind watches, sorted.
    pub fn directory_paths(&self) -> Vec<PathBuf> {
        let inner = self.inner.lock();
        let mut dirs: Vec<PathBuf> = inner
            .descriptors
            .values()
            .filter(|d| d.kind == WatchKind::Directory)
            .map(|d| d.path.clone())
            .collect();
        dirs.sort();
        dirs
    }
}
