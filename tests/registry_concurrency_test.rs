//! Concurrent watch churn against the shared registry.
//!
//! Tree views add and remove directory watches from UI-driven threads while
//! other panes do the same. Reference counts must converge and the registry
//! must never lose track of a live watch.

use crossbeam_channel::bounded;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::thread;
use tempfile::TempDir;
use watchbus::{FileMonitor, RawEvent, WatchKind, WatchRegistry};

fn registry_over(capacity: usize) -> (WatchRegistry, crossbeam_channel::Receiver<RawEvent>) {
    let (tx, rx) = bounded(capacity);
    let registry = WatchRegistry::new(tx, Arc::new(AtomicUsize::new(0))).unwrap();
    (registry, rx)
}

#[test]
fn test_concurrent_add_remove_converges() {
    let temp = TempDir::new().unwrap();
    let dirs: Vec<PathBuf> = (0..4)
        .map(|i| {
            let dir = temp.path().join(format!("dir{i}"));
            fs::create_dir(&dir).unwrap();
            dir
        })
        .collect();

    let (registry, _rx) = registry_over(1024);
    let registry = &registry;
    let dirs = &dirs;

    // 8 threads x 125 rounds x 4 dirs: every add is matched by a remove.
    // A thread's outstanding add keeps the handle alive, so its own remove
    // always succeeds.
    thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                for _ in 0..125 {
                    let handles: Vec<_> = dirs
                        .iter()
                        .map(|dir| registry.add_watch(dir, WatchKind::Directory).unwrap())
                        .collect();
                    for handle in handles {
                        assert!(registry.remove_watch(handle));
                    }
                }
            });
        }
    });

    assert_eq!(registry.watch_count(), 0);
    for dir in dirs {
        assert!(registry.handle_for(dir).is_none());
    }
}

#[test]
fn test_monitor_watch_churn_stays_consistent() {
    let temp = TempDir::new().unwrap();
    for i in 0..4 {
        fs::create_dir(temp.path().join(format!("pane{i}"))).unwrap();
    }

    let monitor = FileMonitor::builder(temp.path()).build().unwrap();
    let root = monitor.root().to_path_buf();
    let monitor = &monitor;

    // Each pane churns its own directory
    thread::scope(|s| {
        for pane in 0..4 {
            let dir = root.join(format!("pane{pane}"));
            s.spawn(move || {
                for _ in 0..50 {
                    assert!(monitor.add_directory_watch(&dir));
                    assert!(monitor.remove_directory_watch(&dir));
                }
            });
        }
    });

    assert!(monitor.watched_directories().is_empty());
}

#[test]
fn test_shared_directory_churn_never_leaks() {
    let temp = TempDir::new().unwrap();
    let shared = temp.path().join("shared");
    fs::create_dir(&shared).unwrap();

    let monitor = FileMonitor::builder(temp.path()).build().unwrap();
    let shared = monitor.root().join("shared");
    let monitor = &monitor;
    let shared = &shared;

    // All threads fight over one path; adds and removes stay paired, so
    // the shared refcount must drain to zero
    thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                for _ in 0..100 {
                    let _ = monitor.add_directory_watch(shared);
                    let _ = monitor.remove_directory_watch(shared);
                }
            });
        }
    });

    assert!(monitor.watched_directories().is_empty());
}
