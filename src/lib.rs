//! Coalesced filesystem and repository change notifications for project
//! sessions.
//!
//! Watchbus sits between the native filesystem watcher and a workspace UI.
//! It watches an open project's working tree, repository metadata, notes,
//! and task definitions, and turns the raw event firehose into a small
//! number of debounced, category-level notifications that views can act on
//! directly: refresh the status bar, reload the tree node, re-read the task
//! list.
//!
//! # Quick start
//!
//! ```no_run
//! use watchbus::{Category, FileMonitor};
//!
//! let mut monitor = FileMonitor::builder(".").build()?;
//!
//! monitor.subscribe(Category::WorkingTree, |note| {
//!     println!("working tree changed: {:?}", note.paths);
//! });
//! monitor.subscribe(Category::RepositoryRefs, |_| {
//!     println!("branches moved, refresh status");
//! });
//!
//! // ... session runs ...
//!
//! monitor.shutdown();
//! # Ok::<(), watchbus::MonitorError>(())
//! ```
//!
//! # Architecture
//!
//! - [`registry`]: reference-counted native watches over files and
//!   directories, shared across consumers
//! - [`classifier`]: maps event paths to notification categories with
//!   ordered path rules
//! - [`debounce`]: per-category sliding windows with a hard cap, no timer
//!   threads
//! - [`bus`]: category-filtered subscriber callbacks
//! - [`worker`]: the thread draining raw events through classify + debounce
//! - [`monitor`]: per-session lifecycle tying the pieces together
//!
//! Notifications are coarse by design. A category tells the consumer what
//! kind of state went stale; the consumer re-reads that state instead of
//! replaying individual events.

pub mod bus;
pub mod classifier;
pub mod config;
pub mod debounce;
pub mod error;
pub mod event;
pub mod logging;
pub mod monitor;
pub mod registry;
pub mod worker;

pub use bus::{EventBus, NotificationCallback, SubscriptionId};
pub use classifier::{Classified, Classifier};
pub use config::{DebounceConfig, LoggingConfig, Settings, WatchConfig};
pub use debounce::DebounceTable;
pub use error::{MonitorError, MonitorResult};
pub use event::{Category, CategorySet, ChangeKind, Notification, RawEvent};
pub use monitor::{FileMonitor, FileMonitorBuilder};
pub use registry::{WatchHandle, WatchKind, WatchRegistry};
pub use worker::MonitorWorker;
