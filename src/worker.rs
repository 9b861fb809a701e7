//! The monitor worker thread.
//!
//! Drains the bounded raw event queue, classifies each event, arms the
//! per-category debounce timers, and emits coalesced notifications to the
//! dispatch thread. Timer deadlines drive the receive timeout, so pending
//! windows cost no extra threads and fire on schedule even when the queue
//! goes quiet.
//!
//! Queue overflow (the native callback found the queue full) degrades to a
//! coarse refresh: the stale backlog is discarded and every category gets one
//! notification, preferring over-notification to silently missing changes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::classifier::Classifier;
use crate::debounce::DebounceTable;
use crate::event::{Category, ChangeKind, Notification, RawEvent};
use crate::registry::WatchRegistry;

/// Classification and debouncing stage, run on its own thread.
///
/// Holds the registry weakly: the registry owns the event sender, and a
/// strong reference here would keep the channel open against teardown.
pub struct MonitorWorker {
    classifier: Classifier,
    debounce: DebounceTable,
    registry: Weak<WatchRegistry>,
    overflow: Arc<AtomicUsize>,
}

impl MonitorWorker {
    pub fn new(
        classifier: Classifier,
        debounce: DebounceTable,
        registry: Weak<WatchRegistry>,
        overflow: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            classifier,
            debounce,
            registry,
            overflow,
        }
    }

    /// Run until the event channel disconnects (all senders dropped at
    /// teardown). Returns (events classified, notifications sent).
    ///
    /// Timers armed at teardown are discarded; nothing is listening anymore.
    pub fn run(
        mut self,
        events: Receiver<RawEvent>,
        notifications: Sender<Notification>,
    ) -> (usize, usize) {
        let mut classified = 0usize;
        let mut fired = 0usize;

        loop {
            let dropped = self.overflow.swap(0, Ordering::Relaxed);
            if dropped > 0 {
                fired += self.flush_all(&events, &notifications, dropped);
            }

            for (category, paths) in self.debounce.take_ready() {
                crate::debug_event!("worker", "fired", "{category} ({} paths)", paths.len());
                if notifications
                    .send(Notification::with_paths(category, paths))
                    .is_err()
                {
                    // Dispatch side gone, session is over
                    return (classified, fired);
                }
                fired += 1;
            }

            let received = match self.debounce.next_deadline() {
                Some(deadline) => {
                    let timeout = deadline.saturating_duration_since(Instant::now());
                    match events.recv_timeout(timeout) {
                        Ok(event) => Some(event),
                        Err(RecvTimeoutError::Timeout) => None,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                None => match events.recv() {
                    Ok(event) => Some(event),
                    Err(_) => break,
                },
            };

            if let Some(event) = received {
                if self.handle_event(event) {
                    classified += 1;
                }
            }
        }

        (classified, fired)
    }

    /// Classify one raw event into its debounce slot.
    ///
    /// Returns true when the event matched a category.
    fn handle_event(&mut self, event: RawEvent) -> bool {
        // A watch root that deletes itself (temp-write + rename replacement)
        // needs its native watch re-established while references remain.
        if matches!(event.kind, ChangeKind::Deleted | ChangeKind::Renamed)
            && let Some(registry) = self.registry.upgrade()
        {
            registry.reattach(&event.path);
        }

        match self.classifier.classify(&event.path) {
            Some(result) => {
                crate::debug_event!(
                    "worker",
                    "classified",
                    "{} -> {}",
                    event.path.display(),
                    result.category
                );
                self.debounce.record(result.category, result.rel_path);
                true
            }
            None => {
                crate::debug_event!("worker", "discarded", "{}", event.path.display());
                false
            }
        }
    }

    /// Degraded flush after queue overflow.
    ///
    /// The backlog predates the drop, so replaying it could present a stale
    /// partial picture; discard it and notify every category once. The
    /// working tree notification carries an empty path set, meaning "refresh
    /// everything".
    fn flush_all(
        &mut self,
        events: &Receiver<RawEvent>,
        notifications: &Sender<Notification>,
        dropped: usize,
    ) -> usize {
        while events.try_recv().is_ok() {}
        self.debounce.clear();

        tracing::warn!(
            "[worker] event queue overflowed ({dropped} events dropped), flushing all categories"
        );

        let mut sent = 0;
        for category in Category::ALL {
            if notifications.send(Notification::new(category)).is_err() {
                break;
            }
            sent += 1;
        }
        sent
    }
}
