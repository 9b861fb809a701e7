//! Per-category debouncing of classified events.
//!
//! A burst of raw events produced by one logical operation (save-all, commit,
//! branch switch) collapses into a single notification per category. Each
//! category owns one timer slot whose window is re-armed by every event; a
//! cap bounds the total delay so a sustained burst still flushes.
//!
//! Timers are plain deadlines polled by the worker loop, not OS timers. The
//! worker sleeps until `next_deadline` and drains `take_ready` on wake.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::time::Instant;

use crate::config::DebounceConfig;
use crate::event::Category;

/// One armed timer: deadline plus the paths seen during the burst.
#[derive(Debug)]
struct TimerSlot {
    /// When the first event of this burst arrived. The cap is measured
    /// from here.
    first_at: Instant,
    deadline: Instant,
    /// Accumulated working tree paths; unused for other categories.
    paths: BTreeSet<PathBuf>,
}

/// Deadline table with one slot per category.
#[derive(Debug)]
pub struct DebounceTable {
    pending: HashMap<Category, TimerSlot>,
    config: DebounceConfig,
}

impl DebounceTable {
    pub fn new(config: DebounceConfig) -> Self {
        Self {
            pending: HashMap::new(),
            config,
        }
    }

    /// Record a classified event.
    ///
    /// Arms the category's timer or pushes its deadline out by the window,
    /// capped at `cap_multiplier x window` from the burst's first event.
    /// `rel_path` accumulates into the slot's path set (working tree only).
    pub fn record(&mut self, category: Category, rel_path: Option<PathBuf>) {
        let now = Instant::now();
        let window = self.config.window_for(category);
        let cap = self.config.cap_for(category);

        let slot = self.pending.entry(category).or_insert_with(|| TimerSlot {
            first_at: now,
            deadline: now + window,
            paths: BTreeSet::new(),
        });

        slot.deadline = (now + window).min(slot.first_at + cap);
        if let Some(path) = rel_path {
            slot.paths.insert(path);
        }
    }

    /// Take all categories whose window has elapsed.
    ///
    /// Returns each fired category with its de-duplicated, sorted path set
    /// and removes the slot; the next event starts a fresh burst.
    pub fn take_ready(&mut self) -> Vec<(Category, Vec<PathBuf>)> {
        let now = Instant::now();
        let mut ready = Vec::new();

        self.pending.retain(|category, slot| {
            if now >= slot.deadline {
                let paths = std::mem::take(&mut slot.paths);
                ready.push((*category, paths.into_iter().collect()));
                false // Remove from pending
            } else {
                true // Keep in pending
            }
        });

        ready
    }

    /// Earliest armed deadline, if any timer is pending.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|slot| slot.deadline).min()
    }

    /// Check if any timer is armed.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Discard all armed timers without firing them.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    fn config(window_ms: u64, cap_multiplier: u32) -> DebounceConfig {
        DebounceConfig {
            repository_ms: window_ms,
            working_tree_ms: window_ms,
            notes_ms: window_ms,
            tasks_ms: window_ms,
            cap_multiplier,
        }
    }

    #[test]
    fn test_single_fire_per_window() {
        let mut table = DebounceTable::new(config(50, 3));

        table.record(Category::RepositoryIndex, None);
        table.record(Category::RepositoryIndex, None);
        table.record(Category::RepositoryIndex, None);

        // Immediately after, nothing should be ready
        assert!(table.take_ready().is_empty());
        assert!(table.has_pending());

        // Wait for the window
        sleep(Duration::from_millis(60));

        let ready = table.take_ready();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].0, Category::RepositoryIndex);
        assert!(!table.has_pending());
    }

    #[test]
    fn test_window_slides_on_new_event() {
        let mut table = DebounceTable::new(config(60, 10));

        table.record(Category::Notes, None);
        sleep(Duration::from_millis(35));

        // Re-arm - should push the deadline out
        table.record(Category::Notes, None);
        sleep(Duration::from_millis(35));

        // 70ms from the first event but only 35ms from the second
        assert!(table.take_ready().is_empty());

        sleep(Duration::from_millis(35));
        assert_eq!(table.take_ready().len(), 1);
    }

    #[test]
    fn test_cap_flushes_sustained_burst() {
        // Window 60ms, cap 120ms from the first event
        let mut table = DebounceTable::new(config(60, 2));

        table.record(Category::Tasks, None);
        sleep(Duration::from_millis(40));
        table.record(Category::Tasks, None);
        sleep(Duration::from_millis(40));
        table.record(Category::Tasks, None);

        // 80ms in: the last event alone would hold until 140ms, the cap
        // clamps the deadline to 120ms
        assert!(table.take_ready().is_empty());

        sleep(Duration::from_millis(50));

        // 130ms in: past the cap even though the last event was 50ms ago
        assert_eq!(table.take_ready().len(), 1);
    }

    #[test]
    fn test_paths_accumulate_deduplicated() {
        let mut table = DebounceTable::new(config(40, 3));

        table.record(Category::WorkingTree, Some(PathBuf::from("b.md")));
        table.record(Category::WorkingTree, Some(PathBuf::from("a.md")));
        table.record(Category::WorkingTree, Some(PathBuf::from("b.md")));

        sleep(Duration::from_millis(50));

        let ready = table.take_ready();
        assert_eq!(ready.len(), 1);
        let (category, paths) = &ready[0];
        assert_eq!(*category, Category::WorkingTree);
        // Sorted union, duplicates collapsed
        assert_eq!(paths, &vec![PathBuf::from("a.md"), PathBuf::from("b.md")]);
    }

    #[test]
    fn test_categories_fire_independently() {
        let mut table = DebounceTable::new(DebounceConfig {
            repository_ms: 100,
            working_tree_ms: 40,
            notes_ms: 100,
            tasks_ms: 100,
            cap_multiplier: 3,
        });

        table.record(Category::RepositoryIndex, None);
        table.record(Category::WorkingTree, Some(PathBuf::from("src/lib.rs")));

        sleep(Duration::from_millis(55));

        // Working tree window elapsed, repository still armed
        let ready = table.take_ready();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].0, Category::WorkingTree);
        assert!(table.has_pending());

        sleep(Duration::from_millis(60));

        let ready = table.take_ready();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].0, Category::RepositoryIndex);
    }

    #[test]
    fn test_next_deadline_is_minimum() {
        let mut table = DebounceTable::new(DebounceConfig {
            repository_ms: 200,
            working_tree_ms: 50,
            notes_ms: 200,
            tasks_ms: 200,
            cap_multiplier: 3,
        });

        assert!(table.next_deadline().is_none());

        table.record(Category::RepositoryIndex, None);
        let repo_deadline = table.next_deadline().unwrap();

        table.record(Category::WorkingTree, None);
        let min_deadline = table.next_deadline().unwrap();

        assert!(min_deadline < repo_deadline);
    }

    #[test]
    fn test_clear_discards_pending() {
        let mut table = DebounceTable::new(config(40, 3));

        table.record(Category::Notes, None);
        table.record(Category::WorkingTree, Some(PathBuf::from("x")));
        assert!(table.has_pending());

        table.clear();

        assert!(!table.has_pending());
        assert!(table.next_deadline().is_none());
        sleep(Duration::from_millis(50));
        assert!(table.take_ready().is_empty());
    }
}
