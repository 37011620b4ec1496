//! L2 working memory — typed entries under a token budget.
//!
//! Entries carry an importance score in [0, 1] that drives retention: a
//! new entry may only displace entries of strictly lower importance, and
//! an entry that would itself be the lowest is rejected without storing.
//! Each entry may carry an absolute expiry; expired entries are invisible
//! to reads and reclaimed on the next mutation.

use chrono::Utc;
use mnemo_core::entry::{EntryType, WorkingEntry};
use tracing::debug;

/// Hook invoked with the entries evicted by a single `add`.
pub type EvictionHook = Box<dyn Fn(&[WorkingEntry]) + Send + Sync>;

/// The L2 working-memory set.
///
/// Entries are kept in insertion order; reads sort by importance
/// descending with insertion order as the tie-break.
pub struct WorkingMemory {
    entries: Vec<WorkingEntry>,
    token_budget: usize,
    current_tokens: usize,
    hooks: Vec<EvictionHook>,
}

impl WorkingMemory {
    pub fn new(token_budget: usize) -> Self {
        Self {
            entries: Vec::new(),
            token_budget,
            current_tokens: 0,
            hooks: Vec::new(),
        }
    }

    /// Install a hook that receives each batch of evicted entries.
    pub fn on_eviction(&mut self, hook: EvictionHook) {
        self.hooks.push(hook);
    }

    /// Add an entry, displacing strictly lower-importance entries as
    /// needed.
    ///
    /// Returns the evicted entries. If the incoming entry cannot fit even
    /// after every strictly-lower entry is displaced, the add is a true
    /// no-op: nothing is evicted and the incoming entry is returned.
    pub fn add(&mut self, entry: WorkingEntry) -> Vec<WorkingEntry> {
        self.drop_expired();

        if self.current_tokens + entry.token_count > self.token_budget {
            // Plan evictions against a candidate list first; commit only
            // if the plan actually frees enough space.
            let mut candidates: Vec<(usize, &WorkingEntry)> = self
                .entries
                .iter()
                .enumerate()
                .filter(|(_, e)| e.importance < entry.importance)
                .collect();
            candidates.sort_by(|a, b| {
                a.1.importance
                    .partial_cmp(&b.1.importance)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.1.created_at.cmp(&b.1.created_at))
                    .then(a.0.cmp(&b.0))
            });

            let mut freed = 0usize;
            let mut planned: Vec<usize> = Vec::new();
            for (idx, candidate) in candidates {
                if self.current_tokens - freed + entry.token_count <= self.token_budget {
                    break;
                }
                freed += candidate.token_count;
                planned.push(idx);
            }

            if self.current_tokens - freed + entry.token_count > self.token_budget {
                debug!(
                    importance = entry.importance,
                    tokens = entry.token_count,
                    "L2 add rejected: incoming entry is the lowest importance"
                );
                return vec![entry];
            }

            planned.sort_unstable();
            let mut evicted: Vec<WorkingEntry> = Vec::with_capacity(planned.len());
            for idx in planned.into_iter().rev() {
                evicted.push(self.entries.remove(idx));
            }
            evicted.reverse();
            for e in &evicted {
                self.current_tokens = self.current_tokens.saturating_sub(e.token_count);
            }

            debug!(count = evicted.len(), "L2 eviction");
            for hook in &self.hooks {
                hook(&evicted);
            }

            self.current_tokens += entry.token_count;
            self.entries.push(entry);
            return evicted;
        }

        self.current_tokens += entry.token_count;
        self.entries.push(entry);
        Vec::new()
    }

    /// Entries sorted by importance descending, then insertion order.
    ///
    /// Expired entries are filtered out and reclaimed. Access counters are
    /// bumped on the returned entries.
    pub fn get_entries(&mut self, limit: Option<usize>) -> Vec<WorkingEntry> {
        self.drop_expired();

        let mut indices: Vec<usize> = (0..self.entries.len()).collect();
        // Stable sort keeps insertion order among equal importance.
        indices.sort_by(|&a, &b| {
            self.entries[b]
                .importance
                .partial_cmp(&self.entries[a].importance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        if let Some(n) = limit {
            indices.truncate(n);
        }

        let mut out = Vec::with_capacity(indices.len());
        for idx in indices {
            self.entries[idx].access_count += 1;
            out.push(self.entries[idx].clone());
        }
        out
    }

    /// All entries in insertion order, expired included, without touching
    /// access counters. Used for snapshot export.
    pub fn entries(&self) -> Vec<WorkingEntry> {
        self.entries.clone()
    }

    /// Non-expired entries of the given type, in insertion order.
    pub fn get_by_type(&mut self, entry_type: EntryType) -> Vec<WorkingEntry> {
        self.drop_expired();
        self.entries
            .iter()
            .filter(|e| e.entry_type == entry_type)
            .cloned()
            .collect()
    }

    /// Find a non-expired entry by id.
    pub fn find(&self, id: &str) -> Option<&WorkingEntry> {
        let now = Utc::now();
        self.entries
            .iter()
            .find(|e| e.id == id && !e.is_expired(now))
    }

    /// Remove an entry by id, reclaiming its tokens.
    pub fn remove(&mut self, id: &str) -> Option<WorkingEntry> {
        let idx = self.entries.iter().position(|e| e.id == id)?;
        let entry = self.entries.remove(idx);
        self.current_tokens = self.current_tokens.saturating_sub(entry.token_count);
        Some(entry)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.current_tokens = 0;
    }

    pub fn token_usage(&self) -> usize {
        self.current_tokens
    }

    /// Count of non-expired entries.
    pub fn size(&self) -> usize {
        let now = Utc::now();
        self.entries.iter().filter(|e| !e.is_expired(now)).count()
    }

    pub fn token_budget(&self) -> usize {
        self.token_budget
    }

    pub fn set_token_budget(&mut self, budget: usize) {
        self.token_budget = budget;
    }

    /// Housekeeping: remove expired entries and reclaim their tokens.
    fn drop_expired(&mut self) {
        let now = Utc::now();
        let before = self.entries.len();
        let mut reclaimed = 0usize;
        self.entries.retain(|e| {
            if e.is_expired(now) {
                reclaimed += e.token_count;
                false
            } else {
                true
            }
        });
        if self.entries.len() < before {
            self.current_tokens = self.current_tokens.saturating_sub(reclaimed);
            debug!(expired = before - self.entries.len(), "L2 TTL cleanup");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(content: &str, importance: f64, tokens: usize) -> WorkingEntry {
        WorkingEntry::new(content, EntryType::Fact, importance).with_token_count(tokens)
    }

    #[test]
    fn add_within_budget() {
        let mut wm = WorkingMemory::new(100);
        let evicted = wm.add(entry("fact one", 0.5, 10));
        assert!(evicted.is_empty());
        assert_eq!(wm.size(), 1);
        assert_eq!(wm.token_usage(), 10);
    }

    #[test]
    fn lower_importance_displaced() {
        let mut wm = WorkingMemory::new(20);
        wm.add(entry("weak", 0.2, 10));
        wm.add(entry("medium", 0.5, 10));
        let evicted = wm.add(entry("strong", 0.9, 10));

        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].content.as_text(), "weak");
        assert_eq!(wm.size(), 2);
        assert!(wm.token_usage() <= 20);
    }

    #[test]
    fn incoming_lowest_is_rejected() {
        let mut wm = WorkingMemory::new(20);
        wm.add(entry("a", 0.8, 10));
        wm.add(entry("b", 0.9, 10));
        let rejected = wm.add(entry("weakling", 0.1, 10));

        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].content.as_text(), "weakling");
        // True no-op: nothing was displaced
        assert_eq!(wm.size(), 2);
        assert_eq!(wm.token_usage(), 20);
    }

    #[test]
    fn equal_importance_is_rejected() {
        // Displacement requires strictly lower importance.
        let mut wm = WorkingMemory::new(10);
        wm.add(entry("incumbent", 0.5, 10));
        let rejected = wm.add(entry("challenger", 0.5, 10));
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].content.as_text(), "challenger");
        assert_eq!(wm.size(), 1);
    }

    #[test]
    fn tie_break_is_creation_time_fifo() {
        let mut wm = WorkingMemory::new(20);
        let mut first = entry("older", 0.3, 10);
        first.created_at = Utc::now() - chrono::Duration::seconds(10);
        wm.add(first);
        wm.add(entry("newer", 0.3, 10));

        let evicted = wm.add(entry("important", 0.9, 10));
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].content.as_text(), "older");
    }

    #[test]
    fn multiple_evictions_for_one_add() {
        let mut wm = WorkingMemory::new(30);
        wm.add(entry("a", 0.1, 10));
        wm.add(entry("b", 0.2, 10));
        wm.add(entry("c", 0.3, 10));
        let evicted = wm.add(entry("d", 0.9, 25));

        assert_eq!(evicted.len(), 3);
        assert_eq!(wm.size(), 1);
        assert!(wm.token_usage() <= 30);
    }

    #[test]
    fn oversized_entry_rejected_without_side_effects() {
        let mut wm = WorkingMemory::new(20);
        wm.add(entry("keep", 0.2, 10));
        let rejected = wm.add(entry("giant", 0.9, 50));

        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].content.as_text(), "giant");
        assert_eq!(wm.size(), 1);
        assert_eq!(wm.token_usage(), 10);
    }

    #[test]
    fn get_entries_sorted_by_importance_then_insertion() {
        let mut wm = WorkingMemory::new(100);
        wm.add(entry("low", 0.2, 5));
        wm.add(entry("high", 0.9, 5));
        wm.add(entry("mid-1", 0.5, 5));
        wm.add(entry("mid-2", 0.5, 5));

        let entries = wm.get_entries(None);
        let contents: Vec<String> = entries.iter().map(|e| e.content.as_text()).collect();
        assert_eq!(contents, ["high", "mid-1", "mid-2", "low"]);
    }

    #[test]
    fn get_entries_respects_limit_and_bumps_access() {
        let mut wm = WorkingMemory::new(100);
        wm.add(entry("a", 0.9, 5));
        wm.add(entry("b", 0.1, 5));

        let top = wm.get_entries(Some(1));
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].content.as_text(), "a");
        assert_eq!(top[0].access_count, 1);
    }

    #[test]
    fn expired_entries_invisible_and_reclaimed() {
        let mut wm = WorkingMemory::new(100);
        let mut doomed = entry("stale", 0.9, 40);
        doomed.expires_at = Some(Utc::now() - chrono::Duration::seconds(1));
        wm.add(doomed);
        wm.add(entry("fresh", 0.5, 10));

        let entries = wm.get_entries(None);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].content.as_text(), "fresh");
        assert_eq!(wm.token_usage(), 10);
    }

    #[test]
    fn expired_entry_frees_room_before_eviction_planning() {
        let mut wm = WorkingMemory::new(20);
        let mut stale = entry("stale", 0.9, 15);
        stale.expires_at = Some(Utc::now() - chrono::Duration::seconds(1));
        wm.add(stale);

        // Without housekeeping this would be rejected (0.3 < 0.9).
        let evicted = wm.add(entry("incoming", 0.3, 10));
        assert!(evicted.is_empty());
        assert_eq!(wm.size(), 1);
    }

    #[test]
    fn get_by_type_filters() {
        let mut wm = WorkingMemory::new(100);
        wm.add(entry("fact", 0.5, 5));
        wm.add(WorkingEntry::new("decision", EntryType::Decision, 0.5).with_token_count(5));

        let decisions = wm.get_by_type(EntryType::Decision);
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].content.as_text(), "decision");
    }

    #[test]
    fn find_and_remove() {
        let mut wm = WorkingMemory::new(100);
        let e = entry("target", 0.5, 7);
        let id = e.id.clone();
        wm.add(e);

        assert!(wm.find(&id).is_some());
        let removed = wm.remove(&id).unwrap();
        assert_eq!(removed.content.as_text(), "target");
        assert!(wm.find(&id).is_none());
        assert_eq!(wm.token_usage(), 0);
    }

    #[test]
    fn eviction_hook_fires() {
        use std::sync::{Arc, Mutex};
        let seen: Arc<Mutex<usize>> = Arc::new(Mutex::new(0));
        let seen_clone = Arc::clone(&seen);

        let mut wm = WorkingMemory::new(10);
        wm.on_eviction(Box::new(move |evicted| {
            *seen_clone.lock().unwrap() += evicted.len();
        }));
        wm.add(entry("low", 0.1, 10));
        wm.add(entry("high", 0.9, 10));
        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[test]
    fn usage_bounded_after_every_add() {
        let mut wm = WorkingMemory::new(50);
        for i in 0..30 {
            let importance = (i as f64) / 30.0;
            wm.add(entry(&format!("e{i}"), importance, 9));
            assert!(wm.token_usage() <= 50);
        }
    }
}
