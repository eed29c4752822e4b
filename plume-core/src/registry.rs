//! Remote cursor registry for Plume.
//!
//! This module tracks the last-known cursor of every remote participant:
//! - At most one entry per participant; a newer update replaces it fully
//! - Explicit removal when a participant announces it is leaving
//! - Staleness eviction so silent participants do not accumulate
//!
//! The registry never touches the network or the document. Callers pass
//! the current time in, which keeps eviction deterministic under test.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use plume_types::{ParticipantId, Rgb};

/// Last-known cursor of one remote participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorState {
    /// Who the cursor belongs to.
    pub participant_id: ParticipantId,
    /// Selection start.
    pub range_start: usize,
    /// Selection end (equal to start for a caret).
    pub range_end: usize,
    /// Name shown next to the cursor.
    pub display_name: String,
    /// Cursor colour.
    pub colour: Rgb,
    /// When this state was received.
    pub last_updated: Instant,
}

/// Table of remote cursors keyed by participant.
#[derive(Debug, Clone, Default)]
pub struct CursorRegistry {
    entries: HashMap<ParticipantId, CursorState>,
}

impl CursorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or fully replace the entry for `id`.
    pub fn upsert(&mut self, id: ParticipantId, state: CursorState) {
        self.entries.insert(id, state);
    }

    /// Remove the entry for `id`, returning it if it existed.
    pub fn remove(&mut self, id: &ParticipantId) -> Option<CursorState> {
        self.entries.remove(id)
    }

    /// Remove every entry last updated more than `max_age` before `now`.
    ///
    /// Returns the removed ids so the caller can clear their markers.
    /// An entry exactly `max_age` old is kept.
    pub fn evict_stale(&mut self, now: Instant, max_age: Duration) -> Vec<ParticipantId> {
        let mut evicted = Vec::new();
        self.entries.retain(|id, state| {
            let fresh = now.saturating_duration_since(state.last_updated) <= max_age;
            if !fresh {
                evicted.push(id.clone());
            }
            fresh
        });
        evicted
    }

    /// Read-only view of all entries, in no particular order.
    pub fn snapshot(&self) -> Vec<&CursorState> {
        self.entries.values().collect()
    }

    /// Entry for `id`, if any.
    pub fn get(&self, id: &ParticipantId) -> Option<&CursorState> {
        self.entries.get(id)
    }

    /// Whether `id` has an entry.
    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.entries.contains_key(id)
    }

    /// Number of entries held for `id` (always 0 or 1).
    pub fn count(&self, id: &ParticipantId) -> usize {
        self.snapshot()
            .iter()
            .filter(|state| &state.participant_id == id)
            .count()
    }

    /// Number of tracked participants.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no participant is tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> ParticipantId {
        ParticipantId::parse(raw).unwrap()
    }

    fn state(raw: &str, start: usize, end: usize, at: Instant) -> CursorState {
        CursorState {
            participant_id: id(raw),
            range_start: start,
            range_end: end,
            display_name: "Bob".into(),
            colour: Rgb::new(1, 2, 3),
            last_updated: at,
        }
    }

    #[test]
    fn registry_starts_empty() {
        let registry = CursorRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn upsert_inserts_then_replaces() {
        let mut registry = CursorRegistry::new();
        let now = Instant::now();

        registry.upsert(id("id-7"), state("id-7", 3, 5, now));
        registry.upsert(id("id-7"), state("id-7", 6, 8, now));

        assert_eq!(registry.len(), 1);
        let entry = registry.get(&id("id-7")).unwrap();
        assert_eq!((entry.range_start, entry.range_end), (6, 8));
    }

    #[test]
    fn replace_does_not_merge_fields() {
        let mut registry = CursorRegistry::new();
        let now = Instant::now();

        registry.upsert(id("id-7"), state("id-7", 3, 5, now));
        let mut second = state("id-7", 6, 8, now);
        second.display_name = String::new();
        registry.upsert(id("id-7"), second.clone());

        // The empty name wins; nothing is carried over from the first entry
        assert_eq!(registry.get(&id("id-7")), Some(&second));
    }

    #[test]
    fn upsert_is_idempotent() {
        let mut registry = CursorRegistry::new();
        let entry = state("id-1", 0, 0, Instant::now());

        registry.upsert(id("id-1"), entry.clone());
        registry.upsert(id("id-1"), entry.clone());

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.count(&id("id-1")), 1);
    }

    #[test]
    fn remove_returns_entry() {
        let mut registry = CursorRegistry::new();
        registry.upsert(id("id-1"), state("id-1", 0, 0, Instant::now()));

        assert!(registry.remove(&id("id-1")).is_some());
        assert!(!registry.contains(&id("id-1")));
    }

    #[test]
    fn remove_missing_is_no_op() {
        let mut registry = CursorRegistry::new();
        assert!(registry.remove(&id("id-404")).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn evicts_only_stale_entries() {
        let mut registry = CursorRegistry::new();
        let start = Instant::now();
        let max_age = Duration::from_secs(10);

        registry.upsert(id("old"), state("old", 0, 0, start));
        registry.upsert(
            id("fresh"),
            state("fresh", 0, 0, start + Duration::from_secs(8)),
        );

        let evicted = registry.evict_stale(start + Duration::from_secs(11), max_age);

        assert_eq!(evicted, vec![id("old")]);
        assert!(!registry.contains(&id("old")));
        assert!(registry.contains(&id("fresh")));
        assert_eq!(registry.snapshot().len(), 1);
    }

    #[test]
    fn entry_at_exact_max_age_is_kept() {
        let mut registry = CursorRegistry::new();
        let start = Instant::now();
        registry.upsert(id("edge"), state("edge", 0, 0, start));

        let evicted = registry.evict_stale(start + Duration::from_secs(10), Duration::from_secs(10));

        assert!(evicted.is_empty());
        assert!(registry.contains(&id("edge")));
    }

    #[test]
    fn touching_an_entry_resets_its_age() {
        let mut registry = CursorRegistry::new();
        let start = Instant::now();
        let max_age = Duration::from_secs(10);

        registry.upsert(id("id-1"), state("id-1", 0, 0, start));
        registry.upsert(
            id("id-1"),
            state("id-1", 1, 1, start + Duration::from_secs(9)),
        );

        let evicted = registry.evict_stale(start + Duration::from_secs(15), max_age);
        assert!(evicted.is_empty());
    }

    #[test]
    fn clock_behind_entry_does_not_evict() {
        let mut registry = CursorRegistry::new();
        let later = Instant::now() + Duration::from_secs(5);
        registry.upsert(id("id-1"), state("id-1", 0, 0, later));

        // `now` earlier than last_updated saturates to zero age
        let evicted = registry.evict_stale(Instant::now(), Duration::from_secs(1));
        assert!(evicted.is_empty());
    }
}
