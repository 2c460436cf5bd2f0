//! Bounded, most-recent-first list of completed searches.
//!
//! Entries are snapshots: the orchestrator clones a [`SearchResponse`] into
//! the store when a flow reaches Synthesizing, and clones it back out when
//! the user selects an entry.  Nothing is persisted across restarts.

use std::collections::VecDeque;

use uuid::Uuid;

use crate::assistant::SearchResponse;

/// Default number of entries kept.
pub const DEFAULT_CAPACITY: usize = 20;

/// One completed search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub id: Uuid,
    /// The query the flow searched for (after any tweak or refine).
    pub query: String,
    pub results: SearchResponse,
}

// ---------------------------------------------------------------------------
// SessionStore
// ---------------------------------------------------------------------------

/// In-memory history, newest entry first.
///
/// # Example
/// ```rust
/// use voice_search::assistant::SearchResponse;
/// use voice_search::history::SessionStore;
///
/// let mut store = SessionStore::new();
/// let response = SearchResponse {
///     summary: "Tea came to Europe in the 17th century.".into(),
///     sources: Vec::new(),
///     actual_query: "history of tea".into(),
/// };
/// let id = store.record("tea", response);
/// assert_eq!(store.entries()[0].id, id);
/// ```
#[derive(Debug, Clone)]
pub struct SessionStore {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// A store holding at most [`DEFAULT_CAPACITY`] entries.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// A store holding at most `capacity` entries (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Add a completed search at the front, evicting the oldest entry when
    /// the store is full.  Returns the new entry's id.
    pub fn record(&mut self, query: impl Into<String>, results: SearchResponse) -> Uuid {
        let id = Uuid::new_v4();
        self.entries.push_front(HistoryEntry {
            id,
            query: query.into(),
            results,
        });
        while self.entries.len() > self.capacity {
            if let Some(evicted) = self.entries.pop_back() {
                log::debug!("history: evicted {:?}", evicted.query);
            }
        }
        id
    }

    /// All entries, most recent first.
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn get(&self, id: Uuid) -> Option<&HistoryEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// The entry at `index` counting from the most recent (0).
    pub fn nth(&self, index: usize) -> Option<&HistoryEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn response(query: &str) -> SearchResponse {
        SearchResponse {
            summary: format!("Summary of {query}"),
            sources: Vec::new(),
            actual_query: query.to_string(),
        }
    }

    #[test]
    fn newest_entry_comes_first() {
        let mut store = SessionStore::new();
        store.record("first", response("first"));
        store.record("second", response("second"));

        let queries: Vec<_> = store.entries().into_iter().map(|e| e.query).collect();
        assert_eq!(queries, vec!["second", "first"]);
    }

    #[test]
    fn twenty_one_records_keep_twenty() {
        let mut store = SessionStore::new();
        for i in 1..=21 {
            store.record(format!("query {i}"), response(&format!("query {i}")));
        }

        assert_eq!(store.len(), 20);
        let entries = store.entries();
        assert_eq!(entries[0].query, "query 21");
        assert_eq!(entries[19].query, "query 2");
        assert!(entries.iter().all(|e| e.query != "query 1"));
    }

    #[test]
    fn get_finds_by_id() {
        let mut store = SessionStore::new();
        let id = store.record("tea", response("tea"));
        store.record("coffee", response("coffee"));

        assert_eq!(store.get(id).map(|e| e.query.as_str()), Some("tea"));
        assert!(store.get(Uuid::new_v4()).is_none());
        assert_eq!(store.nth(0).map(|e| e.query.as_str()), Some("coffee"));
    }

    #[test]
    fn ids_are_unique() {
        let mut store = SessionStore::new();
        let a = store.record("same", response("same"));
        let b = store.record("same", response("same"));
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut store = SessionStore::with_capacity(0);
        store.record("a", response("a"));
        store.record("b", response("b"));
        assert_eq!(store.capacity(), 1);
        assert_eq!(store.entries()[0].query, "b");
    }
}
