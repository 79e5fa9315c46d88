//! Transposition table: statistics aliasing across identical positions.
//!
//! Entries are keyed by the full board hash and carry the komi they were
//! searched under; a komi mismatch is a miss. A node reaching a known
//! position adopts the cached statistics when they are richer than its own,
//! and writes its own back after backup. The table is a process-wide service
//! injected into the search (no global singleton).

use crate::node::UCTNode;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Cached statistics for one position.
#[derive(Clone, Copy, Debug)]
struct TtEntry {
    komi: f32,
    visits: u32,
    blackevals: f64,
}

/// Hash-keyed store of node statistics, shared by all workers.
pub struct TranspositionTable {
    entries: Mutex<HashMap<u64, TtEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl TranspositionTable {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::with_capacity(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Let `node` adopt cached statistics for this position, if an entry
    /// exists under the same komi and has seen more visits than the node.
    pub fn sync(&self, hash: u64, komi: f32, node: &UCTNode) {
        let entries = self.entries.lock().unwrap();
        match entries.get(&hash) {
            Some(entry) if entry.komi == komi => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                if entry.visits > node.get_visits() {
                    node.set_stats(entry.visits, entry.blackevals);
                }
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Write `node`'s statistics back for this position. A richer entry
    /// under the same komi is kept; a komi mismatch is overwritten.
    pub fn update(&self, hash: u64, komi: f32, node: &UCTNode) {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(hash).or_insert(TtEntry {
            komi,
            visits: 0,
            blackevals: 0.0,
        });
        if entry.komi != komi || node.get_visits() > entry.visits {
            *entry = TtEntry {
                komi,
                visits: node.get_visits(),
                blackevals: node.get_blackevals(),
            };
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    /// Lookup statistics: (hits, misses, entries).
    pub fn stats(&self) -> (u64, u64, usize) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
            self.len(),
        )
    }

    pub fn hit_rate(&self) -> f64 {
        let (hits, misses, _) = self.stats();
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

impl Default for TranspositionTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::PASS;

    #[test]
    fn test_sync_adopts_richer_entry() {
        let tt = TranspositionTable::new();
        let donor = UCTNode::new(PASS, 0.0, 0.5);
        for _ in 0..10 {
            donor.update(1.0);
        }
        tt.update(42, 7.5, &donor);

        let node = UCTNode::new(PASS, 0.0, 0.5);
        node.update(0.0);
        tt.sync(42, 7.5, &node);
        assert_eq!(node.get_visits(), 10);
        assert!((node.get_blackevals() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_sync_keeps_richer_node() {
        let tt = TranspositionTable::new();
        let donor = UCTNode::new(PASS, 0.0, 0.5);
        donor.update(1.0);
        tt.update(42, 7.5, &donor);

        let node = UCTNode::new(PASS, 0.0, 0.5);
        for _ in 0..5 {
            node.update(0.0);
        }
        tt.sync(42, 7.5, &node);
        assert_eq!(node.get_visits(), 5);
    }

    #[test]
    fn test_komi_mismatch_is_a_miss() {
        let tt = TranspositionTable::new();
        let donor = UCTNode::new(PASS, 0.0, 0.5);
        for _ in 0..10 {
            donor.update(1.0);
        }
        tt.update(42, 7.5, &donor);

        let node = UCTNode::new(PASS, 0.0, 0.5);
        tt.sync(42, 0.5, &node);
        assert_eq!(node.get_visits(), 0);

        let (hits, misses, entries) = tt.stats();
        assert_eq!(hits, 0);
        assert_eq!(misses, 1);
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_update_replaces_on_komi_change() {
        let tt = TranspositionTable::new();
        let a = UCTNode::new(PASS, 0.0, 0.5);
        for _ in 0..10 {
            a.update(1.0);
        }
        tt.update(7, 7.5, &a);

        // Same position under a different komi overwrites, even with
        // fewer visits.
        let b = UCTNode::new(PASS, 0.0, 0.5);
        b.update(0.0);
        tt.update(7, 0.5, &b);

        let fresh = UCTNode::new(PASS, 0.0, 0.5);
        tt.sync(7, 0.5, &fresh);
        assert_eq!(fresh.get_visits(), 1);
    }

    #[test]
    fn test_clear() {
        let tt = TranspositionTable::new();
        let node = UCTNode::new(PASS, 0.0, 0.5);
        node.update(1.0);
        tt.update(1, 7.5, &node);
        tt.update(2, 7.5, &node);
        assert_eq!(tt.len(), 2);

        tt.clear();
        assert!(tt.is_empty());
        assert_eq!(tt.hit_rate(), 0.0);
    }
}
