//! Bounded cache of resolved nodes
//!
//! Entries hold a node resolved at some height plus the records committed for
//! that name since then. A fetch for a later height gets both and catches up
//! itself; an entry newer than the requested height is never served.

use super::Node;
use crate::model::{Change, Height};
use lru::LruCache;
use parking_lot::Mutex;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Default number of resident nodes
pub const DEFAULT_CACHE_LIMIT: usize = 100_000;

struct Resident {
    node: Node,
    leases: AtomicUsize,
}

struct CacheEntry {
    resident: Arc<Resident>,
    height: Height,
    changes: Vec<Change>,
}

impl CacheEntry {
    fn new(node: Node, height: Height) -> Self {
        CacheEntry {
            resident: Arc::new(Resident {
                node,
                leases: AtomicUsize::new(0),
            }),
            height,
            changes: Vec::new(),
        }
    }

    fn leased(&self) -> bool {
        self.resident.leases.load(Ordering::Acquire) > 0
    }
}

/// A cached node checked out by a reader
///
/// The node stays alive while the lease does, even if the cache replaces or
/// evicts the entry in the meantime.
pub struct NodeLease {
    resident: Arc<Resident>,
    height: Height,
    changes: Vec<Change>,
}

impl NodeLease {
    /// Height the leased node was resolved at
    pub fn height(&self) -> Height {
        self.height
    }

    /// Records committed after [`NodeLease::height`]
    pub fn changes(&self) -> &[Change] {
        &self.changes
    }
}

impl Deref for NodeLease {
    type Target = Node;

    fn deref(&self) -> &Node {
        &self.resident.node
    }
}

impl Drop for NodeLease {
    fn drop(&mut self) {
        self.resident.leases.fetch_sub(1, Ordering::AcqRel);
    }
}

pub struct NodeCache {
    entries: Mutex<LruCache<Vec<u8>, CacheEntry>>,
    limit: usize,
    evictions: AtomicUsize,
}

impl NodeCache {
    pub fn new(limit: usize) -> Self {
        NodeCache {
            entries: Mutex::new(LruCache::unbounded()),
            limit: limit.max(1),
            evictions: AtomicUsize::new(0),
        }
    }

    /// Lease the entry for `name` if it is not newer than `height`
    pub fn fetch(&self, name: &[u8], height: Height) -> Option<NodeLease> {
        let mut entries = self.entries.lock();
        let entry = entries.peek(name).filter(|e| e.height <= height)?;
        entry.resident.leases.fetch_add(1, Ordering::AcqRel);
        let lease = NodeLease {
            resident: Arc::clone(&entry.resident),
            height: entry.height,
            changes: entry.changes.clone(),
        };
        entries.promote(name);
        Some(lease)
    }

    /// Store `node` resolved at `height`, replacing any existing entry
    pub fn insert(&self, name: Vec<u8>, node: Node, height: Height) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(&name) {
            *entry = CacheEntry::new(node, height);
            return;
        }
        while entries.len() >= self.limit {
            if !self.evict_one(&mut entries) {
                break;
            }
        }
        entries.push(name, CacheEntry::new(node, height));
    }

    /// Least recent unleased entry goes first, then the least recent overall
    fn evict_one(&self, entries: &mut LruCache<Vec<u8>, CacheEntry>) -> bool {
        let victim = entries
            .iter()
            .rev()
            .find(|(_, entry)| !entry.leased())
            .or_else(|| entries.peek_lru())
            .map(|(name, _)| name.clone());

        let Some(name) = victim else {
            return false;
        };
        if let Some(entry) = entries.pop(&name) {
            tracing::trace!(
                name = %name.escape_ascii(),
                height = entry.height,
                leased = entry.leased(),
                "evicted node"
            );
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        true
    }

    /// Buffer committed records on the entries they apply to
    pub fn add_changes(&self, changes: &[Change], height: Height) {
        let mut entries = self.entries.lock();
        for change in changes {
            if let Some(entry) = entries.peek_mut(&change.name) {
                if entry.height <= height {
                    entry.changes.push(change.clone());
                }
            }
        }
    }

    pub fn drop_names(&self, names: &[Vec<u8>]) {
        let mut entries = self.entries.lock();
        for name in names {
            entries.pop(name);
        }
    }

    /// Forget everything resolved or buffered above `height`
    pub fn drop_above(&self, height: Height) {
        let mut entries = self.entries.lock();
        let mut doomed = Vec::new();
        for (name, entry) in entries.iter_mut() {
            if entry.height > height {
                doomed.push(name.clone());
            } else {
                entry.changes.retain(|c| c.height <= height);
            }
        }
        for name in doomed {
            entries.pop(&name);
        }
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, name: &[u8]) -> bool {
        self.entries.lock().contains(name)
    }

    #[cfg(test)]
    fn leases(&self, name: &[u8]) -> Option<usize> {
        self.entries
            .lock()
            .peek(name)
            .map(|e| e.resident.leases.load(Ordering::Acquire))
    }

    pub fn evictions(&self) -> usize {
        self.evictions.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChangeKind;

    fn node(name: &str) -> Node {
        Node::new(name)
    }

    #[test]
    fn test_fetch_respects_height() {
        let cache = NodeCache::new(4);
        cache.insert(b"movie".to_vec(), node("movie"), 10);

        assert!(cache.fetch(b"movie", 9).is_none());
        let lease = cache.fetch(b"movie", 12).unwrap();
        assert_eq!(lease.height(), 10);
        assert_eq!(lease.name(), b"movie");
    }

    #[test]
    fn test_lease_count_follows_lease_lifetime() {
        let cache = NodeCache::new(4);
        cache.insert(b"movie".to_vec(), node("movie"), 1);

        let a = cache.fetch(b"movie", 1).unwrap();
        let b = cache.fetch(b"movie", 1).unwrap();
        assert_eq!(cache.leases(b"movie"), Some(2));
        drop(a);
        assert_eq!(cache.leases(b"movie"), Some(1));
        drop(b);
        assert_eq!(cache.leases(b"movie"), Some(0));
    }

    #[test]
    fn test_eviction_skips_leased_entries() {
        let cache = NodeCache::new(2);
        cache.insert(b"a".to_vec(), node("a"), 1);
        cache.insert(b"b".to_vec(), node("b"), 1);
        let held = cache.fetch(b"a", 1).unwrap();
        // "a" is now most recent, make it least recent again
        let _ = cache.fetch(b"b", 1);

        cache.insert(b"c".to_vec(), node("c"), 1);
        assert!(cache.contains(b"a"));
        assert!(!cache.contains(b"b"));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.evictions(), 1);
        drop(held);
    }

    #[test]
    fn test_eviction_falls_back_to_lru_when_all_leased() {
        let cache = NodeCache::new(1);
        cache.insert(b"a".to_vec(), node("a"), 1);
        let held = cache.fetch(b"a", 1).unwrap();

        cache.insert(b"b".to_vec(), node("b"), 1);
        assert!(!cache.contains(b"a"));
        assert!(cache.contains(b"b"));
        // the evicted node outlives its entry
        assert_eq!(held.name(), b"a");
    }

    #[test]
    fn test_add_changes_only_buffers_older_entries() {
        let cache = NodeCache::new(4);
        cache.insert(b"old".to_vec(), node("old"), 5);
        cache.insert(b"new".to_vec(), node("new"), 9);

        let changes = vec![
            Change::new(ChangeKind::AddClaim, "old", 7),
            Change::new(ChangeKind::AddClaim, "new", 7),
            Change::new(ChangeKind::AddClaim, "absent", 7),
        ];
        cache.add_changes(&changes, 7);

        assert_eq!(cache.fetch(b"old", 7).unwrap().changes().len(), 1);
        assert!(cache.fetch(b"new", 9).unwrap().changes().is_empty());
        assert!(!cache.contains(b"absent"));
    }

    #[test]
    fn test_insert_resets_buffer() {
        let cache = NodeCache::new(4);
        cache.insert(b"movie".to_vec(), node("movie"), 1);
        cache.add_changes(&[Change::new(ChangeKind::AddClaim, "movie", 2)], 2);
        cache.insert(b"movie".to_vec(), node("movie"), 2);

        let lease = cache.fetch(b"movie", 2).unwrap();
        assert!(lease.changes().is_empty());
        assert_eq!(lease.height(), 2);
    }

    #[test]
    fn test_eviction_at_capacity_takes_lru() {
        let cache = NodeCache::new(3);
        for name in ["a", "b", "c"] {
            cache.insert(name.as_bytes().to_vec(), node(name), 1);
        }
        drop(cache.fetch(b"a", 1).unwrap());

        cache.insert(b"d".to_vec(), node("d"), 1);
        assert_eq!(cache.len(), 3);
        assert!(cache.contains(b"a"));
        assert!(!cache.contains(b"b"));
        assert!(cache.contains(b"c"));
        assert!(cache.contains(b"d"));
        assert_eq!(cache.evictions(), 1);
    }

    #[test]
    fn test_drop_above_and_clear() {
        let cache = NodeCache::new(4);
        cache.insert(b"a".to_vec(), node("a"), 1);
        cache.insert(b"b".to_vec(), node("b"), 3);
        cache.insert(b"c".to_vec(), node("c"), 2);
        cache.add_changes(&[Change::new(ChangeKind::AddClaim, "a", 3)], 3);

        cache.drop_above(2);
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(b"b"));
        assert!(cache.fetch(b"a", 2).unwrap().changes().is_empty());

        cache.drop_names(&[b"c".to_vec(), b"zz".to_vec()]);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_fetches_release_leases() {
        let cache = NodeCache::new(8);
        cache.insert(b"movie".to_vec(), node("movie"), 1);

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..100 {
                        let lease = cache.fetch(b"movie", 1).unwrap();
                        assert_eq!(lease.name(), b"movie");
                    }
                });
            }
        });
        assert_eq!(cache.leases(b"movie"), Some(0));
    }
}
