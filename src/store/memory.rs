//! In-memory change log for tests and throwaway tries

use super::index::Index;
use super::{ChangeRepo, Checkpoint};
use crate::error::StorageError;
use crate::model::{Change, Height};
use crate::StorageResult;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// A [`ChangeRepo`] that keeps every record in memory
pub struct MemoryStore {
    index: RwLock<Index<Change>>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            index: RwLock::new(Index::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn record_count(&self) -> usize {
        self.index.read().len()
    }

    fn check_open(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::Closed);
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeRepo for MemoryStore {
    fn append(&self, changes: &[Change]) -> StorageResult<()> {
        self.check_open()?;
        let mut index = self.index.write();
        for change in changes {
            index.push(&change.name, change.height, change.clone());
        }
        Ok(())
    }

    fn load(&self, name: &[u8]) -> StorageResult<Vec<Change>> {
        self.check_open()?;
        Ok(self
            .index
            .read()
            .name_records(name)
            .map(|(_, change)| change.clone())
            .collect())
    }

    fn truncate_above(&self, name: &[u8], height: Height) -> StorageResult<()> {
        self.check_open()?;
        self.index.write().truncate(name, height);
        Ok(())
    }

    fn iterate_children(
        &self,
        prefix: &[u8],
        visit: &mut dyn FnMut(Vec<Change>) -> bool,
    ) -> StorageResult<()> {
        self.check_open()?;
        let names = self.index.read().names_with_prefix(prefix);
        for name in names {
            if !visit(self.load(&name)?) {
                break;
            }
        }
        Ok(())
    }

    fn iterate_all(&self, visit: &mut dyn FnMut(&[u8]) -> bool) -> StorageResult<()> {
        self.check_open()?;
        let names = self.index.read().names_with_prefix(b"");
        for name in names {
            if !visit(&name) {
                break;
            }
        }
        Ok(())
    }

    fn names_with_prefix(&self, prefix: &[u8]) -> StorageResult<Vec<Vec<u8>>> {
        self.check_open()?;
        Ok(self.index.read().names_with_prefix(prefix))
    }

    fn names_above(&self, height: Height) -> StorageResult<Vec<Vec<u8>>> {
        self.check_open()?;
        Ok(self.index.read().names_above(height))
    }

    fn checkpoint(&self, checkpoint: Checkpoint) -> StorageResult<()> {
        self.check_open()?;
        self.index.write().checkpoint = Some(checkpoint);
        Ok(())
    }

    fn last_checkpoint(&self) -> StorageResult<Option<Checkpoint>> {
        self.check_open()?;
        Ok(self.index.read().checkpoint)
    }

    fn rollback(&self, checkpoint: Checkpoint) -> StorageResult<Vec<Vec<u8>>> {
        self.check_open()?;
        Ok(self.index.write().rollback(checkpoint))
    }

    fn flush(&self) -> StorageResult<()> {
        self.check_open()
    }

    fn close(&self) -> StorageResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChangeKind;

    #[test]
    fn test_truncate_then_load_keeps_lower_heights() {
        let store = MemoryStore::new();
        let changes: Vec<Change> = (100..106)
            .map(|h| Change::new(ChangeKind::AddSupport, "movie", h).with_amount(h as u64))
            .collect();
        store.append(&changes).unwrap();

        store.truncate_above(b"movie", 102).unwrap();
        let loaded = store.load(b"movie").unwrap();
        assert_eq!(loaded, changes[..3].to_vec());
        assert!(loaded.iter().all(|c| c.height <= 102));
    }

    #[test]
    fn test_iterate_children_stops_early() {
        let store = MemoryStore::new();
        for name in ["cat", "category", "catalog", "car"] {
            store
                .append(&[Change::new(ChangeKind::AddClaim, name, 1)])
                .unwrap();
        }

        let mut visited = Vec::new();
        store
            .iterate_children(b"cat", &mut |changes| {
                visited.push(changes[0].name.clone());
                visited.len() < 2
            })
            .unwrap();
        assert_eq!(visited, vec![b"cat".to_vec(), b"catalog".to_vec()]);
    }
    #[test]
    fn test_names_with_prefix_and_rollback() {
        let store = MemoryStore::new();
        for (name, height) in [("cat", 1), ("category", 2), ("car", 3), ("cat", 3)] {
            store
                .append(&[Change::new(ChangeKind::AddClaim, name, height)])
                .unwrap();
        }
        assert_eq!(
            store.names_with_prefix(b"cat").unwrap(),
            vec![b"cat".to_vec(), b"category".to_vec()]
        );

        let checkpoint = Checkpoint {
            height: 1,
            root: crate::model::Hash::ZERO,
        };
        assert_eq!(
            store.rollback(checkpoint).unwrap(),
            vec![b"car".to_vec(), b"cat".to_vec(), b"category".to_vec()]
        );
        assert_eq!(store.names_with_prefix(b"ca").unwrap(), vec![b"cat".to_vec()]);
        assert_eq!(store.last_checkpoint().unwrap(), Some(checkpoint));
    }
}
