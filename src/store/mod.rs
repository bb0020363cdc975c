//! Durable change log
//!
//! Every ownership event is kept as an immutable [`Change`] keyed by
//! `(name, height, sequence)` and physically ordered by name, so a name's
//! history is one range read and descendants of a name prefix are one range
//! scan. Nodes are rebuilt from this log; nothing derived is persisted except
//! the commit checkpoint.

mod file_store;
mod frame;
mod index;
mod memory;

pub use file_store::LogStore;
pub use frame::FrameKind;
pub use memory::MemoryStore;

use crate::model::{Change, Hash, Height};
use crate::StorageResult;
use serde::{Deserialize, Serialize};

/// Durable commit marker: the last height whose changes are fully written
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub height: Height,
    pub root: Hash,
}

/// Ordered, append-only store of change records
///
/// Implementations are shared between the node manager and audit tooling, so
/// every method takes `&self` and must be safe to call concurrently.
pub trait ChangeRepo: Send + Sync {
    /// Persist `changes` in order, all or nothing
    fn append(&self, changes: &[Change]) -> StorageResult<()>;

    /// Every record for `name`, ordered by height then sequence
    fn load(&self, name: &[u8]) -> StorageResult<Vec<Change>>;

    /// Delete every record for `name` above `height`
    fn truncate_above(&self, name: &[u8], height: Height) -> StorageResult<()>;

    /// Visit the full history of every name starting with `prefix`, in name
    /// order, until `visit` returns false
    fn iterate_children(
        &self,
        prefix: &[u8],
        visit: &mut dyn FnMut(Vec<Change>) -> bool,
    ) -> StorageResult<()>;

    /// Visit every stored name in order until `visit` returns false
    fn iterate_all(&self, visit: &mut dyn FnMut(&[u8]) -> bool) -> StorageResult<()>;

    /// Distinct names starting with `prefix`, sorted, without loading records
    fn names_with_prefix(&self, prefix: &[u8]) -> StorageResult<Vec<Vec<u8>>>;

    /// Names with at least one record above `height`, sorted
    fn names_above(&self, height: Height) -> StorageResult<Vec<Vec<u8>>>;

    fn checkpoint(&self, checkpoint: Checkpoint) -> StorageResult<()>;

    fn last_checkpoint(&self) -> StorageResult<Option<Checkpoint>>;

    /// Delete every record above `checkpoint.height` and make `checkpoint`
    /// the last one, as a single durable step
    ///
    /// Returns the names that lost records.
    fn rollback(&self, checkpoint: Checkpoint) -> StorageResult<Vec<Vec<u8>>>;

    /// Force buffered writes to stable storage
    fn flush(&self) -> StorageResult<()>;

    /// Release the underlying storage; later calls fail with `Closed`
    fn close(&self) -> StorageResult<()>;
}

/// Exclusive upper bound of the keys starting with `prefix`
///
/// Trailing 0xFF bytes cannot be incremented and are dropped; `None` means the
/// range runs to the end of the key space.
pub fn prefix_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last != 0xff {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_end() {
        assert_eq!(prefix_end(b"cat"), Some(b"cau".to_vec()));
        assert_eq!(prefix_end(b"a\xff"), Some(b"b".to_vec()));
        assert_eq!(prefix_end(b"a\xfe\xff\xff"), Some(b"a\xff".to_vec()));
        assert_eq!(prefix_end(b"\xff\xff"), None);
        assert_eq!(prefix_end(b""), None);
    }
}
