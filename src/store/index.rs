//! Ordered record index shared by the store implementations

use super::{prefix_end, Checkpoint};
use crate::model::Height;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

/// `(name, height, sequence within that height)`
pub(crate) type RecordKey = (Vec<u8>, Height, u32);

/// Records ordered by key, plus a height → names map for rollback
pub(crate) struct Index<V> {
    pub records: BTreeMap<RecordKey, V>,
    heights: BTreeMap<Height, BTreeSet<Vec<u8>>>,
    pub checkpoint: Option<Checkpoint>,
}

impl<V> Index<V> {
    pub fn new() -> Self {
        Index {
            records: BTreeMap::new(),
            heights: BTreeMap::new(),
            checkpoint: None,
        }
    }

    /// Insert after the last record already stored for `(name, height)`
    pub fn push(&mut self, name: &[u8], height: Height, value: V) {
        let seq = self
            .records
            .range((name.to_vec(), height, 0)..=(name.to_vec(), height, u32::MAX))
            .next_back()
            .map(|((_, _, seq), _)| seq + 1)
            .unwrap_or(0);
        self.heights
            .entry(height)
            .or_default()
            .insert(name.to_vec());
        self.records.insert((name.to_vec(), height, seq), value);
    }

    /// All records of one name, in key order
    pub fn name_records<'a>(&'a self, name: &[u8]) -> impl Iterator<Item = (&'a RecordKey, &'a V)> {
        self.records
            .range((name.to_vec(), 0, 0)..=(name.to_vec(), Height::MAX, u32::MAX))
    }

    pub fn has_records_above(&self, name: &[u8], height: Height) -> bool {
        match height.checked_add(1) {
            Some(from) => self
                .records
                .range((name.to_vec(), from, 0)..=(name.to_vec(), Height::MAX, u32::MAX))
                .next()
                .is_some(),
            None => false,
        }
    }

    /// Remove every record of `name` above `height`, returns how many went
    pub fn truncate(&mut self, name: &[u8], height: Height) -> usize {
        let Some(from) = height.checked_add(1) else {
            return 0;
        };
        let doomed: Vec<RecordKey> = self
            .records
            .range((name.to_vec(), from, 0)..=(name.to_vec(), Height::MAX, u32::MAX))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &doomed {
            self.records.remove(key);
            if let Some(names) = self.heights.get_mut(&key.1) {
                names.remove(name);
                if names.is_empty() {
                    self.heights.remove(&key.1);
                }
            }
        }
        doomed.len()
    }

    /// Truncate every name above `checkpoint.height` and adopt `checkpoint`
    pub fn rollback(&mut self, checkpoint: Checkpoint) -> Vec<Vec<u8>> {
        let names = self.names_above(checkpoint.height);
        for name in &names {
            self.truncate(name, checkpoint.height);
        }
        self.checkpoint = Some(checkpoint);
        names
    }

    /// Distinct names starting with `prefix`, in order
    pub fn names_with_prefix(&self, prefix: &[u8]) -> Vec<Vec<u8>> {
        let lower = Bound::Included((prefix.to_vec(), 0, 0));
        let upper = match prefix_end(prefix) {
            Some(end) => Bound::Excluded((end, 0, 0)),
            None => Bound::Unbounded,
        };

        let mut names: Vec<Vec<u8>> = Vec::new();
        for ((name, _, _), _) in self.records.range((lower, upper)) {
            if names.last() != Some(name) {
                names.push(name.clone());
            }
        }
        names
    }

    pub fn names_above(&self, height: Height) -> Vec<Vec<u8>> {
        let Some(from) = height.checked_add(1) else {
            return Vec::new();
        };
        let names: BTreeSet<&Vec<u8>> = self
            .heights
            .range(from..)
            .flat_map(|(_, names)| names.iter())
            .collect();
        names.into_iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}
