//! Merkle trie over the names with an active winner

use super::TrieNode;
use crate::model::Hash;

/// Maps each name to its node digest and summarizes all of them in one root
///
/// The root depends only on the set of `(name, digest)` pairs, never on the
/// order they were inserted in.
#[derive(Clone, Debug, Default)]
pub struct MerkleTrie {
    root: TrieNode,
    len: usize,
}

impl MerkleTrie {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Hash::ZERO` for an empty trie
    pub fn root_hash(&self) -> Hash {
        if self.root.is_empty() {
            Hash::ZERO
        } else {
            self.root.hash()
        }
    }

    /// Set the digest for `key`, returns the previous one
    pub fn insert(&mut self, key: &[u8], value: Hash) -> Option<Hash> {
        let previous = self.root.insert(key, value);
        if previous.is_none() {
            self.len += 1;
        }
        previous
    }

    pub fn get(&self, key: &[u8]) -> Option<Hash> {
        let mut node = &self.root;
        for byte in key {
            node = node.child(*byte)?;
        }
        node.value()
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<Hash> {
        let removed = self.root.remove(key);
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// All entries under `prefix`, in key order
    pub fn list_prefix(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Hash)> {
        let mut node = &self.root;
        for byte in prefix {
            match node.child(*byte) {
                Some(child) => node = child,
                None => return Vec::new(),
            }
        }
        let mut results = Vec::new();
        collect(node, &mut prefix.to_vec(), &mut results);
        results
    }
}

fn collect(node: &TrieNode, key: &mut Vec<u8>, results: &mut Vec<(Vec<u8>, Hash)>) {
    if let Some(value) = node.value() {
        results.push((key.clone(), value));
    }
    for (byte, child) in node.children() {
        key.push(byte);
        collect(child, key, results);
        key.pop();
    }
}
