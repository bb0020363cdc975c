//! Trie node type

use crate::model::Hash;
use std::collections::BTreeMap;

/// One byte of key per level; the hash is kept current on every update
#[derive(Clone, Debug, Default)]
pub struct TrieNode {
    children: BTreeMap<u8, TrieNode>,
    value: Option<Hash>,
    hash: Hash,
}

impl TrieNode {
    pub fn value(&self) -> Option<Hash> {
        self.value
    }

    pub fn hash(&self) -> Hash {
        self.hash
    }

    /// No value here and nothing below
    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.children.is_empty()
    }

    pub(super) fn child(&self, byte: u8) -> Option<&TrieNode> {
        self.children.get(&byte)
    }

    pub(super) fn children(&self) -> impl Iterator<Item = (u8, &TrieNode)> {
        self.children.iter().map(|(b, n)| (*b, n))
    }

    pub(super) fn insert(&mut self, key: &[u8], value: Hash) -> Option<Hash> {
        let previous = match key.split_first() {
            None => self.value.replace(value),
            Some((byte, rest)) => self.children.entry(*byte).or_default().insert(rest, value),
        };
        if previous != Some(value) {
            self.rehash();
        }
        previous
    }

    pub(super) fn remove(&mut self, key: &[u8]) -> Option<Hash> {
        let removed = match key.split_first() {
            None => self.value.take(),
            Some((byte, rest)) => {
                let child = self.children.get_mut(byte)?;
                let removed = child.remove(rest);
                if child.is_empty() {
                    self.children.remove(byte);
                }
                removed
            }
        };
        if removed.is_some() {
            self.rehash();
        }
        removed
    }

    /// `marker | value? | (byte | child hash)*`, children in byte order
    fn rehash(&mut self) {
        let mut hasher = blake3::Hasher::new();
        match &self.value {
            Some(value) => {
                hasher.update(&[1]);
                hasher.update(value.as_bytes());
            }
            None => {
                hasher.update(&[0]);
            }
        }
        for (byte, child) in &self.children {
            hasher.update(&[*byte]);
            hasher.update(child.hash.as_bytes());
        }
        self.hash = Hash::from_bytes(*hasher.finalize().as_bytes());
    }
}
