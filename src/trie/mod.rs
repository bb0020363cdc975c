//! Merkle commitment over the resolved claim state
//!
//! Keys are names, values are node digests. A node's hash covers its own
//! value and the hashes of its children, so the root changes whenever any
//! name's winner or effective amount does.

mod node;
mod tree;

pub use node::TrieNode;
pub use tree::MerkleTrie;
