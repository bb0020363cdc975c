//! Core data model types for the claim trie

mod change;
mod claim;
mod hash;

pub use change::{Change, ChangeKind};
pub use claim::{Amount, ClaimId, Height, OutPoint, MAX_NAME_LEN};
pub use hash::Hash;
