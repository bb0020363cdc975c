//! # claimtrie
//!
//! State engine for a name-claim blockchain.
//!
//! Names are bid for with claims and backed with supports. Every block's
//! ownership events are appended to a durable change log; the resolved state
//! of each name is derived from that log on demand and summarized in a merkle
//! root that must match the one committed to by the block header.
//!
//! ## Core Concepts
//!
//! - **Changes**: Immutable per-name records, the only persisted state
//! - **Nodes**: Resolved claims and supports of one name, rebuilt by replay
//! - **Activation**: New entries wait longer the longer a winner has held the name
//! - **Root hash**: Merkle commitment over every name's winner
//!
//! ## Example
//!
//! ```ignore
//! use claimtrie::{ClaimTrie, Config};
//!
//! let mut trie = ClaimTrie::open(&Config::default())?;
//! let id = trie.add_claim(b"movie", outpoint, 10, b"payload".to_vec())?;
//! let root = trie.commit(trie.height() + 1)?;
//! ```

pub mod config;
pub mod handler;
pub mod model;
pub mod node;
pub mod script;
pub mod store;
pub mod trie;

mod claimtrie;
mod error;

pub use claimtrie::ClaimTrie;
pub use config::Config;
pub use error::{Error, Result, StorageContext, StorageError, StorageResult, ValidationError};
pub use handler::{Block, SpentOutputs, Transaction, TxOut};
pub use model::{Amount, Change, ChangeKind, ClaimId, Hash, Height, OutPoint, MAX_NAME_LEN};
pub use node::{ActivationParams, ClaimEntry, Node, NodeState, SupportEntry};
pub use script::{ClaimOpcode, ClaimScript, ScriptError};
pub use store::{ChangeRepo, Checkpoint, LogStore, MemoryStore};

/// Change-log format version
pub const VERSION: u32 = 1;

/// Magic bytes at the start of a change-log file
pub const MAGIC: &[u8; 8] = b"CLMTRIE\0";
