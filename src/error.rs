//! Error types for the claim trie

use crate::model::{ClaimId, Hash, Height, OutPoint};
use crate::script::ScriptError;
use std::fmt;
use thiserror::Error;

/// Result type alias for claim trie operations
pub type Result<T> = std::result::Result<T, Error>;

/// Result type alias for change-log repository operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Errors that can occur in claim trie operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Consensus mismatch at height {height}: expected root {expected}, computed {computed}")]
    ConsensusMismatch {
        height: Height,
        expected: Hash,
        computed: Hash,
    },

    #[error("Config error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the node must halt rather than reject the block and carry on
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Validation(_))
    }
}

/// Where in the name space a storage failure happened
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StorageContext {
    pub name: Option<Vec<u8>>,
    pub height: Option<Height>,
}

impl StorageContext {
    pub fn at_height(height: Height) -> Self {
        StorageContext {
            name: None,
            height: Some(height),
        }
    }

    pub fn at(name: &[u8], height: Height) -> Self {
        StorageContext {
            name: Some(name.to_vec()),
            height: Some(height),
        }
    }
}

impl fmt::Display for StorageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.name, self.height) {
            (Some(name), Some(height)) => write!(f, "name {} height {}", name.escape_ascii(), height),
            (Some(name), None) => write!(f, "name {}", name.escape_ascii()),
            (None, Some(height)) => write!(f, "height {}", height),
            (None, None) => f.write_str("change log"),
        }
    }
}

/// Failures of the durable change log
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error at {context}: {source}")]
    Io {
        context: StorageContext,
        #[source]
        source: std::io::Error,
    },

    #[error("Decode error at {context}: {source}")]
    Decode {
        context: StorageContext,
        #[source]
        source: bincode::Error,
    },

    #[error("Corruption detected at offset {offset}: {reason}")]
    Corruption { offset: u64, reason: String },

    #[error("Inconsistent history at {context}: {reason}")]
    Inconsistent {
        context: StorageContext,
        reason: String,
    },

    #[error("Invalid change-log file: {0}")]
    InvalidFile(String),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Change log is closed")]
    Closed,
}

impl StorageError {
    pub fn io(context: StorageContext, source: std::io::Error) -> Self {
        StorageError::Io { context, source }
    }

    pub fn decode(context: StorageContext, source: bincode::Error) -> Self {
        StorageError::Decode { context, source }
    }
}

/// A change that violates the trie's ordering or identity rules
///
/// These come from malformed or hostile blocks: the block is rejected, the
/// process keeps running.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Name of {len} bytes exceeds the maximum length")]
    NameTooLong { len: usize },

    #[error("Name not found: {}", .name.escape_ascii())]
    NameNotFound { name: Vec<u8> },

    #[error("Unknown claim {outpoint} for name {}", .name.escape_ascii())]
    UnknownClaim { name: Vec<u8>, outpoint: OutPoint },

    #[error("Unknown support {outpoint} for name {}", .name.escape_ascii())]
    UnknownSupport { name: Vec<u8>, outpoint: OutPoint },

    #[error("Output {outpoint} for name {} was already spent in this block", .name.escape_ascii())]
    AlreadySpent { name: Vec<u8>, outpoint: OutPoint },

    #[error("Output {outpoint} for name {} is already in the trie", .name.escape_ascii())]
    DuplicateOutput { name: Vec<u8>, outpoint: OutPoint },

    #[error("Update of claim {claim_id} for name {} without a spend in the same block", .name.escape_ascii())]
    UpdateWithoutSpend { name: Vec<u8>, claim_id: ClaimId },

    #[error("Expected block height {expected}, got {found}")]
    HeightMismatch { expected: Height, found: Height },

    #[error("Spent output {0} not found")]
    MissingInput(OutPoint),

    #[error("Script error at height {height}: {source}")]
    Script {
        height: Height,
        #[source]
        source: ScriptError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_are_not_fatal() {
        let err: Error = ValidationError::NameNotFound {
            name: b"movie".to_vec(),
        }
        .into();
        assert!(!err.is_fatal());
        assert_eq!(
            err.to_string(),
            "Validation error: Name not found: movie"
        );

        let err: Error = StorageError::Closed.into();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_storage_context_display() {
        let ctx = StorageContext::at(b"caf\xc3\xa9", 12);
        assert_eq!(ctx.to_string(), "name caf\\xc3\\xa9 height 12");
        assert_eq!(StorageContext::default().to_string(), "change log");
    }
}
