//! Claim identifiers and output references

use super::Hash;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Block height
pub type Height = u32;

/// Amount in the chain's base unit
pub type Amount = u64;

/// Names longer than this are rejected by the mutation API
pub const MAX_NAME_LEN: usize = 255;

/// Reference to a transaction output: `(txid, index)`
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: Hash,
    pub index: u32,
}

impl OutPoint {
    pub fn new(txid: Hash, index: u32) -> Self {
        OutPoint { txid, index }
    }

    /// The placeholder input of a coinbase transaction
    pub fn null() -> Self {
        OutPoint {
            txid: Hash::ZERO,
            index: u32::MAX,
        }
    }

    pub fn is_null(&self) -> bool {
        self.txid.is_zero() && self.index == u32::MAX
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.index)
    }
}

impl fmt::Debug for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OutPoint({}:{})", self.txid.short(), self.index)
    }
}

/// 20-byte claim identifier
///
/// A claim's identifier is fixed by the output that created it and survives
/// updates, so supports keep pointing at the same claim.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct ClaimId([u8; 20]);

impl ClaimId {
    pub const LEN: usize = 20;

    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        ClaimId(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; 20] = bytes.try_into().ok()?;
        Some(ClaimId(arr))
    }

    /// Identifier of a claim created at `outpoint`
    pub fn from_outpoint(outpoint: &OutPoint) -> Self {
        let digest = Hash::digest_many(&[outpoint.txid.as_bytes(), &outpoint.index.to_le_bytes()]);
        let mut id = [0u8; 20];
        id.copy_from_slice(&digest.as_bytes()[..20]);
        ClaimId(id)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        ClaimId::from_slice(&bytes).ok_or(hex::FromHexError::InvalidStringLength)
    }
}

impl fmt::Display for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClaimId({})", &self.to_hex()[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_id_depends_on_index() {
        let txid = Hash::digest(b"tx");
        let a = ClaimId::from_outpoint(&OutPoint::new(txid, 0));
        let b = ClaimId::from_outpoint(&OutPoint::new(txid, 1));
        assert_ne!(a, b);
        assert_eq!(a, ClaimId::from_outpoint(&OutPoint::new(txid, 0)));
    }

    #[test]
    fn test_claim_id_hex() {
        let id = ClaimId::from_outpoint(&OutPoint::new(Hash::digest(b"tx"), 7));
        assert_eq!(id.to_hex().len(), 40);
        assert_eq!(ClaimId::from_hex(&id.to_hex()).unwrap(), id);
        assert!(ClaimId::from_hex(&Hash::ZERO.to_hex()).is_err());
    }
}
