//! Change records - the immutable unit of the claim trie's history

use super::{Amount, ClaimId, Height, OutPoint};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// The ownership event a change record describes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    AddClaim,
    SpendClaim,
    AddSupport,
    SpendSupport,
    UpdateClaim,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::AddClaim => "add_claim",
            ChangeKind::SpendClaim => "spend_claim",
            ChangeKind::AddSupport => "add_support",
            ChangeKind::SpendSupport => "spend_support",
            ChangeKind::UpdateClaim => "update_claim",
        }
    }

    /// True for the kinds that take an entry out of a node
    pub fn is_spend(&self) -> bool {
        matches!(self, ChangeKind::SpendClaim | ChangeKind::SpendSupport)
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ownership event for one name at one height
///
/// Records for a name are ordered by height, then by the order the block
/// produced them. They are never modified once written to the change log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub name: Vec<u8>,
    pub height: Height,
    pub kind: ChangeKind,
    pub claim_id: ClaimId,
    pub outpoint: OutPoint,
    pub amount: Amount,
    /// Opaque claim payload (empty for supports and spends)
    pub value: Vec<u8>,
    /// Height at which the claim or support starts counting
    pub active_height: Height,
    /// Height at which the claim or support entered the trie
    pub visible_height: Height,
    pub spent_children: BTreeSet<Vec<u8>>,
}

impl Change {
    pub fn new(kind: ChangeKind, name: impl Into<Vec<u8>>, height: Height) -> Self {
        Change {
            name: name.into(),
            height,
            kind,
            claim_id: ClaimId::default(),
            outpoint: OutPoint::default(),
            amount: 0,
            value: Vec::new(),
            active_height: height,
            visible_height: height,
            spent_children: BTreeSet::new(),
        }
    }

    pub fn with_claim_id(mut self, claim_id: ClaimId) -> Self {
        self.claim_id = claim_id;
        self
    }

    pub fn with_outpoint(mut self, outpoint: OutPoint) -> Self {
        self.outpoint = outpoint;
        self
    }

    pub fn with_amount(mut self, amount: Amount) -> Self {
        self.amount = amount;
        self
    }

    pub fn with_value(mut self, value: impl Into<Vec<u8>>) -> Self {
        self.value = value.into();
        self
    }

    pub fn with_active_height(mut self, active_height: Height) -> Self {
        self.active_height = active_height;
        self
    }

    pub fn with_spent_children(mut self, children: impl IntoIterator<Item = Vec<u8>>) -> Self {
        self.spent_children = children.into_iter().collect();
        self
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} @{} claim={} op={} amount={} active={}",
            self.kind,
            self.name.escape_ascii(),
            self.height,
            self.claim_id,
            self.outpoint,
            self.amount,
            self.active_height
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Hash;

    #[test]
    fn test_new_change_defaults_activation_to_height() {
        let chg = Change::new(ChangeKind::AddClaim, "movie", 100);
        assert_eq!(chg.active_height, 100);
        assert_eq!(chg.visible_height, 100);
        assert!(chg.value.is_empty());
    }

    #[test]
    fn test_builder_and_display() {
        let op = OutPoint::new(Hash::digest(b"tx"), 1);
        let chg = Change::new(ChangeKind::AddSupport, "movie", 101)
            .with_outpoint(op)
            .with_claim_id(ClaimId::from_outpoint(&op))
            .with_amount(5)
            .with_active_height(103);

        let text = chg.to_string();
        assert!(text.starts_with("add_support movie @101"));
        assert!(text.contains("active=103"));
        assert!(!chg.kind.is_spend());
        assert!(ChangeKind::SpendSupport.is_spend());
    }
}
