//! Per-name claim state and winner resolution

use crate::error::ValidationError;
use crate::model::{Amount, Change, ChangeKind, ClaimId, Hash, Height, OutPoint};
use std::fmt;

/// Default divisor applied to the blocks since the last takeover
pub const DEFAULT_ACTIVATION_FACTOR: Height = 32;

/// Default cap on the activation delay, in blocks
pub const DEFAULT_MAX_ACTIVATION_DELAY: Height = 4032;

/// A claim known to a node
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClaimEntry {
    pub claim_id: ClaimId,
    pub outpoint: OutPoint,
    pub amount: Amount,
    pub value: Vec<u8>,
    /// Height the claim entered the trie
    pub accepted_height: Height,
    pub active_height: Height,
}

/// A support known to a node
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SupportEntry {
    /// The claim this support adds weight to
    pub claim_id: ClaimId,
    pub outpoint: OutPoint,
    pub amount: Amount,
    pub accepted_height: Height,
    pub active_height: Height,
}

/// Lifecycle of a name
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeState {
    /// No claims
    Absent,
    /// Claims exist but none is active yet
    Pending,
    /// A winning claim exists
    Active,
}

impl NodeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeState::Absent => "absent",
            NodeState::Pending => "pending",
            NodeState::Active => "active",
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How long new claims and supports wait before they count
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActivationParams {
    pub factor: Height,
    pub max_delay: Height,
}

impl Default for ActivationParams {
    fn default() -> Self {
        ActivationParams {
            factor: DEFAULT_ACTIVATION_FACTOR,
            max_delay: DEFAULT_MAX_ACTIVATION_DELAY,
        }
    }
}

impl ActivationParams {
    /// Delay for an entry accepted at `height` into `node`
    ///
    /// `node` must reflect the state committed before `height`, so the delay
    /// does not depend on the order of changes inside a block.
    pub fn delay(&self, node: &Node, height: Height) -> Height {
        match (node.best, node.takeover_height) {
            (Some(_), Some(takeover)) => height
                .saturating_sub(takeover)
                .checked_div(self.factor)
                .unwrap_or(0)
                .min(self.max_delay),
            _ => 0,
        }
    }
}

/// Resolved state of one name as of a height
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    name: Vec<u8>,
    height: Height,
    claims: Vec<ClaimEntry>,
    supports: Vec<SupportEntry>,
    best: Option<ClaimId>,
    takeover_height: Option<Height>,
}

impl Node {
    pub fn new(name: impl Into<Vec<u8>>) -> Self {
        Node {
            name: name.into(),
            height: 0,
            claims: Vec::new(),
            supports: Vec::new(),
            best: None,
            takeover_height: None,
        }
    }

    /// Rebuild a node from its full history, ignoring records above `height`
    pub fn replay(name: &[u8], changes: &[Change], height: Height) -> Result<Self, ValidationError> {
        let mut node = Node::new(name);
        node.catch_up(changes, height)?;
        Ok(node)
    }

    /// Apply `changes` (records newer than this node) and resolve through `height`
    ///
    /// Each height is resolved once all of its records are applied, and every
    /// activation in between is resolved at its own height.
    pub fn catch_up(&mut self, changes: &[Change], height: Height) -> Result<(), ValidationError> {
        let mut pending = changes.iter().filter(|c| c.height <= height).peekable();
        while let Some(change) = pending.next() {
            if change.height > self.height + 1 {
                self.advance_to(change.height - 1);
            }
            self.apply(change)?;
            if pending.peek().map_or(true, |next| next.height != change.height) {
                self.advance_to(change.height);
            }
        }
        self.advance_to(height);
        Ok(())
    }

    /// Apply one record without resolving
    pub fn apply(&mut self, change: &Change) -> Result<(), ValidationError> {
        match change.kind {
            ChangeKind::AddClaim | ChangeKind::UpdateClaim => {
                self.check_unique(&change.outpoint)?;
                self.claims.push(ClaimEntry {
                    claim_id: change.claim_id,
                    outpoint: change.outpoint,
                    amount: change.amount,
                    value: change.value.clone(),
                    accepted_height: change.visible_height,
                    active_height: change.active_height,
                });
            }
            ChangeKind::AddSupport => {
                self.check_unique(&change.outpoint)?;
                self.supports.push(SupportEntry {
                    claim_id: change.claim_id,
                    outpoint: change.outpoint,
                    amount: change.amount,
                    accepted_height: change.visible_height,
                    active_height: change.active_height,
                });
            }
            ChangeKind::SpendClaim => {
                let pos = self
                    .claims
                    .iter()
                    .position(|c| c.outpoint == change.outpoint)
                    .ok_or_else(|| ValidationError::UnknownClaim {
                        name: self.name.clone(),
                        outpoint: change.outpoint,
                    })?;
                self.claims.remove(pos);
            }
            ChangeKind::SpendSupport => {
                let pos = self
                    .supports
                    .iter()
                    .position(|s| s.outpoint == change.outpoint)
                    .ok_or_else(|| ValidationError::UnknownSupport {
                        name: self.name.clone(),
                        outpoint: change.outpoint,
                    })?;
                self.supports.remove(pos);
            }
        }
        Ok(())
    }

    fn check_unique(&self, outpoint: &OutPoint) -> Result<(), ValidationError> {
        let taken = self.claims.iter().any(|c| c.outpoint == *outpoint)
            || self.supports.iter().any(|s| s.outpoint == *outpoint);
        if taken {
            return Err(ValidationError::DuplicateOutput {
                name: self.name.clone(),
                outpoint: *outpoint,
            });
        }
        Ok(())
    }

    /// Resolve every activation up to `height`, then `height` itself
    pub fn advance_to(&mut self, height: Height) {
        if height < self.height {
            return;
        }
        while let Some(next) = self.next_activation().filter(|h| *h <= height) {
            self.resolve(next);
            self.height = next;
        }
        self.resolve(height);
        self.height = height;
    }

    fn resolve(&mut self, height: Height) {
        let mut candidate = self.best_active(height);
        if candidate == self.best {
            return;
        }

        // A takeover pulls every pending entry forward and competes again.
        if self.activate_pending(height) {
            candidate = self.best_active(height);
        }
        if candidate != self.best {
            self.best = candidate;
            self.takeover_height = candidate.map(|_| height);
        }
    }

    fn activate_pending(&mut self, height: Height) -> bool {
        let mut changed = false;
        for claim in self.claims.iter_mut().filter(|c| c.active_height > height) {
            claim.active_height = height;
            changed = true;
        }
        for support in self.supports.iter_mut().filter(|s| s.active_height > height) {
            support.active_height = height;
            changed = true;
        }
        changed
    }

    /// Highest effective amount, then earliest activation, then smallest id
    fn best_active(&self, height: Height) -> Option<ClaimId> {
        self.claims
            .iter()
            .filter(|c| c.active_height <= height)
            .map(|c| (self.weight_at(c, height), c))
            .max_by(|(wa, a), (wb, b)| {
                wa.cmp(wb)
                    .then(b.active_height.cmp(&a.active_height))
                    .then(b.claim_id.cmp(&a.claim_id))
            })
            .map(|(_, c)| c.claim_id)
    }

    fn weight_at(&self, claim: &ClaimEntry, height: Height) -> Amount {
        let support: Amount = self
            .supports
            .iter()
            .filter(|s| s.claim_id == claim.claim_id && s.active_height <= height)
            .map(|s| s.amount)
            .sum();
        claim.amount.saturating_add(support)
    }

    /// Nearest activation height after the resolved height
    pub fn next_activation(&self) -> Option<Height> {
        let claims = self.claims.iter().map(|c| c.active_height);
        let supports = self.supports.iter().map(|s| s.active_height);
        claims.chain(supports).filter(|h| *h > self.height).min()
    }

    pub fn name(&self) -> &[u8] {
        &self.name
    }

    /// Height this node is resolved through
    pub fn height(&self) -> Height {
        self.height
    }

    pub fn claims(&self) -> &[ClaimEntry] {
        &self.claims
    }

    pub fn supports(&self) -> &[SupportEntry] {
        &self.supports
    }

    pub fn takeover_height(&self) -> Option<Height> {
        self.takeover_height
    }

    pub fn state(&self) -> NodeState {
        if self.claims.is_empty() {
            NodeState::Absent
        } else if self.best.is_some() {
            NodeState::Active
        } else {
            NodeState::Pending
        }
    }

    /// No claims and no supports left
    pub fn is_empty(&self) -> bool {
        self.claims.is_empty() && self.supports.is_empty()
    }

    pub fn best_claim(&self) -> Option<&ClaimEntry> {
        let best = self.best?;
        self.claims.iter().find(|c| c.claim_id == best)
    }

    pub fn claim(&self, outpoint: &OutPoint) -> Option<&ClaimEntry> {
        self.claims.iter().find(|c| c.outpoint == *outpoint)
    }

    pub fn support(&self, outpoint: &OutPoint) -> Option<&SupportEntry> {
        self.supports.iter().find(|s| s.outpoint == *outpoint)
    }

    /// Own amount plus active supports, as of the resolved height
    pub fn effective_amount(&self, claim_id: &ClaimId) -> Amount {
        self.claims
            .iter()
            .find(|c| c.claim_id == *claim_id && c.active_height <= self.height)
            .map(|c| self.weight_at(c, self.height))
            .unwrap_or(0)
    }

    /// Merkle leaf for this name, `None` when nothing is active
    pub fn digest(&self) -> Option<Hash> {
        let best = self.best_claim()?;
        let amount = self.effective_amount(&best.claim_id);
        Some(Hash::digest_many(&[
            &(self.name.len() as u16).to_le_bytes(),
            &self.name,
            best.claim_id.as_bytes(),
            &amount.to_le_bytes(),
        ]))
    }
}
