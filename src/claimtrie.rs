//! High-level claim trie API
//!
//! This module provides the main entry point: the mutation API the
//! transaction handler drives, block commit, rollback and cold-start
//! recovery, plus read-only queries over resolved names.

use crate::config::Config;
use crate::error::{StorageContext, StorageError, ValidationError};
use crate::model::{Amount, Change, ChangeKind, ClaimId, Hash, Height, OutPoint, MAX_NAME_LEN};
use crate::node::{ActivationParams, Node, NodeManager};
use crate::store::{ChangeRepo, Checkpoint, LogStore};
use crate::trie::MerkleTrie;
use crate::Result;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

/// Outputs spent so far in the block being built
struct BlockState {
    spent_outputs: HashSet<OutPoint>,
    /// Spent claims an update may still reuse, with their activation height
    spent_claims: HashMap<(Vec<u8>, ClaimId), Height>,
}

impl BlockState {
    fn new() -> Self {
        BlockState {
            spent_outputs: HashSet::new(),
            spent_claims: HashMap::new(),
        }
    }

    fn clear(&mut self) {
        self.spent_outputs.clear();
        self.spent_claims.clear();
    }
}

/// The claim trie
///
/// Owns the node manager (and through it the change log and node cache) and
/// the merkle trie whose root is checked against every block header.
pub struct ClaimTrie<R: ChangeRepo = LogStore> {
    manager: NodeManager<R>,
    merkle: MerkleTrie,
    /// Future activation height → names to re-resolve then
    activations: BTreeMap<Height, BTreeSet<Vec<u8>>>,
    /// Past activation height → names re-resolved then, for rollback
    fired: BTreeMap<Height, BTreeSet<Vec<u8>>>,
    /// Lowest height `fired` is complete from
    fired_from: Height,
    block: BlockState,
    sync_on_commit: bool,
    rollback_window: Height,
}

impl ClaimTrie<LogStore> {
    /// Open the change log named by `config`, creating it if needed
    pub fn open(config: &Config) -> Result<Self> {
        config.validate()?;
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let store = LogStore::open_or_create(&config.path)?;
        Self::with_repo(Arc::new(store), config)
    }
}

impl<R: ChangeRepo> ClaimTrie<R> {
    /// Recover a trie from `repo`
    ///
    /// Records above the last checkpoint belong to a commit that never
    /// finished and are removed. The merkle trie is rebuilt from the log and
    /// must reproduce the checkpointed root.
    pub fn with_repo(repo: Arc<R>, config: &Config) -> Result<Self> {
        config.validate()?;
        let checkpoint = repo.last_checkpoint()?;
        let height = checkpoint.map_or(0, |c| c.height);

        let unfinished = repo.names_above(height)?;
        if !unfinished.is_empty() {
            tracing::warn!(
                height,
                names = unfinished.len(),
                "discarding records of an unfinished commit"
            );
            repo.rollback(checkpoint.unwrap_or(Checkpoint {
                height: 0,
                root: Hash::ZERO,
            }))?;
        }

        let manager = NodeManager::new(
            repo,
            config.cache_limit,
            config.activation_params(),
            height,
        );
        let mut trie = ClaimTrie {
            manager,
            merkle: MerkleTrie::new(),
            activations: BTreeMap::new(),
            fired: BTreeMap::new(),
            fired_from: height + 1,
            block: BlockState::new(),
            sync_on_commit: config.sync_on_commit,
            rollback_window: config.rollback_window,
        };
        trie.rebuild()?;

        if let Some(checkpoint) = checkpoint {
            let root = trie.root_hash();
            if root != checkpoint.root {
                return Err(StorageError::Inconsistent {
                    context: StorageContext::at_height(height),
                    reason: format!(
                        "rebuilt root {} does not match checkpoint root {}",
                        root, checkpoint.root
                    ),
                }
                .into());
            }
        }

        tracing::info!(
            height,
            names = trie.merkle.len(),
            root = %trie.root_hash().short(),
            "opened claim trie"
        );
        Ok(trie)
    }

    /// Recompute every digest and pending activation from the log
    fn rebuild(&mut self) -> Result<()> {
        let names = self.manager.repo().names_with_prefix(b"")?;

        self.merkle.clear();
        self.activations.clear();
        self.fired.clear();
        self.fired_from = self.height() + 1;
        for name in &names {
            self.refresh(name)?;
        }
        Ok(())
    }

    /// Re-resolve `name` at the tip and update its digest and next activation
    fn refresh(&mut self, name: &[u8]) -> Result<()> {
        let node = self.manager.node(name)?;
        match node.digest() {
            Some(digest) => {
                self.merkle.insert(name, digest);
            }
            None => {
                self.merkle.remove(name);
            }
        }
        if let Some(next) = node.next_activation() {
            self.activations
                .entry(next)
                .or_default()
                .insert(name.to_vec());
        }
        Ok(())
    }

    /// Last committed height
    pub fn height(&self) -> Height {
        self.manager.height()
    }

    /// Root hash as of the last commit
    pub fn root_hash(&self) -> Hash {
        self.merkle.root_hash()
    }

    pub fn repo(&self) -> &Arc<R> {
        self.manager.repo()
    }

    pub fn activation_params(&self) -> ActivationParams {
        self.manager.params()
    }

    /// Number of names with an active winner
    pub fn len(&self) -> usize {
        self.merkle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.merkle.is_empty()
    }

    /// Mutations not yet committed
    pub fn pending_changes(&self) -> &[Change] {
        self.manager.block_changes()
    }

    // === Mutations (all at the next height) ===

    /// Add a claim created by `outpoint`, returns its identifier
    pub fn add_claim(
        &mut self,
        name: &[u8],
        outpoint: OutPoint,
        amount: Amount,
        value: impl Into<Vec<u8>>,
    ) -> Result<ClaimId> {
        check_name(name)?;
        let height = self.manager.next_height();
        let committed = self.manager.node(name)?;
        let claim_id = ClaimId::from_outpoint(&outpoint);
        let change = Change::new(ChangeKind::AddClaim, name, height)
            .with_claim_id(claim_id)
            .with_outpoint(outpoint)
            .with_amount(amount)
            .with_value(value)
            .with_active_height(height + self.delay(&committed, height));
        self.push(change)?;
        Ok(claim_id)
    }

    /// Spend the claim held by `outpoint`, returns the claim's identifier
    pub fn spend_claim(&mut self, name: &[u8], outpoint: OutPoint) -> Result<ClaimId> {
        check_name(name)?;
        self.check_unspent(name, &outpoint)?;
        let node = self.manager.working_node(name)?;
        if node.is_empty() {
            return Err(ValidationError::NameNotFound {
                name: name.to_vec(),
            }
            .into());
        }
        let claim = node
            .claim(&outpoint)
            .ok_or_else(|| ValidationError::UnknownClaim {
                name: name.to_vec(),
                outpoint,
            })?;

        let mut change = Change::new(ChangeKind::SpendClaim, name, self.manager.next_height())
            .with_claim_id(claim.claim_id)
            .with_outpoint(outpoint)
            .with_amount(claim.amount)
            .with_active_height(claim.active_height);
        change.visible_height = claim.accepted_height;
        let (claim_id, active_height) = (claim.claim_id, claim.active_height);

        self.push(change)?;
        self.block.spent_outputs.insert(outpoint);
        self.block
            .spent_claims
            .insert((name.to_vec(), claim_id), active_height);
        Ok(claim_id)
    }

    pub fn add_support(
        &mut self,
        name: &[u8],
        outpoint: OutPoint,
        amount: Amount,
        claim_id: ClaimId,
    ) -> Result<()> {
        check_name(name)?;
        let height = self.manager.next_height();
        let committed = self.manager.node(name)?;
        let change = Change::new(ChangeKind::AddSupport, name, height)
            .with_claim_id(claim_id)
            .with_outpoint(outpoint)
            .with_amount(amount)
            .with_active_height(height + self.delay(&committed, height));
        self.push(change)
    }

    pub fn spend_support(&mut self, name: &[u8], outpoint: OutPoint) -> Result<()> {
        check_name(name)?;
        self.check_unspent(name, &outpoint)?;
        let node = self.manager.working_node(name)?;
        if node.is_empty() {
            return Err(ValidationError::NameNotFound {
                name: name.to_vec(),
            }
            .into());
        }
        let support = node
            .support(&outpoint)
            .ok_or_else(|| ValidationError::UnknownSupport {
                name: name.to_vec(),
                outpoint,
            })?;

        let mut change = Change::new(ChangeKind::SpendSupport, name, self.manager.next_height())
            .with_claim_id(support.claim_id)
            .with_outpoint(outpoint)
            .with_amount(support.amount)
            .with_active_height(support.active_height);
        change.visible_height = support.accepted_height;

        self.push(change)?;
        self.block.spent_outputs.insert(outpoint);
        Ok(())
    }

    /// Re-create claim `claim_id` at `outpoint`
    ///
    /// The claim must have been spent earlier in this block; the new output
    /// keeps the spent claim's activation height.
    pub fn update_claim(
        &mut self,
        name: &[u8],
        outpoint: OutPoint,
        amount: Amount,
        claim_id: ClaimId,
        value: impl Into<Vec<u8>>,
    ) -> Result<()> {
        check_name(name)?;
        let key = (name.to_vec(), claim_id);
        let active_height = self.block.spent_claims.remove(&key).ok_or_else(|| {
            ValidationError::UpdateWithoutSpend {
                name: name.to_vec(),
                claim_id,
            }
        })?;

        let change = Change::new(ChangeKind::UpdateClaim, name, self.manager.next_height())
            .with_claim_id(claim_id)
            .with_outpoint(outpoint)
            .with_amount(amount)
            .with_value(value)
            .with_active_height(active_height);
        if let Err(e) = self.push(change) {
            self.block.spent_claims.insert(key, active_height);
            return Err(e);
        }
        Ok(())
    }

    fn delay(&self, committed: &Node, height: Height) -> Height {
        self.manager.params().delay(committed, height)
    }

    /// Whether a spend of `outpoint` under `name` is one this trie can check
    ///
    /// True for claim and support outputs of the working node, and for
    /// outputs already spent in the block in progress.
    pub(crate) fn holds_output(&self, name: &[u8], outpoint: &OutPoint) -> Result<bool> {
        if self.block.spent_outputs.contains(outpoint) {
            return Ok(true);
        }
        let node = self.manager.working_node(name)?;
        Ok(node.claim(outpoint).is_some() || node.support(outpoint).is_some())
    }

    fn check_unspent(&self, name: &[u8], outpoint: &OutPoint) -> Result<()> {
        if self.block.spent_outputs.contains(outpoint) {
            return Err(ValidationError::AlreadySpent {
                name: name.to_vec(),
                outpoint: *outpoint,
            }
            .into());
        }
        Ok(())
    }

    /// Validate `change` against the working node, then queue it
    fn push(&mut self, change: Change) -> Result<()> {
        let mut node = self.manager.working_node(&change.name)?;
        node.apply(&change)?;
        self.manager.append_change(change);
        Ok(())
    }

    /// Drop every mutation since the last commit
    pub fn discard_block(&mut self) {
        self.manager.discard_block();
        self.block.clear();
    }

    // === Commit & rollback ===

    /// Persist the block at `height` and return the new root hash
    pub fn commit(&mut self, height: Height) -> Result<Hash> {
        let changes = self.manager.commit(height)?;
        self.block.clear();

        let mut touched: BTreeSet<Vec<u8>> = changes.iter().map(|c| c.name.clone()).collect();
        let due: Vec<Height> = self.activations.range(..=height).map(|(h, _)| *h).collect();
        let mut activated = BTreeSet::new();
        for h in due {
            if let Some(names) = self.activations.remove(&h) {
                activated.extend(names);
            }
        }
        touched.extend(activated.iter().cloned());

        for name in &touched {
            self.refresh(name)?;
        }
        self.record_fired(height, activated);

        let root = self.root_hash();
        let repo = self.manager.repo();
        repo.checkpoint(Checkpoint { height, root })?;
        if self.sync_on_commit {
            repo.flush()?;
        }

        let cache = self.manager.cache();
        tracing::debug!(
            height,
            changes = changes.len(),
            touched = touched.len(),
            cached = cache.len(),
            evictions = cache.evictions(),
            root = %root.short(),
            "committed block"
        );
        Ok(root)
    }

    fn record_fired(&mut self, height: Height, names: BTreeSet<Vec<u8>>) {
        if !names.is_empty() {
            self.fired.insert(height, names);
        }
        let floor = (height + 1).saturating_sub(self.rollback_window);
        if floor > self.fired_from {
            self.fired = self.fired.split_off(&floor);
            self.fired_from = floor;
        }
    }

    /// Roll the trie back so `height` is the tip
    ///
    /// Heights at or above the tip only discard the block in progress. The
    /// new root is resolved from history first, so the log records the
    /// rollback and its checkpoint in one write.
    pub fn drop_above(&mut self, height: Height) -> Result<()> {
        self.discard_block();
        let tip = self.height();
        if height >= tip {
            return Ok(());
        }

        let full = height + 1 < self.fired_from;
        let (mut merkle, affected) = if full {
            tracing::debug!(height, fired_from = self.fired_from, "rollback beyond activation history");
            (MerkleTrie::new(), self.manager.repo().names_with_prefix(b"")?)
        } else {
            let mut affected: BTreeSet<Vec<u8>> =
                self.manager.repo().names_above(height)?.into_iter().collect();
            for (_, fired) in self.fired.range(height + 1..) {
                affected.extend(fired.iter().cloned());
            }
            (self.merkle.clone(), affected.into_iter().collect())
        };

        let mut resolved = Vec::with_capacity(affected.len());
        for name in &affected {
            let node = self.manager.node_at(name, height)?;
            match node.digest() {
                Some(digest) => {
                    merkle.insert(name, digest);
                }
                None => {
                    merkle.remove(name);
                }
            }
            resolved.push(node);
        }

        let root = merkle.root_hash();
        let names = self.manager.rollback(Checkpoint { height, root })?;
        self.manager.repo().flush()?;

        self.merkle = merkle;
        if full {
            self.activations.clear();
            self.fired.clear();
            self.fired_from = height + 1;
        } else {
            self.fired.retain(|h, _| *h <= height);
        }
        for node in &resolved {
            if let Some(next) = node.next_activation() {
                self.activations
                    .entry(next)
                    .or_default()
                    .insert(node.name().to_vec());
            }
        }

        tracing::info!(
            height,
            from = tip,
            names = names.len(),
            root = %root.short(),
            "rolled back claim trie"
        );
        Ok(())
    }

    // === Queries ===

    /// Resolved state of `name` at the tip
    pub fn node(&self, name: &[u8]) -> Result<Node> {
        self.manager.node(name)
    }

    /// Resolved state of `name` at `height`
    pub fn node_at(&self, name: &[u8], height: Height) -> Result<Node> {
        self.manager.node_at(name, height)
    }

    /// Every name with records under `prefix`, in order
    pub fn names_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        Ok(self.manager.repo().names_with_prefix(prefix)?)
    }

    /// Committed digests of the names under `prefix` that have a winner
    pub fn winners_with_prefix(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Hash)> {
        self.merkle.list_prefix(prefix)
    }

    /// Resolved nodes of every name under `prefix` that still holds entries
    pub fn children(&self, prefix: &[u8]) -> Result<Vec<Node>> {
        let mut histories = Vec::new();
        self.manager.repo().iterate_children(prefix, &mut |changes| {
            histories.push(changes);
            true
        })?;

        let tip = self.height();
        let mut nodes = Vec::with_capacity(histories.len());
        for changes in histories {
            let Some(name) = changes.first().map(|c| c.name.clone()) else {
                continue;
            };
            let node = Node::replay(&name, &changes, tip).map_err(|e| StorageError::Inconsistent {
                context: StorageContext::at(&name, tip),
                reason: e.to_string(),
            })?;
            if !node.is_empty() {
                nodes.push(node);
            }
        }
        Ok(nodes)
    }

    /// Digest currently committed for `name`
    pub fn digest(&self, name: &[u8]) -> Option<Hash> {
        self.merkle.get(name)
    }

    pub fn flush(&self) -> Result<()> {
        self.manager.repo().flush()?;
        Ok(())
    }

    /// Discard the block in progress and release the change log
    pub fn close(&mut self) -> Result<()> {
        self.discard_block();
        self.manager.cache().clear();
        self.manager.repo().close()?;
        Ok(())
    }
}

fn check_name(name: &[u8]) -> Result<()> {
    if name.len() > MAX_NAME_LEN {
        return Err(ValidationError::NameTooLong { len: name.len() }.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::Error;

    fn op(tag: &str) -> OutPoint {
        OutPoint::new(Hash::digest(tag.as_bytes()), 0)
    }

    fn trie() -> ClaimTrie<MemoryStore> {
        ClaimTrie::with_repo(Arc::new(MemoryStore::new()), &Config::with_path("unused")).unwrap()
    }

    #[test]
    fn test_claim_becomes_winner_and_changes_root() {
        let mut trie = trie();
        let id = trie.add_claim(b"movie", op("a"), 10, b"v".to_vec()).unwrap();
        assert_eq!(trie.root_hash(), Hash::ZERO);

        let root = trie.commit(1).unwrap();
        assert_ne!(root, Hash::ZERO);
        assert_eq!(trie.node(b"movie").unwrap().best_claim().unwrap().claim_id, id);
        assert_eq!(trie.len(), 1);
    }

    #[test]
    fn test_validation_errors() {
        let mut trie = trie();
        let long = vec![b'x'; MAX_NAME_LEN + 1];
        assert!(matches!(
            trie.add_claim(&long, op("a"), 1, Vec::new()),
            Err(Error::Validation(ValidationError::NameTooLong { .. }))
        ));
        assert!(matches!(
            trie.spend_claim(b"movie", op("a")),
            Err(Error::Validation(ValidationError::NameNotFound { .. }))
        ));

        trie.add_claim(b"movie", op("a"), 1, Vec::new()).unwrap();
        assert!(matches!(
            trie.add_claim(b"movie", op("a"), 1, Vec::new()),
            Err(Error::Validation(ValidationError::DuplicateOutput { .. }))
        ));
        assert!(matches!(
            trie.spend_claim(b"movie", op("b")),
            Err(Error::Validation(ValidationError::UnknownClaim { .. }))
        ));
        assert!(matches!(
            trie.spend_support(b"movie", op("a")),
            Err(Error::Validation(ValidationError::UnknownSupport { .. }))
        ));

        trie.spend_claim(b"movie", op("a")).unwrap();
        assert!(matches!(
            trie.spend_claim(b"movie", op("a")),
            Err(Error::Validation(ValidationError::AlreadySpent { .. }))
        ));
    }

    #[test]
    fn test_update_requires_spend_in_block() {
        let mut trie = trie();
        let id = trie.add_claim(b"movie", op("a"), 10, Vec::new()).unwrap();
        trie.commit(1).unwrap();

        let err = trie
            .update_claim(b"movie", op("b"), 10, id, b"new".to_vec())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::UpdateWithoutSpend { .. })
        ));

        trie.spend_claim(b"movie", op("a")).unwrap();
        trie.update_claim(b"movie", op("b"), 12, id, b"new".to_vec())
            .unwrap();
        trie.commit(2).unwrap();

        let node = trie.node(b"movie").unwrap();
        let best = node.best_claim().unwrap();
        assert_eq!(best.claim_id, id);
        assert_eq!(best.outpoint, op("b"));
        assert_eq!(best.active_height, 1);
        assert_eq!(node.takeover_height(), Some(1));
    }

    #[test]
    fn test_delayed_claim_activates_on_schedule() {
        let mut trie = trie();
        trie.add_claim(b"movie", op("a"), 10, Vec::new()).unwrap();
        trie.commit(1).unwrap();
        for h in 2..=65 {
            trie.commit(h).unwrap();
        }

        // (66 - 1) / 32 = 2 blocks of delay
        let b = trie.add_claim(b"movie", op("b"), 50, Vec::new()).unwrap();
        let root_66 = trie.commit(66).unwrap();
        assert_ne!(trie.node(b"movie").unwrap().best_claim().unwrap().claim_id, b);

        assert_eq!(trie.commit(67).unwrap(), root_66);
        let root_68 = trie.commit(68).unwrap();
        assert_ne!(root_68, root_66);
        let node = trie.node(b"movie").unwrap();
        assert_eq!(node.best_claim().unwrap().claim_id, b);
        assert_eq!(node.takeover_height(), Some(68));
    }

    #[test]
    fn test_drop_above_restores_earlier_root() {
        let mut trie = trie();
        trie.add_claim(b"movie", op("a"), 10, Vec::new()).unwrap();
        let root_1 = trie.commit(1).unwrap();

        trie.add_support(b"movie", op("s"), 5, ClaimId::from_outpoint(&op("a")))
            .unwrap();
        trie.add_claim(b"music", op("m"), 3, Vec::new()).unwrap();
        trie.commit(2).unwrap();
        assert_eq!(trie.len(), 2);

        trie.drop_above(1).unwrap();
        assert_eq!(trie.height(), 1);
        assert_eq!(trie.root_hash(), root_1);
        assert_eq!(trie.len(), 1);
        assert_eq!(
            trie.repo().last_checkpoint().unwrap(),
            Some(Checkpoint {
                height: 1,
                root: root_1
            })
        );
    }

    #[test]
    fn test_drop_above_reverts_activations_in_range() {
        let mut trie = trie();
        trie.add_claim(b"movie", op("a"), 10, Vec::new()).unwrap();
        trie.commit(1).unwrap();
        for h in 2..=64 {
            trie.commit(h).unwrap();
        }
        trie.add_claim(b"movie", op("b"), 50, Vec::new()).unwrap();
        let root_65 = trie.commit(65).unwrap();
        trie.commit(66).unwrap();
        trie.commit(67).unwrap();
        assert_ne!(trie.root_hash(), root_65);

        trie.drop_above(65).unwrap();
        assert_eq!(trie.root_hash(), root_65);
        assert_eq!(trie.commit(66).unwrap(), root_65);
        assert_ne!(trie.commit(67).unwrap(), root_65);
    }

    #[test]
    fn test_deep_rollback_rebuilds() {
        let repo = Arc::new(MemoryStore::new());
        let mut config = Config::with_path("unused");
        config.rollback_window = 2;
        let mut trie = ClaimTrie::with_repo(repo, &config).unwrap();

        trie.add_claim(b"movie", op("a"), 10, Vec::new()).unwrap();
        let root_1 = trie.commit(1).unwrap();
        for h in 2..=10 {
            trie.add_claim(format!("name{h}").as_bytes(), op(&h.to_string()), 1, Vec::new())
                .unwrap();
            trie.commit(h).unwrap();
        }
        trie.drop_above(1).unwrap();
        assert_eq!(trie.root_hash(), root_1);
        assert_eq!(trie.len(), 1);
    }

    #[test]
    fn test_reopen_recovers_state() {
        let repo = Arc::new(MemoryStore::new());
        let config = Config::with_path("unused");
        let root = {
            let mut trie = ClaimTrie::with_repo(Arc::clone(&repo), &config).unwrap();
            trie.add_claim(b"movie", op("a"), 10, Vec::new()).unwrap();
            trie.commit(1).unwrap()
        };

        // an append that never got its checkpoint
        repo.append(&[Change::new(ChangeKind::AddClaim, "junk", 2).with_outpoint(op("j"))])
            .unwrap();

        let trie = ClaimTrie::with_repo(Arc::clone(&repo), &config).unwrap();
        assert_eq!(trie.height(), 1);
        assert_eq!(trie.root_hash(), root);
        assert!(repo.load(b"junk").unwrap().is_empty());
    }

    #[test]
    fn test_mismatched_checkpoint_is_reported() {
        let repo = Arc::new(MemoryStore::new());
        repo.checkpoint(Checkpoint {
            height: 3,
            root: Hash::digest(b"bogus"),
        })
        .unwrap();
        let err = ClaimTrie::with_repo(repo, &Config::with_path("unused"))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            Error::Storage(StorageError::Inconsistent { .. })
        ));
    }

    #[test]
    fn test_children_and_prefix_queries() {
        let mut trie = trie();
        trie.add_claim(b"cat", op("1"), 1, Vec::new()).unwrap();
        trie.add_claim(b"category", op("2"), 1, Vec::new()).unwrap();
        trie.add_claim(b"dog", op("3"), 1, Vec::new()).unwrap();
        trie.commit(1).unwrap();
        trie.spend_claim(b"category", op("2")).unwrap();
        trie.commit(2).unwrap();

        assert_eq!(
            trie.names_with_prefix(b"cat").unwrap(),
            vec![b"cat".to_vec(), b"category".to_vec()]
        );
        let children = trie.children(b"cat").unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].name(), b"cat");
        assert_eq!(trie.digest(b"category"), None);

        let winners = trie.winners_with_prefix(b"");
        let names: Vec<&[u8]> = winners.iter().map(|(n, _)| n.as_slice()).collect();
        assert_eq!(names, vec![&b"cat"[..], &b"dog"[..]]);
        assert_eq!(Some(winners[0].1), trie.digest(b"cat"));
    }
}
