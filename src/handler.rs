//! Translating block transactions into trie mutations
//!
//! Each transaction is handled in two passes: inputs first, so claims spent
//! by the transaction are known before its outputs try to update them.

use crate::claimtrie::ClaimTrie;
use crate::error::{Error, ValidationError};
use crate::model::{Amount, ClaimId, Hash, Height, OutPoint};
use crate::script::{ClaimOpcode, ClaimScript, ScriptError};
use crate::store::ChangeRepo;
use crate::Result;
use std::collections::{HashMap, HashSet};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxOut {
    pub value: Amount,
    pub script: Vec<u8>,
}

impl TxOut {
    pub fn new(value: Amount, script: impl Into<Vec<u8>>) -> Self {
        TxOut {
            value,
            script: script.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub txid: Hash,
    pub inputs: Vec<OutPoint>,
    pub outputs: Vec<TxOut>,
}

impl Transaction {
    pub fn new(txid: Hash, inputs: Vec<OutPoint>, outputs: Vec<TxOut>) -> Self {
        Transaction {
            txid,
            inputs,
            outputs,
        }
    }

    pub fn coinbase(txid: Hash, outputs: Vec<TxOut>) -> Self {
        Transaction::new(txid, vec![OutPoint::null()], outputs)
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].is_null()
    }

    pub fn outpoint(&self, index: u32) -> OutPoint {
        OutPoint::new(self.txid, index)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub height: Height,
    pub transactions: Vec<Transaction>,
    /// Claim trie root the header commits to
    pub claim_root: Hash,
}

/// Lookup of the outputs a block spends
pub trait SpentOutputs {
    fn spent_output(&self, outpoint: &OutPoint) -> Option<TxOut>;
}

impl SpentOutputs for HashMap<OutPoint, TxOut> {
    fn spent_output(&self, outpoint: &OutPoint) -> Option<TxOut> {
        self.get(outpoint).cloned()
    }
}

/// Per-block translation state
struct BlockHandler<'a, R: ChangeRepo, V: SpentOutputs + ?Sized> {
    trie: &'a mut ClaimTrie<R>,
    view: &'a V,
    height: Height,
    /// Claims spent so far in this block, keyed by name and identifier
    spent: HashSet<(Vec<u8>, ClaimId)>,
}

impl<'a, R: ChangeRepo, V: SpentOutputs + ?Sized> BlockHandler<'a, R, V> {
    fn decode(&self, script: &[u8]) -> Result<Option<ClaimScript>> {
        match ClaimScript::decode(script) {
            Ok(script) => Ok(Some(script)),
            Err(ScriptError::NotClaimScript) => Ok(None),
            Err(source) => Err(ValidationError::Script {
                height: self.height,
                source,
            }
            .into()),
        }
    }

    fn handle(&mut self, tx: &Transaction) -> Result<()> {
        if !tx.is_coinbase() {
            self.spend_inputs(tx)?;
        }
        self.add_outputs(tx)
    }

    fn spend_inputs(&mut self, tx: &Transaction) -> Result<()> {
        for input in &tx.inputs {
            let output = self
                .view
                .spent_output(input)
                .ok_or(ValidationError::MissingInput(*input))?;
            let Some(script) = self.decode(&output.script)? else {
                continue;
            };
            // skipped updates and supports of unseen names never entered the trie
            if !self.trie.holds_output(&script.name, input)? {
                tracing::debug!(
                    height = self.height,
                    name = %script.name.escape_ascii(),
                    outpoint = %input,
                    "ignoring spend of an output the trie never held"
                );
                continue;
            }
            match script.opcode {
                ClaimOpcode::ClaimName | ClaimOpcode::UpdateClaim => {
                    let claim_id = self.trie.spend_claim(&script.name, *input)?;
                    self.spent.insert((script.name, claim_id));
                }
                ClaimOpcode::SupportClaim => {
                    self.trie.spend_support(&script.name, *input)?;
                }
            }
        }
        Ok(())
    }

    fn add_outputs(&mut self, tx: &Transaction) -> Result<()> {
        for (index, output) in tx.outputs.iter().enumerate() {
            let Some(script) = self.decode(&output.script)? else {
                continue;
            };
            let outpoint = tx.outpoint(index as u32);
            match (script.opcode, script.claim_id) {
                (ClaimOpcode::ClaimName, _) => {
                    self.trie
                        .add_claim(&script.name, outpoint, output.value, script.value)?;
                }
                (ClaimOpcode::SupportClaim, Some(claim_id)) => {
                    self.trie
                        .add_support(&script.name, outpoint, output.value, claim_id)?;
                }
                (ClaimOpcode::UpdateClaim, Some(claim_id)) => {
                    if !self.spent.remove(&(script.name.clone(), claim_id)) {
                        tracing::debug!(
                            height = self.height,
                            name = %script.name.escape_ascii(),
                            claim = %claim_id,
                            "ignoring update without a spent claim"
                        );
                        continue;
                    }
                    self.trie.update_claim(
                        &script.name,
                        outpoint,
                        output.value,
                        claim_id,
                        script.value,
                    )?;
                }
                (_, None) => {}
            }
        }
        Ok(())
    }
}

impl<R: ChangeRepo> ClaimTrie<R> {
    /// Apply every claim operation in `block`, commit it, and check the root
    ///
    /// A validation failure leaves the trie at its previous height with the
    /// block discarded. A root that differs from the header is
    /// [`Error::ConsensusMismatch`] after the block has been committed.
    pub fn connect_block<V: SpentOutputs + ?Sized>(&mut self, block: &Block, view: &V) -> Result<Hash> {
        let expected = self.height() + 1;
        if block.height != expected {
            return Err(ValidationError::HeightMismatch {
                expected,
                found: block.height,
            }
            .into());
        }

        let mut handler = BlockHandler {
            trie: &mut *self,
            view,
            height: block.height,
            spent: HashSet::new(),
        };
        let handled = block.transactions.iter().try_for_each(|tx| handler.handle(tx));
        if let Err(e) = handled {
            self.discard_block();
            return Err(e);
        }

        let root = self.commit(block.height)?;
        if root != block.claim_root {
            tracing::error!(
                height = block.height,
                expected = %block.claim_root,
                computed = %root,
                "claim trie root mismatch"
            );
            return Err(Error::ConsensusMismatch {
                height: block.height,
                expected: block.claim_root,
                computed: root,
            });
        }
        Ok(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn trie() -> ClaimTrie<MemoryStore> {
        ClaimTrie::with_repo(Arc::new(MemoryStore::new()), &Config::with_path("unused")).unwrap()
    }

    #[test]
    fn test_coinbase_inputs_are_not_looked_up() {
        let mut staging = trie();
        let mut trie = trie();
        let tx = Transaction::coinbase(
            Hash::digest(b"cb"),
            vec![TxOut::new(10, ClaimScript::claim_name("movie", "v").encode(b"pay"))],
        );
        assert!(tx.is_coinbase());

        staging.add_claim(b"movie", tx.outpoint(0), 10, "v").unwrap();
        let root = staging.commit(1).unwrap();

        let block = Block {
            height: 1,
            transactions: vec![tx],
            claim_root: root,
        };
        assert_eq!(trie.connect_block(&block, &no_outputs()).unwrap(), root);
    }

    fn no_outputs() -> HashMap<OutPoint, TxOut> {
        HashMap::new()
    }

    #[test]
    fn test_malformed_claim_script_rejects_block() {
        let mut trie = trie();
        let mut script = ClaimScript::claim_name("movie", "v").encode(b"");
        script.truncate(3);
        let block = Block {
            height: 1,
            transactions: vec![Transaction::coinbase(
                Hash::digest(b"cb"),
                vec![
                    TxOut::new(1, ClaimScript::claim_name("music", "v").encode(b"")),
                    TxOut::new(1, script),
                ],
            )],
            claim_root: Hash::ZERO,
        };

        let err = trie.connect_block(&block, &no_outputs()).unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::Script { height: 1, .. })
        ));
        assert!(!err.is_fatal());
        assert!(trie.pending_changes().is_empty());
        assert_eq!(trie.height(), 0);
    }

    #[test]
    fn test_missing_input_rejects_block() {
        let mut trie = trie();
        let missing = OutPoint::new(Hash::digest(b"nowhere"), 0);
        let block = Block {
            height: 1,
            transactions: vec![Transaction::new(Hash::digest(b"tx"), vec![missing], Vec::new())],
            claim_root: Hash::ZERO,
        };
        let err = trie.connect_block(&block, &no_outputs()).unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::MissingInput(op)) if op == missing
        ));
    }

    #[test]
    fn test_plain_outputs_are_ignored() {
        let mut trie = trie();
        let block = Block {
            height: 1,
            transactions: vec![Transaction::coinbase(
                Hash::digest(b"cb"),
                vec![TxOut::new(50, vec![0x76, 0xa9, 0x14])],
            )],
            claim_root: Hash::ZERO,
        };
        assert_eq!(trie.connect_block(&block, &no_outputs()).unwrap(), Hash::ZERO);
    }

    #[test]
    fn test_wrong_root_is_a_consensus_failure() {
        let mut trie = trie();
        let block = Block {
            height: 1,
            transactions: vec![Transaction::coinbase(
                Hash::digest(b"cb"),
                vec![TxOut::new(10, ClaimScript::claim_name("movie", "v").encode(b""))],
            )],
            claim_root: Hash::ZERO,
        };
        let err = trie.connect_block(&block, &no_outputs()).unwrap_err();
        assert!(matches!(err, Error::ConsensusMismatch { height: 1, .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_spending_a_skipped_update_is_not_an_error() {
        let mut trie = trie();
        let stranger = ClaimId::from_outpoint(&OutPoint::new(Hash::digest(b"stranger"), 0));
        let cb = Transaction::coinbase(
            Hash::digest(b"cb"),
            vec![TxOut::new(10, ClaimScript::update("movie", stranger, "v").encode(b""))],
        );
        let block_1 = Block {
            height: 1,
            transactions: vec![cb.clone()],
            claim_root: Hash::ZERO,
        };
        assert_eq!(trie.connect_block(&block_1, &no_outputs()).unwrap(), Hash::ZERO);

        let mut utxos = no_outputs();
        utxos.insert(cb.outpoint(0), cb.outputs[0].clone());
        let block_2 = Block {
            height: 2,
            transactions: vec![Transaction::new(
                Hash::digest(b"spend"),
                vec![cb.outpoint(0)],
                vec![TxOut::new(10, vec![0x76, 0xa9])],
            )],
            claim_root: Hash::ZERO,
        };
        assert_eq!(trie.connect_block(&block_2, &utxos).unwrap(), Hash::ZERO);
        assert_eq!(trie.height(), 2);
        assert!(trie.node(b"movie").unwrap().is_empty());
    }

    #[test]
    fn test_double_spend_in_block_is_still_rejected() {
        let mut staging = trie();
        let mut trie = trie();
        let cb = Transaction::coinbase(
            Hash::digest(b"cb"),
            vec![TxOut::new(10, ClaimScript::claim_name("movie", "v").encode(b""))],
        );
        staging.add_claim(b"movie", cb.outpoint(0), 10, "v").unwrap();
        let block_1 = Block {
            height: 1,
            transactions: vec![cb.clone()],
            claim_root: staging.commit(1).unwrap(),
        };
        trie.connect_block(&block_1, &no_outputs()).unwrap();

        let mut utxos = no_outputs();
        utxos.insert(cb.outpoint(0), cb.outputs[0].clone());
        let spend = |tag: &[u8]| Transaction::new(Hash::digest(tag), vec![cb.outpoint(0)], Vec::new());
        let block_2 = Block {
            height: 2,
            transactions: vec![spend(b"first"), spend(b"second")],
            claim_root: Hash::ZERO,
        };
        let err = trie.connect_block(&block_2, &utxos).unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::AlreadySpent { .. })
        ));
        assert_eq!(trie.height(), 1);
    }

    #[test]
    fn test_block_height_must_follow_tip() {
        let mut trie = trie();
        let block = Block {
            height: 3,
            transactions: Vec::new(),
            claim_root: Hash::ZERO,
        };
        assert!(matches!(
            trie.connect_block(&block, &no_outputs()),
            Err(Error::Validation(ValidationError::HeightMismatch { expected: 1, found: 3 }))
        ));
    }
}
