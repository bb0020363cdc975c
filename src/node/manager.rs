//! Node resolution over the change log
//!
//! The manager owns the in-progress block. Committed state is served from the
//! cache when the cached entry can be caught up, otherwise it is rebuilt from
//! the repository. Only nodes resolved at the tip are cached.

use super::{ActivationParams, Node, NodeCache};
use crate::error::{StorageContext, StorageError, ValidationError};
use crate::model::{Change, Height};
use crate::store::{ChangeRepo, Checkpoint};
use crate::Result;
use std::collections::BTreeSet;
use std::sync::Arc;

pub struct NodeManager<R: ChangeRepo> {
    repo: Arc<R>,
    cache: NodeCache,
    params: ActivationParams,
    height: Height,
    changes: Vec<Change>,
}

impl<R: ChangeRepo> NodeManager<R> {
    pub fn new(repo: Arc<R>, cache_limit: usize, params: ActivationParams, height: Height) -> Self {
        NodeManager {
            repo,
            cache: NodeCache::new(cache_limit),
            params,
            height,
            changes: Vec::new(),
        }
    }

    /// Last committed height
    pub fn height(&self) -> Height {
        self.height
    }

    /// Height the in-progress block will commit at
    pub fn next_height(&self) -> Height {
        self.height + 1
    }

    pub fn params(&self) -> ActivationParams {
        self.params
    }

    pub fn repo(&self) -> &Arc<R> {
        &self.repo
    }

    pub fn cache(&self) -> &NodeCache {
        &self.cache
    }

    /// Committed state of `name` at the tip
    pub fn node(&self, name: &[u8]) -> Result<Node> {
        let tip = self.height;
        if let Some(lease) = self.cache.fetch(name, tip) {
            if lease.height() == tip {
                return Ok(Node::clone(&lease));
            }
            let mut node = Node::clone(&lease);
            let newer: Vec<Change> = lease
                .changes()
                .iter()
                .filter(|c| c.height > lease.height() && c.height <= tip)
                .cloned()
                .collect();
            drop(lease);

            node.catch_up(&newer, tip)
                .map_err(|e| inconsistent(name, tip, e))?;
            self.cache.insert(name.to_vec(), node.clone(), tip);
            return Ok(node);
        }

        let node = self.load(name, tip)?;
        self.cache.insert(name.to_vec(), node.clone(), tip);
        Ok(node)
    }

    /// Committed state of `name` at `height`
    ///
    /// Heights below the tip are rebuilt from the log and never cached.
    pub fn node_at(&self, name: &[u8], height: Height) -> Result<Node> {
        if height >= self.height {
            let mut node = self.node(name)?;
            node.advance_to(height);
            return Ok(node);
        }
        self.load(name, height)
    }

    fn load(&self, name: &[u8], height: Height) -> Result<Node> {
        let changes = self.repo.load(name)?;
        let node = Node::replay(name, &changes, height).map_err(|e| inconsistent(name, height, e))?;
        Ok(node)
    }

    /// Tip state with the in-progress block applied but not resolved
    pub fn working_node(&self, name: &[u8]) -> Result<Node> {
        let mut node = self.node(name)?;
        for change in self.changes.iter().filter(|c| c.name == name) {
            node.apply(change)?;
        }
        Ok(node)
    }

    /// Queue a validated change for the next commit
    pub fn append_change(&mut self, change: Change) {
        self.changes.push(change);
    }

    pub fn block_changes(&self) -> &[Change] {
        &self.changes
    }

    /// Names touched by the in-progress block
    pub fn touched_names(&self) -> BTreeSet<Vec<u8>> {
        self.changes.iter().map(|c| c.name.clone()).collect()
    }

    pub fn discard_block(&mut self) {
        self.changes.clear();
    }

    /// Persist the in-progress block and move the tip to `height`
    pub fn commit(&mut self, height: Height) -> Result<Vec<Change>> {
        if height != self.next_height() {
            return Err(ValidationError::HeightMismatch {
                expected: self.next_height(),
                found: height,
            }
            .into());
        }

        let changes = std::mem::take(&mut self.changes);
        if let Err(e) = self.repo.append(&changes) {
            self.changes = changes;
            return Err(e.into());
        }
        self.cache.add_changes(&changes, height);
        self.height = height;
        Ok(changes)
    }

    /// Forget everything above `checkpoint.height`, returns the names that
    /// lost records
    pub fn rollback(&mut self, checkpoint: Checkpoint) -> Result<Vec<Vec<u8>>> {
        self.changes.clear();
        if checkpoint.height >= self.height {
            return Ok(Vec::new());
        }

        let names = self.repo.rollback(checkpoint)?;
        self.cache.drop_names(&names);
        self.cache.drop_above(checkpoint.height);
        self.height = checkpoint.height;
        Ok(names)
    }
}

fn inconsistent(name: &[u8], height: Height, err: ValidationError) -> StorageError {
    StorageError::Inconsistent {
        context: StorageContext::at(name, height),
        reason: err.to_string(),
    }
}
