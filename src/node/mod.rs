//! Claim resolution per name
//!
//! A [`Node`] is derived state: the claims and supports of one name and the
//! winner they produce at a height. Nodes are never persisted; the
//! [`NodeManager`] rebuilds them from the change log and keeps recent ones in
//! a [`NodeCache`].

mod cache;
mod manager;
#[allow(clippy::module_inception)]
mod node;

pub use cache::{NodeCache, NodeLease, DEFAULT_CACHE_LIMIT};
pub use manager::NodeManager;
pub use node::{
    ActivationParams, ClaimEntry, Node, NodeState, SupportEntry, DEFAULT_ACTIVATION_FACTOR,
    DEFAULT_MAX_ACTIVATION_DELAY,
};
