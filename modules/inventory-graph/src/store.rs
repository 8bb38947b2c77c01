use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value as Json;

use inventory_common::Result;

use crate::mutation::Mutation;

/// Result of a committed mutation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationOutcome {
    /// Blank-node id (without `_:`) to the uid the store assigned.
    pub uids: BTreeMap<String, String>,
}

/// The graph database as seen by this crate: run a query with bound
/// variables, or apply one upsert atomically.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Returns the `data` object of the response.
    async fn query(&self, query: &str, variables: &BTreeMap<String, String>) -> Result<Json>;

    /// Applies prelude, deletes and sets in one transaction. Any rejection is
    /// a `StoreConflict`.
    async fn mutate(&self, mutation: &Mutation) -> Result<MutationOutcome>;
}
