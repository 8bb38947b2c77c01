use std::sync::Arc;

use tracing::{info, warn};

use inventory_common::{InventoryError, Result};

use crate::mutation::Mutation;
use crate::store::{GraphStore, MutationOutcome};

/// Write side. One mutation per submitted change, never retried.
#[derive(Clone)]
pub struct EntryWriter {
    store: Arc<dyn GraphStore>,
}

impl EntryWriter {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    pub async fn apply(&self, mutation: &Mutation) -> Result<MutationOutcome> {
        if mutation.is_empty() {
            info!("Nothing to write");
            return Ok(MutationOutcome::default());
        }
        match self.store.mutate(mutation).await {
            Ok(outcome) => {
                info!(
                    prelude = mutation.prelude.len(),
                    deleted = mutation.delete.len(),
                    set = mutation.set.len(),
                    created = outcome.uids.len(),
                    "Mutation committed"
                );
                Ok(outcome)
            }
            Err(InventoryError::StoreConflict(message)) => {
                warn!(error = %message, "Mutation rejected");
                Err(InventoryError::StoreConflict(message))
            }
            Err(other) => {
                warn!(error = %other, "Mutation failed");
                Err(InventoryError::StoreConflict(other.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::NQuad;
    use crate::testing::MockGraphStore;
    use crate::value::{NewId, Subject, Uid, Value};

    fn one_statement() -> Mutation {
        let mut m = Mutation::default();
        m.set.push(NQuad::new(
            Subject::New(NewId::from_label("falter")),
            "name",
            Value::text("Falter"),
        ));
        m
    }

    #[tokio::test]
    async fn empty_mutations_never_reach_the_store() {
        let store = Arc::new(MockGraphStore::new());
        let writer = EntryWriter::new(store.clone());
        let outcome = writer.apply(&Mutation::default()).await.unwrap();
        assert!(outcome.uids.is_empty());
        assert!(store.mutations().is_empty());
    }

    #[tokio::test]
    async fn created_nodes_are_reported() {
        let store = Arc::new(MockGraphStore::new());
        let writer = EntryWriter::new(store.clone());
        let outcome = writer.apply(&one_statement()).await.unwrap();
        let uid = Uid::parse(&outcome.uids["falter"]).unwrap();
        assert_eq!(store.node(&uid).unwrap().first("name"), Some("Falter"));
    }

    #[tokio::test]
    async fn rejections_surface_as_conflicts() {
        let store = Arc::new(MockGraphStore::new());
        store.fail_mutations("Transaction has been aborted. Please retry");
        let writer = EntryWriter::new(store.clone());
        let err = writer.apply(&one_statement()).await.unwrap_err();
        assert!(matches!(err, InventoryError::StoreConflict(m) if m.contains("aborted")));
        assert!(store.mutations().is_empty());
    }
}
