//! Satellite entities: nodes a submission refers to by free-text label
//! (a new publisher, a subunit) rather than by uid.

use std::collections::BTreeMap;

use async_trait::async_trait;

use inventory_common::{InventoryError, Result};

use crate::predicate::Predicate;
use crate::value::{NewId, Object, Uid, Value};

/// What a free-text relationship token turned into.
#[derive(Debug, Clone, PartialEq)]
pub enum RelatedEntity {
    Existing(Uid),
    New(NewEntity),
}

impl RelatedEntity {
    /// The operand the owning entry points at.
    pub fn value(&self) -> Value {
        match self {
            RelatedEntity::Existing(uid) => Value::Existing(uid.clone()),
            RelatedEntity::New(e) => Value::New(e.id.clone()),
        }
    }
}

/// A node to be created in the same transaction as the entry referring to it.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntity {
    pub id: NewId,
    pub dgraph_type: String,
    pub fields: BTreeMap<String, Vec<Object>>,
}

impl NewEntity {
    pub fn new(id: NewId, dgraph_type: &str) -> Self {
        Self {
            id,
            dgraph_type: dgraph_type.to_string(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with(mut self, predicate: &str, value: impl Into<Object>) -> Self {
        self.fields
            .entry(predicate.to_string())
            .or_default()
            .push(value.into());
        self
    }

    pub fn name(&self) -> Option<String> {
        self.fields
            .get("name")
            .and_then(|v| v.first())
            .and_then(|o| o.value.as_text())
    }
}

/// Turns a free-text label on an `allow_new` relationship into a satellite
/// entity. Implementations may call out to external lookups; a label that
/// cannot be resolved is an `InvalidValue` on the predicate.
#[async_trait]
pub trait RelatedResolver: Send + Sync {
    async fn resolve(&self, predicate: &Predicate, label: &NewId) -> Result<RelatedEntity>;
}

/// Creates a bare named node of the predicate's first constraint type.
#[derive(Debug, Default, Clone)]
pub struct StubResolver;

#[async_trait]
impl RelatedResolver for StubResolver {
    async fn resolve(&self, predicate: &Predicate, label: &NewId) -> Result<RelatedEntity> {
        let rel = predicate.relationship_info().ok_or_else(|| {
            InventoryError::invalid(&predicate.name, label, "not a relationship")
        })?;
        let dgraph_type = rel.constraint.first().ok_or_else(|| {
            InventoryError::invalid(&predicate.name, label, "no target type to create")
        })?;
        let name = label.original_label().unwrap_or(label.id());
        Ok(RelatedEntity::New(
            NewEntity::new(label.clone(), dgraph_type).with("name", Value::text(name)),
        ))
    }
}
