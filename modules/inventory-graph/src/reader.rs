use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value as Json;
use tracing::debug;

use inventory_common::{InventoryError, Result, ReviewStatus};

use crate::dql::{Arg, Block, Filter, Operator, Query, Selection};
use crate::query::CompiledQuery;
use crate::schema::Schema;
use crate::store::GraphStore;
use crate::value::Uid;

/// What the edit guards need to know about an existing entry.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryInfo {
    pub uid: Uid,
    pub unique_name: Option<String>,
    pub dgraph_types: Vec<String>,
    pub review_status: Option<ReviewStatus>,
    /// The user node the entry was submitted by.
    pub submitter: Option<Uid>,
}

#[derive(Debug, Deserialize)]
struct UidRow {
    uid: String,
}

#[derive(Debug, Deserialize)]
struct EntryRow {
    uid: String,
    #[serde(default)]
    unique_name: Option<String>,
    #[serde(rename = "dgraph.type", default)]
    dgraph_type: Vec<String>,
    #[serde(default)]
    entry_review_status: Option<String>,
    #[serde(default)]
    entry_added: Option<UidRow>,
}

/// Point lookups against the store. All operands are bound as query
/// variables, never spliced into the query text.
#[derive(Clone)]
pub struct EntryReader {
    store: Arc<dyn GraphStore>,
    schema: Arc<Schema>,
}

impl EntryReader {
    pub fn new(store: Arc<dyn GraphStore>, schema: Arc<Schema>) -> Self {
        Self { store, schema }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    async fn rows<T: DeserializeOwned>(
        &self,
        query: &Query,
        variables: BTreeMap<String, String>,
    ) -> Result<Vec<T>> {
        let data = self.store.query(&query.render(), &variables).await?;
        let rows = data.get("q").cloned().unwrap_or(Json::Array(Vec::new()));
        Ok(serde_json::from_value(rows)?)
    }

    fn by_uid(name: &str, body: &[&str]) -> Query {
        let mut block = Block::new("q", Filter::uid_param("uid"));
        block.body = body.iter().map(|s| Selection::field(s)).collect();
        Query::new(name).param("uid", "string").block(block)
    }

    fn uid_vars(uid: &Uid) -> BTreeMap<String, String> {
        BTreeMap::from([("$uid".to_string(), uid.to_string())])
    }

    /// The node whose `field` equals `value`, if any.
    pub async fn get_uid(&self, field: &str, value: &str) -> Result<Option<Uid>> {
        if self.schema.predicate(field).is_none() {
            return Err(InventoryError::UnknownPredicate(field.to_string()));
        }
        let mut block = Block::new(
            "q",
            Filter::op(Operator::Eq, field, Arg::Param("value".to_string())),
        );
        block.first = Some(1);
        block.body = vec![Selection::field("uid")];
        let query = Query::new("lookup").param("value", "string").block(block);
        let vars = BTreeMap::from([("$value".to_string(), value.to_string())]);

        let rows: Vec<UidRow> = self.rows(&query, vars).await?;
        let found = rows.into_iter().next().and_then(|r| Uid::parse(&r.uid));
        debug!(field, value, found = found.is_some(), "Looked up uid");
        Ok(found)
    }

    /// Empty when the node does not exist.
    pub async fn get_dgraph_types(&self, uid: &Uid) -> Result<Vec<String>> {
        let query = Self::by_uid("types", &["uid", "dgraph.type"]);
        let rows: Vec<EntryRow> = self.rows(&query, Self::uid_vars(uid)).await?;
        Ok(rows
            .into_iter()
            .next()
            .map(|r| r.dgraph_type)
            .unwrap_or_default())
    }

    pub async fn get_unique_name(&self, uid: &Uid) -> Result<Option<String>> {
        let query = Self::by_uid("unique_name", &["uid", "unique_name"]);
        let rows: Vec<EntryRow> = self.rows(&query, Self::uid_vars(uid)).await?;
        Ok(rows.into_iter().next().and_then(|r| r.unique_name))
    }

    /// `None` unless `uid` is an existing entry.
    pub async fn check_entry(&self, uid: &Uid) -> Result<Option<EntryInfo>> {
        let mut query = Self::by_uid(
            "check_entry",
            &["uid", "unique_name", "dgraph.type", "entry_review_status"],
        );
        if let Some(block) = query.blocks.first_mut() {
            block.body.push(Selection::nested("entry_added", &["uid"]));
        }
        let rows: Vec<EntryRow> = self.rows(&query, Self::uid_vars(uid)).await?;
        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };
        if row.dgraph_type.is_empty() {
            return Ok(None);
        }
        let review_status = row
            .entry_review_status
            .as_deref()
            .map(str::parse::<ReviewStatus>)
            .transpose()?;
        Ok(Some(EntryInfo {
            uid: Uid::parse(&row.uid).unwrap_or_else(|| uid.clone()),
            unique_name: row.unique_name,
            dgraph_types: row.dgraph_type,
            review_status,
            submitter: row.entry_added.and_then(|u| Uid::parse(&u.uid)),
        }))
    }

    pub async fn run_filter(&self, compiled: &CompiledQuery) -> Result<Json> {
        self.store.query(&compiled.text, &compiled.variables).await
    }
}
