// Test doubles for the graph seams.
//
// - MockGraphStore (GraphStore): in-memory node table that applies
//   mutations statement by statement and answers the reader's lookups
// - FailingResolver (RelatedResolver): every label lookup errors
//
// Plus a Harness wiring reader, sanitizer and writer over one mock store,
// and helpers for forms and submission contexts.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock, Mutex};

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Map, Value as Json};

use inventory_common::{InventoryError, Result, ReviewStatus, UserRole};

use crate::dql::{Arg, Block, Filter};
use crate::model::{inventory_schema, USER_TYPE};
use crate::mutation::{Mutation, NQuad};
use crate::predicate::Predicate;
use crate::reader::EntryReader;
use crate::related::{RelatedEntity, RelatedResolver, StubResolver};
use crate::sanitizer::{Sanitizer, Submission, SubmissionContext};
use crate::schema::Schema;
use crate::store::{GraphStore, MutationOutcome};
use crate::value::{NewId, Subject, Uid, Value};
use crate::writer::EntryWriter;

static EQ_LOOKUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"eq\(([\w.]+), \$value\)").unwrap());

// ---------------------------------------------------------------------------
// MockGraphStore
// ---------------------------------------------------------------------------

/// A node as the mock stores it: types plus every predicate's values in
/// their canonical text form. Facets are not kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredNode {
    pub types: Vec<String>,
    pub fields: BTreeMap<String, Vec<String>>,
}

impl StoredNode {
    pub fn values(&self, predicate: &str) -> &[String] {
        self.fields
            .get(predicate)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn first(&self, predicate: &str) -> Option<&str> {
        self.values(predicate).first().map(String::as_str)
    }
}

struct State {
    nodes: BTreeMap<String, StoredNode>,
    next_uid: u64,
    mutations: Vec<Mutation>,
    queries: Vec<String>,
    fail_mutations: Option<String>,
    filter_response: Option<Json>,
}

impl State {
    fn allocate(&mut self) -> String {
        self.next_uid += 1;
        format!("0x{:x}", self.next_uid)
    }

    fn blank(&mut self, id: &NewId, blanks: &mut BTreeMap<String, String>) -> String {
        if let Some(uid) = blanks.get(id.id()) {
            return uid.clone();
        }
        let uid = self.allocate();
        blanks.insert(id.id().to_string(), uid.clone());
        uid
    }

    fn object_text(&mut self, value: &Value, blanks: &mut BTreeMap<String, String>) -> Option<String> {
        match value {
            Value::Existing(uid) => Some(uid.to_string()),
            Value::New(id) => Some(self.blank(id, blanks)),
            Value::Literal(s) => Some(s.canonical()),
            Value::Geo(g) => Some(g.geojson().to_string()),
            Value::Var(_) | Value::Wildcard => None,
        }
    }

    /// Whether `node` passes `filter`. Only the functions the upsert
    /// prelude uses are understood; anything else matches nothing.
    fn matches(node: &StoredNode, filter: &Filter) -> bool {
        match filter {
            Filter::And(parts) => parts.iter().all(|f| Self::matches(node, f)),
            Filter::Or(parts) => parts.iter().any(|f| Self::matches(node, f)),
            Filter::Func { name, args } => match (*name, args.as_slice()) {
                ("has", [Arg::Name(p)]) => !node.values(p).is_empty(),
                ("type", [Arg::Text(t)]) => node.types.contains(t),
                ("uid_in", [Arg::Name(p), Arg::Uid(uid)]) => {
                    node.values(p).iter().any(|v| v == uid.as_str())
                }
                _ => false,
            },
        }
    }

    /// Binds every `var` block of the prelude to the nodes it selects.
    fn bind(&self, prelude: &[Block]) -> BTreeMap<String, Vec<String>> {
        prelude
            .iter()
            .filter(|b| b.is_var)
            .map(|block| {
                let uids = self
                    .nodes
                    .iter()
                    .filter(|(_, node)| {
                        Self::matches(node, &block.func)
                            && block.filter.as_ref().map_or(true, |f| Self::matches(node, f))
                    })
                    .map(|(uid, _)| uid.clone())
                    .collect();
                (block.name.clone(), uids)
            })
            .collect()
    }

    fn delete(&mut self, quad: &NQuad, vars: &BTreeMap<String, Vec<String>>) {
        let subjects: Vec<String> = match &quad.subject {
            Subject::Existing(uid) => vec![uid.to_string()],
            Subject::Var(var) => vars.get(&var.name).cloned().unwrap_or_default(),
            Subject::New(_) => Vec::new(),
        };
        let target = match &quad.object.value {
            Value::Wildcard => None,
            Value::Existing(uid) => Some(uid.to_string()),
            Value::Literal(s) => Some(s.canonical()),
            _ => return,
        };
        for subject in subjects {
            let Some(node) = self.nodes.get_mut(&subject) else {
                continue;
            };
            match &target {
                None => {
                    node.fields.remove(&quad.predicate);
                }
                Some(target) => {
                    if let Some(values) = node.fields.get_mut(&quad.predicate) {
                        values.retain(|v| v != target);
                    }
                }
            }
        }
    }

    fn set(&mut self, schema: &Schema, quad: &NQuad, blanks: &mut BTreeMap<String, String>) {
        let subject = match &quad.subject {
            Subject::Existing(uid) => uid.to_string(),
            Subject::New(id) => self.blank(id, blanks),
            Subject::Var(_) => return,
        };
        let Some(text) = self.object_text(&quad.object.value, blanks) else {
            return;
        };
        let node = self.nodes.entry(subject).or_default();
        if quad.predicate == "dgraph.type" {
            if !node.types.contains(&text) {
                node.types.push(text);
            }
            return;
        }
        let is_list = schema.predicate(&quad.predicate).is_some_and(Predicate::is_list);
        let values = node.fields.entry(quad.predicate.clone()).or_default();
        if !is_list {
            values.clear();
        }
        if !values.contains(&text) {
            values.push(text);
        }
    }

    fn row(&self, uid: &str) -> Option<Json> {
        let node = self.nodes.get(uid)?;
        let mut row = json!({ "uid": uid, "dgraph.type": node.types });
        for (field, values) in &node.fields {
            let value = match field.as_str() {
                "entry_added" | "reviewed_by" => json!({ "uid": values.first() }),
                _ => match values.as_slice() {
                    [one] => json!(one),
                    many => json!(many),
                },
            };
            row[field.as_str()] = value;
        }
        Some(row)
    }
}

/// In-memory stand-in for Dgraph. Point lookups by `eq(field, $value)` and
/// `uid($uid)` are answered from the node table; any other query gets the
/// canned filter response.
pub struct MockGraphStore {
    schema: Schema,
    state: Mutex<State>,
}

impl Default for MockGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGraphStore {
    pub fn new() -> Self {
        Self {
            schema: inventory_schema().expect("inventory schema builds"),
            state: Mutex::new(State {
                nodes: BTreeMap::new(),
                next_uid: 0xff,
                mutations: Vec::new(),
                queries: Vec::new(),
                fail_mutations: None,
                filter_response: None,
            }),
        }
    }

    pub fn add_node(&self, types: &[&str], fields: &[(&str, &str)]) -> Uid {
        let mut state = self.state.lock().unwrap();
        let uid = state.allocate();
        let mut node = StoredNode {
            types: types.iter().map(|t| t.to_string()).collect(),
            fields: BTreeMap::new(),
        };
        for (field, value) in fields {
            node.fields
                .entry(field.to_string())
                .or_default()
                .push(value.to_string());
        }
        state.nodes.insert(uid.clone(), node);
        Uid::parse(&uid).expect("allocated uids are valid")
    }

    pub fn add_user(&self) -> Uid {
        self.add_node(&[USER_TYPE], &[])
    }

    /// An entry of `dgraph_type`, optionally submitted by a user and in a
    /// review status.
    pub fn add_entry(
        &self,
        dgraph_type: &str,
        unique_name: &str,
        submitted: Option<(&Uid, ReviewStatus)>,
    ) -> Uid {
        let submitter = submitted.map(|(user, status)| (user.to_string(), status));
        let mut fields = vec![("unique_name", unique_name), ("name", unique_name)];
        if let Some((user, status)) = &submitter {
            fields.push(("entry_added", user.as_str()));
            fields.push(("entry_review_status", status.as_str()));
        }
        self.add_node(&[dgraph_type, "Entry"], &fields)
    }

    pub fn node(&self, uid: &Uid) -> Option<StoredNode> {
        self.state.lock().unwrap().nodes.get(uid.as_str()).cloned()
    }

    pub fn find(&self, unique_name: &str) -> Option<Uid> {
        let state = self.state.lock().unwrap();
        state
            .nodes
            .iter()
            .find(|(_, n)| n.first("unique_name") == Some(unique_name))
            .and_then(|(uid, _)| Uid::parse(uid))
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        self.state.lock().unwrap().mutations.clone()
    }

    pub fn queries(&self) -> Vec<String> {
        self.state.lock().unwrap().queries.clone()
    }

    /// Every following mutation is rejected with `message`.
    pub fn fail_mutations(&self, message: &str) {
        self.state.lock().unwrap().fail_mutations = Some(message.to_string());
    }

    /// Response for queries that are not point lookups.
    pub fn respond_to_filters(&self, response: Json) {
        self.state.lock().unwrap().filter_response = Some(response);
    }
}

#[async_trait]
impl GraphStore for MockGraphStore {
    async fn query(&self, query: &str, variables: &BTreeMap<String, String>) -> Result<Json> {
        let mut state = self.state.lock().unwrap();
        state.queries.push(query.to_string());

        if let Some(caps) = EQ_LOOKUP.captures(query) {
            let field = &caps[1];
            let value = variables.get("$value").cloned().unwrap_or_default();
            let rows: Vec<Json> = state
                .nodes
                .iter()
                .filter(|(_, n)| n.values(field).contains(&value))
                .map(|(uid, _)| json!({ "uid": uid }))
                .take(1)
                .collect();
            return Ok(json!({ "q": rows }));
        }
        if query.contains("uid($uid)") {
            let uid = variables.get("$uid").cloned().unwrap_or_default();
            let rows: Vec<Json> = state.row(&uid).into_iter().collect();
            return Ok(json!({ "q": rows }));
        }
        Ok(state
            .filter_response
            .clone()
            .unwrap_or_else(|| json!({ "total": [{ "count": 0 }], "q": [] })))
    }

    async fn mutate(&self, mutation: &Mutation) -> Result<MutationOutcome> {
        let mut state = self.state.lock().unwrap();
        if let Some(message) = &state.fail_mutations {
            return Err(InventoryError::StoreConflict(message.clone()));
        }
        state.mutations.push(mutation.clone());

        let mut blanks = BTreeMap::new();
        let vars = state.bind(&mutation.prelude);
        for quad in &mutation.delete {
            state.delete(quad, &vars);
        }
        for quad in &mutation.set {
            state.set(&self.schema, quad, &mut blanks);
        }
        Ok(MutationOutcome { uids: blanks })
    }
}

// ---------------------------------------------------------------------------
// FailingResolver
// ---------------------------------------------------------------------------

/// A resolver whose external lookup is always down.
pub struct FailingResolver;

#[async_trait]
impl RelatedResolver for FailingResolver {
    async fn resolve(&self, _predicate: &Predicate, label: &NewId) -> Result<RelatedEntity> {
        Err(InventoryError::Store(format!("lookup for {label} unavailable")))
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// Reader, sanitizer and writer over one mock store, with a contributor
/// account already in place.
pub struct Harness {
    pub store: Arc<MockGraphStore>,
    pub reader: EntryReader,
    pub sanitizer: Sanitizer,
    pub writer: EntryWriter,
    pub user: Uid,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_resolver(Arc::new(StubResolver))
    }

    pub fn with_resolver(resolver: Arc<dyn RelatedResolver>) -> Self {
        let store = Arc::new(MockGraphStore::new());
        let user = store.add_user();
        let schema = Arc::new(inventory_schema().expect("inventory schema builds"));
        let reader = EntryReader::new(store.clone(), schema);
        Self {
            sanitizer: Sanitizer::new(reader.clone(), resolver),
            writer: EntryWriter::new(store.clone()),
            reader,
            store,
            user,
        }
    }

    pub fn ctx(&self, role: UserRole) -> SubmissionContext {
        context(&self.user, role)
    }

    /// Sanitizes and writes a new entry, returning the uid it got.
    pub async fn submit(&self, dgraph_type: &str, data: Json, ctx: &SubmissionContext) -> Result<Uid> {
        let sub: Submission = self.sanitizer.new_entry(dgraph_type, &form(data), ctx).await?;
        let outcome = self.writer.apply(&sub.mutation).await?;
        match &sub.entry.subject {
            Subject::New(id) => outcome
                .uids
                .get(id.id())
                .and_then(|uid| Uid::parse(uid))
                .ok_or_else(|| InventoryError::Store(format!("no uid assigned to {id}"))),
            Subject::Existing(uid) => Ok(uid.clone()),
            Subject::Var(v) => Err(InventoryError::Store(format!("unexpected subject {}", v.nquad()))),
        }
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A JSON object literal as a submission form.
pub fn form(value: Json) -> Map<String, Json> {
    match value {
        Json::Object(map) => map,
        other => panic!("form must be a JSON object, got {other}"),
    }
}

pub fn context(user: &Uid, role: UserRole) -> SubmissionContext {
    SubmissionContext::builder()
        .user(user.clone())
        .role(role)
        .ip("127.0.0.1")
        .build()
}
