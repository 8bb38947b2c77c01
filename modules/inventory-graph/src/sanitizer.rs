//! Submission pipeline: a raw form (predicate name to JSON) becomes a
//! validated entity, its satellite entities and the upsert that writes them.
//!
//! Order matters. Type permission and the review transition are checked
//! before any field is looked at, so a refused submission never reaches the
//! mutation compiler.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use serde_json::{Map, Value as Json};
use tracing::{debug, info};
use typed_builder::TypedBuilder;

use inventory_common::{InventoryError, Result, ReviewStatus, UserRole};

use crate::lifecycle;
use crate::model::SIBLING_INHERITED;
use crate::mutation::{self, Entity, Mutation};
use crate::naming;
use crate::predicate::{Direction, Predicate};
use crate::reader::EntryReader;
use crate::related::{RelatedEntity, RelatedResolver};
use crate::schema::TypeDef;
use crate::value::{slugify, FacetValue, Facets, NewId, Object, Scalar, Subject, Uid, Value};

const STATUS: &str = "entry_review_status";

/// Separates a predicate from one of its facets in form keys: `audience_size|count`.
pub const FACET_SEPARATOR: char = '|';

/// Who is submitting, from where, and when.
#[derive(Debug, Clone, TypedBuilder)]
pub struct SubmissionContext {
    pub user: Uid,
    pub role: UserRole,
    #[builder(default, setter(into))]
    pub ip: String,
    #[builder(default = Utc::now())]
    pub now: DateTime<Utc>,
    /// Ask for the entry to be accepted right away.
    #[builder(default)]
    pub accept: bool,
}

impl SubmissionContext {
    fn stamp(&self) -> Facets {
        Facets::new()
            .with("timestamp", FacetValue::DateTime(self.now))
            .with("ip", FacetValue::Text(self.ip.clone()))
    }

    /// Edge to the submitting user, stamped with time and address.
    fn user_edge(&self) -> Object {
        Object::with_facets(Value::Existing(self.user.clone()), self.stamp())
    }
}

/// A sanitized submission, ready for the writer.
#[derive(Debug, Clone)]
pub struct Submission {
    pub dgraph_type: String,
    pub status: ReviewStatus,
    pub entry: Entity,
    /// Per node, the predicates cleared before the new values are set.
    pub overwrite: BTreeMap<Uid, Vec<String>>,
    pub related: Vec<RelatedEntity>,
    pub mutation: Mutation,
}

#[derive(Clone)]
pub struct Sanitizer {
    reader: EntryReader,
    resolver: Arc<dyn RelatedResolver>,
}

impl Sanitizer {
    pub fn new(reader: EntryReader, resolver: Arc<dyn RelatedResolver>) -> Self {
        Self { reader, resolver }
    }

    fn entry_type(&self, dgraph_type: &str) -> Result<&TypeDef> {
        self.reader
            .schema()
            .get_type(dgraph_type)
            .ok_or_else(|| InventoryError::invalid("dgraph.type", dgraph_type, "unknown entity type"))
    }

    /// Sanitizes a new entry of `dgraph_type`.
    pub async fn new_entry(
        &self,
        dgraph_type: &str,
        form: &Map<String, Json>,
        ctx: &SubmissionContext,
    ) -> Result<Submission> {
        let type_def = self.entry_type(dgraph_type)?;
        if ctx.role < type_def.permission_new {
            return Err(InventoryError::PermissionDenied(format!(
                "{} cannot add {} entries",
                ctx.role, type_def.name
            )));
        }
        let mut status = lifecycle::initial_status(ctx.role, ctx.accept)?;
        if let Some(requested) = requested_status(type_def, form)? {
            if requested != status {
                status = lifecycle::transition(status, requested, ctx.role)?;
            }
        }

        let fields = parse_form(type_def, form, &[], |p| {
            lifecycle::writable_on_new(p, ctx.role)
        })?;
        let mut entity = Entity::new(Subject::New(NewId::fresh()));
        entity.fields = fields;
        apply_defaults(type_def, &mut entity)?;

        let related = self.resolve_related(type_def, &mut entity, ctx).await?;

        match text_of(&entity, "unique_name") {
            Some(requested) => {
                if self.reader.get_uid("unique_name", &requested).await?.is_some() {
                    return Err(InventoryError::constraint(
                        "unique_name",
                        format!("'{requested}' is already taken"),
                    ));
                }
            }
            None => {
                let unique_name = self.generate_unique_name(type_def, &mut entity).await?;
                entity.set("unique_name", vec![Value::text(unique_name).into()]);
            }
        }

        entity.set(STATUS, vec![Value::text(status.as_str()).into()]);
        entity.set("entry_added", vec![ctx.user_edge()]);
        entity.set(
            "creation_date",
            vec![Value::Literal(Scalar::DateTime(ctx.now)).into()],
        );
        if status == ReviewStatus::Accepted {
            entity.set("reviewed_by", vec![ctx.user_edge()]);
        }
        entity.set(
            "dgraph.type",
            type_def
                .lineage
                .iter()
                .map(|t| Value::text(t.as_str()).into())
                .collect(),
        );
        entity.fields.retain(|_, values| !values.is_empty());
        check_required(type_def, &entity)?;

        let overwrite = BTreeMap::new();
        let mutation = mutation::compile(self.reader.schema(), &entity, &overwrite, &related)?;
        info!(
            dgraph_type = %type_def.name,
            status = %status,
            related = related.len(),
            statements = mutation.set.len(),
            "Sanitized new entry"
        );
        Ok(Submission {
            dgraph_type: type_def.name.clone(),
            status,
            entry: entity,
            overwrite,
            related,
            mutation,
        })
    }

    /// Sanitizes an edit of the existing entry named by the form's `uid`.
    pub async fn edit_entry(
        &self,
        dgraph_type: &str,
        form: &Map<String, Json>,
        ctx: &SubmissionContext,
    ) -> Result<Submission> {
        let raw_uid = form
            .get("uid")
            .ok_or_else(|| InventoryError::constraint("uid", "editing requires a uid"))?;
        let uid = raw_uid
            .as_str()
            .and_then(Uid::parse)
            .ok_or_else(|| InventoryError::invalid("uid", raw_uid, "not a uid"))?;
        let existing = self.reader.check_entry(&uid).await?.ok_or_else(|| {
            InventoryError::constraint("uid", format!("<{uid}> is not an existing entry"))
        })?;

        let type_def = self.entry_type(dgraph_type)?;
        if !existing.dgraph_types.contains(&type_def.name) {
            return Err(InventoryError::constraint(
                "dgraph.type",
                format!("<{uid}> is not a {}", type_def.name),
            ));
        }
        if ctx.role < type_def.permission_edit {
            return Err(InventoryError::PermissionDenied(format!(
                "{} cannot edit {} entries",
                ctx.role, type_def.name
            )));
        }
        let is_owner = existing.submitter.as_ref() == Some(&ctx.user);
        lifecycle::check_edit_access(ctx.role, is_owner)?;

        let current = existing.review_status.unwrap_or(ReviewStatus::Pending);
        let target = if ctx.accept {
            ReviewStatus::Accepted
        } else {
            requested_status(type_def, form)?.unwrap_or(current)
        };
        let status = lifecycle::transition(current, target, ctx.role)?;

        let fields = parse_form(type_def, form, &["uid"], |p| {
            lifecycle::writable_on_edit(p, current, ctx.role)
        })?;
        let mut entity = Entity::new(Subject::Existing(uid.clone()));
        entity.fields = fields;

        if let Some(requested) = text_of(&entity, "unique_name") {
            let holder = self.reader.get_uid("unique_name", &requested).await?;
            if holder.is_some_and(|h| h != uid) {
                return Err(InventoryError::constraint(
                    "unique_name",
                    format!("'{requested}' is already taken"),
                ));
            }
        }

        let related = self.resolve_related(type_def, &mut entity, ctx).await?;

        // cleared fields need a delete even when the predicate keeps old values
        let mut cleared: Vec<String> = entity
            .fields
            .iter()
            .filter(|(name, values)| {
                values.is_empty() || type_def.predicate(name).is_some_and(|p| p.overwrite)
            })
            .map(|(name, _)| name.clone())
            .collect();

        entity.push("entry_edit_history", ctx.user_edge());
        if status != current {
            entity.set(STATUS, vec![Value::text(status.as_str()).into()]);
            if status.is_terminal() {
                entity.set("reviewed_by", vec![ctx.user_edge()]);
                cleared.push("reviewed_by".to_string());
            }
        }
        entity.fields.retain(|_, values| !values.is_empty());

        let mut overwrite = BTreeMap::new();
        if !cleared.is_empty() {
            overwrite.insert(uid.clone(), cleared);
        }
        let mutation = mutation::compile(self.reader.schema(), &entity, &overwrite, &related)?;
        info!(
            uid = %uid,
            dgraph_type = %type_def.name,
            from = %current,
            to = %status,
            deleted = mutation.delete.len(),
            statements = mutation.set.len(),
            "Sanitized edit"
        );
        Ok(Submission {
            dgraph_type: type_def.name.clone(),
            status,
            entry: entity,
            overwrite,
            related,
            mutation,
        })
    }

    /// Checks every uid target and turns free-text labels into satellites.
    /// A label mentioned twice resolves once.
    async fn resolve_related(
        &self,
        type_def: &TypeDef,
        entity: &mut Entity,
        ctx: &SubmissionContext,
    ) -> Result<Vec<RelatedEntity>> {
        let mut resolved: BTreeMap<String, RelatedEntity> = BTreeMap::new();
        let mut siblings: BTreeSet<String> = BTreeSet::new();

        for (name, objects) in entity.fields.iter_mut() {
            let Some(predicate) = type_def.predicate(name).filter(|p| p.is_relationship()) else {
                continue;
            };
            let mutual = predicate
                .relationship_info()
                .is_some_and(|r| r.direction == Direction::Mutual);

            for object in objects.iter_mut() {
                match &object.value {
                    Value::Existing(uid) => {
                        let types = self.reader.get_dgraph_types(uid).await?;
                        predicate.check_target(uid, &types)?;
                    }
                    Value::New(id) => {
                        let id = id.clone();
                        if let Some(done) = resolved.get(id.id()) {
                            self.check_reused(predicate, &id, done).await?;
                            object.value = done.value();
                            continue;
                        }
                        let related = self.resolve_label(predicate, &id, ctx).await?;
                        if mutual && matches!(related, RelatedEntity::New(_)) {
                            siblings.insert(id.id().to_string());
                        }
                        object.value = related.value();
                        resolved.insert(id.id().to_string(), related);
                    }
                    _ => {}
                }
            }

            // labels differing only in case land on the same node
            let mut seen: Vec<Value> = Vec::with_capacity(objects.len());
            objects.retain(|o| {
                if seen.contains(&o.value) {
                    false
                } else {
                    seen.push(o.value.clone());
                    true
                }
            });
        }

        for id in &siblings {
            if let Some(RelatedEntity::New(stub)) = resolved.get_mut(id) {
                for name in SIBLING_INHERITED {
                    if let Some(values) = entity.get(name) {
                        stub.fields.insert(name.to_string(), values.to_vec());
                    }
                }
            }
        }
        Ok(resolved.into_values().collect())
    }

    /// A label already resolved under another predicate must also satisfy
    /// this predicate's type constraint.
    async fn check_reused(&self, predicate: &Predicate, id: &NewId, done: &RelatedEntity) -> Result<()> {
        match done {
            RelatedEntity::Existing(uid) => {
                let types = self.reader.get_dgraph_types(uid).await?;
                predicate.check_target(uid, &types)
            }
            RelatedEntity::New(stub) => {
                let lineage = self
                    .reader
                    .schema()
                    .lineage(&stub.dgraph_type)
                    .unwrap_or_default();
                predicate.check_target_types(&format!("new entry '{id}'"), lineage)
            }
        }
    }

    async fn resolve_label(
        &self,
        predicate: &Predicate,
        id: &NewId,
        ctx: &SubmissionContext,
    ) -> Result<RelatedEntity> {
        let resolved = self.resolver.resolve(predicate, id).await.map_err(|e| {
            if e.is_validation() {
                e
            } else {
                InventoryError::invalid(&predicate.name, id, format!("could not be resolved: {e}"))
            }
        })?;
        let mut stub = match resolved {
            RelatedEntity::Existing(uid) => {
                let types = self.reader.get_dgraph_types(&uid).await?;
                predicate.check_target(&uid, &types)?;
                return Ok(RelatedEntity::Existing(uid));
            }
            RelatedEntity::New(stub) => stub,
        };

        let label = stub.name().unwrap_or_else(|| id.id().to_string());
        let slug = slugify(&label);
        if slug.is_empty() {
            return Err(InventoryError::invalid(
                &predicate.name,
                &label,
                "cannot derive a unique name",
            ));
        }
        let unique_name = match self.reader.get_uid("unique_name", &slug).await? {
            Some(uid) => {
                let types = self.reader.get_dgraph_types(&uid).await?;
                if predicate.check_target(&uid, &types).is_ok() {
                    info!(predicate = %predicate.name, label = %label, uid = %uid, "Label matches an existing entry");
                    return Ok(RelatedEntity::Existing(uid));
                }
                naming::disambiguate(&slug)
            }
            None => slug,
        };

        debug!(predicate = %predicate.name, id = %id, dgraph_type = %stub.dgraph_type, "Creating satellite entry");
        stub.fields
            .entry("unique_name".to_string())
            .or_insert_with(|| vec![Value::text(unique_name).into()]);
        stub.fields.insert(
            STATUS.to_string(),
            vec![Value::text(lifecycle::stub_status().as_str()).into()],
        );
        stub.fields
            .insert("entry_added".to_string(), vec![ctx.user_edge()]);
        stub.fields.insert(
            "creation_date".to_string(),
            vec![Value::Literal(Scalar::DateTime(ctx.now)).into()],
        );
        Ok(RelatedEntity::New(stub))
    }

    async fn generate_unique_name(&self, type_def: &TypeDef, entity: &mut Entity) -> Result<String> {
        if type_def.is_a("ResearchPaper") {
            if text_of(entity, "name").is_none() {
                let authors = texts_of(entity, "authors");
                let year = year_of(entity, "published_date");
                let title = text_of(entity, "title").unwrap_or_default();
                let name = naming::research_paper_name(&authors, year, &title);
                if !name.is_empty() {
                    entity.set("name", vec![Value::text(name).into()]);
                }
            }
            let doi = text_of(entity, "doi");
            let arxiv = text_of(entity, "arxiv");
            if let Some(key) = naming::research_paper_unique_name(doi.as_deref(), arxiv.as_deref()) {
                if self.reader.get_uid("unique_name", &key).await?.is_some() {
                    return Ok(naming::disambiguate(&key));
                }
                return Ok(key);
            }
        }

        let name = text_of(entity, "name")
            .ok_or_else(|| InventoryError::constraint("name", "is required"))?;

        if type_def.is_a("Source") {
            let channel = match uid_of(entity, "channel") {
                Some(uid) => self.reader.get_unique_name(&uid).await?,
                None => None,
            };
            let country = match uid_of(entity, "country") {
                Some(uid) => self.reader.get_unique_name(&uid).await?,
                None => None,
            };
            return naming::source_unique_name(
                &self.reader,
                &name,
                channel.as_deref(),
                country.as_deref(),
            )
            .await;
        }
        naming::unique_name(&self.reader, &name).await
    }
}

fn requested_status(type_def: &TypeDef, form: &Map<String, Json>) -> Result<Option<ReviewStatus>> {
    let Some(raw) = form.get(STATUS) else {
        return Ok(None);
    };
    let predicate = type_def
        .predicate(STATUS)
        .ok_or_else(|| InventoryError::UnknownPredicate(STATUS.to_string()))?;
    predicate
        .validate(raw)?
        .first()
        .and_then(Value::as_text)
        .map(|s| s.parse::<ReviewStatus>())
        .transpose()
}

/// Validates every form key against `type_def`. Unknown keys are fatal;
/// `predicate|facet` keys attach a facet to every value of the predicate.
fn parse_form(
    type_def: &TypeDef,
    form: &Map<String, Json>,
    skip: &[&str],
    writable: impl Fn(&Predicate) -> bool,
) -> Result<BTreeMap<String, Vec<Object>>> {
    let mut fields = BTreeMap::new();
    let mut facets = Vec::new();

    for (key, raw) in form {
        if key == STATUS || skip.contains(&key.as_str()) {
            continue;
        }
        if let Some((parent, facet)) = key.split_once(FACET_SEPARATOR) {
            facets.push((key, parent, facet, raw));
            continue;
        }
        let predicate = type_def
            .predicate(key)
            .ok_or_else(|| InventoryError::UnknownPredicate(key.clone()))?;
        if !writable(predicate) {
            return Err(InventoryError::PermissionDenied(format!(
                "'{key}' cannot be set here"
            )));
        }
        let values = predicate.validate(raw)?;
        fields.insert(
            key.clone(),
            values.into_iter().map(Object::from).collect::<Vec<_>>(),
        );
    }

    for (key, parent, facet, raw) in facets {
        let predicate = type_def
            .predicate(parent)
            .ok_or_else(|| InventoryError::UnknownPredicate(key.clone()))?;
        let declared = predicate
            .facet_named(facet)
            .ok_or_else(|| InventoryError::UnknownPredicate(key.clone()))?;
        if !writable(predicate) {
            return Err(InventoryError::PermissionDenied(format!(
                "'{key}' cannot be set here"
            )));
        }
        let value = declared.validate(parent, raw)?;
        let objects = fields.get_mut(parent).ok_or_else(|| {
            InventoryError::constraint(key.as_str(), format!("facet given without a value for '{parent}'"))
        })?;
        for object in objects.iter_mut() {
            object.facets.insert(facet, value.clone());
        }
    }
    Ok(fields)
}

fn apply_defaults(type_def: &TypeDef, entity: &mut Entity) -> Result<()> {
    for predicate in &type_def.predicates {
        let Some(default) = &predicate.default else {
            continue;
        };
        if predicate.name == STATUS
            || predicate.read_only
            || entity.fields.contains_key(&predicate.name)
        {
            continue;
        }
        let values = predicate.validate(default)?;
        entity.set(&predicate.name, values.into_iter().map(Object::from).collect());
    }
    Ok(())
}

fn check_required(type_def: &TypeDef, entity: &Entity) -> Result<()> {
    for predicate in &type_def.predicates {
        if !predicate.required || predicate.read_only {
            continue;
        }
        if entity.get(&predicate.name).map_or(true, <[Object]>::is_empty) {
            return Err(InventoryError::constraint(&predicate.name, "is required"));
        }
    }
    Ok(())
}

fn text_of(entity: &Entity, predicate: &str) -> Option<String> {
    entity.get(predicate)?.first()?.value.as_text()
}

fn texts_of(entity: &Entity, predicate: &str) -> Vec<String> {
    entity
        .get(predicate)
        .unwrap_or_default()
        .iter()
        .filter_map(|o| o.value.as_text())
        .collect()
}

fn uid_of(entity: &Entity, predicate: &str) -> Option<Uid> {
    match &entity.get(predicate)?.first()?.value {
        Value::Existing(uid) => Some(uid.clone()),
        _ => None,
    }
}

fn year_of(entity: &Entity, predicate: &str) -> Option<i32> {
    match &entity.get(predicate)?.first()?.value {
        Value::Literal(Scalar::DateTime(dt)) => Some(dt.year()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::model::inventory_schema;
    use crate::mutation::NQuad;
    use crate::related::StubResolver;
    use crate::testing::{form, MockGraphStore};

    struct Fixture {
        store: Arc<MockGraphStore>,
        sanitizer: Sanitizer,
        user: Uid,
        channel: Uid,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MockGraphStore::new());
        let user = store.add_user();
        let channel = store.add_entry("Channel", "instagram", None);
        let reader = EntryReader::new(store.clone(), Arc::new(inventory_schema().unwrap()));
        let sanitizer = Sanitizer::new(reader, Arc::new(StubResolver));
        Fixture {
            store,
            sanitizer,
            user,
            channel,
        }
    }

    fn ctx(user: &Uid, role: UserRole) -> SubmissionContext {
        SubmissionContext::builder()
            .user(user.clone())
            .role(role)
            .ip("127.0.0.1")
            .build()
    }

    fn rendered(sub: &Submission) -> Vec<String> {
        sub.mutation.set.iter().map(NQuad::render).collect()
    }

    #[tokio::test]
    async fn new_source_gets_metadata_and_lineage() {
        let f = fixture();
        let data = form(json!({
            "name": "Krone",
            "channel": f.channel.as_str(),
            "languages": ["de"],
        }));
        let sub = f
            .sanitizer
            .new_entry("Source", &data, &ctx(&f.user, UserRole::Contributor))
            .await
            .unwrap();

        assert_eq!(sub.status, ReviewStatus::Pending);
        assert!(sub.overwrite.is_empty());
        assert_eq!(text_of(&sub.entry, "unique_name").as_deref(), Some("krone"));
        let set = rendered(&sub);
        assert!(set.iter().any(|s| s.ends_with(r#"<dgraph.type> "Entry" ."#)));
        assert!(set.iter().any(|s| s.ends_with(r#"<entry_review_status> "pending" ."#)));
        assert!(set
            .iter()
            .any(|s| s.contains(&format!("<entry_added> <{}> (timestamp=", f.user))));
        assert!(sub.entry.get("reviewed_by").is_none());
    }

    #[tokio::test]
    async fn unknown_keys_are_rejected() {
        let f = fixture();
        let data = form(json!({ "name": "Krone", "channel": f.channel.as_str(), "bogus": 1 }));
        let err = f
            .sanitizer
            .new_entry("Source", &data, &ctx(&f.user, UserRole::Contributor))
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::UnknownPredicate(k) if k == "bogus"));
    }

    #[tokio::test]
    async fn missing_required_fields_are_reported() {
        let f = fixture();
        let data = form(json!({ "name": "Krone" }));
        let err = f
            .sanitizer
            .new_entry("Source", &data, &ctx(&f.user, UserRole::Contributor))
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::ConstraintViolation { predicate, .. } if predicate == "channel"));
    }

    #[tokio::test]
    async fn facets_attach_to_every_value() {
        let f = fixture();
        let data = form(json!({
            "name": "Krone",
            "channel": f.channel.as_str(),
            "audience_size": "2022-05-01",
            "audience_size|count": "12 000",
            "audience_size|unit": "followers",
        }));
        let sub = f
            .sanitizer
            .new_entry("Source", &data, &ctx(&f.user, UserRole::Contributor))
            .await
            .unwrap();
        let audience = &sub.entry.get("audience_size").unwrap()[0];
        assert_eq!(audience.facets.get("count"), Some(&FacetValue::Int(12000)));
        assert_eq!(
            audience.facets.get("unit"),
            Some(&FacetValue::Text("followers".into()))
        );
    }

    #[tokio::test]
    async fn contributors_cannot_accept_their_own_entries() {
        let f = fixture();
        let mut c = ctx(&f.user, UserRole::Contributor);
        c.accept = true;
        let data = form(json!({ "name": "Krone", "channel": f.channel.as_str() }));
        let err = f.sanitizer.new_entry("Source", &data, &c).await.unwrap_err();
        assert!(matches!(err, InventoryError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn reviewers_accepting_are_recorded() {
        let f = fixture();
        let mut c = ctx(&f.user, UserRole::Reviewer);
        c.accept = true;
        let data = form(json!({ "name": "Krone", "channel": f.channel.as_str() }));
        let sub = f.sanitizer.new_entry("Source", &data, &c).await.unwrap();
        assert_eq!(sub.status, ReviewStatus::Accepted);
        assert!(sub.entry.get("reviewed_by").is_some());
    }

    #[tokio::test]
    async fn admin_types_need_admins() {
        let f = fixture();
        let data = form(json!({ "name": "Telegram" }));
        let err = f
            .sanitizer
            .new_entry("Channel", &data, &ctx(&f.user, UserRole::Reviewer))
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn wrong_target_type_is_a_constraint_violation() {
        let f = fixture();
        let org = f.store.add_entry("Organization", "falter_verlag", None);
        let data = form(json!({ "name": "Falter", "channel": org.as_str() }));
        let err = f
            .sanitizer
            .new_entry("Source", &data, &ctx(&f.user, UserRole::Contributor))
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::ConstraintViolation { predicate, .. } if predicate == "channel"));
    }

    #[tokio::test]
    async fn new_labels_become_draft_satellites() {
        let f = fixture();
        let data = form(json!({
            "name": "Krone",
            "channel": f.channel.as_str(),
            "publishes_org": ["Mediaprint"],
            "geographic_scope_subunit": ["Vienna", "vienna"],
        }));
        let sub = f
            .sanitizer
            .new_entry("Source", &data, &ctx(&f.user, UserRole::Contributor))
            .await
            .unwrap();

        assert_eq!(sub.related.len(), 2);
        assert_eq!(sub.entry.get("geographic_scope_subunit").unwrap().len(), 1);
        let set = rendered(&sub);
        assert!(set.iter().any(|s| s == r#"_:mediaprint <entry_review_status> "draft" ."#));
        assert!(set.iter().any(|s| s == r#"_:mediaprint <dgraph.type> "Organization" ."#));
        assert!(set.iter().any(|s| s == r#"_:vienna <unique_name> "vienna" ."#));
        assert!(set
            .iter()
            .any(|s| s.starts_with("_:mediaprint <publishes> _:new_")));
    }

    #[tokio::test]
    async fn siblings_inherit_shared_fields() {
        let f = fixture();
        let data = form(json!({
            "name": "Krone",
            "channel": f.channel.as_str(),
            "languages": ["de"],
            "sibling_sources": ["Krone TV"],
        }));
        let sub = f
            .sanitizer
            .new_entry("Source", &data, &ctx(&f.user, UserRole::Contributor))
            .await
            .unwrap();
        let set = rendered(&sub);
        assert!(set.iter().any(|s| s == r#"_:krone_tv <languages> "de" ."#));
        assert!(set.iter().any(|s| s.starts_with("_:krone_tv <sibling_sources> _:new_")));
    }

    #[tokio::test]
    async fn papers_are_named_from_citation_fields() {
        let f = fixture();
        let data = form(json!({
            "title": "Mapping news. A survey",
            "authors": ["Balluff, Paul", "Lind, Fabienne"],
            "published_date": "2021",
            "doi": "10.1080/1234",
        }));
        let sub = f
            .sanitizer
            .new_entry("ResearchPaper", &data, &ctx(&f.user, UserRole::Contributor))
            .await
            .unwrap();
        assert_eq!(
            text_of(&sub.entry, "name").as_deref(),
            Some("Balluff, Paul et al. (2021): Mapping news")
        );
        assert_eq!(
            text_of(&sub.entry, "unique_name").as_deref(),
            Some("10_1080_1234")
        );
    }

    #[tokio::test]
    async fn edits_overwrite_list_predicates() {
        let f = fixture();
        let source = f
            .store
            .add_entry("Source", "krone", Some((&f.user, ReviewStatus::Pending)));
        let data = form(json!({ "uid": source.as_str(), "languages": ["de", "en"] }));
        let sub = f
            .sanitizer
            .edit_entry("Source", &data, &ctx(&f.user, UserRole::Contributor))
            .await
            .unwrap();

        assert_eq!(sub.overwrite.get(&source).unwrap(), &vec!["languages".to_string()]);
        let deletes: Vec<String> = sub.mutation.delete.iter().map(NQuad::render).collect();
        assert_eq!(deletes, vec![format!("<{source}> <languages> * .")]);
        assert!(sub.entry.get("entry_edit_history").is_some());
    }

    #[tokio::test]
    async fn strangers_cannot_edit() {
        let f = fixture();
        let other = f.store.add_user();
        let source = f
            .store
            .add_entry("Source", "krone", Some((&other, ReviewStatus::Pending)));
        let data = form(json!({ "uid": source.as_str(), "languages": ["de"] }));
        let err = f
            .sanitizer
            .edit_entry("Source", &data, &ctx(&f.user, UserRole::Contributor))
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn channel_is_frozen_after_submission() {
        let f = fixture();
        let source = f
            .store
            .add_entry("Source", "krone", Some((&f.user, ReviewStatus::Pending)));
        let data = form(json!({ "uid": source.as_str(), "channel": f.channel.as_str() }));
        let err = f
            .sanitizer
            .edit_entry("Source", &data, &ctx(&f.user, UserRole::Contributor))
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn editing_requires_an_existing_entry() {
        let f = fixture();
        let data = form(json!({ "uid": "0xdead", "name": "Ghost" }));
        let err = f
            .sanitizer
            .edit_entry("Source", &data, &ctx(&f.user, UserRole::Reviewer))
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::ConstraintViolation { predicate, .. } if predicate == "uid"));
    }
}
