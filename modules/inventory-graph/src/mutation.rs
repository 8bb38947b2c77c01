//! Mutation compiler. A validated entry plus its satellite entities become
//! one upsert: an optional query prelude, delete statements, set statements.
//!
//! Delete statements are always applied before set statements of the same
//! mutation, so a predicate that gets cleared and re-set ends up holding
//! exactly the new values.

use std::collections::BTreeMap;

use tracing::debug;

use inventory_common::{InventoryError, Result};

use crate::dql::{render_blocks, Arg, Block, Filter, Operator};
use crate::predicate::Direction;
use crate::related::{NewEntity, RelatedEntity};
use crate::schema::Schema;
use crate::value::{NewId, Object, Subject, Uid, Value, Variable};

/// One statement: `subject <predicate> object (facets) .`
#[derive(Debug, Clone, PartialEq)]
pub struct NQuad {
    pub subject: Subject,
    pub predicate: String,
    pub object: Object,
}

impl NQuad {
    pub fn new(subject: Subject, predicate: &str, object: impl Into<Object>) -> Self {
        Self {
            subject,
            predicate: predicate.to_string(),
            object: object.into(),
        }
    }

    /// `subject <predicate> * .`
    pub fn wildcard(subject: Subject, predicate: &str) -> Self {
        Self::new(subject, predicate, Value::Wildcard)
    }

    pub fn render(&self) -> String {
        format!(
            "{} <{}> {}{} .",
            self.subject.nquad(),
            self.predicate,
            self.object.value.nquad(),
            self.object.facets.nquad()
        )
    }
}

/// A node and its field values, keyed by predicate name.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub subject: Subject,
    pub fields: BTreeMap<String, Vec<Object>>,
}

impl Entity {
    pub fn new(subject: Subject) -> Self {
        Self {
            subject,
            fields: BTreeMap::new(),
        }
    }

    /// Takes the subject from the `uid` field; without one the entity gets a
    /// fresh placeholder.
    pub fn from_fields(mut fields: BTreeMap<String, Vec<Object>>) -> Self {
        let subject = fields
            .remove("uid")
            .and_then(|v| v.into_iter().next())
            .and_then(|o| o.value.as_subject())
            .unwrap_or_else(|| Subject::New(NewId::fresh()));
        Self { subject, fields }
    }

    pub fn set(&mut self, predicate: &str, values: Vec<Object>) {
        self.fields.insert(predicate.to_string(), values);
    }

    pub fn push(&mut self, predicate: &str, value: impl Into<Object>) {
        self.fields
            .entry(predicate.to_string())
            .or_default()
            .push(value.into());
    }

    pub fn get(&self, predicate: &str) -> Option<&[Object]> {
        self.fields.get(predicate).map(Vec::as_slice)
    }

    pub fn uid(&self) -> Option<&Uid> {
        match &self.subject {
            Subject::Existing(uid) => Some(uid),
            _ => None,
        }
    }

    /// Statements for every field. Reverse predicates are written from the
    /// related node's side; mutual predicates in both directions.
    pub fn to_nquads(&self, schema: &Schema) -> Vec<NQuad> {
        let mut out = Vec::new();
        for (name, objects) in &self.fields {
            let direction = schema
                .predicate(name)
                .and_then(|p| p.relationship_info())
                .map(|r| r.direction.clone());
            for object in objects {
                match &direction {
                    Some(Direction::Reverse { edge }) => {
                        if let Some(owner) = object.value.as_subject() {
                            out.push(NQuad::new(
                                owner,
                                edge,
                                Object::with_facets(self.subject.as_value(), object.facets.clone()),
                            ));
                        }
                    }
                    Some(Direction::Mutual) => {
                        out.push(NQuad::new(self.subject.clone(), name, object.clone()));
                        if let Some(other) = object.value.as_subject() {
                            out.push(NQuad::new(
                                other,
                                name,
                                Object::with_facets(self.subject.as_value(), object.facets.clone()),
                            ));
                        }
                    }
                    _ => out.push(NQuad::new(self.subject.clone(), name, object.clone())),
                }
            }
        }
        out
    }
}

impl NewEntity {
    /// The satellite as a full entity tagged with its type lineage.
    pub fn to_entity(&self, schema: &Schema) -> Entity {
        let mut entity = Entity::new(Subject::New(self.id.clone()));
        entity.fields = self.fields.clone();
        let lineage = schema
            .lineage(&self.dgraph_type)
            .map(<[String]>::to_vec)
            .unwrap_or_else(|| vec![self.dgraph_type.clone()]);
        entity.set(
            "dgraph.type",
            lineage.into_iter().map(|t| Object::from(Value::text(t))).collect(),
        );
        entity
    }
}

/// A compiled upsert.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mutation {
    /// Variable blocks evaluated before the statements.
    pub prelude: Vec<Block>,
    pub delete: Vec<NQuad>,
    pub set: Vec<NQuad>,
}

/// Textual form, ready for the store.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedMutation {
    pub query: Option<String>,
    pub delete_nquads: Option<String>,
    pub set_nquads: Option<String>,
}

impl Mutation {
    pub fn is_empty(&self) -> bool {
        self.delete.is_empty() && self.set.is_empty()
    }

    pub fn render(&self) -> RenderedMutation {
        let lines = |quads: &[NQuad]| {
            (!quads.is_empty()).then(|| {
                quads
                    .iter()
                    .map(NQuad::render)
                    .collect::<Vec<String>>()
                    .join("\n")
            })
        };
        RenderedMutation {
            query: (!self.prelude.is_empty()).then(|| render_blocks(&self.prelude, 2)),
            delete_nquads: lines(&self.delete),
            set_nquads: lines(&self.set),
        }
    }
}

impl RenderedMutation {
    /// Request body for an RDF mutation, wrapped in an upsert block when a
    /// prelude is present.
    pub fn rdf_body(&self) -> String {
        let mut ops = String::new();
        for (name, body) in [("delete", &self.delete_nquads), ("set", &self.set_nquads)] {
            if let Some(body) = body {
                ops.push_str(&format!("    {name} {{\n{}\n    }}\n", indent(body, 6)));
            }
        }
        match &self.query {
            Some(query) => format!(
                "upsert {{\n  query {{\n{query}  }}\n  mutation {{\n{ops}  }}\n}}\n"
            ),
            None => format!("{{\n{}}}\n", dedent_ops(&ops)),
        }
    }
}

fn indent(text: &str, by: usize) -> String {
    let pad = " ".repeat(by);
    text.lines()
        .map(|l| format!("{pad}{l}"))
        .collect::<Vec<String>>()
        .join("\n")
}

fn dedent_ops(ops: &str) -> String {
    ops.lines()
        .map(|l| format!("{}\n", l.strip_prefix("  ").unwrap_or(l)))
        .collect()
}

/// Builds the upsert for `entry`.
///
/// `overwrite` lists, per existing node, the predicates whose current edges
/// are cleared before the new values are set. `related` are the satellite
/// entities referenced by the entry.
pub fn compile(
    schema: &Schema,
    entry: &Entity,
    overwrite: &BTreeMap<Uid, Vec<String>>,
    related: &[RelatedEntity],
) -> Result<Mutation> {
    let mut mutation = Mutation::default();

    for (uid, predicates) in overwrite {
        for name in predicates {
            let predicate = schema
                .predicate(name)
                .ok_or_else(|| InventoryError::UnknownPredicate(name.clone()))?;
            let rel = predicate.relationship_info();
            let owners = rel.map(|r| r.constraint.as_slice()).unwrap_or_default();
            match rel.map(|r| &r.direction) {
                Some(Direction::Reverse { edge }) => {
                    let var = format!("rev_{}_{}", uid.as_str(), name);
                    mutation.prelude.push(owners_of(&var, edge, uid, owners));
                    mutation.delete.push(NQuad::new(
                        Subject::Var(Variable::uid(&var)),
                        edge,
                        Value::Existing(uid.clone()),
                    ));
                }
                Some(Direction::Mutual) => {
                    let var = format!("mut_{}_{}", uid.as_str(), name);
                    mutation.prelude.push(owners_of(&var, name, uid, owners));
                    mutation
                        .delete
                        .push(NQuad::wildcard(Subject::Existing(uid.clone()), name));
                    mutation.delete.push(NQuad::new(
                        Subject::Var(Variable::uid(&var)),
                        name,
                        Value::Existing(uid.clone()),
                    ));
                }
                _ => mutation
                    .delete
                    .push(NQuad::wildcard(Subject::Existing(uid.clone()), name)),
            }
        }
    }

    mutation.set.extend(entry.to_nquads(schema));
    for rel in related {
        if let RelatedEntity::New(satellite) = rel {
            mutation.set.extend(satellite.to_entity(schema).to_nquads(schema));
        }
    }

    debug!(
        subject = %entry.subject,
        prelude = mutation.prelude.len(),
        delete = mutation.delete.len(),
        set = mutation.set.len(),
        "Compiled mutation"
    );
    Ok(mutation)
}

/// `var as var(func: has(edge)) @filter(uid_in(edge, uid) AND (type(A) OR ...))`
///
/// Other types may declare the same edge; only nodes of an owning type are
/// bound, so their edges to `uid` are the only ones cleared.
fn owners_of(var: &str, edge: &str, uid: &Uid, owners: &[String]) -> Block {
    let mut block = Block::var(var, Filter::has(edge));
    let mut parts = vec![Filter::op(Operator::UidIn, edge, Arg::Uid(uid.clone()))];
    parts.extend(Filter::any(owners.iter().map(|t| Filter::type_of(t)).collect()));
    block.filter = Filter::all(parts);
    block
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::inventory_schema;
    use crate::value::{FacetValue, Facets, Scalar};

    fn uid(s: &str) -> Uid {
        Uid::parse(s).unwrap()
    }

    #[test]
    fn statements_render_facets() {
        let q = NQuad::new(
            Subject::Existing(uid("0x1")),
            "audience_size",
            Object::with_facets(
                Value::text("2022-01-01T00:00:00Z"),
                Facets::new()
                    .with("count", FacetValue::Int(12000))
                    .with("unit", FacetValue::Text("followers".into())),
            ),
        );
        assert_eq!(
            q.render(),
            r#"<0x1> <audience_size> "2022-01-01T00:00:00Z" (count=12000, unit="followers") ."#
        );
    }

    #[test]
    fn entity_without_uid_gets_a_placeholder() {
        let mut fields = BTreeMap::new();
        fields.insert("name".to_string(), vec![Object::from(Value::text("Falter"))]);
        let entity = Entity::from_fields(fields);
        assert!(matches!(entity.subject, Subject::New(_)));
        assert!(entity.get("uid").is_none());
    }

    #[test]
    fn overwrite_deletes_come_before_sets() {
        let schema = inventory_schema().unwrap();
        let subject = uid("0x10");
        let mut entry = Entity::new(Subject::Existing(subject.clone()));
        entry.push("languages", Value::text("de"));
        entry.push("name", Value::text("Der Standard"));

        let overwrite = BTreeMap::from([(subject, vec!["languages".to_string()])]);
        let rendered = compile(&schema, &entry, &overwrite, &[]).unwrap().render();

        assert_eq!(rendered.delete_nquads.as_deref(), Some("<0x10> <languages> * ."));
        let body = rendered.rdf_body();
        let delete_at = body.find("delete {").unwrap();
        let set_at = body.find("set {").unwrap();
        assert!(delete_at < set_at);
        assert!(rendered.query.is_none());
        assert!(body.starts_with("{\n  delete {"));
    }

    #[test]
    fn reverse_predicates_are_cleared_through_a_variable() {
        let schema = inventory_schema().unwrap();
        let subject = uid("0x20");
        let mut entry = Entity::new(Subject::Existing(subject.clone()));
        entry.push("publishes_org", Value::Existing(uid("0x30")));

        let overwrite = BTreeMap::from([(subject, vec!["publishes_org".to_string()])]);
        let m = compile(&schema, &entry, &overwrite, &[]).unwrap();
        let rendered = m.render();

        let query = rendered.query.unwrap();
        assert!(query.contains(
            r#"rev_0x20_publishes_org as var(func: has(publishes)) @filter((uid_in(publishes, 0x20) AND type("Organization")))"#
        ));
        assert_eq!(
            rendered.delete_nquads.as_deref(),
            Some("uid(rev_0x20_publishes_org) <publishes> <0x20> .")
        );
        assert_eq!(
            rendered.set_nquads.as_deref(),
            Some("<0x30> <publishes> <0x20> .")
        );
    }

    #[test]
    fn reverse_cleanup_only_binds_owning_types() {
        let schema = inventory_schema().unwrap();
        let subject = uid("0x40");
        let entry = Entity::new(Subject::Existing(subject.clone()));
        let overwrite = BTreeMap::from([(subject, vec!["archives".to_string()])]);
        let query = compile(&schema, &entry, &overwrite, &[])
            .unwrap()
            .render()
            .query
            .unwrap();
        assert!(query.contains(
            r#"@filter((uid_in(sources_included, 0x40) AND (type("Archive") OR type("Dataset"))))"#
        ));
    }

    #[test]
    fn mutual_predicates_are_written_both_ways() {
        let schema = inventory_schema().unwrap();
        let mut entry = Entity::new(Subject::Existing(uid("0x1")));
        entry.push("sibling_sources", Value::Existing(uid("0x2")));
        let set: Vec<String> = entry.to_nquads(&schema).iter().map(NQuad::render).collect();
        assert_eq!(
            set,
            vec![
                "<0x1> <sibling_sources> <0x2> .".to_string(),
                "<0x2> <sibling_sources> <0x1> .".to_string(),
            ]
        );
    }

    #[test]
    fn satellites_are_created_with_their_lineage() {
        let schema = inventory_schema().unwrap();
        let acme = NewId::from_label("ACME");
        let mut entry = Entity::new(Subject::New(NewId::from_label("_:newsource")));
        entry.push("name", Value::text("ACME Daily"));
        entry.push("publishes_org", Value::New(acme.clone()));
        let related = vec![RelatedEntity::New(
            NewEntity::new(acme, "Organization").with("name", Value::text("ACME")),
        )];

        let set = compile(&schema, &entry, &BTreeMap::new(), &related)
            .unwrap()
            .render()
            .set_nquads
            .unwrap();
        assert!(set.contains("_:acme <publishes> _:newsource ."));
        assert!(set.contains(r#"_:acme <dgraph.type> "Organization" ."#));
        assert!(set.contains(r#"_:acme <dgraph.type> "Entry" ."#));
        assert!(set.contains(r#"_:acme <name> "ACME" ."#));
    }

    #[test]
    fn upsert_body_wraps_prelude_and_statements() {
        let mut m = Mutation::default();
        m.prelude.push(owners_of("v", "publishes", &uid("0x5"), &[]));
        m.delete.push(NQuad::new(
            Subject::Var(Variable::uid("v")),
            "publishes",
            Value::Existing(uid("0x5")),
        ));
        m.set.push(NQuad::new(
            Subject::Existing(uid("0x5")),
            "verified_account",
            Value::Literal(Scalar::Bool(true)),
        ));
        let body = m.render().rdf_body();
        assert!(body.starts_with("upsert {\n  query {\n"));
        assert!(body.contains("  mutation {\n    delete {\n      uid(v) <publishes> <0x5> .\n    }\n"));
        assert!(body.contains("    set {\n      <0x5> <verified_account> \"true\" .\n    }\n"));
    }

    #[test]
    fn unknown_overwrite_predicate_is_rejected() {
        let schema = inventory_schema().unwrap();
        let entry = Entity::new(Subject::Existing(uid("0x1")));
        let overwrite = BTreeMap::from([(uid("0x1"), vec!["nope".to_string()])]);
        assert!(matches!(
            compile(&schema, &entry, &overwrite, &[]),
            Err(InventoryError::UnknownPredicate(_))
        ));
    }
}
