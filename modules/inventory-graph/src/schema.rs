//! Entity-type registry. Built once at startup, then shared by reference
//! with the filter compiler and the mutation compiler.

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use inventory_common::{InventoryError, Result, UserRole};

use crate::dql::is_identifier;
use crate::predicate::{Direction, Facet, Predicate};

/// Predicates every entity type must carry.
pub const ENTRY_PREDICATES: &[&str] = &[
    "uid",
    "unique_name",
    "name",
    "entry_review_status",
    "creation_date",
    "entry_added",
];

/// Declaration of one entity type: its own ordered predicates plus an
/// optional parent whose predicates it inherits.
#[derive(Debug, Clone)]
pub struct EntityType {
    pub name: String,
    pub parent: Option<String>,
    pub predicates: Vec<Predicate>,
    pub permission_new: UserRole,
    pub permission_edit: UserRole,
}

impl EntityType {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            parent: None,
            predicates: Vec::new(),
            permission_new: UserRole::Contributor,
            permission_edit: UserRole::Contributor,
        }
    }

    pub fn extends(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_string());
        self
    }

    pub fn predicates(mut self, predicates: Vec<Predicate>) -> Self {
        self.predicates.extend(predicates);
        self
    }

    pub fn permission(mut self, role: UserRole) -> Self {
        self.permission_new = role;
        self.permission_edit = role;
        self
    }

    pub fn permission_edit(mut self, role: UserRole) -> Self {
        self.permission_edit = role;
        self
    }
}

/// A registered type with inheritance applied.
#[derive(Debug, Clone)]
pub struct TypeDef {
    pub name: String,
    /// The type itself first, then its ancestors. These are the `dgraph.type` tags.
    pub lineage: Vec<String>,
    pub predicates: Vec<Predicate>,
    pub permission_new: UserRole,
    pub permission_edit: UserRole,
}

impl TypeDef {
    pub fn predicate(&self, name: &str) -> Option<&Predicate> {
        self.predicates.iter().find(|p| p.name == name)
    }

    pub fn is_a(&self, type_name: &str) -> bool {
        self.lineage.iter().any(|t| t == type_name)
    }
}

#[derive(Debug, Default)]
pub struct SchemaBuilder {
    types: Vec<EntityType>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parents have to be registered before their children.
    pub fn register(mut self, entity: EntityType) -> Self {
        self.types.push(entity);
        self
    }

    pub fn build(self) -> Result<Schema> {
        let mut types: BTreeMap<String, TypeDef> = BTreeMap::new();
        let mut predicates: BTreeMap<String, Predicate> = BTreeMap::new();

        for entity in self.types {
            if !is_identifier(&entity.name) || entity.name.contains('.') {
                return Err(InventoryError::Schema(format!(
                    "invalid type name {:?}",
                    entity.name
                )));
            }
            if types.contains_key(&entity.name) {
                return Err(InventoryError::Schema(format!(
                    "type {} registered twice",
                    entity.name
                )));
            }

            let mut seen = HashSet::new();
            for p in &entity.predicates {
                check_predicate_name(&entity.name, p)?;
                if !seen.insert(p.name.as_str()) {
                    return Err(InventoryError::Schema(format!(
                        "{} declares {} twice",
                        entity.name, p.name
                    )));
                }
                match predicates.get(&p.name) {
                    Some(existing) if !same_shape(existing, p) => {
                        return Err(InventoryError::Schema(format!(
                            "predicate {} on {} conflicts with an earlier declaration",
                            p.name, entity.name
                        )));
                    }
                    Some(_) => {}
                    None => {
                        predicates.insert(p.name.clone(), p.clone());
                    }
                }
            }

            let (lineage, resolved) = match &entity.parent {
                None => (vec![entity.name.clone()], entity.predicates.clone()),
                Some(parent_name) => {
                    let parent = types.get(parent_name).ok_or_else(|| {
                        InventoryError::Schema(format!(
                            "{} extends unknown type {parent_name}",
                            entity.name
                        ))
                    })?;
                    let mut lineage = vec![entity.name.clone()];
                    lineage.extend(parent.lineage.iter().cloned());

                    let mut resolved = entity.predicates.clone();
                    resolved.extend(
                        parent
                            .predicates
                            .iter()
                            .filter(|p| !seen.contains(p.name.as_str()))
                            .cloned(),
                    );
                    (lineage, resolved)
                }
            };

            debug!(
                entity_type = %entity.name,
                predicates = resolved.len(),
                "Registered entity type"
            );
            types.insert(
                entity.name.clone(),
                TypeDef {
                    name: entity.name,
                    lineage,
                    predicates: resolved,
                    permission_new: entity.permission_new,
                    permission_edit: entity.permission_edit,
                },
            );
        }

        let schema = Schema { types, predicates };
        schema.check_entry_predicates()?;
        schema.check_reverse_edges()?;
        Ok(schema)
    }
}

fn check_predicate_name(type_name: &str, p: &Predicate) -> Result<()> {
    if !is_identifier(&p.name) || p.name.starts_with('~') || p.name.contains('.') {
        return Err(InventoryError::Schema(format!(
            "{type_name} declares invalid predicate name {:?}",
            p.name
        )));
    }
    for alias in &p.aliases {
        if !is_identifier(alias) {
            return Err(InventoryError::Schema(format!(
                "{} has invalid alias {alias:?}",
                p.name
            )));
        }
    }
    for facet in &p.facets {
        if !is_identifier(&facet.name) || facet.name.contains('.') {
            return Err(InventoryError::Schema(format!(
                "{} has invalid facet name {:?}",
                p.name, facet.name
            )));
        }
    }
    Ok(())
}

/// Declarations sharing a name have to store values the same way.
fn same_shape(a: &Predicate, b: &Predicate) -> bool {
    a.class() == b.class()
        && std::mem::discriminant(&a.kind) == std::mem::discriminant(&b.kind)
        && a.relationship_info().map(|r| (&r.cardinality, &r.direction))
            == b.relationship_info().map(|r| (&r.cardinality, &r.direction))
}

/// The registry of entity types and their predicates.
#[derive(Debug, Clone)]
pub struct Schema {
    types: BTreeMap<String, TypeDef>,
    predicates: BTreeMap<String, Predicate>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    fn check_entry_predicates(&self) -> Result<()> {
        for t in self.types.values() {
            if let Some(missing) = ENTRY_PREDICATES
                .iter()
                .find(|name| t.predicate(name).is_none())
            {
                return Err(InventoryError::Schema(format!(
                    "{} lacks entry predicate {missing}",
                    t.name
                )));
            }
        }
        Ok(())
    }

    fn check_reverse_edges(&self) -> Result<()> {
        for p in self.predicates.values() {
            let Some(Direction::Reverse { edge }) = p.relationship_info().map(|r| &r.direction)
            else {
                continue;
            };
            let forward = self.predicates.get(edge).filter(|f| {
                f.relationship_info()
                    .is_some_and(|r| r.direction == Direction::Forward)
            });
            if forward.is_none() {
                return Err(InventoryError::Schema(format!(
                    "{} is the reverse of {edge}, which is not a forward relationship",
                    p.name
                )));
            }
        }
        Ok(())
    }

    /// Case-insensitive lookup.
    pub fn get_type(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name).or_else(|| {
            self.types
                .values()
                .find(|t| t.name.eq_ignore_ascii_case(name))
        })
    }

    pub fn type_names(&self) -> Vec<&str> {
        self.types.keys().map(String::as_str).collect()
    }

    pub fn predicates(&self, type_name: &str) -> Option<&[Predicate]> {
        self.get_type(type_name).map(|t| t.predicates.as_slice())
    }

    pub fn lineage(&self, type_name: &str) -> Option<&[String]> {
        self.get_type(type_name).map(|t| t.lineage.as_slice())
    }

    /// First declaration of `name` across all types.
    pub fn predicate(&self, name: &str) -> Option<&Predicate> {
        self.predicates.get(name)
    }

    pub fn queryable(&self, name: &str) -> Option<&Predicate> {
        self.predicate(name).filter(|p| p.queryable)
    }

    pub fn queryable_facet(&self, predicate: &str, facet: &str) -> Option<(&Predicate, &Facet)> {
        let p = self.predicate(predicate)?;
        let f = p.facet_named(facet).filter(|f| f.queryable)?;
        Some((p, f))
    }
}
