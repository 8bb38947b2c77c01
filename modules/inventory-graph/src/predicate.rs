//! Field descriptors. A `Predicate` knows how to validate raw input into
//! statement operands and how to turn filter values into DQL fragments.

use serde_json::Value as Json;
use tracing::debug;

use inventory_common::{InventoryError, Result, UserRole};

use crate::dql::{Arg, Connector, Filter, Operator};
use crate::value::{
    canonical_datetime, parse_datetime, FacetValue, GeoPoint, NewId, Scalar, Uid, Value,
};

/// Dates outside this range are treated as typos.
pub const MIN_YEAR: i32 = 1700;
pub const MAX_YEAR: i32 = 2100;

/// Sentinel that clears a multiple-choice field.
pub const NA: &str = "NA";

const TEXT_OPERATORS: &[Operator] = &[
    Operator::Eq,
    Operator::AnyOfTerms,
    Operator::AllOfTerms,
    Operator::Regexp,
    Operator::Has,
];
const ORDERED_OPERATORS: &[Operator] = &[
    Operator::Eq,
    Operator::Gt,
    Operator::Lt,
    Operator::Ge,
    Operator::Le,
    Operator::Has,
];
const EQ_OPERATORS: &[Operator] = &[Operator::Eq, Operator::Has];
const RELATIONSHIP_OPERATORS: &[Operator] = &[Operator::UidIn, Operator::Has];

// --- Choices ---

/// Closed label set: `(stored value, display label)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Choices(Vec<(String, String)>);

impl Choices {
    pub fn new(options: &[(&str, &str)]) -> Self {
        Self(
            options
                .iter()
                .map(|(v, l)| (v.to_string(), l.to_string()))
                .collect(),
        )
    }

    pub fn contains(&self, value: &str) -> bool {
        self.0.iter().any(|(v, _)| v == value)
    }

    pub fn values(&self) -> Vec<&str> {
        self.0.iter().map(|(v, _)| v.as_str()).collect()
    }

    pub fn options(&self) -> &[(String, String)] {
        &self.0
    }
}

// --- Relationships ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Single,
    List,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Direction {
    /// The edge is stored on the entry itself.
    Forward,
    /// The edge `edge` is stored on the related node and points at the entry.
    Reverse { edge: String },
    /// Stored in both directions under the same name.
    Mutual,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Relationship {
    pub cardinality: Cardinality,
    pub direction: Direction,
    /// Acceptable target types; empty accepts any entry.
    pub constraint: Vec<String>,
    /// Free-text tokens become new satellite entities.
    pub allow_new: bool,
}

// --- Kinds ---

#[derive(Debug, Clone, PartialEq)]
pub enum PredicateKind {
    Uid,
    String,
    UniqueName,
    ListString,
    Integer { min: Option<i64>, max: Option<i64> },
    Boolean,
    DateTime,
    Geo,
    SingleChoice(Choices),
    MultipleChoice(Choices),
    Relationship(Relationship),
}

/// How a predicate is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredicateClass {
    Scalar,
    ListScalar,
    Relationship,
    ReverseRelationship,
}

// --- Facets ---

#[derive(Debug, Clone, PartialEq)]
pub enum FacetKind {
    String,
    Integer,
    Float,
    DateTime,
    Boolean,
    Choice(Choices),
}

/// Metadata on an edge of the parent predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Facet {
    pub name: String,
    pub kind: FacetKind,
    pub queryable: bool,
}

impl Facet {
    pub fn new(name: &str, kind: FacetKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            queryable: false,
        }
    }

    pub fn queryable(mut self) -> Self {
        self.queryable = true;
        self
    }

    pub fn operators(&self) -> &'static [Operator] {
        match self.kind {
            FacetKind::Integer | FacetKind::Float | FacetKind::DateTime => ORDERED_OPERATORS,
            _ => EQ_OPERATORS,
        }
    }

    pub fn validate(&self, parent: &str, raw: &Json) -> Result<FacetValue> {
        let key = format!("{parent}|{}", self.name);
        let token = single_token(&key, raw)?
            .ok_or_else(|| InventoryError::invalid(&key, raw, "facet value is empty"))?;
        match &self.kind {
            FacetKind::String => Ok(FacetValue::Text(token)),
            FacetKind::Integer => token
                .replace(['_', ' '], "")
                .parse::<i64>()
                .map(FacetValue::Int)
                .map_err(|_| InventoryError::invalid(&key, &token, "not an integer")),
            FacetKind::Float => token
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(FacetValue::Float)
                .ok_or_else(|| InventoryError::invalid(&key, &token, "not a number")),
            FacetKind::DateTime => checked_datetime(&key, &token).map(FacetValue::DateTime),
            FacetKind::Boolean => parse_bool(&key, &token).map(FacetValue::Bool),
            FacetKind::Choice(choices) => {
                if choices.contains(&token) {
                    Ok(FacetValue::Text(token))
                } else {
                    Err(InventoryError::invalid(
                        &key,
                        &token,
                        format!("has to be one of {}", choices.values().join(", ")),
                    ))
                }
            }
        }
    }

    /// Fragment for use inside `@facets(...)`. Malformed values yield `None`.
    pub fn query_filter(&self, value: &str, operator: Option<Operator>) -> Option<Filter> {
        let op = operator
            .filter(|op| self.operators().contains(op) && *op != Operator::Has)
            .unwrap_or(Operator::Eq);
        let value = value.trim();
        let arg = match &self.kind {
            FacetKind::String => Arg::Text(value.to_string()),
            FacetKind::Choice(choices) => {
                if !choices.contains(value) {
                    return None;
                }
                Arg::Text(value.to_string())
            }
            FacetKind::Integer => Arg::Number(value.parse::<i64>().ok()?.to_string()),
            FacetKind::Float => {
                let f = value.parse::<f64>().ok().filter(|f| f.is_finite())?;
                Arg::Number(f.to_string())
            }
            FacetKind::DateTime => Arg::Text(canonical_datetime(&parse_datetime(value)?)),
            FacetKind::Boolean => Arg::Number(parse_bool(&self.name, value).ok()?.to_string()),
        };
        Some(Filter::op(op, &self.name, arg))
    }
}

// --- Predicate ---

/// One declared field of an entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub name: String,
    pub kind: PredicateKind,
    pub label: Option<String>,
    pub description: String,
    pub required: bool,
    pub queryable: bool,
    pub operators: Vec<Operator>,
    pub permission_new: UserRole,
    pub permission_edit: UserRole,
    /// Clear every existing edge before writing new ones on edit.
    pub overwrite: bool,
    /// Other predicate names matched when filtering.
    pub aliases: Vec<String>,
    pub default: Option<Json>,
    pub facets: Vec<Facet>,
    /// Offered when creating an entry.
    pub new: bool,
    /// Editable once the entry has left draft.
    pub edit: bool,
    /// Set by the system only.
    pub read_only: bool,
}

impl Predicate {
    fn base(name: &str, kind: PredicateKind) -> Self {
        let operators = match &kind {
            PredicateKind::Uid => Vec::new(),
            PredicateKind::String | PredicateKind::UniqueName | PredicateKind::ListString => {
                TEXT_OPERATORS.to_vec()
            }
            PredicateKind::Integer { .. } | PredicateKind::DateTime => ORDERED_OPERATORS.to_vec(),
            PredicateKind::Boolean
            | PredicateKind::SingleChoice(_)
            | PredicateKind::MultipleChoice(_) => EQ_OPERATORS.to_vec(),
            PredicateKind::Geo => vec![Operator::Has],
            PredicateKind::Relationship(_) => RELATIONSHIP_OPERATORS.to_vec(),
        };
        let overwrite = matches!(
            kind,
            PredicateKind::ListString
                | PredicateKind::MultipleChoice(_)
                | PredicateKind::Relationship(_)
        );
        Self {
            name: name.to_string(),
            kind,
            label: None,
            description: String::new(),
            required: false,
            queryable: false,
            operators,
            permission_new: UserRole::Contributor,
            permission_edit: UserRole::Contributor,
            overwrite,
            aliases: Vec::new(),
            default: None,
            facets: Vec::new(),
            new: true,
            edit: true,
            read_only: false,
        }
    }

    pub fn uid() -> Self {
        let mut p = Self::base("uid", PredicateKind::Uid);
        p.new = false;
        p.read_only = true;
        p
    }

    pub fn string(name: &str) -> Self {
        Self::base(name, PredicateKind::String)
    }

    pub fn unique_name(name: &str) -> Self {
        Self::base(name, PredicateKind::UniqueName)
    }

    pub fn list_string(name: &str) -> Self {
        Self::base(name, PredicateKind::ListString)
    }

    pub fn integer(name: &str) -> Self {
        Self::base(name, PredicateKind::Integer { min: None, max: None })
    }

    pub fn integer_in(name: &str, min: i64, max: i64) -> Self {
        Self::base(
            name,
            PredicateKind::Integer {
                min: Some(min),
                max: Some(max),
            },
        )
    }

    pub fn boolean(name: &str) -> Self {
        Self::base(name, PredicateKind::Boolean)
    }

    pub fn datetime(name: &str) -> Self {
        Self::base(name, PredicateKind::DateTime)
    }

    pub fn geo(name: &str) -> Self {
        Self::base(name, PredicateKind::Geo)
    }

    pub fn single_choice(name: &str, choices: &[(&str, &str)]) -> Self {
        Self::base(name, PredicateKind::SingleChoice(Choices::new(choices)))
    }

    pub fn multiple_choice(name: &str, choices: &[(&str, &str)]) -> Self {
        Self::base(name, PredicateKind::MultipleChoice(Choices::new(choices)))
    }

    fn relationship(
        name: &str,
        cardinality: Cardinality,
        direction: Direction,
        constraint: &[&str],
    ) -> Self {
        Self::base(
            name,
            PredicateKind::Relationship(Relationship {
                cardinality,
                direction,
                constraint: constraint.iter().map(|c| c.to_string()).collect(),
                allow_new: false,
            }),
        )
    }

    pub fn single_relationship(name: &str, constraint: &[&str]) -> Self {
        Self::relationship(name, Cardinality::Single, Direction::Forward, constraint)
    }

    pub fn list_relationship(name: &str, constraint: &[&str]) -> Self {
        Self::relationship(name, Cardinality::List, Direction::Forward, constraint)
    }

    /// `name` is the field on this side; `edge` is stored on the related nodes.
    pub fn reverse_list_relationship(name: &str, edge: &str, constraint: &[&str]) -> Self {
        Self::relationship(
            name,
            Cardinality::List,
            Direction::Reverse {
                edge: edge.to_string(),
            },
            constraint,
        )
    }

    pub fn mutual_list_relationship(name: &str, constraint: &[&str]) -> Self {
        Self::relationship(name, Cardinality::List, Direction::Mutual, constraint)
    }

    // --- declaration modifiers ---

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn queryable(mut self) -> Self {
        self.queryable = true;
        self
    }

    pub fn label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    /// Minimum role to set this predicate, on create and on edit.
    pub fn permission(mut self, role: UserRole) -> Self {
        self.permission_new = role;
        self.permission_edit = role;
        self
    }

    pub fn permission_edit(mut self, role: UserRole) -> Self {
        self.permission_edit = role;
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn alias(mut self, alias: &str) -> Self {
        self.aliases.push(alias.to_string());
        self
    }

    pub fn default_value(mut self, raw: Json) -> Self {
        self.default = Some(raw);
        self
    }

    pub fn facet(mut self, facet: Facet) -> Self {
        self.facets.push(facet);
        self
    }

    pub fn allow_new(mut self) -> Self {
        if let PredicateKind::Relationship(rel) = &mut self.kind {
            rel.allow_new = true;
        }
        self
    }

    /// Not offered when creating entries.
    pub fn not_new(mut self) -> Self {
        self.new = false;
        self
    }

    /// Frozen once the entry has left draft.
    pub fn not_edit(mut self) -> Self {
        self.edit = false;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    // --- introspection ---

    /// User facing label, derived from the name unless declared.
    pub fn display_label(&self) -> String {
        match &self.label {
            Some(l) => l.clone(),
            None => self
                .name
                .split('_')
                .filter(|w| !w.is_empty())
                .map(|w| {
                    let mut c = w.chars();
                    match c.next() {
                        Some(first) => first.to_uppercase().chain(c).collect(),
                        None => String::new(),
                    }
                })
                .collect::<Vec<String>>()
                .join(" "),
        }
    }

    pub fn class(&self) -> PredicateClass {
        match &self.kind {
            PredicateKind::ListString | PredicateKind::MultipleChoice(_) => {
                PredicateClass::ListScalar
            }
            PredicateKind::Relationship(rel) => match rel.direction {
                Direction::Reverse { .. } => PredicateClass::ReverseRelationship,
                _ => PredicateClass::Relationship,
            },
            _ => PredicateClass::Scalar,
        }
    }

    pub fn relationship_info(&self) -> Option<&Relationship> {
        match &self.kind {
            PredicateKind::Relationship(rel) => Some(rel),
            _ => None,
        }
    }

    pub fn is_relationship(&self) -> bool {
        self.relationship_info().is_some()
    }

    /// Holds several values at once.
    pub fn is_list(&self) -> bool {
        match &self.kind {
            PredicateKind::ListString | PredicateKind::MultipleChoice(_) => true,
            PredicateKind::Relationship(rel) => rel.cardinality == Cardinality::List,
            _ => false,
        }
    }

    /// The edge label this predicate is stored under.
    pub fn edge(&self) -> &str {
        match self.relationship_info().map(|r| &r.direction) {
            Some(Direction::Reverse { edge }) => edge,
            _ => &self.name,
        }
    }

    /// The name used in query filters.
    pub fn query_name(&self) -> String {
        match self.relationship_info().map(|r| &r.direction) {
            Some(Direction::Reverse { edge }) => format!("~{edge}"),
            _ => self.name.clone(),
        }
    }

    pub fn facet_named(&self, name: &str) -> Option<&Facet> {
        self.facets.iter().find(|f| f.name == name)
    }

    pub fn default_operator(&self) -> Option<Operator> {
        self.operators.first().copied()
    }

    // --- validation ---

    /// Turn raw input into operands. An empty result clears the field.
    pub fn validate(&self, raw: &Json) -> Result<Vec<Value>> {
        match &self.kind {
            PredicateKind::Uid => {
                let Some(token) = single_token(&self.name, raw)? else {
                    return Ok(Vec::new());
                };
                Uid::parse(&token)
                    .map(|uid| vec![Value::Existing(uid)])
                    .ok_or_else(|| InventoryError::invalid(&self.name, &token, "not a uid"))
            }
            PredicateKind::String => Ok(single_token(&self.name, raw)?
                .map(Value::text)
                .into_iter()
                .collect()),
            PredicateKind::UniqueName => Ok(single_token(&self.name, raw)?
                .map(|t| Value::text(t.to_lowercase()))
                .into_iter()
                .collect()),
            PredicateKind::ListString => Ok(dedup(tokens(raw, true))
                .into_iter()
                .map(Value::text)
                .collect()),
            PredicateKind::Integer { min, max } => {
                let Some(token) = single_token(&self.name, raw)? else {
                    return Ok(Vec::new());
                };
                let n: i64 = token
                    .parse()
                    .map_err(|_| InventoryError::invalid(&self.name, &token, "not an integer"))?;
                if min.is_some_and(|m| n < m) || max.is_some_and(|m| n > m) {
                    return Err(InventoryError::invalid(
                        &self.name,
                        n,
                        format!(
                            "out of range [{}, {}]",
                            min.map(|m| m.to_string()).unwrap_or_default(),
                            max.map(|m| m.to_string()).unwrap_or_default()
                        ),
                    ));
                }
                Ok(vec![Value::Literal(Scalar::Int(n))])
            }
            PredicateKind::Boolean => {
                let b = match raw {
                    Json::Bool(b) => *b,
                    Json::Number(n) => n.as_f64().is_some_and(|f| f > 0.0),
                    _ => match single_token(&self.name, raw)? {
                        Some(token) => parse_bool(&self.name, &token)?,
                        None => return Ok(Vec::new()),
                    },
                };
                Ok(vec![Value::Literal(Scalar::Bool(b))])
            }
            PredicateKind::DateTime => {
                let Some(token) = single_token(&self.name, raw)? else {
                    return Ok(Vec::new());
                };
                let dt = checked_datetime(&self.name, &token)?;
                Ok(vec![Value::Literal(Scalar::DateTime(dt))])
            }
            PredicateKind::Geo => {
                Ok(parse_geo(&self.name, raw)?.map(Value::Geo).into_iter().collect())
            }
            PredicateKind::SingleChoice(choices) => {
                let Some(token) = single_token(&self.name, raw)? else {
                    return Ok(Vec::new());
                };
                self.check_choice(choices, &token)?;
                Ok(vec![Value::text(token)])
            }
            PredicateKind::MultipleChoice(choices) => {
                let items = dedup(tokens(raw, true));
                if items.iter().any(|t| t == NA) {
                    return Ok(Vec::new());
                }
                items
                    .into_iter()
                    .map(|t| {
                        self.check_choice(choices, &t)?;
                        Ok(Value::text(t))
                    })
                    .collect()
            }
            PredicateKind::Relationship(rel) => {
                let items = dedup(tokens(raw, rel.cardinality == Cardinality::List));
                if rel.cardinality == Cardinality::Single && items.len() > 1 {
                    return Err(InventoryError::invalid(
                        &self.name,
                        items.join(", "),
                        "expects a single value",
                    ));
                }
                items
                    .into_iter()
                    .map(|t| self.relationship_token(rel, &t))
                    .collect()
            }
        }
    }

    /// Inverse of `validate`: the raw input that validates back to `values`.
    pub fn serialize(&self, values: &[Value]) -> Json {
        if self.is_list() {
            Json::Array(values.iter().map(Value::raw).collect())
        } else {
            values.first().map(Value::raw).unwrap_or(Json::Null)
        }
    }

    fn relationship_token(&self, rel: &Relationship, token: &str) -> Result<Value> {
        if let Some(uid) = Uid::parse(token) {
            return Ok(Value::Existing(uid));
        }
        if !rel.allow_new {
            return Err(InventoryError::invalid(
                &self.name,
                token,
                "not a uid and new entries are not allowed here",
            ));
        }
        Ok(Value::New(NewId::from_label(token)))
    }

    fn check_choice(&self, choices: &Choices, token: &str) -> Result<()> {
        if choices.contains(token) {
            Ok(())
        } else {
            Err(InventoryError::invalid(
                &self.name,
                token,
                format!("has to be one of {}", choices.values().join(", ")),
            ))
        }
    }

    /// A relationship target must exist and carry one of the constrained types.
    pub fn check_target(&self, uid: &Uid, found_types: &[String]) -> Result<()> {
        self.check_target_types(&format!("uid <{uid}>"), found_types)
    }

    /// Same check for a target known only by its types, e.g. a satellite
    /// that is created in the same mutation. `target` names it in the error.
    pub fn check_target_types(&self, target: &str, found_types: &[String]) -> Result<()> {
        let Some(rel) = self.relationship_info() else {
            return Ok(());
        };
        if found_types.is_empty() {
            return Err(InventoryError::constraint(
                &self.name,
                format!("{target} does not exist"),
            ));
        }
        if rel.constraint.is_empty() || found_types.iter().any(|t| rel.constraint.contains(t)) {
            Ok(())
        } else {
            Err(InventoryError::constraint(
                &self.name,
                format!(
                    "{target} is a {} but has to be a {}",
                    found_types.join("/"),
                    rel.constraint.join(" or ")
                ),
            ))
        }
    }

    // --- query filters ---

    /// Filter fragment for `values`, OR-ed across aliases. Values that do not
    /// fit the predicate are dropped; `None` if nothing usable remains.
    pub fn query_filter(
        &self,
        values: &[String],
        operator: Option<Operator>,
        connector: Option<Connector>,
    ) -> Option<Filter> {
        let default = self.default_operator()?;
        let op = match operator {
            Some(op) if self.operators.contains(&op) => op,
            Some(op) => {
                debug!(predicate = %self.name, operator = op.as_str(), "Operator not allowed, using default");
                default
            }
            None => default,
        };
        let connector = connector.unwrap_or(if self.is_list() {
            Connector::And
        } else {
            Connector::Or
        });

        let mut names = vec![self.query_name()];
        names.extend(self.aliases.iter().cloned());

        let per_name: Vec<Filter> = names
            .iter()
            .filter_map(|name| {
                if op == Operator::Has {
                    return Some(Filter::has(name));
                }
                let parts: Vec<Filter> = values
                    .iter()
                    .filter_map(|v| self.value_filter(name, op, v))
                    .collect();
                Filter::combine(parts, connector)
            })
            .collect();
        Filter::any(per_name)
    }

    fn value_filter(&self, name: &str, op: Operator, value: &str) -> Option<Filter> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        match &self.kind {
            PredicateKind::Uid | PredicateKind::Geo => None,
            PredicateKind::Relationship(_) => {
                Uid::parse(value).map(|uid| Filter::op(op, name, Arg::Uid(uid)))
            }
            PredicateKind::String | PredicateKind::UniqueName | PredicateKind::ListString => {
                let arg = match op {
                    Operator::Regexp => Arg::Regex(value.to_string()),
                    _ => Arg::Text(value.to_string()),
                };
                Some(Filter::op(op, name, arg))
            }
            PredicateKind::SingleChoice(choices) | PredicateKind::MultipleChoice(choices) => {
                if !choices.contains(value) {
                    return None;
                }
                Some(Filter::op(op, name, Arg::Text(value.to_string())))
            }
            PredicateKind::Integer { .. } => {
                let n: i64 = value.parse().ok()?;
                Some(Filter::op(op, name, Arg::Number(n.to_string())))
            }
            PredicateKind::Boolean => {
                let b = parse_bool(name, value).ok()?;
                Some(Filter::op(op, name, Arg::Number(b.to_string())))
            }
            PredicateKind::DateTime => date_filter(name, op, value),
        }
    }
}

/// Year-only values cover the whole year.
fn date_filter(name: &str, op: Operator, value: &str) -> Option<Filter> {
    let start = parse_datetime(value)?;
    let is_year = value.len() == 4 && value.chars().all(|c| c.is_ascii_digit());
    if !is_year {
        return Some(Filter::op(op, name, Arg::Text(canonical_datetime(&start))));
    }
    let year: i32 = value.parse().ok()?;
    let next = parse_datetime(&format!("{:04}", year + 1))?;
    let start_arg = || Arg::Text(canonical_datetime(&start));
    let next_arg = || Arg::Text(canonical_datetime(&next));
    Some(match op {
        Operator::Eq => Filter::And(vec![
            Filter::op(Operator::Ge, name, start_arg()),
            Filter::op(Operator::Lt, name, next_arg()),
        ]),
        Operator::Gt => Filter::op(Operator::Ge, name, next_arg()),
        Operator::Le => Filter::op(Operator::Lt, name, next_arg()),
        other => Filter::op(other, name, start_arg()),
    })
}

// --- raw input helpers ---

fn json_token(v: &Json) -> Option<String> {
    match v {
        Json::String(s) => Some(s.clone()),
        Json::Number(n) => Some(n.to_string()),
        Json::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Trimmed, non-empty tokens. Strings are comma-split when `split` is set.
fn tokens(raw: &Json, split: bool) -> Vec<String> {
    let items: Vec<String> = match raw {
        Json::Array(items) => items.iter().filter_map(json_token).collect(),
        Json::String(s) if split => s.split(',').map(str::to_string).collect(),
        other => json_token(other).into_iter().collect(),
    };
    items
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

fn single_token(predicate: &str, raw: &Json) -> Result<Option<String>> {
    let mut items = tokens(raw, false);
    if items.len() > 1 {
        return Err(InventoryError::invalid(
            predicate,
            items.join(", "),
            "expects a single value",
        ));
    }
    Ok(items.pop())
}

fn dedup(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

fn parse_bool(predicate: &str, token: &str) -> Result<bool> {
    match token.trim().to_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" | "on" => Ok(true),
        "false" | "f" | "no" | "n" | "0" | "off" => Ok(false),
        _ => Err(InventoryError::invalid(predicate, token, "not a boolean")),
    }
}

fn checked_datetime(predicate: &str, token: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    use chrono::Datelike;

    let dt = parse_datetime(token)
        .ok_or_else(|| InventoryError::invalid(predicate, token, "cannot parse date"))?;
    if dt.year() < MIN_YEAR || dt.year() > MAX_YEAR {
        return Err(InventoryError::invalid(
            predicate,
            token,
            format!("year outside [{MIN_YEAR}, {MAX_YEAR}]"),
        ));
    }
    Ok(dt)
}

/// Accepts `{"lat", "lon"}`, GeoJSON points and `[lon, lat]` pairs.
fn parse_geo(predicate: &str, raw: &Json) -> Result<Option<GeoPoint>> {
    let pair = match raw {
        Json::Null => return Ok(None),
        Json::Object(map) if map.contains_key("coordinates") => map
            .get("coordinates")
            .and_then(Json::as_array)
            .and_then(|c| Some((c.first()?.as_f64()?, c.get(1)?.as_f64()?))),
        Json::Object(map) => map
            .get("lon")
            .and_then(Json::as_f64)
            .zip(map.get("lat").and_then(Json::as_f64)),
        Json::Array(c) if c.len() == 2 => c[0].as_f64().zip(c[1].as_f64()),
        _ => None,
    };
    match pair {
        Some((lon, lat)) if (-180.0..=180.0).contains(&lon) && (-90.0..=90.0).contains(&lat) => {
            Ok(Some(GeoPoint::new(lon, lat)))
        }
        _ => Err(InventoryError::invalid(predicate, raw, "not a point geometry")),
    }
}

/// Tokens of a filter/entry value that is either a string or a list.
pub fn raw_tokens(raw: &Json) -> Vec<String> {
    tokens(raw, false)
}
