//! Statement operands: node references, blank-node placeholders, literals,
//! geo points and query-bound variables.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, SecondsFormat, TimeZone, Utc};
use regex::Regex;
use serde_json::json;
use uuid::Uuid;

use crate::dql::quote;

static UID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^0x[0-9a-fA-F]+$").unwrap());

/// Returns the normalized uid if `s` looks like a node identifier.
pub fn validate_uid(s: &str) -> Option<String> {
    let s = s.trim();
    if UID_RE.is_match(s) {
        Some(s.to_lowercase())
    } else {
        None
    }
}

/// Lowercase ASCII slug with `_` separators. Common Latin diacritics are folded.
pub fn slugify(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_sep = false;
    for c in s.chars().flat_map(|c| c.to_lowercase()) {
        let folded: &str = match c {
            'ä' | 'á' | 'à' | 'â' | 'ã' | 'å' => "a",
            'ö' | 'ó' | 'ò' | 'ô' | 'õ' | 'ø' => "o",
            'ü' | 'ú' | 'ù' | 'û' => "u",
            'é' | 'è' | 'ê' | 'ë' => "e",
            'í' | 'ì' | 'î' | 'ï' => "i",
            'ß' => "ss",
            'ç' => "c",
            'ñ' => "n",
            _ if c.is_ascii_alphanumeric() => {
                if pending_sep && !out.is_empty() {
                    out.push('_');
                }
                pending_sep = false;
                out.push(c);
                continue;
            }
            _ => {
                pending_sep = true;
                continue;
            }
        };
        if pending_sep && !out.is_empty() {
            out.push('_');
        }
        pending_sep = false;
        out.push_str(folded);
    }
    out
}

/// Canonical text form for timestamps stored in the graph.
pub fn canonical_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse a year (`2010`), a date (`2010-05-01`) or an RFC 3339 timestamp.
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.len() == 4 && s.chars().all(|c| c.is_ascii_digit()) {
        let year: i32 = s.parse().ok()?;
        return Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).single();
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d.and_hms_opt(0, 0, 0)?.and_utc());
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.and_utc());
    }
    None
}

// --- Node references ---

/// An already-persisted node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uid(String);

impl Uid {
    pub fn parse(s: &str) -> Option<Self> {
        validate_uid(s).map(Uid)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn nquad(&self) -> String {
        format!("<{}>", self.0)
    }
}

impl std::fmt::Display for Uid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Blank-node placeholder for a node created in the same transaction.
///
/// Derived from a human label so every mention of the same label inside one
/// submission lands on the same node. Equality ignores the original label.
#[derive(Debug, Clone)]
pub struct NewId {
    id: String,
    original: Option<String>,
}

impl NewId {
    /// `_:`-prefixed input is taken as-is, anything else is slugified.
    pub fn from_label(label: &str) -> Self {
        let label = label.trim();
        if let Some(id) = label.strip_prefix("_:") {
            let id = slugify(id);
            if !id.is_empty() {
                return Self { id, original: None };
            }
        }
        let slug = slugify(label);
        let id = if slug.is_empty() {
            format!("new_{}", Uuid::new_v4().simple())
        } else {
            slug
        };
        Self {
            id,
            original: Some(label.to_string()),
        }
    }

    /// A placeholder that cannot collide with any label-derived one.
    pub fn fresh() -> Self {
        Self {
            id: format!("new_{}", Uuid::new_v4().simple()),
            original: None,
        }
    }

    /// The identifier without the `_:` prefix.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn original_label(&self) -> Option<&str> {
        self.original.as_deref()
    }

    pub fn nquad(&self) -> String {
        format!("_:{}", self.id)
    }
}

impl PartialEq for NewId {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for NewId {}

impl std::hash::Hash for NewId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Display for NewId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "_:{}", self.id)
    }
}

/// A set of node ids bound by a block in the upsert prelude.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Variable {
    pub name: String,
    /// Render as `val(name)` instead of `uid(name)`.
    pub val: bool,
}

impl Variable {
    pub fn uid(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            val: false,
        }
    }

    pub fn nquad(&self) -> String {
        if self.val {
            format!("val({})", self.name)
        } else {
            format!("uid({})", self.name)
        }
    }
}

// --- Literals ---

#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    DateTime(DateTime<Utc>),
}

impl Scalar {
    pub fn text(s: impl Into<String>) -> Self {
        Scalar::Text(s.into().trim().to_string())
    }

    /// The canonical text form; also the raw input that validates back to `self`.
    pub fn canonical(&self) -> String {
        match self {
            Scalar::Text(s) => s.clone(),
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Bool(b) => b.to_string(),
            Scalar::DateTime(dt) => canonical_datetime(dt),
        }
    }

    pub fn nquad(&self) -> String {
        quote(&self.canonical())
    }
}

/// Point geometry. The store expects longitude first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
}

impl GeoPoint {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    pub fn geojson(&self) -> serde_json::Value {
        json!({ "type": "Point", "coordinates": [self.lon, self.lat] })
    }

    pub fn nquad(&self) -> String {
        format!("{}^^<geo:geojson>", quote(&self.geojson().to_string()))
    }
}

// --- Facets ---

#[derive(Debug, Clone, PartialEq)]
pub enum FacetValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    DateTime(DateTime<Utc>),
}

impl FacetValue {
    pub fn nquad(&self) -> String {
        match self {
            FacetValue::Text(s) => quote(s),
            FacetValue::Int(i) => i.to_string(),
            FacetValue::Float(f) => f.to_string(),
            FacetValue::Bool(b) => b.to_string(),
            FacetValue::DateTime(dt) => canonical_datetime(dt),
        }
    }
}

/// Edge metadata in insertion order. Keys come from registered facet
/// declarations or fixed submission metadata, never from raw input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Facets(Vec<(String, FacetValue)>);

impl Facets {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn with(mut self, key: &str, value: FacetValue) -> Self {
        self.insert(key, value);
        self
    }

    /// Replaces an existing key in place.
    pub fn insert(&mut self, key: &str, value: FacetValue) {
        match self.0.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key.to_string(), value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&FacetValue> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, FacetValue)> {
        self.0.iter()
    }

    /// ` (k=v, k2=v2)` or nothing.
    pub fn nquad(&self) -> String {
        if self.0.is_empty() {
            return String::new();
        }
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(k, v)| format!("{k}={}", v.nquad()))
            .collect();
        format!(" ({})", parts.join(", "))
    }
}

// --- Operands ---

/// Anything that can stand in the object position of a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Existing(Uid),
    New(NewId),
    Literal(Scalar),
    Geo(GeoPoint),
    Var(Variable),
    /// `*`, only meaningful in delete statements.
    Wildcard,
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Literal(Scalar::text(s))
    }

    pub fn nquad(&self) -> String {
        match self {
            Value::Existing(uid) => uid.nquad(),
            Value::New(id) => id.nquad(),
            Value::Literal(s) => s.nquad(),
            Value::Geo(g) => g.nquad(),
            Value::Var(v) => v.nquad(),
            Value::Wildcard => "*".to_string(),
        }
    }

    /// Raw input form: validating it again yields the same value.
    pub fn raw(&self) -> serde_json::Value {
        match self {
            Value::Existing(uid) => json!(uid.as_str()),
            Value::New(id) => json!(id.to_string()),
            Value::Literal(s) => json!(s.canonical()),
            Value::Geo(g) => g.geojson(),
            Value::Var(v) => json!(v.nquad()),
            Value::Wildcard => json!("*"),
        }
    }

    /// Canonical text of a literal.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Literal(s) => Some(s.canonical()),
            _ => None,
        }
    }

    pub fn as_subject(&self) -> Option<Subject> {
        match self {
            Value::Existing(uid) => Some(Subject::Existing(uid.clone())),
            Value::New(id) => Some(Subject::New(id.clone())),
            Value::Var(v) => Some(Subject::Var(v.clone())),
            _ => None,
        }
    }
}

/// An object together with the facets on its edge.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    pub value: Value,
    pub facets: Facets,
}

impl Object {
    pub fn with_facets(value: Value, facets: Facets) -> Self {
        Self { value, facets }
    }
}

impl From<Value> for Object {
    fn from(value: Value) -> Self {
        Self {
            value,
            facets: Facets::new(),
        }
    }
}

/// Statement subjects: only nodes (or node sets) can own edges.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Subject {
    Existing(Uid),
    New(NewId),
    Var(Variable),
}

impl Subject {
    pub fn nquad(&self) -> String {
        match self {
            Subject::Existing(uid) => uid.nquad(),
            Subject::New(id) => id.nquad(),
            Subject::Var(v) => v.nquad(),
        }
    }

    pub fn as_value(&self) -> Value {
        match self {
            Subject::Existing(uid) => Value::Existing(uid.clone()),
            Subject::New(id) => Value::New(id.clone()),
            Subject::Var(v) => Value::Var(v.clone()),
        }
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.nquad())
    }
}
