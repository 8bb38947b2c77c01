//! Filter compiler: turns a flat filter map into one paginated query with a
//! total count, plus a `total_<predicate>` count per facet-filtered predicate.
//!
//! Recognised keys:
//! - `_max_results`, `_page`: pagination
//! - `_terms`: free-text search, bound as `$search_terms`
//! - `dgraph.type`: restrict to registered entity types
//! - `<predicate>`: one or more values for a queryable predicate
//! - `<predicate>*operator`, `<predicate>*connector`: modifiers for the above
//! - `<predicate>|<facet>` and `<predicate>|<facet>*operator`: facet filters
//!
//! Everything else is dropped. Only registered names ever reach the query text.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value as Json;
use tracing::debug;

use crate::dql::{Arg, Block, Connector, Filter, Operator, Order, Query, Selection, push_unique};
use crate::predicate::{raw_tokens, Predicate};
use crate::schema::Schema;

pub const DEFAULT_PAGE_SIZE: u32 = 25;
pub const MAX_PAGE_SIZE: u32 = 50;

pub const MAX_RESULTS_KEY: &str = "_max_results";
pub const PAGE_KEY: &str = "_page";
pub const TERMS_KEY: &str = "_terms";
pub const TYPE_KEY: &str = "dgraph.type";

const SEARCH_PARAM: &str = "search_terms";
const FILTERED_VAR: &str = "filtered";

/// Matched term-wise against the search terms.
const SEARCH_TERM_PREDICATES: &[&str] = &["name", "other_names", "title", "authors"];
/// Matched exactly against the search terms.
const SEARCH_EXACT_PREDICATES: &[&str] = &["doi", "arxiv"];
/// Always part of the projection.
const ALWAYS_NESTED: &[&str] = &["country", "channel"];

/// Filter key to raw values, as parsed from form data or a JSON body.
pub type FilterMap = BTreeMap<String, Vec<String>>;

/// Builds a filter map from a JSON object. Lists become multiple values.
pub fn filter_map_from_json(raw: &Json) -> FilterMap {
    let Some(obj) = raw.as_object() else {
        return FilterMap::new();
    };
    obj.iter()
        .map(|(k, v)| (k.clone(), raw_tokens(v)))
        .filter(|(_, v)| !v.is_empty())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledQuery {
    pub text: String,
    /// Bound query variables, keyed with their `$` prefix.
    pub variables: BTreeMap<String, String>,
    pub page_size: u32,
    pub page: u32,
}

/// Compiles `filters` into a count + page query. `None` when nothing in the
/// map restricts the result.
pub fn compile(schema: &Schema, filters: &FilterMap, public: bool) -> Option<CompiledQuery> {
    let page_size = page_size(filters);
    let page = first(filters, PAGE_KEY)
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(0);

    let mut restrictions: Vec<Filter> = Vec::new();
    let mut variables = BTreeMap::new();

    let terms = filters
        .get(TERMS_KEY)
        .map(|v| v.join(" ").trim().to_string())
        .filter(|t| !t.is_empty());
    if let Some(terms) = &terms {
        variables.insert(format!("${SEARCH_PARAM}"), terms.clone());
        restrictions.extend(search_filter());
    }

    if let Some(types) = filters.get(TYPE_KEY) {
        let mut names: Vec<&str> = Vec::new();
        for t in types {
            match schema.get_type(t) {
                Some(def) if !names.contains(&def.name.as_str()) => names.push(&def.name),
                Some(_) => {}
                None => debug!(entity_type = %t, "Dropping unknown type filter"),
            }
        }
        restrictions.extend(Filter::any(names.into_iter().map(Filter::type_of).collect()));
    }

    let facets = facet_filters(schema, filters);

    let mut projection: Vec<Selection> = ["uid", "unique_name", "name", "dgraph.type"]
        .into_iter()
        .map(Selection::field)
        .collect();
    let mut var_body: Vec<Selection> = Vec::new();
    let mut cascade: Vec<String> = Vec::new();
    let mut facet_totals: Vec<Block> = Vec::new();

    for (key, values) in filters {
        if key.starts_with('_') || key == TYPE_KEY || key.contains('*') || key.contains('|') {
            continue;
        }
        let Some(predicate) = schema.queryable(key) else {
            debug!(key = %key, "Dropping filter on unknown predicate");
            continue;
        };
        let operator = modifier(filters, key, "operator").and_then(|op| {
            op.parse::<Operator>()
                .inspect_err(|_| debug!(key = %key, operator = %op, "Unknown operator, using default"))
                .ok()
        });
        let connector = modifier(filters, key, "connector").and_then(|c| c.parse::<Connector>().ok());
        match predicate.query_filter(values, operator, connector) {
            Some(f) => {
                restrictions.push(f);
                let keys = facets.get(predicate.name.as_str()).map(|f| f.keys.clone());
                push_unique(&mut projection, project(predicate, keys.unwrap_or_default()));
            }
            None => debug!(key = %key, "No usable values, dropping filter"),
        }
    }

    for (name, facet) in &facets {
        let Some(predicate) = schema.predicate(name) else {
            continue;
        };
        if !is_projected(&projection, &predicate.query_name()) {
            restrictions.push(Filter::has(&predicate.query_name()));
            push_unique(&mut projection, project(predicate, facet.keys.clone()));
        }
        var_body.push(Selection::Edge {
            predicate: predicate.query_name(),
            facet_filter: Filter::all(facet.filters.clone()),
            facet_keys: Vec::new(),
            children: if predicate.is_relationship() {
                vec![Selection::field("uid")]
            } else {
                Vec::new()
            },
        });
        cascade.push(predicate.query_name());

        let mut count = Block::new(
            &format!("total_{}", predicate.name),
            Filter::uid_var(FILTERED_VAR),
        );
        count.filter = Some(Filter::has(&predicate.query_name()));
        count.body = vec![Selection::Count("uid".to_string())];
        facet_totals.push(count);
    }

    if restrictions.is_empty() {
        debug!("Filter map has no usable restriction");
        return None;
    }
    if public {
        restrictions.push(Filter::op(
            Operator::Eq,
            "entry_review_status",
            Arg::Text("accepted".to_string()),
        ));
    }

    for nested in ALWAYS_NESTED {
        push_unique(
            &mut projection,
            Selection::nested(nested, &["uid", "name", "unique_name"]),
        );
    }

    let mut filtered = Block::var(FILTERED_VAR, Filter::has(TYPE_KEY));
    filtered.filter = Filter::all(restrictions);
    filtered.cascade = (!cascade.is_empty()).then_some(cascade);
    filtered.body = var_body;

    let mut total = Block::new("total", Filter::uid_var(FILTERED_VAR));
    total.body = vec![Selection::Count("uid".to_string())];

    let mut results = Block::new("q", Filter::uid_var(FILTERED_VAR));
    results.order = Some((Order::Asc, "name".to_string()));
    results.first = Some(page_size);
    results.offset = Some(page.saturating_mul(page_size));
    results.body = projection;

    let mut query = Query::new("filtered");
    if terms.is_some() {
        query = query.param(SEARCH_PARAM, "string");
    }
    query = query.block(filtered).block(total);
    for count in facet_totals {
        query = query.block(count);
    }
    let text = query.block(results).render();
    debug!(query = %text, "Compiled filter query");

    Some(CompiledQuery {
        text,
        variables,
        page_size,
        page,
    })
}

fn first<'a>(filters: &'a FilterMap, key: &str) -> Option<&'a str> {
    filters.get(key).and_then(|v| v.first()).map(String::as_str)
}

fn modifier<'a>(filters: &'a FilterMap, key: &str, kind: &str) -> Option<&'a str> {
    first(filters, &format!("{key}*{kind}"))
}

fn page_size(filters: &FilterMap) -> u32 {
    first(filters, MAX_RESULTS_KEY)
        .and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|n| *n > 0)
        .map(|n| n.min(i64::from(MAX_PAGE_SIZE)) as u32)
        .unwrap_or(DEFAULT_PAGE_SIZE)
}

fn search_filter() -> Option<Filter> {
    let param = || Arg::Param(SEARCH_PARAM.to_string());
    let terms = SEARCH_TERM_PREDICATES
        .iter()
        .map(|p| Filter::op(Operator::AnyOfTerms, p, param()));
    let exact = SEARCH_EXACT_PREDICATES
        .iter()
        .map(|p| Filter::op(Operator::Eq, p, param()));
    Filter::any(terms.chain(exact).collect())
}

#[derive(Debug, Default)]
struct FacetFilters {
    filters: Vec<Filter>,
    keys: Vec<String>,
}

/// `predicate|facet` keys grouped by parent predicate.
fn facet_filters<'a>(schema: &'a Schema, filters: &FilterMap) -> BTreeMap<&'a str, FacetFilters> {
    let mut out: BTreeMap<&str, FacetFilters> = BTreeMap::new();
    for (key, values) in filters {
        if key.contains('*') {
            continue;
        }
        let Some((parent, facet_name)) = key.split_once('|') else {
            continue;
        };
        let Some((predicate, facet)) = schema.queryable_facet(parent, facet_name) else {
            debug!(key = %key, "Dropping filter on unknown facet");
            continue;
        };
        let operator = modifier(filters, key, "operator").and_then(|op| op.parse::<Operator>().ok());
        let parts: Vec<Filter> = values
            .iter()
            .filter_map(|v| facet.query_filter(v, operator))
            .collect();
        let Some(f) = Filter::all(parts) else {
            debug!(key = %key, "No usable facet values, dropping filter");
            continue;
        };
        let entry = out.entry(predicate.name.as_str()).or_default();
        entry.filters.push(f);
        if !entry.keys.contains(&facet.name) {
            entry.keys.push(facet.name.clone());
        }
    }
    out
}

fn is_projected(projection: &[Selection], predicate: &str) -> bool {
    projection.iter().any(|s| match s {
        Selection::Field(p) => p == predicate,
        Selection::Edge { predicate: p, .. } => p == predicate,
        _ => false,
    })
}

/// Projection entry for a filtered predicate: relationships are expanded
/// one level.
fn project(predicate: &Predicate, facet_keys: Vec<String>) -> Selection {
    let children = if predicate.is_relationship() {
        ["uid", "name", "unique_name"]
            .into_iter()
            .map(Selection::field)
            .collect()
    } else {
        Vec::new()
    };
    if children.is_empty() && facet_keys.is_empty() {
        return Selection::field(&predicate.query_name());
    }
    Selection::Edge {
        predicate: predicate.query_name(),
        facet_filter: None,
        facet_keys,
        children,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::inventory_schema;

    fn filters(pairs: &[(&str, &[&str])]) -> FilterMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    const ACCEPTED: &str = r#"eq(entry_review_status, "accepted")"#;

    #[test]
    fn empty_and_unknown_filters_are_a_no_op() {
        let schema = inventory_schema().unwrap();
        assert!(compile(&schema, &FilterMap::new(), true).is_none());
        assert!(compile(&schema, &filters(&[("password", &["x"]), ("_page", &["2"])]), true).is_none());
        assert!(compile(&schema, &filters(&[("languages", &["xx"])]), true).is_none());
    }

    #[test]
    fn languages_and_channel_produce_count_and_page() {
        let schema = inventory_schema().unwrap();
        let q = compile(
            &schema,
            &filters(&[("languages", &["de"]), ("channel", &["0x1a"])]),
            true,
        )
        .unwrap();
        assert!(q.text.contains("total(func: uid(filtered)) {"));
        assert!(q.text.contains("count(uid)"));
        assert!(q.text.contains("q(func: uid(filtered), orderasc: name, first: 25, offset: 0)"));
        assert!(q.text.contains(r#"eq(languages, "de")"#));
        assert!(q.text.contains("uid_in(channel, 0x1a)"));
        assert_eq!(q.page_size, 25);
    }

    #[test]
    fn public_mode_adds_the_accepted_filter_once() {
        let schema = inventory_schema().unwrap();
        let map = filters(&[("languages", &["de"]), ("payment_model", &["free"])]);
        let public = compile(&schema, &map, true).unwrap();
        assert_eq!(public.text.matches(ACCEPTED).count(), 1);
        let private = compile(&schema, &map, false).unwrap();
        assert_eq!(private.text.matches(ACCEPTED).count(), 0);
    }

    #[test]
    fn connector_and_requires_every_language() {
        let schema = inventory_schema().unwrap();
        let q = compile(
            &schema,
            &filters(&[("languages", &["de", "en"]), ("languages*connector", &["AND"])]),
            false,
        )
        .unwrap();
        assert!(q
            .text
            .contains(r#"(eq(languages, "de") AND eq(languages, "en"))"#));
    }

    #[test]
    fn scalar_values_are_ored() {
        let schema = inventory_schema().unwrap();
        let q = compile(
            &schema,
            &filters(&[("payment_model", &["free", "partly free"])]),
            false,
        )
        .unwrap();
        assert!(q
            .text
            .contains(r#"(eq(payment_model, "free") OR eq(payment_model, "partly free"))"#));
    }

    #[test]
    fn page_size_is_clamped() {
        let schema = inventory_schema().unwrap();
        let size = |raw: &str| {
            compile(
                &schema,
                &filters(&[("languages", &["de"]), ("_max_results", &[raw])]),
                true,
            )
            .unwrap()
            .page_size
        };
        assert_eq!(size("10"), 10);
        assert_eq!(size("500"), 50);
        assert_eq!(size("0"), 25);
        assert_eq!(size("-4"), 25);
        assert_eq!(size("lots"), 25);
    }

    #[test]
    fn page_sets_the_offset() {
        let schema = inventory_schema().unwrap();
        let q = compile(
            &schema,
            &filters(&[("languages", &["de"]), ("_page", &["2"]), ("_max_results", &["10"])]),
            true,
        )
        .unwrap();
        assert!(q.text.contains("first: 10, offset: 20"));
    }

    #[test]
    fn search_terms_are_bound_not_interpolated() {
        let schema = inventory_schema().unwrap();
        let terms = r#"derstandard") OR has(email"#;
        let q = compile(&schema, &filters(&[("_terms", &[terms])]), true).unwrap();
        assert!(!q.text.contains("has(email"));
        assert!(q.text.starts_with("query filtered($search_terms: string) {"));
        assert!(q.text.contains("anyofterms(name, $search_terms)"));
        assert!(q.text.contains("eq(doi, $search_terms)"));
        assert_eq!(q.variables.get("$search_terms").map(String::as_str), Some(terms));
    }

    #[test]
    fn type_filter_only_accepts_registered_types() {
        let schema = inventory_schema().unwrap();
        let q = compile(
            &schema,
            &filters(&[("dgraph.type", &["source", "User", "Organization"])]),
            false,
        )
        .unwrap();
        assert!(q.text.contains(r#"(type("Source") OR type("Organization"))"#));
        assert!(!q.text.contains("User"));
    }

    #[test]
    fn injected_keys_never_reach_the_query() {
        let schema = inventory_schema().unwrap();
        let q = compile(
            &schema,
            &filters(&[("name) { uid }", &["x"]), ("languages", &["de"])]),
            false,
        )
        .unwrap();
        assert!(!q.text.contains("{ uid }"));
    }

    #[test]
    fn facet_filters_cascade_on_their_parent() {
        let schema = inventory_schema().unwrap();
        let q = compile(
            &schema,
            &filters(&[
                ("audience_size|count", &["10000"]),
                ("audience_size|count*operator", &["gt"]),
            ]),
            false,
        )
        .unwrap();
        assert!(q.text.contains("has(audience_size)"));
        assert!(q.text.contains("@cascade(audience_size)"));
        assert!(q.text.contains("audience_size @facets(gt(count, 10000))"));
        assert!(q.text.contains("audience_size @facets(count)"));
        assert!(q.text.contains(
            "  total_audience_size(func: uid(filtered)) @filter(has(audience_size)) {\n    count(uid)\n  }\n"
        ));
    }

    #[test]
    fn operator_override_and_fallback() {
        let schema = inventory_schema().unwrap();
        let q = compile(
            &schema,
            &filters(&[("founded", &["2000"]), ("founded*operator", &["lt"])]),
            false,
        )
        .unwrap();
        assert!(q.text.contains(r#"lt(founded, "2000-01-01T00:00:00Z")"#));

        let q = compile(
            &schema,
            &filters(&[("languages", &["de"]), ("languages*operator", &["between"])]),
            false,
        )
        .unwrap();
        assert!(q.text.contains(r#"eq(languages, "de")"#));
    }

    #[test]
    fn relationships_and_defaults_are_projected() {
        let schema = inventory_schema().unwrap();
        let q = compile(&schema, &filters(&[("related", &["0x2"])]), false).unwrap();
        assert!(q.text.contains("related {"));
        assert!(q.text.contains("country {"));
        assert!(q.text.contains("channel {"));
    }

    #[test]
    fn json_filter_maps_accept_strings_and_lists() {
        let map = filter_map_from_json(&serde_json::json!({
            "languages": ["de", "en"],
            "payment_model": "free",
            "_max_results": 10,
            "empty": []
        }));
        assert_eq!(map["languages"], vec!["de", "en"]);
        assert_eq!(map["_max_results"], vec!["10"]);
        assert!(!map.contains_key("empty"));
    }
}
