//! Submissions end to end: form → sanitizer → mutation → mock store.
//!
//! Run with: cargo test -p inventory-graph --test submission_test

use std::sync::Arc;

use serde_json::json;

use inventory_common::{InventoryError, ReviewStatus, UserRole};
use inventory_graph::mutation::NQuad;
use inventory_graph::related::RelatedEntity;
use inventory_graph::testing::{form, FailingResolver, Harness};
use inventory_graph::value::Uid;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn channel(h: &Harness) -> Uid {
    h.store.add_entry("Channel", "instagram", None)
}

async fn submit_source(h: &Harness, name: &str, extra: serde_json::Value) -> Uid {
    let mut data = json!({ "name": name, "channel": channel(h).as_str() });
    if let (Some(data), Some(extra)) = (data.as_object_mut(), extra.as_object()) {
        data.extend(extra.clone());
    }
    h.submit("Source", data, &h.ctx(UserRole::Contributor))
        .await
        .expect("submission succeeds")
}

fn rendered(quads: &[NQuad]) -> Vec<String> {
    quads.iter().map(NQuad::render).collect()
}

// ---------------------------------------------------------------------------
// New entries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn new_source_is_stored_pending_with_its_lineage() {
    let h = Harness::new();
    let uid = submit_source(&h, "Der Standard", json!({ "languages": ["de"] })).await;

    let node = h.store.node(&uid).unwrap();
    assert_eq!(node.types, vec!["Source".to_string(), "Entry".to_string()]);
    assert_eq!(node.first("unique_name"), Some("der_standard"));
    assert_eq!(node.first("entry_review_status"), Some("pending"));
    assert_eq!(node.first("entry_added"), Some(h.user.as_str()));
    assert_eq!(node.values("languages"), ["de".to_string()]);
}

#[tokio::test]
async fn same_label_submitted_twice_reuses_the_existing_entry() {
    let h = Harness::new();
    let first = submit_source(&h, "Krone", json!({ "publishes_org": ["ACME"] })).await;
    let acme = h.store.find("acme").expect("publisher was created");
    assert_eq!(
        h.store.node(&acme).unwrap().first("entry_review_status"),
        Some("draft")
    );

    let data = form(json!({
        "name": "Heute",
        "channel": channel(&h).as_str(),
        "publishes_org": ["ACME"],
    }));
    let sub = h
        .sanitizer
        .new_entry("Source", &data, &h.ctx(UserRole::Contributor))
        .await
        .unwrap();

    assert_eq!(sub.related, vec![RelatedEntity::Existing(acme.clone())]);
    let set = rendered(&sub.mutation.set);
    assert!(set.iter().all(|s| !s.starts_with("_:acme")));
    assert!(set
        .iter()
        .any(|s| s.starts_with(&format!("<{acme}> <publishes> _:"))));

    h.writer.apply(&sub.mutation).await.unwrap();
    let publishes = h.store.node(&acme).unwrap().fields["publishes"].clone();
    assert_eq!(publishes.len(), 2);
    assert!(publishes.contains(&first.to_string()));
}

#[tokio::test]
async fn failing_label_lookup_is_an_invalid_value() {
    let h = Harness::with_resolver(Arc::new(FailingResolver));
    let data = form(json!({
        "name": "Krone",
        "channel": channel(&h).as_str(),
        "publishes_org": ["ACME"],
    }));
    let err = h
        .sanitizer
        .new_entry("Source", &data, &h.ctx(UserRole::Contributor))
        .await
        .unwrap_err();
    assert!(
        matches!(&err, InventoryError::InvalidValue { predicate, .. } if predicate == "publishes_org"),
        "{err}"
    );
}

#[tokio::test]
async fn one_label_cannot_satisfy_two_target_types() {
    let h = Harness::new();
    let data = form(json!({
        "name": "Wien Heute",
        "channel": channel(&h).as_str(),
        "geographic_scope_subunit": ["Vienna"],
        "publishes_org": ["Vienna"],
    }));
    let err = h
        .sanitizer
        .new_entry("Source", &data, &h.ctx(UserRole::Contributor))
        .await
        .unwrap_err();
    assert!(
        matches!(&err, InventoryError::ConstraintViolation { predicate, .. } if predicate == "publishes_org"),
        "{err}"
    );
    assert!(h.store.mutations().is_empty());
}

#[tokio::test]
async fn store_rejection_is_a_conflict() {
    let h = Harness::new();
    h.store.fail_mutations("Transaction has been aborted. Please retry");
    let err = h
        .submit(
            "Source",
            json!({ "name": "Krone", "channel": channel(&h).as_str() }),
            &h.ctx(UserRole::Contributor),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, InventoryError::StoreConflict(_)));
    assert!(h.store.mutations().is_empty());
}

// ---------------------------------------------------------------------------
// Edits
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shrinking_a_relationship_list_replaces_it() {
    let h = Harness::new();
    let a = h.store.add_entry("Source", "a", None);
    let b = h.store.add_entry("Source", "b", None);
    let uid = submit_source(&h, "Krone", json!({ "related": [a.as_str(), b.as_str()] })).await;
    assert_eq!(h.store.node(&uid).unwrap().values("related").len(), 2);

    let data = form(json!({ "uid": uid.as_str(), "related": [a.as_str()] }));
    let sub = h
        .sanitizer
        .edit_entry("Source", &data, &h.ctx(UserRole::Contributor))
        .await
        .unwrap();

    assert_eq!(
        rendered(&sub.mutation.delete),
        vec![format!("<{uid}> <related> * .")]
    );
    let related: Vec<&NQuad> = sub
        .mutation
        .set
        .iter()
        .filter(|q| q.predicate == "related")
        .collect();
    assert_eq!(related.len(), 1);
    assert_eq!(related[0].render(), format!("<{uid}> <related> <{a}> ."));

    h.writer.apply(&sub.mutation).await.unwrap();
    assert_eq!(
        h.store.node(&uid).unwrap().values("related"),
        [a.to_string()]
    );
}

#[tokio::test]
async fn overwritten_values_do_not_survive_the_edit() {
    let h = Harness::new();
    let uid = submit_source(&h, "Krone", json!({ "languages": ["de", "en"] })).await;

    let data = form(json!({ "uid": uid.as_str(), "languages": "hu" }));
    let sub = h
        .sanitizer
        .edit_entry("Source", &data, &h.ctx(UserRole::Contributor))
        .await
        .unwrap();
    h.writer.apply(&sub.mutation).await.unwrap();

    let node = h.store.node(&uid).unwrap();
    assert_eq!(node.values("languages"), ["hu".to_string()]);
    assert_eq!(node.values("entry_edit_history"), [h.user.to_string()]);
}

#[tokio::test]
async fn moving_a_source_to_another_publisher_drops_the_old_edge() {
    let h = Harness::new();
    let old = h.store.add_entry("Organization", "old_owner", None);
    let new = h.store.add_entry("Organization", "new_owner", None);
    let uid = submit_source(&h, "Krone", json!({ "publishes_org": [old.as_str()] })).await;
    assert_eq!(
        h.store.node(&old).unwrap().values("publishes"),
        [uid.to_string()]
    );

    let data = form(json!({ "uid": uid.as_str(), "publishes_org": [new.as_str()] }));
    let sub = h
        .sanitizer
        .edit_entry("Source", &data, &h.ctx(UserRole::Contributor))
        .await
        .unwrap();
    assert_eq!(sub.mutation.prelude.len(), 1);
    h.writer.apply(&sub.mutation).await.unwrap();

    assert!(h.store.node(&old).unwrap().values("publishes").is_empty());
    assert_eq!(
        h.store.node(&new).unwrap().values("publishes"),
        [uid.to_string()]
    );
}

#[tokio::test]
async fn editing_archives_keeps_paper_citations() {
    let h = Harness::new();
    let old = h.store.add_entry("Archive", "old_archive", None);
    let new = h.store.add_entry("Archive", "new_archive", None);
    let uid = submit_source(&h, "Krone", json!({})).await;
    let paper = h.store.add_node(
        &["ResearchPaper", "Entry"],
        &[("unique_name", "paper"), ("sources_included", uid.as_str())],
    );
    let reviewer = h.store.add_user();
    let ctx = inventory_graph::testing::context(&reviewer, UserRole::Reviewer);

    let data = form(json!({ "uid": uid.as_str(), "archives": [old.as_str()] }));
    let sub = h.sanitizer.edit_entry("Source", &data, &ctx).await.unwrap();
    h.writer.apply(&sub.mutation).await.unwrap();
    assert_eq!(h.store.node(&old).unwrap().values("sources_included"), [uid.to_string()]);

    let data = form(json!({ "uid": uid.as_str(), "archives": [new.as_str()] }));
    let sub = h.sanitizer.edit_entry("Source", &data, &ctx).await.unwrap();
    h.writer.apply(&sub.mutation).await.unwrap();

    assert!(h.store.node(&old).unwrap().values("sources_included").is_empty());
    assert_eq!(h.store.node(&new).unwrap().values("sources_included"), [uid.to_string()]);
    assert_eq!(h.store.node(&paper).unwrap().values("sources_included"), [uid.to_string()]);
}

#[tokio::test]
async fn dropping_a_sibling_removes_its_back_edge() {
    let h = Harness::new();
    let a = h.store.add_entry("Source", "sibling_a", None);
    let b = h.store.add_entry("Source", "sibling_b", None);
    let uid = submit_source(
        &h,
        "Krone",
        json!({ "sibling_sources": [a.as_str(), b.as_str()] }),
    )
    .await;
    assert_eq!(h.store.node(&b).unwrap().values("sibling_sources"), [uid.to_string()]);

    let data = form(json!({ "uid": uid.as_str(), "sibling_sources": [a.as_str()] }));
    let sub = h
        .sanitizer
        .edit_entry("Source", &data, &h.ctx(UserRole::Contributor))
        .await
        .unwrap();
    assert_eq!(sub.mutation.prelude.len(), 1);
    assert!(rendered(&sub.mutation.delete).contains(&format!("<{uid}> <sibling_sources> * .")));
    h.writer.apply(&sub.mutation).await.unwrap();

    assert_eq!(h.store.node(&uid).unwrap().values("sibling_sources"), [a.to_string()]);
    assert_eq!(h.store.node(&a).unwrap().values("sibling_sources"), [uid.to_string()]);
    assert!(h.store.node(&b).unwrap().values("sibling_sources").is_empty());
}

#[tokio::test]
async fn contributors_cannot_accept_and_nothing_is_written() {
    let h = Harness::new();
    let uid = submit_source(&h, "Krone", json!({})).await;
    let written = h.store.mutations().len();

    let data = form(json!({ "uid": uid.as_str(), "entry_review_status": "accepted" }));
    let err = h
        .sanitizer
        .edit_entry("Source", &data, &h.ctx(UserRole::Contributor))
        .await
        .unwrap_err();

    assert!(matches!(err, InventoryError::PermissionDenied(_)));
    assert_eq!(h.store.mutations().len(), written);
    assert_eq!(
        h.store.node(&uid).unwrap().first("entry_review_status"),
        Some("pending")
    );
}

#[tokio::test]
async fn reviewers_accept_pending_entries() {
    let h = Harness::new();
    let uid = submit_source(&h, "Krone", json!({})).await;
    let reviewer = h.store.add_user();

    let mut ctx = inventory_graph::testing::context(&reviewer, UserRole::Reviewer);
    ctx.accept = true;
    let data = form(json!({ "uid": uid.as_str() }));
    let sub = h.sanitizer.edit_entry("Source", &data, &ctx).await.unwrap();
    assert_eq!(sub.status, ReviewStatus::Accepted);
    h.writer.apply(&sub.mutation).await.unwrap();

    let node = h.store.node(&uid).unwrap();
    assert_eq!(node.first("entry_review_status"), Some("accepted"));
    assert_eq!(node.first("reviewed_by"), Some(reviewer.as_str()));
}
