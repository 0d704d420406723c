//! CSV export scoping and the legacy backfill

mod common;

use bson::{oid::ObjectId, DateTime};
use common::{oid, Harness};
use doctrack::auth::Role;
use doctrack::db::schemas::{DocumentDoc, HistoryAction, HistoryEvent};
use doctrack::services::ExportRequest;
use doctrack::store::{MemoryDocumentStore, Stores};
use doctrack::DoctrackError;
use std::sync::Arc;

fn export_ids(ids: &[&str]) -> ExportRequest {
    ExportRequest {
        ids: ids.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_export_is_scoped_by_visibility() {
    let h = Harness::new();
    let owner = h.user("emma", Role::Employee).await;
    let other = h.user("eli", Role::Employee).await;
    let admin = h.user("ada", Role::Admin).await;

    h.create(&owner, "Mine").await;
    h.create(&other, "Theirs").await;

    let csv = h.documents.export(&owner, ExportRequest::default()).await.unwrap();
    let lines: Vec<_> = csv.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("docRefShort,docRef,title"));
    assert!(lines[1].contains("\"Mine\""));
    assert!(lines[1].contains("\"emma\""));

    let csv = h.documents.export(&admin, ExportRequest::default()).await.unwrap();
    assert_eq!(csv.lines().count(), 3);
}

#[tokio::test]
async fn test_export_by_ids_skips_invisible() {
    let h = Harness::new();
    let owner = h.user("emma", Role::Employee).await;
    let other = h.user("eli", Role::Employee).await;

    let first = h.create(&owner, "First").await;
    h.create(&owner, "Second").await;
    let hidden = h.create(&other, "Hidden").await;

    let csv = h
        .documents
        .export(&owner, export_ids(&[&first.id, &hidden.id]))
        .await
        .unwrap();
    let rows: Vec<_> = csv.lines().skip(1).collect();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].contains("\"First\""));

    let err = h
        .documents
        .export(&owner, export_ids(&["not-an-id"]))
        .await
        .unwrap_err();
    assert!(matches!(err, DoctrackError::Validation(_)));
}

#[tokio::test]
async fn test_export_applies_filters() {
    let h = Harness::new();
    let owner = h.user("emma", Role::Employee).await;
    h.create(&owner, "Budget").await;
    h.create(&owner, "Holiday").await;

    let request: ExportRequest = serde_json::from_value(serde_json::json!({
        "filters": { "text": "budget" }
    }))
    .unwrap();
    let csv = h.documents.export(&owner, request).await.unwrap();
    assert_eq!(csv.lines().count(), 2);
    assert!(csv.contains("\"Budget\""));
}

fn legacy_document(owner: ObjectId) -> DocumentDoc {
    let now = DateTime::now();
    let mut doc = DocumentDoc::new(ObjectId::new(), owner, "Old memo".into(), "text".into(), now);
    doc.history.push(HistoryEvent {
        event_id: String::new(),
        action: HistoryAction::Created,
        performed_by: owner,
        performed_by_name: String::new(),
        timestamp: now,
        details: "Document created".into(),
    });
    doc
}

#[tokio::test]
async fn test_backfill_fills_missing_fields_once() {
    let documents = Arc::new(MemoryDocumentStore::new());
    let stores = Stores {
        documents: documents.clone(),
        ..Stores::memory()
    };
    let h = Harness::with_stores(stores);
    let admin = h.user("ada", Role::Admin).await;
    let owner = h.user("emma", Role::Employee).await;

    let legacy = legacy_document(owner.id);
    documents.insert_raw(legacy.clone());
    let modern = h.create(&owner, "Already complete").await;
    let modern_before = h.stored(&modern).await;

    let err = h.documents.backfill(&owner).await.unwrap_err();
    assert!(matches!(err, DoctrackError::AuthorizationDenied(_)));

    let report = h.documents.backfill(&admin).await.unwrap();
    assert_eq!(report.updated_count, 1);

    let filled = h.stores.documents.get(&legacy.id).await.unwrap().unwrap();
    assert!(!filled.doc_ref.is_empty());
    assert!(filled.doc_ref_short.starts_with("DOC-"));
    assert_ne!(filled.doc_ref_short, modern.doc_ref_short);
    assert_eq!(filled.history.len(), 1);
    assert!(filled.history[0].event_id.starts_with("EVT-"));
    assert_eq!(filled.history[0].performed_by_name, "emma");
    assert_eq!(filled.version, legacy.version + 1);
    assert_eq!(h.stored(&modern).await, modern_before);

    // A second run has nothing left to do
    let report = h.documents.backfill(&admin).await.unwrap();
    assert_eq!(report.updated_count, 0);

    // The backfilled document is now fully usable
    let view = h.documents.get(&owner, &legacy.id).await.unwrap();
    assert_eq!(view.doc_ref_short, filled.doc_ref_short);
    assert!(h.documents.get(&owner, &oid(&modern)).await.is_ok());
}
