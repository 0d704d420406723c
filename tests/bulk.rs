//! Bulk actions report per item and never abort the batch

mod common;

use common::{oid, Harness};
use doctrack::auth::Role;
use doctrack::db::schemas::{HistoryAction, Status};
use doctrack::services::{BulkItemResult, BulkRequest};
use doctrack::DoctrackError;
use serde_json::json;

fn request(value: serde_json::Value) -> BulkRequest {
    serde_json::from_value(value).unwrap()
}

#[tokio::test]
async fn test_bulk_close_partial_success() {
    let h = Harness::new();
    let actor = h.user("emma", Role::Employee).await;
    let other = h.user("olga", Role::Employee).await;

    let a = h.create(&actor, "Mine").await;
    let b = h.create(&other, "Theirs").await;
    let b_before = h.stored(&b).await;

    let response = h
        .documents
        .bulk(&actor, request(json!({
            "action": "close",
            "ids": [a.id, b.id],
            "payload": { "closingMessage": "done" }
        })))
        .await
        .unwrap();

    assert_eq!(
        response.results,
        vec![
            BulkItemResult { id: a.id.clone(), success: true, msg: "Closed".into() },
            BulkItemResult { id: b.id.clone(), success: false, msg: "Not authorized".into() },
        ]
    );

    let a_after = h.stored(&a).await;
    assert_eq!(a_after.status, Status::Closed);
    assert_eq!(a_after.closed_message.as_deref(), Some("done"));
    let actions: Vec<_> = a_after.history.iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![HistoryAction::Created, HistoryAction::StatusChange, HistoryAction::Closed]
    );
    assert_eq!(h.stored(&b).await, b_before);
}

#[tokio::test]
async fn test_bulk_item_failures_are_reported() {
    let h = Harness::new();
    let admin = h.user("ada", Role::Admin).await;
    let open = h.create(&admin, "Open").await;
    let closed = h.create(&admin, "Closed already").await;
    h.documents
        .bulk(&admin, request(json!({
            "action": "close",
            "ids": [closed.id],
            "payload": { "closingMessage": "first" }
        })))
        .await
        .unwrap();

    let missing = bson::oid::ObjectId::new().to_hex();
    let response = h
        .documents
        .bulk(&admin, request(json!({
            "action": "close",
            "ids": [open.id, closed.id, missing, "garbage"],
            "payload": { "closingMessage": "second" }
        })))
        .await
        .unwrap();

    let summary: Vec<_> = response
        .results
        .iter()
        .map(|r| (r.success, r.msg.as_str()))
        .collect();
    assert_eq!(
        summary,
        vec![
            (true, "Closed"),
            (false, "Already closed"),
            (false, "Not found"),
            (false, "Not found"),
        ]
    );
}

#[tokio::test]
async fn test_bulk_close_requires_message_per_item() {
    let h = Harness::new();
    let owner = h.user("emma", Role::Employee).await;
    let doc = h.create(&owner, "Needs message").await;

    let response = h
        .documents
        .bulk(&owner, request(json!({ "action": "close", "ids": [doc.id] })))
        .await
        .unwrap();
    assert!(!response.results[0].success);
    assert_eq!(response.results[0].msg, "Missing closing message");
    assert_eq!(h.stored(&doc).await.status, Status::Open);
}

#[tokio::test]
async fn test_bulk_assign_and_delete() {
    let h = Harness::new();
    let owner = h.user("emma", Role::Employee).await;
    let head = h.user("mark", Role::Manager).await;
    let first = h.create(&owner, "First").await;
    let second = h.create(&owner, "Second").await;

    let response = h
        .documents
        .bulk(&owner, request(json!({
            "action": "assign",
            "ids": [first.id, second.id],
            "payload": { "assignedTo": head.id.to_hex() }
        })))
        .await
        .unwrap();
    assert!(response.results.iter().all(|r| r.success && r.msg == "Assigned"));
    assert_eq!(h.stored(&first).await.assigned_to, Some(head.id));

    // The assignee may close but not delete
    let response = h
        .documents
        .bulk(&head, request(json!({ "action": "delete", "ids": [first.id] })))
        .await
        .unwrap();
    assert_eq!(response.results[0].msg, "Not authorized");

    let response = h
        .documents
        .bulk(&owner, request(json!({ "action": "delete", "ids": [first.id, second.id] })))
        .await
        .unwrap();
    assert!(response.results.iter().all(|r| r.success && r.msg == "Deleted"));
    assert!(matches!(
        h.documents.get(&owner, &oid(&first)).await,
        Err(DoctrackError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_bulk_assign_without_target() {
    let h = Harness::new();
    let owner = h.user("emma", Role::Employee).await;
    let doc = h.create(&owner, "Unassigned").await;

    let response = h
        .documents
        .bulk(&owner, request(json!({ "action": "assign", "ids": [doc.id] })))
        .await
        .unwrap();
    assert_eq!(response.results[0].msg, "No assignedTo specified");

    let response = h
        .documents
        .bulk(&owner, request(json!({
            "action": "assign",
            "ids": [doc.id],
            "payload": { "assignedTo": bson::oid::ObjectId::new().to_hex() }
        })))
        .await
        .unwrap();
    assert_eq!(response.results[0].msg, "Assignee not found");
}

#[tokio::test]
async fn test_bulk_rejects_empty_ids_and_unknown_action() {
    let h = Harness::new();
    let owner = h.user("emma", Role::Employee).await;
    let doc = h.create(&owner, "Doc").await;

    let err = h
        .documents
        .bulk(&owner, request(json!({ "action": "close", "ids": [] })))
        .await
        .unwrap_err();
    assert!(matches!(err, DoctrackError::Validation(_)));

    let response = h
        .documents
        .bulk(&owner, request(json!({ "action": "archive", "ids": [doc.id] })))
        .await
        .unwrap();
    assert!(!response.results[0].success);
    assert_eq!(response.results[0].msg, "Unknown action");
}
