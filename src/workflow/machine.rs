//! Document workflow state machine
//!
//! Pure functions from (document, actor, request) to the next document plus
//! the history events the change produced. Nothing here touches storage: the
//! caller persists `Transition::document` with a compare-and-swap on the
//! version it read. Every precondition is checked before the working copy is
//! touched, so a rejected call leaves no partial state behind.

use bson::{oid::ObjectId, DateTime};
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::auth::Actor;
use crate::db::schemas::{
    AccessGrant, Capability, DocumentDoc, HistoryAction, HistoryEvent, Status, UserDoc,
    VersionSnapshot,
};
use crate::types::{DoctrackError, Result};
use crate::workflow::access::{can_delete, can_edit, can_forward};
use crate::workflow::history::EventBatch;

pub const CLOSING_MESSAGE_REQUIRED: &str = "Closing message is required when closing a document";

/// Result of a state machine call
#[derive(Debug, Clone)]
pub struct Transition {
    pub document: DocumentDoc,
    /// Events appended by this call; empty means nothing changed
    pub events: Vec<HistoryEvent>,
}

impl Transition {
    fn unchanged(doc: &DocumentDoc) -> Self {
        Self {
            document: doc.clone(),
            events: Vec::new(),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.events.is_empty()
    }
}

/// Fields for a new document
#[derive(Debug, Clone, Default)]
pub struct NewDocument {
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub metadata: BTreeMap<String, String>,
    pub access_control: Vec<AccessGrant>,
    pub assigned_to: Option<ObjectId>,
}

/// Requested changes to an existing document. Absent fields are left alone.
#[derive(Debug, Clone, Default)]
pub struct UpdatePatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
    pub metadata: Option<BTreeMap<String, String>>,
    pub access_control: Option<Vec<AccessGrant>>,
    pub status: Option<Status>,
    pub assigned_to: Option<ObjectId>,
    pub closing_message: Option<String>,
    /// Version the client read
    pub version: Option<i64>,
}

/// Trim, drop blanks and drop repeats, keeping first-seen order
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.to_string()))
        .map(str::to_string)
        .collect()
}

/// One entry per user; the first entry for a user wins
pub fn dedupe_access_control(grants: &[AccessGrant]) -> Vec<AccessGrant> {
    let mut seen = HashSet::new();
    grants
        .iter()
        .filter(|g| seen.insert(g.user))
        .cloned()
        .collect()
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn require_text(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(DoctrackError::Validation(format!("{field} is required")));
    }
    Ok(())
}

fn check_assignee(requested: Option<ObjectId>, resolved: Option<&UserDoc>) -> Result<()> {
    match (requested, resolved) {
        (None, _) => Ok(()),
        (Some(id), Some(user)) if user.id == id => Ok(()),
        (Some(_), _) => Err(DoctrackError::Validation("Assigned user not found".into())),
    }
}

fn display_name(user: &UserDoc) -> &str {
    user.full_name
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or(user.username.as_str())
}

fn seal(mut next: DocumentDoc, batch: EventBatch<'_>, previous_version: i64, now: DateTime) -> Transition {
    next.version = previous_version + 1;
    next.updated_at = now;
    let events = batch.commit(&mut next);
    Transition {
        document: next,
        events,
    }
}

/// Build a new open document owned by `actor`.
///
/// `assignee` must be the resolved user for `draft.assigned_to`, if any.
pub fn create(
    id: ObjectId,
    actor: &Actor,
    draft: &NewDocument,
    assignee: Option<&UserDoc>,
    doc_ref: String,
    doc_ref_short: String,
    now: DateTime,
) -> Result<Transition> {
    require_text(&draft.title, "Title")?;
    require_text(&draft.content, "Content")?;
    check_assignee(draft.assigned_to, assignee)?;

    let mut doc = DocumentDoc::new(id, actor.id, draft.title.trim().into(), draft.content.clone(), now);
    doc.doc_ref = doc_ref;
    doc.doc_ref_short = doc_ref_short;
    doc.tags = normalize_tags(&draft.tags);
    doc.metadata = draft.metadata.clone();
    doc.access_control = dedupe_access_control(&draft.access_control);
    if let Some(user) = assignee {
        doc.assigned_to = Some(user.id);
        doc.assigned_to_name = Some(user.username.clone());
    }

    let mut batch = EventBatch::new(actor, now);
    batch.record(HistoryAction::Created, "Document created");
    let events = batch.commit(&mut doc);

    Ok(Transition {
        document: doc,
        events,
    })
}

/// Apply an update patch.
///
/// Events are appended in the order StatusChange, Closed, AccessUpdated,
/// Assigned, Edited. `assignee` must be the resolved user for
/// `patch.assigned_to`, if any.
pub fn apply_update(
    doc: &DocumentDoc,
    actor: &Actor,
    patch: &UpdatePatch,
    assignee: Option<&UserDoc>,
    now: DateTime,
) -> Result<Transition> {
    if !can_edit(actor, doc) {
        return Err(DoctrackError::AuthorizationDenied(
            "Not authorized to edit this document".into(),
        ));
    }

    if let Some(title) = &patch.title {
        require_text(title, "Title")?;
    }
    if let Some(content) = &patch.content {
        require_text(content, "Content")?;
    }

    let closing = patch.status == Some(Status::Closed) && doc.status != Status::Closed;
    let closing_message = non_blank(patch.closing_message.as_deref());
    if closing && closing_message.is_none() {
        return Err(DoctrackError::Validation(CLOSING_MESSAGE_REQUIRED.into()));
    }

    match patch.version {
        None => {
            return Err(DoctrackError::Validation(
                "version is required to update a document".into(),
            ))
        }
        Some(v) if v != doc.version => {
            return Err(DoctrackError::Conflict(format!(
                "Document is at version {}, update was based on version {v}",
                doc.version
            )))
        }
        Some(_) => {}
    }

    let reassign = patch.assigned_to.filter(|id| doc.assigned_to != Some(*id));
    check_assignee(reassign, assignee)?;

    let title = patch.title.as_deref().map(str::trim).unwrap_or(doc.title.as_str());
    let content = patch.content.as_deref().unwrap_or(doc.content.as_str());
    let tags = patch
        .tags
        .as_deref()
        .map(normalize_tags)
        .unwrap_or_else(|| doc.tags.clone());
    let metadata = patch.metadata.as_ref().unwrap_or(&doc.metadata);
    let access_control = patch.access_control.as_deref().map(dedupe_access_control);

    let content_changed = title != doc.title || content != doc.content;
    let tags_changed =
        tags.iter().collect::<BTreeSet<_>>() != doc.tags.iter().collect::<BTreeSet<_>>();
    let metadata_changed = metadata != &doc.metadata;

    let mut next = doc.clone();
    let mut batch = EventBatch::new(actor, now);

    if content_changed || tags_changed || metadata_changed {
        next.version_history.push(VersionSnapshot {
            content: doc.content.clone(),
            edited_by: actor.id,
            edited_at: now,
        });
    }

    if let Some(status) = patch.status.filter(|s| *s != doc.status) {
        batch.record(
            HistoryAction::StatusChange,
            format!("Status changed from {} to {}", doc.status, status),
        );
        next.status = status;
    }

    if let (true, Some(message)) = (closing, closing_message) {
        batch.record(HistoryAction::Closed, format!("Closed: {message}"));
        next.closed_message = Some(message.to_string());
        next.closed_at = Some(now);
        next.closed_by = Some(actor.id);
    }

    if let Some(acl) = &access_control {
        if acl != &doc.access_control {
            batch.record(HistoryAction::AccessUpdated, "Access control list updated");
        }
    }

    if let (Some(_), Some(user)) = (reassign, assignee) {
        batch.record(
            HistoryAction::Assigned,
            format!("Assigned to {}", display_name(user)),
        );
        next.assigned_to = Some(user.id);
        next.assigned_to_name = Some(user.username.clone());
    }

    if content_changed {
        batch.record(HistoryAction::Edited, "Document content or title updated");
    } else if (tags_changed || metadata_changed) && batch.is_empty() {
        batch.record(HistoryAction::Edited, "Document tags or metadata updated");
    }

    if batch.is_empty() {
        return Ok(Transition::unchanged(doc));
    }

    next.title = title.to_string();
    next.content = content.to_string();
    next.tags = tags;
    next.metadata = metadata.clone();
    if let Some(acl) = access_control {
        next.access_control = acl;
    }

    Ok(seal(next, batch, doc.version, now))
}

/// Forward `doc` to `to`: grant access (once per user) and make them the
/// current assignee
pub fn forward(
    doc: &DocumentDoc,
    actor: &Actor,
    to: &UserDoc,
    capability: Capability,
    now: DateTime,
) -> Result<Transition> {
    if !can_forward(actor, doc) {
        return Err(DoctrackError::AuthorizationDenied(
            "Not authorized to forward this document".into(),
        ));
    }

    let mut next = doc.clone();
    if next.grant_for(&to.id).is_none() {
        next.access_control.push(AccessGrant::new(to.id, capability));
    }
    next.assigned_to = Some(to.id);
    next.assigned_to_name = Some(to.username.clone());

    let mut batch = EventBatch::new(actor, now);
    batch.record(
        HistoryAction::Forwarded,
        format!("Forwarded to {}", display_name(to)),
    );

    Ok(seal(next, batch, doc.version, now))
}

/// Close with a message. Authorization is the caller's concern.
pub fn close(doc: &DocumentDoc, actor: &Actor, message: Option<&str>, now: DateTime) -> Result<Transition> {
    let message = non_blank(message)
        .ok_or_else(|| DoctrackError::Validation("Missing closing message".into()))?;
    if doc.status == Status::Closed {
        return Err(DoctrackError::Validation("Already closed".into()));
    }

    let mut next = doc.clone();
    let mut batch = EventBatch::new(actor, now);
    batch.record(
        HistoryAction::StatusChange,
        format!("Status changed from {} to {}", doc.status, Status::Closed),
    );
    batch.record(HistoryAction::Closed, format!("Closed: {message}"));
    next.status = Status::Closed;
    next.closed_message = Some(message.to_string());
    next.closed_at = Some(now);
    next.closed_by = Some(actor.id);

    Ok(seal(next, batch, doc.version, now))
}

/// Reassign to `to`. Authorization is the caller's concern.
pub fn assign(doc: &DocumentDoc, actor: &Actor, to: &UserDoc, now: DateTime) -> Transition {
    let mut next = doc.clone();
    next.assigned_to = Some(to.id);
    next.assigned_to_name = Some(to.username.clone());

    let mut batch = EventBatch::new(actor, now);
    batch.record(
        HistoryAction::Assigned,
        format!("Assigned to {}", display_name(to)),
    );
    seal(next, batch, doc.version, now)
}

/// Owner or admin only
pub fn authorize_delete(doc: &DocumentDoc, actor: &Actor) -> Result<()> {
    if can_delete(actor, doc) {
        Ok(())
    } else {
        Err(DoctrackError::AuthorizationDenied(
            "Not authorized to delete this document".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::workflow::history::is_append_only;

    fn actor(role: Role) -> Actor {
        Actor::new(ObjectId::new(), format!("{role}-user"), role)
    }

    fn user(name: &str, full: Option<&str>) -> UserDoc {
        UserDoc::new(name.into(), "hash".into(), Role::Manager, full.map(Into::into))
    }

    fn open_doc(owner: &Actor) -> DocumentDoc {
        let draft = NewDocument {
            title: "Supplier contract".into(),
            content: "Initial terms".into(),
            tags: vec!["legal".into()],
            ..Default::default()
        };
        create(
            ObjectId::new(),
            owner,
            &draft,
            None,
            "DOC-abc".into(),
            "DOC-000001".into(),
            DateTime::now(),
        )
        .unwrap()
        .document
    }

    fn patch(doc: &DocumentDoc) -> UpdatePatch {
        UpdatePatch {
            version: Some(doc.version),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_records_created_event() {
        let owner = actor(Role::Employee);
        let doc = open_doc(&owner);
        assert_eq!(doc.status, Status::Open);
        assert_eq!(doc.version, 1);
        assert_eq!(doc.history.len(), 1);
        assert_eq!(doc.history[0].action, HistoryAction::Created);
        assert_eq!(doc.owner, owner.id);
    }

    #[test]
    fn test_create_requires_title_and_content() {
        let owner = actor(Role::Employee);
        let draft = NewDocument {
            title: "   ".into(),
            content: "x".into(),
            ..Default::default()
        };
        let err = create(ObjectId::new(), &owner, &draft, None, "a".into(), "b".into(), DateTime::now())
            .unwrap_err();
        assert_eq!(err.to_string(), "Title is required");
    }

    #[test]
    fn test_create_dedupes_acl_first_wins() {
        let owner = actor(Role::Employee);
        let other = ObjectId::new();
        let draft = NewDocument {
            title: "t".into(),
            content: "c".into(),
            access_control: vec![
                AccessGrant::new(other, Capability::Editor),
                AccessGrant::new(other, Capability::Viewer),
            ],
            ..Default::default()
        };
        let doc = create(ObjectId::new(), &owner, &draft, None, "a".into(), "b".into(), DateTime::now())
            .unwrap()
            .document;
        assert_eq!(doc.access_control, vec![AccessGrant::new(other, Capability::Editor)]);
    }

    #[test]
    fn test_close_without_message_is_rejected_without_changes() {
        let owner = actor(Role::Employee);
        let doc = open_doc(&owner);
        for message in [None, Some(""), Some("   ")] {
            let p = UpdatePatch {
                status: Some(Status::Closed),
                closing_message: message.map(Into::into),
                ..patch(&doc)
            };
            let err = apply_update(&doc, &owner, &p, None, DateTime::now()).unwrap_err();
            assert!(matches!(err, DoctrackError::Validation(ref m) if m == CLOSING_MESSAGE_REQUIRED));
        }
        assert_eq!(doc.status, Status::Open);
        assert_eq!(doc.history.len(), 1);
    }

    #[test]
    fn test_closing_message_checked_before_version() {
        let owner = actor(Role::Employee);
        let doc = open_doc(&owner);
        let p = UpdatePatch {
            status: Some(Status::Closed),
            closing_message: Some(String::new()),
            ..Default::default()
        };
        let err = apply_update(&doc, &owner, &p, None, DateTime::now()).unwrap_err();
        assert_eq!(err.to_string(), CLOSING_MESSAGE_REQUIRED);
    }

    #[test]
    fn test_event_order_for_combined_update() {
        let owner = actor(Role::Employee);
        let doc = open_doc(&owner);
        let head = user("mhead", Some("Morgan Head"));
        let p = UpdatePatch {
            title: Some("Supplier contract v2".into()),
            status: Some(Status::Closed),
            closing_message: Some("Signed".into()),
            access_control: Some(vec![AccessGrant::new(head.id, Capability::Viewer)]),
            assigned_to: Some(head.id),
            ..patch(&doc)
        };
        let t = apply_update(&doc, &owner, &p, Some(&head), DateTime::now()).unwrap();
        let actions: Vec<_> = t.events.iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            vec![
                HistoryAction::StatusChange,
                HistoryAction::Closed,
                HistoryAction::AccessUpdated,
                HistoryAction::Assigned,
                HistoryAction::Edited,
            ]
        );
        assert_eq!(t.events[0].details, "Status changed from Open to Closed");
        assert_eq!(t.events[1].details, "Closed: Signed");
        assert_eq!(t.events[3].details, "Assigned to Morgan Head");

        let next = &t.document;
        assert_eq!(next.version, doc.version + 1);
        assert_eq!(next.closed_by, Some(owner.id));
        assert_eq!(next.assigned_to_name.as_deref(), Some("mhead"));
        assert_eq!(next.version_history.len(), 1);
        assert_eq!(next.version_history[0].content, "Initial terms");
        assert!(is_append_only(&doc.history, &next.history));
    }

    #[test]
    fn test_stale_version_conflicts() {
        let owner = actor(Role::Employee);
        let doc = open_doc(&owner);
        let p = UpdatePatch {
            title: Some("new".into()),
            version: Some(doc.version + 3),
            ..Default::default()
        };
        assert!(matches!(
            apply_update(&doc, &owner, &p, None, DateTime::now()),
            Err(DoctrackError::Conflict(_))
        ));

        let p = UpdatePatch {
            title: Some("new".into()),
            ..Default::default()
        };
        assert!(matches!(
            apply_update(&doc, &owner, &p, None, DateTime::now()),
            Err(DoctrackError::Validation(_))
        ));
    }

    #[test]
    fn test_viewer_cannot_update() {
        let owner = actor(Role::Employee);
        let viewer = actor(Role::Employee);
        let mut doc = open_doc(&owner);
        doc.access_control.push(AccessGrant::new(viewer.id, Capability::Viewer));
        let p = UpdatePatch {
            title: Some("hijack".into()),
            ..patch(&doc)
        };
        assert!(matches!(
            apply_update(&doc, &viewer, &p, None, DateTime::now()),
            Err(DoctrackError::AuthorizationDenied(_))
        ));
    }

    #[test]
    fn test_noop_patch_changes_nothing() {
        let owner = actor(Role::Employee);
        let doc = open_doc(&owner);
        let p = UpdatePatch {
            title: Some(doc.title.clone()),
            tags: Some(vec!["legal".into(), "legal".into()]),
            status: Some(Status::Open),
            ..patch(&doc)
        };
        let t = apply_update(&doc, &owner, &p, None, DateTime::now()).unwrap();
        assert!(t.is_noop());
        assert_eq!(t.document, doc);
    }

    #[test]
    fn test_tag_only_change_is_recorded() {
        let owner = actor(Role::Employee);
        let doc = open_doc(&owner);
        let p = UpdatePatch {
            tags: Some(vec!["legal".into(), "urgent".into()]),
            ..patch(&doc)
        };
        let t = apply_update(&doc, &owner, &p, None, DateTime::now()).unwrap();
        assert_eq!(t.events.len(), 1);
        assert_eq!(t.events[0].action, HistoryAction::Edited);
        assert_eq!(t.events[0].details, "Document tags or metadata updated");
        assert_eq!(t.document.tags, vec!["legal", "urgent"]);
    }

    #[test]
    fn test_reopen_keeps_closing_record() {
        let owner = actor(Role::Employee);
        let doc = open_doc(&owner);
        let closed = close(&doc, &owner, Some("done"), DateTime::now()).unwrap().document;
        let p = UpdatePatch {
            status: Some(Status::Open),
            ..patch(&closed)
        };
        let reopened = apply_update(&closed, &owner, &p, None, DateTime::now()).unwrap();
        assert_eq!(reopened.document.status, Status::Open);
        assert_eq!(reopened.document.closed_message.as_deref(), Some("done"));
        assert_eq!(reopened.events[0].details, "Status changed from Closed to Open");
    }

    #[test]
    fn test_forward_twice_keeps_single_grant() {
        let owner = actor(Role::Employee);
        let doc = open_doc(&owner);
        let x = user("xavier", None);

        let once = forward(&doc, &owner, &x, Capability::Viewer, DateTime::now()).unwrap();
        let twice = forward(&once.document, &owner, &x, Capability::Editor, DateTime::now()).unwrap();
        let d = twice.document;

        assert_eq!(d.access_control.iter().filter(|g| g.user == x.id).count(), 1);
        assert_eq!(d.grant_for(&x.id).unwrap().capability, Capability::Viewer);
        assert_eq!(d.assigned_to, Some(x.id));
        let forwarded = d.history.iter().filter(|e| e.action == HistoryAction::Forwarded).count();
        assert_eq!(forwarded, 2);
        assert_eq!(d.history.last().unwrap().details, "Forwarded to xavier");
    }

    #[test]
    fn test_forward_requires_owner_admin_or_assignee() {
        let owner = actor(Role::Employee);
        let editor = actor(Role::Employee);
        let mut doc = open_doc(&owner);
        doc.access_control.push(AccessGrant::new(editor.id, Capability::Editor));
        let target = user("t", None);
        assert!(forward(&doc, &editor, &target, Capability::Viewer, DateTime::now()).is_err());
        assert!(forward(&doc, &actor(Role::Admin), &target, Capability::Viewer, DateTime::now()).is_ok());
    }

    #[test]
    fn test_bulk_primitives() {
        let owner = actor(Role::Employee);
        let doc = open_doc(&owner);

        assert_eq!(
            close(&doc, &owner, Some(" "), DateTime::now()).unwrap_err().to_string(),
            "Missing closing message"
        );
        let closed = close(&doc, &owner, Some("done"), DateTime::now()).unwrap().document;
        assert_eq!(
            close(&closed, &owner, Some("again"), DateTime::now()).unwrap_err().to_string(),
            "Already closed"
        );

        let head = user("head", None);
        let assigned = assign(&doc, &owner, &head, DateTime::now());
        assert_eq!(assigned.document.assigned_to, Some(head.id));
        assert_eq!(assigned.events[0].action, HistoryAction::Assigned);
    }

    #[test]
    fn test_delete_authorization() {
        let owner = actor(Role::Employee);
        let doc = open_doc(&owner);
        assert!(authorize_delete(&doc, &owner).is_ok());
        assert!(authorize_delete(&doc, &actor(Role::Admin)).is_ok());
        assert!(authorize_delete(&doc, &actor(Role::Manager)).is_err());
    }
}
