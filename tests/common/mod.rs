//! Shared fixtures for integration tests: services wired to in-memory stores

#![allow(dead_code)]

use bson::oid::ObjectId;
use doctrack::audit::AuditTrail;
use doctrack::auth::{Actor, Role};
use doctrack::db::schemas::{DocumentDoc, UserDoc};
use doctrack::services::{DocumentService, DocumentView, UserDirectory};
use doctrack::store::Stores;
use doctrack::workflow::NewDocument;

pub struct Harness {
    pub stores: Stores,
    pub documents: DocumentService,
    pub users: UserDirectory,
    pub audit: AuditTrail,
}

impl Harness {
    /// Must be called inside a tokio runtime
    pub fn new() -> Self {
        Self::with_stores(Stores::memory())
    }

    pub fn with_stores(stores: Stores) -> Self {
        let audit = AuditTrail::spawn(stores.audit.clone(), 256);
        Self {
            documents: DocumentService::new(stores.clone(), audit.clone(), "DOC"),
            users: UserDirectory::new(stores.users.clone(), audit.clone()),
            stores,
            audit,
        }
    }

    /// Insert a user straight into storage and return it as an actor
    pub async fn user(&self, username: &str, role: Role) -> Actor {
        let user = UserDoc::new(username.into(), "not-a-real-hash".into(), role, None);
        self.stores.users.insert(&user).await.expect("seed user");
        Actor::new(user.id, username, role)
    }

    pub async fn create(&self, actor: &Actor, title: &str) -> DocumentView {
        self.documents
            .create(actor, draft(title))
            .await
            .expect("create document")
    }

    /// Stored record behind a view
    pub async fn stored(&self, view: &DocumentView) -> DocumentDoc {
        let id = ObjectId::parse_str(&view.id).expect("view id");
        self.stores
            .documents
            .get(&id)
            .await
            .expect("storage")
            .expect("document exists")
    }
}

pub fn draft(title: &str) -> NewDocument {
    NewDocument {
        title: title.into(),
        content: format!("{title} body"),
        ..Default::default()
    }
}

pub fn oid(view: &DocumentView) -> ObjectId {
    ObjectId::parse_str(&view.id).expect("view id")
}
