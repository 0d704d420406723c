//! Administrative audit trail
//!
//! Entries are handed to a single background writer over a bounded queue.
//! Recording never waits and never fails: a full queue or a failed store write
//! drops the entry with a warning. Delivery is at most once.

use bson::oid::ObjectId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::auth::Actor;
use crate::db::schemas::{AuditAction, AuditLogDoc, TargetModel};
use crate::store::AuditStore;
use crate::types::{DoctrackError, Result};

pub const DEFAULT_LIST_LIMIT: u64 = 50;
pub const MAX_LIST_LIMIT: u64 = 100;

enum AuditMessage {
    Entry(AuditLogDoc),
    /// Answered once every entry queued before it has been handled
    Flush(oneshot::Sender<()>),
}

/// Handle to the audit writer. Cheap to clone.
#[derive(Clone)]
pub struct AuditTrail {
    tx: mpsc::Sender<AuditMessage>,
    store: Arc<dyn AuditStore>,
    dropped: Arc<AtomicU64>,
}

impl AuditTrail {
    /// Start the writer task. Must be called inside a tokio runtime.
    pub fn spawn(store: Arc<dyn AuditStore>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));

        tokio::spawn(writer_task(rx, Arc::clone(&store), Arc::clone(&dropped)));
        info!("Audit trail writer started (queue capacity {})", capacity);

        Self { tx, store, dropped }
    }

    /// Queue an entry without waiting
    pub fn record(
        &self,
        action: AuditAction,
        target_model: TargetModel,
        target_id: ObjectId,
        actor: &Actor,
        details: serde_json::Value,
    ) {
        let entry = AuditLogDoc::new(action, target_model, target_id, actor.id, details);
        if let Err(e) = self.tx.try_send(AuditMessage::Entry(entry)) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            let reason = match e {
                mpsc::error::TrySendError::Full(_) => "queue full",
                mpsc::error::TrySendError::Closed(_) => "writer stopped",
            };
            warn!(%action, ?target_model, %target_id, reason, "Audit entry dropped");
        }
    }

    /// Wait until everything queued so far has been written or dropped
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(AuditMessage::Flush(done_tx)).await.is_err() {
            return;
        }
        let _ = done_rx.await;
    }

    /// Entries that never reached the store
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Newest first. Admin only.
    pub async fn list(
        &self,
        actor: &Actor,
        target_id: Option<ObjectId>,
        limit: Option<u64>,
        skip: Option<u64>,
    ) -> Result<Vec<AuditLogDoc>> {
        if !actor.is_document_admin() {
            return Err(DoctrackError::AuthorizationDenied(
                "Only administrators may read the audit log".into(),
            ));
        }
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
        self.store.list(target_id, skip.unwrap_or(0), limit).await
    }
}

async fn writer_task(
    mut rx: mpsc::Receiver<AuditMessage>,
    store: Arc<dyn AuditStore>,
    dropped: Arc<AtomicU64>,
) {
    while let Some(message) = rx.recv().await {
        match message {
            AuditMessage::Entry(entry) => match store.append(&entry).await {
                Ok(()) => debug!(action = %entry.action, target = %entry.target_id, "Audit entry written"),
                Err(e) => {
                    dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, action = %entry.action, target = %entry.target_id, "Audit write failed");
                }
            },
            AuditMessage::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    info!("Audit trail writer stopped");
}
