//! Per-document history ledger
//!
//! Events are collected in an `EventBatch` while a mutation is computed and
//! appended to the document in one step once the mutation is known to succeed.
//! Nothing here edits or removes an existing event.

use bson::DateTime;

use crate::auth::Actor;
use crate::db::schemas::{DocumentDoc, HistoryAction, HistoryEvent};

/// Unique event id
pub fn mint_event_id() -> String {
    format!("EVT-{}", uuid::Uuid::new_v4().simple())
}

/// Events produced by one mutating call, in the order they were recorded
#[derive(Debug)]
pub struct EventBatch<'a> {
    actor: &'a Actor,
    now: DateTime,
    events: Vec<HistoryEvent>,
}

impl<'a> EventBatch<'a> {
    pub fn new(actor: &'a Actor, now: DateTime) -> Self {
        Self {
            actor,
            now,
            events: Vec::new(),
        }
    }

    pub fn record(&mut self, action: HistoryAction, details: impl Into<String>) {
        self.events.push(HistoryEvent {
            event_id: mint_event_id(),
            action,
            performed_by: self.actor.id,
            performed_by_name: self.actor.username.clone(),
            timestamp: self.now,
            details: details.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Append the batch to `doc` and return what was appended
    pub fn commit(self, doc: &mut DocumentDoc) -> Vec<HistoryEvent> {
        doc.history.extend(self.events.iter().cloned());
        self.events
    }
}

/// True if `after` keeps every event of `before`, unchanged and in order
pub fn is_append_only(before: &[HistoryEvent], after: &[HistoryEvent]) -> bool {
    after.len() >= before.len() && after.iter().zip(before).all(|(a, b)| a == b)
}
