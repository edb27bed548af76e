//! Field-level diff between two snapshots.
//!
//! [`diff_snapshots`] is pure: it reads two fixed snapshots and returns the
//! events that turn the first into the second on the client side.
//!
//! Events are ordered by the keys of the new snapshot, followed by the keys
//! that were removed, each group in key order.

use crate::document::{CacheKey, ID_FIELD};
use crate::snapshot::Snapshot;
use livedata_codec::{values_equal, Document, Value};
use livedata_protocol::ServerMessage;

/// Kind of change to one cached document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// The document is new to the client.
    Added,
    /// Some fields of the document changed.
    Changed,
    /// The document left the client's view.
    Removed,
}

/// A change to one cached document.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// Document identity.
    pub key: CacheKey,
    /// Kind of change.
    pub kind: ChangeKind,
    /// Fields added or changed. Never contains `_id`.
    pub set: Option<Document>,
    /// Names of removed fields. Never contains `_id`.
    pub unset: Option<Vec<String>>,
}

impl ChangeEvent {
    /// Converts the event into a `data` message.
    pub fn into_message(self) -> ServerMessage {
        ServerMessage::data(self.key.collection, self.key.id, self.set, self.unset)
    }
}

/// Computes the events turning `old` into `new`.
pub fn diff_snapshots(old: &Snapshot, new: &Snapshot) -> Vec<ChangeEvent> {
    let mut events = Vec::new();

    for (key, new_doc) in new {
        match old.get(key) {
            None => events.push(ChangeEvent {
                key: key.clone(),
                kind: ChangeKind::Added,
                set: Some(without_id(new_doc)),
                unset: None,
            }),
            Some(old_doc) => {
                if let Some(event) = diff_documents(key, old_doc, new_doc) {
                    events.push(event);
                }
            }
        }
    }

    for (key, old_doc) in old {
        if !new.contains_key(key) {
            events.push(ChangeEvent {
                key: key.clone(),
                kind: ChangeKind::Removed,
                set: None,
                unset: Some(field_names(old_doc)),
            });
        }
    }

    events
}

/// Diffs two versions of one document. Returns `None` when nothing changed.
fn diff_documents(key: &CacheKey, old: &Document, new: &Document) -> Option<ChangeEvent> {
    let set: Document = new
        .iter()
        .filter(|(field, _)| field.as_str() != ID_FIELD)
        .filter(|(field, value)| !old.get(*field).is_some_and(|prev| values_equal(prev, value)))
        .map(|(field, value)| (field.clone(), value.clone()))
        .collect();

    let unset: Vec<String> = old
        .keys()
        .filter(|field| field.as_str() != ID_FIELD && !new.contains_key(*field))
        .cloned()
        .collect();

    if set.is_empty() && unset.is_empty() {
        return None;
    }

    Some(ChangeEvent {
        key: key.clone(),
        kind: ChangeKind::Changed,
        set: (!set.is_empty()).then_some(set),
        unset: (!unset.is_empty()).then_some(unset),
    })
}

fn without_id(document: &Document) -> Document {
    document
        .iter()
        .filter(|(field, _)| field.as_str() != ID_FIELD)
        .map(|(field, value)| (field.clone(), value.clone()))
        .collect()
}

fn field_names(document: &Document) -> Vec<String> {
    document
        .keys()
        .filter(|field| field.as_str() != ID_FIELD)
        .cloned()
        .collect()
}

/// Applies the `set`/`unset` of an event to a field map.
pub fn apply_change(document: &mut Document, event: &ChangeEvent) {
    if let Some(set) = &event.set {
        for (field, value) in set {
            document.insert(field.clone(), value.clone());
        }
    }
    if let Some(unset) = &event.unset {
        for field in unset {
            document.remove(field);
        }
    }
}

/// Applies events to a snapshot the way a client cache would.
///
/// Added documents get their `_id` restored from the key's id text.
pub fn apply_events(snapshot: &mut Snapshot, events: &[ChangeEvent]) {
    for event in events {
        match event.kind {
            ChangeKind::Removed => {
                snapshot.remove(&event.key);
            }
            ChangeKind::Added | ChangeKind::Changed => {
                let mut document = snapshot.get(&event.key).cloned().unwrap_or_else(|| {
                    let mut doc = Document::new();
                    doc.insert(ID_FIELD.into(), Value::String(event.key.id.clone()));
                    doc
                });
                apply_change(&mut document, event);
                snapshot.insert(event.key.clone(), document);
            }
        }
    }
}
