//! Mutation envelopes.
//!
//! A mutation is any inbound object carrying a `collection` field:
//!
//! ```json
//! {"collection": "items", "type": "update", "id": "m1",
//!  "selector": {"_id": "a"}, "mutator": {"$inc": {"n": 1}}}
//! ```

use crate::error::{ProtocolError, ProtocolResult};
use livedata_codec::{encode_line, type_name, Document, Map, Value};
use serde_json::json;

/// Options for an update mutation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Update every matching document instead of the first one.
    pub multi: bool,
    /// Insert a document when nothing matches.
    pub upsert: bool,
}

impl UpdateOptions {
    /// Sets the `multi` flag.
    #[must_use]
    pub fn with_multi(mut self, multi: bool) -> Self {
        self.multi = multi;
        self
    }

    /// Sets the `upsert` flag.
    #[must_use]
    pub fn with_upsert(mut self, upsert: bool) -> Self {
        self.upsert = upsert;
        self
    }
}

/// The write a mutation performs.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOp {
    /// Insert one document.
    Insert {
        /// The document to insert.
        document: Document,
    },
    /// Modify documents matching a selector.
    Update {
        /// Selector object or document id string.
        selector: Value,
        /// Modifier (`$set`, `$unset`, `$inc`) or replacement document.
        modifier: Document,
        /// Update options.
        options: UpdateOptions,
    },
    /// Remove documents matching a selector.
    Remove {
        /// Selector object or document id string.
        selector: Value,
    },
    /// Invoke a collection method.
    Method {
        /// Method name.
        method: String,
        /// Positional arguments.
        args: Vec<Value>,
    },
}

impl MutationOp {
    /// Returns the envelope `type` of this operation.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Insert { .. } => "insert",
            Self::Update { .. } => "update",
            Self::Remove { .. } => "remove",
            Self::Method { .. } => "method",
        }
    }
}

/// A client-initiated write against a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationRequest {
    /// Request id echoed in the acknowledgement.
    pub id: Option<String>,
    /// Target collection.
    pub collection: String,
    /// The operation.
    pub op: MutationOp,
}

impl MutationRequest {
    /// Creates an insert request.
    pub fn insert(collection: impl Into<String>, document: Document) -> Self {
        Self::new(collection, MutationOp::Insert { document })
    }

    /// Creates an update request.
    pub fn update(
        collection: impl Into<String>,
        selector: Value,
        modifier: Document,
        options: UpdateOptions,
    ) -> Self {
        Self::new(
            collection,
            MutationOp::Update {
                selector,
                modifier,
                options,
            },
        )
    }

    /// Creates a remove request.
    pub fn remove(collection: impl Into<String>, selector: Value) -> Self {
        Self::new(collection, MutationOp::Remove { selector })
    }

    /// Creates a method invocation request.
    pub fn method(collection: impl Into<String>, method: impl Into<String>, args: Vec<Value>) -> Self {
        Self::new(
            collection,
            MutationOp::Method {
                method: method.into(),
                args,
            },
        )
    }

    fn new(collection: impl Into<String>, op: MutationOp) -> Self {
        Self {
            id: None,
            collection: collection.into(),
            op,
        }
    }

    /// Sets the request id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Converts to the wire envelope.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("collection".into(), Value::String(self.collection.clone()));
        map.insert("type".into(), Value::String(self.op.kind().into()));
        if let Some(id) = &self.id {
            map.insert("id".into(), Value::String(id.clone()));
        }
        match &self.op {
            MutationOp::Insert { document } => {
                map.insert("args".into(), Value::Object(document.clone()));
            }
            MutationOp::Update {
                selector,
                modifier,
                options,
            } => {
                map.insert("selector".into(), selector.clone());
                map.insert("mutator".into(), Value::Object(modifier.clone()));
                map.insert(
                    "options".into(),
                    json!({"multi": options.multi, "upsert": options.upsert}),
                );
            }
            MutationOp::Remove { selector } => {
                map.insert("selector".into(), selector.clone());
            }
            MutationOp::Method { method, args } => {
                map.insert("method".into(), Value::String(method.clone()));
                map.insert("args".into(), Value::Array(args.clone()));
            }
        }
        Value::Object(map)
    }

    /// Encodes to a JSON line.
    pub fn encode(&self) -> ProtocolResult<String> {
        Ok(encode_line(&self.to_value())?)
    }

    /// Decodes a mutation envelope.
    ///
    /// Errors carry the envelope's `id` when it had a usable one, so the
    /// caller can still answer with a failed acknowledgement.
    pub fn from_map(map: &Map<String, Value>) -> ProtocolResult<Self> {
        let id = map.get("id").and_then(Value::as_str).map(str::to_owned);
        Self::decode_fields(map, id.clone()).map_err(|e| e.with_correlation_id(id))
    }

    fn decode_fields(map: &Map<String, Value>, id: Option<String>) -> ProtocolResult<Self> {
        let get_field = |name: &str| map.get(name).filter(|v| !v.is_null());

        let collection = get_field("collection")
            .and_then(Value::as_str)
            .ok_or_else(|| ProtocolError::malformed("collection must be a string"))?
            .to_owned();

        let kind = get_field("type")
            .and_then(Value::as_str)
            .ok_or_else(|| ProtocolError::malformed("missing mutation type"))?;

        let op = match kind {
            "insert" => {
                let document = match get_field("args") {
                    Some(Value::Object(doc)) => doc.clone(),
                    Some(other) => {
                        return Err(ProtocolError::malformed(format!(
                            "insert args must be an object, found {}",
                            type_name(other)
                        )))
                    }
                    None => return Err(ProtocolError::malformed("insert requires args")),
                };
                MutationOp::Insert { document }
            }
            "update" => {
                let selector = selector_field(get_field("selector"))?;
                let modifier = match get_field("mutator") {
                    Some(Value::Object(doc)) => doc.clone(),
                    Some(other) => {
                        return Err(ProtocolError::malformed(format!(
                            "mutator must be an object, found {}",
                            type_name(other)
                        )))
                    }
                    None => return Err(ProtocolError::malformed("update requires a mutator")),
                };
                let options = match get_field("options") {
                    None => UpdateOptions::default(),
                    Some(Value::Object(opts)) => UpdateOptions {
                        multi: opts.get("multi").and_then(Value::as_bool).unwrap_or(false),
                        upsert: opts.get("upsert").and_then(Value::as_bool).unwrap_or(false),
                    },
                    Some(_) => return Err(ProtocolError::malformed("options must be an object")),
                };
                MutationOp::Update {
                    selector,
                    modifier,
                    options,
                }
            }
            "remove" => MutationOp::Remove {
                selector: selector_field(get_field("selector"))?,
            },
            "method" => {
                let method = get_field("method")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ProtocolError::malformed("method name must be a string"))?
                    .to_owned();
                let args = match get_field("args") {
                    None => Vec::new(),
                    Some(Value::Array(args)) => args.clone(),
                    Some(_) => return Err(ProtocolError::malformed("method args must be an array")),
                };
                MutationOp::Method { method, args }
            }
            other => {
                return Err(ProtocolError::malformed(format!(
                    "unknown mutation type: {other}"
                )))
            }
        };

        Ok(Self { id, collection, op })
    }
}

/// A missing selector matches everything.
fn selector_field(value: Option<&Value>) -> ProtocolResult<Value> {
    match value {
        None => Ok(Value::Object(Map::new())),
        Some(v @ (Value::Object(_) | Value::String(_))) => Ok(v.clone()),
        Some(other) => Err(ProtocolError::malformed(format!(
            "selector must be an object or an id, found {}",
            type_name(other)
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(value: Value) -> ProtocolResult<MutationRequest> {
        match value {
            Value::Object(map) => MutationRequest::from_map(&map),
            _ => unreachable!(),
        }
    }

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn decode_insert() {
        let request = decode(json!({
            "collection": "items", "type": "insert", "id": "m1",
            "args": {"_id": "a", "n": 1}
        }))
        .unwrap();
        assert_eq!(
            request,
            MutationRequest::insert("items", doc(json!({"_id": "a", "n": 1}))).with_id("m1")
        );
    }

    #[test]
    fn decode_update_with_defaults() {
        let request = decode(json!({
            "collection": "items", "type": "update",
            "mutator": {"$set": {"n": 2}}
        }))
        .unwrap();
        match request.op {
            MutationOp::Update {
                selector, options, ..
            } => {
                assert_eq!(selector, json!({}));
                assert_eq!(options, UpdateOptions::default());
            }
            other => panic!("unexpected op {other:?}"),
        }
        assert_eq!(request.id, None);
    }

    #[test]
    fn decode_update_options() {
        let request = decode(json!({
            "collection": "items", "type": "update", "selector": "a",
            "mutator": {"n": 3}, "options": {"multi": true, "upsert": true}
        }))
        .unwrap();
        assert_eq!(
            request.op,
            MutationOp::Update {
                selector: json!("a"),
                modifier: doc(json!({"n": 3})),
                options: UpdateOptions::default().with_multi(true).with_upsert(true),
            }
        );
    }

    #[test]
    fn decode_method_without_args() {
        let request = decode(json!({
            "collection": "items", "type": "method", "method": "reset"
        }))
        .unwrap();
        assert_eq!(request, MutationRequest::method("items", "reset", vec![]));
    }

    #[test]
    fn malformed_keeps_correlation_id() {
        let err = decode(json!({"collection": "items", "type": "update", "id": "m9"})).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed { .. }));
        assert_eq!(err.correlation_id(), Some("m9"));

        let err = decode(json!({"collection": "items", "type": "drop", "id": "m10"})).unwrap_err();
        assert_eq!(err.correlation_id(), Some("m10"));
    }

    #[test]
    fn rejects_bad_selector_type() {
        let err = decode(json!({"collection": "items", "type": "remove", "selector": 5}))
            .unwrap_err();
        assert!(err.to_string().contains("selector"));
    }

    #[test]
    fn rejects_non_string_collection() {
        assert!(decode(json!({"collection": 1, "type": "remove"})).is_err());
    }

    #[test]
    fn envelope_shape() {
        let request = MutationRequest::remove("items", json!({"n": {"$gt": 1}})).with_id("m2");
        assert_eq!(
            request.to_value(),
            json!({"collection": "items", "type": "remove", "id": "m2", "selector": {"n": {"$gt": 1}}})
        );
        let decoded = decode(request.to_value()).unwrap();
        assert_eq!(decoded, request);
    }
}
