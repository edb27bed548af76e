//! Subscription and data messages.

use crate::error::{ProtocolError, ProtocolResult, WireError};
use livedata_codec::{decode_line, encode_line, Document, Value};
use serde::{Deserialize, Serialize};

/// A subscription message from a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msg", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Subscribe to a publication.
    Sub {
        /// Client-chosen subscription id.
        id: String,
        /// Publication name.
        name: String,
        /// Publication parameters.
        #[serde(default)]
        params: Value,
    },
    /// Drop a subscription.
    Unsub {
        /// Subscription id to drop.
        id: String,
    },
}

impl ClientMessage {
    /// Creates a subscribe message.
    pub fn sub(id: impl Into<String>, name: impl Into<String>, params: Value) -> Self {
        Self::Sub {
            id: id.into(),
            name: name.into(),
            params,
        }
    }

    /// Creates an unsubscribe message.
    pub fn unsub(id: impl Into<String>) -> Self {
        Self::Unsub { id: id.into() }
    }

    /// Returns the subscription id the message refers to.
    pub fn subscription_id(&self) -> &str {
        match self {
            Self::Sub { id, .. } | Self::Unsub { id } => id,
        }
    }

    /// Encodes to a JSON line.
    pub fn encode(&self) -> ProtocolResult<String> {
        Ok(encode_line(self)?)
    }
}

/// A message from the server to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msg", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Fields of one document changed in the client's cache.
    Data {
        /// Collection name.
        collection: String,
        /// Document id.
        id: String,
        /// Fields added or changed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        set: Option<Document>,
        /// Fields removed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        unset: Option<Vec<String>>,
    },
    /// A subscription is gone (unsubscribe acknowledgement or refusal).
    Nosub {
        /// Subscription id.
        id: String,
        /// Present when the subscription was refused.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<WireError>,
    },
    /// The first full data set of a subscription has been sent.
    SubscriptionReady {
        /// Subscription id.
        id: String,
    },
    /// Outcome of a mutation request.
    #[serde(rename = "result")]
    MutationResult {
        /// Request id echoed back from the mutation envelope.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        /// Value produced by a successful mutation.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        /// Present when the mutation failed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<WireError>,
    },
}

impl ServerMessage {
    /// Creates a data message.
    pub fn data(
        collection: impl Into<String>,
        id: impl Into<String>,
        set: Option<Document>,
        unset: Option<Vec<String>>,
    ) -> Self {
        Self::Data {
            collection: collection.into(),
            id: id.into(),
            set,
            unset,
        }
    }

    /// Creates an unsubscribe acknowledgement.
    pub fn nosub(id: impl Into<String>) -> Self {
        Self::Nosub {
            id: id.into(),
            error: None,
        }
    }

    /// Creates a subscription refusal.
    pub fn nosub_error(id: impl Into<String>, error: WireError) -> Self {
        Self::Nosub {
            id: id.into(),
            error: Some(error),
        }
    }

    /// Creates a readiness notification.
    pub fn ready(id: impl Into<String>) -> Self {
        Self::SubscriptionReady { id: id.into() }
    }

    /// Creates a successful mutation acknowledgement.
    pub fn mutation_ok(id: Option<String>, result: Value) -> Self {
        Self::MutationResult {
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Creates a failed mutation acknowledgement.
    pub fn mutation_failed(id: Option<String>, error: WireError) -> Self {
        Self::MutationResult {
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Returns the `msg` tag of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Data { .. } => "data",
            Self::Nosub { .. } => "nosub",
            Self::SubscriptionReady { .. } => "subscription_ready",
            Self::MutationResult { .. } => "result",
        }
    }

    /// Encodes to a JSON line.
    pub fn encode(&self) -> ProtocolResult<String> {
        Ok(encode_line(self)?)
    }

    /// Decodes from a JSON line.
    pub fn decode(line: &str) -> ProtocolResult<Self> {
        let value = decode_line(line)?;
        serde_json::from_value(value).map_err(|e| ProtocolError::malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn to_json(message: &ServerMessage) -> Value {
        serde_json::from_str(&message.encode().unwrap()).unwrap()
    }

    #[test]
    fn data_message_omits_absent_fields() {
        let mut set = Document::new();
        set.insert("n".into(), json!(1));
        let message = ServerMessage::data("items", "a", Some(set), None);

        assert_eq!(
            to_json(&message),
            json!({"msg": "data", "collection": "items", "id": "a", "set": {"n": 1}})
        );

        let message = ServerMessage::data("items", "a", None, Some(vec!["n".into()]));
        assert_eq!(
            to_json(&message),
            json!({"msg": "data", "collection": "items", "id": "a", "unset": ["n"]})
        );
    }

    #[test]
    fn tag_comes_first() {
        let line = ServerMessage::ready("s1").encode().unwrap();
        assert_eq!(line, r#"{"msg":"subscription_ready","id":"s1"}"#);
    }

    #[test]
    fn nosub_with_and_without_error() {
        assert_eq!(to_json(&ServerMessage::nosub("s1")), json!({"msg": "nosub", "id": "s1"}));
        assert_eq!(
            to_json(&ServerMessage::nosub_error("s1", WireError::unknown_publication())),
            json!({"msg": "nosub", "id": "s1", "error": {"error": 404, "reason": "Unknown name"}})
        );
    }

    #[test]
    fn mutation_result_shapes() {
        assert_eq!(
            to_json(&ServerMessage::mutation_ok(Some("m1".into()), json!(2))),
            json!({"msg": "result", "id": "m1", "result": 2})
        );
        assert_eq!(
            to_json(&ServerMessage::mutation_failed(None, WireError::new(404, "nope"))),
            json!({"msg": "result", "error": {"error": 404, "reason": "nope"}})
        );
    }

    #[test]
    fn server_message_decode() {
        let decoded = ServerMessage::decode(r#"{"msg":"data","collection":"c","id":"x","unset":["a"]}"#)
            .unwrap();
        assert_eq!(
            decoded,
            ServerMessage::data("c", "x", None, Some(vec!["a".into()]))
        );
        assert_eq!(decoded.kind(), "data");
    }

    #[test]
    fn client_message_params_default_to_null() {
        let message: ClientMessage =
            serde_json::from_value(json!({"msg": "sub", "id": "s1", "name": "counters"})).unwrap();
        assert_eq!(message, ClientMessage::sub("s1", "counters", Value::Null));
        assert_eq!(message.subscription_id(), "s1");
    }

    #[test]
    fn client_message_encode() {
        let line = ClientMessage::unsub("s1").encode().unwrap();
        assert_eq!(line, r#"{"msg":"unsub","id":"s1"}"#);
    }
}
