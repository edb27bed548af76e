//! Classification of inbound frames.

use crate::error::{ProtocolError, ProtocolResult};
use crate::messages::ClientMessage;
use crate::mutation::MutationRequest;
use livedata_codec::{decode_object, Map, Value};

/// A decoded frame from a client.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A subscription message (`sub` / `unsub`).
    Client(ClientMessage),
    /// A mutation envelope.
    Mutation(MutationRequest),
}

/// Decodes one inbound line.
///
/// Objects carrying `msg` are subscription messages, objects carrying
/// `collection` are mutations. Everything else is malformed.
pub fn decode_inbound(line: &str) -> ProtocolResult<Inbound> {
    let map = decode_object(line)?;
    classify(map)
}

/// Classifies an already decoded object.
pub fn classify(map: Map<String, Value>) -> ProtocolResult<Inbound> {
    if let Some(msg) = map.get("msg") {
        let msg = msg
            .as_str()
            .ok_or_else(|| ProtocolError::malformed("msg must be a string"))?;
        if msg != "sub" && msg != "unsub" {
            return Err(ProtocolError::UnknownMessageType { msg: msg.to_owned() });
        }
        return serde_json::from_value(Value::Object(map))
            .map(Inbound::Client)
            .map_err(|e| ProtocolError::malformed(e.to_string()));
    }

    if map.contains_key("collection") {
        return MutationRequest::from_map(&map).map(Inbound::Mutation);
    }

    Err(ProtocolError::malformed("frame has neither msg nor collection"))
}
