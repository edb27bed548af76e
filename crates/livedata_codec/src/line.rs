//! Newline-delimited JSON framing.
//!
//! Every frame is exactly one JSON value on a single line. Encoding never
//! emits pretty-printed output, so a frame can never contain a raw newline.

use crate::error::{CodecError, CodecResult};
use crate::value::type_name;
use serde::Serialize;
use serde_json::{Map, Value};

/// Encodes a value as a single JSON line, without the trailing newline.
pub fn encode_line<T: Serialize + ?Sized>(value: &T) -> CodecResult<String> {
    serde_json::to_string(value).map_err(|e| CodecError::encoding_failed(e.to_string()))
}

/// Decodes one frame into a JSON value.
pub fn decode_line(line: &str) -> CodecResult<Value> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(CodecError::EmptyFrame);
    }
    serde_json::from_str(trimmed).map_err(|e| CodecError::decoding_failed(e.to_string()))
}

/// Decodes one frame that must hold a JSON object.
pub fn decode_object(line: &str) -> CodecResult<Map<String, Value>> {
    match decode_line(line)? {
        Value::Object(map) => Ok(map),
        other => Err(CodecError::NotAnObject {
            found: type_name(&other),
        }),
    }
}
