//! # LiveData Codec
//!
//! JSON document value semantics and line framing for LiveData.
//!
//! This crate provides:
//! - Structural equality over JSON values ([`values_equal`])
//! - A total canonical order consistent with that equality ([`cmp_canonical`])
//! - Newline-delimited JSON framing ([`encode_line`], [`decode_line`])
//!
//! ## Value Rules
//!
//! - Object field order never affects equality
//! - Numbers compare by mathematical value (`1 == 1.0`, `-0 == 0`)
//! - Serialized text is never used for comparison
//!
//! ## Usage
//!
//! ```
//! use livedata_codec::{decode_line, encode_line, values_equal};
//! use serde_json::json;
//!
//! let value = json!({"n": 1, "tags": ["a", "b"]});
//! let line = encode_line(&value).unwrap();
//! let decoded = decode_line(&line).unwrap();
//! assert!(values_equal(&value, &decoded));
//! assert!(values_equal(&json!({"n": -0.0}), &json!({"n": 0})));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod line;
mod value;

pub use error::{CodecError, CodecResult};
pub use line::{decode_line, decode_object, encode_line};
pub use value::{cmp_canonical, cmp_numbers, objects_equal, type_name, values_equal};

pub use serde_json::{Map, Value};

/// A document's field map, in insertion order.
pub type Document = Map<String, Value>;
