//! Property-based test generators using proptest.
//!
//! Field names and ids are drawn from small alphabets so that generated
//! snapshots overlap often enough to exercise the changed path of the diff.

use livedata_codec::{Document, Map, Value};
use livedata_core::{CacheKey, Snapshot, ID_FIELD};
use proptest::prelude::*;

/// Strategy for field names other than `_id`.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-e]{1,2}").expect("Invalid regex")
}

/// Strategy for collection names.
pub fn collection_name_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["items", "users", "tasks"]).prop_map(str::to_owned)
}

/// Strategy for document ids.
pub fn document_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-f]{1,2}").expect("Invalid regex")
}

/// Strategy for JSON scalars, including `-0.0` and integral floats.
pub fn scalar_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-5i64..5).prop_map(Value::from),
        prop::sample::select(vec![-0.0f64, 0.0, 1.0, 1.5, -2.25]).prop_map(Value::from),
        prop::string::string_regex("[xyz]{0,3}")
            .expect("Invalid regex")
            .prop_map(Value::String),
    ]
}

/// Strategy for nested JSON values.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    scalar_value_strategy().prop_recursive(3, 16, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map(field_name_strategy(), inner, 0..4)
                .prop_map(|fields| Value::Object(fields.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

/// Strategy for documents without an `_id`.
pub fn document_strategy() -> impl Strategy<Value = Document> {
    prop::collection::btree_map(field_name_strategy(), value_strategy(), 0..5)
        .prop_map(|fields| fields.into_iter().collect())
}

/// Strategy for snapshots whose documents carry an `_id` matching their key.
pub fn snapshot_strategy() -> impl Strategy<Value = Snapshot> {
    prop::collection::vec(
        (collection_name_strategy(), document_id_strategy(), document_strategy()),
        0..8,
    )
    .prop_map(|entries| {
        entries
            .into_iter()
            .map(|(collection, id, fields)| {
                let mut document = Document::new();
                document.insert(ID_FIELD.into(), Value::String(id.clone()));
                document.extend(fields);
                (CacheKey::new(collection, id), document)
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn documents_have_no_id(document in document_strategy()) {
            prop_assert!(!document.contains_key(ID_FIELD));
        }

        #[test]
        fn snapshot_ids_match_keys(snapshot in snapshot_strategy()) {
            for (key, document) in &snapshot {
                prop_assert_eq!(document[ID_FIELD].as_str(), Some(key.id.as_str()));
            }
        }
    }
}
