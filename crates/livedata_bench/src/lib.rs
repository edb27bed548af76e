//! Benchmark utilities.

#![warn(missing_docs)]

use livedata_codec::{Document, Value};
use livedata_core::{CacheKey, Snapshot};
use rand::Rng;
use serde_json::json;

/// Generate a random document with `_id` and `fields` numeric fields.
pub fn random_document(id: &str, fields: usize) -> Document {
    let mut rng = rand::thread_rng();
    let mut document = Document::new();
    document.insert("_id".into(), Value::String(id.to_owned()));
    for i in 0..fields {
        document.insert(format!("f{}", i), json!(rng.gen_range(0..1000)));
    }
    document.insert("tags".into(), json!(["a", "b", rng.gen_range(0..10)]));
    document
}

/// Generate a snapshot of `count` documents in collection `items`.
pub fn generate_snapshot(count: usize, fields: usize) -> Snapshot {
    (0..count)
        .map(|i| {
            let id = format!("doc{:06}", i);
            (CacheKey::new("items", id.as_str()), random_document(&id, fields))
        })
        .collect()
}

/// Copy `base`, changing one field in `percent`% of the documents and
/// dropping every hundredth document.
pub fn mutate_snapshot(base: &Snapshot, percent: u32) -> Snapshot {
    let mut rng = rand::thread_rng();
    base.iter()
        .enumerate()
        .filter(|(i, _)| i % 100 != 99)
        .map(|(_, (key, document))| {
            let mut document = document.clone();
            if rng.gen_range(0..100) < percent {
                document.insert("f0".into(), json!(rng.gen_range(1000..2000)));
            }
            (key.clone(), document)
        })
        .collect()
}
