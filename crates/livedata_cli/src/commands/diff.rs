//! Diff command implementation.

use livedata_codec::Document;
use livedata_core::{diff_snapshots, ChangeEvent, ChangeKind, Snapshot};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

/// Summary printed with JSON output.
#[derive(Debug, Serialize)]
pub struct DiffResult {
    /// Number of added documents.
    pub added: usize,
    /// Number of changed documents.
    pub changed: usize,
    /// Number of removed documents.
    pub removed: usize,
    /// The `data` messages a client would receive, in order.
    pub messages: Vec<serde_json::Value>,
}

/// Reads a snapshot file of the form `{collection: [documents]}`.
pub fn load_snapshot(path: &Path) -> Result<Snapshot, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Cannot read snapshot {:?}: {}", path, e))?;
    let collections: BTreeMap<String, Vec<Document>> = serde_json::from_str(&text)
        .map_err(|e| format!("Invalid snapshot {:?}: {}", path, e))?;

    let mut snapshot = Snapshot::new();
    for (collection, documents) in collections {
        for document in documents {
            snapshot
                .merge_document(&collection, document)
                .map_err(|e| format!("{:?}: {}", path, e))?;
        }
    }
    Ok(snapshot)
}

/// Renders change events as text or JSON.
pub fn render(events: Vec<ChangeEvent>, format: &str) -> Result<String, Box<dyn std::error::Error>> {
    let count = |kind: ChangeKind| events.iter().filter(|e| e.kind == kind).count();
    let (added, changed, removed) = (
        count(ChangeKind::Added),
        count(ChangeKind::Changed),
        count(ChangeKind::Removed),
    );

    let mut out = String::new();
    match format {
        "json" => {
            let messages = events
                .into_iter()
                .map(|e| serde_json::to_value(e.into_message()))
                .collect::<Result<Vec<_>, _>>()?;
            let result = DiffResult {
                added,
                changed,
                removed,
                messages,
            };
            out.push_str(&serde_json::to_string_pretty(&result)?);
            out.push('\n');
        }
        _ => {
            for event in &events {
                let marker = match event.kind {
                    ChangeKind::Added => '+',
                    ChangeKind::Changed => '~',
                    ChangeKind::Removed => '-',
                };
                write!(out, "{} {}", marker, event.key)?;
                if let Some(set) = &event.set {
                    write!(out, " set {}", serde_json::to_string(set)?)?;
                }
                if let Some(unset) = &event.unset {
                    write!(out, " unset [{}]", unset.join(", "))?;
                }
                out.push('\n');
            }
            writeln!(
                out,
                "{} added, {} changed, {} removed",
                added, changed, removed
            )?;
        }
    }
    Ok(out)
}

/// Runs the diff command.
pub fn run(old: &Path, new: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let old = load_snapshot(old)?;
    let new = load_snapshot(new)?;
    print!("{}", render(diff_snapshots(&old, &new), format)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_snapshot(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn events() -> Vec<ChangeEvent> {
        let old = write_snapshot(r#"{"items": [{"_id": "a", "n": 1, "tag": "x"}, {"_id": "b", "n": 2}]}"#);
        let new = write_snapshot(r#"{"items": [{"_id": "a", "n": 2}, {"_id": "c", "n": 3}]}"#);
        let old = load_snapshot(old.path()).unwrap();
        let new = load_snapshot(new.path()).unwrap();
        diff_snapshots(&old, &new)
    }

    #[test]
    fn text_output() {
        let text = render(events(), "text").unwrap();
        assert_eq!(
            text,
            "~ items/a set {\"n\":2} unset [tag]\n\
             + items/c set {\"n\":3}\n\
             - items/b unset [n]\n\
             1 added, 1 changed, 1 removed\n"
        );
    }

    #[test]
    fn json_output() {
        let json = render(events(), "json").unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["added"], 1);
        assert_eq!(value["removed"], 1);
        assert_eq!(value["messages"][0]["msg"], "data");
        assert_eq!(value["messages"][2]["unset"], serde_json::json!(["n"]));
    }

    #[test]
    fn invalid_snapshot() {
        let file = write_snapshot(r#"{"items": [{"n": 1}]}"#);
        assert!(load_snapshot(file.path()).is_err());
        let file = write_snapshot(r#"["not", "a", "map"]"#);
        assert!(load_snapshot(file.path()).is_err());
    }
}
