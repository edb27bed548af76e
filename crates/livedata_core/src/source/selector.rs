//! Mongo-style selector matching.
//!
//! A selector is a document whose keys are dotted field paths or the logical
//! operators `$and`, `$or`, `$nor`. A field's condition is either a value
//! (equality) or an object of comparison operators:
//! `$eq $ne $gt $gte $lt $lte $in $nin $exists`.
//!
//! Equality is structural. Ordering comparisons only match values of the
//! same JSON type. When the field holds an array, a condition on a
//! non-array operand matches if any element satisfies it.

use crate::document::{lookup_path, ID_FIELD};
use crate::error::{CoreError, CoreResult};
use livedata_codec::{cmp_canonical, type_name, values_equal, Document, Value};
use std::cmp::Ordering;

/// Normalizes a mutation selector: a bare id string selects by `_id`.
pub fn selector_document(selector: &Value) -> CoreResult<Document> {
    match selector {
        Value::Object(map) => Ok(map.clone()),
        Value::String(id) => {
            let mut map = Document::new();
            map.insert(ID_FIELD.into(), Value::String(id.clone()));
            Ok(map)
        }
        Value::Null => Ok(Document::new()),
        other => Err(CoreError::invalid_selector(format!(
            "selector must be an object or an id, found {}",
            type_name(other)
        ))),
    }
}

/// A field comparison.
#[derive(Debug, Clone, PartialEq)]
enum FieldOp {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
}

#[derive(Debug, Clone, PartialEq)]
enum Clause {
    Field { path: String, op: FieldOp },
    And(Vec<Selector>),
    Or(Vec<Selector>),
    Nor(Vec<Selector>),
}

/// A compiled selector.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selector {
    clauses: Vec<Clause>,
}

impl Selector {
    /// Compiles a selector document.
    pub fn compile(selector: &Document) -> CoreResult<Self> {
        let mut clauses = Vec::with_capacity(selector.len());
        for (key, condition) in selector {
            match key.as_str() {
                "$and" => clauses.push(Clause::And(compile_list(key, condition)?)),
                "$or" => clauses.push(Clause::Or(compile_list(key, condition)?)),
                "$nor" => clauses.push(Clause::Nor(compile_list(key, condition)?)),
                op if op.starts_with('$') => {
                    return Err(CoreError::invalid_selector(format!(
                        "unknown top-level operator {op}"
                    )))
                }
                path => compile_condition(path, condition, &mut clauses)?,
            }
        }
        Ok(Self { clauses })
    }

    /// Returns true if the selector matches every document.
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Tests a document.
    pub fn matches(&self, document: &Document) -> bool {
        self.clauses.iter().all(|clause| match clause {
            Clause::Field { path, op } => field_matches(lookup_path(document, path), op),
            Clause::And(all) => all.iter().all(|s| s.matches(document)),
            Clause::Or(any) => any.iter().any(|s| s.matches(document)),
            Clause::Nor(none) => !none.iter().any(|s| s.matches(document)),
        })
    }

    /// Returns the `_id` the selector pins by plain equality, if any.
    pub fn pinned_id(&self) -> Option<&Value> {
        self.clauses.iter().find_map(|clause| match clause {
            Clause::Field {
                path,
                op: FieldOp::Eq(value),
            } if path == ID_FIELD => Some(value),
            _ => None,
        })
    }

    /// Fields fixed by top-level equality clauses, used to seed upserts.
    pub fn equality_fields(&self) -> Document {
        self.clauses
            .iter()
            .filter_map(|clause| match clause {
                Clause::Field {
                    path,
                    op: FieldOp::Eq(value),
                } if !path.contains('.') => Some((path.clone(), value.clone())),
                _ => None,
            })
            .collect()
    }
}

fn compile_list(op: &str, value: &Value) -> CoreResult<Vec<Selector>> {
    let items = value
        .as_array()
        .filter(|items| !items.is_empty())
        .ok_or_else(|| CoreError::invalid_selector(format!("{op} needs a non-empty array")))?;
    items
        .iter()
        .map(|item| match item {
            Value::Object(map) => Selector::compile(map),
            other => Err(CoreError::invalid_selector(format!(
                "{op} entries must be objects, found {}",
                type_name(other)
            ))),
        })
        .collect()
}

fn compile_condition(path: &str, condition: &Value, clauses: &mut Vec<Clause>) -> CoreResult<()> {
    let operators = match condition {
        Value::Object(map) if !map.is_empty() && map.keys().all(|k| k.starts_with('$')) => map,
        Value::Object(map) if map.keys().any(|k| k.starts_with('$')) => {
            return Err(CoreError::invalid_selector(format!(
                "cannot mix operators and fields in condition on {path}"
            )))
        }
        literal => {
            clauses.push(Clause::Field {
                path: path.to_owned(),
                op: FieldOp::Eq(literal.clone()),
            });
            return Ok(());
        }
    };

    for (name, operand) in operators {
        let op = match name.as_str() {
            "$eq" => FieldOp::Eq(operand.clone()),
            "$ne" => FieldOp::Ne(operand.clone()),
            "$gt" => FieldOp::Gt(operand.clone()),
            "$gte" => FieldOp::Gte(operand.clone()),
            "$lt" => FieldOp::Lt(operand.clone()),
            "$lte" => FieldOp::Lte(operand.clone()),
            "$in" => FieldOp::In(operand_list(name, operand)?),
            "$nin" => FieldOp::Nin(operand_list(name, operand)?),
            "$exists" => FieldOp::Exists(truthy(operand)),
            other => {
                return Err(CoreError::invalid_selector(format!(
                    "unknown operator {other} on {path}"
                )))
            }
        };
        clauses.push(Clause::Field {
            path: path.to_owned(),
            op,
        });
    }
    Ok(())
}

fn operand_list(op: &str, operand: &Value) -> CoreResult<Vec<Value>> {
    operand
        .as_array()
        .cloned()
        .ok_or_else(|| CoreError::invalid_selector(format!("{op} needs an array")))
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => true,
    }
}

fn field_matches(actual: Option<&Value>, op: &FieldOp) -> bool {
    match op {
        FieldOp::Eq(expected) => equals(actual, expected),
        FieldOp::Ne(expected) => !equals(actual, expected),
        FieldOp::In(options) => options.iter().any(|expected| equals(actual, expected)),
        FieldOp::Nin(options) => !options.iter().any(|expected| equals(actual, expected)),
        FieldOp::Exists(wanted) => actual.is_some() == *wanted,
        FieldOp::Gt(bound) => compares(actual, bound, |o| o == Ordering::Greater),
        FieldOp::Gte(bound) => compares(actual, bound, |o| o != Ordering::Less),
        FieldOp::Lt(bound) => compares(actual, bound, |o| o == Ordering::Less),
        FieldOp::Lte(bound) => compares(actual, bound, |o| o != Ordering::Greater),
    }
}

/// A missing field equals `null`.
fn equals(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        None => expected.is_null(),
        Some(value) if values_equal(value, expected) => true,
        Some(Value::Array(items)) if !expected.is_array() => {
            items.iter().any(|item| values_equal(item, expected))
        }
        Some(_) => false,
    }
}

fn compares(actual: Option<&Value>, bound: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    let same_type = |value: &Value| type_name(value) == type_name(bound);
    match actual {
        None => false,
        Some(Value::Array(items)) if !bound.is_array() => items
            .iter()
            .any(|item| same_type(item) && accept(cmp_canonical(item, bound))),
        Some(value) => same_type(value) && accept(cmp_canonical(value, bound)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn matches(selector: Value, document: Value) -> bool {
        Selector::compile(&doc(selector)).unwrap().matches(&doc(document))
    }

    #[test]
    fn empty_selector_matches_everything() {
        assert!(matches(json!({}), json!({"_id": "a"})));
    }

    #[test]
    fn equality_is_structural() {
        assert!(matches(json!({"n": 1}), json!({"n": 1.0})));
        assert!(matches(json!({"o": {"a": 1, "b": 2}}), json!({"o": {"b": 2, "a": 1}})));
        assert!(!matches(json!({"n": "1"}), json!({"n": 1})));
    }

    #[test]
    fn missing_field_equals_null() {
        assert!(matches(json!({"gone": null}), json!({"n": 1})));
        assert!(!matches(json!({"n": null}), json!({"n": 1})));
    }

    #[test]
    fn comparison_operators() {
        let d = json!({"n": 5, "s": "m"});
        assert!(matches(json!({"n": {"$gt": 4}}), d.clone()));
        assert!(!matches(json!({"n": {"$gt": 5}}), d.clone()));
        assert!(matches(json!({"n": {"$gte": 5, "$lte": 5.0}}), d.clone()));
        assert!(matches(json!({"n": {"$lt": 6}}), d.clone()));
        assert!(matches(json!({"s": {"$gt": "a"}}), d.clone()));
        // No cross-type ordering.
        assert!(!matches(json!({"s": {"$gt": 1}}), d.clone()));
        assert!(!matches(json!({"missing": {"$lt": 1}}), d));
    }

    #[test]
    fn membership_and_existence() {
        let d = json!({"n": 2, "tags": ["a", "b"]});
        assert!(matches(json!({"n": {"$in": [1, 2]}}), d.clone()));
        assert!(matches(json!({"n": {"$nin": [1, 3]}}), d.clone()));
        assert!(matches(json!({"tags": "b"}), d.clone()));
        assert!(matches(json!({"tags": {"$in": ["z", "a"]}}), d.clone()));
        assert!(matches(json!({"n": {"$exists": true}}), d.clone()));
        assert!(matches(json!({"x": {"$exists": false}}), d.clone()));
        assert!(matches(json!({"n": {"$ne": 3}}), d));
    }

    #[test]
    fn logical_operators() {
        let d = json!({"n": 2, "s": "x"});
        assert!(matches(json!({"$or": [{"n": 1}, {"s": "x"}]}), d.clone()));
        assert!(!matches(json!({"$and": [{"n": 2}, {"s": "y"}]}), d.clone()));
        assert!(matches(json!({"$nor": [{"n": 1}, {"s": "y"}]}), d));
    }

    #[test]
    fn dotted_paths() {
        let d = json!({"a": {"b": {"c": 3}}, "list": [{"k": 1}]});
        assert!(matches(json!({"a.b.c": 3}), d.clone()));
        assert!(matches(json!({"list.0.k": {"$gte": 1}}), d));
    }

    #[test]
    fn invalid_selectors() {
        for bad in [
            json!({"n": {"$regex": "x"}}),
            json!({"$where": "1"}),
            json!({"$or": []}),
            json!({"$and": [1]}),
            json!({"n": {"$in": 1}}),
            json!({"n": {"$gt": 1, "plain": 2}}),
        ] {
            let err = Selector::compile(&doc(bad)).unwrap_err();
            assert!(matches!(err, CoreError::InvalidSelector { .. }));
        }
    }

    #[test]
    fn id_string_selector() {
        let selector = selector_document(&json!("abc")).unwrap();
        assert_eq!(selector, doc(json!({"_id": "abc"})));
        assert!(selector_document(&json!(3)).is_err());

        let compiled = Selector::compile(&selector).unwrap();
        assert_eq!(compiled.pinned_id(), Some(&json!("abc")));
    }

    #[test]
    fn equality_fields_for_upsert() {
        let compiled =
            Selector::compile(&doc(json!({"name": "x", "n": {"$gt": 1}, "a.b": 2}))).unwrap();
        assert_eq!(compiled.equality_fields(), doc(json!({"name": "x"})));
    }
}
