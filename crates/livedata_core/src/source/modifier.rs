//! Update modifiers.
//!
//! A modifier is either a replacement document or a set of operators:
//! `$set`, `$unset` and `$inc`, each mapping dotted paths to operands.

use crate::document::ID_FIELD;
use crate::error::{CoreError, CoreResult};
use livedata_codec::{type_name, values_equal, Document, Map, Value};
use serde_json::Number;

#[derive(Debug, Clone, PartialEq)]
enum UpdateOp {
    Set(String, Value),
    Unset(String),
    Inc(String, Number),
}

#[derive(Debug, Clone, PartialEq)]
enum ModifierKind {
    Replace(Document),
    Operators(Vec<UpdateOp>),
}

/// A parsed update modifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Modifier {
    kind: ModifierKind,
}

impl Modifier {
    /// Parses a modifier document.
    pub fn parse(modifier: &Document) -> CoreResult<Self> {
        let operator_keys = modifier.keys().filter(|k| k.starts_with('$')).count();
        if operator_keys == 0 {
            return Ok(Self {
                kind: ModifierKind::Replace(modifier.clone()),
            });
        }
        if operator_keys != modifier.len() {
            return Err(CoreError::invalid_modifier(
                "cannot mix operators and plain fields",
            ));
        }

        let mut ops = Vec::new();
        for (name, fields) in modifier {
            let fields = fields.as_object().ok_or_else(|| {
                CoreError::invalid_modifier(format!("{name} needs an object of fields"))
            })?;
            for (path, operand) in fields {
                if path == ID_FIELD || path.starts_with("_id.") {
                    return Err(CoreError::invalid_modifier("cannot modify _id"));
                }
                if path.is_empty() || path.split('.').any(str::is_empty) {
                    return Err(CoreError::invalid_modifier(format!("invalid field path '{path}'")));
                }
                let op = match name.as_str() {
                    "$set" => UpdateOp::Set(path.clone(), operand.clone()),
                    "$unset" => UpdateOp::Unset(path.clone()),
                    "$inc" => match operand {
                        Value::Number(n) => UpdateOp::Inc(path.clone(), n.clone()),
                        other => {
                            return Err(CoreError::invalid_modifier(format!(
                                "$inc needs a number, found {}",
                                type_name(other)
                            )))
                        }
                    },
                    other => {
                        return Err(CoreError::invalid_modifier(format!(
                            "unknown modifier {other}"
                        )))
                    }
                };
                ops.push(op);
            }
        }
        Ok(Self {
            kind: ModifierKind::Operators(ops),
        })
    }

    /// Returns true if the modifier replaces the whole document.
    pub fn is_replacement(&self) -> bool {
        matches!(self.kind, ModifierKind::Replace(_))
    }

    /// Applies the modifier to a document, returning the new version.
    ///
    /// The input is left untouched, so a failure leaves nothing half
    /// applied.
    pub fn apply(&self, document: &Document) -> CoreResult<Document> {
        match &self.kind {
            ModifierKind::Replace(replacement) => {
                let current = document.get(ID_FIELD);
                if let (Some(new_id), Some(old_id)) = (replacement.get(ID_FIELD), current) {
                    if !values_equal(new_id, old_id) {
                        return Err(CoreError::invalid_modifier("replacement cannot change _id"));
                    }
                }
                let mut result = Document::new();
                if let Some(id) = current.or_else(|| replacement.get(ID_FIELD)) {
                    result.insert(ID_FIELD.into(), id.clone());
                }
                result.extend(
                    replacement
                        .iter()
                        .filter(|(field, _)| field.as_str() != ID_FIELD)
                        .map(|(field, value)| (field.clone(), value.clone())),
                );
                Ok(result)
            }
            ModifierKind::Operators(ops) => {
                let mut result = document.clone();
                for op in ops {
                    match op {
                        UpdateOp::Set(path, value) => set_path(&mut result, path, value.clone())?,
                        UpdateOp::Unset(path) => unset_path(&mut result, path),
                        UpdateOp::Inc(path, delta) => {
                            let next = match get_path(&result, path) {
                                None => Value::Number(delta.clone()),
                                Some(Value::Number(current)) => add_numbers(current, delta)?,
                                Some(other) => {
                                    return Err(CoreError::invalid_modifier(format!(
                                        "cannot $inc {path} holding {}",
                                        type_name(other)
                                    )))
                                }
                            };
                            set_path(&mut result, path, next)?;
                        }
                    }
                }
                Ok(result)
            }
        }
    }
}

fn add_numbers(a: &Number, b: &Number) -> CoreResult<Value> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        if let Some(sum) = x.checked_add(y) {
            return Ok(Value::from(sum));
        }
    }
    let sum = a.as_f64().unwrap_or(0.0) + b.as_f64().unwrap_or(0.0);
    Number::from_f64(sum)
        .map(Value::Number)
        .ok_or_else(|| CoreError::invalid_modifier("$inc overflowed"))
}

fn get_path<'a>(document: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    match path.split_once('.') {
        None => document.get(path),
        Some((head, rest)) => match document.get(head)? {
            Value::Object(inner) => get_path(inner, rest),
            _ => None,
        },
    }
}

fn set_path(document: &mut Map<String, Value>, path: &str, value: Value) -> CoreResult<()> {
    match path.split_once('.') {
        None => {
            document.insert(path.to_owned(), value);
            Ok(())
        }
        Some((head, rest)) => {
            let slot = document
                .entry(head.to_owned())
                .or_insert_with(|| Value::Object(Map::new()));
            match slot {
                Value::Object(inner) => set_path(inner, rest, value),
                other => Err(CoreError::invalid_modifier(format!(
                    "cannot set {rest} inside {head} holding {}",
                    type_name(other)
                ))),
            }
        }
    }
}

fn unset_path(document: &mut Map<String, Value>, path: &str) {
    match path.split_once('.') {
        None => {
            document.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Value::Object(inner)) = document.get_mut(head) {
                unset_path(inner, rest);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn apply(modifier: Value, document: Value) -> CoreResult<Value> {
        Modifier::parse(&doc(modifier))?
            .apply(&doc(document))
            .map(Value::Object)
    }

    #[test]
    fn set_and_unset() {
        let result = apply(
            json!({"$set": {"n": 2, "meta.tag": "x"}, "$unset": {"old": ""}}),
            json!({"_id": "a", "n": 1, "old": true}),
        )
        .unwrap();
        assert_eq!(result, json!({"_id": "a", "n": 2, "meta": {"tag": "x"}}));
    }

    #[test]
    fn inc_integers_and_floats() {
        let result = apply(json!({"$inc": {"n": 1, "f": 0.5, "fresh": 3}}), json!({"_id": "a", "n": 1, "f": 1})).unwrap();
        assert_eq!(result, json!({"_id": "a", "n": 2, "f": 1.5, "fresh": 3}));
    }

    #[test]
    fn inc_rejects_non_numbers() {
        let err = apply(json!({"$inc": {"s": 1}}), json!({"_id": "a", "s": "x"})).unwrap_err();
        assert!(matches!(err, CoreError::InvalidModifier { .. }));
        assert!(apply(json!({"$inc": {"n": "1"}}), json!({"_id": "a"})).is_err());
    }

    #[test]
    fn replacement_keeps_id() {
        let result = apply(json!({"name": "new"}), json!({"_id": "a", "name": "old", "n": 1})).unwrap();
        assert_eq!(result, json!({"_id": "a", "name": "new"}));

        let err = apply(json!({"_id": "b", "n": 1}), json!({"_id": "a"})).unwrap_err();
        assert!(matches!(err, CoreError::InvalidModifier { .. }));
        assert!(apply(json!({"_id": "a", "n": 1}), json!({"_id": "a"})).is_ok());
    }

    #[test]
    fn rejected_modifiers() {
        for bad in [
            json!({"$set": {"n": 1}, "plain": 2}),
            json!({"$push": {"list": 1}}),
            json!({"$set": {"_id": "x"}}),
            json!({"$set": 5}),
            json!({"$set": {"a..b": 1}}),
        ] {
            assert!(Modifier::parse(&doc(bad)).is_err());
        }
    }

    #[test]
    fn set_through_scalar_fails() {
        let err = apply(json!({"$set": {"n.x": 1}}), json!({"_id": "a", "n": 1})).unwrap_err();
        assert!(matches!(err, CoreError::InvalidModifier { .. }));
    }
}
