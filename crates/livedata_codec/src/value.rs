//! Structural value semantics for JSON documents.
//!
//! Documents are compared by value, never by their serialized text:
//! - Objects are equal when they hold the same keys with equal values,
//!   regardless of field order
//! - Arrays are equal element-wise, in order
//! - Numbers are equal when they denote the same mathematical value
//!   (`1 == 1.0`, `-0 == 0`)
//!
//! [`cmp_canonical`] extends this to a total order that is consistent with
//! [`values_equal`]: two values compare `Equal` exactly when they are equal.

use serde_json::{Map, Number, Value};
use std::cmp::Ordering;

/// Returns true if two values are structurally equal.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => cmp_numbers(x, y) == Ordering::Equal,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(l, r)| values_equal(l, r))
        }
        (Value::Object(x), Value::Object(y)) => objects_equal(x, y),
        _ => false,
    }
}

/// Returns true if two objects hold the same keys with equal values.
pub fn objects_equal(a: &Map<String, Value>, b: &Map<String, Value>) -> bool {
    a.len() == b.len()
        && a.iter()
            .all(|(key, value)| b.get(key).is_some_and(|other| values_equal(value, other)))
}

/// Compare two values in canonical order.
///
/// Values of different types order by type rank:
/// null < numbers < strings < objects < arrays < booleans.
/// Within a type, numbers order numerically, strings bytewise, arrays
/// element-wise and objects entry-wise after sorting their keys.
pub fn cmp_canonical(a: &Value, b: &Value) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => cmp_numbers(x, y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                let ord = cmp_canonical(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => cmp_objects(x, y),
        _ => Ordering::Equal, // Null, or same rank
    }
}

fn cmp_objects(a: &Map<String, Value>, b: &Map<String, Value>) -> Ordering {
    let mut left: Vec<_> = a.iter().collect();
    let mut right: Vec<_> = b.iter().collect();
    left.sort_by(|x, y| x.0.cmp(y.0));
    right.sort_by(|x, y| x.0.cmp(y.0));

    for ((lk, lv), (rk, rv)) in left.iter().zip(right.iter()) {
        let key_ord = lk.cmp(rk);
        if key_ord != Ordering::Equal {
            return key_ord;
        }
        let val_ord = cmp_canonical(lv, rv);
        if val_ord != Ordering::Equal {
            return val_ord;
        }
    }
    left.len().cmp(&right.len())
}

/// Compare two JSON numbers by mathematical value.
///
/// Integers compare exactly across the whole `i64`/`u64` range. An integer
/// and a float compare exactly as well: the integer is first placed against
/// the float coarsely, and only a tie is refined in integer space.
/// JSON numbers are always finite, so the order is total.
pub fn cmp_numbers(a: &Number, b: &Number) -> Ordering {
    match (integer_value(a), integer_value(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(x), None) => cmp_int_float(x, float_value(b)),
        (None, Some(y)) => cmp_int_float(y, float_value(a)).reverse(),
        (None, None) => float_value(a)
            .partial_cmp(&float_value(b))
            .unwrap_or(Ordering::Equal),
    }
}

fn integer_value(n: &Number) -> Option<i128> {
    n.as_i64()
        .map(i128::from)
        .or_else(|| n.as_u64().map(i128::from))
}

fn float_value(n: &Number) -> f64 {
    n.as_f64().unwrap_or(0.0)
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn cmp_int_float(int: i128, float: f64) -> Ordering {
    match (int as f64).partial_cmp(&float) {
        // The float equals a rounded integer, so it is integral and well
        // inside i128 range.
        Some(Ordering::Equal) => int.cmp(&(float as i128)),
        Some(ord) => ord,
        None => Ordering::Equal,
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

/// Returns the JSON type name of a value, for diagnostics.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
