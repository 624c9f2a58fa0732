use std::cmp::Ordering;

use serde_json::Value;

use trellis_core::error::{Result, TrellisError};

/// Evaluate a boolean expression against the merged input data.
///
/// Supported forms:
/// - `key == literal`, `key != literal`
/// - `key > literal`, `key >= literal`, `key < literal`, `key <= literal`
/// - `key contains literal` — substring, array element, or object key
/// - a bare `key` — truthiness of the resolved value
///
/// The left side is a dotted path into the data. The right side is a JSON
/// literal (`60`, `"ok"`, `true`, `null`) or, failing that, another dotted
/// path. Missing paths resolve to null.
pub fn evaluate(expr: &str, data: &Value) -> Result<bool> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err(TrellisError::Condition("empty expression".into()));
    }

    if let Some((lhs, rhs)) = split_operator(expr, " contains ") {
        let needle = operand(data, rhs)?;
        return Ok(match lookup(data, lhs) {
            Some(Value::String(s)) => match &needle {
                Value::String(n) => s.contains(n.as_str()),
                other => s.contains(&other.to_string()),
            },
            Some(Value::Array(items)) => items.iter().any(|v| loosely_eq(v, &needle)),
            Some(Value::Object(map)) => match &needle {
                Value::String(key) => map.contains_key(key),
                _ => false,
            },
            _ => false,
        });
    }

    for op in ["==", "!=", ">=", "<=", ">", "<"] {
        if let Some((lhs, rhs)) = split_operator(expr, op) {
            let left = lookup(data, lhs).cloned().unwrap_or(Value::Null);
            let right = operand(data, rhs)?;
            return compare(op, &left, &right);
        }
    }

    Ok(truthy(lookup(data, expr).unwrap_or(&Value::Null)))
}

fn split_operator<'a>(expr: &'a str, op: &str) -> Option<(&'a str, &'a str)> {
    let idx = expr.find(op)?;
    let lhs = expr[..idx].trim();
    let rhs = expr[idx + op.len()..].trim();
    if lhs.is_empty() {
        return None;
    }
    Some((lhs, rhs))
}

/// Resolve a dotted path into the data.
fn lookup<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = data;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Parse the right-hand operand: quoted string, JSON literal, or a path.
fn operand(data: &Value, raw: &str) -> Result<Value> {
    if raw.is_empty() {
        return Err(TrellisError::Condition("missing right-hand operand".into()));
    }
    if raw.len() >= 2
        && ((raw.starts_with('"') && raw.ends_with('"'))
            || (raw.starts_with('\'') && raw.ends_with('\'')))
    {
        return Ok(Value::String(raw[1..raw.len() - 1].to_string()));
    }
    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        return Ok(value);
    }
    Ok(lookup(data, raw).cloned().unwrap_or(Value::Null))
}

fn compare(op: &str, left: &Value, right: &Value) -> Result<bool> {
    match op {
        "==" => Ok(loosely_eq(left, right)),
        "!=" => Ok(!loosely_eq(left, right)),
        _ => {
            let ordering = if let (Some(l), Some(r)) = (left.as_f64(), right.as_f64()) {
                l.partial_cmp(&r)
            } else if let (Value::String(l), Value::String(r)) = (left, right) {
                Some(l.cmp(r))
            } else {
                None
            };
            let Some(ordering) = ordering else {
                return Err(TrellisError::Condition(format!(
                    "cannot order {} against {}",
                    left, right
                )));
            };
            Ok(match op {
                ">" => ordering == Ordering::Greater,
                ">=" => ordering != Ordering::Less,
                "<" => ordering == Ordering::Less,
                "<=" => ordering != Ordering::Greater,
                _ => false,
            })
        }
    }
}

/// Equality with numeric coercion, so `1` and `1.0` compare equal.
fn loosely_eq(left: &Value, right: &Value) -> bool {
    if let (Some(l), Some(r)) = (left.as_f64(), right.as_f64()) {
        return l == r;
    }
    left == right
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
