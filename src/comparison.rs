use crate::convert::{as_f64, as_text, iterate, parse_number};
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::LazyLock;

static RANGE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^(\d+)(\.\.)(\d+)$").ok());

/// Apply `pred_on_ord` to the coerced ordering of `a` and `b`; false when the
/// two values are not comparable (including either side being null).
pub fn cmp_values<F>(a: &Value, b: &Value, pred_on_ord: F) -> bool
where
    F: Fn(Ordering) -> bool,
{
    compare(a, b).is_some_and(pred_on_ord)
}

pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Number(na), Value::Number(nb)) => match (na.as_i64(), nb.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => na.as_f64()?.partial_cmp(&nb.as_f64()?),
        },
        (Value::Bool(ba), Value::Bool(bb)) => Some(ba.cmp(bb)),
        (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
            let (x, y) = (as_f64(a), as_f64(b));
            match (x, y) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => Some(text(a).cmp(&text(b))),
            }
        }
        (Value::Bool(_), Value::String(_)) | (Value::String(_), Value::Bool(_)) => {
            Some(text(a).to_ascii_lowercase().cmp(&text(b).to_ascii_lowercase()))
        }
        (Value::String(sa), Value::String(sb)) => {
            // two numeric strings compare as numbers, as they do in route headers
            match (parse_number(sa), parse_number(sb)) {
                (Some(x), Some(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
                _ => Some(sa.cmp(sb)),
            }
        }
        _ => Some(a.to_string().cmp(&b.to_string())),
    }
}

/// Type-coercing equality: `5 == '5'`, `true == 'true'`; null equals only null.
pub fn equals(a: &Value, b: &Value, ignore_case: bool) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => a == b,
        (Value::String(sa), Value::String(sb)) => {
            if ignore_case {
                sa.to_lowercase() == sb.to_lowercase()
            } else {
                sa == sb
            }
        }
        _ => {
            if compare(a, b) == Some(Ordering::Equal) {
                return true;
            }
            if ignore_case {
                text(a).to_lowercase() == text(b).to_lowercase()
            } else {
                false
            }
        }
    }
}

/// String containment, or element membership when the left side is a collection.
pub fn contains(haystack: &Value, needle: &Value, ignore_case: bool) -> bool {
    match haystack {
        Value::Null => false,
        Value::Array(items) => items.iter().any(|i| equals(i, needle, ignore_case)),
        Value::Object(map) => map.keys().any(|k| equals(&Value::String(k.clone()), needle, ignore_case)),
        other => {
            let (h, n) = (text(other), text(needle));
            if ignore_case {
                h.to_lowercase().contains(&n.to_lowercase())
            } else {
                h.contains(&n)
            }
        }
    }
}

/// Membership of `value` in the comma-separated list or collection `candidates`.
pub fn is_in(value: &Value, candidates: &Value) -> bool {
    iterate(candidates).iter().any(|c| equals(value, c, false))
}

pub fn starts_with(value: &Value, prefix: &Value) -> bool {
    !value.is_null() && text(value).starts_with(&text(prefix))
}

pub fn ends_with(value: &Value, suffix: &Value) -> bool {
    !value.is_null() && text(value).ends_with(&text(suffix))
}

/// Compile a `regex` operand so it must match the whole text.
pub fn full_match(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{pattern})$"))
}

/// `from..to` bounds of a range operand.
pub fn parse_range(text: &str) -> Option<(i64, i64)> {
    let caps = RANGE.as_ref()?.captures(text.trim())?;
    let from = caps.get(1)?.as_str().parse().ok()?;
    let to = caps.get(3)?.as_str().parse().ok()?;
    Some((from, to))
}

pub fn in_range(value: &Value, (from, to): (i64, i64)) -> bool {
    as_f64(value).is_some_and(|v| v >= from as f64 && v <= to as f64)
}

fn text(v: &Value) -> String {
    as_text(v).unwrap_or_default()
}
