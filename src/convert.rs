use crate::errors::{Result, SimpleError};
use serde_json::{Number, Value};
use std::fmt;

/// Result type an expression is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetType {
    Object,
    String,
    Boolean,
    Integer,
    Long,
    Double,
    List,
    Map,
}

impl TargetType {
    /// Resolve a type name as written in expressions (`String`, `java.lang.Integer`, `int`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        let simple = name.rsplit('.').next().unwrap_or(name);
        Some(match simple {
            "Object" | "object" | "Any" => TargetType::Object,
            "String" | "string" | "CharSequence" => TargetType::String,
            "Boolean" | "boolean" | "bool" => TargetType::Boolean,
            "Integer" | "int" | "i32" => TargetType::Integer,
            "Long" | "long" | "i64" => TargetType::Long,
            "Double" | "double" | "Float" | "float" | "f64" | "Number" => TargetType::Double,
            "List" | "list" | "Collection" | "ArrayList" | "Iterable" => TargetType::List,
            "Map" | "map" | "HashMap" | "LinkedHashMap" => TargetType::Map,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            TargetType::Object => "Object",
            TargetType::String => "String",
            TargetType::Boolean => "Boolean",
            TargetType::Integer => "Integer",
            TargetType::Long => "Long",
            TargetType::Double => "Double",
            TargetType::List => "List",
            TargetType::Map => "Map",
        }
    }

    /// Instance-of test used by the `is` operator.
    pub fn is_instance(self, value: &Value) -> bool {
        match self {
            TargetType::Object => !value.is_null(),
            TargetType::String => value.is_string(),
            TargetType::Boolean => value.is_boolean(),
            TargetType::Integer => value
                .as_i64()
                .is_some_and(|n| i32::try_from(n).is_ok()),
            TargetType::Long => value.is_i64() || value.is_u64(),
            TargetType::Double => value.is_number(),
            TargetType::List => value.is_array(),
            TargetType::Map => value.is_object(),
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Coerces values to a requested type.
///
/// `try_convert` returns `None` when the value cannot be represented as the
/// target; `convert` turns that into a [`SimpleError::Conversion`]. Null always
/// converts to null.
pub trait TypeConverter: Send + Sync {
    fn try_convert(&self, value: &Value, target: TargetType) -> Option<Value>;

    fn convert(&self, value: &Value, target: TargetType) -> Result<Value> {
        self.try_convert(value, target)
            .ok_or_else(|| SimpleError::Conversion {
                value: abbreviate(value),
                target: target.name(),
            })
    }
}

/// Conversions between the JSON value families.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTypeConverter;

impl TypeConverter for DefaultTypeConverter {
    fn try_convert(&self, value: &Value, target: TargetType) -> Option<Value> {
        if value.is_null() {
            return Some(Value::Null);
        }
        match target {
            TargetType::Object => Some(value.clone()),
            TargetType::String => as_text(value).map(Value::String),
            TargetType::Boolean => match value {
                Value::Bool(_) => Some(value.clone()),
                Value::String(s) if s.trim().eq_ignore_ascii_case("true") => Some(Value::Bool(true)),
                Value::String(s) if s.trim().eq_ignore_ascii_case("false") => Some(Value::Bool(false)),
                _ => None,
            },
            TargetType::Integer => as_i64(value)
                .filter(|n| i32::try_from(*n).is_ok())
                .map(Value::from),
            TargetType::Long => as_i64(value).map(Value::from),
            TargetType::Double => as_f64(value)
                .and_then(Number::from_f64)
                .map(Value::Number),
            TargetType::List => Some(match value {
                Value::Array(_) => value.clone(),
                other => Value::Array(vec![other.clone()]),
            }),
            TargetType::Map => value.is_object().then(|| value.clone()),
        }
    }
}

/// Textual form of a value; strings are returned without JSON quoting.
pub fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

pub fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => {
            let t = s.trim();
            t.parse::<i64>()
                .ok()
                .or_else(|| t.parse::<f64>().ok().filter(|f| f.fract() == 0.0).map(|f| f as i64))
        }
        _ => None,
    }
}

pub fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Numeric literal as written in expression text: integers first, then floats.
pub fn parse_number(text: &str) -> Option<Number> {
    let t = text.trim();
    if t.is_empty() || !t.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    if !t
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'))
    {
        return None;
    }
    if let Ok(n) = t.parse::<i64>() {
        return Some(Number::from(n));
    }
    t.parse::<f64>().ok().and_then(Number::from_f64)
}

/// Elements of a value viewed as a collection; strings split on commas.
pub fn iterate(value: &Value) -> Vec<Value> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.clone(),
        Value::Object(map) => map.values().cloned().collect(),
        Value::String(s) if s.contains(',') => s
            .split(',')
            .map(|part| Value::String(part.trim().to_string()))
            .collect(),
        other => vec![other.clone()],
    }
}

pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// Elvis truthiness: null, false, empty and numeric zero are false.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        other => !is_empty(other),
    }
}

fn abbreviate(value: &Value) -> String {
    let text = value.to_string();
    if text.chars().count() > 64 {
        let head: String = text.chars().take(61).collect();
        format!("{head}...")
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn type_names_resolve() {
        assert_eq!(TargetType::from_name("java.lang.String"), Some(TargetType::String));
        assert_eq!(TargetType::from_name("int"), Some(TargetType::Integer));
        assert_eq!(TargetType::from_name("com.acme.Thing"), None);
    }

    #[test]
    fn converts_between_families() {
        let c = DefaultTypeConverter;
        assert_eq!(c.try_convert(&json!("42"), TargetType::Integer), Some(json!(42)));
        assert_eq!(c.try_convert(&json!(10), TargetType::String), Some(json!("10")));
        assert_eq!(c.try_convert(&json!("TRUE"), TargetType::Boolean), Some(json!(true)));
        assert_eq!(c.try_convert(&json!(null), TargetType::Integer), Some(json!(null)));
        assert!(c.try_convert(&json!("abc"), TargetType::Long).is_none());
        assert!(c.convert(&json!("abc"), TargetType::Long).is_err());
    }

    #[test]
    fn elvis_truthiness() {
        assert!(!truthy(&json!(null)));
        assert!(!truthy(&json!("")));
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!(0.0)));
        assert!(!truthy(&json!(false)));
        assert!(!truthy(&json!([])));
        assert!(truthy(&json!("y")));
        assert!(truthy(&json!(3)));
    }

    #[test]
    fn numbers_from_text() {
        assert_eq!(parse_number("5"), Some(Number::from(5)));
        assert_eq!(parse_number("-5"), Some(Number::from(-5)));
        assert_eq!(parse_number("2.5").and_then(|n| n.as_f64()), Some(2.5));
        assert_eq!(parse_number("18..30"), None);
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number("-"), None);
    }

    #[test]
    fn strings_iterate_on_commas() {
        assert_eq!(iterate(&json!("a, b,c")), vec![json!("a"), json!("b"), json!("c")]);
        assert_eq!(iterate(&json!([1, 2])), vec![json!(1), json!(2)]);
    }
}
