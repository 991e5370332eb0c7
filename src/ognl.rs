//! Dotted/bracket property paths (`.name[0]?.city.size()`) evaluated against
//! JSON values through a pluggable [`PropertyAccessor`].

use crate::convert::{as_text, is_empty};
use crate::errors::{Result, SimpleError};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct OgnlPath {
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// `.name` or `?.name`
    Property { name: String, null_safe: bool },
    /// `['key']` or `[key]`
    Key { key: String, null_safe: bool },
    /// `[0]`, `[last]`, `[last-1]`
    Index { index: IndexSel, null_safe: bool },
    /// `.name()`
    Method { name: String, null_safe: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexSel {
    At(i64),
    FromLast(i64),
}

impl Segment {
    fn null_safe(&self) -> bool {
        match self {
            Segment::Property { null_safe, .. }
            | Segment::Key { null_safe, .. }
            | Segment::Index { null_safe, .. }
            | Segment::Method { null_safe, .. } => *null_safe,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let q = if self.null_safe() { "?" } else { "" };
        match self {
            Segment::Property { name, .. } => write!(f, "{q}.{name}"),
            Segment::Key { key, .. } => write!(f, "{q}['{key}']"),
            Segment::Index { index: IndexSel::At(n), .. } => write!(f, "{q}[{n}]"),
            Segment::Index { index: IndexSel::FromLast(0), .. } => write!(f, "{q}[last]"),
            Segment::Index { index: IndexSel::FromLast(n), .. } => write!(f, "{q}[last-{n}]"),
            Segment::Method { name, .. } => write!(f, "{q}.{name}()"),
        }
    }
}

/// True when the text uses path syntax at all (a dot, bracket or `?.`).
pub fn is_ognl(text: &str) -> bool {
    text.contains('.') || text.contains('[')
}

/// Splits `name.rest` / `name[0]` / `name?.x` into the leading name and the
/// remaining path text.
pub fn split_root(text: &str) -> (&str, &str) {
    let cut = text
        .char_indices()
        .skip(1)
        .find(|(i, c)| *c == '.' || *c == '[' || (*c == '?' && text[*i..].starts_with("?.")))
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    (&text[..cut], &text[cut..])
}

impl OgnlPath {
    pub fn parse(text: &str) -> Result<OgnlPath> {
        Cursor::new(text).parse()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Walk the path from `root`.
    ///
    /// A null root yields null. An intermediate null is an error unless the
    /// next segment is null-safe (`?.`), in which case the result is null.
    pub fn navigate(&self, accessor: &dyn PropertyAccessor, root: Value) -> Result<Value> {
        let mut current = root;
        if current.is_null() {
            return Ok(Value::Null);
        }
        let mut walked = String::new();
        for segment in &self.segments {
            if current.is_null() {
                if segment.null_safe() {
                    return Ok(Value::Null);
                }
                return Err(SimpleError::evaluation(format!(
                    "Cannot evaluate {segment} because {walked} is null"
                )));
            }
            current = match segment {
                Segment::Property { name, .. } => accessor.property(&current, name)?,
                Segment::Key { key, .. } => accessor.property(&current, key)?,
                Segment::Index { index, .. } => {
                    let position = match *index {
                        IndexSel::At(n) => n,
                        IndexSel::FromLast(n) => -1 - n,
                    };
                    accessor.index(&current, position)?
                }
                Segment::Method { name, .. } => accessor.invoke(&current, name)?,
            };
            walked.push_str(&segment.to_string());
        }
        Ok(current)
    }
}

impl fmt::Display for OgnlPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for s in &self.segments {
            write!(f, "{s}")?;
        }
        Ok(())
    }
}

/// Reflection-style access to values: by key, by index, by method name.
pub trait PropertyAccessor: Send + Sync {
    fn property(&self, target: &Value, name: &str) -> Result<Value>;

    /// Negative positions count from the end (`-1` is the last element).
    fn index(&self, target: &Value, position: i64) -> Result<Value>;

    fn invoke(&self, target: &Value, method: &str) -> Result<Value>;
}

/// Accessor over plain JSON values.
///
/// Objects resolve properties by key (missing keys are null); other values fall
/// back to the zero-argument methods `size`, `length`, `isEmpty`, `toString`,
/// `toUpperCase`, `toLowerCase`, `trim`, `keys` and `values`, also reachable
/// through `getX` spellings.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonPropertyAccessor;

impl PropertyAccessor for JsonPropertyAccessor {
    fn property(&self, target: &Value, name: &str) -> Result<Value> {
        match target {
            Value::Object(map) => Ok(map
                .get(name)
                .or_else(|| map.get(&getter_name(name)))
                .cloned()
                .unwrap_or(Value::Null)),
            Value::Array(_) if name.parse::<i64>().is_ok() => {
                self.index(target, name.parse::<i64>().unwrap_or_default())
            }
            _ => self.invoke(target, name),
        }
    }

    fn index(&self, target: &Value, position: i64) -> Result<Value> {
        match target {
            Value::Array(items) => Ok(resolve_position(items.len(), position)
                .and_then(|i| items.get(i))
                .cloned()
                .unwrap_or(Value::Null)),
            Value::Object(map) => Ok(map
                .get(&position.to_string())
                .cloned()
                .unwrap_or(Value::Null)),
            Value::String(s) => {
                let chars: Vec<char> = s.chars().collect();
                Ok(resolve_position(chars.len(), position)
                    .and_then(|i| chars.get(i))
                    .map(|c| Value::String(c.to_string()))
                    .unwrap_or(Value::Null))
            }
            other => Err(SimpleError::evaluation(format!(
                "Cannot index {} with [{position}]",
                kind_of(other)
            ))),
        }
    }

    fn invoke(&self, target: &Value, method: &str) -> Result<Value> {
        let method = getter_name(method);
        let out = match (method.as_str(), target) {
            ("size" | "length", Value::Array(a)) => Value::from(a.len()),
            ("size" | "length", Value::Object(o)) => Value::from(o.len()),
            ("size" | "length", Value::String(s)) => Value::from(s.chars().count()),
            ("isEmpty" | "empty", v) => Value::Bool(is_empty(v)),
            ("toString", v) => as_text(v).map(Value::String).unwrap_or(Value::Null),
            ("toUpperCase" | "upperCase", Value::String(s)) => Value::String(s.to_uppercase()),
            ("toLowerCase" | "lowerCase", Value::String(s)) => Value::String(s.to_lowercase()),
            ("trim", Value::String(s)) => Value::String(s.trim().to_string()),
            ("keys" | "keySet", Value::Object(o)) => {
                Value::Array(o.keys().cloned().map(Value::String).collect())
            }
            ("values", Value::Object(o)) => Value::Array(o.values().cloned().collect()),
            ("class", v) => Value::String(kind_of(v).to_string()),
            (m, Value::Object(o)) if o.contains_key(m) => o[m].clone(),
            _ => {
                return Err(SimpleError::evaluation(format!(
                    "Method with name: {method} not found on {}",
                    kind_of(target)
                )))
            }
        };
        Ok(out)
    }
}

fn getter_name(method: &str) -> String {
    for prefix in ["get", "is"] {
        if let Some(rest) = method.strip_prefix(prefix) {
            let mut chars = rest.chars();
            if let Some(first) = chars.next().filter(|c| c.is_ascii_uppercase()) {
                if method == "isEmpty" {
                    break;
                }
                return first.to_ascii_lowercase().to_string() + chars.as_str();
            }
        }
    }
    method.to_string()
}

fn resolve_position(len: usize, position: i64) -> Option<usize> {
    if position >= 0 {
        usize::try_from(position).ok()
    } else {
        let back = usize::try_from(position.unsigned_abs()).ok()?;
        len.checked_sub(back)
    }
}

pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "Boolean",
        Value::Number(n) if n.is_f64() => "Double",
        Value::Number(_) => "Long",
        Value::String(_) => "String",
        Value::Array(_) => "List",
        Value::Object(_) => "Map",
    }
}

struct Cursor<'a> {
    s: &'a str,
    i: usize,
}

impl<'a> Cursor<'a> {
    fn new(s: &'a str) -> Self {
        Self { s, i: 0 }
    }

    fn fail(&self) -> SimpleError {
        SimpleError::InvalidOgnl {
            expression: self.s.to_string(),
            index: self.i,
        }
    }

    fn parse(&mut self) -> Result<OgnlPath> {
        let mut segments = Vec::new();
        if !self.eof() && !self.peek_str(".") && !self.peek_str("[") && !self.peek_str("?") {
            let name = self.parse_identifier()?;
            segments.push(self.member(name, false));
        }
        while !self.eof() {
            let null_safe = self.consume_str("?");
            if self.consume_char('.') {
                let name = self.parse_identifier()?;
                segments.push(self.member(name, null_safe));
                continue;
            }
            if self.consume_char('[') {
                segments.push(self.bracket(null_safe)?);
                continue;
            }
            return Err(self.fail());
        }
        Ok(OgnlPath { segments })
    }

    fn member(&mut self, name: String, null_safe: bool) -> Segment {
        if self.consume_str("()") {
            Segment::Method { name, null_safe }
        } else {
            Segment::Property { name, null_safe }
        }
    }

    fn bracket(&mut self, null_safe: bool) -> Result<Segment> {
        let start = self.i;
        if let Some(quote) = self.peek_char().filter(|c| *c == '\'' || *c == '"') {
            self.i += 1;
            let key_start = self.i;
            while let Some(c) = self.peek_char() {
                if c == quote {
                    break;
                }
                self.i += c.len_utf8();
            }
            let key = self.s[key_start..self.i].to_string();
            if !self.consume_char(quote) || !self.consume_char(']') {
                return Err(self.fail());
            }
            return Ok(Segment::Key { key, null_safe });
        }
        while let Some(c) = self.peek_char() {
            if c == ']' {
                break;
            }
            if c == '[' {
                return Err(self.fail());
            }
            self.i += c.len_utf8();
        }
        let content = self.s[start..self.i].trim();
        if !self.consume_char(']') || content.is_empty() {
            return Err(self.fail());
        }
        if content == "last" {
            return Ok(Segment::Index {
                index: IndexSel::FromLast(0),
                null_safe,
            });
        }
        if let Some(back) = content.strip_prefix("last-") {
            let n = back.trim().parse::<i64>().map_err(|_| self.fail())?;
            return Ok(Segment::Index {
                index: IndexSel::FromLast(n),
                null_safe,
            });
        }
        if let Ok(n) = content.parse::<i64>() {
            return Ok(Segment::Index {
                index: IndexSel::At(n),
                null_safe,
            });
        }
        Ok(Segment::Key {
            key: content.to_string(),
            null_safe,
        })
    }

    fn parse_identifier(&mut self) -> Result<String> {
        let start = self.i;
        while let Some(c) = self.peek_char() {
            if c == '_' || c == '$' || c == '-' || c.is_alphanumeric() {
                self.i += c.len_utf8();
            } else {
                break;
            }
        }
        if self.i == start {
            return Err(self.fail());
        }
        Ok(self.s[start..self.i].to_string())
    }

    fn consume_char(&mut self, c: char) -> bool {
        if self.peek_char() == Some(c) {
            self.i += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn consume_str(&mut self, lit: &str) -> bool {
        if self.peek_str(lit) {
            self.i += lit.len();
            true
        } else {
            false
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.s[self.i..].chars().next()
    }

    fn peek_str(&self, lit: &str) -> bool {
        self.s[self.i..].starts_with(lit)
    }

    fn eof(&self) -> bool {
        self.i >= self.s.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn eval(path: &str, root: Value) -> Result<Value> {
        OgnlPath::parse(path)?.navigate(&JsonPropertyAccessor, root)
    }

    #[test]
    fn walks_properties_and_indexes() {
        let doc = json!({"name": "x", "items": [{"id": 1}, {"id": 2}, {"id": 3}]});
        assert_eq!(eval(".name", doc.clone()).unwrap(), json!("x"));
        assert_eq!(eval("items[0].id", doc.clone()).unwrap(), json!(1));
        assert_eq!(eval(".items[last].id", doc.clone()).unwrap(), json!(3));
        assert_eq!(eval(".items[last-1].id", doc.clone()).unwrap(), json!(2));
        assert_eq!(eval(".items.size()", doc.clone()).unwrap(), json!(3));
        assert_eq!(eval("['name']", doc).unwrap(), json!("x"));
    }

    #[test]
    fn null_safe_stops_at_null() {
        let doc = json!({"address": null});
        assert_eq!(eval(".address?.city", doc.clone()).unwrap(), json!(null));
        assert!(eval(".address.city", doc).is_err());
        assert_eq!(eval(".anything", Value::Null).unwrap(), json!(null));
    }

    #[test]
    fn methods_and_getters() {
        assert_eq!(eval(".toUpperCase()", json!("abc")).unwrap(), json!("ABC"));
        assert_eq!(eval(".length", json!("abcd")).unwrap(), json!(4));
        assert_eq!(eval(".getName", json!({"name": "n"})).unwrap(), json!("n"));
        assert!(eval(".frobnicate()", json!(1)).is_err());
    }

    #[test]
    fn rejects_malformed_paths() {
        let invalid_at = |text: &str| OgnlPath::parse(text).err().and_then(|e| e.index());
        assert_eq!(invalid_at("foo[0"), Some(5));
        assert_eq!(invalid_at("foo..bar"), Some(4));
        assert_eq!(invalid_at("foo['x]"), Some(7));
        assert_eq!(invalid_at("foo.bar[1]"), None);
    }

    #[test]
    fn splits_leading_name() {
        assert_eq!(split_root("foo.bar"), ("foo", ".bar"));
        assert_eq!(split_root("foo[0]"), ("foo", "[0]"));
        assert_eq!(split_root("foo?.x"), ("foo", "?.x"));
        assert_eq!(split_root("foo"), ("foo", ""));
    }
}
