//! `${file:...}` attributes, read from the headers a file consumer sets.

use super::Dispatch;
use crate::context::Exchange;
use crate::convert::{as_i64, as_text};
use crate::errors::{Result, SimpleError};
use crate::expression::Expression;
use serde_json::Value;

pub const FILE_NAME: &str = "CamelFileName";
pub const FILE_NAME_ONLY: &str = "CamelFileNameOnly";
pub const FILE_PARENT: &str = "CamelFileParent";
pub const FILE_PATH: &str = "CamelFilePath";
pub const FILE_ABSOLUTE: &str = "CamelFileAbsolute";
pub const FILE_ABSOLUTE_PATH: &str = "CamelFileAbsolutePath";
pub const FILE_LENGTH: &str = "CamelFileLength";
pub const FILE_LAST_MODIFIED: &str = "CamelFileLastModified";

pub(super) fn resolve(d: &Dispatch) -> Result<Option<Expression>> {
    let Some(attribute) = d.remainder("file:") else {
        return Ok(None);
    };
    let read: fn(&dyn Exchange) -> Value = match attribute {
        "name" => |ex| header_text(ex, FILE_NAME).map_or(Value::Null, Value::String),
        "name.noext" => |ex| opt(header_text(ex, FILE_NAME).map(|n| strip_ext(&n, false))),
        "name.noext.single" => |ex| opt(header_text(ex, FILE_NAME).map(|n| strip_ext(&n, true))),
        "name.ext" | "ext" => |ex| opt(header_text(ex, FILE_NAME).and_then(|n| only_ext(&n, false))),
        "name.ext.single" => |ex| opt(header_text(ex, FILE_NAME).and_then(|n| only_ext(&n, true))),
        "onlyname" => |ex| opt(only_name(ex)),
        "onlyname.noext" => |ex| opt(only_name(ex).map(|n| strip_ext(&n, false))),
        "onlyname.noext.single" => |ex| opt(only_name(ex).map(|n| strip_ext(&n, true))),
        "parent" => |ex| opt(header_text(ex, FILE_PARENT)),
        "path" => |ex| opt(header_text(ex, FILE_PATH)),
        "absolute" => |ex| {
            ex.header(FILE_ABSOLUTE)
                .map_or(Value::Null, |v| match v {
                    Value::String(s) => Value::Bool(s.eq_ignore_ascii_case("true")),
                    other => other.clone(),
                })
        },
        "absolute.path" => |ex| opt(header_text(ex, FILE_ABSOLUTE_PATH)),
        "length" | "size" => |ex| long_header(ex, FILE_LENGTH),
        "modified" => |ex| long_header(ex, FILE_LAST_MODIFIED),
        other if d.strict => {
            return Err(SimpleError::syntax(
                d.index,
                format!("Unknown file language syntax: {other}"),
            ))
        }
        _ => return Ok(None),
    };
    Ok(Some(Expression::function(d.function, move |ex| Ok(read(ex)))))
}

fn opt(value: Option<String>) -> Value {
    value.map_or(Value::Null, Value::String)
}

fn header_text(ex: &dyn Exchange, name: &str) -> Option<String> {
    ex.header(name).and_then(as_text)
}

fn long_header(ex: &dyn Exchange, name: &str) -> Value {
    ex.header(name)
        .and_then(as_i64)
        .map_or(Value::Null, Value::from)
}

fn only_name(ex: &dyn Exchange) -> Option<String> {
    header_text(ex, FILE_NAME_ONLY)
        .or_else(|| header_text(ex, FILE_NAME).map(|n| strip_path(&n).to_string()))
}

fn strip_path(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

/// Drop the extension: everything from the first dot of the last path
/// segment, or only the last extension in single mode.
pub(crate) fn strip_ext(name: &str, single: bool) -> String {
    let start = name.len() - strip_path(name).len();
    let only = &name[start..];
    let dot = if single { only.rfind('.') } else { only.find('.') };
    match dot {
        Some(pos) => name[..start + pos].to_string(),
        None => name.to_string(),
    }
}

pub(crate) fn only_ext(name: &str, single: bool) -> Option<String> {
    let only = strip_path(name);
    let dot = if single { only.rfind('.') } else { only.find('.') }?;
    Some(only[dot + 1..].to_string())
}
