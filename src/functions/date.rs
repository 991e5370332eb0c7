//! `${date:command[:pattern]}` and
//! `${date-with-timezone:command:timezone:pattern}`.
//!
//! The command names where the instant comes from (`now`, `exchangeCreated`,
//! `header.x`, `variable.x`, `exchangeProperty.x`, `file`) and may carry
//! offsets such as `now-1d+2h30m`. Patterns use the `yyyy-MM-dd HH:mm:ss`
//! notation; without one the instant renders as RFC 3339.

use super::file::FILE_LAST_MODIFIED;
use super::Dispatch;
use crate::context::Exchange;
use crate::errors::{Result, SimpleError};
use crate::expression::Expression;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use serde_json::Value;
use std::fmt::Write;

#[derive(Debug, Clone, PartialEq)]
enum Source {
    Now,
    Created,
    Header(String),
    Variable(String),
    Property(String),
    File,
}

#[derive(Debug, Clone)]
struct DateFunction {
    command: String,
    source: Source,
    offset: TimeDelta,
    pattern: Option<String>,
    zone: Option<Tz>,
}

pub(super) fn resolve(d: &Dispatch) -> Result<Option<Expression>> {
    if let Some(rest) = d.remainder("date-with-timezone:") {
        let parts: Vec<&str> = rest.splitn(3, ':').collect();
        let [command, zone, pattern] = parts.as_slice() else {
            return Err(d.invalid("date-with-timezone:command:timezone:pattern"));
        };
        let zone = parse_zone(d, zone)?;
        return build(d, command, Some(zone), Some(*pattern)).map(Some);
    }
    if let Some(rest) = d.remainder("date:") {
        let (command, pattern) = match rest.split_once(':') {
            Some((command, pattern)) => (command, Some(pattern)),
            None => (rest, None),
        };
        let zone = d
            .scope
            .options()
            .default_timezone
            .as_deref()
            .map(|z| parse_zone(d, z))
            .transpose()?;
        return build(d, command, zone, pattern).map(Some);
    }
    Ok(None)
}

fn build(d: &Dispatch, with_offsets: &str, zone: Option<Tz>, pattern: Option<&str>) -> Result<Expression> {
    let command = with_offsets
        .split(['+', '-'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();
    let source = match command.as_str() {
        "now" => Source::Now,
        "exchangeCreated" => Source::Created,
        "file" => Source::File,
        c => {
            if let Some(name) = c.strip_prefix("header.") {
                Source::Header(name.to_string())
            } else if let Some(name) = c.strip_prefix("variable.") {
                Source::Variable(name.to_string())
            } else if let Some(name) = c.strip_prefix("exchangeProperty.") {
                Source::Property(name.to_string())
            } else {
                return Err(SimpleError::syntax(
                    d.index,
                    format!("Command not supported for dateExpression: {command}"),
                ));
            }
        }
    };
    let offset_ms = offsets(with_offsets).ok_or_else(|| {
        SimpleError::syntax(d.index, format!("Invalid date offset in: {with_offsets}"))
    })?;
    // no instant can absorb an offset wider than the whole calendar
    let span = DateTime::<Utc>::MAX_UTC.signed_duration_since(DateTime::<Utc>::MIN_UTC);
    let offset = TimeDelta::try_milliseconds(offset_ms)
        .filter(|o| o.abs() <= span)
        .ok_or_else(|| {
            SimpleError::syntax(d.index, format!("Date offset out of range in: {with_offsets}"))
        })?;
    let function = DateFunction {
        command,
        source,
        offset,
        pattern: pattern.map(strftime),
        zone,
    };
    tracing::trace!(?function, "compiled date function");
    Ok(Expression::function(d.function, move |ex| function.evaluate(ex)))
}

fn parse_zone(d: &Dispatch, zone: &str) -> Result<Tz> {
    zone.trim()
        .parse::<Tz>()
        .map_err(|_| SimpleError::syntax(d.index, format!("Unknown timezone: {zone}")))
}

impl DateFunction {
    fn evaluate(&self, ex: &mut dyn Exchange) -> Result<Value> {
        let Some(instant) = self.instant(ex)? else {
            return Ok(Value::Null);
        };
        let shifted = instant.checked_add_signed(self.offset).ok_or_else(|| {
            SimpleError::evaluation(format!("Date offset out of range for command: {}", self.command))
        })?;
        let mut out = String::new();
        let written = match (&self.pattern, self.zone) {
            (None, None) => {
                out = shifted.to_rfc3339_opts(SecondsFormat::Millis, true);
                Ok(())
            }
            (None, Some(tz)) => {
                out = shifted
                    .with_timezone(&tz)
                    .to_rfc3339_opts(SecondsFormat::Millis, false);
                Ok(())
            }
            (Some(p), None) => write!(out, "{}", shifted.format(p)),
            (Some(p), Some(tz)) => write!(out, "{}", shifted.with_timezone(&tz).format(p)),
        };
        written.map_err(|_| {
            SimpleError::evaluation(format!("Cannot format date for command: {}", self.command))
        })?;
        Ok(Value::String(out))
    }

    fn instant(&self, ex: &dyn Exchange) -> Result<Option<DateTime<Utc>>> {
        let value = match &self.source {
            Source::Now => return Ok(Some(Utc::now())),
            Source::Created => return Ok(ex.created()),
            Source::Header(name) => ex.header(name),
            Source::Variable(name) => ex.variable(name),
            Source::Property(name) => ex.property(name),
            Source::File => ex.header(FILE_LAST_MODIFIED),
        };
        match value {
            None | Some(Value::Null) => Ok(None),
            Some(v) => to_date(v).map(Some).ok_or_else(|| {
                SimpleError::evaluation(format!(
                    "Cannot find Date/long object at command: {}",
                    self.command
                ))
            }),
        }
    }
}

/// Epoch millis, RFC 3339, `yyyy-MM-ddTHH:mm:ss` or a bare date.
fn to_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => Utc.timestamp_millis_opt(n.as_i64()?).single(),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(ms) = s.parse::<i64>() {
                return Utc.timestamp_millis_opt(ms).single();
            }
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
                return Some(naive.and_utc());
            }
            let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
            Some(date.and_hms_opt(0, 0, 0)?.and_utc())
        }
        _ => None,
    }
}

/// Sum of the signed offsets in `now-1d+2h30m`; zero when there are none.
fn offsets(text: &str) -> Option<i64> {
    let Some(start) = text.find(['+', '-']) else {
        return Some(0);
    };
    let mut total = 0i64;
    let mut rest = &text[start..];
    while let Some(sign) = rest.chars().next() {
        let end = rest[1..].find(['+', '-']).map_or(rest.len(), |p| p + 1);
        let millis = duration_millis(rest[1..end].trim())?;
        total = if sign == '-' {
            total.checked_sub(millis)?
        } else {
            total.checked_add(millis)?
        };
        rest = &rest[end..];
    }
    Some(total)
}

/// `1d`, `2h30m`, `15s`, `250ms`, or a bare number of milliseconds.
fn duration_millis(text: &str) -> Option<i64> {
    if let Ok(ms) = text.parse::<i64>() {
        return Some(ms);
    }
    let mut total = 0i64;
    let mut rest = text;
    if rest.is_empty() {
        return None;
    }
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            return None;
        }
        let n: i64 = rest[..digits].parse().ok()?;
        rest = &rest[digits..];
        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let factor = match rest[..unit_len].trim() {
            "d" => 86_400_000,
            "h" => 3_600_000,
            "m" => 60_000,
            "s" => 1_000,
            "ms" => 1,
            _ => return None,
        };
        total = total.checked_add(n.checked_mul(factor)?)?;
        rest = &rest[unit_len..];
    }
    Some(total)
}

/// Translate a `yyyy-MM-dd'T'HH:mm` style pattern into chrono's strftime
/// syntax. Quoted text is literal and `''` is a single quote.
pub(crate) fn strftime(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '\'' {
            if chars.get(i + 1) == Some(&'\'') {
                out.push('\'');
                i += 2;
                continue;
            }
            i += 1;
            while i < chars.len() {
                if chars[i] == '\'' {
                    if chars.get(i + 1) == Some(&'\'') {
                        out.push('\'');
                        i += 2;
                        continue;
                    }
                    break;
                }
                literal(&mut out, chars[i]);
                i += 1;
            }
            i += 1;
            continue;
        }
        if c.is_ascii_alphabetic() {
            let run = chars[i..].iter().take_while(|&&x| x == c).count();
            match field(c, run) {
                Some(spec) => out.push_str(spec),
                None => (0..run).for_each(|_| literal(&mut out, c)),
            }
            i += run;
            continue;
        }
        literal(&mut out, c);
        i += 1;
    }
    out
}

fn literal(out: &mut String, c: char) {
    if c == '%' {
        out.push_str("%%");
    } else {
        out.push(c);
    }
}

fn field(c: char, run: usize) -> Option<&'static str> {
    Some(match (c, run) {
        ('y', 2) => "%y",
        ('y', _) => "%Y",
        ('M', 1) => "%-m",
        ('M', 2) => "%m",
        ('M', 3) => "%b",
        ('M', _) => "%B",
        ('d', 1) => "%-d",
        ('d', _) => "%d",
        ('H', 1) => "%-H",
        ('H', _) => "%H",
        ('h', 1) => "%-I",
        ('h', _) => "%I",
        ('m', 1) => "%-M",
        ('m', _) => "%M",
        ('s', 1) => "%-S",
        ('s', _) => "%S",
        ('S', 1..=3) => "%3f",
        ('S', 4..=6) => "%6f",
        ('S', _) => "%9f",
        ('a', _) => "%p",
        ('E', 1..=3) => "%a",
        ('E', _) => "%A",
        ('D', _) => "%j",
        ('u', _) => "%u",
        ('z', _) => "%Z",
        ('Z', _) => "%z",
        ('X' | 'x', _) => "%:z",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimpleOptions;
    use crate::context::DefaultExchange;
    use crate::SimpleLanguage;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn eval(lang: &SimpleLanguage, text: &str) -> Value {
        let mut ex = DefaultExchange::new()
            .with_header("birthday", "2024-03-01T10:00:00Z")
            .with_header("epoch", 0);
        lang.parse_expression(text).unwrap().evaluate_value(&mut ex).unwrap()
    }

    #[test]
    fn translates_patterns() {
        assert_eq!(strftime("yyyy-MM-dd'T'HH:mm:ss.SSS"), "%Y-%m-%dT%H:%M:%S.%3f");
        assert_eq!(strftime("EEE, d MMM yy"), "%a, %-d %b %y");
        assert_eq!(strftime("'it''s' 100%"), "it's 100%%");
    }

    #[test]
    fn parses_offsets() {
        assert_eq!(duration_millis("2h30m"), Some(9_000_000));
        assert_eq!(duration_millis("250ms"), Some(250));
        assert_eq!(duration_millis("soon"), None);
        assert_eq!(offsets("now"), Some(0));
        assert_eq!(offsets("now-1d+2h"), Some(-86_400_000 + 7_200_000));
    }

    #[test]
    fn formats_header_dates() {
        let lang = SimpleLanguage::new();
        assert_eq!(eval(&lang, "${date:header.birthday:yyyyMMdd}"), json!("20240301"));
        assert_eq!(eval(&lang, "${date:header.birthday+1d:yyyyMMdd}"), json!("20240302"));
        assert_eq!(eval(&lang, "${date:header.epoch:yyyy}"), json!("1970"));
        assert_eq!(eval(&lang, "${date:header.birthday}"), json!("2024-03-01T10:00:00.000Z"));
        assert_eq!(eval(&lang, "${date:header.missing:yyyy}"), Value::Null);
    }

    #[test]
    fn applies_timezones() {
        let lang = SimpleLanguage::new();
        assert_eq!(
            eval(&lang, "${date-with-timezone:header.birthday:Asia/Tokyo:HH:mm}"),
            json!("19:00")
        );
        let lang = SimpleLanguage::with_options(
            SimpleOptions::default().with_default_timezone("America/New_York"),
        );
        assert_eq!(eval(&lang, "${date:header.birthday:HH}"), json!("05"));
    }

    #[test]
    fn rejects_unknown_commands_and_zones() {
        let lang = SimpleLanguage::new();
        assert!(lang.parse_expression("${date:tomorrow:yyyy}").is_err());
        assert!(lang.parse_expression("${date-with-timezone:now:Mars/Base:HH}").is_err());
        assert!(lang.parse_expression("${date-with-timezone:now:UTC}").is_err());
    }

    #[test]
    fn offsets_past_the_calendar_are_errors() {
        let lang = SimpleLanguage::new();
        let err = lang
            .parse_expression("${date:now+9223372036854775807:yyyy}")
            .unwrap_err();
        assert!(err.to_string().contains("Date offset out of range"));

        let e = lang.parse_expression("${date:now+100000000d:yyyy}").unwrap();
        let err = e.evaluate_value(&mut DefaultExchange::new()).unwrap_err();
        assert!(matches!(err, SimpleError::Evaluation(_)));
        assert!(err.to_string().contains("Date offset out of range for command: now"));
    }
}
