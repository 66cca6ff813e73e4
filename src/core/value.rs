//! Purpose: Tyco type declarations and type-directed decoding of value text.
//! Exports: `BaseType`, `TypeSpec`, `RawValue`, `Segment`, `decode_value`.
//! Role: Produces unrendered values; templates and references stay symbolic until render.
//! Invariants: Decoding never consults other declarations (forward references are legal).
//! Invariants: Float values are always finite so they map onto JSON numbers.
use std::fmt;

use time::format_description::well_known::Rfc3339;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time, format_description};

use crate::core::error::{Error, ErrorKind, Result};
use crate::core::lexer::{is_identifier, split_top_level};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BaseType {
    Str,
    Int,
    Float,
    Bool,
    Date,
    Time,
    DateTime,
    Struct(String),
}

impl BaseType {
    fn parse(token: &str) -> Option<Self> {
        let base = match token {
            "str" => BaseType::Str,
            "int" => BaseType::Int,
            "float" => BaseType::Float,
            "bool" => BaseType::Bool,
            "date" => BaseType::Date,
            "time" => BaseType::Time,
            "datetime" => BaseType::DateTime,
            other if is_struct_name(other) => BaseType::Struct(other.to_string()),
            _ => return None,
        };
        Some(base)
    }
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BaseType::Str => f.write_str("str"),
            BaseType::Int => f.write_str("int"),
            BaseType::Float => f.write_str("float"),
            BaseType::Bool => f.write_str("bool"),
            BaseType::Date => f.write_str("date"),
            BaseType::Time => f.write_str("time"),
            BaseType::DateTime => f.write_str("datetime"),
            BaseType::Struct(name) => f.write_str(name),
        }
    }
}

pub fn is_struct_name(text: &str) -> bool {
    text.starts_with(|ch: char| ch.is_ascii_uppercase()) && is_identifier(text)
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TypeSpec {
    pub base: BaseType,
    pub array: bool,
    pub nullable: bool,
}

impl TypeSpec {
    /// Parse `[?]TYPE[[]]`; modifiers such as `*` must already be stripped.
    pub fn parse(token: &str) -> Result<Self> {
        let (nullable, rest) = match token.strip_prefix('?') {
            Some(rest) => (true, rest),
            None => (false, token),
        };
        let (array, rest) = match rest.strip_suffix("[]") {
            Some(rest) => (true, rest),
            None => (false, rest),
        };
        let base = BaseType::parse(rest).ok_or_else(|| {
            Error::new(ErrorKind::Syntax).with_message(format!("unknown type '{token}'"))
        })?;
        Ok(Self {
            base,
            array,
            nullable,
        })
    }
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nullable {
            f.write_str("?")?;
        }
        write!(f, "{}", self.base)?;
        if self.array {
            f.write_str("[]")?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Segment {
    Text(String),
    /// `{path}`; `path` is `name` or `global.name`.
    Placeholder(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum RawValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Vec<Segment>),
    /// Validated date, time, or datetime literal kept in its source spelling.
    Temporal(String),
    Array(Vec<RawValue>),
    /// `Target(key, ...)`; keys are decoded against the target's primary fields at render.
    Reference { target: String, keys: Vec<String> },
}

pub fn decode_value(text: &str, ty: &TypeSpec) -> Result<RawValue> {
    let text = text.trim();
    if text.is_empty() {
        return Err(type_error(format!("missing value for type {ty}")));
    }
    if text == "null" {
        if ty.nullable {
            return Ok(RawValue::Null);
        }
        return Err(type_error(format!("null is not allowed for type {ty}")));
    }
    if ty.array {
        let inner = text
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .ok_or_else(|| type_error(format!("expected an array for type {ty}")))?;
        let items = split_top_level(inner, ',')?
            .iter()
            .map(|item| decode_scalar(item, &ty.base))
            .collect::<Result<Vec<_>>>()?;
        return Ok(RawValue::Array(items));
    }
    decode_scalar(text, &ty.base)
}

fn decode_scalar(text: &str, base: &BaseType) -> Result<RawValue> {
    match base {
        BaseType::Str => decode_str(text),
        BaseType::Int => decode_int(text).map(RawValue::Int),
        BaseType::Float => decode_float(text).map(RawValue::Float),
        BaseType::Bool => match text {
            "true" => Ok(RawValue::Bool(true)),
            "false" => Ok(RawValue::Bool(false)),
            _ => Err(type_error(format!("invalid bool '{text}'"))),
        },
        BaseType::Date => {
            validate_temporal(text, "date", &["[year]-[month]-[day]"], |input, fmt| {
                Date::parse(input, fmt).is_ok()
            })
        }
        BaseType::Time => validate_temporal(
            text,
            "time",
            &[
                "[hour]:[minute]:[second]",
                "[hour]:[minute]:[second].[subsecond]",
            ],
            |input, fmt| Time::parse(input, fmt).is_ok(),
        ),
        BaseType::DateTime => decode_datetime(text),
        BaseType::Struct(name) => decode_reference(text, name),
    }
}

fn decode_str(text: &str) -> Result<RawValue> {
    if let Some(rest) = text.strip_prefix('"') {
        let body = rest
            .strip_suffix('"')
            .filter(|body| !ends_with_escape(body))
            .ok_or_else(|| syntax_error("unexpected text after string literal"))?;
        return parse_template(body, true).map(RawValue::Str);
    }
    if let Some(rest) = text.strip_prefix('\'') {
        let body = rest
            .strip_suffix('\'')
            .filter(|body| !body.contains('\''))
            .ok_or_else(|| syntax_error("unexpected text after string literal"))?;
        return Ok(RawValue::Str(vec![Segment::Text(body.to_string())]));
    }
    if text.contains([',', '[', ']', '(', ')', '"', '\'']) {
        return Err(syntax_error(format!(
            "bare string '{text}' contains reserved characters; quote it"
        )));
    }
    parse_template(text, false).map(RawValue::Str)
}

fn ends_with_escape(body: &str) -> bool {
    let trailing = body.chars().rev().take_while(|ch| *ch == '\\').count();
    trailing % 2 == 1
}

/// Split string text into literal and placeholder segments, applying escapes when quoted.
fn parse_template(body: &str, escapes: bool) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut text = String::new();
    let mut chars = body.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' if escapes => text.push(decode_escape(&mut chars)?),
            '"' if escapes => {
                return Err(syntax_error("unexpected text after string literal"));
            }
            '{' => {
                let mut path = String::new();
                let mut closed = false;
                for inner in chars.by_ref() {
                    if inner == '}' {
                        closed = true;
                        break;
                    }
                    path.push(inner);
                }
                if !closed {
                    return Err(syntax_error("unterminated template placeholder"));
                }
                let path = path.trim().to_string();
                if !path.split('.').all(is_identifier) {
                    return Err(syntax_error(format!("invalid template placeholder '{{{path}}}'")));
                }
                if !text.is_empty() {
                    segments.push(Segment::Text(std::mem::take(&mut text)));
                }
                segments.push(Segment::Placeholder(path));
            }
            other => text.push(other),
        }
    }
    if !text.is_empty() || segments.is_empty() {
        segments.push(Segment::Text(text));
    }
    Ok(segments)
}

fn decode_escape(chars: &mut std::str::Chars<'_>) -> Result<char> {
    let ch = chars
        .next()
        .ok_or_else(|| syntax_error("dangling escape in string literal"))?;
    let decoded = match ch {
        '\\' => '\\',
        '"' => '"',
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        '{' => '{',
        '}' => '}',
        'u' => {
            let hex: String = chars.by_ref().take(4).collect();
            if hex.len() != 4 {
                return Err(syntax_error("truncated \\u escape"));
            }
            u32::from_str_radix(&hex, 16)
                .ok()
                .and_then(char::from_u32)
                .ok_or_else(|| syntax_error(format!("invalid \\u escape '{hex}'")))?
        }
        other => return Err(syntax_error(format!("unknown escape '\\{other}'"))),
    };
    Ok(decoded)
}

fn decode_int(text: &str) -> Result<i64> {
    let invalid = || type_error(format!("invalid int '{text}'"));
    let (sign, unsigned) = match text.as_bytes().first() {
        Some(b'-') => ("-", &text[1..]),
        Some(b'+') => ("", &text[1..]),
        _ => ("", text),
    };
    let lower = unsigned.to_ascii_lowercase();
    let (radix, digits) = if let Some(rest) = lower.strip_prefix("0x") {
        (16, rest)
    } else if let Some(rest) = lower.strip_prefix("0o") {
        (8, rest)
    } else if let Some(rest) = lower.strip_prefix("0b") {
        (2, rest)
    } else {
        (10, lower.as_str())
    };
    if digits.is_empty() || digits.starts_with('_') || digits.ends_with('_') {
        return Err(invalid());
    }
    let digits = digits.replace('_', "");
    if !digits.chars().all(|ch| ch.is_digit(radix)) {
        return Err(invalid());
    }
    i64::from_str_radix(&format!("{sign}{digits}"), radix).map_err(|err| invalid().with_source(err))
}

fn decode_float(text: &str) -> Result<f64> {
    let invalid = || type_error(format!("invalid float '{text}'"));
    let cleaned = text.replace('_', "");
    if cleaned.is_empty()
        || !cleaned
            .chars()
            .all(|ch| ch.is_ascii_digit() || matches!(ch, '+' | '-' | '.' | 'e' | 'E'))
    {
        return Err(invalid());
    }
    let value: f64 = cleaned.parse().map_err(|err| invalid().with_source(err))?;
    if !value.is_finite() {
        return Err(type_error(format!("float '{text}' is out of range")));
    }
    Ok(value)
}

fn validate_temporal(
    text: &str,
    label: &str,
    descriptions: &[&str],
    accepts: impl Fn(&str, &[format_description::BorrowedFormatItem<'_>]) -> bool,
) -> Result<RawValue> {
    for description in descriptions {
        let items = format_description::parse_borrowed::<2>(description).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("invalid built-in format description")
                .with_source(err)
        })?;
        if accepts(text, items.as_slice()) {
            return Ok(RawValue::Temporal(text.to_string()));
        }
    }
    Err(type_error(format!("invalid {label} '{text}'")))
}

fn decode_datetime(text: &str) -> Result<RawValue> {
    if OffsetDateTime::parse(text, &Rfc3339).is_ok() {
        return Ok(RawValue::Temporal(text.to_string()));
    }
    if let Ok(value) = validate_temporal(
        text,
        "datetime",
        &[
            "[year]-[month]-[day] [hour]:[minute]:[second][offset_hour sign:mandatory]:[offset_minute]",
            "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond][offset_hour sign:mandatory]:[offset_minute]",
        ],
        |input, fmt| OffsetDateTime::parse(input, fmt).is_ok(),
    ) {
        return Ok(value);
    }
    validate_temporal(
        text,
        "datetime",
        &[
            "[year]-[month]-[day] [hour]:[minute]:[second]",
            "[year]-[month]-[day]T[hour]:[minute]:[second]",
            "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]",
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]",
        ],
        |input, fmt| PrimitiveDateTime::parse(input, fmt).is_ok(),
    )
}

fn decode_reference(text: &str, target: &str) -> Result<RawValue> {
    let expected = || type_error(format!("expected a reference like {target}(key) but found '{text}'"));
    let args = text
        .strip_prefix(target)
        .and_then(|rest| rest.trim_start().strip_prefix('('))
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(expected)?;
    let keys = split_top_level(args, ',')?;
    if keys.is_empty() {
        return Err(type_error(format!("reference to {target} has no key")));
    }
    Ok(RawValue::Reference {
        target: target.to_string(),
        keys,
    })
}

fn type_error(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::Type).with_message(message)
}

fn syntax_error(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::Syntax).with_message(message)
}
