//! Purpose: Typed cell values, TFS type codes and token-level type inference.
//! Exports: `Value`, `ValueKind`, `TypeCode`, `parse_token`, `infer_kind`, `format_float`.
//! Role: Leaf module shared by the header, table, reader and writer.
//! Invariants: A `Value` never changes kind after parsing.
//! Invariants: `format_float` output parses back to the identical f64 (NaN aside).
use std::fmt;

use serde_json::json;

use crate::core::error::{Error, ErrorKind};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ValueKind {
    Int,
    Float,
    Text,
}

impl ValueKind {
    pub fn is_numeric(self) -> bool {
        matches!(self, ValueKind::Int | ValueKind::Float)
    }

    pub fn label(self) -> &'static str {
        match self {
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Text => "text",
        }
    }
}

/// A declared type code such as `%d`, `%le` or `%20s`, kept verbatim.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct TypeCode(String);

impl TypeCode {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn for_kind(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Int => Self::new("%d"),
            ValueKind::Float => Self::new("%le"),
            ValueKind::Text => Self::new("%s"),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Kind named by the code, or `None` when the code is not recognised.
    pub fn kind(&self) -> Option<ValueKind> {
        let body = self.0.strip_prefix('%')?;
        let conversion = body.trim_start_matches(|c: char| c.is_ascii_digit() || c == '-' || c == '.');
        match conversion {
            "d" | "i" | "u" | "ld" | "li" | "lu" | "lld" | "hd" => Some(ValueKind::Int),
            "le" | "lf" | "lg" | "f" | "e" | "g" | "E" | "G" | "lE" | "lG" => {
                Some(ValueKind::Float)
            }
            "s" => Some(ValueKind::Text),
            _ => None,
        }
    }
}

impl fmt::Display for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Text(_) => ValueKind::Text,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Text(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    /// JSON form; non-finite floats become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Int(v) => json!(v),
            Value::Float(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(v) => json!(v),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => f.write_str(&format_float(*v)),
            Value::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

pub fn is_quoted(token: &str) -> bool {
    let bytes = token.as_bytes();
    bytes.len() >= 2
        && (bytes[0] == b'"' || bytes[0] == b'\'')
        && bytes[bytes.len() - 1] == bytes[0]
}

pub fn unquote(token: &str) -> &str {
    if is_quoted(token) {
        &token[1..token.len() - 1]
    } else {
        token
    }
}

/// Parses one raw token as `kind`. Errors carry no location; callers add it.
pub fn parse_token(kind: ValueKind, token: &str) -> Result<Value, Error> {
    match kind {
        ValueKind::Int => token.parse::<i64>().map(Value::Int).map_err(|err| {
            Error::new(ErrorKind::Parse)
                .with_message(format!("invalid integer `{token}`"))
                .with_source(err)
        }),
        ValueKind::Float => parse_float(token).map(Value::Float).ok_or_else(|| {
            Error::new(ErrorKind::Parse).with_message(format!("invalid float `{token}`"))
        }),
        ValueKind::Text => Ok(Value::Text(unquote(token).to_string())),
    }
}

// Accepts `nan`/`inf` spellings, which MAD-X emits for undefined optics.
fn parse_float(token: &str) -> Option<f64> {
    token.parse::<f64>().ok()
}

/// Kind committed to for a column without a usable type code.
///
/// Tries integer, then float, then text over every token; the first kind
/// all tokens satisfy wins. Quoted tokens only ever satisfy text.
pub fn infer_kind<'a, I>(tokens: I) -> ValueKind
where
    I: IntoIterator<Item = &'a str> + Clone,
{
    let numeric = |token: &str, kind: ValueKind| {
        !is_quoted(token) && parse_token(kind, token).is_ok()
    };
    if tokens.clone().into_iter().all(|t| numeric(t, ValueKind::Int)) {
        return ValueKind::Int;
    }
    if tokens.into_iter().all(|t| numeric(t, ValueKind::Float)) {
        return ValueKind::Float;
    }
    ValueKind::Text
}

/// Shortest round-trip float text with a two-digit signed exponent: `1.5e+00`.
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let raw = format!("{value:e}");
    let Some((mantissa, exponent)) = raw.split_once('e') else {
        return raw;
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let sign = if exponent < 0 { '-' } else { '+' };
    let mantissa = if mantissa.contains('.') {
        mantissa.to_string()
    } else {
        format!("{mantissa}.0")
    };
    format!("{mantissa}e{sign}{:02}", exponent.unsigned_abs())
}

/// Splits a line on whitespace, keeping `"..."` and `'...'` runs (spaces included) as one token.
pub fn split_tokens(line: &str) -> Result<Vec<&str>, Error> {
    let mut tokens = Vec::new();
    let mut rest = line.trim_start();
    while !rest.is_empty() {
        let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'');
        let end = if let Some(quote) = quote {
            let close = rest[1..].find(quote).ok_or_else(|| {
                Error::new(ErrorKind::Parse).with_message("unterminated quoted string")
            })?;
            close + 2
        } else {
            rest.find(char::is_whitespace).unwrap_or(rest.len())
        };
        tokens.push(&rest[..end]);
        rest = rest[end..].trim_start();
    }
    Ok(tokens)
}
