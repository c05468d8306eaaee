//! Field accessors over raw wire JSON.
//!
//! Every accessor comes in a required and an optional form. A JSON `null`
//! counts as absent. An optional field that is present but malformed is an
//! error, never silently dropped.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::DecodeError;

pub(super) type Decoded<T> = Result<T, DecodeError>;

pub(super) fn get<'a>(obj: &'a Value, field: &str) -> Option<&'a Value> {
    obj.get(field).filter(|value| !value.is_null())
}

pub(super) fn required<'a>(obj: &'a Value, field: &str) -> Decoded<&'a Value> {
    get(obj, field).ok_or_else(|| DecodeError::MissingField(field.to_owned()))
}

// ==============================================================================
// Strings And Booleans
// ==============================================================================

fn as_str<'a>(value: &'a Value, field: &str) -> Decoded<&'a str> {
    value
        .as_str()
        .ok_or_else(|| DecodeError::invalid(field, format!("expected string, got {value}")))
}

pub(super) fn required_str<'a>(obj: &'a Value, field: &str) -> Decoded<&'a str> {
    as_str(required(obj, field)?, field)
}

pub(super) fn optional_str(obj: &Value, field: &str) -> Decoded<Option<String>> {
    get(obj, field)
        .map(|value| as_str(value, field).map(str::to_owned))
        .transpose()
}

fn as_bool(value: &Value, field: &str) -> Decoded<bool> {
    value
        .as_bool()
        .ok_or_else(|| DecodeError::invalid(field, format!("expected boolean, got {value}")))
}

pub(super) fn required_bool(obj: &Value, field: &str) -> Decoded<bool> {
    as_bool(required(obj, field)?, field)
}

pub(super) fn optional_bool(obj: &Value, field: &str) -> Decoded<Option<bool>> {
    get(obj, field).map(|value| as_bool(value, field)).transpose()
}

// ==============================================================================
// Integers
// ==============================================================================

/// Accept a decimal string or a native JSON number.
pub(super) fn parse_int<T>(value: &Value, field: &str) -> Decoded<T>
where
    T: TryFrom<i128>,
{
    let n: i128 = match value {
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|e| DecodeError::invalid(field, format!("`{s}` is not an integer: {e}")))?,
        Value::Number(n) => match (n.as_i64(), n.as_u64()) {
            (Some(i), _) => i128::from(i),
            (None, Some(u)) => i128::from(u),
            _ => return Err(DecodeError::invalid(field, format!("`{n}` is not an integer"))),
        },
        other => {
            return Err(DecodeError::invalid(
                field,
                format!("expected integer, got {other}"),
            ))
        }
    };
    T::try_from(n).map_err(|_| DecodeError::invalid(field, format!("{n} out of range")))
}

pub(super) fn required_int<T>(obj: &Value, field: &str) -> Decoded<T>
where
    T: TryFrom<i128>,
{
    parse_int(required(obj, field)?, field)
}

pub(super) fn optional_int<T>(obj: &Value, field: &str) -> Decoded<Option<T>>
where
    T: TryFrom<i128>,
{
    get(obj, field).map(|value| parse_int(value, field)).transpose()
}

// ==============================================================================
// Bytes
// ==============================================================================

pub(super) fn parse_hex(value: &Value, field: &str) -> Decoded<Vec<u8>> {
    let s = as_str(value, field)?;
    hex::decode(s).map_err(|e| DecodeError::invalid(field, format!("invalid hex: {e}")))
}

pub(super) fn parse_base64(value: &Value, field: &str) -> Decoded<Vec<u8>> {
    let s = as_str(value, field)?;
    BASE64
        .decode(s)
        .map_err(|e| DecodeError::invalid(field, format!("invalid base64: {e}")))
}

pub(super) fn required_hex(obj: &Value, field: &str) -> Decoded<Vec<u8>> {
    parse_hex(required(obj, field)?, field)
}

pub(super) fn required_base64(obj: &Value, field: &str) -> Decoded<Vec<u8>> {
    parse_base64(required(obj, field)?, field)
}

pub(super) fn optional_base64(obj: &Value, field: &str) -> Decoded<Option<Vec<u8>>> {
    get(obj, field)
        .map(|value| parse_base64(value, field))
        .transpose()
}

// ==============================================================================
// Time And Collections
// ==============================================================================

pub(super) fn required_time(obj: &Value, field: &str) -> Decoded<OffsetDateTime> {
    let s = required_str(obj, field)?;
    OffsetDateTime::parse(s, &Rfc3339)
        .map_err(|e| DecodeError::invalid(field, format!("`{s}` is not an RFC 3339 time: {e}")))
}

fn as_array<'a>(value: &'a Value, field: &str) -> Decoded<&'a [Value]> {
    value
        .as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| DecodeError::invalid(field, format!("expected array, got {value}")))
}

pub(super) fn required_array<'a>(obj: &'a Value, field: &str) -> Decoded<&'a [Value]> {
    as_array(required(obj, field)?, field)
}

pub(super) fn optional_array<'a>(obj: &'a Value, field: &str) -> Decoded<Option<&'a [Value]>> {
    get(obj, field).map(|value| as_array(value, field)).transpose()
}

/// Decode every element of a required array.
pub(super) fn required_list<T>(
    obj: &Value,
    field: &str,
    decode: impl Fn(&Value) -> Decoded<T>,
) -> Decoded<Vec<T>> {
    required_array(obj, field)?.iter().map(decode).collect()
}

/// Decode every element of an optional array; absence stays `None`.
pub(super) fn optional_list<T>(
    obj: &Value,
    field: &str,
    decode: impl Fn(&Value) -> Decoded<T>,
) -> Decoded<Option<Vec<T>>> {
    optional_array(obj, field)?
        .map(|items| items.iter().map(decode).collect())
        .transpose()
}
