use crate::datetime::parse_datetime;
use crate::error::{ErrorKind, Result};
use crate::managed::AttributeKey;
use exn::ResultExt;
use recon_model::{FieldKind, Value};

/// Coerce a raw source value into the value stored on a cached attribute.
pub(crate) fn coerce(attribute: &str, kind: FieldKind, key: &AttributeKey, raw: &Value) -> Result<Value> {
    if let Some(transform) = key.transform() {
        if raw.is_empty() {
            return Ok(Value::Unset);
        }
        return transform
            .manage(raw)
            .or_raise(|| ErrorKind::Transform(attribute.to_string()));
    }
    Ok(match kind {
        FieldKind::Integer => integer(raw),
        FieldKind::Text => text(raw),
        FieldKind::DateTime => datetime(raw),
        FieldKind::Raw => raw.clone(),
    })
}

/// Unmanaged date/time fields accept anything [`parse_datetime`] does;
/// everything else becomes unset.
fn datetime(raw: &Value) -> Value {
    let parsed = match raw {
        Value::DateTime(datetime) => Some(*datetime),
        Value::Text(text) => parse_datetime(text).ok(),
        Value::Bytes(bytes) => parse_datetime(&String::from_utf8_lossy(bytes)).ok(),
        Value::Unset | Value::Int(_) => None,
    };
    parsed.map(Value::DateTime).unwrap_or_default()
}

fn integer(raw: &Value) -> Value {
    let parsed = match raw {
        Value::Int(int) => Some(*int),
        Value::Text(text) => text.trim().parse().ok(),
        Value::Bytes(bytes) => std::str::from_utf8(bytes).ok().and_then(|text| text.trim().parse().ok()),
        Value::Unset | Value::DateTime(_) => None,
    };
    parsed.map(Value::Int).unwrap_or_default()
}

fn text(raw: &Value) -> Value {
    match raw {
        Value::Bytes(bytes) if !bytes.is_empty() => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        empty if empty.is_empty() => Value::Unset,
        other => other.clone(),
    }
}
