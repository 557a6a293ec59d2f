use crate::error::{ErrorKind, Result};
use crate::schema::FieldKind;
use exn::{OptionExt, ResultExt};
use serde_json::Value as Json;
use std::fmt;
use time::PrimitiveDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

/// Canonical textual form of [`Value::DateTime`], used wherever a date has
/// to be written out as a string (SQL columns, JSON bodies, identifiers).
pub const DATETIME_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// A single attribute value.
///
/// Source items usually carry `Text` or `Bytes` straight from wherever they
/// were read; cached items carry whatever their mapper coerced them into.
/// [`Value::Unset`] is the explicit "no value" marker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum Value {
    #[default]
    Unset,
    Int(i64),
    Text(String),
    Bytes(Vec<u8>),
    DateTime(PrimitiveDateTime),
}

impl Value {
    /// Returns `true` for values that should be treated as "nothing there":
    /// unset, or an empty string or byte sequence.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Unset => true,
            Self::Text(text) => text.is_empty(),
            Self::Bytes(bytes) => bytes.is_empty(),
            Self::Int(_) | Self::DateTime(_) => false,
        }
    }

    /// Textual identifier form of the value, as used to address entries in
    /// a backing store. Returns `None` for [`Value::Unset`].
    pub fn as_id(&self) -> Option<String> {
        match self {
            Self::Unset => None,
            Self::Int(int) => Some(int.to_string()),
            Self::Text(text) => Some(text.clone()),
            Self::Bytes(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
            Self::DateTime(datetime) => datetime.format(DATETIME_FORMAT).ok(),
        }
    }

    /// Convert a JSON scalar into a value without any schema knowledge.
    ///
    /// `null` becomes [`Value::Unset`], integers become [`Value::Int`],
    /// strings become [`Value::Text`] and anything else is kept in its JSON
    /// textual form.
    pub fn from_json(json: Json) -> Self {
        match json {
            Json::Null => Self::Unset,
            Json::String(text) => Self::Text(text),
            Json::Number(number) => match number.as_i64() {
                Some(int) => Self::Int(int),
                None => Self::Text(number.to_string()),
            },
            other => Self::Text(other.to_string()),
        }
    }

    /// Decode a JSON value that was previously written by [`Value::to_json`]
    /// for an attribute of the given kind.
    pub fn from_json_as(kind: FieldKind, attribute: &str, json: Json) -> Result<Self> {
        if json.is_null() {
            return Ok(Self::Unset);
        }
        let invalid = || ErrorKind::InvalidValue(attribute.to_string());
        match kind {
            FieldKind::Integer => match &json {
                Json::Number(number) => Ok(Self::Int(number.as_i64().ok_or_raise(invalid)?)),
                Json::String(text) => Ok(Self::Int(text.trim().parse::<i64>().or_raise(invalid)?)),
                _ => exn::bail!(invalid()),
            },
            FieldKind::DateTime => {
                let text = json.as_str().ok_or_raise(invalid)?;
                Ok(Self::DateTime(PrimitiveDateTime::parse(text, DATETIME_FORMAT).or_raise(invalid)?))
            },
            FieldKind::Text | FieldKind::Raw => Ok(Self::from_json(json)),
        }
    }

    /// Encode the value as a JSON scalar.
    ///
    /// Bytes are decoded as UTF-8 (invalid sequences replaced) since JSON has
    /// no byte string type.
    pub fn to_json(&self) -> Json {
        match self {
            Self::Unset => Json::Null,
            Self::Int(int) => Json::from(*int),
            Self::Text(text) => Json::String(text.clone()),
            Self::Bytes(bytes) => Json::String(String::from_utf8_lossy(bytes).into_owned()),
            Self::DateTime(_) => self.as_id().map(Json::String).unwrap_or(Json::Null),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_id() {
            Some(text) => f.write_str(&text),
            None => f.write_str("<unset>"),
        }
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}
impl From<String> for Value {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}
impl From<i64> for Value {
    fn from(int: i64) -> Self {
        Self::Int(int)
    }
}
impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}
impl From<&[u8]> for Value {
    fn from(bytes: &[u8]) -> Self {
        Self::Bytes(bytes.to_vec())
    }
}
impl From<PrimitiveDateTime> for Value {
    fn from(datetime: PrimitiveDateTime) -> Self {
        Self::DateTime(datetime)
    }
}
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}
