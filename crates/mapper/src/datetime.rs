//! Date normalization for loosely formatted source dates.

use crate::error::{ErrorKind, Result};
use crate::managed::ManagedAttribute;
use exn::{OptionExt, ResultExt};
use recon_model::{FieldKind, Value};
use regex::Regex;
use std::sync::LazyLock;
use time::{Date, Month, PrimitiveDateTime, Time};

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

regex!(YEAR_FIRST, r"^(\d{4})/(\d{1,2})/(\d{1,2})$");
regex!(MONTH_FIRST, r"^(\d{1,2})/(\d{1,2})/(\d{4})$");
regex!(CLOCK, r"^(\d{1,2}):(\d{1,2})(?::(\d{1,2}))?$");

/// Parse `YYYY/MM/DD` or `M/D/YYYY`, optionally followed by a space and
/// `HH:MM[:SS]`. Dashes are accepted in place of slashes. Missing time
/// components are zero.
pub fn parse_datetime(input: &str) -> Result<PrimitiveDateTime> {
    let invalid = || ErrorKind::InvalidDateTime(input.to_string());
    let normalized = input.trim().replace('-', "/");
    let mut parts = normalized.split_whitespace();
    let date = parts.next().ok_or_raise(invalid)?;
    let clock = parts.next();
    if parts.next().is_some() {
        exn::bail!(invalid());
    }

    let (year, month, day) = match (YEAR_FIRST.captures(date), MONTH_FIRST.captures(date)) {
        (Some(captures), _) => (captures[1].parse::<i32>(), captures[2].parse::<u8>(), captures[3].parse::<u8>()),
        (_, Some(captures)) => (captures[3].parse::<i32>(), captures[1].parse::<u8>(), captures[2].parse::<u8>()),
        _ => exn::bail!(invalid()),
    };
    let month = Month::try_from(month.or_raise(invalid)?).or_raise(invalid)?;
    let date = Date::from_calendar_date(year.or_raise(invalid)?, month, day.or_raise(invalid)?).or_raise(invalid)?;

    let time = match clock {
        None => Time::MIDNIGHT,
        Some(clock) => {
            let captures = CLOCK.captures(clock).ok_or_raise(invalid)?;
            let hour = captures[1].parse::<u8>().or_raise(invalid)?;
            let minute = captures[2].parse::<u8>().or_raise(invalid)?;
            let second = match captures.get(3) {
                Some(second) => second.as_str().parse::<u8>().or_raise(invalid)?,
                None => 0,
            };
            Time::from_hms(hour, minute, second).or_raise(invalid)?
        },
    };
    Ok(PrimitiveDateTime::new(date, time))
}

/// Managed attribute turning textual dates into [`Value::DateTime`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizedDateTime;

impl ManagedAttribute for NormalizedDateTime {
    fn name(&self) -> &'static str {
        "datetime"
    }

    fn kind(&self) -> FieldKind {
        FieldKind::DateTime
    }

    fn manage(&self, value: &Value) -> Result<Value> {
        let text = match value {
            Value::DateTime(_) => return Ok(value.clone()),
            Value::Text(text) => text.clone(),
            Value::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            Value::Int(_) | Value::Unset => exn::bail!(ErrorKind::InvalidDateTime(value.to_string())),
        };
        Ok(Value::DateTime(parse_datetime(&text)?))
    }
}
