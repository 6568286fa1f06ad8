//! Raw record to canonical observation
//!
//! [`transform`] never fails outward: every coercion or validation problem is
//! returned as [`Transformed::Invalid`] with the originating error attached.

use crate::error::ValidationError;
use crate::model::{Observation, ObservationFields, Sex};
use crate::source::RawRecord;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

/// Outcome of transforming one raw record
#[derive(Debug, Clone, PartialEq)]
pub enum Transformed {
    Valid(Observation),
    Invalid(ValidationError),
}

impl Transformed {
    pub fn valid(self) -> Option<Observation> {
        match self {
            Transformed::Valid(obs) => Some(obs),
            Transformed::Invalid(_) => None,
        }
    }
}

impl From<Result<Observation, ValidationError>> for Transformed {
    fn from(result: Result<Observation, ValidationError>) -> Self {
        match result {
            Ok(obs) => Transformed::Valid(obs),
            Err(err) => Transformed::Invalid(err),
        }
    }
}

/// Map one raw record into a validated observation
pub fn transform(raw: &RawRecord) -> Transformed {
    coerce(raw).and_then(Observation::new).into()
}

/// Decode one page element and transform it
///
/// An element that is not a record object, or whose fields have the wrong
/// JSON types, is invalid under the field name `record`.
pub fn transform_value(value: &Value) -> Transformed {
    match RawRecord::deserialize(value) {
        Ok(raw) => transform(&raw),
        Err(e) => Transformed::Invalid(ValidationError::new("record", e.to_string())),
    }
}

fn coerce(raw: &RawRecord) -> Result<ObservationFields, ValidationError> {
    let year = match raw.time_dim.as_ref() {
        Some(value) => coerce_year(value)?,
        None => return Err(ValidationError::new("year", "missing")),
    };

    Ok(ObservationFields {
        indicator_code: raw.indicator_code.clone().unwrap_or_default(),
        country_code: raw
            .spatial_dim
            .clone()
            .ok_or_else(|| ValidationError::new("country_code", "missing"))?,
        continent: raw.parent_location.clone(),
        year,
        sex: non_blank(raw.dim1.as_deref())
            .map(str::parse::<Sex>)
            .transpose()?,
        value: coerce_number("value", raw.numeric_value.as_ref())?,
        low: coerce_number("low", raw.low.as_ref())?,
        high: coerce_number("high", raw.high.as_ref())?,
        date_modified: non_blank(raw.date.as_deref())
            .map(parse_timestamp)
            .transpose()?,
    })
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// `None` and JSON `null` are "not reported"; `0` is a value.
fn coerce_number(field: &'static str, value: Option<&Value>) -> Result<Option<f64>, ValidationError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| ValidationError::new(field, format!("{} is not representable", n))),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| ValidationError::new(field, format!("'{}' is not a number", s))),
        Some(other) => Err(ValidationError::new(
            field,
            format!("unexpected JSON value {}", other),
        )),
    }
}

fn coerce_year(value: &Value) -> Result<i64, ValidationError> {
    let year = match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            // whole floats such as 2020.0
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    year.ok_or_else(|| ValidationError::new("year", format!("{} is not an integer year", value)))
}

/// Parse an ISO-8601 timestamp into UTC
///
/// Accepts RFC 3339 (`Z` or numeric offset) and zone-less timestamps, which
/// are taken as UTC.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, ValidationError> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| ValidationError::new("date_modified", format!("'{}': {}", s, e)))
}
