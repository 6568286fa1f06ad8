//! Canonical observation model
//!
//! An [`Observation`] is one (country, year, sex) life-expectancy measurement
//! that has passed every plausibility rule. The only way to build one is
//! [`Observation::new`], so anything holding an `Observation` may assume:
//!
//! - the country code is 2 or 3 ASCII letters, upper-cased
//! - the year lies in `[1900, current year]`
//! - each present value/low/high lies strictly inside `(0, 150)`

use crate::error::ValidationError;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

/// Earliest accepted observation year
pub const MIN_YEAR: i32 = 1900;

/// Exclusive lower bound for value, low and high
pub const MIN_PLAUSIBLE_VALUE: f64 = 0.0;

/// Exclusive upper bound for value, low and high
pub const MAX_PLAUSIBLE_VALUE: f64 = 150.0;

/// Sex dimension of an observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sex {
    #[serde(rename = "MLE")]
    Male,
    #[serde(rename = "FMLE")]
    Female,
    #[serde(rename = "BTSX")]
    Both,
}

impl Sex {
    /// Code stored in the database
    pub fn code(self) -> &'static str {
        match self {
            Sex::Male => "MLE",
            Sex::Female => "FMLE",
            Sex::Both => "BTSX",
        }
    }
}

impl std::str::FromStr for Sex {
    type Err = ValidationError;

    /// Accepts both `MLE` and the prefixed `SEX_MLE` form used by the API.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_uppercase();
        match code.strip_prefix("SEX_").unwrap_or(&code) {
            "MLE" => Ok(Sex::Male),
            "FMLE" => Ok(Sex::Female),
            "BTSX" => Ok(Sex::Both),
            _ => Err(ValidationError::new("sex", format!("unknown sex code '{}'", s))),
        }
    }
}

impl std::fmt::Display for Sex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Unvalidated field values for one observation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservationFields {
    pub indicator_code: String,
    pub country_code: String,
    pub continent: Option<String>,
    pub year: i64,
    pub sex: Option<Sex>,
    pub value: Option<f64>,
    pub low: Option<f64>,
    pub high: Option<f64>,
    pub date_modified: Option<DateTime<Utc>>,
}

/// A validated, normalized observation ready for storage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    indicator_code: String,
    country_code: String,
    continent: Option<String>,
    year: i32,
    sex: Option<Sex>,
    value: Option<f64>,
    low: Option<f64>,
    high: Option<f64>,
    date_modified: Option<DateTime<Utc>>,
}

impl Observation {
    /// Validate `fields` against the current calendar year
    pub fn new(fields: ObservationFields) -> Result<Self, ValidationError> {
        Self::with_max_year(fields, Utc::now().year())
    }

    /// Validate `fields` with an explicit inclusive year ceiling
    pub fn with_max_year(fields: ObservationFields, max_year: i32) -> Result<Self, ValidationError> {
        let indicator_code = fields.indicator_code.trim().to_string();
        if indicator_code.is_empty() {
            return Err(ValidationError::new("indicator_code", "missing"));
        }

        Ok(Self {
            indicator_code,
            country_code: normalize_country_code(&fields.country_code)?,
            continent: fields
                .continent
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty()),
            year: check_year(fields.year, max_year)?,
            sex: fields.sex,
            value: check_plausible("value", fields.value)?,
            low: check_plausible("low", fields.low)?,
            high: check_plausible("high", fields.high)?,
            date_modified: fields.date_modified,
        })
    }

    pub fn indicator_code(&self) -> &str {
        &self.indicator_code
    }

    pub fn country_code(&self) -> &str {
        &self.country_code
    }

    pub fn continent(&self) -> Option<&str> {
        self.continent.as_deref()
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn sex(&self) -> Option<Sex> {
        self.sex
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn low(&self) -> Option<f64> {
        self.low
    }

    pub fn high(&self) -> Option<f64> {
        self.high
    }

    pub fn date_modified(&self) -> Option<DateTime<Utc>> {
        self.date_modified
    }
}

fn normalize_country_code(raw: &str) -> Result<String, ValidationError> {
    let code = raw.trim();

    if !(2..=3).contains(&code.len()) {
        return Err(ValidationError::new(
            "country_code",
            format!("'{}' must be 2 or 3 letters", raw),
        ));
    }

    if !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ValidationError::new(
            "country_code",
            format!("'{}' must be alphabetic", raw),
        ));
    }

    Ok(code.to_ascii_uppercase())
}

fn check_year(year: i64, max_year: i32) -> Result<i32, ValidationError> {
    if year < i64::from(MIN_YEAR) || year > i64::from(max_year) {
        return Err(ValidationError::new(
            "year",
            format!("{} is outside [{}, {}]", year, MIN_YEAR, max_year),
        ));
    }
    // bounded above by an i32
    Ok(year as i32)
}

fn check_plausible(field: &'static str, value: Option<f64>) -> Result<Option<f64>, ValidationError> {
    match value {
        None => Ok(None),
        Some(v) if v > MIN_PLAUSIBLE_VALUE && v < MAX_PLAUSIBLE_VALUE => Ok(Some(v)),
        Some(v) => Err(ValidationError::new(
            field,
            format!(
                "{} is outside ({}, {})",
                v, MIN_PLAUSIBLE_VALUE, MAX_PLAUSIBLE_VALUE
            ),
        )),
    }
}
