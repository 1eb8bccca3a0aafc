// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Typed-literal conversions for notification attributes.
//!
//! A conversion turns the raw attribute text into the lexical form of a
//! typed literal. Only two kinds exist:
//!
//! - `None` keeps the raw text and attaches the configured datatype.
//! - `DateTimeFromEpochOrString` accepts an epoch (seconds or
//!   milliseconds) or an ISO-like date/time and rewrites it as
//!   `YYYY-MM-DDTHH:MM:SS` in UTC.

use crate::rdf::Term;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Epoch values at or above this magnitude are read as milliseconds.
const EPOCH_MILLIS_THRESHOLD: f64 = 1e11;

/// Lexical form written for converted date/times.
const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Naive layouts accepted after RFC 3339 has been tried.
const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
];

/// Conversion errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConversionError {
    #[error("cannot read {value:?} as a date/time")]
    DateTime { value: String },
}

/// How a raw attribute value becomes a literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConversionKind {
    #[default]
    None,
    DateTimeFromEpochOrString,
}

/// A typed-literal rule bound to one attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeConversion {
    /// Attribute name as configured.
    pub attribute: String,
    /// Datatype tag attached to the literal.
    pub datatype: String,
    /// Conversion applied to the raw text.
    pub kind: ConversionKind,
}

impl TypeConversion {
    pub fn new(attribute: impl Into<String>, datatype: impl Into<String>, kind: ConversionKind) -> Self {
        Self {
            attribute: attribute.into(),
            datatype: datatype.into(),
            kind,
        }
    }

    /// Apply this rule to a raw attribute value.
    pub fn apply(&self, raw: &str) -> Result<Term, ConversionError> {
        let lexical = match self.kind {
            ConversionKind::None => raw.to_string(),
            ConversionKind::DateTimeFromEpochOrString => format_datetime(raw)?,
        };
        Ok(Term::typed(lexical, self.datatype.clone()))
    }
}

/// Parse an epoch or ISO-like value and format it as `YYYY-MM-DDTHH:MM:SS`.
pub fn format_datetime(raw: &str) -> Result<String, ConversionError> {
    parse_datetime(raw.trim())
        .map(|dt| dt.format(DATETIME_FORMAT).to_string())
        .ok_or_else(|| ConversionError::DateTime {
            value: raw.to_string(),
        })
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    if let Some(dt) = parse_epoch(s) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn parse_epoch(s: &str) -> Option<DateTime<Utc>> {
    let numeric = s
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.'));
    if !numeric {
        return None;
    }
    let value: f64 = s.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    let millis = if value.abs() >= EPOCH_MILLIS_THRESHOLD {
        value
    } else {
        value * 1000.0
    };
    DateTime::from_timestamp_millis(millis.round() as i64)
}
