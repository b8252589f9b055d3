//! Lenient numeric and date parsing for government text fields

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::BigDecimal;
use std::str::FromStr;

use crate::ingest::error::DecodeError;

/// Parse a decimal, accepting a comma as decimal separator.
///
/// Blank input is zero. When a comma is present, dots before it are taken
/// as thousands separators (`1.234,56`); a dot after the comma
/// (`1,234.56`) or a second comma is an error.
pub fn decimal(field: &'static str, raw: Option<&str>) -> Result<BigDecimal, DecodeError> {
    let trimmed = raw.map(str::trim).unwrap_or_default();
    if trimmed.is_empty() {
        return Ok(BigDecimal::from(0));
    }
    let invalid = || DecodeError::InvalidNumber {
        field,
        value: trimmed.to_string(),
    };
    let normalized = match trimmed.find(',') {
        Some(comma) => {
            let after = &trimmed[comma + 1..];
            if after.contains(',') || after.contains('.') {
                return Err(invalid());
            }
            trimmed.replace('.', "").replace(',', ".")
        },
        None => trimmed.to_string(),
    };
    if !normalized
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'-' | b'+'))
    {
        return Err(invalid());
    }
    BigDecimal::from_str(&normalized).map_err(|_| invalid())
}

/// Parse an optional integer count; blank input is zero.
pub fn count<T: FromStr + Default>(field: &'static str, raw: Option<&str>) -> Result<T, DecodeError> {
    let trimmed = raw.map(str::trim).unwrap_or_default();
    if trimmed.is_empty() {
        return Ok(T::default());
    }
    trimmed.parse().map_err(|_| DecodeError::InvalidNumber {
        field,
        value: trimmed.to_string(),
    })
}

/// Parse a required integer.
pub fn required_int<T: FromStr>(field: &'static str, raw: Option<&str>) -> Result<T, DecodeError> {
    let trimmed = raw.map(str::trim).unwrap_or_default();
    if trimmed.is_empty() {
        return Err(DecodeError::MissingField(field));
    }
    trimmed.parse().map_err(|_| DecodeError::InvalidNumber {
        field,
        value: trimmed.to_string(),
    })
}

/// Parse a required RFC 3339 timestamp into UTC.
pub fn timestamp(field: &'static str, raw: Option<&str>) -> Result<DateTime<Utc>, DecodeError> {
    let trimmed = raw.map(str::trim).unwrap_or_default();
    if trimmed.is_empty() {
        return Err(DecodeError::MissingField(field));
    }
    optional_timestamp(field, Some(trimmed))?.ok_or(DecodeError::MissingField(field))
}

pub fn optional_timestamp(
    field: &'static str,
    raw: Option<&str>,
) -> Result<Option<DateTime<Utc>>, DecodeError> {
    let trimmed = raw.map(str::trim).unwrap_or_default();
    if trimmed.is_empty() {
        return Ok(None);
    }
    DateTime::parse_from_rfc3339(trimmed)
        .map(|dt| Some(dt.with_timezone(&Utc)))
        .map_err(|_| DecodeError::InvalidTimestamp {
            field,
            value: trimmed.to_string(),
        })
}

/// Parse an optional `YYYY-MM-DD` date.
pub fn optional_date(field: &'static str, raw: Option<&str>) -> Result<Option<NaiveDate>, DecodeError> {
    let trimmed = raw.map(str::trim).unwrap_or_default();
    if trimmed.is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| DecodeError::InvalidTimestamp {
            field,
            value: trimmed.to_string(),
        })
}
