//! Parsing row tuples into time-series points

use chrono::{DateTime, Utc};
use datasource_plugin::Point;
use serde::Deserialize;
use thiserror::Error;

use crate::error::CsvError;

/// What to do with a row whose timestamp or value does not parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseMode {
    /// Fail the query on the first malformed row
    #[default]
    Strict,
    /// Skip malformed rows and keep going
    Lenient,
}

/// Points in input row order, plus the number of malformed rows skipped
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Series {
    pub points: Vec<Point>,
    pub skipped: usize,
}

#[derive(Error, Debug)]
pub enum TimestampError {
    #[error("expected YYYY-MM-DDTHH:MM:SS[.fraction] followed by Z or +hh:mm")]
    Layout,
    #[error(transparent)]
    Invalid(#[from] chrono::ParseError),
}

#[derive(Error, Debug)]
pub enum ValueError {
    #[error(transparent)]
    Invalid(#[from] std::num::ParseFloatError),
    #[error("value is not finite")]
    NotFinite,
}

const RFC3339_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f%:z";

/// Fixed positions of the RFC 3339 layout: upper-case `T`, and a trailing
/// upper-case `Z` or a `+hh:mm`/`-hh:mm` offset
fn has_rfc3339_layout(text: &str) -> bool {
    let b = text.as_bytes();
    if b.len() < 20 {
        return false;
    }
    let separators = [(4, b'-'), (7, b'-'), (10, b'T'), (13, b':'), (16, b':')];
    if !separators.iter().all(|&(i, c)| b[i] == c) {
        return false;
    }
    if b[b.len() - 1] == b'Z' {
        return true;
    }
    let offset = &b[b.len() - 6..];
    matches!(offset[0], b'+' | b'-') && offset[3] == b':'
}

/// Parse a strict RFC 3339 timestamp; the UTC offset or `Z` is mandatory
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, TimestampError> {
    if !has_rfc3339_layout(text) {
        return Err(TimestampError::Layout);
    }
    let ts = match text.strip_suffix('Z') {
        Some(local) => DateTime::parse_from_str(&format!("{}+00:00", local), RFC3339_FORMAT)?,
        None => DateTime::parse_from_str(text, RFC3339_FORMAT)?,
    };
    Ok(ts.with_timezone(&Utc))
}

/// Parse a base-10 float. NaN and infinities are rejected: they have no
/// representation in the JSON reply.
pub fn parse_value(text: &str) -> Result<f64, ValueError> {
    let value: f64 = text.parse()?;
    if !value.is_finite() {
        return Err(ValueError::NotFinite);
    }
    Ok(value)
}

fn parse_point(time: &str, value: &str) -> Result<Point, String> {
    let timestamp =
        parse_timestamp(time).map_err(|e| format!("invalid timestamp {:?}: {}", time, e))?;
    let value = parse_value(value).map_err(|e| format!("invalid number {:?}: {}", value, e))?;
    Ok(Point::new(timestamp, value))
}

/// Turn row tuples into points.
///
/// Entry 0 of each row is the timestamp, entry 1 the value; further entries
/// are ignored. Rows with fewer than two entries are skipped silently.
/// No sorting is applied.
pub fn build_series<S: AsRef<str>>(rows: &[Vec<S>], mode: ParseMode) -> Result<Series, CsvError> {
    let mut series = Series {
        points: Vec::with_capacity(rows.len()),
        skipped: 0,
    };

    for (index, row) in rows.iter().enumerate() {
        let [time, value, ..] = row.as_slice() else {
            continue;
        };

        match parse_point(time.as_ref(), value.as_ref()) {
            Ok(point) => series.points.push(point),
            Err(message) => match mode {
                ParseMode::Strict => {
                    return Err(CsvError::Parse {
                        row: index + 1,
                        message,
                    });
                }
                ParseMode::Lenient => {
                    log::warn!("Skipping row {}: {}", index + 1, message);
                    series.skipped += 1;
                }
            },
        }
    }

    Ok(series)
}
