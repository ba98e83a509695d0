//! Record date normalization.
//!
//! Callers send either a calendar date (`2024-03-15`) or a full timestamp. Plain
//! dates are pinned to noon UTC so that month-boundary filters give the same
//! answer whatever timezone the server runs in.

use core::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{DomainError, DomainResult};

/// Hour (UTC) assigned to plain calendar dates.
pub const PLAIN_DATE_HOUR_UTC: u32 = 12;

const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"];

/// What to do with a date string that cannot be parsed.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatePolicy {
    /// Fall back to the current time.
    #[default]
    Lenient,
    /// Reject with a validation error.
    Strict,
}

impl FromStr for DatePolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lenient" => Ok(Self::Lenient),
            "strict" => Ok(Self::Strict),
            other => Err(DomainError::validation(format!(
                "unknown date policy '{other}' (expected lenient or strict)"
            ))),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DateResolution {
    pub at: DateTime<Utc>,
    /// The input was unparseable and `at` is the fallback time.
    pub fell_back: bool,
}

/// Resolve a caller-supplied record date. Missing or blank input means `now`.
pub fn resolve_record_date(
    input: Option<&str>,
    policy: DatePolicy,
    now: DateTime<Utc>,
) -> DomainResult<DateResolution> {
    let raw = match input.map(str::trim) {
        None | Some("") => return Ok(DateResolution { at: now, fell_back: false }),
        Some(raw) => raw,
    };

    if let Some(at) = parse(raw) {
        return Ok(DateResolution { at, fell_back: false });
    }

    match policy {
        DatePolicy::Lenient => Ok(DateResolution { at: now, fell_back: true }),
        DatePolicy::Strict => Err(DomainError::validation(format!(
            "unparseable date '{raw}'"
        ))),
    }
}

fn parse(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date
            .and_hms_opt(PLAIN_DATE_HOUR_UTC, 0, 0)
            .map(|dt| dt.and_utc());
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|dt| dt.and_utc())
}
