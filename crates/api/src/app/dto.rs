use std::str::FromStr;

use axum::http::StatusCode;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use stockroom_infra::{ChargeOutFilter, DeliveryFilter};
use stockroom_inventory::DeliveryStatus;

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct SetQuantityRequest {
    pub quantity: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConfirmRequest {
    #[serde(default)]
    pub signature: Option<String>,
}

/// `GET /deliveries` query string. Ids are UUIDs; `from`/`to` accept a plain
/// date (midnight UTC) or an RFC 3339 timestamp and form a `[from, to)` window.
#[derive(Debug, Default, Deserialize)]
pub struct DeliveryQuery {
    pub staff_member_id: Option<String>,
    pub status: Option<String>,
    pub batch_id: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

impl DeliveryQuery {
    pub fn into_filter(self) -> Result<DeliveryFilter, axum::response::Response> {
        Ok(DeliveryFilter {
            staff_member_id: parse_opt(self.staff_member_id, "staff_member_id")?,
            status: self
                .status
                .map(|s| DeliveryStatus::from_str(&s))
                .transpose()
                .map_err(|e| {
                    errors::json_error(StatusCode::BAD_REQUEST, "invalid_status", e.to_string())
                })?,
            batch_id: parse_opt(self.batch_id, "batch_id")?,
            from: parse_bound(self.from, "from")?,
            to: parse_bound(self.to, "to")?,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ChargeOutQuery {
    pub staff_member_id: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

impl ChargeOutQuery {
    pub fn into_filter(self) -> Result<ChargeOutFilter, axum::response::Response> {
        Ok(ChargeOutFilter {
            staff_member_id: parse_opt(self.staff_member_id, "staff_member_id")?,
            from: parse_bound(self.from, "from")?,
            to: parse_bound(self.to, "to")?,
        })
    }
}

// -------------------------
// Parsing helpers
// -------------------------

pub fn parse_id<T: FromStr>(raw: &str, field: &'static str) -> Result<T, axum::response::Response> {
    raw.trim().parse().map_err(|_| {
        errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_id",
            format!("{field} must be a UUID"),
        )
    })
}

fn parse_opt<T: FromStr>(
    raw: Option<String>,
    field: &'static str,
) -> Result<Option<T>, axum::response::Response> {
    raw.filter(|s| !s.trim().is_empty())
        .map(|s| parse_id(&s, field))
        .transpose()
}

fn parse_bound(
    raw: Option<String>,
    field: &'static str,
) -> Result<Option<DateTime<Utc>>, axum::response::Response> {
    let Some(raw) = raw.filter(|s| !s.trim().is_empty()) else {
        return Ok(None);
    };
    let raw = raw.trim();

    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(at.with_timezone(&Utc)));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Some(naive.and_utc()))
        .ok_or_else(|| {
            errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_date",
                format!("{field} must be YYYY-MM-DD or an RFC 3339 timestamp"),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use stockroom_core::StaffId;

    #[test]
    fn plain_date_bounds_start_at_midnight() {
        let query = DeliveryQuery {
            from: Some("2024-03-01".into()),
            to: Some("2024-04-01T00:00:00Z".into()),
            ..Default::default()
        };
        let filter = query.into_filter().unwrap();
        assert_eq!(
            filter.from,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(
            filter.to,
            Some(Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn bad_query_values_are_rejected() {
        let bad_status = DeliveryQuery {
            status: Some("lost".into()),
            ..Default::default()
        };
        assert_eq!(
            bad_status.into_filter().unwrap_err().status(),
            StatusCode::BAD_REQUEST
        );

        let bad_date = ChargeOutQuery {
            from: Some("March".into()),
            ..Default::default()
        };
        assert_eq!(
            bad_date.into_filter().unwrap_err().status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn blank_ids_are_ignored() {
        let staff = StaffId::new();
        let filter = ChargeOutQuery {
            staff_member_id: Some(staff.to_string()),
            ..Default::default()
        }
        .into_filter()
        .unwrap();
        assert_eq!(filter.staff_member_id, Some(staff));

        let filter = ChargeOutQuery {
            staff_member_id: Some("  ".into()),
            ..Default::default()
        }
        .into_filter()
        .unwrap();
        assert_eq!(filter.staff_member_id, None);
    }
}
