//! Soil reading endpoints.
//!
//! - POST /api/v1/soil-readings (device ingestion, `X-Device-Key`)
//! - GET /api/v1/lands/:id/soil-readings?start_date=&end_date=&limit=&offset=

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::{AuthUser, DeviceKey};
use crate::db::models::SoilReading;
use crate::db::queries::{self, ReadingFilter};
use crate::errors::{AppError, ErrorResponse};
use crate::helpers::{opt_dec_to_f64, parse_iso8601};
use crate::routes::page;
use crate::services::ingest::{self, IngestOutcome, ReadingPayload};

const DEFAULT_READING_PAGE: i64 = 100;
const MAX_READING_PAGE: i64 = 1000;

pub const ACCEPTED_MESSAGE: &str = "Reading accepted";
pub const IGNORED_MESSAGE: &str = "Device is not assigned to a land plot. Reading ignored.";

#[derive(Debug, Serialize, ToSchema)]
pub struct IngestResponse {
    pub message: String,
    /// "stored" or "ignored"
    pub status: String,
    /// Present when stored
    pub reading_id: Option<Uuid>,
    pub land_id: Option<Uuid>,
}

impl From<IngestOutcome> for IngestResponse {
    fn from(outcome: IngestOutcome) -> Self {
        match outcome {
            IngestOutcome::Stored {
                reading_id,
                land_id,
                ..
            } => Self {
                message: ACCEPTED_MESSAGE.to_string(),
                status: "stored".to_string(),
                reading_id: Some(reading_id),
                land_id: Some(land_id),
            },
            IngestOutcome::Ignored { .. } => Self {
                message: IGNORED_MESSAGE.to_string(),
                status: "ignored".to_string(),
                reading_id: None,
                land_id: None,
            },
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ReadingListQuery {
    /// Inclusive lower bound on observation time (ISO 8601)
    pub start_date: Option<String>,
    /// Inclusive upper bound on observation time (ISO 8601)
    pub end_date: Option<String>,
    /// Page size, at most 1000 (default 100)
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SoilReadingResponse {
    pub id: Uuid,
    pub device_id: Uuid,
    pub land_id: Uuid,
    pub observed_at: String,
    pub received_at: String,
    pub ph_value: Option<f64>,
    pub nitrogen_value: Option<f64>,
    pub phosphorus_value: Option<f64>,
    pub potassium_value: Option<f64>,
    pub moisture_value: Option<f64>,
    pub temperature_value: Option<f64>,
    pub humidity_value: Option<f64>,
}

impl From<SoilReading> for SoilReadingResponse {
    fn from(r: SoilReading) -> Self {
        Self {
            id: r.id,
            device_id: r.device_id,
            land_id: r.land_id,
            observed_at: r.observed_at.to_rfc3339(),
            received_at: r.received_at.to_rfc3339(),
            ph_value: opt_dec_to_f64(r.ph_value),
            nitrogen_value: opt_dec_to_f64(r.nitrogen_value),
            phosphorus_value: opt_dec_to_f64(r.phosphorus_value),
            potassium_value: opt_dec_to_f64(r.potassium_value),
            moisture_value: opt_dec_to_f64(r.moisture_value),
            temperature_value: opt_dec_to_f64(r.temperature_value),
            humidity_value: opt_dec_to_f64(r.humidity_value),
        }
    }
}

impl ReadingListQuery {
    fn to_filter(&self) -> Result<ReadingFilter, AppError> {
        let bound = |raw: &Option<String>| {
            raw.as_deref()
                .map(|s| parse_iso8601(s).ok_or_else(|| AppError::InvalidTimestamp(s.to_string())))
                .transpose()
        };
        let start = bound(&self.start_date)?;
        let end = bound(&self.end_date)?;
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(AppError::BadRequest(
                    "start_date must not be after end_date".to_string(),
                ));
            }
        }
        let (limit, offset) = page(self.limit, self.offset, DEFAULT_READING_PAGE, MAX_READING_PAGE);
        Ok(ReadingFilter {
            start,
            end,
            limit,
            offset,
        })
    }
}

/// Submit a sensor reading.
///
/// The reading is stored against the land the device is currently assigned
/// to. Readings from a registered but unassigned device are acknowledged and
/// dropped.
#[utoipa::path(
    post,
    path = "/api/v1/soil-readings",
    tag = "Soil readings",
    request_body = ReadingPayload,
    params(("X-Device-Key" = String, Header, description = "Device key, `device-key-...`")),
    responses(
        (status = 202, description = "Reading accepted or ignored", body = IngestResponse),
        (status = 400, description = "Malformed payload, timestamp or value", body = ErrorResponse),
        (status = 401, description = "Missing device key", body = ErrorResponse),
        (status = 404, description = "Unknown device", body = ErrorResponse),
    )
)]
pub async fn ingest_reading(
    State(pool): State<PgPool>,
    _key: DeviceKey,
    payload: Result<Json<ReadingPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<IngestResponse>), AppError> {
    let Json(payload) =
        payload.map_err(|e| AppError::BadRequest(format!("invalid payload: {}", e.body_text())))?;
    let reading = payload.validate()?;
    let outcome = ingest::ingest(&pool, reading).await?;
    Ok((StatusCode::ACCEPTED, Json(outcome.into())))
}

/// List a land plot's readings, newest observation first.
#[utoipa::path(
    get,
    path = "/api/v1/lands/{id}/soil-readings",
    tag = "Soil readings",
    params(("id" = Uuid, Path, description = "Land UUID"), ReadingListQuery),
    responses(
        (status = 200, description = "Readings", body = Vec<SoilReadingResponse>),
        (status = 400, description = "Invalid date filter", body = ErrorResponse),
        (status = 404, description = "Land not found", body = ErrorResponse),
    )
)]
pub async fn list_land_readings(
    State(pool): State<PgPool>,
    auth: AuthUser,
    Path(land_id): Path<Uuid>,
    Query(q): Query<ReadingListQuery>,
) -> Result<Json<Vec<SoilReadingResponse>>, AppError> {
    let filter = q.to_filter()?;
    queries::get_land_for_user(&pool, land_id, auth.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Land {} not found", land_id)))?;
    let readings = queries::list_soil_readings(&pool, land_id, &filter).await?;
    Ok(Json(
        readings.into_iter().map(SoilReadingResponse::from).collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(start: Option<&str>, end: Option<&str>, limit: Option<i64>) -> ReadingListQuery {
        ReadingListQuery {
            start_date: start.map(str::to_string),
            end_date: end.map(str::to_string),
            limit,
            offset: None,
        }
    }

    #[test]
    fn test_filter_defaults() {
        let f = query(None, None, None).to_filter().unwrap();
        assert_eq!((f.limit, f.offset), (100, 0));
        assert!(f.start.is_none() && f.end.is_none());
    }

    #[test]
    fn test_filter_caps_limit() {
        assert_eq!(query(None, None, Some(10_000)).to_filter().unwrap().limit, 1000);
    }

    #[test]
    fn test_filter_rejects_bad_or_inverted_dates() {
        assert!(matches!(
            query(Some("last week"), None, None).to_filter(),
            Err(AppError::InvalidTimestamp(_))
        ));
        assert!(matches!(
            query(Some("2025-04-02"), Some("2025-04-01"), None).to_filter(),
            Err(AppError::BadRequest(_))
        ));
        assert!(query(Some("2025-04-01"), Some("2025-04-01T23:59:59Z"), None)
            .to_filter()
            .is_ok());
    }

    #[test]
    fn test_ingest_response_messages() {
        let stored = IngestResponse::from(IngestOutcome::Stored {
            reading_id: Uuid::new_v4(),
            device_id: Uuid::new_v4(),
            land_id: Uuid::new_v4(),
        });
        assert_eq!(stored.message, ACCEPTED_MESSAGE);
        assert_eq!(stored.status, "stored");

        let ignored = IngestResponse::from(IngestOutcome::Ignored {
            device_id: Uuid::new_v4(),
        });
        assert_eq!(ignored.message, IGNORED_MESSAGE);
        assert!(ignored.reading_id.is_none());
    }
}
