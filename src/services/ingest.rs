//! Device reading ingestion.
//!
//! A reading is bound to the land and farm its device is assigned to at the
//! moment of ingestion. The device row stays locked from lookup through
//! insert, so a concurrent reassignment either happens entirely before or
//! entirely after the reading is attributed.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::PgPool;
use std::ops::RangeInclusive;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::models::DeviceAssignment;
use crate::db::queries::{self, InsertReadingParams};
use crate::errors::AppError;
use crate::helpers::{f64_to_decimal_2dp, parse_iso8601};
use crate::services::features::SoilValueInput;

/// Payload posted by a sensor device.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ReadingPayload {
    /// Identifier burned into the device
    pub hardware_unique_id: Option<String>,
    /// ISO 8601 observation time, e.g. `2025-04-01T06:30:00Z`
    pub timestamp: Option<String>,
    #[schema(value_type = Option<f64>)]
    pub ph_value: Option<SoilValueInput>,
    #[schema(value_type = Option<f64>)]
    pub nitrogen_value: Option<SoilValueInput>,
    #[schema(value_type = Option<f64>)]
    pub phosphorus_value: Option<SoilValueInput>,
    #[schema(value_type = Option<f64>)]
    pub potassium_value: Option<SoilValueInput>,
    #[schema(value_type = Option<f64>)]
    pub moisture_value: Option<SoilValueInput>,
    #[schema(value_type = Option<f64>)]
    pub temperature_value: Option<SoilValueInput>,
    #[schema(value_type = Option<f64>)]
    pub humidity_value: Option<SoilValueInput>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadingValues {
    pub ph: Option<f64>,
    pub nitrogen: Option<f64>,
    pub phosphorus: Option<f64>,
    pub potassium: Option<f64>,
    pub moisture: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
}

/// A payload that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedReading {
    pub hardware_unique_id: String,
    pub observed_at: DateTime<Utc>,
    pub values: ReadingValues,
}

// Accepted ranges. Each one fits inside its NUMERIC column.
const PH_RANGE: RangeInclusive<f64> = 0.0..=14.0;
/// mg/kg, for N, P and K alike.
const NUTRIENT_RANGE: RangeInclusive<f64> = 0.0..=100_000.0;
/// Percent, for soil moisture and air humidity.
const PERCENT_RANGE: RangeInclusive<f64> = 0.0..=100.0;
/// Degrees Celsius.
const TEMPERATURE_RANGE: RangeInclusive<f64> = -50.0..=100.0;

fn out_of_range(field: &str, v: f64) -> AppError {
    AppError::InvalidSoilValue {
        field: field.to_string(),
        value: v.to_string(),
    }
}

/// Column value for an accepted reading. A value that has no exact decimal
/// form is an error, never a silent NULL.
fn column_value(field: &str, v: Option<f64>) -> Result<Option<Decimal>, AppError> {
    v.map(|v| f64_to_decimal_2dp(v).ok_or_else(|| out_of_range(field, v)))
        .transpose()
}

fn resolve(
    field: &str,
    v: &Option<SoilValueInput>,
    range: RangeInclusive<f64>,
) -> Result<Option<f64>, AppError> {
    let Some(v) = v.as_ref().map(|v| v.resolve(field)).transpose()? else {
        return Ok(None);
    };
    if !range.contains(&v) {
        return Err(out_of_range(field, v));
    }
    column_value(field, Some(v))?;
    Ok(Some(v))
}

impl ReadingPayload {
    pub fn validate(&self) -> Result<ValidatedReading, AppError> {
        let hardware_unique_id = self
            .hardware_unique_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::BadRequest("hardware_unique_id is required".to_string()))?;
        let raw_ts = self
            .timestamp
            .as_deref()
            .ok_or_else(|| AppError::BadRequest("timestamp is required".to_string()))?;
        let observed_at =
            parse_iso8601(raw_ts).ok_or_else(|| AppError::InvalidTimestamp(raw_ts.to_string()))?;

        Ok(ValidatedReading {
            hardware_unique_id: hardware_unique_id.to_string(),
            observed_at,
            values: ReadingValues {
                ph: resolve("ph_value", &self.ph_value, PH_RANGE)?,
                nitrogen: resolve("nitrogen_value", &self.nitrogen_value, NUTRIENT_RANGE)?,
                phosphorus: resolve("phosphorus_value", &self.phosphorus_value, NUTRIENT_RANGE)?,
                potassium: resolve("potassium_value", &self.potassium_value, NUTRIENT_RANGE)?,
                moisture: resolve("moisture_value", &self.moisture_value, PERCENT_RANGE)?,
                temperature: resolve(
                    "temperature_value",
                    &self.temperature_value,
                    TEMPERATURE_RANGE,
                )?,
                humidity: resolve("humidity_value", &self.humidity_value, PERCENT_RANGE)?,
            },
        })
    }
}

/// Where a reading goes, decided from the device's current assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    Bind {
        device_id: Uuid,
        land_id: Uuid,
        farm_id: Uuid,
    },
    /// Device exists but is not on any land.
    Ignore { device_id: Uuid },
}

pub fn route_reading(
    device: Option<&DeviceAssignment>,
    hardware_unique_id: &str,
) -> Result<Route, AppError> {
    let device =
        device.ok_or_else(|| AppError::UnknownDevice(hardware_unique_id.to_string()))?;
    Ok(match device.assigned_land_id {
        Some(land_id) => Route::Bind {
            device_id: device.id,
            land_id,
            farm_id: device.farm_id,
        },
        None => Route::Ignore {
            device_id: device.id,
        },
    })
}

#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Stored {
        reading_id: Uuid,
        device_id: Uuid,
        land_id: Uuid,
    },
    /// Accepted but not stored: the device has no land.
    Ignored { device_id: Uuid },
}

pub async fn ingest(pool: &PgPool, reading: ValidatedReading) -> Result<IngestOutcome, AppError> {
    let mut tx = pool.begin().await?;

    let device = queries::lock_device_by_hardware_id(&mut *tx, &reading.hardware_unique_id).await?;
    let route = route_reading(device.as_ref(), &reading.hardware_unique_id).inspect_err(|_| {
        tracing::warn!(
            "Rejected reading from unregistered device {}",
            reading.hardware_unique_id
        );
    })?;

    match route {
        Route::Ignore { device_id } => {
            tx.rollback().await?;
            tracing::warn!(
                "Device {} ({}) is not assigned to a land plot, reading ignored",
                device_id,
                reading.hardware_unique_id
            );
            Ok(IngestOutcome::Ignored { device_id })
        }
        Route::Bind {
            device_id,
            land_id,
            farm_id,
        } => {
            let v = &reading.values;
            let reading_id = queries::insert_soil_reading(
                &mut *tx,
                &InsertReadingParams {
                    device_id,
                    land_id,
                    farm_id,
                    observed_at: reading.observed_at,
                    ph_value: column_value("ph_value", v.ph)?,
                    nitrogen_value: column_value("nitrogen_value", v.nitrogen)?,
                    phosphorus_value: column_value("phosphorus_value", v.phosphorus)?,
                    potassium_value: column_value("potassium_value", v.potassium)?,
                    moisture_value: column_value("moisture_value", v.moisture)?,
                    temperature_value: column_value("temperature_value", v.temperature)?,
                    humidity_value: column_value("humidity_value", v.humidity)?,
                },
            )
            .await?;
            queries::mark_device_seen(&mut *tx, device_id, Utc::now()).await?;
            tx.commit().await?;

            tracing::debug!(
                "Stored reading {} from device {} for land {}",
                reading_id,
                device_id,
                land_id
            );
            Ok(IngestOutcome::Stored {
                reading_id,
                device_id,
                land_id,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(v: serde_json::Value) -> ReadingPayload {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_validate_accepts_numbers_and_unit_strings() {
        let r = payload(json!({
            "hardware_unique_id": "ESP32-00A1",
            "timestamp": "2025-04-01T06:30:00Z",
            "ph_value": "6.5pH",
            "nitrogen_value": 40,
            "potassium_value": "20 mg/kg"
        }))
        .validate()
        .unwrap();
        assert_eq!(r.hardware_unique_id, "ESP32-00A1");
        assert_eq!(r.observed_at.to_rfc3339(), "2025-04-01T06:30:00+00:00");
        assert_eq!(r.values.ph, Some(6.5));
        assert_eq!(r.values.nitrogen, Some(40.0));
        assert_eq!(r.values.phosphorus, None);
        assert_eq!(r.values.potassium, Some(20.0));
    }

    #[test]
    fn test_validate_rejects_bad_timestamp() {
        let err = payload(json!({
            "hardware_unique_id": "ESP32-00A1",
            "timestamp": "01/04/2025 06:30"
        }))
        .validate()
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidTimestamp(_)));
    }

    #[test]
    fn test_validate_requires_id_and_timestamp() {
        assert!(matches!(
            payload(json!({ "timestamp": "2025-04-01T06:30:00Z" })).validate(),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            payload(json!({ "hardware_unique_id": "  " , "timestamp": "2025-04-01" })).validate(),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            payload(json!({ "hardware_unique_id": "ESP32-00A1" })).validate(),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn test_validate_rejects_non_numeric_value() {
        let err = payload(json!({
            "hardware_unique_id": "ESP32-00A1",
            "timestamp": "2025-04-01T06:30:00Z",
            "moisture_value": "wet"
        }))
        .validate()
        .unwrap_err();
        match err {
            AppError::InvalidSoilValue { field, value } => {
                assert_eq!(field, "moisture_value");
                assert_eq!(value, "wet");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    fn invalid_field(v: serde_json::Value) -> String {
        let mut body = json!({
            "hardware_unique_id": "ESP32-00A1",
            "timestamp": "2025-04-01T06:30:00Z"
        });
        body.as_object_mut()
            .unwrap()
            .extend(v.as_object().unwrap().clone());
        match payload(body).validate() {
            Err(AppError::InvalidSoilValue { field, .. }) => field,
            other => panic!("expected InvalidSoilValue, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_value_too_large_for_decimal() {
        assert_eq!(invalid_field(json!({ "nitrogen_value": 1e30 })), "nitrogen_value");
    }

    #[test]
    fn test_validate_rejects_value_too_large_for_column() {
        assert_eq!(
            invalid_field(json!({ "temperature_value": 12345678.0 })),
            "temperature_value"
        );
        assert_eq!(invalid_field(json!({ "ph_value": "15 pH" })), "ph_value");
        assert_eq!(invalid_field(json!({ "humidity_value": -1 })), "humidity_value");
    }

    #[test]
    fn test_validate_accepts_range_bounds() {
        let r = payload(json!({
            "hardware_unique_id": "ESP32-00A1",
            "timestamp": "2025-04-01T06:30:00Z",
            "ph_value": 14,
            "potassium_value": 100000,
            "moisture_value": 0,
            "temperature_value": -50
        }))
        .validate()
        .unwrap();
        assert_eq!(r.values.ph, Some(14.0));
        assert_eq!(r.values.temperature, Some(-50.0));
    }

    #[test]
    fn test_column_value_never_drops_to_null() {
        assert!(matches!(
            column_value("nitrogen_value", Some(1e30)),
            Err(AppError::InvalidSoilValue { .. })
        ));
        assert_eq!(column_value("nitrogen_value", None).unwrap(), None);
        assert_eq!(
            column_value("ph_value", Some(6.456)).unwrap(),
            Some(Decimal::new(646, 2))
        );
    }

    #[test]
    fn test_route_unknown_device() {
        assert!(matches!(
            route_reading(None, "ghost"),
            Err(AppError::UnknownDevice(id)) if id == "ghost"
        ));
    }

    #[test]
    fn test_route_unassigned_device_is_ignored() {
        let device = DeviceAssignment {
            id: Uuid::new_v4(),
            farm_id: Uuid::new_v4(),
            assigned_land_id: None,
        };
        assert_eq!(
            route_reading(Some(&device), "hw").unwrap(),
            Route::Ignore { device_id: device.id }
        );
    }

    #[test]
    fn test_route_binds_to_current_assignment() {
        let device = DeviceAssignment {
            id: Uuid::new_v4(),
            farm_id: Uuid::new_v4(),
            assigned_land_id: Some(Uuid::new_v4()),
        };
        assert_eq!(
            route_reading(Some(&device), "hw").unwrap(),
            Route::Bind {
                device_id: device.id,
                land_id: device.assigned_land_id.unwrap(),
                farm_id: device.farm_id,
            }
        );
    }
}
