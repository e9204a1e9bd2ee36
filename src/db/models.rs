use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

/// A registered user.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Farm {
    pub id: Uuid,
    pub user_id: Uuid,
    pub farm_name: String,
    pub location_latitude: Option<Decimal>,
    pub location_longitude: Option<Decimal>,
    /// Free-text location; also the weather lookup key.
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A land plot within a farm.
#[derive(Debug, Clone, FromRow)]
pub struct Land {
    pub id: Uuid,
    pub farm_id: Uuid,
    pub land_name: String,
    pub area: Decimal,
    pub area_unit: String,
    pub soil_type_manual: Option<String>,
    pub soil_type_detected: Option<String>,
    pub current_planting_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Everything the recommendation pipeline needs to know about a land plot
/// besides its readings. Owner is included for access checks.
#[derive(Debug, Clone, FromRow)]
pub struct LandContext {
    pub land_id: Uuid,
    pub farm_id: Uuid,
    pub user_id: Uuid,
    pub address: Option<String>,
    pub soil_type_manual: Option<String>,
    pub soil_type_detected: Option<String>,
    /// Crop of the land's active planting, if any.
    pub active_crop_name: Option<String>,
}

impl LandContext {
    /// Soil color used for categorical encoding. A detected type wins over
    /// a manually entered one.
    pub fn soil_color(&self) -> Option<&str> {
        self.soil_type_detected
            .as_deref()
            .or(self.soil_type_manual.as_deref())
    }
}

/// Device lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Inactive,
    Active,
    Maintenance,
    Error,
}

impl DeviceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceStatus::Inactive => "inactive",
            DeviceStatus::Active => "active",
            DeviceStatus::Maintenance => "maintenance",
            DeviceStatus::Error => "error",
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inactive" => Ok(DeviceStatus::Inactive),
            "active" => Ok(DeviceStatus::Active),
            "maintenance" => Ok(DeviceStatus::Maintenance),
            "error" => Ok(DeviceStatus::Error),
            other => Err(format!("unknown device status '{}'", other)),
        }
    }
}

/// A hardware soil-sensor device.
#[derive(Debug, Clone, FromRow)]
pub struct Device {
    pub id: Uuid,
    pub hardware_unique_id: String,
    pub farm_id: Uuid,
    pub assigned_land_id: Option<Uuid>,
    pub device_name: Option<String>,
    pub model: Option<String>,
    /// Stored as text; see `DeviceStatus`.
    pub status: String,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub registration_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// The slice of a device row that ingestion locks and routes on.
#[derive(Debug, Clone, FromRow)]
pub struct DeviceAssignment {
    pub id: Uuid,
    pub farm_id: Uuid,
    pub assigned_land_id: Option<Uuid>,
}

/// An immutable soil observation.
#[derive(Debug, Clone, FromRow)]
pub struct SoilReading {
    pub id: Uuid,
    pub device_id: Uuid,
    pub land_id: Uuid,
    pub farm_id: Uuid,
    pub observed_at: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    pub ph_value: Option<Decimal>,
    pub nitrogen_value: Option<Decimal>,
    pub phosphorus_value: Option<Decimal>,
    pub potassium_value: Option<Decimal>,
    pub moisture_value: Option<Decimal>,
    pub temperature_value: Option<Decimal>,
    pub humidity_value: Option<Decimal>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Planting {
    pub id: Uuid,
    pub land_id: Uuid,
    pub crop_id: Uuid,
    pub planting_date: NaiveDate,
    pub expected_harvest_date: Option<NaiveDate>,
    pub actual_harvest_date: Option<NaiveDate>,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Planting lifecycle status. `Replaced` is only ever set when a new
/// planting takes over the land.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PlantingStatus {
    Active,
    Replaced,
    Harvested,
    Failed,
    Canceled,
}

impl PlantingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PlantingStatus::Active => "active",
            PlantingStatus::Replaced => "replaced",
            PlantingStatus::Harvested => "harvested",
            PlantingStatus::Failed => "failed",
            PlantingStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for PlantingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlantingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(PlantingStatus::Active),
            "replaced" => Ok(PlantingStatus::Replaced),
            "harvested" => Ok(PlantingStatus::Harvested),
            "failed" => Ok(PlantingStatus::Failed),
            "canceled" => Ok(PlantingStatus::Canceled),
            other => Err(format!("unknown planting status '{}'", other)),
        }
    }
}

/// A land's current planting joined with its crop name.
#[derive(Debug, Clone, FromRow)]
pub struct PlantingSummary {
    pub id: Uuid,
    pub crop_id: Uuid,
    pub crop_name: String,
    pub planting_date: NaiveDate,
    pub status: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct Crop {
    pub id: Uuid,
    pub crop_name: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub optimal_ph_min: Option<Decimal>,
    pub optimal_ph_max: Option<Decimal>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Fertilizer {
    pub id: Uuid,
    pub fertilizer_name: String,
    pub fertilizer_type: Option<String>,
    pub n_content_percent: Option<Decimal>,
    pub p_content_percent: Option<Decimal>,
    pub k_content_percent: Option<Decimal>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Disease {
    pub id: Uuid,
    pub disease_name: String,
    pub description: Option<String>,
    pub symptoms: Option<String>,
    pub image_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_status_round_trips_through_text() {
        for status in [
            DeviceStatus::Inactive,
            DeviceStatus::Active,
            DeviceStatus::Maintenance,
            DeviceStatus::Error,
        ] {
            assert_eq!(status.as_str().parse::<DeviceStatus>(), Ok(status));
        }
    }

    #[test]
    fn test_device_status_rejects_unknown() {
        assert!("offline".parse::<DeviceStatus>().is_err());
        assert!("Active".parse::<DeviceStatus>().is_err());
    }

    #[test]
    fn test_planting_status_text_matches_serde() {
        let status: PlantingStatus = serde_json::from_str("\"canceled\"").unwrap();
        assert_eq!(status, PlantingStatus::Canceled);
        assert_eq!("replaced".parse::<PlantingStatus>(), Ok(PlantingStatus::Replaced));
        assert!("cancelled".parse::<PlantingStatus>().is_err());
    }

    #[test]
    fn test_soil_color_prefers_detected() {
        let mut ctx = LandContext {
            land_id: Uuid::new_v4(),
            farm_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            address: None,
            soil_type_manual: Some("Red".into()),
            soil_type_detected: Some("Black".into()),
            active_crop_name: None,
        };
        assert_eq!(ctx.soil_color(), Some("Black"));
        ctx.soil_type_detected = None;
        assert_eq!(ctx.soil_color(), Some("Red"));
    }
}
