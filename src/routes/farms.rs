//! Farm and land plot endpoints. All are scoped to the authenticated owner;
//! another user's farm looks the same as a missing one.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::db::models::{Device, Farm, Land, PlantingSummary};
use crate::db::queries::{
    self, InsertFarmParams, InsertLandParams, UpdateFarmParams, UpdateLandParams,
};
use crate::errors::{AppError, ErrorResponse};
use crate::helpers::opt_dec_to_f64;
use crate::routes::readings::SoilReadingResponse;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateFarmRequest {
    pub farm_name: String,
    #[schema(value_type = Option<f64>)]
    pub location_latitude: Option<Decimal>,
    #[schema(value_type = Option<f64>)]
    pub location_longitude: Option<Decimal>,
    /// Free-text location, e.g. "Nashik, Maharashtra". Used for weather lookups.
    pub address: Option<String>,
}

/// Farm fields to change. Omitted fields stay as they are; an empty address
/// removes it.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateFarmRequest {
    pub farm_name: Option<String>,
    #[schema(value_type = Option<f64>)]
    pub location_latitude: Option<Decimal>,
    #[schema(value_type = Option<f64>)]
    pub location_longitude: Option<Decimal>,
    pub address: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FarmResponse {
    pub id: Uuid,
    pub farm_name: String,
    pub location_latitude: Option<f64>,
    pub location_longitude: Option<f64>,
    pub address: Option<String>,
    pub created_at: String,
}

impl From<Farm> for FarmResponse {
    fn from(f: Farm) -> Self {
        Self {
            id: f.id,
            farm_name: f.farm_name,
            location_latitude: opt_dec_to_f64(f.location_latitude),
            location_longitude: opt_dec_to_f64(f.location_longitude),
            address: f.address,
            created_at: f.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateLandRequest {
    pub land_name: String,
    #[schema(value_type = f64)]
    pub area: Decimal,
    /// e.g. "acre", "hectare", "guntha"
    pub area_unit: String,
    /// Soil color as observed by the farmer, e.g. "Black"
    pub soil_type_manual: Option<String>,
}

/// Land fields to change. Omitted fields stay as they are; an empty soil
/// type removes it. The current planting is set through the planting
/// endpoints only.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateLandRequest {
    pub land_name: Option<String>,
    #[schema(value_type = Option<f64>)]
    pub area: Option<Decimal>,
    pub area_unit: Option<String>,
    pub soil_type_manual: Option<String>,
    pub soil_type_detected: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LandResponse {
    pub id: Uuid,
    pub farm_id: Uuid,
    pub land_name: String,
    pub area: f64,
    pub area_unit: String,
    pub soil_type_manual: Option<String>,
    pub soil_type_detected: Option<String>,
    pub current_planting_id: Option<Uuid>,
    pub created_at: String,
}

impl From<Land> for LandResponse {
    fn from(l: Land) -> Self {
        Self {
            id: l.id,
            farm_id: l.farm_id,
            land_name: l.land_name,
            area: opt_dec_to_f64(Some(l.area)).unwrap_or(0.0),
            area_unit: l.area_unit,
            soil_type_manual: l.soil_type_manual,
            soil_type_detected: l.soil_type_detected,
            current_planting_id: l.current_planting_id,
            created_at: l.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CropRef {
    pub id: Uuid,
    pub crop_name: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CurrentPlanting {
    pub id: Uuid,
    pub crop: CropRef,
    pub planting_date: NaiveDate,
    pub status: String,
}

impl From<PlantingSummary> for CurrentPlanting {
    fn from(p: PlantingSummary) -> Self {
        Self {
            id: p.id,
            crop: CropRef {
                id: p.crop_id,
                crop_name: p.crop_name,
            },
            planting_date: p.planting_date,
            status: p.status,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AssignedDevice {
    pub id: Uuid,
    pub hardware_unique_id: String,
    pub device_name: Option<String>,
    pub status: String,
    pub last_seen_at: Option<String>,
}

impl From<Device> for AssignedDevice {
    fn from(d: Device) -> Self {
        Self {
            id: d.id,
            hardware_unique_id: d.hardware_unique_id,
            device_name: d.device_name,
            status: d.status,
            last_seen_at: d.last_seen_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// A land plot with its current planting, its device and its newest reading.
#[derive(Debug, Serialize, ToSchema)]
pub struct LandDetailResponse {
    #[serde(flatten)]
    pub land: LandResponse,
    pub current_planting: Option<CurrentPlanting>,
    pub assigned_device: Option<AssignedDevice>,
    pub latest_soil_reading: Option<SoilReadingResponse>,
}

async fn land_detail(pool: &PgPool, land: Land) -> Result<LandDetailResponse, AppError> {
    let (planting, device, reading) = tokio::try_join!(
        queries::get_current_planting_summary(pool, land.id),
        queries::get_device_on_land(pool, land.id),
        queries::get_latest_soil_reading(pool, land.id),
    )?;
    Ok(LandDetailResponse {
        land: land.into(),
        current_planting: planting.map(CurrentPlanting::from),
        assigned_device: device.map(AssignedDevice::from),
        latest_soil_reading: reading.map(SoilReadingResponse::from),
    })
}

fn non_blank_name(field: &str, value: Option<&str>) -> Result<(), AppError> {
    match value {
        Some(v) if v.trim().is_empty() => {
            Err(AppError::BadRequest(format!("{} cannot be empty", field)))
        }
        _ => Ok(()),
    }
}

fn validate_farm_update(req: &UpdateFarmRequest) -> Result<(), AppError> {
    if req.farm_name.is_none()
        && req.location_latitude.is_none()
        && req.location_longitude.is_none()
        && req.address.is_none()
    {
        return Err(AppError::BadRequest("No valid fields provided".to_string()));
    }
    non_blank_name("farm_name", req.farm_name.as_deref())?;
    validate_coordinates(req.location_latitude, req.location_longitude)
}

fn validate_land_update(req: &UpdateLandRequest) -> Result<(), AppError> {
    if req.land_name.is_none()
        && req.area.is_none()
        && req.area_unit.is_none()
        && req.soil_type_manual.is_none()
        && req.soil_type_detected.is_none()
    {
        return Err(AppError::BadRequest("No valid fields provided".to_string()));
    }
    non_blank_name("land_name", req.land_name.as_deref())?;
    non_blank_name("area_unit", req.area_unit.as_deref())?;
    if req.area.is_some_and(|a| a <= Decimal::ZERO) {
        return Err(AppError::BadRequest("area must be positive".to_string()));
    }
    Ok(())
}

fn validate_coordinates(lat: Option<Decimal>, lon: Option<Decimal>) -> Result<(), AppError> {
    if let Some(lat) = lat {
        if lat < Decimal::from(-90) || lat > Decimal::from(90) {
            return Err(AppError::BadRequest(format!("latitude {} out of range", lat)));
        }
    }
    if let Some(lon) = lon {
        if lon < Decimal::from(-180) || lon > Decimal::from(180) {
            return Err(AppError::BadRequest(format!("longitude {} out of range", lon)));
        }
    }
    Ok(())
}

async fn owned_farm(pool: &PgPool, farm_id: Uuid, auth: AuthUser) -> Result<Farm, AppError> {
    queries::get_farm_for_user(pool, farm_id, auth.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Farm {} not found", farm_id)))
}

// ---------------------------------------------------------------------------
// Farms
// ---------------------------------------------------------------------------

/// Create a farm.
#[utoipa::path(
    post,
    path = "/api/v1/farms",
    tag = "Farms",
    request_body = CreateFarmRequest,
    responses(
        (status = 201, description = "Farm created", body = FarmResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 401, description = "Unauthenticated", body = ErrorResponse),
    )
)]
pub async fn create_farm(
    State(pool): State<PgPool>,
    auth: AuthUser,
    Json(req): Json<CreateFarmRequest>,
) -> Result<(StatusCode, Json<FarmResponse>), AppError> {
    if req.farm_name.trim().is_empty() {
        return Err(AppError::BadRequest("farm_name is required".to_string()));
    }
    validate_coordinates(req.location_latitude, req.location_longitude)?;

    let farm = queries::insert_farm(
        &pool,
        auth.user_id,
        &InsertFarmParams {
            farm_name: req.farm_name.trim(),
            location_latitude: req.location_latitude,
            location_longitude: req.location_longitude,
            address: req.address.as_deref().map(str::trim).filter(|a| !a.is_empty()),
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(farm.into())))
}

/// List the caller's farms.
#[utoipa::path(
    get,
    path = "/api/v1/farms",
    tag = "Farms",
    responses(
        (status = 200, description = "Farms owned by the caller", body = Vec<FarmResponse>),
        (status = 401, description = "Unauthenticated", body = ErrorResponse),
    )
)]
pub async fn list_farms(
    State(pool): State<PgPool>,
    auth: AuthUser,
) -> Result<Json<Vec<FarmResponse>>, AppError> {
    let farms = queries::list_farms(&pool, auth.user_id).await?;
    Ok(Json(farms.into_iter().map(FarmResponse::from).collect()))
}

#[utoipa::path(
    get,
    path = "/api/v1/farms/{id}",
    tag = "Farms",
    params(("id" = Uuid, Path, description = "Farm UUID")),
    responses(
        (status = 200, description = "Farm", body = FarmResponse),
        (status = 404, description = "Farm not found", body = ErrorResponse),
    )
)]
pub async fn get_farm(
    State(pool): State<PgPool>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<FarmResponse>, AppError> {
    Ok(Json(owned_farm(&pool, id, auth).await?.into()))
}

/// Update a farm's name, coordinates or address.
#[utoipa::path(
    put,
    path = "/api/v1/farms/{id}",
    tag = "Farms",
    params(("id" = Uuid, Path, description = "Farm UUID")),
    request_body = UpdateFarmRequest,
    responses(
        (status = 200, description = "Farm updated", body = FarmResponse),
        (status = 400, description = "No fields or invalid input", body = ErrorResponse),
        (status = 404, description = "Farm not found", body = ErrorResponse),
    )
)]
pub async fn update_farm(
    State(pool): State<PgPool>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateFarmRequest>,
) -> Result<Json<FarmResponse>, AppError> {
    validate_farm_update(&req)?;

    let farm = queries::update_farm_for_user(
        &pool,
        id,
        auth.user_id,
        &UpdateFarmParams {
            farm_name: req.farm_name.as_deref().map(str::trim),
            location_latitude: req.location_latitude,
            location_longitude: req.location_longitude,
            address: req.address.as_deref().map(str::trim),
        },
    )
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Farm {} not found", id)))?;
    Ok(Json(farm.into()))
}

/// Delete a farm with its lands, devices and readings.
#[utoipa::path(
    delete,
    path = "/api/v1/farms/{id}",
    tag = "Farms",
    params(("id" = Uuid, Path, description = "Farm UUID")),
    responses(
        (status = 204, description = "Farm deleted"),
        (status = 404, description = "Farm not found", body = ErrorResponse),
    )
)]
pub async fn delete_farm(
    State(pool): State<PgPool>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if !queries::delete_farm_for_user(&pool, id, auth.user_id).await? {
        return Err(AppError::NotFound(format!("Farm {} not found", id)));
    }
    tracing::info!("Deleted farm {}", id);
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Lands
// ---------------------------------------------------------------------------

/// Add a land plot to a farm.
#[utoipa::path(
    post,
    path = "/api/v1/farms/{id}/lands",
    tag = "Lands",
    params(("id" = Uuid, Path, description = "Farm UUID")),
    request_body = CreateLandRequest,
    responses(
        (status = 201, description = "Land created", body = LandResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 404, description = "Farm not found", body = ErrorResponse),
    )
)]
pub async fn create_land(
    State(pool): State<PgPool>,
    auth: AuthUser,
    Path(farm_id): Path<Uuid>,
    Json(req): Json<CreateLandRequest>,
) -> Result<(StatusCode, Json<LandResponse>), AppError> {
    if req.land_name.trim().is_empty() || req.area_unit.trim().is_empty() {
        return Err(AppError::BadRequest(
            "land_name and area_unit are required".to_string(),
        ));
    }
    if req.area <= Decimal::ZERO {
        return Err(AppError::BadRequest("area must be positive".to_string()));
    }
    owned_farm(&pool, farm_id, auth).await?;

    let land = queries::insert_land(
        &pool,
        farm_id,
        &InsertLandParams {
            land_name: req.land_name.trim(),
            area: req.area,
            area_unit: req.area_unit.trim(),
            soil_type_manual: req
                .soil_type_manual
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty()),
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(land.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/farms/{id}/lands",
    tag = "Lands",
    params(("id" = Uuid, Path, description = "Farm UUID")),
    responses(
        (status = 200, description = "Land plots of the farm", body = Vec<LandResponse>),
        (status = 404, description = "Farm not found", body = ErrorResponse),
    )
)]
pub async fn list_lands(
    State(pool): State<PgPool>,
    auth: AuthUser,
    Path(farm_id): Path<Uuid>,
) -> Result<Json<Vec<LandResponse>>, AppError> {
    owned_farm(&pool, farm_id, auth).await?;
    let lands = queries::list_lands(&pool, farm_id).await?;
    Ok(Json(lands.into_iter().map(LandResponse::from).collect()))
}

/// A land plot with its current planting, assigned device and latest reading.
#[utoipa::path(
    get,
    path = "/api/v1/lands/{id}",
    tag = "Lands",
    params(("id" = Uuid, Path, description = "Land UUID")),
    responses(
        (status = 200, description = "Land plot", body = LandDetailResponse),
        (status = 404, description = "Land not found", body = ErrorResponse),
    )
)]
pub async fn get_land(
    State(pool): State<PgPool>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<LandDetailResponse>, AppError> {
    let land = queries::get_land_for_user(&pool, id, auth.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Land {} not found", id)))?;
    Ok(Json(land_detail(&pool, land).await?))
}

/// Update a land plot's name, area or soil type.
#[utoipa::path(
    put,
    path = "/api/v1/lands/{id}",
    tag = "Lands",
    params(("id" = Uuid, Path, description = "Land UUID")),
    request_body = UpdateLandRequest,
    responses(
        (status = 200, description = "Land updated", body = LandDetailResponse),
        (status = 400, description = "No fields or invalid input", body = ErrorResponse),
        (status = 404, description = "Land not found", body = ErrorResponse),
    )
)]
pub async fn update_land(
    State(pool): State<PgPool>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateLandRequest>,
) -> Result<Json<LandDetailResponse>, AppError> {
    validate_land_update(&req)?;

    let land = queries::update_land_for_user(
        &pool,
        id,
        auth.user_id,
        &UpdateLandParams {
            land_name: req.land_name.as_deref().map(str::trim),
            area: req.area,
            area_unit: req.area_unit.as_deref().map(str::trim),
            soil_type_manual: req.soil_type_manual.as_deref().map(str::trim),
            soil_type_detected: req.soil_type_detected.as_deref().map(str::trim),
        },
    )
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Land {} not found", id)))?;
    Ok(Json(land_detail(&pool, land).await?))
}

/// Delete a land plot. Its device is unassigned and set inactive.
#[utoipa::path(
    delete,
    path = "/api/v1/lands/{id}",
    tag = "Lands",
    params(("id" = Uuid, Path, description = "Land UUID")),
    responses(
        (status = 204, description = "Land deleted"),
        (status = 404, description = "Land not found", body = ErrorResponse),
    )
)]
pub async fn delete_land(
    State(pool): State<PgPool>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if !queries::delete_land_for_user(&pool, id, auth.user_id).await? {
        return Err(AppError::NotFound(format!("Land {} not found", id)));
    }
    tracing::info!("Deleted land {}", id);
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_validate_coordinates() {
        let d = |s: &str| Some(Decimal::from_str(s).unwrap());
        assert!(validate_coordinates(d("19.9975"), d("73.7898")).is_ok());
        assert!(validate_coordinates(None, None).is_ok());
        assert!(validate_coordinates(d("91"), None).is_err());
        assert!(validate_coordinates(None, d("-180.5")).is_err());
    }

    #[test]
    fn test_land_response_from_model() {
        let land = Land {
            id: Uuid::new_v4(),
            farm_id: Uuid::new_v4(),
            land_name: "North plot".into(),
            area: Decimal::from_str("2.5").unwrap(),
            area_unit: "acre".into(),
            soil_type_manual: Some("Black".into()),
            soil_type_detected: None,
            current_planting_id: None,
            created_at: "2025-04-01T00:00:00Z".parse().unwrap(),
        };
        let resp = LandResponse::from(land);
        assert_eq!(resp.area, 2.5);
        assert_eq!(resp.created_at, "2025-04-01T00:00:00+00:00");
    }

    #[test]
    fn test_validate_farm_update() {
        let d = |s: &str| Some(Decimal::from_str(s).unwrap());
        let ok = UpdateFarmRequest {
            address: Some("Nashik, Maharashtra".into()),
            ..Default::default()
        };
        assert!(validate_farm_update(&ok).is_ok());
        assert!(validate_farm_update(&UpdateFarmRequest::default()).is_err());
        let blank = UpdateFarmRequest {
            farm_name: Some(" ".into()),
            ..Default::default()
        };
        assert!(matches!(
            validate_farm_update(&blank),
            Err(AppError::BadRequest(msg)) if msg == "farm_name cannot be empty"
        ));
        let bad_lat = UpdateFarmRequest {
            location_latitude: d("95"),
            ..Default::default()
        };
        assert!(validate_farm_update(&bad_lat).is_err());
    }

    #[test]
    fn test_validate_land_update() {
        let parse = |v: serde_json::Value| serde_json::from_value::<UpdateLandRequest>(v).unwrap();
        assert!(validate_land_update(&parse(serde_json::json!({ "area": 3.5 }))).is_ok());
        assert!(validate_land_update(&parse(serde_json::json!({ "soil_type_detected": "" }))).is_ok());
        assert!(validate_land_update(&parse(serde_json::json!({}))).is_err());
        assert!(validate_land_update(&parse(serde_json::json!({ "area": 0 }))).is_err());
        assert!(validate_land_update(&parse(serde_json::json!({ "area": -2 }))).is_err());
        assert!(validate_land_update(&parse(serde_json::json!({ "land_name": "" }))).is_err());
        // Not an editable field; ignored, so the update has nothing to do.
        assert!(validate_land_update(&parse(serde_json::json!({
            "current_planting_id": Uuid::new_v4()
        })))
        .is_err());
    }

    #[test]
    fn test_land_detail_shapes_planting_and_device() {
        let planting = CurrentPlanting::from(PlantingSummary {
            id: Uuid::new_v4(),
            crop_id: Uuid::new_v4(),
            crop_name: "Cotton".into(),
            planting_date: NaiveDate::from_ymd_opt(2025, 6, 15).unwrap(),
            status: "active".into(),
        });
        let json = serde_json::to_value(&planting).unwrap();
        assert_eq!(json["crop"]["crop_name"], "Cotton");
        assert_eq!(json["planting_date"], "2025-06-15");

        let land = Land {
            id: Uuid::new_v4(),
            farm_id: Uuid::new_v4(),
            land_name: "North plot".into(),
            area: Decimal::from_str("2.5").unwrap(),
            area_unit: "acre".into(),
            soil_type_manual: None,
            soil_type_detected: None,
            current_planting_id: Some(planting.id),
            created_at: "2025-04-01T00:00:00Z".parse().unwrap(),
        };
        let detail = LandDetailResponse {
            land: land.into(),
            current_planting: Some(planting),
            assigned_device: None,
            latest_soil_reading: None,
        };
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["land_name"], "North plot");
        assert_eq!(json["current_planting"]["status"], "active");
        assert!(json["assigned_device"].is_null());
        assert!(json["latest_soil_reading"].is_null());
    }
}
