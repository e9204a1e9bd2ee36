//! Hardware device endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::PgPool;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::db::models::{Device, DeviceStatus};
use crate::db::queries;
use crate::errors::{AppError, ErrorResponse};
use crate::routes::page;
use crate::services::registry::{self, NewDevice};

const DEFAULT_DEVICE_PAGE: i64 = 50;
const MAX_DEVICE_PAGE: i64 = 500;

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterDeviceRequest {
    pub hardware_unique_id: String,
    pub farm_id: Uuid,
    /// Land to assign immediately; the device becomes active.
    pub assigned_land_id: Option<Uuid>,
    pub device_name: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateDeviceRequest {
    pub device_name: Option<String>,
    pub model: Option<String>,
    pub status: Option<DeviceStatus>,
}

/// `assigned_land_id` must be present; `null` unassigns the device.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignmentRequest {
    #[serde(deserialize_with = "required_nullable")]
    pub assigned_land_id: Option<Uuid>,
}

/// Distinguishes an explicit `null` from a missing field: the field has no
/// `#[serde(default)]`, so omitting it is an error.
fn required_nullable<'de, D>(d: D) -> Result<Option<Uuid>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Uuid>::deserialize(d)
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct DeviceListQuery {
    /// Filter by status
    pub status: Option<DeviceStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeviceResponse {
    pub id: Uuid,
    pub hardware_unique_id: String,
    pub farm_id: Uuid,
    pub assigned_land_id: Option<Uuid>,
    pub device_name: Option<String>,
    pub model: Option<String>,
    pub status: String,
    pub last_seen_at: Option<String>,
    /// YYYY-MM-DD
    pub registration_date: String,
}

impl From<Device> for DeviceResponse {
    fn from(d: Device) -> Self {
        Self {
            id: d.id,
            hardware_unique_id: d.hardware_unique_id,
            farm_id: d.farm_id,
            assigned_land_id: d.assigned_land_id,
            device_name: d.device_name,
            model: d.model,
            status: d.status,
            last_seen_at: d.last_seen_at.map(|t| t.to_rfc3339()),
            registration_date: d.registration_date.to_string(),
        }
    }
}

fn non_blank(s: &Option<String>) -> Option<&str> {
    s.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Register a device on a farm.
#[utoipa::path(
    post,
    path = "/api/v1/devices",
    tag = "Devices",
    request_body = RegisterDeviceRequest,
    responses(
        (status = 201, description = "Device registered", body = DeviceResponse),
        (status = 400, description = "Land not in farm or invalid input", body = ErrorResponse),
        (status = 404, description = "Farm not found", body = ErrorResponse),
        (status = 409, description = "Hardware id registered or land taken", body = ErrorResponse),
    )
)]
pub async fn register_device(
    State(pool): State<PgPool>,
    auth: AuthUser,
    Json(req): Json<RegisterDeviceRequest>,
) -> Result<(StatusCode, Json<DeviceResponse>), AppError> {
    let device = registry::register_device(
        &pool,
        auth.user_id,
        NewDevice {
            hardware_unique_id: &req.hardware_unique_id,
            farm_id: req.farm_id,
            assigned_land_id: req.assigned_land_id,
            device_name: non_blank(&req.device_name),
            model: non_blank(&req.model),
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(device.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/farms/{id}/devices",
    tag = "Devices",
    params(("id" = Uuid, Path, description = "Farm UUID"), DeviceListQuery),
    responses(
        (status = 200, description = "Devices on the farm", body = Vec<DeviceResponse>),
        (status = 404, description = "Farm not found", body = ErrorResponse),
    )
)]
pub async fn list_farm_devices(
    State(pool): State<PgPool>,
    auth: AuthUser,
    Path(farm_id): Path<Uuid>,
    Query(q): Query<DeviceListQuery>,
) -> Result<Json<Vec<DeviceResponse>>, AppError> {
    queries::get_farm_for_user(&pool, farm_id, auth.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Farm {} not found", farm_id)))?;
    let (limit, offset) = page(q.limit, q.offset, DEFAULT_DEVICE_PAGE, MAX_DEVICE_PAGE);
    let devices = queries::list_devices(&pool, farm_id, q.status, limit, offset).await?;
    Ok(Json(devices.into_iter().map(DeviceResponse::from).collect()))
}

#[utoipa::path(
    get,
    path = "/api/v1/devices/{id}",
    tag = "Devices",
    params(("id" = Uuid, Path, description = "Device UUID")),
    responses(
        (status = 200, description = "Device", body = DeviceResponse),
        (status = 404, description = "Device not found", body = ErrorResponse),
    )
)]
pub async fn get_device(
    State(pool): State<PgPool>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<DeviceResponse>, AppError> {
    let device = queries::get_device_for_user(&pool, id, auth.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Device {} not found", id)))?;
    Ok(Json(device.into()))
}

/// Update a device's name, model or status.
#[utoipa::path(
    patch,
    path = "/api/v1/devices/{id}",
    tag = "Devices",
    params(("id" = Uuid, Path, description = "Device UUID")),
    request_body = UpdateDeviceRequest,
    responses(
        (status = 200, description = "Device updated", body = DeviceResponse),
        (status = 404, description = "Device not found", body = ErrorResponse),
    )
)]
pub async fn update_device(
    State(pool): State<PgPool>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateDeviceRequest>,
) -> Result<Json<DeviceResponse>, AppError> {
    let device = queries::update_device_details(
        &pool,
        id,
        auth.user_id,
        non_blank(&req.device_name),
        non_blank(&req.model),
        req.status,
    )
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Device {} not found", id)))?;
    Ok(Json(device.into()))
}

/// Assign a device to a land plot of its farm, or unassign it.
#[utoipa::path(
    put,
    path = "/api/v1/devices/{id}/assignment",
    tag = "Devices",
    params(("id" = Uuid, Path, description = "Device UUID")),
    request_body = AssignmentRequest,
    responses(
        (status = 200, description = "Assignment updated", body = DeviceResponse),
        (status = 400, description = "Land not in the device's farm", body = ErrorResponse),
        (status = 404, description = "Device not found", body = ErrorResponse),
        (status = 409, description = "Land already has a device", body = ErrorResponse),
    )
)]
pub async fn update_assignment(
    State(pool): State<PgPool>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<AssignmentRequest>,
) -> Result<Json<DeviceResponse>, AppError> {
    let device = registry::assign_device(&pool, auth.user_id, id, req.assigned_land_id).await?;
    Ok(Json(device.into()))
}

#[utoipa::path(
    delete,
    path = "/api/v1/devices/{id}",
    tag = "Devices",
    params(("id" = Uuid, Path, description = "Device UUID")),
    responses(
        (status = 204, description = "Device deleted"),
        (status = 404, description = "Device not found", body = ErrorResponse),
    )
)]
pub async fn delete_device(
    State(pool): State<PgPool>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if !queries::delete_device_for_user(&pool, id, auth.user_id).await? {
        return Err(AppError::NotFound(format!("Device {} not found", id)));
    }
    tracing::info!("Deleted device {}", id);
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignment_request_requires_field() {
        let land = Uuid::new_v4();
        let set: AssignmentRequest =
            serde_json::from_value(serde_json::json!({ "assigned_land_id": land })).unwrap();
        assert_eq!(set.assigned_land_id, Some(land));

        let clear: AssignmentRequest =
            serde_json::from_value(serde_json::json!({ "assigned_land_id": null })).unwrap();
        assert_eq!(clear.assigned_land_id, None);

        assert!(serde_json::from_value::<AssignmentRequest>(serde_json::json!({})).is_err());
    }

    #[test]
    fn test_update_request_parses_status() {
        let req: UpdateDeviceRequest =
            serde_json::from_value(serde_json::json!({ "status": "maintenance" })).unwrap();
        assert_eq!(req.status, Some(DeviceStatus::Maintenance));
        assert!(serde_json::from_value::<UpdateDeviceRequest>(
            serde_json::json!({ "status": "broken" })
        )
        .is_err());
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(&Some("  Sensor A ".into())), Some("Sensor A"));
        assert_eq!(non_blank(&Some("   ".into())), None);
        assert_eq!(non_blank(&None), None);
    }
}
