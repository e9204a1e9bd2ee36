//! Device registry: registration and land assignment.
//!
//! A land plot carries at most one device. Every assignment change runs in a
//! transaction that locks the device row and the target land row, checks the
//! land belongs to the device's farm and that no other device holds it, then
//! writes. The UNIQUE index on `assigned_land_id` backs the check.

use sqlx::PgPool;
use uuid::Uuid;

use crate::db::models::{Device, DeviceStatus};
use crate::db::queries::{self, InsertDeviceParams};
use crate::errors::AppError;

/// Status a device takes when its assignment changes.
pub fn status_for_assignment(land_id: Option<Uuid>) -> DeviceStatus {
    if land_id.is_some() {
        DeviceStatus::Active
    } else {
        DeviceStatus::Inactive
    }
}

/// Reject the assignment if a device other than `device_id` holds the land.
pub fn check_land_free(
    land_id: Uuid,
    holder: Option<Uuid>,
    device_id: Option<Uuid>,
) -> Result<(), AppError> {
    match holder {
        Some(other) if Some(other) != device_id => Err(AppError::Conflict(format!(
            "land {} is already assigned to another device",
            land_id
        ))),
        _ => Ok(()),
    }
}

/// Details for a new device.
pub struct NewDevice<'a> {
    pub hardware_unique_id: &'a str,
    pub farm_id: Uuid,
    pub assigned_land_id: Option<Uuid>,
    pub device_name: Option<&'a str>,
    pub model: Option<&'a str>,
}

pub async fn register_device(
    pool: &PgPool,
    user_id: Uuid,
    new: NewDevice<'_>,
) -> Result<Device, AppError> {
    let hardware_unique_id = new.hardware_unique_id.trim();
    if hardware_unique_id.is_empty() {
        return Err(AppError::BadRequest(
            "hardware_unique_id must not be empty".to_string(),
        ));
    }

    queries::get_farm_for_user(pool, new.farm_id, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Farm {} not found", new.farm_id)))?;

    let mut tx = pool.begin().await?;

    if let Some(land_id) = new.assigned_land_id {
        if !queries::lock_land_in_farm(&mut *tx, land_id, new.farm_id).await? {
            return Err(AppError::BadRequest(format!(
                "land {} does not belong to farm {}",
                land_id, new.farm_id
            )));
        }
        let holder = queries::device_holding_land(&mut *tx, land_id).await?;
        check_land_free(land_id, holder, None)?;
    }

    let device = queries::insert_device(
        &mut *tx,
        &InsertDeviceParams {
            hardware_unique_id,
            farm_id: new.farm_id,
            assigned_land_id: new.assigned_land_id,
            device_name: new.device_name,
            model: new.model,
            status: status_for_assignment(new.assigned_land_id),
        },
    )
    .await
    .map_err(|e| {
        AppError::conflict_on_unique(
            e,
            "hardware id is already registered or land is already assigned",
        )
    })?;

    tx.commit().await?;

    tracing::info!(
        "Registered device {} ({}) on farm {}",
        device.id,
        device.hardware_unique_id,
        device.farm_id
    );
    Ok(device)
}

/// Assign a device to a land plot, or unassign it with `None`.
pub async fn assign_device(
    pool: &PgPool,
    user_id: Uuid,
    device_id: Uuid,
    land_id: Option<Uuid>,
) -> Result<Device, AppError> {
    let mut tx = pool.begin().await?;

    let device = queries::lock_device_for_user(&mut *tx, device_id, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Device {} not found", device_id)))?;

    if let Some(land_id) = land_id {
        if !queries::lock_land_in_farm(&mut *tx, land_id, device.farm_id).await? {
            return Err(AppError::BadRequest(format!(
                "land {} does not belong to the device's farm",
                land_id
            )));
        }
        let holder = queries::device_holding_land(&mut *tx, land_id).await?;
        check_land_free(land_id, holder, Some(device.id))?;
    }

    let updated = queries::set_device_assignment(
        &mut *tx,
        device.id,
        land_id,
        status_for_assignment(land_id),
    )
    .await
    .map_err(|e| AppError::conflict_on_unique(e, "land is already assigned to another device"))?;

    tx.commit().await?;

    match land_id {
        Some(land_id) => tracing::info!("Device {} assigned to land {}", device.id, land_id),
        None => tracing::info!("Device {} unassigned", device.id),
    }
    Ok(updated)
}
