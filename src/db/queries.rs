use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::models::{
    Crop, Device, DeviceAssignment, DeviceStatus, Disease, Farm, Fertilizer, Land, LandContext,
    Planting, PlantingStatus, PlantingSummary, SoilReading, User,
};

const USER_COLUMNS: &str = "id, name, email, phone_number, password_hash, created_at";

const FARM_COLUMNS: &str =
    "id, user_id, farm_name, location_latitude, location_longitude, address, created_at";

const LAND_COLUMNS: &str = "l.id, l.farm_id, l.land_name, l.area, l.area_unit, \
     l.soil_type_manual, l.soil_type_detected, l.current_planting_id, l.created_at";

const DEVICE_COLUMNS: &str = "d.id, d.hardware_unique_id, d.farm_id, d.assigned_land_id, \
     d.device_name, d.model, d.status, d.last_seen_at, d.registration_date, d.created_at";

const READING_COLUMNS: &str = "id, device_id, land_id, farm_id, observed_at, received_at, \
     ph_value, nitrogen_value, phosphorus_value, potassium_value, \
     moisture_value, temperature_value, humidity_value";

const PLANTING_COLUMNS: &str = "p.id, p.land_id, p.crop_id, p.planting_date, \
     p.expected_harvest_date, p.actual_harvest_date, p.status, p.notes, p.created_at";

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

pub struct InsertUserParams<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub phone_number: Option<&'a str>,
    pub password_hash: &'a str,
}

pub async fn insert_user(pool: &PgPool, p: &InsertUserParams<'_>) -> Result<User, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!(
        "INSERT INTO users (id, name, email, phone_number, password_hash)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING {USER_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(p.name)
    .bind(p.email)
    .bind(p.phone_number)
    .bind(p.password_hash)
    .fetch_one(pool)
    .await
}

pub async fn get_user_by_email(pool: &PgPool, email: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)"
    ))
    .bind(email)
    .fetch_optional(pool)
    .await
}

pub async fn get_user(pool: &PgPool, id: Uuid) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Profile fields to change. `None` leaves a field as is; an empty phone
/// number clears it.
pub struct UpdateUserParams<'a> {
    pub name: Option<&'a str>,
    pub phone_number: Option<&'a str>,
}

pub async fn update_user(
    pool: &PgPool,
    id: Uuid,
    p: &UpdateUserParams<'_>,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!(
        "UPDATE users
         SET name = COALESCE($2, name),
             phone_number = CASE WHEN $3::text IS NULL THEN phone_number
                                 ELSE NULLIF($3, '') END,
             updated_at = NOW()
         WHERE id = $1
         RETURNING {USER_COLUMNS}"
    ))
    .bind(id)
    .bind(p.name)
    .bind(p.phone_number)
    .fetch_optional(pool)
    .await
}

// ---------------------------------------------------------------------------
// Farms and lands
// ---------------------------------------------------------------------------

pub struct InsertFarmParams<'a> {
    pub farm_name: &'a str,
    pub location_latitude: Option<Decimal>,
    pub location_longitude: Option<Decimal>,
    pub address: Option<&'a str>,
}

pub async fn insert_farm(
    pool: &PgPool,
    user_id: Uuid,
    p: &InsertFarmParams<'_>,
) -> Result<Farm, sqlx::Error> {
    sqlx::query_as::<_, Farm>(&format!(
        "INSERT INTO farms (id, user_id, farm_name, location_latitude, location_longitude, address)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING {FARM_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(p.farm_name)
    .bind(p.location_latitude)
    .bind(p.location_longitude)
    .bind(p.address)
    .fetch_one(pool)
    .await
}

pub async fn list_farms(pool: &PgPool, user_id: Uuid) -> Result<Vec<Farm>, sqlx::Error> {
    sqlx::query_as::<_, Farm>(&format!(
        "SELECT {FARM_COLUMNS} FROM farms WHERE user_id = $1 ORDER BY created_at"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await
}

/// A farm, only if owned by `user_id`.
pub async fn get_farm_for_user(
    pool: &PgPool,
    farm_id: Uuid,
    user_id: Uuid,
) -> Result<Option<Farm>, sqlx::Error> {
    sqlx::query_as::<_, Farm>(&format!(
        "SELECT {FARM_COLUMNS} FROM farms WHERE id = $1 AND user_id = $2"
    ))
    .bind(farm_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

/// Farm fields to change. `None` leaves a field as is; an empty address
/// clears it.
pub struct UpdateFarmParams<'a> {
    pub farm_name: Option<&'a str>,
    pub location_latitude: Option<Decimal>,
    pub location_longitude: Option<Decimal>,
    pub address: Option<&'a str>,
}

pub async fn update_farm_for_user(
    pool: &PgPool,
    farm_id: Uuid,
    user_id: Uuid,
    p: &UpdateFarmParams<'_>,
) -> Result<Option<Farm>, sqlx::Error> {
    sqlx::query_as::<_, Farm>(&format!(
        "UPDATE farms
         SET farm_name = COALESCE($3, farm_name),
             location_latitude = COALESCE($4, location_latitude),
             location_longitude = COALESCE($5, location_longitude),
             address = CASE WHEN $6::text IS NULL THEN address ELSE NULLIF($6, '') END,
             updated_at = NOW()
         WHERE id = $1 AND user_id = $2
         RETURNING {FARM_COLUMNS}"
    ))
    .bind(farm_id)
    .bind(user_id)
    .bind(p.farm_name)
    .bind(p.location_latitude)
    .bind(p.location_longitude)
    .bind(p.address)
    .fetch_optional(pool)
    .await
}

pub async fn delete_farm_for_user(
    pool: &PgPool,
    farm_id: Uuid,
    user_id: Uuid,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM farms WHERE id = $1 AND user_id = $2")
        .bind(farm_id)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub struct InsertLandParams<'a> {
    pub land_name: &'a str,
    pub area: Decimal,
    pub area_unit: &'a str,
    pub soil_type_manual: Option<&'a str>,
}

pub async fn insert_land(
    pool: &PgPool,
    farm_id: Uuid,
    p: &InsertLandParams<'_>,
) -> Result<Land, sqlx::Error> {
    sqlx::query_as::<_, Land>(&format!(
        "INSERT INTO lands AS l (id, farm_id, land_name, area, area_unit, soil_type_manual)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING {LAND_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(farm_id)
    .bind(p.land_name)
    .bind(p.area)
    .bind(p.area_unit)
    .bind(p.soil_type_manual)
    .fetch_one(pool)
    .await
}

pub async fn list_lands(pool: &PgPool, farm_id: Uuid) -> Result<Vec<Land>, sqlx::Error> {
    sqlx::query_as::<_, Land>(&format!(
        "SELECT {LAND_COLUMNS} FROM lands l WHERE l.farm_id = $1 ORDER BY l.created_at"
    ))
    .bind(farm_id)
    .fetch_all(pool)
    .await
}

/// A land plot, only if its farm is owned by `user_id`.
pub async fn get_land_for_user(
    pool: &PgPool,
    land_id: Uuid,
    user_id: Uuid,
) -> Result<Option<Land>, sqlx::Error> {
    sqlx::query_as::<_, Land>(&format!(
        "SELECT {LAND_COLUMNS}
         FROM lands l JOIN farms f ON f.id = l.farm_id
         WHERE l.id = $1 AND f.user_id = $2"
    ))
    .bind(land_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

/// Land fields to change. `None` leaves a field as is; an empty soil type
/// clears it. The current planting is only moved by the planting operations.
pub struct UpdateLandParams<'a> {
    pub land_name: Option<&'a str>,
    pub area: Option<Decimal>,
    pub area_unit: Option<&'a str>,
    pub soil_type_manual: Option<&'a str>,
    pub soil_type_detected: Option<&'a str>,
}

pub async fn update_land_for_user(
    pool: &PgPool,
    land_id: Uuid,
    user_id: Uuid,
    p: &UpdateLandParams<'_>,
) -> Result<Option<Land>, sqlx::Error> {
    sqlx::query_as::<_, Land>(&format!(
        "UPDATE lands l
         SET land_name = COALESCE($3, l.land_name),
             area = COALESCE($4, l.area),
             area_unit = COALESCE($5, l.area_unit),
             soil_type_manual = CASE WHEN $6::text IS NULL THEN l.soil_type_manual
                                     ELSE NULLIF($6, '') END,
             soil_type_detected = CASE WHEN $7::text IS NULL THEN l.soil_type_detected
                                       ELSE NULLIF($7, '') END,
             updated_at = NOW()
         FROM farms f
         WHERE l.id = $1 AND f.id = l.farm_id AND f.user_id = $2
         RETURNING {LAND_COLUMNS}"
    ))
    .bind(land_id)
    .bind(user_id)
    .bind(p.land_name)
    .bind(p.area)
    .bind(p.area_unit)
    .bind(p.soil_type_manual)
    .bind(p.soil_type_detected)
    .fetch_optional(pool)
    .await
}

/// The land's current planting with its crop name.
pub async fn get_current_planting_summary(
    pool: &PgPool,
    land_id: Uuid,
) -> Result<Option<PlantingSummary>, sqlx::Error> {
    sqlx::query_as::<_, PlantingSummary>(
        "SELECT p.id, p.crop_id, c.crop_name, p.planting_date, p.status
         FROM lands l
         JOIN plantings p ON p.id = l.current_planting_id
         JOIN crops c ON c.id = p.crop_id
         WHERE l.id = $1",
    )
    .bind(land_id)
    .fetch_optional(pool)
    .await
}

/// Delete a land plot. Its device (if any) is unassigned and set inactive in
/// the same transaction.
pub async fn delete_land_for_user(
    pool: &PgPool,
    land_id: Uuid,
    user_id: Uuid,
) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;

    // Device before land, the same order assignment takes its locks in.
    sqlx::query("SELECT id FROM hardware_devices WHERE assigned_land_id = $1 FOR UPDATE")
        .bind(land_id)
        .fetch_optional(&mut *tx)
        .await?;

    let owned: Option<Uuid> = sqlx::query_scalar(
        "SELECT l.id FROM lands l JOIN farms f ON f.id = l.farm_id
         WHERE l.id = $1 AND f.user_id = $2
         FOR UPDATE OF l",
    )
    .bind(land_id)
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?;

    if owned.is_none() {
        return Ok(false);
    }

    sqlx::query(
        "UPDATE hardware_devices
         SET assigned_land_id = NULL, status = $2, updated_at = NOW()
         WHERE assigned_land_id = $1",
    )
    .bind(land_id)
    .bind(DeviceStatus::Inactive.as_str())
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM lands WHERE id = $1")
        .bind(land_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(true)
}

/// Land plot with its farm's owner and address and the crop of its active planting.
pub async fn get_land_context(
    pool: &PgPool,
    land_id: Uuid,
) -> Result<Option<LandContext>, sqlx::Error> {
    sqlx::query_as::<_, LandContext>(
        "SELECT l.id AS land_id, l.farm_id, f.user_id, f.address,
                l.soil_type_manual, l.soil_type_detected,
                c.crop_name AS active_crop_name
         FROM lands l
         JOIN farms f ON f.id = l.farm_id
         LEFT JOIN plantings p ON p.id = l.current_planting_id AND p.status = 'active'
         LEFT JOIN crops c ON c.id = p.crop_id
         WHERE l.id = $1",
    )
    .bind(land_id)
    .fetch_optional(pool)
    .await
}

// ---------------------------------------------------------------------------
// Devices
// ---------------------------------------------------------------------------

pub struct InsertDeviceParams<'a> {
    pub hardware_unique_id: &'a str,
    pub farm_id: Uuid,
    pub assigned_land_id: Option<Uuid>,
    pub device_name: Option<&'a str>,
    pub model: Option<&'a str>,
    pub status: DeviceStatus,
}

pub async fn insert_device(
    conn: &mut PgConnection,
    p: &InsertDeviceParams<'_>,
) -> Result<Device, sqlx::Error> {
    sqlx::query_as::<_, Device>(&format!(
        "INSERT INTO hardware_devices AS d
             (id, hardware_unique_id, farm_id, assigned_land_id, device_name, model, status)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING {DEVICE_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(p.hardware_unique_id)
    .bind(p.farm_id)
    .bind(p.assigned_land_id)
    .bind(p.device_name)
    .bind(p.model)
    .bind(p.status.as_str())
    .fetch_one(conn)
    .await
}

pub async fn list_devices(
    pool: &PgPool,
    farm_id: Uuid,
    status: Option<DeviceStatus>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Device>, sqlx::Error> {
    sqlx::query_as::<_, Device>(&format!(
        "SELECT {DEVICE_COLUMNS} FROM hardware_devices d
         WHERE d.farm_id = $1 AND ($2::text IS NULL OR d.status = $2)
         ORDER BY d.created_at
         LIMIT $3 OFFSET $4"
    ))
    .bind(farm_id)
    .bind(status.map(DeviceStatus::as_str))
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

pub async fn get_device_for_user(
    pool: &PgPool,
    device_id: Uuid,
    user_id: Uuid,
) -> Result<Option<Device>, sqlx::Error> {
    sqlx::query_as::<_, Device>(&format!(
        "SELECT {DEVICE_COLUMNS}
         FROM hardware_devices d JOIN farms f ON f.id = d.farm_id
         WHERE d.id = $1 AND f.user_id = $2"
    ))
    .bind(device_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

/// Update descriptive fields; `None` leaves a field unchanged.
pub async fn update_device_details(
    pool: &PgPool,
    device_id: Uuid,
    user_id: Uuid,
    device_name: Option<&str>,
    model: Option<&str>,
    status: Option<DeviceStatus>,
) -> Result<Option<Device>, sqlx::Error> {
    sqlx::query_as::<_, Device>(&format!(
        "UPDATE hardware_devices d
         SET device_name = COALESCE($3, d.device_name),
             model = COALESCE($4, d.model),
             status = COALESCE($5, d.status),
             updated_at = NOW()
         FROM farms f
         WHERE d.id = $1 AND f.id = d.farm_id AND f.user_id = $2
         RETURNING {DEVICE_COLUMNS}"
    ))
    .bind(device_id)
    .bind(user_id)
    .bind(device_name)
    .bind(model)
    .bind(status.map(DeviceStatus::as_str))
    .fetch_optional(pool)
    .await
}

pub async fn delete_device_for_user(
    pool: &PgPool,
    device_id: Uuid,
    user_id: Uuid,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "DELETE FROM hardware_devices d USING farms f
         WHERE d.id = $1 AND f.id = d.farm_id AND f.user_id = $2",
    )
    .bind(device_id)
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn get_device_on_land(
    pool: &PgPool,
    land_id: Uuid,
) -> Result<Option<Device>, sqlx::Error> {
    sqlx::query_as::<_, Device>(&format!(
        "SELECT {DEVICE_COLUMNS} FROM hardware_devices d WHERE d.assigned_land_id = $1"
    ))
    .bind(land_id)
    .fetch_optional(pool)
    .await
}

/// Lock a device row owned by `user_id` for the rest of the transaction.
pub async fn lock_device_for_user(
    conn: &mut PgConnection,
    device_id: Uuid,
    user_id: Uuid,
) -> Result<Option<Device>, sqlx::Error> {
    sqlx::query_as::<_, Device>(&format!(
        "SELECT {DEVICE_COLUMNS}
         FROM hardware_devices d JOIN farms f ON f.id = d.farm_id
         WHERE d.id = $1 AND f.user_id = $2
         FOR UPDATE OF d"
    ))
    .bind(device_id)
    .bind(user_id)
    .fetch_optional(conn)
    .await
}

/// Lock a land row if it belongs to `farm_id`. Serialises assignment changes
/// targeting the same land.
pub async fn lock_land_in_farm(
    conn: &mut PgConnection,
    land_id: Uuid,
    farm_id: Uuid,
) -> Result<bool, sqlx::Error> {
    let found: Option<Uuid> =
        sqlx::query_scalar("SELECT id FROM lands WHERE id = $1 AND farm_id = $2 FOR UPDATE")
            .bind(land_id)
            .bind(farm_id)
            .fetch_optional(conn)
            .await?;
    Ok(found.is_some())
}

/// The device currently assigned to a land, if any.
pub async fn device_holding_land(
    conn: &mut PgConnection,
    land_id: Uuid,
) -> Result<Option<Uuid>, sqlx::Error> {
    sqlx::query_scalar("SELECT id FROM hardware_devices WHERE assigned_land_id = $1")
        .bind(land_id)
        .fetch_optional(conn)
        .await
}

pub async fn set_device_assignment(
    conn: &mut PgConnection,
    device_id: Uuid,
    land_id: Option<Uuid>,
    status: DeviceStatus,
) -> Result<Device, sqlx::Error> {
    sqlx::query_as::<_, Device>(&format!(
        "UPDATE hardware_devices AS d
         SET assigned_land_id = $2, status = $3, updated_at = NOW()
         WHERE d.id = $1
         RETURNING {DEVICE_COLUMNS}"
    ))
    .bind(device_id)
    .bind(land_id)
    .bind(status.as_str())
    .fetch_one(conn)
    .await
}

/// Lock a device by hardware id for ingestion.
pub async fn lock_device_by_hardware_id(
    conn: &mut PgConnection,
    hardware_unique_id: &str,
) -> Result<Option<DeviceAssignment>, sqlx::Error> {
    sqlx::query_as::<_, DeviceAssignment>(
        "SELECT id, farm_id, assigned_land_id
         FROM hardware_devices
         WHERE hardware_unique_id = $1
         FOR UPDATE",
    )
    .bind(hardware_unique_id)
    .fetch_optional(conn)
    .await
}

pub async fn mark_device_seen(
    conn: &mut PgConnection,
    device_id: Uuid,
    seen_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE hardware_devices
         SET last_seen_at = $2, status = $3, updated_at = NOW()
         WHERE id = $1",
    )
    .bind(device_id)
    .bind(seen_at)
    .bind(DeviceStatus::Active.as_str())
    .execute(conn)
    .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Soil readings
// ---------------------------------------------------------------------------

/// Parameters for inserting a soil reading.
pub struct InsertReadingParams {
    pub device_id: Uuid,
    pub land_id: Uuid,
    pub farm_id: Uuid,
    pub observed_at: DateTime<Utc>,
    pub ph_value: Option<Decimal>,
    pub nitrogen_value: Option<Decimal>,
    pub phosphorus_value: Option<Decimal>,
    pub potassium_value: Option<Decimal>,
    pub moisture_value: Option<Decimal>,
    pub temperature_value: Option<Decimal>,
    pub humidity_value: Option<Decimal>,
}

pub async fn insert_soil_reading(
    conn: &mut PgConnection,
    p: &InsertReadingParams,
) -> Result<Uuid, sqlx::Error> {
    sqlx::query_scalar(
        "INSERT INTO soil_readings
             (id, device_id, land_id, farm_id, observed_at,
              ph_value, nitrogen_value, phosphorus_value, potassium_value,
              moisture_value, temperature_value, humidity_value)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
         RETURNING id",
    )
    .bind(Uuid::new_v4())
    .bind(p.device_id)
    .bind(p.land_id)
    .bind(p.farm_id)
    .bind(p.observed_at)
    .bind(p.ph_value)
    .bind(p.nitrogen_value)
    .bind(p.phosphorus_value)
    .bind(p.potassium_value)
    .bind(p.moisture_value)
    .bind(p.temperature_value)
    .bind(p.humidity_value)
    .fetch_one(conn)
    .await
}

/// Filter for listing a land's readings. Bounds are inclusive.
pub struct ReadingFilter {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

/// Readings for a land, newest observation first.
pub async fn list_soil_readings(
    pool: &PgPool,
    land_id: Uuid,
    filter: &ReadingFilter,
) -> Result<Vec<SoilReading>, sqlx::Error> {
    sqlx::query_as::<_, SoilReading>(&format!(
        "SELECT {READING_COLUMNS} FROM soil_readings
         WHERE land_id = $1
           AND ($2::timestamptz IS NULL OR observed_at >= $2)
           AND ($3::timestamptz IS NULL OR observed_at <= $3)
         ORDER BY observed_at DESC, received_at DESC
         LIMIT $4 OFFSET $5"
    ))
    .bind(land_id)
    .bind(filter.start)
    .bind(filter.end)
    .bind(filter.limit)
    .bind(filter.offset)
    .fetch_all(pool)
    .await
}

/// Most recent reading for a land, whatever it carries.
pub async fn get_latest_soil_reading(
    pool: &PgPool,
    land_id: Uuid,
) -> Result<Option<SoilReading>, sqlx::Error> {
    sqlx::query_as::<_, SoilReading>(&format!(
        "SELECT {READING_COLUMNS} FROM soil_readings
         WHERE land_id = $1
         ORDER BY observed_at DESC, received_at DESC
         LIMIT 1"
    ))
    .bind(land_id)
    .fetch_optional(pool)
    .await
}

/// Most recent reading for a land carrying at least one of N/P/K.
pub async fn get_latest_nutrient_reading(
    pool: &PgPool,
    land_id: Uuid,
) -> Result<Option<SoilReading>, sqlx::Error> {
    sqlx::query_as::<_, SoilReading>(&format!(
        "SELECT {READING_COLUMNS} FROM soil_readings
         WHERE land_id = $1
           AND (nitrogen_value IS NOT NULL
                OR phosphorus_value IS NOT NULL
                OR potassium_value IS NOT NULL)
         ORDER BY observed_at DESC, received_at DESC
         LIMIT 1"
    ))
    .bind(land_id)
    .fetch_optional(pool)
    .await
}

// ---------------------------------------------------------------------------
// Plantings
// ---------------------------------------------------------------------------

pub struct InsertPlantingParams<'a> {
    pub land_id: Uuid,
    pub crop_id: Uuid,
    pub planting_date: NaiveDate,
    pub expected_harvest_date: Option<NaiveDate>,
    pub notes: Option<&'a str>,
}

/// Start a planting and make it the land's current one. A previous active
/// planting on the land is marked `replaced`.
pub async fn start_planting(
    pool: &PgPool,
    p: &InsertPlantingParams<'_>,
) -> Result<Planting, sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query("SELECT id FROM lands WHERE id = $1 FOR UPDATE")
        .bind(p.land_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        "UPDATE plantings SET status = $2, updated_at = NOW()
         WHERE land_id = $1 AND status = $3",
    )
    .bind(p.land_id)
    .bind(PlantingStatus::Replaced.as_str())
    .bind(PlantingStatus::Active.as_str())
    .execute(&mut *tx)
    .await?;

    let planting = sqlx::query_as::<_, Planting>(&format!(
        "INSERT INTO plantings AS p
             (id, land_id, crop_id, planting_date, expected_harvest_date, notes)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING {PLANTING_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(p.land_id)
    .bind(p.crop_id)
    .bind(p.planting_date)
    .bind(p.expected_harvest_date)
    .bind(p.notes)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("UPDATE lands SET current_planting_id = $2, updated_at = NOW() WHERE id = $1")
        .bind(p.land_id)
        .bind(planting.id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(planting)
}

pub async fn get_planting_for_user(
    pool: &PgPool,
    planting_id: Uuid,
    user_id: Uuid,
) -> Result<Option<Planting>, sqlx::Error> {
    sqlx::query_as::<_, Planting>(&format!(
        "SELECT {PLANTING_COLUMNS}
         FROM plantings p
         JOIN lands l ON l.id = p.land_id
         JOIN farms f ON f.id = l.farm_id
         WHERE p.id = $1 AND f.user_id = $2"
    ))
    .bind(planting_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

/// Planting fields to change. `None` leaves a field as is.
pub struct UpdatePlantingParams<'a> {
    pub status: Option<PlantingStatus>,
    pub expected_harvest_date: Option<NaiveDate>,
    pub actual_harvest_date: Option<NaiveDate>,
    pub notes: Option<&'a str>,
}

/// Update `planting` as long as its status is still the one the caller saw.
/// With `unlink` the land stops pointing at it, if it still does. `None` when
/// the status changed underneath.
pub async fn update_planting(
    pool: &PgPool,
    planting: &Planting,
    p: &UpdatePlantingParams<'_>,
    unlink: bool,
) -> Result<Option<Planting>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    // Land before planting, the same order start_planting takes its locks in.
    sqlx::query("SELECT id FROM lands WHERE id = $1 FOR UPDATE")
        .bind(planting.land_id)
        .execute(&mut *tx)
        .await?;

    let updated = sqlx::query_as::<_, Planting>(&format!(
        "UPDATE plantings p
         SET status = COALESCE($3, p.status),
             expected_harvest_date = COALESCE($4, p.expected_harvest_date),
             actual_harvest_date = COALESCE($5, p.actual_harvest_date),
             notes = COALESCE($6, p.notes),
             updated_at = NOW()
         WHERE p.id = $1 AND p.status = $2
         RETURNING {PLANTING_COLUMNS}"
    ))
    .bind(planting.id)
    .bind(planting.status.as_str())
    .bind(p.status.map(PlantingStatus::as_str))
    .bind(p.expected_harvest_date)
    .bind(p.actual_harvest_date)
    .bind(p.notes)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(updated) = updated else {
        return Ok(None);
    };

    if unlink {
        sqlx::query(
            "UPDATE lands SET current_planting_id = NULL, updated_at = NOW()
             WHERE id = $1 AND current_planting_id = $2",
        )
        .bind(planting.land_id)
        .bind(planting.id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(Some(updated))
}

// ---------------------------------------------------------------------------
// Reference data
// ---------------------------------------------------------------------------

pub async fn get_crop(pool: &PgPool, crop_id: Uuid) -> Result<Option<Crop>, sqlx::Error> {
    sqlx::query_as::<_, Crop>(
        "SELECT id, crop_name, description, image_url, optimal_ph_min, optimal_ph_max
         FROM crops WHERE id = $1",
    )
    .bind(crop_id)
    .fetch_optional(pool)
    .await
}

pub async fn list_crops(pool: &PgPool) -> Result<Vec<Crop>, sqlx::Error> {
    sqlx::query_as::<_, Crop>(
        "SELECT id, crop_name, description, image_url, optimal_ph_min, optimal_ph_max
         FROM crops ORDER BY crop_name",
    )
    .fetch_all(pool)
    .await
}

pub async fn list_fertilizers(pool: &PgPool) -> Result<Vec<Fertilizer>, sqlx::Error> {
    sqlx::query_as::<_, Fertilizer>(
        "SELECT id, fertilizer_name, fertilizer_type,
                n_content_percent, p_content_percent, k_content_percent, description
         FROM fertilizers ORDER BY fertilizer_name",
    )
    .fetch_all(pool)
    .await
}

pub async fn list_diseases(pool: &PgPool) -> Result<Vec<Disease>, sqlx::Error> {
    sqlx::query_as::<_, Disease>(
        "SELECT id, disease_name, description, symptoms, image_url
         FROM diseases ORDER BY disease_name",
    )
    .fetch_all(pool)
    .await
}
