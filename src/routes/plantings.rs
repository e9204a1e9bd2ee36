use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::db::models::{Planting, PlantingStatus};
use crate::db::queries::{self, InsertPlantingParams, UpdatePlantingParams};
use crate::errors::{AppError, ErrorResponse};

#[derive(Debug, Deserialize, ToSchema)]
pub struct StartPlantingRequest {
    pub crop_id: Uuid,
    /// YYYY-MM-DD
    pub planting_date: NaiveDate,
    pub expected_harvest_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// Fields to change on a planting. Omitted fields stay as they are.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdatePlantingRequest {
    /// "active", "harvested", "failed" or "canceled"
    pub status: Option<PlantingStatus>,
    pub expected_harvest_date: Option<NaiveDate>,
    pub actual_harvest_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PlantingResponse {
    pub id: Uuid,
    pub land_id: Uuid,
    pub crop_id: Uuid,
    pub planting_date: NaiveDate,
    pub expected_harvest_date: Option<NaiveDate>,
    pub actual_harvest_date: Option<NaiveDate>,
    /// "active", "replaced", "harvested", "failed" or "canceled"
    pub status: String,
    pub notes: Option<String>,
}

impl From<Planting> for PlantingResponse {
    fn from(p: Planting) -> Self {
        Self {
            id: p.id,
            land_id: p.land_id,
            crop_id: p.crop_id,
            planting_date: p.planting_date,
            expected_harvest_date: p.expected_harvest_date,
            actual_harvest_date: p.actual_harvest_date,
            status: p.status,
            notes: p.notes,
        }
    }
}

/// Check an update against the planting it applies to. Returns whether the
/// land has to drop its link to the planting.
fn plan_update(current: &Planting, req: &UpdatePlantingRequest) -> Result<bool, AppError> {
    if req.status.is_none()
        && req.expected_harvest_date.is_none()
        && req.actual_harvest_date.is_none()
        && req.notes.is_none()
    {
        return Err(AppError::BadRequest("No valid fields provided".to_string()));
    }

    let was_active = current.status.parse::<PlantingStatus>() == Ok(PlantingStatus::Active);
    match req.status {
        Some(PlantingStatus::Replaced) => {
            return Err(AppError::BadRequest(
                "status must be one of active, harvested, failed, canceled".to_string(),
            ));
        }
        Some(PlantingStatus::Active) if !was_active => {
            return Err(AppError::BadRequest(format!(
                "a {} planting cannot be made active again",
                current.status
            )));
        }
        _ => {}
    }

    for (field, date) in [
        ("expected_harvest_date", req.expected_harvest_date),
        ("actual_harvest_date", req.actual_harvest_date),
    ] {
        if date.is_some_and(|d| d < current.planting_date) {
            return Err(AppError::BadRequest(format!("{} is before planting_date", field)));
        }
    }

    Ok(was_active && req.status.is_some_and(|s| s != PlantingStatus::Active))
}

/// Start a planting on a land plot. It becomes the land's current planting
/// and its crop feeds fertilizer recommendations.
#[utoipa::path(
    post,
    path = "/api/v1/lands/{id}/plantings",
    tag = "Plantings",
    params(("id" = Uuid, Path, description = "Land UUID")),
    request_body = StartPlantingRequest,
    responses(
        (status = 201, description = "Planting started", body = PlantingResponse),
        (status = 400, description = "Unknown crop or bad dates", body = ErrorResponse),
        (status = 404, description = "Land not found", body = ErrorResponse),
    )
)]
pub async fn start_planting(
    State(pool): State<PgPool>,
    auth: AuthUser,
    Path(land_id): Path<Uuid>,
    Json(req): Json<StartPlantingRequest>,
) -> Result<(StatusCode, Json<PlantingResponse>), AppError> {
    if let Some(harvest) = req.expected_harvest_date {
        if harvest < req.planting_date {
            return Err(AppError::BadRequest(
                "expected_harvest_date is before planting_date".to_string(),
            ));
        }
    }
    queries::get_land_for_user(&pool, land_id, auth.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Land {} not found", land_id)))?;
    let crop = queries::get_crop(&pool, req.crop_id)
        .await?
        .ok_or_else(|| AppError::BadRequest(format!("Crop {} does not exist", req.crop_id)))?;

    let planting = queries::start_planting(
        &pool,
        &InsertPlantingParams {
            land_id,
            crop_id: crop.id,
            planting_date: req.planting_date,
            expected_harvest_date: req.expected_harvest_date,
            notes: req.notes.as_deref(),
        },
    )
    .await?;

    tracing::info!("Started {} planting {} on land {}", crop.crop_name, planting.id, land_id);
    Ok((StatusCode::CREATED, Json(planting.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/plantings/{id}",
    tag = "Plantings",
    params(("id" = Uuid, Path, description = "Planting UUID")),
    responses(
        (status = 200, description = "Planting", body = PlantingResponse),
        (status = 404, description = "Planting not found", body = ErrorResponse),
    )
)]
pub async fn get_planting(
    State(pool): State<PgPool>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<PlantingResponse>, AppError> {
    let planting = queries::get_planting_for_user(&pool, id, auth.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Planting {} not found", id)))?;
    Ok(Json(planting.into()))
}

/// Update a planting's status, harvest dates or notes. Moving it off
/// `active` clears the land's current planting.
#[utoipa::path(
    put,
    path = "/api/v1/plantings/{id}",
    tag = "Plantings",
    params(("id" = Uuid, Path, description = "Planting UUID")),
    request_body = UpdatePlantingRequest,
    responses(
        (status = 200, description = "Planting updated", body = PlantingResponse),
        (status = 400, description = "No fields, bad status or bad dates", body = ErrorResponse),
        (status = 404, description = "Planting not found", body = ErrorResponse),
        (status = 409, description = "Planting changed concurrently", body = ErrorResponse),
    )
)]
pub async fn update_planting(
    State(pool): State<PgPool>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdatePlantingRequest>,
) -> Result<Json<PlantingResponse>, AppError> {
    let current = queries::get_planting_for_user(&pool, id, auth.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Planting {} not found", id)))?;
    let unlink = plan_update(&current, &req)?;

    let updated = queries::update_planting(
        &pool,
        &current,
        &UpdatePlantingParams {
            status: req.status,
            expected_harvest_date: req.expected_harvest_date,
            actual_harvest_date: req.actual_harvest_date,
            notes: req.notes.as_deref(),
        },
        unlink,
    )
    .await?
    .ok_or_else(|| AppError::Conflict(format!("Planting {} changed concurrently", id)))?;

    if unlink {
        tracing::info!(
            "Planting {} is now {}, unlinked from land {}",
            id,
            updated.status,
            updated.land_id
        );
    }
    Ok(Json(updated.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planting(status: &str) -> Planting {
        Planting {
            id: Uuid::new_v4(),
            land_id: Uuid::new_v4(),
            crop_id: Uuid::new_v4(),
            planting_date: NaiveDate::from_ymd_opt(2025, 6, 15).unwrap(),
            expected_harvest_date: None,
            actual_harvest_date: None,
            status: status.to_string(),
            notes: None,
            created_at: "2025-06-15T00:00:00Z".parse().unwrap(),
        }
    }

    fn update(v: serde_json::Value) -> UpdatePlantingRequest {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_empty_update_is_rejected() {
        assert!(matches!(
            plan_update(&planting("active"), &UpdatePlantingRequest::default()),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn test_harvest_unlinks_active_planting() {
        let req = update(serde_json::json!({
            "status": "harvested",
            "actual_harvest_date": "2025-10-20"
        }));
        assert!(plan_update(&planting("active"), &req).unwrap());
    }

    #[test]
    fn test_notes_only_keeps_link() {
        let req = update(serde_json::json!({ "notes": "drip irrigation added" }));
        assert!(!plan_update(&planting("active"), &req).unwrap());
        let req = update(serde_json::json!({ "status": "active" }));
        assert!(!plan_update(&planting("active"), &req).unwrap());
    }

    #[test]
    fn test_finished_planting_stays_unlinked() {
        let req = update(serde_json::json!({ "status": "canceled" }));
        assert!(!plan_update(&planting("failed"), &req).unwrap());
    }

    #[test]
    fn test_status_outside_allowed_set_is_rejected() {
        let req = update(serde_json::json!({ "status": "replaced" }));
        assert!(plan_update(&planting("active"), &req).is_err());
        assert!(serde_json::from_value::<UpdatePlantingRequest>(
            serde_json::json!({ "status": "growing" })
        )
        .is_err());
    }

    #[test]
    fn test_finished_planting_cannot_be_reactivated() {
        let req = update(serde_json::json!({ "status": "active" }));
        assert!(matches!(
            plan_update(&planting("harvested"), &req),
            Err(AppError::BadRequest(msg)) if msg.contains("harvested")
        ));
    }

    #[test]
    fn test_harvest_date_before_planting_is_rejected() {
        let req = update(serde_json::json!({ "actual_harvest_date": "2025-06-01" }));
        assert!(matches!(
            plan_update(&planting("active"), &req),
            Err(AppError::BadRequest(msg)) if msg.starts_with("actual_harvest_date")
        ));
    }
}
