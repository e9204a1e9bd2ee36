use axum::extract::State;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::routes::AppState;
use crate::services::predictor::{Classifier, ModelKind};

/// A loaded classifier as reported by the health check.
#[derive(Debug, Serialize, ToSchema)]
pub struct ModelStatus {
    /// "crop" or "fertilizer"
    pub kind: ModelKind,
    /// Number of labels the model can return
    pub classes: usize,
}

impl From<&Classifier> for ModelStatus {
    fn from(c: &Classifier) -> Self {
        Self {
            kind: c.kind(),
            classes: c.classes().len(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// "ok", or "degraded" when the database is unreachable
    pub status: String,
    pub version: String,
    pub database: bool,
    pub models: Vec<ModelStatus>,
}

fn status_label(db_ok: bool) -> &'static str {
    if db_ok {
        "ok"
    } else {
        "degraded"
    }
}

/// Service health.
///
/// Always 200. Models are loaded before the listener binds, so a running
/// service reports both of them.
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service status", body = HealthResponse),
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_ok = sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&state.pool)
        .await
        .is_ok();
    let predictor = &state.recommender.predictor;

    Json(HealthResponse {
        status: status_label(db_ok).to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: db_ok,
        models: [ModelKind::Crop, ModelKind::Fertilizer]
            .into_iter()
            .map(|kind| ModelStatus::from(predictor.classifier(kind)))
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_label() {
        assert_eq!(status_label(true), "ok");
        assert_eq!(status_label(false), "degraded");
    }

    #[test]
    fn test_model_status_from_shipped_crop_model() {
        let classifier = Classifier::from_json(
            include_str!("../../data/models/crop_recommendation.json"),
            ModelKind::Crop,
        )
        .unwrap();
        let status = ModelStatus::from(&classifier);
        assert_eq!(status.kind, ModelKind::Crop);
        assert_eq!(status.classes, 8);
    }
}
