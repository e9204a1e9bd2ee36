//! Read-only reference data seeded by migrations.

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use sqlx::PgPool;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::models::{Crop, Disease, Fertilizer};
use crate::db::queries;
use crate::errors::AppError;
use crate::helpers::opt_dec_to_f64;

#[derive(Debug, Serialize, ToSchema)]
pub struct CropResponse {
    pub id: Uuid,
    pub crop_name: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub optimal_ph_min: Option<f64>,
    pub optimal_ph_max: Option<f64>,
}

impl From<Crop> for CropResponse {
    fn from(c: Crop) -> Self {
        Self {
            id: c.id,
            crop_name: c.crop_name,
            description: c.description,
            image_url: c.image_url,
            optimal_ph_min: opt_dec_to_f64(c.optimal_ph_min),
            optimal_ph_max: opt_dec_to_f64(c.optimal_ph_max),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FertilizerResponse {
    pub id: Uuid,
    pub fertilizer_name: String,
    pub fertilizer_type: Option<String>,
    /// Nutrient content in percent by weight
    pub n_content_percent: Option<f64>,
    pub p_content_percent: Option<f64>,
    pub k_content_percent: Option<f64>,
    pub description: Option<String>,
}

impl From<Fertilizer> for FertilizerResponse {
    fn from(f: Fertilizer) -> Self {
        Self {
            id: f.id,
            fertilizer_name: f.fertilizer_name,
            fertilizer_type: f.fertilizer_type,
            n_content_percent: opt_dec_to_f64(f.n_content_percent),
            p_content_percent: opt_dec_to_f64(f.p_content_percent),
            k_content_percent: opt_dec_to_f64(f.k_content_percent),
            description: f.description,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DiseaseResponse {
    pub id: Uuid,
    pub disease_name: String,
    pub description: Option<String>,
    pub symptoms: Option<String>,
    pub image_url: Option<String>,
}

impl From<Disease> for DiseaseResponse {
    fn from(d: Disease) -> Self {
        Self {
            id: d.id,
            disease_name: d.disease_name,
            description: d.description,
            symptoms: d.symptoms,
            image_url: d.image_url,
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/crops",
    tag = "Reference",
    responses((status = 200, description = "Known crops", body = Vec<CropResponse>))
)]
pub async fn list_crops(State(pool): State<PgPool>) -> Result<Json<Vec<CropResponse>>, AppError> {
    let crops = queries::list_crops(&pool).await?;
    Ok(Json(crops.into_iter().map(CropResponse::from).collect()))
}

#[utoipa::path(
    get,
    path = "/api/v1/fertilizers",
    tag = "Reference",
    responses((status = 200, description = "Known fertilizers", body = Vec<FertilizerResponse>))
)]
pub async fn list_fertilizers(
    State(pool): State<PgPool>,
) -> Result<Json<Vec<FertilizerResponse>>, AppError> {
    let fertilizers = queries::list_fertilizers(&pool).await?;
    Ok(Json(fertilizers.into_iter().map(FertilizerResponse::from).collect()))
}

#[utoipa::path(
    get,
    path = "/api/v1/diseases",
    tag = "Reference",
    responses((status = 200, description = "Known crop diseases", body = Vec<DiseaseResponse>))
)]
pub async fn list_diseases(
    State(pool): State<PgPool>,
) -> Result<Json<Vec<DiseaseResponse>>, AppError> {
    let diseases = queries::list_diseases(&pool).await?;
    Ok(Json(diseases.into_iter().map(DiseaseResponse::from).collect()))
}
