//! Recommendation endpoints.
//!
//! - GET /api/v1/lands/:id/crop-suggestions
//! - GET /api/v1/lands/:id/fertilizer-recommendations
//!
//! A generated reply that cannot be parsed still yields 200, with an empty
//! list and `error` set.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::db::models::LandContext;
use crate::db::queries;
use crate::errors::{AppError, ErrorResponse};
use crate::routes::AppState;
use crate::services::parser::{ParsedResponse, PARSE_ERROR_MESSAGE};
use crate::services::recommend::parse_match_score;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CropSuggestion {
    pub crop_name: String,
    /// Suitability in [0, 1]
    pub suitability_score: f64,
    pub description: String,
    pub explanation: String,
    pub growing_season: String,
    pub water_requirement: String,
    pub expected_yield: String,
    pub recommendations: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CropSuggestionsResponse {
    pub land_id: Uuid,
    /// Observation time of the reading the features came from
    pub based_on_reading_ts: String,
    /// Label from the crop model
    pub predicted_crop: String,
    /// Sorted by descending suitability
    pub suggestions: Vec<CropSuggestion>,
    /// Fields as extracted from the generated reply, or `{"Error": ...}`
    #[schema(value_type = Object)]
    pub record: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FertilizerRecommendation {
    /// Always "fertilizer"
    pub recommendation_type: String,
    pub title: String,
    pub fertilizer: String,
    pub product: String,
    pub details: String,
    pub reasoning: String,
    pub amount: String,
    pub price: String,
    pub buy_at: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FertilizerRecommendationsResponse {
    pub land_id: Uuid,
    pub based_on_reading_ts: String,
    /// Label from the fertilizer model
    pub predicted_fertilizer: String,
    /// Crop of the land's active planting
    pub crop_name: Option<String>,
    pub recommendations: Vec<FertilizerRecommendation>,
    #[schema(value_type = Object)]
    pub record: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Record → response conversion
// ---------------------------------------------------------------------------

fn field(record: &ParsedResponse, key: &str) -> String {
    record.get(key).unwrap_or_default().to_string()
}

/// Suggestions from a parsed crop reply, best first.
pub fn crop_suggestions(record: &ParsedResponse) -> Result<Vec<CropSuggestion>, String> {
    if record.is_error() {
        return Err(PARSE_ERROR_MESSAGE.to_string());
    }
    let score = parse_match_score(&field(record, "Match")).map_err(|e| {
        tracing::warn!("{}", e);
        PARSE_ERROR_MESSAGE.to_string()
    })?;

    let mut suggestions = vec![CropSuggestion {
        crop_name: field(record, "Crop"),
        suitability_score: score,
        description: field(record, "Description"),
        explanation: field(record, "Explanation"),
        growing_season: field(record, "growing_season"),
        water_requirement: field(record, "water_requirement"),
        expected_yield: field(record, "expected_yield"),
        recommendations: field(record, "Recommendations"),
    }];
    suggestions.sort_by(|a, b| b.suitability_score.total_cmp(&a.suitability_score));
    Ok(suggestions)
}

pub fn fertilizer_recommendations(
    record: &ParsedResponse,
) -> Result<Vec<FertilizerRecommendation>, String> {
    if record.is_error() {
        return Err(PARSE_ERROR_MESSAGE.to_string());
    }
    let product = field(record, "Product");
    Ok(vec![FertilizerRecommendation {
        recommendation_type: "fertilizer".to_string(),
        title: format!("Apply {}", product),
        fertilizer: field(record, "Fertilizer"),
        product,
        details: field(record, "Description"),
        reasoning: field(record, "Explanation"),
        amount: field(record, "Amount"),
        price: field(record, "Price"),
        buy_at: field(record, "Buy at"),
    }])
}

fn split<T>(result: Result<Vec<T>, String>) -> (Vec<T>, Option<String>) {
    match result {
        Ok(items) => (items, None),
        Err(e) => (Vec::new(), Some(e)),
    }
}

/// The field map returned next to the typed list. Collapses to the error
/// marker whenever the list could not be built from it.
fn record_json(response: &ParsedResponse, error: &Option<String>) -> serde_json::Value {
    if error.is_some() {
        ParsedResponse::Error.to_json()
    } else {
        response.to_json()
    }
}

async fn owned_land(state: &AppState, land_id: Uuid, auth: AuthUser) -> Result<LandContext, AppError> {
    queries::get_land_context(&state.pool, land_id)
        .await?
        .filter(|land| land.user_id == auth.user_id)
        .ok_or_else(|| AppError::NotFound(format!("Land {} not found", land_id)))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Suggest a crop for a land plot from its latest soil reading.
#[utoipa::path(
    get,
    path = "/api/v1/lands/{id}/crop-suggestions",
    tag = "Recommendations",
    params(("id" = Uuid, Path, description = "Land UUID")),
    responses(
        (status = 200, description = "Suggestions (empty with `error` if the reply was malformed)", body = CropSuggestionsResponse),
        (status = 404, description = "Land not found", body = ErrorResponse),
        (status = 422, description = "No usable soil reading", body = ErrorResponse),
        (status = 502, description = "Text generation unavailable", body = ErrorResponse),
        (status = 503, description = "Climate data or model unavailable", body = ErrorResponse),
    )
)]
pub async fn crop_suggestions_for_land(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(land_id): Path<Uuid>,
) -> Result<Json<CropSuggestionsResponse>, AppError> {
    let land = owned_land(&state, land_id, auth).await?;
    let run = state.recommender.suggest_crop(&land).await?;
    let (suggestions, error) = split(crop_suggestions(&run.response));

    Ok(Json(CropSuggestionsResponse {
        land_id,
        based_on_reading_ts: run.based_on.to_rfc3339(),
        predicted_crop: run.predicted_crop,
        suggestions,
        record: record_json(&run.response, &error),
        error,
    }))
}

/// Recommend a fertilizer for a land plot from its latest soil reading and
/// current planting.
#[utoipa::path(
    get,
    path = "/api/v1/lands/{id}/fertilizer-recommendations",
    tag = "Recommendations",
    params(("id" = Uuid, Path, description = "Land UUID")),
    responses(
        (status = 200, description = "Recommendations (empty with `error` if the reply was malformed)", body = FertilizerRecommendationsResponse),
        (status = 404, description = "Land not found", body = ErrorResponse),
        (status = 422, description = "No usable soil reading", body = ErrorResponse),
        (status = 502, description = "Text generation unavailable", body = ErrorResponse),
        (status = 503, description = "Climate data or model unavailable", body = ErrorResponse),
    )
)]
pub async fn fertilizer_recommendations_for_land(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(land_id): Path<Uuid>,
) -> Result<Json<FertilizerRecommendationsResponse>, AppError> {
    let land = owned_land(&state, land_id, auth).await?;
    let run = state.recommender.recommend_fertilizer(&land).await?;
    let (recommendations, error) = split(fertilizer_recommendations(&run.response));

    Ok(Json(FertilizerRecommendationsResponse {
        land_id,
        based_on_reading_ts: run.based_on.to_rfc3339(),
        predicted_fertilizer: run.predicted_fertilizer,
        crop_name: run.crop_name,
        recommendations,
        record: record_json(&run.response, &error),
        error,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::parser::{parse, CROP_SUGGESTION, FERTILIZER_SUGGESTION};
    use serde_json::json;

    const CROP_REPLY: &str = "Crop: Rice\nMatch: 88%\nDescription: Paddy\n\
        Explanation: Wet and warm\nGrowing Season: Kharif\nWater Requirement: High\n\
        Expected Yield: 5 t/ha\nRecommendations: Transplant in June";

    #[test]
    fn test_crop_suggestions_from_reply() {
        let suggestions = crop_suggestions(&parse(CROP_REPLY, &CROP_SUGGESTION)).unwrap();
        assert_eq!(suggestions.len(), 1);
        let s = &suggestions[0];
        assert_eq!(s.crop_name, "Rice");
        assert_eq!(s.suitability_score, 0.88);
        assert_eq!(s.growing_season, "Kharif");
        assert_eq!(s.recommendations, "Transplant in June");
    }

    #[test]
    fn test_unparseable_reply_degrades_to_error() {
        let record = parse("Sorry, I cannot help with that.", &CROP_SUGGESTION);
        let (items, error) = split(crop_suggestions(&record));
        assert!(items.is_empty());
        assert_eq!(error.as_deref(), Some(PARSE_ERROR_MESSAGE));
    }

    #[test]
    fn test_non_numeric_match_degrades_to_error() {
        let reply = CROP_REPLY.replace("88%", "very good");
        let response = parse(&reply, &CROP_SUGGESTION);
        assert!(!response.is_error());

        let (items, error) = split(crop_suggestions(&response));
        assert!(items.is_empty());
        assert_eq!(error.as_deref(), Some(PARSE_ERROR_MESSAGE));
        assert_eq!(
            record_json(&response, &error),
            json!({ "Error": PARSE_ERROR_MESSAGE })
        );
    }

    #[test]
    fn test_record_keeps_fields_when_list_builds() {
        let response = parse(CROP_REPLY, &CROP_SUGGESTION);
        let (_, error) = split(crop_suggestions(&response));
        let record = record_json(&response, &error);
        assert_eq!(record["Crop"], "Rice");
        assert_eq!(record["Match"], "88%");
        assert!(record.get("Error").is_none());
    }

    #[test]
    fn test_fertilizer_recommendation_fields() {
        let reply = "Crop: Wheat\nFertilizer: Urea\nFertilizer Product: IFFCO Urea\n\
            Buy at: Krishi Kendra\nAmount: 50 kg/acre\nPrice: Rs 266\n\
            Description: 46% N\nExplanation: Low nitrogen";
        let recs = fertilizer_recommendations(&parse(reply, &FERTILIZER_SUGGESTION)).unwrap();
        let r = &recs[0];
        assert_eq!(r.recommendation_type, "fertilizer");
        assert_eq!(r.title, "Apply IFFCO Urea");
        assert_eq!(r.buy_at, "Krishi Kendra");
        assert_eq!(r.details, "46% N");
        assert_eq!(r.reasoning, "Low nitrogen");
    }

    #[test]
    fn test_error_field_is_omitted_when_absent() {
        let resp = CropSuggestionsResponse {
            land_id: Uuid::nil(),
            based_on_reading_ts: "2025-04-01T06:30:00+00:00".into(),
            predicted_crop: "rice".into(),
            suggestions: Vec::new(),
            record: ParsedResponse::Error.to_json(),
            error: None,
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json.get("error").is_none());
    }
}
