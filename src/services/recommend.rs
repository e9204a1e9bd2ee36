//! Recommendation pipeline: assemble features, predict, generate, parse.
//!
//! Runs synchronously within the caller's request. Generation failures
//! propagate as errors; a reply that does not fit the expected layout is
//! returned as `ParsedResponse::Error` so the endpoint can degrade.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use crate::db::models::LandContext;
use crate::errors::AppError;
use crate::services::features::{self, FeatureVector};
use crate::services::generator::GeneratorClient;
use crate::services::parser::{self, ParsedResponse, CROP_SUGGESTION, FERTILIZER_SUGGESTION};
use crate::services::predictor::{CategoricalContext, ModelKind, Predictor};
use crate::services::scraper::{truncate_chars, PageScraper};
use crate::services::weather::WeatherClient;

/// Characters of each scraped page embedded in the fertilizer prompt.
const MAX_SOURCE_CHARS: usize = 2000;

/// Result of a crop suggestion run.
#[derive(Debug, Clone)]
pub struct CropSuggestionRun {
    pub based_on: DateTime<Utc>,
    pub predicted_crop: String,
    pub response: ParsedResponse,
}

/// Result of a fertilizer recommendation run.
#[derive(Debug, Clone)]
pub struct FertilizerRun {
    pub based_on: DateTime<Utc>,
    pub predicted_fertilizer: String,
    pub crop_name: Option<String>,
    pub response: ParsedResponse,
}

/// Everything the pipeline talks to, cloned cheaply into each request.
#[derive(Clone)]
pub struct Recommender {
    pub pool: PgPool,
    pub weather: WeatherClient,
    pub generator: GeneratorClient,
    pub predictor: Arc<Predictor>,
    pub scraper: PageScraper,
    pub default_location: String,
    pub fertilizer_sources: Vec<String>,
}

impl Recommender {
    pub async fn suggest_crop(&self, land: &LandContext) -> Result<CropSuggestionRun, AppError> {
        let assembled =
            features::assemble(&self.pool, &self.weather, land, &self.default_location).await?;
        let ctx = CategoricalContext {
            soil_color: land.soil_color(),
            crop_name: land.active_crop_name.as_deref(),
        };
        let predicted_crop = self
            .predictor
            .predict(ModelKind::Crop, &assembled.features, ctx)?;

        let prompt = crop_prompt(&predicted_crop, &assembled.features, land.soil_color());
        let text = self.generator.generate(&prompt).await?;
        let response = parser::parse(&text, &CROP_SUGGESTION);
        if response.is_error() {
            tracing::warn!(
                "Crop suggestion reply for land {} did not match the expected layout",
                land.land_id
            );
        }

        Ok(CropSuggestionRun {
            based_on: assembled.based_on,
            predicted_crop,
            response,
        })
    }

    pub async fn recommend_fertilizer(&self, land: &LandContext) -> Result<FertilizerRun, AppError> {
        let assembled =
            features::assemble(&self.pool, &self.weather, land, &self.default_location).await?;
        let crop_name = land.active_crop_name.clone();
        let ctx = CategoricalContext {
            soil_color: land.soil_color(),
            crop_name: crop_name.as_deref(),
        };
        let predicted_fertilizer =
            self.predictor
                .predict(ModelKind::Fertilizer, &assembled.features, ctx)?;

        let sources = if self.fertilizer_sources.is_empty() {
            BTreeMap::new()
        } else {
            self.scraper.fetch_all(&self.fertilizer_sources).await
        };

        let prompt = fertilizer_prompt(
            &predicted_fertilizer,
            crop_name.as_deref(),
            &assembled.features,
            &sources,
        );
        let text = self.generator.generate(&prompt).await?;
        let response = parser::parse(&text, &FERTILIZER_SUGGESTION);
        if response.is_error() {
            tracing::warn!(
                "Fertilizer reply for land {} did not match the expected layout",
                land.land_id
            );
        }

        Ok(FertilizerRun {
            based_on: assembled.based_on,
            predicted_fertilizer,
            crop_name,
            response,
        })
    }
}

pub fn crop_prompt(predicted_crop: &str, features: &FeatureVector, soil_color: Option<&str>) -> String {
    format!(
        "You are an agronomy assistant for smallholder farmers in India.\n\
         Soil and climate data: {features}\n\
         Soil color: {soil}\n\
         A crop recommendation model trained on these inputs suggests: {predicted_crop}\n\n\
         Recommend the single most suitable crop for this land. \
         Match is a suitability percentage from 0 to 100.\n\
         Reply using exactly this layout, one field per line, and nothing else:\n\
         {template}",
        soil = soil_color.unwrap_or("unknown"),
        template = CROP_SUGGESTION.template(),
    )
}

pub fn fertilizer_prompt(
    predicted_fertilizer: &str,
    crop_name: Option<&str>,
    features: &FeatureVector,
    sources: &BTreeMap<String, String>,
) -> String {
    let mut prompt = format!(
        "You are an agronomy assistant for smallholder farmers in India.\n\
         Crop: {crop}\n\
         Soil and climate data: {features}\n\
         A fertilizer recommendation model trained on these inputs suggests: {predicted_fertilizer}\n\n\
         Recommend one fertilizer product a farmer can buy locally, with the amount to \
         apply and an approximate price in rupees.\n",
        crop = crop_name.unwrap_or("not planted yet"),
    );

    let usable: Vec<_> = sources
        .iter()
        .filter(|(_, text)| !text.starts_with("Error:") && !text.trim().is_empty())
        .collect();
    if !usable.is_empty() {
        prompt.push_str("\nProduct listings for reference:\n");
        for (url, text) in usable {
            let _ = write!(prompt, "\nSource {}:\n{}\n", url, truncate_chars(text, MAX_SOURCE_CHARS));
        }
    }

    prompt.push_str("\nReply using exactly this layout, one field per line, and nothing else:\n");
    prompt.push_str(&FERTILIZER_SUGGESTION.template());
    prompt
}

/// Suitability score in [0, 1] from a generated `Match` value.
///
/// The leading number is used (`"92%"`, `"0.85"`, `"85/100"`). Values above 1
/// and up to 100 are read as percentages. Anything still outside [0, 1] is
/// clamped with a warning.
pub fn parse_match_score(raw: &str) -> Result<f64, AppError> {
    let s = raw.trim();
    let end = s
        .char_indices()
        .find(|(i, c)| !(c.is_ascii_digit() || *c == '.' || (*i == 0 && (*c == '-' || *c == '+'))))
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    let value: f64 = s[..end]
        .parse()
        .ok()
        .filter(|v: &f64| v.is_finite())
        .ok_or_else(|| AppError::ParseFailure(format!("match score '{}' is not numeric", raw)))?;

    let scaled = if value > 1.0 && value <= 100.0 {
        value / 100.0
    } else {
        value
    };
    if !(0.0..=1.0).contains(&scaled) {
        tracing::warn!("Match score '{}' out of range, clamping", raw);
    }
    Ok(scaled.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector() -> FeatureVector {
        FeatureVector {
            nitrogen: Some(40.0),
            phosphorus: Some(20.0),
            potassium: Some(20.0),
            ph: Some(5.5),
            temperature: Some(20.0),
            humidity: Some(60.0),
            rainfall: Some(300.0),
        }
    }

    #[test]
    fn test_match_score_fraction_and_percent() {
        assert_eq!(parse_match_score("0.85").unwrap(), 0.85);
        assert_eq!(parse_match_score("92%").unwrap(), 0.92);
        assert_eq!(parse_match_score(" 85/100 ").unwrap(), 0.85);
        assert_eq!(parse_match_score("1").unwrap(), 1.0);
    }

    #[test]
    fn test_match_score_clamps_out_of_range() {
        assert_eq!(parse_match_score("150").unwrap(), 1.0);
        assert_eq!(parse_match_score("-3").unwrap(), 0.0);
    }

    #[test]
    fn test_match_score_rejects_words() {
        assert!(matches!(
            parse_match_score("High"),
            Err(AppError::ParseFailure(_))
        ));
        assert!(parse_match_score("").is_err());
    }

    #[test]
    fn test_crop_prompt_embeds_label_features_and_layout() {
        let prompt = crop_prompt("rice", &vector(), Some("Black"));
        assert!(prompt.contains("suggests: rice"));
        assert!(prompt.contains("Nitrogen: 40"));
        assert!(prompt.contains("Rainfall (mm): 300"));
        assert!(prompt.contains("Soil color: Black"));
        assert!(prompt.ends_with("Recommendations: <Recommendations>"));
    }

    #[test]
    fn test_fertilizer_prompt_skips_failed_sources() {
        let mut sources = BTreeMap::new();
        sources.insert("https://a.example/urea".to_string(), "Urea 45kg Rs 266".to_string());
        sources.insert("https://b.example/dap".to_string(), "Error: HTTP 503".to_string());

        let prompt = fertilizer_prompt("Urea", Some("Wheat"), &vector(), &sources);
        assert!(prompt.contains("Crop: Wheat"));
        assert!(prompt.contains("suggests: Urea"));
        assert!(prompt.contains("Source https://a.example/urea:\nUrea 45kg Rs 266"));
        assert!(!prompt.contains("b.example"));
        assert!(prompt.ends_with("Explanation: <Explanation>"));
    }

    #[test]
    fn test_fertilizer_prompt_without_sources_or_crop() {
        let prompt = fertilizer_prompt("DAP", None, &vector(), &BTreeMap::new());
        assert!(prompt.contains("Crop: not planted yet"));
        assert!(!prompt.contains("Product listings"));
    }
}
