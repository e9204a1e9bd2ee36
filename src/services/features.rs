//! Feature assembly for the recommendation pipeline.
//!
//! Reduces the most recent nutrient-bearing soil reading of a land plot to a
//! `FeatureVector`. Climate fields the reading does not carry (rainfall, and
//! temperature/humidity when the sensor did not report them) are filled from
//! the weather service. A failed weather lookup leaves them unset; the
//! predictor then refuses to run instead of substituting zero.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::PgPool;
use std::fmt;

use crate::db::models::{LandContext, SoilReading};
use crate::db::queries;
use crate::errors::AppError;
use crate::helpers::opt_dec_to_f64;
use crate::services::weather::{WeatherClient, WeatherObservation};

/// A soil value as submitted by a device or a user: either a bare JSON number
/// or a string that may carry a unit suffix (`"5.5pH"`, `"40 mg/kg"`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SoilValueInput {
    Number(f64),
    Text(String),
}

impl SoilValueInput {
    /// Resolve to a finite float, stripping unit text from string inputs.
    pub fn resolve(&self, field: &str) -> Result<f64, AppError> {
        match self {
            SoilValueInput::Number(v) if v.is_finite() => Ok(*v),
            SoilValueInput::Number(v) => Err(AppError::InvalidSoilValue {
                field: field.to_string(),
                value: v.to_string(),
            }),
            SoilValueInput::Text(raw) => parse_soil_value(field, raw),
        }
    }
}

/// Parse a numeric soil value, stripping trailing unit text.
///
/// The leading numeric part (optional sign, digits, optional fraction) is
/// kept. Whatever follows must be unit text: it may not contain digits, so
/// `"5.5.5"` and `"5.5pH7"` are rejected rather than silently truncated.
pub fn parse_soil_value(field: &str, raw: &str) -> Result<f64, AppError> {
    let invalid = || AppError::InvalidSoilValue {
        field: field.to_string(),
        value: raw.to_string(),
    };

    let s = raw.trim();
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;
    for (i, c) in s.char_indices() {
        match c {
            '+' | '-' if i == 0 => {}
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        end = i + c.len_utf8();
    }

    if !seen_digit {
        return Err(invalid());
    }

    let (number, unit) = s.split_at(end);
    if unit.chars().any(|c| c.is_ascii_digit() || c == '.') {
        return Err(invalid());
    }

    number
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(invalid)
}

/// One input dimension of a classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    Nitrogen,
    Phosphorus,
    Potassium,
    Ph,
    Temperature,
    Humidity,
    Rainfall,
}

impl Feature {
    pub fn name(self) -> &'static str {
        match self {
            Feature::Nitrogen => "nitrogen",
            Feature::Phosphorus => "phosphorus",
            Feature::Potassium => "potassium",
            Feature::Ph => "pH",
            Feature::Temperature => "temperature",
            Feature::Humidity => "humidity",
            Feature::Rainfall => "rainfall",
        }
    }

    fn is_soil(self) -> bool {
        matches!(
            self,
            Feature::Nitrogen | Feature::Phosphorus | Feature::Potassium | Feature::Ph
        )
    }
}

/// Numeric classifier inputs for a land plot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureVector {
    pub nitrogen: Option<f64>,
    pub phosphorus: Option<f64>,
    pub potassium: Option<f64>,
    pub ph: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub rainfall: Option<f64>,
}

impl FeatureVector {
    /// Build from a stored reading. Rainfall is never sensed.
    pub fn from_reading(reading: &SoilReading) -> Self {
        Self {
            nitrogen: opt_dec_to_f64(reading.nitrogen_value),
            phosphorus: opt_dec_to_f64(reading.phosphorus_value),
            potassium: opt_dec_to_f64(reading.potassium_value),
            ph: opt_dec_to_f64(reading.ph_value),
            temperature: opt_dec_to_f64(reading.temperature_value),
            humidity: opt_dec_to_f64(reading.humidity_value),
            rainfall: None,
        }
    }

    pub fn get(&self, feature: Feature) -> Option<f64> {
        match feature {
            Feature::Nitrogen => self.nitrogen,
            Feature::Phosphorus => self.phosphorus,
            Feature::Potassium => self.potassium,
            Feature::Ph => self.ph,
            Feature::Temperature => self.temperature,
            Feature::Humidity => self.humidity,
            Feature::Rainfall => self.rainfall,
        }
    }

    /// Value of a feature the classifier needs; missing soil nutrients and
    /// missing climate values fail with distinct errors.
    pub fn require(&self, feature: Feature) -> Result<f64, AppError> {
        self.get(feature).ok_or_else(|| {
            if feature.is_soil() {
                AppError::InsufficientSoilData(format!(
                    "latest reading has no {} value",
                    feature.name()
                ))
            } else {
                AppError::MissingClimateData(format!(
                    "{} not reported by sensor and weather lookup failed",
                    feature.name()
                ))
            }
        })
    }

    pub fn needs_weather(&self) -> bool {
        self.temperature.is_none() || self.humidity.is_none() || self.rainfall.is_none()
    }

    /// Fill climate fields the reading did not carry. Sensor values win.
    pub fn apply_weather(&mut self, weather: &WeatherObservation) {
        self.temperature = self.temperature.or(Some(weather.temperature_c));
        self.humidity = self.humidity.or(weather.humidity_pct);
        self.rainfall = self.rainfall.or(Some(weather.rainfall_mm));
    }
}

/// Literal rendering embedded in generation prompts; absent values are omitted.
impl fmt::Display for FeatureVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = [
            ("Nitrogen", self.nitrogen),
            ("Phosphorus", self.phosphorus),
            ("Potassium", self.potassium),
            ("pH", self.ph),
            ("Temperature (°C)", self.temperature),
            ("Humidity (%)", self.humidity),
            ("Rainfall (mm)", self.rainfall),
        ];
        let rendered: Vec<String> = parts
            .iter()
            .filter_map(|(name, v)| v.map(|v| format!("{}: {}", name, v)))
            .collect();
        f.write_str(&rendered.join(", "))
    }
}

/// A feature vector with the observation time of the reading it came from.
#[derive(Debug, Clone)]
pub struct AssembledFeatures {
    pub features: FeatureVector,
    pub based_on: DateTime<Utc>,
}

/// Assemble the feature vector for a land plot.
pub async fn assemble(
    pool: &PgPool,
    weather: &WeatherClient,
    land: &LandContext,
    default_location: &str,
) -> Result<AssembledFeatures, AppError> {
    let reading = queries::get_latest_nutrient_reading(pool, land.land_id)
        .await?
        .ok_or_else(|| {
            AppError::InsufficientSoilData(format!(
                "no reading with nitrogen, phosphorus or potassium for land {}",
                land.land_id
            ))
        })?;

    let mut features = FeatureVector::from_reading(&reading);

    if features.needs_weather() {
        let location = land
            .address
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .unwrap_or(default_location);
        match weather.current(location).await {
            Ok(observation) => features.apply_weather(&observation),
            Err(e) => {
                tracing::warn!(
                    "Weather lookup for land {} ({}) failed, climate fields left unset: {}",
                    land.land_id,
                    location,
                    e
                );
            }
        }
    }

    Ok(AssembledFeatures {
        features,
        based_on: reading.observed_at,
    })
}
