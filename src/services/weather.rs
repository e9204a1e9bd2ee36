//! OpenWeatherMap current-weather client.
//!
//! Supplies the climate fields a soil reading does not carry.
//! See: https://openweathermap.org/current

use serde::Deserialize;
use std::time::Duration;

use crate::errors::AppError;

/// Client for the OpenWeatherMap current-weather endpoint.
#[derive(Debug, Clone)]
pub struct WeatherClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

/// Current conditions at a location.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherObservation {
    pub temperature_c: f64,
    /// Absent when the provider omits it.
    pub humidity_pct: Option<f64>,
    /// Rain over the last hour; 0 when the provider reports none.
    pub rainfall_mm: f64,
}

// --- OpenWeatherMap JSON response types ---

#[derive(Debug, Deserialize)]
struct OwmResponse {
    main: OwmMain,
    rain: Option<OwmRain>,
}

#[derive(Debug, Deserialize)]
struct OwmMain {
    temp: f64,
    humidity: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwmRain {
    #[serde(rename = "1h")]
    one_hour: Option<f64>,
}

impl From<OwmResponse> for WeatherObservation {
    fn from(r: OwmResponse) -> Self {
        Self {
            temperature_c: r.main.temp,
            humidity_pct: r.main.humidity,
            rainfall_mm: r.rain.and_then(|rain| rain.one_hour).unwrap_or(0.0),
        }
    }
}

impl WeatherClient {
    pub fn new(api_url: &str, api_key: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Fetch current conditions for a free-text location (city, district, state).
    pub async fn current(&self, location: &str) -> Result<WeatherObservation, AppError> {
        if self.api_key.is_empty() {
            return Err(AppError::ExternalServiceError(
                "weather API key not configured".to_string(),
            ));
        }

        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("q", location),
                ("appid", self.api_key.as_str()),
                ("units", "metric"),
            ])
            .send()
            .await
            // The request URL carries the API key; strip it before the error is logged.
            .map_err(|e| {
                AppError::ExternalServiceError(format!(
                    "weather request failed: {}",
                    e.without_url()
                ))
            })?;

        if !response.status().is_success() {
            return Err(AppError::ExternalServiceError(format!(
                "weather service returned HTTP {} for '{}'",
                response.status(),
                location
            )));
        }

        let body: OwmResponse = response.json().await.map_err(|e| {
            AppError::ExternalServiceError(format!(
                "weather JSON parse error: {}",
                e.without_url()
            ))
        })?;

        tracing::debug!(
            "Weather for {}: {:.1}°C, humidity {:?}, rain {:.1}mm",
            location,
            body.main.temp,
            body.main.humidity,
            body.rain.as_ref().and_then(|r| r.one_hour).unwrap_or(0.0)
        );

        Ok(body.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> WeatherClient {
        WeatherClient::new(&format!("{}/data/2.5/weather", server.uri()), "test-key")
    }

    #[tokio::test]
    async fn test_current_parses_metric_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .and(query_param("q", "Pune"))
            .and(query_param("units", "metric"))
            .and(query_param("appid", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "main": { "temp": 27.4, "humidity": 62 },
                "rain": { "1h": 1.2 }
            })))
            .mount(&server)
            .await;

        let obs = client_for(&server).current("Pune").await.unwrap();
        assert_eq!(
            obs,
            WeatherObservation {
                temperature_c: 27.4,
                humidity_pct: Some(62.0),
                rainfall_mm: 1.2,
            }
        );
    }

    #[tokio::test]
    async fn test_current_defaults_rain_to_zero() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "main": { "temp": 31.0 }
            })))
            .mount(&server)
            .await;

        let obs = client_for(&server).current("Nagpur").await.unwrap();
        assert_eq!(obs.rainfall_mm, 0.0);
        assert_eq!(obs.humidity_pct, None);
    }

    #[tokio::test]
    async fn test_current_maps_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "cod": "404", "message": "city not found"
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).current("Atlantis").await.unwrap_err();
        assert!(matches!(err, AppError::ExternalServiceError(_)));
    }

    #[tokio::test]
    async fn test_current_without_key_fails_fast() {
        let client = WeatherClient::new("http://127.0.0.1:9/weather", "");
        assert!(client.current("Pune").await.is_err());
    }

    #[tokio::test]
    async fn test_request_error_does_not_leak_api_key() {
        let client = WeatherClient::new("http://127.0.0.1:9/weather", "SECRET-OWM-KEY");
        let err = client.current("Pune").await.unwrap_err();
        assert!(matches!(err, AppError::ExternalServiceError(_)));
        assert!(!err.to_string().contains("SECRET-OWM-KEY"));
    }

    #[tokio::test]
    async fn test_decode_error_does_not_leak_api_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = WeatherClient::new(
            &format!("{}/data/2.5/weather", server.uri()),
            "SECRET-OWM-KEY",
        );
        let err = client.current("Pune").await.unwrap_err();
        assert!(!err.to_string().contains("SECRET-OWM-KEY"));
    }
}
