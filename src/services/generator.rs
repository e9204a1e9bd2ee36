//! Gemini `generateContent` client.
//!
//! Turns a prompt into free text. Every failure (no key, transport error,
//! timeout, non-2xx, empty candidate list) surfaces as
//! `AppError::GenerationUnavailable`; callers never see a partial answer.

use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::errors::AppError;

#[derive(Debug, Clone)]
pub struct GeneratorClient {
    client: reqwest::Client,
    api_url: String,
    model: String,
    api_key: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GenerateResponse {
    /// Concatenated text parts of the first candidate.
    fn into_text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

impl GeneratorClient {
    pub fn new(api_url: &str, model: &str, api_key: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
            timeout,
        }
    }

    pub async fn generate(&self, prompt: &str) -> Result<String, AppError> {
        if self.api_key.is_empty() {
            return Err(AppError::GenerationUnavailable(
                "no API key configured".to_string(),
            ));
        }

        let url = format!("{}/models/{}:generateContent", self.api_url, self.model);
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let started = std::time::Instant::now();
        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::GenerationUnavailable(format!(
                        "{} timed out after {}s",
                        self.model,
                        self.timeout.as_secs()
                    ))
                } else {
                    AppError::GenerationUnavailable(format!("request failed: {}", e.without_url()))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            tracing::warn!("Generation API returned HTTP {}: {}", status, detail);
            return Err(AppError::GenerationUnavailable(format!(
                "{} returned HTTP {}",
                self.model, status
            )));
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| {
            AppError::GenerationUnavailable(format!("malformed response: {}", e.without_url()))
        })?;

        let text = parsed.into_text().ok_or_else(|| {
            AppError::GenerationUnavailable(format!("{} returned no text", self.model))
        })?;

        tracing::info!(
            "Generated {} chars with {} in {}ms",
            text.len(),
            self.model,
            started.elapsed().as_millis()
        );
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, timeout: Duration) -> GeneratorClient {
        GeneratorClient::new(&server.uri(), "gemini-2.0-flash", "k-123", timeout)
    }

    #[tokio::test]
    async fn test_generate_returns_first_candidate_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.0-flash:generateContent"))
            .and(query_param("key", "k-123"))
            .and(body_partial_json(json!({
                "contents": [{ "parts": [{ "text": "Suggest a crop" }] }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [
                    { "content": { "parts": [{ "text": "Crop: Rice\n" }, { "text": "Match: 90" }] } },
                    { "content": { "parts": [{ "text": "ignored" }] } }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = client_for(&server, Duration::from_secs(5))
            .generate("Suggest a crop")
            .await
            .unwrap();
        assert_eq!(text, "Crop: Rice\nMatch: 90");
    }

    #[tokio::test]
    async fn test_generate_empty_candidates_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
            .mount(&server)
            .await;

        let err = client_for(&server, Duration::from_secs(5))
            .generate("x")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::GenerationUnavailable(_)));
    }

    #[tokio::test]
    async fn test_generate_http_error_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = client_for(&server, Duration::from_secs(5))
            .generate("x")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::GenerationUnavailable(_)));
    }

    #[tokio::test]
    async fn test_generate_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(2))
                    .set_body_json(json!({ "candidates": [] })),
            )
            .mount(&server)
            .await;

        let err = client_for(&server, Duration::from_millis(200))
            .generate("x")
            .await
            .unwrap_err();
        match err {
            AppError::GenerationUnavailable(msg) => assert!(msg.contains("timed out")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_generate_without_key_fails_fast() {
        let client = GeneratorClient::new("http://127.0.0.1:9", "m", "", Duration::from_secs(1));
        assert!(matches!(
            client.generate("x").await,
            Err(AppError::GenerationUnavailable(_))
        ));
    }
}
