//! Shared HTTP plumbing for the model backends.
//!
//! Every backend posts JSON and reads JSON back. [`post_json`] performs the
//! call and maps transport and status failures onto [`RagError`]:
//!
//! | Condition | Error |
//! |-----------|-------|
//! | 429 | `RateLimited` |
//! | 408, 504, client timeout | `Timeout` |
//! | 401, 403 | `Configuration` |
//! | other 4xx, 5xx, connection error, malformed JSON | `ModelUnavailable` |
//!
//! Retrying is left to the `Retrying` decorator in [`crate::retry`].

use std::time::Duration;

use pdf_rag_core::error::{RagError, Result};
use reqwest::StatusCode;
use serde_json::Value;

/// Build a client with a whole-request timeout.
pub fn client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| RagError::Configuration(format!("cannot build HTTP client: {}", e)))
}

/// Read an API key from the environment variable `var`.
pub fn api_key(var: &str) -> Result<String> {
    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(RagError::Configuration(format!(
            "{} environment variable not set",
            var
        ))),
    }
}

/// Map a non-success status to an error.
pub fn classify_status(status: StatusCode, service: &str, body: &str) -> RagError {
    let detail = format!("{} returned {}: {}", service, status, body.trim());
    match status.as_u16() {
        429 => RagError::RateLimited(detail),
        408 | 504 => RagError::Timeout(detail),
        401 | 403 => RagError::Configuration(detail),
        _ => RagError::ModelUnavailable(detail),
    }
}

/// Map a transport error to an error.
pub fn classify_transport(err: &reqwest::Error, service: &str) -> RagError {
    if err.is_timeout() {
        RagError::Timeout(format!("{} did not respond in time: {}", service, err))
    } else {
        RagError::ModelUnavailable(format!("cannot reach {}: {}", service, err))
    }
}

/// POST `body` as JSON to `url` and parse the JSON response.
pub async fn post_json(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &Value,
    service: &str,
) -> Result<Value> {
    let mut request = client
        .post(url)
        .header("Content-Type", "application/json")
        .json(body);
    if let Some(key) = bearer {
        request = request.header("Authorization", format!("Bearer {}", key));
    }

    let response = request
        .send()
        .await
        .map_err(|e| classify_transport(&e, service))?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        tracing::warn!(service, status = status.as_u16(), "backend request failed");
        return Err(classify_status(status, service, &text));
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                classify_transport(&e, service)
            } else {
                RagError::ModelUnavailable(format!("{} sent malformed JSON: {}", service, e))
            }
        })
}

/// Read a JSON array of numbers as a vector.
///
/// Values outside the `f32` range are rejected rather than stored as infinities.
pub fn parse_vector(value: &Value, service: &str) -> Result<Vec<f32>> {
    let items = value.as_array().ok_or_else(|| {
        RagError::ModelUnavailable(format!("{} response: embedding is not an array", service))
    })?;
    items
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .filter(|f| f.is_finite())
                .ok_or_else(|| {
                    RagError::ModelUnavailable(format!(
                        "{} response: invalid embedding value {}",
                        service, v
                    ))
                })
        })
        .collect()
}
