//! ---
//! cms_section: "05-networking-external-interfaces"
//! cms_subsection: "module"
//! cms_type: "source"
//! cms_scope: "code"
//! cms_description: "Client for the hosted energy optimisation model."
//! cms_version: "v0.0.0-prealpha"
//! cms_owner: "tbd"
//! ---
use std::time::Duration;

use cms_common::InferenceConfig;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// Flat feature record expected by the model service.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnergyFeatures {
    pub power_kw: f64,
    pub load_tph: f64,
    pub rpm: f64,
    pub vibration: f64,
    pub temperature_c: f64,
    pub ore_grade: f64,
    pub moisture_pct: f64,
    pub mill_fill_pct: f64,
    pub media_size_mm: f64,
    pub last_15m_power_avg: f64,
    pub last_15m_load_avg: f64,
}

impl Default for EnergyFeatures {
    fn default() -> Self {
        Self {
            power_kw: 1250.5,
            load_tph: 55.2,
            rpm: 315.0,
            vibration: 0.02,
            temperature_c: 78.5,
            ore_grade: 0.48,
            moisture_pct: 3.2,
            mill_fill_pct: 85.0,
            media_size_mm: 8.0,
            last_15m_power_avg: 1230.0,
            last_15m_load_avg: 54.5,
        }
    }
}

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("failed to build inference client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("inference request failed: {0}")]
    Transport(#[source] reqwest::Error),
    /// Non-2xx answer; the message is what the dashboard shows.
    #[error("API Error {status}: {message}")]
    Status { status: u16, message: String },
    /// Non-2xx answer from a service whose error body is not inspected.
    #[error("Server error: {status}")]
    Server { status: u16 },
    #[error("inference response is not valid JSON: {0}")]
    Decode(#[source] reqwest::Error),
}

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, InferenceError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(InferenceError::Client)
}

/// Plain request/response client. Failures are surfaced, never retried.
#[derive(Debug, Clone)]
pub struct InferenceClient {
    http: reqwest::Client,
    endpoint: Url,
}

impl InferenceClient {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, InferenceError> {
        let http = http_client(timeout)?;
        Ok(Self { http, endpoint })
    }

    /// `None` when no endpoint is configured.
    pub fn from_config(config: &InferenceConfig) -> Result<Option<Self>, InferenceError> {
        config
            .endpoint
            .clone()
            .map(|endpoint| Self::new(endpoint, config.timeout))
            .transpose()
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Submit `features` and return the model payload unchanged.
    pub async fn predict(&self, features: &EnergyFeatures) -> Result<Value, InferenceError> {
        debug!(endpoint = %self.endpoint, "submitting inference request");
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(features)
            .send()
            .await
            .map_err(InferenceError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = error_message(status, &body);
            warn!(status = status.as_u16(), %message, "inference service rejected request");
            return Err(InferenceError::Status {
                status: status.as_u16(),
                message,
            });
        }

        response.json::<Value>().await.map_err(InferenceError::Decode)
    }
}

/// Human readable message for an error response body.
fn error_message(status: StatusCode, body: &str) -> String {
    let reason = || status.canonical_reason().unwrap_or("Unknown Status").to_owned();
    let Ok(parsed) = serde_json::from_str::<Value>(body) else {
        return reason();
    };
    if let Some(detail) = parsed.get("detail").filter(|detail| truthy(detail)) {
        return format!("Validation Failed: {detail}");
    }
    match parsed.get("message").and_then(Value::as_str) {
        Some(message) if !message.is_empty() => message.to_owned(),
        _ => reason(),
    }
}

/// Empty arrays and objects are truthy; `null`, `false`, zero and `""` are not.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
