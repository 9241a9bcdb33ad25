//! ---
//! cms_section: "05-networking-external-interfaces"
//! cms_subsection: "module"
//! cms_type: "source"
//! cms_scope: "code"
//! cms_description: "Client for the hosted maintenance alert model."
//! cms_version: "v0.0.0-prealpha"
//! cms_owner: "tbd"
//! ---
use std::time::Duration;

use cms_common::InferenceConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::inference::{http_client, InferenceError};

/// Machine condition submitted for a maintenance risk assessment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceFeatures {
    pub vibration: f64,
    pub temperature_c: f64,
    pub rpm: f64,
    pub power_kw: f64,
    pub age_hours: f64,
    pub historical_failures: u32,
}

impl Default for MaintenanceFeatures {
    fn default() -> Self {
        Self {
            vibration: 0.02,
            temperature_c: 78.5,
            rpm: 315.0,
            power_kw: 1250.5,
            age_hours: 1245.0,
            historical_failures: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertLevel {
    Critical,
    Warning,
    Normal,
}

impl AlertLevel {
    pub const CRITICAL_ABOVE: f64 = 0.75;
    pub const WARNING_ABOVE: f64 = 0.5;

    /// Bucket a risk score; both thresholds are exclusive.
    pub fn from_score(score: f64) -> Self {
        if score > Self::CRITICAL_ABOVE {
            AlertLevel::Critical
        } else if score > Self::WARNING_ABOVE {
            AlertLevel::Warning
        } else {
            AlertLevel::Normal
        }
    }

    pub fn status_color(self) -> &'static str {
        match self {
            AlertLevel::Critical => "red",
            AlertLevel::Warning => "orange",
            AlertLevel::Normal => "green",
        }
    }

    pub fn primary_action(self) -> &'static str {
        match self {
            AlertLevel::Critical => "Immediate inspection required!",
            AlertLevel::Warning => "Schedule maintenance soon.",
            AlertLevel::Normal => "Machine operating normally.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecommendation {
    pub param: String,
    pub value: f64,
    pub suggestion: String,
}

/// Assessment returned by the alert service and relayed to the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceAlert {
    pub alert_level: AlertLevel,
    pub maintenance_risk_score: f64,
    pub status_color: String,
    pub primary_action: String,
    #[serde(default)]
    pub recommendations: Vec<AlertRecommendation>,
}

#[derive(Debug, Clone)]
pub struct MaintenanceAlertClient {
    http: reqwest::Client,
    endpoint: Url,
}

impl MaintenanceAlertClient {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, InferenceError> {
        let http = http_client(timeout)?;
        Ok(Self { http, endpoint })
    }

    /// `None` when no maintenance endpoint is configured.
    pub fn from_config(config: &InferenceConfig) -> Result<Option<Self>, InferenceError> {
        config
            .maintenance_endpoint
            .clone()
            .map(|endpoint| Self::new(endpoint, config.timeout))
            .transpose()
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Ask the service to score `features`. Error bodies are ignored; a
    /// non-2xx answer surfaces as [`InferenceError::Server`].
    pub async fn assess(
        &self,
        features: &MaintenanceFeatures,
    ) -> Result<MaintenanceAlert, InferenceError> {
        debug!(endpoint = %self.endpoint, "submitting maintenance alert request");
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(features)
            .send()
            .await
            .map_err(InferenceError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "maintenance alert service rejected request");
            return Err(InferenceError::Server {
                status: status.as_u16(),
            });
        }

        let alert = response
            .json::<MaintenanceAlert>()
            .await
            .map_err(InferenceError::Decode)?;
        let expected = AlertLevel::from_score(alert.maintenance_risk_score);
        if expected != alert.alert_level {
            warn!(
                score = alert.maintenance_risk_score,
                reported = ?alert.alert_level,
                ?expected,
                "alert level disagrees with risk score"
            );
        }
        Ok(alert)
    }
}
