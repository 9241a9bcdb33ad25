//! ---
//! cms_section: "11-simulation"
//! cms_subsection: "module"
//! cms_type: "source"
//! cms_scope: "code"
//! cms_description: "Mocked energy optimiser and predictive maintenance models."
//! cms_version: "v0.1.0"
//! cms_owner: "tbd"
//! ---
//! Stand-ins for the hosted models, returning closed-form numbers shaped like
//! the real responses.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::frames::round_to;
use crate::input::nonzero_or;

const INSPECTION_THRESHOLD: f64 = 0.7;

/// Body of a model request: `{ "metric": { ... } }` with loosely typed fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelRequest {
    #[serde(default)]
    pub metric: Option<Map<String, Value>>,
}

impl ModelRequest {
    fn field(&self, name: &str, default: f64) -> f64 {
        nonzero_or(self.metric.as_ref().and_then(|m| m.get(name)), default)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub param: String,
    pub from: f64,
    pub to: f64,
    /// Two-decimal string, e.g. `"-0.60"`.
    pub expected_delta_kwh_per_ton: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImpact {
    pub feature: String,
    pub value: f64,
    pub impact: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explainability {
    pub shap: Vec<FeatureImpact>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyPrediction {
    pub predicted_kwh_per_ton: f64,
    pub current_kwh_per_ton: f64,
    pub recommendations: Vec<Recommendation>,
    pub explainability: Explainability,
}

/// Suggest an rpm setpoint and estimate its effect on specific energy.
pub fn predict_energy(request: &ModelRequest) -> EnergyPrediction {
    let load = request.field("load_tph", 55.0);
    let power = request.field("power_kw", 120.0);
    let rpm = request.field("rpm", 315.0);

    let current = if load > 0.0 { power / load } else { 0.0 };
    let target_rpm = if rpm > 300.0 {
        (rpm - 15.0).max(260.0)
    } else {
        rpm + 5.0
    };
    let expected_delta = if target_rpm < rpm { -0.6 } else { 0.2 };
    let factor = if expected_delta < 0.0 { -0.03 } else { 0.02 };

    EnergyPrediction {
        predicted_kwh_per_ton: current * (1.0 + factor),
        current_kwh_per_ton: current,
        recommendations: vec![Recommendation {
            param: "rpm".into(),
            from: rpm,
            to: target_rpm,
            expected_delta_kwh_per_ton: format!("{expected_delta:.2}"),
        }],
        explainability: Explainability {
            shap: vec![FeatureImpact {
                feature: "load_tph".into(),
                value: load,
                impact: 0.35,
            }],
        },
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenancePrediction {
    pub failure_risk: f64,
    pub recommendation: String,
}

/// Failure risk in `[0, 1]` from vibration and temperature.
pub fn predict_maintenance(request: &ModelRequest) -> MaintenancePrediction {
    let vibration = request.field("vibration", 5.0);
    let temperature = request.field("temperature_c", 80.0);
    let risk = ((vibration - 4.5) * 0.15 + (temperature - 75.0) * 0.01).clamp(0.0, 1.0);
    let recommendation = if risk > INSPECTION_THRESHOLD {
        "Schedule inspection within 24 hours"
    } else {
        "Normal monitoring"
    };
    MaintenancePrediction {
        failure_risk: round_to(risk, 2),
        recommendation: recommendation.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(metric: Value) -> ModelRequest {
        serde_json::from_value(json!({ "metric": metric })).unwrap()
    }

    #[test]
    fn energy_lowers_fast_mills() {
        let prediction = predict_energy(&request(json!({
            "load_tph": 60, "power_kw": 150, "rpm": 320
        })));
        assert_eq!(prediction.current_kwh_per_ton, 2.5);
        assert!((prediction.predicted_kwh_per_ton - 2.5 * 0.97).abs() < 1e-12);
        let rec = &prediction.recommendations[0];
        assert_eq!(rec.to, 305.0);
        assert_eq!(rec.expected_delta_kwh_per_ton, "-0.60");
    }

    #[test]
    fn energy_raises_slow_mills() {
        let slow = predict_energy(&request(json!({ "rpm": "250" })));
        assert_eq!(slow.recommendations[0].to, 255.0);
        assert_eq!(slow.recommendations[0].expected_delta_kwh_per_ton, "0.20");

        let fractional = predict_energy(&request(json!({ "rpm": 270.5 })));
        assert_eq!(fractional.recommendations[0].to, 275.5);

        let near_floor = predict_energy(&request(json!({ "rpm": 301 })));
        assert_eq!(near_floor.recommendations[0].to, 286.0);
    }

    #[test]
    fn energy_defaults_apply_to_missing_and_zero() {
        let prediction = predict_energy(&ModelRequest::default());
        assert_eq!(prediction.current_kwh_per_ton, 120.0 / 55.0);
        assert_eq!(prediction.explainability.shap[0].value, 55.0);

        let zero_load = predict_energy(&request(json!({ "load_tph": 0 })));
        assert_eq!(zero_load.current_kwh_per_ton, 120.0 / 55.0);

        let negative = predict_energy(&request(json!({ "load_tph": -10 })));
        assert_eq!(negative.current_kwh_per_ton, 0.0);
    }

    #[test]
    fn maintenance_risk_is_clamped_and_rounded() {
        let normal = predict_maintenance(&ModelRequest::default());
        assert!((normal.failure_risk - 0.125).abs() <= 0.0051);
        assert_eq!(normal.recommendation, "Normal monitoring");

        let warm = predict_maintenance(&request(json!({ "vibration": 5.5, "temperature_c": 80 })));
        assert_eq!(warm.failure_risk, 0.2);

        let hot = predict_maintenance(&request(json!({ "vibration": 8.5, "temperature_c": 95 })));
        assert_eq!(hot.failure_risk, 0.8);
        assert_eq!(hot.recommendation, "Schedule inspection within 24 hours");

        let extreme = predict_maintenance(&request(json!({ "vibration": 40 })));
        assert_eq!(extreme.failure_risk, 1.0);

        let cold = predict_maintenance(&request(json!({ "vibration": 1, "temperature_c": 20 })));
        assert_eq!(cold.failure_risk, 0.0);
    }
}
